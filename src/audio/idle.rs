use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Temporizador de auto-desconexión por inactividad.
///
/// Holds at most one pending timer. Arming always cancels the previous one and
/// hands the callback a new generation number; the owner compares it with
/// [`IdleTimer::fire`] so a timeout that was already in flight when the timer
/// got cancelled or re-armed is ignored.
#[derive(Debug)]
pub struct IdleTimer {
    grace: Duration,
    generation: u64,
    pending: Option<Pending>,
}

#[derive(Debug)]
struct Pending {
    generation: u64,
    task: JoinHandle<()>,
}

impl IdleTimer {
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            generation: 0,
            pending: None,
        }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Programa el temporizador; `on_fire` recibe la generación armada
    pub fn arm<F>(&mut self, on_fire: F) -> u64
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.cancel();
        self.generation += 1;

        let generation = self.generation;
        let grace = self.grace;
        let task = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            on_fire(generation);
        });

        debug!("⏲️ Temporizador de inactividad armado ({}s)", grace.as_secs());
        self.pending = Some(Pending { generation, task });
        generation
    }

    /// Cancela el temporizador pendiente, devuelve si había uno
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => {
                pending.task.abort();
                debug!("⏲️ Temporizador de inactividad cancelado");
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    /// Consume un disparo; `true` solo si corresponde al temporizador vigente
    pub fn fire(&mut self, generation: u64) -> bool {
        match &self.pending {
            Some(pending) if pending.generation == generation => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }
}

impl Drop for IdleTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
