use chrono::Utc;
use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::track::Track;

/// Tiempo máximo que una cola guardada sigue siendo válida (4 horas)
pub const QUEUE_MAX_AGE_MS: i64 = 4 * 60 * 60 * 1000;

/// Proyección persistente de una [`Queue`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedQueue {
    pub tracks: Vec<Track>,
    /// Posición del cursor, `-1` cuando no hay track actual
    pub position: i64,
    pub saved_at: i64,
}

impl SerializedQueue {
    /// Verifica si la cola guardada no ha expirado
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(now_ms())
    }

    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        now_ms - self.saved_at < QUEUE_MAX_AGE_MS
    }

    /// Duración total de todos los tracks guardados
    pub fn total_duration(&self) -> Duration {
        Duration::from_millis(self.tracks.iter().map(|t| t.duration_ms).sum())
    }
}

/// Cola de reproducción con cursor.
///
/// All tracks (played, current and upcoming) live in one list; the cursor
/// splits it into:
///
/// - **history**: `tracks[..cursor]`
/// - **current**: `tracks[cursor]`
/// - **upcoming**: `tracks[cursor + 1..]` (the whole list when there is no cursor)
///
/// A `None` cursor is the "nothing played yet" position (`-1` once
/// serialized). Positional mutators (`move_track`, `remove`, `shuffle`) only
/// ever touch the upcoming slice and either apply fully or not at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Queue {
    tracks: Vec<Track>,
    cursor: Option<usize>,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Todos los tracks (historial + actual + próximos)
    pub fn all(&self) -> &[Track] {
        &self.tracks
    }

    /// Track actual, si el cursor apunta a uno
    pub fn current(&self) -> Option<&Track> {
        self.cursor.and_then(|pos| self.tracks.get(pos))
    }

    /// Tracks ya reproducidos
    pub fn history(&self) -> &[Track] {
        &self.tracks[..self.cursor.unwrap_or(0)]
    }

    /// Tracks pendientes
    pub fn upcoming(&self) -> &[Track] {
        &self.tracks[self.upcoming_start()..]
    }

    /// Número de tracks pendientes
    pub fn len(&self) -> usize {
        self.tracks.len() - self.upcoming_start()
    }

    pub fn total_len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Posición del cursor al estilo persistido (`-1` = sin track actual)
    pub fn position(&self) -> i64 {
        self.cursor.map_or(-1, |pos| pos as i64)
    }

    /// Agrega tracks al final, o justo después del actual si `next`
    pub fn add(&mut self, tracks: Vec<Track>, next: bool) {
        if next {
            let at = self.upcoming_start();
            self.tracks.splice(at..at, tracks);
        } else {
            self.tracks.extend(tracks);
        }
    }

    /// Avanza el cursor `skip` posiciones.
    ///
    /// Returns the new current track, or `None` without moving the cursor when
    /// the advance would run past the end.
    pub fn next(&mut self, skip: usize) -> Option<&Track> {
        let target = match self.cursor {
            Some(pos) => pos.checked_add(skip)?,
            None => skip.checked_sub(1)?,
        };

        if target >= self.tracks.len() {
            return None;
        }

        self.cursor = Some(target);
        self.tracks.get(target)
    }

    /// Retrocede un track; `None` si ya está en el primero (o antes)
    pub fn prev(&mut self) -> Option<&Track> {
        match self.cursor {
            Some(pos) if pos > 0 => {
                self.cursor = Some(pos - 1);
                self.tracks.get(pos - 1)
            }
            _ => None,
        }
    }

    /// Mezcla solo los tracks pendientes
    pub fn shuffle(&mut self) {
        self.shuffle_with(&mut rand::thread_rng());
    }

    pub fn shuffle_with<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let start = self.upcoming_start();
        self.tracks[start..].shuffle(rng);
        debug!("🔀 Mezclados {} tracks pendientes", self.tracks.len() - start);
    }

    /// Elimina todos los pendientes, conserva historial y actual
    pub fn clear(&mut self) {
        let keep = self.upcoming_start();
        self.tracks.truncate(keep);
    }

    /// Mueve un track dentro de los pendientes (índices relativos a `upcoming`).
    pub fn move_track(&mut self, from: usize, to: usize) -> Option<&Track> {
        let len = self.len();
        if from >= len || to >= len {
            return None;
        }

        let base = self.upcoming_start();
        let track = self.tracks.remove(base + from);
        self.tracks.insert(base + to, track);
        self.tracks.get(base + to)
    }

    /// Elimina el rango cerrado `[from, to]` de los pendientes.
    ///
    /// Returns how many tracks were removed, or `None` (queue untouched) when
    /// `from > to` or either bound falls outside the upcoming slice.
    pub fn remove(&mut self, from: usize, to: usize) -> Option<usize> {
        let len = self.len();
        if from > to || from >= len || to >= len {
            return None;
        }

        let base = self.upcoming_start();
        let removed = self.tracks.drain(base + from..=base + to).count();
        Some(removed)
    }

    /// Vuelve el cursor al inicio sin tocar los tracks (loop de cola)
    pub fn restart(&mut self) {
        self.cursor = None;
    }

    /// Duración total de los pendientes
    pub fn upcoming_duration(&self) -> Duration {
        Duration::from_millis(self.upcoming().iter().map(|t| t.duration_ms).sum())
    }

    pub fn serialize(&self) -> SerializedQueue {
        self.serialize_at(now_ms())
    }

    pub fn serialize_at(&self, saved_at: i64) -> SerializedQueue {
        SerializedQueue {
            tracks: self.tracks.clone(),
            position: self.position(),
            saved_at,
        }
    }

    /// Reconstruye una cola guardada.
    ///
    /// A position that does not fit the stored tracks is clamped to the last
    /// track (or to "no cursor" for an empty list).
    pub fn deserialize(record: SerializedQueue) -> Self {
        let len = record.tracks.len();
        let cursor = match usize::try_from(record.position) {
            Ok(_) if len == 0 => None,
            Ok(pos) => Some(pos.min(len - 1)),
            Err(_) => None,
        };

        Self {
            tracks: record.tracks,
            cursor,
        }
    }

    fn upcoming_start(&self) -> usize {
        self.cursor.map_or(0, |pos| pos + 1)
    }
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, SeedableRng};

    fn track(name: &str) -> Track {
        Track::new(name, "artist", format!("handle:{name}"))
            .with_duration(Duration::from_secs(60))
    }

    fn titles(tracks: &[Track]) -> Vec<&str> {
        tracks.iter().map(|t| t.title.as_str()).collect()
    }

    fn queue_of(names: &[&str], cursor: Option<usize>) -> Queue {
        let mut queue = Queue::new();
        queue.add(names.iter().map(|n| track(n)).collect(), false);
        queue.cursor = cursor;
        queue
    }

    fn assert_invariant(queue: &Queue) {
        if let Some(pos) = queue.cursor {
            assert!(pos < queue.tracks.len());
        }
        assert_eq!(
            queue.history().len() + queue.current().iter().count() + queue.len(),
            queue.total_len()
        );
    }

    #[test]
    fn empty_queue_has_no_cursor() {
        let queue = Queue::new();
        assert_eq!(queue.position(), -1);
        assert!(queue.current().is_none());
        assert!(queue.history().is_empty());
        assert!(queue.upcoming().is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn end_to_end_add_next_shuffle_clear() {
        let mut queue = Queue::new();
        queue.add(vec![track("T1"), track("T2"), track("T3")], false);
        assert_eq!(titles(queue.upcoming()), vec!["T1", "T2", "T3"]);
        assert!(queue.current().is_none());

        assert_eq!(queue.next(1).map(|t| t.title.as_str()), Some("T1"));
        assert_eq!(titles(queue.upcoming()), vec!["T2", "T3"]);

        queue.shuffle();
        assert_eq!(queue.current().map(|t| t.title.as_str()), Some("T1"));
        let mut upcoming = titles(queue.upcoming());
        upcoming.sort();
        assert_eq!(upcoming, vec!["T2", "T3"]);

        queue.clear();
        assert!(queue.upcoming().is_empty());
        assert_eq!(titles(queue.all()), vec!["T1"]);
    }

    #[test]
    fn add_next_inserts_right_after_current() {
        let mut queue = queue_of(&["A", "B", "C"], Some(0));
        queue.add(vec![track("X"), track("Y")], true);
        assert_eq!(titles(queue.all()), vec!["A", "X", "Y", "B", "C"]);

        let mut empty = Queue::new();
        empty.add(vec![track("A")], false);
        empty.add(vec![track("X")], true);
        assert_eq!(titles(empty.all()), vec!["X", "A"]);
    }

    #[test]
    fn next_past_the_end_leaves_position_unchanged() {
        let mut queue = queue_of(&["A", "B", "C"], Some(1));
        assert!(queue.next(2).is_none());
        assert_eq!(queue.position(), 1);

        assert_eq!(queue.next(1).map(|t| t.title.as_str()), Some("C"));
        assert!(queue.next(1).is_none());
        assert_eq!(queue.position(), 2);
    }

    #[test]
    fn next_skips_multiple_tracks() {
        let mut queue = queue_of(&["A", "B", "C", "D"], None);
        assert_eq!(queue.next(3).map(|t| t.title.as_str()), Some("C"));
        assert_eq!(titles(queue.history()), vec!["A", "B"]);
    }

    #[test]
    fn prev_stops_at_first_track() {
        let mut queue = queue_of(&["A", "B"], Some(1));
        assert_eq!(queue.prev().map(|t| t.title.as_str()), Some("A"));
        assert!(queue.prev().is_none());
        assert_eq!(queue.position(), 0);

        let mut fresh = queue_of(&["A"], None);
        assert!(fresh.prev().is_none());
        assert_eq!(fresh.position(), -1);
    }

    #[test]
    fn shuffle_keeps_history_and_current() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let mut queue = queue_of(&["A", "B", "C", "D", "E"], Some(1));
            queue.shuffle_with(&mut rng);

            assert_eq!(titles(&queue.all()[..2]), vec!["A", "B"]);
            let mut rest = titles(&queue.all()[2..]);
            rest.sort();
            assert_eq!(rest, vec!["C", "D", "E"]);
        }
    }

    #[test]
    fn clear_without_cursor_drops_everything() {
        let mut queue = queue_of(&["A", "B"], None);
        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn move_first_upcoming_to_end() {
        let mut queue = queue_of(&["H", "C", "X", "Y", "Z"], Some(1));
        let moved = queue.move_track(0, 2).map(|t| t.title.clone());
        assert_eq!(moved.as_deref(), Some("X"));
        assert_eq!(titles(queue.upcoming()), vec!["Y", "Z", "X"]);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn move_out_of_range_is_rejected() {
        let mut queue = queue_of(&["C", "X", "Y"], Some(0));
        let before = queue.clone();
        assert!(queue.move_track(0, 2).is_none());
        assert!(queue.move_track(2, 0).is_none());
        assert_eq!(queue, before);
    }

    #[test]
    fn remove_closed_range() {
        let mut queue = queue_of(&["C", "A", "B", "D", "E"], Some(0));
        assert_eq!(queue.remove(1, 2), Some(2));
        assert_eq!(titles(queue.upcoming()), vec!["A", "E"]);
        assert_eq!(queue.current().map(|t| t.title.as_str()), Some("C"));
    }

    #[test]
    fn remove_invalid_range_leaves_queue_unchanged() {
        let mut queue = queue_of(&["C", "A", "B"], Some(0));
        let before = queue.clone();

        assert_eq!(queue.remove(1, 0), None);
        assert_eq!(queue.remove(0, 2), None);
        assert_eq!(queue.remove(2, 2), None);
        assert_eq!(queue, before);
    }

    #[test]
    fn positional_mutators_never_touch_played_tracks() {
        let mut rng = StdRng::seed_from_u64(42);
        let names: Vec<String> = (0..12).map(|i| format!("T{i}")).collect();

        for _ in 0..500 {
            let len = rng.gen_range(0..names.len());
            let mut queue = Queue::new();
            queue.add(names[..len].iter().map(|n| track(n)).collect(), false);
            if len > 0 {
                queue.next(rng.gen_range(1..=len));
            }
            let played: Vec<Track> = queue.all()[..queue.upcoming_start()].to_vec();
            let before = queue.clone();

            let a = rng.gen_range(0..len + 2);
            let b = rng.gen_range(0..len + 2);
            match rng.gen_range(0..3) {
                0 => queue.shuffle_with(&mut rng),
                1 => {
                    if queue.move_track(a, b).is_none() {
                        assert_eq!(queue, before);
                    }
                }
                _ => {
                    if queue.remove(a, b).is_none() {
                        assert_eq!(queue, before);
                    }
                }
            }

            assert_eq!(&queue.all()[..played.len()], played.as_slice());
            assert_eq!(queue.position(), before.position());
            assert_invariant(&queue);
        }
    }

    #[test]
    fn restart_resets_cursor_only() {
        let mut queue = queue_of(&["A", "B"], Some(1));
        queue.restart();
        assert_eq!(queue.position(), -1);
        assert_eq!(queue.total_len(), 2);
        assert_eq!(titles(queue.upcoming()), vec!["A", "B"]);
    }

    #[test]
    fn upcoming_duration_sums_pending_tracks() {
        let queue = queue_of(&["A", "B", "C"], Some(0));
        assert_eq!(queue.upcoming_duration(), Duration::from_secs(120));
    }

    #[test]
    fn serialize_round_trip() {
        let queue = queue_of(&["A", "B", "C"], Some(1));
        let record = queue.serialize();
        assert_eq!(record.position, 1);

        let restored = Queue::deserialize(record);
        assert_eq!(restored, queue);

        let empty = Queue::deserialize(Queue::new().serialize());
        assert_eq!(empty, Queue::new());
    }

    #[test]
    fn deserialize_clamps_out_of_range_position() {
        let mut record = queue_of(&["A", "B"], Some(1)).serialize();
        record.position = 9;
        assert_eq!(Queue::deserialize(record.clone()).position(), 1);

        record.position = -5;
        assert_eq!(Queue::deserialize(record.clone()).position(), -1);

        record.tracks.clear();
        record.position = 3;
        assert_eq!(Queue::deserialize(record).position(), -1);
    }

    #[test]
    fn saved_queue_expires_after_four_hours() {
        let record = Queue::new().serialize_at(1_000);
        assert!(record.is_valid_at(1_000 + QUEUE_MAX_AGE_MS - 1));
        assert!(!record.is_valid_at(1_000 + QUEUE_MAX_AGE_MS));
        assert!(!record.is_valid_at(1_000 + QUEUE_MAX_AGE_MS + 1));
    }
}
