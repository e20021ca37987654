use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        next_command(),
        prev_command(),
        pause_command(),
        resume_command(),
        stop_command(),
        seek_command(),
        volume_command(),
        shuffle_command(),
        clear_command(),
        move_command(),
        remove_command(),
        loop_command(),
        queue_command(),
        history_command(),
        loadqueue_command(),
    ]
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción desde una URL")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "url", "URL de la canción")
                .required(true),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::Boolean,
            "next",
            "Reproducir a continuación en lugar de al final",
        ))
}

fn next_command() -> CreateCommand {
    CreateCommand::new("next")
        .description("Salta a la siguiente canción o a una posición de la cola")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "position", "Posición en la cola")
                .min_int_value(1),
        )
}

fn prev_command() -> CreateCommand {
    CreateCommand::new("prev").description("Vuelve a la canción anterior")
}

// Comandos de control

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la reproducción actual")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la reproducción pausada")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la música y desconecta el bot")
}

fn seek_command() -> CreateCommand {
    CreateCommand::new("seek")
        .description("Salta a un momento de la canción actual")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "time", "Tiempo en formato M:SS o 1m 30s")
                .required(true),
        )
}

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Cambia el volumen de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "value", "Volumen (0-100)")
                .required(true)
                .min_int_value(0)
                .max_int_value(100),
        )
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop")
        .description("Cambia el modo de repetición")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "mode", "Modo de repetición")
                .required(true)
                .add_string_choice("Desactivado", "none")
                .add_string_choice("Canción", "song")
                .add_string_choice("Cola", "queue")
                .add_string_choice("Autoplay", "autoplay"),
        )
}

// Comandos de cola

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Mezcla las canciones pendientes")
}

fn clear_command() -> CreateCommand {
    CreateCommand::new("clear").description("Elimina todas las canciones pendientes")
}

fn move_command() -> CreateCommand {
    CreateCommand::new("move")
        .description("Mueve una canción dentro de la cola")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "from", "Posición actual")
                .required(true)
                .min_int_value(1),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "to", "Nueva posición")
                .required(true)
                .min_int_value(1),
        )
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Elimina una canción o un rango de la cola")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "from", "Posición inicial")
                .required(true)
                .min_int_value(1),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "to", "Posición final (incluida)")
                .min_int_value(1),
        )
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Muestra la cola de reproducción")
}

fn history_command() -> CreateCommand {
    CreateCommand::new("history").description("Muestra las colas reproducidas recientemente")
}

fn loadqueue_command() -> CreateCommand {
    CreateCommand::new("loadqueue")
        .description("Vuelve a cargar una cola del historial")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "index", "Número en /history")
                .required(true)
                .min_int_value(1),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::Boolean,
            "replace",
            "Reemplazar las canciones pendientes",
        ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_every_command() {
        assert_eq!(all_commands().len(), 16);
    }
}
