//! Embeds y componentes de Discord.

pub mod buttons;
pub mod embeds;
