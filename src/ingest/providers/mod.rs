// src/ingest/providers/mod.rs
pub mod teleportd;
pub mod twitter;

pub use teleportd::TeleportdProvider;
pub use twitter::TwitterProvider;
