pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod journaling;
pub mod model;
pub mod outcome;
pub mod search;
pub mod storage;
pub mod tasks;

#[cfg(test)]
mod testing;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use error::NoteError;
pub use model::{Note, NoteId};
pub use outcome::Outcome;
