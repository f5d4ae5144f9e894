pub mod autosave;

pub use autosave::{AutosaveScheduler, PersistKind, PersistReport, PersistRequest};
