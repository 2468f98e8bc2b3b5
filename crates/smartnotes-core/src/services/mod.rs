//! Client-facing services.

mod notes;

pub use notes::{BackgroundTasks, NotesService};
