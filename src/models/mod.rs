//! Core data models for conversion tasks and paper metadata.

mod paper;
mod task;

pub use paper::{clean_text, PaperMetadata};
pub use task::{Task, TaskError, TaskErrorKind, TaskStatus, TaskView, TransitionError};
