//! Messages delivered to a front end when background work completes.

use std::path::PathBuf;

use crate::core::{GeneratedContext, ScanOutcome};

#[derive(Debug)]
pub enum TaskEvent {
    /// A scan of `root` completed.
    ScanFinished { root: PathBuf, outcome: ScanOutcome },
    /// A document for `root` was generated.
    GenerateFinished {
        root: PathBuf,
        context: Box<GeneratedContext>,
    },
    /// Generation was requested but none of the selected files was usable.
    NothingSelected { root: PathBuf },
    /// The task failed; `message` is meant for the user.
    Failed { root: PathBuf, message: String },
}
