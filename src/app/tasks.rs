//! Runs the blocking engine calls off the async runtime and reports back
//! through an [`EventProxy`].

use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::events::TaskEvent;
use super::proxy::EventProxy;
use crate::core::{ContextAssembler, CoreError, GeneratedContext, ScanOutcome};

/// Scans on the blocking thread pool.
pub async fn run_scan(
    assembler: Arc<ContextAssembler>,
    force: bool,
) -> Result<ScanOutcome, CoreError> {
    tokio::task::spawn_blocking(move || assembler.scan(force)).await?
}

/// Generates on the blocking thread pool.
pub async fn run_generate(
    assembler: Arc<ContextAssembler>,
    selected: Vec<PathBuf>,
) -> Result<GeneratedContext, CoreError> {
    tokio::task::spawn_blocking(move || assembler.generate(&selected)).await?
}

/// Starts a scan and sends [`TaskEvent::ScanFinished`] or [`TaskEvent::Failed`].
pub fn start_scan<P: EventProxy>(
    assembler: Arc<ContextAssembler>,
    force: bool,
    proxy: P,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let root = assembler.root().to_path_buf();
        tracing::info!("Starting scan of {} (force: {})", root.display(), force);
        let event = match run_scan(assembler, force).await {
            Ok(outcome) => TaskEvent::ScanFinished { root, outcome },
            Err(e) => {
                tracing::error!("Scan of {} failed: {}", root.display(), e);
                TaskEvent::Failed {
                    root,
                    message: e.to_string(),
                }
            }
        };
        proxy.send_event(event);
    })
}

/// Starts document generation for `selected`.
///
/// An unusable selection is reported as [`TaskEvent::NothingSelected`], not
/// as a failure.
pub fn start_generate<P: EventProxy>(
    assembler: Arc<ContextAssembler>,
    selected: Vec<PathBuf>,
    proxy: P,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let root = assembler.root().to_path_buf();
        tracing::info!(
            "Generating document for {} selected files in {}",
            selected.len(),
            root.display()
        );
        let event = match run_generate(assembler, selected).await {
            Ok(context) => TaskEvent::GenerateFinished {
                root,
                context: Box::new(context),
            },
            Err(CoreError::NoValidSelection) => TaskEvent::NothingSelected { root },
            Err(e) => {
                tracing::error!("Generation for {} failed: {}", root.display(), e);
                TaskEvent::Failed {
                    root,
                    message: e.to_string(),
                }
            }
        };
        proxy.send_event(event);
    })
}
