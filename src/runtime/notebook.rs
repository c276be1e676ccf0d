//! Non-interactive notebook execution
//!
//! This module handles:
//! - Running document cells strictly one after another
//! - Resolving input requests from a parameter map
//! - Assembling the timed result document
//!
//! A failing cell is recorded and the run moves on; only host faults and
//! cancellation stop it early.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::core::{Cell, CellResult, Command, ReplError, ResultDocument, Result};
use crate::runtime::correlator::{correlate, CommandOutcome};
use crate::runtime::kernel::{KernelFacade, ParameterInputs};

/// Runs notebook cells against a kernel
#[derive(Clone)]
pub struct NotebookRunner {
    kernel: Arc<dyn KernelFacade>,
}

impl NotebookRunner {
    /// Create a new runner over `kernel`
    pub fn new(kernel: Arc<dyn KernelFacade>) -> Self {
        Self { kernel }
    }

    /// Run `cells` in order and return their transcript.
    ///
    /// `parameters` answers input requests by case-insensitive name; requests
    /// it does not cover fall through to the kernel's own fallback.
    #[instrument(skip_all, fields(cells = cells.len()))]
    pub async fn run(
        &self,
        cells: &[Cell],
        parameters: Option<&HashMap<String, String>>,
        cancel: CancellationToken,
    ) -> Result<ResultDocument> {
        if let Some(parameters) = parameters {
            debug!(count = parameters.len(), "installing notebook parameters");
            self.kernel
                .set_input_resolver(Arc::new(ParameterInputs::new(parameters)));
        }

        let mut document = ResultDocument::new(self.kernel.default_language());

        for (index, cell) in cells.iter().enumerate() {
            let started_at = Utc::now();
            let command = Command::submit_code(cell.code.clone()).with_language(cell.language.clone());

            let correlated = correlate(self.kernel.as_ref(), command, Vec::new(), cancel.clone()).await?;
            let ended_at = Utc::now();

            match &correlated.outcome {
                CommandOutcome::Cancelled => {
                    info!(cell = index + 1, "notebook run cancelled");
                    return Err(ReplError::Cancelled);
                }
                CommandOutcome::Failed { message } => {
                    info!(cell = index + 1, %message, "cell failed, continuing");
                }
                CommandOutcome::Succeeded => {
                    debug!(cell = index + 1, outputs = correlated.sink.len(), "cell finished");
                }
            }

            document.cells.push(CellResult {
                cell: cell.clone(),
                outputs: correlated.sink,
                started_at,
                ended_at,
            });
        }

        info!(
            cells = document.cells.len(),
            failed = document.has_errors(),
            "notebook run finished"
        );
        Ok(document)
    }
}
