//! Async runtime: driving a kernel and correlating its events
//!
//! This module handles:
//! - The kernel contract and event subscriptions
//! - Folding one command's events into output
//! - Batch notebook runs and the interactive session loop
//! - Completion requests
//! - The built-in interpreter-process kernel

pub mod completion;
pub mod correlator;
pub mod kernel;
pub mod language;
pub mod notebook;
pub mod process;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

#[cfg(all(test, unix))]
mod process_test;

pub use completion::{completion_span, CompletionBridge, CompletionSpan};
pub use correlator::{correlate, CommandOutcome, Correlated, EventCorrelator, OutputSink};
pub use kernel::{
    EventBus, EventSubscription, InputResolver, KernelFacade, NoInputs, ParameterInputs,
    EVENT_CHANNEL_CAPACITY,
};
pub use language::{LanguageCatalog, LanguageOverride, LanguageSpec};
pub use notebook::NotebookRunner;
pub use process::ProcessKernel;
pub use session::{
    status_message, InputSource, InteractiveSession, Prompt, ReadOutcome, SessionSummary,
    Terminal,
};
