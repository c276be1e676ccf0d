//! Core data model of the shell
//!
//! This module handles:
//! - Commands and their parent/child arena
//! - The closed kernel event union
//! - Output elements and result documents
//! - Submission history
//! - The crate error type
//!
//! Nothing here is async; the runtime tree drives these types.

pub mod command;
pub mod error;
pub mod event;
pub mod history;
pub mod output;


pub use command::{Command, CommandArena, CommandId, CommandKind};
pub use error::{ReplError, Result};
pub use event::{CompletionItem, FormattedValue, KernelEvent, PLAIN_TEXT};
pub use history::{HistoryEntry, HistoryStore, SharedHistory};
pub use output::{Cell, CellResult, OutputElement, ResultDocument, TextStream};
