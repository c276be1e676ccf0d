//! # polyglot-repl
//!
//! An interactive multi-language shell that drives an execution kernel over an
//! asynchronous event stream. Submitted code is correlated back to the events
//! it causes and folded either into live terminal output or into a
//! serializable notebook transcript.
//!
//! ## Quick start
//!
//! ```no_run
//! use polyglot_repl::runtime::{NotebookRunner, ProcessKernel};
//! use polyglot_repl::core::Cell;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> polyglot_repl::Result<()> {
//! let kernel = Arc::new(ProcessKernel::with_default_language("python"));
//! let runner = NotebookRunner::new(kernel);
//! let document = runner
//!     .run(&[Cell::new("print('hi')", "python")], None, CancellationToken::new())
//!     .await?;
//! assert!(!document.has_errors());
//! # Ok(())
//! # }
//! ```
//!
//! ## Module layout
//!
//! - [`core`]: commands, events, output elements, history, errors
//! - [`runtime`]: kernel contract, event correlation, notebook runner,
//!   interactive session loop, completion bridge, process kernel
//! - `cli` (feature `cli`): argument parsing, configuration, line editor,
//!   terminal rendering and notebook documents

pub mod core;
pub mod runtime;

#[cfg(feature = "cli")]
pub mod cli;

pub use crate::core::{ReplError, Result};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
