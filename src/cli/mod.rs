//! Command line front end for the polyglot shell.
//! ## Usage
//!
//! ```bash
//! # Start an interactive session in F#
//! polyglot-repl --default-kernel fsharp
//!
//! # Run a notebook, then keep the session open
//! polyglot-repl --run analysis.ipynb
//!
//! # Run a notebook headless and write test results
//! polyglot-repl --run checks.dib --input user=alice --output-format trx --output-path checks.trx
//! ```

pub mod app;
pub mod config;
pub mod document;
pub mod editor;
pub mod render;

pub use app::{Cli, KernelName};
pub use config::Config;
pub use document::{read_cells, write_document, OutputFormat};
pub use editor::LineEditor;
pub use render::{ConsoleTerminal, Theme};

use crate::core::Result;
use crate::runtime::InputResolver;

/// Every cell and submission ran without an error output
pub const EXIT_SUCCESS: i32 = 0;

/// At least one cell or submission produced an error output
pub const EXIT_EXECUTION_FAILED: i32 = 2;

/// The user cancelled a running command
pub const EXIT_CANCELLED: i32 = 130;

/// Default directory for configuration and logs
pub fn default_data_dir() -> std::path::PathBuf {
    directories::ProjectDirs::from("", "", "polyglot-repl")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| {
            // Fallback to home directory if project dirs not available
            dirs::home_dir()
                .unwrap_or_else(|| std::path::PathBuf::from("."))
                .join(".polyglot-repl")
        })
}

/// Initialize the data directory if it doesn't exist
pub fn ensure_data_dir() -> Result<std::path::PathBuf> {
    let data_dir = default_data_dir();
    if !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)?;
    }
    Ok(data_dir)
}

/// Asks the person at the terminal for input values the parameters did not
/// supply. Resolves nothing when nobody is attending.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptInputs;

impl InputResolver for PromptInputs {
    fn resolve(&self, name: &str, type_hint: Option<&str>) -> Option<String> {
        if !console::user_attended() {
            return None;
        }

        let prompt = match type_hint {
            Some(hint) => format!("{name} ({hint})"),
            None => name.to_string(),
        };
        dialoguer::Input::<String>::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
            .map_err(|e| tracing::warn!(input = name, error = %e, "input prompt failed"))
            .ok()
    }
}
