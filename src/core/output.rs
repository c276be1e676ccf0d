//! Output elements and the result document of a notebook run
//!
//! This module handles:
//! - The three output element kinds (display, text, error)
//! - Per-cell results with wall-clock timing
//! - The ordered, serializable result document

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::event::FormattedValue;

/// Which stream a buffered text block came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextStream {
    Stdout,
    Stderr,
}

impl TextStream {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// One piece of output folded from the events of a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "output_type", rename_all = "snake_case")]
pub enum OutputElement {
    /// MIME type -> rendered value
    Display { data: BTreeMap<String, String> },
    /// Coalesced stdout/stderr text
    Text { text: String, stream: TextStream },
    Error {
        name: String,
        message: String,
        stack_trace: Vec<String>,
    },
}

impl OutputElement {
    /// Build a display element from formatted values
    pub fn display(values: &[FormattedValue]) -> Self {
        Self::Display {
            data: values
                .iter()
                .map(|v| (v.mime_type.clone(), v.value.clone()))
                .collect(),
        }
    }

    /// Build an error element, splitting the stack trace on line breaks
    pub fn error(
        name: impl Into<String>,
        message: impl Into<String>,
        stack_trace: Option<&str>,
    ) -> Self {
        Self::Error {
            name: name.into(),
            message: message.into(),
            stack_trace: stack_trace
                .map(|trace| trace.lines().map(str::to_string).collect())
                .unwrap_or_default(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// A notebook cell as submitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub code: String,
    pub language: String,
}

impl Cell {
    pub fn new(code: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            language: language.into(),
        }
    }

    /// The cell as a single submission carrying its own language directive
    pub fn as_submission(&self) -> String {
        format!("#!{}\n{}", self.language, self.code)
    }
}

/// Outputs of one processed cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellResult {
    pub cell: Cell,
    pub outputs: Vec<OutputElement>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl CellResult {
    pub fn has_errors(&self) -> bool {
        self.outputs.iter().any(OutputElement::is_error)
    }
}

/// Ordered transcript of a batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultDocument {
    pub cells: Vec<CellResult>,
    /// Language the run started with
    pub default_language: String,
}

impl ResultDocument {
    pub fn new(default_language: impl Into<String>) -> Self {
        Self {
            cells: Vec::new(),
            default_language: default_language.into(),
        }
    }

    /// Whether any cell, wherever it sits in the run, produced an error output
    pub fn has_errors(&self) -> bool {
        self.cells.iter().any(CellResult::has_errors)
    }

    /// Cells with their outputs only, for comparing runs regardless of timing
    pub fn without_timings(&self) -> Vec<(&Cell, &[OutputElement])> {
        self.cells
            .iter()
            .map(|result| (&result.cell, result.outputs.as_slice()))
            .collect()
    }
}
