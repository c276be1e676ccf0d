//! Kernel event taxonomy.
//!
//! Every event references exactly one command. Events are a closed sum type;
//! new kinds are added by extending [`KernelEvent`].

use crate::core::command::CommandId;
use serde::{Deserialize, Serialize};

/// MIME type used for plain text values
pub const PLAIN_TEXT: &str = "text/plain";

/// A value rendered for one MIME type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedValue {
    pub mime_type: String,
    pub value: String,
}

impl FormattedValue {
    pub fn new(mime_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            value: value.into(),
        }
    }

    /// A `text/plain` value
    pub fn plain(value: impl Into<String>) -> Self {
        Self::new(PLAIN_TEXT, value)
    }
}

/// Text of the first formatted value, or the empty string
pub fn plain_text_value(values: &[FormattedValue]) -> &str {
    values.first().map(|v| v.value.as_str()).unwrap_or_default()
}

/// One completion candidate offered by a kernel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionItem {
    pub display_text: String,
    pub insert_text: String,
}

impl CompletionItem {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            display_text: text.clone(),
            insert_text: text,
        }
    }
}

/// Asynchronous notification emitted by a kernel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum KernelEvent {
    CodeSubmissionReceived {
        command: CommandId,
    },
    CompleteCodeSubmissionReceived {
        command: CommandId,
    },
    IncompleteCodeSubmissionReceived {
        command: CommandId,
    },
    ErrorProduced {
        command: CommandId,
        message: String,
    },
    StandardOutputProduced {
        command: CommandId,
        values: Vec<FormattedValue>,
    },
    StandardErrorProduced {
        command: CommandId,
        values: Vec<FormattedValue>,
    },
    DisplayedValueProduced {
        command: CommandId,
        value_id: Option<String>,
        values: Vec<FormattedValue>,
    },
    DisplayedValueUpdated {
        command: CommandId,
        value_id: Option<String>,
        values: Vec<FormattedValue>,
    },
    /// `already_displayed` marks a deferred display value that was already
    /// surfaced through `DisplayedValueProduced`.
    ReturnValueProduced {
        command: CommandId,
        values: Vec<FormattedValue>,
        already_displayed: bool,
    },
    CompletionsProduced {
        command: CommandId,
        completions: Vec<CompletionItem>,
    },
    InputProduced {
        command: CommandId,
        value: String,
    },
    CommandFailed {
        command: CommandId,
        message: String,
        stack_trace: Option<String>,
    },
    CommandSucceeded {
        command: CommandId,
    },
}

impl KernelEvent {
    /// Command this event is correlated to
    pub fn command(&self) -> CommandId {
        match self {
            Self::CodeSubmissionReceived { command }
            | Self::CompleteCodeSubmissionReceived { command }
            | Self::IncompleteCodeSubmissionReceived { command }
            | Self::ErrorProduced { command, .. }
            | Self::StandardOutputProduced { command, .. }
            | Self::StandardErrorProduced { command, .. }
            | Self::DisplayedValueProduced { command, .. }
            | Self::DisplayedValueUpdated { command, .. }
            | Self::ReturnValueProduced { command, .. }
            | Self::CompletionsProduced { command, .. }
            | Self::InputProduced { command, .. }
            | Self::CommandFailed { command, .. }
            | Self::CommandSucceeded { command } => *command,
        }
    }

    /// Whether this event ends the wait for its command
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::CommandFailed { .. } | Self::CommandSucceeded { .. }
        )
    }

    /// Short name used in logs
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::CodeSubmissionReceived { .. } => "CodeSubmissionReceived",
            Self::CompleteCodeSubmissionReceived { .. } => "CompleteCodeSubmissionReceived",
            Self::IncompleteCodeSubmissionReceived { .. } => "IncompleteCodeSubmissionReceived",
            Self::ErrorProduced { .. } => "ErrorProduced",
            Self::StandardOutputProduced { .. } => "StandardOutputProduced",
            Self::StandardErrorProduced { .. } => "StandardErrorProduced",
            Self::DisplayedValueProduced { .. } => "DisplayedValueProduced",
            Self::DisplayedValueUpdated { .. } => "DisplayedValueUpdated",
            Self::ReturnValueProduced { .. } => "ReturnValueProduced",
            Self::CompletionsProduced { .. } => "CompletionsProduced",
            Self::InputProduced { .. } => "InputProduced",
            Self::CommandFailed { .. } => "CommandFailed",
            Self::CommandSucceeded { .. } => "CommandSucceeded",
        }
    }
}
