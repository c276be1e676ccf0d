use thiserror::Error;

/// Error type for the shell, its runtime and the command line front end.
///
/// Execution errors raised by submitted code are *not* represented here: they
/// are data and travel as [`OutputElement::Error`](crate::core::OutputElement).
/// This enum only covers faults of the host itself.
#[derive(Error, Debug)]
pub enum ReplError {
    #[error("Kernel error: {0}")]
    Kernel(String),

    #[error("Kernel event stream closed before the command completed")]
    KernelClosed,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("No value was supplied for input '{0}'")]
    InputUnresolved(String),

    #[error("Unknown language: {0}")]
    UnknownLanguage(String),

    #[error("Interpreter '{program}' for language '{language}' was not found on PATH")]
    InterpreterNotFound { language: String, program: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Document error: {0}")]
    Document(String),

    #[error("Line editor error: {0}")]
    Editor(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Async task error: {0}")]
    AsyncTask(#[from] tokio::task::JoinError),
}

impl ReplError {
    /// Create a kernel (host fault) error
    pub fn kernel<S: Into<String>>(msg: S) -> Self {
        Self::Kernel(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a document error
    pub fn document<S: Into<String>>(msg: S) -> Self {
        Self::Document(msg.into())
    }

    /// Create an editor error
    pub fn editor<S: Into<String>>(msg: S) -> Self {
        Self::Editor(msg.into())
    }

    /// Whether this error is the result of user cancellation rather than a fault
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Get user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            Self::KernelClosed => {
                "The kernel stopped responding. Restart the shell to continue.".to_string()
            }
            Self::UnknownLanguage(name) => {
                format!(
                    "Unknown language '{}'. Run '#!help' to list the available languages.",
                    name
                )
            }
            Self::InterpreterNotFound { language, program } => {
                format!(
                    "Interpreter '{}' for {} is not installed. Install it or point [languages.{}] in config.toml at another program.",
                    program, language, language
                )
            }
            Self::InputUnresolved(name) => {
                format!(
                    "No value was supplied for input '{}'. Pass it with --input {}=<value>.",
                    name, name
                )
            }
            _ => self.to_string(),
        }
    }
}

/// Convenient result type for the shell
pub type Result<T> = std::result::Result<T, ReplError>;
