use crate::cli::config::Config;
use crate::cli::document::{read_cells, write_document, OutputFormat};
use crate::cli::editor::LineEditor;
use crate::cli::render::ConsoleTerminal;
use crate::cli::{PromptInputs, EXIT_CANCELLED, EXIT_EXECUTION_FAILED, EXIT_SUCCESS};
use crate::core::{HistoryStore, ReplError, Result};
use crate::runtime::{
    CompletionBridge, InteractiveSession, KernelFacade, NotebookRunner, ParameterInputs,
    ProcessKernel,
};
use clap::{Parser, ValueEnum};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Interactive multi-language shell and notebook runner
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Notebook (.ipynb, .dib) or source file to run
    #[arg(long, value_name = "PATH")]
    pub run: Option<PathBuf>,

    /// Exit once --run completes instead of staying interactive
    #[arg(long)]
    pub exit_after_run: bool,

    /// Language selected at startup
    #[arg(long, value_enum, env = "POLYGLOT_REPL_DEFAULT_KERNEL")]
    pub default_kernel: Option<KernelName>,

    /// Value for a notebook input field (repeatable)
    #[arg(long = "input", value_name = "KEY=VALUE", value_parser = parse_input)]
    pub inputs: Vec<(String, String)>,

    /// Format of the result document
    #[arg(long, value_enum)]
    pub output_format: Option<OutputFormat>,

    /// Write the result document here instead of stdout
    #[arg(long, value_name = "PATH")]
    pub output_path: Option<PathBuf>,

    /// Working directory for interpreter processes
    #[arg(long, value_name = "DIR")]
    pub working_dir: Option<PathBuf>,

    /// Write logs to DIR/polyglot-repl.log instead of stderr
    #[arg(long, value_name = "DIR")]
    pub log_path: Option<PathBuf>,

    /// Configuration file (defaults to config.toml in the data directory)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Languages accepted by `--default-kernel`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KernelName {
    Csharp,
    Fsharp,
    Pwsh,
    Sql,
    Python,
    Bash,
}

impl KernelName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csharp => "csharp",
            Self::Fsharp => "fsharp",
            Self::Pwsh => "pwsh",
            Self::Sql => "sql",
            Self::Python => "python",
            Self::Bash => "bash",
        }
    }
}

/// Parse a `KEY=VALUE` input token
pub fn parse_input(token: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = token
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{token}'"))?;
    if key.trim().is_empty() {
        return Err(format!("invalid KEY=VALUE: empty key in '{token}'"));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

impl Cli {
    /// Run the shell and return the process exit code
    pub async fn execute(self) -> Result<i32> {
        if self.exit_after_run && self.run.is_none() {
            return Err(ReplError::invalid_input("--exit-after-run requires --run"));
        }

        // Load configuration from file, then merge with CLI args
        let config = match &self.config {
            Some(path) => Config::load_from_file(path)?,
            None => Config::load_default().unwrap_or_else(|e| {
                warn!(error = %e, "could not load configuration, using defaults");
                Config::default()
            }),
        }
        .merge_with_cli_args(&self);

        let catalog = config.language_catalog()?;
        let default_language = catalog.canonical_name(&config.default_kernel)?;

        let mut kernel = ProcessKernel::new(catalog.clone(), default_language.clone());
        if let Some(dir) = &config.working_dir {
            kernel = kernel.with_working_dir(dir);
        }
        kernel.set_fallback_resolver(Arc::new(PromptInputs));
        let kernel = Arc::new(kernel);

        let inputs: HashMap<String, String> = self.inputs.iter().cloned().collect();
        let cells = match &self.run {
            Some(path) => read_cells(path, &catalog, &default_language)?,
            None => Vec::new(),
        };

        let cancel = CancellationToken::new();
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, cancelling");
                interrupt.cancel();
            }
        });

        let batch = self.run.is_some()
            && (self.output_path.is_some()
                || self.output_format.is_some()
                || !console::Term::stdout().is_term());

        if batch {
            self.run_batch(kernel, &cells, &inputs, &config, cancel).await
        } else {
            self.run_interactive(kernel, &cells, &inputs, &config, cancel)
                .await
        }
    }

    async fn run_batch(
        &self,
        kernel: Arc<ProcessKernel>,
        cells: &[crate::core::Cell],
        inputs: &HashMap<String, String>,
        config: &Config,
        cancel: CancellationToken,
    ) -> Result<i32> {
        info!(cells = cells.len(), "running notebook in batch mode");
        let runner = NotebookRunner::new(kernel);
        let parameters = (!inputs.is_empty()).then_some(inputs);

        let document = match runner.run(cells, parameters, cancel).await {
            Ok(document) => document,
            Err(ReplError::Cancelled) => return Ok(EXIT_CANCELLED),
            Err(e) => return Err(e),
        };

        let format = config.output.format.unwrap_or(OutputFormat::Ipynb);
        match &self.output_path {
            Some(path) => {
                let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
                write_document(&document, format, self.run.as_deref(), &mut file)?;
                file.flush()?;
                debug!(path = %path.display(), "result document written");
            }
            None => {
                let stdout = std::io::stdout();
                let mut out = stdout.lock();
                write_document(&document, format, self.run.as_deref(), &mut out)?;
            }
        }

        Ok(if document.has_errors() {
            EXIT_EXECUTION_FAILED
        } else {
            EXIT_SUCCESS
        })
    }

    async fn run_interactive(
        &self,
        kernel: Arc<ProcessKernel>,
        cells: &[crate::core::Cell],
        inputs: &HashMap<String, String>,
        config: &Config,
        cancel: CancellationToken,
    ) -> Result<i32> {
        if !inputs.is_empty() {
            kernel.set_input_resolver(Arc::new(ParameterInputs::new(inputs)));
        }

        let history = HistoryStore::shared();
        let editor = LineEditor::spawn(
            history.clone(),
            CompletionBridge::new(kernel.clone()),
            config.theme.clone(),
        )?;
        let terminal = ConsoleTerminal::new(
            config.theme.clone(),
            config.output.color,
            config.output.spinner,
        );

        let summary = InteractiveSession::new(kernel, Box::new(editor), Box::new(terminal))
            .with_history(history)
            .with_queued_cells(cells)
            .exit_after_run(self.exit_after_run)
            .with_cancellation(cancel)
            .on_quit(|| debug!("user quit the session"))
            .run()
            .await?;

        Ok(if summary.cancelled {
            EXIT_CANCELLED
        } else if self.exit_after_run && summary.had_errors {
            EXIT_EXECUTION_FAILED
        } else {
            EXIT_SUCCESS
        })
    }
}
