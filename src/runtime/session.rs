//! Interactive read-submit-render loop
//!
//! This module handles:
//! - Reading submissions from a line source or a pre-loaded queue
//! - Accumulating incomplete submissions across continuation lines
//! - Rendering output live while a submission runs
//! - Recording finished submissions in history
//! - Quitting through a callback and a shared cancellation token
//!
//! Queued submissions take the same path as typed ones, so a scripted run
//! behaves like a user typing the same cells.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::core::{Cell, Command, HistoryStore, OutputElement, Result, SharedHistory};
use crate::runtime::correlator::{correlate, CommandOutcome, Correlated, OutputSink};
use crate::runtime::kernel::KernelFacade;

/// Which prompt the input source should show
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    /// Ready for a new submission in `language`
    Primary { language: String },
    /// The previous lines were incomplete
    Continuation,
}

/// Outcome of one read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Line(String),
    /// The quit key was pressed
    Quit,
    /// Input was closed
    EndOfInput,
}

/// Where typed submissions come from
#[async_trait]
pub trait InputSource: Send {
    /// Read one submission. Must return promptly once `cancel` fires.
    async fn read(&mut self, prompt: Prompt, cancel: CancellationToken) -> Result<ReadOutcome>;
}

/// Live output surface
pub trait Terminal: Send {
    /// A submission was handed to the kernel
    fn submission_started(&mut self, status: &str);

    /// Show an output element. `replace_previous` redraws the last display
    /// element instead of adding a new one.
    fn render(&mut self, element: &OutputElement, replace_previous: bool);

    fn submission_finished(&mut self, outcome: &CommandOutcome);

    fn quitting(&mut self) {}
}

/// Summary of a finished session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Complete submissions sent to the kernel
    pub submissions: usize,
    /// Any submission produced an error output
    pub had_errors: bool,
    /// A submission was cancelled while running
    pub cancelled: bool,
}

struct LiveSink<'a> {
    terminal: &'a mut dyn Terminal,
    saw_error: bool,
}

impl OutputSink for LiveSink<'_> {
    fn append(&mut self, element: OutputElement) {
        self.saw_error |= element.is_error();
        self.terminal.render(&element, false);
    }

    fn update_display(&mut self, element: OutputElement) {
        self.terminal.render(&element, true);
    }
}

const STATUS_VERBS: &[&str] = &[
    "Calculating",
    "Collating",
    "Compiling",
    "Computing",
    "Executing",
    "Invoking",
    "Running",
    "Tabulating",
    "Warming up",
];

const STATUS_QUANTIFIERS: &[&str] = &[
    "all kinds of",
    "all the",
    "lots of",
    "much",
    "several",
    "so many",
    "so much",
    "the",
    "those",
];

const STATUS_NOUNS: &[&str] = &[
    "bits",
    "codes",
    "data transformations",
    "data",
    "exceptions",
    "functions",
    "genius",
    "internets",
    "implementation details",
    "monads",
    "pure functions",
    "side effects",
    "smart stuff",
    "software",
    "things",
];

/// A random spinner message such as "Compiling lots of monads"
pub fn status_message() -> String {
    let mut rng = rand::thread_rng();
    let pick = |words: &[&'static str], rng: &mut rand::rngs::ThreadRng| {
        words.choose(rng).copied().unwrap_or_default()
    };
    format!(
        "{} {} {}",
        pick(STATUS_VERBS, &mut rng),
        pick(STATUS_QUANTIFIERS, &mut rng),
        pick(STATUS_NOUNS, &mut rng)
    )
}

type QuitCallback = Box<dyn FnOnce() + Send>;

/// Drives a kernel from an input source, rendering to a terminal
pub struct InteractiveSession {
    kernel: Arc<dyn KernelFacade>,
    input: Box<dyn InputSource>,
    terminal: Box<dyn Terminal>,
    history: SharedHistory,
    queue: VecDeque<String>,
    exit_after_run: bool,
    cancel: CancellationToken,
    on_quit: Option<QuitCallback>,
}

impl InteractiveSession {
    /// Create a new session
    pub fn new(
        kernel: Arc<dyn KernelFacade>,
        input: Box<dyn InputSource>,
        terminal: Box<dyn Terminal>,
    ) -> Self {
        Self {
            kernel,
            input,
            terminal,
            history: HistoryStore::shared(),
            queue: VecDeque::new(),
            exit_after_run: false,
            cancel: CancellationToken::new(),
            on_quit: None,
        }
    }

    /// Share an existing history (the line editor navigates the same one)
    pub fn with_history(mut self, history: SharedHistory) -> Self {
        self.history = history;
        self
    }

    /// Pre-load cells; each is submitted as `#!language\ncode`
    pub fn with_queued_cells(mut self, cells: &[Cell]) -> Self {
        self.queue.extend(cells.iter().map(Cell::as_submission));
        self
    }

    /// Stop once the queue is drained instead of reading input.
    /// Has no effect when nothing is queued.
    pub fn exit_after_run(mut self, exit_after_run: bool) -> Self {
        self.exit_after_run = exit_after_run;
        self
    }

    /// Use an externally owned cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Callback run when the user quits
    pub fn on_quit(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_quit = Some(Box::new(callback));
        self
    }

    pub fn history(&self) -> SharedHistory {
        self.history.clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until quit, end of input, cancellation, or (with exit-after-run)
    /// the end of the queue.
    ///
    /// Execution errors are rendered and counted, never returned. Host faults
    /// end the session with an error.
    #[instrument(skip_all)]
    pub async fn run(mut self) -> Result<SessionSummary> {
        let exit_after_run = self.exit_after_run && !self.queue.is_empty();
        let mut summary = SessionSummary::default();
        let mut pending: Option<String> = None;

        info!("session started");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let submission = match self.queue.pop_front() {
                Some(queued) => {
                    // Queued cells are whole units; an incomplete one is dropped
                    pending = None;
                    queued
                }
                None if exit_after_run => {
                    debug!("queue drained, exiting");
                    break;
                }
                None => {
                    let prompt = match pending {
                        Some(_) => Prompt::Continuation,
                        None => Prompt::Primary {
                            language: self.kernel.default_language(),
                        },
                    };
                    match self.input.read(prompt, self.cancel.clone()).await? {
                        ReadOutcome::Line(line) => match pending.take() {
                            Some(mut buffer) => {
                                buffer.push_str(&line);
                                buffer
                            }
                            None => line,
                        },
                        ReadOutcome::Quit => {
                            self.quit();
                            break;
                        }
                        ReadOutcome::EndOfInput => {
                            debug!("input closed");
                            self.quit();
                            break;
                        }
                    }
                }
            };

            if submission.trim().is_empty() {
                self.history.lock().try_append("", None);
                continue;
            }

            let language = self.kernel.default_language();
            self.terminal.submission_started(&status_message());

            let sink = LiveSink {
                terminal: self.terminal.as_mut(),
                saw_error: false,
            };
            let Correlated {
                outcome,
                incomplete,
                sink,
                ..
            } = correlate(
                self.kernel.as_ref(),
                Command::submit_code(submission.clone()),
                sink,
                self.cancel.clone(),
            )
            .await?;
            let saw_error = sink.saw_error;

            self.terminal.submission_finished(&outcome);

            if incomplete {
                debug!("submission incomplete, reading more input");
                pending = Some(format!("{submission}\n"));
                continue;
            }

            summary.submissions += 1;
            summary.had_errors |= saw_error;

            match outcome {
                CommandOutcome::Cancelled => {
                    summary.cancelled = true;
                    break;
                }
                CommandOutcome::Failed { .. } | CommandOutcome::Succeeded => {
                    self.history.lock().try_append(&submission, Some(&language));
                }
            }
        }

        info!(
            submissions = summary.submissions,
            had_errors = summary.had_errors,
            "session finished"
        );
        Ok(summary)
    }

    fn quit(&mut self) {
        info!("quit requested");
        self.terminal.quitting();
        if let Some(callback) = self.on_quit.take() {
            callback();
        }
        self.cancel.cancel();
    }
}
