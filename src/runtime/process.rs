//! Kernel that runs each language through an interpreter process
//!
//! This module handles:
//! - Splitting submissions on `#!language` directives into child commands
//! - Sticky default-language selection
//! - Built-in `#!help` and `#!about` directives
//! - Resolving `@input:name` tokens through input requests
//! - Streaming interpreter stdout/stderr as kernel events
//! - Collecting identifiers for completion
//!
//! Every code segment runs in a fresh interpreter process, so state does not
//! carry over between submissions.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::core::{
    Command, CommandArena, CommandId, CommandKind, CompletionItem, FormattedValue, KernelEvent,
    ReplError, Result,
};
use crate::runtime::kernel::{EventBus, EventSubscription, InputResolver, KernelFacade};
use crate::runtime::language::{LanguageCatalog, LanguageSpec};

/// Key bindings listed by `#!help`
pub const KEY_BINDINGS: &[(&str, &str)] = &[
    ("Enter", "Submit the current buffer"),
    ("Tab", "Complete the word before the cursor"),
    ("Shift-Tab", "Previous completion"),
    ("Ctrl-Up", "Previous history entry"),
    ("Ctrl-Down", "Next history entry"),
    ("Ctrl-Alt-C", "Clear the buffer"),
    ("Ctrl-C / Ctrl-D", "Quit"),
];

/// Kernel backed by interpreter processes
#[derive(Clone)]
pub struct ProcessKernel {
    inner: Arc<Inner>,
}

struct Inner {
    commands: CommandArena,
    bus: EventBus,
    gate: tokio::sync::Mutex<()>,
    catalog: RwLock<LanguageCatalog>,
    default_language: RwLock<String>,
    resolver: RwLock<Option<Arc<dyn InputResolver>>>,
    fallback: RwLock<Option<Arc<dyn InputResolver>>>,
    vocabulary: Mutex<BTreeSet<String>>,
    working_dir: Option<PathBuf>,
}

/// One unit of a split submission
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Code { language: String, code: String },
    Help,
    About,
}

/// Why a segment did not succeed
enum SegmentError {
    Failed(String),
    Cancelled,
}

impl ProcessKernel {
    /// Create a new kernel over `catalog`
    pub fn new(catalog: LanguageCatalog, default_language: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                commands: CommandArena::new(),
                bus: EventBus::new(),
                gate: tokio::sync::Mutex::new(()),
                catalog: RwLock::new(catalog),
                default_language: RwLock::new(default_language.into()),
                resolver: RwLock::new(None),
                fallback: RwLock::new(None),
                vocabulary: Mutex::new(BTreeSet::new()),
                working_dir: None,
            }),
        }
    }

    /// Create a new kernel over the built-in languages
    pub fn with_default_language(default_language: impl Into<String>) -> Self {
        Self::new(LanguageCatalog::builtin(), default_language)
    }

    /// Run interpreters in `dir`. Must be called before the kernel is shared.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.working_dir = Some(dir.into()),
            None => warn!("working directory ignored, kernel already shared"),
        }
        self
    }

    /// Resolver consulted when the installed one has no value, such as an
    /// interactive prompt
    pub fn set_fallback_resolver(&self, resolver: Arc<dyn InputResolver>) {
        *self.inner.fallback.write() = Some(resolver);
    }

    /// Snapshot of the language catalog
    pub fn catalog(&self) -> LanguageCatalog {
        self.inner.catalog.read().clone()
    }
}

#[async_trait]
impl KernelFacade for ProcessKernel {
    fn commands(&self) -> CommandArena {
        self.inner.commands.clone()
    }

    fn subscribe(&self) -> EventSubscription {
        self.inner.bus.subscribe()
    }

    async fn submit(
        &self,
        command: CommandId,
        _subscription: &EventSubscription,
        cancel: CancellationToken,
    ) -> Result<()> {
        let submitted = self
            .inner
            .commands
            .get(command)
            .ok_or_else(|| ReplError::kernel(format!("unknown command {command}")))?;

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let _turn = inner.gate.lock().await;
            inner.process(command, submitted, cancel).await;
        });
        Ok(())
    }

    fn default_language(&self) -> String {
        self.inner.default_language.read().clone()
    }

    fn set_input_resolver(&self, resolver: Arc<dyn InputResolver>) {
        *self.inner.resolver.write() = Some(resolver);
    }
}

impl Inner {
    async fn publish(&self, event: KernelEvent) {
        self.bus.publish(event).await;
    }

    async fn fail(&self, command: CommandId, message: impl Into<String>) {
        self.publish(KernelEvent::CommandFailed {
            command,
            message: message.into(),
            stack_trace: None,
        })
        .await;
    }

    async fn process(&self, id: CommandId, command: Command, cancel: CancellationToken) {
        match command.kind {
            CommandKind::SubmitCode { code } => {
                self.submit_code(id, &code, command.target_language, cancel)
                    .await
            }
            CommandKind::RequestCompletions { .. } => {
                let completions = self.completion_items();
                self.publish(KernelEvent::CompletionsProduced {
                    command: id,
                    completions,
                })
                .await;
                self.publish(KernelEvent::CommandSucceeded { command: id }).await;
            }
            CommandKind::RequestInput { name, type_hint } => {
                match self.resolve_input(&name, type_hint).await {
                    Some(value) => {
                        self.publish(KernelEvent::InputProduced { command: id, value }).await;
                        self.publish(KernelEvent::CommandSucceeded { command: id }).await;
                    }
                    None => {
                        self.fail(id, ReplError::InputUnresolved(name).to_string())
                            .await
                    }
                }
            }
        }
    }

    #[instrument(skip_all, fields(command = %root))]
    async fn submit_code(
        &self,
        root: CommandId,
        code: &str,
        target_language: Option<String>,
        cancel: CancellationToken,
    ) {
        self.publish(KernelEvent::CodeSubmissionReceived { command: root }).await;

        if !is_complete(code) {
            debug!("submission incomplete");
            self.publish(KernelEvent::IncompleteCodeSubmissionReceived { command: root }).await;
            self.publish(KernelEvent::CommandSucceeded { command: root }).await;
            return;
        }
        self.publish(KernelEvent::CompleteCodeSubmissionReceived { command: root }).await;

        let start = target_language.unwrap_or_else(|| self.default_language.read().clone());
        // Nothing runs when a directive names an unknown language
        let segments = match self.split_segments(code, &start) {
            Ok(segments) => segments,
            Err(name) => {
                self.fail(root, ReplError::UnknownLanguage(name).user_message()).await;
                return;
            }
        };

        for segment in segments {
            match segment {
                Segment::Help => self.display(root, self.help_text()).await,
                Segment::About => self.display(root, about_text()).await,
                Segment::Code { language, code } => {
                    if code.trim().is_empty() {
                        continue;
                    }
                    let child = self.commands.insert(
                        Command::submit_code(code.clone())
                            .with_language(language.clone())
                            .child_of(root),
                    );
                    match self.run_segment(child, &language, &code, &cancel).await {
                        Ok(()) => {
                            self.publish(KernelEvent::CommandSucceeded { command: child }).await;
                            self.learn(&code);
                        }
                        Err(SegmentError::Failed(message)) => {
                            self.fail(child, message.clone()).await;
                            self.fail(root, message).await;
                            return;
                        }
                        Err(SegmentError::Cancelled) => {
                            self.fail(child, ReplError::Cancelled.to_string()).await;
                            self.fail(root, ReplError::Cancelled.to_string()).await;
                            return;
                        }
                    }
                }
            }
        }

        self.publish(KernelEvent::CommandSucceeded { command: root }).await;
    }

    /// Split on directive lines. Once every directive has parsed, the last
    /// language directive becomes the kernel's default language. A submission
    /// with an unknown directive is rejected with that directive's name and
    /// leaves the default alone.
    fn split_segments(
        &self,
        code: &str,
        start_language: &str,
    ) -> std::result::Result<Vec<Segment>, String> {
        let catalog = self.catalog.read();
        let mut language = catalog
            .canonical_name(start_language)
            .unwrap_or_else(|_| start_language.to_string());
        let mut selected: Option<String> = None;
        let mut segments = Vec::new();
        let mut current = String::new();

        for line in code.lines() {
            // Shebang lines such as `#!/bin/sh` are code, not directives
            let directive = line
                .trim_start()
                .strip_prefix("#!")
                .filter(|rest| !rest.trim_start().starts_with('/'));
            let Some(directive) = directive else {
                current.push_str(line);
                current.push('\n');
                continue;
            };

            segments.push(Segment::Code {
                language: language.clone(),
                code: std::mem::take(&mut current),
            });

            let name = directive.trim();
            match name {
                "help" => segments.push(Segment::Help),
                "about" => segments.push(Segment::About),
                _ => match catalog.canonical_name(name) {
                    Ok(canonical) => {
                        selected = Some(canonical.clone());
                        language = canonical;
                    }
                    Err(_) => return Err(name.to_string()),
                },
            }
        }

        segments.push(Segment::Code {
            language,
            code: current,
        });

        if let Some(selected) = selected {
            debug!(language = %selected, "default language changed");
            *self.default_language.write() = selected;
        }
        Ok(segments)
    }

    async fn run_segment(
        &self,
        child: CommandId,
        language: &str,
        code: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), SegmentError> {
        let spec = self
            .catalog
            .read()
            .resolve(language)
            .cloned()
            .ok_or_else(|| {
                SegmentError::Failed(ReplError::UnknownLanguage(language.to_string()).user_message())
            })?;

        let code = self.substitute_inputs(child, code).await?;
        self.run_interpreter(child, &spec, &code, cancel).await
    }

    /// Replace `@input:name` and `@input:"name"` with resolved values
    async fn substitute_inputs(
        &self,
        child: CommandId,
        code: &str,
    ) -> std::result::Result<String, SegmentError> {
        let mut output = String::with_capacity(code.len());
        let mut rest = code;

        while let Some(position) = rest.find("@input:") {
            output.push_str(&rest[..position]);
            let after = &rest[position + "@input:".len()..];
            let (name, remainder) = match after.strip_prefix('"') {
                Some(quoted) => match quoted.find('"') {
                    Some(end) => (&quoted[..end], &quoted[end + 1..]),
                    None => (quoted, ""),
                },
                None => {
                    let end = after
                        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
                        .unwrap_or(after.len());
                    (&after[..end], &after[end..])
                }
            };

            if name.is_empty() {
                output.push_str("@input:");
                rest = after;
                continue;
            }

            let request = self
                .commands
                .insert(Command::request_input(name, None).child_of(child));
            match self.resolve_input(name, None).await {
                Some(value) => {
                    self.publish(KernelEvent::InputProduced {
                        command: request,
                        value: value.clone(),
                    })
                    .await;
                    self.publish(KernelEvent::CommandSucceeded { command: request }).await;
                    output.push_str(&value);
                }
                None => {
                    warn!(input = name, "input unresolved");
                    let message = ReplError::InputUnresolved(name.to_string()).to_string();
                    self.fail(request, message.clone()).await;
                    return Err(SegmentError::Failed(message));
                }
            }
            rest = remainder;
        }

        output.push_str(rest);
        Ok(output)
    }

    /// Installed resolver first, then the fallback. The fallback may block on
    /// a prompt, so it runs off the async workers.
    async fn resolve_input(&self, name: &str, type_hint: Option<String>) -> Option<String> {
        let resolver = self.resolver.read().clone();
        if let Some(value) = resolver.and_then(|r| r.resolve(name, type_hint.as_deref())) {
            return Some(value);
        }

        let fallback = self.fallback.read().clone()?;
        let name = name.to_string();
        match tokio::task::spawn_blocking(move || fallback.resolve(&name, type_hint.as_deref()))
            .await
        {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "input prompt task failed");
                None
            }
        }
    }

    async fn run_interpreter(
        &self,
        child: CommandId,
        spec: &LanguageSpec,
        code: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), SegmentError> {
        let program = which::which(&spec.program).map_err(|_| {
            SegmentError::Failed(
                ReplError::InterpreterNotFound {
                    language: spec.name.clone(),
                    program: spec.program.clone(),
                }
                .user_message(),
            )
        })?;

        let mut command = tokio::process::Command::new(&program);
        command
            .args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        debug!(program = %program.display(), language = %spec.name, "spawning interpreter");
        let mut process = command.spawn().map_err(|e| {
            SegmentError::Failed(format!("Failed to start '{}': {}", spec.program, e))
        })?;

        // Readers start first: an interpreter that executes its input as it
        // reads can fill the output pipe before all code has been written.
        let stdout = process
            .stdout
            .take()
            .map(|out| self.forward(out, child, false));
        let stderr = process
            .stderr
            .take()
            .map(|err| self.forward(err, child, true));

        let writer = process.stdin.take().map(|mut stdin| {
            let mut input = code.to_string();
            if !input.ends_with('\n') {
                input.push('\n');
            }
            tokio::spawn(async move {
                match stdin.write_all(input.as_bytes()).await {
                    Ok(()) => {}
                    // The interpreter stopped reading, its exit status tells why
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                        debug!("interpreter closed stdin early");
                    }
                    Err(e) => warn!(error = %e, "failed to write code to interpreter"),
                }
                // Dropping stdin closes it so the interpreter sees end of input
            })
        });

        let status = tokio::select! {
            status = process.wait() => status,
            _ = cancel.cancelled() => {
                info!(language = %spec.name, "cancelling interpreter");
                if let Some(writer) = &writer {
                    writer.abort();
                }
                if let Err(e) = process.kill().await {
                    warn!(error = %e, "failed to kill interpreter");
                }
                return Err(SegmentError::Cancelled);
            }
        };

        if let Some(writer) = writer {
            // The interpreter has exited, so a pending write fails fast
            if let Err(e) = writer.await {
                warn!(error = %e, "stdin writer task failed");
            }
        }

        // All output must be published before the terminal event
        for reader in [stdout, stderr].into_iter().flatten() {
            if let Err(e) = reader.await {
                warn!(error = %e, "output reader task failed");
            }
        }

        match status {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(SegmentError::Failed(format!(
                "{} exited with {}",
                spec.display_name, status
            ))),
            Err(e) => Err(SegmentError::Failed(format!(
                "Failed to wait for '{}': {}",
                spec.program, e
            ))),
        }
    }

    /// Publish each line of `stream` as stdout or stderr of `child`
    fn forward<R>(&self, stream: R, child: CommandId, is_stderr: bool) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let bus = self.bus.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stream).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let values = vec![FormattedValue::plain(format!("{line}\n"))];
                        bus.publish(if is_stderr {
                            KernelEvent::StandardErrorProduced {
                                command: child,
                                values,
                            }
                        } else {
                            KernelEvent::StandardOutputProduced {
                                command: child,
                                values,
                            }
                        })
                        .await;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "failed to read interpreter output");
                        break;
                    }
                }
            }
        })
    }

    async fn display(&self, command: CommandId, text: String) {
        self.publish(KernelEvent::DisplayedValueProduced {
            command,
            value_id: None,
            values: vec![FormattedValue::plain(text)],
        })
        .await;
    }

    fn help_text(&self) -> String {
        let mut text = String::from("Key bindings:\n");
        for (keys, action) in KEY_BINDINGS {
            text.push_str(&format!("  {keys:<16} {action}\n"));
        }
        text.push_str("\nLanguages (switch with #!<name>):\n");
        for spec in self.catalog.read().iter() {
            let aliases = if spec.aliases.is_empty() {
                String::new()
            } else {
                format!(" ({})", spec.aliases.join(", "))
            };
            text.push_str(&format!("  {:<16} {}{}\n", spec.name, spec.display_name, aliases));
        }
        text.push_str("\nDirectives: #!help, #!about");
        text
    }

    fn completion_items(&self) -> Vec<CompletionItem> {
        let mut items: Vec<CompletionItem> = self
            .vocabulary
            .lock()
            .iter()
            .map(|word| CompletionItem::new(word.clone()))
            .collect();
        items.push(CompletionItem::new("#!help"));
        items.push(CompletionItem::new("#!about"));
        for name in self.catalog.read().names() {
            items.push(CompletionItem::new(format!("#!{name}")));
        }
        items
    }

    fn learn(&self, code: &str) {
        let mut vocabulary = self.vocabulary.lock();
        vocabulary.extend(identifiers(code));
    }
}

fn about_text() -> String {
    format!(
        "polyglot-repl {}\nAn interactive shell for running several languages side by side.",
        crate::VERSION
    )
}

/// Whether brackets outside double-quoted strings are balanced.
/// Surplus closers count as complete; the interpreter reports them.
fn is_complete(code: &str) -> bool {
    let mut depth: i64 = 0;
    let mut in_string = false;
    let mut escaped = false;

    for c in code.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
    }

    depth <= 0
}

/// Identifiers and dotted paths (with every dotted prefix) found in `code`
fn identifiers(code: &str) -> BTreeSet<String> {
    let mut found = BTreeSet::new();

    for token in code.split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.')) {
        let token = token.trim_matches('.');
        if token.is_empty() || token.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }
        let mut prefix = String::new();
        for part in token.split('.') {
            if part.is_empty() {
                break;
            }
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(part);
            if prefix.len() > 1 {
                found.insert(prefix.clone());
            }
        }
    }

    found
}
