//! Completion round trip between the line editor and the kernel

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::{Command, KernelEvent, Result};
use crate::runtime::kernel::KernelFacade;

/// The token a completion applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionSpan<'a> {
    /// Byte offset where the token starts
    pub start: usize,
    /// Text from `start` up to the cursor, dotted qualifiers included
    pub token: &'a str,
    /// Part of the token after its last `.`
    pub word: &'a str,
}

/// Locate the token before `cursor`.
///
/// The word ends at the cursor and starts after the nearest `.` or
/// whitespace. A `.` boundary pulls the qualifier in front of it into the
/// token, so `Foo.Ba` filters on `Foo.Ba` rather than `Ba`.
pub fn completion_span(buffer: &str, cursor: usize) -> CompletionSpan<'_> {
    let mut cursor = cursor.min(buffer.len());
    while !buffer.is_char_boundary(cursor) {
        cursor -= 1;
    }
    let head = &buffer[..cursor];

    let start = head
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    let token = &head[start..];
    let word = token.rsplit('.').next().unwrap_or(token);

    CompletionSpan { start, token, word }
}

/// Turns completion requests into sorted candidate lists
#[derive(Clone)]
pub struct CompletionBridge {
    kernel: Arc<dyn KernelFacade>,
}

impl CompletionBridge {
    /// Create a new completion bridge over `kernel`
    pub fn new(kernel: Arc<dyn KernelFacade>) -> Self {
        Self { kernel }
    }

    /// Candidates for the token before `cursor`, sorted and deduplicated.
    ///
    /// Waits for the first completion event of the request. A request that
    /// finishes without one yields an empty list; a closed event stream is an
    /// error.
    pub async fn get_completions(&self, buffer: &str, cursor: usize) -> Result<Vec<String>> {
        let span = completion_span(buffer, cursor);

        let commands = self.kernel.commands();
        let request = commands.insert(Command::request_completions(buffer, cursor));
        let mut subscription = self.kernel.subscribe();
        self.kernel
            .submit(request, &subscription, CancellationToken::new())
            .await?;

        let completions = loop {
            let event = match subscription.recv().await {
                Ok(event) => event,
                Err(e) => {
                    commands.retire_tree(request);
                    return Err(e);
                }
            };
            if !commands.belongs_to(event.command(), request) {
                continue;
            }
            match event {
                KernelEvent::CompletionsProduced { completions, .. } => break completions,
                event if event.is_terminal() && event.command() == request => {
                    debug!(%request, "completion request finished without candidates");
                    break Vec::new();
                }
                _ => {}
            }
        };
        drop(subscription);
        commands.retire_tree(request);

        let mut candidates: Vec<String> = completions
            .into_iter()
            .map(|item| item.insert_text)
            .filter(|text| text.starts_with(span.token))
            .collect();
        candidates.sort();
        candidates.dedup();

        debug!(token = span.token, count = candidates.len(), "completions resolved");
        Ok(candidates)
    }
}
