//! Live terminal rendering for the interactive session
//!
//! This module handles:
//! - The colour theme, passed explicitly from configuration
//! - Display values and errors drawn as panels
//! - Redrawing the last display panel when a value is updated
//! - A spinner with a status message while waiting for the first output

use colored::{Color, Colorize};
use console::Term;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::trace;

use crate::core::{OutputElement, PLAIN_TEXT};
use crate::runtime::{CommandOutcome, Terminal};

const SPINNER_TICKS: &[&str] = &["◐ ", "◓ ", "◑ ", "◒ ", "  "];

/// Colours and prompt strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Theme {
    pub prompt: String,
    pub continuation_prompt: String,
    /// Panel borders and the spinner
    pub accent: String,
    pub error: String,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            prompt: ">".to_string(),
            continuation_prompt: "...".to_string(),
            accent: "cyan".to_string(),
            error: "red".to_string(),
        }
    }
}

impl Theme {
    /// Prompt for a new submission in `language`
    pub fn primary_prompt(&self, language: &str) -> String {
        format!("{} {} ", language, self.prompt)
    }

    pub fn continuation(&self) -> String {
        format!("{} ", self.continuation_prompt)
    }

    /// Parse a configured colour name, falling back to white
    pub fn color(name: &str) -> Color {
        name.parse().unwrap_or(Color::White)
    }
}

/// Body text of an output element, without decoration
pub fn element_body(element: &OutputElement) -> String {
    match element {
        OutputElement::Display { data } => data
            .get(PLAIN_TEXT)
            .or_else(|| data.values().next())
            .cloned()
            .unwrap_or_default(),
        OutputElement::Text { text, .. } => text.trim_end_matches('\n').to_string(),
        OutputElement::Error {
            message,
            stack_trace,
            ..
        } => std::iter::once(message.as_str())
            .chain(stack_trace.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Undecorated panel lines: a titled top border, the body, a bottom border
pub fn panel_lines(title: &str, body: &str) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push(format!("╭─ {title}"));
    if body.is_empty() {
        lines.push("│".to_string());
    }
    for line in body.lines() {
        lines.push(format!("│ {line}"));
    }
    lines.push("╰─".to_string());
    lines
}

/// [`Terminal`] drawing to the console
pub struct ConsoleTerminal {
    theme: Theme,
    color: bool,
    show_spinner: bool,
    term: Term,
    spinner: Option<ProgressBar>,
    /// Lines drawn by the most recent element, if it was a display panel
    last_display_lines: usize,
}

impl ConsoleTerminal {
    /// Create a new terminal renderer on stdout
    pub fn new(theme: Theme, color: bool, show_spinner: bool) -> Self {
        Self {
            theme,
            color: color && console::colors_enabled(),
            show_spinner: show_spinner && console::user_attended(),
            term: Term::stdout(),
            spinner: None,
            last_display_lines: 0,
        }
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    fn paint(&self, text: &str, color: &str) -> String {
        if self.color {
            text.color(Theme::color(color)).to_string()
        } else {
            text.to_string()
        }
    }

    fn stop_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    fn write_lines(&self, lines: &[String]) {
        for line in lines {
            if self.term.write_line(line).is_err() {
                trace!("terminal write failed");
                return;
            }
        }
    }

    fn decorated_panel(&self, title: &str, body: &str, border: &str) -> Vec<String> {
        panel_lines(title, body)
            .into_iter()
            .map(|line| {
                // Colour the border glyphs, leave the body text alone
                let split = line
                    .char_indices()
                    .nth(2)
                    .map_or(line.len(), |(index, _)| index);
                let (frame, rest) = line.split_at(split);
                format!("{}{}", self.paint(frame, border), rest)
            })
            .collect()
    }
}

impl Terminal for ConsoleTerminal {
    fn submission_started(&mut self, status: &str) {
        self.last_display_lines = 0;
        if !self.show_spinner {
            return;
        }

        let spinner = ProgressBar::new_spinner();
        let template = format!("{{spinner:.{}}} {{msg}}", self.theme.accent);
        if let Ok(style) = ProgressStyle::default_spinner()
            .tick_strings(SPINNER_TICKS)
            .template(&template)
        {
            spinner.set_style(style);
        }
        spinner.set_message(status.to_string());
        spinner.enable_steady_tick(Duration::from_millis(120));
        self.spinner = Some(spinner);
    }

    fn render(&mut self, element: &OutputElement, replace_previous: bool) {
        self.stop_spinner();

        if replace_previous
            && self.last_display_lines > 0
            && self.term.clear_last_lines(self.last_display_lines).is_err()
        {
            trace!("could not clear previous display");
        }

        let body = element_body(element);
        match element {
            OutputElement::Display { .. } => {
                let lines = self.decorated_panel("", &body, &self.theme.accent);
                self.write_lines(&lines);
                self.last_display_lines = lines.len();
            }
            OutputElement::Text { .. } => {
                self.write_lines(&[body]);
                self.last_display_lines = 0;
            }
            OutputElement::Error { name, .. } => {
                let title = self.paint(name, &self.theme.error);
                let lines = self.decorated_panel(&title, &body, &self.theme.error);
                self.write_lines(&lines);
                self.last_display_lines = 0;
            }
        }
    }

    fn submission_finished(&mut self, outcome: &CommandOutcome) {
        self.stop_spinner();
        if *outcome == CommandOutcome::Cancelled {
            let line = self.paint("Cancelled", &self.theme.error);
            self.write_lines(&[line]);
        }
    }

    fn quitting(&mut self) {
        self.stop_spinner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FormattedValue, TextStream};

    #[test]
    fn test_theme_prompts() {
        let theme = Theme::default();
        assert_eq!(theme.primary_prompt("fsharp"), "fsharp > ");
        assert_eq!(theme.continuation(), "... ");
    }

    #[test]
    fn test_theme_color_names() {
        assert_eq!(Theme::color("red"), Color::Red);
        assert_eq!(Theme::color("bright blue"), Color::BrightBlue);
        assert_eq!(Theme::color("no-such-colour"), Color::White);
    }

    #[test]
    fn test_element_bodies() {
        let display = OutputElement::display(&[
            FormattedValue::new("text/html", "<b>2</b>"),
            FormattedValue::plain("2"),
        ]);
        assert_eq!(element_body(&display), "2");

        let text = OutputElement::Text {
            text: "a\nb\n".to_string(),
            stream: TextStream::Stdout,
        };
        assert_eq!(element_body(&text), "a\nb");

        let error = OutputElement::error("Error", "boom", Some("at a\nat b"));
        assert_eq!(element_body(&error), "boom\nat a\nat b");
    }

    #[test]
    fn test_panel_lines() {
        assert_eq!(
            panel_lines("Error", "boom\nat a"),
            vec!["╭─ Error", "│ boom", "│ at a", "╰─"]
        );
        assert_eq!(panel_lines("", ""), vec!["╭─ ", "│", "╰─"]);
    }
}
