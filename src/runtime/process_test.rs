//! Tests for the process kernel, using `cat` and `sh` as interpreters

use super::completion::CompletionBridge;
use super::correlator::{correlate, CommandOutcome, Correlated};
use super::kernel::{KernelFacade, ParameterInputs};
use super::language::{LanguageCatalog, LanguageSpec};
use super::process::ProcessKernel;
use crate::core::{Command, OutputElement, TextStream};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

fn kernel() -> ProcessKernel {
    let catalog = LanguageCatalog::from_specs(vec![
        LanguageSpec::new("csharp", "C#", "cat", &[]).with_aliases(&["c#"]),
        LanguageSpec::new("fsharp", "F#", "cat", &[]).with_aliases(&["f#"]),
        LanguageSpec::new("shell", "Shell", "sh", &["-s"]),
        LanguageSpec::new("missing", "Missing", "polyglot-repl-no-such-interpreter", &[]),
    ]);
    ProcessKernel::new(catalog, "csharp")
}

async fn run(kernel: &ProcessKernel, code: &str) -> Correlated<Vec<OutputElement>> {
    correlate(
        kernel,
        Command::submit_code(code),
        Vec::new(),
        CancellationToken::new(),
    )
    .await
    .unwrap()
}

fn stdout(text: &str) -> OutputElement {
    OutputElement::Text {
        text: text.to_string(),
        stream: TextStream::Stdout,
    }
}

fn failure_message(correlated: &Correlated<Vec<OutputElement>>) -> String {
    match &correlated.outcome {
        CommandOutcome::Failed { message } => message.clone(),
        other => panic!("Expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_directives_select_sticky_language() {
    let cases = [
        ("#!fsharp", "fsharp"),
        ("#!f#", "fsharp"),
        ("#!fsharp\n123\n#!csharp", "csharp"),
        ("#!fsharp\n123\n#!csharp\n123", "csharp"),
        ("#!csharp\n123\n#!fsharp\n123", "fsharp"),
        ("#!csharp\n123\n#!fsharp\n#!help", "fsharp"),
    ];

    for (code, expected) in cases {
        let kernel = kernel();
        let correlated = run(&kernel, code).await;
        assert!(correlated.outcome.is_success(), "{code:?}");
        assert_eq!(kernel.default_language(), expected, "{code:?}");
    }
}

#[tokio::test]
async fn test_next_submission_targets_selected_language() {
    let kernel = kernel();
    let first = run(&kernel, "#!fsharp\n1\n#!csharp").await;
    let second = run(&kernel, "1").await;

    let arena = kernel.commands();
    let first_children = arena.children_of(first.command);
    assert_eq!(first_children.len(), 1);
    assert_eq!(
        arena.get(first_children[0]).unwrap().target_language.as_deref(),
        Some("fsharp")
    );

    let second_children = arena.children_of(second.command);
    assert_eq!(second_children.len(), 1);
    assert_eq!(
        arena.get(second_children[0]).unwrap().target_language.as_deref(),
        Some("csharp")
    );
    assert_eq!(second.sink, vec![stdout("1\n")]);
}

#[tokio::test]
async fn test_output_is_streamed_and_coalesced() {
    let kernel = kernel();
    let correlated = run(&kernel, "#!shell\necho a\necho b").await;

    assert!(correlated.outcome.is_success());
    assert_eq!(correlated.sink, vec![stdout("a\nb\n")]);
}

#[tokio::test]
async fn test_stderr_only_output() {
    let kernel = kernel();
    let correlated = run(&kernel, "#!shell\necho oops 1>&2").await;

    assert_eq!(
        correlated.sink,
        vec![OutputElement::Text {
            text: "oops\n".to_string(),
            stream: TextStream::Stderr,
        }]
    );
}

#[tokio::test]
async fn test_failure_skips_later_segments() {
    let kernel = kernel();
    let correlated = run(&kernel, "#!shell\necho before\nexit 3\n#!csharp\nnever").await;

    assert!(failure_message(&correlated).contains("exited"));
    assert_eq!(correlated.sink[0], stdout("before\n"));
    assert!(correlated.sink[1].is_error());
    assert_eq!(kernel.commands().children_of(correlated.command).len(), 1);
}

#[tokio::test]
async fn test_unbalanced_brackets_are_incomplete() {
    let kernel = kernel();
    let correlated = run(&kernel, "print(").await;

    assert!(correlated.incomplete);
    assert!(correlated.outcome.is_success());
    assert!(kernel.commands().children_of(correlated.command).is_empty());
}

#[tokio::test]
async fn test_input_tokens_use_installed_resolver() {
    let kernel = kernel();
    let mut parameters = HashMap::new();
    parameters.insert("name".to_string(), "world".to_string());
    kernel.set_input_resolver(Arc::new(ParameterInputs::new(&parameters)));

    let correlated = run(&kernel, "#!shell\necho hello @input:NAME and @input:\"Name\"").await;

    assert_eq!(correlated.sink, vec![stdout("hello world and world\n")]);
}

#[tokio::test]
async fn test_unresolved_input_fails_command() {
    let kernel = kernel();
    let correlated = run(&kernel, "#!shell\necho @input:who").await;

    assert!(failure_message(&correlated).contains("'who'"));
}

#[tokio::test]
async fn test_unknown_directive_fails() {
    let kernel = kernel();
    let correlated = run(&kernel, "#!cobol\nDISPLAY 'x'").await;

    assert!(failure_message(&correlated).contains("cobol"));
    assert_eq!(kernel.default_language(), "csharp");

    let correlated = run(&kernel, "#!fsharp\n1\n#!bogus").await;
    assert!(failure_message(&correlated).contains("bogus"));
    assert_eq!(kernel.default_language(), "csharp");
    assert!(kernel.commands().children_of(correlated.command).is_empty());
}

#[tokio::test]
async fn test_missing_interpreter_fails() {
    let kernel = kernel();
    let correlated = run(&kernel, "#!missing\n1").await;

    assert!(failure_message(&correlated).contains("polyglot-repl-no-such-interpreter"));
}

#[tokio::test]
async fn test_help_directive_displays_bindings() {
    let kernel = kernel();
    let correlated = run(&kernel, "#!help").await;

    match &correlated.sink[..] {
        [OutputElement::Display { data }] => {
            let text = &data["text/plain"];
            assert!(text.contains("Ctrl-Up"));
            assert!(text.contains("Shift-Tab"));
            assert!(text.contains("Ctrl-Alt-C"));
            assert!(text.contains("shell"));
        }
        other => panic!("Expected one display element, got {other:?}"),
    }
}

#[tokio::test]
async fn test_shebang_is_not_a_directive() {
    let kernel = ProcessKernel::new(
        LanguageCatalog::from_specs(vec![LanguageSpec::new("shell", "Shell", "sh", &["-s"])]),
        "shell",
    );
    let correlated = run(&kernel, "#!/bin/sh\necho ok").await;

    assert_eq!(correlated.sink, vec![stdout("ok\n")]);
}

#[tokio::test]
async fn test_completions_include_learned_identifiers() {
    let kernel = Arc::new(kernel());
    run(&kernel, "#!shell\necho Foo.Bar").await;
    let bridge = CompletionBridge::new(kernel);

    assert_eq!(bridge.get_completions("Foo.", 4).await.unwrap(), vec!["Foo.Bar"]);
    assert!(bridge
        .get_completions("#!", 2)
        .await
        .unwrap()
        .contains(&"#!help".to_string()));
}

#[tokio::test]
async fn test_cancellation_kills_interpreter() {
    let kernel = kernel();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let correlated = correlate(
        &kernel,
        Command::submit_code("#!shell\nsleep 5"),
        Vec::new(),
        cancel,
    )
    .await
    .unwrap();

    assert_eq!(correlated.outcome, CommandOutcome::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(4));

    // The kernel is free for the next command
    let next = run(&kernel, "#!shell\necho next").await;
    assert_eq!(next.sink, vec![stdout("next\n")]);
}

#[tokio::test]
async fn test_output_beyond_queue_capacity_is_kept() {
    let kernel = kernel();
    let lines = super::kernel::EVENT_CHANNEL_CAPACITY * 50;
    let correlated = run(&kernel, &format!("#!shell\nseq 1 {lines}")).await;

    assert!(correlated.outcome.is_success());
    match &correlated.sink[..] {
        [OutputElement::Text { text, .. }] => {
            assert_eq!(text.lines().count(), lines);
            assert_eq!(text.lines().last(), Some(lines.to_string().as_str()));
        }
        other => panic!("Expected one text element, got {} elements", other.len()),
    }
}

#[tokio::test]
async fn test_cell_larger_than_pipe_buffer_completes() {
    let kernel = kernel();
    let mut code = String::from("#!shell\nhead -c 300000 /dev/zero | tr '\\0' a\n");
    while code.len() < 130_000 {
        code.push_str("# padding that the shell reads after it starts writing output\n");
    }

    let correlated = tokio::time::timeout(Duration::from_secs(15), run(&kernel, &code))
        .await
        .expect("interpreter stalled on a full pipe");

    assert!(correlated.outcome.is_success());
    match &correlated.sink[..] {
        [OutputElement::Text { text, .. }] => {
            assert_eq!(text.len(), 300_001);
            assert!(text.trim_end().chars().all(|c| c == 'a'));
        }
        other => panic!("Expected one text element, got {} elements", other.len()),
    }
}
