//! Reading runnable documents and writing result documents
//!
//! This module handles:
//! - Reading `.ipynb` notebooks, `.dib` files and plain source files into cells
//! - Writing result documents as ipynb JSON or TRX test results

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::Write;
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

use crate::core::{
    Cell, CellResult, OutputElement, ReplError, Result, ResultDocument, PLAIN_TEXT,
};
use crate::runtime::LanguageCatalog;

/// Serialization format for a result document
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Jupyter notebook (nbformat 4)
    Ipynb,
    /// Visual Studio test results
    Trx,
}

const TRX_NAMESPACE: &str = "http://microsoft.com/schemas/VisualStudio/TeamTest/2010";
const TRX_TEST_TYPE: &str = "13cdc9d9-ddb5-4fa4-a97d-d965ccfc6d4b";
const TRX_TEST_LIST: &str = "8c84fa94-04c1-424b-9868-57a2d4851a1d";

/// Read the cells of the document at `path`
pub fn read_cells(
    path: &Path,
    catalog: &LanguageCatalog,
    default_language: &str,
) -> Result<Vec<Cell>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ReplError::document(format!("Failed to read '{}': {}", path.display(), e))
    })?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let cells = match extension.as_str() {
        "ipynb" => parse_ipynb(&content, catalog, default_language)?,
        "dib" => parse_dib(&content, catalog, default_language),
        _ => {
            let language = catalog
                .for_extension(&extension)
                .map(|spec| spec.name.clone())
                .unwrap_or_else(|| default_language.to_string());
            vec![Cell::new(content, language)]
        }
    };

    debug!(path = %path.display(), cells = cells.len(), "document read");
    Ok(cells)
}

/// Parse nbformat 4 JSON, keeping code cells only
pub fn parse_ipynb(
    content: &str,
    catalog: &LanguageCatalog,
    default_language: &str,
) -> Result<Vec<Cell>> {
    let notebook: Value = serde_json::from_str(content)
        .map_err(|e| ReplError::document(format!("Not a valid notebook: {e}")))?;

    let metadata = &notebook["metadata"];
    let notebook_language = [
        &metadata["polyglot_notebook"]["kernelInfo"]["defaultKernelName"],
        &metadata["kernelspec"]["language"],
        &metadata["language_info"]["name"],
    ]
    .into_iter()
    .filter_map(Value::as_str)
    .find_map(|name| catalog.canonical_name(name).ok())
    .unwrap_or_else(|| default_language.to_string());

    let cells = notebook["cells"]
        .as_array()
        .ok_or_else(|| ReplError::document("Notebook has no 'cells' array"))?;

    Ok(cells
        .iter()
        .filter(|cell| cell["cell_type"] == "code")
        .map(|cell| {
            let language = [
                &cell["metadata"]["polyglot_notebook"]["kernelName"],
                &cell["metadata"]["dotnet_interactive"]["language"],
            ]
            .into_iter()
            .filter_map(Value::as_str)
            .map(|name| {
                catalog
                    .canonical_name(name)
                    .unwrap_or_else(|_| name.to_string())
            })
            .next()
            .unwrap_or_else(|| notebook_language.clone());
            Cell::new(source_text(&cell["source"]), language)
        })
        .collect())
}

/// Notebook sources are either a string or a list of lines
fn source_text(source: &Value) -> String {
    match source {
        Value::String(text) => text.clone(),
        Value::Array(lines) => lines.iter().filter_map(Value::as_str).collect(),
        _ => String::new(),
    }
}

/// Split a `.dib` file at language directive lines. `#!meta` blocks are skipped
/// and other directives stay inside their cell.
pub fn parse_dib(content: &str, catalog: &LanguageCatalog, default_language: &str) -> Vec<Cell> {
    let mut cells = Vec::new();
    let mut language = Some(default_language.to_string());
    let mut lines: Vec<&str> = Vec::new();

    let mut flush = |language: &Option<String>, lines: &mut Vec<&str>| {
        let code = lines.join("\n");
        let code = code.trim_matches('\n');
        if let Some(language) = language {
            if !code.trim().is_empty() {
                cells.push(Cell::new(code, language.clone()));
            }
        }
        lines.clear();
    };

    for line in content.lines() {
        let directive = line.strip_prefix("#!").map(str::trim);
        match directive {
            Some("meta") => {
                flush(&language, &mut lines);
                language = None;
            }
            Some(name) if catalog.resolve(name).is_some() => {
                flush(&language, &mut lines);
                language = catalog.canonical_name(name).ok();
            }
            _ => lines.push(line),
        }
    }
    flush(&language, &mut lines);

    cells
}

/// Serialize `document` in `format` to `out`
pub fn write_document(
    document: &ResultDocument,
    format: OutputFormat,
    source: Option<&Path>,
    out: &mut dyn Write,
) -> Result<()> {
    match format {
        OutputFormat::Ipynb => {
            let notebook = to_ipynb(document);
            serde_json::to_writer_pretty(&mut *out, &notebook)?;
            writeln!(out)?;
        }
        OutputFormat::Trx => {
            out.write_all(to_trx(document, source).as_bytes())?;
        }
    }
    out.flush()?;
    Ok(())
}

/// Split text into notebook-style lines, keeping line endings
fn notebook_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

pub fn to_ipynb(document: &ResultDocument) -> Value {
    let cells: Vec<Value> = document
        .cells
        .iter()
        .enumerate()
        .map(|(index, result)| {
            json!({
                "cell_type": "code",
                "execution_count": index + 1,
                "metadata": {
                    "polyglot_notebook": { "kernelName": result.cell.language },
                    "polyglot_repl": {
                        "cellExecutionStartTime": result.started_at.to_rfc3339(),
                        "cellExecutionEndTime": result.ended_at.to_rfc3339(),
                    },
                },
                "source": notebook_lines(&result.cell.code),
                "outputs": result.outputs.iter().map(ipynb_output).collect::<Vec<_>>(),
            })
        })
        .collect();

    json!({
        "cells": cells,
        "metadata": {
            "kernelspec": {
                "display_name": format!("polyglot-repl ({})", document.default_language),
                "language": document.default_language,
                "name": format!("polyglot-repl-{}", document.default_language),
            },
            "language_info": { "name": document.default_language },
            "polyglot_notebook": {
                "kernelInfo": { "defaultKernelName": document.default_language },
            },
        },
        "nbformat": 4,
        "nbformat_minor": 4,
    })
}

fn ipynb_output(output: &OutputElement) -> Value {
    match output {
        OutputElement::Display { data } => json!({
            "output_type": "display_data",
            "data": data,
            "metadata": {},
        }),
        OutputElement::Text { text, stream } => json!({
            "output_type": "stream",
            "name": stream.as_str(),
            "text": notebook_lines(text),
        }),
        OutputElement::Error {
            name,
            message,
            stack_trace,
        } => json!({
            "output_type": "error",
            "ename": name,
            "evalue": message,
            "traceback": stack_trace,
        }),
    }
}

/// Name of a cell in test results, e.g. `Cell    1: print(1)`
pub fn trx_test_name(index: usize, cell: &Cell) -> String {
    let first_line = cell.code.trim().lines().next().unwrap_or_default();
    format!("Cell {:>4}: {}", index + 1, first_line)
}

pub fn to_trx(document: &ResultDocument, source: Option<&Path>) -> String {
    let storage = source
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "notebook".to_string());
    let computer = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    let now = Utc::now();
    let started = document.cells.first().map_or(now, |c| c.started_at);
    let finished = document.cells.last().map_or(now, |c| c.ended_at);

    struct Entry<'a> {
        name: String,
        test_id: Uuid,
        execution_id: Uuid,
        result: &'a CellResult,
    }

    let entries: Vec<Entry<'_>> = document
        .cells
        .iter()
        .enumerate()
        .map(|(index, result)| Entry {
            name: trx_test_name(index, &result.cell),
            test_id: Uuid::new_v4(),
            execution_id: Uuid::new_v4(),
            result,
        })
        .collect();

    let failed = entries.iter().filter(|e| e.result.has_errors()).count();
    let total = entries.len();

    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    xml.push_str(&format!(
        "<TestRun id=\"{}\" name=\"polyglot-repl {}\" xmlns=\"{}\">\n",
        Uuid::new_v4(),
        escape(&trx_time(started)),
        TRX_NAMESPACE
    ));
    xml.push_str(&format!(
        "  <Times creation=\"{0}\" queuing=\"{0}\" start=\"{0}\" finish=\"{1}\" />\n",
        trx_time(started),
        trx_time(finished)
    ));

    xml.push_str("  <Results>\n");
    for entry in &entries {
        let result = entry.result;
        let outcome = if result.has_errors() { "Failed" } else { "Passed" };
        xml.push_str(&format!(
            "    <UnitTestResult executionId=\"{exec}\" testId=\"{test}\" testName=\"{name}\" computerName=\"{computer}\" duration=\"{duration}\" startTime=\"{start}\" endTime=\"{end}\" testType=\"{TRX_TEST_TYPE}\" outcome=\"{outcome}\" testListId=\"{TRX_TEST_LIST}\" relativeResultsDirectory=\"{exec}\">\n",
            exec = entry.execution_id,
            test = entry.test_id,
            name = escape(&entry.name),
            computer = escape(&computer),
            duration = trx_duration(result.started_at, result.ended_at),
            start = trx_time(result.started_at),
            end = trx_time(result.ended_at),
        ));

        let (output, stack_trace) = match result.outputs.first() {
            Some(OutputElement::Display { data }) => (
                data.get(PLAIN_TEXT).or_else(|| data.values().next()).cloned(),
                None,
            ),
            Some(OutputElement::Text { text, .. }) => (Some(text.clone()), None),
            Some(OutputElement::Error {
                message,
                stack_trace,
                ..
            }) => (Some(message.clone()), Some(stack_trace.join("\n"))),
            None => (None, None),
        };

        if output.is_some() || stack_trace.is_some() {
            xml.push_str("      <Output>\n");
            if let Some(output) = &output {
                xml.push_str(&format!("        <StdOut>{}</StdOut>\n", escape(output)));
            }
            if result.has_errors() {
                let message = result
                    .outputs
                    .iter()
                    .find_map(|o| match o {
                        OutputElement::Error { message, .. } => Some(message.as_str()),
                        _ => None,
                    })
                    .unwrap_or_default();
                xml.push_str("        <ErrorInfo>\n");
                xml.push_str(&format!("          <Message>{}</Message>\n", escape(message)));
                if let Some(stack_trace) = &stack_trace {
                    xml.push_str(&format!(
                        "          <StackTrace>{}</StackTrace>\n",
                        escape(stack_trace)
                    ));
                }
                xml.push_str("        </ErrorInfo>\n");
            }
            xml.push_str("      </Output>\n");
        }
        xml.push_str("    </UnitTestResult>\n");
    }
    xml.push_str("  </Results>\n");

    xml.push_str("  <TestDefinitions>\n");
    for entry in &entries {
        xml.push_str(&format!(
            "    <UnitTest name=\"{name}\" storage=\"{storage}\" id=\"{test}\">\n      <Execution id=\"{exec}\" />\n      <TestMethod codeBase=\"{storage}\" adapterTypeName=\"executor://polyglot-repl\" className=\"notebook\" name=\"{name}\" />\n    </UnitTest>\n",
            name = escape(&entry.name),
            storage = escape(&storage),
            test = entry.test_id,
            exec = entry.execution_id,
        ));
    }
    xml.push_str("  </TestDefinitions>\n");

    xml.push_str("  <TestEntries>\n");
    for entry in &entries {
        xml.push_str(&format!(
            "    <TestEntry testId=\"{}\" executionId=\"{}\" testListId=\"{}\" />\n",
            entry.test_id, entry.execution_id, TRX_TEST_LIST
        ));
    }
    xml.push_str("  </TestEntries>\n");
    xml.push_str(&format!(
        "  <TestLists>\n    <TestList name=\"Results Not in a List\" id=\"{TRX_TEST_LIST}\" />\n  </TestLists>\n"
    ));

    xml.push_str(&format!(
        "  <ResultSummary outcome=\"{}\">\n    <Counters total=\"{total}\" executed=\"{total}\" passed=\"{}\" failed=\"{failed}\" />\n  </ResultSummary>\n",
        if failed > 0 { "Failed" } else { "Completed" },
        total - failed,
    ));
    xml.push_str("</TestRun>\n");
    xml
}

fn trx_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// `hh:mm:ss.fffffff`
fn trx_duration(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    let elapsed = (end - start).max(chrono::Duration::zero());
    let total_micros = elapsed.num_microseconds().unwrap_or(i64::MAX);
    let seconds = total_micros / 1_000_000;
    let ticks = (total_micros % 1_000_000) * 10;
    format!(
        "{:02}:{:02}:{:02}.{:07}",
        seconds / 3600,
        (seconds / 60) % 60,
        seconds % 60,
        ticks
    )
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
