//! Parse command handler: raw per-source records, no aggregation.

use std::sync::Arc;

use anyhow::{Context, Result};
use magneto_core::search::{load_enabled_sources, run_sources};
use magneto_core::{Formatter, Record, SearchConfig, SourceOutcome};
use serde::Serialize;

use crate::cli::QueryCommand;
use crate::terminal::SearchProgress;

#[derive(Serialize)]
struct OutcomeJson<'a> {
    source: &'a str,
    id: &'a str,
    records: &'a [Record],
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub async fn run_parse_command(config: &SearchConfig, args: &QueryCommand) -> Result<()> {
    let query = args.kind.to_query()?;
    let formatter = Arc::new(Formatter::new());
    let sources = load_enabled_sources(config, &formatter, args.provider_id.as_deref())?;

    let progress = SearchProgress::new(args.json);
    let outcomes = run_sources(config, &sources, &query, |p| progress.update(p)).await;
    progress.finish();

    if args.json {
        let payload: Vec<OutcomeJson<'_>> = outcomes
            .iter()
            .map(|o| OutcomeJson {
                source: &o.source_name,
                id: &o.source_id,
                records: &o.records,
                error: o.error.as_ref().map(ToString::to_string),
            })
            .collect();
        let json = serde_json::to_string_pretty(&payload).context("Failed to serialize records")?;
        println!("{json}");
    } else {
        for outcome in &outcomes {
            print!("{}", render_outcome(outcome));
        }
    }
    Ok(())
}

fn render_outcome(outcome: &SourceOutcome) -> String {
    let mut out = format!("- Found a total of {} results\n", outcome.records.len());
    for record in &outcome.records {
        let mut line = record.get("title").unwrap_or_default().to_string();
        if let (Some(seeds), Some(leeches)) = (non_empty(record, "seeds"), non_empty(record, "leeches")) {
            line.push_str(&format!(" | S:{seeds}/L:{leeches}"));
        }
        if let Some(size) = non_empty(record, "size") {
            line.push_str(&format!(" | {size}"));
        }
        line.push_str(&format!(" | {}", outcome.source_name));
        out.push_str(&format!(
            "+ {line}\n{}\n\n",
            record.get("magnet").unwrap_or_default()
        ));
    }
    out
}

fn non_empty<'a>(record: &'a Record, field: &str) -> Option<&'a str> {
    record.get(field).filter(|value| !value.is_empty())
}
