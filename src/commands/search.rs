//! Search command handler: full pipeline, ranked output.

use anyhow::{Context, Result};
use magneto_core::{DisplayRecord, SearchConfig, perform_search};

use crate::cli::QueryCommand;
use crate::terminal::SearchProgress;

pub async fn run_search_command(config: &SearchConfig, args: &QueryCommand) -> Result<()> {
    let query = args.kind.to_query()?;
    let progress = SearchProgress::new(args.json);
    let results = perform_search(config, &query, args.provider_id.as_deref(), |p| {
        progress.update(p);
    })
    .await;
    progress.finish();
    let results = results?;

    if args.json {
        let json = serde_json::to_string_pretty(&results).context("Failed to serialize results")?;
        println!("{json}");
    } else {
        print!("{}", render_results(&results));
    }
    Ok(())
}

fn render_results(results: &[DisplayRecord]) -> String {
    if results.is_empty() {
        return "No results found.\n".to_string();
    }
    let mut out = String::new();
    for (index, result) in results.iter().enumerate() {
        out.push_str(&format!(
            "{:>3}. {}\n     {}\n     {}\n",
            index + 1,
            result.label(),
            result.title,
            result.locator
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str) -> DisplayRecord {
        DisplayRecord {
            title: title.to_string(),
            info_hash: "a".repeat(40),
            magnet: format!("magnet:?xt=urn:btih:{}", "a".repeat(40)),
            locator: "loc".to_string(),
            providers: Vec::new(),
            icon: None,
            size: Some("1.00 GB".to_string()),
            seeds: None,
            leeches: None,
            resolution: Some("720p".to_string()),
            release_type: None,
            scene_tag: None,
            video_codec: None,
            audio_codec: None,
            factor: 3,
        }
    }

    #[test]
    fn test_render_results_numbers_entries() {
        let text = render_results(&[record("One"), record("Two")]);
        assert!(text.starts_with("  1. 720p [1.00 GB] -\n     One\n     loc\n"));
        assert!(text.contains("  2. 720p"));
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render_results(&[]), "No results found.\n");
    }
}
