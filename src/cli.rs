//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use magneto_core::{DocumentKind, SearchQuery, Title};

/// Search torrent index sites and rank the results.
///
/// Sources are declared in a JSON descriptor file; see `verify` to check one.
#[derive(Parser, Debug)]
#[command(name = "magneto")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/magneto/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Descriptor file, overrides `providers_path`
    #[arg(short = 'p', long, global = true)]
    pub providers: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the full pipeline and print ranked results
    Search(QueryCommand),
    /// Run sources and print their raw records, without aggregation
    Parse(QueryCommand),
    /// Check the descriptor file for common mistakes
    Verify,
    /// Evaluate a path expression against a fetched page
    Xpath(XpathArgs),
    /// Print the element tree synthesized from a JSON file or URL
    Json2xml {
        /// JSON file path or http(s) URL
        path: String,
    },
}

#[derive(Args, Debug)]
pub struct QueryCommand {
    /// Only query the source with this id
    #[arg(short = 'i', long = "provider-id", global = true)]
    pub provider_id: Option<String>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Concurrent sources (1-50), overrides `threads`
    #[arg(long, global = true, value_parser = clap::value_parser!(u16).range(1..=50))]
    pub threads: Option<u16>,

    /// Request timeout in seconds (1-300), overrides `timeout_secs`
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..=300))]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub kind: QueryKindArgs,
}

#[derive(Subcommand, Debug)]
pub enum QueryKindArgs {
    /// Free-text query
    Query {
        /// Search words
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Movie by title and year
    Movie(MediaArgs),
    /// Show by title and year
    Show(MediaArgs),
    /// One season of a show
    Season(SeasonArgs),
    /// One episode of a show
    Episode(EpisodeArgs),
}

#[derive(Args, Debug)]
pub struct TitleArgs {
    /// The media title
    #[arg(long)]
    pub title: String,

    /// Localized or alternative titles as KEY=TITLE, usable as `{title.KEY}`
    #[arg(long = "alt-title", value_name = "KEY=TITLE")]
    pub alt_titles: Vec<String>,

    /// The TMDB identifier
    #[arg(long)]
    pub tmdb_id: Option<String>,
}

#[derive(Args, Debug)]
pub struct MediaArgs {
    #[command(flatten)]
    pub title: TitleArgs,

    /// The year of the release
    #[arg(long)]
    pub year: Option<i64>,
}

#[derive(Args, Debug)]
pub struct SeasonArgs {
    #[command(flatten)]
    pub title: TitleArgs,

    /// The season number
    #[arg(long)]
    pub season: i64,
}

#[derive(Args, Debug)]
pub struct EpisodeArgs {
    #[command(flatten)]
    pub title: TitleArgs,

    /// The season number
    #[arg(long)]
    pub season: i64,

    /// The episode number
    #[arg(long)]
    pub episode: i64,
}

#[derive(Args, Debug)]
pub struct XpathArgs {
    /// The path expression
    pub expr: String,

    /// The page to evaluate it against
    pub url: String,

    /// Rows path; evaluates the expression once per row
    #[arg(short, long)]
    pub rows: Option<String>,

    /// Parse the page as HTML (default)
    #[arg(long, group = "document_kind")]
    pub html: bool,

    /// Parse the page as XML
    #[arg(long, group = "document_kind")]
    pub xml: bool,

    /// Parse the page as JSON
    #[arg(long, group = "document_kind")]
    pub json: bool,
}

impl XpathArgs {
    #[must_use]
    pub fn kind(&self) -> DocumentKind {
        if self.xml {
            DocumentKind::Xml
        } else if self.json {
            DocumentKind::Json
        } else {
            DocumentKind::Html
        }
    }
}

impl TitleArgs {
    fn to_title(&self) -> Result<Title> {
        let mut title = Title::new(self.title.clone());
        for entry in &self.alt_titles {
            let Some((key, value)) = entry.split_once('=') else {
                bail!("Invalid --alt-title '{entry}': expected KEY=TITLE");
            };
            title = title.with_override(key.trim(), value.trim());
        }
        Ok(title)
    }
}

impl QueryKindArgs {
    /// Builds the typed query.
    ///
    /// # Errors
    ///
    /// Malformed `--alt-title` values.
    pub fn to_query(&self) -> Result<SearchQuery> {
        Ok(match self {
            Self::Query { text } => SearchQuery::text(text.join(" ")),
            Self::Movie(args) => {
                SearchQuery::movie(args.title.tmdb_id.clone(), args.title.to_title()?, args.year)
            }
            Self::Show(args) => {
                SearchQuery::show(args.title.tmdb_id.clone(), args.title.to_title()?, args.year)
            }
            Self::Season(args) => {
                SearchQuery::season(args.title.tmdb_id.clone(), args.title.to_title()?, args.season)
            }
            Self::Episode(args) => SearchQuery::episode(
                args.title.tmdb_id.clone(),
                args.title.to_title()?,
                args.season,
                args.episode,
            ),
        })
    }
}
