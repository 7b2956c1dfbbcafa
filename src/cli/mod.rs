//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "kret",
    version,
    author = "neur0map",
    about = "Hybrid knowledge retrieval over a pre-chunked corpus",
    long_about = "kret answers a query by running semantic, lexical and entity-graph search \
                  concurrently, fusing the rankings, optionally reranking with an LLM or \
                  cross-encoder, and returning diversified results with citations."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/kret/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Retrieve ranked, cited passages for a query
    Query {
        /// Search query text
        query: String,

        /// JSON-lines corpus of pre-chunked records
        #[arg(long, value_name = "FILE")]
        corpus: PathBuf,

        /// Maximum number of results to return
        #[arg(short = 'k', long, default_value = "10")]
        top_k: usize,

        /// Restrict semantic search to a knowledge pack
        #[arg(short, long)]
        pack: Vec<String>,

        /// Drop results below this confidence
        #[arg(short, long, default_value = "0.7")]
        min_confidence: f32,

        /// Skip the reranking stage
        #[arg(long)]
        no_rerank: bool,

        /// Skip citation lookup
        #[arg(long)]
        no_sources: bool,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List recently logged retrievals
    History {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_query_flags() {
        let cli = Cli::try_parse_from([
            "kret",
            "query",
            "office rent",
            "--corpus",
            "corpus.jsonl",
            "-k",
            "5",
            "--pack",
            "tax",
            "--no-rerank",
        ])
        .unwrap();

        match cli.command {
            Commands::Query {
                query,
                top_k,
                pack,
                no_rerank,
                min_confidence,
                ..
            } => {
                assert_eq!(query, "office rent");
                assert_eq!(top_k, 5);
                assert_eq!(pack, vec!["tax".to_string()]);
                assert!(no_rerank);
                assert_eq!(min_confidence, 0.7);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
