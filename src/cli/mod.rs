//! CLI command definitions and parsing
use crate::retrieval::Corpus;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "lexfuse",
    version,
    author = "neur0map",
    about = "Hybrid legal retrieval over laws, case documents and court decisions",
    long_about = "Lexfuse runs vector, keyword and citation-graph search side by side, fuses the \
                  rankings with Reciprocal Rank Fusion, diversifies them with MMR and returns \
                  confidence-scored chunks ready to hand to an answering model."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/lexfuse/config.toml)
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
    /// Search the indexed corpora
    Search {
        /// Search query text
        query: String,

        /// Restrict to a corpus (repeatable): laws, case_documents, court_decisions
        #[arg(long = "corpus", value_parser = parse_corpus)]
        corpora: Vec<Corpus>,

        /// Maximum number of results to return
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Drop results below this confidence
        #[arg(long)]
        min_confidence: Option<f32>,

        /// Skip MMR and keep the fused order
        #[arg(long)]
        no_diversify: bool,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Print the normalized form of a query as JSON
    Normalize {
        /// Query text
        query: String,
    },

    /// Detect legal citations in a piece of text
    Citations {
        /// Text to scan
        text: String,
    },

    /// Load pre-chunked documents from a JSON Lines file
    Import {
        /// One document per line; `embedding` is optional
        file: PathBuf,

        /// Documents embedded per model call
        #[arg(long, default_value = "32")]
        batch_size: usize,
    },

    /// Show document counts per corpus
    Stats,

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

fn parse_corpus(value: &str) -> Result<Corpus, String> {
    value.parse()
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
