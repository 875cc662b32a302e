use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "kbsearch")]
#[command(about = "Semantic and keyword search over a local knowledge base", long_about = None)]
pub struct Cli {
    /// Directory that relative `corpus_root` and `index_dir` resolve against
    #[arg(long, global = true)]
    pub base: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Chunk, embed and index new or modified corpus files
    Ingest {
        /// Hide progress bars
        #[arg(long)]
        quiet: bool,
    },

    /// Search the index
    Query {
        query: String,

        /// semantic, keyword or hybrid
        #[arg(short, long, default_value = "hybrid")]
        mode: String,

        /// Number of results (defaults to max_results)
        #[arg(short, long)]
        k: Option<i64>,

        /// Only chunks whose source path starts with this prefix
        #[arg(long)]
        path: Option<String>,

        /// Only chunks from this section
        #[arg(long)]
        section: Option<String>,

        /// Print the raw response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Every chunk of one indexed file, in document order
    File { path: String },

    /// Section titles sharing terms with a query
    Related {
        query: String,

        #[arg(short, long, default_value_t = 5)]
        n: usize,
    },

    /// Print search, embedding and index statistics as JSON
    Status,

    /// Re-embed surviving chunks into a fresh index and swap it in
    Rebuild {
        /// Rechunk the whole corpus instead of reusing indexed chunks
        #[arg(long)]
        force: bool,
    },
}
