use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ckg",
    version,
    about = "Code knowledge graph CLI",
    long_about = "Maintains a queryable knowledge graph of a source repository: \
                  incremental indexing, behavioral clusters, execution traces, \
                  impact analysis and git-synchronized manifests."
)]
pub struct CkgCli {
    /// Repository root to operate on
    #[arg(long, global = true, default_value = ".")]
    pub repo: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl CkgCli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index the repository incrementally and rerun derivation
    Index {
        /// Output statistics. Optionally specify a file path to save to.
        #[arg(long, value_name = "FILE", num_args = 0..=1, require_equals = true)]
        stats: Option<Option<PathBuf>>,
    },
    /// What breaks if this symbol changes
    Impact {
        /// Symbol name, optionally qualified (e.g. InvoiceGenerator.generate)
        target: String,

        /// upstream (what depends on it) or downstream (what it depends on)
        #[arg(long, default_value = "upstream")]
        direction: String,

        #[arg(long)]
        max_depth: Option<usize>,

        #[arg(long)]
        min_confidence: Option<f64>,

        /// Emit the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Look up symbols by name
    Search {
        name: String,

        #[arg(long)]
        json: bool,
    },
    /// Neighbors of a symbol along one relation type
    Explore {
        target: String,

        /// CONTAINS, DEFINES, IMPORTS, CALLS, EXTENDS, IMPLEMENTS,
        /// MEMBER_OF or STEP_IN_PROCESS
        #[arg(long, default_value = "CALLS")]
        relation: String,
    },
    /// Node and relation counts by label and type
    Overview {
        #[arg(long)]
        json: bool,
    },
    /// Run a raw pattern query against the graph
    Query {
        /// Query string or file path containing the query
        #[arg(value_name = "QUERY_OR_FILE")]
        query_or_file: String,

        /// Query parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,
    },
    /// Export the graph to the manifest, bound to the current source state
    Export {
        /// Identifier to bind the manifest to (defaults to the git tree id)
        #[arg(long)]
        commit: Option<String>,

        /// Compress the manifest with gzip
        #[arg(long)]
        gzip: bool,
    },
    /// Load the graph from the manifest instead of re-indexing
    Hydrate {
        /// Expected bound identifier (defaults to the git tree id)
        #[arg(long)]
        commit: Option<String>,
    },
    /// Git hook entry points
    Hook {
        #[command(subcommand)]
        hook: HookCommands,
    },
    /// Remove the local graph database and manifest
    Clean,
}

#[derive(Subcommand, Debug)]
pub enum HookCommands {
    /// Export the manifest for the commit being created
    PreCommit,
    /// Hydrate from the pulled manifest, or regenerate on conflict
    PostMerge,
}
