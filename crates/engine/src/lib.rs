//! The derivation core of the code knowledge graph: incremental ingestion
//! of parser output, community detection into clusters, execution-chain
//! tracing into processes, and bounded impact analysis, all over the
//! shared [`graph_store::GraphStore`].

pub mod cluster;
pub mod config;
pub mod derive;
pub mod error;
pub mod impact;
pub mod ingest;
pub mod parser;
pub mod process;
pub mod service;
pub mod stats;
pub mod watch;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;


pub use config::EngineConfig;
pub use derive::{DerivationOutcome, run_derivation};
pub use error::EngineError;
pub use impact::{Direction, ImpactOptions, ImpactResult, Risk, compute_impact};
pub use ingest::Delta;
pub use parser::SourceParser;
pub use service::CodeGraphEngine;
pub use stats::IndexingStats;
