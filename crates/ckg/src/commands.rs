//! Command handlers. Each one opens the workspace's store, does its work
//! and prints either human-readable lines or JSON.

use crate::parser::{DeclarativeParser, SOURCE_EXTENSION};
use anyhow::{Context, Result, bail};
use engine::impact::{Direction, ImpactOptions, ImpactResult};
use engine::{CodeGraphEngine, EngineConfig};
use graph_store::{GraphStore, RelationType, StoreConfig};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use sync_engine::{MANIFEST_FILE_NAME, SyncEngine};
use tracing::info;

pub const DATA_DIR_NAME: &str = ".ckg";
const DB_FILE_NAME: &str = "graph.kz";

pub struct Workspace {
    repo: PathBuf,
    data_dir: PathBuf,
}

impl Workspace {
    pub fn new(repo: &Path) -> Result<Self> {
        let repo = repo
            .canonicalize()
            .with_context(|| format!("repository root {} not found", repo.display()))?;
        let data_dir = repo.join(DATA_DIR_NAME);
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self { repo, data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    fn manifest_path(&self) -> PathBuf {
        self.data_dir.join(MANIFEST_FILE_NAME)
    }

    fn open_engine(&self) -> Result<CodeGraphEngine<DeclarativeParser>> {
        let store = GraphStore::open(&self.db_path(), &StoreConfig::default())?;
        let config = EngineConfig::load(&self.repo)?;
        Ok(CodeGraphEngine::new(store, config, DeclarativeParser))
    }

    fn sync_engine(&self) -> SyncEngine {
        SyncEngine::new(self.manifest_path(), self.db_path(), StoreConfig::default())
    }

    /// Source files eligible for ingestion, as (relative path, content)
    /// pairs, honoring gitignore and skipping the data directory.
    fn collect_sources(&self) -> Result<Vec<(String, String)>> {
        let mut files = Vec::new();
        for entry in WalkBuilder::new(&self.repo).build() {
            let entry = entry?;
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            if entry.path().starts_with(&self.data_dir) {
                continue;
            }
            if entry.path().extension().and_then(|e| e.to_str()) != Some(SOURCE_EXTENSION) {
                continue;
            }
            let content = std::fs::read_to_string(entry.path())
                .with_context(|| format!("reading {}", entry.path().display()))?;
            let relative = entry
                .path()
                .strip_prefix(&self.repo)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            files.push((relative, content));
        }
        files.sort();
        Ok(files)
    }
}

pub fn index(workspace: &Workspace, stats_output: Option<Option<PathBuf>>) -> Result<()> {
    let engine = workspace.open_engine()?;
    let files = workspace.collect_sources()?;
    info!(files = files.len(), "Indexing repository");

    let stats = engine.ingest_batch(&files)?;
    println!("{stats}");
    if let Some(target) = stats_output {
        let json = serde_json::to_string_pretty(&stats)?;
        match target {
            Some(path) => std::fs::write(&path, json)
                .with_context(|| format!("writing stats to {}", path.display()))?,
            None => println!("{json}"),
        }
    }

    let outcome = engine.derive()?;
    println!(
        "derived {} clusters and {} processes in {} ms",
        outcome.clusters, outcome.processes, outcome.duration_ms
    );
    Ok(())
}

pub fn impact(
    workspace: &Workspace,
    target: &str,
    direction: &str,
    max_depth: Option<usize>,
    min_confidence: Option<f64>,
    json: bool,
) -> Result<()> {
    let Some(direction) = Direction::parse(direction) else {
        bail!("direction must be `upstream` or `downstream`, got `{direction}`");
    };
    let engine = workspace.open_engine()?;
    let mut options = ImpactOptions::from_config(direction, &engine.config().impact);
    if let Some(depth) = max_depth {
        options.max_depth = depth;
    }
    if let Some(confidence) = min_confidence {
        options.min_confidence = confidence;
    }

    let result = engine.impact(target, &options)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }
    print_impact(target, &result);
    Ok(())
}

fn print_impact(target: &str, result: &ImpactResult) {
    if !result.target_found {
        println!("`{target}` is not in the graph (run `ckg index`?)");
        return;
    }
    println!(
        "impact of `{target}`: {} node(s), overall risk {}",
        result.nodes.len(),
        result.overall_risk
    );
    for node in &result.nodes {
        println!(
            "  [depth {}] {} ({})  {}  confidence {:.2}",
            node.depth, node.name, node.file_path, node.risk, node.confidence
        );
    }
    for cluster in &result.clusters {
        let kind = if cluster.direct { "direct" } else { "indirect" };
        println!("  cluster {} ({kind})", cluster.name);
    }
    for process in &result.processes {
        println!("  process {} BROKEN at step {}", process.name, process.min_step);
    }
}

pub fn search(workspace: &Workspace, name: &str, json: bool) -> Result<()> {
    let engine = workspace.open_engine()?;
    let matches = engine.search(name)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&matches)?);
        return Ok(());
    }
    if matches.is_empty() {
        println!("no symbols named `{name}`");
    }
    for node in matches {
        println!(
            "{} {} ({}:{}-{})",
            node.label, node.name, node.file_path, node.start_line, node.end_line
        );
    }
    Ok(())
}

pub fn explore(workspace: &Workspace, target: &str, relation: &str) -> Result<()> {
    let Some(rel_type) = RelationType::parse(relation) else {
        bail!("unknown relation type `{relation}`");
    };
    let engine = workspace.open_engine()?;
    let neighbors = engine.explore(target, rel_type)?;
    if neighbors.is_empty() {
        println!("no {rel_type} neighbors for `{target}`");
    }
    for (relation, node) in neighbors {
        let arrow = if node.id == relation.to { "->" } else { "<-" };
        println!(
            "{arrow} {} {} (confidence {:.2})",
            node.label, node.name, relation.confidence
        );
    }
    Ok(())
}

pub fn overview(workspace: &Workspace, json: bool) -> Result<()> {
    let engine = workspace.open_engine()?;
    let overview = engine.overview()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&overview)?);
        return Ok(());
    }
    println!("nodes:");
    for (label, count) in &overview.nodes_by_label {
        println!("  {label}: {count}");
    }
    println!("relations:");
    for (rel_type, count) in &overview.relations_by_type {
        println!("  {rel_type}: {count}");
    }
    Ok(())
}

pub fn query(workspace: &Workspace, query_or_file: &str, params: &str) -> Result<()> {
    let query_path = Path::new(query_or_file);
    let query = if query_path.is_file() {
        std::fs::read_to_string(query_path)?
    } else {
        query_or_file.to_string()
    };
    let params: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(params).context("`--params` must be a JSON object")?;

    let engine = workspace.open_engine()?;
    let output = engine.store().generic_query(&query, params)?;
    println!("{}", output.column_names.join("\t"));
    for row in &output.rows {
        let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        println!("{}", cells.join("\t"));
    }
    Ok(())
}

pub fn export(workspace: &Workspace, commit: Option<String>, gzip: bool) -> Result<()> {
    let commit = match commit {
        Some(commit) => commit,
        None => head_tree_id(&workspace.repo)?,
    };
    let engine = workspace.open_engine()?;
    let mut sync = workspace.sync_engine();
    let header = sync.export(engine.store(), &commit, gzip)?;
    println!(
        "exported {} nodes and {} edges for {}",
        header.node_count, header.edge_count, header.commit
    );
    Ok(())
}

pub fn hydrate(workspace: &Workspace, commit: Option<String>) -> Result<()> {
    let expected = match commit {
        Some(commit) => commit,
        None => head_tree_id(&workspace.repo)?,
    };
    let mut sync = workspace.sync_engine();
    let store = sync.hydrate(Some(&expected))?;
    let stats = store.stats()?;
    println!("hydrated: {stats}");
    Ok(())
}

/// Pre-commit: bind the manifest to the tree being committed (the staged
/// tree), so the receiving side can match it against its checkout.
pub fn hook_pre_commit(workspace: &Workspace) -> Result<()> {
    let commit = staged_tree_id(&workspace.repo)?;
    export(workspace, Some(commit), false)
}

/// Post-merge: trust the pulled manifest when it matches the merged tree,
/// otherwise rebuild from source and export a superseding manifest.
pub fn hook_post_merge(workspace: &Workspace) -> Result<()> {
    let expected = head_tree_id(&workspace.repo)?;
    let config = EngineConfig::load(&workspace.repo)?;
    let cancel = AtomicBool::new(false);
    let mut sync = workspace.sync_engine();
    let store = sync.hydrate_or_regenerate(
        &expected,
        &workspace.repo,
        DeclarativeParser,
        config,
        &cancel,
    )?;
    let stats = store.stats()?;
    println!("synchronized: {stats}");
    Ok(())
}

pub fn clean(workspace: &Workspace) -> Result<()> {
    if workspace.data_dir.exists() {
        std::fs::remove_dir_all(&workspace.data_dir)?;
        println!("removed {}", workspace.data_dir.display());
    }
    Ok(())
}

fn head_tree_id(repo: &Path) -> Result<String> {
    git_id(repo, &["rev-parse", "HEAD^{tree}"])
}

fn staged_tree_id(repo: &Path) -> Result<String> {
    git_id(repo, &["write-tree"])
}

fn git_id(repo: &Path, args: &[&str]) -> Result<String> {
    let output = std::process::Command::new("git")
        .args(args)
        .current_dir(repo)
        .output()
        .context("running git (pass --commit to bind the manifest explicitly)")?;
    if !output.status.success() {
        bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
