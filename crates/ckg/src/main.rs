mod cli;
mod commands;
mod parser;

use crate::cli::{CkgCli, Commands, HookCommands};
use anyhow::Result;
use commands::Workspace;
use logging::LogMode;

fn main() -> Result<()> {
    let cli = CkgCli::parse_args();
    let workspace = Workspace::new(&cli.repo)?;

    // Hooks keep stdio clean for git and log to the rotating file instead.
    let _guards = match &cli.command {
        Commands::Hook { .. } => logging::init(
            LogMode::Hook {
                data_dir: workspace.data_dir(),
            },
            cli.verbose,
        )?,
        _ => logging::init(LogMode::Cli, cli.verbose)?,
    };

    match cli.command {
        Commands::Index { stats } => commands::index(&workspace, stats),
        Commands::Impact {
            target,
            direction,
            max_depth,
            min_confidence,
            json,
        } => commands::impact(
            &workspace,
            &target,
            &direction,
            max_depth,
            min_confidence,
            json,
        ),
        Commands::Search { name, json } => commands::search(&workspace, &name, json),
        Commands::Explore { target, relation } => {
            commands::explore(&workspace, &target, &relation)
        }
        Commands::Overview { json } => commands::overview(&workspace, json),
        Commands::Query {
            query_or_file,
            params,
        } => commands::query(&workspace, &query_or_file, &params),
        Commands::Export { commit, gzip } => commands::export(&workspace, commit, gzip),
        Commands::Hydrate { commit } => commands::hydrate(&workspace, commit),
        Commands::Hook { hook } => match hook {
            HookCommands::PreCommit => commands::hook_pre_commit(&workspace),
            HookCommands::PostMerge => commands::hook_post_merge(&workspace),
        },
        Commands::Clean => commands::clean(&workspace),
    }
}
