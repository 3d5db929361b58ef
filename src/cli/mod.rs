//! `snapkeep` command-line client.
//!
//! Every command except `get` works on the local data directory through the
//! service layer. `get` downloads from a server and restores through the
//! conflict-aware restore protocol.

pub mod output;
pub mod prompt;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;

use crate::archive::entry_path::check_entry_name;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::models::commit::SnapshotInfo;
use crate::models::repo::CreateRepoRequest;
use crate::models::restore::RestoreOptions;
use crate::restore;
use crate::services::{commit_service, repo_service};
use crate::snapshot::scan_source;
use crate::state::AppState;
use crate::transfer;

use output::{format_bytes, format_date, parse_target};

#[derive(Parser, Debug)]
#[command(name = "snapkeep", version, about = "Local snapshot versioning for directories")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a repository for the current directory
    Init {
        /// Repository description
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Snapshot the source directory
    #[command(visible_alias = "push")]
    Save {
        /// Commit message
        message: Vec<String>,
    },

    /// Download a snapshot from the server and restore it
    Get {
        /// `repo`, `repo@ref` or `@ref`
        target: Option<String>,

        /// Overwrite conflicting files without asking
        #[arg(short, long)]
        force: bool,

        /// Do not back up conflicting files before overwriting them
        #[arg(long)]
        no_backup: bool,

        /// Only show what would happen
        #[arg(short, long)]
        dry_run: bool,

        /// Destination directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Leave files that changed locally alone
        #[arg(short, long)]
        skip_conflicts: bool,

        /// Transfer timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Show commit history
    #[command(visible_alias = "history")]
    Log {
        /// Number of commits to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Show the current repository and source directory
    Status,

    /// List repositories
    #[command(visible_alias = "repos")]
    List {
        /// Include descriptions and storage stats
        #[arg(short, long)]
        verbose: bool,
    },

    /// Delete one commit
    Delete {
        /// Commit reference (file name, id or unique prefix)
        commit_ref: String,
    },

    /// Delete the current repository and all its snapshots
    DeleteRepo {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Set the repository description
    Comment {
        text: Vec<String>,
    },

    /// Show repository metadata and stats
    Info,
}

/// Resolved environment of one CLI invocation.
pub struct CliContext {
    pub state: AppState,
    pub repo_name: String,
    pub source_dir: PathBuf,
}

impl CliContext {
    pub fn from_env(config: AppConfig) -> Result<Self> {
        let cwd = std::env::current_dir().context("Cannot determine the working directory")?;
        let repo_name = std::env::var("REPO_NAME")
            .ok()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .or_else(|| cwd.file_name().map(|n| n.to_string_lossy().into_owned()))
            .context("Cannot derive a repository name; set REPO_NAME")?;
        let source_dir = std::env::var("SOURCE_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(cwd);

        Ok(Self {
            state: AppState::new(config),
            repo_name,
            source_dir,
        })
    }

    fn config(&self) -> &AppConfig {
        &self.state.config
    }
}

pub async fn run(cli: Cli, ctx: CliContext) -> Result<()> {
    match cli.command {
        Command::Init { description } => init(&ctx, description).await,
        Command::Save { message } => save(&ctx, message.join(" ")).await,
        Command::Get {
            target,
            force,
            no_backup,
            dry_run,
            output,
            skip_conflicts,
            timeout,
        } => {
            let options = RestoreOptions {
                force,
                backup: !no_backup,
                dry_run,
                skip_conflicts,
                output_dir: output,
                timeout: timeout
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| ctx.config().transfer_timeout()),
            };
            get(&ctx, target.as_deref(), options).await
        }
        Command::Log { limit } => log(&ctx, limit).await,
        Command::Status => status(&ctx).await,
        Command::List { verbose } => list(&ctx, verbose).await,
        Command::Delete { commit_ref } => delete(&ctx, commit_ref).await,
        Command::DeleteRepo { yes } => delete_repo(&ctx, yes).await,
        Command::Comment { text } => comment(&ctx, text.join(" ")).await,
        Command::Info => info(&ctx).await,
    }
}

async fn init(ctx: &CliContext, description: Option<String>) -> Result<()> {
    let meta = repo_service::create_repo(
        &ctx.state,
        CreateRepoRequest {
            name: ctx.repo_name.clone(),
            description,
        },
    )
    .await?;
    println!("{} Created repository '{}'", "✓".green(), meta.id.bold());
    println!("  source: {}", ctx.source_dir.display());
    Ok(())
}

async fn save(ctx: &CliContext, message: String) -> Result<()> {
    let message = if message.trim().is_empty() {
        commit_service::DEFAULT_MESSAGE.to_string()
    } else {
        message
    };
    let record = match commit_service::commit_from_source(
        &ctx.state,
        &ctx.repo_name,
        ctx.source_dir.clone(),
        message,
    )
    .await
    {
        Err(AppError::RepoNotFound(name)) => {
            bail!("Repository '{}' does not exist, run `snapkeep init` first", name)
        }
        other => other?,
    };

    println!("{} Saved {}", "✓".green(), record.file.bold());
    println!("  message: {}", record.message);
    println!("  files:   {}", record.file_count);
    println!("  size:    {}", format_bytes(record.size));
    Ok(())
}

async fn get(ctx: &CliContext, target: Option<&str>, options: RestoreOptions) -> Result<()> {
    let target = parse_target(target, &ctx.repo_name);
    let server = ctx.config().server_url.as_str();
    let client = transfer::client()?;

    let info_url = match &target.commit_ref {
        Some(commit_ref) => api_url(server, &["repos", &target.repo, "snapshot", commit_ref])?,
        None => api_url(server, &["repos", &target.repo, "latest"])?,
    };
    let info: SnapshotInfo = transfer::fetch_json(&client, info_url.as_str(), options.timeout).await?;
    let file = checked_snapshot_name(&info.file)?;

    println!("Snapshot {} of '{}'", file.bold(), target.repo);
    println!("  message: {}", info.message.as_deref().unwrap_or("-"));
    if let Some(date) = info.date {
        println!("  date:    {}", format_date(date));
    }
    println!("  size:    {}", format_bytes(info.size));

    let scratch = tempfile::Builder::new().prefix("snapkeep-get-").tempdir()?;
    let archive = scratch
        .path()
        .join(format!("snapshot.{}", ctx.state.codec.extension()));
    let download_url = api_url(server, &["repos", &target.repo, "download", file])?;
    transfer::download_to(
        &client,
        download_url.as_str(),
        &archive,
        options.timeout,
        ctx.config().max_download_size,
    )
    .await?;

    // Without a ledger date every existing local file counts as a conflict.
    let snapshot_date: DateTime<Utc> = info
        .date
        .unwrap_or_else(|| DateTime::<Utc>::from(std::time::UNIX_EPOCH));
    let codec = ctx.state.codec.clone();
    let restore_options = options.clone();
    let report = tokio::task::spawn_blocking(move || {
        let mut resolver = prompt::TerminalResolver;
        restore::restore(codec.as_ref(), &archive, snapshot_date, &restore_options, &mut resolver)
    })
    .await
    .context("Restore task failed")??;

    if report.cancelled {
        println!("{} Cancelled, nothing was changed", "✗".red());
        return Ok(());
    }
    if report.dry_run {
        println!();
        println!("{} Dry run, nothing was written", "i".blue());
        println!("  destination:    {}", options.output_dir.display());
        println!("  would extract:  {}", report.extracted);
        println!("  would skip:     {}", report.skipped);
        println!("  conflicts:      {}", report.conflicts.len());
        for conflict in &report.conflicts {
            println!("    • {}", conflict.path);
        }
        return Ok(());
    }

    if let Some(dir) = &report.backup_dir {
        println!("  backup:  {}", dir.display());
    }
    println!(
        "{} Restored {} file(s), {} ({} skipped)",
        "✓".green(),
        report.extracted,
        format_bytes(report.bytes_written),
        report.skipped
    );
    Ok(())
}

/// `<server>/api/<segments...>` with every segment percent-encoded.
fn api_url(server: &str, segments: &[&str]) -> Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(server).with_context(|| format!("Invalid server URL '{}'", server))?;
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("Server URL '{}' cannot carry a path", server))?
        .pop_if_empty()
        .push("api")
        .extend(segments);
    Ok(url)
}

/// The server names the archive; it must be a plain file name before it is
/// used anywhere locally.
fn checked_snapshot_name(name: &str) -> Result<&str, AppError> {
    let plain = !name.is_empty()
        && name != "."
        && !name.contains(['/', '\\'])
        && check_entry_name(name).is_ok();
    if plain {
        Ok(name)
    } else {
        Err(AppError::BadRequest(format!(
            "server returned an unusable snapshot name {:?}",
            name
        )))
    }
}

async fn log(ctx: &CliContext, limit: usize) -> Result<()> {
    let commits = commit_service::history(&ctx.state, &ctx.repo_name).await?;
    if commits.is_empty() {
        println!("No snapshots in '{}' yet", ctx.repo_name);
        return Ok(());
    }
    println!("History of '{}' ({} total)", ctx.repo_name.bold(), commits.len());
    for commit in commits.iter().take(limit) {
        println!(
            "{}  {}  {:>10}  {}",
            commit.id.yellow(),
            format_date(commit.date),
            format_bytes(commit.size),
            commit.message
        );
    }
    if commits.len() > limit {
        println!("... {} older", commits.len() - limit);
    }
    Ok(())
}

async fn status(ctx: &CliContext) -> Result<()> {
    println!("repository: {}", ctx.repo_name.bold());
    println!("source:     {}", ctx.source_dir.display());
    println!("data dir:   {}", ctx.config().data_dir);
    println!("server:     {}", ctx.config().server_url);

    match repo_service::repo_info(&ctx.state, &ctx.repo_name).await {
        Ok(info) => {
            println!("snapshots:  {} ({})", info.stats.commit_count, format_bytes(info.stats.total_size));
            if let Some(last) = info.stats.last_commit {
                println!("latest:     {} {} \"{}\"", last.id, format_date(last.date), last.message);
            }
        }
        Err(AppError::RepoNotFound(_)) => println!("{} repository not initialised", "!".yellow()),
        Err(e) => return Err(e.into()),
    }

    if ctx.source_dir.is_dir() {
        let root = ctx.source_dir.clone();
        let max_file_size = ctx.config().max_file_size;
        let (_, eligible) = tokio::task::spawn_blocking(move || scan_source(&root, max_file_size)).await??;
        let total: u64 = eligible.files.iter().map(|f| f.size).sum();
        println!(
            "eligible:   {} file(s), {} ({} oversized)",
            eligible.files.len(),
            format_bytes(total),
            eligible.oversized.len()
        );
    }
    Ok(())
}

async fn list(ctx: &CliContext, verbose: bool) -> Result<()> {
    let repos = repo_service::list_repos(&ctx.state).await?;
    if repos.is_empty() {
        println!("No repositories in {}", ctx.config().data_dir);
        return Ok(());
    }
    for repo in repos {
        let marker = if repo.id == ctx.repo_name { "*" } else { " " };
        let last = repo
            .last_commit
            .as_ref()
            .map(|c| format_date(c.date))
            .unwrap_or_else(|| "no snapshots".into());
        println!("{} {:<24} {}", marker, repo.id.bold(), last);
        if verbose {
            if !repo.description.is_empty() {
                println!("    {}", repo.description);
            }
            let info = repo_service::repo_info(&ctx.state, &repo.id).await?;
            println!(
                "    {} snapshot(s), {} total, {} average",
                info.stats.commit_count,
                format_bytes(info.stats.total_size),
                format_bytes(info.stats.average_size)
            );
        }
    }
    Ok(())
}

async fn delete(ctx: &CliContext, commit_ref: String) -> Result<()> {
    let file = commit_service::delete_commit(&ctx.state, &ctx.repo_name, commit_ref).await?;
    println!("{} Deleted {}", "✓".green(), file);
    Ok(())
}

async fn delete_repo(ctx: &CliContext, yes: bool) -> Result<()> {
    if !yes && !prompt::confirm(&format!("Delete repository '{}' and all its snapshots?", ctx.repo_name)) {
        println!("Cancelled");
        return Ok(());
    }
    repo_service::delete_repo(&ctx.state, &ctx.repo_name).await?;
    println!("{} Deleted repository '{}'", "✓".green(), ctx.repo_name);
    Ok(())
}

async fn comment(ctx: &CliContext, text: String) -> Result<()> {
    let meta = repo_service::update_description(&ctx.state, &ctx.repo_name, text).await?;
    if meta.description.is_empty() {
        println!("{} Description cleared", "✓".green());
    } else {
        println!("{} Description set: {}", "✓".green(), meta.description);
    }
    Ok(())
}

async fn info(ctx: &CliContext) -> Result<()> {
    let info = repo_service::repo_info(&ctx.state, &ctx.repo_name).await?;
    let meta = &info.meta;
    let stats = &info.stats;
    println!("{}", meta.name.bold());
    if !meta.description.is_empty() {
        println!("  {}", meta.description);
    }
    println!("  created:   {}", format_date(meta.created_at));
    println!("  updated:   {}", format_date(meta.updated_at));
    println!("  snapshots: {}", stats.commit_count);
    println!("  total:     {}", format_bytes(stats.total_size));
    println!("  average:   {}", format_bytes(stats.average_size));
    if let Some(first) = &stats.first_commit {
        println!("  first:     {} {}", first.id, format_date(first.date));
    }
    if let Some(last) = &stats.last_commit {
        println!("  latest:    {} {} \"{}\"", last.id, format_date(last.date), last.message);
    }
    Ok(())
}
