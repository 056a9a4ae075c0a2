use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use pagesync::config::{Access, Workspace};
use pagesync::convert::HtmlMarkdown;
use pagesync::credentials::Credentials;
use pagesync::push::{ensure_writable, push_page};
use pagesync::sync::session::run_sync;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const ROOT_ENV_VAR: &str = "PAGESYNC_ROOT";

#[derive(Debug, Parser)]
#[command(name = "pagesync", version, about = "Mirror remote page trees into local markdown")]
struct Cli {
    /// Workspace root holding config/ and projects/ (defaults to $PAGESYNC_ROOT, then the current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Pull configured pages and their descendants into the project
    Sync {
        #[arg(long)]
        project: String,
        /// Only sync the entry with this name
        #[arg(long)]
        page: Option<String>,
        /// Rewrite pages even when the recorded version is current
        #[arg(long)]
        force: bool,
    },
    /// Replace a read-write page's remote body with local markdown
    Push {
        #[arg(long)]
        project: String,
        #[arg(long)]
        page: String,
        #[command(flatten)]
        input: PushInput,
    },
    /// List the pages configured for a project
    Pages {
        #[arg(long)]
        project: String,
    },
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
struct PushInput {
    /// Read markdown from this file
    #[arg(long)]
    file: Option<PathBuf>,
    /// Read markdown from standard input
    #[arg(long)]
    stdin: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let root = resolve_root(cli.root)?;
    let workspace = Workspace::open(&root)
        .with_context(|| format!("failed to open workspace at {}", root.display()))?;

    match cli.command {
        Command::Sync {
            project,
            page,
            force,
        } => sync(&workspace, &project, page.as_deref(), force).await,
        Command::Push {
            project,
            page,
            input,
        } => push(&workspace, &project, &page, input).await,
        Command::Pages { project } => pages(&workspace, &project),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn resolve_root(flag: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match flag.or_else(|| std::env::var_os(ROOT_ENV_VAR).map(PathBuf::from)) {
        Some(root) => Ok(root),
        None => std::env::current_dir().context("failed to determine the current directory"),
    }
}

async fn sync(
    workspace: &Workspace,
    project: &str,
    page: Option<&str>,
    force: bool,
) -> anyhow::Result<ExitCode> {
    let project = workspace.load_project(project)?;
    let entries = project.select(page)?;
    let client = Credentials::resolve(workspace)?.client()?;

    let totals = run_sync(&project, &entries, &client, &HtmlMarkdown::new(), force).await?;
    println!(
        "synced: {}, skipped: {}, failed: {}",
        totals.synced, totals.skipped, totals.failed
    );
    Ok(if totals.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn push(
    workspace: &Workspace,
    project: &str,
    page: &str,
    input: PushInput,
) -> anyhow::Result<ExitCode> {
    let project = workspace.load_project(project)?;
    let entry = project.page(page)?;
    ensure_writable(entry)?;
    let client = Credentials::resolve(workspace)?.client()?;

    let markdown = match input.file {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut content = String::new();
            std::io::stdin()
                .read_to_string(&mut content)
                .context("failed to read standard input")?;
            content
        }
    };

    let outcome = push_page(&project, entry, &markdown, &client, &HtmlMarkdown::new()).await?;
    println!(
        "updated '{}' from version {} to {}",
        outcome.title, outcome.previous_version, outcome.new_version
    );
    if !outcome.resynced {
        println!("local copy not refreshed; run `pagesync sync --project {}`", project.name);
    }
    Ok(ExitCode::SUCCESS)
}

fn pages(workspace: &Workspace, project: &str) -> anyhow::Result<ExitCode> {
    let project = workspace.load_project(project)?;
    if project.pages.is_empty() {
        println!("no pages configured for project `{}`", project.name);
        return Ok(ExitCode::SUCCESS);
    }
    for entry in &project.pages {
        let access = match entry.access {
            Access::ReadOnly => "read-only",
            Access::ReadWrite => "read-write",
        };
        println!(
            "{}\t{}\t{}\t{}",
            entry.name,
            entry.page_id,
            access,
            entry.local_path.display()
        );
    }
    Ok(ExitCode::SUCCESS)
}
