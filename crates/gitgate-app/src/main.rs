mod crashlog;

use clap::{Parser, Subcommand};
use gitgate_core::domain::{ChangeKind, FileChange, HeadState};
use gitgate_core::services::{Result, StatusQuery};
use gitgate_git_gix::GixBackend;
use gitgate_state::{RepoEvent, RepoEventKind, RepositoryConfig, RepositoryHandle, config};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gitgate", about = "Inspect and watch a Git repository", version)]
struct Args {
    /// Repository working directory
    #[arg(short = 'C', long, default_value = ".")]
    repo: PathBuf,

    /// Enable debug logging for gitgate crates
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Show the current branch and the staged and unstaged changes
    Status {
        /// Include unmodified files
        #[arg(long)]
        unmodified: bool,
        /// Include ignored files
        #[arg(long)]
        ignored: bool,
    },
    /// Show the history of HEAD, newest first
    Log {
        #[arg(short = 'n', long, default_value_t = 20)]
        max_count: usize,
    },
    /// Print change notifications until interrupted
    Watch {
        /// Override the configured debounce window
        #[arg(long)]
        debounce_ms: Option<u64>,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    crashlog::install();
    init_logging(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            if let Some(args) = e.args() {
                eprintln!("  arguments: {}", args.join(" "));
            }
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "gitgate=debug,gitgate_state=debug,gitgate_git_gix=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: Args) -> Result<()> {
    let mut config = config::load();
    if let Cmd::Watch {
        debounce_ms: Some(ms),
    } = args.command
    {
        config.watch.debounce = Duration::from_millis(ms);
        config.watch.max_delay = config.watch.max_delay.max(config.watch.debounce);
    }
    // Only `watch` needs the filesystem watcher.
    config.watch.enabled &= matches!(args.command, Cmd::Watch { .. });

    let handle = open(&args.repo, config)?;
    match args.command {
        Cmd::Status {
            unmodified,
            ignored,
        } => status(
            &handle,
            StatusQuery {
                include_unmodified: unmodified,
                include_ignored: ignored,
            },
        ),
        Cmd::Log { max_count } => log(&handle, max_count),
        Cmd::Watch { .. } => watch(&handle),
    }
}

fn open(workdir: &std::path::Path, config: RepositoryConfig) -> Result<RepositoryHandle> {
    let backend = match &config.git_program {
        Some(program) => GixBackend::with_git_program(program),
        None => GixBackend::default(),
    };
    RepositoryHandle::open(&backend, workdir, config)
}

fn status(handle: &RepositoryHandle, query: StatusQuery) -> Result<()> {
    println!("{}", describe_head(&handle.gateway().head()?));

    handle.staging().set_query(query);
    handle.staging().reload()?;

    print_changes("Staged", &handle.staging().staged_changes(), |c| c.change);
    print_changes("Unstaged", &handle.staging().unstaged_changes(), |c| {
        c.unstaged_change
    });
    Ok(())
}

fn describe_head(head: &HeadState) -> String {
    match (&head.branch, &head.commit) {
        (Some(branch), Some(commit)) => format!("On branch {branch} ({})", commit.short()),
        (Some(branch), None) => format!("On branch {branch} (no commits yet)"),
        (None, Some(commit)) => format!("HEAD detached at {}", commit.short()),
        (None, None) => "HEAD unresolved".to_string(),
    }
}

fn print_changes(title: &str, changes: &[FileChange], kind: impl Fn(&FileChange) -> ChangeKind) {
    if changes.is_empty() {
        return;
    }
    println!("\n{title}:");
    for change in changes {
        match &change.destination {
            Some(destination) => println!(
                "  {} {} -> {destination}",
                kind_letter(kind(change)),
                change.path
            ),
            None => println!("  {} {}", kind_letter(kind(change)), change.path),
        }
    }
}

fn kind_letter(kind: ChangeKind) -> char {
    match kind {
        ChangeKind::Unmodified => ' ',
        ChangeKind::Added => 'A',
        ChangeKind::Deleted => 'D',
        ChangeKind::Modified => 'M',
        ChangeKind::Renamed => 'R',
        ChangeKind::Copied => 'C',
        ChangeKind::Ignored => '!',
        ChangeKind::Untracked => '?',
        ChangeKind::TypeChanged => 'T',
        ChangeKind::Unreadable => 'X',
        ChangeKind::Conflicted => 'U',
        ChangeKind::Mixed => '*',
    }
}

fn log(handle: &RepositoryHandle, max_count: usize) -> Result<()> {
    for commit in handle.commit_log(max_count.clamp(1, 200)).take(max_count) {
        let commit = commit?;
        println!("{} {} ({})", commit.id.short(), commit.summary, commit.author);
    }
    Ok(())
}

fn watch(handle: &RepositoryHandle) -> Result<()> {
    if let Some(e) = handle.watch_error() {
        return Err(e.clone());
    }
    let events = handle.subscribe();
    tracing::info!(workdir = %handle.spec().workdir.display(), "watching for changes");

    while let Ok(event) = events.recv() {
        println!("{}", describe_event(&event));
    }
    Ok(())
}

fn describe_event(event: &RepoEvent) -> String {
    let suffix = if event.expected { " (expected)" } else { "" };
    match &event.kind {
        RepoEventKind::WorkspaceChanged { paths } if paths.is_empty() => {
            format!("workspace changed{suffix}")
        }
        RepoEventKind::WorkspaceChanged { paths } => {
            format!("workspace changed: {}{suffix}", paths.join(", "))
        }
        RepoEventKind::IndexChanged => format!("index changed{suffix}"),
        RepoEventKind::RefsChanged => format!("refs changed{suffix}"),
        RepoEventKind::HeadChanged => format!("HEAD changed{suffix}"),
        RepoEventKind::RepositoryChanged => format!("repository changed{suffix}"),
    }
}
