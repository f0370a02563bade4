use crate::config::WatchConfig;
use crate::model::ChangeAreas;
use gitgate_core::domain::normalize_repo_path;
use gitgate_core::error::{Error, ErrorKind};
use gitgate_core::services::Result;
use globset::{Glob, GlobMatcher};
use notify::event::{AccessKind, AccessMode};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

enum MonitorMsg {
    Event(notify::Result<notify::Event>),
    Stop,
}

/// A classified, possibly merged, batch of on-disk changes.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct WatchChange {
    pub(crate) areas: ChangeAreas,
    /// Workspace paths relative to the repository root. Empty with
    /// `ChangeAreas::WORKSPACE` set means "anything may have changed".
    pub(crate) paths: BTreeSet<String>,
    paths_unknown: bool,
}

impl WatchChange {
    pub(crate) fn areas(areas: ChangeAreas) -> Self {
        Self {
            areas,
            ..Self::default()
        }
    }

    /// Every area, with unknown workspace paths.
    fn everything() -> Self {
        Self {
            areas: ChangeAreas::INDEX | ChangeAreas::REFS | ChangeAreas::WORKSPACE,
            paths: BTreeSet::new(),
            paths_unknown: true,
        }
    }

    fn workspace_path(path: String) -> Self {
        Self {
            areas: ChangeAreas::WORKSPACE,
            paths: BTreeSet::from([path]),
            paths_unknown: false,
        }
    }

    fn merge(&mut self, other: WatchChange) {
        self.areas |= other.areas;
        self.paths_unknown |= other.paths_unknown;
        if self.paths_unknown {
            self.paths.clear();
        } else {
            self.paths.extend(other.paths);
        }
    }

    pub(crate) fn into_paths(self) -> Vec<String> {
        self.paths.into_iter().collect()
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct DebouncedChange {
    pending: Option<WatchChange>,
    first_event_at: Option<Instant>,
    last_event_at: Option<Instant>,
    debounce: Duration,
    max_delay: Duration,
}

impl DebouncedChange {
    fn new(debounce: Duration, max_delay: Duration) -> Self {
        Self {
            pending: None,
            first_event_at: None,
            last_event_at: None,
            debounce,
            max_delay: max_delay.max(debounce),
        }
    }

    fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn push(&mut self, change: WatchChange, now: Instant) -> Option<WatchChange> {
        self.pending
            .get_or_insert_with(WatchChange::default)
            .merge(change);
        self.first_event_at.get_or_insert(now);
        self.last_event_at = Some(now);
        self.take_if_max_delay_elapsed(now)
    }

    fn take_if_max_delay_elapsed(&mut self, now: Instant) -> Option<WatchChange> {
        let first = self.first_event_at?;
        if now.duration_since(first) >= self.max_delay {
            self.take()
        } else {
            None
        }
    }

    fn next_timeout(&self, now: Instant) -> Option<Duration> {
        let (first, last) = (self.first_event_at?, self.last_event_at?);
        let due = (last + self.debounce).min(first + self.max_delay);
        Some(due.saturating_duration_since(now))
    }

    fn take_if_due(&mut self, now: Instant) -> Option<WatchChange> {
        if !self.is_pending() {
            return None;
        }
        let timeout = self.next_timeout(now).unwrap_or(Duration::ZERO);
        if timeout.is_zero() { self.take() } else { None }
    }

    fn take(&mut self) -> Option<WatchChange> {
        let pending = self.pending.take();
        self.first_event_at = None;
        self.last_event_at = None;
        pending
    }
}

/// A running filesystem watcher for one repository.
pub(crate) struct RepoMonitor {
    msg_tx: mpsc::Sender<MonitorMsg>,
    join: Option<thread::JoinHandle<()>>,
}

impl RepoMonitor {
    /// Establishes the OS watches, then hands debounced changes to `sink` on a
    /// dedicated thread. Fails with `WatchUnavailable` when the workdir cannot be
    /// watched.
    pub(crate) fn start(
        workdir: &Path,
        git_dir: Option<&Path>,
        config: &WatchConfig,
        sink: impl FnMut(WatchChange) + Send + 'static,
    ) -> Result<Self> {
        let workdir = workdir
            .canonicalize()
            .unwrap_or_else(|_| workdir.to_path_buf());
        let git_dir = git_dir
            .map(Path::to_path_buf)
            .or_else(|| resolve_git_dir(&workdir))
            .map(|dir| dir.canonicalize().unwrap_or(dir));

        let (monitor_tx, monitor_rx) = mpsc::channel::<MonitorMsg>();
        let mut watcher = notify::recommended_watcher({
            let monitor_tx = monitor_tx.clone();
            move |res| {
                let _ = monitor_tx.send(MonitorMsg::Event(res));
            }
        })
        .map_err(|e| watch_unavailable(&workdir, e))?;

        watcher
            .watch(&workdir, RecursiveMode::Recursive)
            .or_else(|_| watcher.watch(&workdir, RecursiveMode::NonRecursive))
            .map_err(|e| watch_unavailable(&workdir, e))?;

        if let Some(git_dir) = git_dir.as_deref()
            && !git_dir.starts_with(&workdir)
        {
            let _ = watcher
                .watch(git_dir, RecursiveMode::Recursive)
                .or_else(|_| watcher.watch(git_dir, RecursiveMode::NonRecursive));
        }

        let debounce = config.debounce;
        let max_delay = config.max_delay;
        let join = thread::Builder::new()
            .name("gitgate-watch".to_string())
            .spawn(move || {
                repo_monitor_thread(
                    watcher, workdir, git_dir, debounce, max_delay, monitor_rx, sink,
                )
            })
            .map_err(Error::from)?;

        Ok(Self {
            msg_tx: monitor_tx,
            join: Some(join),
        })
    }

    pub(crate) fn stop(&mut self) {
        let Some(join) = self.join.take() else {
            return;
        };
        let _ = self.msg_tx.send(MonitorMsg::Stop);
        if join.thread().id() != thread::current().id() {
            let _ = join.join();
        }
    }
}

impl Drop for RepoMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn watch_unavailable(workdir: &Path, err: notify::Error) -> Error {
    Error::new(ErrorKind::WatchUnavailable)
        .with_output(err.to_string())
        .with_args([workdir.display().to_string()])
}

#[derive(Clone)]
struct GitignoreRule {
    matcher: GlobMatcher,
    negated: bool,
    dir_self_only: bool,
}

/// Root `.gitignore` and `info/exclude` rules, good enough to drop the
/// usual build-output churn.
#[derive(Clone, Default)]
struct GitignoreRules {
    rules: Vec<GitignoreRule>,
}

impl GitignoreRules {
    fn load(workdir: &Path, git_dir: Option<&Path>) -> Self {
        let mut rules = Vec::new();
        load_gitignore_file_into(&mut rules, &workdir.join(".gitignore"));
        if let Some(git_dir) = git_dir {
            load_gitignore_file_into(&mut rules, &git_dir.join("info").join("exclude"));
        }
        Self { rules }
    }

    fn is_ignored_rel(&self, rel: &Path, is_dir_hint: Option<bool>) -> bool {
        let mut ignored = false;
        for rule in &self.rules {
            if rule.dir_self_only && is_dir_hint != Some(true) {
                continue;
            }
            if rule.matcher.is_match(rel) {
                ignored = !rule.negated;
            }
        }
        ignored
    }
}

fn load_gitignore_file_into(rules: &mut Vec<GitignoreRule>, path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (negated, pattern) = parse_gitignore_pattern(line);
        let Some(pattern) = pattern else {
            continue;
        };
        let (globs, dir_self_only_globs) = gitignore_pattern_to_globs(&pattern);
        let compiled = globs
            .into_iter()
            .map(|glob| (glob, false))
            .chain(dir_self_only_globs.into_iter().map(|glob| (glob, true)));
        for (glob, dir_self_only) in compiled {
            let Ok(glob) = Glob::new(&glob) else {
                continue;
            };
            rules.push(GitignoreRule {
                matcher: glob.compile_matcher(),
                negated,
                dir_self_only,
            });
        }
    }
}

fn parse_gitignore_pattern(line: &str) -> (bool, Option<String>) {
    if let Some(rest) = line
        .strip_prefix("\\!")
        .or_else(|| line.strip_prefix("\\#"))
    {
        return (false, Some(rest.to_string()));
    }

    let (negated, line) = match line.strip_prefix('!') {
        Some(rest) => (true, rest.trim()),
        None => (false, line),
    };
    if line.is_empty() || line == "/" {
        return (negated, None);
    }
    (negated, Some(line.to_string()))
}

/// Patterns containing `/` are anchored to the repository root; others match at
/// any depth. A trailing `/` restricts the pattern to directories.
fn gitignore_pattern_to_globs(pattern: &str) -> (Vec<String>, Vec<String>) {
    let mut out = Vec::new();
    let mut dir_self_only = Vec::new();

    let pat = pattern.trim_start_matches("./");
    let pat = pat.strip_prefix('/').unwrap_or(pat);
    let dir_only = pat.ends_with('/');
    let pat = pat.trim_end_matches('/');
    if pat.is_empty() {
        return (out, dir_self_only);
    }

    let mut bases = vec![pat.to_string()];
    if !pat.contains('/') {
        bases.push(format!("**/{pat}"));
    }

    for base in bases {
        out.push(format!("{base}/**"));
        if dir_only {
            dir_self_only.push(base);
        } else {
            out.push(base);
        }
    }

    out.sort();
    out.dedup();
    dir_self_only.sort();
    dir_self_only.dedup();
    (out, dir_self_only)
}

fn repo_monitor_thread(
    // Owned here so the OS watches live exactly as long as this loop.
    _watcher: RecommendedWatcher,
    workdir: PathBuf,
    git_dir: Option<PathBuf>,
    debounce: Duration,
    max_delay: Duration,
    monitor_rx: mpsc::Receiver<MonitorMsg>,
    mut sink: impl FnMut(WatchChange),
) {
    let mut gitignore = GitignoreRules::load(&workdir, git_dir.as_deref());
    let idle_tick = Duration::from_secs(30);
    let mut debouncer = DebouncedChange::new(debounce, max_delay);
    tracing::debug!(workdir = %workdir.display(), "watching repository");

    loop {
        let now = Instant::now();
        let timeout = debouncer.next_timeout(now).unwrap_or(idle_tick);

        match monitor_rx.recv_timeout(timeout) {
            Ok(MonitorMsg::Stop) => break,
            Ok(MonitorMsg::Event(Ok(event))) => {
                if let Some(change) =
                    classify_repo_event(&workdir, git_dir.as_deref(), &mut gitignore, &event)
                    && let Some(to_flush) = debouncer.push(change, Instant::now())
                {
                    sink(to_flush);
                }
            }
            Ok(MonitorMsg::Event(Err(err))) => {
                tracing::debug!(error = %err, "watch error, assuming everything changed");
                if let Some(to_flush) = debouncer.push(WatchChange::everything(), Instant::now()) {
                    sink(to_flush);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if let Some(to_flush) = debouncer.take_if_due(Instant::now()) {
                    sink(to_flush);
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    tracing::debug!(workdir = %workdir.display(), "stopped watching repository");
}

fn resolve_git_dir(workdir: &Path) -> Option<PathBuf> {
    let dot_git = workdir.join(".git");
    let md = fs::metadata(&dot_git).ok()?;

    if md.is_dir() {
        return Some(dot_git);
    }
    if !md.is_file() {
        return None;
    }

    let contents = fs::read_to_string(&dot_git).ok()?;
    let line = contents.lines().next()?.trim();
    let gitdir = line.strip_prefix("gitdir:")?.trim();
    if gitdir.is_empty() {
        return None;
    }

    let path = PathBuf::from(gitdir);
    if path.is_absolute() {
        Some(path)
    } else {
        Some(workdir.join(path))
    }
}

fn classify_repo_event(
    workdir: &Path,
    git_dir: Option<&Path>,
    gitignore: &mut GitignoreRules,
    event: &notify::Event,
) -> Option<WatchChange> {
    if should_ignore_event_kind(event) {
        return None;
    }

    if event.need_rescan() || event.paths.is_empty() {
        return Some(WatchChange::everything());
    }

    let is_dir_hint = path_dir_hint(event);
    let mut change: Option<WatchChange> = None;
    let mut add = |part: WatchChange| {
        change
            .get_or_insert_with(WatchChange::default)
            .merge(part)
    };

    for path in &event.paths {
        if is_gitignore_config_path(workdir, git_dir, path) {
            *gitignore = GitignoreRules::load(workdir, git_dir);
            if let Ok(rel) = path.strip_prefix(workdir) {
                add(WatchChange::workspace_path(rel_path_string(rel)));
            } else {
                add(WatchChange::areas(ChangeAreas::WORKSPACE));
            }
            continue;
        }
        if let Some(areas) = classify_git_path(workdir, git_dir, path) {
            if !areas.is_empty() {
                add(WatchChange::areas(areas));
            }
            continue;
        }
        let Ok(rel) = path.strip_prefix(workdir) else {
            continue;
        };
        if rel.as_os_str().is_empty() || gitignore.is_ignored_rel(rel, is_dir_hint) {
            continue;
        }
        add(WatchChange::workspace_path(rel_path_string(rel)));
    }

    change
}

fn rel_path_string(rel: &Path) -> String {
    normalize_repo_path(&rel.to_string_lossy())
}

/// `Some` for anything inside the git metadata directory: refs, HEAD, the
/// config (remotes) and the stash reflog map to `REFS`, the index to `INDEX`,
/// everything else (objects, other logs, locks) to no area at all.
fn classify_git_path(workdir: &Path, git_dir: Option<&Path>, path: &Path) -> Option<ChangeAreas> {
    let dot_git = workdir.join(".git");
    let rel = git_dir
        .and_then(|git_dir| path.strip_prefix(git_dir).ok())
        .or_else(|| path.strip_prefix(&dot_git).ok())?;

    let mut components = rel.components().map(|c| c.as_os_str());
    let Some(first) = components.next() else {
        // The `.git` entry itself.
        return Some(ChangeAreas::empty());
    };
    let rest = components.collect::<PathBuf>();
    let is_ref_state = first == "HEAD"
        || first == "packed-refs"
        || first == "refs"
        || (first == "config" && rest.as_os_str().is_empty())
        || (first == "logs" && rest == Path::new("refs").join("stash"));
    let areas = if is_ref_state {
        ChangeAreas::REFS
    } else if first == "index" && rest.as_os_str().is_empty() {
        ChangeAreas::INDEX
    } else {
        ChangeAreas::empty()
    };
    Some(areas)
}

fn should_ignore_event_kind(event: &notify::Event) -> bool {
    match &event.kind {
        // Reads must not cause refresh loops; a close after writing is a completed write.
        notify::EventKind::Access(AccessKind::Close(AccessMode::Write)) => false,
        notify::EventKind::Access(_) => true,
        _ => false,
    }
}

fn is_gitignore_config_path(workdir: &Path, git_dir: Option<&Path>, path: &Path) -> bool {
    if path == workdir.join(".gitignore") {
        return true;
    }
    git_dir.is_some_and(|git_dir| path == git_dir.join("info").join("exclude"))
}

fn path_dir_hint(event: &notify::Event) -> Option<bool> {
    match &event.kind {
        notify::EventKind::Create(kind) => match kind {
            notify::event::CreateKind::Folder => Some(true),
            notify::event::CreateKind::File => Some(false),
            _ => None,
        },
        notify::EventKind::Remove(kind) => match kind {
            notify::event::RemoveKind::Folder => Some(true),
            notify::event::RemoveKind::File => Some(false),
            _ => None,
        },
        _ => None,
    }
}
