use gitgate_core::change::kind_from_status_letter;
use gitgate_core::domain::{
    ChangeKind, CommitId, FileChange, Remote, RemoteBranch, StashEntry, Submodule, normalize_repo_path,
};
use std::time::{Duration, SystemTime};

pub(crate) fn unix_seconds_to_system_time_or_epoch(seconds: i64) -> SystemTime {
    if seconds >= 0 {
        SystemTime::UNIX_EPOCH + Duration::from_secs(seconds as u64)
    } else {
        SystemTime::UNIX_EPOCH
    }
}

pub(crate) fn parse_reflog_index(selector: &str) -> Option<usize> {
    let start = selector.rfind("@{")? + 2;
    let end = selector[start..].find('}')? + start;
    selector[start..end].parse::<usize>().ok()
}

/// Parses `git stash list --format=%gd%x00%gs` output.
pub(crate) fn parse_stash_list(output: &str) -> Vec<StashEntry> {
    let mut entries = Vec::new();
    for line in output.lines() {
        let Some((selector, message)) = line.split_once('\0') else {
            continue;
        };
        let Some(index) = parse_reflog_index(selector) else {
            continue;
        };
        entries.push(StashEntry {
            index,
            message: message.to_string(),
        });
    }
    entries.sort_by_key(|e| e.index);
    entries
}

/// Parses `for-each-ref --format=%(refname:strip=2)\t%(objectname) refs/remotes`.
pub(crate) fn parse_remote_branches(output: &str) -> Vec<RemoteBranch> {
    let mut branches = Vec::new();
    for line in output.lines() {
        let mut parts = line.trim().split('\t');
        let Some(full) = parts.next().filter(|s| !s.is_empty()) else {
            continue;
        };
        if full.ends_with("/HEAD") {
            continue;
        }
        let Some((remote, name)) = full.split_once('/') else {
            continue;
        };
        let target = parts.next().unwrap_or_default().trim();
        branches.push(RemoteBranch {
            remote: remote.to_string(),
            name: name.to_string(),
            target: CommitId(target.to_string()),
        });
    }
    branches.sort_by(|a, b| a.remote.cmp(&b.remote).then_with(|| a.name.cmp(&b.name)));
    branches
}

/// Parses `git config -z --get-regexp ^remote\..*\.url$` output.
pub(crate) fn parse_remote_urls(output: &str) -> Vec<Remote> {
    let mut remotes: Vec<Remote> = Vec::new();
    for record in output.split('\0') {
        let Some((key, url)) = record.split_once('\n') else {
            continue;
        };
        let Some(name) = key
            .strip_prefix("remote.")
            .and_then(|k| k.strip_suffix(".url"))
        else {
            continue;
        };
        // Only the first url of a remote is used for fetching.
        if remotes.iter().any(|r| r.name == name) {
            continue;
        }
        remotes.push(Remote {
            name: name.to_string(),
            url: Some(url.to_string()),
        });
    }
    remotes
}

/// Parses NUL separated `diff-tree -r -z --name-status -M` output.
pub(crate) fn parse_name_status_z(output: &str) -> Vec<FileChange> {
    let mut changes = Vec::new();
    let mut fields = output.split('\0').filter(|f| !f.is_empty());
    while let Some(status) = fields.next() {
        let letter = status.chars().next().unwrap_or('M');
        let kind = kind_from_status_letter(letter).unwrap_or(ChangeKind::Modified);
        let Some(first) = fields.next() else {
            break;
        };
        let change = if matches!(letter, 'R' | 'C') {
            let Some(second) = fields.next() else {
                break;
            };
            let mut change = FileChange::new(first, kind);
            change.destination = Some(normalize_repo_path(second));
            change
        } else {
            FileChange::new(first, kind)
        };
        changes.push(change);
    }
    changes
}

/// Parses `git submodule status` output.
pub(crate) fn parse_submodule_status(output: &str) -> Vec<Submodule> {
    let mut out = Vec::new();
    for raw in output.lines() {
        let line = raw.trim_end();
        if line.trim().is_empty() {
            continue;
        }
        // First column is a state marker: ' ', '-', '+' or 'U'.
        let mut chars = line.chars();
        let state = chars.next().unwrap_or(' ');
        let rest = chars.as_str().trim();
        let mut parts = rest.split_whitespace();
        let (Some(sha), Some(path)) = (parts.next(), parts.next()) else {
            continue;
        };
        out.push(Submodule {
            path: path.to_string(),
            commit: (state != '-').then(|| CommitId(sha.to_string())),
        });
    }
    out
}
