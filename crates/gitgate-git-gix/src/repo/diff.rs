use super::{GixRepo, backend_error};
use crate::util::parse_name_status_z;
use gitgate_core::domain::{CommitId, DiffTarget, FileChange};
use gitgate_core::error::{Error, ErrorKind};
use gitgate_core::services::Result;

/// Object id of the empty tree, the parent side for root commits.
const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

impl GixRepo {
    pub(super) fn diff_unified_impl(&self, target: &DiffTarget) -> Result<String> {
        match target {
            DiffTarget::Commit {
                path,
                commit,
                parent,
            } => {
                let parent = parent.as_ref().map_or(EMPTY_TREE, |p| p.as_ref());
                self.git.capture(&[
                    "--no-pager",
                    "diff",
                    "--no-ext-diff",
                    "-M",
                    parent,
                    commit.as_ref(),
                    "--",
                    path,
                ])
            }
            DiffTarget::Staged { path } => {
                self.git
                    .capture(&["--no-pager", "diff", "--no-ext-diff", "--cached", "--", path])
            }
            DiffTarget::Unstaged { path } => {
                let diff = self
                    .git
                    .capture(&["--no-pager", "diff", "--no-ext-diff", "--", path])?;
                if !diff.is_empty() || self.is_tracked(path)? {
                    return Ok(diff);
                }
                if !self.spec.workdir.join(path).exists() {
                    return Ok(String::new());
                }
                // Untracked: show the whole file as added.
                let output = self.git.run_accepting(
                    &[
                        "--no-pager",
                        "diff",
                        "--no-ext-diff",
                        "--no-index",
                        "--",
                        "/dev/null",
                        path,
                    ],
                    None,
                    &[0, 1],
                )?;
                Ok(output.stdout)
            }
        }
    }

    fn is_tracked(&self, path: &str) -> Result<bool> {
        let listed = self.git.capture(&["ls-files", "-z", "--", path])?;
        Ok(!listed.is_empty())
    }

    pub(super) fn changes_for_commit_impl(
        &self,
        commit: &CommitId,
        parent: Option<&CommitId>,
    ) -> Result<Vec<FileChange>> {
        let parent = parent.map_or(EMPTY_TREE, |p| p.as_ref());
        let output = self.git.capture(&[
            "diff-tree",
            "-r",
            "-z",
            "--no-commit-id",
            "--name-status",
            "-M",
            parent,
            commit.as_ref(),
        ])?;
        let mut changes = parse_name_status_z(&output);
        changes.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(changes)
    }

    pub(super) fn contents_of_file_impl(&self, path: &str, commit: &CommitId) -> Result<Vec<u8>> {
        let not_found = || {
            Error::new(ErrorKind::ObjectNotFound)
                .with_operation("contents_of_file")
                .with_args([path.to_string(), commit.0.clone()])
        };

        let repo = self.repo.to_thread_local();
        let spec = format!("{commit}:{path}");
        let id = repo
            .rev_parse_single(spec.as_str())
            .map_err(|e| not_found().with_output(e.to_string()))?;
        let object = id
            .object()
            .map_err(|e| backend_error("gix find object", e))?;
        if object.kind != gix::object::Kind::Blob {
            return Err(not_found().with_output(format!("{path} is not a file")));
        }
        Ok(object.detach().data)
    }

    pub(super) fn contents_of_staged_file_impl(&self, path: &str) -> Result<Vec<u8>> {
        let spec = format!(":{path}");
        self.git.capture_bytes(&["cat-file", "blob", &spec])
    }
}
