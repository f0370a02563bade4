use super::GixRepo;
use gitgate_core::error::ErrorKind;
use gitgate_core::services::Result;

impl GixRepo {
    /// Reverts workspace files: modified files go back to their staged content,
    /// staged-new files are removed, untracked files are deleted.
    pub(super) fn discard_impl(&self, paths: &[&str]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }

        let mut checkout_paths = Vec::new();
        let mut remove_paths = Vec::new();
        let mut clean_paths = Vec::new();

        for &path in paths {
            if self.worktree_differs_from_index(path)? {
                checkout_paths.push(path);
            } else if self.path_exists_in_index(path)? {
                if !self.path_exists_in_head(path)? {
                    remove_paths.push(path);
                }
            } else {
                clean_paths.push(path);
            }
        }

        if !remove_paths.is_empty() {
            let mut args = vec!["rm", "-f", "-q", "--"];
            args.extend(remove_paths);
            self.git.run(&args)?;
        }
        if !clean_paths.is_empty() {
            let mut args = vec!["clean", "-fd", "-q", "--"];
            args.extend(clean_paths);
            self.git.run(&args)?;
        }
        if !checkout_paths.is_empty() {
            let mut args = vec!["checkout", "--"];
            args.extend(checkout_paths);
            self.git.run(&args)?;
        }
        Ok(())
    }

    fn worktree_differs_from_index(&self, path: &str) -> Result<bool> {
        let output = self
            .git
            .run_accepting(&["diff", "--quiet", "--", path], None, &[0, 1])?;
        Ok(output.exit_code == Some(1))
    }

    fn path_exists_in_index(&self, path: &str) -> Result<bool> {
        let output =
            self.git
                .run_accepting(&["ls-files", "--error-unmatch", "--", path], None, &[0, 1])?;
        Ok(output.exit_code == Some(0))
    }

    fn path_exists_in_head(&self, path: &str) -> Result<bool> {
        match self.git.capture(&["ls-tree", "--name-only", "HEAD", "--", path]) {
            Ok(listed) => Ok(!listed.is_empty()),
            // Unborn HEAD.
            Err(e) if matches!(e.kind(), ErrorKind::ObjectNotFound | ErrorKind::RefNotFound) => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
