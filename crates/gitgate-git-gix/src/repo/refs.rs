use super::{GixRepo, backend_error};
use gitgate_core::domain::{Branch, CommitId, HeadState};
use gitgate_core::error::{Error, ErrorKind};
use gitgate_core::services::Result;
use gix::bstr::ByteSlice as _;

impl GixRepo {
    pub(super) fn head_impl(&self) -> Result<HeadState> {
        let repo = self.repo.to_thread_local();
        let head = repo.head().map_err(|e| backend_error("gix head", e))?;

        let reference = head
            .referent_name()
            .map(|name| name.as_bstr().to_str_lossy().into_owned());
        let branch = head
            .referent_name()
            .map(|name| name.shorten().to_str_lossy().into_owned());
        let commit = head.id().map(|id| CommitId(id.detach().to_string()));

        Ok(HeadState {
            reference,
            branch,
            commit,
        })
    }

    pub(super) fn sha_for_ref_impl(&self, reference: &str) -> Option<CommitId> {
        let repo = self.repo.to_thread_local();
        let spec = format!("{reference}^{{commit}}");
        repo.rev_parse_single(spec.as_str())
            .ok()
            .map(|id| CommitId(id.detach().to_string()))
    }

    pub(super) fn list_branches_impl(&self) -> Result<Vec<Branch>> {
        let repo = self.repo.to_thread_local();
        let head_ref = repo
            .head_name()
            .map_err(|e| backend_error("gix head_name", e))?;

        let refs = repo
            .references()
            .map_err(|e| backend_error("gix references", e))?;
        let iter = refs
            .local_branches()
            .map_err(|e| backend_error("gix local_branches", e))?
            .peeled()
            .map_err(|e| backend_error("gix peel refs", e))?;

        let mut branches = Vec::new();
        for reference in iter {
            let reference = reference.map_err(|e| backend_error("gix ref iter", e))?;
            let is_head = head_ref
                .as_ref()
                .is_some_and(|head| head.as_bstr() == reference.name().as_bstr());
            branches.push(Branch {
                name: reference.name().shorten().to_str_lossy().into_owned(),
                target: CommitId(reference.id().detach().to_string()),
                is_head,
            });
        }

        branches.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(branches)
    }

    pub(super) fn checkout_branch_impl(&self, name: &str) -> Result<()> {
        self.git.run(&["checkout", name, "--"])?;
        Ok(())
    }

    pub(super) fn create_branch_impl(&self, name: &str, start_point: &str) -> Result<()> {
        self.git
            .run(&["branch", name, start_point])
            .map_err(missing_object_is_missing_ref)?;
        Ok(())
    }

    pub(super) fn delete_branch_impl(&self, name: &str) -> Result<()> {
        self.git.run(&["branch", "-D", name])?;
        Ok(())
    }

    pub(super) fn rename_branch_impl(&self, old: &str, new: &str) -> Result<()> {
        self.git.run(&["branch", "-m", old, new])?;
        Ok(())
    }
}

/// A start point or target that does not resolve names a ref, not a blob.
pub(super) fn missing_object_is_missing_ref(err: Error) -> Error {
    if *err.kind() == ErrorKind::ObjectNotFound {
        err.with_kind(ErrorKind::RefNotFound)
    } else {
        err
    }
}
