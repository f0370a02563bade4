use super::refs::missing_object_is_missing_ref;
use super::{GixRepo, backend_error};
use gitgate_core::domain::{CommitId, Tag};
use gitgate_core::services::Result;
use gix::bstr::ByteSlice as _;

impl GixRepo {
    pub(super) fn list_tags_impl(&self) -> Result<Vec<Tag>> {
        let repo = self.repo.to_thread_local();

        let refs = repo
            .references()
            .map_err(|e| backend_error("gix references", e))?;
        let iter = refs
            .tags()
            .map_err(|e| backend_error("gix tags", e))?
            .peeled()
            .map_err(|e| backend_error("gix peel refs", e))?;

        let mut tags = Vec::new();
        for reference in iter {
            let reference = reference.map_err(|e| backend_error("gix ref iter", e))?;
            tags.push(Tag {
                name: reference.name().shorten().to_str_lossy().into_owned(),
                target: CommitId(reference.id().detach().to_string()),
            });
        }

        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    /// Annotated when `message` is given, lightweight otherwise.
    pub(super) fn create_tag_impl(
        &self,
        name: &str,
        target: &str,
        message: Option<&str>,
    ) -> Result<()> {
        let mut args = vec!["-c", "tag.gpgsign=false", "tag"];
        if let Some(message) = message {
            args.extend(["-a", "-m", message]);
        }
        args.extend([name, target]);
        self.git.run(&args).map_err(missing_object_is_missing_ref)?;
        Ok(())
    }

    pub(super) fn delete_tag_impl(&self, name: &str) -> Result<()> {
        self.git.run(&["tag", "-d", name])?;
        Ok(())
    }
}
