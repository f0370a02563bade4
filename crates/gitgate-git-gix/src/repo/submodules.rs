use super::GixRepo;
use crate::util::parse_submodule_status;
use gitgate_core::domain::Submodule;
use gitgate_core::services::Result;

impl GixRepo {
    pub(super) fn list_submodules_impl(&self) -> Result<Vec<Submodule>> {
        if !self.spec.workdir.join(".gitmodules").exists() {
            return Ok(Vec::new());
        }
        match self.git.capture(&["submodule", "status"]) {
            Ok(output) => Ok(parse_submodule_status(&output)),
            // Gitlinks without a .gitmodules mapping make `submodule status` fatal;
            // the sidebar just shows nothing for them.
            Err(e)
                if e.output()
                    .is_some_and(|o| o.contains("no submodule mapping found")) =>
            {
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }
}
