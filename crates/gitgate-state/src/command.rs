use crate::model::ChangeAreas;
use gitgate_core::diff::Patch;
use gitgate_core::services::{GitRepository, PatchTarget, Result};

/// Every mutation the gateway serializes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RepoCommand {
    Commit {
        message: String,
        amend: bool,
    },
    Checkout {
        branch: String,
    },
    StagePatch(Patch),
    UnstagePatch(Patch),
    /// Reverts a worktree hunk.
    DiscardPatch(Patch),
    StageFiles {
        paths: Vec<String>,
    },
    UnstageFiles {
        paths: Vec<String>,
    },
    DiscardFiles {
        paths: Vec<String>,
    },
    SaveStash {
        message: Option<String>,
        include_untracked: bool,
    },
    PopStash {
        index: usize,
    },
    ApplyStash {
        index: usize,
    },
    DropStash {
        index: usize,
    },
    AddRemote {
        name: String,
        url: String,
    },
    DeleteRemote {
        name: String,
    },
    RenameRemote {
        old: String,
        new: String,
    },
    CreateBranch {
        name: String,
        start_point: String,
    },
    DeleteBranch {
        name: String,
    },
    RenameBranch {
        old: String,
        new: String,
    },
    CreateTag {
        name: String,
        target: String,
        message: Option<String>,
    },
    DeleteTag {
        name: String,
    },
}

impl RepoCommand {
    /// Name stamped on errors and log lines.
    pub fn operation(&self) -> &'static str {
        match self {
            RepoCommand::Commit { amend: false, .. } => "commit",
            RepoCommand::Commit { amend: true, .. } => "amend commit",
            RepoCommand::Checkout { .. } => "checkout",
            RepoCommand::StagePatch(_) => "stage patch",
            RepoCommand::UnstagePatch(_) => "unstage patch",
            RepoCommand::DiscardPatch(_) => "discard patch",
            RepoCommand::StageFiles { .. } => "stage files",
            RepoCommand::UnstageFiles { .. } => "unstage files",
            RepoCommand::DiscardFiles { .. } => "discard files",
            RepoCommand::SaveStash { .. } => "save stash",
            RepoCommand::PopStash { .. } => "pop stash",
            RepoCommand::ApplyStash { .. } => "apply stash",
            RepoCommand::DropStash { .. } => "drop stash",
            RepoCommand::AddRemote { .. } => "add remote",
            RepoCommand::DeleteRemote { .. } => "delete remote",
            RepoCommand::RenameRemote { .. } => "rename remote",
            RepoCommand::CreateBranch { .. } => "create branch",
            RepoCommand::DeleteBranch { .. } => "delete branch",
            RepoCommand::RenameBranch { .. } => "rename branch",
            RepoCommand::CreateTag { .. } => "create tag",
            RepoCommand::DeleteTag { .. } => "delete tag",
        }
    }

    /// What a successful run may have changed.
    pub fn areas(&self) -> ChangeAreas {
        match self {
            RepoCommand::Commit { .. } => ChangeAreas::INDEX | ChangeAreas::REFS | ChangeAreas::HEAD,
            RepoCommand::Checkout { .. } => ChangeAreas::all(),
            RepoCommand::StagePatch(_)
            | RepoCommand::UnstagePatch(_)
            | RepoCommand::StageFiles { .. }
            | RepoCommand::UnstageFiles { .. } => ChangeAreas::INDEX,
            RepoCommand::DiscardPatch(_) => ChangeAreas::WORKSPACE,
            RepoCommand::DiscardFiles { .. } => ChangeAreas::INDEX | ChangeAreas::WORKSPACE,
            RepoCommand::SaveStash { .. } | RepoCommand::PopStash { .. } => {
                ChangeAreas::INDEX | ChangeAreas::REFS | ChangeAreas::WORKSPACE
            }
            RepoCommand::ApplyStash { .. } => ChangeAreas::INDEX | ChangeAreas::WORKSPACE,
            RepoCommand::DropStash { .. }
            | RepoCommand::AddRemote { .. }
            | RepoCommand::DeleteRemote { .. }
            | RepoCommand::RenameRemote { .. }
            | RepoCommand::CreateBranch { .. }
            | RepoCommand::DeleteBranch { .. }
            | RepoCommand::CreateTag { .. }
            | RepoCommand::DeleteTag { .. } => ChangeAreas::REFS,
            // Renaming the checked-out branch moves HEAD's symbolic target.
            RepoCommand::RenameBranch { .. } => ChangeAreas::REFS | ChangeAreas::HEAD,
        }
    }

    /// Workspace paths the command names. Empty when it may touch any path.
    pub fn workspace_paths(&self) -> Vec<String> {
        match self {
            RepoCommand::DiscardPatch(patch) => vec![patch.path.clone()],
            RepoCommand::DiscardFiles { paths } => paths.clone(),
            _ => Vec::new(),
        }
    }

    pub(crate) fn apply(&self, repo: &dyn GitRepository) -> Result<()> {
        match self {
            RepoCommand::Commit { message, amend } => repo.commit(message, *amend),
            RepoCommand::Checkout { branch } => repo.checkout_branch(branch),
            RepoCommand::StagePatch(patch) => repo.apply_patch(patch, PatchTarget::Index, false),
            RepoCommand::UnstagePatch(patch) => repo.apply_patch(patch, PatchTarget::Index, true),
            RepoCommand::DiscardPatch(patch) => {
                repo.apply_patch(patch, PatchTarget::Worktree, true)
            }
            RepoCommand::StageFiles { paths } => repo.stage(&as_strs(paths)),
            RepoCommand::UnstageFiles { paths } => repo.unstage(&as_strs(paths)),
            RepoCommand::DiscardFiles { paths } => repo.discard(&as_strs(paths)),
            RepoCommand::SaveStash {
                message,
                include_untracked,
            } => repo.stash_save(message.as_deref(), *include_untracked),
            RepoCommand::PopStash { index } => repo.stash_pop(*index),
            RepoCommand::ApplyStash { index } => repo.stash_apply(*index),
            RepoCommand::DropStash { index } => repo.stash_drop(*index),
            RepoCommand::AddRemote { name, url } => repo.add_remote(name, url),
            RepoCommand::DeleteRemote { name } => repo.delete_remote(name),
            RepoCommand::RenameRemote { old, new } => repo.rename_remote(old, new),
            RepoCommand::CreateBranch { name, start_point } => {
                repo.create_branch(name, start_point)
            }
            RepoCommand::DeleteBranch { name } => repo.delete_branch(name),
            RepoCommand::RenameBranch { old, new } => repo.rename_branch(old, new),
            RepoCommand::CreateTag {
                name,
                target,
                message,
            } => repo.create_tag(name, target, message.as_deref()),
            RepoCommand::DeleteTag { name } => repo.delete_tag(name),
        }
    }
}

fn as_strs(paths: &[String]) -> Vec<&str> {
    paths.iter().map(String::as_str).collect()
}
