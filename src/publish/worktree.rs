// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Ephemeral working tree handling.
//!
//! Each publication clones the target branch into its own temporary
//! directory, writes the planned files, commits only if anything actually
//! changed, and pushes the result. The working tree is never reused. Its
//! directory is removed once the [`WorkingTree`] value is dropped, whether
//! the publication succeeded or not.

use crate::publish::{credentials::RepoCredentials, layout::PublicationPlan};

use auth_git2::GitAuthenticator;
use git2::{
    build::RepoBuilder, AutotagOption, Config, ErrorCode, FetchOptions, Oid, PushOptions,
    RemoteCallbacks, Repository, Signature,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    cell::RefCell,
    fs::write,
    path::{Path, PathBuf},
    time,
};
use tempfile::TempDir;
use tracing::{debug, info, instrument};

/// Name of the remote the working tree was cloned from.
pub const REMOTE_NAME: &str = "origin";

/// Author and committer name of publication commits.
pub const AUTHOR_NAME: &str = "gitplane";

/// Author and committer email of publication commits.
pub const AUTHOR_EMAIL: &str = "gitplane@localhost";

/// Message of publication commits.
pub const COMMIT_MESSAGE: &str = "publish cluster configuration";

/// Freshly cloned working tree of one branch.
pub struct WorkingTree {
    repository: Repository,
    url: String,
    branch: String,
    credentials: RepoCredentials,
    dir: TempDir,
}

impl WorkingTree {
    /// Clone `branch` of `url` into a new temporary directory.
    ///
    /// Only the target branch is fetched, and no tags. Transfer progress is
    /// reported through `bar`.
    ///
    /// # Errors
    ///
    /// - Return [`TreeError::TempDir`] if temporary directory cannot be made.
    /// - Return [`TreeError::CloneFailed`] if the clone fails.
    #[instrument(skip(credentials, bar), level = "debug")]
    pub fn clone_branch(
        url: &str,
        branch: &str,
        credentials: &RepoCredentials,
        bar: &ProgressBar,
    ) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("gitplane-")
            .tempdir()
            .map_err(TreeError::TempDir)?;
        info!("clone {url} at {branch} into {:?}", dir.path().display());

        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
        )
        .map_err(TreeError::ProgressStyle)?
        .progress_chars("-Cco.");
        bar.set_style(style);
        bar.set_message(url.to_string());

        let authenticator = registered_authenticator(credentials);
        let config = git_config();
        let clone_failed = |err: git2::Error| TreeError::CloneFailed {
            url: url.into(),
            branch: branch.into(),
            source: err,
        };
        let config = config.map_err(clone_failed)?;

        let mut throttle = time::Instant::now();
        let mut rc = RemoteCallbacks::new();
        rc.credentials(authenticator.credentials(&config));
        rc.transfer_progress(|progress| {
            if throttle.elapsed() > time::Duration::from_millis(10) {
                throttle = time::Instant::now();
                bar.set_length(progress.total_objects() as u64);
                bar.set_position(progress.received_objects() as u64);
            }
            true
        });

        let mut fo = FetchOptions::new();
        fo.remote_callbacks(rc);
        fo.download_tags(AutotagOption::None);

        // INVARIANT: Fetch the target branch and nothing else.
        let refspec = format!("+refs/heads/{branch}:refs/remotes/{REMOTE_NAME}/{branch}");
        let repository = RepoBuilder::new()
            .branch(branch)
            .fetch_options(fo)
            .remote_create(|repo, name, url| repo.remote_with_fetch(name, url, &refspec))
            .clone(url, dir.path())
            .map_err(clone_failed)?;

        Ok(Self {
            repository,
            url: url.into(),
            branch: branch.into(),
            credentials: credentials.clone(),
            dir,
        })
    }

    /// Root directory of the working tree.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Branch the working tree tracks.
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Commit currently at `HEAD`.
    ///
    /// # Errors
    ///
    /// - Return [`TreeError::CommitFailed`] if `HEAD` cannot be resolved.
    pub fn head(&self) -> Result<Oid> {
        Ok(self
            .repository
            .head()
            .and_then(|head| head.peel_to_commit())
            .map_err(TreeError::CommitFailed)?
            .id())
    }

    /// Write every file of `plan` into the working tree.
    ///
    /// Missing directories are created. Existing files are overwritten.
    /// Files not mentioned by the plan are left alone.
    ///
    /// # Errors
    ///
    /// - Return [`TreeError::WorkingTreeWriteFailed`] on the first file that
    ///   cannot be written. Caller must discard the working tree.
    #[instrument(skip(self, plan), level = "debug")]
    pub fn apply(&self, plan: &PublicationPlan) -> Result<()> {
        for file in plan.files() {
            let target = self.path().join(&file.path);
            if let Some(parent) = target.parent() {
                mkdirp::mkdirp(parent).map_err(|err| TreeError::WorkingTreeWriteFailed {
                    path: parent.to_path_buf(),
                    source: err,
                })?;
            }

            write(&target, &file.contents).map_err(|err| TreeError::WorkingTreeWriteFailed {
                path: target.clone(),
                source: err,
            })?;
            debug!("wrote {}", file.path);
        }

        Ok(())
    }

    /// Commit planned files if they differ from `HEAD`.
    ///
    /// Stages exactly the files of `plan`, even where the repository's own
    /// ignore rules would exclude them, and commits them on top of `HEAD`
    /// with a fixed author and message. Returns whether a commit was
    /// created.
    ///
    /// # Errors
    ///
    /// - Return [`TreeError::CommitFailed`] if staging or committing fails.
    #[instrument(skip(self, plan), level = "debug")]
    pub fn commit_changes(&self, plan: &PublicationPlan) -> Result<bool> {
        let mut index = self.repository.index().map_err(TreeError::CommitFailed)?;

        // INVARIANT: Adding by path bypasses .gitignore, so no planned file is dropped.
        for file in plan.files() {
            index
                .add_path(Path::new(&file.path))
                .map_err(TreeError::CommitFailed)?;
        }
        index.write().map_err(TreeError::CommitFailed)?;
        let tree_oid = index.write_tree().map_err(TreeError::CommitFailed)?;

        let parent = self
            .repository
            .head()
            .and_then(|head| head.peel_to_commit())
            .map_err(TreeError::CommitFailed)?;

        // INVARIANT: Never create an empty commit.
        if parent.tree_id() == tree_oid {
            debug!("planned files match HEAD");
            return Ok(false);
        }

        let tree = self
            .repository
            .find_tree(tree_oid)
            .map_err(TreeError::CommitFailed)?;
        let signature =
            Signature::now(AUTHOR_NAME, AUTHOR_EMAIL).map_err(TreeError::CommitFailed)?;
        let oid = self
            .repository
            .commit(
                Some("HEAD"),
                &signature,
                &signature,
                COMMIT_MESSAGE,
                &tree,
                &[&parent],
            )
            .map_err(TreeError::CommitFailed)?;
        info!("committed {oid}");

        Ok(true)
    }

    /// Push branch to the remote it was cloned from.
    ///
    /// Does not contact the remote at all when `changed` is false. No retry
    /// is attempted on failure.
    ///
    /// # Errors
    ///
    /// - Return [`TreeError::PushRejected`] if the remote refuses the
    ///   update because it moved since the clone.
    /// - Return [`TreeError::PushFailed`] for every other failure.
    #[instrument(skip(self, bar), level = "debug")]
    pub fn push(&self, changed: bool, bar: &ProgressBar) -> Result<()> {
        if !changed {
            return Ok(());
        }

        let push_failed = |err: git2::Error| TreeError::PushFailed {
            url: self.url.clone(),
            source: err,
        };
        let rejection: RefCell<Option<(String, String)>> = RefCell::new(None);
        let authenticator = registered_authenticator(&self.credentials);
        let config = git_config().map_err(push_failed)?;

        let mut rc = RemoteCallbacks::new();
        rc.credentials(authenticator.credentials(&config));
        rc.push_transfer_progress(|current, total, _bytes| {
            bar.set_length(total as u64);
            bar.set_position(current as u64);
        });
        rc.push_update_reference(|refname, status| {
            if let Some(status) = status {
                *rejection.borrow_mut() = Some((refname.to_string(), status.to_string()));
            }
            Ok(())
        });

        let mut opts = PushOptions::new();
        opts.remote_callbacks(rc);

        let mut remote = self
            .repository
            .find_remote(REMOTE_NAME)
            .map_err(push_failed)?;
        let refspec = format!("refs/heads/{0}:refs/heads/{0}", self.branch);
        remote
            .push(&[refspec.as_str()], Some(&mut opts))
            .map_err(|err| match err.code() {
                ErrorCode::NotFastForward => TreeError::PushRejected {
                    url: self.url.clone(),
                    refname: format!("refs/heads/{}", self.branch),
                    reason: err.message().to_string(),
                },
                _ => push_failed(err),
            })?;

        if let Some((refname, reason)) = rejection.borrow_mut().take() {
            return Err(TreeError::PushRejected {
                url: self.url.clone(),
                refname,
                reason,
            });
        }
        info!("pushed {} to {}", self.branch, self.url);

        Ok(())
    }
}

// INVARIANT: Only ever offer the registered credentials. No prompts, no helpers.
fn registered_authenticator(credentials: &RepoCredentials) -> GitAuthenticator {
    GitAuthenticator::new_empty().add_plaintext_credentials(
        "*",
        credentials.username.clone(),
        credentials.password.clone(),
    )
}

fn git_config() -> std::result::Result<Config, git2::Error> {
    Config::open_default().or_else(|_| Config::new())
}

/// Working tree error types.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// Temporary directory for the working tree cannot be created.
    #[error("failed to create temporary directory for working tree")]
    TempDir(#[source] std::io::Error),

    /// Progress bar template is invalid.
    #[error(transparent)]
    ProgressStyle(#[from] indicatif::style::TemplateError),

    /// Repository cannot be cloned.
    #[error("failed to clone {url} at branch {branch}")]
    CloneFailed {
        url: String,
        branch: String,
        #[source]
        source: git2::Error,
    },

    /// File or directory cannot be written into the working tree.
    #[error("failed to write {:?} into working tree", path.display())]
    WorkingTreeWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Changes cannot be staged or committed.
    #[error("failed to commit changes")]
    CommitFailed(#[source] git2::Error),

    /// Commit cannot be pushed.
    #[error("failed to push to {url}")]
    PushFailed {
        url: String,
        #[source]
        source: git2::Error,
    },

    /// Remote refused the update, most likely because someone else pushed
    /// first. Clone again and retry.
    #[error("push of {refname} to {url} was rejected: {reason}")]
    PushRejected {
        url: String,
        refname: String,
        reason: String,
    },
}

/// Friendly result alias :3
pub type Result<T, E = TreeError> = std::result::Result<T, E>;
