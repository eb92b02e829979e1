// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Repository publication pipeline.
//!
//! A __deploy__ publishes everything one cluster needs into a git
//! repository that an external reconciliation controller watches:
//!
//! 1. Resolve transport credentials registered for the repository URL.
//! 2. Collect the inline bundles of the cluster's profile.
//! 3. Plan the cluster's management and workload trees.
//! 4. Clone the target branch into a throwaway working tree, write the plan.
//! 5. Commit only if the tree actually changed, then push.
//!
//! Any failure stops the pipeline where it stands. Nothing is pushed unless
//! every earlier step succeeded, and the throwaway working tree is removed
//! either way.
//!
//! Independently of a deploy, the [`Publisher`] can build the cluster's
//! __root descriptor__, the application object that points the controller
//! at the published management path.

pub mod artifacts;
pub mod bundle;
pub mod credentials;
pub mod layout;
pub mod root;
pub mod worktree;

use crate::{
    config::Namespaces,
    publish::{
        artifacts::{ArtifactError, ArtifactSource},
        bundle::{collect_inline_bundles, BundleError},
        credentials::{resolve_credentials, CredentialError},
        layout::{ClusterLayout, LayoutError, PublicationPlan},
        root::{build_root_application, Application, ClusterSpec},
        worktree::{TreeError, WorkingTree},
    },
    store::{ObjectStore, StoreError},
};

use git2::Oid;
use indicatif::ProgressBar;
use tracing::{info, instrument};

/// Where in which repository clusters get published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoCoordinates {
    /// Remote URL, matched exactly against registered credentials.
    pub url: String,

    /// Branch to clone and push.
    pub branch: String,

    /// Directory inside the repository holding per-cluster trees.
    pub base_path: String,
}

/// Inputs of one deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    pub cluster_name: String,
    pub repo: RepoCoordinates,

    /// Profile naming the cluster's bundles. Empty means no bundles.
    pub profile: String,
}

/// Result of a successful deploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployOutcome {
    /// Repository already matched, nothing was committed or pushed.
    Unchanged,

    /// New commit was pushed.
    Pushed { commit: Oid },
}

/// Publication pipeline over a record store and a base artifact set.
#[derive(Debug, Clone)]
pub struct Publisher<S, A>
where
    S: ObjectStore,
    A: ArtifactSource,
{
    store: S,
    artifacts: A,
    namespaces: Namespaces,
}

impl<S, A> Publisher<S, A>
where
    S: ObjectStore,
    A: ArtifactSource,
{
    pub fn new(store: S, artifacts: A, namespaces: Namespaces) -> Self {
        Self {
            store,
            artifacts,
            namespaces,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn namespaces(&self) -> &Namespaces {
        &self.namespaces
    }

    /// Publish cluster configuration into repository.
    ///
    /// Records and base artifacts are fully resolved and validated before
    /// the repository is even cloned. Clone and push progress is reported
    /// through `bar`, which is cleared once the deploy ends.
    ///
    /// # Errors
    ///
    /// - Return [`PublishError::Credential`] if no credentials are
    ///   registered for the repository URL.
    /// - Return [`PublishError::Bundle`] if the profile or one of its
    ///   bundles is missing or malformed.
    /// - Return [`PublishError::Layout`] if the cluster tree cannot be
    ///   planned.
    /// - Return [`PublishError::Artifact`] if base artifacts are unreadable.
    /// - Return [`PublishError::Tree`] if clone, write, commit, or push
    ///   fails.
    #[instrument(
        skip(self, request, bar),
        fields(cluster = %request.cluster_name),
        level = "debug"
    )]
    pub fn deploy(&self, request: &DeployRequest, bar: &ProgressBar) -> Result<DeployOutcome> {
        let outcome = self.deploy_inner(request, bar);
        bar.finish_and_clear();
        outcome
    }

    fn deploy_inner(&self, request: &DeployRequest, bar: &ProgressBar) -> Result<DeployOutcome> {
        let repo = &request.repo;
        let credentials = resolve_credentials(&self.store, &self.namespaces.controller, &repo.url)?;
        let bundles =
            collect_inline_bundles(&self.store, &self.namespaces.records, &request.profile)?;
        info!(
            "publish {} with {} inline bundles",
            request.cluster_name,
            bundles.len()
        );

        let layout = ClusterLayout::new(&repo.base_path, &request.cluster_name)?;
        let artifacts = self.artifacts.artifacts()?;
        let plan = PublicationPlan::build(&layout, &artifacts, &bundles, &repo.url)?;

        let tree = WorkingTree::clone_branch(&repo.url, &repo.branch, &credentials, bar)?;
        tree.apply(&plan)?;
        let changed = tree.commit_changes(&plan)?;
        tree.push(changed, bar)?;

        if !changed {
            info!("no changed files, skipping commit & push");
            return Ok(DeployOutcome::Unchanged);
        }

        let commit = tree.head()?;
        info!("published {} at {commit}", request.cluster_name);
        Ok(DeployOutcome::Pushed { commit })
    }

    /// Build root descriptor of `cluster_name`.
    ///
    /// Sizing parameters come from the cluster specification record named
    /// `cluster_spec`. No defaults are substituted for a missing record.
    ///
    /// # Errors
    ///
    /// - Return [`PublishError::ClusterSpecNotFound`] if the cluster
    ///   specification does not exist.
    /// - Return [`PublishError::Store`] if it cannot be read.
    /// - Return [`PublishError::Layout`] if the cluster name or base path is
    ///   unusable.
    #[instrument(skip(self, repo), level = "debug")]
    pub fn root_application(
        &self,
        cluster_name: &str,
        repo: &RepoCoordinates,
        cluster_spec: &str,
    ) -> Result<Application> {
        let record = self
            .store
            .get_config_map(&self.namespaces.records, cluster_spec)
            .map_err(|err| {
                if err.is_not_found() {
                    PublishError::ClusterSpecNotFound {
                        name: cluster_spec.into(),
                        source: err,
                    }
                } else {
                    PublishError::Store(err)
                }
            })?;

        let layout = ClusterLayout::new(&repo.base_path, cluster_name)?;
        Ok(build_root_application(
            &layout,
            &repo.url,
            &repo.branch,
            &self.namespaces.controller,
            &ClusterSpec::from(record),
        ))
    }
}

/// Flat classification of every way a publication can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishErrorKind {
    CredentialNotFound,
    ProfileNotFound,
    InvalidProfile,
    EmptyProfile,
    BundleNotFound,
    MissingPayload,
    InvalidName,
    ArtifactCollision,
    Artifact,
    CloneFailed,
    WorkingTreeWriteFailed,
    CommitFailed,
    PushFailed,
    PushRejected,
    ClusterSpecNotFound,
    Store,
}

/// Publication error types.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    /// Cluster specification record does not exist.
    #[error("cluster specification {name} not found")]
    ClusterSpecNotFound {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PublishError {
    /// Classify error.
    pub fn kind(&self) -> PublishErrorKind {
        match self {
            Self::Credential(CredentialError::NotFound { .. }) => {
                PublishErrorKind::CredentialNotFound
            }
            Self::Credential(CredentialError::Store(_)) => PublishErrorKind::Store,
            Self::Bundle(err) => match err {
                BundleError::ProfileNotFound { .. } => PublishErrorKind::ProfileNotFound,
                BundleError::InvalidProfile { .. } => PublishErrorKind::InvalidProfile,
                BundleError::EmptyProfile { .. } => PublishErrorKind::EmptyProfile,
                BundleError::BundleNotFound { .. } => PublishErrorKind::BundleNotFound,
                BundleError::MissingPayload { .. } => PublishErrorKind::MissingPayload,
            },
            Self::Layout(err) => match err {
                LayoutError::InvalidName { .. } | LayoutError::InvalidBasePath(_) => {
                    PublishErrorKind::InvalidName
                }
                LayoutError::Collision(_) => PublishErrorKind::ArtifactCollision,
                LayoutError::Render(_) => PublishErrorKind::WorkingTreeWriteFailed,
            },
            Self::Artifact(_) => PublishErrorKind::Artifact,
            Self::Tree(err) => match err {
                TreeError::TempDir(_)
                | TreeError::ProgressStyle(_)
                | TreeError::CloneFailed { .. } => PublishErrorKind::CloneFailed,
                TreeError::WorkingTreeWriteFailed { .. } => {
                    PublishErrorKind::WorkingTreeWriteFailed
                }
                TreeError::CommitFailed(_) => PublishErrorKind::CommitFailed,
                TreeError::PushFailed { .. } => PublishErrorKind::PushFailed,
                TreeError::PushRejected { .. } => PublishErrorKind::PushRejected,
            },
            Self::ClusterSpecNotFound { .. } => PublishErrorKind::ClusterSpecNotFound,
            Self::Store(_) => PublishErrorKind::Store,
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = PublishError> = std::result::Result<T, E>;
