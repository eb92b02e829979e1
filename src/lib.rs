// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Publish cluster configuration into GitOps repositories.
//!
//! Gitplane assembles the desired configuration of a cluster, i.e., a fixed
//! management chart plus the inline bundles named by the cluster's profile,
//! and commits it into a git repository watched by an external
//! reconciliation controller. It also builds the __root descriptor__ that
//! binds the published tree to the cluster's sizing parameters.
//!
//! Gitplane never applies anything to a cluster itself. Reconciliation,
//! drift detection, and rollback all belong to the controller.
//!
//! # Records
//!
//! Repository credentials, profiles, bundles, and cluster specifications
//! are read through the [`store::ObjectStore`] trait. The [`store::FsStore`]
//! implementation keeps them as TOML files on disk.

pub mod config;
pub mod path;
pub mod publish;
pub mod store;

pub use publish::{DeployOutcome, DeployRequest, PublishError, Publisher, RepoCoordinates};
