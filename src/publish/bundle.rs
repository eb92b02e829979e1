// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Profile and bundle collection.
//!
//! A __profile__ is a config map that names an ordered, comma-separated
//! list of __bundles__. A bundle is a secret holding one unit of
//! configuration. Bundles labeled as _inline_ carry their payload directly
//! inside the record, and must be copied into the published tree. Every
//! other bundle is expected to already exist in the repository, so it is
//! left alone.

use crate::store::{ObjectStore, StoreError};

use tracing::{debug, instrument};

/// Label marking a config map as a profile.
pub const PROFILE_LABEL: &str = "arlon-type";

/// Value of [`PROFILE_LABEL`] for profiles.
pub const PROFILE_LABEL_VALUE: &str = "profile";

/// Data key holding a profile's bundle list.
pub const PROFILE_BUNDLES_KEY: &str = "bundles";

/// Label holding a bundle's type.
pub const BUNDLE_TYPE_LABEL: &str = "bundle-type";

/// Value of [`BUNDLE_TYPE_LABEL`] for inline bundles.
pub const INLINE_BUNDLE_TYPE: &str = "inline";

/// Data key holding an inline bundle's payload.
pub const BUNDLE_DATA_KEY: &str = "data";

/// Inline bundle together with its payload.
///
/// # Invariant
///
/// - Payload is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineBundle {
    name: String,
    payload: Vec<u8>,
}

impl InlineBundle {
    /// Construct new inline bundle.
    ///
    /// # Errors
    ///
    /// - Return [`BundleError::MissingPayload`] if payload is empty.
    pub fn new(name: impl Into<String>, payload: impl Into<Vec<u8>>) -> Result<Self> {
        let name = name.into();
        let payload = payload.into();
        if payload.is_empty() {
            return Err(BundleError::MissingPayload { name });
        }

        Ok(Self { name, payload })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// Collect every inline bundle that profile `profile_name` references.
///
/// Output follows the order bundles are declared in the profile. An empty
/// profile name means no optional bundles, which is fine. Bundles that are
/// not inline are skipped without complaint.
///
/// # Errors
///
/// - Return [`BundleError::ProfileNotFound`] if profile does not exist.
/// - Return [`BundleError::InvalidProfile`] if config map is not labeled
///   as a profile, or lists a blank bundle name.
/// - Return [`BundleError::EmptyProfile`] if profile lists no bundles.
/// - Return [`BundleError::BundleNotFound`] if any listed bundle cannot be
///   fetched. No partial result is returned.
/// - Return [`BundleError::MissingPayload`] if an inline bundle has no data.
#[instrument(skip(store), level = "debug")]
pub fn collect_inline_bundles(
    store: &impl ObjectStore,
    namespace: &str,
    profile_name: &str,
) -> Result<Vec<InlineBundle>> {
    if profile_name.is_empty() {
        debug!("no profile given, no inline bundles to collect");
        return Ok(Vec::new());
    }

    let profile = store
        .get_config_map(namespace, profile_name)
        .map_err(|err| BundleError::ProfileNotFound {
            profile: profile_name.into(),
            source: err,
        })?;

    if profile.label(PROFILE_LABEL) != Some(PROFILE_LABEL_VALUE) {
        return Err(BundleError::InvalidProfile {
            profile: profile_name.into(),
            reason: format!("missing label {PROFILE_LABEL}={PROFILE_LABEL_VALUE}"),
        });
    }

    let declared = profile.data(PROFILE_BUNDLES_KEY).unwrap_or_default();
    if declared.trim().is_empty() {
        return Err(BundleError::EmptyProfile {
            profile: profile_name.into(),
        });
    }

    let mut bundles = Vec::new();
    for bundle_name in declared.split(',').map(str::trim) {
        // INVARIANT: A blank entry is a typo in the profile, not a bundle name.
        if bundle_name.is_empty() {
            return Err(BundleError::InvalidProfile {
                profile: profile_name.into(),
                reason: format!("blank entry in bundle list {declared:?}"),
            });
        }

        let record = store
            .get_secret(namespace, bundle_name)
            .map_err(|err| BundleError::BundleNotFound {
                bundle: bundle_name.into(),
                source: err,
            })?;

        if record.label(BUNDLE_TYPE_LABEL) != Some(INLINE_BUNDLE_TYPE) {
            debug!("skip non-inline bundle {bundle_name}");
            continue;
        }

        let payload = record.data(BUNDLE_DATA_KEY).unwrap_or_default();
        bundles.push(InlineBundle::new(bundle_name, payload)?);
        debug!("adding inline bundle {bundle_name}");
    }

    Ok(bundles)
}

/// Bundle collection error types.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    /// Profile record cannot be fetched.
    #[error("failed to get profile {profile}")]
    ProfileNotFound {
        profile: String,
        #[source]
        source: StoreError,
    },

    /// Record is not a usable profile.
    #[error("invalid profile {profile}: {reason}")]
    InvalidProfile { profile: String, reason: String },

    /// Profile declares no bundles.
    #[error("profile {profile} has no bundles")]
    EmptyProfile { profile: String },

    /// Listed bundle cannot be fetched.
    #[error("failed to get bundle {bundle}")]
    BundleNotFound {
        bundle: String,
        #[source]
        source: StoreError,
    },

    /// Inline bundle carries no payload.
    #[error("inline bundle {name} has no data")]
    MissingPayload { name: String },
}

/// Friendly result alias :3
pub type Result<T, E = BundleError> = std::result::Result<T, E>;
