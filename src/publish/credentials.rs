// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Repository credential resolution.
//!
//! The reconciliation controller already keeps a list of registered
//! repositories together with the credentials needed to reach them. We
//! reuse those records instead of asking the user again.

use crate::store::{LabelSelector, ObjectStore, Record};

use std::fmt::{Debug, Formatter, Result as FmtResult};
use tracing::{debug, instrument};

/// Label marking a secret as a registered repository.
pub const REPOSITORY_LABEL: &str = "argocd.argoproj.io/secret-type";

/// Value of [`REPOSITORY_LABEL`] for repository secrets.
pub const REPOSITORY_LABEL_VALUE: &str = "repository";

/// Transport credentials of a registered repository.
#[derive(Clone, PartialEq, Eq)]
pub struct RepoCredentials {
    pub url: String,
    pub username: String,
    pub password: String,
}

impl RepoCredentials {
    fn from_record(record: &Record) -> Option<Self> {
        Some(Self {
            url: record.data("url")?.to_string(),
            username: record.data("username").unwrap_or_default().to_string(),
            password: record.data("password").unwrap_or_default().to_string(),
        })
    }
}

impl Debug for RepoCredentials {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.debug_struct("RepoCredentials")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Find credentials registered for exactly `url`.
///
/// Lists every repository secret in `namespace` and returns the first one
/// whose URL is byte-for-byte equal to `url`. No normalization happens, so
/// a trailing slash or different letter case is a different repository.
///
/// # Errors
///
/// - Return [`CredentialError::NotFound`] if no registered repository matches.
/// - Return [`CredentialError::Store`] if listing fails.
#[instrument(skip(store), level = "debug")]
pub fn resolve_credentials(
    store: &impl ObjectStore,
    namespace: &str,
    url: &str,
) -> Result<RepoCredentials> {
    let selector = LabelSelector::new().with_equal(REPOSITORY_LABEL, REPOSITORY_LABEL_VALUE);
    let records = store.list_secrets(namespace, &selector)?;
    debug!("found {} registered repositories", records.len());

    records
        .iter()
        .filter_map(RepoCredentials::from_record)
        .find(|creds| creds.url == url)
        .ok_or_else(|| CredentialError::NotFound { url: url.into() })
}

/// Credential resolution error types.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// No registered repository has this URL.
    #[error("did not find registered repository matching {url} (did you register it?)")]
    NotFound { url: String },

    /// Repository records cannot be listed.
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
}

/// Friendly result alias :3
pub type Result<T, E = CredentialError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    fn repository(name: &str, url: &str, username: &str) -> Record {
        Record::new(name)
            .with_label(REPOSITORY_LABEL, REPOSITORY_LABEL_VALUE)
            .with_data("url", url)
            .with_data("username", username)
            .with_data("password", "hunter2")
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_secret(
            "argocd",
            repository("a", "https://git.example.com/fleet.git", "alice"),
        );
        store.insert_secret(
            "argocd",
            repository("b", "https://git.example.com/other.git", "bob"),
        );
        store.insert_secret(
            "argocd",
            repository("c", "https://git.example.com/fleet.git", "carol"),
        );
        store.insert_secret(
            "argocd",
            Record::new("unlabeled").with_data("url", "https://git.example.com/secret.git"),
        );
        store
    }

    #[test]
    fn first_exact_match_wins() -> anyhow::Result<()> {
        let result = resolve_credentials(&store(), "argocd", "https://git.example.com/fleet.git")?;
        let expect = RepoCredentials {
            url: "https://git.example.com/fleet.git".into(),
            username: "alice".into(),
            password: "hunter2".into(),
        };
        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn trailing_slash_does_not_match() {
        let result = resolve_credentials(&store(), "argocd", "https://git.example.com/fleet.git/");
        assert!(matches!(result, Err(CredentialError::NotFound { .. })));
    }

    #[test]
    fn match_is_case_sensitive() {
        let result = resolve_credentials(&store(), "argocd", "https://git.example.com/Fleet.git");
        assert!(matches!(result, Err(CredentialError::NotFound { .. })));
    }

    #[test]
    fn unlabeled_secrets_are_ignored() {
        let result = resolve_credentials(&store(), "argocd", "https://git.example.com/secret.git");
        assert!(matches!(result, Err(CredentialError::NotFound { .. })));
    }

    #[test]
    fn password_is_redacted_in_debug() {
        let creds = RepoCredentials {
            url: "u".into(),
            username: "alice".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{creds:?}").contains("hunter2"));
    }
}
