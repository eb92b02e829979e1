// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Record store lookup.
//!
//! Gitplane never owns the records it publishes from. Repository
//! credentials, profiles, bundles, and cluster specifications are owned
//! by some external store that exposes two kinds of named, labeled
//! records: __secrets__ and __config maps__. Everything gitplane needs from
//! that store is captured by the [`ObjectStore`] trait.
//!
//! # Record Store Layout
//!
//! [`FsStore`] keeps one TOML file per record on disk:
//!
//! ```text
//! <root>/<namespace>/secrets/<name>.toml
//! <root>/<namespace>/configmaps/<name>.toml
//! ```
//!
//! Each file holds a `[labels]` table and a `[data]` table of string
//! values. The name of a record is the file stem.

use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{read_dir, read_to_string, remove_file},
    path::{Path, PathBuf},
    str::FromStr,
    sync::RwLock,
};
use tracing::{debug, instrument, warn};

/// A named, labeled record.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Record {
    /// Name of the record, unique per kind and namespace.
    #[serde(skip)]
    pub name: String,

    /// Labels attached to the record.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Data entries of the record.
    ///
    /// Values are UTF-8 text, so bundle payloads must be textual manifests
    /// rather than arbitrary bytes.
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Record {
    /// Construct new record without labels or data.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Attach a label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Attach a data entry.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Value of label `key`, if any.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// Value of data entry `key`, if any.
    pub fn data(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }
}

/// The two kinds of records a store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Secret,
    ConfigMap,
}

impl RecordKind {
    fn dir_name(self) -> &'static str {
        match self {
            Self::Secret => "secrets",
            Self::ConfigMap => "configmaps",
        }
    }
}

impl Display for RecordKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Secret => fmt.write_str("secret"),
            Self::ConfigMap => fmt.write_str("configmap"),
        }
    }
}

/// Label requirements to filter records by.
///
/// Parsed from the familiar `key=value,other` syntax. A requirement
/// without `=` only demands that the label exists.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<(String, Option<String>)>,
}

impl LabelSelector {
    /// Construct selector that matches everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require label `key` to equal `value`.
    pub fn with_equal(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.requirements.push((key.into(), Some(value.into())));
        self
    }

    /// Require label `key` to exist.
    pub fn with_exists(mut self, key: impl Into<String>) -> Self {
        self.requirements.push((key.into(), None));
        self
    }

    /// Check if record satisfies every requirement.
    pub fn matches(&self, record: &Record) -> bool {
        self.requirements
            .iter()
            .all(|(key, value)| match (record.label(key), value) {
                (Some(found), Some(expect)) => found == expect,
                (Some(_), None) => true,
                (None, _) => false,
            })
    }
}

impl FromStr for LabelSelector {
    type Err = StoreError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut selector = Self::new();
        for requirement in data.split(',').map(str::trim).filter(|req| !req.is_empty()) {
            selector = match requirement.split_once('=') {
                Some((key, value)) => {
                    let key = key.trim();
                    if key.is_empty() {
                        return Err(StoreError::Selector(data.into()));
                    }
                    selector.with_equal(key, value.trim())
                }
                None => selector.with_exists(requirement),
            };
        }

        Ok(selector)
    }
}

impl Display for LabelSelector {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let rendered = self
            .requirements
            .iter()
            .map(|(key, value)| match value {
                Some(value) => format!("{key}={value}"),
                None => key.clone(),
            })
            .collect::<Vec<_>>();
        fmt.write_str(&rendered.join(","))
    }
}

/// Secret and config map lookup.
pub trait ObjectStore: Send + Sync {
    /// List secrets in namespace that satisfy selector, sorted by name.
    fn list_secrets(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<Record>>;

    /// Get secret by name.
    fn get_secret(&self, namespace: &str, name: &str) -> Result<Record>;

    /// Get config map by name.
    fn get_config_map(&self, namespace: &str, name: &str) -> Result<Record>;

    /// Delete secret by name.
    fn delete_secret(&self, namespace: &str, name: &str) -> Result<()>;
}

impl<S> ObjectStore for &S
where
    S: ObjectStore + ?Sized,
{
    fn list_secrets(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<Record>> {
        (**self).list_secrets(namespace, selector)
    }

    fn get_secret(&self, namespace: &str, name: &str) -> Result<Record> {
        (**self).get_secret(namespace, name)
    }

    fn get_config_map(&self, namespace: &str, name: &str) -> Result<Record> {
        (**self).get_config_map(namespace, name)
    }

    fn delete_secret(&self, namespace: &str, name: &str) -> Result<()> {
        (**self).delete_secret(namespace, name)
    }
}

/// Record store kept as TOML files on disk.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Open record store rooted at `root`.
    ///
    /// Does not require the root to exist. A missing namespace simply
    /// holds no records.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn kind_dir(&self, namespace: &str, kind: RecordKind) -> PathBuf {
        self.root.join(namespace).join(kind.dir_name())
    }

    fn record_path(&self, namespace: &str, kind: RecordKind, name: &str) -> PathBuf {
        self.kind_dir(namespace, kind).join(format!("{name}.toml"))
    }

    fn read_record(&self, path: &Path, name: &str) -> Result<Record> {
        let content = read_to_string(path).map_err(|err| StoreError::Read {
            source: err,
            path: path.to_path_buf(),
        })?;
        let mut record: Record = toml::de::from_str(&content).map_err(|err| StoreError::Parse {
            source: err,
            path: path.to_path_buf(),
        })?;
        record.name = name.into();

        Ok(record)
    }

    fn get(&self, namespace: &str, kind: RecordKind, name: &str) -> Result<Record> {
        let path = self.record_path(namespace, kind, name);
        if !is_valid_record_name(name) || !path.is_file() {
            return Err(StoreError::NotFound {
                kind,
                namespace: namespace.into(),
                name: name.into(),
            });
        }

        self.read_record(&path, name)
    }
}

impl ObjectStore for FsStore {
    #[instrument(skip(self), level = "debug")]
    fn list_secrets(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<Record>> {
        let dir = self.kind_dir(namespace, RecordKind::Secret);
        if !dir.is_dir() {
            debug!("no secrets in namespace {namespace}");
            return Ok(Vec::new());
        }

        let entries = read_dir(&dir).map_err(|err| StoreError::Read {
            source: err,
            path: dir.clone(),
        })?;

        let mut records = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|err| StoreError::Read {
                    source: err,
                    path: dir.clone(),
                })?
                .path();
            if path.extension().is_none_or(|ext| ext != "toml") {
                continue;
            }

            let Some(name) = path.file_stem().map(|stem| stem.to_string_lossy().into_owned())
            else {
                continue;
            };
            // INVARIANT: One broken record must not hide every other one.
            let record = match self.read_record(&path, &name) {
                Ok(record) => record,
                Err(err @ StoreError::Parse { .. }) => {
                    warn!("skip unparseable secret {namespace}/{name}: {err}");
                    continue;
                }
                Err(err) => return Err(err),
            };
            if selector.matches(&record) {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(records)
    }

    fn get_secret(&self, namespace: &str, name: &str) -> Result<Record> {
        self.get(namespace, RecordKind::Secret, name)
    }

    fn get_config_map(&self, namespace: &str, name: &str) -> Result<Record> {
        self.get(namespace, RecordKind::ConfigMap, name)
    }

    #[instrument(skip(self), level = "debug")]
    fn delete_secret(&self, namespace: &str, name: &str) -> Result<()> {
        let path = self.record_path(namespace, RecordKind::Secret, name);
        if !is_valid_record_name(name) || !path.is_file() {
            return Err(StoreError::NotFound {
                kind: RecordKind::Secret,
                namespace: namespace.into(),
                name: name.into(),
            });
        }

        remove_file(&path).map_err(|err| StoreError::Write { source: err, path })
    }
}

/// Record store kept in memory.
///
/// Iteration order of stored records is arbitrary.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<(RecordKind, String, String), Record>>,
}

impl MemoryStore {
    /// Construct new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a secret.
    pub fn insert_secret(&self, namespace: impl Into<String>, record: Record) {
        self.insert(RecordKind::Secret, namespace.into(), record);
    }

    /// Insert or replace a config map.
    pub fn insert_config_map(&self, namespace: impl Into<String>, record: Record) {
        self.insert(RecordKind::ConfigMap, namespace.into(), record);
    }

    fn insert(&self, kind: RecordKind, namespace: String, record: Record) {
        let mut records = self
            .records
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        records.insert((kind, namespace, record.name.clone()), record);
    }

    fn get(&self, namespace: &str, kind: RecordKind, name: &str) -> Result<Record> {
        let records = self
            .records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        records
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind,
                namespace: namespace.into(),
                name: name.into(),
            })
    }
}

impl ObjectStore for MemoryStore {
    fn list_secrets(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<Record>> {
        let records = self
            .records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut found = records
            .iter()
            .filter(|((kind, ns, _), record)| {
                *kind == RecordKind::Secret && ns == namespace && selector.matches(record)
            })
            .map(|(_, record)| record.clone())
            .collect::<Vec<_>>();
        found.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(found)
    }

    fn get_secret(&self, namespace: &str, name: &str) -> Result<Record> {
        self.get(namespace, RecordKind::Secret, name)
    }

    fn get_config_map(&self, namespace: &str, name: &str) -> Result<Record> {
        self.get(namespace, RecordKind::ConfigMap, name)
    }

    fn delete_secret(&self, namespace: &str, name: &str) -> Result<()> {
        let mut records = self
            .records
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        records
            .remove(&(RecordKind::Secret, namespace.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                kind: RecordKind::Secret,
                namespace: namespace.into(),
                name: name.into(),
            })
    }
}

// INVARIANT: Record names never escape their kind directory.
fn is_valid_record_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// Record store error types.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Requested record does not exist.
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: RecordKind,
        namespace: String,
        name: String,
    },

    /// Record file or directory cannot be read.
    #[error("failed to read record store at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Record file cannot be parsed.
    #[error("failed to parse record at {:?}", path.display())]
    Parse {
        #[source]
        source: toml::de::Error,
        path: PathBuf,
    },

    /// Record file cannot be written or removed.
    #[error("failed to modify record at {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Label selector syntax is invalid.
    #[error("invalid label selector {0:?}")]
    Selector(String),
}

impl StoreError {
    /// Check if error means the record simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Friendly result alias :3
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;
    use std::fs::{create_dir_all, write};

    #[test_case("bundle-type=inline", &[("bundle-type", "inline")], true; "equality match")]
    #[test_case("bundle-type=inline", &[("bundle-type", "external")], false; "equality mismatch")]
    #[test_case("bundle-type", &[("bundle-type", "external")], true; "existence match")]
    #[test_case("bundle-type", &[("arlon-type", "profile")], false; "existence mismatch")]
    #[test_case("a=1, b", &[("a", "1"), ("b", "2")], true; "combined")]
    #[test_case("", &[], true; "empty selector")]
    #[test]
    fn label_selector_matches(selector: &str, labels: &[(&str, &str)], expect: bool) {
        let selector: LabelSelector = selector.parse().unwrap();
        let record = labels
            .iter()
            .fold(Record::new("x"), |record, (key, value)| record.with_label(*key, *value));
        pretty_assertions::assert_eq!(selector.matches(&record), expect);
    }

    #[test]
    fn label_selector_rejects_empty_key() {
        assert!("=inline".parse::<LabelSelector>().is_err());
    }

    #[test]
    fn label_selector_display() {
        let selector = LabelSelector::new()
            .with_equal("argocd.argoproj.io/secret-type", "repository")
            .with_exists("team");
        assert_eq!(
            selector.to_string(),
            "argocd.argoproj.io/secret-type=repository,team"
        );
    }

    #[test]
    fn fs_store_reads_records() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let secrets = root.path().join("argocd").join("secrets");
        create_dir_all(&secrets)?;
        write(
            secrets.join("repo-b.toml"),
            indoc! {r#"
                [labels]
                "argocd.argoproj.io/secret-type" = "repository"

                [data]
                url = "https://git.example.com/b.git"
            "#},
        )?;
        write(
            secrets.join("repo-a.toml"),
            indoc! {r#"
                [labels]
                "argocd.argoproj.io/secret-type" = "repository"

                [data]
                url = "https://git.example.com/a.git"
            "#},
        )?;
        write(secrets.join("other.toml"), "[data]\nfoo = \"bar\"\n")?;
        write(secrets.join("README.md"), "not a record")?;

        let store = FsStore::open(root.path());
        let selector: LabelSelector = "argocd.argoproj.io/secret-type=repository".parse()?;
        let result = store
            .list_secrets("argocd", &selector)?
            .into_iter()
            .map(|record| record.name)
            .collect::<Vec<_>>();
        assert_eq!(result, vec!["repo-a".to_string(), "repo-b".to_string()]);

        let record = store.get_secret("argocd", "other")?;
        assert_eq!(record.data("foo"), Some("bar"));
        assert!(store.list_secrets("nowhere", &selector)?.is_empty());

        Ok(())
    }

    #[test]
    fn fs_store_listing_skips_broken_records() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let secrets = root.path().join("argocd").join("secrets");
        create_dir_all(&secrets)?;
        write(
            secrets.join("fleet.toml"),
            indoc! {r#"
                [labels]
                "argocd.argoproj.io/secret-type" = "repository"

                [data]
                url = "https://git.example.com/fleet.git"
            "#},
        )?;
        write(secrets.join("broken.toml"), "[labels\nnot = toml")?;

        let store = FsStore::open(root.path());
        let selector: LabelSelector = "argocd.argoproj.io/secret-type=repository".parse()?;
        let result = store
            .list_secrets("argocd", &selector)?
            .into_iter()
            .map(|record| record.name)
            .collect::<Vec<_>>();
        assert_eq!(result, vec!["fleet".to_string()]);
        assert!(matches!(
            store.get_secret("argocd", "broken"),
            Err(StoreError::Parse { .. })
        ));

        Ok(())
    }

    #[test]
    fn fs_store_missing_records() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let store = FsStore::open(root.path());

        assert!(store.get_config_map("arlon", "p1").unwrap_err().is_not_found());
        assert!(store.get_secret("arlon", "../escape").unwrap_err().is_not_found());
        assert!(store.delete_secret("arlon", "gone").unwrap_err().is_not_found());

        Ok(())
    }

    #[test]
    fn fs_store_delete_secret() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let secrets = root.path().join("arlon").join("secrets");
        create_dir_all(&secrets)?;
        write(secrets.join("guestbook.toml"), "[data]\ndata = \"x\"\n")?;

        let store = FsStore::open(root.path());
        store.delete_secret("arlon", "guestbook")?;
        assert!(!secrets.join("guestbook.toml").exists());

        Ok(())
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::new();
        store.insert_secret("arlon", Record::new("b").with_label("bundle-type", "inline"));
        store.insert_secret("arlon", Record::new("a"));
        store.insert_config_map("arlon", Record::new("a").with_data("bundles", "b"));

        let names = store
            .list_secrets("arlon", &LabelSelector::new())
            .unwrap()
            .into_iter()
            .map(|record| record.name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            store.get_config_map("arlon", "a").unwrap().data("bundles"),
            Some("b")
        );

        store.delete_secret("arlon", "a").unwrap();
        assert!(store.get_secret("arlon", "a").unwrap_err().is_not_found());
        assert!(store.get_config_map("arlon", "a").is_ok());
    }
}
