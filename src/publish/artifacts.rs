// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Base artifact providers.
//!
//! Every published cluster gets the same fixed set of management
//! manifests. By default these come compiled into the binary, but an
//! operator may point gitplane at a directory of their own instead.
//! Either way, the working tree builder only ever sees a read-only list of
//! relative paths paired with their contents.

use ignore::WalkBuilder;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, instrument};

/// One base artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Relative, `/` separated path below the management path.
    pub path: String,

    /// Raw file contents.
    pub contents: Vec<u8>,
}

/// Read-only provider of base artifacts keyed by relative path.
pub trait ArtifactSource: Send + Sync {
    /// List all artifacts sorted by path.
    fn artifacts(&self) -> Result<Vec<Artifact>>;
}

impl<A> ArtifactSource for &A
where
    A: ArtifactSource + ?Sized,
{
    fn artifacts(&self) -> Result<Vec<Artifact>> {
        (**self).artifacts()
    }
}

impl ArtifactSource for Box<dyn ArtifactSource> {
    fn artifacts(&self) -> Result<Vec<Artifact>> {
        self.as_ref().artifacts()
    }
}

/// Management chart compiled into the binary.
static EMBEDDED: &[(&str, &[u8])] = &[
    ("Chart.yaml", include_bytes!("chart/Chart.yaml")),
    ("templates/cluster.yaml", include_bytes!("chart/templates/cluster.yaml")),
    ("templates/machinepool.yaml", include_bytes!("chart/templates/machinepool.yaml")),
    ("values.yaml", include_bytes!("chart/values.yaml")),
];

/// Base artifacts embedded in the binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedArtifacts;

impl ArtifactSource for EmbeddedArtifacts {
    fn artifacts(&self) -> Result<Vec<Artifact>> {
        let mut artifacts = EMBEDDED
            .iter()
            .map(|(path, contents)| Artifact {
                path: (*path).to_string(),
                contents: contents.to_vec(),
            })
            .collect::<Vec<_>>();
        artifacts.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(artifacts)
    }
}

/// Base artifacts read from a directory on disk.
///
/// Honours `.gitignore` files and skips hidden entries.
#[derive(Debug, Clone)]
pub struct DirectoryArtifacts {
    root: PathBuf,
}

impl DirectoryArtifacts {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ArtifactSource for DirectoryArtifacts {
    #[instrument(skip(self), fields(root = %self.root.display()), level = "debug")]
    fn artifacts(&self) -> Result<Vec<Artifact>> {
        if !self.root.is_dir() {
            return Err(ArtifactError::NotADirectory(self.root.clone()));
        }

        let mut artifacts = Vec::new();
        let walker = WalkBuilder::new(&self.root)
            .hidden(true)
            .git_ignore(true)
            .require_git(false)
            .build();
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_some_and(|kind| kind.is_file()) {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .map_err(|_| ArtifactError::InvalidPath(entry.path().to_path_buf()))?;
            let path = to_slash_path(relative)?;
            let contents = std::fs::read(entry.path()).map_err(|err| ArtifactError::Read {
                source: err,
                path: entry.path().to_path_buf(),
            })?;
            debug!("found base artifact {path}");
            artifacts.push(Artifact { path, contents });
        }
        artifacts.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(artifacts)
    }
}

fn to_slash_path(path: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(
                part.to_str()
                    .ok_or_else(|| ArtifactError::InvalidPath(path.to_path_buf()))?,
            ),
            _ => return Err(ArtifactError::InvalidPath(path.to_path_buf())),
        }
    }

    Ok(parts.join("/"))
}

/// Base artifact error types.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// Artifact directory does not exist.
    #[error("artifact directory {:?} does not exist", .0.display())]
    NotADirectory(PathBuf),

    /// Artifact path cannot be expressed relative to the artifact root.
    #[error("artifact path {:?} is not a plain relative path", .0.display())]
    InvalidPath(PathBuf),

    /// Artifact file cannot be read.
    #[error("failed to read artifact at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Artifact directory cannot be walked.
    #[error(transparent)]
    Walk(#[from] ignore::Error),
}

/// Friendly result alias :3
pub type Result<T, E = ArtifactError> = std::result::Result<T, E>;
