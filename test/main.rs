// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT


use anyhow::Result;
use git2::{ErrorCode, ObjectType, Oid, Repository, RepositoryInitOptions, Sort};
use std::path::Path;
use tempfile::TempDir;

/// Bare repository standing in for a remote GitOps repository.
pub(crate) struct RemoteFixture {
    repo: Repository,
    _dir: TempDir,
}

impl RemoteFixture {
    /// Create bare repository whose `main` branch holds one seed commit.
    pub(crate) fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("remote-").tempdir()?;
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        opts.bare(true);
        let repo = Repository::init_opts(dir.path(), &opts)?;

        // INVARIANT: Always provide valid name and email.
        //   - Git will complain if this is not set in CI/CD environments.
        let mut config = repo.config()?;
        config.set_str("user.name", "John Doe")?;
        config.set_str("user.email", "john@doe.com")?;

        let fixture = Self { repo, _dir: dir };
        fixture.commit_file("README.md", "# fleet\n")?;

        Ok(fixture)
    }

    /// URL that clones this repository.
    pub(crate) fn url(&self) -> String {
        self.repo.path().to_string_lossy().into_owned()
    }

    /// Commit at the tip of `main`.
    pub(crate) fn head(&self) -> Result<Oid> {
        Ok(self.repo.refname_to_id("refs/heads/main")?)
    }

    /// Number of commits reachable from `main`.
    pub(crate) fn commit_count(&self) -> Result<usize> {
        let mut walk = self.repo.revwalk()?;
        walk.set_sorting(Sort::TOPOLOGICAL)?;
        walk.push(self.head()?)?;

        Ok(walk.count())
    }

    /// Contents of file at `path` on `main`, if it exists.
    pub(crate) fn read_file(&self, path: impl AsRef<Path>) -> Result<Option<String>> {
        let tree = self.repo.find_commit(self.head()?)?.tree()?;
        let entry = match tree.get_path(path.as_ref()) {
            Ok(entry) => entry,
            Err(err) if err.code() == ErrorCode::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let blob = entry.to_object(&self.repo)?.peel_to_blob()?;

        Ok(Some(String::from_utf8_lossy(blob.content()).into_owned()))
    }

    /// Names of entries in directory at `path` on `main`, sorted.
    pub(crate) fn list_dir(&self, path: impl AsRef<Path>) -> Result<Vec<String>> {
        let tree = self.repo.find_commit(self.head()?)?.tree()?;
        let entry = match tree.get_path(path.as_ref()) {
            Ok(entry) => entry,
            Err(err) if err.code() == ErrorCode::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        if entry.kind() != Some(ObjectType::Tree) {
            return Ok(Vec::new());
        }

        let subtree = entry.to_object(&self.repo)?.peel_to_tree()?;
        let mut names = subtree
            .iter()
            .filter_map(|entry| entry.name().map(str::to_string))
            .collect::<Vec<_>>();
        names.sort();

        Ok(names)
    }

    /// Commit top-level file directly onto `main`.
    pub(crate) fn commit_file(&self, filename: &str, contents: &str) -> Result<Oid> {
        let blob = self.repo.blob(contents.as_bytes())?;

        // INVARIANT: Always extend the tree of the latest commit, if any.
        let parent = match self.repo.refname_to_id("refs/heads/main") {
            Ok(oid) => Some(self.repo.find_commit(oid)?),
            Err(_) => None,
        };
        let base = match &parent {
            Some(commit) => Some(commit.tree()?),
            None => None,
        };
        let mut builder = self.repo.treebuilder(base.as_ref())?;
        builder.insert(filename, blob, 0o100644)?;
        let tree = self.repo.find_tree(builder.write()?)?;

        let signature = self.repo.signature()?;
        let parents = parent.iter().collect::<Vec<_>>();
        let oid = self.repo.commit(
            Some("refs/heads/main"),
            &signature,
            &signature,
            format!("chore: add {filename:?}").as_str(),
            &tree,
            &parents,
        )?;

        Ok(oid)
    }
}
