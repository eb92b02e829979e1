// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Published tree layout.
//!
//! For cluster `C` under base path `B`, a publication owns two subtrees of
//! the repository:
//!
//! ```text
//! B/C/mgmt/**                     base artifacts
//! B/C/mgmt/templates/<b>.yaml     one application stub per inline bundle
//! B/C/workload/<b>/<b>.yaml       raw payload of each inline bundle
//! ```
//!
//! Everything in this module is pure. A [`PublicationPlan`] lists every
//! file to write with its final contents, so nothing touches the working
//! tree until the whole publication is known to be valid.

use crate::publish::{artifacts::Artifact, bundle::InlineBundle};

use serde::Serialize;
use std::collections::HashSet;
use tera::{Context, Tera};

/// Namespace that bundle application stubs are created in.
pub const APP_NAMESPACE: &str = "argocd";

/// Namespace that bundle workloads are deployed to.
pub const DESTINATION_NAMESPACE: &str = "default";

const MGMT_DIR: &str = "mgmt";
const WORKLOAD_DIR: &str = "workload";
const TEMPLATES_DIR: &str = "templates";

const APPLICATION_TEMPLATE: &str = r#"apiVersion: argoproj.io/v1alpha1
kind: Application
metadata:
  name: {{ ClusterName }}-{{ BundleName }}
  namespace: {{ AppNamespace }}
spec:
  syncPolicy:
    automated:
      prune: true
  destination:
    name: {{ ClusterName }}
    namespace: {{ DestinationNamespace }}
  project: default
  source:
    repoURL: {{ RepoUrl }}
    path: {{ WorkloadPath }}/{{ BundleName }}
    targetRevision: HEAD
"#;

/// Repository paths owned by one cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterLayout {
    cluster_name: String,
    mgmt_path: String,
    workload_path: String,
}

impl ClusterLayout {
    /// Construct layout of `cluster_name` below `base_path`.
    ///
    /// Base path is normalized: repeated, leading, or trailing slashes and
    /// `.` segments are dropped. An empty base path means the repository
    /// root.
    ///
    /// # Errors
    ///
    /// - Return [`LayoutError::InvalidName`] if cluster name is not a single
    ///   plain path component.
    /// - Return [`LayoutError::InvalidBasePath`] if base path climbs out of
    ///   the repository.
    pub fn new(base_path: &str, cluster_name: &str) -> Result<Self> {
        check_component("cluster", cluster_name)?;
        let base = normalize(base_path)
            .ok_or_else(|| LayoutError::InvalidBasePath(base_path.into()))?;

        Ok(Self {
            cluster_name: cluster_name.into(),
            mgmt_path: join([base.as_str(), cluster_name, MGMT_DIR]),
            workload_path: join([base.as_str(), cluster_name, WORKLOAD_DIR]),
        })
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// Path of the management subtree.
    pub fn mgmt_path(&self) -> &str {
        &self.mgmt_path
    }

    /// Path of the workload subtree.
    pub fn workload_path(&self) -> &str {
        &self.workload_path
    }

    /// Path of a base artifact inside the management subtree.
    pub fn artifact_path(&self, relative: &str) -> Result<String> {
        let relative = normalize(relative)
            .filter(|path| !path.is_empty())
            .ok_or_else(|| LayoutError::InvalidName {
                what: "artifact",
                name: relative.into(),
            })?;

        Ok(join([self.mgmt_path.as_str(), relative.as_str()]))
    }

    /// Path of a bundle's raw payload.
    pub fn bundle_payload_path(&self, bundle_name: &str) -> String {
        join([
            self.workload_path.as_str(),
            bundle_name,
            format!("{bundle_name}.yaml").as_str(),
        ])
    }

    /// Path of a bundle's application stub.
    pub fn bundle_stub_path(&self, bundle_name: &str) -> String {
        join([
            self.mgmt_path.as_str(),
            TEMPLATES_DIR,
            format!("{bundle_name}.yaml").as_str(),
        ])
    }
}

/// Values rendered into a bundle's application stub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AppSettings {
    pub cluster_name: String,
    pub bundle_name: String,
    pub workload_path: String,
    pub app_namespace: String,
    pub destination_namespace: String,
    pub repo_url: String,
}

impl AppSettings {
    /// Stub settings for one bundle of the cluster in `layout`.
    pub fn new(layout: &ClusterLayout, bundle_name: &str, repo_url: &str) -> Self {
        Self {
            cluster_name: layout.cluster_name().into(),
            bundle_name: bundle_name.into(),
            workload_path: layout.workload_path().into(),
            app_namespace: APP_NAMESPACE.into(),
            destination_namespace: DESTINATION_NAMESPACE.into(),
            repo_url: repo_url.into(),
        }
    }
}

/// Render application stub that syncs one bundle's workload path.
///
/// # Errors
///
/// - Return [`LayoutError::Render`] if template rendering fails.
pub fn render_bundle_application(settings: &AppSettings) -> Result<String> {
    let context = Context::from_serialize(settings)?;
    Ok(Tera::one_off(APPLICATION_TEMPLATE, &context, false)?)
}

/// One file of a publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
    /// Repository relative, `/` separated path.
    pub path: String,

    /// Final contents.
    pub contents: Vec<u8>,
}

/// Every file one publication writes, in write order.
///
/// # Invariant
///
/// - No two files share a path.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublicationPlan {
    files: Vec<PlannedFile>,
}

impl PublicationPlan {
    /// Plan publication of base artifacts and inline bundles.
    ///
    /// Base artifacts come first in the order given, followed by each
    /// bundle's payload and stub in bundle order. No stub is planned when
    /// there are no bundles.
    ///
    /// # Errors
    ///
    /// - Return [`LayoutError::InvalidName`] if an artifact path or bundle
    ///   name cannot be placed in the tree.
    /// - Return [`LayoutError::Collision`] if two files land on one path.
    /// - Return [`LayoutError::Render`] if a stub cannot be rendered.
    pub fn build(
        layout: &ClusterLayout,
        artifacts: &[Artifact],
        bundles: &[InlineBundle],
        repo_url: &str,
    ) -> Result<Self> {
        let mut plan = Self::default();
        let mut seen = HashSet::new();

        for artifact in artifacts {
            let path = layout.artifact_path(&artifact.path)?;
            plan.push(&mut seen, path, artifact.contents.clone())?;
        }

        for bundle in bundles {
            check_component("bundle", bundle.name())?;
            plan.push(
                &mut seen,
                layout.bundle_payload_path(bundle.name()),
                bundle.payload().to_vec(),
            )?;

            let settings = AppSettings::new(layout, bundle.name(), repo_url);
            let stub = render_bundle_application(&settings)?;
            plan.push(&mut seen, layout.bundle_stub_path(bundle.name()), stub.into_bytes())?;
        }

        Ok(plan)
    }

    pub fn files(&self) -> &[PlannedFile] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn push(&mut self, seen: &mut HashSet<String>, path: String, contents: Vec<u8>) -> Result<()> {
        if !seen.insert(path.clone()) {
            return Err(LayoutError::Collision(path));
        }
        self.files.push(PlannedFile { path, contents });

        Ok(())
    }
}

fn check_component(what: &'static str, name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(LayoutError::InvalidName {
            what,
            name: name.into(),
        });
    }

    Ok(())
}

// INVARIANT: Return None for any path that climbs out of its root.
fn normalize(path: &str) -> Option<String> {
    let mut parts = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => continue,
            ".." => return None,
            part => parts.push(part),
        }
    }

    Some(parts.join("/"))
}

fn join<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Layout error types.
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    /// Name cannot be used as a path component.
    #[error("{what} name {name:?} cannot be used as a path component")]
    InvalidName { what: &'static str, name: String },

    /// Base path points outside of the repository.
    #[error("base path {0:?} escapes the repository")]
    InvalidBasePath(String),

    /// Two planned files share a path.
    #[error("more than one file would be written to {0}")]
    Collision(String),

    /// Application stub cannot be rendered.
    #[error("failed to render application template")]
    Render(#[from] tera::Error),
}

/// Friendly result alias :3
pub type Result<T, E = LayoutError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    #[test_case("clusters", "clusters/c1/mgmt"; "plain")]
    #[test_case("/clusters/", "clusters/c1/mgmt"; "surrounding slashes")]
    #[test_case("fleet//./clusters", "fleet/clusters/c1/mgmt"; "messy")]
    #[test_case("", "c1/mgmt"; "repository root")]
    #[test]
    fn base_path_is_normalized(base: &str, expect: &str) {
        let layout = ClusterLayout::new(base, "c1").unwrap();
        pretty_assertions::assert_eq!(layout.mgmt_path(), expect);
    }

    #[test]
    fn layout_paths() -> anyhow::Result<()> {
        let layout = ClusterLayout::new("clusters", "c1")?;
        assert_eq!(layout.workload_path(), "clusters/c1/workload");
        assert_eq!(layout.bundle_payload_path("a"), "clusters/c1/workload/a/a.yaml");
        assert_eq!(layout.bundle_stub_path("a"), "clusters/c1/mgmt/templates/a.yaml");
        assert_eq!(
            layout.artifact_path("templates/cluster.yaml")?,
            "clusters/c1/mgmt/templates/cluster.yaml"
        );

        Ok(())
    }

    #[test_case("../up"; "parent")]
    #[test_case("a/b"; "nested")]
    #[test_case(""; "empty")]
    #[test]
    fn bad_cluster_names(name: &str) {
        assert!(matches!(
            ClusterLayout::new("clusters", name),
            Err(LayoutError::InvalidName { .. })
        ));
    }

    #[test]
    fn base_path_cannot_escape() {
        assert!(matches!(
            ClusterLayout::new("clusters/../..", "c1"),
            Err(LayoutError::InvalidBasePath(_))
        ));
    }

    #[test]
    fn render_stub() -> anyhow::Result<()> {
        let layout = ClusterLayout::new("clusters", "c1")?;
        let result = render_bundle_application(&AppSettings::new(
            &layout,
            "guestbook",
            "https://git.example.com/fleet.git",
        ))?;
        let expect = indoc! {r#"
            apiVersion: argoproj.io/v1alpha1
            kind: Application
            metadata:
              name: c1-guestbook
              namespace: argocd
            spec:
              syncPolicy:
                automated:
                  prune: true
              destination:
                name: c1
                namespace: default
              project: default
              source:
                repoURL: https://git.example.com/fleet.git
                path: clusters/c1/workload/guestbook
                targetRevision: HEAD
        "#};
        assert_eq!(result, expect);

        Ok(())
    }

    fn artifacts() -> Vec<Artifact> {
        vec![
            Artifact {
                path: "Chart.yaml".into(),
                contents: b"name: mgmt\n".to_vec(),
            },
            Artifact {
                path: "templates/cluster.yaml".into(),
                contents: b"kind: Cluster\n".to_vec(),
            },
        ]
    }

    #[test]
    fn plan_with_bundles() -> anyhow::Result<()> {
        let layout = ClusterLayout::new("clusters", "c1")?;
        let bundles = vec![InlineBundle::new("a", "X")?];
        let plan = PublicationPlan::build(&layout, &artifacts(), &bundles, "https://r")?;

        let paths = plan.files().iter().map(|f| f.path.as_str()).collect::<Vec<_>>();
        assert_eq!(
            paths,
            vec![
                "clusters/c1/mgmt/Chart.yaml",
                "clusters/c1/mgmt/templates/cluster.yaml",
                "clusters/c1/workload/a/a.yaml",
                "clusters/c1/mgmt/templates/a.yaml",
            ]
        );
        assert_eq!(plan.files()[2].contents, b"X".to_vec());
        let stub = String::from_utf8(plan.files()[3].contents.clone())?;
        assert!(stub.contains("name: c1-a\n"));
        assert!(stub.contains("path: clusters/c1/workload/a\n"));

        Ok(())
    }

    #[test]
    fn plan_without_bundles_has_no_stubs() -> anyhow::Result<()> {
        let layout = ClusterLayout::new("clusters", "c1")?;
        let plan = PublicationPlan::build(&layout, &[], &[], "https://r")?;
        assert!(plan.is_empty());

        Ok(())
    }

    #[test]
    fn stub_cannot_overwrite_base_artifact() -> anyhow::Result<()> {
        let layout = ClusterLayout::new("clusters", "c1")?;
        let bundles = vec![InlineBundle::new("cluster", "kind: Oops\n")?];
        let result = PublicationPlan::build(&layout, &artifacts(), &bundles, "https://r");
        assert!(matches!(
            result,
            Err(LayoutError::Collision(ref path))
                if path == "clusters/c1/mgmt/templates/cluster.yaml"
        ));

        Ok(())
    }

    #[test]
    fn bundle_name_must_be_component() -> anyhow::Result<()> {
        let layout = ClusterLayout::new("clusters", "c1")?;
        let bundles = vec![InlineBundle::new("../evil", "x")?];
        let result = PublicationPlan::build(&layout, &[], &bundles, "https://r");
        assert!(matches!(result, Err(LayoutError::InvalidName { .. })));

        Ok(())
    }
}
