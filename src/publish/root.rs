// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Root descriptor construction.
//!
//! The __root descriptor__ is the one application object the
//! reconciliation controller watches per cluster. It points at the
//! cluster's management path, and hands the cluster's sizing parameters
//! to the management chart. It is rebuilt from scratch every time, never
//! merged with whatever was there before.

use crate::{
    publish::layout::{ClusterLayout, DESTINATION_NAMESPACE},
    store::Record,
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// API version of application objects.
pub const APPLICATION_API_VERSION: &str = "argoproj.io/v1alpha1";

/// Kind of application objects.
pub const APPLICATION_KIND: &str = "Application";

/// In-cluster API endpoint the management chart is applied to.
pub const IN_CLUSTER_SERVER: &str = "https://kubernetes.default.svc";

/// Sizing keys forwarded from a cluster specification, in output order.
pub const SIZING_KEYS: [&str; 6] = [
    "region",
    "sshKeyName",
    "kubernetesVersion",
    "podCidrBlock",
    "nodeCount",
    "nodeType",
];

/// Named set of sizing parameters for a cluster.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClusterSpec {
    pub name: String,
    pub parameters: BTreeMap<String, String>,
}

impl From<Record> for ClusterSpec {
    fn from(record: Record) -> Self {
        Self {
            name: record.name,
            parameters: record.data,
        }
    }
}

/// Application object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: ApplicationSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    pub project: String,
    pub source: ApplicationSource,
    pub destination: ApplicationDestination,
    pub sync_policy: SyncPolicy,
    pub ignore_differences: Vec<ResourceIgnoreDifferences>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSource {
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    pub path: String,
    pub target_revision: String,
    pub helm: ApplicationSourceHelm,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationSourceHelm {
    pub parameters: Vec<HelmParameter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelmParameter {
    pub name: String,
    pub value: String,
}

impl HelmParameter {
    fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationDestination {
    pub server: String,
    pub namespace: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPolicy {
    pub automated: SyncPolicyAutomated,
    pub sync_options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPolicyAutomated {
    pub prune: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceIgnoreDifferences {
    pub group: String,
    pub kind: String,
    pub json_pointers: Vec<String>,
}

impl Application {
    /// Render as YAML document.
    ///
    /// # Errors
    ///
    /// - Return [`serde_yaml::Error`] if serialization fails.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Build root application of the cluster in `layout`.
///
/// Parameters always start with `clusterName`, followed by every sizing key
/// of `spec` that is present and non-empty, in [`SIZING_KEYS`] order.
pub fn build_root_application(
    layout: &ClusterLayout,
    repo_url: &str,
    branch: &str,
    namespace: &str,
    spec: &ClusterSpec,
) -> Application {
    let mut parameters = vec![HelmParameter::new("clusterName", layout.cluster_name())];
    parameters.extend(SIZING_KEYS.iter().filter_map(|key| {
        spec.parameters
            .get(*key)
            .filter(|value| !value.is_empty())
            .map(|value| HelmParameter::new(*key, value.as_str()))
    }));

    Application {
        api_version: APPLICATION_API_VERSION.into(),
        kind: APPLICATION_KIND.into(),
        metadata: ObjectMeta {
            name: layout.cluster_name().into(),
            namespace: namespace.into(),
        },
        spec: ApplicationSpec {
            project: "default".into(),
            source: ApplicationSource {
                repo_url: repo_url.into(),
                path: layout.mgmt_path().into(),
                target_revision: branch.into(),
                helm: ApplicationSourceHelm { parameters },
            },
            destination: ApplicationDestination {
                server: IN_CLUSTER_SERVER.into(),
                namespace: DESTINATION_NAMESPACE.into(),
            },
            sync_policy: SyncPolicy {
                automated: SyncPolicyAutomated { prune: true },
                sync_options: vec!["Prune=true".into()],
            },
            // Managed control plane controllers rewrite spec.version with a
            // less precise value than requested, e.g., v1.18.16 becomes v1.18.
            ignore_differences: vec![ResourceIgnoreDifferences {
                group: "controlplane.cluster.x-k8s.io".into(),
                kind: "AWSManagedControlPlane".into(),
                json_pointers: vec!["/spec/version".into()],
            }],
        },
    }
}
