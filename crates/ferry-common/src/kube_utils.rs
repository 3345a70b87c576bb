//! Shared Kubernetes utilities using kube-rs
//!
//! Status patching, finalizer bookkeeping and cluster identity lookup used by
//! every ferry controller.

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::Error;

/// Field manager used for every patch ferry issues
pub const FIELD_MANAGER: &str = "ferry-controller";

/// Default node label carrying the provider's cluster ID
pub const DEFAULT_CLUSTER_ID_LABEL: &str = "cluster_id";

/// Check whether the object carries the given finalizer
pub fn has_finalizer<K: Resource>(obj: &K, finalizer: &str) -> bool {
    obj.meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|s| s == finalizer))
}

/// Patch the status sub-resource of a namespaced Kubernetes resource.
///
/// Serializes `status` into `{ "status": <status> }` and applies it via
/// merge-patch.
pub async fn patch_resource_status<K>(
    client: &Client,
    name: &str,
    namespace: &str,
    status: &impl Serialize,
) -> Result<(), Error>
where
    K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
    <K as Resource>::DynamicType: Default,
{
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    let patch = serde_json::json!({ "status": status });
    api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

/// Append a finalizer to a namespaced resource if it is not already present
pub async fn add_finalizer<K>(
    client: &Client,
    name: &str,
    namespace: &str,
    finalizer: &str,
) -> Result<(), Error>
where
    K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
    <K as Resource>::DynamicType: Default,
{
    let api: Api<K> = Api::namespaced(client.clone(), namespace);

    // Get current object to read existing finalizers
    let obj = api.get(name).await?;
    let mut finalizers = obj.meta().finalizers.clone().unwrap_or_default();
    if finalizers.iter().any(|f| f == finalizer) {
        return Ok(());
    }
    finalizers.push(finalizer.to_string());

    let patch = serde_json::json!({
        "metadata": {
            "finalizers": finalizers
        }
    });
    api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await?;
    debug!(name, finalizer, "finalizer added");
    Ok(())
}

/// Remove a finalizer from a namespaced resource, tolerating a deleted object
pub async fn remove_finalizer<K>(
    client: &Client,
    name: &str,
    namespace: &str,
    finalizer: &str,
) -> Result<(), Error>
where
    K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
    <K as Resource>::DynamicType: Default,
{
    let api: Api<K> = Api::namespaced(client.clone(), namespace);

    let obj = match api.get(name).await {
        Ok(obj) => obj,
        Err(kube::Error::Api(ae)) if ae.code == 404 => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    let finalizers: Vec<String> = obj
        .meta()
        .finalizers
        .as_ref()
        .map(|f| f.iter().filter(|s| *s != finalizer).cloned().collect())
        .unwrap_or_default();

    let patch = serde_json::json!({
        "metadata": {
            "finalizers": finalizers
        }
    });
    api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await?;
    debug!(name, finalizer, "finalizer removed");
    Ok(())
}

/// Source of the provider's ID for the compute cluster ferry runs in
#[async_trait]
pub trait ClusterIdentity: Send + Sync {
    /// Resolve the cluster ID
    async fn cluster_id(&self) -> Result<String, Error>;
}

/// Reads the cluster ID from a node label and caches it for the process
pub struct NodeLabelClusterIdentity {
    client: Client,
    label: String,
    cached: OnceCell<String>,
}

impl NodeLabelClusterIdentity {
    /// Create a lookup for the given node label
    pub fn new(client: Client, label: impl Into<String>) -> Self {
        Self {
            client,
            label: label.into(),
            cached: OnceCell::new(),
        }
    }

    async fn lookup(&self) -> Result<String, Error> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let list = nodes.list(&ListParams::default().labels(&self.label)).await?;
        first_label_value(&list.items, &self.label).ok_or_else(|| {
            Error::internal_with_context(
                "cluster-identity",
                format!("no node carries the {} label", self.label),
            )
        })
    }
}

#[async_trait]
impl ClusterIdentity for NodeLabelClusterIdentity {
    async fn cluster_id(&self) -> Result<String, Error> {
        let id = self.cached.get_or_try_init(|| self.lookup()).await?;
        Ok(id.clone())
    }
}

/// A fixed cluster ID, for deployments that pass it in configuration
pub struct StaticClusterIdentity(pub String);

#[async_trait]
impl ClusterIdentity for StaticClusterIdentity {
    async fn cluster_id(&self) -> Result<String, Error> {
        Ok(self.0.clone())
    }
}

fn first_label_value(nodes: &[Node], label: &str) -> Option<String> {
    let value = nodes.iter().find_map(|node| {
        node.metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(label))
            .filter(|v| !v.is_empty())
            .cloned()
    });
    if let Some(ref v) = value {
        info!(label, cluster_id = %v, "resolved cluster id from node label");
    }
    value
}
