// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Resource kind resolution for Kubernetes clusters.
//!
//! Maps group/version/kind to the API resource that serves it. Core kinds come
//! from k8s-openapi at compile time; CRDs are discovered at runtime by a
//! background task so that lookups on the event path never wait on the API.

use anyhow::Result;
use arc_swap::ArcSwap;
use kube::Client;
use kube::core::GroupVersionKind;
use kube::discovery::{ApiResource, Discovery};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ResolveError;

/// How often discovered resources are refreshed
pub const REGISTRY_TTL: Duration = Duration::from_secs(300); // 5 minutes

/// Canonical resource identifier: `group/version/plural`, or `version/plural`
/// for the core group.
///
/// Used both for events and for route table keys.
pub fn resource_identifier(group: &str, version: &str, plural: &str) -> String {
    if group.is_empty() {
        format!("{}/{}", version, plural)
    } else {
        format!("{}/{}/{}", group, version, plural)
    }
}

/// Canonical identifier of an API resource
pub fn api_resource_identifier(ar: &ApiResource) -> String {
    resource_identifier(&ar.group, &ar.version, &ar.plural)
}

/// Build a GVK from an `apiVersion` string ("v1" or "apps/v1") and a kind
pub fn gvk_from_api_version(api_version: &str, kind: &str) -> GroupVersionKind {
    match api_version.split_once('/') {
        Some((group, version)) => GroupVersionKind::gvk(group, version, kind),
        None => GroupVersionKind::gvk("", api_version, kind),
    }
}

/// Lookup key for a kind (group, version, kind)
type KindKey = (String, String, String);

fn kind_key(group: &str, version: &str, kind: &str) -> KindKey {
    (group.to_string(), version.to_string(), kind.to_string())
}

/// Registry of known API resources for a cluster
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    /// Resources indexed by (group, version, kind)
    by_kind: HashMap<KindKey, ApiResource>,
    /// Resources indexed by canonical identifier
    by_identifier: HashMap<String, ApiResource>,
}

impl ResourceRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource to the registry, replacing any previous entry for its kind
    pub fn add(&mut self, ar: ApiResource) {
        self.by_identifier
            .insert(api_resource_identifier(&ar), ar.clone());
        self.by_kind
            .insert(kind_key(&ar.group, &ar.version, &ar.kind), ar);
    }

    /// Look up a resource by group/version/kind
    pub fn get_by_kind(&self, gvk: &GroupVersionKind) -> Option<&ApiResource> {
        self.by_kind
            .get(&kind_key(&gvk.group, &gvk.version, &gvk.kind))
    }

    /// Look up a resource by its canonical identifier, e.g. "apps/v1/deployments"
    pub fn get(&self, identifier: &str) -> Option<&ApiResource> {
        self.by_identifier.get(identifier)
    }

    pub fn len(&self) -> usize {
        self.by_kind.len()
    }

    /// Merge another registry into this one
    pub fn merge(&mut self, other: ResourceRegistry) {
        for ar in other.by_kind.into_values() {
            self.add(ar);
        }
    }
}

/// Build a registry with just core resources using k8s-openapi types (no discovery, instant startup)
///
/// This uses compile-time type information from k8s-openapi, so it automatically
/// stays in sync with the Kubernetes API version we're building against.
pub fn build_core_registry() -> ResourceRegistry {
    use k8s_openapi::api::{
        apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet},
        autoscaling::v2::HorizontalPodAutoscaler,
        batch::v1::{CronJob, Job},
        core::v1::{
            ConfigMap, Endpoints, Event, LimitRange, Namespace, Node, PersistentVolume,
            PersistentVolumeClaim, Pod, ResourceQuota, Secret, Service, ServiceAccount,
        },
        networking::v1::{Ingress, NetworkPolicy},
        policy::v1::PodDisruptionBudget,
        rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding},
        storage::v1::StorageClass,
    };

    let mut registry = ResourceRegistry::new();

    macro_rules! add_resources {
        ($($type:ty),* $(,)?) => {{
            $( registry.add(ApiResource::erase::<$type>(&())); )*
        }};
    }

    add_resources!(
        // Core API (v1)
        Pod,
        Service,
        ConfigMap,
        Secret,
        Event,
        ServiceAccount,
        Endpoints,
        PersistentVolumeClaim,
        ResourceQuota,
        LimitRange,
        Node,
        Namespace,
        PersistentVolume,
        // Apps API (apps/v1)
        Deployment,
        StatefulSet,
        DaemonSet,
        ReplicaSet,
        // Batch API (batch/v1)
        Job,
        CronJob,
        // Networking API (networking.k8s.io/v1)
        Ingress,
        NetworkPolicy,
        // Autoscaling API (autoscaling/v2)
        HorizontalPodAutoscaler,
        // Policy API (policy/v1)
        PodDisruptionBudget,
        // Storage API (storage.k8s.io/v1)
        StorageClass,
        // RBAC API (rbac.authorization.k8s.io/v1)
        Role,
        RoleBinding,
        ClusterRole,
        ClusterRoleBinding,
    );

    registry
}

/// Discover all served resources on a cluster (including CRDs)
pub async fn discover_resources(client: &Client) -> Result<ResourceRegistry> {
    let mut registry = ResourceRegistry::new();

    let discovery = Discovery::new(client.clone()).run().await?;

    for group in discovery.groups() {
        for (ar, _caps) in group.recommended_resources() {
            // Skip subresources (e.g., pods/log, pods/exec)
            if ar.plural.contains('/') {
                continue;
            }
            registry.add(ar);
        }
    }

    Ok(registry)
}

/// Shared, atomically refreshed kind-to-resource mapping
pub struct ResourceMapper {
    registry: ArcSwap<ResourceRegistry>,
}

impl ResourceMapper {
    pub fn new(registry: ResourceRegistry) -> Self {
        Self {
            registry: ArcSwap::from_pointee(registry),
        }
    }

    /// Mapper with core resources only (no I/O)
    pub fn core() -> Self {
        Self::new(build_core_registry())
    }

    /// Resolve a kind to the API resource serving it
    pub fn resolve(&self, gvk: &GroupVersionKind) -> Result<ApiResource, ResolveError> {
        self.registry
            .load()
            .get_by_kind(gvk)
            .cloned()
            .ok_or_else(|| ResolveError::UnknownKind {
                api_version: gvk.api_version(),
                kind: gvk.kind.clone(),
            })
    }

    /// Look up a resource by canonical identifier
    pub fn lookup(&self, identifier: &str) -> Option<ApiResource> {
        self.registry.load().get(identifier).cloned()
    }

    /// Replace the mapping in a single atomic swap
    pub fn replace(&self, registry: ResourceRegistry) {
        self.registry.store(Arc::new(registry));
    }

    /// Run discovery once and swap in core resources plus everything discovered
    pub async fn refresh(&self, client: &Client) -> Result<()> {
        let discovered = discover_resources(client).await?;
        let mut registry = build_core_registry();
        registry.merge(discovered);
        info!(resources = registry.len(), "Resource mapping refreshed");
        self.replace(registry);
        Ok(())
    }

    /// Keep the mapping fresh in the background, off the event path
    pub fn spawn_refresh(self: Arc<Self>, client: Client) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(REGISTRY_TTL);
            // First tick completes immediately; startup already refreshed once
            interval.tick().await;
            loop {
                interval.tick().await;
                debug!("Refreshing resource mapping");
                if let Err(e) = self.refresh(&client).await {
                    warn!(error = %e, "Failed to refresh resource mapping, keeping previous");
                }
            }
        })
    }
}
