// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Routes and the route table.
//!
//! The table is built once from configuration and never mutated. Reloading
//! builds a new table and swaps it in atomically through [`RouteTableHandle`];
//! handlers that are mid-event keep the snapshot they loaded.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::info;

use super::constraint::Constraint;
use super::diff::FieldPath;
use crate::event::EventType;

/// Constraints on native Event reason and message
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventConstraints {
    #[serde(default)]
    pub reason: Constraint,
    #[serde(default)]
    pub message: Constraint,
}

/// How update events are qualified for a route
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSetting {
    /// Only changes under these paths count; empty means the whole object
    #[serde(default)]
    pub fields: Vec<FieldPath>,
    /// Changes under these paths never count
    #[serde(default)]
    pub ignored_fields: Vec<FieldPath>,
    /// Skip resourceVersion, managedFields and generation
    #[serde(default = "default_true")]
    pub ignore_volatile_metadata: bool,
    /// Attach the rendered diff to forwarded events
    #[serde(default)]
    pub include_diff: bool,
}

fn default_true() -> bool {
    true
}

impl Default for UpdateSetting {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            ignored_fields: Vec::new(),
            ignore_volatile_metadata: true,
            include_diff: false,
        }
    }
}

impl UpdateSetting {
    /// Whether this setting changes how updates qualify
    pub fn is_actionable(&self) -> bool {
        !self.fields.is_empty() || !self.ignored_fields.is_empty() || self.include_diff
    }
}

/// One configured routing rule for a (resource, event type)
#[derive(Debug, Clone, Default)]
pub struct Route {
    pub event: Option<EventConstraints>,
    pub resource_name: Constraint,
    pub namespaces: Option<Constraint>,
    /// Required annotations; `None` means unconstrained
    pub annotations: Option<BTreeMap<String, String>>,
    /// Required labels; `None` means unconstrained
    pub labels: Option<BTreeMap<String, String>>,
    pub update_setting: Option<UpdateSetting>,
}

impl Route {
    /// The update setting, if it changes how updates qualify
    pub fn actionable_update_setting(&self) -> Option<&UpdateSetting> {
        self.update_setting.as_ref().filter(|s| s.is_actionable())
    }
}

/// Immutable mapping from (resource identifier, event type) to routes
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<String, HashMap<EventType, Vec<Route>>>,
    /// Native Event types with at least one route
    mapped_types: BTreeSet<EventType>,
    /// Resources routed through native Events
    mapped_resources: BTreeSet<String>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route for a resource and event type, keeping insertion order
    pub fn insert(&mut self, resource: impl Into<String>, event_type: EventType, route: Route) {
        let resource = resource.into();
        if event_type.is_mapped() {
            self.mapped_types.insert(event_type);
            self.mapped_resources.insert(resource.clone());
        }
        self.routes
            .entry(resource)
            .or_default()
            .entry(event_type)
            .or_default()
            .push(route);
    }

    /// Routes that may apply to a resource and event type, in table order
    pub fn routes(&self, resource: &str, event_type: EventType) -> &[Route] {
        self.routes
            .get(resource)
            .and_then(|by_type| by_type.get(&event_type))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Resources with direct-watch routes (create, update, delete)
    pub fn watched_resources(&self) -> BTreeSet<&str> {
        self.routes
            .iter()
            .filter(|(_, by_type)| by_type.keys().any(|t| !t.is_mapped()))
            .map(|(r, _)| r.as_str())
            .collect()
    }

    /// Event types registered for a resource
    pub fn event_types(&self, resource: &str) -> BTreeSet<EventType> {
        self.routes
            .get(resource)
            .map(|by_type| by_type.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Native Event types anything subscribes to
    pub fn mapped_event_types(&self) -> &BTreeSet<EventType> {
        &self.mapped_types
    }

    /// Resources routed through native Events
    pub fn mapped_resources(&self) -> &BTreeSet<String> {
        &self.mapped_resources
    }

    /// Whether native Events about this resource are routed
    pub fn includes_mapped_resource(&self, resource: &str) -> bool {
        self.mapped_resources.contains(resource)
    }

    /// Whether a native Event type string ("Warning", "Normal") is subscribed
    pub fn handles_native_type(&self, native_type: &str) -> bool {
        self.mapped_types
            .iter()
            .any(|t| t.as_str().eq_ignore_ascii_case(native_type))
    }

    /// Total number of routes
    pub fn len(&self) -> usize {
        self.routes
            .values()
            .flat_map(HashMap::values)
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// (resource, event type, route count) sorted for display
    pub fn summary(&self) -> Vec<(String, EventType, usize)> {
        let mut rows: Vec<_> = self
            .routes
            .iter()
            .flat_map(|(r, by_type)| {
                by_type
                    .iter()
                    .map(move |(t, routes)| (r.clone(), *t, routes.len()))
            })
            .collect();
        rows.sort();
        rows
    }
}

/// Shared handle to the current route table
///
/// Uses ArcSwap for lock-free reads; reloads replace the table in a single
/// pointer swap.
pub struct RouteTableHandle {
    table: ArcSwap<RouteTable>,
}

impl RouteTableHandle {
    pub fn new(table: RouteTable) -> Self {
        Self {
            table: ArcSwap::from_pointee(table),
        }
    }

    /// Current snapshot
    pub fn load(&self) -> Arc<RouteTable> {
        self.table.load_full()
    }

    /// Replace the table atomically
    pub fn swap(&self, table: RouteTable) {
        let route_count = table.len();
        self.table.store(Arc::new(table));
        info!(route_count, "Route table updated atomically");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_keeps_order() {
        let mut table = RouteTable::new();
        let first = Route {
            resource_name: Constraint::include(&["a"]).unwrap(),
            ..Default::default()
        };
        let second = Route {
            resource_name: Constraint::include(&["b"]).unwrap(),
            ..Default::default()
        };
        table.insert("v1/pods", EventType::Create, first);
        table.insert("v1/pods", EventType::Create, second);

        let routes = table.routes("v1/pods", EventType::Create);
        assert_eq!(routes.len(), 2);
        assert!(routes[0].resource_name.is_allowed("a"));
        assert!(routes[1].resource_name.is_allowed("b"));
    }

    #[test]
    fn test_lookup_missing_is_empty() {
        let table = RouteTable::new();
        assert!(table.routes("v1/pods", EventType::Delete).is_empty());
    }

    #[test]
    fn test_resource_sets() {
        let mut table = RouteTable::new();
        table.insert("v1/pods", EventType::Create, Route::default());
        table.insert("v1/pods", EventType::Warning, Route::default());
        table.insert("apps/v1/deployments", EventType::Update, Route::default());
        table.insert("v1/nodes", EventType::Normal, Route::default());

        assert_eq!(
            table.watched_resources().into_iter().collect::<Vec<_>>(),
            vec!["apps/v1/deployments", "v1/pods"]
        );
        assert_eq!(
            table.mapped_resources().iter().collect::<Vec<_>>(),
            vec!["v1/nodes", "v1/pods"]
        );
        assert_eq!(
            table.mapped_event_types().iter().copied().collect::<Vec<_>>(),
            vec![EventType::Normal, EventType::Warning]
        );
        assert!(table.includes_mapped_resource("v1/pods"));
        assert!(!table.includes_mapped_resource("apps/v1/deployments"));
        assert!(table.handles_native_type("Warning"));
        assert!(!table.handles_native_type("Error"));
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_event_types_and_summary() {
        let mut table = RouteTable::new();
        table.insert("v1/pods", EventType::Delete, Route::default());
        table.insert("v1/pods", EventType::Create, Route::default());
        table.insert("v1/pods", EventType::Create, Route::default());
        table.insert("v1/nodes", EventType::Warning, Route::default());

        assert_eq!(
            table.event_types("v1/pods").into_iter().collect::<Vec<_>>(),
            vec![EventType::Create, EventType::Delete]
        );
        assert!(table.event_types("v1/secrets").is_empty());
        // Mapped-only resources have no direct watch
        assert!(!table.watched_resources().contains("v1/nodes"));
        assert_eq!(
            table.summary(),
            vec![
                ("v1/nodes".to_string(), EventType::Warning, 1),
                ("v1/pods".to_string(), EventType::Create, 2),
                ("v1/pods".to_string(), EventType::Delete, 1),
            ]
        );
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_native_type_lookup_is_case_insensitive() {
        let mut table = RouteTable::new();
        table.insert("v1/pods", EventType::Error, Route::default());
        assert!(table.handles_native_type("Error"));
        assert!(table.handles_native_type("ERROR"));
        assert!(!table.handles_native_type("Warning"));
        assert!(!table.handles_native_type(""));
    }

    #[test]
    fn test_update_setting_actionable() {
        assert!(!UpdateSetting::default().is_actionable());
        let with_diff = UpdateSetting {
            include_diff: true,
            ..Default::default()
        };
        assert!(with_diff.is_actionable());
        let with_fields = UpdateSetting {
            fields: vec!["spec.replicas".parse().unwrap()],
            ..Default::default()
        };
        assert!(with_fields.is_actionable());
    }

    #[test]
    fn test_update_setting_deserialize_defaults() {
        let setting: UpdateSetting = serde_yaml::from_str("includeDiff: true").unwrap();
        assert!(setting.include_diff);
        assert!(setting.ignore_volatile_metadata);
        assert!(setting.fields.is_empty());
    }

    #[test]
    fn test_handle_swap() {
        let handle = RouteTableHandle::new(RouteTable::new());
        let before = handle.load();
        assert!(before.is_empty());

        let mut table = RouteTable::new();
        table.insert("v1/pods", EventType::Delete, Route::default());
        handle.swap(table);

        // Old snapshot is unaffected
        assert!(before.is_empty());
        assert_eq!(handle.load().routes("v1/pods", EventType::Delete).len(), 1);
    }
}
