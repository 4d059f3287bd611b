// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Routing configuration
//!
//! A YAML file describing one event source: default constraints plus a list
//! of watched resources. By default it lives at ~/.k8sroute/config.yaml.
//!
//! Resource-level `namespaces`, `event` types/reason/message, `annotations`
//! and `labels` override the source-level defaults when present.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::event::EventType;
use crate::router::{Constraint, EventConstraints, Route, RouteTable, UpdateSetting};

/// Get the base k8sroute directory (~/.k8sroute/)
pub fn base_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|p| p.join(".k8sroute"))
        .context("Could not determine home directory")
}

fn default_name() -> String {
    "k8s-events".to_string()
}

/// Event types and native Event constraints
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventSettings {
    #[serde(default)]
    pub types: Vec<EventType>,
    #[serde(default)]
    pub reason: Constraint,
    #[serde(default)]
    pub message: Constraint,
}

/// One watched resource kind
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceConfig {
    /// Canonical identifier, e.g. "v1/pods" or "apps/v1/deployments"
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub name: Constraint,
    #[serde(default)]
    pub namespaces: Option<Constraint>,
    #[serde(default)]
    pub event: Option<EventSettings>,
    #[serde(default)]
    pub annotations: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub update_setting: Option<UpdateSetting>,
}

impl ResourceConfig {
    fn validate_type(&self) -> Result<(), ConfigError> {
        let parts: Vec<&str> = self.resource_type.split('/').collect();
        if !(2..=3).contains(&parts.len()) || parts.iter().any(|p| p.trim().is_empty()) {
            return Err(ConfigError::InvalidResourceType(self.resource_type.clone()));
        }
        Ok(())
    }
}

/// k8sroute configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source handle passed to the dispatcher
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub namespaces: Option<Constraint>,
    #[serde(default)]
    pub event: Option<EventSettings>,
    #[serde(default)]
    pub annotations: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: default_name(),
            namespaces: None,
            event: None,
            annotations: None,
            labels: None,
            resources: Vec::new(),
        }
    }
}

impl Config {
    /// Get the default config file path (~/.k8sroute/config.yaml)
    pub fn default_path() -> Result<PathBuf> {
        Ok(base_dir()?.join("config.yaml"))
    }

    /// Load and validate config from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Parse config from YAML; patterns and field paths compile here
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.route_table().map(|_| ())
    }

    /// Build the route table: one route per resource and event type
    pub fn route_table(&self) -> Result<RouteTable, ConfigError> {
        let mut table = RouteTable::new();
        for resource in &self.resources {
            resource.validate_type()?;
            let event = self.merged_event(resource);
            let types: BTreeSet<EventType> = event.types.iter().copied().collect();
            if types.is_empty() {
                return Err(ConfigError::NoEventTypes {
                    resource: resource.resource_type.clone(),
                });
            }

            let event_constraints = (event.reason.is_configured() || event.message.is_configured())
                .then(|| EventConstraints {
                    reason: event.reason.clone(),
                    message: event.message.clone(),
                });

            for event_type in types {
                let route = Route {
                    event: event_constraints.clone(),
                    resource_name: resource.name.clone(),
                    namespaces: resource
                        .namespaces
                        .as_ref()
                        .filter(|c| c.is_configured())
                        .or(self.namespaces.as_ref())
                        .cloned(),
                    annotations: resource
                        .annotations
                        .as_ref()
                        .or(self.annotations.as_ref())
                        .cloned(),
                    labels: resource.labels.as_ref().or(self.labels.as_ref()).cloned(),
                    update_setting: (event_type == EventType::Update)
                        .then(|| resource.update_setting.clone())
                        .flatten(),
                };
                table.insert(resource.resource_type.trim(), event_type, route);
            }
        }
        Ok(table)
    }

    /// Resource event settings with source defaults filled in per field
    fn merged_event(&self, resource: &ResourceConfig) -> EventSettings {
        let defaults = self.event.clone().unwrap_or_default();
        let Some(own) = &resource.event else {
            return defaults;
        };
        EventSettings {
            types: if own.types.is_empty() {
                defaults.types
            } else {
                own.types.clone()
            },
            reason: if own.reason.is_configured() {
                own.reason.clone()
            } else {
                defaults.reason
            },
            message: if own.message.is_configured() {
                own.message.clone()
            } else {
                defaults.message
            },
        }
    }
}
