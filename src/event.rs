// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Canonical event model
//!
//! Every observed change, whether it comes from a direct resource watch or
//! from a native `v1/Event` describing another object, is normalized into an
//! [`Event`] before routing.

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Event as CoreEvent;
use kube::api::DynamicObject;
use kube::discovery::ApiResource;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{ConfigError, EventError, ResolveError};
use crate::kubernetes::{ObjectMeta, ObjectMetadata, api_resource_identifier};

/// Kind of change an event describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventType {
    Create,
    Update,
    Delete,
    /// Native Event of type Normal
    Normal,
    /// Native Event of type Warning
    Warning,
    /// Native Event of type Error
    Error,
}

impl EventType {
    pub const ALL: [EventType; 6] = [
        EventType::Create,
        EventType::Update,
        EventType::Delete,
        EventType::Normal,
        EventType::Warning,
        EventType::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Create => "create",
            EventType::Update => "update",
            EventType::Delete => "delete",
            EventType::Normal => "normal",
            EventType::Warning => "warning",
            EventType::Error => "error",
        }
    }

    /// Whether this type is delivered through native Event objects
    pub fn is_mapped(self) -> bool {
        matches!(
            self,
            EventType::Normal | EventType::Warning | EventType::Error
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnknownEventType(s.to_string()))
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Canonical representation of one observed change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Reason of a native Event, empty otherwise
    pub reason: String,
    pub messages: Vec<String>,
    pub name: String,
    pub namespace: String,
    /// Canonical resource identifier, e.g. "apps/v1/deployments"
    pub resource: String,
    pub kind: String,
    pub object_meta: ObjectMeta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<i32>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Build an event for a directly watched object
    pub fn from_object(
        obj: &DynamicObject,
        event_type: EventType,
        resource: &ApiResource,
    ) -> Result<Self, ResolveError> {
        let metadata = ObjectMetadata::from_object(obj)?;
        let kind = obj
            .types
            .as_ref()
            .map(|t| t.kind.clone())
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| resource.kind.clone());

        Ok(Self {
            event_type,
            reason: String::new(),
            messages: Vec::new(),
            name: metadata.name,
            namespace: metadata.namespace,
            resource: api_resource_identifier(resource),
            kind,
            object_meta: metadata.meta,
            count: None,
            timestamp: Utc::now(),
        })
    }

    /// Build an event from a native Event about another object
    ///
    /// `involved_meta` carries the labels and annotations of the involved
    /// object when it is known locally.
    pub fn from_native(
        native: &CoreEvent,
        event_type: EventType,
        resource: &str,
        involved_meta: ObjectMeta,
    ) -> Result<Self, ResolveError> {
        let involved = &native.involved_object;
        let name = involved
            .name
            .clone()
            .ok_or(ResolveError::MissingField("involvedObject.name"))?;

        let messages = native
            .message
            .iter()
            .filter(|m| !m.is_empty())
            .cloned()
            .collect();

        let timestamp = native
            .last_timestamp
            .as_ref()
            .and_then(parse_timestamp)
            .or_else(|| native.event_time.as_ref().and_then(parse_timestamp))
            .unwrap_or_else(Utc::now);

        Ok(Self {
            event_type,
            reason: native.reason.clone().unwrap_or_default(),
            messages,
            name,
            namespace: involved.namespace.clone().unwrap_or_default(),
            resource: resource.to_string(),
            kind: involved.kind.clone().unwrap_or_default(),
            object_meta: involved_meta,
            count: native.count,
            timestamp,
        })
    }
}

/// Read a k8s-openapi time value through its RFC 3339 form
fn parse_timestamp<T: Serialize>(time: &T) -> Option<DateTime<Utc>> {
    let serde_json::Value::String(raw) = serde_json::to_value(time).ok()? else {
        return None;
    };
    DateTime::parse_from_rfc3339(&raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Decode a watched object into a native v1 Event
pub fn decode_native_event(obj: &DynamicObject) -> Result<CoreEvent, EventError> {
    obj.clone()
        .try_parse::<CoreEvent>()
        .map_err(|e| EventError::TypeMismatch(e.to_string()))
}
