// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Common object metadata shared by every resource kind

use kube::api::DynamicObject;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::ResolveError;

/// Labels and annotations of an object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ObjectMeta {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn from_object(obj: &DynamicObject) -> Self {
        Self {
            labels: obj.metadata.labels.clone().unwrap_or_default(),
            annotations: obj.metadata.annotations.clone().unwrap_or_default(),
        }
    }
}

/// Identity and metadata extracted from a watched object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub name: String,
    /// Empty for cluster-scoped objects
    pub namespace: String,
    pub meta: ObjectMeta,
}

impl ObjectMetadata {
    pub fn from_object(obj: &DynamicObject) -> Result<Self, ResolveError> {
        let name = obj
            .metadata
            .name
            .clone()
            .ok_or(ResolveError::MissingField("metadata.name"))?;
        Ok(Self {
            name,
            namespace: obj.metadata.namespace.clone().unwrap_or_default(),
            meta: ObjectMeta::from_object(obj),
        })
    }
}
