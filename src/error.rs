// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Error types for the routing engine
//!
//! Configuration errors are fatal at load time. Everything else is scoped to
//! a single event: the caller logs it and drops that event.

use thiserror::Error;

/// Invalid routing configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid field path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("unknown event type '{0}'")]
    UnknownEventType(String),

    #[error("invalid resource type '{0}', expected 'version/plural' or 'group/version/plural'")]
    InvalidResourceType(String),

    #[error("resource '{resource}' has no event types")]
    NoEventTypes { resource: String },
}

/// Failure to resolve the identity or metadata of an object
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no resource mapping for kind {kind} in {api_version}")]
    UnknownKind { api_version: String, kind: String },

    #[error("object has no {0}")]
    MissingField(&'static str),
}

/// Failure to build a canonical event
#[derive(Debug, Error)]
pub enum EventError {
    #[error("object is not a v1 Event: {0}")]
    TypeMismatch(String),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Failure while computing a diff for one route
#[derive(Debug, Error)]
pub enum DiffError {
    #[error("cannot render value at '{path}': {source}")]
    Render {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
