// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Informer: add/update/delete callbacks on top of a kube-rs watcher.
//!
//! Each informer owns a reflector store for one resource kind. The store
//! holds the last seen version of every object, which is what update
//! callbacks receive as the old object.
//!
//! The first list after startup only fills the store. Later re-lists (after a
//! watch reconnect) are compared against the store so that changes made while
//! disconnected still produce callbacks.

use futures::{StreamExt, TryStreamExt};
use kube::api::{Api, DynamicObject};
use kube::discovery::ApiResource;
use kube::runtime::WatchStreamExt;
use kube::runtime::reflector::store::Writer;
use kube::runtime::reflector::{ObjectRef, Store};
use kube::runtime::watcher::{self, Event as WatchEvent};
use kube::{Client, ResourceExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::discovery::api_resource_identifier;

/// Callbacks for changes of one resource kind
///
/// Implementations must not block: they run on the watch task of their kind.
pub trait ResourceEventHandler: Send + Sync {
    fn on_add(&self, _obj: &DynamicObject) {}
    fn on_update(&self, _old: &DynamicObject, _new: &DynamicObject) {}
    fn on_delete(&self, _obj: &DynamicObject) {}
}

/// Object identity within a kind: (namespace, name)
type ObjectKey = (Option<String>, String);

fn object_key(obj: &DynamicObject) -> ObjectKey {
    (obj.namespace(), obj.name_any())
}

/// Watches one resource kind and fans out changes to handlers
pub struct Informer {
    api_resource: ApiResource,
    resource: String,
    writer: Writer<DynamicObject>,
    handlers: Vec<Arc<dyn ResourceEventHandler>>,
    /// Whether the first list has completed
    synced: bool,
    /// Objects seen during the current re-list
    relisted: HashSet<ObjectKey>,
}

impl Informer {
    pub fn new(api_resource: ApiResource) -> Self {
        Self {
            resource: api_resource_identifier(&api_resource),
            writer: Writer::new(api_resource.clone()),
            api_resource,
            handlers: Vec::new(),
            synced: false,
            relisted: HashSet::new(),
        }
    }

    /// Canonical identifier of the watched resource
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Read handle to the local cache
    pub fn store(&self) -> Store<DynamicObject> {
        self.writer.as_reader()
    }

    pub fn add_handler(&mut self, handler: Arc<dyn ResourceEventHandler>) {
        self.handlers.push(handler);
    }

    fn cached(&self, obj: &DynamicObject) -> Option<Arc<DynamicObject>> {
        let key = ObjectRef::from_obj_with(obj, self.api_resource.clone());
        self.writer.as_reader().get(&key)
    }

    /// Fire add or update for an applied object, comparing with the cache
    fn applied(&self, obj: &DynamicObject) {
        match self.cached(obj) {
            Some(old) => {
                let unchanged = old.resource_version().is_some()
                    && old.resource_version() == obj.resource_version();
                if !unchanged {
                    for handler in &self.handlers {
                        handler.on_update(&old, obj);
                    }
                }
            }
            None => {
                for handler in &self.handlers {
                    handler.on_add(obj);
                }
            }
        }
    }

    /// Process one watcher event: run callbacks, then update the cache
    pub fn handle(&mut self, event: WatchEvent<DynamicObject>) {
        match &event {
            WatchEvent::Apply(obj) => self.applied(obj),
            WatchEvent::Delete(obj) => {
                for handler in &self.handlers {
                    handler.on_delete(obj);
                }
            }
            WatchEvent::Init => {
                self.relisted.clear();
            }
            WatchEvent::InitApply(obj) => {
                if self.synced {
                    self.relisted.insert(object_key(obj));
                    self.applied(obj);
                }
            }
            WatchEvent::InitDone => {
                if self.synced {
                    // The store still holds the pre-relist state here
                    for old in self.writer.as_reader().state() {
                        if !self.relisted.contains(&object_key(&old)) {
                            for handler in &self.handlers {
                                handler.on_delete(&old);
                            }
                        }
                    }
                    self.relisted.clear();
                } else {
                    info!(resource = %self.resource, "Initial list complete");
                }
                self.synced = true;
            }
        }
        self.writer.apply_watcher_event(&event);
    }

    /// Watch the resource until the stream ends
    ///
    /// Watch errors are retried with backoff and never end the loop.
    pub async fn run(mut self, client: Client) {
        let api: Api<DynamicObject> = Api::all_with(client, &self.api_resource);
        let mut stream = watcher::watcher(api, watcher::Config::default())
            .default_backoff()
            .boxed();

        debug!(resource = %self.resource, "Starting watch");
        loop {
            match stream.try_next().await {
                Ok(Some(event)) => self.handle(event),
                Ok(None) => break,
                Err(e) => {
                    warn!(resource = %self.resource, error = %e, "Watch error, retrying");
                }
            }
        }
        warn!(resource = %self.resource, "Watch stream ended");
    }
}
