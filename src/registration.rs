// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Binds the routing engine to informer callbacks.
//!
//! Every watched resource gets one [`RouteHandler`] per direct event type
//! (create, update, delete). Native Events are handled by a single
//! [`MappedEventHandler`] on the `v1/events` informer, which routes each
//! Event by the resource it refers to. Resources routed only through native
//! Events get a handler-less informer so their labels are cached locally.
//!
//! Handlers never fail: every error is logged and drops the one event.

use k8s_openapi::api::core::v1::{Event as CoreEvent, ObjectReference};
use kube::api::DynamicObject;
use kube::discovery::ApiResource;
use kube::runtime::reflector::{ObjectRef, Store};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::{EventError, ResolveError};
use crate::event::{Event, EventType, decode_native_event};
use crate::kubernetes::{
    Informer, ObjectMeta, ResourceEventHandler, ResourceMapper, api_resource_identifier,
    gvk_from_api_version,
};
use crate::router::{RouteTableHandle, match_event, qualify_update};

/// Identifier of the native Event resource
const EVENTS_RESOURCE: &str = "v1/events";

/// A forwarded event, as handed to the dispatcher
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub source: String,
    pub event: Event,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diffs: Vec<String>,
}

/// Receives every event that passed routing
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, source: &str, event: Event, diffs: Vec<String>);
}

/// Dispatcher that forwards notifications over an unbounded channel
pub struct ChannelDispatcher {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelDispatcher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Dispatcher for ChannelDispatcher {
    fn dispatch(&self, source: &str, event: Event, diffs: Vec<String>) {
        let notification = Notification {
            source: source.to_string(),
            event,
            diffs,
        };
        if self.tx.send(notification).is_err() {
            warn!(source, "Notification receiver closed, dropping event");
        }
    }
}

/// Serialize an object for diffing; a failure compares against nothing
fn object_value(obj: &DynamicObject) -> Value {
    serde_json::to_value(obj).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to serialize object for diff");
        Value::Null
    })
}

/// Routes direct watch events of one resource and event type
pub struct RouteHandler {
    source: String,
    api_resource: ApiResource,
    resource: String,
    event_type: EventType,
    table: Arc<RouteTableHandle>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl RouteHandler {
    pub fn new(
        source: &str,
        api_resource: ApiResource,
        event_type: EventType,
        table: Arc<RouteTableHandle>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            source: source.to_string(),
            resource: api_resource_identifier(&api_resource),
            api_resource,
            event_type,
            table,
            dispatcher,
        }
    }

    fn handle(&self, obj: &DynamicObject, old: Option<&DynamicObject>) {
        let table = self.table.load();
        let routes = table.routes(&self.resource, self.event_type);
        if routes.is_empty() {
            return;
        }

        let event = match Event::from_object(obj, self.event_type, &self.api_resource) {
            Ok(event) => event,
            Err(e) => {
                error!(resource = %self.resource, event_type = %self.event_type, error = %e, "Failed to build event, dropping");
                return;
            }
        };

        if !match_event(routes, &event) {
            debug!(resource = %self.resource, name = %event.name, event_type = %self.event_type, "Event did not match any route");
            return;
        }

        let mut diffs = Vec::new();
        if self.event_type == EventType::Update {
            let old = old.map(object_value).unwrap_or(Value::Null);
            let qualification = qualify_update(&old, &object_value(obj), routes);
            if !qualification.qualifies {
                debug!(resource = %self.resource, name = %event.name, "Update has no relevant changes");
                return;
            }
            diffs = qualification.diffs;
        }

        debug!(resource = %self.resource, name = %event.name, event_type = %self.event_type, "Dispatching event");
        self.dispatcher.dispatch(&self.source, event, diffs);
    }
}

impl ResourceEventHandler for RouteHandler {
    fn on_add(&self, obj: &DynamicObject) {
        if self.event_type == EventType::Create {
            self.handle(obj, None);
        }
    }

    fn on_update(&self, old: &DynamicObject, new: &DynamicObject) {
        if self.event_type == EventType::Update {
            self.handle(new, Some(old));
        }
    }

    fn on_delete(&self, obj: &DynamicObject) {
        if self.event_type == EventType::Delete {
            self.handle(obj, None);
        }
    }
}

/// Routes native Events by the resource they refer to
pub struct MappedEventHandler {
    source: String,
    table: Arc<RouteTableHandle>,
    mapper: Arc<ResourceMapper>,
    /// Local caches of watched resources, for involved object labels
    stores: HashMap<String, Store<DynamicObject>>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl MappedEventHandler {
    pub fn new(
        source: &str,
        table: Arc<RouteTableHandle>,
        mapper: Arc<ResourceMapper>,
        stores: HashMap<String, Store<DynamicObject>>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            source: source.to_string(),
            table,
            mapper,
            stores,
            dispatcher,
        }
    }

    /// Labels and annotations of the involved object, if cached locally
    fn involved_meta(
        &self,
        resource: &str,
        api_resource: &ApiResource,
        involved: &ObjectReference,
    ) -> ObjectMeta {
        let (Some(store), Some(name)) = (self.stores.get(resource), involved.name.as_deref()) else {
            return ObjectMeta::default();
        };
        let mut key = ObjectRef::<DynamicObject>::new_with(name, api_resource.clone());
        if let Some(ns) = involved.namespace.as_deref() {
            key = key.within(ns);
        }
        store
            .get(&key)
            .map(|obj| ObjectMeta::from_object(&obj))
            .unwrap_or_default()
    }

    fn handle(&self, obj: &DynamicObject) -> Result<(), EventError> {
        let native = decode_native_event(obj)?;
        let table = self.table.load();

        let native_type = native.type_.as_deref().unwrap_or_default();
        if !table.handles_native_type(native_type) {
            debug!(native_type, "Event type not subscribed");
            return Ok(());
        }
        let Ok(event_type) = native_type.parse::<EventType>() else {
            return Ok(());
        };

        let involved = &native.involved_object;
        let api_version = involved
            .api_version
            .as_deref()
            .ok_or(ResolveError::MissingField("involvedObject.apiVersion"))?;
        let kind = involved
            .kind
            .as_deref()
            .ok_or(ResolveError::MissingField("involvedObject.kind"))?;
        let api_resource = self.mapper.resolve(&gvk_from_api_version(api_version, kind))?;
        let resource = api_resource_identifier(&api_resource);

        if !table.includes_mapped_resource(&resource) {
            debug!(resource = %resource, "Resource not routed through events");
            return Ok(());
        }

        let meta = self.involved_meta(&resource, &api_resource, involved);
        let event = Event::from_native(&native, event_type, &resource, meta)?;
        if !match_event(table.routes(&resource, event_type), &event) {
            debug!(resource = %resource, name = %event.name, reason = %event.reason, "Event did not match any route");
            return Ok(());
        }

        debug!(resource = %resource, name = %event.name, event_type = %event_type, "Dispatching mapped event");
        self.dispatcher.dispatch(&self.source, event, Vec::new());
        Ok(())
    }
}

impl ResourceEventHandler for MappedEventHandler {
    fn on_add(&self, obj: &DynamicObject) {
        if let Err(e) = self.handle(obj) {
            error!(error = %e, "Failed to route native event, dropping");
        }
    }
}

/// Build the informers and handlers for a route table.
///
/// Resources the mapper does not know are skipped with a warning. Informers
/// are returned unstarted.
pub fn register(
    source: &str,
    table: &Arc<RouteTableHandle>,
    mapper: &Arc<ResourceMapper>,
    dispatcher: Arc<dyn Dispatcher>,
) -> Vec<Informer> {
    let snapshot = table.load();
    let mut informers: BTreeMap<String, Informer> = BTreeMap::new();

    for resource in snapshot.watched_resources() {
        let Some(api_resource) = mapper.lookup(resource) else {
            warn!(resource, "Unknown resource type, not watching");
            continue;
        };
        let mut informer = Informer::new(api_resource.clone());
        for event_type in snapshot.event_types(resource) {
            if event_type.is_mapped() {
                continue;
            }
            informer.add_handler(Arc::new(RouteHandler::new(
                source,
                api_resource.clone(),
                event_type,
                table.clone(),
                dispatcher.clone(),
            )));
        }
        informers.insert(resource.to_string(), informer);
    }

    if !snapshot.mapped_event_types().is_empty() {
        // Store-only informers keep labels of mapped-only resources at hand
        for resource in snapshot.mapped_resources() {
            if informers.contains_key(resource) {
                continue;
            }
            let Some(api_resource) = mapper.lookup(resource) else {
                warn!(resource = %resource, "Unknown resource type, labels of its events are unavailable");
                continue;
            };
            informers.insert(resource.clone(), Informer::new(api_resource));
        }

        let stores = informers
            .iter()
            .map(|(resource, informer)| (resource.clone(), informer.store()))
            .collect();
        debug!(mapped = ?snapshot.mapped_resources(), "Routing native events");
        let handler = Arc::new(MappedEventHandler::new(
            source,
            table.clone(),
            mapper.clone(),
            stores,
            dispatcher,
        ));
        informers
            .entry(EVENTS_RESOURCE.to_string())
            .or_insert_with(|| Informer::new(ApiResource::erase::<CoreEvent>(&())))
            .add_handler(handler);
    }

    info!(
        informers = informers.len(),
        routes = snapshot.len(),
        "Registered event handlers"
    );
    informers.into_values().collect()
}
