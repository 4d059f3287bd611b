mod client;
pub mod discovery;
pub mod informer;
mod metadata;

pub use client::connect;
pub use discovery::{ResourceMapper, api_resource_identifier, gvk_from_api_version};
pub use informer::{Informer, ResourceEventHandler};
pub use metadata::{ObjectMeta, ObjectMetadata};
