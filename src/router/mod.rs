//! Routing engine: constraints, route table, matching and update qualification

pub mod constraint;
pub mod diff;
pub mod matcher;
pub mod qualifier;
pub mod route;

pub use constraint::Constraint;
pub use matcher::match_event;
pub use qualifier::qualify_update;
pub use route::{EventConstraints, Route, RouteTable, RouteTableHandle, UpdateSetting};
