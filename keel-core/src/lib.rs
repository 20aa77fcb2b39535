// Core library for the Keel framework
// IoC container, route table, middleware pipeline and request dispatch

pub mod autoload;
pub mod config;
pub mod container;
pub mod dispatch;
pub mod error;
pub mod extensions;
pub mod http;
pub mod logging;
pub mod middleware;
pub mod route_constraint;
pub mod route_group;
pub mod route_params;
pub mod route_pattern;
pub mod routing;

// Re-export commonly used types
pub use autoload::*;
pub use config::{HttpConfig, KeelConfig, LoggingConfig};
pub use container::*;
pub use dispatch::*;
pub use error::*;
pub use extensions::Extensions;
pub use http::*;
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput, Rotation};
pub use middleware::*;
pub use route_constraint::*;
pub use route_group::{GroupHandle, ResourceAction, ResourceHandle};
pub use route_params::*;
pub use route_pattern::{DomainPattern, RoutePattern, Segment};
pub use routing::*;
