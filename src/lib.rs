// Keel - an IoC container and route table for Rust web applications
//
// This library wires named bindings, namespace autoloading and a committed
// route table into a synchronous request dispatcher.

// Re-export core functionality
pub use keel_core::*;

// Handler replies are JSON values
pub use serde_json;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        ClassDescriptor,
        Container,
        Controller,
        Dispatcher,
        Error,
        Handler,
        HttpMethod,
        KeelConfig,
        LogConfig,
        MemoryLoader,
        Middleware,
        Module,
        Params,
        Reply,
        RequestContext,
        RequestNext,
        ResourceAction,
        Resolver,
        Result,
        Route,
        RouteConstraint,
        Router,
    };
    pub use serde_json::json;
}
