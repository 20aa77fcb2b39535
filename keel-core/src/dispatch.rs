//! Request dispatch
//!
//! The [`Dispatcher`] joins a committed [`Router`] with a [`Container`]. For
//! each request it finds the route, resolves the route's middleware and
//! controller through the container and runs them as one [`Pipeline`].
//!
//! Middleware identifiers may carry arguments after a colon
//! (`throttle:60,1`); global middleware run before route middleware.
//! Controllers and middleware are bound in the container as
//! `Arc<dyn Controller>` / `Arc<dyn Middleware>` values:
//!
//! ```
//! use keel_core::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! struct Greeter;
//!
//! impl Controller for Greeter {
//!     fn handle(&self, action: &str, ctx: &mut RequestContext) -> Result<Reply> {
//!         match action {
//!             "hello" => Ok(json!({ "hello": ctx.params.get("name") })),
//!             other => Err(Error::Handler(format!("no action {}", other))),
//!         }
//!     }
//! }
//!
//! let container = Container::new();
//! container.singleton("App/Controllers/Greeter", |_| {
//!     Ok(Arc::new(Greeter) as Arc<dyn Controller>)
//! });
//!
//! let mut router = Router::new();
//! router.get("/hello/:name", "Greeter.hello").unwrap();
//!
//! let dispatcher = Dispatcher::new(router, container)
//!     .unwrap()
//!     .controller_namespace("App/Controllers");
//! let reply = dispatcher.dispatch("GET", "/hello/ada", None).unwrap();
//! assert_eq!(reply, json!({ "hello": "ada" }));
//! ```

use crate::config::HttpConfig;
use crate::container::Container;
use crate::extensions::Extensions;
use crate::http::HttpMethod;
use crate::logging::{debug, trace, warn};
use crate::middleware::{Middleware, Pipeline};
use crate::route_params::Params;
use crate::routing::{Handler, InlineHandler, Route, Router};
use crate::{Error, Result};
use std::sync::Arc;

/// What handlers produce.
pub type Reply = serde_json::Value;

/// Per-request state visible to middleware and handlers.
#[derive(Debug)]
pub struct RequestContext {
    pub method: HttpMethod,
    /// Request path without query string
    pub path: String,
    pub query: Option<String>,
    pub host: Option<String>,
    pub route_name: Option<String>,
    pub params: Params,
    pub extensions: Extensions,
}

impl RequestContext {
    pub fn new(method: HttpMethod, url: &str) -> Self {
        let (path, query) = match url.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (url, None),
        };
        Self {
            method,
            path: path.to_string(),
            query,
            host: None,
            route_name: None,
            params: Params::new(),
            extensions: Extensions::new(),
        }
    }

    /// Shorthand for `self.params.get(name)`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }
}

/// A controller resolved from `Controller.action` handlers.
pub trait Controller: Send + Sync {
    fn handle(&self, action: &str, ctx: &mut RequestContext) -> Result<Reply>;
}

/// Routes requests through middleware to controllers.
pub struct Dispatcher {
    router: Router,
    container: Container,
    global_middleware: Vec<String>,
    controller_namespace: Option<String>,
}

impl Dispatcher {
    /// Wrap a router and container; the router is committed if it isn't yet.
    pub fn new(mut router: Router, container: Container) -> Result<Self> {
        router.commit()?;
        Ok(Self {
            router,
            container,
            global_middleware: Vec::new(),
            controller_namespace: None,
        })
    }

    /// Apply the `[http]` configuration section.
    pub fn with_config(router: Router, container: Container, config: &HttpConfig) -> Result<Self> {
        let mut dispatcher = Self::new(router, container)?.global_middleware(config.global_middleware.clone());
        if let Some(namespace) = &config.controller_namespace {
            dispatcher = dispatcher.controller_namespace(namespace.as_str());
        }
        Ok(dispatcher)
    }

    /// Middleware run before every route's own middleware.
    pub fn global_middleware<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.global_middleware.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Namespace for controllers of routes outside a namespaced group.
    pub fn controller_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.controller_namespace = Some(namespace.into().trim_end_matches('/').to_string());
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Handle one request.
    ///
    /// No matching route yields [`Error::RouteNotFound`].
    pub fn dispatch(&self, method: &str, url: &str, host: Option<&str>) -> Result<Reply> {
        let found = self
            .router
            .find_on_host(url, method, host)?
            .ok_or_else(|| Error::RouteNotFound(format!("{} {}", method.to_ascii_uppercase(), url)))?;

        let route = found.route;
        debug!(
            method = %found.method,
            url,
            pattern = route.pattern().as_str(),
            route = route.name().unwrap_or_default(),
            "Dispatching request"
        );

        let mut ctx = RequestContext::new(found.method, url);
        ctx.host = host.map(str::to_string);
        ctx.route_name = route.name().map(str::to_string);
        ctx.params = found.params;

        let pipeline = self.pipeline_for(route)?;
        let handler = self.handler_for(route)?;

        let reply = pipeline.run(&mut ctx, |ctx| handler(ctx));
        if let Err(err) = &reply {
            warn!(url, error = %err, "Request failed");
        }
        reply
    }

    fn pipeline_for(&self, route: &Route) -> Result<Pipeline<RequestContext, Result<Reply>>> {
        let mut pipeline: Pipeline<RequestContext, Result<Reply>> = Pipeline::new();
        for id in self.global_middleware.iter().chain(route.middleware()) {
            let (name, args) = parse_middleware_id(id);
            let middleware = self.container.make_as::<Arc<dyn Middleware>>(name)?;
            trace!(middleware = name, args = ?args, "Middleware resolved");
            pipeline.push(move |ctx, next| middleware.handle(ctx, next, &args));
        }
        Ok(pipeline)
    }

    fn handler_for(&self, route: &Route) -> Result<InlineHandler> {
        let action = match route.handler() {
            Handler::Inline(handler) => return Ok(handler.clone()),
            Handler::Action(action) => action,
        };

        let (controller, method) = action
            .rsplit_once('.')
            .filter(|(controller, method)| !controller.is_empty() && !method.is_empty())
            .ok_or_else(|| Error::Handler(format!("invalid controller action '{}'", action)))?;

        let id = match route.namespace().or(self.controller_namespace.as_deref()) {
            Some(namespace) => format!("{}/{}", namespace, controller),
            None => controller.to_string(),
        };
        let controller = self.container.make_as::<Arc<dyn Controller>>(&id)?;
        trace!(controller = %id, action = method, "Controller resolved");

        let method = method.to_string();
        Ok(Arc::new(move |ctx: &mut RequestContext| controller.handle(&method, ctx)))
    }
}

/// Split `name:arg1,arg2` into the name and its arguments.
fn parse_middleware_id(id: &str) -> (&str, Vec<String>) {
    match id.split_once(':') {
        Some((name, args)) => (
            name,
            args.split(',')
                .map(str::trim)
                .filter(|arg| !arg.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        None => (id, Vec::new()),
    }
}
