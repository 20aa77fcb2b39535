//! Route table
//!
//! A [`Router`] is built in two phases. While *building*, routes, groups and
//! resources are registered in order. [`Router::commit`] then validates
//! names and patterns, flattens groups and compiles every pattern; after
//! that the table is read-only and can be shared between request workers
//! without locking.
//!
//! Matching walks routes in registration order and the first match wins:
//!
//! ```
//! use keel_core::*;
//!
//! let mut router = Router::new();
//! router.get("/users/new", "UserController.create").unwrap();
//! router.get("/users/:id", "UserController.show").unwrap().name("users.show");
//! router.commit().unwrap();
//!
//! let found = router.find("/users/new", "GET").unwrap().unwrap();
//! assert_eq!(found.route.pattern().as_str(), "/users/new");
//!
//! let found = router.find("/users/42", "GET").unwrap().unwrap();
//! assert_eq!(found.params.get("id"), Some("42"));
//! assert_eq!(router.url_for("users.show", &found.params).unwrap(), "/users/42");
//! ```

use crate::dispatch::{Reply, RequestContext};
use crate::http::HttpMethod;
use crate::logging::{debug, info, trace};
use crate::route_constraint::RouteConstraint;
use crate::route_group::{GroupDef, ResourceAction};
use crate::route_params::{Params, WILDCARD_PARAM};
use crate::route_pattern::{ConstraintSpec, DomainPattern, RoutePattern, join_paths, split_path};
use crate::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::iter;
use std::sync::Arc;

/// An inline route handler
pub type InlineHandler = Arc<dyn Fn(&mut RequestContext) -> Result<Reply> + Send + Sync>;

/// What a route runs when it matches.
#[derive(Clone)]
pub enum Handler {
    /// A `Controller.action` reference resolved through the container
    Action(String),
    Inline(InlineHandler),
}

impl Handler {
    pub fn inline<F>(handler: F) -> Self
    where
        F: Fn(&mut RequestContext) -> Result<Reply> + Send + Sync + 'static,
    {
        Handler::Inline(Arc::new(handler))
    }

    /// The `Controller.action` string, if this is not an inline handler.
    pub fn action(&self) -> Option<&str> {
        match self {
            Handler::Action(action) => Some(action),
            Handler::Inline(_) => None,
        }
    }
}

impl From<&str> for Handler {
    fn from(action: &str) -> Self {
        Handler::Action(action.to_string())
    }
}

impl From<String> for Handler {
    fn from(action: String) -> Self {
        Handler::Action(action)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Action(action) => f.debug_tuple("Action").field(action).finish(),
            Handler::Inline(_) => f.write_str("Inline(..)"),
        }
    }
}

/// A route as registered, before commit.
pub(crate) struct RouteDef {
    pub(crate) methods: Vec<HttpMethod>,
    pub(crate) pattern: String,
    pub(crate) handler: Handler,
    pub(crate) name: Option<String>,
    pub(crate) middleware: Vec<String>,
    pub(crate) constraints: Vec<(String, ConstraintSpec)>,
    pub(crate) domain: Option<String>,
    /// Enclosing groups, outermost first
    pub(crate) groups: Vec<usize>,
    pub(crate) resource_action: Option<ResourceAction>,
}

impl RouteDef {
    pub(crate) fn new(methods: Vec<HttpMethod>, pattern: String, handler: Handler) -> Self {
        Self {
            methods,
            pattern,
            handler,
            name: None,
            middleware: Vec::new(),
            constraints: Vec::new(),
            domain: None,
            groups: Vec::new(),
            resource_action: None,
        }
    }
}

/// A committed route.
pub struct Route {
    methods: Vec<HttpMethod>,
    pattern: RoutePattern,
    handler: Handler,
    name: Option<String>,
    middleware: Vec<String>,
    namespace: Option<String>,
    domain: Option<DomainPattern>,
}

impl Route {
    pub fn methods(&self) -> &[HttpMethod] {
        &self.methods
    }

    pub fn pattern(&self) -> &RoutePattern {
        &self.pattern
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Middleware identifiers in execution order (groups first).
    pub fn middleware(&self) -> &[String] {
        &self.middleware
    }

    /// Controller namespace inherited from the innermost group.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn domain(&self) -> Option<&DomainPattern> {
        self.domain.as_ref()
    }

    /// HEAD requests are served by GET routes.
    pub fn accepts(&self, method: HttpMethod) -> bool {
        self.methods.contains(&method)
            || (method == HttpMethod::HEAD && self.methods.contains(&HttpMethod::GET))
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("methods", &self.methods)
            .field("pattern", &self.pattern.as_str())
            .field("handler", &self.handler)
            .field("name", &self.name)
            .field("middleware", &self.middleware)
            .finish()
    }
}

/// A successful lookup.
#[derive(Debug)]
pub struct RouteMatch<'r> {
    pub route: &'r Route,
    pub params: Params,
    /// The request method that was matched
    pub method: HttpMethod,
}

struct RouteTable {
    routes: Vec<Route>,
    by_name: HashMap<String, usize>,
}

/// Ordered route registry with a building and a committed phase.
#[derive(Default)]
pub struct Router {
    pub(crate) defs: Vec<RouteDef>,
    pub(crate) groups: Vec<GroupDef>,
    pub(crate) group_stack: Vec<usize>,
    table: Option<RouteTable>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route for a set of methods.
    pub fn add<M, H>(&mut self, methods: M, pattern: &str, handler: H) -> Result<RouteHandle<'_>>
    where
        M: IntoIterator<Item = HttpMethod>,
        H: Into<Handler>,
    {
        self.ensure_building(pattern)?;

        let mut methods: Vec<HttpMethod> = methods.into_iter().collect();
        methods.dedup();
        trace!(methods = ?methods, pattern, "Route registered");

        let def = self.push_def(RouteDef::new(methods, pattern.to_string(), handler.into()));
        Ok(RouteHandle { def })
    }

    pub fn get<H: Into<Handler>>(&mut self, pattern: &str, handler: H) -> Result<RouteHandle<'_>> {
        self.add([HttpMethod::GET], pattern, handler)
    }

    pub fn post<H: Into<Handler>>(&mut self, pattern: &str, handler: H) -> Result<RouteHandle<'_>> {
        self.add([HttpMethod::POST], pattern, handler)
    }

    pub fn put<H: Into<Handler>>(&mut self, pattern: &str, handler: H) -> Result<RouteHandle<'_>> {
        self.add([HttpMethod::PUT], pattern, handler)
    }

    pub fn patch<H: Into<Handler>>(&mut self, pattern: &str, handler: H) -> Result<RouteHandle<'_>> {
        self.add([HttpMethod::PATCH], pattern, handler)
    }

    pub fn delete<H: Into<Handler>>(&mut self, pattern: &str, handler: H) -> Result<RouteHandle<'_>> {
        self.add([HttpMethod::DELETE], pattern, handler)
    }

    /// Register a route answering every method.
    pub fn any<H: Into<Handler>>(&mut self, pattern: &str, handler: H) -> Result<RouteHandle<'_>> {
        self.add(HttpMethod::ALL, pattern, handler)
    }

    pub(crate) fn ensure_building(&self, what: &str) -> Result<()> {
        if self.table.is_some() {
            debug!(registration = what, "Rejected registration after commit");
            return Err(Error::RegistrationAfterCommit(what.to_string()));
        }
        Ok(())
    }

    pub(crate) fn push_def(&mut self, mut def: RouteDef) -> &mut RouteDef {
        def.groups = self.group_stack.clone();
        self.defs.push(def);
        let last = self.defs.len() - 1;
        &mut self.defs[last]
    }

    /// Freeze the table.
    ///
    /// Flattens groups, compiles every pattern and checks route names are
    /// unique. Committing an already committed router is a no-op.
    pub fn commit(&mut self) -> Result<()> {
        if self.table.is_some() {
            debug!("Router already committed");
            return Ok(());
        }

        let mut routes = Vec::with_capacity(self.defs.len());
        let mut by_name = HashMap::new();

        for def in &self.defs {
            let route = self.compile(def)?;
            if let Some(name) = &route.name {
                if by_name.insert(name.clone(), routes.len()).is_some() {
                    return Err(Error::DuplicateRouteName(name.clone()));
                }
            }
            routes.push(route);
        }

        info!(routes = routes.len(), named = by_name.len(), "Route table committed");

        self.defs.clear();
        self.groups.clear();
        self.table = Some(RouteTable { routes, by_name });
        Ok(())
    }

    fn compile(&self, def: &RouteDef) -> Result<Route> {
        let groups: Vec<&GroupDef> = def.groups.iter().map(|&id| &self.groups[id]).collect();

        let source = join_paths(
            groups
                .iter()
                .map(|group| group.prefix.as_str())
                .chain(iter::once(def.pattern.as_str())),
        );
        if def.methods.is_empty() {
            return Err(Error::invalid_pattern(&source, "route has no HTTP methods"));
        }
        let pattern = RoutePattern::compile(&source, &def.constraints)?;

        let domain = def
            .domain
            .as_deref()
            .or_else(|| groups.iter().rev().find_map(|group| group.domain.as_deref()))
            .map(|domain| DomainPattern::compile(domain, &def.constraints))
            .transpose()?;

        if let Some(domain) = &domain {
            if let Some(shared) = domain
                .param_names()
                .find(|name| pattern.param_names().any(|path_name| path_name == *name))
            {
                return Err(Error::invalid_pattern(
                    &source,
                    format!("parameter '{}' appears in both domain and path", shared),
                ));
            }
        }

        for (param, _) in &def.constraints {
            if param == WILDCARD_PARAM {
                return Err(Error::invalid_pattern(&source, "wildcard captures cannot be constrained"));
            }
            let declared = pattern.param_names().any(|name| name == param)
                || domain
                    .as_ref()
                    .is_some_and(|domain| domain.param_names().any(|name| name == param));
            if !declared {
                return Err(Error::invalid_pattern(
                    &source,
                    format!("constraint for undeclared parameter '{}'", param),
                ));
            }
        }

        let middleware = groups
            .iter()
            .flat_map(|group| group.middleware.iter().cloned())
            .chain(def.middleware.iter().cloned())
            .collect();

        let namespace = groups.iter().rev().find_map(|group| group.namespace.clone());

        let name = def.name.as_ref().map(|name| {
            let prefixes: Vec<&str> = groups
                .iter()
                .filter_map(|group| group.name_prefix.as_deref())
                .collect();
            if prefixes.is_empty() {
                name.clone()
            } else {
                format!("{}.{}", prefixes.join("."), name)
            }
        });

        Ok(Route {
            methods: def.methods.clone(),
            pattern,
            handler: def.handler.clone(),
            name,
            middleware,
            namespace,
            domain,
        })
    }

    pub fn is_committed(&self) -> bool {
        self.table.is_some()
    }

    /// Committed routes in registration order; empty while building.
    pub fn routes(&self) -> &[Route] {
        self.table
            .as_ref()
            .map(|table| table.routes.as_slice())
            .unwrap_or_default()
    }

    /// Look up a committed route by name.
    pub fn route(&self, name: &str) -> Option<&Route> {
        let table = self.table.as_ref()?;
        table.by_name.get(name).map(|&index| &table.routes[index])
    }

    /// Match a request path, ignoring domain-bound routes.
    ///
    /// `Ok(None)` is the ordinary not-found outcome; an error means the
    /// router has not been committed.
    pub fn find(&self, url: &str, method: &str) -> Result<Option<RouteMatch<'_>>> {
        self.find_on_host(url, method, None)
    }

    /// Match a request path and host.
    pub fn find_on_host(
        &self,
        url: &str,
        method: &str,
        host: Option<&str>,
    ) -> Result<Option<RouteMatch<'_>>> {
        let table = self
            .table
            .as_ref()
            .ok_or(Error::RouterNotCommitted("matching requests"))?;

        let Some(method) = HttpMethod::parse(method) else {
            trace!(method, url, "Unknown HTTP method");
            return Ok(None);
        };
        let parts = split_path(url);

        for route in &table.routes {
            if !route.accepts(method) {
                continue;
            }

            let mut params = Params::new();
            if let Some(domain) = &route.domain {
                match host {
                    Some(host) if domain.matches(host, &mut params) => {}
                    _ => continue,
                }
            }

            if route.pattern.matches(&parts, &mut params) {
                trace!(
                    method = %method,
                    url,
                    pattern = route.pattern.as_str(),
                    "Route matched"
                );
                return Ok(Some(RouteMatch {
                    route,
                    params,
                    method,
                }));
            }
        }

        trace!(method = %method, url, "No route matched");
        Ok(None)
    }

    /// Build a path for a named route.
    ///
    /// `target` is a route name, or failing that a `Controller.action`
    /// handler string.
    pub fn url_for(&self, target: &str, params: &Params) -> Result<String> {
        let table = self
            .table
            .as_ref()
            .ok_or(Error::RouterNotCommitted("building URLs"))?;

        let route = table
            .by_name
            .get(target)
            .map(|&index| &table.routes[index])
            .or_else(|| {
                table
                    .routes
                    .iter()
                    .find(|route| route.handler.action() == Some(target))
            })
            .ok_or_else(|| Error::UnknownRoute(target.to_string()))?;

        route.pattern.build(route.name().unwrap_or(target), params)
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("committed", &self.is_committed())
            .field("pending", &self.defs.len())
            .field("routes", &self.routes())
            .finish()
    }
}

/// Chainable settings for a freshly registered route.
pub struct RouteHandle<'r> {
    def: &'r mut RouteDef,
}

impl fmt::Debug for RouteHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteHandle")
            .field("methods", &self.def.methods)
            .field("pattern", &self.def.pattern)
            .finish()
    }
}

impl RouteHandle<'_> {
    /// Name the route for reverse lookup.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.def.name = Some(name.into());
        self
    }

    /// Append middleware identifiers.
    pub fn middleware<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.def.middleware.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Require a parameter to match a regular expression (whole value).
    pub fn constrain(mut self, param: impl Into<String>, regex: impl Into<String>) -> Self {
        self.def
            .constraints
            .push((param.into(), ConstraintSpec::Regex(regex.into())));
        self
    }

    pub fn constrain_with(mut self, param: impl Into<String>, constraint: impl RouteConstraint + 'static) -> Self {
        self.def
            .constraints
            .push((param.into(), ConstraintSpec::Custom(Arc::new(constraint))));
        self
    }

    /// Only match requests for this host pattern.
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.def.domain = Some(domain.into());
        self
    }
}
