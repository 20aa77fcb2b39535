//! Route groups and resources
//!
//! Groups and resources only exist while the router is building. Routes
//! registered inside [`Router::group`] remember which groups enclose them;
//! at commit the group prefixes, domains, namespaces, name prefixes and
//! middleware are folded into each route and the groups are dropped.
//!
//! ```
//! use keel_core::*;
//!
//! let mut router = Router::new();
//! router
//!     .group("/api", |api| {
//!         api.get("/users", "UserController.index")?.name("users");
//!         Ok(())
//!     })
//!     .unwrap()
//!     .middleware(["auth"])
//!     .name_prefix("api");
//! router.commit().unwrap();
//!
//! let route = router.route("api.users").unwrap();
//! assert_eq!(route.pattern().as_str(), "/api/users");
//! assert_eq!(route.middleware(), ["auth"]);
//! ```

use crate::http::HttpMethod;
use crate::logging::debug;
use crate::routing::{Handler, RouteDef, Router};
use crate::{Error, Result};

/// Shared settings of a group, applied at commit.
#[derive(Debug, Clone, Default)]
pub(crate) struct GroupDef {
    pub(crate) prefix: String,
    pub(crate) middleware: Vec<String>,
    pub(crate) namespace: Option<String>,
    pub(crate) domain: Option<String>,
    pub(crate) name_prefix: Option<String>,
}

impl Router {
    /// Register routes under a shared prefix.
    ///
    /// The closure receives the router itself; anything it registers,
    /// including nested groups and resources, belongs to the group. Group
    /// settings made through the returned handle apply at commit. If the
    /// closure fails, its registrations are discarded.
    pub fn group<F>(&mut self, prefix: &str, build: F) -> Result<GroupHandle<'_>>
    where
        F: FnOnce(&mut Router) -> Result<()>,
    {
        self.ensure_building(prefix)?;

        let id = self.groups.len();
        let registered = self.defs.len();
        self.groups.push(GroupDef {
            prefix: prefix.to_string(),
            ..GroupDef::default()
        });

        self.group_stack.push(id);
        let built = build(self);
        self.group_stack.pop();
        if let Err(err) = built {
            // Drop everything the failed closure registered
            self.defs.truncate(registered);
            self.groups.truncate(id);
            debug!(prefix, error = %err, "Route group discarded");
            return Err(err);
        }

        debug!(prefix, depth = self.group_stack.len(), "Route group registered");
        Ok(GroupHandle {
            group: &mut self.groups[id],
        })
    }

    /// Register the seven conventional REST routes for `name`.
    ///
    /// A dotted name nests resources: `users.posts` maps to
    /// `/users/:users_id/posts`.
    pub fn resource(&mut self, name: &str, controller: &str) -> Result<ResourceHandle<'_>> {
        self.ensure_building(name)?;

        let base = resource_base(name)?;
        let start = self.defs.len();

        for action in ResourceAction::ALL {
            let def = self.push_def(RouteDef::new(
                action.methods().to_vec(),
                format!("{}{}", base, action.path_suffix()),
                Handler::Action(format!("{}.{}", controller, action.as_str())),
            ));
            def.name = Some(format!("{}.{}", name, action.as_str()));
            def.resource_action = Some(action);
        }

        debug!(resource = name, controller, path = %base, "Resource registered");
        Ok(ResourceHandle {
            router: self,
            start,
        })
    }
}

fn resource_base(name: &str) -> Result<String> {
    let parts: Vec<&str> = name.split('.').filter(|part| !part.is_empty()).collect();
    let Some((last, parents)) = parts.split_last() else {
        return Err(Error::invalid_pattern(name, "empty resource name"));
    };

    let mut base = String::new();
    for parent in parents {
        let param = parent.rsplit('/').next().unwrap_or(parent).replace('-', "_");
        base.push_str(&format!("/{}/:{}_id", parent.trim_matches('/'), param));
    }
    base.push('/');
    base.push_str(last.trim_matches('/'));
    Ok(base)
}

/// Chainable settings for a group.
#[derive(Debug)]
pub struct GroupHandle<'r> {
    group: &'r mut GroupDef,
}

impl GroupHandle<'_> {
    /// Middleware run before the middleware of every route in the group.
    pub fn middleware<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group.middleware.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Controller namespace for `Controller.action` handlers.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.group.namespace = Some(namespace.into().trim_end_matches('/').to_string());
        self
    }

    /// Host pattern for routes that don't set their own.
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.group.domain = Some(domain.into());
        self
    }

    /// Prefix prepended (with a `.`) to the names of routes in the group.
    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.group.name_prefix = Some(prefix.into());
        self
    }
}

/// The seven conventional resource actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceAction {
    Index,
    Create,
    Store,
    Show,
    Edit,
    Update,
    Destroy,
}

impl ResourceAction {
    pub const ALL: [ResourceAction; 7] = [
        ResourceAction::Index,
        ResourceAction::Create,
        ResourceAction::Store,
        ResourceAction::Show,
        ResourceAction::Edit,
        ResourceAction::Update,
        ResourceAction::Destroy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceAction::Index => "index",
            ResourceAction::Create => "create",
            ResourceAction::Store => "store",
            ResourceAction::Show => "show",
            ResourceAction::Edit => "edit",
            ResourceAction::Update => "update",
            ResourceAction::Destroy => "destroy",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.as_str() == s)
    }

    pub fn methods(&self) -> &'static [HttpMethod] {
        match self {
            ResourceAction::Index
            | ResourceAction::Create
            | ResourceAction::Show
            | ResourceAction::Edit => &[HttpMethod::GET],
            ResourceAction::Store => &[HttpMethod::POST],
            ResourceAction::Update => &[HttpMethod::PUT, HttpMethod::PATCH],
            ResourceAction::Destroy => &[HttpMethod::DELETE],
        }
    }

    fn path_suffix(&self) -> &'static str {
        match self {
            ResourceAction::Index | ResourceAction::Store => "",
            ResourceAction::Create => "/create",
            ResourceAction::Show | ResourceAction::Update | ResourceAction::Destroy => "/:id",
            ResourceAction::Edit => "/:id/edit",
        }
    }
}

/// Chainable settings for the routes of one resource.
#[derive(Debug)]
pub struct ResourceHandle<'r> {
    router: &'r mut Router,
    start: usize,
}

impl ResourceHandle<'_> {
    /// Keep only the listed actions.
    pub fn only<I>(self, actions: I) -> Self
    where
        I: IntoIterator<Item = ResourceAction>,
    {
        let keep: Vec<ResourceAction> = actions.into_iter().collect();
        self.retain(|action| keep.contains(&action))
    }

    /// Drop the listed actions.
    pub fn except<I>(self, actions: I) -> Self
    where
        I: IntoIterator<Item = ResourceAction>,
    {
        let skip: Vec<ResourceAction> = actions.into_iter().collect();
        self.retain(|action| !skip.contains(&action))
    }

    /// Drop the form-rendering `create` and `edit` actions.
    pub fn api_only(self) -> Self {
        self.except([ResourceAction::Create, ResourceAction::Edit])
    }

    /// Append middleware to every remaining action.
    pub fn middleware<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        for def in &mut self.router.defs[self.start..] {
            def.middleware.extend(ids.iter().cloned());
        }
        self
    }

    /// Append middleware to some actions only.
    pub fn middleware_for<A, I, S>(mut self, actions: A, ids: I) -> Self
    where
        A: IntoIterator<Item = ResourceAction>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let actions: Vec<ResourceAction> = actions.into_iter().collect();
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        for def in &mut self.router.defs[self.start..] {
            if def.resource_action.is_some_and(|action| actions.contains(&action)) {
                def.middleware.extend(ids.iter().cloned());
            }
        }
        self
    }

    fn retain(mut self, keep: impl Fn(ResourceAction) -> bool) -> Self {
        let routes = self.router.defs.split_off(self.start);
        self.router.defs.extend(
            routes
                .into_iter()
                .filter(|def| def.resource_action.is_some_and(&keep)),
        );
        self
    }
}
