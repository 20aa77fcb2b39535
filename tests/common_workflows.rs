//! Integration tests for common Keel workflows.
//!
//! These tests bootstrap a small application the way a real one would:
//! configuration, bindings, routes, commit, then requests.

use keel::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

// =============================================================================
// Application fixtures
// =============================================================================

struct Database {
    queries: AtomicUsize,
}

impl Database {
    fn find_user(&self, id: u64) -> Option<String> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        match id {
            1 => Some("ada".to_string()),
            2 => Some("grace".to_string()),
            _ => None,
        }
    }
}

struct UserController {
    db: Arc<Database>,
}

impl Controller for UserController {
    fn handle(&self, action: &str, ctx: &mut RequestContext) -> Result<Reply> {
        match action {
            "index" => Ok(json!(["ada", "grace"])),
            "show" => {
                let id = ctx
                    .params
                    .get_parsed::<u64>("id")
                    .and_then(|parsed| parsed.ok())
                    .ok_or_else(|| Error::Handler("id must be numeric".into()))?;
                Ok(json!({ "id": id, "name": self.db.find_user(id) }))
            }
            other => Err(Error::Handler(format!("UserController has no action {}", other))),
        }
    }
}

struct ApiToken;

impl Middleware for ApiToken {
    fn handle(&self, ctx: &mut RequestContext, next: RequestNext<'_>, args: &[String]) -> Result<Reply> {
        let scope = args.first().map(String::as_str).unwrap_or("read");
        match ctx.query.as_deref() {
            Some(query) if query.contains("token=secret") => {
                let mut reply = next.run(ctx)?;
                if let Some(object) = reply.as_object_mut() {
                    object.insert("scope".into(), json!(scope));
                }
                Ok(reply)
            }
            _ => Ok(json!({ "error": "forbidden" })),
        }
    }
}

fn bootstrap(config: &KeelConfig) -> Result<Dispatcher> {
    let container = Container::new();
    container.singleton("Database", |_| {
        Ok(Database {
            queries: AtomicUsize::new(0),
        })
    });
    container.alias("Database", "db");
    container.bind("App/Controllers/Http/UserController", |r: &Resolver<'_>| {
        let db = r.resolve::<Database>("db")?;
        Ok(Arc::new(UserController { db }) as Arc<dyn Controller>)
    });
    container.singleton("token", |_| Ok(Arc::new(ApiToken) as Arc<dyn Middleware>));

    let mut router = Router::new();
    router.get("/", Handler::inline(|_| Ok(json!("welcome"))))?.name("home");
    router
        .group("/api", |api| {
            api.resource("users", "UserController")?
                .only([ResourceAction::Index, ResourceAction::Show]);
            Ok(())
        })?
        .middleware(["token:admin"])
        .name_prefix("api");

    Dispatcher::with_config(router, container, &config.http)
}

fn config() -> KeelConfig {
    KeelConfig::from_toml_str(
        r#"
        [logging]
        level = "warn"

        [http]
        controller_namespace = "App/Controllers/Http"
        "#,
    )
    .unwrap()
}

// =============================================================================
// Bootstrap and dispatch
// =============================================================================

#[test]
fn test_bootstrap_and_serve_requests() {
    let app = bootstrap(&config()).unwrap();
    assert!(app.router().is_committed());

    assert_eq!(app.dispatch("GET", "/", None).unwrap(), json!("welcome"));

    let reply = app
        .dispatch("GET", "/api/users/2?token=secret", None)
        .unwrap();
    assert_eq!(reply, json!({ "id": 2, "name": "grace", "scope": "admin" }));

    let denied = app.dispatch("GET", "/api/users", None).unwrap();
    assert_eq!(denied, json!({ "error": "forbidden" }));
}

#[test]
fn test_singleton_shared_across_requests() {
    let app = bootstrap(&config()).unwrap();
    app.dispatch("GET", "/api/users/1?token=secret", None).unwrap();
    app.dispatch("GET", "/api/users/3?token=secret", None).unwrap();

    let db = app.container().resolve::<Database>("Database").unwrap();
    assert_eq!(db.queries.load(Ordering::SeqCst), 2);
}

#[test]
fn test_unknown_routes_and_methods() {
    let app = bootstrap(&config()).unwrap();

    let err = app.dispatch("GET", "/nowhere", None).unwrap_err();
    assert_eq!(err.status_code(), 404);

    // `only` removed the store action
    let err = app.dispatch("POST", "/api/users", None).unwrap_err();
    assert!(matches!(err, Error::RouteNotFound(_)));
}

#[test]
fn test_handler_errors_are_500() {
    let app = bootstrap(&config()).unwrap();
    let err = app
        .dispatch("GET", "/api/users/abc?token=secret", None)
        .unwrap_err();
    assert!(matches!(err, Error::Handler(_)));
    assert_eq!(err.status_code(), 500);
}

// =============================================================================
// Reverse routing and introspection
// =============================================================================

#[test]
fn test_reverse_routing_after_bootstrap() {
    let app = bootstrap(&config()).unwrap();
    let router = app.router();

    assert_eq!(router.url_for("home", &Params::new()).unwrap(), "/");

    let mut params = Params::new();
    params.insert("id", "42");
    assert_eq!(router.url_for("api.users.show", &params).unwrap(), "/api/users/42");
    assert_eq!(
        router.url_for("UserController.show", &params).unwrap(),
        "/api/users/42"
    );

    let names: Vec<_> = router.routes().iter().filter_map(|r| r.name()).collect();
    assert_eq!(names, ["home", "api.users.index", "api.users.show"]);
}

// =============================================================================
// Testing with fakes
// =============================================================================

#[test]
fn test_fake_controller_dependency() {
    let app = bootstrap(&config()).unwrap();
    let container = app.container();

    container.fake("Database", |_| {
        Ok(Database {
            queries: AtomicUsize::new(100),
        })
    });
    assert!(container.has_fake("Database"));

    // The alias "db" resolves to the faked canonical binding
    let reply = app
        .dispatch("GET", "/api/users/1?token=secret", None)
        .unwrap();
    assert_eq!(reply["name"], "ada");
    let real = container.make_as::<Database>("Database");
    assert_eq!(real.unwrap().queries.load(Ordering::SeqCst), 100);

    assert!(container.restore("Database"));
    let real = container.resolve::<Database>("Database").unwrap();
    assert_eq!(real.queries.load(Ordering::SeqCst), 0);
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_environment_overrides() {
    let mut config = config();
    config
        .apply_env(|key| match key {
            "KEEL_CONTROLLER_NAMESPACE" => Some("App/Controllers/Http/".to_string()),
            "KEEL_LOG_LEVEL" => Some("debug".to_string()),
            _ => None,
        })
        .unwrap();

    assert_eq!(config.logging.level, keel::LogLevel::Debug);
    let log = config.log_config();
    assert_eq!(log.level, keel::LogLevel::Debug);

    // A trailing slash on the namespace is tolerated
    let app = bootstrap(&config).unwrap();
    assert!(app.dispatch("GET", "/api/users?token=secret", None).is_ok());
}

#[test]
fn test_registration_after_bootstrap_is_rejected() {
    let mut router = Router::new();
    router.get("/", "HomeController.index").unwrap();
    router.commit().unwrap();

    let err = router.post("/late", "LateController.store").unwrap_err();
    assert!(err.is_configuration());
}
