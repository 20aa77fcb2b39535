use keel_core::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

struct Database {
    url: String,
}

struct UserRepository {
    db: Arc<Database>,
}

struct UserController {
    users: Arc<UserRepository>,
    greeting: Arc<String>,
}

fn database_class() -> ClassDescriptor {
    ClassDescriptor::new("Database", |_| {
        Ok(Arc::new(Database {
            url: "postgres://localhost/keel".to_string(),
        }) as Instance)
    })
}

fn repository_class() -> ClassDescriptor {
    ClassDescriptor::new("UserRepository", |deps| {
        let db = deps[0]
            .clone()
            .downcast::<Database>()
            .map_err(|_| Error::Handler("expected Database".into()))?;
        Ok(Arc::new(UserRepository { db }) as Instance)
    })
    .inject(["App/Services/Database"])
}

fn controller_class() -> ClassDescriptor {
    ClassDescriptor::new("UserController", |deps| {
        let mut deps = deps.into_iter();
        let users = deps
            .next()
            .and_then(|dep| dep.downcast::<UserRepository>().ok())
            .ok_or_else(|| Error::Handler("expected UserRepository".into()))?;
        let greeting = deps
            .next()
            .and_then(|dep| dep.downcast::<String>().ok())
            .ok_or_else(|| Error::Handler("expected greeting".into()))?;
        Ok(Arc::new(UserController { users, greeting }) as Instance)
    })
    .inject(["App/Repositories/UserRepository", "Greeting"])
}

fn app_loader() -> MemoryLoader {
    MemoryLoader::new()
        .with("/app/Services/Database", Module::class(database_class()))
        .with("/app/Repositories/UserRepository", Module::class(repository_class()))
        .with("/app/Controllers/UserController", Module::class(controller_class()))
        .with("/app/Config/app", Module::value(String::from("keel")))
}

#[test]
fn test_make_injects_declared_dependencies() {
    let container = Container::with_loader(app_loader());
    container.autoload("/app", "App");
    container.bind("Greeting", |_| Ok(String::from("hi")));

    let controller = container
        .make_as::<UserController>("App/Controllers/UserController")
        .unwrap();
    assert_eq!(controller.users.db.url, "postgres://localhost/keel");
    assert_eq!(*controller.greeting, "hi");
}

#[test]
fn test_class_without_dependencies() {
    let container = Container::with_loader(app_loader());
    container.autoload("/app", "App");

    let db = container.make_as::<Database>("App/Services/Database").unwrap();
    assert_eq!(db.url, "postgres://localhost/keel");
}

#[test]
fn test_get_returns_class_descriptor() {
    let container = Container::with_loader(app_loader());
    container.autoload("/app", "App");

    let class = container
        .resolve::<ClassDescriptor>("App/Repositories/UserRepository")
        .unwrap();
    assert_eq!(class.name(), "UserRepository");
    assert_eq!(class.dependencies(), ["App/Services/Database"]);
}

#[test]
fn test_autoloaded_value() {
    let container = Container::with_loader(app_loader());
    container.autoload("/app/", "/App/");

    let name = container.resolve::<String>("App/Config/app").unwrap();
    assert_eq!(*name, "keel");
    // `make` on a plain value returns it unchanged
    let made = container.make_as::<String>("App/Config/app").unwrap();
    assert!(Arc::ptr_eq(&name, &made));
}

#[test]
fn test_missing_dependency_surfaces_not_found() {
    let container = Container::with_loader(app_loader());
    container.autoload("/app", "App");

    // "Greeting" is never bound
    assert!(matches!(
        container.make("App/Controllers/UserController"),
        Err(Error::BindingNotFound(id)) if id == "Greeting"
    ));
}

#[test]
fn test_missing_module() {
    let container = Container::with_loader(app_loader());
    container.autoload("/app", "App");
    assert!(matches!(
        container.get("App/Nope"),
        Err(Error::ModuleLoad { .. })
    ));
    // Outside every namespace
    assert!(matches!(
        container.get("Vendor/Thing"),
        Err(Error::BindingNotFound(_))
    ));
}

#[test]
fn test_autoload_without_loader() {
    let container = Container::new();
    container.autoload("/app", "App");
    assert!(matches!(
        container.get("App/Services/Database"),
        Err(Error::LoaderUnavailable(_))
    ));
}

#[test]
fn test_binding_wins_over_autoload() {
    let container = Container::with_loader(app_loader());
    container.autoload("/app", "App");
    container.bind("App/Config/app", |_| Ok(String::from("bound")));
    assert_eq!(*container.resolve::<String>("App/Config/app").unwrap(), "bound");
}

fn counting_loader(loads: Arc<AtomicUsize>) -> impl ModuleLoader + 'static {
    move |path: &Path| -> Result<Module> {
        loads.fetch_add(1, Ordering::SeqCst);
        Ok(Module::value(path.to_path_buf()))
    }
}

#[test]
fn test_same_file_shares_cache_slot() {
    let loads = Arc::new(AtomicUsize::new(0));
    let container = Container::with_loader(counting_loader(loads.clone()));
    container.autoload("/srv/app", "App");
    container.autoload("/srv/app/Models", "Models");

    let a = container.resolve::<PathBuf>("App/Models/User").unwrap();
    let b = container.resolve::<PathBuf>("Models/User").unwrap();
    let c = container.resolve::<PathBuf>("App/Controllers/../Models/User").unwrap();

    assert_eq!(*a, PathBuf::from("/srv/app/Models/User"));
    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&a, &c));
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[test]
fn test_identifier_cannot_escape_namespace_directory() {
    let loads = Arc::new(AtomicUsize::new(0));
    let container = Container::with_loader(counting_loader(loads.clone()));
    container.autoload("/srv/app", "App");

    assert!(matches!(
        container.get("App/../../etc/passwd"),
        Err(Error::BindingNotFound(id)) if id == "App/../../etc/passwd"
    ));
    assert!(matches!(
        container.get("App/Models/../../app-secrets/key"),
        Err(Error::BindingNotFound(_))
    ));
    assert_eq!(loads.load(Ordering::SeqCst), 0);

    // Everything that does load stays evictable by namespace
    container.get("App/Models/../User").unwrap();
    assert_eq!(container.clear_autoload_cache(Some("App")), 1);
}

#[test]
fn test_longest_namespace_wins() {
    let container = Container::with_loader(|path: &Path| -> Result<Module> {
        Ok(Module::value(path.to_path_buf()))
    });
    container.autoload("/srv/app", "App");
    container.autoload("/srv/models", "App/Models");

    let path = container.resolve::<PathBuf>("App/Models/User").unwrap();
    assert_eq!(*path, PathBuf::from("/srv/models/User"));
    let path = container.resolve::<PathBuf>("App/Http/Kernel").unwrap();
    assert_eq!(*path, PathBuf::from("/srv/app/Http/Kernel"));
}

#[test]
fn test_clear_autoload_cache_forces_reload() {
    let loads = Arc::new(AtomicUsize::new(0));
    let container = Container::with_loader(counting_loader(loads.clone()));
    container.autoload("/srv/app", "App");
    container.autoload("/srv/lib", "Lib");

    container.get("App/One").unwrap();
    container.get("Lib/Two").unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 2);

    assert_eq!(container.clear_autoload_cache(Some("App")), 1);
    container.get("App/One").unwrap();
    container.get("Lib/Two").unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 3);

    assert_eq!(container.clear_autoload_cache(None), 2);
    container.get("Lib/Two").unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 4);
}

#[test]
fn test_uncached_namespace_loads_every_time() {
    let loads = Arc::new(AtomicUsize::new(0));
    let container = Container::with_loader(counting_loader(loads.clone()));
    container.autoload_entry(AutoloadEntry::new("/srv/app", "App").cache(false));

    container.get("App/One").unwrap();
    container.get("App/One").unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 2);
}

#[test]
fn test_circular_bindings_are_detected() {
    let container = Container::new();
    container.bind("a", |r| r.make("b").map(|_| ()));
    container.bind("b", |r| r.make("a").map(|_| ()));

    match container.make("a") {
        Err(Error::CircularDependency { chain }) => assert_eq!(chain, ["a", "b", "a"]),
        other => panic!("expected cycle, got {:?}", other.map(|_| ())),
    }
    match container.get("b") {
        Err(Error::CircularDependency { chain }) => assert_eq!(chain, ["b", "a", "b"]),
        other => panic!("expected cycle, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_self_referencing_singleton() {
    let container = Container::new();
    container.singleton("loop", |r| r.get("loop").map(|_| ()));

    let err = container.get("loop").unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(err.to_string(), "Circular dependency detected: loop -> loop");
}

#[test]
fn test_circular_inject_lists_are_detected() {
    let loader = MemoryLoader::new()
        .with(
            "/app/A",
            Module::class(ClassDescriptor::new("A", |_| Ok(Arc::new(()) as Instance)).inject(["App/B"])),
        )
        .with(
            "/app/B",
            Module::class(ClassDescriptor::new("B", |_| Ok(Arc::new(()) as Instance)).inject(["App/A"])),
        );
    let container = Container::with_loader(loader);
    container.autoload("/app", "App");

    match container.make("App/A") {
        Err(Error::CircularDependency { chain }) => {
            assert_eq!(chain, ["App/A", "App/B", "App/A"])
        }
        other => panic!("expected cycle, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_diamond_is_not_a_cycle() {
    let container = Container::new();
    container.bind("config", |_| Ok(1u32));
    container.bind("left", |r| r.resolve::<u32>("config").map(|v| *v + 1));
    container.bind("right", |r| r.resolve::<u32>("config").map(|v| *v + 2));
    container.bind("top", |r| {
        Ok(*r.resolve::<u32>("left")? + *r.resolve::<u32>("right")?)
    });

    assert_eq!(*container.resolve::<u32>("top").unwrap(), 5);
}

#[test]
fn test_construct_unregistered_class() {
    let container = Container::new();
    container.bind("Greeting", |_| Ok(String::from("hey")));

    let class = ClassDescriptor::new("Greeter", |deps| {
        let greeting = deps[0]
            .clone()
            .downcast::<String>()
            .map_err(|_| Error::Handler("expected greeting".into()))?;
        Ok(Arc::new(format!("{}!", greeting)) as Instance)
    })
    .inject(["Greeting"]);

    let instance = container.construct(&class).unwrap();
    let text = instance.downcast::<String>().unwrap();
    assert_eq!(*text, "hey!");
}

#[test]
fn test_concurrent_first_resolution_runs_ctor_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let container = Container::new();
    container.singleton("slow", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        thread::sleep(std::time::Duration::from_millis(20));
        Ok(String::from("ready"))
    });

    let barrier = Barrier::new(8);
    let values: Vec<Arc<String>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    container.resolve::<String>("slow").unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(values.iter().all(|v| Arc::ptr_eq(v, &values[0])));
}

#[test]
fn test_concurrent_autoload_loads_once() {
    let loads = Arc::new(AtomicUsize::new(0));
    let container = Container::with_loader(counting_loader(loads.clone()));
    container.autoload("/srv/app", "App");

    thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| container.get("App/Shared").unwrap());
        }
    });

    assert_eq!(loads.load(Ordering::SeqCst), 1);
}
