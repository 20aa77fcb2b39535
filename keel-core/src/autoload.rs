//! Directory-backed namespaces for the container
//!
//! An autoload entry maps a namespace prefix such as `App` to a directory.
//! Resolving `App/Controllers/UserController` asks the configured
//! [`ModuleLoader`] for `<dir>/Controllers/UserController`. The loader is a
//! collaborator: the core never touches the file system itself.

use crate::container::Instance;
use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Positional constructor of a class descriptor.
pub type ConstructFn = dyn Fn(Vec<Instance>) -> Result<Instance> + Send + Sync;

/// A constructible type with a declared, ordered dependency list.
///
/// The container resolves every identifier in `inject` and hands the values
/// to the constructor in the same order.
#[derive(Clone)]
pub struct ClassDescriptor {
    name: String,
    inject: Vec<String>,
    construct: Arc<ConstructFn>,
}

impl ClassDescriptor {
    pub fn new<F>(name: impl Into<String>, construct: F) -> Self
    where
        F: Fn(Vec<Instance>) -> Result<Instance> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            inject: Vec::new(),
            construct: Arc::new(construct),
        }
    }

    /// Declare the dependency identifiers, in constructor argument order.
    pub fn inject<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inject = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[String] {
        &self.inject
    }

    pub(crate) fn construct(&self, deps: Vec<Instance>) -> Result<Instance> {
        (self.construct)(deps)
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("name", &self.name)
            .field("inject", &self.inject)
            .finish()
    }
}

/// What a loader hands back for a path.
#[derive(Clone)]
pub enum Module {
    /// A ready value, returned as-is by both `get` and `make`
    Value(Instance),
    /// A class; `get` returns the descriptor, `make` constructs it
    Class(Arc<ClassDescriptor>),
}

impl Module {
    pub fn value<T: std::any::Any + Send + Sync>(value: T) -> Self {
        Module::Value(Arc::new(value))
    }

    pub fn class(descriptor: ClassDescriptor) -> Self {
        Module::Class(Arc::new(descriptor))
    }

    /// The module as a container instance; classes yield their descriptor.
    pub fn as_instance(&self) -> Instance {
        match self {
            Module::Value(value) => value.clone(),
            Module::Class(class) => class.clone() as Instance,
        }
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Module::Value(_) => f.write_str("Module::Value(..)"),
            Module::Class(class) => write!(f, "Module::Class({})", class.name()),
        }
    }
}

/// Loads the module stored at an absolute path.
///
/// May be slow; callers needing a deadline should resolve on a worker they
/// can abandon. Results are cached by the container, not by the loader.
pub trait ModuleLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Module>;
}

impl<F> ModuleLoader for F
where
    F: Fn(&Path) -> Result<Module> + Send + Sync,
{
    fn load(&self, path: &Path) -> Result<Module> {
        self(path)
    }
}

/// In-memory module table keyed by absolute path.
///
/// Handy for tests and for applications that register their modules at
/// compile time instead of reading them from disk.
#[derive(Default)]
pub struct MemoryLoader {
    modules: RwLock<HashMap<PathBuf, Module>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a module; relative paths are made absolute like lookups are.
    pub fn insert(&self, path: impl AsRef<Path>, module: Module) {
        self.modules.write().insert(absolutize(path.as_ref()), module);
    }

    pub fn with(self, path: impl AsRef<Path>, module: Module) -> Self {
        self.insert(path, module);
        self
    }
}

impl ModuleLoader for MemoryLoader {
    fn load(&self, path: &Path) -> Result<Module> {
        self.modules
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::ModuleLoad {
                path: path.display().to_string(),
                reason: "no such module".to_string(),
            })
    }
}

/// A namespace-to-directory mapping.
#[derive(Debug, Clone)]
pub struct AutoloadEntry {
    pub(crate) namespace: String,
    pub(crate) directory: PathBuf,
    pub(crate) cache: bool,
}

impl AutoloadEntry {
    pub fn new(directory: impl AsRef<Path>, namespace: impl AsRef<str>) -> Self {
        Self {
            namespace: namespace.as_ref().trim_matches('/').to_string(),
            directory: absolutize(directory.as_ref()),
            cache: true,
        }
    }

    /// Keep loaded modules in the container cache (default `true`).
    pub fn cache(mut self, enabled: bool) -> Self {
        self.cache = enabled;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The remainder of `id` below this namespace, if `id` lives in it.
    pub(crate) fn strip<'a>(&self, id: &'a str) -> Option<&'a str> {
        let rest = id.strip_prefix(self.namespace.as_str())?;
        let rest = rest.strip_prefix('/')?;
        (!rest.is_empty()).then_some(rest)
    }

    /// Absolute, normalised path for the remainder of an identifier.
    ///
    /// `None` when `..` segments would leave the namespace directory.
    pub(crate) fn path_for(&self, rest: &str) -> Option<PathBuf> {
        let mut path = self.directory.clone();
        for segment in rest.split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        let path = normalize(&path);
        (path != self.directory && path.starts_with(&self.directory)).then_some(path)
    }

    pub(crate) fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.directory)
    }
}

/// Make a path absolute against the working directory and normalise it.
pub(crate) fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        let base = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        normalize(&base.join(path))
    }
}

/// Lexically remove `.` and `..` components.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
