// Binding registry (IoC container)

use crate::autoload::{AutoloadEntry, ClassDescriptor, Module, ModuleLoader};
use crate::logging::{debug, trace};
use crate::{Error, Result};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use std::any::{Any, type_name};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A resolved, type-erased value
pub type Instance = Arc<dyn Any + Send + Sync>;

type Ctor = dyn Fn(&Resolver<'_>) -> Result<Instance> + Send + Sync;

/// How often a binding's constructor runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Every resolution constructs a new value
    Transient,
    /// The first resolution constructs, later ones share the cached value
    Singleton,
}

struct Binding {
    ctor: Arc<Ctor>,
    lifecycle: Lifecycle,
    cached: OnceCell<Instance>,
}

impl Binding {
    fn new<T, F>(lifecycle: Lifecycle, ctor: F) -> Arc<Self>
    where
        T: Any + Send + Sync,
        F: Fn(&Resolver<'_>) -> Result<T> + Send + Sync + 'static,
    {
        Arc::new(Self {
            ctor: Arc::new(move |resolver: &Resolver<'_>| {
                ctor(resolver).map(|value| Arc::new(value) as Instance)
            }),
            lifecycle,
            cached: OnceCell::new(),
        })
    }
}

#[derive(Default)]
struct Registry {
    bindings: RwLock<HashMap<String, Arc<Binding>>>,
    fakes: RwLock<HashMap<String, Arc<Binding>>>,
    aliases: RwLock<HashMap<String, String>>,
    autoloads: RwLock<Vec<AutoloadEntry>>,
    autoload_cache: Mutex<HashMap<PathBuf, Arc<OnceCell<Module>>>>,
    loader: RwLock<Option<Arc<dyn ModuleLoader>>>,
}

/// The binding registry.
///
/// Cloning is cheap and every clone shares the same registry, so the
/// container can be handed to request handlers by value. Registration is
/// expected during bootstrap; resolution is safe from many threads, and a
/// singleton's constructor runs exactly once even under concurrent first
/// access.
#[derive(Clone, Default)]
pub struct Container {
    inner: Arc<Registry>,
}

impl Container {
    pub fn new() -> Self {
        debug!("Creating new IoC container");
        Self::default()
    }

    /// Create a container that autoloads through `loader`.
    pub fn with_loader(loader: impl ModuleLoader + 'static) -> Self {
        let container = Self::new();
        container.set_loader(loader);
        container
    }

    pub fn set_loader(&self, loader: impl ModuleLoader + 'static) {
        *self.inner.loader.write() = Some(Arc::new(loader));
    }

    /// Register a transient binding. Re-binding replaces the old one.
    pub fn bind<T, F>(&self, id: impl Into<String>, ctor: F)
    where
        T: Any + Send + Sync,
        F: Fn(&Resolver<'_>) -> Result<T> + Send + Sync + 'static,
    {
        self.insert_binding(id.into(), Binding::new(Lifecycle::Transient, ctor));
    }

    /// Register a binding whose constructor runs at most once.
    pub fn singleton<T, F>(&self, id: impl Into<String>, ctor: F)
    where
        T: Any + Send + Sync,
        F: Fn(&Resolver<'_>) -> Result<T> + Send + Sync + 'static,
    {
        self.insert_binding(id.into(), Binding::new(Lifecycle::Singleton, ctor));
    }

    fn insert_binding(&self, id: String, binding: Arc<Binding>) {
        let lifecycle = binding.lifecycle;
        let replaced = self.inner.bindings.write().insert(id.clone(), binding);
        debug!(
            binding = %id,
            lifecycle = ?lifecycle,
            replaced = replaced.is_some(),
            "Binding registered"
        );
    }

    /// Make `alias` resolve exactly like `namespace`. Aliases do not chain.
    pub fn alias(&self, namespace: impl Into<String>, alias: impl Into<String>) {
        let (namespace, alias) = (namespace.into(), alias.into());
        trace!(alias = %alias, target = %namespace, "Alias registered");
        self.inner.aliases.write().insert(alias, namespace);
    }

    /// Map `namespace/Rest/Of/Path` identifiers to `dir/Rest/Of/Path`.
    pub fn autoload(&self, dir: impl AsRef<Path>, namespace: impl AsRef<str>) {
        self.autoload_entry(AutoloadEntry::new(dir, namespace));
    }

    pub fn autoload_entry(&self, entry: AutoloadEntry) {
        debug!(
            namespace = %entry.namespace(),
            directory = %entry.directory().display(),
            cache = entry.cache,
            "Autoload namespace registered"
        );
        let mut autoloads = self.inner.autoloads.write();
        autoloads.retain(|existing| existing.namespace != entry.namespace);
        autoloads.push(entry);
    }

    /// Resolve an identifier; autoloaded classes come back as their descriptor.
    pub fn get(&self, id: &str) -> Result<Instance> {
        Resolver::new(self).get(id)
    }

    /// Resolve an identifier, constructing autoloaded classes with injection.
    pub fn make(&self, id: &str) -> Result<Instance> {
        Resolver::new(self).make(id)
    }

    /// Typed [`Container::get`].
    pub fn resolve<T: Any + Send + Sync>(&self, id: &str) -> Result<Arc<T>> {
        Resolver::new(self).resolve(id)
    }

    /// Typed [`Container::make`].
    pub fn make_as<T: Any + Send + Sync>(&self, id: &str) -> Result<Arc<T>> {
        Resolver::new(self).make_as(id)
    }

    /// Build a class that is not registered anywhere, injecting its dependencies.
    pub fn construct(&self, class: &ClassDescriptor) -> Result<Instance> {
        let resolver = Resolver::new(self);
        let _entered = resolver.enter(class.name())?;
        resolver.construct(class)
    }

    /// Override `id` with a transient fake until [`Container::restore`].
    pub fn fake<T, F>(&self, id: impl Into<String>, ctor: F)
    where
        T: Any + Send + Sync,
        F: Fn(&Resolver<'_>) -> Result<T> + Send + Sync + 'static,
    {
        self.insert_fake(id.into(), Binding::new(Lifecycle::Transient, ctor));
    }

    /// Override `id` with a fake whose value is cached until restored.
    pub fn singleton_fake<T, F>(&self, id: impl Into<String>, ctor: F)
    where
        T: Any + Send + Sync,
        F: Fn(&Resolver<'_>) -> Result<T> + Send + Sync + 'static,
    {
        self.insert_fake(id.into(), Binding::new(Lifecycle::Singleton, ctor));
    }

    fn insert_fake(&self, id: String, fake: Arc<Binding>) {
        debug!(binding = %id, "Fake registered");
        self.inner.fakes.write().insert(id, fake);
    }

    pub fn has_fake(&self, id: &str) -> bool {
        self.inner.fakes.read().contains_key(id)
    }

    /// Remove the fake for `id`; real bindings are untouched.
    pub fn restore(&self, id: &str) -> bool {
        let removed = self.inner.fakes.write().remove(id).is_some();
        debug!(binding = %id, removed, "Fake restored");
        removed
    }

    pub fn restore_all(&self) {
        let mut fakes = self.inner.fakes.write();
        debug!(fake_count = fakes.len(), "Restoring all fakes");
        fakes.clear();
    }

    /// Drop cached autoloaded modules of one namespace, or of all of them.
    ///
    /// Returns how many cache slots were evicted.
    pub fn clear_autoload_cache(&self, namespace: Option<&str>) -> usize {
        let mut cache = self.inner.autoload_cache.lock();
        let before = cache.len();

        match namespace {
            None => cache.clear(),
            Some(namespace) => {
                let namespace = namespace.trim_matches('/');
                let autoloads = self.inner.autoloads.read();
                let dirs: Vec<&AutoloadEntry> = autoloads
                    .iter()
                    .filter(|entry| entry.namespace == namespace)
                    .collect();
                cache.retain(|path, _| !dirs.iter().any(|entry| entry.contains(path)));
            }
        }

        let evicted = before - cache.len();
        debug!(namespace = ?namespace, evicted, "Autoload cache cleared");
        evicted
    }

    /// Whether `id` (after alias expansion) has a registered binding.
    pub fn has_binding(&self, id: &str) -> bool {
        let id = self.resolve_alias(id);
        self.inner.bindings.read().contains_key(&id)
    }

    pub fn is_singleton(&self, id: &str) -> bool {
        let id = self.resolve_alias(id);
        self.inner
            .bindings
            .read()
            .get(&id)
            .is_some_and(|binding| binding.lifecycle == Lifecycle::Singleton)
    }

    /// Expand one alias hop, or return `id` unchanged.
    pub fn resolve_alias(&self, id: &str) -> String {
        self.inner
            .aliases
            .read()
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    /// Registered binding identifiers, sorted.
    pub fn binding_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.bindings.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Forget every binding, fake, alias, autoload entry and cached module.
    pub fn clear(&self) {
        let count = {
            let mut bindings = self.inner.bindings.write();
            let count = bindings.len();
            bindings.clear();
            count
        };
        self.inner.fakes.write().clear();
        self.inner.aliases.write().clear();
        self.inner.autoloads.write().clear();
        self.inner.autoload_cache.lock().clear();
        debug!(binding_count = count, "Cleared container");
    }

    fn fake_for(&self, id: &str) -> Option<Arc<Binding>> {
        self.inner.fakes.read().get(id).cloned()
    }

    fn binding_for(&self, id: &str) -> Option<Arc<Binding>> {
        self.inner.bindings.read().get(id).cloned()
    }

    /// The autoload entry with the longest namespace covering `id`.
    fn autoload_for(&self, id: &str) -> Option<(AutoloadEntry, PathBuf)> {
        let autoloads = self.inner.autoloads.read();
        autoloads
            .iter()
            .filter_map(|entry| {
                let path = entry.path_for(entry.strip(id)?)?;
                Some((entry, path))
            })
            .max_by_key(|(entry, _)| entry.namespace.len())
            .map(|(entry, path)| (entry.clone(), path))
    }

    fn load_module(&self, id: &str, entry: &AutoloadEntry, path: &Path) -> Result<Module> {
        let loader = self
            .inner
            .loader
            .read()
            .clone()
            .ok_or_else(|| Error::LoaderUnavailable(id.to_string()))?;

        if !entry.cache {
            trace!(binding = %id, path = %path.display(), "Loading uncached module");
            return loader.load(path);
        }

        let slot = self
            .inner
            .autoload_cache
            .lock()
            .entry(path.to_path_buf())
            .or_default()
            .clone();

        slot.get_or_try_init(|| {
            debug!(binding = %id, path = %path.display(), "Loading module");
            loader.load(path)
        })
        .cloned()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("bindings", &self.inner.bindings.read().len())
            .field("fakes", &self.inner.fakes.read().len())
            .field("aliases", &self.inner.aliases.read().len())
            .field("autoloads", &self.inner.autoloads.read().len())
            .finish()
    }
}

#[derive(Clone, Copy)]
enum Mode {
    Get,
    Make,
}

thread_local! {
    /// Identifiers under construction on this thread, tagged with their registry.
    static RESOLVING: RefCell<Vec<(usize, String)>> = const { RefCell::new(Vec::new()) };
}

/// Resolution handle passed to constructors.
///
/// It resolves exactly like the container it wraps. Identifiers currently
/// being constructed are tracked per thread and per registry, so a cycle
/// fails with [`Error::CircularDependency`] instead of recursing forever,
/// even when a constructor re-enters through [`Resolver::container`] or a
/// captured container clone.
pub struct Resolver<'c> {
    container: &'c Container,
}

impl<'c> Resolver<'c> {
    fn new(container: &'c Container) -> Self {
        Self { container }
    }

    pub fn container(&self) -> &'c Container {
        self.container
    }

    pub fn get(&self, id: &str) -> Result<Instance> {
        self.resolve_id(id, Mode::Get)
    }

    pub fn make(&self, id: &str) -> Result<Instance> {
        self.resolve_id(id, Mode::Make)
    }

    pub fn resolve<T: Any + Send + Sync>(&self, id: &str) -> Result<Arc<T>> {
        downcast(id, self.get(id)?)
    }

    pub fn make_as<T: Any + Send + Sync>(&self, id: &str) -> Result<Arc<T>> {
        downcast(id, self.make(id)?)
    }

    fn resolve_id(&self, id: &str, mode: Mode) -> Result<Instance> {
        let container = self.container;

        if let Some(fake) = container.fake_for(id) {
            trace!(binding = %id, "Resolving fake");
            let _entered = self.enter(id)?;
            return self.instantiate(&fake);
        }

        let canonical = container.resolve_alias(id);
        if canonical != id {
            if let Some(fake) = container.fake_for(&canonical) {
                trace!(binding = %canonical, alias = %id, "Resolving fake through alias");
                let _entered = self.enter(&canonical)?;
                return self.instantiate(&fake);
            }
        }

        if let Some(binding) = container.binding_for(&canonical) {
            let _entered = self.enter(&canonical)?;
            return self.instantiate(&binding);
        }

        if let Some((entry, path)) = container.autoload_for(&canonical) {
            let _entered = self.enter(&canonical)?;
            let module = container.load_module(&canonical, &entry, &path)?;
            return match (mode, module) {
                (Mode::Make, Module::Class(class)) => self.construct(&class),
                (_, module) => Ok(module.as_instance()),
            };
        }

        debug!(binding = %id, "Binding not found");
        Err(Error::BindingNotFound(id.to_string()))
    }

    fn instantiate(&self, binding: &Binding) -> Result<Instance> {
        match binding.lifecycle {
            Lifecycle::Transient => (binding.ctor)(self),
            Lifecycle::Singleton => binding
                .cached
                .get_or_try_init(|| (binding.ctor)(self))
                .cloned(),
        }
    }

    fn construct(&self, class: &ClassDescriptor) -> Result<Instance> {
        let deps = class
            .dependencies()
            .iter()
            .map(|dep| self.make(dep))
            .collect::<Result<Vec<_>>>()?;
        trace!(class = %class.name(), dependencies = deps.len(), "Constructing class");
        class.construct(deps)
    }

    fn enter(&self, id: &str) -> Result<StackGuard> {
        let registry = Arc::as_ptr(&self.container.inner) as usize;
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            let position = stack
                .iter()
                .position(|(owner, entry)| *owner == registry && entry == id);
            if let Some(pos) = position {
                let mut chain: Vec<String> = stack[pos..]
                    .iter()
                    .filter(|(owner, _)| *owner == registry)
                    .map(|(_, entry)| entry.clone())
                    .collect();
                chain.push(id.to_string());
                debug!(chain = %chain.join(" -> "), "Circular dependency detected");
                return Err(Error::CircularDependency { chain });
            }
            stack.push((registry, id.to_string()));
            Ok(StackGuard)
        })
    }
}

/// Pops the innermost in-progress identifier when resolution leaves it.
struct StackGuard;

impl Drop for StackGuard {
    fn drop(&mut self) {
        let _ = RESOLVING.try_with(|stack| stack.borrow_mut().pop());
    }
}

fn downcast<T: Any + Send + Sync>(id: &str, instance: Instance) -> Result<Arc<T>> {
    instance
        .downcast::<T>()
        .map_err(|_| Error::BindingTypeMismatch {
            id: id.to_string(),
            expected: type_name::<T>(),
        })
}
