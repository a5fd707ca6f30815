//! Resource registration and resolution.
//!
//! Steps never build their own clients. Each resource is registered once with
//! a factory and a [`Scope`]; the resolver builds it on first use and hands
//! out cheap clones afterwards:
//!
//! - `Scope::Process` resources are built once and shared by every run
//!   (HTTP clients, immutable templates). They must be safe to share.
//! - `Scope::Run` resources are built once per run and dropped with the run
//!   (scratch directories).

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use super::error::ResourceError;
use crate::config::Config;

type Shared = Arc<dyn Any + Send + Sync>;
type Factory = Arc<dyn Fn(&Config) -> Result<Shared, ResourceError> + Send + Sync>;

/// Typed name of a resource
pub struct ResourceId<T> {
    name: &'static str,
    _type: PhantomData<fn() -> T>,
}

impl<T> ResourceId<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _type: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for ResourceId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ResourceId<T> {}

impl<T> fmt::Debug for ResourceId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResourceId").field(&self.name).finish()
    }
}

/// Lifetime of a resolved resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Process,
    Run,
}

struct Registration {
    scope: Scope,
    factory: Factory,
}

/// Factories by resource name
#[derive(Default)]
pub struct ResourceRegistry {
    entries: HashMap<&'static str, Registration>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the factory for `id`
    pub fn register<T, F>(&mut self, id: &ResourceId<T>, scope: Scope, factory: F) -> &mut Self
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(&Config) -> Result<T, ResourceError> + Send + Sync + 'static,
    {
        let factory: Factory =
            Arc::new(move |config| factory(config).map(|value| Arc::new(value) as Shared));
        self.entries
            .insert(id.name(), Registration { scope, factory });
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn scope(&self, name: &str) -> Option<Scope> {
        self.entries.get(name).map(|r| r.scope)
    }
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("ResourceRegistry")
            .field("resources", &names)
            .finish()
    }
}

/// Registry plus configuration plus the process-wide cache
#[derive(Clone)]
pub struct ResourceResolver {
    config: Arc<Config>,
    registry: Arc<ResourceRegistry>,
    process: Arc<Mutex<HashMap<&'static str, Shared>>>,
}

impl ResourceResolver {
    pub fn new(config: Config, registry: ResourceRegistry) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            process: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Empty resource set for a new run; resources are built on first use
    pub fn for_run(&self) -> RunResources {
        RunResources {
            resolver: self.clone(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Build every named resource up front, in the given order.
    ///
    /// Fails on the first resource that cannot be built, before any step
    /// gets to run.
    pub fn resolve_for_run(&self, names: &[&'static str]) -> Result<RunResources, ResourceError> {
        let run = self.for_run();
        for name in names {
            run.resolve(name)?;
        }
        Ok(run)
    }

    fn resolve_process(
        &self,
        name: &'static str,
        registration: &Registration,
    ) -> Result<Shared, ResourceError> {
        let mut cache = self.process.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(value) = cache.get(name) {
            return Ok(Arc::clone(value));
        }

        let value = (registration.factory)(&self.config)?;
        debug!(resource = name, scope = "process", "Resource constructed");
        cache.insert(name, Arc::clone(&value));
        Ok(value)
    }
}

impl fmt::Debug for ResourceResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceResolver")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Resources of a single run.
///
/// Dropping this drops every run-scoped resource, which is how per-run
/// temporary files get cleaned up.
pub struct RunResources {
    resolver: ResourceResolver,
    cache: Mutex<HashMap<&'static str, Shared>>,
}

impl RunResources {
    /// Resolve a resource, building it on first use within this run
    pub fn get<T>(&self, id: &ResourceId<T>) -> Result<T, ResourceError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let shared = self.resolve(id.name())?;
        shared
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| ResourceError::TypeMismatch(id.name().to_string()))
    }

    pub fn config(&self) -> &Config {
        self.resolver.config()
    }

    /// Names resolved so far in this run
    pub fn resolved(&self) -> Vec<&'static str> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<_> = cache.keys().copied().collect();
        names.sort_unstable();
        names
    }

    fn resolve(&self, name: &str) -> Result<Shared, ResourceError> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(value) = cache.get(name) {
            return Ok(Arc::clone(value));
        }

        let (&key, registration) = self
            .resolver
            .registry
            .entries
            .get_key_value(name)
            .ok_or_else(|| ResourceError::Unregistered(name.to_string()))?;

        let value = match registration.scope {
            Scope::Process => self.resolver.resolve_process(key, registration)?,
            Scope::Run => {
                let value = (registration.factory)(self.resolver.config())?;
                debug!(resource = key, scope = "run", "Resource constructed");
                value
            }
        };

        cache.insert(key, Arc::clone(&value));
        Ok(value)
    }
}

impl fmt::Debug for RunResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunResources")
            .field("resolved", &self.resolved())
            .finish()
    }
}
