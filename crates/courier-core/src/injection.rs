//! Scoped dependency injection.
//!
//! An [`Injector`] maps a capability type (usually a trait object such as
//! `dyn Wallet`) to a [`Provider`]. An [`InjectionContext`] pairs an
//! injector with a named scope; starting a child scope copies the parent's
//! bindings and settings, after which the two evolve independently.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::CoreError;
use crate::settings::Settings;

/// Name of the outermost scope.
pub const ROOT_SCOPE: &str = "application";

/// Type-erased provider output. The concrete type is always `Arc<T>`
/// for the capability `T` the provider is bound under.
pub type AnyArc = Arc<dyn Any + Send + Sync>;

/// Produces the value bound to a capability.
pub trait Provider: Send + Sync {
    /// Return the bound value, or `None` when the provider has nothing to
    /// offer under these settings.
    fn provide(&self, settings: &Settings, injector: &Injector) -> Result<Option<AnyArc>, CoreError>;
}

/// Always returns the same instance.
pub struct InstanceProvider {
    instance: AnyArc,
}

impl InstanceProvider {
    pub fn new<T: ?Sized + Send + Sync + 'static>(instance: Arc<T>) -> Self {
        Self {
            instance: Arc::new(instance),
        }
    }

    /// Wrap an already type-erased value as-is.
    pub fn from_any(instance: AnyArc) -> Self {
        Self { instance }
    }
}

impl Provider for InstanceProvider {
    fn provide(&self, _settings: &Settings, _injector: &Injector) -> Result<Option<AnyArc>, CoreError> {
        Ok(Some(self.instance.clone()))
    }
}

type FactoryFn = dyn Fn(&Settings, &Injector) -> Result<Option<AnyArc>, CoreError> + Send + Sync;

/// Invokes a factory closure on every resolution.
pub struct FactoryProvider {
    factory: Box<FactoryFn>,
}

impl FactoryProvider {
    pub fn new<T, F>(factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Settings, &Injector) -> Result<Option<Arc<T>>, CoreError> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(move |settings: &Settings, injector: &Injector| {
                Ok(factory(settings, injector)?.map(|value| Arc::new(value) as AnyArc))
            }),
        }
    }
}

impl Provider for FactoryProvider {
    fn provide(&self, settings: &Settings, injector: &Injector) -> Result<Option<AnyArc>, CoreError> {
        (self.factory)(settings, injector)
    }
}

/// Memoizes the first value produced by an inner provider.
pub struct CachedProvider {
    inner: Box<dyn Provider>,
    value: Mutex<Option<AnyArc>>,
}

impl CachedProvider {
    pub fn new(inner: impl Provider + 'static) -> Self {
        Self {
            inner: Box::new(inner),
            value: Mutex::new(None),
        }
    }
}

impl Provider for CachedProvider {
    fn provide(&self, settings: &Settings, injector: &Injector) -> Result<Option<AnyArc>, CoreError> {
        let mut cached = self
            .value
            .lock()
            .map_err(|_| CoreError::ResolutionError("cached provider lock poisoned".into()))?;
        if let Some(value) = cached.as_ref() {
            return Ok(Some(value.clone()));
        }
        let value = self.inner.provide(settings, injector)?;
        if let Some(ref v) = value {
            *cached = Some(v.clone());
        }
        Ok(value)
    }
}

#[derive(Clone)]
struct Binding {
    type_name: &'static str,
    provider: Arc<dyn Provider>,
}

/// Capability registry plus the settings in effect for one scope.
#[derive(Clone, Default)]
pub struct Injector {
    settings: Settings,
    bindings: Arc<HashMap<TypeId, Binding>>,
}

impl Injector {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            bindings: Arc::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Layer additional settings over this injector's settings.
    pub fn extend_settings(&mut self, settings: &Settings) {
        self.settings = self.settings.merge(settings);
    }

    /// Bind a fixed instance to capability `T`.
    pub fn bind_instance<T: ?Sized + Send + Sync + 'static>(&mut self, instance: Arc<T>) {
        self.bind_provider::<T>(InstanceProvider::new(instance));
    }

    /// Bind a factory invoked on every resolution of `T`.
    pub fn bind_factory<T, F>(&mut self, factory: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Settings, &Injector) -> Result<Option<Arc<T>>, CoreError> + Send + Sync + 'static,
    {
        self.bind_provider::<T>(FactoryProvider::new(factory));
    }

    /// Bind a factory invoked once; later resolutions reuse its result.
    pub fn bind_cached<T, F>(&mut self, factory: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Settings, &Injector) -> Result<Option<Arc<T>>, CoreError> + Send + Sync + 'static,
    {
        self.bind_provider::<T>(CachedProvider::new(FactoryProvider::new(factory)));
    }

    /// Bind an arbitrary provider to capability `T`. The provider's output
    /// is checked against `T` at resolution time.
    pub fn bind_provider<T: ?Sized + 'static>(&mut self, provider: impl Provider + 'static) {
        Arc::make_mut(&mut self.bindings).insert(
            TypeId::of::<T>(),
            Binding {
                type_name: std::any::type_name::<T>(),
                provider: Arc::new(provider),
            },
        );
    }

    pub fn clear_binding<T: ?Sized + 'static>(&mut self) {
        Arc::make_mut(&mut self.bindings).remove(&TypeId::of::<T>());
    }

    pub fn has_binding<T: ?Sized + 'static>(&self) -> bool {
        self.bindings.contains_key(&TypeId::of::<T>())
    }

    /// Resolve a required capability.
    pub fn inject<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, CoreError> {
        self.resolve::<T>(None, true)?.ok_or_else(|| {
            CoreError::ResolutionError(format!(
                "no instance provided for {}",
                std::any::type_name::<T>()
            ))
        })
    }

    /// Resolve a required capability with extra settings passed to the provider.
    pub fn inject_with<T: ?Sized + Send + Sync + 'static>(
        &self,
        settings: &Settings,
    ) -> Result<Arc<T>, CoreError> {
        self.resolve::<T>(Some(settings), true)?.ok_or_else(|| {
            CoreError::ResolutionError(format!(
                "no instance provided for {}",
                std::any::type_name::<T>()
            ))
        })
    }

    /// Resolve an optional capability. A wrongly typed provider is still an error.
    pub fn inject_optional<T: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> Result<Option<Arc<T>>, CoreError> {
        self.resolve::<T>(None, false)
    }

    fn resolve<T: ?Sized + Send + Sync + 'static>(
        &self,
        settings: Option<&Settings>,
        required: bool,
    ) -> Result<Option<Arc<T>>, CoreError> {
        let Some(binding) = self.bindings.get(&TypeId::of::<T>()) else {
            if required {
                return Err(CoreError::ResolutionError(format!(
                    "no provider bound for {}",
                    std::any::type_name::<T>()
                )));
            }
            return Ok(None);
        };

        let effective = match settings {
            Some(extra) => self.settings.merge(extra),
            None => self.settings.clone(),
        };

        let Some(value) = binding.provider.provide(&effective, self)? else {
            return Ok(None);
        };

        match value.downcast_ref::<Arc<T>>() {
            Some(instance) => Ok(Some(instance.clone())),
            None => Err(CoreError::ResolutionError(format!(
                "provider bound for {} returned a value of another type",
                binding.type_name
            ))),
        }
    }
}

impl std::fmt::Debug for Injector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.bindings.values().map(|b| b.type_name).collect();
        names.sort_unstable();
        f.debug_struct("Injector")
            .field("settings", &self.settings)
            .field("bindings", &names)
            .finish()
    }
}

#[derive(Debug, Clone)]
struct Scope {
    name: String,
    injector: Injector,
}

/// A named injection scope with a chain of ancestor scopes.
#[derive(Debug, Clone)]
pub struct InjectionContext {
    scope_name: String,
    injector: Injector,
    ancestors: Arc<Vec<Scope>>,
}

impl Default for InjectionContext {
    fn default() -> Self {
        Self::new(Settings::new())
    }
}

impl InjectionContext {
    /// Create the root scope.
    pub fn new(settings: Settings) -> Self {
        Self {
            scope_name: ROOT_SCOPE.to_string(),
            injector: Injector::new(settings),
            ancestors: Arc::new(Vec::new()),
        }
    }

    pub fn scope_name(&self) -> &str {
        &self.scope_name
    }

    pub fn settings(&self) -> &Settings {
        self.injector.settings()
    }

    pub fn injector(&self) -> &Injector {
        &self.injector
    }

    /// Layer settings over this scope only.
    pub fn update_settings(&mut self, settings: &Settings) {
        self.injector.extend_settings(settings);
    }

    /// Enter a child scope. The child starts with copies of this scope's
    /// bindings and settings, extended by `settings`.
    pub fn start_scope(
        &self,
        name: &str,
        settings: Option<&Settings>,
    ) -> Result<InjectionContext, CoreError> {
        if name.is_empty() {
            return Err(CoreError::ScopeError("scope name must not be empty".into()));
        }
        if name == self.scope_name {
            return Err(CoreError::ScopeError(format!(
                "cannot re-enter the current scope: {}",
                name
            )));
        }
        if self.ancestors.iter().any(|scope| scope.name == name) {
            return Err(CoreError::ScopeError(format!(
                "cannot re-enter an ancestor scope: {}",
                name
            )));
        }

        let mut injector = self.injector.clone();
        if let Some(settings) = settings {
            injector.extend_settings(settings);
        }

        let mut ancestors = (*self.ancestors).clone();
        ancestors.push(Scope {
            name: self.scope_name.clone(),
            injector: self.injector.clone(),
        });

        tracing::trace!(parent = %self.scope_name, scope = %name, "entered injection scope");

        Ok(InjectionContext {
            scope_name: name.to_string(),
            injector,
            ancestors: Arc::new(ancestors),
        })
    }

    /// Look up the injector of this scope or a named ancestor.
    pub fn injector_for_scope(&self, name: &str) -> Option<&Injector> {
        if name == self.scope_name {
            return Some(&self.injector);
        }
        self.ancestors
            .iter()
            .find(|scope| scope.name == name)
            .map(|scope| &scope.injector)
    }

    /// Names of this scope's ancestors, outermost first.
    pub fn scope_chain(&self) -> Vec<&str> {
        self.ancestors.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn bind_instance<T: ?Sized + Send + Sync + 'static>(&mut self, instance: Arc<T>) {
        self.injector.bind_instance(instance);
    }

    pub fn bind_factory<T, F>(&mut self, factory: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Settings, &Injector) -> Result<Option<Arc<T>>, CoreError> + Send + Sync + 'static,
    {
        self.injector.bind_factory(factory);
    }

    pub fn bind_cached<T, F>(&mut self, factory: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Settings, &Injector) -> Result<Option<Arc<T>>, CoreError> + Send + Sync + 'static,
    {
        self.injector.bind_cached(factory);
    }

    pub fn bind_provider<T: ?Sized + 'static>(&mut self, provider: impl Provider + 'static) {
        self.injector.bind_provider::<T>(provider);
    }

    pub fn clear_binding<T: ?Sized + 'static>(&mut self) {
        self.injector.clear_binding::<T>();
    }

    pub fn inject<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, CoreError> {
        self.injector.inject::<T>()
    }

    pub fn inject_with<T: ?Sized + Send + Sync + 'static>(
        &self,
        settings: &Settings,
    ) -> Result<Arc<T>, CoreError> {
        self.injector.inject_with::<T>(settings)
    }

    pub fn inject_optional<T: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> Result<Option<Arc<T>>, CoreError> {
        self.injector.inject_optional::<T>()
    }
}
