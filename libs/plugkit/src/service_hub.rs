//! Minimalistic, contract-keyed `ServiceHub`.
//!
//! Design goals:
//! - The host registers one implementation per service contract during start-up.
//! - Plugins fetch by *contract type* (trait object) or by free-text contract id,
//!   without knowing which crate provides the implementation.
//! - The hub crosses the module boundary as `Arc<dyn ServiceProvider>`: plugins share
//!   it, they never own or copy it.
//!
//! Typical flows:
//! - Service crates submit a [`ServiceRegistration`] through `inventory`; the host
//!   builds the hub with [`ServiceHub::from_registrations`].
//! - Before any plugin code runs the host calls [`ServiceHub::seal`]; the hub is
//!   read-only from then on.
//! - A plugin resolves `services.get::<dyn MyContract>()` and keeps the `Arc`.
//!
//! Implementation details:
//! - Key = `ServiceContract::CONTRACT_ID`, a stable string such as `IDemoService`.
//! - Value = `Arc<C>` stored as `Arc<dyn Any + Send + Sync>` (downcast on read).
//! - Registration policy: **last registration wins**. Re-registering overwrites the
//!   previous value; `Arc`s already handed out remain valid.

use parking_lot::RwLock;
use std::{any::Any, collections::HashMap, fmt, sync::Arc};

/// An abstract, named capability that providers implement and plugins consume.
///
/// Implemented for the trait object of the contract, e.g.
/// `impl ServiceContract for dyn DemoService { const CONTRACT_ID: &'static str = "IDemoService"; }`.
pub trait ServiceContract: Send + Sync + 'static {
    /// Stable identifier used as the registry key and in error messages.
    const CONTRACT_ID: &'static str;
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("service not found: contract={contract}")]
    NotFound { contract: String },

    #[error("type mismatch in hub for contract={contract}, registered as {registered}")]
    TypeMismatch {
        contract: String,
        registered: &'static str,
    },

    #[error("service hub is sealed; cannot register contract={contract}")]
    Sealed { contract: String },
}

/// Object-safe view of the hub handed to plugins.
///
/// Typed access lives on `dyn ServiceProvider` itself (see [`get`](#method.get)) so the
/// trait stays usable as `Arc<dyn ServiceProvider>`.
pub trait ServiceProvider: Send + Sync {
    /// Untyped lookup by contract id.
    ///
    /// # Errors
    /// Returns [`ServiceError::NotFound`] when nothing is registered under `contract_id`.
    fn resolve(&self, contract_id: &str) -> Result<ResolvedService, ServiceError>;

    /// Contract ids currently registered, sorted.
    fn contract_ids(&self) -> Vec<String>;
}

/// A service as stored in the hub: the shared instance plus the concrete type it was registered as.
#[derive(Clone)]
pub struct ResolvedService {
    value: Arc<dyn Any + Send + Sync>,
    registered_as: &'static str,
}

impl ResolvedService {
    /// Downcast to the contract type `C`. Returns `None` if the stored value is not an `Arc<C>`.
    #[must_use]
    pub fn downcast<C>(&self) -> Option<Arc<C>>
    where
        C: ?Sized + ServiceContract,
    {
        self.value.downcast_ref::<Arc<C>>().cloned()
    }

    #[must_use]
    pub fn registered_as(&self) -> &'static str {
        self.registered_as
    }
}

impl fmt::Debug for ResolvedService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedService")
            .field("registered_as", &self.registered_as)
            .finish_non_exhaustive()
    }
}

fn typed_get<C, P>(provider: &P) -> Result<Arc<C>, ServiceError>
where
    C: ?Sized + ServiceContract,
    P: ?Sized + ServiceProvider,
{
    let resolved = provider.resolve(C::CONTRACT_ID)?;
    resolved
        .downcast::<C>()
        .ok_or_else(|| ServiceError::TypeMismatch {
            contract: C::CONTRACT_ID.to_owned(),
            registered: resolved.registered_as,
        })
}

impl dyn ServiceProvider {
    /// Fetch a service by contract type `C`.
    ///
    /// # Errors
    /// - [`ServiceError::NotFound`] if the contract was never registered.
    /// - [`ServiceError::TypeMismatch`] if the entry holds a different type.
    pub fn get<C>(&self) -> Result<Arc<C>, ServiceError>
    where
        C: ?Sized + ServiceContract,
    {
        typed_get(self)
    }
}

#[derive(Default)]
struct HubState {
    services: HashMap<&'static str, ResolvedService>,
    sealed: bool,
}

/// Contract-keyed registry of shared service instances.
pub struct ServiceHub {
    state: RwLock<HubState>,
}

impl ServiceHub {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(HubState::default()),
        }
    }

    /// Build a hub from every [`ServiceRegistration`] linked into the process.
    ///
    /// # Errors
    /// Returns the first error reported by a registration function.
    pub fn from_registrations() -> Result<Self, ServiceError> {
        let hub = Self::new();
        for registration in inventory::iter::<ServiceRegistration> {
            (registration.register)(&hub)?;
            tracing::debug!(provider = registration.provider, "service provider registered");
        }
        Ok(hub)
    }
}

impl Default for ServiceHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceHub {
    /// Register `service` under the contract `C`.
    ///
    /// Policy: last registration wins. A previous instance for the same contract is
    /// replaced; consumers that already hold its `Arc` keep using it.
    ///
    /// # Errors
    /// Returns [`ServiceError::Sealed`] once [`seal`](Self::seal) has been called.
    pub fn register<C>(&self, service: Arc<C>) -> Result<(), ServiceError>
    where
        C: ?Sized + ServiceContract,
    {
        let mut w = self.state.write();
        if w.sealed {
            return Err(ServiceError::Sealed {
                contract: C::CONTRACT_ID.to_owned(),
            });
        }
        let entry = ResolvedService {
            value: Arc::new(service),
            registered_as: std::any::type_name::<C>(),
        };
        if w.services.insert(C::CONTRACT_ID, entry).is_some() {
            tracing::warn!(
                contract = C::CONTRACT_ID,
                "service re-registered; previous instance replaced"
            );
        }
        Ok(())
    }

    /// Fetch a service by contract type `C`.
    ///
    /// # Errors
    /// See [`ServiceProvider::get`](trait.ServiceProvider.html#method.get).
    pub fn get<C>(&self) -> Result<Arc<C>, ServiceError>
    where
        C: ?Sized + ServiceContract,
    {
        typed_get(self)
    }

    /// Make the hub read-only. Idempotent.
    pub fn seal(&self) {
        let mut w = self.state.write();
        if !w.sealed {
            w.sealed = true;
            tracing::debug!(services = w.services.len(), "service hub sealed");
        }
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.state.read().sealed
    }

    #[must_use]
    pub fn contains(&self, contract_id: &str) -> bool {
        self.state.read().services.contains_key(contract_id)
    }

    /// Introspection: (total entries).
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().services.len()
    }

    /// Check if the hub is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().services.is_empty()
    }
}

impl ServiceProvider for ServiceHub {
    fn resolve(&self, contract_id: &str) -> Result<ResolvedService, ServiceError> {
        self.state
            .read()
            .services
            .get(contract_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound {
                contract: contract_id.to_owned(),
            })
    }

    fn contract_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .state
            .read()
            .services
            .keys()
            .map(|id| (*id).to_owned())
            .collect();
        ids.sort_unstable();
        ids
    }
}

impl fmt::Debug for ServiceHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.state.read();
        let mut contracts: Vec<&str> = r.services.keys().copied().collect();
        contracts.sort_unstable();
        f.debug_struct("ServiceHub")
            .field("contracts", &contracts)
            .field("sealed", &r.sealed)
            .finish()
    }
}

/// Start-up registration submitted by a service crate via `inventory::submit!`.
///
/// ```ignore
/// inventory::submit! {
///     plugkit::ServiceRegistration::new("demo_service", register)
/// }
/// ```
pub struct ServiceRegistration {
    pub provider: &'static str,
    pub register: fn(&ServiceHub) -> Result<(), ServiceError>,
}

impl ServiceRegistration {
    #[must_use]
    pub const fn new(
        provider: &'static str,
        register: fn(&ServiceHub) -> Result<(), ServiceError>,
    ) -> Self {
        Self { provider, register }
    }
}

inventory::collect!(ServiceRegistration);
