#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! `PlugKit`: a host for separately built plugin modules.
//!
//! The host keeps a contract-keyed [`ServiceHub`], opens a module with [`ModuleLoader`],
//! resolves one of its exported types by name and creates it with the hub as the sole
//! constructor argument. Plugins reach services directly through their contract trait
//! or by operation name through [`dispatch::invoke`].

pub mod config;
pub mod contracts;
pub mod declaration;
pub mod dispatch;
mod guard;
pub mod instantiate;
pub mod loader;
pub mod registry;
pub mod runtime;
pub mod service_hub;
pub mod telemetry;

pub use config::{ConfigError, HostConfig};
pub use contracts::{ConcreteType, DebugField, Plugin};
pub use declaration::{PLUGKIT_ABI_VERSION, PLUGKIT_VERSION, PluginDeclaration};
pub use dispatch::{
    Arguments, CallError, Dispatch, InvokeError, Operation, OperationFn, Param, ValueKind, invoke,
    invoke_as,
};
pub use instantiate::{InstantiationError, PluginInstance, PluginRunError, instantiate};
pub use loader::{LoadedModule, ModuleLoadError, ModuleLoader, ResolvedType};
pub use registry::{
    Constructor, ConstructorArg, ConstructorArgs, Factory, ParamKind, TypeDescriptor, TypeRegistrar,
};
pub use runtime::{RunOutcome, run_module};
pub use service_hub::{
    ServiceContract, ServiceError, ServiceHub, ServiceProvider, ServiceRegistration,
};

// Re-exported for `declare_plugin_module!` and service registrations in downstream crates.
pub use inventory;
