//! Panic containment at the module boundary.
//!
//! A `cdylib` carries its own copy of std, so a panic unwinding out of module code is a
//! foreign exception to the host and aborts the process. Everything the host calls in
//! a module therefore goes through the entry points below. They are reached only via
//! function pointers and vtables built inside the module ([`Constructor::new`],
//! [`PluginDeclaration::new`]), so their `catch_unwind` runs on the module's side and
//! only plain values cross back.
//!
//! [`Constructor::new`]: crate::registry::Constructor::new
//! [`PluginDeclaration::new`]: crate::declaration::PluginDeclaration::new

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::contracts::{DebugField, Plugin};
use crate::registry::{ConstructorArgs, Factory, TypeRegistrar};

/// Extract a human-readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        return (*msg).to_owned();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_owned()
}

/// Run `f`, returning the panic message instead of unwinding.
///
/// The payload is dropped before returning, by the same std that allocated it.
pub(crate) fn catch_panic<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

/// Why a call into module code produced no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ModuleFailure {
    /// The call returned an error; the full context chain is kept as text.
    Failed(String),
    Panicked(String),
}

/// A plugin instance whose calls never unwind into the caller.
pub(crate) trait GuardedPlugin {
    fn run(&mut self) -> Result<i32, ModuleFailure>;
    fn debug_fields(&self) -> Result<Vec<DebugField>, String>;
}

pub(crate) type BuildFn =
    fn(Factory, &ConstructorArgs) -> Result<Box<dyn GuardedPlugin>, ModuleFailure>;

pub(crate) type GuardedRegisterFn =
    fn(fn(&mut TypeRegistrar), &mut TypeRegistrar) -> Result<(), String>;

struct Guarded {
    inner: Option<Box<dyn Plugin>>,
}

impl GuardedPlugin for Guarded {
    fn run(&mut self) -> Result<i32, ModuleFailure> {
        let Some(inner) = self.inner.as_mut() else {
            return Err(ModuleFailure::Failed("plugin instance is gone".to_owned()));
        };
        match catch_panic(|| inner.run()) {
            Ok(Ok(code)) => Ok(code),
            Ok(Err(e)) => Err(ModuleFailure::Failed(format!("{e:#}"))),
            Err(message) => Err(ModuleFailure::Panicked(message)),
        }
    }

    fn debug_fields(&self) -> Result<Vec<DebugField>, String> {
        match self.inner.as_ref() {
            Some(inner) => catch_panic(|| inner.debug_fields()),
            None => Ok(Vec::new()),
        }
    }
}

impl Drop for Guarded {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take()
            && let Err(message) = catch_panic(move || drop(inner))
        {
            tracing::warn!(%message, "plugin instance panicked while being dropped");
        }
    }
}

/// Call `factory` and wrap what it builds.
pub(crate) fn guarded_build(
    factory: Factory,
    args: &ConstructorArgs,
) -> Result<Box<dyn GuardedPlugin>, ModuleFailure> {
    match catch_panic(|| factory(args)) {
        Ok(Ok(inner)) => Ok(Box::new(Guarded { inner: Some(inner) })),
        Ok(Err(e)) => Err(ModuleFailure::Failed(format!("{e:#}"))),
        Err(message) => Err(ModuleFailure::Panicked(message)),
    }
}

/// Fill `registrar` through the module's `register` function.
pub(crate) fn guarded_register(
    register: fn(&mut TypeRegistrar),
    registrar: &mut TypeRegistrar,
) -> Result<(), String> {
    catch_panic(|| register(registrar))
}
