//! The one symbol a plugin module exports.
//!
//! A module built as a `cdylib` invokes [`declare_plugin_module!`](crate::declare_plugin_module)
//! once. The host looks up [`DECLARATION_SYMBOL`], checks the versions and then calls
//! `register` to obtain the module's exported type table.
//!
//! The declaration is built by [`PluginDeclaration::new`] inside the module, so the
//! registration guard it carries is the module's own copy.

use crate::guard::{GuardedRegisterFn, guarded_register};
use crate::registry::TypeRegistrar;

/// Bumped whenever [`PluginDeclaration`] or the types reachable from it change shape.
pub const PLUGKIT_ABI_VERSION: u32 = 1;

/// Version of the `plugkit` crate a module (or the host) was compiled against.
pub const PLUGKIT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exported symbol name, nul-terminated for the dynamic loader.
pub const DECLARATION_SYMBOL: &[u8] = b"PLUGKIT_PLUGIN_DECLARATION\0";

/// Static metadata and entry points of a plugin module.
///
/// Rust has no stable ABI: host and module must be built by the same toolchain against
/// the same `plugkit` release. Both version fields are checked before anything else is
/// read from the declaration.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct PluginDeclaration {
    pub abi_version: u32,
    pub plugkit_version: &'static str,
    pub module_name: &'static str,
    pub module_version: &'static str,
    pub register: fn(&mut TypeRegistrar),
    /// Forwards the host's tracing dispatcher so module logs reach the host subscriber.
    pub install_dispatch: fn(&tracing::Dispatch),
    guarded_register: GuardedRegisterFn,
}

impl PluginDeclaration {
    #[must_use]
    pub const fn new(
        module_name: &'static str,
        module_version: &'static str,
        register: fn(&mut TypeRegistrar),
    ) -> Self {
        Self {
            abi_version: PLUGKIT_ABI_VERSION,
            plugkit_version: PLUGKIT_VERSION,
            module_name,
            module_version,
            register,
            install_dispatch,
            guarded_register,
        }
    }

    /// Run `register` behind the module-side panic guard.
    pub(crate) fn register_types(&self, registrar: &mut TypeRegistrar) -> Result<(), String> {
        (self.guarded_register)(self.register, registrar)
    }
}

impl std::fmt::Debug for PluginDeclaration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDeclaration")
            .field("abi_version", &self.abi_version)
            .field("plugkit_version", &self.plugkit_version)
            .field("module_name", &self.module_name)
            .field("module_version", &self.module_version)
            .finish_non_exhaustive()
    }
}

/// Default `install_dispatch` used by [`declare_plugin_module!`](crate::declare_plugin_module).
///
/// Runs inside the module, so it sets the module's own copy of the `tracing` global.
pub fn install_dispatch(dispatch: &tracing::Dispatch) {
    if tracing::dispatcher::set_global_default(dispatch.clone()).is_err() {
        tracing::debug!("module already has a global tracing dispatcher");
    }
}

/// Export the plugin declaration of the current crate.
///
/// ```ignore
/// plugkit::declare_plugin_module! {
///     name: "demo_plugin",
///     register: register_types,
/// }
///
/// fn register_types(registrar: &mut plugkit::TypeRegistrar) {
///     registrar.register(MyPlugin::DESCRIPTOR);
/// }
/// ```
#[macro_export]
macro_rules! declare_plugin_module {
    (name: $name:expr, register: $register:path $(,)?) => {
        $crate::declare_plugin_module! {
            name: $name,
            version: env!("CARGO_PKG_VERSION"),
            register: $register,
        }
    };
    (name: $name:expr, version: $version:expr, register: $register:path $(,)?) => {
        #[allow(unsafe_code)]
        #[unsafe(no_mangle)]
        pub static PLUGKIT_PLUGIN_DECLARATION: $crate::PluginDeclaration =
            $crate::PluginDeclaration::new($name, $version, $register);
    };
}
