#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Demo plugin module.
//!
//! Built as a `cdylib` and loaded by `plugin-host` at run time:
//!
//! ```text
//! plugin-host target/debug/libdemo_plugin.so demo_plugin::MyPlugin
//! ```

mod echo;
mod faults;
mod my_plugin;

pub use echo::EchoPlugin;
pub use faults::{PanickingConstructor, PanickingRun};
pub use my_plugin::MyPlugin;

use plugkit::TypeRegistrar;

plugkit::declare_plugin_module! {
    name: "demo_plugin",
    register: register_types,
}

/// Exported type table of this module.
pub fn register_types(registrar: &mut TypeRegistrar) {
    registrar
        .register(MyPlugin::DESCRIPTOR)
        .register(EchoPlugin::DESCRIPTOR)
        .register(PanickingConstructor::DESCRIPTOR)
        .register(PanickingRun::DESCRIPTOR);
}
