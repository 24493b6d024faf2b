//! Constructing exported types without static knowledge of them.

use std::marker::PhantomData;

use crate::contracts::DebugField;
use crate::guard::{GuardedPlugin, ModuleFailure};
use crate::loader::{LoadedModule, ResolvedType};
use crate::registry::{ConstructorArg, ConstructorArgs, ParamKind};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum InstantiationError {
    #[error("type '{type_name}' is abstract and has no constructor")]
    Abstract { type_name: String },

    #[error(
        "no constructor of '{type_name}' accepts the supplied arguments: expected ({expected}), supplied ({supplied})"
    )]
    SignatureMismatch {
        type_name: String,
        expected: String,
        supplied: String,
    },

    #[error("constructor of '{type_name}' failed: {message}")]
    Constructor { type_name: String, message: String },

    #[error("constructor of '{type_name}' panicked: {message}")]
    Panicked { type_name: String, message: String },
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PluginRunError {
    #[error("plugin '{type_name}' failed: {message}")]
    Failed { type_name: String, message: String },

    #[error("plugin '{type_name}' panicked: {message}")]
    Panicked { type_name: String, message: String },
}

fn signature(kinds: impl IntoIterator<Item = ParamKind>) -> String {
    kinds
        .into_iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Create an instance of `ty`, passing `args` to its constructor.
///
/// Argument count and kinds must match the declared parameter list exactly; no
/// instance is produced otherwise. Errors and panics raised by the constructor are
/// caught and flattened to text inside the module, before they reach the host.
///
/// # Errors
/// See [`InstantiationError`].
pub fn instantiate<'m>(
    ty: ResolvedType<'m>,
    args: &[ConstructorArg],
) -> Result<PluginInstance<'m>, InstantiationError> {
    let type_name = ty.name();
    let Some(ctor) = ty.descriptor().constructor else {
        return Err(InstantiationError::Abstract {
            type_name: type_name.to_owned(),
        });
    };

    if !ctor.accepts(args) {
        return Err(InstantiationError::SignatureMismatch {
            type_name: type_name.to_owned(),
            expected: signature(ctor.params.iter().copied()),
            supplied: signature(args.iter().map(ConstructorArg::kind)),
        });
    }

    let ctor_args = ConstructorArgs::new(args.to_vec());
    let inner = ctor.build(&ctor_args).map_err(|failure| match failure {
        ModuleFailure::Failed(message) => InstantiationError::Constructor {
            type_name: type_name.to_owned(),
            message,
        },
        ModuleFailure::Panicked(message) => InstantiationError::Panicked {
            type_name: type_name.to_owned(),
            message,
        },
    })?;

    tracing::debug!(
        type_name,
        module = %ty.module().name(),
        "plugin instance created"
    );
    Ok(PluginInstance {
        type_name,
        inner,
        _module: PhantomData,
    })
}

/// A live object created from a loaded module.
///
/// Its code and vtable live in the module, so the instance is bound to the module's
/// lifetime and is dropped before the library can be unmapped.
pub struct PluginInstance<'m> {
    type_name: &'m str,
    inner: Box<dyn GuardedPlugin>,
    _module: PhantomData<&'m LoadedModule>,
}

impl<'m> PluginInstance<'m> {
    #[must_use]
    pub fn type_name(&self) -> &'m str {
        self.type_name
    }

    /// Call the plugin's entry point.
    ///
    /// # Errors
    /// [`PluginRunError::Failed`] when `run` returns an error, [`PluginRunError::Panicked`]
    /// when it panics.
    pub fn run(&mut self) -> Result<i32, PluginRunError> {
        self.inner.run().map_err(|failure| match failure {
            ModuleFailure::Failed(message) => PluginRunError::Failed {
                type_name: self.type_name.to_owned(),
                message,
            },
            ModuleFailure::Panicked(message) => PluginRunError::Panicked {
                type_name: self.type_name.to_owned(),
                message,
            },
        })
    }

    /// The plugin's debug dump. A panicking hook yields an empty dump.
    #[must_use]
    pub fn debug_fields(&self) -> Vec<DebugField> {
        self.inner.debug_fields().unwrap_or_else(|message| {
            tracing::warn!(type_name = self.type_name, %message, "debug_fields panicked");
            Vec::new()
        })
    }
}

impl std::fmt::Debug for PluginInstance<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginInstance")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}
