//! Exported type table of a plugin module.
//!
//! A module fills a [`TypeRegistrar`] from its declaration's `register` function.
//! Each entry maps a fully-qualified type name to a [`TypeDescriptor`]; concrete types
//! carry a [`Constructor`] with a declared parameter list, abstract ones don't.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::contracts::Plugin;
use crate::guard::{BuildFn, GuardedPlugin, ModuleFailure, guarded_build};
use crate::service_hub::ServiceProvider;

/// Parameter kinds a constructor may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    ServiceProvider,
    Text,
    Integer,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ServiceProvider => "ServiceProvider",
            Self::Text => "Text",
            Self::Integer => "Integer",
        })
    }
}

/// A value the host passes to a constructor.
#[derive(Clone)]
pub enum ConstructorArg {
    ServiceProvider(Arc<dyn ServiceProvider>),
    Text(String),
    Integer(i64),
}

impl ConstructorArg {
    #[must_use]
    pub fn kind(&self) -> ParamKind {
        match self {
            Self::ServiceProvider(_) => ParamKind::ServiceProvider,
            Self::Text(_) => ParamKind::Text,
            Self::Integer(_) => ParamKind::Integer,
        }
    }
}

impl fmt::Debug for ConstructorArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceProvider(_) => f.write_str("ServiceProvider(..)"),
            Self::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Self::Integer(i) => f.debug_tuple("Integer").field(i).finish(),
        }
    }
}

/// Arguments handed to a factory, already checked against its declared parameters.
#[derive(Debug)]
pub struct ConstructorArgs {
    args: Vec<ConstructorArg>,
}

impl ConstructorArgs {
    pub(crate) fn new(args: Vec<ConstructorArg>) -> Self {
        Self { args }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.args.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// # Errors
    /// Fails if position `index` is missing or holds another kind.
    pub fn service_provider(&self, index: usize) -> anyhow::Result<Arc<dyn ServiceProvider>> {
        match self.args.get(index) {
            Some(ConstructorArg::ServiceProvider(sp)) => Ok(Arc::clone(sp)),
            other => Err(Self::wrong_kind(index, ParamKind::ServiceProvider, other)),
        }
    }

    /// # Errors
    /// Fails if position `index` is missing or holds another kind.
    pub fn text(&self, index: usize) -> anyhow::Result<&str> {
        match self.args.get(index) {
            Some(ConstructorArg::Text(s)) => Ok(s),
            other => Err(Self::wrong_kind(index, ParamKind::Text, other)),
        }
    }

    /// # Errors
    /// Fails if position `index` is missing or holds another kind.
    pub fn integer(&self, index: usize) -> anyhow::Result<i64> {
        match self.args.get(index) {
            Some(ConstructorArg::Integer(i)) => Ok(*i),
            other => Err(Self::wrong_kind(index, ParamKind::Integer, other)),
        }
    }

    fn wrong_kind(index: usize, wanted: ParamKind, got: Option<&ConstructorArg>) -> anyhow::Error {
        match got {
            Some(arg) => anyhow::anyhow!(
                "constructor argument #{index}: expected {wanted}, got {}",
                arg.kind()
            ),
            None => anyhow::anyhow!("constructor argument #{index}: expected {wanted}, got nothing"),
        }
    }
}

/// Module function that builds an instance from checked constructor arguments.
pub type Factory = fn(&ConstructorArgs) -> anyhow::Result<Box<dyn Plugin>>;

/// Declared parameter list plus the function that builds the instance.
#[derive(Clone, Copy)]
pub struct Constructor {
    pub params: &'static [ParamKind],
    pub factory: Factory,
    build: BuildFn,
}

impl Constructor {
    /// Evaluated inside the module that owns `factory`, so the panic guard it captures
    /// is the module's own. The host calls that guard instead of `factory`.
    #[must_use]
    pub const fn new(params: &'static [ParamKind], factory: Factory) -> Self {
        Self {
            params,
            factory,
            build: guarded_build,
        }
    }

    /// True when `args` has the declared arity and every argument fits its slot.
    #[must_use]
    pub fn accepts(&self, args: &[ConstructorArg]) -> bool {
        self.params.len() == args.len()
            && self
                .params
                .iter()
                .zip(args)
                .all(|(param, arg)| *param == arg.kind())
    }

    pub(crate) fn build(
        &self,
        args: &ConstructorArgs,
    ) -> Result<Box<dyn GuardedPlugin>, ModuleFailure> {
        (self.build)(self.factory, args)
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Concrete,
    Abstract,
}

/// One exported type.
#[derive(Debug, Clone, Copy)]
pub struct TypeDescriptor {
    pub name: &'static str,
    pub kind: TypeKind,
    pub constructor: Option<Constructor>,
}

impl TypeDescriptor {
    #[must_use]
    pub const fn concrete(name: &'static str, constructor: Constructor) -> Self {
        Self {
            name,
            kind: TypeKind::Concrete,
            constructor: Some(constructor),
        }
    }

    /// A type that is exported for discovery but cannot be instantiated.
    #[must_use]
    pub const fn abstract_type(name: &'static str) -> Self {
        Self {
            name,
            kind: TypeKind::Abstract,
            constructor: None,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("exported type name must not be empty")]
    EmptyName,

    #[error("type '{name}' exported more than once")]
    DuplicateType { name: String },

    #[error("type registration panicked: {message}")]
    Panicked { message: String },
}

/// Collects a module's type table. Errors are recorded and reported by [`finish`](Self::finish)
/// so a module's `register` function stays infallible.
#[derive(Default)]
pub struct TypeRegistrar {
    types: Vec<TypeDescriptor>,
    seen: HashSet<&'static str>,
    errors: Vec<RegistrationError>,
}

impl TypeRegistrar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: TypeDescriptor) -> &mut Self {
        if descriptor.name.trim().is_empty() {
            self.errors.push(RegistrationError::EmptyName);
        } else if !self.seen.insert(descriptor.name) {
            self.errors.push(RegistrationError::DuplicateType {
                name: descriptor.name.to_owned(),
            });
        } else {
            self.types.push(descriptor);
        }
        self
    }

    /// # Errors
    /// Returns the first recorded [`RegistrationError`].
    pub fn finish(self) -> Result<Vec<TypeDescriptor>, RegistrationError> {
        match self.errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(self.types),
        }
    }
}
