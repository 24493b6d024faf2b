use std::any::Any;
use std::fmt;

/// Entry point of an object created from a loaded module.
///
/// The host calls `run` exactly once, synchronously. The returned code becomes the
/// process exit status; an `Err` is fatal for the host.
pub trait Plugin {
    fn run(&mut self) -> anyhow::Result<i32>;

    /// Optional debug-dump hook. Printed by the host after `run` as
    /// `Field: <name> , value = <value>`.
    fn debug_fields(&self) -> Vec<DebugField> {
        Vec::new()
    }
}

/// One entry of a plugin's debug dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugField {
    pub name: String,
    pub value: String,
}

impl DebugField {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl fmt::Display) -> Self {
        Self {
            name: name.into(),
            value: value.to_string(),
        }
    }
}

impl fmt::Display for DebugField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Field: {} , value = {}", self.name, self.value)
    }
}

/// Run-time name of the concrete type behind a trait object.
///
/// Add it as a supertrait of a service contract so callers holding only
/// `&dyn Contract` can still report which implementation they talk to.
///
/// Call it on the trait object (`service.as_ref()`), not on an `Arc` or `Box`: the
/// smart pointer implements it too and would report its own type.
pub trait ConcreteType {
    fn concrete_type_name(&self) -> &'static str;
}

impl<T: Any> ConcreteType for T {
    fn concrete_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}
