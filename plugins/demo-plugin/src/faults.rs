//! Types that fail inside the module. The host reports them and keeps going (or
//! exits with an error for a failed run) instead of aborting.

use plugkit::{Constructor, ConstructorArgs, ParamKind, Plugin, TypeDescriptor};

/// Its constructor panics.
pub struct PanickingConstructor;

impl PanickingConstructor {
    pub const TYPE_NAME: &'static str = "demo_plugin::PanickingConstructor";

    pub const DESCRIPTOR: TypeDescriptor = TypeDescriptor::concrete(
        Self::TYPE_NAME,
        Constructor::new(&[ParamKind::ServiceProvider], Self::create),
    );

    fn create(_: &ConstructorArgs) -> anyhow::Result<Box<dyn Plugin>> {
        panic!("PanickingConstructor refuses to be built")
    }
}

/// Constructs fine, panics in `run`.
pub struct PanickingRun;

impl PanickingRun {
    pub const TYPE_NAME: &'static str = "demo_plugin::PanickingRun";

    pub const DESCRIPTOR: TypeDescriptor = TypeDescriptor::concrete(
        Self::TYPE_NAME,
        Constructor::new(&[ParamKind::ServiceProvider], Self::create),
    );

    #[allow(clippy::unnecessary_wraps)]
    fn create(_: &ConstructorArgs) -> anyhow::Result<Box<dyn Plugin>> {
        Ok(Box::new(Self))
    }
}

impl Plugin for PanickingRun {
    fn run(&mut self) -> anyhow::Result<i32> {
        panic!("PanickingRun gave up mid-run")
    }
}
