use std::sync::Arc;

use plugkit::{
    Constructor, ConstructorArgs, DebugField, ParamKind, Plugin, ServiceProvider, TypeDescriptor,
};

/// Prints a fixed message. Its constructor takes the hub and a text argument, so the
/// host's one-argument construction is rejected with a signature mismatch.
pub struct EchoPlugin {
    services: Arc<dyn ServiceProvider>,
    message: String,
}

impl EchoPlugin {
    pub const TYPE_NAME: &'static str = "demo_plugin::EchoPlugin";

    pub const DESCRIPTOR: TypeDescriptor = TypeDescriptor::concrete(
        Self::TYPE_NAME,
        Constructor::new(&[ParamKind::ServiceProvider, ParamKind::Text], Self::create),
    );

    fn create(args: &ConstructorArgs) -> anyhow::Result<Box<dyn Plugin>> {
        Ok(Box::new(Self {
            services: args.service_provider(0)?,
            message: args.text(1)?.to_owned(),
        }))
    }
}

impl Plugin for EchoPlugin {
    fn run(&mut self) -> anyhow::Result<i32> {
        println!("{}", self.message);
        Ok(0)
    }

    fn debug_fields(&self) -> Vec<DebugField> {
        vec![
            DebugField::new("message", &self.message),
            DebugField::new("services", self.services.contract_ids().len()),
        ]
    }
}
