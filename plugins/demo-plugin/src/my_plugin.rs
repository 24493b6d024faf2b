use std::sync::Arc;

use anyhow::Context;
use demo_service_sdk::{DemoService, QueryArgs};
use plugkit::{
    Constructor, ConstructorArgs, DebugField, ParamKind, Plugin, ServiceProvider,
    TypeDescriptor,
};
use serde_json::Value;

/// Looks up `IDemoService` and queries it twice: once through the contract trait and
/// once by operation name.
pub struct MyPlugin {
    services: Arc<dyn ServiceProvider>,
    direct: Option<String>,
    late_bound: Option<String>,
}

impl MyPlugin {
    pub const TYPE_NAME: &'static str = "demo_plugin::MyPlugin";

    pub const DESCRIPTOR: TypeDescriptor = TypeDescriptor::concrete(
        Self::TYPE_NAME,
        Constructor::new(&[ParamKind::ServiceProvider], Self::create),
    );

    #[must_use]
    pub fn new(services: Arc<dyn ServiceProvider>) -> Self {
        Self {
            services,
            direct: None,
            late_bound: None,
        }
    }

    fn create(args: &ConstructorArgs) -> anyhow::Result<Box<dyn Plugin>> {
        Ok(Box::new(Self::new(args.service_provider(0)?)))
    }

    /// Query `service` directly with `("Hello", args)` and late-bound with `("Hello2", args)`.
    ///
    /// # Errors
    /// Fails if the late-bound call cannot be completed.
    pub fn query_both(
        service: &(dyn DemoService + 'static),
        args: &QueryArgs,
    ) -> anyhow::Result<(String, String)> {
        let direct = service.query("Hello", args);

        let boxed = serde_json::to_value(args).context("boxing QueryArgs")?;
        let late_bound: String = plugkit::invoke_as(
            service,
            "query",
            vec![Value::from("Hello2"), boxed],
        )
        .context("late-bound call of IDemoService.query")?;

        Ok((direct, late_bound))
    }

    #[must_use]
    pub fn results(&self) -> (Option<&str>, Option<&str>) {
        (self.direct.as_deref(), self.late_bound.as_deref())
    }
}

impl Plugin for MyPlugin {
    fn run(&mut self) -> anyhow::Result<i32> {
        let service = self
            .services
            .get::<dyn DemoService>()
            .context("resolving IDemoService")?;
        tracing::debug!(
            implementation = service.as_ref().concrete_type_name(),
            "IDemoService resolved"
        );

        let (direct, late_bound) = Self::query_both(service.as_ref(), &QueryArgs::new("AOT", 18))?;
        println!("{direct}");
        println!("{late_bound}");

        self.direct = Some(direct);
        self.late_bound = Some(late_bound);
        Ok(0)
    }

    fn debug_fields(&self) -> Vec<DebugField> {
        vec![
            DebugField::new("services", self.services.contract_ids().join(",")),
            DebugField::new("direct", self.direct.as_deref().unwrap_or_default()),
            DebugField::new("late_bound", self.late_bound.as_deref().unwrap_or_default()),
        ]
    }
}
