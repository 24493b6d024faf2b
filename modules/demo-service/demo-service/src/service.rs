use std::sync::Arc;

use demo_service_sdk::{DemoService, QueryArgs};
use plugkit::{ServiceError, ServiceHub, ServiceRegistration};

/// Answers queries by concatenating the query text with the argument fields.
#[derive(Debug)]
pub struct ConcatDemoService {
    count: i32,
}

impl Default for ConcatDemoService {
    fn default() -> Self {
        Self { count: 123 }
    }
}

impl ConcatDemoService {
    #[must_use]
    pub fn count(&self) -> i32 {
        self.count
    }
}

impl DemoService for ConcatDemoService {
    fn query(&self, query: &str, args: &QueryArgs) -> String {
        tracing::debug!(query, name = %args.name, age = args.age, "demo query");
        format!("exe:{query}, {}, {}", args.name, args.age)
    }
}

/// Register [`ConcatDemoService`] as `IDemoService`.
///
/// # Errors
/// Fails if the hub is already sealed.
pub fn register(hub: &ServiceHub) -> Result<(), ServiceError> {
    let api: Arc<dyn DemoService> = Arc::new(ConcatDemoService::default());
    hub.register::<dyn DemoService>(api)
}

inventory::submit! {
    ServiceRegistration::new("demo_service", register)
}
