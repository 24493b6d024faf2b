use plugkit::{ConcreteType, ServiceContract};

use crate::models::QueryArgs;

/// A service that answers text queries.
pub trait DemoService: ConcreteType + Send + Sync {
    fn query(&self, query: &str, args: &QueryArgs) -> String;
}

impl ServiceContract for dyn DemoService {
    const CONTRACT_ID: &'static str = "IDemoService";
}
