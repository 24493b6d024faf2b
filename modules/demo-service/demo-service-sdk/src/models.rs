use serde::{Deserialize, Serialize};

/// Structured argument of [`DemoService::query`](crate::DemoService::query).
///
/// Fields missing from a boxed value take their defaults when unboxed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryArgs {
    pub name: String,
    pub age: i32,
}

impl QueryArgs {
    #[must_use]
    pub fn new(name: impl Into<String>, age: i32) -> Self {
        Self {
            name: name.into(),
            age,
        }
    }
}
