//! Operation table of `IDemoService` for late-bound calls.

use plugkit::dispatch::{Arguments, CallError, Dispatch, Operation, Param, ValueKind};
use serde_json::Value;

use crate::api::DemoService;
use crate::models::QueryArgs;

fn query(service: &dyn DemoService, args: &Arguments) -> Result<Value, CallError> {
    let text: String = args.get(0)?;
    let query_args: QueryArgs = args.get(1)?;
    Ok(Value::String(service.query(&text, &query_args)))
}

static OPERATIONS: &[Operation<dyn DemoService>] = &[Operation {
    name: "query",
    params: &[
        Param::new("query", ValueKind::Text),
        Param::new("args", ValueKind::Record),
    ],
    returns: ValueKind::Text,
    call: query,
}];

impl Dispatch for dyn DemoService {
    fn operations() -> &'static [Operation<Self>] {
        OPERATIONS
    }
}
