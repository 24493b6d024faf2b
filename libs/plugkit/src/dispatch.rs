//! Late-bound invocation of service operations by name.
//!
//! A contract opts in by implementing [`Dispatch`] for its trait object and listing its
//! operations in a static table. Callers holding only `&dyn Contract` can then invoke an
//! operation by name with boxed ([`serde_json::Value`]) arguments:
//!
//! 1. the operation is looked up by name in the contract's table;
//! 2. each argument is checked against the declared parameter kind by assignability
//!    (integers widen to floats, objects become records);
//! 3. the operation runs and its boxed result is checked against the declared kind;
//! 4. [`invoke_as`] unboxes the result into the caller's type.
//!
//! Operation names are unique per contract. A table that lists a name twice makes
//! every call to that name fail with [`InvokeError::AmbiguousMethod`].

use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::contracts::ConcreteType;
use crate::service_hub::ServiceContract;

/// Contracts whose operations can be invoked by name.
pub trait Dispatch: ServiceContract {
    fn operations() -> &'static [Operation<Self>];
}

/// Kind of a boxed value as declared by an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    Integer,
    Float,
    Boolean,
    /// A structured record, boxed as a JSON object.
    Record,
    Any,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "Text",
            Self::Integer => "Integer",
            Self::Float => "Float",
            Self::Boolean => "Boolean",
            Self::Record => "Record",
            Self::Any => "Any",
        })
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "Boolean",
        Value::Number(n) if n.is_f64() => "Float",
        Value::Number(_) => "Integer",
        Value::String(_) => "Text",
        Value::Array(_) => "Array",
        Value::Object(_) => "Record",
    }
}

impl ValueKind {
    /// Check that `value` can be assigned to this kind, converting where a widening
    /// conversion exists.
    ///
    /// # Errors
    /// Returns a description of the mismatch.
    pub fn coerce(self, value: Value) -> Result<Value, String> {
        match (self, value) {
            (Self::Any, v)
            | (Self::Text, v @ Value::String(_))
            | (Self::Boolean, v @ Value::Bool(_))
            | (Self::Record, v @ Value::Object(_)) => Ok(v),
            (Self::Integer, Value::Number(n)) if !n.is_f64() => Ok(Value::Number(n)),
            (Self::Float, Value::Number(n)) => match n.as_f64() {
                Some(f) => Ok(Value::from(f)),
                None => Err(format!("number {n} is not representable as Float")),
            },
            (kind, v) => Err(format!("expected {kind}, got {}", describe(&v))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Param {
    pub name: &'static str,
    pub kind: ValueKind,
}

impl Param {
    #[must_use]
    pub const fn new(name: &'static str, kind: ValueKind) -> Self {
        Self { name, kind }
    }
}

/// Function behind an operation: receives the service and the checked arguments.
pub type OperationFn<S> = fn(&S, &Arguments) -> Result<Value, CallError>;

/// One entry of a contract's operation table.
pub struct Operation<S: ?Sized + 'static> {
    pub name: &'static str,
    pub params: &'static [Param],
    pub returns: ValueKind,
    pub call: OperationFn<S>,
}

impl<S: ?Sized> fmt::Debug for Operation<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .finish_non_exhaustive()
    }
}

/// Arguments of one late-bound call, already checked against the parameter kinds.
#[derive(Debug)]
pub struct Arguments {
    values: Vec<Value>,
}

impl Arguments {
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Unbox argument `index` into `T`. Record fields missing from the boxed value take
    /// their serde defaults.
    ///
    /// # Errors
    /// [`CallError::Argument`] if the argument is missing or does not deserialize.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T, CallError> {
        let value = self
            .values
            .get(index)
            .ok_or_else(|| CallError::Argument(format!("argument #{index} is missing")))?;
        T::deserialize(value)
            .map_err(|e| CallError::Argument(format!("argument #{index}: {e}")))
    }
}

/// Failure reported by an operation function.
#[derive(Debug)]
pub enum CallError {
    /// An argument could not be unboxed into the operation's parameter type.
    Argument(String),
    /// The operation itself failed.
    Target(anyhow::Error),
}

impl CallError {
    #[must_use]
    pub fn target(err: impl Into<anyhow::Error>) -> Self {
        Self::Target(err.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("operation '{method}' not found on contract {contract}")]
    MethodNotFound { contract: String, method: String },

    #[error("operation '{method}' is declared more than once on contract {contract}")]
    AmbiguousMethod { contract: String, method: String },

    #[error("arguments do not match operation '{method}': {detail}")]
    ArgumentMismatch { method: String, detail: String },

    #[error("operation '{method}' failed")]
    InvocationTarget {
        method: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("result of operation '{method}' cannot be unboxed: {detail}")]
    ResultMismatch { method: String, detail: String },
}

/// Find `method` in the operation table of `S`.
///
/// # Errors
/// [`InvokeError::MethodNotFound`] or [`InvokeError::AmbiguousMethod`].
pub fn find_operation<S>(method: &str) -> Result<&'static Operation<S>, InvokeError>
where
    S: ?Sized + Dispatch,
{
    let mut matches = S::operations().iter().filter(|op| op.name == method);
    match (matches.next(), matches.next()) {
        (Some(op), None) => Ok(op),
        (Some(_), Some(_)) => Err(InvokeError::AmbiguousMethod {
            contract: S::CONTRACT_ID.to_owned(),
            method: method.to_owned(),
        }),
        (None, _) => Err(InvokeError::MethodNotFound {
            contract: S::CONTRACT_ID.to_owned(),
            method: method.to_owned(),
        }),
    }
}

/// Names of all operations of `S`, in table order.
#[must_use]
pub fn operation_names<S>() -> Vec<&'static str>
where
    S: ?Sized + Dispatch,
{
    S::operations().iter().map(|op| op.name).collect()
}

/// Invoke `method` on `service` with boxed arguments and return the boxed result.
///
/// # Errors
/// See [`InvokeError`].
pub fn invoke<S>(service: &S, method: &str, args: Vec<Value>) -> Result<Value, InvokeError>
where
    S: ?Sized + Dispatch + ConcreteType,
{
    let op = find_operation::<S>(method)?;

    if args.len() != op.params.len() {
        return Err(InvokeError::ArgumentMismatch {
            method: method.to_owned(),
            detail: format!(
                "expected {} argument(s), got {}",
                op.params.len(),
                args.len()
            ),
        });
    }

    let values = op
        .params
        .iter()
        .zip(args)
        .enumerate()
        .map(|(i, (param, value))| {
            param
                .kind
                .coerce(value)
                .map_err(|detail| InvokeError::ArgumentMismatch {
                    method: method.to_owned(),
                    detail: format!("parameter #{i} '{}': {detail}", param.name),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    tracing::trace!(
        contract = S::CONTRACT_ID,
        concrete_type = service.concrete_type_name(),
        method,
        "late-bound call"
    );

    let result = (op.call)(service, &Arguments { values }).map_err(|e| match e {
        CallError::Argument(detail) => InvokeError::ArgumentMismatch {
            method: method.to_owned(),
            detail,
        },
        CallError::Target(source) => InvokeError::InvocationTarget {
            method: method.to_owned(),
            source,
        },
    })?;

    op.returns
        .coerce(result)
        .map_err(|detail| InvokeError::ResultMismatch {
            method: method.to_owned(),
            detail,
        })
}

/// [`invoke`], then unbox the result into `R`.
///
/// # Errors
/// See [`InvokeError`]; unboxing failures are [`InvokeError::ResultMismatch`].
pub fn invoke_as<R, S>(service: &S, method: &str, args: Vec<Value>) -> Result<R, InvokeError>
where
    R: DeserializeOwned,
    S: ?Sized + Dispatch + ConcreteType,
{
    let value = invoke(service, method, args)?;
    serde_json::from_value(value).map_err(|e| InvokeError::ResultMismatch {
        method: method.to_owned(),
        detail: e.to_string(),
    })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    trait Calc: ConcreteType + Send + Sync {
        fn add(&self, a: i64, b: i64) -> i64;
        fn scale(&self, x: f64, k: f64) -> f64;
        fn divide(&self, a: i64, b: i64) -> anyhow::Result<i64>;
    }

    impl ServiceContract for dyn Calc {
        const CONTRACT_ID: &'static str = "ICalc";
    }

    struct Basic;
    impl Calc for Basic {
        fn add(&self, a: i64, b: i64) -> i64 {
            a + b
        }
        fn scale(&self, x: f64, k: f64) -> f64 {
            x * k
        }
        fn divide(&self, a: i64, b: i64) -> anyhow::Result<i64> {
            anyhow::ensure!(b != 0, "division by zero");
            Ok(a / b)
        }
    }

    fn op_add(s: &dyn Calc, args: &Arguments) -> Result<Value, CallError> {
        Ok(json!(s.add(args.get(0)?, args.get(1)?)))
    }

    fn op_scale(s: &dyn Calc, args: &Arguments) -> Result<Value, CallError> {
        Ok(json!(s.scale(args.get(0)?, args.get(1)?)))
    }

    fn op_divide(s: &dyn Calc, args: &Arguments) -> Result<Value, CallError> {
        let q = s
            .divide(args.get(0)?, args.get(1)?)
            .map_err(CallError::target)?;
        Ok(json!(q))
    }

    fn op_lies(_: &dyn Calc, _: &Arguments) -> Result<Value, CallError> {
        Ok(json!(1))
    }

    fn op_reads_too_much(_: &dyn Calc, args: &Arguments) -> Result<Value, CallError> {
        let third: i64 = args.get(2)?;
        Ok(json!(third))
    }

    const TWO_INTS: &[Param] = &[
        Param::new("a", ValueKind::Integer),
        Param::new("b", ValueKind::Integer),
    ];

    static CALC_OPERATIONS: &[Operation<dyn Calc>] = &[
        Operation {
            name: "add",
            params: TWO_INTS,
            returns: ValueKind::Integer,
            call: op_add,
        },
        Operation {
            name: "scale",
            params: &[
                Param::new("x", ValueKind::Float),
                Param::new("k", ValueKind::Float),
            ],
            returns: ValueKind::Float,
            call: op_scale,
        },
        Operation {
            name: "divide",
            params: TWO_INTS,
            returns: ValueKind::Integer,
            call: op_divide,
        },
        Operation {
            name: "lies",
            params: &[],
            returns: ValueKind::Text,
            call: op_lies,
        },
        Operation {
            name: "reads_too_much",
            params: TWO_INTS,
            returns: ValueKind::Integer,
            call: op_reads_too_much,
        },
        Operation {
            name: "twice",
            params: &[],
            returns: ValueKind::Any,
            call: op_lies,
        },
        Operation {
            name: "twice",
            params: &[],
            returns: ValueKind::Any,
            call: op_lies,
        },
    ];

    impl Dispatch for dyn Calc {
        fn operations() -> &'static [Operation<Self>] {
            CALC_OPERATIONS
        }
    }

    fn calc() -> Box<dyn Calc> {
        Box::new(Basic)
    }

    #[test]
    fn late_bound_matches_direct_call() {
        let svc = calc();
        let direct = svc.add(2, 40);
        let late: i64 = invoke_as(svc.as_ref(), "add", vec![json!(2), json!(40)]).unwrap();
        assert_eq!(direct, late);
    }

    #[test]
    fn integers_widen_to_float_parameters() {
        let svc = calc();
        let late: f64 = invoke_as(svc.as_ref(), "scale", vec![json!(3), json!(0.5)]).unwrap();
        assert!((late - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn float_is_not_assignable_to_integer() {
        let svc = calc();
        let err = invoke(svc.as_ref(), "add", vec![json!(1.5), json!(2)]).unwrap_err();
        match err {
            InvokeError::ArgumentMismatch { method, detail } => {
                assert_eq!(method, "add");
                assert_eq!(detail, "parameter #0 'a': expected Integer, got Float");
            }
            other => panic!("expected ArgumentMismatch, got {other:?}"),
        }
    }

    #[test]
    fn arity_mismatch_is_argument_mismatch() {
        let svc = calc();
        let err = invoke(svc.as_ref(), "add", vec![json!(1)]).unwrap_err();
        assert!(
            matches!(&err, InvokeError::ArgumentMismatch { detail, .. } if detail == "expected 2 argument(s), got 1")
        );
    }

    #[test]
    fn unknown_method_is_method_not_found() {
        let svc = calc();
        match invoke(svc.as_ref(), "multiply", vec![]).unwrap_err() {
            InvokeError::MethodNotFound { contract, method } => {
                assert_eq!(contract, "ICalc");
                assert_eq!(method, "multiply");
            }
            other => panic!("expected MethodNotFound, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_names_are_ambiguous() {
        let svc = calc();
        let err = invoke(svc.as_ref(), "twice", vec![]).unwrap_err();
        assert!(matches!(err, InvokeError::AmbiguousMethod { .. }));
    }

    #[test]
    fn target_failure_is_distinguishable() {
        let svc = calc();
        match invoke(svc.as_ref(), "divide", vec![json!(1), json!(0)]).unwrap_err() {
            InvokeError::InvocationTarget { method, source } => {
                assert_eq!(method, "divide");
                assert_eq!(source.to_string(), "division by zero");
            }
            other => panic!("expected InvocationTarget, got {other:?}"),
        }
    }

    #[test]
    fn missing_argument_inside_operation_is_argument_mismatch() {
        let svc = calc();
        let err = invoke(svc.as_ref(), "reads_too_much", vec![json!(1), json!(2)]).unwrap_err();
        assert!(
            matches!(&err, InvokeError::ArgumentMismatch { detail, .. } if detail == "argument #2 is missing")
        );
    }

    #[test]
    fn result_kind_is_checked() {
        let svc = calc();
        let err = invoke(svc.as_ref(), "lies", vec![]).unwrap_err();
        assert!(matches!(err, InvokeError::ResultMismatch { .. }));
    }

    #[test]
    fn result_unboxing_to_wrong_type_is_result_mismatch() {
        let svc = calc();
        let err = invoke_as::<String, _>(svc.as_ref(), "add", vec![json!(1), json!(2)]).unwrap_err();
        assert!(matches!(err, InvokeError::ResultMismatch { .. }));
    }

    #[test]
    fn operation_names_follow_table_order() {
        let names = operation_names::<dyn Calc>();
        assert_eq!(&names[..3], ["add", "scale", "divide"]);
    }

    #[test]
    fn coerce_rules() {
        assert_eq!(ValueKind::Any.coerce(Value::Null), Ok(Value::Null));
        assert_eq!(ValueKind::Record.coerce(json!({})), Ok(json!({})));
        assert_eq!(
            ValueKind::Record.coerce(Value::Null),
            Err("expected Record, got null".to_owned())
        );
        assert_eq!(
            ValueKind::Text.coerce(json!(5)),
            Err("expected Text, got Integer".to_owned())
        );
        assert_eq!(ValueKind::Boolean.coerce(json!(true)), Ok(json!(true)));
        assert_eq!(ValueKind::Float.coerce(json!(2)), Ok(json!(2.0)));
    }
}
