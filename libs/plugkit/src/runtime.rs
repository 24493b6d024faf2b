//! Host-side orchestration: resolve an exported type, create it with the service hub,
//! run it once and collect its debug dump.

use std::io;
use std::sync::Arc;

use crate::contracts::DebugField;
use crate::instantiate::{InstantiationError, PluginRunError, instantiate};
use crate::loader::LoadedModule;
use crate::registry::ConstructorArg;
use crate::service_hub::{ServiceHub, ServiceProvider};

/// How one plugin run ended, short of a fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed {
        type_name: String,
        exit_code: i32,
        fields: Vec<DebugField>,
    },
    /// The module does not export the requested type. Handled, not fatal.
    TypeNotFound { type_name: String, module: String },
    /// The type exists but could not be constructed. Handled, not fatal.
    InstantiationFailed(InstantiationError),
}

impl RunOutcome {
    /// Process exit status for this outcome. Handled failures exit with 0.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed { exit_code, .. } => *exit_code,
            Self::TypeNotFound { .. } | Self::InstantiationFailed(_) => 0,
        }
    }

    /// Write the line-oriented report: one diagnostic line for handled failures, the
    /// field dump for completed runs.
    ///
    /// # Errors
    /// Propagates write errors.
    pub fn write_report(&self, out: &mut dyn io::Write) -> io::Result<()> {
        match self {
            Self::Completed { fields, .. } => {
                for field in fields {
                    writeln!(out, "{field}")?;
                }
            }
            Self::TypeNotFound { type_name, module } => {
                writeln!(out, "cannot find type {type_name} in module {module}")?;
            }
            Self::InstantiationFailed(err) => {
                writeln!(out, "cannot create instance: {err}")?;
            }
        }
        Ok(())
    }
}

/// Run `type_name` from `module` once.
///
/// Seals `services` first: from here on the hub is read-only. The hub is handed to the
/// plugin's constructor as its only argument.
///
/// # Errors
/// Only a failing or panicking `run` is an error; a missing type or a failed
/// construction is reported through [`RunOutcome`].
pub fn run_module(
    module: &LoadedModule,
    services: &Arc<ServiceHub>,
    type_name: &str,
    collect_fields: bool,
) -> Result<RunOutcome, PluginRunError> {
    services.seal();

    let Some(ty) = module.resolve(type_name) else {
        tracing::warn!(type_name, module = %module.name(), "type not exported by module");
        return Ok(RunOutcome::TypeNotFound {
            type_name: type_name.to_owned(),
            module: module.name().to_owned(),
        });
    };

    let provider: Arc<dyn ServiceProvider> = services.clone();
    let mut instance = match instantiate(ty, &[ConstructorArg::ServiceProvider(provider)]) {
        Ok(instance) => instance,
        Err(err) => {
            tracing::warn!(type_name, error = %err, "instantiation failed");
            return Ok(RunOutcome::InstantiationFailed(err));
        }
    };

    tracing::info!(type_name, "running plugin");
    let exit_code = instance.run()?;
    tracing::info!(type_name, exit_code, "plugin finished");

    let fields = if collect_fields {
        instance.debug_fields()
    } else {
        Vec::new()
    };

    Ok(RunOutcome::Completed {
        type_name: type_name.to_owned(),
        exit_code,
        fields,
    })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::contracts::Plugin;
    use crate::declaration::PluginDeclaration;
    use crate::registry::{Constructor, ConstructorArgs, ParamKind, TypeDescriptor, TypeRegistrar};
    use crate::service_hub::{ServiceContract, ServiceError};

    trait Clock: Send + Sync {
        fn now(&self) -> i64;
    }

    impl ServiceContract for dyn Clock {
        const CONTRACT_ID: &'static str = "IClock";
    }

    struct Fixed;
    impl Clock for Fixed {
        fn now(&self) -> i64 {
            1_700_000_000
        }
    }

    struct ReadsClock {
        services: Arc<dyn ServiceProvider>,
        seen: Option<i64>,
    }

    impl Plugin for ReadsClock {
        fn run(&mut self) -> anyhow::Result<i32> {
            let clock = self.services.get::<dyn Clock>()?;
            self.seen = Some(clock.now());
            Ok(7)
        }

        fn debug_fields(&self) -> Vec<DebugField> {
            vec![DebugField::new("seen", format!("{:?}", self.seen))]
        }
    }

    fn make(args: &ConstructorArgs) -> anyhow::Result<Box<dyn Plugin>> {
        Ok(Box::new(ReadsClock {
            services: args.service_provider(0)?,
            seen: None,
        }))
    }

    fn register(reg: &mut TypeRegistrar) {
        reg.register(TypeDescriptor::concrete(
            "rt::ReadsClock",
            Constructor::new(&[ParamKind::ServiceProvider], make),
        ))
        .register(TypeDescriptor::concrete(
            "rt::NeedsText",
            Constructor::new(&[ParamKind::Text], make),
        ));
    }

    fn module() -> LoadedModule {
        let decl = PluginDeclaration::new("rt", "0.1.0", register);
        LoadedModule::from_declaration("in-process", &decl).unwrap()
    }

    #[test]
    fn completed_run_reports_exit_code_and_fields() {
        let hub = Arc::new(ServiceHub::new());
        hub.register::<dyn Clock>(Arc::new(Fixed)).unwrap();

        let outcome = run_module(&module(), &hub, "rt::ReadsClock", true).unwrap();
        assert_eq!(outcome.exit_code(), 7);

        let mut out = Vec::new();
        outcome.write_report(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Field: seen , value = Some(1700000000)\n"
        );
    }

    #[test]
    fn hub_is_sealed_before_plugin_runs() {
        let hub = Arc::new(ServiceHub::new());
        hub.register::<dyn Clock>(Arc::new(Fixed)).unwrap();
        run_module(&module(), &hub, "rt::ReadsClock", false).unwrap();

        assert!(hub.is_sealed());
        assert!(matches!(
            hub.register::<dyn Clock>(Arc::new(Fixed)),
            Err(ServiceError::Sealed { .. })
        ));
    }

    #[test]
    fn field_collection_can_be_disabled() {
        let hub = Arc::new(ServiceHub::new());
        hub.register::<dyn Clock>(Arc::new(Fixed)).unwrap();
        match run_module(&module(), &hub, "rt::ReadsClock", false).unwrap() {
            RunOutcome::Completed { fields, .. } => assert!(fields.is_empty()),
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[test]
    fn missing_type_is_handled() {
        let hub = Arc::new(ServiceHub::new());
        let outcome = run_module(&module(), &hub, "rt::Nope", true).unwrap();
        assert_eq!(outcome.exit_code(), 0);

        let mut out = Vec::new();
        outcome.write_report(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "cannot find type rt::Nope in module rt\n"
        );
    }

    #[test]
    fn signature_mismatch_is_handled() {
        let hub = Arc::new(ServiceHub::new());
        let outcome = run_module(&module(), &hub, "rt::NeedsText", true).unwrap();
        assert!(matches!(
            outcome,
            RunOutcome::InstantiationFailed(InstantiationError::SignatureMismatch { .. })
        ));
        assert_eq!(outcome.exit_code(), 0);
    }

    #[test]
    fn missing_service_fails_the_run() {
        let hub = Arc::new(ServiceHub::new());
        let err = run_module(&module(), &hub, "rt::ReadsClock", true).unwrap_err();
        match err {
            PluginRunError::Failed { type_name, message } => {
                assert_eq!(type_name, "rt::ReadsClock");
                assert_eq!(message, "service not found: contract=IClock");
            }
            other @ PluginRunError::Panicked { .. } => panic!("unexpected {other:?}"),
        }
    }
}
