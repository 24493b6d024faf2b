mod registered_services;

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use plugkit::config::CliOverrides;
use plugkit::{HostConfig, ModuleLoader, ServiceHub, run_module, telemetry};

/// Plugin host - loads a plugin module and runs one of its exported types
#[derive(Parser)]
#[command(name = "plugin-host")]
#[command(about = "Plugin host - loads a plugin module and runs one of its exported types")]
#[command(version)]
struct Cli {
    /// Path to the plugin module (shared library)
    #[arg(required_unless_present = "print_config")]
    module_path: Option<PathBuf>,

    /// Fully-qualified name of the type to run, e.g. `demo_plugin::MyPlugin`
    #[arg(required_unless_present_any = ["print_config", "list_types"])]
    type_name: Option<String>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// List the types exported by the module and exit
    #[arg(long)]
    list_types: bool,

    /// Do not print the plugin's debug fields after it runs
    #[arg(long)]
    no_dump: bool,

    /// Print effective configuration (JSON) and exit
    #[arg(long)]
    print_config: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Layered config:
    // 1) defaults -> 2) YAML (if provided) -> 3) env (PLUGIN_HOST__*) -> 4) CLI overrides
    let mut config = HostConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&CliOverrides {
        verbose: cli.verbose,
        no_dump: cli.no_dump,
    });

    if cli.print_config {
        println!("{}", config.to_pretty_json()?);
        return Ok(ExitCode::SUCCESS);
    }

    telemetry::init_logging(&config.logging, cli.verbose)?;

    let services = Arc::new(ServiceHub::from_registrations()?);
    tracing::debug!(services = services.len(), "service hub ready");

    let module_path = cli.module_path.context("module path is required")?;
    let module = ModuleLoader::from_config(&config.plugins)
        .load(&module_path)
        .with_context(|| format!("loading module {}", module_path.display()))?
        .into_resident();

    if cli.list_types {
        let mut stdout = std::io::stdout().lock();
        for name in module.exported_types() {
            writeln!(stdout, "{name}")?;
        }
        stdout.flush()?;
        return Ok(ExitCode::SUCCESS);
    }

    let type_name = cli.type_name.context("type name is required")?;
    let outcome = run_module(
        module,
        &services,
        &type_name,
        config.diagnostics.dump_fields,
    )?;

    let mut stdout = std::io::stdout().lock();
    outcome.write_report(&mut stdout)?;
    stdout.flush()?;

    let code = outcome.exit_code();
    Ok(u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from))
}
