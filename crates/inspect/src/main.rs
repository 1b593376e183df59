use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Arg, ArgAction, ArgMatches, Command};
use pipeline_registry::{Registry, RegistryConfig, SingletonKind};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod builtins;

use builtins::ExecutionClock;

fn cli() -> Command {
    Command::new("registry-inspect")
        .about("Loads pipeline plugin modules and lists what they register")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Registry configuration (.json, .yaml or .yml)"),
        )
        .arg(
            Arg::new("plugin")
                .long("plugin")
                .value_name("MODULE")
                .action(ArgAction::Append)
                .help("Plugin module to load, in addition to the configured ones"),
        )
        .arg(
            Arg::new("create")
                .long("create")
                .value_name("NAME[:ID]")
                .action(ArgAction::Append)
                .help("Component to create and track"),
        )
        .arg(
            Arg::new("filter")
                .long("filter")
                .value_name("IDS")
                .help("Comma-separated instance ids to list; 'prefix*' matches by prefix"),
        )
        .arg(
            Arg::new("export")
                .long("export")
                .value_name("DIR")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Copy every loaded module file into DIR"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Print the listing as JSON"),
        )
}

/// Builds a registry from the command line and renders its listing.
fn run(matches: &ArgMatches) -> anyhow::Result<String> {
    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => RegistryConfig::from_path(path)
            .with_context(|| format!("failed to read config '{}'", path.display()))?,
        None => RegistryConfig::default(),
    };

    let mut registry = Registry::new(config);
    let builtins = registry.register_builtins();
    tracing::debug!("registered {} built-in components", builtins);

    let configured = registry.load_configured_plugins();
    tracing::info!("loaded {} configured plugin modules", configured);

    for plugin in matches.get_many::<String>("plugin").into_iter().flatten() {
        let registered = registry
            .load(plugin)
            .with_context(|| format!("failed to load plugin '{}'", plugin))?;
        if !registered {
            bail!("plugin '{}' failed to register its components", plugin);
        }
    }

    for name in matches.get_many::<String>("create").into_iter().flatten() {
        registry
            .create(name, None, true, None)
            .with_context(|| format!("failed to create '{}'", name))?;
    }

    if let Some(clock) = registry.singleton(SingletonKind::Clock) {
        if let Some(clock) = clock.downcast_ref::<ExecutionClock>() {
            tracing::debug!("execution clock running for {:?}", clock.elapsed());
        }
    }

    if let Some(dir) = matches.get_one::<PathBuf>("export") {
        let copied = registry
            .export_loaded_modules(dir)
            .with_context(|| format!("failed to export modules to '{}'", dir.display()))?;
        tracing::info!("exported {} modules to '{}'", copied.len(), dir.display());
    }

    let mut snapshot = registry.snapshot();
    if let Some(filter) = matches.get_one::<String>("filter") {
        let ids = registry.instance_ids(Some(filter.as_str()));
        snapshot.instances.retain(|instance| ids.contains(&instance.id));
    }

    if matches.get_flag("json") {
        Ok(serde_json::to_string_pretty(&snapshot)?)
    } else {
        Ok(snapshot.to_string())
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "registry_inspect=info,pipeline_registry=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let matches = cli().get_matches();
    let listing = run(&matches)?;
    print!("{}", listing);
    Ok(())
}
