use std::io::{self, Write};

use anyhow::{Context, Result};
use backdrop::{PreviewOptions, WindowRuntime};
use effectconfig::BackdropConfig;
use tracing_subscriber::EnvFilter;

use crate::bootstrap::{apply_overrides, host_options, load_config};
use crate::cli::{Cli, Command, ConfigAction, RunArgs};
use crate::paths::AppPaths;
use crate::watch::{watch_until_closed, ConfigWatcher};

pub fn run(cli: Cli) -> Result<()> {
    initialise_tracing();

    match cli.command {
        Some(Command::Config(command)) => run_config_command(command.action),
        None => run_preview(cli.run),
    }
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run_config_command(action: ConfigAction) -> Result<()> {
    let mut stdout = io::stdout().lock();
    match action {
        ConfigAction::PrintDefaults => {
            let rendered = BackdropConfig::default()
                .to_toml_string()
                .context("failed to render default configuration")?;
            write!(stdout, "{rendered}")?;
        }
        ConfigAction::Check { path } => {
            let config = BackdropConfig::from_path(&path)
                .with_context(|| format!("{} is not a valid configuration", path.display()))?;
            let layers: Vec<String> = config
                .active_layers()
                .map(|kind| kind.to_string())
                .collect();
            writeln!(
                stdout,
                "{}: ok (layers: {})",
                path.display(),
                if layers.is_empty() {
                    "none".to_string()
                } else {
                    layers.join(", ")
                }
            )?;
        }
        ConfigAction::Path => {
            let paths = AppPaths::discover()?;
            writeln!(stdout, "{}", paths.config_file().display())?;
        }
    }
    Ok(())
}

fn run_preview(args: RunArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    tracing::debug!(config = %paths.config_dir().display(), "resolved neonx paths");

    let loaded = load_config(args.config.as_deref(), &paths)?;
    let mut config = loaded.config;
    apply_overrides(&mut config, &args)?;
    let host = host_options(&args)?;

    tracing::info!(
        layers = ?config.active_layers().collect::<Vec<_>>(),
        width = config.window.width,
        height = config.window.height,
        "starting backdrop preview"
    );
    let runtime = WindowRuntime::spawn(PreviewOptions { config, host })?;

    match (args.watch, loaded.path) {
        (true, Some(path)) => match ConfigWatcher::new(path) {
            Ok(watcher) => watch_until_closed(&runtime, watcher, |path| {
                let mut config = BackdropConfig::from_path(path)?;
                apply_overrides(&mut config, &args)?;
                Ok(config)
            })?,
            Err(err) => tracing::warn!("not watching configuration: {err:#}"),
        },
        (true, None) => {
            tracing::warn!("--watch needs a configuration file; nothing to watch");
        }
        (false, _) => {}
    }

    runtime.wait()
}
