use std::path::PathBuf;

use clap::{Parser, Subcommand};
use effectconfig::{parse_antialias, AntialiasSetting, Rgb};

#[derive(Parser, Debug)]
#[command(
    name = "neonx",
    author,
    version,
    about = "Preview the NeonX animated hero backdrop"
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Configuration file; defaults to `neonx.toml` in the config directory.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT")]
    pub size: Option<String>,

    /// Particle density between 0 and 1.
    #[arg(long, value_name = "D")]
    pub density: Option<f64>,

    /// Seed for the particle layout, for reproducible scenes.
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,

    /// Laser colour as `#RRGGBB`.
    #[arg(long, value_name = "HEX", value_parser = parse_color)]
    pub laser_color: Option<Rgb>,

    /// Do not mount the laser flow panel.
    #[arg(long)]
    pub no_laser: bool,

    /// Do not mount the particle field.
    #[arg(long)]
    pub no_particles: bool,

    /// Anti-aliasing policy: `auto`, `off`, or an explicit MSAA sample count (e.g. `4`).
    #[arg(long, value_name = "MODE", value_parser = parse_antialias)]
    pub antialias: Option<AntialiasSetting>,

    /// Device pixel ratio cap applied to both effects.
    #[arg(long, value_name = "F")]
    pub dpr_cap: Option<f64>,

    /// Freeze every effect clock at this many seconds.
    #[arg(long, value_name = "SECONDS")]
    pub freeze_at: Option<f32>,

    /// Reload the configuration file when it changes.
    #[arg(long)]
    pub watch: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect and validate configuration files.
    Config(ConfigCommand),
}

#[derive(Parser, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the default configuration as TOML.
    PrintDefaults,
    /// Parse and validate a configuration file.
    Check {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    /// Print where the default configuration file is looked up.
    Path,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_color(value: &str) -> Result<Rgb, String> {
    value.parse::<Rgb>().map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_overrides() {
        let cli = Cli::try_parse_from([
            "neonx",
            "--size",
            "800x600",
            "--density",
            "0.25",
            "--laser-color",
            "#00ff88",
            "--antialias",
            "off",
            "--no-particles",
            "--watch",
        ])
        .unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.run.size.as_deref(), Some("800x600"));
        assert_eq!(cli.run.density, Some(0.25));
        assert_eq!(cli.run.laser_color, Some(Rgb::from_hex(0x00ff88)));
        assert_eq!(cli.run.antialias, Some(AntialiasSetting::Off));
        assert!(cli.run.no_particles);
        assert!(!cli.run.no_laser);
        assert!(cli.run.watch);
    }

    #[test]
    fn rejects_bad_colour() {
        assert!(Cli::try_parse_from(["neonx", "--laser-color", "green"]).is_err());
    }

    #[test]
    fn parses_config_subcommand() {
        let cli = Cli::try_parse_from(["neonx", "config", "check", "hero.toml"]).unwrap();
        match cli.command {
            Some(Command::Config(ConfigCommand {
                action: ConfigAction::Check { path },
            })) => assert_eq!(path, PathBuf::from("hero.toml")),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
