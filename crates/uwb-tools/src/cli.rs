//! Command-line arguments and how they override the session configuration.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use uwb_core::observe::{LogFormat, LogLevel};
use uwb_core::{AcceptanceFilter, Coordinates, DeviceCoordinates, DeviceId, SessionConfig, UwbSettings};

/// UWB module check, setup and range-test tool
#[derive(Parser, Debug)]
#[command(name = "uwb-range")]
#[command(about = "Check, configure and range-test UWB modules")]
#[command(version)]
pub struct Cli {
    /// Device URI: simulator://[seed=N,noise=MM,loss=P,drift=PPM,walk=M/S],
    /// serial://auto or serial:///dev/ttyACM0
    #[arg(short, long, global = true)]
    pub device: Option<String>,

    /// Configuration file (default: search UWB_RANGE_CONFIG, ./uwb-range.yaml, ...)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, global = true)]
    pub log_level: Option<LogLevel>,

    /// Log format: pretty, compact, json
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print device details and optionally discover devices in range
    Check(CheckArgs),
    /// Rebuild device lists and apply radio settings locally and on a remote
    Setup(SetupArgs),
    /// Range against one or more targets until interrupted, then summarize
    Range(RangeArgs),
    /// Print an example configuration file
    ExampleConfig,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Check this remote device instead of the local one
    #[arg(long)]
    pub remote: Option<DeviceId>,

    /// Also run a discovery and list the devices found
    #[arg(long)]
    pub discover: bool,
}

#[derive(Args, Debug)]
pub struct SetupArgs {
    /// Remote device reached through the local one
    #[arg(long)]
    pub remote: Option<DeviceId>,

    /// Anchor to add, as ID or ID@x,y,z (mm); repeatable
    #[arg(long = "anchor", value_parser = parse_anchor)]
    pub anchors: Vec<DeviceCoordinates>,

    #[command(flatten)]
    pub radio: RadioArgs,

    /// Persist settings and device lists to flash
    #[arg(long)]
    pub save: bool,
}

#[derive(Args, Debug)]
pub struct RangeArgs {
    /// Device to range against; repeatable
    #[arg(long = "target")]
    pub targets: Vec<DeviceId>,

    /// Range from this remote device instead of the local one
    #[arg(long)]
    pub relay: Option<DeviceId>,

    /// Accept only distances under 200 m with positive elapsed time
    #[arg(long, conflicts_with_all = ["max_distance_m", "require_positive_elapsed"])]
    pub long_range_filter: bool,

    /// Reject distances at or above this many meters
    #[arg(long)]
    pub max_distance_m: Option<f64>,

    /// Reject samples at or before the origin timestamp
    #[arg(long)]
    pub require_positive_elapsed: bool,

    /// Stop after this many rounds
    #[arg(long)]
    pub count: Option<u64>,

    /// Stop after this many seconds
    #[arg(long)]
    pub duration: Option<f64>,

    /// Write the series as CSV
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Write the summary as JSON
    #[arg(long)]
    pub json: Option<PathBuf>,

    #[command(flatten)]
    pub radio: RadioArgs,
}

/// Radio selection: a named preset or explicit register values.
#[derive(Args, Debug, Default)]
pub struct RadioArgs {
    /// Radio preset: working, long-range, max-range, max-rate
    #[arg(long, conflicts_with = "channel")]
    pub preset: Option<String>,

    /// UWB channel (1-5, 7)
    #[arg(long)]
    pub channel: Option<u8>,

    /// Bitrate index (0: 110 kbit/s, 1: 850 kbit/s, 2: 6.81 Mbit/s)
    #[arg(long, requires = "channel")]
    pub bitrate: Option<u8>,

    /// PRF index (1: 16 MHz, 2: 64 MHz)
    #[arg(long, requires = "channel")]
    pub prf: Option<u8>,

    /// Preamble length register value, e.g. 0x08
    #[arg(long, requires = "channel", value_parser = parse_u8)]
    pub plen: Option<u8>,

    /// Transmit gain in dB
    #[arg(long, requires = "channel")]
    pub gain_db: Option<f32>,
}

impl RadioArgs {
    /// Explicit settings, filling unspecified fields from the working preset.
    fn explicit(&self) -> Option<UwbSettings> {
        let channel = self.channel?;
        let base = UwbSettings::working();
        Some(UwbSettings {
            channel,
            bitrate: self.bitrate.unwrap_or(base.bitrate),
            prf: self.prf.unwrap_or(base.prf),
            plen: self.plen.unwrap_or(base.plen),
            gain_db: self.gain_db.unwrap_or(base.gain_db),
        })
    }

    /// Returns true when the command line picked radio settings.
    fn apply(&self, config: &mut SessionConfig) -> bool {
        if let Some(preset) = &self.preset {
            config.radio.preset = Some(preset.clone());
            config.radio.settings = None;
        } else if let Some(settings) = self.explicit() {
            config.radio.preset = None;
            config.radio.settings = Some(settings);
        } else {
            return false;
        }
        true
    }
}

impl Cli {
    /// Load the configuration file and apply the global overrides.
    pub fn session_config(&self) -> Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::load_from(path)
                .with_context(|| format!("loading configuration {}", path.display()))?,
            None => SessionConfig::load().context("loading configuration")?,
        };

        if let Some(uri) = &self.device {
            config.device.uri = uri.clone();
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
            config.logging.filter = None;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
        Ok(config)
    }
}

impl SetupArgs {
    pub fn apply(&self, config: &mut SessionConfig) {
        if self.remote.is_some() {
            config.network.remote = self.remote;
        }
        if !self.anchors.is_empty() {
            config.network.anchors = self.anchors.clone();
        }
        self.radio.apply(config);
        if self.save {
            config.radio.save_to_flash = true;
        }
        if config.network.remote.is_some() {
            config.radio.apply_to_remote = true;
        }
    }
}

impl RangeArgs {
    pub fn apply(&self, config: &mut SessionConfig) {
        let sampling = &mut config.sampling;
        if !self.targets.is_empty() {
            sampling.targets = self.targets.clone();
        }
        if self.relay.is_some() {
            sampling.relay = self.relay;
        }

        if self.long_range_filter {
            sampling.filter = AcceptanceFilter::long_range();
        } else if self.max_distance_m.is_some() || self.require_positive_elapsed {
            sampling.filter = AcceptanceFilter {
                max_accepted_distance_m: self.max_distance_m,
                require_positive_elapsed: self.require_positive_elapsed,
            };
        }

        if self.count.is_some() {
            sampling.max_samples = self.count;
        }
        if self.duration.is_some() {
            sampling.max_duration_s = self.duration;
        }
        if self.csv.is_some() {
            config.output.csv = self.csv.clone();
        }
        if self.json.is_some() {
            config.output.json = self.json.clone();
        }

        // Every hop must share one setting, so the relay is retuned too.
        let remote = config.sampling.relay.or(config.network.remote);
        if self.radio.apply(config) && remote.is_some() {
            config.radio.apply_to_remote = true;
        }
    }
}

/// Parse `0x7612` or `0x7612@1000,0,1500`.
fn parse_anchor(s: &str) -> Result<DeviceCoordinates, String> {
    let (id, position) = match s.split_once('@') {
        Some((id, position)) => (id, position.parse::<Coordinates>()?),
        None => (s, Coordinates::default()),
    };
    Ok(DeviceCoordinates::anchor(id.parse()?, position))
}

fn parse_u8(s: &str) -> Result<u8, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid value '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("uwb-range").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_range_arguments() {
        let cli = parse(&[
            "range",
            "--target",
            "0x7612",
            "--target",
            "0x7653",
            "--relay",
            "0x7607",
            "--long-range-filter",
            "--count",
            "50",
            "--device",
            "simulator://seed=1",
        ]);
        assert_eq!(cli.device.as_deref(), Some("simulator://seed=1"));

        let Command::Range(args) = cli.command else {
            panic!("expected range");
        };
        let mut config = SessionConfig::default();
        args.apply(&mut config);

        assert_eq!(config.sampling.targets, vec![DeviceId(0x7612), DeviceId(0x7653)]);
        assert_eq!(config.sampling.relay, Some(DeviceId(0x7607)));
        assert_eq!(config.sampling.filter, AcceptanceFilter::long_range());
        assert_eq!(config.sampling.max_samples, Some(50));
        assert!(config.validate().is_ok());
        assert!(!config.radio.apply_to_remote);
    }

    #[test]
    fn test_relay_with_preset_retunes_remote() {
        let Command::Range(args) = parse(&[
            "range", "--target", "0x7612", "--relay", "0x7607", "--preset", "long-range",
        ])
        .command
        else {
            panic!("expected range");
        };
        let mut config = SessionConfig::default();
        args.apply(&mut config);
        assert_eq!(config.radio.preset.as_deref(), Some("long-range"));
        assert!(config.radio.apply_to_remote);

        let Command::Range(args) = parse(&["range", "--target", "0x7612", "--channel", "2"]).command
        else {
            panic!("expected range");
        };
        let mut config = SessionConfig::default();
        args.apply(&mut config);
        assert!(!config.radio.apply_to_remote);
    }

    #[test]
    fn test_custom_filter() {
        let cli = parse(&["range", "--target", "30226", "--max-distance-m", "50"]);
        let Command::Range(args) = cli.command else {
            panic!("expected range");
        };
        let mut config = SessionConfig::default();
        args.apply(&mut config);

        assert_eq!(config.sampling.targets, vec![DeviceId(30226)]);
        assert_eq!(config.sampling.filter.max_accepted_distance_m, Some(50.0));
        assert!(!config.sampling.filter.require_positive_elapsed);
    }

    #[test]
    fn test_filter_flags_conflict() {
        let result = Cli::try_parse_from([
            "uwb-range",
            "range",
            "--target",
            "0x7612",
            "--long-range-filter",
            "--max-distance-m",
            "10",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_setup_arguments() {
        let cli = parse(&[
            "setup",
            "--remote",
            "0x7607",
            "--anchor",
            "0x7612@3000,0,1500",
            "--anchor",
            "0x7653",
            "--preset",
            "long-range",
            "--save",
        ]);
        let Command::Setup(args) = cli.command else {
            panic!("expected setup");
        };
        let mut config = SessionConfig::default();
        args.apply(&mut config);

        assert_eq!(config.network.remote, Some(DeviceId(0x7607)));
        assert_eq!(
            config.network.anchors,
            vec![
                DeviceCoordinates::anchor(DeviceId(0x7612), Coordinates::new(3000, 0, 1500)),
                DeviceCoordinates::anchor(DeviceId(0x7653), Coordinates::default()),
            ]
        );
        assert!(config.radio.apply_to_remote);
        assert!(config.radio.save_to_flash);
        assert_eq!(config.radio.resolve().unwrap(), Some(UwbSettings::long_range()));
    }

    #[test]
    fn test_explicit_radio_settings() {
        let cli = parse(&["setup", "--channel", "2", "--plen", "0x0c", "--gain-db", "15.5"]);
        let Command::Setup(args) = cli.command else {
            panic!("expected setup");
        };
        let mut config = SessionConfig::default();
        args.apply(&mut config);

        assert_eq!(config.radio.resolve().unwrap(), Some(UwbSettings::long_range()));
        assert!(!config.radio.apply_to_remote);
    }

    #[test]
    fn test_preset_conflicts_with_explicit() {
        let result =
            Cli::try_parse_from(["uwb-range", "setup", "--preset", "working", "--channel", "5"]);
        assert!(result.is_err());

        let result = Cli::try_parse_from(["uwb-range", "setup", "--bitrate", "1"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_bad_values_rejected() {
        assert!(Cli::try_parse_from(["uwb-range", "check", "--remote", "0xZZ"]).is_err());
        assert!(Cli::try_parse_from(["uwb-range", "setup", "--anchor", "0x7612@1,2"]).is_err());
        assert!(Cli::try_parse_from(["uwb-range", "--log-level", "loud", "check"]).is_err());
    }

    #[test]
    fn test_global_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.yaml");
        std::fs::write(&path, "device:\n  uri: \"serial://auto\"\nlogging:\n  filter: \"uwb_hal=trace\"\n")
            .unwrap();

        let path_arg = path.to_str().unwrap();
        let cli = parse(&["--config", path_arg, "--log-level", "debug", "check"]);
        let config = cli.session_config().unwrap();
        assert_eq!(config.device.uri, "serial://auto");
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert!(config.logging.filter.is_none());

        let cli = parse(&["--config", path_arg, "--device", "simulator://", "check"]);
        assert_eq!(cli.session_config().unwrap().device.uri, "simulator://");
    }

    #[test]
    fn test_missing_config_file() {
        let cli = parse(&["--config", "/nonexistent/uwb-range.yaml", "check"]);
        assert!(cli.session_config().is_err());
    }
}
