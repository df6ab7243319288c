//! `uwb-range`: check, configure and range-test UWB modules.
//!
//! # Usage
//!
//! ```bash
//! # Local device details and the devices it can hear
//! uwb-range check --discover
//!
//! # Give the remote tag one anchor and switch both tags to long-range radio settings
//! uwb-range --device serial://auto setup --remote 0x7607 --anchor 0x7612 --preset long-range
//!
//! # Walk-out range test from the remote tag, stopped with Ctrl-C
//! uwb-range range --target 0x7612 --relay 0x7607 --long-range-filter --csv walk.csv
//!
//! # Same against the simulator, 200 rounds, tag walking away at 1.5 m/s
//! uwb-range -d "simulator://seed=7,walk=1.5" range --target 0x7607 --count 200
//! ```

mod cli;
mod commands;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use uwb_core::observe::init_logging;
use uwb_core::SessionConfig;

use crate::cli::{Cli, Command};

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::ExampleConfig = cli.command {
        print!("{}", SessionConfig::example_yaml());
        return Ok(());
    }

    let mut config = cli.session_config()?;
    match &cli.command {
        Command::Setup(args) => args.apply(&mut config),
        Command::Range(args) => args.apply(&mut config),
        Command::Check(_) | Command::ExampleConfig => {}
    }

    init_logging(&config.logging);
    debug!(uri = %config.device.uri, "configuration loaded");

    let mut device = commands::open_device(&config)?;
    match &cli.command {
        Command::Check(args) => commands::check(&mut *device, args.remote, args.discover),
        Command::Setup(_) => commands::setup(&mut *device, &config),
        Command::Range(_) => {
            let stop = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&stop);
            ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
                .context("installing the Ctrl-C handler")?;
            commands::range(device, &config, &stop).map(|_| ())
        }
        Command::ExampleConfig => Ok(()),
    }
}
