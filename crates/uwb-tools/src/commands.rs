//! Subcommand implementations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use colored::Colorize;
use tracing::{info, warn};
use uwb_core::{
    CsvPlotSink, DeviceCoordinates, DeviceId, SamplingLoop, SessionConfig, Summary, TerminalPlot,
    UwbDevice,
};
use uwb_hal::{create_default_registry, LinkOptions};

/// Open the configured device through the driver registry.
pub fn open_device(config: &SessionConfig) -> Result<Box<dyn UwbDevice>> {
    let link = LinkOptions {
        baud_rate: config.device.baud_rate,
        timeout: Duration::from_millis(config.device.timeout_ms),
    };
    create_default_registry()
        .create(&config.device.uri, &link)
        .with_context(|| format!("opening device {}", config.device.uri))
}

fn require_remote(device: &dyn UwbDevice, remote: Option<DeviceId>) -> Result<()> {
    if let Some(remote) = remote {
        if !device.supports_remote() {
            bail!(
                "{} cannot reach remote device {}; connect to it directly instead",
                device.name(),
                remote
            );
        }
    }
    Ok(())
}

// =============================================================================
// check
// =============================================================================

/// Print identity and status registers, then optionally run a discovery.
pub fn check(device: &mut dyn UwbDevice, remote: Option<DeviceId>, discover: bool) -> Result<()> {
    require_remote(device, remote)?;

    let details = device
        .details(remote)
        .context("reading device details")?;
    match remote {
        None => println!("Local {}", details),
        Some(_) => println!("{}", capitalize(&details.to_string())),
    }

    if !discover {
        return Ok(());
    }

    device
        .clear_devices(remote)
        .context("clearing the device list before discovery")?;
    let found = device.discover(remote).context("running discovery")?;
    if found.is_empty() {
        println!("{}", "No devices found".yellow());
    } else {
        println!("Found devices:");
        for id in found {
            println!("\t{}", id);
        }
    }
    Ok(())
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// =============================================================================
// setup
// =============================================================================

/// Rebuild device lists, apply radio settings and print the result.
pub fn setup(device: &mut dyn UwbDevice, config: &SessionConfig) -> Result<()> {
    let remote = config.network.remote;
    require_remote(device, remote)?;

    prepare_network(device, config)?;
    apply_radio(device, config, remote)?;

    print_settings(device, remote)?;
    print_device_ids(device, None, "Local")?;
    if let Some(remote) = remote {
        print_device_ids(device, Some(remote), "Remote")?;
    }
    Ok(())
}

/// Clear and refill the device lists.
///
/// The remote gets the anchors; the local device gets the remote as a tag
/// followed by the anchors.
fn prepare_network(device: &mut dyn UwbDevice, config: &SessionConfig) -> Result<()> {
    let network = &config.network;

    if let Some(remote) = network.remote {
        device
            .clear_devices(Some(remote))
            .with_context(|| format!("clearing the device list of {}", remote))?;
        for anchor in &network.anchors {
            device
                .add_device(anchor, Some(remote))
                .with_context(|| format!("adding {} to {}", anchor.id, remote))?;
        }
    }

    device
        .clear_devices(None)
        .context("clearing the local device list")?;
    let local_entries = network
        .remote
        .map(|remote| DeviceCoordinates::tag(remote, Default::default()))
        .into_iter()
        .chain(network.anchors.iter().copied());
    for entry in local_entries {
        device
            .add_device(&entry, None)
            .with_context(|| format!("adding {} to the local device", entry.id))?;
    }

    if config.radio.save_to_flash {
        if let Some(remote) = network.remote {
            device
                .save_network(Some(remote))
                .with_context(|| format!("saving the device list of {}", remote))?;
        }
        device
            .save_network(None)
            .context("saving the local device list")?;
    }

    info!(
        remote = ?network.remote,
        anchors = network.anchors.len(),
        "device lists rebuilt"
    );
    Ok(())
}

/// Apply the configured radio settings: remote first, then local, then save.
fn apply_radio(
    device: &mut dyn UwbDevice,
    config: &SessionConfig,
    remote: Option<DeviceId>,
) -> Result<()> {
    let Some(settings) = config.radio.resolve()? else {
        return Ok(());
    };
    let remote = remote.filter(|_| config.radio.apply_to_remote);

    if let Some(remote) = remote {
        device
            .set_uwb_settings(&settings, Some(remote))
            .with_context(|| format!("applying radio settings to {}", remote))?;
    }
    device
        .set_uwb_settings(&settings, None)
        .context("applying radio settings to the local device")?;

    if config.radio.save_to_flash {
        if let Some(remote) = remote {
            device
                .save_uwb_settings(Some(remote))
                .with_context(|| format!("saving radio settings of {}", remote))?;
        }
        device
            .save_uwb_settings(None)
            .context("saving local radio settings")?;
    }

    info!(%settings, remote = ?remote, "radio settings applied");
    Ok(())
}

fn print_settings(device: &mut dyn UwbDevice, remote: Option<DeviceId>) -> Result<()> {
    let local = device
        .uwb_settings(None)
        .context("reading local radio settings")?;
    println!("{} {}", "Local UWB Settings =>".bold(), local);

    if let Some(remote) = remote {
        let settings = device
            .uwb_settings(Some(remote))
            .with_context(|| format!("reading radio settings of {}", remote))?;
        println!("{} {}", "Remote UWB Settings =>".bold(), settings);
        if settings != local {
            println!(
                "{}",
                "warning: local and remote radio settings differ, they cannot range".yellow()
            );
        }
    }
    Ok(())
}

fn print_device_ids(
    device: &mut dyn UwbDevice,
    remote: Option<DeviceId>,
    label: &str,
) -> Result<()> {
    let ids = device
        .device_ids(remote)
        .with_context(|| format!("reading the {} device list", label.to_lowercase()))?;
    println!("{} Device IDs:", label);
    for id in ids {
        println!("\tDecimal: {} Hexadecimal: {}", id.0, id);
    }
    Ok(())
}

// =============================================================================
// range
// =============================================================================

/// Run the sampling loop until `stop` is set or a configured limit is hit,
/// then print and export the summary.
pub fn range(
    mut device: Box<dyn UwbDevice>,
    config: &SessionConfig,
    stop: &AtomicBool,
) -> Result<Summary> {
    config.validate().context("invalid ranging configuration")?;
    let loop_config = config.sampling.loop_config();
    let relay = loop_config.relay;
    require_remote(&*device, relay)?;
    require_remote(&*device, config.network.remote)?;

    if !config.network.anchors.is_empty() {
        prepare_network(&mut *device, config)?;
    }
    apply_radio(&mut *device, config, relay.or(config.network.remote))?;

    println!(
        "{} ({}), press Ctrl-C to stop",
        loop_config.title().bold(),
        device.name()
    );

    let mut sampler = SamplingLoop::new(device, loop_config);
    let started = Instant::now();
    while !stop.load(Ordering::SeqCst) {
        if let Some(max) = config.sampling.max_samples {
            if sampler.attempts() >= max {
                break;
            }
        }
        if let Some(max) = config.sampling.max_duration_s {
            if started.elapsed().as_secs_f64() >= max {
                break;
            }
        }
        sampler.sample();
    }
    info!(
        rounds = sampler.attempts(),
        elapsed_s = started.elapsed().as_secs_f64(),
        "sampling stopped"
    );

    let summary = sampler.summarize();
    println!("{}", summary);

    if summary.has_data() {
        let mut terminal = TerminalPlot::new(config.output.plot_width, config.output.plot_height);
        sampler
            .render(&mut terminal)
            .context("drawing the terminal plot")?;
    }
    if let Some(path) = &config.output.csv {
        sampler
            .render(&mut CsvPlotSink::new(path))
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Series written to {}", path.display());
    }
    if let Some(path) = &config.output.json {
        summary
            .write_json(path)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Summary written to {}", path.display());
    }

    // the run already succeeded, a settings read failure is not fatal
    if let Err(e) = print_settings(&mut **sampler.service_mut(), relay) {
        warn!(error = %e, "could not read radio settings after the run");
    }
    Ok(summary)
}
