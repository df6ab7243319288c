//! # Driver Registry
//!
//! Creates [`UwbDevice`] backends from `driver://args` URIs.
//!
//! | URI                                   | Backend                          |
//! |---------------------------------------|----------------------------------|
//! | `simulator://`                        | demo network, entropy seed       |
//! | `simulator://seed=7,noise=20,loss=0.05,walk=1.5` | seeded, tuned demo network |
//! | `serial:///dev/ttyACM0`               | module on the given port         |
//! | `serial://auto`                       | first detected module            |

use std::time::Duration;

use tracing::{debug, info};
use uwb_core::{DeviceError, DeviceId, DeviceResult, UwbDevice};

use crate::simulator::{SimConfig, SimulatedDevice};

/// A discoverable device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Driver that can open it
    pub driver: String,
    /// Human-readable label
    pub label: String,
    /// URI to pass to [`DriverRegistry::create`]
    pub uri: String,
}

/// Link parameters handed to drivers.
#[derive(Debug, Clone, Copy)]
pub struct LinkOptions {
    pub baud_rate: u32,
    pub timeout: Duration,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            timeout: Duration::from_millis(1000),
        }
    }
}

/// Factory for one kind of backend.
pub trait DeviceDriver: Send + Sync {
    /// Scheme this driver answers to.
    fn name(&self) -> &str;

    /// Devices this driver can currently open.
    fn discover(&self) -> Vec<DeviceInfo>;

    /// Open a device from the part of the URI after `://`.
    fn create_from_string(&self, args: &str, link: &LinkOptions)
        -> DeviceResult<Box<dyn UwbDevice>>;
}

/// Registry of available drivers.
pub struct DriverRegistry {
    drivers: Vec<Box<dyn DeviceDriver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self {
            drivers: Vec::new(),
        }
    }

    pub fn register(&mut self, driver: Box<dyn DeviceDriver>) {
        self.drivers.push(driver);
    }

    pub fn get(&self, name: &str) -> Option<&dyn DeviceDriver> {
        self.drivers
            .iter()
            .find(|d| d.name() == name)
            .map(|d| d.as_ref())
    }

    pub fn list(&self) -> Vec<&str> {
        self.drivers.iter().map(|d| d.name()).collect()
    }

    pub fn discover_all(&self) -> Vec<DeviceInfo> {
        self.drivers.iter().flat_map(|d| d.discover()).collect()
    }

    /// Open a device from a `driver://args` URI.
    pub fn create(&self, uri: &str, link: &LinkOptions) -> DeviceResult<Box<dyn UwbDevice>> {
        let (driver_name, args) = uri.split_once("://").ok_or_else(|| {
            DeviceError::InvalidSetting(format!(
                "invalid device URI '{}', expected 'driver://args'",
                uri
            ))
        })?;

        let driver = self.get(driver_name).ok_or_else(|| {
            DeviceError::DeviceNotFound(format!(
                "unknown driver '{}' (available: {})",
                driver_name,
                self.list().join(", ")
            ))
        })?;

        debug!(driver = driver_name, args, "opening device");
        let device = driver.create_from_string(args, link)?;
        info!(device = device.name(), "device opened");
        Ok(device)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Split `key=value,key=value` driver arguments.
pub fn parse_args(args: &str) -> DeviceResult<Vec<(&str, &str)>> {
    args.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            pair.split_once('=').ok_or_else(|| {
                DeviceError::InvalidSetting(format!("expected key=value, got '{}'", pair))
            })
        })
        .collect()
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> DeviceResult<T> {
    value
        .parse()
        .map_err(|_| DeviceError::InvalidSetting(format!("bad value '{}' for {}", value, key)))
}

// =============================================================================
// Simulator
// =============================================================================

/// Opens the simulated demo network.
pub struct SimulatorDriver;

impl SimulatorDriver {
    /// Build the demo network from `seed`, `noise`, `loss`, `drift` and
    /// `walk` (remote tag walking away at this many m/s) arguments.
    pub fn build(args: &str) -> DeviceResult<SimulatedDevice> {
        let mut config = SimConfig::default();
        let mut walk_m_s = None;
        for (key, value) in parse_args(args)? {
            match key {
                "seed" => config.seed = Some(parse_value(key, value)?),
                "noise" => config.noise_std_mm = parse_value(key, value)?,
                "loss" => config.loss_probability = parse_value(key, value)?,
                "drift" => config.max_drift_ppm = parse_value(key, value)?,
                "walk" => walk_m_s = Some(parse_value::<f64>(key, value)?),
                other => {
                    return Err(DeviceError::InvalidSetting(format!(
                        "unknown simulator argument '{}'",
                        other
                    )))
                }
            }
        }

        let device = SimulatedDevice::demo(config)?;
        let Some(speed) = walk_m_s else {
            return Ok(device);
        };
        Self::with_walking_remote(device, speed)
    }

    fn with_walking_remote(
        mut device: SimulatedDevice,
        speed_m_s: f64,
    ) -> DeviceResult<SimulatedDevice> {
        let remote = DeviceId(0x7607);
        let peer = device
            .peer(remote)
            .cloned()
            .ok_or_else(|| DeviceError::DeviceNotFound(remote.to_string()))?;
        device.remove_peer(remote);
        device.add_peer(peer.walking([1.0, 0.0, 0.0], speed_m_s));
        Ok(device)
    }
}

impl DeviceDriver for SimulatorDriver {
    fn name(&self) -> &str {
        "simulator"
    }

    fn discover(&self) -> Vec<DeviceInfo> {
        vec![DeviceInfo {
            driver: "simulator".to_string(),
            label: "Simulated UWB network".to_string(),
            uri: "simulator://".to_string(),
        }]
    }

    fn create_from_string(
        &self,
        args: &str,
        _link: &LinkOptions,
    ) -> DeviceResult<Box<dyn UwbDevice>> {
        Ok(Box::new(Self::build(args)?))
    }
}

// =============================================================================
// Serial
// =============================================================================

/// Opens modules on serial ports.
#[cfg(feature = "serial")]
pub struct SerialDriver;

#[cfg(feature = "serial")]
impl DeviceDriver for SerialDriver {
    fn name(&self) -> &str {
        "serial"
    }

    fn discover(&self) -> Vec<DeviceInfo> {
        crate::serial::list_ports()
            .into_iter()
            .map(|port| DeviceInfo {
                driver: "serial".to_string(),
                label: format!("UWB module on {}", port),
                uri: format!("serial://{}", port),
            })
            .collect()
    }

    fn create_from_string(
        &self,
        args: &str,
        link: &LinkOptions,
    ) -> DeviceResult<Box<dyn UwbDevice>> {
        let device = match args {
            "" | "auto" => crate::serial::PortDevice::open_first(link.baud_rate, link.timeout)?,
            path => crate::serial::PortDevice::open(path, link.baud_rate, link.timeout)?,
        };
        Ok(Box::new(device))
    }
}

/// Registry with every built-in driver.
pub fn create_default_registry() -> DriverRegistry {
    let mut registry = DriverRegistry::new();
    registry.register(Box::new(SimulatorDriver));
    #[cfg(feature = "serial")]
    registry.register(Box::new(SerialDriver));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use uwb_core::RangingService;

    #[test]
    fn test_empty_registry() {
        let registry = DriverRegistry::new();
        assert!(registry.list().is_empty());
        assert!(registry.get("simulator").is_none());
    }

    #[test]
    fn test_default_registry_has_simulator() {
        let registry = create_default_registry();
        assert!(registry.list().contains(&"simulator"));
        assert!(registry
            .discover_all()
            .iter()
            .any(|d| d.uri == "simulator://"));
    }

    #[test]
    fn test_create_simulator() {
        let registry = create_default_registry();
        let mut device = registry
            .create("simulator://seed=7,noise=0", &LinkOptions::default())
            .unwrap();
        assert!(device.supports_remote());
        assert!(device.range(DeviceId(0x7612), None).is_ok());
    }

    #[test]
    fn test_bad_uris() {
        let registry = create_default_registry();
        let link = LinkOptions::default();
        assert!(matches!(
            registry.create("simulator", &link),
            Err(DeviceError::InvalidSetting(_))
        ));
        assert!(matches!(
            registry.create("carrier-pigeon://", &link),
            Err(DeviceError::DeviceNotFound(_))
        ));
        assert!(matches!(
            registry.create("simulator://seed=abc", &link),
            Err(DeviceError::InvalidSetting(_))
        ));
        assert!(matches!(
            registry.create("simulator://warp=9", &link),
            Err(DeviceError::InvalidSetting(_))
        ));
    }

    #[test]
    fn test_parse_args() {
        assert_eq!(
            parse_args("seed=7, loss=0.1").unwrap(),
            vec![("seed", "7"), ("loss", "0.1")]
        );
        assert!(parse_args("").unwrap().is_empty());
        assert!(parse_args("seed").is_err());
    }

    #[test]
    fn test_walking_remote() {
        let mut device = SimulatorDriver::build("seed=1,noise=0,drift=0,walk=2").unwrap();
        let remote = device.peer(DeviceId(0x7607)).unwrap();
        assert_eq!(remote.velocity, [2000.0, 0.0, 0.0]);
        assert!(device.range(DeviceId(0x7607), None).is_ok());
    }
}
