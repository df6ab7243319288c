//! # UWB Hardware Abstraction Layer
//!
//! Backends implementing [`uwb_core::UwbDevice`]:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │            uwb_core::UwbDevice / RangingService         │
//! ├──────────────────────────┬──────────────────────────────┤
//! │     SimulatedDevice      │        SerialDevice<P>       │
//! │  seeded network model    │  ASCII register protocol     │
//! │  DS-TWR + noise + reach  │  over any Read + Write       │
//! ├──────────────────────────┴──────────────────────────────┤
//! │        DriverRegistry  (simulator://, serial://)        │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use uwb_hal::{create_default_registry, LinkOptions};
//!
//! let registry = create_default_registry();
//! let mut device = registry.create("serial://auto", &LinkOptions::default())?;
//! println!("{}", device.details(None)?);
//! ```

pub mod protocol;
pub mod registers;
pub mod registry;
pub mod serial;
pub mod simulator;

pub use registry::{
    create_default_registry, DeviceDriver, DeviceInfo, DriverRegistry, LinkOptions,
    SimulatorDriver,
};
pub use serial::{SerialDevice, SerialOptions};
pub use simulator::{SimConfig, SimPeer, SimulatedDevice};

#[cfg(feature = "serial")]
pub use registry::SerialDriver;
#[cfg(feature = "serial")]
pub use serial::{find_port, PortDevice};
