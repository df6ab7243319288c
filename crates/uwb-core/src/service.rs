//! Device service traits
//!
//! [`RangingService`] is the only thing the sampling loop needs from a device.
//! [`UwbDevice`] adds the identity, radio and network-list operations used by
//! the setup and troubleshooting tools.
//!
//! Every method takes an optional `remote` id. `None` addresses the locally
//! connected device; `Some(id)` routes the operation through it to `id`.

use crate::error::{DeviceResult, RangingFailure};
use crate::types::{DeviceCoordinates, DeviceDetails, DeviceId, ErrorCode, Measurement, UwbSettings};

/// One blocking ranging exchange at a time.
pub trait RangingService {
    /// Range between `relay` (or the local device) and `target`.
    fn range(
        &mut self,
        target: DeviceId,
        relay: Option<DeviceId>,
    ) -> Result<Measurement, RangingFailure>;

    /// Read the local error code register.
    fn last_local_error(&mut self) -> DeviceResult<ErrorCode>;
}

impl<T: RangingService + ?Sized> RangingService for &mut T {
    fn range(
        &mut self,
        target: DeviceId,
        relay: Option<DeviceId>,
    ) -> Result<Measurement, RangingFailure> {
        (**self).range(target, relay)
    }

    fn last_local_error(&mut self) -> DeviceResult<ErrorCode> {
        (**self).last_local_error()
    }
}

impl<T: RangingService + ?Sized> RangingService for Box<T> {
    fn range(
        &mut self,
        target: DeviceId,
        relay: Option<DeviceId>,
    ) -> Result<Measurement, RangingFailure> {
        (**self).range(target, relay)
    }

    fn last_local_error(&mut self) -> DeviceResult<ErrorCode> {
        (**self).last_local_error()
    }
}

/// Full control interface of a UWB module.
pub trait UwbDevice: RangingService + Send {
    /// Get device name/description
    fn name(&self) -> &str;

    /// Whether operations can be routed to a remote device
    fn supports_remote(&self) -> bool;

    /// Identity and status registers
    fn details(&mut self, remote: Option<DeviceId>) -> DeviceResult<DeviceDetails>;

    /// Current radio settings
    fn uwb_settings(&mut self, remote: Option<DeviceId>) -> DeviceResult<UwbSettings>;

    /// Apply radio settings.
    ///
    /// When changing a remote device, change the local device afterwards or
    /// the two can no longer talk to each other.
    fn set_uwb_settings(
        &mut self,
        settings: &UwbSettings,
        remote: Option<DeviceId>,
    ) -> DeviceResult<()>;

    /// Persist the radio settings to flash
    fn save_uwb_settings(&mut self, remote: Option<DeviceId>) -> DeviceResult<()>;

    /// Empty the device list
    fn clear_devices(&mut self, remote: Option<DeviceId>) -> DeviceResult<()>;

    /// Add an entry to the device list
    fn add_device(
        &mut self,
        device: &DeviceCoordinates,
        remote: Option<DeviceId>,
    ) -> DeviceResult<()>;

    /// Ids currently in the device list
    fn device_ids(&mut self, remote: Option<DeviceId>) -> DeviceResult<Vec<DeviceId>>;

    /// Persist the device list to flash
    fn save_network(&mut self, remote: Option<DeviceId>) -> DeviceResult<()>;

    /// Discover devices in radio range and return their ids
    fn discover(&mut self, remote: Option<DeviceId>) -> DeviceResult<Vec<DeviceId>>;
}
