//! Device model types
//!
//! Network identifiers, ranging measurements, error codes, radio settings and
//! the identity/status block reported by a UWB module.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DeviceError;

// =============================================================================
// Identifiers
// =============================================================================

/// 16-bit UWB network identifier of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "IdRepr", into = "String")]
pub struct DeviceId(pub u16);

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Number(u16),
    Text(String),
}

impl TryFrom<IdRepr> for DeviceId {
    type Error = String;

    fn try_from(repr: IdRepr) -> Result<Self, Self::Error> {
        match repr {
            IdRepr::Number(id) => Ok(DeviceId(id)),
            IdRepr::Text(text) => text.parse(),
        }
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.to_string()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

impl FromStr for DeviceId {
    type Err = String;

    /// Parse `0x7607`, `7607h` style hex or plain decimal.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            u16::from_str_radix(hex, 16)
        } else if let Some(hex) = s.strip_suffix('h') {
            u16::from_str_radix(hex, 16)
        } else {
            s.parse::<u16>()
        };
        parsed
            .map(DeviceId)
            .map_err(|e| format!("invalid device id '{}': {}", s, e))
    }
}

impl DeviceId {
    /// Little-endian wire representation.
    pub fn to_le_bytes(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }
}

// =============================================================================
// Measurement
// =============================================================================

/// One successful ranging exchange as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    /// Device clock at the moment of measurement (ms)
    pub timestamp_ms: u32,
    /// Distance to the target (mm)
    pub distance_mm: u32,
    /// Received signal strength (dBm)
    pub rss_dbm: i16,
}

impl Measurement {
    pub fn new(timestamp_ms: u32, distance_mm: u32) -> Self {
        Self {
            timestamp_ms,
            distance_mm,
            rss_dbm: 0,
        }
    }

    /// Distance in meters.
    #[inline]
    pub fn distance_m(&self) -> f64 {
        self.distance_mm as f64 / 1000.0
    }
}

// =============================================================================
// Error codes
// =============================================================================

/// Error code register value of a UWB module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u8);

impl ErrorCode {
    pub const NONE: ErrorCode = ErrorCode(0x00);
    pub const I2C_WRITE: ErrorCode = ErrorCode(0x01);
    pub const I2C_CMDFULL: ErrorCode = ErrorCode(0x02);
    pub const ANCHOR_ADD: ErrorCode = ErrorCode(0x03);
    pub const COMM_QUEUE_FULL: ErrorCode = ErrorCode(0x04);
    pub const I2C_READ: ErrorCode = ErrorCode(0x05);
    pub const UWB_CONFIG: ErrorCode = ErrorCode(0x06);
    pub const OPERATION_QUEUE_FULL: ErrorCode = ErrorCode(0x07);
    pub const STARTUP_BUSFAULT: ErrorCode = ErrorCode(0x08);
    pub const FLASH_INVALID: ErrorCode = ErrorCode(0x09);
    pub const NOT_ENOUGH_ANCHORS: ErrorCode = ErrorCode(0x0A);
    pub const DISCOVERY: ErrorCode = ErrorCode(0x0B);
    pub const CALIBRATION: ErrorCode = ErrorCode(0x0C);
    pub const FUNC_PARAM: ErrorCode = ErrorCode(0x0D);
    pub const ANCHOR_NOT_FOUND: ErrorCode = ErrorCode(0x0E);
    pub const FLASH: ErrorCode = ErrorCode(0x0F);
    pub const MEMORY: ErrorCode = ErrorCode(0x10);
    pub const RANGING: ErrorCode = ErrorCode(0x11);
    pub const RTIMEOUT1: ErrorCode = ErrorCode(0x12);
    pub const RTIMEOUT2: ErrorCode = ErrorCode(0x13);
    pub const TXLATE: ErrorCode = ErrorCode(0x14);
    pub const UWB_BUSY: ErrorCode = ErrorCode(0x15);
    pub const POSALG: ErrorCode = ErrorCode(0x16);
    pub const NOACK: ErrorCode = ErrorCode(0x17);
    pub const TDMA: ErrorCode = ErrorCode(0xA0);
    pub const SNIFF_OVERFLOW: ErrorCode = ErrorCode(0xE0);
    pub const NO_PPS: ErrorCode = ErrorCode(0xF0);
    pub const NEW_TASK: ErrorCode = ErrorCode(0xF1);
    pub const UNRECOGNIZED_DEVICE: ErrorCode = ErrorCode(0xFE);
    pub const GENERAL: ErrorCode = ErrorCode(0xFF);

    /// Human readable description of the code.
    pub fn message(&self) -> &'static str {
        match self.0 {
            0x00 => "no error",
            0x01 => "error writing to a register through the I2C bus",
            0x02 => "I2C command buffer full",
            0x03 => "could not add anchor to the device list",
            0x04 => "communication queue full, too many UWB messages",
            0x05 => "error reading from a register through the I2C bus",
            0x06 => "UWB configuration could not be applied",
            0x07 => "operation queue full, try again later",
            0x08 => "bus fault during startup",
            0x09 => "flash memory is corrupted or invalid",
            0x0A => "not enough anchors in the device list",
            0x0B => "error during discovery",
            0x0C => "error during calibration",
            0x0D => "invalid function parameters",
            0x0E => "anchor not found",
            0x0F => "flash error",
            0x10 => "memory error",
            0x11 => "ranging failed",
            0x12 => "ranging timeout waiting for the first response",
            0x13 => "ranging timeout waiting for the final response",
            0x14 => "transmission was scheduled too late",
            0x15 => "UWB transceiver busy",
            0x16 => "positioning algorithm error",
            0x17 => "no acknowledgement received",
            0xA0 => "TDMA scheduling error",
            0xE0 => "sniffer buffer overflow",
            0xF0 => "no PPS signal received",
            0xF1 => "new task started before the previous one completed",
            0xFE => "unrecognized device",
            0xFF => "general error",
            _ => "unknown error code",
        }
    }

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error 0x{:02x}: {}", self.0, self.message())
    }
}

// =============================================================================
// UWB radio settings
// =============================================================================

/// Preamble length register values and their symbol counts.
pub const PREAMBLE_LENGTHS: [(u8, u32); 8] = [
    (0x0C, 4096),
    (0x28, 2048),
    (0x18, 1536),
    (0x08, 1024),
    (0x34, 512),
    (0x24, 256),
    (0x14, 128),
    (0x04, 64),
];

/// Supported UWB channels.
pub const CHANNELS: [u8; 6] = [1, 2, 3, 4, 5, 7];

/// Maximum transmit gain in dB.
pub const MAX_GAIN_DB: f32 = 33.5;

/// UWB radio configuration of one device.
///
/// Two devices can only range with each other when their settings match.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UwbSettings {
    /// UWB channel (1-5, 7)
    pub channel: u8,
    /// Bitrate index (0: 110 kbit/s, 1: 850 kbit/s, 2: 6.81 Mbit/s)
    pub bitrate: u8,
    /// Pulse repetition frequency index (1: 16 MHz, 2: 64 MHz)
    pub prf: u8,
    /// Preamble length register value
    pub plen: u8,
    /// Transmit gain in dB (0.5 dB steps)
    pub gain_db: f32,
}

impl Default for UwbSettings {
    fn default() -> Self {
        Self::working()
    }
}

impl UwbSettings {
    /// Settings known to range reliably indoors and outdoors.
    pub fn working() -> Self {
        Self {
            channel: 5,
            bitrate: 0,
            prf: 2,
            plen: 0x08,
            gain_db: 11.5,
        }
    }

    /// Long-distance outdoor settings used for the two-tag range test.
    pub fn long_range() -> Self {
        Self {
            channel: 2,
            bitrate: 0,
            prf: 2,
            plen: 0x0C,
            gain_db: 15.5,
        }
    }

    /// Maximize reach: low channel, lowest bitrate, longest preamble.
    pub fn max_range() -> Self {
        Self {
            channel: 2,
            bitrate: 0,
            prf: 2,
            plen: 0x0C,
            gain_db: MAX_GAIN_DB,
        }
    }

    /// Maximize update rate: high channel, highest bitrate, short preamble.
    pub fn max_rate() -> Self {
        Self {
            channel: 5,
            bitrate: 2,
            prf: 2,
            plen: 0x08,
            gain_db: 11.5,
        }
    }

    /// Look up a named preset (`working`, `long-range`, `max-range`, `max-rate`).
    pub fn preset(name: &str) -> Option<Self> {
        match name.to_lowercase().replace('_', "-").as_str() {
            "working" | "default" => Some(Self::working()),
            "long-range" => Some(Self::long_range()),
            "max-range" => Some(Self::max_range()),
            "max-rate" => Some(Self::max_rate()),
            _ => None,
        }
    }

    pub fn bitrate_label(&self) -> &'static str {
        match self.bitrate {
            0 => "110 kbit/s",
            1 => "850 kbit/s",
            2 => "6.81 Mbit/s",
            _ => "unknown",
        }
    }

    pub fn prf_label(&self) -> &'static str {
        match self.prf {
            1 => "16 MHz",
            2 => "64 MHz",
            _ => "unknown",
        }
    }

    /// Preamble length in symbols, if the register value is valid.
    pub fn preamble_symbols(&self) -> Option<u32> {
        PREAMBLE_LENGTHS
            .iter()
            .find(|(reg, _)| *reg == self.plen)
            .map(|(_, symbols)| *symbols)
    }

    pub fn preamble_label(&self) -> String {
        match self.preamble_symbols() {
            Some(symbols) => format!("{} symbols", symbols),
            None => "unknown".to_string(),
        }
    }

    /// Nominal bitrate in kbit/s.
    pub fn bitrate_kbps(&self) -> f64 {
        match self.bitrate {
            0 => 110.0,
            1 => 850.0,
            _ => 6810.0,
        }
    }

    /// Check every field against the ranges the radio accepts.
    pub fn validate(&self) -> Result<(), DeviceError> {
        if !CHANNELS.contains(&self.channel) {
            return Err(DeviceError::InvalidSetting(format!(
                "channel {} not in {:?}",
                self.channel, CHANNELS
            )));
        }
        if self.bitrate > 2 {
            return Err(DeviceError::InvalidSetting(format!(
                "bitrate index {} must be 0-2",
                self.bitrate
            )));
        }
        if !(1..=2).contains(&self.prf) {
            return Err(DeviceError::InvalidSetting(format!(
                "prf index {} must be 1 or 2",
                self.prf
            )));
        }
        if self.preamble_symbols().is_none() {
            return Err(DeviceError::InvalidSetting(format!(
                "preamble length 0x{:02x} is not a valid register value",
                self.plen
            )));
        }
        if !(0.0..=MAX_GAIN_DB).contains(&self.gain_db) {
            return Err(DeviceError::InvalidSetting(format!(
                "gain {} dB must be within 0-{} dB",
                self.gain_db, MAX_GAIN_DB
            )));
        }
        Ok(())
    }

    /// Encode as the four consecutive radio registers
    /// (channel, rates, preamble length, gain in 0.5 dB steps).
    pub fn to_registers(&self) -> [u8; 4] {
        let rates = (self.bitrate & 0x3F) | (self.prf << 6);
        let gain = (self.gain_db * 2.0).round().clamp(0.0, 255.0) as u8;
        [self.channel, rates, self.plen, gain]
    }

    /// Decode the four consecutive radio registers.
    pub fn from_registers(regs: [u8; 4]) -> Self {
        Self {
            channel: regs[0],
            bitrate: regs[1] & 0x3F,
            prf: regs[1] >> 6,
            plen: regs[2],
            gain_db: regs[3] as f32 / 2.0,
        }
    }
}

impl fmt::Display for UwbSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Channel: {}, Bitrate: {}, PRF: {}, Plen: {}, Gain(dB): {}",
            self.channel,
            self.bitrate_label(),
            self.prf_label(),
            self.preamble_label(),
            self.gain_db
        )
    }
}

// =============================================================================
// Device identity and status
// =============================================================================

/// Role of a device in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Anchor,
    Tag,
    Unknown,
}

impl DeviceKind {
    /// Device list flag used when adding a device.
    pub fn flag(&self) -> u8 {
        match self {
            DeviceKind::Anchor => 1,
            DeviceKind::Tag => 2,
            DeviceKind::Unknown => 0,
        }
    }

    pub fn from_flag(flag: u8) -> Self {
        match flag {
            1 => DeviceKind::Anchor,
            2 => DeviceKind::Tag,
            _ => DeviceKind::Unknown,
        }
    }

    /// Hardware type lives in the top three bits of the hardware version.
    pub fn from_hardware_version(hw: u8) -> Self {
        Self::from_flag(hw >> 5)
    }

    /// Self-test bits expected to be set when every sensor passes.
    fn selftest_mask(&self) -> u8 {
        match self {
            DeviceKind::Anchor => SELFTEST_UWB,
            _ => SELFTEST_ALL,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Anchor => write!(f, "anchor"),
            DeviceKind::Tag => write!(f, "tag"),
            DeviceKind::Unknown => write!(f, "device"),
        }
    }
}

const SELFTEST_ALL: u8 = 0x3F;
const SELFTEST_UWB: u8 = 0x20;
const SELFTEST_NAMES: [(u8, &str); 6] = [
    (0x01, "accelerometer"),
    (0x02, "magnetometer"),
    (0x04, "gyroscope"),
    (0x08, "IMU"),
    (0x10, "pressure"),
    (0x20, "UWB"),
];

/// Identity and status registers of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDetails {
    pub id: DeviceId,
    pub who_am_i: u8,
    pub firmware_version: u8,
    pub hardware_version: u8,
    pub selftest: u8,
    pub error_code: ErrorCode,
}

impl DeviceDetails {
    pub fn kind(&self) -> DeviceKind {
        DeviceKind::from_hardware_version(self.hardware_version)
    }

    pub fn firmware_version_string(&self) -> String {
        format!("{}.{}", self.firmware_version >> 4, self.firmware_version & 0x0F)
    }

    pub fn hardware_version_string(&self) -> String {
        format!("{}.{}", self.hardware_version >> 5, self.hardware_version & 0x1F)
    }

    /// Sensors whose self-test bit is missing.
    pub fn failed_selftests(&self) -> Vec<&'static str> {
        let expected = self.kind().selftest_mask();
        SELFTEST_NAMES
            .iter()
            .filter(|(bit, _)| expected & bit != 0 && self.selftest & bit == 0)
            .map(|(_, name)| *name)
            .collect()
    }

    pub fn selftest_string(&self) -> String {
        let failed = self.failed_selftests();
        if failed.is_empty() {
            "All good".to_string()
        } else {
            format!("Failed: {}", failed.join(", "))
        }
    }
}

impl fmt::Display for DeviceDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} with id {}", self.kind(), self.id)?;
        writeln!(f, "\tWho am i: 0x{:02x}", self.who_am_i)?;
        writeln!(f, "\tFirmware version: v{}", self.firmware_version_string())?;
        writeln!(f, "\tHardware version: v{}", self.hardware_version_string())?;
        writeln!(f, "\tSelftest result: {}", self.selftest_string())?;
        writeln!(f, "\tError: 0x{:02x}", self.error_code.0)?;
        write!(f, "\tError message: {}", self.error_code.message())
    }
}

// =============================================================================
// Network topology
// =============================================================================

/// Position in millimeters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Coordinates {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another point in millimeters.
    pub fn distance_to(&self, other: &Coordinates) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        let dz = (self.z - other.z) as f64;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl FromStr for Coordinates {
    type Err = String;

    /// Parse `x,y,z` in millimeters.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(format!("expected x,y,z but got '{}'", s));
        }
        let axis = |v: &str| v.parse::<i32>().map_err(|e| format!("bad coordinate '{}': {}", v, e));
        Ok(Self::new(axis(parts[0])?, axis(parts[1])?, axis(parts[2])?))
    }
}

/// Entry of a device list: id, role flag and position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCoordinates {
    pub id: DeviceId,
    pub kind: DeviceKind,
    pub position: Coordinates,
}

impl DeviceCoordinates {
    pub fn anchor(id: DeviceId, position: Coordinates) -> Self {
        Self {
            id,
            kind: DeviceKind::Anchor,
            position,
        }
    }

    pub fn tag(id: DeviceId, position: Coordinates) -> Self {
        Self {
            id,
            kind: DeviceKind::Tag,
            position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_parse_and_display() {
        assert_eq!("0x7607".parse::<DeviceId>().unwrap(), DeviceId(0x7607));
        assert_eq!("7612h".parse::<DeviceId>().unwrap(), DeviceId(0x7612));
        assert_eq!("30215".parse::<DeviceId>().unwrap(), DeviceId(30215));
        assert!("0xZZ".parse::<DeviceId>().is_err());
        assert_eq!(DeviceId(0x7607).to_string(), "0x7607");
        assert_eq!(DeviceId(0x43).to_string(), "0x0043");
    }

    #[test]
    fn test_device_id_serde_accepts_number_or_text() {
        let from_text: DeviceId = serde_yaml::from_str("\"0x7653\"").unwrap();
        let from_number: DeviceId = serde_yaml::from_str("30291").unwrap();
        assert_eq!(from_text, DeviceId(0x7653));
        assert_eq!(from_number, DeviceId(0x7653));
        assert_eq!(serde_json::to_string(&DeviceId(0x7653)).unwrap(), "\"0x7653\"");
    }

    #[test]
    fn test_error_code_messages() {
        assert_eq!(ErrorCode::NONE.message(), "no error");
        assert!(ErrorCode::RTIMEOUT1.message().contains("timeout"));
        assert_eq!(ErrorCode(0x42).message(), "unknown error code");
        assert_eq!(
            ErrorCode::UWB_CONFIG.to_string(),
            "error 0x06: UWB configuration could not be applied"
        );
    }

    #[test]
    fn test_uwb_settings_registers() {
        // channel 5, rates 0b10_000001 (prf 64 MHz, 850 kbit/s), 1024 symbols, 25 dB
        let settings = UwbSettings::from_registers([5, 0b1000_0001, 0x08, 50]);
        assert_eq!(settings.channel, 5);
        assert_eq!(settings.bitrate, 1);
        assert_eq!(settings.prf, 2);
        assert_eq!(settings.plen, 0x08);
        assert_eq!(settings.gain_db, 25.0);
        assert_eq!(settings.to_registers(), [5, 0b1000_0001, 0x08, 50]);
    }

    #[test]
    fn test_uwb_settings_display() {
        let line = UwbSettings::working().to_string();
        assert_eq!(
            line,
            "Channel: 5, Bitrate: 110 kbit/s, PRF: 64 MHz, Plen: 1024 symbols, Gain(dB): 11.5"
        );
    }

    #[test]
    fn test_uwb_settings_validation() {
        assert!(UwbSettings::working().validate().is_ok());
        assert!(UwbSettings::max_range().validate().is_ok());

        let bad_channel = UwbSettings {
            channel: 6,
            ..UwbSettings::working()
        };
        assert!(matches!(bad_channel.validate(), Err(DeviceError::InvalidSetting(_))));

        let bad_plen = UwbSettings {
            plen: 0x09,
            ..UwbSettings::working()
        };
        assert!(bad_plen.validate().is_err());

        let bad_gain = UwbSettings {
            gain_db: 40.0,
            ..UwbSettings::working()
        };
        assert!(bad_gain.validate().is_err());
    }

    #[test]
    fn test_presets() {
        assert_eq!(UwbSettings::preset("max_range"), Some(UwbSettings::max_range()));
        assert_eq!(UwbSettings::preset("Long-Range"), Some(UwbSettings::long_range()));
        assert_eq!(UwbSettings::preset("turbo"), None);
        assert_eq!(UwbSettings::max_range().preamble_symbols(), Some(4096));
    }

    #[test]
    fn test_device_details_strings() {
        let details = DeviceDetails {
            id: DeviceId(0x7612),
            who_am_i: 0x43,
            firmware_version: 0x10,
            hardware_version: 0x23,
            selftest: 0x20,
            error_code: ErrorCode::NONE,
        };
        assert_eq!(details.kind(), DeviceKind::Anchor);
        assert_eq!(details.firmware_version_string(), "1.0");
        assert_eq!(details.hardware_version_string(), "1.3");
        assert_eq!(details.selftest_string(), "All good");

        let tag = DeviceDetails {
            hardware_version: 0x43,
            selftest: 0x3B,
            ..details
        };
        assert_eq!(tag.kind(), DeviceKind::Tag);
        assert_eq!(tag.failed_selftests(), vec!["gyroscope"]);
    }

    #[test]
    fn test_coordinates() {
        let origin = Coordinates::default();
        let c: Coordinates = "3000, 4000, 0".parse().unwrap();
        assert_eq!(c, Coordinates::new(3000, 4000, 0));
        assert_eq!(origin.distance_to(&c), 5000.0);
        assert!("1,2".parse::<Coordinates>().is_err());
    }
}
