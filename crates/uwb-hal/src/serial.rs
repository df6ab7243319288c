//! # Serial Backend
//!
//! Drives a UWB module attached over USB through the ASCII register
//! protocol in [`crate::protocol`].
//!
//! The port is any `Read + Write`, so the backend runs against a scripted
//! port in tests. Opening real ports and auto-detection need the `serial`
//! feature.
//!
//! Relayed (remote) operations are not available over this link and are
//! reported as [`DeviceError::Unsupported`].

use std::io::{Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};
use uwb_core::{
    DeviceCoordinates, DeviceDetails, DeviceError, DeviceId, DeviceResult, ErrorCode,
    Measurement, RangingFailure, RangingService, UwbDevice, UwbSettings,
};

use crate::protocol::{self, Request};
use crate::registers::{self, discovery, flash, int_status};

/// USB ids of the module's STM32 virtual COM port.
pub const USB_VID: u16 = 0x0483;
pub const USB_PID: u16 = 0x5740;

/// Default link speed.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Longest reply line accepted before giving up.
const MAX_LINE: usize = 512;

/// Timing of function-completion polling.
#[derive(Debug, Clone, Copy)]
pub struct SerialOptions {
    /// How long to wait for a function to raise its interrupt flag
    pub function_timeout: Duration,
    /// Pause between interrupt status reads
    pub poll_interval: Duration,
}

impl Default for SerialOptions {
    fn default() -> Self {
        Self {
            function_timeout: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(1),
        }
    }
}

/// A UWB module behind a byte stream.
pub struct SerialDevice<P> {
    name: String,
    port: P,
    options: SerialOptions,
    /// Device timestamp of the last successful range, reported with failures
    last_timestamp_ms: u32,
}

impl<P: Read + Write> SerialDevice<P> {
    pub fn new(port: P, name: impl Into<String>) -> Self {
        Self::with_options(port, name, SerialOptions::default())
    }

    pub fn with_options(port: P, name: impl Into<String>, options: SerialOptions) -> Self {
        Self {
            name: name.into(),
            port,
            options,
            last_timestamp_ms: 0,
        }
    }

    /// Check that a UWB module answers on the port.
    pub fn verify(&mut self) -> DeviceResult<()> {
        let who_am_i = self.read_register(registers::WHO_AM_I, 1)?;
        match who_am_i.first() {
            Some(&registers::WHO_AM_I_VALUE) => {
                info!(device = %self.name, "UWB module connected");
                Ok(())
            }
            other => Err(DeviceError::DeviceNotFound(format!(
                "{}: unexpected WHO_AM_I {:?}",
                self.name, other
            ))),
        }
    }

    pub fn into_inner(self) -> P {
        self.port
    }

    fn read_line(&mut self) -> DeviceResult<String> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let n = self.port.read(&mut byte)?;
            if n == 0 {
                return Err(DeviceError::Transport(format!("{}: port closed", self.name)));
            }
            match byte[0] {
                b'\n' => break,
                b'\r' => continue,
                b => line.push(b),
            }
            if line.len() > MAX_LINE {
                return Err(DeviceError::Protocol("reply line too long".to_string()));
            }
        }
        String::from_utf8(line).map_err(|e| DeviceError::Protocol(e.to_string()))
    }

    /// Send one request and decode its reply.
    pub fn transact(&mut self, request: &Request) -> DeviceResult<Vec<u8>> {
        let line = request.encode();
        trace!(request = line.trim_end(), "serial tx");
        self.port.write_all(line.as_bytes())?;
        self.port.flush()?;

        let reply = self.read_line()?;
        trace!(reply = %reply, "serial rx");
        let payload = protocol::decode_reply(&reply)?;

        match request {
            Request::Function { register, .. } => protocol::function_payload(*register, payload),
            _ => Ok(payload),
        }
    }

    pub fn read_register(&mut self, register: u8, len: usize) -> DeviceResult<Vec<u8>> {
        debug!(register = registers::name(register), len, "read register");
        let data = self.transact(&Request::read(register, len))?;
        if data.len() < len {
            return Err(DeviceError::Protocol(format!(
                "{}: expected {} bytes, got {}",
                registers::name(register),
                len,
                data.len()
            )));
        }
        Ok(data)
    }

    pub fn write_register(&mut self, register: u8, data: &[u8]) -> DeviceResult<()> {
        debug!(register = registers::name(register), len = data.len(), "write register");
        self.transact(&Request::write(register, data)).map(|_| ())
    }

    pub fn call(&mut self, register: u8, params: &[u8], len: usize) -> DeviceResult<Vec<u8>> {
        debug!(function = registers::name(register), "call function");
        self.transact(&Request::function(register, params, len))
    }

    /// Poll the interrupt status until the function flag is raised.
    fn wait_for_function(&mut self, operation: &str) -> DeviceResult<()> {
        let deadline = Instant::now() + self.options.function_timeout;
        loop {
            let status = self.read_register(registers::INT_STATUS, 1)?[0];
            if status & int_status::ERR != 0 {
                return Err(DeviceError::failed(operation));
            }
            if status & int_status::FUNC != 0 {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DeviceError::Timeout(format!(
                    "{} did not complete within {:?}",
                    operation, self.options.function_timeout
                )));
            }
            thread::sleep(self.options.poll_interval);
        }
    }

    fn local_only(&self, remote: Option<DeviceId>, operation: &str) -> DeviceResult<()> {
        match remote {
            None => Ok(()),
            Some(id) => Err(DeviceError::Unsupported(format!(
                "{} on remote {} over the serial link",
                operation, id
            ))),
        }
    }

    fn range_once(&mut self, target: DeviceId) -> DeviceResult<Measurement> {
        self.call(registers::DO_RANGING, &target.to_le_bytes(), 0)?;
        self.wait_for_function("ranging")?;
        let info = self.call(registers::DEVICE_GETRANGEINFO, &target.to_le_bytes(), 10)?;
        protocol::decode_range(&info)
    }
}

impl<P: Read + Write> RangingService for SerialDevice<P> {
    fn range(
        &mut self,
        target: DeviceId,
        relay: Option<DeviceId>,
    ) -> Result<Measurement, RangingFailure> {
        let result = self
            .local_only(relay, "ranging")
            .and_then(|_| self.range_once(target));
        match result {
            Ok(m) => {
                self.last_timestamp_ms = m.timestamp_ms;
                Ok(m)
            }
            Err(cause) => Err(RangingFailure::new(target, self.last_timestamp_ms, cause)),
        }
    }

    fn last_local_error(&mut self) -> DeviceResult<ErrorCode> {
        self.read_register(registers::ERRORCODE, 1)
            .map(|data| ErrorCode(data[0]))
            .map_err(|e| DeviceError::DiagnosticsUnavailable(e.to_string()))
    }
}

impl<P: Read + Write + Send> UwbDevice for SerialDevice<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_remote(&self) -> bool {
        false
    }

    fn details(&mut self, remote: Option<DeviceId>) -> DeviceResult<DeviceDetails> {
        self.local_only(remote, "details")?;
        let status = self.read_register(registers::WHO_AM_I, 5)?;
        let id = self.read_register(registers::NETWORK_ID, 2)?;
        Ok(DeviceDetails {
            id: DeviceId(u16::from_le_bytes([id[0], id[1]])),
            who_am_i: status[0],
            firmware_version: status[1],
            hardware_version: status[2],
            selftest: status[3],
            error_code: ErrorCode(status[4]),
        })
    }

    fn uwb_settings(&mut self, remote: Option<DeviceId>) -> DeviceResult<UwbSettings> {
        self.local_only(remote, "reading UWB settings")?;
        let regs = self.read_register(registers::UWB_CHANNEL, 4)?;
        protocol::decode_settings(&regs)
    }

    fn set_uwb_settings(
        &mut self,
        settings: &UwbSettings,
        remote: Option<DeviceId>,
    ) -> DeviceResult<()> {
        self.local_only(remote, "changing UWB settings")?;
        settings.validate()?;
        let regs = settings.to_registers();
        self.write_register(registers::UWB_CHANNEL, &regs[..3])?;
        self.write_register(registers::UWB_GAIN, &regs[3..])?;
        info!(device = %self.name, %settings, "UWB settings applied");
        Ok(())
    }

    fn save_uwb_settings(&mut self, remote: Option<DeviceId>) -> DeviceResult<()> {
        self.local_only(remote, "saving UWB settings")?;
        let params = [
            flash::REGS,
            registers::UWB_CHANNEL,
            registers::UWB_RATES,
            registers::UWB_PLEN,
            registers::UWB_GAIN,
        ];
        self.call(registers::FLASH_SAVE, &params, 0).map(|_| ())
    }

    fn clear_devices(&mut self, remote: Option<DeviceId>) -> DeviceResult<()> {
        self.local_only(remote, "clearing the device list")?;
        self.call(registers::DEVICES_CLEAR, &[], 0).map(|_| ())
    }

    fn add_device(
        &mut self,
        device: &DeviceCoordinates,
        remote: Option<DeviceId>,
    ) -> DeviceResult<()> {
        self.local_only(remote, "adding a device")?;
        self.call(registers::DEVICE_ADD, &protocol::encode_device(device), 0)
            .map_err(|e| match e {
                DeviceError::OperationFailed { operation, .. } => {
                    DeviceError::failed_with(operation, ErrorCode::ANCHOR_ADD)
                }
                other => other,
            })
            .map(|_| ())
    }

    fn device_ids(&mut self, remote: Option<DeviceId>) -> DeviceResult<Vec<DeviceId>> {
        self.local_only(remote, "listing devices")?;
        let size = self.read_register(registers::DEVICE_LIST_SIZE, 1)?[0] as usize;
        if size == 0 {
            return Ok(Vec::new());
        }
        let count = size.min(registers::MAX_DEVICE_LIST);
        let data = self.call(registers::DEVICES_GETIDS, &[0, count as u8], count * 2)?;
        protocol::decode_ids(&data, count)
    }

    fn save_network(&mut self, remote: Option<DeviceId>) -> DeviceResult<()> {
        self.local_only(remote, "saving the device list")?;
        self.call(registers::FLASH_SAVE, &[flash::NETWORK], 0).map(|_| ())
    }

    fn discover(&mut self, remote: Option<DeviceId>) -> DeviceResult<Vec<DeviceId>> {
        self.local_only(remote, "discovery")?;
        self.call(registers::DEVICES_DISCOVER, &[discovery::ALL_DEVICES, 3, 10], 0)?;
        if let Err(e) = self.wait_for_function("discovery") {
            warn!(error = %e, "discovery did not finish cleanly");
            return Err(e);
        }
        self.device_ids(None)
    }
}

// =============================================================================
// Real ports
// =============================================================================

#[cfg(feature = "serial")]
mod port {
    use super::*;
    use serialport::{SerialPort, SerialPortType};

    /// Serial device on an operating-system port.
    pub type PortDevice = SerialDevice<Box<dyn SerialPort>>;

    /// First port that looks like a UWB module.
    pub fn find_port() -> Option<String> {
        let ports = serialport::available_ports().ok()?;
        ports
            .into_iter()
            .find(|p| match &p.port_type {
                SerialPortType::UsbPort(usb) => usb.vid == USB_VID && usb.pid == USB_PID,
                _ => false,
            })
            .map(|p| p.port_name)
    }

    /// Every port that looks like a UWB module.
    pub fn list_ports() -> Vec<String> {
        serialport::available_ports()
            .unwrap_or_default()
            .into_iter()
            .filter(|p| {
                matches!(&p.port_type,
                    SerialPortType::UsbPort(usb) if usb.vid == USB_VID && usb.pid == USB_PID)
            })
            .map(|p| p.port_name)
            .collect()
    }

    impl SerialDevice<Box<dyn SerialPort>> {
        /// Open and verify a port.
        pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> DeviceResult<Self> {
            let port = serialport::new(path, baud_rate)
                .timeout(timeout)
                .open()
                .map_err(|e| match e.kind() {
                    serialport::ErrorKind::NoDevice => {
                        DeviceError::DeviceNotFound(format!("{}: {}", path, e))
                    }
                    _ => DeviceError::Transport(format!("{}: {}", path, e)),
                })?;
            let mut device = SerialDevice::new(port, path);
            device.verify()?;
            Ok(device)
        }

        /// Open the first detected module.
        pub fn open_first(baud_rate: u32, timeout: Duration) -> DeviceResult<Self> {
            let path = find_port().ok_or_else(|| {
                DeviceError::DeviceNotFound(
                    "no UWB module connected, check the USB cable or driver".to_string(),
                )
            })?;
            Self::open(&path, baud_rate, timeout)
        }
    }
}

#[cfg(feature = "serial")]
pub use port::{find_port, list_ports, PortDevice};

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};
    use uwb_core::{Coordinates, DeviceKind};

    /// Replays canned reply lines and records what was written.
    struct ScriptedPort {
        replies: Cursor<Vec<u8>>,
        written: Vec<u8>,
    }

    impl ScriptedPort {
        fn new(lines: &[&str]) -> Self {
            let mut replies = String::new();
            for line in lines {
                replies.push_str(line);
                replies.push_str("\r\n");
            }
            Self {
                replies: Cursor::new(replies.into_bytes()),
                written: Vec::new(),
            }
        }

        fn requests(&self) -> Vec<String> {
            String::from_utf8_lossy(&self.written)
                .split('\r')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        }
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.replies.read(buf)
        }
    }

    impl Write for ScriptedPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn device(lines: &[&str]) -> SerialDevice<ScriptedPort> {
        SerialDevice::with_options(
            ScriptedPort::new(lines),
            "scripted",
            SerialOptions {
                function_timeout: Duration::from_millis(50),
                poll_interval: Duration::ZERO,
            },
        )
    }

    #[test]
    fn test_verify() {
        assert!(device(&["D,43"]).verify().is_ok());
        assert!(matches!(
            device(&["D,00"]).verify(),
            Err(DeviceError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn test_local_ranging() {
        // DO_RANGING ok, INT_STATUS idle then FUNC, range info 1.5 m at t=1000
        let mut dev = device(&["D,01", "D,00", "D,10", "D,01e8030000dc050000b0ff"]);
        let m = dev.range(DeviceId(0x7612), None).unwrap();
        assert_eq!(m.timestamp_ms, 1000);
        assert_eq!(m.distance_mm, 1500);
        assert_eq!(m.rss_dbm, -80);

        let requests = dev.into_inner().requests();
        assert_eq!(requests[0], "F,b5,1276,1");
        assert_eq!(requests[1], "R,05,1");
        assert_eq!(requests[2], "R,05,1");
        assert_eq!(requests[3], "F,c7,1276,11");
    }

    #[test]
    fn test_ranging_failure_reports_last_timestamp() {
        let mut dev = device(&[
            "D,01",
            "D,10",
            "D,01e8030000dc050000b0ff",
            "D,01",
            "D,01",
            "D,12",
        ]);
        dev.range(DeviceId(0x7612), None).unwrap();

        let failure = dev.range(DeviceId(0x7612), None).unwrap_err();
        assert_eq!(failure.target, DeviceId(0x7612));
        assert_eq!(failure.timestamp_ms, 1000);
        assert!(failure.cause.is_recoverable());
        assert_eq!(dev.last_local_error().unwrap(), ErrorCode::RTIMEOUT1);
    }

    #[test]
    fn test_ranging_rejected_by_device() {
        let mut dev = device(&["D,00"]);
        let failure = dev.range(DeviceId(0x7612), None).unwrap_err();
        assert_eq!(failure.timestamp_ms, 0);
        assert!(matches!(failure.cause, DeviceError::OperationFailed { .. }));
    }

    #[test]
    fn test_function_timeout() {
        let mut lines = vec!["D,01"];
        lines.extend(std::iter::repeat("D,00").take(64));
        let mut dev = SerialDevice::with_options(
            ScriptedPort::new(&lines),
            "scripted",
            SerialOptions {
                function_timeout: Duration::ZERO,
                poll_interval: Duration::ZERO,
            },
        );
        let failure = dev.range(DeviceId(0x7612), None).unwrap_err();
        assert!(matches!(failure.cause, DeviceError::Timeout(_)));
    }

    #[test]
    fn test_remote_is_unsupported() {
        let mut dev = device(&[]);
        assert!(!dev.supports_remote());
        let failure = dev.range(DeviceId(0x7612), Some(DeviceId(0x7607))).unwrap_err();
        assert!(matches!(failure.cause, DeviceError::Unsupported(_)));
        assert!(matches!(
            dev.uwb_settings(Some(DeviceId(0x7607))),
            Err(DeviceError::Unsupported(_))
        ));
        assert!(dev.into_inner().written.is_empty());
    }

    #[test]
    fn test_error_code_unavailable() {
        let mut dev = device(&["garbage"]);
        assert!(matches!(
            dev.last_local_error(),
            Err(DeviceError::DiagnosticsUnavailable(_))
        ));
    }

    #[test]
    fn test_details() {
        let mut dev = device(&["D,43102320 00", "D,0776"]);
        // a malformed status reply surfaces as a protocol error
        assert!(matches!(dev.details(None), Err(DeviceError::Protocol(_))));

        let mut dev = device(&["D,4310233f00", "D,0776"]);
        let details = dev.details(None).unwrap();
        assert_eq!(details.id, DeviceId(0x7607));
        assert_eq!(details.firmware_version_string(), "1.0");
        assert_eq!(details.selftest_string(), "All good");
        assert!(details.error_code.is_none());
    }

    #[test]
    fn test_settings_round_trip_on_wire() {
        let mut dev = device(&["D,", "D,", "D,05800817"]);
        dev.set_uwb_settings(&UwbSettings::working(), None).unwrap();
        let settings = dev.uwb_settings(None).unwrap();
        assert_eq!(settings, UwbSettings::working());

        let requests = dev.into_inner().requests();
        assert_eq!(requests[0], "W,1c,058008");
        assert_eq!(requests[1], "W,1f,17");
        assert_eq!(requests[2], "R,1c,4");
    }

    #[test]
    fn test_invalid_settings_not_sent() {
        let mut dev = device(&[]);
        let bad = UwbSettings {
            plen: 0x99,
            ..UwbSettings::working()
        };
        assert!(matches!(
            dev.set_uwb_settings(&bad, None),
            Err(DeviceError::InvalidSetting(_))
        ));
        assert!(dev.into_inner().written.is_empty());
    }

    #[test]
    fn test_device_list() {
        let mut dev = device(&["D,01", "D,01", "D,02", "D,0112765376", "D,01"]);
        dev.clear_devices(None).unwrap();
        dev.add_device(
            &DeviceCoordinates {
                id: DeviceId(0x7612),
                kind: DeviceKind::Anchor,
                position: Coordinates::new(0, 0, 0),
            },
            None,
        )
        .unwrap();
        assert_eq!(
            dev.device_ids(None).unwrap(),
            vec![DeviceId(0x7612), DeviceId(0x7653)]
        );
        dev.save_network(None).unwrap();

        let requests = dev.into_inner().requests();
        assert_eq!(requests[0], "F,c3,,1");
        assert!(requests[1].starts_with("F,c4,127601"));
        assert_eq!(requests[2], "R,81,1");
        assert_eq!(requests[3], "F,c0,0002,5");
        assert_eq!(requests[4], "F,ba,03,1");
    }

    #[test]
    fn test_add_device_failure_carries_code() {
        let mut dev = device(&["D,00"]);
        let err = dev
            .add_device(
                &DeviceCoordinates::anchor(DeviceId(0x7612), Coordinates::default()),
                None,
            )
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ANCHOR_ADD));
    }

    #[test]
    fn test_port_closed() {
        let mut dev = device(&[]);
        assert!(matches!(
            dev.read_register(registers::WHO_AM_I, 1),
            Err(DeviceError::Transport(_))
        ));
    }
}
