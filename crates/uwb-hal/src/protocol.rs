//! # ASCII Register Protocol
//!
//! Line-based protocol spoken over the module's virtual COM port.
//!
//! ```text
//! host → device                          device → host
//! R,<reg>,<len>\r                        D,<hex bytes>
//! W,<reg>,<hex data>\r                   D,
//! F,<reg>,<hex params>,<len>\r           D,<status><hex bytes>
//! ```
//!
//! Register addresses are two lowercase hex digits, data is hex encoded two
//! characters per byte. Function replies start with a status byte, `1` on
//! success.

use uwb_core::{DeviceCoordinates, DeviceError, DeviceResult, DeviceId, Measurement, UwbSettings};

use crate::registers;

/// One request frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Read `len` bytes starting at `register`
    Read { register: u8, len: usize },
    /// Write bytes starting at `register`
    Write { register: u8, data: Vec<u8> },
    /// Call a function, expecting `len` bytes after the status byte
    Function { register: u8, params: Vec<u8>, len: usize },
}

impl Request {
    pub fn read(register: u8, len: usize) -> Self {
        Request::Read { register, len }
    }

    pub fn write(register: u8, data: impl Into<Vec<u8>>) -> Self {
        Request::Write {
            register,
            data: data.into(),
        }
    }

    pub fn function(register: u8, params: impl Into<Vec<u8>>, len: usize) -> Self {
        Request::Function {
            register,
            params: params.into(),
            len,
        }
    }

    pub fn register(&self) -> u8 {
        match self {
            Request::Read { register, .. }
            | Request::Write { register, .. }
            | Request::Function { register, .. } => *register,
        }
    }

    /// Serialize to the wire line, including the trailing `\r`.
    pub fn encode(&self) -> String {
        match self {
            Request::Read { register, len } => format!("R,{:02x},{}\r", register, len),
            Request::Write { register, data } => {
                format!("W,{:02x},{}\r", register, hex_encode(data))
            }
            Request::Function {
                register,
                params,
                len,
            } => format!("F,{:02x},{},{}\r", register, hex_encode(params), len + 1),
        }
    }
}

pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn hex_decode(text: &str) -> DeviceResult<Vec<u8>> {
    let text = text.trim();
    if text.len() % 2 != 0 {
        return Err(DeviceError::Protocol(format!("odd-length hex payload '{}'", text)));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            text.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| DeviceError::Protocol(format!("invalid hex payload '{}'", text)))
        })
        .collect()
}

/// Decode a `D,<hex>` reply line into its payload.
pub fn decode_reply(line: &str) -> DeviceResult<Vec<u8>> {
    let line = line.trim_end_matches(['\r', '\n']);
    let payload = line
        .strip_prefix("D,")
        .ok_or_else(|| DeviceError::Protocol(format!("unexpected reply '{}'", line)))?;
    hex_decode(payload)
}

/// Split a function reply into its data after checking the status byte.
pub fn function_payload(register: u8, reply: Vec<u8>) -> DeviceResult<Vec<u8>> {
    match reply.split_first() {
        Some((&registers::STATUS_SUCCESS, data)) => Ok(data.to_vec()),
        Some((status, _)) => Err(DeviceError::OperationFailed {
            operation: format!("{} returned status {}", registers::name(register), status),
            code: None,
        }),
        None => Err(DeviceError::Protocol(format!(
            "empty reply to {}",
            registers::name(register)
        ))),
    }
}

fn require_len(what: &str, bytes: &[u8], len: usize) -> DeviceResult<()> {
    if bytes.len() < len {
        return Err(DeviceError::Protocol(format!(
            "{} needs {} bytes, got {}",
            what,
            len,
            bytes.len()
        )));
    }
    Ok(())
}

/// `DEVICE_GETRANGEINFO` payload: u32 timestamp, u32 distance, i16 RSS, little endian.
pub fn decode_range(bytes: &[u8]) -> DeviceResult<Measurement> {
    require_len("range info", bytes, 10)?;
    Ok(Measurement {
        timestamp_ms: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        distance_mm: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        rss_dbm: i16::from_le_bytes([bytes[8], bytes[9]]),
    })
}

pub fn encode_range(m: &Measurement) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(10);
    bytes.extend_from_slice(&m.timestamp_ms.to_le_bytes());
    bytes.extend_from_slice(&m.distance_mm.to_le_bytes());
    bytes.extend_from_slice(&m.rss_dbm.to_le_bytes());
    bytes
}

/// Four radio registers from `UWB_CHANNEL`.
pub fn decode_settings(bytes: &[u8]) -> DeviceResult<UwbSettings> {
    require_len("UWB settings", bytes, 4)?;
    Ok(UwbSettings::from_registers([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Device list entry: id, flag, x, y, z (i32 LE each).
pub fn encode_device(device: &DeviceCoordinates) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(15);
    bytes.extend_from_slice(&device.id.to_le_bytes());
    bytes.push(device.kind.flag());
    bytes.extend_from_slice(&device.position.x.to_le_bytes());
    bytes.extend_from_slice(&device.position.y.to_le_bytes());
    bytes.extend_from_slice(&device.position.z.to_le_bytes());
    bytes
}

/// Packed little-endian u16 ids.
pub fn decode_ids(bytes: &[u8], count: usize) -> DeviceResult<Vec<DeviceId>> {
    require_len("device ids", bytes, count * 2)?;
    Ok(bytes
        .chunks_exact(2)
        .take(count)
        .map(|pair| DeviceId(u16::from_le_bytes([pair[0], pair[1]])))
        .collect())
}
