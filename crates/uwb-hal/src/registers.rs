//! Register map of the UWB module
//!
//! Addresses, interrupt flags and flash selectors used by the serial
//! backend. Only the registers the tools touch are listed.

/// Expected content of [`WHO_AM_I`].
pub const WHO_AM_I_VALUE: u8 = 0x43;

// Status registers
pub const WHO_AM_I: u8 = 0x00;
pub const FIRMWARE_VER: u8 = 0x01;
pub const HARDWARE_VER: u8 = 0x02;
pub const ST_RESULT: u8 = 0x03;
pub const ERRORCODE: u8 = 0x04;
pub const INT_STATUS: u8 = 0x05;

// Configuration registers
pub const NETWORK_ID: u8 = 0x1A;
pub const UWB_CHANNEL: u8 = 0x1C;
pub const UWB_RATES: u8 = 0x1D;
pub const UWB_PLEN: u8 = 0x1E;
pub const UWB_GAIN: u8 = 0x1F;

// Device list
pub const DEVICE_LIST_SIZE: u8 = 0x81;

// Functions
pub const RESET_SYS: u8 = 0xB0;
pub const LED_CTRL: u8 = 0xB1;
pub const TX_DATA: u8 = 0xB2;
pub const TX_SEND: u8 = 0xB3;
pub const RX_DATA: u8 = 0xB4;
pub const DO_RANGING: u8 = 0xB5;
pub const DO_POSITIONING: u8 = 0xB6;
pub const FLASH_RESET: u8 = 0xB9;
pub const FLASH_SAVE: u8 = 0xBA;
pub const FLASH_DETAILS: u8 = 0xBB;
pub const DEVICES_GETIDS: u8 = 0xC0;
pub const DEVICES_DISCOVER: u8 = 0xC1;
pub const DEVICES_CALIBRATE: u8 = 0xC2;
pub const DEVICES_CLEAR: u8 = 0xC3;
pub const DEVICE_ADD: u8 = 0xC4;
pub const DEVICE_GETINFO: u8 = 0xC5;
pub const DEVICE_GETCOORDS: u8 = 0xC6;
pub const DEVICE_GETRANGEINFO: u8 = 0xC7;

/// Bits of [`INT_STATUS`].
pub mod int_status {
    pub const ERR: u8 = 0x01;
    pub const POS: u8 = 0x02;
    pub const IMU: u8 = 0x04;
    pub const RX_DATA: u8 = 0x08;
    pub const FUNC: u8 = 0x10;
}

/// Selector byte of [`FLASH_SAVE`](super::FLASH_SAVE).
pub mod flash {
    pub const REGS: u8 = 1;
    pub const ANCHOR_IDS: u8 = 2;
    pub const NETWORK: u8 = 3;
}

/// Discovery type parameter of [`DEVICES_DISCOVER`](super::DEVICES_DISCOVER).
pub mod discovery {
    pub const ANCHORS_ONLY: u8 = 0;
    pub const TAGS_ONLY: u8 = 1;
    pub const ALL_DEVICES: u8 = 2;
}

/// Function call returned success.
pub const STATUS_SUCCESS: u8 = 1;

/// Largest device list the module keeps.
pub const MAX_DEVICE_LIST: usize = 20;

/// Human-readable register name for logging.
pub fn name(register: u8) -> &'static str {
    match register {
        WHO_AM_I => "WHO_AM_I",
        FIRMWARE_VER => "FIRMWARE_VER",
        HARDWARE_VER => "HARDWARE_VER",
        ST_RESULT => "ST_RESULT",
        ERRORCODE => "ERRORCODE",
        INT_STATUS => "INT_STATUS",
        NETWORK_ID => "NETWORK_ID",
        UWB_CHANNEL => "UWB_CHANNEL",
        UWB_RATES => "UWB_RATES",
        UWB_PLEN => "UWB_PLEN",
        UWB_GAIN => "UWB_GAIN",
        DEVICE_LIST_SIZE => "DEVICE_LIST_SIZE",
        RESET_SYS => "RESET_SYS",
        LED_CTRL => "LED_CTRL",
        TX_DATA => "TX_DATA",
        TX_SEND => "TX_SEND",
        RX_DATA => "RX_DATA",
        DO_RANGING => "DO_RANGING",
        DO_POSITIONING => "DO_POSITIONING",
        FLASH_RESET => "FLASH_RESET",
        FLASH_SAVE => "FLASH_SAVE",
        FLASH_DETAILS => "FLASH_DETAILS",
        DEVICES_GETIDS => "DEVICES_GETIDS",
        DEVICES_DISCOVER => "DEVICES_DISCOVER",
        DEVICES_CALIBRATE => "DEVICES_CALIBRATE",
        DEVICES_CLEAR => "DEVICES_CLEAR",
        DEVICE_ADD => "DEVICE_ADD",
        DEVICE_GETINFO => "DEVICE_GETINFO",
        DEVICE_GETCOORDS => "DEVICE_GETCOORDS",
        DEVICE_GETRANGEINFO => "DEVICE_GETRANGEINFO",
        _ => "UNKNOWN",
    }
}

/// Functions are the registers from `RESET_SYS` upwards.
pub fn is_function(register: u8) -> bool {
    register >= RESET_SYS
}
