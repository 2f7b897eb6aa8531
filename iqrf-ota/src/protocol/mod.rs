//! DPA protocol implementation.
//!
//! - [`dpa`]: request/response packets and command builders
//! - [`frc`]: Fast Response Collection commands and result decoding
//! - [`nodes`]: node-selection bitmaps
//! - [`uart`]: UART framing used between host and coordinator
//! - [`crc`]: CRC-8 used by the UART framing

pub mod crc;
pub mod dpa;
pub mod frc;
pub mod nodes;
pub mod uart;

// Re-export common types
pub use {
    dpa::{DpaRequest, DpaResponse, LoadCode},
    frc::{FrcResponseTime, FrcResult},
    nodes::NodeSet,
};

/// Address of the network coordinator.
pub const COORDINATOR_ADDRESS: u8 = 0x00;

/// Highest routable node address.
pub const MAX_ADDRESS: u8 = 239;

/// Broadcast address.
pub const BROADCAST_ADDRESS: u8 = 0xFF;

/// Hardware profile ID that matches every device.
pub const HWPID_DO_NOT_CHECK: u16 = 0xFFFF;

/// Peripheral numbers.
pub mod pnum {
    /// Coordinator peripheral.
    pub const COORDINATOR: u8 = 0x00;
    /// OS peripheral.
    pub const OS: u8 = 0x02;
    /// Internal EEPROM peripheral.
    pub const EEPROM: u8 = 0x03;
    /// External EEPROM peripheral.
    pub const EEEPROM: u8 = 0x04;
    /// FRC peripheral.
    pub const FRC: u8 = 0x0D;
}

/// Peripheral commands.
pub mod cmd {
    /// Coordinator: read bonded devices bitmap.
    pub const COORDINATOR_BONDED_DEVICES: u8 = 0x02;
    /// OS: read module information.
    pub const OS_READ: u8 = 0x00;
    /// OS: execute embedded requests.
    pub const OS_BATCH: u8 = 0x05;
    /// OS: verify or load code from external EEPROM.
    pub const OS_LOAD_CODE: u8 = 0x0A;
    /// Internal EEPROM: write.
    pub const EEPROM_WRITE: u8 = 0x01;
    /// External EEPROM: extended write.
    pub const EEEPROM_XWRITE: u8 = 0x03;
    /// FRC: send to all nodes.
    pub const FRC_SEND: u8 = 0x00;
    /// FRC: fetch remaining result bytes.
    pub const FRC_EXTRA_RESULT: u8 = 0x01;
    /// FRC: send to selected nodes.
    pub const FRC_SEND_SELECTIVE: u8 = 0x02;
    /// FRC: set parameters.
    pub const FRC_SET_PARAMS: u8 = 0x03;
}
