//! DPA request and response packets.
//!
//! ## Packet layout
//!
//! ```text
//! request:  +------+------+------+-------+---------+
//!           | NADR | PNUM | PCMD | HWPID |  PData  |
//!           +------+------+------+-------+---------+
//!           |  2   |  1   |  1   |   2   |  0..56  |
//!
//! response: +------+------+-----------+-------+------+----------+---------+
//!           | NADR | PNUM | PCMD|0x80 | HWPID | ErrN | DpaValue |  PData  |
//!           +------+------+-----------+-------+------+----------+---------+
//! ```
//!
//! All multi-byte fields are little-endian.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::{
    error::{Error, Result},
    image::ContentType,
    protocol::{BROADCAST_ADDRESS, COORDINATOR_ADDRESS, HWPID_DO_NOT_CHECK, cmd, pnum},
};

/// Flag set in PCMD of every response.
pub const RESPONSE_FLAG: u8 = 0x80;

/// Request header length (NADR, PNUM, PCMD, HWPID).
pub const REQUEST_HEADER_LEN: usize = 6;

/// Response header length (request header + ErrN + DpaValue).
pub const RESPONSE_HEADER_LEN: usize = 8;

/// Largest data block written by one EEPROM/EEEPROM write.
pub const MAX_WRITE_DATA: usize = 54;

/// Response status codes.
pub mod status {
    /// No error.
    pub const NO_ERROR: u8 = 0x00;
    /// General failure.
    pub const ERROR_FAIL: u8 = 0x01;
    /// Unknown peripheral command.
    pub const ERROR_PCMD: u8 = 0x02;
    /// Unknown peripheral.
    pub const ERROR_PNUM: u8 = 0x03;
    /// Address out of range.
    pub const ERROR_ADDR: u8 = 0x04;
    /// Wrong data length.
    pub const ERROR_DATA_LEN: u8 = 0x05;
    /// Invalid data.
    pub const ERROR_DATA: u8 = 0x06;
    /// Hardware profile mismatch.
    pub const ERROR_HWPID: u8 = 0x07;
    /// Invalid node address.
    pub const ERROR_NADR: u8 = 0x08;
    /// Custom handler consumed the interface request.
    pub const ERROR_IFACE_CUSTOM_HANDLER: u8 = 0x09;
    /// Custom DPA handler is missing.
    pub const ERROR_MISSING_CUSTOM_DPA_HANDLER: u8 = 0x0A;
    /// Coordinator confirmation of a request forwarded to the network.
    pub const CONFIRMATION: u8 = 0xFF;
}

/// Name of a response status for messages.
pub fn status_name(code: u8) -> &'static str {
    match code {
        status::NO_ERROR => "no error",
        status::ERROR_FAIL => "general failure",
        status::ERROR_PCMD => "unknown command",
        status::ERROR_PNUM => "unknown peripheral",
        status::ERROR_ADDR => "address out of range",
        status::ERROR_DATA_LEN => "wrong data length",
        status::ERROR_DATA => "invalid data",
        status::ERROR_HWPID => "hardware profile mismatch",
        status::ERROR_NADR => "invalid node address",
        status::ERROR_IFACE_CUSTOM_HANDLER => "consumed by custom handler",
        status::ERROR_MISSING_CUSTOM_DPA_HANDLER => "missing custom DPA handler",
        0x20..=0x3F => "user error",
        status::CONFIRMATION => "confirmation",
        _ => "unknown status",
    }
}

/// Whether a status means the request itself can never succeed.
pub fn is_fatal_status(code: u8) -> bool {
    matches!(
        code,
        status::ERROR_PCMD
            | status::ERROR_PNUM
            | status::ERROR_DATA_LEN
            | status::ERROR_MISSING_CUSTOM_DPA_HANDLER
    )
}

/// A DPA request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DpaRequest {
    nadr: u16,
    pnum: u8,
    pcmd: u8,
    hwpid: u16,
    data: Vec<u8>,
}

impl DpaRequest {
    /// Create a request without data.
    pub fn new(nadr: u8, pnum: u8, pcmd: u8, hwpid: u16) -> Self {
        Self {
            nadr: u16::from(nadr),
            pnum,
            pcmd,
            hwpid,
            data: Vec::new(),
        }
    }

    /// Set the request data.
    #[must_use]
    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = data.into();
        self
    }

    /// Read the bonded devices bitmap from the coordinator.
    pub fn bonded_devices() -> Self {
        Self::new(
            COORDINATOR_ADDRESS,
            pnum::COORDINATOR,
            cmd::COORDINATOR_BONDED_DEVICES,
            HWPID_DO_NOT_CHECK,
        )
    }

    /// Read OS and module information of one node.
    pub fn os_read(nadr: u8) -> Self {
        Self::new(nadr, pnum::OS, cmd::OS_READ, HWPID_DO_NOT_CHECK)
    }

    /// Write up to [`MAX_WRITE_DATA`] bytes to the internal EEPROM.
    pub fn eeprom_write(nadr: u8, hwpid: u16, address: u8, data: &[u8]) -> Self {
        let mut pdata = Vec::with_capacity(1 + data.len());
        pdata.push(address);
        pdata.extend_from_slice(data);
        Self::new(nadr, pnum::EEPROM, cmd::EEPROM_WRITE, hwpid).with_data(pdata)
    }

    /// Extended write to the external EEPROM.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn eeeprom_xwrite(nadr: u8, hwpid: u16, address: u16, data: &[u8]) -> Self {
        let mut pdata = Vec::with_capacity(2 + data.len());
        pdata.write_u16::<LittleEndian>(address).unwrap();
        pdata.extend_from_slice(data);
        Self::new(nadr, pnum::EEEPROM, cmd::EEEPROM_XWRITE, hwpid).with_data(pdata)
    }

    /// Execute several embedded requests in one packet.
    ///
    /// Each embedded request is `[len, PNUM, PCMD, HWPID lo, HWPID hi, PData...]`
    /// with `len` covering the whole embedded request; a zero byte terminates
    /// the list.
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn batch(nadr: u8, hwpid: u16, requests: &[Self]) -> Self {
        let mut pdata = Vec::new();
        for request in requests {
            pdata.push((1 + 4 + request.data.len()) as u8);
            pdata.push(request.pnum);
            pdata.push(request.pcmd);
            pdata.write_u16::<LittleEndian>(request.hwpid).unwrap();
            pdata.extend_from_slice(&request.data);
        }
        pdata.push(0x00);
        Self::new(nadr, pnum::OS, cmd::OS_BATCH, hwpid).with_data(pdata)
    }

    /// Verify or load code stored in the external EEPROM.
    pub fn load_code(nadr: u8, params: &LoadCode) -> Self {
        Self::new(nadr, pnum::OS, cmd::OS_LOAD_CODE, HWPID_DO_NOT_CHECK).with_data(params.encode())
    }

    /// Node address.
    pub fn nadr(&self) -> u16 {
        self.nadr
    }

    /// Peripheral number.
    pub fn pnum(&self) -> u8 {
        self.pnum
    }

    /// Peripheral command.
    pub fn pcmd(&self) -> u8 {
        self.pcmd
    }

    /// Hardware profile ID.
    pub fn hwpid(&self) -> u16 {
        self.hwpid
    }

    /// Request data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Whether the request goes to every node.
    pub fn is_broadcast(&self) -> bool {
        self.nadr == u16::from(BROADCAST_ADDRESS)
    }

    /// Encode the request.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn build(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(REQUEST_HEADER_LEN + self.data.len());
        buf.write_u16::<LittleEndian>(self.nadr).unwrap();
        buf.push(self.pnum);
        buf.push(self.pcmd);
        buf.write_u16::<LittleEndian>(self.hwpid).unwrap();
        buf.extend_from_slice(&self.data);
        buf
    }

    /// Decode a request (used when inspecting logged transactions).
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < REQUEST_HEADER_LEN {
            return Err(Error::Protocol(format!(
                "request too short: {} byte(s)",
                bytes.len()
            )));
        }
        let mut cursor = Cursor::new(bytes);
        let nadr = cursor.read_u16::<LittleEndian>()?;
        let pnum = cursor.read_u8()?;
        let pcmd = cursor.read_u8()?;
        let hwpid = cursor.read_u16::<LittleEndian>()?;
        Ok(Self {
            nadr,
            pnum,
            pcmd,
            hwpid,
            data: bytes[REQUEST_HEADER_LEN..].to_vec(),
        })
    }
}

/// A DPA response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DpaResponse {
    /// Node address.
    pub nadr: u16,
    /// Peripheral number.
    pub pnum: u8,
    /// Peripheral command including [`RESPONSE_FLAG`].
    pub pcmd: u8,
    /// Hardware profile ID of the responding node.
    pub hwpid: u16,
    /// Response status (`ErrN`).
    pub status: u8,
    /// DPA value byte.
    pub dpa_value: u8,
    /// Response data.
    pub data: Vec<u8>,
}

impl DpaResponse {
    /// Decode a response packet without checking its status.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < RESPONSE_HEADER_LEN {
            return Err(Error::Protocol(format!(
                "response too short: {} byte(s)",
                bytes.len()
            )));
        }
        let mut cursor = Cursor::new(bytes);
        let nadr = cursor.read_u16::<LittleEndian>()?;
        let pnum = cursor.read_u8()?;
        let pcmd = cursor.read_u8()?;
        let hwpid = cursor.read_u16::<LittleEndian>()?;
        let status = cursor.read_u8()?;
        let dpa_value = cursor.read_u8()?;
        Ok(Self {
            nadr,
            pnum,
            pcmd,
            hwpid,
            status,
            dpa_value,
            data: bytes[RESPONSE_HEADER_LEN..].to_vec(),
        })
    }

    /// Decode a response to `request` and check that it reports success.
    ///
    /// A confirmation is the final answer to a broadcast request.
    pub fn parse_for(request: &DpaRequest, bytes: &[u8]) -> Result<Self> {
        let response = Self::parse(bytes)?;
        if response.nadr != request.nadr || response.pnum != request.pnum {
            return Err(Error::Protocol(format!(
                "response for node {} peripheral {:#04x} does not match request",
                response.nadr, response.pnum
            )));
        }
        if response.is_confirmation() && request.is_broadcast() {
            return Ok(response);
        }
        if response.pcmd != request.pcmd | RESPONSE_FLAG {
            return Err(Error::Protocol(format!(
                "unexpected response command {:#04x}",
                response.pcmd
            )));
        }
        if response.status != status::NO_ERROR {
            return Err(Error::Dpa {
                status: response.status,
            });
        }
        Ok(response)
    }

    /// Whether this is a coordinator confirmation rather than the node response.
    pub fn is_confirmation(&self) -> bool {
        self.status == status::CONFIRMATION
    }

    /// Data byte at `index`, or a protocol error if the response is too short.
    pub fn data_byte(&self, index: usize) -> Result<u8> {
        self.data.get(index).copied().ok_or_else(|| {
            Error::Protocol(format!(
                "response data too short: need byte {index}, got {}",
                self.data.len()
            ))
        })
    }
}

/// Parameters of the OS load-code command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadCode {
    /// Load into flash (`true`) or only verify (`false`).
    pub load: bool,
    /// Content kind; plugins set bit 1 of the flags.
    pub content_type: ContentType,
    /// External EEPROM address of the code.
    pub address: u16,
    /// Code length.
    pub length: u16,
    /// Expected checksum.
    pub checksum: u16,
}

impl LoadCode {
    /// Encoded length.
    pub const LEN: usize = 7;

    /// Flags byte: bit 0 load, bit 1 IQRF plugin.
    pub fn flags(&self) -> u8 {
        let mut flags = u8::from(self.load);
        if self.content_type == ContentType::Plugin {
            flags |= 0x02;
        }
        flags
    }

    /// `[flags, address, length, checksum]`, little-endian.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::LEN);
        buf.push(self.flags());
        buf.write_u16::<LittleEndian>(self.address).unwrap();
        buf.write_u16::<LittleEndian>(self.length).unwrap();
        buf.write_u16::<LittleEndian>(self.checksum).unwrap();
        buf
    }
}
