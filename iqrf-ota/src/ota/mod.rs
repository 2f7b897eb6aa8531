//! Over-the-air code upload, verification and loading.
//!
//! A request names an image file, a target (one node, the coordinator or the
//! whole network) and an action. Every action first reads the target's module
//! information and rejects incompatible images; then:
//!
//! ```text
//! Upload  write EEPROM data (if allowed), then the code into external EEPROM
//! Verify  ask the node(s) to check the stored code against length/checksum
//! Load    verify, then ask the node(s) to move the code into flash
//! ```
//!
//! Broadcast verification and loading use FRC so one radio round collects the
//! answers of many nodes.

pub mod result;
mod service;

use std::{fmt, str::FromStr};

use crate::{
    error::{Error, Result},
    protocol::{BROADCAST_ADDRESS, HWPID_DO_NOT_CHECK, MAX_ADDRESS},
};

pub use {
    result::{StatusCode, UploadResult},
    service::{BATCH_WRITE_DELAY, LOAD_CODE_TIMEOUT, OtaUploader, ProgressFn},
};

/// Lowest external EEPROM address code may be stored at.
pub const MIN_START_MEM_ADDR: u16 = 0x0300;

/// Highest external EEPROM address code may be stored at.
pub const MAX_START_MEM_ADDR: u16 = 0x3FFF;

/// Highest accepted `repeat` value; larger values are clamped.
pub const MAX_REPEAT: u8 = 3;

/// What a request does with the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadingAction {
    /// Write the code into external EEPROM.
    Upload,
    /// Check the stored code.
    Verify,
    /// Check the stored code and load it into flash.
    Load,
}

impl LoadingAction {
    /// Name used in requests and responses.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "Upload",
            Self::Verify => "Verify",
            Self::Load => "Load",
        }
    }
}

impl FromStr for LoadingAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Upload" => Ok(Self::Upload),
            "Verify" => Ok(Self::Verify),
            "Load" => Ok(Self::Load),
            other => Err(Error::InvalidRequest(format!(
                "Unsupported loading action: {other}"
            ))),
        }
    }
}

impl fmt::Display for LoadingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of one OTA request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtaRequest {
    /// Action to perform.
    pub action: LoadingAction,
    /// Image file name, relative to the upload directory.
    pub file_name: String,
    /// Target node, 0 for the coordinator or 255 for every node.
    pub device_addr: u16,
    /// Hardware profile ID broadcast requests are limited to.
    pub hwpid: u16,
    /// External EEPROM address the code is stored at.
    pub start_mem_addr: u16,
    /// Extra attempts per command.
    pub repeat: u8,
    /// Allow writing the image's internal EEPROM data.
    pub upload_eeprom_data: bool,
    /// Allow writing the image's external EEPROM data.
    pub upload_eeeprom_data: bool,
}

impl OtaRequest {
    /// Request for the coordinator with default parameters.
    pub fn new(action: LoadingAction, file_name: impl Into<String>) -> Self {
        Self {
            action,
            file_name: file_name.into(),
            device_addr: 0,
            hwpid: HWPID_DO_NOT_CHECK,
            start_mem_addr: MIN_START_MEM_ADDR,
            repeat: 1,
            upload_eeprom_data: false,
            upload_eeeprom_data: false,
        }
    }

    /// Set the target address.
    #[must_use]
    pub fn with_device_addr(mut self, device_addr: u16) -> Self {
        self.device_addr = device_addr;
        self
    }

    /// Set the hardware profile ID.
    #[must_use]
    pub fn with_hwpid(mut self, hwpid: u16) -> Self {
        self.hwpid = hwpid;
        self
    }

    /// Set the external EEPROM start address.
    #[must_use]
    pub fn with_start_mem_addr(mut self, start_mem_addr: u16) -> Self {
        self.start_mem_addr = start_mem_addr;
        self
    }

    /// Set the number of extra attempts per command.
    #[must_use]
    pub fn with_repeat(mut self, repeat: u8) -> Self {
        self.repeat = repeat;
        self
    }

    /// Allow writing internal EEPROM data.
    #[must_use]
    pub fn with_upload_eeprom_data(mut self, allow: bool) -> Self {
        self.upload_eeprom_data = allow;
        self
    }

    /// Allow writing external EEPROM data.
    #[must_use]
    pub fn with_upload_eeeprom_data(mut self, allow: bool) -> Self {
        self.upload_eeeprom_data = allow;
        self
    }

    /// Check every field; fails with [`Error::InvalidRequest`].
    pub fn validate(&self) -> Result<()> {
        if self.file_name.is_empty() {
            return Err(Error::InvalidRequest("Missing fileName.".into()));
        }
        if !(MIN_START_MEM_ADDR..=MAX_START_MEM_ADDR).contains(&self.start_mem_addr) {
            return Err(Error::InvalidRequest(format!(
                "Incorrect startMemAddr: {}. startMemAddr should be between {MIN_START_MEM_ADDR} and {MAX_START_MEM_ADDR}.",
                self.start_mem_addr
            )));
        }
        if self.device_addr > u16::from(MAX_ADDRESS) && !self.is_broadcast() {
            return Err(Error::InvalidRequest(format!(
                "Incorrect deviceAddr: {}.",
                self.device_addr
            )));
        }
        Ok(())
    }

    /// Whether the request targets every node.
    pub fn is_broadcast(&self) -> bool {
        self.device_addr == u16::from(BROADCAST_ADDRESS)
    }

    /// Attempts per command (`repeat + 1`, with `repeat` clamped).
    pub fn attempts(&self) -> u32 {
        u32::from(self.repeat.min(MAX_REPEAT)) + 1
    }

    /// Target address as sent in requests.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn nadr(&self) -> u8 {
        // Validated to 0..=239 or 255.
        self.device_addr as u8
    }
}
