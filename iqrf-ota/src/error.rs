//! Error types for iqrf-ota.

use std::io;
use thiserror::Error;

use crate::ota::result::StatusCode;

/// Result type for iqrf-ota operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for iqrf-ota operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Communication timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Broken UART frame (bad escape, CRC mismatch, overflow).
    #[error("Framing error: {0}")]
    Framing(String),

    /// Malformed or unexpected DPA response.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// DPA response carried a non-zero error status.
    #[error("DPA error status {status:#04x} ({})", crate::protocol::dpa::status_name(*status))]
    Dpa {
        /// Raw `ErrN` byte of the response.
        status: u8,
    },

    /// Malformed line in an image file.
    #[error("{file}:{line}: {message}")]
    Parse {
        /// File name the line belongs to.
        file: String,
        /// 1-based line number.
        line: usize,
        /// What is wrong with the line.
        message: String,
    },

    /// HEX image has no end-of-file record.
    #[error("{file}: missing end-of-file record")]
    MissingEndOfFile {
        /// File name.
        file: String,
    },

    /// HEX record type other than 00, 01, 02 or 04.
    #[error("{file}:{line}: unsupported record type {record_type:#04x}")]
    UnsupportedRecord {
        /// File name.
        file: String,
        /// 1-based line number.
        line: usize,
        /// Record type byte.
        record_type: u8,
    },

    /// HEX record checksum does not sum to zero.
    #[error("{file}:{line}: record checksum mismatch")]
    Checksum {
        /// File name.
        file: String,
        /// 1-based line number.
        line: usize,
    },

    /// Image content rejected after parsing (wrong suffix, missing handler, ChangeOS plugin).
    #[error("{0}")]
    Image(String),

    /// Request field missing or out of range.
    #[error("{0}")]
    InvalidRequest(String),

    /// Upload directory is not configured.
    #[error("Empty upload path.")]
    EmptyUploadPath,

    /// EEPROM block outside the area dedicated to user data.
    #[error("{0}")]
    InvalidEepromAddress(String),

    /// Image contains EEPROM data the request did not allow.
    #[error("{0}")]
    EepromNotPermitted(String),

    /// Target device or network is not compatible with the image.
    #[error("{0}")]
    Incompatible(String),

    /// Network has no bonded devices.
    #[error("No devices in network.")]
    NoDevices,

    /// Some bonded devices did not answer.
    #[error("One or more devices were offline during the upload process.")]
    DevicesOffline,

    /// Hardware profile filter matched nothing.
    #[error("No device in network matched specified hwpid.")]
    NoHwpidMatch,

    /// Transport is held by another caller.
    #[error("Exclusive access is already held")]
    Busy,

    /// No serial port matched.
    #[error("No serial port found")]
    DeviceNotFound,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether a command that failed with this error may be attempted again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Io(_) | Self::Timeout(_) | Self::Framing(_) | Self::Protocol(_) => true,
            #[cfg(feature = "native")]
            Self::Serial(_) => true,
            Self::Dpa { status } => !crate::protocol::dpa::is_fatal_status(*status),
            _ => false,
        }
    }

    /// Numeric status reported for a request that ended with this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::ParsingRequestError,
            Self::Busy => StatusCode::ExclusiveAccessError,
            Self::EmptyUploadPath => StatusCode::EmptyUploadPathError,
            Self::Parse { .. }
            | Self::MissingEndOfFile { .. }
            | Self::UnsupportedRecord { .. }
            | Self::Checksum { .. }
            | Self::Image(_) => StatusCode::UploadFileProcessingError,
            Self::InvalidEepromAddress(_) => StatusCode::InvalidEepromAddress,
            Self::EepromNotPermitted(_) => StatusCode::EepromContentNotUploaded,
            Self::Incompatible(_) => StatusCode::IncompatibleDevice,
            Self::NoDevices => StatusCode::NoDevices,
            Self::DevicesOffline => StatusCode::DeviceOffline,
            Self::NoHwpidMatch => StatusCode::NoHwpidMatch,
            _ => StatusCode::ServiceError,
        }
    }
}
