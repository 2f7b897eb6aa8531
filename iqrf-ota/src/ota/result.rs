//! Outcome of one OTA request.

use std::{collections::BTreeMap, fmt};

use crate::{
    error::Error,
    ota::{LoadingAction, OtaRequest},
    transport::Transaction,
};

/// Numeric request status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// Request completed.
    Ok,
    /// Transport or protocol failure ended the request.
    ServiceError,
    /// Request field missing or out of range.
    ParsingRequestError,
    /// Exclusive access to the network is held by someone else.
    ExclusiveAccessError,
    /// Upload directory is not configured.
    EmptyUploadPathError,
    /// Image file could not be read or parsed.
    UploadFileProcessingError,
    /// EEPROM data lies outside the user area.
    InvalidEepromAddress,
    /// Image carries EEPROM data the request did not allow.
    EepromContentNotUploaded,
    /// Device or network is not compatible with the image.
    IncompatibleDevice,
    /// Network has no bonded devices.
    NoDevices,
    /// Some bonded device did not answer.
    DeviceOffline,
    /// Hardware profile filter matched no device.
    NoHwpidMatch,
}

impl StatusCode {
    /// Wire value.
    pub fn code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::ServiceError => 1000,
            Self::ParsingRequestError => 1001,
            Self::ExclusiveAccessError => 1002,
            Self::EmptyUploadPathError => 1003,
            Self::UploadFileProcessingError => 1004,
            Self::InvalidEepromAddress => 1005,
            Self::EepromContentNotUploaded => 1006,
            Self::IncompatibleDevice => 1007,
            Self::NoDevices => 1008,
            Self::DeviceOffline => 1009,
            Self::NoHwpidMatch => 1010,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Everything a caller learns about one request.
///
/// Per-node maps are keyed by node address and iterate in address order.
#[derive(Debug, Clone)]
pub struct UploadResult {
    /// Requested action.
    pub action: LoadingAction,
    /// Requested target address.
    pub device_addr: u16,
    /// Requested hardware profile ID.
    pub hwpid: u16,
    /// Final status.
    pub status: StatusCode,
    /// Final status message.
    pub status_str: String,
    /// Whether the upload phase completed (upload requests only).
    pub upload_result: Option<bool>,
    /// Verification outcome per node.
    pub verify: BTreeMap<u8, bool>,
    /// Load outcome per node.
    pub load: BTreeMap<u8, bool>,
    /// Compatibility per checked node.
    pub compatibility: BTreeMap<u8, bool>,
    /// Every transport attempt, in order.
    pub transactions: Vec<Transaction>,
}

impl UploadResult {
    /// Empty, successful result for `request`.
    pub fn new(request: &OtaRequest) -> Self {
        Self {
            action: request.action,
            device_addr: request.device_addr,
            hwpid: request.hwpid,
            status: StatusCode::Ok,
            status_str: "ok".into(),
            upload_result: (request.action == LoadingAction::Upload).then_some(false),
            verify: BTreeMap::new(),
            load: BTreeMap::new(),
            compatibility: BTreeMap::new(),
            transactions: Vec::new(),
        }
    }

    /// Record the error that ended the request.
    pub fn fail(&mut self, error: &Error) {
        self.status = error.status_code();
        self.status_str = error.to_string();
    }

    /// Whether the request completed.
    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::Ok
    }
}
