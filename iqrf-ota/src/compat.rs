//! Image/device compatibility checks.
//!
//! A device reports its MCU type, TR series and OS version/build. Images may
//! carry the same information in a header; the check compares the two.
//!
//! The TR *family* groups series that share a code base:
//!
//! | MCU          | series                 | family  |
//! |--------------|------------------------|---------|
//! | PIC16LF1938  | 0, 1, 3, 8, 9, 10      | TR-5xD  |
//! | PIC16LF1938  | 2, 4, 11, 12, 13       | TR-7xD  |
//! | PIC16LF18877 | 2, 11, 13              | TR-7xG  |
//! | PIC16LF18877 | 0, 9, 10               | TR-8xG  |

use std::fmt;

use crate::image::{ContentType, ParsedImage};

/// MCU types found in IQRF transceivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum McuType {
    /// D-series MCU.
    Pic16lf1938 = 4,
    /// G-series MCU.
    Pic16lf18877 = 5,
}

impl McuType {
    /// Map the raw MCU code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            4 => Some(Self::Pic16lf1938),
            5 => Some(Self::Pic16lf18877),
            _ => None,
        }
    }
}

/// TR family derived from MCU and series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum TrFamily {
    /// TR-5xD.
    Tr5xD,
    /// TR-7xD.
    Tr7xD,
    /// TR-7xG.
    Tr7xG,
    /// TR-8xG.
    Tr8xG,
    /// Combination not known to this library.
    Unknown,
}

impl TrFamily {
    /// Derive the family from the MCU code and TR series reported by a device.
    pub fn from_device(mcu_type: u8, series: u8) -> Self {
        match McuType::from_code(mcu_type) {
            Some(McuType::Pic16lf1938) => match series {
                0 | 1 | 3 | 8 | 9 | 10 => Self::Tr5xD,
                2 | 4 | 11 | 12 | 13 => Self::Tr7xD,
                _ => Self::Unknown,
            },
            Some(McuType::Pic16lf18877) => match series {
                2 | 11 | 13 => Self::Tr7xG,
                0 | 9 | 10 => Self::Tr8xG,
                _ => Self::Unknown,
            },
            None => Self::Unknown,
        }
    }

    /// Family code as stored in image headers.
    pub fn code(self) -> Option<u8> {
        match self {
            Self::Tr5xD => Some(0),
            Self::Tr7xD => Some(1),
            Self::Tr7xG => Some(2),
            Self::Tr8xG => Some(3),
            Self::Unknown => None,
        }
    }
}

impl fmt::Display for TrFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tr5xD => "TR-5xD",
            Self::Tr7xD => "TR-7xD",
            Self::Tr7xG => "TR-7xG",
            Self::Tr8xG => "TR-8xG",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Module identification, either reported by a device or read from an image header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ModuleInfo {
    /// MCU code.
    pub mcu_type: u8,
    /// TR series for devices; TR family code for image headers.
    pub radio_series: u8,
    /// OS major version.
    pub os_major: u8,
    /// OS minor version.
    pub os_minor: u8,
    /// OS build number.
    pub os_build: u16,
}

impl ModuleInfo {
    /// Decode the `[os version, mcu/series, build lo, build hi]` bytes of an OS read response.
    pub fn from_os_read(bytes: [u8; 4]) -> Self {
        Self {
            mcu_type: bytes[1] & 0x07,
            radio_series: bytes[1] >> 4,
            os_major: bytes[0] >> 4,
            os_minor: bytes[0] & 0x0F,
            os_build: u16::from_le_bytes([bytes[2], bytes[3]]),
        }
    }

    /// Family of a device-reported module.
    pub fn tr_family(&self) -> TrFamily {
        TrFamily::from_device(self.mcu_type, self.radio_series)
    }
}

/// One OS version/build an IQRF plugin is built for.
///
/// Written as six characters `VVBBBB`: `VV` is the decimal `major * 10 + minor`,
/// `BBBB` the build number in hex, e.g. `4308D7` for OS 4.03 build 0x08D7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct OsToken {
    /// OS major version.
    pub major: u8,
    /// OS minor version.
    pub minor: u8,
    /// OS build.
    pub build: u16,
}

impl OsToken {
    /// Parse a `VVBBBB` token.
    pub fn parse(token: &str) -> Option<Self> {
        if token.len() != 6 || !token.is_ascii() {
            return None;
        }
        let version: u8 = token[..2].parse().ok()?;
        let build = u16::from_str_radix(&token[2..], 16).ok()?;
        Some(Self {
            major: version / 10,
            minor: version % 10,
            build,
        })
    }

    /// Whether a device runs exactly this OS.
    pub fn matches(&self, device: &ModuleInfo) -> bool {
        self.major == device.os_major && self.minor == device.os_minor && self.build == device.os_build
    }
}

impl fmt::Display for OsToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02} ({:04X})", self.major, self.minor, self.build)
    }
}

fn family_matches(header_family: u8, device: &ModuleInfo) -> bool {
    device.tr_family().code() == Some(header_family)
}

/// Check a HEX image against a device.
///
/// With a header, MCU, family and OS major/minor must all match. Without one,
/// any known family except the G-series ones is accepted.
pub fn check(image: &ModuleInfo, device: &ModuleInfo, has_header: bool) -> bool {
    if has_header {
        image.mcu_type == device.mcu_type
            && family_matches(image.radio_series, device)
            && image.os_major == device.os_major
            && image.os_minor == device.os_minor
    } else {
        !matches!(
            device.tr_family(),
            TrFamily::Unknown | TrFamily::Tr7xG | TrFamily::Tr8xG
        )
    }
}

/// Check an IQRF plugin against a device.
pub fn check_plugin(image: &ModuleInfo, os_tokens: &[OsToken], device: &ModuleInfo) -> bool {
    image.mcu_type == device.mcu_type
        && family_matches(image.radio_series, device)
        && os_tokens.iter().any(|t| t.matches(device))
}

/// Check a parsed image of either kind against a device.
pub fn is_compatible(content_type: ContentType, image: &ParsedImage, device: &ModuleInfo) -> bool {
    let header = image.header.unwrap_or_default();
    match content_type {
        ContentType::Hex => check(&header, device, image.header.is_some()),
        ContentType::Plugin => check_plugin(&header, &image.os_tokens, device),
    }
}

/// Message reported when compatibility fails.
pub fn incompatibility_message(content_type: ContentType, network: bool) -> &'static str {
    match (content_type, network) {
        (ContentType::Hex, false) => "Selected HEX is incompatible with target device.",
        (ContentType::Plugin, false) => "Selected IQRF plugin is incompatible with target device.",
        (ContentType::Hex, true) => "Network contains device(s) incompatible with selected HEX.",
        (ContentType::Plugin, true) => {
            "Network contains device(s) incompatible with selected IQRF plugin."
        },
    }
}
