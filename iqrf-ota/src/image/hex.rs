//! Intel HEX parser for custom DPA handler images.
//!
//! ## Record format
//!
//! ```text
//! :LLAAAATT[DD...]CC
//!  |  |   |  |     +-- checksum (two's complement of the byte sum)
//!  |  |   |  +-------- LL data bytes
//!  |  |   +----------- record type
//!  |  +--------------- 16-bit address, big-endian
//!  +------------------ byte count
//! ```
//!
//! Supported record types are data (`00`), end of file (`01`), extended
//! segment address (`02`) and extended linear address (`04`).

use log::{debug, trace};

use crate::{
    compat::{McuType, ModuleInfo},
    error::{Error, Result},
    image::{CodeBlock, ImageParser, MemoryRegion, ParsedImage, add_code_block},
};

/// Address of the compatibility header record. Data at this address is skipped.
pub const IDENTIFICATION_HEADER_ADDRESS: u32 = 0x0000;

/// Highest flash word address for D-series MCUs.
pub const MAIN_MEM_MAX_ADDR_D: u32 = 0x3FFF;

/// Highest flash word address for the PIC16LF18877.
pub const MAIN_MEM_MAX_ADDR_G: u32 = 0x4FFF;

/// Internal EEPROM window (word addresses).
pub const INTERNAL_EEPROM_BOTTOM: u32 = 0xF000;
/// Last word address of the internal EEPROM window.
pub const INTERNAL_EEPROM_TOP: u32 = 0xF0BF;

/// External EEPROM window (word addresses).
pub const SERIAL_EEPROM_BOTTOM: u32 = 0x0200;
/// Last word address of the external EEPROM window.
pub const SERIAL_EEPROM_TOP: u32 = 0x09FF;

const RECORD_DATA: u8 = 0x00;
const RECORD_EOF: u8 = 0x01;
const RECORD_EXT_SEGMENT: u8 = 0x02;
const RECORD_EXT_LINEAR: u8 = 0x04;

/// Shortest valid record: `:` + count + address + type + checksum.
const MIN_RECORD_LEN: usize = 11;

/// Prefix of the compatibility header record (6 data bytes at address 0).
const COMPATIBILITY_HEADER_PREFIX: &str = ":06000000";

#[derive(Debug)]
struct Record {
    line: usize,
    record_type: u8,
    address: u16,
    data: Vec<u8>,
}

/// Parser for Intel HEX custom DPA handler files.
#[derive(Debug, Clone)]
pub struct HexImageParser {
    file_name: String,
}

impl HexImageParser {
    /// Create a parser; `file_name` is only used in error messages.
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }

    fn parse_error(&self, line: usize, message: impl Into<String>) -> Error {
        Error::Parse {
            file: self.file_name.clone(),
            line,
            message: message.into(),
        }
    }

    /// Validate one trimmed line and decode it.
    fn parse_record(&self, line: usize, text: &str) -> Result<Record> {
        let Some(body) = text.strip_prefix(':') else {
            return Err(self.parse_error(line, "record does not start with ':'"));
        };
        if text.len() % 2 == 0 {
            return Err(self.parse_error(line, "record has even length"));
        }
        if text.len() < MIN_RECORD_LEN {
            return Err(self.parse_error(line, "record is too short"));
        }
        let bytes = decode_hex(body).ok_or_else(|| self.parse_error(line, "invalid hex digit"))?;

        let count = usize::from(bytes[0]);
        if bytes.len() != count + 5 {
            return Err(self.parse_error(
                line,
                format!("byte count {count} does not match record length"),
            ));
        }
        let sum = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        if sum != 0 {
            return Err(Error::Checksum {
                file: self.file_name.clone(),
                line,
            });
        }

        Ok(Record {
            line,
            record_type: bytes[3],
            address: u16::from_be_bytes([bytes[1], bytes[2]]),
            data: bytes[4..4 + count].to_vec(),
        })
    }
}

impl ImageParser for HexImageParser {
    fn parse_image(&self, contents: &str) -> Result<ParsedImage> {
        let mut records = Vec::new();
        let mut header = None;
        let mut seen_eof = false;

        for (idx, raw) in contents.lines().enumerate() {
            let text = raw.trim();
            if text.is_empty() {
                continue;
            }
            let record = self.parse_record(idx + 1, text)?;
            if text
                .get(..COMPATIBILITY_HEADER_PREFIX.len())
                .is_some_and(|p| p.eq_ignore_ascii_case(COMPATIBILITY_HEADER_PREFIX))
            {
                header = Some(parse_compatibility_header(&record.data));
            }
            match record.record_type {
                RECORD_EOF => {
                    seen_eof = true;
                    break;
                },
                RECORD_DATA | RECORD_EXT_SEGMENT | RECORD_EXT_LINEAR => records.push(record),
                other => {
                    return Err(Error::UnsupportedRecord {
                        file: self.file_name.clone(),
                        line: record.line,
                        record_type: other,
                    });
                },
            }
        }

        if !seen_eof {
            return Err(Error::MissingEndOfFile {
                file: self.file_name.clone(),
            });
        }

        let main_max = match header {
            Some(info) if info.mcu_type == McuType::Pic16lf18877 as u8 => MAIN_MEM_MAX_ADDR_G,
            _ => MAIN_MEM_MAX_ADDR_D,
        };

        let mut image = ParsedImage {
            header,
            ..ParsedImage::default()
        };
        let mut offset: u32 = 0;

        for record in &records {
            match record.record_type {
                RECORD_EXT_SEGMENT | RECORD_EXT_LINEAR => {
                    if record.data.len() < 2 {
                        return Err(self.parse_error(record.line, "address record needs 2 data bytes"));
                    }
                    let value = u32::from(u16::from_be_bytes([record.data[0], record.data[1]]));
                    offset = if record.record_type == RECORD_EXT_SEGMENT {
                        value * 16
                    } else {
                        value * 65536
                    };
                    trace!("Line {}: offset {offset:#x}", record.line);
                },
                _ => {
                    if record.data.is_empty() {
                        continue;
                    }
                    let start = offset + u32::from(record.address);
                    if start == IDENTIFICATION_HEADER_ADDRESS {
                        continue;
                    }
                    let end = u32::try_from(record.data.len() - 1)
                        .ok()
                        .and_then(|len| start.checked_add(len))
                        .ok_or_else(|| {
                            self.parse_error(record.line, "record runs past the 32-bit address space")
                        })?;
                    classify(&mut image, record, start, end, main_max);
                },
            }
        }

        debug!(
            "{}: {} flash, {} eeprom, {} eeeprom block(s)",
            self.file_name,
            image.flash.len(),
            image.eeprom.len(),
            image.eeeprom.len()
        );
        Ok(image)
    }
}

/// Place one data record into every region whose window contains it.
fn classify(image: &mut ParsedImage, record: &Record, start: u32, end: u32, main_max: u32) {
    let real_start = start >> 1;
    let real_end = end >> 1;

    if real_end <= main_max {
        if let Some(block) = u16::try_from(start)
            .ok()
            .and_then(|s| CodeBlock::new(record.data.clone(), s))
        {
            add_code_block(&mut image.flash, block);
        }
    }

    let windows = [
        (MemoryRegion::InternalEeprom, INTERNAL_EEPROM_BOTTOM, INTERNAL_EEPROM_TOP),
        (MemoryRegion::ExternalEeprom, SERIAL_EEPROM_BOTTOM, SERIAL_EEPROM_TOP),
    ];
    for (region, bottom, top) in windows {
        if real_start < bottom || real_end > top {
            continue;
        }
        // Word-to-byte compaction: the low byte of every word carries the data.
        let ee_data: Vec<u8> = record.data.iter().step_by(2).copied().collect();
        let Some(block) = u16::try_from(real_start - bottom)
            .ok()
            .and_then(|s| CodeBlock::new(ee_data, s))
        else {
            continue;
        };
        let blocks = if region == MemoryRegion::InternalEeprom {
            &mut image.eeprom
        } else {
            &mut image.eeeprom
        };
        add_code_block(blocks, block);
    }
}

/// Decode the 6-byte compatibility header: OS (decimal major*10+minor), MCU, TR family.
fn parse_compatibility_header(data: &[u8]) -> ModuleInfo {
    let os = data.first().copied().unwrap_or_default();
    ModuleInfo {
        mcu_type: data.get(1).copied().unwrap_or_default(),
        radio_series: data.get(2).copied().unwrap_or_default(),
        os_major: os / 10 % 10,
        os_minor: os % 10,
        os_build: 0,
    }
}

/// Decode pairs of hex digits; `None` on odd length or a non-hex character.
pub(crate) fn decode_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    text.as_bytes()
        .chunks(2)
        .map(|pair| {
            let s = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(s, 16).ok()
        })
        .collect()
}

/// Build an Intel HEX record line (used by tests and tooling).
#[allow(clippy::cast_possible_truncation)]
pub fn encode_record(record_type: u8, address: u16, data: &[u8]) -> String {
    use std::fmt::Write;

    let [hi, lo] = address.to_be_bytes();
    let mut bytes = vec![data.len() as u8, hi, lo, record_type];
    bytes.extend_from_slice(data);
    let sum = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    bytes.push(sum.wrapping_neg());

    let mut line = String::with_capacity(1 + bytes.len() * 2);
    line.push(':');
    for b in bytes {
        let _ = write!(line, "{b:02X}");
    }
    line
}
