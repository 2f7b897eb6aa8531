//! IQRF plugin parser.
//!
//! ```text
//! #$52                 <- MCU code and TR family
//! #$4308D7 4408E2      <- OS tokens the plugin runs on
//! #$2024-01-15         <- date, ignored
//! #$                   <- reserved, must not be an OS header (ChangeOS plugins)
//! #$                   <- separator
//! 0123456789ABCDEF0123456789ABCDEF01234567   <- 20 bytes per line
//! ...
//! ```

use log::debug;

use crate::{
    compat::{ModuleInfo, OsToken},
    error::{Error, Result},
    image::{CodeBlock, ImageParser, ParsedImage, hex::decode_hex},
};

/// Hex digits per data line.
pub const LINE_LENGTH: usize = 40;

const HEADER_PREFIX: &str = "#$";

/// Parser for `.iqrf` plugin files.
#[derive(Debug, Clone)]
pub struct PluginImageParser {
    file_name: String,
}

impl PluginImageParser {
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
}

/// `#$` + MCU digit + TR family digit.
#[allow(clippy::cast_possible_truncation)]
fn parse_mcu_header(line: &str) -> Option<(u8, u8)> {
    let body = line.strip_prefix(HEADER_PREFIX)?;
    let mut chars = body.chars();
    let mcu = chars.next()?.to_digit(16)?;
    let family = chars.next()?.to_digit(10)?;
    if chars.next().is_some() {
        return None;
    }
    Some((mcu as u8, family as u8))
}

/// `#$` + one or more whitespace separated OS tokens.
fn parse_os_header(line: &str) -> Option<Vec<OsToken>> {
    let body = line.strip_prefix(HEADER_PREFIX)?;
    let tokens: Option<Vec<_>> = body.split_whitespace().map(OsToken::parse).collect();
    tokens.filter(|t| !t.is_empty())
}

fn is_separator(line: &str) -> bool {
    line == HEADER_PREFIX
}

impl ImageParser for PluginImageParser {
    fn parse_image(&self, contents: &str) -> Result<ParsedImage> {
        let mut image = ParsedImage::default();
        let mut header = ModuleInfo::default();
        let mut data = Vec::new();
        let mut count = 0usize;

        for (idx, raw) in contents.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            count += 1;
            let line_no = idx + 1;

            if line.starts_with('#') {
                match count {
                    1 => {
                        let (mcu, family) = parse_mcu_header(line).ok_or_else(|| {
                            self.parse_error(line_no, "invalid MCU compatibility header")
                        })?;
                        header.mcu_type = mcu;
                        header.radio_series = family;
                    },
                    2 => {
                        image.os_tokens = parse_os_header(line).ok_or_else(|| {
                            self.parse_error(line_no, "invalid OS compatibility header")
                        })?;
                    },
                    3 => {},
                    4 => {
                        if parse_os_header(line).is_some() {
                            return Err(Error::Image(
                                "Regular ChangeOS plugin cannot be uploaded via OTA upload service."
                                    .into(),
                            ));
                        }
                    },
                    _ => {
                        if !is_separator(line) {
                            return Err(Error::Image(
                                "IQRF plugins should have only 4 programming headers and separator."
                                    .into(),
                            ));
                        }
                    },
                }
                continue;
            }

            if count <= 4 {
                return Err(self.parse_error(line_no, "missing programming header"));
            }
            if count == 5 {
                return Err(self.parse_error(line_no, "missing separator"));
            }
            if line.len() != LINE_LENGTH {
                return Err(self.parse_error(
                    line_no,
                    format!("data line must have {LINE_LENGTH} hex digits"),
                ));
            }
            let bytes =
                decode_hex(line).ok_or_else(|| self.parse_error(line_no, "invalid hex digit"))?;
            data.extend_from_slice(&bytes);
        }

        if count < 5 {
            return Err(self.parse_error(count, "missing programming header"));
        }
        let block = CodeBlock::new(data, 0)
            .ok_or_else(|| Error::Image(format!("{}: plugin contains no data", self.file_name)))?;
        debug!("{}: {} byte(s) of plugin code", self.file_name, block.len());

        image.flash.push(block);
        image.header = Some(header);
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::MemoryRegion;

    const LINE: &str = "000102030405060708090A0B0C0D0E0F10111213";

    fn plugin(extra_headers: &[&str], lines: usize) -> String {
        let mut out = vec!["#$52", "#$4308D7 4408E2", "#$2024-01-15", "#$"];
        out.extend_from_slice(extra_headers);
        out.extend(std::iter::repeat_n(LINE, lines));
        out.join("\r\n")
    }

    fn parse(contents: &str) -> Result<ParsedImage> {
        PluginImageParser::new("test.iqrf").parse_image(contents)
    }

    #[test]
    fn test_parse_single_block() {
        let image = parse(&plugin(&["#$"], 3)).unwrap();
        assert_eq!(image.flash.len(), 1);
        let block = &image.flash[0];
        assert_eq!(block.start_addr(), 0);
        assert_eq!(block.end_addr(), 59);
        assert_eq!(&block.data()[..3], &[0x00, 0x01, 0x02]);

        let header = image.header.unwrap();
        assert_eq!(header.mcu_type, 5);
        assert_eq!(header.radio_series, 2);
        assert_eq!(image.os_tokens.len(), 2);
        assert_eq!(image.os_tokens[1].build, 0x08E2);
    }

    #[test]
    fn test_change_os_plugin_rejected() {
        let contents = ["#$52", "#$4308D7", "#$2024-01-15", "#$4408E2", "#$", LINE].join("\n");
        assert_eq!(
            parse(&contents).unwrap_err().to_string(),
            "Regular ChangeOS plugin cannot be uploaded via OTA upload service."
        );
    }

    #[test]
    fn test_extra_headers_rejected() {
        let err = parse(&plugin(&["#$", "#extra"], 1)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "IQRF plugins should have only 4 programming headers and separator."
        );
    }

    #[test]
    fn test_bad_data_line() {
        let mut contents = plugin(&["#$"], 1);
        contents.push_str("\n0001");
        assert!(matches!(
            parse(&contents).unwrap_err(),
            Error::Parse { line: 7, .. }
        ));
    }

    #[test]
    fn test_missing_separator_and_headers() {
        assert!(matches!(
            parse(&plugin(&[], 1)).unwrap_err(),
            Error::Parse { line: 5, .. }
        ));
        assert!(matches!(
            parse(LINE).unwrap_err(),
            Error::Parse { line: 1, .. }
        ));
        assert!(parse(&plugin(&["#$"], 0)).is_err());
    }

    #[test]
    fn test_parse_region() {
        let parser = PluginImageParser::new("p.iqrf");
        let blocks = parser
            .parse(&plugin(&["#$"], 2), MemoryRegion::Flash)
            .unwrap();
        assert_eq!(blocks[0].len(), 40);
    }
}
