//! Code image parsing and preparation.
//!
//! Two file formats are supported:
//!
//! - **Intel HEX** (`.hex`): a custom DPA handler build, optionally carrying a
//!   compatibility header record and data for the internal/external EEPROM.
//! - **IQRF plugin** (`.iqrf`): a text format with four `#` header lines, a
//!   separator and fixed-width hex data lines.
//!
//! Parsing produces [`CodeBlock`]s grouped by [`MemoryRegion`]. The block
//! that is actually uploaded is turned into wire chunks by [`prepare`].
//!
//! ## Address spaces
//!
//! ```text
//!  HEX byte address      word address       region            re-based to
//!  0x0000 - 0x7FFF      0x0000 - 0x3FFF    flash (TR-7xD)     verbatim
//!  0x0000 - 0x9FFF      0x0000 - 0x4FFF    flash (PIC16LF18877) verbatim
//!  0x0400 - 0x13FF      0x0200 - 0x09FF    external EEPROM    0x0000
//!  0x1E000 - 0x1E17F    0xF000 - 0xF0BF    internal EEPROM    0x00
//! ```

pub mod hex;
pub mod plugin;
pub mod prepare;

use crate::{
    compat::{ModuleInfo, OsToken},
    error::{Error, Result},
};

pub use {
    hex::HexImageParser,
    plugin::PluginImageParser,
    prepare::{ChunkLayout, PreparedData},
};

/// Memory region a code block is destined for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum MemoryRegion {
    /// Program flash.
    Flash,
    /// Internal (on-chip) EEPROM.
    InternalEeprom,
    /// External serial EEPROM.
    ExternalEeprom,
}

/// Kind of uploaded content, selected by the file suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ContentType {
    /// Intel HEX custom DPA handler.
    Hex,
    /// IQRF plugin.
    Plugin,
}

impl ContentType {
    /// Select the content type from a file name suffix.
    pub fn from_file_name(file_name: &str) -> Result<Self> {
        let suffix = match file_name.rfind('.') {
            Some(pos) if pos + 1 < file_name.len() => &file_name[pos + 1..],
            _ => return Err(Error::Image("File has no suffix.".into())),
        };
        match suffix {
            "hex" => Ok(Self::Hex),
            "iqrf" => Ok(Self::Plugin),
            _ => Err(Error::Image("File is not a HEX or IQRF file.".into())),
        }
    }

    /// Human readable name used in messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Hex => "HEX",
            Self::Plugin => "IQRF plugin",
        }
    }
}

/// A contiguous run of bytes at a target memory address.
///
/// `end_addr == start_addr + data.len() - 1` always holds; blocks are never
/// empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    data: Vec<u8>,
    start_addr: u16,
    end_addr: u16,
}

impl CodeBlock {
    /// Create a block starting at `start_addr`.
    ///
    /// Returns `None` for empty data or when the block would run past 0xFFFF.
    pub fn new(data: Vec<u8>, start_addr: u16) -> Option<Self> {
        let len = u16::try_from(data.len()).ok()?;
        let end_addr = start_addr.checked_add(len.checked_sub(1)?)?;
        Some(Self {
            data,
            start_addr,
            end_addr,
        })
    }

    /// Block content.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// First address covered by the block.
    pub fn start_addr(&self) -> u16 {
        self.start_addr
    }

    /// Last address covered by the block.
    pub fn end_addr(&self) -> u16 {
        self.end_addr
    }

    /// Number of bytes in the block.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always `false`; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether the two blocks touch without overlapping.
    pub fn is_adjacent(&self, other: &Self) -> bool {
        u32::from(self.end_addr) + 1 == u32::from(other.start_addr)
            || u32::from(other.end_addr) + 1 == u32::from(self.start_addr)
    }

    /// Merge with an adjacent block, keeping address order.
    pub fn merge(&self, other: &Self) -> Option<Self> {
        let (low, high) = if u32::from(self.end_addr) + 1 == u32::from(other.start_addr) {
            (self, other)
        } else if u32::from(other.end_addr) + 1 == u32::from(self.start_addr) {
            (other, self)
        } else {
            return None;
        };
        let mut data = Vec::with_capacity(low.len() + high.len());
        data.extend_from_slice(&low.data);
        data.extend_from_slice(&high.data);
        Some(Self {
            data,
            start_addr: low.start_addr,
            end_addr: high.end_addr,
        })
    }
}

/// Append `block` to `blocks`, merging it with any adjacent block.
pub fn add_code_block(blocks: &mut Vec<CodeBlock>, block: CodeBlock) {
    let mut block = block;
    while let Some((pos, merged)) = blocks
        .iter()
        .enumerate()
        .find_map(|(i, b)| b.merge(&block).map(|m| (i, m)))
    {
        blocks.remove(pos);
        block = merged;
    }
    blocks.push(block);
}

/// Parsed content of an image file.
#[derive(Debug, Clone, Default)]
pub struct ParsedImage {
    /// Flash blocks.
    pub flash: Vec<CodeBlock>,
    /// Internal EEPROM blocks, re-based to 0.
    pub eeprom: Vec<CodeBlock>,
    /// External EEPROM blocks, re-based to 0.
    pub eeeprom: Vec<CodeBlock>,
    /// Compatibility header. `radio_series` holds the TR family code.
    pub header: Option<ModuleInfo>,
    /// OS compatibility tokens (plugins only).
    pub os_tokens: Vec<OsToken>,
}

impl ParsedImage {
    /// Blocks for one memory region.
    pub fn blocks(&self, region: MemoryRegion) -> &[CodeBlock] {
        match region {
            MemoryRegion::Flash => &self.flash,
            MemoryRegion::InternalEeprom => &self.eeprom,
            MemoryRegion::ExternalEeprom => &self.eeeprom,
        }
    }
}

/// Common interface of the two image parsers.
pub trait ImageParser {
    /// Parse the whole file.
    fn parse_image(&self, contents: &str) -> Result<ParsedImage>;

    /// Parse the file and return the blocks of one region.
    fn parse(&self, contents: &str, region: MemoryRegion) -> Result<Vec<CodeBlock>> {
        let image = self.parse_image(contents)?;
        Ok(image.blocks(region).to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(start: u16, data: &[u8]) -> CodeBlock {
        CodeBlock::new(data.to_vec(), start).unwrap()
    }

    #[test]
    fn test_code_block_end_addr() {
        let b = block(0x100, &[1, 2, 3]);
        assert_eq!(b.end_addr(), 0x102);
        assert!(CodeBlock::new(Vec::new(), 0).is_none());
        assert!(CodeBlock::new(vec![0; 2], 0xFFFF).is_none());
    }

    #[test]
    fn test_merge_is_order_independent() {
        let a = block(0x10, &[1, 2]);
        let b = block(0x12, &[3, 4, 5]);
        let ab = a.merge(&b).unwrap();
        let ba = b.merge(&a).unwrap();
        assert_eq!(ab, ba);
        assert_eq!(ab.data(), &[1, 2, 3, 4, 5]);
        assert_eq!(
            usize::from(ab.end_addr() - ab.start_addr()) + 1,
            ab.data().len()
        );
    }

    #[test]
    fn test_merge_rejects_gap() {
        let a = block(0x10, &[1]);
        let b = block(0x12, &[2]);
        assert!(!a.is_adjacent(&b));
        assert!(a.merge(&b).is_none());
    }

    #[test]
    fn test_add_code_block_bridges_gap() {
        let mut blocks = Vec::new();
        add_code_block(&mut blocks, block(0x00, &[1, 2]));
        add_code_block(&mut blocks, block(0x04, &[5, 6]));
        assert_eq!(blocks.len(), 2);
        add_code_block(&mut blocks, block(0x02, &[3, 4]));
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].data(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(blocks[0].start_addr(), 0);
    }

    #[test]
    fn test_content_type_from_suffix() {
        assert_eq!(ContentType::from_file_name("a.hex").unwrap(), ContentType::Hex);
        assert_eq!(
            ContentType::from_file_name("dir.v1/plugin.iqrf").unwrap(),
            ContentType::Plugin
        );
        assert_eq!(
            ContentType::from_file_name("noext").unwrap_err().to_string(),
            "File has no suffix."
        );
        assert_eq!(
            ContentType::from_file_name("trailing.").unwrap_err().to_string(),
            "File has no suffix."
        );
        assert_eq!(
            ContentType::from_file_name("a.bin").unwrap_err().to_string(),
            "File is not a HEX or IQRF file."
        );
    }
}
