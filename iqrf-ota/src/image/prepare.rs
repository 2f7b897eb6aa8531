//! Checksum and packetization of the uploaded code block.
//!
//! The remote node stores code in the external EEPROM in 64-byte units and
//! assumes the `0xFF 0x34` filler pattern past the end of the real data, so
//! both the checksum and the wire chunks synthesize that pattern instead of
//! padding with zeros.
//!
//! ## Chunk layouts
//!
//! ```text
//! most effective (unicast)   | 48 | 16 | 16 | 48 | 48 | 16 | 16 | 48 | ...
//!                            |<----- 128 B ----->|<----- 128 B ----->|
//!
//! fixed 16 byte (broadcast)  | 16 | 16 | 16 | 16 | 16 | ... padded to 64 B
//! ```

use log::debug;

use crate::{
    error::{Error, Result},
    image::{CodeBlock, ContentType, ParsedImage},
};

/// Protocol write unit in bytes.
pub const BLOCK_SIZE: usize = 64;

/// Checksum seed for custom DPA handlers.
pub const HEX_CHECKSUM_SEED: u16 = 0x0001;

/// Checksum seed for IQRF plugins.
pub const PLUGIN_CHECKSUM_SEED: u16 = 0x0003;

/// Filler written past the end of real data.
pub const FILLER: [u8; 2] = [0xFF, 0x34];

/// Flash word address where a custom DPA handler starts.
pub const CUSTOM_HANDLER_ADDRESS: u16 = 0x3A20;

/// Byte address of the custom DPA handler inside a HEX image.
pub const CUSTOM_HANDLER_BYTE_ADDRESS: u16 = CUSTOM_HANDLER_ADDRESS * 2;

const MOST_EFFECTIVE_CADENCE: [usize; 4] = [48, 16, 16, 48];
const MOST_EFFECTIVE_STRIDE: usize = 128;
const FIXED_CHUNK_SIZE: usize = 16;

/// How a code block is cut into wire chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkLayout {
    /// 48/16/16/48 byte chunks per 128 bytes of source.
    MostEffective,
    /// 16 byte chunks, padded to a whole number of 64 byte units.
    Fixed16,
}

impl ChunkLayout {
    /// Layout suitable for a unicast or broadcast upload.
    pub fn for_target(broadcast: bool) -> Self {
        if broadcast {
            Self::Fixed16
        } else {
            Self::MostEffective
        }
    }
}

/// Packetized, wire-ready form of one code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedData {
    /// Chunks in upload order.
    pub chunks: Vec<Vec<u8>>,
    /// Length the remote node verifies and loads.
    pub length: u16,
    /// Checksum over `length` bytes.
    pub checksum: u16,
}

impl PreparedData {
    /// Prepare the custom DPA handler block of a HEX image.
    pub fn from_hex(flash: &[CodeBlock], layout: ChunkLayout) -> Result<Self> {
        let block = flash
            .iter()
            .find(|b| b.start_addr() == CUSTOM_HANDLER_BYTE_ADDRESS)
            .ok_or_else(|| {
                Error::Image(
                    "Selected hex file does not include Custom DPA handler section or the code does not start with clrwdt() marker."
                        .into(),
                )
            })?;
        let rounded = (block.len() + BLOCK_SIZE - 1) & !(BLOCK_SIZE - 1);
        let length = u16::try_from(rounded)
            .map_err(|_| Error::Image("Custom DPA handler is too large.".into()))?;
        Ok(Self::build(block, HEX_CHECKSUM_SEED, length, layout))
    }

    /// Prepare an IQRF plugin block.
    pub fn from_plugin(block: &CodeBlock, layout: ChunkLayout) -> Result<Self> {
        let length = u16::try_from(block.len())
            .map_err(|_| Error::Image("IQRF plugin is too large.".into()))?;
        Ok(Self::build(block, PLUGIN_CHECKSUM_SEED, length, layout))
    }

    /// Prepare whichever block a parsed image uploads.
    pub fn from_image(
        content_type: ContentType,
        image: &ParsedImage,
        layout: ChunkLayout,
    ) -> Result<Self> {
        match content_type {
            ContentType::Hex => Self::from_hex(&image.flash, layout),
            ContentType::Plugin => {
                let block = image
                    .flash
                    .first()
                    .ok_or_else(|| Error::Image("IQRF plugin contains no data.".into()))?;
                Self::from_plugin(block, layout)
            },
        }
    }

    fn build(block: &CodeBlock, seed: u16, length: u16, layout: ChunkLayout) -> Self {
        let checksum = checksum(block, seed, length);
        let chunks = match layout {
            ChunkLayout::MostEffective => most_effective_chunks(block.data()),
            ChunkLayout::Fixed16 => fixed_chunks(block.data()),
        };
        debug!(
            "Prepared {} chunk(s), length {length:#06x}, checksum {checksum:#06x}",
            chunks.len()
        );
        Self {
            chunks,
            length,
            checksum,
        }
    }

    /// Total number of bytes across all chunks.
    pub fn total_bytes(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }
}

/// One step of the one's complement Fletcher checksum.
fn checksum_step(checksum: u16, byte: u8) -> u16 {
    let mut low = (checksum & 0xFF) + u16::from(byte);
    if low & 0x100 != 0 {
        low += 1;
    }
    let mut high = (checksum >> 8) + (low & 0xFF);
    if high & 0x100 != 0 {
        high += 1;
    }
    (low & 0xFF) | ((high & 0xFF) << 8)
}

/// Checksum over `length` bytes starting at the block's first address.
///
/// Bytes past the end of the block come from [`FILLER`], starting with
/// `0xFF` at the first missing byte.
pub fn checksum(block: &CodeBlock, seed: u16, length: u16) -> u16 {
    let data = block.data();
    let filler = FILLER.iter().copied().cycle();
    data.iter()
        .copied()
        .chain(filler)
        .take(usize::from(length))
        .fold(seed, checksum_step)
}

/// Copy `size` bytes from `source[offset..]`, padding by in-chunk index parity.
fn fill_chunk(source: &[u8], offset: usize, size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| {
            source
                .get(offset + i)
                .copied()
                .unwrap_or(FILLER[i & 1])
        })
        .collect()
}

/// Cut `data` into the repeating 48/16/16/48 cadence.
pub fn most_effective_chunks(data: &[u8]) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        let mut pos = offset;
        for size in MOST_EFFECTIVE_CADENCE {
            chunks.push(fill_chunk(data, pos, size));
            pos += size;
        }
        offset += MOST_EFFECTIVE_STRIDE;
    }
    chunks
}

/// Cut `data` into 16-byte chunks and pad the set to whole 64-byte units.
pub fn fixed_chunks(data: &[u8]) -> Vec<Vec<u8>> {
    let mut chunks: Vec<Vec<u8>> = data
        .chunks(FIXED_CHUNK_SIZE)
        .enumerate()
        .map(|(i, _)| fill_chunk(data, i * FIXED_CHUNK_SIZE, FIXED_CHUNK_SIZE))
        .collect();
    while (chunks.len() * FIXED_CHUNK_SIZE) % BLOCK_SIZE != 0 {
        chunks.push(fill_chunk(&[], 0, FIXED_CHUNK_SIZE));
    }
    chunks
}
