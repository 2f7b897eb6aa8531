//! Node-selection bitmaps.
//!
//! Bit `i` of the 30-byte bitmap selects node `i` (byte `i / 8`, bit `i % 8`),
//! covering addresses 0 to 239. The same layout is used by the bonded-devices
//! response and by FRC selective commands.

use std::fmt;

use crate::protocol::MAX_ADDRESS;

/// Bitmap length in bytes.
pub const BITMAP_LEN: usize = 30;

/// Most nodes one selective FRC round can address.
pub const MAX_NODES_PER_ROUND: usize = 63;

/// A set of node addresses in `0..=239`.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeSet {
    bits: [u8; BITMAP_LEN],
}

impl NodeSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a bitmap; bytes past [`BITMAP_LEN`] are ignored.
    pub fn from_bitmap(bitmap: &[u8]) -> Self {
        let mut set = Self::new();
        let len = bitmap.len().min(BITMAP_LEN);
        set.bits[..len].copy_from_slice(&bitmap[..len]);
        set
    }

    /// Encode as a 30-byte bitmap.
    pub fn to_bitmap(&self) -> [u8; BITMAP_LEN] {
        self.bits
    }

    /// Add a node. Returns `false` for addresses above 239.
    pub fn insert(&mut self, addr: u8) -> bool {
        if addr > MAX_ADDRESS {
            return false;
        }
        self.bits[usize::from(addr / 8)] |= 1 << (addr % 8);
        true
    }

    /// Remove a node.
    pub fn remove(&mut self, addr: u8) {
        if addr <= MAX_ADDRESS {
            self.bits[usize::from(addr / 8)] &= !(1 << (addr % 8));
        }
    }

    /// Whether the node is selected.
    pub fn contains(&self, addr: u8) -> bool {
        addr <= MAX_ADDRESS && self.bits[usize::from(addr / 8)] & (1 << (addr % 8)) != 0
    }

    /// Number of selected nodes.
    pub fn len(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Whether no node is selected.
    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|b| *b == 0)
    }

    /// Selected addresses in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=MAX_ADDRESS).filter(|a| self.contains(*a))
    }

    /// Split into sets of at most `max` nodes, keeping address order.
    pub fn chunks(&self, max: usize) -> Vec<Self> {
        let max = max.max(1);
        let addresses: Vec<u8> = self.iter().collect();
        addresses
            .chunks(max)
            .map(|chunk| chunk.iter().copied().collect())
            .collect()
    }
}

impl FromIterator<u8> for NodeSet {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        let mut set = Self::new();
        for addr in iter {
            set.insert(addr);
        }
        set
    }
}

impl fmt::Debug for NodeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
