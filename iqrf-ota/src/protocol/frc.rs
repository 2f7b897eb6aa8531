//! Fast Response Collection (FRC).
//!
//! One FRC request is answered by many nodes within a single radio round.
//! The coordinator returns a status byte followed by 55 bytes of collected
//! data; the remaining 9 bytes (up to 64) are fetched with the extra-result
//! command.
//!
//! ```text
//! FRC send            PData = [FRC command, user data...]
//! FRC send selective  PData = [FRC command, selected nodes (30), user data...]
//! response            PData = [status, FRC data (55)]
//! extra result        PData = [FRC data (9)]
//! ```

use std::time::Duration;

use crate::{
    error::{Error, Result},
    image::ContentType,
    protocol::{
        COORDINATOR_ADDRESS, HWPID_DO_NOT_CHECK, MAX_ADDRESS, cmd,
        dpa::{DpaRequest, DpaResponse},
        nodes::NodeSet,
        pnum,
    },
};

/// FRC data bytes returned with the send response.
pub const FRC_DATA_LEN: usize = 55;

/// FRC data bytes returned by the extra-result command.
pub const EXTRA_RESULT_LEN: usize = 9;

/// Nodes one memory-read-4B round can report.
pub const MAX_MEMORY_READ_4B_NODES: usize = 15;

/// Time the host waits on top of the FRC response window.
pub const FRC_BASE_TIMEOUT: Duration = Duration::from_secs(10);

/// FRC commands.
pub mod command {
    /// 2-bit ping.
    pub const PING: u8 = 0x00;
    /// 2-bit acknowledged broadcast.
    pub const ACKNOWLEDGED_BROADCAST_BITS: u8 = 0x02;
    /// 1-byte memory read, value incremented by one.
    pub const MEMORY_READ_PLUS1: u8 = 0x83;
    /// 4-byte memory read.
    pub const MEMORY_READ_4B: u8 = 0xFA;
}

/// FRC response window per node, encoded in the FRC parameters byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum FrcResponseTime {
    /// 40 ms.
    Ms40 = 0x00,
    /// 360 ms.
    Ms360 = 0x10,
    /// 680 ms.
    Ms680 = 0x20,
    /// 1320 ms.
    Ms1320 = 0x30,
    /// 2600 ms.
    Ms2600 = 0x40,
    /// 5160 ms.
    Ms5160 = 0x50,
    /// 10280 ms.
    Ms10280 = 0x60,
    /// 20620 ms.
    Ms20620 = 0x70,
}

impl FrcResponseTime {
    /// Decode the response-time bits of an FRC parameters byte.
    pub fn from_param(param: u8) -> Self {
        match param & 0x70 {
            0x10 => Self::Ms360,
            0x20 => Self::Ms680,
            0x30 => Self::Ms1320,
            0x40 => Self::Ms2600,
            0x50 => Self::Ms5160,
            0x60 => Self::Ms10280,
            0x70 => Self::Ms20620,
            _ => Self::Ms40,
        }
    }

    /// Parameter byte value.
    pub fn as_param(self) -> u8 {
        self as u8
    }

    /// Window length.
    pub fn as_duration(self) -> Duration {
        let ms = match self {
            Self::Ms40 => 40,
            Self::Ms360 => 360,
            Self::Ms680 => 680,
            Self::Ms1320 => 1320,
            Self::Ms2600 => 2600,
            Self::Ms5160 => 5160,
            Self::Ms10280 => 10280,
            Self::Ms20620 => 20620,
        };
        Duration::from_millis(ms)
    }

    /// Window needed to verify `length` bytes of code.
    ///
    /// Plugin verification reads more per node and uses longer tiers.
    pub fn for_code(content_type: ContentType, length: u16) -> Self {
        match content_type {
            ContentType::Hex => match length {
                l if l > 0x2700 => Self::Ms5160,
                l if l > 0x0F00 => Self::Ms2600,
                _ => Self::Ms1320,
            },
            ContentType::Plugin => match length {
                l if l > 0x3100 => Self::Ms20620,
                l if l > 0x1500 => Self::Ms10280,
                l if l > 0x0B00 => Self::Ms5160,
                _ => Self::Ms2600,
            },
        }
    }

    /// How long the host waits for an FRC round with this window.
    pub fn frc_timeout(self) -> Duration {
        FRC_BASE_TIMEOUT + self.as_duration()
    }
}

/// `FRC send` to every node.
pub fn send(frc_command: u8, user_data: &[u8]) -> DpaRequest {
    let mut pdata = Vec::with_capacity(1 + user_data.len());
    pdata.push(frc_command);
    pdata.extend_from_slice(user_data);
    DpaRequest::new(COORDINATOR_ADDRESS, pnum::FRC, cmd::FRC_SEND, HWPID_DO_NOT_CHECK)
        .with_data(pdata)
}

/// `FRC send selective` to the nodes in `selected`.
pub fn send_selective(frc_command: u8, selected: &NodeSet, user_data: &[u8]) -> DpaRequest {
    let mut pdata = Vec::with_capacity(1 + 30 + user_data.len());
    pdata.push(frc_command);
    pdata.extend_from_slice(&selected.to_bitmap());
    pdata.extend_from_slice(user_data);
    DpaRequest::new(
        COORDINATOR_ADDRESS,
        pnum::FRC,
        cmd::FRC_SEND_SELECTIVE,
        HWPID_DO_NOT_CHECK,
    )
    .with_data(pdata)
}

/// Fetch the remaining FRC data of the previous round.
pub fn extra_result() -> DpaRequest {
    DpaRequest::new(
        COORDINATOR_ADDRESS,
        pnum::FRC,
        cmd::FRC_EXTRA_RESULT,
        HWPID_DO_NOT_CHECK,
    )
}

/// Set FRC parameters; the response carries the previous value.
pub fn set_params(response_time: FrcResponseTime) -> DpaRequest {
    DpaRequest::new(
        COORDINATOR_ADDRESS,
        pnum::FRC,
        cmd::FRC_SET_PARAMS,
        HWPID_DO_NOT_CHECK,
    )
    .with_data([response_time.as_param()])
}

/// Status and data of an FRC send response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrcResult {
    /// Number of responding nodes, or an error/no-response code above 239.
    pub status: u8,
    /// Collected data; extra-result bytes are appended by the caller.
    pub data: Vec<u8>,
}

impl FrcResult {
    /// Split an FRC send response into status and data.
    pub fn from_response(response: &DpaResponse) -> Result<Self> {
        let status = response.data_byte(0)?;
        Ok(Self {
            status,
            data: response.data[1..].to_vec(),
        })
    }

    /// Fail when the status reports an FRC error.
    pub fn check_status(&self) -> Result<()> {
        if self.status > MAX_ADDRESS {
            return Err(Error::Protocol(format!(
                "FRC failed with status {:#04x}",
                self.status
            )));
        }
        Ok(())
    }

    /// Append extra-result data.
    pub fn extend(&mut self, extra: &[u8]) {
        self.data.extend_from_slice(extra);
    }

    /// Bit 0 of a 2-bit result for `addr`.
    pub fn bit(&self, addr: u8) -> bool {
        self.data
            .get(usize::from(addr / 8))
            .is_some_and(|b| b & (1 << (addr % 8)) != 0)
    }

    /// Nodes 1..=239 whose bit 0 is set.
    pub fn nodes(&self) -> NodeSet {
        (1..=MAX_ADDRESS).filter(|a| self.bit(*a)).collect()
    }

    /// Per-node bytes of a selective byte FRC, in selection order.
    ///
    /// Byte 0 is reserved, so node `i` of the selection sits at index `i + 1`.
    pub fn selected_bytes(&self, count: usize) -> &[u8] {
        let end = (1 + count).min(self.data.len());
        self.data.get(1..end).unwrap_or(&[])
    }

    /// Per-node 4-byte records of a memory-read-4B round, in selection order.
    pub fn selected_quads(&self, count: usize) -> Vec<[u8; 4]> {
        self.data
            .chunks_exact(4)
            .skip(1)
            .take(count)
            .map(|c| [c[0], c[1], c[2], c[3]])
            .collect()
    }
}
