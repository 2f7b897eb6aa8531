//! Simulated IQRF network for orchestrator tests.
//!
//! Answers DPA requests the way a coordinator and its nodes would: bonded
//! devices, OS read, EEPROM writes, batches, load code and the FRC commands
//! the uploader issues. Failures can be injected per command.

use std::{collections::BTreeMap, time::Duration};

use crate::{
    compat::ModuleInfo,
    error::{Error, Result},
    protocol::{
        BROADCAST_ADDRESS, COORDINATOR_ADDRESS, DpaRequest, FrcResponseTime, HWPID_DO_NOT_CHECK,
        NodeSet, cmd,
        dpa::{RESPONSE_FLAG, status},
        frc::{EXTRA_RESULT_LEN, FRC_DATA_LEN, command},
        nodes::BITMAP_LEN,
        pnum,
    },
    transport::{ExclusiveLock, Transport},
};

/// One simulated node.
#[derive(Debug, Clone)]
pub(crate) struct MockNode {
    pub info: ModuleInfo,
    pub hwpid: u16,
    pub online: bool,
    pub verify_ok: bool,
    pub load_ok: bool,
}

impl MockNode {
    pub fn new(info: ModuleInfo) -> Self {
        Self {
            info,
            hwpid: 0x0000,
            online: true,
            verify_ok: true,
            load_ok: true,
        }
    }
}

/// Failure injected into matching requests.
#[derive(Debug, Clone)]
struct FailRule {
    pnum: u8,
    pcmd: u8,
    remaining: u32,
    error: fn() -> Error,
}

/// In-memory network implementing [`Transport`].
#[derive(Debug)]
pub(crate) struct MockNetwork {
    pub nodes: BTreeMap<u8, MockNode>,
    /// Every attempted request, including failed attempts.
    pub log: Vec<DpaRequest>,
    /// Timeouts passed along with the logged requests.
    pub timeouts: Vec<Option<Duration>>,
    lock: ExclusiveLock,
    frc_time: FrcResponseTime,
    fail_rules: Vec<FailRule>,
    last_frc: Vec<u8>,
}

impl MockNetwork {
    /// Network with a coordinator only.
    pub fn new(coordinator: ModuleInfo) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(COORDINATOR_ADDRESS, MockNode::new(coordinator));
        Self {
            nodes,
            log: Vec::new(),
            timeouts: Vec::new(),
            lock: ExclusiveLock::new(),
            frc_time: FrcResponseTime::Ms40,
            fail_rules: Vec::new(),
            last_frc: Vec::new(),
        }
    }

    /// Add a node.
    #[must_use]
    pub fn with_node(mut self, addr: u8, node: MockNode) -> Self {
        self.nodes.insert(addr, node);
        self
    }

    /// Time out the next `times` requests with this PNUM/PCMD.
    pub fn fail(&mut self, pnum: u8, pcmd: u8, times: u32) {
        self.fail_rules.push(FailRule {
            pnum,
            pcmd,
            remaining: times,
            error: || Error::Timeout("simulated".into()),
        });
    }

    /// Answer the next `times` requests with this PNUM/PCMD with a DPA error.
    pub fn reject(&mut self, pnum: u8, pcmd: u8, times: u32) {
        self.fail_rules.push(FailRule {
            pnum,
            pcmd,
            remaining: times,
            error: || Error::Dpa {
                status: status::ERROR_FAIL,
            },
        });
    }

    /// Logged requests with this PNUM/PCMD.
    pub fn sent(&self, pnum: u8, pcmd: u8) -> Vec<&DpaRequest> {
        self.log
            .iter()
            .filter(|r| r.pnum() == pnum && r.pcmd() == pcmd)
            .collect()
    }

    /// Logged FRC requests with this FRC command.
    pub fn sent_frc(&self, frc_command: u8) -> Vec<&DpaRequest> {
        self.log
            .iter()
            .filter(|r| r.pnum() == pnum::FRC && r.data().first() == Some(&frc_command))
            .collect()
    }

    fn injected_failure(&mut self, request: &DpaRequest) -> Option<Error> {
        let rule = self.fail_rules.iter_mut().find(|r| {
            r.remaining > 0 && r.pnum == request.pnum() && r.pcmd == request.pcmd()
        })?;
        rule.remaining -= 1;
        Some((rule.error)())
    }

    fn bonded(&self) -> NodeSet {
        self.nodes
            .keys()
            .copied()
            .filter(|a| *a != COORDINATOR_ADDRESS)
            .collect()
    }

    fn node(&self, addr: u16) -> Option<&MockNode> {
        u8::try_from(addr).ok().and_then(|a| self.nodes.get(&a))
    }

    fn respond(request: &DpaRequest, data: &[u8]) -> Vec<u8> {
        let mut bytes = request.build()[..6].to_vec();
        bytes[3] |= RESPONSE_FLAG;
        bytes.extend_from_slice(&[status::NO_ERROR, 0x40]);
        bytes.extend_from_slice(data);
        bytes
    }

    fn confirm(request: &DpaRequest) -> Vec<u8> {
        let mut bytes = request.build()[..6].to_vec();
        bytes.extend_from_slice(&[status::CONFIRMATION, 0x40, 0xFF, 0x04, 0x04]);
        bytes
    }

    fn os_read_data(info: &ModuleInfo) -> Vec<u8> {
        let mut data = vec![0x01, 0x02, 0x03, 0x84];
        data.push(info.os_major << 4 | info.os_minor);
        data.push(info.radio_series << 4 | info.mcu_type);
        data.extend_from_slice(&info.os_build.to_le_bytes());
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
        data
    }

    fn frc_reply(&mut self, request: &DpaRequest, status: u8, frc: Vec<u8>) -> Vec<u8> {
        let mut pdata = Vec::with_capacity(1 + FRC_DATA_LEN);
        pdata.push(status);
        pdata.extend_from_slice(&frc[..FRC_DATA_LEN]);
        self.last_frc = frc;
        Self::respond(request, &pdata)
    }

    fn frc_send(&mut self, request: &DpaRequest) -> Vec<u8> {
        let data = request.data();
        let mut frc = vec![0u8; FRC_DATA_LEN + EXTRA_RESULT_LEN];
        let mut responded = 0u8;
        let user_data = data.get(1..).unwrap_or(&[]);
        let embedded_hwpid = match user_data {
            [_, _, _, lo, hi, ..] => u16::from_le_bytes([*lo, *hi]),
            _ => HWPID_DO_NOT_CHECK,
        };
        let embedded_pcmd = user_data.get(2).copied();
        for (addr, node) in self.nodes.iter().filter(|(a, _)| **a != COORDINATOR_ADDRESS) {
            if !node.online {
                continue;
            }
            responded += 1;
            let bit = match data[0] {
                command::PING => true,
                command::ACKNOWLEDGED_BROADCAST_BITS => {
                    let hwpid_ok =
                        embedded_hwpid == HWPID_DO_NOT_CHECK || embedded_hwpid == node.hwpid;
                    hwpid_ok
                        && (embedded_pcmd != Some(cmd::OS_LOAD_CODE) || node.load_ok)
                },
                _ => false,
            };
            if bit {
                frc[usize::from(*addr / 8)] |= 1 << (*addr % 8);
            }
        }
        self.frc_reply(request, responded, frc)
    }

    fn frc_send_selective(&mut self, request: &DpaRequest) -> Vec<u8> {
        let data = request.data();
        let selected = NodeSet::from_bitmap(&data[1..=BITMAP_LEN]);
        let mut frc = vec![0u8; FRC_DATA_LEN + EXTRA_RESULT_LEN];
        let mut responded = 0u8;
        for (i, addr) in selected.iter().enumerate() {
            let Some(node) = self.nodes.get(&addr).filter(|n| n.online) else {
                continue;
            };
            responded += 1;
            match data[0] {
                command::MEMORY_READ_PLUS1 => {
                    if let Some(slot) = frc.get_mut(1 + i) {
                        *slot = if node.verify_ok { 2 } else { 1 };
                    }
                },
                command::MEMORY_READ_4B => {
                    let os = Self::os_read_data(&node.info);
                    let base = 4 * (i + 1);
                    if let Some(slot) = frc.get_mut(base..base + 4) {
                        slot.copy_from_slice(&os[4..8]);
                    }
                },
                _ => {},
            }
        }
        self.frc_reply(request, responded, frc)
    }

    fn handle(&mut self, request: &DpaRequest) -> Result<Vec<u8>> {
        let broadcast = request.nadr() == u16::from(BROADCAST_ADDRESS);
        match (request.pnum(), request.pcmd()) {
            (pnum::COORDINATOR, cmd::COORDINATOR_BONDED_DEVICES) => {
                Ok(Self::respond(request, &self.bonded().to_bitmap()))
            },
            (pnum::OS, cmd::OS_READ) => {
                let node = self
                    .node(request.nadr())
                    .filter(|n| n.online)
                    .ok_or_else(|| Error::Timeout("node does not answer".into()))?;
                Ok(Self::respond(request, &Self::os_read_data(&node.info)))
            },
            (pnum::OS, cmd::OS_BATCH)
            | (pnum::EEPROM, cmd::EEPROM_WRITE)
            | (pnum::EEEPROM, cmd::EEEPROM_XWRITE) => {
                if broadcast {
                    return Ok(Self::confirm(request));
                }
                self.node(request.nadr())
                    .filter(|n| n.online)
                    .ok_or_else(|| Error::Timeout("node does not answer".into()))?;
                Ok(Self::respond(request, &[]))
            },
            (pnum::OS, cmd::OS_LOAD_CODE) => {
                let node = self
                    .node(request.nadr())
                    .filter(|n| n.online)
                    .ok_or_else(|| Error::Timeout("node does not answer".into()))?;
                let load = request.data().first().is_some_and(|f| f & 0x01 != 0);
                let ok = if load { node.load_ok } else { node.verify_ok };
                Ok(Self::respond(request, &[u8::from(ok)]))
            },
            (pnum::FRC, cmd::FRC_SET_PARAMS) => {
                let previous = self.frc_time.as_param();
                if let Some(param) = request.data().first() {
                    self.frc_time = FrcResponseTime::from_param(*param);
                }
                Ok(Self::respond(request, &[previous]))
            },
            (pnum::FRC, cmd::FRC_SEND) => Ok(self.frc_send(request)),
            (pnum::FRC, cmd::FRC_SEND_SELECTIVE) => Ok(self.frc_send_selective(request)),
            (pnum::FRC, cmd::FRC_EXTRA_RESULT) => {
                let extra = self.last_frc.get(FRC_DATA_LEN..).unwrap_or(&[]).to_vec();
                Ok(Self::respond(request, &extra))
            },
            _ => Err(Error::Dpa {
                status: status::ERROR_PCMD,
            }),
        }
    }
}

impl Transport for MockNetwork {
    fn transact(&mut self, request: &[u8], timeout: Option<Duration>) -> Result<Vec<u8>> {
        let parsed = DpaRequest::parse(request)?;
        self.log.push(parsed.clone());
        self.timeouts.push(timeout);
        if let Some(error) = self.injected_failure(&parsed) {
            return Err(error);
        }
        self.handle(&parsed)
    }

    fn exclusive_lock(&self) -> &ExclusiveLock {
        &self.lock
    }

    fn group_response_time(&self) -> FrcResponseTime {
        self.frc_time
    }

    fn set_group_response_time(&mut self, value: FrcResponseTime) {
        self.frc_time = value;
    }
}
