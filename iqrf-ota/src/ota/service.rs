//! Request processing: file preparation, device checks and the three phases.

use log::{debug, info, warn};
use std::{
    collections::BTreeMap,
    fs,
    path::PathBuf,
    thread,
    time::Duration,
};

use crate::{
    compat::{self, ModuleInfo},
    error::{Error, Result},
    image::{
        ChunkLayout, CodeBlock, ContentType, HexImageParser, ImageParser, ParsedImage,
        PluginImageParser, PreparedData,
    },
    ota::{LoadingAction, OtaRequest, UploadResult},
    protocol::{
        COORDINATOR_ADDRESS, DpaRequest, DpaResponse, FrcResponseTime, FrcResult,
        HWPID_DO_NOT_CHECK, LoadCode, NodeSet, cmd,
        dpa::MAX_WRITE_DATA,
        frc::{self, MAX_MEMORY_READ_4B_NODES, command},
        nodes::MAX_NODES_PER_ROUND,
        pnum,
    },
    transport::{Transaction, Transport, with_retry},
};

/// Pause after each batch so the node can finish two EEPROM page writes.
pub const BATCH_WRITE_DELAY: Duration = Duration::from_millis(20);

/// Response timeout of unicast verify and load.
pub const LOAD_CODE_TIMEOUT: Duration = Duration::from_secs(10);

/// Highest internal EEPROM address available to user data.
const INTERNAL_EEPROM_USER_TOP: u16 = 0xBF;

/// Internal EEPROM bytes below this address are reserved on the coordinator.
const COORDINATOR_EEPROM_BOTTOM: u16 = 0x80;

/// Highest external EEPROM address.
const EXTERNAL_EEPROM_TOP: u16 = 0x3FFF;

/// RAM address of the OS-read response buffer on a node.
const OS_READ_BUFFER_ADDRESS: u16 = 0x04A0;

/// Offset of the OS version byte within the OS-read response.
const OS_VERSION_OFFSET: u16 = 4;

/// RAM address where the load-code result is left on a node.
const LOAD_CODE_RESULT_ADDRESS: [u8; 2] = [0xA0, 0x04];

/// Memory-read-4B rounds carrying more nodes than this need the extra result.
const MEMORY_READ_4B_NODES_IN_FIRST_RESULT: usize = 12;

/// Byte-per-node rounds carrying more nodes than this need the extra result.
const BYTE_NODES_IN_FIRST_RESULT: usize = 54;

/// Verification value a node reports for stored code that matches.
const VERIFY_PASSED: u8 = 2;

/// Progress of a long phase: `(phase, current, total)`.
pub type ProgressFn<'a> = dyn FnMut(&str, usize, usize) + 'a;

/// An image parsed and cut into chunks, with the EEPROM data to write.
#[derive(Debug)]
struct PreparedImage {
    content_type: ContentType,
    image: ParsedImage,
    data: PreparedData,
    eeprom_bottom: u16,
    write_eeprom: bool,
    write_eeeprom: bool,
}

/// Executes OTA requests over a [`Transport`].
///
/// ```rust,no_run
/// use iqrf_ota::ota::{LoadingAction, OtaRequest, OtaUploader};
/// # fn run<T: iqrf_ota::transport::Transport>(transport: T) {
/// let mut uploader = OtaUploader::new(transport, "/var/cache/iqrf/upload");
/// let request = OtaRequest::new(LoadingAction::Upload, "handler.hex").with_device_addr(3);
/// let result = uploader.process(&request);
/// println!("{} {}", result.status, result.status_str);
/// # }
/// ```
pub struct OtaUploader<T: Transport> {
    transport: T,
    upload_dir: PathBuf,
    batch_delay: Duration,
}

impl<T: Transport> OtaUploader<T> {
    /// Create an uploader reading image files from `upload_dir`.
    pub fn new(transport: T, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            transport,
            upload_dir: upload_dir.into(),
            batch_delay: BATCH_WRITE_DELAY,
        }
    }

    /// Override the pause after each batch write.
    #[must_use]
    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    /// Get a reference to the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the uploader and return the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Process one request. Failures are reported in the result.
    pub fn process(&mut self, request: &OtaRequest) -> UploadResult {
        self.process_with_progress(request, &mut |_, _, _| {})
    }

    /// Process one request, reporting write progress.
    pub fn process_with_progress(
        &mut self,
        request: &OtaRequest,
        progress: &mut ProgressFn<'_>,
    ) -> UploadResult {
        let mut result = UploadResult::new(request);
        let outcome = self.read_file(request).and_then(|contents| {
            self.run(request, &request.file_name, &contents, &mut result, progress)
        });
        if let Err(e) = outcome {
            warn!("{} request failed: {e}", request.action);
            result.fail(&e);
        }
        result
    }

    /// Process a request whose image is already in memory.
    ///
    /// `file_name` selects the content type by its suffix.
    pub fn process_image(
        &mut self,
        request: &OtaRequest,
        file_name: &str,
        contents: &str,
    ) -> UploadResult {
        let mut result = UploadResult::new(request);
        let outcome = request
            .validate()
            .and_then(|()| self.run(request, file_name, contents, &mut result, &mut |_, _, _| {}));
        if let Err(e) = outcome {
            warn!("{} request failed: {e}", request.action);
            result.fail(&e);
        }
        result
    }

    fn read_file(&self, request: &OtaRequest) -> Result<String> {
        request.validate()?;
        if self.upload_dir.as_os_str().is_empty() {
            return Err(Error::EmptyUploadPath);
        }
        ContentType::from_file_name(&request.file_name)?;
        let path = self.upload_dir.join(&request.file_name);
        debug!("Reading {}", path.display());
        fs::read_to_string(&path)
            .map_err(|e| Error::Image(format!("Cannot read {}: {e}", path.display())))
    }

    fn run(
        &mut self,
        request: &OtaRequest,
        file_name: &str,
        contents: &str,
        result: &mut UploadResult,
        progress: &mut ProgressFn<'_>,
    ) -> Result<()> {
        let prepared = prepare(request, file_name, contents)?;
        let _guard = self.transport.acquire_exclusive()?;
        info!(
            "{} {} ({} bytes, checksum {:#06x}) on node {}",
            request.action,
            file_name,
            prepared.data.length,
            prepared.data.checksum,
            request.device_addr
        );

        let mut session = Session {
            transport: &mut self.transport,
            request,
            result,
            attempts: request.attempts(),
            batch_delay: self.batch_delay,
            targets: NodeSet::new(),
        };
        session.execute(&prepared, progress)
    }
}

/// Parse and packetize the image and check its EEPROM content.
fn prepare(request: &OtaRequest, file_name: &str, contents: &str) -> Result<PreparedImage> {
    let content_type = ContentType::from_file_name(file_name)?;
    let image = match content_type {
        ContentType::Hex => HexImageParser::new(file_name).parse_image(contents)?,
        ContentType::Plugin => PluginImageParser::new(file_name).parse_image(contents)?,
    };
    let layout = ChunkLayout::for_target(request.is_broadcast());
    let data = PreparedData::from_image(content_type, &image, layout)?;

    let eeprom_bottom = if request.device_addr == u16::from(COORDINATOR_ADDRESS) {
        COORDINATOR_EEPROM_BOTTOM
    } else {
        0
    };
    let mut write_eeprom = false;
    let mut write_eeeprom = false;
    if request.action == LoadingAction::Upload {
        check_code_fits(request.start_mem_addr, data.total_bytes())?;
        if !image.eeprom.is_empty() {
            if !request.upload_eeprom_data {
                return Err(Error::EepromNotPermitted(
                    "Hex file contains eeprom data, uploadEepromData is false, upload stopped."
                        .into(),
                ));
            }
            check_internal_eeprom(&image.eeprom, eeprom_bottom)?;
            write_eeprom = true;
        }
        if !image.eeeprom.is_empty() {
            if !request.upload_eeeprom_data {
                return Err(Error::EepromNotPermitted(
                    "Hex file contains eeeprom data, uploadEeepromData is false, upload stopped."
                        .into(),
                ));
            }
            check_external_eeprom(&image.eeeprom, request.start_mem_addr)?;
            write_eeeprom = true;
        }
    }

    Ok(PreparedImage {
        content_type,
        image,
        data,
        eeprom_bottom,
        write_eeprom,
        write_eeeprom,
    })
}

/// The uploaded chunks must end at or below the external EEPROM top.
fn check_code_fits(start_mem_addr: u16, total: usize) -> Result<()> {
    let end = usize::from(start_mem_addr) + total;
    if end > usize::from(EXTERNAL_EEPROM_TOP) + 1 {
        return Err(Error::InvalidEepromAddress(format!(
            "Code of {total} bytes at startMemAddr 0x{start_mem_addr:x} exceeds external Eeprom top 0x{EXTERNAL_EEPROM_TOP:x}."
        )));
    }
    Ok(())
}

fn check_internal_eeprom(blocks: &[CodeBlock], bottom: u16) -> Result<()> {
    for block in blocks {
        if block.start_addr() < bottom || block.end_addr() > INTERNAL_EEPROM_USER_TOP {
            return Err(Error::InvalidEepromAddress(format!(
                "Internal Eeprom area 0x{:x}-0x{:x} is not dedicated to user.",
                block.start_addr(),
                block.end_addr()
            )));
        }
    }
    Ok(())
}

fn check_external_eeprom(blocks: &[CodeBlock], start_mem_addr: u16) -> Result<()> {
    for block in blocks {
        if block.end_addr() > EXTERNAL_EEPROM_TOP {
            return Err(Error::InvalidEepromAddress(format!(
                "External Eeprom area 0x{:x}-0x{:x} is not dedicated to user.",
                block.start_addr(),
                block.end_addr()
            )));
        }
        if (block.start_addr()..=block.end_addr()).contains(&start_mem_addr) {
            return Err(Error::InvalidEepromAddress(format!(
                "External Eeprom area 0x{:x}-0x{:x} overlaps startMemAddr address.",
                block.start_addr(),
                block.end_addr()
            )));
        }
    }
    Ok(())
}

/// State of one request inside the exclusive-access window.
struct Session<'a, T: Transport> {
    transport: &'a mut T,
    request: &'a OtaRequest,
    result: &'a mut UploadResult,
    attempts: u32,
    batch_delay: Duration,
    /// Nodes selected for broadcast verification, reused by broadcast load.
    targets: NodeSet,
}

impl<T: Transport> Session<'_, T> {
    fn execute(&mut self, prepared: &PreparedImage, progress: &mut ProgressFn<'_>) -> Result<()> {
        let devices = self.device_info()?;
        self.check_compatibility(prepared, &devices)?;

        match self.request.action {
            LoadingAction::Upload => self.upload(prepared, progress),
            LoadingAction::Verify => self.verify(prepared),
            LoadingAction::Load => {
                self.verify(prepared)?;
                self.load(prepared)
            },
        }
    }

    /// Send a request with retries, recording every attempt.
    fn send(&mut self, request: &DpaRequest, timeout: Option<Duration>) -> Result<DpaResponse> {
        let bytes = request.build();
        debug!(
            "Sending PNUM {:#04x} PCMD {:#04x} to node {}",
            request.pnum(),
            request.pcmd(),
            request.nadr()
        );
        let attempts = self.attempts;
        let Self {
            transport, result, ..
        } = self;
        with_retry(attempts, |attempt| {
            let raw = match transport.transact(&bytes, timeout) {
                Ok(raw) => raw,
                Err(e) => {
                    result.transactions.push(Transaction {
                        request: bytes.clone(),
                        response: None,
                        attempt,
                        error: Some(e.to_string()),
                    });
                    return Err(e);
                },
            };
            let parsed = DpaResponse::parse_for(request, &raw);
            result.transactions.push(Transaction {
                request: bytes.clone(),
                response: Some(raw),
                attempt,
                error: parsed.as_ref().err().map(ToString::to_string),
            });
            parsed
        })
    }

    /// Send an FRC request and check its status.
    fn frc(&mut self, request: &DpaRequest) -> Result<FrcResult> {
        let timeout = self.transport.group_response_time().frc_timeout();
        let response = self.send(request, Some(timeout))?;
        let result = FrcResult::from_response(&response)?;
        result.check_status()?;
        Ok(result)
    }

    fn frc_extra_result(&mut self) -> Result<Vec<u8>> {
        Ok(self.send(&frc::extra_result(), None)?.data)
    }

    fn set_frc_response_time(&mut self, time: FrcResponseTime) -> Result<()> {
        debug!("FRC response time {time:?}");
        self.transport.set_group_response_time(time);
        self.send(&frc::set_params(time), None)?;
        Ok(())
    }

    fn bonded_nodes(&mut self) -> Result<NodeSet> {
        let response = self.send(&DpaRequest::bonded_devices(), None)?;
        Ok(NodeSet::from_bitmap(&response.data))
    }

    fn online_nodes(&mut self) -> Result<NodeSet> {
        let timeout = self.transport.group_response_time().frc_timeout();
        let response = self.send(&frc::send(command::PING, &[0x00, 0x00]), Some(timeout))?;
        let result = FrcResult::from_response(&response)?;
        // 0xFF: no node answered at all.
        if result.status == 0xFF {
            return Ok(NodeSet::new());
        }
        result.check_status()?;
        Ok(result.nodes())
    }

    fn device_info(&mut self) -> Result<BTreeMap<u8, ModuleInfo>> {
        let mut devices = BTreeMap::new();
        if !self.request.is_broadcast() {
            let nadr = self.request.nadr();
            let response = self.send(&DpaRequest::os_read(nadr), None)?;
            let bytes = [
                response.data_byte(4)?,
                response.data_byte(5)?,
                response.data_byte(6)?,
                response.data_byte(7)?,
            ];
            devices.insert(nadr, ModuleInfo::from_os_read(bytes));
            return Ok(devices);
        }

        let bonded = self.bonded_nodes()?;
        if bonded.is_empty() {
            return Err(Error::NoDevices);
        }
        let online = self.online_nodes()?;
        if online != bonded {
            return Err(Error::DevicesOffline);
        }
        info!("Reading module information of {} node(s)", bonded.len());

        let [lo, hi] = (OS_READ_BUFFER_ADDRESS + OS_VERSION_OFFSET).to_le_bytes();
        let user_data = [0x00, 0x00, lo, hi, pnum::OS, cmd::OS_READ, 0x00];
        for group in bonded.chunks(MAX_MEMORY_READ_4B_NODES) {
            let request = frc::send_selective(command::MEMORY_READ_4B, &group, &user_data);
            let mut result = self.frc(&request)?;
            if group.len() > MEMORY_READ_4B_NODES_IN_FIRST_RESULT {
                let extra = self.frc_extra_result()?;
                result.extend(&extra);
            }
            let quads = result.selected_quads(group.len());
            if quads.len() < group.len() {
                return Err(Error::Protocol(format!(
                    "FRC returned module information for {} of {} node(s)",
                    quads.len(),
                    group.len()
                )));
            }
            for (addr, quad) in group.iter().zip(quads) {
                devices.insert(addr, ModuleInfo::from_os_read(quad));
            }
        }
        Ok(devices)
    }

    fn check_compatibility(
        &mut self,
        prepared: &PreparedImage,
        devices: &BTreeMap<u8, ModuleInfo>,
    ) -> Result<()> {
        for (addr, device) in devices {
            let compatible = compat::is_compatible(prepared.content_type, &prepared.image, device);
            debug!(
                "Node {addr}: {} OS {}.{:02} ({:04X}) {}",
                device.tr_family(),
                device.os_major,
                device.os_minor,
                device.os_build,
                if compatible { "compatible" } else { "incompatible" }
            );
            self.result.compatibility.insert(*addr, compatible);
            if !compatible {
                return Err(Error::Incompatible(
                    compat::incompatibility_message(
                        prepared.content_type,
                        self.request.is_broadcast(),
                    )
                    .into(),
                ));
            }
        }
        Ok(())
    }

    /// HWPID carried by write requests.
    fn write_hwpid(&self) -> u16 {
        if self.request.is_broadcast() {
            self.request.hwpid
        } else {
            HWPID_DO_NOT_CHECK
        }
    }

    fn load_code(&self, prepared: &PreparedImage, load: bool) -> LoadCode {
        LoadCode {
            load,
            content_type: prepared.content_type,
            address: self.request.start_mem_addr,
            length: prepared.data.length,
            checksum: prepared.data.checksum,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn upload(&mut self, prepared: &PreparedImage, progress: &mut ProgressFn<'_>) -> Result<()> {
        let nadr = self.request.nadr();
        let hwpid = self.write_hwpid();

        if prepared.write_eeprom {
            info!("Writing internal EEPROM data");
            for block in &prepared.image.eeprom {
                let mut address = block.start_addr() - prepared.eeprom_bottom;
                for piece in block.data().chunks(MAX_WRITE_DATA) {
                    // Checked against the 0xBF user top above.
                    let request = DpaRequest::eeprom_write(nadr, hwpid, address as u8, piece);
                    self.send(&request, None)?;
                    address += piece.len() as u16;
                }
            }
        }

        if prepared.write_eeeprom {
            info!("Writing external EEPROM data");
            for block in &prepared.image.eeeprom {
                let mut address = block.start_addr();
                for piece in block.data().chunks(MAX_WRITE_DATA) {
                    self.send(&DpaRequest::eeeprom_xwrite(nadr, hwpid, address, piece), None)?;
                    address += piece.len() as u16;
                }
            }
        }

        let chunks = &prepared.data.chunks;
        let total = prepared.data.total_bytes();
        let mut written = 0;
        let mut address = self.request.start_mem_addr;
        let mut index = 0;
        info!(
            "Writing {} chunk(s) to external EEPROM at {address:#06x}",
            chunks.len()
        );
        progress("Upload", 0, total);
        while index < chunks.len() {
            let pair = chunks
                .get(index..index + 2)
                .filter(|pair| pair.iter().all(|c| c.len() == 16));
            if let Some([first, second]) = pair {
                let second_address = address + first.len() as u16;
                let request = DpaRequest::batch(
                    nadr,
                    hwpid,
                    &[
                        DpaRequest::eeeprom_xwrite(nadr, hwpid, address, first),
                        DpaRequest::eeeprom_xwrite(nadr, hwpid, second_address, second),
                    ],
                );
                self.send(&request, None)?;
                address = second_address + second.len() as u16;
                written += first.len() + second.len();
                index += 2;
                thread::sleep(self.batch_delay);
            } else {
                let chunk = &chunks[index];
                self.send(&DpaRequest::eeeprom_xwrite(nadr, hwpid, address, chunk), None)?;
                address += chunk.len() as u16;
                written += chunk.len();
                index += 1;
            }
            progress("Upload", written, total);
        }

        self.result.upload_result = Some(true);
        info!("Upload complete");
        Ok(())
    }

    fn verify(&mut self, prepared: &PreparedImage) -> Result<()> {
        if !self.request.is_broadcast() {
            let nadr = self.request.nadr();
            let request = DpaRequest::load_code(nadr, &self.load_code(prepared, false));
            let response = match self.send(&request, Some(LOAD_CODE_TIMEOUT)) {
                Ok(response) => response,
                Err(e) => {
                    self.result.verify.insert(nadr, false);
                    return Err(e);
                },
            };
            let passed = response.data_byte(0)? == 1;
            info!(
                "Verification on node {nadr} {}",
                if passed { "passed" } else { "failed" }
            );
            self.result.verify.insert(nadr, passed);
            return Ok(());
        }

        let saved = self.transport.group_response_time();
        let outcome = self.verify_broadcast(prepared);
        let restored = self.set_frc_response_time(saved);
        outcome.and(restored)
    }

    fn verify_broadcast(&mut self, prepared: &PreparedImage) -> Result<()> {
        let hwpid = self.request.hwpid;
        self.targets = if hwpid == HWPID_DO_NOT_CHECK {
            self.bonded_nodes()?
        } else {
            let [lo, hi] = hwpid.to_le_bytes();
            let filter = frc::send(
                command::ACKNOWLEDGED_BROADCAST_BITS,
                &[0x05, pnum::OS, cmd::OS_READ, lo, hi],
            );
            let nodes = self.frc(&filter)?.nodes();
            if nodes.is_empty() {
                return Err(Error::NoHwpidMatch);
            }
            nodes
        };

        let time = FrcResponseTime::for_code(prepared.content_type, prepared.data.length);
        self.set_frc_response_time(time)?;

        let mut user_data = LOAD_CODE_RESULT_ADDRESS.to_vec();
        user_data.extend_from_slice(&[pnum::OS, cmd::OS_LOAD_CODE]);
        #[allow(clippy::cast_possible_truncation)]
        user_data.push(LoadCode::LEN as u8);
        user_data.extend(self.load_code(prepared, false).encode());

        let rounds = self.targets.chunks(MAX_NODES_PER_ROUND);
        info!(
            "Verifying {} node(s) in {} round(s)",
            self.targets.len(),
            rounds.len()
        );
        for round in rounds {
            let outcome = self.verify_round(&round, &user_data);
            match outcome {
                Ok(values) => {
                    for (i, addr) in round.iter().enumerate() {
                        let passed = values.get(i) == Some(&VERIFY_PASSED);
                        self.result.verify.insert(addr, passed);
                    }
                },
                Err(e) => {
                    for addr in round.iter() {
                        self.result.verify.insert(addr, false);
                    }
                    return Err(e);
                },
            }
        }
        Ok(())
    }

    fn verify_round(&mut self, round: &NodeSet, user_data: &[u8]) -> Result<Vec<u8>> {
        let request = frc::send_selective(command::MEMORY_READ_PLUS1, round, user_data);
        let mut result = self.frc(&request)?;
        if round.len() > BYTE_NODES_IN_FIRST_RESULT {
            let extra = self.frc_extra_result()?;
            result.extend(&extra);
        }
        Ok(result.selected_bytes(round.len()).to_vec())
    }

    fn load(&mut self, prepared: &PreparedImage) -> Result<()> {
        if !self.request.is_broadcast() {
            let nadr = self.request.nadr();
            if self.result.verify.get(&nadr) != Some(&true) {
                warn!("Skipping load on node {nadr}: verification failed");
                self.result.load.insert(nadr, false);
                return Ok(());
            }
            let request = DpaRequest::load_code(nadr, &self.load_code(prepared, true));
            let response = match self.send(&request, Some(LOAD_CODE_TIMEOUT)) {
                Ok(response) => response,
                Err(e) => {
                    self.result.load.insert(nadr, false);
                    return Err(e);
                },
            };
            let loaded = response.data_byte(0)? == 1;
            info!(
                "Load on node {nadr} {}",
                if loaded { "succeeded" } else { "failed" }
            );
            self.result.load.insert(nadr, loaded);
            return Ok(());
        }

        let [lo, hi] = self.request.hwpid.to_le_bytes();
        let params = self.load_code(prepared, true).encode();
        let mut user_data = Vec::with_capacity(5 + params.len());
        #[allow(clippy::cast_possible_truncation)]
        user_data.push((5 + params.len()) as u8);
        user_data.extend_from_slice(&[pnum::OS, cmd::OS_LOAD_CODE, lo, hi]);
        user_data.extend(params);

        info!("Loading code on {} node(s)", self.targets.len());
        let targets = self.targets;
        let outcome = self
            .frc(&frc::send(command::ACKNOWLEDGED_BROADCAST_BITS, &user_data))
            .and_then(|mut result| {
                if targets.len() > BYTE_NODES_IN_FIRST_RESULT {
                    let extra = self.frc_extra_result()?;
                    result.extend(&extra);
                }
                Ok(result)
            });
        match outcome {
            Ok(result) => {
                for addr in targets.iter() {
                    let verified = self.result.verify.get(&addr) == Some(&true);
                    self.result.load.insert(addr, verified && result.bit(addr));
                }
                Ok(())
            },
            Err(e) => {
                for addr in targets.iter() {
                    self.result.load.insert(addr, false);
                }
                Err(e)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        image::hex::encode_record,
        ota::StatusCode,
        protocol::BROADCAST_ADDRESS,
        transport::mock::{MockNetwork, MockNode},
    };

    const EOF: &str = ":00000001FF";

    /// D-series TR-5xD running OS 4.03.
    fn d_series() -> ModuleInfo {
        ModuleInfo {
            mcu_type: 4,
            radio_series: 0,
            os_major: 4,
            os_minor: 3,
            os_build: 0x08D7,
        }
    }

    /// G-series TR-7xG running OS 4.03.
    fn g_series() -> ModuleInfo {
        ModuleInfo {
            mcu_type: 5,
            radio_series: 2,
            ..d_series()
        }
    }

    /// Handler of `len` bytes without a compatibility header.
    fn handler_hex(len: usize) -> String {
        let code: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let mut lines: Vec<String> = code
            .chunks(16)
            .enumerate()
            .map(|(i, c)| encode_record(0x00, 0x7440 + (i * 16) as u16, c))
            .collect();
        lines.push(EOF.to_string());
        lines.join("\n")
    }

    fn with_eeprom(hex: &str, internal: &[u8], external: &[u8]) -> String {
        let mut lines: Vec<String> = Vec::new();
        if !external.is_empty() {
            // Word 0x0200 + 0x10 => byte 0x0420, every other byte is data.
            let words: Vec<u8> = external.iter().flat_map(|b| [*b, 0x00]).collect();
            lines.push(encode_record(0x00, 0x0420, &words));
        }
        if !internal.is_empty() {
            let words: Vec<u8> = internal.iter().flat_map(|b| [*b, 0x00]).collect();
            lines.push(encode_record(0x04, 0, &[0x00, 0x01]));
            // Word 0xF000 + 0x10 => byte 0x1E020.
            lines.push(encode_record(0x00, 0xE020, &words));
            lines.push(encode_record(0x04, 0, &[0x00, 0x00]));
        }
        lines.push(hex.to_string());
        lines.join("\n")
    }

    /// Plugin for TR-7xG / OS 4.03 (08D7) with `lines` data lines.
    fn plugin(lines: usize) -> String {
        let mut out = vec![
            "#$52".to_string(),
            "#$4308D7".to_string(),
            "#$2024-01-15".to_string(),
            "#$".to_string(),
            "#$".to_string(),
        ];
        out.extend((0..lines).map(|i| format!("{:02X}", i % 256).repeat(20)));
        out.join("\n")
    }

    fn new_uploader(network: MockNetwork) -> OtaUploader<MockNetwork> {
        OtaUploader::new(network, "/unused").with_batch_delay(Duration::ZERO)
    }

    fn unicast(action: LoadingAction, addr: u16) -> OtaRequest {
        OtaRequest::new(action, "handler.hex").with_device_addr(addr)
    }

    #[test]
    fn test_unicast_upload_chunk_addresses() {
        let network = MockNetwork::new(d_series()).with_node(3, MockNode::new(d_series()));
        let mut uploader = new_uploader(network);
        let result = uploader.process_image(
            &unicast(LoadingAction::Upload, 3).with_repeat(0),
            "handler.hex",
            &handler_hex(100),
        );
        assert!(result.is_ok(), "{}", result.status_str);
        assert_eq!(result.upload_result, Some(true));

        let network = uploader.transport();
        // 48 / 16+16 / 48
        let xwrites = network.sent(pnum::EEEPROM, cmd::EEEPROM_XWRITE);
        let addresses: Vec<&[u8]> = xwrites.iter().map(|r| &r.data()[..2]).collect();
        assert_eq!(addresses, vec![&[0x00, 0x03][..], &[0x50, 0x03][..]]);
        assert!(xwrites.iter().all(|r| r.hwpid() == HWPID_DO_NOT_CHECK));

        let batches = network.sent(pnum::OS, cmd::OS_BATCH);
        assert_eq!(batches.len(), 1);
        let data = batches[0].data();
        assert_eq!(&data[5..7], &[0x30, 0x03]);
        assert_eq!(&data[23 + 5..23 + 7], &[0x40, 0x03]);
    }

    #[test]
    fn test_broadcast_upload_uses_batches_and_hwpid() {
        let network = MockNetwork::new(g_series())
            .with_node(1, MockNode::new(g_series()))
            .with_node(2, MockNode::new(g_series()));
        let mut uploader = new_uploader(network);
        let request = OtaRequest::new(LoadingAction::Upload, "p.iqrf")
            .with_device_addr(255)
            .with_hwpid(0x1234);
        // 160 bytes, padded to 192 => 12 chunks of 16.
        let result = uploader.process_image(&request, "p.iqrf", &plugin(8));
        assert!(result.is_ok(), "{}", result.status_str);

        let network = uploader.transport();
        let batches = network.sent(pnum::OS, cmd::OS_BATCH);
        assert_eq!(batches.len(), 6);
        for (k, batch) in batches.iter().enumerate() {
            assert_eq!(batch.nadr(), u16::from(BROADCAST_ADDRESS));
            assert_eq!(batch.hwpid(), 0x1234);
            let address = 0x0300 + 32 * k as u16;
            assert_eq!(&batch.data()[5..7], &address.to_le_bytes());
        }
        assert!(network.sent(pnum::EEEPROM, cmd::EEEPROM_XWRITE).is_empty());
        assert_eq!(result.compatibility.len(), 2);
    }

    #[test]
    fn test_retry_succeeds_on_third_attempt() {
        let mut network = MockNetwork::new(d_series()).with_node(3, MockNode::new(d_series()));
        network.fail(pnum::OS, cmd::OS_LOAD_CODE, 2);
        let mut uploader = new_uploader(network);
        let result = uploader.process_image(
            &unicast(LoadingAction::Verify, 3).with_repeat(2),
            "handler.hex",
            &handler_hex(64),
        );
        assert!(result.is_ok(), "{}", result.status_str);
        assert_eq!(result.verify.get(&3), Some(&true));

        let attempts: Vec<u32> = result
            .transactions
            .iter()
            .filter(|t| t.request[2] == pnum::OS && t.request[3] == cmd::OS_LOAD_CODE)
            .map(|t| t.attempt)
            .collect();
        assert_eq!(attempts, vec![1, 2, 3]);
        assert_eq!(
            uploader.transport().sent(pnum::OS, cmd::OS_LOAD_CODE).len(),
            3
        );
    }

    #[test]
    fn test_retry_exhausted_fails_request() {
        let mut network = MockNetwork::new(d_series()).with_node(3, MockNode::new(d_series()));
        network.fail(pnum::OS, cmd::OS_LOAD_CODE, 10);
        let mut uploader = new_uploader(network);
        let result = uploader.process_image(
            &unicast(LoadingAction::Load, 3).with_repeat(1),
            "handler.hex",
            &handler_hex(64),
        );
        assert_eq!(result.status, StatusCode::ServiceError);
        assert!(result.status_str.contains("Timeout"));
        assert_eq!(
            uploader.transport().sent(pnum::OS, cmd::OS_LOAD_CODE).len(),
            2
        );
        assert_eq!(result.verify.get(&3), Some(&false));
        // Verification never passed, so the load phase was not reached.
        assert!(result.load.is_empty());
    }

    #[test]
    fn test_unicast_load_retry_exhausted_marks_node() {
        let mut uploader = new_uploader(
            MockNetwork::new(d_series()).with_node(3, MockNode::new(d_series())),
        );
        let request = unicast(LoadingAction::Load, 3).with_repeat(2);
        let prepared = prepare(&request, "handler.hex", &handler_hex(64)).unwrap();
        uploader.transport_mut().fail(pnum::OS, cmd::OS_LOAD_CODE, 10);
        let mut result = UploadResult::new(&request);
        result.verify.insert(3, true);
        let mut session = Session {
            transport: uploader.transport_mut(),
            request: &request,
            result: &mut result,
            attempts: request.attempts(),
            batch_delay: Duration::ZERO,
            targets: NodeSet::new(),
        };
        let err = session.load(&prepared).unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert_eq!(result.load.get(&3), Some(&false));
        assert_eq!(
            uploader.transport().sent(pnum::OS, cmd::OS_LOAD_CODE).len(),
            3
        );
    }

    #[test]
    fn test_fatal_dpa_status_is_not_retried() {
        let network = MockNetwork::new(d_series()).with_node(3, MockNode::new(d_series()));
        let mut uploader = new_uploader(network);
        let request = unicast(LoadingAction::Verify, 3).with_repeat(3);
        let mut result = UploadResult::new(&request);
        let mut session = Session {
            transport: uploader.transport_mut(),
            request: &request,
            result: &mut result,
            attempts: request.attempts(),
            batch_delay: Duration::ZERO,
            targets: NodeSet::new(),
        };
        // The simulated network answers unknown commands with ERROR_PCMD.
        let err = session
            .send(&DpaRequest::new(3, pnum::OS, 0x3F, HWPID_DO_NOT_CHECK), None)
            .unwrap_err();
        assert!(matches!(err, Error::Dpa { status: 0x02 }));
        assert_eq!(result.transactions.len(), 1);
    }

    #[test]
    fn test_incompatible_device_sends_no_verify() {
        let network = MockNetwork::new(d_series()).with_node(3, MockNode::new(g_series()));
        let mut uploader = new_uploader(network);
        let result = uploader.process_image(
            &unicast(LoadingAction::Verify, 3),
            "handler.hex",
            &handler_hex(64),
        );
        assert_eq!(result.status, StatusCode::IncompatibleDevice);
        assert_eq!(
            result.status_str,
            "Selected HEX is incompatible with target device."
        );
        assert_eq!(result.compatibility.get(&3), Some(&false));
        assert!(uploader.transport().sent(pnum::OS, cmd::OS_LOAD_CODE).is_empty());
    }

    #[test]
    fn test_broadcast_with_incompatible_node_sends_nothing() {
        let network = || {
            MockNetwork::new(g_series())
                .with_node(1, MockNode::new(g_series()))
                .with_node(2, MockNode::new(g_series()))
                .with_node(3, MockNode::new(d_series()))
        };
        for action in [LoadingAction::Upload, LoadingAction::Load] {
            let mut uploader = new_uploader(network());
            let request = OtaRequest::new(action, "p.iqrf").with_device_addr(255);
            let result = uploader.process_image(&request, "p.iqrf", &plugin(8));
            assert_eq!(result.status, StatusCode::IncompatibleDevice);
            assert_eq!(result.status.code(), 1007);
            assert_eq!(
                result.status_str,
                "Network contains device(s) incompatible with selected IQRF plugin."
            );
            let expected: BTreeMap<u8, bool> = [(1, true), (2, true), (3, false)].into();
            assert_eq!(result.compatibility, expected);
            assert!(result.verify.is_empty());
            assert!(result.load.is_empty());
            assert_ne!(result.upload_result, Some(true));

            let network = uploader.transport();
            assert!(network.sent(pnum::EEEPROM, cmd::EEEPROM_XWRITE).is_empty());
            assert!(network.sent(pnum::EEPROM, cmd::EEPROM_WRITE).is_empty());
            assert!(network.sent(pnum::OS, cmd::OS_BATCH).is_empty());
            assert!(network.sent_frc(command::MEMORY_READ_PLUS1).is_empty());
            assert!(network.sent_frc(command::ACKNOWLEDGED_BROADCAST_BITS).is_empty());
        }
    }

    #[test]
    fn test_busy_transport_is_untouched() {
        let network = MockNetwork::new(d_series()).with_node(3, MockNode::new(d_series()));
        let mut uploader = new_uploader(network);
        let held = uploader.transport().acquire_exclusive().unwrap();
        let result = uploader.process_image(
            &unicast(LoadingAction::Upload, 3),
            "handler.hex",
            &handler_hex(64),
        );
        assert_eq!(result.status, StatusCode::ExclusiveAccessError);
        assert!(uploader.transport().log.is_empty());
        drop(held);
        assert!(!uploader.transport().exclusive_lock().is_held());
    }

    #[test]
    fn test_lock_released_after_failure() {
        let network = MockNetwork::new(d_series()).with_node(3, MockNode::new(g_series()));
        let mut uploader = new_uploader(network);
        let result = uploader.process_image(
            &unicast(LoadingAction::Upload, 3),
            "handler.hex",
            &handler_hex(64),
        );
        assert!(!result.is_ok());
        assert!(!uploader.transport().exclusive_lock().is_held());
    }

    #[test]
    fn test_unicast_load_after_failed_verify_is_skipped() {
        let mut node = MockNode::new(d_series());
        node.verify_ok = false;
        let network = MockNetwork::new(d_series()).with_node(7, node);
        let mut uploader = new_uploader(network);
        let result = uploader.process_image(
            &unicast(LoadingAction::Load, 7),
            "handler.hex",
            &handler_hex(64),
        );
        assert!(result.is_ok());
        assert_eq!(result.verify.get(&7), Some(&false));
        assert_eq!(result.load.get(&7), Some(&false));
        let load_codes = uploader.transport().sent(pnum::OS, cmd::OS_LOAD_CODE);
        assert_eq!(load_codes.len(), 1);
        assert_eq!(load_codes[0].data()[0] & 0x01, 0);
        assert_eq!(uploader.transport().timeouts.last(), Some(&Some(LOAD_CODE_TIMEOUT)));
    }

    #[test]
    fn test_broadcast_verify_and_load() {
        let mut failing = MockNode::new(g_series());
        failing.verify_ok = false;
        let network = MockNetwork::new(g_series())
            .with_node(1, MockNode::new(g_series()))
            .with_node(2, failing)
            .with_node(3, MockNode::new(g_series()));
        let mut uploader = new_uploader(network);
        let request = OtaRequest::new(LoadingAction::Load, "p.iqrf").with_device_addr(255);
        let result = uploader.process_image(&request, "p.iqrf", &plugin(8));
        assert!(result.is_ok(), "{}", result.status_str);

        let expected_verify: BTreeMap<u8, bool> = [(1, true), (2, false), (3, true)].into();
        assert_eq!(result.verify, expected_verify);
        assert_eq!(result.load, expected_verify);

        let network = uploader.transport();
        let selective = network.sent_frc(command::MEMORY_READ_PLUS1);
        assert_eq!(selective.len(), 1);
        let user_data = &selective[0].data()[31..];
        assert_eq!(&user_data[..5], &[0xA0, 0x04, pnum::OS, cmd::OS_LOAD_CODE, 7]);
        // Plugin flag, verify only.
        assert_eq!(user_data[5], 0x02);

        let load = network.sent_frc(command::ACKNOWLEDGED_BROADCAST_BITS);
        assert_eq!(load.len(), 1);
        assert_eq!(&load[0].data()[1..6], &[12, pnum::OS, cmd::OS_LOAD_CODE, 0xFF, 0xFF]);
        assert_eq!(load[0].data()[6], 0x03);

        // Response window set for the plugin length, then restored.
        let params = network.sent(pnum::FRC, cmd::FRC_SET_PARAMS);
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].data(), &[FrcResponseTime::Ms2600.as_param()]);
        assert_eq!(params[1].data(), &[FrcResponseTime::Ms40.as_param()]);
        assert_eq!(network.group_response_time(), FrcResponseTime::Ms40);
    }

    #[test]
    fn test_broadcast_device_info_spans_groups() {
        let mut network = MockNetwork::new(g_series());
        for addr in 1..=20 {
            network = network.with_node(addr, MockNode::new(g_series()));
        }
        let mut uploader = new_uploader(network);
        let request = OtaRequest::new(LoadingAction::Verify, "p.iqrf").with_device_addr(255);
        let result = uploader.process_image(&request, "p.iqrf", &plugin(8));
        assert!(result.is_ok(), "{}", result.status_str);
        assert_eq!(result.compatibility.len(), 20);

        let network = uploader.transport();
        assert_eq!(network.sent_frc(command::MEMORY_READ_4B).len(), 2);
        // Only the 15-node group needs the extra result.
        assert_eq!(network.sent(pnum::FRC, cmd::FRC_EXTRA_RESULT).len(), 1);
    }

    #[test]
    fn test_broadcast_offline_and_empty_network() {
        let mut offline = MockNode::new(g_series());
        offline.online = false;
        let network = MockNetwork::new(g_series())
            .with_node(1, MockNode::new(g_series()))
            .with_node(2, offline);
        let mut uploader = new_uploader(network);
        let request = OtaRequest::new(LoadingAction::Verify, "p.iqrf").with_device_addr(255);
        let result = uploader.process_image(&request, "p.iqrf", &plugin(2));
        assert_eq!(result.status, StatusCode::DeviceOffline);

        let mut uploader = new_uploader(MockNetwork::new(g_series()));
        let result = uploader.process_image(&request, "p.iqrf", &plugin(2));
        assert_eq!(result.status, StatusCode::NoDevices);
        assert_eq!(result.status_str, "No devices in network.");
    }

    #[test]
    fn test_broadcast_hwpid_filter() {
        let mut matching = MockNode::new(g_series());
        matching.hwpid = 0x0102;
        let network = MockNetwork::new(g_series())
            .with_node(1, matching)
            .with_node(2, MockNode::new(g_series()));
        let mut uploader = new_uploader(network);
        let request = OtaRequest::new(LoadingAction::Verify, "p.iqrf")
            .with_device_addr(255)
            .with_hwpid(0x0102);
        let result = uploader.process_image(&request, "p.iqrf", &plugin(2));
        assert!(result.is_ok(), "{}", result.status_str);
        assert_eq!(result.verify.keys().copied().collect::<Vec<_>>(), vec![1]);

        let mut uploader = new_uploader(
            MockNetwork::new(g_series()).with_node(1, MockNode::new(g_series())),
        );
        let result = uploader.process_image(&request, "p.iqrf", &plugin(2));
        assert_eq!(result.status, StatusCode::NoHwpidMatch);
        // The response window is restored even after the failure.
        let params = uploader.transport().sent(pnum::FRC, cmd::FRC_SET_PARAMS);
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_broadcast_verify_round_failure_marks_nodes() {
        let mut uploader = new_uploader(
            MockNetwork::new(g_series())
                .with_node(1, MockNode::new(g_series()))
                .with_node(2, MockNode::new(g_series())),
        );
        let request = OtaRequest::new(LoadingAction::Verify, "p.iqrf").with_device_addr(255);
        let prepared = prepare(&request, "p.iqrf", &plugin(2)).unwrap();
        uploader
            .transport_mut()
            .fail(pnum::FRC, cmd::FRC_SEND_SELECTIVE, 1);
        let mut result = UploadResult::new(&request);
        let mut session = Session {
            transport: uploader.transport_mut(),
            request: &request,
            result: &mut result,
            attempts: 1,
            batch_delay: Duration::ZERO,
            targets: NodeSet::new(),
        };
        let err = session.verify(&prepared).unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        let expected: BTreeMap<u8, bool> = [(1, false), (2, false)].into();
        assert_eq!(result.verify, expected);
        assert_eq!(
            uploader.transport().group_response_time(),
            FrcResponseTime::Ms40
        );
    }

    #[test]
    fn test_eeprom_data_requires_permission() {
        let network = MockNetwork::new(d_series()).with_node(3, MockNode::new(d_series()));
        let mut uploader = new_uploader(network);
        let hex = with_eeprom(&handler_hex(64), &[1, 2, 3], &[]);
        let result =
            uploader.process_image(&unicast(LoadingAction::Upload, 3), "h.hex", &hex);
        assert_eq!(result.status, StatusCode::EepromContentNotUploaded);
        assert!(uploader.transport().log.is_empty());

        // Verify ignores EEPROM content entirely.
        let result =
            uploader.process_image(&unicast(LoadingAction::Verify, 3), "h.hex", &hex);
        assert!(result.is_ok(), "{}", result.status_str);
    }

    #[test]
    fn test_eeprom_data_is_written() {
        let network = MockNetwork::new(d_series()).with_node(3, MockNode::new(d_series()));
        let mut uploader = new_uploader(network);
        let hex = with_eeprom(&handler_hex(64), &[1, 2, 3], &[4, 5]);
        let request = unicast(LoadingAction::Upload, 3)
            .with_upload_eeprom_data(true)
            .with_upload_eeeprom_data(true);
        let result = uploader.process_image(&request, "h.hex", &hex);
        assert!(result.is_ok(), "{}", result.status_str);

        let network = uploader.transport();
        let eeprom = network.sent(pnum::EEPROM, cmd::EEPROM_WRITE);
        assert_eq!(eeprom.len(), 1);
        assert_eq!(eeprom[0].data(), &[0x10, 1, 2, 3]);
        let first_xwrite = network.sent(pnum::EEEPROM, cmd::EEEPROM_XWRITE)[0];
        assert_eq!(first_xwrite.data(), &[0x10, 0x00, 4, 5]);
    }

    #[test]
    fn test_eeprom_address_checks() {
        // Coordinator reserves internal EEPROM below 0x80.
        let hex = with_eeprom(&handler_hex(64), &[1, 2, 3], &[]);
        let request = unicast(LoadingAction::Upload, 0).with_upload_eeprom_data(true);
        let err = prepare(&request, "h.hex", &hex).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Internal Eeprom area 0x10-0x12 is not dedicated to user."
        );
        let ok = prepare(&unicast(LoadingAction::Upload, 5).with_upload_eeprom_data(true), "h.hex", &hex);
        assert!(ok.is_ok());

        let hex = with_eeprom(&handler_hex(64), &[], &[4, 5]);
        let request = unicast(LoadingAction::Upload, 5)
            .with_upload_eeeprom_data(true)
            .with_start_mem_addr(0x0300);
        assert!(prepare(&request, "h.hex", &hex).is_ok());
        let blocks = [CodeBlock::new(vec![0; 0x20], 0x0300).unwrap()];
        let err = check_external_eeprom(&blocks, 0x0310).unwrap_err();
        assert_eq!(
            err.to_string(),
            "External Eeprom area 0x300-0x31f overlaps startMemAddr address."
        );
        assert_eq!(err.status_code(), StatusCode::InvalidEepromAddress);
    }

    #[test]
    fn test_code_must_fit_below_external_eeprom_top() {
        let hex = handler_hex(64);
        let request = unicast(LoadingAction::Upload, 3).with_start_mem_addr(0x3FC0);
        assert!(prepare(&request, "h.hex", &hex).is_ok());

        let request = unicast(LoadingAction::Upload, 3).with_start_mem_addr(0x3FD0);
        let err = prepare(&request, "h.hex", &hex).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidEepromAddress);
        assert!(err.to_string().contains("exceeds external Eeprom top"));

        let mut uploader = new_uploader(
            MockNetwork::new(d_series()).with_node(3, MockNode::new(d_series())),
        );
        let result = uploader.process_image(
            &unicast(LoadingAction::Upload, 3).with_start_mem_addr(0x3FFF),
            "h.hex",
            &handler_hex(100),
        );
        assert_eq!(result.status, StatusCode::InvalidEepromAddress);
        assert!(uploader.transport().log.is_empty());
    }

    #[test]
    fn test_file_errors() {
        let mut uploader = new_uploader(MockNetwork::new(d_series()));
        let request = unicast(LoadingAction::Upload, 3);
        let result = uploader.process_image(&request, "handler", &handler_hex(64));
        assert_eq!(result.status, StatusCode::UploadFileProcessingError);
        assert_eq!(result.status_str, "File has no suffix.");

        let result = uploader.process_image(&request, "h.hex", EOF);
        assert_eq!(result.status, StatusCode::UploadFileProcessingError);
        assert!(result.status_str.contains("Custom DPA handler"));
        assert!(uploader.transport().log.is_empty());
    }

    #[test]
    fn test_process_reads_upload_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("handler.hex"), handler_hex(64)).unwrap();
        let network = MockNetwork::new(d_series()).with_node(3, MockNode::new(d_series()));
        let mut uploader = OtaUploader::new(network, dir.path()).with_batch_delay(Duration::ZERO);

        let mut reported = Vec::new();
        let result = uploader.process_with_progress(
            &unicast(LoadingAction::Upload, 3),
            &mut |phase, current, total| reported.push((phase.to_string(), current, total)),
        );
        assert!(result.is_ok(), "{}", result.status_str);
        assert_eq!(reported.first(), Some(&("Upload".to_string(), 0, 128)));
        assert_eq!(reported.last(), Some(&("Upload".to_string(), 128, 128)));

        let missing = uploader.process(&OtaRequest::new(LoadingAction::Upload, "other.hex"));
        assert_eq!(missing.status, StatusCode::UploadFileProcessingError);
    }

    #[test]
    fn test_empty_upload_dir_and_invalid_request() {
        let mut uploader = OtaUploader::new(MockNetwork::new(d_series()), "");
        let result = uploader.process(&unicast(LoadingAction::Upload, 3));
        assert_eq!(result.status, StatusCode::EmptyUploadPathError);
        assert_eq!(result.status_str, "Empty upload path.");

        let result = uploader.process(&unicast(LoadingAction::Upload, 240));
        assert_eq!(result.status, StatusCode::ParsingRequestError);
        assert!(uploader.transport().log.is_empty());
    }

    #[test]
    fn test_transport_send_retries() {
        let mut network = MockNetwork::new(d_series());
        network.fail(pnum::COORDINATOR, cmd::COORDINATOR_BONDED_DEVICES, 1);
        let request = DpaRequest::bonded_devices().build();
        assert!(network.send(&request, 2, None).is_ok());
        assert_eq!(network.log.len(), 2);
    }
}
