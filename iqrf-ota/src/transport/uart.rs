//! DPA transport over a UART-attached coordinator.

use log::{debug, trace};
use std::{
    io::ErrorKind,
    time::{Duration, Instant},
};

use crate::{
    error::{Error, Result},
    port::Port,
    protocol::{
        DpaRequest, DpaResponse, FrcResponseTime,
        dpa::RESPONSE_FLAG,
        uart::{FrameDecoder, encode_frame},
    },
    transport::{ExclusiveLock, Transport},
};

/// Response timeout used when the caller gives none.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Read chunk size.
const READ_BUF_LEN: usize = 64;

/// DPA transport over a [`Port`].
pub struct UartTransport<P: Port> {
    port: P,
    lock: ExclusiveLock,
    decoder: FrameDecoder,
    default_timeout: Duration,
    group_response_time: FrcResponseTime,
}

impl<P: Port> UartTransport<P> {
    /// Wrap an opened port.
    pub fn new(port: P) -> Self {
        Self {
            port,
            lock: ExclusiveLock::new(),
            decoder: FrameDecoder::new(),
            default_timeout: DEFAULT_TIMEOUT,
            group_response_time: FrcResponseTime::Ms40,
        }
    }

    /// Set the timeout used when a transaction specifies none.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Share an existing lock, e.g. with another handle to the same coordinator.
    #[must_use]
    pub fn with_lock(mut self, lock: ExclusiveLock) -> Self {
        self.lock = lock;
        self
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Get a mutable reference to the underlying port.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Consume the transport and return the port.
    pub fn into_port(self) -> P {
        self.port
    }

    /// Whether `packet` ends the transaction started by `request`.
    fn is_final_response(request: &DpaRequest, packet: &[u8]) -> bool {
        let Ok(response) = DpaResponse::parse(packet) else {
            return false;
        };
        if response.nadr != request.nadr() || response.pnum != request.pnum() {
            return false;
        }
        if response.is_confirmation() {
            return request.is_broadcast();
        }
        response.pcmd == request.pcmd() | RESPONSE_FLAG
    }
}

impl<P: Port> Transport for UartTransport<P> {
    fn transact(&mut self, request: &[u8], timeout: Option<Duration>) -> Result<Vec<u8>> {
        let parsed = DpaRequest::parse(request)?;
        let timeout = timeout.unwrap_or(self.default_timeout);

        self.port.clear_buffers()?;
        self.decoder.reset();
        trace!("TX {request:02X?}");
        self.port.write_all_bytes(&encode_frame(request))?;

        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; READ_BUF_LEN];
        while Instant::now() < deadline {
            let n = match self.port.read(&mut buf) {
                Ok(n) => n,
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => 0,
                Err(e) => return Err(e.into()),
            };
            for byte in &buf[..n] {
                match self.decoder.push(*byte) {
                    Some(Ok(packet)) => {
                        trace!("RX {packet:02X?}");
                        if Self::is_final_response(&parsed, &packet) {
                            return Ok(packet);
                        }
                        debug!("Skipping unrelated frame");
                    },
                    Some(Err(e)) => debug!("Dropping frame: {e}"),
                    None => {},
                }
            }
        }

        Err(Error::Timeout(format!(
            "no response from node {} within {} ms",
            parsed.nadr(),
            timeout.as_millis()
        )))
    }

    fn exclusive_lock(&self) -> &ExclusiveLock {
        &self.lock
    }

    fn group_response_time(&self) -> FrcResponseTime {
        self.group_response_time
    }

    fn set_group_response_time(&mut self, value: FrcResponseTime) {
        self.group_response_time = value;
    }
}
