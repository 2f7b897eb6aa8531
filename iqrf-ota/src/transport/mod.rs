//! Transport abstraction for DPA transactions.
//!
//! A [`Transport`] carries one encoded DPA request to the network and returns
//! the matching response. It is a single half-duplex channel: callers take
//! the [`ExclusiveLock`] for the whole multi-command operation so no other
//! user of the same transport can interleave requests.
//!
//! ```text
//! +-------------------+
//! |   OTA uploader    |   with_retry(attempts, ..)
//! +---------+---------+
//!           |
//!           v
//! +---------+---------+
//! |  Transport trait  |   transact(request) -> response
//! +---------+---------+
//!           |
//!           v
//! +---------+---------+
//! |  UartTransport<P> |   0x7E framing, CRC-8
//! +---------+---------+
//!           |
//!           v
//! +---------+---------+
//! |    Port trait     |
//! +-------------------+
//! ```

pub mod uart;

#[cfg(test)]
pub(crate) mod mock;

use log::warn;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use crate::{
    error::{Error, Result},
    protocol::FrcResponseTime,
};

pub use uart::UartTransport;

/// Channel that executes DPA transactions.
pub trait Transport {
    /// Send one request and wait for its response, without retrying.
    ///
    /// `timeout` overrides the transport's default response timeout.
    fn transact(&mut self, request: &[u8], timeout: Option<Duration>) -> Result<Vec<u8>>;

    /// Lock guarding exclusive use of the channel.
    fn exclusive_lock(&self) -> &ExclusiveLock;

    /// FRC response window the transport currently waits for.
    fn group_response_time(&self) -> FrcResponseTime;

    /// Change the FRC response window the transport waits for.
    fn set_group_response_time(&mut self, value: FrcResponseTime);

    /// Take exclusive access; fails immediately with [`Error::Busy`] if held.
    fn acquire_exclusive(&self) -> Result<ExclusiveGuard> {
        self.exclusive_lock().try_acquire()
    }

    /// Send a request, attempting it up to `max_attempts` times.
    fn send(
        &mut self,
        request: &[u8],
        max_attempts: u32,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>> {
        with_retry(max_attempts, |_| self.transact(request, timeout))
    }
}

/// Run `operation` up to `attempts` times (at least once).
///
/// Retrying stops at the first success or at the first error that is not
/// [retryable](Error::is_retryable). The closure receives the 1-based
/// attempt number.
pub fn with_retry<R, F>(attempts: u32, mut operation: F) -> Result<R>
where
    F: FnMut(u32) -> Result<R>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation(attempt) {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < attempts => {
                warn!("Command failed (attempt {attempt}/{attempts}): {e}");
                attempt += 1;
            },
            Err(e) => return Err(e),
        }
    }
}

/// One attempt of one request, as recorded for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Transaction {
    /// Encoded request.
    pub request: Vec<u8>,
    /// Encoded response, if one arrived.
    pub response: Option<Vec<u8>>,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Failure of this attempt.
    pub error: Option<String>,
}

impl Transaction {
    /// Whether the attempt produced a valid response.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// In-process lock shared by all handles of one transport.
#[derive(Debug, Clone, Default)]
pub struct ExclusiveLock {
    held: Arc<AtomicBool>,
}

impl ExclusiveLock {
    /// New, unheld lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock or fail with [`Error::Busy`].
    pub fn try_acquire(&self) -> Result<ExclusiveGuard> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::Busy)?;
        Ok(ExclusiveGuard {
            held: Arc::clone(&self.held),
        })
    }

    /// Whether someone currently holds the lock.
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Proof of exclusive access; released on drop.
#[derive(Debug)]
pub struct ExclusiveGuard {
    held: Arc<AtomicBool>,
}

impl ExclusiveGuard {
    /// Release the lock explicitly.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ExclusiveGuard {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}
