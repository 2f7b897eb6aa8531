//! # iqrf-ota
//!
//! Over-the-air code upload, verification and loading for IQRF networks.
//!
//! The library takes a custom DPA handler (Intel HEX) or an IQRF plugin,
//! stores it in the external EEPROM of one node, the coordinator or every
//! node of the network, and asks the nodes to verify it and load it into
//! flash. It talks DPA to the coordinator through a [`Transport`]; the
//! bundled [`UartTransport`] frames requests for a serial port.
//!
//! - [`image`]: HEX and IQRF plugin parsing, checksum and chunking
//! - [`compat`]: image/device compatibility rules
//! - [`protocol`]: DPA packets, FRC, UART framing
//! - [`transport`]: transaction channel, retries, exclusive access
//! - [`ota`]: the request processor
//!
//! ## Features
//!
//! - `native` (default): serial port support via the `serialport` crate
//! - `serde`: serialization support for result types
//!
//! ## Example
//!
//! ```rust,no_run
//! use iqrf_ota::{LoadingAction, OtaRequest, OtaUploader, UartTransport};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "native")]
//!     {
//!         let port = iqrf_ota::NativePort::open_simple("/dev/ttyACM0", 57600)?;
//!         let mut uploader = OtaUploader::new(UartTransport::new(port), "/var/cache/iqrf");
//!
//!         let request = OtaRequest::new(LoadingAction::Load, "CustomDpaHandler.hex")
//!             .with_device_addr(255)
//!             .with_repeat(2);
//!         let result = uploader.process(&request);
//!         for (addr, loaded) in &result.load {
//!             println!("node {addr}: {loaded}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compat;
pub mod device;
pub mod error;
pub mod image;
pub mod ota;
pub mod port;
pub mod protocol;
pub mod transport;

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};
pub use {
    compat::{ModuleInfo, TrFamily},
    device::{DetectedPort, DeviceKind, auto_detect_port, detect_ports},
    error::{Error, Result},
    image::{ContentType, ParsedImage, PreparedData},
    ota::{LoadingAction, OtaRequest, OtaUploader, StatusCode, UploadResult},
    port::{Port, PortEnumerator, PortInfo, SerialConfig},
    transport::{Transaction, Transport, UartTransport},
};
