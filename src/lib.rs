//! gb01print library: print text and images on GB01/MX06 cat printers via BLE.
//!
//! Main modules:
//! - protocol: CRC8, frame codec, notification decoding
//! - commands: command catalog and feed helpers
//! - render: image to DrawBitmap pipeline
//! - font: text wrapping and rasterization
//! - dithering: binarization algorithms
//! - job: print job composition and input loading
//! - printer: paced, flow-controlled session over a transport
//! - ble: btleplug transport and discovery
//! - pipe: named pipe for continuous mode

pub mod ble;
pub mod commands;
pub mod config;
pub mod dithering;
pub mod error;
pub mod font;
pub mod job;
pub mod pipe;
pub mod printer;
pub mod protocol;
pub mod render;

/// BLE API: discover and connect to printers
pub use ble::{BleTransport, DeviceInfo, connect, discover};
pub use config::{
    BitOrder, Contrast, DiscoveryConfig, FlowControl, JobConfig, PRINTER_WIDTH, TransportConfig,
};
pub use error::{PrintError, PrintResult};
pub use job::{JobInput, JobSequencer, PrintJob, load_input};
/// Session API
pub use printer::{PrinterSession, SessionState, StatusHandle, StatusObserver, Transport};
/// Protocol utilities (frames, checksum, status)
pub use protocol::{DeviceStatus, Frame, build_frame, crc8, serialize};
