//! Configuration values threaded into the job sequencer and the session.
//!
//! Built once (by the CLI) and never mutated afterwards.

use std::time::Duration;

use crate::dithering::ImageDithering;

/// Print head width in dots.
pub const PRINTER_WIDTH: u32 = 384;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Contrast {
    Light,
    #[default]
    Medium,
    Dark,
}

/// Bit position of the leftmost pixel of each packed byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BitOrder {
    #[default]
    MsbFirst,
    LsbFirst,
}

/// What the send loop does when the printer reports an overrun.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlowControl {
    /// Stop sending on XOff, resume on XOn.
    #[default]
    Pause,
    /// Log the overrun and keep sending.
    ReportOnly,
}

#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Only feed blank paper, render nothing.
    pub eject_only: bool,
    /// Skip the trailing blank feed.
    pub no_eject: bool,
    pub feed_lines: u32,
    pub header_lines: u32,
    /// Scale header/feed lines along with the image.
    pub scale_feed: bool,
    pub contrast: Contrast,
    pub dithering: ImageDithering,
    pub bit_order: BitOrder,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            eject_only: false,
            no_eject: false,
            feed_lines: 55,
            header_lines: 0,
            scale_feed: false,
            contrast: Contrast::Medium,
            dithering: ImageDithering::Threshold,
            bit_order: BitOrder::MsbFirst,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Bytes per write, 0 writes a whole job at once.
    pub packet_size: usize,
    /// Pause after each packet; `None` sends as fast as possible.
    pub throttle: Option<Duration>,
    pub flow_control: FlowControl,
    /// How long to wait for XOn after XOff.
    pub overrun_timeout: Duration,
    /// Log every notification in hex.
    pub dump_notifications: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            packet_size: 60,
            throttle: Some(Duration::from_millis(10)),
            flow_control: FlowControl::Pause,
            overrun_timeout: Duration::from_secs(5),
            dump_notifications: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Trailing hex digits of the printer address, colons optional.
    pub address: Option<String>,
    pub poll_count: u32,
    pub poll_interval: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            address: None,
            poll_count: 50,
            poll_interval: Duration::from_millis(100),
        }
    }
}
