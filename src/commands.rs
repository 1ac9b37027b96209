//! Command catalog for GB01/MX06 printers.
//!
//! Every builder returns a ready [`Frame`]. Multi-byte values are
//! little-endian.

use crate::config::Contrast;
use crate::error::{PrintError, PrintResult};
use crate::protocol::{Frame, build_frame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Steps to go back
    RetractPaper = 0xA0,
    /// Steps to go forward
    FeedPaper = 0xA1,
    /// One packed scanline, 1 bit = draw
    DrawBitmap = 0xA2,
    GetDevState = 0xA3,
    /// 0x31..=0x35
    SetQuality = 0xA4,
    /// Eleven constant bytes, one set before printing and one after
    ControlLattice = 0xA6,
    GetDevInfo = 0xA8,
    /// 1..=0xFFFF
    SetEnergy = 0xAF,
    /// Device-specific speed value
    OtherFeedPaper = 0xBD,
    /// 1 for text, 0 for images
    DrawingMode = 0xBE,
}

impl Command {
    pub fn opcode(self) -> u8 {
        self as u8
    }
}

/// Lattice block sent before the first scanline.
pub const PRINT_LATTICE: [u8; 11] = [
    0xAA, 0x55, 0x17, 0x38, 0x44, 0x5F, 0x5F, 0x5F, 0x44, 0x38, 0x2C,
];
/// Lattice block sent after the last scanline.
pub const FINISH_LATTICE: [u8; 11] = [
    0xAA, 0x55, 0x17, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x17,
];

pub const QUALITY_MIN: u8 = 0x31;
pub const QUALITY_MAX: u8 = 0x35;
/// The vendor app always uses this for GB01.
pub const DEFAULT_QUALITY: u8 = 0x33;

/// OtherFeedPaper value while printing an image.
pub const IMAGE_PRINT_SPEED: u8 = 0x23;
/// OtherFeedPaper value before feeding blank paper.
pub const BLANK_SPEED: u8 = 0x19;

/// Largest step count sent in a single FeedPaper frame.
pub const MAX_FEED_STEP: u16 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lattice {
    Start,
    Finish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawMode {
    Image = 0,
    Text = 1,
}

fn fixed(cmd: Command, payload: &[u8]) -> Frame {
    Frame::short(cmd.opcode(), payload)
}

pub fn retract_paper(steps: u16) -> Frame {
    fixed(Command::RetractPaper, &steps.to_le_bytes())
}

pub fn feed_paper(steps: u16) -> Frame {
    fixed(Command::FeedPaper, &steps.to_le_bytes())
}

/// DrawBitmap for one packed scanline.
pub fn draw_bitmap(row: &[u8]) -> PrintResult<Frame> {
    build_frame(Command::DrawBitmap.opcode(), row)
}

pub fn get_dev_state() -> Frame {
    fixed(Command::GetDevState, &[0x00])
}

pub fn get_dev_info() -> Frame {
    fixed(Command::GetDevInfo, &[0x00])
}

pub fn set_quality(level: u8) -> PrintResult<Frame> {
    if !(QUALITY_MIN..=QUALITY_MAX).contains(&level) {
        return Err(PrintError::ProtocolViolation(format!(
            "quality {level:#04x} outside {QUALITY_MIN:#04x}..={QUALITY_MAX:#04x}"
        )));
    }
    Ok(fixed(Command::SetQuality, &[level]))
}

pub fn control_lattice(lattice: Lattice) -> Frame {
    let block = match lattice {
        Lattice::Start => &PRINT_LATTICE,
        Lattice::Finish => &FINISH_LATTICE,
    };
    fixed(Command::ControlLattice, block)
}

pub fn set_energy(energy: u16) -> PrintResult<Frame> {
    if energy == 0 {
        return Err(PrintError::ProtocolViolation(
            "energy must be in 1..=0xFFFF".into(),
        ));
    }
    Ok(fixed(Command::SetEnergy, &energy.to_le_bytes()))
}

pub fn other_feed_paper(speed: u8) -> Frame {
    fixed(Command::OtherFeedPaper, &[speed])
}

pub fn drawing_mode(mode: DrawMode) -> Frame {
    fixed(Command::DrawingMode, &[mode as u8])
}

/// Energy value for a contrast level.
pub fn energy_for(contrast: Contrast) -> u16 {
    match contrast {
        Contrast::Light => 8000,
        Contrast::Medium => 12000,
        Contrast::Dark => 17500,
    }
}

/// Blank paper feed: one speed setup frame, then FeedPaper frames of at
/// most 255 steps each.
pub fn feed_command_sequence(total_steps: u32) -> Vec<Frame> {
    let mut frames = vec![other_feed_paper(BLANK_SPEED)];
    let mut remaining = total_steps;
    while remaining > 0 {
        let step = remaining.min(MAX_FEED_STEP as u32);
        frames.push(feed_paper(step as u16));
        remaining -= step;
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn steps(frame: &Frame) -> u16 {
        u16::from_le_bytes([frame.payload()[0], frame.payload()[1]])
    }

    #[test]
    fn test_feed_sequence_splits_at_255() {
        let frames = feed_command_sequence(300);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].command(), Command::OtherFeedPaper.opcode());
        assert_eq!(frames[0].payload(), &[BLANK_SPEED]);
        assert_eq!(frames[1].command(), 0xA1);
        assert_eq!(steps(&frames[1]), 255);
        assert_eq!(steps(&frames[2]), 45);
    }

    #[test]
    fn test_feed_sequence_exact_and_zero() {
        let frames = feed_command_sequence(510);
        let total: u32 = frames[1..].iter().map(|f| steps(f) as u32).sum();
        assert_eq!(frames.len(), 3);
        assert_eq!(total, 510);

        let frames = feed_command_sequence(0);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_payload_shapes() {
        assert_eq!(feed_paper(0x0102).payload(), &[0x02, 0x01]);
        assert_eq!(retract_paper(5).command(), 0xA0);
        assert_eq!(retract_paper(5).payload(), &[5, 0]);
        assert_eq!(get_dev_state().payload(), &[0]);
        assert_eq!(get_dev_info().command(), 0xA8);
        assert_eq!(drawing_mode(DrawMode::Image).payload(), &[0]);
        assert_eq!(drawing_mode(DrawMode::Text).payload(), &[1]);
        assert_eq!(control_lattice(Lattice::Start).payload(), &PRINT_LATTICE);
        assert_eq!(control_lattice(Lattice::Finish).payload(), &FINISH_LATTICE);
        assert_eq!(set_energy(12000).unwrap().payload(), &[0xE0, 0x2E]);
    }

    #[test]
    fn test_range_checks() {
        assert!(set_quality(0x30).is_err());
        assert!(set_quality(0x36).is_err());
        assert_eq!(set_quality(0x33).unwrap().payload(), &[0x33]);
        assert!(set_energy(0).is_err());
        assert!(draw_bitmap(&[0u8; 300]).is_err());
    }

    #[test]
    fn test_energy_table() {
        assert_eq!(energy_for(Contrast::Light), 8000);
        assert_eq!(energy_for(Contrast::default()), 12000);
        assert_eq!(energy_for(Contrast::Dark), 17500);
    }
}
