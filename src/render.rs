//! Image rendering pipeline.
//!
//! Turns a pixel buffer into the frame sequence of one print:
//! scale to the print head, binarize, center, pack one DrawBitmap per row,
//! bracketed by the setup and finish commands.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};
use tracing::debug;

use crate::commands::{self, DEFAULT_QUALITY, DrawMode, IMAGE_PRINT_SPEED, Lattice};
use crate::config::{BitOrder, JobConfig, PRINTER_WIDTH};
use crate::dithering::binarize;
use crate::error::{PrintError, PrintResult};
use crate::protocol::Frame;

/// Blank-feed line counts that follow the image through scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedLines {
    pub header: u32,
    pub trailer: u32,
}

impl FeedLines {
    fn scaled(self, ratio: f64) -> Self {
        Self {
            header: (self.header as f64 * ratio) as u32,
            trailer: (self.trailer as f64 * ratio) as u32,
        }
    }
}

/// Output of [`render_image`].
#[derive(Debug, Clone)]
pub struct Rendered {
    pub frames: Vec<Frame>,
    /// Trailing feed lines after scale-feed adjustment.
    pub feed_lines: u32,
}

/// Scales `img` towards the print width.
///
/// Wider images shrink to exactly [`PRINTER_WIDTH`]; images narrower than
/// half of it grow by the largest whole factor that still fits, with
/// nearest-neighbour sampling so hard edges stay hard. With `scale_feed`
/// the feed counts follow the same ratio, rounded down.
pub fn fit_to_width(img: GrayImage, feed: FeedLines, scale_feed: bool) -> (GrayImage, FeedLines) {
    let (width, height) = img.dimensions();
    let mut feed = feed;

    if width > PRINTER_WIDTH {
        let ratio = PRINTER_WIDTH as f64 / width as f64;
        let new_height = ((height as f64 * ratio) as u32).max(1);
        if scale_feed {
            feed = feed.scaled(ratio);
        }
        debug!(width, height, new_height, "downscaling");
        return (
            imageops::resize(&img, PRINTER_WIDTH, new_height, FilterType::Triangle),
            feed,
        );
    }

    if width < PRINTER_WIDTH / 2 {
        let factor = PRINTER_WIDTH / width;
        if scale_feed {
            feed = feed.scaled(factor as f64);
        }
        debug!(width, height, factor, "upscaling");
        return (
            imageops::resize(&img, width * factor, height * factor, FilterType::Nearest),
            feed,
        );
    }

    (img, feed)
}

/// Pads with white on both sides up to [`PRINTER_WIDTH`].
pub fn center_pad(img: GrayImage) -> GrayImage {
    if img.width() >= PRINTER_WIDTH {
        return img;
    }
    let pad = (PRINTER_WIDTH - img.width()) / 2;
    let mut canvas = GrayImage::from_pixel(PRINTER_WIDTH, img.height(), Luma([255]));
    imageops::replace(&mut canvas, &img, pad as i64, 0);
    canvas
}

/// Packs one row of pixels (0 = black) into bytes, 8 pixels per byte.
///
/// Polarity is inverted: a black pixel sets its bit. A partial last byte is
/// zero-filled.
pub fn pack_row(row: &[u8], order: BitOrder) -> Vec<u8> {
    row.chunks(8)
        .map(|group| {
            group.iter().enumerate().fold(0u8, |byte, (i, &px)| {
                if px >= 128 {
                    return byte;
                }
                match order {
                    BitOrder::MsbFirst => byte | (0x80 >> i),
                    BitOrder::LsbFirst => byte | (1 << i),
                }
            })
        })
        .collect()
}

/// Runs the whole pipeline on a decoded image.
pub fn render_image(img: &DynamicImage, config: &JobConfig) -> PrintResult<Rendered> {
    render_gray(img.to_luma8(), config)
}

/// Runs the whole pipeline on a grayscale buffer.
pub fn render_gray(img: GrayImage, config: &JobConfig) -> PrintResult<Rendered> {
    if img.width() == 0 || img.height() == 0 {
        return Err(PrintError::Decode("image has no pixels".into()));
    }

    let feed = FeedLines {
        header: config.header_lines,
        trailer: config.feed_lines,
    };
    let (img, feed) = fit_to_width(img, feed, config.scale_feed);
    let img = center_pad(binarize(img, config.dithering));

    let mut frames = vec![
        commands::set_quality(DEFAULT_QUALITY)?,
        commands::control_lattice(Lattice::Start),
        commands::set_energy(commands::energy_for(config.contrast))?,
        commands::drawing_mode(DrawMode::Image),
        commands::other_feed_paper(IMAGE_PRINT_SPEED),
    ];
    if feed.header > 0 {
        frames.extend(commands::feed_command_sequence(feed.header));
    }
    for row in img.rows() {
        let pixels: Vec<u8> = row.map(|p| p[0]).collect();
        frames.push(commands::draw_bitmap(&pack_row(&pixels, config.bit_order))?);
    }
    frames.push(commands::control_lattice(Lattice::Finish));

    debug!(
        rows = img.height(),
        frames = frames.len(),
        feed_lines = feed.trailer,
        "image rendered"
    );
    Ok(Rendered {
        frames,
        feed_lines: feed.trailer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;
    use pretty_assertions::assert_eq;

    /// Inverse of `pack_row`: 0 for set bits, 255 for clear ones.
    fn unpack_row(bytes: &[u8], width: usize, order: BitOrder) -> Vec<u8> {
        (0..width)
            .map(|x| {
                let byte = bytes[x / 8];
                let mask = match order {
                    BitOrder::MsbFirst => 0x80 >> (x % 8),
                    BitOrder::LsbFirst => 1 << (x % 8),
                };
                if byte & mask != 0 { 0 } else { 255 }
            })
            .collect()
    }

    fn feed(header: u32, trailer: u32) -> FeedLines {
        FeedLines { header, trailer }
    }

    #[test]
    fn test_pack_polarity() {
        assert_eq!(pack_row(&[0; 16], BitOrder::MsbFirst), vec![0xFF, 0xFF]);
        assert_eq!(pack_row(&[255; 16], BitOrder::MsbFirst), vec![0x00, 0x00]);
    }

    #[test]
    fn test_pack_bit_order() {
        let mut row = [255u8; 8];
        row[0] = 0;
        assert_eq!(pack_row(&row, BitOrder::MsbFirst), vec![0x80]);
        assert_eq!(pack_row(&row, BitOrder::LsbFirst), vec![0x01]);
        // partial trailing byte
        assert_eq!(pack_row(&[0, 0, 0], BitOrder::MsbFirst), vec![0xE0]);
    }

    #[test]
    fn test_pack_unpack_recovers_pattern() {
        let row: Vec<u8> = (0..24).map(|x| if x % 3 == 0 { 0 } else { 255 }).collect();
        for order in [BitOrder::MsbFirst, BitOrder::LsbFirst] {
            let packed = pack_row(&row, order);
            assert_eq!(packed.len(), 3);
            assert_eq!(unpack_row(&packed, row.len(), order), row);
        }
    }

    #[test]
    fn test_downscale_halves_width_and_feed() {
        let img = GrayImage::from_pixel(768, 100, Luma([0]));
        let (out, f) = fit_to_width(img, feed(10, 56), true);
        assert_eq!(out.dimensions(), (384, 50));
        assert_eq!(f, feed(5, 28));
    }

    #[test]
    fn test_downscale_without_scale_feed_keeps_counts() {
        let img = GrayImage::from_pixel(768, 100, Luma([0]));
        let (_, f) = fit_to_width(img, feed(10, 55), false);
        assert_eq!(f, feed(10, 55));
    }

    #[test]
    fn test_upscale_integer_nearest() {
        let img = GrayImage::from_fn(100, 4, |x, _| Luma([if x % 2 == 0 { 0 } else { 255 }]));
        let (out, f) = fit_to_width(img, feed(1, 55), true);
        assert_eq!(out.dimensions(), (300, 12));
        assert_eq!(f, feed(3, 165));
        assert!(out.pixels().all(|p| p[0] == 0 || p[0] == 255));
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(2, 0)[0], 0);
        assert_eq!(out.get_pixel(3, 0)[0], 255);
    }

    #[test]
    fn test_mid_width_is_left_alone() {
        let img = GrayImage::from_pixel(200, 3, Luma([0]));
        let (out, _) = fit_to_width(img, feed(0, 0), true);
        assert_eq!(out.dimensions(), (200, 3));
    }

    #[test]
    fn test_center_pad() {
        let img = GrayImage::from_pixel(300, 2, Luma([0]));
        let out = center_pad(img);
        assert_eq!(out.width(), PRINTER_WIDTH);
        assert_eq!(out.get_pixel(41, 0)[0], 255);
        assert_eq!(out.get_pixel(42, 0)[0], 0);
        assert_eq!(out.get_pixel(341, 0)[0], 0);
        assert_eq!(out.get_pixel(342, 0)[0], 255);
    }

    #[test]
    fn test_white_row_renders_to_zero_bitmap() {
        let img = GrayImage::from_pixel(PRINTER_WIDTH, 1, Luma([255]));
        let rendered = render_gray(img, &JobConfig::default()).unwrap();
        let cmds: Vec<u8> = rendered.frames.iter().map(|f| f.command()).collect();
        assert_eq!(
            cmds,
            vec![
                Command::SetQuality.opcode(),
                Command::ControlLattice.opcode(),
                Command::SetEnergy.opcode(),
                Command::DrawingMode.opcode(),
                Command::OtherFeedPaper.opcode(),
                Command::DrawBitmap.opcode(),
                Command::ControlLattice.opcode(),
            ]
        );
        assert_eq!(rendered.frames[5].payload(), &[0u8; 48][..]);
        assert_eq!(rendered.feed_lines, 55);
    }

    #[test]
    fn test_header_feed_goes_before_rows() {
        let config = JobConfig {
            header_lines: 300,
            ..JobConfig::default()
        };
        let img = GrayImage::from_pixel(PRINTER_WIDTH, 2, Luma([0]));
        let rendered = render_gray(img, &config).unwrap();
        let cmds: Vec<u8> = rendered.frames.iter().map(|f| f.command()).collect();
        assert_eq!(&cmds[5..8], &[0xBD, 0xA1, 0xA1]);
        assert_eq!(&cmds[8..10], &[0xA2, 0xA2]);
        assert_eq!(rendered.frames[8].payload(), &[0xFFu8; 48][..]);
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let err = render_gray(GrayImage::new(0, 0), &JobConfig::default()).unwrap_err();
        assert!(matches!(err, PrintError::Decode(_)));
    }
}
