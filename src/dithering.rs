use clap::ValueEnum;
use image::{GrayImage, Luma};
use imageproc::drawing::draw_filled_circle_mut;

/// Mid-gray: values at or above are white.
pub const THRESHOLD: u8 = 128;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ImageDithering {
    #[default]
    Threshold,
    FloydSteinberg,
    Atkinson,
    Halftone,
    Bayer,
}

/// Binarizes a grayscale image with the chosen algorithm.
///
/// Every output pixel is either 0 (black) or 255 (white). Halftone may grow
/// the image to the next multiple of its 4 px cell.
pub fn binarize(mut img: GrayImage, dithering: ImageDithering) -> GrayImage {
    match dithering {
        ImageDithering::Threshold => {
            threshold(&mut img);
            img
        }
        ImageDithering::FloydSteinberg => {
            image::imageops::dither(&mut img, &image::imageops::BiLevel);
            img
        }
        ImageDithering::Atkinson => {
            atkinson_dither(&mut img);
            img
        }
        ImageDithering::Bayer => {
            bayer_dither(&mut img);
            img
        }
        ImageDithering::Halftone => {
            let mut out = halftone_dither(&img);
            threshold(&mut out);
            out
        }
    }
}

/// Hard threshold at mid-gray, in place.
pub fn threshold(img: &mut GrayImage) {
    for pixel in img.pixels_mut() {
        pixel[0] = if pixel[0] >= THRESHOLD { 255 } else { 0 };
    }
}

/// Applies Atkinson dithering to a grayscale image buffer in-place.
pub fn atkinson_dither(img: &mut GrayImage) {
    let (width, height) = img.dimensions();
    let raw: &mut [u8] = &mut **img;
    for y in 0..height {
        for x in 0..width {
            let idx = (y * width + x) as usize;
            let old_pixel = raw[idx];
            let new_pixel = if old_pixel >= THRESHOLD { 255 } else { 0 };
            raw[idx] = new_pixel;
            let error = old_pixel as i16 - new_pixel as i16;

            let update_pixel = |x: i32, y: i32, raw: &mut [u8]| {
                if x >= 0 && x < width as i32 && y >= 0 && y < height as i32 {
                    let idx = (y as u32 * width + x as u32) as usize;
                    let new_val = raw[idx] as i16 + error / 8;
                    raw[idx] = new_val.clamp(0, 255) as u8;
                }
            };

            let (x, y) = (x as i32, y as i32);
            update_pixel(x + 1, y, raw);
            update_pixel(x + 2, y, raw);
            update_pixel(x - 1, y + 1, raw);
            update_pixel(x, y + 1, raw);
            update_pixel(x + 1, y + 1, raw);
            update_pixel(x, y + 2, raw);
        }
    }
}

/// Applies Bayer dithering (4x4 matrix) to a grayscale image buffer in-place.
pub fn bayer_dither(img: &mut GrayImage) {
    const BAYER_MATRIX: [[u8; 4]; 4] =
        [[0, 8, 2, 10], [12, 4, 14, 6], [3, 11, 1, 9], [15, 7, 13, 5]];
    // matrix values are in [0, 15], spread over the 0..=255 range
    const STEP: u16 = 16;

    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let level = BAYER_MATRIX[(y % 4) as usize][(x % 4) as usize] as u16;
        let threshold = level * STEP + STEP / 2;
        pixel[0] = if pixel[0] as u16 > threshold { 255 } else { 0 };
    }
}

/// Applies halftone dithering to a grayscale image, returning a new image.
///
/// Each 4x4 block becomes a dot whose radius follows the block's darkness.
pub fn halftone_dither(img: &GrayImage) -> GrayImage {
    let (width, height) = img.dimensions();
    const SIDE: u32 = 4;
    const ALPHA: f32 = 3.0;

    let width_output = SIDE * width.div_ceil(SIDE);
    let height_output = SIDE * height.div_ceil(SIDE);
    let mut canvas = GrayImage::from_pixel(width_output, height_output, Luma([255]));

    for y in (0..height).step_by(SIDE as usize) {
        for x in (0..width).step_by(SIDE as usize) {
            let mut sum = 0.0;
            let mut n = 0;
            for dy in 0..SIDE {
                for dx in 0..SIDE {
                    if x + dx < width && y + dy < height {
                        sum += img.get_pixel(x + dx, y + dy)[0] as f32;
                        n += 1;
                    }
                }
            }
            let intensity = 1.0 - sum / n as f32 / 255.0;
            let radius = (ALPHA * intensity * SIDE as f32 / 2.0) as i32;
            if radius > 0 {
                let mut square = GrayImage::from_pixel(SIDE, SIDE, Luma([255]));
                draw_filled_circle_mut(
                    &mut square,
                    (SIDE as i32 / 2, SIDE as i32 / 2),
                    radius,
                    Luma([0]),
                );
                image::imageops::overlay(&mut canvas, &square, x as i64, y as i64);
            }
        }
    }
    canvas
}
