//! Glyph rendering with a real font.

use pretty_assertions::assert_eq;

use gb01print::commands::Command;
use gb01print::font::{TRIM_MARGIN, TextFont, TextMeasure};
use gb01print::render::{FeedLines, fit_to_width};
use gb01print::{JobConfig, JobSequencer, PRINTER_WIDTH, PrintError};

const FONT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/DejaVuSansMono.ttf");

fn font() -> TextFont {
    TextFont::load(FONT, 30.0).unwrap()
}

fn lines(text: &[&str]) -> Vec<String> {
    text.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_renders_ink_within_print_width() {
    let img = font().render_lines(&lines(&["Hello"]), PRINTER_WIDTH).unwrap();
    assert!(img.width() > 0 && img.width() <= PRINTER_WIDTH);
    assert!(img.height() > TRIM_MARGIN);
    assert!(img.pixels().any(|p| p[0] < 128));
    // trimmed to ink on the left
    assert!((0..img.height()).any(|y| img.get_pixel(0, y)[0] < 255));
}

#[test]
fn test_blank_text_renders_nothing() {
    assert!(font().render_lines(&lines(&["   ", ""]), PRINTER_WIDTH).is_none());
}

#[test]
fn test_long_text_wraps_onto_more_rows() {
    let font = font();
    let short = font.render_lines(&lines(&["word"]), PRINTER_WIDTH).unwrap();
    let long = font
        .render_lines(&lines(&[&"word ".repeat(20)]), PRINTER_WIDTH)
        .unwrap();
    assert!(long.height() > 2 * short.height());
    assert!(long.width() <= PRINTER_WIDTH);
}

#[test]
fn test_monospace_widths_add_up() {
    let font = font();
    let one = font.text_width("a");
    assert!(one > 0.0);
    assert!((font.text_width("abc") - 3.0 * one).abs() < 0.01);
}

#[test]
fn test_text_line_job_draws_each_row() {
    let font = font();
    let canvas = font
        .render_lines(&lines(&["Hi there"]), PRINTER_WIDTH)
        .unwrap();
    let feed = FeedLines {
        header: 0,
        trailer: 0,
    };
    // narrow text is scaled up before packing
    let expected_rows = fit_to_width(canvas, feed, false).0.height() as usize;

    let sequencer = JobSequencer::new(JobConfig::default()).with_font(font);
    let job = sequencer.build_text_line("Hi there").unwrap();
    let rows = job
        .frames()
        .iter()
        .filter(|f| f.command() == Command::DrawBitmap.opcode())
        .count();
    assert_eq!(rows, expected_rows);
    assert!(
        job.frames()
            .iter()
            .filter(|f| f.command() == Command::DrawBitmap.opcode())
            .all(|f| f.payload().len() == (PRINTER_WIDTH / 8) as usize)
    );

    let blank = sequencer.build_text_line("").unwrap();
    let opcodes: Vec<u8> = blank.frames().iter().map(|f| f.command()).collect();
    assert_eq!(opcodes, vec![0xA3, 0xBD, 0xA1]);
}

#[test]
fn test_missing_font_is_a_decode_failure() {
    let err = TextFont::load("/nonexistent/font.ttf", 30.0).err().unwrap();
    assert!(matches!(err, PrintError::Decode(_)));
}
