//! Print job composition.

use std::path::Path;

use image::DynamicImage;
use tracing::{debug, info};

use crate::commands;
use crate::config::{JobConfig, PRINTER_WIDTH};
use crate::error::{PrintError, PrintResult};
use crate::font::TextFont;
use crate::protocol::Frame;
use crate::render;

/// What to put on paper.
#[derive(Debug, Clone)]
pub enum JobInput {
    /// Nothing; only the probe and the blank feed.
    Eject,
    Image(DynamicImage),
    /// Lines of text, wrapped to the print width.
    Text(Vec<String>),
}

/// One complete command sequence, sent as a single byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintJob {
    frames: Vec<Frame>,
}

impl PrintJob {
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Wire bytes of every frame, in order.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.frames.iter().map(Frame::wire_len).sum());
        for frame in &self.frames {
            frame.write_to(&mut out);
        }
        out
    }
}

/// Builds print jobs from inputs using a fixed [`JobConfig`].
pub struct JobSequencer {
    config: JobConfig,
    font: Option<TextFont>,
}

impl JobSequencer {
    pub fn new(config: JobConfig) -> Self {
        Self { config, font: None }
    }

    /// Font used for [`JobInput::Text`].
    pub fn with_font(mut self, font: TextFont) -> Self {
        self.font = Some(font);
        self
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Status probe, then the rendered input (unless eject-only), then the
    /// blank feed (unless no-eject).
    ///
    /// Rendering errors abort before anything is returned.
    pub fn build(&self, input: &JobInput) -> PrintResult<PrintJob> {
        let mut frames = vec![commands::get_dev_state()];
        let mut feed_lines = self.config.feed_lines;

        if !self.config.eject_only {
            let rendered = match input {
                JobInput::Eject => None,
                JobInput::Image(img) => Some(render::render_image(img, &self.config)?),
                JobInput::Text(lines) => {
                    let font = self.font.as_ref().ok_or_else(|| {
                        PrintError::Decode("text input needs a font".into())
                    })?;
                    match font.render_lines(lines, PRINTER_WIDTH) {
                        Some(canvas) => Some(render::render_gray(canvas, &self.config)?),
                        None => {
                            debug!("text rendered blank, nothing to draw");
                            None
                        }
                    }
                }
            };
            if let Some(rendered) = rendered {
                feed_lines = rendered.feed_lines;
                frames.extend(rendered.frames);
            }
        }

        if !self.config.no_eject {
            frames.extend(commands::feed_command_sequence(feed_lines));
        }

        debug!(frames = frames.len(), "job built");
        Ok(PrintJob { frames })
    }

    /// Job for one line read in continuous-pipe mode.
    pub fn build_text_line(&self, line: &str) -> PrintResult<PrintJob> {
        self.build(&JobInput::Text(vec![line.to_string()]))
    }
}

/// Reads a file to print.
///
/// Image formats are sniffed from the file contents; anything else is
/// classified by extension. `assume_text` skips detection.
pub fn load_input<P: AsRef<Path>>(path: P, assume_text: bool) -> PrintResult<JobInput> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;

    if !assume_text {
        if let Ok(format) = image::guess_format(&data) {
            info!(path = %path.display(), ?format, "printing image");
            let img = image::load_from_memory_with_format(&data, format)?;
            return Ok(JobInput::Image(img));
        }
        let mime = mime_guess::from_path(path)
            .first()
            .ok_or_else(|| PrintError::Decode("Undetermined file type".into()))?;
        if mime.type_() != mime_guess::mime::TEXT {
            return Err(PrintError::Decode(format!("Unsupported file type: {mime}")));
        }
    }

    let text = String::from_utf8(data)
        .map_err(|e| PrintError::Decode(format!("{} is not UTF-8: {}", path.display(), e)))?;
    info!(path = %path.display(), "printing text");
    Ok(JobInput::Text(text.lines().map(str::to_string).collect()))
}
