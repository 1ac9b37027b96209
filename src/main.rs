//! # gb01print CLI
//!
//! Prints an image or text file on a GB01/MX06 thermal printer.
//!
//! ```bash
//! # print a picture, then feed 55 blank lines
//! gb01print cat.png
//!
//! # darker print of a text file on a specific printer
//! gb01print --assume-text -d -A 3f:a2 notes
//!
//! # just feed paper
//! gb01print -e -f 100
//!
//! # print every line written to ./printer.pipe
//! gb01print --pipe printer.pipe
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{ArgGroup, Parser};
use tracing::{debug, error, info, warn};

use gb01print::ble::{self, BleTransport};
use gb01print::dithering::ImageDithering;
use gb01print::font::{DEFAULT_FONT, TextFont};
use gb01print::pipe::{Fifo, IDLE_POLL, LineFollower};
use gb01print::{
    BitOrder, Contrast, DiscoveryConfig, FlowControl, JobConfig, JobInput, JobSequencer,
    PrintError, PrintResult, PrinterSession, TransportConfig, load_input,
};

/// Prints a given image to a GB01 thermal printer.
#[derive(Parser, Debug)]
#[command(name = "gb01print", version, about, long_about = None)]
#[command(group(ArgGroup::new("target").required(true).args(["filename", "eject"])))]
#[command(group(ArgGroup::new("contrast").args(["light", "medium", "dark"])))]
struct Cli {
    /// File name of an image or text file to print (the pipe path with --pipe)
    filename: Option<PathBuf>,

    /// Don't print an image, just feed some blank paper
    #[arg(short = 'e', long)]
    eject: bool,

    /// Don't feed blank paper after printing the image
    #[arg(short = 'E', long, conflicts_with = "feed")]
    no_eject: bool,

    /// Amount of blank paper to feed
    #[arg(short = 'f', long, value_name = "LINES", default_value_t = 55)]
    feed: u32,

    /// Feed blank paper before printing the image
    #[arg(long, value_name = "LINES", default_value_t = 0)]
    header: u32,

    /// Adjust blank paper feed proportionately when resizing image
    #[arg(long)]
    scale_feed: bool,

    /// Use less energy for light contrast
    #[arg(short = 'l', long)]
    light: bool,

    /// Use moderate energy for moderate contrast
    #[arg(short = 'm', long)]
    medium: bool,

    /// Use more energy for high contrast
    #[arg(short = 'd', long)]
    dark: bool,

    /// MAC address of printer in hex (rightmost digits, colons optional)
    #[arg(short = 'A', long)]
    address: Option<String>,

    /// Output notifications received from printer, in hex
    #[arg(short = 'D', long)]
    debug: bool,

    /// Assume that file type is text
    #[arg(long)]
    assume_text: bool,

    /// Treat the file as a continuous pipe and print every line written to it
    #[arg(long, requires = "filename")]
    pipe: bool,

    /// Delay between sending command queue packets
    #[arg(short = 't', long, value_name = "SECONDS", default_value_t = 0.01)]
    throttle: f64,

    /// Don't wait while sending data
    #[arg(short = 'T', long, conflicts_with = "throttle")]
    no_throttle: bool,

    /// Length of a command queue packet
    #[arg(short = 'p', long = "packetsize", value_name = "BYTES", default_value_t = 60)]
    packet_size: usize,

    /// TTF/OTF font used for text
    #[arg(long, default_value = DEFAULT_FONT)]
    font: PathBuf,

    /// Text size in pixels
    #[arg(long, value_name = "PX", default_value_t = 30.0)]
    font_size: f32,

    /// How gray levels are reduced to black and white
    #[arg(long, value_enum, default_value_t = ImageDithering::Threshold)]
    dither: ImageDithering,

    /// Put the leftmost pixel of each byte in bit 0
    #[arg(long)]
    lsb_first: bool,

    /// Keep sending when the printer reports an overrun
    #[arg(long)]
    ignore_xoff: bool,

    /// How long to wait for the printer to clear an overrun
    #[arg(long, value_name = "SECONDS", default_value_t = 5.0)]
    overrun_timeout: f64,

    /// Scan polls before giving up on finding the printer
    #[arg(long, value_name = "N", default_value_t = 50)]
    scan_polls: u32,

    /// Milliseconds between scan polls
    #[arg(long, value_name = "MS", default_value_t = 100)]
    scan_interval_ms: u64,
}

impl Cli {
    fn contrast(&self) -> Contrast {
        [
            (self.light, Contrast::Light),
            (self.medium, Contrast::Medium),
            (self.dark, Contrast::Dark),
        ]
        .into_iter()
        .find_map(|(set, contrast)| set.then_some(contrast))
        .unwrap_or_default()
    }

    fn job_config(&self) -> JobConfig {
        JobConfig {
            eject_only: self.eject,
            no_eject: self.no_eject,
            feed_lines: self.feed,
            header_lines: self.header,
            scale_feed: self.scale_feed,
            contrast: self.contrast(),
            dithering: self.dither,
            bit_order: if self.lsb_first {
                BitOrder::LsbFirst
            } else {
                BitOrder::MsbFirst
            },
        }
    }

    fn transport_config(&self) -> PrintResult<TransportConfig> {
        let throttle = if self.no_throttle {
            None
        } else {
            Some(seconds(self.throttle, "throttle")?)
        };
        Ok(TransportConfig {
            packet_size: self.packet_size,
            throttle,
            flow_control: if self.ignore_xoff {
                FlowControl::ReportOnly
            } else {
                FlowControl::Pause
            },
            overrun_timeout: seconds(self.overrun_timeout, "overrun timeout")?,
            dump_notifications: self.debug,
        })
    }

    fn discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            address: self.address.clone(),
            poll_count: self.scan_polls,
            poll_interval: Duration::from_millis(self.scan_interval_ms),
        }
    }
}

fn seconds(value: f64, what: &str) -> PrintResult<Duration> {
    Duration::try_from_secs_f64(value).map_err(|e| {
        PrintError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{what}: {e}"),
        ))
    })
}

fn init_logging(debug: bool) {
    let default = if debug { "gb01print=debug" } else { "gb01print=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> PrintResult<()> {
    let transport = cli.transport_config()?;
    let discovery = cli.discovery_config();
    let sequencer = JobSequencer::new(cli.job_config());

    if cli.pipe {
        let Some(path) = cli.filename.as_ref() else {
            return Err(PrintError::Decode("--pipe needs a path".into()));
        };
        let sequencer = sequencer.with_font(TextFont::load(&cli.font, cli.font_size)?);
        return run_pipe(path, &sequencer, &discovery, transport).await;
    }

    let input = match (&cli.filename, cli.eject) {
        (Some(path), false) => load_input(path, cli.assume_text)?,
        _ => JobInput::Eject,
    };
    let sequencer = if matches!(input, JobInput::Text(_)) {
        sequencer.with_font(TextFont::load(&cli.font, cli.font_size)?)
    } else {
        sequencer
    };
    // everything is rendered before the printer is touched
    let job = sequencer.build(&input)?;
    info!(frames = job.len(), "job ready");

    let mut session =
        until_interrupted(ble::connect(&discovery, transport), ctrl_c(), "connecting").await?;
    let result = until_interrupted(session.send_job(&job), ctrl_c(), "sending").await;
    let status = session.close().await;
    debug!(?status, "final device status");
    if result.is_ok() {
        info!("print job sent");
    }
    result
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Runs `work` unless `interrupt` fires first, which is a link failure.
async fn until_interrupted<T>(
    work: impl Future<Output = PrintResult<T>>,
    interrupt: impl Future<Output = ()>,
    phase: &str,
) -> PrintResult<T> {
    tokio::select! {
        done = work => done,
        _ = interrupt => {
            info!("[stopped]");
            Err(PrintError::Link(format!("interrupted while {phase}")))
        }
    }
}

async fn run_pipe(
    path: &Path,
    sequencer: &JobSequencer,
    discovery: &DiscoveryConfig,
    transport: TransportConfig,
) -> PrintResult<()> {
    let fifo = Fifo::create(path)?;
    info!("[listening to {}]", fifo.path().display());

    let mut session = tokio::select! {
        session = ble::connect(discovery, transport) => session?,
        _ = tokio::signal::ctrl_c() => {
            info!("[stopped]");
            return Ok(());
        }
    };
    let result = tokio::select! {
        printed = print_lines(&mut session, sequencer, &fifo) => printed,
        _ = tokio::signal::ctrl_c() => {
            info!("[stopped]");
            Ok(())
        }
    };
    session.close().await;
    drop(fifo);
    result
}

async fn print_lines(
    session: &mut PrinterSession<BleTransport>,
    sequencer: &JobSequencer,
    fifo: &Fifo,
) -> PrintResult<()> {
    let mut lines = LineFollower::new(fifo.open()?, IDLE_POLL);
    loop {
        let line = lines.next_line().await?;
        let job = match sequencer.build_text_line(&line) {
            Ok(job) => job,
            Err(e) if e.is_decode() => {
                warn!("skipping line: {}", e);
                continue;
            }
            Err(e) => return Err(e),
        };
        session.send_job(&job).await?;
    }
}
