use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::commands::Command;
use crate::config::{FlowControl, TransportConfig};
use crate::error::{PrintError, PrintResult};
use crate::job::PrintJob;
use crate::protocol::{DeviceStatus, XOFF, XON, chunk_data, parse_notification};

/// Transport trait for printer communication.
/// Implement this for your BLE or mock transport.
#[async_trait]
pub trait Transport: Send {
    /// Write one packet to the printer.
    async fn write(&mut self, data: &[u8]) -> PrintResult<()>;
    /// Release the link.
    async fn disconnect(&mut self) -> PrintResult<()>;
}

/// Lifecycle of a [`PrinterSession`].
///
/// Discovery and link setup run before a session exists (see
/// [`crate::ble::connect`]), so a session starts out `Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Sending,
    Idle,
}

/// Device-side flow control as last signalled by XOff/XOn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlowState {
    #[default]
    Running,
    Paused,
}

/// Decodes printer notifications and publishes what they say.
///
/// The only writer of the session's status and flow state.
pub struct StatusObserver {
    status: watch::Sender<DeviceStatus>,
    flow: watch::Sender<FlowState>,
    overruns: watch::Sender<u32>,
    dump: bool,
}

/// Read side of a [`StatusObserver`].
#[derive(Debug, Clone)]
pub struct StatusHandle {
    status: watch::Receiver<DeviceStatus>,
    flow: watch::Receiver<FlowState>,
    overruns: watch::Receiver<u32>,
}

impl StatusHandle {
    pub fn status(&self) -> DeviceStatus {
        *self.status.borrow()
    }

    pub fn flow(&self) -> FlowState {
        *self.flow.borrow()
    }

    /// Number of XOff messages seen so far.
    pub fn overruns(&self) -> u32 {
        *self.overruns.borrow()
    }
}

impl StatusObserver {
    pub fn new(dump: bool) -> (Self, StatusHandle) {
        let (status_tx, status_rx) = watch::channel(DeviceStatus::default());
        let (flow_tx, flow_rx) = watch::channel(FlowState::Running);
        let (overrun_tx, overrun_rx) = watch::channel(0);
        (
            Self {
                status: status_tx,
                flow: flow_tx,
                overruns: overrun_tx,
                dump,
            },
            StatusHandle {
                status: status_rx,
                flow: flow_rx,
                overruns: overrun_rx,
            },
        )
    }

    /// Handles one inbound message. Never blocks.
    pub fn handle(&self, data: &[u8]) {
        if self.dump {
            info!("notification: [ {} ]", hex(data));
        } else {
            trace!("notification: [ {} ]", hex(data));
        }

        if data == XOFF {
            error!("printer data overrun!");
            self.overruns.send_modify(|n| *n += 1);
            self.flow.send_replace(FlowState::Paused);
            return;
        }
        if data == XON {
            debug!("printer ready for data again");
            self.flow.send_replace(FlowState::Running);
            return;
        }

        let notification = match parse_notification(data) {
            Ok(n) => n,
            Err(e) => {
                trace!("ignoring notification: {}", e);
                return;
            }
        };
        if notification.command != Command::GetDevState.opcode() {
            return;
        }
        let Some(&flags) = notification.payload.first() else {
            return;
        };
        let status = DeviceStatus::from_byte(flags);
        if status.no_paper {
            warn!("printer is out of paper");
        }
        if status.paper_door_open {
            warn!("paper door is open");
        }
        if status.overheated {
            warn!("printer is too hot, let it cool down");
        }
        if status.low_battery {
            warn!("low battery! print quality might be affected");
        }
        debug!(?status, "device status");
        self.status.send_replace(status);
    }

    /// Consumes notifications until the link closes.
    pub async fn run(self, mut notifications: mpsc::Receiver<Vec<u8>>) {
        while let Some(data) = notifications.recv().await {
            self.handle(&data);
        }
        debug!("notification stream closed");
    }
}

fn hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// A connected printer: streams jobs to the transport in paced packets while
/// a background [`StatusObserver`] tracks what the printer reports.
pub struct PrinterSession<T: Transport> {
    transport: T,
    config: TransportConfig,
    state: SessionState,
    handle: StatusHandle,
    observer: JoinHandle<()>,
}

impl<T: Transport> PrinterSession<T> {
    /// Starts a session on a link whose notification subscription is
    /// already established.
    pub fn open(
        transport: T,
        notifications: mpsc::Receiver<Vec<u8>>,
        config: TransportConfig,
    ) -> Self {
        let (observer, handle) = StatusObserver::new(config.dump_notifications);
        let observer = tokio::spawn(observer.run(notifications));
        Self {
            transport,
            config,
            state: SessionState::Connected,
            handle,
            observer,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Most recently reported device condition.
    pub fn status(&self) -> DeviceStatus {
        self.handle.status()
    }

    pub fn status_handle(&self) -> StatusHandle {
        self.handle.clone()
    }

    pub async fn send_job(&mut self, job: &PrintJob) -> PrintResult<()> {
        debug!(frames = job.len(), "sending job");
        self.send_bytes(&job.to_bytes()).await
    }

    /// Writes `data` in packets of `packet_size`, pausing `throttle` after
    /// each one. A failed write drops the link and the rest of the data.
    pub async fn send_bytes(&mut self, data: &[u8]) -> PrintResult<()> {
        if self.state == SessionState::Disconnected {
            return Err(PrintError::Link("session is closed".into()));
        }
        self.state = SessionState::Sending;

        let chunks = chunk_data(data, self.config.packet_size);
        let total = chunks.len();
        for (i, chunk) in chunks.into_iter().enumerate() {
            if let Err(e) = self.wait_for_clearance().await {
                self.state = SessionState::Idle;
                return Err(e);
            }
            trace!(packet = i + 1, total, len = chunk.len(), "write");
            if let Err(e) = self.transport.write(chunk).await {
                error!("write failed after {} of {} packets: {}", i, total, e);
                self.release().await;
                return Err(match e {
                    PrintError::Link(_) => e,
                    other => PrintError::Link(other.to_string()),
                });
            }
            if let Some(delay) = self.config.throttle {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        self.state = SessionState::Idle;
        debug!(bytes = data.len(), packets = total, "send complete");
        Ok(())
    }

    /// Holds the send loop while the printer has signalled XOff.
    async fn wait_for_clearance(&mut self) -> PrintResult<()> {
        if self.config.flow_control == FlowControl::ReportOnly
            || *self.handle.flow.borrow() == FlowState::Running
        {
            return Ok(());
        }
        warn!("printer asked to pause, waiting for XOn");
        let waited = tokio::time::timeout(
            self.config.overrun_timeout,
            self.handle.flow.wait_for(|s| *s == FlowState::Running),
        )
        .await;
        match waited {
            Ok(Ok(_)) => {
                debug!("resuming after XOn");
                Ok(())
            }
            Ok(Err(_)) => Err(PrintError::Link(
                "notification stream closed while paused".into(),
            )),
            Err(_) => Err(PrintError::TransportOverrun(format!(
                "no XOn within {:?}",
                self.config.overrun_timeout
            ))),
        }
    }

    async fn release(&mut self) {
        if self.state == SessionState::Disconnected {
            return;
        }
        if let Err(e) = self.transport.disconnect().await {
            warn!("disconnect failed: {}", e);
        }
        self.observer.abort();
        self.state = SessionState::Disconnected;
    }

    /// Disconnects and stops the observer.
    pub async fn close(mut self) -> DeviceStatus {
        self.release().await;
        info!("disconnected");
        self.handle.status()
    }
}
