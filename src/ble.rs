//! BLE transport for GB01/MX06 printers (btleplug).

use async_trait::async_trait;
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::config::{DiscoveryConfig, TransportConfig};
use crate::error::{PrintError, PrintResult};
use crate::printer::{PrinterSession, Transport};

/// Characteristic the command stream is written to.
pub const PRINTER_CHARACTERISTIC: Uuid = Uuid::from_u128(0x0000AE01_0000_1000_8000_00805F9B34FB);
/// Characteristic the printer notifies on.
pub const NOTIFY_CHARACTERISTIC: Uuid = Uuid::from_u128(0x0000AE02_0000_1000_8000_00805F9B34FB);
/// Advertised names of supported printers.
pub const MODEL_NAMES: [&str; 2] = ["GB01", "MX06"];

/// Buffered notifications between the BLE event stream and the observer.
const NOTIFY_QUEUE: usize = 64;

/// A discovered printer.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub address: String,
}

/// True when `address` ends with the hex digits of `filter`, ignoring case
/// and colons.
pub fn address_matches(address: &str, filter: &str) -> bool {
    let normalize = |s: &str| -> String {
        s.chars()
            .filter(|c| *c != ':')
            .map(|c| c.to_ascii_uppercase())
            .collect()
    };
    normalize(address).ends_with(&normalize(filter))
}

/// True for an advertised printer that passes the optional address filter.
pub fn is_printer(name: Option<&str>, address: &str, filter: Option<&str>) -> bool {
    let Some(name) = name else {
        return false;
    };
    if !MODEL_NAMES.contains(&name) {
        return false;
    }
    filter.is_none_or(|f| address_matches(address, f))
}

async fn first_adapter() -> PrintResult<Adapter> {
    let manager = Manager::new().await?;
    manager
        .adapters()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| PrintError::DeviceNotFound("no Bluetooth adapter".into()))
}

async fn find_printer(
    adapter: &Adapter,
    filter: Option<&str>,
) -> PrintResult<Option<(Peripheral, DeviceInfo)>> {
    for peripheral in adapter.peripherals().await? {
        let Some(props) = peripheral.properties().await? else {
            continue;
        };
        let address = props.address.to_string();
        trace!(%address, name = ?props.local_name, "seen");
        if is_printer(props.local_name.as_deref(), &address, filter) {
            let info = DeviceInfo {
                name: props.local_name.unwrap_or_default(),
                address,
            };
            return Ok(Some((peripheral, info)));
        }
    }
    Ok(None)
}

/// Calls `probe` up to `poll_count` times, sleeping `poll_interval` before
/// each call, and returns its first hit.
///
/// Fails with `DeviceNotFound` when the window passes without one.
pub async fn poll_for<T, F, Fut>(config: &DiscoveryConfig, mut probe: F) -> PrintResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PrintResult<Option<T>>>,
{
    for poll in 1..=config.poll_count {
        tokio::time::sleep(config.poll_interval).await;
        if let Some(hit) = probe().await? {
            debug!(poll, "printer answered");
            return Ok(hit);
        }
    }
    Err(PrintError::DeviceNotFound(format!(
        "no {} answered within {:?}",
        MODEL_NAMES.join("/"),
        config.poll_interval * config.poll_count
    )))
}

/// Scans until a supported printer shows up.
pub async fn discover(config: &DiscoveryConfig) -> PrintResult<(Peripheral, DeviceInfo)> {
    let adapter = first_adapter().await?;
    let filter = config.address.as_deref();
    adapter.start_scan(ScanFilter::default()).await?;
    info!(address = ?filter, "scanning for printer");

    let scanned = &adapter;
    let found = poll_for(config, move || find_printer(scanned, filter)).await;
    if let Err(e) = adapter.stop_scan().await {
        warn!("failed to stop scan: {}", e);
    }
    found
}

/// Write side of a connected printer.
pub struct BleTransport {
    peripheral: Peripheral,
    write_char: Characteristic,
}

#[async_trait]
impl Transport for BleTransport {
    async fn write(&mut self, data: &[u8]) -> PrintResult<()> {
        self.peripheral
            .write(&self.write_char, data, WriteType::WithoutResponse)
            .await
            .map_err(|e| PrintError::Link(e.to_string()))
    }

    async fn disconnect(&mut self) -> PrintResult<()> {
        if self.peripheral.is_connected().await? {
            self.peripheral.disconnect().await?;
        }
        Ok(())
    }
}

fn characteristic(peripheral: &Peripheral, uuid: Uuid) -> PrintResult<Characteristic> {
    peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == uuid)
        .ok_or_else(|| PrintError::Link(format!("characteristic {uuid} not found")))
}

/// Connects, subscribes to notifications and forwards them to the returned
/// receiver. The subscription is live before this returns.
pub async fn connect_peripheral(
    peripheral: Peripheral,
) -> PrintResult<(BleTransport, mpsc::Receiver<Vec<u8>>)> {
    peripheral.connect().await?;
    peripheral.discover_services().await?;

    let write_char = characteristic(&peripheral, PRINTER_CHARACTERISTIC)?;
    let notify_char = characteristic(&peripheral, NOTIFY_CHARACTERISTIC)?;
    peripheral.subscribe(&notify_char).await?;
    let mut stream = peripheral.notifications().await?;

    let (tx, rx) = mpsc::channel(NOTIFY_QUEUE);
    tokio::spawn(async move {
        while let Some(n) = stream.next().await {
            if n.uuid != NOTIFY_CHARACTERISTIC {
                continue;
            }
            // the observer only decodes; a full queue means it fell behind
            if let Err(e) = tx.try_send(n.value) {
                warn!("dropping notification: {}", e);
            }
        }
        debug!("BLE notification stream ended");
    });

    Ok((
        BleTransport {
            peripheral,
            write_char,
        },
        rx,
    ))
}

/// Discovers the printer and opens a session on it.
pub async fn connect(
    discovery: &DiscoveryConfig,
    transport: TransportConfig,
) -> PrintResult<PrinterSession<BleTransport>> {
    let (peripheral, info) = discover(discovery).await?;
    info!(name = %info.name, address = %info.address, "found printer");
    let (ble, notifications) = connect_peripheral(peripheral).await?;
    let session = PrinterSession::open(ble, notifications, transport);
    info!(state = ?session.state(), "connected");
    Ok(session)
}
