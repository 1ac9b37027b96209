use crate::error::{PrintError, PrintResult};

/// Frame preamble.
pub const MAGIC: [u8; 2] = [0x51, 0x78];
/// Frame terminator.
pub const TERMINATOR: u8 = 0xFF;
/// Header (magic, command, 0, length, 0) plus crc and terminator.
pub const FRAME_OVERHEAD: usize = 8;
/// The length field is a single byte.
pub const MAX_PAYLOAD: usize = 0xFF;

/// Overrun signal sent by the printer when its buffer is full.
pub const XOFF: [u8; 9] = [0x51, 0x78, 0xAE, 0x01, 0x01, 0x00, 0x10, 0x70, 0xFF];
/// Sent by the printer once it can take data again.
pub const XON: [u8; 9] = [0x51, 0x78, 0xAE, 0x01, 0x01, 0x00, 0x00, 0x00, 0xFF];

static CRC8_TABLE: [u8; 256] = [
    0x00, 0x07, 0x0e, 0x09, 0x1c, 0x1b, 0x12, 0x15, 0x38, 0x3f, 0x36, 0x31, 0x24, 0x23, 0x2a, 0x2d,
    0x70, 0x77, 0x7e, 0x79, 0x6c, 0x6b, 0x62, 0x65, 0x48, 0x4f, 0x46, 0x41, 0x54, 0x53, 0x5a, 0x5d,
    0xe0, 0xe7, 0xee, 0xe9, 0xfc, 0xfb, 0xf2, 0xf5, 0xd8, 0xdf, 0xd6, 0xd1, 0xc4, 0xc3, 0xca, 0xcd,
    0x90, 0x97, 0x9e, 0x99, 0x8c, 0x8b, 0x82, 0x85, 0xa8, 0xaf, 0xa6, 0xa1, 0xb4, 0xb3, 0xba, 0xbd,
    0xc7, 0xc0, 0xc9, 0xce, 0xdb, 0xdc, 0xd5, 0xd2, 0xff, 0xf8, 0xf1, 0xf6, 0xe3, 0xe4, 0xed, 0xea,
    0xb7, 0xb0, 0xb9, 0xbe, 0xab, 0xac, 0xa5, 0xa2, 0x8f, 0x88, 0x81, 0x86, 0x93, 0x94, 0x9d, 0x9a,
    0x27, 0x20, 0x29, 0x2e, 0x3b, 0x3c, 0x35, 0x32, 0x1f, 0x18, 0x11, 0x16, 0x03, 0x04, 0x0d, 0x0a,
    0x57, 0x50, 0x59, 0x5e, 0x4b, 0x4c, 0x45, 0x42, 0x6f, 0x68, 0x61, 0x66, 0x73, 0x74, 0x7d, 0x7a,
    0x89, 0x8e, 0x87, 0x80, 0x95, 0x92, 0x9b, 0x9c, 0xb1, 0xb6, 0xbf, 0xb8, 0xad, 0xaa, 0xa3, 0xa4,
    0xf9, 0xfe, 0xf7, 0xf0, 0xe5, 0xe2, 0xeb, 0xec, 0xc1, 0xc6, 0xcf, 0xc8, 0xdd, 0xda, 0xd3, 0xd4,
    0x69, 0x6e, 0x67, 0x60, 0x75, 0x72, 0x7b, 0x7c, 0x51, 0x56, 0x5f, 0x58, 0x4d, 0x4a, 0x43, 0x44,
    0x19, 0x1e, 0x17, 0x10, 0x05, 0x02, 0x0b, 0x0c, 0x21, 0x26, 0x2f, 0x28, 0x3d, 0x3a, 0x33, 0x34,
    0x4e, 0x49, 0x40, 0x47, 0x52, 0x55, 0x5c, 0x5b, 0x76, 0x71, 0x78, 0x7f, 0x6a, 0x6d, 0x64, 0x63,
    0x3e, 0x39, 0x30, 0x37, 0x22, 0x25, 0x2c, 0x2b, 0x06, 0x01, 0x08, 0x0f, 0x1a, 0x1d, 0x14, 0x13,
    0xae, 0xa9, 0xa0, 0xa7, 0xb2, 0xb5, 0xbc, 0xbb, 0x96, 0x91, 0x98, 0x9f, 0x8a, 0x8d, 0x84, 0x83,
    0xde, 0xd9, 0xd0, 0xd7, 0xc2, 0xc5, 0xcc, 0xcb, 0xe6, 0xe1, 0xe8, 0xef, 0xfa, 0xfd, 0xf4, 0xf3,
];

/// Computes the CRC-8 the printer expects over a frame payload.
///
/// - `data`: input bytes
///
/// Returns CRC-8 value
pub fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |crc, &b| CRC8_TABLE[(crc ^ b) as usize])
}

/// One command message: `51 78 | cmd | 00 | len | 00 | payload | crc8 | FF`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    command: u8,
    payload: Vec<u8>,
    checksum: u8,
}

impl Frame {
    /// For fixed-size command arguments that always fit the length byte.
    pub(crate) fn short(command: u8, payload: &[u8]) -> Self {
        debug_assert!(payload.len() <= MAX_PAYLOAD);
        Self {
            command,
            payload: payload.to_vec(),
            checksum: crc8(payload),
        }
    }

    pub fn command(&self) -> u8 {
        self.command
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn checksum(&self) -> u8 {
        self.checksum
    }

    /// Number of bytes this frame occupies on the wire.
    pub fn wire_len(&self) -> usize {
        self.payload.len() + FRAME_OVERHEAD
    }

    /// Flattens the frame into wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.wire_len());
        self.write_to(&mut out);
        out
    }

    /// Appends the wire bytes of this frame to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&MAGIC);
        out.push(self.command);
        out.push(0x00);
        out.push(self.payload.len() as u8);
        out.push(0x00);
        out.extend_from_slice(&self.payload);
        out.push(self.checksum);
        out.push(TERMINATOR);
    }
}

/// Builds a frame for the printer protocol.
///
/// - `command`: command byte
/// - `payload`: command payload, at most 255 bytes
///
/// Fails with `ProtocolViolation` when the payload does not fit the one-byte
/// length field; callers split data (e.g. per scanline) beforehand.
pub fn build_frame(command: u8, payload: &[u8]) -> PrintResult<Frame> {
    if payload.len() > MAX_PAYLOAD {
        return Err(PrintError::ProtocolViolation(format!(
            "invalid payload size {} for command {:#04x} (max {})",
            payload.len(),
            command,
            MAX_PAYLOAD
        )));
    }
    Ok(Frame::short(command, payload))
}

/// Serializes a frame to wire bytes.
pub fn serialize(frame: &Frame) -> Vec<u8> {
    frame.to_bytes()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub command: u8,
    pub payload: Vec<u8>,
    pub crc: Option<u8>,
}

/// Parses a notification packet sent back by the printer.
///
/// Notifications share the command frame layout. The checksum is reported
/// but not verified.
pub fn parse_notification(data: &[u8]) -> PrintResult<Notification> {
    if data.len() < 6 {
        return Err(PrintError::Decode("notification too short".into()));
    }
    if data[..2] != MAGIC {
        return Err(PrintError::Decode("bad notification preamble".into()));
    }
    let len = data[4] as usize;
    if data.len() < 6 + len {
        return Err(PrintError::Decode(
            "not enough bytes for claimed payload length".into(),
        ));
    }
    Ok(Notification {
        command: data[2],
        payload: data[6..6 + len].to_vec(),
        crc: data.get(6 + len).copied(),
    })
}

/// Condition flags reported in the GetDevState reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStatus {
    pub no_paper: bool,
    pub paper_door_open: bool,
    pub overheated: bool,
    pub low_battery: bool,
}

impl DeviceStatus {
    /// Decodes the status byte: bit0 no paper, bit1 paper door open,
    /// bit2 overheated, bit3 low battery.
    pub fn from_byte(b: u8) -> Self {
        Self {
            no_paper: b & 0b0001 != 0,
            paper_door_open: b & 0b0010 != 0,
            overheated: b & 0b0100 != 0,
            low_battery: b & 0b1000 != 0,
        }
    }

    pub fn is_ok(&self) -> bool {
        *self == Self::default()
    }
}

/// Splits data into chunks of given size.
///
/// - `data`: input bytes
/// - `chunk_size`: size of each chunk, 0 sends everything at once
///
/// Returns Vec of byte slices
pub fn chunk_data(data: &[u8], chunk_size: usize) -> Vec<&[u8]> {
    if chunk_size == 0 {
        return vec![data];
    }
    data.chunks(chunk_size).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_crc8_empty_is_zero() {
        assert_eq!(crc8(&[]), 0);
    }

    #[test]
    fn test_crc8_table_lookup() {
        assert_eq!(crc8(&[0x01]), 0x07);
        assert_eq!(crc8(&[0x00]), 0x00);
        assert_eq!(crc8(&[0xFF]), 0xF3);
        // crc of 0x01 is 0x07, then table[0x07 ^ 0x02] = table[5]
        assert_eq!(crc8(&[0x01, 0x02]), 0x1B);
    }

    #[test]
    fn test_crc8_order_sensitive() {
        assert_ne!(crc8(&[0x12, 0x34]), crc8(&[0x34, 0x12]));
    }

    #[test]
    fn test_frame_layout() {
        let payload = [0x10, 0x20, 0x30];
        let bytes = serialize(&build_frame(0xA2, &payload).unwrap());
        assert_eq!(bytes.len(), payload.len() + 8);
        assert_eq!(&bytes[..2], &[0x51, 0x78]);
        assert_eq!(bytes[2], 0xA2);
        assert_eq!(bytes[3], 0x00);
        assert_eq!(bytes[4], 3);
        assert_eq!(bytes[5], 0x00);
        assert_eq!(&bytes[6..9], &payload);
        assert_eq!(bytes[bytes.len() - 2], crc8(&payload));
        assert_eq!(bytes[bytes.len() - 1], 0xFF);
    }

    #[test]
    fn test_frame_payload_boundaries() {
        let empty = build_frame(0xA3, &[]).unwrap();
        assert_eq!(empty.to_bytes(), vec![0x51, 0x78, 0xA3, 0, 0, 0, 0, 0xFF]);

        let full = build_frame(0xA2, &[0xAB; 255]).unwrap();
        assert_eq!(full.wire_len(), 263);
        assert_eq!(full.to_bytes()[4], 255);

        let err = build_frame(0xA2, &[0u8; 256]).unwrap_err();
        assert!(matches!(err, PrintError::ProtocolViolation(_)));
    }

    #[test]
    fn test_get_dev_state_frame_bytes() {
        let frame = build_frame(0xA3, &[0x00]).unwrap();
        assert_eq!(
            frame.to_bytes(),
            vec![0x51, 0x78, 0xA3, 0x00, 0x01, 0x00, 0x00, 0x00, 0xFF]
        );
    }

    #[test]
    fn test_parse_notification() {
        let raw = [0x51, 0x78, 0xA3, 0x00, 0x02, 0x00, 0x08, 0x01, 0x5A, 0xFF];
        let n = parse_notification(&raw).unwrap();
        assert_eq!(n.command, 0xA3);
        assert_eq!(n.payload, vec![0x08, 0x01]);
        assert_eq!(n.crc, Some(0x5A));

        assert!(parse_notification(&[0x51, 0x78]).is_err());
        assert!(parse_notification(&[0x22, 0x21, 0xA3, 0, 0, 0]).is_err());
        assert!(parse_notification(&[0x51, 0x78, 0xA3, 0, 4, 0, 1]).is_err());
    }

    #[test]
    fn test_sentinels_parse_as_ae() {
        let off = parse_notification(&XOFF).unwrap();
        let on = parse_notification(&XON).unwrap();
        assert_eq!(off.command, 0xAE);
        assert_eq!(off.payload, vec![0x10]);
        assert_eq!(on.payload, vec![0x00]);
    }

    #[test]
    fn test_device_status_bits() {
        assert!(DeviceStatus::from_byte(0).is_ok());
        let s = DeviceStatus::from_byte(0b1001);
        assert!(s.no_paper);
        assert!(!s.paper_door_open);
        assert!(!s.overheated);
        assert!(s.low_battery);
        assert!(DeviceStatus::from_byte(0b0100).overheated);
        assert!(DeviceStatus::from_byte(0b0010).paper_door_open);
    }

    #[test]
    fn test_chunk_data() {
        let data = [0u8; 130];
        let sizes: Vec<usize> = chunk_data(&data, 60).iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![60, 60, 10]);
        assert_eq!(chunk_data(&data, 0).len(), 1);
    }
}
