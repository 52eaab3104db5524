//! Datagram framing for the virtual HID daemon
//!
//! Request: `magic[2] | version u16 LE | type u8 | payload`.
//! Response: `type u8 | flag u8`.

/// Leading bytes of every request
pub const MAGIC: [u8; 2] = *b"cp";

/// Protocol revision spoken by this client
pub const PROTOCOL_VERSION: u16 = 5;

/// Magic, version and request type
pub const HEADER_LEN: usize = 5;

/// Request kinds understood by the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestType {
    None = 0,
    KeyboardInitialize = 1,
    KeyboardTerminate = 2,
    KeyboardReset = 3,
    PointingInitialize = 4,
    PointingTerminate = 5,
    PointingReset = 6,
    PostKeyboardReport = 7,
    PostConsumerReport = 8,
    PostAppleVendorKeyboardReport = 9,
    PostAppleVendorTopCaseReport = 10,
    PostGenericDesktopReport = 11,
    PostPointingReport = 12,
}

impl RequestType {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::None,
            1 => Self::KeyboardInitialize,
            2 => Self::KeyboardTerminate,
            3 => Self::KeyboardReset,
            4 => Self::PointingInitialize,
            5 => Self::PointingTerminate,
            6 => Self::PointingReset,
            7 => Self::PostKeyboardReport,
            8 => Self::PostConsumerReport,
            9 => Self::PostAppleVendorKeyboardReport,
            10 => Self::PostAppleVendorTopCaseReport,
            11 => Self::PostGenericDesktopReport,
            12 => Self::PostPointingReport,
            _ => return None,
        })
    }
}

/// Response kinds sent back by the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseType {
    None = 0,
    DriverActivated = 1,
    DriverConnected = 2,
    DriverVersionMismatched = 3,
    KeyboardReady = 4,
    PointingReady = 5,
}

impl ResponseType {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::None,
            1 => Self::DriverActivated,
            2 => Self::DriverConnected,
            3 => Self::DriverVersionMismatched,
            4 => Self::KeyboardReady,
            5 => Self::PointingReady,
            _ => return None,
        })
    }
}

/// One decoded response datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    pub kind: ResponseType,
    pub value: bool,
}

impl Response {
    pub fn encode(&self) -> [u8; 2] {
        [self.kind as u8, u8::from(self.value)]
    }
}

/// Identifiers the virtual keyboard presents to the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyboardParameters {
    pub vendor_id: u64,
    pub product_id: u64,
    pub country_code: u64,
}

impl KeyboardParameters {
    pub const ENCODED_LEN: usize = 24;

    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        out[0..8].copy_from_slice(&self.vendor_id.to_le_bytes());
        out[8..16].copy_from_slice(&self.product_id.to_le_bytes());
        out[16..24].copy_from_slice(&self.country_code.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let field = |range: std::ops::Range<usize>| -> Option<u64> {
            let raw: [u8; 8] = bytes.get(range)?.try_into().ok()?;
            Some(u64::from_le_bytes(raw))
        };
        Some(Self {
            vendor_id: field(0..8)?,
            product_id: field(8..16)?,
            country_code: field(16..24)?,
        })
    }
}

impl Default for KeyboardParameters {
    fn default() -> Self {
        Self {
            vendor_id: 0x16c0,
            product_id: 0x27db,
            country_code: 0,
        }
    }
}

/// Write a request into `buf`, replacing its contents but keeping its allocation
pub fn encode_request(buf: &mut Vec<u8>, kind: RequestType, payload: &[u8]) {
    buf.clear();
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&PROTOCOL_VERSION.to_le_bytes());
    buf.push(kind as u8);
    buf.extend_from_slice(payload);
}

/// Split a request datagram into its type and payload.
///
/// Returns `None` for bad magic, a foreign version or an unknown type.
pub fn decode_request(bytes: &[u8]) -> Option<(RequestType, &[u8])> {
    if bytes.len() < HEADER_LEN || bytes[0..2] != MAGIC {
        return None;
    }
    let version = u16::from_le_bytes([bytes[2], bytes[3]]);
    if version != PROTOCOL_VERSION {
        return None;
    }
    let kind = RequestType::from_u8(bytes[4])?;
    Some((kind, &bytes[HEADER_LEN..]))
}

pub fn decode_response(bytes: &[u8]) -> Option<Response> {
    match bytes {
        [kind, value, ..] => Some(Response {
            kind: ResponseType::from_u8(*kind)?,
            value: *value != 0,
        }),
        _ => None,
    }
}
