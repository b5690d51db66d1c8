//! IPROTO framing
//!
//! Tarantool's binary protocol: every packet is a MessagePack `uint32`
//! length followed by a header map and a body map, both keyed by small
//! integer codes.
//!
//! ```text
//! +------+-----------+-------------+-----------+
//! | 0xce | len: u32  | header: map | body: map |
//! +------+-----------+-------------+-----------+
//! ```

use std::io::Cursor;

use tokio::io::{AsyncRead, AsyncReadExt};

use super::errors::{BackendError, BackendResult};
use super::value::WireValue;

/// Size of the server greeting sent right after accept
pub const GREETING_SIZE: usize = 128;

/// Length prefix: `0xce` marker plus a big-endian u32
pub const LENGTH_PREFIX_SIZE: usize = 5;

/// Upper bound on a single packet, to reject garbage length prefixes
pub const MAX_PACKET_SIZE: u32 = 64 * 1024 * 1024;

// Header keys
pub const REQUEST_TYPE: u64 = 0x00;
pub const SYNC: u64 = 0x01;

// Body keys
pub const SPACE_ID: u64 = 0x10;
pub const INDEX_ID: u64 = 0x11;
pub const LIMIT: u64 = 0x12;
pub const OFFSET: u64 = 0x13;
pub const ITERATOR: u64 = 0x14;
pub const KEY: u64 = 0x20;
pub const TUPLE: u64 = 0x21;
pub const USER_NAME: u64 = 0x23;
pub const DATA: u64 = 0x30;
pub const ERROR_MESSAGE: u64 = 0x31;

/// Response codes with this bit set carry an error number in the low bits
pub const ERROR_FLAG: u64 = 0x8000;

/// `_vspace` system view
pub const VSPACE_ID: u32 = 281;
/// `_vindex` system view
pub const VINDEX_ID: u32 = 289;
/// Secondary "name" index on both `_vspace` and `_vindex`
pub const VIEW_NAME_INDEX_ID: u32 = 2;

/// Iterator type for exact-match lookups
pub const ITERATOR_EQ: u64 = 0;

/// IPROTO request types used by this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Select = 1,
    Insert = 2,
    Update = 4,
    Delete = 5,
    Auth = 7,
    Ping = 64,
}

impl RequestType {
    pub fn code(self) -> u64 {
        self as u64
    }

    pub fn name(self) -> &'static str {
        match self {
            RequestType::Select => "select",
            RequestType::Insert => "insert",
            RequestType::Update => "update",
            RequestType::Delete => "delete",
            RequestType::Auth => "auth",
            RequestType::Ping => "ping",
        }
    }
}

/// Engine error numbers this crate knows by name.
///
/// Everything else travels as `Other` and is only ever reported, never
/// interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorCode {
    /// Duplicate key exists in unique index
    TupleFound,
    /// Tuple doesn't exist in index
    TupleNotFound,
    NoSuchIndex,
    NoSuchSpace,
    AccessDenied,
    NoSuchUser,
    PasswordMismatch,
    Other(u32),
}

impl EngineErrorCode {
    pub fn from_code(code: u32) -> Self {
        match code {
            3 => EngineErrorCode::TupleFound,
            4 => EngineErrorCode::TupleNotFound,
            35 => EngineErrorCode::NoSuchIndex,
            36 => EngineErrorCode::NoSuchSpace,
            42 => EngineErrorCode::AccessDenied,
            45 => EngineErrorCode::NoSuchUser,
            47 => EngineErrorCode::PasswordMismatch,
            other => EngineErrorCode::Other(other),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            EngineErrorCode::TupleFound => 3,
            EngineErrorCode::TupleNotFound => 4,
            EngineErrorCode::NoSuchIndex => 35,
            EngineErrorCode::NoSuchSpace => 36,
            EngineErrorCode::AccessDenied => 42,
            EngineErrorCode::NoSuchUser => 45,
            EngineErrorCode::PasswordMismatch => 47,
            EngineErrorCode::Other(code) => code,
        }
    }
}

/// A decoded packet
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub header: WireValue,
    pub body: WireValue,
}

impl Packet {
    /// Request type (requests) or response code (responses)
    pub fn code(&self) -> BackendResult<u64> {
        self.header
            .get_by_code(REQUEST_TYPE)
            .and_then(WireValue::as_u64)
            .ok_or_else(|| BackendError::protocol("packet header has no request type"))
    }

    pub fn sync(&self) -> BackendResult<u64> {
        self.header
            .get_by_code(SYNC)
            .and_then(WireValue::as_u64)
            .ok_or_else(|| BackendError::protocol("packet header has no sync"))
    }

    pub fn body_field(&self, key: u64) -> Option<&WireValue> {
        self.body.get_by_code(key)
    }

    /// Move a field out of the body
    pub fn take_body_field(&mut self, key: u64) -> Option<WireValue> {
        match &mut self.body {
            WireValue::Map(entries) => {
                let pos = entries.iter().position(|(k, _)| k.as_u64() == Some(key))?;
                Some(entries.swap_remove(pos).1)
            }
            _ => None,
        }
    }
}

/// Build a code-keyed map
pub fn code_map(entries: Vec<(u64, WireValue)>) -> WireValue {
    WireValue::Map(
        entries
            .into_iter()
            .map(|(k, v)| (WireValue::UInt(k), v))
            .collect(),
    )
}

/// Encode a full frame: length prefix, header, body
pub fn encode_packet(header: &WireValue, body: &WireValue) -> BackendResult<Vec<u8>> {
    let mut payload = Vec::with_capacity(64);
    rmp_serde::encode::write(&mut payload, header)
        .map_err(|e| BackendError::protocol(format!("failed to encode header: {}", e)))?;
    rmp_serde::encode::write(&mut payload, body)
        .map_err(|e| BackendError::protocol(format!("failed to encode body: {}", e)))?;

    let len = u32::try_from(payload.len())
        .map_err(|_| BackendError::protocol("packet exceeds u32 length"))?;

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    rmp::encode::write_u32(&mut frame, len)
        .map_err(|e| BackendError::protocol(format!("failed to encode length: {}", e)))?;
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Encode a request frame
pub fn encode_request(
    request: RequestType,
    sync: u64,
    body: Vec<(u64, WireValue)>,
) -> BackendResult<Vec<u8>> {
    let header = code_map(vec![
        (REQUEST_TYPE, WireValue::UInt(request.code())),
        (SYNC, WireValue::UInt(sync)),
    ]);
    encode_packet(&header, &code_map(body))
}

/// Decode only the header of a frame payload.
///
/// Returns the header and the offset where the body starts, so a reply
/// whose body is malformed can still be matched to its request.
pub fn decode_header(payload: &[u8]) -> BackendResult<(WireValue, usize)> {
    let mut cursor = Cursor::new(payload);
    let header: WireValue = rmp_serde::decode::from_read(&mut cursor)
        .map_err(|e| BackendError::protocol(format!("malformed header: {}", e)))?;
    if !matches!(header, WireValue::Map(_)) {
        return Err(BackendError::protocol(format!(
            "header is a {}, expected map",
            header.type_name()
        )));
    }
    Ok((header, cursor.position() as usize))
}

/// Decode a frame payload (without the length prefix).
///
/// A packet may legitimately omit the body.
pub fn decode_packet(payload: &[u8]) -> BackendResult<Packet> {
    let (header, offset) = decode_header(payload)?;

    let body = if offset < payload.len() {
        rmp_serde::decode::from_slice(&payload[offset..])
            .map_err(|e| BackendError::protocol(format!("malformed body: {}", e)))?
    } else {
        WireValue::Map(Vec::new())
    };

    Ok(Packet { header, body })
}

/// Read one frame payload from the stream
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> BackendResult<Vec<u8>> {
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    reader.read_exact(&mut prefix).await?;

    let len = rmp::decode::read_u32(&mut &prefix[..])
        .map_err(|e| BackendError::protocol(format!("bad length prefix: {}", e)))?;
    if len > MAX_PACKET_SIZE {
        return Err(BackendError::protocol(format!(
            "packet of {} bytes exceeds limit",
            len
        )));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Parsed server greeting
#[derive(Debug, Clone)]
pub struct Greeting {
    /// First line, e.g. `Tarantool 2.11.1 (Binary) <uuid>`
    pub version: String,
    /// Decoded salt; the first 20 bytes feed the auth scramble
    pub salt: Vec<u8>,
}

/// Parse the fixed-size greeting
pub fn parse_greeting(raw: &[u8]) -> BackendResult<Greeting> {
    if raw.len() < GREETING_SIZE {
        return Err(BackendError::Greeting(format!(
            "expected {} bytes, got {}",
            GREETING_SIZE,
            raw.len()
        )));
    }

    let version = String::from_utf8_lossy(&raw[..64]).trim().to_string();
    if !version.starts_with("Tarantool") {
        return Err(BackendError::Greeting(format!(
            "unexpected server banner: {:?}",
            version
        )));
    }

    let salt_line = String::from_utf8_lossy(&raw[64..GREETING_SIZE]);
    let encoded = salt_line.trim();
    let encoded = &encoded[..encoded.len().min(44)];

    use base64::Engine as _;
    let salt = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| BackendError::Greeting(format!("invalid salt: {}", e)))?;

    Ok(Greeting { version, salt })
}

/// Build a greeting block. Used by test servers.
pub fn build_greeting(version: &str, salt: &[u8]) -> Vec<u8> {
    use base64::Engine as _;

    let mut line1 = format!("{:<63}", version).into_bytes();
    line1.truncate(63);
    line1.push(b'\n');

    let mut line2 = format!(
        "{:<63}",
        base64::engine::general_purpose::STANDARD.encode(salt)
    )
    .into_bytes();
    line2.truncate(63);
    line2.push(b'\n');

    let mut greeting = line1;
    greeting.extend_from_slice(&line2);
    greeting
}
