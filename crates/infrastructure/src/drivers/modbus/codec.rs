//! Addressing and value decoding for Modbus holding-register items.
//!
//! An item's href is `<address>` or `<address>?quantity=<n>`; its type string
//! combines a scalar type prefix with an optional byte-order suffix, e.g.
//! `uint32_le`, `float sw` or `modv:int16be`. Register payloads are first
//! remapped according to the suffix and then reinterpreted in host
//! (little-endian) order, which is what existing interface descriptions expect.

use regex::Regex;
use std::sync::OnceLock;

use domain::ConnectionError;

/// Register span addressed by an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterSpan {
    pub address: u16,
    pub quantity: u16,
}

impl RegisterSpan {
    pub fn byte_len(&self) -> usize {
        2 * self.quantity as usize
    }
}

fn href_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{1,5})(?:\?quantity=(\d+))?$").expect("static regex is valid")
    })
}

/// Parses `<address>` or `<address>?quantity=<n>`.
///
/// The quantity defaults to 1 and is clamped to the 16-bit range.
pub fn parse_href(href: &str) -> Result<RegisterSpan, ConnectionError> {
    let caps = href_pattern()
        .captures(href.trim())
        .ok_or_else(|| ConnectionError::InvalidForm(format!("Invalid Modbus href: {}", href)))?;

    let address: u32 = caps[1]
        .parse()
        .map_err(|_| ConnectionError::InvalidForm(format!("Invalid Modbus address: {}", href)))?;
    let address = u16::try_from(address).map_err(|_| {
        ConnectionError::InvalidForm(format!("Modbus address out of range: {}", address))
    })?;

    let quantity = match caps.get(2) {
        // all digits, so a parse failure can only be an overflow
        Some(q) => q.as_str().parse::<u64>().unwrap_or(u64::MAX),
        None => 1,
    };
    let quantity = quantity.clamp(0, u16::MAX as u64) as u16;

    Ok(RegisterSpan { address, quantity })
}

/// Byte remapping requested by the type suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// No suffix
    Native,
    /// `be`
    BigEndian,
    /// `le`
    LittleEndian,
    /// `sw`: swap 16-bit words
    WordSwap,
    /// `sb`: swap bytes inside each word
    ByteSwap,
}

/// Scalar type declared by the type prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Uint32,
    Int32,
    Uint16,
    Int16,
    Uint8,
    Int8,
    Float,
    Double,
    Text,
}

impl ScalarType {
    /// Registers that must be read before the type can be decoded.
    pub fn min_quantity(&self) -> u16 {
        match self {
            Self::Uint32 | Self::Int32 | Self::Float => 2,
            Self::Double => 4,
            Self::Uint16 | Self::Int16 | Self::Uint8 | Self::Int8 | Self::Text => 1,
        }
    }
}

/// Parsed form of an item's Modbus type string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModbusType {
    pub scalar: ScalarType,
    pub order: ByteOrder,
}

impl ModbusType {
    /// Parses the type string; `None` means plain 16-bit unsigned registers.
    pub fn parse(raw: Option<&str>) -> Result<Self, ConnectionError> {
        let Some(raw) = raw.map(|r| r.trim().to_lowercase()).filter(|r| !r.is_empty()) else {
            return Ok(Self {
                scalar: ScalarType::Uint16,
                order: ByteOrder::Native,
            });
        };

        let body = raw
            .strip_prefix("modv:")
            .or_else(|| raw.strip_prefix("xsd:"))
            .unwrap_or(&raw);

        let order = if body.ends_with("be") {
            ByteOrder::BigEndian
        } else if body.ends_with("le") && !body.ends_with("double") {
            ByteOrder::LittleEndian
        } else if body.ends_with("sw") {
            ByteOrder::WordSwap
        } else if body.ends_with("sb") {
            ByteOrder::ByteSwap
        } else {
            ByteOrder::Native
        };

        let scalar = if body.starts_with("uint32") {
            ScalarType::Uint32
        } else if body.starts_with("int32") {
            ScalarType::Int32
        } else if body.starts_with("uint16") {
            ScalarType::Uint16
        } else if body.starts_with("int16") {
            ScalarType::Int16
        } else if body.starts_with("uint8") {
            ScalarType::Uint8
        } else if body.starts_with("int8") {
            ScalarType::Int8
        } else if body.starts_with("double") || body.starts_with("float64") {
            ScalarType::Double
        } else if body.starts_with("float") {
            ScalarType::Float
        } else if body.starts_with("string") {
            ScalarType::Text
        } else {
            return Err(ConnectionError::Decode(format!(
                "Unknown Modbus type: {}",
                raw
            )));
        };

        Ok(Self { scalar, order })
    }
}

/// Remaps a 16- or 32-bit register payload in place. Other lengths are left as read.
pub fn apply_byte_order(bytes: &mut [u8], order: ByteOrder) {
    match (bytes.len(), order) {
        (2, ByteOrder::LittleEndian | ByteOrder::ByteSwap) => bytes.swap(0, 1),
        (4, ByteOrder::LittleEndian) => bytes.reverse(),
        (4, ByteOrder::WordSwap) => {
            bytes.swap(0, 2);
            bytes.swap(1, 3);
        }
        (4, ByteOrder::ByteSwap) => {
            bytes.swap(0, 1);
            bytes.swap(2, 3);
        }
        _ => {}
    }
}

/// Flattens register words to bytes as they travel on the wire.
pub fn registers_to_bytes(words: &[u16]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}

/// Rejects a declared type wider than the requested registers.
pub fn check_span(span: RegisterSpan, ty: ModbusType) -> Result<(), ConnectionError> {
    if span.quantity < ty.scalar.min_quantity() {
        return Err(ConnectionError::Decode(format!(
            "{:?} needs quantity >= {}, got {}",
            ty.scalar,
            ty.scalar.min_quantity(),
            span.quantity
        )));
    }
    Ok(())
}

/// Decodes the remapped payload into its invariant string form.
pub fn decode(bytes: &[u8], span: RegisterSpan, ty: ModbusType) -> Result<String, ConnectionError> {
    check_span(span, ty)?;

    let take = |n: usize| prefix(bytes, n);

    let text = match ty.scalar {
        ScalarType::Uint32 => u32::from_le_bytes(array(take(4)?)).to_string(),
        ScalarType::Int32 => i32::from_le_bytes(array(take(4)?)).to_string(),
        ScalarType::Uint16 => u16::from_le_bytes(array(take(2)?)).to_string(),
        ScalarType::Int16 => i16::from_le_bytes(array(take(2)?)).to_string(),
        ScalarType::Uint8 => take(1)?[0].to_string(),
        ScalarType::Int8 => (take(1)?[0] as i8).to_string(),
        ScalarType::Float => format_round_trip(f32::from_le_bytes(array(take(4)?)) as f64, true),
        ScalarType::Double => format_round_trip(f64::from_le_bytes(array(take(8)?)), false),
        ScalarType::Text => {
            let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
            String::from_utf8_lossy(&bytes[..end]).trim().to_string()
        }
    };
    Ok(text)
}

fn prefix(bytes: &[u8], n: usize) -> Result<&[u8], ConnectionError> {
    bytes.get(..n).ok_or_else(|| {
        ConnectionError::Decode(format!("Payload too short: {} < {}", bytes.len(), n))
    })
}

fn array<const N: usize>(slice: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&slice[..N]);
    out
}

/// Shortest round-trip rendering with invariant-culture conventions:
/// exponent notation as `1E+15` / `1E-05`, `Infinity`, `NaN`.
fn format_round_trip(value: f64, single: bool) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }

    let magnitude = value.abs();
    let scientific = magnitude != 0.0 && (magnitude >= 1e15 || magnitude < 1e-4);
    let shortest = |sci: bool| {
        if single {
            let v = value as f32;
            if sci { format!("{:e}", v) } else { format!("{}", v) }
        } else if sci {
            format!("{:e}", value)
        } else {
            format!("{}", value)
        }
    };

    if !scientific {
        return shortest(false);
    }

    let raw = shortest(true);
    match raw.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{}E{}{:0>2}", mantissa, sign, digits)
        }
        None => raw,
    }
}
