//! The tagged-record codec.
//!
//! Messages are records of numbered fields. Each field starts with a
//! uvarint tag `(field_no << 3) | wire_type`; wire type 0 is a varint
//! value, wire type 2 a length-delimited value (UTF-8 strings, nested
//! records, repeated nested records). Decoders skip fields they do not
//! know, so envelopes survive schema drift in either direction.

use thiserror::Error;

/// Varint value.
pub const WIRE_VARINT: u8 = 0;
/// Length-delimited value.
pub const WIRE_LEN: u8 = 2;

#[derive(Debug, Error, PartialEq)]
pub enum WireError {
    #[error("message truncated")]
    Truncated,
    #[error("varint longer than 64 bits")]
    VarintOverflow,
    #[error("unsupported wire type {0}")]
    UnsupportedWireType(u8),
    #[error("length-delimited field overruns the message")]
    LengthOverrun,
    #[error("field {0} is not valid UTF-8")]
    InvalidUtf8(u32),
    #[error("required field {1} missing in {0}")]
    MissingField(&'static str, u32),
}

fn zigzag_encode(value: i64) -> u64 {
    (value.wrapping_shl(1) ^ (value >> 63)) as u64
}

fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Append a uvarint to a buffer.
pub fn put_uvarint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

// ============================================================================
// Writer
// ============================================================================

/// Serialises one record into a byte buffer.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn tag(&mut self, field: u32, wire_type: u8) {
        put_uvarint(&mut self.buf, ((field as u64) << 3) | wire_type as u64);
    }

    pub fn uint(&mut self, field: u32, value: u64) {
        self.tag(field, WIRE_VARINT);
        put_uvarint(&mut self.buf, value);
    }

    pub fn int(&mut self, field: u32, value: i64) {
        self.uint(field, zigzag_encode(value));
    }

    pub fn bool(&mut self, field: u32, value: bool) {
        self.uint(field, value as u64);
    }

    pub fn bytes(&mut self, field: u32, value: &[u8]) {
        self.tag(field, WIRE_LEN);
        put_uvarint(&mut self.buf, value.len() as u64);
        self.buf.extend_from_slice(value);
    }

    pub fn string(&mut self, field: u32, value: &str) {
        self.bytes(field, value.as_bytes());
    }

    pub fn strings(&mut self, field: u32, values: &[String]) {
        for value in values {
            self.string(field, value);
        }
    }

    /// Write a nested record as a length-delimited field.
    pub fn message<M: WireEncode>(&mut self, field: u32, value: &M) {
        let mut inner = WireWriter::new();
        value.encode(&mut inner);
        self.bytes(field, &inner.buf);
    }

    pub fn messages<M: WireEncode>(&mut self, field: u32, values: &[M]) {
        for value in values {
            self.message(field, value);
        }
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Cursor over one record's bytes.
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        WireReader { buf, pos: 0 }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub fn uvarint(&mut self) -> Result<u64, WireError> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = *self.buf.get(self.pos).ok_or(WireError::Truncated)?;
            self.pos += 1;
            if shift == 63 && byte > 1 {
                return Err(WireError::VarintOverflow);
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift > 63 {
                return Err(WireError::VarintOverflow);
            }
        }
    }

    /// Read the next field tag, or `None` at the end of the record.
    pub fn next_field(&mut self) -> Result<Option<(u32, u8)>, WireError> {
        if self.at_end() {
            return Ok(None);
        }
        let tag = self.uvarint()?;
        Ok(Some(((tag >> 3) as u32, (tag & 0x7) as u8)))
    }

    pub fn uint(&mut self) -> Result<u64, WireError> {
        self.uvarint()
    }

    pub fn int(&mut self) -> Result<i64, WireError> {
        Ok(zigzag_decode(self.uvarint()?))
    }

    pub fn bool(&mut self) -> Result<bool, WireError> {
        Ok(self.uvarint()? != 0)
    }

    pub fn bytes(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.uvarint()? as usize;
        let end = self.pos.checked_add(len).ok_or(WireError::LengthOverrun)?;
        if end > self.buf.len() {
            return Err(WireError::LengthOverrun);
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn string(&mut self, field: u32) -> Result<String, WireError> {
        let bytes = self.bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| WireError::InvalidUtf8(field))
    }

    /// Read a nested record field and decode it.
    pub fn message<M: WireDecode>(&mut self) -> Result<M, WireError> {
        let bytes = self.bytes()?;
        M::decode(&mut WireReader::new(bytes))
    }

    /// Skip a field of the given wire type.
    pub fn skip(&mut self, wire_type: u8) -> Result<(), WireError> {
        match wire_type {
            WIRE_VARINT => {
                self.uvarint()?;
            }
            WIRE_LEN => {
                self.bytes()?;
            }
            other => return Err(WireError::UnsupportedWireType(other)),
        }
        Ok(())
    }
}

/// A record that can write itself as tagged fields.
pub trait WireEncode {
    fn encode(&self, w: &mut WireWriter);

    fn encode_to_vec(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        self.encode(&mut w);
        w.into_bytes()
    }
}

/// A record that can be rebuilt from tagged fields.
pub trait WireDecode: Sized {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError>;

    fn decode_from_slice(bytes: &[u8]) -> Result<Self, WireError> {
        Self::decode(&mut WireReader::new(bytes))
    }
}
