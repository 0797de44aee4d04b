//! Binary buffer that every codec operation runs over.
//!
//! Writes append to the end and cannot fail; reads consume from the read
//! offset and fail with [`CodecError::BufferUnderrun`] instead of reading
//! past the end. All multi-byte numbers are little-endian.

use crate::error::CodecError;
use crate::name::Name;
use bytes::{BufMut, BytesMut};

/// An owned byte buffer with a read offset and an append-only write end.
#[derive(Debug, Clone, Default)]
pub struct ByteCursor {
    buf: BytesMut,
    pos: usize,
}

macro_rules! fixed_int {
    ($write:ident, $read:ident, $put:ident, $ty:ty) => {
        pub fn $write(&mut self, value: $ty) {
            self.buf.$put(value);
        }

        pub fn $read(&mut self) -> Result<$ty, CodecError> {
            const N: usize = std::mem::size_of::<$ty>();
            let mut raw = [0u8; N];
            raw.copy_from_slice(self.take(N)?);
            Ok(<$ty>::from_le_bytes(raw))
        }
    };
}

impl ByteCursor {
    /// An empty cursor, ready for writing.
    pub fn new() -> Self {
        Self::default()
    }

    /// A cursor positioned at the start of `bytes`, ready for reading.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            buf: BytesMut::from(bytes),
            pos: 0,
        }
    }

    /// The whole buffer, independent of the read offset.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf.to_vec()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Current read offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left between the read offset and the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    /// Reset the read offset to the start of the buffer.
    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    fn take(&mut self, n: usize) -> Result<&[u8], CodecError> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(CodecError::BufferUnderrun {
                needed: n,
                remaining,
            });
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.buf[start..start + n])
    }

    // ─── Fixed-width numbers ─────────────────────────────────────────────

    fixed_int!(write_u16, read_u16, put_u16_le, u16);
    fixed_int!(write_u32, read_u32, put_u32_le, u32);
    fixed_int!(write_u64, read_u64, put_u64_le, u64);
    fixed_int!(write_u128, read_u128, put_u128_le, u128);
    fixed_int!(write_i16, read_i16, put_i16_le, i16);
    fixed_int!(write_i32, read_i32, put_i32_le, i32);
    fixed_int!(write_i64, read_i64, put_i64_le, i64);
    fixed_int!(write_i128, read_i128, put_i128_le, i128);
    fixed_int!(write_f32, read_f32, put_f32_le, f32);
    fixed_int!(write_f64, read_f64, put_f64_le, f64);

    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn write_i8(&mut self, value: i8) {
        self.buf.put_i8(value);
    }

    pub fn read_i8(&mut self) -> Result<i8, CodecError> {
        Ok(self.read_u8()? as i8)
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::malformed(format!("invalid bool byte {other}"))),
        }
    }

    // ─── Variable-length integers ────────────────────────────────────────

    /// LEB128: 7 bits per byte, continuation bit on every byte but the last.
    pub fn write_varuint64(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                self.write_u8(byte);
                return;
            }
            self.write_u8(byte | 0x80);
        }
    }

    pub fn read_varuint64(&mut self) -> Result<u64, CodecError> {
        self.read_varuint(64)
    }

    pub fn write_varuint32(&mut self, value: u32) {
        self.write_varuint64(u64::from(value));
    }

    pub fn read_varuint32(&mut self) -> Result<u32, CodecError> {
        let value = self.read_varuint(32)?;
        u32::try_from(value).map_err(|_| CodecError::malformed("varuint32 out of range"))
    }

    /// Zig-zag encoded signed varint.
    pub fn write_varint32(&mut self, value: i32) {
        let zigzag = ((value << 1) ^ (value >> 31)) as u32;
        self.write_varuint32(zigzag);
    }

    pub fn read_varint32(&mut self) -> Result<i32, CodecError> {
        let raw = self.read_varuint32()?;
        Ok(((raw >> 1) as i32) ^ -((raw & 1) as i32))
    }

    fn read_varuint(&mut self, bits: u32) -> Result<u64, CodecError> {
        let mut result = 0u64;
        let mut shift = 0u32;
        loop {
            if shift >= bits + 7 || shift >= 64 {
                return Err(CodecError::malformed(format!("varuint{bits} is too long")));
            }
            let byte = self.read_u8()?;
            result |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
    }

    // ─── Names, strings, raw bytes ───────────────────────────────────────

    pub fn write_name(&mut self, name: Name) {
        self.write_u64(name.as_u64());
    }

    pub fn read_name(&mut self) -> Result<Name, CodecError> {
        Ok(Name::from_u64(self.read_u64()?))
    }

    /// Varint length prefix followed by the raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        // Lengths above u32 cannot be represented on the wire.
        self.write_varuint32(bytes.len() as u32);
        self.write_raw(bytes);
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.read_varuint32()? as usize;
        self.read_raw(len)
    }

    pub fn write_string(&mut self, value: &str) {
        self.write_bytes(value.as_bytes());
    }

    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|e| CodecError::malformed(format!("invalid UTF-8 string: {e}")))
    }

    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    pub fn read_raw(&mut self, len: usize) -> Result<Vec<u8>, CodecError> {
        Ok(self.take(len)?.to_vec())
    }
}
