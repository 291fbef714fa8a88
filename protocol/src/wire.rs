//! Binary framing for the account/game/chat backbone.
//!
//! Ground: `examples/allanbatista-mu-rust/protocol/src/header.rs`, which
//! translates the legacy C++ packet headers (a 1-byte "type", a length
//! field, a 1-byte "head" message id) into Rust structs. This backbone
//! generalizes that shape to spec §6's framing: a 16-bit message id
//! followed by typed fields (`i8`/`i16`/`i32`/fixed 8-byte `double`/
//! 16-bit-length-prefixed UTF-8 strings), carried over a 4-byte
//! length-prefixed frame on a reliable ordered stream (TCP) instead of
//! the legacy 1-byte "type/size" header, because this protocol's message
//! catalogue and payloads (character rosters, mail, inventories) don't
//! fit in a byte-sized length.

use crate::error::CodecError;

/// Maximum size of a single frame body, including the message id.
/// Generous enough for a full character roster or mailbox dump while
/// still bounding a malicious peer's ability to make us allocate.
pub const MAX_FRAME_BODY: usize = 1 << 20;

/// Maximum length of a length-prefixed wire string (16-bit length prefix).
pub const MAX_WIRE_STRING: usize = u16::MAX as usize;

/// A 16-bit message identifier, per spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub u16);

/// Growable little-endian byte writer matching spec §6's field primitives.
#[derive(Debug, Default, Clone)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    #[must_use]
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn write_i8(&mut self, v: i8) {
        self.buf.push(v as u8);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    pub fn write_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Length-prefixed (16-bit) UTF-8 string, per spec §6.
    ///
    /// # Panics
    /// Panics if `s` exceeds [`MAX_WIRE_STRING`] bytes — callers are
    /// expected to validate field lengths against configuration limits
    /// (spec §4.3/§4.5 name-length rules) well before reaching the wire.
    pub fn write_str(&mut self, s: &str) {
        let bytes = s.as_bytes();
        assert!(
            bytes.len() <= MAX_WIRE_STRING,
            "string exceeds max wire length"
        );
        self.write_u16(bytes.len() as u16);
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor-based little-endian byte reader matching [`Writer`].
#[derive(Debug, Clone, Copy)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEof {
                needed: n - self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_i8(&mut self) -> Result<i8, CodecError> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_i16(&mut self) -> Result<i16, CodecError> {
        let b = self.take(2)?;
        Ok(i16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn read_f64(&mut self) -> Result<f64, CodecError> {
        let b = self.take(8)?;
        Ok(f64::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn read_str(&mut self) -> Result<String, CodecError> {
        let len = self.read_u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, CodecError> {
        Ok(self.take(n)?.to_vec())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}

/// One complete message: an id plus its already-encoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: MessageId,
    pub body: Vec<u8>,
}

impl Frame {
    /// Encodes `self` as `[u32 total_len][u16 id][body]` and appends it to
    /// `out`. `total_len` counts the id and body but not itself.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        let total_len = 2 + self.body.len();
        out.extend_from_slice(&(total_len as u32).to_le_bytes());
        out.extend_from_slice(&self.id.0.to_le_bytes());
        out.extend_from_slice(&self.body);
    }

    /// Attempts to decode one frame from the front of `buf`.
    ///
    /// Returns `Ok(Some((frame, consumed)))` when a complete frame is
    /// present, `Ok(None)` when `buf` holds only a partial frame (the
    /// caller should read more bytes from the stream and retry), or an
    /// error for a frame that declares an impossible size.
    pub fn try_decode(buf: &[u8]) -> Result<Option<(Frame, usize)>, CodecError> {
        if buf.len() < 4 {
            return Ok(None);
        }
        let total_len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if total_len < 2 {
            return Err(CodecError::UnexpectedEof { needed: 2 });
        }
        if total_len - 2 > MAX_FRAME_BODY {
            return Err(CodecError::FrameTooLarge {
                len: total_len - 2,
                max: MAX_FRAME_BODY,
            });
        }
        if buf.len() < 4 + total_len {
            return Ok(None);
        }

        let id = u16::from_le_bytes([buf[4], buf[5]]);
        let body = buf[6..4 + total_len].to_vec();
        Ok(Some((
            Frame {
                id: MessageId(id),
                body,
            },
            4 + total_len,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_primitive_fields() {
        let mut w = Writer::new();
        w.write_i8(-5);
        w.write_i16(-1000);
        w.write_i32(123_456_789);
        w.write_f64(3.5);
        w.write_str("hello");
        let bytes = w.into_bytes();

        let mut r = Reader::new(&bytes);
        assert_eq!(r.read_i8().unwrap(), -5);
        assert_eq!(r.read_i16().unwrap(), -1000);
        assert_eq!(r.read_i32().unwrap(), 123_456_789);
        assert_eq!(r.read_f64().unwrap(), 3.5);
        assert_eq!(r.read_str().unwrap(), "hello");
        assert!(r.is_empty());
    }

    #[test]
    fn short_read_is_an_error() {
        let mut r = Reader::new(&[1, 2]);
        assert!(r.read_i32().is_err());
    }

    #[test]
    fn frame_roundtrip() {
        let frame = Frame {
            id: MessageId(42),
            body: vec![1, 2, 3, 4],
        };
        let mut buf = Vec::new();
        frame.encode_into(&mut buf);

        let (decoded, consumed) = Frame::try_decode(&buf).unwrap().unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn frame_partial_buffer_returns_none() {
        let frame = Frame {
            id: MessageId(1),
            body: vec![0; 10],
        };
        let mut buf = Vec::new();
        frame.encode_into(&mut buf);
        buf.truncate(buf.len() - 3);

        assert!(Frame::try_decode(&buf).unwrap().is_none());
    }

    #[test]
    fn frame_two_in_buffer() {
        let a = Frame {
            id: MessageId(1),
            body: vec![9],
        };
        let b = Frame {
            id: MessageId(2),
            body: vec![8, 7],
        };
        let mut buf = Vec::new();
        a.encode_into(&mut buf);
        b.encode_into(&mut buf);

        let (first, used1) = Frame::try_decode(&buf).unwrap().unwrap();
        assert_eq!(first, a);
        let (second, used2) = Frame::try_decode(&buf[used1..]).unwrap().unwrap();
        assert_eq!(second, b);
        assert_eq!(used1 + used2, buf.len());
    }
}
