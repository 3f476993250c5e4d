use bytes::{Buf, BufMut, Bytes};

use crate::mysql::ProtocolError;

/// Checked reads on a packet payload.
///
/// [`Buf`] getters panic on short input, a truncated packet from the server should be an error
/// instead.
pub trait BytesExt {
    fn try_u8(&mut self, phase: &'static str) -> Result<u8, ProtocolError>;

    fn try_u16_le(&mut self, phase: &'static str) -> Result<u16, ProtocolError>;

    fn try_u32_le(&mut self, phase: &'static str) -> Result<u32, ProtocolError>;

    /// Split `n` bytes off the front.
    fn try_split(&mut self, n: usize, phase: &'static str) -> Result<Bytes, ProtocolError>;

    /// Read a length encoded integer.
    ///
    /// Returns [`None`] for the `0xFB` marker, which is `NULL` in a text row.
    fn get_lenenc_int(&mut self, phase: &'static str) -> Result<Option<u64>, ProtocolError>;

    /// Read a length encoded string, [`None`] is `NULL`.
    fn get_lenenc_bytes(&mut self, phase: &'static str) -> Result<Option<Bytes>, ProtocolError>;

    /// Read a nul terminated string.
    ///
    /// Some servers omit the nul on the last field of a packet, in which case the rest of the
    /// payload is returned.
    fn get_nul_bytes(&mut self) -> Bytes;
}

/// Length encoded writes.
pub trait BufMutExt {
    /// Write string and nul termination.
    fn put_nul_bytes(&mut self, bytes: &[u8]);

    fn put_lenenc_int(&mut self, value: u64);

    fn put_lenenc_bytes(&mut self, bytes: &[u8]);
}

/// Size of `value` once length encoded.
pub fn lenenc_int_len(value: u64) -> usize {
    match value {
        0..=0xFA => 1,
        0xFB..=0xFF_FF => 3,
        0x1_00_00..=0xFF_FF_FF => 4,
        _ => 9,
    }
}

impl BytesExt for Bytes {
    fn try_u8(&mut self, phase: &'static str) -> Result<u8, ProtocolError> {
        if !self.has_remaining() {
            return Err(ProtocolError::truncated(phase));
        }
        Ok(self.get_u8())
    }

    fn try_u16_le(&mut self, phase: &'static str) -> Result<u16, ProtocolError> {
        if self.remaining() < 2 {
            return Err(ProtocolError::truncated(phase));
        }
        Ok(self.get_u16_le())
    }

    fn try_u32_le(&mut self, phase: &'static str) -> Result<u32, ProtocolError> {
        if self.remaining() < 4 {
            return Err(ProtocolError::truncated(phase));
        }
        Ok(self.get_u32_le())
    }

    fn try_split(&mut self, n: usize, phase: &'static str) -> Result<Bytes, ProtocolError> {
        if self.remaining() < n {
            return Err(ProtocolError::truncated(phase));
        }
        Ok(self.split_to(n))
    }

    fn get_lenenc_int(&mut self, phase: &'static str) -> Result<Option<u64>, ProtocolError> {
        let value = match self.try_u8(phase)? {
            0xFB => return Ok(None),
            0xFC => self.try_split(2, phase)?.get_u16_le() as u64,
            0xFD => self.try_split(3, phase)?.get_uint_le(3),
            0xFE => self.try_split(8, phase)?.get_u64_le(),
            0xFF => return Err(ProtocolError::unexpected(0xFF, phase)),
            n => n as u64,
        };
        Ok(Some(value))
    }

    fn get_lenenc_bytes(&mut self, phase: &'static str) -> Result<Option<Bytes>, ProtocolError> {
        match self.get_lenenc_int(phase)? {
            Some(len) => {
                let len = usize::try_from(len).map_err(|_|ProtocolError::truncated(phase))?;
                self.try_split(len, phase).map(Some)
            },
            None => Ok(None),
        }
    }

    fn get_nul_bytes(&mut self) -> Bytes {
        match self.iter().position(|&e| e == b'\0') {
            Some(end) => {
                let me = self.split_to(end);
                Buf::advance(self, 1); // nul
                me
            },
            None => self.split_off(0),
        }
    }
}

impl<B: BufMut> BufMutExt for B {
    fn put_nul_bytes(&mut self, bytes: &[u8]) {
        self.put(bytes);
        self.put_u8(b'\0');
    }

    fn put_lenenc_int(&mut self, value: u64) {
        match lenenc_int_len(value) {
            1 => self.put_u8(value as u8),
            3 => {
                self.put_u8(0xFC);
                self.put_u16_le(value as u16);
            },
            4 => {
                self.put_u8(0xFD);
                self.put_uint_le(value, 3);
            },
            _ => {
                self.put_u8(0xFE);
                self.put_u64_le(value);
            },
        }
    }

    fn put_lenenc_bytes(&mut self, bytes: &[u8]) {
        self.put_lenenc_int(bytes.len() as u64);
        self.put(bytes);
    }
}

/// Helper trait to [`Display`][std::fmt::Display] bytes.
pub trait FmtExt {
    /// Lossy [`Display`][std::fmt::Display] bytes.
    fn lossy(&self) -> LossyFmt<'_>;
}

/// Lossy [`Display`][std::fmt::Display] implementation for bytes.
pub struct LossyFmt<'a>(pub &'a [u8]);

impl FmtExt for [u8] {
    fn lossy(&self) -> LossyFmt<'_> {
        LossyFmt(self)
    }
}

impl std::fmt::Display for LossyFmt<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for chunk in self.0.utf8_chunks() {
            f.write_str(chunk.valid())?;
            for b in chunk.invalid() {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for LossyFmt<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use bytes::{Bytes, BytesMut};

    use super::*;

    #[test]
    fn lenenc_boundaries() {
        for value in [0, 250, 251, 0xFFFF, 0x1_00_00, 0xFF_FF_FF, 0x1_00_00_00, u64::MAX] {
            let mut buf = BytesMut::new();
            buf.put_lenenc_int(value);
            assert_eq!(buf.len(), lenenc_int_len(value));
            let mut bytes = buf.freeze();
            assert_eq!(bytes.get_lenenc_int("test").unwrap(), Some(value));
            assert!(bytes.is_empty());
        }
    }

    #[test]
    fn lenenc_null_marker() {
        let mut bytes = Bytes::from_static(b"\xFB\x03abc");
        assert_eq!(bytes.get_lenenc_bytes("test").unwrap(), None);
        assert_eq!(bytes.get_lenenc_bytes("test").unwrap().as_deref(), Some(&b"abc"[..]));
    }

    #[test]
    fn truncated_lenenc_string() {
        let mut bytes = Bytes::from_static(b"\x05ab");
        assert!(bytes.get_lenenc_bytes("test").is_err());
    }

    #[test]
    fn nul_string_without_terminator() {
        let mut bytes = Bytes::from_static(b"mysql_native_password\0rest");
        assert_eq!(&bytes.get_nul_bytes()[..], b"mysql_native_password");
        assert_eq!(&bytes.get_nul_bytes()[..], b"rest");
        assert!(bytes.is_empty());
    }
}
