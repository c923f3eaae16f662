//! 小端字节记录的写入与读取游标

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::errors::{GraphError, Result};

/// Little-endian record builder.
#[derive(Debug, Default, Clone)]
pub struct Datagram {
    buf: BytesMut,
}

impl Datagram {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn add_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn add_u16(&mut self, value: u16) {
        self.buf.put_u16_le(value);
    }

    pub fn add_u32(&mut self, value: u32) {
        self.buf.put_u32_le(value);
    }

    pub fn add_i32(&mut self, value: i32) {
        self.buf.put_i32_le(value);
    }

    pub fn add_f32(&mut self, value: f32) {
        self.buf.put_f32_le(value);
    }

    /// 字符串按 `u16` 长度加 UTF-8 字节写入
    pub fn add_string(&mut self, value: &str) {
        debug_assert!(value.len() <= usize::from(u16::MAX));
        self.buf.put_u16_le(value.len() as u16);
        self.buf.put_slice(value.as_bytes());
    }

    pub fn add_bytes(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    #[must_use]
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Read cursor over a frozen datagram.
#[derive(Debug, Clone)]
pub struct DatagramIter {
    buf: Bytes,
}

impl DatagramIter {
    #[must_use]
    pub fn new(bytes: Bytes) -> Self {
        Self { buf: bytes }
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, needed: usize) -> Result<()> {
        if self.buf.remaining() < needed {
            return Err(GraphError::DatagramUnderflow {
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16_le())
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        self.need(4)?;
        Ok(self.buf.get_i32_le())
    }

    pub fn get_f32(&mut self) -> Result<f32> {
        self.need(4)?;
        Ok(self.buf.get_f32_le())
    }

    pub fn get_string(&mut self) -> Result<String> {
        let len = usize::from(self.get_u16()?);
        self.need(len)?;
        let bytes = self.buf.split_to(len);
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    /// 切出接下来 `len` 字节作为一个独立的子游标
    pub fn split_record(&mut self, len: usize) -> Result<DatagramIter> {
        self.need(len)?;
        Ok(DatagramIter {
            buf: self.buf.split_to(len),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_scalars_and_strings() {
        let mut dg = Datagram::new();
        dg.add_u8(7);
        dg.add_u16(300);
        dg.add_u32(70_000);
        dg.add_i32(-5);
        dg.add_string("root");

        let mut iter = DatagramIter::new(dg.freeze());
        assert_eq!(iter.get_u8().unwrap(), 7);
        assert_eq!(iter.get_u16().unwrap(), 300);
        assert_eq!(iter.get_u32().unwrap(), 70_000);
        assert_eq!(iter.get_i32().unwrap(), -5);
        assert_eq!(iter.get_string().unwrap(), "root");
        assert_eq!(iter.remaining(), 0);
    }

    #[test]
    fn underflow_is_an_error() {
        let mut dg = Datagram::new();
        dg.add_u8(1);
        let mut iter = DatagramIter::new(dg.freeze());
        assert!(iter.get_u32().is_err());
    }
}
