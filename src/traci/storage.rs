//! Big-endian encoding and decoding of TraCI messages.
//!
//! A message is an `i32` total length (including the length field itself)
//! followed by commands. A command is a `u8` length (including the length
//! byte and the command ID), the command ID and its content. Commands longer
//! than 255 bytes use a zero length byte followed by an `i32` length.

use super::constants::*;
use crate::math::Point2d;
use crate::{Error, Result};

/// The largest command that fits a single length byte.
const MAX_SHORT_COMMAND: usize = u8::MAX as usize;

/// A growable buffer of encoded TraCI values.
#[derive(Clone, Debug, Default)]
pub struct Storage {
    buf: Vec<u8>,
}

impl Storage {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_string(&mut self, value: &str) {
        self.write_i32(value.len() as i32);
        self.buf.extend_from_slice(value.as_bytes());
    }

    pub fn write_string_list(&mut self, values: &[String]) {
        self.write_i32(values.len() as i32);
        for value in values {
            self.write_string(value);
        }
    }

    /// Appends a framed command.
    pub fn write_command(&mut self, id: u8, content: &[u8]) {
        let short_len = content.len() + 2;
        if short_len <= MAX_SHORT_COMMAND {
            self.write_u8(short_len as u8);
        } else {
            self.write_u8(0);
            self.write_i32((content.len() + 6) as i32);
        }
        self.write_u8(id);
        self.buf.extend_from_slice(content);
    }

    /// Wraps the buffered commands in a message, prefixing the total length.
    pub fn into_message(self) -> Vec<u8> {
        let mut message = Vec::with_capacity(self.buf.len() + 4);
        message.extend_from_slice(&((self.buf.len() + 4) as i32).to_be_bytes());
        message.extend(self.buf);
        message
    }
}

/// Reads TraCI values from a byte slice.
#[derive(Clone, Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// The bytes which have not been read yet.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos + len;
        let bytes = self.buf.get(self.pos..end).ok_or_else(|| {
            Error::Protocol(format!(
                "needed {} bytes at offset {} but the response has {}",
                len,
                self.pos,
                self.buf.len()
            ))
        })?;
        self.pos = end;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut array = [0; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_be_bytes(self.take_array()?))
    }

    /// Reads a non-negative `i32` used as a length or count.
    fn read_len(&mut self) -> Result<usize> {
        let len = self.read_i32()?;
        usize::try_from(len).map_err(|_| Error::Protocol(format!("negative length {}", len)))
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_len()?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|err| Error::Protocol(format!("string is not valid UTF-8: {}", err)))
    }

    pub fn read_string_list(&mut self) -> Result<Vec<String>> {
        let count = self.read_len()?;
        (0..count).map(|_| self.read_string()).collect()
    }

    /// Reads a command header, returning the command ID and the length of its content.
    pub fn read_command_header(&mut self) -> Result<(u8, usize)> {
        let (len, header) = match self.read_u8()? {
            0 => (self.read_len()?, 6),
            len => (len as usize, 2),
        };
        let id = self.read_u8()?;
        let content = len
            .checked_sub(header)
            .ok_or_else(|| Error::Protocol(format!("command length {} is too short", len)))?;
        Ok((id, content))
    }

    /// Reads a type tag, failing if it is not `expected`.
    pub fn expect_type(&mut self, expected: u8) -> Result<()> {
        match self.read_u8()? {
            ty if ty == expected => Ok(()),
            ty => Err(Error::Protocol(format!(
                "expected value of type 0x{:02x}, got 0x{:02x}",
                expected, ty
            ))),
        }
    }

    pub fn read_typed_i32(&mut self) -> Result<i32> {
        self.expect_type(TYPE_INTEGER)?;
        self.read_i32()
    }

    pub fn read_typed_f64(&mut self) -> Result<f64> {
        self.expect_type(TYPE_DOUBLE)?;
        self.read_f64()
    }

    pub fn read_typed_string_list(&mut self) -> Result<Vec<String>> {
        self.expect_type(TYPE_STRINGLIST)?;
        self.read_string_list()
    }

    pub fn read_typed_position(&mut self) -> Result<Point2d> {
        self.expect_type(POSITION_2D)?;
        Ok(Point2d::new(self.read_f64()?, self.read_f64()?))
    }
}
