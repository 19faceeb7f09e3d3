//! Register blocks and the cursor that decodes them
//!
//! The EM530/EM540 family transmits multi-register integers with the
//! least-significant register first while keeping big-endian byte order
//! inside each register. [`PayloadCursor`] reproduces that layout and refuses
//! to read past the end of a block.

use crate::error::{ExporterError, Result};

/// Contiguous run of holding registers returned by one block read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterBlock {
    start: u16,
    words: Vec<u16>,
}

impl RegisterBlock {
    pub fn new(start: u16, words: Vec<u16>) -> Self {
        Self { start, words }
    }

    /// First register address covered by the block
    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn words(&self) -> &[u16] {
        &self.words
    }

    /// Start a decode pass over this block
    pub fn cursor(&self) -> PayloadCursor<'_> {
        PayloadCursor::new(self)
    }
}

/// Sequential decoder over a [`RegisterBlock`]
#[derive(Debug)]
pub struct PayloadCursor<'a> {
    words: &'a [u16],
    offset: usize,
}

impl<'a> PayloadCursor<'a> {
    pub fn new(block: &'a RegisterBlock) -> Self {
        Self {
            words: block.words(),
            offset: 0,
        }
    }

    /// Current read offset in words
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Words left before the end of the block
    pub fn remaining(&self) -> usize {
        self.words.len() - self.offset
    }

    /// Consume `count` words, or fail without moving the offset
    fn take(&mut self, count: usize) -> Result<&'a [u16]> {
        if count > self.remaining() {
            return Err(ExporterError::truncated(
                self.offset,
                count,
                self.words.len(),
            ));
        }
        let words = &self.words[self.offset..self.offset + count];
        self.offset += count;
        Ok(words)
    }

    pub fn decode_u16(&mut self) -> Result<u16> {
        Ok(self.take(1)?[0])
    }

    pub fn decode_i16(&mut self) -> Result<i16> {
        Ok(self.take(1)?[0] as i16)
    }

    /// Two words, low word first
    pub fn decode_i32(&mut self) -> Result<i32> {
        let w = self.take(2)?;
        Ok(((u32::from(w[1]) << 16) | u32::from(w[0])) as i32)
    }

    /// Four words, low word first
    pub fn decode_i64(&mut self) -> Result<i64> {
        let w = self.take(4)?;
        let raw = w
            .iter()
            .rev()
            .fold(0u64, |acc, &word| (acc << 16) | u64::from(word));
        Ok(raw as i64)
    }

    /// `word_count` words of ASCII, high byte first within each word, with
    /// trailing NUL and space padding removed.
    pub fn decode_fixed_string(&mut self, word_count: usize) -> Result<String> {
        let words = self.take(word_count)?;
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
        let text: String = bytes
            .iter()
            .map(|&b| if b.is_ascii() { b as char } else { '?' })
            .collect();
        Ok(text.trim_end_matches(['\0', ' ']).to_string())
    }

    /// Step over reserved registers
    pub fn skip(&mut self, word_count: usize) -> Result<()> {
        self.take(word_count).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(words: &[u16]) -> RegisterBlock {
        RegisterBlock::new(0, words.to_vec())
    }

    #[test]
    fn test_decode_i32_low_word_first() {
        let b = block(&[0x5678, 0x1234]);
        assert_eq!(b.cursor().decode_i32().unwrap(), 0x1234_5678);

        let b = block(&[2300, 0]);
        assert_eq!(b.cursor().decode_i32().unwrap(), 2300);
    }

    #[test]
    fn test_decode_i32_negative() {
        // -1500 = 0xFFFF_FA24
        let b = block(&[0xFA24, 0xFFFF]);
        assert_eq!(b.cursor().decode_i32().unwrap(), -1500);

        let b = block(&[0x0000, 0x8000]);
        assert_eq!(b.cursor().decode_i32().unwrap(), i32::MIN);
    }

    #[test]
    fn test_decode_i64_low_word_first() {
        let b = block(&[0x4444, 0x3333, 0x2222, 0x1111]);
        assert_eq!(b.cursor().decode_i64().unwrap(), 0x1111_2222_3333_4444);

        let b = block(&[0xFFFE, 0xFFFF, 0xFFFF, 0xFFFF]);
        assert_eq!(b.cursor().decode_i64().unwrap(), -2);
    }

    #[test]
    fn test_decode_i16_and_u16() {
        let b = block(&[0xFC18, 0xFC18, 1000]);
        let mut c = b.cursor();
        assert_eq!(c.decode_i16().unwrap(), -1000);
        assert_eq!(c.decode_u16().unwrap(), 0xFC18);
        assert_eq!(c.decode_i16().unwrap(), 1000);
        assert_eq!(c.remaining(), 0);
    }

    #[test]
    fn test_decode_fixed_string_trims_padding() {
        // "AB12 " followed by NUL padding
        let b = block(&[0x4142, 0x3132, 0x2000, 0x0000]);
        assert_eq!(b.cursor().decode_fixed_string(4).unwrap(), "AB12");
    }

    #[test]
    fn test_skip_advances_offset() {
        let b = block(&[0, 0, 0, 7, 0]);
        let mut c = b.cursor();
        c.skip(3).unwrap();
        assert_eq!(c.offset(), 3);
        assert_eq!(c.decode_i32().unwrap(), 7);
    }

    #[test]
    fn test_truncated_read_fails_and_keeps_offset() {
        let b = block(&[1, 2, 3]);
        let mut c = b.cursor();
        c.decode_i16().unwrap();
        let err = c.decode_i64().unwrap_err();
        assert!(matches!(
            err,
            ExporterError::TruncatedPayload {
                offset: 1,
                needed: 4,
                len: 3
            }
        ));
        assert_eq!(c.offset(), 1);
        assert_eq!(c.decode_i32().unwrap(), (3 << 16) | 2);
        assert!(c.decode_i16().is_err());
        assert!(c.skip(1).is_err());
    }

    #[test]
    fn test_empty_block() {
        let b = block(&[]);
        assert!(b.is_empty());
        let mut c = b.cursor();
        assert!(c.decode_i16().is_err());
        assert!(c.decode_fixed_string(1).is_err());
        assert!(c.skip(0).is_ok());
    }
}
