use crate::error::{err, ErrorKind, Result};

/// Growable byte arena with width-aware primitive access. All multibyte
/// values are little-endian on disk. There is no implicit type tagging:
/// the caller reads back the primitive width it wrote.
#[derive(Clone, Default, PartialEq, Eq, Debug, Hash)]
pub struct TypedBuffer {
    data: Vec<u8>,
    cursor: usize,
}

impl TypedBuffer {
    pub fn new() -> Self {
        TypedBuffer {
            data: Vec::new(),
            cursor: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        TypedBuffer {
            data: Vec::with_capacity(capacity),
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub fn reserve(&mut self, additional: usize) {
        self.data.reserve(additional);
    }

    /// Drop contents but keep the allocation; blocks recycle their
    /// containers between flushes.
    pub fn clear(&mut self) {
        self.data.clear();
        self.cursor = 0;
    }

    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
        if self.cursor > len {
            self.cursor = len;
        }
    }

    /// Replace the contents wholesale. Used when a sealed stream is
    /// rewritten at a narrower width or swapped for ciphertext.
    pub fn replace(&mut self, bytes: Vec<u8>) {
        self.data = bytes;
        self.cursor = 0;
    }

    pub fn crc32(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.data);
        hasher.finalize()
    }

    // Appends.

    pub fn put_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    pub fn put_i8(&mut self, value: i8) {
        self.data.push(value as u8);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_i16(&mut self, value: i16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_i32(&mut self, value: i32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u64(&mut self, value: u64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_i64(&mut self, value: i64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_f32(&mut self, value: f32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_f64(&mut self, value: f64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_char(&mut self, value: u8) {
        self.data.push(value);
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Append the low `width` little-endian bytes of `value`. The genotype
    /// bitstreams and the permutation array are written this way so a run
    /// word lands at exactly its chosen machine width.
    pub fn put_uint_at_width(&mut self, value: u64, width: usize) {
        debug_assert!(matches!(width, 1 | 2 | 4 | 8));
        self.data.extend_from_slice(&value.to_le_bytes()[..width]);
    }

    // Cursor reads.

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    pub fn seek_to(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(err(ErrorKind::Truncation, "buffer seek past end"));
        }
        self.cursor = pos;
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    fn take(&mut self, n: usize) -> Result<&[u8]> {
        if self.cursor + n > self.data.len() {
            return Err(err(ErrorKind::Truncation, "buffer read past end"));
        }
        let slice = &self.data[self.cursor..self.cursor + n];
        self.cursor += n;
        Ok(slice)
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn get_i8(&mut self) -> Result<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn get_i16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn get_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn get_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn get_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn get_bytes(&mut self, n: usize) -> Result<&[u8]> {
        self.take(n)
    }

    /// Read a `width`-byte little-endian unsigned integer, zero-extended.
    pub fn get_uint_at_width(&mut self, width: usize) -> Result<u64> {
        let slice = self.take(width)?;
        let mut raw = [0u8; 8];
        raw[..width].copy_from_slice(slice);
        Ok(u64::from_le_bytes(raw))
    }
}

impl From<Vec<u8>> for TypedBuffer {
    fn from(data: Vec<u8>) -> Self {
        TypedBuffer { data, cursor: 0 }
    }
}

#[cfg(test)]
mod test {
    use super::TypedBuffer;
    use test_log::test;

    #[test]
    fn test_round_trip_primitives() {
        let mut buf = TypedBuffer::new();
        buf.put_u8(0xab);
        buf.put_i32(-12345);
        buf.put_u64(0xdead_beef_0102_0304);
        buf.put_f32(0.25);
        assert_eq!(buf.len(), 1 + 4 + 8 + 4);

        assert_eq!(buf.get_u8().unwrap(), 0xab);
        assert_eq!(buf.get_i32().unwrap(), -12345);
        assert_eq!(buf.get_u64().unwrap(), 0xdead_beef_0102_0304);
        assert_eq!(buf.get_f32().unwrap(), 0.25);
        assert!(buf.get_u8().is_err());
    }

    #[test]
    fn test_width_restricted_words() {
        let mut buf = TypedBuffer::new();
        buf.put_uint_at_width(0x01_02_03, 4);
        buf.put_uint_at_width(0xff, 1);
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.get_uint_at_width(4).unwrap(), 0x01_02_03);
        assert_eq!(buf.get_uint_at_width(1).unwrap(), 0xff);
    }

    #[test]
    fn test_crc_changes_with_content() {
        let mut a = TypedBuffer::new();
        a.put_u32(7);
        let mut b = TypedBuffer::new();
        b.put_u32(8);
        assert_ne!(a.crc32(), b.crc32());
    }
}
