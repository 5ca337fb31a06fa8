use std::collections::HashMap;

use tachyon_base::{
    err, hash64_u32s_seeded, ErrorKind, ReadLeExt, Reader, Result, WriteLeExt, Writer,
    PATTERN_SEED,
};

/// Distinct sets of global field ids observed across a block, one table
/// per category (INFO, FORMAT, FILTER). A pattern id is a 16-bit index
/// issued on first sight of a sorted key tuple.
#[derive(Debug, Default, Clone)]
pub struct PatternTable {
    patterns: Vec<Vec<u32>>,
    by_hash: HashMap<u64, u16>,
}

impl PatternTable {
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn pattern(&self, id: u16) -> Option<&[u32]> {
        self.patterns.get(id as usize).map(|p| p.as_slice())
    }

    pub fn patterns(&self) -> &[Vec<u32>] {
        &self.patterns
    }

    pub fn reset(&mut self) {
        self.patterns.clear();
        self.by_hash.clear();
    }

    /// Intern a key set. `keys` must already be sorted ascending; the hash
    /// of the tuple is the lookup key, so equal sets always map to the
    /// same id within a block.
    pub fn id_for(&mut self, keys: &[u32]) -> Result<u16> {
        debug_assert!(keys.windows(2).all(|w| w[0] <= w[1]));
        let hash = hash64_u32s_seeded(keys, PATTERN_SEED);
        if let Some(&id) = self.by_hash.get(&hash) {
            return Ok(id);
        }
        if self.patterns.len() >= u16::MAX as usize {
            return Err(err(
                ErrorKind::Oversize,
                "pattern table exceeds 16-bit id space",
            ));
        }
        let id = self.patterns.len() as u16;
        self.patterns.push(keys.to_vec());
        self.by_hash.insert(hash, id);
        Ok(id)
    }
}

/// Pattern participation matrix: one row per pattern, one bit per local
/// key. Row width is ceil(K/8) bytes where K is the number of keys the
/// block observed in this category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitMatrix {
    row_bytes: usize,
    n_rows: usize,
    bits: Vec<u8>,
}

impl BitMatrix {
    /// Build the matrix from interned patterns against the block's
    /// observed key list: row[p][i] = 1 iff keys[i] participates in
    /// pattern p.
    pub fn build(patterns: &[Vec<u32>], keys: &[u32]) -> Self {
        let row_bytes = keys.len().div_ceil(8);
        let mut matrix = BitMatrix {
            row_bytes,
            n_rows: patterns.len(),
            bits: vec![0; row_bytes * patterns.len()],
        };
        for (row, pattern) in patterns.iter().enumerate() {
            for key in pattern {
                if let Some(col) = keys.iter().position(|k| k == key) {
                    matrix.set(row, col);
                }
            }
        }
        matrix
    }

    fn set(&mut self, row: usize, col: usize) {
        self.bits[row * self.row_bytes + col / 8] |= 1 << (col % 8);
    }

    pub fn get(&self, row: usize, col: usize) -> bool {
        if row >= self.n_rows || col / 8 >= self.row_bytes {
            return false;
        }
        self.bits[row * self.row_bytes + col / 8] & (1 << (col % 8)) != 0
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn row_bytes(&self) -> usize {
        self.row_bytes
    }

    pub fn row(&self, row: usize) -> &[u8] {
        &self.bits[row * self.row_bytes..(row + 1) * self.row_bytes]
    }

    pub fn write(&self, wr: &mut impl Writer) -> Result<()> {
        wr.write_le_num(self.n_rows as u16)?;
        wr.write_le_num(self.row_bytes as u16)?;
        wr.write_byte_slice(&self.bits)?;
        Ok(())
    }

    pub fn read(rd: &mut impl Reader) -> Result<Self> {
        let n_rows = rd.read_le_num::<u16>()? as usize;
        let row_bytes = rd.read_le_num::<u16>()? as usize;
        let bits = rd.read_byte_vec(n_rows * row_bytes)?;
        Ok(BitMatrix {
            row_bytes,
            n_rows,
            bits,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tachyon_base::MemWriter;
    use test_log::test;

    #[test]
    fn test_pattern_interning_is_stable() {
        let mut table = PatternTable::default();
        assert_eq!(table.id_for(&[1, 5, 9]).unwrap(), 0);
        assert_eq!(table.id_for(&[5]).unwrap(), 1);
        assert_eq!(table.id_for(&[1, 5, 9]).unwrap(), 0);
        assert_eq!(table.len(), 2);
        assert_eq!(table.pattern(1), Some(&[5_u32][..]));
    }

    #[test]
    fn test_matrix_bits_follow_local_key_order() {
        let patterns = vec![vec![3, 7], vec![7], vec![3, 7, 11]];
        // Local key order is first-observation order, not sorted order.
        let keys = vec![7, 3, 11];
        let m = BitMatrix::build(&patterns, &keys);
        assert!(m.get(0, 0) && m.get(0, 1) && !m.get(0, 2));
        assert!(m.get(1, 0) && !m.get(1, 1));
        assert!(m.get(2, 0) && m.get(2, 1) && m.get(2, 2));
    }

    #[test]
    fn test_matrix_round_trip() {
        let m = BitMatrix::build(&[vec![0, 2], vec![1]], &[0, 1, 2]);
        let mut w = MemWriter::new();
        m.write(&mut w).unwrap();
        let mut r = w.try_into_reader().unwrap();
        assert_eq!(BitMatrix::read(&mut r).unwrap(), m);
    }
}
