use tachyon_base::{ReadLeExt, Reader, Result, WriteLeExt, Writer};

/// One quad-tree bin: the block ids whose intervals collapsed into this
/// node, kept sorted and deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexBin {
    pub bin_id: u32,
    pub n_variants: u32,
    blocks: Vec<u32>,
}

impl IndexBin {
    pub fn new(bin_id: u32) -> Self {
        IndexBin {
            bin_id,
            n_variants: 0,
            blocks: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[u32] {
        &self.blocks
    }

    /// Record one variant of `block_id` in this bin. Blocks arrive in
    /// ascending order during import, so suppressing an adjacent
    /// duplicate keeps the vector sorted and unique.
    pub fn add(&mut self, block_id: u32) {
        if self.blocks.last() != Some(&block_id) {
            self.blocks.push(block_id);
        }
        self.n_variants += 1;
    }

    /// Merge another bin's blocks (index concatenation); re-sorts and
    /// dedupes since the inputs may interleave.
    pub fn merge(&mut self, other: &IndexBin) {
        self.n_variants += other.n_variants;
        self.blocks.extend_from_slice(&other.blocks);
        self.blocks.sort_unstable();
        self.blocks.dedup();
    }

    pub fn write(&self, wr: &mut impl Writer) -> Result<()> {
        wr.write_le_num(self.bin_id)?;
        wr.write_le_num(self.n_variants)?;
        wr.write_le_num(self.blocks.len() as u32)?;
        for &block in &self.blocks {
            wr.write_le_num(block)?;
        }
        Ok(())
    }

    pub fn read(rd: &mut impl Reader) -> Result<Self> {
        let bin_id = rd.read_le_num::<u32>()?;
        let n_variants = rd.read_le_num::<u32>()?;
        let n_blocks = rd.read_le_num::<u32>()?;
        let mut blocks = Vec::with_capacity(n_blocks as usize);
        for _ in 0..n_blocks {
            blocks.push(rd.read_le_num::<u32>()?);
        }
        Ok(IndexBin {
            bin_id,
            n_variants,
            blocks,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn test_adjacent_duplicates_collapse() {
        let mut bin = IndexBin::new(9);
        bin.add(4);
        bin.add(4);
        bin.add(5);
        assert_eq!(bin.blocks(), &[4, 5]);
        assert_eq!(bin.n_variants, 3);
    }

    #[test]
    fn test_merge_sorts_and_dedupes() {
        let mut a = IndexBin::new(0);
        a.add(7);
        a.add(2);
        let mut b = IndexBin::new(0);
        b.add(2);
        b.add(5);
        a.merge(&b);
        assert_eq!(a.blocks(), &[2, 5, 7]);
    }
}
