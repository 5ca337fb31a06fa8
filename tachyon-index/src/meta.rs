use tachyon_base::{ReadLeExt, Reader, Result, WriteLeExt, Writer};

use crate::linear::IndexRecord;

/// Per-contig rollup of the linear index, kept current by incremental
/// merge as blocks are appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaEntry {
    pub contig_id: i32,
    pub n_blocks: u32,
    pub n_variants: u64,
    pub byte_offset_begin: u64,
    pub byte_offset_end: u64,
    pub min_position: u64,
    pub max_position: u64,
    pub start_block: u32,
    pub end_block: u32,
}

impl Default for MetaEntry {
    fn default() -> Self {
        MetaEntry {
            contig_id: -1,
            n_blocks: 0,
            n_variants: 0,
            byte_offset_begin: 0,
            byte_offset_end: 0,
            min_position: u64::MAX,
            max_position: 0,
            start_block: u32::MAX,
            end_block: 0,
        }
    }
}

impl MetaEntry {
    /// Fold one block's record into the totals.
    pub fn absorb(&mut self, record: &IndexRecord) {
        if self.n_blocks == 0 {
            self.contig_id = record.contig_id;
            self.byte_offset_begin = record.byte_offset;
        }
        self.n_blocks += 1;
        self.n_variants += record.n_variants as u64;
        self.byte_offset_end = record.byte_offset_end;
        self.min_position = self.min_position.min(record.min_position);
        self.max_position = self.max_position.max(record.max_position);
        self.start_block = self.start_block.min(record.block_id);
        self.end_block = self.end_block.max(record.block_id);
    }

    pub fn write(&self, wr: &mut impl Writer) -> Result<()> {
        wr.write_le_num(self.contig_id)?;
        wr.write_le_num(self.n_blocks)?;
        wr.write_le_num(self.n_variants)?;
        wr.write_le_num(self.byte_offset_begin)?;
        wr.write_le_num(self.byte_offset_end)?;
        wr.write_le_num(self.min_position)?;
        wr.write_le_num(self.max_position)?;
        wr.write_le_num(self.start_block)?;
        wr.write_le_num(self.end_block)?;
        Ok(())
    }

    pub fn read(rd: &mut impl Reader) -> Result<Self> {
        Ok(MetaEntry {
            contig_id: rd.read_le_num::<i32>()?,
            n_blocks: rd.read_le_num::<u32>()?,
            n_variants: rd.read_le_num::<u64>()?,
            byte_offset_begin: rd.read_le_num::<u64>()?,
            byte_offset_end: rd.read_le_num::<u64>()?,
            min_position: rd.read_le_num::<u64>()?,
            max_position: rd.read_le_num::<u64>()?,
            start_block: rd.read_le_num::<u32>()?,
            end_block: rd.read_le_num::<u32>()?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn test_absorb_accumulates() {
        let mut meta = MetaEntry::default();
        meta.absorb(&IndexRecord {
            block_id: 3,
            contig_id: 1,
            n_variants: 10,
            byte_offset: 100,
            byte_offset_end: 200,
            min_position: 50,
            max_position: 90,
            ..IndexRecord::default()
        });
        meta.absorb(&IndexRecord {
            block_id: 4,
            contig_id: 1,
            n_variants: 5,
            byte_offset: 200,
            byte_offset_end: 320,
            min_position: 95,
            max_position: 140,
            ..IndexRecord::default()
        });
        assert_eq!(meta.n_blocks, 2);
        assert_eq!(meta.n_variants, 15);
        assert_eq!(meta.byte_offset_begin, 100);
        assert_eq!(meta.byte_offset_end, 320);
        assert_eq!(meta.min_position, 50);
        assert_eq!(meta.max_position, 140);
        assert_eq!((meta.start_block, meta.end_block), (3, 4));
    }
}
