use tachyon_base::{err, ErrorKind, ReadLeExt, Reader, Result, WriteLeExt, Writer};

/// One block's entry in the linear index: identity, extent in the file,
/// extent on the genome, and the quad-tree bin span its variants used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRecord {
    pub block_id: u32,
    pub contig_id: i32,
    pub n_variants: u32,
    pub byte_offset: u64,
    pub byte_offset_end: u64,
    pub min_position: u64,
    pub max_position: u64,
    pub min_bin: u32,
    pub max_bin: u32,
}

impl Default for IndexRecord {
    fn default() -> Self {
        IndexRecord {
            block_id: 0,
            contig_id: -1,
            n_variants: 0,
            byte_offset: 0,
            byte_offset_end: 0,
            min_position: 0,
            max_position: 0,
            min_bin: u32::MAX,
            max_bin: 0,
        }
    }
}

impl IndexRecord {
    pub fn overlaps(&self, start: u64, end: u64) -> bool {
        self.min_position < end && self.max_position > start
    }

    pub fn write(&self, wr: &mut impl Writer) -> Result<()> {
        wr.write_le_num(self.block_id)?;
        wr.write_le_num(self.contig_id)?;
        wr.write_le_num(self.n_variants)?;
        wr.write_le_num(self.byte_offset)?;
        wr.write_le_num(self.byte_offset_end)?;
        wr.write_le_num(self.min_position)?;
        wr.write_le_num(self.max_position)?;
        wr.write_le_num(self.min_bin)?;
        wr.write_le_num(self.max_bin)?;
        Ok(())
    }

    pub fn read(rd: &mut impl Reader) -> Result<Self> {
        Ok(IndexRecord {
            block_id: rd.read_le_num::<u32>()?,
            contig_id: rd.read_le_num::<i32>()?,
            n_variants: rd.read_le_num::<u32>()?,
            byte_offset: rd.read_le_num::<u64>()?,
            byte_offset_end: rd.read_le_num::<u64>()?,
            min_position: rd.read_le_num::<u64>()?,
            max_position: rd.read_le_num::<u64>()?,
            min_bin: rd.read_le_num::<u32>()?,
            max_bin: rd.read_le_num::<u32>()?,
        })
    }
}

/// Append-only record-per-block index; insertion order is block order,
/// so block ids double as vector positions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinearIndex {
    records: Vec<IndexRecord>,
}

impl LinearIndex {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn add(&mut self, record: IndexRecord) -> Result<()> {
        if record.block_id as usize != self.records.len() {
            return Err(err(
                ErrorKind::Format,
                "linear index records must arrive in block order",
            ));
        }
        self.records.push(record);
        Ok(())
    }

    pub fn get(&self, block_id: u32) -> Option<&IndexRecord> {
        self.records.get(block_id as usize)
    }

    pub fn records(&self) -> &[IndexRecord] {
        &self.records
    }

    pub fn write(&self, wr: &mut impl Writer) -> Result<()> {
        wr.write_le_num(self.records.len() as u64)?;
        for record in &self.records {
            record.write(wr)?;
        }
        Ok(())
    }

    pub fn read(rd: &mut impl Reader) -> Result<Self> {
        let n = rd.read_le_num::<u64>()?;
        let mut records = Vec::with_capacity(n as usize);
        for _ in 0..n {
            records.push(IndexRecord::read(rd)?);
        }
        Ok(LinearIndex { records })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tachyon_base::MemWriter;
    use test_log::test;

    #[test]
    fn test_block_order_enforced() {
        let mut index = LinearIndex::default();
        index
            .add(IndexRecord {
                block_id: 0,
                ..IndexRecord::default()
            })
            .unwrap();
        let e = index
            .add(IndexRecord {
                block_id: 2,
                ..IndexRecord::default()
            })
            .unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_round_trip() {
        let mut index = LinearIndex::default();
        index
            .add(IndexRecord {
                block_id: 0,
                contig_id: 1,
                n_variants: 100,
                byte_offset: 64,
                byte_offset_end: 4096,
                min_position: 10,
                max_position: 9999,
                min_bin: 5460,
                max_bin: 5470,
            })
            .unwrap();
        let mut w = MemWriter::new();
        index.write(&mut w).unwrap();
        let mut r = w.try_into_reader().unwrap();
        assert_eq!(LinearIndex::read(&mut r).unwrap(), index);
    }
}
