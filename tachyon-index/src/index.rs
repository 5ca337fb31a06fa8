use tachyon_base::{err, ErrorKind, ReadLeExt, Reader, Result, WriteLeExt, Writer};

use crate::contig::{ContigIndex, DEFAULT_LEVELS};
use crate::linear::{IndexRecord, LinearIndex};
use crate::meta::MetaEntry;

/// Archive-level index: one quad-tree per contig for interval pruning,
/// the linear index for block addressing, and per-contig rollups.
#[derive(Debug, Default)]
pub struct VariantIndex {
    contigs: Vec<ContigIndex>,
    meta: Vec<MetaEntry>,
    linear: LinearIndex,
}

impl VariantIndex {
    pub fn new(contig_lengths: &[u64]) -> Self {
        Self::with_levels(contig_lengths, DEFAULT_LEVELS)
    }

    pub fn with_levels(contig_lengths: &[u64], n_levels: u8) -> Self {
        let contigs = contig_lengths
            .iter()
            .enumerate()
            .map(|(id, &length)| ContigIndex::new(id as u32, length, n_levels))
            .collect::<Vec<ContigIndex>>();
        let meta = vec![MetaEntry::default(); contig_lengths.len()];
        VariantIndex {
            contigs,
            meta,
            linear: LinearIndex::default(),
        }
    }

    pub fn n_contigs(&self) -> usize {
        self.contigs.len()
    }

    pub fn n_blocks(&self) -> usize {
        self.linear.len()
    }

    pub fn linear(&self) -> &LinearIndex {
        &self.linear
    }

    pub fn meta(&self, contig_id: u32) -> Option<&MetaEntry> {
        self.meta.get(contig_id as usize)
    }

    /// Deposit one variant's interval; returns the flat bin index so the
    /// block writer can track its min/max bin span.
    pub fn add_site(&mut self, contig_id: u32, from: u64, to: u64, block_id: u32) -> Result<u32> {
        let contig = self
            .contigs
            .get_mut(contig_id as usize)
            .ok_or_else(|| err(ErrorKind::Bounds, "unknown contig id"))?;
        Ok(contig.add(from, to, block_id))
    }

    /// Append a finished block's record and fold it into the contig
    /// rollup.
    pub fn add_block(&mut self, record: IndexRecord) -> Result<()> {
        if record.contig_id >= 0 {
            let meta = self
                .meta
                .get_mut(record.contig_id as usize)
                .ok_or_else(|| err(ErrorKind::Bounds, "unknown contig id"))?;
            meta.absorb(&record);
        }
        self.linear.add(record)
    }

    /// Ordered, deduplicated ids of blocks whose extent intersects
    /// [start, end) on `contig_id`.
    pub fn find_overlap(&self, contig_id: u32, start: u64, end: u64) -> Result<Vec<u32>> {
        let contig = self
            .contigs
            .get(contig_id as usize)
            .ok_or_else(|| err(ErrorKind::Bounds, "unknown contig id"))?;
        if start >= contig.l_contig || end <= start {
            return Err(err(ErrorKind::Bounds, "query outside contig extent"));
        }
        let meta = &self.meta[contig_id as usize];
        if meta.n_blocks == 0 {
            return Ok(Vec::new());
        }

        let mut hits = Vec::new();
        for bin in contig.possible_bins(start, end) {
            for &block_id in bin.blocks() {
                if let Some(record) = self.linear.get(block_id) {
                    if record.overlaps(start, end) {
                        hits.push(block_id);
                    }
                }
            }
        }
        hits.sort_unstable();
        hits.dedup();
        Ok(hits)
    }

    /// All blocks referencing one contig, in block order.
    pub fn blocks_for_contig(&self, contig_id: u32) -> Result<Vec<u32>> {
        let meta = self
            .meta
            .get(contig_id as usize)
            .ok_or_else(|| err(ErrorKind::Bounds, "unknown contig id"))?;
        if meta.n_blocks == 0 {
            return Ok(Vec::new());
        }
        Ok((meta.start_block..=meta.end_block)
            .filter(|&b| {
                self.linear
                    .get(b)
                    .map(|r| r.contig_id == meta.contig_id)
                    .unwrap_or(false)
            })
            .collect())
    }

    pub fn write(&self, wr: &mut impl Writer) -> Result<()> {
        wr.write_le_num(self.contigs.len() as u32)?;
        for contig in &self.contigs {
            contig.write(wr)?;
        }
        for meta in &self.meta {
            meta.write(wr)?;
        }
        self.linear.write(wr)?;
        Ok(())
    }

    pub fn read(rd: &mut impl Reader) -> Result<Self> {
        let n_contigs = rd.read_le_num::<u32>()?;
        let mut contigs = Vec::with_capacity(n_contigs as usize);
        for _ in 0..n_contigs {
            contigs.push(ContigIndex::read(rd)?);
        }
        let mut meta = Vec::with_capacity(n_contigs as usize);
        for _ in 0..n_contigs {
            meta.push(MetaEntry::read(rd)?);
        }
        let linear = LinearIndex::read(rd)?;
        Ok(VariantIndex {
            contigs,
            meta,
            linear,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tachyon_base::MemWriter;
    use test_log::test;

    fn record(block_id: u32, min: u64, max: u64) -> IndexRecord {
        IndexRecord {
            block_id,
            contig_id: 0,
            n_variants: 1,
            byte_offset: block_id as u64 * 100,
            byte_offset_end: (block_id as u64 + 1) * 100,
            min_position: min,
            max_position: max,
            ..IndexRecord::default()
        }
    }

    fn scenario_index() -> VariantIndex {
        let mut index = VariantIndex::new(&[4_000_000]);
        index.add_site(0, 100, 200, 0).unwrap();
        index.add_block(record(0, 100, 200)).unwrap();
        index.add_site(0, 150, 250, 1).unwrap();
        index.add_block(record(1, 150, 250)).unwrap();
        index.add_site(0, 3_000_000, 3_000_100, 2).unwrap();
        index.add_block(record(2, 3_000_000, 3_000_100)).unwrap();
        index
    }

    #[test]
    fn test_overlap_queries() {
        let index = scenario_index();
        assert_eq!(index.find_overlap(0, 180, 220).unwrap(), vec![0, 1]);
        assert_eq!(index.find_overlap(0, 200_000, 200_100).unwrap(), Vec::<u32>::new());
        assert_eq!(
            index.find_overlap(0, 2_999_900, 3_000_200).unwrap(),
            vec![2]
        );
    }

    #[test]
    fn test_unknown_contig_is_bounds_error() {
        let index = scenario_index();
        let e = index.find_overlap(7, 0, 10).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Bounds);
    }

    #[test]
    fn test_touching_endpoints_are_exclusive() {
        // Blocks touching the query endpoints only do not overlap:
        // min_position < end AND max_position > start.
        let index = scenario_index();
        assert_eq!(index.find_overlap(0, 200, 300).unwrap(), vec![1]);
        assert_eq!(index.find_overlap(0, 50, 100).unwrap(), Vec::<u32>::new());
    }

    #[test]
    fn test_round_trip() {
        let index = scenario_index();
        let mut w = MemWriter::new();
        index.write(&mut w).unwrap();
        let mut r = w.try_into_reader().unwrap();
        let back = VariantIndex::read(&mut r).unwrap();
        assert_eq!(back.n_blocks(), 3);
        assert_eq!(back.find_overlap(0, 180, 220).unwrap(), vec![0, 1]);
        assert_eq!(back.meta(0).unwrap().n_variants, 3);
    }
}
