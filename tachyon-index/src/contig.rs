use tachyon_base::{err, ErrorKind, ReadLeExt, Reader, Result, WriteLeExt, Writer};

use crate::bin::IndexBin;

/// Default quad-tree depth.
pub const DEFAULT_LEVELS: u8 = 7;

/// Per-contig quad-tree. A contig of rounded length Lr is cut into 4^i
/// slices at level i; an interval lands in the deepest bin that fully
/// contains it, or the root when it straddles every split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContigIndex {
    pub contig_id: u32,
    pub l_contig: u64,
    pub l_contig_rounded: u64,
    pub n_levels: u8,
    pub n_sites: u64,
    /// Cumulative bin counts minus one: 0, 4, 20, 84, ... Level i>0
    /// occupies flat indices cumsum[i-1] .. cumsum[i]; the root is 0.
    cumsum: Vec<u32>,
    bins: Vec<IndexBin>,
}

fn round_to_base4_multiple(length: u64, n_levels: u8) -> u64 {
    let chunk = 4_u64.pow(n_levels as u32);
    length.max(1).div_ceil(chunk) * chunk
}

impl ContigIndex {
    pub fn new(contig_id: u32, l_contig: u64, n_levels: u8) -> Self {
        let l_contig_rounded = round_to_base4_multiple(l_contig, n_levels);
        let mut cumsum = Vec::with_capacity(n_levels as usize + 1);
        let mut total = 0_u32;
        for i in 0..=n_levels as u32 {
            total += 4_u32.pow(i);
            cumsum.push(total - 1);
        }
        let n_bins = total;
        let mut bins = Vec::with_capacity(n_bins as usize);
        for i in 0..n_bins {
            bins.push(IndexBin::new(i));
        }
        ContigIndex {
            contig_id,
            l_contig,
            l_contig_rounded,
            n_levels,
            n_sites: 0,
            cumsum,
            bins,
        }
    }

    pub fn n_bins(&self) -> usize {
        self.bins.len()
    }

    pub fn bin(&self, index: usize) -> &IndexBin {
        &self.bins[index]
    }

    /// Deposit the interval [from, to] for `block_id` into the deepest
    /// level where both ends share a slice. Returns the flat bin index.
    pub fn add(&mut self, from: u64, to: u64, block_id: u32) -> u32 {
        for i in (1..=self.n_levels as u32).rev() {
            let width = self.l_contig_rounded / 4_u64.pow(i);
            let bin_from = from / width;
            let bin_to = to / width;
            // Both ends in one slice: the interval is fully contained.
            if bin_from == bin_to {
                let index = self.cumsum[i as usize - 1] + bin_from as u32;
                self.bins[index as usize].add(block_id);
                self.n_sites += 1;
                return index;
            }
        }
        self.bins[0].add(block_id);
        self.n_sites += 1;
        0
    }

    /// Every bin that might hold an interval overlapping [from, to]:
    /// the covered slice range at each level, plus the root.
    pub fn possible_bins(&self, from: u64, to: u64) -> Vec<&IndexBin> {
        let mut overlapping = Vec::new();
        let to = to.min(self.l_contig_rounded);
        for i in (1..=self.n_levels as u32).rev() {
            let width = self.l_contig_rounded / 4_u64.pow(i);
            let bin_from = from / width;
            let bin_to = (to / width).min(4_u64.pow(i) - 1);
            for j in bin_from..=bin_to {
                let index = (self.cumsum[i as usize - 1] + j as u32) as usize;
                if !self.bins[index].is_empty() {
                    overlapping.push(&self.bins[index]);
                }
            }
        }
        if !self.bins[0].is_empty() {
            overlapping.push(&self.bins[0]);
        }
        overlapping
    }

    pub fn merge(&mut self, other: &ContigIndex) -> Result<()> {
        if self.n_bins() != other.n_bins() || self.n_levels != other.n_levels {
            return Err(err(ErrorKind::Format, "contig index geometry mismatch"));
        }
        self.n_sites += other.n_sites;
        for (mine, theirs) in self.bins.iter_mut().zip(&other.bins) {
            mine.merge(theirs);
        }
        Ok(())
    }

    /// Sparse serialization: geometry plus only the populated bins.
    pub fn write(&self, wr: &mut impl Writer) -> Result<()> {
        wr.write_le_num(self.contig_id)?;
        wr.write_le_num(self.l_contig)?;
        wr.write_le_num(self.l_contig_rounded)?;
        wr.write_le_num(self.bins.len() as u32)?;
        wr.write_le_num(self.n_levels)?;
        wr.write_le_num(self.n_sites)?;
        let populated = self.bins.iter().filter(|b| !b.is_empty()).count() as u32;
        wr.write_le_num(populated)?;
        for bin in self.bins.iter().filter(|b| !b.is_empty()) {
            bin.write(wr)?;
        }
        Ok(())
    }

    pub fn read(rd: &mut impl Reader) -> Result<Self> {
        let contig_id = rd.read_le_num::<u32>()?;
        let l_contig = rd.read_le_num::<u64>()?;
        let l_contig_rounded = rd.read_le_num::<u64>()?;
        let n_bins = rd.read_le_num::<u32>()?;
        let n_levels = rd.read_le_num::<u8>()?;
        let n_sites = rd.read_le_num::<u64>()?;
        let mut contig = ContigIndex::new(contig_id, l_contig, n_levels);
        if contig.n_bins() != n_bins as usize || contig.l_contig_rounded != l_contig_rounded {
            return Err(err(ErrorKind::Corruption, "contig index geometry mismatch"));
        }
        contig.n_sites = n_sites;
        let populated = rd.read_le_num::<u32>()?;
        for _ in 0..populated {
            let bin = IndexBin::read(rd)?;
            let slot = bin.bin_id as usize;
            if slot >= contig.bins.len() {
                return Err(err(ErrorKind::Corruption, "bin id out of range"));
            }
            contig.bins[slot] = bin;
        }
        Ok(contig)
    }
}
