use std::collections::HashMap;

use tachyon_base::{err, hash64_seeded, ErrorKind, Result, GENOTYPE_SEED};
use tachyon_containers::{unpack_allele, unpack_phase, VariantRecord, GT_EOV_CODE};

/// Sample reorder vector: `get(slot)` names the original sample whose
/// data is written at `slot`. Clusters samples with identical genotype
/// patterns so the downstream run-length encodings stay short.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermutationArray {
    perm: Vec<u32>,
}

impl PermutationArray {
    pub fn identity(n_samples: usize) -> Self {
        PermutationArray {
            perm: (0..n_samples as u32).collect(),
        }
    }

    pub fn from_vec(perm: Vec<u32>) -> Self {
        PermutationArray { perm }
    }

    pub fn len(&self) -> usize {
        self.perm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.perm.is_empty()
    }

    pub fn get(&self, slot: usize) -> u32 {
        self.perm[slot]
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.perm
    }

    pub fn reset(&mut self) {
        for (i, p) in self.perm.iter_mut().enumerate() {
            *p = i as u32;
        }
    }

    /// Slot each original sample landed in; used on the read path to put
    /// decoded genotypes back into input order.
    pub fn inverse(&self) -> Vec<u32> {
        let mut inv = vec![0_u32; self.perm.len()];
        for (slot, &sample) in self.perm.iter().enumerate() {
            inv[sample as usize] = slot as u32;
        }
        inv
    }

    /// Values are a permutation of 0..N.
    pub fn validate(&self) -> Result<()> {
        let mut seen = vec![false; self.perm.len()];
        for &p in &self.perm {
            let slot = seen
                .get_mut(p as usize)
                .ok_or_else(|| err(ErrorKind::Corruption, "permutation value out of range"))?;
            if *slot {
                return Err(err(ErrorKind::Corruption, "permutation value repeated"));
            }
            *slot = true;
        }
        Ok(())
    }

    /// On-disk word width: the narrowest of {1,2,4,8} bytes that covers N.
    pub fn word_width(&self) -> usize {
        word_width_for(self.perm.len())
    }
}

pub fn word_width_for(n_samples: usize) -> usize {
    if n_samples < 1 << 8 {
        1
    } else if n_samples < 1 << 16 {
        2
    } else if n_samples < 1 << 32 {
        4
    } else {
        8
    }
}

pub(crate) fn ceil_log2(x: u32) -> u32 {
    if x <= 1 {
        0
    } else {
        32 - (x - 1).leading_zeros()
    }
}

/// One pass over a block's GT-carrying records. The sort is stable: ties
/// preserve the previous permutation's order, so the vector converges as
/// records accumulate.
pub struct GenotypeSorter {
    n_samples: usize,
}

impl GenotypeSorter {
    pub fn new(n_samples: usize) -> Self {
        GenotypeSorter { n_samples }
    }

    /// Derive the permutation for one block. Returns None when no record
    /// carries FORMAT:GT, in which case the block writes no permutation
    /// stream at all.
    pub fn build(&self, records: &[VariantRecord]) -> Result<Option<PermutationArray>> {
        if self.n_samples == 0 {
            return Ok(None);
        }

        let mut largest_ploidy = 0_u32;
        let mut largest_n_alleles = 0_u32;
        let mut n_valid = 0_u32;
        for record in records {
            let gt = match &record.genotypes {
                Some(gt) => gt,
                None => continue,
            };
            n_valid += 1;
            largest_ploidy = largest_ploidy.max(gt.ploidy as u32);
            largest_n_alleles = largest_n_alleles.max(record.n_alleles() as u32 + 2);
        }
        if n_valid == 0 {
            return Ok(None);
        }
        // Byte-coded genotypes cap the remap table; sites beyond it take
        // the packed path unsorted rather than failing the block.
        if largest_n_alleles > 127 {
            return Ok(None);
        }

        // One extra code above the allele range, then one bit for phase:
        // that is the full per-chromosome symbol space.
        let symbol_space = ((largest_n_alleles + 1) << 1) + 1;
        let shift = ceil_log2(symbol_space);
        if shift * largest_ploidy > 64 {
            return Err(err(
                ErrorKind::Oversize,
                "genotype pattern exceeds 64-bit packing",
            ));
        }

        // Missing and end-of-vector sort after every ordinary allele.
        let mut remap = [0_u8; 128];
        for (i, r) in remap.iter_mut().enumerate().take(largest_n_alleles as usize + 1).skip(1) {
            *r = i as u8;
        }
        remap[0] = (largest_n_alleles - 1) as u8;
        remap[(GT_EOV_CODE >> 1) as usize] = largest_n_alleles as u8;

        let mut perm = PermutationArray::identity(self.n_samples);
        let mut patterns: Vec<Vec<u16>> = vec![Vec::new(); self.n_samples];
        let mut buckets: Vec<Vec<u32>> = Vec::new();
        let mut bucket_by_hash: HashMap<u64, usize> = HashMap::new();
        let mut bucket_packed: Vec<u64> = Vec::new();
        let mut order: Vec<(u64, usize)> = Vec::new();

        for record in records {
            let gt = match &record.genotypes {
                Some(gt) => gt,
                None => continue,
            };
            if gt.n_samples() != self.n_samples {
                return Err(err(
                    ErrorKind::Format,
                    "genotype vector does not cover the sample set",
                ));
            }
            let ploidy = gt.ploidy as usize;

            for (sample, pattern) in patterns.iter_mut().enumerate() {
                pattern.clear();
                for &code in gt.sample_codes(sample) {
                    let allele = unpack_allele(code);
                    if allele as u32 > largest_n_alleles && allele != GT_EOV_CODE >> 1 {
                        return Err(err(ErrorKind::Corruption, "allele code out of range"));
                    }
                    let repacked =
                        (remap[allele as usize] as u16) << 1 | unpack_phase(code) as u16;
                    pattern.push(repacked);
                }
            }

            // Bucket samples in the current permuted order so equal
            // patterns keep their relative positions.
            for slot in 0..self.n_samples {
                let sample = perm.get(slot);
                let pattern = &patterns[sample as usize];
                let mut bytes = Vec::with_capacity(ploidy * 2);
                for v in pattern {
                    bytes.extend_from_slice(&v.to_le_bytes());
                }
                let hash = hash64_seeded(&bytes, GENOTYPE_SEED);
                match bucket_by_hash.get(&hash) {
                    Some(&index) => buckets[index].push(sample),
                    None => {
                        bucket_by_hash.insert(hash, buckets.len());
                        let mut packed = 0_u64;
                        for &v in pattern {
                            packed = packed << shift | v as u64;
                        }
                        bucket_packed.push(packed);
                        buckets.push(vec![sample]);
                    }
                }
            }

            order.clear();
            for (index, &packed) in bucket_packed.iter().enumerate() {
                order.push((packed, index));
            }
            order.sort_unstable();

            let mut next = Vec::with_capacity(self.n_samples);
            for &(_, index) in &order {
                next.extend_from_slice(&buckets[index]);
            }
            debug_assert_eq!(next.len(), self.n_samples);
            perm = PermutationArray::from_vec(next);

            buckets.clear();
            bucket_by_hash.clear();
            bucket_packed.clear();
        }

        perm.validate()?;
        Ok(Some(perm))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tachyon_containers::Genotypes;
    use test_log::test;

    fn phased(a: u8, b: u8) -> [u8; 2] {
        // First allele carries no phase flag; the separator's phase flag
        // lands on the second allele.
        [(a + 1) << 1, (b + 1) << 1 | 1]
    }

    fn record_with(codes: Vec<u8>, n_alt: usize) -> VariantRecord {
        VariantRecord {
            ref_allele: "A".to_string(),
            alt_alleles: (0..n_alt).map(|_| "C".to_string()).collect(),
            genotypes: Some(Genotypes::diploid(codes)),
            ..VariantRecord::default()
        }
    }

    #[test]
    fn test_clusters_identical_genotypes() {
        // [1|1, 0|0, 0|1, 0|0]: the 0|0 samples cluster first, keeping
        // their relative order, then 0|1, then 1|1.
        let mut codes = Vec::new();
        codes.extend_from_slice(&phased(1, 1));
        codes.extend_from_slice(&phased(0, 0));
        codes.extend_from_slice(&phased(0, 1));
        codes.extend_from_slice(&phased(0, 0));
        let record = record_with(codes, 1);

        let sorter = GenotypeSorter::new(4);
        let perm = sorter.build(std::slice::from_ref(&record)).unwrap().unwrap();
        assert_eq!(perm.as_slice(), &[1, 3, 2, 0]);
        perm.validate().unwrap();
    }

    #[test]
    fn test_no_gt_records_yields_none() {
        let record = VariantRecord {
            ref_allele: "A".to_string(),
            alt_alleles: vec!["C".to_string()],
            ..VariantRecord::default()
        };
        let sorter = GenotypeSorter::new(4);
        assert!(sorter.build(&[record]).unwrap().is_none());
    }

    #[test]
    fn test_missing_sorts_after_ordinary_alleles() {
        // Sample 1 is ./. (missing codes), sample 0 is 1|1: the ordinary
        // genotype must come first.
        let codes = vec![phased(1, 1)[0], phased(1, 1)[1], 0, 1];
        let record = record_with(codes, 1);
        let sorter = GenotypeSorter::new(2);
        let perm = sorter.build(std::slice::from_ref(&record)).unwrap().unwrap();
        assert_eq!(perm.as_slice(), &[0, 1]);
    }

    #[test]
    fn test_inverse_round_trips() {
        let perm = PermutationArray::from_vec(vec![2, 0, 3, 1]);
        let inv = perm.inverse();
        for slot in 0..4 {
            assert_eq!(inv[perm.get(slot) as usize], slot as u32);
        }
    }

    #[test]
    fn test_word_width_tracks_cohort_size() {
        assert_eq!(word_width_for(255), 1);
        assert_eq!(word_width_for(256), 2);
        assert_eq!(word_width_for(70_000), 4);
    }
}
