use tachyon_base::{err, ErrorKind, Result};
use tachyon_containers::{
    unpack_allele, unpack_phase, DataContainer, Genotypes, HotController, GT_EOV_CODE,
};

use crate::sorter::{ceil_log2, PermutationArray};

/// Per-variant encoding tags recorded in the GT support stream.
pub const TAG_BIALLELIC_RLE: u32 = 0;
pub const TAG_NALLELIC_RLE: u32 = 1;
pub const TAG_BCF_PACKED: u32 = 2;

/// Outcome of encoding one variant's genotypes: which bitstream was
/// chosen, how many words it produced at which width, and the flags the
/// hot controller needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenotypeEncoding {
    pub tag: u32,
    pub n_words: u64,
    pub width: usize,
    pub any_missing: bool,
    pub mixed_phase: bool,
    /// Uniform phase bit when phasing is not mixed.
    pub all_phased: bool,
    pub any_eov: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct GtFlags {
    any_missing: bool,
    mixed_phase: bool,
    first_phase: u8,
    any_eov: bool,
}

const WIDTHS: [usize; 4] = [1, 2, 4, 8];

fn run_limit(width: usize, payload_bits: u32) -> Option<u64> {
    let total = width as u32 * 8;
    if total <= payload_bits {
        return None;
    }
    Some(((1_u128 << (total - payload_bits)) - 1) as u64)
}

fn count_runs(packed: &[u64], limit: u64) -> u64 {
    let mut runs = 0_u64;
    let mut len = 1_u64;
    let mut cur = packed[0];
    for &v in &packed[1..] {
        if v != cur {
            runs += 1;
            len = 0;
            cur = v;
        }
        if len == limit {
            runs += 1;
            len = 0;
        }
        len += 1;
    }
    runs + 1
}

fn emit_runs(
    packed: &[u64],
    limit: u64,
    len_shift: u32,
    width: usize,
    out: &mut DataContainer,
) -> u64 {
    let mut n_words = 0_u64;
    let mut cur = packed[0];
    let mut len = 1_u64;
    for &v in &packed[1..] {
        if v != cur || len == limit {
            out.append_word(len << len_shift | cur, width);
            n_words += 1;
            cur = v;
            len = 0;
        }
        len += 1;
    }
    out.append_word(len << len_shift | cur, width);
    n_words + 1
}

/// Per-allele byte width of the BCF-style packing; a full word covers
/// both alleles of a diploid sample.
pub fn bcf_half_width(n_alleles: usize) -> Result<usize> {
    if n_alleles + 1 < 8 {
        Ok(1)
    } else if n_alleles + 1 < 128 {
        Ok(2)
    } else if n_alleles + 1 < 32768 {
        Ok(4)
    } else {
        Err(err(ErrorKind::Oversize, "allele count above 32767"))
    }
}

pub fn bcf_word_width(n_alleles: usize) -> Result<usize> {
    Ok(2 * bcf_half_width(n_alleles)?)
}

/// Cost-based selection between diploid biallelic RLE, diploid n-allelic
/// RLE and BCF-style packing. Biallelic sites always take the biallelic
/// path unless end-of-vector padding forces the wider alphabet.
pub struct GenotypeEncoder {
    n_samples: usize,
}

impl GenotypeEncoder {
    pub fn new(n_samples: usize) -> Self {
        GenotypeEncoder { n_samples }
    }

    pub fn encode(
        &self,
        gt: &Genotypes,
        n_alleles: usize,
        ppa: &PermutationArray,
        rle_target: &mut DataContainer,
        packed_target: &mut DataContainer,
    ) -> Result<GenotypeEncoding> {
        if n_alleles + 1 >= 32768 {
            return Err(err(ErrorKind::Oversize, "allele count above 32767"));
        }
        if !gt.is_diploid() {
            return Err(err(
                ErrorKind::Format,
                "genotype codec requires diploid input; pad lower ploidy with end-of-vector",
            ));
        }
        if gt.n_samples() != self.n_samples || ppa.len() != self.n_samples {
            return Err(err(
                ErrorKind::Format,
                "genotype vector does not cover the sample set",
            ));
        }
        if self.n_samples == 0 {
            return Ok(GenotypeEncoding {
                tag: TAG_BIALLELIC_RLE,
                n_words: 0,
                width: 1,
                any_missing: false,
                mixed_phase: false,
                all_phased: false,
                any_eov: false,
            });
        }

        // Reorder samples through the permutation before anything else;
        // run structure only exists in permuted order.
        let mut pairs = Vec::with_capacity(self.n_samples);
        for slot in 0..self.n_samples {
            let codes = gt.sample_codes(ppa.get(slot) as usize);
            pairs.push((codes[0], codes[1]));
        }

        let flags = scan_flags(&pairs);

        if n_alleles == 2 && !flags.any_eov {
            self.encode_biallelic(&pairs, flags, rle_target)
        } else {
            self.encode_nallelic(&pairs, flags, n_alleles, packed_target)
        }
    }

    fn encode_biallelic(
        &self,
        pairs: &[(u8, u8)],
        flags: GtFlags,
        out: &mut DataContainer,
    ) -> Result<GenotypeEncoding> {
        let m = if flags.any_missing { 2_u32 } else { 1 };
        let p = flags.mixed_phase as u32;
        let payload_bits = 2 * m + p;

        let packed: Vec<u64> = pairs
            .iter()
            .map(|&(a, b)| {
                let a_val = biallelic_symbol(a, flags.any_missing);
                let b_val = biallelic_symbol(b, flags.any_missing);
                let phase = (unpack_phase(b) as u64) * p as u64;
                phase << (2 * m) | b_val << m | a_val
            })
            .collect();

        // Choose the smallest W whose total run cost is minimum; widths
        // ascend, so a strict comparison keeps the narrowest winner.
        let mut best_width = 0_usize;
        let mut best_cost = u64::MAX;
        let mut best_runs = 0_u64;
        for &w in &WIDTHS {
            let limit = match run_limit(w, payload_bits) {
                Some(limit) => limit,
                None => continue,
            };
            let runs = count_runs(&packed, limit);
            if runs * (w as u64) < best_cost {
                best_cost = runs * w as u64;
                best_width = w;
                best_runs = runs;
            }
        }

        let limit = run_limit(best_width, payload_bits).unwrap();
        let n_words = emit_runs(&packed, limit, payload_bits, best_width, out);
        debug_assert_eq!(n_words, best_runs);
        out.bump_additions(n_words as u32);

        Ok(GenotypeEncoding {
            tag: TAG_BIALLELIC_RLE,
            n_words,
            width: best_width,
            any_missing: flags.any_missing,
            mixed_phase: flags.mixed_phase,
            all_phased: !flags.mixed_phase && flags.first_phase == 1,
            any_eov: false,
        })
    }

    fn encode_nallelic(
        &self,
        pairs: &[(u8, u8)],
        flags: GtFlags,
        n_alleles: usize,
        out: &mut DataContainer,
    ) -> Result<GenotypeEncoding> {
        // One symbol above the allele range is reserved for remapped
        // end-of-vector codes when padding is present.
        let symbols = n_alleles as u32 + 1 + flags.any_eov as u32;
        let shift = ceil_log2(symbols + 1);
        let payload_bits = 2 * shift + 1;

        let packed: Vec<u64> = pairs
            .iter()
            .map(|&(a, b)| {
                let a_val = nallelic_symbol(a, n_alleles);
                let b_val = nallelic_symbol(b, n_alleles);
                b_val << (shift + 1) | a_val << 1 | unpack_phase(b) as u64
            })
            .collect();

        let mut best_width = 0_usize;
        let mut best_cost = u64::MAX;
        for &w in &WIDTHS {
            let limit = match run_limit(w, payload_bits) {
                Some(limit) => limit,
                None => continue,
            };
            let runs = count_runs(&packed, limit);
            if runs * (w as u64) < best_cost {
                best_cost = runs * w as u64;
                best_width = w;
            }
        }

        let bcf_width = bcf_word_width(n_alleles)?;
        let bcf_cost = self.n_samples as u64 * bcf_width as u64;

        if best_width != 0 && best_cost < bcf_cost {
            let limit = run_limit(best_width, payload_bits).unwrap();
            let n_words = emit_runs(&packed, limit, payload_bits, best_width, out);
            out.bump_additions(n_words as u32);
            Ok(GenotypeEncoding {
                tag: TAG_NALLELIC_RLE,
                n_words,
                width: best_width,
                any_missing: flags.any_missing,
                mixed_phase: flags.mixed_phase,
                all_phased: !flags.mixed_phase && flags.first_phase == 1,
                any_eov: flags.any_eov,
            })
        } else {
            let half_bits = (bcf_width / 2 * 8) as u32;
            for &(a, b) in pairs {
                let word = (unpack_allele(b) as u64) << half_bits
                    | (unpack_allele(a) as u64) << 1
                    | unpack_phase(b) as u64;
                out.append_word(word, bcf_width);
            }
            out.bump_additions(self.n_samples as u32);
            Ok(GenotypeEncoding {
                tag: TAG_BCF_PACKED,
                n_words: self.n_samples as u64,
                width: bcf_width,
                any_missing: flags.any_missing,
                mixed_phase: flags.mixed_phase,
                all_phased: !flags.mixed_phase && flags.first_phase == 1,
                any_eov: flags.any_eov,
            })
        }
    }
}

fn scan_flags(pairs: &[(u8, u8)]) -> GtFlags {
    let mut flags = GtFlags {
        first_phase: unpack_phase(pairs[0].1),
        ..GtFlags::default()
    };
    for &(a, b) in pairs {
        if a == GT_EOV_CODE || b == GT_EOV_CODE {
            flags.any_eov = true;
        }
        if (unpack_allele(a) == 0 && a != GT_EOV_CODE) || (unpack_allele(b) == 0 && b != GT_EOV_CODE)
        {
            flags.any_missing = true;
        }
        if unpack_phase(b) != flags.first_phase {
            flags.mixed_phase = true;
        }
    }
    flags
}

/// Biallelic symbol: with missing present the raw 0..2 range is kept
/// (0 = missing); without it alleles compress to one bit.
fn biallelic_symbol(code: u8, any_missing: bool) -> u64 {
    let allele = unpack_allele(code) as u64;
    if any_missing {
        allele
    } else {
        allele - 1
    }
}

/// N-allelic symbol: 0 = missing, 1..=A ordinary, A+1 = end-of-vector.
fn nallelic_symbol(code: u8, n_alleles: usize) -> u64 {
    if code == GT_EOV_CODE {
        n_alleles as u64 + 1
    } else {
        unpack_allele(code) as u64
    }
}

/// Decode one variant's words back to BCF codes in permuted sample
/// order. The caller applies the inverse permutation afterwards.
pub fn decode_diploid(
    tag: u32,
    hot: &HotController,
    n_samples: usize,
    n_alleles: usize,
    words: &[u64],
) -> Result<Vec<u8>> {
    let mut codes = Vec::with_capacity(n_samples * 2);
    match tag {
        TAG_BIALLELIC_RLE => {
            let m = if hot.any_missing { 2_u32 } else { 1 };
            let p = hot.mixed_phasing as u32;
            let mask = (1_u64 << m) - 1;
            for &word in words {
                let len = word >> (2 * m + p);
                let phase = if p == 1 {
                    (word >> (2 * m) & 1) as u8
                } else {
                    hot.all_phased as u8
                };
                let a = word & mask;
                let b = word >> m & mask;
                let code_a = biallelic_code(a, hot.any_missing, 0)?;
                let code_b = biallelic_code(b, hot.any_missing, phase)?;
                for _ in 0..len {
                    codes.push(code_a);
                    codes.push(code_b);
                }
            }
        }
        TAG_NALLELIC_RLE => {
            let symbols = n_alleles as u32 + 1 + hot.any_na as u32;
            let shift = ceil_log2(symbols + 1);
            let mask = (1_u64 << shift) - 1;
            for &word in words {
                let len = word >> (2 * shift + 1);
                let phase = (word & 1) as u8;
                let a = word >> 1 & mask;
                let b = word >> (shift + 1) & mask;
                let code_a = nallelic_code(a, n_alleles, 0);
                let code_b = nallelic_code(b, n_alleles, phase);
                for _ in 0..len {
                    codes.push(code_a);
                    codes.push(code_b);
                }
            }
        }
        TAG_BCF_PACKED => {
            let half_bits = (bcf_half_width(n_alleles)? * 8) as u32;
            for &word in words {
                let phase = (word & 1) as u8;
                let a = (word >> 1) & ((1 << (half_bits - 1)) - 1);
                let b = word >> half_bits;
                codes.push((a as u8) << 1);
                codes.push((b as u8) << 1 | phase);
            }
        }
        _ => return Err(err(ErrorKind::Format, "unknown genotype encoding tag")),
    }
    if codes.len() != n_samples * 2 {
        return Err(err(
            ErrorKind::Corruption,
            "run lengths do not cover the sample set",
        ));
    }
    Ok(codes)
}

fn biallelic_code(symbol: u64, any_missing: bool, phase: u8) -> Result<u8> {
    let allele = if any_missing { symbol } else { symbol + 1 };
    if allele > 2 {
        return Err(err(ErrorKind::Corruption, "biallelic symbol out of range"));
    }
    Ok((allele as u8) << 1 | phase)
}

fn nallelic_code(symbol: u64, n_alleles: usize, phase: u8) -> u8 {
    if symbol == n_alleles as u64 + 1 {
        GT_EOV_CODE
    } else {
        (symbol as u8) << 1 | phase
    }
}

/// Scatter permuted codes back to input sample order.
pub fn unpermute_diploid(permuted: &[u8], ppa: &PermutationArray) -> Vec<u8> {
    let mut out = vec![0_u8; permuted.len()];
    for slot in 0..ppa.len() {
        let sample = ppa.get(slot) as usize;
        out[sample * 2] = permuted[slot * 2];
        out[sample * 2 + 1] = permuted[slot * 2 + 1];
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use tachyon_containers::PrimitiveType;
    use test_log::test;

    fn gt_container() -> DataContainer {
        DataContainer::new(PrimitiveType::Struct)
    }

    fn phased(a: u8, b: u8) -> [u8; 2] {
        [(a + 1) << 1, (b + 1) << 1 | 1]
    }

    fn words_of(container: &DataContainer, width: usize) -> Vec<u64> {
        container
            .data
            .as_slice()
            .chunks_exact(width)
            .map(|c| {
                let mut raw = [0u8; 8];
                raw[..width].copy_from_slice(c);
                u64::from_le_bytes(raw)
            })
            .collect()
    }

    #[test]
    fn test_biallelic_width_selection() {
        // [0|0, 0|0, 0|1, 1|1]: one byte wide, three runs, no missing,
        // no mixed phasing.
        let mut codes = Vec::new();
        for (a, b) in [(0, 0), (0, 0), (0, 1), (1, 1)] {
            codes.extend_from_slice(&phased(a, b));
        }
        let gt = Genotypes::diploid(codes);
        let ppa = PermutationArray::identity(4);
        let encoder = GenotypeEncoder::new(4);
        let mut rle = gt_container();
        let mut packed = gt_container();

        let enc = encoder.encode(&gt, 2, &ppa, &mut rle, &mut packed).unwrap();
        assert_eq!(enc.tag, TAG_BIALLELIC_RLE);
        assert_eq!(enc.width, 1);
        assert_eq!(enc.n_words, 3);
        assert!(!enc.any_missing);
        assert!(!enc.mixed_phase);
        assert!(enc.all_phased);
        assert!(packed.data.is_empty());

        // m=1, p=0: word = len << 2 | b << 1 | a.
        assert_eq!(words_of(&rle, 1), vec![2 << 2, 1 << 2 | 2, 1 << 2 | 3]);
    }

    #[test]
    fn test_biallelic_round_trip_with_missing_and_mixed_phase() {
        let mut codes = Vec::new();
        codes.extend_from_slice(&[0, 0]); // ./.
        codes.extend_from_slice(&phased(0, 1)); // 0|1
        codes.extend_from_slice(&[2, 4]); // 0/1 unphased
        codes.extend_from_slice(&phased(1, 1)); // 1|1
        let gt = Genotypes::diploid(codes.clone());
        let ppa = PermutationArray::identity(4);
        let encoder = GenotypeEncoder::new(4);
        let mut rle = gt_container();
        let mut packed = gt_container();

        let enc = encoder.encode(&gt, 2, &ppa, &mut rle, &mut packed).unwrap();
        assert_eq!(enc.tag, TAG_BIALLELIC_RLE);
        assert!(enc.any_missing);
        assert!(enc.mixed_phase);

        let mut hot = HotController::default();
        hot.any_missing = enc.any_missing;
        hot.mixed_phasing = enc.mixed_phase;
        hot.all_phased = enc.all_phased;
        let words = words_of(&rle, enc.width);
        assert_eq!(words.len(), enc.n_words as usize);
        let decoded = decode_diploid(enc.tag, &hot, 4, 2, &words).unwrap();
        assert_eq!(unpermute_diploid(&decoded, &ppa), codes);
    }

    #[test]
    fn test_nallelic_selection_against_bcf() {
        // Long runs of one multiallelic genotype: RLE wins over packing.
        let mut codes = Vec::new();
        for _ in 0..100 {
            codes.extend_from_slice(&phased(3, 7));
        }
        let gt = Genotypes::diploid(codes.clone());
        let ppa = PermutationArray::identity(100);
        let encoder = GenotypeEncoder::new(100);
        let mut rle = gt_container();
        let mut packed = gt_container();

        let enc = encoder.encode(&gt, 8, &ppa, &mut rle, &mut packed).unwrap();
        assert_eq!(enc.tag, TAG_NALLELIC_RLE);
        assert!(rle.data.is_empty());
        // Cost must beat BCF packing: 2 * 100 * 2 bytes.
        assert!((enc.n_words as usize * enc.width) < 400);

        let mut hot = HotController::default();
        hot.mixed_phasing = enc.mixed_phase;
        hot.all_phased = enc.all_phased;
        hot.any_na = enc.any_eov;
        let words = words_of(&packed, enc.width);
        let decoded = decode_diploid(enc.tag, &hot, 100, 8, &words).unwrap();
        assert_eq!(unpermute_diploid(&decoded, &ppa), codes);
    }

    #[test]
    fn test_random_genotypes_stay_cheaper_than_bcf() {
        // Alternating distinct genotypes defeat run compression, but the
        // chosen encoding must still cost no more than the BCF packing
        // bound of n_samples * word_width bytes.
        let mut codes = Vec::new();
        for i in 0..100_u8 {
            codes.extend_from_slice(&phased(i % 8, (i + 3) % 8));
        }
        let gt = Genotypes::diploid(codes.clone());
        let ppa = PermutationArray::identity(100);
        let encoder = GenotypeEncoder::new(100);
        let mut rle = gt_container();
        let mut packed = gt_container();

        let enc = encoder.encode(&gt, 8, &ppa, &mut rle, &mut packed).unwrap();
        let bcf_bound = 100 * bcf_word_width(8).unwrap();
        assert!(enc.n_words as usize * enc.width <= bcf_bound);

        let mut hot = HotController::default();
        hot.mixed_phasing = enc.mixed_phase;
        hot.all_phased = enc.all_phased;
        let words = words_of(&packed, enc.width);
        let decoded = decode_diploid(enc.tag, &hot, 100, 8, &words).unwrap();
        assert_eq!(unpermute_diploid(&decoded, &ppa), codes);
    }

    #[test]
    fn test_bcf_packed_words_decode() {
        // Readers must handle archives whose writer chose the packed
        // layout: one word per sample, second allele in the high half.
        let codes: Vec<u8> = vec![
            phased(0, 3)[0],
            phased(0, 3)[1],
            0, // ./. first half
            0,
            phased(7, 1)[0],
            phased(7, 1)[1],
        ];
        let half_bits = (bcf_half_width(8).unwrap() * 8) as u32;
        let words: Vec<u64> = codes
            .chunks_exact(2)
            .map(|pair| {
                (unpack_allele(pair[1]) as u64) << half_bits
                    | (unpack_allele(pair[0]) as u64) << 1
                    | unpack_phase(pair[1]) as u64
            })
            .collect();

        let hot = HotController::default();
        let decoded = decode_diploid(TAG_BCF_PACKED, &hot, 3, 8, &words).unwrap();
        assert_eq!(decoded, codes);
    }

    #[test]
    fn test_eov_padding_round_trips() {
        // Mixed ploidy: one haploid sample padded with end-of-vector.
        let mut codes = Vec::new();
        codes.extend_from_slice(&phased(0, 1));
        codes.extend_from_slice(&[(1 + 1) << 1, GT_EOV_CODE]);
        let gt = Genotypes::diploid(codes.clone());
        let ppa = PermutationArray::identity(2);
        let encoder = GenotypeEncoder::new(2);
        let mut rle = gt_container();
        let mut packed = gt_container();

        let enc = encoder.encode(&gt, 2, &ppa, &mut rle, &mut packed).unwrap();
        assert_ne!(enc.tag, TAG_BIALLELIC_RLE);
        assert!(enc.any_eov);

        let mut hot = HotController::default();
        hot.any_na = enc.any_eov;
        hot.mixed_phasing = enc.mixed_phase;
        hot.all_phased = enc.all_phased;
        let words = words_of(&packed, enc.width);
        let decoded = decode_diploid(enc.tag, &hot, 2, 2, &words).unwrap();
        assert_eq!(unpermute_diploid(&decoded, &ppa), codes);
    }

    #[test]
    fn test_run_limit_break() {
        // 70 identical samples at width 1 with no missing and no mixed
        // phase: limit is 2^6 - 1 = 63, so two words are required.
        let mut codes = Vec::new();
        for _ in 0..70 {
            codes.extend_from_slice(&phased(0, 0));
        }
        let gt = Genotypes::diploid(codes.clone());
        let ppa = PermutationArray::identity(70);
        let encoder = GenotypeEncoder::new(70);
        let mut rle = gt_container();
        let mut packed = gt_container();

        let enc = encoder.encode(&gt, 2, &ppa, &mut rle, &mut packed).unwrap();
        if enc.width == 1 {
            assert_eq!(enc.n_words, 2);
        }
        let mut hot = HotController::default();
        hot.all_phased = enc.all_phased;
        let words = words_of(&rle, enc.width);
        let decoded = decode_diploid(enc.tag, &hot, 70, 2, &words).unwrap();
        assert_eq!(unpermute_diploid(&decoded, &ppa), codes);
    }

    #[test]
    fn test_oversized_allele_count_rejected() {
        let gt = Genotypes::diploid(vec![2, 2]);
        let ppa = PermutationArray::identity(1);
        let encoder = GenotypeEncoder::new(1);
        let mut rle = gt_container();
        let mut packed = gt_container();
        let e = encoder
            .encode(&gt, 40_000, &ppa, &mut rle, &mut packed)
            .unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Oversize);
    }
}
