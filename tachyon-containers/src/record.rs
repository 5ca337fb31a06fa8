/// Input contract with the external VCF/BCF reader: records arrive with
/// header-assigned integer keys, allele strings, quality and per-sample
/// typed payloads. Everything here is transient; the writer decomposes a
/// record into columns and drops it.

/// A typed field payload, dispatch-tagged the way the BCF primitive tags
/// arrive: integers are widened to i32 by the reader, floats are f32,
/// characters are raw bytes. Flags carry presence only.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Flag,
    Int(Vec<i32>),
    Float(Vec<f32>),
    Char(Vec<u8>),
}

impl FieldValue {
    /// Element count recorded as the container stride for this entry.
    pub fn element_count(&self) -> u32 {
        match self {
            FieldValue::Flag => 0,
            FieldValue::Int(v) => v.len() as u32,
            FieldValue::Float(v) => v.len() as u32,
            FieldValue::Char(v) => v.len() as u32,
        }
    }
}

/// Raw diploid genotype codes in BCF packing, sample-major:
/// code = (allele + 1) << 1 | phase, 0 = missing, 0x81 = end-of-vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Genotypes {
    pub ploidy: u8,
    pub codes: Vec<u8>,
}

pub const GT_MISSING_CODE: u8 = 0;
pub const GT_EOV_CODE: u8 = 0x81;

impl Genotypes {
    pub fn diploid(codes: Vec<u8>) -> Self {
        Genotypes { ploidy: 2, codes }
    }

    pub fn n_samples(&self) -> usize {
        if self.ploidy == 0 {
            0
        } else {
            self.codes.len() / self.ploidy as usize
        }
    }

    pub fn sample_codes(&self, sample: usize) -> &[u8] {
        let p = self.ploidy as usize;
        &self.codes[sample * p..(sample + 1) * p]
    }

    pub fn is_diploid(&self) -> bool {
        self.ploidy == 2
    }
}

/// Allele index of a raw code, in BCF space where 0 means missing.
pub fn unpack_allele(code: u8) -> u8 {
    code >> 1
}

pub fn unpack_phase(code: u8) -> u8 {
    code & 1
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantRecord {
    pub contig_id: u32,
    /// 0-based genomic position.
    pub position: u64,
    pub id: String,
    pub ref_allele: String,
    pub alt_alleles: Vec<String>,
    pub quality: f32,
    /// Header-assigned FILTER idx values.
    pub filter_ids: Vec<u32>,
    /// Header-assigned INFO idx -> payload, in record order.
    pub info: Vec<(u32, FieldValue)>,
    /// Non-GT FORMAT fields; per-sample values are concatenated
    /// sample-major, element count per sample uniform within a record.
    pub format: Vec<(u32, FieldValue)>,
    pub genotypes: Option<Genotypes>,
}

impl VariantRecord {
    /// Total allele count including the reference.
    pub fn n_alleles(&self) -> usize {
        1 + self.alt_alleles.len()
    }

    pub fn is_biallelic(&self) -> bool {
        self.alt_alleles.len() == 1
    }

    /// Simple site: single-character ref and alt. Set conservatively;
    /// multi-allelic or symbolic sites never qualify.
    pub fn is_simple_snv(&self) -> bool {
        self.is_biallelic() && self.ref_allele.len() == 1 && self.alt_alleles[0].len() == 1
    }

    /// Alleles in cold-meta order: reference first, then alternates.
    pub fn alleles(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.n_alleles());
        out.push(self.ref_allele.clone());
        out.extend(self.alt_alleles.iter().cloned());
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn test_genotype_unpacking() {
        // 0|1 phased: codes (0+1)<<1|1 = 3, (1+1)<<1|1 = 5
        let gt = Genotypes::diploid(vec![3, 5]);
        assert_eq!(gt.n_samples(), 1);
        assert_eq!(unpack_allele(gt.sample_codes(0)[0]), 1); // 1-based ref
        assert_eq!(unpack_phase(gt.sample_codes(0)[0]), 1);
        assert_eq!(unpack_allele(GT_MISSING_CODE), 0);
        assert_eq!(unpack_allele(GT_EOV_CODE), 64);
    }

    #[test]
    fn test_simple_snv_is_conservative() {
        let mut rec = VariantRecord {
            ref_allele: "A".to_string(),
            alt_alleles: vec!["C".to_string()],
            ..VariantRecord::default()
        };
        assert!(rec.is_simple_snv());
        rec.alt_alleles = vec!["CAT".to_string()];
        assert!(!rec.is_simple_snv());
        rec.alt_alleles = vec!["C".to_string(), "G".to_string()];
        assert!(!rec.is_simple_snv());
    }
}
