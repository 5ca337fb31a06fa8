use tachyon_base::{err, ErrorKind, Result, TypedBuffer};

/// Genotype bitstream word widths recorded in the hot controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RleWidth {
    #[default]
    W1 = 0,
    W2 = 1,
    W4 = 2,
    W8 = 3,
}

impl RleWidth {
    pub fn bytes(&self) -> usize {
        match self {
            RleWidth::W1 => 1,
            RleWidth::W2 => 2,
            RleWidth::W4 => 4,
            RleWidth::W8 => 8,
        }
    }

    pub fn from_bytes(width: usize) -> Result<Self> {
        Ok(match width {
            1 => RleWidth::W1,
            2 => RleWidth::W2,
            4 => RleWidth::W4,
            8 => RleWidth::W8,
            _ => return Err(err(ErrorKind::Format, "illegal genotype word width")),
        })
    }

    fn from_bits(bits: u16) -> Self {
        match bits & 3 {
            0 => RleWidth::W1,
            1 => RleWidth::W2,
            2 => RleWidth::W4,
            _ => RleWidth::W8,
        }
    }
}

/// Per-variant controller, LSB first:
/// any_missing(1) | all_phased(1) | any_na(1) | mixed_phasing(1) |
/// biallelic(1) | simple(1) | rle(1) | rle_width(2) | diploid(1) |
/// mixed_ploidy(1) | unused(5)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct HotController {
    pub any_missing: bool,
    pub all_phased: bool,
    pub any_na: bool,
    pub mixed_phasing: bool,
    pub biallelic: bool,
    pub simple: bool,
    pub rle: bool,
    pub rle_width: RleWidth,
    pub diploid: bool,
    pub mixed_ploidy: bool,
}

impl HotController {
    pub fn to_u16(&self) -> u16 {
        (self.any_missing as u16)
            | (self.all_phased as u16) << 1
            | (self.any_na as u16) << 2
            | (self.mixed_phasing as u16) << 3
            | (self.biallelic as u16) << 4
            | (self.simple as u16) << 5
            | (self.rle as u16) << 6
            | (self.rle_width as u16) << 7
            | (self.diploid as u16) << 9
            | (self.mixed_ploidy as u16) << 10
    }

    pub fn from_u16(bits: u16) -> Self {
        HotController {
            any_missing: bits & 1 != 0,
            all_phased: bits >> 1 & 1 != 0,
            any_na: bits >> 2 & 1 != 0,
            mixed_phasing: bits >> 3 & 1 != 0,
            biallelic: bits >> 4 & 1 != 0,
            simple: bits >> 5 & 1 != 0,
            rle: bits >> 6 & 1 != 0,
            rle_width: RleWidth::from_bits(bits >> 7),
            diploid: bits >> 9 & 1 != 0,
            mixed_ploidy: bits >> 10 & 1 != 0,
        }
    }
}

/// Genotype representation recovered from a hot controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenotypeLayout {
    RleDiploidBiallelic,
    RleDiploidNallelic,
    BcfDiploid,
    Unknown,
}

impl HotController {
    pub fn genotype_layout(&self) -> GenotypeLayout {
        if self.rle && self.biallelic && self.diploid {
            GenotypeLayout::RleDiploidBiallelic
        } else if self.rle && !self.biallelic && self.diploid {
            GenotypeLayout::RleDiploidNallelic
        } else if !self.rle && self.diploid {
            GenotypeLayout::BcfDiploid
        } else {
            GenotypeLayout::Unknown
        }
    }
}

/// Nibble codes for the packed ref/alt byte.
pub const BASE_A: u8 = 0;
pub const BASE_T: u8 = 1;
pub const BASE_G: u8 = 2;
pub const BASE_C: u8 = 3;
pub const BASE_N: u8 = 4;

const BASE_LOOKUP: [u8; 5] = [b'A', b'T', b'G', b'C', b'N'];

/// Packed ref/alt pair for simple SNV sites. Non-SNV or multi-character
/// allele sites encode both nibbles as N and keep the allele strings in
/// the cold meta.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RefAlt {
    pub ref_code: u8,
    pub alt_code: u8,
}

impl RefAlt {
    fn base_code(base: u8) -> Option<u8> {
        match base {
            b'A' | b'a' => Some(BASE_A),
            b'T' | b't' => Some(BASE_T),
            b'G' | b'g' => Some(BASE_G),
            b'C' | b'c' => Some(BASE_C),
            b'N' | b'n' => Some(BASE_N),
            _ => None,
        }
    }

    pub fn from_alleles(ref_allele: &str, alt_allele: &str) -> Self {
        if ref_allele.len() == 1 && alt_allele.len() == 1 {
            if let (Some(r), Some(a)) = (
                Self::base_code(ref_allele.as_bytes()[0]),
                Self::base_code(alt_allele.as_bytes()[0]),
            ) {
                return RefAlt {
                    ref_code: r,
                    alt_code: a,
                };
            }
        }
        RefAlt {
            ref_code: BASE_N,
            alt_code: BASE_N,
        }
    }

    pub fn pack(&self) -> u8 {
        (self.ref_code & 0xf) << 4 | (self.alt_code & 0xf)
    }

    pub fn unpack(byte: u8) -> Self {
        RefAlt {
            ref_code: byte >> 4 & 0xf,
            alt_code: byte & 0xf,
        }
    }

    pub fn ref_base(&self) -> u8 {
        BASE_LOOKUP[self.ref_code.min(4) as usize]
    }

    pub fn alt_base(&self) -> u8 {
        BASE_LOOKUP[self.alt_code.min(4) as usize]
    }
}

/// Fixed-width per-variant metadata, 7 bytes packed on disk:
/// controller(u16) || ref_alt(u8) || position(u32).
/// Position is relative to the block minimum.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HotEntry {
    pub controller: HotController,
    pub ref_alt: RefAlt,
    pub position: u32,
}

pub const HOT_ENTRY_SIZE: usize = 7;

impl HotEntry {
    pub fn write_to(&self, buf: &mut TypedBuffer) {
        buf.put_u16(self.controller.to_u16());
        buf.put_u8(self.ref_alt.pack());
        buf.put_u32(self.position);
    }

    pub fn read_from(buf: &mut TypedBuffer) -> Result<Self> {
        let controller = HotController::from_u16(buf.get_u16()?);
        let ref_alt = RefAlt::unpack(buf.get_u8()?);
        let position = buf.get_u32()?;
        Ok(HotEntry {
            controller,
            ref_alt,
            position,
        })
    }
}

/// Variable-width per-variant metadata:
/// body_length(u32) || quality(f32) || n_alleles(u16) || n_id(u16) ||
/// id_bytes || (u16 length, bytes) x n_alleles.
/// Alleles include the reference first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColdEntry {
    pub quality: f32,
    pub id: String,
    pub alleles: Vec<String>,
}

impl ColdEntry {
    pub fn body_length(&self) -> usize {
        let mut length = 4 + 4 + 2 + 2 + self.id.len();
        for allele in &self.alleles {
            length += 2 + allele.len();
        }
        length
    }

    pub fn write_to(&self, buf: &mut TypedBuffer) -> Result<()> {
        if self.alleles.len() > u16::MAX as usize {
            return Err(err(ErrorKind::Oversize, "allele count exceeds 16-bit field"));
        }
        if self.id.len() > u16::MAX as usize {
            return Err(err(ErrorKind::Oversize, "record id exceeds 16-bit field"));
        }
        buf.put_u32(self.body_length() as u32);
        buf.put_f32(self.quality);
        buf.put_u16(self.alleles.len() as u16);
        buf.put_u16(self.id.len() as u16);
        buf.put_bytes(self.id.as_bytes());
        for allele in &self.alleles {
            if allele.len() > u16::MAX as usize {
                return Err(err(ErrorKind::Oversize, "allele string exceeds 16-bit field"));
            }
            buf.put_u16(allele.len() as u16);
            buf.put_bytes(allele.as_bytes());
        }
        Ok(())
    }

    /// Materialize one entry; allele and id strings are hard-copied out of
    /// the decompressed stream.
    pub fn read_from(buf: &mut TypedBuffer) -> Result<Self> {
        let start = buf.cursor();
        let body_length = buf.get_u32()? as usize;
        let quality = buf.get_f32()?;
        let n_alleles = buf.get_u16()?;
        if n_alleles > 32767 {
            return Err(err(ErrorKind::Corruption, "allele count above 32767"));
        }
        let n_id = buf.get_u16()? as usize;
        let id = String::from_utf8_lossy(buf.get_bytes(n_id)?).into_owned();
        let mut alleles = Vec::with_capacity(n_alleles as usize);
        for _ in 0..n_alleles {
            let l = buf.get_u16()? as usize;
            alleles.push(String::from_utf8_lossy(buf.get_bytes(l)?).into_owned());
        }
        if buf.cursor() - start != body_length {
            return Err(err(ErrorKind::Corruption, "cold meta body length mismatch"));
        }
        Ok(ColdEntry {
            quality,
            id,
            alleles,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn test_hot_controller_round_trip() {
        let c = HotController {
            any_missing: true,
            all_phased: false,
            any_na: false,
            mixed_phasing: true,
            biallelic: true,
            simple: true,
            rle: true,
            rle_width: RleWidth::W4,
            diploid: true,
            mixed_ploidy: false,
        };
        assert_eq!(HotController::from_u16(c.to_u16()), c);
        assert_eq!(c.genotype_layout(), GenotypeLayout::RleDiploidBiallelic);
    }

    #[test]
    fn test_ref_alt_nibbles() {
        let ra = RefAlt::from_alleles("A", "C");
        assert_eq!(ra.pack(), BASE_A << 4 | BASE_C);
        assert_eq!(RefAlt::unpack(ra.pack()), ra);
        assert_eq!(ra.ref_base(), b'A');
        assert_eq!(ra.alt_base(), b'C');

        // Multi-character alleles degrade to N/N.
        let ra = RefAlt::from_alleles("AT", "C");
        assert_eq!(ra.ref_code, BASE_N);
        assert_eq!(ra.alt_code, BASE_N);
    }

    #[test]
    fn test_hot_entry_is_seven_bytes() {
        let mut buf = TypedBuffer::new();
        HotEntry::default().write_to(&mut buf);
        assert_eq!(buf.len(), HOT_ENTRY_SIZE);
    }

    #[test]
    fn test_cold_entry_round_trip() {
        let entry = ColdEntry {
            quality: 29.5,
            id: "rs12345".to_string(),
            alleles: vec!["A".to_string(), "ACCT".to_string(), "<DEL>".to_string()],
        };
        let mut buf = TypedBuffer::new();
        entry.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), entry.body_length());
        let back = ColdEntry::read_from(&mut buf).unwrap();
        assert_eq!(back, entry);
    }
}
