use sha2::{Digest, Sha512};
use tachyon_base::{err, ErrorKind, ReadLeExt, Reader, Result, WriteLeExt, Writer};

const CATEGORY_INFO: u8 = 0;
const CATEGORY_FORMAT: u8 = 1;

/// Whole-archive SHA-512 accumulators, one per INFO and FORMAT stream,
/// fed with the uncompressed container bytes of every block in order.
#[derive(Default)]
pub struct DigestRegistry {
    info: Vec<(u32, Sha512)>,
    format: Vec<(u32, Sha512)>,
}

fn update(slots: &mut Vec<(u32, Sha512)>, key: u32, bytes: &[u8]) {
    match slots.iter_mut().find(|(k, _)| *k == key) {
        Some((_, hasher)) => hasher.update(bytes),
        None => {
            let mut hasher = Sha512::new();
            hasher.update(bytes);
            slots.push((key, hasher));
        }
    }
}

impl DigestRegistry {
    pub fn update_info(&mut self, key: u32, bytes: &[u8]) {
        update(&mut self.info, key, bytes);
    }

    pub fn update_format(&mut self, key: u32, bytes: &[u8]) {
        update(&mut self.format, key, bytes);
    }

    pub fn finalize(self) -> DigestSection {
        DigestSection {
            info: self
                .info
                .into_iter()
                .map(|(k, h)| (k, h.finalize().into()))
                .collect(),
            format: self
                .format
                .into_iter()
                .map(|(k, h)| (k, h.finalize().into()))
                .collect(),
        }
    }
}

/// Finalized digest section as framed in the archive trailer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestSection {
    pub info: Vec<(u32, [u8; 64])>,
    pub format: Vec<(u32, [u8; 64])>,
}

impl DigestSection {
    pub fn write(&self, wr: &mut impl Writer) -> Result<()> {
        wr.write_le_num((self.info.len() + self.format.len()) as u32)?;
        for (category, entries) in [(CATEGORY_INFO, &self.info), (CATEGORY_FORMAT, &self.format)] {
            for (key, digest) in entries {
                wr.write_le_num(category)?;
                wr.write_le_num(*key)?;
                wr.write_byte_slice(digest)?;
            }
        }
        Ok(())
    }

    pub fn read(rd: &mut impl Reader) -> Result<Self> {
        let n = rd.read_le_num::<u32>()?;
        let mut section = DigestSection::default();
        for _ in 0..n {
            let category = rd.read_le_num::<u8>()?;
            let key = rd.read_le_num::<u32>()?;
            let digest = rd.read_byte_array::<64>()?;
            match category {
                CATEGORY_INFO => section.info.push((key, digest)),
                CATEGORY_FORMAT => section.format.push((key, digest)),
                _ => return Err(err(ErrorKind::Format, "unknown digest category")),
            }
        }
        Ok(section)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tachyon_base::MemWriter;
    use test_log::test;

    #[test]
    fn test_streams_digest_independently() {
        let mut registry = DigestRegistry::default();
        registry.update_info(1, b"abc");
        registry.update_info(2, b"abc");
        registry.update_info(1, b"def");
        let section = registry.finalize();
        assert_eq!(section.info.len(), 2);
        let d1 = section.info.iter().find(|(k, _)| *k == 1).unwrap().1;
        let d2 = section.info.iter().find(|(k, _)| *k == 2).unwrap().1;
        assert_ne!(d1, d2);

        // Same bytes in one stream reproduce the digest.
        let mut registry = DigestRegistry::default();
        registry.update_info(9, b"abcdef");
        let again = registry.finalize().info[0].1;
        assert_eq!(again, d1);
    }

    #[test]
    fn test_section_round_trip() {
        let mut registry = DigestRegistry::default();
        registry.update_info(3, b"xyz");
        registry.update_format(5, b"pqr");
        let section = registry.finalize();
        let mut w = MemWriter::new();
        section.write(&mut w).unwrap();
        let mut r = w.try_into_reader().unwrap();
        assert_eq!(DigestSection::read(&mut r).unwrap(), section);
    }
}
