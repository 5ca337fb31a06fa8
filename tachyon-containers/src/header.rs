use tachyon_base::{err, ErrorKind, ReadLeExt, Reader, Result, WriteLeExt, Writer};

/// Category of a header map entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FieldCategory {
    Info = 0,
    Format = 1,
    Filter = 2,
    Contig = 3,
}

impl FieldCategory {
    pub fn from_u8(value: u8) -> Result<Self> {
        Ok(match value {
            0 => FieldCategory::Info,
            1 => FieldCategory::Format,
            2 => FieldCategory::Filter,
            3 => FieldCategory::Contig,
            _ => return Err(err(ErrorKind::Format, "unknown map entry category")),
        })
    }
}

/// Declared value type of a header map entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FieldType {
    Integer = 0,
    Float = 1,
    Flag = 2,
    Character = 3,
    String = 4,
}

impl FieldType {
    pub fn from_u8(value: u8) -> Result<Self> {
        Ok(match value {
            0 => FieldType::Integer,
            1 => FieldType::Float,
            2 => FieldType::Flag,
            3 => FieldType::Character,
            4 => FieldType::String,
            _ => return Err(err(ErrorKind::Format, "unknown map entry value type")),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contig {
    pub name: String,
    pub length: u64,
    /// Number of blocks referencing this contig; incremented during write.
    pub n_blocks: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapEntry {
    pub id: String,
    pub idx: u32,
    pub category: FieldCategory,
    pub value_type: FieldType,
}

/// Archive-level header: ordered contigs, ordered sample names, ordered
/// map entries. Constructed once at archive start, immutable thereafter
/// (block counts excepted, which settle before the header is written).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArchiveHeader {
    pub contigs: Vec<Contig>,
    pub samples: Vec<String>,
    pub entries: Vec<MapEntry>,
}

fn write_string(wr: &mut impl Writer, s: &str) -> Result<()> {
    wr.write_le_num(s.len() as u32)?;
    wr.write_byte_slice(s.as_bytes())?;
    Ok(())
}

fn read_string(rd: &mut impl Reader) -> Result<String> {
    let n = rd.read_le_num::<u32>()? as usize;
    let bytes = rd.read_byte_vec(n)?;
    String::from_utf8(bytes).map_err(|_| err(ErrorKind::Format, "header string is not utf-8"))
}

impl ArchiveHeader {
    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn contig(&self, contig_id: u32) -> Option<&Contig> {
        self.contigs.get(contig_id as usize)
    }

    pub fn note_block_for_contig(&mut self, contig_id: u32) {
        if let Some(contig) = self.contigs.get_mut(contig_id as usize) {
            contig.n_blocks += 1;
        }
    }

    /// Look up a map entry by its header-assigned integer idx within one
    /// category.
    pub fn entry_for(&self, category: FieldCategory, idx: u32) -> Option<&MapEntry> {
        self.entries
            .iter()
            .find(|e| e.category == category && e.idx == idx)
    }

    pub fn write(&self, wr: &mut impl Writer) -> Result<()> {
        wr.write_le_num(self.contigs.len() as u32)?;
        for contig in &self.contigs {
            write_string(wr, &contig.name)?;
            wr.write_le_num(contig.length)?;
            wr.write_le_num(contig.n_blocks)?;
        }
        wr.write_le_num(self.samples.len() as u32)?;
        for sample in &self.samples {
            write_string(wr, sample)?;
        }
        wr.write_le_num(self.entries.len() as u32)?;
        for entry in &self.entries {
            write_string(wr, &entry.id)?;
            wr.write_le_num(entry.idx)?;
            wr.write_le_num(entry.category as u8)?;
            wr.write_le_num(entry.value_type as u8)?;
        }
        Ok(())
    }

    pub fn read(rd: &mut impl Reader) -> Result<Self> {
        let n_contigs = rd.read_le_num::<u32>()?;
        let mut contigs = Vec::with_capacity(n_contigs as usize);
        for _ in 0..n_contigs {
            let name = read_string(rd)?;
            let length = rd.read_le_num::<u64>()?;
            let n_blocks = rd.read_le_num::<u32>()?;
            contigs.push(Contig {
                name,
                length,
                n_blocks,
            });
        }
        let n_samples = rd.read_le_num::<u32>()?;
        let mut samples = Vec::with_capacity(n_samples as usize);
        for _ in 0..n_samples {
            samples.push(read_string(rd)?);
        }
        let n_entries = rd.read_le_num::<u32>()?;
        let mut entries = Vec::with_capacity(n_entries as usize);
        for _ in 0..n_entries {
            let id = read_string(rd)?;
            let idx = rd.read_le_num::<u32>()?;
            let category = FieldCategory::from_u8(rd.read_le_num::<u8>()?)?;
            let value_type = FieldType::from_u8(rd.read_le_num::<u8>()?)?;
            entries.push(MapEntry {
                id,
                idx,
                category,
                value_type,
            });
        }
        Ok(ArchiveHeader {
            contigs,
            samples,
            entries,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tachyon_base::MemWriter;
    use test_log::test;

    fn sample_header() -> ArchiveHeader {
        ArchiveHeader {
            contigs: vec![
                Contig {
                    name: "chr1".to_string(),
                    length: 248_956_422,
                    n_blocks: 3,
                },
                Contig {
                    name: "chrM".to_string(),
                    length: 16_569,
                    n_blocks: 0,
                },
            ],
            samples: vec!["HG001".to_string(), "HG002".to_string()],
            entries: vec![
                MapEntry {
                    id: "PASS".to_string(),
                    idx: 0,
                    category: FieldCategory::Filter,
                    value_type: FieldType::Flag,
                },
                MapEntry {
                    id: "DP".to_string(),
                    idx: 1,
                    category: FieldCategory::Info,
                    value_type: FieldType::Integer,
                },
                MapEntry {
                    id: "GT".to_string(),
                    idx: 2,
                    category: FieldCategory::Format,
                    value_type: FieldType::String,
                },
            ],
        }
    }

    #[test]
    fn test_header_round_trip() {
        let header = sample_header();
        let mut w = MemWriter::new();
        header.write(&mut w).unwrap();
        let mut r = w.try_into_reader().unwrap();
        assert_eq!(ArchiveHeader::read(&mut r).unwrap(), header);
    }

    #[test]
    fn test_entry_lookup_respects_category() {
        let header = sample_header();
        assert_eq!(
            header.entry_for(FieldCategory::Info, 1).map(|e| &*e.id),
            Some("DP")
        );
        assert!(header.entry_for(FieldCategory::Filter, 1).is_none());
    }
}
