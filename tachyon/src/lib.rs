// Facade over the subsystem crates. Library users normally want exactly
// this surface: the record model, the writer/reader pair, selections and
// the keychain. Anything deeper is reachable through the re-exported
// crates themselves.

pub use tachyon_archive::{
    write_vcf_header, write_vcf_record, ArchiveReader, ArchiveWriter, BlockSelection,
    FieldSelection, LoadedBlock, WriterConfig,
};
pub use tachyon_base::{Error, ErrorKind, FileReader, FileWriter, Result};
pub use tachyon_containers::{
    ArchiveHeader, Contig, FieldCategory, FieldType, FieldValue, Genotypes, MapEntry,
    VariantRecord,
};
pub use tachyon_crypt::Keychain;

pub use tachyon_archive as archive;
pub use tachyon_base as base;
pub use tachyon_codec as codec;
pub use tachyon_containers as containers;
pub use tachyon_crypt as crypt;
pub use tachyon_index as index;

#[cfg(test)]
mod test {
    use super::*;
    use tachyon_base::{MemReader, MemWriter, Writer as _};
    use test_log::test;

    // The facade must be enough to write and read an archive end to end
    // without reaching into the subsystem crates.
    #[test]
    fn test_facade_round_trip() {
        let header = ArchiveHeader {
            contigs: vec![Contig {
                name: "chr1".to_string(),
                length: 100_000,
                n_blocks: 0,
            }],
            samples: vec!["A".to_string(), "B".to_string()],
            entries: vec![MapEntry {
                id: "DP".to_string(),
                idx: 0,
                category: FieldCategory::Info,
                value_type: FieldType::Integer,
            }],
        };
        let mut writer =
            ArchiveWriter::new(MemWriter::new(), header, WriterConfig::default()).unwrap();
        let record = VariantRecord {
            contig_id: 0,
            position: 777,
            id: "rs1".to_string(),
            ref_allele: "G".to_string(),
            alt_alleles: vec!["T".to_string()],
            quality: 50.0,
            info: vec![(0, FieldValue::Int(vec![12]))],
            genotypes: Some(Genotypes::diploid(vec![2, 5, 4, 5])),
            ..VariantRecord::default()
        };
        writer.add_record(record.clone()).unwrap();
        let wr = writer.finalize().unwrap();

        use std::io::Read;
        let mut bytes = Vec::new();
        wr.try_into_reader().unwrap().read_to_end(&mut bytes).unwrap();

        let mut reader = ArchiveReader::open(MemReader::from(bytes)).unwrap();
        let records = reader
            .next_records(&BlockSelection::all())
            .unwrap()
            .unwrap();
        assert_eq!(records, vec![record]);
    }
}
