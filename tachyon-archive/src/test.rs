use std::sync::Arc;

use tachyon_base::{ErrorKind, MemReader, MemWriter, Writer as _};
use tachyon_containers::{
    ArchiveHeader, Contig, FieldCategory, FieldType, FieldValue, Genotypes, MapEntry,
    VariantRecord,
};
use tachyon_crypt::Keychain;
use test_log::test;

use crate::loaded::{BlockSelection, FieldSelection};
use crate::reader::ArchiveReader;
use crate::writer::{ArchiveWriter, WriterConfig};

fn cohort_header(n_samples: usize) -> ArchiveHeader {
    ArchiveHeader {
        contigs: vec![
            Contig {
                name: "chr1".to_string(),
                length: 4_000_000,
                n_blocks: 0,
            },
            Contig {
                name: "chr2".to_string(),
                length: 1_000_000,
                n_blocks: 0,
            },
        ],
        samples: (0..n_samples).map(|i| format!("S{i:04}")).collect(),
        entries: vec![
            MapEntry {
                id: "PASS".to_string(),
                idx: 0,
                category: FieldCategory::Filter,
                value_type: FieldType::Flag,
            },
            MapEntry {
                id: "LowQual".to_string(),
                idx: 1,
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
                id: "AF".to_string(),
                idx: 2,
                category: FieldCategory::Info,
                value_type: FieldType::Float,
            },
            MapEntry {
                id: "DB".to_string(),
                idx: 3,
                category: FieldCategory::Info,
                value_type: FieldType::Flag,
            },
            MapEntry {
                id: "GQ".to_string(),
                idx: 4,
                category: FieldCategory::Format,
                value_type: FieldType::Integer,
            },
        ],
    }
}

fn phased(a: u8, b: u8) -> [u8; 2] {
    [(a + 1) << 1, (b + 1) << 1 | 1]
}

/// Deterministic little cohort: positions ascend, genotypes cluster so
/// the permutation and RLE paths both do real work.
fn cohort_records(n_samples: usize, n_records: usize) -> Vec<VariantRecord> {
    let mut records = Vec::with_capacity(n_records);
    for i in 0..n_records {
        let mut codes = Vec::with_capacity(n_samples * 2);
        for s in 0..n_samples {
            let (a, b) = match (s + i) % 5 {
                0 | 1 => (0, 0),
                2 => (0, 1),
                3 => (1, 1),
                _ => (0, 0),
            };
            codes.extend_from_slice(&phased(a as u8, b as u8));
        }
        let mut info = vec![(1_u32, FieldValue::Int(vec![30 + i as i32]))];
        if i % 2 == 0 {
            info.push((2, FieldValue::Float(vec![0.125 * (i % 8) as f32])));
        }
        if i % 3 == 0 {
            info.push((3, FieldValue::Flag));
        }
        records.push(VariantRecord {
            contig_id: 0,
            position: 1_000 + (i as u64) * 37,
            id: format!("rs{i}"),
            ref_allele: "A".to_string(),
            alt_alleles: vec!["C".to_string()],
            quality: 29.5 + i as f32,
            filter_ids: if i % 4 == 0 { vec![0] } else { vec![0, 1] },
            info,
            format: vec![(
                4,
                FieldValue::Int((0..n_samples).map(|s| 40 + ((s + i) % 7) as i32).collect()),
            )],
            genotypes: Some(Genotypes::diploid(codes)),
        });
    }
    records
}

fn write_archive(
    records: &[VariantRecord],
    n_samples: usize,
    config: WriterConfig,
) -> (Vec<u8>, Option<Arc<Keychain>>) {
    let header = cohort_header(n_samples);
    let mut writer = ArchiveWriter::new(MemWriter::new(), header, config).unwrap();
    for record in records {
        writer.add_record(record.clone()).unwrap();
    }
    let keychain = writer.keychain().cloned();
    let wr = writer.finalize().unwrap();
    let mut rd = wr.try_into_reader().unwrap();
    use std::io::Read;
    let mut bytes = Vec::new();
    rd.read_to_end(&mut bytes).unwrap();
    (bytes, keychain)
}

#[test]
fn test_round_trip_plain() {
    let n_samples = 12;
    let records = cohort_records(n_samples, 40);
    let config = WriterConfig {
        block_size: 16,
        ..WriterConfig::default()
    };
    let (bytes, _) = write_archive(&records, n_samples, config);

    let mut reader = ArchiveReader::open(MemReader::from(bytes)).unwrap();
    assert_eq!(reader.n_blocks(), 3);
    assert_eq!(reader.header().contigs[0].n_blocks, 3);

    let mut decoded = Vec::new();
    while let Some(records) = reader.next_records(&BlockSelection::all()).unwrap() {
        decoded.extend(records);
    }
    assert_eq!(decoded, records);
}

#[test]
fn test_round_trip_without_permutation() {
    let n_samples = 7;
    let records = cohort_records(n_samples, 10);
    let config = WriterConfig {
        block_size: 64,
        permute: false,
        ..WriterConfig::default()
    };
    let (bytes, _) = write_archive(&records, n_samples, config);

    let mut reader = ArchiveReader::open(MemReader::from(bytes)).unwrap();
    let decoded = reader.next_records(&BlockSelection::all()).unwrap().unwrap();
    assert_eq!(decoded, records);
}

#[test]
fn test_column_selective_load() {
    let n_samples = 8;
    let records = cohort_records(n_samples, 20);
    let (bytes, _) = write_archive(&records, n_samples, WriterConfig::default());

    // Only DP (key 1), no genotypes, no FORMAT.
    let selection = BlockSelection {
        ppa: false,
        gt_rle: false,
        gt_packed: false,
        gt_support: false,
        info: FieldSelection::Keys(vec![1]),
        format: FieldSelection::None,
        ..BlockSelection::all()
    };
    let mut reader = ArchiveReader::open(MemReader::from(bytes)).unwrap();
    let decoded = reader.next_records(&selection).unwrap().unwrap();
    assert_eq!(decoded.len(), records.len());
    for (got, want) in decoded.iter().zip(&records) {
        assert_eq!(got.position, want.position);
        assert_eq!(got.id, want.id);
        assert_eq!(got.alt_alleles, want.alt_alleles);
        assert_eq!(got.filter_ids, want.filter_ids);
        assert!(got.genotypes.is_none());
        assert!(got.format.is_empty());
        // Exactly the selected INFO column came back.
        let want_dp: Vec<&(u32, FieldValue)> =
            want.info.iter().filter(|(k, _)| *k == 1).collect();
        assert_eq!(got.info.iter().collect::<Vec<_>>(), want_dp);
    }
}

#[test]
fn test_overlap_query_on_archive() {
    let n_samples = 4;
    let records = cohort_records(n_samples, 30);
    let config = WriterConfig {
        block_size: 10,
        ..WriterConfig::default()
    };
    let (bytes, _) = write_archive(&records, n_samples, config);

    let reader = ArchiveReader::open(MemReader::from(bytes)).unwrap();
    // Records span positions 1000..=2073 in three blocks of ten.
    let hits = reader.find_overlap(0, 1_000, 1_100).unwrap();
    assert_eq!(hits, vec![0]);
    let hits = reader.find_overlap(0, 1_300, 1_800).unwrap();
    assert!(hits.len() >= 2);
    let hits = reader.find_overlap(0, 3_000_000, 3_000_100).unwrap();
    assert!(hits.is_empty());
}

#[test]
fn test_contig_change_rotates_block() {
    let n_samples = 4;
    let mut records = cohort_records(n_samples, 6);
    let mut second = cohort_records(n_samples, 4);
    for r in &mut second {
        r.contig_id = 1;
    }
    records.extend(second.clone());

    let (bytes, _) = write_archive(&records, n_samples, WriterConfig::default());
    let mut reader = ArchiveReader::open(MemReader::from(bytes)).unwrap();
    assert_eq!(reader.n_blocks(), 2);
    let first = reader.next_records(&BlockSelection::all()).unwrap().unwrap();
    assert_eq!(first.len(), 6);
    let rest = reader.next_records(&BlockSelection::all()).unwrap().unwrap();
    assert_eq!(rest, second);
}

#[test]
fn test_carry_over_on_decreasing_position() {
    let n_samples = 2;
    let mut records = cohort_records(n_samples, 4);
    // A position step backwards forces the offending record into a new
    // block as its first variant.
    records[3].position = records[0].position;

    let header = cohort_header(n_samples);
    let mut writer =
        ArchiveWriter::new(MemWriter::new(), header, WriterConfig::default()).unwrap();
    for record in &records {
        writer.add_record(record.clone()).unwrap();
    }
    assert_eq!(writer.n_blocks(), 1); // first three flushed at rotation
    let wr = writer.finalize().unwrap();
    let mut reader = ArchiveReader::open(wr.try_into_reader().unwrap()).unwrap();
    assert_eq!(reader.n_blocks(), 2);

    let first = reader.next_records(&BlockSelection::all()).unwrap().unwrap();
    assert_eq!(first.len(), 3);
    let second = reader.next_records(&BlockSelection::all()).unwrap().unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0], records[3]);
}

#[test]
fn test_encrypted_round_trip_and_tamper() {
    let n_samples = 6;
    let records = cohort_records(n_samples, 12);
    let config = WriterConfig {
        encrypt: true,
        ..WriterConfig::default()
    };
    let (bytes, keychain) = write_archive(&records, n_samples, config);
    let keychain = keychain.unwrap();
    assert!(keychain.len() > 0);

    // With the keychain: full round trip.
    let mut reader = ArchiveReader::open_encrypted(
        MemReader::from(bytes.clone()),
        keychain.clone(),
    )
    .unwrap();
    let decoded = reader.next_records(&BlockSelection::all()).unwrap().unwrap();
    assert_eq!(decoded, records);

    // Without it, every column is reported and skipped.
    let mut reader = ArchiveReader::open(MemReader::from(bytes.clone())).unwrap();
    let block = reader.next_block(&BlockSelection::all()).unwrap().unwrap();
    assert!(block.meta_hot.is_none());
    assert!(!block.skipped.is_empty());
    assert!(block.skipped.iter().all(|s| s.kind == ErrorKind::Decrypt));

    // A flipped ciphertext byte must fail tag verification; no partial
    // data may escape into the loaded block.
    let mut probe =
        ArchiveReader::open_encrypted(MemReader::from(bytes.clone()), keychain.clone()).unwrap();
    let block0_offset = probe.index().linear().get(0).unwrap().byte_offset;
    let block0 = probe.next_block(&BlockSelection::all()).unwrap().unwrap();
    let hot_ciphertext_byte =
        block0_offset as usize + block0.header.base.meta_hot as usize + 34 + 2;

    let mut tampered = bytes.clone();
    tampered[hot_ciphertext_byte] ^= 0x01;
    let mut reader =
        ArchiveReader::open_encrypted(MemReader::from(tampered), keychain).unwrap();
    let block = reader.next_block(&BlockSelection::all()).unwrap().unwrap();
    assert!(block.meta_hot.is_none());
    assert!(block
        .skipped
        .iter()
        .any(|s| s.name == "meta_hot" && s.kind == ErrorKind::Decrypt));
}

#[test]
fn test_truncated_archive_is_rejected() {
    let n_samples = 4;
    let records = cohort_records(n_samples, 5);
    let (bytes, _) = write_archive(&records, n_samples, WriterConfig::default());
    let truncated = bytes[..bytes.len() - 7].to_vec();
    let e = ArchiveReader::open(MemReader::from(truncated)).unwrap_err();
    assert!(matches!(e.kind(), ErrorKind::Corruption | ErrorKind::Truncation));
}

#[test]
fn test_keychain_sidecar_round_trip() {
    let n_samples = 3;
    let records = cohort_records(n_samples, 4);
    let config = WriterConfig {
        encrypt: true,
        ..WriterConfig::default()
    };
    let (bytes, keychain) = write_archive(&records, n_samples, config);
    let keychain = keychain.unwrap();

    // Persist the sidecar, reload it, and decode with the reloaded copy.
    let mut sidecar = MemWriter::new();
    keychain.write(&mut sidecar).unwrap();
    let reloaded = Keychain::read(&mut sidecar.try_into_reader().unwrap()).unwrap();
    assert_eq!(reloaded.len(), keychain.len());

    let mut reader = ArchiveReader::open_encrypted(
        MemReader::from(bytes),
        Arc::new(reloaded),
    )
    .unwrap();
    let decoded = reader.next_records(&BlockSelection::all()).unwrap().unwrap();
    assert_eq!(decoded, records);
}

#[test]
fn test_vcf_streaming_output() {
    let n_samples = 3;
    let records = cohort_records(n_samples, 4);
    let (bytes, _) = write_archive(&records, n_samples, WriterConfig::default());
    let mut reader = ArchiveReader::open(MemReader::from(bytes)).unwrap();

    let mut out = Vec::new();
    crate::vcf::write_vcf_header(&mut out, reader.header()).unwrap();
    while let Some(records) = reader.next_records(&BlockSelection::all()).unwrap() {
        for record in &records {
            crate::vcf::write_vcf_record(&mut out, reader.header(), record).unwrap();
        }
    }
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    // Meta lines, #CHROM, then one line per variant.
    assert_eq!(lines.iter().filter(|l| !l.starts_with('#')).count(), 4);
    let first = lines.iter().find(|l| l.starts_with("chr1\t")).unwrap();
    assert!(first.starts_with("chr1\t1001\trs0\tA\tC\t"));
    assert!(first.contains("DP=30"));
    assert!(first.contains("GT:GQ"));
}

#[test]
fn test_digest_section_present_per_stream() {
    let n_samples = 4;
    let records = cohort_records(n_samples, 10);
    let (bytes, _) = write_archive(&records, n_samples, WriterConfig::default());
    let reader = ArchiveReader::open(MemReader::from(bytes)).unwrap();
    let digests = reader.digests();
    // INFO keys 1, 2, 3 and FORMAT key 4 were observed.
    let mut info_keys: Vec<u32> = digests.info.iter().map(|(k, _)| *k).collect();
    info_keys.sort_unstable();
    assert_eq!(info_keys, vec![1, 2, 3]);
    assert_eq!(digests.format.len(), 1);
    assert_eq!(digests.format[0].0, 4);
}
