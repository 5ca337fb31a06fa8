use std::io::Write;

use tachyon_base::{err, ErrorKind, Result};
use tachyon_containers::{
    unpack_allele, unpack_phase, ArchiveHeader, FieldCategory, FieldValue, Genotypes,
    VariantRecord, EOV_I32, GT_EOV_CODE, MISSING_I32,
};

/// Render the archive header as VCF meta lines plus the #CHROM line.
/// Only what the archive actually stores is emitted: contigs, the known
/// field ids per category, and the sample columns.
pub fn write_vcf_header(wr: &mut impl Write, header: &ArchiveHeader) -> Result<()> {
    writeln!(wr, "##fileformat=VCFv4.2")?;
    for contig in &header.contigs {
        writeln!(wr, "##contig=<ID={},length={}>", contig.name, contig.length)?;
    }
    for entry in &header.entries {
        match entry.category {
            FieldCategory::Info => writeln!(wr, "##INFO=<ID={}>", entry.id)?,
            FieldCategory::Format => writeln!(wr, "##FORMAT=<ID={}>", entry.id)?,
            FieldCategory::Filter => writeln!(wr, "##FILTER=<ID={}>", entry.id)?,
            FieldCategory::Contig => {}
        }
    }
    write!(wr, "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO")?;
    if !header.samples.is_empty() {
        write!(wr, "\tFORMAT")?;
        for sample in &header.samples {
            write!(wr, "\t{sample}")?;
        }
    }
    writeln!(wr)?;
    Ok(())
}

fn field_id(header: &ArchiveHeader, category: FieldCategory, idx: u32) -> String {
    header
        .entry_for(category, idx)
        .map(|e| e.id.clone())
        .unwrap_or_else(|| format!("{idx}"))
}

fn push_typed_values(out: &mut String, value: &FieldValue) {
    match value {
        FieldValue::Flag => {}
        FieldValue::Int(values) => {
            for (i, &v) in values.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                match v {
                    MISSING_I32 => out.push('.'),
                    EOV_I32 => {}
                    _ => out.push_str(&v.to_string()),
                }
            }
        }
        FieldValue::Float(values) => {
            for (i, &v) in values.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&format!("{v}"));
            }
        }
        FieldValue::Char(values) => {
            out.push_str(&String::from_utf8_lossy(values));
        }
    }
}

fn render_genotype(out: &mut String, gt: &Genotypes, sample: usize) {
    for (i, &code) in gt.sample_codes(sample).iter().enumerate() {
        if code == GT_EOV_CODE {
            // Padding for a lower-ploidy sample; nothing to print.
            continue;
        }
        if i > 0 {
            out.push(if unpack_phase(code) == 1 { '|' } else { '/' });
        }
        let allele = unpack_allele(code);
        if allele == 0 {
            out.push('.');
        } else {
            out.push_str(&(allele - 1).to_string());
        }
    }
}

/// Render one reconstructed record as a VCF data line. Fields the block
/// selection left unloaded come out as the VCF missing value.
pub fn write_vcf_record(
    wr: &mut impl Write,
    header: &ArchiveHeader,
    record: &VariantRecord,
) -> Result<()> {
    let contig = header
        .contig(record.contig_id)
        .ok_or_else(|| err(ErrorKind::Bounds, "record references unknown contig"))?;

    let mut line = String::with_capacity(96);
    line.push_str(&contig.name);
    line.push('\t');
    line.push_str(&(record.position + 1).to_string()); // VCF is 1-based
    line.push('\t');
    line.push_str(if record.id.is_empty() { "." } else { &record.id });
    line.push('\t');
    line.push_str(if record.ref_allele.is_empty() {
        "."
    } else {
        &record.ref_allele
    });
    line.push('\t');
    if record.alt_alleles.is_empty() {
        line.push('.');
    } else {
        line.push_str(&record.alt_alleles.join(","));
    }
    line.push('\t');
    line.push_str(&format!("{}", record.quality));
    line.push('\t');
    if record.filter_ids.is_empty() {
        line.push('.');
    } else {
        let names: Vec<String> = record
            .filter_ids
            .iter()
            .map(|&idx| field_id(header, FieldCategory::Filter, idx))
            .collect();
        line.push_str(&names.join(";"));
    }
    line.push('\t');
    if record.info.is_empty() {
        line.push('.');
    } else {
        for (i, (idx, value)) in record.info.iter().enumerate() {
            if i > 0 {
                line.push(';');
            }
            line.push_str(&field_id(header, FieldCategory::Info, *idx));
            if !matches!(value, FieldValue::Flag) {
                line.push('=');
                push_typed_values(&mut line, value);
            }
        }
    }

    let n_samples = header.n_samples();
    if n_samples > 0 && (record.genotypes.is_some() || !record.format.is_empty()) {
        line.push('\t');
        let mut format_names = Vec::new();
        if record.genotypes.is_some() {
            format_names.push("GT".to_string());
        }
        for (idx, _) in &record.format {
            format_names.push(field_id(header, FieldCategory::Format, *idx));
        }
        line.push_str(&format_names.join(":"));

        for sample in 0..n_samples {
            line.push('\t');
            let mut first = true;
            if let Some(gt) = &record.genotypes {
                render_genotype(&mut line, gt, sample);
                first = false;
            }
            for (_, value) in &record.format {
                if !first {
                    line.push(':');
                }
                first = false;
                let per_sample = value.element_count() as usize / n_samples.max(1);
                match value {
                    FieldValue::Int(values) => {
                        let slice = &values[sample * per_sample..(sample + 1) * per_sample];
                        push_typed_values(&mut line, &FieldValue::Int(slice.to_vec()));
                    }
                    FieldValue::Float(values) => {
                        let slice = &values[sample * per_sample..(sample + 1) * per_sample];
                        push_typed_values(&mut line, &FieldValue::Float(slice.to_vec()));
                    }
                    FieldValue::Char(values) => {
                        let slice = &values[sample * per_sample..(sample + 1) * per_sample];
                        push_typed_values(&mut line, &FieldValue::Char(slice.to_vec()));
                    }
                    FieldValue::Flag => {}
                }
            }
        }
    }

    writeln!(wr, "{line}")?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use tachyon_containers::{Contig, FieldType, MapEntry};
    use test_log::test;

    fn tiny_header() -> ArchiveHeader {
        ArchiveHeader {
            contigs: vec![Contig {
                name: "chr7".to_string(),
                length: 1_000,
                n_blocks: 1,
            }],
            samples: vec!["S0".to_string(), "S1".to_string()],
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
                    id: "GQ".to_string(),
                    idx: 4,
                    category: FieldCategory::Format,
                    value_type: FieldType::Integer,
                },
            ],
        }
    }

    #[test]
    fn test_header_lines() {
        let mut out = Vec::new();
        write_vcf_header(&mut out, &tiny_header()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("##fileformat="));
        assert!(text.contains("##contig=<ID=chr7,length=1000>"));
        assert!(text.contains("##INFO=<ID=DP>"));
        assert!(text.ends_with("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS0\tS1\n"));
    }

    #[test]
    fn test_record_line() {
        let record = VariantRecord {
            contig_id: 0,
            position: 99, // 0-based; renders as 100
            id: "rs9".to_string(),
            ref_allele: "A".to_string(),
            alt_alleles: vec!["C".to_string()],
            quality: 31.0,
            filter_ids: vec![0],
            info: vec![(1, FieldValue::Int(vec![42]))],
            format: vec![(4, FieldValue::Int(vec![50, 60]))],
            // S0 = 0|1, S1 = ./.
            genotypes: Some(Genotypes::diploid(vec![2, 5, 0, 0])),
            ..VariantRecord::default()
        };
        let mut out = Vec::new();
        write_vcf_record(&mut out, &tiny_header(), &record).unwrap();
        let line = String::from_utf8(out).unwrap();
        assert_eq!(
            line,
            "chr7\t100\trs9\tA\tC\t31\tPASS\tDP=42\tGT:GQ\t0|1:50\t./.:60\n"
        );
    }

    #[test]
    fn test_site_only_record_renders_missing_columns() {
        let record = VariantRecord {
            contig_id: 0,
            position: 4,
            ref_allele: "G".to_string(),
            alt_alleles: vec!["T".to_string()],
            ..VariantRecord::default()
        };
        let mut out = Vec::new();
        write_vcf_record(&mut out, &tiny_header(), &record).unwrap();
        let line = String::from_utf8(out).unwrap();
        assert_eq!(line, "chr7\t5\t.\tG\tT\t0\t.\t.\n");
    }
}
