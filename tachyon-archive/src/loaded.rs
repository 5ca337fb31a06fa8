use std::io::SeekFrom;

use tracing::warn;

use tachyon_base::{err, ErrorKind, Reader, Result, TypedBuffer};
use tachyon_codec::{
    bcf_word_width, decode_diploid, unpermute_diploid, CodecManager, PermutationArray,
    TAG_BCF_PACKED, TAG_BIALLELIC_RLE,
};
use tachyon_containers::{
    ColdEntry, DataContainer, FieldValue, Genotypes, HotEntry, PrimitiveType, VariantRecord,
    EOV_I32, MISSING_I32,
};

use crate::block::TAG_NO_GT;
use crate::footer::{check_block_sentinel, BlockFooter, BlockHeader};

/// Which INFO/FORMAT columns a block load should touch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldSelection {
    None,
    #[default]
    All,
    Keys(Vec<u32>),
}

/// Per-column load mask. Only the selected streams are seeked, read and
/// decoded; everything else stays untouched on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSelection {
    pub ppa: bool,
    pub meta_hot: bool,
    pub meta_cold: bool,
    pub gt_rle: bool,
    pub gt_packed: bool,
    pub gt_support: bool,
    pub info: FieldSelection,
    pub format: FieldSelection,
    pub filters: bool,
}

impl Default for BlockSelection {
    fn default() -> Self {
        Self::all()
    }
}

impl BlockSelection {
    pub fn all() -> Self {
        BlockSelection {
            ppa: true,
            meta_hot: true,
            meta_cold: true,
            gt_rle: true,
            gt_packed: true,
            gt_support: true,
            info: FieldSelection::All,
            format: FieldSelection::All,
            filters: true,
        }
    }

    /// Site-only view: positions, ids, alleles, filters.
    pub fn meta_only() -> Self {
        BlockSelection {
            ppa: false,
            meta_hot: true,
            meta_cold: true,
            gt_rle: false,
            gt_packed: false,
            gt_support: false,
            info: FieldSelection::None,
            format: FieldSelection::None,
            filters: true,
        }
    }

    pub fn wants_gt(&self) -> bool {
        self.gt_rle || self.gt_packed
    }
}

/// A column the reader gave up on; the rest of the block stays usable.
#[derive(Debug, Clone)]
pub struct SkippedColumn {
    pub name: String,
    pub kind: ErrorKind,
}

/// One block's selected columns after decryption, decompression and
/// checksum verification.
pub struct LoadedBlock {
    pub header: BlockHeader,
    pub footer: BlockFooter,
    pub ppa: Option<PermutationArray>,
    pub meta_hot: Option<DataContainer>,
    pub meta_cold: Option<DataContainer>,
    pub gt_rle: Option<DataContainer>,
    pub gt_packed: Option<DataContainer>,
    pub gt_support: Option<DataContainer>,
    pub info_ids: Option<DataContainer>,
    pub filter_ids: Option<DataContainer>,
    pub format_ids: Option<DataContainer>,
    pub info: Vec<(u32, DataContainer)>,
    pub format: Vec<(u32, DataContainer)>,
    pub skipped: Vec<SkippedColumn>,
}

fn load_column(
    rd: &mut impl Reader,
    codec: &CodecManager,
    block_start: u64,
    offset: u32,
    name: &str,
    skipped: &mut Vec<SkippedColumn>,
) -> Result<Option<DataContainer>> {
    rd.seek(SeekFrom::Start(block_start + offset as u64))?;
    let mut container = DataContainer::read(rd)?;
    match codec.decode(&mut container) {
        Ok(()) => Ok(Some(container)),
        Err(e) if e.is_column_recoverable() => {
            warn!(target: "tachyon", "skipping unreadable column {}: {:?}", name, e.kind());
            skipped.push(SkippedColumn {
                name: name.to_string(),
                kind: e.kind(),
            });
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Read one block at the reader's current position, honouring the
/// selection mask. Leaves the stream positioned one past the block
/// sentinel. Container-level failures surface in `skipped`; anything
/// structural aborts the block.
pub fn read_block(
    rd: &mut impl Reader,
    codec: &CodecManager,
    selection: &BlockSelection,
) -> Result<LoadedBlock> {
    let block_start = rd.pos()?;
    let header = BlockHeader::read(rd)?;
    let mut skipped = Vec::new();

    let ppa = if selection.ppa && header.controller.has_gt_permuted {
        load_column(rd, codec, block_start, header.base.ppa, "ppa", &mut skipped)?
            .map(|c| decode_permutation(&c))
            .transpose()?
    } else {
        None
    };

    let meta_hot = if selection.meta_hot {
        load_column(rd, codec, block_start, header.base.meta_hot, "meta_hot", &mut skipped)?
    } else {
        None
    };
    let meta_cold = if selection.meta_cold {
        load_column(rd, codec, block_start, header.base.meta_cold, "meta_cold", &mut skipped)?
    } else {
        None
    };
    let gt_rle = if selection.gt_rle {
        load_column(rd, codec, block_start, header.base.gt_rle, "gt_rle", &mut skipped)?
    } else {
        None
    };
    let gt_packed = if selection.gt_packed {
        load_column(rd, codec, block_start, header.base.gt_packed, "gt_packed", &mut skipped)?
    } else {
        None
    };
    let gt_support = if selection.gt_support || selection.wants_gt() {
        load_column(rd, codec, block_start, header.base.gt_support, "gt_support", &mut skipped)?
    } else {
        None
    };

    let info_ids = if selection.info != FieldSelection::None {
        load_column(rd, codec, block_start, header.base.info_ids, "info_ids", &mut skipped)?
    } else {
        None
    };
    let filter_ids = if selection.filters {
        load_column(rd, codec, block_start, header.base.filter_ids, "filter_ids", &mut skipped)?
    } else {
        None
    };
    let format_ids = if selection.format != FieldSelection::None {
        load_column(rd, codec, block_start, header.base.format_ids, "format_ids", &mut skipped)?
    } else {
        None
    };

    // Column-selective loads: intersect the wanted keys with this
    // block's table, then read ascending on offset for forward i/o.
    let mut info = Vec::new();
    let wanted: Vec<(u32, u32)> = match &selection.info {
        FieldSelection::None => Vec::new(),
        FieldSelection::All => header.info_offsets.clone(),
        FieldSelection::Keys(keys) => {
            let mut hits: Vec<(u32, u32)> = header
                .info_offsets
                .iter()
                .filter(|(k, _)| keys.contains(k))
                .copied()
                .collect();
            hits.sort_by_key(|&(_, offset)| offset);
            hits
        }
    };
    for (key, offset) in wanted {
        let name = format!("info:{key}");
        if let Some(c) = load_column(rd, codec, block_start, offset, &name, &mut skipped)? {
            info.push((key, c));
        }
    }

    let mut format = Vec::new();
    let wanted: Vec<(u32, u32)> = match &selection.format {
        FieldSelection::None => Vec::new(),
        FieldSelection::All => header.format_offsets.clone(),
        FieldSelection::Keys(keys) => {
            let mut hits: Vec<(u32, u32)> = header
                .format_offsets
                .iter()
                .filter(|(k, _)| keys.contains(k))
                .copied()
                .collect();
            hits.sort_by_key(|&(_, offset)| offset);
            hits
        }
    };
    for (key, offset) in wanted {
        let name = format!("format:{key}");
        if let Some(c) = load_column(rd, codec, block_start, offset, &name, &mut skipped)? {
            format.push((key, c));
        }
    }

    rd.seek(SeekFrom::Start(block_start + header.offset_footer as u64))?;
    let footer = BlockFooter::read(rd)?;
    check_block_sentinel(rd)?;
    if footer.end_of_block_abs != block_start + header.end_of_block as u64 {
        return Err(err(ErrorKind::Corruption, "footer end offset mismatch"));
    }
    rd.seek(SeekFrom::Start(block_start + header.end_of_block as u64))?;

    Ok(LoadedBlock {
        header,
        footer,
        ppa,
        meta_hot,
        meta_cold,
        gt_rle,
        gt_packed,
        gt_support,
        info_ids,
        filter_ids,
        format_ids,
        info,
        format,
        skipped,
    })
}

fn decode_permutation(container: &DataContainer) -> Result<PermutationArray> {
    let width = container.primitive().width();
    if width == 0 {
        return Err(err(ErrorKind::Format, "permutation stream with zero width"));
    }
    let mut buf = container.data.clone();
    buf.rewind();
    let mut perm = Vec::with_capacity(container.n_entries as usize);
    while buf.remaining() >= width {
        perm.push(buf.get_uint_at_width(width)? as u32);
    }
    let perm = PermutationArray::from_vec(perm);
    perm.validate()?;
    Ok(perm)
}

/// A cursor over one field container: the payload is consumed strictly
/// in variant order, one stride's worth of values per participating
/// variant. Uniform streams re-read their single window instead.
struct FieldCursor {
    buf: TypedBuffer,
    strides: Option<Vec<u32>>,
    stride_index: usize,
}

impl FieldCursor {
    fn new(container: &DataContainer) -> Result<Self> {
        let strides = if container.header.controller.mixed_stride {
            Some(container.decoded_strides()?)
        } else {
            None
        };
        let mut buf = container.data.clone();
        buf.rewind();
        Ok(FieldCursor {
            buf,
            strides,
            stride_index: 0,
        })
    }

    fn next_stride(&mut self, container: &DataContainer) -> Result<u32> {
        match &self.strides {
            Some(strides) => {
                let s = *strides
                    .get(self.stride_index)
                    .ok_or_else(|| err(ErrorKind::Corruption, "stride stream exhausted"))?;
                self.stride_index += 1;
                Ok(s)
            }
            None => Ok(container.header.stride.max(0) as u32),
        }
    }
}

fn read_int_word(buf: &mut TypedBuffer, primitive: PrimitiveType, signed: bool) -> Result<i32> {
    Ok(match (primitive, signed) {
        (PrimitiveType::U8, false) => buf.get_u8()? as i32,
        (PrimitiveType::U8, true) => match buf.get_u8()? {
            0x80 => MISSING_I32,
            0x81 => EOV_I32,
            v => v as i8 as i32,
        },
        (PrimitiveType::U16, false) => buf.get_u16()? as i32,
        (PrimitiveType::U16, true) => match buf.get_u16()? {
            0x8000 => MISSING_I32,
            0x8001 => EOV_I32,
            v => v as i16 as i32,
        },
        (PrimitiveType::U32, _) => buf.get_i32()?,
        (PrimitiveType::U64, _) => buf.get_i64()? as i32,
        _ => return Err(err(ErrorKind::Format, "integer stream with non-integer type")),
    })
}

fn read_field_values(
    container: &DataContainer,
    cursor: &mut FieldCursor,
) -> Result<FieldValue> {
    if container.primitive() == PrimitiveType::Bool {
        return Ok(FieldValue::Flag);
    }
    let stride = cursor.next_stride(container)? as usize;
    if container.is_uniform() {
        cursor.buf.rewind();
    }

    let buf = &mut cursor.buf;
    Ok(match container.primitive() {
        PrimitiveType::Float => {
            let mut values = Vec::with_capacity(stride);
            for _ in 0..stride {
                values.push(buf.get_f32()?);
            }
            FieldValue::Float(values)
        }
        PrimitiveType::Double => {
            let mut values = Vec::with_capacity(stride);
            for _ in 0..stride {
                values.push(buf.get_f64()? as f32);
            }
            FieldValue::Float(values)
        }
        PrimitiveType::Char => FieldValue::Char(buf.get_bytes(stride)?.to_vec()),
        primitive => {
            let signed = container.header.controller.signedness;
            let mut values = Vec::with_capacity(stride);
            for _ in 0..stride {
                values.push(read_int_word(buf, primitive, signed)?);
            }
            FieldValue::Int(values)
        }
    })
}

impl LoadedBlock {
    /// Reconstruct the block's variant records from whatever columns were
    /// loaded. Requires at least the hot and cold meta streams; omitted
    /// selections simply leave the corresponding record fields empty.
    pub fn materialize(&self, n_samples: usize) -> Result<Vec<VariantRecord>> {
        let meta_hot = self
            .meta_hot
            .as_ref()
            .ok_or_else(|| err(ErrorKind::Format, "materialize requires the hot meta stream"))?;
        let meta_cold = self
            .meta_cold
            .as_ref()
            .ok_or_else(|| err(ErrorKind::Format, "materialize requires the cold meta stream"))?;

        let n_variants = self.header.n_variants as usize;
        let mut hot_buf = meta_hot.data.clone();
        hot_buf.rewind();
        let mut cold_buf = meta_cold.data.clone();
        cold_buf.rewind();

        // Map-id streams decode to one small int per variant; a uniform
        // stream stores its single value once.
        let decode_ids = |c: &Option<DataContainer>| -> Result<Option<Vec<i32>>> {
            match c {
                None => Ok(None),
                Some(c) => {
                    let mut buf = c.data.clone();
                    buf.rewind();
                    if c.is_uniform() {
                        let id = read_int_word(
                            &mut buf,
                            c.primitive(),
                            c.header.controller.signedness,
                        )?;
                        return Ok(Some(vec![id; n_variants]));
                    }
                    let mut ids = Vec::with_capacity(n_variants);
                    for _ in 0..n_variants {
                        ids.push(read_int_word(
                            &mut buf,
                            c.primitive(),
                            c.header.controller.signedness,
                        )?);
                    }
                    Ok(Some(ids))
                }
            }
        };
        let info_ids = decode_ids(&self.info_ids)?;
        let filter_ids = decode_ids(&self.filter_ids)?;
        let format_ids = decode_ids(&self.format_ids)?;

        let support = match &self.gt_support {
            Some(c) if self.gt_rle.is_some() || self.gt_packed.is_some() => {
                let mut buf = c.data.clone();
                buf.rewind();
                let strides = c.decoded_strides()?;
                let mut tags = Vec::with_capacity(n_variants);
                for _ in 0..n_variants {
                    tags.push(read_int_word(
                        &mut buf,
                        c.primitive(),
                        c.header.controller.signedness,
                    )?);
                }
                Some((tags, strides))
            }
            _ => None,
        };

        let identity;
        let ppa = match &self.ppa {
            Some(ppa) => ppa,
            None => {
                if self.header.controller.has_gt_permuted && support.is_some() {
                    return Err(err(
                        ErrorKind::Format,
                        "genotype selection requires the permutation stream",
                    ));
                }
                identity = PermutationArray::identity(n_samples);
                &identity
            }
        };
        if ppa.len() != n_samples {
            return Err(err(
                ErrorKind::Corruption,
                "permutation length does not match sample count",
            ));
        }

        let info_keys = self.header.info_keys();
        let format_keys = self.header.format_keys();
        let mut info_cursors = Vec::with_capacity(self.info.len());
        for (_, c) in &self.info {
            info_cursors.push(FieldCursor::new(c)?);
        }
        let mut format_cursors = Vec::with_capacity(self.format.len());
        for (_, c) in &self.format {
            format_cursors.push(FieldCursor::new(c)?);
        }
        let mut rle_buf = self.gt_rle.as_ref().map(|c| {
            let mut b = c.data.clone();
            b.rewind();
            b
        });
        let mut packed_buf = self.gt_packed.as_ref().map(|c| {
            let mut b = c.data.clone();
            b.rewind();
            b
        });

        let mut records = Vec::with_capacity(n_variants);
        for v in 0..n_variants {
            let hot = HotEntry::read_from(&mut hot_buf)?;
            let cold = ColdEntry::read_from(&mut cold_buf)?;
            let mut alleles = cold.alleles.iter();
            let ref_allele = alleles.next().cloned().unwrap_or_default();
            let alt_alleles: Vec<String> = alleles.cloned().collect();
            let n_alleles = cold.alleles.len();

            let mut record = VariantRecord {
                contig_id: self.header.contig_id.max(0) as u32,
                position: self.header.min_position + hot.position as u64,
                id: cold.id,
                ref_allele,
                alt_alleles,
                quality: cold.quality,
                ..VariantRecord::default()
            };

            if let Some(ids) = &filter_ids {
                let pattern = ids[v] as usize;
                for (i, &key) in self.header.filter_keys.iter().enumerate() {
                    if self.footer.filter_matrix.get(pattern, i) {
                        record.filter_ids.push(key);
                    }
                }
            }

            if let Some(ids) = &info_ids {
                let pattern = ids[v] as usize;
                for (slot, (key, container)) in self.info.iter().enumerate() {
                    let local = info_keys.iter().position(|k| k == key).ok_or_else(|| {
                        err(ErrorKind::Corruption, "loaded key missing from offset table")
                    })?;
                    if self.footer.info_matrix.get(pattern, local) {
                        let value = read_field_values(container, &mut info_cursors[slot])?;
                        record.info.push((*key, value));
                    }
                }
            }

            if let Some(ids) = &format_ids {
                let pattern = ids[v] as usize;
                for (slot, (key, container)) in self.format.iter().enumerate() {
                    let local = format_keys.iter().position(|k| k == key).ok_or_else(|| {
                        err(ErrorKind::Corruption, "loaded key missing from offset table")
                    })?;
                    if self.footer.format_matrix.get(pattern, local) {
                        let value = read_field_values(container, &mut format_cursors[slot])?;
                        record.format.push((*key, value));
                    }
                }
            }

            // Loaded-column order is offset order; present fields in
            // ascending key order regardless.
            record.filter_ids.sort_unstable();
            record.info.sort_by_key(|(k, _)| *k);
            record.format.sort_by_key(|(k, _)| *k);

            if let Some((tags, strides)) = &support {
                let tag = tags[v];
                let n_words = strides[v] as usize;
                if tag != TAG_NO_GT {
                    let width = if tag as u32 == TAG_BCF_PACKED {
                        bcf_word_width(n_alleles)?
                    } else {
                        hot.controller.rle_width.bytes()
                    };
                    let buf = if tag as u32 == TAG_BIALLELIC_RLE {
                        rle_buf.as_mut()
                    } else {
                        packed_buf.as_mut()
                    };
                    let buf = buf.ok_or_else(|| {
                        err(ErrorKind::Format, "genotype stream not selected")
                    })?;
                    let mut words = Vec::with_capacity(n_words);
                    for _ in 0..n_words {
                        words.push(buf.get_uint_at_width(width)?);
                    }

                    let permuted =
                        decode_diploid(tag as u32, &hot.controller, n_samples, n_alleles, &words)?;
                    record.genotypes =
                        Some(Genotypes::diploid(unpermute_diploid(&permuted, ppa)));
                }
            }

            records.push(record);
        }
        Ok(records)
    }
}
