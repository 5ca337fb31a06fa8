use tachyon_base::{err, ErrorKind, Result, TypedBuffer, Writer};
use tachyon_codec::{
    word_width_for, CodecManager, GenotypeEncoder, GenotypeSorter, PermutationArray,
    TAG_BCF_PACKED,
};
use tachyon_containers::{
    BitMatrix, ColdEntry, DataContainer, FieldValue, HotController, HotEntry, PatternTable,
    PrimitiveType, RefAlt, RleWidth, VariantRecord,
};

use crate::digests::DigestRegistry;
use crate::footer::{
    write_block_sentinel, BaseOffsets, BlockController, BlockFooter, BlockHeader,
};

/// Monotonic per-block lifecycle; re-entry requires `reset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Empty,
    Accumulating,
    Sealed,
    Serialized,
}

/// Support-stream tag for a variant that carries no FORMAT:GT.
pub const TAG_NO_GT: i32 = -1;

/// One block's worth of variants and every container derived from them.
/// Records accumulate untouched; the whole decomposition happens at
/// flush so the sample permutation can be derived from the full block.
pub struct VariantBlock {
    state: BlockState,
    block_id: u32,
    contig_id: i32,
    min_position: u64,
    max_position: u64,
    n_samples: usize,
    permute: bool,
    records: Vec<VariantRecord>,

    ppa_container: DataContainer,
    meta_hot: DataContainer,
    meta_cold: DataContainer,
    gt_rle: DataContainer,
    gt_packed: DataContainer,
    gt_support: DataContainer,
    info_ids: DataContainer,
    filter_ids: DataContainer,
    format_ids: DataContainer,

    info_keys: Vec<u32>,
    info_containers: Vec<DataContainer>,
    format_keys: Vec<u32>,
    format_containers: Vec<DataContainer>,
    filter_keys: Vec<u32>,

    info_patterns: PatternTable,
    format_patterns: PatternTable,
    filter_patterns: PatternTable,

    has_gt: bool,
    ppa: Option<PermutationArray>,
}

fn map_id_container() -> DataContainer {
    let mut c = DataContainer::new(PrimitiveType::U32);
    c.header.controller.signedness = true;
    c.set_fixed_stride(1);
    c
}

fn struct_container() -> DataContainer {
    let mut c = DataContainer::new(PrimitiveType::Struct);
    c.set_fixed_stride(1);
    c
}

impl VariantBlock {
    pub fn new(block_id: u32, n_samples: usize, permute: bool) -> Self {
        let mut gt_support = DataContainer::new(PrimitiveType::U32);
        gt_support.header.controller.signedness = true;
        // The support stride is a word count, not a value count.
        gt_support.force_mixed_stride();
        VariantBlock {
            state: BlockState::Empty,
            block_id,
            contig_id: -1,
            min_position: 0,
            max_position: 0,
            n_samples,
            permute,
            records: Vec::new(),
            ppa_container: struct_container(),
            meta_hot: struct_container(),
            meta_cold: struct_container(),
            gt_rle: struct_container(),
            gt_packed: struct_container(),
            gt_support,
            info_ids: map_id_container(),
            filter_ids: map_id_container(),
            format_ids: map_id_container(),
            info_keys: Vec::new(),
            info_containers: Vec::new(),
            format_keys: Vec::new(),
            format_containers: Vec::new(),
            filter_keys: Vec::new(),
            info_patterns: PatternTable::default(),
            format_patterns: PatternTable::default(),
            filter_patterns: PatternTable::default(),
            has_gt: false,
            ppa: None,
        }
    }

    /// Recycle for the next block without releasing buffers.
    pub fn reset(&mut self, block_id: u32) {
        self.state = BlockState::Empty;
        self.block_id = block_id;
        self.contig_id = -1;
        self.min_position = 0;
        self.max_position = 0;
        self.records.clear();
        self.ppa_container.reset(PrimitiveType::Struct);
        self.ppa_container.set_fixed_stride(1);
        self.meta_hot.reset(PrimitiveType::Struct);
        self.meta_hot.set_fixed_stride(1);
        self.meta_cold.reset(PrimitiveType::Struct);
        self.meta_cold.set_fixed_stride(1);
        self.gt_rle.reset(PrimitiveType::Struct);
        self.gt_rle.set_fixed_stride(1);
        self.gt_packed.reset(PrimitiveType::Struct);
        self.gt_packed.set_fixed_stride(1);
        self.gt_support.reset(PrimitiveType::U32);
        self.gt_support.header.controller.signedness = true;
        self.gt_support.force_mixed_stride();
        self.info_ids.reset(PrimitiveType::U32);
        self.info_ids.header.controller.signedness = true;
        self.info_ids.set_fixed_stride(1);
        self.filter_ids.reset(PrimitiveType::U32);
        self.filter_ids.header.controller.signedness = true;
        self.filter_ids.set_fixed_stride(1);
        self.format_ids.reset(PrimitiveType::U32);
        self.format_ids.header.controller.signedness = true;
        self.format_ids.set_fixed_stride(1);
        self.info_keys.clear();
        self.info_containers.clear();
        self.format_keys.clear();
        self.format_containers.clear();
        self.filter_keys.clear();
        self.info_patterns.reset();
        self.format_patterns.reset();
        self.filter_patterns.reset();
        self.has_gt = false;
        self.ppa = None;
    }

    pub fn state(&self) -> BlockState {
        self.state
    }

    pub fn block_id(&self) -> u32 {
        self.block_id
    }

    pub fn contig_id(&self) -> i32 {
        self.contig_id
    }

    pub fn n_variants(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn min_position(&self) -> u64 {
        self.min_position
    }

    pub fn max_position(&self) -> u64 {
        self.max_position
    }

    pub fn records(&self) -> &[VariantRecord] {
        &self.records
    }

    /// Whether `record` may extend this block: same contig, position not
    /// decreasing.
    pub fn accepts(&self, record: &VariantRecord) -> bool {
        if self.records.is_empty() {
            return true;
        }
        self.contig_id == record.contig_id as i32
            && self.records.last().map(|r| r.position).unwrap_or(0) <= record.position
    }

    pub fn add_variant(&mut self, record: VariantRecord) -> Result<()> {
        match self.state {
            BlockState::Empty => self.state = BlockState::Accumulating,
            BlockState::Accumulating => {}
            _ => return Err(err(ErrorKind::Format, "block is sealed; reset before reuse")),
        }
        if self.records.is_empty() {
            self.contig_id = record.contig_id as i32;
            self.min_position = record.position;
        } else if !self.accepts(&record) {
            return Err(err(
                ErrorKind::InputOrdering,
                "record breaks block ordering; caller must rotate blocks",
            ));
        }
        let site_end = record.position + record.ref_allele.len().max(1) as u64;
        self.max_position = self.max_position.max(site_end);
        self.records.push(record);
        Ok(())
    }

    fn info_container_for(&mut self, key: u32, value: &FieldValue) -> usize {
        match self.info_keys.iter().position(|&k| k == key) {
            Some(index) => index,
            None => {
                self.info_keys.push(key);
                self.info_containers.push(field_container(value));
                self.info_containers.len() - 1
            }
        }
    }

    fn format_container_for(&mut self, key: u32, value: &FieldValue) -> usize {
        match self.format_keys.iter().position(|&k| k == key) {
            Some(index) => index,
            None => {
                self.format_keys.push(key);
                self.format_containers.push(field_container(value));
                self.format_containers.len() - 1
            }
        }
    }

    /// Decompose the accumulated records into columns, seal and encode
    /// every container, and serialize the block. Returns the relative
    /// end-of-block offset (the block's full byte length).
    pub fn flush(
        &mut self,
        wr: &mut impl Writer,
        codec: &CodecManager,
        digests: &mut DigestRegistry,
    ) -> Result<u32> {
        if self.state != BlockState::Accumulating || self.records.is_empty() {
            return Err(err(ErrorKind::Format, "flush of a block with no variants"));
        }

        // The permutation is re-derived from this block's own records;
        // carried-over records contribute to their new block only.
        self.has_gt = self.records.iter().any(|r| r.genotypes.is_some());
        let sorted = if self.permute && self.has_gt {
            GenotypeSorter::new(self.n_samples).build(&self.records)?
        } else {
            None
        };
        let has_gt_permuted = sorted.is_some();
        let ppa = sorted.unwrap_or_else(|| PermutationArray::identity(self.n_samples));

        let encoder = GenotypeEncoder::new(self.n_samples);
        let records = std::mem::take(&mut self.records);
        for record in &records {
            self.decompose(record, &encoder, &ppa)?;
        }
        self.records = records;

        if has_gt_permuted {
            let width = word_width_for(self.n_samples);
            self.ppa_container
                .reset(PrimitiveType::for_int_width(width));
            self.ppa_container.set_fixed_stride(1);
            for &sample in ppa.as_slice() {
                self.ppa_container.append_word(sample as u64, width);
            }
            self.ppa = Some(ppa);
        }

        self.seal_all()?;
        self.state = BlockState::Sealed;

        // Whole-archive stream digests cover the uncompressed bytes.
        for (key, container) in self.info_keys.iter().zip(&self.info_containers) {
            digests.update_info(*key, container.data.as_slice());
        }
        for (key, container) in self.format_keys.iter().zip(&self.format_containers) {
            digests.update_format(*key, container.data.as_slice());
        }

        self.encode_all(codec)?;
        let end = self.serialize(wr)?;
        self.state = BlockState::Serialized;
        Ok(end)
    }

    fn decompose(
        &mut self,
        record: &VariantRecord,
        encoder: &GenotypeEncoder,
        ppa: &PermutationArray,
    ) -> Result<()> {
        let relative = record.position - self.min_position;
        if relative > u32::MAX as u64 {
            return Err(err(
                ErrorKind::Oversize,
                "block spans more than 32 bits of positions",
            ));
        }

        let mut hot = HotController::default();
        hot.biallelic = record.is_biallelic();
        hot.simple = record.is_simple_snv();

        // FORMAT:GT is consumed by the genotype codec, never stored as a
        // FORMAT column.
        match &record.genotypes {
            Some(gt) => {
                let enc = encoder.encode(
                    gt,
                    record.n_alleles(),
                    ppa,
                    &mut self.gt_rle,
                    &mut self.gt_packed,
                )?;
                hot.any_missing = enc.any_missing;
                hot.mixed_phasing = enc.mixed_phase;
                hot.all_phased = enc.all_phased;
                hot.any_na = enc.any_eov;
                hot.mixed_ploidy = enc.any_eov;
                hot.diploid = true;
                hot.rle = enc.tag != TAG_BCF_PACKED;
                hot.rle_width = RleWidth::from_bytes(enc.width)?;
                self.gt_support.append_i32(enc.tag as i32);
                self.gt_support.add_stride(enc.n_words as u32);
            }
            None => {
                self.gt_support.append_i32(TAG_NO_GT);
                self.gt_support.add_stride(0);
            }
        }

        let ref_alt = if hot.simple {
            RefAlt::from_alleles(&record.ref_allele, &record.alt_alleles[0])
        } else {
            RefAlt::from_alleles("N", "N")
        };
        let entry = HotEntry {
            controller: hot,
            ref_alt,
            position: relative as u32,
        };
        let mut hot_bytes = TypedBuffer::with_capacity(8);
        entry.write_to(&mut hot_bytes);
        self.meta_hot.append_struct(hot_bytes.as_slice());

        let cold = ColdEntry {
            quality: record.quality,
            id: record.id.clone(),
            alleles: record.alleles(),
        };
        let mut cold_bytes = TypedBuffer::with_capacity(cold.body_length());
        cold.write_to(&mut cold_bytes)?;
        self.meta_cold.append_struct(cold_bytes.as_slice());

        // FILTER: presence only; the pattern id is the whole story.
        let mut filter_keys = record.filter_ids.clone();
        filter_keys.sort_unstable();
        for &key in &filter_keys {
            if !self.filter_keys.contains(&key) {
                self.filter_keys.push(key);
            }
        }
        let filter_pattern = self.filter_patterns.id_for(&filter_keys)?;
        self.filter_ids.append_i32(filter_pattern as i32);

        // INFO: one container per observed key, values in sorted key
        // order so pattern ids and payload streams agree.
        let mut info: Vec<&(u32, FieldValue)> = record.info.iter().collect();
        info.sort_by_key(|(k, _)| *k);
        let info_keys: Vec<u32> = info.iter().map(|(k, _)| *k).collect();
        let info_pattern = self.info_patterns.id_for(&info_keys)?;
        self.info_ids.append_i32(info_pattern as i32);
        for (key, value) in info {
            let index = self.info_container_for(*key, value);
            append_field(&mut self.info_containers[index], value);
        }

        let mut format: Vec<&(u32, FieldValue)> = record.format.iter().collect();
        format.sort_by_key(|(k, _)| *k);
        let format_keys: Vec<u32> = format.iter().map(|(k, _)| *k).collect();
        let format_pattern = self.format_patterns.id_for(&format_keys)?;
        self.format_ids.append_i32(format_pattern as i32);
        for (key, value) in format {
            let index = self.format_container_for(*key, value);
            append_field(&mut self.format_containers[index], value);
        }

        Ok(())
    }

    fn seal_all(&mut self) -> Result<()> {
        self.ppa_container.seal()?;
        self.meta_hot.seal()?;
        self.meta_cold.seal()?;
        self.gt_rle.seal()?;
        self.gt_packed.seal()?;
        self.gt_support.seal()?;
        self.info_ids.seal()?;
        self.filter_ids.seal()?;
        self.format_ids.seal()?;
        for container in &mut self.info_containers {
            container.seal()?;
        }
        for container in &mut self.format_containers {
            container.seal()?;
        }
        Ok(())
    }

    fn encode_all(&mut self, codec: &CodecManager) -> Result<()> {
        codec.encode(&mut self.ppa_container)?;
        codec.encode(&mut self.meta_hot)?;
        codec.encode(&mut self.meta_cold)?;
        codec.encode(&mut self.gt_rle)?;
        codec.encode(&mut self.gt_packed)?;
        codec.encode(&mut self.gt_support)?;
        codec.encode(&mut self.info_ids)?;
        codec.encode(&mut self.filter_ids)?;
        codec.encode(&mut self.format_ids)?;
        for container in &mut self.info_containers {
            codec.encode(container)?;
        }
        for container in &mut self.format_containers {
            codec.encode(container)?;
        }
        Ok(())
    }

    fn serialize(&mut self, wr: &mut impl Writer) -> Result<u32> {
        let has_gt_permuted = self.ppa.is_some();
        let mut header = BlockHeader {
            controller: BlockController {
                has_gt: self.has_gt,
                has_gt_permuted,
                has_info: !self.info_keys.is_empty(),
                has_format: !self.format_keys.is_empty(),
                has_filter: !self.filter_keys.is_empty(),
            },
            contig_id: self.contig_id,
            n_variants: self.n_variants() as u32,
            min_position: self.min_position,
            end_of_block: 0,
            offset_footer: 0,
            base: BaseOffsets::default(),
            info_offsets: self.info_keys.iter().map(|&k| (k, 0_u32)).collect(),
            format_offsets: self.format_keys.iter().map(|&k| (k, 0_u32)).collect(),
            filter_keys: self.filter_keys.clone(),
        };

        let mut cursor = header.disk_size() as u32;
        let mut place = |container: &mut DataContainer, skip: bool| -> u32 {
            let offset = cursor;
            container.header.offset = offset;
            if !skip {
                cursor += container.disk_size() as u32;
            }
            offset
        };
        header.base.ppa = place(&mut self.ppa_container, !has_gt_permuted);
        header.base.meta_hot = place(&mut self.meta_hot, false);
        header.base.meta_cold = place(&mut self.meta_cold, false);
        header.base.gt_rle = place(&mut self.gt_rle, false);
        header.base.gt_packed = place(&mut self.gt_packed, false);
        header.base.gt_support = place(&mut self.gt_support, false);
        header.base.info_ids = place(&mut self.info_ids, false);
        header.base.filter_ids = place(&mut self.filter_ids, false);
        header.base.format_ids = place(&mut self.format_ids, false);
        for (slot, container) in header.info_offsets.iter_mut().zip(&mut self.info_containers)
        {
            slot.1 = place(container, false);
        }
        for (slot, container) in header
            .format_offsets
            .iter_mut()
            .zip(&mut self.format_containers)
        {
            slot.1 = place(container, false);
        }

        let footer = BlockFooter {
            info_matrix: BitMatrix::build(self.info_patterns.patterns(), &self.info_keys),
            format_matrix: BitMatrix::build(self.format_patterns.patterns(), &self.format_keys),
            filter_matrix: BitMatrix::build(self.filter_patterns.patterns(), &self.filter_keys),
            end_of_block_abs: 0,
        };
        header.offset_footer = cursor;
        cursor += footer.disk_size() as u32;
        cursor += 8; // sentinel
        header.end_of_block = cursor;

        let block_start = wr.pos()?;
        let footer = BlockFooter {
            end_of_block_abs: block_start + header.end_of_block as u64,
            ..footer
        };

        header.write(wr)?;
        if has_gt_permuted {
            self.ppa_container.write(wr)?;
        }
        self.meta_hot.write(wr)?;
        self.meta_cold.write(wr)?;
        self.gt_rle.write(wr)?;
        self.gt_packed.write(wr)?;
        self.gt_support.write(wr)?;
        self.info_ids.write(wr)?;
        self.filter_ids.write(wr)?;
        self.format_ids.write(wr)?;
        for container in &self.info_containers {
            container.write(wr)?;
        }
        for container in &self.format_containers {
            container.write(wr)?;
        }
        footer.write(wr)?;
        write_block_sentinel(wr)?;

        let written = wr.pos()? - block_start;
        if written != header.end_of_block as u64 {
            return Err(err(
                ErrorKind::Corruption,
                "serialized block size disagrees with offset table",
            ));
        }
        Ok(header.end_of_block)
    }
}

fn field_container(value: &FieldValue) -> DataContainer {
    match value {
        FieldValue::Flag | FieldValue::Int(_) => {
            let mut c = DataContainer::new(PrimitiveType::U32);
            c.header.controller.signedness = true;
            c
        }
        FieldValue::Float(_) => DataContainer::new(PrimitiveType::Float),
        FieldValue::Char(_) => DataContainer::new(PrimitiveType::Char),
    }
}

fn append_field(container: &mut DataContainer, value: &FieldValue) {
    match value {
        FieldValue::Flag => {
            // Presence only; the pattern bit is the signal. An entry with
            // no bytes promotes the container to BOOLEAN at seal.
            container.n_entries += 1;
        }
        FieldValue::Int(values) => {
            for &v in values {
                container.append_i32(v);
            }
            container.add_stride(values.len() as u32);
            container.bump_additions(1);
        }
        FieldValue::Float(values) => {
            for &v in values {
                container.append_f32(v);
            }
            container.add_stride(values.len() as u32);
            container.bump_additions(1);
        }
        FieldValue::Char(values) => {
            for &v in values {
                container.append_char(v);
            }
            container.add_stride(values.len() as u32);
            container.bump_additions(1);
        }
    }
}
