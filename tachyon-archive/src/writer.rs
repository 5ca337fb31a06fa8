use std::sync::Arc;

use tracing::debug;

use std::path::PathBuf;

use tachyon_base::{err, ErrorKind, FileWriter, Result, WriteLeExt, Writer};
use tachyon_codec::{CodecManager, DEFAULT_COMPRESSION_LEVEL};
use tachyon_containers::{ArchiveHeader, VariantRecord};
use tachyon_crypt::Keychain;
use tachyon_index::{IndexRecord, VariantIndex, DEFAULT_LEVELS};

use crate::block::VariantBlock;
use crate::digests::DigestRegistry;

/// 8-byte archive magic.
pub const ARCHIVE_MAGIC: &[u8; 8] = b"TACHYON\x01";

/// 32-byte end-of-archive magic.
pub const ARCHIVE_EOF: &[u8; 32] = b"We will be known forever by the ";

#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Records per block before a rotation is forced.
    pub block_size: usize,
    /// Derive a per-block sample permutation before genotype encoding.
    pub permute: bool,
    pub compression_level: i32,
    /// Seal every container with AES-256-GCM and collect the key tuples
    /// in a keychain sidecar.
    pub encrypt: bool,
    pub index_levels: u8,
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig {
            block_size: 2048,
            permute: true,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            encrypt: false,
            index_levels: DEFAULT_LEVELS,
        }
    }
}

/// Streams variant records into the archive framing:
/// MAGIC || header || blocks || index || digests ||
/// digests_start(u64) || data_end(u64) || EOF(32).
///
/// Records must arrive grouped by contig with non-decreasing positions
/// inside a contig run; a record that breaks the run closes the current
/// block and opens the next one as its first variant.
pub struct ArchiveWriter<W: Writer> {
    wr: W,
    header: ArchiveHeader,
    config: WriterConfig,
    codec: CodecManager,
    keychain: Option<Arc<Keychain>>,
    index: VariantIndex,
    digests: DigestRegistry,
    block: VariantBlock,
    n_blocks: u32,
    n_records: u64,
    finalized: bool,
}

impl ArchiveWriter<FileWriter> {
    /// Create an archive at `path`; the file must not exist yet
    /// (archives are append-only by block, never rewritten).
    pub fn create_path(
        path: impl Into<PathBuf>,
        header: ArchiveHeader,
        config: WriterConfig,
    ) -> Result<Self> {
        Self::new(
            FileWriter::try_create_non_existing(path.into())?,
            header,
            config,
        )
    }
}

impl<W: Writer> ArchiveWriter<W> {
    pub fn new(mut wr: W, header: ArchiveHeader, config: WriterConfig) -> Result<Self> {
        wr.write_byte_slice(ARCHIVE_MAGIC)?;
        header.write(&mut wr)?;

        let keychain = config.encrypt.then(|| Arc::new(Keychain::new()));
        let mut codec = CodecManager::zstd(config.compression_level);
        if let Some(keychain) = &keychain {
            codec = codec.with_keychain(keychain.clone());
        }

        let contig_lengths: Vec<u64> = header.contigs.iter().map(|c| c.length).collect();
        let index = VariantIndex::with_levels(&contig_lengths, config.index_levels);
        let block = VariantBlock::new(0, header.n_samples(), config.permute);

        Ok(ArchiveWriter {
            wr,
            header,
            config,
            codec,
            keychain,
            index,
            digests: DigestRegistry::default(),
            block,
            n_blocks: 0,
            n_records: 0,
            finalized: false,
        })
    }

    /// The keychain accumulating this archive's container keys; present
    /// only when encryption is enabled. Written as a separate sidecar by
    /// the caller.
    pub fn keychain(&self) -> Option<&Arc<Keychain>> {
        self.keychain.as_ref()
    }

    pub fn n_blocks(&self) -> u32 {
        self.n_blocks
    }

    pub fn n_records(&self) -> u64 {
        self.n_records
    }

    pub fn add_record(&mut self, record: VariantRecord) -> Result<()> {
        if self.finalized {
            return Err(err(ErrorKind::Format, "writer already finalized"));
        }
        if self.header.contig(record.contig_id).is_none() {
            return Err(err(ErrorKind::Bounds, "record references unknown contig"));
        }

        if !self.block.accepts(&record) {
            // Contig change or decreasing position: the offending record
            // carries over as variant 0 of the next block.
            if self.block.is_empty() {
                return Err(err(
                    ErrorKind::InputOrdering,
                    "decreasing position with no carry-over slot available",
                ));
            }
            self.rotate_block()?;
        }

        self.block.add_variant(record)?;
        self.n_records += 1;

        if self.block.n_variants() >= self.config.block_size {
            self.rotate_block()?;
        }
        Ok(())
    }

    fn rotate_block(&mut self) -> Result<()> {
        if self.block.is_empty() {
            return Ok(());
        }

        let block_id = self.n_blocks;
        let contig_id = self.block.contig_id();

        // Register every site with the quad-tree before the payload is
        // consumed, tracking the bin span for the linear record.
        let mut min_bin = u32::MAX;
        let mut max_bin = 0_u32;
        for record in self.block.records() {
            let site_end = record.position + record.ref_allele.len().max(1) as u64;
            let bin =
                self.index
                    .add_site(contig_id as u32, record.position, site_end, block_id)?;
            min_bin = min_bin.min(bin);
            max_bin = max_bin.max(bin);
        }

        let byte_offset = self.wr.pos()?;
        let n_variants = self.block.n_variants() as u32;
        let min_position = self.block.min_position();
        let max_position = self.block.max_position();
        self.block
            .flush(&mut self.wr, &self.codec, &mut self.digests)?;
        let byte_offset_end = self.wr.pos()?;

        self.index.add_block(IndexRecord {
            block_id,
            contig_id,
            n_variants,
            byte_offset,
            byte_offset_end,
            min_position,
            max_position,
            min_bin,
            max_bin,
        })?;
        self.header.note_block_for_contig(contig_id as u32);
        self.n_blocks += 1;
        debug!(
            target: "tachyon",
            block_id,
            contig_id,
            n_variants,
            bytes = byte_offset_end - byte_offset,
            "block flushed"
        );

        self.block.reset(self.n_blocks);
        Ok(())
    }

    /// Flush the tail block and write the trailer. Returns the underlying
    /// stream.
    pub fn finalize(mut self) -> Result<W> {
        self.rotate_block()?;
        self.finalized = true;

        // Per-contig block counts settled with the last flush; rewrite
        // the header in place (string fields are untouched, so the byte
        // length is unchanged).
        let data_end = self.wr.pos()?;
        self.wr
            .seek(std::io::SeekFrom::Start(ARCHIVE_MAGIC.len() as u64))?;
        self.header.write(&mut self.wr)?;
        let after_header = self.wr.pos()?;
        if after_header > data_end {
            return Err(err(ErrorKind::Corruption, "header rewrite overran block data"));
        }
        self.wr.seek(std::io::SeekFrom::Start(data_end))?;
        self.index.write(&mut self.wr)?;

        let digests_start = self.wr.pos()?;
        let digests = std::mem::take(&mut self.digests).finalize();
        digests.write(&mut self.wr)?;

        self.wr.write_le_num(digests_start)?;
        self.wr.write_le_num(data_end)?;
        self.wr.write_byte_slice(ARCHIVE_EOF)?;
        self.wr.flush()?;
        Ok(self.wr)
    }
}
