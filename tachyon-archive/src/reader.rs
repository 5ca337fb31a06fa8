use std::io::SeekFrom;
use std::sync::Arc;

use tracing::warn;

use std::path::PathBuf;

use tachyon_base::{err, ErrorKind, FileReader, ReadLeExt, Reader, Result};
use tachyon_codec::{CodecManager, DEFAULT_COMPRESSION_LEVEL};
use tachyon_containers::{ArchiveHeader, VariantRecord};
use tachyon_crypt::Keychain;
use tachyon_index::VariantIndex;

use crate::digests::DigestSection;
use crate::loaded::{read_block, BlockSelection, LoadedBlock};
use crate::writer::{ARCHIVE_EOF, ARCHIVE_MAGIC};

/// Random-access archive reader with column-selective, block-selective
/// loading. Opening validates both ends of the file before anything else
/// is trusted: leading magic, trailing EOF magic, then the trailer
/// offsets, the index and the digest section.
#[derive(Debug)]
pub struct ArchiveReader<R: Reader> {
    rd: R,
    header: ArchiveHeader,
    index: VariantIndex,
    digests: DigestSection,
    codec: CodecManager,
    first_block_pos: u64,
    data_end: u64,
    next_block: u32,
}

impl ArchiveReader<FileReader> {
    pub fn open_path(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open(FileReader::try_open_existing(path.into())?)
    }
}

impl<R: Reader> ArchiveReader<R> {
    pub fn open(rd: R) -> Result<Self> {
        Self::open_with(rd, CodecManager::zstd(DEFAULT_COMPRESSION_LEVEL))
    }

    /// Open an encrypted archive; the keychain sidecar must have been
    /// loaded separately.
    pub fn open_encrypted(rd: R, keychain: Arc<Keychain>) -> Result<Self> {
        Self::open_with(
            rd,
            CodecManager::zstd(DEFAULT_COMPRESSION_LEVEL).with_keychain(keychain),
        )
    }

    pub fn open_with(mut rd: R, codec: CodecManager) -> Result<Self> {
        rd.seek(SeekFrom::Start(0))?;
        let magic = rd.read_byte_array::<8>()?;
        if &magic != ARCHIVE_MAGIC {
            return Err(err(ErrorKind::Format, "bad archive magic"));
        }
        let header = ArchiveHeader::read(&mut rd)?;
        let first_block_pos = rd.pos()?;

        let file_len = rd.stream_len()?;
        if file_len < first_block_pos + 48 {
            return Err(err(ErrorKind::Truncation, "archive shorter than its trailer"));
        }
        rd.seek(SeekFrom::Start(file_len - 32))?;
        let eof = rd.read_byte_array::<32>()?;
        if &eof != ARCHIVE_EOF {
            return Err(err(ErrorKind::Corruption, "archive eof magic mismatch"));
        }

        rd.seek(SeekFrom::Start(file_len - 32 - 16))?;
        let digests_start = rd.read_le_num::<u64>()?;
        let data_end = rd.read_le_num::<u64>()?;
        if data_end < first_block_pos || digests_start < data_end {
            return Err(err(ErrorKind::Corruption, "trailer offsets out of order"));
        }

        rd.seek(SeekFrom::Start(data_end))?;
        let index = VariantIndex::read(&mut rd)?;
        rd.seek(SeekFrom::Start(digests_start))?;
        let digests = DigestSection::read(&mut rd)?;
        rd.seek(SeekFrom::Start(first_block_pos))?;

        Ok(ArchiveReader {
            rd,
            header,
            index,
            digests,
            codec,
            first_block_pos,
            data_end,
            next_block: 0,
        })
    }

    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    pub fn index(&self) -> &VariantIndex {
        &self.index
    }

    pub fn digests(&self) -> &DigestSection {
        &self.digests
    }

    pub fn n_blocks(&self) -> u32 {
        self.index.n_blocks() as u32
    }

    pub fn data_end(&self) -> u64 {
        self.data_end
    }

    /// Random access: the next `next_block` call loads block `k`.
    pub fn seek_block(&mut self, k: u32) -> Result<()> {
        if k as usize > self.index.n_blocks() {
            return Err(err(ErrorKind::Bounds, "block number out of range"));
        }
        self.next_block = k;
        Ok(())
    }

    /// Load the next block under `selection`. A block that fails
    /// structurally (bad sentinel, truncation) is reported, skipped, and
    /// the reader advances along the linear index.
    pub fn next_block(&mut self, selection: &BlockSelection) -> Result<Option<LoadedBlock>> {
        loop {
            let record = match self.index.linear().get(self.next_block) {
                Some(record) => *record,
                None => return Ok(None),
            };
            self.next_block += 1;
            self.rd.seek(SeekFrom::Start(record.byte_offset))?;
            match read_block(&mut self.rd, &self.codec, selection) {
                Ok(block) => return Ok(Some(block)),
                Err(e) if matches!(e.kind(), ErrorKind::Corruption | ErrorKind::Truncation) => {
                    warn!(
                        target: "tachyon",
                        block_id = record.block_id,
                        kind = ?e.kind(),
                        "skipping unreadable block"
                    );
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Convenience wrapper: next block, fully materialized.
    pub fn next_records(
        &mut self,
        selection: &BlockSelection,
    ) -> Result<Option<Vec<VariantRecord>>> {
        match self.next_block(selection)? {
            Some(block) => Ok(Some(block.materialize(self.header.n_samples())?)),
            None => Ok(None),
        }
    }

    /// Ordered unique ids of blocks overlapping [start, end) on a contig.
    pub fn find_overlap(&self, contig_id: u32, start: u64, end: u64) -> Result<Vec<u32>> {
        self.index.find_overlap(contig_id, start, end)
    }

    /// Rewind to the first block.
    pub fn rewind(&mut self) -> Result<()> {
        self.rd.seek(SeekFrom::Start(self.first_block_pos))?;
        self.next_block = 0;
        Ok(())
    }
}
