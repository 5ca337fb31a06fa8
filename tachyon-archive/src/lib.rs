// Archive assembly and framing: variant blocks with their prefix/footer
// pair, the streaming writer with carry-over block rotation, and the
// column-selective reader.

mod block;
mod digests;
mod footer;
mod loaded;
mod reader;
mod vcf;
mod writer;

#[cfg(test)]
mod test;

pub use block::{BlockState, VariantBlock, TAG_NO_GT};
pub use digests::{DigestRegistry, DigestSection};
pub use footer::{
    check_block_sentinel, write_block_sentinel, BaseOffsets, BlockController, BlockFooter,
    BlockHeader, BLOCK_EOF,
};
pub use loaded::{read_block, BlockSelection, FieldSelection, LoadedBlock, SkippedColumn};
pub use reader::ArchiveReader;
pub use vcf::{write_vcf_header, write_vcf_record};
pub use writer::{ArchiveWriter, WriterConfig, ARCHIVE_EOF, ARCHIVE_MAGIC};
