// Encoding pipeline: generic byte-stream compression behind the Codec
// seam, the genotype-specific bitstream encoders, and the sample
// permutation that makes the run-length paths worth having.

mod codec;
mod genotype;
mod sorter;

pub use codec::{Codec, CodecManager, ZstdCodec, DEFAULT_COMPRESSION_LEVEL};
pub use genotype::{
    bcf_half_width, bcf_word_width, decode_diploid, unpermute_diploid, GenotypeEncoder,
    GenotypeEncoding, TAG_BCF_PACKED, TAG_BIALLELIC_RLE, TAG_NALLELIC_RLE,
};
pub use sorter::{word_width_for, GenotypeSorter, PermutationArray};
