// Genomic-interval indexing for block archives: a quad-tree per contig
// maps intervals to block ids in sub-linear time, the linear index maps
// block ids to byte offsets, and the meta index rolls both up per contig.

mod bin;
mod contig;
mod index;
mod linear;
mod meta;

pub use bin::IndexBin;
pub use contig::{ContigIndex, DEFAULT_LEVELS};
pub use index::VariantIndex;
pub use linear::{IndexRecord, LinearIndex};
pub use meta::MetaEntry;
