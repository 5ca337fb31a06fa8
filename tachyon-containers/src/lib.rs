// Typed columns and the per-variant decomposition model: a block is a set
// of data containers (one per logical column), each self-describing via a
// controller + header pair, plus the hot/cold split of per-variant
// metadata and the INFO/FORMAT/FILTER pattern tables.

mod container;
mod header;
mod meta;
mod patterns;
mod record;
mod types;

pub use container::{
    ContainerHeader, DataContainer, StrideHeader, EOV_I32, HEADER_ENCRYPTED_EXTRA,
    HEADER_FIXED_SIZE, MISSING_I32, STRIDE_HEADER_SIZE,
};
pub use header::{ArchiveHeader, Contig, FieldCategory, FieldType, MapEntry};
pub use meta::{
    ColdEntry, GenotypeLayout, HotController, HotEntry, RefAlt, RleWidth, BASE_A, BASE_C, BASE_G,
    BASE_N, BASE_T, HOT_ENTRY_SIZE,
};
pub use patterns::{BitMatrix, PatternTable};
pub use record::{
    unpack_allele, unpack_phase, FieldValue, Genotypes, VariantRecord, GT_EOV_CODE,
    GT_MISSING_CODE,
};
pub use types::{ContainerController, EncoderId, EncryptionId, PrimitiveType};
