mod buffer;
mod error;
mod hash;
mod ioutil;

pub use buffer::TypedBuffer;
pub use error::{err, Error, ErrorKind, Result};
pub use hash::{
    hash64, hash64_seeded, hash64_u32s_seeded, GENOTYPE_SEED, KEYCHAIN_SEED, PATTERN_SEED,
    UNIFORMITY_SEED,
};
pub use ioutil::{
    FileReader, FileWriter, MemReader, MemWriter, ReadLeExt, Reader, WriteLeExt, Writer,
};
