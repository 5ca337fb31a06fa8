// Key material handling for encrypted archives. Containers hold only a
// 64-bit identifier; the keychain owns the keys, IVs and tags and travels
// as a separate sidecar stream.

mod cipher;
mod keychain;

pub use cipher::{decrypt_container, encrypt_container, open, seal};
pub use keychain::{Keychain, KeychainEntry, KEYCHAIN_MAGIC};
