use std::collections::HashMap;

use rand::rngs::OsRng;
use rand::RngCore;
use tachyon_base::{
    err, hash64_seeded, ErrorKind, ReadLeExt, Reader, Result, WriteLeExt, Writer, KEYCHAIN_SEED,
};
use tachyon_containers::EncryptionId;

use spin::Mutex;

/// Sidecar magic. The keychain deliberately carries nothing that ties it
/// to a particular archive; possession of the sidecar is the capability.
pub const KEYCHAIN_MAGIC: &[u8; 8] = b"TACHYON\x01";

/// One AEAD key tuple, addressed by the 64-bit identifier stored in the
/// encrypted container's header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeychainEntry {
    pub cipher: EncryptionId,
    pub field_id: u64,
    pub key: [u8; 32],
    pub iv: [u8; 16],
    pub tag: [u8; 16],
}

impl KeychainEntry {
    /// Fresh key material for one container. The identifier is assigned
    /// separately so allocation can stay under the keychain's lock.
    pub fn random_aes256() -> Self {
        let mut key = [0u8; 32];
        let mut iv = [0u8; 16];
        OsRng.fill_bytes(&mut key);
        OsRng.fill_bytes(&mut iv);
        KeychainEntry {
            cipher: EncryptionId::Aes256,
            field_id: 0,
            key,
            iv,
            tag: [0u8; 16],
        }
    }

    fn write(&self, wr: &mut impl Writer) -> Result<()> {
        wr.write_le_num(self.cipher as u8)?;
        wr.write_le_num(self.field_id)?;
        wr.write_byte_slice(&self.key)?;
        wr.write_byte_slice(&self.iv)?;
        wr.write_byte_slice(&self.tag)?;
        Ok(())
    }

    fn read(rd: &mut impl Reader) -> Result<Self> {
        let cipher = EncryptionId::from_u8(rd.read_le_num::<u8>()?)?;
        if cipher != EncryptionId::Aes256 {
            return Err(err(ErrorKind::Format, "unsupported keychain cipher type"));
        }
        let field_id = rd.read_le_num::<u64>()?;
        let key = rd.read_byte_array::<32>()?;
        let iv = rd.read_byte_array::<16>()?;
        let tag = rd.read_byte_array::<16>()?;
        Ok(KeychainEntry {
            cipher,
            field_id,
            key,
            iv,
            tag,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum IdSlot {
    /// Identifier handed out but its entry not appended yet.
    Reserved,
    Stored(usize),
}

#[derive(Default)]
struct KeychainInner {
    entries: Vec<KeychainEntry>,
    by_id: HashMap<u64, IdSlot>,
}

/// Append-only store of per-container key tuples. Identifier allocation
/// and appends run under a spinlock so sibling containers can encrypt in
/// parallel without a global mutex.
#[derive(Default)]
pub struct Keychain {
    inner: Mutex<KeychainInner>,
}

impl std::fmt::Debug for Keychain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keychain")
            .field("len", &self.len())
            .finish()
    }
}

impl Keychain {
    pub fn new() -> Self {
        Keychain::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Derive a fresh 64-bit identifier: hash 32 random bytes, reject zero
    /// and anything already present, retry until unique. The identifier is
    /// reserved immediately so concurrent allocators cannot collide.
    pub fn random_identifier(&self) -> u64 {
        let mut inner = self.inner.lock();
        let mut random_bytes = [0u8; 32];
        loop {
            OsRng.fill_bytes(&mut random_bytes);
            let value = hash64_seeded(&random_bytes, KEYCHAIN_SEED);
            if value == 0 || inner.by_id.contains_key(&value) {
                continue;
            }
            inner.by_id.insert(value, IdSlot::Reserved);
            return value;
        }
    }

    pub fn append(&self, entry: KeychainEntry) {
        let mut inner = self.inner.lock();
        let index = inner.entries.len();
        inner.by_id.insert(entry.field_id, IdSlot::Stored(index));
        inner.entries.push(entry);
    }

    pub fn get(&self, field_id: u64) -> Option<KeychainEntry> {
        let inner = self.inner.lock();
        match inner.by_id.get(&field_id) {
            Some(IdSlot::Stored(index)) => inner.entries.get(*index).copied(),
            _ => None,
        }
    }

    /// Sidecar framing:
    /// MAGIC || n_entries(u64) || n_capacity(u64) || entries.
    pub fn write(&self, wr: &mut impl Writer) -> Result<()> {
        let inner = self.inner.lock();
        wr.write_byte_slice(KEYCHAIN_MAGIC)?;
        wr.write_le_num(inner.entries.len() as u64)?;
        wr.write_le_num(inner.entries.capacity() as u64)?;
        for entry in &inner.entries {
            entry.write(wr)?;
        }
        Ok(())
    }

    pub fn read(rd: &mut impl Reader) -> Result<Self> {
        let magic = rd.read_byte_array::<8>()?;
        if &magic != KEYCHAIN_MAGIC {
            return Err(err(ErrorKind::Format, "bad keychain magic"));
        }
        let n_entries = rd.read_le_num::<u64>()?;
        let _n_capacity = rd.read_le_num::<u64>()?; // allocation hint only
        let mut inner = KeychainInner::default();
        for _ in 0..n_entries {
            let entry = KeychainEntry::read(rd)?;
            let index = inner.entries.len();
            inner.by_id.insert(entry.field_id, IdSlot::Stored(index));
            inner.entries.push(entry);
        }
        Ok(Keychain {
            inner: Mutex::new(inner),
        })
    }
}
