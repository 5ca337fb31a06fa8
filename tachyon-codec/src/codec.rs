use std::sync::Arc;

use tachyon_base::{err, ErrorKind, Result};
use tachyon_containers::{DataContainer, EncoderId, EncryptionId};
use tachyon_crypt::{decrypt_container, encrypt_container, Keychain};

/// Byte-stream codec seam. The engine only ever needs the two-method
/// contract; everything else about a compressor stays outside.
pub trait Codec: Send + Sync {
    fn id(&self) -> EncoderId;
    fn compress(&self, src: &[u8], level: i32) -> Result<Vec<u8>>;
    fn decompress(&self, src: &[u8], expected_len: usize) -> Result<Vec<u8>>;
}

pub struct ZstdCodec;

impl Codec for ZstdCodec {
    fn id(&self) -> EncoderId {
        EncoderId::Zstd
    }

    fn compress(&self, src: &[u8], level: i32) -> Result<Vec<u8>> {
        Ok(zstd::bulk::compress(src, level)?)
    }

    fn decompress(&self, src: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        let out = zstd::bulk::decompress(src, expected_len)
            .map_err(|_| err(ErrorKind::Corruption, "zstd stream failed to decompress"))?;
        if out.len() != expected_len {
            return Err(err(
                ErrorKind::Corruption,
                "decompressed length disagrees with header",
            ));
        }
        Ok(out)
    }
}

pub const DEFAULT_COMPRESSION_LEVEL: i32 = 6;

/// Holds the configured codec, compression level and (optionally) the
/// keychain used to seal containers after compression. One manager per
/// writer or reader; stateless between containers so sibling containers
/// can be pushed through from worker threads.
pub struct CodecManager {
    codec: Box<dyn Codec>,
    level: i32,
    keychain: Option<Arc<Keychain>>,
}

impl std::fmt::Debug for CodecManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecManager")
            .field("codec", &self.codec.id())
            .field("level", &self.level)
            .field("keychain", &self.keychain.is_some())
            .finish()
    }
}

impl CodecManager {
    pub fn new(codec: Box<dyn Codec>, level: i32) -> Self {
        CodecManager {
            codec,
            level,
            keychain: None,
        }
    }

    pub fn zstd(level: i32) -> Self {
        Self::new(Box::new(ZstdCodec), level)
    }

    pub fn with_keychain(mut self, keychain: Arc<Keychain>) -> Self {
        self.keychain = Some(keychain);
        self
    }

    pub fn keychain(&self) -> Option<&Arc<Keychain>> {
        self.keychain.as_ref()
    }

    pub fn encrypts(&self) -> bool {
        self.keychain.is_some()
    }

    /// Compress a sealed container in place, then seal it if a keychain
    /// is configured. Uniform streams and streams that do not shrink stay
    /// at encoder NONE.
    pub fn encode(&self, container: &mut DataContainer) -> Result<()> {
        if !container.is_uniform() && !container.data.is_empty() {
            let compressed = self
                .codec
                .compress(container.data.as_slice(), self.level)?;
            if compressed.len() < container.data.len() {
                container.header.c_length = compressed.len() as u32;
                container.header.controller.encoder = self.codec.id();
                container.data.replace(compressed);
            }
        }
        if container.header.controller.mixed_stride && !container.strides.is_empty() {
            let compressed = self
                .codec
                .compress(container.strides.as_slice(), self.level)?;
            if compressed.len() < container.strides.len() {
                container.stride_header.c_length = compressed.len() as u32;
                container.stride_header.controller.encoder = self.codec.id();
                container.strides.replace(compressed);
            }
        }
        if let Some(keychain) = &self.keychain {
            encrypt_container(container, keychain)?;
        }
        Ok(())
    }

    /// Inverse of `encode`: open the container if sealed, decompress the
    /// data and stride streams, verify the checksums. On any failure the
    /// caller decides whether the column is skippable.
    pub fn decode(&self, container: &mut DataContainer) -> Result<()> {
        if container.header.controller.encryption != EncryptionId::None {
            let keychain = self
                .keychain
                .as_ref()
                .ok_or_else(|| err(ErrorKind::Decrypt, "encrypted container without keychain"))?;
            decrypt_container(container, keychain)?;
        }

        match container.header.controller.encoder {
            EncoderId::None => {
                if container.header.c_length != container.header.u_length {
                    return Err(err(
                        ErrorKind::Corruption,
                        "uncompressed container with mismatched lengths",
                    ));
                }
            }
            EncoderId::Zstd => {
                let out = self.codec.decompress(
                    container.data.as_slice(),
                    container.header.u_length as usize,
                )?;
                container.data.replace(out);
                container.header.c_length = container.header.u_length;
                container.header.controller.encoder = EncoderId::None;
            }
        }

        if container.header.controller.mixed_stride {
            match container.stride_header.controller.encoder {
                EncoderId::None => {}
                EncoderId::Zstd => {
                    let out = self.codec.decompress(
                        container.strides.as_slice(),
                        container.stride_header.u_length as usize,
                    )?;
                    container.strides.replace(out);
                    container.stride_header.c_length = container.stride_header.u_length;
                    container.stride_header.controller.encoder = EncoderId::None;
                }
            }
        }

        container.verify_checksums()
    }
}
