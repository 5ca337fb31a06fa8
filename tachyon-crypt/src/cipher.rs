use aes_gcm::aead::generic_array::typenum::U16;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::AeadInPlace;
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, KeyInit};

use tachyon_base::{err, ErrorKind, Result, TypedBuffer};
use tachyon_containers::{ContainerHeader, DataContainer, EncryptionId, StrideHeader};

use crate::keychain::{Keychain, KeychainEntry};

// The on-disk contract fixes a 16-byte IV, so the cipher is parameterised
// away from the crate's 12-byte default nonce.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Seal `buf` in place; returns the detached 16-byte tag.
pub fn seal(key: &[u8; 32], iv: &[u8; 16], aad: &[u8], buf: &mut Vec<u8>) -> Result<[u8; 16]> {
    let cipher = Aes256Gcm16::new(GenericArray::from_slice(key));
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(iv), aad, buf)
        .map_err(|_| err(ErrorKind::Decrypt, "aead seal failed"))?;
    Ok(tag.into())
}

/// Open `buf` in place against a detached tag. On failure the buffer
/// content is unspecified and must not be used.
pub fn open(
    key: &[u8; 32],
    iv: &[u8; 16],
    aad: &[u8],
    tag: &[u8; 16],
    buf: &mut Vec<u8>,
) -> Result<()> {
    let cipher = Aes256Gcm16::new(GenericArray::from_slice(key));
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(iv),
            aad,
            buf,
            GenericArray::from_slice(tag),
        )
        .map_err(|_| err(ErrorKind::Decrypt, "aead tag verification failed"))
}

/// Encrypt a sealed container in place. The plaintext is the masked
/// header image followed by the data and stride payloads; the ciphertext
/// replaces the data buffer and the visible header shrinks to the
/// encryption flag, the keychain identifier and the ciphertext length.
pub fn encrypt_container(container: &mut DataContainer, keychain: &Keychain) -> Result<()> {
    let mut plaintext = container.header.to_masked_bytes();
    if container.header.controller.mixed_stride {
        container.stride_header.to_masked_bytes(&mut plaintext);
    }
    plaintext.put_bytes(container.data.as_slice());
    plaintext.put_bytes(container.strides.as_slice());
    let mut buf = plaintext.into_vec();

    let mut entry = KeychainEntry::random_aes256();
    entry.field_id = keychain.random_identifier();
    entry.tag = seal(&entry.key, &entry.iv, &[], &mut buf)?;

    container.header.reset();
    container.header.controller.encryption = EncryptionId::Aes256;
    container.header.identifier = entry.field_id;
    container.header.e_length = buf.len() as u32;
    container.data.replace(buf);
    container.strides.clear();
    container.stride_header = StrideHeader::default();

    keychain.append(entry);
    Ok(())
}

/// Decrypt a container in place: look the identifier up, open the
/// ciphertext, unmask the original header and restore the data and stride
/// buffers to their pre-encryption lengths. No partial data escapes on
/// failure; the container is only mutated after the tag verifies.
pub fn decrypt_container(container: &mut DataContainer, keychain: &Keychain) -> Result<()> {
    match container.header.controller.encryption {
        EncryptionId::None => return Ok(()),
        EncryptionId::Aes256 => {}
        _ => {
            return Err(err(
                ErrorKind::Decrypt,
                "container sealed with an unsupported cipher",
            ))
        }
    }

    let entry = keychain
        .get(container.header.identifier)
        .ok_or_else(|| err(ErrorKind::Decrypt, "container identifier not in keychain"))?;
    if entry.cipher != EncryptionId::Aes256 {
        return Err(err(ErrorKind::Decrypt, "wrong cipher for container"));
    }

    let mut buf = container.data.as_slice().to_vec();
    open(&entry.key, &entry.iv, &[], &entry.tag, &mut buf)?;

    let mut plaintext = TypedBuffer::from(buf);
    let header = ContainerHeader::from_masked_bytes(&mut plaintext)?;
    let stride_header = if header.controller.mixed_stride {
        StrideHeader::from_masked_bytes(&mut plaintext)?
    } else {
        StrideHeader::default()
    };
    let data = plaintext.get_bytes(header.c_length as usize)?.to_vec();
    let strides = plaintext
        .get_bytes(stride_header.c_length as usize)?
        .to_vec();
    if plaintext.remaining() != 0 {
        return Err(err(ErrorKind::Decrypt, "trailing bytes after sealed payload"));
    }

    container.header = header;
    container.stride_header = stride_header;
    container.data.replace(data);
    container.strides.replace(strides);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use tachyon_containers::PrimitiveType;
    use test_log::test;

    fn sealed_container() -> DataContainer {
        let mut c = DataContainer::new(PrimitiveType::U32);
        c.header.controller.signedness = true;
        for v in [400, 500, 600] {
            c.append_i32(v);
            c.add_stride(1);
        }
        c.seal().unwrap();
        c
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let keychain = Keychain::new();
        let mut c = sealed_container();
        let original_header = c.header.clone();
        let original_data = c.data.as_slice().to_vec();

        encrypt_container(&mut c, &keychain).unwrap();
        assert_eq!(c.header.controller.encryption, EncryptionId::Aes256);
        assert_ne!(c.data.as_slice(), &original_data[..]);
        assert_eq!(keychain.len(), 1);

        decrypt_container(&mut c, &keychain).unwrap();
        assert_eq!(c.header, original_header);
        assert_eq!(c.data.as_slice(), &original_data[..]);
        c.verify_checksums().unwrap();
    }

    #[test]
    fn test_tampered_ciphertext_is_fatal() {
        let keychain = Keychain::new();
        let mut c = sealed_container();
        encrypt_container(&mut c, &keychain).unwrap();

        // Flip one ciphertext byte.
        let mut bytes = c.data.as_slice().to_vec();
        bytes[0] ^= 0x01;
        let header_before = c.header.clone();
        c.data.replace(bytes.clone());

        let e = decrypt_container(&mut c, &keychain).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Decrypt);
        // No partial data exposed: the container still holds ciphertext
        // and the masked header.
        assert_eq!(c.data.as_slice(), &bytes[..]);
        assert_eq!(c.header, header_before);
    }

    #[test]
    fn test_keychain_miss_is_decrypt_error() {
        let writer_chain = Keychain::new();
        let reader_chain = Keychain::new();
        let mut c = sealed_container();
        encrypt_container(&mut c, &writer_chain).unwrap();
        let e = decrypt_container(&mut c, &reader_chain).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Decrypt);
    }

    #[test]
    fn test_mixed_stride_survives_encryption() {
        let keychain = Keychain::new();
        let mut c = DataContainer::new(PrimitiveType::U32);
        c.header.controller.signedness = true;
        c.append_i32(1);
        c.add_stride(1);
        c.append_i32(2);
        c.append_i32(3);
        c.add_stride(2);
        c.seal().unwrap();
        let strides_before = c.decoded_strides().unwrap();

        encrypt_container(&mut c, &keychain).unwrap();
        decrypt_container(&mut c, &keychain).unwrap();
        assert_eq!(c.decoded_strides().unwrap(), strides_before);
        c.verify_checksums().unwrap();
    }
}
