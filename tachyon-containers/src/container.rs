use tachyon_base::{
    err, hash64_seeded, ErrorKind, ReadLeExt, Reader, Result, TypedBuffer, WriteLeExt, Writer,
    UNIFORMITY_SEED,
};

use crate::types::{ContainerController, EncoderId, EncryptionId, PrimitiveType};

/// Missing-value sentinel in the 32-bit integer domain.
pub const MISSING_I32: i32 = i32::MIN; // 0x80000000
/// End-of-vector sentinel in the 32-bit integer domain.
pub const EOV_I32: i32 = i32::MIN + 1; // 0x80000001

/// Container data header on disk:
/// controller(u16) || stride(i16) || offset(u32) || cLength(u32) ||
/// uLength(u32) || crc(u32) || n_extra(u16) || extra[n_extra]
/// An encrypted container appends identifier(u64) || eLength(u32).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerHeader {
    pub controller: ContainerController,
    /// Number of values per logical entry, or -1 when strides are mixed
    /// and persisted in the stride sub-stream.
    pub stride: i16,
    /// Relative byte offset of this container within its block. Filled in
    /// when the block computes its layout.
    pub offset: u32,
    pub c_length: u32,
    pub u_length: u32,
    pub crc: u32,
    /// Keychain identifier; meaningful only when encryption is flagged.
    pub identifier: u64,
    /// Ciphertext length; meaningful only when encryption is flagged.
    pub e_length: u32,
}

pub const HEADER_FIXED_SIZE: usize = 22;
pub const HEADER_ENCRYPTED_EXTRA: usize = 12;
pub const STRIDE_HEADER_SIZE: usize = 16;

impl ContainerHeader {
    pub fn reset(&mut self) {
        *self = ContainerHeader {
            stride: -1,
            ..ContainerHeader::default()
        };
    }

    pub fn disk_size(&self) -> usize {
        if self.controller.encryption != EncryptionId::None {
            HEADER_FIXED_SIZE + HEADER_ENCRYPTED_EXTRA
        } else {
            HEADER_FIXED_SIZE
        }
    }

    pub fn write(&self, wr: &mut impl Writer) -> Result<()> {
        wr.write_le_num(self.controller.to_u16())?;
        wr.write_le_num(self.stride)?;
        wr.write_le_num(self.offset)?;
        wr.write_le_num(self.c_length)?;
        wr.write_le_num(self.u_length)?;
        wr.write_le_num(self.crc)?;
        wr.write_le_num(0_u16)?; // n_extra
        if self.controller.encryption != EncryptionId::None {
            wr.write_le_num(self.identifier)?;
            wr.write_le_num(self.e_length)?;
        }
        Ok(())
    }

    pub fn read(rd: &mut impl Reader) -> Result<Self> {
        let controller = ContainerController::from_u16(rd.read_le_num::<u16>()?)?;
        let stride = rd.read_le_num::<i16>()?;
        let offset = rd.read_le_num::<u32>()?;
        let c_length = rd.read_le_num::<u32>()?;
        let u_length = rd.read_le_num::<u32>()?;
        let crc = rd.read_le_num::<u32>()?;
        let n_extra = rd.read_le_num::<u16>()?;
        if n_extra > 0 {
            rd.read_byte_vec(n_extra as usize)?;
        }
        let (identifier, e_length) = if controller.encryption != EncryptionId::None {
            (rd.read_le_num::<u64>()?, rd.read_le_num::<u32>()?)
        } else {
            (0, 0)
        };
        Ok(ContainerHeader {
            controller,
            stride,
            offset,
            c_length,
            u_length,
            crc,
            identifier,
            e_length,
        })
    }

    /// Header image used as the AEAD plaintext prefix ("mask header in
    /// encrypted message"). Always the unencrypted form.
    pub fn to_masked_bytes(&self) -> TypedBuffer {
        let mut buf = TypedBuffer::with_capacity(HEADER_FIXED_SIZE);
        buf.put_u16(self.controller.to_u16());
        buf.put_i16(self.stride);
        buf.put_u32(self.offset);
        buf.put_u32(self.c_length);
        buf.put_u32(self.u_length);
        buf.put_u32(self.crc);
        buf.put_u16(0); // n_extra
        buf
    }

    pub fn from_masked_bytes(buf: &mut TypedBuffer) -> Result<Self> {
        let controller = ContainerController::from_u16(buf.get_u16()?)?;
        let stride = buf.get_i16()?;
        let offset = buf.get_u32()?;
        let c_length = buf.get_u32()?;
        let u_length = buf.get_u32()?;
        let crc = buf.get_u32()?;
        let n_extra = buf.get_u16()?;
        if n_extra > 0 {
            buf.get_bytes(n_extra as usize)?;
        }
        Ok(ContainerHeader {
            controller,
            stride,
            offset,
            c_length,
            u_length,
            crc,
            identifier: 0,
            e_length: 0,
        })
    }
}

/// Stride sub-header on disk (omits stride and offset):
/// controller(u16) || cLength(u32) || uLength(u32) || crc(u32) || n_extra(u16)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrideHeader {
    pub controller: ContainerController,
    pub c_length: u32,
    pub u_length: u32,
    pub crc: u32,
}

impl StrideHeader {
    pub fn write(&self, wr: &mut impl Writer) -> Result<()> {
        wr.write_le_num(self.controller.to_u16())?;
        wr.write_le_num(self.c_length)?;
        wr.write_le_num(self.u_length)?;
        wr.write_le_num(self.crc)?;
        wr.write_le_num(0_u16)?;
        Ok(())
    }

    pub fn read(rd: &mut impl Reader) -> Result<Self> {
        let controller = ContainerController::from_u16(rd.read_le_num::<u16>()?)?;
        let c_length = rd.read_le_num::<u32>()?;
        let u_length = rd.read_le_num::<u32>()?;
        let crc = rd.read_le_num::<u32>()?;
        let n_extra = rd.read_le_num::<u16>()?;
        if n_extra > 0 {
            rd.read_byte_vec(n_extra as usize)?;
        }
        Ok(StrideHeader {
            controller,
            c_length,
            u_length,
            crc,
        })
    }

    pub fn to_masked_bytes(&self, buf: &mut TypedBuffer) {
        buf.put_u16(self.controller.to_u16());
        buf.put_u32(self.c_length);
        buf.put_u32(self.u_length);
        buf.put_u32(self.crc);
        buf.put_u16(0);
    }

    pub fn from_masked_bytes(buf: &mut TypedBuffer) -> Result<Self> {
        let controller = ContainerController::from_u16(buf.get_u16()?)?;
        let c_length = buf.get_u32()?;
        let u_length = buf.get_u32()?;
        let crc = buf.get_u32()?;
        let n_extra = buf.get_u16()?;
        if n_extra > 0 {
            buf.get_bytes(n_extra as usize)?;
        }
        Ok(StrideHeader {
            controller,
            c_length,
            u_length,
            crc,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StrideState {
    Unset,
    Fixed(u32),
    Mixed,
}

/// One typed column of a block. Grown by appends during accumulation,
/// sealed (down-cast, uniformity check, CRC) at flush, then handed to the
/// codec manager and optionally the cipher.
#[derive(Debug)]
pub struct DataContainer {
    pub header: ContainerHeader,
    pub stride_header: StrideHeader,
    pub n_entries: u32,
    pub n_additions: u32,
    pub data: TypedBuffer,
    pub strides: TypedBuffer,
    stride_state: StrideState,
}

impl DataContainer {
    pub fn new(primitive: PrimitiveType) -> Self {
        let mut container = DataContainer {
            header: ContainerHeader::default(),
            stride_header: StrideHeader::default(),
            n_entries: 0,
            n_additions: 0,
            data: TypedBuffer::new(),
            strides: TypedBuffer::new(),
            stride_state: StrideState::Unset,
        };
        container.header.stride = -1;
        container.header.controller.primitive = primitive;
        container
    }

    pub fn with_capacity(primitive: PrimitiveType, capacity: usize) -> Self {
        let mut container = Self::new(primitive);
        container.data.reserve(capacity);
        container
    }

    /// Recycle without releasing memory; the block reuses its containers
    /// across flushes.
    pub fn reset(&mut self, primitive: PrimitiveType) {
        self.header.reset();
        self.stride_header = StrideHeader::default();
        self.n_entries = 0;
        self.n_additions = 0;
        self.data.clear();
        self.strides.clear();
        self.stride_state = StrideState::Unset;
        self.header.controller.primitive = primitive;
    }

    pub fn primitive(&self) -> PrimitiveType {
        self.header.controller.primitive
    }

    pub fn is_uniform(&self) -> bool {
        self.header.controller.uniform
    }

    pub fn fixed_stride(&self) -> Option<u32> {
        match self.stride_state {
            StrideState::Fixed(s) => Some(s),
            StrideState::Unset if self.header.stride > 0 => Some(self.header.stride as u32),
            _ => None,
        }
    }

    pub fn set_fixed_stride(&mut self, stride: u32) {
        self.stride_state = StrideState::Fixed(stride);
        self.header.stride = stride as i16;
    }

    /// Pin the container to mixed-stride mode so every recorded stride
    /// persists verbatim, even if they happen to be equal. Streams whose
    /// stride is a sibling count rather than a value count (the GT
    /// support stream) need this; a fixed stride would misdescribe the
    /// data layout to the uniformity scan.
    pub fn force_mixed_stride(&mut self) {
        self.stride_state = StrideState::Mixed;
        self.header.stride = -1;
        self.header.controller.mixed_stride = true;
    }

    // Typed appends. The declared primitive width must match the width of
    // the value being appended.

    pub fn append_u8(&mut self, value: u8) {
        debug_assert_eq!(self.primitive().width(), 1);
        self.data.put_u8(value);
        self.n_entries += 1;
    }

    pub fn append_i8(&mut self, value: i8) {
        debug_assert_eq!(self.primitive().width(), 1);
        self.data.put_i8(value);
        self.n_entries += 1;
    }

    pub fn append_char(&mut self, value: u8) {
        debug_assert_eq!(self.primitive(), PrimitiveType::Char);
        self.data.put_char(value);
        self.n_entries += 1;
    }

    pub fn append_u16(&mut self, value: u16) {
        debug_assert_eq!(self.primitive().width(), 2);
        self.data.put_u16(value);
        self.n_entries += 1;
    }

    pub fn append_i16(&mut self, value: i16) {
        debug_assert_eq!(self.primitive().width(), 2);
        self.data.put_i16(value);
        self.n_entries += 1;
    }

    pub fn append_u32(&mut self, value: u32) {
        debug_assert_eq!(self.primitive().width(), 4);
        self.data.put_u32(value);
        self.n_entries += 1;
    }

    pub fn append_i32(&mut self, value: i32) {
        debug_assert_eq!(self.primitive().width(), 4);
        self.data.put_i32(value);
        self.n_entries += 1;
    }

    pub fn append_u64(&mut self, value: u64) {
        debug_assert_eq!(self.primitive().width(), 8);
        self.data.put_u64(value);
        self.n_entries += 1;
    }

    pub fn append_i64(&mut self, value: i64) {
        debug_assert_eq!(self.primitive().width(), 8);
        self.data.put_i64(value);
        self.n_entries += 1;
    }

    pub fn append_f32(&mut self, value: f32) {
        debug_assert_eq!(self.primitive(), PrimitiveType::Float);
        self.data.put_f32(value);
        self.n_entries += 1;
    }

    pub fn append_f64(&mut self, value: f64) {
        debug_assert_eq!(self.primitive(), PrimitiveType::Double);
        self.data.put_f64(value);
        self.n_entries += 1;
    }

    /// Append raw packed bytes to a struct-typed stream. Counts a single
    /// entry regardless of byte length.
    pub fn append_struct(&mut self, bytes: &[u8]) {
        debug_assert_eq!(self.primitive(), PrimitiveType::Struct);
        self.data.put_bytes(bytes);
        self.n_entries += 1;
    }

    /// Append one word at an explicit machine width (genotype bitstreams).
    pub fn append_word(&mut self, value: u64, width: usize) {
        self.data.put_uint_at_width(value, width);
        self.n_entries += 1;
    }

    pub fn bump_additions(&mut self, n: u32) {
        self.n_additions += n;
    }

    /// Record that the next logical entry occupies `stride` consecutive
    /// values. Equal strides collapse into the header; a mismatch flips
    /// the container to mixed-stride and the per-entry strides persist.
    pub fn add_stride(&mut self, stride: u32) {
        match self.stride_state {
            StrideState::Unset => {
                if stride <= i16::MAX as u32 {
                    self.stride_state = StrideState::Fixed(stride);
                    self.header.stride = stride as i16;
                } else {
                    self.stride_state = StrideState::Mixed;
                    self.header.stride = -1;
                    self.header.controller.mixed_stride = true;
                }
            }
            StrideState::Fixed(current) if current == stride => {}
            StrideState::Fixed(_) => {
                self.stride_state = StrideState::Mixed;
                self.header.stride = -1;
                self.header.controller.mixed_stride = true;
            }
            StrideState::Mixed => {}
        }
        self.strides.put_u32(stride);
    }

    /// Seal for flush: boolean promotion, integer down-cast, uniformity
    /// detection, checksums. After sealing the container is immutable
    /// until `reset`.
    pub fn seal(&mut self) -> Result<()> {
        // A container with entries but no data bytes carries presence
        // only; promote it to a boolean stream.
        if self.n_entries > 0 && self.data.is_empty() {
            self.header.controller.primitive = PrimitiveType::Bool;
            self.header.controller.uniform = true;
            self.header.controller.mixed_stride = false;
            self.header.controller.signedness = false;
            self.header.controller.encoder = EncoderId::None;
            self.header.stride = 0;
            self.header.u_length = 0;
            self.header.c_length = 0;
            self.header.crc = 0;
            self.n_entries = 0;
            self.n_additions = 0;
            self.strides.clear();
            return Ok(());
        }

        if self.data.is_empty() {
            self.header.u_length = 0;
            self.header.c_length = 0;
            self.strides.clear();
            return Ok(());
        }

        if self.primitive() == PrimitiveType::U32 && self.header.controller.signedness {
            self.downcast_i32()?;
        }

        self.check_uniformity();

        if self.header.controller.mixed_stride {
            self.downcast_strides();
            self.stride_header.u_length = self.strides.len() as u32;
            self.stride_header.c_length = self.strides.len() as u32;
            self.stride_header.crc = self.strides.crc32();
        } else {
            // Fixed stride lives in the header; the per-entry copies are
            // no longer needed.
            self.strides.clear();
        }

        self.header.u_length = self.data.len() as u32;
        self.header.c_length = self.data.len() as u32;
        self.header.crc = self.data.crc32();
        Ok(())
    }

    /// Re-encode a signed 32-bit stream at the smallest width in
    /// {1,2,4} that fits min(x), max(x) and the remapped sentinels.
    fn downcast_i32(&mut self) -> Result<()> {
        let bytes = self.data.as_slice();
        if bytes.len() % 4 != 0 {
            return Err(err(ErrorKind::Corruption, "i32 stream length not word aligned"));
        }

        let mut min = i32::MAX;
        let mut max = i32::MIN;
        let mut any_sentinel = false;
        let mut any_ordinary = false;
        for chunk in bytes.chunks_exact(4) {
            let v = i32::from_le_bytes(chunk.try_into().unwrap());
            if v == MISSING_I32 || v == EOV_I32 {
                any_sentinel = true;
                continue;
            }
            any_ordinary = true;
            min = min.min(v);
            max = max.max(v);
        }
        if !any_ordinary {
            min = 0;
            max = 0;
        }

        let (signed, width) = if !any_sentinel && min >= 0 {
            let width = if max as u32 <= u8::MAX as u32 {
                1
            } else if max as u32 <= u16::MAX as u32 {
                2
            } else {
                4
            };
            (false, width)
        } else {
            // Two codes at the bottom of each signed domain are reserved
            // for the remapped sentinels.
            let width = if min >= i8::MIN as i32 + 2 && max <= i8::MAX as i32 {
                1
            } else if min >= i16::MIN as i32 + 2 && max <= i16::MAX as i32 {
                2
            } else {
                4
            };
            (true, width)
        };

        if width == 4 {
            self.header.controller.signedness = signed;
            return Ok(());
        }

        let mut narrow = TypedBuffer::with_capacity(self.n_entries as usize * width);
        for chunk in self.data.as_slice().chunks_exact(4) {
            let v = i32::from_le_bytes(chunk.try_into().unwrap());
            let word = match (v, width) {
                (MISSING_I32, 1) => 0x80_u64,
                (EOV_I32, 1) => 0x81_u64,
                (MISSING_I32, 2) => 0x8000_u64,
                (EOV_I32, 2) => 0x8001_u64,
                _ => v as u32 as u64 & (u64::MAX >> (64 - 8 * width)),
            };
            narrow.put_uint_at_width(word, width);
        }
        self.data = narrow;
        self.header.controller.signedness = signed;
        self.header.controller.primitive = PrimitiveType::for_int_width(width);
        Ok(())
    }

    /// Hash every stride-sized window; if all windows agree the stream
    /// stores a single window and flags itself uniform.
    fn check_uniformity(&mut self) {
        if self.n_entries == 0 || self.header.controller.mixed_stride {
            return;
        }
        let stride = match self.fixed_stride() {
            Some(s) if s > 0 => s as usize,
            _ => return,
        };
        if matches!(
            self.primitive(),
            PrimitiveType::Struct | PrimitiveType::Bool
        ) {
            return;
        }
        let window = stride * self.primitive().width();
        let bytes = self.data.as_slice();
        if window == 0 || bytes.len() % window != 0 || bytes.len() == window {
            return;
        }

        let first = hash64_seeded(&bytes[..window], UNIFORMITY_SEED);
        for chunk in bytes.chunks_exact(window).skip(1) {
            if hash64_seeded(chunk, UNIFORMITY_SEED) != first {
                return;
            }
        }

        self.data.truncate(window);
        self.n_entries = stride as u32;
        self.header.controller.uniform = true;
        self.header.controller.mixed_stride = false;
        self.header.controller.encoder = EncoderId::None;
    }

    /// The stride sub-stream starts as u32 words; rewrite it at the
    /// narrowest width that covers the maximum stride.
    fn downcast_strides(&mut self) {
        let bytes = self.strides.as_slice();
        let mut max = 0_u32;
        for chunk in bytes.chunks_exact(4) {
            max = max.max(u32::from_le_bytes(chunk.try_into().unwrap()));
        }
        let width = if max <= u8::MAX as u32 {
            1
        } else if max <= u16::MAX as u32 {
            2
        } else {
            4
        };
        self.stride_header.controller.primitive = PrimitiveType::for_int_width(width);
        self.stride_header.controller.signedness = false;
        if width == 4 {
            return;
        }
        let mut narrow = TypedBuffer::with_capacity(bytes.len() / 4 * width);
        for chunk in self.strides.as_slice().chunks_exact(4) {
            let v = u32::from_le_bytes(chunk.try_into().unwrap());
            narrow.put_uint_at_width(v as u64, width);
        }
        self.strides = narrow;
    }

    /// Decode the per-entry strides of a mixed-stride container after the
    /// stride sub-stream has been decompressed.
    pub fn decoded_strides(&self) -> Result<Vec<u32>> {
        let width = self.stride_header.controller.primitive.width();
        if width == 0 {
            return Err(err(ErrorKind::Format, "stride stream with zero width"));
        }
        let bytes = self.strides.as_slice();
        if bytes.len() % width != 0 {
            return Err(err(ErrorKind::Corruption, "stride stream length mismatch"));
        }
        let mut out = Vec::with_capacity(bytes.len() / width);
        for chunk in bytes.chunks_exact(width) {
            let mut raw = [0u8; 8];
            raw[..width].copy_from_slice(chunk);
            out.push(u64::from_le_bytes(raw) as u32);
        }
        Ok(out)
    }

    /// Size on disk: headers plus payloads as currently held. Meaningful
    /// after sealing (and encoding/encryption, when used).
    pub fn disk_size(&self) -> usize {
        if self.header.controller.encryption != EncryptionId::None {
            return self.header.disk_size() + self.data.len();
        }
        let mut size = self.header.disk_size() + self.data.len();
        if self.header.controller.mixed_stride {
            size += STRIDE_HEADER_SIZE + self.strides.len();
        }
        size
    }

    /// Serialization: header || stride_header? || data || stride.
    pub fn write(&self, wr: &mut impl Writer) -> Result<()> {
        self.header.write(wr)?;
        if self.header.controller.encryption != EncryptionId::None {
            wr.write_byte_slice(self.data.as_slice())?;
            return Ok(());
        }
        if self.header.controller.mixed_stride {
            self.stride_header.write(wr)?;
        }
        wr.write_byte_slice(self.data.as_slice())?;
        if self.header.controller.mixed_stride {
            wr.write_byte_slice(self.strides.as_slice())?;
        }
        Ok(())
    }

    pub fn read(rd: &mut impl Reader) -> Result<Self> {
        let header = ContainerHeader::read(rd)?;
        let mut container = DataContainer::new(header.controller.primitive);
        if header.controller.encryption != EncryptionId::None {
            container.data = TypedBuffer::from(rd.read_byte_vec(header.e_length as usize)?);
            container.header = header;
            return Ok(container);
        }
        let stride_header = if header.controller.mixed_stride {
            StrideHeader::read(rd)?
        } else {
            StrideHeader::default()
        };
        container.data = TypedBuffer::from(rd.read_byte_vec(header.c_length as usize)?);
        if header.controller.mixed_stride {
            container.strides = TypedBuffer::from(rd.read_byte_vec(stride_header.c_length as usize)?);
        }
        if header.stride > 0 {
            container.stride_state = StrideState::Fixed(header.stride as u32);
        } else if header.controller.mixed_stride {
            container.stride_state = StrideState::Mixed;
        }
        container.header = header;
        container.stride_header = stride_header;
        Ok(container)
    }

    /// CRC32 verification over the uncompressed payloads; run after
    /// decompression (and decryption, when flagged).
    pub fn verify_checksums(&self) -> Result<()> {
        if self.data.crc32() != self.header.crc {
            return Err(err(ErrorKind::Corruption, "container data crc mismatch"));
        }
        if self.header.controller.mixed_stride && self.strides.crc32() != self.stride_header.crc {
            return Err(err(ErrorKind::Corruption, "container stride crc mismatch"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tachyon_base::MemWriter;
    use test_log::test;

    fn new_i32_container() -> DataContainer {
        let mut c = DataContainer::new(PrimitiveType::U32);
        c.header.controller.signedness = true;
        c
    }

    #[test]
    fn test_uniform_downcast_to_u8() {
        // Four identical small ints collapse to a single unsigned byte.
        let mut c = new_i32_container();
        for _ in 0..4 {
            c.append_i32(42);
            c.add_stride(1);
        }
        c.seal().unwrap();
        assert!(c.is_uniform());
        assert_eq!(c.primitive(), PrimitiveType::U8);
        assert!(!c.header.controller.signedness);
        assert_eq!(c.data.as_slice(), &[42]);
        assert_eq!(c.header.u_length, 1);
        assert_eq!(c.header.crc, {
            let mut b = TypedBuffer::new();
            b.put_u8(42);
            b.crc32()
        });
    }

    #[test]
    fn test_downcast_with_sentinels_goes_signed() {
        let mut c = new_i32_container();
        for v in [5, MISSING_I32, 7, EOV_I32] {
            c.append_i32(v);
            c.add_stride(1);
        }
        c.seal().unwrap();
        assert_eq!(c.primitive(), PrimitiveType::U8);
        assert!(c.header.controller.signedness);
        assert_eq!(c.data.as_slice(), &[5, 0x80, 7, 0x81]);
    }

    #[test]
    fn test_downcast_sentinel_reservation_widens() {
        // -127 collides with the remapped EOV code at width 1.
        let mut c = new_i32_container();
        for v in [-127, MISSING_I32] {
            c.append_i32(v);
            c.add_stride(1);
        }
        c.seal().unwrap();
        assert_eq!(c.primitive(), PrimitiveType::U16);
        assert_eq!(
            c.data.as_slice(),
            &[(-127_i16).to_le_bytes(), 0x8000_u16.to_le_bytes()].concat()[..]
        );
    }

    #[test]
    fn test_boolean_promotion() {
        let mut c = DataContainer::new(PrimitiveType::U32);
        c.n_entries = 3; // flag-only field: entries without bytes
        c.seal().unwrap();
        assert_eq!(c.primitive(), PrimitiveType::Bool);
        assert!(c.is_uniform());
        assert_eq!(c.header.u_length, 0);
        assert_eq!(c.n_entries, 0);
    }

    #[test]
    fn test_mixed_stride_persists() {
        let mut c = new_i32_container();
        c.append_i32(1);
        c.add_stride(1);
        c.append_i32(2);
        c.append_i32(3);
        c.add_stride(2);
        c.seal().unwrap();
        assert!(c.header.controller.mixed_stride);
        assert_eq!(c.header.stride, -1);
        assert_eq!(c.decoded_strides().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut c = new_i32_container();
        for v in [1000, -2, 30000] {
            c.append_i32(v);
            c.add_stride(1);
        }
        c.seal().unwrap();
        let disk = c.disk_size();

        let mut w = MemWriter::new();
        c.write(&mut w).unwrap();
        let mut r = w.try_into_reader().unwrap();
        let back = DataContainer::read(&mut r).unwrap();
        assert_eq!(back.header, c.header);
        assert_eq!(back.data.as_slice(), c.data.as_slice());
        assert_eq!(back.disk_size(), disk);
        back.verify_checksums().unwrap();
    }
}
