use tachyon_base::{err, ErrorKind, Result};

/// Tagged primitive form of a container's payload. Replaces the template
/// dispatch of a per-type container with a tag plus a width accessor;
/// generic code reduces to a `match` on the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum PrimitiveType {
    U8 = 0,
    U16 = 1,
    U32 = 2,
    U64 = 3,
    Float = 4,
    Double = 5,
    // A boolean container carries zero data bytes; presence of the key in
    // a pattern set is the signal.
    Bool = 6,
    Char = 7,
    // Opaque packed records (meta entries, genotype bitstreams). Exempt
    // from down-casting and uniformity checks.
    Struct = 8,
}

impl PrimitiveType {
    pub fn from_u8(value: u8) -> Result<Self> {
        Ok(match value {
            0 => PrimitiveType::U8,
            1 => PrimitiveType::U16,
            2 => PrimitiveType::U32,
            3 => PrimitiveType::U64,
            4 => PrimitiveType::Float,
            5 => PrimitiveType::Double,
            6 => PrimitiveType::Bool,
            7 => PrimitiveType::Char,
            8 => PrimitiveType::Struct,
            _ => return Err(err(ErrorKind::Format, "unknown primitive type")),
        })
    }

    /// Width of one value in bytes. Struct streams are measured in raw
    /// bytes; boolean streams have no payload at all.
    pub fn width(&self) -> usize {
        match self {
            PrimitiveType::U8 | PrimitiveType::Char | PrimitiveType::Struct => 1,
            PrimitiveType::U16 => 2,
            PrimitiveType::U32 | PrimitiveType::Float => 4,
            PrimitiveType::U64 | PrimitiveType::Double => 8,
            PrimitiveType::Bool => 0,
        }
    }

    pub fn for_int_width(width: usize) -> Self {
        match width {
            1 => PrimitiveType::U8,
            2 => PrimitiveType::U16,
            4 => PrimitiveType::U32,
            _ => PrimitiveType::U64,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EncoderId {
    #[default]
    None = 0,
    Zstd = 1,
}

impl EncoderId {
    pub fn from_u8(value: u8) -> Result<Self> {
        Ok(match value {
            0 => EncoderId::None,
            1 => EncoderId::Zstd,
            _ => return Err(err(ErrorKind::Format, "unknown encoder id")),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EncryptionId {
    #[default]
    None = 0,
    Aes128 = 1,
    Aes256 = 2,
    Rsa4096 = 3,
}

impl EncryptionId {
    pub fn from_u8(value: u8) -> Result<Self> {
        Ok(match value {
            0 => EncryptionId::None,
            1 => EncryptionId::Aes128,
            2 => EncryptionId::Aes256,
            3 => EncryptionId::Rsa4096,
            _ => return Err(err(ErrorKind::Format, "unknown cipher id")),
        })
    }
}

/// Controller bit packing, LSB first:
/// signedness(1) | mixed_stride(1) | primitive_type(6) | encoder(5) |
/// uniform(1) | encryption(2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerController {
    pub signedness: bool,
    pub mixed_stride: bool,
    pub primitive: PrimitiveType,
    pub encoder: EncoderId,
    pub uniform: bool,
    pub encryption: EncryptionId,
}

impl Default for ContainerController {
    fn default() -> Self {
        ContainerController {
            signedness: false,
            mixed_stride: false,
            primitive: PrimitiveType::Struct,
            encoder: EncoderId::None,
            uniform: false,
            encryption: EncryptionId::None,
        }
    }
}

impl ContainerController {
    pub fn to_u16(&self) -> u16 {
        (self.signedness as u16)
            | (self.mixed_stride as u16) << 1
            | (self.primitive as u16) << 2
            | (self.encoder as u16) << 8
            | (self.uniform as u16) << 13
            | (self.encryption as u16) << 14
    }

    pub fn from_u16(bits: u16) -> Result<Self> {
        Ok(ContainerController {
            signedness: bits & 1 != 0,
            mixed_stride: bits >> 1 & 1 != 0,
            primitive: PrimitiveType::from_u8((bits >> 2 & 0x3f) as u8)?,
            encoder: EncoderId::from_u8((bits >> 8 & 0x1f) as u8)?,
            uniform: bits >> 13 & 1 != 0,
            encryption: EncryptionId::from_u8((bits >> 14 & 0x3) as u8)?,
        })
    }
}
