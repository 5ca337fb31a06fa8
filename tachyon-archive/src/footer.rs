use tachyon_base::{err, ErrorKind, ReadLeExt, Reader, Result, WriteLeExt, Writer};
use tachyon_containers::BitMatrix;

/// Fixed 8-byte end-of-block sentinel.
pub const BLOCK_EOF: u64 = 0x6B7A657956656E6F;

/// Block controller bits, LSB first:
/// has_gt(1) | has_gt_permuted(1) | has_info(1) | has_format(1) |
/// has_filter(1) | unused(11)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockController {
    pub has_gt: bool,
    pub has_gt_permuted: bool,
    pub has_info: bool,
    pub has_format: bool,
    pub has_filter: bool,
}

impl BlockController {
    pub fn to_u16(&self) -> u16 {
        (self.has_gt as u16)
            | (self.has_gt_permuted as u16) << 1
            | (self.has_info as u16) << 2
            | (self.has_format as u16) << 3
            | (self.has_filter as u16) << 4
    }

    pub fn from_u16(bits: u16) -> Self {
        BlockController {
            has_gt: bits & 1 != 0,
            has_gt_permuted: bits >> 1 & 1 != 0,
            has_info: bits >> 2 & 1 != 0,
            has_format: bits >> 3 & 1 != 0,
            has_filter: bits >> 4 & 1 != 0,
        }
    }
}

/// Relative byte offsets of the base streams, in write order. A block is
/// navigable from its prefix alone: every stream can be seeked without
/// touching its neighbours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BaseOffsets {
    pub ppa: u32,
    pub meta_hot: u32,
    pub meta_cold: u32,
    pub gt_rle: u32,
    pub gt_packed: u32,
    pub gt_support: u32,
    pub info_ids: u32,
    pub filter_ids: u32,
    pub format_ids: u32,
}

/// Block prefix ("footer prefix"): controller, extent, stream counts and
/// the offset table, written before any payload so readers can select
/// columns. The trailing footer carries the pattern matrices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockHeader {
    pub controller: BlockController,
    pub contig_id: i32,
    pub n_variants: u32,
    pub min_position: u64,
    /// Relative offset one past the block sentinel; skipping a block is
    /// a single seek.
    pub end_of_block: u32,
    /// Relative offset of the trailing footer.
    pub offset_footer: u32,
    pub base: BaseOffsets,
    /// (global key, relative offset) per INFO stream, observation order.
    pub info_offsets: Vec<(u32, u32)>,
    /// (global key, relative offset) per FORMAT stream.
    pub format_offsets: Vec<(u32, u32)>,
    /// Global FILTER keys observed in the block; filters carry no data
    /// containers, presence lives in the pattern matrix.
    pub filter_keys: Vec<u32>,
}

impl BlockHeader {
    pub fn disk_size(&self) -> usize {
        2 + 4 + 4 + 8 + 4 + 4
            + 9 * 4
            + 3 * 2
            + self.info_offsets.len() * 8
            + self.format_offsets.len() * 8
            + self.filter_keys.len() * 4
    }

    pub fn info_keys(&self) -> Vec<u32> {
        self.info_offsets.iter().map(|&(k, _)| k).collect()
    }

    pub fn format_keys(&self) -> Vec<u32> {
        self.format_offsets.iter().map(|&(k, _)| k).collect()
    }

    pub fn write(&self, wr: &mut impl Writer) -> Result<()> {
        wr.write_le_num(self.controller.to_u16())?;
        wr.write_le_num(self.contig_id)?;
        wr.write_le_num(self.n_variants)?;
        wr.write_le_num(self.min_position)?;
        wr.write_le_num(self.end_of_block)?;
        wr.write_le_num(self.offset_footer)?;
        for offset in [
            self.base.ppa,
            self.base.meta_hot,
            self.base.meta_cold,
            self.base.gt_rle,
            self.base.gt_packed,
            self.base.gt_support,
            self.base.info_ids,
            self.base.filter_ids,
            self.base.format_ids,
        ] {
            wr.write_le_num(offset)?;
        }
        wr.write_le_num(self.info_offsets.len() as u16)?;
        wr.write_le_num(self.format_offsets.len() as u16)?;
        wr.write_le_num(self.filter_keys.len() as u16)?;
        for &(key, offset) in &self.info_offsets {
            wr.write_le_num(key)?;
            wr.write_le_num(offset)?;
        }
        for &(key, offset) in &self.format_offsets {
            wr.write_le_num(key)?;
            wr.write_le_num(offset)?;
        }
        for &key in &self.filter_keys {
            wr.write_le_num(key)?;
        }
        Ok(())
    }

    pub fn read(rd: &mut impl Reader) -> Result<Self> {
        let controller = BlockController::from_u16(rd.read_le_num::<u16>()?);
        let contig_id = rd.read_le_num::<i32>()?;
        let n_variants = rd.read_le_num::<u32>()?;
        let min_position = rd.read_le_num::<u64>()?;
        let end_of_block = rd.read_le_num::<u32>()?;
        let offset_footer = rd.read_le_num::<u32>()?;
        let mut offsets = [0_u32; 9];
        for slot in offsets.iter_mut() {
            *slot = rd.read_le_num::<u32>()?;
        }
        let base = BaseOffsets {
            ppa: offsets[0],
            meta_hot: offsets[1],
            meta_cold: offsets[2],
            gt_rle: offsets[3],
            gt_packed: offsets[4],
            gt_support: offsets[5],
            info_ids: offsets[6],
            filter_ids: offsets[7],
            format_ids: offsets[8],
        };
        let n_info = rd.read_le_num::<u16>()?;
        let n_format = rd.read_le_num::<u16>()?;
        let n_filter = rd.read_le_num::<u16>()?;
        let mut info_offsets = Vec::with_capacity(n_info as usize);
        for _ in 0..n_info {
            info_offsets.push((rd.read_le_num::<u32>()?, rd.read_le_num::<u32>()?));
        }
        let mut format_offsets = Vec::with_capacity(n_format as usize);
        for _ in 0..n_format {
            format_offsets.push((rd.read_le_num::<u32>()?, rd.read_le_num::<u32>()?));
        }
        let mut filter_keys = Vec::with_capacity(n_filter as usize);
        for _ in 0..n_filter {
            filter_keys.push(rd.read_le_num::<u32>()?);
        }
        Ok(BlockHeader {
            controller,
            contig_id,
            n_variants,
            min_position,
            end_of_block,
            offset_footer,
            base,
            info_offsets,
            format_offsets,
            filter_keys,
        })
    }
}

/// Trailing footer: the pattern participation matrices for the three
/// categories and the absolute end-of-block offset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockFooter {
    pub info_matrix: BitMatrix,
    pub format_matrix: BitMatrix,
    pub filter_matrix: BitMatrix,
    pub end_of_block_abs: u64,
}

impl BlockFooter {
    pub fn disk_size(&self) -> usize {
        let matrix = |m: &BitMatrix| 4 + m.n_rows() * m.row_bytes();
        matrix(&self.info_matrix) + matrix(&self.format_matrix) + matrix(&self.filter_matrix) + 8
    }

    pub fn write(&self, wr: &mut impl Writer) -> Result<()> {
        self.info_matrix.write(wr)?;
        self.format_matrix.write(wr)?;
        self.filter_matrix.write(wr)?;
        wr.write_le_num(self.end_of_block_abs)?;
        Ok(())
    }

    pub fn read(rd: &mut impl Reader) -> Result<Self> {
        Ok(BlockFooter {
            info_matrix: BitMatrix::read(rd)?,
            format_matrix: BitMatrix::read(rd)?,
            filter_matrix: BitMatrix::read(rd)?,
            end_of_block_abs: rd.read_le_num::<u64>()?,
        })
    }
}

pub fn write_block_sentinel(wr: &mut impl Writer) -> Result<()> {
    wr.write_le_num(BLOCK_EOF)
}

pub fn check_block_sentinel(rd: &mut impl Reader) -> Result<()> {
    let sentinel = rd.read_le_num::<u64>()?;
    if sentinel != BLOCK_EOF {
        return Err(err(ErrorKind::Corruption, "block sentinel mismatch"));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use tachyon_base::MemWriter;
    use test_log::test;

    #[test]
    fn test_header_round_trip_and_size() {
        let header = BlockHeader {
            controller: BlockController {
                has_gt: true,
                has_gt_permuted: true,
                has_info: true,
                has_format: false,
                has_filter: true,
            },
            contig_id: 2,
            n_variants: 512,
            min_position: 1_000_000,
            end_of_block: 40_000,
            offset_footer: 39_000,
            base: BaseOffsets {
                ppa: 64,
                meta_hot: 128,
                ..BaseOffsets::default()
            },
            info_offsets: vec![(3, 4096), (9, 8192)],
            format_offsets: vec![],
            filter_keys: vec![0],
        };
        let mut w = MemWriter::new();
        header.write(&mut w).unwrap();
        let mut r = w.try_into_reader().unwrap();
        let pos_check = header.disk_size() as u64;
        let back = BlockHeader::read(&mut r).unwrap();
        assert_eq!(back, header);
        use tachyon_base::Reader as _;
        assert_eq!(r.pos().unwrap(), pos_check);
    }

    #[test]
    fn test_sentinel_is_checked() {
        let mut w = MemWriter::new();
        write_block_sentinel(&mut w).unwrap();
        w.write_le_num(0_u64).unwrap();
        let mut r = w.try_into_reader().unwrap();
        check_block_sentinel(&mut r).unwrap();
        let e = check_block_sentinel(&mut r).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Corruption);
    }
}
