use std::{
    fs::File,
    io::{BufReader, BufWriter, Cursor, Read, Seek, SeekFrom, Write},
    path::PathBuf,
    sync::Arc,
};

use crate::error::{err, ErrorKind, Result};
use funty::Integral;

pub trait Reader: Read + Seek + Send + Sized {
    fn try_clone_independent(&self) -> Result<Self>;

    fn pos(&mut self) -> Result<u64> {
        Ok(self.stream_position()?)
    }

    fn stream_len(&mut self) -> Result<u64> {
        let pos = self.stream_position()?;
        let end = self.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(pos))?;
        Ok(end)
    }
}

pub trait Writer: Write + Seek + Send + Sized {
    type PairedReader: Reader;
    fn try_into_reader(self) -> Result<Self::PairedReader>;

    fn pos(&mut self) -> Result<u64> {
        Ok(self.stream_position()?)
    }
}

/// Little-endian primitive writes over any `Write`. Generic over the
/// fundamental integer types so header fields state their width at the
/// call site (`write_le_num::<u32>(..)`).
pub trait WriteLeExt: Write {
    fn write_le_num<T: Integral>(&mut self, value: T) -> Result<()>
    where
        T::Bytes: AsRef<[u8]>,
    {
        self.write_all(value.to_le_bytes().as_ref())?;
        Ok(())
    }

    fn write_byte_slice(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_all(bytes)?;
        Ok(())
    }
}
impl<W: Write + ?Sized> WriteLeExt for W {}

/// Little-endian primitive reads over any `Read`. A short read surfaces as
/// `Truncation` so the block reader can distinguish a cut-off stream from
/// an io fault.
pub trait ReadLeExt: Read {
    fn read_le_num<T: Integral>(&mut self) -> Result<T>
    where
        T::Bytes: AsMut<[u8]> + Default,
    {
        let mut bytes = T::Bytes::default();
        read_fully(self, bytes.as_mut())?;
        Ok(T::from_le_bytes(bytes))
    }

    fn read_byte_vec(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; n];
        read_fully(self, &mut bytes)?;
        Ok(bytes)
    }

    fn read_byte_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut bytes = [0u8; N];
        read_fully(self, &mut bytes)?;
        Ok(bytes)
    }
}
impl<R: Read + ?Sized> ReadLeExt for R {}

fn read_fully<R: Read + ?Sized>(rd: &mut R, buf: &mut [u8]) -> Result<()> {
    match rd.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(err(
            ErrorKind::Truncation,
            "stream ended before declared length was consumed",
        )),
        Err(e) => Err(e.into()),
    }
}

// MemReader

#[derive(Debug)]
pub struct MemReader {
    mem: Cursor<Arc<[u8]>>,
}

impl MemReader {
    fn new(mem: Arc<[u8]>) -> Self {
        Self {
            mem: Cursor::new(mem),
        }
    }
}

impl From<Vec<u8>> for MemReader {
    fn from(vec: Vec<u8>) -> Self {
        let rc: Arc<[u8]> = Arc::from(vec);
        Self::new(rc)
    }
}

impl Read for MemReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.mem.read(buf)
    }
}

impl Seek for MemReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.mem.seek(pos)
    }
}

impl Reader for MemReader {
    fn try_clone_independent(&self) -> Result<Self> {
        let rc = self.mem.get_ref().clone();
        Ok(Self::new(rc))
    }
}

// MemWriter

#[derive(Default)]
pub struct MemWriter {
    mem: Cursor<Vec<u8>>,
}

impl MemWriter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Write for MemWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.mem.write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.mem.flush()
    }
}

impl Seek for MemWriter {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.mem.seek(pos)
    }
}

impl Writer for MemWriter {
    type PairedReader = MemReader;
    fn try_into_reader(self) -> Result<Self::PairedReader> {
        let mem = self.mem.into_inner();
        let rc: Arc<[u8]> = Arc::from(mem);
        Ok(MemReader {
            mem: Cursor::new(rc),
        })
    }
}

// FileReader

pub struct FileReader {
    file: BufReader<File>,
    path: PathBuf,
}

impl FileReader {
    pub fn try_open_existing(path: PathBuf) -> Result<Self> {
        let file = File::open(&path)?;
        let file = BufReader::new(file);
        Ok(Self { file, path })
    }
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for FileReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.file.seek(pos)
    }
}

impl Reader for FileReader {
    fn try_clone_independent(&self) -> Result<Self> {
        FileReader::try_open_existing(self.path.clone())
    }
}

// FileWriter

pub struct FileWriter {
    file: BufWriter<File>,
    path: PathBuf,
}

impl FileWriter {
    pub fn try_create_non_existing(path: PathBuf) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        let file = BufWriter::new(file);
        Ok(Self { file, path })
    }
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

impl Seek for FileWriter {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.file.seek(pos)
    }
}

impl Writer for FileWriter {
    type PairedReader = FileReader;
    fn try_into_reader(self) -> Result<Self::PairedReader> {
        let Self { mut file, path } = self;
        // Make extra sure we've flushed-and-closed before
        // opening to read.
        file.flush()?;
        let file = file.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);
        FileReader::try_open_existing(path)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn test_le_round_trip_through_mem_pair() {
        let mut w = MemWriter::new();
        w.write_le_num(0x1234_u16).unwrap();
        w.write_le_num(-7_i32).unwrap();
        w.write_byte_slice(b"yon").unwrap();

        let mut r = w.try_into_reader().unwrap();
        assert_eq!(r.read_le_num::<u16>().unwrap(), 0x1234);
        assert_eq!(r.read_le_num::<i32>().unwrap(), -7);
        assert_eq!(&r.read_byte_vec(3).unwrap(), b"yon");
    }

    #[test]
    fn test_short_read_is_truncation() {
        let mut r = MemReader::from(vec![1, 2]);
        let e = r.read_le_num::<u32>().unwrap_err();
        assert_eq!(e.kind(), crate::ErrorKind::Truncation);
    }
}
