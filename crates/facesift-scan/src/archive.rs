//! ZIP archive of matched photos.
//!
//! Entries are deflate-compressed and named by their 1-based position in
//! the matched sequence (`photo_001.jpg`, `photo_002.jpg`, ...). The writer
//! streams local entries first and the central directory last, so any
//! `io::Write` sink works; only Zip32 is produced.

use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};
use std::io::{self, Write};
use thiserror::Error;

/// Download name the archive is served under.
pub const ARCHIVE_FILE_NAME: &str = "yourphotos.zip";
/// MIME type of the archive.
pub const ARCHIVE_MIME_TYPE: &str = "application/zip";

const SIG_LOCAL_HEADER: u32 = 0x0403_4b50;
const SIG_CENTRAL_HEADER: u32 = 0x0201_4b50;
const SIG_END_OF_CENTRAL_DIR: u32 = 0x0605_4b50;
const VERSION_NEEDED: u16 = 20;
const METHOD_DEFLATE: u16 = 8;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("archive write failed: {0}")]
    Io(#[from] io::Error),
    #[error("archive cannot hold {0} entries")]
    TooManyEntries(usize),
    #[error("entry {0} exceeds the 4 GiB zip32 limit")]
    EntryTooLarge(String),
}

/// Name of the entry at 1-based `position`.
pub fn entry_name(position: usize) -> String {
    format!("photo_{position:03}.jpg")
}

/// Build an in-memory archive of `payloads`, stamped with the current local time.
pub fn build_archive<P: AsRef<[u8]>>(payloads: &[P]) -> Result<Vec<u8>, ArchiveError> {
    ArchiveBuilder::new().build(payloads)
}

/// Writes photo archives.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveBuilder {
    modified: NaiveDateTime,
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Central directory record kept while entries are streamed.
struct CentralRecord {
    name: String,
    crc: u32,
    compressed_size: u32,
    size: u32,
    offset: u32,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::with_timestamp(Local::now().naive_local())
    }

    /// Use a fixed modification time for every entry.
    pub fn with_timestamp(modified: NaiveDateTime) -> Self {
        Self { modified }
    }

    pub fn build<P: AsRef<[u8]>>(&self, payloads: &[P]) -> Result<Vec<u8>, ArchiveError> {
        self.write_to(Vec::new(), payloads)
    }

    /// Stream the archive into `out`, returning the sink when done.
    pub fn write_to<W: Write, P: AsRef<[u8]>>(&self, out: W, payloads: &[P]) -> Result<W, ArchiveError> {
        let entry_count =
            u16::try_from(payloads.len()).map_err(|_| ArchiveError::TooManyEntries(payloads.len()))?;
        let (time, date) = dos_datetime(&self.modified);

        let mut out = CountingWriter { inner: out, written: 0 };
        let mut records = Vec::with_capacity(payloads.len());

        for (i, payload) in payloads.iter().enumerate() {
            let payload = payload.as_ref();
            let name = entry_name(i + 1);

            let mut crc = Crc::new();
            crc.update(payload);

            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(payload)?;
            let compressed = encoder.finish()?;

            let too_large = || ArchiveError::EntryTooLarge(name.clone());
            let record = CentralRecord {
                crc: crc.sum(),
                compressed_size: u32::try_from(compressed.len()).map_err(|_| too_large())?,
                size: u32::try_from(payload.len()).map_err(|_| too_large())?,
                offset: u32::try_from(out.written).map_err(|_| too_large())?,
                name,
            };

            out.put_u32(SIG_LOCAL_HEADER)?;
            out.put_u16(VERSION_NEEDED)?;
            out.put_u16(0)?; // flags
            out.put_u16(METHOD_DEFLATE)?;
            out.put_u16(time)?;
            out.put_u16(date)?;
            out.put_u32(record.crc)?;
            out.put_u32(record.compressed_size)?;
            out.put_u32(record.size)?;
            out.put_u16(record.name.len() as u16)?;
            out.put_u16(0)?; // extra field length
            out.write_all(record.name.as_bytes())?;
            out.write_all(&compressed)?;

            tracing::debug!(entry = %record.name, size = record.size, compressed = record.compressed_size, "archived photo");
            records.push(record);
        }

        let central_start = out.written;
        for record in &records {
            out.put_u32(SIG_CENTRAL_HEADER)?;
            out.put_u16(VERSION_NEEDED)?; // made by: MS-DOS, 2.0
            out.put_u16(VERSION_NEEDED)?;
            out.put_u16(0)?; // flags
            out.put_u16(METHOD_DEFLATE)?;
            out.put_u16(time)?;
            out.put_u16(date)?;
            out.put_u32(record.crc)?;
            out.put_u32(record.compressed_size)?;
            out.put_u32(record.size)?;
            out.put_u16(record.name.len() as u16)?;
            out.put_u16(0)?; // extra field length
            out.put_u16(0)?; // comment length
            out.put_u16(0)?; // disk number
            out.put_u16(0)?; // internal attributes
            out.put_u32(0)?; // external attributes
            out.put_u32(record.offset)?;
            out.write_all(record.name.as_bytes())?;
        }
        let central_size = out.written - central_start;

        let too_large = || ArchiveError::EntryTooLarge("central directory".to_string());
        out.put_u32(SIG_END_OF_CENTRAL_DIR)?;
        out.put_u16(0)?; // this disk
        out.put_u16(0)?; // disk with central directory
        out.put_u16(entry_count)?;
        out.put_u16(entry_count)?;
        out.put_u32(u32::try_from(central_size).map_err(|_| too_large())?)?;
        out.put_u32(u32::try_from(central_start).map_err(|_| too_large())?)?;
        out.put_u16(0)?; // comment length

        out.flush()?;
        tracing::info!(entries = records.len(), bytes = out.written, "archive built");
        Ok(out.inner)
    }
}

/// MS-DOS (time, date) pair; years outside 1980–2107 are clamped.
fn dos_datetime(dt: &NaiveDateTime) -> (u16, u16) {
    let year = dt.year().clamp(1980, 2107) as u16;
    let time = ((dt.hour() as u16) << 11) | ((dt.minute() as u16) << 5) | (dt.second() as u16 / 2);
    let date = ((year - 1980) << 9) | ((dt.month() as u16) << 5) | dt.day() as u16;
    (time, date)
}

/// Tracks how many bytes have gone through, for entry offsets.
struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W: Write> CountingWriter<W> {
    fn put_u16(&mut self, v: u16) -> io::Result<()> {
        self.write_all(&v.to_le_bytes())
    }

    fn put_u32(&mut self, v: u32) -> io::Result<()> {
        self.write_all(&v.to_le_bytes())
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}


#[cfg(test)]
mod tests {
    use super::reader::read_entries;
    use super::*;
    use chrono::NaiveDate;

    fn fixed_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap().and_hms_opt(13, 45, 30).unwrap()
    }

    #[test]
    fn test_entry_names_are_zero_padded() {
        assert_eq!(entry_name(1), "photo_001.jpg");
        assert_eq!(entry_name(42), "photo_042.jpg");
        assert_eq!(entry_name(1000), "photo_1000.jpg");
    }

    #[test]
    fn test_two_payloads_roundtrip_in_order() {
        let b1 = b"\xff\xd8first photo".to_vec();
        let b2 = vec![7u8; 10_000];
        let zip = ArchiveBuilder::with_timestamp(fixed_time()).build(&[b1.clone(), b2.clone()]).unwrap();

        let entries = read_entries(&zip);
        let names: Vec<&str> = entries.iter().map(|e| e.0.as_str()).collect();
        assert_eq!(names, ["photo_001.jpg", "photo_002.jpg"]);
        assert_eq!(entries[0].1, b1);
        assert_eq!(entries[1].1, b2);
    }

    #[test]
    fn test_repetitive_payload_is_compressed() {
        let zip = build_archive(&[vec![0u8; 64 * 1024]]).unwrap();
        assert!(zip.len() < 4 * 1024, "archive is {} bytes", zip.len());
    }

    #[test]
    fn test_empty_archive_is_valid() {
        let zip = build_archive::<Vec<u8>>(&[]).unwrap();
        assert_eq!(zip.len(), 22);
        assert!(read_entries(&zip).is_empty());
    }

    #[test]
    fn test_dos_timestamp_written() {
        let zip = ArchiveBuilder::with_timestamp(fixed_time()).build(&[b"x"]).unwrap();
        let entries = read_entries(&zip);
        let (_, _, time, date) = entries[0];
        assert_eq!(time, (13 << 11) | (45 << 5) | 15);
        assert_eq!(date, ((2024 - 1980) << 9) | (6 << 5) | 15);
    }

    #[test]
    fn test_dos_timestamp_clamps_old_years() {
        let old = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let (_, date) = dos_datetime(&old);
        assert_eq!(date >> 9, 0);
    }

    #[test]
    fn test_write_failure_is_reported() {
        #[derive(Debug)]
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let err = ArchiveBuilder::new().write_to(Broken, &[b"photo"]).unwrap_err();
        assert!(matches!(err, ArchiveError::Io(_)), "{err:?}");
    }
}
