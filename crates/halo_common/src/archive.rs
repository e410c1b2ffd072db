//! Minimal streaming ZIP reader
//!
//! Reads the central directory, then extracts entries one at a time through
//! a fixed-size buffer. Supports STORED and DEFLATED entries; no ZIP64, no
//! encryption, no multi-disk archives. Every entry's CRC-32 and size are
//! checked after extraction.

use flate2::read::DeflateDecoder;
use flate2::Crc;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::coop::Cooperative;
use crate::error::ArchiveError;
use crate::layout::is_hidden_path;

const EOCD_SIGNATURE: u32 = 0x0605_4b50;
const CENTRAL_SIGNATURE: u32 = 0x0201_4b50;
const LOCAL_SIGNATURE: u32 = 0x0403_4b50;

const EOCD_LEN: usize = 22;
const CENTRAL_LEN: usize = 46;
const LOCAL_LEN: usize = 30;
const MAX_COMMENT: usize = 0xFFFF;

pub const METHOD_STORED: u16 = 0;
pub const METHOD_DEFLATED: u16 = 8;

const FLAG_ENCRYPTED: u16 = 0x0001;

const COPY_BUFFER: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntry {
    pub name: String,
    pub method: u16,
    pub flags: u16,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub local_header_offset: u64,
}

impl ZipEntry {
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub extracted: usize,
    pub skipped_hidden: usize,
    pub bytes: u64,
}

pub struct ZipArchive<R> {
    reader: R,
    entries: Vec<ZipEntry>,
}

fn le16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn le32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn format_err(msg: impl Into<String>) -> ArchiveError {
    ArchiveError::Format(msg.into())
}

/// Map a truncated read to a format error; the archive is short, not the disk.
fn read_exact_or_format<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> Result<(), ArchiveError> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            format_err(format!("truncated {}", what))
        } else {
            ArchiveError::Io(e)
        }
    })
}

impl ZipArchive<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        Self::new(BufReader::new(File::open(path)?))
    }
}

impl<R: Read + Seek> ZipArchive<R> {
    pub fn new(mut reader: R) -> Result<Self, ArchiveError> {
        let entries = read_central_directory(&mut reader)?;
        Ok(Self { reader, entries })
    }

    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    /// Extract every non-hidden entry under `dest`, yielding after each one.
    pub fn extract_all(
        &mut self,
        dest: &Path,
        coop: &dyn Cooperative,
    ) -> Result<ExtractSummary, ArchiveError> {
        fs::create_dir_all(dest)?;
        let mut summary = ExtractSummary::default();
        let total = self.entries.len();

        for idx in 0..total {
            let entry = self.entries[idx].clone();
            if is_hidden_path(&entry.name) {
                debug!("Skipping hidden entry {}", entry.name);
                summary.skipped_hidden += 1;
                continue;
            }
            summary.bytes += self.extract_entry(&entry, dest)?;
            summary.extracted += 1;
            coop.progress("extracting", crate::coop::percent((idx + 1) as u64, Some(total as u64)));
            coop.yield_now();
        }

        Ok(summary)
    }

    /// Extract one entry; returns bytes written.
    pub fn extract_entry(&mut self, entry: &ZipEntry, dest: &Path) -> Result<u64, ArchiveError> {
        let target = safe_join(dest, &entry.name)?;
        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            return Ok(0);
        }
        if entry.flags & FLAG_ENCRYPTED != 0 {
            return Err(format_err(format!("encrypted entry {}", entry.name)));
        }

        let data_offset = self.data_offset(entry)?;
        self.reader.seek(SeekFrom::Start(data_offset))?;
        let raw = (&mut self.reader).take(entry.compressed_size);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;

        let limit = entry.uncompressed_size;
        let copied = match entry.method {
            METHOD_STORED => copy_with_crc(raw, &mut out, &entry.name, limit),
            METHOD_DEFLATED => copy_with_crc(DeflateDecoder::new(raw), &mut out, &entry.name, limit),
            method => Err(ArchiveError::UnsupportedCompression {
                name: entry.name.clone(),
                method,
            }),
        };
        let (written, crc) = match copied {
            Ok(copied) => copied,
            Err(e) => {
                drop(out);
                let _ = fs::remove_file(&target);
                return Err(e);
            }
        };
        out.sync_all()?;

        if written != entry.uncompressed_size || crc != entry.crc32 {
            return Err(ArchiveError::Crc(entry.name.clone()));
        }
        Ok(written)
    }

    fn data_offset(&mut self, entry: &ZipEntry) -> Result<u64, ArchiveError> {
        self.reader.seek(SeekFrom::Start(entry.local_header_offset))?;
        let mut header = [0u8; LOCAL_LEN];
        read_exact_or_format(&mut self.reader, &mut header, "local header")?;
        if le32(&header, 0) != LOCAL_SIGNATURE {
            return Err(format_err(format!("bad local header for {}", entry.name)));
        }
        let name_len = le16(&header, 26) as u64;
        let extra_len = le16(&header, 28) as u64;
        Ok(entry.local_header_offset + LOCAL_LEN as u64 + name_len + extra_len)
    }
}

/// Copy at most `limit` bytes; anything beyond fails before it reaches disk.
fn copy_with_crc<R: Read>(
    src: R,
    dst: &mut File,
    name: &str,
    limit: u64,
) -> Result<(u64, u32), ArchiveError> {
    let mut src = src.take(limit.saturating_add(1));
    let mut crc = Crc::new();
    let mut buffer = [0u8; COPY_BUFFER];
    let mut written = 0u64;
    loop {
        let n = match src.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::InvalidInput || e.kind() == io::ErrorKind::InvalidData => {
                return Err(format_err(format!("corrupt deflate stream: {}", e)))
            }
            Err(e) => return Err(e.into()),
        };
        if written + n as u64 > limit {
            return Err(format_err(format!(
                "{} inflates past its stated size of {} bytes",
                name, limit
            )));
        }
        dst.write_all(&buffer[..n])?;
        crc.update(&buffer[..n]);
        written += n as u64;
    }
    Ok((written, crc.sum()))
}

fn read_central_directory<R: Read + Seek>(reader: &mut R) -> Result<Vec<ZipEntry>, ArchiveError> {
    let file_len = reader.seek(SeekFrom::End(0))?;
    if file_len < EOCD_LEN as u64 {
        return Err(format_err("file too small"));
    }

    let tail_len = (file_len as usize).min(EOCD_LEN + MAX_COMMENT);
    reader.seek(SeekFrom::Start(file_len - tail_len as u64))?;
    let mut tail = vec![0u8; tail_len];
    read_exact_or_format(reader, &mut tail, "end of central directory")?;

    let eocd_at = (0..=tail_len - EOCD_LEN)
        .rev()
        .find(|&i| le32(&tail, i) == EOCD_SIGNATURE)
        .ok_or_else(|| format_err("end of central directory not found"))?;
    let eocd = &tail[eocd_at..];

    let entry_count = le16(eocd, 10) as usize;
    let cd_size = le32(eocd, 12) as u64;
    let cd_offset = le32(eocd, 16) as u64;
    if cd_offset == 0xFFFF_FFFF || entry_count == 0xFFFF {
        return Err(format_err("ZIP64 archives are not supported"));
    }
    if cd_offset + cd_size > file_len {
        return Err(format_err("central directory out of bounds"));
    }

    reader.seek(SeekFrom::Start(cd_offset))?;
    let mut entries = Vec::with_capacity(entry_count);
    let mut fixed = [0u8; CENTRAL_LEN];
    for _ in 0..entry_count {
        read_exact_or_format(reader, &mut fixed, "central directory")?;
        if le32(&fixed, 0) != CENTRAL_SIGNATURE {
            return Err(format_err("bad central directory entry"));
        }

        let name_len = le16(&fixed, 28) as usize;
        let extra_len = le16(&fixed, 30) as i64;
        let comment_len = le16(&fixed, 32) as i64;

        let mut name = vec![0u8; name_len];
        read_exact_or_format(reader, &mut name, "entry name")?;
        reader.seek(SeekFrom::Current(extra_len + comment_len))?;

        let name = String::from_utf8_lossy(&name).replace('\\', "/");
        entries.push(ZipEntry {
            name,
            flags: le16(&fixed, 8),
            method: le16(&fixed, 10),
            crc32: le32(&fixed, 16),
            compressed_size: le32(&fixed, 20) as u64,
            uncompressed_size: le32(&fixed, 24) as u64,
            local_header_offset: le32(&fixed, 42) as u64,
        });
    }

    Ok(entries)
}

/// Join an archive path onto `base`, rejecting anything that would escape it.
pub fn safe_join(base: &Path, name: &str) -> Result<PathBuf, ArchiveError> {
    let unsafe_path = || ArchiveError::UnsafePath(name.to_string());
    if name.is_empty() || name.starts_with('/') || name.contains(':') {
        return Err(unsafe_path());
    }

    let mut out = base.to_path_buf();
    for part in name.split('/') {
        match part {
            "" | "." => continue,
            ".." => return Err(unsafe_path()),
            p => out.push(p),
        }
    }
    if out == base {
        return Err(unsafe_path());
    }
    Ok(out)
}
