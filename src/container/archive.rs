//! Container Archive
//!
//! Opens, creates, appends to and extracts from a single container file.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, ZixError};

use super::directory;
use super::{
    le_u16, le_u32, le_u64, CompressionMode, ContainerEntry, FOOTER_SIZE, HEADER_SIZE,
    LOCAL_HEADER_SIZE, MAGIC, VERSION,
};

/// Copy buffer size for streaming entry data
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// An open container file with its central directory loaded in memory
pub struct Container {
    /// Path of the container file
    path: PathBuf,
    /// File handle (read-only or read/write)
    file: File,
    /// Whether entries may be appended through this handle
    writable: bool,
    /// Comment stored in the header
    comment: String,
    /// Central directory, in append order
    entries: Vec<ContainerEntry>,
    /// Where the directory block starts (= end of the entry section)
    dir_offset: u64,
}

impl Container {
    /// Create a new, empty container (truncating any existing file)
    ///
    /// Writes the header plus an empty directory and syncs, so the file is a
    /// valid container as soon as this returns.
    pub fn create(path: &Path, comment: &str) -> Result<Self> {
        if comment.len() > u16::MAX as usize {
            return Err(ZixError::Container(format!(
                "Container comment too long: {} bytes",
                comment.len()
            )));
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let mut header = Vec::with_capacity(HEADER_SIZE as usize + comment.len());
        header.extend_from_slice(MAGIC);
        header.extend_from_slice(&VERSION.to_le_bytes());
        header.extend_from_slice(&(comment.len() as u16).to_le_bytes());
        header.extend_from_slice(comment.as_bytes());
        file.write_all(&header)?;

        let dir_offset = header.len() as u64;
        write_directory(&mut file, dir_offset, &[])?;
        file.sync_all()?;

        debug!(path = %path.display(), "created container");

        Ok(Self {
            path: path.to_path_buf(),
            file,
            writable: true,
            comment: comment.to_string(),
            entries: Vec::new(),
            dir_offset,
        })
    }

    /// Open an existing container for reading and appending
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::load(path, file, true)
    }

    /// Open an existing container read-only
    ///
    /// Never modifies the file, so it is safe to use on sealed lots and
    /// alongside the engine's writer.
    pub fn open_read(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::load(path, file, false)
    }

    /// Open a container whose footer or directory is damaged, rebuilding the
    /// directory from the entries' local headers
    ///
    /// Entries are kept up to the first one that is incomplete or fails its
    /// CRC. Everything after it is cut off and a fresh directory is written.
    pub fn repair(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let file_size = file.metadata()?.len();
        let (comment, data_start) = read_header(&mut file, path, file_size)?;

        let mut entries = Vec::new();
        let mut end = data_start;
        while let Some((entry, next)) = scan_entry(&mut file, end, file_size)? {
            entries.push(entry);
            end = next;
        }

        warn!(
            path = %path.display(),
            entries = entries.len(),
            dropped_bytes = file_size.saturating_sub(end),
            "rebuilt container directory"
        );

        write_directory(&mut file, end, &entries)?;
        file.sync_all()?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            writable: true,
            comment,
            entries,
            dir_offset: end,
        })
    }

    fn load(path: &Path, mut file: File, writable: bool) -> Result<Self> {
        let file_size = file.metadata()?.len();
        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(ZixError::Container(format!(
                "{} is too small to be a container ({} bytes)",
                path.display(),
                file_size
            )));
        }

        let (comment, data_start) = read_header(&mut file, path, file_size)?;

        // Read footer to locate the directory
        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer)?;
        let footer = directory::decode_footer(&footer)?;

        let dir_end = file_size - FOOTER_SIZE;
        if footer.dir_offset < data_start || footer.dir_offset > dir_end {
            return Err(ZixError::Container(format!(
                "Directory offset {} out of range in {}",
                footer.dir_offset,
                path.display()
            )));
        }

        // Load directory into memory
        file.seek(SeekFrom::Start(footer.dir_offset))?;
        let mut dir_data = vec![0u8; (dir_end - footer.dir_offset) as usize];
        file.read_exact(&mut dir_data)?;
        let entries = directory::decode_entries(&dir_data, &footer)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            writable,
            comment,
            entries,
            dir_offset: footer.dir_offset,
        })
    }

    /// Append a named entry, streaming its bytes from `source`
    ///
    /// On failure the previous directory is written back so the container
    /// stays readable with its old entries.
    pub fn append_entry<R: Read>(
        &mut self,
        mode: CompressionMode,
        source: &mut R,
        name: &str,
        comment: &str,
    ) -> Result<ContainerEntry> {
        if !self.writable {
            return Err(ZixError::Container(format!(
                "{} was opened read-only",
                self.path.display()
            )));
        }
        if name.is_empty() || name.len() > u16::MAX as usize {
            return Err(ZixError::Container(format!(
                "Entry name length {} out of range",
                name.len()
            )));
        }
        if comment.len() > u16::MAX as usize {
            return Err(ZixError::Container(format!(
                "Entry comment too long: {} bytes",
                comment.len()
            )));
        }

        let start = self.dir_offset;
        let result = write_entry(&mut self.file, start, mode, source, name, comment)
            .and_then(|(entry, end)| {
                let mut entries = self.entries.clone();
                entries.push(entry.clone());
                write_directory(&mut self.file, end, &entries)?;
                Ok((entry, end, entries))
            });

        match result {
            Ok((entry, end, entries)) => {
                self.entries = entries;
                self.dir_offset = end;
                debug!(
                    path = %self.path.display(),
                    entry = %entry.name,
                    bytes = entry.data_len,
                    "appended entry"
                );
                Ok(entry)
            }
            Err(e) => {
                if let Err(restore) = write_directory(&mut self.file, start, &self.entries) {
                    warn!(
                        path = %self.path.display(),
                        error = %restore,
                        "failed to restore container directory after append error"
                    );
                }
                Err(e)
            }
        }
    }

    /// Append the contents of the file at `source_path`
    pub fn append_file(
        &mut self,
        mode: CompressionMode,
        source_path: &Path,
        name: &str,
        comment: &str,
    ) -> Result<ContainerEntry> {
        let mut source = BufReader::new(File::open(source_path)?);
        self.append_entry(mode, &mut source, name, comment)
    }

    /// Drop the most recently appended entry
    ///
    /// `entry` must be the last entry; its bytes are cut off and the
    /// directory is rewritten without it.
    pub fn discard_last_entry(&mut self, entry: &ContainerEntry) -> Result<()> {
        if !self.writable {
            return Err(ZixError::Container(format!(
                "{} was opened read-only",
                self.path.display()
            )));
        }
        if self.entries.last() != Some(entry) {
            return Err(ZixError::Container(format!(
                "'{}' is not the last entry of {}",
                entry.name,
                self.path.display()
            )));
        }

        let mut entries = self.entries.clone();
        entries.pop();
        write_directory(&mut self.file, entry.offset, &entries)?;
        self.entries = entries;
        self.dir_offset = entry.offset;

        debug!(path = %self.path.display(), entry = %entry.name, "discarded entry");
        Ok(())
    }

    /// All entries, in the order they were appended
    pub fn entries(&self) -> &[ContainerEntry] {
        &self.entries
    }

    /// First entry whose name equals `name`
    pub fn find(&self, name: &str) -> Option<&ContainerEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Extract an entry's bytes into `sink`, returning the byte count
    ///
    /// The CRC is verified after the copy; on a mismatch `sink` has already
    /// received the (bad) bytes and an error is returned.
    pub fn extract<W: Write>(&mut self, entry: &ContainerEntry, sink: &mut W) -> Result<u64> {
        self.file.seek(SeekFrom::Start(entry.offset))?;

        let mut header = [0u8; LOCAL_HEADER_SIZE as usize];
        self.file.read_exact(&mut header)?;

        let mode = CompressionMode::try_from(header[0])?;
        let name_len = le_u16(&header[1..3]) as usize;
        let comment_len = le_u16(&header[3..5]) as i64;
        let data_len = le_u64(&header[5..13]);
        let crc = le_u32(&header[13..17]);

        if mode != entry.mode || data_len != entry.data_len || crc != entry.crc {
            return Err(ZixError::Container(format!(
                "Entry header for '{}' disagrees with directory",
                entry.name
            )));
        }

        let mut name = vec![0u8; name_len];
        self.file.read_exact(&mut name)?;
        if name != entry.name.as_bytes() {
            return Err(ZixError::Container(format!(
                "Entry at offset {} is not '{}'",
                entry.offset, entry.name
            )));
        }
        self.file.seek(SeekFrom::Current(comment_len))?;

        let mut hasher = crc32fast::Hasher::new();
        let mut remaining = (&mut self.file).take(data_len);
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut copied = 0u64;
        loop {
            let n = remaining.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            sink.write_all(&buf[..n])?;
            copied += n as u64;
        }

        if copied != data_len {
            return Err(ZixError::Container(format!(
                "Entry '{}' truncated: expected {} bytes, read {}",
                entry.name, data_len, copied
            )));
        }
        let actual = hasher.finalize();
        if actual != crc {
            return Err(ZixError::Container(format!(
                "CRC mismatch for entry '{}': expected {:08x}, got {:08x}",
                entry.name, crc, actual
            )));
        }

        Ok(copied)
    }

    /// Current size of the container file on disk
    pub fn size(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Path of the container file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Header comment
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Flush appended entries to disk
    pub fn sync(&mut self) -> Result<()> {
        if self.writable {
            self.file.flush()?;
            self.file.sync_all()?;
        }
        Ok(())
    }

    /// Flush and close the container
    pub fn close(mut self) -> Result<()> {
        self.sync()
    }
}

/// Read and validate the header; returns the comment and where entries start
fn read_header(file: &mut File, path: &Path, file_size: u64) -> Result<(String, u64)> {
    if file_size < HEADER_SIZE {
        return Err(ZixError::Container(format!(
            "{} is too small to be a container ({} bytes)",
            path.display(),
            file_size
        )));
    }

    file.seek(SeekFrom::Start(0))?;
    let mut header = [0u8; HEADER_SIZE as usize];
    file.read_exact(&mut header)?;

    if &header[0..4] != MAGIC {
        return Err(ZixError::Container(format!(
            "Invalid container magic in {}: {:?}",
            path.display(),
            &header[0..4]
        )));
    }

    let version = le_u16(&header[4..6]);
    if version != VERSION {
        return Err(ZixError::Container(format!(
            "Unsupported container version: {}",
            version
        )));
    }

    let comment_len = le_u16(&header[6..8]) as u64;
    if HEADER_SIZE + comment_len > file_size {
        return Err(ZixError::Container(format!(
            "Header comment of {} runs past the end of the file",
            path.display()
        )));
    }
    let mut comment = vec![0u8; comment_len as usize];
    file.read_exact(&mut comment)?;
    let comment = String::from_utf8_lossy(&comment).into_owned();

    Ok((comment, HEADER_SIZE + comment_len))
}

/// Decode the entry whose local header starts at `pos`
///
/// Returns `None` when no complete entry with a matching CRC starts there.
fn scan_entry(file: &mut File, pos: u64, file_size: u64) -> Result<Option<(ContainerEntry, u64)>> {
    if pos + LOCAL_HEADER_SIZE > file_size {
        return Ok(None);
    }
    file.seek(SeekFrom::Start(pos))?;
    let mut header = [0u8; LOCAL_HEADER_SIZE as usize];
    file.read_exact(&mut header)?;

    let mode = match CompressionMode::try_from(header[0]) {
        Ok(mode) => mode,
        Err(_) => return Ok(None),
    };
    let name_len = le_u16(&header[1..3]) as u64;
    let comment_len = le_u16(&header[3..5]) as u64;
    let data_len = le_u64(&header[5..13]);
    let crc = le_u32(&header[13..17]);

    let data_start = pos + LOCAL_HEADER_SIZE + name_len + comment_len;
    let end = match data_start.checked_add(data_len) {
        Some(end) if name_len > 0 && end <= file_size => end,
        _ => return Ok(None),
    };

    let mut name = vec![0u8; name_len as usize];
    file.read_exact(&mut name)?;
    let name = match String::from_utf8(name) {
        Ok(name) => name,
        Err(_) => return Ok(None),
    };
    file.seek(SeekFrom::Start(data_start))?;

    let mut hasher = crc32fast::Hasher::new();
    let mut remaining = (&mut *file).take(data_len);
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    loop {
        let n = remaining.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    if hasher.finalize() != crc {
        return Ok(None);
    }

    Ok(Some((
        ContainerEntry {
            name,
            offset: pos,
            data_len,
            crc,
            mode,
        },
        end,
    )))
}

/// Write one entry at `start`; returns the directory record and the end offset
fn write_entry<R: Read>(
    file: &mut File,
    start: u64,
    mode: CompressionMode,
    source: &mut R,
    name: &str,
    comment: &str,
) -> Result<(ContainerEntry, u64)> {
    file.seek(SeekFrom::Start(start))?;

    let mut hasher = crc32fast::Hasher::new();
    let mut data_len = 0u64;
    {
        let mut writer = BufWriter::new(&mut *file);

        // Local header (data_len and crc are placeholders, patched below).
        // The placeholder CRC never matches an empty entry, so `repair`
        // rejects an entry whose header was never patched.
        writer.write_all(&[mode as u8])?;
        writer.write_all(&(name.len() as u16).to_le_bytes())?;
        writer.write_all(&(comment.len() as u16).to_le_bytes())?;
        writer.write_all(&0u64.to_le_bytes())?;
        writer.write_all(&u32::MAX.to_le_bytes())?;
        writer.write_all(name.as_bytes())?;
        writer.write_all(comment.as_bytes())?;

        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        loop {
            let n = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            hasher.update(&buf[..n]);
            writer.write_all(&buf[..n])?;
            data_len += n as u64;
        }

        writer.flush()?;
    }
    let crc = hasher.finalize();

    // Seek back and patch data_len + crc (after mode + name_len + comment_len)
    file.seek(SeekFrom::Start(start + 5))?;
    file.write_all(&data_len.to_le_bytes())?;
    file.write_all(&crc.to_le_bytes())?;

    let end = start + LOCAL_HEADER_SIZE + name.len() as u64 + comment.len() as u64 + data_len;

    Ok((
        ContainerEntry {
            name: name.to_string(),
            offset: start,
            data_len,
            crc,
            mode,
        },
        end,
    ))
}

/// Write the directory and footer at `dir_offset` and cut the file after them
fn write_directory(file: &mut File, dir_offset: u64, entries: &[ContainerEntry]) -> Result<()> {
    let block = directory::encode(entries, dir_offset);
    file.seek(SeekFrom::Start(dir_offset))?;
    file.write_all(&block)?;
    file.set_len(dir_offset + block.len() as u64)?;
    file.flush()?;
    Ok(())
}
