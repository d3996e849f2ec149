//! Central Directory
//!
//! Encodes and decodes the directory block and footer at the tail of a
//! container file.

use crate::error::{Result, ZixError};

use super::{
    le_u16, le_u32, le_u64, CompressionMode, ContainerEntry, DIR_RECORD_SIZE, END_MAGIC,
    FOOTER_SIZE,
};

/// Decoded footer
#[derive(Debug, Clone, Copy)]
pub(crate) struct Footer {
    pub dir_offset: u64,
    pub entry_count: u32,
    pub dir_crc: u32,
}

/// Encode the directory block followed by the footer
pub(crate) fn encode(entries: &[ContainerEntry], dir_offset: u64) -> Vec<u8> {
    let mut buf = Vec::new();

    // [offset(8)][data_len(8)][crc(4)][mode(1)][name_len(2)][name] for each entry
    for entry in entries {
        buf.extend_from_slice(&entry.offset.to_le_bytes());
        buf.extend_from_slice(&entry.data_len.to_le_bytes());
        buf.extend_from_slice(&entry.crc.to_le_bytes());
        buf.push(entry.mode as u8);
        buf.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
        buf.extend_from_slice(entry.name.as_bytes());
    }

    let dir_crc = crc32fast::hash(&buf);

    buf.extend_from_slice(&dir_offset.to_le_bytes());
    buf.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    buf.extend_from_slice(&dir_crc.to_le_bytes());
    buf.extend_from_slice(END_MAGIC);
    buf.extend_from_slice(&[0u8; 4]);

    buf
}

/// Decode a footer read from the last `FOOTER_SIZE` bytes of a file
pub(crate) fn decode_footer(footer: &[u8]) -> Result<Footer> {
    if footer.len() != FOOTER_SIZE as usize {
        return Err(ZixError::Container(format!(
            "Footer must be {} bytes, got {}",
            FOOTER_SIZE,
            footer.len()
        )));
    }
    if &footer[16..20] != END_MAGIC {
        return Err(ZixError::Container(format!(
            "Invalid container footer magic: {:?}",
            &footer[16..20]
        )));
    }

    Ok(Footer {
        dir_offset: le_u64(&footer[0..8]),
        entry_count: le_u32(&footer[8..12]),
        dir_crc: le_u32(&footer[12..16]),
    })
}

/// Decode and validate the directory block
pub(crate) fn decode_entries(data: &[u8], footer: &Footer) -> Result<Vec<ContainerEntry>> {
    let actual_crc = crc32fast::hash(data);
    if actual_crc != footer.dir_crc {
        return Err(ZixError::Container(format!(
            "Directory CRC mismatch: expected {:08x}, got {:08x}",
            footer.dir_crc, actual_crc
        )));
    }

    let mut entries = Vec::with_capacity(footer.entry_count as usize);
    let mut pos = 0;

    while pos < data.len() {
        if pos + DIR_RECORD_SIZE > data.len() {
            return Err(ZixError::Container(
                "Truncated directory record".to_string(),
            ));
        }
        let offset = le_u64(&data[pos..pos + 8]);
        let data_len = le_u64(&data[pos + 8..pos + 16]);
        let crc = le_u32(&data[pos + 16..pos + 20]);
        let mode = CompressionMode::try_from(data[pos + 20])?;
        let name_len = le_u16(&data[pos + 21..pos + 23]) as usize;
        pos += DIR_RECORD_SIZE;

        if pos + name_len > data.len() {
            return Err(ZixError::Container(
                "Truncated directory entry name".to_string(),
            ));
        }
        let name = String::from_utf8(data[pos..pos + name_len].to_vec()).map_err(|e| {
            ZixError::Container(format!("Entry name is not valid UTF-8: {}", e))
        })?;
        pos += name_len;

        entries.push(ContainerEntry {
            name,
            offset,
            data_len,
            crc,
            mode,
        });
    }

    if entries.len() != footer.entry_count as usize {
        return Err(ZixError::Container(format!(
            "Directory lists {} entries, footer claims {}",
            entries.len(),
            footer.entry_count
        )));
    }

    Ok(entries)
}
