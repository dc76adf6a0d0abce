//! In-memory archive builders for tests

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::io::{Cursor, Write};

/// Zip archive with the given `(name, content)` entries; names ending in
/// `/` become directory entries
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (name, content) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

/// CRC-16/ARC as used by LHA
fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0u16;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0xA001 } else { crc >> 1 };
        }
    }
    crc
}

/// Level-0 LZH archive with stored (`-lh0-`) members
pub fn lzh_bytes(entries: &[(&[u8], &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, content) in entries {
        let mut header = Vec::new();
        header.extend_from_slice(b"-lh0-");
        header.extend_from_slice(&(content.len() as u32).to_le_bytes());
        header.extend_from_slice(&(content.len() as u32).to_le_bytes());
        // 2024-06-01 00:00:00 in MS-DOS format
        header.extend_from_slice(&(22721u32 << 16).to_le_bytes());
        header.push(0x20);
        header.push(0);
        header.push(name.len() as u8);
        header.extend_from_slice(name);
        header.extend_from_slice(&crc16(content).to_le_bytes());

        let checksum = header.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        out.push(header.len() as u8);
        out.push(checksum);
        out.extend_from_slice(&header);
        out.extend_from_slice(content);
    }
    out.push(0);
    out
}
