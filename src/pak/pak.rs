//! Quake pack-file reader.
//!
//! ### Supported files
//! * **PAK** – id Software's archive format: a header, a blob of file
//!   contents and a directory of 64-byte entries.
//!
//! The entire pack is read into memory once; file requests are slice
//! operations into the backing buffer.

use std::collections::HashMap;

use byteorder::{LittleEndian as LE, ReadBytesExt};
use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    path::Path,
};
use thiserror::Error;

/// Size (in bytes) of one directory entry: 56-byte name + offset + length.
const DIR_ENTRY_SIZE: usize = 64;

/// Metadata for a single file inside the pack.
#[derive(Clone, Debug)]
pub struct PakEntry {
    /// NUL-padded path, e.g. `maps/start.bsp`.
    pub name: [u8; 56],
    /// Offset of the file data from the beginning of the pack.
    pub offset: i32,
    /// Size of the file in bytes.
    pub size: i32,
}

/// Entire pack resident in memory.
#[derive(Debug)]
pub struct Pak {
    /// Directory entries in the exact order they appear in the file.
    pub entries: Vec<PakEntry>,
    /// Backing buffer containing the raw pack contents.
    bytes: Vec<u8>,
    /// fast name -> index lookup
    by_name: HashMap<String, usize>,
}

/// Errors that can be encountered while opening/parsing a pack.
#[derive(Error, Debug)]
pub enum PakError {
    /// Underlying I/O failure, propagated unchanged.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Header magic wasn't `PACK`.
    #[error("not a PACK file")]
    BadMagic,

    /// Directory length isn't a multiple of the entry size.
    #[error("corrupt pack: directory length {0} not a multiple of {DIR_ENTRY_SIZE}")]
    BadDirectorySize(i32),

    /// Directory claims to extend past end-of-file.
    #[error("corrupt pack: directory extends beyond end of file")]
    DirectoryOutOfBounds,

    /// A directory entry points past end-of-file.
    #[error("corrupt pack: `{name}` slice {offset}+{size} past EOF ({file_size})")]
    EntryOutOfBounds {
        name: String,
        offset: i32,
        size: i32,
        file_size: usize,
    },
}

impl Pak {
    // ---------------------------------------------------------------------
    // Loading
    // ---------------------------------------------------------------------

    /// Load a pack from disk into memory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, PakError> {
        let mut file = File::open(path)?;

        /*----------- 1. read and validate header ------------------------*/
        let mut id: [u8; 4] = [0; 4];
        file.read_exact(&mut id)?;
        if &id != b"PACK" {
            return Err(PakError::BadMagic);
        }

        let dir_offset = file.read_i32::<LE>()?;
        let dir_length = file.read_i32::<LE>()?;

        /*----------- 2. read full file into RAM -------------------------*/
        let mut bytes = Vec::new();
        file.seek(SeekFrom::Start(0))?;
        file.read_to_end(&mut bytes)?;

        Self::from_bytes_inner(bytes, dir_offset, dir_length)
    }

    /// Parse a pack image already sitting in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, PakError> {
        if bytes.len() < 12 {
            return Err(PakError::BadMagic);
        }
        if &bytes[..4] != b"PACK" {
            return Err(PakError::BadMagic);
        }
        let dir_offset = i32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let dir_length = i32::from_le_bytes(bytes[8..12].try_into().unwrap());
        Self::from_bytes_inner(bytes, dir_offset, dir_length)
    }

    fn from_bytes_inner(bytes: Vec<u8>, dir_offset: i32, dir_length: i32) -> Result<Self, PakError> {
        /*----------- 3. sanity-check the directory ----------------------*/
        if dir_length < 0 || dir_length as usize % DIR_ENTRY_SIZE != 0 {
            return Err(PakError::BadDirectorySize(dir_length));
        }
        let num_entries = dir_length as usize / DIR_ENTRY_SIZE;
        let dir_end = dir_offset as usize + dir_length as usize;
        if dir_offset < 0 || dir_end > bytes.len() {
            return Err(PakError::DirectoryOutOfBounds);
        }

        /*----------- 4. parse directory entries -------------------------*/
        let mut entries = Vec::with_capacity(num_entries);
        let mut cursor = &bytes[dir_offset as usize..dir_end];

        for _ in 0..num_entries {
            let mut name = [0u8; 56];
            cursor.read_exact(&mut name)?;
            let offset = cursor.read_i32::<LE>()?;
            let size = cursor.read_i32::<LE>()?;
            entries.push(PakEntry { name, offset, size });
        }

        for e in &entries {
            let end = e.offset as i64 + e.size as i64;
            if e.offset < 0 || e.size < 0 || end > bytes.len() as i64 {
                return Err(PakError::EntryOutOfBounds {
                    name: Self::entry_name(&e.name).into(),
                    offset: e.offset,
                    size: e.size,
                    file_size: bytes.len(),
                });
            }
        }

        /*----------- 5. build reverse index ------------------------------*/
        let mut by_name = HashMap::with_capacity(entries.len());
        // scan backwards so later entries override earlier ones
        for (i, e) in entries.iter().enumerate().rev() {
            by_name
                .entry(Self::entry_name(&e.name).to_owned())
                .or_insert(i);
        }

        Ok(Self {
            entries,
            bytes,
            by_name,
        })
    }

    // ---------------------------------------------------------------------
    // Convenience helpers
    // ---------------------------------------------------------------------

    /// Convert a NUL-padded entry name into a printable string.
    pub fn entry_name(raw: &[u8; 56]) -> &str {
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        std::str::from_utf8(&raw[..end]).unwrap_or("\u{fffd}")
    }

    /// Borrow the raw bytes of entry `idx` without copying.
    pub fn entry_bytes(&self, idx: usize) -> &[u8] {
        assert!(idx < self.entries.len(), "pak entry index out of bounds");
        let e = &self.entries[idx];
        &self.bytes[e.offset as usize..(e.offset + e.size) as usize]
    }

    /// Locate a file by path (case-sensitive).  Returns its directory
    /// index or `None` if missing.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Locate a file by path and borrow its bytes in one step.
    pub fn read(&self, name: &str) -> Option<&[u8]> {
        self.find(name).map(|i| self.entry_bytes(i))
    }
}

// ==========================================================================
// Unit tests
// ==========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Hand-craft an in-memory pack with the given (name, payload) files.
    fn build_pak(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut pak = Vec::new();
        pak.extend_from_slice(b"PACK");
        pak.extend(&0i32.to_le_bytes()); // dir offset, patched below
        pak.extend(&0i32.to_le_bytes()); // dir length, patched below

        let mut dir = Vec::new();
        for (name, payload) in files {
            let mut raw_name = [0u8; 56];
            raw_name[..name.len()].copy_from_slice(name.as_bytes());
            dir.extend_from_slice(&raw_name);
            dir.extend(&(pak.len() as i32).to_le_bytes());
            dir.extend(&(payload.len() as i32).to_le_bytes());
            pak.extend_from_slice(payload);
        }

        let dir_offset = pak.len() as i32;
        let dir_length = dir.len() as i32;
        pak.extend(dir);
        pak[4..8].copy_from_slice(&dir_offset.to_le_bytes());
        pak[8..12].copy_from_slice(&dir_length.to_le_bytes());
        pak
    }

    #[test]
    fn reads_files_back() {
        let bytes = build_pak(&[
            ("gfx/palette.lmp", b"abcdef"),
            ("maps/start.bsp", b"payload"),
        ]);
        let pak = Pak::from_bytes(bytes).unwrap();
        assert_eq!(pak.entries.len(), 2);
        assert_eq!(pak.read("gfx/palette.lmp").unwrap(), b"abcdef");
        assert_eq!(pak.read("maps/start.bsp").unwrap(), b"payload");
        assert!(pak.read("maps/e1m1.bsp").is_none());
    }

    #[test]
    fn later_duplicate_name_shadows_the_earlier_one() {
        let bytes = build_pak(&[
            ("gfx/palette.lmp", b"stale"),
            ("maps/start.bsp", b"map"),
            ("gfx/palette.lmp", b"fresh"),
        ]);
        let pak = Pak::from_bytes(bytes).unwrap();
        // all three entries stay in the directory, but lookups resolve
        // to the last occurrence
        assert_eq!(pak.entries.len(), 3);
        assert_eq!(pak.find("gfx/palette.lmp"), Some(2));
        assert_eq!(pak.read("gfx/palette.lmp").unwrap(), b"fresh");
    }

    #[test]
    fn rejects_garbage_magic() {
        let err = Pak::from_bytes(b"NOTPAK_____\0".to_vec()).unwrap_err();
        assert!(matches!(err, PakError::BadMagic));
    }

    #[test]
    fn rejects_misaligned_directory() {
        let mut bytes = build_pak(&[("a", b"x")]);
        // shrink the directory length by one byte
        let len = i32::from_le_bytes(bytes[8..12].try_into().unwrap());
        bytes[8..12].copy_from_slice(&(len - 1).to_le_bytes());
        let err = Pak::from_bytes(bytes).unwrap_err();
        assert!(matches!(err, PakError::BadDirectorySize(_)));
    }

    #[test]
    fn rejects_directory_past_eof() {
        let mut bytes = build_pak(&[("a", b"x")]);
        bytes[4..8].copy_from_slice(&(1_000_000i32).to_le_bytes());
        let err = Pak::from_bytes(bytes).unwrap_err();
        assert!(matches!(err, PakError::DirectoryOutOfBounds));
    }

    #[test]
    fn rejects_entry_past_eof() {
        let mut bytes = build_pak(&[("a", b"x")]);
        // patch the entry's offset to point far past EOF
        let dir_offset = i32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
        bytes[dir_offset + 56..dir_offset + 60].copy_from_slice(&(1_000_000i32).to_le_bytes());
        let err = Pak::from_bytes(bytes).unwrap_err();
        assert!(matches!(err, PakError::EntryOutOfBounds { .. }));
    }
}
