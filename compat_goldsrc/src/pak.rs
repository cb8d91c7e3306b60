//! PACK data archives.
//!
//! Header is magic, entry count, directory offset; each 64 byte directory
//! entry is a 56 byte path followed by offset and size.

use std::ffi::OsStr;
use std::fs;
use std::io::{Read, Seek};
use std::path::{Component, Path, PathBuf};

use crate::archive::{Archive, ArchiveEntry, ArchiveError, ArchiveFormat, Payload};
use crate::miptex::EncodeMode;

pub const PAK_NAME_LEN: usize = 56;

#[derive(Debug, Clone, Copy, Default)]
pub struct Pack;

pub type PakFile = Archive<Pack>;

impl ArchiveFormat for Pack {
    const MAGIC: [u8; 4] = *b"PACK";
    const NAME: &'static str = "PACK";
    const ENTRY_LEN: usize = PAK_NAME_LEN + 8;

    fn decode_entry(raw: &[u8]) -> ArchiveEntry {
        let offset = read_u32_le(&raw[56..60]);
        let size = read_u32_le(&raw[60..64]);
        ArchiveEntry::from_directory(&raw[..PAK_NAME_LEN], offset, size, size, 0, 0, [0; 2])
    }

    fn encode_entry(entry: &ArchiveEntry, out: &mut Vec<u8>) {
        out.extend_from_slice(&entry.name_bytes::<PAK_NAME_LEN>());
        out.extend_from_slice(&entry.offset.to_le_bytes());
        out.extend_from_slice(&entry.disk_size.to_le_bytes());
    }

    fn decode_payload(_entry: &ArchiveEntry, raw: Vec<u8>) -> Result<Payload, ArchiveError> {
        Ok(Payload::Raw(raw))
    }

    fn same_name(a: &str, b: &str) -> bool {
        sanitize_name(a) == sanitize_name(b)
    }
}

impl Archive<Pack> {
    pub fn add_file(&mut self, name: &str, data: Vec<u8>) -> usize {
        self.push(ArchiveEntry::new(name, 0, Payload::Raw(data)))
    }

    /// Writes every entry below `out_dir`, loading payloads as needed.
    pub fn extract_all<R: Read + Seek>(
        &mut self,
        reader: &mut R,
        out_dir: &Path,
    ) -> Result<usize, ArchiveError> {
        fs::create_dir_all(out_dir)?;
        for index in 0..self.len() {
            let name = self.entries()[index].name.clone();
            let out_path = safe_join(out_dir, &sanitize_name(&name))?;
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }
            match self.fetch_payload(index, reader)? {
                Payload::Raw(bytes) => fs::write(&out_path, bytes)?,
                Payload::Texture(texture) => {
                    fs::write(&out_path, texture.encode(EncodeMode::Dirty))?
                }
            }
            log::debug!("extracted {}", out_path.display());
        }
        Ok(self.len())
    }
}

fn read_u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn sanitize_name(name: &str) -> String {
    let trimmed = name.trim_matches(char::from(0));
    trimmed.replace('\\', "/")
}

fn safe_join(base: &Path, entry: &str) -> Result<PathBuf, ArchiveError> {
    let rel = Path::new(entry);
    let mut safe = PathBuf::from(base);
    for component in rel.components() {
        match component {
            Component::Normal(part) => safe.push(part),
            Component::CurDir => {}
            _ => return Err(ArchiveError::UnsafePath(entry.to_string())),
        }
    }

    if safe.as_path() == base || safe.file_name() == Some(OsStr::new("")) {
        return Err(ArchiveError::UnsafePath(entry.to_string()));
    }

    Ok(safe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveLoad;
    use std::io::Cursor;

    fn build_pak(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut pak = PakFile::new();
        for (name, data) in entries {
            pak.add_file(name, data.to_vec());
        }
        pak.to_packed_bytes().expect("pack")
    }

    #[test]
    fn header_holds_count_and_directory_offset() {
        let data = build_pak(&[("sound/materials.txt", b"C CONCRETE"), ("liblist.gam", b"game")]);
        assert_eq!(&data[0..4], b"PACK");
        assert_eq!(&data[4..8], &2i32.to_le_bytes());
        assert_eq!(&data[8..12], &26i32.to_le_bytes());
        assert_eq!(data.len(), 26 + 2 * 64);
        assert_eq!(&data[26 + 56..26 + 60], &12u32.to_le_bytes());
        assert_eq!(&data[26 + 60..26 + 64], &10u32.to_le_bytes());
    }

    #[test]
    fn lookup_normalizes_separators() {
        let data = build_pak(&[("sound\\materials.txt", b"C CONCRETE")]);
        let mut cursor = Cursor::new(data);
        let mut pak = PakFile::load(&mut cursor, ArchiveLoad::DirectoryOnly).expect("load");
        let index = pak.position("sound/materials.txt").expect("entry");
        assert_eq!(
            pak.fetch_payload(index, &mut cursor).expect("payload"),
            &Payload::Raw(b"C CONCRETE".to_vec())
        );
    }

    #[test]
    fn wrong_magic_is_wrong_kind() {
        let mut data = build_pak(&[("a.txt", b"a")]);
        data[0..4].copy_from_slice(b"WAD3");
        let err = PakFile::load(&mut Cursor::new(data), ArchiveLoad::Full).expect_err("magic");
        assert!(matches!(err, ArchiveError::WrongKind { expected: "PACK", .. }));
    }

    #[test]
    fn directory_out_of_bounds() {
        let mut data = build_pak(&[("a.txt", b"a")]);
        data[4..8].copy_from_slice(&3i32.to_le_bytes());
        let err = PakFile::load(&mut Cursor::new(data), ArchiveLoad::Full).expect_err("bounds");
        assert!(matches!(err, ArchiveError::DirectoryOutOfBounds));
    }

    #[test]
    fn entry_out_of_bounds() {
        let mut data = build_pak(&[("a.txt", b"a")]);
        let size_at = 13 + 60;
        data[size_at..size_at + 4].copy_from_slice(&1000u32.to_le_bytes());
        let err = PakFile::load(&mut Cursor::new(data), ArchiveLoad::Full).expect_err("bounds");
        assert!(matches!(err, ArchiveError::EntryOutOfBounds { .. }));
    }

    #[test]
    fn untouched_directory_round_trips() {
        let data = build_pak(&[("maps/c1a0.bsp", b"map"), ("gfx.wad", b"wad")]);
        let mut pak = PakFile::load(&mut Cursor::new(data.clone()), ArchiveLoad::Full).expect("load");
        assert_eq!(pak.to_packed_bytes().expect("pack"), data);
    }

    #[test]
    fn extract_all_writes_files() {
        let data = build_pak(&[("sound/materials.txt", b"C CONCRETE"), ("liblist.gam", b"game")]);
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cursor = Cursor::new(data);
        let mut pak = PakFile::load(&mut cursor, ArchiveLoad::DirectoryOnly).expect("load");
        let count = pak.extract_all(&mut cursor, dir.path()).expect("extract");
        assert_eq!(count, 2);
        let text = fs::read(dir.path().join("sound").join("materials.txt")).expect("read");
        assert_eq!(text, b"C CONCRETE");
    }

    #[test]
    fn extract_all_rejects_traversal() {
        let data = build_pak(&[("../evil.txt", b"x")]);
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cursor = Cursor::new(data);
        let mut pak = PakFile::load(&mut cursor, ArchiveLoad::DirectoryOnly).expect("load");
        let err = pak.extract_all(&mut cursor, dir.path()).expect_err("unsafe");
        assert!(matches!(err, ArchiveError::UnsafePath(_)));
    }

    #[test]
    fn safe_join_rejects_absolute_paths() {
        let base = Path::new("out");
        assert!(safe_join(base, "/etc/passwd").is_err());
        assert!(safe_join(base, "").is_err());
        assert_eq!(
            safe_join(base, "./maps/c1a0.bsp").expect("join"),
            Path::new("out").join("maps").join("c1a0.bsp")
        );
    }
}
