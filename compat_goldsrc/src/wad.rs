//! WAD3 texture archives.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::archive::{Archive, ArchiveEntry, ArchiveError, ArchiveFormat, ArchiveLoad, Payload};
use crate::miptex::MipTex;

/// Directory type tag of a miptex payload.
pub const TYPE_MIPTEX: u8 = 0x43;
pub const WAD_NAME_LEN: usize = 16;

#[derive(Debug, Clone, Copy, Default)]
pub struct Wad3;

pub type WadFile = Archive<Wad3>;

impl ArchiveFormat for Wad3 {
    const MAGIC: [u8; 4] = *b"WAD3";
    const NAME: &'static str = "WAD3";
    const ENTRY_LEN: usize = 32;

    fn decode_entry(raw: &[u8]) -> ArchiveEntry {
        let mut fields = &raw[..12];
        let mut next = || fields.read_i32::<LittleEndian>().unwrap_or(0) as u32;
        let offset = next();
        let disk_size = next();
        let size = next();
        ArchiveEntry::from_directory(
            &raw[16..32],
            offset,
            disk_size,
            size,
            raw[12],
            raw[13],
            [raw[14], raw[15]],
        )
    }

    fn encode_entry(entry: &ArchiveEntry, out: &mut Vec<u8>) {
        out.extend_from_slice(&entry.offset.to_le_bytes());
        out.extend_from_slice(&entry.disk_size.to_le_bytes());
        out.extend_from_slice(&entry.size.to_le_bytes());
        out.push(entry.kind);
        out.push(entry.compression);
        out.extend_from_slice(&entry.reserved);
        out.extend_from_slice(&entry.name_bytes::<WAD_NAME_LEN>());
    }

    fn decode_payload(entry: &ArchiveEntry, raw: Vec<u8>) -> Result<Payload, ArchiveError> {
        if entry.kind != TYPE_MIPTEX {
            return Ok(Payload::Raw(raw));
        }
        MipTex::decode(&raw)
            .map(Payload::Texture)
            .map_err(|source| ArchiveError::Texture {
                name: entry.name.clone(),
                source,
            })
    }

    /// The engine looks textures up without regard to case.
    fn same_name(a: &str, b: &str) -> bool {
        a.eq_ignore_ascii_case(b)
    }
}

impl Archive<Wad3> {
    /// Appends an embedded texture under its own name.
    pub fn add_texture(&mut self, texture: MipTex) -> Result<usize, ArchiveError> {
        if texture.is_external() {
            return Err(ArchiveError::ExternalTexture {
                name: texture.name().to_string(),
            });
        }
        let name = texture.name().to_string();
        Ok(self.push(ArchiveEntry::new(
            &name,
            TYPE_MIPTEX,
            Payload::Texture(texture),
        )))
    }

    pub fn texture(&self, index: usize) -> Option<&MipTex> {
        self.payload(index).and_then(Payload::as_texture)
    }

    /// Texture by name, loading it from `reader` when needed.
    pub fn fetch_texture<R: Read + Seek>(
        &mut self,
        name: &str,
        reader: &mut R,
    ) -> Result<Option<&MipTex>, ArchiveError> {
        let index = match self.position(name) {
            Some(index) => index,
            None => return Ok(None),
        };
        Ok(self.fetch_payload(index, reader)?.as_texture())
    }
}

/// Textures from a WAD whose names appear in `names` (case-insensitive),
/// plus the full list of entry names.
pub fn load_textures_by_name(
    path: &Path,
    names: &HashSet<String>,
) -> Result<(Vec<MipTex>, Vec<String>), ArchiveError> {
    let wanted: HashSet<String> = names.iter().map(|name| name.to_ascii_uppercase()).collect();
    let mut reader = BufReader::new(File::open(path)?);
    let mut wad = WadFile::load(&mut reader, ArchiveLoad::DirectoryOnly)?;

    let mut textures = Vec::new();
    for index in 0..wad.len() {
        let entry = &wad.entries()[index];
        if entry.kind != TYPE_MIPTEX || !wanted.contains(&entry.name.to_ascii_uppercase()) {
            continue;
        }
        if let Some(texture) = wad.fetch_payload(index, &mut reader)?.as_texture() {
            textures.push(texture.clone());
        }
    }
    let entry_names = wad.entry_names().map(str::to_string).collect();
    Ok((textures, entry_names))
}
