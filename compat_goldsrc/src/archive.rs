//! Directory-addressed archives: a 12 byte header (magic, entry count,
//! directory offset), payloads, and a fixed-width directory array.
//!
//! The texture (`WAD3`) and data (`PACK`) archives share this shape and
//! differ only in their directory entry layout, see [`crate::wad`] and
//! [`crate::pak`].
//!
//! Payloads can be left on disk and fetched on demand. Saving in place
//! never moves an untouched payload: new or modified payloads are appended
//! after the last existing payload, the directory is written after them and
//! the header is patched last.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use crate::miptex::{EncodeMode, MipTex, MipTexError};
use crate::text::{read_name_field, write_name_field};

pub const ARCHIVE_HEADER_LEN: usize = 12;
const MAX_ARCHIVE_ENTRIES: usize = 100_000;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("not a {expected} archive (found magic {found:?})")]
    WrongKind {
        expected: &'static str,
        found: String,
    },
    #[error("invalid archive header")]
    InvalidHeader,
    #[error("archive directory out of bounds")]
    DirectoryOutOfBounds,
    #[error("archive directory has too many entries: {entries}")]
    TooManyEntries { entries: usize },
    #[error("archive entry out of bounds: {name}")]
    EntryOutOfBounds { name: String },
    #[error("archive has no entry {index}")]
    NoSuchEntry { index: usize },
    #[error("payload of {name} is not loaded")]
    MissingPayload { name: String },
    #[error("texture {name} is external and cannot be stored in an archive")]
    ExternalTexture { name: String },
    #[error("texture entry {name}: {source}")]
    Texture {
        name: String,
        #[source]
        source: MipTexError,
    },
    #[error("archive entry path is unsafe: {0}")]
    UnsafePath(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Layout of one archive kind.
pub trait ArchiveFormat {
    const MAGIC: [u8; 4];
    const NAME: &'static str;
    const ENTRY_LEN: usize;

    fn decode_entry(raw: &[u8]) -> ArchiveEntry;
    fn encode_entry(entry: &ArchiveEntry, out: &mut Vec<u8>);
    fn decode_payload(entry: &ArchiveEntry, raw: Vec<u8>) -> Result<Payload, ArchiveError>;
    fn same_name(a: &str, b: &str) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Texture(MipTex),
    Raw(Vec<u8>),
}

impl Payload {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Payload::Texture(texture) => texture.encode(EncodeMode::Dirty),
            Payload::Raw(bytes) => bytes.clone(),
        }
    }

    pub fn as_texture(&self) -> Option<&MipTex> {
        match self {
            Payload::Texture(texture) => Some(texture),
            Payload::Raw(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: String,
    pub offset: u32,
    pub disk_size: u32,
    pub size: u32,
    pub kind: u8,
    pub compression: u8,
    /// Name field as read, reused while the name is unchanged.
    pub(crate) name_field: Vec<u8>,
    pub(crate) reserved: [u8; 2],
    payload: Option<Payload>,
    dirty: bool,
}

impl ArchiveEntry {
    pub fn new(name: &str, kind: u8, payload: Payload) -> Self {
        Self {
            name: name.to_string(),
            offset: 0,
            disk_size: 0,
            size: 0,
            kind,
            compression: 0,
            name_field: Vec::new(),
            reserved: [0; 2],
            payload: Some(payload),
            dirty: true,
        }
    }

    pub(crate) fn from_directory(
        name_field: &[u8],
        offset: u32,
        disk_size: u32,
        size: u32,
        kind: u8,
        compression: u8,
        reserved: [u8; 2],
    ) -> Self {
        Self {
            name: read_name_field(name_field),
            offset,
            disk_size,
            size,
            kind,
            compression,
            name_field: name_field.to_vec(),
            reserved,
            payload: None,
            dirty: false,
        }
    }

    /// Encoded name field of `N` bytes.
    pub(crate) fn name_bytes<const N: usize>(&self) -> [u8; N] {
        if self.name_field.len() == N && read_name_field(&self.name_field) == self.name {
            let mut field = [0u8; N];
            field.copy_from_slice(&self.name_field);
            return field;
        }
        write_name_field::<N>(&self.name)
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.payload.is_some()
    }

    /// Bytes to store for this entry. Archived textures must carry pixels.
    fn encoded_payload(&self) -> Result<Vec<u8>, ArchiveError> {
        match &self.payload {
            None => Err(ArchiveError::MissingPayload {
                name: self.name.clone(),
            }),
            Some(Payload::Texture(texture)) if texture.is_external() => {
                Err(ArchiveError::ExternalTexture {
                    name: self.name.clone(),
                })
            }
            Some(payload) => Ok(payload.encode()),
        }
    }

    fn end(&self) -> u64 {
        u64::from(self.offset) + u64::from(self.disk_size)
    }
}

/// How much of an archive is read on load.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArchiveLoad {
    DirectoryOnly,
    Full,
}

#[derive(Debug, Clone)]
pub struct Archive<F: ArchiveFormat> {
    entries: Vec<ArchiveEntry>,
    /// End of the payload area; appended payloads start here.
    data_end: u64,
    format: PhantomData<F>,
}

impl<F: ArchiveFormat> Default for Archive<F> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            data_end: ARCHIVE_HEADER_LEN as u64,
            format: PhantomData,
        }
    }
}

impl<F: ArchiveFormat> Archive<F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(path: &Path, mode: ArchiveLoad) -> Result<Self, ArchiveError> {
        let mut reader = BufReader::new(File::open(path)?);
        Self::load(&mut reader, mode)
    }

    pub fn load<R: Read + Seek>(reader: &mut R, mode: ArchiveLoad) -> Result<Self, ArchiveError> {
        let stream_len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).map_err(header_error)?;
        if magic != F::MAGIC {
            return Err(ArchiveError::WrongKind {
                expected: F::NAME,
                found: String::from_utf8_lossy(&magic).into_owned(),
            });
        }
        let count = reader.read_i32::<LittleEndian>().map_err(header_error)?;
        let dir_offset = reader.read_i32::<LittleEndian>().map_err(header_error)?;
        let count = usize::try_from(count).map_err(|_| ArchiveError::InvalidHeader)?;
        let dir_offset = u64::try_from(dir_offset).map_err(|_| ArchiveError::InvalidHeader)?;
        if count > MAX_ARCHIVE_ENTRIES {
            return Err(ArchiveError::TooManyEntries { entries: count });
        }
        let dir_len = (count * F::ENTRY_LEN) as u64;
        if dir_offset + dir_len > stream_len {
            return Err(ArchiveError::DirectoryOutOfBounds);
        }

        reader.seek(SeekFrom::Start(dir_offset))?;
        let mut directory = vec![0u8; dir_len as usize];
        reader.read_exact(&mut directory)?;

        let mut entries = Vec::with_capacity(count);
        for raw in directory.chunks_exact(F::ENTRY_LEN) {
            let entry = F::decode_entry(raw);
            if entry.end() > stream_len {
                return Err(ArchiveError::EntryOutOfBounds { name: entry.name });
            }
            entries.push(entry);
        }

        let data_end = entries
            .iter()
            .map(ArchiveEntry::end)
            .max()
            .unwrap_or(0)
            .max(ARCHIVE_HEADER_LEN as u64);
        log::debug!(
            "loaded {} directory: {} entries at {}",
            F::NAME,
            entries.len(),
            dir_offset
        );

        let mut archive = Self {
            entries,
            data_end,
            format: PhantomData,
        };
        if mode == ArchiveLoad::Full {
            for index in 0..archive.entries.len() {
                archive.fetch_payload(index, reader)?;
            }
        }
        Ok(archive)
    }

    /// Loads one payload from `reader` unless it is already in memory.
    pub fn fetch_payload<R: Read + Seek>(
        &mut self,
        index: usize,
        reader: &mut R,
    ) -> Result<&Payload, ArchiveError> {
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(ArchiveError::NoSuchEntry { index })?;
        if entry.payload.is_none() {
            reader.seek(SeekFrom::Start(u64::from(entry.offset)))?;
            let mut raw = vec![0u8; entry.disk_size as usize];
            reader.read_exact(&mut raw).map_err(|err| match err.kind() {
                io::ErrorKind::UnexpectedEof => ArchiveError::EntryOutOfBounds {
                    name: entry.name.clone(),
                },
                _ => ArchiveError::Io(err),
            })?;
            entry.payload = Some(F::decode_payload(entry, raw)?);
        }
        entry
            .payload
            .as_ref()
            .ok_or(ArchiveError::NoSuchEntry { index })
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| F::same_name(&entry.name, name))
    }

    pub fn entry_by_name(&self, name: &str) -> Option<&ArchiveEntry> {
        self.position(name).map(|index| &self.entries[index])
    }

    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    pub fn payload(&self, index: usize) -> Option<&Payload> {
        self.entries.get(index).and_then(ArchiveEntry::payload)
    }

    /// Mutable access marks the payload for rewriting.
    pub fn payload_mut(&mut self, index: usize) -> Option<&mut Payload> {
        let entry = self.entries.get_mut(index)?;
        let payload = entry.payload.as_mut()?;
        entry.dirty = true;
        Some(payload)
    }

    pub fn rename(&mut self, index: usize, name: &str) -> Result<(), ArchiveError> {
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(ArchiveError::NoSuchEntry { index })?;
        entry.name = name.to_string();
        Ok(())
    }

    /// Drops the directory entry. The payload bytes stay in the file.
    pub fn remove(&mut self, index: usize) -> Option<ArchiveEntry> {
        (index < self.entries.len()).then(|| self.entries.remove(index))
    }

    pub(crate) fn push(&mut self, entry: ArchiveEntry) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    /// Rewrites the archive inside the stream it was loaded from and returns
    /// the new end of the archive. The stream is never shortened, so removed
    /// entries or a longer old directory leave stale bytes past that end;
    /// [`Archive::save_file`] cuts them off.
    pub fn save_in_place<S: Write + Seek>(&mut self, stream: &mut S) -> Result<u64, ArchiveError> {
        let payloads = self
            .entries
            .iter()
            .filter(|entry| entry.dirty)
            .map(ArchiveEntry::encoded_payload)
            .collect::<Result<Vec<_>, _>>()?;

        let mut position = self.data_end;
        stream.seek(SeekFrom::Start(position))?;
        let dirty = self.entries.iter_mut().filter(|entry| entry.dirty);
        for (entry, payload) in dirty.zip(&payloads) {
            stream.write_all(payload)?;
            entry.offset = position as u32;
            entry.disk_size = payload.len() as u32;
            entry.size = payload.len() as u32;
            entry.dirty = false;
            position += payload.len() as u64;
        }
        self.data_end = position;

        self.write_directory(stream)?;
        let end = position + (self.entries.len() * F::ENTRY_LEN) as u64;
        stream.seek(SeekFrom::Start(0))?;
        self.write_header(stream, position)?;
        stream.flush()?;
        log::debug!(
            "saved {} in place: {} entries, directory at {}",
            F::NAME,
            self.entries.len(),
            position
        );
        Ok(end)
    }

    /// Saves in place into the file at `path` and truncates it after the
    /// directory.
    pub fn save_file(&mut self, path: &Path) -> Result<(), ArchiveError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let mut stream = BufWriter::new(file);
        let end = self.save_in_place(&mut stream)?;
        let file = stream.into_inner().map_err(|err| ArchiveError::Io(err.into_error()))?;
        file.set_len(end)?;
        log::info!("saved {} to {}", F::NAME, path.display());
        Ok(())
    }

    /// Writes a fresh archive with every payload packed after the header.
    /// All payloads must be loaded.
    pub fn write_packed<W: Write>(&mut self, out: &mut W) -> Result<(), ArchiveError> {
        let payloads = self
            .entries
            .iter()
            .map(ArchiveEntry::encoded_payload)
            .collect::<Result<Vec<_>, _>>()?;

        let mut position = ARCHIVE_HEADER_LEN as u64;
        for (entry, payload) in self.entries.iter_mut().zip(&payloads) {
            entry.offset = position as u32;
            entry.disk_size = payload.len() as u32;
            entry.size = payload.len() as u32;
            entry.dirty = false;
            position += payload.len() as u64;
        }
        self.data_end = position;

        self.write_header(out, position)?;
        for payload in &payloads {
            out.write_all(payload)?;
        }
        self.write_directory(out)?;
        Ok(())
    }

    pub fn to_packed_bytes(&mut self) -> Result<Vec<u8>, ArchiveError> {
        let mut out = Vec::new();
        self.write_packed(&mut out)?;
        Ok(out)
    }

    fn write_header<W: Write>(&self, out: &mut W, dir_offset: u64) -> Result<(), ArchiveError> {
        out.write_all(&F::MAGIC)?;
        out.write_i32::<LittleEndian>(self.entries.len() as i32)?;
        out.write_i32::<LittleEndian>(dir_offset as i32)?;
        Ok(())
    }

    fn write_directory<W: Write>(&self, out: &mut W) -> Result<(), ArchiveError> {
        let mut directory = Vec::with_capacity(self.entries.len() * F::ENTRY_LEN);
        for entry in &self.entries {
            F::encode_entry(entry, &mut directory);
        }
        out.write_all(&directory)?;
        Ok(())
    }
}

fn header_error(err: io::Error) -> ArchiveError {
    match err.kind() {
        io::ErrorKind::UnexpectedEof => ArchiveError::InvalidHeader,
        _ => ArchiveError::Io(err),
    }
}
