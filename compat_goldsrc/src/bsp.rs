//! Version 30 map container: a 4 byte version, fifteen (offset, length)
//! slots, then the lump payloads.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use crate::entities::{EntityError, EntityList};
use crate::lump::{
    DecodeDepth, Lump, LumpData, LumpKind, LumpOrder, LumpRecord, LUMP_COUNT,
};
use crate::miptex::{EncodeMode, MipTex, MipTexError};

pub const BSP_VERSION: i32 = 30;
pub const HEADER_LEN: usize = 4 + LUMP_COUNT * 8;

#[derive(Debug, Error)]
pub enum BspError {
    #[error("invalid bsp header")]
    InvalidHeader,
    #[error("bsp data is truncated")]
    Truncated,
    #[error("unsupported bsp version {0}")]
    UnsupportedVersion(i32),
    #[error("bsp lump {lump} out of bounds")]
    LumpOutOfBounds { lump: LumpKind },
    #[error("bsp lump {lump} has invalid size {size} (stride {stride})")]
    InvalidLumpSize {
        lump: LumpKind,
        size: usize,
        stride: usize,
    },
    #[error("texture lump directory is invalid (count {count})")]
    InvalidTextureDirectory { count: i32 },
    #[error("texture {index}: {source}")]
    Texture {
        index: usize,
        #[source]
        source: MipTexError,
    },
    #[error("entity lump: {0}")]
    Entities(#[from] EntityError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LumpEntry {
    pub kind: LumpKind,
    pub offset: u32,
    pub length: u32,
}

#[derive(Debug, Clone)]
pub struct BspFile {
    order: LumpOrder,
    /// Lumps in the order their payloads appeared in the source file.
    lumps: Vec<Lump>,
    /// Directory as loaded, in slot order.
    directory: Vec<LumpEntry>,
    texture_mode: EncodeMode,
}

impl BspFile {
    pub fn read(path: &Path, order: LumpOrder, depth: DecodeDepth) -> Result<Self, BspError> {
        let mut reader = BufReader::new(File::open(path)?);
        Self::load(&mut reader, order, depth)
    }

    pub fn load<R: Read + Seek>(
        reader: &mut R,
        order: LumpOrder,
        depth: DecodeDepth,
    ) -> Result<Self, BspError> {
        let stream_len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;

        let mut header = [0u8; HEADER_LEN];
        reader.read_exact(&mut header).map_err(truncated)?;
        let mut cursor = io::Cursor::new(&header[..]);
        let version = cursor.read_i32::<LittleEndian>()?;
        if version != BSP_VERSION {
            return Err(BspError::UnsupportedVersion(version));
        }

        let mut directory = Vec::with_capacity(LUMP_COUNT);
        for kind in order.slots() {
            let offset = cursor.read_i32::<LittleEndian>()?;
            let length = cursor.read_i32::<LittleEndian>()?;
            let (offset, length) = match (u32::try_from(offset), u32::try_from(length)) {
                (Ok(offset), Ok(length)) => (offset, length),
                _ => return Err(BspError::InvalidHeader),
            };
            if u64::from(offset) + u64::from(length) > stream_len {
                return Err(BspError::LumpOutOfBounds { lump: kind });
            }
            directory.push(LumpEntry {
                kind,
                offset,
                length,
            });
        }

        let mut layout = directory.clone();
        layout.sort_by_key(|entry| entry.offset);

        let mut lumps = Vec::with_capacity(LUMP_COUNT);
        for entry in &layout {
            reader.seek(SeekFrom::Start(u64::from(entry.offset)))?;
            let mut raw = vec![0u8; entry.length as usize];
            reader.read_exact(&mut raw).map_err(truncated)?;
            log::debug!(
                "loaded {} lump: {} bytes at {}",
                entry.kind,
                entry.length,
                entry.offset
            );
            lumps.push(Lump::decode(entry.kind, raw, depth)?);
        }

        Ok(Self {
            order,
            lumps,
            directory,
            texture_mode: EncodeMode::Dirty,
        })
    }

    pub fn write(&self, path: &Path) -> Result<(), BspError> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.dump(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Serializes the map, keeping the original relative lump order and
    /// aligning every lump to 4 bytes.
    pub fn dump<W: Write>(&self, out: &mut W) -> Result<(), BspError> {
        let payloads: Vec<_> = self
            .lumps
            .iter()
            .map(|lump| lump.encode(self.texture_mode))
            .collect();

        let mut placed = Vec::with_capacity(LUMP_COUNT);
        let mut position = HEADER_LEN;
        for (lump, payload) in self.lumps.iter().zip(&payloads) {
            position = align4(position);
            let offset = if payload.is_empty() {
                // Empty lumps keep their old offset while it stays in range.
                self.original_entry(lump.kind())
                    .map(|entry| entry.offset as usize)
                    .filter(|offset| *offset <= position)
                    .unwrap_or(position)
            } else {
                position
            };
            placed.push(LumpEntry {
                kind: lump.kind(),
                offset: offset as u32,
                length: payload.len() as u32,
            });
            position += payload.len();
        }

        out.write_i32::<LittleEndian>(BSP_VERSION)?;
        for kind in self.order.slots() {
            let entry = placed
                .iter()
                .find(|entry| entry.kind == kind)
                .ok_or(BspError::InvalidHeader)?;
            out.write_u32::<LittleEndian>(entry.offset)?;
            out.write_u32::<LittleEndian>(entry.length)?;
        }

        let mut written = HEADER_LEN;
        for (entry, payload) in placed.iter().zip(&payloads) {
            if payload.is_empty() {
                continue;
            }
            let padding = entry.offset as usize - written;
            out.write_all(&[0u8; 3][..padding])?;
            out.write_all(payload)?;
            written = entry.offset as usize + payload.len();
            log::debug!(
                "wrote {} lump: {} bytes at {}",
                entry.kind,
                entry.length,
                entry.offset
            );
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, BspError> {
        let mut out = Vec::new();
        self.dump(&mut out)?;
        Ok(out)
    }

    pub fn order(&self) -> LumpOrder {
        self.order
    }

    /// Directory as it was read, in header slot order.
    pub fn directory(&self) -> &[LumpEntry] {
        &self.directory
    }

    fn original_entry(&self, kind: LumpKind) -> Option<&LumpEntry> {
        self.directory.iter().find(|entry| entry.kind == kind)
    }

    pub fn texture_encode(&self) -> EncodeMode {
        self.texture_mode
    }

    pub fn set_texture_encode(&mut self, mode: EncodeMode) {
        self.texture_mode = mode;
    }

    pub fn lump(&self, kind: LumpKind) -> Option<&Lump> {
        self.lumps.iter().find(|lump| lump.kind() == kind)
    }

    pub fn lumps(&self) -> impl Iterator<Item = &Lump> {
        self.lumps.iter()
    }

    fn lump_data_mut(&mut self, kind: LumpKind) -> Option<&mut LumpData> {
        self.lumps
            .iter_mut()
            .find(|lump| lump.kind() == kind)
            .map(Lump::data_mut)
    }

    pub fn entities(&self) -> Option<&EntityList> {
        match self.lump(LumpKind::Entities)?.data() {
            LumpData::Entities(entities) => Some(entities),
            _ => None,
        }
    }

    pub fn entities_mut(&mut self) -> Option<&mut EntityList> {
        match self.lump_data_mut(LumpKind::Entities)? {
            LumpData::Entities(entities) => Some(entities),
            _ => None,
        }
    }

    pub fn textures(&self) -> Option<&[MipTex]> {
        match self.lump(LumpKind::Textures)?.data() {
            LumpData::Textures(textures) => Some(textures.as_slice()),
            _ => None,
        }
    }

    pub fn textures_mut(&mut self) -> Option<&mut Vec<MipTex>> {
        match self.lump_data_mut(LumpKind::Textures)? {
            LumpData::Textures(textures) => Some(textures),
            _ => None,
        }
    }

    pub fn embedded_textures(&self) -> impl Iterator<Item = &MipTex> {
        self.textures()
            .unwrap_or_default()
            .iter()
            .filter(|tex| !tex.is_external())
    }

    pub fn external_textures(&self) -> impl Iterator<Item = &MipTex> {
        self.textures()
            .unwrap_or_default()
            .iter()
            .filter(|tex| tex.is_external())
    }

    /// Decoded records of a flat record lump; `None` unless loaded with
    /// [`DecodeDepth::Full`].
    pub fn records<T: LumpRecord>(&self) -> Option<&[T]> {
        T::records(self.lump(T::KIND)?.data())
    }

    pub fn records_mut<T: LumpRecord>(&mut self) -> Option<&mut Vec<T>> {
        let lump = self.lumps.iter_mut().find(|lump| lump.kind() == T::KIND)?;
        if !lump.is_decoded() {
            return None;
        }
        T::records_mut(lump.data_mut())
    }

    /// Whether any lump would encode differently from what was loaded.
    pub fn changed(&self) -> bool {
        self.lumps.iter().any(Lump::changed)
    }
}

fn align4(position: usize) -> usize {
    (position + 3) & !3
}

fn truncated(err: io::Error) -> BspError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        BspError::Truncated
    } else {
        BspError::Io(err)
    }
}
