//! Palettized texture records ("miptex") shared by the map texture lump and
//! WAD3 texture archives.
//!
//! A record is either embedded (four mip levels plus a 256 color palette) or
//! external (header only, the pixels live in a WAD referenced by the map).
//! The raw 16 byte name field is kept verbatim so that an untouched record
//! can be written back byte for byte: compilers leave stale bytes behind the
//! NUL terminator.

use std::io::{Cursor, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use crate::text::{encode_cp1252, read_name_field, write_name_field};

pub const NAME_FIELD_LEN: usize = 16;
pub const MAX_NAME_LEN: usize = NAME_FIELD_LEN - 1;
pub const HEADER_LEN: usize = NAME_FIELD_LEN + 4 * 6;
pub const MIP_LEVELS: usize = 4;
pub const PALETTE_COLORS: u16 = 256;
pub const PALETTE_LEN: usize = 256 * 3;

#[derive(Debug, Error)]
pub enum MipTexError {
    #[error("miptex record is truncated")]
    Truncated,
    #[error("invalid miptex dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("miptex mip level {level} out of bounds")]
    MipOutOfBounds { level: usize },
    #[error("miptex palette out of bounds")]
    PaletteOutOfBounds,
    #[error("texture {name} is external and carries no bitmap")]
    External { name: String },
    #[error("mip level {level} needs {expected} bytes, got {actual}")]
    MipLength {
        level: usize,
        expected: usize,
        actual: usize,
    },
    #[error("palette needs {expected} bytes, got {actual}")]
    PaletteLength { expected: usize, actual: usize },
}

/// How the name field is produced on encode.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EncodeMode {
    /// Fresh zero-padded field.
    Clean,
    /// Splice the name into the original field, keeping the stale bytes
    /// after the terminator and any bytes trailing the palette.
    Dirty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: [u8; PALETTE_LEN],
}

impl Palette {
    pub fn from_slice(data: &[u8]) -> Result<Self, MipTexError> {
        if data.len() < PALETTE_LEN {
            return Err(MipTexError::PaletteLength {
                expected: PALETTE_LEN,
                actual: data.len(),
            });
        }
        let mut colors = [0u8; PALETTE_LEN];
        colors.copy_from_slice(&data[..PALETTE_LEN]);
        Ok(Self { colors })
    }

    pub fn colors(&self) -> &[u8; PALETTE_LEN] {
        &self.colors
    }

    pub fn rgb(&self, index: u8) -> [u8; 3] {
        let base = index as usize * 3;
        [
            self.colors[base],
            self.colors[base + 1],
            self.colors[base + 2],
        ]
    }

    pub fn rgba(&self, index: u8) -> [u8; 4] {
        let [r, g, b] = self.rgb(index);
        [r, g, b, 255]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Bitmap {
    mips: [Vec<u8>; MIP_LEVELS],
    color_count: u16,
    palette: Palette,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MipTex {
    name: String,
    width: u32,
    height: u32,
    bitmap: Option<Bitmap>,
    raw_name: Option<[u8; NAME_FIELD_LEN]>,
    tail: Vec<u8>,
}

impl MipTex {
    /// Builds an embedded texture from its full size pixels; the smaller mip
    /// levels are generated.
    pub fn new(
        name: &str,
        width: u32,
        height: u32,
        mip0: Vec<u8>,
        palette: Palette,
    ) -> Result<Self, MipTexError> {
        validate_dimensions(width, height)?;
        let bitmap = build_bitmap(width, height, mip0, palette)?;
        Ok(Self {
            name: truncate_name(name),
            width,
            height,
            bitmap: Some(bitmap),
            raw_name: None,
            tail: Vec::new(),
        })
    }

    /// Header-only record whose pixels are looked up in a WAD by name.
    pub fn external(name: &str, width: u32, height: u32) -> Result<Self, MipTexError> {
        validate_dimensions(width, height)?;
        Ok(Self {
            name: truncate_name(name),
            width,
            height,
            bitmap: None,
            raw_name: None,
            tail: Vec::new(),
        })
    }

    pub fn decode(data: &[u8]) -> Result<Self, MipTexError> {
        if data.len() < HEADER_LEN {
            return Err(MipTexError::Truncated);
        }
        let mut raw_name = [0u8; NAME_FIELD_LEN];
        raw_name.copy_from_slice(&data[..NAME_FIELD_LEN]);
        let name = read_name_field(&raw_name);

        let mut cursor = Cursor::new(&data[NAME_FIELD_LEN..HEADER_LEN]);
        let width = read_u32(&mut cursor)?;
        let height = read_u32(&mut cursor)?;
        let mut offsets = [0u32; MIP_LEVELS];
        for offset in offsets.iter_mut() {
            *offset = read_u32(&mut cursor)?;
        }

        if offsets == [0; MIP_LEVELS] {
            return Ok(Self {
                name,
                width,
                height,
                bitmap: None,
                raw_name: Some(raw_name),
                tail: data[HEADER_LEN..].to_vec(),
            });
        }

        if width == 0 || height == 0 {
            return Err(MipTexError::InvalidDimensions { width, height });
        }
        let pixel_count = pixel_count(width, height)?;

        let mut mips: [Vec<u8>; MIP_LEVELS] = Default::default();
        let mut mip_end = 0usize;
        for (level, mip) in mips.iter_mut().enumerate() {
            let start = offsets[level] as usize;
            let len = pixel_count >> (2 * level);
            let end = start
                .checked_add(len)
                .filter(|end| *end <= data.len())
                .ok_or(MipTexError::MipOutOfBounds { level })?;
            *mip = data[start..end].to_vec();
            mip_end = end;
        }

        let palette_start = mip_end + 2;
        let palette_end = palette_start + PALETTE_LEN;
        if palette_end > data.len() {
            return Err(MipTexError::PaletteOutOfBounds);
        }
        let color_count = u16::from_le_bytes([data[mip_end], data[mip_end + 1]]);
        let palette = Palette::from_slice(&data[palette_start..palette_end])?;

        Ok(Self {
            name,
            width,
            height,
            bitmap: Some(Bitmap {
                mips,
                color_count,
                palette,
            }),
            raw_name: Some(raw_name),
            tail: data[palette_end..].to_vec(),
        })
    }

    pub fn encode(&self, mode: EncodeMode) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(&self.name_field(mode));
        // Writes into a Vec cannot fail.
        let _ = self.encode_body(&mut out);
        if mode == EncodeMode::Dirty {
            out.extend_from_slice(&self.tail);
        }
        out
    }

    fn encode_body(&self, out: &mut Vec<u8>) -> std::io::Result<()> {
        out.write_u32::<LittleEndian>(self.width)?;
        out.write_u32::<LittleEndian>(self.height)?;
        let bitmap = match &self.bitmap {
            Some(bitmap) => bitmap,
            None => {
                for _ in 0..MIP_LEVELS {
                    out.write_u32::<LittleEndian>(0)?;
                }
                return Ok(());
            }
        };

        let mut offset = HEADER_LEN;
        for mip in &bitmap.mips {
            out.write_u32::<LittleEndian>(offset as u32)?;
            offset += mip.len();
        }
        for mip in &bitmap.mips {
            out.write_all(mip)?;
        }
        out.write_u16::<LittleEndian>(bitmap.color_count)?;
        out.write_all(bitmap.palette.colors())
    }

    fn name_field(&self, mode: EncodeMode) -> [u8; NAME_FIELD_LEN] {
        match (mode, self.raw_name) {
            (EncodeMode::Dirty, Some(mut field)) => {
                let bytes = encode_cp1252(&self.name);
                let len = bytes.len().min(MAX_NAME_LEN);
                field[..len].copy_from_slice(&bytes[..len]);
                field[len] = 0;
                field
            }
            _ => write_name_field::<NAME_FIELD_LEN>(&self.name),
        }
    }

    /// Size of a clean encode.
    pub fn encoded_len(&self) -> usize {
        match &self.bitmap {
            Some(bitmap) => {
                HEADER_LEN
                    + bitmap.mips.iter().map(Vec::len).sum::<usize>()
                    + 2
                    + PALETTE_LEN
            }
            None => HEADER_LEN,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renames the texture; names longer than the field allows are cut.
    pub fn set_name(&mut self, name: &str) {
        self.name = truncate_name(name);
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_external(&self) -> bool {
        self.bitmap.is_none()
    }

    pub fn mip(&self, level: usize) -> Option<&[u8]> {
        self.bitmap
            .as_ref()
            .and_then(|bitmap| bitmap.mips.get(level))
            .map(Vec::as_slice)
    }

    pub fn palette(&self) -> Option<&Palette> {
        self.bitmap.as_ref().map(|bitmap| &bitmap.palette)
    }

    pub fn color_count(&self) -> Option<u16> {
        self.bitmap.as_ref().map(|bitmap| bitmap.color_count)
    }

    /// Replaces the full size pixels and regenerates the other levels.
    pub fn set_mip0(&mut self, mip0: Vec<u8>) -> Result<(), MipTexError> {
        let palette = match &self.bitmap {
            Some(bitmap) => bitmap.palette.clone(),
            None => {
                return Err(MipTexError::External {
                    name: self.name.clone(),
                })
            }
        };
        validate_dimensions(self.width, self.height)?;
        self.bitmap = Some(build_bitmap(self.width, self.height, mip0, palette)?);
        self.tail.clear();
        Ok(())
    }

    pub fn set_palette(&mut self, palette: Palette) -> Result<(), MipTexError> {
        match &mut self.bitmap {
            Some(bitmap) => {
                bitmap.palette = palette;
                Ok(())
            }
            None => Err(MipTexError::External {
                name: self.name.clone(),
            }),
        }
    }

    /// Drops the bitmap and palette. There is no way back.
    pub fn unembed(&mut self) {
        if self.bitmap.take().is_some() {
            self.tail.clear();
        }
    }

    pub fn to_rgba8(&self) -> Option<Vec<u8>> {
        let bitmap = self.bitmap.as_ref()?;
        let mut out = Vec::with_capacity(bitmap.mips[0].len() * 4);
        for &index in &bitmap.mips[0] {
            out.extend_from_slice(&bitmap.palette.rgba(index));
        }
        Some(out)
    }
}

/// Nearest-neighbour subsample of `mip0` for mip `level` (1..=3).
pub fn generate_mip(mip0: &[u8], width: u32, height: u32, level: usize) -> Vec<u8> {
    let width = width as usize;
    let height = height as usize;
    let step = 1usize << level;
    let start = 2 * level.saturating_sub(1);
    let mut out = Vec::with_capacity((width / step) * (height / step));
    for row in (start..height).step_by(step) {
        for col in (start..width).step_by(step) {
            out.push(mip0[row * width + col]);
        }
    }
    out
}

fn build_bitmap(
    width: u32,
    height: u32,
    mip0: Vec<u8>,
    palette: Palette,
) -> Result<Bitmap, MipTexError> {
    let expected = pixel_count(width, height)?;
    if mip0.len() != expected {
        return Err(MipTexError::MipLength {
            level: 0,
            expected,
            actual: mip0.len(),
        });
    }
    let mip1 = generate_mip(&mip0, width, height, 1);
    let mip2 = generate_mip(&mip0, width, height, 2);
    let mip3 = generate_mip(&mip0, width, height, 3);
    Ok(Bitmap {
        mips: [mip0, mip1, mip2, mip3],
        color_count: PALETTE_COLORS,
        palette,
    })
}

fn validate_dimensions(width: u32, height: u32) -> Result<(), MipTexError> {
    if width == 0 || height == 0 || width % 8 != 0 || height % 8 != 0 {
        return Err(MipTexError::InvalidDimensions { width, height });
    }
    Ok(())
}

fn pixel_count(width: u32, height: u32) -> Result<usize, MipTexError> {
    (width as usize)
        .checked_mul(height as usize)
        .ok_or(MipTexError::InvalidDimensions { width, height })
}

fn truncate_name(name: &str) -> String {
    name.chars().take(MAX_NAME_LEN).collect()
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32, MipTexError> {
    cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| MipTexError::Truncated)
}
