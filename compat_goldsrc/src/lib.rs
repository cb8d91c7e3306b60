//! Readers and writers for GoldSrc data files: version 30 maps, WAD3
//! texture archives, PACK data archives and the map entity block.
#![forbid(unsafe_code)]

pub mod archive;
pub mod bsp;
pub mod entities;
pub mod lump;
pub mod miptex;
pub mod pak;
pub mod records;
pub mod text;
pub mod wad;

pub use bsp::{BspError, BspFile};
pub use entities::{Entity, EntityError, EntityList};
pub use lump::{DecodeDepth, LumpKind, LumpOrder};
pub use miptex::{EncodeMode, MipTex, MipTexError, Palette};
