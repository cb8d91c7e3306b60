//! Map lumps: kinds, slot orders and the decoded payload of each lump.
//!
//! Every lump keeps the bytes it was loaded from. Only lumps that were
//! handed out mutably are re-encoded on dump; everything else goes back to
//! disk untouched.

use std::borrow::Cow;
use std::fmt;
use std::path::Path;

use crate::bsp::BspError;
use crate::entities::EntityList;
use crate::miptex::{EncodeMode, MipTex, MipTexError};
use crate::records::{
    decode_array, encode_array, ClipNode, Edge, Face, Leaf, Model, Node, Plane, Record, TexInfo,
    Vector3,
};

pub const LUMP_COUNT: usize = 15;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LumpKind {
    Entities,
    Planes,
    Textures,
    Vertices,
    Visibility,
    Nodes,
    TexInfo,
    Faces,
    Lighting,
    ClipNodes,
    Leaves,
    MarkSurfaces,
    Edges,
    SurfEdges,
    Models,
}

impl LumpKind {
    /// Slot order of the stock engine.
    pub const ALL: [LumpKind; LUMP_COUNT] = [
        LumpKind::Entities,
        LumpKind::Planes,
        LumpKind::Textures,
        LumpKind::Vertices,
        LumpKind::Visibility,
        LumpKind::Nodes,
        LumpKind::TexInfo,
        LumpKind::Faces,
        LumpKind::Lighting,
        LumpKind::ClipNodes,
        LumpKind::Leaves,
        LumpKind::MarkSurfaces,
        LumpKind::Edges,
        LumpKind::SurfEdges,
        LumpKind::Models,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LumpKind::Entities => "entities",
            LumpKind::Planes => "planes",
            LumpKind::Textures => "textures",
            LumpKind::Vertices => "vertices",
            LumpKind::Visibility => "visibility",
            LumpKind::Nodes => "nodes",
            LumpKind::TexInfo => "texinfo",
            LumpKind::Faces => "faces",
            LumpKind::Lighting => "lighting",
            LumpKind::ClipNodes => "clipnodes",
            LumpKind::Leaves => "leaves",
            LumpKind::MarkSurfaces => "marksurfaces",
            LumpKind::Edges => "edges",
            LumpKind::SurfEdges => "surfedges",
            LumpKind::Models => "models",
        }
    }

    /// Size of one record for lumps that are flat record arrays.
    pub fn record_size(self) -> Option<usize> {
        match self {
            LumpKind::Planes => Some(Plane::SIZE),
            LumpKind::Vertices => Some(Vector3::SIZE),
            LumpKind::Nodes => Some(Node::SIZE),
            LumpKind::TexInfo => Some(TexInfo::SIZE),
            LumpKind::Faces => Some(Face::SIZE),
            LumpKind::ClipNodes => Some(ClipNode::SIZE),
            LumpKind::Leaves => Some(Leaf::SIZE),
            LumpKind::MarkSurfaces => Some(u16::SIZE),
            LumpKind::Edges => Some(Edge::SIZE),
            LumpKind::SurfEdges => Some(i32::SIZE),
            LumpKind::Models => Some(Model::SIZE),
            LumpKind::Entities
            | LumpKind::Textures
            | LumpKind::Visibility
            | LumpKind::Lighting => None,
        }
    }
}

impl fmt::Display for LumpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which lump each header slot describes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum LumpOrder {
    #[default]
    Standard,
    /// Blue Shift stores the plane slot before the entity slot.
    BlueShift,
}

impl LumpOrder {
    pub fn slots(self) -> [LumpKind; LUMP_COUNT] {
        let mut slots = LumpKind::ALL;
        if self == LumpOrder::BlueShift {
            slots.swap(0, 1);
        }
        slots
    }

    /// Blue Shift when the map sits in a game directory named `bshift*`.
    pub fn guess(path: &Path) -> Self {
        let parent = path.parent();
        let game_dir = match parent.and_then(Path::file_name) {
            Some(name) if name.eq_ignore_ascii_case("maps") => parent.and_then(Path::parent),
            _ => parent,
        };
        let is_bshift = game_dir
            .and_then(Path::file_name)
            .and_then(|name| name.to_str())
            .map(|name| name.to_ascii_lowercase().starts_with("bshift"))
            .unwrap_or(false);
        if is_bshift {
            LumpOrder::BlueShift
        } else {
            LumpOrder::Standard
        }
    }
}

/// How much of a map is decoded on load.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum DecodeDepth {
    /// Entities and textures only.
    #[default]
    Basic,
    /// Every record lump as well. Lighting and visibility stay opaque.
    Full,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LumpData {
    Opaque,
    Entities(EntityList),
    Textures(Vec<MipTex>),
    Planes(Vec<Plane>),
    Vertices(Vec<Vector3>),
    Nodes(Vec<Node>),
    TexInfo(Vec<TexInfo>),
    Faces(Vec<Face>),
    ClipNodes(Vec<ClipNode>),
    Leaves(Vec<Leaf>),
    MarkSurfaces(Vec<u16>),
    Edges(Vec<Edge>),
    SurfEdges(Vec<i32>),
    Models(Vec<Model>),
}

/// A record type stored as a flat array in exactly one lump.
pub trait LumpRecord: Record {
    const KIND: LumpKind;

    fn records(data: &LumpData) -> Option<&[Self]>;
    fn records_mut(data: &mut LumpData) -> Option<&mut Vec<Self>>;
}

macro_rules! lump_record {
    ($ty:ty, $kind:ident) => {
        impl LumpRecord for $ty {
            const KIND: LumpKind = LumpKind::$kind;

            fn records(data: &LumpData) -> Option<&[Self]> {
                match data {
                    LumpData::$kind(records) => Some(records.as_slice()),
                    _ => None,
                }
            }

            fn records_mut(data: &mut LumpData) -> Option<&mut Vec<Self>> {
                match data {
                    LumpData::$kind(records) => Some(records),
                    _ => None,
                }
            }
        }
    };
}

lump_record!(Plane, Planes);
lump_record!(Vector3, Vertices);
lump_record!(Node, Nodes);
lump_record!(TexInfo, TexInfo);
lump_record!(Face, Faces);
lump_record!(ClipNode, ClipNodes);
lump_record!(Leaf, Leaves);
lump_record!(u16, MarkSurfaces);
lump_record!(Edge, Edges);
lump_record!(i32, SurfEdges);
lump_record!(Model, Models);

#[derive(Debug, Clone)]
pub struct Lump {
    kind: LumpKind,
    raw: Vec<u8>,
    data: LumpData,
    touched: bool,
}

impl Lump {
    pub fn decode(kind: LumpKind, raw: Vec<u8>, depth: DecodeDepth) -> Result<Self, BspError> {
        let data = match (kind, depth) {
            (LumpKind::Entities, _) => LumpData::Entities(EntityList::decode(&raw)?),
            (LumpKind::Textures, _) => LumpData::Textures(decode_textures(&raw)?),
            (LumpKind::Visibility | LumpKind::Lighting, _) | (_, DecodeDepth::Basic) => {
                LumpData::Opaque
            }
            (LumpKind::Planes, _) => LumpData::Planes(decode_records(&raw)?),
            (LumpKind::Vertices, _) => LumpData::Vertices(decode_records(&raw)?),
            (LumpKind::Nodes, _) => LumpData::Nodes(decode_records(&raw)?),
            (LumpKind::TexInfo, _) => LumpData::TexInfo(decode_records(&raw)?),
            (LumpKind::Faces, _) => LumpData::Faces(decode_records(&raw)?),
            (LumpKind::ClipNodes, _) => LumpData::ClipNodes(decode_records(&raw)?),
            (LumpKind::Leaves, _) => LumpData::Leaves(decode_records(&raw)?),
            (LumpKind::MarkSurfaces, _) => LumpData::MarkSurfaces(decode_records(&raw)?),
            (LumpKind::Edges, _) => LumpData::Edges(decode_records(&raw)?),
            (LumpKind::SurfEdges, _) => LumpData::SurfEdges(decode_records(&raw)?),
            (LumpKind::Models, _) => LumpData::Models(decode_records(&raw)?),
        };
        Ok(Self {
            kind,
            raw,
            data,
            touched: false,
        })
    }

    pub fn kind(&self) -> LumpKind {
        self.kind
    }

    /// Bytes the lump was loaded from.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn data(&self) -> &LumpData {
        &self.data
    }

    /// Mutable access marks the lump for re-encoding.
    pub fn data_mut(&mut self) -> &mut LumpData {
        self.touched = true;
        &mut self.data
    }

    pub fn is_touched(&self) -> bool {
        self.touched
    }

    pub fn is_decoded(&self) -> bool {
        !matches!(self.data, LumpData::Opaque)
    }

    /// Bytes to write for this lump.
    pub fn encode(&self, texture_mode: EncodeMode) -> Cow<'_, [u8]> {
        if !self.touched {
            return Cow::Borrowed(&self.raw);
        }
        match self.encode_data(texture_mode) {
            Some(bytes) => Cow::Owned(bytes),
            None => Cow::Borrowed(&self.raw),
        }
    }

    /// Whether the lump was touched and now encodes differently. Textures
    /// compare in dirty mode, the only mode that can match the original.
    pub fn changed(&self) -> bool {
        self.touched
            && self
                .encode_data(EncodeMode::Dirty)
                .map(|bytes| bytes != self.raw)
                .unwrap_or(false)
    }

    fn encode_data(&self, texture_mode: EncodeMode) -> Option<Vec<u8>> {
        let bytes = match &self.data {
            LumpData::Opaque => return None,
            LumpData::Entities(entities) => entities.encode(),
            LumpData::Textures(textures) => encode_textures(textures, texture_mode),
            LumpData::Planes(records) => encode_array(records),
            LumpData::Vertices(records) => encode_array(records),
            LumpData::Nodes(records) => encode_array(records),
            LumpData::TexInfo(records) => encode_array(records),
            LumpData::Faces(records) => encode_array(records),
            LumpData::ClipNodes(records) => encode_array(records),
            LumpData::Leaves(records) => encode_array(records),
            LumpData::MarkSurfaces(records) => encode_array(records),
            LumpData::Edges(records) => encode_array(records),
            LumpData::SurfEdges(records) => encode_array(records),
            LumpData::Models(records) => encode_array(records),
        };
        Some(bytes)
    }
}

fn decode_records<T: LumpRecord>(raw: &[u8]) -> Result<Vec<T>, BspError> {
    if raw.len() % T::SIZE != 0 {
        return Err(BspError::InvalidLumpSize {
            lump: T::KIND,
            size: raw.len(),
            stride: T::SIZE,
        });
    }
    decode_array(raw).map_err(|_| BspError::Truncated)
}

/// Texture lump: record count, one offset per record, then the records.
/// A record runs up to the next record's offset (or the end of the lump).
pub fn decode_textures(raw: &[u8]) -> Result<Vec<MipTex>, BspError> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    let count = raw
        .get(0..4)
        .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(BspError::InvalidTextureDirectory { count: 0 })?;
    let header_len = usize::try_from(count)
        .ok()
        .and_then(|n| n.checked_mul(4))
        .and_then(|n| n.checked_add(4))
        .filter(|len| *len <= raw.len())
        .ok_or(BspError::InvalidTextureDirectory { count })?;

    let offsets: Vec<i32> = raw[4..header_len]
        .chunks_exact(4)
        .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    let mut textures = Vec::with_capacity(offsets.len());
    for (index, &offset) in offsets.iter().enumerate() {
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        let end = offsets
            .get(index + 1)
            .and_then(|next| usize::try_from(*next).ok())
            .unwrap_or(raw.len());
        let record = raw.get(start..end).ok_or(BspError::Texture {
            index,
            source: MipTexError::Truncated,
        })?;
        let texture =
            MipTex::decode(record).map_err(|source| BspError::Texture { index, source })?;
        textures.push(texture);
    }
    Ok(textures)
}

pub fn encode_textures(textures: &[MipTex], mode: EncodeMode) -> Vec<u8> {
    let records: Vec<Vec<u8>> = textures.iter().map(|tex| tex.encode(mode)).collect();
    let header_len = 4 + records.len() * 4;
    let total = header_len + records.iter().map(Vec::len).sum::<usize>();

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&(records.len() as i32).to_le_bytes());
    let mut offset = header_len;
    for record in &records {
        out.extend_from_slice(&(offset as i32).to_le_bytes());
        offset += record.len();
    }
    for record in &records {
        out.extend_from_slice(record);
    }
    out
}
