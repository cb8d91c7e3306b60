//! Fixed-layout little-endian records stored in map lumps.
//!
//! Array lumps are a plain concatenation of records with no per-array
//! header, so every record type only needs a size and a decode/encode pair.

use std::io::{self, Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

pub trait Record: Sized {
    const SIZE: usize;

    fn decode<R: Read>(reader: &mut R) -> io::Result<Self>;

    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()>;
}

/// Decodes `data.len() / T::SIZE` records. Callers check the length first.
pub fn decode_array<T: Record>(data: &[u8]) -> io::Result<Vec<T>> {
    let count = data.len() / T::SIZE;
    let mut cursor = Cursor::new(data);
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(T::decode(&mut cursor)?);
    }
    Ok(out)
}

pub fn encode_array<T: Record>(records: &[T]) -> Vec<u8> {
    let mut out = Vec::with_capacity(records.len() * T::SIZE);
    for record in records {
        // Writing into a Vec cannot fail.
        let _ = record.encode(&mut out);
    }
    out
}

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl Record for Vector3 {
    const SIZE: usize = 12;

    fn decode<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            x: reader.read_f32::<LittleEndian>()?,
            y: reader.read_f32::<LittleEndian>()?,
            z: reader.read_f32::<LittleEndian>()?,
        })
    }

    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_f32::<LittleEndian>(self.x)?;
        writer.write_f32::<LittleEndian>(self.y)?;
        writer.write_f32::<LittleEndian>(self.z)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct BoundingBox {
    pub min: Vector3,
    pub max: Vector3,
}

impl Record for BoundingBox {
    const SIZE: usize = 24;

    fn decode<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            min: Vector3::decode(reader)?,
            max: Vector3::decode(reader)?,
        })
    }

    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.min.encode(writer)?;
        self.max.encode(writer)
    }
}

/// Integer bounds used by nodes and leaves.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct ShortBoundingBox {
    pub min: [i16; 3],
    pub max: [i16; 3],
}

impl Record for ShortBoundingBox {
    const SIZE: usize = 12;

    fn decode<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut min = [0i16; 3];
        let mut max = [0i16; 3];
        reader.read_i16_into::<LittleEndian>(&mut min)?;
        reader.read_i16_into::<LittleEndian>(&mut max)?;
        Ok(Self { min, max })
    }

    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for value in self.min.iter().chain(self.max.iter()) {
            writer.write_i16::<LittleEndian>(*value)?;
        }
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Plane {
    pub normal: Vector3,
    pub distance: f32,
    /// Axial classification (0..=2 axial, 3..=5 snapped to nearest axis).
    pub kind: i32,
}

impl Record for Plane {
    const SIZE: usize = 20;

    fn decode<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            normal: Vector3::decode(reader)?,
            distance: reader.read_f32::<LittleEndian>()?,
            kind: reader.read_i32::<LittleEndian>()?,
        })
    }

    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.normal.encode(writer)?;
        writer.write_f32::<LittleEndian>(self.distance)?;
        writer.write_i32::<LittleEndian>(self.kind)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Node {
    pub plane: i32,
    /// Front and back child; negative values are `-(leaf + 1)`.
    pub children: [i16; 2],
    pub bounds: ShortBoundingBox,
    pub first_face: u16,
    pub face_count: u16,
}

impl Record for Node {
    const SIZE: usize = 24;

    fn decode<R: Read>(reader: &mut R) -> io::Result<Self> {
        let plane = reader.read_i32::<LittleEndian>()?;
        let mut children = [0i16; 2];
        reader.read_i16_into::<LittleEndian>(&mut children)?;
        Ok(Self {
            plane,
            children,
            bounds: ShortBoundingBox::decode(reader)?,
            first_face: reader.read_u16::<LittleEndian>()?,
            face_count: reader.read_u16::<LittleEndian>()?,
        })
    }

    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_i32::<LittleEndian>(self.plane)?;
        writer.write_i16::<LittleEndian>(self.children[0])?;
        writer.write_i16::<LittleEndian>(self.children[1])?;
        self.bounds.encode(writer)?;
        writer.write_u16::<LittleEndian>(self.first_face)?;
        writer.write_u16::<LittleEndian>(self.face_count)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct ClipNode {
    pub plane: i32,
    /// Negative children are contents values.
    pub children: [i16; 2],
}

impl Record for ClipNode {
    const SIZE: usize = 8;

    fn decode<R: Read>(reader: &mut R) -> io::Result<Self> {
        let plane = reader.read_i32::<LittleEndian>()?;
        let mut children = [0i16; 2];
        reader.read_i16_into::<LittleEndian>(&mut children)?;
        Ok(Self { plane, children })
    }

    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_i32::<LittleEndian>(self.plane)?;
        writer.write_i16::<LittleEndian>(self.children[0])?;
        writer.write_i16::<LittleEndian>(self.children[1])
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct TexInfo {
    pub s_axis: Vector3,
    pub s_shift: f32,
    pub t_axis: Vector3,
    pub t_shift: f32,
    /// Index into the texture table lump.
    pub miptex: u32,
    pub flags: u32,
}

impl Record for TexInfo {
    const SIZE: usize = 40;

    fn decode<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            s_axis: Vector3::decode(reader)?,
            s_shift: reader.read_f32::<LittleEndian>()?,
            t_axis: Vector3::decode(reader)?,
            t_shift: reader.read_f32::<LittleEndian>()?,
            miptex: reader.read_u32::<LittleEndian>()?,
            flags: reader.read_u32::<LittleEndian>()?,
        })
    }

    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.s_axis.encode(writer)?;
        writer.write_f32::<LittleEndian>(self.s_shift)?;
        self.t_axis.encode(writer)?;
        writer.write_f32::<LittleEndian>(self.t_shift)?;
        writer.write_u32::<LittleEndian>(self.miptex)?;
        writer.write_u32::<LittleEndian>(self.flags)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Face {
    pub plane: u16,
    pub side: u16,
    pub first_edge: i32,
    pub edge_count: u16,
    pub texinfo: u16,
    pub styles: [u8; 4],
    pub light_offset: i32,
}

impl Record for Face {
    const SIZE: usize = 20;

    fn decode<R: Read>(reader: &mut R) -> io::Result<Self> {
        let plane = reader.read_u16::<LittleEndian>()?;
        let side = reader.read_u16::<LittleEndian>()?;
        let first_edge = reader.read_i32::<LittleEndian>()?;
        let edge_count = reader.read_u16::<LittleEndian>()?;
        let texinfo = reader.read_u16::<LittleEndian>()?;
        let mut styles = [0u8; 4];
        reader.read_exact(&mut styles)?;
        Ok(Self {
            plane,
            side,
            first_edge,
            edge_count,
            texinfo,
            styles,
            light_offset: reader.read_i32::<LittleEndian>()?,
        })
    }

    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u16::<LittleEndian>(self.plane)?;
        writer.write_u16::<LittleEndian>(self.side)?;
        writer.write_i32::<LittleEndian>(self.first_edge)?;
        writer.write_u16::<LittleEndian>(self.edge_count)?;
        writer.write_u16::<LittleEndian>(self.texinfo)?;
        writer.write_all(&self.styles)?;
        writer.write_i32::<LittleEndian>(self.light_offset)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Edge {
    pub vertices: [u16; 2],
}

impl Record for Edge {
    const SIZE: usize = 4;

    fn decode<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut vertices = [0u16; 2];
        reader.read_u16_into::<LittleEndian>(&mut vertices)?;
        Ok(Self { vertices })
    }

    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u16::<LittleEndian>(self.vertices[0])?;
        writer.write_u16::<LittleEndian>(self.vertices[1])
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Leaf {
    pub contents: i32,
    /// Offset into the visibility lump, -1 when everything is visible.
    pub vis_offset: i32,
    pub bounds: ShortBoundingBox,
    pub first_mark_surface: u16,
    pub mark_surface_count: u16,
    pub ambient_levels: [u8; 4],
}

impl Record for Leaf {
    const SIZE: usize = 28;

    fn decode<R: Read>(reader: &mut R) -> io::Result<Self> {
        let contents = reader.read_i32::<LittleEndian>()?;
        let vis_offset = reader.read_i32::<LittleEndian>()?;
        let bounds = ShortBoundingBox::decode(reader)?;
        let first_mark_surface = reader.read_u16::<LittleEndian>()?;
        let mark_surface_count = reader.read_u16::<LittleEndian>()?;
        let mut ambient_levels = [0u8; 4];
        reader.read_exact(&mut ambient_levels)?;
        Ok(Self {
            contents,
            vis_offset,
            bounds,
            first_mark_surface,
            mark_surface_count,
            ambient_levels,
        })
    }

    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_i32::<LittleEndian>(self.contents)?;
        writer.write_i32::<LittleEndian>(self.vis_offset)?;
        self.bounds.encode(writer)?;
        writer.write_u16::<LittleEndian>(self.first_mark_surface)?;
        writer.write_u16::<LittleEndian>(self.mark_surface_count)?;
        writer.write_all(&self.ambient_levels)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Model {
    pub bounds: BoundingBox,
    pub origin: Vector3,
    pub head_nodes: [i32; 4],
    pub vis_leafs: i32,
    pub first_face: i32,
    pub face_count: i32,
}

impl Record for Model {
    const SIZE: usize = 64;

    fn decode<R: Read>(reader: &mut R) -> io::Result<Self> {
        let bounds = BoundingBox::decode(reader)?;
        let origin = Vector3::decode(reader)?;
        let mut head_nodes = [0i32; 4];
        reader.read_i32_into::<LittleEndian>(&mut head_nodes)?;
        Ok(Self {
            bounds,
            origin,
            head_nodes,
            vis_leafs: reader.read_i32::<LittleEndian>()?,
            first_face: reader.read_i32::<LittleEndian>()?,
            face_count: reader.read_i32::<LittleEndian>()?,
        })
    }

    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.bounds.encode(writer)?;
        self.origin.encode(writer)?;
        for node in self.head_nodes {
            writer.write_i32::<LittleEndian>(node)?;
        }
        writer.write_i32::<LittleEndian>(self.vis_leafs)?;
        writer.write_i32::<LittleEndian>(self.first_face)?;
        writer.write_i32::<LittleEndian>(self.face_count)
    }
}

impl Record for u16 {
    const SIZE: usize = 2;

    fn decode<R: Read>(reader: &mut R) -> io::Result<Self> {
        reader.read_u16::<LittleEndian>()
    }

    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u16::<LittleEndian>(*self)
    }
}

impl Record for i32 {
    const SIZE: usize = 4;

    fn decode<R: Read>(reader: &mut R) -> io::Result<Self> {
        reader.read_i32::<LittleEndian>()
    }

    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_i32::<LittleEndian>(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_record_size<T: Record + std::fmt::Debug>(value: T) {
        let bytes = encode_array(std::slice::from_ref(&value));
        assert_eq!(bytes.len(), T::SIZE);
    }

    #[test]
    fn encoded_sizes_match_layouts() {
        assert_record_size(Vector3::default());
        assert_record_size(BoundingBox::default());
        assert_record_size(ShortBoundingBox::default());
        assert_record_size(Plane::default());
        assert_record_size(Node::default());
        assert_record_size(ClipNode::default());
        assert_record_size(TexInfo::default());
        assert_record_size(Face::default());
        assert_record_size(Edge::default());
        assert_record_size(Leaf::default());
        assert_record_size(Model::default());
    }

    #[test]
    fn plane_field_order() {
        let mut data = Vec::new();
        data.extend_from_slice(&1.0f32.to_le_bytes());
        data.extend_from_slice(&0.0f32.to_le_bytes());
        data.extend_from_slice(&0.0f32.to_le_bytes());
        data.extend_from_slice(&64.0f32.to_le_bytes());
        data.extend_from_slice(&0i32.to_le_bytes());
        let planes: Vec<Plane> = decode_array(&data).expect("decode planes");
        assert_eq!(planes.len(), 1);
        assert_eq!(planes[0].normal, Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(planes[0].distance, 64.0);
        assert_eq!(encode_array(&planes), data);
    }

    #[test]
    fn face_preserves_bytes() {
        let data: Vec<u8> = (0u8..40).collect();
        let faces: Vec<Face> = decode_array(&data).expect("decode faces");
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[0].plane, u16::from_le_bytes([0, 1]));
        assert_eq!(faces[0].styles, [12, 13, 14, 15]);
        assert_eq!(encode_array(&faces), data);
    }

    #[test]
    fn leaf_and_model_preserve_bytes() {
        let data: Vec<u8> = (0u8..28).map(|b| b.wrapping_mul(7)).collect();
        let leaves: Vec<Leaf> = decode_array(&data).expect("decode leaves");
        assert_eq!(encode_array(&leaves), data);

        let mut model = Model::default();
        model.head_nodes = [1, -2, 3, -4];
        model.face_count = 9;
        let bytes = encode_array(&[model]);
        let decoded: Vec<Model> = decode_array(&bytes).expect("decode models");
        assert_eq!(decoded[0], model);
    }
}
