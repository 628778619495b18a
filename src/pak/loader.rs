//! # BSP version 29 loader
//!
//! * Decodes the 15-lump brush-model format into a [`BrushModel`].
//! * Every record array is decoded with **bincode 2** after its lump size
//!   is validated against the record stride, so a truncated or misaligned
//!   lump is a typed error instead of a wild slice.
//! * Performs every load-time derivation the renderer expects:
//!   plane sign bits, texinfo mip bias, texel-space surface extents,
//!   sky / turbulence flagging and BSP parent back-links.

use bincode::{Decode, config, decode_from_slice};
use byteorder::{LittleEndian as LE, ReadBytesExt};
use glam::{Vec3, vec3};
use thiserror::Error;

use crate::defs::{MAX_LIGHT_MAPS, MIP_LEVELS, SurfaceFlags, TexFlags};
use crate::world::{
    BrushModel, ChildRef, ClipNode, Edge, Leaf, MipTexture, Node, Plane, Submodel, Surface,
    TILED_UV_EXTENT, TILED_UV_MIN, TexInfo, Vertex,
};

/// The only supported on-disk version.
pub const BSP_VERSION: i32 = 29;

/// Largest allowed texel extent of a subdividable surface.
const MAX_SURFACE_EXTENT: i16 = 256;

/// Lump directory slots, in file order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
enum LumpKind {
    Entity = 0,
    Plane,
    Texture,
    Vertex,
    Visibility,
    Node,
    TexInfo,
    Face,
    Lighting,
    ClipNode,
    Leaf,
    Marksurface,
    Edge,
    Surfedge,
    Submodel,
}

const LUMP_COUNT: usize = 15;

#[derive(Clone, Copy, Debug, Default)]
struct Lump {
    offset: i32,
    length: i32,
}

/// Loader errors; all of them mean the input is corrupt and the load
/// aborts - there is no partial model.
#[derive(Error, Debug)]
pub enum BspError {
    #[error("BSP header truncated")]
    TruncatedHeader,

    #[error("wrong BSP version {0}, expected {BSP_VERSION}")]
    BadVersion(i32),

    #[error("{name} lump {offset}+{length} extends past end of file ({file_size})")]
    LumpOutOfBounds {
        name: &'static str,
        offset: i32,
        length: i32,
        file_size: usize,
    },

    #[error("{name} lump size {size} not a multiple of record stride {stride}")]
    BadLumpSize {
        name: &'static str,
        size: usize,
        stride: usize,
    },

    #[error("{name} lump, record {index}: {source}")]
    BadRecord {
        name: &'static str,
        index: usize,
        source: bincode::error::DecodeError,
    },

    #[error("texture lump is corrupt")]
    CorruptTextureLump,

    #[error("texture `{0}` has dimensions not multiples of 16")]
    UnalignedTexture(String),

    #[error("texinfo {0} references miptex {1} out of range")]
    MipIndexOutOfRange(usize, i32),

    #[error("face {0} references data out of range")]
    FaceOutOfRange(usize),

    #[error("face {0} has degenerate or oversized uv extents")]
    BadSurfaceExtents(usize),

    #[error("marksurface {0} references surface {1} out of range")]
    BadMarksurface(usize, u16),

    #[error("node {0} child reference out of range")]
    BadNodeChild(usize),

    #[error("leaf {0} visibility offset out of range")]
    BadVisOffset(usize),
}

/*──────────────────────── on-disk record layouts ─────────────────────*/

#[derive(Decode)]
struct PlaneDisk {
    normal: [f32; 3],
    distance: f32,
    kind: i32,
}
const PLANE_STRIDE: usize = 20;

#[derive(Decode)]
struct VertexDisk {
    position: [f32; 3],
}
const VERTEX_STRIDE: usize = 12;

#[derive(Decode)]
struct EdgeDisk {
    verts: [u16; 2],
}
const EDGE_STRIDE: usize = 4;

#[derive(Decode)]
struct SurfedgeDisk {
    index: i32,
}
const SURFEDGE_STRIDE: usize = 4;

#[derive(Decode)]
struct TexInfoDisk {
    vecs: [[f32; 4]; 2],
    miptex: i32,
    flags: i32,
}
const TEXINFO_STRIDE: usize = 40;

#[derive(Decode)]
struct FaceDisk {
    plane: i16,
    side: i16,
    first_edge: i32,
    num_edge: i16,
    tex_info: i16,
    styles: [u8; MAX_LIGHT_MAPS],
    light_offset: i32,
}
const FACE_STRIDE: usize = 20;

#[derive(Decode)]
struct LeafDisk {
    contents: i32,
    vis_offset: i32,
    mins: [i16; 3],
    maxs: [i16; 3],
    first_marksurface: u16,
    num_marksurface: u16,
    ambient: [u8; 4],
}
const LEAF_STRIDE: usize = 28;

#[derive(Decode)]
struct NodeDisk {
    plane: i32,
    children: [i16; 2],
    mins: [i16; 3],
    maxs: [i16; 3],
    first_face: u16,
    num_face: u16,
}
const NODE_STRIDE: usize = 24;

#[derive(Decode)]
struct ClipNodeDisk {
    plane: i32,
    children: [i16; 2],
}
const CLIPNODE_STRIDE: usize = 8;

#[derive(Decode)]
struct SubmodelDisk {
    min: [f32; 3],
    max: [f32; 3],
    origin: [f32; 3],
    head_nodes: [i32; 4],
    visible_leaves: i32,
    first_face: i32,
    num_face: i32,
}
const SUBMODEL_STRIDE: usize = 64;

#[derive(Decode)]
struct MarksurfaceDisk {
    surface: u16,
}
const MARKSURFACE_STRIDE: usize = 2;

/*──────────────────────────── entry point ────────────────────────────*/

/// Parse a whole BSP file image into a [`BrushModel`].
pub fn load_brush_model(bytes: &[u8]) -> Result<BrushModel, BspError> {
    let mut header = bytes;
    let version = header
        .read_i32::<LE>()
        .map_err(|_| BspError::TruncatedHeader)?;
    if version != BSP_VERSION {
        return Err(BspError::BadVersion(version));
    }

    let mut lumps = [Lump::default(); LUMP_COUNT];
    for lump in lumps.iter_mut() {
        lump.offset = header
            .read_i32::<LE>()
            .map_err(|_| BspError::TruncatedHeader)?;
        lump.length = header
            .read_i32::<LE>()
            .map_err(|_| BspError::TruncatedHeader)?;
    }

    let lump_bytes = |kind: LumpKind, name: &'static str| -> Result<&[u8], BspError> {
        let l = lumps[kind as usize];
        let start = l.offset as usize;
        let end = start.wrapping_add(l.length as usize);
        if l.offset < 0 || l.length < 0 || end > bytes.len() {
            return Err(BspError::LumpOutOfBounds {
                name,
                offset: l.offset,
                length: l.length,
                file_size: bytes.len(),
            });
        }
        Ok(&bytes[start..end])
    };

    let mut model = BrushModel::default();

    load_vertices(&mut model, lump_bytes(LumpKind::Vertex, "vertex")?)?;
    load_edges(&mut model, lump_bytes(LumpKind::Edge, "edge")?)?;
    load_surfedges(&mut model, lump_bytes(LumpKind::Surfedge, "surfedge")?)?;
    load_textures(&mut model, lump_bytes(LumpKind::Texture, "texture")?)?;
    model.light_data = lump_bytes(LumpKind::Lighting, "lighting")?.to_vec();
    load_planes(&mut model, lump_bytes(LumpKind::Plane, "plane")?)?;
    load_tex_infos(&mut model, lump_bytes(LumpKind::TexInfo, "texinfo")?)?;
    load_faces(&mut model, lump_bytes(LumpKind::Face, "face")?)?;
    load_marksurfaces(&mut model, lump_bytes(LumpKind::Marksurface, "marksurface")?)?;
    model.visibility = lump_bytes(LumpKind::Visibility, "visibility")?.to_vec();
    load_leaves(&mut model, lump_bytes(LumpKind::Leaf, "leaf")?)?;
    load_nodes(&mut model, lump_bytes(LumpKind::Node, "node")?)?;
    load_clipnodes(&mut model, lump_bytes(LumpKind::ClipNode, "clipnode")?)?;
    load_entities(&mut model, lump_bytes(LumpKind::Entity, "entity")?);
    load_submodels(&mut model, lump_bytes(LumpKind::Submodel, "submodel")?)?;

    link_parents(&mut model);

    Ok(model)
}

/*──────────────────────── generic record decoding ────────────────────*/

fn lump_to_vec<T: Decode<()>>(
    data: &[u8],
    name: &'static str,
    stride: usize,
) -> Result<Vec<T>, BspError> {
    if data.len() % stride != 0 {
        return Err(BspError::BadLumpSize {
            name,
            size: data.len(),
            stride,
        });
    }

    let cfg = config::standard()
        .with_fixed_int_encoding()
        .with_little_endian();

    let mut out = Vec::with_capacity(data.len() / stride);
    for (index, chunk) in data.chunks_exact(stride).enumerate() {
        let (val, _read) = decode_from_slice::<T, _>(chunk, cfg)
            .map_err(|source| BspError::BadRecord { name, index, source })?;
        out.push(val);
    }
    Ok(out)
}

/*──────────────────────────── per-lump loaders ───────────────────────*/

fn load_vertices(model: &mut BrushModel, data: &[u8]) -> Result<(), BspError> {
    let disk: Vec<VertexDisk> = lump_to_vec(data, "vertex", VERTEX_STRIDE)?;
    model.vertices = disk
        .into_iter()
        .map(|v| Vertex {
            position: Vec3::from_array(v.position),
        })
        .collect();
    Ok(())
}

fn load_edges(model: &mut BrushModel, data: &[u8]) -> Result<(), BspError> {
    let disk: Vec<EdgeDisk> = lump_to_vec(data, "edge", EDGE_STRIDE)?;
    model.edges = disk
        .into_iter()
        .map(|e| Edge {
            verts: e.verts,
            cache: Default::default(),
        })
        .collect();
    Ok(())
}

fn load_surfedges(model: &mut BrushModel, data: &[u8]) -> Result<(), BspError> {
    let disk: Vec<SurfedgeDisk> = lump_to_vec(data, "surfedge", SURFEDGE_STRIDE)?;
    model.surfedges = disk.into_iter().map(|s| s.index).collect();
    Ok(())
}

fn load_planes(model: &mut BrushModel, data: &[u8]) -> Result<(), BspError> {
    let disk: Vec<PlaneDisk> = lump_to_vec(data, "plane", PLANE_STRIDE)?;
    model.planes = disk
        .into_iter()
        .map(|p| Plane::new(Vec3::from_array(p.normal), p.distance, p.kind as u8))
        .collect();
    Ok(())
}

/// The texture lump is self-describing: a count, a table of offsets (−1 =
/// missing), and one mip-texture header + pyramid per entry.
fn load_textures(model: &mut BrushModel, data: &[u8]) -> Result<(), BspError> {
    model.textures.clear();
    if data.is_empty() {
        return Ok(());
    }

    let mut cursor = data;
    let count = cursor
        .read_i32::<LE>()
        .map_err(|_| BspError::CorruptTextureLump)?;
    if count < 0 || data.len() < 4 + count as usize * 4 {
        return Err(BspError::CorruptTextureLump);
    }

    for _ in 0..count {
        let offset = cursor
            .read_i32::<LE>()
            .map_err(|_| BspError::CorruptTextureLump)?;
        if offset < 0 {
            model.textures.push(MipTexture::default_checker());
            continue;
        }

        let base = offset as usize;
        if base + 40 > data.len() {
            return Err(BspError::CorruptTextureLump);
        }
        let header = &data[base..];
        let name_end = header[..16].iter().position(|&b| b == 0).unwrap_or(16);
        let name = String::from_utf8_lossy(&header[..name_end]).into_owned();
        let mut rest = &header[16..];
        let width = rest.read_u32::<LE>().map_err(|_| BspError::CorruptTextureLump)?;
        let height = rest.read_u32::<LE>().map_err(|_| BspError::CorruptTextureLump)?;
        let mut offsets = [0u32; MIP_LEVELS];
        for o in offsets.iter_mut() {
            *o = rest.read_u32::<LE>().map_err(|_| BspError::CorruptTextureLump)?;
        }

        if width & 15 != 0 || height & 15 != 0 {
            return Err(BspError::UnalignedTexture(name));
        }

        let mut mips: [Vec<u8>; MIP_LEVELS] = Default::default();
        for (m, level) in mips.iter_mut().enumerate() {
            let size = ((width >> m) * (height >> m)) as usize;
            let start = base + offsets[m] as usize;
            let end = start + size;
            if end > data.len() {
                return Err(BspError::CorruptTextureLump);
            }
            *level = data[start..end].to_vec();
        }

        model.textures.push(MipTexture {
            name,
            width,
            height,
            mips,
        });
    }
    Ok(())
}

fn load_tex_infos(model: &mut BrushModel, data: &[u8]) -> Result<(), BspError> {
    let disk: Vec<TexInfoDisk> = lump_to_vec(data, "texinfo", TEXINFO_STRIDE)?;

    // maps without a texture lump still need something to sample
    let had_textures = !model.textures.is_empty();
    if !had_textures && !disk.is_empty() {
        model.textures.push(MipTexture::default_checker());
    }

    model.tex_infos = Vec::with_capacity(disk.len());
    for (i, t) in disk.into_iter().enumerate() {
        let u_axis = vec3(t.vecs[0][0], t.vecs[0][1], t.vecs[0][2]);
        let v_axis = vec3(t.vecs[1][0], t.vecs[1][1], t.vecs[1][2]);

        // classify how texel density relates to world units; short axes
        // mean magnified textures that want finer mips for longer
        let length = (u_axis.length() + v_axis.length()) / 2.0;
        let mip_adjust = if length < 0.32 {
            4.0
        } else if length < 0.49 {
            3.0
        } else if length < 0.99 {
            2.0
        } else {
            1.0
        };

        let (texture, flags) = if !had_textures {
            (0, TexFlags::empty())
        } else {
            if t.miptex < 0 || t.miptex as usize >= model.textures.len() {
                return Err(BspError::MipIndexOutOfRange(i, t.miptex));
            }
            (t.miptex as u32, TexFlags::from_bits_truncate(t.flags as u32))
        };

        model.tex_infos.push(TexInfo {
            u_axis,
            u_offset: t.vecs[0][3],
            v_axis,
            v_offset: t.vecs[1][3],
            texture,
            mip_adjust,
            flags,
        });
    }
    Ok(())
}

/// Texel-space bounds of a face, discretised to multiples of 16.
fn calc_uv_extents(
    model: &BrushModel,
    face: usize,
    first_edge: i32,
    num_edge: i16,
    tex_info: &TexInfo,
) -> Result<([i16; 2], [i16; 2]), BspError> {
    let mut min = [f32::MAX; 2];
    let mut max = [f32::MIN; 2];

    for i in 0..num_edge as usize {
        let se = *model
            .surfedges
            .get((first_edge as usize) + i)
            .ok_or(BspError::FaceOutOfRange(face))?;
        let edge = model
            .edges
            .get(se.unsigned_abs() as usize)
            .ok_or(BspError::FaceOutOfRange(face))?;
        let vert = if se >= 0 { edge.verts[0] } else { edge.verts[1] };
        let pos = model
            .vertices
            .get(vert as usize)
            .ok_or(BspError::FaceOutOfRange(face))?
            .position;

        let u = pos.dot(tex_info.u_axis) + tex_info.u_offset;
        let v = pos.dot(tex_info.v_axis) + tex_info.v_offset;
        min[0] = min[0].min(u);
        max[0] = max[0].max(u);
        min[1] = min[1].min(v);
        max[1] = max[1].max(v);
    }

    let mut uv_min = [0i16; 2];
    let mut uv_extents = [0i16; 2];
    for i in 0..2 {
        let bmin = (min[i] / 16.0).floor() as i32;
        let bmax = (max[i] / 16.0).ceil() as i32;
        uv_min[i] = (bmin * 16) as i16;
        uv_extents[i] = ((bmax - bmin) * 16) as i16;

        if uv_extents[i] <= 0 {
            return Err(BspError::BadSurfaceExtents(face));
        }
        if !tex_info.flags.contains(TexFlags::SPECIAL) && uv_extents[i] > MAX_SURFACE_EXTENT {
            return Err(BspError::BadSurfaceExtents(face));
        }
    }
    Ok((uv_min, uv_extents))
}

fn load_faces(model: &mut BrushModel, data: &[u8]) -> Result<(), BspError> {
    let disk: Vec<FaceDisk> = lump_to_vec(data, "face", FACE_STRIDE)?;

    model.surfaces = Vec::with_capacity(disk.len());
    for (i, f) in disk.into_iter().enumerate() {
        if f.plane < 0 || f.plane as usize >= model.planes.len() {
            return Err(BspError::FaceOutOfRange(i));
        }
        if f.tex_info < 0 || f.tex_info as usize >= model.tex_infos.len() {
            return Err(BspError::FaceOutOfRange(i));
        }
        let tex_info = model.tex_infos[f.tex_info as usize].clone();

        let mut flags = SurfaceFlags::empty();
        if f.side != 0 {
            flags |= SurfaceFlags::PLANE_BACK;
        }

        let (mut uv_min, mut uv_extents) =
            calc_uv_extents(model, i, f.first_edge, f.num_edge, &tex_info)?;

        let samples = if f.light_offset < 0 {
            None
        } else if (f.light_offset as usize) < model.light_data.len() {
            Some(f.light_offset as u32)
        } else {
            return Err(BspError::FaceOutOfRange(i));
        };

        // drawing style follows the texture's naming convention
        let tex_name = &model.textures[tex_info.texture as usize].name;
        if tex_name.starts_with("sky") {
            flags |= SurfaceFlags::DRAW_SKY | SurfaceFlags::DRAW_TILED;
        } else if tex_name.starts_with('*') {
            flags |= SurfaceFlags::DRAW_TURB | SurfaceFlags::DRAW_TILED;
            uv_min = [TILED_UV_MIN; 2];
            uv_extents = [TILED_UV_EXTENT; 2];
        }

        model.surfaces.push(Surface {
            plane: f.plane as u32,
            tex_info: f.tex_info as u32,
            flags,
            first_edge: f.first_edge as u32,
            num_edge: f.num_edge as u32,
            uv_min,
            uv_extents,
            styles: f.styles,
            samples,
            visible_frame: -1,
            light_frame: -1,
            light_bits: 0,
            cachespots: [None; MIP_LEVELS],
        });
    }
    Ok(())
}

fn load_marksurfaces(model: &mut BrushModel, data: &[u8]) -> Result<(), BspError> {
    let disk: Vec<MarksurfaceDisk> = lump_to_vec(data, "marksurface", MARKSURFACE_STRIDE)?;
    model.marksurfaces = Vec::with_capacity(disk.len());
    for (i, m) in disk.into_iter().enumerate() {
        if m.surface as usize >= model.surfaces.len() {
            return Err(BspError::BadMarksurface(i, m.surface));
        }
        model.marksurfaces.push(m.surface as u32);
    }
    Ok(())
}

fn load_leaves(model: &mut BrushModel, data: &[u8]) -> Result<(), BspError> {
    let disk: Vec<LeafDisk> = lump_to_vec(data, "leaf", LEAF_STRIDE)?;
    model.leaves = Vec::with_capacity(disk.len());
    for (i, l) in disk.into_iter().enumerate() {
        let vis_offset = if l.vis_offset < 0 {
            None
        } else if (l.vis_offset as usize) < model.visibility.len() {
            Some(l.vis_offset as u32)
        } else {
            return Err(BspError::BadVisOffset(i));
        };

        model.leaves.push(Leaf {
            contents: l.contents,
            minmax: [
                l.mins[0], l.mins[1], l.mins[2], l.maxs[0], l.maxs[1], l.maxs[2],
            ],
            first_marksurface: l.first_marksurface as u32,
            num_marksurface: l.num_marksurface as u32,
            vis_offset,
            ambient_sound: l.ambient,
            key: 0,
            visible_frame: -1,
            parent: None,
        });
    }
    Ok(())
}

fn load_nodes(model: &mut BrushModel, data: &[u8]) -> Result<(), BspError> {
    let disk: Vec<NodeDisk> = lump_to_vec(data, "node", NODE_STRIDE)?;
    let num_nodes = disk.len();
    model.nodes = Vec::with_capacity(num_nodes);
    for (i, n) in disk.into_iter().enumerate() {
        if n.plane < 0 || n.plane as usize >= model.planes.len() {
            return Err(BspError::BadNodeChild(i));
        }
        for &c in &n.children {
            match ChildRef::decode(c as i32) {
                ChildRef::Node(idx) if (idx as usize) < num_nodes => {}
                ChildRef::Leaf(idx) if (idx as usize) < model.leaves.len() => {}
                _ => return Err(BspError::BadNodeChild(i)),
            }
        }
        model.nodes.push(Node {
            plane: n.plane as u32,
            children: [n.children[0] as i32, n.children[1] as i32],
            minmax: [
                n.mins[0], n.mins[1], n.mins[2], n.maxs[0], n.maxs[1], n.maxs[2],
            ],
            first_surface: n.first_face as u32,
            num_surface: n.num_face as u32,
            visible_frame: -1,
            parent: None,
        });
    }
    Ok(())
}

fn load_clipnodes(model: &mut BrushModel, data: &[u8]) -> Result<(), BspError> {
    let disk: Vec<ClipNodeDisk> = lump_to_vec(data, "clipnode", CLIPNODE_STRIDE)?;
    model.clipnodes = disk
        .into_iter()
        .map(|c| ClipNode {
            plane: c.plane as u32,
            children: c.children,
        })
        .collect();
    Ok(())
}

fn load_entities(model: &mut BrushModel, data: &[u8]) {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    model.entities = String::from_utf8_lossy(&data[..end]).into_owned();
}

fn load_submodels(model: &mut BrushModel, data: &[u8]) -> Result<(), BspError> {
    let disk: Vec<SubmodelDisk> = lump_to_vec(data, "submodel", SUBMODEL_STRIDE)?;
    model.submodels = disk
        .into_iter()
        .map(|s| Submodel {
            // expand by one unit so content inside the walls stays inside
            min: Vec3::from_array(s.min) - Vec3::ONE,
            max: Vec3::from_array(s.max) + Vec3::ONE,
            origin: Vec3::from_array(s.origin),
            head_nodes: s.head_nodes,
            visible_leaves: s.visible_leaves,
            first_face: s.first_face as u32,
            num_face: s.num_face as u32,
        })
        .collect();
    Ok(())
}

/// Fill in the parent back-links the PVS marker walks upward.
fn link_parents(model: &mut BrushModel) {
    if model.nodes.is_empty() {
        return;
    }
    let mut stack: Vec<(i32, Option<u32>)> = vec![(0, None)];
    while let Some((raw, parent)) = stack.pop() {
        match ChildRef::decode(raw) {
            ChildRef::Leaf(idx) => model.leaves[idx as usize].parent = parent,
            ChildRef::Node(idx) => {
                model.nodes[idx as usize].parent = parent;
                let children = model.nodes[idx as usize].children;
                stack.push((children[0], Some(idx)));
                stack.push((children[1], Some(idx)));
            }
        }
    }
}

/*======================================================================*/
/*                               Tests                                  */
/*======================================================================*/
#[cfg(test)]
mod tests {
    use super::*;

    /// Serialize a minimal one-face world into a BSP v29 image.
    ///
    /// Geometry: a single quad on the plane y = 64, one node, a solid and
    /// an empty leaf.
    fn build_test_bsp(texture_name: &[u8]) -> Vec<u8> {
        let mut lump_data: Vec<Vec<u8>> = vec![Vec::new(); LUMP_COUNT];

        // entities
        lump_data[LumpKind::Entity as usize] = b"{ \"classname\" \"worldspawn\" }\0".to_vec();

        // planes: y = 64
        let mut planes = Vec::new();
        for v in [0.0f32, 1.0, 0.0, 64.0] {
            planes.extend(v.to_le_bytes());
        }
        planes.extend(1i32.to_le_bytes()); // PLANE_Y
        lump_data[LumpKind::Plane as usize] = planes;

        // one 16x16 texture with a 4-level pyramid
        let mut tex = Vec::new();
        tex.extend(1i32.to_le_bytes()); // count
        tex.extend(8i32.to_le_bytes()); // offset of the first (only) header
        let mut name = [0u8; 16];
        name[..texture_name.len()].copy_from_slice(texture_name);
        tex.extend(name);
        tex.extend(16u32.to_le_bytes());
        tex.extend(16u32.to_le_bytes());
        let mut ofs = 40u32;
        for m in 0..4 {
            tex.extend(ofs.to_le_bytes());
            ofs += (16u32 >> m) * (16u32 >> m);
        }
        for m in 0..4usize {
            tex.extend(std::iter::repeat_n(7u8, (16 >> m) * (16 >> m)));
        }
        lump_data[LumpKind::Texture as usize] = tex;

        // vertices: quad corners
        let corners = [
            [-32.0f32, 64.0, 0.0],
            [32.0, 64.0, 0.0],
            [32.0, 64.0, 64.0],
            [-32.0, 64.0, 64.0],
        ];
        let mut verts = Vec::new();
        for c in corners {
            for v in c {
                verts.extend(v.to_le_bytes());
            }
        }
        lump_data[LumpKind::Vertex as usize] = verts;

        // edges: reserved edge 0 plus the quad loop
        let mut edges = Vec::new();
        for pair in [[0u16, 0], [0, 1], [1, 2], [2, 3], [3, 0]] {
            edges.extend(pair[0].to_le_bytes());
            edges.extend(pair[1].to_le_bytes());
        }
        lump_data[LumpKind::Edge as usize] = edges;

        let mut surfedges = Vec::new();
        for se in [1i32, 2, 3, 4] {
            surfedges.extend(se.to_le_bytes());
        }
        lump_data[LumpKind::Surfedge as usize] = surfedges;

        // texinfo: u along +x, v along -z
        let mut ti = Vec::new();
        for v in [1.0f32, 0.0, 0.0, 0.0] {
            ti.extend(v.to_le_bytes());
        }
        for v in [0.0f32, 0.0, -1.0, 0.0] {
            ti.extend(v.to_le_bytes());
        }
        ti.extend(0i32.to_le_bytes()); // miptex
        ti.extend(0i32.to_le_bytes()); // flags
        lump_data[LumpKind::TexInfo as usize] = ti;

        // lighting: a few samples, face points at offset 0
        lump_data[LumpKind::Lighting as usize] = vec![128u8; 64];

        // face
        let mut face = Vec::new();
        face.extend(0i16.to_le_bytes()); // plane
        face.extend(1i16.to_le_bytes()); // side (back)
        face.extend(0i32.to_le_bytes()); // first edge
        face.extend(4i16.to_le_bytes()); // num edges
        face.extend(0i16.to_le_bytes()); // texinfo
        face.extend([0u8, 255, 255, 255]); // styles
        face.extend(0i32.to_le_bytes()); // light offset
        lump_data[LumpKind::Face as usize] = face;

        // marksurfaces
        lump_data[LumpKind::Marksurface as usize] = 0u16.to_le_bytes().to_vec();

        // visibility: empty (leaves carry -1)
        lump_data[LumpKind::Visibility as usize] = Vec::new();

        // leaves: solid + empty
        let mut leaves = Vec::new();
        for contents in [-2i32, -1] {
            leaves.extend(contents.to_le_bytes());
            leaves.extend((-1i32).to_le_bytes()); // vis offset
            for v in [-32i16, 0, 0, 32, 64, 64] {
                leaves.extend(v.to_le_bytes());
            }
            leaves.extend(0u16.to_le_bytes());
            leaves.extend(if contents == -1 { 1u16 } else { 0u16 }.to_le_bytes());
            leaves.extend([0u8; 4]);
        }
        lump_data[LumpKind::Leaf as usize] = leaves;

        // one node: front -> empty leaf, back -> solid leaf
        let mut node = Vec::new();
        node.extend(0i32.to_le_bytes());
        node.extend((-2i16).to_le_bytes()); // leaf 1
        node.extend((-1i16).to_le_bytes()); // leaf 0
        for v in [-32i16, 0, 0, 32, 64, 64] {
            node.extend(v.to_le_bytes());
        }
        node.extend(0u16.to_le_bytes());
        node.extend(1u16.to_le_bytes());
        lump_data[LumpKind::Node as usize] = node;

        // clipnodes: one, both children solid
        let mut cn = Vec::new();
        cn.extend(0i32.to_le_bytes());
        cn.extend((-2i16).to_le_bytes());
        cn.extend((-2i16).to_le_bytes());
        lump_data[LumpKind::ClipNode as usize] = cn;

        // one submodel covering the world
        let mut sm = Vec::new();
        for v in [-32.0f32, 0.0, 0.0, 32.0, 64.0, 64.0, 0.0, 0.0, 0.0] {
            sm.extend(v.to_le_bytes());
        }
        for v in [0i32, 0, 0, 0, 1, 0, 1] {
            sm.extend(v.to_le_bytes());
        }
        lump_data[LumpKind::Submodel as usize] = sm;

        // assemble: header + lump directory + data
        let header_size = 4 + LUMP_COUNT * 8;
        let mut offsets = Vec::with_capacity(LUMP_COUNT);
        let mut running = header_size;
        for data in &lump_data {
            offsets.push(running);
            running += data.len();
        }

        let mut bsp = Vec::with_capacity(running);
        bsp.extend(BSP_VERSION.to_le_bytes());
        for (i, data) in lump_data.iter().enumerate() {
            bsp.extend((offsets[i] as i32).to_le_bytes());
            bsp.extend((data.len() as i32).to_le_bytes());
        }
        for data in &lump_data {
            bsp.extend(data);
        }
        bsp
    }

    #[test]
    fn loads_the_test_world() {
        let model = load_brush_model(&build_test_bsp(b"wall1")).unwrap();
        assert_eq!(model.vertices.len(), 4);
        assert_eq!(model.surfaces.len(), 1);
        assert_eq!(model.nodes.len(), 1);
        assert_eq!(model.leaves.len(), 2);
        assert_eq!(model.textures.len(), 1);
        assert_eq!(model.textures[0].name, "wall1");

        let s = &model.surfaces[0];
        assert!(s.flags.contains(SurfaceFlags::PLANE_BACK));
        assert_eq!(s.uv_min, [-32, -64]);
        assert_eq!(s.uv_extents, [64, 64]);
        assert_eq!(s.styles[0], 0);
        assert_eq!(s.samples, Some(0));

        // parent links
        assert_eq!(model.leaves[0].parent, Some(0));
        assert_eq!(model.leaves[1].parent, Some(0));
        assert_eq!(model.nodes[0].parent, None);
    }

    #[test]
    fn sky_texture_sets_sky_flags() {
        let model = load_brush_model(&build_test_bsp(b"sky4")).unwrap();
        let s = &model.surfaces[0];
        assert!(s.flags.contains(SurfaceFlags::DRAW_SKY));
        assert!(s.flags.contains(SurfaceFlags::DRAW_TILED));
    }

    #[test]
    fn star_texture_sets_turb_flags_and_sentinels() {
        let model = load_brush_model(&build_test_bsp(b"*water")).unwrap();
        let s = &model.surfaces[0];
        assert!(s.flags.contains(SurfaceFlags::DRAW_TURB));
        assert_eq!(s.uv_min, [TILED_UV_MIN; 2]);
        assert_eq!(s.uv_extents, [TILED_UV_EXTENT; 2]);
    }

    #[test]
    fn rejects_wrong_version() {
        let mut bsp = build_test_bsp(b"wall1");
        bsp[0..4].copy_from_slice(&28i32.to_le_bytes());
        assert!(matches!(
            load_brush_model(&bsp).unwrap_err(),
            BspError::BadVersion(28)
        ));
    }

    #[test]
    fn rejects_misaligned_lump() {
        let mut bsp = build_test_bsp(b"wall1");
        // vertex lump length off by one byte
        let dir = 4 + LumpKind::Vertex as usize * 8;
        let len = i32::from_le_bytes(bsp[dir + 4..dir + 8].try_into().unwrap());
        bsp[dir + 4..dir + 8].copy_from_slice(&(len - 1).to_le_bytes());
        assert!(matches!(
            load_brush_model(&bsp).unwrap_err(),
            BspError::BadLumpSize { name: "vertex", .. }
        ));
    }

    #[test]
    fn rejects_lump_past_eof() {
        let mut bsp = build_test_bsp(b"wall1");
        let dir = 4 + LumpKind::Face as usize * 8;
        bsp[dir..dir + 4].copy_from_slice(&(1_000_000i32).to_le_bytes());
        assert!(matches!(
            load_brush_model(&bsp).unwrap_err(),
            BspError::LumpOutOfBounds { name: "face", .. }
        ));
    }

    #[test]
    fn rejects_bad_marksurface() {
        let mut bsp = build_test_bsp(b"wall1");
        let dir = 4 + LumpKind::Marksurface as usize * 8;
        let ofs = i32::from_le_bytes(bsp[dir..dir + 4].try_into().unwrap()) as usize;
        bsp[ofs..ofs + 2].copy_from_slice(&99u16.to_le_bytes());
        assert!(matches!(
            load_brush_model(&bsp).unwrap_err(),
            BspError::BadMarksurface(0, 99)
        ));
    }
}
