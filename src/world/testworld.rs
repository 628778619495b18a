//! Hand-built worlds for unit tests: a sealed cube room and a degenerate
//! empty map.  No assets are shipped with the crate, so the scenes the
//! renderer tests need are assembled in code instead of loaded from disk.

use std::collections::HashMap;

use glam::{Vec3, vec3};

use crate::defs::{
    CONTENTS_EMPTY, CONTENTS_SOLID, PLANE_X, PLANE_Y, PLANE_Z, SurfaceFlags, TexFlags,
};
use crate::world::camera::Camera;
use crate::world::geometry::{
    BrushModel, Edge, Leaf, Node, Plane, Surface, TexInfo, Vertex,
};
use crate::world::texture::MipTexture;

pub const SOLID_LEAF: u32 = 0;
pub const EMPTY_LEAF: u32 = 1;

/// Texel value every cube-room texture is filled with.
pub const ROOM_TEXEL: u8 = 31;

/// Lightmap sample value on every cube-room face.
pub const ROOM_LIGHT_SAMPLE: u8 = 200;

/// Camera standing in the middle of the room, facing +y, 640x480, 90 fov.
pub fn room_camera() -> Camera {
    let mut cam = Camera::new(vec3(0.0, 0.0, 64.0), Vec3::ZERO);
    cam.set_screen(0, 0, 640, 480, 90.0);
    cam
}

/// One solid leaf, one empty leaf, a single splitting node and no
/// geometry at all: the S1 scene.
pub fn empty_world() -> BrushModel {
    let mut model = BrushModel::default();
    model.planes.push(Plane::new(vec3(0.0, 0.0, 1.0), -4096.0, PLANE_Z));
    model.nodes.push(Node {
        plane: 0,
        children: [-2, -1], // both sides land in a leaf
        minmax: [-4096, -4096, -4096, 4096, 4096, 4096],
        first_surface: 0,
        num_surface: 0,
        visible_frame: -1,
        parent: None,
    });
    model.leaves.push(Leaf {
        contents: CONTENTS_SOLID,
        minmax: [0; 6],
        first_marksurface: 0,
        num_marksurface: 0,
        vis_offset: None,
        ambient_sound: [0; 4],
        key: 0,
        visible_frame: -1,
        parent: Some(0),
    });
    model.leaves.push(Leaf {
        contents: CONTENTS_EMPTY,
        minmax: [-4096, -4096, -4096, 4096, 4096, 4096],
        first_marksurface: 0,
        num_marksurface: 0,
        vis_offset: None,
        ambient_sound: [0; 4],
        key: 0,
        visible_frame: -1,
        parent: Some(0),
    });
    model.edges.push(Edge::default()); // edge 0 is reserved
    model.textures.push(MipTexture::default_checker());
    model
}

/// A sealed cube room, interior [-64, 64] x [-64, 64] x [0, 128].
///
/// Six faces, one per BSP node, wound clockwise as seen from inside the
/// room.  Walls on the +side planes carry PLANE_BACK, exactly as a map
/// compiler would emit them.  Every face is lit with a flat lightmap.
pub fn cube_room() -> BrushModel {
    let mut model = BrushModel::default();

    let corners = [
        vec3(-64.0, -64.0, 0.0),   // 0
        vec3(64.0, -64.0, 0.0),    // 1
        vec3(64.0, 64.0, 0.0),     // 2
        vec3(-64.0, 64.0, 0.0),    // 3
        vec3(-64.0, -64.0, 128.0), // 4
        vec3(64.0, -64.0, 128.0),  // 5
        vec3(64.0, 64.0, 128.0),   // 6
        vec3(-64.0, 64.0, 128.0),  // 7
    ];
    model.vertices = corners.iter().map(|&p| Vertex { position: p }).collect();

    model.planes = vec![
        Plane::new(vec3(1.0, 0.0, 0.0), -64.0, PLANE_X),
        Plane::new(vec3(1.0, 0.0, 0.0), 64.0, PLANE_X),
        Plane::new(vec3(0.0, 1.0, 0.0), -64.0, PLANE_Y),
        Plane::new(vec3(0.0, 1.0, 0.0), 64.0, PLANE_Y),
        Plane::new(vec3(0.0, 0.0, 1.0), 0.0, PLANE_Z),
        Plane::new(vec3(0.0, 0.0, 1.0), 128.0, PLANE_Z),
    ];

    // (plane, back?, winding clockwise from inside, u axis, v axis)
    let faces: [(u32, bool, [u16; 4], Vec3, Vec3); 6] = [
        // x = -64 wall
        (0, false, [0, 4, 7, 3], vec3(0.0, 1.0, 0.0), vec3(0.0, 0.0, -1.0)),
        // x = +64 wall
        (1, true, [1, 2, 6, 5], vec3(0.0, 1.0, 0.0), vec3(0.0, 0.0, -1.0)),
        // y = -64 wall
        (2, false, [0, 1, 5, 4], vec3(1.0, 0.0, 0.0), vec3(0.0, 0.0, -1.0)),
        // y = +64 wall (the one the default camera faces)
        (3, true, [7, 6, 2, 3], vec3(1.0, 0.0, 0.0), vec3(0.0, 0.0, -1.0)),
        // floor
        (4, false, [0, 3, 2, 1], vec3(1.0, 0.0, 0.0), vec3(0.0, 1.0, 0.0)),
        // ceiling
        (5, true, [4, 5, 6, 7], vec3(1.0, 0.0, 0.0), vec3(0.0, 1.0, 0.0)),
    ];

    let mut room_tex = MipTexture::default_checker();
    room_tex.name = "room".into();
    room_tex.width = 64;
    room_tex.height = 64;
    for m in 0..4 {
        room_tex.mips[m] = vec![ROOM_TEXEL; (64 >> m) * (64 >> m)];
    }
    model.textures = vec![room_tex];

    model.edges.push(Edge::default()); // edge 0 is reserved
    let mut edge_ids: HashMap<(u16, u16), i32> = HashMap::new();

    for (face_idx, (plane, back, winding, u_axis, v_axis)) in faces.iter().enumerate() {
        model.tex_infos.push(TexInfo {
            u_axis: *u_axis,
            u_offset: 0.0,
            v_axis: *v_axis,
            v_offset: 0.0,
            texture: 0,
            mip_adjust: 1.0,
            flags: TexFlags::empty(),
        });

        let first_edge = model.surfedges.len() as u32;
        for i in 0..4 {
            let a = winding[i];
            let b = winding[(i + 1) % 4];
            let surfedge = if let Some(&id) = edge_ids.get(&(a, b)) {
                id
            } else if let Some(&id) = edge_ids.get(&(b, a)) {
                -id
            } else {
                let id = model.edges.len() as i32;
                model.edges.push(Edge {
                    verts: [a, b],
                    cache: Default::default(),
                });
                edge_ids.insert((a, b), id);
                id
            };
            model.surfedges.push(surfedge);
        }

        // texel bounds from the winding, discretised to multiples of 16
        let (mut umin, mut umax, mut vmin, mut vmax) = (f32::MAX, f32::MIN, f32::MAX, f32::MIN);
        for &vi in winding {
            let p = corners[vi as usize];
            let u = p.dot(*u_axis);
            let v = p.dot(*v_axis);
            umin = umin.min(u);
            umax = umax.max(u);
            vmin = vmin.min(v);
            vmax = vmax.max(v);
        }
        let uv_min = [
            ((umin / 16.0).floor() * 16.0) as i16,
            ((vmin / 16.0).floor() * 16.0) as i16,
        ];
        let uv_extents = [
            (((umax / 16.0).ceil() - (umin / 16.0).floor()) * 16.0) as i16,
            (((vmax / 16.0).ceil() - (vmin / 16.0).floor()) * 16.0) as i16,
        ];

        let smax = (uv_extents[0] >> 4) as usize + 1;
        let tmax = (uv_extents[1] >> 4) as usize + 1;
        let sample_ofs = model.light_data.len() as u32;
        model
            .light_data
            .extend(std::iter::repeat_n(ROOM_LIGHT_SAMPLE, smax * tmax));

        model.surfaces.push(Surface {
            plane: *plane,
            tex_info: face_idx as u32,
            flags: if *back {
                SurfaceFlags::PLANE_BACK
            } else {
                SurfaceFlags::empty()
            },
            first_edge,
            num_edge: 4,
            uv_min,
            uv_extents,
            styles: [0, 255, 255, 255],
            samples: Some(sample_ofs),
            visible_frame: -1,
            light_frame: -1,
            light_bits: 0,
            cachespots: [None; 4],
        });
        model.marksurfaces.push(face_idx as u32);
    }

    // One node per face plane, chained toward the interior; the outside of
    // every plane is the shared solid leaf.
    let room_minmax = [-64i16, -64, 0, 64, 64, 128];
    for (i, (plane, back, ..)) in faces.iter().enumerate() {
        let next: i32 = if i == 5 {
            -(EMPTY_LEAF as i32) - 1
        } else {
            i as i32 + 1
        };
        let solid = -(SOLID_LEAF as i32) - 1;
        // the room continues on the front side of -planes, back side of +planes
        let children = if *back { [solid, next] } else { [next, solid] };
        model.nodes.push(Node {
            plane: *plane,
            children,
            minmax: room_minmax,
            first_surface: i as u32,
            num_surface: 1,
            visible_frame: -1,
            parent: if i == 0 { None } else { Some(i as u32 - 1) },
        });
    }

    model.leaves = vec![
        Leaf {
            contents: CONTENTS_SOLID,
            minmax: [0; 6],
            first_marksurface: 0,
            num_marksurface: 0,
            vis_offset: None,
            ambient_sound: [0; 4],
            key: 0,
            visible_frame: -1,
            parent: Some(0),
        },
        Leaf {
            contents: CONTENTS_EMPTY,
            minmax: room_minmax,
            first_marksurface: 0,
            num_marksurface: 6,
            vis_offset: None,
            ambient_sound: [0; 4],
            key: 0,
            visible_frame: -1,
            parent: Some(5),
        },
    ];

    model
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_room_is_consistent() {
        let model = cube_room();
        assert_eq!(model.surfaces.len(), 6);
        assert_eq!(model.edges.len(), 13); // 12 shared edges + reserved 0
        assert_eq!(model.surfedges.len(), 24);
        // every wall's extents are positive multiples of 16
        for s in &model.surfaces {
            for i in 0..2 {
                assert!(s.uv_extents[i] > 0);
                assert_eq!(s.uv_extents[i] % 16, 0);
            }
        }
        // shared edges really are shared: every non-reserved edge is
        // referenced exactly twice, once per direction
        let mut refs = vec![0u32; model.edges.len()];
        for &se in &model.surfedges {
            refs[se.unsigned_abs() as usize] += 1;
        }
        assert!(refs[1..].iter().all(|&r| r == 2));
    }

    #[test]
    fn camera_starts_inside_the_empty_leaf() {
        let model = cube_room();
        let cam = room_camera();
        assert_eq!(model.find_leaf(cam.position), EMPTY_LEAF);
    }
}
