//! ----------------------------------------------------------------------------
//! **PVS expansion and the front-to-back world walk**
//!
//! Responsible for
//! * decompressing the view leaf's PVS and stamping every potentially
//!   visible leaf and its ancestors with the PVS update counter,
//! * walking the BSP near-side-first, culling nodes by bounding box
//!   against the active frustum planes,
//! * handing each front-facing, PVS-marked face to the face clipper with
//!   a monotonically increasing occlusion key per node.
//!
//! It deliberately does no clipping or span work itself; that lives in
//! `clip` and `scan`.
//! ----------------------------------------------------------------------------

use crate::defs::{CONTENTS_SOLID, SurfaceFlags};
use crate::engine::renderer::Renderer;
use crate::world::{BrushModel, Camera, ChildRef};

/// Faces closer to edge-on than this are treated as back-facing.
const BACKFACE_EPSILON: f32 = 0.01;

/// All four frustum planes active.
const ALL_CLIP_PLANES: u32 = 0x0F;

/// Bounding-box vs frustum verdict using the camera's precomputed
/// reject/accept corner indices.  Returns `None` when fully outside;
/// otherwise the clip mask with fully-inside planes cleared.
fn cull_bounds(camera: &Camera, minmax: &[i16; 6], mut clipflags: u32) -> Option<u32> {
    if clipflags == 0 {
        return Some(0);
    }
    for i in 0..4 {
        if clipflags & (1 << i) == 0 {
            continue;
        }
        let plane = &camera.world_frustum_planes[i];
        let index = &camera.frustum_indices[i * 6..i * 6 + 6];

        // the corner furthest along the normal decides rejection
        let reject = glam::vec3(
            minmax[index[0]] as f32,
            minmax[index[1]] as f32,
            minmax[index[2]] as f32,
        );
        if reject.dot(plane.normal) - plane.distance <= 0.0 {
            return None;
        }

        // the opposite corner decides full acceptance
        let accept = glam::vec3(
            minmax[index[3]] as f32,
            minmax[index[4]] as f32,
            minmax[index[5]] as f32,
        );
        if accept.dot(plane.normal) - plane.distance >= 0.0 {
            clipflags &= !(1 << i);
        }
    }
    Some(clipflags)
}

impl Renderer {
    /// Re-stamp the visible subtree when the view leaf changed.
    pub(crate) fn update_visible_leaves(&mut self, model: &mut BrushModel) {
        if self.old_view_leaf == Some(self.view_leaf) {
            return;
        }
        self.pvs_count += 1;

        let mut vis = std::mem::take(&mut self.vis_scratch);
        model.decompress_vis(self.view_leaf, &mut vis);

        // bit i covers leaf i + 1; the shared solid leaf has no bit
        for i in 0..model.leaves.len().saturating_sub(1) {
            if vis[i >> 3] & (1 << (i & 7)) == 0 {
                continue;
            }
            let leaf = &mut model.leaves[i + 1];
            if leaf.visible_frame == self.pvs_count {
                continue;
            }
            leaf.visible_frame = self.pvs_count;

            // walk up until an already-stamped ancestor
            let mut parent = leaf.parent;
            while let Some(p) = parent {
                let node = &mut model.nodes[p as usize];
                if node.visible_frame == self.pvs_count {
                    break;
                }
                node.visible_frame = self.pvs_count;
                parent = node.parent;
            }
        }

        self.vis_scratch = vis;
        log::debug!(
            "pvs update #{} from leaf {}",
            self.pvs_count,
            self.view_leaf
        );
    }

    /// Walk the whole world, emitting every visible face front to back.
    pub(crate) fn render_world(
        &mut self,
        model: &mut BrushModel,
        camera: &Camera,
    ) {
        if model.nodes.is_empty() {
            return;
        }
        self.recurse_world_child(model, camera, ChildRef::Node(0), ALL_CLIP_PLANES);
    }

    fn recurse_world_child(
        &mut self,
        model: &mut BrushModel,
        camera: &Camera,
        child: ChildRef,
        clipflags: u32,
    ) {
        match child {
            ChildRef::Leaf(leaf_idx) => {
                let leaf = &model.leaves[leaf_idx as usize];
                if leaf.contents == CONTENTS_SOLID || leaf.visible_frame != self.pvs_count {
                    return;
                }
                if cull_bounds(camera, &leaf.minmax, clipflags).is_none() {
                    return;
                }

                // stamp the leaf's faces so the node pass picks them up,
                // and record the leaf's place in the front-to-back order
                let (first, count) = (
                    leaf.first_marksurface as usize,
                    leaf.num_marksurface as usize,
                );
                for i in first..first + count {
                    let surf = model.marksurfaces[i] as usize;
                    model.surfaces[surf].visible_frame = self.frame_count;
                }
                model.leaves[leaf_idx as usize].key = self.current_key;
                self.current_key += 1;
            }

            ChildRef::Node(node_idx) => {
                let node = &model.nodes[node_idx as usize];
                if node.visible_frame != self.pvs_count {
                    return;
                }
                let Some(clipflags) = cull_bounds(camera, &node.minmax, clipflags) else {
                    return;
                };

                let children = node.children;
                let (first_surface, num_surface) =
                    (node.first_surface as usize, node.num_surface as usize);
                let d = model.planes[node.plane as usize].distance_to(camera.position);
                let side = if d < 0.0 { 1 } else { 0 };

                // near side first so keys increase back to front
                self.recurse_world_child(
                    model,
                    camera,
                    ChildRef::decode(children[side]),
                    clipflags,
                );

                if num_surface > 0 {
                    // a face is drawable when the viewer is on the side
                    // it faces: PLANE_BACK faces want d < 0
                    let want_back = if d < -BACKFACE_EPSILON {
                        Some(true)
                    } else if d > BACKFACE_EPSILON {
                        Some(false)
                    } else {
                        None
                    };
                    if let Some(want_back) = want_back {
                        for surf_idx in first_surface..first_surface + num_surface {
                            let surface = &model.surfaces[surf_idx];
                            if surface.visible_frame != self.frame_count {
                                continue;
                            }
                            if surface.flags.contains(SurfaceFlags::PLANE_BACK) != want_back {
                                continue;
                            }
                            self.render_face(model, camera, surf_idx, false, clipflags);
                        }
                    }
                    self.current_key += 1;
                }

                self.recurse_world_child(
                    model,
                    camera,
                    ChildRef::decode(children[side ^ 1]),
                    clipflags,
                );
            }
        }
    }
}

/*======================================================================*/
/*                               Tests                                  */
/*======================================================================*/
