//! ----------------------------------------------------------------------------
//! **Face clipper and edge emitter**
//!
//! For every face the world walk hands over:
//! * clip each polygon edge against the active frustum planes in world
//!   space, caching the result on the world edge so the surface sharing it
//!   gets the work for free,
//! * project the survivors, snap them to scanlines and sort them into the
//!   per-scanline buckets the span generator consumes,
//! * emit one `ISurface` carrying the plane-equation 1/z gradients.
//!
//! Winding is clockwise in screen space: an edge running downward is a
//! *trailing* (right) edge and closes its surface; one running upward is a
//! *leading* (left) edge and opens it.
//! ----------------------------------------------------------------------------

use glam::{Vec2, Vec3};
use smallvec::SmallVec;

use crate::engine::renderer::Renderer;
use crate::engine::types::{FIX20_CEIL_BIAS, IEdge, NONE, NUM_STACK_EDGE, to_fixed20};
use crate::world::{BrushModel, Camera, ClipPlane, EdgeCache};

/// Enter/exit points recorded while clipping a face against the screen's
/// left and right planes; they close the polygon with synthetic vertical
/// edges afterwards.
#[derive(Default)]
pub(crate) struct SurfaceClip {
    left_clipped: bool,
    right_clipped: bool,
    left_enter: Vec3,
    left_exit: Vec3,
    right_enter: Vec3,
    right_exit: Vec3,
}

pub(crate) struct EdgeClip {
    v0: Vec3,
    v1: Vec3,
    v0_unclipped: bool,
    fully_clipped: bool,
}

/// Projected data of the previous edge's end vertex, reused so shared
/// vertices transform once per face instead of once per edge.
#[derive(Default)]
struct LastVert {
    screen: Vec2,
    invz: f32,
    ceil_y: i32,
    valid: bool,
}

/// Clip a single edge against the plane list.  Since a face is convex,
/// each plane produces at most one enter and one exit point.
pub(crate) fn clip_edge(
    mut v0: Vec3,
    mut v1: Vec3,
    planes: &[ClipPlane],
    scr: &mut SurfaceClip,
    state: &mut EdgeCache,
    frame: i32,
) -> EdgeClip {
    let mut result = EdgeClip {
        v0,
        v1,
        v0_unclipped: true,
        fully_clipped: false,
    };

    for plane in planes {
        let d0 = v0.dot(plane.normal) - plane.distance;
        let d1 = v1.dot(plane.normal) - plane.distance;

        if d0 >= 0.0 {
            if d1 < 0.0 {
                // v1 leaves the frustum here
                *state = EdgeCache::Partial { frame };

                let t = d0 / (d0 - d1);
                let new_point = v0 + t * (v1 - v0);
                v1 = new_point;
                if plane.is_left {
                    scr.left_clipped = true;
                    scr.left_exit = new_point;
                } else if plane.is_right {
                    scr.right_clipped = true;
                    scr.right_exit = new_point;
                }
            }
            // both in front: next plane
        } else {
            result.v0_unclipped = false;

            if d1 < 0.0 {
                // the whole edge is outside this plane
                result.fully_clipped = true;
                if !scr.left_clipped {
                    *state = EdgeCache::Clipped { frame };
                }
                break;
            } else {
                // v0 enters the frustum here
                *state = EdgeCache::Partial { frame };

                let t = d0 / (d0 - d1);
                let new_point = v0 + t * (v1 - v0);
                v0 = new_point;
                if plane.is_left {
                    scr.left_clipped = true;
                    scr.left_enter = new_point;
                } else if plane.is_right {
                    scr.right_clipped = true;
                    scr.right_enter = new_point;
                }
            }
        }
    }

    result.v0 = v0;
    result.v1 = v1;
    result
}

impl Renderer {
    /// Clip, project and emit one face.  `clipflags` has one bit per
    /// active frustum plane (bit 0 = left, 1 = right, 2 = top, 3 = bottom).
    pub(crate) fn render_face(
        &mut self,
        model: &mut BrushModel,
        camera: &Camera,
        surf_idx: usize,
        in_submodel: bool,
        clipflags: u32,
    ) {
        // out of surface records: drop the face this frame
        if self.isurfaces.len() >= self.isurface_limit {
            return;
        }
        let num_edge = model.surfaces[surf_idx].num_edge as usize;
        // out of edge records: drop the face and account for it; the
        // frame simply misses these surfaces
        if self.iedges.len() + num_edge + 4 >= NUM_STACK_EDGE {
            self.out_of_iedges += num_edge as u32;
            return;
        }

        let mut planes: SmallVec<[ClipPlane; 4]> = SmallVec::new();
        for i in 0..4 {
            if clipflags & (1 << i) != 0 {
                planes.push(camera.world_frustum_planes[i]);
            }
        }

        let first_edge = model.surfaces[surf_idx].first_edge as usize;
        let frame = self.frame_count;

        let mut edge_emitted = false;
        let mut scr = SurfaceClip::default();
        let mut last_vert = LastVert::default();
        self.nearest_invz = 0.0;

        for i in 0..num_edge {
            let surfedge = model.surfedges[first_edge + i];
            let edge_idx = surfedge.unsigned_abs() as usize;
            let edge = model.edges[edge_idx];
            let (start_vert, end_vert) = if surfedge >= 0 {
                (edge.verts[0], edge.verts[1])
            } else {
                (edge.verts[1], edge.verts[0])
            };

            if !in_submodel {
                match edge.cache {
                    EdgeCache::Clipped { frame: f } if f == frame => {
                        // clipped away (or horizontal-accepted) earlier
                        // this frame: nothing to do for this surface either
                        last_vert.valid = false;
                        continue;
                    }
                    EdgeCache::Emitted { frame: f, offset } if f == frame => {
                        // emitted for an earlier surface this frame: just
                        // tag the existing record with this surface too
                        if (offset as usize) < self.iedges.len()
                            && self.iedges[offset as usize].owner == edge_idx as u32
                        {
                            self.reemit_iedge(offset);
                            edge_emitted = true;
                            last_vert.valid = false;
                            continue;
                        }
                    }
                    _ => {}
                }
            }

            let mut state = EdgeCache::Emitted {
                frame,
                offset: self.iedges.len() as u32,
            };

            let v0 = model.vertices[start_vert as usize].position;
            let v1 = model.vertices[end_vert as usize].position;

            let ecr = clip_edge(v0, v1, &planes, &mut scr, &mut state, frame);
            last_vert.valid &= ecr.v0_unclipped;
            if !ecr.fully_clipped {
                edge_emitted |= self.emit_iedge(
                    camera,
                    ecr.v0,
                    ecr.v1,
                    &mut last_vert,
                    false,
                    &mut state,
                    edge_idx as u32,
                );
            }

            if !in_submodel {
                model.edges[edge_idx].cache = state;
            }
            last_vert.valid = true;
        }

        // close the polygon along the screen borders it was clipped to;
        // the originating plane is excluded so the synthetic edge itself
        // survives clipping
        if scr.left_clipped {
            // the left plane, when active, is always first in the list
            let (exit, enter) = (scr.left_exit, scr.left_enter);
            let mut state = EdgeCache::default();
            let ecr = clip_edge(exit, enter, &planes[1..], &mut scr, &mut state, frame);
            last_vert.valid = false;
            if !ecr.fully_clipped {
                edge_emitted |=
                    self.emit_iedge(camera, ecr.v0, ecr.v1, &mut last_vert, false, &mut state, NONE);
            }
        }
        if scr.right_clipped {
            let after_right = planes
                .iter()
                .position(|p| p.is_right)
                .map_or(planes.len(), |p| p + 1);
            let (exit, enter) = (scr.right_exit, scr.right_enter);
            let mut state = EdgeCache::default();
            let ecr = clip_edge(
                exit,
                enter,
                &planes[after_right..],
                &mut scr,
                &mut state,
                frame,
            );
            last_vert.valid = false;
            if !ecr.fully_clipped {
                // the right screen border needs no stepping info, only the
                // nearest 1/z
                edge_emitted |=
                    self.emit_iedge(camera, ecr.v0, ecr.v1, &mut last_vert, true, &mut state, NONE);
            }
        }

        if !edge_emitted {
            return;
        }

        self.surface_count += 1;
        self.push_isurface(model, camera, surf_idx, in_submodel);
    }

    /// Allocate the ISurface for a face whose edges made it to the screen.
    fn push_isurface(
        &mut self,
        model: &BrushModel,
        camera: &Camera,
        surf_idx: usize,
        in_submodel: bool,
    ) {
        let surface = &model.surfaces[surf_idx];
        let plane = &model.planes[surface.plane as usize];

        // 1/z is linear in screen space: transform the plane normal into
        // view space and evaluate the plane equation per pixel, with the
        // y sign flipped (screen y grows downward) and the origin moved
        // to the top-left corner
        let normal_view = camera.transform_direction(plane.normal);
        let distance_inv = 1.0 / (plane.distance - camera.position.dot(plane.normal));

        let zi_stepx = normal_view.x * camera.scale_invz * distance_inv;
        let zi_stepy = normal_view.y * camera.scale_invz * distance_inv;
        let zi_start = normal_view.z * distance_inv
            - camera.screen_center.x * zi_stepx
            - camera.screen_center.y * zi_stepy;

        self.isurfaces.push(crate::engine::types::ISurface {
            prev: NONE,
            next: NONE,
            spans: NONE,
            data: surf_idx as u32,
            key: self.current_key,
            x_last: 0,
            span_state: 0,
            flags: surface.flags,
            nearest_invz: self.nearest_invz,
            in_submodel,
            zi_stepx,
            zi_stepy,
            zi_start,
        });
    }

    /// Tag an already-emitted IEdge with the surface currently being
    /// built; whichever side slot is still free gets it.
    fn reemit_iedge(&mut self, offset: u32) {
        let isurf = self.isurfaces.len() as u32;
        let iedge = &mut self.iedges[offset as usize];

        if iedge.surf_offsets[0] == 0 {
            iedge.surf_offsets[0] = isurf;
        } else {
            iedge.surf_offsets[1] = isurf;
        }

        if iedge.near_invz > self.nearest_invz {
            self.nearest_invz = iedge.near_invz;
        }
    }

    /// Project a clipped edge and emit the IEdge record, sorted into the
    /// scanline bucket of its top row.  Returns whether the edge counts
    /// as emitted (horizontal accepted edges do).
    #[allow(clippy::too_many_arguments)]
    fn emit_iedge(
        &mut self,
        camera: &Camera,
        v0: Vec3,
        v1: Vec3,
        last_vert: &mut LastVert,
        only_near_invz: bool,
        state: &mut EdgeCache,
        owner: u32,
    ) -> bool {
        let (screen0, invz0, ceil_y0);
        if last_vert.valid {
            screen0 = last_vert.screen;
            invz0 = last_vert.invz;
            ceil_y0 = last_vert.ceil_y;
        } else {
            let mut view = camera.transform_point(v0);
            if view.z < camera.near_z {
                view.z = camera.near_z;
            }
            invz0 = 1.0 / view.z;
            screen0 = camera.project(view);
            ceil_y0 = screen0.y.ceil() as i32;
        }

        let mut view1 = camera.transform_point(v1);
        if view1.z < camera.near_z {
            view1.z = camera.near_z;
        }
        let invz1 = 1.0 / view1.z;
        let screen1 = camera.project(view1);
        let ceil_y1 = screen1.y.ceil() as i32;

        let near_invz = invz0.max(invz1);
        if near_invz > self.nearest_invz {
            self.nearest_invz = near_invz;
        }

        // keep v1's projection for the next edge of the polygon
        last_vert.screen = screen1;
        last_vert.invz = invz1;
        last_vert.ceil_y = ceil_y1;

        // edges lying on the right screen border only contribute their
        // nearest z; the border itself produces no pixel transitions
        if only_near_invz {
            return false;
        }

        if ceil_y0 == ceil_y1 {
            // horizontal: nothing to rasterize, but remember the verdict
            // so surfaces sharing the edge skip it this frame
            if !matches!(state, EdgeCache::Partial { .. }) {
                *state = EdgeCache::Clipped {
                    frame: self.frame_count,
                };
            }
            return true;
        }

        let mut iedge = IEdge {
            owner,
            near_invz,
            ..Default::default()
        };

        let isurf = self.isurfaces.len() as u32;
        let (top_y, bottom_y, x_start, x_step);
        if ceil_y0 < ceil_y1 {
            // runs downward in clockwise winding: trailing (right) edge
            top_y = ceil_y0;
            bottom_y = ceil_y1 - 1;
            x_step = (screen1.x - screen0.x) / (screen1.y - screen0.y);
            x_start = screen0.x + (ceil_y0 as f32 - screen0.y) * x_step;
            iedge.surf_offsets = [isurf, 0];
        } else {
            // runs upward: leading (left) edge
            top_y = ceil_y1;
            bottom_y = ceil_y0 - 1;
            x_step = (screen0.x - screen1.x) / (screen0.y - screen1.y);
            x_start = screen1.x + (ceil_y1 as f32 - screen1.y) * x_step;
            iedge.surf_offsets = [0, isurf];
        }

        iedge.x_step = to_fixed20(x_step);
        // the bias makes `x_start >> 20` land on ceil(x), the first pixel
        // a leading edge owns
        iedge.x_start = to_fixed20(x_start) + FIX20_CEIL_BIAS;

        let index = self.iedges.len() as u32;
        self.iedges.push(iedge);
        self.link_into_bucket(index, top_y as usize);

        // retire the edge once its bottom scanline has been scanned
        self.iedges[index as usize].next_remove = self.remove_edges[bottom_y as usize];
        self.remove_edges[bottom_y as usize] = index;

        true
    }

    /// Insertion-sort a fresh IEdge into its top scanline's bucket,
    /// keeping x ascending.  A trailing edge sorts just after a leading
    /// edge at the same x so zero-width fills still open before closing.
    pub(crate) fn link_into_bucket(&mut self, index: u32, top_y: usize) {
        let mut x_check = self.iedges[index as usize].x_start;
        if self.iedges[index as usize].surf_offsets[0] != 0 {
            x_check += 1;
        }

        let head = self.new_edges[top_y];
        if head == NONE || x_check < self.iedges[head as usize].x_start {
            self.iedges[index as usize].next = head;
            self.new_edges[top_y] = index;
        } else {
            let mut cursor = head;
            loop {
                let next = self.iedges[cursor as usize].next;
                if next == NONE || self.iedges[next as usize].x_start >= x_check {
                    break;
                }
                cursor = next;
            }
            self.iedges[index as usize].next = self.iedges[cursor as usize].next;
            self.iedges[cursor as usize].next = index;
        }
    }
}

/*======================================================================*/
/*                               Tests                                  */
/*======================================================================*/
