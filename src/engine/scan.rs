//! ----------------------------------------------------------------------------
//! **Scanline edge sort and span generation**
//!
//! The heart of the zero-overdraw rasterizer: per scanline,
//! * freshly starting edges are merged into the x-sorted active list,
//! * sweeping left to right, each edge toggles its surfaces in a
//!   key-sorted active-surface ring; every time the nearest surface
//!   changes, the span between the last transition and here is emitted,
//! * the nearest surface at the right border is closed out,
//! * finished edges retire and the rest step by `x_step`, re-sorting the
//!   few that drifted past a neighbour.
//!
//! Keys come from the front-to-back walk, so "smaller key" means
//! "nearer"; the ring's head neighbour is always the visible surface.
//! ----------------------------------------------------------------------------

use crate::engine::renderer::{RenderBuffer, RenderError, Renderer};
use crate::engine::types::{
    EDGE_AFTER_TAIL, EDGE_GUARD, EDGE_HEAD, EDGE_TAIL, ESpan, FIX20_CEIL_BIAS, FIX20_SHIFT,
    MAX_SPAN, NONE, SURF_BACKGROUND, fixed20_to_f32,
};
use crate::world::{BrushModel, Camera};

impl Renderer {
    /// Sweep every scanline of the target, generating spans and flushing
    /// them to the drawers; runs after the world walk has filled the
    /// per-scanline edge buckets.
    pub(crate) fn scan_edges(
        &mut self,
        model: &mut BrushModel,
        camera: &Camera,
        target: &mut RenderBuffer,
    ) -> Result<(), RenderError> {
        let screen_start_x = 0i32;
        let screen_end_x = target.width as i32;

        // the list sentinels bound every insertion and re-sort
        self.iedges[EDGE_HEAD as usize].x_start = screen_start_x << FIX20_SHIFT;
        self.iedges[EDGE_HEAD as usize].x_step = 0;
        self.iedges[EDGE_HEAD as usize].prev = NONE;
        self.iedges[EDGE_HEAD as usize].next = EDGE_TAIL;
        self.iedges[EDGE_HEAD as usize].surf_offsets = [0, SURF_BACKGROUND];

        self.iedges[EDGE_TAIL as usize].x_start = (screen_end_x << FIX20_SHIFT) + FIX20_CEIL_BIAS;
        self.iedges[EDGE_TAIL as usize].x_step = 0;
        self.iedges[EDGE_TAIL as usize].prev = EDGE_HEAD;
        self.iedges[EDGE_TAIL as usize].next = EDGE_AFTER_TAIL;
        self.iedges[EDGE_TAIL as usize].surf_offsets = [SURF_BACKGROUND, 0];

        // x_start of -1 forces the x-step loop to stop here
        self.iedges[EDGE_AFTER_TAIL as usize].x_start = -1;
        self.iedges[EDGE_AFTER_TAIL as usize].x_step = 0;
        self.iedges[EDGE_AFTER_TAIL as usize].prev = EDGE_TAIL;
        self.iedges[EDGE_AFTER_TAIL as usize].next = EDGE_GUARD;

        // nothing sorts past the guard
        self.iedges[EDGE_GUARD as usize].x_start = i32::MAX;
        self.iedges[EDGE_GUARD as usize].prev = EDGE_AFTER_TAIL;

        // flush early enough that one full scanline of spans always fits
        let max_span = MAX_SPAN.saturating_sub(target.width).max(1);

        let bottom_y = target.height as i32 - 1;
        for y in 0..bottom_y {
            // the background is always open
            self.isurfaces[SURF_BACKGROUND as usize].span_state = 1;
            if self.new_edges[y as usize] != NONE {
                self.insert_new_edges(self.new_edges[y as usize]);
            }
            self.generate_spans(screen_start_x, screen_end_x, y);

            // span pool nearly full: draw what we have and start over
            if self.spans.len() >= max_span {
                self.draw_surfaces(model, camera, target)?;
                for isurf in &mut self.isurfaces[SURF_BACKGROUND as usize..] {
                    isurf.spans = NONE;
                }
                self.spans.clear();
            }

            if self.remove_edges[y as usize] != NONE {
                self.retire_edges(self.remove_edges[y as usize]);
            }
            if self.iedges[EDGE_HEAD as usize].next != EDGE_TAIL {
                self.step_active_edges();
            }
        }

        // bottom row: scan but skip the per-row stepping
        self.isurfaces[SURF_BACKGROUND as usize].span_state = 1;
        if self.new_edges[bottom_y as usize] != NONE {
            self.insert_new_edges(self.new_edges[bottom_y as usize]);
        }
        self.generate_spans(screen_start_x, screen_end_x, bottom_y);

        self.draw_surfaces(model, camera, target)
    }

    /// Merge a bucket of fresh edges (already x-sorted) into the active
    /// list, keeping x ascending.
    fn insert_new_edges(&mut self, bucket: u32) {
        let mut to_add = bucket;
        let mut pos = self.iedges[EDGE_HEAD as usize].next;

        while to_add != NONE {
            let next_add = self.iedges[to_add as usize].next;
            let x = self.iedges[to_add as usize].x_start;

            // the bucket is sorted, so the search resumes where the
            // previous insertion stopped
            while self.iedges[pos as usize].x_start < x {
                pos = self.iedges[pos as usize].next;
            }

            // link to_add just before pos
            let prev = self.iedges[pos as usize].prev;
            self.iedges[to_add as usize].next = pos;
            self.iedges[to_add as usize].prev = prev;
            self.iedges[prev as usize].next = to_add;
            self.iedges[pos as usize].prev = to_add;

            to_add = next_add;
        }
    }

    /// Unlink every edge whose bottom scanline has just been scanned.
    fn retire_edges(&mut self, head: u32) {
        let mut edge = head;
        while edge != NONE {
            let (prev, next) = {
                let e = &self.iedges[edge as usize];
                (e.prev, e.next)
            };
            self.iedges[prev as usize].next = next;
            self.iedges[next as usize].prev = prev;
            edge = self.iedges[edge as usize].next_remove;
        }
    }

    /// Advance every active edge by its slope, pulling the few that
    /// overtook their left neighbour back into sorted position.
    fn step_active_edges(&mut self) {
        let mut edge = self.iedges[EDGE_HEAD as usize].next;

        loop {
            // step forward until an edge lands left of its neighbour
            loop {
                let e = &mut self.iedges[edge as usize];
                e.x_start += e.x_step;
                let x = e.x_start;
                if x < self.iedges[self.iedges[edge as usize].prev as usize].x_start {
                    break;
                }
                edge = self.iedges[edge as usize].next;
            }

            if edge == EDGE_AFTER_TAIL {
                return;
            }

            let next = self.iedges[edge as usize].next;

            // pull the edge out ...
            let (prev, nxt) = {
                let e = &self.iedges[edge as usize];
                (e.prev, e.next)
            };
            self.iedges[prev as usize].next = nxt;
            self.iedges[nxt as usize].prev = prev;

            // ... and walk left to its sorted slot
            let x = self.iedges[edge as usize].x_start;
            let mut before = self.iedges[prev as usize].prev;
            while before != EDGE_HEAD && self.iedges[before as usize].x_start > x {
                before = self.iedges[before as usize].prev;
            }
            let after = self.iedges[before as usize].next;
            self.iedges[edge as usize].next = after;
            self.iedges[edge as usize].prev = before;
            self.iedges[after as usize].prev = edge;
            self.iedges[before as usize].next = edge;

            edge = next;
            if edge == EDGE_TAIL {
                return;
            }
        }
    }

    /*──────────────────────── span generation ────────────────────────*/

    /// Sweep one scanline's active edges and emit spans at every change
    /// of the nearest surface.
    fn generate_spans(&mut self, screen_start_x: i32, screen_end_x: i32, y: i32) {
        // reset the active-surface ring to just the background
        let bg = SURF_BACKGROUND as usize;
        self.isurfaces[bg].next = SURF_BACKGROUND;
        self.isurfaces[bg].prev = SURF_BACKGROUND;
        self.isurfaces[bg].x_last = screen_start_x;

        let mut edge = self.iedges[EDGE_HEAD as usize].next;
        while edge != EDGE_TAIL {
            let offsets = self.iedges[edge as usize].surf_offsets;
            if offsets[0] != 0 {
                self.trailing_edge(edge, y);
            }
            if offsets[1] != 0 {
                self.leading_edge(edge, y);
            }
            edge = self.iedges[edge as usize].next;
        }

        self.cleanup_span(screen_end_x, y);
    }

    /// Push a span onto a surface's list (drawn in reverse emission
    /// order, which is fine: spans never overlap).
    fn emit_span(&mut self, isurf: u32, x_start: i32, count: i32, y: i32) {
        let span = ESpan {
            next: self.isurfaces[isurf as usize].spans,
            x_start,
            y,
            count,
        };
        self.spans.push(span);
        self.isurfaces[isurf as usize].spans = self.spans.len() as u32 - 1;
    }

    /// A leading edge opens its surface: find the key-sorted slot in the
    /// active ring and, if it became the new nearest, close the span of
    /// the surface it obscures.
    fn leading_edge(&mut self, edge: u32, y: i32) {
        let isurf = self.iedges[edge as usize].surf_offsets[1];

        debug_assert_eq!(self.isurfaces[isurf as usize].span_state, 0);
        self.isurfaces[isurf as usize].span_state += 1;
        if self.isurfaces[isurf as usize].span_state != 1 {
            return;
        }

        let key = self.isurfaces[isurf as usize].key;
        let in_submodel = self.isurfaces[isurf as usize].in_submodel;
        let x_start = self.iedges[edge as usize].x_start;

        let mut top = self.isurfaces[SURF_BACKGROUND as usize].next;
        let mut new_top = key < self.isurfaces[top as usize].key;

        if !new_top && key == self.isurfaces[top as usize].key && in_submodel {
            // coplanar with the current top: compare 1/z with hysteresis
            new_top = self.submodel_in_front(isurf, top, x_start, y);
        }

        if !new_top {
            // search for the first strictly-farther surface
            loop {
                top = self.isurfaces[top as usize].next;
                let top_key = self.isurfaces[top as usize].key;
                if key < top_key {
                    break;
                }
                if key == top_key {
                    // a coplanar surface that is already active stays in
                    // front unless a submodel wins the depth test
                    if in_submodel && self.submodel_in_front(isurf, top, x_start, y) {
                        break;
                    }
                }
            }
        } else {
            // the obscured surface's visible run ends at this pixel
            let px = x_start >> FIX20_SHIFT;
            if px > self.isurfaces[top as usize].x_last {
                let x_last = self.isurfaces[top as usize].x_last;
                self.emit_span(top, x_last, px - x_last, y);
            }
            self.isurfaces[isurf as usize].x_last = px;
        }

        // link in front of `top`
        let prev = self.isurfaces[top as usize].prev;
        self.isurfaces[isurf as usize].next = top;
        self.isurfaces[isurf as usize].prev = prev;
        self.isurfaces[prev as usize].next = isurf;
        self.isurfaces[top as usize].prev = isurf;
    }

    /// A trailing edge closes its surface: when the surface was the
    /// nearest, emit its span and hand the scanline to the next one.
    fn trailing_edge(&mut self, edge: u32, y: i32) {
        let isurf = self.iedges[edge as usize].surf_offsets[0];

        self.isurfaces[isurf as usize].span_state -= 1;
        if self.isurfaces[isurf as usize].span_state != 0 {
            return;
        }

        if isurf == self.isurfaces[SURF_BACKGROUND as usize].next {
            let px = self.iedges[edge as usize].x_start >> FIX20_SHIFT;
            let x_last = self.isurfaces[isurf as usize].x_last;
            if px > x_last {
                self.emit_span(isurf, x_last, px - x_last, y);
            }
            let next = self.isurfaces[isurf as usize].next;
            self.isurfaces[next as usize].x_last = px;
        }

        let (prev, next) = {
            let s = &self.isurfaces[isurf as usize];
            (s.prev, s.next)
        };
        self.isurfaces[prev as usize].next = next;
        self.isurfaces[next as usize].prev = prev;
    }

    /// Close the nearest surface out to the right border and clear all
    /// span states for the next scanline.
    fn cleanup_span(&mut self, screen_end_x: i32, y: i32) {
        let top = self.isurfaces[SURF_BACKGROUND as usize].next;
        let x_last = self.isurfaces[top as usize].x_last;
        if x_last < screen_end_x {
            self.emit_span(top, x_last, screen_end_x - x_last, y);
        }

        let mut isurf = top;
        loop {
            self.isurfaces[isurf as usize].span_state = 0;
            isurf = self.isurfaces[isurf as usize].next;
            if isurf == SURF_BACKGROUND {
                break;
            }
        }
    }

    /// 1%-hysteresis depth test between a submodel surface and the
    /// coplanar surface currently on top.
    fn submodel_in_front(&self, isurf: u32, top: u32, x_start: i32, y: i32) -> bool {
        let s = &self.isurfaces[isurf as usize];
        let t = &self.isurfaces[top as usize];

        let x = fixed20_to_f32(x_start - FIX20_CEIL_BIAS);
        let new_invz = s.zi_start + s.zi_stepx * x + s.zi_stepy * y as f32;
        let top_invz = t.zi_start + t.zi_stepx * x + t.zi_stepy * y as f32;

        if new_invz * 0.99 >= top_invz {
            return true;
        }
        new_invz * 1.01 >= top_invz && s.zi_stepx >= t.zi_stepx
    }
}

/*======================================================================*/
/*                               Tests                                  */
/*======================================================================*/
