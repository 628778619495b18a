//! BSP helpers.
//!
//! Public API you can rely on:
//! ```text
//! BrushModel::find_leaf()
//! BrushModel::decompress_vis()
//! BrushModel::child()
//! ```

use glam::Vec3;

use crate::world::geometry::{BrushModel, ChildRef};

impl BrushModel {
    /// Decode child `side` of node `node_idx`.
    #[inline(always)]
    pub fn child(&self, node_idx: u32, side: usize) -> ChildRef {
        ChildRef::decode(self.nodes[node_idx as usize].children[side])
    }

    /// Walk the BSP from the root and return the index of the leaf
    /// containing `pos`.  A point exactly on a plane goes to the back
    /// child, matching the compiler's convention.
    pub fn find_leaf(&self, pos: Vec3) -> u32 {
        assert!(!self.nodes.is_empty(), "model has no BSP nodes");
        let mut node = 0u32;
        loop {
            let n = &self.nodes[node as usize];
            let d = self.planes[n.plane as usize].distance_to(pos);
            let side = if d > 0.0 { 0 } else { 1 };
            match ChildRef::decode(n.children[side]) {
                ChildRef::Node(idx) => node = idx,
                ChildRef::Leaf(idx) => return idx,
            }
        }
    }

    /// Decompress the PVS of leaf `leaf_idx` into `out`, one bit per leaf
    /// (bit `i` covers leaf `i + 1`; the solid leaf 0 has no entry).
    ///
    /// The stream is run-length encoded on zero bytes: a literal non-zero
    /// byte is copied, a zero byte is followed by the count of zero bytes
    /// it stands for.  The solid leaf and leaves without visibility info
    /// see everything.
    pub fn decompress_vis(&self, leaf_idx: u32, out: &mut Vec<u8>) {
        let num_bytes = (self.leaves.len().saturating_sub(1) + 7) >> 3;
        out.clear();

        let vis_offset = if leaf_idx == 0 {
            None
        } else {
            self.leaves[leaf_idx as usize].vis_offset
        };

        let Some(offset) = vis_offset else {
            out.resize(num_bytes, 0xff);
            return;
        };

        let mut src = &self.visibility[offset as usize..];
        while out.len() < num_bytes {
            match src {
                [0, count, rest @ ..] => {
                    let run = (*count as usize).min(num_bytes - out.len());
                    out.extend(std::iter::repeat_n(0u8, run));
                    src = rest;
                }
                [byte, rest @ ..] => {
                    out.push(*byte);
                    src = rest;
                }
                // truncated stream: treat the remainder as invisible
                [] => {
                    out.resize(num_bytes, 0);
                    break;
                }
            }
        }
    }
}

// ──────────────────────────────────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::testworld;
    use glam::vec3;

    #[test]
    fn find_leaf_locates_the_room() {
        let model = testworld::cube_room();
        // inside the room
        let leaf = model.find_leaf(vec3(0.0, 0.0, 64.0));
        assert_eq!(leaf, testworld::EMPTY_LEAF);
        // far outside on the +x side
        let leaf = model.find_leaf(vec3(1000.0, 0.0, 64.0));
        assert_eq!(leaf, testworld::SOLID_LEAF);
    }

    #[test]
    fn decompress_vis_expands_zero_runs() {
        let mut model = testworld::cube_room();
        // 20 leaves => 3 visibility bytes; stream: 0xAA, then 2 zero bytes
        model.leaves = (0..21)
            .map(|_| model.leaves[0].clone())
            .collect::<Vec<_>>();
        model.leaves[1].vis_offset = Some(0);
        model.visibility = vec![0xAA, 0x00, 0x02];

        let mut out = Vec::new();
        model.decompress_vis(1, &mut out);
        assert_eq!(out, vec![0xAA, 0x00, 0x00]);
    }

    #[test]
    fn decompress_vis_without_info_sees_everything() {
        let model = testworld::cube_room();
        let mut out = Vec::new();
        model.decompress_vis(testworld::EMPTY_LEAF, &mut out);
        assert!(!out.is_empty());
        assert!(out.iter().all(|&b| b == 0xff));
    }
}
