use glam::Vec3;

use crate::world::geometry::{BspLevel, Child, LeafId};

// ──────────────────────────────────────────────────────────────────────────
//                       BspLevel – point location & PVS
// ──────────────────────────────────────────────────────────────────────────
impl BspLevel {
    /// Walk the world BSP and return the leaf containing `p`.
    pub fn point_in_leaf(&self, p: Vec3) -> LeafId {
        self.point_in_leaf_from(self.world().head_node, p)
    }

    /// Same as [`point_in_leaf`](Self::point_in_leaf) but starting at `head`.
    pub fn point_in_leaf_from(&self, head: Child, p: Vec3) -> LeafId {
        let mut child = head;
        loop {
            match child {
                Child::Leaf(leaf) => return leaf,
                Child::Node(idx) => {
                    let node = &self.nodes[idx];
                    let d = self.planes[node.plane].distance(p);
                    child = node.children[if d > 0.0 { 0 } else { 1 }];
                }
            }
        }
    }

    /// Bytes in one decompressed PVS row.
    #[inline]
    pub fn pvs_row_bytes(&self) -> usize {
        self.vis_leaf_count().div_ceil(8)
    }

    /// Decompressed visibility row for `leaf`: bit `i` (LSB first) set means
    /// `leaves[i + 1]` is potentially visible.
    ///
    /// The solid leaf and leaves without a row see everything.
    pub fn leaf_pvs(&self, leaf: LeafId) -> Vec<u8> {
        let row = self.pvs_row_bytes();
        match self.leaves[leaf].vis_offset {
            Some(ofs) if leaf != 0 && ofs < self.vis_data.len() => {
                decompress_vis(&self.vis_data[ofs..], row)
            }
            _ => vec![0xFF; row],
        }
    }
}

/// Expand one run-length encoded PVS row.
///
/// Non-zero bytes are literal, a zero byte is followed by the number of
/// zero bytes it stands for. Truncated input leaves the rest invisible.
pub fn decompress_vis(input: &[u8], row: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(row);
    let mut i = 0;
    while out.len() < row && i < input.len() {
        let b = input[i];
        if b != 0 {
            out.push(b);
            i += 1;
            continue;
        }
        let run = input.get(i + 1).copied().unwrap_or(0) as usize;
        i += 2;
        let run = run.min(row - out.len());
        out.resize(out.len() + run, 0);
    }
    out.resize(row, 0);
    out
}

/// Inverse of [`decompress_vis`], used when building levels in memory.
pub fn compress_vis(row: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(row.len());
    let mut i = 0;
    while i < row.len() {
        if row[i] != 0 {
            out.push(row[i]);
            i += 1;
            continue;
        }
        let mut run = 1;
        while i + run < row.len() && row[i + run] == 0 && run < 255 {
            run += 1;
        }
        out.push(0);
        out.push(run as u8);
        i += run;
    }
    out
}

/// Is leaf `leaf` (not the solid one) set in a decompressed row?
#[inline]
pub fn pvs_contains(row: &[u8], leaf: LeafId) -> bool {
    let i = leaf - 1;
    row.get(i >> 3).is_some_and(|b| b & (1 << (i & 7)) != 0)
}
