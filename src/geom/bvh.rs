//! Bounding-volume hierarchy over triangle boxes.
//!
//! Built once per boolean operand and queried for candidate triangle pairs
//! and ray hits during inside/outside classification.

use super::{BBox, Point3, Vec3};

#[derive(Debug, Clone, Copy)]
enum BvhNode {
    Leaf { bbox: BBox, start: u32, count: u32 },
    Inner { bbox: BBox, left: u32, right: u32 },
}

impl BvhNode {
    const fn bbox(&self) -> BBox {
        match *self {
            Self::Leaf { bbox, .. } | Self::Inner { bbox, .. } => bbox,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Bvh {
    nodes: Vec<BvhNode>,
    prim_indices: Vec<u32>,
    prim_bboxes: Vec<BBox>,
}

impl Bvh {
    const LEAF_SIZE: usize = 4;

    #[must_use]
    pub(crate) fn build(bboxes: &[BBox]) -> Option<Self> {
        if bboxes.is_empty() {
            return None;
        }
        let mut bvh = Self {
            nodes: Vec::with_capacity(bboxes.len() * 2),
            prim_indices: (0..bboxes.len() as u32).collect(),
            prim_bboxes: bboxes.to_vec(),
        };
        bvh.build_node(bboxes, 0, bboxes.len());
        Some(bvh)
    }

    fn build_node(&mut self, bboxes: &[BBox], start: usize, end: usize) -> u32 {
        let node_index = self.nodes.len() as u32;
        let prims = &self.prim_indices[start..end];
        let bbox = prims
            .iter()
            .map(|&i| bboxes[i as usize])
            .reduce(BBox::union)
            .unwrap_or_else(|| bboxes[0]);

        let count = end - start;
        if count <= Self::LEAF_SIZE {
            self.nodes.push(BvhNode::Leaf {
                bbox,
                start: start as u32,
                count: count as u32,
            });
            return node_index;
        }

        // Split at the median centroid along the widest centroid spread.
        let centers: Option<BBox> = prims
            .iter()
            .map(|&i| BBox::new(bboxes[i as usize].center(), bboxes[i as usize].center()))
            .reduce(BBox::union);
        let axis = centers.map_or(0, |c| c.size().dominant_axis());

        let mid = start + count / 2;
        self.prim_indices[start..end].select_nth_unstable_by(mid - start, |a, b| {
            let ca = bboxes[*a as usize].center().axis(axis);
            let cb = bboxes[*b as usize].center().axis(axis);
            ca.total_cmp(&cb)
        });

        // Reserve the slot; children are pushed after it.
        self.nodes.push(BvhNode::Leaf { bbox, start: 0, count: 0 });
        let left = self.build_node(bboxes, start, mid);
        let right = self.build_node(bboxes, mid, end);
        self.nodes[node_index as usize] = BvhNode::Inner { bbox, left, right };
        node_index
    }

    /// Visits every primitive whose box overlaps `query`. Stops when `visit`
    /// returns false.
    pub(crate) fn query_bbox<F>(&self, query: BBox, visit: F)
    where
        F: FnMut(usize) -> bool,
    {
        self.traverse(|bbox| bbox.intersects(query), visit);
    }

    /// Visits every primitive whose box the ray `origin + t dir`,
    /// `t in [t_min, t_max]` passes through.
    pub(crate) fn query_ray<F>(&self, origin: Point3, dir: Vec3, t_min: f64, t_max: f64, visit: F)
    where
        F: FnMut(usize) -> bool,
    {
        self.traverse(|bbox| ray_intersects_bbox(origin, dir, bbox, t_min, t_max), visit);
    }

    fn traverse<P, F>(&self, mut accept: P, mut visit: F)
    where
        P: FnMut(BBox) -> bool,
        F: FnMut(usize) -> bool,
    {
        let mut stack = vec![0u32];
        while let Some(node_idx) = stack.pop() {
            let node = self.nodes[node_idx as usize];
            if !accept(node.bbox()) {
                continue;
            }
            match node {
                BvhNode::Leaf { start, count, .. } => {
                    let range = start as usize..(start + count) as usize;
                    for &prim in &self.prim_indices[range] {
                        if !accept(self.prim_bboxes[prim as usize]) {
                            continue;
                        }
                        if !visit(prim as usize) {
                            return;
                        }
                    }
                }
                BvhNode::Inner { left, right, .. } => {
                    stack.push(left);
                    stack.push(right);
                }
            }
        }
    }
}

fn ray_intersects_bbox(origin: Point3, dir: Vec3, bbox: BBox, t_min: f64, t_max: f64) -> bool {
    let mut tmin = t_min;
    let mut tmax = t_max;
    let d = dir.to_array();

    for axis in 0..3 {
        let o = origin.axis(axis);
        let (min, max) = (bbox.min.axis(axis), bbox.max.axis(axis));
        if !o.is_finite() || !d[axis].is_finite() {
            return false;
        }
        if d[axis].abs() <= 1e-15 {
            if o < min || o > max {
                return false;
            }
            continue;
        }

        let inv_d = 1.0 / d[axis];
        let t0 = (min - o) * inv_d;
        let t1 = (max - o) * inv_d;
        tmin = tmin.max(t0.min(t1));
        tmax = tmax.min(t0.max(t1));
        if tmax < tmin {
            return false;
        }
    }

    true
}
