//! Bounding volume hierarchy over scene triangles.
//!
//! Built once per bake and shared read-only by the legality classifier, the
//! direct light seeding and the CPU renderer.

use crate::config::BVH_LEAF_SIZE;
use crate::geom::{BoundingBox, Triangle, Vector3f};

#[cfg(test)]
mod tests {

    use super::*;

    fn grid(n: usize) -> Vec<Triangle> {
        let mut triangles = Vec::new();
        for i in 0..n {
            for j in 0..n {
                let (x, y) = (i as f32, j as f32);
                triangles.push(
                    Triangle::new(
                        Vector3f::new(x, y, 0.0),
                        Vector3f::new(x + 1.0, y, 0.0),
                        Vector3f::new(x, y + 1.0, 0.0),
                    )
                    .unwrap(),
                );
            }
        }
        triangles
    }

    #[test]
    fn query_matches_brute_force() {
        let triangles = grid(6);
        let bvh = Bvh::new(&triangles);
        let query = BoundingBox::new(Vector3f::new(1.2, 1.2, -0.1), Vector3f::new(2.8, 3.1, 0.1));
        let mut found = bvh.query(&query, 0.05);
        found.sort_unstable();
        let expected: Vec<usize> = triangles
            .iter()
            .enumerate()
            .filter(|(_, t)| t.bounds.intersects(&query, 0.05))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn closest_hit_picks_nearest() {
        let near = Triangle::new(
            Vector3f::new(-1.0, -1.0, 1.0),
            Vector3f::new(1.0, -1.0, 1.0),
            Vector3f::new(0.0, 1.0, 1.0),
        )
        .unwrap();
        let far = Triangle::new(
            Vector3f::new(-1.0, -1.0, 3.0),
            Vector3f::new(1.0, -1.0, 3.0),
            Vector3f::new(0.0, 1.0, 3.0),
        )
        .unwrap();
        let bvh = Bvh::new(&[far, near]);
        let hit = bvh.closest_hit(&Vector3f::zeros(), &Vector3f::z(), f32::INFINITY).unwrap();
        assert_eq!(hit.triangle, 1);
        assert!((hit.t - 1.0).abs() < 1e-6);
        assert!(bvh.closest_hit(&Vector3f::zeros(), &-Vector3f::z(), f32::INFINITY).is_none());
        assert!(bvh.closest_hit(&Vector3f::zeros(), &Vector3f::z(), 0.5).is_none());
    }

    #[test]
    fn empty_tree() {
        let bvh = Bvh::new(&[]);
        assert!(bvh.query(&BoundingBox::new(Vector3f::zeros(), Vector3f::zeros()), 1.0).is_empty());
        assert!(bvh.closest_hit(&Vector3f::zeros(), &Vector3f::x(), 1.0).is_none());
    }
}

/// A ray hit against the tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Index of the triangle that was hit.
    pub triangle: usize,
    /// Ray parameter of the hit.
    pub t: f32,
    /// Barycentric weights of the hit point.
    pub barycentric: [f32; 3],
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        bounds: BoundingBox,
        triangles: Vec<usize>,
    },
    Branch {
        bounds: BoundingBox,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn bounds(&self) -> &BoundingBox {
        match self {
            Node::Leaf { bounds, .. } | Node::Branch { bounds, .. } => bounds,
        }
    }
}

/// Median-split BVH holding its own copy of the triangles.
#[derive(Debug, Clone)]
pub struct Bvh {
    triangles: Vec<Triangle>,
    root: Option<Node>,
}

impl Bvh {
    pub fn new(triangles: &[Triangle]) -> Self {
        let indices: Vec<usize> = (0..triangles.len()).collect();
        let root = (!indices.is_empty()).then(|| build(triangles, indices));
        Self {
            triangles: triangles.to_vec(),
            root,
        }
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    /// Indices of all triangles whose boxes overlap `bounds` grown by `tolerance`.
    pub fn query(&self, bounds: &BoundingBox, tolerance: f32) -> Vec<usize> {
        let mut result = Vec::new();
        let Some(root) = &self.root else {
            return result;
        };
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if !node.bounds().intersects(bounds, tolerance) {
                continue;
            }
            match node {
                Node::Leaf { triangles, .. } => result.extend(
                    triangles
                        .iter()
                        .copied()
                        .filter(|&i| self.triangles[i].bounds.intersects(bounds, tolerance)),
                ),
                Node::Branch { left, right, .. } => {
                    stack.push(left);
                    stack.push(right);
                }
            }
        }
        result
    }

    /// Closest triangle hit by the ray with parameter below `t_max`.
    pub fn closest_hit(&self, origin: &Vector3f, direction: &Vector3f, t_max: f32) -> Option<Hit> {
        let root = self.root.as_ref()?;
        let mut best: Option<Hit> = None;
        let mut stack = vec![root];

        while let Some(node) = stack.pop() {
            let limit = best.map_or(t_max, |hit| hit.t);
            match node.bounds().ray_intersects(origin, direction) {
                Some((entry, _)) if entry <= limit => {}
                _ => continue,
            }
            match node {
                Node::Leaf { triangles, .. } => {
                    for &i in triangles {
                        if let Some((t, barycentric)) = self.triangles[i].intersect_ray(origin, direction) {
                            if t < best.map_or(t_max, |hit| hit.t) {
                                best = Some(Hit {
                                    triangle: i,
                                    t,
                                    barycentric,
                                });
                            }
                        }
                    }
                }
                Node::Branch { left, right, .. } => {
                    stack.push(left);
                    stack.push(right);
                }
            }
        }
        best
    }

    /// Returns true if anything blocks the segment from `origin` to `origin + direction * t_max`.
    pub fn occluded(&self, origin: &Vector3f, direction: &Vector3f, t_max: f32) -> bool {
        self.closest_hit(origin, direction, t_max).is_some()
    }
}

fn build(triangles: &[Triangle], mut indices: Vec<usize>) -> Node {
    let bounds = BoundingBox::from_triangles(indices.iter().map(|&i| &triangles[i]));
    if indices.len() <= BVH_LEAF_SIZE {
        return Node::Leaf {
            bounds,
            triangles: indices,
        };
    }

    // split on the axis with the largest centroid spread
    let centroids = BoundingBox::from_points(
        indices
            .iter()
            .map(|&i| triangles[i].bounds.centroid())
            .collect::<Vec<_>>()
            .iter(),
    );
    let axis = centroids.extent().imax();

    let mid = indices.len() / 2;
    indices.select_nth_unstable_by(mid, |&a, &b| {
        let ca = triangles[a].bounds.centroid()[axis];
        let cb = triangles[b].bounds.centroid()[axis];
        ca.total_cmp(&cb)
    });
    let right = indices.split_off(mid);

    Node::Branch {
        bounds,
        left: Box::new(build(triangles, indices)),
        right: Box::new(build(triangles, right)),
    }
}
