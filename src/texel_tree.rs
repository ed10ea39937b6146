//! R-tree over texel coordinates, used to fill illegal texels with the value
//! of their nearest legal neighbour.

use rstar::primitives::GeomWithData;
use rstar::RTree;


type Texel = GeomWithData<[i64; 2], usize>;

/// Static texel index returning positions in the slice it was built from.
#[derive(Debug, Clone)]
pub struct TexelTree {
    tree: RTree<Texel>,
}

fn to_point(pixel: [usize; 2]) -> [i64; 2] {
    [pixel[0] as i64, pixel[1] as i64]
}

impl TexelTree {
    pub fn new(pixels: &[[usize; 2]]) -> Self {
        let texels = pixels
            .iter()
            .enumerate()
            .map(|(i, &pixel)| Texel::new(to_point(pixel), i))
            .collect();
        Self {
            tree: RTree::bulk_load(texels),
        }
    }

    /// Index of the texel closest to `query`.
    pub fn nearest(&self, query: [usize; 2]) -> Option<usize> {
        self.tree
            .nearest_neighbor(&to_point(query))
            .map(|texel| texel.data)
    }
}
