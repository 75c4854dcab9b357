//!
//! # Regions & Deep Shape Store
//!
//! [Region] is the polygon-set currency of device extraction: cluster
//! geometry is materialized into flat regions, error markers carry them,
//! and deep-mode extraction inputs arrive as store-backed regions. The
//! [DeepShapeStore] pairs a layout handle with its initial cell, preserving
//! cell identity for hierarchical inputs.
//!

// Local imports
use crate::bbox::{BoundBox, BoundBoxTrait};
use crate::data::{CellKey, Layout};
use crate::geom::Polygon;
use crate::utils::Ptr;
use crate::LayerIndex;

/// # Deep Shape Store
///
/// A hierarchical shape source: a layout handle plus the initial cell.
/// Regions derived from a store remember its identity, which extraction
/// verifies before accepting them.
#[derive(Debug, Clone)]
pub struct DeepShapeStore {
    layout: Ptr<Layout>,
    initial_cell: CellKey,
}
impl DeepShapeStore {
    pub fn new(layout: Ptr<Layout>, initial_cell: CellKey) -> Self {
        Self {
            layout,
            initial_cell,
        }
    }
    pub fn layout(&self) -> &Ptr<Layout> {
        &self.layout
    }
    pub fn initial_cell(&self) -> CellKey {
        self.initial_cell
    }
    /// Identity token; two stores with equal tokens share their layout
    pub fn addr(&self) -> usize {
        self.layout.addr()
    }
    /// Create the deep region covering `layer` of this store
    pub fn region(&self, layer: LayerIndex) -> Region {
        Region {
            delegate: RegionDelegate::Deep(DeepLayer {
                store_addr: self.addr(),
                initial_cell: self.initial_cell,
                layer,
            }),
        }
    }
}

/// The deep delegate: a layer of a [DeepShapeStore]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeepLayer {
    store_addr: usize,
    initial_cell: CellKey,
    layer: LayerIndex,
}
impl DeepLayer {
    pub fn layer(&self) -> LayerIndex {
        self.layer
    }
    /// Does this layer originate from `store`?
    pub fn originates_from(&self, store: &DeepShapeStore) -> bool {
        self.store_addr == store.addr() && self.initial_cell == store.initial_cell()
    }
}

/// The two delegate kinds behind a [Region]
#[derive(Debug, Clone, PartialEq)]
enum RegionDelegate {
    Flat(Vec<Polygon>),
    Deep(DeepLayer),
}

/// # Region
///
/// A polygon set, either held flat or delegated to a deep store layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    delegate: RegionDelegate,
}
impl Default for Region {
    fn default() -> Self {
        Self::new()
    }
}
impl Region {
    /// Create a new, empty flat region
    pub fn new() -> Self {
        Self {
            delegate: RegionDelegate::Flat(Vec::new()),
        }
    }
    /// Create a flat region from polygons
    pub fn from_polygons(polys: Vec<Polygon>) -> Self {
        Self {
            delegate: RegionDelegate::Flat(polys),
        }
    }
    /// Insert a polygon; flat regions only
    pub fn insert(&mut self, poly: Polygon) {
        if let RegionDelegate::Flat(polys) = &mut self.delegate {
            polys.push(poly);
        }
    }
    /// The deep delegate, if this region is store-backed
    pub fn deep_layer(&self) -> Option<&DeepLayer> {
        match &self.delegate {
            RegionDelegate::Deep(dl) => Some(dl),
            RegionDelegate::Flat(_) => None,
        }
    }
    pub fn is_deep(&self) -> bool {
        self.deep_layer().is_some()
    }
    /// The polygons of a flat region; empty for deep regions
    pub fn polygons(&self) -> &[Polygon] {
        match &self.delegate {
            RegionDelegate::Flat(polys) => polys,
            RegionDelegate::Deep(_) => &[],
        }
    }
    /// Iterate the polygons of a flat region
    pub fn iter(&self) -> impl Iterator<Item = &Polygon> {
        self.polygons().iter()
    }
    pub fn len(&self) -> usize {
        self.polygons().len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Bounding box over a flat region's polygons
    pub fn bbox(&self) -> BoundBox {
        let mut bbox = BoundBox::empty();
        for p in self.iter() {
            bbox = p.bbox().union(&bbox);
        }
        bbox
    }
}
impl From<Polygon> for Region {
    fn from(poly: Polygon) -> Self {
        Self::from_polygons(vec![poly])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Units;
    use crate::poly::box_polygon;

    #[test]
    fn flat_regions() {
        let mut region = Region::new();
        assert!(region.is_empty());
        assert!(!region.is_deep());
        region.insert(box_polygon(&BoundBox::from_coords(0, 0, 10, 10)));
        region.insert(box_polygon(&BoundBox::from_coords(20, 0, 30, 10)));
        assert_eq!(region.len(), 2);
        assert_eq!(region.bbox(), BoundBox::from_coords(0, 0, 30, 10));
    }
    #[test]
    fn deep_region_identity() {
        let mut layout = Layout::new("lib", Units::Nano);
        let top = layout.add_cell("T");
        let ptr = Ptr::new(layout);
        let dss = DeepShapeStore::new(ptr.clone(), top);
        let other = DeepShapeStore::new(ptr, top);

        let region = dss.region(1);
        let dl = region.deep_layer().unwrap();
        assert_eq!(dl.layer(), 1);
        assert!(dl.originates_from(&dss));
        // Same layout, same cell: same origin
        assert!(dl.originates_from(&other));

        let mut foreign = Layout::new("other", Units::Nano);
        let ftop = foreign.add_cell("T");
        let fdss = DeepShapeStore::new(Ptr::new(foreign), ftop);
        assert!(!dl.originates_from(&fdss));
    }
}
