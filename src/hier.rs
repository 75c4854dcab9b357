//!
//! # Recursive Shape Traversal
//!
//! A push-mode traversal over a layout's cell hierarchy: the
//! [RecursiveShapeIterator] walks depth-first, parent before children, and
//! reports cells, instances, and shapes to a [HierarchyReceiver]. Search
//! regions are delivered in each visited cell's own coordinate frame; the
//! [ComplexRegion] rectangle list refines the single search box into a
//! rectangle union.
//!

// Std-Lib
use std::collections::BTreeSet;

// Crates.io
use log::debug;

// Local imports
use crate::bbox::{BoundBox, BoundBoxTrait};
use crate::data::{CellInstArray, CellKey, Layout};
use crate::error::LayoutResult;
use crate::geom::{Shape, Transform};
use crate::utils::Ptr;
use crate::LayerIndex;

/// # Complex Region
///
/// A union of axis-aligned rectangles refining a search region.
/// Rectangles are kept sorted and deduplicated, so equal contents compare
/// equal. The `overlapping` query is the stand-in for a spatial tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ComplexRegion {
    boxes: Vec<BoundBox>,
}
impl ComplexRegion {
    /// Create from any collection of rectangles; empties are dropped
    pub fn new(boxes: impl IntoIterator<Item = BoundBox>) -> Self {
        let mut boxes: Vec<_> = boxes.into_iter().filter(|b| !b.is_empty()).collect();
        boxes.sort();
        boxes.dedup();
        Self { boxes }
    }
    pub fn boxes(&self) -> &[BoundBox] {
        &self.boxes
    }
    /// Iterate the rectangles overlapping `search`
    pub fn overlapping<'a>(
        &'a self,
        search: &'a BoundBox,
    ) -> impl Iterator<Item = &'a BoundBox> {
        self.boxes.iter().filter(move |b| b.overlaps(search))
    }
    /// Transform every rectangle (to its transformed bounding box)
    pub fn transform(&self, trans: &Transform) -> ComplexRegion {
        Self::new(self.boxes.iter().map(|b| b.transform(trans)))
    }
}

/// Layer selection for a traversal: one layer, or an ordered set
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum LayerSelection {
    Single(LayerIndex),
    Multi(BTreeSet<LayerIndex>),
}
impl LayerSelection {
    pub fn is_multi(&self) -> bool {
        matches!(self, LayerSelection::Multi(_))
    }
    /// The selected layers, in delivery order
    pub fn layers(&self) -> Vec<LayerIndex> {
        match self {
            LayerSelection::Single(l) => vec![*l],
            LayerSelection::Multi(ls) => ls.iter().copied().collect(),
        }
    }
}

/// Receiver verdict for a whole instance array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewInstMode {
    /// Descend into the array's cell exactly once
    Single,
    /// Skip the whole array
    Skip,
    /// Iterate the array member-by-member
    AllMembers,
}

/// # Hierarchy Receiver
///
/// The callback surface driven by [RecursiveShapeIterator::scan]. The
/// `source` argument is the iterator's layout, locked for the duration of
/// the traversal; `region` and `complex` arrive in the coordinate frame of
/// the cell currently being visited.
pub trait HierarchyReceiver {
    /// Traversal starts; the top cell is about to be visited
    fn begin(&mut self, iter: &RecursiveShapeIterator, source: &Layout) -> LayoutResult<()>;
    /// Traversal ends
    fn end(&mut self, iter: &RecursiveShapeIterator, source: &Layout) -> LayoutResult<()>;
    /// A child cell is entered, after a positive instance verdict
    fn enter_cell(
        &mut self,
        iter: &RecursiveShapeIterator,
        source: &Layout,
        cell: CellKey,
        region: &BoundBox,
        complex: Option<&ComplexRegion>,
    ) -> LayoutResult<()>;
    /// The matching exit for `enter_cell`
    fn leave_cell(
        &mut self,
        iter: &RecursiveShapeIterator,
        source: &Layout,
        cell: CellKey,
    ) -> LayoutResult<()>;
    /// A new instance array was encountered; `all` indicates the whole
    /// array is traversed identically (no per-member clipping differences)
    fn new_inst(
        &mut self,
        iter: &RecursiveShapeIterator,
        source: &Layout,
        inst: &CellInstArray,
        region: &BoundBox,
        complex: Option<&ComplexRegion>,
        all: bool,
    ) -> LayoutResult<NewInstMode>;
    /// A single array member is up for descent; returns whether to descend
    fn new_inst_member(
        &mut self,
        iter: &RecursiveShapeIterator,
        source: &Layout,
        inst: &CellInstArray,
        trans: &Transform,
        region: &BoundBox,
        complex: Option<&ComplexRegion>,
        all: bool,
    ) -> LayoutResult<bool>;
    /// A shape of the current cell, on one of the selected layers.
    /// `trans` is the cumulative transform from the current cell to the top.
    fn shape(
        &mut self,
        iter: &RecursiveShapeIterator,
        source: &Layout,
        shape: &Shape,
        trans: &Transform,
        region: &BoundBox,
        complex: Option<&ComplexRegion>,
    ) -> LayoutResult<()>;
}

/// # Recursive Shape Iterator
///
/// Configuration and driver for one hierarchical traversal. Cloning is
/// cheap; the configuration doubles as the identity record the hierarchy
/// builder keeps for its compatibility check.
#[derive(Debug, Clone)]
pub struct RecursiveShapeIterator {
    layout: Ptr<Layout>,
    top: CellKey,
    layers: LayerSelection,
    region: BoundBox,
    complex_region: Option<ComplexRegion>,
    max_depth: usize,
}
impl RecursiveShapeIterator {
    /// Create a world-region, unbounded-depth traversal over one layer
    pub fn new(layout: Ptr<Layout>, top: CellKey, layer: LayerIndex) -> Self {
        Self {
            layout,
            top,
            layers: LayerSelection::Single(layer),
            region: BoundBox::world(),
            complex_region: None,
            max_depth: usize::MAX,
        }
    }
    /// Create a world-region traversal over a layer set
    pub fn new_multi(layout: Ptr<Layout>, top: CellKey, layers: BTreeSet<LayerIndex>) -> Self {
        Self {
            layout,
            top,
            layers: LayerSelection::Multi(layers),
            region: BoundBox::world(),
            complex_region: None,
            max_depth: usize::MAX,
        }
    }
    /// Restrict the traversal to `region`
    pub fn with_region(mut self, region: BoundBox) -> Self {
        self.region = region;
        self
    }
    /// Refine the search region to a rectangle union
    pub fn with_complex_region(mut self, complex: ComplexRegion) -> Self {
        self.complex_region = Some(complex);
        self
    }
    /// Limit the hierarchy depth below the top cell
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn layout(&self) -> &Ptr<Layout> {
        &self.layout
    }
    pub fn top_cell(&self) -> CellKey {
        self.top
    }
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
    pub fn region(&self) -> &BoundBox {
        &self.region
    }
    pub fn has_complex_region(&self) -> bool {
        self.complex_region.is_some()
    }
    pub fn complex_region(&self) -> Option<&ComplexRegion> {
        self.complex_region.as_ref()
    }
    pub fn multiple_layers(&self) -> bool {
        self.layers.is_multi()
    }
    pub fn layer_selection(&self) -> &LayerSelection {
        &self.layers
    }
    pub fn layers(&self) -> Vec<LayerIndex> {
        self.layers.layers()
    }

    /// Run the traversal, reporting into `recv`.
    /// Side effects on any target data occur in deterministic visit order:
    /// depth-first, parent before children.
    pub fn scan(&self, recv: &mut dyn HierarchyReceiver) -> LayoutResult<()> {
        let source = self.layout.read()?;
        debug!(
            "scanning cell '{}' on layers {:?}",
            source.cell_name(self.top),
            self.layers()
        );
        recv.begin(self, &source)?;
        self.scan_cell(
            &source,
            recv,
            self.top,
            self.region.clone(),
            self.complex_region.clone(),
            Transform::identity(),
            0,
        )?;
        recv.end(self, &source)
    }

    /// Visit one cell: deliver its shapes, then recurse into instances
    #[allow(clippy::too_many_arguments)]
    fn scan_cell(
        &self,
        source: &Layout,
        recv: &mut dyn HierarchyReceiver,
        cell: CellKey,
        region: BoundBox,
        complex: Option<ComplexRegion>,
        trans: Transform,
        depth: usize,
    ) -> LayoutResult<()> {
        let celldef = source.cell(cell);
        for layer in self.layers() {
            if let Some(shapes) = celldef.shapes(layer) {
                for record in shapes.iter() {
                    let bb = record.bbox(&source.repo);
                    if !selects(&bb, &region, complex.as_ref()) {
                        continue;
                    }
                    let shape = record.resolve(&source.repo);
                    recv.shape(self, source, &shape, &trans, &region, complex.as_ref())?;
                }
            }
        }
        if depth >= self.max_depth {
            return Ok(());
        }
        for inst in &celldef.insts {
            let child_bbox = source.cell_bbox(inst.cell);
            if child_bbox.is_empty() {
                continue;
            }
            let array_bbox = inst.bbox(&child_bbox);
            if !region.is_world() && !array_bbox.touches(&region) {
                continue;
            }
            let all = region.is_world() || (complex.is_none() && array_bbox.inside(&region));
            match recv.new_inst(self, source, inst, &region, complex.as_ref(), all)? {
                NewInstMode::Skip => continue,
                NewInstMode::Single => {
                    if let Some(t) = inst.member_transforms().next() {
                        if recv.new_inst_member(
                            self,
                            source,
                            inst,
                            &t,
                            &region,
                            complex.as_ref(),
                            true,
                        )? {
                            self.descend(source, recv, inst.cell, &region, complex.as_ref(), &trans, &t, depth)?;
                        }
                    }
                }
                NewInstMode::AllMembers => {
                    for t in inst.member_transforms() {
                        let member_bbox = child_bbox.transform(&t);
                        if !region.is_world() && !member_bbox.touches(&region) {
                            continue;
                        }
                        if recv.new_inst_member(
                            self,
                            source,
                            inst,
                            &t,
                            &region,
                            complex.as_ref(),
                            false,
                        )? {
                            self.descend(source, recv, inst.cell, &region, complex.as_ref(), &trans, &t, depth)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Enter a child cell through one member transform, pulling the search
    /// region back into the child's frame
    #[allow(clippy::too_many_arguments)]
    fn descend(
        &self,
        source: &Layout,
        recv: &mut dyn HierarchyReceiver,
        child: CellKey,
        region: &BoundBox,
        complex: Option<&ComplexRegion>,
        trans_to_top: &Transform,
        member: &Transform,
        depth: usize,
    ) -> LayoutResult<()> {
        let (child_region, child_complex) = if region.is_world() {
            (BoundBox::world(), None)
        } else {
            let inv = member.invert()?;
            (region.transform(&inv), complex.map(|c| c.transform(&inv)))
        };
        recv.enter_cell(self, source, child, &child_region, child_complex.as_ref())?;
        self.scan_cell(
            source,
            recv,
            child,
            child_region,
            child_complex,
            Transform::cascade(trans_to_top, member),
            depth + 1,
        )?;
        recv.leave_cell(self, source, child)
    }
}

/// Shape delivery test: does a shape bbox fall into the searched region?
/// Delivery is a superset of the final clip; receivers drop the remainder.
fn selects(bb: &BoundBox, region: &BoundBox, complex: Option<&ComplexRegion>) -> bool {
    if region.is_world() {
        return true;
    }
    if !bb.touches(region) {
        return false;
    }
    match complex {
        None => true,
        Some(c) => {
            let rect = bb.intersection(region);
            c.boxes().iter().any(|b| b.touches(&rect))
        }
    }
}
