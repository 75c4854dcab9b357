//!
//! # Hierarchy Builder
//!
//! Materializes a fresh hierarchical layout mirroring whatever hierarchy a
//! recursive shape traversal visits, honoring the traversal's clip region.
//! Cells are deduplicated per *(source cell, clip variant)*: two visits of
//! the same source cell under different clips land in distinct target
//! cells, while equal clips share one. A single builder may drive several
//! traversals, provided each is hierarchy-compatible with the first; passes
//! after the first add shapes only and leave the structure untouched.
//!

// Std-Lib
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};

// Crates.io
use log::{debug, trace};

// Local imports
use crate::bbox::{BoundBox, BoundBoxTrait};
use crate::data::{CellInstArray, CellKey, Layout};
use crate::error::{LayoutError, LayoutResult};
use crate::geom::{Shape, Transform};
use crate::hier::{ComplexRegion, HierarchyReceiver, NewInstMode, RecursiveShapeIterator};
use crate::receivers::{default_pipe, HierarchyShapeReceiver};
use crate::utils::{ErrorHelper, Ptr};
use crate::LayerIndex;

/// Name suffix for clip-variant target cells
pub const CLIP_VAR_SUFFIX: &str = "$CLIP_VAR";

/// A clip variant: the ordered set of visible rectangles of a source cell,
/// in that cell's coordinate frame. Empty means "unclipped".
pub type ClipVariant = BTreeSet<BoundBox>;

/// Cell-map key: source cell plus clip variant
pub type CellMapKey = (CellKey, ClipVariant);

/// Strict three-way comparison of two traversals with respect to the target
/// hierarchy they produce. Equal iterators are *hierarchy-compatible*: they
/// visit the same cells under the same clip variants, so a builder may
/// replay one after the other. The layout is compared by identity token;
/// the bounded region's exact box does not enter the comparison, matching
/// the appearance rules (layers and complex region do).
pub fn compare_hierarchies(
    iter1: &RecursiveShapeIterator,
    iter2: &RecursiveShapeIterator,
) -> Ordering {
    let ord = iter1
        .layout()
        .addr()
        .cmp(&iter2.layout().addr())
        .then(iter1.top_cell().cmp(&iter2.top_cell()))
        .then(iter1.max_depth().cmp(&iter2.max_depth()))
        .then(iter1.region().is_world().cmp(&iter2.region().is_world()));
    if ord != Ordering::Equal || iter1.region().is_world() {
        return ord;
    }
    iter1
        .has_complex_region()
        .cmp(&iter2.has_complex_region())
        .then_with(|| iter1.complex_region().cmp(&iter2.complex_region()))
        .then_with(|| iter1.multiple_layers().cmp(&iter2.multiple_layers()))
        .then_with(|| iter1.layer_selection().cmp(iter2.layer_selection()))
}

/// Compute the clip variant (a box set) for a child cell visit:
/// the child's bbox, cut by the region pulled back through the placement
/// `trans`, refined by any complex-region rectangles. `None` means the
/// member is entirely outside and must be excluded.
pub fn compute_clip_variant(
    cell_bbox: &BoundBox,
    trans: &Transform,
    region: &BoundBox,
    complex_region: Option<&ComplexRegion>,
) -> LayoutResult<Option<ClipVariant>> {
    if region.is_world() {
        return Ok(Some(ClipVariant::new()));
    }

    let trans_inv = trans.invert()?;
    let region_in_cell = region.transform(&trans_inv);
    if !cell_bbox.overlaps(&region_in_cell) {
        // an empty clip variant should not happen, but who knows
        return Ok(None);
    }

    let rect_box = region_in_cell.intersection(cell_bbox);
    let mut clip_variant = ClipVariant::new();

    match complex_region {
        Some(complex) => {
            for cr in complex.overlapping(region) {
                let cr_in_cell = cr.transform(&trans_inv);
                if rect_box.overlaps(&cr_in_cell) {
                    clip_variant.insert(rect_box.intersection(&cr_in_cell));
                }
            }
            if clip_variant.is_empty() {
                return Ok(None);
            }
        }
        None => {
            clip_variant.insert(rect_box);
        }
    }

    Ok(Some(clip_variant))
}

/// # Hierarchy Builder
///
/// A [HierarchyReceiver] writing the visited hierarchy into a target
/// [Layout]. The target handle is non-owning; the caller keeps the layout
/// alive and refrains from concurrent mutation for the traversal's
/// duration. The target must be a layout distinct from the traversed
/// source.
pub struct HierarchyBuilder {
    /// Target layout handle
    target: Ptr<Layout>,
    /// Layer receiving delivered shapes
    target_layer: LayerIndex,
    /// Shape receiver pipeline
    pipe: Box<dyn HierarchyShapeReceiver>,
    /// True until the first traversal completes
    initial_pass: bool,
    /// The first traversal's iterator, for compatibility checks
    ref_iter: Option<RecursiveShapeIterator>,
    /// (source cell, clip variant) => target cell
    cell_map: HashMap<CellMapKey, CellKey>,
    /// Keys visited in the current traversal
    cells_seen: HashSet<CellMapKey>,
    /// Target cells of the current descent
    cell_stack: Vec<CellKey>,
    /// Cell-map entry staged by the last instance callback
    cm_entry: Option<(CellMapKey, CellKey)>,
    /// The top target cell, after a completed traversal
    initial_cell: Option<CellKey>,
}

impl HierarchyBuilder {
    /// Create a new builder writing to `target` on `target_layer`,
    /// with receiver pipeline `pipe` (insert-as-is when `None`)
    pub fn new(
        target: Ptr<Layout>,
        target_layer: LayerIndex,
        pipe: Option<Box<dyn HierarchyShapeReceiver>>,
    ) -> Self {
        Self {
            target,
            target_layer,
            pipe: default_pipe(pipe),
            initial_pass: true,
            ref_iter: None,
            cell_map: HashMap::new(),
            cells_seen: HashSet::new(),
            cell_stack: Vec::new(),
            cm_entry: None,
            initial_cell: None,
        }
    }
    /// Install a new receiver pipeline; `None` restores the default
    /// insert-as-is stage
    pub fn set_shape_receiver(&mut self, pipe: Option<Box<dyn HierarchyShapeReceiver>>) {
        self.pipe = default_pipe(pipe);
    }
    /// Select the target layer for subsequently delivered shapes.
    /// Used between passes of incremental multi-layer builds.
    pub fn set_target_layer(&mut self, layer: LayerIndex) {
        self.target_layer = layer;
    }
    /// Clear all state; the next `begin` starts a fresh initial pass
    pub fn reset(&mut self) {
        self.initial_pass = true;
        self.ref_iter = None;
        self.initial_cell = None;
        self.cell_map.clear();
        self.cells_seen.clear();
        self.cell_stack.clear();
        self.cm_entry = None;
    }
    /// The top target cell, available once a traversal has completed
    pub fn initial_cell(&self) -> Option<CellKey> {
        self.initial_cell
    }
    /// The target layout handle
    pub fn target(&self) -> &Ptr<Layout> {
        &self.target
    }

    /// Look up the target cell for `key`, creating it on the initial pass.
    /// `name` is the source cell's name; clip variants get suffixed.
    fn lookup_or_create(
        &mut self,
        key: &CellMapKey,
        name: &str,
    ) -> LayoutResult<Option<CellKey>> {
        if let Some(tcell) = self.cell_map.get(key) {
            return Ok(Some(*tcell));
        }
        if !self.initial_pass {
            return Ok(None);
        }
        let suffix = if key.1.is_empty() { "" } else { CLIP_VAR_SUFFIX };
        let mut target = self.target.write()?;
        let tcell = target.add_cell(&format!("{}{}", name, suffix));
        trace!("new target cell '{}'", target.cell_name(tcell));
        drop(target);
        self.cell_map.insert(key.clone(), tcell);
        Ok(Some(tcell))
    }
}

impl HierarchyReceiver for HierarchyBuilder {
    fn begin(&mut self, iter: &RecursiveShapeIterator, source: &Layout) -> LayoutResult<()> {
        if self.initial_pass {
            debug!("hierarchy builder: initial pass over '{}'", source.name);
            self.ref_iter = Some(iter.clone());
        } else {
            let compatible = match &self.ref_iter {
                Some(r) => compare_hierarchies(r, iter) == Ordering::Equal,
                None => false,
            };
            self.assert(
                compatible,
                "traversal is not hierarchy-compatible with the initial pass",
            )?;
        }

        self.cell_stack.clear();
        self.cells_seen.clear();

        let key = (iter.top_cell(), ClipVariant::new());
        let name = source.cell_name(key.0).to_string();
        let entry = self.lookup_or_create(&key, &name)?;
        // The top cell is created on any pass, like every unclipped cell
        let entry = match entry {
            Some(e) => e,
            None => {
                let mut target = self.target.write()?;
                let e = target.add_cell(&name);
                drop(target);
                self.cell_map.insert(key.clone(), e);
                e
            }
        };

        self.cells_seen.insert(key.clone());
        self.cm_entry = Some((key, entry));
        self.cell_stack.push(entry);
        Ok(())
    }

    fn end(&mut self, _iter: &RecursiveShapeIterator, _source: &Layout) -> LayoutResult<()> {
        self.assert(self.cell_stack.len() == 1, "unbalanced traversal")?;
        self.initial_pass = false;
        self.cells_seen.clear();
        self.initial_cell = self.cell_stack.first().copied();
        self.cell_stack.clear();
        self.cm_entry = None;
        Ok(())
    }

    fn enter_cell(
        &mut self,
        _iter: &RecursiveShapeIterator,
        _source: &Layout,
        _cell: CellKey,
        _region: &BoundBox,
        _complex: Option<&ComplexRegion>,
    ) -> LayoutResult<()> {
        let (key, tcell) = self.unwrap(
            self.cm_entry.clone(),
            "cell entered without a preceding instance lookup",
        )?;
        self.cells_seen.insert(key);
        self.cell_stack.push(tcell);
        Ok(())
    }

    fn leave_cell(
        &mut self,
        _iter: &RecursiveShapeIterator,
        _source: &Layout,
        _cell: CellKey,
    ) -> LayoutResult<()> {
        self.cell_stack.pop();
        Ok(())
    }

    fn new_inst(
        &mut self,
        _iter: &RecursiveShapeIterator,
        source: &Layout,
        inst: &CellInstArray,
        _region: &BoundBox,
        _complex: Option<&ComplexRegion>,
        all: bool,
    ) -> LayoutResult<NewInstMode> {
        if !all {
            // Iterate by instance array members
            return Ok(NewInstMode::AllMembers);
        }

        let key = (inst.cell, ClipVariant::new());
        let name = source.cell_name(inst.cell).to_string();
        let entry = self.lookup_or_create(&key, &name)?;

        if self.initial_pass {
            if let Some(tcell) = entry {
                // Insert a copy of the whole array, child remapped
                let mut copy = inst.clone();
                copy.cell = tcell;
                let parent = self.unwrap(self.cell_stack.last().copied(), "empty cell stack")?;
                self.target.write()?.cell_mut(parent).insert(copy);
            }
        }
        self.cm_entry = entry.map(|e| (key.clone(), e));

        // To see the cell once, descend single. If we saw it already, skip
        // the whole instance array.
        Ok(if self.cells_seen.contains(&key) {
            NewInstMode::Skip
        } else {
            NewInstMode::Single
        })
    }

    fn new_inst_member(
        &mut self,
        _iter: &RecursiveShapeIterator,
        source: &Layout,
        inst: &CellInstArray,
        trans: &Transform,
        region: &BoundBox,
        complex: Option<&ComplexRegion>,
        all: bool,
    ) -> LayoutResult<bool> {
        if all {
            return Ok(true);
        }

        let cell_bbox = source.cell_bbox(inst.cell);
        let clip_variant = match compute_clip_variant(&cell_bbox, trans, region, complex)? {
            Some(v) => v,
            None => return Ok(false),
        };

        let key = (inst.cell, clip_variant);
        let name = source.cell_name(inst.cell).to_string();
        let entry = self.lookup_or_create(&key, &name)?;

        if self.initial_pass {
            if let Some(tcell) = entry {
                let parent = self.unwrap(self.cell_stack.last().copied(), "empty cell stack")?;
                self.target
                    .write()?
                    .cell_mut(parent)
                    .insert(CellInstArray::new(tcell, *trans));
            }
        }
        self.cm_entry = entry.map(|e| (key.clone(), e));

        Ok(!self.cells_seen.contains(&key))
    }

    fn shape(
        &mut self,
        _iter: &RecursiveShapeIterator,
        _source: &Layout,
        shape: &Shape,
        _trans: &Transform,
        region: &BoundBox,
        complex: Option<&ComplexRegion>,
    ) -> LayoutResult<()> {
        let cur = self.unwrap(self.cell_stack.last().copied(), "empty cell stack")?;
        let mut target = self.target.write()?;
        let mut tgt = target.push_target(cur, self.target_layer);
        self.pipe.push_shape(shape, region, complex, &mut tgt);
        Ok(())
    }
}

impl ErrorHelper for HierarchyBuilder {
    type Error = LayoutError;
    fn err(&self, msg: impl Into<String>) -> LayoutError {
        LayoutError::msg(format!("HierarchyBuilder: {}", msg.into()))
    }
}
