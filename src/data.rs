//!
//! # Raw Layout Data Model
//!
//! Defines the primary structures for representation of hierarchical
//! geometry-based IC layout, including [Layout], [Cell], [CellInstArray],
//! and the shared [ShapeRepository] behind [PolygonRef] interning.
//!

// Std-Lib
use std::collections::{HashMap, HashSet};

// Crates.io
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

// Local Imports
use crate::bbox::{BoundBox, BoundBoxTrait};
use crate::geom::{Point, Polygon, Shape, ShapeTrait, Transform};
use crate::props::{PropertiesId, PropertiesRepository};
use crate::{Int, LayerIndex};

// Create key-types for each internal type stored in [SlotMap]s
new_key_type! {
    /// Keys for [Cell] entries
    pub struct CellKey;
}

/// Distance Units Enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Units {
    /// Micrometers, or microns for we olde folke
    Micro,
    /// Nanometers
    Nano,
    /// Angstroms
    Angstrom,
    /// Picometers
    Pico,
}
impl Default for Units {
    /// Default units are nanometers
    fn default() -> Units {
        Units::Nano
    }
}

/// Id of a polygon interned in a [ShapeRepository]
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct PolyId(pub usize);

/// # Shape Repository
///
/// Interns polygons in normalized (origin-anchored) form, so that
/// geometrically identical polygons at different locations share storage
/// and compare by id. Append-only; ids stay valid for the repository's
/// lifetime, and indexing with an id from another repository is an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShapeRepository {
    polys: Vec<Polygon>,
    ids: HashMap<Polygon, PolyId>,
}
impl ShapeRepository {
    /// Intern the (already normalized) polygon `poly`, returning its id
    fn intern(&mut self, poly: Polygon) -> PolyId {
        if let Some(id) = self.ids.get(&poly) {
            return *id;
        }
        let id = PolyId(self.polys.len());
        self.polys.push(poly.clone());
        self.ids.insert(poly, id);
        id
    }
    /// Get the normalized polygon for `id`
    pub fn polygon(&self, id: PolyId) -> &Polygon {
        &self.polys[id.0]
    }
    /// Number of distinct interned polygons
    pub fn len(&self) -> usize {
        self.polys.len()
    }
    pub fn is_empty(&self) -> bool {
        self.polys.is_empty()
    }
}

/// # Polygon Reference
///
/// A polygon canonicalized in a [ShapeRepository]: the stored polygon is
/// translated so its bounding-box corner sits at the origin, and the
/// displacement back to the original location is kept here. Equal
/// references imply equal geometry.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct PolygonRef {
    pub id: PolyId,
    pub disp: Point,
}
impl PolygonRef {
    /// Canonicalize `poly` into `repo`
    pub fn new(poly: &Polygon, repo: &mut ShapeRepository) -> Self {
        let bb = poly.bbox();
        let disp = if bb.is_empty() { Point::default() } else { bb.p0 };
        let mut normalized = poly.clone();
        normalized.shift(&Point::new(-disp.x, -disp.y));
        let id = repo.intern(normalized);
        Self { id, disp }
    }
    /// Reconstruct the referenced polygon at its original location
    pub fn polygon(&self, repo: &ShapeRepository) -> Polygon {
        let mut poly = repo.polygon(self.id).clone();
        poly.shift(&self.disp);
        poly
    }
    /// Bounding box at the original location
    pub fn bbox(&self, repo: &ShapeRepository) -> BoundBox {
        let mut bb = repo.polygon(self.id).bbox();
        if !bb.is_empty() {
            bb.p0 += self.disp;
            bb.p1 += self.disp;
        }
        bb
    }
}

/// The geometric payload of a stored shape: either a plain [Shape] or an
/// interned [PolygonRef]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ShapeData {
    Plain(Shape),
    Ref(PolygonRef),
}

/// A shape as stored in a [Shapes] container, with optional properties
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShapeRecord {
    pub data: ShapeData,
    pub props: Option<PropertiesId>,
}
impl ShapeRecord {
    /// Bounding box, resolving [PolygonRef]s through `repo`
    pub fn bbox(&self, repo: &ShapeRepository) -> BoundBox {
        match &self.data {
            ShapeData::Plain(s) => s.bbox(),
            ShapeData::Ref(r) => r.bbox(repo),
        }
    }
    /// Materialize as a plain [Shape], resolving [PolygonRef]s through `repo`
    pub fn resolve(&self, repo: &ShapeRepository) -> Shape {
        match &self.data {
            ShapeData::Plain(s) => s.clone(),
            ShapeData::Ref(r) => Shape::Polygon(r.polygon(repo)),
        }
    }
    /// Polygon view for area-carrying shapes
    pub fn as_polygon(&self, repo: &ShapeRepository) -> Option<Polygon> {
        match &self.data {
            ShapeData::Plain(s) => s.as_polygon(),
            ShapeData::Ref(r) => Some(r.polygon(repo)),
        }
    }
}

/// # Per-Layer Shape Container
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Shapes {
    records: Vec<ShapeRecord>,
}
impl Shapes {
    /// Insert a plain shape without properties
    pub fn insert(&mut self, shape: Shape) {
        self.records.push(ShapeRecord {
            data: ShapeData::Plain(shape),
            props: None,
        });
    }
    /// Insert a polygon reference without properties
    pub fn insert_ref(&mut self, pr: PolygonRef) {
        self.records.push(ShapeRecord {
            data: ShapeData::Ref(pr),
            props: None,
        });
    }
    /// Insert a polygon reference carrying the property set `props`
    pub fn insert_ref_with_props(&mut self, pr: PolygonRef, props: PropertiesId) {
        self.records.push(ShapeRecord {
            data: ShapeData::Ref(pr),
            props: Some(props),
        });
    }
    /// Insert a pre-assembled record
    pub fn insert_record(&mut self, record: ShapeRecord) {
        self.records.push(record);
    }
    /// Check whether an identical record is already present
    pub fn contains(&self, record: &ShapeRecord) -> bool {
        self.records.iter().any(|r| r == record)
    }
    pub fn iter(&self) -> impl Iterator<Item = &ShapeRecord> {
        self.records.iter()
    }
    pub fn len(&self) -> usize {
        self.records.len()
    }
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
    /// Bounding box over all records
    pub fn bbox(&self, repo: &ShapeRepository) -> BoundBox {
        let mut bbox = BoundBox::empty();
        for r in &self.records {
            bbox = r.bbox(repo).union(&bbox);
        }
        bbox
    }
}

/// # Cell Instance Array
///
/// Placement of a child [Cell], either as a single instance (`na == nb == 1`)
/// or as a regular array stepped by the `a` and `b` vectors in the parent's
/// coordinate frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CellInstArray {
    /// Instantiated cell
    pub cell: CellKey,
    /// Base placement, child frame into parent frame
    pub trans: Transform,
    /// Array counts along `a` and `b`
    pub na: usize,
    pub nb: usize,
    /// Array step vectors
    pub a: Point,
    pub b: Point,
    /// Optional instance properties
    pub prop_id: Option<PropertiesId>,
}
impl CellInstArray {
    /// Create a single (non-arrayed) instance
    pub fn new(cell: CellKey, trans: Transform) -> Self {
        Self {
            cell,
            trans,
            na: 1,
            nb: 1,
            a: Point::default(),
            b: Point::default(),
            prop_id: None,
        }
    }
    /// Create a regular array instance
    pub fn new_array(
        cell: CellKey,
        trans: Transform,
        na: usize,
        nb: usize,
        a: Point,
        b: Point,
    ) -> Self {
        Self {
            cell,
            trans,
            na: na.max(1),
            nb: nb.max(1),
            a,
            b,
            prop_id: None,
        }
    }
    /// Number of array members
    pub fn size(&self) -> usize {
        self.na * self.nb
    }
    /// Per-member child-to-parent transforms, in row-major array order
    pub fn member_transforms(&self) -> impl Iterator<Item = Transform> + '_ {
        (0..self.nb).flat_map(move |j| {
            (0..self.na).map(move |i| {
                let dx = self.a.x * i as Int + self.b.x * j as Int;
                let dy = self.a.y * i as Int + self.b.y * j as Int;
                Transform::cascade(&Transform::translate(dx, dy), &self.trans)
            })
        })
    }
    /// Bounding box of the whole array, given the child cell's bbox
    pub fn bbox(&self, child_bbox: &BoundBox) -> BoundBox {
        let mut bbox = BoundBox::empty();
        for t in self.member_transforms() {
            bbox = child_bbox.transform(&t).union(&bbox);
        }
        bbox
    }
}

/// # Layout Cell
///
/// A reusable hierarchy node: shapes on numbered layers, plus child
/// instance arrays.
#[derive(Debug, Clone, Default)]
pub struct Cell {
    /// Cell Name
    pub name: String,
    /// Shapes, per layer
    pub shapes: HashMap<LayerIndex, Shapes>,
    /// Child instance arrays
    pub insts: Vec<CellInstArray>,
    /// Optional cell properties
    pub prop_id: Option<PropertiesId>,
}
impl Cell {
    /// Create a new and empty Cell named `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
    /// Get the shape container for `layer`, if any shapes exist there
    pub fn shapes(&self, layer: LayerIndex) -> Option<&Shapes> {
        self.shapes.get(&layer)
    }
    /// Get or create the shape container for `layer`
    pub fn shapes_mut(&mut self, layer: LayerIndex) -> &mut Shapes {
        self.shapes.entry(layer).or_default()
    }
    /// Add a child instance array
    pub fn insert(&mut self, inst: CellInstArray) {
        self.insts.push(inst);
    }
}

/// Split-borrow bundle for pushing shapes into a target cell:
/// the destination container plus the layout's shape repository,
/// so interning stages can canonicalize while inserting.
pub struct PushTarget<'a> {
    pub shapes: &'a mut Shapes,
    pub repo: &'a mut ShapeRepository,
}

/// # Layout
///
/// The top-level layout container: a set of [Cell]s with unique names,
/// a shared [ShapeRepository], and a [PropertiesRepository].
#[derive(Debug, Clone, Default)]
pub struct Layout {
    /// Layout Name
    pub name: String,
    /// Distance Units
    pub units: Units,
    /// Cell definitions
    cells: SlotMap<CellKey, Cell>,
    /// Name => cell lookup
    cell_names: HashMap<String, CellKey>,
    /// Shared polygon repository
    pub repo: ShapeRepository,
    /// Property interning
    pub props: PropertiesRepository,
}
impl Layout {
    /// Create a new and empty Layout
    pub fn new(name: impl Into<String>, units: Units) -> Self {
        Self {
            name: name.into(),
            units,
            ..Default::default()
        }
    }
    /// Add a new cell named `name`, uniquifying with a `$<n>` suffix on
    /// collision. Returns the new cell's key.
    pub fn add_cell(&mut self, name: &str) -> CellKey {
        let mut candidate = name.to_string();
        let mut n = 1;
        while self.cell_names.contains_key(&candidate) {
            candidate = format!("{}${}", name, n);
            n += 1;
        }
        let key = self.cells.insert(Cell::new(candidate.clone()));
        self.cell_names.insert(candidate, key);
        key
    }
    /// Get a reference to cell `key`
    pub fn cell(&self, key: CellKey) -> &Cell {
        &self.cells[key]
    }
    /// Get a mutable reference to cell `key`
    pub fn cell_mut(&mut self, key: CellKey) -> &mut Cell {
        &mut self.cells[key]
    }
    /// Get the name of cell `key`
    pub fn cell_name(&self, key: CellKey) -> &str {
        &self.cells[key].name
    }
    /// Look a cell up by name
    pub fn cell_by_name(&self, name: &str) -> Option<CellKey> {
        self.cell_names.get(name).copied()
    }
    /// Iterate over all (key, cell) pairs
    pub fn cells(&self) -> impl Iterator<Item = (CellKey, &Cell)> {
        self.cells.iter()
    }
    /// Number of cells
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }
    /// Split-borrow the shape container of (`cell`, `layer`) together with
    /// the shared shape repository
    pub fn push_target(&mut self, cell: CellKey, layer: LayerIndex) -> PushTarget {
        let Layout { cells, repo, .. } = self;
        PushTarget {
            shapes: cells[cell].shapes_mut(layer),
            repo,
        }
    }
    /// Collect all cells called from `top`, inclusive.
    /// The hierarchy is expected to be acyclic.
    pub fn collect_called_cells(&self, top: CellKey) -> HashSet<CellKey> {
        let mut called = HashSet::new();
        let mut stack = vec![top];
        while let Some(key) = stack.pop() {
            if called.insert(key) {
                for inst in &self.cells[key].insts {
                    stack.push(inst.cell);
                }
            }
        }
        called
    }
    /// Compute the bounding box of cell `key`, over all layers and all
    /// child instances. Computed recursively on each call.
    pub fn cell_bbox(&self, key: CellKey) -> BoundBox {
        let cell = &self.cells[key];
        let mut bbox = BoundBox::empty();
        for shapes in cell.shapes.values() {
            bbox = shapes.bbox(&self.repo).union(&bbox);
        }
        for inst in &cell.insts {
            let child = self.cell_bbox(inst.cell);
            if !child.is_empty() {
                bbox = inst.bbox(&child).union(&bbox);
            }
        }
        bbox
    }
}
