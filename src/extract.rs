//!
//! # Netlist Device Extractor
//!
//! Walks connected geometry clusters of a (possibly deeply hierarchical)
//! layout, delegates device recognition to a device-specific
//! [DeviceExtractorDelegate], and records both the abstract netlist and its
//! back-annotation into the layout: canonical device cells, terminal
//! property markers, and device-id-tagged instances.
//!

// Std-Lib
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

// Crates.io
use log::debug;
use rust_decimal::Decimal;

// Local imports
use crate::bbox::BoundBox;
use crate::clusters::{ClusterId, Connectivity, HierClusters};
use crate::data::{CellInstArray, CellKey, Layout, PolygonRef, ShapeData, ShapeRecord};
use crate::error::{LayoutError, LayoutResult};
use crate::geom::{Point, Polygon, ShapeTrait, Transform, TransformTrait};
use crate::netlist::{
    Circuit, CircuitKey, Device, DeviceAbstract, DeviceAbstractId, DeviceClass, DeviceClassId,
    DeviceId, Netlist, ParamId, SubCircuitRef, TerminalId,
};
use crate::poly::box_polygon;
use crate::props::{PropNameId, PropValue, PropertySet};
use crate::region::{DeepShapeStore, Region};
use crate::utils::{ErrorHelper, Ptr};
use crate::LayerIndex;

/// Legacy in-line terminal marker: value is the (device, terminal) id pair
pub const TERMINAL_PROPERTY_NAME: &str = "TERMINAL";
/// Terminal index of a shape within its device cell
pub const TERMINAL_ID_PROPERTY_NAME: &str = "TERMINAL_ID";
/// Device id carried by a device-cell instance
pub const DEVICE_ID_PROPERTY_NAME: &str = "DEVICE_ID";
/// Device class name; presence on a cell marks it as a device cell
pub const DEVICE_CLASS_PROPERTY_NAME: &str = "DEVICE_CLASS";
/// Device cells are named `D$<device class name>`
pub const DEVICE_CELL_PREFIX: &str = "D$";
/// Device parameter values recorded on device cells: `P$<param name>`
pub const PARAM_PROPERTY_PREFIX: &str = "P$";

/// # Extraction Error Record
///
/// A recoverable per-cell problem reported by the device recognition code.
/// Extraction continues past these; they accumulate in order.
#[derive(Debug, Clone, PartialEq)]
pub struct NetlistDeviceExtractorError {
    pub cell_name: String,
    pub message: String,
    pub category_name: Option<String>,
    pub category_description: Option<String>,
    pub geometry: Option<Region>,
}
impl NetlistDeviceExtractorError {
    pub fn new(cell_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            cell_name: cell_name.into(),
            message: message.into(),
            category_name: None,
            category_description: None,
            geometry: None,
        }
    }
    pub fn set_geometry(&mut self, region: Region) {
        self.geometry = Some(region);
    }
    pub fn set_category_name(&mut self, name: impl Into<String>) {
        self.category_name = Some(name.into());
    }
    pub fn set_category_description(&mut self, description: impl Into<String>) {
        self.category_description = Some(description.into());
    }
}

/// One declared input layer; declaration order assigns the geometry index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetlistDeviceExtractorLayerDefinition {
    pub name: String,
    pub description: String,
    pub index: usize,
}

/// Back-annotation style
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceExtractorMode {
    /// Terminal polygons go directly into the including cell, tagged with
    /// the legacy `TERMINAL` marker
    Inline,
    /// Each device becomes an instance of a canonical device cell; cells
    /// carry `DEVICE_CLASS` and `TERMINAL_ID`, instances carry `DEVICE_ID`
    DeviceCells,
}

/// # Device Extractor Delegate
///
/// The device-specific rule set. Implementations declare their input
/// layers and device class in `setup`, describe intra-device conductivity
/// in `get_connectivity`, and recognize devices from per-layer cluster
/// geometry in `extract_devices`, calling back into the engine's helpers
/// (`create_device`, `define_terminal`, `error`, ...).
pub trait DeviceExtractorDelegate {
    fn setup(&mut self, ex: &mut NetlistDeviceExtractor) -> LayoutResult<()>;
    fn get_connectivity(&self, layout: &Layout, layers: &[LayerIndex]) -> Connectivity;
    fn extract_devices(
        &mut self,
        ex: &mut NetlistDeviceExtractor,
        layer_geometry: &[Region],
    ) -> LayoutResult<()>;
}

/// Device-cell key: normalized per-(terminal, layer) geometry plus the
/// parameter map. Two devices with equal keys collapse to one cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceCellKey {
    pub geometry: BTreeMap<(TerminalId, LayerIndex), BTreeSet<PolygonRef>>,
    pub params: BTreeMap<ParamId, Decimal>,
}

/// # Device-Cell Registry
///
/// Canonicalizes devices into reusable device cells. Entries reference
/// netlist-owned device abstracts and layout cell keys; the registry owns
/// neither.
#[derive(Debug, Clone, Default)]
pub struct DeviceCellRegistry {
    map: HashMap<DeviceCellKey, (CellKey, DeviceAbstractId)>,
}
impl DeviceCellRegistry {
    pub fn clear(&mut self) {
        self.map.clear();
    }
    pub fn get(&self, key: &DeviceCellKey) -> Option<(CellKey, DeviceAbstractId)> {
        self.map.get(key).copied()
    }
    pub fn insert(&mut self, key: DeviceCellKey, cell: CellKey, abs: DeviceAbstractId) {
        self.map.insert(key, (cell, abs));
    }
    pub fn len(&self) -> usize {
        self.map.len()
    }
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// # Netlist Device Extractor Engine
///
/// Holds the extraction state a [DeviceExtractorDelegate]'s hooks operate
/// on. One `extract` call is one extraction; errors and per-device
/// accumulators reset at its start, while the bound netlist's circuits are
/// reused across runs.
pub struct NetlistDeviceExtractor {
    name: String,
    mode: DeviceExtractorMode,
    layer_definitions: Vec<NetlistDeviceExtractorLayerDefinition>,
    device_class: Option<DeviceClassId>,
    layout: Option<Ptr<Layout>>,
    netlist: Option<Ptr<Netlist>>,
    layers: Vec<LayerIndex>,
    cell_index: Option<CellKey>,
    circuit: Option<CircuitKey>,
    terminal_prop: PropNameId,
    terminal_id_prop: PropNameId,
    device_id_prop: PropNameId,
    device_class_prop: PropNameId,
    errors: Vec<NetlistDeviceExtractorError>,
    /// Terminal geometry accumulated between `create_device` and folding
    device_geometry: BTreeMap<DeviceId, BTreeMap<(TerminalId, LayerIndex), Vec<Polygon>>>,
    /// Devices created since the last fold
    pending_devices: Vec<DeviceId>,
    registry: DeviceCellRegistry,
}

impl NetlistDeviceExtractor {
    /// Create an extractor named `name`; the name also becomes the
    /// registered device class's name
    pub fn new(name: impl Into<String>, mode: DeviceExtractorMode) -> Self {
        Self {
            name: name.into(),
            mode,
            layer_definitions: Vec::new(),
            device_class: None,
            layout: None,
            netlist: None,
            layers: Vec::new(),
            cell_index: None,
            circuit: None,
            terminal_prop: PropNameId::default(),
            terminal_id_prop: PropNameId::default(),
            device_id_prop: PropNameId::default(),
            device_class_prop: PropNameId::default(),
            errors: Vec::new(),
            device_geometry: BTreeMap::new(),
            pending_devices: Vec::new(),
            registry: DeviceCellRegistry::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn mode(&self) -> DeviceExtractorMode {
        self.mode
    }
    /// The accumulated recoverable errors, in report order
    pub fn errors(&self) -> &[NetlistDeviceExtractorError] {
        &self.errors
    }
    pub fn layer_definitions(&self) -> &[NetlistDeviceExtractorLayerDefinition] {
        &self.layer_definitions
    }
    /// The resolved input layers, in declaration order
    pub fn layers(&self) -> &[LayerIndex] {
        &self.layers
    }
    pub fn layout(&self) -> Option<&Ptr<Layout>> {
        self.layout.as_ref()
    }
    /// The cell currently being extracted
    pub fn cell_index(&self) -> Option<CellKey> {
        self.cell_index
    }
    /// Name of the cell currently being extracted, empty outside extraction
    pub fn cell_name(&self) -> String {
        match (&self.layout, self.cell_index) {
            (Some(layout), Some(ci)) => layout
                .read()
                .map(|l| l.cell_name(ci).to_string())
                .unwrap_or_default(),
            _ => String::new(),
        }
    }

    // ------------------------------------------------------------------
    //  Declaration-phase helpers, called from `setup`

    /// Declare the next input layer; declaration order defines the
    /// geometry index used by `define_terminal`
    pub fn define_layer(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> usize {
        let index = self.layer_definitions.len();
        self.layer_definitions.push(NetlistDeviceExtractorLayerDefinition {
            name: name.into(),
            description: description.into(),
            index,
        });
        index
    }

    /// Register the device class; exactly one registration is allowed per
    /// extractor. The class is renamed to the extractor's name.
    pub fn register_device_class(&mut self, mut class: DeviceClass) -> LayoutResult<DeviceClassId> {
        if self.device_class.is_some() {
            return self.fail("device class already set");
        }
        class.name = self.name.clone();
        let nl = self.unwrap(self.netlist.clone(), "no netlist bound")?;
        let id = nl.write()?.add_device_class(class);
        self.device_class = Some(id);
        Ok(id)
    }

    // ------------------------------------------------------------------
    //  Recognition-phase helpers, called from `extract_devices`

    /// Create a device in the current circuit, returning its id.
    /// Fails when no device class was registered.
    pub fn create_device(&mut self) -> LayoutResult<DeviceId> {
        let class = self.unwrap(self.device_class, "no device class registered")?;
        let ckey = self.unwrap(self.circuit, "no current circuit")?;
        let nl = self.unwrap(self.netlist.clone(), "no netlist bound")?;
        let mut nlw = nl.write()?;
        let id = nlw.next_device_id();
        nlw.circuit_mut(ckey).devices.push(Device::new(id, class));
        drop(nlw);
        if self.mode == DeviceExtractorMode::DeviceCells {
            self.pending_devices.push(id);
        }
        Ok(id)
    }

    /// Set a device's position in the including cell's frame. Terminal
    /// geometry is normalized relative to this point when folding into
    /// device cells.
    pub fn set_device_position(&mut self, device: DeviceId, position: Point) -> LayoutResult<()> {
        self.with_device_mut(device, |d| d.position = position)
    }

    /// Set a device parameter value
    pub fn set_device_parameter(
        &mut self,
        device: DeviceId,
        param: ParamId,
        value: Decimal,
    ) -> LayoutResult<()> {
        self.with_device_mut(device, |d| {
            d.params.insert(param, value);
        })
    }

    fn with_device_mut(
        &mut self,
        device: DeviceId,
        f: impl FnOnce(&mut Device),
    ) -> LayoutResult<()> {
        let ckey = self.unwrap(self.circuit, "no current circuit")?;
        let nl = self.unwrap(self.netlist.clone(), "no netlist bound")?;
        let mut nlw = nl.write()?;
        let d = nlw.circuit_mut(ckey).device_mut(device);
        match d {
            Some(d) => {
                f(d);
                Ok(())
            }
            None => self.fail("device does not belong to the current circuit"),
        }
    }

    /// Attach terminal geometry to a device. In [DeviceExtractorMode::Inline]
    /// the polygon is written into the current cell immediately, tagged with
    /// the legacy `TERMINAL` marker; in [DeviceExtractorMode::DeviceCells]
    /// it accumulates until the device is folded into its device cell.
    pub fn define_terminal(
        &mut self,
        device: DeviceId,
        terminal: TerminalId,
        geometry_index: usize,
        polygon: &Polygon,
    ) -> LayoutResult<()> {
        self.assert(
            geometry_index < self.layers.len(),
            "geometry index out of range",
        )?;
        let layer = self.layers[geometry_index];

        match self.mode {
            DeviceExtractorMode::Inline => {
                let layout = self.unwrap(self.layout.clone(), "no layout bound")?;
                let ci = self.unwrap(self.cell_index, "no current cell")?;
                let mut lw = layout.write()?;
                let mut ps = PropertySet::new();
                ps.insert(
                    self.terminal_prop,
                    PropValue::IntPair(device.0 as i64, terminal as i64),
                );
                let pid = lw.props.properties_id(ps);
                let tgt = lw.push_target(ci, layer);
                let pr = PolygonRef::new(polygon, tgt.repo);
                let record = ShapeRecord {
                    data: ShapeData::Ref(pr),
                    props: Some(pid),
                };
                // re-runs deliver identical markers; keep them single
                if !tgt.shapes.contains(&record) {
                    tgt.shapes.insert_record(record);
                }
            }
            DeviceExtractorMode::DeviceCells => {
                self.device_geometry
                    .entry(device)
                    .or_default()
                    .entry((terminal, layer))
                    .or_default()
                    .push(polygon.clone());
            }
        }
        Ok(())
    }

    /// Box-valued terminal geometry
    pub fn define_terminal_box(
        &mut self,
        device: DeviceId,
        terminal: TerminalId,
        geometry_index: usize,
        bx: &BoundBox,
    ) -> LayoutResult<()> {
        self.define_terminal(device, terminal, geometry_index, &box_polygon(bx))
    }

    /// Point-valued terminal geometry. One unit is added around the point
    /// to keep it from vanishing.
    pub fn define_terminal_point(
        &mut self,
        device: DeviceId,
        terminal: TerminalId,
        geometry_index: usize,
        point: Point,
    ) -> LayoutResult<()> {
        let dv = Point::new(1, 1);
        self.define_terminal_box(
            device,
            terminal,
            geometry_index,
            &BoundBox::from_points(point - dv, point + dv),
        )
    }

    // ------------------------------------------------------------------
    //  Error reporting, called from `extract_devices`

    pub fn error(&mut self, msg: impl Into<String>) {
        let cell_name = self.cell_name();
        self.errors
            .push(NetlistDeviceExtractorError::new(cell_name, msg));
    }
    pub fn error_with_poly(&mut self, msg: impl Into<String>, poly: &Polygon) {
        self.error(msg);
        if let Some(last) = self.errors.last_mut() {
            last.set_geometry(Region::from(poly.clone()));
        }
    }
    pub fn error_with_region(&mut self, msg: impl Into<String>, region: Region) {
        self.error(msg);
        if let Some(last) = self.errors.last_mut() {
            last.set_geometry(region);
        }
    }
    pub fn categorized_error(
        &mut self,
        category_name: impl Into<String>,
        category_description: impl Into<String>,
        msg: impl Into<String>,
    ) {
        self.error(msg);
        if let Some(last) = self.errors.last_mut() {
            last.set_category_name(category_name);
            last.set_category_description(category_description);
        }
    }
    pub fn categorized_error_with_poly(
        &mut self,
        category_name: impl Into<String>,
        category_description: impl Into<String>,
        msg: impl Into<String>,
        poly: &Polygon,
    ) {
        self.categorized_error(category_name, category_description, msg);
        if let Some(last) = self.errors.last_mut() {
            last.set_geometry(Region::from(poly.clone()));
        }
    }
    pub fn categorized_error_with_region(
        &mut self,
        category_name: impl Into<String>,
        category_description: impl Into<String>,
        msg: impl Into<String>,
        region: Region,
    ) {
        self.categorized_error(category_name, category_description, msg);
        if let Some(last) = self.errors.last_mut() {
            last.set_geometry(region);
        }
    }

    // ------------------------------------------------------------------
    //  Extraction entry points

    /// Flat-ish mode: a layout, a top cell, and the input layer indices in
    /// declaration order
    pub fn extract(
        &mut self,
        delegate: &mut dyn DeviceExtractorDelegate,
        layout: &Ptr<Layout>,
        top: CellKey,
        layers: &[LayerIndex],
        netlist: &Ptr<Netlist>,
        clusters: &mut HierClusters,
    ) -> LayoutResult<()> {
        self.initialize(delegate, netlist)?;
        self.extract_without_initialize(delegate, layout, top, layers.to_vec(), clusters)
    }

    /// Deep mode: a deep-shape store plus name-keyed input regions, each of
    /// which must be deep and backed by `dss`
    pub fn extract_deep(
        &mut self,
        delegate: &mut dyn DeviceExtractorDelegate,
        dss: &DeepShapeStore,
        layer_map: &HashMap<String, Region>,
        netlist: &Ptr<Netlist>,
        clusters: &mut HierClusters,
    ) -> LayoutResult<()> {
        self.initialize(delegate, netlist)?;

        let mut layers = Vec::with_capacity(self.layer_definitions.len());
        for ld in &self.layer_definitions {
            let region = layer_map.get(&ld.name).ok_or_else(|| {
                LayoutError::msg(format!(
                    "missing input layer for device extraction: {}",
                    ld.name
                ))
            })?;
            let dl = region.deep_layer().ok_or_else(|| {
                LayoutError::msg(format!(
                    "invalid region passed to input layer '{}' for device extraction: must be of deep region kind",
                    ld.name
                ))
            })?;
            if !dl.originates_from(dss) {
                return LayoutError::fail(format!(
                    "invalid region passed to input layer '{}' for device extraction: not originating from the same source",
                    ld.name
                ));
            }
            layers.push(dl.layer());
        }

        self.extract_without_initialize(
            delegate,
            dss.layout(),
            dss.initial_cell(),
            layers,
            clusters,
        )
    }

    /// Reset per-extraction state and run the delegate's declaration phase
    fn initialize(
        &mut self,
        delegate: &mut dyn DeviceExtractorDelegate,
        netlist: &Ptr<Netlist>,
    ) -> LayoutResult<()> {
        self.layer_definitions.clear();
        self.device_class = None;
        self.errors.clear();
        self.device_geometry.clear();
        self.pending_devices.clear();
        self.registry.clear();
        self.netlist = Some(netlist.clone());
        delegate.setup(self)
    }

    fn extract_without_initialize(
        &mut self,
        delegate: &mut dyn DeviceExtractorDelegate,
        layout: &Ptr<Layout>,
        top: CellKey,
        layers: Vec<LayerIndex>,
        clusters: &mut HierClusters,
    ) -> LayoutResult<()> {
        self.assert(
            layers.len() == self.layer_definitions.len(),
            "input layer count does not match the declared layer definitions",
        )?;
        self.layout = Some(layout.clone());
        self.layers = layers;

        // Register the annotation property names up front
        {
            let mut lw = layout.write()?;
            self.terminal_prop = lw.props.prop_name_id(TERMINAL_PROPERTY_NAME);
            self.terminal_id_prop = lw.props.prop_name_id(TERMINAL_ID_PROPERTY_NAME);
            self.device_id_prop = lw.props.prop_name_id(DEVICE_ID_PROPERTY_NAME);
            self.device_class_prop = lw.props.prop_name_id(DEVICE_CLASS_PROPERTY_NAME);
        }

        let nl_ptr = self.unwrap(self.netlist.clone(), "no netlist bound")?;

        // Cell-to-circuit lookup, so re-runs reuse circuits
        let mut circuits_by_cell: HashMap<CellKey, CircuitKey> = HashMap::new();
        {
            let nl = nl_ptr.read()?;
            for (key, c) in nl.circuits() {
                circuits_by_cell.insert(c.cell, key);
            }
        }

        // Reachable cells, device cells from prior extractions, clusters
        let (called_cells, device_cells) = {
            let lr = layout.read()?;
            let called = lr.collect_called_cells(top);
            let device_cells: HashSet<CellKey> = lr
                .cells()
                .filter(|(_, cell)| {
                    cell.prop_id
                        .map_or(false, |pid| lr.props.value(pid, self.device_class_prop).is_some())
                })
                .map(|(k, _)| k)
                .collect();
            let conn = delegate.get_connectivity(&lr, &self.layers);
            clusters.build(&lr, top, &self.layers, &conn, &device_cells);
            (called, device_cells)
        };

        // Known device cells re-enter the registry, so equal devices fold
        // onto them instead of spawning fresh cells
        if self.mode == DeviceExtractorMode::DeviceCells {
            self.seed_registry(layout, &nl_ptr, &device_cells, clusters)?;
        }

        // Deterministic cell order: by name
        let mut cells: Vec<CellKey> = called_cells.iter().copied().collect();
        {
            let lr = layout.read()?;
            cells.sort_by(|a, b| lr.cell_name(*a).cmp(lr.cell_name(*b)));
        }

        for ci in cells {
            if device_cells.contains(&ci) {
                continue;
            }
            self.cell_index = Some(ci);

            let ckey = match circuits_by_cell.get(&ci) {
                Some(k) => *k,
                None => {
                    let name = layout.read()?.cell_name(ci).to_string();
                    let k = nl_ptr.write()?.add_circuit(Circuit::new(name, ci));
                    circuits_by_cell.insert(ci, k);
                    k
                }
            };
            self.circuit = Some(ckey);

            let cc = clusters.clusters_per_cell(ci);
            for (cid, cluster) in cc.iter() {
                // Only root clusters: others have upward connections and
                // are no whole devices at this level
                if !cluster.is_root() {
                    continue;
                }

                let mut layer_geometry = Vec::with_capacity(self.layers.len());
                for layer in &self.layers {
                    let mut region = Region::new();
                    for (poly, trans) in clusters.cluster_shapes(ci, cid, *layer) {
                        region.insert(poly.transform(&trans));
                    }
                    layer_geometry.push(region);
                }

                delegate.extract_devices(self, &layer_geometry)?;

                if self.mode == DeviceExtractorMode::DeviceCells {
                    self.fold_devices(layout, &nl_ptr, clusters)?;
                }
            }
        }

        // Record subcircuit references off the instance structure
        {
            let lr = layout.read()?;
            let mut nl = nl_ptr.write()?;
            for (&ci, &ckey) in &circuits_by_cell {
                if !called_cells.contains(&ci) {
                    continue;
                }
                let mut subs = Vec::new();
                for inst in &lr.cell(ci).insts {
                    if let Some(child_key) = circuits_by_cell.get(&inst.cell) {
                        for t in inst.member_transforms() {
                            subs.push(SubCircuitRef {
                                circuit: *child_key,
                                trans: t,
                            });
                        }
                    }
                }
                nl.circuit_mut(ckey).subcircuits = subs;
            }
        }

        debug!(
            "extraction '{}' done: {} device cells, {} errors",
            self.name,
            self.registry.len(),
            self.errors.len()
        );
        self.cell_index = None;
        self.circuit = None;
        Ok(())
    }

    /// Fold the devices created since the last fold into device cells and
    /// instantiate them in the current cell
    fn fold_devices(
        &mut self,
        layout: &Ptr<Layout>,
        nl_ptr: &Ptr<Netlist>,
        clusters: &mut HierClusters,
    ) -> LayoutResult<()> {
        let pending = std::mem::take(&mut self.pending_devices);
        let ckey = self.unwrap(self.circuit, "no current circuit")?;
        let ci = self.unwrap(self.cell_index, "no current cell")?;

        for device_id in pending {
            let geometry = self.device_geometry.remove(&device_id).unwrap_or_default();

            let (position, params, class_id) = {
                let nl = nl_ptr.read()?;
                let d = nl.circuit(ckey).device(device_id);
                let d = match d {
                    Some(d) => d,
                    None => return self.fail("pending device vanished from its circuit"),
                };
                (d.position, d.params.clone(), d.class)
            };

            // Normalize terminal geometry: device position to the origin
            let mut norm: BTreeMap<(TerminalId, LayerIndex), BTreeSet<PolygonRef>> =
                BTreeMap::new();
            {
                let mut lw = layout.write()?;
                for ((t, l), polys) in &geometry {
                    let set = norm.entry((*t, *l)).or_default();
                    for poly in polys {
                        let mut p = poly.clone();
                        p.shift(&Point::new(-position.x, -position.y));
                        set.insert(PolygonRef::new(&p, &mut lw.repo));
                    }
                }
            }

            let key = DeviceCellKey {
                geometry: norm,
                params,
            };
            let (dcell, abs_id) = match self.registry.get(&key) {
                Some(hit) => hit,
                None => {
                    let created =
                        self.new_device_cell(layout, nl_ptr, clusters, class_id, &key)?;
                    self.registry.insert(key.clone(), created.0, created.1);
                    created
                }
            };

            // Attach the abstract and instantiate, tagged with the device id
            if let Some(d) = nl_ptr.write()?.circuit_mut(ckey).device_mut(device_id) {
                d.abstract_ref = Some(abs_id);
            }
            let mut lw = layout.write()?;
            let mut ps = PropertySet::new();
            ps.insert(self.device_id_prop, PropValue::Int(device_id.0 as i64));
            let pid = lw.props.properties_id(ps);
            let mut inst = CellInstArray::new(dcell, Transform::translate(position.x, position.y));
            inst.prop_id = Some(pid);
            let cell = lw.cell_mut(ci);
            if !cell.insts.iter().any(|i| *i == inst) {
                cell.insert(inst);
            }
        }
        Ok(())
    }

    /// Create a fresh device cell for `key`: terminal shapes tagged
    /// `TERMINAL_ID`, the cell tagged `DEVICE_CLASS` and its parameter
    /// record, terminal clusters seeded, and the device abstract recorded.
    fn new_device_cell(
        &mut self,
        layout: &Ptr<Layout>,
        nl_ptr: &Ptr<Netlist>,
        clusters: &mut HierClusters,
        class_id: DeviceClassId,
        key: &DeviceCellKey,
    ) -> LayoutResult<(CellKey, DeviceAbstractId)> {
        let (class_name, param_names) = {
            let nl = nl_ptr.read()?;
            let class = nl.device_class(class_id);
            (
                class.name.clone(),
                class
                    .parameters()
                    .iter()
                    .map(|p| p.name.clone())
                    .collect::<Vec<_>>(),
            )
        };

        let mut lw = layout.write()?;
        let dcell = lw.add_cell(&format!("{}{}", DEVICE_CELL_PREFIX, class_name));
        debug!("new device cell '{}'", lw.cell_name(dcell));

        // Cell properties: class marker plus the parameter record
        let mut ps = PropertySet::new();
        ps.insert(self.device_class_prop, PropValue::Str(class_name));
        for (param, value) in &key.params {
            let pname = match param_names.get(*param) {
                Some(n) => n.clone(),
                None => return self.fail("parameter id outside the device class schema"),
            };
            let name_id = lw
                .props
                .prop_name_id(format!("{}{}", PARAM_PROPERTY_PREFIX, pname));
            ps.insert(name_id, PropValue::Decimal(*value));
        }
        let cell_pid = lw.props.properties_id(ps);
        lw.cell_mut(dcell).prop_id = Some(cell_pid);

        // Terminal shapes, each tagged with its terminal id
        for ((t, l), refs) in &key.geometry {
            let mut ps = PropertySet::new();
            ps.insert(self.terminal_id_prop, PropValue::Int(*t as i64));
            let pid = lw.props.properties_id(ps);
            for pr in refs {
                lw.cell_mut(dcell).shapes_mut(*l).insert_ref_with_props(*pr, pid);
            }
        }

        // Seed the terminal clusters, in terminal order
        let mut terminal_groups: BTreeMap<TerminalId, Vec<(LayerIndex, Polygon)>> =
            BTreeMap::new();
        for ((t, l), refs) in &key.geometry {
            for pr in refs {
                terminal_groups
                    .entry(*t)
                    .or_default()
                    .push((*l, pr.polygon(&lw.repo)));
            }
        }
        drop(lw);

        let terminals: Vec<TerminalId> = terminal_groups.keys().copied().collect();
        let groups: Vec<Vec<(LayerIndex, Polygon)>> = terminal_groups.into_values().collect();
        let cluster_ids = clusters.seed_cell_clusters(dcell, groups);
        let terminal_clusters: BTreeMap<TerminalId, ClusterId> =
            terminals.into_iter().zip(cluster_ids).collect();

        let abs_id = nl_ptr.write()?.add_device_abstract(DeviceAbstract {
            class: class_id,
            cell: dcell,
            terminal_clusters,
        });
        Ok((dcell, abs_id))
    }

    /// Re-seed the registry from device cells of prior extractions, so an
    /// extraction over an already-annotated layout folds equal devices onto
    /// the existing cells
    fn seed_registry(
        &mut self,
        layout: &Ptr<Layout>,
        nl_ptr: &Ptr<Netlist>,
        device_cells: &HashSet<CellKey>,
        clusters: &mut HierClusters,
    ) -> LayoutResult<()> {
        let class_id = match self.device_class {
            Some(c) => c,
            None => return Ok(()),
        };
        let (class_name, param_names) = {
            let nl = nl_ptr.read()?;
            let class = nl.device_class(class_id);
            (
                class.name.clone(),
                class
                    .parameters()
                    .iter()
                    .map(|p| p.name.clone())
                    .collect::<Vec<_>>(),
            )
        };

        let lr = layout.read()?;
        let mut sorted: Vec<CellKey> = device_cells.iter().copied().collect();
        sorted.sort_by(|a, b| lr.cell_name(*a).cmp(lr.cell_name(*b)));

        for dc in sorted {
            let cell = lr.cell(dc);
            let pid = match cell.prop_id {
                Some(p) => p,
                None => continue,
            };
            match lr.props.value(pid, self.device_class_prop) {
                Some(PropValue::Str(n)) if *n == class_name => (),
                _ => continue,
            }

            // Parameters from the cell's P$<name> record
            let mut params: BTreeMap<ParamId, Decimal> = BTreeMap::new();
            for (i, pname) in param_names.iter().enumerate() {
                let name_id = lr
                    .props
                    .find_prop_name_id(&format!("{}{}", PARAM_PROPERTY_PREFIX, pname));
                if let Some(name_id) = name_id {
                    if let Some(PropValue::Decimal(v)) = lr.props.value(pid, name_id) {
                        params.insert(i, *v);
                    }
                }
            }

            // Geometry from the TERMINAL_ID-tagged shapes
            let mut geometry: BTreeMap<(TerminalId, LayerIndex), BTreeSet<PolygonRef>> =
                BTreeMap::new();
            for (layer, shapes) in &cell.shapes {
                for record in shapes.iter() {
                    let t = match record
                        .props
                        .and_then(|p| lr.props.value(p, self.terminal_id_prop))
                    {
                        Some(PropValue::Int(t)) => *t as TerminalId,
                        _ => continue,
                    };
                    if let ShapeData::Ref(pr) = &record.data {
                        geometry.entry((t, *layer)).or_default().insert(*pr);
                    }
                }
            }
            if geometry.is_empty() {
                continue;
            }

            // Fresh terminal clusters and abstract for this run
            let mut terminal_groups: BTreeMap<TerminalId, Vec<(LayerIndex, Polygon)>> =
                BTreeMap::new();
            for ((t, l), refs) in &geometry {
                for pr in refs {
                    terminal_groups
                        .entry(*t)
                        .or_default()
                        .push((*l, pr.polygon(&lr.repo)));
                }
            }
            let terminals: Vec<TerminalId> = terminal_groups.keys().copied().collect();
            let groups: Vec<Vec<(LayerIndex, Polygon)>> = terminal_groups.into_values().collect();
            let cluster_ids = clusters.seed_cell_clusters(dc, groups);
            let terminal_clusters: BTreeMap<TerminalId, ClusterId> =
                terminals.into_iter().zip(cluster_ids).collect();
            let abs_id = nl_ptr.write()?.add_device_abstract(DeviceAbstract {
                class: class_id,
                cell: dc,
                terminal_clusters,
            });

            self.registry
                .insert(DeviceCellKey { geometry, params }, dc, abs_id);
        }
        Ok(())
    }
}

impl ErrorHelper for NetlistDeviceExtractor {
    type Error = LayoutError;
    fn err(&self, msg: impl Into<String>) -> LayoutError {
        LayoutError::msg(format!("NetlistDeviceExtractor '{}': {}", self.name, msg.into()))
    }
}
