//!
//! # db21 crate-level tests
//!
//! Scenario tests for the hierarchy builder and the device extractor,
//! plus the cross-pass and re-extraction laws.
//!

use super::*;
use rust_decimal::Decimal;
use std::collections::HashMap;

fn rect(x0: Int, y0: Int, x1: Int, y1: Int) -> Shape {
    Shape::Rect(Rect::new(Point::new(x0, y0), Point::new(x1, y1)))
}

/// Source: top cell `T` with one instance of `C`; `C` holds a box
/// `(0,0)-(100,100)` on layer 1
fn simple_source() -> (Ptr<Layout>, CellKey, CellKey) {
    let mut layout = Layout::new("src", Units::Nano);
    let child = layout.add_cell("C");
    layout
        .cell_mut(child)
        .shapes_mut(1)
        .insert(rect(0, 0, 100, 100));
    let top = layout.add_cell("T");
    layout
        .cell_mut(top)
        .insert(CellInstArray::new(child, Transform::identity()));
    (Ptr::new(layout), top, child)
}

// ---------------------------------------------------------------------
//  Hierarchy builder scenarios

#[test]
fn world_region_mirrors_hierarchy() -> LayoutResult<()> {
    let (src, top, _) = simple_source();
    let target = Ptr::new(Layout::new("tgt", Units::Nano));
    let mut builder = HierarchyBuilder::new(target.clone(), 1, None);
    let iter = RecursiveShapeIterator::new(src.clone(), top, 1);
    iter.scan(&mut builder)?;

    let t = target.read()?;
    let s = src.read()?;
    // Structurally isomorphic to the reachable sub-hierarchy
    assert_eq!(t.num_cells(), s.collect_called_cells(top).len());
    let t_top = builder.initial_cell().expect("top cell after traversal");
    assert_eq!(t.cell_name(t_top), "T");
    assert_eq!(t.cell(t_top).insts.len(), 1);

    let t_child = t.cell(t_top).insts[0].cell;
    assert_eq!(t.cell_name(t_child), "C");
    let shapes = t.cell(t_child).shapes(1).expect("shapes on target layer");
    assert_eq!(shapes.len(), 1);
    assert_eq!(
        shapes.iter().next().unwrap().bbox(&t.repo),
        BoundBox::from_coords(0, 0, 100, 100)
    );
    Ok(())
}

#[test]
fn single_box_region_makes_clip_variant() -> LayoutResult<()> {
    let (src, top, _) = simple_source();
    let target = Ptr::new(Layout::new("tgt", Units::Nano));
    let pipe = Box::new(ClippingShapeReceiver::new(None));
    let mut builder = HierarchyBuilder::new(target.clone(), 1, Some(pipe));
    let iter = RecursiveShapeIterator::new(src, top, 1)
        .with_region(BoundBox::from_coords(0, 0, 50, 200));
    iter.scan(&mut builder)?;

    let t = target.read()?;
    assert_eq!(t.num_cells(), 2);
    let t_top = builder.initial_cell().unwrap();
    let t_child = t.cell(t_top).insts[0].cell;
    assert!(t.cell_name(t_child).contains("$CLIP_VAR"));

    let shapes = t.cell(t_child).shapes(1).unwrap();
    assert_eq!(shapes.len(), 1);
    assert_eq!(
        shapes.iter().next().unwrap().bbox(&t.repo),
        BoundBox::from_coords(0, 0, 50, 100)
    );
    Ok(())
}

#[test]
fn complex_region_emits_per_rectangle() -> LayoutResult<()> {
    let (src, top, _) = simple_source();
    let target = Ptr::new(Layout::new("tgt", Units::Nano));
    let pipe = Box::new(ClippingShapeReceiver::new(None));
    let mut builder = HierarchyBuilder::new(target.clone(), 1, Some(pipe));
    let iter = RecursiveShapeIterator::new(src, top, 1)
        .with_region(BoundBox::from_coords(0, 0, 100, 100))
        .with_complex_region(ComplexRegion::new(vec![
            BoundBox::from_coords(0, 0, 30, 30),
            BoundBox::from_coords(70, 70, 100, 100),
        ]));
    iter.scan(&mut builder)?;

    let t = target.read()?;
    let t_top = builder.initial_cell().unwrap();
    let t_child = t.cell(t_top).insts[0].cell;
    assert!(t.cell_name(t_child).contains("$CLIP_VAR"));

    let shapes = t.cell(t_child).shapes(1).unwrap();
    let boxes: Vec<_> = shapes.iter().map(|r| r.bbox(&t.repo)).collect();
    assert_eq!(boxes.len(), 2);
    assert!(boxes.contains(&BoundBox::from_coords(0, 0, 30, 30)));
    assert!(boxes.contains(&BoundBox::from_coords(70, 70, 100, 100)));
    Ok(())
}

#[test]
fn distinct_clip_variants_get_distinct_cells() -> LayoutResult<()> {
    let mut layout = Layout::new("src", Units::Nano);
    let child = layout.add_cell("C");
    layout
        .cell_mut(child)
        .shapes_mut(1)
        .insert(rect(0, 0, 100, 100));
    let top = layout.add_cell("T");
    {
        let cell = layout.cell_mut(top);
        cell.insert(CellInstArray::new(child, Transform::identity()));
        cell.insert(CellInstArray::new(child, Transform::translate(100, 0)));
        // A second placement with the first one's clip
        cell.insert(CellInstArray::new(child, Transform::identity()));
    }
    let src = Ptr::new(layout);

    let target = Ptr::new(Layout::new("tgt", Units::Nano));
    let pipe = Box::new(ClippingShapeReceiver::new(None));
    let mut builder = HierarchyBuilder::new(target.clone(), 1, Some(pipe));
    RecursiveShapeIterator::new(src, top, 1)
        .with_region(BoundBox::from_coords(0, 0, 150, 90))
        .scan(&mut builder)?;

    let t = target.read()?;
    // Two distinct variants of C, plus the top
    assert_eq!(t.num_cells(), 3);
    let t_top = builder.initial_cell().unwrap();
    let insts = &t.cell(t_top).insts;
    assert_eq!(insts.len(), 3);
    // Equal clips share one target cell; differing clips do not
    assert_eq!(insts[0].cell, insts[2].cell);
    assert_ne!(insts[0].cell, insts[1].cell);
    Ok(())
}

#[test]
fn second_pass_adds_no_structure() -> LayoutResult<()> {
    let (src, top, _) = simple_source();
    let target = Ptr::new(Layout::new("tgt", Units::Nano));
    let pipe = Box::new(ClippingShapeReceiver::new(None));
    let mut builder = HierarchyBuilder::new(target.clone(), 1, Some(pipe));
    let iter = RecursiveShapeIterator::new(src, top, 1)
        .with_region(BoundBox::from_coords(0, 0, 50, 200));
    iter.scan(&mut builder)?;

    let (cells_after_first, child_key) = {
        let t = target.read()?;
        let t_top = builder.initial_cell().unwrap();
        (t.num_cells(), t.cell(t_top).insts[0].cell)
    };

    // Equivalent pass onto another target layer: same shapes, no new cells
    // or instances
    builder.set_shape_receiver(Some(Box::new(ClippingShapeReceiver::new(None))));
    builder.set_target_layer(2);
    iter.scan(&mut builder)?;

    let t = target.read()?;
    assert_eq!(t.num_cells(), cells_after_first);
    let t_top = builder.initial_cell().unwrap();
    assert_eq!(t.cell(t_top).insts.len(), 1);

    let child = t.cell(child_key);
    let first: Vec<_> = child.shapes(1).unwrap().iter().cloned().collect();
    let second: Vec<_> = child.shapes(2).unwrap().iter().cloned().collect();
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn incompatible_iterator_is_rejected() -> LayoutResult<()> {
    let (src, top, _) = simple_source();
    let target = Ptr::new(Layout::new("tgt", Units::Nano));
    let mut builder = HierarchyBuilder::new(target, 1, None);
    RecursiveShapeIterator::new(src.clone(), top, 1).scan(&mut builder)?;

    // World vs bounded region changes the hierarchical appearance
    let bounded = RecursiveShapeIterator::new(src, top, 1)
        .with_region(BoundBox::from_coords(0, 0, 10, 10));
    assert!(bounded.scan(&mut builder).is_err());
    Ok(())
}

#[test]
fn reset_starts_a_fresh_initial_pass() -> LayoutResult<()> {
    let (src, top, _) = simple_source();
    let target = Ptr::new(Layout::new("tgt", Units::Nano));
    let mut builder = HierarchyBuilder::new(target.clone(), 1, None);
    let iter = RecursiveShapeIterator::new(src, top, 1);
    iter.scan(&mut builder)?;
    let before = target.read()?.num_cells();

    builder.reset();
    iter.scan(&mut builder)?;
    // A fresh initial pass maps the source anew, into fresh cells
    assert_eq!(target.read()?.num_cells(), 2 * before);
    Ok(())
}

#[test]
fn clipped_shapes_stay_inside_the_region() -> LayoutResult<()> {
    let mut layout = Layout::new("src", Units::Nano);
    let child = layout.add_cell("C");
    {
        let shapes = layout.cell_mut(child).shapes_mut(1);
        shapes.insert(rect(0, 0, 100, 100));
        shapes.insert(rect(150, 0, 250, 100));
        shapes.insert(rect(300, 0, 400, 100));
    }
    let top = layout.add_cell("T");
    layout
        .cell_mut(top)
        .insert(CellInstArray::new(child, Transform::identity()));
    let src = Ptr::new(layout);

    let region = BoundBox::from_coords(50, 0, 350, 100);
    let target = Ptr::new(Layout::new("tgt", Units::Nano));
    let pipe = Box::new(ClippingShapeReceiver::new(None));
    let mut builder = HierarchyBuilder::new(target.clone(), 1, Some(pipe));
    RecursiveShapeIterator::new(src, top, 1)
        .with_region(region.clone())
        .scan(&mut builder)?;

    let t = target.read()?;
    let t_top = builder.initial_cell().unwrap();
    let t_child = t.cell(t_top).insts[0].cell;
    let shapes = t.cell(t_child).shapes(1).unwrap();
    assert_eq!(shapes.len(), 3);
    for record in shapes.iter() {
        assert!(record.bbox(&t.repo).inside(&region));
    }
    Ok(())
}

#[test]
fn instance_arrays_survive_the_mirror() -> LayoutResult<()> {
    let mut layout = Layout::new("src", Units::Nano);
    let child = layout.add_cell("C");
    layout
        .cell_mut(child)
        .shapes_mut(1)
        .insert(rect(0, 0, 10, 10));
    let top = layout.add_cell("T");
    layout.cell_mut(top).insert(CellInstArray::new_array(
        child,
        Transform::identity(),
        3,
        2,
        Point::new(200, 0),
        Point::new(0, 150),
    ));
    let src = Ptr::new(layout);

    let target = Ptr::new(Layout::new("tgt", Units::Nano));
    let mut builder = HierarchyBuilder::new(target.clone(), 1, None);
    RecursiveShapeIterator::new(src, top, 1).scan(&mut builder)?;

    let t = target.read()?;
    assert_eq!(t.num_cells(), 2);
    let t_top = builder.initial_cell().unwrap();
    assert_eq!(t.cell(t_top).insts.len(), 1);
    let inst = &t.cell(t_top).insts[0];
    assert_eq!((inst.na, inst.nb), (3, 2));
    assert_eq!(inst.a, Point::new(200, 0));
    assert_eq!(inst.b, Point::new(0, 150));
    Ok(())
}

// ---------------------------------------------------------------------
//  Device extraction scenarios

/// A minimal MOS recognizer: one gate polygon flanked by two
/// source/drain polygons. Gate length is the gate's x-extent.
#[derive(Default)]
struct MosExtractor {
    gate_index: usize,
    sd_index: usize,
}
impl DeviceExtractorDelegate for MosExtractor {
    fn setup(&mut self, ex: &mut NetlistDeviceExtractor) -> LayoutResult<()> {
        self.gate_index = ex.define_layer("G", "gate electrode");
        self.sd_index = ex.define_layer("SD", "source/drain diffusion");
        let mut class = DeviceClass::new("MOS");
        class.add_parameter("L", "gate length", Decimal::ZERO);
        class.add_parameter("W", "gate width", Decimal::ZERO);
        class.add_terminal("S", "source");
        class.add_terminal("G", "gate");
        class.add_terminal("D", "drain");
        ex.register_device_class(class)?;
        Ok(())
    }
    fn get_connectivity(&self, _layout: &Layout, layers: &[LayerIndex]) -> Connectivity {
        let mut conn = Connectivity::new();
        conn.connect(layers[self.gate_index]);
        conn.connect(layers[self.sd_index]);
        conn.connect_layers(layers[self.gate_index], layers[self.sd_index]);
        conn
    }
    fn extract_devices(
        &mut self,
        ex: &mut NetlistDeviceExtractor,
        layer_geometry: &[Region],
    ) -> LayoutResult<()> {
        let gates = &layer_geometry[self.gate_index];
        let sds = &layer_geometry[self.sd_index];
        if gates.is_empty() {
            return Ok(());
        }
        if sds.len() < 2 {
            ex.error_with_region("transistor without source/drain", gates.clone());
            return Ok(());
        }
        let gate = gates.polygons()[0].clone();
        let gb = gate.bbox();
        let (l, w) = gb.size();

        let device = ex.create_device()?;
        ex.set_device_position(device, gb.p0)?;
        ex.set_device_parameter(device, 0, Decimal::from(l as i64))?;
        ex.set_device_parameter(device, 1, Decimal::from(w as i64))?;

        let mut sd_polys: Vec<Polygon> = sds.iter().cloned().collect();
        sd_polys.sort_by_key(|p| p.bbox().p0);
        ex.define_terminal(device, 0, self.sd_index, &sd_polys[0])?;
        ex.define_terminal(device, 1, self.gate_index, &gate)?;
        ex.define_terminal(device, 2, self.sd_index, &sd_polys[sd_polys.len() - 1])?;
        Ok(())
    }
}

/// Two lateral transistors on layers 0 (gate) and 1 (diffusion); the
/// second sits 500 units right of the first and has the given gate width
fn mos_source(second_gate_width: Int) -> (Ptr<Layout>, CellKey) {
    let mut layout = Layout::new("chip", Units::Nano);
    let top = layout.add_cell("TOP");
    {
        let cell = layout.cell_mut(top);
        cell.shapes_mut(1).insert(rect(0, 0, 40, 100));
        cell.shapes_mut(0).insert(rect(40, 0, 60, 100));
        cell.shapes_mut(1).insert(rect(60, 0, 100, 100));

        let x = 500;
        let g = second_gate_width;
        cell.shapes_mut(1).insert(rect(x, 0, x + 40, 100));
        cell.shapes_mut(0).insert(rect(x + 40, 0, x + 40 + g, 100));
        cell.shapes_mut(1).insert(rect(x + 40 + g, 0, x + 80 + g, 100));
    }
    (Ptr::new(layout), top)
}

#[test]
fn identical_devices_share_a_device_cell() -> LayoutResult<()> {
    let (src, top) = mos_source(20);
    let netlist = Ptr::new(Netlist::new());
    let mut clusters = HierClusters::new();
    let mut ex = NetlistDeviceExtractor::new("MOS", DeviceExtractorMode::DeviceCells);
    let mut kernel = MosExtractor::default();
    ex.extract(&mut kernel, &src, top, &[0, 1], &netlist, &mut clusters)?;
    assert!(ex.errors().is_empty());

    let l = src.read()?;
    let device_cells: Vec<CellKey> = l
        .cells()
        .filter(|(_, c)| c.name.starts_with("D$MOS"))
        .map(|(k, _)| k)
        .collect();
    assert_eq!(device_cells.len(), 1);

    // Two instances in TOP, distinct device ids, distinct positions
    let device_id_prop = l.props.find_prop_name_id("DEVICE_ID").unwrap();
    let top_cell = l.cell(top);
    assert_eq!(top_cell.insts.len(), 2);
    let mut ids = Vec::new();
    let mut xs = Vec::new();
    for inst in &top_cell.insts {
        assert_eq!(inst.cell, device_cells[0]);
        let pid = inst.prop_id.expect("device instance carries properties");
        match l.props.value(pid, device_id_prop) {
            Some(PropValue::Int(i)) => ids.push(*i),
            other => panic!("missing DEVICE_ID: {:?}", other),
        }
        xs.push(inst.trans.b[0]);
    }
    assert_ne!(ids[0], ids[1]);
    assert!(xs.contains(&40.0) && xs.contains(&540.0));

    // Every shape in the device cell carries exactly one TERMINAL_ID;
    // the cell itself carries the DEVICE_CLASS marker
    let terminal_id_prop = l.props.find_prop_name_id("TERMINAL_ID").unwrap();
    let device_class_prop = l.props.find_prop_name_id("DEVICE_CLASS").unwrap();
    let dc = l.cell(device_cells[0]);
    assert_eq!(
        l.props.value(dc.prop_id.unwrap(), device_class_prop),
        Some(&PropValue::Str("MOS".to_string()))
    );
    let mut terminal_shape_count = 0;
    for shapes in dc.shapes.values() {
        for record in shapes.iter() {
            let pid = record.props.expect("terminal shapes are tagged");
            assert!(matches!(
                l.props.value(pid, terminal_id_prop),
                Some(PropValue::Int(_))
            ));
            terminal_shape_count += 1;
        }
    }
    assert_eq!(terminal_shape_count, 3);

    // Netlist: one circuit, two devices of one class, one abstract
    let nl = netlist.read()?;
    assert_eq!(nl.num_circuits(), 1);
    assert_eq!(nl.num_devices(), 2);
    assert_eq!(nl.device_classes().len(), 1);
    assert_eq!(nl.device_abstracts().len(), 1);
    let (_, circuit) = nl.circuits().next().unwrap();
    assert_eq!(circuit.name, "TOP");
    for d in &circuit.devices {
        assert_eq!(d.abstract_ref, Some(DeviceAbstractId(0)));
        assert_eq!(d.params.get(&0), Some(&Decimal::from(20)));
        assert_eq!(d.params.get(&1), Some(&Decimal::from(100)));
    }
    Ok(())
}

#[test]
fn parameter_differences_split_device_cells() -> LayoutResult<()> {
    let (src, top) = mos_source(30);
    let netlist = Ptr::new(Netlist::new());
    let mut clusters = HierClusters::new();
    let mut ex = NetlistDeviceExtractor::new("MOS", DeviceExtractorMode::DeviceCells);
    let mut kernel = MosExtractor::default();
    ex.extract(&mut kernel, &src, top, &[0, 1], &netlist, &mut clusters)?;
    assert!(ex.errors().is_empty());

    let l = src.read()?;
    let device_cells: Vec<_> = l
        .cells()
        .filter(|(_, c)| c.name.starts_with("D$MOS"))
        .collect();
    assert_eq!(device_cells.len(), 2);
    assert_eq!(netlist.read()?.device_abstracts().len(), 2);
    Ok(())
}

#[test]
fn re_extraction_is_idempotent() -> LayoutResult<()> {
    let (src, top) = mos_source(20);

    let netlist1 = Ptr::new(Netlist::new());
    let mut clusters1 = HierClusters::new();
    let mut ex1 = NetlistDeviceExtractor::new("MOS", DeviceExtractorMode::DeviceCells);
    let mut kernel = MosExtractor::default();
    ex1.extract(&mut kernel, &src, top, &[0, 1], &netlist1, &mut clusters1)?;

    let cells_before = src.read()?.num_cells();
    let insts_before = src.read()?.cell(top).insts.len();

    // Second run over the annotated layout: device cells are skipped, the
    // registry re-seeds, and nothing new appears
    let netlist2 = Ptr::new(Netlist::new());
    let mut clusters2 = HierClusters::new();
    let mut ex2 = NetlistDeviceExtractor::new("MOS", DeviceExtractorMode::DeviceCells);
    ex2.extract(&mut kernel, &src, top, &[0, 1], &netlist2, &mut clusters2)?;

    assert!(ex2.errors().is_empty());
    assert_eq!(src.read()?.num_cells(), cells_before);
    assert_eq!(src.read()?.cell(top).insts.len(), insts_before);
    assert_eq!(&*netlist2.read()?, &*netlist1.read()?);
    // No circuit was created for the device cell itself
    assert_eq!(netlist2.read()?.num_circuits(), 1);
    Ok(())
}

#[test]
fn inline_mode_tags_terminals_in_place() -> LayoutResult<()> {
    let (src, top) = mos_source(20);
    let netlist = Ptr::new(Netlist::new());
    let mut clusters = HierClusters::new();
    let mut ex = NetlistDeviceExtractor::new("MOS", DeviceExtractorMode::Inline);
    let mut kernel = MosExtractor::default();
    ex.extract(&mut kernel, &src, top, &[0, 1], &netlist, &mut clusters)?;
    assert!(ex.errors().is_empty());

    let l = src.read()?;
    // No device cells in-line
    assert_eq!(l.num_cells(), 1);
    assert!(l.cell(top).insts.is_empty());

    // Terminal markers joined the input layers: 1 gate + 2 diffusion
    // terminals per transistor
    let terminal_prop = l.props.find_prop_name_id("TERMINAL").unwrap();
    let count_tagged = |layer: LayerIndex| {
        l.cell(top)
            .shapes(layer)
            .map(|shapes| {
                shapes
                    .iter()
                    .filter(|r| {
                        r.props
                            .and_then(|p| l.props.value(p, terminal_prop))
                            .is_some()
                    })
                    .count()
            })
            .unwrap_or(0)
    };
    assert_eq!(count_tagged(0), 2);
    assert_eq!(count_tagged(1), 4);
    assert_eq!(netlist.read()?.num_devices(), 2);
    Ok(())
}

#[test]
fn deep_mode_resolves_store_layers() -> LayoutResult<()> {
    let (src, top) = mos_source(20);
    let dss = DeepShapeStore::new(src.clone(), top);
    let mut layer_map = HashMap::new();
    layer_map.insert("G".to_string(), dss.region(0));
    layer_map.insert("SD".to_string(), dss.region(1));

    let netlist = Ptr::new(Netlist::new());
    let mut clusters = HierClusters::new();
    let mut ex = NetlistDeviceExtractor::new("MOS", DeviceExtractorMode::DeviceCells);
    let mut kernel = MosExtractor::default();
    ex.extract_deep(&mut kernel, &dss, &layer_map, &netlist, &mut clusters)?;

    assert!(ex.errors().is_empty());
    assert_eq!(netlist.read()?.num_devices(), 2);
    assert_eq!(netlist.read()?.device_abstracts().len(), 1);
    Ok(())
}

#[test]
fn deep_mode_rejects_bad_inputs() {
    let (src, top) = mos_source(20);
    let dss = DeepShapeStore::new(src.clone(), top);
    let netlist = Ptr::new(Netlist::new());
    let mut kernel = MosExtractor::default();

    // Missing layer
    let mut layer_map = HashMap::new();
    layer_map.insert("G".to_string(), dss.region(0));
    let mut clusters = HierClusters::new();
    let mut ex = NetlistDeviceExtractor::new("MOS", DeviceExtractorMode::DeviceCells);
    assert!(ex
        .extract_deep(&mut kernel, &dss, &layer_map, &netlist, &mut clusters)
        .is_err());

    // Flat region where a deep one is required
    let mut layer_map = HashMap::new();
    layer_map.insert("G".to_string(), dss.region(0));
    layer_map.insert("SD".to_string(), Region::new());
    let mut clusters = HierClusters::new();
    let mut ex = NetlistDeviceExtractor::new("MOS", DeviceExtractorMode::DeviceCells);
    assert!(ex
        .extract_deep(&mut kernel, &dss, &layer_map, &netlist, &mut clusters)
        .is_err());

    // Region from a different store
    let (other_src, other_top) = mos_source(20);
    let other_dss = DeepShapeStore::new(other_src, other_top);
    let mut layer_map = HashMap::new();
    layer_map.insert("G".to_string(), dss.region(0));
    layer_map.insert("SD".to_string(), other_dss.region(1));
    let mut clusters = HierClusters::new();
    let mut ex = NetlistDeviceExtractor::new("MOS", DeviceExtractorMode::DeviceCells);
    assert!(ex
        .extract_deep(&mut kernel, &dss, &layer_map, &netlist, &mut clusters)
        .is_err());
}

#[test]
fn extractor_records_recoverable_errors() -> LayoutResult<()> {
    let mut layout = Layout::new("chip", Units::Nano);
    let top = layout.add_cell("TOP");
    // A gate with no diffusion around it
    layout.cell_mut(top).shapes_mut(0).insert(rect(0, 0, 20, 100));
    let src = Ptr::new(layout);

    let netlist = Ptr::new(Netlist::new());
    let mut clusters = HierClusters::new();
    let mut ex = NetlistDeviceExtractor::new("MOS", DeviceExtractorMode::DeviceCells);
    let mut kernel = MosExtractor::default();
    ex.extract(&mut kernel, &src, top, &[0, 1], &netlist, &mut clusters)?;

    assert_eq!(ex.errors().len(), 1);
    let err = &ex.errors()[0];
    assert_eq!(err.cell_name, "TOP");
    assert!(err.message.contains("source/drain"));
    assert_eq!(err.geometry.as_ref().map(|g| g.len()), Some(1));
    assert_eq!(netlist.read()?.num_devices(), 0);
    Ok(())
}

/// Declares a layer but never registers a device class
struct NoClassKernel;
impl DeviceExtractorDelegate for NoClassKernel {
    fn setup(&mut self, ex: &mut NetlistDeviceExtractor) -> LayoutResult<()> {
        ex.define_layer("L", "the only layer");
        Ok(())
    }
    fn get_connectivity(&self, _layout: &Layout, layers: &[LayerIndex]) -> Connectivity {
        let mut conn = Connectivity::new();
        conn.connect(layers[0]);
        conn
    }
    fn extract_devices(
        &mut self,
        ex: &mut NetlistDeviceExtractor,
        _layer_geometry: &[Region],
    ) -> LayoutResult<()> {
        ex.create_device()?;
        Ok(())
    }
}

#[test]
fn create_device_requires_a_device_class() {
    let mut layout = Layout::new("chip", Units::Nano);
    let top = layout.add_cell("TOP");
    layout.cell_mut(top).shapes_mut(0).insert(rect(0, 0, 10, 10));
    let src = Ptr::new(layout);

    let netlist = Ptr::new(Netlist::new());
    let mut clusters = HierClusters::new();
    let mut ex = NetlistDeviceExtractor::new("X", DeviceExtractorMode::DeviceCells);
    let mut kernel = NoClassKernel;
    assert!(ex
        .extract(&mut kernel, &src, top, &[0], &netlist, &mut clusters)
        .is_err());
}

/// Registers its device class twice
struct DoubleClassKernel;
impl DeviceExtractorDelegate for DoubleClassKernel {
    fn setup(&mut self, ex: &mut NetlistDeviceExtractor) -> LayoutResult<()> {
        ex.define_layer("L", "the only layer");
        ex.register_device_class(DeviceClass::new("A"))?;
        ex.register_device_class(DeviceClass::new("B"))?;
        Ok(())
    }
    fn get_connectivity(&self, _layout: &Layout, _layers: &[LayerIndex]) -> Connectivity {
        Connectivity::new()
    }
    fn extract_devices(
        &mut self,
        _ex: &mut NetlistDeviceExtractor,
        _layer_geometry: &[Region],
    ) -> LayoutResult<()> {
        Ok(())
    }
}

#[test]
fn duplicate_class_registration_is_fatal() {
    let mut layout = Layout::new("chip", Units::Nano);
    let top = layout.add_cell("TOP");
    let src = Ptr::new(layout);

    let netlist = Ptr::new(Netlist::new());
    let mut clusters = HierClusters::new();
    let mut ex = NetlistDeviceExtractor::new("X", DeviceExtractorMode::DeviceCells);
    let mut kernel = DoubleClassKernel;
    assert!(ex
        .extract(&mut kernel, &src, top, &[0], &netlist, &mut clusters)
        .is_err());
}

#[test]
fn layer_count_mismatch_is_fatal() {
    let (src, top) = mos_source(20);
    let netlist = Ptr::new(Netlist::new());
    let mut clusters = HierClusters::new();
    let mut ex = NetlistDeviceExtractor::new("MOS", DeviceExtractorMode::DeviceCells);
    let mut kernel = MosExtractor::default();
    // Two layers declared, one provided
    assert!(ex
        .extract(&mut kernel, &src, top, &[0], &netlist, &mut clusters)
        .is_err());
}
