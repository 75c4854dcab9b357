//!
//! # Connectivity & Hierarchical Clusters
//!
//! Connected-component analysis over shapes of a cell sub-hierarchy, under
//! a layer-pair conductivity relation. Each cell gets its own cluster set;
//! a cluster in a child cell which connects to geometry in some parent is
//! referenced there and loses its *root* status, so devices are only read
//! off whole, root clusters. Geometric interaction is approximated by
//! bounding-box contact.
//!

// Std-Lib
use std::collections::{BTreeSet, HashMap, HashSet};

// Crates.io
use log::debug;

// Local imports
use crate::bbox::{BoundBox, BoundBoxTrait};
use crate::data::{CellKey, Layout};
use crate::geom::{Polygon, Transform};
use crate::LayerIndex;

/// Per-cell cluster id
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClusterId(pub usize);

/// # Connectivity
///
/// A symmetric relation between layers: which pairs conduct into one
/// cluster. Intra-layer connection must be declared explicitly too.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Connectivity {
    pairs: BTreeSet<(LayerIndex, LayerIndex)>,
}
impl Connectivity {
    pub fn new() -> Self {
        Self::default()
    }
    /// Declare shapes on `layer` connected among themselves
    pub fn connect(&mut self, layer: LayerIndex) {
        self.connect_layers(layer, layer);
    }
    /// Declare shapes on `a` and `b` connected to each other
    pub fn connect_layers(&mut self, a: LayerIndex, b: LayerIndex) {
        self.pairs.insert((a.min(b), a.max(b)));
    }
    pub fn connected(&self, a: LayerIndex, b: LayerIndex) -> bool {
        self.pairs.contains(&(a.min(b), a.max(b)))
    }
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Reference from a parent cluster to a cluster of an instantiated child
#[derive(Debug, Clone)]
pub struct ChildClusterRef {
    pub cell: CellKey,
    pub cluster: ClusterId,
    /// Child frame into parent frame
    pub trans: Transform,
}

/// One connected component within a cell
#[derive(Debug, Clone, Default)]
pub struct Cluster {
    /// Shapes of the cell itself, per layer
    pub shapes: Vec<(LayerIndex, Polygon)>,
    /// Connected clusters of child instances
    pub children: Vec<ChildClusterRef>,
    root: bool,
}
impl Cluster {
    /// A root cluster has no upward connection and represents a whole
    /// sub-net within its cell
    pub fn is_root(&self) -> bool {
        self.root
    }
}

/// The cluster set of one cell
#[derive(Debug, Clone, Default)]
pub struct ConnectedClusters {
    clusters: Vec<Cluster>,
}
impl ConnectedClusters {
    pub fn iter(&self) -> impl Iterator<Item = (ClusterId, &Cluster)> {
        self.clusters
            .iter()
            .enumerate()
            .map(|(i, c)| (ClusterId(i), c))
    }
    pub fn get(&self, id: ClusterId) -> Option<&Cluster> {
        self.clusters.get(id.0)
    }
    pub fn len(&self) -> usize {
        self.clusters.len()
    }
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

/// Work item for per-cell clustering
enum Item {
    Local(LayerIndex, Polygon, BoundBox),
    Child(ChildClusterRef, Vec<(LayerIndex, BoundBox)>),
}
impl Item {
    fn layer_boxes(&self) -> Vec<(LayerIndex, BoundBox)> {
        match self {
            Item::Local(layer, _, bb) => vec![(*layer, bb.clone())],
            Item::Child(_, boxes) => boxes.clone(),
        }
    }
}

/// Minimal union-find over item indices
struct UnionFind {
    parent: Vec<usize>,
}
impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }
    fn find(&mut self, i: usize) -> usize {
        if self.parent[i] != i {
            let root = self.find(self.parent[i]);
            self.parent[i] = root;
        }
        self.parent[i]
    }
    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra.max(rb)] = ra.min(rb);
        }
    }
}

/// # Hierarchical Clusters
///
/// Cluster sets for every cell of a built sub-hierarchy, bottom-up.
#[derive(Debug, Clone, Default)]
pub struct HierClusters {
    per_cell: HashMap<CellKey, ConnectedClusters>,
}
impl HierClusters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build clusters for all cells below (and including) `top`, over the
    /// shapes of `layers`, connected per `conn`. Cells in `skip` contribute
    /// neither local shapes nor child references.
    pub fn build(
        &mut self,
        layout: &Layout,
        top: CellKey,
        layers: &[LayerIndex],
        conn: &Connectivity,
        skip: &HashSet<CellKey>,
    ) {
        self.per_cell.clear();

        // Bottom-up: children before parents
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        post_order(layout, top, &mut seen, &mut order);

        for cell in order {
            if skip.contains(&cell) {
                continue;
            }
            self.build_cell(layout, cell, layers, conn, skip);
        }

        // A cluster referenced from any parent has an upward connection
        // and is no root in its own cell
        let mut non_root: HashSet<(CellKey, ClusterId)> = HashSet::new();
        for cc in self.per_cell.values() {
            for cl in &cc.clusters {
                for ch in &cl.children {
                    non_root.insert((ch.cell, ch.cluster));
                }
            }
        }
        for (cell, id) in non_root {
            if let Some(cc) = self.per_cell.get_mut(&cell) {
                cc.clusters[id.0].root = false;
            }
        }
        debug!(
            "built clusters for {} cells on layers {:?}",
            self.per_cell.len(),
            layers
        );
    }

    fn build_cell(
        &mut self,
        layout: &Layout,
        cell: CellKey,
        layers: &[LayerIndex],
        conn: &Connectivity,
        skip: &HashSet<CellKey>,
    ) {
        let celldef = layout.cell(cell);
        let mut items: Vec<Item> = Vec::new();

        for layer in layers {
            if let Some(shapes) = celldef.shapes(*layer) {
                for record in shapes.iter() {
                    if let Some(poly) = record.as_polygon(&layout.repo) {
                        let bb = poly.bbox();
                        items.push(Item::Local(*layer, poly, bb));
                    }
                }
            }
        }
        for inst in &celldef.insts {
            if skip.contains(&inst.cell) {
                continue;
            }
            let child_ids: Vec<ClusterId> = match self.per_cell.get(&inst.cell) {
                Some(cc) => cc.iter().map(|(id, _)| id).collect(),
                None => continue,
            };
            for trans in inst.member_transforms() {
                for id in &child_ids {
                    let boxes: Vec<_> = self
                        .cluster_layer_boxes(inst.cell, *id)
                        .into_iter()
                        .map(|(l, bb)| (l, bb.transform(&trans)))
                        .collect();
                    items.push(Item::Child(
                        ChildClusterRef {
                            cell: inst.cell,
                            cluster: *id,
                            trans,
                        },
                        boxes,
                    ));
                }
            }
        }

        // Union by pairwise interaction: connected layers with touching boxes
        let mut uf = UnionFind::new(items.len());
        for i in 0..items.len() {
            let bi = items[i].layer_boxes();
            for j in i + 1..items.len() {
                let interacts = items[j].layer_boxes().iter().any(|(lj, bj)| {
                    bi.iter()
                        .any(|(li, bbi)| conn.connected(*li, *lj) && bbi.touches(bj))
                });
                if interacts {
                    uf.union(i, j);
                }
            }
        }

        // Collect groups in first-seen order
        let mut group_of: HashMap<usize, usize> = HashMap::new();
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for i in 0..items.len() {
            let root = uf.find(i);
            let g = *group_of.entry(root).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[g].push(i);
        }

        let mut cc = ConnectedClusters::default();
        let mut items: Vec<Option<Item>> = items.into_iter().map(Some).collect();
        for group in groups {
            // A lone child reference stays a root cluster of its own cell;
            // duplicating it here would double-extract its devices
            if group.len() == 1 {
                if let Some(Item::Child(..)) = items[group[0]].as_ref() {
                    continue;
                }
            }
            let mut cluster = Cluster {
                root: true,
                ..Default::default()
            };
            for idx in group {
                match items[idx].take() {
                    Some(Item::Local(layer, poly, _)) => cluster.shapes.push((layer, poly)),
                    Some(Item::Child(chref, _)) => cluster.children.push(chref),
                    None => (),
                }
            }
            cc.clusters.push(cluster);
        }
        self.per_cell.insert(cell, cc);
    }

    /// The cluster set of `cell`; empty if none were built
    pub fn clusters_per_cell(&self, cell: CellKey) -> ConnectedClusters {
        self.per_cell.get(&cell).cloned().unwrap_or_default()
    }

    /// Per-layer bounding boxes of a cluster, including child references,
    /// in the cluster's own cell frame
    fn cluster_layer_boxes(&self, cell: CellKey, id: ClusterId) -> Vec<(LayerIndex, BoundBox)> {
        let mut out = Vec::new();
        if let Some(cc) = self.per_cell.get(&cell) {
            if let Some(cl) = cc.get(id) {
                for (layer, poly) in &cl.shapes {
                    out.push((*layer, poly.bbox()));
                }
                for ch in &cl.children {
                    for (layer, bb) in self.cluster_layer_boxes(ch.cell, ch.cluster) {
                        out.push((layer, bb.transform(&ch.trans)));
                    }
                }
            }
        }
        out
    }

    /// Flatten a cluster's shapes on `layer`, over all hierarchy levels,
    /// each with its cumulative transform into the cluster's cell frame
    pub fn cluster_shapes(
        &self,
        cell: CellKey,
        cluster: ClusterId,
        layer: LayerIndex,
    ) -> Vec<(Polygon, Transform)> {
        let mut out = Vec::new();
        self.collect_shapes(cell, cluster, layer, &Transform::identity(), &mut out);
        out
    }
    fn collect_shapes(
        &self,
        cell: CellKey,
        cluster: ClusterId,
        layer: LayerIndex,
        trans: &Transform,
        out: &mut Vec<(Polygon, Transform)>,
    ) {
        if let Some(cl) = self.per_cell.get(&cell).and_then(|cc| cc.get(cluster)) {
            for (l, poly) in &cl.shapes {
                if *l == layer {
                    out.push((poly.clone(), *trans));
                }
            }
            for ch in &cl.children {
                self.collect_shapes(
                    ch.cell,
                    ch.cluster,
                    layer,
                    &Transform::cascade(trans, &ch.trans),
                    out,
                );
            }
        }
    }

    /// Seed clusters into `cell` from explicit per-layer geometry groups.
    /// Used for freshly created device cells, whose terminal clusters must
    /// participate in upward connectivity. Returns one id per group, in
    /// group order.
    pub fn seed_cell_clusters(
        &mut self,
        cell: CellKey,
        groups: Vec<Vec<(LayerIndex, Polygon)>>,
    ) -> Vec<ClusterId> {
        let cc = self.per_cell.entry(cell).or_default();
        groups
            .into_iter()
            .map(|shapes| {
                let id = ClusterId(cc.clusters.len());
                cc.clusters.push(Cluster {
                    shapes,
                    children: Vec::new(),
                    root: true,
                });
                id
            })
            .collect()
    }
}

/// Depth-first post-order over the hierarchy: children before parents
fn post_order(
    layout: &Layout,
    cell: CellKey,
    seen: &mut HashSet<CellKey>,
    order: &mut Vec<CellKey>,
) {
    if !seen.insert(cell) {
        return;
    }
    for inst in &layout.cell(cell).insts {
        post_order(layout, inst.cell, seen, order);
    }
    order.push(cell);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CellInstArray, Units};
    use crate::geom::{Point, Rect, Shape};

    fn rect(x0: isize, y0: isize, x1: isize, y1: isize) -> Shape {
        Shape::Rect(Rect::new(Point::new(x0, y0), Point::new(x1, y1)))
    }

    #[test]
    fn flat_clustering() {
        let mut layout = Layout::new("lib", Units::Nano);
        let top = layout.add_cell("T");
        {
            let cell = layout.cell_mut(top);
            // Two overlapping shapes on connected layers, plus a loner
            cell.shapes_mut(0).insert(rect(0, 0, 10, 10));
            cell.shapes_mut(1).insert(rect(5, 5, 20, 20));
            cell.shapes_mut(0).insert(rect(100, 100, 110, 110));
        }
        let mut conn = Connectivity::new();
        conn.connect(0);
        conn.connect(1);
        conn.connect_layers(0, 1);

        let mut hc = HierClusters::new();
        hc.build(&layout, top, &[0, 1], &conn, &HashSet::new());
        let cc = hc.clusters_per_cell(top);
        assert_eq!(cc.len(), 2);
        assert!(cc.iter().all(|(_, c)| c.is_root()));
    }
    #[test]
    fn unconnected_layers_stay_apart() {
        let mut layout = Layout::new("lib", Units::Nano);
        let top = layout.add_cell("T");
        {
            let cell = layout.cell_mut(top);
            cell.shapes_mut(0).insert(rect(0, 0, 10, 10));
            cell.shapes_mut(1).insert(rect(5, 5, 20, 20));
        }
        let mut conn = Connectivity::new();
        conn.connect(0);
        conn.connect(1);
        // no 0-1 connection

        let mut hc = HierClusters::new();
        hc.build(&layout, top, &[0, 1], &conn, &HashSet::new());
        assert_eq!(hc.clusters_per_cell(top).len(), 2);
    }
    #[test]
    fn child_cluster_loses_root_on_upward_connection() {
        let mut layout = Layout::new("lib", Units::Nano);
        let child = layout.add_cell("C");
        layout.cell_mut(child).shapes_mut(0).insert(rect(0, 0, 10, 10));
        let top = layout.add_cell("T");
        // The child sits at (50, 0); a top-level shape overlaps it there
        layout
            .cell_mut(top)
            .insert(CellInstArray::new(child, Transform::translate(50, 0)));
        layout.cell_mut(top).shapes_mut(0).insert(rect(55, 5, 70, 8));

        let mut conn = Connectivity::new();
        conn.connect(0);

        let mut hc = HierClusters::new();
        hc.build(&layout, top, &[0], &conn, &HashSet::new());

        let child_cc = hc.clusters_per_cell(child);
        assert_eq!(child_cc.len(), 1);
        assert!(!child_cc.iter().next().unwrap().1.is_root());

        let top_cc = hc.clusters_per_cell(top);
        assert_eq!(top_cc.len(), 1);
        let (_, cluster) = top_cc.iter().next().unwrap();
        assert!(cluster.is_root());
        assert_eq!(cluster.children.len(), 1);

        // Flattened shapes carry the instance transform
        let shapes = hc.cluster_shapes(top, ClusterId(0), 0);
        assert_eq!(shapes.len(), 2);
    }
    #[test]
    fn isolated_child_cluster_stays_root_in_child() {
        let mut layout = Layout::new("lib", Units::Nano);
        let child = layout.add_cell("C");
        layout.cell_mut(child).shapes_mut(0).insert(rect(0, 0, 10, 10));
        let top = layout.add_cell("T");
        layout
            .cell_mut(top)
            .insert(CellInstArray::new(child, Transform::translate(500, 0)));

        let mut conn = Connectivity::new();
        conn.connect(0);

        let mut hc = HierClusters::new();
        hc.build(&layout, top, &[0], &conn, &HashSet::new());

        let child_cc = hc.clusters_per_cell(child);
        assert_eq!(child_cc.len(), 1);
        assert!(child_cc.iter().next().unwrap().1.is_root());
        // The parent does not duplicate the lone child cluster
        assert!(hc.clusters_per_cell(top).is_empty());
    }
}
