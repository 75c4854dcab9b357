//!
//! # db21
//!
//! An IC-layout processing engine built around two collaborating
//! subsystems:
//!
//! * the [builder::HierarchyBuilder], which mirrors the hierarchy visited
//!   by a recursive shape traversal into a fresh target layout, honoring a
//!   clip region and deduplicating cells per *(source cell, clip variant)*,
//!   with shapes flowing through a composable [receivers] pipeline
//!   (clipping, reducing, polygon-reference interning);
//! * the [extract::NetlistDeviceExtractor], which walks connected geometry
//!   clusters, delegates device recognition to a device-specific rule, and
//!   records both the abstract [netlist::Netlist] and its back-annotation
//!   into the layout (canonical device cells, terminal markers, device-id
//!   tagged instances).
//!
//! The supporting cast (raw layout storage, geometry, rectangle clipping,
//! connectivity clusters, regions) lives in the remaining modules.
//!

/// # Location Integer Type-Alias
///
/// Used for all layout spatial coordinates.
/// Designed for quickly swapping to other integer types, if we so desire.
pub type Int = isize;

/// Layer index type: layers are numbered within a [data::Layout]
pub type LayerIndex = u32;

pub mod bbox;
pub mod builder;
pub mod clusters;
pub mod data;
pub mod error;
pub mod extract;
pub mod geom;
pub mod hier;
pub mod netlist;
pub mod poly;
pub mod props;
pub mod receivers;
pub mod region;
pub mod utils;

#[cfg(test)]
mod tests;

// Re-export the primary surface
pub use bbox::{BoundBox, BoundBoxTrait};
pub use builder::{compare_hierarchies, compute_clip_variant, ClipVariant, HierarchyBuilder};
pub use clusters::{ClusterId, ConnectedClusters, Connectivity, HierClusters};
pub use data::{
    Cell, CellInstArray, CellKey, Layout, PolygonRef, PushTarget, ShapeData, ShapeRecord,
    ShapeRepository, Shapes, Units,
};
pub use error::{LayoutError, LayoutResult};
pub use extract::{
    DeviceCellKey, DeviceCellRegistry, DeviceExtractorDelegate, DeviceExtractorMode,
    NetlistDeviceExtractor, NetlistDeviceExtractorError, NetlistDeviceExtractorLayerDefinition,
};
pub use geom::{
    Edge, EdgePair, Path, Point, Polygon, Rect, Shape, ShapeTrait, Text, Transform,
    TransformTrait,
};
pub use hier::{
    ComplexRegion, HierarchyReceiver, LayerSelection, NewInstMode, RecursiveShapeIterator,
};
pub use netlist::{
    Circuit, CircuitKey, Device, DeviceAbstract, DeviceAbstractId, DeviceClass, DeviceClassId,
    DeviceId, Netlist, ParamId, TerminalId,
};
pub use props::{PropNameId, PropValue, PropertiesId, PropertiesRepository, PropertySet};
pub use receivers::{
    ClippingShapeReceiver, HierarchyShapeReceiver, PolygonRefShapeReceiver,
    ReducingShapeReceiver, ShapeInserter,
};
pub use region::{DeepShapeStore, Region};
pub use utils::{ErrorHelper, Ptr};
