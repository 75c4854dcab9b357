//!
//! # Netlist Data Model
//!
//! The abstract circuit view produced by device extraction: circuits per
//! layout cell, devices with classed parameters and terminals, and device
//! abstracts tying canonical device cells back into the cluster space.
//!

// Std-Lib
use std::collections::BTreeMap;

// Crates.io
use rust_decimal::Decimal;
use slotmap::{new_key_type, SlotMap};

// Local imports
use crate::clusters::ClusterId;
use crate::data::CellKey;
use crate::geom::{Point, Transform};

// Create key-types for each internal type stored in [SlotMap]s
new_key_type! {
    /// Keys for [Circuit] entries
    pub struct CircuitKey;
}

/// Index of a parameter definition within its [DeviceClass]
pub type ParamId = usize;
/// Index of a terminal definition within its [DeviceClass]
pub type TerminalId = usize;

/// Netlist-unique device id
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(pub u64);

/// Index of a [DeviceClass] within its [Netlist]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceClassId(pub usize);

/// Index of a [DeviceAbstract] within its [Netlist]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceAbstractId(pub usize);

/// One parameter of a [DeviceClass]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceParameterDefinition {
    pub name: String,
    pub description: String,
    pub default_value: Decimal,
}

/// One terminal of a [DeviceClass]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTerminalDefinition {
    pub name: String,
    pub description: String,
}

/// # Device Class
///
/// Named template shared by all devices of one kind: the ordered parameter
/// and terminal schemas. Definition order assigns the [ParamId] and
/// [TerminalId] values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceClass {
    pub name: String,
    params: Vec<DeviceParameterDefinition>,
    terminals: Vec<DeviceTerminalDefinition>,
}
impl DeviceClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
    /// Append a parameter definition, returning its id
    pub fn add_parameter(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        default_value: Decimal,
    ) -> ParamId {
        self.params.push(DeviceParameterDefinition {
            name: name.into(),
            description: description.into(),
            default_value,
        });
        self.params.len() - 1
    }
    /// Append a terminal definition, returning its id
    pub fn add_terminal(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> TerminalId {
        self.terminals.push(DeviceTerminalDefinition {
            name: name.into(),
            description: description.into(),
        });
        self.terminals.len() - 1
    }
    pub fn parameters(&self) -> &[DeviceParameterDefinition] {
        &self.params
    }
    pub fn terminals(&self) -> &[DeviceTerminalDefinition] {
        &self.terminals
    }
    pub fn parameter_id(&self, name: &str) -> Option<ParamId> {
        self.params.iter().position(|p| p.name == name)
    }
    pub fn terminal_id(&self, name: &str) -> Option<TerminalId> {
        self.terminals.iter().position(|t| t.name == name)
    }
}

/// # Device
///
/// One extracted electronic element, owned by its [Circuit].
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    /// Netlist-unique id
    pub id: DeviceId,
    /// The device's class
    pub class: DeviceClassId,
    /// Parameter values; defaults apply for absent ids
    pub params: BTreeMap<ParamId, Decimal>,
    /// Device position, in the including cell's frame
    pub position: Point,
    /// The canonical device cell, once folded (cell-based extraction)
    pub abstract_ref: Option<DeviceAbstractId>,
}
impl Device {
    pub fn new(id: DeviceId, class: DeviceClassId) -> Self {
        Self {
            id,
            class,
            params: BTreeMap::new(),
            position: Point::default(),
            abstract_ref: None,
        }
    }
}

/// Reference from a parent [Circuit] to a child circuit placement
#[derive(Debug, Clone, PartialEq)]
pub struct SubCircuitRef {
    pub circuit: CircuitKey,
    pub trans: Transform,
}

/// # Circuit
///
/// Per-cell netlist container: devices and subcircuit references.
/// Created on demand, one per layout cell touched by extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct Circuit {
    pub name: String,
    pub cell: CellKey,
    pub devices: Vec<Device>,
    pub subcircuits: Vec<SubCircuitRef>,
}
impl Circuit {
    pub fn new(name: impl Into<String>, cell: CellKey) -> Self {
        Self {
            name: name.into(),
            cell,
            devices: Vec::new(),
            subcircuits: Vec::new(),
        }
    }
    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }
    pub fn device_mut(&mut self, id: DeviceId) -> Option<&mut Device> {
        self.devices.iter_mut().find(|d| d.id == id)
    }
}

/// # Device Abstract
///
/// The shared description behind one canonical device cell: which layout
/// cell realizes it,
/// and which local cluster carries each terminal. Owned by the [Netlist];
/// the device-cell registry holds ids, not copies.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceAbstract {
    pub class: DeviceClassId,
    pub cell: CellKey,
    pub terminal_clusters: BTreeMap<TerminalId, ClusterId>,
}

/// # Netlist
///
/// Owns circuits, device classes, and device abstracts, and allocates the
/// netlist-unique device ids.
#[derive(Debug, Clone, Default)]
pub struct Netlist {
    circuits: SlotMap<CircuitKey, Circuit>,
    device_classes: Vec<DeviceClass>,
    device_abstracts: Vec<DeviceAbstract>,
    next_device_id: u64,
}
impl Netlist {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn add_circuit(&mut self, circuit: Circuit) -> CircuitKey {
        self.circuits.insert(circuit)
    }
    pub fn circuit(&self, key: CircuitKey) -> &Circuit {
        &self.circuits[key]
    }
    pub fn circuit_mut(&mut self, key: CircuitKey) -> &mut Circuit {
        &mut self.circuits[key]
    }
    pub fn circuits(&self) -> impl Iterator<Item = (CircuitKey, &Circuit)> {
        self.circuits.iter()
    }
    pub fn num_circuits(&self) -> usize {
        self.circuits.len()
    }
    pub fn add_device_class(&mut self, class: DeviceClass) -> DeviceClassId {
        self.device_classes.push(class);
        DeviceClassId(self.device_classes.len() - 1)
    }
    pub fn device_class(&self, id: DeviceClassId) -> &DeviceClass {
        &self.device_classes[id.0]
    }
    pub fn device_classes(&self) -> &[DeviceClass] {
        &self.device_classes
    }
    pub fn add_device_abstract(&mut self, abs: DeviceAbstract) -> DeviceAbstractId {
        self.device_abstracts.push(abs);
        DeviceAbstractId(self.device_abstracts.len() - 1)
    }
    pub fn device_abstract(&self, id: DeviceAbstractId) -> &DeviceAbstract {
        &self.device_abstracts[id.0]
    }
    pub fn device_abstracts(&self) -> &[DeviceAbstract] {
        &self.device_abstracts
    }
    /// Allocate the next device id
    pub fn next_device_id(&mut self) -> DeviceId {
        self.next_device_id += 1;
        DeviceId(self.next_device_id)
    }
    /// Total device count over all circuits
    pub fn num_devices(&self) -> usize {
        self.circuits.values().map(|c| c.devices.len()).sum()
    }
}
impl PartialEq for Netlist {
    /// Netlists compare equal when their classes, abstracts, and circuits
    /// (matched by name) are equal. Circuit-key identity does not enter.
    fn eq(&self, other: &Self) -> bool {
        if self.device_classes != other.device_classes
            || self.device_abstracts != other.device_abstracts
            || self.circuits.len() != other.circuits.len()
        {
            return false;
        }
        let mut mine: Vec<&Circuit> = self.circuits.values().collect();
        let mut theirs: Vec<&Circuit> = other.circuits.values().collect();
        mine.sort_by(|a, b| a.name.cmp(&b.name));
        theirs.sort_by(|a, b| a.name.cmp(&b.name));
        mine.iter()
            .zip(theirs.iter())
            .all(|(a, b)| a.name == b.name && a.devices == b.devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_class_schema() {
        let mut class = DeviceClass::new("MOS");
        let l = class.add_parameter("L", "gate length", Decimal::ONE);
        let w = class.add_parameter("W", "gate width", Decimal::ONE);
        let s = class.add_terminal("S", "source");
        let g = class.add_terminal("G", "gate");
        let d = class.add_terminal("D", "drain");
        assert_eq!((l, w), (0, 1));
        assert_eq!((s, g, d), (0, 1, 2));
        assert_eq!(class.parameter_id("W"), Some(1));
        assert_eq!(class.terminal_id("D"), Some(2));
        assert_eq!(class.terminal_id("B"), None);
    }
    #[test]
    fn device_ids_are_netlist_unique() {
        let mut nl = Netlist::new();
        let a = nl.next_device_id();
        let b = nl.next_device_id();
        assert_ne!(a, b);
    }
}
