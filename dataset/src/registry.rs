//! Ordered, duplicate-free name registries for gates and data types.
//!
//! Both registries only grow. Adding a name that is already present is a
//! no-op, and every `add` reports which names were actually new.

use crate::error::{DatasetError, Result};
use flowset_gates::{BooleanOperation, PolygonGate};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// An append-only list of unique names that remembers insertion order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NameRegistry {
    names: Vec<Arc<str>>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append every name not already present, in the order given.
    ///
    /// Returns the names that were added. Duplicates inside `names` are only
    /// added once.
    pub fn add<I, S>(&mut self, names: I) -> Vec<Arc<str>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = Vec::new();
        for name in names {
            let name = name.as_ref();
            if !self.contains(name) {
                let name: Arc<str> = Arc::from(name);
                self.names.push(name.clone());
                added.push(name);
            }
        }
        added
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n.as_ref() == name)
    }

    /// The registered (shared) copy of `name`
    pub fn get(&self, name: &str) -> Option<&Arc<str>> {
        self.names.iter().find(|n| n.as_ref() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<str>> {
        self.names.iter()
    }

    pub fn names(&self) -> &[Arc<str>] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Registered data-type labels (raw, calibrated, compensated, ...)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataTypeRegistry {
    labels: NameRegistry,
}

impl DataTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_data_types<I, S>(&mut self, labels: I) -> Vec<Arc<str>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.labels.add(labels)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    pub fn get(&self, label: &str) -> Option<&Arc<str>> {
        self.labels.get(label)
    }

    /// Registered copy of `label`, or `UnknownDataType`
    pub fn require(&self, label: &str) -> Result<Arc<str>> {
        self.labels
            .get(label)
            .cloned()
            .ok_or_else(|| DatasetError::UnknownDataType(label.to_string()))
    }

    pub fn labels(&self) -> &[Arc<str>] {
        self.labels.names()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// How a registered gate's per-cell mask is produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GateDefinition {
    /// Every cell passes
    AllCells,
    /// Masks are supplied from outside the dataset
    Declared,
    /// A drawn polygon, evaluated inside its parent stage when it has one
    Polygon {
        gate: PolygonGate,
        parent: Option<Arc<str>>,
    },
    /// Boolean combination of other registered gates
    Crossed {
        operation: BooleanOperation,
        inputs: Vec<Arc<str>>,
    },
    /// Cells whose values are non-negative on every channel of `data_type`
    NonNegative { data_type: Arc<str> },
}

impl GateDefinition {
    pub fn kind_name(&self) -> &'static str {
        match self {
            GateDefinition::AllCells => "all-cells",
            GateDefinition::Declared => "declared",
            GateDefinition::Polygon { .. } => "polygon",
            GateDefinition::Crossed { .. } => "crossed",
            GateDefinition::NonNegative { .. } => "non-negative",
        }
    }
}

/// Registered gate names and the definition behind each one
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateRegistry {
    names: NameRegistry,
    definitions: FxHashMap<Arc<str>, GateDefinition>,
}

impl GateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register externally-managed gate names. Existing names keep their
    /// definition. Returns the names that were added.
    pub fn add_gates<I, S>(&mut self, names: I) -> Vec<Arc<str>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let added = self.names.add(names);
        for name in &added {
            self.definitions
                .insert(name.clone(), GateDefinition::Declared);
        }
        added
    }

    /// Register `name` (if new) and set its definition, replacing any previous one.
    ///
    /// Returns the registered name and whether it was newly added.
    pub fn define(&mut self, name: &str, definition: GateDefinition) -> (Arc<str>, bool) {
        let added = !self.names.add([name]).is_empty();
        let name = self
            .names
            .get(name)
            .cloned()
            .unwrap_or_else(|| Arc::from(name));
        self.definitions.insert(name.clone(), definition);
        (name, added)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Registered copy of `name`, or `UnknownGate`
    pub fn require(&self, name: &str) -> Result<Arc<str>> {
        self.names
            .get(name)
            .cloned()
            .ok_or_else(|| DatasetError::UnknownGate(name.to_string()))
    }

    pub fn definition(&self, name: &str) -> Option<&GateDefinition> {
        self.definitions.get(name)
    }

    pub fn names(&self) -> &[Arc<str>] {
        self.names.names()
    }

    /// Gates in registration order together with their definitions
    pub fn iter(&self) -> impl Iterator<Item = (&Arc<str>, &GateDefinition)> {
        self.names.iter().filter_map(|name| {
            self.definitions
                .get(name)
                .map(|definition| (name, definition))
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
