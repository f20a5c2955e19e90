//! Extracted IFC property entities
//!
//! Rows produced by the property-extraction handler, keyed to the model
//! version they were extracted from. Served read-only through the
//! properties aggregation query.

use serde::{Deserialize, Serialize};

use super::newtypes::{UniqueId, VersionId};

/// A building element extracted from an IFC model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfcElement {
    pub id: UniqueId,
    pub model_version_id: VersionId,
    /// STEP line number of the entity in the source file
    pub entity_label: i64,
    /// IFC GlobalId (22-character base64 GUID)
    pub global_id: Option<String>,
    /// IFC type name, e.g. `IfcWallStandardCase`
    pub type_name: String,
    pub name: Option<String>,
}

/// A named property set attached to an element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfcPropertySet {
    pub id: UniqueId,
    pub element_id: UniqueId,
    pub name: String,
    pub properties: Vec<IfcProperty>,
}

/// A single property inside a property set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfcProperty {
    pub id: UniqueId,
    pub name: String,
    /// String form of the value, whatever its IFC type was
    pub value: Option<String>,
    pub unit: Option<String>,
}

/// A named quantity set attached to an element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfcQuantitySet {
    pub id: UniqueId,
    pub element_id: UniqueId,
    pub name: String,
    pub quantities: Vec<IfcQuantity>,
}

/// A single physical quantity inside a quantity set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfcQuantity {
    pub id: UniqueId,
    pub name: String,
    pub value: f64,
    pub unit: Option<String>,
}

/// An element together with its property and quantity sets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementProperties {
    pub element: IfcElement,
    pub property_sets: Vec<IfcPropertySet>,
    pub quantity_sets: Vec<IfcQuantitySet>,
}

/// Filter for the properties aggregation query
///
/// All fields optional; set fields combine with AND. String matches are
/// case-insensitive substring matches except `global_id`, which is exact.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyFilter {
    pub entity_label: Option<i64>,
    pub global_id: Option<String>,
    pub type_name: Option<String>,
    pub name: Option<String>,
    pub property_set_name: Option<String>,
}

impl PropertyFilter {
    /// Returns true when no filter fields are set
    pub fn is_empty(&self) -> bool {
        self.entity_label.is_none()
            && self.global_id.is_none()
            && self.type_name.is_none()
            && self.name.is_none()
            && self.property_set_name.is_none()
    }
}
