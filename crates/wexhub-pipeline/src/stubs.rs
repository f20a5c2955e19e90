//! Stub translators
//!
//! Deterministic stand-ins for the real geometry and property
//! translators, used by tests and local runs. The geometry stub emits a
//! tagged container around the source; the property stub does a shallow
//! STEP scan, one element per `#<label>=<TYPE>(…)` line.

use wexhub_core::domain::newtypes::UniqueId;
use wexhub_core::domain::properties::{
    ElementProperties, IfcElement, IfcProperty, IfcPropertySet,
};
use wexhub_core::ports::{ExtractionOutcome, GeometryTranslator, PropertyExtractor};

/// Magic prefix of stub-produced geometry
pub const STUB_WEXBIM_MAGIC: &[u8] = b"WEXBIM\0";

/// Geometry translator producing a tagged copy of the source
#[derive(Default)]
pub struct StubGeometryTranslator;

#[async_trait::async_trait]
impl GeometryTranslator for StubGeometryTranslator {
    async fn translate(&self, ifc: &[u8]) -> anyhow::Result<Vec<u8>> {
        anyhow::ensure!(!ifc.is_empty(), "IFC source is empty");
        let mut out = Vec::with_capacity(STUB_WEXBIM_MAGIC.len() + 8 + ifc.len());
        out.extend_from_slice(STUB_WEXBIM_MAGIC);
        out.extend_from_slice(&(ifc.len() as u64).to_le_bytes());
        out.extend_from_slice(ifc);
        Ok(out)
    }
}

/// Property extractor doing a line-wise STEP entity scan
#[derive(Default)]
pub struct StubPropertyExtractor;

/// Parses `#123=IFCWALL(` into `(123, "IFCWALL")`
fn parse_entity_line(line: &str) -> Option<(i64, String)> {
    let rest = line.trim().strip_prefix('#')?;
    let eq = rest.find('=')?;
    let label = rest[..eq].trim().parse::<i64>().ok()?;
    let after = rest[eq + 1..].trim_start();
    let paren = after.find('(')?;
    let type_name = after[..paren].trim();
    if type_name.is_empty() || !type_name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some((label, type_name.to_string()))
}

#[async_trait::async_trait]
impl PropertyExtractor for StubPropertyExtractor {
    async fn extract(&self, ifc: &[u8]) -> anyhow::Result<ExtractionOutcome> {
        anyhow::ensure!(!ifc.is_empty(), "IFC source is empty");
        let text = String::from_utf8_lossy(ifc);

        let mut elements = Vec::new();
        for line in text.lines() {
            let Some((label, type_name)) = parse_entity_line(line) else {
                continue;
            };
            let element_id = UniqueId::new();
            elements.push(ElementProperties {
                element: IfcElement {
                    id: element_id,
                    // Overwritten with the real version id at persist time
                    model_version_id: wexhub_core::domain::newtypes::VersionId::new(),
                    entity_label: label,
                    global_id: None,
                    type_name: type_name.clone(),
                    name: None,
                },
                property_sets: vec![IfcPropertySet {
                    id: UniqueId::new(),
                    element_id,
                    name: "Pset_Stub".to_string(),
                    properties: vec![IfcProperty {
                        id: UniqueId::new(),
                        name: "SourceType".to_string(),
                        value: Some(type_name),
                        unit: None,
                    }],
                }],
                quantity_sets: Vec::new(),
            });
        }

        let properties_blob = serde_json::to_vec(
            &elements
                .iter()
                .map(|e| (e.element.entity_label, e.element.type_name.as_str()))
                .collect::<Vec<_>>(),
        )?;

        Ok(ExtractionOutcome {
            elements,
            properties_blob,
        })
    }
}
