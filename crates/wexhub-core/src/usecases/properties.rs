//! Extracted-properties query use cases
//!
//! Read-only aggregation over the rows the property-extraction handler
//! persisted for a model version.

use std::sync::Arc;

use crate::domain::errors::DomainError;
use crate::domain::identity::ProjectRole;
use crate::domain::newtypes::{UniqueId, VersionId};
use crate::domain::properties::{ElementProperties, IfcElement, PropertyFilter};
use crate::domain::scope::{Principal, Scope};
use crate::ports::{CatalogRepository, Page, PageRequest};

use super::access::AccessGate;

fn transient(e: anyhow::Error) -> DomainError {
    DomainError::Transient(e.to_string())
}

/// Use case for querying extracted IFC properties
pub struct PropertiesService {
    gate: Arc<AccessGate>,
    catalog: Arc<dyn CatalogRepository>,
}

impl PropertiesService {
    pub fn new(gate: Arc<AccessGate>, catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { gate, catalog }
    }

    /// Queries a version's extracted elements with the aggregation filter
    pub async fn query_elements(
        &self,
        principal: &Principal,
        version_id: VersionId,
        filter: &PropertyFilter,
        page: PageRequest,
    ) -> Result<Page<IfcElement>, DomainError> {
        self.gate.require_scope(principal, Scope::ModelsRead)?;
        self.check_version_access(principal, version_id).await?;
        self.catalog
            .query_elements(version_id, filter, page)
            .await
            .map_err(transient)
    }

    /// Retrieves one element with its property and quantity sets
    pub async fn get_element(
        &self,
        principal: &Principal,
        version_id: VersionId,
        element_id: UniqueId,
    ) -> Result<ElementProperties, DomainError> {
        self.gate.require_scope(principal, Scope::ModelsRead)?;
        self.check_version_access(principal, version_id).await?;
        self.catalog
            .get_element_properties(version_id, element_id)
            .await
            .map_err(transient)?
            .ok_or_else(|| DomainError::NotFound("element".to_string()))
    }

    /// Walks version → model → project and checks Viewer, masked
    async fn check_version_access(
        &self,
        principal: &Principal,
        version_id: VersionId,
    ) -> Result<(), DomainError> {
        let result: Result<(), DomainError> = async {
            let version = self
                .catalog
                .get_version(version_id)
                .await
                .map_err(transient)?
                .ok_or_else(|| DomainError::NotFound("model version".to_string()))?;
            let model = self
                .catalog
                .get_model(version.model_id())
                .await
                .map_err(transient)?
                .ok_or_else(|| DomainError::NotFound("model".to_string()))?;
            let project = self
                .gate
                .project_in_scope(principal, model.project_id())
                .await?;
            self.gate
                .require_project_role(principal, &project, ProjectRole::Viewer)
                .await?;
            Ok(())
        }
        .await;
        result.map_err(|e| e.masked("model version"))
    }
}
