//! SQLite implementation of the catalog repository port
//!
//! Files, models, versions, extracted properties, and usage aggregation.
//! Version numbers are allocated inside the insert transaction; the
//! UNIQUE(model_id, version_number) constraint backstops races.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use wexhub_core::domain::file::File;
use wexhub_core::domain::model::{Model, ModelVersion};
use wexhub_core::domain::newtypes::{
    FileId, ModelId, ProjectId, StorageKey, UniqueId, VersionId, WorkspaceId,
};
use wexhub_core::domain::properties::{
    ElementProperties, IfcElement, IfcProperty, IfcPropertySet, IfcQuantity, IfcQuantitySet,
    PropertyFilter,
};
use wexhub_core::ports::{
    CatalogRepository, FileListFilter, Page, PageRequest, UsageTotals,
};

use crate::convert::{
    file_category_from, file_kind_from, parse_datetime, parse_optional_datetime,
    version_status_from,
};
use crate::SqliteStore;

fn file_from_row(row: &SqliteRow) -> anyhow::Result<File> {
    Ok(File::from_parts(
        row.get::<String, _>("id").parse()?,
        row.get::<String, _>("project_id").parse()?,
        row.get("name"),
        row.get("content_type"),
        row.get::<i64, _>("size_bytes") as u64,
        row.get("checksum"),
        file_kind_from(row.get("kind"))?,
        file_category_from(row.get("category"))?,
        row.get("storage_provider"),
        StorageKey::new(row.get::<String, _>("storage_key"))?,
        row.get::<i64, _>("is_deleted") != 0,
        parse_datetime(row.get("created_at"))?,
        parse_optional_datetime(row.get("deleted_at"))?,
    ))
}

fn model_from_row(row: &SqliteRow) -> anyhow::Result<Model> {
    Ok(Model::from_parts(
        row.get::<String, _>("id").parse()?,
        row.get::<String, _>("project_id").parse()?,
        row.get("name"),
        row.get("description"),
        parse_datetime(row.get("created_at"))?,
    ))
}

fn version_from_row(row: &SqliteRow) -> anyhow::Result<ModelVersion> {
    let wexbim: Option<String> = row.get("wexbim_file_id");
    let properties: Option<String> = row.get("properties_file_id");
    Ok(ModelVersion::from_parts(
        row.get::<String, _>("id").parse()?,
        row.get::<String, _>("model_id").parse()?,
        row.get::<i64, _>("version_number") as u32,
        row.get::<String, _>("ifc_file_id").parse()?,
        version_status_from(row.get("status"))?,
        wexbim.map(|s| s.parse()).transpose()?,
        properties.map(|s| s.parse()).transpose()?,
        row.get("error_message"),
        parse_optional_datetime(row.get("processed_at"))?,
        parse_datetime(row.get("created_at"))?,
    ))
}

fn element_from_row(row: &SqliteRow) -> anyhow::Result<IfcElement> {
    Ok(IfcElement {
        id: row.get::<String, _>("id").parse()?,
        model_version_id: row.get::<String, _>("model_version_id").parse()?,
        entity_label: row.get("entity_label"),
        global_id: row.get("global_id"),
        type_name: row.get("type_name"),
        name: row.get("name"),
    })
}

#[async_trait::async_trait]
impl CatalogRepository for SqliteStore {
    async fn create_file(&self, file: &File) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO files \
             (id, project_id, name, content_type, size_bytes, checksum, kind, category, \
              storage_provider, storage_key, is_deleted, created_at, deleted_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(file.id().to_string())
        .bind(file.project_id().to_string())
        .bind(file.name())
        .bind(file.content_type())
        .bind(file.size_bytes() as i64)
        .bind(file.checksum())
        .bind(file.kind().to_string())
        .bind(file.category().to_string())
        .bind(file.storage_provider())
        .bind(file.storage_key().as_str())
        .bind(file.is_deleted() as i64)
        .bind(file.created_at().to_rfc3339())
        .bind(file.deleted_at().map(|t| t.to_rfc3339()))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get_file(&self, id: FileId) -> anyhow::Result<Option<File>> {
        sqlx::query("SELECT * FROM files WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await?
            .map(|row| file_from_row(&row))
            .transpose()
    }

    async fn update_file(&self, file: &File) -> anyhow::Result<()> {
        sqlx::query("UPDATE files SET is_deleted = ?, deleted_at = ? WHERE id = ?")
            .bind(file.is_deleted() as i64)
            .bind(file.deleted_at().map(|t| t.to_rfc3339()))
            .bind(file.id().to_string())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn list_files(
        &self,
        project_id: ProjectId,
        filter: FileListFilter,
        page: PageRequest,
    ) -> anyhow::Result<Page<File>> {
        let mut conditions = vec!["project_id = ?".to_string(), "is_deleted = 0".to_string()];
        if filter.kind.is_some() {
            conditions.push("kind = ?".to_string());
        }
        if filter.category.is_some() {
            conditions.push("category = ?".to_string());
        }
        let where_clause = conditions.join(" AND ");

        let count_sql = format!("SELECT COUNT(*) AS n FROM files WHERE {where_clause}");
        let mut count_query = sqlx::query(&count_sql).bind(project_id.to_string());
        if let Some(kind) = filter.kind {
            count_query = count_query.bind(kind.to_string());
        }
        if let Some(category) = filter.category {
            count_query = count_query.bind(category.to_string());
        }
        let total: i64 = count_query.fetch_one(self.pool()).await?.get("n");

        let list_sql = format!(
            "SELECT * FROM files WHERE {where_clause} \
             ORDER BY created_at DESC LIMIT ? OFFSET ?"
        );
        let mut list_query = sqlx::query(&list_sql).bind(project_id.to_string());
        if let Some(kind) = filter.kind {
            list_query = list_query.bind(kind.to_string());
        }
        if let Some(category) = filter.category {
            list_query = list_query.bind(category.to_string());
        }
        let rows = list_query
            .bind(page.page_size() as i64)
            .bind(page.offset() as i64)
            .fetch_all(self.pool())
            .await?;
        let items = rows.iter().map(file_from_row).collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Page::new(items, page, total as u64))
    }

    async fn usage_for_project(&self, project_id: ProjectId) -> anyhow::Result<UsageTotals> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(size_bytes), 0) AS total, COUNT(*) AS n \
             FROM files WHERE project_id = ? AND is_deleted = 0",
        )
        .bind(project_id.to_string())
        .fetch_one(self.pool())
        .await?;
        Ok(UsageTotals {
            total_bytes: row.get::<i64, _>("total") as u64,
            file_count: row.get::<i64, _>("n") as u64,
        })
    }

    async fn usage_for_workspace(
        &self,
        workspace_id: WorkspaceId,
    ) -> anyhow::Result<UsageTotals> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(f.size_bytes), 0) AS total, COUNT(*) AS n \
             FROM files f JOIN projects p ON p.id = f.project_id \
             WHERE p.workspace_id = ? AND f.is_deleted = 0",
        )
        .bind(workspace_id.to_string())
        .fetch_one(self.pool())
        .await?;
        Ok(UsageTotals {
            total_bytes: row.get::<i64, _>("total") as u64,
            file_count: row.get::<i64, _>("n") as u64,
        })
    }

    async fn create_model(&self, model: &Model) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO models (id, project_id, name, description, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(model.id().to_string())
        .bind(model.project_id().to_string())
        .bind(model.name())
        .bind(model.description())
        .bind(model.created_at().to_rfc3339())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get_model(&self, id: ModelId) -> anyhow::Result<Option<Model>> {
        sqlx::query("SELECT * FROM models WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await?
            .map(|row| model_from_row(&row))
            .transpose()
    }

    async fn list_models(&self, project_id: ProjectId) -> anyhow::Result<Vec<Model>> {
        let rows =
            sqlx::query("SELECT * FROM models WHERE project_id = ? ORDER BY created_at DESC")
                .bind(project_id.to_string())
                .fetch_all(self.pool())
                .await?;
        rows.iter().map(model_from_row).collect()
    }

    async fn create_version(
        &self,
        model_id: ModelId,
        ifc_file_id: FileId,
    ) -> anyhow::Result<ModelVersion> {
        let mut tx = self.pool().begin().await?;
        let next: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(version_number), 0) + 1 FROM model_versions WHERE model_id = ?",
        )
        .bind(model_id.to_string())
        .fetch_one(&mut *tx)
        .await?;

        let version = ModelVersion::new(model_id, next as u32, ifc_file_id);
        sqlx::query(
            "INSERT INTO model_versions \
             (id, model_id, version_number, ifc_file_id, status, wexbim_file_id, \
              properties_file_id, error_message, processed_at, created_at) \
             VALUES (?, ?, ?, ?, ?, NULL, NULL, NULL, NULL, ?)",
        )
        .bind(version.id().to_string())
        .bind(version.model_id().to_string())
        .bind(version.version_number() as i64)
        .bind(version.ifc_file_id().to_string())
        .bind(version.status().to_string())
        .bind(version.created_at().to_rfc3339())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(version)
    }

    async fn get_version(&self, id: VersionId) -> anyhow::Result<Option<ModelVersion>> {
        sqlx::query("SELECT * FROM model_versions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await?
            .map(|row| version_from_row(&row))
            .transpose()
    }

    async fn list_versions(
        &self,
        model_id: ModelId,
        page: PageRequest,
    ) -> anyhow::Result<Page<ModelVersion>> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM model_versions WHERE model_id = ?")
                .bind(model_id.to_string())
                .fetch_one(self.pool())
                .await?;
        let rows = sqlx::query(
            "SELECT * FROM model_versions WHERE model_id = ? \
             ORDER BY version_number DESC LIMIT ? OFFSET ?",
        )
        .bind(model_id.to_string())
        .bind(page.page_size() as i64)
        .bind(page.offset() as i64)
        .fetch_all(self.pool())
        .await?;
        let items = rows
            .iter()
            .map(version_from_row)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Page::new(items, page, total as u64))
    }

    async fn update_version(&self, version: &ModelVersion) -> anyhow::Result<()> {
        // Terminal states are write-once: a Ready/Failed row never leaves it
        let result = sqlx::query(
            "UPDATE model_versions SET status = ?, wexbim_file_id = ?, \
             properties_file_id = ?, error_message = ?, processed_at = ? \
             WHERE id = ? AND status NOT IN ('ready', 'failed')",
        )
        .bind(version.status().to_string())
        .bind(version.wexbim_file_id().map(|f| f.to_string()))
        .bind(version.properties_file_id().map(|f| f.to_string()))
        .bind(version.error_message())
        .bind(version.processed_at().map(|t| t.to_rfc3339()))
        .bind(version.id().to_string())
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            anyhow::bail!(
                "Version {} is terminal or missing and was not updated",
                version.id()
            );
        }
        Ok(())
    }

    async fn replace_elements(
        &self,
        version_id: VersionId,
        elements: &[ElementProperties],
    ) -> anyhow::Result<()> {
        let mut tx = self.pool().begin().await?;
        sqlx::query("DELETE FROM ifc_elements WHERE model_version_id = ?")
            .bind(version_id.to_string())
            .execute(&mut *tx)
            .await?;

        for entry in elements {
            let element = &entry.element;
            sqlx::query(
                "INSERT INTO ifc_elements \
                 (id, model_version_id, entity_label, global_id, type_name, name) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(element.id.to_string())
            .bind(version_id.to_string())
            .bind(element.entity_label)
            .bind(element.global_id.as_deref())
            .bind(&element.type_name)
            .bind(element.name.as_deref())
            .execute(&mut *tx)
            .await?;

            for pset in &entry.property_sets {
                sqlx::query(
                    "INSERT INTO ifc_property_sets (id, element_id, name) VALUES (?, ?, ?)",
                )
                .bind(pset.id.to_string())
                .bind(element.id.to_string())
                .bind(&pset.name)
                .execute(&mut *tx)
                .await?;
                for prop in &pset.properties {
                    sqlx::query(
                        "INSERT INTO ifc_properties (id, property_set_id, name, value, unit) \
                         VALUES (?, ?, ?, ?, ?)",
                    )
                    .bind(prop.id.to_string())
                    .bind(pset.id.to_string())
                    .bind(&prop.name)
                    .bind(prop.value.as_deref())
                    .bind(prop.unit.as_deref())
                    .execute(&mut *tx)
                    .await?;
                }
            }

            for qset in &entry.quantity_sets {
                sqlx::query(
                    "INSERT INTO ifc_quantity_sets (id, element_id, name) VALUES (?, ?, ?)",
                )
                .bind(qset.id.to_string())
                .bind(element.id.to_string())
                .bind(&qset.name)
                .execute(&mut *tx)
                .await?;
                for quantity in &qset.quantities {
                    sqlx::query(
                        "INSERT INTO ifc_quantities (id, quantity_set_id, name, value, unit) \
                         VALUES (?, ?, ?, ?, ?)",
                    )
                    .bind(quantity.id.to_string())
                    .bind(qset.id.to_string())
                    .bind(&quantity.name)
                    .bind(quantity.value)
                    .bind(quantity.unit.as_deref())
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn query_elements(
        &self,
        version_id: VersionId,
        filter: &PropertyFilter,
        page: PageRequest,
    ) -> anyhow::Result<Page<IfcElement>> {
        let mut conditions = vec!["e.model_version_id = ?".to_string()];
        if filter.entity_label.is_some() {
            conditions.push("e.entity_label = ?".to_string());
        }
        if filter.global_id.is_some() {
            conditions.push("e.global_id = ?".to_string());
        }
        if filter.type_name.is_some() {
            conditions.push("LOWER(e.type_name) LIKE ?".to_string());
        }
        if filter.name.is_some() {
            conditions.push("LOWER(e.name) LIKE ?".to_string());
        }
        if filter.property_set_name.is_some() {
            conditions.push(
                "EXISTS (SELECT 1 FROM ifc_property_sets s \
                 WHERE s.element_id = e.id AND LOWER(s.name) LIKE ?)"
                    .to_string(),
            );
        }
        let where_clause = conditions.join(" AND ");

        // The same bind order in both queries, matching the WHERE builder
        let like = |s: &str| format!("%{}%", s.to_lowercase());
        let binds: Vec<String> = {
            let mut binds = vec![version_id.to_string()];
            if let Some(label) = filter.entity_label {
                binds.push(label.to_string());
            }
            if let Some(ref global_id) = filter.global_id {
                binds.push(global_id.clone());
            }
            if let Some(ref type_name) = filter.type_name {
                binds.push(like(type_name));
            }
            if let Some(ref name) = filter.name {
                binds.push(like(name));
            }
            if let Some(ref pset) = filter.property_set_name {
                binds.push(like(pset));
            }
            binds
        };

        let count_sql =
            format!("SELECT COUNT(*) AS n FROM ifc_elements e WHERE {where_clause}");
        let mut count_query = sqlx::query(&count_sql);
        for value in &binds {
            count_query = count_query.bind(value.clone());
        }
        let total: i64 = count_query.fetch_one(self.pool()).await?.get("n");

        let list_sql = format!(
            "SELECT e.* FROM ifc_elements e WHERE {where_clause} \
             ORDER BY e.entity_label ASC LIMIT ? OFFSET ?"
        );
        let mut list_query = sqlx::query(&list_sql);
        for value in &binds {
            list_query = list_query.bind(value.clone());
        }
        let rows = list_query
            .bind(page.page_size() as i64)
            .bind(page.offset() as i64)
            .fetch_all(self.pool())
            .await?;
        let items = rows
            .iter()
            .map(element_from_row)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Page::new(items, page, total as u64))
    }

    async fn get_element_properties(
        &self,
        version_id: VersionId,
        element_id: UniqueId,
    ) -> anyhow::Result<Option<ElementProperties>> {
        let Some(row) =
            sqlx::query("SELECT * FROM ifc_elements WHERE id = ? AND model_version_id = ?")
                .bind(element_id.to_string())
                .bind(version_id.to_string())
                .fetch_optional(self.pool())
                .await?
        else {
            return Ok(None);
        };
        let element = element_from_row(&row)?;

        let mut property_sets = Vec::new();
        let pset_rows =
            sqlx::query("SELECT * FROM ifc_property_sets WHERE element_id = ? ORDER BY name")
                .bind(element_id.to_string())
                .fetch_all(self.pool())
                .await?;
        for pset_row in &pset_rows {
            let pset_id: UniqueId = pset_row.get::<String, _>("id").parse()?;
            let prop_rows = sqlx::query(
                "SELECT * FROM ifc_properties WHERE property_set_id = ? ORDER BY name",
            )
            .bind(pset_id.to_string())
            .fetch_all(self.pool())
            .await?;
            let properties = prop_rows
                .iter()
                .map(|r| {
                    Ok(IfcProperty {
                        id: r.get::<String, _>("id").parse()?,
                        name: r.get("name"),
                        value: r.get("value"),
                        unit: r.get("unit"),
                    })
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            property_sets.push(IfcPropertySet {
                id: pset_id,
                element_id,
                name: pset_row.get("name"),
                properties,
            });
        }

        let mut quantity_sets = Vec::new();
        let qset_rows =
            sqlx::query("SELECT * FROM ifc_quantity_sets WHERE element_id = ? ORDER BY name")
                .bind(element_id.to_string())
                .fetch_all(self.pool())
                .await?;
        for qset_row in &qset_rows {
            let qset_id: UniqueId = qset_row.get::<String, _>("id").parse()?;
            let quantity_rows = sqlx::query(
                "SELECT * FROM ifc_quantities WHERE quantity_set_id = ? ORDER BY name",
            )
            .bind(qset_id.to_string())
            .fetch_all(self.pool())
            .await?;
            let quantities = quantity_rows
                .iter()
                .map(|r| {
                    Ok(IfcQuantity {
                        id: r.get::<String, _>("id").parse()?,
                        name: r.get("name"),
                        value: r.get("value"),
                        unit: r.get("unit"),
                    })
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            quantity_sets.push(IfcQuantitySet {
                id: qset_id,
                element_id,
                name: qset_row.get("name"),
                quantities,
            });
        }

        Ok(Some(ElementProperties {
            element,
            property_sets,
            quantity_sets,
        }))
    }
}
