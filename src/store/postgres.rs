//! `Store` backed by Postgres via `sqlx`. JSON columns round-trip as
//! `serde_json::Value`/`sqlx::types::Json` directly (§3: configuration and
//! assets are schema-free JSONB); `sqlx::query_as` is used over the
//! `query!` macro family since no live database is available at build time
//! in this workspace.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

use super::models::{
    ConfigurationTemplate, Jurisdiction, JurisdictionEdits, JurisdictionType, NewJurisdiction, UserdataTemplate,
};
use super::{AssetsMerge, Store};
use crate::errors::StoreError;

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(PostgresStore { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(sqlx::Error::Migrate(Box::new(e))))
    }
}

#[derive(FromRow)]
struct JurisdictionTypeRow {
    id: i64,
    name: String,
    description: String,
    parent_id: Option<i64>,
}

impl From<JurisdictionTypeRow> for JurisdictionType {
    fn from(row: JurisdictionTypeRow) -> Self {
        JurisdictionType {
            id: row.id,
            name: row.name,
            description: row.description,
            parent_id: row.parent_id,
        }
    }
}

#[derive(FromRow)]
struct ConfigurationTemplateRow {
    id: i64,
    name: String,
    configuration: Json<Value>,
    default_: bool,
    jurisdiction_type_id: i64,
}

impl From<ConfigurationTemplateRow> for ConfigurationTemplate {
    fn from(row: ConfigurationTemplateRow) -> Self {
        ConfigurationTemplate {
            id: row.id,
            name: row.name,
            configuration: row.configuration.0,
            default: row.default_,
            jurisdiction_type_id: row.jurisdiction_type_id,
        }
    }
}

#[derive(FromRow)]
struct UserdataTemplateRow {
    id: i64,
    name: String,
    role: String,
    content: String,
}

impl TryFrom<UserdataTemplateRow> for UserdataTemplate {
    type Error = StoreError;

    fn try_from(row: UserdataTemplateRow) -> Result<Self, StoreError> {
        let role = row
            .role
            .parse()
            .map_err(|_| StoreError::NotFound { kind: "UserdataTemplate.role", id: row.id })?;
        Ok(UserdataTemplate { id: row.id, name: row.name, role, content: row.content })
    }
}

#[derive(FromRow)]
struct JurisdictionRow {
    id: i64,
    name: String,
    created_on: DateTime<Utc>,
    active: bool,
    configuration: Json<Value>,
    assets: Option<Json<Value>>,
    metadata: Option<Json<Value>>,
    jurisdiction_type_id: i64,
    parent_id: Option<i64>,
}

impl TryFrom<JurisdictionRow> for Jurisdiction {
    type Error = StoreError;

    fn try_from(row: JurisdictionRow) -> Result<Self, StoreError> {
        let metadata = match row.metadata {
            Some(Json(value)) => serde_json::from_value(value).ok(),
            None => None,
        };
        Ok(Jurisdiction {
            id: row.id,
            name: row.name,
            created_on: row.created_on,
            active: row.active,
            configuration: row.configuration.0,
            assets: row.assets.map(|Json(v)| v),
            metadata,
            jurisdiction_type_id: row.jurisdiction_type_id,
            parent_id: row.parent_id,
        })
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn list_jurisdiction_types(&self) -> Result<Vec<JurisdictionType>, StoreError> {
        let rows: Vec<JurisdictionTypeRow> =
            sqlx::query_as("SELECT id, name, description, parent_id FROM jurisdiction_type ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_jurisdiction_type(&self, id: i64) -> Result<JurisdictionType, StoreError> {
        let row: Option<JurisdictionTypeRow> =
            sqlx::query_as("SELECT id, name, description, parent_id FROM jurisdiction_type WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Into::into).ok_or(StoreError::NotFound { kind: "JurisdictionType", id })
    }

    async fn list_configuration_templates(&self) -> Result<Vec<ConfigurationTemplate>, StoreError> {
        let rows: Vec<ConfigurationTemplateRow> = sqlx::query_as(
            r#"SELECT id, name, configuration, "default" AS default_, jurisdiction_type_id
               FROM configuration_template ORDER BY id"#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_configuration_template(&self, id: i64) -> Result<ConfigurationTemplate, StoreError> {
        let row: Option<ConfigurationTemplateRow> = sqlx::query_as(
            r#"SELECT id, name, configuration, "default" AS default_, jurisdiction_type_id
               FROM configuration_template WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Into::into).ok_or(StoreError::NotFound { kind: "ConfigurationTemplate", id })
    }

    async fn get_userdata_template_by_name(&self, name: &str) -> Result<UserdataTemplate, StoreError> {
        let row: Option<UserdataTemplateRow> =
            sqlx::query_as("SELECT id, name, role, content FROM userdata_template WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        match row {
            Some(row) => row.try_into(),
            None => Err(StoreError::NotFound { kind: "UserdataTemplate", id: 0 }),
        }
    }

    async fn list_jurisdictions(&self) -> Result<Vec<Jurisdiction>, StoreError> {
        let rows: Vec<JurisdictionRow> = sqlx::query_as(
            r#"SELECT id, name, created_on, active, configuration, assets, metadata,
                      jurisdiction_type_id, parent_id
               FROM jurisdiction ORDER BY id"#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn get_jurisdiction(&self, id: i64) -> Result<Jurisdiction, StoreError> {
        let row: Option<JurisdictionRow> = sqlx::query_as(
            r#"SELECT id, name, created_on, active, configuration, assets, metadata,
                      jurisdiction_type_id, parent_id
               FROM jurisdiction WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => row.try_into(),
            None => Err(StoreError::NotFound { kind: "Jurisdiction", id }),
        }
    }

    async fn jurisdiction_name_exists(&self, name: &str) -> Result<bool, StoreError> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM jurisdiction WHERE name = $1)")
                .bind(name)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn children(&self, parent_id: i64) -> Result<Vec<Jurisdiction>, StoreError> {
        let rows: Vec<JurisdictionRow> = sqlx::query_as(
            r#"SELECT id, name, created_on, active, configuration, assets, metadata,
                      jurisdiction_type_id, parent_id
               FROM jurisdiction WHERE parent_id = $1"#,
        )
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn create_jurisdiction(&self, new: NewJurisdiction) -> Result<Jurisdiction, StoreError> {
        let mut tx = self.pool.begin().await?;

        let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM jurisdiction WHERE name = $1)")
            .bind(&new.name)
            .fetch_one(&mut *tx)
            .await?;
        if exists {
            return Err(StoreError::NameCollision(new.name));
        }

        let row: JurisdictionRow = sqlx::query_as(
            r#"INSERT INTO jurisdiction (name, active, configuration, jurisdiction_type_id, parent_id)
               VALUES ($1, false, $2, $3, $4)
               RETURNING id, name, created_on, active, configuration, assets, metadata,
                         jurisdiction_type_id, parent_id"#,
        )
        .bind(&new.name)
        .bind(Json(&new.configuration))
        .bind(new.jurisdiction_type_id)
        .bind(new.parent_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn edit_jurisdiction(&self, id: i64, edits: JurisdictionEdits) -> Result<Jurisdiction, StoreError> {
        let mut tx = self.pool.begin().await?;
        let current: JurisdictionRow = sqlx::query_as(
            r#"SELECT id, name, created_on, active, configuration, assets, metadata,
                      jurisdiction_type_id, parent_id
               FROM jurisdiction WHERE id = $1 FOR UPDATE"#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound { kind: "Jurisdiction", id })?;

        let name = edits.name.unwrap_or(current.name);
        let configuration = edits.configuration.unwrap_or(current.configuration.0);
        let metadata = match edits.metadata {
            Some(map) => Some(serde_json::to_value(map).expect("metadata map always serializes")),
            None => current.metadata.map(|Json(v)| v),
        };

        let row: JurisdictionRow = sqlx::query_as(
            r#"UPDATE jurisdiction SET name = $1, configuration = $2, metadata = $3
               WHERE id = $4
               RETURNING id, name, created_on, active, configuration, assets, metadata,
                         jurisdiction_type_id, parent_id"#,
        )
        .bind(&name)
        .bind(Json(&configuration))
        .bind(metadata.map(Json))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE jurisdiction SET active = $1 WHERE id = $2")
            .bind(active)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { kind: "Jurisdiction", id });
        }
        Ok(())
    }

    async fn set_assets(&self, id: i64, assets: Value) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE jurisdiction SET assets = $1 WHERE id = $2")
            .bind(Json(assets))
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { kind: "Jurisdiction", id });
        }
        Ok(())
    }

    async fn merge_assets(&self, id: i64, merge: AssetsMerge) -> Result<Jurisdiction, StoreError> {
        let mut tx = self.pool.begin().await?;

        let current: JurisdictionRow = sqlx::query_as(
            r#"SELECT id, name, created_on, active, configuration, assets, metadata,
                      jurisdiction_type_id, parent_id
               FROM jurisdiction WHERE id = $1 FOR UPDATE"#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound { kind: "Jurisdiction", id })?;

        let mut assets = current.assets.map(|Json(v)| v).unwrap_or_else(|| Value::Object(Default::default()));
        merge(&mut assets);

        let row: JurisdictionRow = sqlx::query_as(
            r#"UPDATE jurisdiction SET assets = $1 WHERE id = $2
               RETURNING id, name, created_on, active, configuration, assets, metadata,
                         jurisdiction_type_id, parent_id"#,
        )
        .bind(Json(&assets))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }
}
