//! Package repository implementation

use async_trait::async_trait;
use dnai_core::{
    models::{Package, PackageFeature, PackageVariable},
    traits::PackageRepository,
    AppError, AppResult,
};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

const PACKAGE_COLUMNS: &str = r#"
    id, name, slug, description, tier,
    price_monthly, price_yearly,
    COALESCE(currency, 'USD') AS currency,
    credits_included, is_active,
    COALESCE(is_featured, FALSE) AS is_featured,
    COALESCE(sort_order, 0) AS sort_order,
    COALESCE(metadata, '{}'::jsonb) AS metadata
"#;

/// PostgreSQL implementation of PackageRepository
pub struct PgPackageRepository {
    pool: PgPool,
}

impl PgPackageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PackageRepository for PgPackageRepository {
    #[instrument(skip(self))]
    async fn list_active(&self) -> AppResult<Vec<Package>> {
        let query = format!(
            "SELECT {} FROM packages WHERE is_active = TRUE ORDER BY sort_order ASC",
            PACKAGE_COLUMNS
        );

        let rows = sqlx::query_as::<sqlx::Postgres, PackageRow>(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error listing packages: {}", e);
                AppError::Database(format!("Failed to fetch packages: {}", e))
            })?;

        debug!("Found {} active packages", rows.len());
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Package>> {
        let query = format!("SELECT {} FROM packages WHERE id = $1", PACKAGE_COLUMNS);

        let row = sqlx::query_as::<sqlx::Postgres, PackageRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding package {}: {}", id, e);
                AppError::Database(format!("Failed to find package: {}", e))
            })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn list_features(&self, package_ids: &[Uuid]) -> AppResult<Vec<PackageFeature>> {
        if package_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<sqlx::Postgres, FeatureRow>(
            r#"
            SELECT
                id, package_id, feature_key, feature_label, feature_template,
                COALESCE(display_order, 0) AS display_order,
                COALESCE(is_highlighted, FALSE) AS is_highlighted
            FROM package_features
            WHERE package_id = ANY($1)
            ORDER BY display_order ASC
            "#,
        )
        .bind(package_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing package features: {}", e);
            AppError::Database(format!("Failed to fetch package features: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn list_variables(&self, package_ids: &[Uuid]) -> AppResult<Vec<PackageVariable>> {
        if package_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<sqlx::Postgres, VariableRow>(
            r#"
            SELECT id, package_id, variable_key, variable_value,
                   COALESCE(variable_type, 'text') AS variable_type
            FROM package_variables
            WHERE package_id = ANY($1)
            "#,
        )
        .bind(package_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing package variables: {}", e);
            AppError::Database(format!("Failed to fetch package variables: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PackageRow {
    id: Uuid,
    name: String,
    slug: String,
    description: Option<String>,
    tier: String,
    price_monthly: Option<Decimal>,
    price_yearly: Option<Decimal>,
    currency: String,
    credits_included: Option<Decimal>,
    is_active: bool,
    is_featured: bool,
    sort_order: i32,
    metadata: JsonValue,
}

impl From<PackageRow> for Package {
    fn from(row: PackageRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            tier: row.tier,
            price_monthly: row.price_monthly,
            price_yearly: row.price_yearly,
            currency: row.currency,
            credits_included: row.credits_included,
            is_active: row.is_active,
            is_featured: row.is_featured,
            sort_order: row.sort_order,
            metadata: row.metadata,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct FeatureRow {
    id: Uuid,
    package_id: Uuid,
    feature_key: String,
    feature_label: String,
    feature_template: String,
    display_order: i32,
    is_highlighted: bool,
}

impl From<FeatureRow> for PackageFeature {
    fn from(row: FeatureRow) -> Self {
        Self {
            id: row.id,
            package_id: row.package_id,
            feature_key: row.feature_key,
            feature_label: row.feature_label,
            feature_template: row.feature_template,
            display_order: row.display_order,
            is_highlighted: row.is_highlighted,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct VariableRow {
    id: Uuid,
    package_id: Uuid,
    variable_key: String,
    variable_value: String,
    variable_type: String,
}

impl From<VariableRow> for PackageVariable {
    fn from(row: VariableRow) -> Self {
        Self {
            id: row.id,
            package_id: row.package_id,
            variable_key: row.variable_key,
            variable_value: row.variable_value,
            variable_type: row.variable_type,
        }
    }
}
