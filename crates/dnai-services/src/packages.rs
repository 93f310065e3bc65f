//! Pricing packages with their features and variables

use dnai_core::{
    models::{Package, PackageWithDetails},
    traits::PackageRepository,
    AppError, AppResult,
};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

pub struct PackageCatalog<R: PackageRepository> {
    package_repo: Arc<R>,
}

impl<R: PackageRepository> PackageCatalog<R> {
    pub fn new(package_repo: Arc<R>) -> Self {
        Self { package_repo }
    }

    /// Active packages in sort order, details attached
    #[instrument(skip(self))]
    pub async fn list(&self) -> AppResult<Vec<PackageWithDetails>> {
        let packages = self.package_repo.list_active().await?;
        if packages.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = packages.iter().map(|p| p.id).collect();
        let (features, variables) = tokio::try_join!(
            self.package_repo.list_features(&ids),
            self.package_repo.list_variables(&ids),
        )?;

        debug!(
            "Loaded {} packages, {} features, {} variables",
            packages.len(),
            features.len(),
            variables.len()
        );

        Ok(packages
            .into_iter()
            .map(|p| PackageWithDetails::assemble(p, &features, &variables))
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> AppResult<PackageWithDetails> {
        let package: Package = self
            .package_repo
            .find_by_id(id)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| AppError::PackageNotFound(id.to_string()))?;

        let ids = [package.id];
        let (features, variables) = tokio::try_join!(
            self.package_repo.list_features(&ids),
            self.package_repo.list_variables(&ids),
        )?;

        Ok(PackageWithDetails::assemble(package, &features, &variables))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dnai_core::models::{PackageFeature, PackageVariable};
    use serde_json::Value as JsonValue;

    struct MockPackageRepository {
        packages: Vec<Package>,
        features: Vec<PackageFeature>,
        variables: Vec<PackageVariable>,
    }

    #[async_trait]
    impl PackageRepository for MockPackageRepository {
        async fn list_active(&self) -> AppResult<Vec<Package>> {
            let mut active: Vec<Package> =
                self.packages.iter().filter(|p| p.is_active).cloned().collect();
            active.sort_by_key(|p| p.sort_order);
            Ok(active)
        }

        async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Package>> {
            Ok(self.packages.iter().find(|p| p.id == id).cloned())
        }

        async fn list_features(&self, package_ids: &[Uuid]) -> AppResult<Vec<PackageFeature>> {
            Ok(self
                .features
                .iter()
                .filter(|f| package_ids.contains(&f.package_id))
                .cloned()
                .collect())
        }

        async fn list_variables(&self, package_ids: &[Uuid]) -> AppResult<Vec<PackageVariable>> {
            Ok(self
                .variables
                .iter()
                .filter(|v| package_ids.contains(&v.package_id))
                .cloned()
                .collect())
        }
    }

    fn package(name: &str, sort_order: i32, is_active: bool) -> Package {
        Package {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug: name.to_lowercase(),
            description: None,
            tier: name.to_lowercase(),
            price_monthly: None,
            price_yearly: None,
            currency: "USD".to_string(),
            credits_included: None,
            is_active,
            is_featured: false,
            sort_order,
            metadata: JsonValue::Null,
        }
    }

    fn catalog() -> (PackageCatalog<MockPackageRepository>, Vec<Package>) {
        let pro = package("Pro", 2, true);
        let free = package("Free", 1, true);
        let legacy = package("Legacy", 0, false);

        let repo = MockPackageRepository {
            features: vec![PackageFeature {
                id: Uuid::new_v4(),
                package_id: pro.id,
                feature_key: "agents".to_string(),
                feature_label: "Agents".to_string(),
                feature_template: "{{agents}} voice agents".to_string(),
                display_order: 1,
                is_highlighted: true,
            }],
            variables: vec![PackageVariable {
                id: Uuid::new_v4(),
                package_id: pro.id,
                variable_key: "agents".to_string(),
                variable_value: "10".to_string(),
                variable_type: "number".to_string(),
            }],
            packages: vec![pro.clone(), free.clone(), legacy.clone()],
        };

        (PackageCatalog::new(Arc::new(repo)), vec![pro, free, legacy])
    }

    #[tokio::test]
    async fn test_list_orders_and_attaches_details() {
        let (catalog, _) = catalog();

        let packages = catalog.list().await.unwrap();

        let names: Vec<&str> = packages.iter().map(|p| p.package.name.as_str()).collect();
        assert_eq!(names, vec!["Free", "Pro"]);
        assert!(packages[0].features.is_empty());
        assert_eq!(packages[1].rendered_features(), vec!["10 voice agents"]);
    }

    #[tokio::test]
    async fn test_get_hides_inactive_and_unknown() {
        let (catalog, packages) = catalog();

        let pro = catalog.get(packages[0].id).await.unwrap();
        assert_eq!(pro.variables.len(), 1);

        assert!(matches!(
            catalog.get(packages[2].id).await,
            Err(AppError::PackageNotFound(_))
        ));
        assert!(matches!(
            catalog.get(Uuid::new_v4()).await,
            Err(AppError::PackageNotFound(_))
        ));
    }
}
