//! Package DTOs

use dnai_core::models::{PackageVariable, PackageWithDetails};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct PackageFeatureResponse {
    pub key: String,
    pub label: String,
    pub text: String,
    pub is_highlighted: bool,
}

/// A package card of the pricing page
#[derive(Debug, Clone, Serialize)]
pub struct PackageResponse {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub tier: String,
    pub price_monthly: Option<Decimal>,
    pub price_yearly: Option<Decimal>,
    pub currency: String,
    pub credits_included: Option<Decimal>,
    pub is_featured: bool,
    pub features: Vec<PackageFeatureResponse>,
    pub variables: Vec<PackageVariable>,
}

impl From<PackageWithDetails> for PackageResponse {
    fn from(details: PackageWithDetails) -> Self {
        let texts = details.rendered_features();
        let features = details
            .features
            .iter()
            .zip(texts)
            .map(|(feature, text)| PackageFeatureResponse {
                key: feature.feature_key.clone(),
                label: feature.feature_label.clone(),
                text,
                is_highlighted: feature.is_highlighted,
            })
            .collect();

        let package = details.package;
        Self {
            id: package.id,
            name: package.name,
            slug: package.slug,
            description: package.description,
            tier: package.tier,
            price_monthly: package.price_monthly,
            price_yearly: package.price_yearly,
            currency: package.currency,
            credits_included: package.credits_included,
            is_featured: package.is_featured,
            features,
            variables: details.variables,
        }
    }
}
