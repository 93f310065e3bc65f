//! Subscription packages shown on the pricing page

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    /// free, pro, premium or enterprise
    pub tier: String,
    pub price_monthly: Option<Decimal>,
    pub price_yearly: Option<Decimal>,
    pub currency: String,
    pub credits_included: Option<Decimal>,
    pub is_active: bool,
    pub is_featured: bool,
    pub sort_order: i32,
    pub metadata: JsonValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageFeature {
    pub id: Uuid,
    pub package_id: Uuid,
    pub feature_key: String,
    pub feature_label: String,
    /// Label with `{{variable_key}}` placeholders
    pub feature_template: String,
    pub display_order: i32,
    pub is_highlighted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageVariable {
    pub id: Uuid,
    pub package_id: Uuid,
    pub variable_key: String,
    pub variable_value: String,
    /// text, number, boolean or currency
    pub variable_type: String,
}

/// A package with its features and variables attached
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageWithDetails {
    #[serde(flatten)]
    pub package: Package,
    pub features: Vec<PackageFeature>,
    pub variables: Vec<PackageVariable>,
}

/// Substitute every `{{key}}` in `template` with the matching variable value.
///
/// Unknown placeholders are left untouched.
pub fn render_feature_template(template: &str, variables: &[PackageVariable]) -> String {
    variables.iter().fold(template.to_string(), |rendered, variable| {
        let placeholder = format!("{{{{{}}}}}", variable.variable_key);
        rendered.replace(&placeholder, &variable.variable_value)
    })
}

impl PackageWithDetails {
    /// Attach the features and variables belonging to `package`
    pub fn assemble(
        package: Package,
        features: &[PackageFeature],
        variables: &[PackageVariable],
    ) -> Self {
        let mut own_features: Vec<PackageFeature> = features
            .iter()
            .filter(|f| f.package_id == package.id)
            .cloned()
            .collect();
        own_features.sort_by_key(|f| f.display_order);

        let own_variables = variables
            .iter()
            .filter(|v| v.package_id == package.id)
            .cloned()
            .collect();

        Self {
            package,
            features: own_features,
            variables: own_variables,
        }
    }

    /// Feature labels with variables substituted, in display order
    pub fn rendered_features(&self) -> Vec<String> {
        self.features
            .iter()
            .map(|f| render_feature_template(&f.feature_template, &self.variables))
            .collect()
    }
}
