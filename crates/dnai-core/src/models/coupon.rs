//! Coupon codes and their usage records

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use uuid::Uuid;

/// How the discount value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    /// `discount_value` is a percentage of the purchase amount
    Percentage,
    /// `discount_value` is a flat amount
    Fixed,
}

impl DiscountType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "percentage" => Some(DiscountType::Percentage),
            "fixed" => Some(DiscountType::Fixed),
            _ => None,
        }
    }
}

/// Purchase category a coupon is requested for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CouponCategory {
    Subscriptions,
    #[default]
    Purchases,
}

impl CouponCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CouponCategory::Subscriptions => "subscriptions",
            CouponCategory::Purchases => "purchases",
        }
    }
}

impl fmt::Display for CouponCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A coupon code row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub minimum_purchase_amount: Option<Decimal>,
    pub maximum_discount_amount: Option<Decimal>,
    pub currency: String,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    /// Global redemption cap; `None` or zero means unlimited
    pub usage_limit: Option<i32>,
    pub usage_count: i32,
    pub per_user_limit: i32,
    pub is_active: bool,
    /// `None` or `"all"` applies to every category
    pub applicable_to: Option<String>,
    pub metadata: JsonValue,
}

impl Coupon {
    /// Canonical form codes are stored and looked up in
    pub fn normalize_code(code: &str) -> String {
        code.trim().to_uppercase()
    }

    /// Whether the coupon may discount the given category
    pub fn applies_to(&self, category: CouponCategory) -> bool {
        match self.applicable_to.as_deref() {
            None | Some("") | Some("all") => true,
            Some(other) => other == category.as_str(),
        }
    }

    pub fn global_limit_reached(&self) -> bool {
        match self.usage_limit {
            Some(limit) if limit > 0 => self.usage_count >= limit,
            _ => false,
        }
    }
}

impl Default for Coupon {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            code: String::new(),
            description: None,
            discount_type: DiscountType::Percentage,
            discount_value: Decimal::ZERO,
            minimum_purchase_amount: None,
            maximum_discount_amount: None,
            currency: "USD".to_string(),
            valid_from: DateTime::<Utc>::UNIX_EPOCH,
            valid_until: None,
            usage_limit: None,
            usage_count: 0,
            per_user_limit: 1,
            is_active: true,
            applicable_to: None,
            metadata: JsonValue::Null,
        }
    }
}

/// Data for inserting a coupon usage row
#[derive(Debug, Clone)]
pub struct CouponUsageData {
    pub coupon_id: Uuid,
    pub user_id: Uuid,
    pub discount_amount: Decimal,
    pub invoice_id: Option<Uuid>,
    pub purchase_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_code() {
        assert_eq!(Coupon::normalize_code("  save20 "), "SAVE20");
    }

    #[test]
    fn test_applies_to() {
        let mut coupon = Coupon::default();
        assert!(coupon.applies_to(CouponCategory::Purchases));

        coupon.applicable_to = Some("all".to_string());
        assert!(coupon.applies_to(CouponCategory::Subscriptions));

        coupon.applicable_to = Some("subscriptions".to_string());
        assert!(coupon.applies_to(CouponCategory::Subscriptions));
        assert!(!coupon.applies_to(CouponCategory::Purchases));

        coupon.applicable_to = Some("specific_product".to_string());
        assert!(!coupon.applies_to(CouponCategory::Purchases));
    }

    #[test]
    fn test_global_limit() {
        let mut coupon = Coupon {
            usage_limit: Some(0),
            usage_count: 50,
            ..Default::default()
        };
        assert!(!coupon.global_limit_reached());

        coupon.usage_limit = Some(50);
        assert!(coupon.global_limit_reached());

        coupon.usage_count = 49;
        assert!(!coupon.global_limit_reached());
    }
}
