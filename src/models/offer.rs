use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DiscountType;
use crate::errors::ServiceError;

/// What an offer applies to. An offer targets products or categories, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "ids", rename_all = "snake_case")]
pub enum OfferTarget {
    Products(Vec<Uuid>),
    Categories(Vec<Uuid>),
}

impl OfferTarget {
    pub fn ids(&self) -> &[Uuid] {
        match self {
            OfferTarget::Products(ids) | OfferTarget::Categories(ids) => ids,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OfferTarget::Products(_) => "products",
            OfferTarget::Categories(_) => "categories",
        }
    }

    pub fn from_parts(kind: &str, ids: Vec<Uuid>) -> Result<Self, ServiceError> {
        match kind {
            "products" => Ok(OfferTarget::Products(ids)),
            "categories" => Ok(OfferTarget::Categories(ids)),
            other => Err(ServiceError::InternalError(format!(
                "unknown offer target kind '{}'",
                other
            ))),
        }
    }
}

/// Admin-defined, time-bounded discount on products or categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: Uuid,
    pub name: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    #[serde(default)]
    pub max_discount: Option<Decimal>,
    #[serde(default)]
    pub min_purchase: Decimal,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub is_active: bool,
    pub target: OfferTarget,
    /// Discovery order for equal discounts.
    pub created_at: DateTime<Utc>,
}

impl Offer {
    /// Active and inside its validity window (both ends inclusive).
    pub fn is_eligible_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.valid_from <= now && now <= self.valid_until
    }

    pub fn targets_product(&self, product_id: Uuid) -> bool {
        matches!(&self.target, OfferTarget::Products(ids) if ids.contains(&product_id))
    }

    pub fn targets_category(&self, category_id: Uuid) -> bool {
        matches!(&self.target, OfferTarget::Categories(ids) if ids.contains(&category_id))
    }

    /// Discount this offer gives on `base_price`; never more than the price.
    pub fn discount_for(&self, base_price: Decimal) -> Decimal {
        if base_price <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        self.discount_type
            .raw_discount(base_price, self.discount_value, self.max_discount)
            .min(base_price)
            .max(Decimal::ZERO)
    }

    /// Checks the admin-entered terms.
    pub fn validate_terms(&self) -> Result<(), ServiceError> {
        if self.name.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Offer name is required".to_string(),
            ));
        }
        if self.discount_value < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Offer discount value cannot be negative".to_string(),
            ));
        }
        if self.discount_type == DiscountType::Percentage && self.discount_value > Decimal::ONE_HUNDRED {
            return Err(ServiceError::ValidationError(
                "Percentage offers cannot exceed 100%".to_string(),
            ));
        }
        if matches!(self.max_discount, Some(cap) if cap < Decimal::ZERO) {
            return Err(ServiceError::ValidationError(
                "Offer max discount cannot be negative".to_string(),
            ));
        }
        if self.min_purchase < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Offer minimum purchase cannot be negative".to_string(),
            ));
        }
        if self.valid_until < self.valid_from {
            return Err(ServiceError::ValidationError(
                "Offer must end after it starts".to_string(),
            ));
        }
        if self.target.ids().is_empty() {
            return Err(ServiceError::ValidationError(
                "Offer must target at least one product or category".to_string(),
            ));
        }
        Ok(())
    }
}
