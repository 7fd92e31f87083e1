use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DiscountType;
use crate::{errors::ServiceError, money::round_money};

/// Canonical form of a coupon code: trimmed and uppercased.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// A shopper-entered, usage-limited cart discount.
///
/// Valid exactly when it is active, `now` lies in `[valid_from, valid_until]`
/// and `used_count < usage_limit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    #[serde(default)]
    pub min_purchase: Decimal,
    #[serde(default)]
    pub max_discount: Option<Decimal>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub usage_limit: i32,
    #[serde(default)]
    pub used_count: i32,
    pub is_active: bool,
}

impl Coupon {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.check_validity(now).is_ok()
    }

    /// Active and inside the validity window, ignoring usage.
    pub fn check_window(&self, now: DateTime<Utc>) -> Result<(), ServiceError> {
        if !self.is_active {
            return Err(ServiceError::CouponInactive(self.code.clone()));
        }
        if now < self.valid_from {
            return Err(ServiceError::CouponNotStarted {
                code: self.code.clone(),
                starts_at: self.valid_from,
            });
        }
        if now > self.valid_until {
            return Err(ServiceError::CouponExpired {
                code: self.code.clone(),
                expired_at: self.valid_until,
            });
        }
        Ok(())
    }

    /// Reports the first reason the coupon cannot be used right now.
    pub fn check_validity(&self, now: DateTime<Utc>) -> Result<(), ServiceError> {
        self.check_window(now)?;
        if self.used_count >= self.usage_limit {
            return Err(ServiceError::CouponUsageLimitReached(self.code.clone()));
        }
        Ok(())
    }

    /// Discount this coupon grants on `subtotal`.
    ///
    /// Fails rather than returning zero when the coupon cannot be used, so a
    /// caller can never mistake a rejected coupon for a free one.
    pub fn calculate_discount(
        &self,
        subtotal: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Decimal, ServiceError> {
        self.check_validity(now)?;
        if subtotal < self.min_purchase {
            return Err(ServiceError::MinimumPurchaseNotMet {
                required: self.min_purchase,
                subtotal,
            });
        }
        Ok(bounded_discount(
            self.discount_type,
            self.discount_value,
            self.max_discount,
            subtotal,
        ))
    }

    /// Freezes the terms in force at apply time.
    pub fn snapshot(&self, applied_at: DateTime<Utc>) -> CouponSnapshot {
        CouponSnapshot {
            coupon_id: self.id,
            code: self.code.clone(),
            discount_type: self.discount_type,
            discount_value: self.discount_value,
            max_discount: self.max_discount,
            min_purchase: self.min_purchase,
            applied_at,
        }
    }

    /// Checks the admin-entered terms.
    pub fn validate_terms(&self) -> Result<(), ServiceError> {
        if normalize_code(&self.code).is_empty() {
            return Err(ServiceError::ValidationError(
                "Coupon code is required".to_string(),
            ));
        }
        if self.discount_value < Decimal::ZERO || self.min_purchase < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Coupon amounts cannot be negative".to_string(),
            ));
        }
        if matches!(self.max_discount, Some(cap) if cap < Decimal::ZERO) {
            return Err(ServiceError::ValidationError(
                "Coupon max discount cannot be negative".to_string(),
            ));
        }
        if self.usage_limit < 1 {
            return Err(ServiceError::ValidationError(
                "Coupon usage limit must be at least 1".to_string(),
            ));
        }
        if self.used_count < 0 {
            return Err(ServiceError::ValidationError(
                "Coupon used count cannot be negative".to_string(),
            ));
        }
        if self.valid_until < self.valid_from {
            return Err(ServiceError::ValidationError(
                "Coupon must expire after it starts".to_string(),
            ));
        }
        Ok(())
    }
}

/// Coupon terms copied onto a cart or order when the coupon was applied.
///
/// Later edits to the live coupon do not change these values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouponSnapshot {
    pub coupon_id: Uuid,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub max_discount: Option<Decimal>,
    pub min_purchase: Decimal,
    pub applied_at: DateTime<Utc>,
}

impl CouponSnapshot {
    /// Discount under the frozen terms, or `None` once the subtotal has fallen
    /// below the minimum purchase.
    pub fn discount_for(&self, subtotal: Decimal) -> Option<Decimal> {
        if subtotal < self.min_purchase {
            return None;
        }
        Some(bounded_discount(
            self.discount_type,
            self.discount_value,
            self.max_discount,
            subtotal,
        ))
    }
}

fn bounded_discount(
    discount_type: DiscountType,
    value: Decimal,
    max_discount: Option<Decimal>,
    subtotal: Decimal,
) -> Decimal {
    let subtotal = subtotal.max(Decimal::ZERO);
    let discount = discount_type
        .raw_discount(subtotal, value, max_discount)
        .max(Decimal::ZERO)
        .min(subtotal);
    round_money(discount)
}
