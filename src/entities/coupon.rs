use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{Coupon, DiscountType};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    pub code: String,

    pub discount_type: String, // "percentage" or "fixed"
    pub discount_value: Decimal,
    pub min_purchase: Decimal,
    pub max_discount: Option<Decimal>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub usage_limit: i32,
    pub used_count: i32,
    pub is_active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Coupon {
    type Error = ServiceError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let discount_type = DiscountType::from_str(&model.discount_type).map_err(|_| {
            ServiceError::InternalError(format!(
                "coupon {} has unknown discount type '{}'",
                model.id, model.discount_type
            ))
        })?;

        Ok(Coupon {
            id: model.id,
            code: model.code,
            discount_type,
            discount_value: model.discount_value,
            min_purchase: model.min_purchase,
            max_discount: model.max_discount,
            valid_from: model.valid_from,
            valid_until: model.valid_until,
            usage_limit: model.usage_limit,
            used_count: model.used_count,
            is_active: model.is_active,
        })
    }
}

impl From<&Coupon> for ActiveModel {
    fn from(coupon: &Coupon) -> Self {
        use sea_orm::ActiveValue::Set;

        ActiveModel {
            id: Set(coupon.id),
            code: Set(coupon.code.clone()),
            discount_type: Set(coupon.discount_type.to_string()),
            discount_value: Set(coupon.discount_value),
            min_purchase: Set(coupon.min_purchase),
            max_discount: Set(coupon.max_discount),
            valid_from: Set(coupon.valid_from),
            valid_until: Set(coupon.valid_until),
            usage_limit: Set(coupon.usage_limit),
            used_count: Set(coupon.used_count),
            is_active: Set(coupon.is_active),
        }
    }
}
