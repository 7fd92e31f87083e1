use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{DiscountType, Offer, OfferTarget};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "offers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub name: String,
    pub discount_type: String,
    pub discount_value: Decimal,
    pub max_discount: Option<Decimal>,
    pub min_purchase: Decimal,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub is_active: bool,
    /// "products" or "categories"
    pub target_kind: String,
    /// JSON array of product or category ids
    pub target_ids: Json,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Offer {
    type Error = ServiceError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let discount_type = DiscountType::from_str(&model.discount_type).map_err(|_| {
            ServiceError::InternalError(format!(
                "offer {} has unknown discount type '{}'",
                model.id, model.discount_type
            ))
        })?;
        let ids: Vec<Uuid> = serde_json::from_value(model.target_ids).map_err(|e| {
            ServiceError::InternalError(format!("offer {} has unreadable targets: {}", model.id, e))
        })?;

        Ok(Offer {
            id: model.id,
            name: model.name,
            discount_type,
            discount_value: model.discount_value,
            max_discount: model.max_discount,
            min_purchase: model.min_purchase,
            valid_from: model.valid_from,
            valid_until: model.valid_until,
            is_active: model.is_active,
            target: OfferTarget::from_parts(&model.target_kind, ids)?,
            created_at: model.created_at,
        })
    }
}

impl TryFrom<&Offer> for ActiveModel {
    type Error = ServiceError;

    fn try_from(offer: &Offer) -> Result<Self, Self::Error> {
        use sea_orm::ActiveValue::Set;

        let target_ids = serde_json::to_value(offer.target.ids())
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;

        Ok(ActiveModel {
            id: Set(offer.id),
            name: Set(offer.name.clone()),
            discount_type: Set(offer.discount_type.to_string()),
            discount_value: Set(offer.discount_value),
            max_discount: Set(offer.max_discount),
            min_purchase: Set(offer.min_purchase),
            valid_from: Set(offer.valid_from),
            valid_until: Set(offer.valid_until),
            is_active: Set(offer.is_active),
            target_kind: Set(offer.target.kind().to_string()),
            target_ids: Set(target_ids),
            created_at: Set(offer.created_at),
        })
    }
}
