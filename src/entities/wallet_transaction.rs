use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{TransactionKind, WalletTransaction};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "wallet_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,
    pub amount: Decimal,
    pub kind: String, // "credit" or "debit"
    pub description: String,
    pub order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::wallet::Entity",
        from = "Column::UserId",
        to = "super::wallet::Column::UserId"
    )]
    Wallet,
}

impl Related<super::wallet::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Wallet.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for WalletTransaction {
    type Error = ServiceError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let kind = TransactionKind::from_str(&model.kind).map_err(|_| {
            ServiceError::InternalError(format!(
                "wallet transaction {} has unknown kind '{}'",
                model.id, model.kind
            ))
        })?;

        Ok(WalletTransaction {
            id: model.id,
            user_id: model.user_id,
            amount: model.amount,
            kind,
            description: model.description,
            order_id: model.order_id,
            created_at: model.created_at,
        })
    }
}

impl From<&WalletTransaction> for ActiveModel {
    fn from(tx: &WalletTransaction) -> Self {
        use sea_orm::ActiveValue::Set;

        ActiveModel {
            id: Set(tx.id),
            user_id: Set(tx.user_id),
            amount: Set(tx.amount),
            kind: Set(tx.kind.to_string()),
            description: Set(tx.description.clone()),
            order_id: Set(tx.order_id),
            created_at: Set(tx.created_at),
        }
    }
}
