use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, TransactionTrait,
};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{CouponLedger, CouponStore, OfferStore, OrderLedgerStore, WalletStore};
use crate::entities::{coupon, offer, order_coupon_ledger, wallet, wallet_transaction};
use crate::errors::ServiceError;
use crate::models::{coupon::normalize_code, Coupon, Offer, WalletTransaction};

/// Database-backed store.
///
/// Counter updates are single conditional `UPDATE ... WHERE` statements; the
/// affected row count says whether the condition held.
#[derive(Debug, Clone)]
pub struct SeaOrmStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }

    async fn offers_of_kind(
        &self,
        kind: &str,
        target_id: Uuid,
    ) -> Result<Vec<Offer>, ServiceError> {
        let models = offer::Entity::find()
            .filter(offer::Column::TargetKind.eq(kind))
            .order_by_asc(offer::Column::CreatedAt)
            .order_by_asc(offer::Column::Id)
            .all(self.get_db())
            .await?;

        let mut offers = Vec::new();
        for model in models {
            let offer = Offer::try_from(model)?;
            if offer.target.ids().contains(&target_id) {
                offers.push(offer);
            }
        }
        Ok(offers)
    }
}

#[async_trait]
impl CouponStore for SeaOrmStore {
    async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>, ServiceError> {
        coupon::Entity::find()
            .filter(coupon::Column::Code.eq(normalize_code(code)))
            .one(self.get_db())
            .await?
            .map(Coupon::try_from)
            .transpose()
    }

    async fn find_by_id(&self, coupon_id: Uuid) -> Result<Option<Coupon>, ServiceError> {
        coupon::Entity::find_by_id(coupon_id)
            .one(self.get_db())
            .await?
            .map(Coupon::try_from)
            .transpose()
    }

    async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<Coupon>, ServiceError> {
        coupon::Entity::find()
            .filter(coupon::Column::IsActive.eq(true))
            .filter(coupon::Column::ValidFrom.lte(now))
            .filter(coupon::Column::ValidUntil.gte(now))
            .order_by_asc(coupon::Column::Code)
            .all(self.get_db())
            .await?
            .into_iter()
            .map(Coupon::try_from)
            .collect()
    }

    async fn save(&self, coupon: &Coupon) -> Result<(), ServiceError> {
        coupon.validate_terms()?;
        let mut model = coupon::ActiveModel::from(coupon);
        model.code = Set(normalize_code(&coupon.code));

        coupon::Entity::insert(model)
            .on_conflict(
                OnConflict::column(coupon::Column::Id)
                    .update_columns([
                        coupon::Column::Code,
                        coupon::Column::DiscountType,
                        coupon::Column::DiscountValue,
                        coupon::Column::MinPurchase,
                        coupon::Column::MaxDiscount,
                        coupon::Column::ValidFrom,
                        coupon::Column::ValidUntil,
                        coupon::Column::UsageLimit,
                        coupon::Column::UsedCount,
                        coupon::Column::IsActive,
                    ])
                    .to_owned(),
            )
            .exec(self.get_db())
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn try_increment_usage(
        &self,
        coupon_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let result = coupon::Entity::update_many()
            .col_expr(
                coupon::Column::UsedCount,
                Expr::col(coupon::Column::UsedCount).add(1),
            )
            .filter(coupon::Column::Id.eq(coupon_id))
            .filter(coupon::Column::IsActive.eq(true))
            .filter(coupon::Column::ValidFrom.lte(now))
            .filter(coupon::Column::ValidUntil.gte(now))
            .filter(Expr::col(coupon::Column::UsedCount).lt(Expr::col(coupon::Column::UsageLimit)))
            .exec(self.get_db())
            .await?;

        debug!(rows_affected = result.rows_affected, "coupon usage increment");
        Ok(result.rows_affected == 1)
    }

    #[instrument(skip(self))]
    async fn decrement_usage(&self, coupon_id: Uuid) -> Result<bool, ServiceError> {
        let result = coupon::Entity::update_many()
            .col_expr(
                coupon::Column::UsedCount,
                Expr::col(coupon::Column::UsedCount).sub(1),
            )
            .filter(coupon::Column::Id.eq(coupon_id))
            .filter(coupon::Column::UsedCount.gt(0))
            .exec(self.get_db())
            .await?;

        debug!(rows_affected = result.rows_affected, "coupon usage decrement");
        Ok(result.rows_affected == 1)
    }
}

#[async_trait]
impl OfferStore for SeaOrmStore {
    async fn offers_for_product(&self, product_id: Uuid) -> Result<Vec<Offer>, ServiceError> {
        self.offers_of_kind("products", product_id).await
    }

    async fn offers_for_category(&self, category_id: Uuid) -> Result<Vec<Offer>, ServiceError> {
        self.offers_of_kind("categories", category_id).await
    }

    async fn save(&self, offer: &Offer) -> Result<(), ServiceError> {
        offer.validate_terms()?;
        let model = offer::ActiveModel::try_from(offer)?;

        offer::Entity::insert(model)
            .on_conflict(
                OnConflict::column(offer::Column::Id)
                    .update_columns([
                        offer::Column::Name,
                        offer::Column::DiscountType,
                        offer::Column::DiscountValue,
                        offer::Column::MaxDiscount,
                        offer::Column::MinPurchase,
                        offer::Column::ValidFrom,
                        offer::Column::ValidUntil,
                        offer::Column::IsActive,
                        offer::Column::TargetKind,
                        offer::Column::TargetIds,
                    ])
                    .to_owned(),
            )
            .exec(self.get_db())
            .await?;
        Ok(())
    }
}

impl From<order_coupon_ledger::Model> for CouponLedger {
    fn from(model: order_coupon_ledger::Model) -> Self {
        Self {
            order_id: model.order_id,
            total_coupon: model.total_coupon,
            deduct_refund_coupon: model.deduct_refund_coupon,
        }
    }
}

#[async_trait]
impl OrderLedgerStore for SeaOrmStore {
    async fn register(&self, ledger: CouponLedger) -> Result<(), ServiceError> {
        if self.ledger(ledger.order_id).await?.is_some() {
            return Err(ServiceError::InvalidOperation(format!(
                "Coupon ledger for order {} already exists",
                ledger.order_id
            )));
        }

        order_coupon_ledger::ActiveModel {
            order_id: Set(ledger.order_id),
            total_coupon: Set(ledger.total_coupon),
            deduct_refund_coupon: Set(ledger.deduct_refund_coupon),
            updated_at: Set(Utc::now()),
        }
        .insert(self.get_db())
        .await?;
        Ok(())
    }

    async fn ledger(&self, order_id: Uuid) -> Result<Option<CouponLedger>, ServiceError> {
        Ok(order_coupon_ledger::Entity::find_by_id(order_id)
            .one(self.get_db())
            .await?
            .map(CouponLedger::from))
    }

    #[instrument(skip(self))]
    async fn try_consume(
        &self,
        order_id: Uuid,
        amount: Decimal,
    ) -> Result<Option<CouponLedger>, ServiceError> {
        if amount < Decimal::ZERO {
            return Ok(None);
        }

        let result = order_coupon_ledger::Entity::update_many()
            .col_expr(
                order_coupon_ledger::Column::DeductRefundCoupon,
                Expr::col(order_coupon_ledger::Column::DeductRefundCoupon).add(amount),
            )
            .col_expr(
                order_coupon_ledger::Column::UpdatedAt,
                Expr::value(Utc::now()),
            )
            .filter(order_coupon_ledger::Column::OrderId.eq(order_id))
            .filter(
                Expr::col(order_coupon_ledger::Column::DeductRefundCoupon).lte(
                    Expr::col(order_coupon_ledger::Column::TotalCoupon).sub(amount),
                ),
            )
            .exec(self.get_db())
            .await?;

        let ledger = self.ledger(order_id).await?.ok_or_else(|| {
            ServiceError::NotFound(format!("Coupon ledger for order {} not found", order_id))
        })?;

        if result.rows_affected == 1 {
            Ok(Some(ledger))
        } else {
            Ok(None)
        }
    }

    #[instrument(skip(self))]
    async fn release(
        &self,
        order_id: Uuid,
        amount: Decimal,
    ) -> Result<Option<CouponLedger>, ServiceError> {
        if amount < Decimal::ZERO {
            return Ok(None);
        }

        let result = order_coupon_ledger::Entity::update_many()
            .col_expr(
                order_coupon_ledger::Column::DeductRefundCoupon,
                Expr::col(order_coupon_ledger::Column::DeductRefundCoupon).sub(amount),
            )
            .col_expr(
                order_coupon_ledger::Column::UpdatedAt,
                Expr::value(Utc::now()),
            )
            .filter(order_coupon_ledger::Column::OrderId.eq(order_id))
            .filter(order_coupon_ledger::Column::DeductRefundCoupon.gte(amount))
            .exec(self.get_db())
            .await?;

        let ledger = self.ledger(order_id).await?.ok_or_else(|| {
            ServiceError::NotFound(format!("Coupon ledger for order {} not found", order_id))
        })?;

        if result.rows_affected == 1 {
            debug!(%order_id, %amount, "coupon ledger consumption released");
            Ok(Some(ledger))
        } else {
            Ok(None)
        }
    }
}

#[async_trait]
impl WalletStore for SeaOrmStore {
    async fn balance(&self, user_id: Uuid) -> Result<Decimal, ServiceError> {
        Ok(wallet::Entity::find_by_id(user_id)
            .one(self.get_db())
            .await?
            .map(|w| w.balance)
            .unwrap_or(Decimal::ZERO))
    }

    #[instrument(skip(self, transaction), fields(user_id = %transaction.user_id))]
    async fn credit(&self, transaction: &WalletTransaction) -> Result<Decimal, ServiceError> {
        let txn = self.get_db().begin().await?;

        wallet::Entity::insert(wallet::ActiveModel {
            user_id: Set(transaction.user_id),
            balance: Set(Decimal::ZERO),
            updated_at: Set(transaction.created_at),
        })
        .on_conflict(
            OnConflict::column(wallet::Column::UserId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&txn)
        .await?;

        wallet::Entity::update_many()
            .col_expr(
                wallet::Column::Balance,
                Expr::col(wallet::Column::Balance).add(transaction.amount),
            )
            .col_expr(wallet::Column::UpdatedAt, Expr::value(transaction.created_at))
            .filter(wallet::Column::UserId.eq(transaction.user_id))
            .exec(&txn)
            .await?;

        wallet_transaction::ActiveModel::from(transaction)
            .insert(&txn)
            .await?;

        let balance = wallet::Entity::find_by_id(transaction.user_id)
            .one(&txn)
            .await?
            .map(|w| w.balance)
            .unwrap_or(Decimal::ZERO);

        txn.commit().await?;
        Ok(balance)
    }

    #[instrument(skip(self, transaction), fields(user_id = %transaction.user_id))]
    async fn try_debit(
        &self,
        transaction: &WalletTransaction,
    ) -> Result<Option<Decimal>, ServiceError> {
        let txn = self.get_db().begin().await?;

        let result = wallet::Entity::update_many()
            .col_expr(
                wallet::Column::Balance,
                Expr::col(wallet::Column::Balance).sub(transaction.amount),
            )
            .col_expr(wallet::Column::UpdatedAt, Expr::value(transaction.created_at))
            .filter(wallet::Column::UserId.eq(transaction.user_id))
            .filter(wallet::Column::Balance.gte(transaction.amount))
            .exec(&txn)
            .await?;

        if result.rows_affected != 1 {
            txn.rollback().await?;
            return Ok(None);
        }

        wallet_transaction::ActiveModel::from(transaction)
            .insert(&txn)
            .await?;

        let balance = wallet::Entity::find_by_id(transaction.user_id)
            .one(&txn)
            .await?
            .map(|w| w.balance)
            .unwrap_or(Decimal::ZERO);

        txn.commit().await?;
        Ok(Some(balance))
    }

    async fn transactions(&self, user_id: Uuid) -> Result<Vec<WalletTransaction>, ServiceError> {
        wallet_transaction::Entity::find()
            .filter(wallet_transaction::Column::UserId.eq(user_id))
            .order_by_asc(wallet_transaction::Column::CreatedAt)
            .all(self.get_db())
            .await?
            .into_iter()
            .map(WalletTransaction::try_from)
            .collect()
    }
}
