use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    models::{TransactionKind, WalletTransaction},
    money::round_money,
    repositories::WalletStore,
};

#[derive(Clone)]
pub struct WalletService {
    store: Arc<dyn WalletStore>,
    event_sender: Arc<EventSender>,
}

impl WalletService {
    pub fn new(store: Arc<dyn WalletStore>, event_sender: Arc<EventSender>) -> Self {
        Self {
            store,
            event_sender,
        }
    }

    fn positive(amount: Decimal) -> Result<Decimal, ServiceError> {
        let amount = round_money(amount);
        if amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Wallet amount must be greater than zero".to_string(),
            ));
        }
        Ok(amount)
    }

    /// Adds funds and returns the new balance.
    #[instrument(skip(self, description))]
    pub async fn credit(
        &self,
        user_id: Uuid,
        amount: Decimal,
        description: &str,
        order_id: Option<Uuid>,
    ) -> Result<Decimal, ServiceError> {
        let amount = Self::positive(amount)?;
        let transaction =
            WalletTransaction::new(user_id, amount, TransactionKind::Credit, description, order_id);
        let balance = self.store.credit(&transaction).await?;

        info!(%balance, "Wallet credited");
        self.event_sender.send_or_log(Event::WalletCredited {
            user_id,
            amount,
            order_id,
        });
        Ok(balance)
    }

    /// Takes funds if the balance covers them and returns the new balance.
    #[instrument(skip(self, description))]
    pub async fn debit(
        &self,
        user_id: Uuid,
        amount: Decimal,
        description: &str,
        order_id: Option<Uuid>,
    ) -> Result<Decimal, ServiceError> {
        let amount = Self::positive(amount)?;
        let transaction =
            WalletTransaction::new(user_id, amount, TransactionKind::Debit, description, order_id);

        match self.store.try_debit(&transaction).await? {
            Some(balance) => {
                info!(%balance, "Wallet debited");
                Ok(balance)
            }
            None => Err(ServiceError::InsufficientBalance {
                required: amount,
                available: self.store.balance(user_id).await?,
            }),
        }
    }

    pub async fn balance(&self, user_id: Uuid) -> Result<Decimal, ServiceError> {
        self.store.balance(user_id).await
    }

    pub async fn transactions(&self, user_id: Uuid) -> Result<Vec<WalletTransaction>, ServiceError> {
        self.store.transactions(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events;
    use crate::repositories::InMemoryStore;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn service() -> WalletService {
        let (sender, _rx) = events::channel(8);
        WalletService::new(Arc::new(InMemoryStore::new()), Arc::new(sender))
    }

    #[tokio::test]
    async fn test_credit_then_debit() {
        let wallet = service();
        let user = Uuid::new_v4();
        assert_eq!(wallet.credit(user, dec!(100), "top up", None).await.unwrap(), dec!(100));
        assert_eq!(wallet.debit(user, dec!(35.5), "order", None).await.unwrap(), dec!(64.5));
        assert_eq!(wallet.balance(user).await.unwrap(), dec!(64.5));

        let kinds: Vec<_> = wallet
            .transactions(user)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect();
        assert_eq!(kinds, vec![TransactionKind::Credit, TransactionKind::Debit]);
    }

    #[tokio::test]
    async fn test_debit_reports_available_balance() {
        let wallet = service();
        let user = Uuid::new_v4();
        wallet.credit(user, dec!(20), "top up", None).await.unwrap();
        assert_matches!(
            wallet.debit(user, dec!(50), "order", None).await,
            Err(ServiceError::InsufficientBalance { required, available })
                if required == dec!(50) && available == dec!(20)
        );
    }

    #[tokio::test]
    async fn test_non_positive_amounts_rejected() {
        let wallet = service();
        assert_matches!(
            wallet.credit(Uuid::new_v4(), Decimal::ZERO, "nothing", None).await,
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            wallet.debit(Uuid::new_v4(), dec!(-5), "negative", None).await,
            Err(ServiceError::ValidationError(_))
        );
    }
}
