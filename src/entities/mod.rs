//! Tables backing the pricing counters: coupons, offers, the per-order coupon
//! ledger and shopper wallets.

pub mod coupon;
pub mod offer;
pub mod order_coupon_ledger;
pub mod wallet;
pub mod wallet_transaction;
