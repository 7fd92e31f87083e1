//! Storefront pricing library
//!
//! Offer resolution, coupon validation and application, cart totals, and
//! coupon-aware refunds for cancelled or returned order items.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod models;
pub mod money;
pub mod repositories;
pub mod services;

use std::sync::Arc;

use crate::config::PricingConfig;
use crate::events::EventSender;
use crate::repositories::{CouponStore, OfferStore, OrderLedgerStore, WalletStore};
use crate::services::{
    CartService, CheckoutService, CouponService, OfferService, RefundService, WalletService,
};

/// Every pricing service wired to one set of stores.
#[derive(Clone)]
pub struct PricingServices {
    pub config: Arc<PricingConfig>,
    pub offers: OfferService,
    pub coupons: CouponService,
    pub cart: CartService,
    pub checkout: CheckoutService,
    pub refunds: RefundService,
    pub wallets: WalletService,
}

impl PricingServices {
    pub fn new(
        config: Arc<PricingConfig>,
        event_sender: Arc<EventSender>,
        coupon_store: Arc<dyn CouponStore>,
        offer_store: Arc<dyn OfferStore>,
        ledger_store: Arc<dyn OrderLedgerStore>,
        wallet_store: Arc<dyn WalletStore>,
    ) -> Self {
        let offers = OfferService::new(offer_store);
        let coupons = CouponService::new(coupon_store.clone(), event_sender.clone());
        let wallets = WalletService::new(wallet_store, event_sender.clone());
        let cart = CartService::new(
            offers.clone(),
            coupons.clone(),
            config.clone(),
            event_sender.clone(),
        );
        let checkout = CheckoutService::new(
            coupon_store,
            ledger_store.clone(),
            wallets.clone(),
            config.clone(),
            event_sender.clone(),
        );
        let refunds = RefundService::new(
            ledger_store,
            wallets.clone(),
            config.clone(),
            event_sender,
        );

        Self {
            config,
            offers,
            coupons,
            cart,
            checkout,
            refunds,
            wallets,
        }
    }

    /// Services over a single store implementing every storage trait.
    pub fn with_store<S>(config: Arc<PricingConfig>, event_sender: Arc<EventSender>, store: Arc<S>) -> Self
    where
        S: CouponStore + OfferStore + OrderLedgerStore + WalletStore + 'static,
    {
        Self::new(
            config,
            event_sender,
            store.clone(),
            store.clone(),
            store.clone(),
            store,
        )
    }
}
