mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use common::{coupon, offer, product, TestApp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use storefront_pricing::{
    errors::ServiceError,
    models::{Cart, DiscountType, OfferTarget, PaymentMethod, PaymentStatus},
    repositories::OrderLedgerStore,
};
use uuid::Uuid;

#[tokio::test]
async fn add_item_uses_best_offer_price() {
    let app = TestApp::new();
    let p = product(dec!(1000), Some(dec!(800)));
    app.add_offer(&offer(
        OfferTarget::Categories(vec![p.category_id.unwrap()]),
        DiscountType::Percentage,
        dec!(10),
        Some(dec!(150)),
        Utc::now(),
    ))
    .await;

    let mut cart = Cart::new(Uuid::new_v4());
    let totals = app
        .services
        .cart
        .add_item(&mut cart, &p, 1, Utc::now())
        .await
        .unwrap();

    let line = cart.item(p.id.unwrap()).unwrap();
    assert_eq!(line.price, dec!(720));
    assert_eq!(line.original_price, dec!(1000));
    assert_eq!(line.discount_percentage, dec!(10));
    assert_eq!(totals.subtotal, dec!(720));
    assert_eq!(totals.delivery_charge, Decimal::ZERO);
    assert_eq!(totals.total_savings, dec!(280));
}

#[tokio::test]
async fn delivery_threshold_applies_to_cart() {
    let app = TestApp::new();
    let mut cart = Cart::new(Uuid::new_v4());

    let totals = app
        .services
        .cart
        .add_item(&mut cart, &product(dec!(450), None), 1, Utc::now())
        .await
        .unwrap();
    assert_eq!(totals.delivery_charge, dec!(40));
    assert_eq!(totals.total, dec!(490));

    let totals = app
        .services
        .cart
        .add_item(&mut cart, &product(dec!(50), None), 1, Utc::now())
        .await
        .unwrap();
    assert_eq!(totals.subtotal, dec!(500));
    assert_eq!(totals.delivery_charge, Decimal::ZERO);
}

#[tokio::test]
async fn quantity_limits_enforced() {
    let app = TestApp::new();
    let mut cart = Cart::new(Uuid::new_v4());
    let p = product(dec!(100), None);

    for quantity in [0, 6, -1] {
        assert_matches!(
            app.services.cart.add_item(&mut cart, &p, quantity, Utc::now()).await,
            Err(ServiceError::QuantityOutOfRange { min: 1, max: 5, .. })
        );
    }

    app.services
        .cart
        .add_item(&mut cart, &p, 4, Utc::now())
        .await
        .unwrap();
    assert_matches!(
        app.services.cart.add_item(&mut cart, &p, 2, Utc::now()).await,
        Err(ServiceError::QuantityOutOfRange { quantity: 6, .. })
    );
    assert_eq!(cart.item(p.id.unwrap()).unwrap().quantity, 4);

    assert_matches!(
        app.services
            .cart
            .update_quantity(&mut cart, &product(dec!(5), None), 1, Utc::now())
            .await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn coupon_follows_cart_changes() {
    let app = TestApp::new();
    let save10 = coupon(
        "SAVE10",
        DiscountType::Percentage,
        dec!(10),
        dec!(200),
        Some(dec!(50)),
        100,
    );
    app.add_coupon(&save10).await;

    let p = product(dec!(250), None);
    let mut cart = Cart::new(Uuid::new_v4());
    app.services
        .cart
        .add_item(&mut cart, &p, 4, Utc::now())
        .await
        .unwrap();

    let discount = app
        .services
        .coupons
        .apply_coupon(&mut cart, "save10", Utc::now())
        .await
        .unwrap();
    assert_eq!(discount, dec!(50));
    assert_eq!(app.used_count(save10.id).await, 1);

    // 250 × 1 = 250: still above the minimum, 10% of 250 is 25.
    let totals = app
        .services
        .cart
        .update_quantity(&mut cart, &p, 1, Utc::now())
        .await
        .unwrap();
    assert_eq!(totals.coupon_discount, dec!(25));
    assert!(cart.has_coupon());

    // Below the minimum the coupon is dropped and its use released.
    let cheap = product(dec!(150), None);
    app.services
        .cart
        .add_item(&mut cart, &cheap, 1, Utc::now())
        .await
        .unwrap();
    let totals = app
        .services
        .cart
        .remove_item(&mut cart, p.id.unwrap())
        .await
        .unwrap();
    assert_eq!(totals.coupon_discount, Decimal::ZERO);
    assert!(!cart.has_coupon());
    assert_eq!(app.used_count(save10.id).await, 0);
}

#[tokio::test]
async fn apply_then_remove_restores_state() {
    let app = TestApp::new();
    let mut c = coupon("FLAT30", DiscountType::Fixed, dec!(30), Decimal::ZERO, None, 10);
    c.used_count = 3;
    app.add_coupon(&c).await;

    let mut cart = Cart::new(Uuid::new_v4());
    app.services
        .cart
        .add_item(&mut cart, &product(dec!(120), None), 1, Utc::now())
        .await
        .unwrap();

    app.services
        .coupons
        .apply_coupon(&mut cart, "FLAT30", Utc::now())
        .await
        .unwrap();
    assert_eq!(app.used_count(c.id).await, 4);

    assert!(app.services.coupons.remove_coupon(&mut cart).await.unwrap());
    assert!(!app.services.coupons.remove_coupon(&mut cart).await.unwrap());
    assert_eq!(app.used_count(c.id).await, 3);
    assert_eq!(cart.coupon_discount, Decimal::ZERO);
}

#[tokio::test]
async fn clear_releases_coupon() {
    let app = TestApp::new();
    let c = coupon("FLAT30", DiscountType::Fixed, dec!(30), Decimal::ZERO, None, 10);
    app.add_coupon(&c).await;

    let mut cart = Cart::new(Uuid::new_v4());
    app.services
        .cart
        .add_item(&mut cart, &product(dec!(120), None), 2, Utc::now())
        .await
        .unwrap();
    app.services
        .coupons
        .apply_coupon(&mut cart, "FLAT30", Utc::now())
        .await
        .unwrap();

    let totals = app.services.cart.clear(&mut cart).await.unwrap();
    assert!(cart.is_empty());
    assert_eq!(totals.total, dec!(40));
    assert_eq!(app.used_count(c.id).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_coupon_use_goes_to_one_cart() {
    let app = TestApp::new();
    let c = coupon("LAST1", DiscountType::Fixed, dec!(20), Decimal::ZERO, None, 1);
    app.add_coupon(&c).await;

    let p = product(dec!(100), None);
    let mut handles = Vec::new();
    for _ in 0..16 {
        let services = app.services.clone();
        let p = p.clone();
        handles.push(tokio::spawn(async move {
            let mut cart = Cart::new(Uuid::new_v4());
            services
                .cart
                .add_item(&mut cart, &p, 1, Utc::now())
                .await
                .expect("item added");
            services
                .coupons
                .apply_coupon(&mut cart, "LAST1", Utc::now())
                .await
        }));
    }

    let mut applied = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(discount) => {
                assert_eq!(discount, dec!(20));
                applied += 1;
            }
            Err(err) => assert_matches!(err, ServiceError::CouponUsageLimitReached(_)),
        }
    }

    assert_eq!(applied, 1);
    assert_eq!(app.used_count(c.id).await, 1);
}

#[tokio::test]
async fn expired_coupon_has_its_own_error() {
    let app = TestApp::new();
    let mut c = coupon("OLD", DiscountType::Fixed, dec!(20), Decimal::ZERO, None, 10);
    c.valid_until = Utc::now() - Duration::minutes(1);
    app.add_coupon(&c).await;

    let mut cart = Cart::new(Uuid::new_v4());
    app.services
        .cart
        .add_item(&mut cart, &product(dec!(100), None), 1, Utc::now())
        .await
        .unwrap();

    let err = app
        .services
        .coupons
        .apply_coupon(&mut cart, "OLD", Utc::now())
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "coupon_expired");
    assert_eq!(app.used_count(c.id).await, 0);
}

#[tokio::test]
async fn checkout_moves_coupon_to_order() {
    let app = TestApp::new();
    let save10 = coupon(
        "SAVE10",
        DiscountType::Percentage,
        dec!(10),
        dec!(200),
        Some(dec!(50)),
        100,
    );
    app.add_coupon(&save10).await;

    let mut cart = Cart::new(Uuid::new_v4());
    app.services
        .cart
        .add_item(&mut cart, &product(dec!(500), None), 2, Utc::now())
        .await
        .unwrap();
    app.services
        .coupons
        .apply_coupon(&mut cart, "SAVE10", Utc::now())
        .await
        .unwrap();

    let order = app
        .services
        .checkout
        .place_order(&mut cart, PaymentMethod::Online, Utc::now())
        .await
        .unwrap();

    assert_eq!(order.original_subtotal, dec!(1000));
    assert_eq!(order.coupon_discount, dec!(50));
    assert_eq!(order.total, dec!(950));
    assert_eq!(order.total_coupon, dec!(50));
    assert_eq!(order.balance_coupon, dec!(50));
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(
        order.applied_coupon.as_ref().map(|c| c.code.as_str()),
        Some("SAVE10")
    );

    assert!(cart.is_empty());
    assert!(!cart.has_coupon());
    assert_eq!(app.used_count(save10.id).await, 1);

    let ledger = app.store.ledger(order.id).await.unwrap().unwrap();
    assert_eq!(ledger.total_coupon, dec!(50));
    assert_eq!(ledger.deduct_refund_coupon, Decimal::ZERO);
}

#[tokio::test]
async fn wallet_checkout_debits_total() {
    let app = TestApp::new();
    let mut cart = Cart::new(Uuid::new_v4());
    app.services
        .wallets
        .credit(cart.user_id, dec!(1000), "top up", None)
        .await
        .unwrap();
    app.services
        .cart
        .add_item(&mut cart, &product(dec!(300), None), 1, Utc::now())
        .await
        .unwrap();

    let order = app
        .services
        .checkout
        .place_order(&mut cart, PaymentMethod::Wallet, Utc::now())
        .await
        .unwrap();

    assert_eq!(order.total, dec!(340));
    assert_eq!(
        app.services.wallets.balance(order.user_id).await.unwrap(),
        dec!(660)
    );
}

#[tokio::test]
async fn oversized_coupon_discount_is_clamped_and_kept() {
    let app = TestApp::new();
    let mut cart = Cart::new(Uuid::new_v4());
    app.services
        .cart
        .add_item(&mut cart, &product(dec!(100), None), 1, Utc::now())
        .await
        .unwrap();
    cart.coupon_discount = dec!(150);

    let totals = app.services.cart.refresh_totals(&mut cart);
    assert!(totals.coupon_was_clamped);
    assert_eq!(totals.coupon_discount, dec!(100));
    assert_eq!(totals.total, dec!(40));
    assert_eq!(cart.coupon_discount, dec!(100));

    let again = app.services.cart.refresh_totals(&mut cart);
    assert!(!again.coupon_was_clamped);
}
