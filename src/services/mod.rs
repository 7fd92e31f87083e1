// Pricing
pub mod offers;
pub mod coupons;
pub mod cart;

// Orders and money movement
pub mod checkout;
pub mod refunds;
pub mod wallet;

pub use cart::{calculate_totals, CartService, CartTotals};
pub use checkout::CheckoutService;
pub use coupons::CouponService;
pub use offers::{get_best_offer, BestOffer, OfferService};
pub use refunds::{calculate_item_coupon_refund, ItemCouponRefund, RefundOutcome, RefundService};
pub use wallet::WalletService;
