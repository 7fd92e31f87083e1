use std::{fs, path::Path, path::PathBuf, str::FromStr};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;
use uuid::Uuid;

use storefront_pricing::{
    config::{self, RefundBasis},
    errors::ErrorResponse,
    models::{Cart, Coupon, Offer, Order, ProductSummary},
    services::{calculate_item_coupon_refund, calculate_totals, get_best_offer},
};

#[derive(Parser)]
#[command(
    name = "storefront-pricing",
    about = "Price products, carts, coupons and refunds from JSON snapshots",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[arg(
        long,
        global = true,
        value_parser = parse_datetime,
        help = "Evaluate offers and coupons at this instant (RFC3339) instead of now"
    )]
    now: Option<DateTime<Utc>>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Best offer price for a product
    BestOffer(BestOfferArgs),
    /// Subtotal, delivery, coupon, savings and total for a cart
    CartTotals(CartTotalsArgs),
    /// Discount a coupon gives on a subtotal
    CouponDiscount(CouponDiscountArgs),
    /// Coupon share and refund for one order item
    Refund(RefundArgs),
}

#[derive(Args)]
struct BestOfferArgs {
    #[arg(long, help = "Product summary JSON file")]
    product: PathBuf,
    #[arg(long, help = "JSON file with an array of offers")]
    offers: PathBuf,
}

#[derive(Args)]
struct CartTotalsArgs {
    #[arg(long, help = "Cart JSON file")]
    cart: PathBuf,
}

#[derive(Args)]
struct CouponDiscountArgs {
    #[arg(long, help = "Coupon JSON file")]
    coupon: PathBuf,
    #[arg(long, value_parser = parse_decimal, help = "Cart subtotal")]
    subtotal: Decimal,
}

#[derive(Args)]
struct RefundArgs {
    #[arg(long, help = "Order JSON file")]
    order: PathBuf,
    #[arg(long, value_parser = clap::value_parser!(Uuid), help = "Order item identifier")]
    item: Uuid,
    #[arg(long, value_enum, help = "Override the configured refund basis")]
    basis: Option<BasisArg>,
}

#[derive(Clone, Copy, ValueEnum)]
enum BasisArg {
    LiveActiveItems,
    OrderCreation,
}

impl From<BasisArg> for RefundBasis {
    fn from(arg: BasisArg) -> Self {
        match arg {
            BasisArg::LiveActiveItems => RefundBasis::LiveActiveItems,
            BasisArg::OrderCreation => RefundBasis::OrderCreation,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config()?;
    config::init_tracing(cfg.log_level(), cfg.log_json);

    let now = cli.now.unwrap_or_else(Utc::now);
    debug!(%now, "pricing at");

    match cli.command {
        Commands::BestOffer(args) => {
            let product: ProductSummary = read_json(&args.product)?;
            let offers: Vec<Offer> = read_json(&args.offers)?;
            let best = get_best_offer(&product, &offers, now);
            if cli.json {
                print_json(&best)?;
            } else {
                match &best.offer {
                    Some(offer) => println!(
                        "{} -> {} ({}% off with '{}')",
                        best.regular_price, best.final_price, best.discount_percentage, offer.name
                    ),
                    None => println!(
                        "{} -> {} (no offer, {}% off)",
                        best.regular_price, best.final_price, best.discount_percentage
                    ),
                }
            }
        }
        Commands::CartTotals(args) => {
            let cart: Cart = read_json(&args.cart)?;
            let totals = calculate_totals(&cart, &cfg.delivery_policy());
            if cli.json {
                print_json(&totals)?;
            } else {
                println!("Subtotal:        {} {}", totals.subtotal, cfg.currency);
                println!("Delivery:        {} {}", totals.delivery_charge, cfg.currency);
                println!("Coupon discount: {} {}", totals.coupon_discount, cfg.currency);
                println!("You save:        {} {}", totals.total_savings, cfg.currency);
                println!("Total:           {} {}", totals.total, cfg.currency);
                if totals.coupon_was_clamped {
                    println!("(stored coupon discount exceeded the subtotal and was clamped)");
                }
            }
        }
        Commands::CouponDiscount(args) => {
            let coupon: Coupon = read_json(&args.coupon)?;
            match coupon.calculate_discount(args.subtotal, now) {
                Ok(discount) => {
                    if cli.json {
                        print_json(&serde_json::json!({
                            "code": coupon.code,
                            "subtotal": args.subtotal,
                            "discount": discount,
                        }))?;
                    } else {
                        println!("{} takes {} off {}", coupon.code, discount, args.subtotal);
                    }
                }
                Err(err) => {
                    if cli.json {
                        print_json(&ErrorResponse::from(&err))?;
                    }
                    return Err(err.into());
                }
            }
        }
        Commands::Refund(args) => {
            let order: Order = read_json(&args.order)?;
            let basis = args.basis.map(RefundBasis::from).unwrap_or(cfg.refund_basis);
            let refund = calculate_item_coupon_refund(&order, args.item, basis)?;
            if cli.json {
                print_json(&refund)?;
            } else {
                println!(
                    "Item total {} • coupon share {} (ratio {}) • refund {} • coupon left {}",
                    refund.item_total,
                    refund.item_coupon_discount,
                    refund.item_coupon_ratio,
                    refund.refund_amount,
                    refund.remaining_coupon_discount
                );
            }
        }
    }

    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_decimal(raw: &str) -> Result<Decimal, String> {
    Decimal::from_str(raw).map_err(|_| format!("invalid decimal '{raw}'"))
}

fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| format!("invalid datetime '{}', expected RFC3339", raw))
}
