use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Normalized view of a catalog product, built once where product data enters
/// the pricing code.
///
/// Every field is optional so that incomplete catalog records still produce a
/// price instead of an error. The resolver decides what a missing field means.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProductSummary {
    pub id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub regular_price: Option<Decimal>,
    #[serde(default)]
    pub sales_price: Option<Decimal>,
}

impl ProductSummary {
    pub fn new(
        id: Uuid,
        category_id: Uuid,
        regular_price: Decimal,
        sales_price: Option<Decimal>,
    ) -> Self {
        Self {
            id: Some(id),
            category_id: Some(category_id),
            regular_price: Some(regular_price),
            sales_price,
        }
    }

    /// A product the offer resolver can price normally: it has an id and a
    /// positive regular price.
    pub fn is_well_formed(&self) -> bool {
        self.id.is_some() && matches!(self.regular_price, Some(p) if p > Decimal::ZERO)
    }

    /// Sales price when it undercuts the regular price, else the regular price.
    ///
    /// Falls back to whatever positive price exists when the record is
    /// incomplete, and to zero when there is none.
    pub fn base_price(&self) -> Decimal {
        match (self.regular_price, self.sales_price) {
            (Some(regular), Some(sales))
                if sales > Decimal::ZERO && sales < regular =>
            {
                sales
            }
            (Some(regular), _) if regular > Decimal::ZERO => regular,
            (_, Some(sales)) if sales > Decimal::ZERO => sales,
            _ => Decimal::ZERO,
        }
    }

    /// Regular price used for "was" prices and savings; the base price when the
    /// regular price is missing.
    pub fn list_price(&self) -> Decimal {
        match self.regular_price {
            Some(regular) if regular > Decimal::ZERO => regular,
            _ => self.base_price(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn product(regular: Option<Decimal>, sales: Option<Decimal>) -> ProductSummary {
        ProductSummary {
            id: Some(Uuid::new_v4()),
            category_id: Some(Uuid::new_v4()),
            regular_price: regular,
            sales_price: sales,
        }
    }

    #[test]
    fn test_sales_price_used_when_lower() {
        assert_eq!(product(Some(dec!(1000)), Some(dec!(800))).base_price(), dec!(800));
    }

    #[test]
    fn test_sales_price_ignored_when_not_lower() {
        assert_eq!(product(Some(dec!(1000)), Some(dec!(1000))).base_price(), dec!(1000));
        assert_eq!(product(Some(dec!(1000)), Some(dec!(1200))).base_price(), dec!(1000));
        assert_eq!(product(Some(dec!(1000)), Some(dec!(0))).base_price(), dec!(1000));
    }

    #[test]
    fn test_incomplete_records_fall_back() {
        assert_eq!(product(None, Some(dec!(250))).base_price(), dec!(250));
        assert_eq!(product(None, None).base_price(), Decimal::ZERO);
        assert!(!product(None, Some(dec!(250))).is_well_formed());
        assert!(!ProductSummary {
            id: None,
            ..product(Some(dec!(10)), None)
        }
        .is_well_formed());
    }

    #[test]
    fn test_list_price() {
        assert_eq!(product(Some(dec!(1000)), Some(dec!(800))).list_price(), dec!(1000));
        assert_eq!(product(None, Some(dec!(800))).list_price(), dec!(800));
    }
}
