//! # Pricing Resolver
//!
//! Resolves a product's sale price from its cost and the markup rules of a
//! client's price list.
//!
//! ## Resolution Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  resolve_price(cost, brand, type, rules)                                │
//! │                                                                         │
//! │  1. cost ≤ 0 ───────────────────────────────────────► 0                 │
//! │  2. rule.brand_id == brand ─────────────────────────► cost × (1+pct/100)│
//! │  3. rule.product_type_id == type ───────────────────► cost × (1+pct/100)│
//! │  4. no match ───────────────────────────────────────► cost              │
//! │                                                                         │
//! │  First match wins. Brand beats type even when the type rule             │
//! │  appears earlier in the list.                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A product without a known cost is priced from its sale price instead.
//! The result keeps full precision. Order lines round nothing either; the
//! backend stores what the device computed.

use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::money::Money;
use crate::types::{PriceListMarkupRule, Product};

/// Resolves the sale price for a cost under a set of markup rules.
///
/// Fails only when the marked-up price does not fit in a decimal.
pub fn resolve_price(
    cost: Money,
    brand_id: Option<&str>,
    product_type_id: Option<&str>,
    rules: &[PriceListMarkupRule],
) -> CoreResult<Money> {
    if !cost.is_positive() {
        return Ok(Money::zero());
    }

    if let Some(brand) = brand_id {
        if let Some(rule) = rules.iter().find(|r| r.matches_brand(brand)) {
            return Ok(cost.apply_markup(rule.percentage)?);
        }
    }

    if let Some(product_type) = product_type_id {
        if let Some(rule) = rules.iter().find(|r| r.matches_product_type(product_type)) {
            return Ok(cost.apply_markup(rule.percentage)?);
        }
    }

    Ok(cost)
}

/// Selects the rules that belong to one price list.
pub fn rules_for_price_list(
    rules: &[PriceListMarkupRule],
    price_list_id: &str,
) -> Vec<PriceListMarkupRule> {
    rules
        .iter()
        .filter(|r| r.price_list_id == price_list_id)
        .cloned()
        .collect::<Vec<_>>()
}

// =============================================================================
// Priced Catalog
// =============================================================================

/// A product together with the price resolved for a specific client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedProduct {
    pub product: Product,
    pub price: Money,
}

/// Prices a single product. The markup applies to the cost, or to the
/// stored sale price when the cost is unknown.
pub fn price_product(product: &Product, rules: &[PriceListMarkupRule]) -> CoreResult<Money> {
    let base = if product.cost_price.is_positive() {
        product.cost_price
    } else {
        product.sale_price
    };
    resolve_price(
        base,
        product.brand_id.as_deref(),
        product.product_type_id.as_deref(),
        rules,
    )
}

/// Prices every product under the given rules.
pub fn price_products(
    products: Vec<Product>,
    rules: &[PriceListMarkupRule],
) -> CoreResult<Vec<PricedProduct>> {
    products
        .into_iter()
        .map(|product| {
            let price = price_product(&product, rules)?;
            Ok(PricedProduct { product, price })
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn rule(id: &str, list: &str, brand: Option<&str>, ty: Option<&str>, pct: i64) -> PriceListMarkupRule {
        PriceListMarkupRule {
            id: id.to_string(),
            price_list_id: list.to_string(),
            brand_id: brand.map(str::to_string),
            product_type_id: ty.map(str::to_string),
            percentage: Decimal::from(pct),
        }
    }

    fn product(cost: i64, sale: i64, brand: Option<&str>, ty: Option<&str>) -> Product {
        Product {
            id: "p1".into(),
            code: "P-001".into(),
            name: "Yerba 1kg".into(),
            description: None,
            cost_price: Money::from_units(cost),
            sale_price: Money::from_units(sale),
            stock: 10,
            category: None,
            brand_id: brand.map(str::to_string),
            product_type_id: ty.map(str::to_string),
            image_url: None,
            synced: true,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_brand_rule_beats_type_rule() {
        let rules = vec![
            rule("r1", "lp", None, Some("t1"), 50),
            rule("r2", "lp", Some("b1"), None, 20),
        ];
        let price = resolve_price(Money::from_units(100), Some("b1"), Some("t1"), &rules).unwrap();
        assert_eq!(price, Money::from_units(120));
    }

    #[test]
    fn test_type_rule_when_no_brand_match() {
        let rules = vec![rule("r1", "lp", None, Some("t1"), 50)];
        let price = resolve_price(Money::from_units(100), Some("b9"), Some("t1"), &rules).unwrap();
        assert_eq!(price, Money::from_units(150));
    }

    #[test]
    fn test_no_match_returns_cost() {
        let rules = vec![rule("r1", "lp", Some("b2"), None, 20)];
        let price = resolve_price(Money::from_units(100), Some("b1"), None, &rules).unwrap();
        assert_eq!(price, Money::from_units(100));
        assert_eq!(resolve_price(Money::from_units(100), None, None, &[]).unwrap(), Money::from_units(100));
    }

    #[test]
    fn test_non_positive_cost_is_zero() {
        let rules = vec![rule("r1", "lp", Some("b1"), None, 20)];
        assert_eq!(resolve_price(Money::zero(), Some("b1"), None, &rules).unwrap(), Money::zero());
        assert_eq!(resolve_price(Money::from_units(-5), Some("b1"), None, &rules).unwrap(), Money::zero());
    }

    #[test]
    fn test_first_matching_brand_rule_wins() {
        let rules = vec![
            rule("r1", "lp", Some("b1"), None, 10),
            rule("r2", "lp", Some("b1"), None, 30),
        ];
        let price = resolve_price(Money::from_units(100), Some("b1"), None, &rules).unwrap();
        assert_eq!(price, Money::from_units(110));
    }

    #[test]
    fn test_rules_for_price_list() {
        let rules = vec![
            rule("r1", "lp1", Some("b1"), None, 10),
            rule("r2", "lp2", Some("b1"), None, 30),
        ];
        let selected = rules_for_price_list(&rules, "lp2");
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "r2");
    }

    #[test]
    fn test_price_products_marks_up_sale_price_without_cost() {
        let rules = vec![rule("r1", "lp", Some("b1"), None, 20)];
        let priced = price_products(
            vec![
                product(100, 130, Some("b1"), None),
                product(0, 95, Some("b1"), None),
                product(0, 95, Some("b9"), None),
            ],
            &rules,
        )
        .unwrap();
        assert_eq!(priced[0].price, Money::from_units(120));
        assert_eq!(priced[1].price, Money::from_units(114));
        assert_eq!(priced[2].price, Money::from_units(95));
    }

    #[test]
    fn test_price_overflow_is_rejected() {
        let rules = vec![rule("r1", "lp", Some("b1"), None, 20)];
        let mut huge = product(0, 0, Some("b1"), None);
        huge.cost_price = Money::from_decimal(Decimal::MAX);

        let err = price_products(vec![product(100, 0, Some("b1"), None), huge], &rules).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("price is too large"));
    }
}
