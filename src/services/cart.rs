use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    entities::order::OrderType,
    errors::ServiceError,
    money::{compute_tax, compute_total, line_total, round2, to_minor_units},
    providers::CatalogProvider,
    services::orders::{CartLine, CreateOrderRequest},
};

/// Client-side basket. Never persisted; [`Cart::checkout`] turns it into a
/// [`CreateOrderRequest`] for the order store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub order_type: OrderType,
    pub customer_name: Option<String>,
    pub payment_method: Option<String>,
    pub created_by: Option<String>,
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new(order_type: OrderType) -> Self {
        Self {
            order_type,
            customer_name: None,
            payment_method: None,
            created_by: None,
            lines: Vec::new(),
        }
    }

    pub fn with_customer(mut self, name: impl Into<String>) -> Self {
        self.customer_name = Some(name.into());
        self
    }

    pub fn with_payment_method(mut self, method: impl Into<String>) -> Self {
        self.payment_method = Some(method.into());
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.created_by = Some(actor.into());
        self
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Adds a line. Re-adding the same item at the same price with the same
    /// notes bumps the existing line's quantity instead.
    pub fn add_line(
        &mut self,
        menu_item_id: i64,
        name: impl Into<String>,
        quantity: i32,
        unit_price: Decimal,
        notes: Option<String>,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidAmount(format!(
                "quantity must be positive, got {}",
                quantity
            )));
        }
        if unit_price < Decimal::ZERO {
            return Err(ServiceError::InvalidAmount(format!(
                "unit price must not be negative, got {}",
                unit_price
            )));
        }
        // rejects sub-cent prices
        to_minor_units(unit_price)?;

        if let Some(existing) = self.lines.iter_mut().find(|l| {
            l.menu_item_id == menu_item_id && l.unit_price == unit_price && l.notes == notes
        }) {
            existing.quantity = existing.quantity.checked_add(quantity).ok_or_else(|| {
                ServiceError::InvalidAmount("quantity overflows".to_string())
            })?;
            return Ok(());
        }

        self.lines.push(CartLine {
            menu_item_id,
            name: name.into(),
            quantity,
            unit_price,
            notes,
        });
        Ok(())
    }

    /// Adds an item looked up in the catalog, capturing its current name and
    /// price.
    pub async fn add_from_catalog(
        &mut self,
        catalog: &dyn CatalogProvider,
        menu_item_id: i64,
        quantity: i32,
        notes: Option<String>,
    ) -> Result<(), ServiceError> {
        let item = catalog
            .get_menu_item(menu_item_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Menu item {} not found", menu_item_id)))?;

        if !item.available {
            warn!(menu_item_id, "Attempted to add an unavailable menu item");
            return Err(ServiceError::ValidationError(format!(
                "{} is currently unavailable",
                item.name
            )));
        }

        debug!(menu_item_id, quantity, price = %item.price, "Adding catalog item to cart");
        self.add_line(item.id, item.name, quantity, item.price, notes)
    }

    /// Removes every line for `menu_item_id`; returns whether anything was removed.
    pub fn remove_item(&mut self, menu_item_id: i64) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| l.menu_item_id != menu_item_id);
        self.lines.len() != before
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn subtotal(&self) -> Decimal {
        round2(
            self.lines
                .iter()
                .map(|l| line_total(l.quantity, l.unit_price))
                .sum(),
        )
    }

    /// Prices the cart at `tax_rate`.
    pub fn checkout(&self, tax_rate: Decimal) -> Result<CreateOrderRequest, ServiceError> {
        if self.lines.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        let subtotal = self.subtotal();
        let tax_amount = compute_tax(subtotal, tax_rate);
        let total_amount = compute_total(subtotal, tax_amount);

        Ok(CreateOrderRequest {
            order_type: self.order_type,
            customer_name: self.customer_name.clone(),
            payment_method: self.payment_method.clone(),
            created_by: self.created_by.clone(),
            items: self.lines.clone(),
            subtotal,
            tax_amount,
            total_amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{InMemoryCatalog, MenuItem};
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::new(
            vec![],
            vec![
                MenuItem {
                    id: 1,
                    name: "Burger".into(),
                    description: None,
                    price: dec!(8.99),
                    category_id: Some(1),
                    available: true,
                },
                MenuItem {
                    id: 2,
                    name: "Soda".into(),
                    description: None,
                    price: dec!(2.99),
                    category_id: Some(2),
                    available: true,
                },
                MenuItem {
                    id: 9,
                    name: "Sold Out Shake".into(),
                    description: None,
                    price: dec!(4.00),
                    category_id: Some(2),
                    available: false,
                },
            ],
        )
    }

    #[tokio::test]
    async fn checkout_prices_the_reference_cart() {
        let catalog = catalog();
        let mut cart = Cart::new(OrderType::DineIn).with_customer("Ada");
        cart.add_from_catalog(&catalog, 1, 2, None).await.unwrap();
        cart.add_from_catalog(&catalog, 2, 1, None).await.unwrap();

        let request = cart.checkout(dec!(0.10)).unwrap();
        assert_eq!(request.subtotal, dec!(20.97));
        assert_eq!(request.tax_amount, dec!(2.10));
        assert_eq!(request.total_amount, dec!(23.07));
        assert_eq!(request.items[0].name, "Burger");
        assert_eq!(request.customer_name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn catalog_errors_surface() {
        let catalog = catalog();
        let mut cart = Cart::new(OrderType::Takeout);

        assert_matches!(
            cart.add_from_catalog(&catalog, 404, 1, None).await,
            Err(ServiceError::NotFound(_))
        );
        assert_matches!(
            cart.add_from_catalog(&catalog, 9, 1, None).await,
            Err(ServiceError::ValidationError(_))
        );
        assert!(cart.is_empty());
    }

    #[test]
    fn repeated_items_merge() {
        let mut cart = Cart::new(OrderType::Takeout);
        cart.add_line(1, "Burger", 1, dec!(8.99), None).unwrap();
        cart.add_line(1, "Burger", 2, dec!(8.99), None).unwrap();
        cart.add_line(1, "Burger", 1, dec!(8.99), Some("no onions".into()))
            .unwrap();

        assert_eq!(cart.lines().len(), 2);
        assert_eq!(cart.lines()[0].quantity, 3);
        assert!(cart.remove_item(1));
        assert!(cart.is_empty());
    }

    #[test]
    fn invalid_lines_are_refused() {
        let mut cart = Cart::new(OrderType::Takeout);
        assert_matches!(
            cart.add_line(1, "Burger", 0, dec!(8.99), None),
            Err(ServiceError::InvalidAmount(_))
        );
        assert_matches!(
            cart.add_line(1, "Burger", 1, dec!(-1), None),
            Err(ServiceError::InvalidAmount(_))
        );
        assert_matches!(
            cart.add_line(1, "Burger", 1, dec!(0.001), None),
            Err(ServiceError::InvalidAmount(_))
        );
    }

    #[test]
    fn empty_cart_cannot_check_out() {
        let cart = Cart::new(OrderType::DineIn);
        assert_matches!(cart.checkout(dec!(0.08)), Err(ServiceError::EmptyCart));
    }
}
