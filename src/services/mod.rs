// Checkout
pub mod cart;
pub mod order_number;

// Order store, the only writer of orders and order items
pub mod orders;

// Read-side views
pub mod kitchen;
pub mod reports;
