use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub hashed_password: String,
    pub role: String,
}

// Public profile; the hash never leaves the server.
#[derive(Debug, Serialize)]
pub struct UserOut {
    pub id: i64,
    pub email: String,
    pub role: String,
}

impl From<User> for UserOut {
    fn from(user: User) -> UserOut {
        UserOut {
            id: user.id,
            email: user.email,
            role: user.role,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenOut {
    pub access_token: String,
    pub token_type: String,
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CategoryInput {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ProductInput {
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock: i32,
    pub category_id: i64,
}

// One row of the products-with-category join used by every product read path.
#[derive(Debug, FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock: i32,
    pub category_id: i64,
    pub category_name: String,
}

#[derive(Debug, Serialize)]
pub struct ProductOut {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock: i32,
    pub category: Category,
}

impl From<ProductRow> for ProductOut {
    fn from(row: ProductRow) -> ProductOut {
        ProductOut {
            id: row.id,
            name: row.name,
            description: row.description,
            price: row.price,
            stock: row.stock,
            category: Category {
                id: row.category_id,
                name: row.category_name,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProductQuery {
    pub category_id: Option<i64>,
    pub q: Option<String>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Cart
// ---------------------------------------------------------------------------

#[derive(Debug, FromRow)]
pub struct Cart {
    pub id: i64,
    pub user_id: i64,
}

// Cart line joined with its product and category.
#[derive(Debug, FromRow)]
pub struct CartLineRow {
    pub product_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock: i32,
    pub category_id: i64,
    pub category_name: String,
    pub quantity: i32,
}

impl CartLineRow {
    pub fn into_product_out(self) -> ProductOut {
        ProductOut {
            id: self.product_id,
            name: self.name,
            description: self.description,
            price: self.price,
            stock: self.stock,
            category: Category {
                id: self.category_id,
                name: self.category_name,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CartItemOut {
    pub quantity: i32,
    pub product: ProductOut,
}

impl From<CartLineRow> for CartItemOut {
    fn from(row: CartLineRow) -> CartItemOut {
        CartItemOut {
            quantity: row.quantity,
            product: row.into_product_out(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CartOut {
    pub id: i64,
    pub items: Vec<CartItemOut>,
    pub total_price: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct CartItemAdd {
    pub product_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct CartItemUpdate {
    pub quantity: i32,
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Shipped,
    Delivered,
    Cancelled,
}

#[derive(Debug, FromRow)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub order_date: DateTime<Utc>,
    pub status: OrderStatus,
}

// Order line joined with its product and category.
#[derive(Debug, FromRow)]
pub struct OrderLineRow {
    pub order_id: i64,
    pub product_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock: i32,
    pub category_id: i64,
    pub category_name: String,
    pub quantity: i32,
    pub price_at_purchase: Decimal,
}

#[derive(Debug, Serialize)]
pub struct OrderItemOut {
    pub product: ProductOut,
    pub quantity: i32,
    pub price_at_purchase: Decimal,
}

impl From<OrderLineRow> for OrderItemOut {
    fn from(row: OrderLineRow) -> OrderItemOut {
        OrderItemOut {
            quantity: row.quantity,
            price_at_purchase: row.price_at_purchase,
            product: ProductOut {
                id: row.product_id,
                name: row.name,
                description: row.description,
                price: row.price,
                stock: row.stock,
                category: Category {
                    id: row.category_id,
                    name: row.category_name,
                },
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderOut {
    pub id: i64,
    pub status: OrderStatus,
    pub total_price: Decimal,
    pub items: Vec<OrderItemOut>,
}

#[derive(Debug, Serialize)]
pub struct AdminOrderOut {
    pub id: i64,
    pub status: OrderStatus,
    pub total_price: Decimal,
    pub items: Vec<OrderItemOut>,
    pub user: UserOut,
}

#[derive(Debug, Deserialize)]
pub struct OrderStatusUpdate {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Reviews
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, FromRow)]
pub struct Review {
    pub id: i64,
    pub product_id: i64,
    pub user_id: i64,
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewCreate {
    pub product_id: i64,
    pub rating: i32,
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProductReviewsOut {
    pub average_rating: Option<f64>,
    pub reviews: Vec<Review>,
}

// ---------------------------------------------------------------------------
// Derived values. Totals and averages are computed at read time, never stored.
// ---------------------------------------------------------------------------

pub fn cart_total(items: &[CartItemOut]) -> Decimal {
    items
        .iter()
        .map(|item| item.product.price * Decimal::from(item.quantity))
        .sum()
}

pub fn order_total(items: &[OrderItemOut]) -> Decimal {
    items
        .iter()
        .map(|item| item.price_at_purchase * Decimal::from(item.quantity))
        .sum()
}

pub fn average_rating(ratings: &[i32]) -> Option<f64> {
    if ratings.is_empty() {
        return None;
    }

    let sum: i32 = ratings.iter().sum();
    Some(f64::from(sum) / ratings.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(price: Decimal) -> ProductOut {
        ProductOut {
            id: 1,
            name: "Test Product".to_string(),
            description: None,
            price,
            stock: 10,
            category: Category {
                id: 1,
                name: "Test Category".to_string(),
            },
        }
    }

    #[test]
    fn cart_total_sums_price_times_quantity() {
        let items = vec![
            CartItemOut {
                quantity: 2,
                product: product(Decimal::new(9999, 2)), // 99.99
            },
            CartItemOut {
                quantity: 1,
                product: product(Decimal::new(5000, 2)), // 50.00
            },
        ];

        assert_eq!(cart_total(&items), Decimal::new(24998, 2)); // 249.98
    }

    #[test]
    fn cart_total_of_no_items_is_zero() {
        assert_eq!(cart_total(&[]), Decimal::ZERO);
    }

    #[test]
    fn order_total_uses_the_price_snapshot_not_the_current_price() {
        let items = vec![OrderItemOut {
            quantity: 3,
            // The product has since been repriced to 80.00 ...
            product: product(Decimal::new(8000, 2)),
            // ... but the order was placed at 60.00.
            price_at_purchase: Decimal::new(6000, 2),
        }];

        assert_eq!(order_total(&items), Decimal::new(18000, 2)); // 180.00
    }

    #[test]
    fn average_rating_is_the_mean() {
        assert_eq!(average_rating(&[5, 3, 4]), Some(4.0));
        assert_eq!(average_rating(&[1]), Some(1.0));
        assert_eq!(average_rating(&[4, 5]), Some(4.5));
    }

    #[test]
    fn average_rating_of_no_reviews_is_absent() {
        assert_eq!(average_rating(&[]), None);
    }

    #[test]
    fn order_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(OrderStatus::Pending).unwrap(),
            serde_json::json!("pending")
        );
        assert_eq!(
            serde_json::from_value::<OrderStatus>(serde_json::json!("shipped")).unwrap(),
            OrderStatus::Shipped
        );
    }
}
