use std::collections::HashMap;

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::auth;
use crate::cart;
use crate::errors::ApiError;
use crate::models::{
    order_total, AdminOrderOut, Order, OrderItemOut, OrderLineRow, OrderOut, OrderStatus,
    OrderStatusUpdate, PageQuery, User, UserOut,
};

const ORDER_LINES_SQL: &str =
    "SELECT oi.order_id, p.id AS product_id, p.name, p.description, p.price, p.stock, \
            p.category_id, c.name AS category_name, oi.quantity, oi.price AS price_at_purchase \
     FROM order_items oi \
     JOIN products p ON p.id = oi.product_id \
     JOIN categories c ON c.id = p.category_id \
     WHERE oi.order_id = ANY($1) \
     ORDER BY oi.order_id, p.id";

const DEFAULT_ADMIN_PAGE_SIZE: i64 = 100;
const MAX_ADMIN_PAGE_SIZE: i64 = 250;

// One query for all listed orders; grouped in memory afterwards.
async fn load_order_items(
    pool: &PgPool,
    order_ids: &[i64],
) -> Result<HashMap<i64, Vec<OrderItemOut>>, ApiError> {
    let mut grouped: HashMap<i64, Vec<OrderItemOut>> = HashMap::new();
    if order_ids.is_empty() {
        return Ok(grouped);
    }

    let rows = sqlx::query_as::<_, OrderLineRow>(ORDER_LINES_SQL)
        .bind(order_ids)
        .fetch_all(pool)
        .await?;

    for row in rows {
        grouped
            .entry(row.order_id)
            .or_default()
            .push(OrderItemOut::from(row));
    }

    Ok(grouped)
}

fn order_out(order: Order, items: Vec<OrderItemOut>) -> OrderOut {
    let total_price = order_total(&items);
    OrderOut {
        id: order.id,
        status: order.status,
        total_price,
        items,
    }
}

fn validate_page(query: &PageQuery) -> Result<(i64, i64), ApiError> {
    let skip = query.skip.unwrap_or(0);
    if skip < 0 {
        return Err(ApiError::Validation(
            "skip must be non-negative.".to_string(),
        ));
    }

    let limit = query.limit.unwrap_or(DEFAULT_ADMIN_PAGE_SIZE);
    if limit < 1 || limit > MAX_ADMIN_PAGE_SIZE {
        return Err(ApiError::Validation(format!(
            "limit must be between 1 and {}.",
            MAX_ADMIN_PAGE_SIZE
        )));
    }

    Ok((skip, limit))
}

// ---------------------------------------------------------------------------
// Checkout
// ---------------------------------------------------------------------------

// Converts the caller's cart into an order, decrements stock and clears the
// cart, all inside one transaction; any early return rolls everything back.
pub async fn create_order(
    pool: web::Data<PgPool>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user = auth::current_user(&pool, &req).await?;

    let mut tx = pool.begin().await?;

    let cart = sqlx::query_as::<_, crate::models::Cart>(
        "SELECT id, user_id FROM carts WHERE user_id = $1",
    )
    .bind(user.id)
    .fetch_optional(&mut *tx)
    .await?;

    let lines = match &cart {
        Some(cart) => cart::cart_lines(&mut *tx, cart.id).await?,
        None => Vec::new(),
    };
    if lines.is_empty() {
        return Err(ApiError::BusinessRule(
            "Cannot create an order from an empty cart.".to_string(),
        ));
    }

    // All-or-nothing: every line must be satisfiable before anything mutates.
    for line in &lines {
        if line.quantity > line.stock {
            return Err(ApiError::BusinessRule("Insufficient stock".to_string()));
        }
    }

    let order = sqlx::query_as::<_, Order>(
        "INSERT INTO orders (user_id) VALUES ($1) RETURNING id, user_id, order_date, status",
    )
    .bind(user.id)
    .fetch_one(&mut *tx)
    .await?;

    let mut items = Vec::with_capacity(lines.len());
    for line in lines {
        sqlx::query(
            "INSERT INTO order_items (order_id, product_id, quantity, price) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(order.id)
        .bind(line.product_id)
        .bind(line.quantity)
        .bind(line.price)
        .execute(&mut *tx)
        .await?;

        // Conditional decrement: a concurrent checkout that drained the stock
        // after the pre-check above leaves zero affected rows, and the whole
        // transaction rolls back instead of driving stock negative.
        let updated =
            sqlx::query("UPDATE products SET stock = stock - $1 WHERE id = $2 AND stock >= $1")
                .bind(line.quantity)
                .bind(line.product_id)
                .execute(&mut *tx)
                .await?;
        if updated.rows_affected() == 0 {
            return Err(ApiError::BusinessRule("Insufficient stock".to_string()));
        }

        items.push(OrderItemOut {
            quantity: line.quantity,
            price_at_purchase: line.price,
            product: line.into_product_out(),
        });
    }

    let cart_id = cart.map(|cart| cart.id).unwrap_or_default();
    sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
        .bind(cart_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(HttpResponse::Created().json(order_out(order, items)))
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

pub async fn list_my_orders(
    pool: web::Data<PgPool>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user = auth::current_user(&pool, &req).await?;

    let orders = sqlx::query_as::<_, Order>(
        "SELECT id, user_id, order_date, status FROM orders \
         WHERE user_id = $1 ORDER BY order_date DESC",
    )
    .bind(user.id)
    .fetch_all(pool.get_ref())
    .await?;

    let order_ids: Vec<i64> = orders.iter().map(|order| order.id).collect();
    let mut items_by_order = load_order_items(&pool, &order_ids).await?;

    let result: Vec<OrderOut> = orders
        .into_iter()
        .map(|order| {
            let items = items_by_order.remove(&order.id).unwrap_or_default();
            order_out(order, items)
        })
        .collect();

    Ok(HttpResponse::Ok().json(result))
}

pub async fn get_order(
    pool: web::Data<PgPool>,
    order_id: web::Path<i64>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user = auth::current_user(&pool, &req).await?;
    let order_id = order_id.into_inner();

    let order = sqlx::query_as::<_, Order>(
        "SELECT id, user_id, order_date, status FROM orders WHERE id = $1",
    )
    .bind(order_id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("Order with id {} not found.", order_id)))?;

    if order.user_id != user.id && user.role != "admin" {
        return Err(ApiError::Forbidden(
            "Not authorized to view this order.".to_string(),
        ));
    }

    let mut items_by_order = load_order_items(&pool, &[order.id]).await?;
    let items = items_by_order.remove(&order.id).unwrap_or_default();

    Ok(HttpResponse::Ok().json(order_out(order, items)))
}

// ---------------------------------------------------------------------------
// Administration
// ---------------------------------------------------------------------------

#[derive(Debug, FromRow)]
struct AdminOrderRow {
    id: i64,
    user_id: i64,
    order_date: DateTime<Utc>,
    status: OrderStatus,
    email: String,
    role: String,
}

fn admin_order_out(row: AdminOrderRow, items: Vec<OrderItemOut>) -> AdminOrderOut {
    let total_price = order_total(&items);
    AdminOrderOut {
        id: row.id,
        status: row.status,
        total_price,
        items,
        user: UserOut {
            id: row.user_id,
            email: row.email,
            role: row.role,
        },
    }
}

pub async fn admin_list_orders(
    pool: web::Data<PgPool>,
    query: web::Query<PageQuery>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    auth::current_admin(&pool, &req).await?;
    let (skip, limit) = validate_page(&query)?;

    let rows = sqlx::query_as::<_, AdminOrderRow>(
        "SELECT o.id, o.user_id, o.order_date, o.status, u.email, u.role \
         FROM orders o \
         JOIN users u ON u.id = o.user_id \
         ORDER BY o.order_date DESC \
         LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(skip)
    .fetch_all(pool.get_ref())
    .await?;

    let order_ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
    let mut items_by_order = load_order_items(&pool, &order_ids).await?;

    let result: Vec<AdminOrderOut> = rows
        .into_iter()
        .map(|row| {
            let items = items_by_order.remove(&row.id).unwrap_or_default();
            admin_order_out(row, items)
        })
        .collect();

    Ok(HttpResponse::Ok().json(result))
}

pub async fn admin_update_status(
    pool: web::Data<PgPool>,
    order_id: web::Path<i64>,
    input: web::Json<OrderStatusUpdate>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    auth::current_admin(&pool, &req).await?;
    let order_id = order_id.into_inner();

    // Any status value may be set; there is no state machine beyond the enum.
    let order = sqlx::query_as::<_, Order>(
        "UPDATE orders SET status = $1 WHERE id = $2 \
         RETURNING id, user_id, order_date, status",
    )
    .bind(input.status)
    .bind(order_id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("Order with id {} not found.", order_id)))?;

    let owner = sqlx::query_as::<_, User>(
        "SELECT id, email, hashed_password, role FROM users WHERE id = $1",
    )
    .bind(order.user_id)
    .fetch_one(pool.get_ref())
    .await?;

    let mut items_by_order = load_order_items(&pool, &[order.id]).await?;
    let items = items_by_order.remove(&order.id).unwrap_or_default();
    let total_price = order_total(&items);

    Ok(HttpResponse::Ok().json(AdminOrderOut {
        id: order.id,
        status: order.status,
        total_price,
        items,
        user: UserOut::from(owner),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(skip: Option<i64>, limit: Option<i64>) -> PageQuery {
        PageQuery { skip, limit }
    }

    #[test]
    fn pagination_defaults_apply() {
        assert_eq!(
            validate_page(&page(None, None)).unwrap(),
            (0, DEFAULT_ADMIN_PAGE_SIZE)
        );
        assert_eq!(validate_page(&page(Some(40), Some(20))).unwrap(), (40, 20));
    }

    #[test]
    fn pagination_bounds_are_enforced() {
        assert!(validate_page(&page(Some(-1), None)).is_err());
        assert!(validate_page(&page(None, Some(0))).is_err());
        assert!(validate_page(&page(None, Some(MAX_ADMIN_PAGE_SIZE + 1))).is_err());
        assert!(validate_page(&page(None, Some(MAX_ADMIN_PAGE_SIZE))).is_ok());
    }
}
