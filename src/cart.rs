use actix_web::{web, HttpRequest, HttpResponse};
use sqlx::PgPool;

use crate::auth;
use crate::catalog;
use crate::errors::ApiError;
use crate::models::{
    cart_total, Cart, CartItemAdd, CartItemOut, CartItemUpdate, CartLineRow, CartOut,
};

pub(crate) const CART_LINES_SQL: &str =
    "SELECT p.id AS product_id, p.name, p.description, p.price, p.stock, p.category_id, \
            c.name AS category_name, ci.quantity \
     FROM cart_items ci \
     JOIN products p ON p.id = ci.product_id \
     JOIN categories c ON c.id = p.category_id \
     WHERE ci.cart_id = $1 \
     ORDER BY p.id";

pub(crate) async fn cart_lines<'e, E>(
    executor: E,
    cart_id: i64,
) -> Result<Vec<CartLineRow>, sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query_as::<_, CartLineRow>(CART_LINES_SQL)
        .bind(cart_id)
        .fetch_all(executor)
        .await
}

// The cart is created lazily on first access and never deleted afterwards.
async fn get_or_create_cart(pool: &PgPool, user_id: i64) -> Result<Cart, ApiError> {
    sqlx::query("INSERT INTO carts (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .execute(pool)
        .await?;

    let cart = sqlx::query_as::<_, Cart>("SELECT id, user_id FROM carts WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    Ok(cart)
}

async fn find_cart(pool: &PgPool, user_id: i64) -> Result<Option<Cart>, ApiError> {
    let cart = sqlx::query_as::<_, Cart>("SELECT id, user_id FROM carts WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(cart)
}

pub async fn view_cart(pool: web::Data<PgPool>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let user = auth::current_user(&pool, &req).await?;
    let cart = get_or_create_cart(&pool, user.id).await?;

    let items: Vec<CartItemOut> = cart_lines(pool.get_ref(), cart.id)
        .await?
        .into_iter()
        .map(CartItemOut::from)
        .collect();

    let total_price = cart_total(&items);

    Ok(HttpResponse::Ok().json(CartOut {
        id: cart.id,
        items,
        total_price,
    }))
}

pub async fn add_item(
    pool: web::Data<PgPool>,
    input: web::Json<CartItemAdd>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user = auth::current_user(&pool, &req).await?;
    let input = input.into_inner();

    if input.quantity < 1 {
        return Err(ApiError::Validation(
            "Quantity must be at least 1.".to_string(),
        ));
    }

    let product = catalog::fetch_product(pool.get_ref(), input.product_id)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("Product with id {} not found.", input.product_id))
        })?;

    let cart = get_or_create_cart(&pool, user.id).await?;

    let existing = sqlx::query_scalar::<_, i32>(
        "SELECT quantity FROM cart_items WHERE cart_id = $1 AND product_id = $2",
    )
    .bind(cart.id)
    .bind(input.product_id)
    .fetch_optional(pool.get_ref())
    .await?;

    // Adding a product that is already in the cart merges the quantities.
    let combined = existing.unwrap_or(0) + input.quantity;
    if combined > product.stock {
        return Err(ApiError::BusinessRule("Insufficient stock".to_string()));
    }

    sqlx::query(
        "INSERT INTO cart_items (cart_id, product_id, quantity) VALUES ($1, $2, $3) \
         ON CONFLICT (cart_id, product_id) \
         DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity",
    )
    .bind(cart.id)
    .bind(input.product_id)
    .bind(input.quantity)
    .execute(pool.get_ref())
    .await?;

    Ok(HttpResponse::Created().json(CartItemOut {
        quantity: combined,
        product: product.into(),
    }))
}

pub async fn update_item(
    pool: web::Data<PgPool>,
    product_id: web::Path<i64>,
    input: web::Json<CartItemUpdate>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user = auth::current_user(&pool, &req).await?;
    let product_id = product_id.into_inner();
    let input = input.into_inner();

    if input.quantity < 1 {
        return Err(ApiError::Validation(
            "Quantity must be at least 1.".to_string(),
        ));
    }

    let line_missing = ApiError::NotFound(format!(
        "Product with id {} is not in the cart.",
        product_id
    ));

    let cart = match find_cart(&pool, user.id).await? {
        Some(cart) => cart,
        None => return Err(line_missing),
    };

    let existing = sqlx::query_scalar::<_, i32>(
        "SELECT quantity FROM cart_items WHERE cart_id = $1 AND product_id = $2",
    )
    .bind(cart.id)
    .bind(product_id)
    .fetch_optional(pool.get_ref())
    .await?;
    if existing.is_none() {
        return Err(line_missing);
    }

    let product = catalog::fetch_product(pool.get_ref(), product_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product with id {} not found.", product_id)))?;

    if input.quantity > product.stock {
        return Err(ApiError::BusinessRule("Insufficient stock".to_string()));
    }

    sqlx::query("UPDATE cart_items SET quantity = $1 WHERE cart_id = $2 AND product_id = $3")
        .bind(input.quantity)
        .bind(cart.id)
        .bind(product_id)
        .execute(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(CartItemOut {
        quantity: input.quantity,
        product: product.into(),
    }))
}

// Removal is idempotent: deleting a line that is not there is a success.
pub async fn remove_item(
    pool: web::Data<PgPool>,
    product_id: web::Path<i64>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user = auth::current_user(&pool, &req).await?;

    if let Some(cart) = find_cart(&pool, user.id).await? {
        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND product_id = $2")
            .bind(cart.id)
            .bind(product_id.into_inner())
            .execute(pool.get_ref())
            .await?;
    }

    Ok(HttpResponse::NoContent().finish())
}

// Clearing an already-empty cart is a no-op success.
pub async fn clear_cart(pool: web::Data<PgPool>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let user = auth::current_user(&pool, &req).await?;

    if let Some(cart) = find_cart(&pool, user.id).await? {
        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart.id)
            .execute(pool.get_ref())
            .await?;
    }

    Ok(HttpResponse::NoContent().finish())
}
