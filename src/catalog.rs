use actix_web::{web, HttpRequest, HttpResponse};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::auth;
use crate::errors::{is_foreign_key_violation, ApiError};
use crate::models::{
    average_rating, Category, CategoryInput, ProductInput, ProductOut, ProductQuery,
    ProductReviewsOut, ProductRow, Review,
};

// Every product read path goes through this join so responses always carry
// the category without a second query per row.
const PRODUCT_SELECT: &str =
    "SELECT p.id, p.name, p.description, p.price, p.stock, p.category_id, \
            c.name AS category_name \
     FROM products p \
     JOIN categories c ON c.id = p.category_id";

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 100;

pub(crate) async fn fetch_product<'e, E>(
    executor: E,
    product_id: i64,
) -> Result<Option<ProductRow>, sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query_as::<_, ProductRow>(&format!("{} WHERE p.id = $1", PRODUCT_SELECT))
        .bind(product_id)
        .fetch_optional(executor)
        .await
}

fn page_window(skip: Option<i64>, limit: Option<i64>) -> (i64, i64) {
    let skip = skip.unwrap_or(0).max(0);
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    (skip, limit)
}

fn validate_category_name(name: &str) -> Result<(), ApiError> {
    let trimmed = name.trim();
    if trimmed.len() < 2 || trimmed.len() > 50 {
        return Err(ApiError::Validation(
            "Category name must be between 2 and 50 characters.".to_string(),
        ));
    }
    Ok(())
}

fn validate_product(input: &ProductInput) -> Result<(), ApiError> {
    if input.name.trim().is_empty() {
        return Err(ApiError::Validation(
            "Product name must not be empty.".to_string(),
        ));
    }
    if input.price <= Decimal::ZERO {
        return Err(ApiError::Validation(
            "Price must be greater than zero.".to_string(),
        ));
    }
    if input.stock < 0 {
        return Err(ApiError::Validation(
            "Stock must not be negative.".to_string(),
        ));
    }
    Ok(())
}

async fn fetch_category(pool: &PgPool, category_id: i64) -> Result<Category, ApiError> {
    let category = sqlx::query_as::<_, Category>("SELECT id, name FROM categories WHERE id = $1")
        .bind(category_id)
        .fetch_optional(pool)
        .await?;

    category.ok_or_else(|| {
        ApiError::NotFound(format!("Category with id {} not found.", category_id))
    })
}

// ---------------------------------------------------------------------------
// Categories (admin)
// ---------------------------------------------------------------------------

pub async fn create_category(
    pool: web::Data<PgPool>,
    input: web::Json<CategoryInput>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    auth::current_admin(&pool, &req).await?;
    let input = input.into_inner();
    validate_category_name(&input.name)?;

    let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM categories WHERE name = $1")
        .bind(&input.name)
        .fetch_optional(pool.get_ref())
        .await?;
    if existing.is_some() {
        return Err(ApiError::Validation(format!(
            "Category with name '{}' already exists.",
            input.name
        )));
    }

    let category = sqlx::query_as::<_, Category>(
        "INSERT INTO categories (name) VALUES ($1) RETURNING id, name",
    )
    .bind(&input.name)
    .fetch_one(pool.get_ref())
    .await
    .map_err(|e| {
        if crate::errors::is_unique_violation(&e) {
            ApiError::Conflict(format!("Category with name '{}' already exists.", input.name))
        } else {
            ApiError::Database(e)
        }
    })?;

    Ok(HttpResponse::Created().json(category))
}

pub async fn list_categories(
    pool: web::Data<PgPool>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    auth::current_admin(&pool, &req).await?;

    let categories =
        sqlx::query_as::<_, Category>("SELECT id, name FROM categories ORDER BY id")
            .fetch_all(pool.get_ref())
            .await?;

    Ok(HttpResponse::Ok().json(categories))
}

pub async fn get_category(
    pool: web::Data<PgPool>,
    category_id: web::Path<i64>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    auth::current_admin(&pool, &req).await?;

    let category = fetch_category(&pool, category_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(category))
}

pub async fn update_category(
    pool: web::Data<PgPool>,
    category_id: web::Path<i64>,
    input: web::Json<CategoryInput>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    auth::current_admin(&pool, &req).await?;
    let category_id = category_id.into_inner();
    let input = input.into_inner();

    fetch_category(&pool, category_id).await?;
    validate_category_name(&input.name)?;

    // The new name may not be taken by another category.
    let taken =
        sqlx::query_scalar::<_, i64>("SELECT id FROM categories WHERE name = $1 AND id <> $2")
            .bind(&input.name)
            .bind(category_id)
            .fetch_optional(pool.get_ref())
            .await?;
    if taken.is_some() {
        return Err(ApiError::Validation(format!(
            "Category with name '{}' already exists.",
            input.name
        )));
    }

    let category = sqlx::query_as::<_, Category>(
        "UPDATE categories SET name = $1 WHERE id = $2 RETURNING id, name",
    )
    .bind(&input.name)
    .bind(category_id)
    .fetch_one(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(category))
}

pub async fn delete_category(
    pool: web::Data<PgPool>,
    category_id: web::Path<i64>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    auth::current_admin(&pool, &req).await?;
    let category_id = category_id.into_inner();

    fetch_category(&pool, category_id).await?;

    sqlx::query("DELETE FROM categories WHERE id = $1")
        .bind(category_id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                ApiError::Conflict(format!(
                    "Category with id {} still has products.",
                    category_id
                ))
            } else {
                ApiError::Database(e)
            }
        })?;

    Ok(HttpResponse::NoContent().finish())
}

// ---------------------------------------------------------------------------
// Products (admin mutations)
// ---------------------------------------------------------------------------

pub async fn create_product(
    pool: web::Data<PgPool>,
    input: web::Json<ProductInput>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    auth::current_admin(&pool, &req).await?;
    let input = input.into_inner();
    validate_product(&input)?;

    let category = fetch_category(&pool, input.category_id).await?;

    let product_id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO products (name, description, price, stock, category_id) \
         VALUES ($1, $2, $3, $4, $5) RETURNING id",
    )
    .bind(&input.name)
    .bind(&input.description)
    .bind(input.price)
    .bind(input.stock)
    .bind(input.category_id)
    .fetch_one(pool.get_ref())
    .await?;

    Ok(HttpResponse::Created().json(ProductOut {
        id: product_id,
        name: input.name,
        description: input.description,
        price: input.price,
        stock: input.stock,
        category,
    }))
}

pub async fn update_product(
    pool: web::Data<PgPool>,
    product_id: web::Path<i64>,
    input: web::Json<ProductInput>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    auth::current_admin(&pool, &req).await?;
    let product_id = product_id.into_inner();
    let input = input.into_inner();

    fetch_product(pool.get_ref(), product_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product with id {} not found.", product_id)))?;

    validate_product(&input)?;
    let category = fetch_category(&pool, input.category_id).await?;

    sqlx::query(
        "UPDATE products SET name = $1, description = $2, price = $3, stock = $4, \
         category_id = $5 WHERE id = $6",
    )
    .bind(&input.name)
    .bind(&input.description)
    .bind(input.price)
    .bind(input.stock)
    .bind(input.category_id)
    .bind(product_id)
    .execute(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(ProductOut {
        id: product_id,
        name: input.name,
        description: input.description,
        price: input.price,
        stock: input.stock,
        category,
    }))
}

pub async fn delete_product(
    pool: web::Data<PgPool>,
    product_id: web::Path<i64>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    auth::current_admin(&pool, &req).await?;
    let product_id = product_id.into_inner();

    fetch_product(pool.get_ref(), product_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product with id {} not found.", product_id)))?;

    let mut tx = pool.begin().await?;

    // Cart lines are disposable state; clear them before the product goes.
    // Order items and reviews are permanent records and block the delete.
    sqlx::query("DELETE FROM cart_items WHERE product_id = $1")
        .bind(product_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(product_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                ApiError::Conflict(
                    "Product is referenced by existing orders or reviews.".to_string(),
                )
            } else {
                ApiError::Database(e)
            }
        })?;

    tx.commit().await?;

    Ok(HttpResponse::NoContent().finish())
}

// ---------------------------------------------------------------------------
// Products (public browsing)
// ---------------------------------------------------------------------------

pub async fn list_products(
    pool: web::Data<PgPool>,
    query: web::Query<ProductQuery>,
) -> Result<HttpResponse, ApiError> {
    let query = query.into_inner();
    let (skip, limit) = page_window(query.skip, query.limit);

    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        "{} \
         WHERE ($1::bigint IS NULL OR p.category_id = $1) \
           AND ($2::text IS NULL OR p.name ILIKE '%' || $2 || '%') \
         ORDER BY p.id \
         LIMIT $3 OFFSET $4",
        PRODUCT_SELECT
    ))
    .bind(query.category_id)
    .bind(query.q.as_deref())
    .bind(limit)
    .bind(skip)
    .fetch_all(pool.get_ref())
    .await?;

    let products: Vec<ProductOut> = rows.into_iter().map(ProductOut::from).collect();
    Ok(HttpResponse::Ok().json(products))
}

pub async fn get_product(
    pool: web::Data<PgPool>,
    product_id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let product_id = product_id.into_inner();

    let product = fetch_product(pool.get_ref(), product_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product with id {} not found.", product_id)))?;

    Ok(HttpResponse::Ok().json(ProductOut::from(product)))
}

pub async fn list_product_reviews(
    pool: web::Data<PgPool>,
    product_id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let product_id = product_id.into_inner();

    fetch_product(pool.get_ref(), product_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product with id {} not found.", product_id)))?;

    let reviews = sqlx::query_as::<_, Review>(
        "SELECT id, product_id, user_id, rating, comment, created_at \
         FROM reviews WHERE product_id = $1 ORDER BY created_at DESC",
    )
    .bind(product_id)
    .fetch_all(pool.get_ref())
    .await?;

    let ratings: Vec<i32> = reviews.iter().map(|review| review.rating).collect();

    Ok(HttpResponse::Ok().json(ProductReviewsOut {
        average_rating: average_rating(&ratings),
        reviews,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_window_defaults_and_clamps() {
        assert_eq!(page_window(None, None), (0, DEFAULT_PAGE_SIZE));
        assert_eq!(page_window(Some(20), Some(10)), (20, 10));
        assert_eq!(page_window(Some(-5), Some(0)), (0, 1));
        assert_eq!(page_window(None, Some(10_000)), (0, MAX_PAGE_SIZE));
    }

    #[test]
    fn category_names_must_be_2_to_50_characters() {
        assert!(validate_category_name("Books").is_ok());
        assert!(validate_category_name("x").is_err());
        assert!(validate_category_name("  x  ").is_err());
        assert!(validate_category_name(&"a".repeat(51)).is_err());
        assert!(validate_category_name(&"a".repeat(50)).is_ok());
    }

    #[test]
    fn products_need_a_positive_price_and_non_negative_stock() {
        let input = |price: Decimal, stock: i32| ProductInput {
            name: "Widget".to_string(),
            description: None,
            price,
            stock,
            category_id: 1,
        };

        assert!(validate_product(&input(Decimal::new(9999, 2), 10)).is_ok());
        assert!(validate_product(&input(Decimal::ZERO, 10)).is_err());
        assert!(validate_product(&input(Decimal::new(-100, 2), 10)).is_err());
        assert!(validate_product(&input(Decimal::new(9999, 2), -1)).is_err());

        let mut nameless = input(Decimal::new(9999, 2), 10);
        nameless.name = "   ".to_string();
        assert!(validate_product(&nameless).is_err());
    }
}
