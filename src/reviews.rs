use actix_web::{web, HttpRequest, HttpResponse};
use sqlx::PgPool;

use crate::auth;
use crate::errors::{is_unique_violation, ApiError};
use crate::models::{Review, ReviewCreate};

const MAX_COMMENT_LENGTH: usize = 1000;

fn validate_review(input: &ReviewCreate) -> Result<(), ApiError> {
    if !(1..=5).contains(&input.rating) {
        return Err(ApiError::Validation(
            "Rating must be between 1 and 5.".to_string(),
        ));
    }

    if let Some(comment) = &input.comment {
        if comment.chars().count() > MAX_COMMENT_LENGTH {
            return Err(ApiError::Validation(format!(
                "Comment must be at most {} characters.",
                MAX_COMMENT_LENGTH
            )));
        }
    }

    Ok(())
}

pub async fn create_review(
    pool: web::Data<PgPool>,
    input: web::Json<ReviewCreate>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user = auth::current_user(&pool, &req).await?;
    let input = input.into_inner();
    validate_review(&input)?;

    let product = sqlx::query_scalar::<_, i64>("SELECT id FROM products WHERE id = $1")
        .bind(input.product_id)
        .fetch_optional(pool.get_ref())
        .await?;
    if product.is_none() {
        return Err(ApiError::NotFound(format!(
            "Product with id {} not found.",
            input.product_id
        )));
    }

    // Proof of purchase: any order of the caller containing this product,
    // regardless of status.
    let purchase = sqlx::query_scalar::<_, i64>(
        "SELECT o.id FROM orders o \
         JOIN order_items oi ON oi.order_id = o.id \
         WHERE o.user_id = $1 AND oi.product_id = $2 \
         LIMIT 1",
    )
    .bind(user.id)
    .bind(input.product_id)
    .fetch_optional(pool.get_ref())
    .await?;
    if purchase.is_none() {
        return Err(ApiError::Forbidden(
            "You can only review products you have purchased.".to_string(),
        ));
    }

    // Duplicates are not pre-checked: the unique constraint on
    // (user_id, product_id) decides, and its violation becomes a 409.
    let review = sqlx::query_as::<_, Review>(
        "INSERT INTO reviews (user_id, product_id, rating, comment) \
         VALUES ($1, $2, $3, $4) \
         RETURNING id, product_id, user_id, rating, comment, created_at",
    )
    .bind(user.id)
    .bind(input.product_id)
    .bind(input.rating)
    .bind(&input.comment)
    .fetch_one(pool.get_ref())
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::Conflict("You have already submitted a review for this product.".to_string())
        } else {
            ApiError::Database(e)
        }
    })?;

    Ok(HttpResponse::Created().json(review))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(rating: i32, comment: Option<String>) -> ReviewCreate {
        ReviewCreate {
            product_id: 1,
            rating,
            comment,
        }
    }

    #[test]
    fn rating_must_be_between_1_and_5() {
        assert!(validate_review(&review(1, None)).is_ok());
        assert!(validate_review(&review(5, None)).is_ok());
        assert!(validate_review(&review(0, None)).is_err());
        assert!(validate_review(&review(6, None)).is_err());
        assert!(validate_review(&review(-3, None)).is_err());
    }

    #[test]
    fn comment_length_is_bounded() {
        assert!(validate_review(&review(4, Some("Amazing product!".to_string()))).is_ok());
        assert!(validate_review(&review(4, Some("x".repeat(1000)))).is_ok());
        assert!(validate_review(&review(4, Some("x".repeat(1001)))).is_err());
    }
}
