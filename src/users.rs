use actix_web::{web, HttpRequest, HttpResponse};
use sqlx::PgPool;

use crate::auth;
use crate::config::Config;
use crate::errors::{is_unique_violation, ApiError};
use crate::models::{LoginInput, RegisterInput, TokenOut, User, UserOut};

fn validate_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}

pub async fn register(
    pool: web::Data<PgPool>,
    input: web::Json<RegisterInput>,
) -> Result<HttpResponse, ApiError> {
    let input = input.into_inner();

    if !validate_email(&input.email) {
        return Err(ApiError::Validation(
            "A valid email address is required.".to_string(),
        ));
    }
    if input.password.is_empty() {
        return Err(ApiError::Validation(
            "Password must not be empty.".to_string(),
        ));
    }

    let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE email = $1")
        .bind(&input.email)
        .fetch_optional(pool.get_ref())
        .await?;
    if existing.is_some() {
        return Err(ApiError::Validation("Email already registered.".to_string()));
    }

    let hashed_password = auth::hash_password(&input.password)?;

    // The unique index still backstops a concurrent registration that slips
    // past the pre-check.
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (email, hashed_password) VALUES ($1, $2) \
         RETURNING id, email, hashed_password, role",
    )
    .bind(&input.email)
    .bind(&hashed_password)
    .fetch_one(pool.get_ref())
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::Conflict("Email already registered.".to_string())
        } else {
            ApiError::Database(e)
        }
    })?;

    Ok(HttpResponse::Created().json(UserOut::from(user)))
}

pub async fn login(
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
    input: web::Json<LoginInput>,
) -> Result<HttpResponse, ApiError> {
    let input = input.into_inner();

    let user = sqlx::query_as::<_, User>(
        "SELECT id, email, hashed_password, role FROM users WHERE email = $1",
    )
    .bind(&input.email)
    .fetch_optional(pool.get_ref())
    .await?;

    // Unknown email and bad password fail identically; no token is issued.
    let user = match user {
        Some(user) if auth::verify_password(&user.hashed_password, &input.password) => user,
        _ => {
            return Err(ApiError::Unauthenticated(
                "Incorrect email or password".to_string(),
            ))
        }
    };

    let access_token = auth::create_access_token(user.id, &config)?;

    Ok(HttpResponse::Ok().json(TokenOut {
        access_token,
        token_type: "bearer".to_string(),
    }))
}

pub async fn me(pool: web::Data<PgPool>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let user = auth::current_user(&pool, &req).await?;

    Ok(HttpResponse::Ok().json(UserOut::from(user)))
}

pub async fn list_users(
    pool: web::Data<PgPool>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    auth::current_admin(&pool, &req).await?;

    let users = sqlx::query_as::<_, User>(
        "SELECT id, email, hashed_password, role FROM users ORDER BY id",
    )
    .fetch_all(pool.get_ref())
    .await?;

    let users: Vec<UserOut> = users.into_iter().map(UserOut::from).collect();
    Ok(HttpResponse::Ok().json(users))
}

#[cfg(test)]
mod tests {
    use super::validate_email;

    #[test]
    fn accepts_ordinary_addresses() {
        assert!(validate_email("newuser@example.com"));
        assert!(validate_email("a.b+c@mail.example.org"));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!validate_email(""));
        assert!(!validate_email("no-at-sign"));
        assert!(!validate_email("@example.com"));
        assert!(!validate_email("user@nodot"));
        assert!(!validate_email("user@.com"));
    }
}
