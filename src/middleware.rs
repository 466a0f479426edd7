use actix_web::dev::Transform;
use actix_web::{dev::ServiceRequest, Error};
use actix_service::{forward_ready, Service};
use actix_web::HttpMessage; // Added to bring `extensions_mut` into scope
use futures::future::{ok, LocalBoxFuture, Ready};
use std::rc::Rc;

use crate::auth;
use crate::errors::ApiError;

// Middleware factory
pub struct AuthMiddleware {
    secret: String,
}

impl AuthMiddleware {
    pub fn new(secret: String) -> Self {
        AuthMiddleware { secret }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = actix_web::dev::ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = actix_web::dev::ServiceResponse<B>;
    type Error = Error;
    type Transform = AuthMiddlewareMiddleware<S>;
    type InitError = ();

    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddlewareMiddleware {
            service: Rc::new(service),
            secret: self.secret.clone(),
        })
    }
}

pub struct AuthMiddlewareMiddleware<S> {
    service: Rc<S>,
    secret: String,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareMiddleware<S>
where
    S: Service<ServiceRequest, Response = actix_web::dev::ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = actix_web::dev::ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let secret = self.secret.clone();
        let service = self.service.clone();

        Box::pin(async move {
            // Requests without credentials pass through; handlers that need an
            // identity reject them via auth::current_user. A header that is
            // present but unusable is rejected here.
            let auth_header = match req.headers().get("Authorization") {
                Some(header) => header,
                None => return service.call(req).await,
            };

            let auth_str = auth_header.to_str().map_err(|_| {
                Error::from(ApiError::Unauthenticated(
                    "Invalid authorization header".to_string(),
                ))
            })?;

            let token = auth_str.strip_prefix("Bearer ").ok_or_else(|| {
                Error::from(ApiError::Unauthenticated(
                    "Invalid authorization scheme".to_string(),
                ))
            })?;

            let user_id = auth::decode_access_token(token, &secret)?;

            req.extensions_mut().insert(user_id);
            service.call(req).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App, HttpRequest, HttpResponse};

    use crate::config::Config;

    async fn whoami(req: HttpRequest) -> HttpResponse {
        match req.extensions().get::<i64>() {
            Some(user_id) => HttpResponse::Ok().body(user_id.to_string()),
            None => HttpResponse::Ok().body("anonymous"),
        }
    }

    macro_rules! service_under_test {
        () => {
            test::init_service(
                App::new()
                    .wrap(AuthMiddleware::new("test-secret".to_string()))
                    .route("/whoami", web::get().to(whoami)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn request_without_credentials_passes_through() {
        let app = service_under_test!();

        let req = test::TestRequest::get().uri("/whoami").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status().as_u16(), 200);
        let body = test::read_body(resp).await;
        assert_eq!(body, "anonymous");
    }

    #[actix_web::test]
    async fn valid_token_injects_the_user_id() {
        let app = service_under_test!();

        let config = Config::for_tests("test-secret");
        let token = auth::create_access_token(42, &config).unwrap();

        let req = test::TestRequest::get()
            .uri("/whoami")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status().as_u16(), 200);
        let body = test::read_body(resp).await;
        assert_eq!(body, "42");
    }

    #[actix_web::test]
    async fn garbage_token_is_rejected() {
        let app = service_under_test!();

        let req = test::TestRequest::get()
            .uri("/whoami")
            .insert_header(("Authorization", "Bearer not.a.token"))
            .to_request();
        let err = app.call(req).await.unwrap_err();

        assert_eq!(err.error_response().status().as_u16(), 401);
    }

    #[actix_web::test]
    async fn non_bearer_scheme_is_rejected() {
        let app = service_under_test!();

        let req = test::TestRequest::get()
            .uri("/whoami")
            .insert_header(("Authorization", "Basic dXNlcjpwYXNz"))
            .to_request();
        let err = app.call(req).await.unwrap_err();

        assert_eq!(err.error_response().status().as_u16(), 401);
    }
}
