use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use serde_json::json;

mod auth;
mod cart;
mod catalog;
mod config;
mod db;
mod errors;
mod middleware;
mod models;
mod orders;
mod reviews;
mod users;

use errors::ApiError;

async fn index() -> impl Responder {
    HttpResponse::Ok().json(json!({ "message": "Welcome to the storefront API!" }))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok(); // Load environment variables from .env file
    env_logger::init(); // Initialize the logger

    let config = config::Config::from_env();

    // Connect to the database and apply pending migrations
    let pool = db::connect(&config).await;

    let bind_addr = config.bind_addr.clone();
    log::info!("Listening on {}", bind_addr);

    // Start the Actix-web HTTP server
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(pool.clone())) // Share the database pool with handlers
            .app_data(web::Data::new(config.clone()))
            // Malformed bodies, paths and query strings all surface as the
            // standard {"detail": ...} validation error.
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                ApiError::Validation(err.to_string()).into()
            }))
            .app_data(web::PathConfig::default().error_handler(|err, _req| {
                ApiError::Validation(err.to_string()).into()
            }))
            .app_data(web::QueryConfig::default().error_handler(|err, _req| {
                ApiError::Validation(err.to_string()).into()
            }))
            // Validates bearer tokens and stores the caller id; handlers
            // decide whether an identity (or the admin role) is required.
            .wrap(middleware::AuthMiddleware::new(config.jwt_secret.clone()))
            .route("/", web::get().to(index))
            // Users & authentication
            .route("/users/register", web::post().to(users::register))
            .route("/users/login", web::post().to(users::login))
            .route("/users/me", web::get().to(users::me))
            .route("/admin/users", web::get().to(users::list_users))
            // Categories (admin)
            .service(
                web::resource("/categories")
                    .route(web::post().to(catalog::create_category))
                    .route(web::get().to(catalog::list_categories)),
            )
            .service(
                web::resource("/categories/{category_id}")
                    .route(web::get().to(catalog::get_category))
                    .route(web::put().to(catalog::update_category))
                    .route(web::delete().to(catalog::delete_category)),
            )
            // Products: public browsing, admin mutations
            .service(
                web::resource("/products")
                    .route(web::get().to(catalog::list_products))
                    .route(web::post().to(catalog::create_product)),
            )
            .service(
                web::resource("/products/{product_id}")
                    .route(web::get().to(catalog::get_product))
                    .route(web::put().to(catalog::update_product))
                    .route(web::delete().to(catalog::delete_product)),
            )
            .route(
                "/products/{product_id}/reviews",
                web::get().to(catalog::list_product_reviews),
            )
            // Shopping cart
            .service(
                web::resource("/cart")
                    .route(web::get().to(cart::view_cart))
                    .route(web::delete().to(cart::clear_cart)),
            )
            .route("/cart/items", web::post().to(cart::add_item))
            .service(
                web::resource("/cart/items/{product_id}")
                    .route(web::put().to(cart::update_item))
                    .route(web::delete().to(cart::remove_item)),
            )
            // Orders
            .service(
                web::resource("/orders")
                    .route(web::post().to(orders::create_order))
                    .route(web::get().to(orders::list_my_orders)),
            )
            .route("/orders/{order_id}", web::get().to(orders::get_order))
            .route("/admin/orders", web::get().to(orders::admin_list_orders))
            .route(
                "/admin/orders/{order_id}",
                web::patch().to(orders::admin_update_status),
            )
            // Reviews
            .route("/reviews", web::post().to(reviews::create_review))
    })
    .bind(bind_addr)?
    .run()
    .await
}
