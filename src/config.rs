use std::env;

// Built once in main() and handed to every handler through web::Data.
#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub access_token_expire_minutes: i64,
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Config {
        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

        let access_token_expire_minutes = env::var("ACCESS_TOKEN_EXPIRE_MINUTES")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(30);

        let bind_addr =
            env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());

        Config {
            database_url,
            jwt_secret,
            access_token_expire_minutes,
            bind_addr,
        }
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests(secret: &str) -> Config {
        Config {
            database_url: String::new(),
            jwt_secret: secret.to_string(),
            access_token_expire_minutes: 30,
            bind_addr: String::new(),
        }
    }
}
