// config.rs
use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub click_secret_key: String,
    pub click_service_id: String,
    pub click_merchant_id: String,
    pub database_url: String,
    pub db_name: String,
    pub port: u16,
    pub host: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        AppConfig {
            click_secret_key: env::var("CLICK_SECRET_KEY")
                .expect("CLICK_SECRET_KEY must be set"),
            click_service_id: env::var("CLICK_SERVICE_ID")
                .expect("CLICK_SERVICE_ID must be set"),
            click_merchant_id: env::var("CLICK_MERCHANT_ID")
                .expect("CLICK_MERCHANT_ID must be set"),
            database_url: env::var("DATABASE_URL")
                .expect("DATABASE_URL must be set"),
            db_name: env::var("DB_NAME")
                .expect("DB_NAME must be set"),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .expect("PORT must be a number"),
            host: env::var("HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
        }
    }
}
