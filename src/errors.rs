// src/errors.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("MongoDB error: {0}")]
    MongoDB(#[from] mongodb::error::Error),

    #[error("User {0} not found")]
    UserNotFound(i64),
}

pub type Result<T> = std::result::Result<T, AppError>;
