use sqlx::Error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid range: {0}")]
    InvalidRange(String),
    #[error("Database error: {0}")]
    Db(sqlx::Error),
    #[error("Config error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for AppError {
    fn from(value: Error) -> Self {
        AppError::Db(value)
    }
}
