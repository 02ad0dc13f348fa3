use stayin_eventing::error::EventingError;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("eventing: {0}")]
    Eventing(#[from] EventingError),

    #[error("validation: {0}")]
    Validation(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<AppError> for EventingError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Eventing(inner) => inner,
            other => EventingError::store(other.to_string()),
        }
    }
}

#[cfg(feature = "infra-sqlx")]
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Eventing(err.into())
    }
}
