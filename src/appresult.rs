use axum::{http::StatusCode, response::{IntoResponse, Response}};

use crate::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self.0.downcast_ref::<Error>() {
            Some(Error::Validation(_)) => StatusCode::BAD_REQUEST,
            Some(Error::NotFound(_)) => StatusCode::NOT_FOUND,
            Some(Error::Unauthorized(_)) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The domain error underneath, if there is one.
    pub fn domain(&self) -> Option<&Error> {
        self.0.downcast_ref::<Error>()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{:#}\n\n{}", self.0, self.0.backtrace());
            (status, format!("{:#}", self.0)).into_response()
        } else {
            tracing::debug!("{status}: {}", self.0);
            (status, self.0.to_string()).into_response()
        }
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
