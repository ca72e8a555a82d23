use condun_api::{Error as ApiError, Uuid};

/// Handler failure: either something the client should be told about, or an
/// internal problem that only goes to the logs
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl Error {
    pub fn unauthorized() -> Error {
        ApiError::Unauthorized.into()
    }

    pub fn permission_denied() -> Error {
        ApiError::PermissionDenied.into()
    }

    pub fn invalid_pow() -> Error {
        ApiError::InvalidPow.into()
    }

    pub fn not_found(id: Uuid) -> Error {
        ApiError::NotFound(id).into()
    }

    pub fn uuid_already_used(id: Uuid) -> Error {
        ApiError::UuidAlreadyUsed(id).into()
    }

    pub fn name_already_used(name: String) -> Error {
        ApiError::NameAlreadyUsed(name).into()
    }

    fn into_api(self) -> ApiError {
        match self {
            Error::Api(err) => {
                tracing::info!(%err, "request refused");
                err
            }
            Error::Anyhow(err) if cfg!(test) => {
                tracing::error!(?err, "internal server error");
                ApiError::Unknown(format!("internal server error: {err:?}"))
            }
            Error::Anyhow(err) => {
                tracing::error!(?err, "internal server error");
                ApiError::Unknown(String::from("internal server error, see logs for details"))
            }
        }
    }
}

impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let err = self.into_api();
        (err.status_code(), err.contents()).into_response()
    }
}
