use std::str::FromStr;

use anyhow::{anyhow, Context};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Not found {0}")]
    NotFound(Uuid),

    #[error("Uuid already used {0}")]
    UuidAlreadyUsed(Uuid),

    #[error("Invalid Proof of Work")]
    InvalidPow,

    #[error("Name already used {0}")]
    NameAlreadyUsed(String),

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),

    #[error("Invalid character in name {0:?}")]
    InvalidName(String),

    #[error("Invalid input: {0}")]
    Validation(String),
}

impl Error {
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::PermissionDenied => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::UuidAlreadyUsed(_) => StatusCode::CONFLICT,
            Error::InvalidPow => StatusCode::BAD_REQUEST,
            Error::NameAlreadyUsed(_) => StatusCode::CONFLICT,
            Error::NullByteInString(_) => StatusCode::BAD_REQUEST,
            Error::InvalidName(_) => StatusCode::BAD_REQUEST,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Wire name of the variant, sent as the `type` field
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Unknown(_) => "unknown",
            Error::Unauthorized => "unauthorized",
            Error::PermissionDenied => "permission-denied",
            Error::NotFound(_) => "not-found",
            Error::UuidAlreadyUsed(_) => "conflict-uuid",
            Error::InvalidPow => "invalid-pow",
            Error::NameAlreadyUsed(_) => "conflict-name",
            Error::NullByteInString(_) => "null-byte",
            Error::InvalidName(_) => "invalid-name",
            Error::Validation(_) => "validation",
        }
    }

    fn message(&self) -> String {
        match self {
            Error::Unknown(msg) | Error::Validation(msg) => msg.clone(),
            e => e.to_string(),
        }
    }

    fn detail(&self) -> Option<(&'static str, serde_json::Value)> {
        match self {
            Error::NotFound(u) | Error::UuidAlreadyUsed(u) => Some(("uuid", json!(u))),
            Error::NameAlreadyUsed(n) | Error::InvalidName(n) => Some(("name", json!(n))),
            Error::NullByteInString(s) => Some(("string", json!(s))),
            _ => None,
        }
    }

    /// JSON body sent to the client alongside `status_code`
    pub fn contents(&self) -> Vec<u8> {
        let mut body = json!({
            "type": self.kind(),
            "message": self.message(),
        });
        if let Some((key, value)) = self.detail() {
            body[key] = value;
        }
        serde_json::to_vec(&body).expect("serializing error contents")
    }

    pub fn parse(body: &[u8]) -> anyhow::Result<Error> {
        let data: serde_json::Value =
            serde_json::from_slice(body).context("parsing error contents")?;
        let uuid = || -> anyhow::Result<Uuid> {
            Uuid::from_str(field(&data, "uuid")?).context("parsing error uuid")
        };
        let owned = |name: &str| field(&data, name).map(String::from);
        Ok(match field(&data, "type")? {
            "unknown" => Error::Unknown(owned("message").unwrap_or_default()),
            "unauthorized" => Error::Unauthorized,
            "permission-denied" => Error::PermissionDenied,
            "not-found" => Error::NotFound(uuid()?),
            "conflict-uuid" => Error::UuidAlreadyUsed(uuid()?),
            "invalid-pow" => Error::InvalidPow,
            "conflict-name" => Error::NameAlreadyUsed(owned("name")?),
            "null-byte" => Error::NullByteInString(owned("string")?),
            "invalid-name" => Error::InvalidName(owned("name")?),
            "validation" => Error::Validation(owned("message")?),
            other => return Err(anyhow!("unknown error type {other:?}")),
        })
    }
}

fn field<'a>(data: &'a serde_json::Value, name: &str) -> anyhow::Result<&'a str> {
    data.get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("error contents have no {name:?} string"))
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Error {
        Error::Unknown(format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_survives_json() {
        let u = Uuid::from_u128(42);
        for e in [
            Error::Unknown(String::from("boom")),
            Error::Unauthorized,
            Error::PermissionDenied,
            Error::NotFound(u),
            Error::UuidAlreadyUsed(u),
            Error::InvalidPow,
            Error::NameAlreadyUsed(String::from("alice")),
            Error::NullByteInString(String::from("a\0b")),
            Error::InvalidName(String::from("a b")),
            Error::Validation(String::from("comment text must not be empty")),
        ] {
            assert_eq!(Error::parse(&e.contents()).unwrap(), e);
        }
    }

    #[test]
    fn statuses() {
        assert_eq!(Error::Unauthorized.status_code(), http::StatusCode::UNAUTHORIZED);
        assert_eq!(Error::PermissionDenied.status_code(), http::StatusCode::FORBIDDEN);
        assert_eq!(
            Error::NotFound(Uuid::nil()).status_code(),
            http::StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(Error::parse(br#"{"type": "nope"}"#).is_err());
        assert!(Error::parse(br#"{"type": "not-found"}"#).is_err());
    }
}
