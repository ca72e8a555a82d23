use uuid::Uuid;

use crate::{Error, STUB_UUID};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn stub() -> UserId {
        UserId(STUB_UUID)
    }
}

/// Identifier handed out by the image pipeline, opaque to us
#[derive(Clone, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ImageId(pub String);

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Avatar {
    pub image_id: ImageId,

    /// Tiny inlined placeholder shown while the real image loads
    pub blur_data_url: String,
}

impl Avatar {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_text("image id", &self.image_id.0)?;
        crate::validate_string(&self.blur_data_url)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct DonationLink {
    /// eg. the currency or payment service
    pub kind: String,
    pub address: String,
}

impl DonationLink {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_text("donation link kind", &self.kind)?;
        crate::validate_text("donation link address", &self.address)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub avatar: Option<Avatar>,
    pub donation_links: Vec<DonationLink>,
}

impl User {
    pub fn new(id: UserId, name: String) -> User {
        User {
            id,
            name,
            avatar: None,
            donation_links: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct NewUser {
    pub id: UserId,
    pub name: String,
    pub initial_password_hash: String,
}

impl NewUser {
    pub fn new(id: UserId, name: String, initial_password: String) -> NewUser {
        NewUser {
            id,
            name,
            initial_password_hash: bcrypt::hash(initial_password, bcrypt::DEFAULT_COST)
                .expect("failed hashing password"),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_name(&self.name)?;
        crate::validate_string(&self.initial_password_hash)
    }
}
