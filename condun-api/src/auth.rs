use std::str::FromStr;

use uuid::Uuid;

use crate::Error;

/// bcrypt cost of the proof of work a client attaches to each login attempt
pub const LOGIN_POW_COST: u32 = 10;

// bcrypt's rendering of the all-zero salt
const ZERO_SALT: &str = "......................";

/// Login request, answered by an [`AuthToken`]
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct NewSession {
    pub user: String,
    pub password: String,
    pub device: String,
    pub pow: String,
}

impl NewSession {
    pub fn new(user: String, password: String, device: String) -> NewSession {
        let pow = bcrypt::hash_with_salt(&password, LOGIN_POW_COST, [0; 16])
            .expect("failed hashing password")
            .to_string();
        NewSession {
            user,
            password,
            device,
            pow,
        }
    }

    /// Checks every field, without paying for the proof of work
    pub fn validate(&self) -> Result<(), Error> {
        [&self.user, &self.password, &self.device, &self.pow]
            .into_iter()
            .try_for_each(|s| crate::validate_string(s))
    }

    /// Whether `pow` is the zero-salted hash of `password` at [`LOGIN_POW_COST`]
    pub fn has_valid_pow(&self) -> bool {
        let well_formed = bcrypt::HashParts::from_str(&self.pow)
            .map(|p| p.get_cost() == LOGIN_POW_COST && p.get_salt() == ZERO_SALT)
            .unwrap_or(false);
        well_formed && bcrypt::verify(&self.password, &self.pow).unwrap_or(false)
    }
}

/// Bearer token identifying one session
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AuthToken(pub Uuid);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pow_roundtrip() {
        let s = NewSession::new("alice".into(), "hunter2".into(), "laptop".into());
        assert!(s.has_valid_pow());
        let forged = NewSession {
            pow: bcrypt::hash("hunter2", 4).unwrap(),
            ..s.clone()
        };
        assert!(!forged.has_valid_pow());
        let wrong_password = NewSession {
            password: "hunter3".into(),
            ..s
        };
        assert!(!wrong_password.has_valid_pow());
    }
}
