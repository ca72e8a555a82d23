use chrono::Utc;

mod action;
pub use action::{Action, Effect};

mod auth;
pub use auth::{AuthToken, NewSession, LOGIN_POW_COST};

mod comment;
pub use comment::{Comment, CommentId, NewComment};

mod db;
pub use db::{CommentInfo, Db};

mod error;
pub use error::Error;

mod ledger;
pub use ledger::{LikeLedger, Vote, VoteLedger};

mod post;
pub use post::{
    Category, CategoryId, NewPost, Post, PostId, PostSegment, PostSegmentItem, SegmentId,
    SegmentItemId,
};

mod query;
pub use query::{CommentOrder, PostOrder, PostSearch, Query, FIELD_SEPARATOR};

mod user;
pub use user::{Avatar, DonationLink, ImageId, NewUser, User, UserId};

pub use uuid::{uuid, Uuid};
pub type Time = chrono::DateTime<Utc>;

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

// Strings containing a null byte cannot be stored in postgres, so every user-provided
// string goes through this before reaching the server's database code
pub fn validate_string(s: &str) -> Result<(), Error> {
    match s.contains('\0') {
        true => Err(Error::NullByteInString(s.to_string())),
        false => Ok(()),
    }
}

/// Like `validate_string`, but also refuses strings that are only whitespace
pub fn validate_text(what: &str, s: &str) -> Result<(), Error> {
    validate_string(s)?;
    if s.trim().is_empty() {
        return Err(Error::Validation(format!("{what} must not be empty")));
    }
    Ok(())
}

/// User, category and tag names
pub fn validate_name(s: &str) -> Result<(), Error> {
    validate_string(s)?;
    if s.is_empty()
        || !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(Error::InvalidName(s.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert!(validate_name("rust-lang_2.0").is_ok());
        assert_eq!(validate_name(""), Err(Error::InvalidName(String::new())));
        assert_eq!(
            validate_name("with space"),
            Err(Error::InvalidName(String::from("with space")))
        );
        assert_eq!(
            validate_name("nul\0"),
            Err(Error::NullByteInString(String::from("nul\0")))
        );
    }

    #[test]
    fn texts() {
        assert!(validate_text("comment", "hello").is_ok());
        assert!(matches!(
            validate_text("comment", "  \n"),
            Err(Error::Validation(_))
        ));
    }
}
