use crate::{CategoryId, Error, UserId};

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum Query {
    Any(Vec<Query>),
    All(Vec<Query>),
    Not(Box<Query>),
    Category(CategoryId),
    Tag(String),
    Author(UserId),
    LikedBy(UserId),
    Phrase(String), // case-insensitive substring of the post's text
}

impl Query {
    /// Matches every post
    pub fn everything() -> Query {
        Query::All(Vec::new())
    }

    pub fn validate(&self) -> Result<(), Error> {
        match self {
            Query::Any(queries) | Query::All(queries) => {
                for q in queries {
                    q.validate()?;
                }
                Ok(())
            }
            Query::Not(q) => q.validate(),
            Query::Category(_) => Ok(()),
            Query::Tag(t) => crate::validate_name(t),
            Query::Author(_) => Ok(()),
            Query::LikedBy(_) => Ok(()),
            Query::Phrase(s) => {
                crate::validate_string(s)?;
                // the server searches all of a post's fields joined by this separator
                match s.contains(FIELD_SEPARATOR) {
                    true => Err(Error::Validation(String::from(
                        "search phrases must not contain the unit separator",
                    ))),
                    false => Ok(()),
                }
            }
        }
    }
}

/// Character joining a post's text fields in the server's search index
pub const FIELD_SEPARATOR: char = '\u{1f}';

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum PostOrder {
    Newest,
    Oldest,
    MostLiked,
    MostViewed,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum CommentOrder {
    Newest,
    Oldest,
    /// Highest score first
    Top,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PostSearch {
    pub filter: Query,
    pub order: PostOrder,
    pub limit: Option<u32>,
}

impl PostSearch {
    pub fn new(filter: Query, order: PostOrder) -> PostSearch {
        PostSearch {
            filter,
            order,
            limit: None,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.filter.validate()
    }
}
