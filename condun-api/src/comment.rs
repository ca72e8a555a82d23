use uuid::Uuid;

use crate::{Error, PostId, Time, UserId, Vote, VoteLedger};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CommentId(pub Uuid);

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,

    /// Comment this one replies to, always on the same post
    pub parent_id: Option<CommentId>,

    pub author_id: UserId,
    pub text: String,

    /// Deleted comments stay around so that their replies keep a parent
    pub is_deleted: bool,

    pub created_at: Time,
    pub votes: VoteLedger,
}

impl Comment {
    pub fn score(&self) -> i64 {
        self.votes.score()
    }

    /// Applies a click on `vote` by `user`, returning the user's vote afterwards
    pub fn vote(&mut self, user: UserId, vote: Vote) -> Result<Option<Vote>, Error> {
        if self.is_deleted {
            return Err(Error::NotFound(self.id.0));
        }
        Ok(self.votes.cast(user, vote))
    }

    pub fn soft_delete(&mut self) {
        self.is_deleted = true;
        self.text.clear();
    }

    /// Hides the text of deleted comments, for sending them out to readers
    pub fn redacted(mut self) -> Comment {
        if self.is_deleted {
            self.text.clear();
        }
        self
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewComment {
    pub id: CommentId,
    pub post_id: PostId,
    pub parent_id: Option<CommentId>,
    pub text: String,
}

impl NewComment {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_text("comment text", &self.text)
    }

    pub fn into_comment(self, author_id: UserId, created_at: Time) -> Comment {
        Comment {
            id: self.id,
            post_id: self.post_id,
            parent_id: self.parent_id,
            author_id,
            text: self.text,
            is_deleted: false,
            created_at,
            votes: VoteLedger::default(),
        }
    }
}
