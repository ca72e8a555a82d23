use async_trait::async_trait;

use crate::{CategoryId, CommentId, PostId, SegmentId, SegmentItemId, UserId};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CommentInfo {
    pub author_id: UserId,
    pub post_id: PostId,
    pub is_deleted: bool,
}

/// What `Action::authorize` needs to know about the stored data
///
/// Lookups return `None` when the entity does not exist, and errors only for
/// failures of the underlying store.
#[async_trait]
pub trait Db {
    fn current_user(&self) -> UserId;
    async fn post_author(&mut self, p: PostId) -> anyhow::Result<Option<UserId>>;
    async fn comment_info(&mut self, c: CommentId) -> anyhow::Result<Option<CommentInfo>>;
    async fn category_exists(&mut self, c: CategoryId) -> anyhow::Result<bool>;
    async fn segment_in_post(&mut self, p: PostId, s: SegmentId) -> anyhow::Result<bool>;
    async fn item_in_segment(&mut self, s: SegmentId, i: SegmentItemId) -> anyhow::Result<bool>;
}
