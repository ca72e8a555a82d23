use anyhow::Context;

use crate::{
    Avatar, Comment, CommentId, Db, DonationLink, Error, LikeLedger, NewComment, NewPost, Post,
    PostId, PostSegment, SegmentId, SegmentItemId, Time, UserId, VoteLedger,
};

/// A mutation requested by the logged-in user
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum Action {
    Upvote(CommentId),
    Downvote(CommentId),
    ToggleLike(PostId),
    NewComment(NewComment),
    DeleteComment(CommentId),
    UpdateAvatar(Avatar),
    SetDonationLinks(Vec<DonationLink>),
    NewPost(NewPost),
    EditSegment {
        post_id: PostId,
        segment_id: SegmentId,
        title: String,
        subtitle: Option<String>,
    },
    EditSegmentItem {
        post_id: PostId,
        segment_id: SegmentId,
        item_id: SegmentItemId,
        title: String,
        description: String,
    },
}

/// What changed once the server accepted an `Action`
///
/// Carries the new state of the touched sub-entity, so that clients can patch their
/// cached views without refetching them.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum Effect {
    CommentVoted {
        post_id: PostId,
        comment_id: CommentId,
        votes: VoteLedger,
    },
    PostLiked {
        post_id: PostId,
        user_id: UserId,
        liked_by: LikeLedger,
    },
    CommentAdded(Comment),
    CommentDeleted {
        post_id: PostId,
        comment_id: CommentId,
    },
    AvatarChanged {
        user_id: UserId,
        avatar: Avatar,
    },
    DonationLinksChanged {
        user_id: UserId,
        links: Vec<DonationLink>,
    },
    PostCreated(Post),
    SegmentEdited {
        post_id: PostId,
        segment: PostSegment,
        updated_at: Time,
    },
    PostViewed {
        post_id: PostId,
        view_count: u64,
    },
}

impl Action {
    // See comments on other `validate` functions throughout condun-api
    pub fn validate(&self) -> Result<(), Error> {
        match self {
            Action::Upvote(_) | Action::Downvote(_) => Ok(()),
            Action::ToggleLike(_) => Ok(()),
            Action::NewComment(c) => c.validate(),
            Action::DeleteComment(_) => Ok(()),
            Action::UpdateAvatar(a) => a.validate(),
            Action::SetDonationLinks(links) => {
                for l in links {
                    l.validate()?;
                }
                Ok(())
            }
            Action::NewPost(p) => p.validate(),
            Action::EditSegment {
                title, subtitle, ..
            } => {
                crate::validate_text("segment title", title)?;
                match subtitle {
                    Some(s) => crate::validate_string(s),
                    None => Ok(()),
                }
            }
            Action::EditSegmentItem {
                title, description, ..
            } => {
                crate::validate_text("item title", title)?;
                crate::validate_string(description)
            }
        }
    }

    /// Checks that `db.current_user()` may run this action
    ///
    /// The outer error is a failure to query `db`, the inner one is the answer to give
    /// to the user.
    pub async fn authorize<D: Db + Send>(&self, db: &mut D) -> anyhow::Result<Result<(), Error>> {
        macro_rules! live_comment {
            ($c:expr) => {{
                let c: CommentId = $c;
                match db
                    .comment_info(c)
                    .await
                    .with_context(|| format!("fetching info of comment {:?}", c))?
                {
                    Some(info) if !info.is_deleted => info,
                    _ => return Ok(Err(Error::NotFound(c.0))),
                }
            }};
        }
        macro_rules! post_author {
            ($p:expr) => {{
                let p: PostId = $p;
                match db
                    .post_author(p)
                    .await
                    .with_context(|| format!("fetching author of post {:?}", p))?
                {
                    Some(author) => author,
                    None => return Ok(Err(Error::NotFound(p.0))),
                }
            }};
        }
        macro_rules! own_segment {
            ($p:expr, $s:expr) => {{
                let (p, s): (PostId, SegmentId) = ($p, $s);
                if post_author!(p) != db.current_user() {
                    return Ok(Err(Error::PermissionDenied));
                }
                if !db
                    .segment_in_post(p, s)
                    .await
                    .with_context(|| format!("checking segment {:?} is in post {:?}", s, p))?
                {
                    return Ok(Err(Error::NotFound(s.0)));
                }
            }};
        }

        match self {
            Action::Upvote(c) | Action::Downvote(c) => {
                live_comment!(*c);
            }
            Action::ToggleLike(p) => {
                post_author!(*p);
            }
            Action::NewComment(c) => {
                post_author!(c.post_id);
                if let Some(parent) = c.parent_id {
                    let parent_info = live_comment!(parent);
                    if parent_info.post_id != c.post_id {
                        return Ok(Err(Error::Validation(String::from(
                            "replied-to comment belongs to another post",
                        ))));
                    }
                }
            }
            Action::DeleteComment(c) => {
                let info = live_comment!(*c);
                if info.author_id != db.current_user() {
                    return Ok(Err(Error::PermissionDenied));
                }
            }
            Action::UpdateAvatar(_) | Action::SetDonationLinks(_) => (),
            Action::NewPost(p) => {
                if !db
                    .category_exists(p.category_id)
                    .await
                    .with_context(|| format!("checking category {:?} exists", p.category_id))?
                {
                    return Ok(Err(Error::NotFound(p.category_id.0)));
                }
            }
            Action::EditSegment {
                post_id,
                segment_id,
                ..
            } => own_segment!(*post_id, *segment_id),
            Action::EditSegmentItem {
                post_id,
                segment_id,
                item_id,
                ..
            } => {
                own_segment!(*post_id, *segment_id);
                if !db
                    .item_in_segment(*segment_id, *item_id)
                    .await
                    .with_context(|| {
                        format!("checking item {:?} is in segment {:?}", item_id, segment_id)
                    })?
                {
                    return Ok(Err(Error::NotFound(item_id.0)));
                }
            }
        }
        Ok(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashMap};

    use async_trait::async_trait;

    use super::*;
    use crate::{CategoryId, CommentInfo, Uuid};

    struct StubDb {
        user: UserId,
        posts: HashMap<PostId, UserId>,
        comments: HashMap<CommentId, CommentInfo>,
        segments: Vec<(PostId, SegmentId)>,
    }

    #[async_trait]
    impl Db for StubDb {
        fn current_user(&self) -> UserId {
            self.user
        }

        async fn post_author(&mut self, p: PostId) -> anyhow::Result<Option<UserId>> {
            Ok(self.posts.get(&p).copied())
        }

        async fn comment_info(&mut self, c: CommentId) -> anyhow::Result<Option<CommentInfo>> {
            Ok(self.comments.get(&c).copied())
        }

        async fn category_exists(&mut self, _c: CategoryId) -> anyhow::Result<bool> {
            Ok(false)
        }

        async fn segment_in_post(&mut self, p: PostId, s: SegmentId) -> anyhow::Result<bool> {
            Ok(self.segments.contains(&(p, s)))
        }

        async fn item_in_segment(
            &mut self,
            _s: SegmentId,
            _i: SegmentItemId,
        ) -> anyhow::Result<bool> {
            Ok(true)
        }
    }

    const ALICE: UserId = UserId(Uuid::from_u128(1));
    const BOB: UserId = UserId(Uuid::from_u128(2));
    const POST_A: PostId = PostId(Uuid::from_u128(10));
    const POST_B: PostId = PostId(Uuid::from_u128(11));
    const LIVE: CommentId = CommentId(Uuid::from_u128(20));
    const DELETED: CommentId = CommentId(Uuid::from_u128(21));
    const SEGMENT: SegmentId = SegmentId(Uuid::from_u128(30));

    fn db(user: UserId) -> StubDb {
        let mut posts = HashMap::new();
        posts.insert(POST_A, ALICE);
        posts.insert(POST_B, BOB);
        let mut comments = HashMap::new();
        comments.insert(
            LIVE,
            CommentInfo {
                author_id: ALICE,
                post_id: POST_A,
                is_deleted: false,
            },
        );
        comments.insert(
            DELETED,
            CommentInfo {
                author_id: ALICE,
                post_id: POST_A,
                is_deleted: true,
            },
        );
        StubDb {
            user,
            posts,
            comments,
            segments: vec![(POST_A, SEGMENT)],
        }
    }

    fn authorize(user: UserId, a: Action) -> Result<(), Error> {
        futures::executor::block_on(a.authorize(&mut db(user))).expect("stub db never fails")
    }

    fn reply(post_id: PostId, parent_id: Option<CommentId>) -> Action {
        Action::NewComment(NewComment {
            id: CommentId(Uuid::from_u128(99)),
            post_id,
            parent_id,
            text: String::from("hi"),
        })
    }

    #[test]
    fn votes() {
        assert_eq!(authorize(BOB, Action::Upvote(LIVE)), Ok(()));
        // self-votes are fine
        assert_eq!(authorize(ALICE, Action::Downvote(LIVE)), Ok(()));
        assert_eq!(
            authorize(BOB, Action::Upvote(DELETED)),
            Err(Error::NotFound(DELETED.0))
        );
        let missing = CommentId(Uuid::from_u128(404));
        assert_eq!(
            authorize(BOB, Action::Downvote(missing)),
            Err(Error::NotFound(missing.0))
        );
    }

    #[test]
    fn likes() {
        assert_eq!(authorize(BOB, Action::ToggleLike(POST_A)), Ok(()));
        let missing = PostId(Uuid::from_u128(404));
        assert_eq!(
            authorize(BOB, Action::ToggleLike(missing)),
            Err(Error::NotFound(missing.0))
        );
    }

    #[test]
    fn replies_stay_on_their_post() {
        assert_eq!(authorize(BOB, reply(POST_A, None)), Ok(()));
        assert_eq!(authorize(BOB, reply(POST_A, Some(LIVE))), Ok(()));
        assert!(matches!(
            authorize(BOB, reply(POST_B, Some(LIVE))),
            Err(Error::Validation(_))
        ));
        assert_eq!(
            authorize(BOB, reply(POST_A, Some(DELETED))),
            Err(Error::NotFound(DELETED.0))
        );
    }

    #[test]
    fn only_authors_delete() {
        assert_eq!(authorize(ALICE, Action::DeleteComment(LIVE)), Ok(()));
        assert_eq!(
            authorize(BOB, Action::DeleteComment(LIVE)),
            Err(Error::PermissionDenied)
        );
        assert_eq!(
            authorize(ALICE, Action::DeleteComment(DELETED)),
            Err(Error::NotFound(DELETED.0))
        );
    }

    #[test]
    fn only_authors_edit_segments() {
        let edit = |post_id, segment_id| Action::EditSegment {
            post_id,
            segment_id,
            title: String::from("title"),
            subtitle: None,
        };
        assert_eq!(authorize(ALICE, edit(POST_A, SEGMENT)), Ok(()));
        assert_eq!(
            authorize(BOB, edit(POST_A, SEGMENT)),
            Err(Error::PermissionDenied)
        );
        let other = SegmentId(Uuid::from_u128(31));
        assert_eq!(
            authorize(ALICE, edit(POST_A, other)),
            Err(Error::NotFound(other.0))
        );
    }

    #[test]
    fn posts_need_a_category() {
        let category = CategoryId(Uuid::from_u128(40));
        let post = Action::NewPost(NewPost {
            id: PostId(Uuid::from_u128(12)),
            title: String::from("title"),
            description: String::new(),
            category_id: category,
            tags: BTreeSet::new(),
            segments: Vec::new(),
        });
        assert_eq!(authorize(ALICE, post), Err(Error::NotFound(category.0)));
    }

    #[test]
    fn validation() {
        assert!(matches!(
            reply(POST_A, None).validate(),
            Ok(())
        ));
        let empty = Action::NewComment(NewComment {
            id: CommentId(Uuid::from_u128(99)),
            post_id: POST_A,
            parent_id: None,
            text: String::from("   "),
        });
        assert!(matches!(empty.validate(), Err(Error::Validation(_))));
    }
}
