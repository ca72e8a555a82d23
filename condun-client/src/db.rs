use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

use crate::{
    api::{
        Action, Category, CategoryId, Comment, CommentId, CommentInfo, Db, Effect, Error, Post,
        PostId, PostOrder, PostSearch, Query, SegmentId, SegmentItemId, Time, User, UserId, Vote,
    },
    AuthorView, CommentView, OrderExt, PostDetail, PostSummary, QueryExt, View, ViewKey,
};

/// Local snapshot of the platform's data
///
/// Cloning is cheap, and clones share everything until one of them is modified.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DbDump {
    pub users: Arc<HashMap<UserId, User>>,
    pub categories: Arc<HashMap<CategoryId, Category>>,
    pub posts: Arc<HashMap<PostId, Arc<Post>>>,

    /// Per post, in creation order
    pub comments: Arc<HashMap<PostId, Arc<Vec<Comment>>>>,
}

impl DbDump {
    pub fn stub() -> DbDump {
        DbDump::default()
    }

    pub fn add_users(&mut self, users: Vec<User>) {
        Arc::make_mut(&mut self.users).extend(users.into_iter().map(|u| (u.id, u)));
    }

    pub fn add_categories(&mut self, categories: Vec<Category>) {
        Arc::make_mut(&mut self.categories).extend(categories.into_iter().map(|c| (c.id, c)));
    }

    pub fn add_posts(&mut self, posts: Vec<Post>) {
        Arc::make_mut(&mut self.posts).extend(posts.into_iter().map(|p| (p.id, Arc::new(p))));
    }

    /// Replaces already-known comments with the same id, appends the others
    pub fn add_comments(&mut self, comments: Vec<Comment>) {
        let by_post = Arc::make_mut(&mut self.comments);
        for c in comments {
            let list = Arc::make_mut(by_post.entry(c.post_id).or_default());
            match list.iter_mut().find(|old| old.id == c.id) {
                Some(old) => *old = c,
                None => list.push(c),
            }
        }
    }

    pub fn user_id(&self, name: &str) -> Option<UserId> {
        self.users.values().find(|u| u.name == name).map(|u| u.id)
    }

    pub fn category_id(&self, name: &str) -> Option<CategoryId> {
        self.categories
            .values()
            .find(|c| c.name == name)
            .map(|c| c.id)
    }

    /// Returns the posts matching `s.filter`, sorted and truncated as requested
    pub fn search(&self, s: &PostSearch) -> Vec<Arc<Post>> {
        let mut res = self
            .posts
            .values()
            .filter(|p| s.filter.matches(p))
            .cloned()
            .collect::<Vec<_>>();
        s.order.sort(&mut res);
        if let Some(limit) = s.limit {
            res.truncate(limit as usize);
        }
        res
    }

    pub fn comments_for(&self, post: PostId) -> &[Comment] {
        self.comments
            .get(&post)
            .map(|c| &c[..])
            .unwrap_or(&[])
    }

    pub fn comment(&self, id: CommentId) -> Option<&Comment> {
        self.comments
            .values()
            .flat_map(|c| c.iter())
            .find(|c| c.id == id)
    }

    fn author(&self, id: UserId) -> Result<AuthorView, Error> {
        self.users
            .get(&id)
            .map(AuthorView::from)
            .ok_or(Error::NotFound(id.0))
    }

    fn summary(&self, post: &Post) -> Result<PostSummary, Error> {
        Ok(PostSummary::new(
            post,
            self.author(post.author_id)?,
            self.categories.get(&post.category_id).cloned(),
            self.comments_for(post.id).len(),
        ))
    }

    /// Computes the view that `key` names from the data in this dump
    pub fn load_view(&self, key: &ViewKey) -> Result<View, Error> {
        let filter = match key {
            ViewKey::AllPosts => Query::everything(),
            ViewKey::UserPosts(u) => Query::Author(*u),
            ViewKey::LikedPosts(u) => Query::LikedBy(*u),
            ViewKey::Category(c) => Query::Category(*c),
            ViewKey::Tag(t) => Query::Tag(t.clone()),
            ViewKey::Search(s) => crate::parse_search(self, s)?,
            ViewKey::Post(p) => {
                let post = self.posts.get(p).ok_or(Error::NotFound(p.0))?;
                return Ok(View::Post(PostDetail {
                    post: Post::clone(post),
                    author: self.author(post.author_id)?,
                    category: self.categories.get(&post.category_id).cloned(),
                }));
            }
            ViewKey::Comments(p) => {
                if !self.posts.contains_key(p) {
                    return Err(Error::NotFound(p.0));
                }
                return self
                    .comments_for(*p)
                    .iter()
                    .map(|c| {
                        Ok(CommentView {
                            comment: c.clone().redacted(),
                            author: self.author(c.author_id)?,
                        })
                    })
                    .collect::<Result<Vec<_>, Error>>()
                    .map(View::Comments);
            }
            ViewKey::Profile(u) => {
                let user = self.users.get(u).ok_or(Error::NotFound(u.0))?;
                return Ok(View::Profile(user.clone()));
            }
        };
        self.search(&PostSearch::new(filter, PostOrder::Newest))
            .iter()
            .map(|p| self.summary(p))
            .collect::<Result<Vec<_>, Error>>()
            .map(View::Posts)
    }
}

impl DbDump {
    fn post_mut(&mut self, id: PostId) -> Result<&mut Post, Error> {
        Arc::make_mut(&mut self.posts)
            .get_mut(&id)
            .map(Arc::make_mut)
            .ok_or(Error::NotFound(id.0))
    }

    fn comment_mut(&mut self, id: CommentId) -> Result<&mut Comment, Error> {
        let post = self.comment(id).ok_or(Error::NotFound(id.0))?.post_id;
        Arc::make_mut(&mut self.comments)
            .get_mut(&post)
            .map(Arc::make_mut)
            .and_then(|list| list.iter_mut().find(|c| c.id == id))
            .ok_or(Error::NotFound(id.0))
    }

    fn user_mut(&mut self, id: UserId) -> Result<&mut User, Error> {
        Arc::make_mut(&mut self.users)
            .get_mut(&id)
            .ok_or(Error::NotFound(id.0))
    }

    fn segment_ids_used(&self) -> impl '_ + Iterator<Item = SegmentId> {
        self.posts
            .values()
            .flat_map(|p| p.segments.iter().map(|s| s.id))
    }

    fn item_ids_used(&self) -> impl '_ + Iterator<Item = SegmentItemId> {
        self.posts
            .values()
            .flat_map(|p| p.segments.iter().flat_map(|s| s.items.iter().map(|i| i.id)))
    }

    /// Applies an already validated and authorized `action` on behalf of `user`
    pub fn execute(&mut self, user: UserId, action: Action, now: Time) -> Result<Effect, Error> {
        Ok(match action {
            Action::Upvote(c) | Action::Downvote(c) => {
                let vote = match action {
                    Action::Upvote(_) => Vote::Up,
                    _ => Vote::Down,
                };
                let comment = self.comment_mut(c)?;
                comment.vote(user, vote)?;
                Effect::CommentVoted {
                    post_id: comment.post_id,
                    comment_id: c,
                    votes: comment.votes.clone(),
                }
            }
            Action::ToggleLike(p) => {
                let post = self.post_mut(p)?;
                post.toggle_like(user);
                Effect::PostLiked {
                    post_id: p,
                    user_id: user,
                    liked_by: post.liked_by.clone(),
                }
            }
            Action::NewComment(c) => {
                if self.comment(c.id).is_some() {
                    return Err(Error::UuidAlreadyUsed(c.id.0));
                }
                let comment = c.into_comment(user, now);
                self.add_comments(vec![comment.clone()]);
                Effect::CommentAdded(comment)
            }
            Action::DeleteComment(c) => {
                let comment = self.comment_mut(c)?;
                comment.soft_delete();
                Effect::CommentDeleted {
                    post_id: comment.post_id,
                    comment_id: c,
                }
            }
            Action::UpdateAvatar(avatar) => {
                self.user_mut(user)?.avatar = Some(avatar.clone());
                Effect::AvatarChanged {
                    user_id: user,
                    avatar,
                }
            }
            Action::SetDonationLinks(links) => {
                self.user_mut(user)?.donation_links = links.clone();
                Effect::DonationLinksChanged {
                    user_id: user,
                    links,
                }
            }
            Action::NewPost(p) => {
                if self.posts.contains_key(&p.id) {
                    return Err(Error::UuidAlreadyUsed(p.id.0));
                }
                for s in p.segments.iter() {
                    if self.segment_ids_used().any(|id| id == s.id) {
                        return Err(Error::UuidAlreadyUsed(s.id.0));
                    }
                    for i in s.items.iter() {
                        if self.item_ids_used().any(|id| id == i.id) {
                            return Err(Error::UuidAlreadyUsed(i.id.0));
                        }
                    }
                }
                let post = p.into_post(user, now);
                self.add_posts(vec![post.clone()]);
                Effect::PostCreated(post)
            }
            Action::EditSegment {
                post_id,
                segment_id,
                title,
                subtitle,
            } => {
                let post = self.post_mut(post_id)?;
                let segment = post
                    .segment_mut(segment_id)
                    .ok_or(Error::NotFound(segment_id.0))?;
                segment.title = title;
                segment.subtitle = subtitle;
                let segment = segment.clone();
                post.updated_at = Some(now);
                Effect::SegmentEdited {
                    post_id,
                    segment,
                    updated_at: now,
                }
            }
            Action::EditSegmentItem {
                post_id,
                segment_id,
                item_id,
                title,
                description,
            } => {
                let post = self.post_mut(post_id)?;
                let segment = post
                    .segment_mut(segment_id)
                    .ok_or(Error::NotFound(segment_id.0))?;
                let item = segment
                    .item_mut(item_id)
                    .ok_or(Error::NotFound(item_id.0))?;
                item.title = title;
                item.description = description;
                let segment = segment.clone();
                post.updated_at = Some(now);
                Effect::SegmentEdited {
                    post_id,
                    segment,
                    updated_at: now,
                }
            }
        })
    }

    /// Validates, authorizes and then executes `action` on behalf of `user`
    ///
    /// Nothing is modified unless the action is accepted.
    pub async fn submit(
        &mut self,
        user: UserId,
        action: Action,
        now: Time,
    ) -> Result<Effect, Error> {
        action.validate()?;
        action.authorize(&mut AsUser { db: &*self, user }).await??;
        self.execute(user, action, now)
    }

    pub fn record_view(&mut self, post: PostId) -> Result<Effect, Error> {
        let view_count = self.post_mut(post)?.record_view();
        Ok(Effect::PostViewed {
            post_id: post,
            view_count,
        })
    }
}

/// A dump seen by one of its users, for authorizing that user's actions
pub struct AsUser<'a> {
    pub db: &'a DbDump,
    pub user: UserId,
}

#[async_trait]
impl Db for AsUser<'_> {
    fn current_user(&self) -> UserId {
        self.user
    }

    async fn post_author(&mut self, p: PostId) -> anyhow::Result<Option<UserId>> {
        Ok(self.db.posts.get(&p).map(|p| p.author_id))
    }

    async fn comment_info(&mut self, c: CommentId) -> anyhow::Result<Option<CommentInfo>> {
        Ok(self.db.comment(c).map(|c| CommentInfo {
            author_id: c.author_id,
            post_id: c.post_id,
            is_deleted: c.is_deleted,
        }))
    }

    async fn category_exists(&mut self, c: CategoryId) -> anyhow::Result<bool> {
        Ok(self.db.categories.contains_key(&c))
    }

    async fn segment_in_post(&mut self, p: PostId, s: SegmentId) -> anyhow::Result<bool> {
        Ok(self
            .db
            .posts
            .get(&p)
            .map(|p| p.segment(s).is_some())
            .unwrap_or(false))
    }

    async fn item_in_segment(&mut self, s: SegmentId, i: SegmentItemId) -> anyhow::Result<bool> {
        Ok(self.db.posts.values().any(|p| {
            p.segment(s)
                .map(|s| s.items.iter().any(|item| item.id == i))
                .unwrap_or(false)
        }))
    }
}
