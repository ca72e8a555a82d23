use std::collections::BTreeSet;

use crate::api::{
    Avatar, Category, CategoryId, Comment, LikeLedger, Post, PostId, Time, User, UserId,
};

/// What post and comment views show about their author
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AuthorView {
    pub id: UserId,
    pub name: String,
    pub avatar: Option<Avatar>,
}

impl From<&User> for AuthorView {
    fn from(u: &User) -> AuthorView {
        AuthorView {
            id: u.id,
            name: u.name.clone(),
            avatar: u.avatar.clone(),
        }
    }
}

/// One entry of a post list
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PostSummary {
    pub id: PostId,
    pub title: String,
    pub description: String,
    pub author: AuthorView,
    pub category: Option<Category>,
    pub tags: BTreeSet<String>,
    pub liked_by: LikeLedger,
    pub view_count: u64,
    pub comment_count: usize,
    pub created_at: Time,
}

impl PostSummary {
    pub fn new(
        post: &Post,
        author: AuthorView,
        category: Option<Category>,
        comment_count: usize,
    ) -> PostSummary {
        PostSummary {
            id: post.id,
            title: post.title.clone(),
            description: post.description.clone(),
            author,
            category,
            tags: post.tags.clone(),
            liked_by: post.liked_by.clone(),
            view_count: post.view_count,
            comment_count,
            created_at: post.created_at,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PostDetail {
    pub post: Post,
    pub author: AuthorView,
    pub category: Option<Category>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommentView {
    pub comment: Comment,
    pub author: AuthorView,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum View {
    Posts(Vec<PostSummary>),
    Post(PostDetail),
    /// Flat, in creation order; `build_forest` turns it into a tree
    Comments(Vec<CommentView>),
    Profile(User),
}

/// Name of a cached view
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ViewKey {
    AllPosts,
    UserPosts(UserId),
    LikedPosts(UserId),
    Category(CategoryId),
    Tag(String),
    /// Raw search string, as typed
    Search(String),
    Post(PostId),
    Comments(PostId),
    Profile(UserId),
}

impl ViewKey {
    /// Whether this key names a `View::Posts`
    pub fn is_post_list(&self) -> bool {
        matches!(
            self,
            ViewKey::AllPosts
                | ViewKey::UserPosts(_)
                | ViewKey::LikedPosts(_)
                | ViewKey::Category(_)
                | ViewKey::Tag(_)
                | ViewKey::Search(_)
        )
    }
}
