use std::{borrow::Borrow, cmp::Reverse};

use crate::api::{Comment, CommentOrder, Post, PostOrder};

pub trait OrderExt<T> {
    fn sort(&self, items: &mut [T]);
}

impl<T: Borrow<Post>> OrderExt<T> for PostOrder {
    fn sort(&self, posts: &mut [T]) {
        match self {
            PostOrder::Newest => posts.sort_unstable_by_key(|p| {
                let p = p.borrow();
                (Reverse(p.created_at), p.id)
            }),
            PostOrder::Oldest => posts.sort_unstable_by_key(|p| {
                let p = p.borrow();
                (p.created_at, p.id)
            }),
            PostOrder::MostLiked => posts.sort_unstable_by_key(|p| {
                let p = p.borrow();
                (Reverse(p.liked_by.len()), p.id)
            }),
            PostOrder::MostViewed => posts.sort_unstable_by_key(|p| {
                let p = p.borrow();
                (Reverse(p.view_count), p.id)
            }),
        }
    }
}

impl<T: Borrow<Comment>> OrderExt<T> for CommentOrder {
    /// Stable, so that comments with equal keys keep their relative order
    fn sort(&self, comments: &mut [T]) {
        match self {
            CommentOrder::Newest => comments.sort_by_key(|c| Reverse(c.borrow().created_at)),
            CommentOrder::Oldest => comments.sort_by_key(|c| c.borrow().created_at),
            CommentOrder::Top => comments.sort_by_key(|c| {
                let c = c.borrow();
                (Reverse(c.score()), Reverse(c.created_at))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;

    use super::*;
    use crate::api::{
        CategoryId, CommentId, LikeLedger, PostId, UserId, Uuid, Vote, VoteLedger,
    };

    fn post(id: u128, created: i64, likes: u128, views: u64) -> Arc<Post> {
        Arc::new(Post {
            id: PostId(Uuid::from_u128(id)),
            author_id: UserId::stub(),
            title: format!("post {id}"),
            description: String::new(),
            category_id: CategoryId(Uuid::from_u128(1)),
            tags: Default::default(),
            segments: Vec::new(),
            liked_by: (0..likes)
                .map(|u| UserId(Uuid::from_u128(u)))
                .collect::<LikeLedger>(),
            view_count: views,
            created_at: chrono::Utc.timestamp_opt(created, 0).unwrap(),
            updated_at: None,
        })
    }

    fn ids<T: Borrow<Post>>(posts: &[T]) -> Vec<u128> {
        posts.iter().map(|p| p.borrow().id.0.as_u128()).collect()
    }

    #[test]
    fn posts() {
        let mut posts = vec![post(1, 10, 0, 5), post(2, 30, 2, 5), post(3, 20, 1, 9)];
        PostOrder::Newest.sort(&mut posts);
        assert_eq!(ids(&posts), vec![2, 3, 1]);
        PostOrder::Oldest.sort(&mut posts);
        assert_eq!(ids(&posts), vec![1, 3, 2]);
        PostOrder::MostLiked.sort(&mut posts);
        assert_eq!(ids(&posts), vec![2, 3, 1]);
        // ties broken by id
        PostOrder::MostViewed.sort(&mut posts);
        assert_eq!(ids(&posts), vec![3, 1, 2]);
    }

    fn comment(id: u128, created: i64, up: u128, down: u128) -> Comment {
        let votes = (0..up)
            .map(|u| (UserId(Uuid::from_u128(u)), Vote::Up))
            .chain((up..up + down).map(|u| (UserId(Uuid::from_u128(u)), Vote::Down)))
            .collect::<VoteLedger>();
        Comment {
            id: CommentId(Uuid::from_u128(id)),
            post_id: PostId(Uuid::from_u128(100)),
            parent_id: None,
            author_id: UserId::stub(),
            text: String::from("text"),
            is_deleted: false,
            created_at: chrono::Utc.timestamp_opt(created, 0).unwrap(),
            votes,
        }
    }

    #[test]
    fn comments() {
        let mut comments = vec![
            comment(1, 10, 1, 0),
            comment(2, 20, 3, 1),
            comment(3, 30, 2, 1),
            comment(4, 40, 0, 0),
        ];
        let order = |c: &[Comment]| c.iter().map(|c| c.id.0.as_u128()).collect::<Vec<_>>();
        CommentOrder::Top.sort(&mut comments);
        // scores 1, 2, 1, 0: equal scores show the newest first
        assert_eq!(order(&comments), vec![2, 3, 1, 4]);
        CommentOrder::Newest.sort(&mut comments);
        assert_eq!(order(&comments), vec![4, 3, 2, 1]);
        CommentOrder::Oldest.sort(&mut comments);
        assert_eq!(order(&comments), vec![1, 2, 3, 4]);
    }
}
