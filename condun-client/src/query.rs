use crate::api::{Post, Query};

pub trait QueryExt {
    fn matches(&self, post: &Post) -> bool;
}

impl QueryExt for Query {
    fn matches(&self, post: &Post) -> bool {
        match self {
            Query::Any(q) => q.iter().any(|q| q.matches(post)),
            Query::All(q) => q.iter().all(|q| q.matches(post)),
            Query::Not(q) => !q.matches(post),
            Query::Category(c) => post.category_id == *c,
            Query::Tag(t) => post.tags.contains(t),
            Query::Author(u) => post.author_id == *u,
            Query::LikedBy(u) => post.liked_by.contains(u),
            Query::Phrase(p) => {
                let p = p.to_lowercase();
                texts(post).any(|t| t.to_lowercase().contains(&p))
            }
        }
    }
}

fn texts(post: &Post) -> impl '_ + Iterator<Item = &str> {
    let segments = post.segments.iter().flat_map(|s| {
        std::iter::once(&s.title as &str)
            .chain(s.subtitle.as_deref())
            .chain(
                s.items
                    .iter()
                    .flat_map(|i| [&i.title as &str, &i.description as &str]),
            )
    });
    [&post.title as &str, &post.description as &str]
        .into_iter()
        .chain(segments)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::api::{
        CategoryId, PostId, PostSegment, PostSegmentItem, SegmentId, SegmentItemId, UserId, Uuid,
    };

    fn example_post() -> Post {
        Post {
            id: PostId(Uuid::from_u128(1)),
            author_id: UserId(Uuid::from_u128(2)),
            title: String::from("Weekend in Lisbon"),
            description: String::from("Where to eat"),
            category_id: CategoryId(Uuid::from_u128(3)),
            tags: ["food", "travel"].into_iter().map(String::from).collect(),
            segments: vec![PostSegment {
                id: SegmentId(Uuid::from_u128(4)),
                title: String::from("Day one"),
                subtitle: Some(String::from("Alfama")),
                image_id: None,
                items: vec![PostSegmentItem {
                    id: SegmentItemId(Uuid::from_u128(5)),
                    title: String::from("Pastéis"),
                    description: String::from("Custard tarts by the river"),
                }],
            }],
            liked_by: [UserId(Uuid::from_u128(6))].into_iter().collect(),
            view_count: 0,
            created_at: chrono::Utc.timestamp_opt(0, 0).unwrap(),
            updated_at: None,
        }
    }

    #[test]
    fn phrases_search_every_text() {
        let p = example_post();
        for needle in ["lisbon", "WHERE", "day one", "alfama", "pastéis", "custard"] {
            assert!(Query::Phrase(String::from(needle)).matches(&p), "{needle}");
        }
        assert!(!Query::Phrase(String::from("porto")).matches(&p));
    }

    #[test]
    fn combinators() {
        let p = example_post();
        let food = Query::Tag(String::from("food"));
        let mine = Query::Author(UserId(Uuid::from_u128(2)));
        let liked = Query::LikedBy(UserId(Uuid::from_u128(7)));
        assert!(Query::everything().matches(&p));
        assert!(!Query::Any(vec![]).matches(&p));
        assert!(Query::All(vec![food.clone(), mine.clone()]).matches(&p));
        assert!(!Query::All(vec![food.clone(), liked.clone()]).matches(&p));
        assert!(Query::Any(vec![liked.clone(), food]).matches(&p));
        assert!(Query::Not(Box::new(liked)).matches(&p));
        assert!(Query::Category(CategoryId(Uuid::from_u128(3))).matches(&p));
    }
}
