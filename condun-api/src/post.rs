use std::collections::{BTreeSet, HashSet};

use uuid::Uuid;

use crate::{Error, ImageId, LikeLedger, Time, UserId};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct PostId(pub Uuid);

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CategoryId(pub Uuid);

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct SegmentId(pub Uuid);

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct SegmentItemId(pub Uuid);

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

impl Category {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_name(&self.name)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PostSegmentItem {
    pub id: SegmentItemId,
    pub title: String,
    pub description: String,
}

impl PostSegmentItem {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_text("item title", &self.title)?;
        crate::validate_string(&self.description)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PostSegment {
    pub id: SegmentId,
    pub title: String,
    pub subtitle: Option<String>,
    pub image_id: Option<ImageId>,

    /// In display order
    pub items: Vec<PostSegmentItem>,
}

impl PostSegment {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_text("segment title", &self.title)?;
        if let Some(s) = &self.subtitle {
            crate::validate_string(s)?;
        }
        if let Some(i) = &self.image_id {
            crate::validate_text("image id", &i.0)?;
        }
        for i in self.items.iter() {
            i.validate()?;
        }
        Ok(())
    }

    pub fn item_mut(&mut self, id: SegmentItemId) -> Option<&mut PostSegmentItem> {
        self.items.iter_mut().find(|i| i.id == id)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Post {
    pub id: PostId,
    pub author_id: UserId,
    pub title: String,
    pub description: String,
    pub category_id: CategoryId,
    pub tags: BTreeSet<String>,

    /// In display order
    pub segments: Vec<PostSegment>,

    pub liked_by: LikeLedger,
    pub view_count: u64,
    pub created_at: Time,
    pub updated_at: Option<Time>,
}

impl Post {
    /// Flips `user`'s like, returning whether the user now likes the post
    pub fn toggle_like(&mut self, user: UserId) -> bool {
        self.liked_by.toggle(user)
    }

    pub fn record_view(&mut self) -> u64 {
        self.view_count = self.view_count.saturating_add(1);
        self.view_count
    }

    pub fn segment(&self, id: SegmentId) -> Option<&PostSegment> {
        self.segments.iter().find(|s| s.id == id)
    }

    pub fn segment_mut(&mut self, id: SegmentId) -> Option<&mut PostSegment> {
        self.segments.iter_mut().find(|s| s.id == id)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewPost {
    pub id: PostId,
    pub title: String,
    pub description: String,
    pub category_id: CategoryId,
    pub tags: BTreeSet<String>,
    pub segments: Vec<PostSegment>,
}

impl NewPost {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_text("post title", &self.title)?;
        crate::validate_string(&self.description)?;
        for t in self.tags.iter() {
            crate::validate_name(t)?;
        }
        let mut ids = HashSet::new();
        for s in self.segments.iter() {
            s.validate()?;
            let item_ids = s.items.iter().map(|i| i.id.0);
            for id in std::iter::once(s.id.0).chain(item_ids) {
                if !ids.insert(id) {
                    return Err(Error::UuidAlreadyUsed(id));
                }
            }
        }
        Ok(())
    }

    pub fn into_post(self, author_id: UserId, created_at: Time) -> Post {
        Post {
            id: self.id,
            author_id,
            title: self.title,
            description: self.description,
            category_id: self.category_id,
            tags: self.tags,
            segments: self.segments,
            liked_by: LikeLedger::default(),
            view_count: 0,
            created_at,
            updated_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(id: u128, items: &[u128]) -> PostSegment {
        PostSegment {
            id: SegmentId(Uuid::from_u128(id)),
            title: format!("segment {id}"),
            subtitle: None,
            image_id: None,
            items: items
                .iter()
                .map(|&i| PostSegmentItem {
                    id: SegmentItemId(Uuid::from_u128(i)),
                    title: format!("item {i}"),
                    description: String::new(),
                })
                .collect(),
        }
    }

    fn post(segments: Vec<PostSegment>) -> NewPost {
        NewPost {
            id: PostId(Uuid::from_u128(1)),
            title: String::from("Lisbon"),
            description: String::new(),
            category_id: CategoryId(Uuid::from_u128(2)),
            tags: BTreeSet::new(),
            segments,
        }
    }

    #[test]
    fn ids_are_unique_within_a_post() {
        assert_eq!(post(vec![segment(10, &[11, 12]), segment(20, &[])]).validate(), Ok(()));
        assert_eq!(
            post(vec![segment(10, &[]), segment(10, &[])]).validate(),
            Err(Error::UuidAlreadyUsed(Uuid::from_u128(10)))
        );
        assert_eq!(
            post(vec![segment(10, &[11]), segment(20, &[11])]).validate(),
            Err(Error::UuidAlreadyUsed(Uuid::from_u128(11)))
        );
    }

    #[test]
    fn empty_titles_are_refused() {
        let mut p = post(Vec::new());
        p.title = String::from(" ");
        assert!(matches!(p.validate(), Err(Error::Validation(_))));
    }
}
