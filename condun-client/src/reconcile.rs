use crate::{
    api::{Effect, PostId, User},
    Cache, CommentView, PostDetail, PostSummary, View, ViewKey,
};

/// What `reconcile` did to one warm view
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    Patched,

    /// The view could embed the entity but does not
    Untouched,

    /// The effect does not carry enough to patch the view, so it will be reloaded
    Invalidated,

    /// The view did not have the shape its key promises, and was left as is
    ShapeMismatch,
}

/// Per-key report of one `reconcile` call, listing only the keys it looked at
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Reconciliation {
    pub outcomes: Vec<(ViewKey, Outcome)>,
}

impl Reconciliation {
    pub fn outcome(&self, key: &ViewKey) -> Option<Outcome> {
        self.outcomes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, o)| *o)
    }

    pub fn patched(&self) -> impl '_ + Iterator<Item = &ViewKey> {
        self.outcomes
            .iter()
            .filter(|(_, o)| *o == Outcome::Patched)
            .map(|(k, _)| k)
    }
}

enum Plan {
    Skip,
    Patch,
    Invalidate,
}

enum Patch {
    Updated(View),
    Unchanged,
    Stale,
    Mismatch,
}

/// Propagates a server-confirmed `effect` into every cached view that embeds the
/// entity it is about
///
/// Cold views are never loaded, and views that do not embed the entity keep their
/// allocation.
pub fn reconcile<C: Cache + ?Sized>(cache: &mut C, effect: &Effect) -> Reconciliation {
    let mut res = Reconciliation::default();
    for key in cache.keys() {
        let outcome = match plan(effect, &key) {
            Plan::Skip => continue,
            Plan::Invalidate => {
                cache.invalidate(&key);
                Outcome::Invalidated
            }
            Plan::Patch => patch_slot(cache, &key, effect),
        };
        res.outcomes.push((key, outcome));
    }
    res
}

fn plan(effect: &Effect, key: &ViewKey) -> Plan {
    let patch_if = |b: bool| if b { Plan::Patch } else { Plan::Skip };
    match effect {
        Effect::CommentVoted { post_id, .. } | Effect::CommentDeleted { post_id, .. } => {
            patch_if(*key == ViewKey::Comments(*post_id))
        }
        Effect::CommentAdded(c) => {
            patch_if(key.is_post_list() || *key == ViewKey::Comments(c.post_id))
        }
        // searches can filter on likes and segment text, which summaries don't carry
        Effect::PostLiked { .. } | Effect::SegmentEdited { .. }
            if matches!(key, ViewKey::Search(_)) =>
        {
            Plan::Invalidate
        }
        Effect::PostLiked { post_id, .. } | Effect::PostViewed { post_id, .. } => {
            patch_if(key.is_post_list() || *key == ViewKey::Post(*post_id))
        }
        Effect::AvatarChanged { user_id, .. } => patch_if(match key {
            ViewKey::Post(_) | ViewKey::Comments(_) => true,
            ViewKey::Profile(u) => u == user_id,
            k => k.is_post_list(),
        }),
        Effect::DonationLinksChanged { user_id, .. } => {
            patch_if(*key == ViewKey::Profile(*user_id))
        }
        Effect::PostCreated(p) => {
            let listed = match key {
                ViewKey::AllPosts | ViewKey::Search(_) => true,
                ViewKey::UserPosts(u) => *u == p.author_id,
                ViewKey::Category(c) => *c == p.category_id,
                ViewKey::Tag(t) => p.tags.contains(t),
                _ => false,
            };
            match listed {
                true => Plan::Invalidate,
                false => Plan::Skip,
            }
        }
        Effect::SegmentEdited { post_id, .. } => patch_if(*key == ViewKey::Post(*post_id)),
    }
}

fn patch_slot<C: Cache + ?Sized>(cache: &mut C, key: &ViewKey, effect: &Effect) -> Outcome {
    let mut outcome = Outcome::Untouched;
    cache.set(key, &mut |view| match patch(effect, key, view) {
        Patch::Updated(v) => {
            outcome = Outcome::Patched;
            Some(v)
        }
        Patch::Unchanged => None,
        Patch::Stale => {
            outcome = Outcome::Invalidated;
            None
        }
        Patch::Mismatch => {
            outcome = Outcome::ShapeMismatch;
            None
        }
    });
    match outcome {
        Outcome::Invalidated => cache.invalidate(key),
        Outcome::ShapeMismatch => {
            tracing::debug!(?key, "cached view has an unexpected shape, leaving it stale")
        }
        Outcome::Patched | Outcome::Untouched => (),
    }
    outcome
}

fn patch(effect: &Effect, key: &ViewKey, view: &View) -> Patch {
    match (key, view) {
        (k, View::Posts(list)) if k.is_post_list() => patch_posts(effect, k, list),
        (ViewKey::Post(_), View::Post(detail)) => patch_post(effect, detail),
        (ViewKey::Comments(_), View::Comments(list)) => patch_comments(effect, list),
        (ViewKey::Profile(_), View::Profile(user)) => patch_profile(effect, user),
        _ => Patch::Mismatch,
    }
}

fn update_summaries<F>(list: &[PostSummary], mut f: F) -> Patch
where
    F: FnMut(&mut PostSummary) -> bool,
{
    let mut list = list.to_vec();
    let mut touched = false;
    for s in list.iter_mut() {
        touched |= f(s);
    }
    match touched {
        true => Patch::Updated(View::Posts(list)),
        false => Patch::Unchanged,
    }
}

fn update_summary<F>(list: &[PostSummary], post: PostId, mut f: F) -> Patch
where
    F: FnMut(&mut PostSummary),
{
    update_summaries(list, |s| {
        if s.id != post {
            return false;
        }
        f(s);
        true
    })
}

fn patch_posts(effect: &Effect, key: &ViewKey, list: &[PostSummary]) -> Patch {
    match effect {
        Effect::CommentAdded(c) => update_summary(list, c.post_id, |s| s.comment_count += 1),
        Effect::PostLiked {
            post_id,
            user_id,
            liked_by,
        } => {
            let listed = list.iter().any(|s| s.id == *post_id);
            match key {
                ViewKey::LikedPosts(u) if u == user_id => match (liked_by.contains(u), listed) {
                    (true, false) => Patch::Stale,
                    (false, true) => Patch::Updated(View::Posts(
                        list.iter().filter(|s| s.id != *post_id).cloned().collect(),
                    )),
                    (false, false) => Patch::Unchanged,
                    (true, true) => {
                        update_summary(list, *post_id, |s| s.liked_by = liked_by.clone())
                    }
                },
                _ => update_summary(list, *post_id, |s| s.liked_by = liked_by.clone()),
            }
        }
        Effect::PostViewed {
            post_id,
            view_count,
        } => update_summary(list, *post_id, |s| s.view_count = *view_count),
        Effect::AvatarChanged { user_id, avatar } => update_summaries(list, |s| {
            if s.author.id != *user_id {
                return false;
            }
            s.author.avatar = Some(avatar.clone());
            true
        }),
        _ => Patch::Unchanged,
    }
}

fn patch_post(effect: &Effect, detail: &PostDetail) -> Patch {
    let mut detail = detail.clone();
    match effect {
        Effect::PostLiked {
            post_id, liked_by, ..
        } if *post_id == detail.post.id => detail.post.liked_by = liked_by.clone(),
        Effect::PostViewed {
            post_id,
            view_count,
        } if *post_id == detail.post.id => detail.post.view_count = *view_count,
        Effect::AvatarChanged { user_id, avatar } if *user_id == detail.author.id => {
            detail.author.avatar = Some(avatar.clone())
        }
        Effect::SegmentEdited {
            post_id,
            segment,
            updated_at,
        } if *post_id == detail.post.id => match detail.post.segment_mut(segment.id) {
            Some(s) => {
                *s = segment.clone();
                detail.post.updated_at = Some(*updated_at);
            }
            None => return Patch::Stale,
        },
        _ => return Patch::Unchanged,
    }
    Patch::Updated(View::Post(detail))
}

fn patch_comments(effect: &Effect, list: &[CommentView]) -> Patch {
    let mut list = list.to_vec();
    match effect {
        Effect::CommentVoted {
            comment_id, votes, ..
        } => match list.iter_mut().find(|c| c.comment.id == *comment_id) {
            Some(c) => c.comment.votes = votes.clone(),
            None => return Patch::Unchanged,
        },
        Effect::CommentDeleted { comment_id, .. } => {
            match list.iter_mut().find(|c| c.comment.id == *comment_id) {
                Some(c) => c.comment.soft_delete(),
                None => return Patch::Unchanged,
            }
        }
        Effect::CommentAdded(comment) => {
            if list.iter().any(|c| c.comment.id == comment.id) {
                return Patch::Unchanged;
            }
            // the effect does not say how the author is displayed, reuse it if known
            let author = match list.iter().find(|c| c.author.id == comment.author_id) {
                Some(c) => c.author.clone(),
                None => return Patch::Stale,
            };
            list.push(CommentView {
                comment: comment.clone(),
                author,
            });
        }
        Effect::AvatarChanged { user_id, avatar } => {
            let mut touched = false;
            for c in list.iter_mut().filter(|c| c.author.id == *user_id) {
                c.author.avatar = Some(avatar.clone());
                touched = true;
            }
            if !touched {
                return Patch::Unchanged;
            }
        }
        _ => return Patch::Unchanged,
    }
    Patch::Updated(View::Comments(list))
}

fn patch_profile(effect: &Effect, user: &User) -> Patch {
    let mut user = user.clone();
    match effect {
        Effect::AvatarChanged { user_id, avatar } if *user_id == user.id => {
            user.avatar = Some(avatar.clone())
        }
        Effect::DonationLinksChanged { user_id, links } if *user_id == user.id => {
            user.donation_links = links.clone()
        }
        _ => return Patch::Unchanged,
    }
    Patch::Updated(View::Profile(user))
}
