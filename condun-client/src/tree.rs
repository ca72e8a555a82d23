use std::collections::HashMap;

use crate::api::{Comment, CommentId};

#[derive(Debug)]
pub struct CommentNode {
    pub comment: Comment,

    /// Replies, in the order they had in the flat list
    pub children: Vec<CommentNode>,
}

impl CommentNode {
    /// Number of comments in this subtree, including this one
    pub fn len(&self) -> usize {
        CommentNode::walk(std::slice::from_ref(self)).count()
    }

    /// 1 for a comment without replies
    pub fn depth(&self) -> usize {
        CommentNode::walk(std::slice::from_ref(self))
            .map(|(level, _)| level + 1)
            .max()
            .unwrap_or(1)
    }

    /// Pre-order traversal of `forest`, yielding each comment with its nesting level
    pub fn walk<'a>(forest: &'a [CommentNode]) -> impl 'a + Iterator<Item = (usize, &'a Comment)> {
        let mut stack = forest.iter().rev().map(|n| (0, n)).collect::<Vec<_>>();
        std::iter::from_fn(move || {
            let (level, node) = stack.pop()?;
            stack.extend(node.children.iter().rev().map(|c| (level + 1, c)));
            Some((level, &node.comment))
        })
    }
}

// Reply chains can be arbitrarily long, so the subtree is flattened before it drops
impl Drop for CommentNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

/// A comment whose replies are still being assembled
struct Frame<'a> {
    comment: &'a Comment,
    replies: std::vec::IntoIter<&'a Comment>,
    children: Vec<CommentNode>,
}

/// Rebuilds the reply forest of a post from its flat comment list
///
/// Siblings keep the relative order they had in `comments`, so sort the list first
/// for any other order. Comments whose parent is not in the list can't be reached
/// from a root and are left out.
pub fn build_forest(comments: &[Comment]) -> Vec<CommentNode> {
    let mut by_parent: HashMap<Option<CommentId>, Vec<&Comment>> = HashMap::new();
    for c in comments {
        by_parent.entry(c.parent_id).or_default().push(c);
    }

    let mut forest = Vec::new();
    let mut roots = by_parent.remove(&None).unwrap_or_default().into_iter();
    let mut stack: Vec<Frame<'_>> = Vec::new();
    loop {
        let next = match stack.last_mut() {
            Some(frame) => frame.replies.next(),
            None => roots.next(),
        };
        if let Some(c) = next {
            // removing the bucket means a cycle in parent ids can't be walked twice
            let replies = by_parent.remove(&Some(c.id)).unwrap_or_default();
            stack.push(Frame {
                comment: c,
                replies: replies.into_iter(),
                children: Vec::new(),
            });
            continue;
        }
        let Some(done) = stack.pop() else { break };
        let node = CommentNode {
            comment: done.comment.clone(),
            children: done.children,
        };
        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => forest.push(node),
        }
    }

    let placed = CommentNode::walk(&forest).count();
    if placed != comments.len() {
        tracing::warn!(
            dropped = comments.len() - placed,
            total = comments.len(),
            "comments without a reachable parent were left out of the tree"
        );
    }
    forest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{PostId, UserId, Uuid, VoteLedger};
    use chrono::TimeZone;
    use std::collections::HashSet;

    fn comment(id: u128, parent: Option<u128>) -> Comment {
        Comment {
            id: CommentId(Uuid::from_u128(id)),
            post_id: PostId(Uuid::from_u128(1000)),
            parent_id: parent.map(|p| CommentId(Uuid::from_u128(p))),
            author_id: UserId::stub(),
            text: format!("comment {id}"),
            is_deleted: false,
            created_at: chrono::Utc.timestamp_opt(0, 0).unwrap(),
            votes: VoteLedger::default(),
        }
    }

    fn shape(forest: &[CommentNode]) -> Vec<(u128, Vec<u128>)> {
        // (id, ids of direct children) in pre-order
        let mut res = Vec::new();
        for n in forest {
            res.push((
                n.comment.id.0.as_u128(),
                n.children.iter().map(|c| c.comment.id.0.as_u128()).collect(),
            ));
            res.extend(shape(&n.children));
        }
        res
    }

    #[test]
    fn nests_replies() {
        let comments = vec![
            comment(1, None),
            comment(2, Some(1)),
            comment(3, None),
            comment(4, Some(2)),
        ];
        let forest = build_forest(&comments);
        assert_eq!(
            shape(&forest),
            vec![(1, vec![2]), (2, vec![4]), (4, vec![]), (3, vec![])]
        );
        assert_eq!(forest[0].depth(), 3);
        assert_eq!(forest[1].depth(), 1);
    }

    #[test]
    fn children_listed_before_parent_still_attach() {
        let comments = vec![comment(4, Some(2)), comment(2, Some(1)), comment(1, None)];
        let forest = build_forest(&comments);
        assert_eq!(shape(&forest), vec![(1, vec![2]), (2, vec![4]), (4, vec![])]);
    }

    #[test]
    fn siblings_keep_input_order() {
        let comments = vec![
            comment(1, None),
            comment(30, Some(1)),
            comment(10, Some(1)),
            comment(20, Some(1)),
        ];
        let forest = build_forest(&comments);
        assert_eq!(shape(&forest)[0], (1, vec![30, 10, 20]));
    }

    #[test]
    fn complete_when_every_parent_resolves() {
        let comments = (0..50u128)
            .map(|i| comment(i, if i % 7 == 0 { None } else { Some(i / 2) }))
            .collect::<Vec<_>>();
        let forest = build_forest(&comments);
        let walked = CommentNode::walk(&forest)
            .map(|(_, c)| c.id)
            .collect::<HashSet<_>>();
        let input = comments.iter().map(|c| c.id).collect::<HashSet<_>>();
        assert_eq!(walked, input);
        assert_eq!(forest.iter().map(|n| n.len()).sum::<usize>(), comments.len());
    }

    #[test]
    fn orphans_are_dropped() {
        let comments = vec![
            comment(1, None),
            comment(2, Some(99)),
            comment(3, Some(2)),
            comment(4, Some(1)),
        ];
        let forest = build_forest(&comments);
        let walked = CommentNode::walk(&forest)
            .map(|(_, c)| c.id.0.as_u128())
            .collect::<Vec<_>>();
        assert_eq!(walked, vec![1, 4]);
    }

    #[test]
    fn cycles_are_dropped() {
        let comments = vec![comment(1, None), comment(2, Some(3)), comment(3, Some(2))];
        let forest = build_forest(&comments);
        assert_eq!(shape(&forest), vec![(1, vec![])]);
    }

    #[test]
    fn deleted_comments_keep_their_replies() {
        let mut parent = comment(1, None);
        parent.soft_delete();
        let comments = vec![parent, comment(2, Some(1))];
        let forest = build_forest(&comments);
        assert!(forest[0].comment.is_deleted);
        assert_eq!(forest[0].comment.text, "");
        assert_eq!(forest[0].children.len(), 1);
    }

    #[test]
    fn walk_reports_levels() {
        let comments = vec![comment(1, None), comment(2, Some(1)), comment(3, Some(2))];
        let forest = build_forest(&comments);
        let levels = CommentNode::walk(&forest)
            .map(|(l, c)| (l, c.id.0.as_u128()))
            .collect::<Vec<_>>();
        assert_eq!(levels, vec![(0, 1), (1, 2), (2, 3)]);
    }

    #[test]
    fn long_reply_chains() {
        let comments = (0..100_000u128)
            .map(|i| comment(i, i.checked_sub(1)))
            .collect::<Vec<_>>();
        let forest = build_forest(&comments);
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].len(), comments.len());
        assert_eq!(forest[0].depth(), comments.len());
        let last = CommentNode::walk(&forest).last().unwrap();
        assert_eq!(last, (comments.len() - 1, &comments[comments.len() - 1]));
        drop(forest);
    }

    #[test]
    fn input_is_untouched() {
        let comments = vec![comment(1, None), comment(2, Some(1))];
        let before = comments.clone();
        let _ = build_forest(&comments);
        assert_eq!(comments, before);
    }
}
