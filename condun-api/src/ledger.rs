use std::collections::{HashMap, HashSet};

use crate::{Error, UserId};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum Vote {
    Up,
    Down,
}

impl Vote {
    /// The vote a user has after clicking `clicked` while currently having `current`
    ///
    /// Clicking the current vote again removes it, clicking the other one switches to it.
    pub fn toggle(current: Option<Vote>, clicked: Vote) -> Option<Vote> {
        match current {
            Some(c) if c == clicked => None,
            _ => Some(clicked),
        }
    }

    pub fn weight(self) -> i64 {
        match self {
            Vote::Up => 1,
            Vote::Down => -1,
        }
    }
}

/// Votes cast on one comment
///
/// Each user maps to at most one vote, so a user can never be both an upvoter and
/// a downvoter. On the wire this is still the two membership lists.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "VoteSets", into = "VoteSets")]
pub struct VoteLedger(HashMap<UserId, Vote>);

#[derive(serde::Deserialize, serde::Serialize)]
struct VoteSets {
    upvoters: Vec<UserId>,
    downvoters: Vec<UserId>,
}

impl TryFrom<VoteSets> for VoteLedger {
    type Error = Error;

    fn try_from(sets: VoteSets) -> Result<VoteLedger, Error> {
        let mut res = VoteLedger::default();
        for u in sets.upvoters {
            res.0.insert(u, Vote::Up);
        }
        for u in sets.downvoters {
            if res.0.insert(u, Vote::Down) == Some(Vote::Up) {
                return Err(Error::Validation(format!(
                    "user {:?} both upvoted and downvoted",
                    u.0
                )));
            }
        }
        Ok(res)
    }
}

impl From<VoteLedger> for VoteSets {
    fn from(l: VoteLedger) -> VoteSets {
        let mut upvoters = l.upvoters().collect::<Vec<_>>();
        let mut downvoters = l.downvoters().collect::<Vec<_>>();
        upvoters.sort_unstable();
        downvoters.sort_unstable();
        VoteSets {
            upvoters,
            downvoters,
        }
    }
}

impl VoteLedger {
    pub fn get(&self, user: &UserId) -> Option<Vote> {
        self.0.get(user).copied()
    }

    /// Applies a click on `vote` by `user`, returning the user's vote afterwards
    pub fn cast(&mut self, user: UserId, vote: Vote) -> Option<Vote> {
        let res = Vote::toggle(self.get(&user), vote);
        self.set(user, res);
        res
    }

    pub fn set(&mut self, user: UserId, vote: Option<Vote>) {
        match vote {
            Some(v) => {
                self.0.insert(user, v);
            }
            None => {
                self.0.remove(&user);
            }
        }
    }

    pub fn upvoters(&self) -> impl '_ + Iterator<Item = UserId> {
        self.0
            .iter()
            .filter(|(_, v)| **v == Vote::Up)
            .map(|(u, _)| *u)
    }

    pub fn downvoters(&self) -> impl '_ + Iterator<Item = UserId> {
        self.0
            .iter()
            .filter(|(_, v)| **v == Vote::Down)
            .map(|(u, _)| *u)
    }

    pub fn upvotes(&self) -> usize {
        self.upvoters().count()
    }

    pub fn downvotes(&self) -> usize {
        self.downvoters().count()
    }

    pub fn score(&self) -> i64 {
        self.0.values().map(|v| v.weight()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(UserId, Vote)> for VoteLedger {
    fn from_iter<I: IntoIterator<Item = (UserId, Vote)>>(iter: I) -> VoteLedger {
        VoteLedger(iter.into_iter().collect())
    }
}

/// Users who like one post
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct LikeLedger(HashSet<UserId>);

impl LikeLedger {
    /// Flips `user`'s like, returning whether the user now likes the post
    pub fn toggle(&mut self, user: UserId) -> bool {
        if self.0.remove(&user) {
            false
        } else {
            self.0.insert(user);
            true
        }
    }

    pub fn contains(&self, user: &UserId) -> bool {
        self.0.contains(user)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl '_ + Iterator<Item = &UserId> {
        self.0.iter()
    }
}

impl FromIterator<UserId> for LikeLedger {
    fn from_iter<I: IntoIterator<Item = UserId>>(iter: I) -> LikeLedger {
        LikeLedger(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Uuid;

    fn user(n: u128) -> UserId {
        UserId(Uuid::from_u128(n))
    }

    #[test]
    fn toggle_transitions() {
        assert_eq!(Vote::toggle(None, Vote::Up), Some(Vote::Up));
        assert_eq!(Vote::toggle(Some(Vote::Up), Vote::Up), None);
        assert_eq!(Vote::toggle(Some(Vote::Up), Vote::Down), Some(Vote::Down));
        assert_eq!(Vote::toggle(Some(Vote::Down), Vote::Down), None);
        assert_eq!(Vote::toggle(Some(Vote::Down), Vote::Up), Some(Vote::Up));
    }

    #[test]
    fn upvote_twice_restores_ledger() {
        let mut l = VoteLedger::default();
        l.cast(user(2), Vote::Down);
        let before = l.clone();
        assert_eq!(l.cast(user(1), Vote::Up), Some(Vote::Up));
        assert_eq!(l.cast(user(1), Vote::Up), None);
        assert_eq!(l, before);
    }

    #[test]
    fn upvote_then_downvote_switches() {
        let mut l = VoteLedger::default();
        l.cast(user(1), Vote::Up);
        l.cast(user(1), Vote::Down);
        assert_eq!(l.upvoters().count(), 0);
        assert_eq!(l.downvoters().collect::<Vec<_>>(), vec![user(1)]);
        assert_eq!(l.score(), -1);
    }

    #[test]
    fn score_is_derived_from_both_sides() {
        let mut l = VoteLedger::default();
        l.cast(user(1), Vote::Up);
        l.cast(user(2), Vote::Up);
        l.cast(user(3), Vote::Down);
        assert_eq!((l.upvotes(), l.downvotes(), l.score()), (2, 1, 1));
    }

    #[test]
    fn wire_format_is_two_sets() {
        let mut l = VoteLedger::default();
        l.cast(user(1), Vote::Up);
        l.cast(user(2), Vote::Down);
        let json = serde_json::to_value(&l).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "upvoters": [user(1)],
                "downvoters": [user(2)],
            })
        );
        assert_eq!(serde_json::from_value::<VoteLedger>(json).unwrap(), l);
    }

    #[test]
    fn wire_format_rejects_double_membership() {
        let json = serde_json::json!({
            "upvoters": [user(1)],
            "downvoters": [user(1)],
        });
        assert!(serde_json::from_value::<VoteLedger>(json).is_err());
    }

    #[test]
    fn like_twice_is_a_noop() {
        let mut l = [user(5)].into_iter().collect::<LikeLedger>();
        let before = l.clone();
        assert!(l.toggle(user(1)));
        assert!(!l.toggle(user(1)));
        assert_eq!(l, before);
        assert!(!l.toggle(user(5)));
        assert!(l.is_empty());
    }
}
