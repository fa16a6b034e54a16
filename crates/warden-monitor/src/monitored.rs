//! The set of identities that must never share a call.

use std::collections::HashSet;

use warden_events::PersonId;

/// Monitored identities, fixed at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitoredSet {
    people: HashSet<PersonId>,
}

impl MonitoredSet {
    /// Builds the set from resolved person ids. Duplicates collapse.
    #[must_use]
    pub fn new(people: impl IntoIterator<Item = PersonId>) -> Self {
        Self {
            people: people.into_iter().collect(),
        }
    }

    /// Returns true if `person` is monitored.
    #[inline]
    #[must_use]
    pub fn contains(&self, person: &PersonId) -> bool {
        self.people.contains(person)
    }

    /// Number of monitored identities.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.people.len()
    }

    /// Returns true if nobody is monitored.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }

    /// Iterates over the monitored identities in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &PersonId> {
        self.people.iter()
    }
}

impl FromIterator<PersonId> for MonitoredSet {
    fn from_iter<I: IntoIterator<Item = PersonId>>(iter: I) -> Self {
        Self::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership_and_dedup() {
        let set: MonitoredSet = ["a", "b", "a"].into_iter().map(PersonId::from).collect();
        assert_eq!(set.len(), 2);
        assert!(set.contains(&PersonId::new("a")));
        assert!(!set.contains(&PersonId::new("c")));
    }
}
