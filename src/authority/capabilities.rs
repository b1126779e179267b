use serde::Serialize;
use std::collections::BTreeSet;

use crate::engine::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    View,
    ViewOwnProfile,
    RequestUnblock,
    /// Apply, register, respond, post
    Participate,
    Edit,
    Delete,
    Restore,
    HardDelete,
    Block,
    Unblock,
    ChangeRole,
    /// Publish or reject gated content
    ApproveContent,
    /// Decide event registrations and job applications
    Review,
}

impl Capability {
    pub const ALL: &'static [Capability] = &[
        Capability::View,
        Capability::ViewOwnProfile,
        Capability::RequestUnblock,
        Capability::Participate,
        Capability::Edit,
        Capability::Delete,
        Capability::Restore,
        Capability::HardDelete,
        Capability::Block,
        Capability::Unblock,
        Capability::ChangeRole,
        Capability::ApproveContent,
        Capability::Review,
    ];
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn insert(&mut self, capability: Capability) {
        self.0.insert(capability);
    }

    pub fn remove(&mut self, capability: Capability) {
        self.0.remove(&capability);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    pub fn require(&self, capability: Capability) -> EngineResult<()> {
        if self.contains(capability) {
            Ok(())
        } else {
            Err(EngineError::Forbidden)
        }
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<Capability> for CapabilitySet {
    fn extend<I: IntoIterator<Item = Capability>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_sorted_snake_case_list() {
        let caps = CapabilitySet::from_iter([Capability::Review, Capability::View]);
        assert_eq!(
            serde_json::to_string(&caps).unwrap(),
            r#"["view","review"]"#
        );
    }

    #[test]
    fn all_lists_every_capability_once() {
        let set: CapabilitySet = Capability::ALL.iter().copied().collect();
        assert_eq!(set.iter().count(), Capability::ALL.len());
    }
}
