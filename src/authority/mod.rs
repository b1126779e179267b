// Role authority - pure capability resolution, no I/O
mod capabilities;

pub use capabilities::{Capability, CapabilitySet};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::engine::{EngineError, EngineResult};
use crate::ids::UserId;

/// Privilege order for moderation purposes: User < Moderator < Admin
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Moderator,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Moderator => "moderator",
            Self::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "moderator" => Some(Self::Moderator),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn is_staff(&self) -> bool {
        *self >= Self::Moderator
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| EngineError::validation(format!("Unknown role: {}", s)))
    }
}

/// The authenticated identity performing an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
    pub is_blocked: bool,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: UserId::new(id),
            role,
            is_blocked: false,
        }
    }

    pub fn blocked(mut self) -> Self {
        self.is_blocked = true;
        self
    }

    /// The actor's own account as a capability target
    pub fn own_account(&self) -> Target<'_> {
        Target::Account {
            id: &self.id,
            role: self.role,
        }
    }
}

/// Ownership facts about the entity an action is aimed at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'a> {
    Post { owner: &'a UserId },
    Comment { owner: &'a UserId },
    Account { id: &'a UserId, role: Role },
    Event { owner: &'a UserId },
    JobListing { owner: &'a UserId },
}

impl<'a> Target<'a> {
    pub fn owner(&self) -> &'a UserId {
        match *self {
            Self::Post { owner }
            | Self::Comment { owner }
            | Self::Event { owner }
            | Self::JobListing { owner } => owner,
            Self::Account { id, .. } => id,
        }
    }
}

/// Single source of truth for "may this actor do X to this entity"
pub struct RoleAuthority;

impl RoleAuthority {
    /// Total: every (actor, target) pair yields a set, possibly empty.
    pub fn capabilities_for(actor: &Actor, target: &Target<'_>) -> CapabilitySet {
        use Capability::*;

        let is_owner = actor.id == *target.owner();
        let is_own_account = is_owner && matches!(target, Target::Account { .. });

        // 1. Blocked actors keep only their own profile and the unblock request
        if actor.is_blocked {
            return if is_own_account {
                CapabilitySet::from_iter([ViewOwnProfile, RequestUnblock])
            } else {
                CapabilitySet::empty()
            };
        }

        // 5. Baseline for every active actor
        let mut caps = CapabilitySet::from_iter([View, Participate]);

        // 4. Ownership is additive with role
        if is_owner {
            caps.extend(owner_capabilities(target));
        }

        // 2./3. Role capabilities
        match actor.role {
            Role::Admin => caps.extend(admin_capabilities(target, is_owner)),
            Role::Moderator => caps.extend(moderator_capabilities(target, is_owner)),
            Role::User => {}
        }

        // Ownership never grants approval, whatever the role
        if is_owner {
            caps.remove(ApproveContent);
        }

        // No one moderates their own account
        if is_own_account {
            caps.remove(Block);
            caps.remove(Unblock);
            caps.remove(ChangeRole);
        }

        caps
    }

    /// Moderation consoles: an active moderator or admin, no particular target
    pub fn require_staff(actor: &Actor) -> EngineResult<()> {
        if actor.is_blocked || !actor.role.is_staff() {
            return Err(EngineError::Forbidden);
        }
        Ok(())
    }

    /// Convenience: resolve and require in one step
    pub fn require(actor: &Actor, target: &Target<'_>, capability: Capability) -> EngineResult<()> {
        Self::capabilities_for(actor, target).require(capability)
    }
}

fn owner_capabilities(target: &Target<'_>) -> Vec<Capability> {
    use Capability::*;
    match target {
        Target::Post { .. } | Target::Comment { .. } => vec![Edit, Delete],
        Target::Event { .. } | Target::JobListing { .. } => vec![Edit, Delete, Review],
        Target::Account { .. } => vec![ViewOwnProfile, Edit, Delete],
    }
}

fn moderator_capabilities(target: &Target<'_>, is_owner: bool) -> Vec<Capability> {
    use Capability::*;
    match target {
        Target::Post { .. } => vec![Delete, ApproveContent],
        Target::Comment { .. } => vec![Delete],
        Target::Event { .. } | Target::JobListing { .. } => vec![Delete, Review, ApproveContent],
        Target::Account { role, .. } if *role != Role::Admin && !is_owner => {
            vec![Block, Unblock, Delete]
        }
        Target::Account { .. } => vec![],
    }
}

fn admin_capabilities(target: &Target<'_>, is_owner: bool) -> Vec<Capability> {
    use Capability::*;
    match target {
        // Admins are mutually immune
        Target::Account {
            role: Role::Admin, ..
        } if !is_owner => vec![Restore],
        // Soft-deleted comments are permanent
        Target::Comment { .. } => Capability::ALL
            .iter()
            .copied()
            .filter(|c| *c != Restore)
            .collect(),
        _ => Capability::ALL.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Capability::*;

    fn user(id: &str) -> Actor {
        Actor::new(id, Role::User)
    }

    fn moderator(id: &str) -> Actor {
        Actor::new(id, Role::Moderator)
    }

    fn admin(id: &str) -> Actor {
        Actor::new(id, Role::Admin)
    }

    #[test]
    fn role_order_and_parsing() {
        assert!(Role::Admin > Role::Moderator && Role::Moderator > Role::User);
        assert!(Role::Moderator.is_staff());
        assert!(!Role::User.is_staff());
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert!(matches!("root".parse::<Role>(), Err(EngineError::Validation(_))));
    }

    #[test]
    fn blocked_actor_keeps_only_own_profile_and_unblock_request() {
        let alice = admin("alice").blocked();
        let own = RoleAuthority::capabilities_for(&alice, &alice.own_account());
        assert_eq!(
            own.iter().collect::<Vec<_>>(),
            vec![ViewOwnProfile, RequestUnblock]
        );

        let bob = UserId::new("bob");
        let post = RoleAuthority::capabilities_for(&alice, &Target::Post { owner: &bob });
        assert!(post.is_empty());

        // Even their own post is out of reach
        let own_post = RoleAuthority::capabilities_for(&alice, &Target::Post { owner: &alice.id });
        assert!(own_post.is_empty());
    }

    #[test]
    fn plain_user_can_only_view_and_participate_on_others() {
        let alice = user("alice");
        let bob = UserId::new("bob");
        for target in [
            Target::Post { owner: &bob },
            Target::Comment { owner: &bob },
            Target::Event { owner: &bob },
            Target::JobListing { owner: &bob },
        ] {
            let caps = RoleAuthority::capabilities_for(&alice, &target);
            assert_eq!(caps.iter().collect::<Vec<_>>(), vec![View, Participate]);
        }
    }

    #[test]
    fn owner_may_edit_delete_and_review_own_content() {
        let alice = user("alice");
        let post = RoleAuthority::capabilities_for(&alice, &Target::Post { owner: &alice.id });
        assert!(post.contains(Edit) && post.contains(Delete));
        assert!(!post.contains(ApproveContent));

        let event = RoleAuthority::capabilities_for(&alice, &Target::Event { owner: &alice.id });
        assert!(event.contains(Review));
        assert!(!event.contains(ApproveContent), "owners cannot self-approve");
    }

    #[test]
    fn moderator_moderates_but_cannot_restore_or_promote() {
        let mo = moderator("mo");
        let bob = UserId::new("bob");

        let post = RoleAuthority::capabilities_for(&mo, &Target::Post { owner: &bob });
        assert!(post.contains(Delete) && post.contains(ApproveContent));
        assert!(!post.contains(Edit));
        assert!(!post.contains(Restore) && !post.contains(HardDelete));

        let account = RoleAuthority::capabilities_for(
            &mo,
            &Target::Account {
                id: &bob,
                role: Role::User,
            },
        );
        assert!(account.contains(Block) && account.contains(Unblock));
        assert!(!account.contains(ChangeRole));
        assert!(!account.contains(Restore));

        let event = RoleAuthority::capabilities_for(&mo, &Target::Event { owner: &bob });
        assert!(event.contains(Review));
    }

    #[test]
    fn moderator_cannot_touch_admin_accounts() {
        let mo = moderator("mo");
        let root = UserId::new("root");
        let caps = RoleAuthority::capabilities_for(
            &mo,
            &Target::Account {
                id: &root,
                role: Role::Admin,
            },
        );
        assert!(!caps.contains(Block));
        assert!(!caps.contains(Delete));
    }

    #[test]
    fn owner_capabilities_add_to_moderator_role() {
        let mo = moderator("mo");
        let caps = RoleAuthority::capabilities_for(&mo, &Target::Post { owner: &mo.id });
        assert!(caps.contains(Edit), "ownership adds edit");
        assert!(caps.contains(Delete));
        assert!(!caps.contains(ApproveContent), "no approving own post");
    }

    #[test]
    fn staff_consoles_need_an_active_staff_role() {
        assert!(RoleAuthority::require_staff(&moderator("mo")).is_ok());
        assert!(RoleAuthority::require_staff(&admin("root")).is_ok());
        assert_eq!(
            RoleAuthority::require_staff(&user("alice")),
            Err(EngineError::Forbidden)
        );
        assert_eq!(
            RoleAuthority::require_staff(&admin("root").blocked()),
            Err(EngineError::Forbidden)
        );
    }

    #[test]
    fn staff_cannot_approve_their_own_gated_content() {
        for actor in [moderator("mo"), admin("root")] {
            for target in [
                Target::Event { owner: &actor.id },
                Target::JobListing { owner: &actor.id },
            ] {
                let caps = RoleAuthority::capabilities_for(&actor, &target);
                assert!(caps.contains(Review));
                assert!(!caps.contains(ApproveContent));
            }
        }

        let root = admin("root");
        let bob = UserId::new("bob");
        let event = RoleAuthority::capabilities_for(&root, &Target::Event { owner: &bob });
        assert!(event.contains(ApproveContent));
    }

    #[test]
    fn admins_are_mutually_immune() {
        let root = admin("root");
        let other = UserId::new("other-admin");
        let caps = RoleAuthority::capabilities_for(
            &root,
            &Target::Account {
                id: &other,
                role: Role::Admin,
            },
        );
        for cap in [Block, Unblock, ChangeRole, Delete, HardDelete] {
            assert!(!caps.contains(cap), "{:?} must be denied", cap);
        }
        assert!(caps.contains(View));
    }

    #[test]
    fn admin_has_everything_on_regular_accounts() {
        let root = admin("root");
        let bob = UserId::new("bob");
        let caps = RoleAuthority::capabilities_for(
            &root,
            &Target::Account {
                id: &bob,
                role: Role::Moderator,
            },
        );
        for cap in Capability::ALL {
            assert!(caps.contains(*cap), "{:?} missing", cap);
        }
    }

    #[test]
    fn comments_are_never_restorable() {
        let root = admin("root");
        let bob = UserId::new("bob");
        let caps = RoleAuthority::capabilities_for(&root, &Target::Comment { owner: &bob });
        assert!(caps.contains(Delete));
        assert!(!caps.contains(Restore));
    }

    #[test]
    fn nobody_blocks_or_demotes_themselves() {
        let root = admin("root");
        let caps = RoleAuthority::capabilities_for(&root, &root.own_account());
        assert!(!caps.contains(Block));
        assert!(!caps.contains(ChangeRole));
        assert!(caps.contains(Edit));
    }

    #[test]
    fn require_maps_missing_capability_to_forbidden() {
        let alice = user("alice");
        let bob = UserId::new("bob");
        assert_eq!(
            RoleAuthority::require(&alice, &Target::Post { owner: &bob }, Delete),
            Err(EngineError::Forbidden)
        );
        assert!(RoleAuthority::require(&alice, &Target::Post { owner: &bob }, View).is_ok());
    }
}
