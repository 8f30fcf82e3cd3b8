//! Node preference selection

use topos_core::{ClusterMember, NodePreference, NodeRole};

/// Rank of a role under a preference; lower is better
fn rank(role: NodeRole, preference: NodePreference) -> u8 {
    let read_only = matches!(
        role,
        NodeRole::ReadOnlyReplica | NodeRole::PreReadOnlyReplica | NodeRole::ReadOnlyLeaderless
    );

    match preference {
        NodePreference::Leader => match role {
            NodeRole::Leader => 0,
            NodeRole::Follower => 1,
            _ if read_only => 2,
            _ => 3,
        },
        NodePreference::Follower => match role {
            NodeRole::Follower => 0,
            NodeRole::Leader => 1,
            _ if read_only => 2,
            _ => 3,
        },
        NodePreference::ReadOnlyReplica => match role {
            _ if read_only => 0,
            NodeRole::Follower => 1,
            NodeRole::Leader => 2,
            _ => 3,
        },
        NodePreference::Any => 0,
    }
}

/// Alive, servable members ordered by how well they match `preference`.
///
/// Members outside the preferred role follow in fallback order, so the first
/// entry is always the best available node. Ties keep their input order.
pub fn select_members(
    members: &[ClusterMember],
    preference: NodePreference,
) -> Vec<ClusterMember> {
    let mut candidates: Vec<ClusterMember> = members
        .iter()
        .filter(|m| m.is_alive && !m.role.is_unservable())
        .cloned()
        .collect();
    candidates.sort_by_key(|m| rank(m.role, preference));
    candidates
}

/// Best available member for `preference`
pub fn select_member(
    members: &[ClusterMember],
    preference: NodePreference,
) -> Option<ClusterMember> {
    members
        .iter()
        .filter(|m| m.is_alive && !m.role.is_unservable())
        .min_by_key(|m| rank(m.role, preference))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{dead_member, member};

    fn hosts(members: &[ClusterMember]) -> Vec<&str> {
        members.iter().map(|m| m.endpoint.host()).collect()
    }

    fn cluster() -> Vec<ClusterMember> {
        vec![
            member("f1", NodeRole::Follower),
            member("ro1", NodeRole::ReadOnlyReplica),
            member("l1", NodeRole::Leader),
            member("f2", NodeRole::Follower),
        ]
    }

    #[test]
    fn test_leader_preference() {
        let ordered = select_members(&cluster(), NodePreference::Leader);
        assert_eq!(hosts(&ordered), vec!["l1", "f1", "f2", "ro1"]);
    }

    #[test]
    fn test_follower_preference() {
        let ordered = select_members(&cluster(), NodePreference::Follower);
        assert_eq!(hosts(&ordered), vec!["f1", "f2", "l1", "ro1"]);
    }

    #[test]
    fn test_read_only_preference_falls_back() {
        let ordered = select_members(&cluster(), NodePreference::ReadOnlyReplica);
        assert_eq!(hosts(&ordered), vec!["ro1", "f1", "f2", "l1"]);

        let without_replicas: Vec<ClusterMember> = cluster()
            .into_iter()
            .filter(|m| m.role != NodeRole::ReadOnlyReplica)
            .collect();
        let best = select_member(&without_replicas, NodePreference::ReadOnlyReplica).unwrap();
        assert_eq!(best.endpoint.host(), "f1");
    }

    #[test]
    fn test_any_keeps_input_order() {
        let ordered = select_members(&cluster(), NodePreference::Any);
        assert_eq!(hosts(&ordered), vec!["f1", "ro1", "l1", "f2"]);
    }

    #[test]
    fn test_dead_and_unservable_nodes_excluded() {
        let members = vec![
            dead_member("l1", NodeRole::Leader),
            member("m1", NodeRole::Manager),
            member("s1", NodeRole::ShuttingDown),
            member("c1", NodeRole::CatchingUp),
        ];
        let ordered = select_members(&members, NodePreference::Leader);
        assert_eq!(hosts(&ordered), vec!["c1"]);
        assert!(select_member(&members[..3], NodePreference::Leader).is_none());
    }
}
