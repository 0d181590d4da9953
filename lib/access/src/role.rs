//! Role derivation from identity-provider group membership.
//!
//! Roles are application-level labels. A role is granted when the user is a
//! member of any group configured for it, and granting a role also grants
//! every role it implies through the inheritance configuration.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use rootcause::prelude::Report;
use tracing::{debug, warn};

use crate::error::ConfigurationError;

/// Maximum number of group ids the provider accepts in one membership lookup.
pub const MAX_GROUP_LOOKUP_BATCH: usize = 20;

fn normalize(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Mapping from role name to the group ids that grant it.
///
/// Role names and group ids are stored trimmed and lowercased. Blank group
/// ids are dropped, so an unset group never matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleConfig {
    roles: BTreeMap<String, BTreeSet<String>>,
}

impl RoleConfig {
    /// Creates an empty role configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a role with its granting groups.
    #[must_use]
    pub fn with_role<I, S>(mut self, role: &str, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.insert(role, groups);
        self
    }

    /// Adds groups to a role, creating the role if needed.
    ///
    /// A blank role name is ignored.
    pub fn insert<I, S>(&mut self, role: &str, groups: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let Some(role) = normalize(role) else {
            return;
        };
        let entry = self.roles.entry(role).or_default();
        entry.extend(groups.into_iter().filter_map(|g| normalize(g.as_ref())));
    }

    /// Returns the groups configured for a role.
    #[must_use]
    pub fn groups(&self, role: &str) -> Option<&BTreeSet<String>> {
        self.roles.get(&role.to_lowercase())
    }

    /// Iterates over `(role, groups)` pairs in role-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.roles.iter()
    }

    /// Returns the number of configured roles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Returns true if no roles are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Checks that the distinct group ids fit in a single provider lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::TooManyGroups` when more than
    /// [`MAX_GROUP_LOOKUP_BATCH`] distinct ids are configured.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let count = all_configured_group_ids(self).len();
        if count > MAX_GROUP_LOOKUP_BATCH {
            return Err(ConfigurationError::TooManyGroups {
                count,
                limit: MAX_GROUP_LOOKUP_BATCH,
            });
        }
        Ok(())
    }
}

/// Mapping from role name to the role names it implies.
///
/// Cycles are tolerated: resolution never expands a role twice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InheritanceConfig {
    implies: BTreeMap<String, BTreeSet<String>>,
}

impl InheritanceConfig {
    /// Creates an empty inheritance configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares that `role` implies each of `implied`.
    #[must_use]
    pub fn with_implied<I, S>(mut self, role: &str, implied: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.insert(role, implied);
        self
    }

    /// Adds implied roles to a role.
    pub fn insert<I, S>(&mut self, role: &str, implied: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let Some(role) = normalize(role) else {
            return;
        };
        let entry = self.implies.entry(role).or_default();
        entry.extend(implied.into_iter().filter_map(|r| normalize(r.as_ref())));
    }

    /// Iterates over the roles directly implied by `role`.
    pub fn implied(&self, role: &str) -> impl Iterator<Item = &String> {
        self.implies
            .get(role.trim().to_lowercase().as_str())
            .into_iter()
            .flatten()
    }

    /// Returns every group of roles that imply each other.
    ///
    /// Each inner list is sorted; a role that implies itself is reported alone.
    #[must_use]
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for (role, implied) in &self.implies {
            graph.add_node(role.as_str());
            for target in implied {
                graph.add_edge(role.as_str(), target.as_str(), ());
            }
        }

        let mut cycles: Vec<Vec<String>> = tarjan_scc(&graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1 || graph.contains_edge(component[0], component[0])
            })
            .map(|component| {
                let mut roles: Vec<String> = component.into_iter().map(str::to_string).collect();
                roles.sort();
                roles
            })
            .collect();
        cycles.sort();
        cycles
    }
}

/// Returns the union of every group id referenced by `role_groups`.
///
/// This is the set sent to the provider membership lookup.
#[must_use]
pub fn all_configured_group_ids(role_groups: &RoleConfig) -> BTreeSet<String> {
    role_groups
        .iter()
        .flat_map(|(_, groups)| groups.iter().map(|g| g.to_lowercase()))
        .collect()
}

/// Computes the roles granted by the given group memberships.
///
/// Direct roles are those whose configured groups intersect
/// `member_group_ids` (compared lowercased). The result is then closed under
/// `role_inherits` with a worklist; a role already in the result is never
/// expanded again, so cyclic inheritance terminates.
#[must_use]
pub fn compute_roles(
    member_group_ids: &BTreeSet<String>,
    role_groups: &RoleConfig,
    role_inherits: &InheritanceConfig,
) -> BTreeSet<String> {
    let members: BTreeSet<String> = member_group_ids.iter().map(|g| g.to_lowercase()).collect();

    let mut roles: BTreeSet<String> = role_groups
        .iter()
        .filter(|(_, groups)| groups.iter().any(|g| members.contains(&g.to_lowercase())))
        .map(|(role, _)| role.clone())
        .collect();

    let mut pending: Vec<String> = roles.iter().cloned().collect();
    while let Some(role) = pending.pop() {
        for implied in role_inherits.implied(&role) {
            if roles.insert(implied.clone()) {
                pending.push(implied.clone());
            }
        }
    }

    roles
}

/// Validated role configuration used by the callback flow.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    role_groups: RoleConfig,
    role_inherits: InheritanceConfig,
}

impl AccessPolicy {
    /// Builds a policy, failing fast on configuration the provider cannot serve.
    ///
    /// Inheritance cycles are logged but accepted.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::TooManyGroups` when the distinct group ids
    /// exceed the provider batch limit.
    pub fn new(
        role_groups: RoleConfig,
        role_inherits: InheritanceConfig,
    ) -> Result<Self, Report<ConfigurationError>> {
        role_groups.validate()?;

        for (role, groups) in role_groups.iter() {
            if groups.is_empty() {
                warn!(role = %role, "role has no configured groups and can only be inherited");
            }
        }
        for cycle in role_inherits.find_cycles() {
            warn!(roles = ?cycle, "role inheritance cycle");
        }

        Ok(Self {
            role_groups,
            role_inherits,
        })
    }

    /// Returns the role to groups mapping.
    #[must_use]
    pub fn role_groups(&self) -> &RoleConfig {
        &self.role_groups
    }

    /// Returns the inheritance mapping.
    #[must_use]
    pub fn role_inherits(&self) -> &InheritanceConfig {
        &self.role_inherits
    }

    /// Returns the group ids to ask the provider about.
    #[must_use]
    pub fn lookup_group_ids(&self) -> BTreeSet<String> {
        all_configured_group_ids(&self.role_groups)
    }

    /// Resolves member group ids into the final role set.
    #[must_use]
    pub fn resolve(&self, member_group_ids: &BTreeSet<String>) -> BTreeSet<String> {
        let roles = compute_roles(member_group_ids, &self.role_groups, &self.role_inherits);
        debug!(
            member_groups = member_group_ids.len(),
            roles = ?roles,
            "resolved roles from group membership"
        );
        roles
    }
}
