//! Namespace permissions derived from directory groups.
//!
//! The group-permission table maps a directory group name to the namespaces its members
//! may see or change. [`compute_permissions`] folds a user's resolved groups through that
//! table into a [`PermissionResult`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Access level on a namespace. Ordered: `View < Edit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    /// Read-only access
    View,
    /// Read and write access
    Edit,
}

impl PermissionLevel {
    /// Lowercase wire name of the level.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Edit => "edit",
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "view" => Ok(Self::View),
            "edit" => Ok(Self::Edit),
            other => Err(Error::InvalidInput(format!(
                "unknown permission level `{other}`"
            ))),
        }
    }
}

/// One namespace grant inside a [`GroupPermission`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespacePermission {
    /// Namespace name
    pub namespace: String,
    /// Granted level
    pub permission: PermissionLevel,
}

impl NamespacePermission {
    /// Create a namespace grant.
    #[must_use]
    pub fn new(namespace: impl Into<String>, permission: PermissionLevel) -> Self {
        Self {
            namespace: namespace.into(),
            permission,
        }
    }
}

/// Row of the group-permission table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPermission {
    /// Directory group short name
    pub group_name: String,
    /// Namespaces granted to the group's members
    #[serde(default)]
    pub namespaces: Vec<NamespacePermission>,
}

impl GroupPermission {
    /// Create an empty row for a group.
    #[must_use]
    pub fn new(group_name: impl Into<String>) -> Self {
        Self {
            group_name: group_name.into(),
            namespaces: Vec::new(),
        }
    }

    /// Append a namespace grant.
    #[must_use]
    pub fn grant(mut self, namespace: impl Into<String>, permission: PermissionLevel) -> Self {
        self.namespaces
            .push(NamespacePermission::new(namespace, permission));
        self
    }
}

/// Outcome of permission computation.
///
/// `Unrestricted` and `Namespaces` never coexist: an admin gets no namespace map, and an
/// empty map means no access at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionResult {
    /// Member of an admin group, every namespace is accessible
    Unrestricted,
    /// Per-namespace access; missing keys mean no access
    Namespaces(BTreeMap<String, PermissionLevel>),
}

impl PermissionResult {
    /// Returns true for the unrestricted sentinel.
    #[must_use]
    pub const fn is_unrestricted(&self) -> bool {
        matches!(self, Self::Unrestricted)
    }

    /// Access level on `namespace`, if any.
    #[must_use]
    pub fn level(&self, namespace: &str) -> Option<PermissionLevel> {
        match self {
            Self::Unrestricted => Some(PermissionLevel::Edit),
            Self::Namespaces(map) => map.get(namespace).copied(),
        }
    }

    /// Returns true if `namespace` may be accessed with at least `required`.
    #[must_use]
    pub fn allows(&self, namespace: &str, required: PermissionLevel) -> bool {
        self.level(namespace).is_some_and(|level| level >= required)
    }
}

/// Compute a user's permissions from the groups resolved for them.
///
/// Admin groups are matched exactly and short-circuit to [`PermissionResult::Unrestricted`].
/// Table rows are matched case-insensitively, and when several matching rows name the same
/// namespace the highest level wins.
#[must_use]
pub fn compute_permissions(
    groups: &[String],
    admin_groups: &[String],
    table: &[GroupPermission],
) -> PermissionResult {
    if !admin_groups.is_empty()
        && groups
            .iter()
            .any(|group| admin_groups.iter().any(|admin| admin == group))
    {
        return PermissionResult::Unrestricted;
    }

    let mut member_of: HashSet<String> = HashSet::with_capacity(groups.len() * 2);
    for group in groups {
        member_of.insert(group.clone());
        member_of.insert(group.to_lowercase());
    }

    let mut namespaces: BTreeMap<String, PermissionLevel> = BTreeMap::new();
    for row in table {
        if !member_of.contains(&row.group_name.to_lowercase()) {
            continue;
        }
        for grant in &row.namespaces {
            namespaces
                .entry(grant.namespace.clone())
                .and_modify(|level| *level = (*level).max(grant.permission))
                .or_insert(grant.permission);
        }
    }

    PermissionResult::Namespaces(namespaces)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(groups: &[&str]) -> Vec<String> {
        groups.iter().map(|g| (*g).to_string()).collect()
    }

    fn sample_table() -> Vec<GroupPermission> {
        vec![
            GroupPermission::new("A").grant("namespace1", PermissionLevel::View),
            GroupPermission::new("B")
                .grant("namespace1", PermissionLevel::Edit)
                .grant("namespace2", PermissionLevel::View),
        ]
    }

    #[test]
    fn test_level_ordering() {
        assert!(PermissionLevel::View < PermissionLevel::Edit);
        assert_eq!(
            PermissionLevel::View.max(PermissionLevel::Edit),
            PermissionLevel::Edit
        );
    }

    #[test]
    fn test_highest_level_wins_regardless_of_order() {
        let table = sample_table();
        for groups in [names(&["A", "B"]), names(&["B", "A"])] {
            let result = compute_permissions(&groups, &[], &table);
            assert_eq!(result.level("namespace1"), Some(PermissionLevel::Edit));
            assert_eq!(result.level("namespace2"), Some(PermissionLevel::View));
        }

        let mut reversed = sample_table();
        reversed.reverse();
        let result = compute_permissions(&names(&["A", "B"]), &[], &reversed);
        assert_eq!(result.level("namespace1"), Some(PermissionLevel::Edit));
    }

    #[test]
    fn test_admin_short_circuits_explicit_entries() {
        let table = vec![GroupPermission::new("ops").grant("default", PermissionLevel::View)];
        let result = compute_permissions(&names(&["ops"]), &names(&["ops"]), &table);
        assert_eq!(result, PermissionResult::Unrestricted);
        assert!(result.allows("anything", PermissionLevel::Edit));
    }

    #[test]
    fn test_admin_match_is_exact() {
        let result = compute_permissions(&names(&["Ops"]), &names(&["ops"]), &[]);
        assert_eq!(result, PermissionResult::Namespaces(BTreeMap::new()));
    }

    #[test]
    fn test_table_match_is_case_insensitive() {
        let table = vec![GroupPermission::new("Developers").grant("dev", PermissionLevel::Edit)];
        let result = compute_permissions(&names(&["developers"]), &[], &table);
        assert_eq!(result.level("dev"), Some(PermissionLevel::Edit));

        let table = vec![GroupPermission::new("qa").grant("staging", PermissionLevel::View)];
        let result = compute_permissions(&names(&["QA"]), &[], &table);
        assert!(result.allows("staging", PermissionLevel::View));
        assert!(!result.allows("staging", PermissionLevel::Edit));
    }

    #[test]
    fn test_no_match_is_empty_not_unrestricted() {
        let result = compute_permissions(&names(&["nobody"]), &names(&["admins"]), &sample_table());
        assert!(!result.is_unrestricted());
        assert_eq!(result, PermissionResult::Namespaces(BTreeMap::new()));
        assert_eq!(result.level("namespace1"), None);
    }

    #[test]
    fn test_level_parse_and_serde() {
        assert_eq!("EDIT".parse::<PermissionLevel>().unwrap(), PermissionLevel::Edit);
        assert!("admin".parse::<PermissionLevel>().is_err());

        let row: GroupPermission = serde_json::from_str(
            r#"{"group_name":"dev","namespaces":[{"namespace":"apps","permission":"view"}]}"#,
        )
        .unwrap();
        assert_eq!(row.namespaces[0].permission, PermissionLevel::View);
    }
}
