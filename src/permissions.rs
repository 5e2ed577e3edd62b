//! Coarse permission checks applied before a statement is optimized.
//!
//! A session carries a set of [`Permission`]s. The top-level statement kind
//! determines which permission is required; a missing permission fails the
//! query before any planning work is done.

use std::collections::HashSet;
use std::str::FromStr;

use crate::errors::{Error, Result};

/// Permissions a session may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Run EXPLAIN ANALYZE
    Analyze,
    /// Run SET and other session-mutating statements
    Execute,
    /// Run read queries (SELECT, SHOW, EXPLAIN)
    Query,
}

impl Permission {
    /// The full permission set granted to a default session
    pub fn all() -> HashSet<Permission> {
        [Permission::Analyze, Permission::Execute, Permission::Query]
            .into_iter()
            .collect()
    }
}

impl FromStr for Permission {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "analyze" => Ok(Permission::Analyze),
            "execute" => Ok(Permission::Execute),
            "query" => Ok(Permission::Query),
            other => Err(Error::Programming(format!(
                "invalid permission '{other}', expected one of analyze, execute, query"
            ))),
        }
    }
}

/// Parse a list of permission literals into a set.
///
/// An empty input is a programming error: a session with no permissions
/// cannot run anything, which is never what the caller intended.
pub fn parse_permissions<I, S>(values: I) -> Result<HashSet<Permission>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut permissions = HashSet::new();
    for value in values {
        permissions.insert(value.as_ref().parse::<Permission>()?);
    }
    if permissions.is_empty() {
        return Err(Error::Programming(
            "permissions set cannot be empty".to_string(),
        ));
    }
    Ok(permissions)
}

/// Check that the session holds the permission a statement kind requires.
pub fn check_permission(required: Permission, held: &HashSet<Permission>) -> Result<()> {
    if held.contains(&required) {
        Ok(())
    } else {
        Err(Error::Permissions(format!("{required:?} permission required")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_permissions() {
        let permissions =
            parse_permissions(["query", "analyze"]).expect("permissions should parse");
        assert!(permissions.contains(&Permission::Query));
        assert!(permissions.contains(&Permission::Analyze));
        assert!(!permissions.contains(&Permission::Execute));
    }

    #[test]
    fn invalid_literal_is_programming_error() {
        let result = parse_permissions(["query", "fly"]);
        assert!(matches!(result, Err(Error::Programming(_))));
    }

    #[test]
    fn empty_set_is_programming_error() {
        let result = parse_permissions(Vec::<&str>::new());
        assert!(matches!(result, Err(Error::Programming(_))));
    }

    #[test]
    fn check_missing_permission_fails() {
        let held = parse_permissions(["query"]).expect("permissions should parse");
        assert!(check_permission(Permission::Query, &held).is_ok());
        assert!(matches!(
            check_permission(Permission::Execute, &held),
            Err(Error::Permissions(_))
        ));
    }
}
