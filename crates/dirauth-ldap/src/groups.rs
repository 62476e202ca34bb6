//! Group membership resolution.
//!
//! Directories record membership either on the user (`memberOf` back-links) or only on
//! the group (`member` / `uniqueMember`). The back-link is read first; group entries are
//! only searched when it yields no names, so neither schema needs to be configured.

use dirauth_core::{DirectoryConfig, Result};
use tracing::debug;

use crate::dn::DistinguishedName;
use crate::filter::{member_filter, MATCH_ALL};
use crate::repository::{DirectoryRepository, Lookup};
use crate::sanitize::escape_filter_value;
use crate::session::{SearchRequest, SearchScope};

/// Back-link attribute listing the groups a user belongs to.
pub const MEMBER_OF: &str = "memberOf";

const GROUP_NAME_ATTRIBUTE: &str = "cn";
const ORG_UNIT_ATTRIBUTE: &str = "ou";

/// Short names of the groups `user_dn` belongs to, on a service-bound repository.
///
/// # Errors
///
/// Returns [`Error::Search`](dirauth_core::Error::Search) if the group-entry search fails.
/// Back-link failures only trigger that search.
pub async fn resolve_groups(
    repo: &mut DirectoryRepository,
    config: &DirectoryConfig,
    user_dn: &str,
) -> Result<Vec<String>> {
    let back_links = back_link_groups(repo, user_dn).await;
    debug!(dn = %user_dn, outcome = back_links.outcome(), "memberOf lookup");
    match back_links {
        Lookup::Found(names) => {
            debug!(dn = %user_dn, count = names.len(), "groups resolved from memberOf");
            return Ok(names);
        }
        Lookup::NotFound => {}
        Lookup::Failed(err) => debug!(dn = %user_dn, "memberOf lookup failed: {err}"),
    }

    debug!(dn = %user_dn, "searching group entries");
    forward_link_groups(repo, config, user_dn).await
}

async fn back_link_groups(repo: &mut DirectoryRepository, user_dn: &str) -> Lookup<Vec<String>> {
    let request = SearchRequest::new(user_dn, SearchScope::Base, MATCH_ALL)
        .with_attributes(["*", MEMBER_OF]);

    let entries = match repo.lookup(&request).await {
        Lookup::Found(entries) => entries,
        Lookup::NotFound => return Lookup::NotFound,
        Lookup::Failed(err) => return Lookup::Failed(err),
    };

    let names: Vec<String> = entries
        .first()
        .and_then(|entry| entry.values(MEMBER_OF))
        .unwrap_or_default()
        .iter()
        .map(String::as_str)
        .filter_map(group_name)
        .collect();

    if names.is_empty() {
        Lookup::NotFound
    } else {
        Lookup::Found(names)
    }
}

async fn forward_link_groups(
    repo: &mut DirectoryRepository,
    config: &DirectoryConfig,
    user_dn: &str,
) -> Result<Vec<String>> {
    let escaped = escape_filter_value(user_dn);
    let filter = member_filter(&escaped, config.user_filter());
    let request = SearchRequest::new(config.group_base_dn(), SearchScope::Subtree, filter)
        .with_attributes([GROUP_NAME_ATTRIBUTE]);

    let entries = repo.search(&request).await?;
    let names: Vec<String> = entries
        .iter()
        .filter_map(|entry| entry.first(GROUP_NAME_ATTRIBUTE))
        .map(str::to_string)
        .collect();

    debug!(dn = %user_dn, count = names.len(), "groups resolved from group entries");
    Ok(names)
}

/// Short name for a group DN: a leading `cn`, else a later `cn`, else a leading `ou`.
fn group_name(group_dn: &str) -> Option<String> {
    let dn = match DistinguishedName::parse(group_dn) {
        Ok(dn) => dn,
        Err(err) => {
            debug!("skipping unparseable group DN `{group_dn}`: {err}");
            return None;
        }
    };

    let first = dn.first()?;
    if first.is(GROUP_NAME_ATTRIBUTE) {
        return Some(first.value().to_string());
    }
    if let Some(cn) = dn.rdns().iter().skip(1).find(|rdn| rdn.is(GROUP_NAME_ATTRIBUTE)) {
        return Some(cn.value().to_string());
    }
    first
        .is(ORG_UNIT_ATTRIBUTE)
        .then(|| first.value().to_string())
}
