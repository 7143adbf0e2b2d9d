use std::collections::HashSet;

use tracing::{debug, info};

use super::types::CategoryMember;
use super::WikiApi;
use crate::error::ApiError;

/// Service ceiling for one listing request.
pub const MAX_PAGE_SIZE: usize = 500;
const TEMPLATE_PREFIX: &str = "Template:";

/// Walk the pages embedding `set_name` until `target_count` members are
/// collected or the continuation token runs out.
pub async fn enumerate(
    api: &dyn WikiApi,
    set_name: &str,
    target_count: usize,
) -> Result<Vec<CategoryMember>, ApiError> {
    let title = if set_name.starts_with(TEMPLATE_PREFIX) {
        set_name.to_string()
    } else {
        format!("{}{}", TEMPLATE_PREFIX, set_name)
    };

    let mut members: Vec<CategoryMember> = Vec::new();
    let mut seen: HashSet<u64> = HashSet::new();
    let mut token: Option<String> = None;
    let mut pages = 0usize;

    while members.len() < target_count {
        let request = (target_count - members.len()).min(MAX_PAGE_SIZE);
        let page = api.embedded_in(&title, request, token.as_deref()).await?;
        pages += 1;

        let before = members.len();
        members.extend(page.members.into_iter().filter(|m| seen.insert(m.id)));
        debug!(
            page = pages,
            requested = request,
            received = members.len() - before,
            "embeddedin page"
        );

        match page.continuation {
            Some(next) if token.as_deref() == Some(next.as_str()) => {
                return Err(ApiError::decode("embeddedin", "continuation token did not advance"));
            }
            Some(next) => token = Some(next),
            None => break,
        }
    }

    members.truncate(target_count);
    info!(template = %title, members = members.len(), pages, "enumeration complete");
    Ok(members)
}
