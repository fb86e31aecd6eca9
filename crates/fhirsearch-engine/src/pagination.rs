//! Pagination links.
//!
//! Links reuse every original query parameter and override only the offset and
//! page size parameters.

use crate::config::SearchSettings;
use crate::query_builder::Page;
use crate::request::QueryParams;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLinks {
    pub current: String,
    pub previous: Option<String>,
    pub next: Option<String>,
}

/// Computes the self/previous/next links for a page.
///
/// `previous` is present iff `offset > 0`; its offset is clamped at 0 when the
/// current offset is smaller than the page size. `next` is present iff
/// `offset + size < total`.
pub fn build_page_links(
    settings: &SearchSettings,
    base_url: &str,
    resource_type: &str,
    params: &QueryParams,
    page: Page,
    total: u64,
) -> PageLinks {
    let url_for = |offset: usize| page_url(settings, base_url, resource_type, params, offset, page.size);

    let previous = (page.offset > 0).then(|| url_for(page.offset.saturating_sub(page.size)));

    let next_offset = page.offset.saturating_add(page.size);
    let next = ((next_offset as u64) < total).then(|| url_for(next_offset));

    PageLinks {
        current: url_for(page.offset),
        previous,
        next,
    }
}

/// URL of the page starting at `offset`.
pub fn page_url(
    settings: &SearchSettings,
    base_url: &str,
    resource_type: &str,
    params: &QueryParams,
    offset: usize,
    size: usize,
) -> String {
    let mut params = params.clone();
    params.insert(settings.offset_param.as_str(), offset.to_string());
    params.insert(settings.count_param.as_str(), size.to_string());
    format!(
        "{}/{}?{}",
        base_url.trim_end_matches('/'),
        resource_type,
        params.to_query_string()
    )
}
