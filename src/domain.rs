/// Domain extraction and the domain fallback grouper
use std::collections::HashMap;
use url::Url;

use crate::color::GroupColor;
use crate::tab_data::{CandidateGroup, Tab};

/// Domain groups need at least this many tabs to be worth creating
pub const MIN_DOMAIN_GROUP_SIZE: usize = 2;

/// Extract the lowercased hostname from a URL string
///
/// Returns `None` for strings that do not parse as absolute URLs and for URLs
/// without a host (`about:blank`, `data:` URLs).
pub fn extract_hostname(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.to_lowercase();

    if host.is_empty() { None } else { Some(host) }
}

/// Reduce a hostname to its registrable domain
///
/// This is the last two dot-separated labels, not a public-suffix lookup:
/// - mail.example.com → example.com
/// - news.bbc.co.uk → co.uk
/// - localhost → localhost
///
/// IP literals are kept whole so every address gets its own bucket.
pub fn registrable_domain(hostname: &str) -> String {
    if is_ip_address(hostname) {
        return hostname.to_string();
    }

    let parts: Vec<&str> = hostname.split('.').collect();
    if parts.len() < 2 {
        return hostname.to_string();
    }

    parts[parts.len() - 2..].join(".")
}

/// Check if a string looks like an IP address
fn is_ip_address(s: &str) -> bool {
    if s.starts_with('[') {
        return true;
    }
    s.chars().next().is_some_and(|c| c.is_ascii_digit())
        && s.chars().all(|c| c.is_ascii_digit() || c == '.')
}

/// Bucket tabs by registrable domain and emit one group per bucket of two or
/// more tabs, in the order each domain was first seen.
///
/// Tabs without a parseable URL are dropped.
pub fn group_by_domain(tabs: &[Tab]) -> Vec<CandidateGroup> {
    let mut order: Vec<String> = Vec::new();
    let mut buckets: HashMap<String, Vec<Tab>> = HashMap::new();

    for tab in tabs {
        let Some(hostname) = tab.hostname() else {
            log::debug!("Skipping tab {} without a parseable URL", tab.id);
            continue;
        };
        let domain = registrable_domain(&hostname);

        buckets
            .entry(domain.clone())
            .or_insert_with(|| {
                order.push(domain);
                Vec::new()
            })
            .push(tab.clone());
    }

    order
        .into_iter()
        .filter_map(|domain| {
            let tabs = buckets.remove(&domain)?;
            if tabs.len() < MIN_DOMAIN_GROUP_SIZE {
                return None;
            }
            log::info!("Domain group \"{}\" with {} tabs", domain, tabs.len());
            Some(CandidateGroup {
                id: format!("domain-{}", domain),
                name: domain,
                color: GroupColor::default(),
                tabs,
            })
        })
        .collect()
}
