/// User grouping rules and the rule matcher
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::color::GroupColor;
use crate::error::RuleError;
use crate::tab_data::{CandidateGroup, Tab};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// Comma-separated substrings matched against the hostname
    Domain,
    /// Regular expression tested against the hostname
    Custom,
    /// Kinds this version does not understand; they match nothing
    #[serde(other)]
    Other,
}

/// A user-authored grouping rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: RuleKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Rule {
    pub fn domain(id: &str, name: &str, pattern: &str, color: &str) -> Rule {
        Rule {
            id: id.to_string(),
            name: name.to_string(),
            kind: RuleKind::Domain,
            pattern: Some(pattern.to_string()),
            enabled: true,
            color: Some(color.to_string()),
        }
    }

    pub fn custom(id: &str, name: &str, pattern: &str, color: &str) -> Rule {
        Rule {
            kind: RuleKind::Custom,
            ..Rule::domain(id, name, pattern, color)
        }
    }

    fn pattern(&self) -> Option<&str> {
        self.pattern.as_deref().filter(|p| !p.trim().is_empty())
    }

    pub fn group_color(&self) -> GroupColor {
        GroupColor::resolve_or_default(self.color.as_deref())
    }

    /// Compile this rule into a hostname predicate. `Ok(None)` means the rule
    /// can never match (empty pattern or unknown kind).
    pub fn compile(&self) -> Result<Option<HostMatcher>, RuleError> {
        let Some(pattern) = self.pattern() else {
            return Ok(None);
        };

        match self.kind {
            RuleKind::Domain => {
                let domains: Vec<String> = pattern
                    .split(',')
                    .map(|d| d.trim().to_lowercase())
                    .filter(|d| !d.is_empty())
                    .collect();
                if domains.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(HostMatcher::Domains(domains)))
                }
            }
            RuleKind::Custom => Regex::new(pattern)
                .map(|regex| Some(HostMatcher::Regex(regex)))
                .map_err(|source| RuleError::InvalidPattern {
                    rule: self.name.clone(),
                    source,
                }),
            RuleKind::Other => Ok(None),
        }
    }
}

/// A compiled rule pattern
#[derive(Debug, Clone)]
pub enum HostMatcher {
    Domains(Vec<String>),
    Regex(Regex),
}

impl HostMatcher {
    pub fn is_match(&self, hostname: &str) -> bool {
        match self {
            HostMatcher::Domains(domains) => domains.iter().any(|d| hostname.contains(d.as_str())),
            HostMatcher::Regex(regex) => regex.is_match(hostname),
        }
    }
}

/// Rules seeded on first install
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule::domain(
            "default-social",
            "Social Media",
            "facebook.com,twitter.com,instagram.com,weibo.com",
            "blue",
        ),
        Rule::domain("default-search", "Search Engines", "google.com,bing.com,baidu.com", "green"),
        Rule::domain("default-localhost", "Development", "localhost,127.0.0.1", "purple"),
    ]
}

/// Result of running the rule matcher over a tab set
#[derive(Debug, Default)]
pub struct RuleMatch {
    pub groups: Vec<CandidateGroup>,
    pub remainder: Vec<Tab>,
}

/// Partition `tabs` by the enabled rules, in rule order
///
/// Earlier rules claim tabs first. A rule matching a single tab still forms a
/// group. Tabs without a parseable URL always stay in the remainder. A rule
/// whose regex does not compile is logged and skipped.
pub fn match_rules(tabs: &[Tab], rules: &[Rule]) -> RuleMatch {
    let mut remainder: Vec<Tab> = tabs.to_vec();
    let mut groups = Vec::new();

    for rule in rules.iter().filter(|rule| rule.enabled) {
        let matcher = match rule.compile() {
            Ok(Some(matcher)) => matcher,
            Ok(None) => continue,
            Err(e) => {
                log::warn!("{}", e);
                continue;
            }
        };

        let (matched, rest): (Vec<Tab>, Vec<Tab>) = remainder.into_iter().partition(|tab| {
            tab.hostname()
                .is_some_and(|hostname| matcher.is_match(&hostname))
        });
        remainder = rest;

        if !matched.is_empty() {
            log::info!("Rule \"{}\" matched {} tabs", rule.name, matched.len());
            groups.push(CandidateGroup {
                id: format!("rule-{}", rule.id),
                name: rule.name.clone(),
                color: rule.group_color(),
                tabs: matched,
            });
        }
    }

    log::debug!("{} tabs left after rule matching", remainder.len());
    RuleMatch { groups, remainder }
}
