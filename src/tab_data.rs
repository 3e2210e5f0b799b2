/// Data structures shared by every grouping stage
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

use crate::color::GroupColor;

pub type TabId = i32;
pub type GroupId = i32;

/// Chrome reports ungrouped tabs with this group id.
pub const TAB_GROUP_ID_NONE: GroupId = -1;

/// A snapshot of one browser tab
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: TabId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "deserialize_group_id")]
    pub group_id: Option<GroupId>,
}

impl Tab {
    pub fn new(id: TabId, url: &str, title: &str) -> Tab {
        Tab {
            id,
            title: title.to_string(),
            url: Some(url.to_string()),
            group_id: None,
        }
    }

    pub fn is_grouped(&self) -> bool {
        self.group_id.is_some()
    }

    /// Whether the tab has started loading anything. A fresh tab often
    /// reports `url: ""`.
    pub fn has_url(&self) -> bool {
        self.url.as_deref().is_some_and(|url| !url.trim().is_empty())
    }

    /// Hostname of the tab's URL, if it has one that parses
    pub fn hostname(&self) -> Option<String> {
        self.url.as_deref().and_then(crate::domain::extract_hostname)
    }
}

fn deserialize_group_id<'de, D>(deserializer: D) -> Result<Option<GroupId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<GroupId>::deserialize(deserializer)?;
    Ok(raw.filter(|id| *id != TAB_GROUP_ID_NONE))
}

/// A tab group as it currently exists in the browser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveGroup {
    pub id: GroupId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub color: GroupColor,
    #[serde(default)]
    pub member_tab_ids: BTreeSet<TabId>,
}

impl LiveGroup {
    pub fn matches(&self, title: &str, color: GroupColor) -> bool {
        self.title == title && self.color == color
    }
}

/// A grouping proposal produced by one pipeline stage
///
/// Only an instruction for the reconciler; live groups are matched by
/// `(name, color)`, never by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateGroup {
    pub id: String,
    pub name: String,
    pub color: GroupColor,
    pub tabs: Vec<Tab>,
}

impl CandidateGroup {
    pub fn tab_ids(&self) -> Vec<TabId> {
        self.tabs.iter().map(|tab| tab.id).collect()
    }
}
