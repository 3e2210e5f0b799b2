/// Group reconciler: applies candidate groups to the live tab groups
///
/// Live groups are identified by `(title, color)`. A candidate whose title and
/// color already exist is merged into that group, so applying the same
/// candidates twice never creates a duplicate.
use crate::error::StoreError;
use crate::store::{Notifier, TabStore, UngroupStrategy};
use crate::tab_data::{CandidateGroup, GroupId, TabId};

/// What one `apply` pass did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ApplySummary {
    pub created: usize,
    pub merged: usize,
    /// Every tab closed before it could be grouped
    pub skipped: usize,
    pub failed: usize,
}

enum Applied {
    Created,
    Merged,
    Skipped,
}

/// What one `delete_all` pass did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeleteSummary {
    pub found: usize,
    /// Groups still present after dissolving
    pub remaining: usize,
}

pub struct Reconciler<'a, S, N> {
    store: &'a S,
    notifier: &'a N,
    strategy: UngroupStrategy,
}

impl<'a, S: TabStore, N: Notifier> Reconciler<'a, S, N> {
    pub fn new(store: &'a S, notifier: &'a N, strategy: UngroupStrategy) -> Self {
        Reconciler {
            store,
            notifier,
            strategy,
        }
    }

    /// Merge or create a live group for every candidate
    ///
    /// A rejected candidate is reported and skipped; the rest still apply.
    pub async fn apply(&self, groups: &[CandidateGroup]) -> ApplySummary {
        let mut summary = ApplySummary::default();

        for group in groups.iter().filter(|group| !group.tabs.is_empty()) {
            match self.apply_one(group).await {
                Ok(Applied::Created) => summary.created += 1,
                Ok(Applied::Merged) => summary.merged += 1,
                Ok(Applied::Skipped) => summary.skipped += 1,
                Err(e) => {
                    summary.failed += 1;
                    log::error!("Failed to apply tab group \"{}\": {}", group.name, e);
                    self.notifier.notify(
                        "Grouping failed",
                        &format!("Could not apply tab group \"{}\": {}", group.name, e),
                    );
                }
            }
        }

        summary
    }

    async fn apply_one(&self, group: &CandidateGroup) -> Result<Applied, StoreError> {
        let existing = self
            .store
            .query_groups()
            .await?
            .into_iter()
            .find(|live| live.matches(&group.name, group.color));

        match existing {
            Some(live) => {
                let missing: Vec<TabId> = group
                    .tabs
                    .iter()
                    .map(|tab| tab.id)
                    .filter(|id| !live.member_tab_ids.contains(id))
                    .collect();
                if !missing.is_empty() {
                    self.group_live_tabs(missing, Some(live.id)).await?;
                }
                log::info!("Added tabs to existing group \"{}\"", group.name);
                Ok(Applied::Merged)
            }
            None => {
                let Some(group_id) = self.group_live_tabs(group.tab_ids(), None).await? else {
                    log::debug!("All tabs of \"{}\" closed, skipping", group.name);
                    return Ok(Applied::Skipped);
                };
                self.store.update_group(group_id, &group.name, group.color).await?;
                log::info!("Created tab group \"{}\" with {} tabs", group.name, group.tabs.len());
                Ok(Applied::Created)
            }
        }
    }

    /// Group `tab_ids`, dropping any tab that closed since the snapshot.
    /// `None` once every tab is gone.
    async fn group_live_tabs(
        &self,
        mut tab_ids: Vec<TabId>,
        target: Option<GroupId>,
    ) -> Result<Option<GroupId>, StoreError> {
        while !tab_ids.is_empty() {
            match self.store.group_tabs(&tab_ids, target).await {
                Err(StoreError::TabGone(gone)) if tab_ids.contains(&gone) => {
                    log::debug!("Tab {} closed before it could be grouped", gone);
                    tab_ids.retain(|id| *id != gone);
                }
                result => return result.map(Some),
            }
        }
        Ok(None)
    }

    /// Dissolve every live group
    ///
    /// Per-group failures are reported and skipped. Groups that survive are
    /// logged; the pass still counts as a success.
    pub async fn delete_all(&self) -> Result<DeleteSummary, StoreError> {
        let groups = self.store.query_groups().await?;
        if groups.is_empty() {
            return Ok(DeleteSummary::default());
        }

        log::info!("Dissolving {} tab groups", groups.len());

        for group in &groups {
            match self.store.query_group_tabs(group.id).await {
                Ok(tabs) if tabs.is_empty() => {}
                Ok(tabs) => {
                    log::debug!("Dissolving group {} with {} tabs", group.id, tabs.len());
                    self.strategy.detach(self.store, &tabs).await;
                }
                Err(e) => {
                    log::error!("Failed to dissolve group {}: {}", group.id, e);
                    self.notifier.notify(
                        "Failed to dissolve group",
                        &format!("Error dissolving group {}: {}", group.id, e),
                    );
                }
            }
        }

        let remaining = match self.store.query_groups().await {
            Ok(left) => left.len(),
            Err(e) => {
                log::warn!("Could not re-check tab groups: {}", e);
                0
            }
        };
        if remaining > 0 {
            log::warn!("{} tab groups could not be dissolved", remaining);
        }

        Ok(DeleteSummary {
            found: groups.len(),
            remaining,
        })
    }
}
