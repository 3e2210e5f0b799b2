/// Seams to the browser: the tab/group store and the notification sink
use crate::color::GroupColor;
use crate::error::StoreError;
use crate::tab_data::{GroupId, LiveGroup, Tab, TabId};

/// The environment's tab and tab-group collection
///
/// Every query is a fresh snapshot; nothing is cached between calls.
#[allow(async_fn_in_trait)]
pub trait TabStore {
    async fn query_tabs(&self) -> Result<Vec<Tab>, StoreError>;

    async fn query_groups(&self) -> Result<Vec<LiveGroup>, StoreError>;

    async fn query_group_tabs(&self, group_id: GroupId) -> Result<Vec<Tab>, StoreError>;

    /// Move tabs into `group_id`, or into a new group when `None`.
    /// Returns the id of the group the tabs ended up in.
    async fn group_tabs(&self, tab_ids: &[TabId], group_id: Option<GroupId>) -> Result<GroupId, StoreError>;

    async fn update_group(&self, group_id: GroupId, title: &str, color: GroupColor) -> Result<(), StoreError>;

    async fn ungroup(&self, tab_ids: &[TabId]) -> Result<(), StoreError>;

    async fn set_active(&self, tab_id: TabId) -> Result<(), StoreError>;

    async fn set_pinned(&self, tab_id: TabId, pinned: bool) -> Result<(), StoreError>;

    /// Whether the primitive `ungroup` command exists in this environment
    fn supports_ungroup(&self) -> bool {
        true
    }
}

/// Fire-and-forget user notifications
pub trait Notifier {
    fn notify(&self, title: &str, message: &str);
}

/// How tabs get detached from their group
///
/// Chosen once per environment. `Primitive` still degrades to the pin toggle
/// for a group whose `ungroup` call is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UngroupStrategy {
    Primitive,
    /// Activate the tab and flip `pinned` on and off; pinning a tab pulls it
    /// out of its group.
    PinToggle,
}

impl UngroupStrategy {
    pub fn select<S: TabStore>(store: &S) -> UngroupStrategy {
        if store.supports_ungroup() {
            UngroupStrategy::Primitive
        } else {
            log::warn!("tabs.ungroup unavailable, using pin toggle to dissolve groups");
            UngroupStrategy::PinToggle
        }
    }

    /// Detach `tabs` from whatever group they are in. Best effort: fallback
    /// failures are logged, never returned.
    pub async fn detach<S: TabStore>(&self, store: &S, tabs: &[Tab]) {
        if *self == UngroupStrategy::Primitive {
            let tab_ids: Vec<TabId> = tabs.iter().map(|tab| tab.id).collect();
            match store.ungroup(&tab_ids).await {
                Ok(()) => return,
                Err(e) => log::error!("ungroup failed, trying pin toggle: {}", e),
            }
        }

        for tab in tabs {
            if let Err(e) = pin_toggle(store, tab.id).await {
                log::error!("Pin toggle failed for tab {}: {}", tab.id, e);
            }
        }
    }
}

async fn pin_toggle<S: TabStore>(store: &S, tab_id: TabId) -> Result<(), StoreError> {
    store.set_active(tab_id).await?;
    store.set_pinned(tab_id, true).await?;
    store.set_pinned(tab_id, false).await
}
