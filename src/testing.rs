/// In-memory fakes for the environment seams, shared by unit tests
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde_json::{json, Value};

use crate::ai::{ChatClient, ChatRequest, HttpReply};
use crate::color::GroupColor;
use crate::error::{ClassifierError, SettingsError, StoreError};
use crate::service::Clock;
use crate::storage::SettingsStore;
use crate::store::{Notifier, TabStore};
use crate::tab_data::{GroupId, LiveGroup, Tab, TabId};

#[derive(Default)]
struct StoreState {
    tabs: Vec<Tab>,
    groups: BTreeMap<GroupId, (String, GroupColor)>,
    next_group_id: GroupId,
    mutations: usize,
    pin_toggles: usize,
    ungroup_disabled: bool,
    ungroup_fails: bool,
    queries_fail: bool,
    rejected_tabs: HashSet<TabId>,
}

impl StoreState {
    fn tab_mut(&mut self, tab_id: TabId) -> Result<&mut Tab, StoreError> {
        self.tabs
            .iter_mut()
            .find(|tab| tab.id == tab_id)
            .ok_or(StoreError::TabGone(tab_id))
    }

    /// Chrome drops a group as soon as its last tab leaves
    fn prune(&mut self) {
        let used: HashSet<GroupId> = self.tabs.iter().filter_map(|tab| tab.group_id).collect();
        self.groups.retain(|id, _| used.contains(id));
    }
}

/// Tab/group store with Chrome-like semantics
#[derive(Default)]
pub struct MemoryTabStore {
    state: RefCell<StoreState>,
}

impl MemoryTabStore {
    pub fn with_tabs(tabs: Vec<Tab>) -> Self {
        let store = MemoryTabStore::default();
        store.state.borrow_mut().tabs = tabs;
        store
    }

    pub fn open_tab(&self, tab: Tab) {
        self.state.borrow_mut().tabs.push(tab);
    }

    pub fn close_tab(&self, tab_id: TabId) {
        let mut state = self.state.borrow_mut();
        state.tabs.retain(|tab| tab.id != tab_id);
        state.prune();
    }

    /// Create a titled group directly, without counting it as a mutation
    pub fn add_group(&self, title: &str, color: GroupColor, tab_ids: &[TabId]) -> GroupId {
        let mut state = self.state.borrow_mut();
        state.next_group_id += 1;
        let id = state.next_group_id;
        state.groups.insert(id, (title.to_string(), color));
        for tab in state.tabs.iter_mut().filter(|tab| tab_ids.contains(&tab.id)) {
            tab.group_id = Some(id);
        }
        state.prune();
        id
    }

    pub fn disable_ungroup(&self) {
        self.state.borrow_mut().ungroup_disabled = true;
    }

    pub fn fail_ungroup(&self) {
        self.state.borrow_mut().ungroup_fails = true;
    }

    pub fn fail_queries(&self) {
        self.state.borrow_mut().queries_fail = true;
    }

    /// Every command touching this tab is rejected
    pub fn reject_tab(&self, tab_id: TabId) {
        self.state.borrow_mut().rejected_tabs.insert(tab_id);
    }

    pub fn mutations(&self) -> usize {
        self.state.borrow().mutations
    }

    pub fn pin_toggles(&self) -> usize {
        self.state.borrow().pin_toggles
    }

    pub fn group_of(&self, tab_id: TabId) -> Option<GroupId> {
        self.state
            .borrow()
            .tabs
            .iter()
            .find(|tab| tab.id == tab_id)
            .and_then(|tab| tab.group_id)
    }

    pub fn live_groups(&self) -> Vec<LiveGroup> {
        let state = self.state.borrow();
        state
            .groups
            .iter()
            .map(|(id, (title, color))| LiveGroup {
                id: *id,
                title: title.clone(),
                color: *color,
                member_tab_ids: state
                    .tabs
                    .iter()
                    .filter(|tab| tab.group_id == Some(*id))
                    .map(|tab| tab.id)
                    .collect::<BTreeSet<_>>(),
            })
            .collect()
    }

    fn check_queries(&self) -> Result<(), StoreError> {
        if self.state.borrow().queries_fail {
            return Err(StoreError::operation("query", "store unavailable"));
        }
        Ok(())
    }

    fn check_rejected(&self, operation: &str, tab_id: TabId) -> Result<(), StoreError> {
        if self.state.borrow().rejected_tabs.contains(&tab_id) {
            return Err(StoreError::operation(operation, format!("tab {} is locked", tab_id)));
        }
        Ok(())
    }
}

impl TabStore for MemoryTabStore {
    async fn query_tabs(&self) -> Result<Vec<Tab>, StoreError> {
        self.check_queries()?;
        Ok(self.state.borrow().tabs.clone())
    }

    async fn query_groups(&self) -> Result<Vec<LiveGroup>, StoreError> {
        self.check_queries()?;
        Ok(self.live_groups())
    }

    async fn query_group_tabs(&self, group_id: GroupId) -> Result<Vec<Tab>, StoreError> {
        self.check_queries()?;
        Ok(self
            .state
            .borrow()
            .tabs
            .iter()
            .filter(|tab| tab.group_id == Some(group_id))
            .cloned()
            .collect())
    }

    async fn group_tabs(&self, tab_ids: &[TabId], group_id: Option<GroupId>) -> Result<GroupId, StoreError> {
        for tab_id in tab_ids {
            self.check_rejected("group", *tab_id)?;
        }
        let mut state = self.state.borrow_mut();
        state.mutations += 1;

        if tab_ids.is_empty() {
            return Err(StoreError::operation("group", "no tab ids given"));
        }
        for tab_id in tab_ids {
            state.tab_mut(*tab_id)?;
        }

        let target = match group_id {
            Some(id) if state.groups.contains_key(&id) => id,
            Some(id) => return Err(StoreError::GroupGone(id)),
            None => {
                state.next_group_id += 1;
                let id = state.next_group_id;
                state.groups.insert(id, (String::new(), GroupColor::Grey));
                id
            }
        };

        for tab_id in tab_ids {
            state.tab_mut(*tab_id)?.group_id = Some(target);
        }
        state.prune();
        Ok(target)
    }

    async fn update_group(&self, group_id: GroupId, title: &str, color: GroupColor) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        state.mutations += 1;
        let group = state.groups.get_mut(&group_id).ok_or(StoreError::GroupGone(group_id))?;
        *group = (title.to_string(), color);
        Ok(())
    }

    async fn ungroup(&self, tab_ids: &[TabId]) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        state.mutations += 1;
        if state.ungroup_disabled {
            return Err(StoreError::UngroupUnsupported);
        }
        if state.ungroup_fails {
            return Err(StoreError::operation("ungroup", "not allowed"));
        }
        for tab_id in tab_ids {
            state.tab_mut(*tab_id)?.group_id = None;
        }
        state.prune();
        Ok(())
    }

    async fn set_active(&self, tab_id: TabId) -> Result<(), StoreError> {
        self.check_rejected("update", tab_id)?;
        self.state.borrow_mut().tab_mut(tab_id).map(|_| ())
    }

    async fn set_pinned(&self, tab_id: TabId, pinned: bool) -> Result<(), StoreError> {
        self.check_rejected("update", tab_id)?;
        let mut state = self.state.borrow_mut();
        state.mutations += 1;
        let tab = state.tab_mut(tab_id)?;
        if pinned {
            tab.group_id = None;
            state.pin_toggles += 1;
            state.prune();
        }
        Ok(())
    }

    fn supports_ungroup(&self) -> bool {
        !self.state.borrow().ungroup_disabled
    }
}

/// Settings storage backed by a map
#[derive(Default)]
pub struct MemorySettings {
    values: RefCell<HashMap<String, Value>>,
    reads_fail: Cell<bool>,
}

impl MemorySettings {
    pub fn insert(&self, key: &str, value: Value) {
        self.values.borrow_mut().insert(key.to_string(), value);
    }

    pub fn fail_reads(&self) {
        self.reads_fail.set(true);
    }
}

impl SettingsStore for MemorySettings {
    async fn get_value(&self, key: &str) -> Result<Option<Value>, SettingsError> {
        if self.reads_fail.get() {
            return Err(SettingsError::Storage("storage.local unavailable".to_string()));
        }
        Ok(self.values.borrow().get(key).cloned())
    }

    async fn set_value(&self, key: &str, value: Value) -> Result<(), SettingsError> {
        self.insert(key, value);
        Ok(())
    }
}

/// Chat transport replaying queued replies
#[derive(Default)]
pub struct ScriptedChat {
    replies: RefCell<VecDeque<Result<HttpReply, ClassifierError>>>,
    requests: RefCell<Vec<ChatRequest>>,
}

impl ScriptedChat {
    pub fn push(&self, reply: Result<HttpReply, ClassifierError>) {
        self.replies.borrow_mut().push_back(reply);
    }

    pub fn calls(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.requests.borrow().last().cloned()
    }
}

impl ChatClient for ScriptedChat {
    async fn post(&self, request: &ChatRequest) -> Result<HttpReply, ClassifierError> {
        self.requests.borrow_mut().push(request.clone());
        self.replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(ClassifierError::Transport("no scripted reply".to_string())))
    }
}

/// A 200 reply whose assistant message is `content`
pub fn ok_reply(content: &str) -> HttpReply {
    HttpReply {
        status: 200,
        body: json!({"choices": [{"message": {"role": "assistant", "content": content}}]}).to_string(),
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notes: RefCell<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn titles(&self) -> Vec<String> {
        self.notes.borrow().iter().map(|(title, _)| title.clone()).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, title: &str, message: &str) {
        self.notes.borrow_mut().push((title.to_string(), message.to_string()));
    }
}

/// Virtual clock; `sleep` yields once to the executor, then jumps time forward
#[derive(Default)]
pub struct ManualClock {
    now: Cell<u64>,
    sleeps: RefCell<Vec<u64>>,
    early_ms: Cell<u64>,
}

impl ManualClock {
    pub fn set(&self, now: u64) {
        self.now.set(now);
    }

    /// Timers fire `ms` before they are due
    pub fn wake_early_by(&self, ms: u64) {
        self.early_ms.set(ms);
    }

    pub fn sleeps(&self) -> Vec<u64> {
        self.sleeps.borrow().clone()
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }

    async fn sleep(&self, ms: u64) {
        let wake_at = self.now.get() + ms.saturating_sub(self.early_ms.get());
        self.sleeps.borrow_mut().push(ms);
        YieldNow(false).await;
        self.now.set(self.now.get().max(wake_at));
    }
}

struct YieldNow(bool);

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            Poll::Ready(())
        } else {
            self.0 = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}
