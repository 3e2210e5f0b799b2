/// Browser bindings: chrome.* APIs through the JS bridge, and the entry points
/// the background service worker calls
use std::cell::Cell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;

use crate::ai::{ChatClient, ChatRequest, HttpReply};
use crate::color::GroupColor;
use crate::error::{ClassifierError, SettingsError, StoreError};
use crate::service::{Clock, Command, GroupingService};
use crate::storage::SettingsStore;
use crate::store::{Notifier, TabStore};
use crate::tab_data::{GroupId, LiveGroup, Tab, TabId};

// Import JS bridge functions
#[wasm_bindgen(module = "/background.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn queryTabs() -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn queryGroups() -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn queryGroupTabs(group_id: i32) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn groupTabs(tab_ids: JsValue, group_id: Option<i32>) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn updateGroup(group_id: i32, title: &str, color: &str) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn ungroupTabs(tab_ids: JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn updateTab(tab_id: i32, props: JsValue) -> Result<(), JsValue>;

    fn hasUngroup() -> bool;

    #[wasm_bindgen(catch)]
    async fn getStorage(key: &str) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn setStorage(key: &str, value: JsValue) -> Result<(), JsValue>;

    fn showNotification(title: &str, message: &str);

    #[wasm_bindgen(catch)]
    async fn postJson(url: &str, api_key: &str, body: &str) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn sleep(ms: f64) -> Result<(), JsValue>;

    fn nowMs() -> f64;
}

fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, serde_wasm_bindgen::Error> {
    value.serialize(&serde_wasm_bindgen::Serializer::json_compatible())
}

fn from_js<T: for<'de> Deserialize<'de>>(value: JsValue) -> Result<T, serde_wasm_bindgen::Error> {
    serde_wasm_bindgen::from_value(value)
}

fn js_message(e: &JsValue) -> String {
    e.as_string()
        .or_else(|| e.dyn_ref::<js_sys::Error>().map(|err| String::from(err.message())))
        .unwrap_or_else(|| format!("{:?}", e))
}

/// Chrome reports a closed tab as "No tab with id: N"
fn store_error(operation: &str, e: JsValue) -> StoreError {
    let message = js_message(&e);
    match message
        .strip_prefix("No tab with id: ")
        .and_then(|id| id.trim_end_matches('.').parse::<TabId>().ok())
    {
        Some(tab_id) => StoreError::TabGone(tab_id),
        None => StoreError::operation(operation, message),
    }
}

fn decode_error(operation: &str, e: serde_wasm_bindgen::Error) -> StoreError {
    StoreError::operation(operation, format!("Failed to parse: {}", e))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TabUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pinned: Option<bool>,
}

/// chrome.tabs and chrome.tabGroups
pub struct ChromeTabs;

impl TabStore for ChromeTabs {
    async fn query_tabs(&self) -> Result<Vec<Tab>, StoreError> {
        let tabs_js = queryTabs().await.map_err(|e| store_error("query tabs", e))?;
        from_js(tabs_js).map_err(|e| decode_error("query tabs", e))
    }

    async fn query_groups(&self) -> Result<Vec<LiveGroup>, StoreError> {
        let groups_js = queryGroups().await.map_err(|e| store_error("query groups", e))?;
        from_js(groups_js).map_err(|e| decode_error("query groups", e))
    }

    async fn query_group_tabs(&self, group_id: GroupId) -> Result<Vec<Tab>, StoreError> {
        let tabs_js = queryGroupTabs(group_id)
            .await
            .map_err(|e| store_error("query group tabs", e))?;
        from_js(tabs_js).map_err(|e| decode_error("query group tabs", e))
    }

    async fn group_tabs(&self, tab_ids: &[TabId], group_id: Option<GroupId>) -> Result<GroupId, StoreError> {
        let tab_ids_js = to_js(tab_ids).map_err(|e| decode_error("group", e))?;
        let id_js = groupTabs(tab_ids_js, group_id)
            .await
            .map_err(|e| store_error("group", e))?;
        id_js
            .as_f64()
            .map(|id| id as GroupId)
            .ok_or_else(|| StoreError::operation("group", "no group id returned"))
    }

    async fn update_group(&self, group_id: GroupId, title: &str, color: GroupColor) -> Result<(), StoreError> {
        updateGroup(group_id, title, color.as_str())
            .await
            .map_err(|e| store_error("update group", e))
    }

    async fn ungroup(&self, tab_ids: &[TabId]) -> Result<(), StoreError> {
        if !hasUngroup() {
            return Err(StoreError::UngroupUnsupported);
        }
        let tab_ids_js = to_js(tab_ids).map_err(|e| decode_error("ungroup", e))?;
        ungroupTabs(tab_ids_js).await.map_err(|e| store_error("ungroup", e))
    }

    async fn set_active(&self, tab_id: TabId) -> Result<(), StoreError> {
        self.update_tab(tab_id, TabUpdate { active: Some(true), pinned: None }).await
    }

    async fn set_pinned(&self, tab_id: TabId, pinned: bool) -> Result<(), StoreError> {
        self.update_tab(tab_id, TabUpdate { active: None, pinned: Some(pinned) }).await
    }

    fn supports_ungroup(&self) -> bool {
        hasUngroup()
    }
}

impl ChromeTabs {
    async fn update_tab(&self, tab_id: TabId, update: TabUpdate) -> Result<(), StoreError> {
        let props = to_js(&update).map_err(|e| decode_error("update tab", e))?;
        updateTab(tab_id, props).await.map_err(|e| store_error("update tab", e))
    }
}

/// chrome.storage.local
pub struct ChromeStorage;

impl SettingsStore for ChromeStorage {
    async fn get_value(&self, key: &str) -> Result<Option<Value>, SettingsError> {
        let value_js = getStorage(key)
            .await
            .map_err(|e| SettingsError::Storage(js_message(&e)))?;
        if value_js.is_null() || value_js.is_undefined() {
            return Ok(None);
        }
        from_js(value_js)
            .map(Some)
            .map_err(|e| SettingsError::Storage(format!("Failed to parse storage: {}", e)))
    }

    async fn set_value(&self, key: &str, value: Value) -> Result<(), SettingsError> {
        let value_js = to_js(&value).map_err(|e| SettingsError::Storage(format!("Failed to serialize: {}", e)))?;
        setStorage(key, value_js)
            .await
            .map_err(|e| SettingsError::Storage(js_message(&e)))
    }
}

/// chrome.notifications
pub struct ChromeNotifier;

impl Notifier for ChromeNotifier {
    fn notify(&self, title: &str, message: &str) {
        showNotification(title, message);
    }
}

/// fetch() to the chat-completion endpoint
pub struct FetchChat;

impl ChatClient for FetchChat {
    async fn post(&self, request: &ChatRequest) -> Result<HttpReply, ClassifierError> {
        let body = serde_json::to_string(&request.body)?;
        let reply_js = postJson(&request.url, &request.api_key, &body)
            .await
            .map_err(|e| ClassifierError::Transport(js_message(&e)))?;
        from_js(reply_js).map_err(|e| ClassifierError::Transport(format!("Failed to parse reply: {}", e)))
    }
}

pub struct BrowserClock;

impl Clock for BrowserClock {
    fn now_ms(&self) -> u64 {
        nowMs() as u64
    }

    async fn sleep(&self, ms: u64) {
        if let Err(e) = sleep(ms as f64).await {
            log::error!("Timer failed: {}", js_message(&e));
        }
    }
}

type BackgroundService = GroupingService<ChromeTabs, ChromeStorage, FetchChat, ChromeNotifier, BrowserClock>;

thread_local! {
    static SERVICE: Rc<BackgroundService> = Rc::new(GroupingService::new(
        ChromeTabs,
        ChromeStorage,
        FetchChat,
        ChromeNotifier,
        BrowserClock,
    ));
    static SCHEDULER_STARTED: Cell<bool> = const { Cell::new(false) };
}

fn service() -> Rc<BackgroundService> {
    SERVICE.with(Rc::clone)
}

// Set up panic hook and logging once the module loads
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

fn start_scheduler() {
    if SCHEDULER_STARTED.with(|started| started.replace(true)) {
        return;
    }
    spawn_local(async move {
        service().run_scheduler().await;
    });
}

/// chrome.runtime.onInstalled
#[wasm_bindgen]
pub fn on_installed(reason: String) {
    spawn_local(async move {
        if reason == "install" || reason == "update" {
            service().on_installed().await;
        }
        start_scheduler();
    });
}

/// chrome.runtime.onStartup, or any worker wake-up
#[wasm_bindgen]
pub fn start_background() {
    start_scheduler();
}

fn spawn_fast_path(tab_js: JsValue) {
    let tab: Tab = match from_js(tab_js) {
        Ok(tab) => tab,
        Err(e) => {
            log::error!("Failed to parse tab: {}", e);
            return;
        }
    };
    if !tab.has_url() {
        return;
    }

    spawn_local(async move {
        service().on_tab_ready(&tab).await;
    });
}

/// chrome.tabs.onCreated
#[wasm_bindgen]
pub fn on_tab_created(tab: JsValue) {
    spawn_fast_path(tab);
}

/// chrome.tabs.onUpdated; only finished loads are interesting
#[wasm_bindgen]
pub fn on_tab_updated(status: Option<String>, tab: JsValue) {
    if status.as_deref() == Some("complete") {
        spawn_fast_path(tab);
    }
}

/// chrome.runtime.onMessage. Messages that are not commands resolve to
/// `undefined` so other listeners can answer them.
#[wasm_bindgen]
pub async fn handle_message(message: JsValue) -> Result<JsValue, JsValue> {
    let command: Command = match from_js(message) {
        Ok(command) => command,
        Err(_) => return Ok(JsValue::UNDEFINED),
    };

    let response = service().handle_command(command).await;
    to_js(&response).map_err(|e| JsValue::from_str(&e.to_string()))
}

// Re-export domain reduction for the options page
#[wasm_bindgen]
pub fn registrable_domain(url: &str) -> String {
    crate::domain::extract_hostname(url)
        .map(|hostname| crate::domain::registrable_domain(&hostname))
        .unwrap_or_else(|| "invalid".to_string())
}
