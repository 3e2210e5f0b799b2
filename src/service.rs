/// Background controller: full regroup, delete-all, the debounced fast path,
/// inbound commands and the periodic scheduler loop
use futures::lock::Mutex;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;

use crate::ai::{AiClassifier, ChatClient};
use crate::grouping::{generate_groups, RunMode};
use crate::reconcile::Reconciler;
use crate::scheduler::{self, Action, Debouncer, SchedulerState};
use crate::storage::{Settings, SettingsStore};
use crate::store::{Notifier, TabStore, UngroupStrategy};
use crate::tab_data::Tab;

/// Wall clock and timers
#[allow(async_fn_in_trait)]
pub trait Clock {
    fn now_ms(&self) -> u64;

    async fn sleep(&self, ms: u64);
}

/// Messages from the options page and popup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    DeleteAllGroups,
    RegroupAllTabs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    pub message: String,
}

impl CommandResponse {
    fn ok(message: &str) -> Self {
        CommandResponse {
            success: true,
            message: message.to_string(),
        }
    }

    fn failed(message: String) -> Self {
        CommandResponse {
            success: false,
            message,
        }
    }
}

/// What happened to one fast-path trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FastPathOutcome {
    AlreadyGrouped,
    Disabled,
    /// A later trigger in the same window took over
    Superseded,
    Ran,
}

pub struct GroupingService<S, P, C, N, K> {
    store: S,
    settings: P,
    classifier: AiClassifier<C>,
    notifier: N,
    clock: K,
    strategy: UngroupStrategy,
    debouncer: RefCell<Debouncer>,
    /// Held by every run that touches groups, so a scheduled regroup and a
    /// fast-path run never interleave on the store
    regroup_lock: Mutex<()>,
}

impl<S, P, C, N, K> GroupingService<S, P, C, N, K>
where
    S: TabStore,
    P: SettingsStore,
    C: ChatClient,
    N: Notifier,
    K: Clock,
{
    pub fn new(store: S, settings: P, client: C, notifier: N, clock: K) -> Self {
        let strategy = UngroupStrategy::select(&store);
        GroupingService {
            store,
            settings,
            classifier: AiClassifier::new(client),
            notifier,
            clock,
            strategy,
            debouncer: RefCell::new(Debouncer::default()),
            regroup_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &P {
        &self.settings
    }

    fn reconciler(&self) -> Reconciler<'_, S, N> {
        Reconciler::new(&self.store, &self.notifier, self.strategy)
    }

    /// Install/update hook: seed defaults and migrate settings
    pub async fn on_installed(&self) {
        if let Err(e) = self.settings.init_defaults().await {
            log::error!("Failed to initialise default settings: {}", e);
        }
    }

    pub async fn handle_command(&self, command: Command) -> CommandResponse {
        log::info!("Handling command {:?}", command);
        match command {
            Command::DeleteAllGroups => self.delete_all_groups().await,
            Command::RegroupAllTabs => self.regroup_all_tabs().await,
        }
    }

    pub async fn delete_all_groups(&self) -> CommandResponse {
        let _guard = self.regroup_lock.lock().await;
        self.delete_all_locked().await
    }

    async fn delete_all_locked(&self) -> CommandResponse {
        match self.reconciler().delete_all().await {
            Ok(summary) if summary.found == 0 => CommandResponse::ok("No tab groups found"),
            Ok(_) => CommandResponse::ok("All tab groups deleted"),
            Err(e) => {
                log::error!("Failed to delete all groups: {}", e);
                self.notifier
                    .notify("Failed to delete groups", &format!("Failed to delete all groups: {}", e));
                CommandResponse::failed(format!("Delete failed: {}", e))
            }
        }
    }

    /// Classify every open tab, dissolve the existing groups, apply the result
    pub async fn regroup_all_tabs(&self) -> CommandResponse {
        let _guard = self.regroup_lock.lock().await;
        log::info!("Regrouping all tabs");

        let tabs = match self.store.query_tabs().await {
            Ok(tabs) => tabs,
            Err(e) => return self.regroup_failed(e.to_string()),
        };

        let groups = generate_groups(&self.settings, &self.classifier, &tabs, RunMode::Full).await;

        let deleted = self.delete_all_locked().await;
        if !deleted.success {
            return self.regroup_failed(deleted.message);
        }

        let summary = self.reconciler().apply(&groups).await;
        log::info!(
            "Regrouped all tabs: {} created, {} merged, {} skipped, {} failed",
            summary.created,
            summary.merged,
            summary.skipped,
            summary.failed
        );
        CommandResponse::ok("All tabs regrouped")
    }

    fn regroup_failed(&self, reason: String) -> CommandResponse {
        log::error!("Failed to regroup all tabs: {}", reason);
        self.notifier
            .notify("Grouping failed", &format!("Failed to regroup all tabs: {}", reason));
        CommandResponse::failed(format!("Grouping failed: {}", reason))
    }

    /// Fast path for a tab that was just created or finished loading
    ///
    /// Already-grouped tabs return at once. Otherwise the call waits out the
    /// debounce window and only the last trigger in a burst runs the pipeline.
    pub async fn on_tab_ready(&self, tab: &Tab) -> FastPathOutcome {
        if tab.is_grouped() {
            log::debug!("Tab {} is already grouped, skipping", tab.id);
            return FastPathOutcome::AlreadyGrouped;
        }

        match self.settings.load_settings().await {
            Ok(settings) if settings.auto_group_enabled => {}
            Ok(_) => return FastPathOutcome::Disabled,
            Err(e) => {
                log::error!("Failed to read settings for tab {}: {}", tab.id, e);
                return FastPathOutcome::Disabled;
            }
        }

        let (ticket, window) = {
            let mut debouncer = self.debouncer.borrow_mut();
            (debouncer.trigger(), debouncer.window_ms())
        };
        self.clock.sleep(window).await;
        if !self.debouncer.borrow_mut().fire(ticket) {
            return FastPathOutcome::Superseded;
        }

        self.group_ungrouped_tabs().await;
        FastPathOutcome::Ran
    }

    async fn group_ungrouped_tabs(&self) {
        let _guard = self.regroup_lock.lock().await;

        let tabs = match self.store.query_tabs().await {
            Ok(tabs) => tabs,
            Err(e) => {
                log::error!("Failed to group new tabs: {}", e);
                self.notifier
                    .notify("Grouping failed", &format!("Failed to group new tabs: {}", e));
                return;
            }
        };

        let ungrouped: Vec<Tab> = tabs.into_iter().filter(|tab| !tab.is_grouped()).collect();
        log::debug!("{} ungrouped tabs", ungrouped.len());
        if ungrouped.is_empty() {
            return;
        }

        let groups = generate_groups(&self.settings, &self.classifier, &ungrouped, RunMode::Incremental).await;
        self.reconciler().apply(&groups).await;
    }

    /// One pass of the periodic scheduler; returns the state to sleep on
    pub async fn scheduler_step(&self, state: SchedulerState) -> SchedulerState {
        let settings = match self.settings.load_settings().await {
            Ok(settings) => settings,
            Err(e) => {
                log::error!("Failed to read settings for scheduled grouping: {}", e);
                let unreadable = Settings {
                    auto_reschedule: false,
                    ..Settings::default()
                };
                let (state, _) = scheduler::tick(state, self.clock.now_ms(), &unreadable);
                return state;
            }
        };

        let (state, action) = scheduler::tick(state, self.clock.now_ms(), &settings);
        match action {
            Action::Wait => state,
            Action::PollSettings => {
                log::debug!("Automatic regrouping is off, checking again later");
                state
            }
            Action::Regroup => {
                log::info!("Running scheduled regroup");
                let response = self.regroup_all_tabs().await;
                if !response.success {
                    log::warn!("Scheduled regroup failed, retrying soon");
                }
                scheduler::complete(state, self.clock.now_ms(), &settings, response.success)
            }
        }
    }

    /// Drive the scheduler forever
    pub async fn run_scheduler(&self) {
        let mut state = SchedulerState::default();
        loop {
            state = self.scheduler_step(state).await;
            let delay = state.delay_from(self.clock.now_ms());
            self.clock.sleep(delay.max(1)).await;
        }
    }
}
