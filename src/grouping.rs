/// Grouping orchestrator: rules, then AI, then domain fallback
///
/// Each stage only sees the tabs earlier stages left unclaimed, so a tab lands
/// in at most one candidate group per run.
use std::collections::HashSet;

use crate::ai::{AiClassifier, ChatClient};
use crate::domain::group_by_domain;
use crate::rules::match_rules;
use crate::storage::{Settings, SettingsStore};
use crate::tab_data::{CandidateGroup, Tab, TabId};

/// Why the pipeline is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Fast path over newly ungrouped tabs; AI honours the `aiEnabled` toggle
    Incremental,
    /// Full regroup; the classifier is always asked when a key is configured
    Full,
}

/// Tabs still up for grabs plus everything claimed so far
struct Pipeline {
    groups: Vec<CandidateGroup>,
    remaining: Vec<Tab>,
}

impl Pipeline {
    fn claim(&mut self, groups: Vec<CandidateGroup>) {
        let claimed: HashSet<TabId> = groups.iter().flat_map(|g| g.tabs.iter().map(|tab| tab.id)).collect();
        self.remaining.retain(|tab| !claimed.contains(&tab.id));
        self.groups.extend(groups);
    }
}

/// Produce candidate groups for `tabs`
///
/// A failing stage contributes nothing and the next one still runs. If the
/// settings cannot be read the whole run yields no groups.
pub async fn generate_groups<P, C>(
    settings_store: &P,
    classifier: &AiClassifier<C>,
    tabs: &[Tab],
    mode: RunMode,
) -> Vec<CandidateGroup>
where
    P: SettingsStore,
    C: ChatClient,
{
    let settings = match settings_store.load_settings().await {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Failed to generate tab groups: {}", e);
            return Vec::new();
        }
    };

    let mut pipeline = Pipeline {
        groups: Vec::new(),
        remaining: tabs.to_vec(),
    };

    match settings_store.get_rules().await {
        Ok(rules) => {
            let matched = match_rules(&pipeline.remaining, &rules);
            pipeline.remaining = matched.remainder;
            pipeline.groups.extend(matched.groups);
        }
        Err(e) => log::error!("Rule grouping failed: {}", e),
    }

    run_ai_stage(&mut pipeline, classifier, &settings, mode).await;

    let domain_groups = group_by_domain(&pipeline.remaining);
    pipeline.claim(domain_groups);

    log::info!(
        "Generated {} tab groups, {} tabs left ungrouped",
        pipeline.groups.len(),
        pipeline.remaining.len()
    );
    pipeline.groups
}

async fn run_ai_stage<C: ChatClient>(
    pipeline: &mut Pipeline,
    classifier: &AiClassifier<C>,
    settings: &Settings,
    mode: RunMode,
) {
    if pipeline.remaining.len() < 2 {
        log::debug!("Skipping AI grouping: fewer than two tabs left");
        return;
    }

    let force = mode == RunMode::Full;
    let groups: Vec<CandidateGroup> = classifier
        .classify(&pipeline.remaining, settings, force)
        .await
        .into_iter()
        .filter(|group| group.tabs.len() >= crate::ai::MIN_AI_GROUP_SIZE)
        .collect();

    pipeline.claim(groups);
}
