/// Settings and rule persistence over chrome.storage.local

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::color::ColorOption;
use crate::error::SettingsError;
use crate::rules::{default_rules, Rule};

pub const SETTINGS_KEY: &str = "settings";
pub const RULES_KEY: &str = "rules";

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_INTERVAL_MINUTES: u32 = 60;
/// Interval shipped by older versions, rewritten to the current default on load
const LEGACY_INTERVAL_MINUTES: u32 = 30;
/// Shortest allowed gap between scheduled regroups
pub const MIN_INTERVAL_MINUTES: u32 = 5;

/// Connection details for the chat-completion classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AiProviderConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub system_prompt: String,
}

impl Default for AiProviderConfig {
    fn default() -> Self {
        AiProviderConfig {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            system_prompt: String::new(),
        }
    }
}

impl AiProviderConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// User settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub auto_group_enabled: bool,
    pub ai_enabled: bool,
    /// Minutes between scheduled full regroups
    pub ai_grouping_interval: u32,
    pub auto_reschedule: bool,
    pub ai_provider: AiProviderConfig,
    pub custom_colors: Vec<ColorOption>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            auto_group_enabled: true,
            ai_enabled: true,
            ai_grouping_interval: DEFAULT_INTERVAL_MINUTES,
            auto_reschedule: true,
            ai_provider: AiProviderConfig::default(),
            custom_colors: Vec::new(),
        }
    }
}

impl Settings {
    /// Scheduled regrouping only runs when both AI and rescheduling are on
    pub fn auto_regroup_enabled(&self) -> bool {
        self.ai_enabled && self.auto_reschedule
    }

    pub fn interval_minutes(&self) -> u32 {
        self.ai_grouping_interval.max(MIN_INTERVAL_MINUTES)
    }
}

/// Decode stored settings, filling in anything missing with defaults
///
/// Returns whether the stored value needs to be written back.
pub fn migrate_settings(raw: Option<Value>) -> Result<(Settings, bool), SettingsError> {
    let Some(raw) = raw.filter(|v| !v.is_null()) else {
        return Ok((Settings::default(), true));
    };

    let has = |key: &str| raw.get(key).is_some_and(|v| !v.is_null());
    let mut changed = !has("aiProvider") || !has("customColors") || !has("autoReschedule");

    let mut raw = raw;
    if let Value::Object(fields) = &mut raw {
        // Null counts as missing; the default fills it
        fields.retain(|_, v| !v.is_null());
        changed |= drop_unreadable_colors(fields);
    }

    let mut settings: Settings = serde_json::from_value(raw)?;

    if settings.ai_grouping_interval == LEGACY_INTERVAL_MINUTES {
        settings.ai_grouping_interval = DEFAULT_INTERVAL_MINUTES;
        changed = true;
    }

    Ok((settings, changed))
}

/// Remove custom colors that no longer decode. Returns whether any were removed.
fn drop_unreadable_colors(fields: &mut serde_json::Map<String, Value>) -> bool {
    match fields.get_mut("customColors") {
        None => false,
        Some(Value::Array(colors)) => {
            let before = colors.len();
            colors.retain(|color| match ColorOption::deserialize(color) {
                Ok(_) => true,
                Err(e) => {
                    log::warn!("Ignoring unreadable custom color: {}", e);
                    false
                }
            });
            colors.len() != before
        }
        Some(_) => {
            log::warn!("Ignoring custom colors that are not a list");
            fields.remove("customColors");
            true
        }
    }
}

/// Decode the stored rule list, skipping entries that do not parse
pub fn parse_rules(raw: Option<Value>) -> Vec<Rule> {
    let Some(Value::Array(items)) = raw else {
        return Vec::new();
    };

    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<Rule>(item) {
            Ok(rule) => Some(rule),
            Err(e) => {
                log::warn!("Ignoring unreadable rule: {}", e);
                None
            }
        })
        .collect()
}

/// Key/value persistence provided by the environment
///
/// Implementors only supply raw reads and writes; decoding, defaults and
/// migration live in the provided methods.
#[allow(async_fn_in_trait)]
pub trait SettingsStore {
    async fn get_value(&self, key: &str) -> Result<Option<Value>, SettingsError>;

    async fn set_value(&self, key: &str, value: Value) -> Result<(), SettingsError>;

    async fn load_settings(&self) -> Result<Settings, SettingsError> {
        let (settings, _) = migrate_settings(self.get_value(SETTINGS_KEY).await?)?;
        Ok(settings)
    }

    async fn save_settings(&self, settings: &Settings) -> Result<(), SettingsError> {
        self.set_value(SETTINGS_KEY, serde_json::to_value(settings)?).await
    }

    async fn get_rules(&self) -> Result<Vec<Rule>, SettingsError> {
        Ok(parse_rules(self.get_value(RULES_KEY).await?))
    }

    async fn save_rules(&self, rules: &[Rule]) -> Result<(), SettingsError> {
        self.set_value(RULES_KEY, serde_json::to_value(rules)?).await
    }

    /// Seed default rules on first run and write back migrated settings
    async fn init_defaults(&self) -> Result<(), SettingsError> {
        if self.get_rules().await?.is_empty() {
            log::info!("Seeding default grouping rules");
            self.save_rules(&default_rules()).await?;
        }

        let (settings, changed) = migrate_settings(self.get_value(SETTINGS_KEY).await?)?;
        if changed {
            log::info!("Writing back migrated settings");
            self.save_settings(&settings).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemorySettings;
    use futures::executor::block_on;
    use serde_json::json;

    #[test]
    fn test_missing_settings_use_defaults() {
        let (settings, changed) = migrate_settings(None).unwrap();

        assert!(changed);
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.ai_provider.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(settings.ai_grouping_interval, 60);
    }

    #[test]
    fn test_partial_settings_are_backfilled() {
        let raw = json!({"autoGroupEnabled": false, "aiEnabled": false, "aiGroupingInterval": 15});

        let (settings, changed) = migrate_settings(Some(raw)).unwrap();

        assert!(changed);
        assert!(!settings.auto_group_enabled);
        assert!(!settings.ai_enabled);
        assert!(settings.auto_reschedule);
        assert_eq!(settings.ai_grouping_interval, 15);
        assert_eq!(settings.ai_provider.model, DEFAULT_MODEL);
        assert!(settings.custom_colors.is_empty());
    }

    #[test]
    fn test_null_fields_are_backfilled() {
        let raw = json!({
            "aiGroupingInterval": 20,
            "aiProvider": null,
            "customColors": null,
            "autoReschedule": null,
        });

        let (settings, changed) = migrate_settings(Some(raw)).unwrap();

        assert!(changed);
        assert_eq!(settings.ai_grouping_interval, 20);
        assert_eq!(settings.ai_provider, AiProviderConfig::default());
        assert!(settings.custom_colors.is_empty());
        assert!(settings.auto_reschedule);
    }

    #[test]
    fn test_unreadable_custom_colors_are_dropped() {
        let raw = json!({
            "customColors": [
                {"name": "sakura", "value": "#F06292", "label": "Sakura", "origin": "japan"},
                {"name": "odd", "value": "#000000", "label": "Odd", "origin": "mars"},
            ],
        });

        let (settings, changed) = migrate_settings(Some(raw)).unwrap();

        assert!(changed);
        assert_eq!(settings.custom_colors.len(), 1);
        assert_eq!(settings.custom_colors[0].name, "sakura");

        let (settings, _) = migrate_settings(Some(json!({"customColors": "none"}))).unwrap();
        assert!(settings.custom_colors.is_empty());
    }

    #[test]
    fn test_init_defaults_repairs_null_settings() {
        let store = MemorySettings::default();
        store.insert(SETTINGS_KEY, json!({"aiEnabled": false, "aiProvider": null, "customColors": null}));

        block_on(store.init_defaults()).unwrap();

        let stored = block_on(store.get_value(SETTINGS_KEY)).unwrap().unwrap();
        assert!(stored["aiProvider"].is_object());
        assert_eq!(stored["aiEnabled"], json!(false));
        assert!(!block_on(store.load_settings()).unwrap().ai_enabled);
    }

    #[test]
    fn test_complete_settings_are_unchanged() {
        let raw = serde_json::to_value(Settings::default()).unwrap();
        let (_, changed) = migrate_settings(Some(raw)).unwrap();
        assert!(!changed);
    }

    #[test]
    fn test_legacy_interval_is_migrated() {
        let mut settings = Settings::default();
        settings.ai_grouping_interval = 30;
        let raw = serde_json::to_value(settings).unwrap();

        let (settings, changed) = migrate_settings(Some(raw)).unwrap();

        assert!(changed);
        assert_eq!(settings.ai_grouping_interval, 60);
    }

    #[test]
    fn test_interval_is_clamped() {
        let settings = Settings {
            ai_grouping_interval: 1,
            ..Settings::default()
        };
        assert_eq!(settings.interval_minutes(), MIN_INTERVAL_MINUTES);
    }

    #[test]
    fn test_parse_rules_skips_bad_entries() {
        let raw = json!([
            {"id": "a", "name": "A", "type": "domain", "pattern": "a.com", "enabled": true},
            {"name": "missing id"},
        ]);

        let rules = parse_rules(Some(raw));
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, "a");

        assert!(parse_rules(Some(json!({"not": "an array"}))).is_empty());
        assert!(parse_rules(None).is_empty());
    }

    #[test]
    fn test_init_defaults_seeds_rules_once() {
        let store = MemorySettings::default();

        block_on(store.init_defaults()).unwrap();
        let rules = block_on(store.get_rules()).unwrap();
        assert_eq!(rules.len(), 3);
        assert!(block_on(store.get_value(SETTINGS_KEY)).unwrap().is_some());

        let custom = vec![default_rules().remove(1)];
        block_on(store.save_rules(&custom)).unwrap();
        block_on(store.init_defaults()).unwrap();
        assert_eq!(block_on(store.get_rules()).unwrap(), custom);
    }
}
