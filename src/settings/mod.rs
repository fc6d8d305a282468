//! Saved filter presets, the active preset pointer and the time-input mode.

use std::collections::HashSet;

use anyhow::{Context, Result};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnError};
use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;

use crate::storage::SettingsStore;

pub const SETTINGS_KEY: &str = "kintai-settings";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PresetError {
    #[error("preset name cannot be empty")]
    EmptyName,
    #[error("select at least one repository before saving a preset")]
    NoRepositories,
    #[error("no preset is active")]
    NoActivePreset,
    #[error("preset '{0}' not found")]
    UnknownPreset(String),
    #[error("preset '{0}' already exists")]
    DuplicatePreset(String),
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum IssueState {
    #[default]
    Open,
    Closed,
    All,
}

impl IssueState {
    pub fn next(self) -> Self {
        match self {
            IssueState::Open => IssueState::Closed,
            IssueState::Closed => IssueState::All,
            IssueState::All => IssueState::Open,
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum TimeInputMode {
    #[default]
    EndTime,
    Duration,
}

impl TimeInputMode {
    pub fn toggled(self) -> Self {
        match self {
            TimeInputMode::EndTime => TimeInputMode::Duration,
            TimeInputMode::Duration => TimeInputMode::EndTime,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPreset {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub repos: IndexSet<String>,
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub state: IssueState,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub reviewer: Option<String>,
    #[serde(default)]
    pub labels: IndexSet<String>,
}

impl FilterPreset {
    fn normalize(&mut self) {
        self.assignee = normalize_login(self.assignee.take());
        self.reviewer = normalize_login(self.reviewer.take());
        self.labels = self
            .labels
            .drain(..)
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty())
            .collect();
    }
}

/// Blank logins mean "filter disabled".
pub fn normalize_login(value: Option<String>) -> Option<String> {
    value
        .map(|login| login.trim().to_string())
        .filter(|login| !login.is_empty())
}

pub fn new_preset_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SavedSettings {
    pub filter_presets: Vec<FilterPreset>,
    pub active_preset_id: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    pub time_input_mode: TimeInputMode,
}

impl SavedSettings {
    pub fn preset(&self, id: &str) -> Option<&FilterPreset> {
        self.filter_presets.iter().find(|preset| preset.id == id)
    }

    pub fn active_preset(&self) -> Option<&FilterPreset> {
        self.active_preset_id
            .as_deref()
            .and_then(|id| self.preset(id))
    }

    fn normalize(&mut self) {
        let mut seen = HashSet::new();
        self.filter_presets.retain(|preset| {
            let fresh = seen.insert(preset.id.clone());
            if !fresh {
                tracing::warn!(id = %preset.id, "dropping preset with duplicate id");
            }
            fresh
        });
        for preset in &mut self.filter_presets {
            preset.normalize();
        }
        if let Some(active) = self.active_preset_id.as_deref() {
            if self.preset(active).is_none() {
                tracing::warn!(id = %active, "active preset no longer exists, clearing");
                self.active_preset_id = None;
            }
        }
    }
}

pub fn parse_settings(raw: &str) -> Result<SavedSettings> {
    let mut settings: SavedSettings =
        serde_json::from_str(raw).context("parsing saved settings")?;
    settings.normalize();
    Ok(settings)
}

/// Owns the in-memory [`SavedSettings`] and writes the whole blob back to the store
/// after every mutation.
pub struct SettingsService {
    store: Box<dyn SettingsStore>,
    settings: SavedSettings,
}

impl SettingsService {
    /// Never fails: an unreadable or unparsable blob yields default settings.
    pub fn load(store: Box<dyn SettingsStore>) -> Self {
        let settings = match store.read(SETTINGS_KEY) {
            Ok(Some(raw)) => parse_settings(&raw).unwrap_or_else(|err| {
                tracing::warn!(?err, "saved settings are corrupt, using defaults");
                SavedSettings::default()
            }),
            Ok(None) => SavedSettings::default(),
            Err(err) => {
                tracing::warn!(?err, "failed to read saved settings, using defaults");
                SavedSettings::default()
            }
        };
        tracing::debug!(
            presets = settings.filter_presets.len(),
            active = ?settings.active_preset_id,
            "loaded settings"
        );
        Self { store, settings }
    }

    pub fn settings(&self) -> &SavedSettings {
        &self.settings
    }

    pub fn presets(&self) -> &[FilterPreset] {
        &self.settings.filter_presets
    }

    pub fn active_preset(&self) -> Option<&FilterPreset> {
        self.settings.active_preset()
    }

    pub fn time_input_mode(&self) -> TimeInputMode {
        self.settings.time_input_mode
    }

    /// Appends a preset and makes it the active one.
    pub fn add_preset(&mut self, mut preset: FilterPreset) -> Result<&SavedSettings> {
        if self.settings.preset(&preset.id).is_some() {
            return Err(PresetError::DuplicatePreset(preset.id).into());
        }
        preset.normalize();
        tracing::info!(id = %preset.id, name = %preset.name, "adding preset");
        let mut next = self.settings.clone();
        next.active_preset_id = Some(preset.id.clone());
        next.filter_presets.push(preset);
        self.commit(next)
    }

    pub fn update_preset(&mut self, mut preset: FilterPreset) -> Result<&SavedSettings> {
        let mut next = self.settings.clone();
        let Some(slot) = next
            .filter_presets
            .iter_mut()
            .find(|existing| existing.id == preset.id)
        else {
            return Err(PresetError::UnknownPreset(preset.id).into());
        };
        preset.normalize();
        *slot = preset;
        self.commit(next)
    }

    /// Removes a preset. When it was active, the first remaining preset takes over.
    pub fn delete_preset(&mut self, id: &str) -> Result<&SavedSettings> {
        let mut next = self.settings.clone();
        let before = next.filter_presets.len();
        next.filter_presets.retain(|preset| preset.id != id);
        if before == next.filter_presets.len() {
            tracing::debug!(%id, "delete requested for unknown preset");
        }
        if next.active_preset_id.as_deref() == Some(id) {
            next.active_preset_id = next.filter_presets.first().map(|preset| preset.id.clone());
        }
        self.commit(next)
    }

    /// Unknown ids clear the pointer instead of leaving it dangling.
    pub fn set_active(&mut self, id: Option<&str>) -> Result<&SavedSettings> {
        let mut next = self.settings.clone();
        next.active_preset_id = match id {
            Some(id) if next.preset(id).is_some() => Some(id.to_string()),
            Some(id) => {
                tracing::warn!(%id, "cannot activate unknown preset");
                None
            }
            None => None,
        };
        self.commit(next)
    }

    pub fn set_time_input_mode(&mut self, mode: TimeInputMode) -> Result<&SavedSettings> {
        let mut next = self.settings.clone();
        next.time_input_mode = mode;
        self.commit(next)
    }

    /// Writes `next` and only then makes it current, so a failed write changes nothing.
    fn commit(&mut self, next: SavedSettings) -> Result<&SavedSettings> {
        let json = serde_json::to_string(&next).context("serialising settings")?;
        self.store
            .write(SETTINGS_KEY, &json)
            .context("persisting settings")?;
        self.settings = next;
        Ok(&self.settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use assert_matches::assert_matches;

    fn preset(id: &str, repos: &[&str]) -> FilterPreset {
        FilterPreset {
            id: id.into(),
            name: format!("preset {id}"),
            repos: repos.iter().map(|r| r.to_string()).collect(),
            state: IssueState::Open,
            assignee: None,
            reviewer: None,
            labels: IndexSet::new(),
        }
    }

    fn stored(store: &MemoryStore) -> SavedSettings {
        parse_settings(&store.get(SETTINGS_KEY).expect("settings persisted")).expect("parse")
    }

    #[test]
    fn missing_blob_loads_defaults() {
        let service = SettingsService::load(Box::new(MemoryStore::new()));
        assert_eq!(service.settings(), &SavedSettings::default());
        assert_eq!(service.time_input_mode(), TimeInputMode::EndTime);
    }

    #[test]
    fn corrupt_blob_loads_defaults() {
        let store = MemoryStore::with_entry(SETTINGS_KEY, "{not json");
        let service = SettingsService::load(Box::new(store));
        assert!(service.presets().is_empty());
        assert_eq!(service.settings().active_preset_id, None);
    }

    #[test]
    fn partial_blob_merges_onto_defaults() {
        let raw = r#"{"filterPresets":[{"id":"a1","name":"Work","repos":["o/r"],"state":"closed","assignee":"","labels":["bug"]}],"activePresetId":"a1"}"#;
        let service = SettingsService::load(Box::new(MemoryStore::with_entry(SETTINGS_KEY, raw)));
        let active = service.active_preset().expect("active preset");
        assert_eq!(active.state, IssueState::Closed);
        assert_eq!(active.assignee, None);
        assert_eq!(active.reviewer, None);
        assert_eq!(service.time_input_mode(), TimeInputMode::EndTime);
    }

    #[test]
    fn unknown_enum_values_fall_back_per_field() -> Result<()> {
        let raw = r#"{"filterPresets":[{"id":"a1","name":"Work","repos":[],"state":"merged"}],"timeInputMode":"weekly"}"#;
        let settings = parse_settings(raw)?;
        assert_eq!(settings.filter_presets[0].state, IssueState::Open);
        assert_eq!(settings.time_input_mode, TimeInputMode::EndTime);
        Ok(())
    }

    #[test]
    fn dangling_active_id_is_cleared_on_load() -> Result<()> {
        let settings = parse_settings(r#"{"filterPresets":[],"activePresetId":"gone"}"#)?;
        assert_eq!(settings.active_preset_id, None);
        Ok(())
    }

    #[test]
    fn add_preset_activates_and_persists() -> Result<()> {
        let store = MemoryStore::new();
        let mut service = SettingsService::load(Box::new(store.clone()));
        service.add_preset(preset("a", &["o/a"]))?;
        service.add_preset(preset("b", &["o/b"]))?;
        let persisted = stored(&store);
        assert_eq!(persisted.active_preset_id.as_deref(), Some("b"));
        assert_eq!(persisted.filter_presets.len(), 2);
        Ok(())
    }

    #[test]
    fn duplicate_preset_id_is_rejected() -> Result<()> {
        let mut service = SettingsService::load(Box::new(MemoryStore::new()));
        service.add_preset(preset("a", &["o/a"]))?;
        let err = service.add_preset(preset("a", &["o/b"])).unwrap_err();
        assert_matches!(
            err.downcast_ref::<PresetError>(),
            Some(PresetError::DuplicatePreset(id)) if id == "a"
        );
        Ok(())
    }

    #[test]
    fn deleting_active_preset_promotes_first_remaining() -> Result<()> {
        let mut service = SettingsService::load(Box::new(MemoryStore::new()));
        service.add_preset(preset("a", &["o/a"]))?;
        service.add_preset(preset("b", &["o/b"]))?;
        service.add_preset(preset("c", &["o/c"]))?;
        let settings = service.delete_preset("c")?;
        assert_eq!(settings.active_preset_id.as_deref(), Some("a"));
        Ok(())
    }

    #[test]
    fn deleting_inactive_preset_keeps_pointer() -> Result<()> {
        let mut service = SettingsService::load(Box::new(MemoryStore::new()));
        service.add_preset(preset("a", &["o/a"]))?;
        service.add_preset(preset("b", &["o/b"]))?;
        let settings = service.delete_preset("a")?;
        assert_eq!(settings.active_preset_id.as_deref(), Some("b"));
        Ok(())
    }

    #[test]
    fn deleting_only_preset_clears_everything() -> Result<()> {
        let store = MemoryStore::new();
        let mut service = SettingsService::load(Box::new(store.clone()));
        service.add_preset(preset("a", &["o/a"]))?;
        service.delete_preset("a")?;
        let persisted = stored(&store);
        assert!(persisted.filter_presets.is_empty());
        assert_eq!(persisted.active_preset_id, None);
        Ok(())
    }

    #[test]
    fn activating_unknown_preset_clears_pointer() -> Result<()> {
        let mut service = SettingsService::load(Box::new(MemoryStore::new()));
        service.add_preset(preset("a", &["o/a"]))?;
        let settings = service.set_active(Some("missing"))?;
        assert_eq!(settings.active_preset_id, None);
        Ok(())
    }

    #[test]
    fn time_input_mode_round_trips_through_store() -> Result<()> {
        let store = MemoryStore::new();
        let mut service = SettingsService::load(Box::new(store.clone()));
        service.set_time_input_mode(TimeInputMode::Duration)?;
        let raw = store.get(SETTINGS_KEY).expect("persisted");
        assert!(raw.contains("\"timeInputMode\":\"duration\""), "{raw}");
        let reloaded = SettingsService::load(Box::new(store));
        assert_eq!(reloaded.time_input_mode(), TimeInputMode::Duration);
        Ok(())
    }

    struct RejectingStore;

    impl SettingsStore for RejectingStore {
        fn read(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }

        fn write(&self, _key: &str, _value: &str) -> Result<()> {
            anyhow::bail!("disk full")
        }
    }

    #[test]
    fn failed_write_leaves_settings_untouched() {
        let mut service = SettingsService::load(Box::new(RejectingStore));
        assert!(service.add_preset(preset("a", &["o/a"])).is_err());
        assert!(service.presets().is_empty());
        assert_eq!(service.settings().active_preset_id, None);

        assert!(service.set_time_input_mode(TimeInputMode::Duration).is_err());
        assert_eq!(service.time_input_mode(), TimeInputMode::EndTime);
    }

    #[test]
    fn failed_write_keeps_previous_active_preset() -> Result<()> {
        let store = MemoryStore::new();
        let mut service = SettingsService::load(Box::new(store.clone()));
        service.add_preset(preset("a", &["o/a"]))?;
        service.add_preset(preset("b", &["o/b"]))?;
        let settings = service.settings().clone();

        let mut rejecting = SettingsService {
            store: Box::new(RejectingStore),
            settings,
        };
        assert!(rejecting.set_active(Some("a")).is_err());
        assert!(rejecting.delete_preset("b").is_err());
        assert_eq!(rejecting.settings().active_preset_id.as_deref(), Some("b"));
        assert_eq!(rejecting.presets().len(), 2);
        Ok(())
    }

    #[test]
    fn update_unknown_preset_fails() {
        let mut service = SettingsService::load(Box::new(MemoryStore::new()));
        let err = service.update_preset(preset("zzz", &["o/a"])).unwrap_err();
        assert_matches!(
            err.downcast_ref::<PresetError>(),
            Some(PresetError::UnknownPreset(_))
        );
    }

    #[test]
    fn state_cycles_through_all_values() {
        assert_eq!(IssueState::Open.next(), IssueState::Closed);
        assert_eq!(IssueState::Closed.next(), IssueState::All);
        assert_eq!(IssueState::All.next(), IssueState::Open);
        assert_eq!(IssueState::All.to_string(), "all");
    }
}
