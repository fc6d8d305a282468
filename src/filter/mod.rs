//! Draft filter editing and its reconciliation against the active preset.

use anyhow::Result;
use indexmap::IndexSet;

use crate::settings::{
    new_preset_id, normalize_login, FilterPreset, IssueState, PresetError, SavedSettings,
    SettingsService,
};

/// The normalised filter value: what gets compared, saved and fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    pub repos: IndexSet<String>,
    pub state: IssueState,
    pub assignee: Option<String>,
    pub reviewer: Option<String>,
    pub labels: IndexSet<String>,
}

impl FilterCriteria {
    pub fn from_preset(preset: &FilterPreset) -> Self {
        Self {
            repos: preset.repos.clone(),
            state: preset.state,
            assignee: normalize_login(preset.assignee.clone()),
            reviewer: normalize_login(preset.reviewer.clone()),
            labels: preset.labels.clone(),
        }
    }

    /// Field-by-field equality. Repositories and labels compare as sets.
    pub fn matches(&self, other: &FilterCriteria) -> bool {
        same_members(&self.repos, &other.repos)
            && self.state == other.state
            && self.assignee == other.assignee
            && self.reviewer == other.reviewer
            && same_members(&self.labels, &other.labels)
    }

    fn write_into(&self, preset: &mut FilterPreset) {
        preset.repos = self.repos.clone();
        preset.state = self.state;
        preset.assignee = self.assignee.clone();
        preset.reviewer = self.reviewer.clone();
        preset.labels = self.labels.clone();
    }
}

fn same_members(left: &IndexSet<String>, right: &IndexSet<String>) -> bool {
    left.len() == right.len() && left.iter().all(|item| right.contains(item))
}

/// Splits comma separated label input, dropping blanks and repeats.
pub fn parse_labels(raw: &str) -> IndexSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .collect()
}

/// A text input paired with its "enabled" checkbox.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToggleText {
    pub text: String,
    pub enabled: bool,
}

impl ToggleText {
    fn seeded(value: Option<&str>) -> Self {
        Self {
            text: value.unwrap_or_default().to_string(),
            enabled: value.is_some_and(|v| !v.trim().is_empty()),
        }
    }

    /// `None` whenever the checkbox is off, whatever text is left behind.
    pub fn value(&self) -> Option<String> {
        if self.enabled {
            normalize_login(Some(self.text.clone()))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftFilter {
    pub repos: IndexSet<String>,
    pub state: IssueState,
    pub assignee: ToggleText,
    pub reviewer: ToggleText,
    pub labels: ToggleText,
}

impl DraftFilter {
    pub fn from_preset(preset: &FilterPreset) -> Self {
        let labels = preset
            .labels
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            repos: preset.repos.clone(),
            state: preset.state,
            assignee: ToggleText::seeded(preset.assignee.as_deref()),
            reviewer: ToggleText::seeded(preset.reviewer.as_deref()),
            labels: ToggleText {
                enabled: !preset.labels.is_empty(),
                text: labels,
            },
        }
    }

    pub fn criteria(&self) -> FilterCriteria {
        FilterCriteria {
            repos: self.repos.clone(),
            state: self.state,
            assignee: self.assignee.value(),
            reviewer: self.reviewer.value(),
            labels: if self.labels.enabled {
                parse_labels(&self.labels.text)
            } else {
                IndexSet::new()
            },
        }
    }

    pub fn apply(&mut self, edit: FilterEdit) {
        match edit {
            FilterEdit::ToggleRepo(repo) => {
                if !self.repos.shift_remove(&repo) {
                    self.repos.insert(repo);
                }
            }
            FilterEdit::Repos(repos) => self.repos = repos.into_iter().collect(),
            FilterEdit::State(state) => self.state = state,
            FilterEdit::AssigneeText(text) => self.assignee.text = text,
            FilterEdit::AssigneeEnabled(enabled) => self.assignee.enabled = enabled,
            FilterEdit::ReviewerText(text) => self.reviewer.text = text,
            FilterEdit::ReviewerEnabled(enabled) => self.reviewer.enabled = enabled,
            FilterEdit::LabelsText(text) => self.labels.text = text,
            FilterEdit::LabelsEnabled(enabled) => self.labels.enabled = enabled,
        }
    }
}

/// One change to one draft field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterEdit {
    ToggleRepo(String),
    Repos(Vec<String>),
    State(IssueState),
    AssigneeText(String),
    AssigneeEnabled(bool),
    ReviewerText(String),
    ReviewerEnabled(bool),
    LabelsText(String),
    LabelsEnabled(bool),
}

/// Keeps the draft filter next to the stored presets and answers whether the draft
/// has drifted from the active one.
pub struct PresetReconciler {
    settings: SettingsService,
    draft: DraftFilter,
}

impl PresetReconciler {
    pub fn new(settings: SettingsService) -> Self {
        let draft = settings
            .active_preset()
            .map(DraftFilter::from_preset)
            .unwrap_or_default();
        Self { settings, draft }
    }

    pub fn settings(&self) -> &SettingsService {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut SettingsService {
        &mut self.settings
    }

    pub fn presets(&self) -> &[FilterPreset] {
        self.settings.presets()
    }

    pub fn active_preset(&self) -> Option<&FilterPreset> {
        self.settings.active_preset()
    }

    pub fn draft(&self) -> &DraftFilter {
        &self.draft
    }

    pub fn criteria(&self) -> FilterCriteria {
        self.draft.criteria()
    }

    /// Activates a preset (or none) and, when one matches, replaces the draft with it.
    pub fn select(&mut self, id: Option<&str>) -> Result<&SavedSettings> {
        self.settings.set_active(id)?;
        self.reseed_from_active();
        Ok(self.settings.settings())
    }

    /// Applies a single field change and reports the resulting dirty flag.
    pub fn edit(&mut self, edit: FilterEdit) -> bool {
        self.draft.apply(edit);
        self.is_dirty()
    }

    /// Always false without an active preset.
    pub fn is_dirty(&self) -> bool {
        match self.active_preset() {
            Some(preset) => !self
                .draft
                .criteria()
                .matches(&FilterCriteria::from_preset(preset)),
            None => false,
        }
    }

    pub fn can_save_as_new(&self, name: &str) -> bool {
        !name.trim().is_empty() && !self.draft.repos.is_empty()
    }

    pub fn can_update(&self) -> bool {
        self.active_preset()
            .is_some_and(|preset| !preset.name.trim().is_empty())
    }

    pub fn save_as_new(&mut self, name: &str) -> Result<&SavedSettings> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PresetError::EmptyName.into());
        }
        if self.draft.repos.is_empty() {
            return Err(PresetError::NoRepositories.into());
        }
        let mut preset = FilterPreset {
            id: new_preset_id(),
            name: name.to_string(),
            repos: IndexSet::new(),
            state: IssueState::default(),
            assignee: None,
            reviewer: None,
            labels: IndexSet::new(),
        };
        self.draft.criteria().write_into(&mut preset);
        self.settings.add_preset(preset)
    }

    /// Overwrites the active preset's criteria with the draft, keeping its id and name.
    pub fn update(&mut self) -> Result<&SavedSettings> {
        let Some(active) = self.active_preset() else {
            return Err(PresetError::NoActivePreset.into());
        };
        if active.name.trim().is_empty() {
            return Err(PresetError::EmptyName.into());
        }
        let mut preset = active.clone();
        self.draft.criteria().write_into(&mut preset);
        self.settings.update_preset(preset)
    }

    pub fn delete(&mut self, id: &str) -> Result<&SavedSettings> {
        let previous = self.settings.settings().active_preset_id.clone();
        self.settings.delete_preset(id)?;
        if self.settings.settings().active_preset_id != previous {
            self.reseed_from_active();
        }
        Ok(self.settings.settings())
    }

    fn reseed_from_active(&mut self) {
        if let Some(preset) = self.settings.active_preset() {
            self.draft = DraftFilter::from_preset(preset);
        }
    }
}
