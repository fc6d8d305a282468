use anyhow::{anyhow, Result};
use time::PrimitiveDateTime;
use unicode_segmentation::UnicodeSegmentation;

use crate::filter::{DraftFilter, FilterCriteria, FilterEdit, PresetReconciler};
use crate::message::{self, MessageKind};
use crate::settings::{FilterPreset, PresetError, TimeInputMode};
use crate::tasks::{AddOutcome, TaskItem, TaskLists, TaskTarget};
use crate::tracker::{matches_query, FetchOutcome, Issue, PullRequest, Repo};
use crate::worktime::WorkTimeCalculator;

const MAX_INPUT_LEN: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Filter,
    Results,
    Tasks,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResultTab {
    #[default]
    Issues,
    PullRequests,
}

#[derive(Debug, Clone, Default)]
pub struct SearchState {
    pub active: bool,
    pub query: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputPurpose {
    PresetName,
    Assignee,
    Reviewer,
    Labels,
    EndTime,
    Duration,
    CustomTask,
}

impl InputPurpose {
    pub fn title(self) -> &'static str {
        match self {
            InputPurpose::PresetName => "Save preset as",
            InputPurpose::Assignee => "Assignee",
            InputPurpose::Reviewer => "Reviewer",
            InputPurpose::Labels => "Labels (comma separated)",
            InputPurpose::EndTime => "End time (HH:MM)",
            InputPurpose::Duration => "Duration (hours)",
            InputPurpose::CustomTask => "Custom task (text or URL)",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextInputOverlay {
    pub purpose: InputPurpose,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct DeletePresetOverlay {
    pub preset_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct RepoPickerOverlay {
    pub filter: String,
    pub selected: usize,
}

#[derive(Debug, Clone)]
pub enum OverlayState {
    TextInput(TextInputOverlay),
    DeletePreset(DeletePresetOverlay),
    RepoPicker(RepoPickerOverlay),
}

/// What a submitted overlay changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub message: String,
    /// The fetch criteria moved, so results need reloading.
    pub refetch: bool,
}

impl SubmitOutcome {
    fn new(message: impl Into<String>, refetch: bool) -> Self {
        Self {
            message: message.into(),
            refetch,
        }
    }
}

pub struct AppState {
    pub focus: FocusPane,
    pub result_tab: ResultTab,
    pub task_target: TaskTarget,
    pub message_kind: MessageKind,
    pub search: SearchState,
    pub selected_result: usize,
    pub selected_task: usize,
    pub status_message: Option<String>,
    pub overlay: Option<OverlayState>,
    pub loading: bool,
    pub failed_repos: Vec<String>,
    reconciler: PresetReconciler,
    calculator: WorkTimeCalculator,
    tasks: TaskLists,
    repos: Vec<Repo>,
    issues: Vec<Issue>,
    pull_requests: Vec<PullRequest>,
}

impl AppState {
    pub fn new(reconciler: PresetReconciler, calculator: WorkTimeCalculator) -> Self {
        Self {
            focus: FocusPane::Results,
            result_tab: ResultTab::default(),
            task_target: TaskTarget::default(),
            message_kind: MessageKind::default(),
            search: SearchState::default(),
            selected_result: 0,
            selected_task: 0,
            status_message: None,
            overlay: None,
            loading: false,
            failed_repos: Vec::new(),
            reconciler,
            calculator,
            tasks: TaskLists::default(),
            repos: Vec::new(),
            issues: Vec::new(),
            pull_requests: Vec::new(),
        }
    }

    pub fn reconciler(&self) -> &PresetReconciler {
        &self.reconciler
    }

    pub fn draft(&self) -> &DraftFilter {
        self.reconciler.draft()
    }

    pub fn criteria(&self) -> FilterCriteria {
        self.reconciler.criteria()
    }

    pub fn active_preset(&self) -> Option<&FilterPreset> {
        self.reconciler.active_preset()
    }

    pub fn is_dirty(&self) -> bool {
        self.reconciler.is_dirty()
    }

    pub fn calculator(&self) -> &WorkTimeCalculator {
        &self.calculator
    }

    pub fn tasks(&self) -> &TaskLists {
        &self.tasks
    }

    pub fn repos(&self) -> &[Repo] {
        &self.repos
    }

    pub fn set_status_message<S: Into<String>>(&mut self, message: Option<S>) {
        self.status_message = message.map(Into::into);
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            FocusPane::Filter => FocusPane::Results,
            FocusPane::Results => FocusPane::Tasks,
            FocusPane::Tasks => FocusPane::Filter,
        };
    }

    pub fn switch_result_tab(&mut self) {
        self.result_tab = match self.result_tab {
            ResultTab::Issues => ResultTab::PullRequests,
            ResultTab::PullRequests => ResultTab::Issues,
        };
        self.selected_result = 0;
    }

    pub fn cycle_task_target(&mut self) {
        self.task_target = self.task_target.next();
        self.selected_task = 0;
    }

    pub fn message_text(&self) -> String {
        message::render(self.message_kind, self.calculator.end_time(), &self.tasks)
    }

    // Results

    /// Items on the current tab that pass the search query.
    pub fn visible_items(&self) -> Vec<TaskItem> {
        let query = self.search.query.as_str();
        match self.result_tab {
            ResultTab::Issues => self
                .issues
                .iter()
                .filter(|issue| matches_query(&issue.title, issue.number, query))
                .map(Issue::to_task_item)
                .collect(),
            ResultTab::PullRequests => self
                .pull_requests
                .iter()
                .filter(|pull| matches_query(&pull.title, pull.number, query))
                .map(PullRequest::to_task_item)
                .collect(),
        }
    }

    /// Filtered (issue, pull request) counts for the tab headers.
    pub fn result_counts(&self) -> (usize, usize) {
        let query = self.search.query.as_str();
        let issues = self
            .issues
            .iter()
            .filter(|issue| matches_query(&issue.title, issue.number, query))
            .count();
        let pulls = self
            .pull_requests
            .iter()
            .filter(|pull| matches_query(&pull.title, pull.number, query))
            .count();
        (issues, pulls)
    }

    pub fn move_selection(&mut self, delta: isize) {
        match self.focus {
            FocusPane::Results => {
                let len = self.visible_items().len();
                self.selected_result = step(self.selected_result, delta, len);
            }
            FocusPane::Tasks => {
                let len = self.tasks.list(self.task_target).len();
                self.selected_task = step(self.selected_task, delta, len);
            }
            FocusPane::Filter => {}
        }
    }

    pub fn apply_fetch_outcome(&mut self, outcome: FetchOutcome) {
        self.issues = outcome.issues;
        self.pull_requests = outcome.pull_requests;
        self.failed_repos = outcome.failed_repos;
        self.loading = false;
        self.clamp_selection();
    }

    pub fn set_repos(&mut self, repos: Vec<Repo>) {
        self.repos = repos;
    }

    pub fn add_selected_result(&mut self) -> Option<AddOutcome> {
        let item = self.visible_items().into_iter().nth(self.selected_result)?;
        Some(self.tasks.add(self.task_target, item))
    }

    pub fn add_custom_task(&mut self, text: &str) -> Option<AddOutcome> {
        let item = TaskItem::custom(text)?;
        Some(self.tasks.add(self.task_target, item))
    }

    pub fn remove_selected_task(&mut self) -> Option<TaskItem> {
        let id = self
            .tasks
            .list(self.task_target)
            .get(self.selected_task)?
            .id
            .clone();
        let removed = self.tasks.remove(self.task_target, &id);
        self.clamp_selection();
        removed
    }

    fn clamp_selection(&mut self) {
        let results = self.visible_items().len();
        self.selected_result = self.selected_result.min(results.saturating_sub(1));
        let tasks = self.tasks.list(self.task_target).len();
        self.selected_task = self.selected_task.min(tasks.saturating_sub(1));
    }

    // Search

    pub fn begin_search(&mut self) {
        self.search.active = true;
        self.focus = FocusPane::Results;
    }

    pub fn finish_search(&mut self) {
        self.search.active = false;
    }

    pub fn cancel_search(&mut self) {
        self.search.active = false;
        self.search.query.clear();
        self.clamp_selection();
    }

    pub fn push_search_char(&mut self, ch: char) {
        self.search.query.push(ch);
        self.selected_result = 0;
    }

    pub fn pop_search_char(&mut self) {
        pop_grapheme(&mut self.search.query);
        self.clamp_selection();
    }

    // Filter

    /// Applies one draft change; true when the fetch criteria changed.
    pub fn edit_filter(&mut self, edit: FilterEdit) -> bool {
        let before = self.reconciler.criteria();
        self.reconciler.edit(edit);
        !before.matches(&self.reconciler.criteria())
    }

    pub fn cycle_issue_state(&mut self) -> bool {
        let next = self.draft().state.next();
        self.edit_filter(FilterEdit::State(next))
    }

    pub fn toggle_assignee(&mut self) -> bool {
        let enabled = !self.draft().assignee.enabled;
        self.edit_filter(FilterEdit::AssigneeEnabled(enabled))
    }

    pub fn toggle_reviewer(&mut self) -> bool {
        let enabled = !self.draft().reviewer.enabled;
        self.edit_filter(FilterEdit::ReviewerEnabled(enabled))
    }

    pub fn toggle_labels(&mut self) -> bool {
        let enabled = !self.draft().labels.enabled;
        self.edit_filter(FilterEdit::LabelsEnabled(enabled))
    }

    /// Activates the preset after the current one, wrapping around.
    pub fn select_next_preset(&mut self) -> Result<Option<String>> {
        let presets = self.reconciler.presets();
        if presets.is_empty() {
            return Ok(None);
        }
        let next = match self.reconciler.active_preset() {
            Some(active) => presets
                .iter()
                .position(|preset| preset.id == active.id)
                .map_or(0, |idx| (idx + 1) % presets.len()),
            None => 0,
        };
        let id = presets[next].id.clone();
        let name = presets[next].name.clone();
        self.reconciler.select(Some(&id))?;
        Ok(Some(name))
    }

    pub fn clear_active_preset(&mut self) -> Result<()> {
        self.reconciler.select(None)?;
        Ok(())
    }

    pub fn update_active_preset(&mut self) -> Result<String> {
        self.reconciler.update()?;
        Ok(self
            .reconciler
            .active_preset()
            .map(|preset| preset.name.clone())
            .unwrap_or_default())
    }

    // Work time

    pub fn toggle_time_mode(&mut self) -> Result<TimeInputMode> {
        let mode = self.calculator.mode().toggled();
        self.calculator.set_mode(mode);
        self.reconciler.settings_mut().set_time_input_mode(mode)?;
        Ok(mode)
    }

    pub fn refresh_clock(&mut self, now: PrimitiveDateTime) {
        self.calculator.refresh(now);
    }

    // Overlays

    pub fn overlay(&self) -> Option<&OverlayState> {
        self.overlay.as_ref()
    }

    pub fn close_overlay(&mut self) {
        self.overlay = None;
    }

    /// Opens a text prompt seeded with the field's current value.
    pub fn open_input(&mut self, purpose: InputPurpose) {
        let draft = self.reconciler.draft();
        let value = match purpose {
            InputPurpose::PresetName | InputPurpose::CustomTask => String::new(),
            InputPurpose::Assignee => draft.assignee.text.clone(),
            InputPurpose::Reviewer => draft.reviewer.text.clone(),
            InputPurpose::Labels => draft.labels.text.clone(),
            InputPurpose::EndTime => self.calculator.end_time().to_string(),
            InputPurpose::Duration => self.calculator.duration_hours().to_string(),
        };
        self.overlay = Some(OverlayState::TextInput(TextInputOverlay { purpose, value }));
    }

    pub fn open_delete_preset(&mut self) -> bool {
        let Some(preset) = self.reconciler.active_preset() else {
            return false;
        };
        self.overlay = Some(OverlayState::DeletePreset(DeletePresetOverlay {
            preset_id: preset.id.clone(),
            name: preset.name.clone(),
        }));
        true
    }

    pub fn open_repo_picker(&mut self) {
        self.overlay = Some(OverlayState::RepoPicker(RepoPickerOverlay::default()));
    }

    pub fn text_input_overlay(&self) -> Option<&TextInputOverlay> {
        match self.overlay() {
            Some(OverlayState::TextInput(overlay)) => Some(overlay),
            _ => None,
        }
    }

    pub fn input_push_char(&mut self, ch: char) {
        match self.overlay.as_mut() {
            Some(OverlayState::TextInput(overlay)) => {
                if overlay.value.chars().count() < MAX_INPUT_LEN {
                    overlay.value.push(ch);
                }
            }
            Some(OverlayState::RepoPicker(picker)) => {
                picker.filter.push(ch);
                picker.selected = 0;
            }
            _ => {}
        }
    }

    pub fn input_pop_char(&mut self) {
        match self.overlay.as_mut() {
            Some(OverlayState::TextInput(overlay)) => pop_grapheme(&mut overlay.value),
            Some(OverlayState::RepoPicker(picker)) => {
                pop_grapheme(&mut picker.filter);
                picker.selected = 0;
            }
            _ => {}
        }
    }

    pub fn submit_input(&mut self) -> Result<SubmitOutcome> {
        let Some(OverlayState::TextInput(overlay)) = self.overlay.clone() else {
            return Err(anyhow!("no input is open"));
        };
        let value = overlay.value.trim().to_string();
        let outcome = match overlay.purpose {
            InputPurpose::PresetName => {
                self.reconciler.save_as_new(&value)?;
                SubmitOutcome::new(format!("Saved preset '{value}'"), false)
            }
            InputPurpose::Assignee => {
                let changed = self.set_toggle_text(
                    FilterEdit::AssigneeText(value.clone()),
                    FilterEdit::AssigneeEnabled(!value.is_empty()),
                );
                SubmitOutcome::new("Assignee updated", changed)
            }
            InputPurpose::Reviewer => {
                let changed = self.set_toggle_text(
                    FilterEdit::ReviewerText(value.clone()),
                    FilterEdit::ReviewerEnabled(!value.is_empty()),
                );
                SubmitOutcome::new("Reviewer updated", changed)
            }
            InputPurpose::Labels => {
                let changed = self.set_toggle_text(
                    FilterEdit::LabelsText(value.clone()),
                    FilterEdit::LabelsEnabled(!value.is_empty()),
                );
                SubmitOutcome::new("Labels updated", changed)
            }
            InputPurpose::EndTime => {
                let end = self.calculator.set_end_time(&value)?;
                SubmitOutcome::new(format!("End time set to {end}"), false)
            }
            InputPurpose::Duration => {
                let hours: f64 = value
                    .parse()
                    .map_err(|_| anyhow!("'{value}' is not a number of hours"))?;
                let end = self.calculator.set_duration(hours)?;
                SubmitOutcome::new(format!("Working until {end}"), false)
            }
            InputPurpose::CustomTask => match self.add_custom_task(&value) {
                Some(AddOutcome::Added) => {
                    SubmitOutcome::new(format!("Added to {}", self.task_target.label()), false)
                }
                Some(AddOutcome::Duplicate(target)) => {
                    SubmitOutcome::new(format!("Already in {}", target.label()), false)
                }
                None => return Err(anyhow!("task text cannot be empty")),
            },
        };
        self.overlay = None;
        Ok(outcome)
    }

    fn set_toggle_text(&mut self, text: FilterEdit, enabled: FilterEdit) -> bool {
        let text_changed = self.edit_filter(text);
        let toggle_changed = self.edit_filter(enabled);
        text_changed || toggle_changed
    }

    /// Deletes the preset named in the confirmation overlay; true when the draft was re-seeded.
    pub fn confirm_delete_preset(&mut self) -> Result<SubmitOutcome> {
        let Some(OverlayState::DeletePreset(overlay)) = self.overlay.clone() else {
            return Err(PresetError::NoActivePreset.into());
        };
        let before = self.reconciler.criteria();
        self.reconciler.delete(&overlay.preset_id)?;
        self.overlay = None;
        let refetch = !before.matches(&self.reconciler.criteria());
        Ok(SubmitOutcome::new(
            format!("Deleted preset '{}'", overlay.name),
            refetch,
        ))
    }

    /// Repositories in the picker, filtered by its search text, with their selection state.
    pub fn picker_rows(&self) -> Vec<(&str, bool)> {
        let filter = match self.overlay() {
            Some(OverlayState::RepoPicker(picker)) => picker.filter.to_lowercase(),
            _ => String::new(),
        };
        let selected = &self.reconciler.draft().repos;
        let mut rows: Vec<(&str, bool)> = self
            .repos
            .iter()
            .map(|repo| repo.full_name.as_str())
            .filter(|name| name.to_lowercase().contains(&filter))
            .map(|name| (name, selected.contains(name)))
            .collect();
        // Selected repos that the account listing does not include stay visible.
        for name in selected {
            if !rows.iter().any(|(row, _)| *row == name.as_str())
                && name.to_lowercase().contains(&filter)
            {
                rows.push((name.as_str(), true));
            }
        }
        rows
    }

    pub fn picker_move(&mut self, delta: isize) {
        let len = self.picker_rows().len();
        if let Some(OverlayState::RepoPicker(picker)) = self.overlay.as_mut() {
            picker.selected = step(picker.selected, delta, len);
        }
    }

    /// Toggles the highlighted repository; true when the criteria changed.
    pub fn picker_toggle(&mut self) -> bool {
        let selected = match self.overlay() {
            Some(OverlayState::RepoPicker(picker)) => picker.selected,
            _ => return false,
        };
        let Some(name) = self
            .picker_rows()
            .get(selected)
            .map(|(name, _)| name.to_string())
        else {
            return false;
        };
        self.edit_filter(FilterEdit::ToggleRepo(name))
    }
}

fn step(current: usize, delta: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let next = current as isize + delta;
    next.clamp(0, len as isize - 1) as usize
}

fn pop_grapheme(text: &mut String) {
    if let Some((idx, _)) = text.grapheme_indices(true).next_back() {
        text.truncate(idx);
    }
}
