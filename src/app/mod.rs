use std::io::Stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::widgets::ListState;
use ratatui::Terminal;

use crate::config::AppConfig;
use crate::filter::PresetReconciler;
use crate::message::MessageKind;
use crate::settings::{SettingsService, TimeInputMode};
use crate::tasks::AddOutcome;
use crate::tracker::fetch::FetchEvent;
use crate::tracker::{FetchCoordinator, TrackerApi};
use crate::ui;
use crate::worktime::{Clock, WorkTimeCalculator};

pub mod actions;
pub mod state;

use self::actions::ActionDispatcher;
pub use state::{AppState, FocusPane, InputPurpose, OverlayState, ResultTab};

enum Action {
    Quit,
    SelectNext,
    SelectPrevious,
    ToggleFocus,
    SwitchResultTab,
    StartSearch,
    AddSelected,
    AddCustom,
    RemoveTask,
    CycleTarget,
    ShowMessage(MessageKind),
    CopyMessage,
    ToggleTimeMode,
    EditTime,
    PickRepos,
    CycleState,
    EditAssignee,
    ToggleAssignee,
    EditReviewer,
    ToggleReviewer,
    EditLabels,
    ToggleLabels,
    NextPreset,
    ClearPreset,
    SavePreset,
    UpdatePreset,
    DeletePreset,
    Reload,
}

pub struct App {
    pub config: Arc<AppConfig>,
    state: AppState,
    results_state: ListState,
    tasks_state: ListState,
    fetcher: FetchCoordinator,
    clock: Arc<dyn Clock>,
    should_quit: bool,
    tick_rate: Duration,
    refresh_interval: Duration,
    last_clock_refresh: Instant,
}

impl App {
    pub fn new(
        config: Arc<AppConfig>,
        settings: SettingsService,
        api: Arc<dyn TrackerApi>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let calculator = WorkTimeCalculator::new(
            clock.now(),
            settings.time_input_mode(),
            config.work_time.end_time(),
        );
        let mut state = AppState::new(PresetReconciler::new(settings), calculator);
        let mut fetcher = FetchCoordinator::spawn(api).context("starting fetch worker")?;
        {
            let mut dispatcher = ActionDispatcher::new(&mut fetcher);
            dispatcher.load_repos();
            dispatcher.refetch(&mut state);
        }
        if let Some(preset) = state.active_preset() {
            let message = format!("Preset '{}' active", preset.name);
            state.set_status_message(Some(message));
        }
        Ok(Self {
            tick_rate: config.ui.tick_rate(),
            refresh_interval: config.work_time.refresh_interval(),
            config,
            state,
            results_state: ListState::default(),
            tasks_state: ListState::default(),
            fetcher,
            clock,
            should_quit: false,
            last_clock_refresh: Instant::now(),
        })
    }

    pub fn run(&mut self) -> Result<()> {
        let mut terminal = setup_terminal()?;
        let result = self.event_loop(&mut terminal);
        restore_terminal(&mut terminal)?;
        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        loop {
            terminal
                .draw(|frame| {
                    ui::draw_app(
                        frame,
                        &self.state,
                        &mut self.results_state,
                        &mut self.tasks_state,
                    );
                })
                .context("rendering frame")?;

            if self.should_quit {
                break;
            }

            let timeout = self
                .tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(0));

            if event::poll(timeout).context("polling for terminal events")? {
                if let Event::Key(key) = event::read().context("reading terminal event")? {
                    self.handle_key(key);
                }
            }

            if last_tick.elapsed() >= self.tick_rate {
                self.on_tick();
                last_tick = Instant::now();
            }
        }
        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }

        if self.handle_overlay_key(key) {
            return;
        }

        if self.state.search.active {
            match key.code {
                KeyCode::Esc => {
                    self.state.cancel_search();
                    return;
                }
                KeyCode::Enter => {
                    self.state.finish_search();
                    return;
                }
                KeyCode::Backspace => {
                    self.state.pop_search_char();
                    return;
                }
                KeyCode::Char(ch) if !has_command_modifier(&key) => {
                    self.state.push_search_char(ch);
                    return;
                }
                _ => {}
            }
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) {
            let action = match key.code {
                KeyCode::Char('c') => Some(Action::Quit),
                KeyCode::Char('r') => Some(Action::Reload),
                _ => None,
            };
            if let Some(action) = action {
                self.handle_action(action);
            }
            return;
        }

        let action = match key.code {
            KeyCode::Char('q') => Some(Action::Quit),
            KeyCode::Char('j') | KeyCode::Down => Some(Action::SelectNext),
            KeyCode::Char('k') | KeyCode::Up => Some(Action::SelectPrevious),
            KeyCode::Tab => Some(Action::ToggleFocus),
            KeyCode::Left | KeyCode::Right => Some(Action::SwitchResultTab),
            KeyCode::Char('/') => Some(Action::StartSearch),
            KeyCode::Enter => Some(Action::AddSelected),
            KeyCode::Char('c') => Some(Action::AddCustom),
            KeyCode::Char('x') | KeyCode::Delete => Some(Action::RemoveTask),
            KeyCode::Char('t') => Some(Action::CycleTarget),
            KeyCode::Char('1') => Some(Action::ShowMessage(MessageKind::Start)),
            KeyCode::Char('2') => Some(Action::ShowMessage(MessageKind::End)),
            KeyCode::Char('y') => Some(Action::CopyMessage),
            KeyCode::Char('m') => Some(Action::ToggleTimeMode),
            KeyCode::Char('e') => Some(Action::EditTime),
            KeyCode::Char('r') => Some(Action::PickRepos),
            KeyCode::Char('s') => Some(Action::CycleState),
            KeyCode::Char('a') => Some(Action::EditAssignee),
            KeyCode::Char('A') => Some(Action::ToggleAssignee),
            KeyCode::Char('v') => Some(Action::EditReviewer),
            KeyCode::Char('V') => Some(Action::ToggleReviewer),
            KeyCode::Char('l') => Some(Action::EditLabels),
            KeyCode::Char('L') => Some(Action::ToggleLabels),
            KeyCode::Char('p') => Some(Action::NextPreset),
            KeyCode::Char('P') => Some(Action::ClearPreset),
            KeyCode::Char('n') => Some(Action::SavePreset),
            KeyCode::Char('u') => Some(Action::UpdatePreset),
            KeyCode::Char('D') => Some(Action::DeletePreset),
            _ => None,
        };

        if let Some(action) = action {
            self.handle_action(action);
        }
    }

    fn handle_action(&mut self, action: Action) {
        match action {
            Action::Quit => self.should_quit = true,
            Action::SelectNext => self.state.move_selection(1),
            Action::SelectPrevious => self.state.move_selection(-1),
            Action::ToggleFocus => self.state.toggle_focus(),
            Action::SwitchResultTab => self.state.switch_result_tab(),
            Action::StartSearch => self.state.begin_search(),
            Action::AddSelected => self.handle_add_selected(),
            Action::AddCustom => {
                self.state.open_input(InputPurpose::CustomTask);
            }
            Action::RemoveTask => {
                if self.state.focus != FocusPane::Tasks {
                    self.state
                        .set_status_message(Some("Focus the task list (Tab) to remove items"));
                } else if let Some(task) = self.state.remove_selected_task() {
                    self.state
                        .set_status_message(Some(format!("Removed {}", task.title)));
                }
            }
            Action::CycleTarget => {
                self.state.cycle_task_target();
                let label = self.state.task_target.label();
                self.state
                    .set_status_message(Some(format!("Adding to {label}")));
            }
            Action::ShowMessage(kind) => self.state.message_kind = kind,
            Action::CopyMessage => self.handle_copy_message(),
            Action::ToggleTimeMode => match self.state.toggle_time_mode() {
                Ok(TimeInputMode::EndTime) => {
                    self.state.set_status_message(Some("Entering end time"));
                }
                Ok(TimeInputMode::Duration) => {
                    self.state.set_status_message(Some("Entering duration"));
                }
                Err(err) => {
                    tracing::error!(?err, "failed to persist time input mode");
                    self.state
                        .set_status_message(Some("Failed to save time input mode"));
                }
            },
            Action::EditTime => {
                let purpose = match self.state.calculator().mode() {
                    TimeInputMode::EndTime => InputPurpose::EndTime,
                    TimeInputMode::Duration => InputPurpose::Duration,
                };
                self.state.open_input(purpose);
            }
            Action::PickRepos => {
                if self.state.repos().is_empty() {
                    ActionDispatcher::new(&mut self.fetcher).load_repos();
                }
                self.state.open_repo_picker();
            }
            Action::CycleState => {
                let changed = self.state.cycle_issue_state();
                self.after_filter_edit(changed);
            }
            Action::EditAssignee => self.state.open_input(InputPurpose::Assignee),
            Action::ToggleAssignee => {
                let changed = self.state.toggle_assignee();
                self.after_filter_edit(changed);
            }
            Action::EditReviewer => self.state.open_input(InputPurpose::Reviewer),
            Action::ToggleReviewer => {
                let changed = self.state.toggle_reviewer();
                self.after_filter_edit(changed);
            }
            Action::EditLabels => self.state.open_input(InputPurpose::Labels),
            Action::ToggleLabels => {
                let changed = self.state.toggle_labels();
                self.after_filter_edit(changed);
            }
            Action::NextPreset => match self.state.select_next_preset() {
                Ok(Some(name)) => {
                    self.state
                        .set_status_message(Some(format!("Preset '{name}' active")));
                    self.refetch();
                }
                Ok(None) => {
                    self.state
                        .set_status_message(Some("No presets saved yet (n to save one)"));
                }
                Err(err) => {
                    tracing::error!(?err, "failed to select preset");
                    self.state.set_status_message(Some("Failed to select preset"));
                }
            },
            Action::ClearPreset => {
                if let Err(err) = self.state.clear_active_preset() {
                    tracing::error!(?err, "failed to clear active preset");
                    self.state
                        .set_status_message(Some("Failed to clear active preset"));
                } else {
                    self.state.set_status_message(Some("No preset active"));
                }
            }
            Action::SavePreset => {
                if self.state.draft().repos.is_empty() {
                    self.state
                        .set_status_message(Some("Pick at least one repository first"));
                } else {
                    self.state.open_input(InputPurpose::PresetName);
                }
            }
            Action::UpdatePreset if !self.state.reconciler().can_update() => {
                self.state.set_status_message(Some("No preset active"));
            }
            Action::UpdatePreset if !self.state.is_dirty() => {
                self.state.set_status_message(Some("Preset unchanged"));
            }
            Action::UpdatePreset => match self.state.update_active_preset() {
                Ok(name) => {
                    self.state
                        .set_status_message(Some(format!("Updated preset '{name}'")));
                }
                Err(err) => {
                    tracing::warn!(?err, "preset update rejected");
                    self.state.set_status_message(Some(format!("{err}")));
                }
            },
            Action::DeletePreset => {
                if !self.state.open_delete_preset() {
                    self.state.set_status_message(Some("No preset active"));
                }
            }
            Action::Reload => {
                ActionDispatcher::new(&mut self.fetcher).load_repos();
                self.refetch();
                self.state.set_status_message(Some("Reloading"));
            }
        }
    }

    fn on_tick(&mut self) {
        if self.last_clock_refresh.elapsed() >= self.refresh_interval {
            self.state.refresh_clock(self.clock.now());
            self.last_clock_refresh = Instant::now();
        }

        for event in self.fetcher.poll() {
            match event {
                FetchEvent::Items(outcome) => {
                    let failed = outcome.failed_repos.len();
                    self.state.apply_fetch_outcome(outcome);
                    if failed > 0 {
                        self.state.set_status_message(Some(format!(
                            "{failed} repositories failed to load (see log)"
                        )));
                    }
                }
                FetchEvent::Repos(repos) => self.state.set_repos(repos),
                FetchEvent::ReposFailed(message) => {
                    self.state.set_status_message(Some(format!(
                        "Could not list repositories: {message}"
                    )));
                }
            }
        }
        self.state.loading = self.fetcher.is_loading();
    }

    fn handle_overlay_key(&mut self, key: KeyEvent) -> bool {
        match self.state.overlay() {
            Some(OverlayState::TextInput(_)) => {
                match key.code {
                    KeyCode::Esc => {
                        self.state.close_overlay();
                        self.state.set_status_message(Some("Canceled"));
                    }
                    KeyCode::Enter => match self.state.submit_input() {
                        Ok(outcome) => {
                            self.state.set_status_message(Some(outcome.message));
                            if outcome.refetch {
                                self.refetch();
                            }
                        }
                        Err(err) => {
                            tracing::debug!(?err, "input rejected");
                            self.state.set_status_message(Some(format!("{err}")));
                        }
                    },
                    KeyCode::Backspace => self.state.input_pop_char(),
                    KeyCode::Char(ch) if !has_command_modifier(&key) => {
                        self.state.input_push_char(ch);
                    }
                    _ => {}
                }
                true
            }
            Some(OverlayState::DeletePreset(_)) => {
                match key.code {
                    KeyCode::Esc => {
                        self.state.close_overlay();
                        self.state.set_status_message(Some("Delete canceled"));
                    }
                    KeyCode::Enter | KeyCode::Char('y') => {
                        match self.state.confirm_delete_preset() {
                            Ok(outcome) => {
                                self.state.set_status_message(Some(outcome.message));
                                if outcome.refetch {
                                    self.refetch();
                                }
                            }
                            Err(err) => {
                                tracing::error!(?err, "failed to delete preset");
                                self.state.close_overlay();
                                self.state
                                    .set_status_message(Some("Failed to delete preset"));
                            }
                        }
                    }
                    _ => {}
                }
                true
            }
            Some(OverlayState::RepoPicker(_)) => {
                match key.code {
                    KeyCode::Esc | KeyCode::Enter => self.state.close_overlay(),
                    KeyCode::Down => self.state.picker_move(1),
                    KeyCode::Up => self.state.picker_move(-1),
                    KeyCode::Char(' ') => {
                        let changed = self.state.picker_toggle();
                        self.after_filter_edit(changed);
                    }
                    KeyCode::Backspace => self.state.input_pop_char(),
                    KeyCode::Char(ch) if !has_command_modifier(&key) => {
                        self.state.input_push_char(ch);
                    }
                    _ => {}
                }
                true
            }
            None => false,
        }
    }

    fn handle_add_selected(&mut self) {
        if self.state.focus != FocusPane::Results {
            return;
        }
        let target = self.state.task_target.label();
        match self.state.add_selected_result() {
            Some(AddOutcome::Added) => {
                self.state
                    .set_status_message(Some(format!("Added to {target}")));
            }
            Some(AddOutcome::Duplicate(existing)) => {
                self.state
                    .set_status_message(Some(format!("Already in {}", existing.label())));
            }
            None => {}
        }
    }

    fn handle_copy_message(&mut self) {
        let dispatcher = ActionDispatcher::new(&mut self.fetcher);
        match dispatcher.copy_message(&self.state) {
            Ok(()) => self.state.set_status_message(Some("Message copied")),
            Err(err) => {
                tracing::error!(?err, "failed to copy message");
                self.state
                    .set_status_message(Some("Clipboard unavailable"));
            }
        }
    }

    fn after_filter_edit(&mut self, criteria_changed: bool) {
        if criteria_changed {
            self.refetch();
        }
    }

    fn refetch(&mut self) {
        ActionDispatcher::new(&mut self.fetcher).refetch(&mut self.state);
    }
}

fn has_command_modifier(key: &KeyEvent) -> bool {
    key.modifiers
        .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER)
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen).context("switching to alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("creating terminal backend")?;
    terminal.hide_cursor().context("hiding cursor")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    terminal.show_cursor().ok();
    disable_raw_mode().context("disabling raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen).context("restoring screen state")?;
    Ok(())
}
