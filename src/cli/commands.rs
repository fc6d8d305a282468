use std::fmt::Write as _;
use std::io::{self, Read};

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use time::PrimitiveDateTime;

use crate::app::actions::copy_to_clipboard;
use crate::app::App;
use crate::config::AppConfig;
use crate::filter::{FilterCriteria, FilterEdit, PresetReconciler};
use crate::message::{self, MessageKind};
use crate::settings::{FilterPreset, IssueState, PresetError, SettingsService, TimeInputMode};
use crate::tasks::{TaskItem, TaskLists, TaskTarget};
use crate::tracker::fetch::fetch_items;
use crate::tracker::{matches_query, Repo, TrackerApi};
use crate::worktime::{Clock, WorkTimeCalculator};

#[derive(Subcommand, Debug, Clone)]
pub enum PresetCommand {
    /// List saved presets; the active one is marked with `*`
    List,
    /// Show the criteria stored in a preset
    Show(PresetIdArgs),
    /// Make a preset the active one
    Select(PresetIdArgs),
    /// Deactivate the current preset
    Clear,
    /// Save a new preset and make it active
    Save(SavePresetArgs),
    /// Overwrite a preset's criteria (the active one unless --preset is given)
    Update(UpdatePresetArgs),
    /// Delete a preset
    Delete(PresetIdArgs),
}

#[derive(Args, Debug, Clone)]
pub struct PresetIdArgs {
    #[arg()]
    pub id: String,
}

#[derive(Args, Debug, Clone)]
pub struct SavePresetArgs {
    /// Display name for the preset
    #[arg()]
    pub name: String,
    /// Repository in owner/name form (repeatable)
    #[arg(long = "repo", required = true)]
    pub repos: Vec<String>,
    /// Issue state: open, closed or all
    #[arg(long)]
    pub state: Option<IssueState>,
    #[arg(long)]
    pub assignee: Option<String>,
    /// Only pull requests awaiting review from this login
    #[arg(long)]
    pub reviewer: Option<String>,
    /// Required label (repeatable)
    #[arg(long = "label")]
    pub labels: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct UpdatePresetArgs {
    /// Preset to update instead of the active one
    #[arg(long)]
    pub preset: Option<String>,
    /// Replace the repository list (repeatable)
    #[arg(long = "repo")]
    pub repos: Vec<String>,
    #[arg(long)]
    pub state: Option<IssueState>,
    #[arg(long, conflicts_with = "clear_assignee")]
    pub assignee: Option<String>,
    #[arg(long)]
    pub clear_assignee: bool,
    #[arg(long, conflicts_with = "clear_reviewer")]
    pub reviewer: Option<String>,
    #[arg(long)]
    pub clear_reviewer: bool,
    /// Replace the label list (repeatable)
    #[arg(long = "label", conflicts_with = "clear_labels")]
    pub labels: Vec<String>,
    #[arg(long)]
    pub clear_labels: bool,
}

#[derive(Args, Debug, Clone)]
pub struct MessageArgs {
    /// Which message to print: start or end
    #[arg(default_value = "start")]
    pub kind: MessageKind,
    /// Planned end of work (HH:MM)
    #[arg(long, conflicts_with = "duration")]
    pub end_time: Option<String>,
    /// Planned working hours from now
    #[arg(long)]
    pub duration: Option<f64>,
    /// Task for the start message (repeatable; URLs are kept as links)
    #[arg(long)]
    pub todo: Vec<String>,
    /// Finished task for the end message (repeatable)
    #[arg(long)]
    pub done: Vec<String>,
    /// Note for tomorrow in the end message (repeatable)
    #[arg(long)]
    pub next: Vec<String>,
    /// Copy the message to the clipboard as well
    #[arg(long)]
    pub copy: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ItemsArgs {
    /// Preset to use instead of the active one
    #[arg(long)]
    pub preset: Option<String>,
    /// Only items whose title or number contains this text
    #[arg(long)]
    pub query: Option<String>,
}

pub fn run_tui(app: &mut App) -> Result<()> {
    app.run()
}

pub fn handle_preset_command(settings: SettingsService, command: PresetCommand) -> Result<()> {
    let mut reconciler = PresetReconciler::new(settings);
    let output = run_preset_command(&mut reconciler, command)?;
    print!("{output}");
    Ok(())
}

fn run_preset_command(reconciler: &mut PresetReconciler, command: PresetCommand) -> Result<String> {
    match command {
        PresetCommand::List => Ok(format_presets(reconciler)),
        PresetCommand::Show(args) => {
            let preset = find_preset(reconciler, &args.id)?;
            Ok(format_preset_details(preset))
        }
        PresetCommand::Select(args) => {
            let name = find_preset(reconciler, &args.id)?.name.clone();
            reconciler.select(Some(&args.id))?;
            Ok(format!("Active preset: {name}\n"))
        }
        PresetCommand::Clear => {
            reconciler.select(None)?;
            Ok("No preset active\n".to_string())
        }
        PresetCommand::Save(args) => save_preset(reconciler, args),
        PresetCommand::Update(args) => update_preset(reconciler, args),
        PresetCommand::Delete(args) => {
            let name = find_preset(reconciler, &args.id)?.name.clone();
            let settings = reconciler.delete(&args.id)?;
            let mut out = format!("Deleted preset {name}\n");
            match settings.active_preset() {
                Some(active) => {
                    let _ = writeln!(&mut out, "Active preset: {}", active.name);
                }
                None => out.push_str("No preset active\n"),
            }
            Ok(out)
        }
    }
}

fn find_preset<'a>(reconciler: &'a PresetReconciler, id: &str) -> Result<&'a FilterPreset> {
    reconciler
        .settings()
        .settings()
        .preset(id)
        .ok_or_else(|| PresetError::UnknownPreset(id.to_string()).into())
}

fn save_preset(reconciler: &mut PresetReconciler, args: SavePresetArgs) -> Result<String> {
    reconciler.edit(FilterEdit::Repos(args.repos));
    reconciler.edit(FilterEdit::State(args.state.unwrap_or_default()));
    set_login(reconciler, LoginField::Assignee, args.assignee);
    set_login(reconciler, LoginField::Reviewer, args.reviewer);
    set_labels(reconciler, args.labels);

    let settings = reconciler.save_as_new(&args.name)?;
    let Some(preset) = settings.active_preset() else {
        bail!("saved preset is not active");
    };
    Ok(format!("Saved preset {} ({})\n", preset.name, preset.id))
}

fn update_preset(reconciler: &mut PresetReconciler, args: UpdatePresetArgs) -> Result<String> {
    if let Some(id) = &args.preset {
        find_preset(reconciler, id)?;
        reconciler.select(Some(id))?;
    }
    if reconciler.active_preset().is_none() {
        return Err(PresetError::NoActivePreset.into());
    }

    if !args.repos.is_empty() {
        reconciler.edit(FilterEdit::Repos(args.repos));
    }
    if let Some(state) = args.state {
        reconciler.edit(FilterEdit::State(state));
    }
    if args.clear_assignee {
        reconciler.edit(FilterEdit::AssigneeEnabled(false));
    } else if args.assignee.is_some() {
        set_login(reconciler, LoginField::Assignee, args.assignee);
    }
    if args.clear_reviewer {
        reconciler.edit(FilterEdit::ReviewerEnabled(false));
    } else if args.reviewer.is_some() {
        set_login(reconciler, LoginField::Reviewer, args.reviewer);
    }
    if args.clear_labels {
        reconciler.edit(FilterEdit::LabelsEnabled(false));
    } else if !args.labels.is_empty() {
        set_labels(reconciler, args.labels);
    }

    if !reconciler.is_dirty() {
        let name = reconciler
            .active_preset()
            .map(|preset| preset.name.clone())
            .unwrap_or_default();
        return Ok(format!("Preset {name} unchanged\n"));
    }
    let settings = reconciler.update()?;
    let Some(preset) = settings.active_preset() else {
        return Err(PresetError::NoActivePreset.into());
    };
    Ok(format!("Updated preset {}\n", preset.name))
}

enum LoginField {
    Assignee,
    Reviewer,
}

fn set_login(reconciler: &mut PresetReconciler, field: LoginField, login: Option<String>) {
    let text = login.unwrap_or_default();
    let enabled = !text.trim().is_empty();
    match field {
        LoginField::Assignee => {
            reconciler.edit(FilterEdit::AssigneeText(text));
            reconciler.edit(FilterEdit::AssigneeEnabled(enabled));
        }
        LoginField::Reviewer => {
            reconciler.edit(FilterEdit::ReviewerText(text));
            reconciler.edit(FilterEdit::ReviewerEnabled(enabled));
        }
    }
}

fn set_labels(reconciler: &mut PresetReconciler, labels: Vec<String>) {
    let enabled = !labels.is_empty();
    reconciler.edit(FilterEdit::LabelsText(labels.join(", ")));
    reconciler.edit(FilterEdit::LabelsEnabled(enabled));
}

fn format_presets(reconciler: &PresetReconciler) -> String {
    let presets = reconciler.presets();
    if presets.is_empty() {
        return "No presets saved.\n".to_string();
    }
    let active = reconciler.active_preset().map(|preset| preset.id.as_str());
    let mut out = String::new();
    for preset in presets {
        let marker = if Some(preset.id.as_str()) == active {
            "*"
        } else {
            " "
        };
        let _ = writeln!(&mut out, "{marker} {}  {}", preset.id, preset.name);
        let _ = writeln!(&mut out, "    repos  {}", join(preset.repos.iter()));
    }
    out
}

fn format_preset_details(preset: &FilterPreset) -> String {
    let mut out = String::new();
    let _ = writeln!(&mut out, "{} ({})", preset.name, preset.id);
    let _ = writeln!(&mut out, "  repos     {}", join(preset.repos.iter()));
    let _ = writeln!(&mut out, "  state     {}", preset.state);
    let _ = writeln!(
        &mut out,
        "  assignee  {}",
        preset.assignee.as_deref().unwrap_or("-")
    );
    let _ = writeln!(
        &mut out,
        "  reviewer  {}",
        preset.reviewer.as_deref().unwrap_or("-")
    );
    let labels = if preset.labels.is_empty() {
        "-".to_string()
    } else {
        join(preset.labels.iter())
    };
    let _ = writeln!(&mut out, "  labels    {labels}");
    out
}

fn join<'a>(values: impl Iterator<Item = &'a String>) -> String {
    values.map(String::as_str).collect::<Vec<_>>().join(", ")
}

pub fn print_message(config: &AppConfig, clock: &dyn Clock, mut args: MessageArgs) -> Result<()> {
    if args.todo.is_empty() && args.done.is_empty() && args.next.is_empty() {
        if let Some(input) = read_stdin()? {
            let lines = input.lines().map(str::to_string);
            match args.kind {
                MessageKind::Start => args.todo.extend(lines),
                MessageKind::End => args.done.extend(lines),
            }
        }
    }
    let copy = args.copy;
    let text = render_message(config, clock.now(), args)?;
    println!("{text}");
    if copy {
        copy_to_clipboard(&text)?;
        eprintln!("Copied to clipboard.");
    }
    Ok(())
}

fn render_message(config: &AppConfig, now: PrimitiveDateTime, args: MessageArgs) -> Result<String> {
    let mut calculator = WorkTimeCalculator::new(
        now,
        TimeInputMode::EndTime,
        config.work_time.end_time(),
    );
    if let Some(raw) = &args.end_time {
        calculator.set_end_time(raw)?;
    }
    if let Some(hours) = args.duration {
        calculator.set_mode(TimeInputMode::Duration);
        calculator.set_duration(hours)?;
    }

    let mut lists = TaskLists::default();
    for (target, entries) in [
        (TaskTarget::Todo, &args.todo),
        (TaskTarget::Done, &args.done),
        (TaskTarget::Next, &args.next),
    ] {
        for entry in entries {
            if let Some(item) = TaskItem::custom(entry) {
                lists.add(target, item);
            }
        }
    }
    Ok(message::render(args.kind, calculator.end_time(), &lists))
}

pub fn list_repos(api: &dyn TrackerApi) -> Result<()> {
    let repos = api.list_repos().context("listing repositories")?;
    print!("{}", format_repos(&repos));
    Ok(())
}

fn format_repos(repos: &[Repo]) -> String {
    if repos.is_empty() {
        return "No repositories found.\n".to_string();
    }
    let mut out = String::new();
    for repo in repos {
        let _ = writeln!(&mut out, "{}", repo.full_name);
    }
    out
}

pub fn list_items(settings: SettingsService, api: &dyn TrackerApi, args: ItemsArgs) -> Result<()> {
    let output = collect_items(&settings, api, &args)?;
    print!("{output}");
    Ok(())
}

fn collect_items(settings: &SettingsService, api: &dyn TrackerApi, args: &ItemsArgs) -> Result<String> {
    let preset = match &args.preset {
        Some(id) => settings
            .settings()
            .preset(id)
            .ok_or_else(|| PresetError::UnknownPreset(id.clone()))?,
        None => settings
            .active_preset()
            .ok_or(PresetError::NoActivePreset)?,
    };
    let criteria = FilterCriteria::from_preset(preset);
    let Some(outcome) = fetch_items(api, &criteria, 0, &|| false) else {
        bail!("fetch was interrupted");
    };
    let query = args.query.as_deref().unwrap_or_default();

    let issues: Vec<TaskItem> = outcome
        .issues
        .iter()
        .filter(|issue| matches_query(&issue.title, issue.number, query))
        .map(|issue| issue.to_task_item())
        .collect();
    let pulls: Vec<TaskItem> = outcome
        .pull_requests
        .iter()
        .filter(|pull| matches_query(&pull.title, pull.number, query))
        .map(|pull| pull.to_task_item())
        .collect();

    let mut out = String::new();
    write_section(&mut out, "Issues", &issues);
    write_section(&mut out, "Pull requests", &pulls);
    if !outcome.failed_repos.is_empty() {
        let _ = writeln!(
            &mut out,
            "Failed to load: {}",
            join(outcome.failed_repos.iter())
        );
    }
    Ok(out)
}

fn write_section(out: &mut String, heading: &str, items: &[TaskItem]) {
    let _ = writeln!(out, "{heading} ({})", items.len());
    for item in items {
        let repo = item.repo_full_name.as_deref().unwrap_or_default();
        let _ = writeln!(out, "  {repo}  {}", item.title);
        let _ = writeln!(out, "    {}", item.reference());
    }
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(Some(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigLoader, ConfigPaths};
    use crate::settings::{parse_settings, SETTINGS_KEY};
    use crate::storage::{self, MemoryStore};
    use crate::tracker::{Issue, PullRequest, User};
    use assert_matches::assert_matches;
    use tempfile::TempDir;
    use time::macros::datetime;

    type TestResult<T = ()> = Result<T>;

    fn reconciler() -> (MemoryStore, PresetReconciler) {
        let store = MemoryStore::new();
        let settings = SettingsService::load(Box::new(store.clone()));
        (store, PresetReconciler::new(settings))
    }

    fn save_args(name: &str, repos: &[&str]) -> SavePresetArgs {
        SavePresetArgs {
            name: name.to_string(),
            repos: repos.iter().map(|r| r.to_string()).collect(),
            state: None,
            assignee: None,
            reviewer: None,
            labels: Vec::new(),
        }
    }

    fn update_args() -> UpdatePresetArgs {
        UpdatePresetArgs {
            preset: None,
            repos: Vec::new(),
            state: None,
            assignee: None,
            clear_assignee: false,
            reviewer: None,
            clear_reviewer: false,
            labels: Vec::new(),
            clear_labels: false,
        }
    }

    fn message_args(kind: MessageKind) -> MessageArgs {
        MessageArgs {
            kind,
            end_time: None,
            duration: None,
            todo: Vec::new(),
            done: Vec::new(),
            next: Vec::new(),
            copy: false,
        }
    }

    #[test]
    fn cli_preset_save_persists_and_activates() -> TestResult {
        let (store, mut rec) = reconciler();
        let mut args = save_args("Team", &["acme/api", "acme/web"]);
        args.reviewer = Some("octocat".into());
        args.labels = vec!["bug".into(), "ui".into()];

        let output = run_preset_command(&mut rec, PresetCommand::Save(args))?;
        assert!(output.starts_with("Saved preset Team"));

        let saved = parse_settings(&store.get(SETTINGS_KEY).expect("stored"))?;
        let preset = saved.active_preset().expect("active");
        assert_eq!(preset.reviewer.as_deref(), Some("octocat"));
        assert_eq!(preset.assignee, None);
        assert_eq!(preset.labels.len(), 2);
        Ok(())
    }

    #[test]
    fn cli_preset_save_rejects_blank_name() {
        let (_store, mut rec) = reconciler();
        let err = run_preset_command(&mut rec, PresetCommand::Save(save_args("  ", &["acme/api"])))
            .unwrap_err();
        assert_matches!(err.downcast_ref::<PresetError>(), Some(PresetError::EmptyName));
    }

    #[test]
    fn cli_preset_list_marks_active() -> TestResult {
        let (_store, mut rec) = reconciler();
        run_preset_command(&mut rec, PresetCommand::Save(save_args("One", &["acme/api"])))?;
        run_preset_command(&mut rec, PresetCommand::Save(save_args("Two", &["acme/web"])))?;

        let output = run_preset_command(&mut rec, PresetCommand::List)?;
        let active_line = output
            .lines()
            .find(|line| line.starts_with('*'))
            .expect("active marker");
        assert!(active_line.ends_with("Two"));
        assert!(output.contains("repos  acme/api"));
        Ok(())
    }

    #[test]
    fn cli_preset_update_changes_only_given_fields() -> TestResult {
        let (store, mut rec) = reconciler();
        let mut args = save_args("Team", &["acme/api"]);
        args.assignee = Some("alice".into());
        run_preset_command(&mut rec, PresetCommand::Save(args))?;

        let mut update = update_args();
        update.state = Some(IssueState::Closed);
        let output = run_preset_command(&mut rec, PresetCommand::Update(update))?;
        assert_eq!(output, "Updated preset Team\n");

        let saved = parse_settings(&store.get(SETTINGS_KEY).expect("stored"))?;
        let preset = saved.active_preset().expect("active");
        assert_eq!(preset.state, IssueState::Closed);
        assert_eq!(preset.assignee.as_deref(), Some("alice"));

        let mut clear = update_args();
        clear.clear_assignee = true;
        run_preset_command(&mut rec, PresetCommand::Update(clear))?;
        let saved = parse_settings(&store.get(SETTINGS_KEY).expect("stored"))?;
        assert_eq!(saved.active_preset().expect("active").assignee, None);
        Ok(())
    }

    #[test]
    fn cli_preset_update_without_active_preset_fails() {
        let (_store, mut rec) = reconciler();
        let err = run_preset_command(&mut rec, PresetCommand::Update(update_args())).unwrap_err();
        assert_matches!(
            err.downcast_ref::<PresetError>(),
            Some(PresetError::NoActivePreset)
        );
    }

    #[test]
    fn cli_preset_delete_only_preset_clears_active() -> TestResult {
        let (store, mut rec) = reconciler();
        run_preset_command(&mut rec, PresetCommand::Save(save_args("Solo", &["acme/api"])))?;
        let id = rec.active_preset().expect("active").id.clone();

        let output = run_preset_command(&mut rec, PresetCommand::Delete(PresetIdArgs { id }))?;
        assert_eq!(output, "Deleted preset Solo\nNo preset active\n");

        let saved = parse_settings(&store.get(SETTINGS_KEY).expect("stored"))?;
        assert!(saved.filter_presets.is_empty());
        assert_eq!(saved.active_preset_id, None);
        Ok(())
    }

    #[test]
    fn cli_preset_select_unknown_id_errors() {
        let (_store, mut rec) = reconciler();
        let err = run_preset_command(
            &mut rec,
            PresetCommand::Select(PresetIdArgs { id: "nope".into() }),
        )
        .unwrap_err();
        assert_matches!(
            err.downcast_ref::<PresetError>(),
            Some(PresetError::UnknownPreset(id)) if id == "nope"
        );
    }

    #[test]
    fn cli_presets_survive_sqlite_round_trip() -> TestResult {
        let temp_dir = TempDir::new()?;
        let loader = ConfigLoader::from_paths(ConfigPaths::rooted_at(temp_dir.path()));
        let config = loader.load_or_init()?;

        let store = storage::init(&config.storage)?;
        let mut rec = PresetReconciler::new(SettingsService::load(Box::new(store)));
        run_preset_command(&mut rec, PresetCommand::Save(save_args("Disk", &["acme/api"])))?;
        drop(rec);

        let store = storage::init(&config.storage)?;
        let mut rec = PresetReconciler::new(SettingsService::load(Box::new(store)));
        let output = run_preset_command(&mut rec, PresetCommand::List)?;
        assert!(output.contains("Disk"));
        assert!(output.starts_with('*'));
        Ok(())
    }

    #[test]
    fn cli_message_start_uses_links() -> TestResult {
        let config = AppConfig::default();
        let mut args = message_args(MessageKind::Start);
        args.end_time = Some("18:00".into());
        args.todo = vec!["https://x/1".into(), "Write docs".into()];

        let text = render_message(&config, datetime!(2024-05-01 09:00), args)?;
        assert_eq!(
            text,
            ":work_start:\n稼働予定 18:00\nやること\n- https://x/1\n- Write docs"
        );
        Ok(())
    }

    #[test]
    fn cli_message_duration_sets_end_time() -> TestResult {
        let config = AppConfig::default();
        let mut args = message_args(MessageKind::Start);
        args.duration = Some(2.5);

        let text = render_message(&config, datetime!(2024-05-01 09:00), args)?;
        assert!(text.contains("稼働予定 11:30"));
        Ok(())
    }

    #[test]
    fn cli_message_end_skips_empty_next_section() -> TestResult {
        let config = AppConfig::default();
        let mut args = message_args(MessageKind::End);
        args.done = vec!["Shipped release".into()];

        let text = render_message(&config, datetime!(2024-05-01 18:00), args)?;
        assert_eq!(text, ":work_end:\nやったこと\n- Shipped release");
        Ok(())
    }

    #[test]
    fn cli_message_rejects_bad_end_time() {
        let config = AppConfig::default();
        let mut args = message_args(MessageKind::Start);
        args.end_time = Some("25:99".into());
        assert!(render_message(&config, datetime!(2024-05-01 09:00), args).is_err());
    }

    struct FakeTracker;

    impl TrackerApi for FakeTracker {
        fn list_repos(&self) -> Result<Vec<Repo>> {
            Ok(vec![Repo {
                id: 1,
                full_name: "acme/api".into(),
                name: "api".into(),
                owner: User {
                    login: "acme".into(),
                },
            }])
        }

        fn list_issues(&self, repo: &str, _criteria: &FilterCriteria) -> Result<Vec<Issue>> {
            if repo == "acme/broken" {
                bail!("boom");
            }
            Ok(vec![Issue {
                id: 1,
                number: 12,
                title: "Login fails".into(),
                html_url: format!("https://github.com/{repo}/issues/12"),
                state: "open".into(),
                labels: Vec::new(),
                assignee: None,
                user: None,
                pull_request: None,
                repo: repo.to_string(),
            }])
        }

        fn list_pull_requests(
            &self,
            repo: &str,
            _criteria: &FilterCriteria,
        ) -> Result<Vec<PullRequest>> {
            if repo == "acme/broken" {
                bail!("boom");
            }
            Ok(vec![PullRequest {
                id: 2,
                number: 34,
                title: "Refactor cache".into(),
                html_url: format!("https://github.com/{repo}/pull/34"),
                state: "open".into(),
                user: None,
                assignee: None,
                assignees: Vec::new(),
                requested_reviewers: Vec::new(),
                labels: Vec::new(),
                draft: false,
                repo: repo.to_string(),
            }])
        }
    }

    #[test]
    fn cli_items_lists_active_preset_and_failures() -> TestResult {
        let (_store, mut rec) = reconciler();
        run_preset_command(
            &mut rec,
            PresetCommand::Save(save_args("Team", &["acme/api", "acme/broken"])),
        )?;
        let args = ItemsArgs {
            preset: None,
            query: None,
        };

        let output = collect_items(rec.settings(), &FakeTracker, &args)?;
        assert!(output.contains("Issues (1)"));
        assert!(output.contains("acme/api  #12 Login fails"));
        assert!(output.contains("Pull requests (1)"));
        assert!(output.contains("Failed to load: acme/broken"));
        Ok(())
    }

    #[test]
    fn cli_items_query_filters_by_title() -> TestResult {
        let (_store, mut rec) = reconciler();
        run_preset_command(&mut rec, PresetCommand::Save(save_args("Team", &["acme/api"])))?;
        let args = ItemsArgs {
            preset: None,
            query: Some("CACHE".into()),
        };

        let output = collect_items(rec.settings(), &FakeTracker, &args)?;
        assert!(output.contains("Issues (0)"));
        assert!(output.contains("Pull requests (1)"));
        Ok(())
    }

    #[test]
    fn cli_items_requires_a_preset() {
        let (_store, rec) = reconciler();
        let args = ItemsArgs {
            preset: None,
            query: None,
        };
        let err = collect_items(rec.settings(), &FakeTracker, &args).unwrap_err();
        assert_matches!(
            err.downcast_ref::<PresetError>(),
            Some(PresetError::NoActivePreset)
        );
    }

    #[test]
    fn cli_repos_lists_full_names() -> TestResult {
        let repos = FakeTracker.list_repos()?;
        assert_eq!(format_repos(&repos), "acme/api\n");
        assert_eq!(format_repos(&[]), "No repositories found.\n");
        Ok(())
    }
}
