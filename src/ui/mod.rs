use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Frame;
use regex::Regex;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::app::state::{AppState, FocusPane, InputPurpose, OverlayState, ResultTab};
use crate::filter::ToggleText;
use crate::highlight::{build_highlight_regex, split_matches};
use crate::message::MessageKind;
use crate::settings::TimeInputMode;
use crate::tasks::TaskTarget;

pub fn draw_app(
    frame: &mut Frame,
    state: &AppState,
    results_state: &mut ListState,
    tasks_state: &mut ListState,
) {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(10), Constraint::Length(3)])
        .split(frame.size());

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(30),
            Constraint::Percentage(40),
            Constraint::Percentage(30),
        ])
        .split(vertical[0]);

    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(8), Constraint::Length(6)])
        .split(columns[0]);
    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(columns[2]);

    draw_filter(frame, state, left[0]);
    draw_work_time(frame, state, left[1]);
    draw_results(frame, state, columns[1], results_state);
    draw_tasks(frame, state, right[0], tasks_state);
    draw_message(frame, state, right[1]);

    let status = Paragraph::new(build_status_line(state)).style(Style::default().fg(Color::Gray));
    frame.render_widget(status, vertical[1]);

    render_overlay(frame, state);
}

fn pane_style(state: &AppState, pane: FocusPane) -> Style {
    if state.focus == pane {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    }
}

fn draw_filter(frame: &mut Frame, state: &AppState, area: Rect) {
    let draft = state.draft();
    let mut lines = Vec::new();

    let preset_line = match state.active_preset() {
        Some(preset) => {
            let mut spans = vec![
                Span::raw("Preset: "),
                Span::styled(
                    preset.name.clone(),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
            ];
            if state.is_dirty() {
                spans.push(Span::styled(
                    " (modified)",
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::ITALIC),
                ));
            }
            Line::from(spans)
        }
        None => Line::from(vec![
            Span::raw("Preset: "),
            Span::styled("none", Style::default().fg(Color::DarkGray)),
        ]),
    };
    lines.push(preset_line);
    lines.push(Line::from(format!(
        "Presets saved: {}",
        state.reconciler().presets().len()
    )));
    lines.push(Line::from(""));

    lines.push(Line::from(Span::styled(
        format!("Repositories ({})", draft.repos.len()),
        Style::default().add_modifier(Modifier::BOLD),
    )));
    if draft.repos.is_empty() {
        lines.push(Line::from(Span::styled(
            "  none selected (r to pick)",
            Style::default().fg(Color::DarkGray),
        )));
    }
    for repo in &draft.repos {
        lines.push(Line::from(format!("  {repo}")));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::raw("State: "),
        Span::styled(
            draft.state.to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
    ]));
    lines.push(toggle_line("Assignee", &draft.assignee));
    lines.push(toggle_line("Reviewer", &draft.reviewer));
    lines.push(toggle_line("Labels", &draft.labels));
    lines.push(Line::from(""));
    lines.push(preset_actions(state));

    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .title("Filter")
                .borders(Borders::ALL)
                .border_style(pane_style(state, FocusPane::Filter)),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn toggle_line(label: &str, toggle: &ToggleText) -> Line<'static> {
    let (mark, style) = if toggle.enabled {
        ("[x] ", Style::default().fg(Color::Green))
    } else {
        ("[ ] ", Style::default().fg(Color::DarkGray))
    };
    let value = if toggle.text.is_empty() {
        "-".to_string()
    } else {
        toggle.text.clone()
    };
    Line::from(vec![
        Span::styled(mark, style),
        Span::raw(format!("{label}: ")),
        Span::styled(value, style),
    ])
}

/// Preset keys, greyed out when the reconciler would refuse them.
fn preset_actions(state: &AppState) -> Line<'static> {
    Line::from(vec![
        action_span("n save new", !state.draft().repos.is_empty()),
        Span::raw("  "),
        action_span(
            "u update",
            state.reconciler().can_update() && state.is_dirty(),
        ),
        Span::raw("  "),
        action_span("D delete", state.active_preset().is_some()),
    ])
}

fn action_span(label: &'static str, available: bool) -> Span<'static> {
    if available {
        Span::styled(label, Style::default().fg(Color::Green))
    } else {
        Span::styled(label, Style::default().fg(Color::DarkGray))
    }
}

fn draw_work_time(frame: &mut Frame, state: &AppState, area: Rect) {
    let calculator = state.calculator();
    let mode = match calculator.mode() {
        TimeInputMode::EndTime => "end time",
        TimeInputMode::Duration => "duration",
    };
    let lines = vec![
        Line::from(vec![
            Span::raw("Input: "),
            Span::styled(mode, Style::default().add_modifier(Modifier::BOLD)),
        ]),
        Line::from(vec![
            Span::raw("Remaining: "),
            Span::styled(
                calculator.display_label(),
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(Span::styled(
            calculator.span_label(),
            Style::default().fg(Color::Gray),
        )),
    ];
    let paragraph = Paragraph::new(lines).block(
        Block::default()
            .title("Work time")
            .borders(Borders::ALL),
    );
    frame.render_widget(paragraph, area);
}

fn draw_results(frame: &mut Frame, state: &AppState, area: Rect, list_state: &mut ListState) {
    let highlight_regex = build_highlight_regex(&state.search.query);
    let highlight_style = Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD);
    let title_width = area.width.saturating_sub(8) as usize;

    let visible = state.visible_items();
    let mut items = Vec::with_capacity(visible.len());
    for item in &visible {
        let added = state.tasks().find(item);
        let mut title_spans = Vec::new();
        if let Some(target) = added {
            title_spans.push(Span::styled(
                format!("✓{} ", target_short(target)),
                Style::default().fg(Color::Green),
            ));
        }
        let title = truncate_to_width(&item.title, title_width);
        title_spans.extend(highlight_line(
            &title,
            highlight_regex.as_ref(),
            highlight_style,
            if added.is_some() {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default()
            },
        ));
        let repo_line = Line::from(Span::styled(
            item.repo_full_name.clone().unwrap_or_default(),
            Style::default().fg(Color::Gray),
        ));
        items.push(ListItem::new(vec![Line::from(title_spans), repo_line]));
    }
    if items.is_empty() {
        let hint = if state.loading {
            "Loading..."
        } else if state.draft().repos.is_empty() {
            "Pick repositories with r."
        } else {
            "Nothing matches."
        };
        items.push(ListItem::new(hint));
    }

    let (issues, pulls) = state.result_counts();
    let tab_style = |tab: ResultTab| {
        if state.result_tab == tab {
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        }
    };
    let mut title = vec![
        Span::styled(format!(" Issue ({issues}) "), tab_style(ResultTab::Issues)),
        Span::raw(" "),
        Span::styled(format!(" PR ({pulls}) "), tab_style(ResultTab::PullRequests)),
    ];
    if state.loading {
        title.push(Span::styled(" loading", Style::default().fg(Color::Yellow)));
    }
    if !state.failed_repos.is_empty() {
        title.push(Span::styled(
            format!(" {} failed", state.failed_repos.len()),
            Style::default().fg(Color::Red),
        ));
    }

    if visible.is_empty() {
        list_state.select(None);
    } else {
        list_state.select(Some(state.selected_result));
    }
    let list = List::new(items)
        .block(
            Block::default()
                .title(Line::from(title))
                .borders(Borders::ALL)
                .border_style(pane_style(state, FocusPane::Results)),
        )
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▸ ");
    frame.render_stateful_widget(list, area, list_state);
}

fn target_short(target: TaskTarget) -> &'static str {
    match target {
        TaskTarget::Todo => "todo",
        TaskTarget::Done => "done",
        TaskTarget::Next => "next",
    }
}

fn draw_tasks(frame: &mut Frame, state: &AppState, area: Rect, list_state: &mut ListState) {
    let tabs: Vec<Span> = TaskTarget::ALL
        .into_iter()
        .flat_map(|target| {
            let count = state.tasks().list(target).len();
            let style = if target == state.task_target {
                Style::default()
                    .fg(Color::Black)
                    .bg(Color::Cyan)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::Gray)
            };
            [
                Span::styled(format!(" {} ({count}) ", target.label()), style),
                Span::raw(" "),
            ]
        })
        .collect();

    let width = area.width.saturating_sub(6) as usize;
    let list = state.tasks().list(state.task_target);
    let mut items: Vec<ListItem> = list
        .iter()
        .map(|task| ListItem::new(truncate_to_width(task.reference(), width)))
        .collect();
    if items.is_empty() {
        items.push(ListItem::new(Span::styled(
            "Enter adds the selected result, c adds free text.",
            Style::default().fg(Color::DarkGray),
        )));
        list_state.select(None);
    } else {
        list_state.select(Some(state.selected_task));
    }

    let widget = List::new(items)
        .block(
            Block::default()
                .title(Line::from(tabs))
                .borders(Borders::ALL)
                .border_style(pane_style(state, FocusPane::Tasks)),
        )
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▸ ");
    frame.render_stateful_widget(widget, area, list_state);
}

fn draw_message(frame: &mut Frame, state: &AppState, area: Rect) {
    let title = match state.message_kind {
        MessageKind::Start => "Message: start (1/2 switch, y copy)",
        MessageKind::End => "Message: end (1/2 switch, y copy)",
    };
    let paragraph = Paragraph::new(Text::from(state.message_text()))
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Magenta)),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(Clear, area);
    frame.render_widget(paragraph, area);
}

fn build_status_line(state: &AppState) -> Text<'static> {
    let focus = match state.focus {
        FocusPane::Filter => "Filter",
        FocusPane::Results => "Results",
        FocusPane::Tasks => "Tasks",
    };
    let mut spans = vec![
        Span::raw("Focus: "),
        Span::styled(focus, Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(" | Add to: "),
        Span::styled(
            state.task_target.label(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
    ];

    if state.search.active || !state.search.query.is_empty() {
        let label_style = if state.search.active {
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        spans.push(Span::raw(" | Search "));
        spans.push(Span::styled("/", label_style));
        if state.search.query.is_empty() {
            spans.push(Span::styled(
                "(type to search)",
                Style::default().fg(Color::DarkGray),
            ));
        } else {
            spans.push(Span::styled(
                state.search.query.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            ));
        }
        if state.search.active {
            spans.push(Span::styled(" ▌", Style::default().fg(Color::Cyan)));
        }
    }

    if let Some(message) = &state.status_message {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(
            message.clone(),
            Style::default().fg(Color::Cyan),
        ));
    }

    let keys1 = Line::from(vec![
        Span::styled(
            "Keys: ",
            Style::default()
                .fg(Color::Gray)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            "j/k move • Tab focus • ←/→ tab • / search • Enter add • c custom • x remove • t list • 1/2 message • y copy • q quit",
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    let keys2 = Line::from(Span::styled(
        "      r repos • s state • a/A assignee • v/V reviewer • l/L labels • p/P preset • n save • u update • D delete • m mode • e time",
        Style::default().fg(Color::DarkGray),
    ));

    Text::from(vec![Line::from(spans), keys1, keys2])
}

fn highlight_line(
    text: &str,
    regex: Option<&Regex>,
    highlight_style: Style,
    base_style: Style,
) -> Vec<Span<'static>> {
    split_matches(text, regex)
        .into_iter()
        .map(|(run, matched)| {
            Span::styled(
                run.to_string(),
                if matched { highlight_style } else { base_style },
            )
        })
        .collect()
}

fn truncate_to_width(text: &str, max_width: usize) -> String {
    if text.width() <= max_width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let width = ch.width().unwrap_or(0);
        if used + width + 1 > max_width {
            break;
        }
        out.push(ch);
        used += width;
    }
    out.push('…');
    out
}

fn render_overlay(frame: &mut Frame, state: &AppState) {
    match state.overlay() {
        Some(OverlayState::TextInput(input)) => {
            let area = centered_rect(60, 25, frame.size());
            frame.render_widget(Clear, area);
            let mut value = input.value.clone();
            value.push('▌');
            let hint = match input.purpose {
                InputPurpose::Assignee | InputPurpose::Reviewer | InputPurpose::Labels => {
                    "Enter to apply (empty disables) • Esc to cancel"
                }
                InputPurpose::PresetName
                    if !state.reconciler().can_save_as_new(&input.value) =>
                {
                    "Needs a name and at least one repository • Esc to cancel"
                }
                _ => "Enter to confirm • Esc to cancel",
            };
            let paragraph = Paragraph::new(vec![
                Line::from(Span::styled(
                    input.purpose.title(),
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from(value),
                Line::from(""),
                Line::from(Span::styled(hint, Style::default().fg(Color::Gray))),
            ])
            .block(
                Block::default()
                    .title("Input")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Cyan)),
            )
            .wrap(Wrap { trim: false });
            frame.render_widget(paragraph, area);
        }
        Some(OverlayState::DeletePreset(overlay)) => {
            let area = centered_rect(50, 25, frame.size());
            frame.render_widget(Clear, area);
            let paragraph = Paragraph::new(vec![
                Line::from(Span::styled(
                    "Delete preset?",
                    Style::default()
                        .fg(Color::Red)
                        .add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from(overlay.name.clone()),
                Line::from(""),
                Line::from(Span::styled(
                    "Enter to delete • Esc to cancel",
                    Style::default().fg(Color::Gray),
                )),
            ])
            .block(
                Block::default()
                    .title("Delete")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Red)),
            );
            frame.render_widget(paragraph, area);
        }
        Some(OverlayState::RepoPicker(picker)) => {
            let area = centered_rect(60, 70, frame.size());
            frame.render_widget(Clear, area);
            let layout = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(3), Constraint::Min(3)])
                .split(area);

            let mut filter = picker.filter.clone();
            filter.push('▌');
            let search = Paragraph::new(filter).block(
                Block::default()
                    .title("Repositories (type to filter, Space toggle, Esc close)")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Cyan)),
            );
            frame.render_widget(search, layout[0]);

            let rows = state.picker_rows();
            let mut items: Vec<ListItem> = rows
                .iter()
                .map(|(name, selected)| {
                    let (mark, style) = if *selected {
                        ("[x] ", Style::default().fg(Color::Green))
                    } else {
                        ("[ ] ", Style::default())
                    };
                    ListItem::new(Line::from(vec![
                        Span::styled(mark, style),
                        Span::raw(name.to_string()),
                    ]))
                })
                .collect();
            if items.is_empty() {
                let hint = if state.repos().is_empty() {
                    "No repositories loaded yet (Ctrl-r to reload)."
                } else {
                    "No repository matches."
                };
                items.push(ListItem::new(hint));
            }
            let mut list_state = ListState::default();
            if !rows.is_empty() {
                list_state.select(Some(picker.selected));
            }
            let list = List::new(items)
                .block(Block::default().borders(Borders::ALL))
                .highlight_style(
                    Style::default()
                        .bg(Color::Blue)
                        .fg(Color::Black)
                        .add_modifier(Modifier::BOLD),
                )
                .highlight_symbol("▸ ");
            frame.render_stateful_widget(list, layout[1], &mut list_state);
        }
        None => {}
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Percentage((100 - percent_y) / 2),
                Constraint::Percentage(percent_y),
                Constraint::Percentage((100 - percent_y) / 2),
            ]
            .as_ref(),
        )
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            [
                Constraint::Percentage((100 - percent_x) / 2),
                Constraint::Percentage(percent_x),
                Constraint::Percentage((100 - percent_x) / 2),
            ]
            .as_ref(),
        )
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterEdit, PresetReconciler};
    use crate::settings::SettingsService;
    use crate::storage::MemoryStore;
    use crate::worktime::{EndTime, WorkTimeCalculator};
    use time::macros::datetime;

    fn state_with(reconciler: PresetReconciler) -> AppState {
        let calculator = WorkTimeCalculator::new(
            datetime!(2024-05-01 09:00),
            TimeInputMode::EndTime,
            EndTime::default(),
        );
        AppState::new(reconciler, calculator)
    }

    fn availability(line: &Line<'_>) -> Vec<(String, bool)> {
        line.spans
            .iter()
            .filter(|span| !span.content.trim().is_empty())
            .map(|span| (span.content.to_string(), span.style.fg == Some(Color::Green)))
            .collect()
    }

    #[test]
    fn preset_actions_are_greyed_without_a_preset() {
        let settings = SettingsService::load(Box::new(MemoryStore::new()));
        let state = state_with(PresetReconciler::new(settings));
        assert_eq!(
            availability(&preset_actions(&state)),
            vec![
                ("n save new".to_string(), false),
                ("u update".to_string(), false),
                ("D delete".to_string(), false),
            ]
        );
    }

    #[test]
    fn update_lights_up_only_once_the_draft_diverges() -> anyhow::Result<()> {
        let settings = SettingsService::load(Box::new(MemoryStore::new()));
        let mut reconciler = PresetReconciler::new(settings);
        reconciler.edit(FilterEdit::ToggleRepo("acme/api".into()));
        reconciler.save_as_new("Team")?;
        let mut state = state_with(reconciler);

        let clean = availability(&preset_actions(&state));
        assert_eq!(clean[0], ("n save new".to_string(), true));
        assert_eq!(clean[1], ("u update".to_string(), false));
        assert_eq!(clean[2], ("D delete".to_string(), true));

        state.edit_filter(FilterEdit::ToggleRepo("acme/web".into()));
        let dirty = availability(&preset_actions(&state));
        assert_eq!(dirty[1], ("u update".to_string(), true));
        Ok(())
    }

    #[test]
    fn truncation_respects_wide_characters() {
        assert_eq!(truncate_to_width("short", 10), "short");
        assert_eq!(truncate_to_width("abcdefgh", 5), "abcd…");
        let cut = truncate_to_width("やることリスト", 7);
        assert_eq!(cut, "やるこ…");
        assert!(cut.width() <= 7);
    }

    #[test]
    fn centered_rect_stays_inside_area() {
        let area = Rect::new(0, 0, 100, 40);
        let inner = centered_rect(50, 50, area);
        assert_eq!(inner.width, 50);
        assert_eq!(inner.height, 20);
        assert_eq!(inner.x, 25);
        assert_eq!(inner.y, 10);
    }
}
