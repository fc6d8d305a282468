use std::fmt::Display;

use strum::{Display as StrumDisplay, EnumString};

use crate::tasks::{TaskItem, TaskLists, TaskTarget};

pub const START_MARKER: &str = ":work_start:";
pub const END_MARKER: &str = ":work_end:";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, StrumDisplay, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Start,
    End,
}

pub fn start_message<'a>(
    end_time: impl Display,
    tasks: impl IntoIterator<Item = &'a TaskItem>,
) -> String {
    let mut lines = vec![
        START_MARKER.to_string(),
        format!("稼働予定 {end_time}"),
        TaskTarget::Todo.label().to_string(),
    ];
    push_items(&mut lines, tasks);
    lines.join("\n")
}

pub fn end_message(done: &[TaskItem], next: &[TaskItem]) -> String {
    let mut lines = vec![END_MARKER.to_string(), TaskTarget::Done.label().to_string()];
    push_items(&mut lines, done);
    if !next.is_empty() {
        lines.push(TaskTarget::Next.label().to_string());
        push_items(&mut lines, next);
    }
    lines.join("\n")
}

/// Renders the message of `kind` from the current lists.
pub fn render(kind: MessageKind, end_time: impl Display, lists: &TaskLists) -> String {
    match kind {
        MessageKind::Start => start_message(end_time, lists.list(TaskTarget::Todo)),
        MessageKind::End => end_message(lists.list(TaskTarget::Done), lists.list(TaskTarget::Next)),
    }
}

fn push_items<'a>(lines: &mut Vec<String>, items: impl IntoIterator<Item = &'a TaskItem>) {
    lines.extend(items.into_iter().map(|item| format!("- {}", item.reference())));
}
