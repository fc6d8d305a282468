//! The three task lists that feed the generated messages.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskKind {
    Issue,
    Pr,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub url: Option<String>,
    pub title: String,
    pub repo_full_name: Option<String>,
    pub number: Option<u64>,
}

impl TaskItem {
    /// Free text entry; text that looks like a link doubles as its URL.
    pub fn custom(text: &str) -> Option<Self> {
        let title = text.trim();
        if title.is_empty() {
            return None;
        }
        let url = (title.starts_with("http://") || title.starts_with("https://"))
            .then(|| title.to_string());
        Some(Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            kind: TaskKind::Custom,
            url,
            title: title.to_string(),
            repo_full_name: None,
            number: None,
        })
    }

    pub fn tracked(kind: TaskKind, repo: &str, number: u64, title: &str, url: &str) -> Self {
        Self {
            id: format!("{kind}-{repo}-{number}"),
            kind,
            url: Some(url.to_string()),
            title: format!("#{number} {title}"),
            repo_full_name: Some(repo.to_string()),
            number: Some(number),
        }
    }

    /// What a message line shows for this task.
    pub fn reference(&self) -> &str {
        self.url.as_deref().unwrap_or(&self.title)
    }

    /// Same link, or the same issue/PR in the same repository.
    pub fn same_work(&self, other: &TaskItem) -> bool {
        if let (Some(a), Some(b)) = (&self.url, &other.url) {
            if a == b {
                return true;
            }
        }
        self.kind != TaskKind::Custom
            && self.kind == other.kind
            && self.repo_full_name.is_some()
            && self.repo_full_name == other.repo_full_name
            && self.number.is_some()
            && self.number == other.number
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TaskTarget {
    #[default]
    Todo,
    Done,
    Next,
}

impl TaskTarget {
    pub const ALL: [TaskTarget; 3] = [TaskTarget::Todo, TaskTarget::Done, TaskTarget::Next];

    pub fn label(self) -> &'static str {
        match self {
            TaskTarget::Todo => "やること",
            TaskTarget::Done => "やったこと",
            TaskTarget::Next => "次の自分へ",
        }
    }

    pub fn next(self) -> Self {
        match self {
            TaskTarget::Todo => TaskTarget::Done,
            TaskTarget::Done => TaskTarget::Next,
            TaskTarget::Next => TaskTarget::Todo,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// Already present in the named list.
    Duplicate(TaskTarget),
}

/// Session-only lists; nothing here is persisted.
#[derive(Debug, Clone, Default)]
pub struct TaskLists {
    todo: Vec<TaskItem>,
    done: Vec<TaskItem>,
    next: Vec<TaskItem>,
}

impl TaskLists {
    pub fn list(&self, target: TaskTarget) -> &[TaskItem] {
        match target {
            TaskTarget::Todo => &self.todo,
            TaskTarget::Done => &self.done,
            TaskTarget::Next => &self.next,
        }
    }

    fn list_mut(&mut self, target: TaskTarget) -> &mut Vec<TaskItem> {
        match target {
            TaskTarget::Todo => &mut self.todo,
            TaskTarget::Done => &mut self.done,
            TaskTarget::Next => &mut self.next,
        }
    }

    /// Returns the list already holding this work item, if any.
    pub fn find(&self, item: &TaskItem) -> Option<TaskTarget> {
        TaskTarget::ALL
            .into_iter()
            .find(|target| self.list(*target).iter().any(|t| t.same_work(item)))
    }

    pub fn add(&mut self, target: TaskTarget, item: TaskItem) -> AddOutcome {
        if let Some(existing) = self.find(&item) {
            tracing::debug!(title = %item.title, list = existing.label(), "skipping duplicate task");
            return AddOutcome::Duplicate(existing);
        }
        self.list_mut(target).push(item);
        AddOutcome::Added
    }

    pub fn remove(&mut self, target: TaskTarget, id: &str) -> Option<TaskItem> {
        let list = self.list_mut(target);
        let index = list.iter().position(|item| item.id == id)?;
        Some(list.remove(index))
    }
}
