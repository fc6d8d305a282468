//! GitHub REST access for repositories, issues and pull requests.

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::GitHubOptions;
use crate::filter::FilterCriteria;
use crate::tasks::{TaskItem, TaskKind};

pub mod fetch;

pub use fetch::{FetchCoordinator, FetchOutcome};

const API_VERSION: &str = "2022-11-28";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Label {
    pub name: String,
    #[serde(default)]
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Repo {
    pub id: u64,
    pub full_name: String,
    pub name: String,
    pub owner: User,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Issue {
    pub id: u64,
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub state: String,
    #[serde(default)]
    pub labels: Vec<Label>,
    pub assignee: Option<User>,
    pub user: Option<User>,
    /// Present when the "issue" is really a pull request.
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
    /// Owning repository, filled in by the client.
    #[serde(skip)]
    pub repo: String,
}

impl Issue {
    pub fn to_task_item(&self) -> TaskItem {
        TaskItem::tracked(
            TaskKind::Issue,
            &self.repo,
            self.number,
            &self.title,
            &self.html_url,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequest {
    pub id: u64,
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub state: String,
    pub user: Option<User>,
    pub assignee: Option<User>,
    #[serde(default)]
    pub assignees: Vec<User>,
    #[serde(default)]
    pub requested_reviewers: Vec<User>,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub draft: bool,
    #[serde(skip)]
    pub repo: String,
}

impl PullRequest {
    pub fn to_task_item(&self) -> TaskItem {
        TaskItem::tracked(TaskKind::Pr, &self.repo, self.number, &self.title, &self.html_url)
    }

    fn assigned_to(&self, login: &str) -> bool {
        self.assignee
            .iter()
            .chain(self.assignees.iter())
            .any(|user| user.login.eq_ignore_ascii_case(login))
    }

    fn review_requested_from(&self, login: &str) -> bool {
        self.requested_reviewers
            .iter()
            .any(|user| user.login.eq_ignore_ascii_case(login))
    }

    fn has_labels<'a>(&self, mut wanted: impl Iterator<Item = &'a String>) -> bool {
        wanted.all(|name| self.labels.iter().any(|label| &label.name == name))
    }
}

/// Issue-tracker read operations the fetch worker depends on.
pub trait TrackerApi: Send + Sync {
    fn list_repos(&self) -> Result<Vec<Repo>>;
    /// Assignee and labels are applied by the server.
    fn list_issues(&self, repo: &str, criteria: &FilterCriteria) -> Result<Vec<Issue>>;
    /// The server only filters by state; the rest is applied locally.
    fn list_pull_requests(&self, repo: &str, criteria: &FilterCriteria)
        -> Result<Vec<PullRequest>>;
}

pub struct GitHubClient {
    client: Client,
    api_base: String,
    token: Option<String>,
    per_page: u8,
}

impl GitHubClient {
    pub fn new(options: &GitHubOptions) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&options.user_agent).context("invalid user agent")?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .context("failed to create HTTP client")?;

        let token = options.resolve_token();
        if token.is_none() {
            tracing::warn!("no GitHub token configured; requests will be anonymous");
        }

        Ok(Self {
            client,
            api_base: options.api_base.trim_end_matches('/').to_string(),
            token,
            per_page: options.per_page,
        })
    }

    fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{path}", self.api_base);
        let mut request = self.client.get(&url).query(query);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        tracing::debug!(%url, ?query, "GitHub request");

        let response = request
            .send()
            .with_context(|| format!("failed to send request to {path}"))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            bail!("GitHub API error: {status} - {body}");
        }
        response
            .json()
            .with_context(|| format!("failed to parse response from {path}"))
    }

    fn base_query(&self, criteria: &FilterCriteria) -> Vec<(&'static str, String)> {
        vec![
            ("state", criteria.state.as_ref().to_string()),
            ("per_page", self.per_page.to_string()),
        ]
    }
}

impl TrackerApi for GitHubClient {
    fn list_repos(&self) -> Result<Vec<Repo>> {
        self.get(
            "/user/repos",
            &[
                ("per_page", self.per_page.to_string()),
                ("sort", "updated".to_string()),
            ],
        )
    }

    fn list_issues(&self, repo: &str, criteria: &FilterCriteria) -> Result<Vec<Issue>> {
        let mut query = self.base_query(criteria);
        if let Some(assignee) = &criteria.assignee {
            query.push(("assignee", assignee.clone()));
        }
        if !criteria.labels.is_empty() {
            query.push(("labels", join_labels(criteria)));
        }
        let issues: Vec<Issue> = self.get(&format!("/repos/{repo}/issues"), &query)?;
        Ok(without_pull_requests(issues, repo))
    }

    fn list_pull_requests(
        &self,
        repo: &str,
        criteria: &FilterCriteria,
    ) -> Result<Vec<PullRequest>> {
        let query = self.base_query(criteria);
        let mut pulls: Vec<PullRequest> = self.get(&format!("/repos/{repo}/pulls"), &query)?;
        for pull in &mut pulls {
            pull.repo = repo.to_string();
        }
        Ok(filter_pull_requests(pulls, criteria))
    }
}

fn join_labels(criteria: &FilterCriteria) -> String {
    criteria
        .labels
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// The issues endpoint also lists pull requests; those are dropped here.
pub fn without_pull_requests(issues: Vec<Issue>, repo: &str) -> Vec<Issue> {
    issues
        .into_iter()
        .filter(|issue| issue.pull_request.is_none())
        .map(|mut issue| {
            issue.repo = repo.to_string();
            issue
        })
        .collect()
}

pub fn filter_pull_requests(pulls: Vec<PullRequest>, criteria: &FilterCriteria) -> Vec<PullRequest> {
    pulls
        .into_iter()
        .filter(|pull| {
            criteria
                .assignee
                .as_deref()
                .map_or(true, |login| pull.assigned_to(login))
        })
        .filter(|pull| {
            criteria
                .reviewer
                .as_deref()
                .map_or(true, |login| pull.review_requested_from(login))
        })
        .filter(|pull| pull.has_labels(criteria.labels.iter()))
        .collect()
}

/// Case-insensitive title match, or a substring of the item number.
pub fn matches_query(title: &str, number: u64, query: &str) -> bool {
    let query = query.trim();
    query.is_empty()
        || title.to_lowercase().contains(&query.to_lowercase())
        || number.to_string().contains(query)
}
