//! Background fetching with generation tokens.
//!
//! Every [`FetchCoordinator::request`] bumps the generation. The worker skips queued
//! jobs that have been superseded, stops between repositories once its job goes
//! stale, and [`FetchCoordinator::poll`] drops any result whose generation is no
//! longer current. The last request always wins, whatever order responses arrive in.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

use super::{Issue, PullRequest, Repo, TrackerApi};
use crate::filter::FilterCriteria;

#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    pub generation: u64,
    pub issues: Vec<Issue>,
    pub pull_requests: Vec<PullRequest>,
    /// Repositories that failed and contributed nothing.
    pub failed_repos: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchEvent {
    Items(FetchOutcome),
    Repos(Vec<Repo>),
    ReposFailed(String),
}

enum Job {
    Items {
        generation: u64,
        criteria: FilterCriteria,
    },
    Repos,
}

pub struct FetchCoordinator {
    jobs: Sender<Job>,
    events: Receiver<FetchEvent>,
    generation: Arc<AtomicU64>,
    loading: bool,
}

impl FetchCoordinator {
    pub fn spawn(api: Arc<dyn TrackerApi>) -> Result<Self> {
        let (job_tx, job_rx) = unbounded::<Job>();
        let (event_tx, event_rx) = unbounded::<FetchEvent>();
        let generation = Arc::new(AtomicU64::new(0));

        let worker_generation = Arc::clone(&generation);
        thread::Builder::new()
            .name("kintai-fetch".to_owned())
            .spawn(move || run_worker(api.as_ref(), &job_rx, &event_tx, &worker_generation))
            .context("spawning fetch worker")?;

        Ok(Self {
            jobs: job_tx,
            events: event_rx,
            generation,
            loading: false,
        })
    }

    /// Queues a fetch for `criteria`, invalidating every earlier one.
    pub fn request(&mut self, criteria: FilterCriteria) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(generation, repos = criteria.repos.len(), "requesting items");
        if self.jobs.send(Job::Items { generation, criteria }).is_err() {
            tracing::error!("fetch worker is gone");
            self.loading = false;
        } else {
            self.loading = true;
        }
        generation
    }

    pub fn request_repos(&self) {
        if self.jobs.send(Job::Repos).is_err() {
            tracing::error!("fetch worker is gone");
        }
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Drains finished work. Item results from superseded requests are discarded.
    pub fn poll(&mut self) -> Vec<FetchEvent> {
        let mut events = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(FetchEvent::Items(outcome)) => {
                    if outcome.generation != self.current_generation() {
                        tracing::debug!(generation = outcome.generation, "dropping stale result");
                        continue;
                    }
                    self.loading = false;
                    events.push(FetchEvent::Items(outcome));
                }
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.loading = false;
                    break;
                }
            }
        }
        events
    }
}

fn run_worker(
    api: &dyn TrackerApi,
    jobs: &Receiver<Job>,
    events: &Sender<FetchEvent>,
    generation: &AtomicU64,
) {
    while let Ok(first) = jobs.recv() {
        let mut wants_repos = false;
        let mut latest = None;
        for job in std::iter::once(first).chain(jobs.try_iter()) {
            match job {
                Job::Repos => wants_repos = true,
                Job::Items {
                    generation,
                    criteria,
                } => latest = Some((generation, criteria)),
            }
        }

        if wants_repos {
            let event = match api.list_repos() {
                Ok(repos) => FetchEvent::Repos(repos),
                Err(err) => {
                    tracing::warn!(?err, "failed to list repositories");
                    FetchEvent::ReposFailed(format!("{err:#}"))
                }
            };
            if events.send(event).is_err() {
                return;
            }
        }

        let Some((job_generation, criteria)) = latest else {
            continue;
        };
        let is_stale = || generation.load(Ordering::SeqCst) != job_generation;
        match fetch_items(api, &criteria, job_generation, &is_stale) {
            Some(outcome) => {
                if events.send(FetchEvent::Items(outcome)).is_err() {
                    return;
                }
            }
            None => tracing::debug!(generation = job_generation, "abandoned stale fetch"),
        }
    }
    tracing::debug!("fetch worker stopping");
}

/// Fetches issues and pull requests for every repository in `criteria`.
///
/// Returns `None` as soon as `is_stale` reports the job was superseded. A failing
/// repository is logged and skipped; issue and pull request failures are independent.
pub fn fetch_items(
    api: &dyn TrackerApi,
    criteria: &FilterCriteria,
    generation: u64,
    is_stale: &dyn Fn() -> bool,
) -> Option<FetchOutcome> {
    let mut outcome = FetchOutcome {
        generation,
        issues: Vec::new(),
        pull_requests: Vec::new(),
        failed_repos: Vec::new(),
    };

    for repo in &criteria.repos {
        if is_stale() {
            return None;
        }
        let mut failed = false;
        match api.list_issues(repo, criteria) {
            Ok(issues) => outcome.issues.extend(issues),
            Err(err) => {
                tracing::warn!(?err, %repo, "failed to fetch issues");
                failed = true;
            }
        }
        match api.list_pull_requests(repo, criteria) {
            Ok(pulls) => outcome.pull_requests.extend(pulls),
            Err(err) => {
                tracing::warn!(?err, %repo, "failed to fetch pull requests");
                failed = true;
            }
        }
        if failed {
            outcome.failed_repos.push(repo.clone());
        }
    }

    if is_stale() {
        return None;
    }
    Some(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::User;
    use anyhow::bail;
    use parking_lot::Mutex;
    use std::cell::Cell;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct FakeTracker {
        failing_issue_repos: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    fn issue(repo: &str, number: u64) -> Issue {
        Issue {
            id: number,
            number,
            title: format!("issue {number}"),
            html_url: format!("https://github.com/{repo}/issues/{number}"),
            state: "open".into(),
            labels: Vec::new(),
            assignee: None,
            user: None,
            pull_request: None,
            repo: repo.to_string(),
        }
    }

    fn pull(repo: &str, number: u64) -> PullRequest {
        PullRequest {
            id: number,
            number,
            title: format!("pr {number}"),
            html_url: format!("https://github.com/{repo}/pull/{number}"),
            state: "open".into(),
            user: None,
            assignee: None,
            assignees: Vec::new(),
            requested_reviewers: Vec::new(),
            labels: Vec::new(),
            draft: false,
            repo: repo.to_string(),
        }
    }

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
            self.calls.lock().push(format!("issues:{repo}"));
            if self.failing_issue_repos.iter().any(|r| r == repo) {
                bail!("boom");
            }
            Ok(vec![issue(repo, 1)])
        }

        fn list_pull_requests(
            &self,
            repo: &str,
            _criteria: &FilterCriteria,
        ) -> Result<Vec<PullRequest>> {
            self.calls.lock().push(format!("pulls:{repo}"));
            Ok(vec![pull(repo, 2)])
        }
    }

    fn criteria(repos: &[&str]) -> FilterCriteria {
        FilterCriteria {
            repos: repos.iter().map(|r| r.to_string()).collect(),
            ..FilterCriteria::default()
        }
    }

    fn wait_for_items(coordinator: &mut FetchCoordinator) -> Option<FetchOutcome> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            for event in coordinator.poll() {
                if let FetchEvent::Items(outcome) = event {
                    return Some(outcome);
                }
            }
            thread::sleep(Duration::from_millis(10));
        }
        None
    }

    #[test]
    fn failing_repo_is_skipped_not_fatal() {
        let api = FakeTracker {
            failing_issue_repos: vec!["acme/broken".into()],
            ..FakeTracker::default()
        };
        let outcome = fetch_items(&api, &criteria(&["acme/api", "acme/broken"]), 1, &|| false)
            .expect("outcome");
        assert_eq!(outcome.issues.len(), 1);
        assert_eq!(outcome.pull_requests.len(), 2);
        assert_eq!(outcome.failed_repos, vec!["acme/broken".to_string()]);
    }

    #[test]
    fn empty_repo_set_yields_empty_outcome() {
        let api = FakeTracker::default();
        let outcome = fetch_items(&api, &criteria(&[]), 3, &|| false).expect("outcome");
        assert!(outcome.issues.is_empty());
        assert!(outcome.pull_requests.is_empty());
        assert!(api.calls.lock().is_empty());
    }

    #[test]
    fn stale_job_stops_between_repositories() {
        let api = FakeTracker::default();
        let checks = Cell::new(0);
        let is_stale = || {
            checks.set(checks.get() + 1);
            checks.get() > 1
        };
        let outcome = fetch_items(&api, &criteria(&["a/one", "a/two"]), 1, &is_stale);
        assert!(outcome.is_none());
        assert_eq!(
            *api.calls.lock(),
            vec!["issues:a/one".to_string(), "pulls:a/one".to_string()]
        );
    }

    #[test]
    fn only_latest_generation_is_delivered() {
        let mut coordinator =
            FetchCoordinator::spawn(Arc::new(FakeTracker::default())).expect("spawn");
        let first = coordinator.request(criteria(&["acme/old"]));
        let second = coordinator.request(criteria(&["acme/new"]));
        assert!(second > first);
        assert!(coordinator.is_loading());

        let outcome = wait_for_items(&mut coordinator).expect("result");
        assert_eq!(outcome.generation, second);
        assert_eq!(outcome.issues[0].repo, "acme/new");
        assert!(!coordinator.is_loading());
    }

    #[test]
    fn repos_are_listed_on_request() {
        let mut coordinator =
            FetchCoordinator::spawn(Arc::new(FakeTracker::default())).expect("spawn");
        coordinator.request_repos();
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut repos = None;
        while repos.is_none() && Instant::now() < deadline {
            repos = coordinator.poll().into_iter().find_map(|event| match event {
                FetchEvent::Repos(repos) => Some(repos),
                _ => None,
            });
            thread::sleep(Duration::from_millis(10));
        }
        let repos = repos.expect("repos delivered");
        assert_eq!(repos[0].full_name, "acme/api");
    }
}
