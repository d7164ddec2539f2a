//! Dashboard aggregation over the Jira client.
//!
//! Composes several read calls into one snapshot. Top-level fetches
//! (projects, current user, the two issue queries) must succeed; per-board
//! and per-sprint sub-fetches are best effort and a failure simply drops
//! that slice from the snapshot.

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::jira::client::{JiraApi, JiraClientFactory};
use crate::jira::error::JiraError;
use crate::jira::types::{Issue, Project, UserIdentity};
use crate::repositories::integration::IntegrationRepository;

const USER_ISSUES_JQL_LIMIT: u32 = 100;
const RECENT_ACTIVITY_JQL: &str = "updated >= -7d ORDER BY updated DESC";
const RECENT_ACTIVITY_LIMIT: u32 = 50;
const SPRINT_PROJECT_LIMIT: usize = 5;
const SPRINT_BOARD_LIMIT: usize = 2;
const VELOCITY_PROJECT_LIMIT: usize = 3;
const VELOCITY_SPRINT_LIMIT: usize = 6;
const VELOCITY_ENTRY_LIMIT: usize = 10;

/// Completion state of one active sprint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SprintProgress {
    pub sprint_id: i64,
    pub sprint_name: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    pub project_key: String,
    pub project_name: String,
    pub board_name: String,
    pub total_issues: usize,
    pub done_issues: usize,
    pub progress_percent: f64,
}

/// Story points completed in one closed sprint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VelocityEntry {
    pub sprint_id: i64,
    pub sprint_name: String,
    pub project_key: String,
    pub completed_points: f64,
    pub completed_issues: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complete_date: Option<String>,
}

/// Headline counters for the dashboard.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DashboardStats {
    pub total_projects: usize,
    pub user_open_issues: usize,
    pub recent_activity_count: usize,
}

/// Everything the dashboard view renders in one response.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DashboardSnapshot {
    pub user: UserIdentity,
    pub projects: Vec<Project>,
    pub user_open_issues: Vec<Issue>,
    pub recent_activity: Vec<Issue>,
    pub sprint_progress: Vec<SprintProgress>,
    pub velocity: Vec<VelocityEntry>,
    pub stats: DashboardStats,
}

/// Aggregates Jira data for a user's dashboard.
#[derive(Debug, Clone)]
pub struct DashboardService {
    factory: JiraClientFactory,
    repo: IntegrationRepository,
}

impl DashboardService {
    pub fn new(factory: JiraClientFactory, repo: IntegrationRepository) -> Self {
        Self { factory, repo }
    }

    /// Lists the projects of the linked site and records the sync.
    pub async fn get_projects(&self, user_id: &Uuid) -> Result<Vec<Project>, JiraError> {
        let (client, integration) = self.factory.client_for_user(user_id).await?;
        let projects = client.list_projects().await?;
        self.repo.touch_last_sync(&integration.id).await?;
        Ok(projects)
    }

    /// Builds the full dashboard snapshot.
    ///
    /// Client selection, the project list, the current-user lookup and the
    /// two issue queries are load-bearing and propagate their errors; the
    /// sprint and velocity slices degrade to empty when a sub-fetch fails.
    pub async fn get_dashboard_data(&self, user_id: &Uuid) -> Result<DashboardSnapshot, JiraError> {
        let (client, integration) = self.factory.client_for_user(user_id).await?;

        let projects = client.list_projects().await?;
        let user = client.current_user().await?;

        let user_open_issues = self.fetch_user_open_issues(&client, &user).await?;
        let recent_activity = self.fetch_recent_activity(&client).await?;
        let sprint_progress = self.fetch_sprint_progress(&client, &projects).await;
        let velocity = self.fetch_velocity(&client, &projects).await;

        let stats = DashboardStats {
            total_projects: projects.len(),
            user_open_issues: user_open_issues.len(),
            recent_activity_count: recent_activity.len(),
        };

        self.repo.touch_last_sync(&integration.id).await?;

        Ok(DashboardSnapshot {
            user,
            projects,
            user_open_issues,
            recent_activity,
            sprint_progress,
            velocity,
            stats,
        })
    }

    async fn fetch_user_open_issues(
        &self,
        client: &impl JiraApi,
        user: &UserIdentity,
    ) -> Result<Vec<Issue>, JiraError> {
        let email = user.email_address.as_deref().ok_or_else(|| {
            JiraError::Internal(anyhow::anyhow!(
                "linked Jira user exposes no email address"
            ))
        })?;

        let jql = format!(
            "assignee = \"{}\" AND status != Done ORDER BY updated DESC",
            email
        );
        let result = client.search_issues(&jql, USER_ISSUES_JQL_LIMIT).await?;
        Ok(result.issues)
    }

    async fn fetch_recent_activity(&self, client: &impl JiraApi) -> Result<Vec<Issue>, JiraError> {
        let result = client
            .search_issues(RECENT_ACTIVITY_JQL, RECENT_ACTIVITY_LIMIT)
            .await?;
        Ok(result.issues)
    }

    async fn fetch_sprint_progress(
        &self,
        client: &impl JiraApi,
        projects: &[Project],
    ) -> Vec<SprintProgress> {
        let mut progress = Vec::new();

        for project in projects.iter().take(SPRINT_PROJECT_LIMIT) {
            let boards = match client.list_boards(Some(&project.key)).await {
                Ok(boards) => boards,
                Err(e) => {
                    tracing::debug!(project = %project.key, error = %e, "Board listing failed");
                    continue;
                }
            };

            for board in boards.into_iter().take(SPRINT_BOARD_LIMIT) {
                let sprints = match client.list_sprints(board.id, Some("active")).await {
                    Ok(sprints) => sprints,
                    Err(e) => {
                        tracing::debug!(board_id = board.id, error = %e, "Sprint listing failed");
                        continue;
                    }
                };

                for sprint in sprints {
                    let issues = match client.list_sprint_issues(sprint.id).await {
                        Ok(issues) => issues,
                        Err(e) => {
                            tracing::debug!(sprint_id = sprint.id, error = %e, "Sprint issues failed");
                            continue;
                        }
                    };

                    let total = issues.len();
                    let done = issues.iter().filter(|i| is_done(i)).count();
                    let percent = if total > 0 {
                        done as f64 / total as f64 * 100.0
                    } else {
                        0.0
                    };

                    progress.push(SprintProgress {
                        sprint_id: sprint.id,
                        sprint_name: sprint.name,
                        state: sprint.state.unwrap_or_default(),
                        start_date: sprint.start_date,
                        end_date: sprint.end_date,
                        project_key: project.key.clone(),
                        project_name: project.name.clone(),
                        board_name: board.name.clone(),
                        total_issues: total,
                        done_issues: done,
                        progress_percent: percent,
                    });
                }
            }
        }

        progress
    }

    async fn fetch_velocity(
        &self,
        client: &impl JiraApi,
        projects: &[Project],
    ) -> Vec<VelocityEntry> {
        let mut entries = Vec::new();

        for project in projects.iter().take(VELOCITY_PROJECT_LIMIT) {
            let boards = match client.list_boards(Some(&project.key)).await {
                Ok(boards) => boards,
                Err(e) => {
                    tracing::debug!(project = %project.key, error = %e, "Board listing failed");
                    continue;
                }
            };
            let Some(board) = boards.into_iter().next() else {
                continue;
            };

            let sprints = match client.list_sprints(board.id, Some("closed")).await {
                Ok(sprints) => sprints,
                Err(e) => {
                    tracing::debug!(board_id = board.id, error = %e, "Sprint listing failed");
                    continue;
                }
            };

            // Closed sprints arrive oldest first; the recent ones are at
            // the tail.
            let recent: Vec<_> = sprints
                .into_iter()
                .rev()
                .take(VELOCITY_SPRINT_LIMIT)
                .collect();

            for sprint in recent {
                let issues = match client.list_sprint_issues(sprint.id).await {
                    Ok(issues) => issues,
                    Err(e) => {
                        tracing::debug!(sprint_id = sprint.id, error = %e, "Sprint issues failed");
                        continue;
                    }
                };

                let completed_issues = issues.iter().filter(|i| is_done(i)).count();
                let completed_points: f64 = issues
                    .iter()
                    .filter(|i| is_done(i))
                    .filter_map(|i| i.fields.story_points)
                    .sum();

                entries.push(VelocityEntry {
                    sprint_id: sprint.id,
                    sprint_name: sprint.name,
                    project_key: project.key.clone(),
                    completed_points,
                    completed_issues,
                    complete_date: sprint.complete_date,
                });
            }
        }

        // ISO 8601 timestamps sort lexicographically; None sorts last.
        entries.sort_by(|a, b| match (&a.complete_date, &b.complete_date) {
            (Some(a), Some(b)) => b.cmp(a),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        entries.truncate(VELOCITY_ENTRY_LIMIT);

        entries
    }
}

fn is_done(issue: &Issue) -> bool {
    let Some(status) = issue.fields.status.as_ref() else {
        return false;
    };
    match status.status_category.as_ref() {
        Some(category) => category.name.eq_ignore_ascii_case("done"),
        None => status.name.eq_ignore_ascii_case("done"),
    }
}
