use std::sync::Arc;
use tracing::{info, warn};

use super::Dispatcher;
use crate::auth::UserStore;
use crate::routing::SourceRouter;
use crate::types::{GatewayError, Result, Task, TaskError};

/// Task submission: the path from a client batch to aggregated errors
#[derive(Clone)]
pub struct TaskService {
    users: Arc<UserStore>,
    router: Arc<SourceRouter>,
    dispatcher: Dispatcher,
}

impl TaskService {
    pub fn new(users: Arc<UserStore>, router: Arc<SourceRouter>, dispatcher: Dispatcher) -> Self {
        Self {
            users,
            router,
            dispatcher,
        }
    }

    pub fn users(&self) -> &UserStore {
        &self.users
    }

    pub fn router(&self) -> &SourceRouter {
        &self.router
    }

    /// Authenticate, then route and dispatch a JSON task batch
    ///
    /// Only bad credentials or an unparsable batch fail the whole call.
    /// Everything else is reported per task: unrouted tasks first, then each
    /// organization's errors in dispatch order.
    pub async fn handle_task(
        &self,
        tasks: &str,
        username: &str,
        password: &str,
    ) -> Result<Vec<TaskError>> {
        let user = self.users.authenticate(username, password)?;

        let tasks: Vec<Task> = serde_json::from_str(tasks)
            .map_err(|e| GatewayError::BadRequest(format!("Invalid task list: {e}")))?;
        info!(user = %user.name, tasks = tasks.len(), "Task batch received");

        let partition = self.router.partition(tasks);
        let mut errors: Vec<TaskError> = partition
            .unrouted
            .into_iter()
            .map(|task| {
                let err = GatewayError::NoRoute(task.source.clone());
                TaskError::from_error(task, &err)
            })
            .collect();

        for (index, group) in partition.groups {
            let Some(organization) = self.router.organization(index) else {
                continue;
            };
            match self.dispatcher.send(&group, organization).await {
                Ok(found) => errors.extend(found),
                Err(err) => {
                    warn!(
                        organization = %organization.name,
                        error = %err,
                        "Error while sending tasks"
                    );
                    errors.extend(group.into_iter().map(|task| TaskError::from_error(task, &err)));
                }
            }
        }

        Ok(errors)
    }

    /// Send gateway-generated tasks to our own organization
    pub async fn dispatch_own(&self, tasks: Vec<Task>) -> Result<Vec<TaskError>> {
        self.dispatcher.send(&tasks, self.router.own()).await
    }
}
