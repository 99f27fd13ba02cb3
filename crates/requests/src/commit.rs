//! The commit engine: applies an accepted request's effects to authoritative
//! state and reconciles the path-ownership table with the result.

use gantry_models::{Request, RequestAction, Service};
use gantry_store::{Store, Store1};
use tracing::{debug, error};

use crate::{Error, RequestManager};

impl<S, A> RequestManager<S, A>
where
    S: Store,
    A: Store1<Error = S::Error>,
{
    /// Applies an accepted request to authoritative state.
    ///
    /// The whole body runs under a single process-wide critical section: the
    /// sub-steps are dependent read-modify-write sequences over shared lock
    /// and service state with no cross-key transaction, so commits are
    /// serialized coarsely rather than per service. Lock-cleanup sub-steps
    /// are best-effort, logging failures and moving on so that a degraded
    /// cleanup never blocks the state write from landing.
    ///
    /// # Errors
    ///
    /// Returns an error when the state write or service removal fails.
    pub async fn commit_request(&self, request: &Request) -> Result<(), Error<S::Error>> {
        let _commit_guard = self.commit_lock.lock().await;

        let action = request.effective_action();
        let original = self.state.get_service(&request.service.service_id).await?;

        match action {
            RequestAction::Update | RequestAction::Revert => {
                self.update_authoritative_state(request).await?;
                best_effort(
                    "clear changed base paths",
                    self.clear_changed_base_paths(request, original.as_ref()).await,
                );
                best_effort(
                    "clear base paths from removed groups",
                    self.clear_base_paths_from_removed_groups(request, original.as_ref())
                        .await,
                );
                self.remove_renamed_service(request, original.as_ref()).await?;
                best_effort(
                    "clear base paths with no upstreams",
                    self.clear_base_paths_with_no_upstreams(request).await,
                );
            }
            RequestAction::Delete => {
                best_effort(
                    "clear changed base paths",
                    self.clear_changed_base_paths(request, original.as_ref()).await,
                );
                best_effort(
                    "clear base paths from removed groups",
                    self.clear_base_paths_from_removed_groups(request, original.as_ref())
                        .await,
                );
                self.delete_removed_service(request).await?;
                best_effort(
                    "clear base paths with no upstreams",
                    self.clear_base_paths_with_no_upstreams(request).await,
                );
            }
            RequestAction::Reload => {
                debug!(request_id = %request.request_id, "reload carries no state changes to commit");
            }
        }

        self.update_last_request_for_groups(request).await
    }

    async fn update_authoritative_state(&self, request: &Request) -> Result<(), Error<S::Error>> {
        self.state.update_service(request).await?;
        // The service write is already durable; a missed version bump only
        // delays agent pickup until the next commit.
        if let Err(err) = self.state.increment_state_version().await {
            error!(error = %err, "failed to bump state version after configuration write");
        }
        Ok(())
    }

    /// Releases locks on paths the service used to claim but no longer does.
    async fn clear_changed_base_paths(
        &self,
        request: &Request,
        original: Option<&Service>,
    ) -> Result<(), Error<S::Error>> {
        let Some(original) = original else {
            return Ok(());
        };
        let current_paths = request.service.all_paths();
        for group in &original.load_balancer_groups {
            for old_path in original.all_paths() {
                if current_paths.contains(&old_path) {
                    continue;
                }
                self.clear_if_owned_by(group, &old_path, &original.service_id)
                    .await?;
            }
        }
        Ok(())
    }

    /// Releases locks in groups the service has been removed from.
    async fn clear_base_paths_from_removed_groups(
        &self,
        request: &Request,
        original: Option<&Service>,
    ) -> Result<(), Error<S::Error>> {
        let Some(original) = original else {
            return Ok(());
        };
        for group in original
            .load_balancer_groups
            .difference(&request.service.load_balancer_groups)
        {
            for path in original.all_paths() {
                self.clear_if_owned_by(group, &path, &original.service_id)
                    .await?;
            }
        }
        Ok(())
    }

    /// Drops the previous service record when the request renames the
    /// service id.
    async fn remove_renamed_service(
        &self,
        request: &Request,
        original: Option<&Service>,
    ) -> Result<(), Error<S::Error>> {
        if let Some(original) = original {
            if original.service_id != request.service.service_id {
                self.state.remove_service(&original.service_id).await?;
            }
        }
        Ok(())
    }

    async fn delete_removed_service(&self, request: &Request) -> Result<(), Error<S::Error>> {
        self.state
            .remove_service(&request.service.service_id)
            .await?;
        self.state.increment_state_version().await?;
        Ok(())
    }

    /// Releases every lock held by a service that has no upstreams left.
    async fn clear_base_paths_with_no_upstreams(
        &self,
        request: &Request,
    ) -> Result<(), Error<S::Error>> {
        let service = &request.service;
        if !self.state.get_upstreams(&service.service_id).await?.is_empty() {
            return Ok(());
        }
        for group in &service.load_balancer_groups {
            for path in service.all_paths() {
                self.clear_if_owned_by(group, &path, &service.service_id)
                    .await?;
            }
        }
        Ok(())
    }

    async fn clear_if_owned_by(
        &self,
        group: &str,
        path: &str,
        service_id: &str,
    ) -> Result<(), Error<S::Error>> {
        let owner = self.load_balancers.get_base_path_owner(group, path).await?;
        if owner.as_deref() == Some(service_id) {
            self.load_balancers.clear_base_path(group, path).await?;
        }
        Ok(())
    }

    async fn update_last_request_for_groups(
        &self,
        request: &Request,
    ) -> Result<(), Error<S::Error>> {
        for group in &request.service.load_balancer_groups {
            self.load_balancers
                .set_last_request_id(group, &request.request_id)
                .await?;
        }
        Ok(())
    }
}

/// Logs and discards a cleanup failure so the remaining commit steps run.
fn best_effort<E: std::fmt::Display>(step: &'static str, result: Result<(), E>) {
    if let Err(err) = result {
        error!(error = %err, step, "commit cleanup step failed, continuing");
    }
}
