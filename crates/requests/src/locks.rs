//! Path-lock operations: conflict detection over the ownership table,
//! claiming locks for an accepted request, and releasing orphaned locks.

use std::collections::{BTreeMap, BTreeSet};

use gantry_models::Request;
use gantry_store::{Store, Store1};

use crate::{Error, RequestManager};

impl<S, A> RequestManager<S, A>
where
    S: Store,
    A: Store1<Error = S::Error>,
{
    /// The owning services the request would collide with, keyed by group.
    ///
    /// Each claimed path is checked as given; a relative path qualified by
    /// the group's default domain is additionally checked under its bare
    /// form, since a service claiming `/foo` and one claiming
    /// `default.domain/foo` contend for the same route. Within one group a
    /// later conflicting path replaces an earlier one in the result, so at
    /// most one owner is reported per group.
    ///
    /// # Errors
    ///
    /// Returns an error when the datastore fails.
    pub async fn base_path_conflicts(
        &self,
        request: &Request,
    ) -> Result<BTreeMap<String, String>, Error<S::Error>> {
        let service = &request.service;
        let mut conflicts = BTreeMap::new();
        for group in &service.load_balancer_groups {
            let default_domain = self
                .load_balancers
                .get_group(group)
                .await?
                .and_then(|group| group.default_domain);
            for path in service.all_paths() {
                if let Some(owner) =
                    self.load_balancers.get_base_path_owner(group, &path).await?
                {
                    if owner != service.service_id {
                        conflicts.insert(group.clone(), owner);
                        continue;
                    }
                }
                if path.starts_with('/') {
                    continue;
                }
                let Some(bare) = default_domain
                    .as_deref()
                    .and_then(|domain| path.strip_prefix(domain))
                else {
                    continue;
                };
                if let Some(owner) =
                    self.load_balancers.get_base_path_owner(group, bare).await?
                {
                    if owner != service.service_id {
                        conflicts.insert(group.clone(), owner);
                    }
                }
            }
        }
        Ok(conflicts)
    }

    /// Claims every path the request's service declares, in every group it
    /// belongs to.
    ///
    /// Callers check [`Self::base_path_conflicts`] first; the writes here are
    /// unconditional.
    ///
    /// # Errors
    ///
    /// Returns an error when the datastore fails.
    pub async fn lock_base_paths(&self, request: &Request) -> Result<(), Error<S::Error>> {
        let service = &request.service;
        for group in &service.load_balancer_groups {
            for path in service.all_paths() {
                self.load_balancers
                    .set_base_path_owner(group, &path, &service.service_id)
                    .await?;
            }
        }
        Ok(())
    }

    /// Claims an explicit set of paths for a service, used when reverting to
    /// a previous service definition whose paths differ from the request's.
    ///
    /// # Errors
    ///
    /// Returns an error when the datastore fails.
    pub async fn lock_base_paths_for(
        &self,
        groups: &BTreeSet<String>,
        paths: &[String],
        service_id: &str,
    ) -> Result<(), Error<S::Error>> {
        for group in groups {
            for path in paths {
                self.load_balancers
                    .set_base_path_owner(group, path, service_id)
                    .await?;
            }
        }
        Ok(())
    }

    /// Releases the locks taken for a request whose service never reached
    /// authoritative state.
    ///
    /// A first request for a brand-new service claims its paths before any
    /// commit; if that request fails or is cancelled, nothing in committed
    /// state references the service and the claims would be orphaned. When a
    /// committed record exists the locks are left alone.
    ///
    /// # Errors
    ///
    /// Returns an error when the datastore fails.
    pub async fn revert_base_paths(&self, request: &Request) -> Result<(), Error<S::Error>> {
        if self
            .state
            .get_service(&request.service.service_id)
            .await?
            .is_some()
        {
            return Ok(());
        }
        for group in &request.service.load_balancer_groups {
            for path in request.service.all_paths() {
                self.load_balancers.clear_base_path(group, &path).await?;
            }
        }
        Ok(())
    }

    /// Groups the request references that are not registered.
    ///
    /// # Errors
    ///
    /// Returns an error when the datastore fails.
    pub async fn missing_load_balancer_groups(
        &self,
        request: &Request,
    ) -> Result<BTreeSet<String>, Error<S::Error>> {
        let known = self.load_balancers.get_group_names().await?;
        Ok(request
            .service
            .load_balancer_groups
            .iter()
            .filter(|group| !known.contains(*group))
            .cloned()
            .collect())
    }
}
