//! Seam between cluster watchers and the request pipeline. A watcher
//! translates platform-native events into domain terms on its side of the
//! trait; the listener turns them into queued requests.

use std::sync::Arc;

use async_trait::async_trait;
use gantry_models::{Request, RequestAction, Service};
use gantry_store::{Store, Store1};
use uuid::Uuid;

use crate::{Error, RequestManager};

/// Entry points a cluster-event watcher calls once it has resolved an event
/// to a service definition. Label parsing and event filtering stay on the
/// watcher's side of this seam.
#[async_trait]
pub trait ServiceEventListener: Send + Sync + 'static {
    /// Error surfaced back to the watcher.
    type Error: std::error::Error + Send + Sync + 'static;

    /// A service was created or changed upstream.
    async fn on_service_upsert(&self, service: Service) -> Result<(), Self::Error>;

    /// A service was removed upstream from the given group.
    async fn on_service_removed(&self, service_id: &str, group: &str)
    -> Result<(), Self::Error>;
}

/// Listener that turns watcher events into queued configuration requests.
///
/// Request ids are `{source}-{service_id}-{uuid}`, so watcher-originated
/// requests are distinguishable from operator submissions and every event
/// admits a fresh request rather than colliding on the idempotency key.
#[derive(Clone)]
pub struct EnqueueingListener<S, A>
where
    S: Store,
    A: Store1<Error = S::Error>,
{
    manager: Arc<RequestManager<S, A>>,
    request_source: String,
}

impl<S, A> EnqueueingListener<S, A>
where
    S: Store,
    A: Store1<Error = S::Error>,
{
    /// Creates a listener feeding the given manager, tagging request ids
    /// with `request_source`.
    pub fn new(manager: Arc<RequestManager<S, A>>, request_source: impl Into<String>) -> Self {
        Self {
            manager,
            request_source: request_source.into(),
        }
    }

    fn build_request(&self, service: Service, action: RequestAction) -> Request {
        Request {
            request_id: format!(
                "{}-{}-{}",
                self.request_source,
                service.service_id,
                Uuid::new_v4()
            ),
            service,
            action: Some(action),
            add_upstreams: vec![],
            remove_upstreams: vec![],
            replace_upstreams: vec![],
            no_reload: false,
            no_validate: false,
            no_duplicate_upstreams: false,
        }
    }
}

#[async_trait]
impl<S, A> ServiceEventListener for EnqueueingListener<S, A>
where
    S: Store,
    A: Store1<Error = S::Error>,
{
    type Error = Error<<S as Store>::Error>;

    async fn on_service_upsert(&self, service: Service) -> Result<(), Self::Error> {
        let request = self.build_request(service, RequestAction::Update);
        let missing = self.manager.missing_load_balancer_groups(&request).await?;
        if !missing.is_empty() {
            return Err(Error::MissingLoadBalancerGroups(missing));
        }
        self.manager.enqueue_request(&request).await.map(drop)
    }

    async fn on_service_removed(
        &self,
        service_id: &str,
        group: &str,
    ) -> Result<(), Self::Error> {
        let Some(mut service) = self.manager.get_service(service_id).await? else {
            // Nothing was ever committed for this service; nothing to tear
            // down.
            return Ok(());
        };
        service.load_balancer_groups = std::iter::once(group.to_string()).collect();
        let request = self.build_request(service, RequestAction::Delete);
        self.manager.enqueue_request(&request).await.map(drop)
    }
}
