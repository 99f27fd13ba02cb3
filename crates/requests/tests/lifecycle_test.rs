use std::collections::{BTreeMap, BTreeSet};

use assert_matches::assert_matches;
use gantry_models::{
    InternalRequestState, Request, RequestAction, RequestState, Service, UpstreamInfo,
};
use gantry_requests::{Error, RequestManager, RequestManagerConfig};
use gantry_store::Store1;
use gantry_store_memory::MemoryStore;

fn manager() -> RequestManager<MemoryStore, MemoryStore> {
    let store = MemoryStore::new();
    RequestManager::new(
        store.scope("requests"),
        store.scope("load-balancers"),
        store.scope("state"),
        store.scope("agent-responses"),
        store.scope("history"),
        RequestManagerConfig::default(),
    )
}

fn service(service_id: &str, base_path: &str, groups: &[&str]) -> Service {
    Service {
        service_id: service_id.to_string(),
        owners: vec![],
        base_path: base_path.to_string(),
        additional_paths: vec![],
        load_balancer_groups: groups.iter().map(|group| (*group).to_string()).collect(),
        options: BTreeMap::new(),
        template_name: None,
        domains: BTreeSet::new(),
        edge_cache_domains: BTreeSet::new(),
        preserve_own_mapping: false,
    }
}

fn request(request_id: &str, service: Service) -> Request {
    Request {
        request_id: request_id.to_string(),
        service,
        action: None,
        add_upstreams: vec![],
        remove_upstreams: vec![],
        replace_upstreams: vec![],
        no_reload: false,
        no_validate: false,
        no_duplicate_upstreams: false,
    }
}

#[tokio::test]
async fn test_enqueue_returns_queued_response() {
    let manager = manager();
    let req = request("r1", service("svc", "/api", &["edge"]));

    let response = manager.enqueue_request(&req).await.unwrap();

    assert_eq!(response.state, RequestState::Waiting);
    assert_eq!(response.message.as_deref(), Some("Queued as svc|r1|0000000000"));
    assert!(!response.success);
    assert!(!response.historical);
    assert_eq!(response.request, Some(req));

    let queued = manager.get_queued_request_ids().await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].request_id, "r1");
}

#[tokio::test]
async fn test_identical_resubmission_returns_existing_response() {
    let manager = manager();
    let req = request("r1", service("svc", "/api", &["edge"]));

    let first = manager.enqueue_request(&req).await.unwrap();
    let second = manager.enqueue_request(&req).await.unwrap();

    assert_eq!(second, first);
    assert_eq!(manager.get_queued_request_ids().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_conflicting_resubmission_is_rejected() {
    let manager = manager();
    let req = request("r1", service("svc", "/api", &["edge"]));
    manager.enqueue_request(&req).await.unwrap();

    let mut conflicting = request("r1", service("svc", "/other", &["edge"]));
    conflicting.no_reload = true;
    let result = manager.enqueue_request(&conflicting).await;

    assert_matches!(result, Err(Error::RequestConflict { request_id, existing }) => {
        assert_eq!(request_id, "r1");
        assert_eq!(existing.state, RequestState::Waiting);
        assert_eq!(existing.request.as_ref().map(|r| r.service.base_path.as_str()), Some("/api"));
    });
}

#[tokio::test]
async fn test_reload_combined_with_no_reload_is_rejected() {
    let manager = manager();
    let mut req = request("r1", service("svc", "/api", &["edge"]));
    req.action = Some(RequestAction::Reload);
    req.no_reload = true;

    let result = manager.enqueue_request(&req).await;

    assert_matches!(result, Err(Error::InvalidRequestAction(_)));
    assert!(manager.get_queued_request_ids().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_replace_upstreams_excludes_add_and_remove() {
    let manager = manager();
    let mut req = request("r1", service("svc", "/api", &["edge"]));
    req.replace_upstreams = vec![UpstreamInfo::new("10.0.0.1:80")];
    req.add_upstreams = vec![UpstreamInfo::new("10.0.0.2:80")];

    let result = manager.enqueue_request(&req).await;

    assert_matches!(result, Err(Error::InvalidUpstreams(_)));
}

#[tokio::test]
async fn test_revert_action_is_rejected_at_admission() {
    let manager = manager();
    let mut req = request("r1", service("svc", "/api", &["edge"]));
    req.action = Some(RequestAction::Revert);

    let result = manager.enqueue_request(&req).await;

    assert_matches!(result, Err(Error::InvalidRequestAction(_)));
}

#[tokio::test]
async fn test_no_duplicate_upstreams_rejects_claimed_upstream() {
    let manager = manager();

    let mut first = request("r1", service("svc-a", "/a", &["edge"]));
    first.add_upstreams = vec![UpstreamInfo::new("10.0.0.1:80")];
    manager.enqueue_request(&first).await.unwrap();
    manager.commit_request(&first).await.unwrap();

    let mut second = request("r2", service("svc-b", "/b", &["edge"]));
    second.add_upstreams = vec![UpstreamInfo::new("10.0.0.1:80")];
    second.no_duplicate_upstreams = true;
    let result = manager.enqueue_request(&second).await;
    assert_matches!(result, Err(Error::InvalidUpstreams(message)) => {
        assert!(message.contains("10.0.0.1:80"));
    });

    // Without the flag the same request is admitted
    second.no_duplicate_upstreams = false;
    manager.enqueue_request(&second).await.unwrap();
}

#[tokio::test]
async fn test_duplicate_check_ignores_the_service_itself() {
    let manager = manager();

    let mut first = request("r1", service("svc", "/api", &["edge"]));
    first.add_upstreams = vec![UpstreamInfo::new("10.0.0.1:80")];
    manager.enqueue_request(&first).await.unwrap();
    manager.commit_request(&first).await.unwrap();

    // Re-adding its own upstream is not a duplicate
    let mut second = request("r2", service("svc", "/api", &["edge"]));
    second.add_upstreams = vec![UpstreamInfo::new("10.0.0.1:80")];
    second.no_duplicate_upstreams = true;
    manager.enqueue_request(&second).await.unwrap();
}

#[tokio::test]
async fn test_cancel_pending_request() {
    let manager = manager();
    let req = request("r1", service("svc", "/api", &["edge"]));
    manager.enqueue_request(&req).await.unwrap();

    let state = manager.cancel_request("r1").await.unwrap();

    assert_eq!(
        state,
        Some(InternalRequestState::CancelledSendRevertRequests)
    );
    let response = manager.get_response("r1").await.unwrap().unwrap();
    assert_eq!(response.state, RequestState::Canceling);
}

#[tokio::test]
async fn test_cancel_is_a_noop_once_reverts_are_in_flight() {
    let manager = manager();
    let req = request("r1", service("svc", "/api", &["edge"]));
    manager.enqueue_request(&req).await.unwrap();
    manager
        .set_request_state("r1", InternalRequestState::FailedSendRevertRequests)
        .await
        .unwrap();

    let state = manager.cancel_request("r1").await.unwrap();

    assert_eq!(state, Some(InternalRequestState::FailedSendRevertRequests));
}

#[tokio::test]
async fn test_cancel_is_a_noop_on_terminal_request() {
    let manager = manager();
    let req = request("r1", service("svc", "/api", &["edge"]));
    manager.enqueue_request(&req).await.unwrap();
    manager
        .set_request_state("r1", InternalRequestState::Completed)
        .await
        .unwrap();

    let state = manager.cancel_request("r1").await.unwrap();

    assert_eq!(state, Some(InternalRequestState::Completed));
}

#[tokio::test]
async fn test_cancel_unknown_request() {
    let manager = manager();

    assert_eq!(manager.cancel_request("missing").await.unwrap(), None);
}

#[tokio::test]
async fn test_response_served_from_history_after_retirement() {
    let manager = manager();
    let req = request("r1", service("svc", "/api", &["edge"]));
    manager.enqueue_request(&req).await.unwrap();

    manager
        .retire_request(&req, InternalRequestState::Completed)
        .await
        .unwrap();

    assert_eq!(manager.get_request("r1").await.unwrap(), None);
    let response = manager.get_response("r1").await.unwrap().unwrap();
    assert!(response.historical);
    assert!(response.success);
    assert_eq!(response.state, RequestState::Success);
}

#[tokio::test]
async fn test_responses_for_service_lists_live_before_history() {
    let manager = manager();

    let finished = request("r1", service("svc", "/api", &["edge"]));
    manager.enqueue_request(&finished).await.unwrap();
    manager
        .retire_request(&finished, InternalRequestState::FailedReverted)
        .await
        .unwrap();

    let live = request("r2", service("svc", "/api", &["edge"]));
    manager.enqueue_request(&live).await.unwrap();

    let other = request("r3", service("other", "/other", &["edge"]));
    manager.enqueue_request(&other).await.unwrap();

    let responses = manager.get_responses_for_service("svc").await.unwrap();
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0].request_id, "r2");
    assert!(!responses[0].historical);
    assert_eq!(responses[1].request_id, "r1");
    assert!(responses[1].historical);
    assert_eq!(responses[1].state, RequestState::Failed);
}

#[tokio::test]
async fn test_get_response_for_unknown_request() {
    let manager = manager();

    assert_eq!(manager.get_response("missing").await.unwrap(), None);
}
