//! Shared data model for the load-balancer configuration control plane.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod group;
mod request;
mod response;
mod service;
mod state;
mod upstream;

pub use group::Group;
pub use request::{QueuedRequestId, Request, RequestAction};
pub use response::{AgentResponse, Response};
pub use service::{Service, ServiceState};
pub use state::{InternalRequestState, RequestState};
pub use upstream::UpstreamInfo;
