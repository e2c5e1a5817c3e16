//! Dev server address negotiation and the network collaborators it uses

pub mod negotiator;
pub mod probe;

pub use negotiator::{
    failure_policy, AddressNegotiator, AddressRequest, AddressState, FailurePolicy, Resolution,
};
pub use probe::{IpResolver, PortProber, PortStatus, RouteIpResolver, TcpPortProber};

#[cfg(test)]
pub use probe::{MockIpResolver, MockPortProber};
