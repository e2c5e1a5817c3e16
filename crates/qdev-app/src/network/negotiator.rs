//! Dev server address negotiation
//!
//! Turns the requested host/port into the address the next endpoint binds:
//!
//! 1. A sticky host from an earlier cycle is reused as-is.
//! 2. Loopback aliases are rewritten to the wildcard address.
//! 3. Mobile modes without a concrete host get the machine's external IP
//!    (discovered once per session and made sticky).
//! 4. The port is probed upward from the requested one until a free port is
//!    found or the search limit is reached.

use qdev_core::prelude::*;
use qdev_core::{is_loopback_alias, Address, DevMode, WILDCARD_HOST};

use super::probe::{IpResolver, PortProber, PortStatus};

/// Address bookkeeping carried by the session across cycles
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressState {
    /// Host resolved once and reused for every later cycle
    pub sticky_host: Option<String>,
    /// External IP discovery has been attempted (successfully or not)
    pub discovery_attempted: bool,
    /// At least one resolution has succeeded in this session
    pub has_ever_succeeded: bool,
}

/// What the caller wants, plus what the session currently holds
#[derive(Debug, Clone, Copy)]
pub struct AddressRequest<'a> {
    pub host: Option<&'a str>,
    pub port: u16,
    pub mode: DevMode,
    /// Address bound by the session's own live endpoint, if any. Its port
    /// counts as free because the endpoint is stopped before rebinding.
    pub held: Option<&'a Address>,
}

/// Successful negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub address: Address,
    /// Port-substitution notice for this cycle, already logged
    pub warning: Option<String>,
}

/// How a failed negotiation must be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// No resolution has ever succeeded: the session cannot start
    Fatal,
    /// An earlier cycle succeeded: report and abandon this cycle only
    AbandonCycle,
}

/// Policy for a failure observed with the given state
pub fn failure_policy(state: &AddressState) -> FailurePolicy {
    if state.has_ever_succeeded {
        FailurePolicy::AbandonCycle
    } else {
        FailurePolicy::Fatal
    }
}

pub struct AddressNegotiator {
    prober: Box<dyn PortProber>,
    resolver: Box<dyn IpResolver>,
    port_search_limit: u16,
}

impl AddressNegotiator {
    pub fn new(prober: Box<dyn PortProber>, resolver: Box<dyn IpResolver>) -> Self {
        Self {
            prober,
            resolver,
            port_search_limit: u16::MAX,
        }
    }

    pub fn with_port_search_limit(mut self, limit: u16) -> Self {
        self.port_search_limit = limit;
        self
    }

    /// Resolve `request` against the session's `state`.
    ///
    /// On success `state.has_ever_succeeded` is set; on failure `state` keeps
    /// whatever sticky host was cached and [`failure_policy`] decides severity.
    pub fn resolve(
        &self,
        request: AddressRequest<'_>,
        state: &mut AddressState,
    ) -> Result<Resolution> {
        let host = self.resolve_host(&request, state)?;
        let (port, warning) = self.resolve_port(&host, &request)?;

        state.has_ever_succeeded = true;
        Ok(Resolution {
            address: Address::new(host, port),
            warning,
        })
    }

    fn resolve_host(
        &self,
        request: &AddressRequest<'_>,
        state: &mut AddressState,
    ) -> Result<String> {
        if let Some(sticky) = &state.sticky_host {
            trace!("Reusing sticky host {}", sticky);
            return Ok(sticky.clone());
        }

        let host = match request.host {
            Some(h) if is_loopback_alias(h) => {
                debug!("Rewriting loopback host {} to {}", h, WILDCARD_HOST);
                None
            }
            Some(h) if h == WILDCARD_HOST => None,
            Some(h) => Some(h.to_string()),
            None => None,
        };

        match host {
            Some(host) => Ok(host),
            None if request.mode.is_mobile() => self.discover_host(state),
            None => Ok(WILDCARD_HOST.to_string()),
        }
    }

    /// External IP lookup, at most once per session
    fn discover_host(&self, state: &mut AddressState) -> Result<String> {
        if state.discovery_attempted {
            return Err(Error::address_unavailable(
                "external",
                "external address discovery already failed for this session",
            ));
        }
        state.discovery_attempted = true;

        let ip = self.resolver.external_ip()?;
        info!("Using external address {} for device access", ip);
        state.sticky_host = Some(ip.clone());
        Ok(ip)
    }

    /// Nearest free port at or above the requested one, one probe at a time
    fn resolve_port(
        &self,
        host: &str,
        request: &AddressRequest<'_>,
    ) -> Result<(u16, Option<String>)> {
        let start = request.port;
        let limit = self.port_search_limit.max(start);

        for port in start..=limit {
            if let Some(held) = request.held {
                if held.host == host && held.port == port {
                    return Ok((port, substitution_warning(start, port)));
                }
            }

            match self.prober.probe(host, port) {
                PortStatus::Free => return Ok((port, substitution_warning(start, port))),
                PortStatus::Occupied => continue,
                PortStatus::HostUnavailable(reason) => {
                    return Err(Error::address_unavailable(host, reason))
                }
                PortStatus::Failed(reason) => {
                    return Err(Error::unknown_network(host, port, reason))
                }
            }
        }

        Err(Error::port_unavailable(host, start))
    }
}

fn substitution_warning(requested: u16, resolved: u16) -> Option<String> {
    if requested == resolved {
        return None;
    }
    let message = format!(
        "Port {} is already in use, using port {} instead",
        requested, resolved
    );
    warn!("{}", message);
    Some(message)
}
