//! Discovery of the host address used for cluster-internal peering.
//!
//! Default computation only needs an address when the storage backend has to
//! advertise one, so the lookup is modeled as an injectable capability:
//! production code uses [`HostAddressResolver`], embedders (and tests) that
//! already know the address inject a [`FixedAddressResolver`].

use std::net::{IpAddr, UdpSocket};

use snafu::Snafu;

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("no usable non-loopback address found on this host"))]
    NoUsableAddress,
}

/// Source of the first usable non-loopback address of the host.
pub trait AddressResolver {
    /// Returns the first usable non-loopback address, or
    /// [`Error::NoUsableAddress`] if the host has none.
    fn first_public_address(&self) -> Result<String>;
}

/// Resolves the host address from the local routing table.
///
/// An unconnected UDP socket is "connected" toward a fixed public target,
/// which selects the outgoing address without sending a single datagram.
/// IPv4 is preferred, IPv6 is the fallback.
#[derive(Clone, Copy, Debug, Default)]
pub struct HostAddressResolver;

impl AddressResolver for HostAddressResolver {
    fn first_public_address(&self) -> Result<String> {
        // TEST-NET-3 and the IPv6 documentation prefix; route selection only
        // needs a destination outside the host.
        for (bind, target) in [("0.0.0.0:0", "203.0.113.1:53"), ("[::]:0", "[2001:db8::1]:53")] {
            match probe(bind, target) {
                Ok(ip) if !ip.is_loopback() && !ip.is_unspecified() => {
                    tracing::debug!(address = %ip, "resolved first public address");
                    return Ok(ip.to_string());
                }
                Ok(ip) => tracing::trace!(address = %ip, "discarding unusable address"),
                Err(error) => tracing::trace!(%error, probe = target, "address probe failed"),
            }
        }

        NoUsableAddressSnafu.fail()
    }
}

fn probe(bind: &str, target: &str) -> std::io::Result<IpAddr> {
    let socket = UdpSocket::bind(bind)?;
    socket.connect(target)?;
    Ok(socket.local_addr()?.ip())
}

/// Resolver returning a preconfigured address verbatim.
#[derive(Clone, Debug)]
pub struct FixedAddressResolver {
    address: String,
}

impl FixedAddressResolver {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

impl AddressResolver for FixedAddressResolver {
    fn first_public_address(&self) -> Result<String> {
        Ok(self.address.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_resolver_returns_configured_address() {
        let resolver = FixedAddressResolver::new("10.0.0.9");
        assert_eq!(
            resolver.first_public_address().expect("address is fixed"),
            "10.0.0.9"
        );
    }

    #[test]
    fn host_resolver_never_reports_loopback() {
        // The outcome depends on the host network state, but a successful
        // resolution must never hand out a loopback or unspecified address.
        if let Ok(address) = HostAddressResolver.first_public_address() {
            let ip: IpAddr = address.parse().expect("resolved address is an IP");
            assert!(!ip.is_loopback());
            assert!(!ip.is_unspecified());
        }
    }
}
