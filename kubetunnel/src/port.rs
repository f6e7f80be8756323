//! Local port allocation.

use crate::error::{TunnelError, TunnelResult};
use std::net::{IpAddr, SocketAddr, TcpListener};

/// Resolve the local port a session will listen on.
///
/// A non-zero `requested` port is returned as-is; whether it is free only shows
/// up when the forwarder binds it. For 0, an ephemeral listener is bound on
/// `bind_address`, its port read back and the listener closed again.
///
/// The probe is racy: another process may take the port between the probe and
/// the forwarder's bind. That failure surfaces as [`TunnelError::PortBind`]
/// from start.
pub fn allocate_local_port(bind_address: IpAddr, requested: u16) -> TunnelResult<u16> {
    if requested != 0 {
        return Ok(requested);
    }

    let listener = TcpListener::bind(SocketAddr::new(bind_address, 0)).map_err(|e| {
        TunnelError::PortBind(format!("probe bind on {}:0 failed: {}", bind_address, e))
    })?;
    let port = listener
        .local_addr()
        .map_err(|e| TunnelError::PortBind(format!("probe address unavailable: {}", e)))?
        .port();
    drop(listener);

    tracing::debug!(port, "Allocated ephemeral local port");
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[test]
    fn test_explicit_port_is_returned_unchanged() {
        assert_eq!(allocate_local_port(LOCALHOST, 39090).unwrap(), 39090);
        assert_eq!(allocate_local_port(LOCALHOST, 1).unwrap(), 1);
    }

    #[test]
    fn test_auto_port_is_released() {
        let port = allocate_local_port(LOCALHOST, 0).unwrap();
        assert_ne!(port, 0);

        // The probe listener is gone, so the port can be bound again
        let listener = TcpListener::bind(SocketAddr::new(LOCALHOST, port));
        assert!(listener.is_ok(), "probe socket still held on {}", port);
    }

    #[test]
    fn test_auto_port_fails_on_foreign_address() {
        // TEST-NET-1 is never assigned to a local interface
        let foreign = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
        let err = allocate_local_port(foreign, 0).unwrap_err();
        assert!(matches!(err, TunnelError::PortBind(_)));
    }
}
