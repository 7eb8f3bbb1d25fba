//! Exporter: projects the Aggregator's cumulative counters into gauge
//! samples on a fixed period, and serves them over Prometheus exposition.
//! The HTTP listener itself comes from `metrics-exporter-prometheus`'s own
//! recorder — there is no axum/hyper server to hand-roll here, since the
//! wire format and transport are entirely owned by that crate.

mod registry;

pub use registry::Exporter;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use log2metrics_core::Error;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Parse the `":8080"` / `"0.0.0.0:8080"` address forms accepted by
/// `http_addr` in the config file into a [`SocketAddr`].
pub fn parse_http_addr(addr: &str) -> Result<SocketAddr, Error> {
    let addr = if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        addr.to_string()
    };
    addr.parse()
        .map_err(|e| Error::Other(format!("invalid http_addr {addr:?}: {e}")))
}

/// Install the global Prometheus recorder and start its HTTP listener on
/// `http_addr`. Must run once, before the export loop starts ticking.
pub fn install_http_exporter(http_addr: &str) -> Result<(), Error> {
    let socket_addr = parse_http_addr(http_addr).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "falling back to default Prometheus listener address");
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 9000)
    });

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .install()
        .map_err(|e| Error::Other(format!("failed to install Prometheus exporter: {e}")))
}
