//! Bind-based port probe.

use tokio::net::TcpListener;
use tracing::debug;

use crate::domain::PortSpec;
use crate::error::{Error, Result};
use crate::ports::PortProbe;

/// Probes a port by binding a listener and dropping it at once.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpProbe;

impl TcpProbe {
    pub fn new() -> Self {
        Self
    }

    /// Bind and release `spec`, reporting why a bind failed.
    pub async fn try_bind(&self, spec: &PortSpec) -> Result<()> {
        let listener = TcpListener::bind(spec.bind_target())
            .await
            .map_err(|e| Error::Bind {
                address: spec.address().to_string(),
                port: spec.port(),
                reason: e.to_string(),
            })?;
        drop(listener);
        Ok(())
    }
}

impl PortProbe for TcpProbe {
    async fn is_bindable(&self, spec: &PortSpec) -> bool {
        match self.try_bind(spec).await {
            Ok(()) => {
                debug!(addr = %spec, "Port is bindable");
                true
            }
            Err(e) => {
                debug!(addr = %spec, error = %e, "Port is not bindable");
                false
            }
        }
    }
}
