//! Stand-in network transports.
//!
//! The MQTT session on the modem is an external collaborator.  Until it is
//! wired, [`LogNetwork`] prints what would have been published and
//! [`NullNetwork`] refuses everything so drops show up in the counters.

use log::info;

use crate::app::ports::{NetworkTransport, TransportError};

/// Logs each payload and reports success.
#[derive(Debug, Default)]
pub struct LogNetwork {
    topic: &'static str,
}

impl LogNetwork {
    pub fn new(topic: &'static str) -> Self {
        Self { topic }
    }
}

impl NetworkTransport for LogNetwork {
    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let text = String::from_utf8_lossy(payload);
        info!("PUB | topic={} | {}", self.topic, text.trim_end());
        Ok(())
    }
}

/// No bearer: every send fails with [`TransportError::NotConnected`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNetwork;

impl NetworkTransport for NullNetwork {
    fn send(&mut self, _payload: &[u8]) -> Result<(), TransportError> {
        Err(TransportError::NotConnected)
    }
}
