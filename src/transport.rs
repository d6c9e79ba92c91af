use bytes::BytesMut;

use crate::job::JobCounter;

/// Transport is the secured connection towards one receiving endpoint.
/// Forwarding jobs hand packets over to it and stop caring about them.
pub trait Transport: Send + Sync {
    fn is_connected(&self) -> bool;

    /// protect_and_send takes ownership of a fully rewritten RTP packet,
    /// protects it and sends it on the network.
    fn protect_and_send(&self, packet: BytesMut);

    /// loggable_id identifies the transport in diagnostics.
    fn loggable_id(&self) -> &str;

    /// job_counter counts the forwarding jobs created for this transport and
    /// not yet finished.
    fn job_counter(&self) -> &JobCounter;
}
