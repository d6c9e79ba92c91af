use std::sync::Arc;

use tokio::sync::mpsc;

/// EngineMessage is posted by jobs on any worker towards the engine. Posting
/// never blocks and never fails the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineMessage {
    /// AllocateVideoPacketCache asks for a packet cache for the outbound
    /// stream `ssrc` of endpoint `endpoint_id`.
    AllocateVideoPacketCache { ssrc: u32, endpoint_id: Arc<str> },
}

pub type EngineMessageSender = mpsc::UnboundedSender<EngineMessage>;
pub type EngineMessageReceiver = mpsc::UnboundedReceiver<EngineMessage>;

pub(crate) fn post(messages: &EngineMessageSender, message: EngineMessage) {
    if let Err(err) = messages.send(message) {
        log::debug!("engine stopped, discarding {:?}", err.0);
    }
}
