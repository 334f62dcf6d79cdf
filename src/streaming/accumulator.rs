//! Packet to fragment accumulation.
//!
//! A provider's [`StreamAdapter`] turns each decoded packet into fragments;
//! [`process_packets`] validates them, folds them into the call's
//! [`GenResult`] and forwards them to the caller.

use crate::error::LlmError;
use crate::types::{FinishReason, Fragment, GenResult, Usage};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

/// What one packet contributed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PacketUpdate {
    pub fragments: Vec<Fragment>,
    /// Replaces the usage recorded so far.
    pub usage: Option<Usage>,
    /// Replaces the finish reason recorded so far.
    pub finish_reason: Option<FinishReason>,
}

impl PacketUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fragment(fragment: Fragment) -> Self {
        Self {
            fragments: vec![fragment],
            ..Default::default()
        }
    }

    pub fn push(&mut self, fragment: Fragment) {
        self.fragments.push(fragment);
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_finish_reason(mut self, reason: FinishReason) -> Self {
        self.finish_reason = Some(reason);
        self
    }
}

/// Converts a provider's stream packets into fragments.
///
/// Adapters are stateful: a tool call whose arguments arrive over several
/// packets is buffered by the adapter and only emitted once complete.
pub trait StreamAdapter: Send + 'static {
    type Packet: DeserializeOwned + Send + 'static;

    fn process(&mut self, packet: Self::Packet) -> Result<PacketUpdate, LlmError>;

    /// Called once after the last packet to flush buffered state.
    fn finish(&mut self) -> Result<PacketUpdate, LlmError> {
        Ok(PacketUpdate::default())
    }
}

/// Fold every packet of `packets` into `result`, forwarding fragments to `fragments`.
///
/// Whatever the outcome, the packet channel is closed and drained before
/// returning so the producer never blocks on a full channel. If the fragment
/// receiver is dropped, folding continues without forwarding.
pub async fn process_packets<A: StreamAdapter>(
    adapter: &mut A,
    packets: &mut mpsc::Receiver<A::Packet>,
    fragments: &mpsc::Sender<Fragment>,
    result: &mut GenResult,
) -> Result<(), LlmError> {
    let outcome = fold_packets(adapter, packets, fragments, result).await;

    packets.close();
    let mut discarded = 0usize;
    while packets.recv().await.is_some() {
        discarded += 1;
    }
    if discarded > 0 {
        tracing::warn!(discarded, "stream ended early, discarded pending packets");
    }
    outcome
}

async fn fold_packets<A: StreamAdapter>(
    adapter: &mut A,
    packets: &mut mpsc::Receiver<A::Packet>,
    fragments: &mpsc::Sender<Fragment>,
    result: &mut GenResult,
) -> Result<(), LlmError> {
    let mut forwarding = true;
    while let Some(packet) = packets.recv().await {
        let update = adapter.process(packet)?;
        apply(update, fragments, result, &mut forwarding).await?;
    }
    let update = adapter.finish()?;
    apply(update, fragments, result, &mut forwarding).await
}

async fn apply(
    update: PacketUpdate,
    fragments: &mpsc::Sender<Fragment>,
    result: &mut GenResult,
    forwarding: &mut bool,
) -> Result<(), LlmError> {
    if let Some(usage) = update.usage {
        result.usage = usage;
    }
    if let Some(reason) = update.finish_reason {
        result.finish_reason = reason;
    }
    for fragment in update.fragments {
        if fragment.is_zero() {
            continue;
        }
        fragment.validate()?;
        result.accumulate(&fragment)?;
        if *forwarding && fragments.send(fragment).await.is_err() {
            tracing::debug!("fragment receiver dropped, folding without forwarding");
            *forwarding = false;
        }
    }
    Ok(())
}
