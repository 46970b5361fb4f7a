//! Transport Task Trait Definition
//!
//! Defines the interface a transport adapter implements to plug into the
//! runtime. The adapter owns signaling, NAT traversal and reliable ordered
//! delivery; the core only sees it through channels.

use crate::channel::{EffectReceiver, EventSender};
use crate::errors::ChatResult;

// ----------------------------------------------------------------------------
// Transport Task Trait
// ----------------------------------------------------------------------------

/// Common interface for transport tasks
///
/// Each transport task:
/// - Runs independently with its own async event loop via the `run()` method
/// - Receives effects from Core Logic via `EffectReceiver` channel
/// - Sends events to Core Logic via `EventSender` channel
/// - Delivers events for one connection in the order the bytes arrived
/// - Lifecycle (spawning/aborting) is managed by the runtime
#[async_trait::async_trait]
pub trait TransportTask: Send + Sync {
    /// Attach CSP channels created by the runtime
    fn attach_channels(
        &mut self,
        event_sender: EventSender,
        effect_receiver: EffectReceiver,
    ) -> ChatResult<()>;

    /// Run until the effect channel closes
    async fn run(&mut self) -> ChatResult<()>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}
