use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::{
    codec::{Codec, Frame},
    context::{ClientId, Context, Envelope, Role},
    errors::{AttachError, ClientError},
    message::Message,
};

/// A trading participant's endpoint.
///
/// `send` hands a message to the engine, waiting while the engine's backlog
/// is full. `get` waits for the next message addressed to this client.
/// Messages from one client reach the engine in the order they were sent.
/// Dropping the client detaches it.
#[derive(Debug)]
pub struct Client {
    id: ClientId,
    context: Context,
    codec: Codec,
    outbox: mpsc::Receiver<Frame>,
}

impl Client {
    /// Attaches a participant: it receives messages about its own orders and
    /// broadcasts.
    pub fn attach(context: &Context) -> Result<Self, AttachError> {
        Self::with_role(context, Role::Participant)
    }

    /// Attaches a monitor: it receives a copy of every message the engine emits.
    pub fn monitor(context: &Context) -> Result<Self, AttachError> {
        Self::with_role(context, Role::Monitor)
    }

    fn with_role(context: &Context, role: Role) -> Result<Self, AttachError> {
        let (id, outbox) = context.register(role)?;
        Ok(Self {
            id,
            context: context.clone(),
            codec: context.codec(),
            outbox,
        })
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub async fn send(&self, message: &Message) -> Result<(), ClientError> {
        let frame = self.codec.encode_frame(message)?;
        trace!(id = %self.id, ?message, "sending");
        self.context
            .inbound()
            .send(Envelope {
                from: self.id,
                frame,
            })
            .await
            .map_err(|_| ClientError::Closed)
    }

    /// Waits for the next message. Returns [`ClientError::Closed`] once the
    /// engine has shut down and everything it sent has been read.
    pub async fn get(&mut self) -> Result<Message, ClientError> {
        let frame = self.outbox.recv().await.ok_or(ClientError::Closed)?;
        let message = self.codec.decode_frame(&frame)?;
        debug!(id = %self.id, %message, "received");
        Ok(message)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.context.detach(self.id);
    }
}
