//! Transport: the boundary between the simulation and however bytes actually move between peers.
//! A concrete QUIC/TCP implementation is an external collaborator left for a later extension;
//! this crate ships [`InProcessTransport`], a channel pair used for singleplayer and tests.

use gv_schemas::wire::Message;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors a [`Transport`] implementation can report.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer disconnected; no further messages will arrive or be deliverable.
    #[error("peer disconnected")]
    Disconnected,
}

/// One end of a bidirectional connection carrying [`Message`] values. Implementations are
/// responsible for their own framing of `Message::encode`/`Message::decode` over the wire; the
/// in-process implementation below skips framing entirely since it never leaves the process.
pub trait Transport: Send {
    /// Queues a message for delivery to the peer. Never blocks.
    fn send(&self, msg: Message) -> Result<(), TransportError>;

    /// Returns the next message from the peer without blocking, or `None` if none has arrived
    /// yet. Returns `Err` once the peer has disconnected and no more messages will ever arrive.
    fn try_recv(&mut self) -> Result<Option<Message>, TransportError>;
}

/// An in-process, in-memory [`Transport`] backed by a pair of unbounded channels. Used for
/// singleplayer (client and server sharing one process) and integration tests.
pub struct InProcessTransport {
    outbound: mpsc::UnboundedSender<Message>,
    inbound: mpsc::UnboundedReceiver<Message>,
}

impl InProcessTransport {
    /// Creates a connected pair: messages sent on one end arrive on the other.
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            Self {
                outbound: a_tx,
                inbound: b_rx,
            },
            Self {
                outbound: b_tx,
                inbound: a_rx,
            },
        )
    }
}

impl Transport for InProcessTransport {
    fn send(&self, msg: Message) -> Result<(), TransportError> {
        self.outbound.send(msg).map_err(|_| TransportError::Disconnected)
    }

    fn try_recv(&mut self) -> Result<Option<Message>, TransportError> {
        match self.inbound.try_recv() {
            Ok(msg) => Ok(Some(msg)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(TransportError::Disconnected),
        }
    }
}

#[cfg(test)]
mod test {
    use gv_schemas::wire::{Message, PilotingInput};

    use super::*;

    fn piloting(seq: u32) -> Message {
        Message::PilotingInput(PilotingInput {
            sequence_number: seq,
            island_id: 1,
            thrust_y: 0.0,
            rotation_pitch: 0.0,
            rotation_yaw: 0.0,
            rotation_roll: 0.0,
        })
    }

    #[test]
    fn messages_sent_on_one_end_arrive_on_the_other() {
        let (mut client, mut server) = InProcessTransport::pair();
        client.send(piloting(1)).unwrap();
        assert!(matches!(server.try_recv().unwrap(), Some(Message::PilotingInput(p)) if p.sequence_number == 1));
        assert!(client.try_recv().unwrap().is_none());
    }

    #[test]
    fn dropping_one_end_disconnects_the_other() {
        let (client, mut server) = InProcessTransport::pair();
        drop(client);
        assert!(matches!(server.try_recv(), Err(TransportError::Disconnected)));
    }
}
