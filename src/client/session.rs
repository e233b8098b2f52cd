use tokio::sync::mpsc;
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use crate::hub::filter::ClientFilter;

pub type ClientId = String;

/// A dashboard connection as the hub sees it.
///
/// The hub holds the only `sender`; dropping the session closes the queue and
/// ends the connection's write task.
#[derive(Debug)]
pub struct ClientSession {
    pub id: ClientId,
    pub sender: mpsc::Sender<WsMessage>,
    pub filter: ClientFilter,
}

impl ClientSession {
    pub fn new(sender: mpsc::Sender<WsMessage>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender,
            filter: ClientFilter::default(),
        }
    }

    /// A session plus the receiving end of its bounded outbound queue.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<WsMessage>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(tx), rx)
    }
}
