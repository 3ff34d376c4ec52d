//! In-memory transport for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use super::transport::{Link, TextSink, TextStream, Transport, TransportError};

/// What the next `connect` does.
#[derive(Clone, Copy, Debug)]
pub enum Plan {
    Accept,
    Refuse,
}

/// Server side of one accepted fake link.
pub struct Peer {
    to_client: Option<mpsc::UnboundedSender<Result<String, TransportError>>>,
    pub from_client: mpsc::UnboundedReceiver<String>,
}

impl Peer {
    pub fn push(&self, text: &str) {
        self.to_client
            .as_ref()
            .expect("peer still connected")
            .send(Ok(text.to_owned()))
            .expect("client stream alive");
    }

    /// Drop the server half: the client sees its stream end.
    pub fn disconnect(&mut self) {
        self.to_client = None;
    }

    /// Next frame the client wrote.
    pub async fn recv(&mut self) -> String {
        timeout(Duration::from_secs(5), self.from_client.recv())
            .await
            .expect("frame timed out")
            .expect("client link alive")
    }
}

pub struct FakeTransport {
    plan: Mutex<VecDeque<Plan>>,
    connects: AtomicUsize,
    peers: mpsc::UnboundedSender<Peer>,
}

impl FakeTransport {
    /// Connects follow `plan`, then refuse.
    pub fn new(plan: &[Plan]) -> (Arc<Self>, mpsc::UnboundedReceiver<Peer>) {
        let (peers, peers_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            plan: Mutex::new(plan.iter().copied().collect()),
            connects: AtomicUsize::new(0),
            peers,
        });
        (transport, peers_rx)
    }

    pub fn push_plan(&self, step: Plan) {
        self.plan.lock().expect("plan lock").push_back(step);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, _url: &str) -> Result<Link, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let next = self.plan.lock().expect("plan lock").pop_front().unwrap_or(Plan::Refuse);
        if let Plan::Refuse = next {
            return Err(TransportError::Unavailable("refused".to_owned()));
        }

        let (to_client, client_rx) = mpsc::unbounded_channel::<Result<String, TransportError>>();
        let (client_tx, from_client) = mpsc::unbounded_channel::<String>();
        let stream: TextStream = Box::pin(futures_util::stream::unfold(client_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        }));
        let sink: TextSink = Box::pin(futures_util::sink::unfold(client_tx, |tx, text: String| async move {
            tx.send(text).map_err(|_| TransportError::Closed)?;
            Ok::<_, TransportError>(tx)
        }));
        self.peers
            .send(Peer { to_client: Some(to_client), from_client })
            .expect("test holds peer receiver");
        Ok(Link::new(sink, stream))
    }
}

/// Wait for the next accepted link.
pub async fn accept(peers: &mut mpsc::UnboundedReceiver<Peer>) -> Peer {
    timeout(Duration::from_secs(5), peers.recv())
        .await
        .expect("connect timed out")
        .expect("transport alive")
}
