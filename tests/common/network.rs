use std::{
    collections::HashMap,
    sync::{
        mpsc::{self, Receiver, Sender, TryRecvError},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use poa_chain::{
    networking::{messages::Message, network::Network},
    types::data_types::PeerId,
};

/// A mock network stub which passes messages from and to threads using channels.
#[derive(Clone)]
pub(crate) struct NetworkStub {
    my_verifying_key: PeerId,
    all_peers: HashMap<PeerId, Sender<(PeerId, Message)>>,
    inbox: Arc<Mutex<Receiver<(PeerId, Message)>>>,
    dropped_peers: Arc<Mutex<Vec<PeerId>>>,
}

impl NetworkStub {
    pub(crate) fn my_verifying_key(&self) -> PeerId {
        self.my_verifying_key
    }

    /// Every peer this stub was asked to drop, in order.
    pub(crate) fn dropped_peers(&self) -> Vec<PeerId> {
        self.dropped_peers.lock().unwrap().clone()
    }

    /// Wait up to `timeout` for a message that `accept` returns `Some` for, discarding the others.
    pub(crate) fn recv_until<T>(
        &mut self,
        timeout: Duration,
        mut accept: impl FnMut(PeerId, Message) -> Option<T>,
    ) -> Option<T> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            match self.recv() {
                Some((origin, message)) => {
                    if let Some(accepted) = accept(origin, message) {
                        return Some(accepted);
                    }
                }
                None => thread::sleep(Duration::from_millis(1)),
            }
        }
        None
    }
}

impl Network for NetworkStub {
    fn send(&mut self, peer: PeerId, message: Message) {
        if let Some(peer) = self.all_peers.get(&peer) {
            let _ = peer.send((self.my_verifying_key, message));
        }
    }

    fn recv(&mut self) -> Option<(PeerId, Message)> {
        match self.inbox.lock().unwrap().try_recv() {
            Ok(o_m) => Some(o_m),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => panic!(),
        }
    }

    fn drop_peer(&mut self, peer: PeerId) {
        self.dropped_peers.lock().unwrap().push(peer);
    }
}

pub(crate) fn mock_network(peers: impl Iterator<Item = PeerId>) -> Vec<NetworkStub> {
    let mut all_peers = HashMap::new();
    let peer_and_inboxes: Vec<(PeerId, Receiver<(PeerId, Message)>)> = peers
        .map(|peer| {
            let (sender, receiver) = mpsc::channel();
            all_peers.insert(peer, sender);

            (peer, receiver)
        })
        .collect();

    peer_and_inboxes
        .into_iter()
        .map(|(my_verifying_key, inbox)| NetworkStub {
            my_verifying_key,
            all_peers: all_peers.clone(),
            inbox: Arc::new(Mutex::new(inbox)),
            dropped_peers: Arc::new(Mutex::new(Vec::new())),
        })
        .collect()
}
