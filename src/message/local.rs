use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::error::{Error, Result};
use super::comm::Communicator;

/// A communicator between threads of one process, over crossbeam channels.
/// Each rank owns an inbox; sending pushes onto the destination's inbox and
/// never blocks. Use `ChannelCommunicator::group` to build a connected set,
/// then move one member onto each thread.
///
/// Receives block indefinitely unless a timeout is set, in which case a
/// collective whose peers never arrive fails with `CollectiveTimeout`.
///
pub struct ChannelCommunicator {
    rank: usize,
    peers: Vec<Sender<Vec<u8>>>,
    inbox: Receiver<Vec<u8>>,
    timeout: Option<Duration>,
}

impl ChannelCommunicator {
    pub fn group(size: usize) -> Vec<ChannelCommunicator> {
        let (peers, inboxes): (Vec<_>, Vec<_>) = (0..size).map(|_| crossbeam_channel::unbounded()).unzip();

        inboxes
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| ChannelCommunicator {
                rank,
                peers: peers.clone(),
                inbox,
                timeout: None,
            })
            .collect()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Communicator for ChannelCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn send(&self, rank: usize, message: Vec<u8>) -> Result<()> {
        let peer = self
            .peers
            .get(rank)
            .ok_or_else(|| Error::Communication(format!("no peer with rank {}", rank)))?;
        peer.send(message)
            .map_err(|e| Error::Communication(format!("send to {} failed: {}", rank, e)))
    }

    fn recv(&self) -> Result<Vec<u8>> {
        match self.timeout {
            Some(timeout) => self.inbox.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => Error::CollectiveTimeout(timeout),
                RecvTimeoutError::Disconnected => Error::Communication(e.to_string()),
            }),
            None => self
                .inbox
                .recv()
                .map_err(|e| Error::Communication(e.to_string())),
        }
    }
}
