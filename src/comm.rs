//! Message-passing communicators.
//!
//! The core only relies on a handful of collectives. All of them are expressed through
//! [`Communicator::all_to_all`], which exchanges one byte buffer between every pair of ranks.
//! Every rank must call the same sequence of collectives.
use crate::error::{Error, Result};
use crossbeam::channel::{unbounded, Receiver, Sender};
use log::trace;
use mpfe_pack::{PackBuffer, Pod, UnpackBuffer};
use parking_lot::Mutex;
use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

pub trait Communicator: Send + Sync + Debug {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Sends `send[r]` to rank `r` and returns the buffers received from every rank,
    /// indexed by source rank.
    fn all_to_all(&self, send: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>>;

    fn barrier(&self) -> Result<()> {
        self.all_to_all(vec![Vec::new(); self.size()]).map(|_| ())
    }

    /// Sends the same buffer to every rank.
    fn all_gather(&self, data: Vec<u8>) -> Result<Vec<Vec<u8>>> {
        self.all_to_all(vec![data; self.size()])
    }
}

/// Gathers one POD value from every rank, indexed by rank.
pub fn all_gather_pod<P: Pod>(comm: &dyn Communicator, value: P) -> Result<Vec<P>> {
    let mut bytes = vec![0u8; P::SIZE];
    value.write_le(&mut bytes);
    comm.all_gather(bytes)?
        .iter()
        .map(|bytes| UnpackBuffer::new(bytes).extract_pod().map_err(Error::from))
        .collect()
}

/// Gathers a slice of POD values from every rank, indexed by rank.
pub fn all_gather_array<P: Pod>(comm: &dyn Communicator, values: &[P]) -> Result<Vec<Vec<P>>> {
    comm.all_gather(pack_array(values)?)?
        .iter()
        .map(|bytes| unpack_array(bytes))
        .collect()
}

/// Sums a value over all ranks. The summation is performed in rank order on every rank,
/// so that all ranks obtain bitwise identical results.
pub fn sum_all(comm: &dyn Communicator, value: f64) -> Result<f64> {
    Ok(all_gather_pod(comm, value)?.into_iter().sum())
}

pub fn sum_all_usize(comm: &dyn Communicator, value: usize) -> Result<usize> {
    Ok(all_gather_pod(comm, value)?.into_iter().sum())
}

pub fn max_all_usize(comm: &dyn Communicator, value: usize) -> Result<usize> {
    Ok(all_gather_pod(comm, value)?.into_iter().max().unwrap_or(0))
}

pub(crate) fn pack_array<P: Pod>(values: &[P]) -> Result<Vec<u8>> {
    let mut buffer = PackBuffer::new();
    for phase in 0..2 {
        if phase == 1 {
            buffer.start_packing();
        }
        buffer.add_pod(values.len())?;
        buffer.add_array(values)?;
    }
    Ok(buffer.finish()?)
}

pub(crate) fn unpack_array<P: Pod>(bytes: &[u8]) -> Result<Vec<P>> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    let mut reader = UnpackBuffer::new(bytes);
    let len: usize = reader.extract_pod()?;
    Ok(reader.extract_array(len)?)
}

/// Communicator for a single process.
#[derive(Debug, Clone, Default)]
pub struct SerialCommunicator;

impl SerialCommunicator {
    pub fn new() -> Self {
        Self
    }

    pub fn shared() -> Arc<dyn Communicator> {
        Arc::new(Self)
    }
}

impl Communicator for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_to_all(&self, send: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>> {
        if send.len() != 1 {
            return Err(Error::Communication(format!(
                "Expected 1 send buffer, got {}",
                send.len()
            )));
        }
        Ok(send)
    }
}

#[derive(Debug)]
struct Message {
    source: usize,
    round: u64,
    payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct ChannelState {
    round: u64,
    // Messages that arrived ahead of the collective they belong to
    pending: Vec<Message>,
}

/// In-process communicator where every rank runs on its own thread.
///
/// Messages are tagged with the index of the collective they belong to, so that a fast rank
/// can enter the next collective before a slow rank has finished the previous one.
pub struct ChannelCommunicator {
    rank: usize,
    size: usize,
    senders: Vec<Sender<Message>>,
    receiver: Receiver<Message>,
    state: Mutex<ChannelState>,
    timeout: Duration,
}

impl Debug for ChannelCommunicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelCommunicator")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl ChannelCommunicator {
    /// Creates connected communicators for `size` ranks, indexed by rank.
    pub fn create(size: usize) -> Vec<Self> {
        assert!(size > 0, "Communicator size must be positive");
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| unbounded()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, receiver)| Self {
                rank,
                size,
                senders: senders.clone(),
                receiver,
                state: Mutex::new(ChannelState::default()),
                timeout: Duration::from_secs(60),
            })
            .collect()
    }

    /// Runs `f` on `size` threads, one per rank, and returns the results indexed by rank.
    ///
    /// A panic on any rank is propagated to the caller.
    pub fn run<R, F>(size: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(Arc<dyn Communicator>) -> R + Sync,
    {
        let communicators = Self::create(size);
        let f = &f;
        let joined = crossbeam::thread::scope(|scope| {
            let handles: Vec<_> = communicators
                .into_iter()
                .map(|comm| scope.spawn(move |_| f(Arc::new(comm))))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join())
                .collect::<Vec<_>>()
        });
        match joined {
            Ok(results) => results
                .into_iter()
                .map(|result| result.unwrap_or_else(|payload| std::panic::resume_unwind(payload)))
                .collect(),
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }
}

impl Communicator for ChannelCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn all_to_all(&self, send: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>> {
        if send.len() != self.size {
            return Err(Error::Communication(format!(
                "Expected {} send buffers, got {}",
                self.size,
                send.len()
            )));
        }

        let mut state = self.state.lock();
        let round = state.round;
        state.round += 1;

        for (target, payload) in send.into_iter().enumerate() {
            self.senders[target]
                .send(Message {
                    source: self.rank,
                    round,
                    payload,
                })
                .map_err(|_| Error::Communication(format!("Rank {} is no longer reachable", target)))?;
        }

        let mut received: Vec<Option<Vec<u8>>> = vec![None; self.size];
        let mut remaining = self.size;

        let mut i = 0;
        while i < state.pending.len() {
            if state.pending[i].round == round {
                let message = state.pending.swap_remove(i);
                received[message.source] = Some(message.payload);
                remaining -= 1;
            } else {
                i += 1;
            }
        }

        while remaining > 0 {
            let message = self.receiver.recv_timeout(self.timeout).map_err(|err| {
                Error::Communication(format!(
                    "Rank {} failed to receive in collective {}: {}",
                    self.rank, round, err
                ))
            })?;
            if message.round == round {
                received[message.source] = Some(message.payload);
                remaining -= 1;
            } else {
                state.pending.push(message);
            }
        }
        trace!("Rank {} completed collective {}", self.rank, round);

        Ok(received.into_iter().map(Option::unwrap_or_default).collect())
    }
}
