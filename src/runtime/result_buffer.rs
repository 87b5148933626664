// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
//! Per-query bounded hand-off queue between result producers and the fetch path.
//!
//! State machine: `Open -> {Closed | Cancelled | Failed}`. Only `Open` blocks.
//! A closed buffer may still be cancelled, which abandons whatever the consumer
//! has not drained yet; `Cancelled` and `Failed` never change again.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::common::status::{ResultError, ResultStatus};
use crate::common::types::{FetchResult, ResultBatch, UniqueId};
use crate::resultd_logging::{debug, warn};
use crate::runtime::mem_tracker::{self, MemTracker, TrackedBytes};

const CANCELLED_MESSAGE: &str = "Cancelled";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferStatus {
    Open,
    Closed,
    Cancelled,
    Failed(ResultError),
}

impl BufferStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BufferStatus::Open)
    }
}

#[derive(Debug)]
struct QueuedBatch {
    batch: ResultBatch,
    _accounting: TrackedBytes,
}

#[derive(Debug)]
struct BufferState {
    queue: VecDeque<QueuedBatch>,
    status: BufferStatus,
    next_packet_seq: i64,
}

impl BufferState {
    fn take_seq(&mut self) -> i64 {
        let seq = self.next_packet_seq;
        self.next_packet_seq += 1;
        seq
    }

    /// Checks the terminal states a producer cannot push through.
    fn check_writable(&self) -> ResultStatus<()> {
        match &self.status {
            BufferStatus::Open => Ok(()),
            BufferStatus::Cancelled => Err(ResultError::cancelled(CANCELLED_MESSAGE)),
            BufferStatus::Failed(err) => Err(err.clone()),
            BufferStatus::Closed => Err(ResultError::invalid_argument(
                "result buffer is already closed",
            )),
        }
    }
}

/// Result buffer of one query (or fragment instance).
///
/// Shared through `Arc` between the producer, the fetch path and the manager;
/// the buffer lives as long as its longest holder.
#[derive(Debug)]
pub struct BufferControlBlock {
    query_id: UniqueId,
    capacity: usize,
    state: Mutex<BufferState>,
    data_arrival: Condvar,
    data_removal: Condvar,
    mem_tracker: Arc<MemTracker>,
}

impl BufferControlBlock {
    pub fn new(query_id: UniqueId, capacity: usize) -> Self {
        let label = format!("ResultBuffer: query={}", query_id);
        let parent = mem_tracker::result_buffers_mem_tracker();
        Self {
            query_id,
            capacity: capacity.max(1),
            state: Mutex::new(BufferState {
                queue: VecDeque::new(),
                status: BufferStatus::Open,
                next_packet_seq: 0,
            }),
            data_arrival: Condvar::new(),
            data_removal: Condvar::new(),
            mem_tracker: MemTracker::new_child(label, &parent),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().expect("result buffer lock")
    }

    fn enqueue(&self, state: &mut BufferState, batch: ResultBatch) {
        let accounting = TrackedBytes::new(batch.mem_bytes(), Arc::clone(&self.mem_tracker));
        state.queue.push_back(QueuedBatch {
            batch,
            _accounting: accounting,
        });
        self.data_arrival.notify_one();
    }

    fn wake_all(&self) {
        self.data_arrival.notify_all();
        self.data_removal.notify_all();
    }

    pub fn query_id(&self) -> UniqueId {
        self.query_id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn status(&self) -> BufferStatus {
        self.lock().status.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.lock().status, BufferStatus::Cancelled)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.lock().status, BufferStatus::Closed)
    }

    /// Bytes currently held by queued batches.
    pub fn buffered_bytes(&self) -> i64 {
        self.mem_tracker.current()
    }

    /// Enqueue a batch, blocking while the buffer is full.
    ///
    /// Fails with `Cancelled` if the buffer is or becomes cancelled while waiting,
    /// with the recorded error once the producer side failed, and with
    /// `InvalidArgument` after `close`.
    pub fn push(&self, batch: ResultBatch) -> ResultStatus<()> {
        let mut state = self.lock();
        loop {
            state.check_writable()?;
            if state.queue.len() < self.capacity {
                break;
            }
            state = self
                .data_removal
                .wait(state)
                .expect("result buffer data_removal wait");
        }
        self.enqueue(&mut state, batch);
        Ok(())
    }

    /// Non-blocking `push`: hands the batch back when the buffer is full.
    pub fn try_push(&self, batch: ResultBatch) -> ResultStatus<Option<ResultBatch>> {
        let mut state = self.lock();
        state.check_writable()?;
        if state.queue.len() >= self.capacity {
            return Ok(Some(batch));
        }
        self.enqueue(&mut state, batch);
        Ok(None)
    }

    /// Mark end-of-stream. Batches already queued are still delivered first.
    pub fn close(&self) {
        let mut state = self.lock();
        if state.status == BufferStatus::Open {
            state.status = BufferStatus::Closed;
            self.wake_all();
        }
    }

    /// Cancel the buffer and wake every waiter. Queued batches are dropped.
    ///
    /// Returns `false` if the buffer was already cancelled or failed.
    pub fn cancel(&self) -> bool {
        match self.mark_cancelled() {
            Some(abandoned) => {
                debug!(
                    "result buffer cancelled: query={}, abandoned_batches={}",
                    self.query_id, abandoned
                );
                true
            }
            None => false,
        }
    }

    /// `cancel` without logging, for callers that hold other locks. Returns the
    /// number of abandoned batches, or `None` if already cancelled or failed.
    pub(crate) fn mark_cancelled(&self) -> Option<usize> {
        let mut state = self.lock();
        if matches!(
            state.status,
            BufferStatus::Cancelled | BufferStatus::Failed(_)
        ) {
            self.wake_all();
            return None;
        }
        let abandoned = state.queue.len();
        state.status = BufferStatus::Cancelled;
        state.queue.clear();
        self.wake_all();
        Some(abandoned)
    }

    /// Record the producer's failure. Only the first error is kept; it is then
    /// replayed to every later fetch and push.
    ///
    /// Returns `false` if the buffer had already reached a terminal state.
    pub fn set_error(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        let mut state = self.lock();
        if state.status != BufferStatus::Open {
            return false;
        }
        warn!(
            "result buffer failed: query={}, error={}",
            self.query_id, message
        );
        state.status = BufferStatus::Failed(ResultError::failed(message));
        state.queue.clear();
        self.wake_all();
        true
    }

    /// Take the next batch in push order.
    ///
    /// Blocks while the buffer is open and empty. `timeout` bounds only this call;
    /// when it elapses the caller gets `Timeout` and the buffer is left untouched.
    pub fn get_batch(&self, timeout: Option<Duration>) -> ResultStatus<FetchResult> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.lock();
        loop {
            match &state.status {
                BufferStatus::Cancelled => {
                    return Err(ResultError::cancelled(CANCELLED_MESSAGE));
                }
                BufferStatus::Failed(err) => return Err(err.clone()),
                BufferStatus::Open | BufferStatus::Closed => {}
            }
            if let Some(queued) = state.queue.pop_front() {
                let packet_seq = state.take_seq();
                self.data_removal.notify_one();
                return Ok(FetchResult {
                    packet_seq,
                    eos: false,
                    result_batch: queued.batch,
                });
            }
            if state.status == BufferStatus::Closed {
                let packet_seq = state.take_seq();
                return Ok(FetchResult {
                    packet_seq,
                    eos: true,
                    result_batch: ResultBatch::empty(),
                });
            }

            state = match deadline {
                None => self
                    .data_arrival
                    .wait(state)
                    .expect("result buffer data_arrival wait"),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(ResultError::timeout(format!(
                            "timeout waiting for result after {:?}",
                            timeout.unwrap_or_default()
                        )));
                    }
                    let (guard, _) = self
                        .data_arrival
                        .wait_timeout(state, deadline - now)
                        .expect("result buffer data_arrival wait");
                    guard
                }
            };
        }
    }
}
