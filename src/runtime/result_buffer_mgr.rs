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
//! Node-wide registry of per-query result buffers.
//!
//! Responsibilities:
//! - Creates buffers idempotently per query id and hands out shared handles.
//! - Routes fetches to the right buffer; a missing buffer is a normal `NotFound`.
//! - Converges explicit, deadline and teardown cancellation on one operation.
//! - Owns the cancel sweeper thread and joins it before the map goes away.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::common::config;
use crate::common::status::{ResultError, ResultStatus};
use crate::common::types::{FetchResult, UniqueId};
use crate::resultd_logging::{debug, info, warn};
use crate::runtime::cancel_scheduler::{CancelScheduler, CancelSweeper, deadline_after};
use crate::runtime::result_buffer::BufferControlBlock;

#[derive(Clone, Debug)]
pub struct ResultBufferMgrOptions {
    pub buffer_capacity: usize,
    /// Local wait bound for `fetch_data`; `None` waits until a terminal outcome.
    pub fetch_wait: Option<Duration>,
    pub sweep_interval: Duration,
    pub sweep_lookahead_secs: i64,
}

impl Default for ResultBufferMgrOptions {
    fn default() -> Self {
        Self {
            buffer_capacity: 1024,
            fetch_wait: Some(Duration::from_secs(300)),
            sweep_interval: Duration::from_secs(1),
            sweep_lookahead_secs: 0,
        }
    }
}

impl ResultBufferMgrOptions {
    pub fn from_config() -> Self {
        Self {
            buffer_capacity: config::result_buffer_capacity(),
            fetch_wait: Some(config::fetch_wait()),
            sweep_interval: config::sweep_interval(),
            sweep_lookahead_secs: config::sweep_lookahead_secs(),
        }
    }
}

/// Query id -> buffer map. The lock is only held for map access and for flagging
/// a removed buffer as cancelled, never across a blocking buffer call.
#[derive(Debug, Default)]
struct BufferMap {
    buffers: Mutex<HashMap<UniqueId, Arc<BufferControlBlock>>>,
}

impl BufferMap {
    fn lock(&self) -> MutexGuard<'_, HashMap<UniqueId, Arc<BufferControlBlock>>> {
        self.buffers.lock().expect("result buffer map lock")
    }

    /// Returns the handle and whether it was created by this call.
    fn get_or_create(
        &self,
        query_id: UniqueId,
        capacity: usize,
    ) -> (Arc<BufferControlBlock>, bool) {
        let mut buffers = self.lock();
        if let Some(existing) = buffers.get(&query_id) {
            return (Arc::clone(existing), false);
        }
        let block = Arc::new(BufferControlBlock::new(query_id, capacity));
        buffers.insert(query_id, Arc::clone(&block));
        (block, true)
    }

    fn find(&self, query_id: UniqueId) -> Option<Arc<BufferControlBlock>> {
        self.lock().get(&query_id).cloned()
    }

    /// Removes the buffer and cancels it before the map lock is released, so a
    /// racing lookup either sees a cancelled buffer or nothing at all.
    ///
    /// Returns the number of abandoned batches, or `None` if nothing was registered.
    fn cancel(&self, query_id: UniqueId) -> Option<usize> {
        let mut buffers = self.lock();
        let block = buffers.remove(&query_id)?;
        Some(block.mark_cancelled().unwrap_or(0))
    }

    /// Like `cancel`, but only if `block` is still the buffer registered for
    /// `query_id`.
    fn cancel_if_same(
        &self,
        query_id: UniqueId,
        block: &Arc<BufferControlBlock>,
    ) -> Option<usize> {
        let mut buffers = self.lock();
        if !buffers
            .get(&query_id)
            .is_some_and(|current| Arc::ptr_eq(current, block))
        {
            return None;
        }
        buffers.remove(&query_id);
        Some(block.mark_cancelled().unwrap_or(0))
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Registry of result buffers on this node.
///
/// Call [`ResultBufferMgr::init`] to start deadline cancellation; the sweeper is
/// stopped and joined by [`ResultBufferMgr::stop`] or on drop.
#[derive(Debug)]
pub struct ResultBufferMgr {
    options: ResultBufferMgrOptions,
    buffers: Arc<BufferMap>,
    timeouts: Arc<CancelScheduler>,
    sweeper: Mutex<Option<CancelSweeper>>,
}

impl ResultBufferMgr {
    pub fn new(options: ResultBufferMgrOptions) -> Self {
        Self {
            options,
            buffers: Arc::new(BufferMap::default()),
            timeouts: Arc::new(CancelScheduler::new()),
            sweeper: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &ResultBufferMgrOptions {
        &self.options
    }

    /// Start the cancel sweeper. Calling it again while running is a no-op.
    pub fn init(&self) -> io::Result<()> {
        let mut sweeper = self.sweeper.lock().expect("result buffer sweeper lock");
        if sweeper.as_ref().is_some_and(CancelSweeper::is_running) {
            return Ok(());
        }
        let buffers = Arc::clone(&self.buffers);
        *sweeper = Some(CancelSweeper::spawn(
            Arc::clone(&self.timeouts),
            self.options.sweep_interval,
            self.options.sweep_lookahead_secs,
            move |query_id| {
                buffers.cancel(query_id);
            },
        )?);
        Ok(())
    }

    /// Stop and join the cancel sweeper. Buffers stay registered.
    pub fn stop(&self) {
        let sweeper = self
            .sweeper
            .lock()
            .expect("result buffer sweeper lock")
            .take();
        if let Some(mut sweeper) = sweeper {
            sweeper.stop();
            info!("result buffer manager stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.sweeper
            .lock()
            .expect("result buffer sweeper lock")
            .as_ref()
            .is_some_and(CancelSweeper::is_running)
    }

    /// Return the buffer for `query_id`, creating it with `buffer_size` slots if
    /// absent. A retried producer gets the original buffer, whatever its state.
    pub fn create_sender(
        &self,
        query_id: UniqueId,
        buffer_size: usize,
    ) -> Arc<BufferControlBlock> {
        let (block, created) = self.buffers.get_or_create(query_id, buffer_size);
        if created {
            debug!(
                "create result buffer: query={}, capacity={}",
                query_id,
                block.capacity()
            );
        } else {
            warn!(
                "already have buffer control block for this query: {}",
                query_id
            );
        }
        block
    }

    /// `create_sender` with the configured default capacity.
    pub fn create_default_sender(&self, query_id: UniqueId) -> Arc<BufferControlBlock> {
        self.create_sender(query_id, self.options.buffer_capacity)
    }

    pub fn find_control_block(&self, query_id: UniqueId) -> Option<Arc<BufferControlBlock>> {
        self.buffers.find(query_id)
    }

    /// Next result packet for `query_id`, waiting up to the configured fetch bound.
    pub fn fetch_data(&self, query_id: UniqueId) -> ResultStatus<FetchResult> {
        self.fetch_data_with_timeout(query_id, self.options.fetch_wait)
    }

    pub fn fetch_data_with_timeout(
        &self,
        query_id: UniqueId,
        timeout: Option<Duration>,
    ) -> ResultStatus<FetchResult> {
        let Some(block) = self.buffers.find(query_id) else {
            // The sender tore down its buffer, or it never existed.
            debug!("fetch: no result buffer for query={}", query_id);
            return Err(ResultError::not_found("no result for this query"));
        };
        block.get_batch(timeout)
    }

    /// Cancel and unregister the buffer. Unknown ids are ignored.
    pub fn cancel(&self, query_id: UniqueId) {
        if let Some(abandoned) = self.buffers.cancel(query_id) {
            debug!(
                "result buffer removed by cancel: query={}, abandoned_batches={}",
                query_id, abandoned
            );
        }
    }

    /// Owner teardown: cancel `block`, unregistering it only while it is still
    /// the buffer registered for `query_id`. A newer buffer created for the same
    /// query after `block` was cancelled is left alone.
    pub fn cancel_sender(&self, query_id: UniqueId, block: &Arc<BufferControlBlock>) {
        match self.buffers.cancel_if_same(query_id, block) {
            Some(abandoned) => debug!(
                "result buffer removed by owner: query={}, abandoned_batches={}",
                query_id, abandoned
            ),
            None => {
                block.cancel();
            }
        }
    }

    /// Cancel `query_id` once the wall clock reaches `cancel_time` (unix seconds).
    pub fn cancel_at_time(&self, cancel_time: i64, query_id: UniqueId) {
        self.timeouts.cancel_at(cancel_time, query_id);
    }

    /// Cancel `query_id` no earlier than `timeout` from now, rounded up to a second.
    pub fn cancel_after(&self, timeout: Duration, query_id: UniqueId) {
        self.cancel_at_time(deadline_after(timeout), query_id);
    }

    /// Number of registered buffers.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn scheduled_deadline_count(&self) -> usize {
        self.timeouts.len()
    }
}

impl Default for ResultBufferMgr {
    fn default() -> Self {
        Self::new(ResultBufferMgrOptions::default())
    }
}

impl Drop for ResultBufferMgr {
    fn drop(&mut self) {
        self.stop();
    }
}
