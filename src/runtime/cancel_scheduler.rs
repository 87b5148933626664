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
//! Deadline-driven cancellation of result buffers.
//!
//! Deadlines are bucketed per unix second in a `BTreeMap`, so each sweep splits off
//! exactly the expired prefix instead of scanning every registration. Entries for
//! queries that were already cancelled are not removed early; they expire and
//! resolve to no-op cancels.

use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::common::types::UniqueId;
use crate::resultd_logging::{debug, info};

/// Current wall clock in unix seconds, the unit of every deadline key.
pub fn unix_now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// First whole second at which `timeout` from now has fully elapsed.
pub fn deadline_after(timeout: Duration) -> i64 {
    deadline_from(chrono::Utc::now(), timeout)
}

fn deadline_from(now: DateTime<Utc>, timeout: Duration) -> i64 {
    // The sub-second part of `now` counts against the timeout, so round up.
    let nanos = u128::from(now.timestamp_subsec_nanos()) + timeout.as_nanos();
    let secs = i64::try_from(nanos.div_ceil(1_000_000_000)).unwrap_or(i64::MAX);
    now.timestamp().saturating_add(secs)
}

#[derive(Debug, Default)]
pub struct CancelScheduler {
    timeouts: Mutex<BTreeMap<i64, Vec<UniqueId>>>,
}

impl CancelScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `query_id` for cancellation at `cancel_time` (unix seconds).
    /// Repeated registrations are kept; each one fires.
    pub fn cancel_at(&self, cancel_time: i64, query_id: UniqueId) {
        let mut timeouts = self.timeouts.lock().expect("cancel scheduler lock");
        timeouts.entry(cancel_time).or_default().push(query_id);
    }

    /// Remove and return every id whose bucket key is `<= now + lookahead_secs`,
    /// in deadline order.
    pub fn take_expired(&self, now: i64, lookahead_secs: i64) -> Vec<UniqueId> {
        let bound = now.saturating_add(lookahead_secs.max(0));
        let mut timeouts = self.timeouts.lock().expect("cancel scheduler lock");
        let expired = match bound.checked_add(1) {
            Some(first_live) => {
                let live = timeouts.split_off(&first_live);
                std::mem::replace(&mut *timeouts, live)
            }
            None => std::mem::take(&mut *timeouts),
        };
        drop(timeouts);
        expired.into_values().flatten().collect()
    }

    /// Number of pending registrations across all buckets.
    pub fn len(&self) -> usize {
        let timeouts = self.timeouts.lock().expect("cancel scheduler lock");
        timeouts.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    cv: Condvar,
}

impl StopSignal {
    fn stop(&self) {
        let mut stopped = self.stopped.lock().expect("sweeper stop lock");
        *stopped = true;
        self.cv.notify_all();
    }

    /// Sleep for up to `timeout`; returns `true` once stop was requested.
    fn wait(&self, timeout: Duration) -> bool {
        let stopped = self.stopped.lock().expect("sweeper stop lock");
        let (stopped, _) = self
            .cv
            .wait_timeout_while(stopped, timeout, |stopped| !*stopped)
            .expect("sweeper stop wait");
        *stopped
    }
}

/// Background thread that periodically drains expired deadlines.
///
/// Stopping wakes the thread immediately and joins it, so the callback never
/// outlives the owner of this handle.
#[derive(Debug)]
pub struct CancelSweeper {
    stop: Arc<StopSignal>,
    handle: Option<JoinHandle<()>>,
}

impl CancelSweeper {
    pub fn spawn<F>(
        scheduler: Arc<CancelScheduler>,
        interval: Duration,
        lookahead_secs: i64,
        on_expired: F,
    ) -> io::Result<Self>
    where
        F: Fn(UniqueId) + Send + 'static,
    {
        let stop = Arc::new(StopSignal::default());
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("result_buffer_cancel".to_string())
            .spawn(move || {
                run_sweeper(&scheduler, &thread_stop, interval, lookahead_secs, on_expired)
            })?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn stop(&mut self) {
        self.stop.stop();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            crate::resultd_logging::error!("result buffer cancel thread panicked");
        }
    }
}

impl Drop for CancelSweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_sweeper<F>(
    scheduler: &CancelScheduler,
    stop: &StopSignal,
    interval: Duration,
    lookahead_secs: i64,
    on_expired: F,
) where
    F: Fn(UniqueId),
{
    info!(
        "result buffer cancel thread begin: interval={:?}, lookahead_secs={}",
        interval, lookahead_secs
    );
    loop {
        let expired = scheduler.take_expired(unix_now_secs(), lookahead_secs);
        for query_id in expired {
            debug!("cancel result buffer by deadline: query={}", query_id);
            on_expired(query_id);
        }
        if stop.wait(interval) {
            break;
        }
    }
    info!("result buffer cancel thread finish");
}
