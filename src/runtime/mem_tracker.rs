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
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, OnceLock};

/// Logical byte accounting for result batches sitting in buffers.
///
/// Only bytes explicitly reported by callers are counted; this is not a view of
/// process RSS. Consumption propagates to every ancestor.
#[derive(Debug)]
pub struct MemTracker {
    label: String,
    parent: Option<Arc<MemTracker>>,
    current: AtomicI64,
    peak: AtomicI64,
}

impl MemTracker {
    pub fn new_root(label: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            parent: None,
            current: AtomicI64::new(0),
            peak: AtomicI64::new(0),
        })
    }

    pub fn new_child(label: impl Into<String>, parent: &Arc<MemTracker>) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            parent: Some(Arc::clone(parent)),
            current: AtomicI64::new(0),
            peak: AtomicI64::new(0),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn current(&self) -> i64 {
        self.current.load(Ordering::Relaxed)
    }

    pub fn peak(&self) -> i64 {
        self.peak.load(Ordering::Relaxed)
    }

    fn ancestors(&self) -> impl Iterator<Item = &MemTracker> {
        std::iter::successors(Some(self), |t| t.parent.as_deref())
    }

    pub fn consume(&self, bytes: i64) {
        if bytes <= 0 {
            return;
        }
        for tracker in self.ancestors() {
            let now = tracker.current.fetch_add(bytes, Ordering::AcqRel) + bytes;
            tracker.peak.fetch_max(now, Ordering::AcqRel);
        }
    }

    pub fn release(&self, bytes: i64) {
        if bytes <= 0 {
            return;
        }
        for tracker in self.ancestors() {
            tracker.current.fetch_sub(bytes, Ordering::AcqRel);
        }
    }
}

/// Bytes charged to a tracker for as long as this guard lives.
#[derive(Debug)]
pub struct TrackedBytes {
    bytes: i64,
    tracker: Arc<MemTracker>,
}

impl TrackedBytes {
    pub fn new(bytes: usize, tracker: Arc<MemTracker>) -> Self {
        let bytes = i64::try_from(bytes).unwrap_or(i64::MAX);
        tracker.consume(bytes);
        Self { bytes, tracker }
    }
}

impl Drop for TrackedBytes {
    fn drop(&mut self) {
        self.tracker.release(self.bytes);
    }
}

static PROCESS_TRACKER: OnceLock<Arc<MemTracker>> = OnceLock::new();
static RESULT_BUFFERS_TRACKER: OnceLock<Arc<MemTracker>> = OnceLock::new();

pub fn process_mem_tracker() -> Arc<MemTracker> {
    Arc::clone(PROCESS_TRACKER.get_or_init(|| MemTracker::new_root("process")))
}

/// Parent of every per-query result buffer tracker.
pub fn result_buffers_mem_tracker() -> Arc<MemTracker> {
    Arc::clone(RESULT_BUFFERS_TRACKER.get_or_init(|| {
        MemTracker::new_child("result_buffers", &process_mem_tracker())
    }))
}
