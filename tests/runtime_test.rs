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
//! Integration tests for the result buffer and its manager.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use crate::common::{batch, run_with_timeout, unique_query_id, wait_for};
use resultd::common::status::ResultErrorKind;
use resultd::runtime::cancel_scheduler::unix_now_secs;
use resultd::runtime::result_buffer::BufferControlBlock;
use resultd::runtime::result_buffer_mgr::{ResultBufferMgr, ResultBufferMgrOptions};

mod common;

fn test_mgr() -> Arc<ResultBufferMgr> {
    Arc::new(ResultBufferMgr::new(ResultBufferMgrOptions {
        buffer_capacity: 4,
        fetch_wait: Some(Duration::from_secs(10)),
        sweep_interval: Duration::from_millis(50),
        sweep_lookahead_secs: 0,
    }))
}

#[test]
fn test_push_close_then_fetch_in_order() {
    let mgr = test_mgr();
    let id = unique_query_id("test_push_close_then_fetch_in_order");
    let block = mgr.create_sender(id, 4);
    block.push(batch("B1")).expect("push B1");
    block.push(batch("B2")).expect("push B2");
    block.close();

    assert_eq!(mgr.fetch_data(id).expect("B1").result_batch, batch("B1"));
    assert_eq!(mgr.fetch_data(id).expect("B2").result_batch, batch("B2"));
    assert!(mgr.fetch_data(id).expect("eos").eos);
}

#[test]
fn test_push_cancel_then_fetch_is_cancelled() {
    let id = unique_query_id("test_push_cancel_then_fetch_is_cancelled");
    let block = BufferControlBlock::new(id, 4);
    block.push(batch("B1")).expect("push B1");
    block.cancel();
    let err = block.get_batch(None).expect_err("cancelled");
    assert_eq!(err.kind, ResultErrorKind::Cancelled);
}

#[test]
fn test_capacity_one_backpressure() {
    let id = unique_query_id("test_capacity_one_backpressure");
    let block = Arc::new(BufferControlBlock::new(id, 1));
    block.push(batch("B1")).expect("push B1");

    let (tx, rx) = mpsc::channel();
    let producer = Arc::clone(&block);
    let pusher = thread::spawn(move || {
        producer.push(batch("B2")).expect("push B2");
        tx.send(()).expect("signal");
    });

    assert!(
        rx.recv_timeout(Duration::from_millis(150)).is_err(),
        "second push should block while the buffer is full"
    );
    assert_eq!(block.get_batch(None).expect("B1").result_batch, batch("B1"));
    rx.recv_timeout(Duration::from_secs(5))
        .expect("second push completes after dequeue");
    pusher.join().expect("join");
    assert_eq!(block.get_batch(None).expect("B2").result_batch, batch("B2"));
}

#[test]
fn test_concurrent_producer_consumer_preserves_order() {
    const TOTAL: usize = 500;
    let id = unique_query_id("test_concurrent_producer_consumer_preserves_order");
    let block = Arc::new(BufferControlBlock::new(id, 3));

    let producer = Arc::clone(&block);
    let pusher = thread::spawn(move || {
        for i in 0..TOTAL {
            producer.push(batch(&i.to_string())).expect("push");
        }
        producer.close();
    });

    let received = run_with_timeout(Duration::from_secs(20), move || {
        let mut out = Vec::new();
        loop {
            let res = block.get_batch(None).expect("fetch");
            if res.eos {
                break;
            }
            out.push(res);
        }
        out
    });
    pusher.join().expect("join");

    assert_eq!(received.len(), TOTAL);
    for (i, res) in received.iter().enumerate() {
        assert_eq!(res.result_batch, batch(&i.to_string()));
        assert_eq!(res.packet_seq, i as i64);
    }
}

#[test]
fn test_cancel_unblocks_fetch_promptly() {
    let mgr = test_mgr();
    let id = unique_query_id("test_cancel_unblocks_fetch_promptly");
    mgr.create_sender(id, 4);

    let fetcher = Arc::clone(&mgr);
    let waiter = thread::spawn(move || fetcher.fetch_data_with_timeout(id, None));
    thread::sleep(Duration::from_millis(100));

    let start = Instant::now();
    mgr.cancel(id);
    let err = run_with_timeout(Duration::from_secs(5), move || {
        waiter.join().expect("join").expect_err("cancelled")
    });
    assert_eq!(err.kind, ResultErrorKind::Cancelled);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_concurrent_create_returns_same_buffer() {
    let mgr = test_mgr();
    let id = unique_query_id("test_concurrent_create_returns_same_buffer");
    let first = mgr.create_sender(id, 4);
    first.push(batch("kept")).expect("push");

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let mgr = Arc::clone(&mgr);
            thread::spawn(move || mgr.create_sender(id, 4))
        })
        .collect();
    for handle in handles {
        let block = handle.join().expect("join");
        assert!(Arc::ptr_eq(&first, &block));
    }
    assert_eq!(mgr.len(), 1);
    assert_eq!(mgr.fetch_data(id).expect("kept").result_batch, batch("kept"));
}

#[test]
fn test_scheduled_cancel_fires_after_deadline() {
    let mgr = test_mgr();
    mgr.init().expect("init");
    let id = unique_query_id("test_scheduled_cancel_fires_after_deadline");
    let block = mgr.create_sender(id, 4);

    let deadline = unix_now_secs() + 1;
    mgr.cancel_at_time(deadline, id);
    assert!(wait_for(
        || mgr.find_control_block(id).is_none(),
        Duration::from_secs(5)
    ));
    // Never before the deadline second.
    assert!(unix_now_secs() >= deadline);
    assert!(block.is_cancelled());
    assert!(mgr.fetch_data(id).expect_err("gone").is_not_found());
    mgr.stop();
}

#[test]
fn test_relative_deadline_late_in_second_never_fires_early() {
    let mgr = Arc::new(ResultBufferMgr::new(ResultBufferMgrOptions {
        sweep_interval: Duration::from_millis(10),
        ..ResultBufferMgrOptions::default()
    }));
    mgr.init().expect("init");
    let id = unique_query_id("test_relative_deadline_late_in_second_never_fires_early");
    mgr.create_sender(id, 4);

    assert!(wait_for(
        || chrono::Utc::now().timestamp_subsec_millis() >= 850,
        Duration::from_secs(2)
    ));
    let timeout = Duration::from_secs(1);
    let start = Instant::now();
    mgr.cancel_after(timeout, id);
    assert!(wait_for(
        || mgr.find_control_block(id).is_none(),
        Duration::from_secs(5)
    ));
    assert!(
        start.elapsed() >= timeout,
        "cancelled after {:?}",
        start.elapsed()
    );
    mgr.stop();
}

#[test]
fn test_stale_deadline_after_explicit_cancel_is_noop() {
    let mgr = test_mgr();
    mgr.init().expect("init");
    let id = unique_query_id("test_stale_deadline_after_explicit_cancel_is_noop");
    mgr.create_sender(id, 4);
    mgr.cancel_after(Duration::from_millis(1), id);
    mgr.cancel(id);

    assert!(wait_for(
        || mgr.scheduled_deadline_count() == 0,
        Duration::from_secs(5)
    ));
    assert!(mgr.is_empty());
}

#[test]
fn test_fetch_missing_or_cancelled_is_not_found() {
    let mgr = test_mgr();
    let never = unique_query_id("test_fetch_missing_never_created");
    let err = mgr.fetch_data(never).expect_err("missing");
    assert_eq!(err.kind, ResultErrorKind::NotFound);

    let id = unique_query_id("test_fetch_missing_or_cancelled_is_not_found");
    mgr.create_sender(id, 4);
    mgr.cancel(id);
    let err = mgr.fetch_data(id).expect_err("cancelled and removed");
    assert_eq!(err.kind, ResultErrorKind::NotFound);
}

#[test]
fn test_blocked_query_does_not_block_others() {
    let mgr = test_mgr();
    let slow = unique_query_id("test_blocked_query_does_not_block_others_slow");
    let fast = unique_query_id("test_blocked_query_does_not_block_others_fast");

    let slow_block = mgr.create_sender(slow, 1);
    slow_block.push(batch("fill")).expect("fill");
    let producer = Arc::clone(&slow_block);
    let blocked = thread::spawn(move || producer.push(batch("blocked")));

    let fast_mgr = Arc::clone(&mgr);
    run_with_timeout(Duration::from_secs(5), move || {
        let block = fast_mgr.create_sender(fast, 2);
        block.push(batch("x")).expect("push");
        block.close();
        assert_eq!(fast_mgr.fetch_data(fast).expect("x").result_batch, batch("x"));
        assert!(fast_mgr.fetch_data(fast).expect("eos").eos);
    });

    mgr.cancel(slow);
    let err = blocked.join().expect("join").expect_err("cancelled");
    assert!(err.is_cancelled());
}

#[test]
fn test_fetch_wait_bound_is_local() {
    let mgr = Arc::new(ResultBufferMgr::new(ResultBufferMgrOptions {
        fetch_wait: Some(Duration::from_millis(30)),
        ..ResultBufferMgrOptions::default()
    }));
    let id = unique_query_id("test_fetch_wait_bound_is_local");
    let block = mgr.create_sender(id, 4);
    let err = mgr.fetch_data(id).expect_err("timeout");
    assert_eq!(err.kind, ResultErrorKind::Timeout);
    assert!(!block.is_cancelled());
    assert!(mgr.find_control_block(id).is_some());
}
