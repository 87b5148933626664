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
//! Producer side of a query's result buffer.
//!
//! Fragment execution opens one sink per query, sends batches in completion
//! order and closes it with the fragment's final status. A sink dropped without
//! `close` cancels its own buffer; a newer buffer for the same query survives.

use std::sync::Arc;
use std::time::Duration;

use crate::common::config;
use crate::common::status::ResultStatus;
use crate::common::types::{ResultBatch, UniqueId};
use crate::resultd_logging::{debug, warn};
use crate::runtime::result_buffer::BufferControlBlock;
use crate::runtime::result_buffer_mgr::ResultBufferMgr;

pub struct ResultSink {
    query_id: UniqueId,
    mgr: Arc<ResultBufferMgr>,
    block: Arc<BufferControlBlock>,
    num_rows_sent: usize,
    closed: bool,
}

impl ResultSink {
    /// Register the buffer and schedule its cancellation `lifetime` from now, so
    /// results nobody fetches are eventually reclaimed.
    pub fn open(
        mgr: &Arc<ResultBufferMgr>,
        query_id: UniqueId,
        buffer_size: usize,
        lifetime: Duration,
    ) -> Self {
        let block = mgr.create_sender(query_id, buffer_size);
        mgr.cancel_after(lifetime, query_id);
        Self {
            query_id,
            mgr: Arc::clone(mgr),
            block,
            num_rows_sent: 0,
            closed: false,
        }
    }

    pub fn open_default(mgr: &Arc<ResultBufferMgr>, query_id: UniqueId) -> Self {
        Self::open(
            mgr,
            query_id,
            mgr.options().buffer_capacity,
            Duration::from_secs(config::result_buffer_cancelled_interval_secs()),
        )
    }

    pub fn query_id(&self) -> UniqueId {
        self.query_id
    }

    pub fn num_rows_sent(&self) -> usize {
        self.num_rows_sent
    }

    /// Blocks while the consumer is behind.
    pub fn send(&mut self, batch: ResultBatch) -> ResultStatus<()> {
        let rows = batch.num_rows;
        self.block.push(batch)?;
        self.num_rows_sent += rows;
        Ok(())
    }

    pub fn send_rows(&mut self, rows: Vec<Vec<u8>>) -> ResultStatus<()> {
        if rows.is_empty() {
            return Ok(());
        }
        self.send(ResultBatch::new(rows))
    }

    /// Finish the stream: end-of-stream on success, otherwise the error is
    /// recorded and replayed to the fetch path.
    pub fn close(mut self, status: Result<(), String>) {
        self.closed = true;
        match status {
            Ok(()) => {
                debug!(
                    "result sink closed: query={}, rows={}",
                    self.query_id, self.num_rows_sent
                );
                self.block.close();
            }
            Err(message) => {
                self.block.set_error(message);
            }
        }
    }
}

impl Drop for ResultSink {
    fn drop(&mut self) {
        if !self.closed {
            warn!(
                "result sink dropped before close, cancel buffer: query={}",
                self.query_id
            );
            self.mgr.cancel_sender(self.query_id, &self.block);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::status::ResultErrorKind;
    use crate::runtime::result_buffer_mgr::ResultBufferMgrOptions;

    fn mgr() -> Arc<ResultBufferMgr> {
        Arc::new(ResultBufferMgr::new(ResultBufferMgrOptions {
            buffer_capacity: 2,
            fetch_wait: Some(Duration::from_secs(5)),
            ..ResultBufferMgrOptions::default()
        }))
    }

    #[test]
    fn sink_streams_rows_and_eos() {
        let mgr = mgr();
        let id = UniqueId::new(11, 1);
        let mut sink = ResultSink::open_default(&mgr, id);
        sink.send_rows(vec![b"a".to_vec(), b"b".to_vec()]).expect("send");
        sink.send_rows(Vec::new()).expect("empty send");
        assert_eq!(sink.num_rows_sent(), 2);
        assert_eq!(mgr.scheduled_deadline_count(), 1);
        sink.close(Ok(()));

        let first = mgr.fetch_data(id).expect("batch");
        assert_eq!(first.result_batch.num_rows, 2);
        assert!(mgr.fetch_data(id).expect("eos").eos);
    }

    #[test]
    fn sink_failure_is_replayed_to_fetch() {
        let mgr = mgr();
        let id = UniqueId::new(11, 2);
        let sink = ResultSink::open_default(&mgr, id);
        sink.close(Err("alloc failed".to_string()));
        let err = mgr.fetch_data(id).expect_err("failed");
        assert_eq!(err.kind, ResultErrorKind::Failed);
        assert_eq!(err.message, "alloc failed");
    }

    #[test]
    fn dropped_sink_cancels_buffer() {
        let mgr = mgr();
        let id = UniqueId::new(11, 3);
        let block = {
            let sink = ResultSink::open_default(&mgr, id);
            mgr.find_control_block(sink.query_id()).expect("registered")
        };
        assert!(block.is_cancelled());
        assert!(mgr.fetch_data(id).expect_err("gone").is_not_found());
    }

    #[test]
    fn late_drop_of_cancelled_sink_keeps_retry_results() {
        let mgr = mgr();
        let id = UniqueId::new(11, 4);
        let old = ResultSink::open_default(&mgr, id);
        mgr.cancel(id);

        let mut retry = ResultSink::open_default(&mgr, id);
        retry.send_rows(vec![b"r".to_vec()]).expect("send");
        drop(old);

        let first = mgr.fetch_data(id).expect("retry batch");
        assert_eq!(first.result_batch.rows, vec![b"r".to_vec()]);
        retry.close(Ok(()));
        assert!(mgr.fetch_data(id).expect("eos").eos);
    }
}
