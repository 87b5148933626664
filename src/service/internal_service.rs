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
//! Request-level entry points of the result delivery layer.
//!
//! Wire framing is out of scope; transports decode their requests into the
//! parameter structs below and map `ResultErrorKind` back onto their status codes.

use std::sync::Arc;
use std::time::Duration;

use crate::common::status::{ResultError, ResultStatus};
use crate::common::types::{FetchResult, UniqueId};
use crate::resultd_logging::{debug, info};
use crate::runtime::exec_env;
use crate::runtime::result_buffer_mgr::ResultBufferMgr;
use crate::service::result_sink::ResultSink;

#[derive(Clone, Debug, Default)]
pub struct FetchDataParams {
    pub query_id: Option<UniqueId>,
}

#[derive(Clone, Debug, Default)]
pub struct CancelParams {
    pub query_id: Option<UniqueId>,
    pub reason: Option<String>,
}

fn require_query_id(query_id: Option<UniqueId>) -> ResultStatus<UniqueId> {
    query_id.ok_or_else(|| ResultError::invalid_argument("missing query_id"))
}

/// Entry points bound to one result buffer manager.
#[derive(Clone, Debug)]
pub struct InternalService {
    mgr: Arc<ResultBufferMgr>,
}

impl InternalService {
    pub fn new(mgr: Arc<ResultBufferMgr>) -> Self {
        Self { mgr }
    }

    /// Bind to the process-wide manager; fails until `exec_env::init` has run.
    pub fn from_exec_env() -> ResultStatus<Self> {
        Ok(Self::new(exec_env::result_buffer_mgr()?))
    }

    pub fn fetch_data(&self, params: &FetchDataParams) -> ResultStatus<FetchResult> {
        let query_id = require_query_id(params.query_id)?;
        self.mgr.fetch_data(query_id)
    }

    pub fn cancel_plan_fragment(&self, params: &CancelParams) -> ResultStatus<()> {
        let query_id = require_query_id(params.query_id)?;
        info!(
            "cancel result buffer: query={}, reason={}",
            query_id,
            params.reason.as_deref().unwrap_or("unknown")
        );
        self.mgr.cancel(query_id);
        Ok(())
    }

    /// Admission hook: cancel the query's results once `timeout` has elapsed.
    pub fn register_query_timeout(
        &self,
        query_id: Option<UniqueId>,
        timeout: Duration,
    ) -> ResultStatus<()> {
        let query_id = require_query_id(query_id)?;
        if timeout.is_zero() {
            return Err(ResultError::invalid_argument(
                "query timeout must be positive",
            ));
        }
        debug!(
            "register query timeout: query={}, timeout={:?}",
            query_id, timeout
        );
        self.mgr.cancel_after(timeout, query_id);
        Ok(())
    }

    pub fn open_result_sink(&self, query_id: Option<UniqueId>) -> ResultStatus<ResultSink> {
        let query_id = require_query_id(query_id)?;
        Ok(ResultSink::open_default(&self.mgr, query_id))
    }
}

pub fn fetch_data(params: &FetchDataParams) -> ResultStatus<FetchResult> {
    InternalService::from_exec_env()?.fetch_data(params)
}

pub fn cancel_plan_fragment(params: &CancelParams) -> ResultStatus<()> {
    InternalService::from_exec_env()?.cancel_plan_fragment(params)
}

pub fn register_query_timeout(query_id: Option<UniqueId>, timeout: Duration) -> ResultStatus<()> {
    InternalService::from_exec_env()?.register_query_timeout(query_id, timeout)
}

pub fn open_result_sink(query_id: Option<UniqueId>) -> ResultStatus<ResultSink> {
    InternalService::from_exec_env()?.open_result_sink(query_id)
}
