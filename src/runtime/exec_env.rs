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
//! Process-wide execution environment for the result delivery layer.
//!
//! Mirrors the BE `ExecEnv` start-up order: the result buffer manager is created
//! and its cancel thread started once, before any fragment or fetch request is
//! served.

use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};

use crate::common::status::{ResultError, ResultStatus};
use crate::resultd_logging::info;
use crate::runtime::result_buffer_mgr::{ResultBufferMgr, ResultBufferMgrOptions};

static RESULT_BUFFER_MGR: OnceLock<Arc<ResultBufferMgr>> = OnceLock::new();

/// Create the node's result buffer manager and start its sweeper.
///
/// Later calls return the existing manager; `options` only applies to the first.
pub fn init(options: ResultBufferMgrOptions) -> Result<Arc<ResultBufferMgr>> {
    let mgr = RESULT_BUFFER_MGR.get_or_init(|| Arc::new(ResultBufferMgr::new(options)));
    mgr.init()
        .context("start result buffer cancel thread")?;
    info!(
        "result buffer manager initialized: capacity={}, sweep_interval={:?}",
        mgr.options().buffer_capacity,
        mgr.options().sweep_interval
    );
    Ok(Arc::clone(mgr))
}

pub fn init_from_config() -> Result<Arc<ResultBufferMgr>> {
    init(ResultBufferMgrOptions::from_config())
}

pub fn result_buffer_mgr() -> ResultStatus<Arc<ResultBufferMgr>> {
    RESULT_BUFFER_MGR
        .get()
        .cloned()
        .ok_or_else(|| ResultError::not_initialized("result buffer manager is not initialized"))
}

/// Stop and join the cancel sweeper. Registered buffers are left as they are.
pub fn shutdown() {
    if let Some(mgr) = RESULT_BUFFER_MGR.get() {
        mgr.stop();
    }
}
