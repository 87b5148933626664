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
//! Start-up ordering of the process-wide result buffer manager.
//!
//! Kept in its own test binary: the manager is a process-wide singleton and this
//! test must observe it before anything initializes it.

use std::time::Duration;

use resultd::common::status::ResultErrorKind;
use resultd::runtime::exec_env;
use resultd::runtime::result_buffer_mgr::ResultBufferMgrOptions;
use resultd::service::internal_service::{self, FetchDataParams};
use resultd::UniqueId;

#[test]
fn test_calls_before_init_are_not_initialized() {
    let err = exec_env::result_buffer_mgr().expect_err("not initialized yet");
    assert_eq!(err.kind, ResultErrorKind::NotInitialized);

    let params = FetchDataParams {
        query_id: Some(UniqueId::new(1, 2)),
    };
    let err = internal_service::fetch_data(&params).expect_err("not initialized yet");
    assert_eq!(err.kind, ResultErrorKind::NotInitialized);

    let mgr = exec_env::init(ResultBufferMgrOptions {
        sweep_interval: Duration::from_millis(20),
        ..ResultBufferMgrOptions::default()
    })
    .expect("init");
    assert!(mgr.is_running());

    let err = internal_service::fetch_data(&params).expect_err("unknown query");
    assert_eq!(err.kind, ResultErrorKind::NotFound);

    exec_env::shutdown();
    assert!(!mgr.is_running());
}
