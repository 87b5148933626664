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
use std::time::Duration;

use crate::resultd_config::config as resultd_app_config;

pub(crate) fn result_buffer_capacity() -> usize {
    resultd_app_config()
        .ok()
        .map(|c| c.result_buffer.buffer_capacity)
        .unwrap_or(1024)
}

pub(crate) fn fetch_wait() -> Duration {
    resultd_app_config()
        .ok()
        .map(|c| c.result_buffer.fetch_wait())
        .unwrap_or(Duration::from_millis(300_000))
}

pub(crate) fn result_buffer_cancelled_interval_secs() -> u64 {
    resultd_app_config()
        .ok()
        .map(|c| c.result_buffer.cancelled_interval_secs)
        .unwrap_or(300)
}

pub(crate) fn sweep_interval() -> Duration {
    resultd_app_config()
        .ok()
        .map(|c| c.result_buffer.sweep_interval())
        .unwrap_or(Duration::from_secs(1))
}

pub(crate) fn sweep_lookahead_secs() -> i64 {
    resultd_app_config()
        .ok()
        .map(|c| c.result_buffer.sweep_lookahead_secs)
        .unwrap_or(0)
}
