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
use std::fmt;

/// 128-bit query / fragment instance id as sent by the coordinator.
///
/// Equality and hashing are bitwise over `(hi, lo)`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct UniqueId {
    pub hi: i64,
    pub lo: i64,
}

fn write_uuid(f: &mut fmt::Formatter<'_>, hi: i64, lo: i64) -> fmt::Result {
    let hi = hi as u64;
    let lo = lo as u64;
    write!(
        f,
        "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
        (hi >> 32) as u32,
        (hi >> 16) as u16,
        hi as u16,
        (lo >> 48) as u16,
        lo & 0x0000_FFFF_FFFF_FFFF
    )
}

pub fn format_uuid(hi: i64, lo: i64) -> String {
    UniqueId { hi, lo }.to_string()
}

impl UniqueId {
    pub const fn new(hi: i64, lo: i64) -> Self {
        Self { hi, lo }
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_uuid(f, self.hi, self.lo)
    }
}

/// One unit of already-serialized result rows.
///
/// The buffer never looks inside `rows`; it only moves the batch from the
/// producer to the consumer and measures its size for memory accounting.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResultBatch {
    pub rows: Vec<Vec<u8>>,
    pub num_rows: usize,
}

impl ResultBatch {
    pub fn new(rows: Vec<Vec<u8>>) -> Self {
        let num_rows = rows.len();
        Self { rows, num_rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Logical bytes held by this batch, counted by row capacity.
    pub fn mem_bytes(&self) -> usize {
        let mut total = self
            .rows
            .capacity()
            .saturating_mul(std::mem::size_of::<Vec<u8>>());
        for row in &self.rows {
            total = total.saturating_add(row.capacity().max(row.len()));
        }
        total
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchResult {
    pub packet_seq: i64,
    pub eos: bool,
    pub result_batch: ResultBatch,
}
