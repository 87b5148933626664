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
use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

static CONFIG: OnceLock<ResultdConfig> = OnceLock::new();

fn default_log_level() -> String {
    "info".to_string()
}

pub fn init_from_path(path: impl AsRef<Path>) -> Result<&'static ResultdConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let path = path.as_ref().to_path_buf();
    let cfg = ResultdConfig::load_from_file(&path)?;
    Ok(CONFIG.get_or_init(|| cfg))
}

pub fn init_from_env_or_default() -> Result<&'static ResultdConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let path = config_path_from_env_or_default()?;
    let cfg = ResultdConfig::load_from_file(&path)?;
    Ok(CONFIG.get_or_init(|| cfg))
}

pub fn config() -> Result<&'static ResultdConfig> {
    init_from_env_or_default()
}

fn config_path_from_env_or_default() -> Result<PathBuf> {
    if let Ok(p) = std::env::var("RESULTD_CONFIG")
        && !p.trim().is_empty()
    {
        return Ok(PathBuf::from(p));
    }

    let candidates = [PathBuf::from("resultd.toml")];
    for p in candidates {
        if p.exists() {
            return Ok(p);
        }
    }

    Err(anyhow!(
        "missing config file: set $RESULTD_CONFIG or create ./resultd.toml"
    ))
}

#[derive(Clone, Debug, Deserialize)]
pub struct ResultdConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional full tracing EnvFilter expression.
    /// If set, this takes precedence over `log_level`.
    /// Example: "resultd=debug"
    #[serde(default)]
    pub log_filter: Option<String>,

    #[serde(default)]
    pub result_buffer: ResultBufferConfig,
}

impl ResultdConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read config file: {}", path.display()))?;
        let cfg: ResultdConfig =
            toml::from_str(&s).with_context(|| format!("parse toml: {}", path.display()))?;
        cfg.result_buffer
            .validate()
            .with_context(|| format!("validate config: {}", path.display()))?;
        Ok(cfg)
    }
}

impl Default for ResultdConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_filter: None,
            result_buffer: ResultBufferConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ResultBufferConfig {
    /// Max batches queued per query before `push` blocks.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    /// Local wait bound for a single fetch.
    #[serde(default = "default_fetch_wait_ms")]
    pub fetch_wait_ms: u64,
    /// Lifetime a result sink registers for its buffer when it opens.
    #[serde(default = "default_cancelled_interval_secs")]
    pub cancelled_interval_secs: u64,
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    #[serde(default)]
    pub sweep_lookahead_secs: i64,
}

fn default_buffer_capacity() -> usize {
    1024
}

fn default_fetch_wait_ms() -> u64 {
    300_000
}

fn default_cancelled_interval_secs() -> u64 {
    300
}

fn default_sweep_interval_ms() -> u64 {
    1000
}

impl Default for ResultBufferConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
            fetch_wait_ms: default_fetch_wait_ms(),
            cancelled_interval_secs: default_cancelled_interval_secs(),
            sweep_interval_ms: default_sweep_interval_ms(),
            sweep_lookahead_secs: 0,
        }
    }
}

impl ResultBufferConfig {
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(anyhow!("result_buffer.buffer_capacity must be > 0"));
        }
        if self.sweep_interval_ms == 0 {
            return Err(anyhow!("result_buffer.sweep_interval_ms must be > 0"));
        }
        if self.sweep_lookahead_secs < 0 {
            return Err(anyhow!("result_buffer.sweep_lookahead_secs must be >= 0"));
        }
        Ok(())
    }

    pub fn fetch_wait(&self) -> Duration {
        Duration::from_millis(self.fetch_wait_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}
