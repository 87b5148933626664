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
use std::env;
use std::fs;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use resultd::resultd_config;
use resultd::resultd_logging::{self, info};
use resultd::runtime::exec_env;

const PID_FILE: &str = "resultd.pid";

fn usage() {
    eprintln!("Usage: resultd [run] [--config <path>]");
    eprintln!("  run      - Run in foreground (default)");
}

fn parse_args(args: &[String]) -> Option<String> {
    let mut idx = 1usize;
    if args.get(idx).is_some_and(|s| !s.starts_with('-')) {
        if args[idx] != "run" {
            eprintln!("unknown mode: {} (try --help)", args[idx]);
            process::exit(1);
        }
        idx += 1;
    }

    let mut config_path: Option<String> = None;
    while let Some(arg) = args.get(idx) {
        match arg.as_str() {
            "--config" | "-c" => {
                idx += 1;
                config_path = args.get(idx).cloned();
                if config_path.is_none() {
                    eprintln!("missing value for --config/-c");
                    process::exit(1);
                }
                idx += 1;
            }
            "--help" | "-h" => {
                usage();
                process::exit(0);
            }
            other => {
                eprintln!("unknown arg: {other} (try --help)");
                process::exit(1);
            }
        }
    }
    config_path
}

fn run(config_path: Option<&str>) -> Result<()> {
    let cfg = match config_path {
        Some(p) => resultd_config::init_from_path(p)?,
        None => resultd_config::init_from_env_or_default()?,
    };
    resultd_logging::init_with_level(&resultd_logging::filter_from_config(cfg));

    fs::write(PID_FILE, process::id().to_string()).context("write pid file")?;

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    ctrlc::set_handler(move || {
        running_clone.store(false, Ordering::SeqCst);
    })
    .context("set Ctrl-C handler")?;

    exec_env::init_from_config()?;
    info!("resultd started, pid={}", process::id());

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
    }

    info!("received interrupt signal, shutting down");
    exec_env::shutdown();
    let _ = fs::remove_file(PID_FILE);
    Ok(())
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let config_path = parse_args(&args);
    if let Err(err) = run(config_path.as_deref()) {
        eprintln!("resultd failed: {err:#}");
        process::exit(1);
    }
}
