//! Shared environment configuration for the `precompute`, `inspect` and
//! `server` binaries.
//!
//! | Variable | Default | Used for |
//! |----------|---------|----------|
//! | `UR_LUT_BASE_PATH` | `.` | working directory for relative table paths |
//! | `RAYON_NUM_THREADS` / `OMP_NUM_THREADS` | all cores | worker threads |
//! | `UR_LUT_PORT` | 9000 | HTTP port of `server` |
//! | `UR_LUT_LOG` | `info` | log level (`off`, `error`, `warn`, `info`, `debug`, `trace`) |
//! | `UR_LUT_LOG_FILE` | unset | also append logs to this file |

use std::fs::OpenOptions;
use std::path::PathBuf;

use log::LevelFilter;
use simplelog::{ColorChoice, CombinedLogger, ConfigBuilder, SharedLogger, TermLogger, TerminalMode, WriteLogger};

use crate::error::{Error, Result};

/// Read `UR_LUT_BASE_PATH` (default `"."`) and change into it.
pub fn init_base_path() -> Result<PathBuf> {
    let base_path = std::env::var("UR_LUT_BASE_PATH").unwrap_or_else(|_| ".".to_string());
    let path = PathBuf::from(&base_path);
    std::env::set_current_dir(&path).map_err(|e| Error::io("change directory to", &path, e))?;
    if let Ok(cwd) = std::env::current_dir() {
        log::info!("Working directory: {}", cwd.display());
    }
    Ok(path)
}

/// Read `RAYON_NUM_THREADS` (fallback `OMP_NUM_THREADS`) and build the global
/// rayon pool. Tolerates an already-initialised pool. Returns the thread count.
pub fn init_rayon_threads() -> usize {
    let requested: Option<usize> = std::env::var("RAYON_NUM_THREADS")
        .or_else(|_| std::env::var("OMP_NUM_THREADS"))
        .ok()
        .and_then(|s| s.parse().ok());
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = requested {
        builder = builder.num_threads(n);
    }
    if builder.build_global().is_err() {
        log::debug!("Rayon pool already initialised");
    }
    let threads = rayon::current_num_threads();
    log::info!("Rayon threads: {}", threads);
    threads
}

/// Read `UR_LUT_PORT` (default 9000).
pub fn server_port() -> u16 {
    std::env::var("UR_LUT_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(9000)
}

/// Read `UR_LUT_LOG` (default `info`).
pub fn log_level() -> LevelFilter {
    std::env::var("UR_LUT_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(LevelFilter::Info)
}

/// Install the terminal logger, plus a file logger when `UR_LUT_LOG_FILE` is set.
pub fn init_logging() -> Result<()> {
    let config = ConfigBuilder::new()
        .set_location_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .build();
    let level = log_level();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];
    if let Ok(path) = std::env::var("UR_LUT_LOG_FILE") {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::io("open log file", &path, e))?;
        loggers.push(WriteLogger::new(level, config, file));
    }
    CombinedLogger::init(loggers).map_err(|e| Error::config(format!("logger already installed: {e}")))
}
