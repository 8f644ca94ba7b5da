/*
 * SPDX-License-Identifier: Apache-2.0
 */

use anyhow::anyhow;
use chrono::Local;
use log::{LevelFilter, Log, Metadata, Record};

struct StdErrLogger;

impl Log for StdErrLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let datetime = Local::now().format("%Y-%m-%dT%H:%M:%S%.6f");
        eprintln!("{datetime} {} {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: StdErrLogger = StdErrLogger;

pub fn setup(verbose_level: u8) -> anyhow::Result<()> {
    let level = match verbose_level {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    log::set_logger(&LOGGER).map_err(|e| anyhow!("failed to set process logger: {e}"))?;
    log::set_max_level(level);
    Ok(())
}
