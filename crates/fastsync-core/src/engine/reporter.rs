//! Throughput reporter
//!
//! Samples the shared [`RateMeter`] once per period, clears it and prints the
//! rate as one `"<n> MiB/s"` line. Stops as soon as the run it watches is done.

use crate::engine::rate_meter::RateMeter;
use std::future::Future;
use std::io::{self, Write};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::warn;

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Periodic throughput printer
pub struct Reporter<W> {
    meter: RateMeter,
    period: Duration,
    out: W,
}

impl<W: Write> Reporter<W> {
    pub fn new(meter: RateMeter, period: Duration, out: W) -> Self {
        Self {
            meter,
            period,
            out,
        }
    }

    /// Take the bytes accumulated since the last sample and print the rate.
    /// Returns the rate in MiB/s.
    pub fn sample(&mut self) -> io::Result<f64> {
        let bytes = self.meter.take().max(0) as f64;
        let secs = self.period.as_secs_f64();
        let rate = if secs > 0.0 {
            bytes / secs / BYTES_PER_MIB
        } else {
            0.0
        };

        writeln!(self.out, "{:.2} MiB/s", rate)?;
        self.out.flush()?;
        Ok(rate)
    }

    /// Print one sample per period until `done` resolves, then return its
    /// output
    pub async fn run_until<F: Future>(&mut self, done: F) -> F::Output {
        tokio::pin!(done);

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                output = &mut done => return output,
                _ = ticker.tick() => {
                    if let Err(e) = self.sample() {
                        warn!("Failed to write throughput: {}", e);
                    }
                }
            }
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
