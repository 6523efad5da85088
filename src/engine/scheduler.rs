use std::path::PathBuf;

use chrono::{Local, NaiveDate};

use crate::channels::Channels;
use crate::engine::downloader::Supervisor;
use crate::native::process::{ExitOutcome, Launcher};
use crate::native::time::{compute_cutoff, duration_until, next_wake, sample_wake_offset, sleep_or_shutdown};
use crate::shutdown::Shutdown;

/// The downloader died to a signal nobody asked for. Ends the daemon with 128+N.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("yt-dlp killed by signal {signal}")]
pub struct ChildKilled {
    pub signal: i32,
}

impl ChildKilled {
    pub fn exit_code(&self) -> u8 {
        u8::try_from(128 + self.signal).unwrap_or(u8::MAX)
    }
}

/// What happened during one pass over the channel list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub launched: usize,
    pub failed: usize,
    /// Shutdown stopped the pass before the end of the list.
    pub interrupted: bool,
}

/// Drives daily passes over the channel list, one downloader at a time.
pub struct Scheduler<L> {
    channels_file: PathBuf,
    supervisor: Supervisor<L>,
    shutdown: Shutdown,
}

impl<L: Launcher> Scheduler<L> {
    pub fn new(channels_file: PathBuf, supervisor: Supervisor<L>, shutdown: Shutdown) -> Self {
        Self {
            channels_file,
            supervisor,
            shutdown,
        }
    }

    /// Run cycles until shutdown. Returns `Err` for fatal conditions, including [`ChildKilled`].
    pub async fn run_forever(&mut self) -> anyhow::Result<()> {
        while !self.shutdown.is_requested() {
            let today = Local::now().date_naive();
            let report = self.run_cycle(today).await?;
            tracing::info!(
                launched = report.launched,
                failed = report.failed,
                interrupted = report.interrupted,
                "Cycle finished"
            );

            if self.shutdown.is_requested() {
                break;
            }

            let offset = sample_wake_offset(&mut rand::thread_rng());
            let wake = next_wake(&Local, today, offset)?;
            match duration_until(&wake, &Local::now()) {
                Some(duration) => {
                    tracing::info!("Sleeping until {}", wake.format("%I:%M%P on %Y-%m-%d"));
                    sleep_or_shutdown(duration, &self.shutdown).await;
                }
                None => tracing::warn!(
                    "Cycle overran its next wake time {}, starting again now",
                    wake.format("%Y-%m-%d %H:%M")
                ),
            }
        }

        tracing::info!("Shutting down");
        Ok(())
    }

    /// One pass over the channel list for a cycle that started on `today`.
    pub async fn run_cycle(&mut self, today: NaiveDate) -> anyhow::Result<CycleReport> {
        let cutoff = compute_cutoff(today)?;
        tracing::info!(cutoff = %cutoff.date(), "Running on {}", today.format("%Y-%m-%d"));

        let mut channels = Channels::open(&self.channels_file).await?;
        let mut report = CycleReport::default();

        while let Some(channel) = channels.next().await {
            if self.shutdown.is_requested() {
                report.interrupted = true;
                break;
            }

            let outcome = self.supervisor.run_one(&channel, &cutoff, &self.shutdown).await?;
            report.launched += 1;

            match outcome {
                ExitOutcome::Exited(0) => {
                    tracing::info!(channel = %channel, "yt-dlp exited with code 0");
                }
                ExitOutcome::Exited(code) => {
                    report.failed += 1;
                    tracing::warn!(channel = %channel, "yt-dlp exited with code {}", code);
                }
                ExitOutcome::Signaled(signal) if self.shutdown.is_requested() => {
                    tracing::info!(channel = %channel, "yt-dlp killed by signal {} during shutdown", signal);
                }
                ExitOutcome::Signaled(signal) => {
                    tracing::error!(channel = %channel, "yt-dlp killed by signal {}", signal);
                    return Err(ChildKilled { signal }.into());
                }
            }
        }

        if self.shutdown.is_requested() {
            report.interrupted = true;
        }
        Ok(report)
    }
}
