use std::ops::RangeInclusive;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Days, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone};
use rand::Rng;

use crate::shutdown::Shutdown;

/// How far back from the cycle day the upload-date cutoff sits.
pub const CUTOFF_LAG_DAYS: u64 = 2;

/// Minutes past the following midnight at which the next cycle may start (00:30 to 04:00).
pub const WAKE_WINDOW_MINUTES: RangeInclusive<u32> = 30..=240;

/// Upload-date cutoff for one cycle, with both renderings derived from the same date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cutoff {
    date: NaiveDate,
    filter_expr: String,
    date_stamp: String,
}

impl Cutoff {
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// `upload_date >= YYYYMMDD`: lets the downloader stop walking back through a channel.
    pub fn filter_expr(&self) -> &str {
        &self.filter_expr
    }

    /// `YYYYMMDD`: exclusive upper bound on upload date.
    pub fn date_stamp(&self) -> &str {
        &self.date_stamp
    }
}

/// Compute the cutoff for a cycle that started on `today`.
///
/// Works on calendar dates, so month/year rollover and DST never shift the result.
pub fn compute_cutoff(today: NaiveDate) -> anyhow::Result<Cutoff> {
    let date = today
        .checked_sub_days(Days::new(CUTOFF_LAG_DAYS))
        .with_context(|| format!("cannot subtract {} days from {}", CUTOFF_LAG_DAYS, today))?;
    let date_stamp = date.format("%Y%m%d").to_string();
    Ok(Cutoff {
        date,
        filter_expr: format!("upload_date >= {}", date_stamp),
        date_stamp,
    })
}

/// Pick a uniformly random offset from [`WAKE_WINDOW_MINUTES`].
pub fn sample_wake_offset<R: Rng>(rng: &mut R) -> u32 {
    rng.gen_range(WAKE_WINDOW_MINUTES)
}

/// Midnight after `cycle_day`, plus `offset_minutes`, resolved in `tz`.
pub fn next_wake<Tz: TimeZone>(
    tz: &Tz,
    cycle_day: NaiveDate,
    offset_minutes: u32,
) -> anyhow::Result<DateTime<Tz>> {
    let midnight = cycle_day
        .checked_add_days(Days::new(1))
        .with_context(|| format!("no calendar day after {}", cycle_day))?
        .and_time(NaiveTime::MIN);
    let target = midnight
        .checked_add_signed(TimeDelta::minutes(i64::from(offset_minutes)))
        .context("wake time out of range")?;
    resolve_local(tz, target)
}

/// Map a wall-clock time onto `tz`, normalizing across DST transitions.
///
/// Ambiguous times (clocks going back) take the earlier instant. Times skipped
/// by clocks going forward are pushed past the gap.
pub fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> anyhow::Result<DateTime<Tz>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(t) => Ok(t),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest),
        LocalResult::None => {
            let shifted = naive
                .checked_add_signed(TimeDelta::hours(1))
                .context("wake time out of range")?;
            tz.from_local_datetime(&shifted)
                .earliest()
                .with_context(|| format!("{} does not exist in the local time zone", naive))
        }
    }
}

/// Time left until `wake`, or `None` if it is not in the future.
pub fn duration_until<Tz: TimeZone>(wake: &DateTime<Tz>, now: &DateTime<Tz>) -> Option<Duration> {
    wake.clone()
        .signed_duration_since(now)
        .to_std()
        .ok()
        .filter(|d| !d.is_zero())
}

/// Sleep for `duration` unless shutdown is requested first.
///
/// Returns `true` if the full duration elapsed.
pub async fn sleep_or_shutdown(duration: Duration, shutdown: &Shutdown) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = shutdown.requested() => false,
    }
}
