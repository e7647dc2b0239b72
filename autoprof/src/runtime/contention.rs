//! Block and mutex contention recording
//!
//! Waits are attributed to a caller-chosen site name. Call sites opt in by
//! going through [`lock_tracked`] or [`block_tracked`]; untracked waits are
//! invisible to the block and mutex profiles.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::{Duration, Instant};

use crate::domain::{ContentionKind, ProfileWriteError};

use super::encode::{write_profile, ProfileBuilder};

/// Accumulated waits at one site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SiteStats {
    pub contentions: u64,
    pub delay: Duration,
}

type Table = Mutex<BTreeMap<&'static str, SiteStats>>;

static BLOCK_EVENTS: Table = Mutex::new(BTreeMap::new());
static MUTEX_EVENTS: Table = Mutex::new(BTreeMap::new());

fn table(kind: ContentionKind) -> MutexGuard<'static, BTreeMap<&'static str, SiteStats>> {
    let table = match kind {
        ContentionKind::Block => &BLOCK_EVENTS,
        ContentionKind::Mutex => &MUTEX_EVENTS,
    };
    // A panic while holding the table cannot leave it half-updated
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Record one wait of `delay` at `site`
pub fn record(kind: ContentionKind, site: &'static str, delay: Duration) {
    let mut table = table(kind);
    let stats = table.entry(site).or_default();
    stats.contentions += 1;
    stats.delay += delay;
}

/// Copy of the current table, ordered by site name
#[must_use]
pub fn snapshot(kind: ContentionKind) -> Vec<(&'static str, SiteStats)> {
    table(kind).iter().map(|(site, stats)| (*site, *stats)).collect()
}

/// Lock `mutex`, recording the wait at `site` when the lock was contended.
///
/// Uncontended acquisitions are not recorded.
///
/// # Errors
/// Returns the poison error of the underlying mutex.
pub fn lock_tracked<'a, T>(
    mutex: &'a Mutex<T>,
    site: &'static str,
) -> Result<MutexGuard<'a, T>, PoisonError<MutexGuard<'a, T>>> {
    match mutex.try_lock() {
        Ok(guard) => Ok(guard),
        Err(TryLockError::Poisoned(err)) => Err(err),
        Err(TryLockError::WouldBlock) => {
            let start = Instant::now();
            let result = mutex.lock();
            record(ContentionKind::Mutex, site, start.elapsed());
            result
        }
    }
}

/// Run `f`, recording its whole duration as a blocking event at `site`
pub fn block_tracked<R>(site: &'static str, f: impl FnOnce() -> R) -> R {
    let start = Instant::now();
    let result = f();
    record(ContentionKind::Block, site, start.elapsed());
    result
}

/// Write the contention table for `kind` as a pprof profile
///
/// # Errors
/// Returns the I/O error if the profile cannot be written.
pub fn write_contention(kind: ContentionKind, out: &mut dyn Write) -> Result<(), ProfileWriteError> {
    let mut builder = ProfileBuilder::new(&[("contentions", "count"), ("delay", "nanoseconds")])
        .period("contentions", "count", 1)
        .default_sample_type("delay");

    for (site, stats) in snapshot(kind) {
        let contentions = i64::try_from(stats.contentions).unwrap_or(i64::MAX);
        let delay = i64::try_from(stats.delay.as_nanos()).unwrap_or(i64::MAX);
        builder.sample(&[site], vec![contentions, delay], &[]);
    }
    write_profile(&builder.build(), out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn stats_for(kind: ContentionKind, site: &str) -> SiteStats {
        snapshot(kind).into_iter().find(|(s, _)| *s == site).map(|(_, st)| st).unwrap_or_default()
    }

    #[test]
    fn test_record_accumulates() {
        record(ContentionKind::Block, "test::accumulate", Duration::from_millis(2));
        record(ContentionKind::Block, "test::accumulate", Duration::from_millis(3));

        let stats = stats_for(ContentionKind::Block, "test::accumulate");
        assert_eq!(stats.contentions, 2);
        assert_eq!(stats.delay, Duration::from_millis(5));
        assert_eq!(stats_for(ContentionKind::Mutex, "test::accumulate"), SiteStats::default());
    }

    #[test]
    fn test_block_tracked_measures_closure() {
        let value = block_tracked("test::sleep", || {
            std::thread::sleep(Duration::from_millis(10));
            7
        });
        assert_eq!(value, 7);
        assert!(stats_for(ContentionKind::Block, "test::sleep").delay >= Duration::from_millis(10));
    }

    #[test]
    fn test_uncontended_lock_is_not_recorded() {
        let mutex = Mutex::new(0);
        *lock_tracked(&mutex, "test::uncontended").unwrap() += 1;
        assert_eq!(stats_for(ContentionKind::Mutex, "test::uncontended").contentions, 0);
    }

    #[test]
    fn test_contended_lock_is_recorded() {
        let mutex = Arc::new(Mutex::new(0));
        let held = mutex.lock().unwrap();

        let waiter = {
            let mutex = Arc::clone(&mutex);
            std::thread::spawn(move || {
                *lock_tracked(&mutex, "test::contended").unwrap() += 1;
            })
        };
        std::thread::sleep(Duration::from_millis(50));
        drop(held);
        waiter.join().unwrap();

        assert_eq!(stats_for(ContentionKind::Mutex, "test::contended").contentions, 1);
        assert_eq!(*mutex.lock().unwrap(), 1);
    }
}
