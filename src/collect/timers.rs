//! Nestable interval timers for the phases of a collection cycle.
//!
//! Timers form an implicit call tree: opening a child phase inside a
//! parent's open/close pair nests its interval. Nesting is the caller's
//! convention; a timer has no parent pointer. [`Timers::scoped`] returns a
//! guard so a phase cannot be left open on an early return.

use std::sync::Mutex;
use std::time::Instant;

use enum_map::{enum_map, Enum, EnumMap};
use strum_macros::IntoStaticStr;

/// The timed phases of a cycle, plus the distinguished [`Mutator`] interval.
///
/// [`Mutator`]: GcPhase::Mutator
#[derive(Copy, Clone, Debug, PartialEq, Eq, Enum, IntoStaticStr)]
pub enum GcPhase {
    /// Wall time between cycles. Closed when a cycle body starts and
    /// reopened when it finishes; never reset by a cycle, so it feeds the
    /// GC-load percentage.
    Mutator,
    /// The traced region of the cycle (both passes, excluding watchers and
    /// verification).
    Collection,
    RootScan,
    ScanFromRoots,
    ScanFromDirtyRoots,
    PromotePinned,
    BlackenStack,
    WalkThreadLocals,
    BlackenGlobals,
    BlackenDirtyCards,
    ScanGrey,
    WalkCodeCache,
    SweepCodeCache,
    ReferenceObjects,
    ReleaseSpaces,
    VerifyBefore,
    VerifyAfter,
    WatchersBefore,
    WatchersAfter,
}

impl GcPhase {
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// One interval timer: open/close timestamps and the nanoseconds
/// accumulated by open/close pairs since the last reset.
#[derive(Default)]
struct Timer {
    open_at: Option<Instant>,
    close_at: Option<Instant>,
    collected_nanos: u64,
    last_interval_nanos: Option<u64>,
}

impl Timer {
    fn open(&mut self, now: Instant) {
        self.open_at = Some(now);
        self.close_at = None;
    }

    /// Close the timer. A timer that was never opened is treated as having
    /// opened at `process_start`; the very first cycle closes the mutator
    /// timer this way.
    fn close(&mut self, now: Instant, process_start: Instant) {
        let opened = self.open_at.unwrap_or(process_start);
        let interval = now.duration_since(opened).as_nanos() as u64;
        self.open_at = Some(opened);
        self.close_at = Some(now);
        self.collected_nanos += interval;
        self.last_interval_nanos = Some(interval);
    }

    fn reset(&mut self) {
        self.open_at = None;
        self.close_at = None;
        self.collected_nanos = 0;
        self.last_interval_nanos = None;
    }
}

/// The collector's timer table, one [`Timer`] per [`GcPhase`].
pub struct Timers {
    process_start: Instant,
    table: EnumMap<GcPhase, Mutex<Timer>>,
}

impl Timers {
    pub fn new() -> Self {
        Timers {
            process_start: Instant::now(),
            table: enum_map! { _ => Mutex::new(Timer::default()) },
        }
    }

    /// Open the timer for `phase` and return a guard that closes it when
    /// dropped.
    pub fn scoped(&self, phase: GcPhase) -> TimerScope<'_> {
        self.open(phase);
        TimerScope {
            timers: self,
            phase,
        }
    }

    /// Open the timer for `phase` without a guard. Used for intervals that
    /// do not match a lexical scope, such as the mutator interval.
    pub fn open(&self, phase: GcPhase) {
        self.table[phase].lock().unwrap().open(Instant::now());
    }

    /// Close the timer for `phase`. See [`Timers::open`].
    pub fn close(&self, phase: GcPhase) {
        self.table[phase]
            .lock()
            .unwrap()
            .close(Instant::now(), self.process_start);
    }

    /// Reset every timer except the mutator timer, which accumulates across
    /// cycles.
    pub fn reset_all(&self) {
        for (phase, timer) in &self.table {
            if phase == GcPhase::Mutator {
                continue;
            }
            timer.lock().unwrap().reset();
        }
    }

    /// Nanoseconds collected by `phase`'s open/close pairs since the last
    /// reset.
    pub fn collected_nanos(&self, phase: GcPhase) -> u64 {
        self.table[phase].lock().unwrap().collected_nanos
    }

    /// Nanoseconds collected by the most recent open/close pair of `phase`,
    /// or `None` if the timer has not closed since its last reset.
    pub fn last_interval_nanos(&self, phase: GcPhase) -> Option<u64> {
        self.table[phase].lock().unwrap().last_interval_nanos
    }

    /// The GC load of the last cycle: collection time as a rounded
    /// percentage of the preceding mutator interval plus the collection
    /// time. Wall time only; it does not account for the mutator being
    /// multi-threaded while the collector is not.
    pub fn gc_load_percent(&self) -> Option<u64> {
        let collection = self.last_interval_nanos(GcPhase::Collection)?;
        let mutator = self.last_interval_nanos(GcPhase::Mutator)?;
        let interval = mutator + collection;
        if interval == 0 {
            return None;
        }
        Some((100 * collection + interval / 2) / interval)
    }

    /// Nanoseconds since the timer table was created. The lifetime GC-load
    /// figure in the summary report divides by this.
    pub fn nanos_since_start(&self) -> u64 {
        self.process_start.elapsed().as_nanos() as u64
    }

    /// Log the per-phase nanoseconds of the cycle that just finished. Phases
    /// that collected no time are skipped.
    pub fn log_times(&self) {
        if !log_enabled!(log::Level::Debug) {
            return;
        }
        debug!("GC nanoseconds:");
        for (phase, timer) in &self.table {
            if phase == GcPhase::Mutator {
                continue;
            }
            let nanos = timer.lock().unwrap().collected_nanos;
            if nanos > 0 {
                debug!("  {}: {}", phase.name(), nanos);
            }
        }
        if let Some(load) = self.gc_load_percent() {
            debug!("  GCLoad: {}%", load);
        }
    }
}

impl Default for Timers {
    fn default() -> Self {
        Self::new()
    }
}

/// Closes its phase's timer on drop.
pub struct TimerScope<'a> {
    timers: &'a Timers,
    phase: GcPhase,
}

impl Drop for TimerScope<'_> {
    fn drop(&mut self) {
        self.timers.close(self.phase);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_close_accumulates() {
        let timers = Timers::new();
        timers.open(GcPhase::RootScan);
        timers.close(GcPhase::RootScan);
        let first = timers.collected_nanos(GcPhase::RootScan);
        timers.open(GcPhase::RootScan);
        timers.close(GcPhase::RootScan);
        assert!(timers.collected_nanos(GcPhase::RootScan) >= first);
        assert!(timers.last_interval_nanos(GcPhase::RootScan).is_some());
    }

    #[test]
    fn close_without_open_counts_from_process_start() {
        let timers = Timers::new();
        // The mutator timer is closed on the very first cycle without ever
        // having been opened.
        timers.close(GcPhase::Mutator);
        assert!(timers.last_interval_nanos(GcPhase::Mutator).is_some());
    }

    #[test]
    fn scope_guard_closes_on_drop() {
        let timers = Timers::new();
        {
            let _scope = timers.scoped(GcPhase::ScanGrey);
        }
        assert!(timers.last_interval_nanos(GcPhase::ScanGrey).is_some());
    }

    #[test]
    fn reset_spares_the_mutator_timer() {
        let timers = Timers::new();
        timers.open(GcPhase::Mutator);
        timers.close(GcPhase::Mutator);
        timers.open(GcPhase::Collection);
        timers.close(GcPhase::Collection);
        timers.reset_all();
        assert_eq!(timers.collected_nanos(GcPhase::Collection), 0);
        assert!(timers.collected_nanos(GcPhase::Mutator) > 0 || {
            // Sub-nanosecond intervals can round to zero; the interval record
            // must survive the reset either way.
            timers.last_interval_nanos(GcPhase::Mutator).is_some()
        });
    }
}
