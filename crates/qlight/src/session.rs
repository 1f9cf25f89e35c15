// session.rs — per-compile shared state: statistics, queued warnings, progress

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam::queue::SegQueue;
use crossbeam::utils::CachePadded;
use qlight_common::common::{com_progress, com_wprintf};

/// Counters updated from worker threads. Relaxed ordering throughout: the
/// numbers are diagnostics and only read after a phase barrier.
#[derive(Default)]
pub struct SessionCounters {
    pub degenerate_triangles: AtomicUsize,
    pub trace_triangles: AtomicUsize,
    pub trace_nodes: AtomicUsize,
    pub culled_lights: AtomicUsize,
    pub surface_lights: AtomicUsize,
    pub style_overflows: AtomicUsize,
    pub mapped_luxels: AtomicUsize,
    pub occluded_luxels: AtomicUsize,
    pub flooded_luxels: AtomicUsize,
    pub illuminated_luxels: AtomicUsize,
    pub vertexes_lit: AtomicUsize,
    pub grid_points: AtomicUsize,
    pub bounce_lights: AtomicUsize,
    /// Hot counters live on their own cache lines.
    pub light_samples: CachePadded<AtomicUsize>,
    pub subsampled_luxels: CachePadded<AtomicUsize>,
    pub traces: CachePadded<AtomicUsize>,
}

/// A snapshot of the counters, returned from a compile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LightStats {
    pub degenerate_triangles: usize,
    pub trace_triangles: usize,
    pub trace_nodes: usize,
    pub culled_lights: usize,
    pub surface_lights: usize,
    pub style_overflows: usize,
    pub mapped_luxels: usize,
    pub occluded_luxels: usize,
    pub flooded_luxels: usize,
    pub illuminated_luxels: usize,
    pub vertexes_lit: usize,
    pub grid_points: usize,
    pub bounce_lights: usize,
    pub light_samples: usize,
    pub subsampled_luxels: usize,
    pub traces: usize,
}

/// One compile's worth of shared mutable state. Passed by reference into
/// every worker; two sessions never share anything.
#[derive(Default)]
pub struct CompileSession {
    pub counters: SessionCounters,
    warnings: SegQueue<String>,
    /// Set when any light uses a non-zero style.
    pub no_collapse: AtomicBool,
    progress_done: AtomicUsize,
    progress_total: AtomicUsize,
}

#[inline]
pub fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub fn bump_by(counter: &AtomicUsize, n: usize) {
    if n > 0 {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

impl CompileSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a warning from inside a work item.
    pub fn warn(&self, msg: String) {
        self.warnings.push(msg);
    }

    /// Print queued warnings in arrival order. Call after a barrier.
    pub fn flush_warnings(&self) -> usize {
        let mut n = 0;
        while let Some(msg) = self.warnings.pop() {
            com_wprintf(&msg);
            n += 1;
        }
        n
    }

    pub fn begin_progress(&self, total: usize) {
        self.progress_done.store(0, Ordering::Relaxed);
        self.progress_total.store(total, Ordering::Relaxed);
    }

    /// Mark one work item finished and advance the ticker.
    pub fn tick(&self) {
        let done = self.progress_done.fetch_add(1, Ordering::Relaxed) + 1;
        let total = self.progress_total.load(Ordering::Relaxed);
        if done <= total {
            com_progress(done, total);
        }
    }

    pub fn set_no_collapse(&self) {
        self.no_collapse.store(true, Ordering::Relaxed);
    }

    pub fn no_collapse(&self) -> bool {
        self.no_collapse.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> LightStats {
        let c = &self.counters;
        let get = |a: &AtomicUsize| a.load(Ordering::Relaxed);
        LightStats {
            degenerate_triangles: get(&c.degenerate_triangles),
            trace_triangles: get(&c.trace_triangles),
            trace_nodes: get(&c.trace_nodes),
            culled_lights: get(&c.culled_lights),
            surface_lights: get(&c.surface_lights),
            style_overflows: get(&c.style_overflows),
            mapped_luxels: get(&c.mapped_luxels),
            occluded_luxels: get(&c.occluded_luxels),
            flooded_luxels: get(&c.flooded_luxels),
            illuminated_luxels: get(&c.illuminated_luxels),
            vertexes_lit: get(&c.vertexes_lit),
            grid_points: get(&c.grid_points),
            bounce_lights: get(&c.bounce_lights),
            light_samples: get(&c.light_samples),
            subsampled_luxels: get(&c.subsampled_luxels),
            traces: get(&c.traces),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_counters_from_many_threads() {
        let session = CompileSession::new();
        (0..1000).into_par_iter().for_each(|_| {
            bump(&session.counters.occluded_luxels);
            bump(&session.counters.traces);
        });
        let stats = session.stats();
        assert_eq!(stats.occluded_luxels, 1000);
        assert_eq!(stats.traces, 1000);
    }

    #[test]
    fn test_sessions_are_independent() {
        let a = CompileSession::new();
        let b = CompileSession::new();
        bump_by(&a.counters.culled_lights, 3);
        a.set_no_collapse();
        assert_eq!(a.stats().culled_lights, 3);
        assert_eq!(b.stats().culled_lights, 0);
        assert!(!b.no_collapse());
    }

    #[test]
    fn test_warnings_queue_drains() {
        let session = CompileSession::new();
        session.warn("one\n".to_string());
        session.warn("two\n".to_string());
        assert_eq!(session.flush_warnings(), 2);
        assert_eq!(session.flush_warnings(), 0);
    }
}
