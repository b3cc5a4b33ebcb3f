use std::time::{Duration, Instant};

/// Wall time spent in one named phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseTiming {
    pub name: String,
    pub duration: Duration,
}

/// Records phase timings in the order they ran.
#[derive(Debug, Default)]
pub struct Profiler {
    phases: Vec<PhaseTiming>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f`, recording how long it took under `name`.
    pub fn record_phase<T, F>(&mut self, name: &str, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let start = Instant::now();
        let result = f();
        self.push_phase(name, start.elapsed());
        result
    }

    pub fn push_phase(&mut self, name: &str, duration: Duration) {
        self.phases.push(PhaseTiming {
            name: name.to_string(),
            duration,
        });
    }

    pub fn phases(&self) -> &[PhaseTiming] {
        &self.phases
    }

    pub fn total(&self) -> Duration {
        self.phases.iter().map(|phase| phase.duration).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_keep_order_and_sum() {
        let mut profiler = Profiler::new();
        let value = profiler.record_phase("first", || 7);
        profiler.push_phase("second", Duration::from_millis(5));

        assert_eq!(value, 7);
        let names: Vec<_> = profiler.phases().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["first", "second"]);
        assert!(profiler.total() >= Duration::from_millis(5));
    }
}
