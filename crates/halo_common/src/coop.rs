//! Cooperative yield points.
//!
//! Engine code is blocking. Long operations call `yield_now` between
//! blocking steps (per chunk, per extracted entry, per moved file) so the
//! host can service other duties, and report coarse progress.

pub trait Cooperative {
    fn yield_now(&self);

    fn progress(&self, _phase: &str, _percent: Option<u8>) {}
}

/// Never yields. Used at boot, where nothing else is scheduled yet.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoYield;

impl Cooperative for NoYield {
    fn yield_now(&self) {}
}

/// Yields the OS thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadYield;

impl Cooperative for ThreadYield {
    fn yield_now(&self) {
        std::thread::yield_now();
    }

    fn progress(&self, phase: &str, percent: Option<u8>) {
        if let Some(pct) = percent {
            tracing::trace!("{} {}%", phase, pct);
        }
    }
}

/// Percentage of `done` over `total`, capped at 99 until the phase completes.
pub fn percent(done: u64, total: Option<u64>) -> Option<u8> {
    match total {
        Some(t) if t > 0 => Some(((done.saturating_mul(100)) / t).min(99) as u8),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        assert_eq!(percent(0, Some(100)), Some(0));
        assert_eq!(percent(50, Some(100)), Some(50));
        assert_eq!(percent(100, Some(100)), Some(99));
        assert_eq!(percent(10, None), None);
        assert_eq!(percent(10, Some(0)), None);
    }
}
