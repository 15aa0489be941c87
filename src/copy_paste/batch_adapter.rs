//! Adaptive batch-size controller (§4.2).
//!
//! A two-mode feedback loop: `Fast` assumes unlimited throughput,
//! `RuLimited` assumes a rate-limited backend. The mode transition is
//! one-way, mirroring the rest of the pipeline's preference for
//! irreversible state machines over reconfigurable knobs (§3, §9).

/// Configuration-frozen presets (§4.2). Not user-overridable: the spec
/// enumerates these exhaustively rather than exposing them as dynamic
/// config (§9 design notes, "dynamic optional config").
#[derive(Debug, Clone, Copy, PartialEq)]
struct ModeProfile {
    initial: u32,
    max: u32,
    growth_factor: f64,
}

const FAST: ModeProfile = ModeProfile {
    initial: 500,
    max: 2000,
    growth_factor: 1.20,
};

const RU_LIMITED: ModeProfile = ModeProfile {
    initial: 100,
    max: 1000,
    growth_factor: 1.10,
};

/// Conservative memory limit returned by `buffer_constraints`, chosen to
/// leave headroom for encoding overhead above the flush-trigger bytes
/// estimate (§4.2, §4.4).
pub const MEMORY_LIMIT_MB: u32 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Fast,
    RuLimited,
}

impl Mode {
    fn profile(self) -> ModeProfile {
        match self {
            Mode::Fast => FAST,
            Mode::RuLimited => RU_LIMITED,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferConstraints {
    pub current_batch_size: u32,
    pub memory_limit_mb: u32,
}

/// `(mode, currentBatchSize)` (§3). `current_batch_size` is always in
/// `[1, mode.max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSizeAdapter {
    mode: Mode,
    current_batch_size: u32,
}

impl Default for BatchSizeAdapter {
    fn default() -> Self {
        BatchSizeAdapter {
            mode: Mode::Fast,
            current_batch_size: FAST.initial,
        }
    }
}

impl BatchSizeAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn current_batch_size(&self) -> u32 {
        self.current_batch_size
    }

    /// Grow multiplicatively on success. No-op once the mode's max is
    /// reached. Guarantees at least +1 so a stalled growth factor at
    /// small batch sizes still makes forward progress (e.g. current=1,
    /// growth=1.10 floors to 1 without the `current + 1` floor).
    pub fn grow(&mut self) {
        let profile = self.mode.profile();
        if self.current_batch_size >= profile.max {
            return;
        }
        let grown = (self.current_batch_size as f64 * profile.growth_factor).floor() as u32;
        let candidate = grown.max(self.current_batch_size + 1);
        self.current_batch_size = candidate.min(profile.max);
    }

    /// Shrink to proven capacity: `n` documents confirmed-written before
    /// a throttle.
    pub fn shrink(&mut self, n: u32) {
        self.current_batch_size = n.max(1);
    }

    /// Halve on a throttle with zero proven progress.
    pub fn halve(&mut self) {
        self.current_batch_size = (self.current_batch_size / 2).max(1);
    }

    /// Handle a throttle event carrying `n` proven-written documents.
    /// Transitions Fast -> RuLimited on the first call seen in Fast
    /// mode, then applies the RuLimited sizing rule regardless of which
    /// mode triggered the transition this call.
    pub fn handle_throttle(&mut self, n: u32) {
        if self.mode == Mode::Fast {
            self.mode = Mode::RuLimited;
        }
        if n == 0 {
            self.halve();
            return;
        }
        if n <= RU_LIMITED.initial {
            self.shrink(n);
        } else {
            self.current_batch_size = n.min(RU_LIMITED.max);
        }
    }

    pub fn buffer_constraints(&self) -> BufferConstraints {
        BufferConstraints {
            current_batch_size: self.current_batch_size,
            memory_limit_mb: MEMORY_LIMIT_MB,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_fast_mode_at_fast_initial() {
        let adapter = BatchSizeAdapter::new();
        assert_eq!(adapter.mode(), Mode::Fast);
        assert_eq!(adapter.current_batch_size(), 500);
    }

    #[test]
    fn grow_is_monotonic_and_capped_at_mode_max() {
        let mut adapter = BatchSizeAdapter::new();
        let mut previous = adapter.current_batch_size();
        for _ in 0..50 {
            adapter.grow();
            assert!(adapter.current_batch_size() >= previous);
            previous = adapter.current_batch_size();
        }
        assert_eq!(adapter.current_batch_size(), 2000);
    }

    #[test]
    fn grow_always_advances_by_at_least_one() {
        let mut adapter = BatchSizeAdapter {
            mode: Mode::RuLimited,
            current_batch_size: 1,
        };
        adapter.grow();
        assert_eq!(adapter.current_batch_size(), 2);
    }

    #[test]
    fn grow_is_noop_once_at_max() {
        let mut adapter = BatchSizeAdapter {
            mode: Mode::Fast,
            current_batch_size: 2000,
        };
        adapter.grow();
        assert_eq!(adapter.current_batch_size(), 2000);
    }

    #[test]
    fn throttle_with_proven_capacity_shrinks_to_it() {
        let mut adapter = BatchSizeAdapter::new();
        adapter.handle_throttle(50);
        assert_eq!(adapter.mode(), Mode::RuLimited);
        assert_eq!(adapter.current_batch_size(), 50);
    }

    #[test]
    fn throttle_with_zero_progress_halves() {
        let mut adapter = BatchSizeAdapter {
            mode: Mode::Fast,
            current_batch_size: 500,
        };
        adapter.handle_throttle(0);
        assert_eq!(adapter.mode(), Mode::RuLimited);
        assert_eq!(adapter.current_batch_size(), 250);
    }

    #[test]
    fn halve_never_drops_below_one() {
        let mut adapter = BatchSizeAdapter {
            mode: Mode::RuLimited,
            current_batch_size: 1,
        };
        adapter.halve();
        assert_eq!(adapter.current_batch_size(), 1);
    }

    #[test]
    fn throttle_above_ru_limited_initial_is_capped_to_n_below_max() {
        let mut adapter = BatchSizeAdapter {
            mode: Mode::RuLimited,
            current_batch_size: 800,
        };
        adapter.handle_throttle(500);
        assert_eq!(adapter.current_batch_size(), 500);
    }

    #[test]
    fn throttle_above_ru_limited_max_is_capped_to_max() {
        let mut adapter = BatchSizeAdapter {
            mode: Mode::RuLimited,
            current_batch_size: 1000,
        };
        adapter.handle_throttle(5000);
        assert_eq!(adapter.current_batch_size(), RU_LIMITED.max);
    }

    #[test]
    fn mode_transition_is_one_way() {
        let mut adapter = BatchSizeAdapter::new();
        adapter.handle_throttle(10);
        assert_eq!(adapter.mode(), Mode::RuLimited);
        adapter.grow();
        adapter.grow();
        assert_eq!(adapter.mode(), Mode::RuLimited, "mode must never return to Fast");
    }

    #[test]
    fn buffer_constraints_reports_current_size_and_fixed_memory_limit() {
        let adapter = BatchSizeAdapter::new();
        let constraints = adapter.buffer_constraints();
        assert_eq!(constraints.current_batch_size, 500);
        assert_eq!(constraints.memory_limit_mb, MEMORY_LIMIT_MB);
    }
}
