//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the simulation
//! produces identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! Sessions must replay identically for the same scenario and seed.
//! Sources of non-determinism include:
//!
//! - **Floating-point math**: We use fixed-point arithmetic via
//!   [`siege_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   Systems always iterate in sorted entity ID order.
//!
//! - **System randomness**: Displacement picks use a `ChaCha8Rng` seeded
//!   from the config.

use std::thread;

use siege_core::math::Fixed;
use siege_core::simulation::Simulation;

/// Tick length used by the harness: 1/20 s.
#[must_use]
pub fn tick_dt() -> Fixed {
    Fixed::ONE / Fixed::from_num(20)
}

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the simulation was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the simulation produced different hashes across runs.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Result of parallel simulation runs.
#[derive(Debug, Clone)]
pub struct ParallelSimResult {
    /// Final state hash from each simulation.
    pub hashes: Vec<u64>,
    /// Number of ticks each simulation ran.
    pub ticks: u64,
    /// Number of simulations run.
    pub num_sims: usize,
}

impl ParallelSimResult {
    /// Check if all simulations produced identical results.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert all simulations matched.
    ///
    /// # Panics
    ///
    /// Panics if simulations produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic() {
            panic!(
                "Parallel simulations diverged!\n\
                 Simulations: {}\n\
                 Ticks: {}\n\
                 All hashes: {:?}",
                self.num_sims, self.ticks, self.hashes
            );
        }
    }
}

/// Run a simulation multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the simulation
/// * `ticks` - Number of ticks to simulate per run
/// * `setup` - Function to create initial simulation state
/// * `step` - Function to advance simulation by one tick
/// * `hash` - Function to compute state hash
///
/// # Example
///
/// ```ignore
/// use siege_test_utils::determinism::{tick_dt, verify_determinism};
/// use siege_test_utils::fixtures::siege_scenario;
///
/// let result = verify_determinism(
///     5,   // Run 5 times
///     200, // 200 ticks each
///     siege_scenario,
///     |sim| { sim.tick(tick_dt()); },
///     |sim| sim.state_hash(),
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();
        for _ in 0..ticks {
            step(&mut state);
        }
        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);
    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Run a session for `num_ticks` and return its final state hash.
pub fn run_to_hash(sim: &mut Simulation, num_ticks: u64) -> u64 {
    let dt = tick_dt();
    for _ in 0..num_ticks {
        sim.tick(dt);
    }
    sim.state_hash()
}

/// Run N simulations on scoped threads and collect their final hashes.
///
/// Each simulation is built and dropped on its own thread, so only the
/// setup function has to be shareable.
pub fn run_parallel_simulations_scoped<F>(setup_fn: F, num_sims: usize, num_ticks: u64) -> ParallelSimResult
where
    F: Fn() -> Simulation + Sync,
{
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut sim = setup_fn();
                    run_to_hash(&mut sim, num_ticks)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|_| panic!("simulation thread panicked")))
            .collect()
    });

    ParallelSimResult {
        hashes,
        ticks: num_ticks,
        num_sims,
    }
}

/// Compare two simulation runs tick-by-tick, finding first divergence.
///
/// # Returns
///
/// `None` if simulations are deterministic, `Some(tick)` if they diverge
/// at that tick.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> Simulation,
{
    let dt = tick_dt();
    let mut sim1 = setup_fn();
    let mut sim2 = setup_fn();

    if sim1.state_hash() != sim2.state_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        sim1.tick(dt);
        sim2.tick(dt);

        if sim1.state_hash() != sim2.state_hash() {
            return Some(tick);
        }
    }

    None
}

/// Proptest strategies for combat properties.
pub mod strategies {
    use proptest::prelude::*;
    use siege_core::components::{RangeKind, RangeProfile};
    use siege_core::math::{Fixed, Vec2Fixed};

    /// Fixed-point coordinate on a 128 unit map.
    pub fn arb_fixed_position() -> impl Strategy<Value = Fixed> {
        (0i64..(128i64 << 32)).prop_map(Fixed::from_bits)
    }

    /// Position on a 128 by 128 unit map.
    pub fn arb_vec2_position() -> impl Strategy<Value = Vec2Fixed> {
        (arb_fixed_position(), arb_fixed_position()).prop_map(|(x, y)| Vec2Fixed::new(x, y))
    }

    /// Damage or HP amount from 0 to 200 with fractional part.
    pub fn arb_amount() -> impl Strategy<Value = Fixed> {
        (0i64..(200i64 << 32)).prop_map(Fixed::from_bits)
    }

    /// Tick length from 1 ms to 1 s.
    pub fn arb_dt() -> impl Strategy<Value = Fixed> {
        (1i64..=1000i64).prop_map(|ms| Fixed::from_num(ms) / Fixed::from_num(1000))
    }

    /// Any range kind.
    pub fn arb_range_kind() -> impl Strategy<Value = RangeKind> {
        prop_oneof![
            Just(RangeKind::Short),
            Just(RangeKind::Middle),
            Just(RangeKind::Long),
            Just(RangeKind::Explosive),
        ]
    }

    /// Profile with integer values from 0 to 20.
    pub fn arb_profile() -> impl Strategy<Value = RangeProfile> {
        (0i32..=20, 0i32..=20, 0i32..=20, 0i32..=20)
            .prop_map(|(s, m, l, e)| RangeProfile::from_ints(s, m, l, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::siege_scenario;

    #[test]
    fn test_verify_determinism_detects_divergence() {
        use std::cell::Cell;
        let counter = Cell::new(0u64);
        let result = verify_determinism(
            3,
            1,
            || {
                counter.set(counter.get() + 1);
                counter.get()
            },
            |_| {},
            |state| *state,
        );
        assert!(!result.is_deterministic);
        assert_eq!(result.unique_hashes().len(), 3);
    }

    #[test]
    fn test_siege_scenario_is_deterministic() {
        verify_determinism(
            3,
            100,
            siege_scenario,
            |sim| {
                sim.tick(tick_dt());
            },
            Simulation::state_hash,
        )
        .assert_deterministic();
    }

    #[test]
    fn test_no_divergence() {
        assert_eq!(find_first_divergence(siege_scenario, 100), None);
    }

    #[test]
    fn test_parallel_runs_match() {
        run_parallel_simulations_scoped(siege_scenario, 4, 100).assert_deterministic();
    }
}
