use super::common::PositionNed;
use crate::fatal;
use std::fmt;

/// A navigation target with a per-axis arrival tolerance.
///
/// Convergence is an AND of three independent axis bounds rather than a
/// euclidean distance. That keeps the check cheap and makes a miss
/// attributable to a single axis.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct ConvergenceGoal {
    target: PositionNed,
    epsilon_m: f64,
}

impl ConvergenceGoal {
    /// Creates a goal around `target`. `epsilon_m` must be strictly positive.
    pub fn new(target: PositionNed, epsilon_m: f64) -> Self {
        if epsilon_m <= 0.0 || epsilon_m.is_nan() {
            fatal!("Convergence tolerance must be strictly positive, got {epsilon_m}!");
        }
        Self { target, epsilon_m }
    }

    pub fn target(&self) -> PositionNed { self.target }
    pub fn epsilon_m(&self) -> f64 { self.epsilon_m }

    /// Whether `observed` lies within the tolerance box around the target.
    ///
    /// Strict inequality on every axis: a difference of exactly `epsilon_m`
    /// does not count as arrived. A NaN component compares false on its axis
    /// and therefore reports non-convergence instead of panicking.
    pub fn is_met_by(&self, observed: PositionNed) -> bool {
        let diff_n = (self.target.north_m() - observed.north_m()).abs();
        let diff_e = (self.target.east_m() - observed.east_m()).abs();
        let diff_d = (self.target.down_m() - observed.down_m()).abs();
        diff_n < self.epsilon_m && diff_e < self.epsilon_m && diff_d < self.epsilon_m
    }
}

impl fmt::Display for ConvergenceGoal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ±{:.2}m", self.target, self.epsilon_m)
    }
}
