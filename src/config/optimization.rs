//! Portfolio optimization configuration

/// Mean-variance solver knobs
pub struct MeanVarianceSettings {
    /// Return tie-breaker used only when no explicit target return is given
    pub lambda: f64,
    /// Projected-gradient iterations per outer (augmented Lagrangian) round
    pub max_iterations: usize,
    /// Outer rounds for the target-return multiplier
    pub max_outer_rounds: usize,
    /// Stop when no weight moves more than this between iterations
    pub step_tolerance: f64,
    /// Allowed violation of the target-return constraint
    pub constraint_tolerance: f64,
    /// Initial augmented Lagrangian penalty
    pub initial_penalty: f64,
    /// Upper bound on weights when gross exposure is not capped
    pub uncapped_upper_bound: f64,
}

/// Cardinality (binary selection) knobs
pub struct CardinalitySettings {
    /// Weight of expected return against risk in the selection energy
    pub gamma: f64,
    /// Quadratic penalty enforcing the cardinality constraint
    pub penalty: f64,
    /// Full bit-flip sweeps performed by simulated annealing
    pub anneal_sweeps: usize,
    pub anneal_start_temperature: f64,
    pub anneal_end_temperature: f64,
}

pub struct OptimizationConfig {
    pub mean_variance: MeanVarianceSettings,
    pub cardinality: CardinalitySettings,
    /// Weight cap applied by the "Max weight 20%" constraint preset
    pub max_weight_preset: f64,
}

pub const OPTIMIZATION: OptimizationConfig = OptimizationConfig {
    mean_variance: MeanVarianceSettings {
        lambda: 1e-3,
        max_iterations: 500,
        max_outer_rounds: 50,
        step_tolerance: 1e-10,
        constraint_tolerance: 1e-6,
        initial_penalty: 10.0,
        uncapped_upper_bound: 10.0,
    },

    cardinality: CardinalitySettings {
        gamma: 0.5,
        penalty: 10.0,
        anneal_sweeps: 400,
        anneal_start_temperature: 5.0,
        anneal_end_temperature: 1e-3,
    },

    max_weight_preset: 0.20,
};
