//! Adaptive controller
//!
//! `rho`/`lambda` are smoothing parameters validated on every assignment.
//! The rolling signal window resizes with the signal's coefficient of
//! variation: noisy signals get a longer window, stable ones a shorter one.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use stepweave_core::{Error, KernelConfig, Result};

/// Smoothing factor used when moving rho/lambda toward their targets.
const SMOOTHING: f64 = 0.2;
/// Latency above this multiple of the budget raises the latency weight.
const LATENCY_OVERRUN: f64 = 1.2;
/// Bounds keeping the asymmetric weights positive and finite.
const WEIGHT_MIN: f64 = 1e-6;
const WEIGHT_MAX: f64 = 1e6;

#[derive(Debug, Clone)]
pub struct AdaptiveParams {
    rho: f64,
    lambda: f64,
    pub latency_weight: f64,
    pub entropy_weight: f64,
    dynamic_threshold: f64,
    window: VecDeque<f64>,
    window_len: usize,
    window_min: usize,
    window_max: usize,
    latency_budget_ms: f64,
    breaker_tripped: bool,
}

/// Inputs to [`AdaptiveParams::receive_feedback`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackInput {
    pub context_ratio: f64,
    pub entropy_signal: f64,
    pub fault_count: u32,
    pub latency_ms: f64,
    pub load: f64,
    /// External memory signal; None when no memory provider is attached.
    pub memory_signal: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub bias_score: f64,
    pub next_latency_budget_ms: f64,
}

/// Point-in-time copy of the controller, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamsSnapshot {
    pub rho: f64,
    pub lambda: f64,
    pub latency_weight: f64,
    pub entropy_weight: f64,
    pub dynamic_threshold: f64,
    pub window_len: usize,
    pub latency_budget_ms: f64,
}

impl AdaptiveParams {
    pub fn new(config: &KernelConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            rho: config.rho,
            lambda: config.lambda,
            latency_weight: config.latency_weight,
            entropy_weight: config.entropy_weight,
            dynamic_threshold: 0.0,
            window: VecDeque::with_capacity(config.window_max),
            window_len: config.window_min,
            window_min: config.window_min,
            window_max: config.window_max,
            latency_budget_ms: config.latency_budget_ms.max(config.min_latency_budget_ms),
            breaker_tripped: false,
        })
    }

    pub fn rho(&self) -> f64 {
        self.rho
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn dynamic_threshold(&self) -> f64 {
        self.dynamic_threshold
    }

    pub fn window_len(&self) -> usize {
        self.window_len
    }

    pub fn latency_budget_ms(&self) -> f64 {
        self.latency_budget_ms
    }

    pub fn set_rho(&mut self, value: f64) -> Result<()> {
        self.rho = checked_unit("rho", value)?;
        Ok(())
    }

    pub fn set_lambda(&mut self, value: f64) -> Result<()> {
        self.lambda = checked_unit("lambda", value)?;
        Ok(())
    }

    /// Fold `signal` into the rolling window and retune.
    pub fn update(&mut self, signal: f64, secondary: f64, latency_ms: f64) -> Result<()> {
        for (name, v) in [("signal", signal), ("secondary", secondary), ("latency", latency_ms)] {
            if !v.is_finite() {
                return Err(Error::param_out_of_range(name, v, f64::MIN, f64::MAX));
            }
        }

        self.window.push_back(signal);
        while self.window.len() > self.window_len {
            self.window.pop_front();
        }

        let (mean, stdev) = mean_stdev(&self.window);
        let cv = if mean.abs() > f64::EPSILON {
            stdev / mean.abs()
        } else if stdev > 0.0 {
            1.0
        } else {
            0.0
        };

        // Stable signal pushes rho toward 1; lambda follows the secondary
        // signal, damped when latency runs over budget.
        let rho_target = 1.0 / (1.0 + cv);
        let lag = (latency_ms / self.latency_budget_ms).max(0.0);
        let lambda_target = secondary.clamp(0.0, 1.0) / (1.0 + lag);
        self.set_rho(self.rho + SMOOTHING * (rho_target - self.rho))?;
        self.set_lambda(self.lambda + SMOOTHING * (lambda_target - self.lambda))?;

        self.dynamic_threshold = mean + 2.0 * stdev;

        let span = (self.window_max - self.window_min) as f64;
        let target = self.window_min as f64 + cv.min(1.0) * span;
        self.window_len = (target.round() as usize).clamp(self.window_min, self.window_max);
        while self.window.len() > self.window_len {
            self.window.pop_front();
        }
        Ok(())
    }

    /// Adjust the asymmetric weights and return the bias score plus the
    /// next latency budget.
    pub fn receive_feedback(&mut self, input: FeedbackInput, config: &KernelConfig) -> Feedback {
        let latency = sanitize(input.latency_ms).max(0.0);
        let load = sanitize(input.load).max(0.0);
        let budget = self.latency_budget_ms;

        if latency > LATENCY_OVERRUN * budget {
            self.latency_weight *= config.latency_gain;
        } else {
            self.latency_weight *= config.latency_decay;
        }
        self.latency_weight = self.latency_weight.clamp(WEIGHT_MIN, WEIGHT_MAX);

        if input.fault_count > config.fault_ceiling {
            if !self.breaker_tripped {
                self.entropy_weight = (self.entropy_weight * 0.5).max(WEIGHT_MIN);
                self.breaker_tripped = true;
                tracing::warn!(
                    "fault count {} over ceiling {}, entropy weight halved to {:.4}",
                    input.fault_count,
                    config.fault_ceiling,
                    self.entropy_weight
                );
            }
        } else {
            self.breaker_tripped = false;
        }

        let latency_penalty = latency / budget + load / config.max_load;
        let mut bias_score = sanitize(input.entropy_signal) * self.entropy_weight
            - latency_penalty * self.latency_weight;
        if let Some(memory) = input.memory_signal {
            bias_score += config.memory_weight * sanitize(memory);
        }

        // Budget tracks observed latency, with headroom for higher-order context.
        let ctx = sanitize(input.context_ratio).clamp(0.0, 1.0);
        let observed = latency * (1.0 + 0.5 * ctx);
        self.latency_budget_ms =
            (0.8 * budget + 0.2 * observed).max(config.min_latency_budget_ms);

        Feedback {
            bias_score,
            next_latency_budget_ms: self.latency_budget_ms,
        }
    }

    pub fn snapshot(&self) -> ParamsSnapshot {
        ParamsSnapshot {
            rho: self.rho,
            lambda: self.lambda,
            latency_weight: self.latency_weight,
            entropy_weight: self.entropy_weight,
            dynamic_threshold: self.dynamic_threshold,
            window_len: self.window_len,
            latency_budget_ms: self.latency_budget_ms,
        }
    }
}

fn checked_unit(name: &'static str, value: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::param_out_of_range(name, value, 0.0, 1.0));
    }
    Ok(value)
}

fn sanitize(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

fn mean_stdev(values: &VecDeque<f64>) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, var.sqrt())
}
