//! Recompute configuration.

use std::str::FromStr;

use rust_decimal::Decimal;
use tracing::warn;

use buildledger_costing::ForecastMethod;
use buildledger_evm::EtcInput;

/// Recompute configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecomputeConfig {
    /// Decimal places kept on progress percentages.
    pub percentage_scale: u32,
    /// Decimal places kept on CPI, SPI and TCPI.
    pub ratio_scale: u32,
    /// Compute the nodes of one level in parallel.
    pub parallel: bool,
    /// Worker threads of the pass pool; 0 uses one per core.
    pub worker_threads: usize,
    /// Recorded as `calculated_by` on every snapshot.
    pub calculated_by: String,
    /// ETC method for nodes without an explicit estimate input.
    pub default_etc_method: ForecastMethod,
    /// Confidence level stamped on generated forecasts.
    pub forecast_confidence: Decimal,
}

impl Default for RecomputeConfig {
    fn default() -> Self {
        Self {
            percentage_scale: 4,
            ratio_scale: 4,
            parallel: true,
            worker_threads: 0,
            calculated_by: "recompute".to_string(),
            default_etc_method: ForecastMethod::Parametric,
            forecast_confidence: Decimal::new(5, 1),
        }
    }
}

impl RecomputeConfig {
    pub fn with_percentage_scale(mut self, scale: u32) -> Self {
        self.percentage_scale = scale;
        self
    }

    pub fn with_ratio_scale(mut self, scale: u32) -> Self {
        self.ratio_scale = scale;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    pub fn with_calculated_by(mut self, name: impl Into<String>) -> Self {
        self.calculated_by = name.into();
        self
    }

    pub fn with_default_etc_method(mut self, method: ForecastMethod) -> Self {
        self.default_etc_method = method;
        self
    }

    pub fn with_forecast_confidence(mut self, confidence: Decimal) -> Self {
        self.forecast_confidence = confidence;
        self
    }

    /// Read `BUILDLEDGER_*` variables over the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom source. Malformed
    /// values are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = parsed(&lookup, "BUILDLEDGER_PERCENTAGE_SCALE") {
            config.percentage_scale = v;
        }
        if let Some(v) = parsed(&lookup, "BUILDLEDGER_RATIO_SCALE") {
            config.ratio_scale = v;
        }
        if let Some(v) = parsed(&lookup, "BUILDLEDGER_PARALLEL") {
            config.parallel = v;
        }
        if let Some(v) = parsed(&lookup, "BUILDLEDGER_WORKER_THREADS") {
            config.worker_threads = v;
        }
        if let Some(v) = lookup("BUILDLEDGER_CALCULATED_BY") {
            if !v.trim().is_empty() {
                config.calculated_by = v.trim().to_string();
            }
        }
        if let Some(raw) = lookup("BUILDLEDGER_ETC_METHOD") {
            match parse_method(&raw) {
                Some(method) if EtcInput::derived(method).is_some() => {
                    config.default_etc_method = method;
                }
                _ => warn!(
                    key = "BUILDLEDGER_ETC_METHOD",
                    value = %raw,
                    "expected top_down, parametric or earned_value; using default"
                ),
            }
        }
        if let Some(v) = parsed::<Decimal>(&lookup, "BUILDLEDGER_FORECAST_CONFIDENCE") {
            if v >= Decimal::ZERO && v <= Decimal::ONE {
                config.forecast_confidence = v;
            } else {
                warn!(
                    key = "BUILDLEDGER_FORECAST_CONFIDENCE",
                    value = %v,
                    "confidence outside [0, 1]; using default"
                );
            }
        }

        config
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "malformed configuration value; using default");
            None
        }
    }
}

fn parse_method(raw: &str) -> Option<ForecastMethod> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "bottom_up" => Some(ForecastMethod::BottomUp),
        "top_down" => Some(ForecastMethod::TopDown),
        "parametric" => Some(ForecastMethod::Parametric),
        "three_point" => Some(ForecastMethod::ThreePoint),
        "earned_value" => Some(ForecastMethod::EarnedValue),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn reads_known_keys() {
        let config = RecomputeConfig::from_lookup(lookup(&[
            ("BUILDLEDGER_PERCENTAGE_SCALE", "2"),
            ("BUILDLEDGER_PARALLEL", "false"),
            ("BUILDLEDGER_WORKER_THREADS", "3"),
            ("BUILDLEDGER_CALCULATED_BY", "nightly"),
            ("BUILDLEDGER_ETC_METHOD", "earned_value"),
        ]));
        assert_eq!(config.percentage_scale, 2);
        assert!(!config.parallel);
        assert_eq!(config.worker_threads, 3);
        assert_eq!(config.calculated_by, "nightly");
        assert_eq!(config.default_etc_method, ForecastMethod::EarnedValue);
        assert_eq!(config.ratio_scale, 4);
    }

    #[test]
    fn malformed_values_fall_back_to_defaults() {
        let config = RecomputeConfig::from_lookup(lookup(&[
            ("BUILDLEDGER_RATIO_SCALE", "four"),
            ("BUILDLEDGER_ETC_METHOD", "bottom_up"),
            ("BUILDLEDGER_FORECAST_CONFIDENCE", "1.5"),
        ]));
        assert_eq!(config, RecomputeConfig::default());
    }

    #[test]
    fn builders_override_fields() {
        let config = RecomputeConfig::default()
            .with_parallel(false)
            .with_worker_threads(2)
            .with_ratio_scale(6);
        assert!(!config.parallel);
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.ratio_scale, 6);
    }
}
