//! Range-exceedance anomaly scoring.
//!
//! For each feature the forecast horizon is compared against the min/max
//! the feature actually showed in the normalized context window. A feature
//! whose forecast spends at least the threshold percentage outside that
//! range is flagged at risk. Severity then measures how far the latest
//! actual reading already deviates from the first forecast step, raw scale.

use chrono::{DateTime, Utc};

use crate::types::{
    AnomalyAssessment, FeatureDeviation, SeverityLevel, FEATURE_NAMES, NUM_FEATURES,
};

use super::ForecastOutput;

/// Anomaly detector with a configurable at-risk threshold.
#[derive(Debug, Clone, Copy)]
pub struct AnomalyDetector {
    /// A feature is at risk when `anomaly_pct >= threshold_pct`.
    threshold_pct: f64,
}

impl AnomalyDetector {
    pub fn new(threshold_pct: f64) -> Self {
        Self { threshold_pct }
    }

    pub fn threshold_pct(&self) -> f64 {
        self.threshold_pct
    }

    /// Score one cycle's forecast.
    ///
    /// `latest_actual` is the raw-scale reading of the newest context
    /// point. `now` is the cycle timestamp, captured once by the caller
    /// and reused verbatim in the message, the cache entry, and the event
    /// record.
    pub fn assess(
        &self,
        output: &ForecastOutput,
        latest_actual: [f64; NUM_FEATURES],
        now: DateTime<Utc>,
    ) -> AnomalyAssessment {
        let forecast = &output.forecast;
        let horizon = forecast.horizon();
        let first_step_raw = forecast.raw.first().copied().unwrap_or([0.0; NUM_FEATURES]);

        let mut anomaly_pct = [0.0; NUM_FEATURES];
        let mut at_risk_features: Vec<String> = Vec::new();
        let mut deviations = [FeatureDeviation {
            actual: 0.0,
            predicted: 0.0,
            deviation: 0.0,
            deviation_pct: 0.0,
        }; NUM_FEATURES];

        for f in 0..NUM_FEATURES {
            let lo = output
                .scaled_context
                .iter()
                .map(|row| row[f])
                .fold(f64::INFINITY, f64::min);
            let hi = output
                .scaled_context
                .iter()
                .map(|row| row[f])
                .fold(f64::NEG_INFINITY, f64::max);

            let outside = forecast
                .scaled
                .iter()
                .filter(|row| row[f] > hi || row[f] < lo)
                .count();
            anomaly_pct[f] = if horizon == 0 {
                0.0
            } else {
                outside as f64 / horizon as f64 * 100.0
            };

            let actual = latest_actual[f];
            let predicted = first_step_raw[f];
            let deviation = actual - predicted;
            deviations[f] = FeatureDeviation {
                actual,
                predicted,
                deviation,
                deviation_pct: if predicted != 0.0 {
                    deviation.abs() / predicted.abs() * 100.0
                } else {
                    deviation.abs()
                },
            };

            if anomaly_pct[f] >= self.threshold_pct {
                at_risk_features.push(FEATURE_NAMES[f].to_string());
            }
        }

        let at_risk = !at_risk_features.is_empty();

        // Severity only considers at-risk features: relative deviation of
        // the latest actual from the first forecast step, max over features.
        // Ties keep the first feature in canonical order.
        let mut severity_score = 0.0;
        let mut primary_anomaly: Option<String> = None;
        for name in &at_risk_features {
            let f = FEATURE_NAMES
                .iter()
                .position(|n| n == name)
                .unwrap_or_default();
            let d = deviations[f];
            let severity = if d.predicted != 0.0 {
                d.deviation.abs() / d.predicted.abs()
            } else {
                d.deviation.abs()
            };
            if severity > severity_score {
                severity_score = severity;
                primary_anomaly = Some(name.clone());
            } else if primary_anomaly.is_none() {
                primary_anomaly = Some(name.clone());
            }
        }

        let alert_message = if at_risk {
            format!(
                "Machine at Risk: Stay alert on {} (Checked at: {})",
                at_risk_features.join(", "),
                now.to_rfc3339()
            )
        } else {
            format!("Machine Condition Normal (Checked at: {})", now.to_rfc3339())
        };

        AnomalyAssessment {
            workspace_id: forecast.workspace_id.clone(),
            timestamp: now,
            anomaly_pct,
            at_risk_features,
            at_risk,
            severity_score,
            severity_level: SeverityLevel::classify(severity_score),
            primary_anomaly,
            alert_message,
            deviations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ForecastResult;

    fn output_with(
        context: Vec<[f64; NUM_FEATURES]>,
        scaled: Vec<[f64; NUM_FEATURES]>,
        raw: Vec<[f64; NUM_FEATURES]>,
    ) -> ForecastOutput {
        ForecastOutput {
            scaled_context: context,
            forecast: ForecastResult {
                workspace_id: "ws".to_string(),
                generated_at: Utc::now(),
                scaled,
                raw,
            },
        }
    }

    /// 50 constant context points except `current` trending upward;
    /// forecast entirely above the historical max for `current`.
    #[test]
    fn trending_current_fully_outside_range_is_primary_anomaly() {
        let mut context = vec![[0.5; NUM_FEATURES]; 50];
        for (i, row) in context.iter_mut().enumerate() {
            row[0] = 0.3 + 0.004 * i as f64; // current rises to ~0.496
        }
        // Forecast: current above max, everything else inside range
        let scaled = vec![[0.9, 0.5, 0.5, 0.5, 0.5, 0.5]; 10];
        let raw = vec![[9.0, 5.0, 5.0, 5.0, 5.0, 5.0]; 10];

        let detector = AnomalyDetector::new(30.0);
        let assessment = detector.assess(
            &output_with(context, scaled, raw),
            [12.0, 5.0, 5.0, 5.0, 5.0, 5.0],
            Utc::now(),
        );

        assert!((assessment.anomaly_pct[0] - 100.0).abs() < 1e-12);
        assert!(assessment.at_risk);
        assert_eq!(assessment.at_risk_features, vec!["current".to_string()]);
        assert_eq!(assessment.primary_anomaly.as_deref(), Some("current"));
        assert!(assessment.alert_message.contains("current"));
    }

    #[test]
    fn anomaly_pct_is_bounded_and_monotone_in_outside_count() {
        let context = vec![[0.5; NUM_FEATURES]; 20];
        let detector = AnomalyDetector::new(30.0);

        let mut last_pct = -1.0;
        for outside in 0..=10usize {
            let mut scaled = vec![[0.5; NUM_FEATURES]; 10];
            for row in scaled.iter_mut().take(outside) {
                row[2] = 2.0; // push accY out of range
            }
            let raw = scaled.clone();
            let assessment = detector.assess(
                &output_with(context.clone(), scaled, raw),
                [0.5; NUM_FEATURES],
                Utc::now(),
            );
            let pct = assessment.anomaly_pct[2];
            assert!((0.0..=100.0).contains(&pct));
            assert!(pct >= last_pct, "pct must not decrease: {last_pct} -> {pct}");
            last_pct = pct;
        }
        assert!((last_pct - 100.0).abs() < 1e-12);
    }

    #[test]
    fn threshold_comparison_is_inclusive() {
        let context = vec![[0.5; NUM_FEATURES]; 10];
        // Exactly 3 of 10 steps outside => 30.0%
        let mut scaled = vec![[0.5; NUM_FEATURES]; 10];
        for row in scaled.iter_mut().take(3) {
            row[5] = 2.0;
        }
        let raw = scaled.clone();
        let detector = AnomalyDetector::new(30.0);
        let assessment = detector.assess(
            &output_with(context, scaled, raw),
            [0.5; NUM_FEATURES],
            Utc::now(),
        );
        assert!(assessment.at_risk);
        assert_eq!(assessment.at_risk_features, vec!["tempB".to_string()]);
    }

    #[test]
    fn healthy_forecast_produces_normal_message_and_low_severity() {
        let context = vec![[0.2; NUM_FEATURES], [0.8; NUM_FEATURES]];
        let scaled = vec![[0.5; NUM_FEATURES]; 10];
        let raw = vec![[5.0; NUM_FEATURES]; 10];
        let detector = AnomalyDetector::new(30.0);
        let assessment = detector.assess(
            &output_with(context, scaled, raw),
            [5.0; NUM_FEATURES],
            Utc::now(),
        );

        assert!(!assessment.at_risk);
        assert!(assessment.at_risk_features.is_empty());
        assert!(assessment.primary_anomaly.is_none());
        assert!((assessment.severity_score - 0.0).abs() < f64::EPSILON);
        assert_eq!(assessment.severity_level, SeverityLevel::Low);
        assert!(assessment.alert_message.starts_with("Machine Condition Normal"));
    }

    #[test]
    fn severity_uses_relative_deviation_against_first_step() {
        let context = vec![[0.5; NUM_FEATURES]; 10];
        // All features far out of range => everything at risk
        let scaled = vec![[2.0; NUM_FEATURES]; 10];
        // First-step raw predictions: current predicts 10.0, actual 16.0
        // => severity 0.6 => High; other features predict perfectly.
        let mut raw = vec![[5.0; NUM_FEATURES]; 10];
        raw[0][0] = 10.0;
        let mut actual = [5.0; NUM_FEATURES];
        actual[0] = 16.0;

        let detector = AnomalyDetector::new(30.0);
        let assessment = detector.assess(&output_with(context, scaled, raw), actual, Utc::now());

        assert!(assessment.at_risk);
        assert!((assessment.severity_score - 0.6).abs() < 1e-9);
        assert_eq!(assessment.severity_level, SeverityLevel::High);
        assert_eq!(assessment.primary_anomaly.as_deref(), Some("current"));
    }

    #[test]
    fn cycle_timestamp_is_shared_between_message_and_record() {
        let context = vec![[0.5; NUM_FEATURES]; 10];
        let scaled = vec![[2.0; NUM_FEATURES]; 10];
        let raw = vec![[5.0; NUM_FEATURES]; 10];
        let now = Utc::now();

        let detector = AnomalyDetector::new(30.0);
        let assessment =
            detector.assess(&output_with(context, scaled, raw), [6.0; NUM_FEATURES], now);

        assert_eq!(assessment.timestamp, now);
        assert!(assessment.alert_message.contains(&now.to_rfc3339()));
    }
}
