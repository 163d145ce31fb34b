use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

/// Runtime configuration for the assessor and the analyzer battery.
///
/// Defaults reproduce the deployed thresholds; any field can be overridden
/// from a TOML file passed with `--config`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Count records with unresolvable entity codes as failures instead of
    /// tracking them in the separate skipped counter.
    pub strict_references: bool,
    pub quality: QualityConfig,
    pub analysis: AnalysisConfig,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            strict_references: false,
            quality: QualityConfig::default(),
            analysis: AnalysisConfig::default(),
        }
    }
}

impl WatchConfig {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            None => Ok(Self::default()),
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("failed to parse config file {}", path.display()))
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub window_start_year: i32,
    pub window_end_year: i32,
    /// Relative change between adjacent years above which a jump is flagged.
    pub jump_threshold: f64,
    /// Points deducted per flagged jump.
    pub jump_penalty: f64,
    /// Points deducted per year since the latest observation.
    pub staleness_penalty: f64,
    pub completeness_weight: f64,
    pub timeliness_weight: f64,
    pub consistency_weight: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            window_start_year: 2000,
            window_end_year: 2024,
            jump_threshold: 2.0,
            jump_penalty: 20.0,
            staleness_penalty: 15.0,
            completeness_weight: 0.4,
            timeliness_weight: 0.3,
            consistency_weight: 0.3,
        }
    }
}

impl QualityConfig {
    pub fn expected_years(&self) -> i32 {
        (self.window_end_year - self.window_start_year + 1).max(0)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub thresholds: Vec<ThresholdRule>,
    pub alerts: Vec<CrisisRule>,
    /// Indicators ranked into a single leader/laggard comparison insight.
    pub comparisons: Vec<String>,
    /// Indicators compared region against region.
    pub regional: Vec<String>,
    pub yoy: YoyConfig,
    pub milestones: MilestoneConfig,
    pub recommendations: Vec<CrisisRule>,
    /// Indicators where a lower value means better progress.
    pub inverted_indicators: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            thresholds: vec![
                ThresholdRule::new("SG.GEN.PARL.ZS", "women in parliament", 30.0, 15.0, Some(50.0), 0.3),
                ThresholdRule::new("SP.DYN.LE00.IN", "life expectancy", 65.0, 60.0, Some(75.0), 0.5),
                ThresholdRule::new("SE.ADT.LITR.ZS", "adult literacy", 70.0, 50.0, Some(100.0), 0.5),
                ThresholdRule::new("NY.GDP.PCAP.CD", "GDP per capita", 5000.0, 1000.0, Some(12000.0), 0.0),
                ThresholdRule::new("IT.NET.USER.ZS", "internet use", 40.0, 20.0, Some(100.0), 0.5),
                ThresholdRule::new("EG.ELC.ACCS.ZS", "electricity access", 80.0, 50.0, Some(100.0), 0.5),
            ],
            alerts: vec![
                CrisisRule::new("SL.UEM.1524.ZS", "youth unemployment", 30.0, Breach::Above, 1, Some(6.0)),
                CrisisRule::new("SH.STA.MMRT", "maternal mortality", 500.0, Breach::Above, 1, Some(50.0)),
            ],
            comparisons: vec!["SG.GEN.PARL.ZS".to_string()],
            regional: vec![
                "NY.GDP.PCAP.CD".to_string(),
                "SP.DYN.LE00.IN".to_string(),
                "IT.NET.USER.ZS".to_string(),
            ],
            yoy: YoyConfig::default(),
            milestones: MilestoneConfig::default(),
            recommendations: vec![
                CrisisRule::new("SL.UEM.1524.ZS", "youth unemployment", 25.0, Breach::Above, 5, Some(6.0)),
                CrisisRule::new("IT.NET.USER.ZS", "internet penetration", 25.0, Breach::Below, 5, None),
            ],
            inverted_indicators: [
                "SH.STA.MMRT",
                "SH.DYN.MORT",
                "SI.POV.DDAY",
                "SL.UEM.1524.ZS",
                "EN.ATM.CO2E.PC",
                "SP.ADO.TFRT",
                "SH.HIV.INCD.TL.P3",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdRule {
    pub indicator: String,
    pub label: String,
    /// Latest values at or above this mark count as good performers.
    pub good_at_least: f64,
    /// Latest values below this mark count as poor performers.
    pub poor_below: f64,
    pub target: Option<f64>,
    /// Severity escalates to warning when the good-performer fraction falls
    /// below this ratio.
    #[serde(default = "default_warn_ratio")]
    pub warn_ratio: f64,
}

fn default_warn_ratio() -> f64 {
    0.3
}

impl ThresholdRule {
    fn new(
        indicator: &str,
        label: &str,
        good_at_least: f64,
        poor_below: f64,
        target: Option<f64>,
        warn_ratio: f64,
    ) -> Self {
        Self {
            indicator: indicator.to_string(),
            label: label.to_string(),
            good_at_least,
            poor_below,
            target,
            warn_ratio,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Breach {
    Above,
    Below,
}

/// A per-indicator crisis condition: at least `min_states` latest values on
/// the wrong side of `threshold`.
#[derive(Debug, Clone, Deserialize)]
pub struct CrisisRule {
    pub indicator: String,
    pub label: String,
    pub threshold: f64,
    pub breach: Breach,
    #[serde(default = "default_min_states")]
    pub min_states: usize,
    pub target: Option<f64>,
}

fn default_min_states() -> usize {
    1
}

impl CrisisRule {
    fn new(
        indicator: &str,
        label: &str,
        threshold: f64,
        breach: Breach,
        min_states: usize,
        target: Option<f64>,
    ) -> Self {
        Self {
            indicator: indicator.to_string(),
            label: label.to_string(),
            threshold,
            breach,
            min_states,
            target,
        }
    }

    pub fn breached(&self, value: f64) -> bool {
        match self.breach {
            Breach::Above => value > self.threshold,
            Breach::Below => value < self.threshold,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct YoyConfig {
    pub indicators: Vec<String>,
    /// Swing magnitude (pct change in the worsening direction) that surfaces
    /// an individual alert.
    pub alert_swing_pct: f64,
    /// Swing magnitude that counts a state toward an aggregate trend.
    pub trend_swing_pct: f64,
    /// Fraction of changing states that must improve for a positive trend.
    pub improving_ratio: f64,
    /// Fraction of changing states declining that triggers a warning trend.
    pub declining_ratio: f64,
    /// Minimum states with year-over-year data before a positive trend is
    /// worth reporting.
    pub min_sample: usize,
    pub max_alerts: usize,
}

impl Default for YoyConfig {
    fn default() -> Self {
        Self {
            indicators: vec![
                "SL.UEM.1524.ZS".to_string(),
                "SG.GEN.PARL.ZS".to_string(),
                "SP.DYN.LE00.IN".to_string(),
                "IT.NET.USER.ZS".to_string(),
                "EG.ELC.ACCS.ZS".to_string(),
            ],
            alert_swing_pct: 10.0,
            trend_swing_pct: 5.0,
            improving_ratio: 0.6,
            declining_ratio: 0.4,
            min_sample: 10,
            max_alerts: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MilestoneConfig {
    /// Progress at or above this is notable enough to report.
    pub notable_at_least: f64,
    /// Progress at or below this is notable enough to report.
    pub notable_at_most: f64,
    pub on_track_at_least: f64,
    pub progressing_at_least: f64,
    pub acceleration_at_least: f64,
}

impl Default for MilestoneConfig {
    fn default() -> Self {
        Self {
            notable_at_least: 50.0,
            notable_at_most: 20.0,
            on_track_at_least: 75.0,
            progressing_at_least: 60.0,
            acceleration_at_least: 30.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_the_analyzer_battery() {
        let cfg = WatchConfig::default();
        assert!(!cfg.strict_references);
        assert_eq!(cfg.quality.expected_years(), 25);
        assert_eq!(cfg.analysis.thresholds.len(), 6);
        assert_eq!(cfg.analysis.recommendations.len(), 2);
        assert!(cfg
            .analysis
            .inverted_indicators
            .contains(&"SH.STA.MMRT".to_string()));
    }

    #[test]
    fn toml_overrides_merge_over_defaults() {
        let cfg: WatchConfig = toml::from_str(
            r#"
            strict_references = true

            [quality]
            window_start_year = 2010
            window_end_year = 2019

            [analysis.yoy]
            alert_swing_pct = 25.0
            "#,
        )
        .expect("config should parse");

        assert!(cfg.strict_references);
        assert_eq!(cfg.quality.expected_years(), 10);
        assert_eq!(cfg.analysis.yoy.alert_swing_pct, 25.0);
        // Untouched sections keep their defaults.
        assert_eq!(cfg.quality.jump_penalty, 20.0);
        assert_eq!(cfg.analysis.thresholds.len(), 6);
    }

    #[test]
    fn crisis_rule_breach_direction() {
        let above = CrisisRule::new("X", "x", 30.0, Breach::Above, 1, None);
        assert!(above.breached(30.5));
        assert!(!above.breached(30.0));

        let below = CrisisRule::new("X", "x", 50.0, Breach::Below, 1, None);
        assert!(below.breached(49.0));
        assert!(!below.breached(50.0));
    }
}
