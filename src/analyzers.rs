use std::collections::BTreeMap;

use serde_json::json;

use crate::config::{AnalysisConfig, CrisisRule, MilestoneConfig, ThresholdRule, YoyConfig};
use crate::insights::{AnalyzerState, LatestValue, YoyChange};
use crate::models::{InsightDraft, InsightSeverity, InsightType};
use crate::quality::{round1, round2};

/// One unit of the fixed battery. Reads the snapshot, returns drafts; never
/// writes to the store itself.
pub trait Analyzer {
    fn name(&self) -> &'static str;
    fn analyze(&self, state: &AnalyzerState) -> anyhow::Result<Vec<InsightDraft>>;
}

/// The analyzer battery in its fixed execution order.
pub fn battery(cfg: &AnalysisConfig) -> Vec<Box<dyn Analyzer>> {
    vec![
        Box::new(ThresholdFindings {
            rules: cfg.thresholds.clone(),
        }),
        Box::new(CrisisAlerts {
            rules: cfg.alerts.clone(),
        }),
        Box::new(LeaderLaggard {
            indicators: cfg.comparisons.clone(),
        }),
        Box::new(YearOverYear {
            cfg: cfg.yoy.clone(),
            inverted: cfg.inverted_indicators.clone(),
        }),
        Box::new(RegionalComparison {
            indicators: cfg.regional.clone(),
        }),
        Box::new(Milestones {
            cfg: cfg.milestones.clone(),
            inverted: cfg.inverted_indicators.clone(),
        }),
        Box::new(Recommendations {
            rules: cfg.recommendations.clone(),
        }),
    ]
}

fn with_unit(value: f64, unit: Option<&str>) -> String {
    match unit {
        Some("%") => format!("{value:.1}%"),
        Some(unit) => format!("{value:.1} {unit}"),
        None => format!("{value:.1}"),
    }
}

fn mean_of(values: &[LatestValue]) -> f64 {
    values.iter().map(|v| v.value).sum::<f64>() / values.len() as f64
}

// ── Threshold findings ──────────────────────────────────────────────

/// Counts latest values against a configured good/poor band per indicator.
struct ThresholdFindings {
    rules: Vec<ThresholdRule>,
}

impl Analyzer for ThresholdFindings {
    fn name(&self) -> &'static str {
        "threshold-findings"
    }

    fn analyze(&self, state: &AnalyzerState) -> anyhow::Result<Vec<InsightDraft>> {
        let mut drafts = Vec::new();
        for rule in &self.rules {
            let Some(indicator) = state.indicator(&rule.indicator) else {
                continue;
            };
            let latest = state.latest_values(&rule.indicator);
            if latest.is_empty() {
                continue;
            }

            let total = latest.len();
            let average = mean_of(&latest);
            let good = latest.iter().filter(|v| v.value >= rule.good_at_least).count();
            let poor = latest.iter().filter(|v| v.value < rule.poor_below).count();
            let severity = if (good as f64) < total as f64 * rule.warn_ratio {
                InsightSeverity::Warning
            } else {
                InsightSeverity::Neutral
            };

            let unit = indicator.unit.as_deref();
            let target_tail = rule
                .target
                .map(|t| format!(" The 2063 target is {}.", with_unit(t, unit)))
                .unwrap_or_default();
            drafts.push(InsightDraft {
                insight_type: InsightType::Finding,
                severity,
                title: format!(
                    "Only {good} of {total} reporting member states are at or above {} for {}",
                    rule.good_at_least, rule.label
                ),
                description: format!(
                    "The continental average for {} is {}. {} of {} reporting states are at \
                     or above {}, while {} remain below {}.{}",
                    rule.label,
                    with_unit(average, unit),
                    good,
                    total,
                    rule.good_at_least,
                    poor,
                    rule.poor_below,
                    target_tail
                ),
                evidence: json!({
                    "indicator": rule.indicator,
                    "continental_avg": round2(average),
                    "states_above_threshold": good,
                    "states_below_floor": poor,
                    "total_states": total,
                    "good_threshold": rule.good_at_least,
                    "poor_threshold": rule.poor_below,
                    "target": rule.target,
                }),
                goal_id: indicator.goal_id,
                indicator_id: Some(indicator.id),
                member_state_id: None,
            });
        }
        Ok(drafts)
    }
}

// ── Crisis alerts ───────────────────────────────────────────────────

/// Critical alert when enough states sit on the wrong side of a configured
/// threshold, naming the worst five.
struct CrisisAlerts {
    rules: Vec<CrisisRule>,
}

impl Analyzer for CrisisAlerts {
    fn name(&self) -> &'static str {
        "crisis-alerts"
    }

    fn analyze(&self, state: &AnalyzerState) -> anyhow::Result<Vec<InsightDraft>> {
        let mut drafts = Vec::new();
        for rule in &self.rules {
            let Some(indicator) = state.indicator(&rule.indicator) else {
                continue;
            };
            let latest = state.latest_values(&rule.indicator);
            let mut breaching: Vec<&LatestValue> =
                latest.iter().filter(|v| rule.breached(v.value)).collect();
            if breaching.len() < rule.min_states {
                continue;
            }
            breaching.sort_by(|a, b| {
                let ordering = a.value.partial_cmp(&b.value).unwrap_or(std::cmp::Ordering::Equal);
                match rule.breach {
                    crate::config::Breach::Above => ordering.reverse(),
                    crate::config::Breach::Below => ordering,
                }
            });

            let unit = indicator.unit.as_deref();
            let direction = match rule.breach {
                crate::config::Breach::Above => "above",
                crate::config::Breach::Below => "below",
            };
            let worst: Vec<&&LatestValue> = breaching.iter().take(5).collect();
            let named = worst
                .iter()
                .map(|v| format!("{} ({})", v.state_name, with_unit(v.value, unit)))
                .collect::<Vec<_>>()
                .join(", ");
            let target_tail = rule
                .target
                .map(|t| format!(" The 2063 target is {}.", with_unit(t, unit)))
                .unwrap_or_default();

            drafts.push(InsightDraft {
                insight_type: InsightType::Alert,
                severity: InsightSeverity::Critical,
                title: format!(
                    "{} member states report {} {} {}",
                    breaching.len(),
                    rule.label,
                    direction,
                    rule.threshold
                ),
                description: format!(
                    "{} member states report {} {} {}. Worst affected: {}.{}",
                    breaching.len(),
                    rule.label,
                    direction,
                    with_unit(rule.threshold, unit),
                    named,
                    target_tail
                ),
                evidence: json!({
                    "indicator": rule.indicator,
                    "breaching_states": breaching.len(),
                    "threshold": rule.threshold,
                    "target": rule.target,
                    "worst": worst
                        .iter()
                        .map(|v| json!({
                            "state": v.state_name,
                            "iso_code": v.iso_code,
                            "value": round2(v.value),
                        }))
                        .collect::<Vec<_>>(),
                }),
                goal_id: indicator.goal_id,
                indicator_id: Some(indicator.id),
                member_state_id: None,
            });
        }
        Ok(drafts)
    }
}

// ── Leader/laggard comparison ───────────────────────────────────────

/// Single comparison insight ranking the top three and bottom three states
/// by latest value. Needs at least three states with data.
struct LeaderLaggard {
    indicators: Vec<String>,
}

impl Analyzer for LeaderLaggard {
    fn name(&self) -> &'static str {
        "leader-laggard"
    }

    fn analyze(&self, state: &AnalyzerState) -> anyhow::Result<Vec<InsightDraft>> {
        let mut drafts = Vec::new();
        for code in &self.indicators {
            let Some(indicator) = state.indicator(code) else {
                continue;
            };
            let mut latest = state.latest_values(code);
            if latest.len() < 3 {
                continue;
            }
            latest.sort_by(|a, b| {
                b.value.partial_cmp(&a.value).unwrap_or(std::cmp::Ordering::Equal)
            });

            let unit = indicator.unit.as_deref();
            let describe = |values: &[&LatestValue]| {
                values
                    .iter()
                    .map(|v| format!("{} ({})", v.state_name, with_unit(v.value, unit)))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            let top: Vec<&LatestValue> = latest.iter().take(3).collect();
            let bottom: Vec<&LatestValue> = latest.iter().rev().take(3).collect();

            drafts.push(InsightDraft {
                insight_type: InsightType::Comparison,
                severity: InsightSeverity::Neutral,
                title: format!("{}: top and bottom performers", indicator.name),
                description: format!(
                    "Leaders: {}. Lagging: {}.",
                    describe(&top),
                    describe(&bottom)
                ),
                evidence: json!({
                    "indicator": code,
                    "top_3": top
                        .iter()
                        .map(|v| json!({"state": v.state_name, "value": round2(v.value), "year": v.year}))
                        .collect::<Vec<_>>(),
                    "bottom_3": bottom
                        .iter()
                        .map(|v| json!({"state": v.state_name, "value": round2(v.value), "year": v.year}))
                        .collect::<Vec<_>>(),
                }),
                goal_id: indicator.goal_id,
                indicator_id: Some(indicator.id),
                member_state_id: None,
            });
        }
        Ok(drafts)
    }
}

// ── Year-over-year ──────────────────────────────────────────────────

/// Surfaces sharp worsening swings as individual alerts and broad
/// improving/declining majorities as aggregate trends. For inverted
/// indicators a rising value is the worsening direction.
struct YearOverYear {
    cfg: YoyConfig,
    inverted: Vec<String>,
}

impl YearOverYear {
    fn improvement(&self, code: &str, change: &YoyChange) -> f64 {
        if self.inverted.iter().any(|c| c == code) {
            -change.pct_change
        } else {
            change.pct_change
        }
    }
}

impl Analyzer for YearOverYear {
    fn name(&self) -> &'static str {
        "year-over-year"
    }

    fn analyze(&self, state: &AnalyzerState) -> anyhow::Result<Vec<InsightDraft>> {
        let mut drafts = Vec::new();
        for code in &self.cfg.indicators {
            let Some(indicator) = state.indicator(code) else {
                continue;
            };
            let changes = state.year_over_year(code);
            if changes.is_empty() {
                continue;
            }
            let unit = indicator.unit.as_deref();

            let mut worsening: Vec<&YoyChange> = changes
                .iter()
                .filter(|c| self.improvement(code, c) < -self.cfg.alert_swing_pct)
                .collect();
            worsening.sort_by(|a, b| {
                self.improvement(code, a)
                    .partial_cmp(&self.improvement(code, b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            for change in worsening.iter().take(self.cfg.max_alerts) {
                let verb = if change.pct_change > 0.0 { "rose" } else { "fell" };
                drafts.push(InsightDraft {
                    insight_type: InsightType::Alert,
                    severity: InsightSeverity::Warning,
                    title: format!(
                        "{} in {} {} {:.0}% year-over-year",
                        indicator.name,
                        change.state_name,
                        verb,
                        change.pct_change.abs()
                    ),
                    description: format!(
                        "{} in {} moved from {} ({}) to {} ({}), a {:.1}% change.",
                        indicator.name,
                        change.state_name,
                        with_unit(change.previous_value, unit),
                        change.previous_year,
                        with_unit(change.latest_value, unit),
                        change.latest_year,
                        change.pct_change
                    ),
                    evidence: json!({
                        "indicator": code,
                        "state": change.state_name,
                        "iso_code": change.iso_code,
                        "previous": change.previous_value,
                        "current": change.latest_value,
                        "change_pct": change.pct_change,
                    }),
                    goal_id: indicator.goal_id,
                    indicator_id: Some(indicator.id),
                    member_state_id: Some(change.member_state_id),
                });
            }

            let total = changes.len();
            let improving = changes
                .iter()
                .filter(|c| self.improvement(code, c) > self.cfg.trend_swing_pct)
                .count();
            let declining = changes
                .iter()
                .filter(|c| self.improvement(code, c) < -self.cfg.trend_swing_pct)
                .count();

            if total >= self.cfg.min_sample
                && (improving as f64) > total as f64 * self.cfg.improving_ratio
            {
                drafts.push(InsightDraft {
                    insight_type: InsightType::Trend,
                    severity: InsightSeverity::Positive,
                    title: format!(
                        "{}: {} of {} states improving year-over-year",
                        indicator.name, improving, total
                    ),
                    description: format!(
                        "{} is improving across the continent. {} of {} states with \
                         year-over-year data show changes in the right direction.",
                        indicator.name, improving, total
                    ),
                    evidence: json!({
                        "indicator": code,
                        "improving_states": improving,
                        "declining_states": declining,
                        "total_states": total,
                    }),
                    goal_id: indicator.goal_id,
                    indicator_id: Some(indicator.id),
                    member_state_id: None,
                });
            } else if declining > 0 && (declining as f64) > total as f64 * self.cfg.declining_ratio
            {
                drafts.push(InsightDraft {
                    insight_type: InsightType::Trend,
                    severity: InsightSeverity::Warning,
                    title: format!(
                        "{}: {} of {} states declining year-over-year",
                        indicator.name, declining, total
                    ),
                    description: format!(
                        "{} is declining in {} of {} states with year-over-year data. \
                         This warrants attention and potential intervention.",
                        indicator.name, declining, total
                    ),
                    evidence: json!({
                        "indicator": code,
                        "declining_states": declining,
                        "total_states": total,
                    }),
                    goal_id: indicator.goal_id,
                    indicator_id: Some(indicator.id),
                    member_state_id: None,
                });
            }
        }
        Ok(drafts)
    }
}

// ── Regional comparison ─────────────────────────────────────────────

/// Best region against worst region by mean latest value, with the full
/// per-region breakdown in the evidence.
struct RegionalComparison {
    indicators: Vec<String>,
}

impl Analyzer for RegionalComparison {
    fn name(&self) -> &'static str {
        "regional-comparison"
    }

    fn analyze(&self, state: &AnalyzerState) -> anyhow::Result<Vec<InsightDraft>> {
        let mut drafts = Vec::new();
        for code in &self.indicators {
            let Some(indicator) = state.indicator(code) else {
                continue;
            };
            let latest = state.latest_values(code);

            let mut by_region: BTreeMap<String, Vec<f64>> = BTreeMap::new();
            for value in &latest {
                let Some(region) = state.region_name(value.region_id) else {
                    continue;
                };
                by_region.entry(region.to_string()).or_default().push(value.value);
            }
            if by_region.len() < 2 {
                continue;
            }

            let mut averages: Vec<(String, f64)> = by_region
                .into_iter()
                .map(|(region, values)| {
                    let avg = values.iter().sum::<f64>() / values.len() as f64;
                    (region, round2(avg))
                })
                .collect();
            averages.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            let (best, best_avg) = averages[0].clone();
            let Some((worst, worst_avg)) = averages.last().cloned() else {
                continue;
            };
            if best_avg == worst_avg {
                continue;
            }

            let breakdown = averages
                .iter()
                .map(|(region, avg)| format!("{region}: {avg:.1}"))
                .collect::<Vec<_>>()
                .join(", ");
            let mut regional_averages = serde_json::Map::new();
            for (region, avg) in &averages {
                regional_averages.insert(region.clone(), json!(avg));
            }

            drafts.push(InsightDraft {
                insight_type: InsightType::Comparison,
                severity: InsightSeverity::Neutral,
                title: format!(
                    "{}: {} leads ({:.1}), {} lags ({:.1})",
                    indicator.name, best, best_avg, worst, worst_avg
                ),
                description: format!(
                    "Regional comparison for {}: {} leads with an average of {:.1}, while {} \
                     lags at {:.1}. Regional breakdown: {}.",
                    indicator.name, best, best_avg, worst, worst_avg, breakdown
                ),
                evidence: json!({
                    "indicator": code,
                    "regional_averages": regional_averages,
                    "best_region": best,
                    "worst_region": worst,
                }),
                goal_id: indicator.goal_id,
                indicator_id: Some(indicator.id),
                member_state_id: None,
            });
        }
        Ok(drafts)
    }
}

// ── Milestones ──────────────────────────────────────────────────────

/// Linear interpolation between a baseline and the target, clamped to
/// [0, 100]. The baseline defaults to twice the current mean when the catalog
/// does not carry one; for inverted indicators progress grows as the mean
/// falls toward the target.
pub fn milestone_progress(mean: f64, baseline: f64, target: f64, inverted: bool) -> f64 {
    let span = target - baseline;
    if span.abs() < f64::EPSILON {
        let met = if inverted { mean <= target } else { mean >= target };
        return if met { 100.0 } else { 0.0 };
    }
    ((mean - baseline) / span * 100.0).clamp(0.0, 100.0)
}

pub fn milestone_status(progress: f64, cfg: &MilestoneConfig) -> (InsightSeverity, &'static str) {
    if progress >= cfg.on_track_at_least {
        (InsightSeverity::Positive, "on track")
    } else if progress >= cfg.progressing_at_least {
        (InsightSeverity::Positive, "progressing")
    } else if progress >= cfg.acceleration_at_least {
        (InsightSeverity::Warning, "needs acceleration")
    } else {
        (InsightSeverity::Critical, "significantly off track")
    }
}

/// Progress toward the 2063 target for every indicator that has one. Only
/// clearly notable progress (high or very low) is reported; the mid-band is
/// noise.
struct Milestones {
    cfg: MilestoneConfig,
    inverted: Vec<String>,
}

impl Analyzer for Milestones {
    fn name(&self) -> &'static str {
        "milestones"
    }

    fn analyze(&self, state: &AnalyzerState) -> anyhow::Result<Vec<InsightDraft>> {
        let mut drafts = Vec::new();
        for indicator in state.indicators() {
            let Some(target) = indicator.target_value else {
                continue;
            };
            let latest = state.latest_values(&indicator.code);
            if latest.is_empty() {
                continue;
            }

            let average = mean_of(&latest);
            let baseline = indicator.baseline_value.unwrap_or(average * 2.0);
            let inverted = self.inverted.iter().any(|c| *c == indicator.code);
            let progress = round1(milestone_progress(average, baseline, target, inverted));
            let (severity, status) = milestone_status(progress, &self.cfg);

            if progress < self.cfg.notable_at_least && progress > self.cfg.notable_at_most {
                continue;
            }

            let unit = indicator.unit.as_deref();
            drafts.push(InsightDraft {
                insight_type: InsightType::Milestone,
                severity,
                title: format!(
                    "{}: {progress}% toward the 2063 target, {status}",
                    indicator.name
                ),
                description: format!(
                    "The continental average for {} is {}. Target: {}. Progress: {:.1}%, {}.",
                    indicator.name,
                    with_unit(average, unit),
                    with_unit(target, unit),
                    progress,
                    status
                ),
                evidence: json!({
                    "indicator": indicator.code,
                    "current_avg": round2(average),
                    "baseline": round2(baseline),
                    "baseline_year": indicator.baseline_year,
                    "target": target,
                    "progress_pct": progress,
                    "states_reporting": latest.len(),
                }),
                goal_id: indicator.goal_id,
                indicator_id: Some(indicator.id),
                member_state_id: None,
            });
        }
        Ok(drafts)
    }
}

// ── Recommendations ─────────────────────────────────────────────────

/// Turns an aggregate crisis condition into a recommendation focused on the
/// worst-affected region.
struct Recommendations {
    rules: Vec<CrisisRule>,
}

impl Analyzer for Recommendations {
    fn name(&self) -> &'static str {
        "recommendations"
    }

    fn analyze(&self, state: &AnalyzerState) -> anyhow::Result<Vec<InsightDraft>> {
        let mut drafts = Vec::new();
        for rule in &self.rules {
            let Some(indicator) = state.indicator(&rule.indicator) else {
                continue;
            };
            let latest = state.latest_values(&rule.indicator);
            let offenders: Vec<&LatestValue> =
                latest.iter().filter(|v| rule.breached(v.value)).collect();
            if offenders.len() < rule.min_states {
                continue;
            }

            let mut by_region: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
            for value in &offenders {
                let region = state.region_name(value.region_id).unwrap_or("Unassigned");
                by_region.entry(region).or_default().push(value.state_name.as_str());
            }
            let Some((focus_region, focus_states)) = by_region
                .iter()
                .max_by_key(|(_, states)| states.len())
                .map(|(region, states)| (*region, states.clone()))
            else {
                continue;
            };

            let unit = indicator.unit.as_deref();
            let direction = match rule.breach {
                crate::config::Breach::Above => "above",
                crate::config::Breach::Below => "below",
            };
            let target_tail = rule
                .target
                .map(|t| format!(" to meet the 2063 target of {}", with_unit(t, unit)))
                .unwrap_or_default();

            drafts.push(InsightDraft {
                insight_type: InsightType::Recommendation,
                severity: InsightSeverity::Warning,
                title: format!(
                    "Prioritize {} interventions in {} ({} states {} {})",
                    rule.label,
                    focus_region,
                    focus_states.len(),
                    direction,
                    rule.threshold
                ),
                description: format!(
                    "{} has {} states with {} {} {}: {}. Targeted interventions are needed{}.",
                    focus_region,
                    focus_states.len(),
                    rule.label,
                    direction,
                    with_unit(rule.threshold, unit),
                    focus_states.join(", "),
                    target_tail
                ),
                evidence: json!({
                    "indicator": rule.indicator,
                    "region": focus_region,
                    "states": focus_states,
                    "total_breaching": offenders.len(),
                    "threshold": rule.threshold,
                    "target": rule.target,
                }),
                goal_id: indicator.goal_id,
                indicator_id: Some(indicator.id),
                member_state_id: None,
            });
        }
        Ok(drafts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Breach;
    use crate::insights::ObservationPoint;
    use crate::models::{IndicatorDefinition, MemberState, Region};

    fn indicator(id: i64, code: &str, target: Option<f64>, baseline: Option<f64>) -> IndicatorDefinition {
        IndicatorDefinition {
            id,
            code: code.to_string(),
            name: format!("Indicator {code}"),
            unit: Some("%".to_string()),
            goal_id: Some(100 + id),
            target_value: target,
            baseline_value: baseline,
            baseline_year: None,
        }
    }

    fn member(id: i64, name: &str, region_id: Option<i64>) -> MemberState {
        MemberState {
            id,
            name: name.to_string(),
            iso_code: format!("S{id}"),
            iso3_code: None,
            region_id,
        }
    }

    fn obs(indicator_id: i64, state_id: i64, year: i32, value: f64) -> ObservationPoint {
        ObservationPoint {
            indicator_id,
            member_state_id: state_id,
            year,
            value,
        }
    }

    fn regions() -> Vec<Region> {
        vec![
            Region {
                id: 1,
                name: "East Africa".to_string(),
            },
            Region {
                id: 2,
                name: "Central Africa".to_string(),
            },
        ]
    }

    fn threshold_rule(indicator: &str, good: f64, poor: f64, warn_ratio: f64) -> ThresholdRule {
        ThresholdRule {
            indicator: indicator.to_string(),
            label: "test metric".to_string(),
            good_at_least: good,
            poor_below: poor,
            target: Some(50.0),
            warn_ratio,
        }
    }

    fn crisis_rule(indicator: &str, threshold: f64, breach: Breach, min_states: usize) -> CrisisRule {
        CrisisRule {
            indicator: indicator.to_string(),
            label: "test metric".to_string(),
            threshold,
            breach,
            min_states,
            target: None,
        }
    }

    #[test]
    fn battery_runs_in_fixed_order() {
        let cfg = AnalysisConfig::default();
        let names: Vec<&str> = battery(&cfg).iter().map(|a| a.name()).collect();
        assert_eq!(
            names,
            vec![
                "threshold-findings",
                "crisis-alerts",
                "leader-laggard",
                "year-over-year",
                "regional-comparison",
                "milestones",
                "recommendations",
            ]
        );
    }

    #[test]
    fn threshold_finding_counts_only_reporting_states() {
        // A at 35, B at 10, C has no data at all.
        let state = AnalyzerState::from_parts(
            vec![indicator(1, "X", None, None)],
            vec![member(1, "Alpha", None), member(2, "Beta", None), member(3, "Gamma", None)],
            Vec::new(),
            vec![obs(1, 1, 2022, 35.0), obs(1, 2, 2022, 10.0)],
        );
        let analyzer = ThresholdFindings {
            rules: vec![threshold_rule("X", 30.0, 15.0, 0.3)],
        };
        let drafts = analyzer.analyze(&state).unwrap();
        assert_eq!(drafts.len(), 1);
        let draft = &drafts[0];
        assert_eq!(draft.insight_type, InsightType::Finding);
        assert_eq!(draft.severity, InsightSeverity::Neutral);
        assert_eq!(draft.evidence["states_above_threshold"], 1);
        assert_eq!(draft.evidence["states_below_floor"], 1);
        assert_eq!(draft.evidence["total_states"], 2);
    }

    #[test]
    fn threshold_finding_escalates_when_good_fraction_is_low() {
        let state = AnalyzerState::from_parts(
            vec![indicator(1, "X", None, None)],
            vec![member(1, "Alpha", None), member(2, "Beta", None), member(3, "Gamma", None)],
            Vec::new(),
            vec![
                obs(1, 1, 2022, 35.0),
                obs(1, 2, 2022, 10.0),
                obs(1, 3, 2022, 12.0),
            ],
        );
        let analyzer = ThresholdFindings {
            rules: vec![threshold_rule("X", 30.0, 15.0, 0.5)],
        };
        let drafts = analyzer.analyze(&state).unwrap();
        assert_eq!(drafts[0].severity, InsightSeverity::Warning);
    }

    #[test]
    fn crisis_alert_requires_minimum_breaching_states() {
        let state = AnalyzerState::from_parts(
            vec![indicator(1, "X", None, None)],
            vec![member(1, "Alpha", None), member(2, "Beta", None)],
            Vec::new(),
            vec![obs(1, 1, 2022, 45.0), obs(1, 2, 2022, 20.0)],
        );

        let strict = CrisisAlerts {
            rules: vec![crisis_rule("X", 30.0, Breach::Above, 2)],
        };
        assert!(strict.analyze(&state).unwrap().is_empty());

        let loose = CrisisAlerts {
            rules: vec![crisis_rule("X", 30.0, Breach::Above, 1)],
        };
        let drafts = loose.analyze(&state).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].severity, InsightSeverity::Critical);
        assert_eq!(drafts[0].evidence["breaching_states"], 1);
        assert_eq!(drafts[0].evidence["worst"][0]["state"], "Alpha");
    }

    #[test]
    fn leader_laggard_needs_three_states() {
        let two = AnalyzerState::from_parts(
            vec![indicator(1, "X", None, None)],
            vec![member(1, "Alpha", None), member(2, "Beta", None)],
            Vec::new(),
            vec![obs(1, 1, 2022, 61.3), obs(1, 2, 2022, 23.3)],
        );
        let analyzer = LeaderLaggard {
            indicators: vec!["X".to_string()],
        };
        assert!(analyzer.analyze(&two).unwrap().is_empty());

        let four = AnalyzerState::from_parts(
            vec![indicator(1, "X", None, None)],
            vec![
                member(1, "Alpha", None),
                member(2, "Beta", None),
                member(3, "Gamma", None),
                member(4, "Delta", None),
            ],
            Vec::new(),
            vec![
                obs(1, 1, 2022, 61.3),
                obs(1, 2, 2022, 23.3),
                obs(1, 3, 2022, 45.0),
                obs(1, 4, 2022, 8.0),
            ],
        );
        let drafts = analyzer.analyze(&four).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].insight_type, InsightType::Comparison);
        assert_eq!(drafts[0].evidence["top_3"][0]["state"], "Alpha");
        assert_eq!(drafts[0].evidence["top_3"][2]["state"], "Beta");
        // bottom_3 is worst first
        assert_eq!(drafts[0].evidence["bottom_3"][0]["state"], "Delta");
    }

    fn yoy_cfg(indicators: &[&str]) -> YoyConfig {
        YoyConfig {
            indicators: indicators.iter().map(|c| c.to_string()).collect(),
            ..YoyConfig::default()
        }
    }

    #[test]
    fn rising_inverted_indicator_raises_an_alert() {
        // Unemployment going from 40 to 44 is a 10% worsening; alert at >10 swing
        // means 40 -> 46 (15%) should alert while 40 -> 44 should not.
        let state = AnalyzerState::from_parts(
            vec![indicator(1, "SL.UEM.1524.ZS", None, None)],
            vec![member(1, "Alpha", None), member(2, "Beta", None)],
            Vec::new(),
            vec![
                obs(1, 1, 2021, 40.0),
                obs(1, 1, 2022, 46.0),
                obs(1, 2, 2021, 40.0),
                obs(1, 2, 2022, 44.0),
            ],
        );
        let analyzer = YearOverYear {
            cfg: yoy_cfg(&["SL.UEM.1524.ZS"]),
            inverted: vec!["SL.UEM.1524.ZS".to_string()],
        };
        let drafts = analyzer.analyze(&state).unwrap();
        let alerts: Vec<_> = drafts
            .iter()
            .filter(|d| d.insight_type == InsightType::Alert)
            .collect();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].member_state_id, Some(1));
        assert_eq!(alerts[0].evidence["change_pct"], 15.0);
    }

    #[test]
    fn falling_inverted_indicator_is_not_an_alert() {
        let state = AnalyzerState::from_parts(
            vec![indicator(1, "SL.UEM.1524.ZS", None, None)],
            vec![member(1, "Alpha", None)],
            Vec::new(),
            vec![obs(1, 1, 2021, 40.0), obs(1, 1, 2022, 30.0)],
        );
        let analyzer = YearOverYear {
            cfg: yoy_cfg(&["SL.UEM.1524.ZS"]),
            inverted: vec!["SL.UEM.1524.ZS".to_string()],
        };
        let drafts = analyzer.analyze(&state).unwrap();
        assert!(drafts.iter().all(|d| d.insight_type != InsightType::Alert));
    }

    #[test]
    fn broad_improvement_emits_a_positive_trend() {
        let states: Vec<MemberState> = (1..=10).map(|id| member(id, &format!("State{id}"), None)).collect();
        let mut observations = Vec::new();
        for id in 1..=10 {
            observations.push(obs(1, id, 2021, 50.0));
            // 8 of 10 improve by 10%, 2 decline by 10%
            let latest = if id <= 8 { 55.0 } else { 45.0 };
            observations.push(obs(1, id, 2022, latest));
        }
        let state = AnalyzerState::from_parts(
            vec![indicator(1, "X", None, None)],
            states,
            Vec::new(),
            observations,
        );
        let analyzer = YearOverYear {
            cfg: yoy_cfg(&["X"]),
            inverted: Vec::new(),
        };
        let drafts = analyzer.analyze(&state).unwrap();
        let trends: Vec<_> = drafts
            .iter()
            .filter(|d| d.insight_type == InsightType::Trend)
            .collect();
        assert_eq!(trends.len(), 1);
        assert_eq!(trends[0].severity, InsightSeverity::Positive);
        assert_eq!(trends[0].evidence["improving_states"], 8);
        assert_eq!(trends[0].evidence["total_states"], 10);
    }

    #[test]
    fn broad_decline_emits_a_warning_trend() {
        let states: Vec<MemberState> = (1..=6).map(|id| member(id, &format!("State{id}"), None)).collect();
        let mut observations = Vec::new();
        for id in 1..=6 {
            observations.push(obs(1, id, 2021, 50.0));
            let latest = if id <= 4 { 40.0 } else { 51.0 };
            observations.push(obs(1, id, 2022, latest));
        }
        let state = AnalyzerState::from_parts(
            vec![indicator(1, "X", None, None)],
            states,
            Vec::new(),
            observations,
        );
        let analyzer = YearOverYear {
            cfg: yoy_cfg(&["X"]),
            inverted: Vec::new(),
        };
        let drafts = analyzer.analyze(&state).unwrap();
        let trends: Vec<_> = drafts
            .iter()
            .filter(|d| d.insight_type == InsightType::Trend)
            .collect();
        assert_eq!(trends.len(), 1);
        assert_eq!(trends[0].severity, InsightSeverity::Warning);
        assert_eq!(trends[0].evidence["declining_states"], 4);
    }

    #[test]
    fn regional_comparison_needs_two_regions() {
        let one_region = AnalyzerState::from_parts(
            vec![indicator(1, "X", None, None)],
            vec![member(1, "Alpha", Some(1)), member(2, "Beta", Some(1))],
            regions(),
            vec![obs(1, 1, 2022, 60.0), obs(1, 2, 2022, 40.0)],
        );
        let analyzer = RegionalComparison {
            indicators: vec!["X".to_string()],
        };
        assert!(analyzer.analyze(&one_region).unwrap().is_empty());

        let two_regions = AnalyzerState::from_parts(
            vec![indicator(1, "X", None, None)],
            vec![
                member(1, "Alpha", Some(1)),
                member(2, "Beta", Some(1)),
                member(3, "Gamma", Some(2)),
            ],
            regions(),
            vec![
                obs(1, 1, 2022, 60.0),
                obs(1, 2, 2022, 40.0),
                obs(1, 3, 2022, 20.0),
            ],
        );
        let drafts = analyzer.analyze(&two_regions).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].evidence["best_region"], "East Africa");
        assert_eq!(drafts[0].evidence["worst_region"], "Central Africa");
        assert_eq!(drafts[0].evidence["regional_averages"]["East Africa"], 50.0);
    }

    #[test]
    fn milestone_progress_interpolates_between_baseline_and_target() {
        // Explicit baseline 0, target 12, mean 6: halfway there.
        assert_eq!(milestone_progress(6.0, 0.0, 12.0, false), 50.0);
        // Inverted: mean 300, baseline 600, target 50.
        let progress = milestone_progress(300.0, 600.0, 50.0, true);
        assert!((progress - 54.545).abs() < 0.01);
        // Clamped at both ends.
        assert_eq!(milestone_progress(20.0, 0.0, 12.0, false), 100.0);
        assert_eq!(milestone_progress(700.0, 600.0, 50.0, true), 0.0);
    }

    #[test]
    fn degenerate_baseline_resolves_by_target_attainment() {
        // With no catalog baseline the default is twice the mean; for a
        // non-inverted indicator with target 12 and mean 6 that collapses the
        // span entirely, and the target is not yet met.
        assert_eq!(milestone_progress(6.0, 12.0, 12.0, false), 0.0);
        assert_eq!(milestone_progress(12.0, 12.0, 12.0, false), 100.0);
    }

    #[test]
    fn milestone_status_tiers() {
        let cfg = MilestoneConfig::default();
        assert_eq!(milestone_status(80.0, &cfg), (InsightSeverity::Positive, "on track"));
        assert_eq!(milestone_status(65.0, &cfg), (InsightSeverity::Positive, "progressing"));
        assert_eq!(
            milestone_status(54.5, &cfg),
            (InsightSeverity::Warning, "needs acceleration")
        );
        assert_eq!(
            milestone_status(10.0, &cfg),
            (InsightSeverity::Critical, "significantly off track")
        );
    }

    #[test]
    fn milestones_suppress_the_uninformative_mid_band() {
        // baseline 0, target 100: mean 35 sits in the 20..50 noise band,
        // mean 60 is notable.
        let quiet = AnalyzerState::from_parts(
            vec![indicator(1, "X", Some(100.0), Some(0.0))],
            vec![member(1, "Alpha", None)],
            Vec::new(),
            vec![obs(1, 1, 2022, 35.0)],
        );
        let analyzer = Milestones {
            cfg: MilestoneConfig::default(),
            inverted: Vec::new(),
        };
        assert!(analyzer.analyze(&quiet).unwrap().is_empty());

        let notable = AnalyzerState::from_parts(
            vec![indicator(1, "X", Some(100.0), Some(0.0))],
            vec![member(1, "Alpha", None)],
            Vec::new(),
            vec![obs(1, 1, 2022, 60.0)],
        );
        let drafts = analyzer.analyze(&notable).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].insight_type, InsightType::Milestone);
        assert_eq!(drafts[0].severity, InsightSeverity::Positive);
        assert_eq!(drafts[0].evidence["progress_pct"], 60.0);
    }

    #[test]
    fn inverted_milestone_reports_needs_acceleration() {
        let state = AnalyzerState::from_parts(
            vec![indicator(1, "SH.STA.MMRT", Some(50.0), Some(600.0))],
            vec![member(1, "Alpha", None)],
            Vec::new(),
            vec![obs(1, 1, 2022, 300.0)],
        );
        let analyzer = Milestones {
            cfg: MilestoneConfig::default(),
            inverted: vec!["SH.STA.MMRT".to_string()],
        };
        let drafts = analyzer.analyze(&state).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].severity, InsightSeverity::Warning);
        assert_eq!(drafts[0].evidence["progress_pct"], 54.5);
        assert!(drafts[0].title.contains("needs acceleration"));
    }

    #[test]
    fn recommendation_focuses_on_the_worst_region() {
        let members = vec![
            member(1, "Alpha", Some(1)),
            member(2, "Beta", Some(1)),
            member(3, "Gamma", Some(1)),
            member(4, "Delta", Some(1)),
            member(5, "Epsilon", Some(2)),
            member(6, "Zeta", Some(2)),
        ];
        let observations = (1..=6).map(|id| obs(1, id, 2022, 30.0 + id as f64)).collect();
        let state = AnalyzerState::from_parts(
            vec![indicator(1, "X", None, None)],
            members,
            regions(),
            observations,
        );

        let analyzer = Recommendations {
            rules: vec![crisis_rule("X", 25.0, Breach::Above, 5)],
        };
        let drafts = analyzer.analyze(&state).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].insight_type, InsightType::Recommendation);
        assert_eq!(drafts[0].evidence["region"], "East Africa");
        assert_eq!(drafts[0].evidence["total_breaching"], 6);
        assert_eq!(drafts[0].evidence["states"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn recommendation_respects_the_minimum_state_count() {
        let state = AnalyzerState::from_parts(
            vec![indicator(1, "X", None, None)],
            vec![member(1, "Alpha", Some(1)), member(2, "Beta", Some(2))],
            regions(),
            vec![obs(1, 1, 2022, 40.0), obs(1, 2, 2022, 40.0)],
        );
        let analyzer = Recommendations {
            rules: vec![crisis_rule("X", 25.0, Breach::Above, 5)],
        };
        assert!(analyzer.analyze(&state).unwrap().is_empty());
    }
}
