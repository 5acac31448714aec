use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

pub const BLOCK_THRESHOLD: f64 = 80.0;
pub const REVIEW_THRESHOLD: f64 = 60.0;

const VELOCITY_WINDOW_HOURS: i64 = 24;
const GEO_WINDOW_DAYS: i64 = 7;
const DEVICE_WINDOW_DAYS: i64 = 30;

// 4 points per trailing-24h transaction; 25+/day saturates the signal.
const VELOCITY_POINTS_PER_TXN: f64 = 4.0;

#[derive(Debug, Clone)]
pub struct TransactionSnapshot {
    pub payer_id: String,
    pub amount_minor: i64,
    pub country: Option<String>,
    pub device_fingerprint: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct HistoryRecord {
    pub amount_minor: i64,
    pub country: Option<String>,
    pub device_fingerprint: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FraudWeights {
    pub velocity: f64,
    pub amount_deviation: f64,
    pub geo_novelty: f64,
    pub device_novelty: f64,
}

impl Default for FraudWeights {
    fn default() -> Self {
        Self {
            velocity: 0.30,
            amount_deviation: 0.25,
            geo_novelty: 0.20,
            device_novelty: 0.25,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FraudFactor {
    pub name: String,
    pub score: f64,
    pub detail: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskDecision {
    Approve,
    Review,
    Block,
}

#[derive(Debug, Clone, Serialize)]
pub struct FraudAnalysis {
    pub score: f64,
    pub decision: RiskDecision,
    pub confidence: f64,
    pub factors: Vec<FraudFactor>,
}

impl FraudAnalysis {
    pub fn risk_level(&self) -> &'static str {
        match self.decision {
            RiskDecision::Block => "HIGH",
            RiskDecision::Review => "ELEVATED",
            RiskDecision::Approve => "LOW",
        }
    }
}

fn clamp100(v: f64) -> f64 {
    v.clamp(0.0, 100.0)
}

fn velocity_factor(
    tx: &TransactionSnapshot,
    history: &[HistoryRecord],
    weight: f64,
) -> FraudFactor {
    let window_start = tx.timestamp - Duration::hours(VELOCITY_WINDOW_HOURS);
    let count = history
        .iter()
        .filter(|h| h.timestamp >= window_start && h.timestamp <= tx.timestamp)
        .count();
    FraudFactor {
        name: "velocity".to_string(),
        score: clamp100(count as f64 * VELOCITY_POINTS_PER_TXN),
        detail: format!("{count} transactions in trailing {VELOCITY_WINDOW_HOURS}h"),
        weight,
    }
}

fn amount_deviation_factor(
    tx: &TransactionSnapshot,
    history: &[HistoryRecord],
    weight: f64,
) -> Option<FraudFactor> {
    if history.is_empty() {
        return None;
    }
    let total: i64 = history.iter().map(|h| h.amount_minor).sum();
    let average = total as f64 / history.len() as f64;
    if average <= 0.0 {
        return None;
    }
    let ratio = tx.amount_minor as f64 / average;
    let score = if ratio > 10.0 {
        90.0
    } else if ratio > 5.0 {
        70.0
    } else if ratio > 3.0 {
        50.0
    } else if ratio > 2.0 {
        30.0
    } else {
        10.0
    };
    Some(FraudFactor {
        name: "amount_deviation".to_string(),
        score,
        detail: format!("{ratio:.1}x of historical average"),
        weight,
    })
}

fn geo_novelty_factor(
    tx: &TransactionSnapshot,
    history: &[HistoryRecord],
    weight: f64,
) -> Option<FraudFactor> {
    let country = tx.country.as_deref()?;
    let window_start = tx.timestamp - Duration::days(GEO_WINDOW_DAYS);
    let seen = history.iter().any(|h| {
        h.timestamp >= window_start && h.country.as_deref() == Some(country)
    });
    Some(FraudFactor {
        name: "geographic_novelty".to_string(),
        score: if seen { 10.0 } else { 60.0 },
        detail: if seen {
            format!("{country} seen in trailing {GEO_WINDOW_DAYS}d")
        } else {
            format!("{country} not seen in trailing {GEO_WINDOW_DAYS}d")
        },
        weight,
    })
}

fn device_novelty_factor(
    tx: &TransactionSnapshot,
    history: &[HistoryRecord],
    weight: f64,
) -> Option<FraudFactor> {
    let fingerprint = tx.device_fingerprint.as_deref()?;
    let window_start = tx.timestamp - Duration::days(DEVICE_WINDOW_DAYS);
    let seen = history.iter().any(|h| {
        h.timestamp >= window_start && h.device_fingerprint.as_deref() == Some(fingerprint)
    });
    Some(FraudFactor {
        name: "device_novelty".to_string(),
        score: if seen { 5.0 } else { 40.0 },
        detail: if seen {
            format!("device seen in trailing {DEVICE_WINDOW_DAYS}d")
        } else {
            format!("device not seen in trailing {DEVICE_WINDOW_DAYS}d")
        },
        weight,
    })
}

/// Pure risk scoring: no I/O, windows computed relative to the transaction
/// timestamp, identical inputs always yield the identical analysis.
pub fn analyze(
    tx: &TransactionSnapshot,
    history: &[HistoryRecord],
    weights: &FraudWeights,
) -> FraudAnalysis {
    let mut factors = vec![velocity_factor(tx, history, weights.velocity)];
    if let Some(f) = amount_deviation_factor(tx, history, weights.amount_deviation) {
        factors.push(f);
    }
    if let Some(f) = geo_novelty_factor(tx, history, weights.geo_novelty) {
        factors.push(f);
    }
    if let Some(f) = device_novelty_factor(tx, history, weights.device_novelty) {
        factors.push(f);
    }

    let weight_sum: f64 = factors.iter().map(|f| f.weight).sum();
    let score = if weight_sum > 0.0 {
        clamp100(factors.iter().map(|f| f.score * f.weight).sum::<f64>() / weight_sum)
    } else {
        0.0
    };

    let decision = if score >= BLOCK_THRESHOLD {
        RiskDecision::Block
    } else if score >= REVIEW_THRESHOLD {
        RiskDecision::Review
    } else {
        RiskDecision::Approve
    };

    FraudAnalysis {
        score,
        decision,
        confidence: f64::min(95.0, 50.0 + 10.0 * factors.len() as f64),
        factors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(amount_minor: i64, now: DateTime<Utc>) -> TransactionSnapshot {
        TransactionSnapshot {
            payer_id: "payer_1".to_string(),
            amount_minor,
            country: Some("US".to_string()),
            device_fingerprint: Some("fp-1".to_string()),
            timestamp: now,
        }
    }

    fn record(amount_minor: i64, age_hours: i64, now: DateTime<Utc>) -> HistoryRecord {
        HistoryRecord {
            amount_minor,
            country: Some("US".to_string()),
            device_fingerprint: Some("fp-1".to_string()),
            timestamp: now - Duration::hours(age_hours),
        }
    }

    #[test]
    fn identical_inputs_yield_identical_analysis() {
        let now = Utc::now();
        let history = vec![record(10_000, 2, now), record(9_000, 40, now)];
        let weights = FraudWeights::default();
        let a = analyze(&tx(12_000, now), &history, &weights);
        let b = analyze(&tx(12_000, now), &history, &weights);
        assert_eq!(a.score, b.score);
        assert_eq!(a.decision, b.decision);
        assert_eq!(a.factors.len(), b.factors.len());
    }

    #[test]
    fn twelve_times_average_scores_ninety_on_amount_deviation() {
        let now = Utc::now();
        let history = vec![record(10_000, 48, now)]; // $100 average
        let analysis = analyze(&tx(120_000, now), &history, &FraudWeights::default());
        let factor = analysis
            .factors
            .iter()
            .find(|f| f.name == "amount_deviation")
            .unwrap();
        assert_eq!(factor.score, 90.0);
    }

    #[test]
    fn clean_history_approves_modest_amount() {
        let now = Utc::now();
        let history = vec![record(9_000, 30, now), record(11_000, 60, now)];
        let analysis = analyze(&tx(10_000, now), &history, &FraudWeights::default());
        assert!(analysis.score < REVIEW_THRESHOLD);
        assert_eq!(analysis.decision, RiskDecision::Approve);
    }

    #[test]
    fn hot_velocity_with_amount_spike_blocks() {
        let now = Utc::now();
        let mut history = Vec::new();
        for i in 0..30 {
            history.push(record(5_000, i % 20, now));
        }
        // no geo/device signal: the two high-weight factors dominate
        let mut snapshot = tx(200_000, now); // 40x average
        snapshot.country = None;
        snapshot.device_fingerprint = None;
        let analysis = analyze(&snapshot, &history, &FraudWeights::default());
        assert!(analysis.score >= BLOCK_THRESHOLD, "score {}", analysis.score);
        assert_eq!(analysis.decision, RiskDecision::Block);
    }

    #[test]
    fn novel_geo_and_device_escalate_to_review() {
        let now = Utc::now();
        let mut history = Vec::new();
        for i in 0..25 {
            history.push(record(5_000, i % 20, now));
        }
        let mut snapshot = tx(60_000, now); // 12x average
        snapshot.country = Some("RO".to_string());
        snapshot.device_fingerprint = Some("fp-unknown".to_string());
        let analysis = analyze(&snapshot, &history, &FraudWeights::default());
        assert!(analysis.score >= REVIEW_THRESHOLD, "score {}", analysis.score);
        assert_eq!(analysis.decision, RiskDecision::Review);
    }

    #[test]
    fn absent_signals_drop_their_factors() {
        let now = Utc::now();
        let snapshot = TransactionSnapshot {
            payer_id: "p".to_string(),
            amount_minor: 5_000,
            country: None,
            device_fingerprint: None,
            timestamp: now,
        };
        let analysis = analyze(&snapshot, &[], &FraudWeights::default());
        assert_eq!(analysis.factors.len(), 1); // velocity only
        assert_eq!(analysis.confidence, 60.0);
    }

    #[test]
    fn confidence_grows_with_factor_count_and_caps() {
        let now = Utc::now();
        let history = vec![record(10_000, 2, now)];
        let analysis = analyze(&tx(10_000, now), &history, &FraudWeights::default());
        assert_eq!(analysis.factors.len(), 4);
        assert_eq!(analysis.confidence, 90.0);
    }

    #[test]
    fn old_transactions_do_not_count_toward_velocity() {
        let now = Utc::now();
        let history = vec![record(10_000, 30, now), record(10_000, 50, now)];
        let analysis = analyze(&tx(10_000, now), &history, &FraudWeights::default());
        let velocity = analysis.factors.iter().find(|f| f.name == "velocity").unwrap();
        assert_eq!(velocity.score, 0.0);
    }
}
