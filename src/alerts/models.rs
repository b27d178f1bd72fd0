use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = "=")]
    Equal,
}

impl ComparisonOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOperator::GreaterThan => ">",
            ComparisonOperator::LessThan => "<",
            ComparisonOperator::GreaterOrEqual => ">=",
            ComparisonOperator::LessOrEqual => "<=",
            ComparisonOperator::Equal => "=",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            ">" => Some(ComparisonOperator::GreaterThan),
            "<" => Some(ComparisonOperator::LessThan),
            ">=" | "≥" => Some(ComparisonOperator::GreaterOrEqual),
            "<=" | "≤" => Some(ComparisonOperator::LessOrEqual),
            "=" | "==" => Some(ComparisonOperator::Equal),
            _ => None,
        }
    }

    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            ComparisonOperator::GreaterThan => value > threshold,
            ComparisonOperator::LessThan => value < threshold,
            ComparisonOperator::GreaterOrEqual => value >= threshold,
            ComparisonOperator::LessOrEqual => value <= threshold,
            ComparisonOperator::Equal => (value - threshold).abs() < f64::EPSILON,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    /// Metric selector resolved by a `MetricSource`, e.g. `contracts.stale`.
    pub metric: String,
    pub operator: ComparisonOperator,
    pub threshold: f64,
    #[serde(rename = "cooldown_secs", serialize_with = "serialize_secs")]
    pub cooldown: Duration,
    pub enabled: bool,
    pub recipient: Option<String>,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

impl AlertRule {
    /// A rule that never fired, or whose last trigger is at least one cooldown ago.
    pub fn cooldown_elapsed(&self, now: DateTime<Utc>) -> bool {
        match self.last_triggered_at {
            None => true,
            Some(last) => {
                let cooldown = chrono::Duration::from_std(self.cooldown)
                    .unwrap_or(chrono::Duration::MAX);
                now.signed_duration_since(last) >= cooldown
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAlertRule {
    pub name: String,
    pub metric: String,
    pub operator: ComparisonOperator,
    pub threshold: f64,
    pub cooldown_secs: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub recipient: Option<String>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertTrigger {
    pub id: i64,
    pub rule_id: String,
    pub metric_value: f64,
    pub threshold: f64,
    pub triggered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(cooldown_secs: u64, last: Option<DateTime<Utc>>) -> AlertRule {
        AlertRule {
            id: "r".into(),
            name: "r".into(),
            metric: "m".into(),
            operator: ComparisonOperator::GreaterThan,
            threshold: 10.0,
            cooldown: Duration::from_secs(cooldown_secs),
            enabled: true,
            recipient: None,
            last_triggered_at: last,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_operators() {
        assert!(ComparisonOperator::GreaterThan.holds(12.0, 10.0));
        assert!(!ComparisonOperator::GreaterThan.holds(10.0, 10.0));
        assert!(ComparisonOperator::GreaterOrEqual.holds(10.0, 10.0));
        assert!(ComparisonOperator::LessThan.holds(3.0, 10.0));
        assert!(ComparisonOperator::LessOrEqual.holds(10.0, 10.0));
        assert!(ComparisonOperator::Equal.holds(10.0, 10.0));
        assert!(!ComparisonOperator::Equal.holds(10.5, 10.0));
    }

    #[test]
    fn test_operator_parsing() {
        assert_eq!(
            ComparisonOperator::parse("≥"),
            Some(ComparisonOperator::GreaterOrEqual)
        );
        assert_eq!(ComparisonOperator::parse("=="), Some(ComparisonOperator::Equal));
        assert!(ComparisonOperator::parse("!=").is_none());
        let parsed: ComparisonOperator = serde_json::from_str("\"<=\"").unwrap();
        assert_eq!(parsed, ComparisonOperator::LessOrEqual);
    }

    #[test]
    fn test_cooldown_elapsed() {
        let now = Utc::now();
        assert!(rule(600, None).cooldown_elapsed(now));

        let last = now - chrono::Duration::seconds(300);
        assert!(!rule(600, Some(last)).cooldown_elapsed(now));

        let last = now - chrono::Duration::seconds(600);
        assert!(rule(600, Some(last)).cooldown_elapsed(now));
    }
}
