//! Pure business metrics behind the AI endpoints
//!
//! Nothing here touches the store or the network: callers fetch the rows and
//! pass them in, which keeps every number reproducible in tests.

use crate::crm::pipeline::VIP_SPEND_THRESHOLD;
use crate::store::models::{Client, Interaction, InteractionType, Stage};
use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

// ============================================================================
// Constants
// ============================================================================

/// Baseline daily sales used when history is too sparse
pub const SYNTHETIC_BASE_SALES: f64 = 80_000.0;
const WEEKEND_MULTIPLIER: f64 = 1.3;
/// Full width of the synthetic variation band (±10%)
const SYNTHETIC_VARIATION: f64 = 0.2;
/// Fewer days with sales than this triggers the synthetic baseline
pub const MIN_SALES_DAYS: usize = 7;

/// Days in one stage after which a client counts as stuck
pub const STUCK_DAYS: i64 = 15;
/// churn_risk above this marks a pipeline client at risk
pub const AT_RISK_CHURN: f64 = 0.7;
pub const MAX_PIPELINE_INSIGHTS: usize = 5;

/// UTC midnight of the day containing `now`
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Whole-percent change; 100 when there is nothing to compare with
pub fn growth_percent(current: f64, previous: f64) -> i64 {
    if previous == 0.0 {
        return 100;
    }
    (((current - previous) / previous) * 100.0).round() as i64
}

/// Loyalty score written alongside a customer analysis
pub fn loyalty_for_status(status: &str) -> i64 {
    match status.trim().to_lowercase().as_str() {
        "vip" => 90,
        "active" | "activo" => 70,
        "at_risk" | "en_riesgo" => 40,
        _ => 20,
    }
}

// ============================================================================
// Daily metrics
// ============================================================================

/// Sales figures for one day
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyMetrics {
    pub total_sales: f64,
    pub customer_count: usize,
    pub average_ticket: f64,
    pub new_customers: usize,
    pub returning_customers: usize,
}

impl DailyMetrics {
    /// `interactions` are the day's interactions of every type;
    /// `new_customers` the clients created that day.
    pub fn compute(interactions: &[Interaction], new_customers: usize) -> Self {
        let total_sales: f64 = interactions
            .iter()
            .filter(|i| i.kind == InteractionType::Purchase)
            .map(|i| i.amount.unwrap_or(0.0))
            .sum();

        let customer_count = interactions
            .iter()
            .map(|i| i.client_id)
            .collect::<HashSet<_>>()
            .len();

        let average_ticket = if customer_count > 0 {
            (total_sales / customer_count as f64).round()
        } else {
            0.0
        };

        Self {
            total_sales,
            customer_count,
            average_ticket,
            new_customers,
            returning_customers: customer_count.saturating_sub(new_customers),
        }
    }
}

// ============================================================================
// Sales series & forecast
// ============================================================================

/// Total purchases on one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesPoint {
    pub date: NaiveDate,
    pub amount: f64,
}

/// Daily purchase totals for the `days` days ending at `today`, oldest
/// first, with zero for days without sales
pub fn daily_sales_series(
    interactions: &[Interaction],
    today: NaiveDate,
    days: u64,
) -> Vec<SalesPoint> {
    let mut by_day: HashMap<NaiveDate, f64> = HashMap::new();
    for i in interactions
        .iter()
        .filter(|i| i.kind == InteractionType::Purchase)
    {
        *by_day.entry(i.date.date_naive()).or_default() += i.amount.unwrap_or(0.0);
    }

    (0..days)
        .rev()
        .filter_map(|back| today.checked_sub_days(Days::new(back)))
        .map(|date| SalesPoint {
            date,
            amount: by_day.get(&date).copied().unwrap_or(0.0),
        })
        .collect()
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Stable pseudo-random value in [-0.5, 0.5) derived from the date
fn synthetic_jitter(date: NaiveDate) -> f64 {
    let x = (date.num_days_from_ce() as f64 * 12.9898).sin() * 43_758.545_3;
    x - x.floor() - 0.5
}

/// Replace zero days with a weekday/weekend baseline when fewer than
/// [`MIN_SALES_DAYS`] days have real sales. Returns whether it did.
pub fn fill_synthetic_baseline(series: &mut [SalesPoint]) -> bool {
    let days_with_sales = series.iter().filter(|p| p.amount > 0.0).count();
    if days_with_sales >= MIN_SALES_DAYS {
        return false;
    }

    for point in series.iter_mut().filter(|p| p.amount == 0.0) {
        let mut amount = SYNTHETIC_BASE_SALES;
        if is_weekend(point.date) {
            amount *= WEEKEND_MULTIPLIER;
        }
        amount += synthetic_jitter(point.date) * SYNTHETIC_BASE_SALES * SYNTHETIC_VARIATION;
        point.amount = amount.round();
    }
    true
}

/// One forecast day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub date: String,
    pub amount: f64,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, alias = "dayOfWeek")]
    pub day_of_week: String,
}

/// Forecast each of the next `days` days as the mean of the same weekday in
/// `series`
pub fn local_forecast(series: &[SalesPoint], today: NaiveDate, days: u64) -> Vec<Prediction> {
    let overall = if series.is_empty() {
        0.0
    } else {
        series.iter().map(|p| p.amount).sum::<f64>() / series.len() as f64
    };

    (1..=days)
        .filter_map(|ahead| today.checked_add_days(Days::new(ahead)))
        .map(|date| {
            let same_day: Vec<f64> = series
                .iter()
                .filter(|p| p.date.weekday() == date.weekday())
                .map(|p| p.amount)
                .collect();
            let amount = if same_day.is_empty() {
                overall
            } else {
                same_day.iter().sum::<f64>() / same_day.len() as f64
            };
            Prediction {
                date: date.format("%Y-%m-%d").to_string(),
                amount: amount.round(),
                confidence: if same_day.len() >= 3 { 60.0 } else { 40.0 },
                day_of_week: date.format("%A").to_string(),
            }
        })
        .collect()
}

// ============================================================================
// Pipeline
// ============================================================================

/// Per-stage pipeline figures
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageMetrics {
    pub stage_name: String,
    pub count: usize,
    pub avg_days: f64,
    pub total_value: f64,
    pub stuck: usize,
}

/// Pipeline-wide counters stored with the analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineMetrics {
    pub total_clients: usize,
    pub stuck_clients: usize,
    pub high_value_clients: usize,
    pub at_risk_clients: usize,
}

/// An actionable observation about the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineInsight {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(default = "default_priority")]
    pub priority: String,
    #[serde(default)]
    pub actionable: bool,
    #[serde(default)]
    pub recommendation: Option<String>,
}

fn default_priority() -> String {
    "medium".to_string()
}

impl PipelineInsight {
    fn new(kind: &str, message: String, priority: &str, recommendation: Option<&str>) -> Self {
        Self {
            kind: kind.to_string(),
            message,
            priority: priority.to_string(),
            actionable: recommendation.is_some(),
            recommendation: recommendation.map(str::to_string),
        }
    }

    pub fn is_high(&self) -> bool {
        self.priority.eq_ignore_ascii_case("high")
    }

    /// Returned when no client is in the pipeline
    pub fn empty_pipeline() -> Self {
        Self::new(
            "info",
            "There are no clients in the pipeline yet. Start by adding clients to a stage."
                .to_string(),
            "medium",
            Some("Add clients to the pipeline"),
        )
    }

    /// Returned when neither the LLM nor the local rules produced anything
    pub fn unavailable() -> Self {
        Self {
            kind: "info".to_string(),
            message: "Automatic insights could not be generated. Check the AI configuration."
                .to_string(),
            priority: "low".to_string(),
            actionable: false,
            recommendation: Some("Verify the connection to the completion API".to_string()),
        }
    }
}

fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_days()
}

/// Snapshot of where pipeline clients sit and for how long
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSnapshot {
    pub stages: Vec<StageMetrics>,
    pub metrics: PipelineMetrics,
}

impl PipelineSnapshot {
    /// `stages` in board order; `clients` may include clients outside the
    /// pipeline, they are ignored
    pub fn compute(stages: &[Stage], clients: &[Client], now: DateTime<Utc>) -> Self {
        let in_pipeline: Vec<&Client> = clients.iter().filter(|c| c.stage_id.is_some()).collect();
        let is_stuck = |c: &Client| {
            c.stage_entered_at
                .is_some_and(|at| days_between(at, now) > STUCK_DAYS)
        };

        let stage_metrics = stages
            .iter()
            .map(|stage| {
                let members: Vec<&Client> = in_pipeline
                    .iter()
                    .copied()
                    .filter(|c| c.stage_id == Some(stage.id))
                    .collect();
                let days_total: i64 = members
                    .iter()
                    .filter_map(|c| c.stage_entered_at)
                    .map(|at| days_between(at, now))
                    .sum();
                StageMetrics {
                    stage_name: stage.name.clone(),
                    count: members.len(),
                    avg_days: days_total as f64 / members.len().max(1) as f64,
                    total_value: members.iter().map(|c| c.total_spent).sum(),
                    stuck: members.iter().filter(|c| is_stuck(c)).count(),
                }
            })
            .collect();

        let metrics = PipelineMetrics {
            total_clients: in_pipeline.len(),
            stuck_clients: in_pipeline.iter().filter(|c| is_stuck(c)).count(),
            high_value_clients: in_pipeline
                .iter()
                .filter(|c| c.total_spent > VIP_SPEND_THRESHOLD)
                .count(),
            at_risk_clients: in_pipeline
                .iter()
                .filter(|c| c.churn_risk.is_some_and(|r| r > AT_RISK_CHURN))
                .count(),
        };

        Self {
            stages: stage_metrics,
            metrics,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.total_clients == 0
    }

    /// Rule-based insights: bottleneck, high-value opportunity, uneven load
    pub fn computed_insights(&self, currency: &str) -> Vec<PipelineInsight> {
        let mut insights = Vec::new();

        if self.metrics.stuck_clients > 0 {
            // First stage wins ties
            let bottleneck = self
                .stages
                .iter()
                .fold(None::<&StageMetrics>, |best, s| match best {
                    Some(b) if b.stuck >= s.stuck => Some(b),
                    _ => Some(s),
                });
            if let Some(stage) = bottleneck {
                insights.push(PipelineInsight::new(
                    "bottleneck",
                    format!(
                        "{} clients have not moved in more than {} days. Stage \"{}\" is the biggest bottleneck.",
                        self.metrics.stuck_clients, STUCK_DAYS, stage.stage_name
                    ),
                    "high",
                    Some(&format!(
                        "Review and contact the clients in \"{}\" to find what is blocking them",
                        stage.stage_name
                    )),
                ));
            }
        }

        if self.metrics.high_value_clients > 0 {
            insights.push(PipelineInsight::new(
                "opportunity",
                format!(
                    "You have {} high-value clients in the pipeline (>{}{:.0}).",
                    self.metrics.high_value_clients, currency, VIP_SPEND_THRESHOLD
                ),
                "high",
                Some("Prioritize personal follow-up for high-value clients"),
            ));
        }

        let counts = self.stages.iter().map(|s| s.count);
        if let (Some(max), Some(min)) = (counts.clone().max(), counts.min()) {
            if min > 0 && max > min * 3 {
                if let Some(heaviest) = self.stages.iter().find(|s| s.count == max) {
                    insights.push(PipelineInsight::new(
                        "optimization",
                        format!(
                            "Stage \"{}\" holds {} clients, a likely bottleneck.",
                            heaviest.stage_name, max
                        ),
                        "medium",
                        Some("Consider splitting this stage or speeding up its process"),
                    ));
                }
            }
        }

        insights
    }
}
