//! Local churn scoring relative to the business's own averages
//!
//! Used for `GET /api/clients/risk` and as the fallback when the LLM cannot
//! analyze a customer.

use crate::store::models::Client;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Visit frequency assumed when no client has enough history
pub const DEFAULT_FREQUENCY_DAYS: f64 = 30.0;
pub const MODEL_VERSION: &str = "local-1.0";

/// Averages the scores are relative to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessBaseline {
    pub total_clients: usize,
    /// Mean of `average_spent` over clients that visited
    pub average_spend: f64,
    pub average_visits: f64,
    /// Mean days between visits
    pub average_visit_frequency: f64,
    /// Days without a visit after which a client is considered lost
    pub churn_threshold: f64,
}

impl Default for BusinessBaseline {
    fn default() -> Self {
        Self {
            total_clients: 0,
            average_spend: 0.0,
            average_visits: 0.0,
            average_visit_frequency: DEFAULT_FREQUENCY_DAYS,
            churn_threshold: DEFAULT_FREQUENCY_DAYS * 3.0,
        }
    }
}

fn days_since(at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - at).num_days()
}

impl BusinessBaseline {
    /// Baseline over clients with a recorded visit; `None` when there are none
    pub fn from_clients(clients: &[Client], now: DateTime<Utc>) -> Option<Self> {
        let active: Vec<&Client> = clients.iter().filter(|c| c.last_visit.is_some()).collect();
        if active.is_empty() {
            return None;
        }
        let n = active.len() as f64;

        let frequencies: Vec<f64> = active
            .iter()
            .filter(|c| c.visit_count > 1)
            .map(|c| days_since(c.created_at, now) as f64 / c.visit_count as f64)
            .collect();
        let average_visit_frequency = if frequencies.is_empty() {
            DEFAULT_FREQUENCY_DAYS
        } else {
            frequencies.iter().sum::<f64>() / frequencies.len() as f64
        };

        Some(Self {
            total_clients: clients.len(),
            average_spend: active.iter().map(|c| c.average_spent).sum::<f64>() / n,
            average_visits: active.iter().map(|c| c.visit_count as f64).sum::<f64>() / n,
            average_visit_frequency,
            churn_threshold: average_visit_frequency * 3.0,
        })
    }
}

/// Coarse standing of a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    New,
    Critical,
    AtRisk,
    Vip,
    Regular,
}

impl ClientStatus {
    /// Status vocabulary shared with the LLM analysis
    pub fn analysis_label(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Critical => "lost",
            Self::AtRisk => "at_risk",
            Self::Vip => "vip",
            Self::Regular => "active",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub engagement: i64,
    pub value: i64,
    pub frequency: i64,
    pub trend: i64,
    pub churn_risk: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitPredictions {
    pub next_visit_days: i64,
    pub next_visit_confidence: i64,
    /// Projected spend over two years at the current pace
    pub lifetime_value: f64,
    pub churn_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparisons {
    pub vs_average_spend: i64,
    pub vs_average_frequency: i64,
    pub percentile: i64,
    pub similar_clients_count: usize,
}

/// Local analysis of one client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientScore {
    pub client_id: Uuid,
    pub client_name: String,
    pub status: ClientStatus,
    pub status_reason: String,
    pub days_since_last_visit: Option<i64>,
    pub scores: Scores,
    pub predictions: VisitPredictions,
    pub comparisons: Comparisons,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
    pub model_version: String,
}

/// `part / whole` or 0 when `whole` is zero
fn ratio(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole
    } else {
        0.0
    }
}

fn churn_bucket(days_since_visit: i64, frequency: f64) -> f64 {
    let deviation = days_since_visit as f64 / frequency;
    if deviation > 3.0 {
        90.0
    } else if deviation > 2.0 {
        70.0
    } else if deviation > 1.5 {
        50.0
    } else if deviation > 1.0 {
        30.0
    } else {
        10.0
    }
}

/// Score `client` against `baseline`; `all_clients` is the population used
/// for the spend percentile and the similar-clients count
pub fn score_client(
    client: &Client,
    baseline: &BusinessBaseline,
    all_clients: &[Client],
    now: DateTime<Utc>,
) -> ClientScore {
    let days_since_visit = client.last_visit.map(|at| days_since(at, now));

    // Frequencies below one day are treated as daily
    let client_frequency = if client.visit_count > 1 {
        (days_since(client.created_at, now) as f64 / client.visit_count as f64).max(1.0)
    } else {
        baseline.average_visit_frequency.max(1.0)
    };

    let value_score = (ratio(client.average_spent, baseline.average_spend) * 50.0).min(100.0);
    let frequency_score =
        (baseline.average_visit_frequency / client_frequency * 50.0).min(100.0);
    let engagement_score =
        (ratio(client.visit_count as f64, baseline.average_visits) * 50.0).min(100.0);

    let (trend_score, churn_risk) = match days_since_visit {
        Some(days) => {
            let deviation = (days as f64 - client_frequency) / client_frequency;
            (
                (-deviation * 50.0).clamp(-100.0, 100.0),
                churn_bucket(days, client_frequency),
            )
        }
        None => (0.0, 0.0),
    };

    let mut insights = Vec::new();
    let mut recommendations = Vec::new();
    let (status, status_reason) = match days_since_visit {
        None => {
            insights.push("New client without recorded visits".to_string());
            recommendations.push("Record the first interaction".to_string());
            (ClientStatus::New, "No visit history".to_string())
        }
        Some(days) if churn_risk > 70.0 => {
            insights.push(format!(
                "Absence {}x longer than their usual pattern",
                (days as f64 / client_frequency).round()
            ));
            recommendations.push("Immediate retention action required".to_string());
            (
                ClientStatus::Critical,
                format!(
                    "{} days without visiting (expected every {} days)",
                    days,
                    client_frequency.round()
                ),
            )
        }
        Some(_) if churn_risk > 40.0 => {
            insights.push("Irregular visit pattern detected".to_string());
            recommendations.push("Reach out with a personalized incentive".to_string());
            (
                ClientStatus::AtRisk,
                "Significant deviation from their visit pattern".to_string(),
            )
        }
        Some(_) if engagement_score > 70.0 && value_score > 70.0 => {
            insights.push(format!(
                "Spends {}% more than average",
                ((ratio(client.average_spent, baseline.average_spend) - 1.0) * 100.0).round()
            ));
            insights.push(format!(
                "Visits {}% more often than average",
                ((baseline.average_visit_frequency / client_frequency - 1.0) * 100.0).round()
            ));
            recommendations.push("Keep giving premium attention".to_string());
            (ClientStatus::Vip, "High value and high frequency".to_string())
        }
        Some(_) => {
            insights.push("Stable visit pattern".to_string());
            recommendations.push("Maintain service quality".to_string());
            (ClientStatus::Regular, "Stable behavior".to_string())
        }
    };

    let population = all_clients.len().max(1) as f64;
    let percentile = all_clients
        .iter()
        .filter(|c| c.average_spent <= client.average_spent)
        .count() as f64
        / population
        * 100.0;

    let similar_clients_count = all_clients
        .iter()
        .filter(|c| c.id != client.id)
        .filter(|c| {
            ratio((c.average_spent - client.average_spent).abs(), baseline.average_spend) < 0.2
                && ratio(
                    (c.visit_count - client.visit_count).abs() as f64,
                    baseline.average_visits,
                ) < 0.2
        })
        .count();

    let next_visit_days = match days_since_visit {
        Some(days) => (client_frequency - days as f64).max(0.0),
        None => client_frequency,
    };
    let churn_date = days_since_visit.map(|days| {
        now + Duration::seconds(((client_frequency * 3.0 - days as f64) * 86_400.0) as i64)
    });

    ClientScore {
        client_id: client.id,
        client_name: client.name.clone(),
        status,
        status_reason,
        days_since_last_visit: days_since_visit,
        scores: Scores {
            engagement: engagement_score.round() as i64,
            value: value_score.round() as i64,
            frequency: frequency_score.round() as i64,
            trend: trend_score.round() as i64,
            churn_risk: churn_risk as i64,
        },
        predictions: VisitPredictions {
            next_visit_days: next_visit_days.round() as i64,
            next_visit_confidence: 100 - churn_risk as i64,
            lifetime_value: client.average_spent * (365.0 / client_frequency) * 2.0,
            churn_date,
        },
        comparisons: Comparisons {
            vs_average_spend: ((ratio(client.average_spent, baseline.average_spend) - 1.0)
                * 100.0)
                .round() as i64,
            vs_average_frequency: ((baseline.average_visit_frequency / client_frequency - 1.0)
                * 100.0)
                .round() as i64,
            percentile: percentile.round() as i64,
            similar_clients_count,
        },
        insights,
        recommendations,
        model_version: MODEL_VERSION.to_string(),
    }
}

/// Baseline plus a score for every client
#[derive(Debug, Clone, Serialize)]
pub struct RiskReport {
    pub baseline: BusinessBaseline,
    pub clients: Vec<ClientScore>,
}

impl RiskReport {
    pub fn compute(clients: &[Client], now: DateTime<Utc>) -> Self {
        let baseline = BusinessBaseline::from_clients(clients, now).unwrap_or_default();
        let scores = clients
            .iter()
            .map(|c| score_client(c, &baseline, clients, now))
            .collect();
        Self {
            baseline,
            clients: scores,
        }
    }
}
