//! AI insight endpoints: gather data, ask the model, fall back locally,
//! store the result as an insight

use super::analytics::{
    daily_sales_series, fill_synthetic_baseline, growth_percent, local_forecast,
    loyalty_for_status, start_of_day, DailyMetrics, PipelineInsight, PipelineMetrics,
    PipelineSnapshot, Prediction, SalesPoint, MAX_PIPELINE_INSIGHTS,
};
use super::chat::{
    detect_intent, sales_line_chart, top_clients_chart, trimmed_history, ChartData, ChatIntent,
    ChatRequest, ChatResponse, DaySales, IntentMatch, TopClientRow,
};
use super::prompts;
use super::scoring::{score_client, BusinessBaseline, RiskReport};
use super::traits::{ChatMessage, CompletionProvider, CompletionRequest};
use crate::crm::validation::clean;
use crate::crm::{CrmError, CrmResult};
use crate::store::models::{Client, Insight, InsightType, InteractionType, Stage};
use crate::store::CrmStore;
use crate::BusinessConfig;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// days_since_last_visit reported for clients that never visited
pub const NEVER_VISITED_DAYS: i64 = 999;
const HISTORY_DAYS: u64 = 30;
const FORECAST_DAYS: u64 = 7;
const HISTORICAL_SHOWN: usize = 7;
const TOP_CLIENTS: usize = 5;
pub const DEFAULT_INSIGHT_LIMIT: usize = 20;
pub const MAX_INSIGHT_LIMIT: usize = 100;

const SUMMARY_UNAVAILABLE: &str =
    "The daily summary could not be generated. Please check the AI configuration.";

// ============================================================================
// Request / response types
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyzeCustomerRequest {
    pub client_id: Option<Uuid>,
}

/// Risk analysis of one customer, from the model or the local scorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerAnalysis {
    #[serde(alias = "riskLevel")]
    pub risk_level: f64,
    pub status: String,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// Models sometimes answer with a formatted string
    #[serde(default, alias = "estimatedLifetimeValue")]
    pub estimated_lifetime_value: Value,
    #[serde(default, alias = "nextBestAction")]
    pub next_best_action: String,
    /// `llm` or `heuristic`
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerAnalysisResponse {
    pub client: Client,
    pub days_since_last_visit: i64,
    pub analysis: CustomerAnalysis,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailySummaryResponse {
    pub summary: String,
    pub metrics: DailyMetrics,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SalesForecast {
    #[serde(default)]
    predictions: Vec<Prediction>,
    #[serde(default)]
    insights: Vec<String>,
    #[serde(default)]
    recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SalesPredictionResponse {
    /// Last 7 days of the series the forecast was based on
    pub historical: Vec<SalesPoint>,
    pub predictions: Vec<Prediction>,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
    /// `llm` or `local`
    pub source: String,
    /// True when sparse history was padded with the synthetic baseline
    pub synthetic_history: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LlmPipelineInsights {
    #[serde(default)]
    insights: Vec<PipelineInsight>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineInsightsResponse {
    pub insights: Vec<PipelineInsight>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<PipelineMetrics>,
}

/// Models occasionally wrap JSON in a markdown fence
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

// ============================================================================
// Service
// ============================================================================

/// Runs the AI endpoints on top of the store and a completion provider
pub struct InsightService {
    store: Arc<dyn CrmStore>,
    llm: Arc<dyn CompletionProvider>,
    business: BusinessConfig,
}

impl InsightService {
    pub fn new(
        store: Arc<dyn CrmStore>,
        llm: Arc<dyn CompletionProvider>,
        business: BusinessConfig,
    ) -> Self {
        Self {
            store,
            llm,
            business,
        }
    }

    async fn complete_json<T: DeserializeOwned>(&self, request: &CompletionRequest) -> Result<T> {
        let content = self.llm.complete(request).await?;
        serde_json::from_str(strip_code_fence(&content))
            .context("Completion was not the expected JSON shape")
    }

    // ========================================================================
    // Customer analysis
    // ========================================================================

    /// Analyze one customer and store churn/loyalty scores on the client
    pub async fn analyze_customer(
        &self,
        req: AnalyzeCustomerRequest,
    ) -> CrmResult<CustomerAnalysisResponse> {
        let client_id = req
            .client_id
            .ok_or_else(|| CrmError::BadRequest("client_id is required".into()))?;
        let mut client = self
            .store
            .get_client(client_id)
            .await?
            .ok_or_else(|| CrmError::NotFound("Client not found".into()))?;

        let now = Utc::now();
        let days_since_last_visit = client
            .days_since_last_visit(now)
            .unwrap_or(NEVER_VISITED_DAYS);

        let request = prompts::customer_analysis(&client, days_since_last_visit, &self.business);
        let analysis = match self.complete_json::<CustomerAnalysis>(&request).await {
            Ok(mut analysis) => {
                analysis.risk_level = analysis.risk_level.clamp(0.0, 100.0);
                analysis.source = "llm".to_string();
                analysis
            }
            Err(e) => {
                tracing::warn!(%client_id, "Customer analysis fell back to local scoring: {:#}", e);
                self.heuristic_analysis(&client, now).await?
            }
        };

        let insight = Insight::new(
            InsightType::CustomerAnalysis,
            json!({
                "client_id": client_id,
                "client_name": client.name,
                "analysis": analysis,
                "analyzed_at": now,
            }),
            if analysis.risk_level > 70.0 { 2 } else { 1 },
        );
        self.store.save_insight(&insight).await?;

        let churn_risk = analysis.risk_level / 100.0;
        let loyalty_score = loyalty_for_status(&analysis.status);
        self.store
            .set_client_scores(client_id, churn_risk, loyalty_score)
            .await?;
        client.churn_risk = Some(churn_risk);
        client.loyalty_score = Some(loyalty_score);

        Ok(CustomerAnalysisResponse {
            client,
            days_since_last_visit,
            analysis,
        })
    }

    async fn heuristic_analysis(
        &self,
        client: &Client,
        now: DateTime<Utc>,
    ) -> Result<CustomerAnalysis> {
        let population = self.store.all_clients().await?;
        let baseline = BusinessBaseline::from_clients(&population, now).unwrap_or_default();
        let score = score_client(client, &baseline, &population, now);

        Ok(CustomerAnalysis {
            risk_level: score.scores.churn_risk as f64,
            status: score.status.analysis_label().to_string(),
            next_best_action: score.recommendations.first().cloned().unwrap_or_default(),
            // Two-year projection scaled to six months
            estimated_lifetime_value: json!((score.predictions.lifetime_value / 4.0).round()),
            insights: score.insights,
            recommendations: score.recommendations,
            source: "heuristic".to_string(),
        })
    }

    /// Local scoring of every client against the business baseline
    pub async fn client_risk(&self) -> Result<RiskReport> {
        let clients = self.store.all_clients().await?;
        Ok(RiskReport::compute(&clients, Utc::now()))
    }

    // ========================================================================
    // Daily summary
    // ========================================================================

    /// Today's metrics (since UTC midnight) with a model-written summary
    pub async fn daily_summary(&self) -> Result<DailySummaryResponse> {
        let now = Utc::now();
        let since = start_of_day(now);

        let interactions = self.store.list_interactions_since(since).await?;
        let new_customers = self.store.count_clients_created_since(since).await?;
        let metrics = DailyMetrics::compute(&interactions, new_customers);

        let request = prompts::daily_summary(&metrics, &self.business);
        let summary = match self.llm.complete(&request).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!("Daily summary fell back to placeholder: {:#}", e);
                SUMMARY_UNAVAILABLE.to_string()
            }
        };

        let insight = Insight::new(
            InsightType::DailySummary,
            json!({"summary": summary, "metrics": metrics, "date": since}),
            1,
        );
        self.store.save_insight(&insight).await?;

        Ok(DailySummaryResponse { summary, metrics })
    }

    // ========================================================================
    // Sales prediction
    // ========================================================================

    /// 7-day forecast from the last 30 days of purchases
    pub async fn predict_sales(&self) -> Result<SalesPredictionResponse> {
        let now = Utc::now();
        let today = now.date_naive();
        let since = start_of_day(now) - Duration::days(HISTORY_DAYS as i64 - 1);

        let rows = self.store.list_interactions_since(since).await?;
        let mut series = daily_sales_series(&rows, today, HISTORY_DAYS);
        let synthetic_history = fill_synthetic_baseline(&mut series);

        let request = prompts::sales_prediction(&series, FORECAST_DAYS, &self.business);
        let (forecast, source) = match self.complete_json::<SalesForecast>(&request).await {
            Ok(forecast) if !forecast.predictions.is_empty() => (forecast, "llm"),
            Ok(_) => {
                tracing::warn!("Sales prediction returned no days, using local forecast");
                (self.local_sales_forecast(&series, today), "local")
            }
            Err(e) => {
                tracing::warn!("Sales prediction fell back to local forecast: {:#}", e);
                (self.local_sales_forecast(&series, today), "local")
            }
        };

        let insight = Insight::new(
            InsightType::SalesPrediction,
            json!({
                "predictions": forecast.predictions,
                "insights": forecast.insights,
                "recommendations": forecast.recommendations,
                "source": source,
                "synthetic_history": synthetic_history,
                "generated_at": now,
            }),
            1,
        );
        self.store.save_insight(&insight).await?;

        let shown_from = series.len().saturating_sub(HISTORICAL_SHOWN);
        Ok(SalesPredictionResponse {
            historical: series[shown_from..].to_vec(),
            predictions: forecast.predictions,
            insights: forecast.insights,
            recommendations: forecast.recommendations,
            source: source.to_string(),
            synthetic_history,
        })
    }

    fn local_sales_forecast(&self, series: &[SalesPoint], today: chrono::NaiveDate) -> SalesForecast {
        SalesForecast {
            predictions: local_forecast(series, today, FORECAST_DAYS),
            insights: vec![
                "Forecast based on the average of the same weekday over the last 30 days"
                    .to_string(),
            ],
            recommendations: vec![],
        }
    }

    // ========================================================================
    // Pipeline insights
    // ========================================================================

    /// Model insights plus rule-based ones, at most five
    pub async fn pipeline_insights(&self) -> Result<PipelineInsightsResponse> {
        let now = Utc::now();
        let stages: Vec<Stage> = self
            .store
            .list_stages()
            .await?
            .into_iter()
            .map(|s| s.stage)
            .collect();
        let clients = self.store.clients_in_pipeline().await?;
        let snapshot = PipelineSnapshot::compute(&stages, &clients, now);

        if snapshot.is_empty() {
            return Ok(PipelineInsightsResponse {
                insights: vec![PipelineInsight::empty_pipeline()],
                metrics: None,
            });
        }

        let computed = snapshot.computed_insights(&self.business.currency_symbol);
        let request = prompts::pipeline_insights(&snapshot, &self.business);
        let from_llm = match self.complete_json::<LlmPipelineInsights>(&request).await {
            Ok(parsed) => parsed.insights,
            Err(e) => {
                tracing::warn!("Pipeline insights fell back to computed rules: {:#}", e);
                vec![]
            }
        };

        let mut insights: Vec<PipelineInsight> = from_llm
            .into_iter()
            .chain(computed)
            .take(MAX_PIPELINE_INSIGHTS)
            .collect();
        if insights.is_empty() {
            insights.push(PipelineInsight::unavailable());
        }

        let priority = if insights.iter().any(PipelineInsight::is_high) {
            2
        } else {
            1
        };
        let insight = Insight::new(
            InsightType::PipelineAnalysis,
            json!({
                "insights": insights,
                "metrics": snapshot.metrics,
                "generated_at": now,
            }),
            priority,
        );
        self.store.save_insight(&insight).await?;

        Ok(PipelineInsightsResponse {
            insights,
            metrics: Some(snapshot.metrics),
        })
    }

    // ========================================================================
    // Chat
    // ========================================================================

    /// Answer a chat message, attaching business data and a chart when the
    /// message asks for them
    pub async fn chat(&self, req: ChatRequest) -> CrmResult<ChatResponse> {
        let message = clean(req.message)
            .ok_or_else(|| CrmError::BadRequest("message is required".into()))?;

        let (data, chart) = match detect_intent(&message) {
            Some(matched) => {
                tracing::debug!(intent = ?matched.intent, "Chat intent detected");
                self.chat_data(matched).await?
            }
            None => (None, None),
        };

        let data_context = data.as_ref().map(Value::to_string);
        let mut messages = vec![prompts::chat_system(
            &self.business,
            req.context.current_page.as_deref(),
            data_context.as_deref(),
            chart.is_some(),
        )];
        messages.extend(trimmed_history(&req.context.previous_messages));
        messages.push(ChatMessage::user(message));

        let request = CompletionRequest::new(messages)
            .temperature(0.7)
            .max_tokens(500);
        let reply = self
            .llm
            .complete(&request)
            .await
            .context("Chat completion failed")?;

        Ok(ChatResponse {
            message: reply,
            chart,
        })
    }

    async fn chat_data(&self, matched: IntentMatch) -> Result<(Option<Value>, Option<ChartData>)> {
        let now = Utc::now();
        let today_start = start_of_day(now);

        match matched.intent {
            ChatIntent::DailySales => {
                let rows = self
                    .store
                    .list_interactions_since(today_start - Duration::days(1))
                    .await?;
                let purchases = rows.iter().filter(|i| i.kind == InteractionType::Purchase);
                let (mut today, mut yesterday, mut count) = (0.0, 0.0, 0usize);
                for p in purchases {
                    let amount = p.amount.unwrap_or(0.0);
                    if p.date >= today_start {
                        today += amount;
                        count += 1;
                    } else {
                        yesterday += amount;
                    }
                }
                let data = json!({
                    "today": today,
                    "count": count,
                    "yesterday": yesterday,
                    "growth": growth_percent(today, yesterday),
                });
                Ok((Some(data), None))
            }
            ChatIntent::TopClients => {
                let rows: Vec<TopClientRow> = self
                    .store
                    .top_clients_by_spent(TOP_CLIENTS)
                    .await?
                    .into_iter()
                    .map(|c| TopClientRow {
                        name: c.name,
                        total_spent: c.total_spent,
                        visits: c.visit_count,
                    })
                    .collect();
                let chart = (matched.wants_chart && !rows.is_empty())
                    .then(|| top_clients_chart(&rows));
                Ok((Some(serde_json::to_value(&rows)?), chart))
            }
            ChatIntent::PeriodAnalysis => {
                let rows = self
                    .store
                    .list_interactions_since(today_start - Duration::days(6))
                    .await?;
                let days: Vec<DaySales> = daily_sales_series(&rows, now.date_naive(), 7)
                    .into_iter()
                    .map(|p| DaySales {
                        date: p.date.format("%a %-d").to_string(),
                        sales: p.amount,
                    })
                    .collect();
                Ok((Some(serde_json::to_value(&days)?), Some(sales_line_chart(&days))))
            }
            ChatIntent::Prediction => {
                let rows = self
                    .store
                    .list_interactions_since(today_start - Duration::days(HISTORY_DAYS as i64 - 1))
                    .await?;
                let series = daily_sales_series(&rows, now.date_naive(), HISTORY_DAYS);
                let forecast = local_forecast(&series, now.date_naive(), FORECAST_DAYS);
                let days: Vec<DaySales> = forecast
                    .iter()
                    .map(|p| DaySales {
                        date: p.date.clone(),
                        sales: p.amount,
                    })
                    .collect();
                Ok((
                    Some(serde_json::to_value(&forecast)?),
                    Some(sales_line_chart(&days)),
                ))
            }
        }
    }

    // ========================================================================
    // Stored insights
    // ========================================================================

    /// Stored insights, newest first
    pub async fn list_insights(
        &self,
        kind: Option<InsightType>,
        limit: Option<usize>,
    ) -> Result<Vec<Insight>> {
        let limit = limit
            .unwrap_or(DEFAULT_INSIGHT_LIMIT)
            .clamp(1, MAX_INSIGHT_LIMIT);
        self.store.list_insights(kind, limit).await
    }
}
