//! Chat assistant: intent detection and chart shaping

use super::traits::ChatMessage;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Previous turns forwarded to the model
pub const MAX_HISTORY: usize = 20;

/// Data the assistant fetches before answering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatIntent {
    DailySales,
    PeriodAnalysis,
    TopClients,
    Prediction,
}

/// Detected intent and whether the user asked to see a chart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntentMatch {
    pub intent: ChatIntent,
    pub wants_chart: bool,
}

fn any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

const CHART_WORDS: &[&str] = &["gráfica", "grafica", "chart", "graph"];
const SHOW_WORDS: &[&str] = &["muestra", "ver ", "visualiza", "show", "plot"];
const SALES_WORDS: &[&str] = &["venta", "ingreso", "sales", "revenue"];
const TODAY_WORDS: &[&str] = &["hoy", "día", "diaria", "today", "daily"];
const CLIENT_WORDS: &[&str] = &["cliente", "client", "customer"];
const RANK_WORDS: &[&str] = &[
    "mejor", "top", "más", "compra", "quien", "quién", "best", "who", "most",
];
const PERIOD_WORDS: &[&str] = &[
    "semana",
    "semanal",
    "últimos días",
    "ultimos dias",
    "mensual",
    " mes ",
    "week",
    "last days",
    "month",
];
const FORECAST_WORDS: &[&str] = &[
    "predicción",
    "prediccion",
    "futuro",
    "pronóstico",
    "pronostico",
    "forecast",
    "predict",
    "future",
];

/// Keyword intent detection (Spanish and English); first matching rule wins
pub fn detect_intent(message: &str) -> Option<IntentMatch> {
    // Punctuation becomes spaces so " mes " only matches the whole word
    let normalized: String = message
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let text = format!(" {} ", normalized);
    let wants_chart = any(&text, CHART_WORDS) || any(&text, SHOW_WORDS);

    let intent = if any(&text, SALES_WORDS) && any(&text, TODAY_WORDS) {
        ChatIntent::DailySales
    } else if any(&text, CHART_WORDS) && any(&text, SALES_WORDS) {
        return Some(IntentMatch {
            intent: ChatIntent::PeriodAnalysis,
            wants_chart: true,
        });
    } else if any(&text, CLIENT_WORDS) && any(&text, RANK_WORDS) {
        ChatIntent::TopClients
    } else if any(&text, PERIOD_WORDS) {
        return Some(IntentMatch {
            intent: ChatIntent::PeriodAnalysis,
            wants_chart: true,
        });
    } else if any(&text, FORECAST_WORDS) {
        return Some(IntentMatch {
            intent: ChatIntent::Prediction,
            wants_chart: true,
        });
    } else {
        return None;
    };

    Some(IntentMatch {
        intent,
        wants_chart,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartConfig {
    pub x_key: String,
    pub y_key: String,
}

/// Chart payload rendered by the front end next to the answer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    #[serde(rename = "type")]
    pub kind: ChartKind,
    pub data: Vec<Value>,
    pub config: ChartConfig,
}

/// Top client row fetched for the chat
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopClientRow {
    pub name: String,
    pub total_spent: f64,
    pub visits: i64,
}

/// One labelled day of sales
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaySales {
    pub date: String,
    pub sales: f64,
}

/// Bar chart of the top clients by first name
pub fn top_clients_chart(rows: &[TopClientRow]) -> ChartData {
    ChartData {
        kind: ChartKind::Bar,
        data: rows
            .iter()
            .map(|r| {
                json!({
                    "name": r.name.split_whitespace().next().unwrap_or(&r.name),
                    "value": r.total_spent,
                })
            })
            .collect(),
        config: ChartConfig {
            x_key: "name".into(),
            y_key: "value".into(),
        },
    }
}

/// Line chart of labelled daily sales
pub fn sales_line_chart(days: &[DaySales]) -> ChartData {
    ChartData {
        kind: ChartKind::Line,
        data: days
            .iter()
            .map(|d| json!({"date": d.date, "sales": d.sales}))
            .collect(),
        config: ChartConfig {
            x_key: "date".into(),
            y_key: "sales".into(),
        },
    }
}

/// Page the user is on and the conversation so far
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatContext {
    #[serde(default)]
    pub current_page: Option<String>,
    #[serde(default)]
    pub previous_messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: Option<String>,
    #[serde(default)]
    pub context: ChatContext,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub message: String,
    pub chart: Option<ChartData>,
}

/// Last [`MAX_HISTORY`] turns, system messages from the client dropped
pub fn trimmed_history(previous: &[ChatMessage]) -> Vec<ChatMessage> {
    let turns: Vec<&ChatMessage> = previous
        .iter()
        .filter(|m| m.role != super::traits::Role::System)
        .collect();
    let skip = turns.len().saturating_sub(MAX_HISTORY);
    turns.into_iter().skip(skip).cloned().collect()
}
