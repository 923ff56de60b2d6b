//! Persisted CRM records
//!
//! Clients, pipeline stages, interactions, tasks and AI insights as they are
//! stored and returned by the API.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Enums
// ============================================================================

/// Kind of identity document attached to a client
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IdType {
    /// Costa Rican national id
    Cedula,
    Pasaporte,
    /// Foreign resident id
    Dimex,
}

impl fmt::Display for IdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cedula => write!(f, "cedula"),
            Self::Pasaporte => write!(f, "pasaporte"),
            Self::Dimex => write!(f, "dimex"),
        }
    }
}

impl FromStr for IdType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cedula" => Ok(Self::Cedula),
            "pasaporte" | "passport" => Ok(Self::Pasaporte),
            "dimex" => Ok(Self::Dimex),
            _ => Err(format!("Unknown id type: {}", s)),
        }
    }
}

/// Type of an interaction log entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    Purchase,
    Visit,
    StageChange,
    PipelineAction,
    Call,
    Email,
    Note,
}

impl fmt::Display for InteractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Purchase => write!(f, "purchase"),
            Self::Visit => write!(f, "visit"),
            Self::StageChange => write!(f, "stage_change"),
            Self::PipelineAction => write!(f, "pipeline_action"),
            Self::Call => write!(f, "call"),
            Self::Email => write!(f, "email"),
            Self::Note => write!(f, "note"),
        }
    }
}

impl FromStr for InteractionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "purchase" => Ok(Self::Purchase),
            "visit" => Ok(Self::Visit),
            "stage_change" => Ok(Self::StageChange),
            "pipeline_action" => Ok(Self::PipelineAction),
            "call" => Ok(Self::Call),
            "email" => Ok(Self::Email),
            "note" => Ok(Self::Note),
            _ => Err(format!("Unknown interaction type: {}", s)),
        }
    }
}

/// Task priority, ordered from least to most pressing
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    /// Numeric rank used for sorting (higher = more pressing)
    pub fn rank(&self) -> i64 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Urgent => 4,
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Urgent => write!(f, "urgent"),
        }
    }
}

impl FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            _ => Err(format!("Unknown task priority: {}", s)),
        }
    }
}

/// Where a task came from
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    #[default]
    Manual,
    /// Stage playbook task, not bound to a client
    Template,
    Automatic,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Template => write!(f, "template"),
            Self::Automatic => write!(f, "automatic"),
        }
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "template" => Ok(Self::Template),
            "automatic" => Ok(Self::Automatic),
            _ => Err(format!("Unknown task type: {}", s)),
        }
    }
}

/// Which AI endpoint produced an insight
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    CustomerAnalysis,
    DailySummary,
    SalesPrediction,
    PipelineAnalysis,
}

impl fmt::Display for InsightType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CustomerAnalysis => write!(f, "customer_analysis"),
            Self::DailySummary => write!(f, "daily_summary"),
            Self::SalesPrediction => write!(f, "sales_prediction"),
            Self::PipelineAnalysis => write!(f, "pipeline_analysis"),
        }
    }
}

impl FromStr for InsightType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "customer_analysis" => Ok(Self::CustomerAnalysis),
            "daily_summary" => Ok(Self::DailySummary),
            "sales_prediction" => Ok(Self::SalesPrediction),
            "pipeline_analysis" => Ok(Self::PipelineAnalysis),
            _ => Err(format!("Unknown insight type: {}", s)),
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// A customer of the business
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub id_type: Option<IdType>,
    pub id_number: Option<String>,
    pub address: Option<String>,
    pub company: Option<String>,
    pub occupation: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub total_spent: f64,
    pub visit_count: i64,
    pub average_spent: f64,
    pub last_visit: Option<DateTime<Utc>>,
    pub stage_id: Option<Uuid>,
    pub stage_entered_at: Option<DateTime<Utc>>,
    /// 0.0..=1.0, written by customer analysis
    pub churn_risk: Option<f64>,
    /// 0..=100, written by customer analysis
    pub loyalty_score: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Client {
    /// Fresh client with zeroed aggregates
    pub fn new(name: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            email: None,
            phone: None,
            id_type: None,
            id_number: None,
            address: None,
            company: None,
            occupation: None,
            birthday: None,
            notes: None,
            tags: Vec::new(),
            total_spent: 0.0,
            visit_count: 0,
            average_spent: 0.0,
            last_visit: None,
            stage_id: None,
            stage_entered_at: None,
            churn_risk: None,
            loyalty_score: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whole days since the last visit, if the client ever visited
    pub fn days_since_last_visit(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_visit.map(|lv| (now - lv).num_days())
    }

    /// Whole days spent in the current stage
    pub fn days_in_stage(&self, now: DateTime<Utc>) -> Option<i64> {
        self.stage_entered_at.map(|at| (now - at).num_days())
    }

    /// First word of the name, used for compact chart labels
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }
}

/// A pipeline step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stage {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub order: i64,
    /// Default stages cannot be deleted
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Color given to stages created without one
pub const DEFAULT_STAGE_COLOR: &str = "#6B7280";

/// A stage together with the number of clients currently in it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageWithCount {
    #[serde(flatten)]
    pub stage: Stage,
    pub client_count: usize,
}

/// Append-only client log entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interaction {
    pub id: Uuid,
    pub client_id: Uuid,
    #[serde(rename = "type")]
    pub kind: InteractionType,
    pub amount: Option<f64>,
    pub notes: Option<String>,
    pub date: DateTime<Utc>,
}

impl Interaction {
    pub fn new(client_id: Uuid, kind: InteractionType, notes: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            kind,
            amount: None,
            notes,
            date: Utc::now(),
        }
    }

    /// Positive purchase amount, if this entry is a sale
    pub fn sale_amount(&self) -> Option<f64> {
        match (self.kind, self.amount) {
            (InteractionType::Purchase, Some(a)) if a > 0.0 => Some(a),
            _ => None,
        }
    }
}

/// A to-do item, optionally tied to a client and/or stage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub client_id: Option<Uuid>,
    pub stage_id: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: TaskPriority,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Minimal client reference embedded in task listings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientRef {
    pub id: Uuid,
    pub name: String,
}

/// Minimal stage reference embedded in task listings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageRef {
    pub id: Uuid,
    pub name: String,
    pub color: String,
}

/// Task with its related client and stage resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDetails {
    #[serde(flatten)]
    pub task: Task,
    pub client: Option<ClientRef>,
    pub stage: Option<StageRef>,
}

/// Stored output of an AI endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: InsightType,
    pub content: serde_json::Value,
    /// 1 = normal, 2 = high
    pub priority: i64,
    pub created_at: DateTime<Utc>,
}

impl Insight {
    pub fn new(kind: InsightType, content: serde_json::Value, priority: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            content,
            priority,
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// Filters
// ============================================================================

/// Column a client listing can be sorted by
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClientSort {
    #[default]
    CreatedAt,
    Name,
    TotalSpent,
    LastVisit,
    VisitCount,
}

impl FromStr for ClientSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "created_at" => Ok(Self::CreatedAt),
            "name" => Ok(Self::Name),
            "total_spent" => Ok(Self::TotalSpent),
            "last_visit" => Ok(Self::LastVisit),
            "visit_count" => Ok(Self::VisitCount),
            _ => Err(format!("Unknown client sort field: {}", s)),
        }
    }
}

/// Filters for listing clients
#[derive(Debug, Clone, Default)]
pub struct ClientFilter {
    /// Substring of name, email or phone
    pub search: Option<String>,
    pub stage_id: Option<Uuid>,
    pub in_pipeline: Option<bool>,
    /// Any-match on tags, case-insensitive
    pub tags: Option<Vec<String>>,
    pub sort: ClientSort,
    pub descending: bool,
    pub limit: usize,
    pub offset: usize,
}

/// Whether a task is bound to a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskScope {
    /// Tasks attached to a client
    Client,
    /// Tasks without a client
    Template,
}

impl FromStr for TaskScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "client" => Ok(Self::Client),
            "template" => Ok(Self::Template),
            _ => Err(format!("Unknown task scope: {}", s)),
        }
    }
}

/// Filters for listing tasks
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub client_id: Option<Uuid>,
    pub stage_id: Option<Uuid>,
    pub completed: Option<bool>,
    pub scope: Option<TaskScope>,
}
