//! Test helper factories and mock state builders
//!
//! Provides convenience functions for creating test records with sensible defaults,
//! and helpers for building mock AppState / ServerState instances.
#![allow(dead_code)]

use crate::ai::MockCompletionProvider;
use crate::api::handlers::{KunaState, ServerState};
use crate::store::mock::MockCrmStore;
use crate::store::models::*;
use crate::{AppState, BusinessConfig, Config, LlmConfig};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

// ============================================================================
// Mock state builders
// ============================================================================

/// Config pointing at nothing real
pub fn test_config() -> Config {
    Config {
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        database_url: "sqlite::memory:".to_string(),
        database_max_connections: 1,
        llm: LlmConfig::default(),
        business: test_business(),
    }
}

pub fn test_business() -> BusinessConfig {
    BusinessConfig::default()
}

/// Create a mock AppState with an empty store and an unscripted LLM
pub fn mock_app_state() -> AppState {
    mock_app_state_with(MockCrmStore::new(), MockCompletionProvider::new())
}

/// Create a mock AppState with pre-seeded backends
pub fn mock_app_state_with(store: MockCrmStore, llm: MockCompletionProvider) -> AppState {
    AppState {
        store: Arc::new(store),
        llm: Arc::new(llm),
        config: Arc::new(test_config()),
    }
}

/// ServerState over empty mocks
pub fn mock_server_state() -> KunaState {
    ServerState::new(mock_app_state())
}

// ============================================================================
// Test data factories
// ============================================================================

/// Create a test client with zeroed aggregates
pub fn test_client(name: &str) -> Client {
    Client::new(name.to_string())
}

/// Create a test client that has bought `visits` times for `spent` in total
pub fn test_client_with_history(name: &str, visits: i64, spent: f64) -> Client {
    let mut client = test_client(name);
    client.visit_count = visits;
    client.total_spent = spent;
    client.average_spent = if visits > 0 { spent / visits as f64 } else { 0.0 };
    client.last_visit = (visits > 0).then(Utc::now);
    client
}

/// Create a non-default test stage
pub fn test_stage(name: &str, order: i64) -> Stage {
    let now = Utc::now();
    Stage {
        id: Uuid::new_v4(),
        name: name.to_string(),
        description: None,
        color: DEFAULT_STAGE_COLOR.to_string(),
        order,
        is_default: false,
        created_at: now,
        updated_at: now,
    }
}

/// Create an open manual task
pub fn test_task(title: &str) -> Task {
    let now = Utc::now();
    Task {
        id: Uuid::new_v4(),
        title: title.to_string(),
        description: None,
        client_id: None,
        stage_id: None,
        due_date: None,
        priority: TaskPriority::Medium,
        kind: TaskKind::Manual,
        completed: false,
        completed_at: None,
        notes: None,
        created_at: now,
        updated_at: now,
    }
}

/// Create a purchase of `amount` made now
pub fn test_purchase(client_id: Uuid, amount: f64) -> Interaction {
    let mut interaction = Interaction::new(client_id, InteractionType::Purchase, None);
    interaction.amount = Some(amount);
    interaction
}
