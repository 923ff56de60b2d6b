//! In-memory mock implementation of CrmStore for testing.
//!
//! Backed by `tokio::sync::RwLock<HashMap<Uuid, T>>` collections and
//! conditionally compiled with `#[cfg(test)]`.

use crate::store::models::*;
use crate::store::traits::CrmStore;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory mock implementation of CrmStore for testing.
#[derive(Default)]
pub struct MockCrmStore {
    pub clients: RwLock<HashMap<Uuid, Client>>,
    pub stages: RwLock<HashMap<Uuid, Stage>>,
    pub interactions: RwLock<Vec<Interaction>>,
    pub tasks: RwLock<HashMap<Uuid, Task>>,
    pub insights: RwLock<Vec<Insight>>,
}

impl MockCrmStore {
    /// Create a new empty MockCrmStore.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a client.
    pub async fn with_client(self, client: Client) -> Self {
        self.clients.write().await.insert(client.id, client);
        self
    }

    /// Seed a stage.
    pub async fn with_stage(self, stage: Stage) -> Self {
        self.stages.write().await.insert(stage.id, stage);
        self
    }

    /// Seed a task.
    pub async fn with_task(self, task: Task) -> Self {
        self.tasks.write().await.insert(task.id, task);
        self
    }

    /// Seed an interaction without touching client aggregates.
    pub async fn with_interaction(self, interaction: Interaction) -> Self {
        self.interactions.write().await.push(interaction);
        self
    }

    async fn resolve_task(&self, task: Task) -> TaskDetails {
        let client = match task.client_id {
            Some(id) => self.clients.read().await.get(&id).map(|c| ClientRef {
                id: c.id,
                name: c.name.clone(),
            }),
            None => None,
        };
        let stage = match task.stage_id {
            Some(id) => self.stages.read().await.get(&id).map(|s| StageRef {
                id: s.id,
                name: s.name.clone(),
                color: s.color.clone(),
            }),
            None => None,
        };
        TaskDetails {
            task,
            client,
            stage,
        }
    }
}

fn matches_search(client: &Client, term: &str) -> bool {
    let term = term.to_lowercase();
    client.name.to_lowercase().contains(&term)
        || client
            .email
            .as_deref()
            .is_some_and(|e| e.to_lowercase().contains(&term))
        || client.phone.as_deref().is_some_and(|p| p.contains(&term))
}

#[async_trait]
impl CrmStore for MockCrmStore {
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    // ========================================================================
    // Clients
    // ========================================================================

    async fn create_client(&self, client: &Client) -> Result<()> {
        self.clients.write().await.insert(client.id, client.clone());
        Ok(())
    }

    async fn get_client(&self, id: Uuid) -> Result<Option<Client>> {
        Ok(self.clients.read().await.get(&id).cloned())
    }

    async fn get_clients(&self, ids: &[Uuid]) -> Result<Vec<Client>> {
        let clients = self.clients.read().await;
        Ok(ids.iter().filter_map(|id| clients.get(id).cloned()).collect())
    }

    async fn list_clients(&self, filter: &ClientFilter) -> Result<(Vec<Client>, usize)> {
        let mut matching: Vec<Client> = self
            .clients
            .read()
            .await
            .values()
            .filter(|c| {
                filter
                    .search
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .is_none_or(|s| matches_search(c, s))
            })
            .filter(|c| filter.stage_id.is_none_or(|s| c.stage_id == Some(s)))
            .filter(|c| {
                filter
                    .in_pipeline
                    .is_none_or(|in_pipeline| c.stage_id.is_some() == in_pipeline)
            })
            .filter(|c| {
                filter.tags.as_ref().filter(|t| !t.is_empty()).is_none_or(|tags| {
                    c.tags
                        .iter()
                        .any(|t| tags.iter().any(|f| f.eq_ignore_ascii_case(t)))
                })
            })
            .cloned()
            .collect();

        matching.sort_by(|a, b| {
            let ord = match filter.sort {
                ClientSort::CreatedAt => a.created_at.cmp(&b.created_at),
                ClientSort::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
                ClientSort::TotalSpent => a.total_spent.total_cmp(&b.total_spent),
                ClientSort::LastVisit => a.last_visit.cmp(&b.last_visit),
                ClientSort::VisitCount => a.visit_count.cmp(&b.visit_count),
            };
            if filter.descending {
                ord.reverse()
            } else {
                ord
            }
        });

        let total = matching.len();
        let page = matching
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .collect();
        Ok((page, total))
    }

    async fn all_clients(&self) -> Result<Vec<Client>> {
        let mut clients: Vec<Client> = self.clients.read().await.values().cloned().collect();
        clients.sort_by_key(|c| c.created_at);
        Ok(clients)
    }

    async fn clients_in_pipeline(&self) -> Result<Vec<Client>> {
        let mut clients: Vec<Client> = self
            .clients
            .read()
            .await
            .values()
            .filter(|c| c.stage_id.is_some())
            .cloned()
            .collect();
        clients.sort_by_key(|c| c.stage_entered_at);
        Ok(clients)
    }

    async fn top_clients_by_spent(&self, limit: usize) -> Result<Vec<Client>> {
        let mut clients: Vec<Client> = self.clients.read().await.values().cloned().collect();
        clients.sort_by(|a, b| b.total_spent.total_cmp(&a.total_spent));
        clients.truncate(limit);
        Ok(clients)
    }

    async fn count_clients_created_since(&self, since: DateTime<Utc>) -> Result<usize> {
        Ok(self
            .clients
            .read()
            .await
            .values()
            .filter(|c| c.created_at >= since)
            .count())
    }

    async fn update_client(&self, client: &Client) -> Result<()> {
        let mut clients = self.clients.write().await;
        let existing = clients
            .get_mut(&client.id)
            .ok_or_else(|| anyhow!("Client {} not found", client.id))?;
        existing.name = client.name.clone();
        existing.email = client.email.clone();
        existing.phone = client.phone.clone();
        existing.id_type = client.id_type;
        existing.id_number = client.id_number.clone();
        existing.address = client.address.clone();
        existing.company = client.company.clone();
        existing.occupation = client.occupation.clone();
        existing.birthday = client.birthday;
        existing.notes = client.notes.clone();
        existing.tags = client.tags.clone();
        existing.updated_at = client.updated_at;
        Ok(())
    }

    async fn delete_client(&self, id: Uuid) -> Result<bool> {
        let removed = self.clients.write().await.remove(&id).is_some();
        if removed {
            self.interactions.write().await.retain(|i| i.client_id != id);
            for task in self.tasks.write().await.values_mut() {
                if task.client_id == Some(id) {
                    task.client_id = None;
                }
            }
        }
        Ok(removed)
    }

    async fn set_client_stage(
        &self,
        id: Uuid,
        stage_id: Option<Uuid>,
        entered_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        if let Some(client) = self.clients.write().await.get_mut(&id) {
            client.stage_id = stage_id;
            client.stage_entered_at = entered_at;
            client.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_client_scores(
        &self,
        id: Uuid,
        churn_risk: f64,
        loyalty_score: i64,
    ) -> Result<()> {
        if let Some(client) = self.clients.write().await.get_mut(&id) {
            client.churn_risk = Some(churn_risk);
            client.loyalty_score = Some(loyalty_score);
        }
        Ok(())
    }

    // ========================================================================
    // Stages
    // ========================================================================

    async fn list_stages(&self) -> Result<Vec<StageWithCount>> {
        let clients = self.clients.read().await;
        let mut stages: Vec<StageWithCount> = self
            .stages
            .read()
            .await
            .values()
            .map(|s| StageWithCount {
                stage: s.clone(),
                client_count: clients.values().filter(|c| c.stage_id == Some(s.id)).count(),
            })
            .collect();
        stages.sort_by_key(|s| (s.stage.order, s.stage.created_at));
        Ok(stages)
    }

    async fn get_stage(&self, id: Uuid) -> Result<Option<Stage>> {
        Ok(self.stages.read().await.get(&id).cloned())
    }

    async fn find_stage_by_name(&self, name: &str) -> Result<Option<Stage>> {
        let name = name.trim();
        Ok(self
            .stages
            .read()
            .await
            .values()
            .find(|s| s.name == name)
            .cloned())
    }

    async fn create_stage(&self, stage: &Stage) -> Result<()> {
        let mut stages = self.stages.write().await;
        if stages.values().any(|s| s.name == stage.name) {
            return Err(anyhow!("UNIQUE constraint failed: stages.name"));
        }
        stages.insert(stage.id, stage.clone());
        Ok(())
    }

    async fn update_stage(&self, stage: &Stage) -> Result<()> {
        self.stages.write().await.insert(stage.id, stage.clone());
        Ok(())
    }

    async fn delete_stage(&self, id: Uuid) -> Result<bool> {
        let removed = self.stages.write().await.remove(&id).is_some();
        if removed {
            for client in self.clients.write().await.values_mut() {
                if client.stage_id == Some(id) {
                    client.stage_id = None;
                    client.stage_entered_at = None;
                }
            }
            for task in self.tasks.write().await.values_mut() {
                if task.stage_id == Some(id) {
                    task.stage_id = None;
                }
            }
        }
        Ok(removed)
    }

    async fn max_stage_order(&self) -> Result<Option<i64>> {
        Ok(self.stages.read().await.values().map(|s| s.order).max())
    }

    async fn reorder_stages(&self, ids: &[Uuid]) -> Result<()> {
        let mut stages = self.stages.write().await;
        for (index, id) in ids.iter().enumerate() {
            if let Some(stage) = stages.get_mut(id) {
                stage.order = index as i64;
            }
        }
        Ok(())
    }

    async fn count_clients_in_stage(&self, stage_id: Uuid) -> Result<usize> {
        Ok(self
            .clients
            .read()
            .await
            .values()
            .filter(|c| c.stage_id == Some(stage_id))
            .count())
    }

    // ========================================================================
    // Interactions
    // ========================================================================

    async fn record_interaction(&self, interaction: &Interaction) -> Result<()> {
        let mut clients = self.clients.write().await;
        let client = clients
            .get_mut(&interaction.client_id)
            .ok_or_else(|| anyhow!("FOREIGN KEY constraint failed"))?;

        let mut interactions = self.interactions.write().await;
        interactions.push(interaction.clone());

        let bump_last_visit = |client: &mut Client| {
            if client.last_visit.is_none_or(|lv| lv < interaction.date) {
                client.last_visit = Some(interaction.date);
            }
        };

        if let Some(amount) = interaction.sale_amount() {
            let sales: Vec<f64> = interactions
                .iter()
                .filter(|i| i.client_id == client.id)
                .filter_map(Interaction::sale_amount)
                .collect();
            client.total_spent += amount;
            client.visit_count += 1;
            client.average_spent = sales.iter().sum::<f64>() / sales.len() as f64;
            bump_last_visit(client);
        } else if interaction.kind == InteractionType::Visit {
            client.visit_count += 1;
            bump_last_visit(client);
        }
        Ok(())
    }

    async fn list_client_interactions(
        &self,
        client_id: Uuid,
        kind: Option<InteractionType>,
        limit: usize,
    ) -> Result<Vec<Interaction>> {
        let mut found: Vec<Interaction> = self
            .interactions
            .read()
            .await
            .iter()
            .filter(|i| i.client_id == client_id)
            .filter(|i| kind.is_none_or(|k| i.kind == k))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.date.cmp(&a.date));
        found.truncate(limit);
        Ok(found)
    }

    async fn list_interactions_since(&self, since: DateTime<Utc>) -> Result<Vec<Interaction>> {
        let mut found: Vec<Interaction> = self
            .interactions
            .read()
            .await
            .iter()
            .filter(|i| i.date >= since)
            .cloned()
            .collect();
        found.sort_by_key(|i| i.date);
        Ok(found)
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    async fn create_task(&self, task: &Task) -> Result<()> {
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn get_task_details(&self, id: Uuid) -> Result<Option<TaskDetails>> {
        let task = self.tasks.read().await.get(&id).cloned();
        match task {
            Some(task) => Ok(Some(self.resolve_task(task).await)),
            None => Ok(None),
        }
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<TaskDetails>> {
        let mut tasks: Vec<Task> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| filter.client_id.is_none_or(|c| t.client_id == Some(c)))
            .filter(|t| filter.stage_id.is_none_or(|s| t.stage_id == Some(s)))
            .filter(|t| filter.completed.is_none_or(|c| t.completed == c))
            .filter(|t| match filter.scope {
                Some(TaskScope::Client) => t.client_id.is_some(),
                Some(TaskScope::Template) => t.client_id.is_none(),
                None => true,
            })
            .cloned()
            .collect();

        tasks.sort_by(|a, b| {
            a.completed
                .cmp(&b.completed)
                .then(b.priority.rank().cmp(&a.priority.rank()))
                .then(match (a.due_date, b.due_date) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                })
                .then(b.created_at.cmp(&a.created_at))
        });

        let mut details = Vec::with_capacity(tasks.len());
        for task in tasks {
            details.push(self.resolve_task(task).await);
        }
        Ok(details)
    }

    async fn update_task(&self, task: &Task) -> Result<()> {
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn delete_task(&self, id: Uuid) -> Result<bool> {
        Ok(self.tasks.write().await.remove(&id).is_some())
    }

    async fn set_tasks_completed(
        &self,
        ids: &[Uuid],
        completed: bool,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<usize> {
        let mut tasks = self.tasks.write().await;
        let mut updated = 0;
        for id in ids {
            if let Some(task) = tasks.get_mut(id) {
                task.completed = completed;
                task.completed_at = completed.then_some(at);
                if notes.is_some() {
                    task.notes = notes.clone();
                }
                task.updated_at = at;
                updated += 1;
            }
        }
        Ok(updated)
    }

    // ========================================================================
    // Insights
    // ========================================================================

    async fn save_insight(&self, insight: &Insight) -> Result<()> {
        self.insights.write().await.push(insight.clone());
        Ok(())
    }

    async fn list_insights(
        &self,
        kind: Option<InsightType>,
        limit: usize,
    ) -> Result<Vec<Insight>> {
        let mut found: Vec<Insight> = self
            .insights
            .read()
            .await
            .iter()
            .filter(|i| kind.is_none_or(|k| i.kind == k))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found.truncate(limit);
        Ok(found)
    }
}
