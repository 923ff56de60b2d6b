//! CRM operations: clients, interactions, stages, pipeline moves and tasks

use super::models::*;
use super::pipeline::StageTier;
use super::seed::default_stages;
use super::validation::{self, clean, FieldError, STAGE_NAME_MAX};
use crate::store::models::*;
use crate::store::CrmStore;
use chrono::{NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

/// Outcome of a rejected CRM operation
#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    #[error("Validation failed")]
    Validation(Vec<FieldError>),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub type CrmResult<T> = std::result::Result<T, CrmError>;

const RECENT_INTERACTIONS: usize = 10;
const INTERACTION_PAGE: usize = 50;
const STAGE_HISTORY_LIMIT: usize = 20;

fn invalid(field: &str, message: &str) -> CrmError {
    CrmError::Validation(vec![FieldError::new(field, message)])
}

fn parse_id_type(value: Option<String>) -> CrmResult<Option<IdType>> {
    clean(value)
        .map(|v| {
            v.parse::<IdType>()
                .map_err(|_| invalid("id_type", "id_type must be cedula, pasaporte or dimex"))
        })
        .transpose()
}

fn parse_birthday(value: Option<String>) -> CrmResult<Option<NaiveDate>> {
    clean(value)
        .map(|v| {
            let date_part = v.get(..10).unwrap_or(&v);
            NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
                .map_err(|_| invalid("birthday", "birthday must be a date (YYYY-MM-DD)"))
        })
        .transpose()
}

/// Trim, drop blanks and case-insensitive duplicates, keep first spelling
fn clean_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.to_lowercase()))
        .collect()
}

/// Canonical display form for phone and cédula
fn normalize_contact(client: &mut Client) {
    if let Some(phone) = client.phone.as_deref() {
        client.phone = Some(validation::format_phone(phone));
    }
    if client.id_type == Some(IdType::Cedula) {
        if let Some(number) = client.id_number.as_deref() {
            client.id_number = Some(validation::format_cedula(number));
        }
    }
}

fn stage_name(name: Option<String>) -> CrmResult<String> {
    let name = clean(name).ok_or_else(|| CrmError::BadRequest("Stage name is required".into()))?;
    if name.chars().count() > STAGE_NAME_MAX {
        return Err(CrmError::BadRequest(format!(
            "Stage name cannot exceed {} characters",
            STAGE_NAME_MAX
        )));
    }
    Ok(name)
}

/// Manager for CRM operations
pub struct CrmManager {
    store: Arc<dyn CrmStore>,
}

impl CrmManager {
    /// Create a new CRM manager
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self { store }
    }

    async fn require_client(&self, id: Uuid) -> CrmResult<Client> {
        self.store
            .get_client(id)
            .await?
            .ok_or_else(|| CrmError::NotFound("Client not found".into()))
    }

    async fn require_stage(&self, id: Uuid) -> CrmResult<Stage> {
        self.store
            .get_stage(id)
            .await?
            .ok_or_else(|| CrmError::NotFound("Stage not found".into()))
    }

    /// Log a pipeline interaction; the move itself already succeeded, so a
    /// failure here is only reported
    async fn log_pipeline_event(&self, client_id: Uuid, kind: InteractionType, notes: String) {
        let interaction = Interaction::new(client_id, kind, Some(notes));
        if let Err(e) = self.store.record_interaction(&interaction).await {
            tracing::warn!(%client_id, "Failed to record {} interaction: {}", kind, e);
        }
    }

    // ========================================================================
    // Clients
    // ========================================================================

    /// List clients with filters and pagination
    pub async fn list_clients(&self, filter: &ClientFilter) -> CrmResult<(Vec<Client>, usize)> {
        Ok(self.store.list_clients(filter).await?)
    }

    /// Validate and create a client with zeroed aggregates
    pub async fn create_client(&self, req: CreateClientRequest) -> CrmResult<Client> {
        let name = clean(req.name).ok_or_else(|| invalid("name", "name is required"))?;

        let mut client = Client::new(name);
        client.email = clean(req.email).map(|e| e.to_lowercase());
        client.phone = clean(req.phone);
        client.id_type = parse_id_type(req.id_type)?;
        client.id_number = clean(req.id_number);
        client.address = clean(req.address);
        client.company = clean(req.company);
        client.occupation = clean(req.occupation);
        client.birthday = parse_birthday(req.birthday)?;
        client.notes = clean(req.notes);
        client.tags = clean_tags(req.tags.unwrap_or_default());

        validation::validate_client(&client, Utc::now().date_naive())
            .map_err(CrmError::Validation)?;
        normalize_contact(&mut client);

        self.store.create_client(&client).await?;
        tracing::info!(client_id = %client.id, "Created client {}", client.name);
        Ok(client)
    }

    /// Client with its stage and the 10 most recent interactions
    pub async fn get_client_details(&self, id: Uuid) -> CrmResult<ClientDetails> {
        let client = self.require_client(id).await?;
        let stage = match client.stage_id {
            Some(stage_id) => self.store.get_stage(stage_id).await?,
            None => None,
        };
        let recent_interactions = self
            .store
            .list_client_interactions(id, None, RECENT_INTERACTIONS)
            .await?;

        Ok(ClientDetails {
            client,
            stage,
            recent_interactions,
        })
    }

    /// Apply a partial update and re-validate the merged record
    pub async fn update_client(&self, id: Uuid, req: UpdateClientRequest) -> CrmResult<Client> {
        let mut client = self.require_client(id).await?;

        if let Some(name) = req.name {
            client.name = name.trim().to_string();
        }
        if let Some(email) = req.email {
            client.email = clean(Some(email)).map(|e| e.to_lowercase());
        }
        if let Some(phone) = req.phone {
            client.phone = clean(Some(phone));
        }
        if let Some(id_type) = req.id_type {
            client.id_type = parse_id_type(Some(id_type))?;
        }
        if let Some(id_number) = req.id_number {
            client.id_number = clean(Some(id_number));
        }
        if let Some(address) = req.address {
            client.address = clean(Some(address));
        }
        if let Some(company) = req.company {
            client.company = clean(Some(company));
        }
        if let Some(occupation) = req.occupation {
            client.occupation = clean(Some(occupation));
        }
        if let Some(birthday) = req.birthday {
            client.birthday = parse_birthday(Some(birthday))?;
        }
        if let Some(notes) = req.notes {
            client.notes = clean(Some(notes));
        }
        if let Some(tags) = req.tags {
            client.tags = clean_tags(tags);
        }

        validation::validate_client(&client, Utc::now().date_naive())
            .map_err(CrmError::Validation)?;
        normalize_contact(&mut client);
        client.updated_at = Utc::now();

        self.store.update_client(&client).await?;
        Ok(client)
    }

    /// Delete a client together with its interaction log
    pub async fn delete_client(&self, id: Uuid) -> CrmResult<()> {
        if !self.store.delete_client(id).await? {
            return Err(CrmError::NotFound("Client not found".into()));
        }
        tracing::info!(client_id = %id, "Deleted client");
        Ok(())
    }

    /// Latest 50 interactions of a client
    pub async fn client_interactions(&self, id: Uuid) -> CrmResult<Vec<Interaction>> {
        self.require_client(id).await?;
        Ok(self
            .store
            .list_client_interactions(id, None, INTERACTION_PAGE)
            .await?)
    }

    /// Latest 20 stage changes of a client
    pub async fn stage_history(&self, id: Uuid) -> CrmResult<Vec<Interaction>> {
        self.require_client(id).await?;
        Ok(self
            .store
            .list_client_interactions(id, Some(InteractionType::StageChange), STAGE_HISTORY_LIMIT)
            .await?)
    }

    // ========================================================================
    // Interactions
    // ========================================================================

    /// Log an interaction and update the client's aggregates
    pub async fn record_interaction(&self, req: CreateInteractionRequest) -> CrmResult<Interaction> {
        let (client_id, kind) = match (req.client_id, req.kind) {
            (Some(client_id), Some(kind)) => (client_id, kind),
            _ => {
                return Err(CrmError::BadRequest(
                    "client_id and type are required".into(),
                ))
            }
        };
        let kind: InteractionType = kind
            .parse()
            .map_err(|_| CrmError::BadRequest(format!("Invalid interaction type: {}", kind)))?;

        if let Some(amount) = req.amount {
            if !amount.is_finite() || amount < 0.0 {
                return Err(invalid("amount", "amount must be a non-negative number"));
            }
        }

        self.require_client(client_id).await?;

        let interaction = Interaction {
            id: Uuid::new_v4(),
            client_id,
            kind,
            amount: req.amount,
            notes: clean(req.notes),
            date: req.date.unwrap_or_else(Utc::now),
        };
        self.store.record_interaction(&interaction).await?;

        tracing::debug!(%client_id, "Recorded {} interaction", kind);
        Ok(interaction)
    }

    /// Latest 50 interactions for `client_id`
    pub async fn list_interactions(&self, client_id: Option<Uuid>) -> CrmResult<Vec<Interaction>> {
        let client_id =
            client_id.ok_or_else(|| CrmError::BadRequest("client_id is required".into()))?;
        Ok(self
            .store
            .list_client_interactions(client_id, None, INTERACTION_PAGE)
            .await?)
    }

    // ========================================================================
    // Stages
    // ========================================================================

    /// Ordered stages with the clients currently in each
    pub async fn stage_board(&self) -> CrmResult<Vec<PipelineStage>> {
        let stages = self.store.list_stages().await?;
        let now = Utc::now();

        let mut by_stage: HashMap<Uuid, Vec<PipelineClient>> = HashMap::new();
        for client in self.store.clients_in_pipeline().await? {
            if let Some(stage_id) = client.stage_id {
                by_stage
                    .entry(stage_id)
                    .or_default()
                    .push(PipelineClient::from_client(&client, now));
            }
        }

        Ok(stages
            .into_iter()
            .map(|s| PipelineStage {
                clients: by_stage.remove(&s.stage.id).unwrap_or_default(),
                client_count: s.client_count,
                stage: s.stage,
            })
            .collect())
    }

    /// Create a stage at the end of the pipeline
    pub async fn create_stage(&self, req: StageRequest) -> CrmResult<Stage> {
        let name = stage_name(req.name)?;
        if self.store.find_stage_by_name(&name).await?.is_some() {
            return Err(CrmError::BadRequest(
                "A stage with this name already exists".into(),
            ));
        }

        let now = Utc::now();
        let stage = Stage {
            id: Uuid::new_v4(),
            name,
            description: clean(req.description),
            color: clean(req.color).unwrap_or_else(|| DEFAULT_STAGE_COLOR.to_string()),
            order: self.store.max_stage_order().await?.map_or(1, |max| max + 1),
            is_default: false,
            created_at: now,
            updated_at: now,
        };
        self.store.create_stage(&stage).await?;
        tracing::info!(stage_id = %stage.id, "Created stage {}", stage.name);
        Ok(stage)
    }

    /// Reorder stages to match the given sequence
    pub async fn reorder_stages(&self, req: ReorderStagesRequest) -> CrmResult<Vec<StageWithCount>> {
        let items = req
            .stages
            .ok_or_else(|| CrmError::BadRequest("stages array is required".into()))?;
        let ids: Vec<Uuid> = items.into_iter().map(|i| i.id).collect();

        for id in &ids {
            if self.store.get_stage(*id).await?.is_none() {
                return Err(CrmError::NotFound(format!("Stage {} not found", id)));
            }
        }

        self.store.reorder_stages(&ids).await?;
        Ok(self.store.list_stages().await?)
    }

    /// Rename / recolor a stage
    pub async fn update_stage(&self, id: Uuid, req: StageRequest) -> CrmResult<Stage> {
        let name = stage_name(req.name)?;
        let mut stage = self.require_stage(id).await?;

        if let Some(other) = self.store.find_stage_by_name(&name).await? {
            if other.id != id {
                return Err(CrmError::BadRequest(
                    "A stage with this name already exists".into(),
                ));
            }
        }

        stage.name = name;
        stage.description = clean(req.description);
        if let Some(color) = clean(req.color) {
            stage.color = color;
        }
        stage.updated_at = Utc::now();

        self.store.update_stage(&stage).await?;
        Ok(stage)
    }

    /// Delete an empty, non-default stage
    pub async fn delete_stage(&self, id: Uuid) -> CrmResult<()> {
        let stage = self.require_stage(id).await?;
        if stage.is_default {
            return Err(CrmError::BadRequest(
                "Default stages cannot be deleted".into(),
            ));
        }

        let clients = self.store.count_clients_in_stage(id).await?;
        if clients > 0 {
            return Err(CrmError::BadRequest(format!(
                "Cannot delete a stage that still has {} client(s)",
                clients
            )));
        }

        self.store.delete_stage(id).await?;
        tracing::info!(stage_id = %id, "Deleted stage {}", stage.name);
        Ok(())
    }

    /// Create the default funnel unless stages already exist
    pub async fn seed_default_stages(&self) -> CrmResult<SeedStagesResponse> {
        let existing = self.store.list_stages().await?;
        if !existing.is_empty() {
            return Ok(SeedStagesResponse {
                message: format!("{} stages already exist", existing.len()),
                existing: true,
                stages: existing.into_iter().map(|s| s.stage).collect(),
            });
        }

        let stages = default_stages();
        for stage in &stages {
            self.store.create_stage(stage).await?;
        }
        tracing::info!("Seeded {} default stages", stages.len());

        Ok(SeedStagesResponse {
            message: format!("Created {} default stages", stages.len()),
            existing: false,
            stages,
        })
    }

    // ========================================================================
    // Pipeline
    // ========================================================================

    /// Move a client to another stage and log the change
    pub async fn move_client(&self, req: MoveStageRequest) -> CrmResult<MoveStageResponse> {
        let (client_id, stage_id) = match (req.client_id, req.new_stage_id) {
            (Some(c), Some(s)) => (c, s),
            _ => {
                return Err(CrmError::BadRequest(
                    "client_id and new_stage_id are required".into(),
                ))
            }
        };

        let mut client = self.require_client(client_id).await?;
        let target = self.require_stage(stage_id).await?;

        if client.stage_id == Some(stage_id) {
            return Ok(MoveStageResponse {
                success: true,
                message: format!("{} is already in {}", client.name, target.name),
                client,
                from_stage: Some(target.name.clone()),
                to_stage: Some(target.name),
            });
        }

        let from_stage = match client.stage_id {
            Some(id) => self.store.get_stage(id).await?.map(|s| s.name),
            None => None,
        };

        let now = Utc::now();
        self.store
            .set_client_stage(client_id, Some(stage_id), Some(now))
            .await?;
        client.stage_id = Some(stage_id);
        client.stage_entered_at = Some(now);
        client.updated_at = now;

        let mut notes = format!(
            "Moved from {} to {}",
            from_stage.as_deref().unwrap_or("no stage"),
            target.name
        );
        if let Some(extra) = clean(req.notes) {
            notes.push_str(": ");
            notes.push_str(&extra);
        }
        self.log_pipeline_event(client_id, InteractionType::StageChange, notes)
            .await;

        tracing::info!(%client_id, "Moved client to stage {}", target.name);
        Ok(MoveStageResponse {
            success: true,
            message: format!("{} moved to {}", client.name, target.name),
            client,
            from_stage,
            to_stage: Some(target.name),
        })
    }

    /// Put clients that are not in the pipeline yet into a stage
    pub async fn add_to_pipeline(
        &self,
        req: AddToPipelineRequest,
    ) -> CrmResult<AddToPipelineResponse> {
        let requested = req
            .client_ids
            .filter(|ids| !ids.is_empty())
            .ok_or_else(|| CrmError::BadRequest("client_ids must be a non-empty array".into()))?;
        let stage_id = req
            .stage_id
            .ok_or_else(|| CrmError::BadRequest("stage_id is required".into()))?;

        let mut seen = HashSet::new();
        let ids: Vec<Uuid> = requested.into_iter().filter(|id| seen.insert(*id)).collect();

        let stage = self.require_stage(stage_id).await?;
        let clients = self.store.get_clients(&ids).await?;
        if clients.len() != ids.len() {
            return Err(CrmError::BadRequest(format!(
                "{} client(s) not found",
                ids.len() - clients.len()
            )));
        }

        let (already_in, to_add): (Vec<Client>, Vec<Client>) =
            clients.into_iter().partition(|c| c.stage_id.is_some());

        if to_add.is_empty() {
            return Err(CrmError::BadRequest(format!(
                "All {} selected client(s) are already in the pipeline",
                already_in.len()
            )));
        }

        let now = Utc::now();
        let mut added_clients = Vec::with_capacity(to_add.len());
        for client in &to_add {
            self.store
                .set_client_stage(client.id, Some(stage_id), Some(now))
                .await?;
            self.log_pipeline_event(
                client.id,
                InteractionType::PipelineAction,
                format!("Added to pipeline in stage {}", stage.name),
            )
            .await;
            added_clients.push(ClientRef {
                id: client.id,
                name: client.name.clone(),
            });
        }

        let skipped_clients: Vec<SkippedClient> = already_in
            .into_iter()
            .map(|c| SkippedClient {
                id: c.id,
                name: c.name,
                current_stage_id: c.stage_id,
            })
            .collect();

        let mut message = format!("{} client(s) added to {}", added_clients.len(), stage.name);
        if !skipped_clients.is_empty() {
            message.push_str(&format!(
                " ({} already in the pipeline)",
                skipped_clients.len()
            ));
        }

        tracing::info!(stage_id = %stage_id, "{}", message);
        Ok(AddToPipelineResponse {
            success: true,
            message,
            added_count: added_clients.len(),
            skipped_count: skipped_clients.len(),
            added_clients,
            skipped_clients,
        })
    }

    /// Take a client out of the pipeline
    pub async fn remove_from_pipeline(
        &self,
        req: RemoveFromPipelineRequest,
    ) -> CrmResult<RemoveFromPipelineResponse> {
        let client_id = req
            .client_id
            .ok_or_else(|| CrmError::BadRequest("client_id is required".into()))?;
        let mut client = self.require_client(client_id).await?;

        let Some(old_stage_id) = client.stage_id else {
            return Ok(RemoveFromPipelineResponse {
                success: true,
                message: format!("{} is not in the pipeline", client.name),
                client,
            });
        };

        let old_stage = self
            .store
            .get_stage(old_stage_id)
            .await?
            .map(|s| s.name)
            .unwrap_or_else(|| "unknown stage".to_string());

        self.store.set_client_stage(client_id, None, None).await?;
        client.stage_id = None;
        client.stage_entered_at = None;
        client.updated_at = Utc::now();

        self.log_pipeline_event(
            client_id,
            InteractionType::StageChange,
            format!("Removed from pipeline (was in {})", old_stage),
        )
        .await;

        Ok(RemoveFromPipelineResponse {
            success: true,
            message: format!("{} removed from the pipeline", client.name),
            client,
        })
    }

    /// Place every client without a stage according to its tier
    pub async fn assign_stages(&self) -> CrmResult<AssignStagesResponse> {
        let stages: Vec<Stage> = self
            .store
            .list_stages()
            .await?
            .into_iter()
            .map(|s| s.stage)
            .collect();
        if stages.is_empty() {
            return Err(CrmError::BadRequest(
                "No stages exist; create stages first".into(),
            ));
        }

        let unassigned: Vec<Client> = self
            .store
            .all_clients()
            .await?
            .into_iter()
            .filter(|c| c.stage_id.is_none())
            .collect();

        let now = Utc::now();
        let mut assignments = Vec::with_capacity(unassigned.len());
        for client in unassigned {
            let Some(stage) = StageTier::for_client(&client).resolve(&stages) else {
                continue;
            };
            self.store
                .set_client_stage(client.id, Some(stage.id), Some(now))
                .await?;
            assignments.push(StageAssignment {
                client_id: client.id,
                client_name: client.name,
                stage_id: stage.id,
                stage_name: stage.name.clone(),
            });
        }

        let stage_counts = self
            .store
            .list_stages()
            .await?
            .into_iter()
            .map(|s| StageCount {
                stage: s.stage.name,
                count: s.client_count,
            })
            .collect();

        tracing::info!("Assigned {} client(s) to stages", assignments.len());
        Ok(AssignStagesResponse {
            message: format!("{} client(s) assigned to stages", assignments.len()),
            assignments,
            stage_counts,
        })
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    /// Filtered task listing
    pub async fn list_tasks(&self, filter: &TaskFilter) -> CrmResult<Vec<TaskDetails>> {
        Ok(self.store.list_tasks(filter).await?)
    }

    /// Create a task, checking that its client and stage exist
    pub async fn create_task(&self, req: CreateTaskRequest) -> CrmResult<TaskDetails> {
        let title =
            clean(req.title).ok_or_else(|| CrmError::BadRequest("Task title is required".into()))?;

        let client = match req.client_id {
            Some(id) => Some(self.require_client(id).await?),
            None => None,
        };
        let stage = match req.stage_id {
            Some(id) => Some(self.require_stage(id).await?),
            None => None,
        };

        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            title,
            description: clean(req.description),
            client_id: req.client_id,
            stage_id: req.stage_id,
            due_date: req.due_date,
            priority: req.priority.unwrap_or_default(),
            kind: req.kind.unwrap_or_default(),
            completed: false,
            completed_at: None,
            notes: clean(req.notes),
            created_at: now,
            updated_at: now,
        };
        self.store.create_task(&task).await?;

        Ok(TaskDetails {
            task,
            client: client.map(|c| ClientRef {
                id: c.id,
                name: c.name,
            }),
            stage: stage.map(|s| StageRef {
                id: s.id,
                name: s.name,
                color: s.color,
            }),
        })
    }

    /// Mark several tasks (un)completed at once
    pub async fn bulk_complete(&self, req: BulkCompleteRequest) -> CrmResult<BulkCompleteResponse> {
        let ids = req
            .task_ids
            .filter(|ids| !ids.is_empty())
            .ok_or_else(|| CrmError::BadRequest("task_ids must be a non-empty array".into()))?;

        let updated_count = self
            .store
            .set_tasks_completed(
                &ids,
                req.completed.unwrap_or(true),
                clean(req.notes),
                Utc::now(),
            )
            .await?;

        Ok(BulkCompleteResponse {
            success: true,
            updated_count,
        })
    }

    /// Get a task with its client and stage
    pub async fn get_task(&self, id: Uuid) -> CrmResult<TaskDetails> {
        self.store
            .get_task_details(id)
            .await?
            .ok_or_else(|| CrmError::NotFound("Task not found".into()))
    }

    /// Partial task update; toggling `completed` maintains `completed_at`
    pub async fn update_task(&self, id: Uuid, req: UpdateTaskRequest) -> CrmResult<TaskDetails> {
        let mut task = self
            .store
            .get_task(id)
            .await?
            .ok_or_else(|| CrmError::NotFound("Task not found".into()))?;
        let now = Utc::now();

        if let Some(title) = req.title {
            task.title = clean(Some(title))
                .ok_or_else(|| CrmError::BadRequest("Task title cannot be empty".into()))?;
        }
        if let Some(description) = req.description {
            task.description = clean(Some(description));
        }
        if let Some(due_date) = req.due_date {
            task.due_date = Some(due_date);
        }
        if let Some(priority) = req.priority {
            task.priority = priority;
        }
        if let Some(kind) = req.kind {
            task.kind = kind;
        }
        if let Some(notes) = req.notes {
            task.notes = clean(Some(notes));
        }
        if let Some(completed) = req.completed {
            if completed && !task.completed {
                task.completed_at = Some(now);
            } else if !completed {
                task.completed_at = None;
            }
            task.completed = completed;
        }
        task.updated_at = now;

        self.store.update_task(&task).await?;
        self.get_task(id).await
    }

    /// Delete a task
    pub async fn delete_task(&self, id: Uuid) -> CrmResult<()> {
        if !self.store.delete_task(id).await? {
            return Err(CrmError::NotFound("Task not found".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mock::MockCrmStore;
    use crate::test_helpers::{test_client, test_stage};

    fn manager(store: MockCrmStore) -> (CrmManager, Arc<MockCrmStore>) {
        let store = Arc::new(store);
        (CrmManager::new(store.clone()), store)
    }

    // =========================================================================
    // Clients
    // =========================================================================

    #[tokio::test]
    async fn test_create_client_trims_and_formats() {
        let (mgr, _) = manager(MockCrmStore::new());
        let client = mgr
            .create_client(CreateClientRequest {
                name: Some("  Ana Solís  ".into()),
                email: Some("ANA@Correo.CR".into()),
                phone: Some("88887777".into()),
                id_type: Some("cedula".into()),
                id_number: Some("112345678".into()),
                tags: Some(vec!["vip".into(), " VIP ".into(), "".into(), "cafe".into()]),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(client.name, "Ana Solís");
        assert_eq!(client.email.as_deref(), Some("ana@correo.cr"));
        assert_eq!(client.phone.as_deref(), Some("8888-7777"));
        assert_eq!(client.id_number.as_deref(), Some("1-1234-5678"));
        assert_eq!(client.tags, vec!["vip", "cafe"]);
        assert_eq!(client.total_spent, 0.0);
        assert_eq!(client.visit_count, 0);
    }

    #[tokio::test]
    async fn test_create_client_requires_name() {
        let (mgr, _) = manager(MockCrmStore::new());
        let err = mgr
            .create_client(CreateClientRequest {
                name: Some("   ".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        match err {
            CrmError::Validation(errors) => assert_eq!(errors[0].field, "name"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_client_rejects_bad_birthday_format() {
        let (mgr, _) = manager(MockCrmStore::new());
        let err = mgr
            .create_client(CreateClientRequest {
                name: Some("Luis".into()),
                birthday: Some("15/04/1990".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::Validation(ref e) if e[0].field == "birthday"));
    }

    #[tokio::test]
    async fn test_update_client_merges_and_revalidates() {
        let client = test_client("Pedro Jiménez");
        let id = client.id;
        let (mgr, store) = manager(MockCrmStore::new().with_client(client).await);

        let updated = mgr
            .update_client(
                id,
                UpdateClientRequest {
                    company: Some("Café Central".into()),
                    notes: Some("   ".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.company.as_deref(), Some("Café Central"));
        assert_eq!(updated.notes, None);
        assert_eq!(updated.name, "Pedro Jiménez");

        let err = mgr
            .update_client(
                id,
                UpdateClientRequest {
                    phone: Some("123".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::Validation(_)));
        let stored = store.get_client(id).await.unwrap().unwrap();
        assert_eq!(stored.phone, None);
    }

    #[tokio::test]
    async fn test_get_unknown_client_is_not_found() {
        let (mgr, _) = manager(MockCrmStore::new());
        let err = mgr.get_client_details(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, CrmError::NotFound(_)));
        let err = mgr.delete_client(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, CrmError::NotFound(_)));
    }

    // =========================================================================
    // Interactions
    // =========================================================================

    #[tokio::test]
    async fn test_record_purchase_updates_aggregates() {
        let client = test_client("Sofía");
        let id = client.id;
        let (mgr, store) = manager(MockCrmStore::new().with_client(client).await);

        for amount in [5000.0, 15000.0] {
            mgr.record_interaction(CreateInteractionRequest {
                client_id: Some(id),
                kind: Some("purchase".into()),
                amount: Some(amount),
                ..Default::default()
            })
            .await
            .unwrap();
        }

        let stored = store.get_client(id).await.unwrap().unwrap();
        assert_eq!(stored.total_spent, 20000.0);
        assert_eq!(stored.visit_count, 2);
        assert_eq!(stored.average_spent, 10000.0);
        assert!(stored.last_visit.is_some());
    }

    #[tokio::test]
    async fn test_record_interaction_input_errors() {
        let client = test_client("Sofía");
        let id = client.id;
        let (mgr, _) = manager(MockCrmStore::new().with_client(client).await);

        let missing = mgr
            .record_interaction(CreateInteractionRequest {
                client_id: Some(id),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(missing, CrmError::BadRequest(_)));

        let bad_type = mgr
            .record_interaction(CreateInteractionRequest {
                client_id: Some(id),
                kind: Some("refund".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(bad_type, CrmError::BadRequest(_)));

        let negative = mgr
            .record_interaction(CreateInteractionRequest {
                client_id: Some(id),
                kind: Some("purchase".into()),
                amount: Some(-5.0),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(negative, CrmError::Validation(_)));

        let unknown = mgr
            .record_interaction(CreateInteractionRequest {
                client_id: Some(Uuid::new_v4()),
                kind: Some("visit".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(unknown, CrmError::NotFound(_)));
    }

    // =========================================================================
    // Stages
    // =========================================================================

    #[tokio::test]
    async fn test_create_stage_appends_and_rejects_duplicates() {
        let (mgr, _) = manager(MockCrmStore::new().with_stage(test_stage("Prospecto", 3)).await);

        let stage = mgr
            .create_stage(StageRequest {
                name: Some(" Seguimiento ".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(stage.name, "Seguimiento");
        assert_eq!(stage.order, 4);
        assert_eq!(stage.color, DEFAULT_STAGE_COLOR);
        assert!(!stage.is_default);

        let dup = mgr
            .create_stage(StageRequest {
                name: Some("Prospecto".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(dup, CrmError::BadRequest(_)));

        let long = mgr
            .create_stage(StageRequest {
                name: Some("x".repeat(51)),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(long, CrmError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_update_stage_keeps_color_and_allows_own_name() {
        let mut stage = test_stage("Interesado", 1);
        stage.color = "#F97316".into();
        let id = stage.id;
        let (mgr, _) = manager(MockCrmStore::new().with_stage(stage).await);

        let updated = mgr
            .update_stage(
                id,
                StageRequest {
                    name: Some("Interesado".into()),
                    description: Some("  Pidió cotización ".into()),
                    color: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.color, "#F97316");
        assert_eq!(updated.description.as_deref(), Some("Pidió cotización"));
    }

    #[tokio::test]
    async fn test_delete_stage_rules() {
        let mut default_stage = test_stage("Prospecto", 1);
        default_stage.is_default = true;
        let busy = test_stage("Negociando", 2);
        let empty = test_stage("Temporal", 3);
        let mut client = test_client("Mario");
        client.stage_id = Some(busy.id);

        let (default_id, busy_id, empty_id) = (default_stage.id, busy.id, empty.id);
        let store = MockCrmStore::new()
            .with_stage(default_stage)
            .await
            .with_stage(busy)
            .await
            .with_stage(empty)
            .await
            .with_client(client)
            .await;
        let (mgr, _) = manager(store);

        let err = mgr.delete_stage(default_id).await.unwrap_err();
        assert!(matches!(err, CrmError::BadRequest(ref m) if m.contains("Default")));
        let err = mgr.delete_stage(busy_id).await.unwrap_err();
        assert!(matches!(err, CrmError::BadRequest(ref m) if m.contains("1 client")));
        mgr.delete_stage(empty_id).await.unwrap();
        let err = mgr.delete_stage(empty_id).await.unwrap_err();
        assert!(matches!(err, CrmError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let (mgr, _) = manager(MockCrmStore::new());
        let first = mgr.seed_default_stages().await.unwrap();
        assert!(!first.existing);
        assert_eq!(first.stages.len(), 5);
        let second = mgr.seed_default_stages().await.unwrap();
        assert!(second.existing);
        assert_eq!(second.stages.len(), 5);
    }

    #[tokio::test]
    async fn test_reorder_unknown_stage() {
        let stage = test_stage("A", 1);
        let (mgr, _) = manager(MockCrmStore::new().with_stage(stage).await);
        let err = mgr
            .reorder_stages(ReorderStagesRequest {
                stages: Some(vec![StageOrderItem { id: Uuid::new_v4() }]),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::NotFound(_)));
        let err = mgr
            .reorder_stages(ReorderStagesRequest { stages: None })
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::BadRequest(_)));
    }

    // =========================================================================
    // Pipeline
    // =========================================================================

    #[tokio::test]
    async fn test_move_client_logs_stage_change() {
        let from = test_stage("Prospecto", 1);
        let to = test_stage("Interesado", 2);
        let mut client = test_client("Elena");
        client.stage_id = Some(from.id);
        let (client_id, to_id) = (client.id, to.id);

        let store = MockCrmStore::new()
            .with_stage(from)
            .await
            .with_stage(to)
            .await
            .with_client(client)
            .await;
        let (mgr, store) = manager(store);

        let resp = mgr
            .move_client(MoveStageRequest {
                client_id: Some(client_id),
                new_stage_id: Some(to_id),
                notes: Some("llamó".into()),
            })
            .await
            .unwrap();
        assert!(resp.success);
        assert_eq!(resp.from_stage.as_deref(), Some("Prospecto"));
        assert_eq!(resp.to_stage.as_deref(), Some("Interesado"));
        assert_eq!(resp.client.stage_id, Some(to_id));

        let history = mgr.stage_history(client_id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(
            history[0].notes.as_deref(),
            Some("Moved from Prospecto to Interesado: llamó")
        );
        let stored = store.get_client(client_id).await.unwrap().unwrap();
        assert!(stored.stage_entered_at.is_some());

        // Moving again to the same stage is a no-op
        let again = mgr
            .move_client(MoveStageRequest {
                client_id: Some(client_id),
                new_stage_id: Some(to_id),
                notes: None,
            })
            .await
            .unwrap();
        assert!(again.message.contains("already"));
        assert_eq!(mgr.stage_history(client_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_move_client_errors() {
        let stage = test_stage("A", 1);
        let stage_id = stage.id;
        let (mgr, _) = manager(MockCrmStore::new().with_stage(stage).await);

        let err = mgr
            .move_client(MoveStageRequest {
                client_id: None,
                new_stage_id: Some(stage_id),
                notes: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::BadRequest(_)));

        let err = mgr
            .move_client(MoveStageRequest {
                client_id: Some(Uuid::new_v4()),
                new_stage_id: Some(stage_id),
                notes: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::NotFound(ref m) if m.contains("Client")));
    }

    #[tokio::test]
    async fn test_add_to_pipeline_skips_clients_already_in() {
        let stage = test_stage("Prospecto", 1);
        let fresh = test_client("Nuevo");
        let mut placed = test_client("Ubicado");
        placed.stage_id = Some(stage.id);
        let (stage_id, fresh_id, placed_id) = (stage.id, fresh.id, placed.id);

        let store = MockCrmStore::new()
            .with_stage(stage)
            .await
            .with_client(fresh)
            .await
            .with_client(placed)
            .await;
        let (mgr, store) = manager(store);

        let resp = mgr
            .add_to_pipeline(AddToPipelineRequest {
                client_ids: Some(vec![fresh_id, placed_id, fresh_id]),
                stage_id: Some(stage_id),
            })
            .await
            .unwrap();
        assert_eq!(resp.added_count, 1);
        assert_eq!(resp.skipped_count, 1);
        assert_eq!(resp.added_clients[0].id, fresh_id);
        assert_eq!(resp.skipped_clients[0].current_stage_id, Some(stage_id));

        let actions = store
            .list_client_interactions(fresh_id, Some(InteractionType::PipelineAction), 10)
            .await
            .unwrap();
        assert_eq!(actions.len(), 1);

        let err = mgr
            .add_to_pipeline(AddToPipelineRequest {
                client_ids: Some(vec![fresh_id, placed_id]),
                stage_id: Some(stage_id),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::BadRequest(ref m) if m.contains("All 2")));

        let err = mgr
            .add_to_pipeline(AddToPipelineRequest {
                client_ids: Some(vec![Uuid::new_v4()]),
                stage_id: Some(stage_id),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::BadRequest(ref m) if m.contains("not found")));

        let err = mgr
            .add_to_pipeline(AddToPipelineRequest {
                client_ids: Some(vec![]),
                stage_id: Some(stage_id),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_remove_from_pipeline() {
        let stage = test_stage("Negociando", 1);
        let mut client = test_client("Raúl");
        client.stage_id = Some(stage.id);
        client.stage_entered_at = Some(Utc::now());
        let client_id = client.id;
        let store = MockCrmStore::new()
            .with_stage(stage)
            .await
            .with_client(client)
            .await;
        let (mgr, _) = manager(store);

        let resp = mgr
            .remove_from_pipeline(RemoveFromPipelineRequest {
                client_id: Some(client_id),
            })
            .await
            .unwrap();
        assert_eq!(resp.client.stage_id, None);
        assert_eq!(resp.client.stage_entered_at, None);

        let history = mgr.stage_history(client_id).await.unwrap();
        assert_eq!(
            history[0].notes.as_deref(),
            Some("Removed from pipeline (was in Negociando)")
        );
    }

    #[tokio::test]
    async fn test_assign_stages_by_tier() {
        let stages = [
            test_stage("Prospecto", 1),
            test_stage("Cliente Nuevo", 2),
            test_stage("Cliente Regular", 3),
            test_stage("Cliente VIP", 4),
        ];
        let mut prospect = test_client("Sin visitas");
        prospect.visit_count = 0;
        let mut regular = test_client("Regular");
        regular.visit_count = 8;
        let mut vip = test_client("Oro");
        vip.visit_count = 2;
        vip.tags = vec!["cliente oro".into()];

        let mut store = MockCrmStore::new();
        for s in stages {
            store = store.with_stage(s).await;
        }
        for c in [prospect, regular, vip] {
            store = store.with_client(c).await;
        }
        let (mgr, _) = manager(store);

        let resp = mgr.assign_stages().await.unwrap();
        assert_eq!(resp.assignments.len(), 3);
        let by_name: HashMap<&str, &str> = resp
            .assignments
            .iter()
            .map(|a| (a.client_name.as_str(), a.stage_name.as_str()))
            .collect();
        assert_eq!(by_name["Sin visitas"], "Prospecto");
        assert_eq!(by_name["Regular"], "Cliente Regular");
        assert_eq!(by_name["Oro"], "Cliente VIP");

        let vip_count = resp
            .stage_counts
            .iter()
            .find(|c| c.stage == "Cliente VIP")
            .unwrap();
        assert_eq!(vip_count.count, 1);
    }

    #[tokio::test]
    async fn test_assign_stages_without_stages() {
        let (mgr, _) = manager(MockCrmStore::new());
        assert!(matches!(
            mgr.assign_stages().await.unwrap_err(),
            CrmError::BadRequest(_)
        ));
    }

    // =========================================================================
    // Tasks
    // =========================================================================

    #[tokio::test]
    async fn test_create_task_defaults_and_references() {
        let client = test_client("Karla");
        let client_id = client.id;
        let (mgr, _) = manager(MockCrmStore::new().with_client(client).await);

        let task = mgr
            .create_task(CreateTaskRequest {
                title: Some(" Enviar cotización ".into()),
                client_id: Some(client_id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(task.task.title, "Enviar cotización");
        assert_eq!(task.task.priority, TaskPriority::Medium);
        assert_eq!(task.task.kind, TaskKind::Manual);
        assert_eq!(task.client.unwrap().name, "Karla");

        let err = mgr
            .create_task(CreateTaskRequest {
                title: Some("x".into()),
                stage_id: Some(Uuid::new_v4()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::NotFound(_)));

        let err = mgr
            .create_task(CreateTaskRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_update_task_toggles_completed_at() {
        let (mgr, _) = manager(MockCrmStore::new());
        let created = mgr
            .create_task(CreateTaskRequest {
                title: Some("Llamar".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        let id = created.task.id;

        let done = mgr
            .update_task(
                id,
                UpdateTaskRequest {
                    completed: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(done.task.completed);
        assert!(done.task.completed_at.is_some());

        let reopened = mgr
            .update_task(
                id,
                UpdateTaskRequest {
                    completed: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!reopened.task.completed);
        assert!(reopened.task.completed_at.is_none());

        let err = mgr
            .update_task(
                id,
                UpdateTaskRequest {
                    title: Some("  ".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_bulk_complete() {
        let (mgr, _) = manager(MockCrmStore::new());
        let a = mgr
            .create_task(CreateTaskRequest {
                title: Some("A".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        let resp = mgr
            .bulk_complete(BulkCompleteRequest {
                task_ids: Some(vec![a.task.id, Uuid::new_v4()]),
                completed: None,
                notes: Some("listo".into()),
            })
            .await
            .unwrap();
        assert_eq!(resp.updated_count, 1);
        let stored = mgr.get_task(a.task.id).await.unwrap();
        assert!(stored.task.completed);
        assert_eq!(stored.task.notes.as_deref(), Some("listo"));

        let err = mgr
            .bulk_complete(BulkCompleteRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::BadRequest(_)));
    }
}
