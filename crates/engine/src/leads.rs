//! Lead service: the CRM flows that raise notifications.
//!
//! Creating a lead for an assignee and moving a lead through the pipeline
//! both notify the assigned user. The lead change is the primary effect; a
//! notification that cannot be delivered is logged and does not undo it.

use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crm_common::error::AppError;
use crm_common::types::{Lead, LeadStatus, LeadSummary, NewNotification, NotificationCategory};

use crate::dispatcher::NotificationDispatcher;

const DEFAULT_LEAD_PAGE_LIMIT: i64 = 50;
const MAX_LEAD_PAGE_LIMIT: i64 = 100;
const DEFAULT_SOURCE: &str = "web";
const INITIAL_STATUS_ID: i32 = 1;

/// Postgres `foreign_key_violation`.
const FOREIGN_KEY_VIOLATION: &str = "23503";

pub struct LeadService;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateLeadParams {
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
    pub source: Option<String>,
    pub status_id: Option<i32>,
    /// Defaults to the creator
    pub assigned_to: Option<Uuid>,
    pub estimated_value: Option<f64>,
    pub close_probability: Option<i32>,
    pub expected_close_date: Option<chrono::NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListLeadsParams {
    pub status_id: Option<i32>,
    pub assigned_to: Option<Uuid>,
    pub source: Option<String>,
    /// Case-insensitive match on name, company or email
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeadPage {
    pub items: Vec<LeadSummary>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
}

/// One Kanban column: a status and its open leads, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStage {
    #[serde(flatten)]
    pub status: LeadStatus,
    pub leads: Vec<LeadSummary>,
}

/// Open-lead aggregates for one assignee.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LeadTotals {
    pub total_leads: i64,
    pub pipeline_value: f64,
}

impl LeadService {
    pub async fn create(
        pool: &PgPool,
        dispatcher: &NotificationDispatcher,
        creator: Uuid,
        params: &CreateLeadParams,
    ) -> Result<Lead, AppError> {
        let full_name = params.full_name.trim();
        if full_name.is_empty() {
            return Err(AppError::Validation("Full name is required".to_string()));
        }
        if params
            .close_probability
            .is_some_and(|p| !(0..=100).contains(&p))
        {
            return Err(AppError::Validation(
                "close_probability must be between 0 and 100".to_string(),
            ));
        }

        let assignee = params.assigned_to.unwrap_or(creator);

        let lead: Lead = sqlx::query_as(
            r#"
            INSERT INTO leads (
                id, full_name, email, phone, company, position, source, status_id,
                assigned_to, estimated_value, close_probability, expected_close_date, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(full_name)
        .bind(&params.email)
        .bind(&params.phone)
        .bind(&params.company)
        .bind(&params.position)
        .bind(params.source.as_deref().unwrap_or(DEFAULT_SOURCE))
        .bind(params.status_id.unwrap_or(INITIAL_STATUS_ID))
        .bind(assignee)
        .bind(params.estimated_value)
        .bind(params.close_probability)
        .bind(params.expected_close_date)
        .bind(&params.notes)
        .fetch_one(pool)
        .await
        .map_err(|e| reference_error(e, "Unknown status or assignee"))?;

        tracing::info!(lead_id = %lead.id, assigned_to = %assignee, "Lead created");

        if params.assigned_to.is_some() {
            deliver(dispatcher, assignment_notification(&lead, assignee)).await;
        }

        Ok(lead)
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> Result<Lead, AppError> {
        sqlx::query_as("SELECT * FROM leads WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", id)))
    }

    /// Filtered listing, newest first.
    pub async fn list(pool: &PgPool, params: &ListLeadsParams) -> Result<LeadPage, AppError> {
        let (page, limit, offset) = lead_page_bounds(params)?;

        let mut query = QueryBuilder::<Postgres>::new(
            r#"
            SELECT l.*, s.name AS status_name, s.color AS status_color, u.name AS assigned_name
            FROM leads l
            LEFT JOIN lead_statuses s ON l.status_id = s.id
            LEFT JOIN users u ON l.assigned_to = u.id
            WHERE TRUE
            "#,
        );
        push_filters(&mut query, params);
        query.push(" ORDER BY l.created_at DESC, l.id DESC LIMIT ");
        query.push_bind(limit);
        query.push(" OFFSET ");
        query.push_bind(offset);

        let items: Vec<LeadSummary> = query.build_query_as().fetch_all(pool).await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM leads l WHERE TRUE");
        push_filters(&mut count, params);
        let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

        Ok(LeadPage {
            items,
            page,
            limit,
            total,
        })
    }

    /// Open (not converted) leads grouped by status, in pipeline order.
    /// Every status gets a stage, empty or not.
    pub async fn pipeline(pool: &PgPool) -> Result<Vec<PipelineStage>, AppError> {
        let statuses: Vec<LeadStatus> =
            sqlx::query_as("SELECT * FROM lead_statuses ORDER BY sort_order, id")
                .fetch_all(pool)
                .await?;

        let leads: Vec<LeadSummary> = sqlx::query_as(
            r#"
            SELECT l.*, s.name AS status_name, s.color AS status_color, u.name AS assigned_name
            FROM leads l
            LEFT JOIN lead_statuses s ON l.status_id = s.id
            LEFT JOIN users u ON l.assigned_to = u.id
            WHERE l.converted = FALSE
            ORDER BY l.created_at DESC, l.id DESC
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(group_by_stage(statuses, leads))
    }

    /// Count and summed estimated value of the open leads assigned to a user.
    pub async fn totals_for(pool: &PgPool, user_id: Uuid) -> Result<LeadTotals, AppError> {
        let totals = sqlx::query_as(
            r#"
            SELECT COUNT(*) AS total_leads,
                   COALESCE(SUM(estimated_value), 0)::DOUBLE PRECISION AS pipeline_value
            FROM leads
            WHERE assigned_to = $1 AND converted = FALSE
            "#,
        )
        .bind(user_id)
        .fetch_one(pool)
        .await?;
        Ok(totals)
    }

    /// Move a lead to another pipeline status and tell its assignee.
    pub async fn update_status(
        pool: &PgPool,
        dispatcher: &NotificationDispatcher,
        id: Uuid,
        status_id: i32,
    ) -> Result<Lead, AppError> {
        let previous = Self::get(pool, id).await?;

        let status: LeadStatus = sqlx::query_as("SELECT * FROM lead_statuses WHERE id = $1")
            .bind(status_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::Validation(format!("Unknown status {}", status_id)))?;

        let lead: Lead = sqlx::query_as(
            "UPDATE leads SET status_id = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status.id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", id)))?;

        tracing::info!(
            lead_id = %lead.id,
            from = previous.status_id,
            to = lead.status_id,
            "Lead status changed"
        );

        if let Some(assignee) = lead.assigned_to {
            let notification =
                status_change_notification(&lead, assignee, previous.status_id, &status);
            deliver(dispatcher, notification).await;
        }

        Ok(lead)
    }
}

fn group_by_stage(statuses: Vec<LeadStatus>, leads: Vec<LeadSummary>) -> Vec<PipelineStage> {
    let mut stages: Vec<PipelineStage> = statuses
        .into_iter()
        .map(|status| PipelineStage {
            status,
            leads: Vec::new(),
        })
        .collect();
    for lead in leads {
        if let Some(stage) = stages
            .iter_mut()
            .find(|stage| stage.status.id == lead.lead.status_id)
        {
            stage.leads.push(lead);
        }
    }
    stages
}

async fn deliver(dispatcher: &NotificationDispatcher, notification: NewNotification) {
    let user_id = notification.user_id;
    if let Err(err) = dispatcher.notify(notification).await {
        tracing::error!(user_id = %user_id, error = %err, "Lead notification not delivered");
    }
}

fn assignment_notification(lead: &Lead, assignee: Uuid) -> NewNotification {
    NewNotification::new(
        assignee,
        "Nuevo Lead Asignado",
        format!("Se te ha asignado un nuevo lead: {}", lead.full_name),
    )
    .with_category(NotificationCategory::Info)
    .with_extra_data(json!({ "lead_id": lead.id, "entity_type": "lead" }))
}

fn status_change_notification(
    lead: &Lead,
    assignee: Uuid,
    previous_status_id: i32,
    status: &LeadStatus,
) -> NewNotification {
    NewNotification::new(
        assignee,
        "Cambio de Estatus",
        format!("El lead {} cambió a: {}", lead.full_name, status.name),
    )
    .with_category(NotificationCategory::Info)
    .with_extra_data(json!({
        "lead_id": lead.id,
        "previous_status_id": previous_status_id,
        "new_status_id": status.id,
    }))
}

fn push_filters(query: &mut QueryBuilder<'_, Postgres>, params: &ListLeadsParams) {
    if let Some(status_id) = params.status_id {
        query.push(" AND l.status_id = ");
        query.push_bind(status_id);
    }
    if let Some(assigned_to) = params.assigned_to {
        query.push(" AND l.assigned_to = ");
        query.push_bind(assigned_to);
    }
    if let Some(source) = params.source.as_deref().filter(|s| !s.is_empty()) {
        query.push(" AND l.source = ");
        query.push_bind(source.to_string());
    }
    if let Some(search) = params.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        query.push(" AND (l.full_name ILIKE ");
        query.push_bind(pattern.clone());
        query.push(" OR l.company ILIKE ");
        query.push_bind(pattern.clone());
        query.push(" OR l.email ILIKE ");
        query.push_bind(pattern);
        query.push(")");
    }
}

/// Resolve `(page, limit, offset)`. Pages start at 1.
fn lead_page_bounds(params: &ListLeadsParams) -> Result<(i64, i64, i64), AppError> {
    let page = params.page.unwrap_or(1).max(1);
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LEAD_PAGE_LIMIT)
        .clamp(1, MAX_LEAD_PAGE_LIMIT);
    let offset = (page - 1)
        .checked_mul(limit)
        .ok_or_else(|| AppError::Validation(format!("page {} is out of range", page)))?;
    Ok((page, limit, offset))
}

fn reference_error(e: sqlx::Error, message: &str) -> AppError {
    let bad_reference = e
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == FOREIGN_KEY_VIOLATION);
    if bad_reference {
        AppError::Validation(message.to_string())
    } else {
        AppError::Database(e)
    }
}
