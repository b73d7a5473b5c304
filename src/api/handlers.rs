//! Request handlers for the domain CRUD surface and the operational
//! endpoints (`/health`, `/health/detailed`, `/metrics`) (§6).
//!
//! Handlers never touch a `Repository` directly — every operation goes
//! through the matching `DomainService`, which owns the
//! validate/load/invoke/persist/publish sequence (§4.6, §9). A handler's
//! only job is to translate HTTP in, call the service, and translate the
//! aggregate (or error) back out; aggregates are never serialized directly
//! since `AggregateMeta` does not flatten into the wire shape.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::domain::aggregate::AggregateRoot;
use crate::domain::component::{Component, ComponentStatus};
use crate::domain::customer::Customer;
use crate::domain::inspection::{Defect, DefectSeverity, DefectStatus, Inspection, InspectionItem, InspectionStatus, ItemStatus};
use crate::domain::services::component_service::CreateComponentInput;
use crate::domain::services::customer_service::CreateCustomerInput;
use crate::domain::services::inspection_service::CreateInspectionInput;
use crate::error::{AppError, AppResult};

use super::responses::{ListQuery, PaginatedResponse};
use super::AppState;

// ---------------------------------------------------------------------
// Response DTOs. Flat by construction: `meta`'s fields are pulled out one
// by one rather than relying on serde to flatten them.
// ---------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct InspectionDto {
    pub id: String,
    pub version: u64,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    pub title: String,
    pub description: String,
    #[serde(rename = "customerId")]
    pub customer_id: Option<String>,
    #[serde(rename = "supplierId")]
    pub supplier_id: Option<String>,
    #[serde(rename = "componentId")]
    pub component_id: Option<String>,
    pub status: InspectionStatus,
    #[serde(rename = "scheduledDate")]
    pub scheduled_date: DateTime<Utc>,
    #[serde(rename = "completedDate")]
    pub completed_date: Option<DateTime<Utc>>,
    pub location: String,
    #[serde(rename = "inspectionType")]
    pub inspection_type: String,
    pub items: Vec<InspectionItem>,
    pub defects: Vec<Defect>,
    #[serde(rename = "completionPercentage")]
    pub completion_percentage: f64,
}

impl From<Inspection> for InspectionDto {
    fn from(mut inspection: Inspection) -> Self {
        let completion_percentage = inspection.completion_percentage();
        InspectionDto {
            id: inspection.id().to_string(),
            version: inspection.version(),
            created_at: inspection.created_at(),
            updated_at: inspection.updated_at(),
            title: std::mem::take(&mut inspection.title),
            description: std::mem::take(&mut inspection.description),
            customer_id: inspection.customer_id.take(),
            supplier_id: inspection.supplier_id.take(),
            component_id: inspection.component_id.take(),
            status: inspection.status,
            scheduled_date: inspection.scheduled_date,
            completed_date: inspection.completed_date,
            location: std::mem::take(&mut inspection.location),
            inspection_type: std::mem::take(&mut inspection.inspection_type),
            items: std::mem::take(&mut inspection.items),
            defects: std::mem::take(&mut inspection.defects),
            completion_percentage,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ComponentDto {
    pub id: String,
    pub version: u64,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "partNumber")]
    pub part_number: String,
    pub name: String,
    pub description: String,
    pub status: ComponentStatus,
    #[serde(rename = "supplierId")]
    pub supplier_id: Option<String>,
    pub category: String,
    #[serde(rename = "unitOfMeasure")]
    pub unit_of_measure: String,
    pub specifications: Vec<crate::domain::component::Specification>,
    pub revisions: Vec<crate::domain::component::Revision>,
    pub documents: Vec<String>,
    #[serde(rename = "relatedComponents")]
    pub related_components: Vec<crate::domain::component::RelatedComponent>,
}

impl From<Component> for ComponentDto {
    fn from(mut component: Component) -> Self {
        ComponentDto {
            id: component.id().to_string(),
            version: component.version(),
            created_at: component.created_at(),
            updated_at: component.updated_at(),
            part_number: std::mem::take(&mut component.part_number),
            name: std::mem::take(&mut component.name),
            description: std::mem::take(&mut component.description),
            status: component.status,
            supplier_id: component.supplier_id.take(),
            category: std::mem::take(&mut component.category),
            unit_of_measure: std::mem::take(&mut component.unit_of_measure),
            specifications: std::mem::take(&mut component.specifications),
            revisions: std::mem::take(&mut component.revisions),
            documents: std::mem::take(&mut component.documents),
            related_components: std::mem::take(&mut component.related_components),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CustomerDto {
    pub id: String,
    pub version: u64,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    #[serde(rename = "billingAddress")]
    pub billing_address: Option<String>,
    pub status: crate::domain::customer::CustomerStatus,
    pub notes: String,
}

impl From<Customer> for CustomerDto {
    fn from(mut customer: Customer) -> Self {
        CustomerDto {
            id: customer.id().to_string(),
            version: customer.version(),
            created_at: customer.created_at(),
            updated_at: customer.updated_at(),
            name: std::mem::take(&mut customer.name),
            email: std::mem::take(&mut customer.email),
            phone: customer.phone.take(),
            billing_address: customer.billing_address.take(),
            status: customer.status,
            notes: std::mem::take(&mut customer.notes),
        }
    }
}

// ---------------------------------------------------------------------
// Inspections
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateInspectionRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "customerId")]
    pub customer_id: Option<String>,
    #[serde(rename = "supplierId")]
    pub supplier_id: Option<String>,
    #[serde(rename = "componentId")]
    pub component_id: Option<String>,
    #[serde(rename = "scheduledDate")]
    pub scheduled_date: DateTime<Utc>,
    pub location: String,
    #[serde(rename = "inspectionType")]
    pub inspection_type: String,
}

pub async fn create_inspection(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateInspectionRequest>,
) -> AppResult<impl IntoResponse> {
    let inspection = state
        .inspections
        .create(CreateInspectionInput {
            title: body.title,
            description: body.description,
            customer_id: body.customer_id,
            supplier_id: body.supplier_id,
            component_id: body.component_id,
            scheduled_date: body.scheduled_date,
            location: body.location,
            inspection_type: body.inspection_type,
        })
        .await?;
    Ok((axum::http::StatusCode::CREATED, Json(InspectionDto::from(inspection))))
}

pub async fn get_inspection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<InspectionDto>> {
    let inspection = state.inspections.get(&id).await?;
    Ok(Json(inspection.into()))
}

pub async fn list_inspections(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<PaginatedResponse<InspectionDto>>> {
    let status = query
        .status
        .as_deref()
        .map(parse_inspection_status)
        .transpose()?;
    let page = state
        .inspections
        .list(status, query.offset(), query.limit)
        .await?;
    let data = page.items.into_iter().map(InspectionDto::from).collect();
    Ok(Json(PaginatedResponse::new(data, page.total, &query)))
}

fn parse_inspection_status(raw: &str) -> AppResult<InspectionStatus> {
    match raw {
        "scheduled" => Ok(InspectionStatus::Scheduled),
        "in-progress" => Ok(InspectionStatus::InProgress),
        "completed" => Ok(InspectionStatus::Completed),
        "cancelled" => Ok(InspectionStatus::Cancelled),
        other => Err(AppError::validation(format!("unknown inspection status '{other}'"))),
    }
}

#[derive(Debug, Deserialize)]
pub struct TransitionInspectionRequest {
    pub status: String,
}

pub async fn transition_inspection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<TransitionInspectionRequest>,
) -> AppResult<Json<InspectionDto>> {
    let next = parse_inspection_status(&body.status)?;
    let inspection = state.inspections.transition_status(&id, next).await?;
    Ok(Json(inspection.into()))
}

#[derive(Debug, Deserialize)]
pub struct AddInspectionItemRequest {
    pub name: String,
    #[serde(default = "default_item_status")]
    pub status: ItemStatus,
    #[serde(rename = "actualValue")]
    pub actual_value: Option<f64>,
    pub expected: Option<f64>,
    pub tolerance: Option<f64>,
    pub unit: Option<String>,
}

fn default_item_status() -> ItemStatus {
    ItemStatus::Pending
}

pub async fn add_inspection_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<AddInspectionItemRequest>,
) -> AppResult<Json<InspectionDto>> {
    let item = InspectionItem {
        id: uuid::Uuid::new_v4().to_string(),
        name: body.name,
        status: body.status,
        actual_value: body.actual_value,
        expected: body.expected,
        tolerance: body.tolerance,
        unit: body.unit,
    };
    let inspection = state.inspections.add_item(&id, item).await?;
    Ok(Json(inspection.into()))
}

#[derive(Debug, Deserialize)]
pub struct AddDefectRequest {
    pub description: String,
    pub severity: DefectSeverity,
}

pub async fn add_inspection_defect(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<AddDefectRequest>,
) -> AppResult<Json<InspectionDto>> {
    let defect = Defect {
        id: uuid::Uuid::new_v4().to_string(),
        description: body.description,
        severity: body.severity,
        status: DefectStatus::Open,
    };
    let inspection = state.inspections.add_defect(&id, defect).await?;
    Ok(Json(inspection.into()))
}

pub async fn delete_inspection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.inspections.delete(&id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateComponentRequest {
    #[serde(rename = "partNumber")]
    pub part_number: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "supplierId")]
    pub supplier_id: Option<String>,
    pub category: String,
    #[serde(rename = "unitOfMeasure")]
    pub unit_of_measure: String,
    #[serde(default)]
    pub specifications: Vec<crate::domain::component::Specification>,
}

pub async fn create_component(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateComponentRequest>,
) -> AppResult<impl IntoResponse> {
    let component = state
        .components
        .create(CreateComponentInput {
            part_number: body.part_number,
            name: body.name,
            description: body.description,
            supplier_id: body.supplier_id,
            category: body.category,
            unit_of_measure: body.unit_of_measure,
            specifications: body.specifications,
        })
        .await?;
    Ok((axum::http::StatusCode::CREATED, Json(ComponentDto::from(component))))
}

pub async fn get_component(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<ComponentDto>> {
    let component = state.components.get(&id).await?;
    Ok(Json(component.into()))
}

pub async fn list_components(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<PaginatedResponse<ComponentDto>>> {
    let page = state
        .components
        .list(query.category.clone(), query.offset(), query.limit)
        .await?;
    let data = page.items.into_iter().map(ComponentDto::from).collect();
    Ok(Json(PaginatedResponse::new(data, page.total, &query)))
}

#[derive(Debug, Deserialize)]
pub struct ReviseComponentRequest {
    #[serde(default)]
    pub notes: String,
}

pub async fn revise_component(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ReviseComponentRequest>,
) -> AppResult<Json<ComponentDto>> {
    let component = state.components.revise(&id, body.notes).await?;
    Ok(Json(component.into()))
}

#[derive(Debug, Deserialize)]
pub struct TransitionRevisionRequest {
    pub status: String,
    #[serde(rename = "approvedBy")]
    pub approved_by: Option<String>,
}

fn parse_revision_status(raw: &str) -> AppResult<crate::domain::component::RevisionStatus> {
    use crate::domain::component::RevisionStatus;
    match raw {
        "draft" => Ok(RevisionStatus::Draft),
        "review" => Ok(RevisionStatus::Review),
        "approved" => Ok(RevisionStatus::Approved),
        "obsolete" => Ok(RevisionStatus::Obsolete),
        other => Err(AppError::validation(format!("unknown revision status '{other}'"))),
    }
}

pub async fn transition_component_revision(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<TransitionRevisionRequest>,
) -> AppResult<Json<ComponentDto>> {
    let next = parse_revision_status(&body.status)?;
    let component = state
        .components
        .transition_revision(&id, next, body.approved_by)
        .await?;
    Ok(Json(component.into()))
}

#[derive(Debug, Deserialize)]
pub struct TransitionComponentRequest {
    pub status: String,
}

fn parse_component_status(raw: &str) -> AppResult<ComponentStatus> {
    match raw {
        "development" => Ok(ComponentStatus::Development),
        "active" => Ok(ComponentStatus::Active),
        "obsolete" => Ok(ComponentStatus::Obsolete),
        "discontinued" => Ok(ComponentStatus::Discontinued),
        other => Err(AppError::validation(format!("unknown component status '{other}'"))),
    }
}

pub async fn transition_component(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<TransitionComponentRequest>,
) -> AppResult<Json<ComponentDto>> {
    let next = parse_component_status(&body.status)?;
    let component = state.components.transition_status(&id, next).await?;
    Ok(Json(component.into()))
}

#[derive(Debug, Deserialize)]
pub struct AddSpecificationRequest {
    pub name: String,
    pub value: Option<f64>,
    #[serde(rename = "expectedValue")]
    pub expected_value: Option<f64>,
    pub tolerance: Option<f64>,
    #[serde(rename = "minValue")]
    pub min_value: Option<f64>,
    #[serde(rename = "maxValue")]
    pub max_value: Option<f64>,
}

pub async fn add_component_specification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<AddSpecificationRequest>,
) -> AppResult<Json<ComponentDto>> {
    let component = state
        .components
        .add_specification(
            &id,
            crate::domain::component::Specification {
                name: body.name,
                value: body.value,
                expected_value: body.expected_value,
                tolerance: body.tolerance,
                min_value: body.min_value,
                max_value: body.max_value,
            },
        )
        .await?;
    Ok(Json(component.into()))
}

pub async fn delete_component(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.components.delete(&id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------
// Customers
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateCustomerRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    #[serde(rename = "billingAddress")]
    pub billing_address: Option<String>,
}

pub async fn create_customer(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateCustomerRequest>,
) -> AppResult<impl IntoResponse> {
    let customer = state
        .customers
        .create(CreateCustomerInput {
            name: body.name,
            email: body.email,
            phone: body.phone,
            billing_address: body.billing_address,
        })
        .await?;
    Ok((axum::http::StatusCode::CREATED, Json(CustomerDto::from(customer))))
}

pub async fn get_customer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<CustomerDto>> {
    let customer = state.customers.get(&id).await?;
    Ok(Json(customer.into()))
}

pub async fn list_customers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<PaginatedResponse<CustomerDto>>> {
    let page = state.customers.list(query.offset(), query.limit).await?;
    let data = page.items.into_iter().map(CustomerDto::from).collect();
    Ok(Json(PaginatedResponse::new(data, page.total, &query)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateCustomerContactRequest {
    pub phone: Option<String>,
    #[serde(rename = "billingAddress")]
    pub billing_address: Option<String>,
}

pub async fn update_customer_contact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateCustomerContactRequest>,
) -> AppResult<Json<CustomerDto>> {
    let customer = state
        .customers
        .update_contact(&id, body.phone, body.billing_address)
        .await?;
    Ok(Json(customer.into()))
}

pub async fn deactivate_customer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<CustomerDto>> {
    let customer = state.customers.deactivate(&id).await?;
    Ok(Json(customer.into()))
}

pub async fn delete_customer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.customers.delete(&id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------
// Operational endpoints
// ---------------------------------------------------------------------

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let report = state.health.run().await;
    let status_code = match report.status {
        crate::health::Status::Healthy | crate::health::Status::Degraded => {
            axum::http::StatusCode::OK
        }
        crate::health::Status::Unhealthy => axum::http::StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(json!({ "status": report.status })))
}

pub async fn health_detailed(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let report = state.health.run().await;
    let status_code = match report.status {
        crate::health::Status::Healthy | crate::health::Status::Degraded => {
            axum::http::StatusCode::OK
        }
        crate::health::Status::Unhealthy => axum::http::StatusCode::SERVICE_UNAVAILABLE,
    };
    (
        status_code,
        Json(json!({
            "status": report.status,
            "checks": report.checks,
            "uptimeSecs": state.started_at.elapsed().as_secs(),
        })),
    )
}

/// Hand-rolled plaintext exporter (§9 — no `metrics`/`prometheus` crate is
/// in the dependency stack; this platform's one consumer is an internal
/// scrape, not a published client library).
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let cache_stats = state.cache.stats();
    let pool_stats = state.worker_pool.stats();
    let mut body = String::new();

    let mut metric = |name: &str, kind: &str, help: &str, value: u64| {
        body.push_str(&format!("# HELP {name} {help}\n"));
        body.push_str(&format!("# TYPE {name} {kind}\n"));
        body.push_str(&format!("{name} {value}\n"));
    };

    metric(
        "aerosuite_cache_hits",
        "counter",
        "Total cache lookups that found a live entry.",
        cache_stats.hits,
    );
    metric(
        "aerosuite_cache_misses",
        "counter",
        "Total cache lookups that found no entry or an expired one.",
        cache_stats.misses,
    );
    metric("aerosuite_cache_sets", "counter", "Total cache set() calls.", cache_stats.sets);
    metric(
        "aerosuite_cache_invalidations",
        "counter",
        "Total entries removed by tag/entity/key invalidation.",
        cache_stats.invalidations,
    );
    metric(
        "aerosuite_cache_degraded",
        "gauge",
        "1 if the cache has fallen back to local-only serving, 0 otherwise.",
        state.cache.is_degraded() as u64,
    );
    metric(
        "aerosuite_worker_pool_completed",
        "counter",
        "Total worker pool jobs that completed successfully.",
        pool_stats.completed,
    );
    metric(
        "aerosuite_worker_pool_failed",
        "counter",
        "Total worker pool jobs that returned an error.",
        pool_stats.failed,
    );
    metric(
        "aerosuite_worker_pool_rejected",
        "counter",
        "Total worker pool submissions rejected for a full queue.",
        pool_stats.rejected,
    );
    metric(
        "aerosuite_worker_pool_restarts",
        "counter",
        "Total worker tasks respawned after a panic.",
        pool_stats.restarts,
    );
    metric(
        "aerosuite_uptime_seconds",
        "gauge",
        "Seconds since this process started.",
        state.started_at.elapsed().as_secs(),
    );

    ([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}
