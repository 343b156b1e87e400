use actix_web::{post, web, HttpRequest, HttpResponse};
use actix_web::web::Data;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::AppError,
    handlers::today,
    models::common::ApiResponse,
    services::{reminder::ReminderService, workflow::WorkflowClient},
};

pub const SIGNATURE_HEADER: &str = "X-Workflow-Signature";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderWorkflowPayload {
    pub subscription_id: Uuid,
}

/// Called by the workflow queue. Sends whichever reminder is due today and
/// reports when the next one falls so the queue can re-trigger.
#[post("/subscription/reminder")]
pub async fn subscription_reminder(
    req: HttpRequest,
    body: web::Bytes,
    workflow: Data<WorkflowClient>,
    reminders: Data<ReminderService>,
) -> Result<HttpResponse, AppError> {
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    if !workflow.validate_signature(&body, signature) {
        log::warn!("Rejected workflow callback with invalid signature");
        return Err(AppError::Unauthorized("Invalid signature".to_string()));
    }

    let payload: ReminderWorkflowPayload = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Invalid workflow payload: {}", e)))?;

    let outcome = reminders.process(&payload.subscription_id, today()).await?;

    if let Some(days) = outcome.reminder_sent {
        log::info!("Sent {} day reminder for subscription {}", days, outcome.subscription_id);
    }

    Ok(HttpResponse::Ok().json(ApiResponse::success(outcome)))
}
