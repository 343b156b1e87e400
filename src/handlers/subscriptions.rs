use actix_web::{delete, get, post, put, HttpResponse};
use actix_web::web::{Data, Json, Path, Query};
use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::AppError,
    handlers::today,
    middleware::auth::AuthenticatedUser,
    models::{
        common::ApiResponse,
        subscription::{
            CreateSubscriptionRequest, DashboardQuery, DashboardSummary, Subscription,
            SubscriptionQuery, SubscriptionStatus, SubscriptionView, UpdateSubscriptionRequest,
        },
    },
    services::{database::DatabaseService, workflow::WorkflowClient},
    utils::renewal::{self, Urgency},
};

#[derive(Serialize)]
pub struct CreatedSubscription {
    pub subscription: Subscription,
    pub workflow_run_id: Option<String>,
}

/// Persists an expiry that became due since the record was last written.
async fn refresh(db: &DatabaseService, mut subscription: Subscription, today: NaiveDate) -> Result<Subscription, AppError> {
    if subscription.expire_if_due(today) {
        log::info!("Subscription {} expired on read", subscription.id);
        return Ok(db.update_subscription(&subscription).await?);
    }
    Ok(subscription)
}

async fn load_owned(db: &DatabaseService, owner: &Uuid, today: NaiveDate) -> Result<Vec<Subscription>, AppError> {
    let mut subscriptions = Vec::new();
    for subscription in db.get_subscriptions_by_owner(owner).await? {
        subscriptions.push(refresh(db, subscription, today).await?);
    }
    Ok(subscriptions)
}

/// Loads a subscription the caller owns.
async fn load_for(
    db: &DatabaseService,
    caller: &AuthenticatedUser,
    subscription_id: &Uuid,
    action: &str,
) -> Result<Subscription, AppError> {
    let subscription = db
        .get_subscription(subscription_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))?;
    caller.ensure_owner(&subscription.owner, action)?;
    Ok(subscription)
}

#[get("")]
pub async fn list_subscriptions(
    db: Data<DatabaseService>,
    caller: AuthenticatedUser,
    query: Query<SubscriptionQuery>,
) -> Result<HttpResponse, AppError> {
    let mut subscriptions = load_owned(&db, &caller.user_id, today()).await?;
    if let Some(status) = query.status {
        subscriptions.retain(|s| s.status == status);
    }
    Ok(HttpResponse::Ok().json(ApiResponse::success(subscriptions)))
}

#[get("/user/{user_id}")]
pub async fn get_user_subscriptions(
    db: Data<DatabaseService>,
    caller: AuthenticatedUser,
    path: Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    if caller.user_id != user_id {
        return Err(AppError::Forbidden("You are not the owner of this account".to_string()));
    }

    let subscriptions = load_owned(&db, &user_id, today()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(subscriptions)))
}

#[get("/upcoming-renewals")]
pub async fn upcoming_renewals(
    db: Data<DatabaseService>,
    caller: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let today = today();
    let mut upcoming: Vec<SubscriptionView> = load_owned(&db, &caller.user_id, today)
        .await?
        .iter()
        .filter(|s| s.status == SubscriptionStatus::Active)
        .map(|s| s.to_view(today))
        .filter(|v| matches!(v.urgency, Urgency::DueToday | Urgency::DueSoon))
        .collect();
    upcoming.sort_by_key(|v| v.subscription.renewal_date);

    Ok(HttpResponse::Ok().json(ApiResponse::success(upcoming)))
}

#[get("/dashboard")]
pub async fn dashboard(
    db: Data<DatabaseService>,
    caller: AuthenticatedUser,
    query: Query<DashboardQuery>,
) -> Result<HttpResponse, AppError> {
    let actual_today = today();
    let reference = match &query.today {
        Some(value) => renewal::parse_date(value)?,
        None => actual_today,
    };

    // Only the real date is persisted; an override just shapes the view.
    let mut subscriptions = load_owned(&db, &caller.user_id, actual_today).await?;
    for subscription in subscriptions.iter_mut() {
        subscription.expire_if_due(reference);
    }

    Ok(HttpResponse::Ok().json(ApiResponse::success(DashboardSummary::build(&subscriptions, reference))))
}

#[get("/{subscription_id}")]
pub async fn get_subscription(
    db: Data<DatabaseService>,
    caller: AuthenticatedUser,
    path: Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let subscription = load_for(&db, &caller, &path.into_inner(), "view").await?;
    let subscription = refresh(&db, subscription, today()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(subscription)))
}

#[post("")]
pub async fn create_subscription(
    db: Data<DatabaseService>,
    workflow: Data<WorkflowClient>,
    caller: AuthenticatedUser,
    payload: Json<CreateSubscriptionRequest>,
) -> Result<HttpResponse, AppError> {
    let subscription = Subscription::new(caller.user_id, payload.into_inner(), today())?;
    let subscription = db.create_subscription(&subscription).await?;

    log::info!("Created subscription {} for user {}", subscription.id, caller.user_id);

    // The reminder workflow is best effort; creation never fails because of it.
    let workflow_run_id = match workflow.trigger_reminder(&subscription.id).await {
        Ok(run_id) => run_id,
        Err(e) => {
            log::warn!("Workflow trigger skipped: {}", e);
            None
        }
    };

    Ok(HttpResponse::Created().json(ApiResponse::success(CreatedSubscription {
        subscription,
        workflow_run_id,
    })))
}

#[put("/{subscription_id}")]
pub async fn update_subscription(
    db: Data<DatabaseService>,
    caller: AuthenticatedUser,
    path: Path<Uuid>,
    payload: Json<UpdateSubscriptionRequest>,
) -> Result<HttpResponse, AppError> {
    let mut subscription = load_for(&db, &caller, &path.into_inner(), "update").await?;
    subscription.apply_update(payload.into_inner(), today())?;
    let updated = db.update_subscription(&subscription).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

#[delete("/{subscription_id}")]
pub async fn delete_subscription(
    db: Data<DatabaseService>,
    caller: AuthenticatedUser,
    path: Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let subscription = load_for(&db, &caller, &path.into_inner(), "delete").await?;
    db.delete_subscription(&subscription.id).await?;

    log::info!("Deleted subscription {}", subscription.id);
    Ok(HttpResponse::Ok().json(ApiResponse::message("Subscription deleted successfully".to_string())))
}

#[put("/{subscription_id}/cancel")]
pub async fn cancel_subscription(
    db: Data<DatabaseService>,
    caller: AuthenticatedUser,
    path: Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let subscription = load_for(&db, &caller, &path.into_inner(), "cancel").await?;
    let mut subscription = refresh(&db, subscription, today()).await?;
    subscription.cancel()?;
    let cancelled = db.update_subscription(&subscription).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(cancelled)))
}
