use std::{path::PathBuf, sync::Arc};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use pgstay_billing::{
    AdmissionConfirmed, BalanceView, EffectQueue, ManualPayment, OnboardTenant, OnboardedTenant,
    PaymentView, Reconciled, WebhookOutcome, apply_webhook, archived_tenants, check_balance,
    confirm_admission, offboard, onboard, payment_history, record_manual_payment, room_occupancy,
    tenant_profile, tenants_by_property,
};
use pgstay_core::{
    ArchivedTenant, BillingError, ErrorKind, PaymentMethod, RoomOccupancy, TenancyStore,
    TenantProfile, TenantSummary, models::UnknownVariant,
};
use pgstay_platform::{ConfirmAdmissionRequest, CreateTenantRequest, RecordPaymentRequest, WebhookAck};
use serde_json::{Value, json};
use tracing::{error, info, warn};
use uuid::Uuid;

type ApiResult<T> = Result<T, (StatusCode, String)>;

pub struct AppState<S> {
    pub store: Arc<S>,
    pub effects: EffectQueue,
    pub receipts_dir: PathBuf,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            effects: self.effects.clone(),
            receipts_dir: self.receipts_dir.clone(),
        }
    }
}

pub fn router<S: TenancyStore + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/tenants", post(create_tenant::<S>))
        .route(
            "/tenants/{identity_id}",
            get(get_tenant::<S>).delete(delete_tenant::<S>),
        )
        .route("/tenants/{identity_id}/confirm", post(confirm_tenant::<S>))
        .route("/tenants/{identity_id}/balance", get(get_balance::<S>))
        .route("/rooms/{room_id}/occupancy", get(get_room_occupancy::<S>))
        .route(
            "/properties/{property_id}/tenants",
            get(list_property_tenants::<S>),
        )
        .route(
            "/properties/{property_id}/archived-tenants",
            get(list_archived_tenants::<S>),
        )
        .route(
            "/payments",
            get(list_payments::<S>).post(create_payment::<S>),
        )
        .route("/webhooks/razorpay", post(razorpay_webhook::<S>))
        .route("/receipts/{file_name}", get(get_receipt::<S>))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn create_tenant<S: TenancyStore>(
    State(state): State<AppState<S>>,
    Json(payload): Json<CreateTenantRequest>,
) -> ApiResult<(StatusCode, Json<OnboardedTenant>)> {
    let input = OnboardTenant {
        room_id: payload.room_id,
        name: payload.name,
        phone: payload.phone,
        monthly_rent: payload.monthly_rent,
        admission_date: payload.admission_date,
        details: payload.details,
    };

    let onboarded = onboard(state.store.as_ref(), &state.effects, input, Utc::now())
        .await
        .map_err(api_error)?;

    Ok((StatusCode::CREATED, Json(onboarded)))
}

async fn confirm_tenant<S: TenancyStore>(
    State(state): State<AppState<S>>,
    Path(identity_id): Path<Uuid>,
    Json(payload): Json<ConfirmAdmissionRequest>,
) -> ApiResult<Json<AdmissionConfirmed>> {
    let confirmed = confirm_admission(
        state.store.as_ref(),
        &state.effects,
        identity_id,
        &payload.otp,
        Utc::now(),
    )
    .await
    .map_err(api_error)?;

    Ok(Json(confirmed))
}

async fn get_tenant<S: TenancyStore>(
    State(state): State<AppState<S>>,
    Path(identity_id): Path<Uuid>,
) -> ApiResult<Json<TenantProfile>> {
    let profile = tenant_profile(state.store.as_ref(), identity_id)
        .await
        .map_err(api_error)?;
    Ok(Json(profile))
}

async fn get_balance<S: TenancyStore>(
    State(state): State<AppState<S>>,
    Path(identity_id): Path<Uuid>,
) -> ApiResult<Json<BalanceView>> {
    let view = check_balance(state.store.as_ref(), identity_id, Utc::now())
        .await
        .map_err(api_error)?;
    Ok(Json(view))
}

async fn delete_tenant<S: TenancyStore>(
    State(state): State<AppState<S>>,
    Path(identity_id): Path<Uuid>,
) -> ApiResult<Json<ArchivedTenant>> {
    let archive = offboard(state.store.as_ref(), identity_id, Utc::now())
        .await
        .map_err(api_error)?;
    Ok(Json(archive))
}

async fn get_room_occupancy<S: TenancyStore>(
    State(state): State<AppState<S>>,
    Path(room_id): Path<Uuid>,
) -> ApiResult<Json<RoomOccupancy>> {
    let occupancy = room_occupancy(state.store.as_ref(), room_id)
        .await
        .map_err(api_error)?;
    Ok(Json(occupancy))
}

async fn list_property_tenants<S: TenancyStore>(
    State(state): State<AppState<S>>,
    Path(property_id): Path<Uuid>,
) -> ApiResult<Json<Vec<TenantSummary>>> {
    let roster = tenants_by_property(state.store.as_ref(), property_id)
        .await
        .map_err(api_error)?;
    Ok(Json(roster))
}

async fn list_archived_tenants<S: TenancyStore>(
    State(state): State<AppState<S>>,
    Path(property_id): Path<Uuid>,
) -> ApiResult<Json<Vec<ArchivedTenant>>> {
    let archives = archived_tenants(state.store.as_ref(), property_id)
        .await
        .map_err(api_error)?;
    Ok(Json(archives))
}

async fn create_payment<S: TenancyStore>(
    State(state): State<AppState<S>>,
    Json(payload): Json<RecordPaymentRequest>,
) -> ApiResult<(StatusCode, Json<Reconciled>)> {
    let method: PaymentMethod = payload
        .method
        .parse()
        .map_err(|err: UnknownVariant| (StatusCode::BAD_REQUEST, err.to_string()))?;

    let reconciled = record_manual_payment(
        state.store.as_ref(),
        &state.effects,
        ManualPayment {
            identity_id: payload.tenant_id,
            amount: payload.amount,
            method,
        },
        Utc::now(),
    )
    .await
    .map_err(api_error)?;

    Ok((StatusCode::CREATED, Json(reconciled)))
}

async fn list_payments<S: TenancyStore>(
    State(state): State<AppState<S>>,
) -> ApiResult<Json<Vec<PaymentView>>> {
    let history = payment_history(state.store.as_ref())
        .await
        .map_err(api_error)?;
    Ok(Json(history))
}

/// Always answers 200 so the provider does not retry a payload we cannot use.
async fn razorpay_webhook<S: TenancyStore>(
    State(state): State<AppState<S>>,
    body: Bytes,
) -> Json<WebhookAck> {
    let raw: Value = match serde_json::from_slice(&body) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(error = %err, "webhook body is not JSON");
            return Json(WebhookAck {
                status: "error".to_string(),
                details: json!({ "error": format!("invalid JSON: {err}") }),
            });
        }
    };

    let ack = match apply_webhook(state.store.as_ref(), &state.effects, &raw, Utc::now()).await {
        Ok(WebhookOutcome::Ignored { event }) => WebhookAck {
            status: "ignored".to_string(),
            details: json!({ "event": event }),
        },
        Ok(WebhookOutcome::Duplicate { event_key }) => WebhookAck {
            status: "duplicate".to_string(),
            details: json!({ "event_key": event_key }),
        },
        Ok(WebhookOutcome::Applied(reconciled)) => WebhookAck {
            status: "ok".to_string(),
            details: json!({
                "tenant_id": reconciled.payment.tenant_id,
                "payment_id": reconciled.payment.id,
                "amount": reconciled.payment.amount,
                "balance": reconciled.balance_after,
            }),
        },
        Err(err) => {
            if err.kind() == ErrorKind::Internal {
                error!(error = %err, "webhook processing failed");
            } else {
                warn!(error = %err, "webhook rejected");
            }
            WebhookAck {
                status: "error".to_string(),
                details: json!({ "error": err.to_string() }),
            }
        }
    };

    Json(ack)
}

async fn get_receipt<S: TenancyStore>(
    State(state): State<AppState<S>>,
    Path(file_name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let valid = file_name.starts_with("receipt_")
        && file_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        && !file_name.contains("..");
    if !valid {
        return Err((StatusCode::NOT_FOUND, "receipt not found".to_string()));
    }

    let body = tokio::fs::read_to_string(state.receipts_dir.join(&file_name))
        .await
        .map_err(|_| (StatusCode::NOT_FOUND, "receipt not found".to_string()))?;

    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body))
}

fn api_error(err: BillingError) -> (StatusCode, String) {
    let status = match err.kind() {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::BadExternalPayload | ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::OutstandingBalance => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = ?err, "request failed");
        return (status, "internal error".to_string());
    }
    info!(status = status.as_u16(), error = %err, "request rejected");
    (status, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgstay_billing::EffectReceiver;
    use pgstay_core::{KycDetails, Room};
    use pgstay_memstore::InMemoryTenancyStore;
    use rust_decimal::Decimal;

    async fn state() -> (AppState<InMemoryTenancyStore>, EffectReceiver, Room) {
        let store = InMemoryTenancyStore::new();
        let room = Room {
            id: Uuid::new_v4(),
            property_id: Uuid::new_v4(),
            room_no: "3B".to_string(),
            capacity: 1,
            price: Decimal::from(5000),
            deposit: Decimal::from(2000),
        };
        store.insert_room(room.clone()).await;
        let (effects, receiver) = EffectQueue::bounded(16);
        let state = AppState {
            store: Arc::new(store),
            effects,
            receipts_dir: std::env::temp_dir(),
        };
        (state, receiver, room)
    }

    fn tenant_request(room: &Room, phone: &str) -> CreateTenantRequest {
        CreateTenantRequest {
            room_id: room.id,
            name: "Farah Khan".to_string(),
            phone: phone.to_string(),
            monthly_rent: None,
            admission_date: None,
            details: KycDetails::default(),
        }
    }

    async fn admitted(state: &AppState<InMemoryTenancyStore>, room: &Room) -> Uuid {
        let (_, Json(onboarded)) =
            create_tenant(State(state.clone()), Json(tenant_request(room, "9700000001")))
                .await
                .unwrap();
        let otp = state
            .store
            .profile(onboarded.identity_id)
            .await
            .unwrap()
            .and_then(|profile| profile.otp)
            .unwrap();
        confirm_tenant(
            State(state.clone()),
            Path(onboarded.identity_id),
            Json(ConfirmAdmissionRequest { otp }),
        )
        .await
        .unwrap();
        onboarded.identity_id
    }

    #[tokio::test]
    async fn test_full_room_maps_to_conflict() {
        let (state, _receiver, room) = state().await;
        admitted(&state, &room).await;

        let err = create_tenant(State(state.clone()), Json(tenant_request(&room, "9700000002")))
            .await
            .unwrap_err();

        assert_eq!(err.0, StatusCode::CONFLICT);
        assert!(err.1.contains("3B"), "{}", err.1);
    }

    #[tokio::test]
    async fn test_wrong_otp_is_unauthorized() {
        let (state, _receiver, room) = state().await;
        let (_, Json(onboarded)) =
            create_tenant(State(state.clone()), Json(tenant_request(&room, "9700000003")))
                .await
                .unwrap();

        let err = confirm_tenant(
            State(state.clone()),
            Path(onboarded.identity_id),
            Json(ConfirmAdmissionRequest {
                otp: "not-an-otp".to_string(),
            }),
        )
        .await
        .unwrap_err();

        assert_eq!(err.0, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_offboarding_with_balance_is_unprocessable() {
        let (state, _receiver, room) = state().await;
        let identity_id = admitted(&state, &room).await;

        let err = delete_tenant(State(state.clone()), Path(identity_id))
            .await
            .unwrap_err();

        assert_eq!(err.0, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.1, "outstanding balance: 7000.00");
    }

    #[tokio::test]
    async fn test_property_roster_shows_room_and_status() {
        let (state, _receiver, room) = state().await;
        let identity_id = admitted(&state, &room).await;

        let Json(roster) = list_property_tenants(State(state.clone()), Path(room.property_id))
            .await
            .unwrap();

        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].identity_id, identity_id);
        assert_eq!(roster[0].name, "Farah Khan");
        assert_eq!(roster[0].room_no, "3B");
        assert_eq!(roster[0].status, pgstay_core::TenantStatus::Active);
    }

    #[tokio::test]
    async fn test_second_balance_check_is_rate_limited() {
        let (state, _receiver, room) = state().await;
        let identity_id = admitted(&state, &room).await;

        let Json(view) = get_balance(State(state.clone()), Path(identity_id))
            .await
            .unwrap();
        assert_eq!(view.balance, Decimal::from(7000));

        let err = get_balance(State(state.clone()), Path(identity_id))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_payment_method_is_validated() {
        let (state, _receiver, room) = state().await;
        let identity_id = admitted(&state, &room).await;

        let err = create_payment(
            State(state.clone()),
            Json(RecordPaymentRequest {
                tenant_id: identity_id,
                amount: Decimal::from(100),
                method: "Cheque".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);

        let (status, Json(reconciled)) = create_payment(
            State(state.clone()),
            Json(RecordPaymentRequest {
                tenant_id: identity_id,
                amount: Decimal::from(7000),
                method: "Bank Transfer".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(reconciled.balance_after, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_webhook_always_acknowledges() {
        let (state, _receiver, _room) = state().await;

        let Json(ack) = razorpay_webhook(State(state.clone()), Bytes::from_static(b"{not json")).await;
        assert_eq!(ack.status, "error");

        let body = serde_json::to_vec(&json!({
            "event": "payment_link.paid",
            "payload": { "payment_link": { "entity": { "amount": 100, "reference_id": "BILL" } } }
        }))
        .unwrap();
        let Json(ack) = razorpay_webhook(State(state.clone()), Bytes::from(body)).await;
        assert_eq!(ack.status, "error");
        assert!(ack.details["error"].as_str().unwrap().contains("reference_id"));

        let body = serde_json::to_vec(&json!({ "event": "payment.failed" })).unwrap();
        let Json(ack) = razorpay_webhook(State(state.clone()), Bytes::from(body)).await;
        assert_eq!(ack.status, "ignored");
    }

    #[tokio::test]
    async fn test_receipt_names_are_confined() {
        let (state, _receiver, _room) = state().await;

        let err = get_receipt(State(state.clone()), Path("../etc/passwd".to_string()))
            .await
            .err()
            .unwrap();

        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }
}
