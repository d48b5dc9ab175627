use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, patch, post},
    Extension, Router,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

use super::error::{service_error_to_response, ApiError};
use crate::auth::Caller;
use crate::models::{
    strip_blank_fields, CreatePetRequest, Pet, PetEnvelope, PetListResponse, ServiceResult,
    ShowPetRequest, UpdatePetRequest, ValidationError,
};
use crate::observability::Metrics;
use crate::services::PetService;

/// Shared state for the pet endpoints
#[derive(Clone)]
pub struct PetsState {
    pub pet_service: Arc<PetService>,
    pub metrics: Arc<Metrics>,
}

impl PetsState {
    /// Record the operation outcome and turn errors into responses
    fn finish<T>(&self, operation: &str, result: ServiceResult<T>) -> Result<T, ApiError> {
        match result {
            Ok(value) => {
                self.metrics.record_pet_operation(operation, "success");
                Ok(value)
            }
            Err(err) => {
                self.metrics
                    .record_pet_operation(operation, err.metric_status());
                if err.metric_status() == "error" {
                    crate::error_with_trace!(operation = operation, error = %err, "Pet operation failed");
                } else {
                    crate::info_with_trace!(operation = operation, error = %err, "Pet operation rejected");
                }
                Err(service_error_to_response(err))
            }
        }
    }
}

/// Create the router for the pet endpoints. Callers add the authentication layer.
pub fn create_pets_router(pet_service: Arc<PetService>, metrics: Arc<Metrics>) -> Router {
    let state = PetsState {
        pet_service,
        metrics,
    };

    Router::new()
        .route("/pets", get(list_pets).post(create_pet))
        .route("/pets/show", post(show_pet))
        .route("/pets/:id", patch(update_pet).delete(delete_pet))
        .with_state(state)
}

/// List the caller's pets
#[instrument(name = "list_pets", skip(state, caller), fields(caller = %caller.id))]
pub async fn list_pets(
    State(state): State<PetsState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<PetListResponse>, ApiError> {
    let result = state.pet_service.list_pets(&caller.id).await;
    let pets = state.finish("list", result)?;

    Ok(Json(PetListResponse { pets }))
}

/// Find a pet by name
#[instrument(name = "show_pet", skip(state, caller, payload), fields(caller = %caller.id))]
pub async fn show_pet(
    State(state): State<PetsState>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<PetEnvelope<Pet>>, ApiError> {
    let result = match decode_pet::<ShowPetRequest>(payload, false) {
        Ok(request) => state.pet_service.show_pet(request).await,
        Err(err) => Err(err.into()),
    };
    let pet = state.finish("show", result)?;

    Ok(Json(PetEnvelope { pet }))
}

/// Create a pet owned by the caller
#[instrument(name = "create_pet", skip(state, caller, payload), fields(caller = %caller.id))]
pub async fn create_pet(
    State(state): State<PetsState>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<PetEnvelope<Pet>>), ApiError> {
    let result = match decode_pet::<CreatePetRequest>(payload, false) {
        Ok(request) => state.pet_service.create_pet(&caller.id, request).await,
        Err(err) => Err(err.into()),
    };
    let pet = state.finish("create", result)?;

    Ok((StatusCode::CREATED, Json(PetEnvelope { pet })))
}

/// Update a pet the caller owns. Blank fields are dropped before decoding.
#[instrument(name = "update_pet", skip(state, caller, payload), fields(caller = %caller.id, id = %id))]
pub async fn update_pet(
    State(state): State<PetsState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<PetEnvelope<Pet>>), ApiError> {
    let result = match decode_pet::<UpdatePetRequest>(payload, true) {
        Ok(request) => state.pet_service.update_pet(&caller.id, &id, request).await,
        Err(err) => Err(err.into()),
    };
    let pet = state.finish("update", result)?;

    Ok((StatusCode::CREATED, Json(PetEnvelope { pet })))
}

/// Delete a pet the caller owns
#[instrument(name = "delete_pet", skip(state, caller), fields(caller = %caller.id, id = %id))]
pub async fn delete_pet(
    State(state): State<PetsState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let result = state.pet_service.delete_pet(&caller.id, &id).await;
    state.finish("delete", result)?;

    Ok(StatusCode::NO_CONTENT)
}

/// Decode a `{"pet": {...}}` body into a request model
fn decode_pet<T: DeserializeOwned>(
    payload: Result<Json<Value>, JsonRejection>,
    strip_blanks: bool,
) -> Result<T, ValidationError> {
    let Json(mut body) = payload.map_err(|rejection| ValidationError::MalformedBody {
        message: rejection.body_text(),
    })?;

    if strip_blanks {
        strip_blank_fields(&mut body);
    }

    let envelope: PetEnvelope<T> =
        serde_json::from_value(body).map_err(|e| ValidationError::MalformedBody {
            message: e.to_string(),
        })?;

    Ok(envelope.pet)
}
