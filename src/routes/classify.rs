use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;

use crate::app_state::AppState;
use crate::services::acquire::{self, AcquireError};
use crate::services::controller::{ControllerError, JobSnapshot};

/// POST /api/v1/classify — upload an image and start a classification job.
///
/// A finished previous job is reset first; a live one makes this a 409.
pub async fn submit_classification(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<JobSnapshot>), (StatusCode, String)> {
    let mut upload: Option<(String, String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| (StatusCode::BAD_REQUEST, "malformed multipart body".to_string()))?
    {
        if field.name() == Some("image") {
            let file_name = field.file_name().unwrap_or("upload").to_string();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let data = field
                .bytes()
                .await
                .map_err(|_| (StatusCode::BAD_REQUEST, "failed to read image field".to_string()))?;
            upload = Some((file_name, content_type, data.to_vec()));
        }
    }

    let (file_name, content_type, data) =
        upload.ok_or((StatusCode::BAD_REQUEST, "missing image field".to_string()))?;

    let payload =
        acquire::from_file(&file_name, &content_type, data).map_err(acquire_status)?;

    if state.controller.snapshot().state.is_terminal() {
        state.controller.reset().map_err(controller_status)?;
    }
    state.controller.select_image(payload).map_err(controller_status)?;
    state.controller.submit().map_err(controller_status)?;

    Ok((StatusCode::ACCEPTED, Json(state.controller.snapshot())))
}

/// GET /api/v1/classify — snapshot of the current job.
pub async fn get_job(State(state): State<AppState>) -> Json<JobSnapshot> {
    Json(state.controller.snapshot())
}

/// POST /api/v1/classify/cancel
pub async fn cancel_job(
    State(state): State<AppState>,
) -> Result<Json<JobSnapshot>, (StatusCode, String)> {
    state.controller.cancel().map_err(controller_status)?;
    Ok(Json(state.controller.snapshot()))
}

/// POST /api/v1/classify/reset
pub async fn reset_job(
    State(state): State<AppState>,
) -> Result<Json<JobSnapshot>, (StatusCode, String)> {
    state.controller.reset().map_err(controller_status)?;
    Ok(Json(state.controller.snapshot()))
}

fn acquire_status(err: AcquireError) -> (StatusCode, String) {
    let code = match &err {
        AcquireError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        AcquireError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        AcquireError::EmptyPayload | AcquireError::NoImageInDrop => StatusCode::BAD_REQUEST,
        AcquireError::CaptureUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        AcquireError::MalformedFrame(_) | AcquireError::FrameEncode(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
    };
    (code, err.to_string())
}

fn controller_status(err: ControllerError) -> (StatusCode, String) {
    let code = match &err {
        ControllerError::NoImageSelected => StatusCode::BAD_REQUEST,
        ControllerError::JobAlreadyInFlight | ControllerError::InvalidTransition { .. } => {
            StatusCode::CONFLICT
        }
    };
    (code, err.to_string())
}
