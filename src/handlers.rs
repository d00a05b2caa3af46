use crate::{
    AppState,
    auth::AuthUser,
    browse::{self, BrowseQuery, BrowseSection},
    error::{ApiError, ErrorBody, ValidationError},
    models::{
        DeleteResponse, Lesson, LessonPayload, LessonQuery, PresignedUrlRequest,
        PresignedUrlResponse,
    },
    storage::{self, MediaKind},
};
use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
};
use uuid::Uuid;

// --- Extraction Helpers ---

fn lesson_id(path: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, ApiError> {
    // An id that is not even a UUID cannot resolve to a stored lesson.
    path.map(|Path(id)| id).map_err(|_| ApiError::NotFound)
}

fn payload(body: Result<Json<LessonPayload>, JsonRejection>) -> Result<LessonPayload, ApiError> {
    body.map(|Json(p)| p)
        .map_err(|e| ValidationError::Malformed(e.body_text()).into())
}

// --- Handlers ---

/// list_lessons
///
/// [Public Route] Lists lessons matching the query filters, links included.
///
/// Anonymous callers only ever see published lessons: an absent `published`
/// filter is forced to `true`, and `published=false` yields an empty list.
#[utoipa::path(
    get,
    path = "/lessons",
    params(LessonQuery),
    responses(
        (status = 200, description = "Matching lessons", body = [Lesson]),
        (status = 400, description = "Malformed query", body = ErrorBody)
    )
)]
pub async fn list_lessons(
    auth: Option<AuthUser>,
    State(state): State<AppState>,
    query: Result<Query<LessonQuery>, QueryRejection>,
) -> Result<Json<Vec<Lesson>>, ApiError> {
    let Query(query) = query.map_err(|e| ValidationError::Malformed(e.body_text()))?;
    let (mut filter, sort) = query.into_parts();

    if auth.is_none() {
        match filter.published {
            Some(false) => return Ok(Json(Vec::new())),
            _ => filter.published = Some(true),
        }
    }

    let lessons = state.repo.find_lessons(&filter, sort).await?;
    Ok(Json(lessons))
}

/// get_lesson
///
/// [Public Route] A single lesson with its links. Unpublished lessons are reported
/// as not found to anonymous callers.
#[utoipa::path(
    get,
    path = "/lessons/{id}",
    params(("id" = Uuid, Path, description = "Lesson ID")),
    responses(
        (status = 200, description = "Found", body = Lesson),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn get_lesson(
    auth: Option<AuthUser>,
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Lesson>, ApiError> {
    let id = lesson_id(path)?;
    let lesson = state.repo.find_lesson(id).await?;

    if auth.is_none() && !lesson.published {
        return Err(ApiError::NotFound);
    }
    Ok(Json(lesson))
}

/// create_lesson
///
/// [Authenticated Route] Validates the payload and stores the lesson with its links.
/// `createdBy` is taken from the authenticated actor, never from the body.
#[utoipa::path(
    post,
    path = "/lessons",
    request_body = LessonPayload,
    responses(
        (status = 201, description = "Created", body = Lesson),
        (status = 400, description = "Validation failed", body = ErrorBody),
        (status = 401, description = "Unauthorized", body = ErrorBody)
    )
)]
pub async fn create_lesson(
    AuthUser { id: actor }: AuthUser,
    State(state): State<AppState>,
    body: Result<Json<LessonPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<Lesson>), ApiError> {
    let input = payload(body)?.validate()?;
    let lesson = state.repo.create_lesson(input, &actor).await?;

    tracing::info!(lesson_id = %lesson.id, actor = %actor, links = lesson.links.len(), "lesson created");
    Ok((StatusCode::CREATED, Json(lesson)))
}

/// update_lesson
///
/// [Authenticated Route] Replaces the lesson's mutable fields. A supplied `links`
/// array replaces the whole link set (`[]` clears it); an omitted one keeps it.
#[utoipa::path(
    put,
    path = "/lessons/{id}",
    params(("id" = Uuid, Path, description = "Lesson ID")),
    request_body = LessonPayload,
    responses(
        (status = 200, description = "Updated", body = Lesson),
        (status = 400, description = "Validation failed", body = ErrorBody),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn update_lesson(
    AuthUser { id: actor }: AuthUser,
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<LessonPayload>, JsonRejection>,
) -> Result<Json<Lesson>, ApiError> {
    let id = lesson_id(path)?;
    let input = payload(body)?.validate()?;
    let lesson = state.repo.update_lesson(id, input).await?;

    tracing::info!(lesson_id = %id, actor = %actor, links = lesson.links.len(), "lesson updated");
    Ok(Json(lesson))
}

/// delete_lesson
///
/// [Authenticated Route] Removes the lesson and, by cascade, its links.
#[utoipa::path(
    delete,
    path = "/lessons/{id}",
    params(("id" = Uuid, Path, description = "Lesson ID")),
    responses(
        (status = 200, description = "Deleted", body = DeleteResponse),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn delete_lesson(
    AuthUser { id: actor }: AuthUser,
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let id = lesson_id(path)?;
    state.repo.delete_lesson(id).await?;

    tracing::info!(lesson_id = %id, actor = %actor, "lesson deleted");
    Ok(Json(DeleteResponse { success: true }))
}

/// browse_lessons
///
/// [Public Route] Published lessons grouped for the student view:
/// section (level - year, or grade) → subject → chapter.
#[utoipa::path(
    get,
    path = "/browse",
    params(BrowseQuery),
    responses((status = 200, description = "Grouped published lessons", body = [BrowseSection]))
)]
pub async fn browse_lessons(
    State(state): State<AppState>,
    query: Result<Query<BrowseQuery>, QueryRejection>,
) -> Result<Json<Vec<BrowseSection>>, ApiError> {
    let Query(query) = query.map_err(|e| ValidationError::Malformed(e.body_text()))?;
    let lessons = state
        .repo
        .find_lessons(&query.filter(), crate::models::LessonSort::Curriculum)
        .await?;
    Ok(Json(browse::group_lessons(lessons)))
}

/// get_presigned_url
///
/// [Authenticated Route] Issues a short-lived URL for uploading a lesson PDF or
/// video straight to object storage. The returned `resourceUrl` is then saved
/// on the lesson as `pdfUrl` or `videoUrl`.
#[utoipa::path(
    post,
    path = "/uploads/presigned",
    request_body = PresignedUrlRequest,
    responses(
        (status = 200, description = "URL", body = PresignedUrlResponse),
        (status = 400, description = "Unsupported media type", body = ErrorBody),
        (status = 401, description = "Unauthorized", body = ErrorBody)
    )
)]
pub async fn get_presigned_url(
    AuthUser { id: actor }: AuthUser,
    State(state): State<AppState>,
    body: Result<Json<PresignedUrlRequest>, JsonRejection>,
) -> Result<Json<PresignedUrlResponse>, ApiError> {
    let Json(request) = body.map_err(|e| ValidationError::Malformed(e.body_text()))?;
    let kind = MediaKind::from_content_type(&request.file_type)?;
    let object_key = storage::media_object_key(kind, &request.filename);

    let upload_url = state
        .storage
        .get_presigned_upload_url(&object_key, &request.file_type)
        .await?;

    tracing::debug!(actor = %actor, key = %object_key, "issued media upload url");
    let resource_url = state.storage.public_url(&object_key);

    Ok(Json(PresignedUrlResponse {
        upload_url,
        resource_key: object_key,
        resource_url,
    }))
}
