use api_types::{ImageRecord, ListImagesQuery, ListImagesResponse, MessageResponse};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State, multipart::Field},
    http::StatusCode,
    middleware,
    routing::{get, post},
};
use tracing::instrument;

use super::error::{ErrorResponse, catalog_error, multipart_error};
use crate::{
    AppState,
    catalog::{CatalogError, CatalogService, ListQuery, NewImage},
    middleware::rate_limit,
};

/// Headroom for the text fields and part headers around the image itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn router(state: &AppState) -> Router<AppState> {
    let upload = Router::new()
        .route("/images/upload", post(upload_image))
        .route_layer(middleware::from_fn_with_state(
            state.upload_limiter().clone(),
            rate_limit::enforce,
        ))
        .layer(DefaultBodyLimit::max(
            state.catalog().max_upload_bytes() + MULTIPART_OVERHEAD_BYTES,
        ));

    Router::new()
        .route("/images", get(list_images))
        .route("/images/{id}", get(get_image).delete(delete_image))
        .merge(upload)
}

#[instrument(name = "images.list", skip(state))]
async fn list_images(
    State(state): State<AppState>,
    Query(query): Query<ListImagesQuery>,
) -> Result<Json<ListImagesResponse>, ErrorResponse> {
    let response = state
        .catalog()
        .list(ListQuery::from(query))
        .await
        .map_err(|e| catalog_error(e, "Failed to fetch images", state.environment()))?;

    Ok(Json(response))
}

#[instrument(name = "images.get", skip(state, id), fields(image_id = %id))]
async fn get_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ImageRecord>, ErrorResponse> {
    let record = state
        .catalog()
        .get(&id)
        .await
        .map_err(|e| catalog_error(e, "Failed to fetch image", state.environment()))?;

    Ok(Json(record))
}

#[instrument(name = "images.upload", skip(state, multipart))]
async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ImageRecord>), ErrorResponse> {
    let upload = read_upload_form(state.catalog(), &mut multipart)
        .await
        .map_err(|e| match e {
            FormError::Multipart(e) => multipart_error(e),
            FormError::Catalog(e) => catalog_error(e, "Failed to upload image", state.environment()),
        })?;

    let record = state
        .catalog()
        .upload(upload)
        .await
        .map_err(|e| catalog_error(e, "Failed to upload image", state.environment()))?;

    Ok((StatusCode::CREATED, Json(record)))
}

#[instrument(name = "images.delete", skip(state, id), fields(image_id = %id))]
async fn delete_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ErrorResponse> {
    state
        .catalog()
        .delete(&id)
        .await
        .map_err(|e| catalog_error(e, "Failed to delete image", state.environment()))?;

    Ok(Json(MessageResponse::new("Image deleted successfully")))
}

enum FormError {
    Multipart(axum::extract::multipart::MultipartError),
    Catalog(CatalogError),
}

impl From<axum::extract::multipart::MultipartError> for FormError {
    fn from(e: axum::extract::multipart::MultipartError) -> Self {
        FormError::Multipart(e)
    }
}

impl From<CatalogError> for FormError {
    fn from(e: CatalogError) -> Self {
        FormError::Catalog(e)
    }
}

/// Reads the `image` part plus the `title`, `description` and `tags` text fields.
///
/// The image's declared content type is checked before its body is read, and the
/// body is abandoned as soon as it passes the size ceiling.
async fn read_upload_form(
    catalog: &CatalogService,
    multipart: &mut Multipart,
) -> Result<NewImage, FormError> {
    let mut file: Option<(String, String, Vec<u8>)> = None;
    let mut title = None;
    let mut description = None;
    let mut tags = None;

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                if file.is_some() {
                    return Err(CatalogError::MultipleFiles.into());
                }
                let content_type = field.content_type().unwrap_or_default().to_string();
                catalog.check_content_type(&content_type)?;
                let original_name = field
                    .file_name()
                    .filter(|n| !n.is_empty())
                    .unwrap_or("upload")
                    .to_string();
                let bytes = read_limited(&mut field, catalog.max_upload_bytes()).await?;
                file = Some((original_name, content_type, bytes));
            }
            "title" => title = Some(field.text().await?),
            "description" => description = Some(field.text().await?),
            "tags" => tags = Some(field.text().await?),
            _ => {}
        }
    }

    let (original_name, content_type, bytes) = file.ok_or(CatalogError::MissingFile)?;
    Ok(NewImage {
        bytes,
        original_name,
        content_type,
        title,
        description,
        tags,
    })
}

async fn read_limited(field: &mut Field<'_>, limit: usize) -> Result<Vec<u8>, FormError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.chunk().await? {
        if bytes.len() + chunk.len() > limit {
            return Err(CatalogError::FileTooLarge { limit }.into());
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}
