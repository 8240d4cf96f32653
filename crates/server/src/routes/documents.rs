//! Document listing, content and creation.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use docbridge_shared::{
    CreateDocumentRequest, CreateDocumentResponse, DocumentContentResponse, DocumentRef,
    ListDocumentsQuery, ROOT_FOLDER,
};

use crate::middleware::Session;
use crate::problem::{ApiResult, Problem};
use crate::state::AppState;

fn text(doc: &aurora_db::Document, field: &str) -> String {
    doc.data
        .get(field)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

fn folder_or_root(folder_id: Option<String>) -> String {
    folder_id
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| ROOT_FOLDER.to_string())
}

pub async fn list_documents(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<ListDocumentsQuery>,
) -> ApiResult<Json<Vec<DocumentRef>>> {
    let folder_id = folder_or_root(query.folder_id);
    tracing::debug!("Client '{}' listing folder '{}'", session.client_id, folder_id);

    let docs = state
        .db
        .query("documents")
        .filter(|f| f.eq("folder_id", folder_id.clone()))
        .collect()
        .await
        .map_err(|e| Problem::internal("Database error", e))?;

    let mut documents: Vec<DocumentRef> = docs
        .iter()
        .map(|doc| DocumentRef::new(text(doc, "id"), text(doc, "name"), text(doc, "mime_type")))
        .collect();
    documents.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

    Ok(Json(documents))
}

pub async fn document_content(
    State(state): State<AppState>,
    session: Session,
    Path(document_id): Path<String>,
) -> ApiResult<Json<DocumentContentResponse>> {
    tracing::debug!("Client '{}' fetching '{}'", session.client_id, document_id);

    let doc = state
        .db
        .query("documents")
        .filter(|f| f.eq("id", document_id.clone()))
        .collect()
        .await
        .map_err(|e| Problem::internal("Database error", e))?
        .into_iter()
        .next()
        .ok_or_else(|| Problem::not_found(format!("document {document_id} not found")))?;

    let content = text(&doc, "content");
    Ok(Json(DocumentContentResponse {
        id: document_id,
        content: (!content.is_empty()).then_some(content),
    }))
}

pub async fn create_document(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<CreateDocumentRequest>,
) -> ApiResult<(StatusCode, Json<CreateDocumentResponse>)> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(Problem::bad_request("name is required"));
    }
    let mime_type = match payload.mime_type.trim() {
        "" => "text/plain",
        other => other,
    };
    let folder_id = folder_or_root(payload.folder_id);
    let id = uuid::Uuid::new_v4().to_string();

    state
        .db
        .insert_into(
            "documents",
            vec![
                ("id", id.clone().into()),
                ("folder_id", folder_id.clone().into()),
                ("name", name.to_string().into()),
                ("mime_type", mime_type.to_string().into()),
                ("content", payload.content.into()),
                ("created_at", chrono::Utc::now().to_rfc3339().into()),
            ],
        )
        .await
        .map_err(|e| Problem::internal("Database error", e))?;

    tracing::info!(
        "Client '{}' created document '{}' in folder '{}'",
        session.client_id,
        id,
        folder_id
    );
    Ok((StatusCode::CREATED, Json(DocumentRef::new(id, name, mime_type))))
}
