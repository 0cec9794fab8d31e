//! HTTP boundary: submit / poll / download. The handlers stay thin; every
//! decision of substance lives in the task managers.

use std::path::Path as FsPath;
use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use declara_core::types::{DecimalSeparator, HeaderData, RunParameters};
use declara_core::ConversionRequest;
use declara_portal::agent::AccountRef;
use declara_portal::config::RunMode;
use declara_portal::task::AutomationRequest;

use crate::state::AppState;

const ALLOWED_EXTENSIONS: [&str; 4] = ["csv", "txt", "xlsx", "xls"];

type ApiError = (StatusCode, Json<serde_json::Value>);

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message.into() })),
    )
}

fn not_found(message: impl Into<String>) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": message.into() })),
    )
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/conversions", post(submit_conversion))
        .route("/conversions/{id}", get(conversion_status))
        .route("/downloads/{filename}", get(download))
        .route("/automations", post(submit_automation))
        .route("/automations/{id}", get(automation_status))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    task_id: Uuid,
}

/// Strips any path components an upload name might smuggle in.
fn sanitize_filename(name: &str) -> String {
    name.rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .replace("..", "")
}

async fn submit_conversion(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<SubmitResponse>, ApiError> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    let mut form = std::collections::HashMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| bad_request(format!("multipart inválido: {err}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let filename = sanitize_filename(field.file_name().unwrap_or_default());
            let bytes = field
                .bytes()
                .await
                .map_err(|err| bad_request(format!("falha ao receber arquivo: {err}")))?;
            upload = Some((filename, bytes.to_vec()));
        } else {
            let value = field
                .text()
                .await
                .map_err(|err| bad_request(format!("campo '{name}' inválido: {err}")))?;
            form.insert(name, value);
        }
    }

    let (filename, bytes) = upload.ok_or_else(|| bad_request("Nenhum arquivo enviado"))?;
    let extension = FsPath::new(&filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if filename.is_empty() || !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(bad_request("Arquivo inválido"));
    }

    let stored_name = format!("{}_{filename}", Uuid::new_v4());
    let input_path = state.storage.uploads_dir.join(stored_name);
    tokio::fs::write(&input_path, &bytes).await.map_err(|err| {
        warn!(%err, "failed to persist upload");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Falha ao gravar o arquivo enviado" })),
        )
    })?;

    let form_value = |key: &str| form.get(key).cloned().unwrap_or_default();
    let header = HeaderData {
        inscricao_municipal: form_value("inscricao_municipal"),
        mes: form_value("mes"),
        ano: form_value("ano"),
        razao_social: form_value("razao_social"),
        codigo_servico: form_value("codigo_servico"),
    };
    let decimal_separator = form
        .get("separador_decimal")
        .map(String::as_str)
        .map(DecimalSeparator::try_from)
        .transpose()
        .map_err(bad_request)?
        .unwrap_or(DecimalSeparator::Comma);
    let params = RunParameters {
        decimal_separator,
        validate_check_digits: form_value("digito_verificador").eq_ignore_ascii_case("sim"),
    };

    let task_id = state.conversions.submit(ConversionRequest {
        input_path,
        header,
        params,
    });
    Ok(Json(SubmitResponse { task_id }))
}

async fn conversion_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .conversions
        .status(&id)
        .map(Json)
        .ok_or_else(|| not_found("Tarefa não encontrada"))
}

async fn download(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let safe_name = sanitize_filename(&filename);
    if safe_name.is_empty() || safe_name != filename {
        return Err(bad_request("Nome de arquivo inválido"));
    }

    let path = state.storage.downloads_dir.join(&safe_name);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| not_found("Arquivo não encontrado"))?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{safe_name}\""),
            ),
        ],
        bytes,
    ))
}

#[derive(Debug, Deserialize)]
struct AutomationPayload {
    filename: String,
    inscricao_municipal: String,
    #[serde(default)]
    cnpj: Option<String>,
    #[serde(default = "default_mode")]
    mode: RunMode,
}

fn default_mode() -> RunMode {
    RunMode::Production
}

async fn submit_automation(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AutomationPayload>,
) -> Result<Json<SubmitResponse>, ApiError> {
    if payload.filename.trim().is_empty() {
        return Err(bad_request("Nome do arquivo ausente"));
    }
    if payload.inscricao_municipal.trim().is_empty() {
        return Err(bad_request("Inscrição Municipal obrigatória"));
    }

    let safe_name = sanitize_filename(&payload.filename);
    let file_path = state.storage.downloads_dir.join(&safe_name);
    if !file_path.is_file() {
        return Err(not_found("Arquivo não encontrado"));
    }

    let task_id = state.automations.submit(AutomationRequest {
        file_path,
        account: AccountRef {
            inscricao: Some(payload.inscricao_municipal.trim().to_string()),
            cnpj: payload.cnpj,
        },
        mode: payload.mode,
    });
    Ok(Json(SubmitResponse { task_id }))
}

async fn automation_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .automations
        .status(&id)
        .map(Json)
        .ok_or_else(|| not_found("Tarefa não encontrada"))
}
