use std::sync::Arc;

use axum::{
    Json, debug_handler,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{AppError, AppResult};

use super::{
    languages::base_language,
    store::{ChatMessage, ChatStore, PurchaseChat, StoreError},
    translate::TranslationGateway,
};

fn store_error(err: StoreError) -> AppError {
    match err {
        StoreError::PurchaseNotFound(_) => AppError::new(StatusCode::NOT_FOUND, err.to_string()),
        err => err.into(),
    }
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn messages(
    Path(purchase_id): Path<String>,
    State(store): State<Arc<dyn ChatStore>>,
) -> AppResult<Json<Vec<ChatMessage>>> {
    Ok(Json(store.messages_for(&purchase_id).await.map_err(store_error)?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn status(
    Path(purchase_id): Path<String>,
    State(store): State<Arc<dyn ChatStore>>,
) -> AppResult<Json<PurchaseChat>> {
    Ok(Json(store.chat_status(&purchase_id).await.map_err(store_error)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TranslateQuery {
    text: Option<String>,
    texts: Option<Vec<String>>,
    target_lang: Option<String>,
    source_lang: Option<String>,
}

/// Translates UI strings. An item that cannot be translated comes back unchanged.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn translate_texts(
    State(translator): State<TranslationGateway>,
    Json(TranslateQuery { text, texts, target_lang, source_lang }): Json<TranslateQuery>,
) -> AppResult<Json<Value>> {
    let target = target_lang.as_deref().map(base_language).unwrap_or_default();
    if target.is_empty() {
        return Err(AppError::new(StatusCode::BAD_REQUEST, "missing required parameter: targetLang"));
    }
    let source = base_language(source_lang.as_deref().unwrap_or("en"));

    // `text` wins the response shape; `texts` wins the inputs when both are sent
    let text = text.filter(|text| !text.is_empty());
    let single = text.is_some();
    let inputs = texts.or_else(|| text.map(|text| vec![text])).unwrap_or_default();
    if inputs.is_empty() {
        return Err(AppError::new(StatusCode::BAD_REQUEST, "missing required parameters: text or texts"));
    }

    let mut translated = Vec::with_capacity(inputs.len());
    for input in inputs {
        if source == target || input.trim().is_empty() {
            translated.push(input);
            continue;
        }
        match translator.translate(&input, &source, &target).await {
            Ok(output) => translated.push(output),
            Err(err) => {
                tracing::warn!(source, target, "returning original text: {err}");
                translated.push(input);
            }
        }
    }

    if single {
        Ok(Json(json!({ "translatedText": translated.swap_remove(0) })))
    } else {
        Ok(Json(json!({ "translatedTexts": translated })))
    }
}
