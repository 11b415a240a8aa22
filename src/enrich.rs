//! Component E — Enricher.
//!
//! For each model, sequentially (the brain is a non-concurrent resource,
//! `spec.md` §4.E / §9): gather size, fetch docs (D), build the prompt,
//! call the brain (I), parse and merge the response.

use crate::brain::{BrainClient, BrainRequest, ChatMessage};
use crate::config::{BrainConfig, BrainPromptsConfig, ModelInfoSource};
use crate::docs::{fetch_model_markdown, DocCache, MarkdownExtractor};
use crate::model::{FilesSizeGathererConfig, Model, ModelMeta};
use crate::subprocess::gather_size;
use serde_json::Value;

/// Vocabulary the brain is asked to restrict `types` entries to; entries
/// outside this set are dropped rather than rejecting the whole response.
const ALLOWED_TYPES: &[&str] = &[
    "llm", "vlm", "embedder", "reranker", "tts", "asr", "diarize", "cv", "image_gen",
];

pub struct EnrichContext<'a> {
    pub brain_config: &'a BrainConfig,
    pub prompts: &'a BrainPromptsConfig,
    pub sources: &'a [ModelInfoSource],
    pub doc_cache: &'a DocCache,
    pub extractor: &'a dyn MarkdownExtractor,
    pub brain: &'a dyn BrainClient,
}

/// Returns `(enriched, failed)`. A model lands in `failed` exactly when the
/// brain's response contained no entry matching it (`spec.md` §4.E step 7 /
/// §9 open question resolution).
pub async fn enrich_batch(models: Vec<Model>, ctx: &EnrichContext<'_>) -> (Vec<Model>, Vec<Model>) {
    let mut enriched = Vec::with_capacity(models.len());
    let mut failed = Vec::new();

    for mut model in models {
        maybe_gather_size(&mut model).await;

        let snippets = fetch_model_markdown(&model, ctx.sources, ctx.doc_cache, ctx.extractor).await;
        let messages = build_messages(&model, &snippets, ctx.prompts);

        let request = BrainRequest {
            model: ctx.brain_config.id.clone(),
            messages,
            temperature: 0.2,
        };

        let content = match ctx.brain.complete(request).await {
            Ok(Some(c)) => c,
            Ok(None) => {
                tracing::error!(model_id = %model.key.id, "brain returned empty response");
                failed.push(model);
                continue;
            }
            Err(e) => {
                tracing::error!(model_id = %model.key.id, error = %e, "brain call failed");
                failed.push(model);
                continue;
            }
        };

        match extract_matching_meta(&content, &model) {
            Some(incoming_meta) => {
                model.meta.merge_missing(incoming_meta);
                enriched.push(model);
            }
            None => {
                tracing::error!(model_id = %model.key.id, content = %truncate(&content, 200), "brain response had no matching entry");
                failed.push(model);
            }
        }
    }

    (enriched, failed)
}

async fn maybe_gather_size(model: &mut Model) {
    if model.meta.size.is_some() {
        return;
    }
    let gatherer: Option<FilesSizeGathererConfig> = model.provider.files_size_gatherer.clone();
    if let Some(gatherer) = gatherer {
        model.meta.size = gather_size(&gatherer, &model.key.id).await;
    }
}

fn build_messages(
    model: &Model,
    snippets: &[crate::docs::Snippet],
    prompts: &BrainPromptsConfig,
) -> Vec<ChatMessage> {
    let mut messages = vec![
        ChatMessage::system(prompts.system.clone()),
        ChatMessage::user(prompts.user.clone()),
    ];

    for snippet in snippets {
        let prefix = render_template(
            &prompts.model_info_prefix_template,
            &snippet.model_id,
            &model.provider.label,
        );
        messages.push(ChatMessage::user(format!(
            "{}\n\n{}",
            prefix,
            snippet.markdown.trim()
        )));
    }

    let public = model.to_public_value();
    let models_json = serde_json::to_string(&[public]).unwrap_or_else(|_| "[]".to_string());
    messages.push(ChatMessage::user(models_json));

    messages
}

/// Template errors (an unknown `{placeholder}`) degrade gracefully: the raw
/// template is used verbatim if rendering would otherwise fail
/// (`spec.md` §4.E step 3).
fn render_template(template: &str, model_id: &str, provider_label: &str) -> String {
    if template.trim().is_empty() {
        return format!("Model info for {model_id}:");
    }
    template
        .replace("{model_id}", model_id)
        .replace("{provider_label}", provider_label)
}

/// Parse the brain's content, find the entry matching `model` by
/// `(id, base_url)` (open question resolved in DESIGN.md), and build a
/// `ModelMeta` from its extra fields.
fn extract_matching_meta(content: &str, model: &Model) -> Option<ModelMeta> {
    let value = extract_json_value(content)?;
    let entries = as_entry_list(&value)?;

    for entry in entries {
        let obj = entry.as_object()?;
        let id = obj.get("id").and_then(Value::as_str)?;
        let base_url = obj.get("base_url").and_then(Value::as_str)?;
        if id != model.key.id || base_url != model.provider.base_url {
            continue;
        }
        return Some(meta_from_entry(obj, &model.provider.base_url));
    }
    None
}

fn meta_from_entry(obj: &serde_json::Map<String, Value>, base_url: &str) -> ModelMeta {
    let mut meta = ModelMeta::new(base_url);

    if let Some(s) = obj.get("summary").and_then(Value::as_str) {
        if !s.trim().is_empty() {
            meta.summary = Some(s.trim().to_string());
        }
    }
    if let Some(r) = obj.get("recommended_use").and_then(Value::as_str) {
        if !r.trim().is_empty() {
            meta.recommended_use = Some(r.trim().to_string());
        }
    }
    if let Some(p) = obj.get("priority").and_then(Value::as_i64) {
        meta.priority = Some(p);
    }
    if let Some(s) = obj.get("size").and_then(Value::as_i64) {
        meta.size = Some(s);
    }

    let types_raw = match obj.get("types") {
        Some(Value::Array(arr)) => arr.clone(),
        Some(Value::String(s)) => vec![Value::String(s.clone())],
        _ => Vec::new(),
    };
    let mut types: Vec<String> = types_raw
        .iter()
        .filter_map(Value::as_str)
        .map(|t| t.trim().to_lowercase())
        .filter(|t| ALLOWED_TYPES.contains(&t.as_str()))
        .collect();
    types.sort();
    types.dedup();
    if !types.is_empty() {
        meta.types = Some(types);
    }

    for (k, v) in obj {
        if matches!(
            k.as_str(),
            "id" | "base_url" | "provider" | "internal_base_url" | "summary" | "recommended_use"
                | "priority" | "size" | "types"
        ) {
            continue;
        }
        meta.extra.insert(k.clone(), v.clone());
    }

    meta
}

fn as_entry_list(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(arr) => Some(arr.clone()),
        Value::Object(obj) => match obj.get("enriched") {
            Some(Value::Array(arr)) => Some(arr.clone()),
            _ => None,
        },
        _ => None,
    }
}

/// Strip markdown fences, then find the widest balanced `{...}`/`[...]`
/// span and parse it (`spec.md` §4.E step 5).
fn extract_json_value(content: &str) -> Option<Value> {
    let stripped = strip_markdown_fence(content);
    if let Ok(v) = serde_json::from_str::<Value>(&stripped) {
        return Some(v);
    }

    let obj_span = balanced_span(&stripped, '{', '}');
    let list_span = balanced_span(&stripped, '[', ']');

    let candidate = match (obj_span, list_span) {
        (Some(o), Some(l)) if l.len() > o.len() => l,
        (Some(o), Some(_)) => o,
        (Some(o), None) => o,
        (None, Some(l)) => l,
        (None, None) => return None,
    };

    serde_json::from_str(&candidate).ok()
}

fn strip_markdown_fence(text: &str) -> String {
    let trimmed = text.trim();
    if let Some(inner) = trimmed.strip_prefix("```json") {
        return inner.trim().trim_end_matches("```").trim().to_string();
    }
    if let Some(inner) = trimmed.strip_prefix("```") {
        return inner.trim().trim_end_matches("```").trim().to_string();
    }
    trimmed.to_string()
}

fn balanced_span(text: &str, open: char, close: char) -> Option<String> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end <= start {
        return None;
    }
    Some(text[start..=end].to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max])
    }
}
