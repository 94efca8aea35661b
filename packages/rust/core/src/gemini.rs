//! Gemini REST client for tender structuring and digests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header::RETRY_AFTER};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tenderwatch_shared::{EnrichedTender, GeminiConfig, Result, TenderWatchError};
use tracing::debug;

use crate::model::{CallError, StructuringModel};

/// Longest error body quoted back in a [`CallError`].
const MAX_ERROR_BODY: usize = 300;

/// Gemini `generateContent` client authenticated with an API key.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig, api_key: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TenderWatchError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    /// Send one request and return the concatenated text parts.
    async fn generate(&self, request: &GenerateRequest) -> std::result::Result<String, CallError> {
        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| CallError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let header_wait = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body, header_wait));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| CallError::InvalidResponse(format!("undecodable response: {e}")))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .map(|c| c.content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(CallError::InvalidResponse("empty response text".into()));
        }
        Ok(text)
    }
}

#[async_trait]
impl StructuringModel for GeminiClient {
    async fn structure(&self, entry: &str) -> std::result::Result<EnrichedTender, CallError> {
        let prompt = format!(
            "Analiza este XML y extrae los datos tecnicos.\n\
             IMPORTANTE: Prioriza la provincia del lugar de ejecucion, no la sede del organo.\n\
             XML:\n{entry}"
        );
        let request = GenerateRequest::new(prompt, Some(tender_schema()));

        let text = self.generate(&request).await?;
        debug!(chars = text.len(), "structured response received");

        serde_json::from_str(text.trim())
            .map_err(|e| CallError::InvalidResponse(format!("tender JSON: {e}")))
    }

    async fn summarize(
        &self,
        tenders: &[EnrichedTender],
        period: &str,
    ) -> std::result::Result<String, CallError> {
        let request = GenerateRequest::new(digest_prompt(tenders, period), None);
        self.generate(&request).await
    }
}

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    status: String,
    #[serde(default)]
    details: Vec<Value>,
}

/// Map a non-success response to a [`CallError`].
fn classify_failure(status: StatusCode, body: &str, header_wait: Option<Duration>) -> CallError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let exhausted = body.contains("RESOURCE_EXHAUSTED")
        || envelope
            .as_ref()
            .is_some_and(|e| e.error.status == "RESOURCE_EXHAUSTED");

    let message = format!("HTTP {status}: {}", truncate(body, MAX_ERROR_BODY));

    if status == StatusCode::TOO_MANY_REQUESTS || exhausted {
        let hinted = envelope.as_ref().and_then(|e| retry_delay(&e.error.details));
        return CallError::RateLimited {
            message,
            retry_after: hinted.or(header_wait),
        };
    }
    CallError::Transient(message)
}

/// `retryDelay` of the `RetryInfo` detail, e.g. `"5s"` or `"1.5s"`.
fn retry_delay(details: &[Value]) -> Option<Duration> {
    details
        .iter()
        .find(|d| {
            d.get("@type")
                .and_then(Value::as_str)
                .is_some_and(|t| t.contains("RetryInfo"))
        })
        .and_then(|d| d.get("retryDelay"))
        .and_then(Value::as_str)
        .and_then(|raw| raw.trim().trim_end_matches('s').parse::<f64>().ok())
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

impl GenerateRequest {
    fn new(prompt: String, schema: Option<Value>) -> Self {
        Self {
            contents: vec![Content {
                role: "user".into(),
                parts: vec![Part { text: prompt }],
            }],
            generation_config: schema.map(|schema| GenerationConfig {
                response_mime_type: "application/json".into(),
                response_schema: schema,
            }),
        }
    }
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: Value,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

fn tender_schema() -> Value {
    let text = |description: &str| json!({ "type": "STRING", "description": description });
    json!({
        "type": "OBJECT",
        "properties": {
            "id": text("Numero de Expediente."),
            "title": text("Titulo de la licitacion."),
            "summary": text("Resumen de la licitacion."),
            "publicationDate": text("Fecha de publicacion."),
            "contractingAuthority": text("Organo de contratacion."),
            "province": text("Provincia del LUGAR DE EJECUCION."),
            "budget": { "type": "NUMBER", "description": "Presupuesto base (sin impuestos)." },
            "currency": text("Moneda (EUR)."),
            "deadline": text("Fecha fin de presentacion."),
            "link": text("Enlace a la licitacion."),
            "cpvCodes": { "type": "ARRAY", "items": { "type": "STRING" } },
            "status": { "type": "STRING" },
            "executionPeriod": { "type": "STRING" },
            "procedure": { "type": "STRING" },
            "awardCriteria": { "type": "STRING" },
            "provisionalGuarantee": { "type": "STRING" },
            "solvency": { "type": "STRING" }
        },
        "required": ["id", "title", "summary", "contractingAuthority", "province", "link", "cpvCodes", "status"]
    })
}

fn digest_prompt(tenders: &[EnrichedTender], period: &str) -> String {
    let listing: Vec<Value> = tenders
        .iter()
        .map(|t| {
            json!({
                "titulo": t.title,
                "organismo": t.contracting_authority,
                "provincia": t.province,
                "presupuesto": t.budget,
                "fecha_publicacion": t.publication_date,
                "plazo_presentacion": t.deadline,
                "plazo_ejecucion": t.execution_period,
                "cpv": t.cpv_codes.join(", "),
                "enlace": t.link,
            })
        })
        .collect();
    let listing = serde_json::to_string_pretty(&listing).unwrap_or_default();

    format!(
        "Genera un resumen profesional en HTML para un email informativo de licitaciones publicas.\n\
         Fecha de datos: {period}\n\n\
         INSTRUCCIONES DE FORMATO:\n\
         - Usa HTML con estilos inline para que se vea bien en clientes de email\n\
         - Para cada licitacion, crea un bloque con borde y padding\n\
         - Incluye: Titulo (en negrita), Organismo, Provincia, Presupuesto (formateado con EUR), \
         Fecha publicacion, Codigos CPV, Plazo para presentar ofertas, Plazo de ejecucion, \
         Enlace al expediente (como link clickable)\n\
         - Al inicio pon un resumen: \"Se han encontrado {count} licitaciones relevantes\"\n\n\
         Licitaciones:\n{listing}",
        count = tenders.len(),
    )
}
