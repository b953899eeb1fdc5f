/// Content-based classification through a local LLM service.
///
/// The adapter sends the closed taxonomy, the original file name and a content
/// snippet to the service, asks for a JSON object `{"category", "new_name"}`,
/// and validates what comes back. It never fails towards its caller: transport
/// errors, timeouts and malformed answers all produce
/// [`Classification::Degraded`] carrying the safe default
/// `{category: Others, suggested_name: <original name>}`.
use crate::category::{Category, Taxonomy};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Default Ollama endpoint.
pub const DEFAULT_HOST: &str = "http://localhost:11434";

/// Default model name.
pub const DEFAULT_MODEL: &str = "llama3";

/// Errors raised while talking to the classification service.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("classification service is not reachable at {0}")]
    Connection(String),

    #[error("classification request timed out after {0}s")]
    Timeout(u64),

    #[error("classification service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("malformed service response: {0}")]
    MalformedResponse(String),

    #[error("classification answer is not valid JSON: {0}")]
    InvalidJson(String),
}

/// A chat-style LLM endpoint that answers with a JSON document.
///
/// Implemented by [`OllamaClient`]; tests substitute scripted fakes.
pub trait LlmClient {
    /// Sends `prompt` and returns the raw text of the model's reply.
    fn chat_json(&self, prompt: &str) -> Result<String, ClassifyError>;
}

impl<T: LlmClient + ?Sized> LlmClient for Box<T> {
    fn chat_json(&self, prompt: &str) -> Result<String, ClassifyError> {
        (**self).chat_json(prompt)
    }
}

/// Connection settings for [`OllamaClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub host: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.1,
            timeout_secs: 120,
        }
    }
}

/// Blocking HTTP client for Ollama's `/api/chat` endpoint.
pub struct OllamaClient {
    base_url: String,
    model: String,
    temperature: f32,
    timeout_secs: u64,
    client: reqwest::blocking::Client,
}

/// Request body for `/api/chat`.
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    format: &'a str,
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

/// Response body from `/api/chat`.
#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl OllamaClient {
    /// Creates a client with a per-request timeout.
    pub fn new(settings: &ClientSettings) -> Result<Self, ClassifyError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| ClassifyError::HttpClient(e.to_string()))?;

        let host = settings.host.trim();
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", host.trim_end_matches('/'))
        };

        Ok(Self {
            base_url,
            model: settings.model.clone(),
            temperature: settings.temperature,
            timeout_secs: settings.timeout_secs,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl LlmClient for OllamaClient {
    fn chat_json(&self, prompt: &str) -> Result<String, ClassifyError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            format: "json",
            stream: false,
            options: ChatOptions {
                temperature: self.temperature,
            },
        };

        let response = self.client.post(&url).json(&body).send().map_err(|e| {
            if e.is_timeout() {
                ClassifyError::Timeout(self.timeout_secs)
            } else if e.is_connect() {
                ClassifyError::Connection(self.base_url.clone())
            } else {
                ClassifyError::HttpClient(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ClassifyError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| ClassifyError::MalformedResponse(e.to_string()))?;

        Ok(parsed.message.content)
    }
}

/// A category choice plus the proposed file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    pub category: Category,
    /// Free-form name proposal; its extension is ignored at placement time.
    pub suggested_name: String,
}

impl ClassificationResult {
    /// The safe default used whenever the service cannot be trusted.
    pub fn fallback(filename: &str) -> Self {
        Self {
            category: Category::fallback(),
            suggested_name: filename.to_string(),
        }
    }
}

/// Outcome of a content classification.
#[derive(Debug)]
pub enum Classification {
    /// The service answered with a usable result.
    Accepted(ClassificationResult),
    /// The service failed; the fallback result is used instead.
    Degraded {
        result: ClassificationResult,
        error: ClassifyError,
    },
}

impl Classification {
    pub fn result(&self) -> &ClassificationResult {
        match self {
            Classification::Accepted(result) => result,
            Classification::Degraded { result, .. } => result,
        }
    }

    pub fn into_result(self) -> ClassificationResult {
        match self {
            Classification::Accepted(result) => result,
            Classification::Degraded { result, .. } => result,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Classification::Degraded { .. })
    }
}

/// The JSON object the model is asked to produce.
#[derive(Debug, Deserialize)]
struct ServiceAnswer {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    new_name: Option<String>,
}

/// Builds prompts, calls an [`LlmClient`] and validates the answer.
pub struct ContentClassifier<C> {
    client: C,
    taxonomy: Taxonomy,
}

impl<C: LlmClient> ContentClassifier<C> {
    pub fn new(client: C, taxonomy: Taxonomy) -> Self {
        Self { client, taxonomy }
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// Classifies a file from its name and (possibly empty) snippet.
    pub fn classify(&self, filename: &str, snippet: &str) -> Classification {
        let prompt = build_prompt(&self.taxonomy, filename, snippet);

        let outcome = self
            .client
            .chat_json(&prompt)
            .and_then(|raw| self.interpret(filename, &raw));

        match outcome {
            Ok(result) => {
                debug!(
                    file = filename,
                    category = %result.category,
                    suggested = %result.suggested_name,
                    "content classification accepted"
                );
                Classification::Accepted(result)
            }
            Err(error) => {
                warn!(file = filename, error = %error, "content classification degraded to Others");
                Classification::Degraded {
                    result: ClassificationResult::fallback(filename),
                    error,
                }
            }
        }
    }

    /// Convenience form of [`classify`](Self::classify) that drops the diagnostic.
    pub fn classify_by_content(&self, filename: &str, snippet: &str) -> ClassificationResult {
        self.classify(filename, snippet).into_result()
    }

    /// Parses the model's reply.
    ///
    /// Unparseable replies are errors. A parseable reply with a category
    /// outside the taxonomy keeps its name but falls back to `Others`; a
    /// missing or blank name falls back to the original file name.
    fn interpret(&self, filename: &str, raw: &str) -> Result<ClassificationResult, ClassifyError> {
        let answer: ServiceAnswer = serde_json::from_str(strip_code_fence(raw))
            .map_err(|e| ClassifyError::InvalidJson(e.to_string()))?;

        let category = match answer.category.as_deref().and_then(|c| self.taxonomy.get(c)) {
            Some(category) => category.clone(),
            None => {
                warn!(
                    file = filename,
                    category = answer.category.as_deref().unwrap_or("<missing>"),
                    "category outside taxonomy, using Others"
                );
                Category::fallback()
            }
        };

        let suggested_name = answer
            .new_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| filename.to_string());

        Ok(ClassificationResult {
            category,
            suggested_name,
        })
    }
}

/// Removes a surrounding Markdown code fence some models add despite instructions.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Renders the classification prompt.
pub fn build_prompt(taxonomy: &Taxonomy, filename: &str, snippet: &str) -> String {
    let categories = taxonomy
        .entries()
        .iter()
        .map(|c| format!("- {c}"))
        .collect::<Vec<_>>()
        .join("\n");
    let snippet = if snippet.trim().is_empty() {
        "(no readable content)"
    } else {
        snippet
    };

    format!(
        r#"You sort files into folders based on their name and content.

Allowed categories (pick exactly one, spelled exactly as listed):
{categories}

File name: "{filename}"
Content excerpt:
"""
{snippet}
"""

Rules:
1. Choose the single best category from the list above. Use "Others" when unsure.
2. Propose a short, descriptive English file name in snake_case (for example "invoice_march_2024").
3. The original extension will be kept automatically; do not rely on it.

Reply with a JSON object only, no Markdown:
{{"category": "<one of the allowed categories>", "new_name": "<snake_case_name>"}}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Replies with a fixed script and records the prompts it saw.
    struct ScriptedClient {
        reply: Result<String, fn() -> ClassifyError>,
        prompts: RefCell<Vec<String>>,
    }

    impl ScriptedClient {
        fn answering(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                prompts: RefCell::new(Vec::new()),
            }
        }

        fn failing(error: fn() -> ClassifyError) -> Self {
            Self {
                reply: Err(error),
                prompts: RefCell::new(Vec::new()),
            }
        }
    }

    impl LlmClient for ScriptedClient {
        fn chat_json(&self, prompt: &str) -> Result<String, ClassifyError> {
            self.prompts.borrow_mut().push(prompt.to_string());
            match &self.reply {
                Ok(reply) => Ok(reply.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    fn classifier(client: ScriptedClient) -> ContentClassifier<ScriptedClient> {
        ContentClassifier::new(client, Taxonomy::default())
    }

    #[test]
    fn test_valid_answer_is_accepted() {
        let c = classifier(ScriptedClient::answering(
            r#"{"category": "Career/Documents", "new_name": "invoice_march_2024.pdf"}"#,
        ));
        let classification = c.classify("invoice.pdf", "Invoice #123, Due March 2024");

        assert!(!classification.is_degraded());
        let result = classification.result();
        assert_eq!(result.category.as_str(), "Career/Documents");
        assert_eq!(result.suggested_name, "invoice_march_2024.pdf");
    }

    #[test]
    fn test_prompt_carries_taxonomy_name_and_snippet() {
        let c = classifier(ScriptedClient::answering(r#"{"category":"Others","new_name":"x"}"#));
        c.classify("invoice.pdf", "Invoice #123");

        let prompts = c.client.prompts.borrow();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("- Programming/Python"));
        assert!(prompts[0].contains("\"invoice.pdf\""));
        assert!(prompts[0].contains("Invoice #123"));
    }

    #[test]
    fn test_empty_snippet_is_marked_in_prompt() {
        let prompt = build_prompt(&Taxonomy::default(), "mystery.bin", "  ");
        assert!(prompt.contains("(no readable content)"));
    }

    #[test]
    fn test_timeout_degrades_to_others_with_original_name() {
        let c = classifier(ScriptedClient::failing(|| ClassifyError::Timeout(120)));
        let classification = c.classify("mystery.bin", "");

        assert!(classification.is_degraded());
        assert_eq!(
            classification.into_result(),
            ClassificationResult::fallback("mystery.bin")
        );
    }

    #[test]
    fn test_non_json_answer_degrades() {
        let c = classifier(ScriptedClient::answering("I think this is a CV."));
        let classification = c.classify("cv.docx", "Curriculum vitae");

        match classification {
            Classification::Degraded { result, error } => {
                assert_eq!(result.category.as_str(), "Others");
                assert_eq!(result.suggested_name, "cv.docx");
                assert!(matches!(error, ClassifyError::InvalidJson(_)));
            }
            Classification::Accepted(_) => panic!("expected degraded classification"),
        }
    }

    #[test]
    fn test_unknown_category_falls_back_but_keeps_name() {
        let c = classifier(ScriptedClient::answering(
            r#"{"category": "../../etc", "new_name": "passwd"}"#,
        ));
        let result = c.classify_by_content("notes.txt", "root:x:0:0");

        assert_eq!(result.category.as_str(), "Others");
        assert_eq!(result.suggested_name, "passwd");
    }

    #[test]
    fn test_missing_name_uses_original() {
        let c = classifier(ScriptedClient::answering(r#"{"category": "Programming/Python"}"#));
        let result = c.classify_by_content("sort.py", "def quicksort(xs):");

        assert_eq!(result.category.as_str(), "Programming/Python");
        assert_eq!(result.suggested_name, "sort.py");
    }

    #[test]
    fn test_code_fenced_answer_is_accepted() {
        let c = classifier(ScriptedClient::answering(
            "```json\n{\"category\": \"University/Homework\", \"new_name\": \"hw3\"}\n```",
        ));
        let result = c.classify_by_content("hw.txt", "Exercise 3");
        assert_eq!(result.category.as_str(), "University/Homework");
    }

    #[test]
    fn test_media_answer_is_passed_through_unchanged() {
        // Downgrading media is the orchestrator's job, not the adapter's.
        let c = classifier(ScriptedClient::answering(
            r#"{"category": "Media/Images", "new_name": "diagram"}"#,
        ));
        let result = c.classify_by_content("diagram.txt", "");
        assert!(result.category.is_media());
    }

    #[test]
    fn test_ollama_client_normalizes_host() {
        let settings = ClientSettings {
            host: "localhost:11434/".to_string(),
            ..ClientSettings::default()
        };
        let client = OllamaClient::new(&settings).unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_unreachable_service_degrades() {
        let settings = ClientSettings {
            // Port 9 (discard) is essentially never serving HTTP locally.
            host: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
            ..ClientSettings::default()
        };
        let c = ContentClassifier::new(OllamaClient::new(&settings).unwrap(), Taxonomy::default());
        let classification = c.classify("report.pdf", "text");
        assert!(classification.is_degraded());
        assert_eq!(classification.result().suggested_name, "report.pdf");
    }
}
