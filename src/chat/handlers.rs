//! Handlers for the in-chat commands.
//!
//! Each handler runs its command to completion and returns the text of one
//! final assistant message. Failures are folded into that text; nothing here
//! returns an error.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::calculator;
use crate::chat::orchestrator::{collect, send_cancellable};
use crate::chat::router::Command;
use crate::client::InferenceBackend;
use crate::observability::COMMANDS_HANDLED;
use crate::retrieval::{ContentRetriever, SearchResults, search_and_fetch};
use crate::types::InferenceRequest;

/// Reply after the backend context was reset.
pub const CLEAR_SUCCEEDED: &str = "🧹 **Memory Cleared!** Context has been reset.";
/// Reply when the backend context could not be reset.
pub const CLEAR_FAILED: &str = "❌ Failed to clear context. Please try again.";
/// Reply when a search found nothing.
pub const SEARCH_NO_RESULTS: &str = "❌ Maaf, saya tidak menemukan hasil yang relevan di internet.";
/// Reply when no search result could be downloaded.
pub const SEARCH_NO_CONTENT: &str =
    "❌ Maaf, tidak dapat mengunduh konten dari website yang ditemukan.";
/// Reply when a page given to `/web` could not be read.
pub const WEB_NO_CONTENT: &str =
    "❌ Maaf, saya tidak dapat mengakses atau memproses konten dari URL tersebut.";
/// Shown in place of a calculator explanation the backend could not give.
pub const EXPLANATION_UNAVAILABLE: &str = "Maaf, tidak dapat memberikan penjelasan saat ini.";

/// Runs commands against the backend and the content retriever.
#[derive(Clone)]
pub struct CommandHandlers {
    backend: Arc<dyn InferenceBackend>,
    retriever: Arc<dyn ContentRetriever>,
    search_fan_out: usize,
}

impl CommandHandlers {
    /// Creates handlers that download the top `search_fan_out` search results.
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        retriever: Arc<dyn ContentRetriever>,
        search_fan_out: usize,
    ) -> Self {
        Self {
            backend,
            retriever,
            search_fan_out,
        }
    }

    /// Run `command` and return its reply, or `None` for plain chat.
    pub async fn handle(
        &self,
        command: &Command,
        model: &str,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let reply = match command {
            Command::Chat => return None,
            Command::Usage(guidance) => guidance.to_string(),
            Command::Clear => self.clear(model, cancel).await,
            Command::Search { query } => self.search(query, model, cancel).await,
            Command::Web { question, url } => self.web(question, url, model, cancel).await,
            Command::Calculate { expression } => self.calculate(expression, model, cancel).await,
        };
        COMMANDS_HANDLED.click();
        debug!(command = command.name(), "command handled");
        Some(reply)
    }

    /// Reset the backend's conversation context.
    pub async fn clear(&self, model: &str, cancel: &CancellationToken) -> String {
        match send_cancellable(self.backend.as_ref(), InferenceRequest::clear(model), cancel).await
        {
            Ok(_) => CLEAR_SUCCEEDED.to_string(),
            Err(err) => {
                warn!(error = %err, "clearing context failed");
                CLEAR_FAILED.to_string()
            }
        }
    }

    /// Search the web, read the top results, and answer from them.
    pub async fn search(&self, query: &str, model: &str, cancel: &CancellationToken) -> String {
        let pages =
            match search_and_fetch(self.retriever.as_ref(), query, self.search_fan_out, cancel)
                .await
            {
                SearchResults::NoResults => return SEARCH_NO_RESULTS.to_string(),
                SearchResults::NoContent => return SEARCH_NO_CONTENT.to_string(),
                SearchResults::Pages(pages) => pages,
            };
        info!(query, pages = pages.len(), "answering from search results");

        let mut combined = String::new();
        for (i, page) in pages.iter().enumerate() {
            combined.push_str(&format!(
                "\n--- WEBSITE {}: {} ---\n{}\n\n",
                i + 1,
                page.url,
                page.content
            ));
        }
        let prompt = format!(
            "Berdasarkan konten lengkap dari website yang telah diunduh berikut. Jawab  dengan informasi yang akurat \n\n{combined}\n--- PERTANYAAN PENGGUNA ---\n{query}\n\nBerikan jawaban yang informatif dan lengkap berdasarkan konten website yang telah diunduh:"
        );
        let answer = collect(
            self.backend.as_ref(),
            InferenceRequest::new(prompt, model),
            cancel,
        )
        .await;
        let sources: Vec<&str> = pages.iter().map(|page| page.url.as_str()).collect();
        format!("{answer}\n\n📖 **Sumber:**\n{}", sources.join("\n"))
    }

    /// Answer `question` from the content of `url`.
    pub async fn web(
        &self,
        question: &str,
        url: &str,
        model: &str,
        cancel: &CancellationToken,
    ) -> String {
        let request = InferenceRequest::web(question, url, model);
        let content = match send_cancellable(self.backend.as_ref(), request, cancel).await {
            Ok(reply) => reply.content.filter(|content| !content.trim().is_empty()),
            Err(err) => {
                warn!(error = %err, url, "web extraction failed");
                None
            }
        };
        let Some(content) = content else {
            return WEB_NO_CONTENT.to_string();
        };

        let prompt = format!(
            "Berdasarkan konten website berikut, jawab pertanyaan pengguna secara langsung.\n\n--- KONTEN WEBSITE ---\n{content}\n\n--- PERTANYAAN PENGGUNA ---\n{question}\n\nJawab berdasarkan konten website:"
        );
        let answer = collect(
            self.backend.as_ref(),
            InferenceRequest::new(prompt, model),
            cancel,
        )
        .await;
        format!("{answer}\n\n🌐 **Sumber:** {url}")
    }

    /// Evaluate `expression` and ask the model to explain a numeric result.
    pub async fn calculate(
        &self,
        expression: &str,
        model: &str,
        cancel: &CancellationToken,
    ) -> String {
        let value = match calculator::evaluate(expression) {
            Ok(value) => value,
            Err(err) => return calculation(expression, &err),
        };
        let result = calculator::format_number(value);
        let prompt = format!(
            "Pengguna melakukan perhitungan: {expression} = {result}. Berikan penjelasan singkat tentang perhitungan ini dalam Bahasa Indonesia, termasuk langkah-langkah jika perlu."
        );
        let reply =
            send_cancellable(self.backend.as_ref(), InferenceRequest::new(prompt, model), cancel)
                .await;
        let explanation = match &reply {
            Ok(reply) => reply.text().unwrap_or(EXPLANATION_UNAVAILABLE),
            Err(err) => {
                warn!(error = %err, "calculator explanation failed");
                EXPLANATION_UNAVAILABLE
            }
        };
        format!(
            "{}\n\n📝 **Penjelasan:**\n{explanation}",
            calculation(expression, &result)
        )
    }
}

fn calculation(expression: &str, result: &dyn fmt::Display) -> String {
    format!("🔢 **Hasil Perhitungan:**\n\n{expression} = {result}")
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures::stream;
    use url::Url;

    use super::*;
    use crate::client::RecordStream;
    use crate::error::{Error, Result};
    use crate::types::{Action, InferenceReply, StreamRecord};

    /// Answers every request from a script and records what it was sent.
    #[derive(Default)]
    struct FakeBackend {
        reply: Option<InferenceReply>,
        chunks: Vec<&'static str>,
        fail: bool,
        requests: Mutex<Vec<InferenceRequest>>,
    }

    #[async_trait]
    impl InferenceBackend for FakeBackend {
        async fn send(&self, request: InferenceRequest) -> Result<InferenceReply> {
            self.requests.lock().unwrap().push(request);
            match (&self.reply, self.fail) {
                (Some(reply), false) => Ok(reply.clone()),
                _ => Err(Error::backend(500, "boom", None)),
            }
        }

        async fn stream(&self, request: InferenceRequest) -> Result<RecordStream> {
            self.requests.lock().unwrap().push(request);
            if self.fail {
                return Err(Error::backend(500, "boom", None));
            }
            let records: Vec<Result<StreamRecord>> = self
                .chunks
                .iter()
                .map(|c| Ok(StreamRecord::chunk(*c)))
                .collect();
            Ok(Box::pin(stream::iter(records)))
        }
    }

    #[derive(Default)]
    struct FakeRetriever {
        urls: Vec<&'static str>,
        content: Option<&'static str>,
        fetched: Mutex<Vec<Url>>,
    }

    #[async_trait]
    impl ContentRetriever for FakeRetriever {
        async fn search(&self, _: &str, _: &CancellationToken) -> Vec<Url> {
            self.urls.iter().map(|u| Url::parse(u).unwrap()).collect()
        }

        async fn fetch_readable_content(&self, url: &Url, _: &CancellationToken) -> Option<String> {
            self.fetched.lock().unwrap().push(url.clone());
            self.content.map(str::to_string)
        }
    }

    fn handlers(
        backend: FakeBackend,
        retriever: FakeRetriever,
    ) -> (CommandHandlers, Arc<FakeBackend>, Arc<FakeRetriever>) {
        let backend = Arc::new(backend);
        let retriever = Arc::new(retriever);
        let handlers = CommandHandlers::new(backend.clone(), retriever.clone(), 1);
        (handlers, backend, retriever)
    }

    fn reply(text: &str) -> InferenceReply {
        serde_json::from_value(serde_json::json!({ "response": text })).unwrap()
    }

    #[tokio::test]
    async fn usage_and_chat() {
        let (handlers, backend, _) = handlers(FakeBackend::default(), FakeRetriever::default());
        let cancel = CancellationToken::new();
        assert_eq!(handlers.handle(&Command::Chat, "m", &cancel).await, None);
        assert_eq!(
            handlers
                .handle(&Command::Usage("pakai /cari"), "m", &cancel)
                .await
                .as_deref(),
            Some("pakai /cari")
        );
        assert!(backend.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_reports_success_and_failure() {
        let cancel = CancellationToken::new();
        let (ok, backend, _) = handlers(
            FakeBackend {
                reply: Some(reply("ok")),
                ..FakeBackend::default()
            },
            FakeRetriever::default(),
        );
        assert_eq!(ok.clear("m", &cancel).await, CLEAR_SUCCEEDED);
        assert_eq!(ok.clear("m", &cancel).await, CLEAR_SUCCEEDED);
        let sent = backend.requests.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].action, Some(Action::Clear));
        assert_eq!(sent[0].prompt, "/clear");

        let (failing, _, _) = handlers(
            FakeBackend {
                fail: true,
                ..FakeBackend::default()
            },
            FakeRetriever::default(),
        );
        assert_eq!(failing.clear("m", &cancel).await, CLEAR_FAILED);
    }

    #[tokio::test]
    async fn search_without_results_fetches_nothing() {
        let (handlers, backend, retriever) =
            handlers(FakeBackend::default(), FakeRetriever::default());
        let answer = handlers
            .search("golang concurrency", "m", &CancellationToken::new())
            .await;
        assert_eq!(answer, SEARCH_NO_RESULTS);
        assert!(retriever.fetched.lock().unwrap().is_empty());
        assert!(backend.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_without_content() {
        let (handlers, _, retriever) = handlers(
            FakeBackend::default(),
            FakeRetriever {
                urls: vec!["https://a.example/", "https://b.example/"],
                ..FakeRetriever::default()
            },
        );
        let answer = handlers.search("q", "m", &CancellationToken::new()).await;
        assert_eq!(answer, SEARCH_NO_CONTENT);
        assert_eq!(retriever.fetched.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn search_answers_with_sources() {
        let (handlers, backend, _) = handlers(
            FakeBackend {
                chunks: vec!["Goroutine ", "ringan."],
                ..FakeBackend::default()
            },
            FakeRetriever {
                urls: vec!["https://go.dev/doc/", "https://b.example/"],
                content: Some("Goroutines are lightweight threads managed by the Go runtime."),
                ..FakeRetriever::default()
            },
        );
        let answer = handlers
            .search("golang concurrency", "llama", &CancellationToken::new())
            .await;
        assert_eq!(
            answer,
            "Goroutine ringan.\n\n📖 **Sumber:**\nhttps://go.dev/doc/"
        );
        let sent = backend.requests.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].model, "llama");
        assert_eq!(sent[0].action, None);
        assert!(sent[0].prompt.contains("--- WEBSITE 1: https://go.dev/doc/ ---"));
        assert!(sent[0].prompt.contains("--- PERTANYAAN PENGGUNA ---\ngolang concurrency"));
    }

    #[tokio::test]
    async fn search_answer_failure_keeps_sources() {
        let (handlers, _, _) = handlers(
            FakeBackend {
                fail: true,
                ..FakeBackend::default()
            },
            FakeRetriever {
                urls: vec!["https://go.dev/"],
                content: Some("content"),
                ..FakeRetriever::default()
            },
        );
        let answer = handlers.search("q", "m", &CancellationToken::new()).await;
        assert!(answer.starts_with(crate::chat::orchestrator::COLLECT_FAILED));
        assert!(answer.ends_with("https://go.dev/"));
    }

    #[tokio::test]
    async fn web_answers_from_extracted_content() {
        let (handlers, backend, _) = handlers(
            FakeBackend {
                reply: Some(
                    serde_json::from_value(serde_json::json!({ "content": "Example Domain." }))
                        .unwrap(),
                ),
                chunks: vec!["Halaman contoh."],
                ..FakeBackend::default()
            },
            FakeRetriever::default(),
        );
        let answer = handlers
            .web(
                "what is this page about",
                "https://example.com",
                "m",
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(answer, "Halaman contoh.\n\n🌐 **Sumber:** https://example.com");
        let sent = backend.requests.lock().unwrap();
        assert_eq!(sent[0].action, Some(Action::Web));
        assert_eq!(sent[0].url.as_deref(), Some("https://example.com"));
        assert_eq!(sent[0].prompt, "what is this page about");
        assert!(sent[1].prompt.contains("Example Domain."));
    }

    #[tokio::test]
    async fn web_without_content() {
        let (handlers, _, _) = handlers(
            FakeBackend {
                reply: Some(reply("only a response field")),
                ..FakeBackend::default()
            },
            FakeRetriever::default(),
        );
        let answer = handlers
            .web("q", "https://example.com", "m", &CancellationToken::new())
            .await;
        assert_eq!(answer, WEB_NO_CONTENT);
    }

    #[tokio::test]
    async fn calculator_appends_explanation() {
        let (handlers, backend, _) = handlers(
            FakeBackend {
                reply: Some(reply("Perkalian dulu: 2 * 5 = 10, lalu 2 + 10 = 12.")),
                ..FakeBackend::default()
            },
            FakeRetriever::default(),
        );
        let answer = handlers
            .calculate("2 + 2 * 5", "m", &CancellationToken::new())
            .await;
        assert!(answer.contains("= 12"));
        assert!(answer.ends_with("📝 **Penjelasan:**\nPerkalian dulu: 2 * 5 = 10, lalu 2 + 10 = 12."));
        let sent = backend.requests.lock().unwrap();
        assert!(sent[0].prompt.starts_with("Pengguna melakukan perhitungan: 2 + 2 * 5 = 12."));
    }

    #[tokio::test]
    async fn calculator_explanation_fallback() {
        let (handlers, _, _) = handlers(
            FakeBackend {
                fail: true,
                ..FakeBackend::default()
            },
            FakeRetriever::default(),
        );
        let answer = handlers
            .calculate("2 + 2 * 5", "m", &CancellationToken::new())
            .await;
        assert!(answer.contains("2 + 2 * 5 = 12"));
        assert!(answer.ends_with(EXPLANATION_UNAVAILABLE));
    }

    #[tokio::test]
    async fn calculator_error_is_inline() {
        let (handlers, backend, _) = handlers(FakeBackend::default(), FakeRetriever::default());
        let answer = handlers.calculate("2 / 0", "m", &CancellationToken::new()).await;
        assert_eq!(
            answer,
            "🔢 **Hasil Perhitungan:**\n\n2 / 0 = Error: Invalid calculation result"
        );
        assert!(backend.requests.lock().unwrap().is_empty());
    }
}
