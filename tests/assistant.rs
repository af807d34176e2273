//! Research assistant routing, with a scripted language service.

use async_trait::async_trait;
use docx2ieee::prompts::{
    APOLOGY_MESSAGE, ASSISTANT_SYSTEM_PROMPT, GREETING_MESSAGE, IMAGE_ANALYSIS_PROMPT,
    REFUSAL_MESSAGE, SEARCH_SYSTEM_PROMPT,
};
use docx2ieee::{
    Assistant, AssistantConfig, AssistantMode, AssistantQuery, ImageSize, LanguageService,
    ServiceError, Source,
};
use std::sync::{Arc, Mutex};

/// Replies with a fixed answer and records every call.
#[derive(Default)]
struct Scripted {
    reply: String,
    fail: bool,
    calls: Mutex<Vec<String>>,
}

impl Scripted {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            ..Default::default()
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Default::default()
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn answer(&self, call: String) -> Result<String, ServiceError> {
        self.calls.lock().unwrap().push(call);
        if self.fail {
            Err(ServiceError::Transport("connection reset".into()))
        } else {
            Ok(self.reply.clone())
        }
    }
}

#[async_trait]
impl LanguageService for Scripted {
    async fn chat(&self, system: &str, user: &str) -> Result<String, ServiceError> {
        let kind = if system == SEARCH_SYSTEM_PROMPT {
            "search"
        } else if system == ASSISTANT_SYSTEM_PROMPT {
            "chat"
        } else {
            "other"
        };
        self.answer(format!("{kind}:{user}"))
    }

    async fn analyze_image(&self, instruction: &str, image: &[u8]) -> Result<String, ServiceError> {
        assert_eq!(instruction, IMAGE_ANALYSIS_PROMPT);
        self.answer(format!("analyze:{}", image.len()))
    }

    async fn generate_image(&self, prompt: &str, size: ImageSize) -> Result<String, ServiceError> {
        self.answer(format!("generate:{}:{prompt}", size.dimensions()))
    }
}

fn assistant(service: Arc<Scripted>, guard: bool) -> Assistant {
    let config = AssistantConfig::builder()
        .local_domain_guard(guard)
        .build()
        .unwrap();
    Assistant::new(service, &config)
}

#[tokio::test]
async fn greeting_is_answered_without_a_service_call() {
    let service = Scripted::replying("unused");
    let a = assistant(service.clone(), false);

    for text in ["hi", "  Hello "] {
        let reply = a.ask(&AssistantQuery::chat(text)).await;
        assert_eq!(reply.content, GREETING_MESSAGE);
    }
    assert!(service.calls().is_empty());
}

#[test]
fn greeting_completes_on_first_poll() {
    let service = Scripted::failing();
    let a = assistant(service.clone(), false);
    let query = AssistantQuery::chat("HELLO");

    let mut task = tokio_test::task::spawn(a.ask(&query));
    let reply = tokio_test::assert_ready!(task.poll());

    assert_eq!(reply.content, GREETING_MESSAGE);
    assert!(service.calls().is_empty());
}

#[test]
fn failure_reply_from_a_plain_runtime() {
    let a = assistant(Scripted::failing(), false);
    let reply = tokio_test::block_on(a.ask(&AssistantQuery::chat("format my abstract")));
    assert_eq!(reply.content, APOLOGY_MESSAGE);
}

#[tokio::test]
async fn chat_uses_the_domain_prompt() {
    let service = Scripted::replying("Number references in order of first citation.");
    let a = assistant(service.clone(), false);

    let reply = a
        .ask(&AssistantQuery::chat("How are IEEE references numbered?"))
        .await;
    assert_eq!(reply.content, "Number references in order of first citation.");
    assert!(reply.sources.is_empty());
    assert_eq!(service.calls(), vec!["chat:How are IEEE references numbered?"]);
}

#[tokio::test]
async fn empty_reply_becomes_the_refusal() {
    let a = assistant(Scripted::replying("  \n"), false);
    let reply = a.ask(&AssistantQuery::chat("What is the capital of France?")).await;
    assert_eq!(reply.content, REFUSAL_MESSAGE);
}

#[tokio::test]
async fn service_failure_becomes_the_apology() {
    let a = assistant(Scripted::failing(), false);
    for mode in [AssistantMode::Chat, AssistantMode::Search, AssistantMode::ImageGenerate] {
        let reply = a
            .ask(&AssistantQuery::chat("explain paper formatting").with_mode(mode))
            .await;
        assert_eq!(reply.content, APOLOGY_MESSAGE, "mode {mode}");
    }
}

#[tokio::test]
async fn local_guard_refuses_off_topic_questions() {
    let service = Scripted::replying("answer");
    let a = assistant(service.clone(), true);

    let refused = a.ask(&AssistantQuery::chat("Best pizza in Naples?")).await;
    assert_eq!(refused.content, REFUSAL_MESSAGE);

    let answered = a
        .ask(&AssistantQuery::chat("How long should an abstract be?"))
        .await;
    assert_eq!(answered.content, "answer");
    assert_eq!(service.calls().len(), 1);
}

#[tokio::test]
async fn search_returns_cited_sources() {
    let service = Scripted::replying(
        "IEEE conference papers use 0.75 in side margins.\n\
         Source: IEEE Author Center - https://journals.ieeeauthorcenter.ieee.org/\n\
         See also https://www.ieee.org/conferences/publishing/templates.html.",
    );
    let a = assistant(service.clone(), false);

    let reply = a
        .ask(&AssistantQuery::chat("IEEE template margins").with_mode(AssistantMode::Search))
        .await;

    assert!(!reply.content.contains("Source:"));
    assert_eq!(
        reply.sources,
        vec![
            Source {
                title: "IEEE Author Center".into(),
                url: "https://journals.ieeeauthorcenter.ieee.org/".into(),
            },
            Source {
                title: "https://www.ieee.org/conferences/publishing/templates.html".into(),
                url: "https://www.ieee.org/conferences/publishing/templates.html".into(),
            },
        ]
    );
    assert_eq!(service.calls(), vec!["search:IEEE template margins"]);
}

#[tokio::test]
async fn image_generation_prefixes_the_prompt() {
    let service = Scripted::replying("https://images.example/fig.png");
    let a = assistant(service.clone(), false);

    let reply = a
        .ask(
            &AssistantQuery::chat("block diagram of a CNN")
                .with_mode(AssistantMode::ImageGenerate)
                .with_size(ImageSize::TwoK),
        )
        .await;

    assert_eq!(reply.image.as_deref(), Some("https://images.example/fig.png"));
    assert_eq!(
        service.calls(),
        vec!["generate:2048x2048:Scientific figure: block diagram of a CNN"]
    );
}

#[tokio::test]
async fn image_analysis_needs_an_upload() {
    let service = Scripted::replying("A line plot of loss over epochs.");
    let a = assistant(service.clone(), false);

    let missing = a
        .ask(&AssistantQuery::chat("what is this?").with_mode(AssistantMode::ImageAnalyze))
        .await;
    assert_eq!(missing.content, APOLOGY_MESSAGE);
    assert!(service.calls().is_empty());

    let reply = a
        .ask(
            &AssistantQuery::chat("what is this?")
                .with_mode(AssistantMode::ImageAnalyze)
                .with_image(vec![1, 2, 3]),
        )
        .await;
    assert_eq!(reply.content, "A line plot of loss over epochs.");
    assert_eq!(service.calls(), vec!["analyze:3"]);
}
