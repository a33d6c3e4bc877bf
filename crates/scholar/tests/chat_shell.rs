use std::future::ready;

use scholar::core::EarlyStopping;
use scholar::core::conversation::Role;
use scholar::core::tool::{Error, LookupResult, Tool, ToolKind};
use scholar::shell::{GREETING, PLACEHOLDER_PROMPT};
use scholar::{ChatShell, SessionBuilder};
use scholar_model::ErrorKind;
use scholar_test_model::{PresetEvent, PresetResponse, TestModelProvider};

/// A tool that never leaves the process.
struct OfflineTool {
    kind: ToolKind,
    result: LookupResult,
}

impl Tool for OfflineTool {
    fn kind(&self) -> ToolKind {
        self.kind
    }

    fn lookup(
        &self,
        _query: String,
        _max_results: usize,
    ) -> impl Future<Output = LookupResult> + Send + 'static {
        ready(self.result.clone())
    }
}

fn builder(provider: &TestModelProvider) -> SessionBuilder {
    SessionBuilder::with_model_provider(provider.clone())
        .with_tool(OfflineTool {
            kind: ToolKind::Wikipedia,
            result: Ok(vec![
                "Page: Machine learning\nSummary: A field of study in AI."
                    .to_owned(),
            ]),
        })
        .with_tool(OfflineTool {
            kind: ToolKind::Arxiv,
            result: Err(Error::unavailable().with_reason("offline")),
        })
        .with_tool(OfflineTool {
            kind: ToolKind::WebSearch,
            result: Ok(vec![]),
        })
}

async fn run_shell(
    provider: &TestModelProvider,
    input: &str,
) -> (String, Vec<(Role, String)>) {
    run_shell_with(builder(provider), input.as_bytes()).await
}

async fn run_shell_with(
    builder: SessionBuilder,
    input: &[u8],
) -> (String, Vec<(Role, String)>) {
    let mut shell =
        ChatShell::new(builder, input, vec![]).with_model_name("llama3-8b-8192");
    shell.run().await.unwrap();
    let transcript = shell
        .session()
        .map(|session| {
            session
                .transcript()
                .iter()
                .map(|msg| (msg.role(), msg.content().to_owned()))
                .collect()
        })
        .unwrap_or_default();
    let output = String::from_utf8(shell.into_output()).unwrap();
    (output, transcript)
}

#[tokio::test]
async fn test_header_and_eof() {
    let provider = TestModelProvider::default();
    let (output, transcript) = run_shell(&provider, "").await;

    assert!(output.starts_with("🔎 Scholar - Chat with Search\n"));
    assert!(output.contains("model: llama3-8b-8192"));
    assert!(output.contains(GREETING));
    assert!(output.contains(PLACEHOLDER_PROMPT));
    assert!(transcript.is_empty());
    assert_eq!(provider.request_count(), 0);
}

#[tokio::test]
async fn test_turn_with_lookup() {
    let provider = TestModelProvider::default();
    provider.add_response(PresetResponse::with_events([PresetEvent::lookup(
        "call_1",
        "wikipedia",
        "machine learning",
    )]));
    provider.add_response(PresetResponse::answer(
        "Machine learning is a field of study in AI.",
    ));

    let (output, transcript) =
        run_shell(&provider, "What is machine learning?\n/quit\n").await;

    assert!(output.contains("🔧 wikipedia: machine learning"));
    assert!(output.contains("📄 Page: Machine learning Summary: A field of study in AI."));
    assert_eq!(
        output
            .matches("🤖 Machine learning is a field of study in AI.")
            .count(),
        1
    );
    assert_eq!(
        transcript,
        vec![
            (Role::User, "What is machine learning?".to_owned()),
            (
                Role::Assistant,
                "Machine learning is a field of study in AI.".to_owned()
            ),
        ]
    );
}

#[tokio::test]
async fn test_failed_lookup_is_summarized() {
    let provider = TestModelProvider::default();
    provider.add_response(PresetResponse::with_events([PresetEvent::lookup(
        "call_1",
        "arxiv",
        "attention",
    )]));
    provider.add_response(PresetResponse::answer("I could not reach arXiv."));

    let (output, transcript) = run_shell(&provider, "Find attention papers\n").await;

    assert!(output.contains("🔧 arxiv: attention"));
    assert!(output.contains("📄 Arxiv lookup unavailable"));
    assert!(!output.contains("offline"));
    assert_eq!(transcript.len(), 2);
}

#[tokio::test]
async fn test_blank_lines_and_history() {
    let provider = TestModelProvider::default();
    provider.add_response(PresetResponse::answer("Hello! Ask me anything."));

    let (output, transcript) =
        run_shell(&provider, "/history\n\n   \nHi there\n/history\n/exit\nIgnored\n")
            .await;

    assert!(output.contains("(no messages yet)"));
    assert!(output.contains("🧑 Hi there"));
    // Once streamed and once in the history.
    assert_eq!(output.matches("🤖 Hello! Ask me anything.").count(), 2);
    assert_eq!(transcript.len(), 2);
    assert_eq!(provider.request_count(), 1);
}

#[tokio::test]
async fn test_model_error_keeps_transcript() {
    let provider = TestModelProvider::default();
    provider.add_response(PresetResponse::answer("First answer."));
    provider.add_response(PresetResponse::failing(ErrorKind::Unauthorized));

    let (output, transcript) =
        run_shell(&provider, "First question\nSecond question\n").await;

    assert!(output.contains("❌ Error:"));
    assert_eq!(
        transcript,
        vec![
            (Role::User, "First question".to_owned()),
            (Role::Assistant, "First answer.".to_owned()),
        ]
    );
}

#[tokio::test]
async fn test_iteration_limit_notice() {
    let provider = TestModelProvider::default();
    provider.set_fallback_response(PresetResponse::with_events([
        PresetEvent::lookup("call_1", "duckduckgo_search", "news"),
    ]));
    let mut shell = ChatShell::new(
        builder(&provider).with_max_iterations(2),
        "What happened today?\n".as_bytes(),
        vec![],
    );
    shell.run().await.unwrap();
    let output = String::from_utf8(shell.into_output()).unwrap();

    assert!(output.contains("📄 No good DuckDuckGo Search result was found"));
    assert!(output.contains("Stopped after 2 iterations"));
    assert!(output.contains(scholar::core::FORCED_ANSWER));
}

#[tokio::test]
async fn test_generated_answer_is_shown_once() {
    let provider = TestModelProvider::default();
    provider.add_response(PresetResponse::with_events([
        PresetEvent::text("Let me search."),
        PresetEvent::lookup("call_1", "wikipedia", "machine learning"),
    ]));
    provider.add_response(PresetResponse::answer("Best guess."));
    let builder = builder(&provider)
        .with_max_iterations(1)
        .with_early_stopping(EarlyStopping::Generate);

    let (output, transcript) =
        run_shell_with(builder, b"What is machine learning?\n").await;

    assert!(output.contains("🤖 Let me search."));
    assert!(output.contains("Stopped after 1 iteration\n"));
    assert_eq!(output.matches("🤖 Best guess.").count(), 1);
    assert_eq!(transcript[1], (Role::Assistant, "Best guess.".to_owned()));
}

#[tokio::test]
async fn test_undecodable_line_is_skipped() {
    let provider = TestModelProvider::default();
    provider.add_response(PresetResponse::answer("Hello!"));
    provider.add_response(PresetResponse::answer("Yes, still here."));

    let (output, transcript) = run_shell_with(
        builder(&provider),
        b"Hi\n\xff\xfe\nStill here?\n",
    )
    .await;

    assert!(output.contains("(the input is not valid UTF-8, try again)"));
    assert_eq!(provider.request_count(), 2);
    assert_eq!(
        transcript,
        vec![
            (Role::User, "Hi".to_owned()),
            (Role::Assistant, "Hello!".to_owned()),
            (Role::User, "Still here?".to_owned()),
            (Role::Assistant, "Yes, still here.".to_owned()),
        ]
    );
}
