//! End-to-end runs of the orchestrator over scripted sessions and real temp dirs.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bibfetch_core::interaction::{UiEndpoint, UiRequest, channel};
use bibfetch_core::manual::RecordingOpener;
use bibfetch_core::session::mock::{MockPage, MockScript, MockSessionProvider, MockTrigger};
use bibfetch_core::strategy::{BibliographicApiLookup, SearchEngineLookup};
use bibfetch_core::{
    Config, Orchestrator, ProgressEvent, ResolutionTarget, RunControl, RunSummary, StrategyHint,
    build_target, parse_references,
};

const PDF: &[u8] = b"%PDF-1.4\n% scripted test document\n%%EOF\n";

const DOI_URL: &str = "https://doi.org/10.1/abc";
const LANDING: &str = "https://pub.example/article";
const PDF_URL: &str = "https://pub.example/paper.pdf";

fn landing_html() -> &'static str {
    r#"<html><body><h1>Title One</h1><a href="/paper.pdf">PDF</a></body></html>"#
}

fn config(dest: &Path) -> Config {
    Config {
        destination_dir: dest.to_path_buf(),
        merge_pdfs: false,
        ..Config::default()
    }
}

fn article_script(trigger: Vec<MockTrigger>) -> MockScript {
    MockScript::new()
        .page(DOI_URL, MockPage::html(LANDING, landing_html()))
        .on_trigger(PDF_URL, trigger)
}

async fn run(
    config: Config,
    provider: Arc<MockSessionProvider>,
    text: &str,
) -> (RunSummary, UiEndpoint) {
    let (ui, endpoint) = channel();
    let orchestrator = Orchestrator::new(config, provider, ui, RunControl::new());
    (orchestrator.run(text).await, endpoint)
}

const WIDGETS: &str = "[1] Doe J. A study of scripted widgets. Journal of Tests, 2021.";

fn free_text_target(text: &str) -> ResolutionTarget {
    let target = build_target(&parse_references(text)[0]);
    assert_eq!(target.strategy_hint, StrategyHint::SearchQuery);
    target
}

/// Run the orchestrator, accepting every manual-fallback prompt. Returns the
/// summary and how many prompts were shown.
async fn run_accepting_prompts(
    orchestrator: &Orchestrator,
    endpoint: &mut UiEndpoint,
    text: &str,
) -> (RunSummary, usize) {
    let mut prompts = 0;
    let run = orchestrator.run(text);
    tokio::pin!(run);
    let summary = loop {
        tokio::select! {
            summary = &mut run => break summary,
            Some(request) = endpoint.requests.recv() => {
                if let UiRequest::ConfirmManualFallback { reply, .. } = request {
                    prompts += 1;
                    let _ = reply.send(true);
                }
            }
        }
    };
    (summary, prompts)
}

/// Messages of the `Result` events for one reference, in emission order.
fn result_messages(endpoint: &mut UiEndpoint, index: usize) -> Vec<String> {
    let mut messages = Vec::new();
    while let Ok(event) = endpoint.progress.try_recv() {
        if let ProgressEvent::Result { index: i, result, .. } = event
            && i == index
        {
            messages.push(result.message);
        }
    }
    messages
}

#[tokio::test(start_paused = true)]
async fn doi_reference_downloads_into_destination() {
    let dest = tempfile::tempdir().unwrap();
    let provider = Arc::new(MockSessionProvider::new(article_script(vec![MockTrigger::write(
        "paper.pdf", PDF,
    )])));

    let (summary, _) = run(
        config(dest.path()),
        provider.clone(),
        "[1] Smith J. Title One. J Sci. 2020;12:1-5. https://doi.org/10.1/abc",
    )
    .await;

    let result = &summary.results[0];
    assert!(result.success, "{}", result.message);
    assert_eq!(result.file_path.as_deref(), Some(dest.path().join("paper.pdf").as_path()));
    assert_eq!(result.used_filename.as_deref(), Some("paper.pdf"));
    assert_eq!(std::fs::read(dest.path().join("paper.pdf")).unwrap(), PDF);
    assert_eq!(summary.unique_succeeded, 1);
    assert_eq!(summary.retried, 0);
    assert!(summary.missing_report_path.is_none());
    assert_eq!(provider.script().triggered(), vec![PDF_URL.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn scenario_b_duplicate_shares_file() {
    let dest = tempfile::tempdir().unwrap();
    let provider = Arc::new(MockSessionProvider::new(article_script(vec![MockTrigger::write(
        "paper.pdf", PDF,
    )])));
    let text = "[1] Smith J. Title One. J Sci. 2020;12:1-5. https://doi.org/10.1/abc\n\
                [2] J. Smith, Title One, Journal of Science (2020). doi:10.1/abc";

    let (summary, _) = run(config(dest.path()), provider.clone(), text).await;

    assert_eq!(summary.results.len(), 2);
    assert_eq!(summary.results[1].duplicate_of, Some(1));
    assert_eq!(summary.results[1].reference_index, 2);
    assert!(summary.results[1].success);
    assert_eq!(summary.results[0].file_path, summary.results[1].file_path);
    assert_eq!(summary.unique_succeeded, 1);
    assert_eq!(summary.duplicates, 1);
    // The duplicate never reaches the network.
    assert_eq!(provider.script().navigations(), vec![DOI_URL.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn scenario_c_download_never_appears() {
    let dest = tempfile::tempdir().unwrap();
    let provider = Arc::new(MockSessionProvider::new(article_script(vec![MockTrigger::Nothing])));
    let cfg = Config {
        download_timeout_secs: 20,
        ..config(dest.path())
    };

    let (summary, mut endpoint) = run(cfg, provider, "[1] Smith J. Title One. https://doi.org/10.1/abc").await;

    let messages = result_messages(&mut endpoint, 1);
    assert_eq!(messages[0], "Download did not complete in time");
    let result = &summary.results[0];
    assert!(!result.success);
    assert_eq!(
        result.message,
        "initial attempt: Download did not complete in time; retry attempt: Download did not complete in time"
    );
    assert_eq!(summary.retried, 1);
    assert_eq!(summary.unique_failed, 1);
}

#[tokio::test(start_paused = true)]
async fn scenario_d_empty_download_is_deleted() {
    let dest = tempfile::tempdir().unwrap();
    let provider = Arc::new(MockSessionProvider::new(article_script(vec![MockTrigger::write(
        "paper.pdf", b"",
    )])));

    let (summary, mut endpoint) =
        run(config(dest.path()), provider, "[1] Smith J. Title One. https://doi.org/10.1/abc").await;

    assert_eq!(result_messages(&mut endpoint, 1)[0], "Downloaded PDF was empty");
    assert!(!summary.results[0].success);
    assert!(summary.results[0].file_path.is_none());
    assert!(!dest.path().join("paper.pdf").exists());
}

#[tokio::test(start_paused = true)]
async fn scenario_f_skip_during_poll() {
    let dest = tempfile::tempdir().unwrap();
    let provider = Arc::new(MockSessionProvider::new(article_script(vec![MockTrigger::Nothing])));
    let (ui, _endpoint) = channel();
    let control = RunControl::new();
    let orchestrator = Orchestrator::new(config(dest.path()), provider.clone(), ui, control.clone());

    let skipper = async {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        control.skip_current();
    };
    let (summary, ()) = tokio::join!(
        orchestrator.run("[1] Smith J. Title One. https://doi.org/10.1/abc"),
        skipper
    );

    assert_eq!(summary.results[0].message, "Skipped by user");
    // Skips are final: no retry pass.
    assert_eq!(summary.retried, 0);
    assert_eq!(provider.script().triggered().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn retry_pass_recovers_transient_failure() {
    let dest = tempfile::tempdir().unwrap();
    let provider = Arc::new(MockSessionProvider::new(article_script(vec![
        MockTrigger::Fail("HTTP 503".into()),
        MockTrigger::write("paper.pdf", PDF),
    ])));

    let (summary, mut endpoint) =
        run(config(dest.path()), provider.clone(), "[1] Smith J. Title One. https://doi.org/10.1/abc").await;

    assert_eq!(
        result_messages(&mut endpoint, 1),
        vec!["Failed to trigger download: HTTP 503", "succeeded on retry"]
    );
    assert!(summary.results[0].success);
    assert_eq!(summary.retried, 1);
    // One session per automated phase.
    assert_eq!(provider.opened(), 2);
}

#[tokio::test(start_paused = true)]
async fn missing_report_lists_unique_failures() {
    let dest = tempfile::tempdir().unwrap();
    let script = article_script(vec![MockTrigger::write("paper.pdf", PDF)])
        .page("https://doi.org/10.9/gone", MockPage::Error("HTTP 404".into()));
    let provider = Arc::new(MockSessionProvider::new(script));
    let text = "[1] Smith J. Title One. https://doi.org/10.1/abc\n\
                [2] Doe A. Gone paper. https://doi.org/10.9/gone\n\
                [3] Doe A. Gone paper again. doi:10.9/gone";

    let (summary, _) = run(config(dest.path()), provider, text).await;

    assert_eq!(summary.unique_succeeded, 1);
    assert_eq!(summary.unique_failed, 1);
    assert_eq!(summary.duplicates, 1);
    let report_path = summary.missing_report_path.clone().unwrap();
    assert_eq!(report_path, dest.path().join("missing_pdfs.txt"));

    let report = std::fs::read_to_string(report_path).unwrap();
    assert!(report.starts_with("Missing PDFs (1 of 3 references)"));
    assert!(report.contains("1. [2] Doe A. Gone paper. https://doi.org/10.9/gone"));
    assert!(report.contains(
        "   Reason: initial attempt: Navigation failed: HTTP 404; retry attempt: Navigation failed: HTTP 404"
    ));
    assert!(!report.contains("[3]"));
}

#[tokio::test(start_paused = true)]
async fn manual_fallback_moves_user_download() {
    let dest = tempfile::tempdir().unwrap();
    let downloads = tempfile::tempdir().unwrap();
    let provider = Arc::new(MockSessionProvider::new(
        MockScript::new().page("https://doi.org/10.9/missing", MockPage::Error("HTTP 404".into())),
    ));
    let opener = Arc::new(RecordingOpener::new());
    let cfg = Config {
        manual_fallback: true,
        manual_downloads_dir: Some(downloads.path().to_path_buf()),
        manual_auto_open_link: false,
        ..config(dest.path())
    };

    let (ui, mut endpoint) = channel();
    let orchestrator =
        Orchestrator::new(cfg, provider, ui, RunControl::new()).with_opener(opener.clone());

    let user = async {
        match endpoint.requests.recv().await {
            Some(UiRequest::ConfirmManualFallback { reply, .. }) => reply.send(true).unwrap(),
            other => panic!("unexpected request: {:?}", other),
        }
        tokio::time::sleep(Duration::from_secs(3)).await;
        std::fs::write(downloads.path().join("Downloaded Paper.pdf"), PDF).unwrap();
    };
    let (summary, ()) = tokio::join!(
        orchestrator.run("[1] Doe J. Missing paper title. https://doi.org/10.9/missing"),
        user
    );

    assert_eq!(opener.opened(), vec!["https://doi.org/10.9/missing".to_string()]);
    let result = &summary.results[0];
    assert!(result.success, "{}", result.message);
    assert_eq!(result.message, "completed manually");
    assert_eq!(summary.manually_completed, 1);

    let path = result.file_path.clone().unwrap();
    assert_eq!(path.parent(), Some(dest.path()));
    assert!(result.used_filename.as_deref().unwrap().starts_with("ref_1_"));
    assert!(!downloads.path().join("Downloaded Paper.pdf").exists());
    assert_eq!(std::fs::read(path).unwrap(), PDF);
}

#[tokio::test(start_paused = true)]
async fn manual_fallback_opens_pdf_link_and_times_out() {
    let dest = tempfile::tempdir().unwrap();
    let downloads = tempfile::tempdir().unwrap();
    let provider = Arc::new(MockSessionProvider::new(article_script(vec![MockTrigger::Fail(
        "HTTP 403".into(),
    )])));
    let opener = Arc::new(RecordingOpener::new());
    let cfg = Config {
        manual_fallback: true,
        manual_downloads_dir: Some(downloads.path().to_path_buf()),
        manual_wait_secs: 10,
        ..config(dest.path())
    };

    let (ui, mut endpoint) = channel();
    let orchestrator =
        Orchestrator::new(cfg, provider, ui, RunControl::new()).with_opener(opener.clone());
    let user = async {
        if let Some(UiRequest::ConfirmManualFallback { reply, .. }) = endpoint.requests.recv().await {
            reply.send(true).unwrap();
        }
    };
    let (summary, ()) = tokio::join!(
        orchestrator.run("[1] Smith J. Title One. https://doi.org/10.1/abc"),
        user
    );

    // The landing page's PDF link is preferred over the landing page itself.
    assert_eq!(opener.opened(), vec![PDF_URL.to_string()]);
    assert_eq!(
        summary.results[0].message,
        "initial attempt: Failed to trigger download: HTTP 403; \
         retry attempt: Failed to trigger download: HTTP 403; \
         manual attempt: No PDF appeared in the downloads folder"
    );
}

#[tokio::test(start_paused = true)]
async fn declined_manual_fallback_opens_nothing() {
    let dest = tempfile::tempdir().unwrap();
    let provider = Arc::new(MockSessionProvider::new(article_script(vec![MockTrigger::Fail(
        "HTTP 403".into(),
    )])));
    let opener = Arc::new(RecordingOpener::new());
    let cfg = Config {
        manual_fallback: true,
        ..config(dest.path())
    };

    let (ui, mut endpoint) = channel();
    let orchestrator =
        Orchestrator::new(cfg, provider, ui, RunControl::new()).with_opener(opener.clone());
    let user = async {
        if let Some(UiRequest::ConfirmManualFallback { reply, .. }) = endpoint.requests.recv().await {
            reply.send(false).unwrap();
        }
    };
    let (summary, ()) = tokio::join!(
        orchestrator.run("[1] Smith J. Title One. https://doi.org/10.1/abc"),
        user
    );

    assert!(opener.opened().is_empty());
    assert_eq!(summary.manually_completed, 0);
    assert!(!summary.results[0].success);
}

#[tokio::test]
async fn unavailable_session_fails_every_reference() {
    let dest = tempfile::tempdir().unwrap();
    let provider = Arc::new(MockSessionProvider::unavailable("Edge is not installed"));
    let text = "[1] Smith J. Title One. https://doi.org/10.1/abc\n\
                [2] Doe A. Another paper. https://doi.org/10.9/xyz\n\
                [3] Copy of the first. doi:10.1/abc";

    let (summary, _) = run(config(dest.path()), provider, text).await;

    assert_eq!(summary.results.len(), 3);
    for result in &summary.results {
        assert_eq!(
            result.message,
            "Could not start retrieval session: Edge is not installed"
        );
    }
    assert_eq!(summary.unique_failed, 2);
    assert_eq!(summary.duplicates, 1);
}

#[tokio::test]
async fn cancelled_run_marks_everything_cancelled() {
    let dest = tempfile::tempdir().unwrap();
    let provider = Arc::new(MockSessionProvider::new(article_script(vec![MockTrigger::write(
        "paper.pdf", PDF,
    )])));
    let (ui, _endpoint) = channel();
    let control = RunControl::new();
    control.cancel_run();

    let summary = Orchestrator::new(config(dest.path()), provider.clone(), ui, control)
        .run("[1] Smith J. Title One. https://doi.org/10.1/abc")
        .await;

    assert_eq!(
        summary.results[0].message,
        "Run cancelled before this reference was processed"
    );
    assert!(provider.script().navigations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn search_engine_follows_top_result_to_pdf() {
    let dest = tempfile::tempdir().unwrap();
    let cfg = Config {
        disabled_strategies: vec!["crossref".into()],
        ..config(dest.path())
    };
    let target = free_text_target(WIDGETS);
    let search_url =
        SearchEngineLookup::new(cfg.search_engine_url.clone()).query_url(&target.query_or_url);
    let results = r#"<html><body>
        <h3 class="gs_rt"><a href="https://pub.example/widgets">A study of scripted widgets</a></h3>
        <h3 class="gs_rt"><a href="https://other.example/unrelated">Something else</a></h3>
    </body></html>"#;
    let script = MockScript::new()
        .page(&search_url, MockPage::html(&search_url, results))
        .page(
            "https://pub.example/widgets",
            MockPage::html(
                "https://pub.example/widgets",
                r#"<html><body><a href="/widgets.pdf">Download PDF</a></body></html>"#,
            ),
        )
        .on_trigger("https://pub.example/widgets.pdf", vec![MockTrigger::write("widgets.pdf", PDF)]);
    let provider = Arc::new(MockSessionProvider::new(script));

    let (summary, _) = run(cfg, provider.clone(), WIDGETS).await;

    let result = &summary.results[0];
    assert!(result.success, "{}", result.message);
    assert_eq!(result.used_filename.as_deref(), Some("widgets.pdf"));
    assert_eq!(
        provider.script().navigations(),
        vec![search_url, "https://pub.example/widgets".to_string()]
    );
    assert_eq!(
        provider.script().triggered(),
        vec!["https://pub.example/widgets.pdf".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn unmatched_crossref_title_falls_through_to_search_engine() {
    let dest = tempfile::tempdir().unwrap();
    let cfg = config(dest.path());
    let target = free_text_target(WIDGETS);
    assert!(target.derived_title.is_some());

    let api_url = BibliographicApiLookup::new(cfg.bibliographic_api_url.clone(), None)
        .query_url(&target.query_or_url);
    let search_url =
        SearchEngineLookup::new(cfg.search_engine_url.clone()).query_url(&target.query_or_url);
    let works = r#"{"status":"ok","message":{"items":[
        {"DOI":"10.9/wrong","title":["Growing tomatoes in small urban gardens"]}
    ]}}"#;
    let results = r#"<html><body>
        <a href="https://mirror.example/widgets.pdf">[PDF] mirror.example</a>
        <h3 class="gs_rt"><a href="https://pub.example/widgets">A study of scripted widgets</a></h3>
    </body></html>"#;
    let script = MockScript::new()
        .page(&api_url, MockPage::html(&api_url, works))
        .page(&search_url, MockPage::html(&search_url, results))
        .on_trigger("https://mirror.example/widgets.pdf", vec![MockTrigger::write("widgets.pdf", PDF)]);
    let provider = Arc::new(MockSessionProvider::new(script));

    let (summary, _) = run(cfg, provider.clone(), WIDGETS).await;

    let result = &summary.results[0];
    assert!(result.success, "{}", result.message);
    assert_eq!(summary.retried, 0);
    // The rejected record's DOI is never opened.
    assert_eq!(provider.script().navigations(), vec![api_url, search_url]);
    assert_eq!(
        provider.script().triggered(),
        vec!["https://mirror.example/widgets.pdf".to_string()]
    );
}

fn two_missing() -> (MockScript, &'static str) {
    let script = MockScript::new()
        .page("https://doi.org/10.9/one", MockPage::Error("HTTP 404".into()))
        .page("https://doi.org/10.9/two", MockPage::Error("HTTP 404".into()));
    let text = "[1] Doe J. First missing paper. https://doi.org/10.9/one\n\
                [2] Roe K. Second missing paper. https://doi.org/10.9/two";
    (script, text)
}

const BOTH_ATTEMPTS_404: &str =
    "initial attempt: Navigation failed: HTTP 404; retry attempt: Navigation failed: HTTP 404";

#[tokio::test(start_paused = true)]
async fn manual_fallback_asks_once_for_all_missing() {
    let dest = tempfile::tempdir().unwrap();
    let downloads = tempfile::tempdir().unwrap();
    let (script, text) = two_missing();
    let provider = Arc::new(MockSessionProvider::new(script));
    let opener = Arc::new(RecordingOpener::new());
    let cfg = Config {
        manual_fallback: true,
        manual_downloads_dir: Some(downloads.path().to_path_buf()),
        manual_auto_open_link: false,
        manual_wait_secs: 10,
        ..config(dest.path())
    };

    let (ui, mut endpoint) = channel();
    let orchestrator = Orchestrator::new(cfg, provider, ui, RunControl::new()).with_opener(opener.clone());
    let (summary, prompts) = run_accepting_prompts(&orchestrator, &mut endpoint, text).await;

    assert_eq!(prompts, 1);
    assert_eq!(
        opener.opened(),
        vec!["https://doi.org/10.9/one".to_string(), "https://doi.org/10.9/two".to_string()]
    );
    for result in &summary.results {
        assert!(!result.success);
        assert_eq!(
            result.message,
            format!("{}; manual attempt: No PDF appeared in the downloads folder", BOTH_ATTEMPTS_404)
        );
    }
    assert_eq!(summary.unique_failed, 2);
}

#[tokio::test(start_paused = true)]
async fn declining_manual_fallback_keeps_every_earlier_message() {
    let dest = tempfile::tempdir().unwrap();
    let (script, text) = two_missing();
    let provider = Arc::new(MockSessionProvider::new(script));
    let opener = Arc::new(RecordingOpener::new());
    let cfg = Config {
        manual_fallback: true,
        ..config(dest.path())
    };

    let (ui, mut endpoint) = channel();
    let orchestrator = Orchestrator::new(cfg, provider, ui, RunControl::new()).with_opener(opener.clone());
    let user = async {
        if let Some(UiRequest::ConfirmManualFallback { reply, .. }) = endpoint.requests.recv().await {
            reply.send(false).unwrap();
        }
    };
    let (summary, ()) = tokio::join!(orchestrator.run(text), user);

    assert!(endpoint.requests.try_recv().is_err());
    assert!(opener.opened().is_empty());
    for result in &summary.results {
        assert!(!result.success);
        assert_eq!(result.message, BOTH_ATTEMPTS_404);
    }
}

#[tokio::test(start_paused = true)]
async fn manual_fallback_ignores_empty_placeholder_in_downloads() {
    let dest = tempfile::tempdir().unwrap();
    let downloads = tempfile::tempdir().unwrap();
    let provider = Arc::new(MockSessionProvider::new(
        MockScript::new().page("https://doi.org/10.9/missing", MockPage::Error("HTTP 404".into())),
    ));
    let cfg = Config {
        manual_fallback: true,
        manual_downloads_dir: Some(downloads.path().to_path_buf()),
        manual_auto_open_link: false,
        manual_wait_secs: 30,
        ..config(dest.path())
    };

    let (ui, mut endpoint) = channel();
    let orchestrator = Orchestrator::new(cfg, provider, ui, RunControl::new())
        .with_opener(Arc::new(RecordingOpener::new()));
    let user = async {
        if let Some(UiRequest::ConfirmManualFallback { reply, .. }) = endpoint.requests.recv().await {
            reply.send(true).unwrap();
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        std::fs::write(downloads.path().join("Untitled.pdf"), b"").unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        std::fs::write(downloads.path().join("Real Paper.pdf"), PDF).unwrap();
    };
    let (summary, ()) = tokio::join!(
        orchestrator.run("[1] Doe J. Missing paper title. https://doi.org/10.9/missing"),
        user
    );

    let result = &summary.results[0];
    assert!(result.success, "{}", result.message);
    assert_eq!(std::fs::read(result.file_path.clone().unwrap()).unwrap(), PDF);
    // The user's own empty file is not touched.
    assert!(downloads.path().join("Untitled.pdf").exists());
}

#[tokio::test(start_paused = true)]
async fn skip_while_finding_manual_link_opens_nothing() {
    let dest = tempfile::tempdir().unwrap();
    let downloads = tempfile::tempdir().unwrap();
    let provider = Arc::new(MockSessionProvider::new(
        MockScript::new().page("https://doi.org/10.9/slow", MockPage::Timeout),
    ));
    let opener = Arc::new(RecordingOpener::new());
    let control = RunControl::new();
    let cfg = Config {
        manual_fallback: true,
        manual_downloads_dir: Some(downloads.path().to_path_buf()),
        page_load_timeout_secs: 5,
        ..config(dest.path())
    };

    let (ui, mut endpoint) = channel();
    let orchestrator =
        Orchestrator::new(cfg, provider, ui, control.clone()).with_opener(opener.clone());
    let user = async {
        if let Some(UiRequest::ConfirmManualFallback { reply, .. }) = endpoint.requests.recv().await {
            reply.send(true).unwrap();
        }
        // The manual pass is now loading the slow target to look for a PDF link.
        tokio::time::sleep(Duration::from_secs(1)).await;
        control.skip_current();
    };
    let (summary, ()) = tokio::join!(
        orchestrator.run("[1] Doe J. Slow paper title. https://doi.org/10.9/slow"),
        user
    );

    assert!(opener.opened().is_empty());
    assert_eq!(
        summary.results[0].message,
        "initial attempt: Page did not become ready; \
         retry attempt: Page did not become ready; \
         manual attempt: Skipped by user"
    );
}
