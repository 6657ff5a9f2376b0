//! End-to-end runs of the coordinator
//!
//! Pages are served by wiremock; saved output goes to temporary
//! directories.

use chainscrape::config::parse_config;
use chainscrape::crawler::{Coordinator, ScriptedPrompter};
use chainscrape::download::{OrderedOutput, SharedBuffer};
use chainscrape::ScrapeError;
use std::fs;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Builds a coordinator printing into a buffer
fn coordinator(toml: &str, answers: &[&str]) -> (Coordinator, SharedBuffer) {
    let config = parse_config(toml).expect("valid config");
    let sink = SharedBuffer::default();
    let output = Arc::new(OrderedOutput::new(Box::new(sink.clone()), 1 << 20));
    let coordinator = Coordinator::new(
        config,
        None,
        Box::new(ScriptedPrompter::new(answers.iter().copied())),
        output,
        Arc::new(AtomicBool::new(false)),
    )
    .expect("chains build");
    (coordinator, sink)
}

fn printed(sink: &SharedBuffer) -> String {
    String::from_utf8(sink.contents()).expect("utf-8 output")
}

async fn serve_html(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_scrape_single_page() {
    let server = MockServer::start().await;
    serve_html(
        &server,
        "/",
        "<html><body><ul><li>alpha</li><li>beta</li></ul></body></html>",
    )
    .await;

    let (mut coordinator, sink) = coordinator(
        &format!(
            r#"
[context]
progress = false
[[chain]]
[chain.content]
query = "li::text"
print-format = "{{ci}}. {{cm}}\n"
[[document]]
url = "{}/"
"#,
            server.uri()
        ),
        &[],
    );

    coordinator.run().await.unwrap();
    assert_eq!(printed(&sink), "1. alpha\n2. beta\n");
}

#[tokio::test]
async fn test_follow_relative_links_across_pages() {
    let server = MockServer::start().await;
    serve_html(
        &server,
        "/index.html",
        r#"<a class="next" href="page/2.html">next</a><p>first</p>"#,
    )
    .await;
    serve_html(
        &server,
        "/page/2.html",
        r#"<a class="next" href="3.html">next</a><p>second</p>"#,
    )
    .await;
    serve_html(&server, "/page/3.html", "<p>third</p>").await;

    let (mut coordinator, sink) = coordinator(
        &format!(
            r#"
[context]
progress = false
[[chain]]
[chain.content]
query = "p::text"
print-format = "{{di}}:{{cm}}\n"
[chain.document]
query = "a.next @href"
[[document]]
url = "{}/index.html"
"#,
            server.uri()
        ),
        &[],
    );

    coordinator.run().await.unwrap();
    assert_eq!(printed(&sink), "1:first\n2:second\n3:third\n");
}

#[tokio::test]
async fn test_document_window_limits_pages() {
    let server = MockServer::start().await;
    serve_html(&server, "/1", r#"<a href="/2">n</a><p>one</p>"#).await;
    serve_html(&server, "/2", r#"<a href="/3">n</a><p>two</p>"#).await;
    Mock::given(method("GET"))
        .and(path("/3"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>three</p>"))
        .expect(0)
        .mount(&server)
        .await;

    let (mut coordinator, sink) = coordinator(
        &format!(
            r#"
[context]
progress = false
[[chain]]
[chain.content]
query = "p::text"
[chain.document]
query = "a @href"
index-max = 2
[[document]]
url = "{}/1"
"#,
            server.uri()
        ),
        &[],
    );

    coordinator.run().await.unwrap();
    assert_eq!(printed(&sink), "one\ntwo\n");
}

#[tokio::test]
async fn test_save_labeled_content_to_files() {
    let server = MockServer::start().await;
    serve_html(
        &server,
        "/post",
        "<h1>Post</h1><div class='c'>first comment</div><div class='c'>second comment</div>",
    )
    .await;
    let dir = TempDir::new().unwrap();

    let (mut coordinator, sink) = coordinator(
        &format!(
            r#"
[context]
progress = false
[[chain]]
[chain.content]
query = "div.c::text"
save-format = '{dir}/{{l}}-{{ci}}.txt'
write-format = "{{cm}}\n"
[chain.label]
query = "h1::text"
multimatch = false
[[document]]
url = "{uri}/post"
"#,
            dir = dir.path().display(),
            uri = server.uri()
        ),
        &[],
    );

    coordinator.run().await.unwrap();
    assert_eq!(printed(&sink), "");
    assert_eq!(
        fs::read_to_string(dir.path().join("Post-1.txt")).unwrap(),
        "first comment\n"
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("Post-2.txt")).unwrap(),
        "second comment\n"
    );
}

#[tokio::test]
async fn test_download_linked_files_in_parallel() {
    let server = MockServer::start().await;
    serve_html(
        &server,
        "/gallery",
        r#"<img src="img/a.png"><img src="img/b.png"><img src="img/c.png">"#,
    )
    .await;
    for name in ["a", "b", "c"] {
        Mock::given(method("GET"))
            .and(path(format!("/img/{}.png", name)))
            .and(header("user-agent", "chainscrape-test"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(name.repeat(3).into_bytes()))
            .mount(&server)
            .await;
    }
    let dir = TempDir::new().unwrap();

    let (mut coordinator, sink) = coordinator(
        &format!(
            r#"
[context]
progress = false
parallel-jobs = 3
user-agent = "chainscrape-test"
[[chain]]
[chain.content]
query = "img @src"
is-link = true
save-format = '{dir}/{{fn}}'
print-format = "saved {{fn}}\n"
[[document]]
url = "{uri}/gallery"
"#,
            dir = dir.path().display(),
            uri = server.uri()
        ),
        &[],
    );

    coordinator.run().await.unwrap();
    assert_eq!(printed(&sink), "saved a.png\nsaved b.png\nsaved c.png\n");
    for name in ["a", "b", "c"] {
        assert_eq!(
            fs::read(dir.path().join(format!("{}.png", name))).unwrap(),
            name.repeat(3).into_bytes()
        );
    }
}

#[tokio::test]
async fn test_forwarded_content_feeds_second_chain() {
    let server = MockServer::start().await;
    serve_html(
        &server,
        "/",
        "<article><h2>A</h2><span>x</span></article><article><h2>B</h2><span>y</span></article>",
    )
    .await;

    let (mut coordinator, sink) = coordinator(
        &format!(
            r#"
[context]
progress = false
[[chain]]
[chain.content]
query = "article"
print-format = "-"
forward-format = "{{cm}}"
forward-chains = [1]
[[chain]]
[chain.content]
query = "h2::text"
print-format = "[{{cm}}]"
[[document]]
url = "{}/"
chains = [0]
"#,
            server.uri()
        ),
        &[],
    );

    coordinator.run().await.unwrap();
    assert_eq!(printed(&sink), "--[A][B]");
}

#[tokio::test]
async fn test_interactive_document_prompt() {
    let server = MockServer::start().await;
    serve_html(
        &server,
        "/",
        r#"<a href="/keep">k</a><a href="/drop">d</a>"#,
    )
    .await;
    serve_html(&server, "/keep", "<p>kept</p>").await;
    Mock::given(method("GET"))
        .and(path("/drop"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>dropped</p>"))
        .expect(0)
        .mount(&server)
        .await;

    let (mut coordinator, sink) = coordinator(
        &format!(
            r#"
[context]
progress = false
[[chain]]
[chain.content]
query = "p::text"
[chain.document]
query = "a @href"
interactive = true
[[document]]
url = "{}/"
"#,
            server.uri()
        ),
        &["yes", "no"],
    );

    coordinator.run().await.unwrap();
    assert_eq!(printed(&sink), "kept\n");
}

#[tokio::test]
async fn test_failed_page_does_not_stop_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    serve_html(&server, "/fine", "<p>fine</p>").await;

    let (mut coordinator, sink) = coordinator(
        &format!(
            r#"
[context]
progress = false
[[chain]]
[chain.content]
query = "p::text"
[[document]]
url = "{0}/broken"
[[document]]
url = "{0}/fine"
"#,
            server.uri()
        ),
        &[],
    );

    coordinator.run().await.unwrap();
    assert_eq!(printed(&sink), "fine\n");
}

#[tokio::test]
async fn test_unknown_forward_chain_is_rejected() {
    let config = parse_config(
        r#"
[[chain]]
[chain.content]
query = "p"
forward-chains = [7]
[[document]]
url = "https://example.com"
"#,
    )
    .unwrap();
    let output = Arc::new(OrderedOutput::new(Box::new(SharedBuffer::default()), 4096));
    let result = Coordinator::new(
        config,
        None,
        Box::new(ScriptedPrompter::default()),
        output,
        Arc::new(AtomicBool::new(false)),
    );
    assert!(matches!(result, Err(ScrapeError::Setup(_))));
}
