// tests/http_collaborators.rs
// Real HTTP round trips against a canned local responder.
use std::sync::Arc;
use std::time::Duration;

use social_listening::ingest::pacing::RequestPacing;
use social_listening::ingest::providers::forum_search::ForumSearchSource;
use social_listening::ingest::providers::web_search::WebSearchSource;
use social_listening::ingest::types::SourceCollaborator;
use social_listening::oracle::openai::OpenAiOracle;
use social_listening::oracle::{
    DraftRequest, DraftingOracle, OracleError, ScoringOracle, ScoringRequestItem,
};
use social_listening::post::Source;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Answer every request with the same status and JSON body. Returns the base URL.
async fn canned(status: u16, body: String) -> String {
    routed(move |_| (status, body.clone())).await
}

/// Answer each request by its path (query string stripped). Returns the base URL.
async fn routed<F>(respond: F) -> String
where
    F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
{
    let respond = Arc::new(respond);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                return;
            };
            let respond = respond.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                // Read headers, then whatever body Content-Length announces.
                loop {
                    let n = sock.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        return;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    if let Some(end) = find_header_end(&buf) {
                        let want = content_length(&buf[..end]);
                        while buf.len() < end + want {
                            let n = sock.read(&mut chunk).await.unwrap_or(0);
                            if n == 0 {
                                break;
                            }
                            buf.extend_from_slice(&chunk[..n]);
                        }
                        break;
                    }
                }
                let head = String::from_utf8_lossy(&buf).into_owned();
                let target = head.split_whitespace().nth(1).unwrap_or("/");
                let path = target.split('?').next().unwrap_or(target);
                let (status, body) = respond(path);
                let resp = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = sock.write_all(resp.as_bytes()).await;
                let _ = sock.shutdown().await;
            });
        }
    });
    format!("http://{addr}")
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

fn content_length(head: &[u8]) -> usize {
    String::from_utf8_lossy(head)
        .lines()
        .find_map(|l| {
            let (k, v) = l.split_once(':')?;
            k.eq_ignore_ascii_case("content-length")
                .then(|| v.trim().parse().ok())
                .flatten()
        })
        .unwrap_or(0)
}

fn completion(content: &str) -> String {
    serde_json::json!({ "choices": [ { "message": { "content": content } } ] }).to_string()
}

fn item() -> ScoringRequestItem {
    ScoringRequestItem {
        id: 0,
        source: "forum".into(),
        title: "GRE in 3 weeks?".into(),
        snippet: String::new(),
    }
}

#[tokio::test]
async fn openai_scoring_parses_fenced_reply() {
    let reply = "```json\n[{\"id\":0,\"topic_label\":\"GRE\",\"intent_score\":88,\"recommended_action\":\"DM\"}]\n```";
    let base = canned(200, completion(reply)).await;
    let oracle = OpenAiOracle::new("sk-test".into(), Some(base)).unwrap();

    let out = oracle.score_batch(&[item()], "gpt-4o-mini").await.unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].batch_id(), Some(0));
    assert_eq!(out[0].intent_score, Some(88.0));
}

#[tokio::test]
async fn openai_prose_reply_is_a_parse_error() {
    let base = canned(200, completion("Sure! Here are the scores.")).await;
    let oracle = OpenAiOracle::new("sk-test".into(), Some(base)).unwrap();
    let err = oracle.score_batch(&[item()], "m").await.unwrap_err();
    assert!(matches!(err, OracleError::Parse(_)));
}

#[tokio::test]
async fn openai_http_error_is_transport() {
    let base = canned(429, r#"{"error":"rate limited"}"#.to_string()).await;
    let oracle = OpenAiOracle::new("sk-test".into(), Some(base)).unwrap();
    let req = DraftRequest {
        action_type: "dm".into(),
        platform: "forum".into(),
        post_title: "t".into(),
        post_snippet: String::new(),
        topic: "GRE".into(),
        intent_score: 90,
        why_this_matters: String::new(),
    };
    let err = oracle.draft(&req, "m").await.unwrap_err();
    match err {
        OracleError::Transport(msg) => assert!(msg.contains("429")),
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[tokio::test]
async fn forum_listing_becomes_posts() {
    let now = chrono::Utc::now().timestamp() as f64;
    let listing = serde_json::json!({"data": {"children": [
        {"data": {"title": "GRE prep help?", "selftext": "quant", "permalink": "/r/GRE/comments/1/x/",
                  "score": 3, "num_comments": 2, "created_utc": now, "subreddit": "GRE"}},
        {"data": {"title": "Old post", "permalink": "/r/GRE/comments/2/y/",
                  "created_utc": now - 30.0 * 86_400.0}}
    ]}});
    let base = canned(200, listing.to_string()).await;
    let src = ForumSearchSource::new(Duration::from_secs(5), RequestPacing::none())
        .unwrap()
        .with_base_url(base.clone());

    let posts = src
        .search(&["GRE prep".to_string()], &["GRE".to_string()])
        .await
        .unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].url, format!("{base}/r/GRE/comments/1/x/"));
    assert_eq!(posts[0].source, Source::Forum);
    assert_eq!(posts[0].meta.reply_count, Some(2));
}

#[tokio::test]
async fn forum_hot_and_new_listings_join_keyword_hits() {
    let now = chrono::Utc::now().timestamp() as f64;
    let sub = |id: &str, title: &str, created: f64| {
        serde_json::json!({"data": {"title": title, "permalink": format!("/r/GRE/comments/{id}/x/"),
                                    "created_utc": created, "subreddit": "GRE"}})
    };
    let listing = |children: Vec<serde_json::Value>| {
        serde_json::json!({"data": {"children": children}}).to_string()
    };
    let hot = listing(vec![sub("h1", "Hot thread", now), sub("old", "Stale", now - 20.0 * 86_400.0)]);
    let new = listing(vec![sub("h1", "Hot thread", now), sub("n1", "Fresh question", now)]);
    let base = routed(move |path| match path {
        "/r/GRE/hot.json" => (200, hot.clone()),
        "/r/GRE/new.json" => (200, new.clone()),
        _ => (503, "{}".to_string()),
    })
    .await;
    let src = ForumSearchSource::new(Duration::from_secs(5), RequestPacing::none())
        .unwrap()
        .with_base_url(base.clone());

    // Keyword search is down, the listings still come through.
    let posts = src
        .search(&["GRE prep".to_string()], &["GRE".to_string()])
        .await
        .unwrap();
    let urls: Vec<_> = posts.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            format!("{base}/r/GRE/comments/h1/x/"),
            format!("{base}/r/GRE/comments/n1/x/"),
        ]
    );
}

#[tokio::test]
async fn forum_fails_only_when_every_request_fails() {
    let base = canned(500, "{}".to_string()).await;
    let src = ForumSearchSource::new(Duration::from_secs(5), RequestPacing::none())
        .unwrap()
        .with_base_url(base);
    assert!(src
        .search(&["GRE".to_string()], &["GRE".to_string()])
        .await
        .is_err());
}

#[tokio::test]
async fn web_hits_are_deduped_and_classified() {
    let body = serde_json::json!({"results": [
        {"url": "https://x.com/a/status/1", "title": "TOEFL tips?", "content": "need help"},
        {"url": "https://www.quora.com/q", "title": "TOEFL vs IELTS", "content": null}
    ]});
    let base = canned(200, body.to_string()).await;
    let src = WebSearchSource::new(format!("{base}/search"), Duration::from_secs(5), RequestPacing::none())
        .unwrap()
        .with_retry_pause(Duration::ZERO);

    // Three queries all return the same two hits.
    let posts = src.search(&["TOEFL tips".to_string()], &[]).await.unwrap();
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].source, Source::Microblog);
    assert_eq!(posts[1].source, Source::QaSite);
}

#[tokio::test]
async fn web_source_failing_everywhere_reports_error() {
    let base = canned(500, "{}".to_string()).await;
    let src = WebSearchSource::new(base, Duration::from_secs(5), RequestPacing::none())
        .unwrap()
        .with_retry_pause(Duration::ZERO);
    assert!(src.search(&["GRE".to_string()], &[]).await.is_err());
}
