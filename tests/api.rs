//! HTTP surface behavior: authentication gating, status codes, envelopes.

mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use common::{author_hit, paper, login, test_state, MockIndex};
use scholarfeed::routes::create_router;
use scholarfeed::services::AppState;

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    cookie: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let request = match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn setup() -> (Router, AppState, Arc<MockIndex>, String) {
    let mock = Arc::new(MockIndex::default());
    let state = test_state(mock.clone());
    let app = create_router(state.clone());
    let cookie = login(&state, "user-1").await;
    (app, state, mock, cookie)
}

#[tokio::test]
async fn endpoints_require_a_session() {
    let (app, _, _, _) = setup().await;
    for uri in [
        "/api/feedback",
        "/api/folders",
        "/api/follows",
        "/api/profile",
        "/api/papers/search?topics=ml",
    ] {
        let (status, _) = send(&app, Method::GET, uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri} should gate");
    }
}

#[tokio::test]
async fn like_then_unlike_via_http() {
    let (app, _, _, cookie) = setup().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/feedback/like",
        Some(&cookie),
        Some(json!({"paper_id": "W1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (_, feedback) = send(&app, Method::GET, "/api/feedback", Some(&cookie), None).await;
    assert_eq!(feedback["liked"], json!(["W1"]));
    assert_eq!(feedback["disliked"], json!([]));

    let (_, likes) = send(&app, Method::GET, "/api/folders/likes", Some(&cookie), None).await;
    assert_eq!(likes["paperIds"], json!(["W1"]));

    let (status, _) = send(
        &app,
        Method::DELETE,
        "/api/feedback/like/W1",
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, likes) = send(&app, Method::GET, "/api/folders/likes", Some(&cookie), None).await;
    assert_eq!(likes["paperIds"], json!([]));
}

#[tokio::test]
async fn liking_a_disliked_paper_flips_it() {
    let (app, _, _, cookie) = setup().await;

    send(
        &app,
        Method::POST,
        "/api/feedback/dislike",
        Some(&cookie),
        Some(json!({"paper_id": "W2"})),
    )
    .await;
    send(
        &app,
        Method::POST,
        "/api/feedback/like",
        Some(&cookie),
        Some(json!({"paper_id": "W2"})),
    )
    .await;

    let (_, feedback) = send(&app, Method::GET, "/api/feedback", Some(&cookie), None).await;
    assert_eq!(feedback["liked"], json!(["W2"]));
    assert_eq!(feedback["disliked"], json!([]));

    let (_, likes) = send(&app, Method::GET, "/api/folders/likes", Some(&cookie), None).await;
    assert_eq!(likes["paperIds"], json!(["W2"]));
}

#[tokio::test]
async fn likes_folder_cannot_be_deleted() {
    let (app, _, _, cookie) = setup().await;
    let (status, _) = send(&app, Method::DELETE, "/api/folders/likes", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn per_page_and_page_bounds_reject() {
    let (app, _, _, cookie) = setup().await;

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/papers/search?topics=ml&per_page=201",
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/papers/search?topics=ml&page=0",
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::GET, "/api/papers/search", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "missing criteria");
}

#[tokio::test]
async fn search_returns_upstream_page() {
    let (app, _, mock, cookie) = setup().await;
    mock.set_page(1, vec![paper("W1", "hit", Some(2024))]);

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/papers/search?topics=ml&sort_by=recency&page=1&per_page=50",
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["paperId"], "W1");
}

#[tokio::test]
async fn natural_language_search_parses_and_executes() {
    let (app, _, mock, cookie) = setup().await;
    mock.set_page(1, vec![paper("W1", "hit", Some(2024))]);

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/papers/search/query?q=machine%20learning",
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["paperId"], "W1");

    let filter = mock.last_filter.lock().unwrap().clone().unwrap();
    assert_eq!(filter.keyword_groups, vec!["machine learning"]);
}

#[tokio::test]
async fn paper_lookup_is_cache_first_with_upstream_fill() {
    let (app, state, mock, cookie) = setup().await;

    // Unknown everywhere: 404.
    let (status, _) = send(&app, Method::GET, "/api/papers/W404", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Known upstream: fetched and cached.
    mock.add_work(paper("W1", "fetched", Some(2023)));
    let (status, body) = send(&app, Method::GET, "/api/papers/W1", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "fetched");
    assert!(state.papers.get("W1").await.is_some());
}

#[tokio::test]
async fn bulk_by_ids_merges_cache_and_upstream_and_drops_missing() {
    let (app, state, mock, cookie) = setup().await;
    state.papers.put(paper("W3", "cached", None)).await.unwrap();
    mock.add_work(paper("W1", "upstream", None));

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/papers/bulk/by-ids?paper_ids=W3,W1,W9",
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["paperId"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["W3", "W1"]);
}

#[tokio::test]
async fn folder_lifecycle_with_snapshot() {
    let (app, _, _, cookie) = setup().await;

    let (status, folder) = send(
        &app,
        Method::POST,
        "/api/folders",
        Some(&cookie),
        Some(json!({"name": "Reading list"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let folder_id = folder["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/folders/{folder_id}/papers"),
        Some(&cookie),
        Some(json!({
            "paper_id": "W1",
            "paper_data": {"paperId": "W1", "title": "Snapshot", "year": 2024}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // The embedded copy resolves from the snapshot that was upserted.
    let (_, view) = send(
        &app,
        Method::GET,
        &format!("/api/folders/{folder_id}"),
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(view["paperCount"], 1);
    assert_eq!(view["papers"][0]["title"], "Snapshot");

    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/api/folders/{folder_id}/papers/W1"),
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/api/folders/{folder_id}"),
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/api/folders/{folder_id}"),
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn duplicate_folder_names_conflict() {
    let (app, _, _, cookie) = setup().await;
    let body = json!({"name": "Duplicates"});
    let (status, _) = send(&app, Method::POST, "/api/folders", Some(&cookie), Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send(&app, Method::POST, "/api/folders", Some(&cookie), Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn refollowing_returns_the_same_edge() {
    let (app, _, _, cookie) = setup().await;
    let body = json!({
        "type": "author",
        "entityId": "A1",
        "entityName": "Ada Lovelace",
        "openalexId": "https://openalex.org/A1"
    });

    let (status, first) = send(&app, Method::POST, "/api/follows", Some(&cookie), Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["success"], true);

    let (status, second) = send(&app, Method::POST, "/api/follows", Some(&cookie), Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["follow"]["followedAt"], first["follow"]["followedAt"]);

    let (_, follows) = send(&app, Method::GET, "/api/follows", Some(&cookie), None).await;
    assert_eq!(follows["follows"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unfollow_then_missing_is_not_found() {
    let (app, _, _, cookie) = setup().await;
    send(
        &app,
        Method::POST,
        "/api/follows",
        Some(&cookie),
        Some(json!({"type": "topic", "entityId": "C1", "entityName": "Storage", "openalexId": "C1"})),
    )
    .await;

    let (status, body) = send(&app, Method::DELETE, "/api/follows/topic/C1", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, _) = send(&app, Method::DELETE, "/api/follows/topic/C1", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn followed_papers_envelope() {
    let (app, _, mock, cookie) = setup().await;
    send(
        &app,
        Method::POST,
        "/api/follows",
        Some(&cookie),
        Some(json!({"type": "author", "entityId": "A1", "entityName": "Ada", "openalexId": "A1"})),
    )
    .await;
    mock.set_entity_works(
        "A1",
        vec![paper("W1", "new", Some(2024)), paper("W2", "old", Some(2020))],
    );

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/follows/papers?limit_per_entity=10&total_limit=10",
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert_eq!(body["papers"][0]["paperId"], "W1");
}

#[tokio::test]
async fn entity_search_validates_kind_and_returns_hits() {
    let (app, _, mock, cookie) = setup().await;
    mock.set_entity_hits("ada", vec![author_hit("A1", "Ada Lovelace")]);

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/entity-search/authors?q=ada",
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"][0]["id"], "A1");

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/entity-search/journals?q=x",
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn profile_round_trip_includes_likes_folder() {
    let (app, _, _, cookie) = setup().await;

    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/profile",
        Some(&cookie),
        Some(json!({"topics": ["ml", "ML", "systems"], "authors": ["Ada Lovelace"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, profile) = send(&app, Method::GET, "/api/profile", Some(&cookie), None).await;
    assert_eq!(profile["topics"], json!(["ml", "systems"]));
    assert_eq!(profile["authors"], json!(["Ada Lovelace"]));
    assert_eq!(profile["folders"][0]["id"], "likes");

    let (status, _) = send(&app, Method::DELETE, "/api/profile", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, profile) = send(&app, Method::GET, "/api/profile", Some(&cookie), None).await;
    assert_eq!(profile["topics"], json!([]));
}

#[tokio::test]
async fn auth_status_reflects_the_session() {
    let (app, _, _, cookie) = setup().await;

    let (_, anonymous) = send(&app, Method::GET, "/api/auth/status", None, None).await;
    assert_eq!(anonymous["authenticated"], false);

    let (_, authed) = send(&app, Method::GET, "/api/auth/status", Some(&cookie), None).await;
    assert_eq!(authed["authenticated"], true);
    assert_eq!(authed["user"]["id"], "user-1");

    let (_, me) = send(&app, Method::GET, "/api/auth/me", Some(&cookie), None).await;
    assert_eq!(me["email"], "user-1@example.com");
}

#[tokio::test]
async fn recommendations_endpoint_filters_seen_papers() {
    let (app, state, mock, cookie) = setup().await;
    state.users.put_profile("user-1", vec!["ml".into()], vec![]).await.unwrap();
    state.users.like("user-1", "W10").await.unwrap();
    state.users.dislike("user-1", "W11").await.unwrap();
    mock.set_page(
        1,
        vec![
            paper("W10", "seen", Some(2024)),
            paper("W11", "seen", Some(2024)),
            paper("W12", "new", Some(2024)),
        ],
    );

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/papers/recommendations?limit=10",
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["paperId"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["W12"]);
}

#[tokio::test]
async fn parse_query_endpoint_returns_entities() {
    let (app, _, _, cookie) = setup().await;
    let (status, body) = send(
        &app,
        Method::GET,
        "/api/papers/parse-query?q=machine%20learning%20by%20John%20Smith",
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["keywords"], json!(["machine learning"]));
    assert_eq!(body["authors"], json!(["John Smith"]));
}
