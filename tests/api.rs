use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use blango::api::{build_router, AppState};
use blango::cache::create_cache;
use blango::config::Config;
use blango::db::{create_test_pool, migrations};
use blango::models::{Caller, User};
use blango::services::{PostDraft, RegisterInput};
use chrono::{Duration, NaiveDateTime, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    state: AppState,
}

async fn setup() -> TestApp {
    let pool = create_test_pool().await.expect("Failed to create test pool");
    migrations::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let config = Arc::new(Config::default());
    let cache = create_cache(&config.cache).expect("Failed to create cache");
    let state = AppState::new(pool, cache, config);
    let router = build_router(state.clone()).expect("Failed to build router");

    TestApp { router, state }
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

async fn send(
    app: &TestApp,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Reply {
    send_to_host(app, "testserver", method, uri, token, body).await
}

async fn send_to_host(
    app: &TestApp,
    host: &str,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Reply {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::HOST, host);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Token {}", token));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    Reply {
        status,
        headers,
        body,
    }
}

async fn register(app: &TestApp, email: &str, password: &str) -> User {
    app.state
        .user_service
        .register(RegisterInput::new(email, password))
        .await
        .expect("Failed to register user")
}

async fn token_for(app: &TestApp, email: &str, password: &str) -> String {
    let reply = send(
        app,
        Method::POST,
        "/api/v1/token-auth/",
        None,
        Some(json!({"username": email, "password": password})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    reply.body["token"].as_str().unwrap().to_string()
}

async fn publish(app: &TestApp, author: &User, slug: &str) -> i64 {
    let draft = PostDraft {
        title: format!("Title {}", slug),
        slug: slug.to_string(),
        summary: "Summary".to_string(),
        content: "Content".to_string(),
        published_at: Some(Utc::now() - Duration::minutes(1)),
        ..PostDraft::default()
    };
    app.state
        .post_service
        .create(&Caller::User(author.clone()), draft)
        .await
        .expect("Failed to create post")
        .id
}

#[tokio::test]
async fn anonymous_post_list_shows_published_posts() {
    let app = setup().await;
    let u1 = register(&app, "test@example.com", "password").await;
    let u2 = register(&app, "test2@example.com", "password2").await;
    publish(&app, &u1, "post-1").await;
    publish(&app, &u2, "post-2").await;

    let reply = send(&app, Method::GET, "/api/v1/posts/", None, None).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["count"], 2);
    assert_eq!(reply.body["next"], Value::Null);
    let results = reply.body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);

    for (post, email) in results.iter().zip(["test@example.com", "test2@example.com"]) {
        let author = post["author"].as_str().unwrap();
        assert!(author.ends_with(&format!("/api/v1/users/{}", email)));
        assert!(author.starts_with("http://testserver"));
        assert!(post.get("content").is_none());

        let published = post["published_at"].as_str().unwrap();
        assert!(NaiveDateTime::parse_from_str(published, "%Y-%m-%dT%H:%M:%S%.6fZ").is_ok());
    }
}

#[tokio::test]
async fn unauthenticated_create_is_rejected() {
    let app = setup().await;
    register(&app, "test@example.com", "password").await;

    let reply = send(
        &app,
        Method::POST,
        "/api/v1/posts/",
        None,
        Some(json!({
            "title": "Test Post",
            "slug": "test-post-3",
            "summary": "Test Summary",
            "content": "Test Content",
            "author": "http://testserver/api/v1/users/test@example.com",
            "published_at": "2021-01-10T09:00:00Z"
        })),
    )
    .await;

    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    let list = send(&app, Method::GET, "/api/v1/posts/", None, None).await;
    assert_eq!(list.body["count"], 0);
}

#[tokio::test]
async fn authenticated_create_round_trips() {
    let app = setup().await;
    register(&app, "test@example.com", "password").await;
    let token = token_for(&app, "test@example.com", "password").await;

    let reply = send(
        &app,
        Method::POST,
        "/api/v1/posts/",
        Some(&token),
        Some(json!({
            "title": "Test Post",
            "slug": "test-post-3",
            "summary": "Test Summary",
            "content": "Test Content",
            "author": "http://testserver/api/v1/users/test@example.com",
            "published_at": "2021-01-10T09:00:00Z",
            "tags": ["django", "rest"]
        })),
    )
    .await;

    assert_eq!(reply.status, StatusCode::CREATED);
    assert!(reply.body.get("content").is_none());
    let id = reply.body["id"].as_i64().unwrap();

    let detail = send(&app, Method::GET, &format!("/api/v1/posts/{}/", id), Some(&token), None).await;
    assert_eq!(detail.status, StatusCode::OK);
    assert_eq!(detail.body["title"], "Test Post");
    assert_eq!(detail.body["slug"], "test-post-3");
    assert_eq!(detail.body["summary"], "Test Summary");
    assert_eq!(detail.body["content"], "Test Content");
    assert_eq!(detail.body["published_at"], "2021-01-10T09:00:00.000000Z");
    assert_eq!(detail.body["tags"], json!(["django", "rest"]));
    assert_eq!(
        detail.body["author"],
        "http://testserver/api/v1/users/test@example.com"
    );
}

#[tokio::test]
async fn invalid_period_is_not_found_for_everyone() {
    let app = setup().await;
    register(&app, "test@example.com", "password").await;
    let token = token_for(&app, "test@example.com", "password").await;

    for token in [None, Some(token.as_str())] {
        let reply = send(&app, Method::GET, "/api/v1/posts/by-time/month/", token, None).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
        assert_eq!(
            reply.body["error"]["message"],
            "Time period month is not valid, should be 'new', 'today' or 'week'"
        );
    }

    let ok = send(&app, Method::GET, "/api/v1/posts/by-time/today/", None, None).await;
    assert_eq!(ok.status, StatusCode::OK);
}

#[tokio::test]
async fn mine_requires_login() {
    let app = setup().await;
    let user = register(&app, "test@example.com", "password").await;
    let other = register(&app, "other@example.com", "password").await;
    publish(&app, &user, "mine").await;
    publish(&app, &other, "theirs").await;

    let anonymous = send(&app, Method::GET, "/api/v1/posts/mine/", None, None).await;
    assert_eq!(anonymous.status, StatusCode::FORBIDDEN);
    assert_eq!(
        anonymous.body["error"]["message"],
        "You must be logged in to see which Posts are yours"
    );

    let token = token_for(&app, "test@example.com", "password").await;
    let mine = send(&app, Method::GET, "/api/v1/posts/mine/", Some(&token), None).await;
    assert_eq!(mine.status, StatusCode::OK);
    assert_eq!(mine.body["count"], 1);
    assert_eq!(mine.body["results"][0]["slug"], "mine");
}

#[tokio::test]
async fn unknown_token_is_unauthorized() {
    let app = setup().await;
    let reply = send(&app, Method::GET, "/api/v1/posts/", Some("not-a-token"), None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn post_list_is_cached_per_identity_and_invalidated_on_write() {
    let app = setup().await;
    let user = register(&app, "test@example.com", "password").await;
    let token = token_for(&app, "test@example.com", "password").await;
    publish(&app, &user, "first").await;

    let miss = send(&app, Method::GET, "/api/v1/posts/", None, None).await;
    assert_eq!(miss.headers["x-cache"], "MISS");
    assert_eq!(miss.headers[header::VARY], "Authorization, Cookie");

    let hit = send(&app, Method::GET, "/api/v1/posts/", None, None).await;
    assert_eq!(hit.headers["x-cache"], "HIT");
    assert_eq!(hit.body, miss.body);

    let other_identity = send(&app, Method::GET, "/api/v1/posts/", Some(&token), None).await;
    assert_eq!(other_identity.headers["x-cache"], "MISS");

    let created = send(
        &app,
        Method::POST,
        "/api/v1/posts/",
        Some(&token),
        Some(json!({
            "title": "Second",
            "slug": "second",
            "published_at": "2021-01-10T09:00:00Z"
        })),
    )
    .await;
    assert_eq!(created.status, StatusCode::CREATED);

    let fresh = send(&app, Method::GET, "/api/v1/posts/", None, None).await;
    assert_eq!(fresh.headers["x-cache"], "MISS");
    assert_eq!(fresh.body["count"], 2);
}

#[tokio::test]
async fn cached_lists_keep_links_of_the_requesting_host() {
    let app = setup().await;
    let user = register(&app, "test@example.com", "password").await;
    publish(&app, &user, "hosted").await;

    let a = send_to_host(&app, "a.example", Method::GET, "/api/v1/posts/", None, None).await;
    assert_eq!(a.headers["x-cache"], "MISS");
    assert_eq!(
        a.body["results"][0]["author"],
        "http://a.example/api/v1/users/test@example.com"
    );

    let b = send_to_host(&app, "b.example", Method::GET, "/api/v1/posts/", None, None).await;
    assert_eq!(b.headers["x-cache"], "MISS");
    assert_eq!(
        b.body["results"][0]["author"],
        "http://b.example/api/v1/users/test@example.com"
    );

    let a_again = send_to_host(&app, "a.example", Method::GET, "/api/v1/posts/", None, None).await;
    assert_eq!(a_again.headers["x-cache"], "HIT");
    assert_eq!(a_again.body, a.body);
}

#[tokio::test]
async fn post_retrieve_is_not_cached() {
    let app = setup().await;
    let user = register(&app, "test@example.com", "password").await;
    let id = publish(&app, &user, "detail").await;

    let uri = format!("/api/v1/posts/{}/", id);
    send(&app, Method::GET, &uri, None, None).await;
    let second = send(&app, Method::GET, &uri, None, None).await;

    assert_eq!(second.status, StatusCode::OK);
    assert!(second.headers.get("x-cache").is_none());
}

#[tokio::test]
async fn only_author_or_staff_may_modify() {
    let app = setup().await;
    let staff = register(&app, "staff@example.com", "password").await;
    let author = register(&app, "author@example.com", "password").await;
    register(&app, "other@example.com", "password").await;
    assert!(staff.is_staff);

    let id = publish(&app, &author, "owned").await;
    let uri = format!("/api/v1/posts/{}/", id);
    let other = token_for(&app, "other@example.com", "password").await;
    let own = token_for(&app, "author@example.com", "password").await;
    let admin = token_for(&app, "staff@example.com", "password").await;

    let anonymous = send(&app, Method::PATCH, &uri, None, Some(json!({"title": "x"}))).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let denied = send(&app, Method::PATCH, &uri, Some(&other), Some(json!({"title": "x"}))).await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);

    let patched = send(&app, Method::PATCH, &uri, Some(&admin), Some(json!({"title": "By staff"}))).await;
    assert_eq!(patched.status, StatusCode::OK);
    assert_eq!(patched.body["title"], "By staff");
    assert_eq!(patched.body["content"], "Content");

    let put = send(
        &app,
        Method::PUT,
        &uri,
        Some(&own),
        Some(json!({"title": "T", "slug": "owned", "summary": "S", "content": "C", "published_at": null})),
    )
    .await;
    assert_eq!(put.status, StatusCode::OK);
    assert_eq!(put.body["published_at"], Value::Null);

    let deleted = send(&app, Method::DELETE, &uri, Some(&own), None).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);

    let gone = send(&app, Method::GET, &uri, Some(&own), None).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn tag_endpoints() {
    let app = setup().await;
    let user = register(&app, "test@example.com", "password").await;
    let token = token_for(&app, "test@example.com", "password").await;

    let anonymous = send(&app, Method::POST, "/api/v1/tags/", None, Some(json!({"name": "rust"}))).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let created = send(&app, Method::POST, "/api/v1/tags/", Some(&token), Some(json!({"name": "rust"}))).await;
    assert_eq!(created.status, StatusCode::CREATED);
    let tag_id = created.body["id"].as_i64().unwrap();

    let duplicate = send(&app, Method::POST, "/api/v1/tags/", Some(&token), Some(json!({"name": "rust"}))).await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let draft = PostDraft {
        title: "Tagged".to_string(),
        slug: "tagged".to_string(),
        tags: vec!["rust".to_string()],
        ..PostDraft::default()
    };
    app.state
        .post_service
        .create(&Caller::User(user), draft)
        .await
        .unwrap();

    let posts = send(&app, Method::GET, &format!("/api/v1/tags/{}/posts/", tag_id), None, None).await;
    assert_eq!(posts.status, StatusCode::OK);
    assert_eq!(posts.body["count"], 1);
    assert_eq!(posts.body["results"][0]["slug"], "tagged");

    let missing = send(&app, Method::GET, "/api/v1/tags/999/posts/", None, None).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    let list = send(&app, Method::GET, "/api/v1/tags/", None, None).await;
    assert_eq!(list.body["count"], 1);
    assert_eq!(list.body["results"][0]["name"], "rust");

    let renamed = send(
        &app,
        Method::PATCH,
        &format!("/api/v1/tags/{}/", tag_id),
        Some(&token),
        Some(json!({"name": "rustlang"})),
    )
    .await;
    assert_eq!(renamed.body["name"], "rustlang");

    let deleted = send(&app, Method::DELETE, &format!("/api/v1/tags/{}/", tag_id), Some(&token), None).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);

    let list = send(&app, Method::GET, "/api/v1/tags/", None, None).await;
    assert_eq!(list.body["count"], 0);
}

#[tokio::test]
async fn registration_and_token_auth() {
    let app = setup().await;

    let registered = send(
        &app,
        Method::POST,
        "/api/v1/auth/register/",
        None,
        Some(json!({"email": "new@example.com", "password": "secret", "first_name": "Ada"})),
    )
    .await;
    assert_eq!(registered.status, StatusCode::CREATED);
    assert_eq!(registered.body["email"], "new@example.com");
    assert!(registered.body.get("password_hash").is_none());

    let duplicate = send(
        &app,
        Method::POST,
        "/api/v1/auth/register/",
        None,
        Some(json!({"email": "new@example.com", "password": "secret"})),
    )
    .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let bad = send(
        &app,
        Method::POST,
        "/api/v1/token-auth/",
        None,
        Some(json!({"username": "new@example.com", "password": "wrong"})),
    )
    .await;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);

    let first = token_for(&app, "new@example.com", "secret").await;
    let second = token_for(&app, "new@example.com", "secret").await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn user_detail_by_email() {
    let app = setup().await;
    register(&app, "test@example.com", "password").await;

    let found = send(&app, Method::GET, "/api/v1/users/test@example.com", None, None).await;
    assert_eq!(found.status, StatusCode::OK);
    assert_eq!(found.body["email"], "test@example.com");
    assert_eq!(found.headers["x-cache"], "MISS");

    let missing = send(&app, Method::GET, "/api/v1/users/ghost@example.com", None, None).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_page_is_not_found() {
    let app = setup().await;
    let user = register(&app, "test@example.com", "password").await;
    publish(&app, &user, "only").await;

    let reply = send(&app, Method::GET, "/api/v1/posts/?page=2", None, None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body["error"]["message"], "Invalid page.");

    let bad_ordering = send(&app, Method::GET, "/api/v1/posts/?ordering=content", None, None).await;
    assert_eq!(bad_ordering.status, StatusCode::BAD_REQUEST);
}
