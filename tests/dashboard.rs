mod common;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::util::ServiceExt;

use beatbox::commands::music::utils::broadcaster::{PlayerSnapshot, StateBroadcaster};
use beatbox::dashboard::{DashboardState, build_router};
use beatbox::utils::database::{Database, TrackPlayEntry};

use common::fixtures::{GUILD, track};
use common::mocks::MockPlayer;

const TOKEN: &str = "s3cret";

fn playing_player() -> MockPlayer {
    let mut player = MockPlayer::new();
    player.expect_snapshot().returning(|guild_id| {
        (guild_id == GUILD).then(|| PlayerSnapshot {
            guild_id: guild_id.to_string(),
            current: Some(track("Now")),
            queue: vec![track("Next")],
            playing: true,
            paused: false,
            volume: 80,
        })
    });
    player
}

fn app(token: Option<&str>) -> (Router, Database) {
    let db = Database::open_in_memory().unwrap();
    let broadcaster = Arc::new(StateBroadcaster::new(
        Arc::new(playing_player()),
        StateBroadcaster::DEFAULT_CAPACITY,
    ));
    let state = DashboardState::new(db.clone(), broadcaster, token.map(str::to_string));
    (build_router(state), db)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn with_json(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Creates a playlist through the API and returns its id.
async fn create_playlist(app: &Router, name: &str) -> i64 {
    let (status, body) = send(
        app.clone(),
        with_json("POST", "/api/playlists", json!({ "name": name, "userId": "42" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_i64().unwrap()
}

async fn add_track(app: &Router, playlist_id: i64, title: &str) -> i64 {
    let (status, body) = send(
        app.clone(),
        with_json(
            "POST",
            &format!("/api/playlists/{playlist_id}/tracks"),
            json!({
                "title": title,
                "author": "The Band",
                "uri": format!("https://www.youtube.com/watch?v={title}"),
                "durationMs": 1000
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_i64().unwrap()
}

fn titles(tracks: &Value) -> Vec<String> {
    tracks
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["title"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn player_returns_the_current_snapshot() {
    let (app, _) = app(None);
    let (status, body) = send(app, get("/api/guilds/1001/player")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["guildId"], "1001");
    assert_eq!(body["current"]["title"], "Now");
    assert_eq!(body["queue"][0]["title"], "Next");
    assert_eq!(body["playing"], true);
    assert_eq!(body["volume"], 80);
}

#[tokio::test]
async fn unknown_guild_gets_an_idle_snapshot() {
    let (app, _) = app(None);
    let (status, body) = send(app, get("/api/guilds/9/player")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current"], Value::Null);
    assert_eq!(body["playing"], false);
}

#[tokio::test]
async fn malformed_guild_id_is_a_bad_request() {
    let (app, _) = app(None);
    let (status, body) = send(app, get("/api/guilds/not-a-guild/settings")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("not-a-guild"));
}

#[tokio::test]
async fn settings_default_and_patch_ignores_unknown_fields() {
    let (app, db) = app(None);

    let (status, body) = send(app.clone(), get("/api/guilds/1001/settings")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["announceNowPlaying"], true);
    assert_eq!(body["autoPlay"], true);
    assert_eq!(body["maxQueueSize"], 500);

    let patch = Request::builder()
        .method("PATCH")
        .uri("/api/guilds/1001/settings")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "autoPlay": false, "requestChannelId": "123", "bogus": 1 }).to_string(),
        ))
        .unwrap();
    let (status, body) = send(app, patch).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["autoPlay"], false);
    assert_eq!(body["announceNowPlaying"], true);
    assert_eq!(body["requestChannelId"], Value::Null);

    let stored = db.guild_settings("1001").unwrap().unwrap();
    assert!(!stored.auto_play);
    assert_eq!(stored.request_channel_id, None);
}

#[tokio::test]
async fn patch_rejects_an_empty_queue_limit() {
    let (app, _) = app(None);
    let patch = Request::builder()
        .method("PATCH")
        .uri("/api/guilds/1001/settings")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "maxQueueSize": 0 }).to_string()))
        .unwrap();
    let (status, body) = send(app, patch).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn last_queue_is_404_until_saved() {
    let (app, db) = app(None);
    let (status, body) = send(app.clone(), get("/api/guilds/1001/last-queue")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    db.save_last_queue("1001", &[track("Saved").queue_entry(0, true)])
        .unwrap();
    let (status, body) = send(app, get("/api/guilds/1001/last-queue")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tracks"][0]["title"], "Saved");
    assert_eq!(body["tracks"][0]["wasPlaying"], true);
}

#[tokio::test]
async fn history_is_newest_first_and_limited() {
    let (app, db) = app(None);
    for n in 0..5 {
        let entry: TrackPlayEntry = track(&format!("t{n}")).play_entry(GUILD);
        db.insert_track_play(&entry).unwrap();
    }

    let (status, body) = send(app, get("/api/guilds/1001/history?limit=2")).await;
    assert_eq!(status, StatusCode::OK);
    let titles: Vec<_> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|play| play["title"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(titles, vec!["t4", "t3"]);
}

#[tokio::test]
async fn token_is_enforced_when_configured() {
    let (app, _) = app(Some(TOKEN));

    let (status, body) = send(app.clone(), get("/api/guilds/1001/player")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let wrong = Request::builder()
        .uri("/api/guilds/1001/player")
        .header(header::AUTHORIZATION, "Bearer nope")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(app.clone(), wrong).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let authorized = Request::builder()
        .uri("/api/guilds/1001/player")
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app, authorized).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["guildId"], "1001");
}

#[tokio::test]
async fn events_stream_is_served_as_sse() {
    let (app, _) = app(None);
    let response = app.oneshot(get("/api/guilds/1001/events")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
}

#[tokio::test]
async fn playlist_create_requires_a_name_and_owner() {
    let (app, _) = app(None);

    let (status, body) = send(
        app.clone(),
        with_json("POST", "/api/playlists", json!({ "userId": "42" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Playlist name is required");

    let (status, _) = send(
        app.clone(),
        with_json("POST", "/api/playlists", json!({ "name": "   ", "userId": "42" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        app.clone(),
        with_json("POST", "/api/playlists", json!({ "name": "Mix" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("userId"));
}

#[tokio::test]
async fn playlist_is_created_listed_and_deleted() {
    let (app, db) = app(None);

    let (status, body) = send(
        app.clone(),
        with_json(
            "POST",
            "/api/playlists",
            json!({ "name": "Road trip", "userId": "42", "isPublic": true, "description": "Long drives" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], "Road trip");
    assert_eq!(body["isPublic"], true);
    assert_eq!(body["trackCount"], 0);
    let id = body["id"].as_i64().unwrap();

    let (status, _) = send(
        app.clone(),
        with_json("POST", "/api/playlists", json!({ "name": "road TRIP", "userId": "42" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(app.clone(), get("/api/playlists")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["name"], "Road trip");

    let (status, body) = send(app.clone(), delete(&format!("/api/playlists/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert!(db.playlist(id).unwrap().is_none());

    let (status, _) = send(app, delete(&format!("/api/playlists/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn private_playlists_are_listed_only_for_their_owner() {
    let (app, _) = app(None);
    create_playlist(&app, "Secret").await;

    let (_, anonymous) = send(app.clone(), get("/api/playlists")).await;
    assert_eq!(anonymous, json!([]));

    let (_, owner) = send(app, get("/api/playlists?userId=42")).await;
    assert_eq!(owner[0]["name"], "Secret");
}

#[tokio::test]
async fn playlist_tracks_need_title_author_and_uri() {
    let (app, _) = app(None);
    let id = create_playlist(&app, "Mix").await;

    let (status, body) = send(
        app.clone(),
        with_json(
            "POST",
            &format!("/api/playlists/{id}/tracks"),
            json!({ "title": "Song", "uri": "https://example.com/song" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "title, author, and uri are required");

    let (status, _) = send(
        app,
        with_json(
            "POST",
            "/api/playlists/999/tracks",
            json!({ "title": "Song", "author": "Band", "uri": "https://example.com/song" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn playlist_tracks_append_and_reorder() {
    let (app, db) = app(None);
    let id = create_playlist(&app, "Mix").await;
    let a = add_track(&app, id, "a").await;
    let b = add_track(&app, id, "b").await;
    let c = add_track(&app, id, "c").await;

    let stored = db.playlist(id).unwrap().unwrap();
    let positions: Vec<_> = stored.tracks.iter().map(|t| t.position).collect();
    assert_eq!(positions, vec![1, 2, 3]);

    let uri = format!("/api/playlists/{id}/tracks");
    let (status, body) = send(
        app.clone(),
        with_json("PATCH", &uri, json!({ "order": [c, a, b] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(titles(&body), vec!["c", "a", "b"]);
    assert_eq!(body[0]["position"], 1);
    assert_eq!(body[2]["position"], 3);

    let (status, body) = send(app.clone(), with_json("PATCH", &uri, json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "order array is required");

    // A partial order is rejected and the previous order survives.
    let (status, _) = send(
        app.clone(),
        with_json("PATCH", &uri, json!({ "order": [b, a] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let stored = db.playlist(id).unwrap().unwrap();
    let order: Vec<_> = stored.tracks.iter().map(|t| t.id).collect();
    assert_eq!(order, vec![c, a, b]);

    let (status, body) = send(app.clone(), delete(&uri)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "trackId query param is required");

    let (status, _) = send(app.clone(), delete(&format!("{uri}?trackId={a}"))).await;
    assert_eq!(status, StatusCode::OK);
    let stored = db.playlist(id).unwrap().unwrap();
    let remaining: Vec<_> = stored
        .tracks
        .iter()
        .map(|t| (t.position, t.title.as_str()))
        .collect();
    assert_eq!(remaining, vec![(1, "c"), (2, "b")]);

    let (status, _) = send(app, delete(&format!("{uri}?trackId={a}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
