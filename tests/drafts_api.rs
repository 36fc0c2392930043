//! Draft versioning, finalize and charter media replacement over HTTP.

#[macro_use]
mod common;

use actix_web::http::StatusCode;
use actix_web::test;
use serde_json::{json, Value};
use uuid::Uuid;

fn images(user: Uuid, n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| {
            json!({
                "name": format!("captains/{user}/media/{i}-photo.jpg"),
                "url": format!("http://test.local/media/captains/{user}/media/{i}-photo.jpg"),
            })
        })
        .collect()
}

fn complete_draft() -> Value {
    json!({
        "captain": { "displayName": "Cap Lee", "phone": "+60 12 345", "experienceYears": 12 },
        "charter": {
            "name": "Reel Deal",
            "charterType": "private",
            "state": "Johor",
            "city": "Mersing",
            "startingPoint": "Jetty 3"
        },
        "amenities": ["bait", "ice"],
        "boat": { "name": "Marlin", "boatType": "center console", "lengthFt": 28, "capacity": 6 },
        "trips": [{
            "name": "Half day",
            "tripType": "inshore",
            "durationHours": 4.0,
            "price": 450.0,
            "maxAnglers": 4,
            "startTimes": ["07:00"]
        }]
    })
}

macro_rules! call_json {
    ($app:expr, $req:expr) => {{
        let resp = test::call_service(&$app, $req.to_request()).await;
        let status = resp.status();
        let body: Value = test::read_body_json(resp).await;
        (status, body)
    }};
}

fn as_user(req: test::TestRequest, user: Uuid) -> test::TestRequest {
    req.insert_header(("x-user-id", user.to_string()))
}

#[actix_web::test]
async fn patch_bumps_version_and_rejects_stale_writes() {
    let ctx = common::context();
    let app = init_app!(ctx);
    let user = Uuid::new_v4();

    let (status, body) = call_json!(app, as_user(test::TestRequest::post().uri("/api/v1/drafts"), user));
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["draft"]["version"], 1);
    assert_eq!(body["draft"]["currentStep"], 0);
    let id = body["draft"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/v1/drafts/{id}");

    let (status, body) = call_json!(
        app,
        as_user(test::TestRequest::patch().uri(&uri), user).set_json(json!({
            "dataPartial": { "charter": { "name": "Reel Deal" } },
            "clientVersion": 1,
            "currentStep": 1
        }))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["draft"]["version"], 2);
    assert_eq!(body["draft"]["currentStep"], 1);
    assert_eq!(body["draft"]["data"]["charter"]["name"], "Reel Deal");

    let (status, body) = call_json!(
        app,
        as_user(test::TestRequest::patch().uri(&uri), user).set_json(json!({
            "dataPartial": { "amenities": ["ice"] },
            "clientVersion": 1,
            "currentStep": 2
        }))
    );
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "version_conflict");
    assert_eq!(body["currentVersion"], 2);

    // Partial merge kept the earlier section.
    let (status, body) = call_json!(app, as_user(test::TestRequest::get().uri(&uri), user));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["draft"]["version"], 2);
    assert_eq!(body["draft"]["data"]["charter"]["name"], "Reel Deal");
    assert!(body["draft"]["data"].get("amenities").is_none());

    let (status, _) = call_json!(app, as_user(test::TestRequest::get().uri(&uri), Uuid::new_v4()));
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn finalize_validation_failure_lists_issues_with_request_id() {
    let ctx = common::context();
    let app = init_app!(ctx);
    let user = Uuid::new_v4();

    let (_, body) = call_json!(
        app,
        as_user(test::TestRequest::post().uri("/api/v1/drafts"), user).set_json(json!({
            "captain": { "displayName": "Cap Lee" },
            "charter": { "name": "Reel Deal" }
        }))
    );
    let id = body["draft"]["id"].as_str().unwrap().to_string();

    let (status, body) = call_json!(
        app,
        as_user(
            test::TestRequest::post().uri(&format!("/api/v1/drafts/{id}/finalize")),
            user
        )
        .insert_header(("x-draft-version", "1"))
        .set_json(json!({ "media": { "images": images(user, 2) } }))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");
    assert!(body["issues"]["images"].is_array());
    assert!(body["issues"]["amenities"].is_array());
    assert!(body["issues"]["trips"].is_array());
    assert!(Uuid::parse_str(body["requestId"].as_str().unwrap()).is_ok());
    assert_eq!(ctx.repo.charter_count(), 0);
}

#[actix_web::test]
async fn finalize_creates_charter_and_closes_the_draft() {
    let ctx = common::context();
    let app = init_app!(ctx);
    let user = Uuid::new_v4();

    let (_, body) = call_json!(
        app,
        as_user(test::TestRequest::post().uri("/api/v1/drafts"), user).set_json(complete_draft())
    );
    let id = body["draft"]["id"].as_str().unwrap().to_string();
    let finalize_uri = format!("/api/v1/drafts/{id}/finalize");
    let media = json!({
        "media": {
            "images": images(user, 3),
            "imagesOrder": [2, 0, 0],
            "imagesCoverIndex": 7
        }
    });

    let (status, body) = call_json!(
        app,
        as_user(test::TestRequest::post().uri(&finalize_uri), user)
            .insert_header(("x-draft-version", "9"))
            .set_json(media.clone())
    );
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "version_conflict");

    let (status, body) = call_json!(
        app,
        as_user(test::TestRequest::post().uri(&finalize_uri), user)
            .insert_header(("x-draft-version", "1"))
            .set_json(media)
    );
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["ok"], true);
    let charter_id = body["charterId"].as_str().unwrap().to_string();
    assert_eq!(ctx.repo.charter_count(), 1);

    // Malformed order and cover fall back to upload order.
    let rows = ctx.repo.charter_media_snapshot();
    let mut photos: Vec<_> = rows.iter().filter(|r| r.charter_id == charter_id).collect();
    photos.sort_by_key(|r| r.sort_order);
    assert_eq!(photos.len(), 3);
    assert!(photos[0].storage_key.ends_with("/0-photo.jpg"));
    assert!(photos[2].storage_key.ends_with("/2-photo.jpg"));

    let (status, body) = call_json!(
        app,
        as_user(test::TestRequest::patch().uri(&format!("/api/v1/drafts/{id}")), user).set_json(
            json!({ "dataPartial": {}, "clientVersion": 1, "currentStep": 4 })
        )
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "draft_not_editable");

    // Edit mode: replace media, deleting one of the old keys.
    let replacement = images(user, 4);
    let deleted = replacement[0]["name"].as_str().unwrap().to_string();
    ctx.state.blobs.put(&deleted, b"old").await.unwrap();
    let (status, _) = call_json!(
        app,
        as_user(
            test::TestRequest::put().uri(&format!("/api/v1/charters/{charter_id}/media")),
            user
        )
        .set_json(json!({
            "media": { "images": replacement[1..].to_vec(), "videos": [] },
            "deleteKeys": [deleted.clone()]
        }))
    );
    assert_eq!(status, StatusCode::OK);
    assert!(!ctx.state.blobs.exists(&deleted).await);
    let remaining = ctx
        .repo
        .charter_media_snapshot()
        .into_iter()
        .filter(|r| r.charter_id == charter_id)
        .count();
    assert_eq!(remaining, 3);

    let (status, _) = call_json!(
        app,
        as_user(
            test::TestRequest::put().uri(&format!("/api/v1/charters/{charter_id}/media")),
            Uuid::new_v4()
        )
        .set_json(json!({ "media": { "images": images(user, 3), "videos": [] } }))
    );
    assert_eq!(status, StatusCode::NOT_FOUND);
}
