use std::collections::HashMap;

use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use server::{app, config::Settings, AppState};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    state: AppState,
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Reply {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("json body")
    }
}

fn test_app(overrides: &[(&str, &str)]) -> TestApp {
    let root = std::env::temp_dir().join(format!("text-to-cad-api-{}", uuid::Uuid::new_v4()));
    let mut vars: HashMap<String, String> = HashMap::new();
    vars.insert("TEMP_DIR".into(), root.join("temp").display().to_string());
    vars.insert("USER_DATA_FILE".into(), root.join("users.json").display().to_string());
    for (k, v) in overrides {
        vars.insert(k.to_string(), v.to_string());
    }
    let settings = Settings::from_lookup(|k| vars.get(k).cloned());
    let state = AppState::new(settings).expect("state");
    TestApp { router: app(state.clone()), state }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> Reply {
        let response = self.router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body").to_vec();
        Reply { status, headers, body }
    }

    async fn get(&self, uri: &str) -> Reply {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn post_json(&self, uri: &str, body: Value) -> Reply {
        self.send(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }
}

fn scene_json() -> Value {
    json!({
        "operations": [
            { "type": "create_primitive", "id": "base",
              "primitive": { "type": "cube", "width": 10, "height": 10, "depth": 10 } },
            { "type": "create_primitive", "id": "hole",
              "primitive": { "type": "cylinder", "radius": 3, "height": 30 },
              "transform": { "position": [0, 0, -15] } },
            { "type": "boolean", "id": "result", "op": "difference", "left": "base", "right": "hole" }
        ]
    })
}

#[tokio::test]
async fn root_and_health() {
    let app = test_app(&[]);
    let root = app.get("/").await;
    assert_eq!(root.status, StatusCode::OK);
    assert_eq!(root.json()["endpoints"]["generation"], "/api/generate");

    let health = app.get("/health").await;
    assert_eq!(health.status, StatusCode::OK);
    let body = health.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], "2.0.0");
    assert_eq!(body["services"]["ai_generation"], "template_fallback");
    assert_eq!(body["environment"]["temp_dir_writable"], true);
}

#[tokio::test]
async fn generate_then_download() {
    let app = test_app(&[]);
    let reply = app.post_json("/api/generate", json!({ "prompt": "a small gear" })).await;
    assert_eq!(reply.status, StatusCode::OK);
    let body = reply.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["generation_status"], "fallback_generated");
    assert!(body["badcad_code"].as_str().unwrap().contains("gear_base"));
    assert!(body["message"].as_str().unwrap().contains("AI service temporarily unavailable"));

    let model_id = body["model_id"].as_str().unwrap();
    let download = app.get(&format!("/api/download/{}", model_id)).await;
    assert_eq!(download.status, StatusCode::OK);
    assert!(download.body.starts_with(b"solid cube"));
    assert_eq!(
        download.headers[header::CONTENT_DISPOSITION],
        format!("attachment; filename=model_{}.stl", model_id).as_str()
    );

    let preview = app.get(&format!("/api/models/{}/preview", model_id)).await;
    assert_eq!(preview.status, StatusCode::OK);
    assert_eq!(preview.json()["triangle_count"], 12);
}

#[tokio::test]
async fn empty_prompt_is_rejected() {
    let app = test_app(&[]);
    let reply = app.post_json("/api/generate", json!({ "prompt": "   " })).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    let body = reply.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["type"], "INVALID_INPUT");
    assert_eq!(body["error"]["details"]["field"], "prompt");
}

#[tokio::test]
async fn download_unknown_models() {
    let app = test_app(&[]);
    assert_eq!(app.get("/api/download/short").await.status, StatusCode::NOT_FOUND);
    let reply = app.get("/api/download/00000000-0000-0000-0000-000000000000").await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.json()["error"]["message"], "Model not found");
}

#[tokio::test]
async fn execute_validates_code() {
    let app = test_app(&[]);
    let reply = app.post_json("/api/execute", json!({ "code": "" })).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = app.post_json("/api/execute", json!({ "code": "model = cube(1, 1, 1)" })).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.json()["error"]["type"], "EXECUTION_ERROR");
    assert!(reply.json()["error"]["message"].as_str().unwrap().contains("import"));

    let reply = app
        .post_json(
            "/api/execute",
            json!({ "code": "from badcad import *\nmodel = sphere(r=3)", "user_id": "coder" }),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.json()["message"].as_str().unwrap().starts_with("Fallback model created"));

    let user = app.state.users.get_user("coder").await.unwrap();
    assert_eq!(user.email, "coder@generated.local");
    assert_eq!(user.model_count, 1);
}

#[tokio::test]
async fn failed_execution_releases_slot() {
    let app = test_app(&[]);
    let reply = app
        .post_json("/api/execute", json!({ "code": "from badcad import *\nx = 1", "user_id": "u1" }))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.state.users.get_user("u1").await.unwrap().model_count, 0);
}

#[tokio::test]
async fn generation_limit() {
    let app = test_app(&[("MAX_MODELS_PER_USER", "2")]);
    for _ in 0..2 {
        let reply = app.post_json("/api/generate", json!({ "prompt": "box", "user_id": "lim" })).await;
        assert_eq!(reply.status, StatusCode::OK);
    }
    let reply = app.post_json("/api/generate", json!({ "prompt": "box", "user_id": "lim" })).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    let body = reply.json();
    assert_eq!(body["error"]["type"], "USER_LIMIT_EXCEEDED");
    assert_eq!(body["error"]["details"]["max_count"], 2);

    // anonymous requests are not limited
    let reply = app.post_json("/api/generate", json!({ "prompt": "box" })).await;
    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn user_session_flow() {
    let app = test_app(&[]);
    let reply = app
        .post_json("/api/user/info", json!({ "user_id": "ann", "email": "ann@x.io", "name": "Ann" }))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["max_models"], 10);
    let set_cookie = reply.headers[header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("Max-Age=604800"));
    let session = set_cookie.split(';').next().unwrap().to_string();

    let increment = |user: &str, cookie: Option<&str>| {
        let mut request = Request::post("/api/user/increment-count").header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        request.body(Body::from(json!({ "user_id": user }).to_string())).unwrap()
    };

    assert_eq!(app.send(increment("ann", None)).await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        app.send(increment("ann", Some("session_id=bogus"))).await.status,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(app.send(increment("bob", Some(&session))).await.status, StatusCode::FORBIDDEN);

    let reply = app.send(increment("ann", Some(&session))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["model_count"], 1);

    let missing = app.post_json("/api/user/info", json!({ "user_id": "x", "email": "", "name": "X" })).await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_endpoints_open_without_auth() {
    let app = test_app(&[]);
    app.post_json("/api/generate", json!({ "prompt": "a ring", "user_id": "r1" })).await;

    let summary = app.get("/api/admin/collected-emails").await;
    assert_eq!(summary.status, StatusCode::OK);
    let body = summary.json();
    assert_eq!(body["total_users"], 1);
    assert_eq!(body["total_models_generated"], 1);
    assert_eq!(body["users"][0]["recent_prompts"][0]["type"], "generate");

    let reset = app
        .send(Request::post("/api/admin/user/r1/reset-count").body(Body::empty()).unwrap())
        .await;
    assert_eq!(reset.status, StatusCode::OK);
    assert_eq!(app.state.users.get_user("r1").await.unwrap().model_count, 0);

    let delete = |id: &str| {
        Request::builder()
            .method(Method::DELETE)
            .uri(format!("/api/admin/user/{}", id))
            .body(Body::empty())
            .unwrap()
    };
    assert_eq!(app.send(delete("r1")).await.status, StatusCode::OK);
    assert_eq!(app.send(delete("r1")).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_requires_bearer_when_enabled() {
    let app = test_app(&[("ENABLE_AUTH", "true"), ("ADMIN_API_KEY", "s3cret")]);
    assert_eq!(app.get("/api/admin/collected-emails").await.status, StatusCode::UNAUTHORIZED);

    let wrong = Request::get("/api/admin/collected-emails")
        .header(header::AUTHORIZATION, "Bearer nope")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.send(wrong).await.status, StatusCode::UNAUTHORIZED);

    let right = Request::get("/api/admin/collected-emails")
        .header(header::AUTHORIZATION, "Bearer s3cret")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.send(right).await.status, StatusCode::OK);
}

#[tokio::test]
async fn script_creates_downloadable_model() {
    let app = test_app(&[]);
    let reply = app
        .post_json(
            "/api/cad/script",
            json!({ "script": "base = cube(20, 20, 5); hole = cylinder(4, 10); model = difference(base, hole)" }),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    let body = reply.json();
    assert_eq!(body["scene"]["operations"].as_array().unwrap().len(), 3);
    assert_eq!(body["scene"]["result"], "solid#3");
    assert!(body["preview"]["triangle_count"].as_u64().unwrap() > 12);
    assert!(body["preview"]["camera"]["distance"].as_f64().unwrap() > 0.0);

    let model_id = body["model_id"].as_str().unwrap();
    let download = app.get(&format!("/api/download/{}", model_id)).await;
    assert_eq!(download.status, StatusCode::OK);
    let mesh = shared::stl::decode(&download.body).unwrap();
    assert_eq!(mesh.triangle_count() as u64, body["preview"]["triangle_count"].as_u64().unwrap());
}

#[tokio::test]
async fn script_errors_are_bad_requests() {
    let app = test_app(&[]);
    let reply = app.post_json("/api/cad/script", json!({ "script": "model = sphere(", "user_id": "s" })).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.json()["error"]["message"].as_str().unwrap().starts_with("Script failed"));
    assert_eq!(app.state.users.get_user("s").await.unwrap().model_count, 0);

    let nested = format!("model = {}1{}", "(".repeat(30_000), ")".repeat(30_000));
    let reply = app.post_json("/api/cad/script", json!({ "script": nested, "user_id": "s" })).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.json()["error"]["message"].as_str().unwrap().contains("nests too deeply"));
    assert_eq!(app.state.users.get_user("s").await.unwrap().model_count, 0);

    let reply = app.post_json("/api/cad/script", json!({ "script": "a = 1" })).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.json()["error"]["message"].as_str().unwrap().contains("Available variables: a"));
}

#[tokio::test]
async fn build_and_inspect_scene() {
    let app = test_app(&[]);

    let glb = app.post_json("/api/cad/build", scene_json()).await;
    assert_eq!(glb.status, StatusCode::OK);
    assert_eq!(glb.headers[header::CONTENT_TYPE], "model/gltf-binary");
    assert_eq!(&glb.body[..4], b"glTF");

    let stl = app.post_json("/api/cad/build?format=stl", scene_json()).await;
    assert_eq!(stl.status, StatusCode::OK);
    assert_eq!(stl.headers[header::CONTENT_TYPE], "model/stl");
    assert!(shared::stl::decode(&stl.body).unwrap().triangle_count() > 12);

    let bad = app.post_json("/api/cad/build?format=obj", scene_json()).await;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);

    let info = app.post_json("/api/cad/inspect", scene_json()).await;
    assert_eq!(info.status, StatusCode::OK);
    let volume = info.json()["volume"].as_f64().unwrap();
    assert!(volume > 700.0 && volume < 1000.0, "{}", volume);
}

#[tokio::test]
async fn build_reports_unknown_objects() {
    let app = test_app(&[]);
    let scene = json!({ "operations": [
        { "type": "boolean", "id": "u", "op": "union", "left": "a", "right": "b" }
    ]});
    let reply = app.post_json("/api/cad/build", scene).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.json()["error"]["message"], "Object 'a' not found");

    let reply = app.post_json("/api/cad/inspect", json!({ "operations": [] })).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let operations: Vec<Value> = (0..=server::cad::build::MAX_OPERATIONS)
        .map(|i| json!({ "type": "create_primitive", "id": format!("c{}", i),
                         "primitive": { "type": "sphere", "radius": 1 } }))
        .collect();
    for uri in ["/api/cad/build", "/api/cad/inspect"] {
        let reply = app.post_json(uri, json!({ "operations": operations })).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert!(reply.json()["error"]["message"].as_str().unwrap().contains("too many operations"));
    }
}
