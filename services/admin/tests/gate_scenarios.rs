//! End-to-end gate behavior over the full router and the in-memory store

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use admin_gate::{
    AppState,
    audit::AuditWorkers,
    config::AppConfig,
    models::{
        Admin, Api, NewAdmin, NewApi, NewRole, OperationLog, OperationLogQuery, Policy, Role,
        Status,
    },
    password::hash_password,
    repositories::{
        AdminRepository, ApiRepository, MemoryStore, OperationLogRepository, PolicyAdapter,
        Repositories, RoleRepository,
    },
    response::Envelope,
    routes::{create_router, create_router_with},
    seed,
};
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
    routing::get,
};
use async_trait::async_trait;
use common::error::DatabaseResult;
use serde_json::{Value, json};
use tokio::sync::Notify;
use tower::ServiceExt;

struct Gate {
    app: Router,
    state: AppState,
    workers: AuditWorkers,
    store: Arc<MemoryStore>,
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::defaults().unwrap();
    config.system.url_path_prefix = String::new();
    config.jwt.key = "integration-secret".to_string();
    config.rate_limit.capacity = 10_000;
    config
}

async fn gate_with(store: Arc<MemoryStore>, config: AppConfig, extra: Router<AppState>) -> Gate {
    let repos = Repositories::memory(store.clone());
    gate_from(repos, store, config, extra).await
}

async fn gate_from(
    repos: Repositories,
    store: Arc<MemoryStore>,
    config: AppConfig,
    extra: Router<AppState>,
) -> Gate {
    let (state, workers) = AppState::build(config, repos, None).await.unwrap();
    let app = create_router_with(state.clone(), extra);
    Gate {
        app,
        state,
        workers,
        store,
    }
}

async fn gate(store: Arc<MemoryStore>) -> Gate {
    gate_with(store, test_config(), Router::new()).await
}

async fn role(store: &MemoryStore, keyword: &str, sort: i32, status: Status) -> Role {
    RoleRepository::create(
        store,
        &NewRole {
            name: keyword.to_string(),
            keyword: keyword.to_string(),
            desc: None,
            status,
            sort,
            creator: "test".to_string(),
        },
    )
    .await
    .unwrap()
}

async fn admin(store: &MemoryStore, username: &str, password: &str, roles: &[&Role]) -> Admin {
    AdminRepository::create(
        store,
        &NewAdmin {
            username: username.to_string(),
            password: hash_password(password).unwrap(),
            mobile: String::new(),
            avatar: String::new(),
            nickname: None,
            introduction: None,
            status: Status::Active,
            creator: "test".to_string(),
            role_ids: roles.iter().map(|role| role.id).collect(),
        },
    )
    .await
    .unwrap()
}

async fn grant(store: &MemoryStore, subject: &str, object: &str, action: &str) {
    PolicyAdapter::add(store, &[Policy::new(subject, object, action)])
        .await
        .unwrap();
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

async fn login(app: &Router, username: &str, password: &str) -> String {
    let (status, _, body) = send(
        app,
        request(
            Method::POST,
            "/base/login",
            None,
            Some(json!({"username": username, "password": password})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    body["data"]["token"].as_str().unwrap().to_string()
}

/// Stop the pipeline and return everything it persisted
async fn drained_logs(gate: Gate) -> Vec<OperationLog> {
    gate.workers.drain(Duration::from_secs(5)).await;
    let (logs, _) = OperationLogRepository::list(gate.store.as_ref(), &OperationLogQuery::default())
        .await
        .unwrap();
    logs
}

#[tokio::test]
async fn login_then_authorized_call_is_audited() {
    let store = Arc::new(MemoryStore::new());
    seed::seed_if_empty(&Repositories::memory(store.clone()))
        .await
        .unwrap();
    let gate = gate(store).await;

    let token = login(&gate.app, "admin", "123456").await;
    let (status, _, body) = send(&gate.app, request(Method::GET, "/admin/list", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 200);
    assert_eq!(body["data"]["total"], 1);
    assert!(body["data"]["list"][0].get("password").is_none());

    let logs = drained_logs(gate).await;
    let listed: Vec<&OperationLog> = logs
        .iter()
        .filter(|log| log.username == "admin" && log.path == "/admin/list")
        .collect();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, 200);
    assert_eq!(listed[0].method, "GET");
    assert_eq!(listed[0].desc, "获取用户列表");
    assert!(listed[0].time_cost >= 0);
    assert!(
        logs.iter()
            .any(|log| log.path == "/base/login" && log.username == "未登录")
    );
}

#[tokio::test]
async fn login_with_only_disabled_role_is_refused() {
    let store = Arc::new(MemoryStore::new());
    let disabled = role(&store, "admin", 1, Status::Disabled).await;
    admin(&store, "admin", "123456", &[&disabled]).await;
    let gate = gate(store).await;

    let (status, _, body) = send(
        &gate.app,
        request(
            Method::POST,
            "/base/login",
            None,
            Some(json!({"username": "admin", "password": "123456"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 1003);
    assert_eq!(body["message"], "用户名或密码错误");

    let logs = drained_logs(gate).await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, 401);
}

#[tokio::test]
async fn wrong_password_and_unknown_user_look_the_same() {
    let store = Arc::new(MemoryStore::new());
    let active = role(&store, "admin", 1, Status::Active).await;
    admin(&store, "admin", "123456", &[&active]).await;
    let gate = gate(store).await;

    let mut bodies = Vec::new();
    for (username, password) in [("admin", "wrong-pass"), ("ghost", "123456")] {
        let (status, _, body) = send(
            &gate.app,
            request(
                Method::POST,
                "/base/login",
                None,
                Some(json!({"username": username, "password": password})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        bodies.push(body);
    }
    assert_eq!(bodies[0], bodies[1]);
}

#[tokio::test]
async fn create_admin_with_higher_rank_role_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let op_role = role(&store, "op", 3, Status::Active).await;
    let senior = role(&store, "senior", 2, Status::Active).await;
    admin(&store, "operator", "123456", &[&op_role]).await;
    grant(&store, "op", "/admin/create", "POST").await;
    let gate = gate(store.clone()).await;

    let token = login(&gate.app, "operator", "123456").await;
    let mut req = request(
        Method::POST,
        "/admin/create",
        Some(&token),
        Some(json!({"username": "newbie", "password": "secret1", "roleIds": [senior.id]})),
    );
    req.headers_mut()
        .insert(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9".parse().unwrap());
    let (status, _, body) = send(&gate.app, req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
    assert_eq!(body["message"], "cannot create equal-or-higher-rank admin");
    assert_eq!(AdminRepository::count(store.as_ref()).await.unwrap(), 1);
}

#[tokio::test]
async fn create_admin_with_lower_rank_role_succeeds() {
    let store = Arc::new(MemoryStore::new());
    let op_role = role(&store, "op", 3, Status::Active).await;
    let junior = role(&store, "junior", 4, Status::Active).await;
    admin(&store, "operator", "123456", &[&op_role]).await;
    grant(&store, "op", "/admin/create", "POST").await;
    let gate = gate(store.clone()).await;

    let token = login(&gate.app, "operator", "123456").await;
    let (status, _, body) = send(
        &gate.app,
        request(
            Method::POST,
            "/admin/create",
            Some(&token),
            Some(json!({"username": "newbie", "roleIds": [junior.id]})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["creator"], "operator");

    login(&gate.app, "newbie", "123456").await;
}

#[tokio::test]
async fn policy_grants_exact_route_and_method() {
    let store = Arc::new(MemoryStore::new());
    let editor = role(&store, "editor", 5, Status::Active).await;
    admin(&store, "writer", "123456", &[&editor]).await;
    grant(&store, "editor", "/post", "GET").await;

    let extra = Router::new().route(
        "/post",
        get(|| async { Envelope::empty() }).delete(|| async { Envelope::empty() }),
    );
    let gate = gate_with(store, test_config(), extra).await;
    let token = login(&gate.app, "writer", "123456").await;

    let (status, _, body) = send(&gate.app, request(Method::DELETE, "/post", Some(&token), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], 1006);

    let (status, _, _) = send(&gate.app, request(Method::GET, "/post", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn refresh_accepts_live_token_and_rejects_garbage() {
    let store = Arc::new(MemoryStore::new());
    seed::seed_if_empty(&Repositories::memory(store.clone()))
        .await
        .unwrap();
    let gate = gate(store).await;
    let token = login(&gate.app, "admin", "123456").await;

    let (status, _, body) = send(
        &gate.app,
        request(Method::POST, "/base/refreshToken", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["token"].as_str().is_some_and(|t| !t.is_empty()));

    let (status, headers, body) = send(
        &gate.app,
        request(Method::POST, "/base/refreshToken", Some("not-a-token"), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 1004);
    assert_eq!(
        headers.get(header::WWW_AUTHENTICATE).unwrap(),
        "JWT realm=\"admin-gate jwt\""
    );
}

#[tokio::test]
async fn role_keyword_rename_keeps_access() {
    let store = Arc::new(MemoryStore::new());
    seed::seed_if_empty(&Repositories::memory(store.clone()))
        .await
        .unwrap();
    let ops = role(&store, "ops", 2, Status::Active).await;
    admin(&store, "opsuser", "123456", &[&ops]).await;
    grant(&store, "ops", "/project", "GET").await;

    let extra = Router::new().route("/project", get(|| async { Envelope::empty() }));
    let gate = gate_with(store.clone(), test_config(), extra).await;
    let root = login(&gate.app, "admin", "123456").await;
    let user = login(&gate.app, "opsuser", "123456").await;

    let (status, _, _) = send(&gate.app, request(Method::GET, "/project", Some(&user), None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = send(
        &gate.app,
        request(
            Method::PATCH,
            &format!("/role/update/{}", ops.id),
            Some(&root),
            Some(json!({"name": "ops", "keyword": "operations", "sort": 2, "status": 1})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, _, _) = send(&gate.app, request(Method::GET, "/project", Some(&user), None)).await;
    assert_eq!(status, StatusCode::OK);

    let persisted = PolicyAdapter::load(store.as_ref()).await.unwrap();
    assert_eq!(persisted, vec![Policy::new("operations", "/project", "GET")]);
    assert!(gate.state.policies().filtered_by_subject("ops").await.is_empty());
}

#[tokio::test]
async fn missing_token_gets_challenge_and_localized_message() {
    let gate = gate(Arc::new(MemoryStore::new())).await;

    let (status, headers, body) = send(&gate.app, request(Method::GET, "/admin/list?lang=en", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 1004);
    assert_eq!(body["message"], "authentication failed: token missing");
    assert!(headers.contains_key(header::WWW_AUTHENTICATE));

    let logs = drained_logs(gate).await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].username, "not logged in");
    assert_eq!(logs[0].status, 401);
}

#[tokio::test]
async fn disabled_admin_with_valid_token_is_forbidden() {
    let store = Arc::new(MemoryStore::new());
    seed::seed_if_empty(&Repositories::memory(store.clone()))
        .await
        .unwrap();
    let gate = gate(store.clone()).await;
    let token = login(&gate.app, "admin", "123456").await;

    let stored = AdminRepository::find_by_username(store.as_ref(), "admin")
        .await
        .unwrap()
        .unwrap();
    let mut update = admin_gate::models::AdminUpdate {
        id: stored.id,
        username: stored.username.clone(),
        password: None,
        mobile: stored.mobile.clone(),
        avatar: stored.avatar.clone(),
        nickname: stored.nickname.clone(),
        introduction: stored.introduction.clone(),
        status: Status::Disabled,
        role_ids: stored.role_ids(),
    };
    gate.state
        .admins()
        .update(&stored.username, &update)
        .await
        .unwrap();

    let (status, _, body) = send(&gate.app, request(Method::GET, "/admin/info", Some(&token), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], 1002);

    update.status = Status::Active;
    gate.state
        .admins()
        .update(&stored.username, &update)
        .await
        .unwrap();
    let (status, _, body) = send(&gate.app, request(Method::GET, "/admin/info", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "admin");
}

#[tokio::test]
async fn operator_cannot_disable_self() {
    let store = Arc::new(MemoryStore::new());
    seed::seed_if_empty(&Repositories::memory(store.clone()))
        .await
        .unwrap();
    let gate = gate(store.clone()).await;
    let token = login(&gate.app, "admin", "123456").await;
    let me = AdminRepository::find_by_username(store.as_ref(), "admin")
        .await
        .unwrap()
        .unwrap();

    let (status, _, body) = send(
        &gate.app,
        request(
            Method::PATCH,
            &format!("/admin/update/{}", me.id),
            Some(&token),
            Some(json!({"username": "admin", "status": 2, "roleIds": me.role_ids()})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
}

#[tokio::test]
async fn change_password_takes_effect_immediately() {
    let store = Arc::new(MemoryStore::new());
    seed::seed_if_empty(&Repositories::memory(store.clone()))
        .await
        .unwrap();
    let gate = gate(store).await;
    let token = login(&gate.app, "admin", "123456").await;

    let (status, _, body) = send(
        &gate.app,
        request(
            Method::PUT,
            "/admin/changePwd",
            Some(&token),
            Some(json!({"oldPassword": "nope-nope", "newPassword": "abcdef"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], 422);

    let (status, _, _) = send(
        &gate.app,
        request(
            Method::PUT,
            "/admin/changePwd",
            Some(&token),
            Some(json!({"oldPassword": "123456", "newPassword": "abcdef"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    login(&gate.app, "admin", "abcdef").await;
}

#[tokio::test]
async fn api_rename_and_delete_follow_policies() {
    let store = Arc::new(MemoryStore::new());
    seed::seed_if_empty(&Repositories::memory(store.clone()))
        .await
        .unwrap();
    let gate = gate(store.clone()).await;
    let token = login(&gate.app, "admin", "123456").await;

    let (_, _, created) = send(
        &gate.app,
        request(
            Method::POST,
            "/api/create",
            Some(&token),
            Some(json!({"method": "get", "path": "/report", "category": "report"})),
        ),
    )
    .await;
    assert_eq!(created["data"]["method"], "GET");
    let api_id = created["data"]["id"].as_i64().unwrap();
    grant(&store, "auditor", "/report", "GET").await;
    gate.state.policies().load().await.unwrap();

    let (status, _, _) = send(
        &gate.app,
        request(
            Method::PATCH,
            &format!("/api/update/{api_id}"),
            Some(&token),
            Some(json!({"method": "GET", "path": "/reports", "category": "report"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        gate.state.policies().filtered_by_subject("auditor").await,
        vec![Policy::new("auditor", "/reports", "GET")]
    );

    let (status, _, _) = send(
        &gate.app,
        request(
            Method::DELETE,
            "/api/delete/batch",
            Some(&token),
            Some(json!({"ids": [api_id]})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(gate.state.policies().filtered_by_subject("auditor").await.is_empty());
}

async fn create_menu(app: &Router, token: &str, name: &str, parent: i64) -> i64 {
    let (status, _, body) = send(
        app,
        request(
            Method::POST,
            "/menu/create",
            Some(token),
            Some(json!({
                "name": name,
                "title": name,
                "path": format!("/{name}"),
                "component": "Layout",
                "parentId": parent,
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["data"]["id"].as_i64().unwrap()
}

#[tokio::test]
async fn menu_access_follows_roles() {
    let store = Arc::new(MemoryStore::new());
    seed::seed_if_empty(&Repositories::memory(store.clone()))
        .await
        .unwrap();
    let viewer = role(&store, "viewer", 5, Status::Active).await;
    let plain = admin(&store, "viewer", "123456", &[&viewer]).await;
    let gate = gate(store).await;
    let token = login(&gate.app, "admin", "123456").await;

    let system = create_menu(&gate.app, &token, "system", 0).await;
    let users = create_menu(&gate.app, &token, "users", system).await;

    let (status, _, _) = send(
        &gate.app,
        request(
            Method::PATCH,
            &format!("/role/menus/update/{}", viewer.id),
            Some(&token),
            Some(json!({"menuIds": [users]})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, _, body) = send(
        &gate.app,
        request(
            Method::GET,
            &format!("/menu/access/list/{}", plain.id),
            Some(&token),
            None,
        ),
    )
    .await;
    let visible: Vec<i64> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|menu| menu["id"].as_i64().unwrap())
        .collect();
    assert_eq!(visible, vec![users]);

    let (_, _, body) = send(&gate.app, request(Method::GET, "/menu/tree", Some(&token), None)).await;
    assert_eq!(body["data"][0]["id"], system);
    assert_eq!(body["data"][0]["children"][0]["id"], users);
}

#[tokio::test]
async fn burst_past_capacity_is_rate_limited() {
    let mut config = test_config();
    config.rate_limit.capacity = 2;
    config.rate_limit.fill_interval = 60_000;
    let gate = gate_with(Arc::new(MemoryStore::new()), config, Router::new()).await;

    let mut statuses = Vec::new();
    for _ in 0..3 {
        let (status, _, body) = send(&gate.app, request(Method::POST, "/base/logout", None, None)).await;
        if status == StatusCode::TOO_MANY_REQUESTS {
            assert_eq!(body["code"], 429);
        }
        statuses.push(status);
    }
    assert_eq!(
        statuses,
        vec![StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]
    );
}

#[tokio::test]
async fn health_is_public_and_unaudited() {
    let store = Arc::new(MemoryStore::new());
    let repos = Repositories::memory(store.clone());
    let mut config = test_config();
    config.system.url_path_prefix = "api".to_string();
    let (state, workers) = AppState::build(config, repos, None).await.unwrap();
    let app = create_router(state.clone());

    let (status, _, body) = send(&app, request(Method::GET, "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "memory");

    let (status, _, _) = send(&app, request(Method::POST, "/api/base/logout", None, None)).await;
    assert_eq!(status, StatusCode::OK);

    let logs = drained_logs(Gate {
        app,
        state,
        workers,
        store,
    })
    .await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].path, "/base/logout");
}

/// Policy adapter whose next `add` stalls until released
struct StallingPolicies {
    inner: Arc<MemoryStore>,
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl PolicyAdapter for StallingPolicies {
    async fn load(&self) -> DatabaseResult<Vec<Policy>> {
        PolicyAdapter::load(self.inner.as_ref()).await
    }

    async fn add(&self, policies: &[Policy]) -> DatabaseResult<()> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        PolicyAdapter::add(self.inner.as_ref(), policies).await
    }

    async fn remove(&self, policies: &[Policy]) -> DatabaseResult<()> {
        PolicyAdapter::remove(self.inner.as_ref(), policies).await
    }
}

#[tokio::test]
async fn role_holder_keeps_access_while_keyword_rename_is_in_flight() {
    let store = Arc::new(MemoryStore::new());
    seed::seed_if_empty(&Repositories::memory(store.clone()))
        .await
        .unwrap();
    let ops = role(&store, "ops", 2, Status::Active).await;
    admin(&store, "opsuser", "123456", &[&ops]).await;
    grant(&store, "ops", "/project", "GET").await;

    let policies = Arc::new(StallingPolicies {
        inner: store.clone(),
        armed: AtomicBool::new(false),
        entered: Notify::new(),
        release: Notify::new(),
    });
    let repos = Repositories {
        policies: policies.clone(),
        ..Repositories::memory(store.clone())
    };
    let extra = Router::new().route("/project", get(|| async { Envelope::empty() }));
    let gate = gate_from(repos, store.clone(), test_config(), extra).await;
    let root = login(&gate.app, "admin", "123456").await;
    let user = login(&gate.app, "opsuser", "123456").await;

    let (status, _, _) = send(&gate.app, request(Method::GET, "/project", Some(&user), None)).await;
    assert_eq!(status, StatusCode::OK);

    policies.armed.store(true, Ordering::SeqCst);
    let rename = {
        let app = gate.app.clone();
        let req = request(
            Method::PATCH,
            &format!("/role/update/{}", ops.id),
            Some(&root),
            Some(json!({"name": "ops", "keyword": "operations", "sort": 2, "status": 1})),
        );
        tokio::spawn(async move { send(&app, req).await })
    };
    policies.entered.notified().await;

    let during = {
        let app = gate.app.clone();
        let req = request(Method::GET, "/project", Some(&user), None);
        tokio::spawn(async move { send(&app, req).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    policies.release.notify_one();

    let (status, _, body) = during.await.unwrap();
    assert_eq!(status, StatusCode::OK, "{body}");
    let (status, _, body) = rename.await.unwrap();
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, _, _) = send(&gate.app, request(Method::GET, "/project", Some(&user), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        PolicyAdapter::load(store.as_ref()).await.unwrap(),
        vec![Policy::new("operations", "/project", "GET")]
    );
}

#[tokio::test]
async fn failed_keyword_rename_rolls_back_copied_policies() {
    let store = Arc::new(MemoryStore::new());
    seed::seed_if_empty(&Repositories::memory(store.clone()))
        .await
        .unwrap();
    let ops = role(&store, "ops", 2, Status::Active).await;
    role(&store, "taken", 3, Status::Active).await;
    grant(&store, "ops", "/project", "GET").await;
    let gate = gate(store.clone()).await;
    let root = login(&gate.app, "admin", "123456").await;

    let (status, _, body) = send(
        &gate.app,
        request(
            Method::PATCH,
            &format!("/role/update/{}", ops.id),
            Some(&root),
            Some(json!({"name": "ops", "keyword": "taken", "sort": 2, "status": 1})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert_eq!(body["code"], 1008);

    assert_eq!(
        PolicyAdapter::load(store.as_ref()).await.unwrap(),
        vec![Policy::new("ops", "/project", "GET")]
    );
    assert!(gate.state.policies().filtered_by_subject("taken").await.is_empty());
}

#[tokio::test]
async fn malformed_body_gets_a_localized_validation_envelope() {
    let gate = gate(Arc::new(MemoryStore::new())).await;

    for (uri, message) in [
        ("/base/login", "body 格式不正确"),
        ("/base/login?lang=en", "body is malformed"),
    ] {
        let req = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, _, body) = send(&gate.app, req).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], 422);
        assert_eq!(body["message"], message);
        assert!(body["data"].is_null());
    }

    let (status, _, body) = send(
        &gate.app,
        request(
            Method::POST,
            "/base/login",
            None,
            Some(json!({"username": 7, "password": "123456"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], 422);
}

async fn api(store: &MemoryStore, method: &str, path: &str) -> Api {
    ApiRepository::create(store, &NewApi::new(method, path, "report", ""))
        .await
        .unwrap()
}

#[tokio::test]
async fn api_grants_by_non_super_operator_are_limited_to_held_policies() {
    let store = Arc::new(MemoryStore::new());
    let lead = role(&store, "lead", 2, Status::Active).await;
    let staff = role(&store, "staff", 5, Status::Active).await;
    admin(&store, "lead", "123456", &[&lead]).await;
    let read = api(&store, "GET", "/report").await;
    let erase = api(&store, "DELETE", "/report").await;
    grant(&store, "lead", "/role/apis/update/:roleID", "PATCH").await;
    grant(&store, "lead", "/report", "GET").await;
    grant(&store, "staff", "/report", "DELETE").await;
    let gate = gate(store.clone()).await;
    let token = login(&gate.app, "lead", "123456").await;
    let uri = format!("/role/apis/update/{}?lang=en", staff.id);

    let (status, _, body) = send(
        &gate.app,
        request(
            Method::PATCH,
            &uri,
            Some(&token),
            Some(json!({"apiIds": [read.id, erase.id]})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
    assert_eq!(body["message"], "cannot grant apis you do not hold");
    assert_eq!(
        gate.state.policies().filtered_by_subject("staff").await,
        vec![Policy::new("staff", "/report", "DELETE")]
    );

    let (status, _, body) = send(
        &gate.app,
        request(Method::PATCH, &uri, Some(&token), Some(json!({"apiIds": [read.id]}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(
        gate.state.policies().filtered_by_subject("staff").await,
        vec![Policy::new("staff", "/report", "GET")]
    );
    let persisted: Vec<Policy> = PolicyAdapter::load(store.as_ref())
        .await
        .unwrap()
        .into_iter()
        .filter(|policy| policy.subject == "staff")
        .collect();
    assert_eq!(persisted, vec![Policy::new("staff", "/report", "GET")]);
}

#[tokio::test]
async fn deleting_a_role_drops_its_policies_and_cached_holders() {
    let store = Arc::new(MemoryStore::new());
    seed::seed_if_empty(&Repositories::memory(store.clone()))
        .await
        .unwrap();
    let ops = role(&store, "ops", 2, Status::Active).await;
    let lead = role(&store, "lead", 3, Status::Active).await;
    admin(&store, "opsuser", "123456", &[&ops]).await;
    admin(&store, "lead", "123456", &[&lead]).await;
    grant(&store, "ops", "/project", "GET").await;
    grant(&store, "lead", "/role/delete/batch", "DELETE").await;

    let extra = Router::new().route("/project", get(|| async { Envelope::empty() }));
    let gate = gate_with(store.clone(), test_config(), extra).await;
    let root = login(&gate.app, "admin", "123456").await;
    let user = login(&gate.app, "opsuser", "123456").await;
    let lead_token = login(&gate.app, "lead", "123456").await;

    let (status, _, _) = send(&gate.app, request(Method::GET, "/project", Some(&user), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(gate.state.cache().get("opsuser").is_some());

    let (status, _, body) = send(
        &gate.app,
        request(
            Method::DELETE,
            "/role/delete/batch",
            Some(&lead_token),
            Some(json!({"ids": [ops.id]})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
    assert_eq!(gate.state.policies().filtered_by_subject("ops").await.len(), 1);

    let (status, _, body) = send(
        &gate.app,
        request(
            Method::DELETE,
            "/role/delete/batch",
            Some(&root),
            Some(json!({"ids": [ops.id]})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(gate.state.cache().get("opsuser").is_none());
    assert!(gate.state.policies().filtered_by_subject("ops").await.is_empty());
    assert!(
        PolicyAdapter::load(store.as_ref())
            .await
            .unwrap()
            .iter()
            .all(|policy| policy.subject != "ops")
    );
    assert!(RoleRepository::find_by_id(store.as_ref(), ops.id)
        .await
        .unwrap()
        .is_none());

    let (status, _, body) = send(&gate.app, request(Method::GET, "/project", Some(&user), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], 1006);
}

#[tokio::test]
async fn admin_batch_delete_refuses_self_and_peers() {
    let store = Arc::new(MemoryStore::new());
    let lead = role(&store, "lead", 2, Status::Active).await;
    let junior = role(&store, "junior", 5, Status::Active).await;
    let me = admin(&store, "lead1", "123456", &[&lead]).await;
    let peer = admin(&store, "lead2", "123456", &[&lead]).await;
    let below = admin(&store, "junior", "123456", &[&junior]).await;
    grant(&store, "lead", "/admin/delete/batch", "DELETE").await;
    let gate = gate(store.clone()).await;
    let token = login(&gate.app, "lead1", "123456").await;

    for (ids, message) in [
        (vec![me.id], "cannot delete yourself"),
        (vec![peer.id], "cannot delete equal-or-higher-rank admin"),
        (vec![below.id, peer.id], "cannot delete equal-or-higher-rank admin"),
    ] {
        let (status, _, body) = send(
            &gate.app,
            request(
                Method::DELETE,
                "/admin/delete/batch?lang=en",
                Some(&token),
                Some(json!({ "ids": ids })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 400);
        assert_eq!(body["message"], message);
    }
    assert_eq!(AdminRepository::count(store.as_ref()).await.unwrap(), 3);

    let (status, _, body) = send(
        &gate.app,
        request(
            Method::DELETE,
            "/admin/delete/batch",
            Some(&token),
            Some(json!({"ids": [below.id]})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(AdminRepository::count(store.as_ref()).await.unwrap(), 2);

    let (status, _, _) = send(
        &gate.app,
        request(
            Method::POST,
            "/base/login",
            None,
            Some(json!({"username": "junior", "password": "123456"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
