use action_dispatch::core::cache_key::build_cache_key;
use action_dispatch::domain::model::FunctionOutput;
use action_dispatch::domain::ports::{FunctionInvoker, RequestSigner, ResponseCache};
use action_dispatch::{
    ActionRegistry, ActionRequest, DispatchConfig, DispatchError, Dispatcher, Identity,
    IdentitySource, MemoryCache, NoCache,
};
use async_trait::async_trait;
use httpmock::prelude::*;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// 記錄呼叫內容、回傳固定結果的 function invoker
#[derive(Clone, Default)]
struct RecordingInvoker {
    calls: Arc<Mutex<Vec<(String, Value, Option<String>)>>>,
    output: FunctionOutput,
}

impl RecordingInvoker {
    fn returning(payload: Value) -> Self {
        Self {
            calls: Arc::default(),
            output: FunctionOutput {
                status_code: 200,
                function_error: None,
                payload: serde_json::to_vec(&payload).unwrap(),
            },
        }
    }

    fn calls(&self) -> Vec<(String, Value, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl FunctionInvoker for RecordingInvoker {
    async fn invoke(
        &self,
        function_name: &str,
        payload: &[u8],
        identity: Option<&Identity>,
    ) -> action_dispatch::Result<FunctionOutput> {
        self.calls.lock().unwrap().push((
            function_name.to_string(),
            serde_json::from_slice(payload).unwrap(),
            identity.map(|identity| identity.id.clone()),
        ));
        Ok(self.output.clone())
    }
}

/// 讀寫都失敗的快取
struct BrokenCache;

impl ResponseCache for BrokenCache {
    async fn get(&self, _key: &str) -> action_dispatch::Result<Option<String>> {
        Err(DispatchError::CacheError {
            message: "connection refused".to_string(),
        })
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> action_dispatch::Result<()> {
        Err(DispatchError::CacheError {
            message: "connection refused".to_string(),
        })
    }
}

/// 加上固定標頭的簽章器
struct StaticSigner;

#[async_trait]
impl RequestSigner for StaticSigner {
    async fn sign(&self, request: &mut reqwest::Request) -> action_dispatch::Result<()> {
        request
            .headers_mut()
            .insert("authorization", "TEST-SIGNATURE".parse().unwrap());
        Ok(())
    }
}

fn registry(server: &MockServer) -> ActionRegistry {
    let toml = format!(
        r#"
[defaults]
gateway_base_url = "{base}/prod"
max_retries = 2
retry_delay_ms = 1

[[actions]]
name = "get_item"
url = "{base}/items/{{id}}"
cache_ttl_seconds = 60

[[actions]]
name = "create_order"
url = "{base}/orders"
method = "POST"

[[actions]]
name = "uncached"
url = "{base}/uncached"

[[actions]]
name = "profile"
url = "{base}/profile"
cache_ttl_seconds = 60
vary_by_identity = true

[[actions]]
name = "flaky"
url = "{base}/flaky"
cache_ttl_seconds = 60

[[actions]]
name = "list_users"
path = "/users"

[[actions]]
name = "place_order"
function_name = "orders-place"
"#,
        base = server.base_url()
    );
    ActionRegistry::from_toml_str(&toml).unwrap()
}

fn dispatcher<C: ResponseCache>(
    server: &MockServer,
    invoker: RecordingInvoker,
    cache: C,
) -> Dispatcher<RecordingInvoker, C> {
    Dispatcher::new(registry(server), DispatchConfig::default(), invoker, cache)
}

/// 以自訂登錄表建立 dispatcher，用於需要特定重試 / 逾時設定的情境
fn dispatcher_from<C: ResponseCache>(toml: &str, cache: C) -> Dispatcher<RecordingInvoker, C> {
    Dispatcher::new(
        ActionRegistry::from_toml_str(toml).unwrap(),
        DispatchConfig::default(),
        RecordingInvoker::default(),
        cache,
    )
}

async fn wait_for_first_hit(mock: &httpmock::Mock<'_>) {
    while mock.hits_async().await == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// 第一次回傳 `status`，退避期間換成成功回應；成功結果應被快取
async fn assert_recovers_after(status: u16) {
    let server = MockServer::start_async().await;
    let toml = format!(
        r#"
[defaults]
max_retries = 2
retry_delay_ms = 300

[[actions]]
name = "recovering"
url = "{}/recovering"
cache_ttl_seconds = 60
"#,
        server.base_url()
    );
    let cache = MemoryCache::new();
    let dispatcher = dispatcher_from(&toml, cache.clone());

    let mut failing = server
        .mock_async(|when, then| {
            when.method(GET).path("/recovering");
            then.status(status).body("try again");
        })
        .await;

    let (result, healthy) = tokio::join!(
        dispatcher.dispatch(ActionRequest::new("recovering", json!({}))),
        async {
            wait_for_first_hit(&failing).await;
            failing.delete_async().await;
            server
                .mock_async(|when, then| {
                    when.method(GET).path("/recovering");
                    then.status(200).json_body(json!({"ready": true}));
                })
                .await
        }
    );

    let response = result.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, json!({"ready": true}));
    assert!(!response.from_cache);
    healthy.assert_hits_async(1).await;
    assert_eq!(cache.len().await, 1);

    let cached = dispatcher
        .dispatch(ActionRequest::new("recovering", json!({})))
        .await
        .unwrap();
    assert!(cached.from_cache);
    healthy.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_external_get_renders_path_and_query() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/items/42")
                .query_param("expand", "true");
            then.status(200).json_body(json!({"id": 42, "name": "widget"}));
        })
        .await;

    let dispatcher = dispatcher(&server, RecordingInvoker::default(), NoCache);
    let response = dispatcher
        .dispatch(ActionRequest::new("get_item", json!({"id": 42, "expand": true})))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body["name"], "widget");
    assert!(!response.from_cache);
}

#[tokio::test]
async fn test_external_post_sends_json_body() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/orders")
                .json_body(json!({"sku": "A-1", "qty": 3}));
            then.status(201).json_body(json!({"orderId": "o-1"}));
        })
        .await;

    let dispatcher = dispatcher(&server, RecordingInvoker::default(), NoCache);
    let response = dispatcher
        .dispatch(ActionRequest::new("create_order", json!({"sku": "A-1", "qty": 3})))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(response.status, 201);
    assert_eq!(response.body["orderId"], "o-1");
}

#[tokio::test]
async fn test_cache_hit_skips_second_request() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/items/7");
            then.status(200).json_body(json!({"id": 7}));
        })
        .await;

    let cache = MemoryCache::new();
    let dispatcher = dispatcher(&server, RecordingInvoker::default(), cache.clone());

    let first = dispatcher
        .dispatch(ActionRequest::new("get_item", json!({"id": 7})))
        .await
        .unwrap();
    let second = dispatcher
        .dispatch(ActionRequest::new("get_item", json!({"id": 7})))
        .await
        .unwrap();

    mock.assert_hits_async(1).await;
    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(second.body, json!({"id": 7}));
    assert_eq!(cache.len().await, 1);
}

#[tokio::test]
async fn test_zero_ttl_never_touches_cache() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/uncached");
            then.status(200).json_body(json!({"ok": true}));
        })
        .await;

    let cache = MemoryCache::new();
    let dispatcher = dispatcher(&server, RecordingInvoker::default(), cache.clone());

    for _ in 0..2 {
        dispatcher
            .dispatch(ActionRequest::new("uncached", json!({})))
            .await
            .unwrap();
    }

    mock.assert_hits_async(2).await;
    assert!(cache.is_empty().await);
}

#[tokio::test]
async fn test_bypass_cache_refreshes_entry() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/items/9");
            then.status(200).json_body(json!({"id": 9}));
        })
        .await;

    let dispatcher = dispatcher(&server, RecordingInvoker::default(), MemoryCache::new());

    dispatcher
        .dispatch(ActionRequest::new("get_item", json!({"id": 9})))
        .await
        .unwrap();
    let refreshed = dispatcher
        .dispatch(ActionRequest::new("get_item", json!({"id": 9})).bypass_cache(true))
        .await
        .unwrap();
    let cached = dispatcher
        .dispatch(ActionRequest::new("get_item", json!({"id": 9})))
        .await
        .unwrap();

    mock.assert_hits_async(2).await;
    assert!(!refreshed.from_cache);
    assert!(cached.from_cache);
}

#[tokio::test]
async fn test_identity_varies_cache_key() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/profile");
            then.status(200).json_body(json!({"plan": "pro"}));
        })
        .await;

    let dispatcher = dispatcher(&server, RecordingInvoker::default(), MemoryCache::new());
    let alice = Identity::new("alice", IdentitySource::ClientContext);
    let bob = Identity::new("bob", IdentitySource::ClientContext);

    for identity in [&alice, &bob, &alice] {
        dispatcher
            .dispatch(ActionRequest::new("profile", json!({})).with_identity(Some(identity.clone())))
            .await
            .unwrap();
    }

    mock.assert_hits_async(2).await;
}

#[tokio::test]
async fn test_server_errors_are_retried_and_not_cached() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/flaky");
            then.status(503).body("unavailable");
        })
        .await;

    let cache = MemoryCache::new();
    let dispatcher = dispatcher(&server, RecordingInvoker::default(), cache.clone());

    let err = dispatcher
        .dispatch(ActionRequest::new("flaky", json!({})))
        .await
        .unwrap_err();

    // max_retries = 2，總共三次嘗試
    mock.assert_hits_async(3).await;
    assert!(matches!(err, DispatchError::HttpStatusError { status: 503, .. }));
    assert!(cache.is_empty().await);
}

#[tokio::test]
async fn test_structured_remote_error_is_surfaced() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/orders");
            then.status(409).json_body(json!({
                "error": {"type": "Conflict", "message": "order already placed", "statusCode": 409}
            }));
        })
        .await;

    let dispatcher = dispatcher(&server, RecordingInvoker::default(), NoCache);
    let err = dispatcher
        .dispatch(ActionRequest::new("create_order", json!({"sku": "A-1"})))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 409);
    assert_eq!(err.kind(), "Conflict");
    assert_eq!(err.user_friendly_message(), "order already placed");
}

#[tokio::test]
async fn test_cache_failures_do_not_fail_dispatch() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/items/3");
            then.status(200).json_body(json!({"id": 3}));
        })
        .await;

    let dispatcher = dispatcher(&server, RecordingInvoker::default(), BrokenCache);
    let response = dispatcher
        .dispatch(ActionRequest::new("get_item", json!({"id": 3})))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(response.body, json!({"id": 3}));
}

#[tokio::test]
async fn test_gateway_requests_are_signed() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/prod/users")
                .header("authorization", "TEST-SIGNATURE");
            then.status(200).json_body(json!([{"id": "u1"}]));
        })
        .await;

    let dispatcher = dispatcher(&server, RecordingInvoker::default(), NoCache)
        .with_signer(Arc::new(StaticSigner));
    let response = dispatcher
        .dispatch(ActionRequest::new("list_users", json!({})))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(response.body, json!([{"id": "u1"}]));
}

#[tokio::test]
async fn test_gateway_without_signer_is_a_configuration_error() {
    let server = MockServer::start_async().await;
    let dispatcher = dispatcher(&server, RecordingInvoker::default(), NoCache);

    let err = dispatcher
        .dispatch(ActionRequest::new("list_users", json!({})))
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::ConfigError { .. }));
}

#[tokio::test]
async fn test_function_transport_forwards_payload_and_identity() {
    let server = MockServer::start_async().await;
    let invoker = RecordingInvoker::returning(json!({"statusCode": 200, "body": "{\"orderId\":\"o-9\"}"}));
    let dispatcher = dispatcher(&server, invoker.clone(), NoCache);

    let identity = Identity::new("us-east-1:caller", IdentitySource::CognitoContext);
    let response = dispatcher
        .dispatch(
            ActionRequest::new("place_order", json!({"sku": "B-2"})).with_identity(Some(identity)),
        )
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body, json!({"orderId": "o-9"}));

    let calls = invoker.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "orders-place");
    assert_eq!(calls[0].1, json!({"sku": "B-2"}));
    assert_eq!(calls[0].2.as_deref(), Some("us-east-1:caller"));
}

#[tokio::test]
async fn test_unknown_action() {
    let server = MockServer::start_async().await;
    let dispatcher = dispatcher(&server, RecordingInvoker::default(), NoCache);

    let err = dispatcher
        .dispatch(ActionRequest::new("does_not_exist", json!({})))
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::UnknownAction { .. }));
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_throttled_request_is_retried_then_cached() {
    assert_recovers_after(429).await;
}

#[tokio::test]
async fn test_server_error_is_retried_then_cached() {
    assert_recovers_after(502).await;
}

#[tokio::test]
async fn test_throttling_exhausts_retries() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/flaky");
            then.status(429).body("slow down");
        })
        .await;

    let dispatcher = dispatcher(&server, RecordingInvoker::default(), MemoryCache::new());
    let err = dispatcher
        .dispatch(ActionRequest::new("flaky", json!({})))
        .await
        .unwrap_err();

    mock.assert_hits_async(3).await;
    assert_eq!(err.status_code(), 429);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_timeouts_are_retried() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/slow");
            then.status(200)
                .delay(Duration::from_millis(1500))
                .json_body(json!({"late": true}));
        })
        .await;

    let toml = format!(
        r#"
[defaults]
max_retries = 1
retry_delay_ms = 10

[[actions]]
name = "slow"
url = "{}/slow"
timeout_seconds = 1
"#,
        server.base_url()
    );
    let dispatcher = dispatcher_from(&toml, NoCache);

    let err = dispatcher
        .dispatch(ActionRequest::new("slow", json!({})))
        .await
        .unwrap_err();

    mock.assert_hits_async(2).await;
    match &err {
        DispatchError::ApiError(e) => assert!(e.is_timeout()),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.status_code(), 504);
}

#[tokio::test]
async fn test_connect_errors_are_retried_with_backoff() {
    // 取得一個目前沒有人監聽的埠
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let toml = format!(
        r#"
[defaults]
max_retries = 2
retry_delay_ms = 100

[[actions]]
name = "offline"
url = "http://127.0.0.1:{}/offline"
"#,
        port
    );
    let dispatcher = dispatcher_from(&toml, NoCache);

    let started = Instant::now();
    let err = dispatcher
        .dispatch(ActionRequest::new("offline", json!({})))
        .await
        .unwrap_err();

    // 兩次退避：100ms + 200ms
    assert!(started.elapsed() >= Duration::from_millis(300));
    match &err {
        DispatchError::ApiError(e) => assert!(e.is_connect()),
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_unreadable_cache_entries_are_misses() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/items/11");
            then.status(200).json_body(json!({"id": 11}));
        })
        .await;

    let params = json!({"id": 11});
    let key = build_cache_key("action:", "get_item", &params, None);
    let cache = MemoryCache::new();
    let dispatcher = dispatcher(&server, RecordingInvoker::default(), cache.clone());

    let stale_entries = [
        "not json at all".to_string(),
        json!({"v": 2, "status": 200, "headers": {}, "body": {"id": "old"}, "cachedAt": "2024-01-01T00:00:00Z"})
            .to_string(),
    ];

    for (i, entry) in stale_entries.iter().enumerate() {
        cache.set(&key, entry, Duration::from_secs(60)).await.unwrap();

        let response = dispatcher
            .dispatch(ActionRequest::new("get_item", params.clone()))
            .await
            .unwrap();
        assert!(!response.from_cache);
        assert_eq!(response.body, json!({"id": 11}));
        mock.assert_hits_async(i + 1).await;

        // 重新寫入的項目可以正常讀取
        let cached = dispatcher
            .dispatch(ActionRequest::new("get_item", params.clone()))
            .await
            .unwrap();
        assert!(cached.from_cache);
        mock.assert_hits_async(i + 1).await;
    }
}

#[tokio::test]
async fn test_oversized_ttl_does_not_panic() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/forever");
            then.status(200).json_body(json!({"static": true}));
        })
        .await;

    let toml = format!(
        r#"
[[actions]]
name = "forever"
url = "{}/forever"
cache_ttl_seconds = 9223372036854775807
"#,
        server.base_url()
    );
    let dispatcher = dispatcher_from(&toml, MemoryCache::new());

    for _ in 0..2 {
        dispatcher
            .dispatch(ActionRequest::new("forever", json!({})))
            .await
            .unwrap();
    }

    mock.assert_hits_async(1).await;
}
