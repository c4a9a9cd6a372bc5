//! Reseller client and provisioning against an in-process backend

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use shield_network::{
    ProvisioningError, ProvisioningService, ResellerClient, ResellerConfig, ResellerError,
};
use shield_vpn::Credentials;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

const TOKEN: &str = "test-token";

/// One request as seen by the backend
#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    path: String,
    query: Option<String>,
    authorization: Option<String>,
    accept: Option<String>,
    content_type: Option<String>,
    body: String,
}

/// Canned reply keyed by method and path
type Route = (&'static str, &'static str, u16, &'static str);

struct Backend {
    base_url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl Backend {
    async fn start(routes: Vec<Route>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let routes = Arc::new(routes);

        let recorded = requests.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let recorded = recorded.clone();
                let routes = routes.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let recorded = recorded.clone();
                        let routes = routes.clone();
                        async move { Ok::<_, Infallible>(respond(req, &routes, &recorded).await) }
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self {
            base_url: format!("http://{}", addr),
            requests,
        }
    }

    fn client(&self) -> ResellerClient {
        let config = ResellerConfig {
            base_url: self.base_url.clone(),
            ..Default::default()
        }
        .with_token(TOKEN);
        ResellerClient::new(config).unwrap()
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

async fn respond(
    req: Request<Incoming>,
    routes: &[Route],
    recorded: &Mutex<Vec<Recorded>>,
) -> Response<Full<Bytes>> {
    let mut entry = {
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Recorded {
            method: req.method().to_string(),
            path: req.uri().path().to_string(),
            query: req.uri().query().map(str::to_string),
            authorization: header("authorization"),
            accept: header("accept"),
            content_type: header("content-type"),
            body: String::new(),
        }
    };
    let body = req.into_body().collect().await.unwrap().to_bytes();
    entry.body = String::from_utf8_lossy(&body).into_owned();

    let reply = routes
        .iter()
        .find(|(method, path, _, _)| *method == entry.method && *path == entry.path)
        .map(|(_, _, status, body)| (*status, *body))
        .unwrap_or((404, "not found"));
    recorded.lock().unwrap().push(entry);

    Response::builder()
        .status(StatusCode::from_u16(reply.0).unwrap())
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from_static(reply.1.as_bytes())))
        .unwrap()
}

const VALIDATE_OK: &str = r#"{"success":true,"message":"ok","id":17,"code":"200"}"#;
const VALIDATE_REJECTED: &str = r#"{"success":false,"message":"invalid","code":"401"}"#;
const CONFIG: &str = r#"{"data":{"download_url":"https://cdn.example/nl-1.ovpn","file_body":"client\nremote 10.0.0.2 1194\n","file_name":"nl-1.ovpn"}}"#;

#[tokio::test]
async fn test_validate_sends_bearer_and_json() {
    let backend = Backend::start(vec![("POST", "/v3_2/accounts/validate", 200, VALIDATE_OK)]).await;
    let client = backend.client();

    let response = client.validate("alice", "pw").await.unwrap();
    assert!(response.success);
    assert_eq!(response.id, Some(17));

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.method, "POST");
    assert_eq!(request.authorization.as_deref(), Some("Bearer test-token"));
    assert_eq!(request.accept.as_deref(), Some("application/json"));
    assert_eq!(request.content_type.as_deref(), Some("application/json"));

    let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(body, serde_json::json!({"username": "alice", "password": "pw"}));
}

#[tokio::test]
async fn test_validate_non_2xx_carries_exact_body() {
    let backend = Backend::start(vec![(
        "POST",
        "/v3_2/accounts/validate",
        422,
        "The username field is required.\n",
    )])
    .await;

    match backend.client().validate("", "").await {
        Err(ResellerError::Server(body)) => assert_eq!(body, "The username field is required.\n"),
        other => panic!("expected server error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_login_returns_id() {
    let backend = Backend::start(vec![("POST", "/v3_2/accounts/validate", 200, VALIDATE_OK)]).await;
    assert_eq!(backend.client().login("alice", "pw").await.unwrap(), 17);
}

#[tokio::test]
async fn test_login_rejected_uses_message() {
    let backend =
        Backend::start(vec![("POST", "/v3_2/accounts/validate", 200, VALIDATE_REJECTED)]).await;

    match backend.client().login("alice", "wrong").await {
        Err(ResellerError::Server(message)) => assert_eq!(message, "invalid"),
        other => panic!("expected server error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_list_servers_keeps_backend_order() {
    let backend = Backend::start(vec![(
        "GET",
        "/v3_2/servers",
        200,
        r#"{"data":[
            {"id":9,"name":"us-1","ip":"10.0.0.9","country_code":"US","city":"Dallas","capacity":10},
            {"id":2,"name":"nl-1","ip":"10.0.0.2","country_code":"NL","city":"Amsterdam","capacity":80},
            {"id":5,"name":"de-1","ip":"10.0.0.5","country_code":"DE","city":"Frankfurt","capacity":40}
        ]}"#,
    )])
    .await;

    let servers = backend.client().list_servers().await.unwrap();
    let names: Vec<&str> = servers.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["us-1", "nl-1", "de-1"]);

    let requests = backend.requests();
    let request = &requests[0];
    assert_eq!(request.method, "GET");
    assert_eq!(request.content_type, None);
    assert!(request.body.is_empty());
}

#[tokio::test]
async fn test_decode_failure_on_2xx() {
    let backend = Backend::start(vec![("GET", "/v3_2/servers", 200, r#"{"data":{"oops":1}}"#)]).await;
    assert!(matches!(
        backend.client().list_servers().await,
        Err(ResellerError::Decode(_))
    ));
}

#[tokio::test]
async fn test_check_username_sends_query() {
    let backend = Backend::start(vec![(
        "GET",
        "/v3_2/accounts/check_username",
        200,
        r#"{"data":{"message":"The username is available"}}"#,
    )])
    .await;

    let check = backend.client().check_username("bob smith").await.unwrap();
    assert_eq!(check.message, "The username is available");
    assert_eq!(
        backend.requests()[0].query.as_deref(),
        Some("username=bob+smith")
    );
}

#[tokio::test]
async fn test_create_account_posts_credentials() {
    let backend = Backend::start(vec![(
        "POST",
        "/v3_2/accounts",
        200,
        r#"{"data":{"id":31,"username":"bob","status":"Active","expired_at":null}}"#,
    )])
    .await;

    let account = backend.client().create_account("bob", "pw").await.unwrap();
    assert_eq!(account.id, 31);
    assert_eq!(account.status, "Active");
    assert_eq!(account.expires_at, None);

    let body: serde_json::Value = serde_json::from_str(&backend.requests()[0].body).unwrap();
    assert_eq!(body["username"], "bob");
}

#[tokio::test]
async fn test_openvpn_config_without_port() {
    let backend = Backend::start(vec![("GET", "/v3_2/configuration", 200, CONFIG)]).await;

    let payload = backend.client().openvpn_config(1, 42, None).await.unwrap();
    assert_eq!(payload.file_name, "nl-1.ovpn");

    let query = backend.requests()[0].query.clone().unwrap();
    assert_eq!(query, "server_id=42");
    assert!(!query.contains("port_id"));
}

#[tokio::test]
async fn test_openvpn_config_with_port() {
    let backend = Backend::start(vec![("GET", "/v3_2/configuration", 200, CONFIG)]).await;

    backend.client().openvpn_config(1, 42, Some(7)).await.unwrap();
    assert_eq!(
        backend.requests()[0].query.as_deref(),
        Some("server_id=42&port_id=7")
    );
}

#[tokio::test]
async fn test_config_payload_feeds_tunnel() {
    let backend = Backend::start(vec![("GET", "/v3_2/configuration", 200, CONFIG)]).await;

    let payload = backend.client().openvpn_config(1, 42, None).await.unwrap();
    let config = payload.into_tunnel_configuration(None).unwrap();
    assert_eq!(config.label(), Some("nl-1.ovpn"));
}

#[tokio::test]
async fn test_provisioning_returns_account() {
    let backend = Backend::start(vec![("POST", "/v3_2/accounts/validate", 200, VALIDATE_OK)]).await;
    let service = ProvisioningService::new(
        Arc::new(backend.client()),
        Credentials::new("adminIos", "pw"),
    );

    let account = service.account().await.unwrap();
    assert_eq!(account.id, 17);
    assert_eq!(account.username, "adminIos");

    // No caching: each call validates again
    service.account().await.unwrap();
    assert_eq!(backend.requests().len(), 2);
}

#[tokio::test]
async fn test_provisioning_rejection_carries_code() {
    let backend =
        Backend::start(vec![("POST", "/v3_2/accounts/validate", 200, VALIDATE_REJECTED)]).await;
    let service =
        ProvisioningService::new(Arc::new(backend.client()), Credentials::new("adminIos", "x"));

    match service.account().await {
        Err(ProvisioningError::Rejected { code, message }) => {
            assert_eq!(code, 401);
            assert_eq!(message, "invalid");
        }
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_provisioning_non_numeric_code_is_zero() {
    let backend = Backend::start(vec![(
        "POST",
        "/v3_2/accounts/validate",
        200,
        r#"{"success":false,"message":"expired","code":"E_EXPIRED"}"#,
    )])
    .await;
    let service =
        ProvisioningService::new(Arc::new(backend.client()), Credentials::new("adminIos", "x"));

    assert!(matches!(
        service.account().await,
        Err(ProvisioningError::Rejected { code: 0, .. })
    ));
}

#[tokio::test]
async fn test_provisioning_surfaces_server_errors() {
    let backend = Backend::start(vec![("POST", "/v3_2/accounts/validate", 500, "boom")]).await;
    let service =
        ProvisioningService::new(Arc::new(backend.client()), Credentials::new("adminIos", "x"));

    match service.account().await {
        Err(ProvisioningError::Reseller(ResellerError::Server(body))) => assert_eq!(body, "boom"),
        other => panic!("expected server error, got {:?}", other),
    }
}
