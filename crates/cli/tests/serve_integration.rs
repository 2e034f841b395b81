//! Integration tests for the `coldchain serve` HTTP API.
//!
//! Each test starts the server as a child process on a unique port,
//! makes HTTP requests, and verifies the responses.

use std::io::Read;
use std::net::TcpStream;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use serde_json::{json, Value};

const OWNER: &str = "0xowner";

/// Atomic port counter to avoid port conflicts between parallel tests.
/// Base port is derived from process ID so separate test binaries don't
/// collide on the same port range.
static NEXT_PORT: AtomicU16 = AtomicU16::new(0);
static PORT_INIT: std::sync::Once = std::sync::Once::new();

fn next_port() -> u16 {
    PORT_INIT.call_once(|| {
        let base = 20000 + (std::process::id() as u16 % 20000);
        NEXT_PORT.store(base, Ordering::SeqCst);
    });
    NEXT_PORT.fetch_add(1, Ordering::SeqCst)
}

/// Running server; killed on drop.
struct Server {
    child: Child,
    port: u16,
    _dir: tempfile::TempDir,
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Helper: start `coldchain serve` on a fresh port with `config` as its
/// `coldchain.toml`.
fn start_server_with(config: &str) -> Server {
    let dir = tempfile::TempDir::new().expect("temp dir");
    std::fs::write(dir.path().join("coldchain.toml"), config).expect("write config");
    let port = next_port();

    let mut cmd = Command::new(env!("CARGO_BIN_EXE_coldchain"));
    cmd.current_dir(dir.path())
        .env_remove("COLDCHAIN_PORT")
        .env_remove("COLDCHAIN_API_KEY")
        .env("COLDCHAIN_OWNER", OWNER)
        .env("COLDCHAIN_LOG", "warn")
        .arg("serve")
        .arg("--port")
        .arg(port.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    let child = cmd.spawn().expect("failed to start coldchain serve");
    // Wait for server to be ready by polling the port
    for _ in 0..50 {
        if TcpStream::connect(format!("127.0.0.1:{}", port)).is_ok() {
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    Server {
        child,
        port,
        _dir: dir,
    }
}

fn start_server() -> Server {
    start_server_with("")
}

/// Helper: send one HTTP request with extra `headers` and return (status, body).
fn http(
    port: u16,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    body: Option<&Value>,
) -> (u16, String) {
    let mut stream = TcpStream::connect(format!("127.0.0.1:{}", port)).expect("failed to connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();

    let payload = body.map(|b| b.to_string()).unwrap_or_default();
    let mut header_lines = String::new();
    for (name, value) in headers {
        header_lines.push_str(&format!("{}: {}\r\n", name, value));
    }
    if body.is_some() {
        header_lines.push_str("Content-Type: application/json\r\n");
    }
    let request = format!(
        "{} {} HTTP/1.1\r\nHost: localhost:{}\r\n{}Content-Length: {}\r\nConnection: close\r\n\r\n{}",
        method,
        path,
        port,
        header_lines,
        payload.len(),
        payload
    );
    std::io::Write::write_all(&mut stream, request.as_bytes()).expect("failed to write");

    let mut response = String::new();
    let _ = stream.read_to_string(&mut response);

    parse_http_response(&response)
}

fn get(server: &Server, path: &str) -> (u16, Value) {
    let (status, body) = http(server.port, "GET", path, &[], None);
    (status, parse_json(&body))
}

fn post(server: &Server, path: &str, caller: Option<&str>, body: Value) -> (u16, Value) {
    let headers: Vec<(&str, &str)> = caller
        .map(|c| ("X-Caller-Identity", c))
        .into_iter()
        .collect();
    let (status, body) = http(server.port, "POST", path, &headers, Some(&body));
    (status, parse_json(&body))
}

fn parse_json(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|e| panic!("invalid JSON body {:?}: {}", body, e))
}

/// Parse an HTTP response into (status_code, body).
fn parse_http_response(response: &str) -> (u16, String) {
    let parts: Vec<&str> = response.splitn(2, "\r\n\r\n").collect();
    let headers = parts.first().unwrap_or(&"").to_string();
    let body = parts.get(1).unwrap_or(&"").to_string();

    let status_line = headers.lines().next().unwrap_or("");
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(0);

    let chunked = headers
        .to_ascii_lowercase()
        .contains("transfer-encoding: chunked");
    let body = if chunked { decode_chunked(&body) } else { body };

    (status, body)
}

/// Decode chunked transfer encoding.
fn decode_chunked(data: &str) -> String {
    let mut result = String::new();
    let mut remaining = data;

    while let Some(line_end) = remaining.find("\r\n") {
        let size = match usize::from_str_radix(remaining[..line_end].trim(), 16) {
            Ok(s) => s,
            Err(_) => break,
        };
        if size == 0 {
            break;
        }
        let chunk_start = line_end + 2;
        let chunk_end = chunk_start + size;
        if chunk_end > remaining.len() {
            result.push_str(&remaining[chunk_start..]);
            break;
        }
        result.push_str(&remaining[chunk_start..chunk_end]);
        remaining = remaining.get(chunk_end + 2..).unwrap_or("");
    }

    result
}

/// Register one participant per role: 0xR, 0xM, 0xD, 0xT.
fn staff(server: &Server) {
    for (identity, role) in [("0xR", json!(1)), ("0xM", json!(2)), ("0xD", json!("Distributor")), ("0xT", json!(4))] {
        let (status, body) = post(
            server,
            "/participants",
            Some(OWNER),
            json!({ "identity": identity, "role": role }),
        );
        assert_eq!(status, 200, "registering {identity}: {body}");
    }
}

fn add_cola(server: &Server) -> u64 {
    let (status, body) = post(
        server,
        "/cold-drinks",
        Some(OWNER),
        json!({ "name": "Cola", "description": "fizzy", "ingredients_permitted": true }),
    );
    assert_eq!(status, 201, "{body}");
    body["id"].as_u64().unwrap()
}

// ──────────────────────────────────────────────
// Health and routing
// ──────────────────────────────────────────────

#[test]
fn health_returns_200_with_version() {
    let server = start_server();
    let (status, body) = get(&server, "/health");
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["owner"], OWNER);
    assert!(body["version"].is_string());
}

#[test]
fn unknown_route_is_404_json() {
    let server = start_server();
    let (status, body) = get(&server, "/nowhere");
    assert_eq!(status, 404);
    assert_eq!(body["kind"], "not_found");
}

#[test]
fn post_without_caller_is_401() {
    let server = start_server();
    let (status, body) = post(
        &server,
        "/participants",
        None,
        json!({ "identity": "0xR", "role": 1 }),
    );
    assert_eq!(status, 401);
    assert_eq!(body["kind"], "unauthenticated");
}

// ──────────────────────────────────────────────
// Lifecycle
// ──────────────────────────────────────────────

#[test]
fn cold_drink_travels_the_whole_chain() {
    let server = start_server();
    staff(&server);
    let id = add_cola(&server);
    assert_eq!(id, 1);

    let steps = [
        ("0xR", "supplyRawMaterials", "raw_material_supply"),
        ("0xM", "manufactureColdDrink", "manufacture"),
        ("0xD", "distributeColdDrink", "distribution"),
        ("0xT", "retailColdDrink", "retail"),
        ("0xT", "sellColdDrink", "sold"),
    ];
    for (caller, action, stage) in steps {
        let (status, body) = post(&server, &format!("/cold-drinks/{id}/{action}"), Some(caller), json!({}));
        assert_eq!(status, 200, "{action}: {body}");
        assert_eq!(body["stage"], stage);
    }

    let (status, item) = get(&server, "/cold-drinks/1");
    assert_eq!(status, 200);
    assert_eq!(item["supplier_id"], 1);
    assert_eq!(item["manufacturer_id"], 1);
    assert_eq!(item["distributor_id"], 1);
    assert_eq!(item["retailer_id"], 1);

    let (status, history) = get(&server, "/cold-drinks/1/history");
    assert_eq!(status, 200);
    assert_eq!(history["transitions"].as_array().unwrap().len(), 5);
    assert_eq!(history["transitions"][0]["transition"], "supplyRawMaterials");
    assert_eq!(history["verification"]["broken"], json!([]));

    let (status, sold) = get(&server, "/cold-drinks?stage=sold");
    assert_eq!(status, 200);
    assert_eq!(sold["cold_drinks"].as_array().unwrap().len(), 1);
}

#[test]
fn out_of_order_transition_is_409() {
    let server = start_server();
    staff(&server);
    add_cola(&server);
    let (status, body) = post(&server, "/cold-drinks/1/manufactureColdDrink", Some("0xM"), json!({}));
    assert_eq!(status, 409);
    assert_eq!(body["kind"], "invalid_stage");
}

#[test]
fn wrong_role_is_403() {
    let server = start_server();
    staff(&server);
    add_cola(&server);
    let (status, body) = post(&server, "/cold-drinks/1/supplyRawMaterials", Some("0xM"), json!({}));
    assert_eq!(status, 403);
    assert_eq!(body["kind"], "unauthorized");

    let (status, _) = post(
        &server,
        "/participants",
        Some("0xR"),
        json!({ "identity": "0xX", "role": 1 }),
    );
    assert_eq!(status, 403);
}

#[test]
fn missing_item_is_404_and_bad_id_is_400() {
    let server = start_server();
    staff(&server);
    let (status, body) = get(&server, "/cold-drinks/99");
    assert_eq!(status, 404);
    assert_eq!(body["kind"], "not_found");

    let (status, _) = post(&server, "/cold-drinks/99/supplyRawMaterials", Some("0xR"), json!({}));
    assert_eq!(status, 404);

    let (status, body) = get(&server, "/cold-drinks/abc");
    assert_eq!(status, 400);
    assert_eq!(body["kind"], "invalid_argument");
}

#[test]
fn unknown_action_is_404() {
    let server = start_server();
    add_cola(&server);
    let (status, body) = post(&server, "/cold-drinks/1/teleport", Some(OWNER), json!({}));
    assert_eq!(status, 404);
    assert!(body["error"].as_str().unwrap().contains("teleport"));
}

#[test]
fn blank_name_is_400() {
    let server = start_server();
    let (status, body) = post(
        &server,
        "/cold-drinks",
        Some(OWNER),
        json!({ "name": " ", "description": "fizzy", "ingredients_permitted": true }),
    );
    assert_eq!(status, 400);
    assert_eq!(body["kind"], "invalid_argument");

    let (status, _) = post(&server, "/cold-drinks", Some(OWNER), json!({ "name": "Cola" }));
    assert_eq!(status, 400);
}

// ──────────────────────────────────────────────
// Registry
// ──────────────────────────────────────────────

#[test]
fn role_lookup_names_roles() {
    let server = start_server();
    staff(&server);
    let (status, body) = get(&server, "/participants/0xM/role");
    assert_eq!(status, 200);
    assert_eq!(body["role"], "Manufacturer");

    let (status, body) = get(&server, "/participants/0xnobody/role");
    assert_eq!(status, 200);
    assert_eq!(body["role"], "none");

    let (status, body) = get(&server, "/participants?role=retailer");
    assert_eq!(status, 200);
    assert_eq!(body["participants"].as_array().unwrap().len(), 1);
    assert_eq!(body["participants"][0]["identity"], "0xT");
}

#[test]
fn reject_policy_refuses_role_change() {
    let server = start_server_with("[policy]\nre_registration = \"reject\"\n");
    staff(&server);
    let (status, body) = post(
        &server,
        "/participants",
        Some(OWNER),
        json!({ "identity": "0xR", "role": 2 }),
    );
    assert_eq!(status, 400);
    assert_eq!(body["kind"], "invalid_argument");
}

#[test]
fn invalid_role_code_is_400() {
    let server = start_server();
    let (status, body) = post(
        &server,
        "/participants",
        Some(OWNER),
        json!({ "identity": "0xR", "role": 0 }),
    );
    assert_eq!(status, 400);
    assert_eq!(body["kind"], "invalid_argument");
}

// ──────────────────────────────────────────────
// Classification and actions
// ──────────────────────────────────────────────

#[test]
fn process_ingredients_needs_no_caller() {
    let server = start_server();
    let (status, body) = post(
        &server,
        "/process-ingredients",
        None,
        json!({ "label_text": "Water, Aspartame, Caffeine (20mg)" }),
    );
    assert_eq!(status, 200);
    assert_eq!(body["status"], "Not Permitted");
    assert_eq!(body["alerts"][0]["type"], "Banned");
    assert_eq!(body["ingredients"]["Caffeine"], "20mg");
}

#[test]
fn admit_stores_the_verdict() {
    let server = start_server();
    let (status, body) = post(
        &server,
        "/cold-drinks/admit",
        Some(OWNER),
        json!({
            "name": "Diet Cola",
            "description": "no sugar",
            "label_text": "Carbonated Water, Aspartame",
        }),
    );
    assert_eq!(status, 201, "{body}");
    assert_eq!(body["classification"]["status"], "Not Permitted");

    let (_, item) = get(&server, &format!("/cold-drinks/{}", body["id"]));
    assert_eq!(item["ingredients_permitted"], false);
    assert_eq!(item["stage"], "created");
}

#[test]
fn action_space_lists_the_next_step() {
    let server = start_server();
    staff(&server);
    add_cola(&server);

    let (status, body) = get(&server, "/actions/0xR");
    assert_eq!(status, 200);
    assert_eq!(body["actions"].as_array().unwrap().len(), 1);
    assert_eq!(body["actions"][0]["transition"], "supplyRawMaterials");

    let (_, body) = get(&server, "/actions/0xM");
    assert_eq!(body["actions"], json!([]));
}

// ──────────────────────────────────────────────
// API key
// ──────────────────────────────────────────────

const KEYED: &str = "[server]\napi_key = \"s3cret\"\n";

fn grant(port: u16, auth: &[(&str, &str)]) -> (u16, Value) {
    let mut headers = auth.to_vec();
    headers.push(("X-Caller-Identity", OWNER));
    let body = json!({"identity": "0xR", "role": 1});
    let (status, body) = http(port, "POST", "/participants", &headers, Some(&body));
    (status, parse_json(&body))
}

#[test]
fn caller_header_alone_is_refused_when_key_configured() {
    let server = start_server_with(KEYED);
    let (status, body) = grant(server.port, &[]);
    assert_eq!(status, 401);
    assert_eq!(body["kind"], "unauthenticated");

    let (status, body) = get(&server, "/participants/0xR/role");
    assert_eq!(status, 401, "reads need the key too: {}", body);
    let (status, body) = get(&server, "/participants");
    assert_eq!(status, 401);
    assert_eq!(body["error"], "authentication required");
}

#[test]
fn wrong_key_is_403() {
    let server = start_server_with(KEYED);
    let (status, body) = grant(server.port, &[("X-API-Key", "guess")]);
    assert_eq!(status, 403);
    assert_eq!(body["kind"], "forbidden");
    let (status, _) = grant(server.port, &[("Authorization", "Bearer guess")]);
    assert_eq!(status, 403);
}

#[test]
fn correct_key_admits_the_caller() {
    let server = start_server_with(KEYED);
    let (status, body) = grant(server.port, &[("X-API-Key", "s3cret")]);
    assert_eq!(status, 200, "{}", body);

    let (status, body) = http(
        server.port,
        "GET",
        "/participants/0xR/role",
        &[("Authorization", "Bearer s3cret")],
        None,
    );
    assert_eq!(status, 200);
    assert_eq!(parse_json(&body)["role"], "Raw Material Supplier");
}

#[test]
fn health_is_open_when_key_configured() {
    let server = start_server_with(KEYED);
    let (status, _) = get(&server, "/health");
    assert_eq!(status, 200);
}
