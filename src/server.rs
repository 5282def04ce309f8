//! JSON-over-HTTP front for the dashboard core.
//!
//! Endpoints:
//!   GET  /api/health     - liveness
//!   GET  /api/options    - attribute catalog, labels, extents, reset criteria
//!   GET  /api/manifest   - load report for the table in memory
//!   POST /api/dashboard  - body: DashboardRequest, returns DashboardBundle
//!
//! Each connection is handled on its own task against a shared, read-only
//! record store. A rejected request leaves nothing behind.

use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::config::Config;
use crate::dashboard::{build, options_catalog, DashboardRequest};
use crate::data::RecordStore;
use crate::error::DashboardError;
use crate::logging::{log, log_request_rejected, obj, v_str, Domain, Level};

static REQUEST_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: &'static str,
    pub content_type: &'static str,
    pub body: String,
}

impl Response {
    fn json(status: &'static str, body: String) -> Self {
        Self {
            status,
            content_type: "application/json",
            body,
        }
    }

    fn error(status: &'static str, message: &str) -> Self {
        Self::json(status, json!({ "error": message }).to_string())
    }

    pub fn to_http(&self) -> String {
        format!(
            "HTTP/1.1 {}\r\n\
             Content-Type: {}\r\n\
             Access-Control-Allow-Origin: *\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\r\n{}",
            self.status,
            self.content_type,
            self.body.len(),
            self.body
        )
    }
}

/// Shared state for all connections. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct AppState {
    pub store: RecordStore,
    pub config: Arc<Config>,
}

/// Map one parsed request onto a response. Pure apart from logging.
pub fn route(state: &AppState, method: &str, path: &str, body: &[u8]) -> Response {
    let request_id = REQUEST_SEQ.fetch_add(1, Ordering::SeqCst);
    let path = path.split('?').next().unwrap_or(path);
    match (method, path) {
        ("GET", "/api/health") => Response::json(
            "200 OK",
            json!({ "status": "ok", "records": state.store.len() }).to_string(),
        ),
        ("GET", "/api/options") => to_json_response(&options_catalog(&state.store)),
        ("GET", "/api/manifest") => to_json_response(state.store.report()),
        ("POST", "/api/dashboard") => {
            let request: DashboardRequest = if body.iter().all(u8::is_ascii_whitespace) {
                DashboardRequest::default()
            } else {
                match serde_json::from_slice(body) {
                    Ok(r) => r,
                    Err(err) => {
                        let err = DashboardError::InvalidRequest(err.to_string());
                        log_request_rejected(request_id, &err.to_string());
                        return Response::error("400 BAD REQUEST", &err.to_string());
                    }
                }
            };
            match build(&state.store, &request, &state.config) {
                Ok(bundle) => to_json_response(&bundle),
                Err(err) => {
                    log_request_rejected(request_id, &err.to_string());
                    let status = match err {
                        DashboardError::InvalidRange { .. } | DashboardError::InvalidRequest(_) => {
                            "400 BAD REQUEST"
                        }
                        _ => "500 INTERNAL SERVER ERROR",
                    };
                    Response::error(status, &err.to_string())
                }
            }
        }
        (_, "/api/dashboard") => Response::error("405 METHOD NOT ALLOWED", "use POST"),
        _ => Response {
            status: "404 NOT FOUND",
            content_type: "text/plain",
            body: "Not Found".to_string(),
        },
    }
}

fn to_json_response<T: serde::Serialize>(value: &T) -> Response {
    match serde_json::to_string(value) {
        Ok(body) => Response::json("200 OK", body),
        Err(err) => Response::error("500 INTERNAL SERVER ERROR", &err.to_string()),
    }
}

/// Read the request line, headers and (bounded) body from a stream.
async fn read_request(
    stream: &mut TcpStream,
    max_body: usize,
) -> std::io::Result<(String, String, Vec<u8>)> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        let line = line.trim_end();
        if n == 0 || line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }
    if content_length > max_body {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("body of {} bytes exceeds limit {}", content_length, max_body),
        ));
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await?;
    Ok((method, path, body))
}

async fn handle_connection(mut stream: TcpStream, state: AppState) {
    let timeout = Duration::from_millis(state.config.request_timeout_ms);
    let response = match tokio::time::timeout(
        timeout,
        read_request(&mut stream, state.config.max_body_bytes),
    )
    .await
    {
        Ok(Ok((method, path, body))) => {
            log(
                Level::Debug,
                Domain::Server,
                "request",
                obj(&[("method", v_str(&method)), ("path", v_str(&path))]),
            );
            route(&state, &method, &path, &body)
        }
        Ok(Err(err)) => Response::error("400 BAD REQUEST", &err.to_string()),
        Err(_) => Response::error("408 REQUEST TIMEOUT", "request timed out"),
    };
    let _ = stream.write_all(response.to_http().as_bytes()).await;
    let _ = stream.shutdown().await;
}

/// Accept connections forever, one task per connection.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                log(
                    Level::Warn,
                    Domain::Server,
                    "accept_failed",
                    obj(&[("error", v_str(&err.to_string()))]),
                );
                continue;
            }
        };
        log(
            Level::Trace,
            Domain::Server,
            "accepted",
            obj(&[("peer", v_str(&peer.to_string()))]),
        );
        tokio::spawn(handle_connection(stream, state.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{incident_date, Record};

    fn state() -> AppState {
        let rec = |shark: &str, year: i32| Record {
            record_id: 0,
            shark_type: shark.into(),
            shark_full_name: String::new(),
            injury_result: "injured".into(),
            injury_severity: "minor".into(),
            state: "SA".into(),
            location_type: "coastal".into(),
            victim_gender: "male".into(),
            data_source: "media".into(),
            victim_activity: "diving".into(),
            provoked: "unprovoked".into(),
            shark_length_m: Some(3.0),
            incident_year: year,
            incident_month: 2,
            incident_date: incident_date(year, 2).unwrap(),
            latitude: -35.0,
            longitude: 138.5,
        };
        AppState {
            store: RecordStore::from_records(vec![
                rec("white shark", 1980),
                rec("bronze whaler", 2005),
            ])
            .unwrap(),
            config: Arc::new(Config::default()),
        }
    }

    #[test]
    fn test_health_and_not_found() {
        let s = state();
        let ok = route(&s, "GET", "/api/health", b"");
        assert_eq!(ok.status, "200 OK");
        assert!(ok.body.contains("\"records\":2"));
        assert_eq!(route(&s, "GET", "/nope", b"").status, "404 NOT FOUND");
        assert_eq!(route(&s, "GET", "/api/dashboard", b"").status, "405 METHOD NOT ALLOWED");
    }

    #[test]
    fn test_dashboard_empty_body_is_unfiltered() {
        let s = state();
        let resp = route(&s, "POST", "/api/dashboard", b"");
        assert_eq!(resp.status, "200 OK");
        let v: serde_json::Value = serde_json::from_str(&resp.body).unwrap();
        assert_eq!(v["rows"]["filtered"]["count"], 2);
    }

    #[test]
    fn test_dashboard_rejects_bad_input() {
        let s = state();
        let bad_json = route(&s, "POST", "/api/dashboard", b"{not json");
        assert_eq!(bad_json.status, "400 BAD REQUEST");

        let inverted = br#"{"criteria":{
            "shark_length_range":{"min":3.0,"max":1.0},
            "year_range":{"min":1980,"max":2005}}}"#;
        let resp = route(&s, "POST", "/api/dashboard", inverted);
        assert_eq!(resp.status, "400 BAD REQUEST");
        assert!(resp.body.contains("shark_length"));

        let huge = br#"{"timeline_buckets":18446744073709551615}"#;
        let resp = route(&s, "POST", "/api/dashboard", huge);
        assert_eq!(resp.status, "400 BAD REQUEST");
        assert!(resp.body.contains("timeline_buckets"));

        // the store still answers normally afterwards
        let again = route(&s, "POST", "/api/dashboard", b"{}");
        assert_eq!(again.status, "200 OK");
    }

    #[test]
    fn test_options_lists_values() {
        let s = state();
        let resp = route(&s, "GET", "/api/options?x=1", b"");
        assert_eq!(resp.status, "200 OK");
        assert!(resp.body.contains("bronze whaler"));
        assert!(resp.body.contains("\"label\":\"Shark Type\""));
    }

    async fn spawn_server(max_body_bytes: usize, request_timeout_ms: u64) -> std::net::SocketAddr {
        let mut cfg = Config::default();
        cfg.max_body_bytes = max_body_bytes;
        cfg.request_timeout_ms = request_timeout_ms;
        let state = AppState {
            config: Arc::new(cfg),
            ..state()
        };
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, state));
        addr
    }

    async fn exchange(addr: std::net::SocketAddr, raw: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut out = String::new();
        stream.read_to_string(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn test_socket_round_trip() {
        let addr = spawn_server(1024, 2_000).await;
        let raw = exchange(
            addr,
            "POST /api/dashboard HTTP/1.1\r\nHost: x\r\nContent-Length: 2\r\n\r\n{}",
        )
        .await;
        assert!(raw.starts_with("HTTP/1.1 200 OK\r\n"));
        let (_, body) = raw.split_once("\r\n\r\n").unwrap();
        let v: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(v["rows"]["total"], 2);
    }

    #[tokio::test]
    async fn test_socket_rejects_oversize_body() {
        let addr = spawn_server(64, 2_000).await;
        let raw = exchange(
            addr,
            "POST /api/dashboard HTTP/1.1\r\nContent-Length: 4096\r\n\r\n",
        )
        .await;
        assert!(raw.starts_with("HTTP/1.1 400 BAD REQUEST\r\n"));
        assert!(raw.contains("exceeds limit 64"));
    }

    #[tokio::test]
    async fn test_socket_times_out_missing_body() {
        let addr = spawn_server(1024, 100).await;
        // headers promise a body that never arrives; the write half stays open
        let raw = exchange(
            addr,
            "POST /api/dashboard HTTP/1.1\r\nContent-Length: 10\r\n\r\n",
        )
        .await;
        assert!(raw.starts_with("HTTP/1.1 408 REQUEST TIMEOUT\r\n"));
    }

    #[test]
    fn test_http_framing() {
        let resp = Response::json("200 OK", "{}".to_string());
        let raw = resp.to_http();
        assert!(raw.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(raw.contains("Content-Length: 2\r\n"));
        assert!(raw.ends_with("\r\n\r\n{}"));
    }
}
