//! Minimal HTTP admin surface.
//!
//! A plain TcpListener on a background thread, answering JSON. Routes:
//!
//! - `GET  /world/snapshot`        full world snapshot
//! - `GET  /world/stats`           scheduler / population metrics
//! - `POST /world/start|stop|step` simulation control
//! - `POST /agents`                spawn an agent
//! - `DELETE /agents/:id`          remove an agent
//! - `POST /agents/:id/orders`     enqueue an order task

use serde::Deserialize;
use serde_json::json;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{error, info, warn};

use crate::agents::Sex;
use crate::ports::SpawnSpec;
use crate::simulation::{OrderSpec, Simulation};
use crate::types::{AgentId, Position};

#[derive(Debug, Deserialize, Default)]
struct SpawnRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    sex: Option<String>,
    #[serde(default)]
    age_years: Option<f32>,
    #[serde(default)]
    x: Option<f32>,
    #[serde(default)]
    y: Option<f32>,
    #[serde(default)]
    immortal: bool,
}

/// Start the admin server on a background thread
pub fn start_http_server(sim: Arc<Mutex<Simulation>>, port: u16) {
    let bind_address = format!("0.0.0.0:{}", port);
    thread::spawn(move || {
        let listener = match TcpListener::bind(&bind_address) {
            Ok(listener) => listener,
            Err(err) => {
                error!("HTTP: failed to bind {}: {}", bind_address, err);
                return;
            }
        };
        info!("HTTP: admin surface listening on http://{}", bind_address);

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let sim = sim.clone();
                    thread::spawn(move || {
                        handle_connection(stream, sim);
                    });
                }
                Err(err) => {
                    error!("HTTP: connection failed: {}", err);
                }
            }
        }
    });
}

fn handle_connection(mut stream: TcpStream, sim: Arc<Mutex<Simulation>>) {
    let Ok(reader_stream) = stream.try_clone() else {
        return;
    };
    let mut reader = BufReader::new(reader_stream);

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(path)) = (parts.next(), parts.next()) else {
        return;
    };
    let method = method.to_string();
    let path = path.to_string();

    // Headers: only Content-Length matters here
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let line = line.trim();
                if line.is_empty() {
                    break;
                }
                if let Some(value) = line
                    .to_ascii_lowercase()
                    .strip_prefix("content-length:")
                    .map(str::trim)
                    .map(str::to_string)
                {
                    content_length = value.parse().unwrap_or(0);
                }
            }
            Err(_) => return,
        }
    }

    let mut body = vec![0u8; content_length];
    if content_length > 0 && reader.read_exact(&mut body).is_err() {
        return;
    }

    let (status, payload) = route(&method, &path, &body, &sim);
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nAccess-Control-Allow-Origin: *\r\n\r\n{}",
        status,
        payload.len(),
        payload
    );
    let _ = stream.write_all(response.as_bytes());
}

fn route(
    method: &str,
    path: &str,
    body: &[u8],
    sim: &Arc<Mutex<Simulation>>,
) -> (&'static str, String) {
    match (method, path) {
        ("GET", "/world/snapshot") => {
            let sim = match sim.lock() {
                Ok(sim) => sim,
                Err(_) => return internal_error("simulation lock poisoned"),
            };
            let snapshot = sim.export_snapshot("http");
            match serde_json::to_string(&snapshot) {
                Ok(json) => ("200 OK", json),
                Err(err) => internal_error(&err.to_string()),
            }
        }
        ("GET", "/world/stats") => {
            let sim = match sim.lock() {
                Ok(sim) => sim,
                Err(_) => return internal_error("simulation lock poisoned"),
            };
            ("200 OK", sim.stats_json().to_string())
        }
        ("POST", "/world/start") => {
            if let Ok(mut sim) = sim.lock() {
                sim.start();
            }
            ok_json(json!({"running": true}))
        }
        ("POST", "/world/stop") => {
            if let Ok(mut sim) = sim.lock() {
                sim.stop();
            }
            ok_json(json!({"running": false}))
        }
        ("POST", "/world/step") => {
            if let Ok(mut sim) = sim.lock() {
                sim.step();
            }
            ok_json(json!({"stepped": true}))
        }
        ("POST", "/agents") => {
            let request: SpawnRequest = match serde_json::from_slice(body) {
                Ok(request) => request,
                Err(_) if body.is_empty() => SpawnRequest::default(),
                Err(err) => return bad_request(&format!("invalid spawn body: {}", err)),
            };
            let spec = SpawnSpec {
                name: request.name,
                sex: match request.sex.as_deref() {
                    Some("male") => Some(Sex::Male),
                    Some("female") => Some(Sex::Female),
                    _ => None,
                },
                age_years: request.age_years.unwrap_or(20.0),
                position: match (request.x, request.y) {
                    (Some(x), Some(y)) => Some(Position::new(x, y)),
                    _ => None,
                },
                parents: None,
                immortal: request.immortal,
            };
            let mut sim = match sim.lock() {
                Ok(sim) => sim,
                Err(_) => return internal_error("simulation lock poisoned"),
            };
            match sim.spawn_agent(spec) {
                Ok(agent_id) => ok_json(json!({"agent_id": agent_id})),
                Err(err) => bad_request(&err.to_string()),
            }
        }
        _ => {
            // Path-parameterized routes
            if method == "DELETE" {
                if let Some(id) = path.strip_prefix("/agents/") {
                    if !id.contains('/') {
                        let mut sim = match sim.lock() {
                            Ok(sim) => sim,
                            Err(_) => return internal_error("simulation lock poisoned"),
                        };
                        return match sim.remove_agent(&AgentId::from(id), "admin request") {
                            Ok(()) => ok_json(json!({"removed": id})),
                            Err(err) => not_found(&err.to_string()),
                        };
                    }
                }
            }
            if method == "POST" {
                if let Some(rest) = path.strip_prefix("/agents/") {
                    if let Some(id) = rest.strip_suffix("/orders") {
                        let order: OrderSpec = match serde_json::from_slice(body) {
                            Ok(order) => order,
                            Err(err) => {
                                return bad_request(&format!("invalid order body: {}", err))
                            }
                        };
                        let mut sim = match sim.lock() {
                            Ok(sim) => sim,
                            Err(_) => return internal_error("simulation lock poisoned"),
                        };
                        return match sim.issue_order(&AgentId::from(id), &order) {
                            Ok(task_id) => ok_json(json!({"task_id": task_id})),
                            Err(err) => bad_request(&err.to_string()),
                        };
                    }
                }
            }
            warn!("HTTP: no route for {} {}", method, path);
            (
                "404 Not Found",
                json!({"error": "not found"}).to_string(),
            )
        }
    }
}

fn ok_json(value: serde_json::Value) -> (&'static str, String) {
    ("200 OK", value.to_string())
}

fn bad_request(message: &str) -> (&'static str, String) {
    ("400 Bad Request", json!({ "error": message }).to_string())
}

fn not_found(message: &str) -> (&'static str, String) {
    ("404 Not Found", json!({ "error": message }).to_string())
}

fn internal_error(message: &str) -> (&'static str, String) {
    error!("HTTP: {}", message);
    (
        "500 Internal Server Error",
        json!({ "error": message }).to_string(),
    )
}
