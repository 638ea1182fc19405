//! Minimal aria2 JSON-RPC server for integration tests.
//!
//! Speaks `aria2.addUri`, `aria2.tellStatus` and `aria2.forceRemove` over
//! HTTP/1.1 POST. A started download reports `active` on its first status
//! query and `complete` (after writing the payload to `dir/out`) on the next.
//! Like aria2, an existing `dir/out` is renamed around (`a.1.car`) unless the
//! request sets `allow-overwrite`.

use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct Aria2ServerOptions {
    /// Required `--rpc-secret`; requests without `token:<secret>` are rejected.
    pub secret: Option<String>,
    /// URLs whose downloads end in `error`.
    pub failing: HashSet<String>,
}

struct Download {
    dest: PathBuf,
    polls: u32,
    failing: bool,
    written: bool,
}

#[derive(Default)]
struct State {
    next_gid: u64,
    downloads: HashMap<String, Download>,
    methods: Vec<String>,
    removed: Vec<String>,
}

pub struct Aria2Server {
    url: String,
    state: Arc<Mutex<State>>,
}

impl Aria2Server {
    pub fn url(&self) -> String {
        self.url.clone()
    }

    /// RPC methods received, in order.
    pub fn methods(&self) -> Vec<String> {
        self.state.lock().unwrap().methods.clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.state.lock().unwrap().removed.clone()
    }
}

/// Starts the server in a background thread; every download serves `payload`.
pub fn start(payload: Vec<u8>, opts: Aria2ServerOptions) -> Aria2Server {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let state = Arc::new(Mutex::new(State::default()));
    let payload = Arc::new(payload);
    let opts = Arc::new(opts);
    {
        let state = Arc::clone(&state);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let state = Arc::clone(&state);
                let payload = Arc::clone(&payload);
                let opts = Arc::clone(&opts);
                thread::spawn(move || handle(stream, &state, &payload, &opts));
            }
        });
    }
    Aria2Server {
        url: format!("http://127.0.0.1:{}/jsonrpc", port),
        state,
    }
}

fn handle(mut stream: TcpStream, state: &Mutex<State>, payload: &[u8], opts: &Aria2ServerOptions) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let Some(body) = read_request(&mut stream) else {
        return;
    };
    let request: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return respond(&mut stream, 400, &json!({"error": {"code": -32700, "message": "Parse error"}})),
    };
    let id = request["id"].clone();
    let method = request["method"].as_str().unwrap_or("").to_string();
    let mut params: Vec<Value> = request["params"].as_array().cloned().unwrap_or_default();

    if let Some(secret) = &opts.secret {
        let expected = format!("token:{}", secret);
        if params.first().and_then(Value::as_str) != Some(expected.as_str()) {
            return respond(
                &mut stream,
                400,
                &json!({"id": id, "jsonrpc": "2.0", "error": {"code": 1, "message": "Unauthorized"}}),
            );
        }
        params.remove(0);
    }

    let mut st = state.lock().unwrap();
    st.methods.push(method.clone());
    let result = match method.as_str() {
        "aria2.addUri" => {
            let url = params[0][0].as_str().unwrap_or("").to_string();
            let dir = params[1]["dir"].as_str().unwrap_or("");
            let out = params[1]["out"].as_str().unwrap_or("");
            let overwrite = params[1]["allow-overwrite"].as_str() == Some("true");
            let mut dest = PathBuf::from(dir).join(out);
            if dest.exists() && !overwrite {
                let renamed = match out.rsplit_once('.') {
                    Some((stem, ext)) => format!("{}.1.{}", stem, ext),
                    None => format!("{}.1", out),
                };
                dest = PathBuf::from(dir).join(renamed);
            }
            st.next_gid += 1;
            let gid = format!("{:016x}", st.next_gid);
            let failing = opts.failing.contains(&url);
            st.downloads.insert(
                gid.clone(),
                Download {
                    dest,
                    polls: 0,
                    failing,
                    written: false,
                },
            );
            json!(gid)
        }
        "aria2.tellStatus" => {
            let gid = params[0].as_str().unwrap_or("").to_string();
            let Some(dl) = st.downloads.get_mut(&gid) else {
                drop(st);
                return respond(
                    &mut stream,
                    400,
                    &json!({"id": id, "jsonrpc": "2.0", "error": {"code": 1, "message": format!("GID {} is not found", gid)}}),
                );
            };
            dl.polls += 1;
            let total = payload.len();
            let (status, done, message) = if dl.failing {
                ("error", 0, "Resource not found")
            } else if dl.polls >= 2 {
                if !dl.written {
                    std::fs::write(&dl.dest, payload).unwrap();
                    dl.written = true;
                }
                ("complete", total, "")
            } else {
                ("active", total / 2, "")
            };
            json!({
                "gid": gid,
                "status": status,
                "totalLength": total.to_string(),
                "completedLength": done.to_string(),
                "downloadSpeed": "2048",
                "errorCode": if dl.failing { "3" } else { "0" },
                "errorMessage": message,
                "files": [{
                    "index": "1",
                    "path": dl.dest.to_string_lossy(),
                    "length": total.to_string(),
                    "completedLength": done.to_string(),
                    "selected": "true",
                    "uris": []
                }]
            })
        }
        "aria2.forceRemove" => {
            let gid = params[0].as_str().unwrap_or("").to_string();
            st.removed.push(gid.clone());
            json!(gid)
        }
        _ => json!(null),
    };
    drop(st);
    respond(&mut stream, 200, &json!({"id": id, "jsonrpc": "2.0", "result": result}));
}

/// Reads headers and a Content-Length body. Answers `Expect: 100-continue`.
fn read_request(stream: &mut TcpStream) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
    let len: usize = head
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0);
    if head.contains("expect: 100-continue") {
        stream.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").ok()?;
    }
    let mut body = buf[header_end..].to_vec();
    while body.len() < len {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    Some(body)
}

fn respond(stream: &mut TcpStream, code: u16, body: &Value) {
    let body = body.to_string();
    let reason = if code == 200 { "OK" } else { "Bad Request" };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        code,
        reason,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}
