use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::{json, Value};
use std::error::Error;
use std::sync::Arc;
use std::thread::JoinHandle;
use tiny_http::{Header, Response, Server};

/// Backend stub serving one four-second recording.
struct Backend {
    server: Arc<Server>,
    thread: Option<JoinHandle<()>>,
    url: String,
}

impl Backend {
    fn start() -> Result<Self, Box<dyn Error>> {
        let server = Arc::new(Server::http("127.0.0.1:0").map_err(|e| e.to_string())?);
        let port = server
            .server_addr()
            .to_ip()
            .ok_or("server is not bound to an IP address")?
            .port();
        let thread = {
            let server = server.clone();
            std::thread::spawn(move || {
                for request in server.incoming_requests() {
                    let path = request.url().split('?').next().unwrap_or_default().to_string();
                    let (status, body) = route(&request.method().to_string(), &path);
                    let header =
                        Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap();
                    let _ = request.respond(
                        Response::from_string(body)
                            .with_status_code(status)
                            .with_header(header),
                    );
                }
            })
        };
        Ok(Self {
            server,
            thread: Some(thread),
            url: format!("http://127.0.0.1:{port}/api"),
        })
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn route(method: &str, path: &str) -> (u16, String) {
    match (method, path) {
        ("GET", "/api/1/2") => {
            let data: Vec<[f64; 2]> = (0..400).map(|i| [i as f64 / 100.0, 0.0]).collect();
            let body = json!({
                "patient_id": 1, "ecg_id": 2, "sampling_rate": 100, "t0": 0.0, "t1": 4.0,
                "ecg_data": data,
                "r_peaks": [[0.5, 1.0], [1.3, 1.0], [2.1, 1.0], [2.9, 1.0]],
                "rr_intervals": [[1.3, 0.8], [2.1, 0.8], [2.9, 0.8]],
                "segment_length": 4.0
            });
            (200, body.to_string())
        }
        ("POST", "/api/beat-classification/1/2") => {
            let body = json!({
                "patient_id": 1, "ecg_id": 2, "nombre_de_battements": 4,
                "beatsPrediction": [["0", "Battement normal"],
                                    ["1", "Battement ectopique ventriculaire"],
                                    ["2", "Battement normal"], ["3"]]
            });
            (200, body.to_string())
        }
        ("GET", "/api/1/2/fs") => (200, "100".into()),
        ("DELETE", "/api/1/2") => (
            200,
            json!({"status": "success", "message": "ECG 2 supprimé"}).to_string(),
        ),
        _ => (404, json!({"detail": "introuvable"}).to_string()),
    }
}

fn ecgscope(backend: &Backend) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("ecgscope");
    cmd.env_remove("ECGSCOPE_CONFIG")
        .args(["--api-url", &backend.url]);
    cmd
}

#[test]
fn segment_waits_for_labels() -> Result<(), Box<dyn Error>> {
    let backend = Backend::start()?;
    let mut cmd = ecgscope(&backend);
    cmd.args(["segment", "--patient", "1", "--ecg", "2", "--label-timeout-s", "10"]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let summary: Value = serde_json::from_slice(&output)?;
    assert_eq!(summary["labels"], "ready");
    assert_eq!(summary["viewport"], json!({"start": 0, "end": 400}));
    assert_eq!(summary["stats"]["counts"]["normal"], 2);
    assert_eq!(summary["stats"]["counts"]["ventricular"], 1);
    assert_eq!(summary["stats"]["counts"]["unknown"], 1);
    assert_eq!(summary["stats"]["bpm"], 75);
    Ok(())
}

#[test]
fn fs_and_delete() -> Result<(), Box<dyn Error>> {
    let backend = Backend::start()?;
    let mut cmd = ecgscope(&backend);
    cmd.args(["fs", "--patient", "1", "--ecg", "2"]);
    let output = cmd.assert().success().get_output().stdout.clone();
    assert_eq!(String::from_utf8(output)?.trim(), "100");

    let mut cmd = ecgscope(&backend);
    cmd.args(["delete-ecg", "--patient", "1", "--ecg", "2"]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let ack: Value = serde_json::from_slice(&output)?;
    assert_eq!(ack["status"], "success");
    Ok(())
}

#[test]
fn backend_detail_is_surfaced() -> Result<(), Box<dyn Error>> {
    let backend = Backend::start()?;
    let mut cmd = ecgscope(&backend);
    cmd.args(["fs", "--patient", "7", "--ecg", "7"]);
    let stderr = cmd.assert().failure().get_output().stderr.clone();
    let stderr = String::from_utf8(stderr)?;
    assert!(stderr.contains("introuvable"), "{stderr}");
    Ok(())
}
