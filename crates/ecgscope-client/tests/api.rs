use ecgscope_client::{
    ApiClient, ApiError, ClassificationRouter, EcgMeta, PatientForm, SessionCache, LLM_UNAVAILABLE,
};
use ecgscope_lib::classification::{BeatClass, RecordKey};
use ecgscope_lib::store::ChartStore;
use serde_json::json;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tiny_http::{Header, Response, Server};

#[derive(Debug, Clone)]
struct Seen {
    method: String,
    url: String,
    body: String,
}

type Handler = dyn Fn(&str, &str) -> (u16, String) + Send + Sync;

/// Local backend answering from `handler(method, url)` and recording requests.
struct MockBackend {
    server: Arc<Server>,
    seen: Arc<Mutex<Vec<Seen>>>,
    thread: Option<JoinHandle<()>>,
    base_url: String,
}

impl MockBackend {
    fn start(handler: impl Fn(&str, &str) -> (u16, String) + Send + Sync + 'static) -> Self {
        let server = Arc::new(Server::http("127.0.0.1:0").unwrap());
        let port = server.server_addr().to_ip().unwrap().port();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler: Box<Handler> = Box::new(handler);
        let thread = {
            let server = server.clone();
            let seen = seen.clone();
            std::thread::spawn(move || {
                for mut request in server.incoming_requests() {
                    let mut body = String::new();
                    let _ = request.as_reader().read_to_string(&mut body);
                    let method = request.method().to_string();
                    let url = request.url().to_string();
                    let (status, reply) = handler(&method, &url);
                    seen.lock().unwrap().push(Seen { method, url, body });
                    let header =
                        Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap();
                    let _ = request.respond(
                        Response::from_string(reply)
                            .with_status_code(status)
                            .with_header(header),
                    );
                }
            })
        };
        Self {
            server,
            seen,
            thread: Some(thread),
            base_url: format!("http://127.0.0.1:{port}/api"),
        }
    }

    fn client(&self) -> ApiClient {
        ApiClient::new(&self.base_url, Duration::from_secs(5))
            .unwrap()
            .with_session_cache(Arc::new(SessionCache::new()))
    }

    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn patient_json() -> String {
    json!([{
        "id": 1, "nom": "Martin", "prenom": "Alice", "date_naissance": "07-03-1984",
        "age": 40, "poids": 61.5, "taille": 168.0, "adresse": "", "antecedant": "",
        "prise_medoc": "false", "allergies": "",
        "ecg_records": [{"id": 2, "patient_id": 1, "fichier_csv": "data/100.csv",
                         "lieu": "Lyon", "frequence_hz": 360.0, "date_prise": null}]
    }])
    .to_string()
}

fn segment_json() -> String {
    let data: Vec<[f64; 2]> = (0..400).map(|i| [i as f64 / 100.0, 0.0]).collect();
    json!({
        "patient_id": 1, "ecg_id": 2, "sampling_rate": 100, "t0": 0.0, "t1": 4.0,
        "ecg_data": data,
        "r_peaks": [[0.5, 1.0], [1.3, 1.0], [2.1, 1.0], [2.9, 1.0]],
        "rr_intervals": [[1.3, 0.8], [2.1, 0.8], [2.9, 0.8]],
        "metrics": {"time_domain": {"HRV_MeanNN": 800.0, "HRV_SDNN": null},
                    "frequency_domain": {}, "non_linear_domain": {}},
        "segment_length": 4.0
    })
    .to_string()
}

fn classification_json() -> String {
    json!({
        "patient_id": 1, "ecg_id": 2, "nombre_de_battements": 4,
        "beatsPrediction": [["0", "Battement normal"], ["1", "Battement ectopique ventriculaire"],
                            ["2", "Battement normal"], ["3"]]
    })
    .to_string()
}

fn backend() -> MockBackend {
    MockBackend::start(|method, url| {
        let path = url.split('?').next().unwrap_or_default();
        match (method, path) {
            ("GET", "/api/patients") => (200, patient_json()),
            ("GET", "/api/1/2") | ("GET", "/api/1/2/segment") => (200, segment_json()),
            ("GET", "/api/1/2/fs") => (200, "360".into()),
            ("GET", "/api/1/9") => (404, json!({"detail": "ECG 9 introuvable"}).to_string()),
            ("GET", "/api/1/3") => (500, "Internal Server Error".into()),
            ("GET", "/api/1/4") => (200, "not json".into()),
            ("POST", "/api/beat-classification/1/2") => (200, classification_json()),
            ("DELETE", "/api/1/2") => (200, json!({"status": "ok", "message": "ECG supprimé"}).to_string()),
            ("POST", "/api/import_ecg") => (
                200,
                json!({"status": "ok", "patient_id": 5, "ecg_id": 6, "csv_path": "data/5/6.csv"})
                    .to_string(),
            ),
            ("POST", "/api/1/2/llm_analysis") => (200, json!({"analysis": "Rythme sinusal."}).to_string()),
            ("POST", "/api/1/3/llm_analysis") => (503, json!({"detail": "MISTRAL_API_KEY non configurée"}).to_string()),
            _ => (404, json!({"detail": "Not Found"}).to_string()),
        }
    })
}

#[test]
fn patients_are_cached_per_session() -> Result<(), Box<dyn std::error::Error>> {
    let mock = backend();
    let client = mock.client();
    let patients = client.list_patients(0, 1000)?;
    assert_eq!(patients.len(), 1);
    assert_eq!(patients[0].ecg_records[0].frequence_hz, 360.0);
    client.list_patients(0, 1000)?;
    let seen = mock.seen();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].url.contains("skip=0") && seen[0].url.contains("limit=1000"));
    Ok(())
}

#[test]
fn other_patient_pages_bypass_the_cache() -> Result<(), Box<dyn std::error::Error>> {
    let mock = backend();
    let client = mock.client();
    client.list_patients(0, 1000)?;
    client.list_patients(1, 1000)?;
    client.list_patients(1, 1000)?;
    client.list_patients(0, 1000)?;
    let urls: Vec<String> = mock.seen().into_iter().map(|s| s.url).collect();
    assert_eq!(urls.len(), 3);
    assert!(urls[1].contains("skip=1") && urls[2].contains("skip=1"), "{urls:?}");
    Ok(())
}

#[test]
fn record_converts_and_delete_invalidates() -> Result<(), Box<dyn std::error::Error>> {
    let mock = backend();
    let client = mock.client();
    let record = client.get_record(1, 2)?;
    let store = record.to_store()?;
    assert_eq!(store.len(), 400);
    assert_eq!(store.peaks().len(), 4);
    assert_eq!(record.metrics.time_domain["HRV_SDNN"], None);
    client.get_record(1, 2)?;
    assert_eq!(mock.seen().len(), 1);

    let ack = client.delete_ecg(1, 2)?;
    assert_eq!(ack.status, "ok");
    client.get_record(1, 2)?;
    let methods: Vec<String> = mock.seen().into_iter().map(|s| s.method).collect();
    assert_eq!(methods, vec!["GET", "DELETE", "GET"]);
    Ok(())
}

#[test]
fn segment_and_fs_queries() -> Result<(), Box<dyn std::error::Error>> {
    let mock = backend();
    let client = mock.client();
    client.get_segment(1, 2, 2.0, 4.5)?;
    assert_eq!(client.get_fs(1, 2)?, 360.0);
    let seen = mock.seen();
    assert_eq!(seen[0].url, "/api/1/2/segment?t0=2&t1=4.5");
    Ok(())
}

#[test]
fn error_statuses_carry_detail() {
    let mock = backend();
    let client = mock.client();
    match client.get_record(1, 9) {
        Err(ApiError::Status { status, detail }) => {
            assert_eq!(status, 404);
            assert_eq!(detail, "ECG 9 introuvable");
        }
        other => panic!("unexpected {other:?}"),
    }
    match client.get_record(1, 3) {
        Err(ApiError::Status { status, detail }) => {
            assert_eq!(status, 500);
            assert_eq!(detail, "Internal Server Error");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(client.get_record(1, 4), Err(ApiError::Decode { .. })));
}

#[test]
fn unreachable_backend_is_a_transport_error() {
    let client = ApiClient::new("http://127.0.0.1:1/api", Duration::from_secs(2)).unwrap();
    assert!(matches!(client.list_patients(0, 10), Err(ApiError::Transport { .. })));
}

#[test]
fn classification_force_refresh_is_a_query_flag() -> Result<(), Box<dyn std::error::Error>> {
    let mock = backend();
    let client = mock.client();
    let response = client.classify(1, 2, false)?;
    assert_eq!(response.nb_beats, Some(4));
    assert_eq!(response.beats_prediction.len(), 4);
    client.classify(1, 2, true)?;
    let seen = mock.seen();
    assert_eq!(seen[0].url, "/api/beat-classification/1/2");
    assert_eq!(seen[1].url, "/api/beat-classification/1/2?force_refresh=true");
    assert_eq!(seen[1].method, "POST");
    Ok(())
}

#[test]
fn import_sends_multipart_form() -> Result<(), Box<dyn std::error::Error>> {
    let mock = backend();
    let client = mock.client();
    let mut csv = tempfile::NamedTempFile::new()?;
    writeln!(csv, "'sample #','MLII'\n0,995\n1,1000")?;
    let patient = PatientForm {
        first_name: "Alice".into(),
        last_name: "Martin".into(),
        date_of_birth: "1984-03-07".into(),
        age: 40,
        weight: 61.5,
        height: 168.0,
        ..PatientForm::default()
    };
    let meta = EcgMeta {
        date: "2024-05-01".into(),
        location: "Lyon".into(),
        sampling_rate: 360,
    };
    let response = client.import_ecg(&patient, &meta, csv.path(), true)?;
    assert_eq!((response.patient_id, response.ecg_id), (5, 6));
    let body = &mock.seen()[0].body;
    assert!(body.contains("name=\"firstName\""));
    assert!(body.contains("07-03-1984"));
    assert!(body.contains("01-05-2024"));
    assert!(body.contains("name=\"samplingRate\""));
    assert!(body.contains("name=\"file\""));
    assert!(body.contains("MLII"));
    Ok(())
}

#[test]
fn llm_analysis_falls_back_to_sentinel() {
    let mock = backend();
    let client = mock.client();
    let metrics = json!({"bpm": 72});
    assert_eq!(client.llm_analysis(1, 2, &metrics), "Rythme sinusal.");
    assert_eq!(client.llm_analysis(1, 3, &metrics), LLM_UNAVAILABLE);
    assert!(mock.seen()[0].body.contains("\"metrics\""));
}

#[test]
fn router_applies_labels_from_backend() -> Result<(), Box<dyn std::error::Error>> {
    let mock = backend();
    let client = mock.client();
    let store = client.get_record(1, 2)?.to_store()?;
    let mut router = ClassificationRouter::new(ChartStore::default(), client);
    router.load(Some(RecordKey::new(1, 2)), store);
    assert!(router.wait_for_labels(Duration::from_secs(5)));
    assert_eq!(router.labels().class_of(1), BeatClass::Ventricular);
    let stats = router.overlay().unwrap().stats;
    assert_eq!(stats.counts.normal, 2);
    assert_eq!(stats.counts.ventricular, 1);
    assert_eq!(stats.counts.unknown, 1);
    assert_eq!(stats.bpm, 75);
    Ok(())
}
