use image::{DynamicImage, Rgb, RgbImage};
use screener_core::config::Settings;
use screener_core::*;
use std::sync::Arc;
use tempfile::TempDir;

fn image(width: u32, height: u32) -> CapturedImage {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 200]));
    CapturedImage::from_dynamic(&DynamicImage::ImageRgb8(img)).unwrap()
}

fn answered_session(prompt: &str) -> Session {
    let mut session = Session::start(image(48, 32), prompt).unwrap();
    let conv = session.conversation_mut();
    conv.resolve(TurnId::ROOT, Ok("A settings dialog".into())).unwrap();
    let a = conv.ask("Which options are enabled?").unwrap().turn;
    conv.resolve(a, Ok("Dark mode".into())).unwrap();
    let b = conv.ask("Anything unusual?").unwrap().turn;
    conv.resolve(b, Err(ModelError::Timeout { seconds: 180 })).unwrap();
    conv.edit_and_fork(a, "What is the title?").unwrap();
    session
}

// ========================================================================
// Session Store Tests (session/store.rs)
// ========================================================================

#[test]
fn test_store_save_and_load_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let store = SessionStore::with_dir(temp_dir.path().join("sessions")).unwrap();
    let session = answered_session("Describe it");

    let dir = store.save(&session).unwrap();
    assert!(dir.join("screenshot.png").is_file());
    assert!(dir.join("conversation.json").is_file());

    let loaded = store.load(session.id()).unwrap();
    assert_eq!(loaded.id(), session.id());
    assert_eq!(loaded.initial_prompt(), "Describe it");
    assert_eq!(loaded.conversation(), session.conversation());
    assert_eq!(loaded.image().png_bytes(), session.image().png_bytes());
    assert!(loaded.conversation().get(TurnId(2)).unwrap().answer.is_failed());
}

#[test]
fn test_store_resave_overwrites_conversation() {
    let temp_dir = TempDir::new().unwrap();
    let store = SessionStore::with_dir(temp_dir.path()).unwrap();
    let mut session = answered_session("Describe it");
    store.save(&session).unwrap();

    session.conversation_mut().go_back();
    session.conversation_mut().ask("Is there a cancel button?").unwrap();
    store.save(&session).unwrap();

    let loaded = store.load(session.id()).unwrap();
    assert_eq!(loaded.conversation().len(), session.conversation().len());
    assert_eq!(loaded.conversation().current().question, "Is there a cancel button?");
    assert!(loaded.conversation().current().answer.is_pending());
}

#[test]
fn test_store_load_latest_picks_most_recently_saved() {
    let temp_dir = TempDir::new().unwrap();
    let store = SessionStore::with_dir(temp_dir.path()).unwrap();
    assert!(store.load_latest().unwrap().is_none());

    let first = answered_session("first");
    let second = answered_session("second");
    store.save(&second).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(10));
    store.save(&first).unwrap();

    let latest = store.load_latest().unwrap().unwrap();
    assert_eq!(latest.id(), first.id());

    let listed: Vec<String> = store.list().unwrap().into_iter().map(|s| s.id).collect();
    assert_eq!(listed, vec![first.id().to_string(), second.id().to_string()]);
}

#[test]
fn test_store_load_latest_skips_unreadable_sessions() {
    let temp_dir = TempDir::new().unwrap();
    let store = SessionStore::with_dir(temp_dir.path()).unwrap();
    let good = answered_session("good");
    store.save(&good).unwrap();

    let broken = temp_dir.path().join("29991231_235959_ffffff");
    std::fs::create_dir_all(&broken).unwrap();
    std::fs::write(broken.join("screenshot.png"), image(12, 12).png_bytes()).unwrap();
    std::fs::write(broken.join("conversation.json"), "{ not json").unwrap();

    assert_eq!(store.load_latest().unwrap().unwrap().id(), good.id());
    assert_eq!(store.list().unwrap().len(), 1);
    assert!(matches!(
        store.load("29991231_235959_ffffff"),
        Err(ScreenerError::CorruptSession(_))
    ));
}

#[test]
fn test_store_rejects_inconsistent_tree() {
    let temp_dir = TempDir::new().unwrap();
    let store = SessionStore::with_dir(temp_dir.path()).unwrap();
    let session = answered_session("Describe it");
    let dir = store.save(&session).unwrap();

    let path = dir.join("conversation.json");
    let mut record: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    record["conversation"]["current"] = serde_json::json!(99);
    std::fs::write(&path, serde_json::to_string(&record).unwrap()).unwrap();

    assert!(matches!(
        store.load(session.id()),
        Err(ScreenerError::CorruptSession(_))
    ));
}

#[test]
fn test_store_rejects_record_id_outside_its_directory() {
    let temp_dir = TempDir::new().unwrap();
    let base = temp_dir.path().join("sessions");
    let store = SessionStore::with_dir(&base).unwrap();
    let session = answered_session("Describe it");
    let dir = store.save(&session).unwrap();

    let path = dir.join("conversation.json");
    let mut record: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    record["id"] = serde_json::json!("../escaped");
    std::fs::write(&path, serde_json::to_string(&record).unwrap()).unwrap();

    assert!(matches!(
        store.load(session.id()),
        Err(ScreenerError::CorruptSession(_))
    ));
    assert!(store.load_latest().unwrap().is_none());
    assert!(store.list().unwrap().is_empty());
    assert!(!temp_dir.path().join("escaped").exists());
}

#[test]
fn test_store_rejects_copied_session_directory() {
    let temp_dir = TempDir::new().unwrap();
    let store = SessionStore::with_dir(temp_dir.path()).unwrap();
    let session = answered_session("Describe it");
    let dir = store.save(&session).unwrap();

    let copy = temp_dir.path().join("20000101_000000_copy00");
    std::fs::create_dir_all(&copy).unwrap();
    for file in ["conversation.json", "screenshot.png"] {
        std::fs::copy(dir.join(file), copy.join(file)).unwrap();
    }

    assert!(matches!(
        store.load("20000101_000000_copy00"),
        Err(ScreenerError::CorruptSession(_))
    ));
    let ids: Vec<String> = store.list().unwrap().into_iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![session.id().to_string()]);
}

#[tokio::test]
async fn test_store_save_failure_leaves_conversation_intact() {
    let temp_dir = TempDir::new().unwrap();
    let store = SessionStore::with_dir(temp_dir.path()).unwrap();
    let session = answered_session("Describe it");
    let before = session.conversation().clone();

    // A plain file where the session directory should go.
    std::fs::write(store.session_dir(session.id()), b"in the way").unwrap();

    let (mut controller, _replies) = SessionController::new(Settings::default().build_model_client());
    controller.open(session);
    assert!(matches!(controller.save(&store), Err(ScreenerError::Io(_))));
    assert_eq!(controller.conversation().unwrap(), &before);
    assert!(!controller.is_busy());
}

#[test]
fn test_store_delete() {
    let temp_dir = TempDir::new().unwrap();
    let store = SessionStore::with_dir(temp_dir.path()).unwrap();
    let session = answered_session("Describe it");
    store.save(&session).unwrap();

    store.delete(session.id()).unwrap();
    assert!(store.list().unwrap().is_empty());
    assert!(matches!(
        store.delete(session.id()),
        Err(ScreenerError::SessionNotFound(_))
    ));
}

// ========================================================================
// Conversation Scenarios (conversation/tree.rs)
// ========================================================================

#[test]
fn test_scenario_ask_back_reask() {
    let mut conv = Conversation::new(ImageRef::new("screenshot.png", 48, 32));
    let turn = conv.ask("what is this?").unwrap().turn;
    conv.resolve(turn, Ok("a cat".into())).unwrap();
    assert_eq!(conv.current().question, "what is this?");
    assert_eq!(conv.current().answer.text(), Some("a cat"));

    assert_eq!(conv.go_back().id, TurnId::ROOT);
    let again = conv.ask("what is this?").unwrap();
    assert_eq!(again.turn, turn);
    assert_eq!(conv.children(TurnId::ROOT).count(), 1);
}

#[test]
fn test_scenario_edit_and_fork_preserves_original_answer() {
    let mut conv = Conversation::new(ImageRef::new("screenshot.png", 48, 32));
    let t = conv.ask("describe colors").unwrap().turn;
    conv.resolve(t, Ok("red and green".into())).unwrap();
    let under_t = conv.ask("which red?").unwrap().turn;
    conv.resolve(under_t, Ok("crimson".into())).unwrap();

    let t2 = conv.edit_and_fork(t, "describe shapes").unwrap().turn;
    assert_eq!(conv.current_id(), t2);
    conv.select(t).unwrap();
    assert_eq!(conv.go_forward().id, t2);
    assert_eq!(conv.get(under_t).unwrap().answer.text(), Some("crimson"));
    assert_eq!(conv.get(t).unwrap().answer.text(), Some("red and green"));
}

#[test]
fn test_scenario_timeout_marker_survives_serialization() {
    let mut conv = Conversation::new(ImageRef::new("screenshot.png", 48, 32));
    let turn = conv.ask("read the log").unwrap().turn;
    conv.resolve(turn, Err(ModelError::Timeout { seconds: 180 })).unwrap();

    let json = serde_json::to_string(&conv.snapshot()).unwrap();
    assert!(json.contains("\"failed\""));
    let mut restored = Conversation::restore(serde_json::from_str(&json).unwrap()).unwrap();

    restored.go_back();
    let retry = restored.ask("read the log").unwrap();
    assert_eq!(retry.turn, turn);
    assert!(retry.needs_answer);
    restored.resolve(turn, Ok("disk full".into())).unwrap();
    assert_eq!(restored.current().answer.text(), Some("disk full"));
    assert_eq!(restored.len(), 2);
}

// ========================================================================
// Ollama Client Tests (llm/ollama.rs) against a local fake server
// ========================================================================

mod fake_ollama {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
                let len = headers
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= pos + 4 + len {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Serves one response and yields the raw request it received.
    pub async fn serve_once(status: u16, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {} OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            request
        });
        (format!("http://{}", addr), handle)
    }

    /// Accepts a connection and never answers.
    pub async fn serve_silence() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            drop(socket);
        });
        format!("http://{}", addr)
    }
}

fn request(prompt: &str) -> GenerateRequest {
    GenerateRequest::initial(Arc::new(image(16, 16)), prompt)
}

#[tokio::test]
async fn test_ollama_generate_sends_image_and_prompt() {
    let (base_url, server) =
        fake_ollama::serve_once(200, r#"{"model":"gemma3:4b","response":"A cat","done":true}"#).await;
    let client = OllamaClient::new("gemma3:4b").with_base_url(base_url);

    let answer = client.generate(&request("Describe it")).await.unwrap();
    assert_eq!(answer, "A cat");

    let raw = server.await.unwrap();
    assert!(raw.starts_with("POST /api/generate"));
    let body = &raw[raw.find("\r\n\r\n").unwrap() + 4..];
    let json: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(json["model"], "gemma3:4b");
    assert_eq!(json["prompt"], "Describe it");
    assert_eq!(json["stream"], false);
    assert_eq!(json["images"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_ollama_server_error_detail() {
    let (base_url, _server) =
        fake_ollama::serve_once(404, r#"{"error":"model 'nope' not found"}"#).await;
    let client = OllamaClient::new("nope").with_base_url(base_url);

    let err = client.generate(&request("Describe it")).await.unwrap_err();
    assert_eq!(
        err,
        ModelError::ServerError {
            status: 404,
            detail: "model 'nope' not found".into()
        }
    );
}

#[tokio::test]
async fn test_ollama_timeout() {
    let base_url = fake_ollama::serve_silence().await;
    let client = OllamaClient::default()
        .with_base_url(base_url)
        .with_timeout(std::time::Duration::from_secs(1));

    let err = client.generate(&request("Describe it")).await.unwrap_err();
    assert_eq!(err, ModelError::Timeout { seconds: 1 });
}

#[tokio::test]
async fn test_ollama_unreachable() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let client = OllamaClient::default().with_base_url(format!("http://127.0.0.1:{}", port));

    let err = client.generate(&request("Describe it")).await.unwrap_err();
    assert!(matches!(err, ModelError::Unreachable { .. }));
}

#[tokio::test]
async fn test_discovery_lists_models_and_pings() {
    let (base_url, server) = fake_ollama::serve_once(
        200,
        r#"{"models":[{"name":"gemma3:4b","size":1},{"name":"llava:latest","size":2}]}"#,
    )
    .await;
    let models = LocalDiscovery::list_models(&base_url, std::time::Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(models, vec!["gemma3:4b".to_string(), "llava:latest".to_string()]);
    assert!(server.await.unwrap().starts_with("GET /api/tags"));

    let (base_url, _server) = fake_ollama::serve_once(500, "{}").await;
    let status = LocalDiscovery::ping(&base_url, std::time::Duration::from_secs(5)).await;
    assert_eq!(status, PingStatus::HttpError(500));
}

// ========================================================================
// Controller + Store end to end
// ========================================================================

#[tokio::test]
async fn test_controller_session_saved_after_reply() {
    let (base_url, _server) =
        fake_ollama::serve_once(200, r#"{"response":"A bar chart","done":true}"#).await;
    let temp_dir = TempDir::new().unwrap();
    let mut settings = Settings::default();
    settings.ollama.base_url = base_url;
    settings.storage.sessions_dir = Some(temp_dir.path().to_path_buf());

    let store = SessionStore::with_dir(settings.sessions_dir()).unwrap();
    let (mut controller, mut replies) = SessionController::new(settings.build_model_client());
    let session = Session::start(image(40, 40), "Describe it").unwrap();
    let id = session.id().to_string();
    controller.start(session).unwrap();

    let outcome = controller.wait_for_reply(&mut replies).await.unwrap();
    assert_eq!(outcome, ReplyOutcome::Applied { turn: TurnId::ROOT, answered: true });
    controller.save(&store).unwrap();

    let reopened = store.load_latest().unwrap().unwrap();
    assert_eq!(reopened.id(), id);
    assert_eq!(reopened.model(), Some("gemma3:4b"));
    assert_eq!(reopened.conversation().root().answer.text(), Some("A bar chart"));
}
