use actix_web::{web, App, HttpResponse, HttpServer};
use async_stream::stream;
use bytes::Bytes;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::actors::{DetectionActor, SupervisorActor};
use crate::config::CONFIG;
use crate::messages::{ClearHistory, GetMonitorStats, GetSystemHealth};
use crate::utils::event_store::{EventStore, LogEntry};

const EMPTY_LOG_PLACEHOLDER: &str = "No detections logged yet.";

/// Shared handler state. Handlers read the core through actor messages and
/// the frame broadcast; the only mutation (`/delete_history`) is routed
/// through the DetectionActor.
#[derive(Clone)]
pub struct AppState {
    pub detection: actix::Addr<DetectionActor>,
    pub supervisor: actix::Addr<SupervisorActor>,
    pub frames: broadcast::Sender<Bytes>,
    pub event_store: EventStore,
}

/// Builds and binds the HTTP server; the caller spawns the returned future
/// onto the running system.
pub fn run_server(state: AppState) -> std::io::Result<actix_web::dev::Server> {
    let data = web::Data::new(state);
    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .route("/", web::get().to(index))
            .route("/video", web::get().to(video))
            .route("/stats", web::get().to(stats))
            .route("/log", web::get().to(log))
            .route("/snapshots/{filename}", web::get().to(snapshot))
            .route("/history", web::get().to(history))
            .route("/delete_history", web::post().to(delete_history))
            .route("/health", web::get().to(health))
    })
    .bind((CONFIG.server.bind_address.as_str(), CONFIG.server.port))?
    .run();

    info!(
        "HTTP server listening on {}:{}",
        CONFIG.server.bind_address, CONFIG.server.port
    );
    Ok(server)
}

async fn index() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(INDEX_HTML)
}

/// MJPEG stream of annotated frames. Each subscriber drains its own
/// broadcast receiver; lagging consumers skip frames instead of slowing
/// the capture loop, and a dead camera stalls the stream rather than
/// erroring it.
async fn video(state: web::Data<AppState>) -> HttpResponse {
    let mut rx = state.frames.subscribe();
    let stream = stream! {
        loop {
            match rx.recv().await {
                Ok(jpeg) => {
                    let mut payload = Vec::with_capacity(jpeg.len() + 64);
                    payload.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
                    payload.extend_from_slice(&jpeg);
                    payload.extend_from_slice(b"\r\n");
                    yield Ok::<Bytes, actix_web::Error>(Bytes::from(payload));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Stream consumer lagged, skipped {} frames", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    HttpResponse::Ok()
        .append_header(("Cache-Control", "no-cache"))
        .append_header(("Content-Type", "multipart/x-mixed-replace; boundary=frame"))
        .streaming(stream)
}

async fn stats(state: web::Data<AppState>) -> HttpResponse {
    match state.detection.send(GetMonitorStats).await {
        Ok(Ok(stats)) => HttpResponse::Ok().json(json!({
            "total_drowsy": stats.total_confirmed,
        })),
        Ok(Err(err)) => {
            error!("Stats query failed: {}", err);
            HttpResponse::InternalServerError().finish()
        }
        Err(err) => {
            error!("Could not reach detection actor: {}", err);
            HttpResponse::InternalServerError().finish()
        }
    }
}

async fn log(state: web::Data<AppState>) -> HttpResponse {
    let entries = state.event_store.read_all();
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(log_text(&entries))
}

async fn snapshot(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let filename = path.into_inner();
    let Some(filename) = sanitize_snapshot_filename(&filename) else {
        return HttpResponse::NotFound().finish();
    };
    match std::fs::read(state.event_store.snapshot_path(filename)) {
        Ok(bytes) => HttpResponse::Ok().content_type("image/jpeg").body(bytes),
        Err(_) => HttpResponse::NotFound().finish(),
    }
}

async fn history(state: web::Data<AppState>) -> HttpResponse {
    let entries = state.event_store.read_all();
    let page = HISTORY_TEMPLATE.replace("{rows}", &history_rows(&entries));
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(page)
}

async fn delete_history(state: web::Data<AppState>) -> HttpResponse {
    match state.detection.send(ClearHistory).await {
        Ok(Ok(())) => info!("Detection history cleared"),
        Ok(Err(err)) => error!("History clear reported failures: {}", err),
        Err(err) => error!("Could not reach detection actor: {}", err),
    }
    HttpResponse::SeeOther()
        .append_header(("Location", "/history"))
        .finish()
}

async fn health(state: web::Data<AppState>) -> HttpResponse {
    match state.supervisor.send(GetSystemHealth).await {
        Ok(Ok(health)) => HttpResponse::Ok().json(health),
        _ => HttpResponse::InternalServerError().finish(),
    }
}

/// Plain-text dump for `/log`; a fixed placeholder when there is nothing
/// to show.
fn log_text(entries: &[LogEntry]) -> String {
    if entries.is_empty() {
        return EMPTY_LOG_PLACEHOLDER.to_string();
    }
    let mut text = String::new();
    for entry in entries {
        text.push_str(&entry.to_string());
        text.push('\n');
    }
    text
}

/// Snapshot names are flat timestamps; anything that looks like a path is
/// rejected before it reaches the filesystem.
fn sanitize_snapshot_filename(name: &str) -> Option<&str> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
        return None;
    }
    Some(name)
}

fn history_rows(entries: &[LogEntry]) -> String {
    if entries.is_empty() {
        return "<tr><td colspan='3'>No detections recorded yet.</td></tr>".to_string();
    }
    entries
        .iter()
        .map(|entry| {
            format!(
                "<tr><td>{}</td><td><img src='/snapshots/{}' height='100'></td><td>Drowsy</td></tr>",
                entry.timestamp, entry.filename
            )
        })
        .collect()
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Drowsiness Monitor</title>
    <style>
        body { font-family: 'Segoe UI', sans-serif; background: #f0f8ff; color: #333; padding: 20px; }
        .container { max-width: 800px; margin: auto; background: white; padding: 20px; border-radius: 10px; }
        img { border-radius: 10px; border: 1px solid #ccc; }
        pre { background: black; color: lime; padding: 10px; border-radius: 5px; height: 200px; overflow-y: scroll; }
    </style>
</head>
<body>
    <div class="container">
        <h1>Drowsiness Monitor</h1>
        <img src="/video" width="640" height="480"><br><br>
        <p>Total drowsy episodes: <span id="count">0</span></p>
        <h3>Detection log</h3>
        <pre id="log">Loading...</pre>
        <a href="/history">&#8594; View history</a>
    </div>
    <script>
        function refresh() {
            fetch('/log').then(r => r.text()).then(t => {
                const log = document.getElementById('log');
                log.textContent = t;
                log.scrollTop = log.scrollHeight;
            });
            fetch('/stats').then(r => r.json()).then(data => {
                document.getElementById('count').textContent = data.total_drowsy;
            });
        }
        setInterval(refresh, 3000);
        refresh();
    </script>
</body>
</html>
"#;

const HISTORY_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Detection History</title>
    <style>
        body { font-family: 'Segoe UI', sans-serif; background: #f0f8ff; color: #333; padding: 20px; }
        .container { max-width: 1000px; margin: auto; background: white; padding: 20px; border-radius: 10px; }
        table { width: 100%; border-collapse: collapse; }
        th, td { padding: 10px; text-align: center; border: 1px solid #ccc; }
        img { border-radius: 8px; }
        a { text-decoration: none; color: #007BFF; }
        button { padding: 5px 10px; font-size: 14px; cursor: pointer; }
    </style>
</head>
<body>
    <div class="container">
        <h1>Detection History</h1>
        <a href="/">&#8592; Back to monitor</a><br><br>
        <form method="POST" action="/delete_history" onsubmit="return confirm('Delete the entire detection history?');">
            <button type="submit">Clear history</button>
        </form>
        <br>
        <table>
            <tr><th>Timestamp</th><th>Snapshot</th><th>Status</th></tr>
            {rows}
        </table>
    </div>
</body>
</html>
"#;
