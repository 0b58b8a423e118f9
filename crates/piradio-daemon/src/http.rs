//! Minimal HTTP remote control.
//!
//! `GET /<token>` posts a web-allowed command token and, once the control loop
//! has applied it, renders the status page.  Any other path just renders the
//! page.  `/images/*` is served from the assets directory.
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::Uri;
use axum::response::Html;
use axum::Router;
use piradio_proto::protocol::{Command, PlaybackState, RadioStatus};
use piradio_proto::state::StatusBoard;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::mailbox::{Delivery, Mailbox, Origin};

/// Upper bound on how long a request waits for its command to be applied.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(3);

const PAGE_LINKS: &[(&str, &str)] = &[
    ("/", "update page"),
    ("/f", "favourite toggle"),
    ("/F", "list favourites"),
    ("/m", "change mode"),
    ("/p", "play/stop"),
    ("/d", "down a channel"),
    ("/u", "up a channel"),
    ("/s", "speak channel name"),
    ("/S", "speak next channel name"),
    ("/t", "speak time"),
];

#[derive(Clone)]
struct HttpState {
    board: Arc<StatusBoard>,
    mailbox: Mailbox,
}

pub fn router(board: Arc<StatusBoard>, mailbox: Mailbox, assets_dir: &Path) -> Router {
    Router::new()
        .nest_service("/images", ServeDir::new(assets_dir))
        .fallback(remote_control)
        .with_state(HttpState { board, mailbox })
        .layer(TraceLayer::new_for_http())
}

pub fn start_server(
    bind_address: &str,
    port: u16,
    board: Arc<StatusBoard>,
    mailbox: Mailbox,
    assets_dir: &Path,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let app = router(board, mailbox, assets_dir);
    let addr = format!("{}:{}", bind_address, port);

    tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                warn!("Failed to bind remote control on {}: {}", addr, e);
                return;
            }
        };
        info!("Remote control listening on http://{}", addr);
        let shutdown = async move { cancel.cancelled().await };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            warn!("Remote control error: {}", e);
        }
        info!("Remote control stopped");
    })
}

// ── handler ───────────────────────────────────────────────────────────────────

async fn remote_control(State(state): State<HttpState>, uri: Uri) -> Html<String> {
    if let Some(token) = command_token(uri.path()) {
        match state
            .mailbox
            .post_and_wait(token, Origin::Http, ACK_TIMEOUT)
            .await
        {
            Delivery::Applied => {}
            Delivery::TimedOut => warn!("Remote control: {:?} not applied within {:?}", token, ACK_TIMEOUT),
            Delivery::Dropped => debug!("Remote control: {:?} dropped", token),
        }
    }
    Html(render_status_page(&state.board.get_state().await))
}

/// The web command named by the first path segment, if any.
pub fn command_token(path: &str) -> Option<char> {
    let segment = path.trim_start_matches('/').split('/').next()?;
    let mut chars = segment.chars();
    let token = chars.next()?;
    if chars.next().is_some() || !Command::is_web_token(token) {
        return None;
    }
    Some(token)
}

pub fn render_status_page(status: &RadioStatus) -> String {
    let mut report = format!("radio mode: {}\n", status.mode.label());
    if !status.playback.is_idle() {
        let name = escape_html(status.now_playing.as_deref().unwrap_or_default());
        if status.playback.state == PlaybackState::Stopping {
            report.push_str(&format!("playing: {} but stopping soon\n", name));
        } else {
            report.push_str(&format!("playing: {}\n", name));
        }
    }
    if let Some(next) = &status.future {
        report.push_str(&format!("playing next: {}\n", escape_html(next)));
    }

    let mut links = String::new();
    for (href, label) in PAGE_LINKS {
        links.push_str(&format!("<a href='{}'>{}</a>\n<br />\n", href, label));
    }

    format!(
        "<html>\n<head>\n    <title>piradio</title>\n    \
         <link rel=\"shortcut icon\" type=\"image/png\" href=\"/images/favicon.png\"/>\n\
         </head>\n<body>\n<h1>piradio</h1>\n\
         <b>Status</b><pre>{}</pre>\n{}</body>\n</html>\n",
        report, links
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
