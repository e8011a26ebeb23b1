//! WebSocket bridge between editor views and the controller.

use crate::controller::Controller;
use crate::machine::Machine;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use sicide_core::protocol::{ClientMessage, ServerMessage};
use sicide_core::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

const REPLY_CAPACITY: usize = 16;

pub fn router<M: Machine>(controller: Arc<Controller<M>>, static_dir: &Path) -> Router {
    Router::new()
        .route("/ws", get(ws_handler::<M>))
        .nest_service("/", ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(controller)
}

async fn ws_handler<M: Machine>(
    ws: WebSocketUpgrade,
    State(controller): State<Arc<Controller<M>>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, controller))
}

async fn send(socket: &mut WebSocket, message: &ServerMessage) -> bool {
    match serde_json::to_string(message) {
        Ok(json) => socket.send(Message::Text(json)).await.is_ok(),
        Err(err) => {
            warn!(error = %err, "cannot encode server message");
            true
        }
    }
}

async fn handle_socket<M: Machine>(mut socket: WebSocket, controller: Arc<Controller<M>>) {
    let mut rx = controller.subscribe();
    // replies of detached requests for this view only
    let (reply_tx, mut reply_rx) = mpsc::channel::<ServerMessage>(REPLY_CAPACITY);
    info!("view connected");

    for message in controller.snapshot() {
        if !send(&mut socket, &message).await {
            return;
        }
    }

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        debug!(error = %err, "socket error");
                        break;
                    }
                };
                let request = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(request) => request,
                    Err(err) => {
                        let rejected = ServerMessage::Rejected {
                            action: "parse".into(),
                            reason: err.to_string(),
                        };
                        if !send(&mut socket, &rejected).await {
                            break;
                        }
                        continue;
                    }
                };
                let replies = dispatch(&controller, request, &reply_tx).await;
                for reply in replies {
                    if !send(&mut socket, &reply).await {
                        return;
                    }
                }
            }
            Some(reply) = reply_rx.recv() => {
                if !send(&mut socket, &reply).await {
                    break;
                }
            }
            event = rx.recv() => {
                match event {
                    Ok(message) => {
                        if !send(&mut socket, &message).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // resynchronise with a full snapshot
                        warn!(skipped, "view fell behind");
                        for message in controller.snapshot() {
                            if !send(&mut socket, &message).await {
                                return;
                            }
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }
    info!("view disconnected");
}

/// Runs one request; the returned messages go to the requesting view only.
/// Everything else reaches views through the event channel.
async fn dispatch<M: Machine>(
    controller: &Arc<Controller<M>>,
    request: ClientMessage,
    replies: &mpsc::Sender<ServerMessage>,
) -> Vec<ServerMessage> {
    let action = request.action();
    debug!(action, "view request");
    let result: Result<Vec<ServerMessage>> = match request {
        ClientMessage::Run => controller.run().await.map(|_| vec![]),
        ClientMessage::Step => controller.step().await.map(|_| vec![]),
        // pause/stop run detached so a slow step never blocks this socket
        ClientMessage::Pause => {
            let controller = Arc::clone(controller);
            spawn_reporting(action, replies.clone(), async move { controller.pause().await });
            Ok(vec![])
        }
        ClientMessage::Stop => {
            let controller = Arc::clone(controller);
            spawn_reporting(action, replies.clone(), async move { controller.stop().await });
            Ok(vec![])
        }
        ClientMessage::ToggleBreakpoint { file, row } => {
            controller.toggle_breakpoint(&file, row);
            Ok(vec![])
        }
        ClientMessage::SelectListing { file } => {
            if controller.select_listing(&file) {
                Ok(vec![])
            } else {
                Ok(vec![ServerMessage::Rejected {
                    action: action.into(),
                    reason: format!("no listing for {file}"),
                }])
            }
        }
        ClientMessage::SetDelay { ms } => controller.set_delay(ms).map(|_| vec![]),
        ClientMessage::SetMemoryWindow { start, end } => {
            controller.set_memory_window(start, end).await.map(|_| vec![])
        }
        ClientMessage::SyntaxCheck { texts, file_names } => {
            controller.check_syntax(texts, file_names).await.map(|_| vec![])
        }
        ClientMessage::QueryState => Ok(controller.snapshot()),
    };

    result.unwrap_or_else(|err| vec![rejected(action, &err)])
}

fn rejected(action: &'static str, err: &Error) -> ServerMessage {
    info!(action, reason = %err, "request rejected");
    ServerMessage::Rejected {
        action: action.into(),
        reason: err.to_string(),
    }
}

/// Runs `task` detached; a failure goes back to the requesting view.
fn spawn_reporting<F>(action: &'static str, replies: mpsc::Sender<ServerMessage>, task: F)
where
    F: std::future::Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(err) = task.await {
            // the view may have disconnected meanwhile
            let _ = replies.send(rejected(action, &err)).await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ControllerSettings;
    use pretty_assertions::assert_eq;
    use sicide_core::wire::SyntaxFileResult;
    use sicide_core::{
        ExecutionState, LoadOutcome, LoadRequest, MachineMode, MemoryWindow,
        RegisterSnapshot,
    };

    struct Offline;

    impl Machine for Offline {
        async fn begin(&self, _mode: MachineMode) -> Result<()> {
            Err(Error::RemoteUnavailable("offline".into()))
        }

        async fn load(&self, _request: &LoadRequest) -> Result<LoadOutcome> {
            Err(Error::Transport("offline".into()))
        }

        async fn step(&self) -> Result<RegisterSnapshot> {
            Err(Error::Transport("offline".into()))
        }

        async fn memory(&self, _start: u32, _end: u32) -> Result<Vec<u8>> {
            Err(Error::Transport("offline".into()))
        }

        async fn syntax_check(
            &self,
            _texts: Vec<String>,
            _file_names: Vec<String>,
        ) -> Result<Vec<SyntaxFileResult>> {
            Ok(vec![])
        }
    }

    fn controller() -> Arc<Controller<Offline>> {
        let settings = ControllerSettings {
            mode: MachineMode::Sicxe,
            request: LoadRequest::default(),
            delay_ms: 0.0,
            project_root: None,
            memory: MemoryWindow::new(0, 15).unwrap(),
        };
        Arc::new(Controller::new(Offline, settings).unwrap())
    }

    fn reply_channel() -> (mpsc::Sender<ServerMessage>, mpsc::Receiver<ServerMessage>) {
        mpsc::channel(REPLY_CAPACITY)
    }

    #[tokio::test]
    async fn detached_pause_rejection_reaches_the_requester() {
        let ctl = controller();
        let (tx, mut rx) = reply_channel();
        let immediate = dispatch(&ctl, ClientMessage::Pause, &tx).await;
        assert!(immediate.is_empty());

        let reply = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert_eq!(
            reply,
            Some(ServerMessage::Rejected {
                action: "pause".into(),
                reason: Error::InvalidTransition {
                    state: "idle",
                    action: "pause"
                }
                .to_string(),
            })
        );
    }

    #[tokio::test]
    async fn failures_become_rejections() {
        let ctl = controller();
        let replies = dispatch(&ctl, ClientMessage::Run, &reply_channel().0).await;
        assert_eq!(
            replies,
            vec![ServerMessage::Rejected {
                action: "run".into(),
                reason: Error::NoProject.to_string(),
            }]
        );

        let replies = dispatch(&ctl, ClientMessage::SetDelay { ms: -1.0 }, &reply_channel().0).await;
        assert!(matches!(&replies[..], [ServerMessage::Rejected { action, .. }] if action == "set-delay"));
    }

    #[tokio::test]
    async fn query_state_answers_with_snapshot() {
        let ctl = controller();
        let replies = dispatch(&ctl, ClientMessage::QueryState, &reply_channel().0).await;
        assert_eq!(
            replies.first(),
            Some(&ServerMessage::State {
                state: ExecutionState::Idle
            })
        );
        assert_eq!(replies.len(), 6);
    }

    #[tokio::test]
    async fn unknown_listing_is_rejected() {
        let ctl = controller();
        let replies = dispatch(
            &ctl,
            ClientMessage::SelectListing {
                file: "ghost.asm".into(),
            },
            &reply_channel().0,
        )
        .await;
        assert!(matches!(&replies[..], [ServerMessage::Rejected { .. }]));
    }
}
