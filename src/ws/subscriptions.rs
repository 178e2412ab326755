use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::{response::IntoResponse, routing::get, Router};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{error::Result, model::device::DeviceOwnerRecord, state::AppState};

const SEND_TIMEOUT_SECS: u64 = 5;

/// Which owner records a subscriber receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionFilter {
    User(String),
    Device(String),
}

impl SubscriptionFilter {
    pub fn matches(&self, owner: &DeviceOwnerRecord) -> bool {
        match self {
            SubscriptionFilter::User(user_id) => owner.user_id == *user_id,
            SubscriptionFilter::Device(device_uuid) => owner.device(device_uuid).is_some(),
        }
    }
}

// ------------------------------------------------------------
// ROUTER
// ------------------------------------------------------------
pub fn subscription_router() -> Router<AppState> {
    Router::new()
        .route(
            "/internal/device-details/subscribe/by-user/{user_id}",
            get(subscribe_by_user),
        )
        .route(
            "/internal/device-details/subscribe/by-device/{device_uuid}",
            get(subscribe_by_device),
        )
}

async fn subscribe_by_user(
    ws: WebSocketUpgrade,
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, SubscriptionFilter::User(user_id)))
}

async fn subscribe_by_device(
    ws: WebSocketUpgrade,
    Path(device_uuid): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        handle_socket(socket, state, SubscriptionFilter::Device(device_uuid))
    })
}

async fn initial_snapshot(
    state: &AppState,
    filter: &SubscriptionFilter,
) -> Result<Option<DeviceOwnerRecord>> {
    match filter {
        SubscriptionFilter::User(user_id) => state.db.find_by_user(user_id).await,
        SubscriptionFilter::Device(device_uuid) => state.db.find_by_device_uuid(device_uuid).await,
    }
}

// ------------------------------------------------------------
// WEBSOCKET HANDLER (SPLIT SOCKET)
// ------------------------------------------------------------
async fn handle_socket(socket: WebSocket, state: AppState, filter: SubscriptionFilter) {
    let conn_id = Uuid::new_v4();
    let (mut ws_sender, mut receiver) = socket.split();

    // Subscribe before reading the snapshot so no write falls in between.
    let mut changes = state.db.subscribe();
    let (tx, mut rx) = mpsc::channel::<WsMessage>(32);

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match timeout(Duration::from_secs(SEND_TIMEOUT_SECS), ws_sender.send(msg)).await {
                Ok(Ok(_)) => {}
                Ok(Err(_)) => break,
                Err(_) => continue,
            }
        }
    });

    info!(%conn_id, ?filter, "subscription opened");

    match initial_snapshot(&state, &filter).await {
        Ok(Some(owner)) => {
            if send_owner(&tx, &owner).await.is_err() {
                writer.abort();
                return;
            }
        }
        Ok(None) => {}
        Err(err) => {
            warn!(%conn_id, error = %err, "failed to load subscription snapshot");
            let _ = tx.send(WsMessage::Close(None)).await;
            drop(tx);
            let _ = writer.await;
            return;
        }
    }

    loop {
        tokio::select! {
            change = changes.recv() => match change {
                Ok(owner) if filter.matches(&owner) => {
                    if send_owner(&tx, &owner).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(%conn_id, skipped, "subscriber lagged; updates dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!(%conn_id, "subscription closed");
    drop(tx);
    let _ = writer.await;
}

async fn send_owner(
    tx: &mpsc::Sender<WsMessage>,
    owner: &DeviceOwnerRecord,
) -> anyhow::Result<()> {
    let text = serde_json::to_string(owner)?;
    tx.send(WsMessage::Text(text.into())).await?;
    Ok(())
}
