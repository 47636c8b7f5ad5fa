//! Comm delivery between devices.
//!
//! A comm is written into the recipient's inbox on the shared store and picked
//! up by the recipient's inbox pump. When the admin also plays the Baron, the
//! two halves of the same device talk through an in-process channel instead.

use std::sync::{Arc, Weak};

use dashmap::DashSet;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, warn};

use crate::{
    dao::{
        client::{StoreClient, decode_snapshot},
        models::{CommState, GameCommEntity, comm_timestamp},
        path::{RoomPaths, StorePath},
        room_store::{Snapshot, Subscription},
    },
    dto::comm::GameComm,
    error::ServiceError,
    state::SharedContext,
};

/// How a comm reached its handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommOrigin {
    /// Read from an inbox on the store; acknowledged there once handled.
    Store,
    /// Handed over in-process; there is nothing to acknowledge.
    InProcess,
}

/// Outbound path to one recipient.
pub trait Transport: Send + Sync {
    /// Hand `comm` to the recipient.
    fn deliver(&self, comm: GameComm) -> BoxFuture<'static, Result<(), ServiceError>>;
}

/// Writes comms into an inbox on the store.
#[derive(Clone)]
pub struct StoreTransport {
    client: StoreClient,
    inbox: StorePath,
}

impl StoreTransport {
    /// Transport writing into `inbox`.
    pub fn new(client: StoreClient, inbox: StorePath) -> Self {
        Self { client, inbox }
    }

    /// Transport into the admin's inbox of `paths`' room.
    pub fn to_admin(client: StoreClient, paths: &RoomPaths) -> Self {
        Self::new(client, paths.admin_inbox())
    }

    /// Transport into `uid`'s inbox of `paths`' room.
    pub fn to_participant(client: StoreClient, paths: &RoomPaths, uid: &str) -> Self {
        Self::new(client, paths.participant_inbox(uid))
    }
}

impl Transport for StoreTransport {
    fn deliver(&self, comm: GameComm) -> BoxFuture<'static, Result<(), ServiceError>> {
        let client = self.client.clone();
        let path = self.inbox.child(comm.id.as_str());
        Box::pin(async move {
            let entity = comm.to_entity()?;
            client.set(&path, &entity).await?;
            debug!(path = %path, comm = %comm.message, "comm sent");
            Ok(())
        })
    }
}

/// Hands comms to a handler living in the same process.
#[derive(Debug, Clone)]
pub struct InProcessTransport {
    tx: mpsc::UnboundedSender<GameComm>,
}

impl Transport for InProcessTransport {
    fn deliver(&self, comm: GameComm) -> BoxFuture<'static, Result<(), ServiceError>> {
        let sent = self.tx.send(comm).map_err(|err| {
            ServiceError::InvalidState(format!("in-process peer is gone; dropped comm {}", err.0.id))
        });
        Box::pin(async move { sent })
    }
}

/// Connected in-process transport and the receiving end to pump.
pub fn in_process_link() -> (InProcessTransport, mpsc::UnboundedReceiver<GameComm>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (InProcessTransport { tx }, rx)
}

/// Tracks which comms a device already took on, so a redelivered inbox does
/// not trigger the same handling twice.
#[derive(Debug, Default)]
pub struct CommInbox {
    claimed: DashSet<String>,
}

impl CommInbox {
    /// Inbox with nothing claimed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `comm_id`; `false` when it was claimed before.
    pub fn claim(&self, comm_id: &str) -> bool {
        self.claimed.insert(comm_id.to_owned())
    }

    /// Forget every claim, ahead of a new game.
    pub fn reset(&self) {
        self.claimed.clear();
    }

    /// Pick the waiting, unclaimed comms of an inbox delivery in send order.
    ///
    /// Entries that fail to decode are logged and skipped for good.
    pub fn claim_waiting(&self, inbox: &StorePath, snapshot: Snapshot) -> Vec<GameComm> {
        let entries = match decode_snapshot::<Map<String, Value>>(inbox, snapshot) {
            Ok(entries) => entries.unwrap_or_default(),
            Err(err) => {
                warn!(path = %inbox, error = %err, "unreadable inbox");
                return Vec::new();
            }
        };

        let mut waiting: Vec<(String, Value)> = entries
            .into_iter()
            .filter(|(_, value)| {
                value.get("commState").and_then(Value::as_str) == Some("waiting")
            })
            .filter(|(id, _)| self.claim(id))
            .collect();
        waiting.sort_by(|(a, _), (b, _)| {
            comm_timestamp(a)
                .cmp(&comm_timestamp(b))
                .then_with(|| a.cmp(b))
        });

        waiting
            .into_iter()
            .filter_map(|(id, value)| {
                let decoded = serde_json::from_value::<GameCommEntity>(value)
                    .map_err(|err| ServiceError::InvalidInput(err.to_string()))
                    .and_then(|entity| {
                        GameComm::try_from(GameCommEntity {
                            id: id.clone(),
                            ..entity
                        })
                    });
                match decoded {
                    Ok(comm) => Some(comm),
                    Err(err) => {
                        warn!(path = %inbox, comm_id = %id, error = %err, "skipping malformed comm");
                        None
                    }
                }
            })
            .collect()
    }
}

/// Receiving side of a device role.
pub trait CommHandler: Send + Sync + 'static {
    /// Handle one comm to completion.
    fn handle_comm(&self, comm: GameComm, origin: CommOrigin) -> BoxFuture<'_, ()>;
}

/// Flag a handled comm as processed in its inbox.
pub async fn mark_processed(
    client: &StoreClient,
    inbox: &StorePath,
    comm_id: &str,
) -> Result<(), ServiceError> {
    let path = inbox.child(comm_id).child("commState");
    client.set(&path, &CommState::Processed).await?;
    Ok(())
}

/// Remove the admin inbox and the inbox of every listed participant. Each
/// removal is attempted even when another one fails.
pub async fn clear_room_comms(ctx: &SharedContext, room_id: &str, uids: &[String]) {
    let paths = RoomPaths::new(room_id);
    let client = ctx.client();
    if let Err(err) = client.remove(&paths.admin_inbox()).await {
        warn!(room_id, error = %err, "failed to clear admin inbox");
    }
    for uid in uids {
        if let Err(err) = client.remove(&paths.participant_comms(uid)).await {
            warn!(room_id, uid = %uid, error = %err, "failed to clear participant inbox");
        }
    }
    debug!(room_id, participants = uids.len(), "room comms cleared");
}

async fn next_delivery(subscription: &mut Option<Subscription>) -> Option<Snapshot> {
    match subscription {
        Some(subscription) => subscription.latest().await,
        None => std::future::pending().await,
    }
}

async fn next_local(local: &mut Option<mpsc::UnboundedReceiver<GameComm>>) -> Option<GameComm> {
    match local {
        Some(local) => local.recv().await,
        None => std::future::pending().await,
    }
}

/// Run `handler` over an inbox subscription and an optional in-process link.
///
/// Comms are handled one at a time. The task only holds a weak reference to
/// the handler and stops once the handler is dropped or the store subscription
/// ends.
pub fn spawn_comm_pump<H: CommHandler>(
    handler: Weak<H>,
    inbox: Arc<CommInbox>,
    inbox_path: StorePath,
    subscription: Option<Subscription>,
    local: Option<mpsc::UnboundedReceiver<GameComm>>,
) -> JoinHandle<()> {
    let mut subscription = subscription;
    let mut local = local;
    tokio::spawn(async move {
        loop {
            let batch = tokio::select! {
                delivery = next_delivery(&mut subscription) => match delivery {
                    Some(snapshot) => inbox
                        .claim_waiting(&inbox_path, snapshot)
                        .into_iter()
                        .map(|comm| (comm, CommOrigin::Store))
                        .collect(),
                    None => break,
                },
                comm = next_local(&mut local) => match comm {
                    Some(comm) if inbox.claim(&comm.id) => vec![(comm, CommOrigin::InProcess)],
                    Some(_) => Vec::new(),
                    None => {
                        local = None;
                        Vec::new()
                    }
                },
            };

            for (comm, origin) in batch {
                let Some(handler) = handler.upgrade() else {
                    return;
                };
                handler.handle_comm(comm, origin).await;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::sync::Mutex;

    use super::*;
    use crate::{
        dao::room_store::memory::{MemoryRoomStore, OpenAccess},
        dto::comm::{CommMessage, RequestMcqQuestion, VerifyBaronCode},
        identity::AnonymousIdentity,
    };

    fn inbox_path() -> StorePath {
        RoomPaths::new("r1").admin_inbox()
    }

    fn entry(kind: &str, message: Value, state: &str) -> Value {
        json!({"id": "ignored", "commType": kind, "commMessage": message, "commState": state})
    }

    #[test]
    fn claims_waiting_comms_once_in_send_order() {
        let inbox = CommInbox::new();
        let snapshot = json!({
            "20_u1": entry("VERIFY_BARON_CODE", json!({"baronCode": "abcde"}), "waiting"),
            "3_u2": entry("REQUEST_MCQ_QUESTION", json!({"fireUserUid": "u2"}), "waiting"),
            "5_u3": entry("REQUEST_MCQ_QUESTION", json!({"fireUserUid": "u3"}), "processed"),
            "7_u4": entry("VERIFY_BARON_CODE", json!({"fireUserUid": "u4"}), "waiting"),
        });

        let first = inbox.claim_waiting(&inbox_path(), Some(snapshot.clone()));
        let ids: Vec<_> = first.iter().map(|comm| comm.id.as_str()).collect();
        assert_eq!(ids, ["3_u2", "20_u1"]);
        assert_eq!(
            first[1].message,
            CommMessage::VerifyBaronCode(VerifyBaronCode {
                baron_code: "abcde".into()
            })
        );

        assert!(inbox.claim_waiting(&inbox_path(), Some(snapshot)).is_empty());
        assert!(inbox.claim_waiting(&inbox_path(), None).is_empty());
    }

    struct Recorder {
        seen: Mutex<Vec<(String, CommOrigin)>>,
    }

    impl CommHandler for Recorder {
        fn handle_comm(&self, comm: GameComm, origin: CommOrigin) -> BoxFuture<'_, ()> {
            Box::pin(async move {
                self.seen.lock().await.push((comm.id, origin));
            })
        }
    }

    #[tokio::test]
    async fn pump_merges_store_and_in_process_comms() {
        let store = MemoryRoomStore::with_policy(Arc::new(OpenAccess));
        let client = StoreClient::new(
            Arc::new(store.clone()),
            Arc::new(AnonymousIdentity::with_id("u1")),
        );
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        let subscription = client.subscribe(&inbox_path()).await.unwrap();
        let (link, rx) = in_process_link();
        let pump = spawn_comm_pump(
            Arc::downgrade(&recorder),
            Arc::new(CommInbox::new()),
            inbox_path(),
            Some(subscription),
            Some(rx),
        );

        let request = CommMessage::RequestMcqQuestion(RequestMcqQuestion {
            fire_user_uid: "u1".into(),
        });
        StoreTransport::new(client.clone(), inbox_path())
            .deliver(GameComm::new("1_u1".into(), request.clone()))
            .await
            .unwrap();
        link.deliver(GameComm::new("2_u1".into(), request.clone()))
            .await
            .unwrap();
        // Redelivering a claimed id is ignored.
        link.deliver(GameComm::new("2_u1".into(), request))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while recorder.seen.lock().await.len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let seen = recorder.seen.lock().await.clone();
        assert_eq!(seen.len(), 2);
        assert!(seen.contains(&("1_u1".to_owned(), CommOrigin::Store)));
        assert!(seen.contains(&("2_u1".to_owned(), CommOrigin::InProcess)));

        mark_processed(&client, &inbox_path(), "1_u1").await.unwrap();
        let state: CommState = client
            .get(&inbox_path().child("1_u1").child("commState"))
            .await
            .unwrap();
        assert_eq!(state, CommState::Processed);
        pump.abort();
    }

    #[tokio::test]
    async fn dropped_peer_surfaces_as_error() {
        let (link, rx) = in_process_link();
        drop(rx);
        let comm = GameComm::new(
            "1_x".into(),
            CommMessage::RequestMcqQuestion(RequestMcqQuestion {
                fire_user_uid: "x".into(),
            }),
        );
        assert!(link.deliver(comm).await.is_err());
    }
}
