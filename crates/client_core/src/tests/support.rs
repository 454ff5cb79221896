//! Test doubles: a scripted in-memory gateway and an in-process items server.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use shared::{
    domain::{Item, ItemId, ItemName},
    error::ApiError,
    protocol::{
        CreateItemRequest, CreateItemResponse, ListItemsResponse, ListedItem, UpdateItemRequest,
    },
};
use tokio::{
    net::TcpListener,
    sync::{oneshot, Mutex},
};

use crate::{error::SyncError, gateway::RemoteGateway, store::EntryKey};

pub fn item(id: &str, name: &str, checked: bool) -> Item {
    Item::new(id, ItemName::parse(name).expect("name"), checked)
}

pub fn key(id: &str) -> EntryKey {
    EntryKey::Remote(ItemId::from(id))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    List,
    Create,
    SetChecked,
    Delete,
}

#[derive(Default)]
struct Script {
    items: Vec<Item>,
    created: u64,
    failures: HashMap<Op, VecDeque<SyncError>>,
    holds: HashMap<Op, VecDeque<oneshot::Receiver<()>>>,
    calls: Vec<Op>,
}

/// In-memory server model. The next call of an operation can be made to fail
/// or held open until released.
#[derive(Clone, Default)]
pub struct ScriptedGateway {
    script: Arc<Mutex<Script>>,
}

impl ScriptedGateway {
    pub fn with_items(items: Vec<Item>) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                items,
                ..Script::default()
            })),
        }
    }

    pub async fn fail_next(&self, op: Op, error: SyncError) {
        self.script
            .lock()
            .await
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Holds the next call of `op` until the returned sender fires (or drops).
    pub async fn hold_next(&self, op: Op) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.script
            .lock()
            .await
            .holds
            .entry(op)
            .or_default()
            .push_back(rx);
        tx
    }

    pub async fn calls(&self, op: Op) -> usize {
        self.script
            .lock()
            .await
            .calls
            .iter()
            .filter(|call| **call == op)
            .count()
    }

    pub async fn server_items(&self) -> Vec<Item> {
        self.script.lock().await.items.clone()
    }

    pub async fn push_server_item(&self, item: Item) {
        self.script.lock().await.items.push(item);
    }

    pub async fn remove_server_item(&self, id: &str) {
        self.script
            .lock()
            .await
            .items
            .retain(|item| item.id.as_str() != id);
    }

    async fn enter(&self, op: Op) -> Result<(), SyncError> {
        let hold = {
            let mut script = self.script.lock().await;
            script.calls.push(op);
            script.holds.get_mut(&op).and_then(VecDeque::pop_front)
        };
        if let Some(hold) = hold {
            let _ = hold.await;
        }
        let failure = self
            .script
            .lock()
            .await
            .failures
            .get_mut(&op)
            .and_then(VecDeque::pop_front);
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteGateway for ScriptedGateway {
    /// Reads the server state before any hold, like a response already on
    /// the wire.
    async fn list(&self) -> Result<Vec<Item>, SyncError> {
        let items = self.server_items().await;
        self.enter(Op::List).await?;
        Ok(items)
    }

    async fn create(&self, name: &ItemName) -> Result<Item, SyncError> {
        self.enter(Op::Create).await?;
        let mut script = self.script.lock().await;
        script.created += 1;
        let item = Item::new(format!("{}", 100 + script.created), name.clone(), false);
        if !script.items.iter().any(|existing| existing.id == item.id) {
            script.items.push(item.clone());
        }
        Ok(item)
    }

    async fn set_checked(&self, id: &ItemId, checked: bool) -> Result<(), SyncError> {
        self.enter(Op::SetChecked).await?;
        let mut script = self.script.lock().await;
        let item = script
            .items
            .iter_mut()
            .find(|item| &item.id == id)
            .ok_or_else(|| SyncError::NotFound(format!("item {id}")))?;
        item.checked = checked;
        Ok(())
    }

    async fn delete(&self, id: &ItemId) -> Result<(), SyncError> {
        self.enter(Op::Delete).await?;
        let mut script = self.script.lock().await;
        let before = script.items.len();
        script.items.retain(|item| &item.id != id);
        if script.items.len() == before {
            return Err(SyncError::NotFound(format!("item {id}")));
        }
        Ok(())
    }
}

type HandlerError = (StatusCode, Json<ApiError>);

/// State of the in-process items server. Names are stored unvalidated, as the
/// real server accepts blank ones.
#[derive(Clone, Default)]
pub struct ItemsServer {
    items: Arc<Mutex<Vec<ListedItem>>>,
    fail_with: Arc<Mutex<Option<StatusCode>>>,
}

impl ItemsServer {
    /// Stored items that have a valid name.
    pub async fn items(&self) -> Vec<Item> {
        self.items
            .lock()
            .await
            .iter()
            .cloned()
            .filter_map(|listed| Item::try_from(listed).ok())
            .collect()
    }

    pub async fn push_listed(&self, listed: ListedItem) {
        self.items.lock().await.push(listed);
    }

    pub async fn fail_with(&self, status: Option<StatusCode>) {
        *self.fail_with.lock().await = status;
    }

    async fn injected_failure(&self) -> Result<(), HandlerError> {
        match *self.fail_with.lock().await {
            Some(status) => Err((status, Json(ApiError::new("injected failure")))),
            None => Ok(()),
        }
    }
}

fn not_found() -> HandlerError {
    (StatusCode::NOT_FOUND, Json(ApiError::new("Item not found")))
}

async fn list_items(
    State(server): State<ItemsServer>,
) -> Result<Json<ListItemsResponse>, HandlerError> {
    server.injected_failure().await?;
    Ok(Json(ListItemsResponse {
        items: server.items.lock().await.clone(),
    }))
}

async fn create_item(
    State(server): State<ItemsServer>,
    Json(req): Json<CreateItemRequest>,
) -> Result<(StatusCode, Json<CreateItemResponse>), HandlerError> {
    server.injected_failure().await?;
    let id = ItemId(uuid::Uuid::new_v4().to_string());
    server.items.lock().await.push(ListedItem {
        id: id.clone(),
        name: req.name.into(),
        checked: false,
    });
    Ok((
        StatusCode::CREATED,
        Json(CreateItemResponse {
            id,
            name: None,
            checked: None,
        }),
    ))
}

async fn update_item(
    State(server): State<ItemsServer>,
    Path(id): Path<String>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<StatusCode, HandlerError> {
    server.injected_failure().await?;
    if req.name.is_none() && req.checked.is_none() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError::new(
                "At least one field (name or checked) must be provided",
            )),
        ));
    }
    let mut items = server.items.lock().await;
    let item = items
        .iter_mut()
        .find(|item| item.id.as_str() == id)
        .ok_or_else(not_found)?;
    if let Some(name) = req.name {
        item.name = name.into();
    }
    if let Some(checked) = req.checked {
        item.checked = checked;
    }
    Ok(StatusCode::OK)
}

async fn delete_item(
    State(server): State<ItemsServer>,
    Path(id): Path<String>,
) -> Result<StatusCode, HandlerError> {
    server.injected_failure().await?;
    let mut items = server.items.lock().await;
    let before = items.len();
    items.retain(|item| item.id.as_str() != id);
    if items.len() == before {
        return Err(not_found());
    }
    Ok(StatusCode::OK)
}

pub async fn spawn_items_server(seed: Vec<Item>) -> (String, ItemsServer) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let server = ItemsServer {
        items: Arc::new(Mutex::new(seed.into_iter().map(ListedItem::from).collect())),
        fail_with: Arc::new(Mutex::new(None)),
    };
    let app = Router::new()
        .route("/api/items", get(list_items).post(create_item))
        .route("/api/items/:id", patch(update_item).delete(delete_item))
        .with_state(server.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), server)
}
