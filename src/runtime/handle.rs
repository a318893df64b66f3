use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;

use crate::{
    core::{
        catalog::{ExportedCatalog, ImportRejected},
        order::{OrderTotals, SubmitRejected},
        session::MenuSession,
        summary::OrderSnapshot,
    },
    dish::{Dish, DishDraft, DishPatch, ValidationError},
    persist::{KeyValueStore, Persisted},
    photo::{ImageIngestPipeline, ImagePayload},
    types::{CategoryFilter, DishId},
};

use super::events::MenuEvent;

/// Failure of a runtime request.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Dish input was rejected.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Import payload was rejected.
    #[error(transparent)]
    Import(#[from] ImportRejected),
    /// Submit was rejected.
    #[error(transparent)]
    Submit(#[from] SubmitRejected),
    /// The runtime loop has stopped.
    #[error("menu runtime is not running")]
    ChannelClosed,
}

/// Quantity mutation requested by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityChange {
    /// Absolute value; negatives clamp to zero.
    Set(i64),
    /// One more.
    Increment,
    /// One less, never below zero.
    Decrement,
}

/// Cloneable handle to a running menu loop.
#[derive(Clone)]
pub struct MenuHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<MenuEvent>,
    images: ImageIngestPipeline,
}

enum Command {
    AddDish {
        draft: DishDraft,
        resp: oneshot::Sender<Result<Persisted<DishId>, RuntimeError>>,
    },
    UpdateDish {
        id: DishId,
        patch: DishPatch,
        resp: oneshot::Sender<Result<Persisted<bool>, RuntimeError>>,
    },
    SetDishImage {
        id: DishId,
        payload: Option<ImagePayload>,
        resp: oneshot::Sender<Result<Persisted<bool>, RuntimeError>>,
    },
    RemoveDish {
        id: DishId,
        resp: oneshot::Sender<Persisted<bool>>,
    },
    ClearCatalog {
        resp: oneshot::Sender<Persisted<()>>,
    },
    Import {
        raw: String,
        resp: oneshot::Sender<Result<Persisted<usize>, RuntimeError>>,
    },
    Export {
        resp: oneshot::Sender<ExportedCatalog>,
    },
    Get {
        id: DishId,
        resp: oneshot::Sender<Option<Dish>>,
    },
    List {
        filter: Option<CategoryFilter>,
        resp: oneshot::Sender<Vec<Dish>>,
    },
    Quantity {
        id: DishId,
        change: QuantityChange,
        resp: oneshot::Sender<Persisted<u32>>,
    },
    Totals {
        resp: oneshot::Sender<OrderTotals>,
    },
    SetActiveCategory {
        filter: CategoryFilter,
        resp: oneshot::Sender<Persisted<()>>,
    },
    Submit {
        resp: oneshot::Sender<Result<Persisted<OrderSnapshot>, RuntimeError>>,
    },
    RestoreSubmitted {
        resp: oneshot::Sender<Option<OrderSnapshot>>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

/// Starts the single-writer loop owning `session`.
///
/// Must be called from within a tokio runtime.
pub fn spawn_menu<S: KeyValueStore>(session: MenuSession<S>) -> MenuHandle {
    let config = session.config().clone();
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(config.command_queue_bound.max(1));
    let (events_tx, _) = broadcast::channel::<MenuEvent>(config.event_capacity.max(1));
    let images = session.images().clone();

    let events_tx_loop = events_tx.clone();
    tokio::spawn(async move {
        let mut session = session;
        while let Some(cmd) = cmd_rx.recv().await {
            if handle_command(cmd, &mut session, &events_tx_loop) {
                break;
            }
        }
        debug!("menu runtime stopped");
    });

    MenuHandle {
        cmd_tx,
        events_tx,
        images,
    }
}

impl MenuHandle {
    /// Subscribes to change events.
    pub fn subscribe(&self) -> broadcast::Receiver<MenuEvent> {
        self.events_tx.subscribe()
    }

    /// Photo pipeline; ingestion runs in the caller's task, off the writer loop.
    pub fn images(&self) -> &ImageIngestPipeline {
        &self.images
    }

    /// See [`MenuSession::add_dish`].
    pub async fn add_dish(&self, draft: DishDraft) -> Result<Persisted<DishId>, RuntimeError> {
        self.call(|resp| Command::AddDish { draft, resp }).await?
    }

    /// See [`MenuSession::update_dish`].
    pub async fn update_dish(&self, id: DishId, patch: DishPatch) -> Result<Persisted<bool>, RuntimeError> {
        self.call(|resp| Command::UpdateDish { id, patch, resp }).await?
    }

    /// See [`MenuSession::set_dish_image`].
    pub async fn set_dish_image(
        &self,
        id: DishId,
        payload: Option<ImagePayload>,
    ) -> Result<Persisted<bool>, RuntimeError> {
        self.call(|resp| Command::SetDishImage { id, payload, resp }).await?
    }

    /// See [`MenuSession::remove_dish`].
    pub async fn remove_dish(&self, id: DishId) -> Result<Persisted<bool>, RuntimeError> {
        self.call(|resp| Command::RemoveDish { id, resp }).await
    }

    /// See [`MenuSession::clear_catalog`].
    pub async fn clear_catalog(&self) -> Result<Persisted<()>, RuntimeError> {
        self.call(|resp| Command::ClearCatalog { resp }).await
    }

    /// See [`MenuSession::import_json`].
    pub async fn import_json(&self, raw: impl Into<String>) -> Result<Persisted<usize>, RuntimeError> {
        let raw = raw.into();
        self.call(|resp| Command::Import { raw, resp }).await?
    }

    /// See [`MenuSession::export_all`].
    pub async fn export_all(&self) -> Result<ExportedCatalog, RuntimeError> {
        self.call(|resp| Command::Export { resp }).await
    }

    /// One dish by id.
    pub async fn get(&self, id: DishId) -> Result<Option<Dish>, RuntimeError> {
        self.call(|resp| Command::Get { id, resp }).await
    }

    /// Dishes passing `filter`.
    pub async fn list(&self, filter: CategoryFilter) -> Result<Vec<Dish>, RuntimeError> {
        self.call(|resp| Command::List {
            filter: Some(filter),
            resp,
        })
        .await
    }

    /// Dishes of the active tab.
    pub async fn visible_dishes(&self) -> Result<Vec<Dish>, RuntimeError> {
        self.call(|resp| Command::List { filter: None, resp }).await
    }

    /// Applies a quantity change and returns the new quantity.
    pub async fn change_quantity(&self, id: DishId, change: QuantityChange) -> Result<Persisted<u32>, RuntimeError> {
        self.call(|resp| Command::Quantity { id, change, resp }).await
    }

    /// Live totals.
    pub async fn totals(&self) -> Result<OrderTotals, RuntimeError> {
        self.call(|resp| Command::Totals { resp }).await
    }

    /// See [`MenuSession::set_active_category`].
    pub async fn set_active_category(&self, filter: CategoryFilter) -> Result<Persisted<()>, RuntimeError> {
        self.call(|resp| Command::SetActiveCategory { filter, resp }).await
    }

    /// See [`MenuSession::submit`].
    pub async fn submit(&self) -> Result<Persisted<OrderSnapshot>, RuntimeError> {
        self.call(|resp| Command::Submit { resp }).await?
    }

    /// See [`MenuSession::restore_submitted_order`].
    pub async fn restore_submitted_order(&self) -> Result<Option<OrderSnapshot>, RuntimeError> {
        self.call(|resp| Command::RestoreSubmitted { resp }).await
    }

    /// Stops the loop after every queued command has been handled.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.call(|resp| Command::Shutdown { resp }).await
    }

    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }
}

fn handle_command<S: KeyValueStore>(
    cmd: Command,
    session: &mut MenuSession<S>,
    events_tx: &broadcast::Sender<MenuEvent>,
) -> bool {
    match cmd {
        Command::AddDish { draft, resp } => {
            let res = session.add_dish(draft).map_err(RuntimeError::from);
            if let Ok(out) = &res {
                publish(events_tx, out, MenuEvent::DishAdded { id: out.value });
            }
            let _ = resp.send(res);
        }
        Command::UpdateDish { id, patch, resp } => {
            let res = session.update_dish(id, &patch).map_err(RuntimeError::from);
            if let Ok(out) = &res {
                if out.value {
                    publish(events_tx, out, MenuEvent::DishUpdated { id });
                }
            }
            let _ = resp.send(res);
        }
        Command::SetDishImage { id, payload, resp } => {
            let res = session.set_dish_image(id, payload).map_err(RuntimeError::from);
            if let Ok(out) = &res {
                if out.value {
                    publish(events_tx, out, MenuEvent::DishUpdated { id });
                }
            }
            let _ = resp.send(res);
        }
        Command::RemoveDish { id, resp } => {
            let out = session.remove_dish(id);
            if out.value {
                publish(events_tx, &out, MenuEvent::DishRemoved { id });
            }
            let _ = resp.send(out);
        }
        Command::ClearCatalog { resp } => {
            let out = session.clear_catalog();
            publish(events_tx, &out, MenuEvent::CatalogReset);
            let _ = resp.send(out);
        }
        Command::Import { raw, resp } => {
            let res = session.import_json(&raw).map_err(RuntimeError::from);
            if let Ok(out) = &res {
                publish(events_tx, out, MenuEvent::CatalogImported { count: out.value });
            }
            let _ = resp.send(res);
        }
        Command::Export { resp } => {
            let _ = resp.send(session.export_all());
        }
        Command::Get { id, resp } => {
            let _ = resp.send(session.catalog().get_cloned(id));
        }
        Command::List { filter, resp } => {
            let dishes = match filter {
                Some(filter) => session.catalog().list_by_category(&filter),
                None => session.visible_dishes(),
            };
            let _ = resp.send(dishes);
        }
        Command::Quantity { id, change, resp } => {
            let before = session.order().quantity(id);
            let out = match change {
                QuantityChange::Set(n) => session.set_quantity(id, n),
                QuantityChange::Increment => session.increment(id),
                QuantityChange::Decrement => session.decrement(id),
            };
            if out.value != before {
                publish(
                    events_tx,
                    &out,
                    MenuEvent::QuantityChanged {
                        id,
                        quantity: out.value,
                    },
                );
            }
            let _ = resp.send(out);
        }
        Command::Totals { resp } => {
            let _ = resp.send(session.totals());
        }
        Command::SetActiveCategory { filter, resp } => {
            let out = session.set_active_category(filter.clone());
            publish(events_tx, &out, MenuEvent::ActiveCategoryChanged { filter });
            let _ = resp.send(out);
        }
        Command::Submit { resp } => {
            let res = session.submit().map_err(RuntimeError::from);
            if let Ok(out) = &res {
                publish(
                    events_tx,
                    out,
                    MenuEvent::OrderSubmitted {
                        total_price: out.value.total_price,
                        total_count: out.value.total_count,
                    },
                );
            }
            let _ = resp.send(res);
        }
        Command::RestoreSubmitted { resp } => {
            let _ = resp.send(session.restore_submitted_order());
        }
        Command::Shutdown { resp } => {
            let _ = resp.send(());
            return true;
        }
    }

    false
}

fn publish<T>(events_tx: &broadcast::Sender<MenuEvent>, out: &Persisted<T>, event: MenuEvent) {
    let _ = events_tx.send(event);
    if let Some(failure) = &out.write_failure {
        let _ = events_tx.send(MenuEvent::WriteFailed { key: failure.key });
    }
}
