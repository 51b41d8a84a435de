//! Wiring of the three aggregates and the purchase order reactor.
//!
//! ```text
//! VendorCommand ───────► vendors ◄──── menu lookup ────┐
//! OrderCommand ────────► orders  ◄──── derived commands ┤
//! PurchaseOrderCommand ► purchase_orders ─► journal ─► Reactor ─► router
//!                                                         │
//!                                                    checkpoint
//! ```
//!
//! The reactor reads purchase order events back from the journal and records
//! a delivery checkpoint per purchase order. A commit only tells it which
//! stream to look at, so events it could not deliver, or that were committed
//! while no reactor ran, are picked up by the periodic sweep or the scan on
//! start.

use crate::config::ReactorConfig;
use crate::order::{OrderCommand, OrderEnvironment, OrderEvent, OrderReducer, OrderRejection};
use crate::purchase_order::{
    PurchaseOrderCommand, PurchaseOrderEnvironment, PurchaseOrderEvent, PurchaseOrderReducer, PurchaseOrderRejection,
};
use crate::router::route;
use crate::sender::PurchaseOrderSender;
use crate::types::{OrderId, PurchaseOrderId};
use crate::vendor::{VendorCommand, VendorEnvironment, VendorEvent, VendorReducer, VendorRejection};
use mealorder_core::checkpoint::DeliveryCheckpoint;
use mealorder_core::environment::Clock;
use mealorder_core::event::{Event, EventError};
use mealorder_core::event_store::{EventStore, EventStoreError};
use mealorder_core::reducer::{Events, Reducer};
use mealorder_core::stream::{StreamId, Version};
use mealorder_runtime::{EventEnvelope, Repository, RepositoryError, RetryPolicy, retry_with_predicate};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

type Committed = UnboundedReceiver<EventEnvelope<PurchaseOrderId, PurchaseOrderEvent>>;

// ============================================================================
// Reactor
// ============================================================================

/// Why a purchase order event is still waiting for delivery
#[derive(Error, Debug)]
pub enum ReactorError {
    /// The journal or the checkpoint store could not be reached
    #[error("Storage unavailable: {0}")]
    Storage(#[from] EventStoreError),

    /// A journaled purchase order event could not be decoded
    #[error("Purchase order event unreadable: {0}")]
    Event(#[from] EventError),

    /// A derived command did not reach its order
    #[error("Order {order_id} not reached: {source}")]
    Delivery {
        /// Target order
        order_id: OrderId,
        /// Last failure
        source: RepositoryError<OrderRejection>,
    },
}

/// Delivers the order commands derived from journaled purchase order events.
///
/// Delivery is at least once. An event counts as delivered only when every
/// derived command reached its order; until then its stream stays pending
/// and is retried every sweep. The order reactions are idempotent, so a
/// command delivered twice changes nothing. Commands for orders that were
/// never created are skipped.
pub struct Reactor {
    orders: Arc<Repository<OrderReducer>>,
    journal: Arc<dyn EventStore>,
    checkpoint: Arc<dyn DeliveryCheckpoint>,
    policy: RetryPolicy,
    sweep_interval: Duration,
}

impl Reactor {
    /// Creates a new `Reactor`
    #[must_use]
    pub fn new(
        orders: Arc<Repository<OrderReducer>>,
        journal: Arc<dyn EventStore>,
        checkpoint: Arc<dyn DeliveryCheckpoint>,
        settings: &ReactorConfig,
    ) -> Self {
        Self {
            orders,
            journal,
            checkpoint,
            policy: settings.retry_policy(),
            sweep_interval: settings.sweep_interval(),
        }
    }

    /// Deliver purchase order events until `shutdown` flips or the purchase
    /// order repository is gone.
    ///
    /// The first sweep scans every purchase order stream, which catches up on
    /// events committed while no reactor was running.
    pub async fn run(self, mut committed: Committed, mut shutdown: watch::Receiver<bool>) {
        let mut pending = HashSet::new();
        let mut scanned = false;
        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,

                envelope = committed.recv() => {
                    let Some(envelope) = envelope else { break };
                    let stream_id = Repository::<PurchaseOrderReducer>::stream_id(&envelope.aggregate_id);
                    self.settle(stream_id, &mut pending).await;
                }

                _ = sweep.tick() => {
                    if !scanned {
                        scanned = self.scan(&mut pending).await;
                    }
                    for stream_id in std::mem::take(&mut pending) {
                        self.settle(stream_id, &mut pending).await;
                    }
                }
            }
        }

        if pending.is_empty() {
            tracing::debug!("Reactor stopping");
        } else {
            tracing::info!(pending = pending.len(), "Reactor stopping with undelivered purchase orders");
        }
    }

    /// Deliver every event of one purchase order stream past its checkpoint.
    ///
    /// Returns how many events were delivered. Stops at the first event that
    /// cannot be delivered yet; the checkpoint stays in front of it.
    ///
    /// # Errors
    ///
    /// Returns the fault that stopped delivery. Nothing is lost: the next call
    /// resumes at the same event.
    pub async fn catch_up(&self, stream_id: &StreamId) -> Result<u64, ReactorError> {
        let position = self
            .checkpoint
            .load_position(stream_id)
            .await?
            .unwrap_or(Version::INITIAL);
        let journal = self.journal.load_events(stream_id.clone()).await?;
        let skip = usize::try_from(position.value()).unwrap_or(usize::MAX);

        let mut delivered = 0;
        for serialized in journal.iter().skip(skip) {
            let event: PurchaseOrderEvent = serialized.decode()?;
            self.handle(&event).await?;
            delivered += 1;
            self.checkpoint
                .save_position(stream_id, position.advance(delivered))
                .await?;
        }

        if delivered > 0 {
            tracing::debug!(stream = %stream_id, delivered, "Purchase order events delivered");
        }
        Ok(delivered)
    }

    /// Route one purchase order event and deliver the derived commands.
    ///
    /// Returns how many commands reached an existing order.
    ///
    /// # Errors
    ///
    /// Returns [`ReactorError::Delivery`] when a command could not be
    /// delivered within the retry policy.
    #[tracing::instrument(skip_all, fields(event = event.event_type()))]
    pub async fn handle(&self, event: &PurchaseOrderEvent) -> Result<usize, ReactorError> {
        let mut delivered = 0;

        for command in route(event) {
            let order_id = command.order_id().clone();
            match self.deliver(command).await {
                Ok(true) => delivered += 1,
                Ok(false) => {
                    tracing::debug!(%order_id, "Order does not exist, skipping");
                }
                Err(RepositoryError::Rejected(rejection)) => {
                    tracing::warn!(%order_id, %rejection, "Derived order command refused");
                }
                Err(source) => {
                    metrics::counter!("reactor.delivery.failed", "aggregate" => "order").increment(1);
                    return Err(ReactorError::Delivery { order_id, source });
                }
            }
        }

        Ok(delivered)
    }

    async fn settle(&self, stream_id: StreamId, pending: &mut HashSet<StreamId>) {
        match self.catch_up(&stream_id).await {
            Ok(_) => {
                pending.remove(&stream_id);
            }
            Err(err) => {
                tracing::warn!(stream = %stream_id, error = %err, "Purchase order delivery behind, will retry");
                pending.insert(stream_id);
            }
        }
    }

    /// Queue every purchase order stream; false if the journal could not be listed
    async fn scan(&self, pending: &mut HashSet<StreamId>) -> bool {
        let prefix = StreamId::aggregate_prefix(PurchaseOrderReducer::AGGREGATE_TYPE);
        match self.journal.stream_ids(&prefix).await {
            Ok(streams) => {
                pending.extend(streams);
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "Cannot list purchase order streams, will retry");
                false
            }
        }
    }

    async fn deliver(&self, command: OrderCommand) -> Result<bool, RepositoryError<OrderRejection>> {
        let orders = &self.orders;
        let mut attempt = 0_u32;

        retry_with_predicate(
            &self.policy,
            || {
                if attempt > 0 {
                    metrics::counter!("reactor.delivery.retry", "aggregate" => "order").increment(1);
                }
                attempt += 1;

                let command = command.clone();
                async move {
                    let loaded = orders.load(command.order_id()).await;
                    match loaded {
                        Ok(Some(_)) => orders.send(command).await.map(|_| true),
                        Ok(None) => Ok(false),
                        Err(err) => Err(err.widen()),
                    }
                }
            },
            |err: &RepositoryError<OrderRejection>| err.is_retryable(),
        )
        .await
    }
}

// ============================================================================
// Application
// ============================================================================

/// The meal order service: three repositories over one journal, plus the
/// reactor connecting purchase orders to orders.
pub struct MealOrderApp {
    vendors: Arc<Repository<VendorReducer>>,
    orders: Arc<Repository<OrderReducer>>,
    purchase_orders: Arc<Repository<PurchaseOrderReducer>>,
    reactor: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl MealOrderApp {
    /// Build the repositories and start the reactor.
    ///
    /// `checkpoint` must outlive restarts as the journal does; the reactor
    /// resumes delivery from it.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        sender: Arc<dyn PurchaseOrderSender>,
        event_store: Arc<dyn EventStore>,
        checkpoint: Arc<dyn DeliveryCheckpoint>,
        settings: &ReactorConfig,
    ) -> Self {
        let vendors = Arc::new(Repository::new(
            VendorReducer,
            VendorEnvironment::new(Arc::clone(&clock)),
            Arc::clone(&event_store),
        ));
        let orders = Arc::new(Repository::new(
            OrderReducer,
            OrderEnvironment::new(Arc::clone(&clock), Arc::clone(&vendors) as _),
            Arc::clone(&event_store),
        ));
        let purchase_orders = Arc::new(Repository::new(
            PurchaseOrderReducer,
            PurchaseOrderEnvironment::new(clock, sender),
            Arc::clone(&event_store),
        ));

        let (shutdown, signal) = watch::channel(false);
        let reactor = Reactor::new(Arc::clone(&orders), event_store, checkpoint, settings);
        let reactor = tokio::spawn(reactor.run(purchase_orders.subscribe(), signal));

        Self {
            vendors,
            orders,
            purchase_orders,
            reactor,
            shutdown,
        }
    }

    /// Send a command to a vendor
    ///
    /// # Errors
    ///
    /// Returns the vendor's rejection or a journal failure.
    pub async fn send_vendor(&self, command: VendorCommand) -> Result<Events<VendorEvent>, RepositoryError<VendorRejection>> {
        self.vendors.send(command).await
    }

    /// Send a command to an order.
    ///
    /// Creating an order first loads the vendor so that menu availability
    /// is checked against its journal.
    ///
    /// # Errors
    ///
    /// Returns the order's rejection or a journal failure.
    pub async fn send_order(&self, command: OrderCommand) -> Result<Events<OrderEvent>, RepositoryError<OrderRejection>> {
        if let OrderCommand::CreateOrder { order_id, .. } = &command {
            self.vendors
                .load(&order_id.vendor_id)
                .await
                .map_err(|err| err.widen::<OrderRejection>())?;
        }
        self.orders.send(command).await
    }

    /// Send a command to a purchase order
    ///
    /// # Errors
    ///
    /// Returns the purchase order's rejection or a journal failure.
    pub async fn send_purchase_order(
        &self,
        command: PurchaseOrderCommand,
    ) -> Result<Events<PurchaseOrderEvent>, RepositoryError<PurchaseOrderRejection>> {
        self.purchase_orders.send(command).await
    }

    /// Vendor repository
    #[must_use]
    pub const fn vendors(&self) -> &Arc<Repository<VendorReducer>> {
        &self.vendors
    }

    /// Order repository
    #[must_use]
    pub const fn orders(&self) -> &Arc<Repository<OrderReducer>> {
        &self.orders
    }

    /// Purchase order repository
    #[must_use]
    pub const fn purchase_orders(&self) -> &Arc<Repository<PurchaseOrderReducer>> {
        &self.purchase_orders
    }

    /// Stop the reactor once the delivery in progress finishes.
    ///
    /// Events not delivered yet stay behind their checkpoint; a service
    /// started over the same journal and checkpoint delivers them.
    pub async fn shutdown(self) {
        self.shutdown.send(true).ok();
        match self.reactor.await {
            Err(err) => tracing::warn!(error = %err, "Reactor ended abnormally"),
            Ok(()) => tracing::info!("Meal order service stopped"),
        }
    }
}
