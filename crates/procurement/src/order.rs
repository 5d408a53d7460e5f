use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use replenish_core::{Aggregate, AggregateRoot, CompanyId, DomainError};
use replenish_events::Event;
use replenish_stock::{LocationId, MoveId, OrderId, ProductId};

/// Replenishment order state lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderState {
    Confirmed,
    Running,
    Done,
    Cancelled,
}

impl OrderState {
    pub fn is_open(self) -> bool {
        !matches!(self, OrderState::Done | OrderState::Cancelled)
    }
}

/// Whether a reschedule should also move the dates of the order's pending
/// fulfillment moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownstreamUpdate {
    Propagate,
    Skip,
}

/// Aggregate root: ReplenishmentOrder.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplenishmentOrder {
    id: OrderId,
    company: Option<CompanyId>,
    product: Option<ProductId>,
    location: Option<LocationId>,
    quantity: f64,
    date_planned: Option<DateTime<Utc>>,
    state: OrderState,
    moves: Vec<MoveId>,
    version: u64,
    created: bool,
}

/// Serializable state of an order, used to seed and export warehouse snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub id: OrderId,
    #[serde(default)]
    pub company: Option<CompanyId>,
    pub product: ProductId,
    pub location: LocationId,
    pub quantity: f64,
    pub date_planned: DateTime<Utc>,
    pub state: OrderState,
    #[serde(default)]
    pub moves: Vec<MoveId>,
    #[serde(default)]
    pub version: u64,
}

impl ReplenishmentOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            company: None,
            product: None,
            location: None,
            quantity: 0.0,
            date_planned: None,
            state: OrderState::Confirmed,
            moves: Vec::new(),
            version: 0,
            created: false,
        }
    }

    /// Rebuild an order from a stored snapshot.
    pub fn restore(snapshot: OrderSnapshot) -> Result<Self, DomainError> {
        if !(snapshot.quantity.is_finite() && snapshot.quantity > 0.0) {
            return Err(DomainError::validation(format!(
                "order {}: quantity must be positive",
                snapshot.id
            )));
        }
        Ok(Self {
            id: snapshot.id,
            company: snapshot.company,
            product: Some(snapshot.product),
            location: Some(snapshot.location),
            quantity: snapshot.quantity,
            date_planned: Some(snapshot.date_planned),
            state: snapshot.state,
            moves: snapshot.moves,
            version: snapshot.version,
            created: true,
        })
    }

    /// `None` until the order has been created.
    pub fn snapshot(&self) -> Option<OrderSnapshot> {
        Some(OrderSnapshot {
            id: self.id,
            company: self.company,
            product: self.product?,
            location: self.location?,
            quantity: self.quantity,
            date_planned: self.date_planned?,
            state: self.state,
            moves: self.moves.clone(),
            version: self.version,
        })
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn company(&self) -> Option<CompanyId> {
        self.company
    }

    pub fn product(&self) -> Option<ProductId> {
        self.product
    }

    pub fn location(&self) -> Option<LocationId> {
        self.location
    }

    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    pub fn date_planned(&self) -> Option<DateTime<Utc>> {
        self.date_planned
    }

    pub fn state(&self) -> OrderState {
        self.state
    }

    /// Fulfillment moves generated for this order.
    pub fn moves(&self) -> &[MoveId] {
        &self.moves
    }
}

impl AggregateRoot for ReplenishmentOrder {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateOrder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOrder {
    pub company: Option<CompanyId>,
    pub order_id: OrderId,
    pub product: ProductId,
    pub location: LocationId,
    pub quantity: f64,
    pub date_planned: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RunOrder (hand the order to fulfillment through `move_id`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOrder {
    pub order_id: OrderId,
    pub move_id: MoveId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RescheduleOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescheduleOrder {
    pub order_id: OrderId,
    pub date_planned: DateTime<Utc>,
    pub downstream: DownstreamUpdate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeQuantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeQuantity {
    pub order_id: OrderId,
    pub quantity: f64,
    /// Quantity already received against this order.
    pub delivered: f64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DetachOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetachOrder {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderCommand {
    CreateOrder(CreateOrder),
    RunOrder(RunOrder),
    RescheduleOrder(RescheduleOrder),
    ChangeQuantity(ChangeQuantity),
    CancelOrder(CancelOrder),
    DetachOrder(DetachOrder),
}

/// Event: OrderCreated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub company: Option<CompanyId>,
    pub order_id: OrderId,
    pub product: ProductId,
    pub location: LocationId,
    pub quantity: f64,
    pub date_planned: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderRun.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRun {
    pub order_id: OrderId,
    pub move_id: MoveId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderRescheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRescheduled {
    pub order_id: OrderId,
    pub previous: DateTime<Utc>,
    pub date_planned: DateTime<Utc>,
    pub downstream: DownstreamUpdate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderQuantityChanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderQuantityChanged {
    pub order_id: OrderId,
    pub quantity: f64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCancelled.
///
/// Carries the moves that were linked at cancellation time so the
/// fulfillment side can cancel whatever has not been executed yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub moves: Vec<MoveId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderDetached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetached {
    pub order_id: OrderId,
    pub moves: Vec<MoveId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderCreated(OrderCreated),
    OrderRun(OrderRun),
    OrderRescheduled(OrderRescheduled),
    OrderQuantityChanged(OrderQuantityChanged),
    OrderCancelled(OrderCancelled),
    OrderDetached(OrderDetached),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "order.created",
            OrderEvent::OrderRun(_) => "order.run",
            OrderEvent::OrderRescheduled(_) => "order.rescheduled",
            OrderEvent::OrderQuantityChanged(_) => "order.quantity_changed",
            OrderEvent::OrderCancelled(_) => "order.cancelled",
            OrderEvent::OrderDetached(_) => "order.detached",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderCreated(e) => e.occurred_at,
            OrderEvent::OrderRun(e) => e.occurred_at,
            OrderEvent::OrderRescheduled(e) => e.occurred_at,
            OrderEvent::OrderQuantityChanged(e) => e.occurred_at,
            OrderEvent::OrderCancelled(e) => e.occurred_at,
            OrderEvent::OrderDetached(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ReplenishmentOrder {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderCreated(e) => {
                self.id = e.order_id;
                self.company = e.company;
                self.product = Some(e.product);
                self.location = Some(e.location);
                self.quantity = e.quantity;
                self.date_planned = Some(e.date_planned);
                self.state = OrderState::Confirmed;
                self.moves.clear();
                self.created = true;
            }
            OrderEvent::OrderRun(e) => {
                self.state = OrderState::Running;
                self.moves.push(e.move_id);
            }
            OrderEvent::OrderRescheduled(e) => {
                self.date_planned = Some(e.date_planned);
            }
            OrderEvent::OrderQuantityChanged(e) => {
                self.quantity = e.quantity;
            }
            OrderEvent::OrderCancelled(_) => {
                self.state = OrderState::Cancelled;
            }
            OrderEvent::OrderDetached(_) => {
                self.moves.clear();
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::CreateOrder(cmd) => self.handle_create(cmd),
            OrderCommand::RunOrder(cmd) => self.handle_run(cmd),
            OrderCommand::RescheduleOrder(cmd) => self.handle_reschedule(cmd),
            OrderCommand::ChangeQuantity(cmd) => self.handle_change_quantity(cmd),
            OrderCommand::CancelOrder(cmd) => self.handle_cancel(cmd),
            OrderCommand::DetachOrder(cmd) => self.handle_detach(cmd),
        }
    }
}

impl ReplenishmentOrder {
    fn ensure_existing(&self, order_id: OrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("order {order_id}")));
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_open(&self, action: &str) -> Result<(), DomainError> {
        if !self.state.is_open() {
            return Err(DomainError::invariant(format!(
                "cannot {action} an order in state {:?}",
                self.state
            )));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }
        if !(cmd.quantity.is_finite() && cmd.quantity > 0.0) {
            return Err(DomainError::validation(format!(
                "order quantity must be positive, got {}",
                cmd.quantity
            )));
        }

        Ok(vec![OrderEvent::OrderCreated(OrderCreated {
            company: cmd.company,
            order_id: cmd.order_id,
            product: cmd.product,
            location: cmd.location,
            quantity: cmd.quantity,
            date_planned: cmd.date_planned,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_run(&self, cmd: &RunOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_existing(cmd.order_id)?;

        if self.state != OrderState::Confirmed {
            return Err(DomainError::invariant("only confirmed orders can be run"));
        }

        Ok(vec![OrderEvent::OrderRun(OrderRun {
            order_id: cmd.order_id,
            move_id: cmd.move_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reschedule(&self, cmd: &RescheduleOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_existing(cmd.order_id)?;
        self.ensure_open("reschedule")?;

        let Some(previous) = self.date_planned else {
            return Err(DomainError::invariant("order has no planned date"));
        };
        if previous == cmd.date_planned {
            return Ok(Vec::new());
        }

        Ok(vec![OrderEvent::OrderRescheduled(OrderRescheduled {
            order_id: cmd.order_id,
            previous,
            date_planned: cmd.date_planned,
            downstream: cmd.downstream,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_quantity(
        &self,
        cmd: &ChangeQuantity,
    ) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_existing(cmd.order_id)?;
        self.ensure_open("change the quantity of")?;

        if !(cmd.quantity.is_finite() && cmd.quantity > 0.0) {
            return Err(DomainError::validation("quantity must be positive"));
        }
        // Invariant: committed quantity never drops below what was already received.
        if cmd.quantity < cmd.delivered {
            return Err(DomainError::validation(format!(
                "cannot set quantity {} below the delivered quantity {}",
                cmd.quantity, cmd.delivered
            )));
        }
        if cmd.quantity == self.quantity {
            return Ok(Vec::new());
        }

        Ok(vec![OrderEvent::OrderQuantityChanged(OrderQuantityChanged {
            order_id: cmd.order_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_existing(cmd.order_id)?;

        match self.state {
            OrderState::Cancelled => Ok(Vec::new()),
            OrderState::Done => Err(DomainError::invariant("cannot cancel a done order")),
            OrderState::Confirmed | OrderState::Running => {
                Ok(vec![OrderEvent::OrderCancelled(OrderCancelled {
                    order_id: cmd.order_id,
                    moves: self.moves.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }

    fn handle_detach(&self, cmd: &DetachOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_existing(cmd.order_id)?;

        if self.moves.is_empty() {
            return Ok(Vec::new());
        }

        Ok(vec![OrderEvent::OrderDetached(OrderDetached {
            order_id: cmd.order_id,
            moves: self.moves.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
