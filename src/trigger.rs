//! Trigger handling: probe, report, then print when the printer is reachable.

use crate::escpos::PaperWidth;
use crate::printer::PrintTransport;
use crate::probe::{probe, PrinterTarget, ProbeBackend, ProbeVerdict};
use crate::receipt::{render_all, DocumentPlan, Money, Order, OrderItem, StoreProfile};
use crate::status;
use chrono::Local;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Which inbound messages start a print cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "match", content = "text", rename_all = "lowercase")]
pub enum TriggerMatch {
    /// Any non-empty message
    Any,
    Exact(String),
    Prefix(String),
}

impl Default for TriggerMatch {
    fn default() -> Self {
        TriggerMatch::Any
    }
}

impl TriggerMatch {
    pub fn matches(&self, message: &str) -> bool {
        match self {
            TriggerMatch::Any => !message.is_empty(),
            TriggerMatch::Exact(text) => message == text,
            TriggerMatch::Prefix(prefix) => message.starts_with(prefix.as_str()),
        }
    }
}

/// Item record as sent by the frontend
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerItem {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    pub name: String,
    pub quantity: i64,
    pub price: f64,
}

/// Parsed trigger message
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerPayload {
    /// Plain text trigger; prints the built-in sample order
    Sentinel,
    Items(Vec<OrderItem>),
}

/// Largest unit price accepted from the frontend
pub const MAX_UNIT_PRICE: Money = Money::from_cents(100_000_000);
/// Largest quantity accepted for one item
pub const MAX_QUANTITY: u32 = 9_999;

impl TriggerPayload {
    /// Parse a trigger message. Items with a quantity or price outside the
    /// accepted range are dropped, as is any item that would push the order
    /// total past what `Money` can hold.
    pub fn parse(message: &str) -> Self {
        let records: Vec<TriggerItem> = match serde_json::from_str(message.trim()) {
            Ok(records) => records,
            Err(_) => return TriggerPayload::Sentinel,
        };

        let mut total = Money::ZERO;
        let mut items = Vec::with_capacity(records.len());
        for record in records {
            let Some(item) = accept_item(&record) else {
                warn!("Skipping invalid item {:?} ({})", record.id, record.name);
                continue;
            };
            match item.checked_amount().and_then(|amount| total.checked_add(amount)) {
                Some(next) => {
                    total = next;
                    items.push(item);
                }
                None => warn!("Skipping item {:?} ({}): order total overflows", record.id, record.name),
            }
        }

        if items.is_empty() {
            TriggerPayload::Sentinel
        } else {
            TriggerPayload::Items(items)
        }
    }

    pub fn into_order(self) -> Order {
        match self {
            TriggerPayload::Sentinel => Order::sample(),
            TriggerPayload::Items(items) => Order::from_items(items, Local::now()),
        }
    }
}

fn accept_item(record: &TriggerItem) -> Option<OrderItem> {
    let quantity = u32::try_from(record.quantity)
        .ok()
        .filter(|q| (1..=MAX_QUANTITY).contains(q))?;
    if !record.price.is_finite() || record.price < 0.0 {
        return None;
    }
    let unit_price = Money::from_decimal(record.price);
    if unit_price > MAX_UNIT_PRICE {
        return None;
    }
    Some(OrderItem::new(quantity, record.name.clone(), unit_price))
}

/// Everything a trigger needs besides the network backends
#[derive(Debug, Clone)]
pub struct PrintSettings {
    pub target: PrinterTarget,
    pub print_port: u16,
    pub plan: DocumentPlan,
    pub store: StoreProfile,
    pub paper_width: PaperWidth,
}

/// Runs one probe/print cycle per trigger message
pub struct TriggerHandler<P, T> {
    settings: PrintSettings,
    prober: P,
    transport: T,
}

impl<P: ProbeBackend, T: PrintTransport> TriggerHandler<P, T> {
    pub fn new(settings: PrintSettings, prober: P, transport: T) -> Self {
        Self {
            settings,
            prober,
            transport,
        }
    }

    pub fn settings(&self) -> &PrintSettings {
        &self.settings
    }

    /// Handle one trigger. Status lines are queued on `replies` in the order
    /// they should reach the frontend; the probe status always goes first.
    #[tracing::instrument(skip(self, message, replies))]
    pub async fn handle(&self, message: &str, replies: &mpsc::UnboundedSender<String>) -> ProbeVerdict {
        let verdict = probe(&self.prober, &self.settings.target).await;
        info!("Printer status: {}", status::describe(&verdict));

        if replies.send(status::status_message(&verdict)).is_err() {
            warn!("Relay channel gone before status could be sent");
        }

        if !verdict.is_reachable() {
            debug!("Skipping print for verdict {:?}", verdict);
            return verdict;
        }

        let order = TriggerPayload::parse(message).into_order();
        let documents = self.settings.plan.build(&order, &self.settings.store);
        let streams = render_all(&documents, self.settings.paper_width);

        info!(
            "Printing {} documents ({} items) to {}:{}",
            streams.len(),
            order.items.len(),
            self.settings.target.host,
            self.settings.print_port
        );

        if let Err(e) = self
            .transport
            .send(&self.settings.target.host, self.settings.print_port, &streams)
            .await
        {
            error!("Print job failed: {}", e);
            crate::sentry_init::capture_print_failure(&e.to_string());
            let _ = replies.send(status::print_failed(&e.to_string()));
        }

        verdict
    }
}
