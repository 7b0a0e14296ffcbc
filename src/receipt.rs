//! Receipt documents and their ESC/POS rendering.
//!
//! Rendering is a pure function of the document: no clock reads and no I/O.
//! Anything time-dependent (transaction numbers, dates) is resolved when the
//! [`Order`] is built.

use crate::escpos::{Alignment, ESCPOSBuilder, PaperWidth, TextSize};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Mul, Sub};

/// Column layout of the item and kitchen tables for one paper width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TableLayout {
    /// Quantity + description block of the item table
    item_desc: usize,
    item_price: usize,
    item_amount: usize,
    item_wrap: usize,
    item_header: &'static str,
    /// Kitchen quantity is right-aligned in `kitchen_qty` columns
    kitchen_qty: usize,
    kitchen_gap: usize,
    kitchen_header: &'static str,
}

impl TableLayout {
    fn for_width(paper_width: PaperWidth) -> Self {
        match paper_width {
            PaperWidth::Width80mm => TableLayout {
                item_desc: 20,
                item_price: 12,
                item_amount: 15,
                item_wrap: 18,
                item_header: "Qty          Desc           Price         Amount",
                kitchen_qty: 8,
                kitchen_gap: 23,
                kitchen_header: "   Quantity                    Description",
            },
            PaperWidth::Width58mm => TableLayout {
                item_desc: 14,
                item_price: 8,
                item_amount: 10,
                item_wrap: 12,
                item_header: "Qty       Desc   Price    Amount",
                kitchen_qty: 4,
                kitchen_gap: 2,
                kitchen_header: " Qty  Description",
            },
        }
    }

    /// Description wrap for an item; leaves one space after the quantity
    fn item_wrap_for(&self, quantity: &str) -> usize {
        self.item_wrap
            .min(self.item_desc.saturating_sub(char_len(quantity) + 1))
    }

    fn kitchen_wrap(&self, columns: usize) -> usize {
        columns.saturating_sub(self.kitchen_qty + self.kitchen_gap)
    }
}

// ============================================================================
// Layout helpers
// ============================================================================

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Left-pad `value` so that it ends at column `total_length` after `label`.
///
/// A value too long to fit is appended unpadded, never truncated.
pub fn pad_text(label: &str, value: &str, total_length: usize) -> String {
    let width = total_length.saturating_sub(char_len(label));
    format!("{label}{value:>width$}")
}

/// Wrap `text` into lines of at most `max_length` characters.
///
/// Breaks at the last space at or before the limit; a run with no space is
/// split hard at the limit. Text that already fits is returned unchanged.
/// Never yields an empty line before the first word.
pub fn wrap_text(text: &str, max_length: usize) -> Vec<String> {
    let max_length = max_length.max(1);
    let mut lines = Vec::new();
    let mut rest: Vec<char> = text.chars().collect();

    while rest.len() > max_length {
        let split = rest[..=max_length]
            .iter()
            .rposition(|c| *c == ' ')
            .unwrap_or(max_length);

        let head: String = rest[..split].iter().collect();
        let head = head.trim();
        if !head.is_empty() {
            lines.push(head.to_string());
        }

        let tail: String = rest[split..].iter().collect();
        rest = tail.trim().chars().collect();
    }

    lines.push(rest.into_iter().collect());
    lines
}

/// `label` and `value` on one padded line, or on two lines with the value
/// right-aligned below when they do not fit side by side.
fn label_value_lines(label: &str, value: &str, width: usize) -> Vec<String> {
    if char_len(label) + char_len(value) < width {
        vec![pad_text(label, value, width)]
    } else {
        vec![label.to_string(), format!("{value:>width$}")]
    }
}

// ============================================================================
// Money
// ============================================================================

/// Monetary amount in cents. Displayed with two decimals.
///
/// Operators saturate at the `i64` range; use the `checked_*` forms where an
/// out-of-range amount has to be rejected instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);
    pub const MAX: Money = Money(i64::MAX);

    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Round a decimal amount to the nearest cent
    pub fn from_decimal(value: f64) -> Self {
        Money((value * 100.0).round() as i64)
    }

    pub fn cents(self) -> i64 {
        self.0
    }

    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    pub fn checked_mul(self, quantity: u32) -> Option<Money> {
        self.0.checked_mul(i64::from(quantity)).map(Money)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let text = format!("{}{}.{:02}", sign, abs / 100, abs % 100);
        f.pad(&text)
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl Mul<u32> for Money {
    type Output = Money;
    fn mul(self, rhs: u32) -> Money {
        Money(self.0.saturating_mul(i64::from(rhs)))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

// ============================================================================
// Order data
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItem {
    pub quantity: u32,
    pub description: String,
    pub unit_price: Money,
}

impl OrderItem {
    pub fn new(quantity: u32, description: impl Into<String>, unit_price: Money) -> Self {
        Self {
            quantity,
            description: description.into(),
            unit_price,
        }
    }

    /// `quantity × unit_price`
    pub fn amount(&self) -> Money {
        self.unit_price * self.quantity
    }

    /// `None` when the amount does not fit in an `i64` of cents
    pub fn checked_amount(&self) -> Option<Money> {
        self.unit_price.checked_mul(self.quantity)
    }
}

/// Transaction header printed at the top of a customer receipt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptHeader {
    pub transaction_no: String,
    pub terminal: String,
    pub cashier: String,
    pub trans_date: String,
    pub id_no: String,
    pub name: String,
    pub initial_balance: String,
    pub remaining_balance: String,
}

/// Store branding, configured per agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreProfile {
    pub name: String,
    pub footer: Vec<String>,
}

impl Default for StoreProfile {
    fn default() -> Self {
        Self {
            name: "DUALTECH".to_string(),
            footer: vec![
                "This document is not valid".to_string(),
                "For claim of input tax".to_string(),
            ],
        }
    }
}

/// Everything one print job is rendered from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub header: ReceiptHeader,
    pub items: Vec<OrderItem>,
    pub tap_card: Option<Money>,
    pub tendered: Option<Money>,
    pub order_number: String,
    pub stub_number: String,
    pub stub_date: String,
}

impl Order {
    /// Built-in sample order, printed when a trigger carries no items
    pub fn sample() -> Self {
        Self {
            header: ReceiptHeader {
                transaction_no: "20241009C0004".to_string(),
                terminal: "Cashier".to_string(),
                cashier: "Cashier".to_string(),
                trans_date: "10/09/2024, 3:00PM".to_string(),
                id_no: "1031231".to_string(),
                name: "Franco Smith".to_string(),
                initial_balance: "250".to_string(),
                remaining_balance: "55000".to_string(),
            },
            items: vec![
                OrderItem::new(2, "Spaghetti", Money::from_cents(500)),
                OrderItem::new(1, "Item 2", Money::from_cents(1500)),
                OrderItem::new(3, "Item 3", Money::from_cents(750)),
            ],
            tap_card: None,
            tendered: None,
            order_number: "20241009C00005".to_string(),
            stub_number: "20241009C0005".to_string(),
            stub_date: "2024/12/25".to_string(),
        }
    }

    /// Order for items sent by the frontend, numbered from the given time
    pub fn from_items(items: Vec<OrderItem>, now: DateTime<Local>) -> Self {
        let number = now.format("%Y%m%dC%H%M%S").to_string();
        Self {
            header: ReceiptHeader {
                transaction_no: number.clone(),
                terminal: "Cashier".to_string(),
                cashier: "Cashier".to_string(),
                trans_date: now.format("%m/%d/%Y, %-I:%M%p").to_string(),
                id_no: String::new(),
                name: "Walk-in".to_string(),
                initial_balance: String::new(),
                remaining_balance: String::new(),
            },
            items,
            tap_card: None,
            tendered: None,
            order_number: number.clone(),
            stub_number: number,
            stub_date: now.format("%Y/%m/%d").to_string(),
        }
    }

    /// Sum of the per-line amounts, exactly as displayed
    pub fn total(&self) -> Money {
        self.items.iter().map(OrderItem::amount).sum()
    }

    pub fn payment(&self) -> PaymentSummary {
        let total = self.total();
        let tendered = self.tendered.unwrap_or(total);
        PaymentSummary {
            total,
            tap_card: self.tap_card.unwrap_or(total),
            tendered,
            change: tendered - total,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentSummary {
    pub total: Money,
    pub tap_card: Money,
    pub tendered: Money,
    pub change: Money,
}

// ============================================================================
// Documents
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealKind {
    Breakfast,
    Lunch,
    Dinner,
    OrderNumber,
}

impl MealKind {
    fn caption(self) -> &'static str {
        match self {
            MealKind::Breakfast => "Breakfast - Meal",
            MealKind::Lunch => "Lunch - Meal",
            MealKind::Dinner => "Dinner - Meal",
            MealKind::OrderNumber => "",
        }
    }
}

/// One independently cut unit of printed output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptDocument {
    CustomerReceipt {
        store: StoreProfile,
        header: ReceiptHeader,
        items: Vec<OrderItem>,
        payment: PaymentSummary,
    },
    KitchenTicket {
        order_number: String,
        items: Vec<OrderItem>,
    },
    MealStub {
        kind: MealKind,
        number: String,
        date: String,
        /// Printed large on the order-number stub
        order_number: String,
    },
}

/// Document kind as named in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    CustomerReceipt,
    KitchenTicket,
    MealStub(MealKind),
}

/// Ordered list of documents printed for every job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentPlan(pub Vec<DocumentKind>);

impl Default for DocumentPlan {
    fn default() -> Self {
        DocumentPlan(vec![
            DocumentKind::CustomerReceipt,
            DocumentKind::MealStub(MealKind::OrderNumber),
            DocumentKind::MealStub(MealKind::Breakfast),
            DocumentKind::MealStub(MealKind::Lunch),
            DocumentKind::MealStub(MealKind::Dinner),
            DocumentKind::KitchenTicket,
        ])
    }
}

impl DocumentPlan {
    pub fn build(&self, order: &Order, store: &StoreProfile) -> Vec<ReceiptDocument> {
        self.0
            .iter()
            .map(|kind| match kind {
                DocumentKind::CustomerReceipt => ReceiptDocument::CustomerReceipt {
                    store: store.clone(),
                    header: order.header.clone(),
                    items: order.items.clone(),
                    payment: order.payment(),
                },
                DocumentKind::KitchenTicket => ReceiptDocument::KitchenTicket {
                    order_number: order.order_number.clone(),
                    items: order.items.clone(),
                },
                DocumentKind::MealStub(kind) => ReceiptDocument::MealStub {
                    kind: *kind,
                    number: order.stub_number.clone(),
                    date: order.stub_date.clone(),
                    order_number: order.order_number.clone(),
                },
            })
            .collect()
    }
}

// ============================================================================
// Rendering
// ============================================================================

/// Render one document to a printer byte stream, ending with a cut
pub fn render(document: &ReceiptDocument, paper_width: PaperWidth) -> Vec<u8> {
    let mut builder = ESCPOSBuilder::new(paper_width);

    match document {
        ReceiptDocument::CustomerReceipt {
            store,
            header,
            items,
            payment,
        } => render_customer_receipt(&mut builder, store, header, items, payment),
        ReceiptDocument::KitchenTicket {
            order_number,
            items,
        } => render_kitchen_ticket(&mut builder, order_number, items),
        ReceiptDocument::MealStub {
            kind,
            number,
            date,
            order_number,
        } => render_meal_stub(&mut builder, *kind, number, date, order_number),
    }

    builder.cut();
    builder.build()
}

/// Render a whole plan, one byte stream per document in plan order
pub fn render_all(documents: &[ReceiptDocument], paper_width: PaperWidth) -> Vec<Vec<u8>> {
    documents.iter().map(|d| render(d, paper_width)).collect()
}

fn render_customer_receipt(
    builder: &mut ESCPOSBuilder,
    store: &StoreProfile,
    header: &ReceiptHeader,
    items: &[OrderItem],
    payment: &PaymentSummary,
) {
    let paper_width = builder.paper_width();
    let width = paper_width.columns();
    let layout = TableLayout::for_width(paper_width);

    builder
        .align(Alignment::Center)
        .size(TextSize::Double)
        .line(&store.name)
        .feed(1)
        .size(TextSize::Normal)
        .align(Alignment::Left);

    let header_lines = [
        ("Transaction No.:", &header.transaction_no),
        ("Terminal:", &header.terminal),
        ("Cashier:", &header.cashier),
        ("Trans. Date:", &header.trans_date),
        ("ID. No.:", &header.id_no),
        ("Name:", &header.name),
        ("Initial Balance:", &header.initial_balance),
        ("Remaining Balance:", &header.remaining_balance),
    ];
    for (label, value) in header_lines {
        for line in label_value_lines(label, value, width) {
            builder.line(&line);
        }
    }

    builder.divider('-').line(layout.item_header).divider('-');

    for item in items {
        for line in item_lines(item, paper_width) {
            builder.line(&line);
        }
    }

    builder.divider('-');

    let totals = [
        ("Total:", payment.total),
        ("Tap Card:", payment.tap_card),
        ("Amount Tendered:", payment.tendered),
        ("Change:", payment.change),
    ];
    for (label, amount) in totals {
        for line in label_value_lines(label, &amount.to_string(), width) {
            builder.line(&line);
        }
    }

    builder.divider('-').feed(2).align(Alignment::Center);
    for footer in &store.footer {
        builder.line(footer);
    }
}

/// Table rows for one item: price and amount on the first row only
pub fn item_lines(item: &OrderItem, paper_width: PaperWidth) -> Vec<String> {
    let layout = TableLayout::for_width(paper_width);
    let quantity = item.quantity.to_string();
    wrap_text(&item.description, layout.item_wrap_for(&quantity))
        .iter()
        .enumerate()
        .map(|(i, desc)| {
            if i == 0 {
                format!(
                    "{}{:>pw$}{:>aw$}",
                    pad_text(&quantity, desc, layout.item_desc),
                    item.unit_price,
                    item.amount(),
                    pw = layout.item_price,
                    aw = layout.item_amount,
                )
            } else {
                format!(
                    "{}{}",
                    pad_text("", desc, layout.item_desc),
                    " ".repeat(layout.item_price + layout.item_amount)
                )
            }
        })
        .collect()
}

fn render_kitchen_ticket(builder: &mut ESCPOSBuilder, order_number: &str, items: &[OrderItem]) {
    let paper_width = builder.paper_width();
    let layout = TableLayout::for_width(paper_width);
    let desc_width = layout.kitchen_wrap(paper_width.columns());

    builder
        .align(Alignment::Center)
        .size(TextSize::Double)
        .line("KITCHEN")
        .feed(1)
        .size(TextSize::Normal)
        .size(TextSize::Triple)
        .line(order_number)
        .size(TextSize::Normal)
        .align(Alignment::Left);

    builder
        .divider('-')
        .line(layout.kitchen_header)
        .divider('-');

    for item in items {
        for (i, desc) in wrap_text(&item.description, desc_width).iter().enumerate() {
            let quantity = if i == 0 {
                item.quantity.to_string()
            } else {
                String::new()
            };
            builder.line(&format!(
                "{:>qw$}{:gap$}{}",
                quantity,
                "",
                desc,
                qw = layout.kitchen_qty,
                gap = layout.kitchen_gap
            ));
        }
    }

    builder.divider('-');
}

fn render_meal_stub(
    builder: &mut ESCPOSBuilder,
    kind: MealKind,
    number: &str,
    date: &str,
    order_number: &str,
) {
    let width = builder.paper_width().columns();
    let (label, caption) = match kind {
        MealKind::OrderNumber => (format!("Order Num: {}", number), order_number),
        other => (format!("Food Stub Num: {}", number), other.caption()),
    };

    builder.align(Alignment::Left).divider('-');
    for line in label_value_lines(&label, date, width) {
        builder.line(&line);
    }
    builder
        .feed(1)
        .size(TextSize::Triple)
        .line(caption)
        .size(TextSize::Normal)
        .feed(1)
        .divider('-');
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pad_text_aligns_value_end() {
        let line = pad_text("Terminal:", "Cashier", 48);
        assert_eq!(line.len(), 48);
        assert!(line.starts_with("Terminal:"));
        assert!(line.ends_with(" Cashier"));
    }

    #[test]
    fn test_pad_text_overlong_value_is_not_truncated() {
        assert_eq!(pad_text("Name:", "ABCDEFGH", 8), "Name:ABCDEFGH");
    }

    #[test]
    fn test_wrap_short_text_unchanged() {
        assert_eq!(wrap_text("Spaghetti", 18), vec!["Spaghetti"]);
        assert_eq!(wrap_text("exactly eighteen!!", 18), vec!["exactly eighteen!!"]);
    }

    #[test]
    fn test_wrap_breaks_at_last_space() {
        assert_eq!(
            wrap_text("Chicken Adobo with Garlic Rice", 18),
            vec!["Chicken Adobo with", "Garlic Rice"]
        );
    }

    #[test]
    fn test_wrap_forced_break_without_space() {
        assert_eq!(
            wrap_text("ABCDEFGHIJKLMNOPQRSTUVWXYZ", 10),
            vec!["ABCDEFGHIJ", "KLMNOPQRST", "UVWXYZ"]
        );
    }

    #[test]
    fn test_wrap_leading_space_adds_no_empty_line() {
        assert_eq!(
            wrap_text(" ABCDEFGHIJKLMNOP", 10),
            vec!["ABCDEFGHIJ", "KLMNOP"]
        );
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_cents(1000).to_string(), "10.00");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-250).to_string(), "-2.50");
        assert_eq!(Money::from_decimal(7.5).to_string(), "7.50");
        assert_eq!(format!("{:>8}", Money::from_cents(1500)), "   15.00");
    }

    #[test]
    fn test_money_arithmetic_never_overflows() {
        let item = OrderItem::new(4_000_000_000, "x", Money::from_decimal(1e12));
        assert_eq!(item.checked_amount(), None);
        assert_eq!(item.amount(), Money::MAX);

        assert_eq!(Money::MAX.checked_add(Money::from_cents(1)), None);
        assert_eq!(Money::MAX + Money::from_cents(1), Money::MAX);
        assert_eq!(
            Money::from_cents(250).checked_mul(3),
            Some(Money::from_cents(750))
        );
    }

    #[test]
    fn test_item_lines_first_row_carries_price_and_amount() {
        let item = OrderItem::new(2, "Spaghetti", Money::from_cents(500));
        let lines = item_lines(&item, PaperWidth::Width80mm);
        assert_eq!(lines.len(), 1);
        assert_eq!(
            lines[0],
            format!("2{:>19}{:>12}{:>15}", "Spaghetti", "5.00", "10.00")
        );
    }

    #[test]
    fn test_item_lines_continuation_keeps_columns() {
        let item = OrderItem::new(1, "Chicken Adobo with Garlic Rice", Money::from_cents(12000));
        let lines = item_lines(&item, PaperWidth::Width80mm);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), lines[1].len());
        assert!(lines[0].ends_with("120.00"));
        assert!(lines[1].trim_start().starts_with("Garlic Rice"));
        assert!(lines[1].trim_end().ends_with("Garlic Rice"));
    }

    #[test]
    fn test_narrow_item_lines_fit_58mm() {
        let item = OrderItem::new(12, "Chicken Adobo with Garlic Rice", Money::from_cents(12000));
        let lines = item_lines(&item, PaperWidth::Width58mm);
        assert_eq!(lines[0], format!("12{:>12}{:>8}{:>10}", "Chicken", "120.00", "1440.00"));
        assert!(lines.iter().all(|l| l.len() == 32));
    }

    #[test]
    fn test_table_headers_span_paper() {
        assert_eq!(TableLayout::for_width(PaperWidth::Width80mm).item_header.len(), 48);
        assert_eq!(TableLayout::for_width(PaperWidth::Width58mm).item_header.len(), 32);
        assert_eq!(TableLayout::for_width(PaperWidth::Width80mm).kitchen_wrap(48), 17);
        assert_eq!(TableLayout::for_width(PaperWidth::Width58mm).kitchen_wrap(32), 26);
    }

    #[test]
    fn test_label_value_stacks_when_too_wide() {
        assert_eq!(
            label_value_lines("Order Num: 20241009C0005", "2024/12/25", 32),
            vec![
                "Order Num: 20241009C0005".to_string(),
                format!("{:>32}", "2024/12/25")
            ]
        );
        assert_eq!(label_value_lines("Total:", "47.50", 32).len(), 1);
    }

    #[test]
    fn test_payment_defaults_to_exact_tender() {
        let order = Order::sample();
        let payment = order.payment();
        assert_eq!(payment.total, Money::from_cents(4750));
        assert_eq!(payment.tendered, payment.total);
        assert_eq!(payment.change, Money::ZERO);
    }

    #[test]
    fn test_default_plan_order() {
        let docs = DocumentPlan::default().build(&Order::sample(), &StoreProfile::default());
        assert_eq!(docs.len(), 6);
        assert!(matches!(docs[0], ReceiptDocument::CustomerReceipt { .. }));
        assert!(matches!(
            docs[1],
            ReceiptDocument::MealStub { kind: MealKind::OrderNumber, .. }
        ));
        assert!(matches!(docs[5], ReceiptDocument::KitchenTicket { .. }));
    }
}
