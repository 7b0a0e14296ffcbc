// Layout properties of rendered receipts, checked through the preview decoder

use pos_print_relay::escpos::{parse_escpos, PaperWidth, ReceiptElement, TextSize};
use pos_print_relay::receipt::{
    item_lines, render, render_all, wrap_text, DocumentPlan, MealKind, Money, Order, OrderItem,
    ReceiptDocument, StoreProfile,
};
use pretty_assertions::assert_eq;

const DESCRIPTIONS: &[&str] = &[
    "Spaghetti",
    "Chicken Adobo with Garlic Rice",
    "Pancit Canton Special Bilao for Sharing",
    "Supercalifragilisticexpialidocious",
    "A B C D E F G H I J K L M N O P",
    "",
];

#[test]
fn test_wrap_lines_fit_unless_single_word_is_longer() {
    for text in DESCRIPTIONS {
        for max in [5, 10, 18, 30] {
            for line in wrap_text(text, max) {
                let fits = line.chars().count() <= max;
                let single_long_word = !line.contains(' ') && line.chars().count() > max;
                assert!(fits || single_long_word, "{:?} wrapped at {} gave {:?}", text, max, line);
            }
        }
    }
}

#[test]
fn test_wrap_keeps_every_word() {
    for text in DESCRIPTIONS.iter().filter(|t| t.split_whitespace().all(|w| w.len() <= 18)) {
        let rejoined = wrap_text(text, 18).join(" ");
        assert_eq!(
            rejoined.split_whitespace().collect::<Vec<_>>(),
            text.split_whitespace().collect::<Vec<_>>()
        );
    }
}

#[test]
fn test_total_is_sum_of_displayed_amounts() {
    let cases = [
        vec![(2, 500), (1, 1500)],
        vec![(3, 333), (7, 1), (1, 0)],
        vec![(1, 10), (1, 20), (1, 30), (4, 2499)],
        vec![(12, 99_999)],
    ];

    for case in cases {
        let items: Vec<OrderItem> = case
            .iter()
            .map(|(q, cents)| OrderItem::new(*q, "Item", Money::from_cents(*cents)))
            .collect();
        let order = Order {
            items: items.clone(),
            ..Order::sample()
        };

        let displayed: i64 = items
            .iter()
            .map(|item| {
                let first = &item_lines(item, PaperWidth::Width80mm)[0];
                let amount = first.split_whitespace().last().unwrap_or_default();
                (amount.parse::<f64>().unwrap() * 100.0).round() as i64
            })
            .sum();

        assert_eq!(order.total().cents(), displayed);
        assert_eq!(order.total(), items.iter().map(OrderItem::amount).sum());
    }
}

#[test]
fn test_sample_job_preview() {
    let order = Order::sample();
    let documents = DocumentPlan::default().build(&order, &StoreProfile::default());
    let streams = render_all(&documents, PaperWidth::Width80mm);
    assert_eq!(streams.len(), 6);

    for stream in &streams {
        let parsed = parse_escpos(stream, PaperWidth::Width80mm);
        assert_eq!(parsed.cut_count(), 1);
        assert_eq!(parsed.elements.last(), Some(&ReceiptElement::Cut));

        for element in &parsed.elements {
            if let ReceiptElement::Line {
                content,
                size: TextSize::Normal,
                ..
            } = element
            {
                assert!(content.chars().count() <= 48, "line too wide: {:?}", content);
            }
        }
    }

    let receipt = parse_escpos(&streams[0], PaperWidth::Width80mm);
    let lines = receipt.lines();
    assert_eq!(lines[0], "DUALTECH");
    assert!(lines.contains(&"Qty          Desc           Price         Amount"));
    let total = lines.iter().find(|l| l.starts_with("Total:")).unwrap();
    assert!(total.ends_with("47.50"));
    let change = lines.iter().find(|l| l.starts_with("Change:")).unwrap();
    assert!(change.ends_with("0.00"));
}

#[test]
fn test_meal_stub_layout() {
    let order = Order::sample();
    let stub = ReceiptDocument::MealStub {
        kind: MealKind::Lunch,
        number: order.stub_number.clone(),
        date: order.stub_date.clone(),
        order_number: order.order_number.clone(),
    };

    let parsed = parse_escpos(&render(&stub, PaperWidth::Width80mm), PaperWidth::Width80mm);
    let header = format!("Food Stub Num: 20241009C0005{:>20}", "2024/12/25");
    assert_eq!(header.len(), 48);
    assert!(parsed.lines().contains(&header.as_str()));

    let caption = parsed.elements.iter().find_map(|e| match e {
        ReceiptElement::Line {
            content,
            size: TextSize::Triple,
            ..
        } => Some(content.as_str()),
        _ => None,
    });
    assert_eq!(caption, Some("Lunch - Meal"));
}

#[test]
fn test_kitchen_ticket_columns() {
    let ticket = ReceiptDocument::KitchenTicket {
        order_number: "20241009C00005".to_string(),
        items: vec![
            OrderItem::new(2, "Spaghetti", Money::from_cents(500)),
            OrderItem::new(10, "Chicken Adobo with Garlic Rice", Money::from_cents(12000)),
        ],
    };

    let parsed = parse_escpos(&render(&ticket, PaperWidth::Width80mm), PaperWidth::Width80mm);
    let lines = parsed.lines();

    assert!(lines.contains(&"   Quantity                    Description"));
    assert!(lines.contains(&format!("{:>8}{:23}{}", 2, "", "Spaghetti").as_str()));
    // Continuation rows leave the quantity column blank
    let adobo = lines.iter().position(|l| l.ends_with("Chicken Adobo")).unwrap();
    assert!(lines[adobo].starts_with("      10"));
    assert!(lines[adobo + 1].starts_with(&" ".repeat(31)));
}

#[test]
fn test_58mm_job_fits_paper() {
    let mut order = Order::sample();
    order
        .items
        .push(OrderItem::new(12, "Pancit Canton Special Bilao for Sharing", Money::from_cents(45000)));
    let documents = DocumentPlan::default().build(&order, &StoreProfile::default());

    for stream in render_all(&documents, PaperWidth::Width58mm) {
        let parsed = parse_escpos(&stream, PaperWidth::Width58mm);
        assert_eq!(parsed.cut_count(), 1);
        for element in &parsed.elements {
            if let ReceiptElement::Line {
                content,
                size: TextSize::Normal,
                ..
            } = element
            {
                assert!(content.chars().count() <= 32, "line too wide: {:?}", content);
            }
        }
    }
}

#[test]
fn test_58mm_kitchen_descriptions_keep_words() {
    let ticket = ReceiptDocument::KitchenTicket {
        order_number: "20241009C00005".to_string(),
        items: vec![
            OrderItem::new(2, "Spaghetti", Money::from_cents(500)),
            OrderItem::new(10, "Chicken Adobo with Garlic Rice", Money::from_cents(12000)),
        ],
    };

    let parsed = parse_escpos(&render(&ticket, PaperWidth::Width58mm), PaperWidth::Width58mm);
    let lines = parsed.lines();

    assert!(lines.contains(&" Qty  Description"));
    assert!(lines.contains(&"   2  Spaghetti"));
    assert!(lines.contains(&"  10  Chicken Adobo with Garlic"));
    assert!(lines.contains(&"      Rice"));
}

#[test]
fn test_58mm_stub_date_moves_below_label() {
    let order = Order::sample();
    let stub = ReceiptDocument::MealStub {
        kind: MealKind::Dinner,
        number: order.stub_number.clone(),
        date: order.stub_date.clone(),
        order_number: order.order_number.clone(),
    };

    let parsed = parse_escpos(&render(&stub, PaperWidth::Width58mm), PaperWidth::Width58mm);
    let lines = parsed.lines();
    let label = lines
        .iter()
        .position(|l| *l == "Food Stub Num: 20241009C0005")
        .expect("stub label line");
    assert_eq!(lines[label + 1], format!("{:>32}", "2024/12/25"));
}
