//! Receipt line-item extraction and classification
//!
//! Works on text already produced by an OCR engine. Each line is checked
//! against a deny-list (totals, tax, payment lines, dates, codes), then three
//! layouts are tried to pull out a (description, amount) pair:
//! 1. `Coffee $4.50`      amount trailing
//! 2. `4.50 Coffee`       amount leading
//! 3. `Coffee.....4.50`   dot or space leader
//!
//! Accepted items are classified against a fixed keyword table. Everything
//! here is a pure function of the input text.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::ExtractedLineItem;

/// Category used when no keyword matches
pub const FALLBACK_CATEGORY: &str = "Miscellaneous";
/// Confidence for the fallback category
pub const FALLBACK_CONFIDENCE: f64 = 0.3;
/// Items below this confidence are dropped
pub const MIN_CONFIDENCE: f64 = 0.3;
/// Only items at or above this confidence count toward a split suggestion
pub const SPLIT_CONFIDENCE: f64 = 0.5;
/// Line amounts must be strictly below this
pub const MAX_LINE_AMOUNT: f64 = 10_000.0;
const MIN_DESCRIPTION_LEN: usize = 3;
const MAX_CONFIDENCE: f64 = 0.95;

/// Expense category -> keywords, in tie-break order
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "Meals",
        &[
            "coffee", "latte", "espresso", "cappuccino", "tea", "sandwich", "burger", "pizza",
            "salad", "soup", "breakfast", "lunch", "dinner", "meal", "restaurant", "cafe",
            "bagel", "muffin", "pastry", "juice", "soda", "beer", "wine", "chicken", "steak",
            "fries", "taco", "burrito", "sushi", "dessert", "entree", "appetizer", "water",
        ],
    ),
    (
        "Ground Transportation",
        &[
            "uber", "lyft", "taxi", "cab", "ride", "shuttle", "bus", "train", "rail", "metro",
            "subway", "transit", "fare", "toll", "car rental", "rental car",
        ],
    ),
    (
        "Fuel",
        &[
            "gas", "gasoline", "fuel", "diesel", "unleaded", "regular", "premium", "petrol",
            "pump", "gallon", "gallons",
        ],
    ),
    (
        "Lodging",
        &[
            "hotel", "room", "lodging", "motel", "inn", "resort", "suite", "accommodation",
            "resort fee", "occupancy",
        ],
    ),
    (
        "Airfare",
        &[
            "airline", "airlines", "flight", "airfare", "baggage", "bag fee", "seat", "boarding",
            "upgrade",
        ],
    ),
    ("Parking", &["parking", "garage", "valet", "meter"]),
    (
        "Office Supplies",
        &[
            "paper", "pen", "pens", "printer", "ink", "toner", "stapler", "staples", "notebook",
            "folder", "folders", "envelope", "envelopes", "binder", "supplies", "office",
        ],
    ),
    (
        "Entertainment",
        &["ticket", "tickets", "movie", "concert", "admission", "event", "show"],
    ),
    (
        "Communication",
        &[
            "phone", "internet", "wifi", "wi-fi", "data", "mobile", "postage", "shipping",
            "courier",
        ],
    ),
];

const AMOUNT: &str = r"(?P<amount>(?:\d{1,3}(?:,\d{3})+|\d+)\.\d{2})";

fn trailing_amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"^(?P<desc>.+?)\s+\$?\s*{}\s*$", AMOUNT)).expect("valid regex")
    })
}

fn leading_amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"^\$?\s*{}\s+(?P<desc>.+)$", AMOUNT)).expect("valid regex")
    })
}

fn leader_amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"^(?P<desc>.+?)[\s.]{{2,}}\$?\s*{}\s*$", AMOUNT))
            .expect("valid regex")
    })
}

/// Lines that are never purchasable items
fn deny_list() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        [
            // Totals, taxes, tips, tendering
            r"(?i)\b(sub\s*-?\s*total|total|tax|vat|gst|hst|tip|gratuity|change|cash|tender(ed)?|balance|amount\s+due|due)\b",
            // Payment method lines
            r"(?i)\b(visa|master\s*card|amex|american\s+express|discover|debit|credit|card|payment|paid|auth(orization)?|approval|approved|ref(erence)?\s*#?)\b",
            // Receipt chrome
            r"(?i)\b(thank\s+you|receipt|invoice|transaction|server|cashier|table|guests?|order\s*#)\b",
            // Masked card numbers
            r"(?i)(\*{2,}|x{3,})\s*\d{2,4}",
            // Pure dates, optionally with a time
            r"(?i)^\s*\d{1,4}[/.\-]\d{1,2}[/.\-]\d{1,4}(\s+\d{1,2}:\d{2}(:\d{2})?\s*([ap]\.?m\.?)?)?\s*$",
            // Pure times
            r"(?i)^\s*\d{1,2}:\d{2}(:\d{2})?\s*([ap]\.?m\.?)?\s*$",
            // Phone numbers
            r"^\s*\(?\d{3}\)?[\s.\-]?\d{3}[\s.\-]\d{4}\s*$",
            // Codes: a single token of digits/capitals/dashes containing a digit
            r"^\s*[#*]?[A-Z0-9\-]*\d[A-Z0-9\-]*\s*$",
        ]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("valid regex"))
        .collect()
    })
}

fn total_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?i)^\s*(grand\s+)?total\b[^0-9$]*\$?\s*{}",
            AMOUNT
        ))
        .expect("valid regex")
    })
}

/// True if a line should never be read as an item
pub fn is_denied_line(line: &str) -> bool {
    deny_list().iter().any(|re| re.is_match(line))
}

fn parse_amount(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse().ok()
}

/// Trim separators and noise from a candidate description
fn clean_description(raw: &str) -> String {
    let trimmed = raw.trim_matches(|c: char| !c.is_alphanumeric());
    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Try the three layouts in order; the first valid candidate wins
fn parse_line(line: &str) -> Option<(String, f64)> {
    let layouts = [
        trailing_amount_re(),
        leading_amount_re(),
        leader_amount_re(),
    ];

    layouts.iter().find_map(|re| {
        let caps = re.captures(line)?;
        let amount = parse_amount(caps.name("amount")?.as_str())?;
        let description = clean_description(caps.name("desc")?.as_str());

        let valid = amount > 0.0
            && amount < MAX_LINE_AMOUNT
            && description.chars().count() >= MIN_DESCRIPTION_LEN;
        valid.then_some((description, amount))
    })
}

/// Category guess for a line item description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryGuess {
    pub category: String,
    pub confidence: f64,
    pub keywords: Vec<String>,
}

/// Classify free text against the keyword table
///
/// Keywords match on word boundaries. The category with the most keyword hits
/// wins, earlier table entries winning ties. Confidence is
/// `min(0.95, 0.5 + 0.15 * hits)`, or 0.3 for the fallback category.
pub fn classify_category(text: &str) -> CategoryGuess {
    let words: String = text
        .to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let haystack = format!(" {} ", words);

    let mut best: Option<(&str, Vec<String>)> = None;
    for (category, keywords) in CATEGORY_KEYWORDS {
        let hits: Vec<String> = keywords
            .iter()
            .filter(|kw| haystack.contains(&format!(" {} ", kw)))
            .map(|kw| kw.to_string())
            .collect();

        if hits.is_empty() {
            continue;
        }
        let better = best
            .as_ref()
            .map_or(true, |(_, best_hits)| hits.len() > best_hits.len());
        if better {
            best = Some((*category, hits));
        }
    }

    match best {
        Some((category, keywords)) => CategoryGuess {
            category: category.to_string(),
            confidence: (0.5 + 0.15 * keywords.len() as f64).min(MAX_CONFIDENCE),
            keywords,
        },
        None => CategoryGuess {
            category: FALLBACK_CATEGORY.to_string(),
            confidence: FALLBACK_CONFIDENCE,
            keywords: Vec::new(),
        },
    }
}

/// Pull classified line items out of raw OCR text
///
/// Empty text yields no items; unparseable lines are skipped.
pub fn extract_line_items(text: &str) -> Vec<ExtractedLineItem> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_denied_line(line))
        .filter_map(parse_line)
        .map(|(description, amount)| {
            let guess = classify_category(&description);
            ExtractedLineItem {
                description,
                amount,
                suggested_category: guess.category,
                confidence: guess.confidence,
                keywords: guess.keywords,
            }
        })
        .filter(|item| item.confidence >= MIN_CONFIDENCE)
        .collect()
}

/// Amount on the first TOTAL (or GRAND TOTAL) line; SUBTOTAL lines are ignored
pub fn detect_total(text: &str) -> Option<f64> {
    text.lines().find_map(|line| {
        let caps = total_line_re().captures(line)?;
        parse_amount(caps.name("amount")?.as_str())
    })
}

/// Propose a split only when at least two distinct confident categories exist
pub fn should_suggest_split(items: &[ExtractedLineItem]) -> bool {
    if items.len() < 2 {
        return false;
    }
    let confident: BTreeSet<&str> = items
        .iter()
        .filter(|item| item.confidence >= SPLIT_CONFIDENCE)
        .map(|item| item.suggested_category.as_str())
        .collect();
    confident.len() >= 2
}

/// One proposed split line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitLine {
    pub category: String,
    pub amount: f64,
    pub item_count: usize,
}

/// Per-category totals of confident items, when a split is warranted
pub fn split_suggestion(items: &[ExtractedLineItem]) -> Vec<SplitLine> {
    if !should_suggest_split(items) {
        return Vec::new();
    }

    let mut by_category: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for item in items.iter().filter(|i| i.confidence >= SPLIT_CONFIDENCE) {
        let entry = by_category
            .entry(item.suggested_category.as_str())
            .or_insert((0.0, 0));
        entry.0 += item.amount;
        entry.1 += 1;
    }

    by_category
        .into_iter()
        .map(|(category, (amount, item_count))| SplitLine {
            category: category.to_string(),
            amount,
            item_count,
        })
        .collect()
}

/// Everything recovered from one receipt's OCR text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptExtraction {
    pub items: Vec<ExtractedLineItem>,
    pub suggest_split: bool,
    pub detected_total: Option<f64>,
    pub splits: Vec<SplitLine>,
}

pub fn extract_receipt(text: &str) -> ReceiptExtraction {
    let items = extract_line_items(text);
    ReceiptExtraction {
        suggest_split: should_suggest_split(&items),
        detected_total: detect_total(text),
        splits: split_suggestion(&items),
        items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(category: &str, confidence: f64) -> ExtractedLineItem {
        ExtractedLineItem {
            description: "item".into(),
            amount: 10.0,
            suggested_category: category.into(),
            confidence,
            keywords: vec![],
        }
    }

    #[test]
    fn test_empty_text_has_no_items() {
        assert!(extract_line_items("").is_empty());
        assert!(extract_line_items("\n\n   \n").is_empty());
    }

    #[test]
    fn test_total_line_is_filtered() {
        let items = extract_line_items("TOTAL $45.00\nCoffee $4.50");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].description, "Coffee");
        assert_eq!(items[0].amount, 4.50);
        assert_eq!(items[0].suggested_category, "Meals");
    }

    #[test]
    fn test_three_layouts() {
        let text = "Turkey Sandwich $8.95\n12.00 Parking garage\nPrinter paper.......23.10";
        let items = extract_line_items(text);
        assert_eq!(items.len(), 3);

        assert_eq!(items[0].description, "Turkey Sandwich");
        assert_eq!(items[0].amount, 8.95);

        assert_eq!(items[1].description, "Parking garage");
        assert_eq!(items[1].amount, 12.00);
        assert_eq!(items[1].suggested_category, "Parking");

        assert_eq!(items[2].description, "Printer paper");
        assert_eq!(items[2].amount, 23.10);
        assert_eq!(items[2].suggested_category, "Office Supplies");
    }

    #[test]
    fn test_deny_list_lines() {
        let text = "\
Subtotal 12.50
Sales Tax 1.10
VISA ****1234 13.60
Cash 20.00
03/14/2024 12:31 PM
#4471-22
(206) 555-0134
Thank you for visiting 0.00";
        assert!(extract_line_items(text).is_empty());
    }

    #[test]
    fn test_amount_and_description_bounds() {
        // Too expensive, zero, and too-short description
        let text = "Conference booth 10000.00\nFree refill 0.00\nAB 5.00";
        assert!(extract_line_items(text).is_empty());

        let items = extract_line_items("Conference booth 9,999.99");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].amount, 9999.99);
    }

    #[test]
    fn test_unknown_item_falls_back_to_miscellaneous() {
        let items = extract_line_items("Widget assembly 14.00");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].suggested_category, FALLBACK_CATEGORY);
        assert_eq!(items[0].confidence, FALLBACK_CONFIDENCE);
        assert!(items[0].keywords.is_empty());
    }

    #[test]
    fn test_classify_uber_ride() {
        let guess = classify_category("Uber ride to airport");
        assert_eq!(guess.category, "Ground Transportation");
        assert!(guess.confidence >= 0.5);
        assert!(guess.keywords.contains(&"uber".to_string()));
    }

    #[test]
    fn test_classify_confidence_formula_and_cap() {
        let one = classify_category("latte");
        assert!((one.confidence - 0.65).abs() < 1e-9);

        let many = classify_category("coffee latte bagel muffin sandwich");
        assert_eq!(many.confidence, 0.95);
    }

    #[test]
    fn test_classify_uses_word_boundaries() {
        // "vegas" must not count as "gas"
        let guess = classify_category("Las Vegas souvenir");
        assert_eq!(guess.category, FALLBACK_CATEGORY);
    }

    #[test]
    fn test_classify_is_deterministic() {
        let text = "Hotel room night 1 189.00\nRoom service dinner 42.00\nUnleaded fuel 51.20";
        assert_eq!(extract_line_items(text), extract_line_items(text));
        assert_eq!(classify_category("taxi"), classify_category("taxi"));
    }

    #[test]
    fn test_should_suggest_split() {
        assert!(should_suggest_split(&[item("Meals", 0.9), item("Fuel", 0.9)]));
        assert!(!should_suggest_split(&[item("Meals", 0.9), item("Meals", 0.2)]));
        assert!(!should_suggest_split(&[item("Meals", 0.9)]));
        assert!(!should_suggest_split(&[item("Meals", 0.9), item("Meals", 0.9)]));
        assert!(!should_suggest_split(&[
            item("Meals", 0.9),
            item(FALLBACK_CATEGORY, 0.3)
        ]));
    }

    #[test]
    fn test_split_suggestion_groups_confident_items() {
        let items = vec![
            item("Meals", 0.65),
            item("Meals", 0.8),
            item("Fuel", 0.65),
            item(FALLBACK_CATEGORY, 0.3),
        ];
        let splits = split_suggestion(&items);
        assert_eq!(splits.len(), 2);
        assert_eq!(splits[0].category, "Fuel");
        assert_eq!(splits[1].category, "Meals");
        assert_eq!(splits[1].amount, 20.0);
        assert_eq!(splits[1].item_count, 2);

        assert!(split_suggestion(&[item("Meals", 0.9)]).is_empty());
    }

    #[test]
    fn test_detect_total_skips_subtotal() {
        let text = "Coffee 4.50\nSubtotal 4.50\nTax 0.45\nTOTAL $4.95";
        assert_eq!(detect_total(text), Some(4.95));
        assert_eq!(detect_total("Coffee 4.50"), None);
    }

    #[test]
    fn test_extract_receipt_mixed_categories() {
        let text = "\
SHELL STATION 0412
Unleaded gallons 45.10
Coffee 2.75
TOTAL 47.85";
        let receipt = extract_receipt(text);
        assert_eq!(receipt.items.len(), 2);
        assert!(receipt.suggest_split);
        assert_eq!(receipt.detected_total, Some(47.85));
        assert_eq!(receipt.splits.len(), 2);
    }
}
