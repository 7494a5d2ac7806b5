//! Keyword rule layer
//!
//! The rule table doubles as the weak labeler for the learned layer: anything
//! it can label becomes a training target, and at prediction time it always
//! wins over the classifier.

use crate::models::{Category, Transaction};

/// Produces weak labels from transaction text.
///
/// Implementations must be pure: the same text always yields the same label.
pub trait WeakLabeler: Send + Sync {
    /// Label a cleaned description, or abstain with `None`
    fn label(&self, text: &str) -> Option<Category>;

    /// Human-readable name for logs
    fn name(&self) -> &'static str;
}

/// Default keyword table, in priority order. The first category with any
/// matching keyword wins.
const KEYWORD_TABLE: &[(Category, &[&str])] = &[
    (
        Category::FoodAndDining,
        &[
            "swiggy", "zomato", "starbucks", "mcdonalds", "kfc", "pizza", "burger", "cafe",
            "restaurant", "coffee", "dining",
        ],
    ),
    (
        Category::Transportation,
        &[
            "uber", "ola", "rapido", "metro", "fuel", "petrol", "pump", "parking", "toll",
            "irctc", "rail",
        ],
    ),
    (
        Category::Shopping,
        &[
            "amazon", "flipkart", "myntra", "zara", "h&m", "store", "mart", "market", "mall",
            "ikea",
        ],
    ),
    (
        Category::BillsAndUtilities,
        &[
            "electricity", "water", "gas", "broadband", "wifi", "airtel", "jio", "vodafone",
            "bill", "recharge",
        ],
    ),
    (
        Category::Entertainment,
        &[
            "netflix", "prime", "spotify", "movie", "cinema", "bookmyshow", "hotstar", "youtube",
            "game",
        ],
    ),
    (
        Category::HealthAndWellness,
        &[
            "pharmacy", "medplus", "apollo", "doctor", "hospital", "clinic", "gym", "fitness",
            "cult",
        ],
    ),
    (
        Category::Income,
        &["salary", "credit", "refund", "cashback", "interest", "dividend"],
    ),
    (Category::Transfer, &["upi", "transfer", "sent", "paid to"]),
];

/// Case-insensitive substring rules over an ordered category table
#[derive(Debug, Clone)]
pub struct KeywordRules {
    table: Vec<(Category, Vec<String>)>,
}

impl KeywordRules {
    /// Build from a custom ordered table. Keywords are lowercased.
    pub fn new(table: Vec<(Category, Vec<String>)>) -> Self {
        let table = table
            .into_iter()
            .map(|(cat, kws)| (cat, kws.into_iter().map(|k| k.to_lowercase()).collect()))
            .collect();
        Self { table }
    }

    /// Categories in priority order
    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.table.iter().map(|(cat, _)| *cat)
    }

    /// First keyword of `category` found in `text`, for explaining a match
    pub fn matching_keyword(&self, text: &str) -> Option<(Category, &str)> {
        let text = text.to_lowercase();
        self.table.iter().find_map(|(cat, keywords)| {
            keywords
                .iter()
                .find(|kw| text.contains(kw.as_str()))
                .map(|kw| (*cat, kw.as_str()))
        })
    }
}

impl Default for KeywordRules {
    fn default() -> Self {
        Self::new(
            KEYWORD_TABLE
                .iter()
                .map(|(cat, kws)| (*cat, kws.iter().map(|k| k.to_string()).collect()))
                .collect(),
        )
    }
}

impl WeakLabeler for KeywordRules {
    fn label(&self, text: &str) -> Option<Category> {
        self.matching_keyword(text).map(|(cat, _)| cat)
    }

    fn name(&self) -> &'static str {
        "keyword-rules"
    }
}

/// Weak-labeling stage: keep the records the labeler can label, paired with
/// their label. Abstentions are dropped.
pub fn weak_label<'a, L: WeakLabeler + ?Sized>(
    labeler: &L,
    records: &'a [Transaction],
) -> Vec<(&'a str, Category)> {
    records
        .iter()
        .filter_map(|tx| {
            labeler
                .label(&tx.clean_description)
                .map(|cat| (tx.clean_description.as_str(), cat))
        })
        .collect()
}
