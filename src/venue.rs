use serde::Serialize;
use serde_json::{Map, Value};

/// Raw key → value mapping as produced by the extractor, before validation.
pub type Candidate = Map<String, Value>;

pub const FIELDS: [&str; 7] = [
    "name",
    "location",
    "price",
    "capacity",
    "rating",
    "reviews",
    "description",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Venue {
    pub name: String,
    pub location: String,
    pub price: String,
    pub capacity: String,
    pub rating: Option<f64>,
    pub reviews: Option<i64>,
    pub description: String,
}

impl Venue {
    /// Build a venue from a candidate that already passed validation.
    /// Text fields missing here (because they were not required) become empty.
    pub fn from_candidate(c: &Candidate) -> Venue {
        Venue {
            name: text(c.get("name")),
            location: text(c.get("location")),
            price: text(c.get("price")),
            capacity: text(c.get("capacity")),
            rating: c.get("rating").and_then(number),
            reviews: c.get("reviews").and_then(integer),
            description: text(c.get("description")),
        }
    }

    /// Rating as stored: absent → 0.0.
    pub fn stored_rating(&self) -> f64 {
        self.rating.unwrap_or(0.0)
    }

    /// Review count as stored: absent → 0.
    pub fn stored_reviews(&self) -> i32 {
        self.reviews
            .map(|r| r.clamp(0, i32::MAX as i64) as i32)
            .unwrap_or(0)
    }
}

fn text(v: Option<&Value>) -> String {
    match v {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn integer(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    }
}
