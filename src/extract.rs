//! CSS-selector extraction of venue candidates from a listing page.

use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{json, Value};

use crate::crawl::PageBatch;
use crate::settings::FieldSelectors;
use crate::venue::Candidate;

/// Compiled selectors for one catalog layout.
pub struct Extractor {
    container: Selector,
    fields: Vec<(&'static str, Selector)>,
    no_results_marker: String,
}

impl Extractor {
    pub fn new(container: &str, fields: &FieldSelectors, no_results_marker: &str) -> Result<Self> {
        let pairs = [
            ("name", &fields.name),
            ("location", &fields.location),
            ("price", &fields.price),
            ("capacity", &fields.capacity),
            ("rating", &fields.rating),
            ("reviews", &fields.reviews),
            ("description", &fields.description),
        ];
        let fields = pairs
            .into_iter()
            .map(|(key, css)| Ok((key, parse_selector(css)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Extractor {
            container: parse_selector(container)?,
            fields,
            no_results_marker: no_results_marker.to_string(),
        })
    }

    pub fn extract(&self, html: &str) -> PageBatch {
        let doc = Html::parse_document(html);

        if !self.no_results_marker.is_empty() {
            let text: String = doc.root_element().text().collect();
            if text.contains(&self.no_results_marker) {
                return PageBatch {
                    candidates: Vec::new(),
                    end_of_results: true,
                };
            }
        }

        let candidates = doc
            .select(&self.container)
            .map(|el| self.candidate(el))
            .filter(|c| !c.is_empty())
            .collect();

        PageBatch {
            candidates,
            end_of_results: false,
        }
    }

    /// Fields whose selector misses, or whose number won't parse, stay absent.
    fn candidate(&self, el: ElementRef<'_>) -> Candidate {
        let mut c = Candidate::new();
        for (key, sel) in &self.fields {
            let Some(raw) = el.select(sel).next().map(element_text) else {
                continue;
            };
            if raw.is_empty() {
                continue;
            }
            let value = match *key {
                "rating" => first_number(&raw).map(|n| json!(n)),
                "reviews" => first_integer(&raw).map(|n| json!(n)),
                _ => Some(Value::String(raw)),
            };
            if let Some(v) = value {
                c.insert(key.to_string(), v);
            }
        }
        c
    }
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector '{}': {}", css, e))
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(|t| t.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_number(s: &str) -> Option<f64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());
    re.find(s)?.as_str().parse().ok()
}

fn first_integer(s: &str) -> Option<i64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\d[\d,]*").unwrap());
    re.find(s)?.as_str().replace(',', "").parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use std::collections::HashMap;

    fn extractor() -> Extractor {
        let s = Settings::from_vars(&HashMap::new()).unwrap();
        Extractor::new(&s.container_selector, &s.selectors, &s.no_results_marker).unwrap()
    }

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    #[test]
    fn listing_page() {
        let batch = extractor().extract(&fixture("listing"));
        assert!(!batch.end_of_results);
        assert_eq!(batch.candidates.len(), 3);

        let first = &batch.candidates[0];
        assert_eq!(first["name"], "The Ivory Hall");
        assert_eq!(first["location"], "San Diego, CA");
        assert_eq!(first["rating"], json!(4.8));
        assert_eq!(first["reviews"], json!(1204));
    }

    #[test]
    fn listing_with_missing_rating_is_partial() {
        let batch = extractor().extract(&fixture("listing"));
        let third = &batch.candidates[2];
        assert_eq!(third["name"], "Harbor Loft");
        assert!(third.get("rating").is_none());
    }

    #[test]
    fn no_results_page() {
        let batch = extractor().extract(&fixture("no_results"));
        assert!(batch.end_of_results);
        assert!(batch.candidates.is_empty());
    }

    #[test]
    fn bad_selector_is_rejected() {
        let mut s = Settings::from_vars(&HashMap::new()).unwrap().selectors;
        s.price = "[[".into();
        assert!(Extractor::new("div", &s, "").is_err());
    }

    #[test]
    fn numbers_from_free_text() {
        assert_eq!(first_number("Rated 4.5 out of 5"), Some(4.5));
        assert_eq!(first_integer("(2,310 reviews)"), Some(2310));
        assert_eq!(first_integer("no reviews yet"), None);
    }
}
