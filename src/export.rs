use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::venue::Venue;

/// Write venues to `path`, replacing any existing file. Writes nothing for
/// an empty list.
pub fn save_venues_to_csv(venues: &[Venue], path: &Path) -> Result<usize> {
    if venues.is_empty() {
        info!("No venues to save to CSV");
        return Ok(0);
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for venue in venues {
        writer.serialize(venue)?;
    }
    writer.flush()?;

    info!("Saved {} venues to '{}'", venues.len(), path.display());
    Ok(venues.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn venue(name: &str, rating: Option<f64>) -> Venue {
        Venue {
            name: name.into(),
            location: "San Diego, CA".into(),
            price: "$$".into(),
            capacity: "200".into(),
            rating,
            reviews: Some(12),
            description: "Rooftop, with views".into(),
        }
    }

    #[test]
    fn writes_header_and_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("venues.csv");
        let n = save_venues_to_csv(&[venue("A Hall", Some(4.5)), venue("B Barn", None)], &path)
            .unwrap();
        assert_eq!(n, 2);

        let body = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(
            lines[0],
            "name,location,price,capacity,rating,reviews,description"
        );
        assert_eq!(
            lines[1],
            "A Hall,\"San Diego, CA\",$$,200,4.5,12,\"Rooftop, with views\""
        );
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn overwrites_previous_export() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("venues.csv");
        save_venues_to_csv(&[venue("A", None), venue("B", None)], &path).unwrap();
        save_venues_to_csv(&[venue("C", None)], &path).unwrap();
        let body = std::fs::read_to_string(&path).unwrap();
        assert_eq!(body.lines().count(), 2);
        assert!(body.contains("C,"));
    }

    #[test]
    fn empty_list_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("venues.csv");
        assert_eq!(save_venues_to_csv(&[], &path).unwrap(), 0);
        assert!(!path.exists());
    }
}
