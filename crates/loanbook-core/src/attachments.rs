//! Attachment link encoding.
//!
//! Links are stored in a single cell as a JSON array. Older sheets hold a
//! plain comma-separated list instead, which is still accepted on read.

use tracing::debug;
use url::Url;

/// Base URL for direct image views of Drive files.
const DRIVE_VIEW_BASE: &str = "https://drive.google.com/uc";

/// Serializes links for storage in a cell.
pub fn encode_links(links: &[String]) -> String {
    if links.is_empty() {
        return String::new();
    }
    serde_json::to_string(links).unwrap_or_default()
}

/// Parses a stored cell back into links.
///
/// Never fails: a JSON array is returned as-is, anything else is split on
/// commas with blank entries dropped.
pub fn decode_links(cell: &str) -> Vec<String> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Vec::new();
    }

    match serde_json::from_str::<Vec<String>>(cell) {
        Ok(links) => links,
        Err(e) => {
            debug!("attachment cell is not a JSON array ({}), using legacy format", e);
            cell.split(',')
                .map(str::trim)
                .filter(|link| !link.is_empty())
                .map(String::from)
                .collect()
        }
    }
}

/// Name given to the `index`-th (0-based) file of an upload batch.
pub fn upload_name(prefix: &str, index: usize, file_name: &str) -> String {
    if prefix.is_empty() {
        file_name.to_string()
    } else {
        format!("{}_{}_{}", prefix, index + 1, file_name)
    }
}

/// Shareable direct-view link for a Drive file.
pub fn drive_view_link(file_id: &str) -> String {
    match Url::parse_with_params(DRIVE_VIEW_BASE, &[("export", "view"), ("id", file_id)]) {
        Ok(url) => url.to_string(),
        Err(_) => format!("{}?export=view&id={}", DRIVE_VIEW_BASE, file_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links() -> Vec<String> {
        vec![
            "https://drive.google.com/uc?export=view&id=abc".to_string(),
            "https://drive.google.com/uc?export=view&id=def".to_string(),
        ]
    }

    #[test]
    fn json_round_trip_keeps_order() {
        let encoded = encode_links(&links());
        assert!(encoded.starts_with('['));
        assert_eq!(decode_links(&encoded), links());
    }

    #[test]
    fn legacy_comma_list_is_accepted() {
        let decoded = decode_links("https://a.example/1.jpg, https://a.example/2.jpg,,");
        assert_eq!(
            decoded,
            vec![
                "https://a.example/1.jpg".to_string(),
                "https://a.example/2.jpg".to_string()
            ]
        );
    }

    #[test]
    fn single_legacy_link_is_not_empty() {
        assert_eq!(decode_links("https://a.example/1.jpg").len(), 1);
    }

    #[test]
    fn blank_cells_decode_to_nothing() {
        assert!(decode_links("").is_empty());
        assert!(decode_links("   ").is_empty());
        assert!(decode_links("[]").is_empty());
        assert_eq!(encode_links(&[]), "");
    }

    #[test]
    fn upload_names() {
        assert_eq!(upload_name("loan_Ravi", 0, "note.jpg"), "loan_Ravi_1_note.jpg");
        assert_eq!(upload_name("", 3, "note.jpg"), "note.jpg");
    }

    #[test]
    fn drive_links() {
        assert_eq!(
            drive_view_link("1AbC"),
            "https://drive.google.com/uc?export=view&id=1AbC"
        );
    }
}
