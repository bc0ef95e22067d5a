// src/agents/mod.rs
pub mod github;
pub mod google;
pub mod reddit;
pub mod registry;
pub mod types;

pub use registry::AdapterRegistry;
pub use types::{Crawl, RawResult, SourceAdapter, SourceUnavailable};

use once_cell::sync::OnceCell;

/// Strip markup and collapse whitespace in a scraped fragment.
pub fn clean_fragment(s: &str) -> String {
    // HTML entity decode first, then drop any leftover tags.
    let decoded = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    let stripped = re_tags.replace_all(&decoded, " ");

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("ws regex"));
    re_ws.replace_all(&stripped, " ").trim().to_string()
}

/// Cap snippet/body text carried into the pipeline. Scoring prompts re-trim
/// further; this bound just keeps raw bundles reasonably sized.
pub fn cap_content(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_fragment_strips_tags_and_entities() {
        let s = "<b>Rust&nbsp;1.80</b> released &amp; <i>stable</i>";
        assert_eq!(clean_fragment(s), "Rust 1.80 released & stable");
    }

    #[test]
    fn cap_content_is_char_aware() {
        assert_eq!(cap_content("héllo", 3), "hél");
        assert_eq!(cap_content("ok", 10), "ok");
    }
}
