//! HTML pruning, Markdown conversion and text cleanup.
//!
//! The pipeline for a fetched page is
//! [`prune_html`] → [`html_to_markdown`] → [`PruningFilter::apply`] → [`clean_content`].

use std::sync::LazyLock;

use regex::{Regex, RegexSet};
use scraper::{ElementRef, Html, Selector};
use sleuth_common::{Result, SleuthError};

static CHROME: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("nav, footer, aside, script, style, form, noscript, svg, iframe")
        .expect("valid selector")
});

static HEADER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("header").expect("valid selector"));

static ROOTS: LazyLock<[Selector; 3]> = LazyLock::new(|| {
    ["main", "article", "body"].map(|s| Selector::parse(s).expect("valid selector"))
});

static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid selector"));

/// Strip page chrome and return the inner HTML of the main content root.
///
/// The root is the first of `<main>`, `<article>` or `<body>` present.
/// A `<header>` is chrome only outside `<main>`/`<article>`; inside them it
/// usually carries the headline.
pub fn prune_html(html: &str) -> String {
    let mut doc = Html::parse_document(html);

    let mut chrome: Vec<_> = doc.select(&CHROME).map(|el| el.id()).collect();
    chrome.extend(
        doc.select(&HEADER)
            .filter(|el| !within_content(el))
            .map(|el| el.id()),
    );
    for id in chrome {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }

    ROOTS
        .iter()
        .find_map(|sel| doc.select(sel).next())
        .map(|root| root.inner_html())
        .unwrap_or_default()
}

fn within_content(el: &ElementRef<'_>) -> bool {
    el.ancestors()
        .filter_map(|node| node.value().as_element())
        .any(|e| matches!(e.name(), "main" | "article"))
}

pub fn html_to_markdown(html: &str) -> Result<String> {
    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "nav", "iframe", "noscript", "svg"])
        .build();

    converter
        .convert(html)
        .map_err(|e| SleuthError::Extraction(format!("htmd conversion failed: {e}")))
}

/// Text of the document's `<title>`, trimmed. `None` when absent or blank.
pub fn extract_title(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let el = doc.select(&TITLE).next()?;
    let title = el.text().collect::<String>();
    let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
    (!title.is_empty()).then_some(title)
}

/// Drops Markdown blocks that look like boilerplate.
///
/// A block (text between blank lines) survives when it mentions one of the
/// query terms. Otherwise it is dropped if links make up more than
/// `max_link_density` of its characters, or if it has fewer than
/// `min_words` words and is not a heading.
#[derive(Debug, Clone)]
pub struct PruningFilter {
    terms: Vec<String>,
    pub min_words: usize,
    pub max_link_density: f64,
}

impl Default for PruningFilter {
    fn default() -> Self {
        Self {
            terms: Vec::new(),
            min_words: 3,
            max_link_density: 0.5,
        }
    }
}

impl PruningFilter {
    pub fn new(query: Option<&str>) -> Self {
        let terms = query
            .unwrap_or_default()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.chars().count() >= 3)
            .map(str::to_lowercase)
            .collect();
        Self {
            terms,
            ..Self::default()
        }
    }

    pub fn apply(&self, markdown: &str) -> String {
        static BLOCK_SPLIT: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"\n[ \t]*\n").expect("valid regex"));

        BLOCK_SPLIT
            .split(markdown)
            .map(str::trim)
            .filter(|block| !block.is_empty() && self.keep(block))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn keep(&self, block: &str) -> bool {
        if self.mentions_term(block) {
            return true;
        }
        if link_density(block) > self.max_link_density {
            return false;
        }
        block.starts_with('#') || block.split_whitespace().count() >= self.min_words
    }

    fn mentions_term(&self, block: &str) -> bool {
        if self.terms.is_empty() {
            return false;
        }
        let lower = block.to_lowercase();
        self.terms.iter().any(|t| lower.contains(t.as_str()))
    }
}

fn link_density(block: &str) -> f64 {
    static LINK: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"!?\[[^\]]*\]\([^)]*\)").expect("valid regex"));

    let total = block.chars().count();
    if total == 0 {
        return 0.0;
    }
    let linked: usize = LINK
        .find_iter(block)
        .map(|m| m.as_str().chars().count())
        .sum();
    linked as f64 / total as f64
}

/// Remove navigation debris and short fragments from extracted text.
///
/// Line structure is preserved; each surviving line is trimmed and longer
/// than ten characters.
pub fn clean_content(content: &str) -> String {
    static BLANK_RUNS: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n\s*\n\s*\n").expect("valid regex"));
    static SPACE_RUNS: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[ \t\u{a0}]+").expect("valid regex"));
    static SKIP: LazyLock<RegexSet> = LazyLock::new(|| {
        RegexSet::new([
            r"(?i)^(Menu|Navigation|Skip to|Cookie|Privacy|Terms|Subscribe|Sign up|Log in).*",
            r"^\d+$",
            r"^[|•·→←↑↓\-\s]+$",
            r"(?i)^(Share|Tweet|Facebook|LinkedIn|Print)$",
            r"(?i)^Copyright.*\d{4}.*",
        ])
        .expect("valid regex set")
    });

    if content.is_empty() {
        return String::new();
    }

    let content = BLANK_RUNS.replace_all(content, "\n\n");
    let content = SPACE_RUNS.replace_all(&content, " ");

    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !SKIP.is_match(line))
        .filter(|line| line.chars().count() > 10)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Longest prefix of `s` holding at most `max` chars.
pub(crate) fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!doctype html>
<html>
<head><title>  Solar   Storage Report </title><style>body { color: red }</style></head>
<body>
  <header><a href="/">Home</a></header>
  <nav><ul><li>Menu item one</li></ul></nav>
  <main>
    <h1>Grid batteries in 2025</h1>
    <p>Grid-scale battery deployments doubled year over year across Europe.</p>
    <script>track()</script>
    <form><input name="q"></form>
  </main>
  <footer>Copyright 2025 Example Corp</footer>
</body>
</html>"#;

    #[test]
    fn prune_keeps_main_and_drops_chrome() {
        let pruned = prune_html(PAGE);
        assert!(pruned.contains("Grid batteries in 2025"));
        assert!(!pruned.contains("Menu item one"));
        assert!(!pruned.contains("track()"));
        assert!(!pruned.contains("Copyright"));
        assert!(!pruned.contains("<input"));
    }

    #[test]
    fn prune_falls_back_to_body() {
        let pruned = prune_html("<html><body><p>Only body text here.</p><aside>ad</aside></body></html>");
        assert!(pruned.contains("Only body text here."));
        assert!(!pruned.contains("ad</aside>"));
    }

    #[test]
    fn article_headers_survive_page_headers_do_not() {
        let html = "<html><body><header>Site banner and links</header>\
            <article><header><h1>Sodium batteries explained</h1></header>\
            <p>Sodium-ion cells avoid lithium entirely.</p></article></body></html>";
        let pruned = prune_html(html);
        assert!(pruned.contains("Sodium batteries explained"));
        assert!(pruned.contains("avoid lithium"));
        assert!(!pruned.contains("Site banner"));
    }

    #[test]
    fn markdown_conversion_keeps_headings() {
        let md = html_to_markdown(&prune_html(PAGE)).unwrap();
        assert!(md.contains("# Grid batteries in 2025"));
        assert!(md.contains("doubled year over year"));
    }

    #[test]
    fn title_is_trimmed_and_collapsed() {
        assert_eq!(extract_title(PAGE).as_deref(), Some("Solar Storage Report"));
        assert_eq!(extract_title("<html><title>  </title></html>"), None);
        assert_eq!(extract_title("<p>no title</p>"), None);
    }

    #[test]
    fn clean_drops_ui_noise_and_short_lines() {
        let raw = "Skip to content\n\
                   Menu\n\
                   \n\n\n\n\
                   The   committee approved\tthe new safety features.\n\
                   42\n\
                   | • → |\n\
                   Share\n\
                   Copyright © 2024 Someone\n\
                   short line\n\
                   Another substantial sentence about storage.";
        let cleaned = clean_content(raw);
        assert_eq!(
            cleaned,
            "The committee approved the new safety features.\nAnother substantial sentence about storage."
        );
    }

    #[test]
    fn clean_of_empty_is_empty() {
        assert_eq!(clean_content(""), "");
        assert_eq!(clean_content("tiny\n\n12345"), "");
    }

    #[test]
    fn pruning_drops_link_farms_unless_relevant() {
        let md = "[Home](/) [About](/about) [Blog](/blog)\n\n\
                  Battery fires are rare but serious events for utilities.\n\n\
                  [Read about safety features](/safety)\n\n\
                  Ok";
        let plain = PruningFilter::new(None).apply(md);
        assert_eq!(plain, "Battery fires are rare but serious events for utilities.");

        let focused = PruningFilter::new(Some("safety features")).apply(md);
        assert!(focused.contains("[Read about safety features](/safety)"));
        assert!(!focused.contains("[Home](/)"));
    }

    #[test]
    fn truncation_counts_chars_not_bytes() {
        assert_eq!(truncate_chars("ééé", 2), "éé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn pruning_keeps_headings() {
        let out = PruningFilter::default().apply("## Results\n\nThree words here");
        assert_eq!(out, "## Results\n\nThree words here");
    }
}
