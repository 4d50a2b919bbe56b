//! # URL Extraction Module
//!
//! Pattern matching over search-result markup. Both backends end up here: the
//! lightweight backend with the raw response body, the browser backend with
//! the rendered page source.

use regex::Regex;
use scraper::{ Html, Selector };
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::debug;

use crate::blocklist::is_external_image;
use crate::models::CandidateUrl;

/// Original-image URLs embedded as `"ou":"..."` in inline script JSON.
fn ou_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""ou":"(https?://[^"]+)""#).unwrap())
}

/// Any absolute URL ending in a common image extension.
fn extension_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)(https?://[^\s'"<>]+\.(?:jpg|jpeg|png|webp|gif))"#).unwrap()
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Primary,
    Fallback,
    Done,
}

#[derive(Debug)]
enum Source {
    Scan {
        body: String,
        pos: usize,
        phase: Phase,
        primary_hits: usize,
    },
    Listed(std::vec::IntoIter<String>),
}

/// Ordered, deduplicated candidate URLs.
///
/// Scanning is lazy: the body is matched only as far as the consumer pulls,
/// and the sequence cannot be restarted. The extension pattern is consulted
/// only when the `"ou"` pattern matched nothing at all.
#[derive(Debug)]
pub struct Candidates {
    source: Source,
    seen: HashSet<String>,
    next_rank: usize,
}

impl Candidates {
    pub fn empty() -> Self {
        Self::from_urls(Vec::new())
    }

    /// Candidates scanned out of a page body.
    pub fn scan(body: String) -> Self {
        Candidates {
            source: Source::Scan {
                body,
                pos: 0,
                phase: Phase::Primary,
                primary_hits: 0,
            },
            seen: HashSet::new(),
            next_rank: 0,
        }
    }

    /// Candidates from URLs that were already located, e.g. by a DOM walk.
    /// Filtering and deduplication still apply.
    pub fn from_urls(urls: Vec<String>) -> Self {
        Candidates {
            source: Source::Listed(urls.into_iter()),
            seen: HashSet::new(),
            next_rank: 0,
        }
    }

    fn next_raw(&mut self) -> Option<String> {
        match &mut self.source {
            Source::Listed(urls) => urls.next(),
            Source::Scan { body, pos, phase, primary_hits } => {
                loop {
                    let regex = match phase {
                        Phase::Primary => ou_pattern(),
                        Phase::Fallback => extension_pattern(),
                        Phase::Done => {
                            return None;
                        }
                    };
                    let found = regex
                        .captures_at(body, *pos)
                        .and_then(|caps| Some((caps.get(0)?.end(), caps.get(1)?.as_str().to_string())));
                    match found {
                        Some((end, url)) => {
                            *pos = end;
                            if *phase == Phase::Primary {
                                *primary_hits += 1;
                            }
                            return Some(url);
                        }
                        None if *phase == Phase::Primary && *primary_hits == 0 => {
                            debug!("primary pattern matched nothing, using extension fallback");
                            *phase = Phase::Fallback;
                            *pos = 0;
                        }
                        None => {
                            *phase = Phase::Done;
                        }
                    }
                }
            }
        }
    }
}

impl Iterator for Candidates {
    type Item = CandidateUrl;

    fn next(&mut self) -> Option<CandidateUrl> {
        loop {
            let url = decode_escapes(&self.next_raw()?);
            if !is_external_image(&url) || !self.seen.insert(url.clone()) {
                continue;
            }
            let rank = self.next_rank;
            self.next_rank += 1;
            return Some(CandidateUrl { url, rank });
        }
    }
}

/// Undoes the JSON escaping the provider applies inside script blocks.
pub fn decode_escapes(raw: &str) -> String {
    raw.replace("\\u003d", "=")
        .replace("\\u003D", "=")
        .replace("\\u0026", "&")
        .replace("\\/", "/")
}

/// Pulls original-image URLs out of `imgurl=` result links in rendered HTML.
pub fn imgres_links(html: &str) -> Vec<String> {
    let selector = match Selector::parse(r#"a[href*="imgurl="]"#) {
        Ok(selector) => selector,
        Err(_) => {
            return Vec::new();
        }
    };
    let base = match url::Url::parse("https://localhost/") {
        Ok(base) => base,
        Err(_) => {
            return Vec::new();
        }
    };

    let document = Html::parse_document(html);
    document
        .select(&selector)
        .filter_map(|link| link.value().attr("href"))
        .filter_map(|href| base.join(href).ok())
        .filter_map(|href| {
            href.query_pairs()
                .find(|(key, _)| key == "imgurl")
                .map(|(_, value)| value.into_owned())
        })
        .filter(|url| url.starts_with("http://") || url.starts_with("https://"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(candidates: Candidates) -> Vec<String> {
        candidates.map(|c| c.url).collect()
    }

    #[test]
    fn test_scan_primary_pattern_in_order() {
        let body = r#"<script>
            {"ou":"https://a.example.com/1.jpg","ow":640}
            {"ou":"https://b.example.com/2.png?w=1"}
            {"ou":"https://encrypted-tbn0.gstatic.com/thumb"}
            {"ou":"https://a.example.com/1.jpg"}
            https://c.example.com/ignored.jpg
        </script>"#;
        let found: Vec<CandidateUrl> = Candidates::scan(body.to_string()).collect();

        assert_eq!(
            found,
            vec![
                CandidateUrl { url: "https://a.example.com/1.jpg".to_string(), rank: 0 },
                CandidateUrl { url: "https://b.example.com/2.png?w=1".to_string(), rank: 1 }
            ]
        );
    }

    #[test]
    fn test_scan_falls_back_to_extensions() {
        let body = r#"<img src="https://x.example.org/cat.JPG"> and
            ["https://y.example.org/dog.webp",800,600]
            <img src="https://www.gstatic.com/logo.png">"#;

        assert_eq!(
            urls(Candidates::scan(body.to_string())),
            vec!["https://x.example.org/cat.JPG", "https://y.example.org/dog.webp"]
        );
    }

    #[test]
    fn test_fallback_not_used_when_primary_only_filtered() {
        let body = r#"{"ou":"https://lh3.googleusercontent.com/a.jpg"} https://x.example.org/b.jpg"#;
        assert!(urls(Candidates::scan(body.to_string())).is_empty());
    }

    #[test]
    fn test_unrecognised_markup_yields_nothing() {
        assert!(urls(Candidates::scan("<html><body>captcha</body></html>".to_string())).is_empty());
        assert_eq!(Candidates::empty().count(), 0);
    }

    #[test]
    fn test_escapes_are_decoded() {
        let body = r#"{"ou":"https://cdn.example.com/img?id\u003d7\u0026s\u003dL"}"#;
        assert_eq!(
            urls(Candidates::scan(body.to_string())),
            vec!["https://cdn.example.com/img?id=7&s=L"]
        );
    }

    #[test]
    fn test_scan_is_lazy() {
        let mut body = String::new();
        for i in 0..50 {
            body.push_str(&format!("{{\"ou\":\"https://site{}.example.com/p.jpg\"}}", i));
        }
        let mut candidates = Candidates::scan(body);
        let first: Vec<_> = candidates.by_ref().take(2).collect();

        assert_eq!(first[1].rank, 1);
        assert_eq!(candidates.next().map(|c| c.rank), Some(2));
    }

    #[test]
    fn test_imgres_links() {
        let html = r#"<div>
            <a href="/imgres?imgurl=https%3A%2F%2Fzoo.example.com%2Fpanda.jpg&amp;imgrefurl=x">p</a>
            <a href="/search?q=panda">no</a>
            <a href="/imgres?imgurl=javascript%3Avoid(0)">bad</a>
            <a href="https://www.google.com/imgres?imgurl=https://b.example.com/2.png">b</a>
        </div>"#;

        assert_eq!(
            imgres_links(html),
            vec!["https://zoo.example.com/panda.jpg", "https://b.example.com/2.png"]
        );
    }

    #[test]
    fn test_listed_candidates_dedupe_and_rank() {
        let listed = Candidates::from_urls(
            vec![
                "https://a.example.com/1.jpg".to_string(),
                "https://a.example.com/1.jpg".to_string(),
                "https://www.google.com/x.jpg".to_string(),
                "https://b.example.com/2.jpg".to_string()
            ]
        );
        let ranks: Vec<usize> = listed.map(|c| c.rank).collect();
        assert_eq!(ranks, vec![0, 1]);
    }
}
