//! # User Agents Module
//!
//! Browser-like request identity. The provider serves a reduced page with far
//! fewer embedded image URLs to agents it does not recognise.

use rand::seq::SliceRandom;

pub const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

/// Returns a randomly selected desktop User-Agent string.
pub fn get_useragent() -> &'static str {
    USER_AGENT_LIST.choose(&mut rand::thread_rng()).copied().unwrap_or(USER_AGENT_LIST[0])
}

/// `Accept-Language` value derived from a short language code.
pub fn accept_language(lang: &str) -> String {
    match lang {
        "" | "en" => "en-US,en;q=0.9".to_string(),
        other => format!("{},en;q=0.8", other),
    }
}

const USER_AGENT_LIST: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.2478.51",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
];
