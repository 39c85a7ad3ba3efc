//! Hosts file parsing.
//!
//! A hosts file line maps an IPv4 address to a hostname:
//!
//! ```text
//! # comment
//! 127.0.0.1   ads.example.com   # trailing comment
//! ```
//!
//! Only the first hostname after the address is taken; the address itself is
//! discarded because every rendered entry points to the configured redirect
//! target instead.

use regex::Regex;
use std::sync::LazyLock;

use crate::validation::is_valid_hostname;

/// `<IPv4> <whitespace> <token>`, the token ending at whitespace, `/` or `\`
static HOSTS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\s+([^\s\\/]+)")
        .expect("hosts line pattern is valid")
});

/// Normalize line endings and squeeze blank line runs.
///
/// CRLF, LFCR and lone CR become LF; three or more consecutive LFs (two or
/// more blank lines) become exactly two.
///
/// # Examples
/// ```
/// use mikrohosts::hostsfile::normalize_newlines;
/// assert_eq!(normalize_newlines("a\r\nb\rc"), "a\nb\nc");
/// assert_eq!(normalize_newlines("a\n\n\n\nb"), "a\n\nb");
/// ```
pub fn normalize_newlines(raw: &str) -> String {
    let unified = raw
        .replace("\r\n", "\n")
        .replace("\n\r", "\n")
        .replace('\r', "\n");

    let mut out = String::with_capacity(unified.len());
    let mut run = 0;
    for c in unified.chars() {
        if c == '\n' {
            run += 1;
            if run > 2 {
                continue;
            }
        } else {
            run = 0;
        }
        out.push(c);
    }
    out
}

/// Lower-cased hostname candidates, one per matching line, in file order.
///
/// Comment lines and lines without the `<IPv4> <host>` shape are skipped.
/// Candidates are not validated.
pub fn candidates(content: &str) -> impl Iterator<Item = String> + '_ {
    content
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .filter_map(|line| HOSTS_LINE.captures(line))
        .filter_map(|caps| caps.get(1))
        .map(|token| token.as_str().trim().to_lowercase())
}

/// Extract valid, lower-cased hostnames from a hosts file body.
///
/// Duplicates are kept; deduplication happens when results are merged.
///
/// # Examples
/// ```
/// use mikrohosts::hostsfile::extract_hostnames;
/// let body = "# ads\n1.2.3.4 Ads.Example.com\n5.6.7.8 bad_host\nnot a record\n";
/// assert_eq!(extract_hostnames(body), vec!["ads.example.com"]);
/// ```
pub fn extract_hostnames(content: &str) -> Vec<String> {
    candidates(content)
        .filter(|host| is_valid_hostname(host))
        .collect()
}
