// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, Utc};
use url::Url;

/// Longest file name most filesystems accept, in bytes
pub const MAX_FILENAME_BYTES: usize = 255;

/// Length of the `YYYY-MM-DD_` prefix of generated output names
const DATE_PREFIX_LEN: usize = 11;

const EPUB_SUFFIX: &str = ".epub";

/// Check if a character survives slugging (whitelist approach)
fn is_slug_char(c: char) -> bool {
    c.is_ascii_digit() || c.is_ascii_lowercase() || matches!(c, '-' | '_')
}

/// Lowercase, spaces to hyphens, everything outside `[0-9a-z-_]` dropped
///
/// The result is truncated so that `reserved` bytes of a 255-byte file name
/// remain for a prefix or extension.
pub fn slug(text: &str, reserved: usize) -> String {
    let budget = MAX_FILENAME_BYTES.saturating_sub(reserved);
    text.replace(' ', "-")
        .to_lowercase()
        .chars()
        .filter(|c| is_slug_char(*c))
        .take(budget)
        .collect()
}

/// Output file name for an article: `<YYYY-MM-DD>_<slug>.epub`
pub fn output_filename(title: &str, published: &DateTime<Utc>) -> String {
    format!(
        "{}_{}{}",
        published.format("%Y-%m-%d"),
        slug(title, DATE_PREFIX_LEN + EPUB_SUFFIX.len()),
        EPUB_SUFFIX
    )
}

/// Short site name for a URL: host without a leading `www.` or trailing `.com`
pub fn site_name_from_url(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    let host = host.strip_prefix("www.").unwrap_or(host);
    host.strip_suffix(".com").unwrap_or(host).to_string()
}
