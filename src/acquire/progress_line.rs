// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::LazyLock;

use regex::Regex;

static PROGRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[download\]\s+([0-9]+(?:\.[0-9]+)?)%\s+of\s+~?\s*([0-9]+(?:\.[0-9]+)?)\s*(B|KiB|MiB|GiB|TiB)\b")
        .expect("progress pattern is valid")
});

/// One parsed `[download]` progress line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    pub percent: f64,
    /// Total size as reported by the downloader, in bytes
    pub size_bytes: u64,
}

/// Tag of a bracketed event line, e.g. `download` for `[download] ...`
pub fn event_tag(line: &str) -> Option<&str> {
    let rest = line.strip_prefix('[')?;
    let end = rest.find(']')?;
    Some(&rest[..end])
}

/// Parse a downloader progress line into percent and normalized size
///
/// Lines that are not `[download] <percent>% of <size><unit>` yield `None`.
pub fn parse_progress_line(line: &str) -> Option<DownloadProgress> {
    let captures = PROGRESS_RE.captures(line.trim_start())?;
    let percent: f64 = captures[1].parse().ok()?;
    let size: f64 = captures[2].parse().ok()?;
    let multiplier = unit_multiplier(&captures[3])?;

    Some(DownloadProgress {
        percent,
        size_bytes: (size * multiplier as f64).round() as u64,
    })
}

/// Bytes per unit for the binary units the downloader prints
pub fn unit_multiplier(unit: &str) -> Option<u64> {
    match unit {
        "B" => Some(1),
        "KiB" => Some(1 << 10),
        "MiB" => Some(1 << 20),
        "GiB" => Some(1 << 30),
        "TiB" => Some(1 << 40),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mebibytes() {
        let progress = parse_progress_line("[download]  42.0% of 10.00MiB at 1.00MiB/s ETA 00:06").unwrap();
        assert_eq!(progress.percent, 42.0);
        assert_eq!(progress.size_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn parses_estimated_sizes() {
        let progress = parse_progress_line("[download]   1.5% of ~ 2.50GiB at 3.2MiB/s").unwrap();
        assert_eq!(progress.size_bytes, (2.5 * (1u64 << 30) as f64) as u64);
    }

    #[test]
    fn normalizes_all_units_to_bytes() {
        let kib = parse_progress_line("[download] 100% of 512.00KiB").unwrap();
        let tib = parse_progress_line("[download] 0.0% of 1.00TiB").unwrap();
        assert_eq!(kib.size_bytes, 512 * 1024);
        assert_eq!(tib.size_bytes, 1 << 40);
    }

    #[test]
    fn ignores_other_lines() {
        assert!(parse_progress_line("[youtube] abc: Downloading webpage").is_none());
        assert!(parse_progress_line("[download] Destination: /tmp/x.mp4").is_none());
        assert!(parse_progress_line("plain output").is_none());
    }

    #[test]
    fn extracts_event_tag() {
        assert_eq!(event_tag("[download] 1% of 2MiB"), Some("download"));
        assert_eq!(event_tag("[Merger] Merging formats"), Some("Merger"));
        assert_eq!(event_tag("no tag"), None);
    }
}
