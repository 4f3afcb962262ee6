//! Text helpers for progress lines and report output

use std::fmt::Write;

const SUFFIXES: [&str; 6] = ["", "k", "M", "G", "T", "P"];

fn pick_scale_and_suffix(x: u64) -> (f64, &'static str) {
    let digits = x.to_string().len();
    let index = ((digits - 1) / 3).min(SUFFIXES.len() - 1);
    let scale = 1000_f64.powi(index as i32);
    (scale, SUFFIXES[index])
}

fn decimals_for(scaled: f64) -> usize {
    if scaled < 10.0 {
        2
    } else if scaled < 100.0 {
        1
    } else {
        0
    }
}

/// Formats `x` with a decimal k/M/G/T/P suffix.
///
/// ```
/// use b2sync_engine::format::format_and_scale_number;
/// assert_eq!(format_and_scale_number(999, "B"), "999 B");
/// assert_eq!(format_and_scale_number(1_234, "B"), "1.23 kB");
/// ```
pub fn format_and_scale_number(x: u64, unit: &str) -> String {
    if x < 1000 {
        return format!("{x} {unit}");
    }
    let (scale, suffix) = pick_scale_and_suffix(x);
    let scaled = x as f64 / scale;
    let precision = decimals_for(scaled);
    format!("{scaled:.precision$} {suffix}{unit}")
}

/// Formats `numerator / denominator`, both scaled by the denominator's suffix.
pub fn format_and_scale_fraction(numerator: u64, denominator: u64, unit: &str) -> String {
    if denominator < 1000 {
        return format!("{numerator} / {denominator} {unit}");
    }
    let (scale, suffix) = pick_scale_and_suffix(denominator);
    let scaled_denominator = denominator as f64 / scale;
    let scaled_numerator = numerator as f64 / scale;
    let precision = decimals_for(scaled_denominator);
    format!("{scaled_numerator:.precision$} / {scaled_denominator:.precision$} {suffix}{unit}")
}

fn is_unprintable(c: char) -> bool {
    matches!(c, '\u{00}'..='\u{08}' | '\u{0e}'..='\u{1f}' | '\u{7f}'..='\u{9f}')
}

/// Replaces control characters (except tab and newlines) with `\xNN`.
pub fn unprintable_to_hex(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if is_unprintable(c) {
            let _ = write!(out, "\\x{:02x}", c as u32);
        } else {
            out.push(c);
        }
    }
    out
}

fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c)
}

/// Quotes `s` for a POSIX shell unless it only has safe characters.
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s.chars().all(is_shell_safe) {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\"'\"'"))
}

/// Hex-escapes control characters, then shell-quotes the result.
///
/// An empty string is returned unchanged.
pub fn escape_control_chars(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    shell_quote(&unprintable_to_hex(s))
}
