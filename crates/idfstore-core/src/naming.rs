use std::collections::BTreeSet;

/// `"{base} {n}"` with the smallest `n >= 1` not already used by one of
/// `existing`. Comparison is case-insensitive.
pub fn next_name<'a>(base: &str, existing: impl IntoIterator<Item = &'a str>) -> String {
    let base = base.trim();
    let prefix = format!("{} ", base.to_ascii_lowercase());
    let taken: BTreeSet<u64> = existing
        .into_iter()
        .filter_map(|name| {
            let lower = name.trim().to_ascii_lowercase();
            let suffix = lower.strip_prefix(&prefix)?;
            // "Zone 01" does not take suffix 1.
            if suffix.starts_with('0') {
                return None;
            }
            suffix.parse::<u64>().ok()
        })
        .collect();
    let n = (1..)
        .find(|n| !taken.contains(n))
        .unwrap_or(1);
    format!("{base} {n}")
}
