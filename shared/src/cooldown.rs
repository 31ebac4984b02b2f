use std::fmt::Write;

/// Whole seconds left, rounded up so a 1 ms remainder still reads as 1.
pub fn remaining_secs(remaining_ms: i64) -> i64 {
    if remaining_ms <= 0 {
        return 0;
    }
    (remaining_ms + 999) / 1000
}

/// Status line for the cooldown indicator.
pub fn format_cooldown(remaining_ms: i64) -> String {
    let mut out = String::with_capacity(20);
    write_cooldown(&mut out, remaining_ms);
    out
}

pub fn write_cooldown(buf: &mut String, remaining_ms: i64) {
    buf.clear();
    let secs = remaining_secs(remaining_ms);
    if secs == 0 {
        buf.push_str("Ready to paint");
        return;
    }
    let _ = write!(buf, "Next paint in {}:{:02}", secs / 60, secs % 60);
}
