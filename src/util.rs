//! Shared utility functions for the forge-scaffold crate.

/// Remove a markdown code fence wrapped around model output.
///
/// Only a fence opening the text (```` ```lang ```` line) and a fence closing
/// it are removed; text without fences is returned unchanged so that streamed
/// content keeps matching the accumulated deltas.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let opens = trimmed.starts_with("```");
    let closes = trimmed.len() >= 3 && trimmed.ends_with("```");
    if !opens && !closes {
        return text.to_string();
    }

    let mut body = trimmed;
    if opens {
        body = match body.find('\n') {
            Some(idx) => &body[idx + 1..],
            None => "",
        };
    }
    let tail = body.trim_end();
    if let Some(stripped) = tail.strip_suffix("```") {
        body = stripped;
    }

    let mut out = body.trim_end().to_string();
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Extract a JSON array from text that may contain other content.
/// Counts brackets outside of string literals to find the outermost array.
pub fn extract_json_array(text: &str) -> Option<String> {
    let start = text.find('[')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + i + 1].to_string());
                }
            }
            _ => {}
        }
    }

    None
}

/// Truncate a string to at most `max` characters, appending "..." when cut.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{}...", cut)
    }
}
