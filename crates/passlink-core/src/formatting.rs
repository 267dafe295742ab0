/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Longest entity `escape_html` produces.
const MAX_ENTITY_LEN: usize = "&quot;".len();

/// Escape `text` and cut the result into pieces of at most `limit` bytes.
///
/// Cuts only fall between escaped chars, so no piece ends inside an entity.
pub fn escape_html_chunks(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(MAX_ENTITY_LEN);
    let mut out = Vec::new();
    let mut piece = String::new();
    let mut buf = [0u8; 4];

    for ch in text.chars() {
        let escaped: &str = match ch {
            '&' => "&amp;",
            '<' => "&lt;",
            '>' => "&gt;",
            '"' => "&quot;",
            _ => ch.encode_utf8(&mut buf),
        };
        if !piece.is_empty() && piece.len() + escaped.len() > limit {
            out.push(std::mem::take(&mut piece));
        }
        piece.push_str(escaped);
    }

    if !piece.is_empty() {
        out.push(piece);
    }
    out
}

/// Pack lines into messages of at most `limit` bytes.
///
/// Lines are never split unless a single line is longer than `limit`, in which
/// case it is cut on a char boundary.
pub fn pack_lines<I>(lines: I, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let limit = limit.max(1);
    let mut out = Vec::new();
    let mut chunk = String::new();

    for line in lines {
        let mut line = line.as_str();
        loop {
            let needed = if chunk.is_empty() { line.len() } else { line.len() + 1 };
            if chunk.len() + needed <= limit {
                if !chunk.is_empty() {
                    chunk.push('\n');
                }
                chunk.push_str(line);
                break;
            }
            if !chunk.is_empty() {
                out.push(std::mem::take(&mut chunk));
                continue;
            }
            let (head, tail) = split_utf8_prefix(line, limit);
            out.push(head.to_string());
            line = tail;
            if line.is_empty() {
                break;
            }
        }
    }

    if !chunk.is_empty() {
        out.push(chunk);
    }
    out
}

fn split_utf8_prefix(s: &str, max_bytes: usize) -> (&str, &str) {
    if s.len() <= max_bytes {
        return (s, "");
    }
    let mut idx = 0usize;
    for (i, _) in s.char_indices() {
        if i > max_bytes {
            break;
        }
        idx = i;
    }
    if idx == 0 {
        // A single char wider than the limit; emit it alone to make progress.
        let next = s.char_indices().nth(1).map(|(i, _)| i).unwrap_or(s.len());
        return (&s[..next], &s[next..]);
    }
    (&s[..idx], &s[idx..])
}
