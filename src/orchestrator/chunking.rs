//! Reply chunking for `message.delta` events.

/// Split `text` into chunks of roughly `limit` characters without breaking
/// words. Whitespace stays attached to the word before it, so joining the
/// chunks reproduces `text` exactly. A word longer than `limit` becomes a
/// chunk of its own. Empty text yields one empty chunk.
pub fn chunk_reply(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in words(text) {
        let word_len = word.chars().count();
        if current_len > 0 && current_len + word_len > limit {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.push_str(&word);
        current_len += word_len;
    }
    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Words with their trailing whitespace.
fn words(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_whitespace = false;
    for ch in text.chars() {
        if !ch.is_whitespace() && prev_whitespace && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        current.push(ch);
        prev_whitespace = ch.is_whitespace();
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}
