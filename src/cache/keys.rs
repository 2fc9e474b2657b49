//! Versioned cache key formats, so a future migration can
//! bump the version segment without invalidating every key by hand.

use sha2::{Digest, Sha256};

/// Lowercase, strip ASCII punctuation, collapse internal whitespace.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped: String = lowered
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn hash16(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// `"query:v1:" + sha256(user_id || normalize(query) || sorted(chunk_ids))[:16]`
pub fn l1_query_key(user_id: &str, query: &str, mut chunk_ids: Vec<String>) -> String {
    chunk_ids.sort();
    let material = format!("{}|{}|{}", user_id, normalize(query), chunk_ids.join(","));
    format!("query:v1:{}", hash16(&material))
}

/// `"embedding:v1:" + sha256(normalize(query))[:16]`
pub fn l2_embedding_key(query: &str) -> String {
    format!("embedding:v1:{}", hash16(&normalize(query)))
}

/// `"context:v1:" + user_id + ":" + sha256(vec.bytes())[:16]`
pub fn l3_context_key(user_id: &str, embedding: &[f32]) -> String {
    let bytes: Vec<u8> = embedding.iter().flat_map(|f| f.to_le_bytes()).collect();
    let digest = Sha256::digest(&bytes);
    format!("context:v1:{}:{}", user_id, &hex::encode(digest)[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace_and_strips_punctuation() {
        assert_eq!(normalize("  What is,  Grace?!  "), "what is grace");
    }

    #[test]
    fn l1_key_is_order_independent_on_chunk_ids() {
        let a = l1_query_key("u1", "grace", vec!["c2".into(), "c1".into()]);
        let b = l1_query_key("u1", "grace", vec!["c1".into(), "c2".into()]);
        assert_eq!(a, b);
    }

    #[test]
    fn l2_key_is_deterministic() {
        let a = l2_embedding_key("What is Grace?");
        let b = l2_embedding_key("what is grace");
        assert_eq!(a, b);
    }

    #[test]
    fn l3_key_is_scoped_by_user() {
        let vec = vec![0.1, 0.2, 0.3];
        let a = l3_context_key("user-a", &vec);
        let b = l3_context_key("user-b", &vec);
        assert_ne!(a, b);
    }
}
