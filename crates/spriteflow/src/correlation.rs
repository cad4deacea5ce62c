use uuid::Uuid;

/// Generates a correlation id for a new job, or validates one supplied by
/// a caller so the same id can be threaded through logs end-to-end.
pub fn new_correlation_id() -> String {
    format!("corr_{}", Uuid::new_v4())
}

pub fn is_valid(correlation_id: &str) -> bool {
    !correlation_id.trim().is_empty() && correlation_id.len() <= 128
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_valid_and_prefixed() {
        let id = new_correlation_id();
        assert!(id.starts_with("corr_"));
        assert!(is_valid(&id));
    }

    #[test]
    fn rejects_empty_and_oversized_ids() {
        assert!(!is_valid(""));
        assert!(!is_valid(&"x".repeat(200)));
    }
}
