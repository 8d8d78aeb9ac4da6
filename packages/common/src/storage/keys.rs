//! Object key conventions.
//!
//! Pure string functions shared by every blob store backend.

use uuid::Uuid;

/// Extension of the gzip-compressed CSV artifact.
pub const REPORT_ARTIFACT_EXT: &str = "csv.gz";

/// Deterministic location of a report artifact: `users/{user_id}/{report_id}.csv.gz`.
pub fn report_artifact(user_id: Uuid, report_id: Uuid) -> String {
    format!("users/{user_id}/{report_id}.{REPORT_ARTIFACT_EXT}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_key_is_deterministic() {
        let user_id = Uuid::new_v4();
        let report_id = Uuid::new_v4();
        let key = report_artifact(user_id, report_id);
        assert_eq!(key, format!("users/{user_id}/{report_id}.csv.gz"));
        assert_eq!(key, report_artifact(user_id, report_id));
    }
}
