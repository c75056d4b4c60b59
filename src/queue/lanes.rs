use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Deterministic queue lane name for an owner's media jobs.
///
/// Every job of the same user maps to the same lane, and lanes run with
/// parallelism 1, so one owner's steps never interleave. The name uses a
/// hash rather than the raw UUID to stay within provider name limits.
pub fn job_lane(user_id: Uuid) -> String {
    let digest = Sha256::digest(user_id.as_bytes());
    let mut name = String::with_capacity(22);
    name.push_str("media-");
    for b in &digest[..8] {
        name.push_str(&format!("{:02x}", b));
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_lane_is_deterministic() {
        let user = Uuid::new_v4();
        assert_eq!(job_lane(user), job_lane(user));
    }

    #[test]
    fn test_job_lane_differs_per_user() {
        assert_ne!(job_lane(Uuid::new_v4()), job_lane(Uuid::new_v4()));
    }

    #[test]
    fn test_job_lane_shape() {
        let lane = job_lane(Uuid::new_v4());
        assert_eq!(lane.len(), 22);
        assert!(lane.starts_with("media-"));
        assert!(
            lane.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        );
    }
}
