pub mod homework;
pub mod user;

use uuid::Uuid;

/// Prefixed entity id, e.g. `usr_3f0c…`, `hw_9a12…`.
pub fn new_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4())
}
