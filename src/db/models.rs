use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ArtifactRecord {
    pub path: String,
    pub content: String,
    pub created_at: String,
}
