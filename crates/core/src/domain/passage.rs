use serde::{Deserialize, Serialize};

/// A ranked chunk of an indexed agreement, as returned by hybrid retrieval.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    /// Source document identifier (the agreement file name).
    pub title: String,
    pub chunk: String,
    pub path: Option<String>,
    pub score: f64,
}
