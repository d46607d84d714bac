use serde::{Deserialize, Serialize};

/// One decoded line of a streamed backend response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamRecord {
    /// An incremental fragment of generated text.
    Chunk {
        /// The fragment to append.
        #[serde(default)]
        content: String,
    },

    /// Any other well-formed record; ignored by the generation path.
    #[serde(other)]
    Other,
}

impl StreamRecord {
    /// Creates a chunk record.
    pub fn chunk(content: impl Into<String>) -> Self {
        StreamRecord::Chunk {
            content: content.into(),
        }
    }

    /// Returns the chunk text if this is a non-empty chunk.
    pub fn chunk_content(&self) -> Option<&str> {
        match self {
            StreamRecord::Chunk { content } if !content.is_empty() => Some(content),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_chunk() {
        let record: StreamRecord =
            serde_json::from_str(r#"{"type":"chunk","content":"Halo"}"#).unwrap();
        assert_eq!(record, StreamRecord::chunk("Halo"));
        assert_eq!(record.chunk_content(), Some("Halo"));
    }

    #[test]
    fn unknown_types_are_other() {
        let record: StreamRecord =
            serde_json::from_str(r#"{"type":"done","total_duration":12}"#).unwrap();
        assert_eq!(record, StreamRecord::Other);
        assert_eq!(record.chunk_content(), None);
    }

    #[test]
    fn empty_chunk_has_no_content() {
        let record: StreamRecord = serde_json::from_str(r#"{"type":"chunk"}"#).unwrap();
        assert_eq!(record.chunk_content(), None);
    }
}
