use crate::error::Result;
use bytes::Bytes;
use serde_json::{json, Value};
use std::cmp::Ordering;

/// One successful chunk-API response: the raw body plus its parsed document.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkResponse {
    pub index: usize,
    pub body: Bytes,
    pub document: Value,
}

impl ChunkResponse {
    pub fn parse(index: usize, body: Bytes) -> Result<Self> {
        let document = serde_json::from_slice(&body)?;
        Ok(Self {
            index,
            body,
            document,
        })
    }

    fn array(&self, field: &str) -> &[Value] {
        self.document
            .get(field)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Reassembled result of a chunked fan-out.
#[derive(Debug, Clone, PartialEq)]
pub enum MergedResponse {
    /// No chunk succeeded.
    Empty,
    /// Exactly one chunk: kept byte-for-byte.
    PassThrough(ChunkResponse),
    Combined {
        timestamps: Vec<Value>,
        features: Vec<Value>,
    },
}

impl MergedResponse {
    /// Merge chunk responses: timestamps become the sorted de-duplicated union,
    /// features are concatenated in chunk-index order with duplicates kept.
    pub fn merge(mut responses: Vec<ChunkResponse>) -> Self {
        match responses.len() {
            0 => return MergedResponse::Empty,
            1 => return MergedResponse::PassThrough(responses.remove(0)),
            _ => {}
        }

        responses.sort_by_key(|response| response.index);

        let mut timestamps: Vec<Value> = responses
            .iter()
            .flat_map(|response| response.array("timestamps").iter().cloned())
            .collect();
        timestamps.sort_by(compare_timestamps);
        timestamps.dedup_by(|a, b| compare_timestamps(a, b) == Ordering::Equal);

        let features: Vec<Value> = responses
            .iter()
            .flat_map(|response| response.array("features").iter().cloned())
            .collect();

        MergedResponse::Combined {
            timestamps,
            features,
        }
    }

    pub fn timestamps(&self) -> &[Value] {
        match self {
            MergedResponse::Empty => &[],
            MergedResponse::PassThrough(response) => response.array("timestamps"),
            MergedResponse::Combined { timestamps, .. } => timestamps,
        }
    }

    pub fn features(&self) -> &[Value] {
        match self {
            MergedResponse::Empty => &[],
            MergedResponse::PassThrough(response) => response.array("features"),
            MergedResponse::Combined { features, .. } => features,
        }
    }

    /// Serialized UTF-8 JSON. A pass-through keeps the original body.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            MergedResponse::Empty => Ok(serde_json::to_vec(&json!({}))?),
            MergedResponse::PassThrough(response) => Ok(response.body.to_vec()),
            MergedResponse::Combined {
                timestamps,
                features,
            } => Ok(serde_json::to_vec(&json!({
                "timestamps": timestamps,
                "features": features,
            }))?),
        }
    }
}

/// Numbers before strings, numbers numerically, strings lexicographically
/// (ISO-8601 timestamps sort chronologically that way).
fn compare_timestamps(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Number(_), _) => Ordering::Less,
        (_, Value::Number(_)) => Ordering::Greater,
        (Value::String(_), _) => Ordering::Less,
        (_, Value::String(_)) => Ordering::Greater,
        _ => a.to_string().cmp(&b.to_string()),
    }
}
