//! Pagination offset carried between batches and persisted as the checkpoint.

use checkpoint::Checkpoint;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::convert::offset_as_int;
use crate::values::Value;

/// Resume position of a migration run.
///
/// Extractors page by record count, so `Int` is what they produce. `Key`
/// exists for checkpoints given on the command line as a key; extractors
/// coerce it numerically.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Offset {
    /// Fresh run, start from the beginning
    #[default]
    None,
    Int(i64),
    Key(String),
}

impl Offset {
    /// Number of records already consumed. Never fails; unparseable keys
    /// and negative values count as 0.
    pub fn position(&self) -> i64 {
        let position = match self {
            Offset::None => 0,
            Offset::Int(n) => *n,
            Offset::Key(k) => offset_as_int(&Value::String(k.clone())),
        };
        position.max(0)
    }

    /// Offset after consuming `count` more records.
    pub fn advance(&self, count: usize) -> Offset {
        Offset::Int(self.position() + count as i64)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Offset::None)
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Offset::None => f.write_str("none"),
            Offset::Int(n) => write!(f, "{n}"),
            Offset::Key(k) => write!(f, "key:{k}"),
        }
    }
}

impl Checkpoint for Offset {
    const CHECKPOINT_TYPE: &'static str = "offset";

    fn to_cli_string(&self) -> String {
        match self {
            Offset::None => "none".to_string(),
            Offset::Int(n) => format!("int:{n}"),
            Offset::Key(k) => format!("key:{k}"),
        }
    }

    fn from_cli_string(s: &str) -> anyhow::Result<Self> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("none") {
            return Ok(Offset::None);
        }
        if let Some(n) = s.strip_prefix("int:") {
            let n = n
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid integer offset '{n}': {e}"))?;
            return non_negative(n);
        }
        if let Some(k) = s.strip_prefix("key:") {
            return Ok(Offset::Key(k.to_string()));
        }
        match s.parse::<i64>() {
            Ok(n) => non_negative(n),
            Err(_) => anyhow::bail!(
                "Invalid offset '{s}': expected 'none', 'int:<n>', 'key:<k>' or an integer"
            ),
        }
    }
}

fn non_negative(n: i64) -> anyhow::Result<Offset> {
    if n < 0 {
        anyhow::bail!("Invalid offset {n}: must not be negative");
    }
    Ok(Offset::Int(n))
}
