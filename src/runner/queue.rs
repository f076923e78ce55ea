//! Parsing and validation for the Runner's `-c [<queue>:]<n>` flag:
//! per-queue concurrency limits, with the "unnamed global queue is
//! mutually exclusive with named queues" rule from `spec.md` §5/§8.

use std::collections::HashMap;

pub const GLOBAL_QUEUE: &str = "global";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueConfigError {
    ZeroConcurrency(String),
    GlobalAndNamedMixed,
    DuplicateQueue(String),
    Malformed(String),
}

impl std::fmt::Display for QueueConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueConfigError::ZeroConcurrency(q) => {
                write!(f, "queue `{q}` has concurrency 0, must be positive")
            }
            QueueConfigError::GlobalAndNamedMixed => {
                write!(f, "an unnamed global queue cannot be combined with named queues")
            }
            QueueConfigError::DuplicateQueue(q) => write!(f, "queue `{q}` specified more than once"),
            QueueConfigError::Malformed(raw) => write!(f, "malformed -c value `{raw}`"),
        }
    }
}

impl std::error::Error for QueueConfigError {}

/// Parse one `-c` flag value (`[<queue>:]<n>`) into `(queue name, n)`.
/// An omitted queue name resolves to [`GLOBAL_QUEUE`].
fn parse_one(raw: &str) -> Result<(String, usize), QueueConfigError> {
    let (name, count) = match raw.rsplit_once(':') {
        Some((name, count)) => (name.to_string(), count),
        None => (GLOBAL_QUEUE.to_string(), raw),
    };
    let count: usize = count
        .parse()
        .map_err(|_| QueueConfigError::Malformed(raw.to_string()))?;
    Ok((name, count))
}

/// Parse every repeated `-c` flag into a validated queue → concurrency map.
pub fn parse_queue_concurrency(raw_values: &[String]) -> Result<HashMap<String, usize>, QueueConfigError> {
    let mut queues = HashMap::new();
    for raw in raw_values {
        let (name, count) = parse_one(raw)?;
        if count == 0 {
            return Err(QueueConfigError::ZeroConcurrency(name));
        }
        if queues.insert(name.clone(), count).is_some() {
            return Err(QueueConfigError::DuplicateQueue(name));
        }
    }
    if queues.len() > 1 && queues.contains_key(GLOBAL_QUEUE) {
        return Err(QueueConfigError::GlobalAndNamedMixed);
    }
    Ok(queues)
}

/// Which queue a LoadTest is assigned to, read from its annotations under
/// `annotation_key` (default `pool`). Falls back to [`GLOBAL_QUEUE`] when
/// the annotation is absent or the runner was configured with only a
/// global queue.
pub fn queue_for(annotations: &std::collections::BTreeMap<String, String>, annotation_key: &str) -> String {
    annotations
        .get(annotation_key)
        .cloned()
        .unwrap_or_else(|| GLOBAL_QUEUE.to_string())
}
