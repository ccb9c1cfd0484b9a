//! Secret redaction applied to every payload before it is persisted.
//!
//! Two rules, applied recursively:
//! - shape patterns mask secret-looking substrings inside strings;
//! - a key-name heuristic masks the whole value of any object field whose
//!   name looks secret-related, whatever the value's type.
//!
//! Redaction is one-way. Nothing here logs the input it was given.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde_json::{Map, Value};

/// Fixed-width placeholder substituted for every masked value.
pub const REDACTED: &str = "********";

/// Built-in secret shapes, applied in this order.
pub const BUILTIN_PATTERNS: [&str; 4] = [
    // OpenAI-style API keys
    r"sk-[a-zA-Z0-9]{20,}",
    // GitHub personal access tokens
    r"ghp_[a-zA-Z0-9]{20,}",
    // JWTs
    r"eyJ[a-zA-Z0-9_-]{10,}\.[a-zA-Z0-9_-]{10,}\.[a-zA-Z0-9_-]{10,}",
    // Slack tokens
    r"xox[baprs]-[a-zA-Z0-9]{10,}",
];

static BUILTIN_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    BUILTIN_PATTERNS
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
});

static SECRET_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)key|token|secret|password|auth").unwrap());

/// Compiled redaction rule set.
#[derive(Debug, Clone)]
pub struct Redactor {
    patterns: Vec<Regex>,
}

impl Default for Redactor {
    fn default() -> Self {
        Self {
            patterns: BUILTIN_RES.clone(),
        }
    }
}

impl Redactor {
    /// Built-in patterns followed by `extra` patterns (in the given order).
    pub fn with_extra_patterns(extra: &[String]) -> Result<Self> {
        let mut redactor = Self::default();
        for pattern in extra {
            let re = Regex::new(pattern)
                .with_context(|| format!("compile redaction pattern '{pattern}'"))?;
            redactor.patterns.push(re);
        }
        Ok(redactor)
    }

    /// Mask every match of every shape pattern with [`REDACTED`].
    pub fn redact_text(&self, text: &str) -> String {
        let mut out = text.to_string();
        for re in &self.patterns {
            if re.is_match(&out) {
                out = re.replace_all(&out, REDACTED).into_owned();
            }
        }
        out
    }

    /// Recursively redact a JSON value.
    pub fn redact_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.redact_text(s)),
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.redact_value(v)).collect())
            }
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, v) in map {
                    let redacted = if is_secret_key(key) {
                        Value::String(REDACTED.to_string())
                    } else {
                        self.redact_value(v)
                    };
                    out.insert(key.clone(), redacted);
                }
                Value::Object(out)
            }
            other => other.clone(),
        }
    }
}

/// Whether an object key names a secret (`api_key`, `Authorization`, ...).
pub fn is_secret_key(key: &str) -> bool {
    SECRET_KEY_RE.is_match(key)
}
