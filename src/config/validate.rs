//! Configuration validation with unknown field detection and range checks.

use serde_json::{Map, Value};

use super::Config;

/// A validation diagnostic.
#[derive(Debug)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub path: String,
    pub message: String,
}

#[derive(Debug, PartialEq)]
pub enum DiagnosticLevel {
    Ok,
    Warn,
    Error,
}

impl Diagnostic {
    fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            path: path.into(),
            message: message.into(),
        }
    }

    fn warn(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warn,
            path: path.into(),
            message: message.into(),
        }
    }

    fn ok(message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Ok,
            path: String::new(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.level {
            DiagnosticLevel::Ok => "[OK]",
            DiagnosticLevel::Warn => "[WARN]",
            DiagnosticLevel::Error => "[ERROR]",
        };
        if self.path.is_empty() {
            write!(f, "{} {}", prefix, self.message)
        } else {
            write!(f, "{} {}: {}", prefix, self.path, self.message)
        }
    }
}

/// Simple Levenshtein distance for "did you mean?" suggestions.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut row = vec![i + 1; b_chars.len() + 1];
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            row[j + 1] = (prev[j + 1] + 1).min(row[j] + 1).min(prev[j] + cost);
        }
        prev = row;
    }
    prev[b_chars.len()]
}

/// Suggest the closest known field name (if distance <= 3).
pub fn suggest_field<'a>(unknown: &str, known: impl IntoIterator<Item = &'a str>) -> Option<String> {
    known
        .into_iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(k, _)| format!("did you mean '{}'?", k))
}

/// Validate a raw JSON config value against the known field names.
///
/// Known names come from the serialized default config, so every section
/// stays in sync with the structs without a hand-maintained list.
pub fn validate_config(raw: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let Some(obj) = raw.as_object() else {
        diagnostics.push(Diagnostic::error("", "Config must be a JSON object"));
        return diagnostics;
    };
    diagnostics.push(Diagnostic::ok("Valid JSON"));

    let known = match serde_json::to_value(Config::default()) {
        Ok(Value::Object(map)) => map,
        _ => return diagnostics,
    };

    let before = diagnostics.len();
    check_unknown(obj, &known, "", &mut diagnostics);
    if diagnostics.len() == before {
        diagnostics.push(Diagnostic::ok("All fields recognized"));
    }

    if let Ok(config) = serde_json::from_value::<Config>(raw.clone()) {
        diagnostics.extend(check_ranges(&config));
    } else {
        diagnostics.push(Diagnostic::error("", "Config does not match the expected types"));
    }

    diagnostics
}

fn check_unknown(
    obj: &Map<String, Value>,
    known: &Map<String, Value>,
    prefix: &str,
    out: &mut Vec<Diagnostic>,
) {
    for (key, value) in obj {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match known.get(key) {
            Some(Value::Object(known_child)) => {
                if let Some(child) = value.as_object() {
                    check_unknown(child, known_child, &path, out);
                }
            }
            Some(_) => {}
            None => {
                let message = match suggest_field(key, known.keys().map(String::as_str)) {
                    Some(hint) => format!("Unknown field '{}', {}", key, hint),
                    None => format!("Unknown field '{}'", key),
                };
                out.push(Diagnostic::error(path, message));
            }
        }
    }
}

/// Range checks on a parsed config. Errors here make loading fail.
pub fn check_ranges(config: &Config) -> Vec<Diagnostic> {
    let mut out = Vec::new();

    let q = &config.queue;
    if q.time_limit_lower_bound_ms > q.time_limit_upper_bound_ms {
        out.push(Diagnostic::error(
            "queue.time_limit_lower_bound_ms",
            "must not exceed time_limit_upper_bound_ms",
        ));
    }
    if config.dispatcher.poll_interval_ms == 0 {
        out.push(Diagnostic::error(
            "dispatcher.poll_interval_ms",
            "must be positive",
        ));
    }
    if config.dispatcher.sweep_interval_secs == 0 {
        out.push(Diagnostic::error(
            "dispatcher.sweep_interval_secs",
            "must be positive",
        ));
    }

    let l = &config.limits;
    if !(0.0..=1.0).contains(&l.group_per_user_max_other_usage_coeff) {
        out.push(Diagnostic::error(
            "limits.group_per_user_max_other_usage_coeff",
            "must be within [0, 1]",
        ));
    }
    if l.recent_window_secs > l.total_window_secs {
        out.push(Diagnostic::error(
            "limits.recent_window_secs",
            "must not exceed total_window_secs",
        ));
    }
    let c = &l.cost;
    if c.cached_divisor == 0 || c.fresh_divisor == 0 || c.uncached_prompt_divisor == 0 {
        out.push(Diagnostic::error("limits.cost", "divisors must be positive"));
    }
    if l.private_support_tokens_limit < l.private_tokens_limit {
        out.push(Diagnostic::warn(
            "limits.private_support_tokens_limit",
            "supporters get less than regular users",
        ));
    }

    let cc = &config.completion;
    if cc.max_attempts == 0 || cc.max_iterations == 0 {
        out.push(Diagnostic::error(
            "completion",
            "max_attempts and max_iterations must be positive",
        ));
    }

    if config.attention.ignoring_streak_limit == 0 {
        out.push(Diagnostic::warn(
            "attention.ignoring_streak_limit",
            "0 unfocuses on the first ignored message",
        ));
    }

    out
}
