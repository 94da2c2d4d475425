//! Locating the used/limit figures inside a usage response.
//!
//! Each figure is resolved independently, first hit wins:
//! 1. the explicit dotted path from settings, if one is configured (and then
//!    nothing else is tried for that figure)
//! 2. known response shapes (team member spend, individual plan usage)
//! 3. a breadth-first search for well-known key names anywhere in the document
//!
//! Paths are dotted with numeric segments for array indices, e.g.
//! `teamMemberSpend.0.includedSpendCents`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;

use crate::storage::UsageConfig;

pub const USED_KEYS: &[&str] = &[
    "spendCents",
    "spend",
    "usage",
    "used",
    "totalSpendCents",
    "totalSpend",
    "monthlySpendCents",
    "monthlySpend",
];

pub const LIMIT_KEYS: &[&str] = &[
    "spendLimitCents",
    "limit",
    "quota",
    "max",
    "usageLimit",
    "monthlyLimit",
];

const TEAM_MEMBERS_FIELD: &str = "teamMemberSpend";
const MEMBER_USED_FIELDS: &[&str] = &["includedSpendCents", "spendCents"];
const PLAN_USED_PATHS: &[&str] = &[
    "individualUsage.plan.breakdown.total",
    "individualUsage.plan.used",
];
const PLAN_LIMIT_PATHS: &[&str] = &["individualUsage.plan.limit"];

/// Extracted figures plus where each one was found
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_path: Option<String>,
}

impl UsageResult {
    fn from_hits(used: Option<Hit>, limit: Option<Hit>) -> Self {
        let (used, used_path) = split_hit(used);
        let (limit, limit_path) = split_hit(limit);
        Self {
            used,
            limit,
            percent: percent_of(used, limit),
            used_path,
            limit_path,
        }
    }

    pub fn has_data(&self) -> bool {
        self.used.is_some()
    }
}

/// `used / limit * 100`, only when both exist and the limit is positive
pub fn percent_of(used: Option<f64>, limit: Option<f64>) -> Option<f64> {
    match (used, limit) {
        (Some(used), Some(limit)) if limit > 0.0 => Some(used / limit * 100.0),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Hit {
    value: f64,
    path: String,
}

fn split_hit(hit: Option<Hit>) -> (Option<f64>, Option<String>) {
    match hit {
        Some(hit) => (Some(hit.value), Some(hit.path)),
        None => (None, None),
    }
}

pub fn extract_usage(body: &Value, config: &UsageConfig) -> UsageResult {
    let used = match config.used_path() {
        Some(path) => probe_path(body, path),
        None => known_used(body, config.account_email())
            .or_else(|| find_numeric_key(body, USED_KEYS)),
    };
    let limit = match config.limit_path() {
        Some(path) => probe_path(body, path),
        None => probe_paths(body, PLAN_LIMIT_PATHS).or_else(|| find_numeric_key(body, LIMIT_KEYS)),
    };

    tracing::debug!(
        "Extracted used={:?} limit={:?}",
        used.as_ref().map(|h| h.path.as_str()),
        limit.as_ref().map(|h| h.path.as_str())
    );
    UsageResult::from_hits(used, limit)
}

fn known_used(body: &Value, email: Option<&str>) -> Option<Hit> {
    email
        .and_then(|email| team_member_used(body, email))
        .or_else(|| probe_paths(body, PLAN_USED_PATHS))
}

fn team_member_used(body: &Value, email: &str) -> Option<Hit> {
    let wanted = email.trim().to_lowercase();
    let members = body.get(TEAM_MEMBERS_FIELD)?.as_array()?;
    let (index, member) = members.iter().enumerate().find(|(_, member)| {
        member
            .get("email")
            .and_then(Value::as_str)
            .map(|candidate| candidate.trim().to_lowercase() == wanted)
            .unwrap_or(false)
    })?;

    MEMBER_USED_FIELDS.iter().find_map(|field| {
        let value = member.get(*field).and_then(to_number)?;
        Some(Hit {
            value,
            path: format!("{}.{}.{}", TEAM_MEMBERS_FIELD, index, field),
        })
    })
}

fn probe_paths(body: &Value, paths: &[&str]) -> Option<Hit> {
    paths.iter().find_map(|path| probe_path(body, path))
}

fn probe_path(body: &Value, path: &str) -> Option<Hit> {
    let value = value_at_path(body, path).and_then(to_number)?;
    Some(Hit {
        value,
        path: path.trim().to_string(),
    })
}

/// Walk a dotted path; numeric segments index into arrays
pub fn value_at_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.trim().split('.').filter(|s| !s.is_empty()) {
        current = match current {
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            Value::Object(map) => map.get(segment)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Finite number, or a string holding one
pub fn to_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok()?
        }
        _ => return None,
    };
    number.is_finite().then_some(number)
}

/// Breadth-first search for the shallowest key (case-insensitive) in `keys`
/// holding a usable number. Siblings are visited in document order.
fn find_numeric_key(root: &Value, keys: &[&str]) -> Option<Hit> {
    let wanted: Vec<String> = keys.iter().map(|k| k.to_ascii_lowercase()).collect();
    let mut queue: VecDeque<(String, &Value)> = VecDeque::from([(String::new(), root)]);

    while let Some((path, node)) = queue.pop_front() {
        match node {
            Value::Object(map) => {
                for (key, child) in map {
                    let child_path = join_path(&path, key);
                    if wanted.contains(&key.to_ascii_lowercase()) {
                        if let Some(value) = to_number(child) {
                            return Some(Hit {
                                value,
                                path: child_path,
                            });
                        }
                    }
                    if is_container(child) {
                        queue.push_back((child_path, child));
                    }
                }
            }
            Value::Array(items) => {
                for (index, child) in items.iter().enumerate() {
                    if is_container(child) {
                        queue.push_back((join_path(&path, &index.to_string()), child));
                    }
                }
            }
            _ => {}
        }
    }
    None
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

fn join_path(parent: &str, segment: &str) -> String {
    if parent.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", parent, segment)
    }
}
