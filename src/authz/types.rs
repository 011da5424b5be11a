use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::authz::errors::AuthzError;

/// Number of value slots (`v0`..`v5`) in a stored rule.
pub const RULE_WIDTH: usize = 6;

pub const PERMISSION_PTYPE: &str = "p";
pub const GROUPING_PTYPE: &str = "g";

/// One persisted policy tuple. Unused slots hold the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyRule {
    pub ptype: String,
    pub v0: String,
    pub v1: String,
    pub v2: String,
    pub v3: String,
    pub v4: String,
    pub v5: String,
}

impl PolicyRule {
    /// Zip `values` into `v0..v5`, padding the tail with empty strings.
    pub fn new<S: AsRef<str>>(ptype: &str, values: &[S]) -> Result<Self, AuthzError> {
        if ptype.is_empty() {
            return Err(AuthzError::InvalidRule("ptype must not be empty".into()));
        }
        if values.len() > RULE_WIDTH {
            return Err(AuthzError::InvalidRule(format!(
                "{} values given, at most {RULE_WIDTH} are stored",
                values.len()
            )));
        }

        let mut slots: [String; RULE_WIDTH] = Default::default();
        for (slot, value) in slots.iter_mut().zip(values) {
            *slot = value.as_ref().to_string();
        }
        Ok(Self::from_slots(ptype.to_string(), slots))
    }

    pub fn permission(role: &str, resource: &str, action: &str) -> Self {
        Self {
            ptype: PERMISSION_PTYPE.into(),
            v0: role.into(),
            v1: resource.into(),
            v2: action.into(),
            ..Default::default()
        }
    }

    pub fn grouping(user: &str, role: &str) -> Self {
        Self {
            ptype: GROUPING_PTYPE.into(),
            v0: user.into(),
            v1: role.into(),
            ..Default::default()
        }
    }

    pub(crate) fn from_slots(ptype: String, slots: [String; RULE_WIDTH]) -> Self {
        let [v0, v1, v2, v3, v4, v5] = slots;
        Self {
            ptype,
            v0,
            v1,
            v2,
            v3,
            v4,
            v5,
        }
    }

    /// All six slots in order, empty ones included.
    pub fn slots(&self) -> [&str; RULE_WIDTH] {
        [
            self.v0.as_str(),
            self.v1.as_str(),
            self.v2.as_str(),
            self.v3.as_str(),
            self.v4.as_str(),
            self.v5.as_str(),
        ]
    }

    /// Slots up to the last non-empty one. Inner empty slots are kept.
    pub fn values(&self) -> Vec<&str> {
        let slots = self.slots();
        let len = slots
            .iter()
            .rposition(|v| !v.is_empty())
            .map(|i| i + 1)
            .unwrap_or(0);
        slots[..len].to_vec()
    }

    /// Textual policy line: `ptype, v0, v1, ...` without trailing empty fields.
    pub fn to_line(&self) -> String {
        let mut line = self.ptype.clone();
        for value in self.values() {
            line.push_str(", ");
            line.push_str(value);
        }
        line
    }

    /// Parse a policy line. Fields are trimmed; blank lines and lines with
    /// fewer than two non-empty fields (`p`, `p,`, `g, ,`) yield `None`.
    pub fn parse_line(line: &str) -> Result<Option<Self>, AuthzError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() < 2 || fields[1..].iter().all(|f| f.is_empty()) {
            return Ok(None);
        }
        Self::new(fields[0], &fields[1..]).map(Some)
    }

    pub fn is_permission(&self) -> bool {
        self.ptype == PERMISSION_PTYPE
    }

    pub fn is_grouping(&self) -> bool {
        self.ptype == GROUPING_PTYPE
    }
}

impl fmt::Display for PolicyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

/// Field window used by filtered load/remove: starting at `field_index`,
/// `field_values[i]` constrains `v{field_index + i}`. Empty values and
/// positions past `v5` are unconstrained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyFilter {
    pub ptype: String,
    pub field_index: usize,
    pub field_values: Vec<String>,
}

impl PolicyFilter {
    pub fn new<S: AsRef<str>>(
        ptype: &str,
        field_index: usize,
        field_values: &[S],
    ) -> Result<Self, AuthzError> {
        if field_index >= RULE_WIDTH {
            return Err(AuthzError::InvalidFilter(format!(
                "field index {field_index} is past v{}",
                RULE_WIDTH - 1
            )));
        }
        Ok(Self {
            ptype: ptype.to_string(),
            field_index,
            field_values: field_values.iter().map(|v| v.as_ref().to_string()).collect(),
        })
    }

    /// `(slot index, value)` pairs that actually constrain a match.
    pub fn constraints(&self) -> impl Iterator<Item = (usize, &str)> {
        self.field_values
            .iter()
            .enumerate()
            .map(move |(offset, value)| (self.field_index + offset, value.as_str()))
            .filter(|(index, value)| *index < RULE_WIDTH && !value.is_empty())
    }

    pub fn matches(&self, rule: &PolicyRule) -> bool {
        if rule.ptype != self.ptype {
            return false;
        }
        let slots = rule.slots();
        self.constraints().all(|(index, value)| slots[index] == value)
    }
}

/// Permission view of a `p` rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub resource: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl Permission {
    pub fn new(resource: &str, action: &str) -> Self {
        Self {
            resource: resource.to_string(),
            action: action.to_string(),
            domain: None,
        }
    }

    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = Some(domain.to_string());
        self
    }

    /// Parse `resource:action` or `resource:action:domain`.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.splitn(3, ':');
        let resource = parts.next()?.trim();
        let action = parts.next()?.trim();
        if resource.is_empty() || action.is_empty() {
            return None;
        }
        let permission = Self::new(resource, action);
        match parts.next().map(str::trim) {
            Some(domain) if !domain.is_empty() => Some(permission.with_domain(domain)),
            _ => Some(permission),
        }
    }

    pub fn from_rule(rule: &PolicyRule) -> Self {
        Self {
            resource: rule.v1.clone(),
            action: rule.v2.clone(),
            domain: (!rule.v3.is_empty()).then(|| rule.v3.clone()),
        }
    }

    pub fn to_rule(&self, role: &str) -> PolicyRule {
        let mut rule = PolicyRule::permission(role, &self.resource, &self.action);
        if let Some(domain) = &self.domain {
            rule.v3 = domain.clone();
        }
        rule
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.action)?;
        if let Some(domain) = &self.domain {
            write!(f, ":{domain}")?;
        }
        Ok(())
    }
}

/// Receiver of textual policy lines, implemented by a decision engine.
pub trait PolicyLoader: Send {
    /// Drop every previously loaded rule.
    fn clear(&mut self);
    fn load_policy_line(&mut self, line: &str);
}

/// In-memory set of rules rebuilt from policy lines.
#[derive(Debug, Clone, Default)]
pub struct PolicySnapshot {
    rules: BTreeSet<PolicyRule>,
}

impl PolicySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn contains(&self, rule: &PolicyRule) -> bool {
        self.rules.contains(rule)
    }
}

impl PolicyLoader for PolicySnapshot {
    fn clear(&mut self) {
        self.rules.clear();
    }

    fn load_policy_line(&mut self, line: &str) {
        match PolicyRule::parse_line(line) {
            Ok(Some(rule)) => {
                self.rules.insert(rule);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(line, error = %e, "Skipping malformed policy line"),
        }
    }
}
