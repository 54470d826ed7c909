//! YAML-driven test profile engine: injects delays and reclaim-timing
//! overrides into the lifecycle engine, matched against the shape of the
//! request/instance currently being processed.

use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("reading test profile {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing test profile {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid duration literal '{0}'")]
    BadDuration(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Allocate,
    Start,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum When {
    Before,
    After,
}

/// The request/instance shape a rule's `when` clause is matched against.
#[derive(Debug, Clone, Default)]
pub struct RequestFacts {
    pub action: String,
    pub market_type: Option<String>,
    pub instance_type: String,
    pub vcpu: Option<u32>,
    pub memory_mib: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct ReclaimOverride {
    pub after: Option<Duration>,
    pub notice: Option<Duration>,
}

#[derive(Debug, Deserialize)]
struct Document {
    #[allow(dead_code)]
    version: u32,
    #[serde(default)]
    rules: Vec<RawRule>,
}

#[derive(Debug, Deserialize)]
struct RawRule {
    #[serde(default)]
    when: RawWhen,
    #[serde(default)]
    delay: Option<RawDelay>,
    #[serde(default)]
    reclaim: Option<RawReclaim>,
}

#[derive(Debug, Deserialize, Default)]
struct RawWhen {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    request: Option<RawRequestWhen>,
    #[serde(default)]
    instance: Option<RawInstanceWhen>,
}

#[derive(Debug, Deserialize, Default)]
struct RawRequestWhen {
    #[serde(default)]
    market: Option<RawMarketWhen>,
}

#[derive(Debug, Deserialize, Default)]
struct RawMarketWhen {
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawInstanceWhen {
    #[serde(rename = "type", default)]
    type_match: Option<RawStringMatch>,
    #[serde(default)]
    vcpu: Option<RawNumericMatch>,
    #[serde(default)]
    memory_mib: Option<RawNumericMatch>,
}

#[derive(Debug, Deserialize)]
struct RawStringMatch {
    equals: Option<String>,
    glob: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawNumericMatch {
    gte: Option<u32>,
    lte: Option<u32>,
    gt: Option<u32>,
    lt: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct RawDelay {
    #[serde(default)]
    before: RawDelayPhases,
    #[serde(default)]
    after: RawDelayPhases,
}

#[derive(Debug, Deserialize, Default)]
struct RawDelayPhases {
    allocate: Option<String>,
    start: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawReclaim {
    after: Option<String>,
    notice: Option<String>,
}

struct Rule {
    action: Option<String>,
    market_type: Option<String>,
    instance_type: Option<StringMatch>,
    vcpu: Option<NumericMatch>,
    memory_mib: Option<NumericMatch>,
    before_allocate: Duration,
    before_start: Duration,
    after_allocate: Duration,
    after_start: Duration,
    reclaim_after: Option<Duration>,
    reclaim_notice: Option<Duration>,
}

enum StringMatch {
    Equals(String),
    Glob(String),
}

struct NumericMatch {
    gte: Option<u32>,
    lte: Option<u32>,
    gt: Option<u32>,
    lt: Option<u32>,
}

impl NumericMatch {
    fn matches(&self, value: u32) -> bool {
        self.gte.is_none_or(|b| value >= b)
            && self.lte.is_none_or(|b| value <= b)
            && self.gt.is_none_or(|b| value > b)
            && self.lt.is_none_or(|b| value < b)
    }
}

impl Rule {
    fn matches(&self, facts: &RequestFacts) -> bool {
        if let Some(action) = &self.action
            && !action.eq_ignore_ascii_case(&facts.action)
        {
            return false;
        }
        if let Some(market) = &self.market_type {
            match &facts.market_type {
                Some(actual) if actual.eq_ignore_ascii_case(market) => {}
                _ => return false,
            }
        }
        if let Some(type_match) = &self.instance_type {
            let ok = match type_match {
                StringMatch::Equals(s) => s.eq_ignore_ascii_case(&facts.instance_type),
                StringMatch::Glob(pattern) => glob_match(pattern, &facts.instance_type),
            };
            if !ok {
                return false;
            }
        }
        if let Some(vcpu_match) = &self.vcpu {
            match facts.vcpu {
                Some(v) if vcpu_match.matches(v) => {}
                _ => return false,
            }
        }
        if let Some(mem_match) = &self.memory_mib {
            match facts.memory_mib {
                Some(v) if mem_match.matches(v) => {}
                _ => return false,
            }
        }
        true
    }
}

/// Case-insensitive shell-style glob supporting `*` and `?`.
fn glob_match(pattern: &str, text: &str) -> bool {
    fn recurse(p: &[char], t: &[char]) -> bool {
        match p.first() {
            None => t.is_empty(),
            Some('*') => recurse(&p[1..], t) || (!t.is_empty() && recurse(p, &t[1..])),
            Some('?') => !t.is_empty() && recurse(&p[1..], &t[1..]),
            Some(c) => t.first().is_some_and(|tc| tc == c) && recurse(&p[1..], &t[1..]),
        }
    }
    let pattern: Vec<char> = pattern.to_ascii_lowercase().chars().collect();
    let text: Vec<char> = text.to_ascii_lowercase().chars().collect();
    recurse(&pattern, &text)
}

fn parse_duration(s: &str) -> Result<Duration, ProfileError> {
    let s = s.trim();
    let split_at = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .ok_or_else(|| ProfileError::BadDuration(s.to_string()))?;
    let (number, unit) = s.split_at(split_at);
    let number: f64 = number.parse().map_err(|_| ProfileError::BadDuration(s.to_string()))?;
    let seconds = match unit {
        "ms" => number / 1000.0,
        "s" => number,
        "m" => number * 60.0,
        _ => return Err(ProfileError::BadDuration(s.to_string())),
    };
    Ok(Duration::from_secs_f64(seconds.max(0.0)))
}

fn parse_duration_opt(s: &Option<String>) -> Result<Duration, ProfileError> {
    match s {
        Some(s) => parse_duration(s),
        None => Ok(Duration::ZERO),
    }
}

fn compile(doc: Document) -> Result<Vec<Rule>, ProfileError> {
    doc.rules
        .into_iter()
        .map(|raw| {
            let market_type = raw.when.request.and_then(|r| r.market).and_then(|m| m.kind);
            let (instance_type, vcpu, memory_mib) = match raw.when.instance {
                Some(i) => (
                    i.type_match
                        .map(|m| match (m.equals, m.glob) {
                            (Some(eq), _) => Ok(StringMatch::Equals(eq)),
                            (None, Some(glob)) => Ok(StringMatch::Glob(glob)),
                            (None, None) => {
                                Err(ProfileError::BadDuration("instance.type needs equals or glob".into()))
                            }
                        })
                        .transpose()?,
                    i.vcpu.map(|n| NumericMatch {
                        gte: n.gte,
                        lte: n.lte,
                        gt: n.gt,
                        lt: n.lt,
                    }),
                    i.memory_mib.map(|n| NumericMatch {
                        gte: n.gte,
                        lte: n.lte,
                        gt: n.gt,
                        lt: n.lt,
                    }),
                ),
                None => (None, None, None),
            };
            let delay = raw.delay.unwrap_or_default();
            let reclaim = raw.reclaim.unwrap_or_default();
            Ok(Rule {
                action: raw.when.action,
                market_type,
                instance_type,
                vcpu,
                memory_mib,
                before_allocate: parse_duration_opt(&delay.before.allocate)?,
                before_start: parse_duration_opt(&delay.before.start)?,
                after_allocate: parse_duration_opt(&delay.after.allocate)?,
                after_start: parse_duration_opt(&delay.after.start)?,
                reclaim_after: reclaim.after.as_ref().map(|s| parse_duration(s)).transpose()?,
                reclaim_notice: reclaim.notice.as_ref().map(|s| parse_duration(s)).transpose()?,
            })
        })
        .collect()
}

pub struct ProfileEngine {
    rules: RwLock<Vec<Rule>>,
}

impl Default for ProfileEngine {
    fn default() -> Self {
        Self { rules: RwLock::new(Vec::new()) }
    }
}

impl ProfileEngine {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let rules = Self::read(path.as_ref())?;
        Ok(Self { rules: RwLock::new(rules) })
    }

    /// Re-reads `path` and atomically swaps the active rule set.
    pub fn reload(&self, path: impl AsRef<Path>) -> Result<(), ProfileError> {
        let rules = Self::read(path.as_ref())?;
        *self.rules.write().unwrap() = rules;
        Ok(())
    }

    fn read(path: &Path) -> Result<Vec<Rule>, ProfileError> {
        let text = std::fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let doc: Document = serde_yaml::from_str(&text).map_err(|source| ProfileError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        compile(doc)
    }

    /// Sum of durations across every rule matching `facts` for this
    /// hook/phase — stacking semantics, unlike reclaim overrides below.
    pub fn delay(&self, facts: &RequestFacts, hook: Hook, when: When) -> Duration {
        let rules = self.rules.read().unwrap();
        rules
            .iter()
            .filter(|r| r.matches(facts))
            .map(|r| match (hook, when) {
                (Hook::Allocate, When::Before) => r.before_allocate,
                (Hook::Start, When::Before) => r.before_start,
                (Hook::Allocate, When::After) => r.after_allocate,
                (Hook::Start, When::After) => r.after_start,
            })
            .sum()
    }

    /// Last matching rule wins for each of `after`/`notice` independently —
    /// scalar-replacement semantics, unlike `delay` above.
    pub fn reclaim_overrides(&self, facts: &RequestFacts) -> ReclaimOverride {
        let rules = self.rules.read().unwrap();
        let mut out = ReclaimOverride::default();
        for rule in rules.iter().filter(|r| r.matches(facts)) {
            if let Some(after) = rule.reclaim_after {
                out.after = Some(after);
            }
            if let Some(notice) = rule.reclaim_notice {
                out.notice = Some(notice);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_from_yaml(yaml: &str) -> ProfileEngine {
        let doc: Document = serde_yaml::from_str(yaml).unwrap();
        ProfileEngine { rules: RwLock::new(compile(doc).unwrap()) }
    }

    #[test]
    fn delays_stack_across_matching_rules() {
        let engine = engine_from_yaml(
            r#"
version: 1
rules:
  - when: { action: RunInstances }
    delay: { before: { allocate: 100ms } }
  - when: { instance: { type: { glob: "t3.*" } } }
    delay: { before: { allocate: 200ms } }
"#,
        );
        let facts = RequestFacts {
            action: "RunInstances".into(),
            instance_type: "t3.micro".into(),
            ..Default::default()
        };
        assert_eq!(
            engine.delay(&facts, Hook::Allocate, When::Before),
            Duration::from_millis(300)
        );
    }

    #[test]
    fn reclaim_overrides_take_last_match() {
        let engine = engine_from_yaml(
            r#"
version: 1
rules:
  - when: { request: { market: { type: spot } } }
    reclaim: { after: 10s, notice: 5s }
  - when: { instance: { type: { equals: "t3.micro" } } }
    reclaim: { after: 2.5s }
"#,
        );
        let facts = RequestFacts {
            action: "RunInstances".into(),
            market_type: Some("spot".into()),
            instance_type: "t3.micro".into(),
            ..Default::default()
        };
        let overrides = engine.reclaim_overrides(&facts);
        assert_eq!(overrides.after, Some(Duration::from_millis(2500)));
        assert_eq!(overrides.notice, Some(Duration::from_secs(5)));
    }

    #[test]
    fn glob_matches_are_case_insensitive() {
        assert!(glob_match("T3.*", "t3.micro"));
        assert!(glob_match("t?.micro", "t3.micro"));
        assert!(!glob_match("m5.*", "t3.micro"));
    }

    #[test]
    fn non_matching_rule_contributes_nothing() {
        let engine = engine_from_yaml(
            r#"
version: 1
rules:
  - when: { action: StopInstances }
    delay: { before: { allocate: 1s } }
"#,
        );
        let facts = RequestFacts { action: "RunInstances".into(), ..Default::default() };
        assert_eq!(engine.delay(&facts, Hook::Allocate, When::Before), Duration::ZERO);
    }
}
