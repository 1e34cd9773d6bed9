//! Declarative message-shape predicates.
//!
//! A river never inspects a message with ad-hoc `if`s to decide whether it is
//! its turn. It declares a [`Precondition`]: which event name(s) it reacts to
//! and which keys must or must not be present. Evaluation is pure, so a
//! redelivered message is judged exactly like the first delivery.

use serde_json::Value;
use smallvec::SmallVec;

use crate::packet::Packet;

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// Key is present and not `null`.
    RequireKey(String),
    /// Key is absent or `null`. Put a river's own output key here.
    RejectKey(String),
    /// Key equals the value.
    RequireValue { key: String, value: Value },
    /// Key equals one of the values.
    RequireAny { key: String, values: Vec<Value> },
}

/// Why a precondition did not hold. Only used for trace logging.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Mismatch {
    #[error("message has no event name")]
    MissingEventName,
    #[error("event name `{actual}` is not one of {expected:?}")]
    EventName { expected: Vec<String>, actual: String },
    #[error("required key `{0}` is missing")]
    MissingKey(String),
    #[error("rejected key `{0}` is present")]
    RejectedKey(String),
    #[error("key `{key}` is {actual:?}, expected {expected}")]
    UnexpectedValue {
        key: String,
        expected: String,
        actual: Option<Value>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Precondition {
    event_names: SmallVec<[String; 2]>,
    clauses: SmallVec<[Clause; 6]>,
}

impl Precondition {
    /// React to a single event name.
    pub fn event(name: impl Into<String>) -> Self {
        Self {
            event_names: SmallVec::from_iter([name.into()]),
            clauses: SmallVec::new(),
        }
    }

    /// React to any of several event names.
    pub fn events<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            event_names: names.into_iter().map(Into::into).collect(),
            clauses: SmallVec::new(),
        }
    }

    pub fn require_key(mut self, key: impl Into<String>) -> Self {
        self.clauses.push(Clause::RequireKey(key.into()));
        self
    }

    pub fn require_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.clauses
            .extend(keys.into_iter().map(|key| Clause::RequireKey(key.into())));
        self
    }

    pub fn reject_key(mut self, key: impl Into<String>) -> Self {
        self.clauses.push(Clause::RejectKey(key.into()));
        self
    }

    pub fn require_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push(Clause::RequireValue {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn require_any<I, V>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.clauses.push(Clause::RequireAny {
            key: key.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn event_names(&self) -> &[String] {
        &self.event_names
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Check the message, returning the first clause that fails.
    pub fn evaluate(&self, packet: &Packet) -> Result<(), Mismatch> {
        let actual = packet.event_name().ok_or(Mismatch::MissingEventName)?;
        if !self.event_names.iter().any(|name| name == actual) {
            return Err(Mismatch::EventName {
                expected: self.event_names.to_vec(),
                actual: actual.to_string(),
            });
        }

        for clause in &self.clauses {
            match clause {
                Clause::RequireKey(key) => {
                    if !packet.contains(key) {
                        return Err(Mismatch::MissingKey(key.clone()));
                    }
                }
                Clause::RejectKey(key) => {
                    if packet.contains(key) {
                        return Err(Mismatch::RejectedKey(key.clone()));
                    }
                }
                Clause::RequireValue { key, value } => {
                    let found = packet.get(key);
                    if found != Some(value) {
                        return Err(Mismatch::UnexpectedValue {
                            key: key.clone(),
                            expected: value.to_string(),
                            actual: found.cloned(),
                        });
                    }
                }
                Clause::RequireAny { key, values } => {
                    let found = packet.get(key);
                    if !found.is_some_and(|found| values.contains(found)) {
                        return Err(Mismatch::UnexpectedValue {
                            key: key.clone(),
                            expected: format!("one of {}", Value::Array(values.clone())),
                            actual: found.cloned(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    pub fn is_satisfied_by(&self, packet: &Packet) -> bool {
        self.evaluate(packet).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn packet(value: Value) -> Packet {
        Packet::from_value(value).unwrap()
    }

    fn beregning_precondition() -> Precondition {
        Precondition::event("OMREGNING:VILKAARSVURDERT")
            .require_keys(["hendelse_data.behandlingId", "hendelse_data.sakType"])
            .reject_key("beregning")
    }

    #[test]
    fn test_matches_when_all_clauses_hold() {
        let msg = packet(json!({
            "@event_name": "OMREGNING:VILKAARSVURDERT",
            "hendelse_data": { "behandlingId": "b", "sakType": "BARNEPENSJON" }
        }));
        assert_eq!(beregning_precondition().evaluate(&msg), Ok(()));
    }

    #[test]
    fn test_other_event_name_does_not_match() {
        let msg = packet(json!({
            "@event_name": "OMREGNING:BEREGNA",
            "hendelse_data": { "behandlingId": "b", "sakType": "BARNEPENSJON" }
        }));
        assert!(matches!(
            beregning_precondition().evaluate(&msg),
            Err(Mismatch::EventName { .. })
        ));
    }

    #[test]
    fn test_own_output_key_rejects_redelivery() {
        let msg = packet(json!({
            "@event_name": "OMREGNING:VILKAARSVURDERT",
            "hendelse_data": { "behandlingId": "b", "sakType": "BARNEPENSJON" },
            "beregning": {}
        }));
        assert_eq!(
            beregning_precondition().evaluate(&msg),
            Err(Mismatch::RejectedKey("beregning".into()))
        );
    }

    #[test]
    fn test_missing_nested_key() {
        let msg = packet(json!({
            "@event_name": "OMREGNING:VILKAARSVURDERT",
            "hendelse_data": { "sakType": "BARNEPENSJON" }
        }));
        assert_eq!(
            beregning_precondition().evaluate(&msg),
            Err(Mismatch::MissingKey("hendelse_data.behandlingId".into()))
        );
    }

    #[test]
    fn test_require_value_and_any() {
        let oms = packet(json!({
            "@event_name": "E",
            "hendelse_data": { "sakType": "OMSTILLINGSSTOENAD", "aarsak": "REGULERING" }
        }));

        let only_oms = Precondition::event("E")
            .require_value("hendelse_data.sakType", "OMSTILLINGSSTOENAD");
        let only_bp = Precondition::event("E").require_value("hendelse_data.sakType", "BARNEPENSJON");
        let either = Precondition::event("E")
            .require_any("hendelse_data.aarsak", ["REGULERING", "OMREGNING"]);
        let neither = Precondition::event("E").require_any("hendelse_data.aarsak", ["MIGRERING"]);

        assert!(only_oms.is_satisfied_by(&oms));
        assert!(!only_bp.is_satisfied_by(&oms));
        assert!(either.is_satisfied_by(&oms));
        assert!(!neither.is_satisfied_by(&oms));
    }

    #[test]
    fn test_multiple_event_names() {
        let precondition = Precondition::events(["A", "B"]);
        assert!(precondition.is_satisfied_by(&Packet::new("A")));
        assert!(precondition.is_satisfied_by(&Packet::new("B")));
        assert!(!precondition.is_satisfied_by(&Packet::new("C")));
    }

    #[test]
    fn test_evaluation_has_no_side_effects() {
        let msg = Packet::new("A");
        let before = msg.clone();
        let precondition = Precondition::event("A").reject_key("x");
        for _ in 0..3 {
            assert!(precondition.is_satisfied_by(&msg));
        }
        assert_eq!(msg, before);
    }
}
