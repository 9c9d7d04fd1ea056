use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The fixed action vocabulary of ARC-AGI-3 style games.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameAction {
    Reset,
    Action1,
    Action2,
    Action3,
    Action4,
    Action5,
    /// Targeted click; the only action that takes coordinates.
    Action6,
    Action7,
}

impl GameAction {
    pub const ALL: [GameAction; 8] = [
        Self::Reset,
        Self::Action1,
        Self::Action2,
        Self::Action3,
        Self::Action4,
        Self::Action5,
        Self::Action6,
        Self::Action7,
    ];

    /// Integer code used by the backend: `0` is reset, `1..=7` the numbered actions.
    pub fn code(self) -> u8 {
        match self {
            Self::Reset => 0,
            Self::Action1 => 1,
            Self::Action2 => 2,
            Self::Action3 => 3,
            Self::Action4 => 4,
            Self::Action5 => 5,
            Self::Action6 => 6,
            Self::Action7 => 7,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    /// Case- and separator-insensitive: `reset`, `Action2`, `action_3`, `ACTION-4`, `"5"`.
    pub fn parse_token(token: &str) -> Option<Self> {
        let canonical: String = token
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect();

        if canonical.is_empty() {
            return None;
        }
        if canonical == "RESET" {
            return Some(Self::Reset);
        }
        let digits = canonical.strip_prefix("ACTION").unwrap_or(&canonical);
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let code: i64 = digits.parse().ok()?;
        // Bare `0` is reset, `ACTION0` is not a thing.
        if code == 0 && digits.len() != canonical.len() {
            return None;
        }
        Self::from_code(code)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reset => "RESET",
            Self::Action1 => "ACTION1",
            Self::Action2 => "ACTION2",
            Self::Action3 => "ACTION3",
            Self::Action4 => "ACTION4",
            Self::Action5 => "ACTION5",
            Self::Action6 => "ACTION6",
            Self::Action7 => "ACTION7",
        }
    }

    pub fn requires_coordinates(self) -> bool {
        self == Self::Action6
    }
}

impl fmt::Display for GameAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_token(s).ok_or_else(|| format!("unknown action: {s}"))
    }
}

/// Result of classifying a backend action restriction list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionRestriction {
    pub recognized: BTreeSet<GameAction>,
    pub unrecognized: Vec<Value>,
}

impl ActionRestriction {
    /// The allowed set, or `None` for "allow all".
    ///
    /// Any token we cannot classify fails open: hiding a valid action is worse
    /// than showing one the backend will reject itself. An empty list fails open too.
    pub fn allowed(&self) -> Option<&BTreeSet<GameAction>> {
        if !self.unrecognized.is_empty() || self.recognized.is_empty() {
            None
        } else {
            Some(&self.recognized)
        }
    }

    pub fn into_allowed(self) -> Option<BTreeSet<GameAction>> {
        self.allowed().is_some().then_some(self.recognized)
    }
}

pub fn classify_actions(values: &[Value]) -> ActionRestriction {
    let mut out = ActionRestriction::default();
    for v in values {
        let parsed = match v {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .and_then(GameAction::from_code),
            Value::String(s) => GameAction::parse_token(s),
            _ => None,
        };
        match parsed {
            Some(action) => {
                out.recognized.insert(action);
            }
            None => out.unrecognized.push(v.clone()),
        }
    }
    if !out.unrecognized.is_empty() {
        tracing::debug!(
            target: "arcscope.view",
            unrecognized = ?out.unrecognized,
            "unclassifiable action tokens; allowing all actions"
        );
    }
    out
}

/// `None` means no restriction (absent list, empty list, or any unknown token).
pub fn normalize_available_actions(values: Option<&[Value]>) -> Option<BTreeSet<GameAction>> {
    values.and_then(|v| classify_actions(v).into_allowed())
}

pub fn is_action_allowed(allowed: Option<&BTreeSet<GameAction>>, action: GameAction) -> bool {
    allowed.map(|set| set.contains(&action)).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_token_variants() {
        assert_eq!(GameAction::parse_token("reset"), Some(GameAction::Reset));
        assert_eq!(GameAction::parse_token("Action2"), Some(GameAction::Action2));
        assert_eq!(GameAction::parse_token("action_3"), Some(GameAction::Action3));
        assert_eq!(GameAction::parse_token("ACTION-4"), Some(GameAction::Action4));
        assert_eq!(GameAction::parse_token(" action 7 "), Some(GameAction::Action7));
        assert_eq!(GameAction::parse_token("5"), Some(GameAction::Action5));
        assert_eq!(GameAction::parse_token("0"), Some(GameAction::Reset));
        assert_eq!(GameAction::parse_token("ACTION0"), None);
        assert_eq!(GameAction::parse_token("ACTION8"), None);
        assert_eq!(GameAction::parse_token("jump"), None);
        assert_eq!(GameAction::parse_token(""), None);
    }

    #[test]
    fn test_mixed_input_fails_open_on_unknown_token() {
        let input = vec![json!(1), json!("Action2"), json!("reset"), json!("action_3"), json!(99)];
        let restriction = classify_actions(&input);

        let expected: BTreeSet<GameAction> = [
            GameAction::Action1,
            GameAction::Action2,
            GameAction::Reset,
            GameAction::Action3,
        ]
        .into_iter()
        .collect();
        assert_eq!(restriction.recognized, expected);
        assert_eq!(restriction.unrecognized, vec![json!(99)]);
        assert_eq!(restriction.allowed(), None);
        assert_eq!(normalize_available_actions(Some(input.as_slice())), None);
    }

    #[test]
    fn test_fully_recognized_list_restricts() {
        let input = vec![json!(0), json!("ACTION6"), json!(6.0)];
        let allowed = normalize_available_actions(Some(input.as_slice())).unwrap();
        assert_eq!(allowed.len(), 2);
        assert!(is_action_allowed(Some(&allowed), GameAction::Action6));
        assert!(!is_action_allowed(Some(&allowed), GameAction::Action1));
    }

    #[test]
    fn test_absent_or_empty_allows_all() {
        assert_eq!(normalize_available_actions(None), None);
        assert_eq!(normalize_available_actions(Some(&[][..])), None);
        assert!(is_action_allowed(None, GameAction::Action7));
    }

    #[test]
    fn test_non_scalar_token_fails_open() {
        let input = vec![json!(2), json!({"id": 3})];
        assert_eq!(normalize_available_actions(Some(input.as_slice())), None);
    }

    #[test]
    fn test_from_str_and_code_roundtrip() {
        for action in GameAction::ALL {
            assert_eq!(GameAction::from_code(action.code() as i64), Some(action));
            assert_eq!(action.as_str().parse::<GameAction>(), Ok(action));
        }
        assert!(GameAction::from_code(-1).is_none());
    }
}
