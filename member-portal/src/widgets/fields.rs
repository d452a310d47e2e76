// Form field primitives (checkbox, radio, yes/no)

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Answer of a Yes/No radio pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum YesNo {
    Yes,
    No,
}

impl YesNo {
    pub fn as_str(&self) -> &'static str {
        match self {
            YesNo::Yes => "yes",
            YesNo::No => "no",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" | "true" | "1" => Some(YesNo::Yes),
            "no" | "n" | "false" | "0" => Some(YesNo::No),
            _ => None,
        }
    }
}

// The backend has been seen sending both `"yes"` and `true` for the same question.
impl<'de> Deserialize<'de> for YesNo {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Flag(true) => Ok(YesNo::Yes),
            Raw::Flag(false) => Ok(YesNo::No),
            Raw::Text(s) => YesNo::parse(&s)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid yes/no value '{}'", s))),
        }
    }
}

/// Checkbox state sent as a bool, a 0/1 number or a yes/no string.
pub fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Flag(bool),
        Number(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Flag(b) => Ok(b),
        Raw::Number(n) => Ok(n != 0),
        Raw::Text(s) => YesNo::parse(&s)
            .map(|v| v == YesNo::Yes)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid checkbox value '{}'", s))),
    }
}

/// Cycle an optional answer: unanswered -> Yes -> No -> Yes ...
pub fn toggle_yes_no(current: Option<YesNo>) -> Option<YesNo> {
    match current {
        None | Some(YesNo::No) => Some(YesNo::Yes),
        Some(YesNo::Yes) => Some(YesNo::No),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    YesNo,
    Checkbox,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldKind::Text => "text",
            FieldKind::YesNo => "yes/no",
            FieldKind::Checkbox => "checkbox",
        };
        write!(f, "{}", s)
    }
}

/// Scalar value carried by a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    YesNo(Option<YesNo>),
    Checked(bool),
}

impl FieldValue {
    pub fn text(s: impl Into<String>) -> Self {
        FieldValue::Text(s.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::YesNo(_) => FieldKind::YesNo,
            FieldValue::Checked(_) => FieldKind::Checkbox,
        }
    }

    /// Short rendering for list views.
    pub fn display(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::YesNo(Some(v)) => match v {
                YesNo::Yes => "(•) Yes  ( ) No".to_string(),
                YesNo::No => "( ) Yes  (•) No".to_string(),
            },
            FieldValue::YesNo(None) => "( ) Yes  ( ) No".to_string(),
            FieldValue::Checked(true) => "[x]".to_string(),
            FieldValue::Checked(false) => "[ ]".to_string(),
        }
    }
}

/// Static description of a scalar field in a section or repeating record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    /// Yes/No field that must be answered `Yes` for this field to be enabled.
    pub gated_by: Option<&'static str>,
}

impl FieldSpec {
    pub const fn text(name: &'static str, label: &'static str) -> Self {
        Self {
            name,
            label,
            kind: FieldKind::Text,
            gated_by: None,
        }
    }

    pub const fn yes_no(name: &'static str, label: &'static str) -> Self {
        Self {
            name,
            label,
            kind: FieldKind::YesNo,
            gated_by: None,
        }
    }

    pub const fn checkbox(name: &'static str, label: &'static str) -> Self {
        Self {
            name,
            label,
            kind: FieldKind::Checkbox,
            gated_by: None,
        }
    }

    pub const fn gated(self, gate: &'static str) -> Self {
        Self {
            gated_by: Some(gate),
            ..self
        }
    }
}
