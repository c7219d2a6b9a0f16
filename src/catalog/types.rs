//! Function Record Types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Description of one API function
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FunctionRecord {
    pub name: String,
    pub topic: String,
    pub info: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultSpec>,
    #[serde(default)]
    pub args: Vec<ArgSpec>,
    #[serde(default)]
    pub has_deadline: bool,
    #[serde(default)]
    pub prologue: String,
    #[serde(default)]
    pub has_handle_argument: bool,
    #[serde(default)]
    pub custom_errors: BTreeMap<String, String>,
}

/// Return value description
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ResultSpec {
    #[serde(rename = "type")]
    pub ty: String,
    pub success: String,
    pub error: String,
}

/// Argument description
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ArgSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub info: String,
}

impl FunctionRecord {
    /// All errors the function can report: the ones implied by taking a
    /// handle or a deadline, plus its own.
    pub fn errors(&self) -> BTreeMap<String, String> {
        let mut errors = BTreeMap::new();
        if self.has_handle_argument {
            errors.insert("EBADF".to_string(), "Invalid handle.".to_string());
            errors.insert(
                "ENOTSUP".to_string(),
                "The handle does not support this operation.".to_string(),
            );
        }
        if self.has_deadline {
            errors.insert("ETIMEDOUT".to_string(), "Deadline was reached.".to_string());
            errors.insert("ECANCELED".to_string(), "The operation was cancelled.".to_string());
        }
        errors.extend(
            self.custom_errors
                .iter()
                .map(|(code, info)| (code.clone(), info.clone())),
        );
        errors
    }

    /// Prologue with the source indentation stripped
    pub fn prologue_text(&self) -> String {
        self.prologue
            .lines()
            .map(str::trim)
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }
}
