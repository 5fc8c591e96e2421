//! Scope gate for data operations.

use std::collections::BTreeSet;
use std::fmt;

use douyin_openapi::{Operation, ScopeSet};
use serde::Serialize;

/// Scopes that each allow an operation (any one suffices).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeRequirement {
    pub operation: Operation,
    pub any_of: BTreeSet<String>,
}

impl ScopeRequirement {
    pub fn new<I, S>(operation: Operation, any_of: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            operation,
            any_of: any_of.into_iter().map(Into::into).collect(),
        }
    }

    pub fn video_list() -> Self {
        Self::new(
            Operation::ListUserVideos,
            [
                "ma.item.data",
                "ma.user.data",
                "video.list.bind",
                "data.external.item",
            ],
        )
    }

    pub fn video_stats() -> Self {
        Self::new(Operation::GetVideoStats, ["ma.item.data", "ma.user.data"])
    }

    pub fn user_info() -> Self {
        Self::new(Operation::GetUserInfo, ["user_info"])
    }

    pub fn comment_list() -> Self {
        Self::new(Operation::ListUserComments, ["comment.list"])
    }

    pub fn message_list() -> Self {
        Self::new(Operation::ListUserMessages, ["message.list"])
    }

    /// Every requirement checked by the broker.
    pub fn all() -> [Self; 5] {
        [
            Self::video_list(),
            Self::video_stats(),
            Self::user_info(),
            Self::comment_list(),
            Self::message_list(),
        ]
    }

    fn help(&self) -> String {
        let options: Vec<&str> = self.any_of.iter().map(String::as_str).collect();
        match options.as_slice() {
            [single] => format!("Authorize the `{single}` scope to use {}.", self.operation),
            _ => format!(
                "Authorize one of [{}] to use {}.",
                options.join(", "),
                self.operation
            ),
        }
    }
}

/// Structured denial returned when the granted scopes do not cover an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeDenial {
    pub operation: Operation,
    pub required: Vec<String>,
    pub granted: Vec<String>,
    pub help: String,
}

impl fmt::Display for ScopeDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "insufficient scope for {}: requires one of [{}], granted [{}]",
            self.operation,
            self.required.join(", "),
            self.granted.join(", ")
        )
    }
}

pub fn is_satisfied(granted: &ScopeSet, requirement: &ScopeRequirement) -> bool {
    requirement.any_of.iter().any(|scope| granted.contains(scope))
}

pub fn check(granted: &ScopeSet, requirement: &ScopeRequirement) -> Result<(), ScopeDenial> {
    if is_satisfied(granted, requirement) {
        return Ok(());
    }
    Err(ScopeDenial {
        operation: requirement.operation,
        required: requirement.any_of.iter().cloned().collect(),
        granted: granted.to_vec(),
        help: requirement.help(),
    })
}

/// Union of every scope the broker checks for.
pub fn fallback_scopes() -> ScopeSet {
    ScopeRequirement::all()
        .iter()
        .flat_map(|requirement| requirement.any_of.iter())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_representation_independent() {
        let requirement = ScopeRequirement::new(Operation::GetVideoStats, ["b"]);
        let from_string = ScopeSet::parse("a,b,c");
        let from_list = ScopeSet::from_value(&json!(["a", "b", "c"])).unwrap();
        assert!(is_satisfied(&from_string, &requirement));
        assert!(is_satisfied(&from_list, &requirement));
    }

    #[test]
    fn test_or_semantics() {
        let granted = ScopeSet::parse("video.list.bind");
        assert!(is_satisfied(&granted, &ScopeRequirement::video_list()));
        assert!(!is_satisfied(&granted, &ScopeRequirement::video_stats()));
    }

    #[test]
    fn test_denial_carries_required_and_granted() {
        let granted = ScopeSet::parse("user_info");
        let denial = check(&granted, &ScopeRequirement::video_stats()).unwrap_err();
        assert_eq!(denial.required, vec!["ma.item.data", "ma.user.data"]);
        assert_eq!(denial.granted, vec!["user_info"]);
        assert!(denial.help.contains("ma.item.data"));
        assert!(denial.to_string().contains("get_video_stats"));
    }

    #[test]
    fn test_empty_scope_is_denied() {
        assert!(check(&ScopeSet::new(), &ScopeRequirement::user_info()).is_err());
    }

    #[test]
    fn test_fallback_scopes_satisfy_every_requirement() {
        let scopes = fallback_scopes();
        for requirement in ScopeRequirement::all() {
            assert!(is_satisfied(&scopes, &requirement));
        }
        assert_eq!(scopes.len(), 7);
        assert!(scopes.contains("comment.list"));
        assert!(scopes.contains("message.list"));
    }
}
