use std::fmt;

use serde::{Deserialize, Serialize};

/// Processing status of a vacancy as it moves through the apply queue.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum VacancyStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    RequiresQuiz,
    RequiresCoverLetter,
    #[serde(rename = "blocked_403")]
    #[sqlx(rename = "blocked_403")]
    Blocked403,
    Unavailable,
}

impl VacancyStatus {
    pub const ALL: [VacancyStatus; 8] = [
        Self::Pending,
        Self::Processing,
        Self::Completed,
        Self::Failed,
        Self::RequiresQuiz,
        Self::RequiresCoverLetter,
        Self::Blocked403,
        Self::Unavailable,
    ];

    /// The string stored in the `status` column.
    pub fn as_str(&self) -> &'static str {
        use VacancyStatus::*;

        match self {
            Pending => "pending",
            Processing => "processing",
            Completed => "completed",
            Failed => "failed",
            RequiresQuiz => "requires_quiz",
            RequiresCoverLetter => "requires_cover_letter",
            Blocked403 => "blocked_403",
            Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for VacancyStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marks a vacancy the retry prober has picked, independently of its status.
///
/// A `Candidate` has been selected but is not yet visible to the opener; the
/// test monitor promotes it to `processing` and retags it `Dispatched`, which
/// lets a later `blocked` outcome be recognised as a failed probe.
#[derive(Clone, Copy, Debug, Eq, PartialEq, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
pub enum ProbeTag {
    Candidate,
    Dispatched,
}

impl ProbeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Candidate => "candidate",
            Self::Dispatched => "dispatched",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings_match_serde() {
        for status in VacancyStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }
}
