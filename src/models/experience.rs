use serde::{Deserialize, Serialize};

/// Declared seniority of a freelancer. Variant order is the seniority order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "experience_level", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExperienceLevel {
    Junior,
    Mid,
    Senior,
    Expert,
}

impl ExperienceLevel {
    pub const ALL: [ExperienceLevel; 4] = [
        ExperienceLevel::Junior,
        ExperienceLevel::Mid,
        ExperienceLevel::Senior,
        ExperienceLevel::Expert,
    ];

    pub fn from_input(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "junior" | "entry" => ExperienceLevel::Junior,
            "mid" | "intermediate" => ExperienceLevel::Mid,
            "senior" => ExperienceLevel::Senior,
            "expert" | "lead" => ExperienceLevel::Expert,
            other => {
                tracing::warn!(level = other, "unknown experience level, using mid");
                ExperienceLevel::Mid
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExperienceLevel::Junior => "junior",
            ExperienceLevel::Mid => "mid",
            ExperienceLevel::Senior => "senior",
            ExperienceLevel::Expert => "expert",
        }
    }

    pub fn ordinal(self) -> i32 {
        match self {
            ExperienceLevel::Junior => 0,
            ExperienceLevel::Mid => 1,
            ExperienceLevel::Senior => 2,
            ExperienceLevel::Expert => 3,
        }
    }
}
