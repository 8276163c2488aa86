use serde::{Deserialize, Serialize};

use crate::models::experience::ExperienceLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyTier {
    Easy,
    Medium,
    Hard,
    Expert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodingTier {
    Basic,
    Intermediate,
    Advanced,
    Expert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestComplexity {
    pub question_count: usize,
    pub time_limit_seconds: u32,
    pub difficulty_tier: DifficultyTier,
    pub passing_score: i32,
    pub coding_tier: CodingTier,
}

pub fn resolve_complexity(level: ExperienceLevel) -> TestComplexity {
    match level {
        ExperienceLevel::Junior => TestComplexity {
            question_count: 10,
            time_limit_seconds: 900,
            difficulty_tier: DifficultyTier::Easy,
            passing_score: 60,
            coding_tier: CodingTier::Basic,
        },
        ExperienceLevel::Mid => TestComplexity {
            question_count: 15,
            time_limit_seconds: 1200,
            difficulty_tier: DifficultyTier::Medium,
            passing_score: 65,
            coding_tier: CodingTier::Intermediate,
        },
        ExperienceLevel::Senior => TestComplexity {
            question_count: 20,
            time_limit_seconds: 1500,
            difficulty_tier: DifficultyTier::Hard,
            passing_score: 70,
            coding_tier: CodingTier::Advanced,
        },
        ExperienceLevel::Expert => TestComplexity {
            question_count: 25,
            time_limit_seconds: 1800,
            difficulty_tier: DifficultyTier::Expert,
            passing_score: 75,
            coding_tier: CodingTier::Expert,
        },
    }
}

pub fn resolve_complexity_str(level: &str) -> TestComplexity {
    resolve_complexity(ExperienceLevel::from_input(level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_levels_never_get_easier() {
        for pair in ExperienceLevel::ALL.windows(2) {
            let lower = resolve_complexity(pair[0]);
            let higher = resolve_complexity(pair[1]);
            assert!(higher.question_count >= lower.question_count);
            assert!(higher.time_limit_seconds >= lower.time_limit_seconds);
            assert!(higher.difficulty_tier >= lower.difficulty_tier);
            assert!(higher.passing_score >= lower.passing_score);
            assert!(higher.coding_tier >= lower.coding_tier);
        }
    }

    #[test]
    fn unknown_level_fails_closed_to_mid() {
        assert_eq!(
            resolve_complexity_str("principal-architect"),
            resolve_complexity(ExperienceLevel::Mid)
        );
    }

    #[test]
    fn time_limits_fit_inside_session_window() {
        let window = crate::models::skill_test_session::SESSION_DURATION_MINUTES as u32 * 60;
        for level in ExperienceLevel::ALL {
            assert!(resolve_complexity(level).time_limit_seconds <= window);
        }
    }
}
