use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The newsletter topics the backend aggregates feeds for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Topic {
    AI,
    Technology,
    Health,
    Finance,
    Science,
    Sports,
    Education,
    Environment,
    Politics,
    Entertainment,
}

impl Topic {
    pub const ALL: [Topic; 10] = [
        Topic::AI,
        Topic::Technology,
        Topic::Health,
        Topic::Finance,
        Topic::Science,
        Topic::Sports,
        Topic::Education,
        Topic::Environment,
        Topic::Politics,
        Topic::Entertainment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::AI => "AI",
            Topic::Technology => "Technology",
            Topic::Health => "Health",
            Topic::Finance => "Finance",
            Topic::Science => "Science",
            Topic::Sports => "Sports",
            Topic::Education => "Education",
            Topic::Environment => "Environment",
            Topic::Politics => "Politics",
            Topic::Entertainment => "Entertainment",
        }
    }

    /// Display position, for ordering topic keyed data.
    pub fn rank(name: &str) -> usize {
        Topic::ALL
            .iter()
            .position(|t| t.as_str() == name)
            .unwrap_or(Topic::ALL.len())
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Topic::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown topic '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("finance".parse::<Topic>().unwrap(), Topic::Finance);
        assert_eq!(" AI ".parse::<Topic>().unwrap(), Topic::AI);
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(
            "Gardening".parse::<Topic>().unwrap_err(),
            "Unknown topic 'Gardening'"
        );
    }

    #[test]
    fn test_display_matches_backend_keys() {
        let names: Vec<String> = Topic::ALL.iter().map(|t| t.to_string()).collect();
        assert_eq!(names[0], "AI");
        assert_eq!(names[9], "Entertainment");
    }

    #[test]
    fn test_rank() {
        assert_eq!(Topic::rank("AI"), 0);
        assert_eq!(Topic::rank("Entertainment"), 9);
        assert_eq!(Topic::rank("Unknown"), 10);
    }
}
