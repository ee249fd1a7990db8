use chrono::{NaiveDateTime, NaiveTime};

use crate::models::Outcome;

/// Minimum Jaro-Winkler similarity for a name to be offered as a suggestion
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// Convert results to a form string, most recent first (e.g., "WLWDW")
pub fn results_to_form(results: &[(Outcome, NaiveDateTime)]) -> String {
    let mut sorted_results = results.to_vec();
    sorted_results.sort_by(|a, b| b.1.cmp(&a.1));

    sorted_results
        .iter()
        .take(5)
        .map(|(result, _)| result.as_char())
        .collect()
}

/// Win percentage rounded to two decimals
pub fn win_rate(wins: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let rate = wins as f64 / total as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}

/// Three-letter abbreviation used when a team is first seen
pub fn short_name(name: &str) -> String {
    name.trim().chars().take(3).collect::<String>().to_uppercase()
}

/// Parse a kickoff time such as "20:00" or "1930". Anything else is the
/// default 15:00 slot.
pub fn parse_kickoff_time(raw: &str) -> NaiveTime {
    let digits: String = raw.trim().chars().filter(|c| *c != ':').collect();
    if digits.len() == 4 {
        if let Ok(time) = NaiveTime::parse_from_str(&digits, "%H%M") {
            return time;
        }
    }
    NaiveTime::from_hms_opt(15, 0, 0).unwrap_or_default()
}

/// Closest candidate to `name` by Jaro-Winkler similarity, if any is close enough
pub fn closest_match<'a, I>(name: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let needle = name.trim().to_lowercase();
    candidates
        .into_iter()
        .map(|candidate| (strsim::jaro_winkler(&needle, &candidate.to_lowercase()), candidate))
        .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, candidate)| candidate.to_string())
}

/// Validate team name format
pub fn validate_team_name(name: &str) -> bool {
    !name.trim().is_empty() && name.len() <= 100
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 3, day)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_results_to_form_is_most_recent_first() {
        let results = vec![
            (Outcome::Win, at(1)),
            (Outcome::Loss, at(8)),
            (Outcome::Draw, at(15)),
            (Outcome::Win, at(22)),
            (Outcome::Win, at(29)),
            (Outcome::Loss, at(30)),
        ];
        assert_eq!(results_to_form(&results), "LWWDL");
        assert_eq!(results_to_form(&[]), "");
    }

    #[test]
    fn test_win_rate() {
        assert_eq!(win_rate(1, 3), 33.33);
        assert_eq!(win_rate(3, 4), 75.0);
        assert_eq!(win_rate(0, 0), 0.0);
    }

    #[test]
    fn test_parse_kickoff_time() {
        assert_eq!(parse_kickoff_time("20:00"), NaiveTime::from_hms_opt(20, 0, 0).unwrap());
        assert_eq!(parse_kickoff_time("1930"), NaiveTime::from_hms_opt(19, 30, 0).unwrap());
        assert_eq!(parse_kickoff_time(""), NaiveTime::from_hms_opt(15, 0, 0).unwrap());
        assert_eq!(parse_kickoff_time("nan"), NaiveTime::from_hms_opt(15, 0, 0).unwrap());
        assert_eq!(parse_kickoff_time("25:00"), NaiveTime::from_hms_opt(15, 0, 0).unwrap());
    }

    #[test]
    fn test_closest_match() {
        let teams = ["Arsenal", "Aston Villa", "Manchester City", "Manchester United"];
        assert_eq!(closest_match("Arsenl", teams), Some("Arsenal".to_string()));
        assert_eq!(closest_match("manchester utd", teams), Some("Manchester United".to_string()));
        assert_eq!(closest_match("Real Madrid", teams), None);
    }

    #[test]
    fn test_short_name_and_validation() {
        assert_eq!(short_name("Brentford"), "BRE");
        assert_eq!(short_name(" Leeds United"), "LEE");
        assert!(validate_team_name("Wolves"));
        assert!(!validate_team_name("   "));
    }
}
