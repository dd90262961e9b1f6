//! Presentation mapping for the mascot.
//!
//! Pure lookups from pet state to a sprite URL and caption; no state, no
//! side effects. Image bytes live on the external placeholder host, the bot
//! only hands Discord a URL.

use chrono::{DateTime, Timelike, Utc};

use crate::pet::{CarePath, Stage};

// ---------------------------------------------------------------------------
// Time of day
// ---------------------------------------------------------------------------

/// Sprites get a night variant during the mascot's sleep window
/// (22:00 to 08:00 UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOfDay {
    Day,
    Night,
}

impl TimeOfDay {
    pub fn at(now: DateTime<Utc>) -> Self {
        let hour = now.hour();
        if hour >= 22 || hour < 8 {
            TimeOfDay::Night
        } else {
            TimeOfDay::Day
        }
    }
}

// ---------------------------------------------------------------------------
// Sprite lookup
// ---------------------------------------------------------------------------

/// A renderable sprite reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sprite {
    pub url: String,
    pub caption: &'static str,
}

/// Sprite for an awake pet.
pub fn sprite(stage: Stage, path: Option<CarePath>, time: TimeOfDay) -> Sprite {
    let key = sprite_key(stage, path, time);
    Sprite {
        url: placeholder_url(&key),
        caption: stage_caption(stage),
    }
}

/// Sprite for a resting pet (same art regardless of stage or hour).
pub fn resting_sprite() -> Sprite {
    Sprite {
        url: placeholder_url("gravestone"),
        caption: "Fast asleep under a tiny gravestone.",
    }
}

fn sprite_key(stage: Stage, path: Option<CarePath>, time: TimeOfDay) -> String {
    let mut key = match (stage, path) {
        (Stage::Egg, _) | (_, None) => "egg".to_string(),
        (stage, Some(path)) => {
            format!("day{}_{}", stage.index(), path.label().to_lowercase())
        }
    };
    if time == TimeOfDay::Night {
        key.push_str("_night");
    }
    key
}

fn placeholder_url(key: &str) -> String {
    let text: String = key
        .split('_')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("+");
    format!("https://placehold.co/256x256/gif?text={}", text)
}

fn stage_caption(stage: Stage) -> &'static str {
    match stage {
        Stage::Egg => "A speckled egg, warm to the touch.",
        Stage::Day1 => "Freshly hatched and wobbly.",
        Stage::Day2 => "Finding its feet.",
        Stage::Day3 => "Full of opinions about snacks.",
        Stage::Day4 => "Practicing its best tricks.",
        Stage::Day5 => "Nearly grown, twice as loud.",
        Stage::Day6 => "Fully evolved and very proud.",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn night_window_spans_late_and_early_hours() {
        let at = |h| Utc.with_ymd_and_hms(2024, 5, 10, h, 30, 0).unwrap();
        assert_eq!(TimeOfDay::at(at(23)), TimeOfDay::Night);
        assert_eq!(TimeOfDay::at(at(3)), TimeOfDay::Night);
        assert_eq!(TimeOfDay::at(at(7)), TimeOfDay::Night);
        assert_eq!(TimeOfDay::at(at(8)), TimeOfDay::Day);
        assert_eq!(TimeOfDay::at(at(12)), TimeOfDay::Day);
        assert_eq!(TimeOfDay::at(at(21)), TimeOfDay::Day);
        assert_eq!(TimeOfDay::at(at(22)), TimeOfDay::Night);
    }

    #[test]
    fn sprite_keys_cover_stage_path_and_hour() {
        let s = sprite(Stage::Day3, Some(CarePath::Good), TimeOfDay::Day);
        assert!(s.url.ends_with("text=Day3+Good"));

        let s = sprite(Stage::Day3, Some(CarePath::Bad), TimeOfDay::Night);
        assert!(s.url.ends_with("text=Day3+Bad+Night"));

        let s = sprite(Stage::Egg, None, TimeOfDay::Day);
        assert!(s.url.ends_with("text=Egg"));
    }

    #[test]
    fn lookup_is_deterministic() {
        let a = sprite(Stage::Day5, Some(CarePath::Good), TimeOfDay::Night);
        let b = sprite(Stage::Day5, Some(CarePath::Good), TimeOfDay::Night);
        assert_eq!(a, b);
    }

    #[test]
    fn resting_sprite_is_the_gravestone() {
        assert!(resting_sprite().url.contains("Gravestone"));
    }

    #[test]
    fn every_stage_has_a_caption() {
        for stage in [
            Stage::Egg,
            Stage::Day1,
            Stage::Day2,
            Stage::Day3,
            Stage::Day4,
            Stage::Day5,
            Stage::Day6,
        ] {
            assert!(!stage_caption(stage).is_empty());
        }
    }
}
