use std::time::Duration;

use serde::{Deserialize, Deserializer, de::Error as _};

/// Human-friendly duration parser.
///
/// Some examples are "5s", "1m 30s", "1m_30s" and "250ms".
pub fn parse_humantime_str(s: &str) -> Result<Duration, humantime::DurationError> {
    let s = s.trim();
    if s.contains('_') {
        humantime::parse_duration(&s.replace('_', " "))
    } else {
        humantime::parse_duration(s)
    }
}

/// Deserialize a [`Duration`] from a human-friendly string
/// or from a number of (fractional) seconds.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => Duration::try_from_secs_f64(secs).map_err(D::Error::custom),
        Raw::Text(s) => parse_humantime_str(&s).map_err(D::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_humantime_str() {
        for (input, expected) in [
            ("5s", Some(Duration::from_secs(5))),
            (" 250ms ", Some(Duration::from_millis(250))),
            ("1m_30s", Some(Duration::from_secs(90))),
            ("1m 30s", Some(Duration::from_secs(90))),
            ("soon", None),
            ("", None),
        ] {
            let result = parse_humantime_str(input).ok();
            assert_eq!(result, expected, "input: '{input}'");
        }
    }

    #[test]
    fn test_deserialize_duration() {
        #[derive(Deserialize)]
        struct T {
            #[serde(deserialize_with = "deserialize_duration")]
            d: Duration,
        }

        let t: T = serde_json::from_str(r#"{"d": "2s"}"#).unwrap();
        assert_eq!(t.d, Duration::from_secs(2));

        let t: T = serde_json::from_str(r#"{"d": 0.5}"#).unwrap();
        assert_eq!(t.d, Duration::from_millis(500));

        assert!(serde_json::from_str::<T>(r#"{"d": -1}"#).is_err());
        assert!(serde_json::from_str::<T>(r#"{"d": "later"}"#).is_err());
    }
}
