use crate::error::AnalyticsError;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coarse range a user can pick for the visible window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RangeToken {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "24h")]
    OneDay,
    #[serde(rename = "7d")]
    SevenDays,
    #[serde(rename = "30d")]
    ThirtyDays,
}

impl RangeToken {
    pub const ALL: [RangeToken; 5] = [
        RangeToken::OneHour,
        RangeToken::SixHours,
        RangeToken::OneDay,
        RangeToken::SevenDays,
        RangeToken::ThirtyDays,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RangeToken::OneHour => "1h",
            RangeToken::SixHours => "6h",
            RangeToken::OneDay => "24h",
            RangeToken::SevenDays => "7d",
            RangeToken::ThirtyDays => "30d",
        }
    }

    pub fn duration(self) -> ChronoDuration {
        match self {
            RangeToken::OneHour => ChronoDuration::hours(1),
            RangeToken::SixHours => ChronoDuration::hours(6),
            RangeToken::OneDay => ChronoDuration::hours(24),
            RangeToken::SevenDays => ChronoDuration::days(7),
            RangeToken::ThirtyDays => ChronoDuration::days(30),
        }
    }
}

impl fmt::Display for RangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RangeToken {
    type Err = AnalyticsError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        RangeToken::ALL
            .into_iter()
            .find(|token| token.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| AnalyticsError::InvalidRangeToken(raw.to_string()))
    }
}

/// Concrete `[from, to]` interval a token resolved to. `to` is the selection time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub token: RangeToken,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

pub fn resolve(token: RangeToken, now: DateTime<Utc>) -> WindowSpec {
    WindowSpec {
        token,
        from: now - token.duration(),
        to: now,
    }
}

pub fn resolve_token(raw: &str, now: DateTime<Utc>) -> Result<WindowSpec, AnalyticsError> {
    Ok(resolve(raw.parse()?, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 15, 8, 30, 0).unwrap()
    }

    #[test]
    fn resolves_every_token_to_now_minus_duration() {
        let expected = [
            ("1h", ChronoDuration::hours(1)),
            ("6h", ChronoDuration::hours(6)),
            ("24h", ChronoDuration::hours(24)),
            ("7d", ChronoDuration::days(7)),
            ("30d", ChronoDuration::days(30)),
        ];
        for (raw, duration) in expected {
            let window = resolve_token(raw, now()).expect("valid token");
            assert_eq!(window.to, now());
            assert_eq!(window.to - window.from, duration, "token {raw}");
            assert_eq!(window.token.as_str(), raw);
        }
    }

    #[test]
    fn unknown_token_is_rejected() {
        let err = resolve_token("2w", now()).unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidRangeToken(ref raw) if raw == "2w"));
        assert!("".parse::<RangeToken>().is_err());
    }

    #[test]
    fn parse_tolerates_whitespace_and_case() {
        assert_eq!(" 7D ".parse::<RangeToken>().unwrap(), RangeToken::SevenDays);
    }

    #[test]
    fn resolve_ends_at_selection_time() {
        let window = resolve(RangeToken::OneHour, now());
        assert_eq!(window.token, RangeToken::OneHour);
        assert_eq!(window.to, now());
        assert_eq!(window.from, now() - ChronoDuration::hours(1));
    }

    #[test]
    fn token_serializes_as_short_form() {
        let json = serde_json::to_string(&RangeToken::OneDay).unwrap();
        assert_eq!(json, "\"24h\"");
        let parsed: RangeToken = serde_json::from_str("\"30d\"").unwrap();
        assert_eq!(parsed, RangeToken::ThirtyDays);
    }
}
