//! Forecast response parsing.
//!
//! The envelope must parse; individual days that are missing a field are
//! dropped without affecting their siblings.

use serde::Deserialize;
use serde_json::Value;
use skycast_core::ParseError;

use crate::date::DayNormalizer;
use crate::types::ForecastDay;

#[derive(Debug, Deserialize)]
struct RawDay {
    dt: i64,
    temp: RawTemp,
    humidity: f64,
    pressure: f64,
    speed: f64,
    deg: f64,
    weather: Vec<RawCondition>,
}

#[derive(Debug, Deserialize)]
struct RawTemp {
    min: f64,
    max: f64,
}

#[derive(Debug, Deserialize)]
struct RawCondition {
    id: i32,
}

impl RawDay {
    fn into_forecast_day(self, normalizer: &DayNormalizer) -> Result<ForecastDay, String> {
        let condition = self
            .weather
            .first()
            .ok_or_else(|| "empty weather array".to_string())?;
        let date = normalizer
            .normalize(self.dt)
            .ok_or_else(|| format!("timestamp {} out of range", self.dt))?;
        Ok(ForecastDay {
            date,
            condition_id: condition.id,
            min_temp: self.temp.min,
            max_temp: self.temp.max,
            humidity: self.humidity,
            pressure: self.pressure,
            wind_speed: self.speed,
            wind_degrees: self.deg,
        })
    }
}

/// Read the envelope status code, which the API sends as a string or number.
fn envelope_status(envelope: &Value) -> Option<u16> {
    match envelope.get("cod")? {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        _ => None,
    }
}

/// Parse a raw forecast body into days ordered by ascending date.
///
/// One record per day: when two entries normalize to the same day, the
/// first one in the response wins.
pub fn parse_forecast(
    bytes: &[u8],
    normalizer: &DayNormalizer,
) -> Result<Vec<ForecastDay>, ParseError> {
    let envelope: Value =
        serde_json::from_slice(bytes).map_err(|e| ParseError::InvalidJson(e.to_string()))?;

    if !envelope.is_object() {
        return Err(ParseError::MissingList);
    }

    if let Some(code) = envelope_status(&envelope) {
        if code != 200 {
            let message = envelope
                .get("message")
                .map(|m| match m {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_default();
            return Err(ParseError::ApiStatus { code, message });
        }
    }

    let entries = envelope
        .get("list")
        .and_then(Value::as_array)
        .ok_or(ParseError::MissingList)?;

    let mut days = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let parsed = RawDay::deserialize(entry)
            .map_err(|e| e.to_string())
            .and_then(|raw| raw.into_forecast_day(normalizer));
        match parsed {
            Ok(day) => days.push(day),
            Err(reason) => tracing::warn!("Dropping forecast entry {}: {}", index, reason),
        }
    }

    // Stable sort keeps source order among same-day entries for the dedup below
    days.sort_by_key(|d| d.date);
    let before = days.len();
    days.dedup_by_key(|d| d.date);
    if days.len() < before {
        tracing::warn!("Dropped {} duplicate forecast day(s)", before - days.len());
    }

    if days.is_empty() {
        return Err(ParseError::Empty);
    }

    tracing::debug!("Parsed {} forecast day(s)", days.len());
    Ok(days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(dt: i64, min: f64, max: f64, id: i32) -> Value {
        json!({
            "dt": dt,
            "temp": { "day": 1.0, "min": min, "max": max, "night": 0.0 },
            "pressure": 1012.0,
            "humidity": 80,
            "weather": [{
                "id": id,
                "main": "Clear",
                "description": "sky is clear",
                "icon": "01d"
            }],
            "speed": 4.0,
            "deg": 270,
            "clouds": 0
        })
    }

    fn body(list: Vec<Value>) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "city": { "name": "Mountain View" },
            "cod": "200",
            "message": 0.0,
            "cnt": list.len(),
            "list": list
        }))
        .unwrap()
    }

    #[test]
    fn test_parses_single_day() {
        let n = DayNormalizer::utc();
        let days = parse_forecast(&body(vec![entry(1_700_000_000, -5.0, 2.0, 800)]), &n).unwrap();

        assert_eq!(days.len(), 1);
        assert_eq!(days[0].date, 1_699_920_000);
        assert_eq!(days[0].min_temp, -5.0);
        assert_eq!(days[0].max_temp, 2.0);
        assert_eq!(days[0].humidity, 80.0);
        assert_eq!(days[0].wind_degrees, 270.0);
        assert_eq!(days[0].condition_id, 800);
    }

    #[test]
    fn test_malformed_json_is_error() {
        let err = parse_forecast(b"{not json", &DayNormalizer::utc()).unwrap_err();
        assert!(matches!(err, ParseError::InvalidJson(_)));
    }

    #[test]
    fn test_missing_list_is_error() {
        let bytes = serde_json::to_vec(&json!({ "cod": "200", "city": {} })).unwrap();
        let err = parse_forecast(&bytes, &DayNormalizer::utc()).unwrap_err();
        assert!(matches!(err, ParseError::MissingList));

        let bytes = serde_json::to_vec(&json!({ "list": { "dt": 1 } })).unwrap();
        let err = parse_forecast(&bytes, &DayNormalizer::utc()).unwrap_err();
        assert!(matches!(err, ParseError::MissingList));
    }

    #[test]
    fn test_top_level_array_is_error() {
        let bytes = serde_json::to_vec(&json!([entry(1_700_000_000, 1.0, 2.0, 800)])).unwrap();
        let err = parse_forecast(&bytes, &DayNormalizer::utc()).unwrap_err();
        assert!(matches!(err, ParseError::MissingList));
    }

    #[test]
    fn test_error_status_in_envelope() {
        let bytes =
            serde_json::to_vec(&json!({ "cod": "404", "message": "city not found" })).unwrap();
        let err = parse_forecast(&bytes, &DayNormalizer::utc()).unwrap_err();
        match err {
            ParseError::ApiStatus { code, message } => {
                assert_eq!(code, 404);
                assert_eq!(message, "city not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let bytes = serde_json::to_vec(&json!({ "cod": 301, "list": [] })).unwrap();
        assert!(matches!(
            parse_forecast(&bytes, &DayNormalizer::utc()),
            Err(ParseError::ApiStatus { code: 301, .. })
        ));
    }

    #[test]
    fn test_bad_entry_does_not_poison_siblings() {
        let mut missing_humidity = entry(1_700_086_400, 0.0, 1.0, 500);
        missing_humidity.as_object_mut().unwrap().remove("humidity");
        let mut empty_weather = entry(1_700_172_800, 0.0, 1.0, 500);
        empty_weather["weather"] = json!([]);
        let mut string_temp = entry(1_700_259_200, 0.0, 1.0, 500);
        string_temp["temp"]["min"] = json!("cold");

        let bytes = body(vec![
            entry(1_700_000_000, -5.0, 2.0, 800),
            missing_humidity,
            empty_weather,
            string_temp,
            entry(1_700_345_600, 3.0, 9.0, 801),
        ]);
        let days = parse_forecast(&bytes, &DayNormalizer::utc()).unwrap();

        assert_eq!(days.len(), 2);
        assert_eq!(days[0].condition_id, 800);
        assert_eq!(days[1].condition_id, 801);
    }

    #[test]
    fn test_all_entries_invalid_is_empty_error() {
        let bytes = body(vec![json!({ "dt": 1 }), json!("garbage")]);
        let err = parse_forecast(&bytes, &DayNormalizer::utc()).unwrap_err();
        assert!(matches!(err, ParseError::Empty));

        let err = parse_forecast(&body(vec![]), &DayNormalizer::utc()).unwrap_err();
        assert!(matches!(err, ParseError::Empty));
    }

    #[test]
    fn test_output_is_ascending_and_unique_per_day() {
        let n = DayNormalizer::utc();
        let day0 = 1_699_920_000;
        let bytes = body(vec![
            entry(day0 + 86_400 + 3600, 1.0, 2.0, 801),
            entry(day0 + 100, -5.0, 2.0, 800),
            entry(day0 + 7200, 9.0, 9.0, 500),
        ]);
        let days = parse_forecast(&bytes, &n).unwrap();

        assert_eq!(days.len(), 2);
        assert_eq!(days[0].date, day0);
        assert_eq!(days[0].condition_id, 800);
        assert_eq!(days[1].date, day0 + 86_400);
    }

    #[test]
    fn test_parser_uses_configured_offset() {
        let n = DayNormalizer::with_offset_minutes(180);
        let days = parse_forecast(&body(vec![entry(1_700_000_000, 0.0, 1.0, 800)]), &n).unwrap();
        assert_eq!(n.normalize(1_700_000_000), Some(days[0].date));
        assert_ne!(DayNormalizer::utc().normalize(1_700_000_000), Some(days[0].date));
    }

    #[test]
    fn test_out_of_range_timestamp_is_dropped() {
        let bytes = body(vec![
            entry(i64::MIN, -40.0, -30.0, 600),
            entry(1_700_000_000, -5.0, 2.0, 800),
            entry(i64::MIN + 1, -40.0, -30.0, 600),
        ]);
        let days = parse_forecast(&bytes, &DayNormalizer::utc()).unwrap();

        assert_eq!(days.len(), 1);
        assert_eq!(days[0].date, 1_699_920_000);
        assert_eq!(days[0].condition_id, 800);

        let only_bad = body(vec![entry(i64::MIN, 0.0, 1.0, 800)]);
        let err = parse_forecast(&only_bad, &DayNormalizer::with_offset_minutes(-60)).unwrap_err();
        assert!(matches!(err, ParseError::Empty));
    }
}
