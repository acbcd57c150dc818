use crate::emotion::{Emotion, EmotionSample, EmotionVector};
use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use std::fmt::Write;

pub(crate) const TIMESTAMP_COLUMN: &str = "timestamp";
pub(crate) const DOMINANT_COLUMN: &str = "dominant_emotion";

/// Header row of the log, newline terminated
pub fn header_line() -> String {
    let mut line = String::from(TIMESTAMP_COLUMN);
    for emotion in Emotion::ALL {
        line.push(',');
        line.push_str(emotion.as_str());
    }
    line.push(',');
    line.push_str(DOMINANT_COLUMN);
    line.push('\n');
    line
}

/// Append one newline-terminated row for `sample`
pub fn encode_row(sample: &EmotionSample, out: &mut String) {
    out.push_str(
        &sample
            .timestamp()
            .to_rfc3339_opts(SecondsFormat::AutoSi, true),
    );
    for (_, value) in sample.emotions().iter() {
        // Display for f64 is the shortest text that parses back exactly
        let _ = write!(out, ",{}", value);
    }
    out.push(',');
    out.push_str(sample.dominant_emotion().as_str());
    out.push('\n');
}

/// Positions of the required columns, resolved from a header row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    timestamp: usize,
    emotions: [usize; 7],
    dominant: usize,
    width: usize,
}

impl ColumnMap {
    pub fn from_header(line: &str) -> Result<Self, String> {
        let columns: Vec<String> = line
            .trim_start_matches('\u{feff}')
            .trim_end_matches(['\r', '\n'])
            .split(',')
            .map(|column| column.trim().to_ascii_lowercase())
            .collect();

        let find = |name: &str| {
            columns
                .iter()
                .position(|column| column == name)
                .ok_or_else(|| format!("missing column '{}'", name))
        };

        let mut emotions = [0usize; 7];
        for (slot, emotion) in emotions.iter_mut().zip(Emotion::ALL) {
            *slot = find(emotion.as_str())?;
        }

        Ok(Self {
            timestamp: find(TIMESTAMP_COLUMN)?,
            emotions,
            dominant: find(DOMINANT_COLUMN)?,
            width: columns.len(),
        })
    }

    /// Parse one data row
    pub fn decode_row(&self, line: &str) -> Result<EmotionSample, String> {
        let fields: Vec<&str> = line.trim_end_matches('\r').split(',').collect();
        if fields.len() != self.width {
            return Err(format!(
                "expected {} fields, found {}",
                self.width,
                fields.len()
            ));
        }

        let timestamp = parse_timestamp(fields[self.timestamp].trim())?;

        let mut values = [0.0f64; 7];
        for (value, (index, emotion)) in values
            .iter_mut()
            .zip(self.emotions.iter().zip(Emotion::ALL))
        {
            let field = fields[*index].trim();
            *value = field
                .parse::<f64>()
                .map_err(|e| format!("bad {} value '{}': {}", emotion, field, e))?;
        }

        let dominant = fields[self.dominant]
            .parse::<Emotion>()
            .map_err(|e| e.to_string())?;

        Ok(EmotionSample::from_parts(
            timestamp,
            EmotionVector::from_array(values),
            dominant,
        ))
    }
}

/// RFC 3339, or a naive `YYYY-MM-DD HH:MM:SS[.f]` taken as local time
pub fn parse_timestamp(field: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(field) {
        return Ok(timestamp.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(field, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(field, "%Y-%m-%dT%H:%M:%S%.f"))
        .map_err(|e| format!("bad timestamp '{}': {}", field, e))?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| format!("timestamp '{}' does not exist in local time", field))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lists_canonical_columns() {
        assert_eq!(
            header_line(),
            "timestamp,angry,disgust,fear,happy,sad,surprise,neutral,dominant_emotion\n"
        );
    }

    #[test]
    fn test_row_round_trip() {
        let sample = EmotionSample::new(
            Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap(),
            EmotionVector::from_array([0.01, 0.0, 0.1, 0.7000000000000001, 0.05, 0.0, 1.0 / 3.0]),
        );
        let mut row = String::new();
        encode_row(&sample, &mut row);

        let map = ColumnMap::from_header(&header_line()).unwrap();
        assert_eq!(map.decode_row(row.trim_end()).unwrap(), sample);
    }

    #[test]
    fn test_columns_resolved_by_name() {
        let map = ColumnMap::from_header(
            "dominant_emotion,timestamp,neutral,happy,sad,angry,fear,surprise,disgust,extra",
        )
        .unwrap();
        let sample = map
            .decode_row("sad,2024-03-01T10:00:00Z,0.1,0.2,0.6,0,0,0.1,0,ignored")
            .unwrap();

        assert_eq!(sample.dominant_emotion(), Emotion::Sad);
        assert_eq!(sample.emotions().get(Emotion::Sad), 0.6);
        assert_eq!(sample.emotions().get(Emotion::Neutral), 0.1);
    }

    #[test]
    fn test_header_missing_column_is_rejected() {
        let err = ColumnMap::from_header("timestamp,angry,happy,dominant_emotion").unwrap_err();
        assert!(err.contains("disgust"));
    }

    #[test]
    fn test_malformed_rows_are_rejected() {
        let map = ColumnMap::from_header(&header_line()).unwrap();
        assert!(map.decode_row("2024-03-01T10:00:00Z,0.1,0.2").is_err());
        assert!(map
            .decode_row("not-a-time,0,0,0,1,0,0,0,happy")
            .is_err());
        assert!(map
            .decode_row("2024-03-01T10:00:00Z,0,0,0,x,0,0,0,happy")
            .is_err());
        assert!(map
            .decode_row("2024-03-01T10:00:00Z,0,0,0,1,0,0,0,bored")
            .is_err());
    }

    #[test]
    fn test_naive_timestamps_are_accepted() {
        let parsed = parse_timestamp("2024-03-01 10:00:00.250000").unwrap();
        let expected = Local
            .with_ymd_and_hms(2024, 3, 1, 10, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
            + chrono::Duration::milliseconds(250);
        assert_eq!(parsed, expected);
    }
}
