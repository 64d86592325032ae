use super::*;

// Wire shape of an accessibility event. Descriptive fields (school/student
// names, student id) are not needed by the aggregation and are ignored along
// with any other unknown field.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncidentEvent {
    #[serde(default)]
    event_id: Option<String>,
    #[serde(default)]
    school_id: Option<Numeric>,
    #[serde(default)]
    event_type: Option<String>,
    #[serde(default)]
    disability_type: Option<String>,
    #[serde(default)]
    severity: Option<Numeric>,
    #[serde(default)]
    timestamp: Option<Numeric>,
}

// Producers are not consistent about quoting numbers, so both
// `"timestamp": 1700000000000` and `"timestamp": "1700000000000"` decode.
#[derive(Deserialize)]
#[serde(untagged)]
enum Numeric {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Numeric {
    fn to_i64(&self, field: &'static str, raw: &[u8]) -> Result<i64, DecodeError> {
        let invalid = |value: String| {
            DecodeError::new(
                DecodeErrorKind::InvalidField {
                    field,
                    expected: "integer",
                    value,
                },
                raw,
            )
        };
        match self {
            Numeric::Int(v) => Ok(*v),
            Numeric::Float(f) => {
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                    Ok(*f as i64)
                } else {
                    Err(invalid(f.to_string()))
                }
            }
            Numeric::Text(s) => s.trim().parse::<i64>().map_err(|_| invalid(s.clone())),
        }
    }

    fn to_f64(&self, field: &'static str, raw: &[u8]) -> Result<f64, DecodeError> {
        match self {
            Numeric::Int(v) => Ok(*v as f64),
            Numeric::Float(f) => Ok(*f),
            Numeric::Text(s) => match s.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(v),
                _ => Err(DecodeError::new(
                    DecodeErrorKind::InvalidField {
                        field,
                        expected: "number",
                        value: s.clone(),
                    },
                    raw,
                )),
            },
        }
    }
}

/// Decode one raw input unit (a JSON object) into an [`EventRecord`].
///
/// `schoolId`, `timestamp` and `disabilityType` are required. `severity` is
/// optional; what a missing severity means is decided later by
/// [`MissingValuePolicy`](crate::state::MissingValuePolicy).
pub fn decode_record(raw: &[u8]) -> Result<EventRecord<SchoolId>, DecodeError> {
    let event: IncidentEvent = serde_json::from_slice(raw)
        .map_err(|e| DecodeError::new(DecodeErrorKind::Malformed(e.to_string()), raw))?;

    let key = event
        .school_id
        .ok_or_else(|| DecodeError::new(DecodeErrorKind::MissingField("schoolId"), raw))?
        .to_i64("schoolId", raw)?;
    let timestamp = event
        .timestamp
        .ok_or_else(|| DecodeError::new(DecodeErrorKind::MissingField("timestamp"), raw))?
        .to_i64("timestamp", raw)?;
    let category = event
        .disability_type
        .ok_or_else(|| DecodeError::new(DecodeErrorKind::MissingField("disabilityType"), raw))?;
    let value = match event.severity {
        Some(severity) => Some(severity.to_f64("severity", raw)?),
        None => None,
    };

    Ok(EventRecord {
        key,
        timestamp,
        category,
        value,
        event_id: event.event_id,
        event_type: event.event_type,
    })
}

/// Convenience wrapper for line-oriented input.
pub fn decode_line(line: &str) -> Result<EventRecord<SchoolId>, DecodeError> {
    decode_record(line.as_bytes())
}
