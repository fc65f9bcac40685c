//! CSV export format for the event log.
//!
//! `Group,Name,Message,Type,Timestamp`, one row per event, oldest first.
//! Rows are joined with `\n`; there is no trailing newline after the last
//! row, but an empty log still ends its header line with one.

use std::mem::take;

use rollcall_types::AttendanceEvent;

pub const CSV_HEADER: &str = "Group,Name,Message,Type,Timestamp";

const COLUMNS: usize = 5;

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// Quote a field when it contains a comma, quote or line break.
pub fn escape_field(field: &str) -> String {
    if needs_quotes(field) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Render the whole event log.
pub fn generate_csv(events: &[AttendanceEvent]) -> String {
    let rows: Vec<String> = events
        .iter()
        .map(|event| {
            [
                event.group.as_str(),
                event.name.as_str(),
                event.message.as_str(),
                event.event_type.as_str(),
                &event.iso_string(),
            ]
            .iter()
            .map(|field| escape_field(field))
            .collect::<Vec<_>>()
            .join(",")
        })
        .collect();

    format!("{}\n{}", CSV_HEADER, rows.join("\n"))
}

/// Split CSV text into rows of fields. Quoted fields may contain separators,
/// doubled quotes and line breaks; CRLF is accepted; blank lines are skipped.
pub fn parse_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => row.push(take(&mut field)),
            '\n' | '\r' if !in_quotes => {
                if ch == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(take(&mut field));
                if row.len() == 1 && row[0].is_empty() {
                    row.clear();
                } else {
                    rows.push(take(&mut row));
                }
            }
            _ => field.push(ch),
        }
    }

    // Trailing row without a final newline (unterminated quotes included).
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }

    rows
}

/// One exported row, as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRecord {
    pub group: String,
    pub name: String,
    pub message: String,
    pub event_type: String,
    pub timestamp: String,
}

impl From<&AttendanceEvent> for CsvRecord {
    fn from(event: &AttendanceEvent) -> Self {
        Self {
            group: event.group.clone(),
            name: event.name.clone(),
            message: event.message.clone(),
            event_type: event.event_type.to_string(),
            timestamp: event.iso_string(),
        }
    }
}

/// Parse exported CSV back into records. The header row is skipped and rows
/// with the wrong number of fields are dropped.
pub fn parse_csv(text: &str) -> Vec<CsvRecord> {
    let header: Vec<&str> = CSV_HEADER.split(',').collect();

    parse_rows(text)
        .into_iter()
        .filter_map(|row| <[String; COLUMNS]>::try_from(row).ok())
        .filter(|row| row.iter().map(String::as_str).ne(header.iter().copied()))
        .map(|[group, name, message, event_type, timestamp]| CsvRecord {
            group,
            name,
            message,
            event_type,
            timestamp,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rollcall_types::EventType;

    fn event(group: &str, name: &str, message: &str, event_type: EventType) -> AttendanceEvent {
        AttendanceEvent::new(1, group, name, message, event_type)
    }

    #[test]
    fn test_empty_log_is_header_only() {
        assert_eq!(generate_csv(&[]), "Group,Name,Message,Type,Timestamp\n");
        assert!(parse_csv(&generate_csv(&[])).is_empty());
    }

    #[test]
    fn test_escape_field() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("two\nlines"), "\"two\nlines\"");
        assert_eq!(escape_field("cr\r"), "\"cr\r\"");
    }

    #[test]
    fn test_generate_rows_oldest_first() {
        let first = event("Crew", "Ana", "here", EventType::CheckIn);
        let second = event("Crew", "Ben", "left, finally", EventType::CheckOut);
        let csv = generate_csv(&[first.clone(), second.clone()]);

        let lines: Vec<&str> = csv.split('\n').collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], format!("Crew,Ana,here,checkin,{}", first.iso_string()));
        assert_eq!(
            lines[2],
            format!("Crew,Ben,\"left, finally\",checkout,{}", second.iso_string())
        );
    }

    #[test]
    fn test_round_trip_with_special_characters() {
        let events = vec![
            event("Crew, North", "O'Neil \"Bud\"", "checked in\nat gate 2", EventType::CheckIn),
            event("", "Unknown", "out\r\nfor lunch", EventType::CheckOut),
        ];
        let records = parse_csv(&generate_csv(&events));
        let expected: Vec<CsvRecord> = events.iter().map(CsvRecord::from).collect();
        assert_eq!(records, expected);
    }

    #[test]
    fn test_parse_rows_crlf_and_blank_lines() {
        let rows = parse_rows("a,b\r\n\r\n\"c\"\"d\",e\n");
        assert_eq!(rows, vec![vec!["a", "b"], vec!["c\"d", "e"]]);
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            group in "[a-z ,\"\n\r]{0,12}",
            name in "[A-Za-z ,\"]{0,12}",
            message in "[a-z ,\"\n\r-]{0,40}",
            checkin in any::<bool>(),
        ) {
            let event_type = if checkin { EventType::CheckIn } else { EventType::CheckOut };
            let events = vec![event(&group, &name, &message, event_type)];
            let records = parse_csv(&generate_csv(&events));
            prop_assert_eq!(records, vec![CsvRecord::from(&events[0])]);
        }
    }
}
