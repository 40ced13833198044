//! Buffer export rendering.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::event::LogEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Ndjson,
    Csv,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Ndjson => "ndjson",
            ExportFormat::Csv => "csv",
        }
    }
}

const CSV_HEADER: &str = "timestamp,level,service,logger,message,trace_id,source_host,source_pid,context";

/// Render events (oldest first) in the requested format.
pub fn render<E: AsRef<LogEvent>>(format: ExportFormat, events: &[E]) -> Result<String, serde_json::Error> {
    match format {
        ExportFormat::Json => {
            let borrowed: Vec<&LogEvent> = events.iter().map(AsRef::as_ref).collect();
            serde_json::to_string(&borrowed)
        }
        ExportFormat::Ndjson => {
            let mut out = String::new();
            for event in events {
                out.push_str(&serde_json::to_string(event.as_ref())?);
                out.push('\n');
            }
            Ok(out)
        }
        ExportFormat::Csv => {
            let mut out = String::with_capacity(events.len() * 128);
            out.push_str(CSV_HEADER);
            out.push('\n');
            for event in events {
                csv_row(&mut out, event.as_ref())?;
            }
            Ok(out)
        }
    }
}

fn csv_row(out: &mut String, event: &LogEvent) -> Result<(), serde_json::Error> {
    let context = if event.context.is_empty() {
        String::new()
    } else {
        serde_json::to_string(&event.context)?
    };
    let pid = event.source_pid.map(|p| p.to_string()).unwrap_or_default();
    let timestamp = event.timestamp.to_rfc3339();

    let cells = [
        timestamp.as_str(),
        event.level.as_str(),
        event.service.as_str(),
        event.logger.as_str(),
        event.message.as_str(),
        event.trace_id.as_deref().unwrap_or(""),
        event.source_host.as_deref().unwrap_or(""),
        pid.as_str(),
        context.as_str(),
    ];

    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_csv_cell(out, cell);
    }
    out.push('\n');
    Ok(())
}

fn push_csv_cell(out: &mut String, cell: &str) {
    if cell.contains([',', '"', '\n', '\r']) {
        let _ = write!(out, "\"{}\"", cell.replace('"', "\"\""));
    } else {
        out.push_str(cell);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Level;
    use std::sync::Arc;

    fn events() -> Vec<Arc<LogEvent>> {
        vec![
            Arc::new(LogEvent::new(Level::Info, "api", "plain")),
            Arc::new(
                LogEvent::new(Level::Error, "api", "said \"no\", twice")
                    .with_field("user", 7)
                    .unwrap(),
            ),
        ]
    }

    #[test]
    fn json_is_an_array() {
        let out = render(ExportFormat::Json, &events()).unwrap();
        let parsed: Vec<LogEvent> = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].level, Level::Error);
    }

    #[test]
    fn ndjson_has_one_line_per_event() {
        let out = render(ExportFormat::Ndjson, &events()).unwrap();
        assert_eq!(out.lines().count(), 2);
        for line in out.lines() {
            serde_json::from_str::<LogEvent>(line).unwrap();
        }
    }

    #[test]
    fn csv_quotes_special_cells() {
        let out = render(ExportFormat::Csv, &events()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert!(lines[1].contains(",INFO,api,,plain,"));
        assert!(lines[2].contains("\"said \"\"no\"\", twice\""));
        assert!(lines[2].ends_with("\"{\"\"user\"\":7}\""));
    }

    #[test]
    fn format_names() {
        let format: ExportFormat = serde_json::from_str("\"ndjson\"").unwrap();
        assert_eq!(format, ExportFormat::Ndjson);
        assert_eq!(ExportFormat::default().as_str(), "json");
    }
}
