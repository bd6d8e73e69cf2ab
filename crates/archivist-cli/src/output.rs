use atty::Stream;
use color_eyre::Result;
use serde::Serialize;
use serde_json::{json, Value};

use crate::style::Style;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandStatus {
    Ok,
    UserError,
    Failure,
}

impl CommandStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::UserError => 1,
            Self::Failure => 2,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ExecutionOutcome {
    pub status: CommandStatus,
    pub message: String,
    pub details: Value,
}

impl ExecutionOutcome {
    pub fn success(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Ok,
            message: message.into(),
            details,
        }
    }

    pub fn failure(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Failure,
            message: message.into(),
            details,
        }
    }

    pub fn user_error(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::UserError,
            message: message.into(),
            details,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct OutputOptions {
    pub quiet: bool,
    pub json: bool,
    pub no_color: bool,
}

pub fn emit_output(opts: &OutputOptions, command: &str, outcome: &ExecutionOutcome) -> Result<i32> {
    let code = outcome.status.exit_code();
    let style = Style::new(opts.no_color, atty::is(Stream::Stdout));

    if opts.json {
        let payload = to_json_response(command, outcome);
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(code);
    }

    if is_passthrough(&outcome.details) && outcome.status == CommandStatus::Ok {
        if !opts.quiet {
            print!("{}", outcome.message);
        }
        return Ok(code);
    }

    let message = format_status_message(command, &outcome.message);
    if outcome.status == CommandStatus::Ok {
        if opts.quiet {
            return Ok(code);
        }
        println!("{}", style.status(outcome.status, &message));
        if let Some(table) = render_table(&style, command, &outcome.details) {
            println!("{table}");
        }
    } else {
        eprintln!("{}", style.status(outcome.status, &message));
        if let Some(hint) = hint_from_details(&outcome.details) {
            eprintln!("{}", style.info(&format!("Hint: {hint}")));
        }
    }
    Ok(code)
}

pub fn to_json_response(command: &str, outcome: &ExecutionOutcome) -> Value {
    let status = match outcome.status {
        CommandStatus::Ok => "ok",
        CommandStatus::UserError => "user-error",
        CommandStatus::Failure => "error",
    };
    let details = match &outcome.details {
        Value::Object(_) => outcome.details.clone(),
        Value::Null => json!({}),
        other => json!({ "value": other }),
    };
    json!({
        "status": status,
        "message": format_status_message(command, &outcome.message),
        "details": details,
    })
}

pub fn format_status_message(command: &str, message: &str) -> String {
    format!("archivist {command}: {message}")
}

fn hint_from_details(details: &Value) -> Option<&str> {
    details.get("hint").and_then(Value::as_str)
}

fn is_passthrough(details: &Value) -> bool {
    details
        .get("passthrough")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn render_table(style: &Style, command: &str, details: &Value) -> Option<String> {
    match command {
        "snapshot" => {
            let files = details.get("files")?.as_array()?;
            let rows = files
                .iter()
                .map(|file| {
                    vec![
                        cell(file, "path"),
                        cell(file, "patch"),
                        cell(file, "date"),
                        cell(file, "checksum"),
                        cell(file, "uncompressed_size"),
                    ]
                })
                .collect::<Vec<_>>();
            (!rows.is_empty())
                .then(|| format_table(style, &["Path", "Patch", "Date", "Checksum", "Size"], &rows))
        }
        "stats" => {
            let dists = details.get("distributions")?.as_array()?;
            let rows = dists
                .iter()
                .map(|dist| {
                    vec![
                        cell(dist, "distribution"),
                        cell(dist, "memberships"),
                        cell(dist, "paths"),
                        cell(dist, "latest_patch"),
                    ]
                })
                .collect::<Vec<_>>();
            (!rows.is_empty()).then(|| {
                format_table(
                    style,
                    &["Distribution", "Memberships", "Paths", "Latest patch"],
                    &rows,
                )
            })
        }
        _ => None,
    }
}

fn cell(row: &Value, key: &str) -> String {
    match row.get(key) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => "-".to_string(),
        Some(other) => other.to_string(),
    }
}

fn format_table(style: &Style, headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|header| header.len()).collect();
    for row in rows {
        for (width, value) in widths.iter_mut().zip(row) {
            *width = (*width).max(value.chars().count());
        }
    }

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(style.table_header(&format_row(headers, &widths)));
    lines.push(
        widths
            .iter()
            .map(|width| "-".repeat(*width))
            .collect::<Vec<_>>()
            .join("  "),
    );
    for row in rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        lines.push(format_row(&cells, &widths));
    }
    lines.join("\n")
}

fn format_row(cells: &[&str], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(value, &width)| format!("{value:<width$}"))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_pad_columns_to_the_widest_cell() {
        let style = Style::new(true, false);
        let rows = vec![
            vec!["us".to_string(), "12".to_string()],
            vec!["gamigo".to_string(), "3".to_string()],
        ];
        let table = format_table(&style, &["Dist", "Rows"], &rows);
        assert_eq!(
            table,
            "Dist    Rows\n------  ----\nus      12\ngamigo  3"
        );
    }

    #[test]
    fn json_envelope_wraps_scalar_details() {
        let outcome = ExecutionOutcome::success("done", json!(3));
        let payload = to_json_response("stats", &outcome);
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["message"], "archivist stats: done");
        assert_eq!(payload["details"]["value"], 3);
    }
}
