use triage_core::{format_compact_timestamp, IncidentFailure, TriageResult};

const HEADERS: [&str; 7] = [
    "incident",
    "subscription",
    "predicted team",
    "in history",
    "error time",
    "start time",
    "team history",
];

fn cells(row: &TriageResult) -> [String; 7] {
    [
        row.incident_id.to_string(),
        row.subscription_id.clone(),
        row.predicted_owning_team.clone(),
        if row.predicted_team_in_history {
            "yes".to_string()
        } else {
            "no".to_string()
        },
        format_compact_timestamp(row.error_timestamp),
        format_compact_timestamp(row.incident_start_time),
        row.team_history
            .iter()
            .map(|entry| entry.owning_team_name.as_str())
            .collect::<Vec<_>>()
            .join(" > "),
    ]
}

pub fn render_text_table(rows: &[TriageResult]) -> String {
    if rows.is_empty() {
        return "no triage rows\n".to_string();
    }

    let body = rows.iter().map(cells).collect::<Vec<_>>();
    let mut widths = HEADERS.map(str::len);
    for row in &body {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_text_line(&mut out, &HEADERS.map(str::to_string), &widths);
    let rule = widths.map(|width| "-".repeat(width));
    push_text_line(&mut out, &rule, &widths);
    for row in &body {
        push_text_line(&mut out, row, &widths);
    }
    out
}

fn push_text_line(out: &mut String, cells: &[String; 7], widths: &[usize; 7]) {
    let line = cells
        .iter()
        .zip(widths.iter())
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    out.push_str(line.trim_end());
    out.push('\n');
}

pub fn render_failures(failures: &[IncidentFailure]) -> String {
    failures
        .iter()
        .map(|failure| {
            format!(
                "incident {} [{}]: {}\n",
                failure.incident_id, failure.status, failure.message
            )
        })
        .collect()
}

pub fn render_html_table(rows: &[TriageResult]) -> String {
    let mut out = String::from(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Incident triage</title></head>\n<body>\n<table border=\"1\">\n<thead><tr>",
    );
    for header in HEADERS {
        out.push_str("<th>");
        out.push_str(&escape_html(header));
        out.push_str("</th>");
    }
    out.push_str("<th>link</th></tr></thead>\n<tbody>\n");

    for row in rows {
        out.push_str("<tr>");
        for cell in cells(row) {
            out.push_str("<td>");
            out.push_str(&escape_html(&cell));
            out.push_str("</td>");
        }
        out.push_str("<td>");
        if let Some(link) = &row.incident_link {
            let link = escape_html(link);
            out.push_str(&format!("<a href=\"{link}\">{link}</a>"));
        }
        out.push_str("</td></tr>\n");
    }

    out.push_str("</tbody>\n</table>\n</body>\n</html>\n");
    out
}

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
