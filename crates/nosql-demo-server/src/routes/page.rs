use axum::extract::State;
use axum::response::Html;
use std::fmt::Write as _;

use crate::routes::demo::{snapshot, DemoSnapshot};
use crate::state::AppState;

pub const PAGE_TITLE: &str = "Azure Cosmos DB for NoSQL and Azure OpenAI";

/// GET /: the demo page, rendered from the current snapshot.
pub async fn index(State(app): State<AppState>) -> Html<String> {
    Html(render(&snapshot(&app).await))
}

pub fn render(snap: &DemoSnapshot) -> String {
    let mut console = String::new();
    for line in &snap.lines {
        let class = if line.highlight { "line highlight" } else { "line" };
        let _ = writeln!(
            console,
            r#"        <li class="{class}">{}</li>"#,
            escape(&line.message)
        );
    }

    let error = match &snap.error {
        Some(message) => format!(
            r#"<div id="error" class="error" role="alert">{}</div>"#,
            escape(message)
        ),
        None => r#"<div id="error" class="error" role="alert" hidden></div>"#.to_string(),
    };
    let disabled = if snap.running { " disabled" } else { "" };
    let loading = if snap.loading { "" } else { " hidden" };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>{title}</title>
    <link rel="stylesheet" href="/assets/app.css" />
</head>
<body>
    <main>
        <h1>{title}</h1>
        <button id="run" type="button"{disabled}>Run demo</button>
        <span id="loading" class="loading"{loading}>Running...</span>
        {error}
        <ol id="console" class="console" aria-live="polite">
{console}        </ol>
    </main>
    <script src="/assets/app.js"></script>
</body>
</html>
"#,
        title = escape(PAGE_TITLE),
    )
}

/// Minimal HTML escaping for text and attribute content.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
