//! Minimal HTML for the verification result page and notification emails.

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Standalone result page. `title` and `message` are escaped here.
pub fn result_page(title: &str, message: &str, success: bool) -> String {
    let accent = if success { "#16a34a" } else { "#dc2626" };
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title} | Riva</title>
    <style>
        body {{ font-family: system-ui, sans-serif; background: #f8fafc; margin: 0; }}
        main {{ max-width: 480px; margin: 10vh auto; background: #fff; padding: 2rem; border-radius: 12px; }}
        h1 {{ color: {accent}; font-size: 1.5rem; }}
    </style>
</head>
<body>
    <main>
        <h1>{title}</h1>
        <p>{message}</p>
    </main>
</body>
</html>
"#,
        title = escape_html(title),
        message = escape_html(message),
        accent = accent,
    )
}

/// Simple email body: heading, paragraph, optional call-to-action link.
pub fn email_body(heading: &str, paragraph: &str, link: Option<(&str, &str)>) -> String {
    let cta = link
        .map(|(label, href)| {
            format!(
                r#"<p><a href="{}" style="background:#111827;color:#fff;padding:10px 18px;border-radius:6px;text-decoration:none">{}</a></p>"#,
                escape_html(href),
                escape_html(label)
            )
        })
        .unwrap_or_default();

    format!(
        "<div style=\"font-family:system-ui,sans-serif\"><h2>{}</h2><p>{}</p>{}<p>The Riva team</p></div>",
        escape_html(heading),
        escape_html(paragraph),
        cta
    )
}
