//! HTML rendering for the index page.
//!
//! The page markup is static; entry data is escaped into it and the chart
//! traces travel as an inert JSON block read by the page script.

use std::fmt::Write;

use crate::entry::PlantEntry;
use crate::error::Result;
use crate::series::Series;

use super::notice::{Notice, NoticeLevel};

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Plant Growth Tracker</title>
    <link rel="stylesheet" href="https://stackpath.bootstrapcdn.com/bootstrap/4.5.2/css/bootstrap.min.css">
    <script src="https://cdn.plot.ly/plotly-2.35.2.min.js"></script>
</head>
<body>
    <div class="container">
        <h1 class="mt-5 text-center">Plant Growth Tracker</h1>
"#;

const ENTRY_FORM: &str = r#"        <form action="/add" method="POST" enctype="multipart/form-data">
            <div class="form-group">
                <label for="name">Plant Name</label>
                <input type="text" class="form-control" id="name" name="name" maxlength="100" required>
            </div>
            <div class="form-group">
                <label for="date">Date</label>
                <input type="date" class="form-control" id="date" name="date" required>
            </div>
            <div class="form-group">
                <label for="height">Height (cm)</label>
                <input type="number" step="0.1" min="0" class="form-control" id="height" name="height" required>
            </div>
            <div class="form-group">
                <label for="notes">Notes</label>
                <textarea class="form-control" id="notes" name="notes"></textarea>
            </div>
            <div class="form-group">
                <label for="photo">Photo</label>
                <input type="file" class="form-control-file" id="photo" name="photo" accept="image/*">
            </div>
            <button type="submit" class="btn btn-primary">Add Entry</button>
        </form>
        <hr>
        <h2 class="mt-5">Growth Progress</h2>
        <div id="growth-chart"></div>
        <hr>
        <h2 class="mt-5">Growth Timeline</h2>
"#;

const CHART_SCRIPT: &str = r"    <script>
        (function () {
            var chart = document.getElementById('growth-chart');
            var data = JSON.parse(document.getElementById('growth-data').textContent);
            if (data.length === 0) {
                chart.textContent = 'No entries yet.';
                return;
            }
            Plotly.newPlot(chart, data, {
                title: 'Plant Growth Over Time',
                xaxis: { title: 'Date' },
                yaxis: { title: 'Height (cm)' }
            });
        })();
    </script>
</body>
</html>
";

/// Render the index page.
///
/// # Errors
///
/// Returns an error if the chart payload cannot be serialized.
pub fn index_page(
    entries: &[PlantEntry],
    series: &Series,
    notice: Option<&Notice>,
) -> Result<String> {
    let mut page = String::with_capacity(8 * 1024);
    page.push_str(PAGE_HEAD);

    if let Some(notice) = notice {
        let class = match notice.level {
            NoticeLevel::Success => "alert-success",
            NoticeLevel::Error => "alert-danger",
        };
        let _ = writeln!(
            page,
            r#"        <div class="alert {class} mt-3" role="alert">{}</div>"#,
            escape_html(&notice.message)
        );
    }

    page.push_str(ENTRY_FORM);
    page.push_str("        <ul class=\"list-group\">\n");
    for entry in entries {
        render_entry(&mut page, entry);
    }
    page.push_str("        </ul>\n    </div>\n");

    let _ = writeln!(
        page,
        r#"    <script type="application/json" id="growth-data">{}</script>"#,
        chart_payload(series)?
    );
    page.push_str(CHART_SCRIPT);
    Ok(page)
}

fn render_entry(page: &mut String, entry: &PlantEntry) {
    let _ = write!(
        page,
        "            <li class=\"list-group-item\">\n                <strong>{}</strong> ({}): Height: {} cm",
        escape_html(&entry.name),
        entry.date_string(),
        format_height(entry.height)
    );
    if let Some(photo) = &entry.photo {
        let _ = write!(
            page,
            "\n                <br><img src=\"/uploads/{}\" alt=\"{}\" width=\"150\">",
            escape_html(photo),
            escape_html(&entry.name)
        );
    }
    if let Some(notes) = &entry.notes {
        let _ = write!(page, "\n                <br>Notes: {}", escape_html(notes));
    }
    page.push_str("\n            </li>\n");
}

/// Serialize the chart traces for embedding inside a `<script>` element.
///
/// `<` is written as `\u003c` so the payload can never close the element.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn chart_payload(series: &Series) -> Result<String> {
    Ok(serde_json::to_string(&series.chart_traces())?.replace('<', "\\u003c"))
}

/// Heights always show a decimal part, e.g. `5.0`.
fn format_height(height: f64) -> String {
    let text = height.to_string();
    if text.contains(['.', 'e', 'E']) {
        text
    } else {
        format!("{text}.0")
    }
}

/// Escape text for use in HTML content and quoted attributes.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::series::build_series;

    fn entry(id: i64, name: &str, photo: Option<&str>, notes: Option<&str>) -> PlantEntry {
        PlantEntry {
            id,
            name: name.to_string(),
            photo: photo.map(ToString::to_string),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            height: 5.0,
            notes: notes.map(ToString::to_string),
        }
    }

    fn render(entries: &[PlantEntry], notice: Option<&Notice>) -> String {
        index_page(entries, &build_series(entries), notice).unwrap()
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<b>"Tom" & 'Jerry'</b>"#),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;"
        );
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn test_format_height() {
        assert_eq!(format_height(5.0), "5.0");
        assert_eq!(format_height(0.0), "0.0");
        assert_eq!(format_height(12.25), "12.25");
    }

    #[test]
    fn test_empty_page_has_form_and_empty_chart() {
        let page = render(&[], None);
        assert!(
            page.contains(r#"<form action="/add" method="POST" enctype="multipart/form-data">"#)
        );
        assert!(page.contains(r#"<script type="application/json" id="growth-data">[]</script>"#));
        assert!(!page.contains("list-group-item"));
        assert!(!page.contains("role=\"alert\""));
    }

    #[test]
    fn test_entry_without_photo_has_no_thumbnail() {
        let page = render(&[entry(1, "Basil", None, None)], None);
        assert!(page.contains("<strong>Basil</strong> (2024-03-01): Height: 5.0 cm"));
        assert!(!page.contains("<img"));
        assert!(!page.contains("Notes:"));
    }

    #[test]
    fn test_entry_with_photo_and_notes() {
        let page = render(
            &[entry(1, "Basil", Some("basil.jpg"), Some("new leaf"))],
            None,
        );
        assert!(page.contains(r#"<img src="/uploads/basil.jpg" alt="Basil" width="150">"#));
        assert!(page.contains("Notes: new leaf"));
    }

    #[test]
    fn test_user_text_is_escaped() {
        let page = render(
            &[entry(1, "<script>alert(1)</script>", None, Some("a & b"))],
            None,
        );
        assert!(!page.contains("<script>alert(1)</script>"));
        assert!(page.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(page.contains("Notes: a &amp; b"));
    }

    #[test]
    fn test_notice_rendering() {
        let page = render(&[], Some(&Notice::error("invalid height: <bad>")));
        assert!(page.contains("alert-danger"));
        assert!(page.contains("invalid height: &lt;bad&gt;"));

        let page = render(
            &[],
            Some(&Notice::success("Plant entry added successfully!")),
        );
        assert!(page.contains("alert-success"));
    }

    #[test]
    fn test_chart_payload_cannot_close_script() {
        let payload = chart_payload(&build_series(&[entry(1, "Basil", None, None)])).unwrap();
        assert!(!payload.contains('<'));
        assert!(payload.contains(r#""x":["2024-03-01"]"#));
    }
}
