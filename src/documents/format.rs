use std::fmt::Write;

use crate::pipeline::model::{ErrorRecord, summarize};

/// Readable title for a page url: the last path segment, hyphens turned
/// into spaces and each word capitalized.
pub fn title_from_url(url: &str) -> String {
    let last = url
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .rsplit('/')
        .next()
        .unwrap_or_default();

    let title = last
        .split('-')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    if title.is_empty() {
        "Untitled".to_string()
    } else {
        title
    }
}

/// Lays out the report body as plain text.
///
/// A "Summary" section with per-error totals comes first, followed by
/// "Errors by Page" with one section per error in the order given.
#[tracing::instrument(
    name = "pipeline_stage format",
    skip(errors),
    fields(pipeline.stage = "format", report.errors = errors.len(), document.chars)
)]
pub fn render_report(errors: &[ErrorRecord]) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Summary");
    let _ = writeln!(out, "Quantity\tErrors");
    for summary in summarize(errors) {
        let _ = writeln!(out, "{}\t\t{}", summary.total_errors, summary.error_name);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Errors by Page");
    for error in errors {
        let _ = writeln!(out, "{}", error.error_name());
        let _ = writeln!(
            out,
            "{} ({} instances)",
            error.error_category(),
            error.instance_count()
        );
        let _ = writeln!(out, "{}", error.documentation());
        let _ = writeln!(out, "Why it matters:");
        let _ = writeln!(out, "{}", error.why_it_matters());
        let _ = writeln!(out, "How to fix it:");
        let _ = writeln!(out, "{}", error.how_to_fix_it());
        let _ = writeln!(out);
        let _ = writeln!(out, "Errors\t\tTitle");
        for entry in error.data_entries() {
            let _ = writeln!(
                out,
                "{}\t\t{} <{}>",
                entry.count(),
                title_from_url(entry.url()),
                entry.url()
            );
        }
        let _ = writeln!(out);
    }

    tracing::Span::current().record("document.chars", out.chars().count());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::model::ErrorDocumentation;

    fn record(name: &str, entries: &[(&str, u32)]) -> ErrorRecord {
        let mut error = ErrorRecord::new(
            4,
            name,
            "Errors",
            ErrorDocumentation {
                documentation: format!("{name} documentation"),
                why_it_matters: "Screen readers rely on it.".to_string(),
                how_to_fix_it: "Add the attribute.".to_string(),
            },
        );
        for (url, count) in entries {
            error.add_data_entry(*url, *count);
        }
        error
    }

    #[test]
    fn test_title_from_url() {
        assert_eq!(title_from_url("https://example.com/about-our-TEAM"), "About Our Team");
        assert_eq!(title_from_url("https://example.com/news/latest?page=2"), "Latest");
        assert_eq!(title_from_url("https://example.com/"), "Untitled");
        assert_eq!(title_from_url(""), "Untitled");
    }

    #[test]
    fn test_render_report_orders_sections() {
        let errors = vec![
            record("Low contrast", &[("https://example.com/home", 7)]),
            record(
                "Missing alt text",
                &[("https://example.com/home", 2), ("https://example.com/contact-us", 3)],
            ),
        ];
        let body = render_report(&errors);

        let summary = body.find("Summary").unwrap();
        let by_page = body.find("Errors by Page").unwrap();
        let sections = &body[by_page..];
        let low = sections.find("\nLow contrast\n").unwrap();
        let alt = sections.find("\nMissing alt text\n").unwrap();
        assert!(summary < by_page);
        assert!(low < alt);

        assert!(body.contains("7\t\tLow contrast\n"));
        assert!(body.contains("5\t\tMissing alt text\n"));
        assert!(body.contains("3\t\tContact Us <https://example.com/contact-us>\n"));
        assert!(body.contains("Why it matters:\nScreen readers rely on it.\n"));
    }

    #[test]
    fn test_render_empty_report() {
        let body = render_report(&[]);
        assert!(body.starts_with("Summary\nQuantity\tErrors\n\nErrors by Page\n"));
    }
}
