//! Standalone HTML rendering of a [`ReportDocument`].
//!
//! Section text is plain; every string is escaped on the way out.

use super::types::{QaStatus, ReportDocument, Section, SectionKind};

/// Escape the characters that are significant in HTML text and attributes.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

impl ReportDocument {
    /// Render the document as a complete HTML page. Branding becomes classes
    /// on `<body>`; a QA banner precedes the sections.
    pub fn to_html(&self) -> String {
        let mut html = String::new();
        html.push_str("<!DOCTYPE html>\n<html lang=\"ko\">\n<head>\n<meta charset=\"utf-8\">\n");
        html.push_str(&format!("<title>{}</title>\n", escape_html(&self.title)));
        html.push_str("</head>\n");
        html.push_str(&format!(
            "<body class=\"report report-{} theme-{} density-{}\" data-state=\"{}\">\n",
            self.metadata.report_type,
            escape_html(&self.branding.theme),
            self.branding.density,
            self.state,
        ));

        html.push_str(&qa_banner(self));
        for section in &self.sections {
            html.push_str(&render_section(section));
        }

        html.push_str(&format!(
            "<!-- {} generated {} -->\n",
            escape_html(&self.metadata.build_signature),
            self.metadata.generated_at.to_rfc3339()
        ));
        html.push_str("</body>\n</html>\n");
        html
    }
}

fn qa_banner(doc: &ReportDocument) -> String {
    let (class, label) = match doc.qa_result.status {
        QaStatus::Pass => ("qa-pass", "Quality check passed"),
        QaStatus::PassWithWarnings => ("qa-warn", "Quality check passed with warnings"),
        QaStatus::Fail => ("qa-fail", "Quality check failed"),
    };
    let mut out = format!("<div class=\"qa-banner {class}\">\n<strong>{label}</strong>\n");
    let notes: Vec<&String> = doc.qa_result.errors.iter().chain(&doc.qa_result.warnings).collect();
    if !notes.is_empty() {
        out.push_str("<ul>\n");
        for note in notes {
            out.push_str(&format!("<li>{}</li>\n", escape_html(note)));
        }
        out.push_str("</ul>\n");
    }
    out.push_str("</div>\n");
    out
}

fn render_section(section: &Section) -> String {
    let mut out = format!(
        "<section class=\"{}\">\n<h2>{}</h2>\n",
        section.kind.css_class(),
        escape_html(&section.title)
    );

    if section.kind == SectionKind::NextActions {
        out.push_str("<ol>\n");
        for action in &section.paragraphs {
            out.push_str(&format!("<li>{}</li>\n", escape_html(action)));
        }
        out.push_str("</ol>\n");
    } else {
        for p in &section.paragraphs {
            out.push_str(&format!("<p>{}</p>\n", escape_html(p)));
        }
    }

    if !section.rows.is_empty() {
        out.push_str("<table>\n");
        for row in &section.rows {
            out.push_str(&format!(
                "<tr><th>{}</th><td>{}</td></tr>\n",
                escape_html(&row.label),
                escape_html(&row.value)
            ));
        }
        out.push_str("</table>\n");
    }

    out.push_str("</section>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup_characters() {
        assert_eq!(
            escape_html(r#"<b>"A&B"</b> 'x'"#),
            "&lt;b&gt;&quot;A&amp;B&quot;&lt;/b&gt; &#39;x&#39;"
        );
    }

    #[test]
    fn plain_text_untouched() {
        assert_eq!(escape_html("5,600,000,000원"), "5,600,000,000원");
    }

    #[test]
    fn next_actions_render_as_list() {
        let section = Section::new(SectionKind::NextActions, "Next Actions")
            .paragraph("First")
            .paragraph("Second <now>");
        let html = render_section(&section);
        assert!(html.contains("<ol>\n<li>First</li>\n<li>Second &lt;now&gt;</li>\n</ol>"));
        assert!(html.contains("class=\"next-actions\""));
    }

    #[test]
    fn rows_render_as_table() {
        let section = Section::new(SectionKind::KpiSummary, "Key Figures").row("Total land value", "5,600,000,000원");
        let html = render_section(&section);
        assert!(html.contains("<tr><th>Total land value</th><td>5,600,000,000원</td></tr>"));
    }
}
