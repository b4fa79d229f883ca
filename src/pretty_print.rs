use crate::Span;
use crate::reader::ParseError;
use ariadne::{Config, Label, Report, ReportKind, Source};
use std::io::{self, Write};
use std::ops::Range;

// Spans are byte offsets; reports are laid out in characters.
fn char_range(input: &str, span: Span) -> Range<usize> {
    let to_chars = |offset: usize| {
        input
            .get(..offset)
            .map(|prefix| prefix.chars().count())
            .unwrap_or(offset)
    };
    let range = span.to_range();
    to_chars(range.start)..to_chars(range.end)
}

impl ParseError {
    fn report<'a>(
        &self,
        source_name: &'a str,
        input: &str,
        config: Config,
    ) -> Report<'a, (&'a str, Range<usize>)> {
        let report = match self {
            ParseError::UnexpectedToken { found, expected } => {
                let range = char_range(input, found.span);
                Report::build(ReportKind::Error, (source_name, range.clone()))
                    .with_message(format!("Unexpected token: {}", found.kind))
                    .with_label(
                        Label::new((source_name, range)).with_message(format!("Expected {expected}")),
                    )
            }
            ParseError::UnexpectedEof(expected) => {
                let end = input.chars().count();
                Report::build(ReportKind::Error, (source_name, end..end))
                    .with_message("Unexpected end of input")
                    .with_label(
                        Label::new((source_name, end..end))
                            .with_message(format!("Expected {expected}")),
                    )
            }
            ParseError::UnterminatedString(span) => {
                let range = char_range(input, *span);
                Report::build(ReportKind::Error, (source_name, range.clone()))
                    .with_message("Unterminated string literal")
                    .with_label(
                        Label::new((source_name, range))
                            .with_message("This string is missing its closing quote"),
                    )
            }
            ParseError::InvalidHashLiteral(span, message) => {
                let range = char_range(input, *span);
                Report::build(ReportKind::Error, (source_name, range.clone()))
                    .with_message("Invalid hash literal")
                    .with_label(Label::new((source_name, range)).with_message(message))
            }
        };
        report.with_config(config).finish()
    }

    /// Prints a labelled report of this error to stderr.
    pub fn pretty_print(&self, source_name: &str, input: &str) -> io::Result<()> {
        self.report(source_name, input, Config::default())
            .eprint((source_name, Source::from(input)))
    }

    /// Writes an uncoloured report to `out`.
    pub fn write_report(&self, source_name: &str, input: &str, out: impl Write) -> io::Result<()> {
        self.report(source_name, input, Config::default().with_color(false))
            .write((source_name, Source::from(input)), out)
    }
}

#[cfg(test)]
mod tests {
    use crate::reader::read_all;

    fn render(input: &str) -> String {
        let err = read_all(input).expect_err("input should fail to parse");
        let mut out = Vec::new();
        err.write_report("test.lisp", input, &mut out)
            .expect("writing to a Vec cannot fail");
        String::from_utf8(out).expect("report is utf-8")
    }

    #[test]
    fn test_unexpected_token_report() {
        let report = render("(+ 1 2))");
        assert!(report.contains("Unexpected token: )"), "{}", report);
        assert!(report.contains("Expected an expression"), "{}", report);
        assert!(report.contains("test.lisp"), "{}", report);
    }

    #[test]
    fn test_unexpected_eof_report() {
        let report = render("(define x");
        assert!(report.contains("Unexpected end of input"), "{}", report);
    }

    #[test]
    fn test_unterminated_string_report() {
        let report = render("(print \"héllo");
        assert!(report.contains("Unterminated string literal"), "{}", report);
    }

    #[test]
    fn test_invalid_hash_report() {
        let report = render("{a}");
        assert!(report.contains("Invalid hash literal"), "{}", report);
        assert!(report.contains("even number"), "{}", report);
    }
}
