use crate::error::Error;

/// A lowering diagnostic (error or warning).
///
/// `origin` carries the text of the equation that triggered it; it doubles
/// as the source buffer when rendering.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub origin: Option<String>,
    pub notes: Vec<String>,
    pub help: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Diagnostic {
    pub fn error(message: String) -> Self {
        Self {
            severity: Severity::Error,
            message,
            origin: None,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn warning(message: String) -> Self {
        Self {
            severity: Severity::Warning,
            message,
            origin: None,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn with_origin(mut self, origin: String) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.notes.push(note);
        self
    }

    pub fn with_help(mut self, help: String) -> Self {
        self.help = Some(help);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Render the diagnostic to stderr using ariadne.
    pub fn render(&self, filename: &str) {
        use ariadne::{Color, Label, Report, ReportKind, Source};

        let kind = match self.severity {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
        };

        let color = match self.severity {
            Severity::Error => Color::Red,
            Severity::Warning => Color::Yellow,
        };

        let source = self.origin.clone().unwrap_or_default();
        let mut report = Report::build(kind, filename, 0)
            .with_message(&self.message)
            .with_label(
                Label::new((filename, 0..source.len()))
                    .with_message(&self.message)
                    .with_color(color),
            );

        for note in &self.notes {
            report = report.with_note(note);
        }

        if let Some(help) = &self.help {
            report = report.with_help(help);
        }

        // stderr is gone; nothing left to report to
        let _ = report.finish().eprint((filename, Source::from(source)));
    }
}

impl From<Error> for Diagnostic {
    fn from(err: Error) -> Self {
        let diag = Diagnostic::error(err.to_string());
        match &err {
            Error::ConflictingDerivOrder { .. } => diag.with_help(
                "give the order either in the dimension pair or as `deriv_order`".to_string(),
            ),
            Error::MultipleGrids { .. } => diag.with_help(
                "define every function of one equation on the same grid".to_string(),
            ),
            Error::UnexpandedDerivative { .. } => {
                diag.with_help("call `evaluate()` before lowering".to_string())
            }
            _ => diag,
        }
    }
}

/// Render a list of diagnostics.
pub fn render_diagnostics(diagnostics: &[Diagnostic], filename: &str) {
    for diag in diagnostics {
        diag.render(filename);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let d = Diagnostic::error("derivative left unexpanded".to_string());
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.message, "derivative left unexpanded");
        assert!(d.origin.is_none());
        assert!(d.notes.is_empty());
        assert!(d.help.is_none());
    }

    #[test]
    fn test_chained_builders() {
        let d = Diagnostic::warning("two grids".to_string())
            .with_origin("Eq(u, v + w)".to_string())
            .with_note("grid g0".to_string())
            .with_help("use one grid".to_string())
            .with_note("grid g1".to_string());
        assert_eq!(d.severity, Severity::Warning);
        assert_eq!(d.origin.as_deref(), Some("Eq(u, v + w)"));
        assert_eq!(d.notes, vec!["grid g0", "grid g1"]);
        assert!(d.help.is_some());
        assert!(!d.is_error());
    }

    #[test]
    fn test_from_error_keeps_message() {
        let d: Diagnostic = Error::NoDimensions.into();
        assert!(d.is_error());
        assert_eq!(d.message, Error::NoDimensions.to_string());
    }

    #[test]
    fn test_from_conflict_adds_help() {
        let d: Diagnostic = Error::ConflictingDerivOrder {
            given: 1,
            keyword: 2,
        }
        .into();
        assert!(d.help.is_some());
    }

    #[test]
    fn test_render_does_not_panic() {
        let d = Diagnostic::error("bad equation".to_string())
            .with_origin("Eq(u(t + dt, x), u(t, x).dq)".to_string())
            .with_note("no such shortcut".to_string());
        d.render("<equation>");
    }

    #[test]
    fn test_render_without_origin() {
        render_diagnostics(
            &[Diagnostic::warning("nothing to point at".to_string())],
            "<equation>",
        );
    }
}
