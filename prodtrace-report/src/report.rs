use std::io::BufRead;

use crate::error::{ReportError, ReportErrorKind};
use crate::frame::is_separator;
use crate::modules::{ModuleInfo, ModuleTable};

/// A parsed exception report.
///
/// A report consists of a body of free text and stack frame lines, optionally followed by a
/// separator line (`===`) and a footer that maps module display names to assemblies and their
/// debug files. Everything after the separator belongs to the footer.
#[derive(Clone, Debug, Default)]
pub struct ExceptionReport {
    lines: Vec<Vec<u8>>,
    modules: ModuleTable,
    has_footer: bool,
}

impl ExceptionReport {
    /// Reads a report to the end.
    ///
    /// Body lines are kept verbatim, including their terminators. Footer lines that are not
    /// `MODULE:` lines are ignored.
    #[tracing::instrument(level = "trace", name = "ExceptionReport::parse", skip_all)]
    pub fn parse<R: BufRead>(mut reader: R) -> Result<Self, ReportError> {
        let mut report = ExceptionReport::default();

        loop {
            let mut line = Vec::new();
            let read = reader
                .read_until(b'\n', &mut line)
                .map_err(|e| ReportError::new(ReportErrorKind::Read, e))?;
            if read == 0 {
                break;
            }

            if report.has_footer {
                let text = String::from_utf8_lossy(&line);
                let text = text.trim_end_matches(&['\r', '\n'][..]);
                if let Some(module) = ModuleInfo::parse(text) {
                    report.modules.insert(module);
                }
            } else if is_separator(&line) {
                report.has_footer = true;
            } else {
                report.lines.push(line);
            }
        }

        tracing::debug!(
            lines = report.lines.len(),
            modules = report.modules.len(),
            "parsed exception report"
        );
        Ok(report)
    }

    /// The body lines preceding the separator, including their terminators.
    pub fn lines(&self) -> impl Iterator<Item = &[u8]> {
        self.lines.iter().map(Vec::as_slice)
    }

    /// The modules listed in the footer.
    pub fn modules(&self) -> &ModuleTable {
        &self.modules
    }

    /// Returns `true` if the report contains a separator line.
    pub fn has_footer(&self) -> bool {
        self.has_footer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    #[test]
    fn test_parse_report() {
        let input = "Exception: boom\r\n   at A!0x1!A.B() +0x0\n=====\nMODULE: A => A; G:x; A:1\nnoise\n";
        let report = ExceptionReport::parse(input.as_bytes()).unwrap();

        assert!(report.has_footer());
        assert_eq!(
            report.lines().collect::<Vec<_>>(),
            [&b"Exception: boom\r\n"[..], &b"   at A!0x1!A.B() +0x0\n"[..]]
        );
        assert_eq!(report.modules().len(), 1);
        assert_eq!(report.modules().get("a").unwrap().identity(), "A");
    }

    #[test]
    fn test_no_footer() {
        let report = ExceptionReport::parse(&b"   at A!0x1!A.B() +0x0"[..]).unwrap();
        assert!(!report.has_footer());
        assert!(report.modules().is_empty());
        assert_eq!(report.lines().count(), 1);
    }

    #[test]
    fn test_footer_is_final() {
        // Frames after the separator are never replayed.
        let input = "===\n   at A!0x1!A.B() +0x0\n===\nMODULE: A => A; A:1\n";
        let report = ExceptionReport::parse(input.as_bytes()).unwrap();
        assert_eq!(report.lines().count(), 0);
        assert_eq!(report.modules().len(), 1);
    }
}
