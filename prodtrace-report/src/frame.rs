use std::borrow::Cow;
use std::io::{self, Write};

use once_cell::sync::Lazy;
use regex::bytes::Regex;

use prodtrace_common::SourceLocation;

static FRAME_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)^\s*at\s+(?P<module>[^<>:"/\\|?*\x00-\x1f!]+)!0x(?P<token>[0-9a-f]+)!(?P<method>[^(]+)\((?P<args>[^)]*)\)\s+\+0x(?P<offset>[0-9a-f]+)"#,
    )
    .unwrap()
});

static SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"={3,}").unwrap());

/// Returns `true` if the line separates the stack trace from the module footer.
pub(crate) fn is_separator(line: &[u8]) -> bool {
    SEPARATOR.is_match(line)
}

/// A stack frame line of a report, such as `at Lib!0x06000001!Lib.Type.Method(Int32 x) +0x1b`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StackFrame<'a> {
    /// Display name of the module, as listed in the footer.
    pub module: Cow<'a, str>,
    /// Metadata token of the method.
    pub token: u32,
    /// IL offset within the method body.
    pub il_offset: u32,
    /// The method name, including its declaring type.
    pub method: Cow<'a, str>,
    /// The parameter list without parentheses.
    pub args: Cow<'a, str>,
}

impl<'a> StackFrame<'a> {
    /// Parses a frame line.
    ///
    /// Returns `None` if the line is not a frame, or if its token or offset do not fit 32 bits.
    pub fn parse(line: &'a [u8]) -> Option<Self> {
        let captures = FRAME_LINE.captures(line)?;

        let token = parse_hex(&captures["token"])?;
        let il_offset = parse_hex(&captures["offset"])?;

        let text = |name| match captures.name(name) {
            Some(m) => String::from_utf8_lossy(m.as_bytes()),
            None => Cow::Borrowed(""),
        };

        Some(StackFrame {
            module: text("module"),
            token,
            il_offset,
            method: text("method"),
            args: text("args"),
        })
    }

    /// Writes the frame without module, token and offset, followed by the source location.
    ///
    /// The line is terminated with `terminator`.
    pub fn write_normalized<W: Write>(
        &self,
        mut writer: W,
        location: Option<&SourceLocation>,
        terminator: &[u8],
    ) -> io::Result<()> {
        write!(writer, "   at {}({})", self.method, self.args)?;
        if let Some(location) = location {
            write!(writer, " in {location}")?;
        }
        writer.write_all(terminator)
    }
}

fn parse_hex(digits: &[u8]) -> Option<u32> {
    let digits = std::str::from_utf8(digits).ok()?;
    u32::from_str_radix(digits, 16).ok()
}

/// Returns the line terminator of `line`, defaulting to `\n` for the last line of a file.
pub(crate) fn line_terminator(line: &[u8]) -> &[u8] {
    if line.ends_with(b"\r\n") {
        b"\r\n"
    } else {
        b"\n"
    }
}
