use std::collections::HashMap;
use std::io::{BufRead, Write};

use prodtrace_debuginfo::{DebugFile, SourceLookup};
use prodtrace_symstore::{DebugFileRequest, SymbolError, SymbolStore};

use crate::error::{ReportError, ReportErrorKind};
use crate::frame::{line_terminator, StackFrame};
use crate::modules::ModuleInfo;
use crate::report::ExceptionReport;

/// Loads the debug information of report modules.
///
/// This is implemented by [`SymbolStore`], which locates and opens the module's debug file.
pub trait ModuleSymbols {
    /// The source lookup returned for a module.
    type Lookup: SourceLookup;

    /// Loads the debug information of `module`.
    ///
    /// Returns `Ok(None)` if no debug information is available. Errors indicate inconsistent
    /// symbol sources and are reported in [`TranslateStats::errors`].
    fn load(&self, module: &ModuleInfo) -> Result<Option<Self::Lookup>, SymbolError>;
}

impl<T: ModuleSymbols + ?Sized> ModuleSymbols for &T {
    type Lookup = T::Lookup;

    fn load(&self, module: &ModuleInfo) -> Result<Option<Self::Lookup>, SymbolError> {
        (**self).load(module)
    }
}

/// Builds the symbol store request for a module, if it names a debug file identity.
pub fn debug_file_request(module: &ModuleInfo) -> Option<DebugFileRequest> {
    let debug_id = module.debug_id()?;
    let request = DebugFileRequest::new(module.debug_file_name(), debug_id, module.short_name());

    Some(match module.version() {
        Some(version) => request.with_version(version),
        None => request,
    })
}

impl ModuleSymbols for SymbolStore {
    type Lookup = DebugFile;

    fn load(&self, module: &ModuleInfo) -> Result<Option<DebugFile>, SymbolError> {
        let request = match debug_file_request(module) {
            Some(request) => request,
            None => return Ok(None),
        };

        let path = match self.find(&request)? {
            Some(path) => path,
            None => {
                tracing::debug!(module = module.name(), "no debug file found");
                return Ok(None);
            }
        };

        match DebugFile::open(&path) {
            Ok(file) => Ok(Some(file)),
            Err(error) => {
                tracing::debug!(module = module.name(), %error, "failed to open debug file");
                Ok(None)
            }
        }
    }
}

/// Statistics of a translated report.
#[derive(Debug, Default)]
pub struct TranslateStats {
    /// Number of body lines written.
    pub lines: usize,
    /// Number of stack frame lines.
    pub frames: usize,
    /// Number of frames that received a source location.
    pub resolved: usize,
    /// Modules whose debug information could not be loaded, with the reason.
    pub errors: Vec<(String, SymbolError)>,
}

/// Rewrites the stack frames of reports with source locations.
///
/// ```
/// use prodtrace_report::Translator;
/// use prodtrace_symstore::{SymbolPath, SymbolStore, SymbolStoreConfig};
///
/// let store = SymbolStore::new(SymbolStoreConfig::new(SymbolPath::new()));
/// let translator = Translator::new(&store);
///
/// let report = "   at App!0x06000001!App.Program.Main() +0x4\n\
///               ===\n\
///               MODULE: App => App; G:0f8fad5b-d9cb-469f-a165-70867728950e; A:1\n";
///
/// let mut output = Vec::new();
/// translator.translate(report.as_bytes(), &mut output)?;
/// assert_eq!(output, b"   at App.Program.Main()\n");
/// # Ok::<(), prodtrace_report::ReportError>(())
/// ```
#[derive(Debug)]
pub struct Translator<S> {
    symbols: S,
}

impl<S: ModuleSymbols> Translator<S> {
    /// Creates a translator loading debug information from `symbols`.
    pub fn new(symbols: S) -> Self {
        Translator { symbols }
    }

    /// Reads a report from `input` and writes the translated body to `output`.
    pub fn translate<R, W>(&self, input: R, output: W) -> Result<TranslateStats, ReportError>
    where
        R: BufRead,
        W: Write,
    {
        let report = ExceptionReport::parse(input)?;
        self.write_report(&report, output)
    }

    /// Writes the translated body of a parsed report to `output`.
    ///
    /// Lines that are not frames, and frames of modules missing from the footer, are written
    /// unchanged. All other frames are normalized and receive a source location if the module's
    /// debug information resolves them. Debug information is loaded at most once per module.
    #[tracing::instrument(level = "debug", name = "Translator::write_report", skip_all)]
    pub fn write_report<W: Write>(
        &self,
        report: &ExceptionReport,
        mut output: W,
    ) -> Result<TranslateStats, ReportError> {
        let mut stats = TranslateStats::default();
        let mut lookups: HashMap<&str, Option<S::Lookup>> = HashMap::new();

        for line in report.lines() {
            stats.lines += 1;

            let frame = match StackFrame::parse(line) {
                Some(frame) => frame,
                None => {
                    output.write_all(line).map_err(write_error)?;
                    continue;
                }
            };

            stats.frames += 1;

            // Without a footer entry there is nothing to map the frame with.
            let module = match report.modules().get(&frame.module) {
                Some(module) => module,
                None => {
                    output.write_all(line).map_err(write_error)?;
                    continue;
                }
            };

            let location = if module.debug_id().is_some() {
                let lookup = lookups
                    .entry(module.name())
                    .or_insert_with(|| self.load(module, &mut stats.errors));
                lookup
                    .as_ref()
                    .and_then(|lookup| lookup.source_location(frame.token, frame.il_offset))
            } else {
                None
            };

            if location.is_some() {
                stats.resolved += 1;
            }

            frame
                .write_normalized(&mut output, location.as_ref(), line_terminator(line))
                .map_err(write_error)?;
        }

        output.flush().map_err(write_error)?;

        tracing::debug!(
            frames = stats.frames,
            resolved = stats.resolved,
            "translated report"
        );
        Ok(stats)
    }

    fn load(
        &self,
        module: &ModuleInfo,
        errors: &mut Vec<(String, SymbolError)>,
    ) -> Option<S::Lookup> {
        match self.symbols.load(module) {
            Ok(lookup) => lookup,
            Err(error) => {
                tracing::warn!(module = module.name(), %error, "failed to load debug information");
                errors.push((module.name().to_owned(), error));
                None
            }
        }
    }
}

fn write_error(error: std::io::Error) -> ReportError {
    ReportError::new(ReportErrorKind::Write, error)
}

/// Translates a report using the debug files of `store`.
///
/// This is a shorthand for [`Translator::translate`].
pub fn translate<R, W>(
    store: &SymbolStore,
    input: R,
    output: W,
) -> Result<TranslateStats, ReportError>
where
    R: BufRead,
    W: Write,
{
    Translator::new(store).translate(input, output)
}
