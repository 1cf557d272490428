//!
//! # Cif Reading Module
//!
//! Three layers share this file, mirroring their runtime nesting:
//!
//! * [CifReader] - the character-level lexer over a seekable byte source,
//!   with per-call-site whitespace and end-of-file policies, cooperative
//!   cancellation checks, and error context capture.
//! * [CifParser] - the recursive-descent record parser, producing an
//!   abstract [CifEvent] stream while maintaining the symbol tables,
//!   ticket table, and scale contexts. Both backends consume the same
//!   stream, so the token grammar lives in exactly one place.
//! * [CifImporter] - the materialization backend, folding events into an
//!   abstract [DatabaseSink].
//!

// Std-Lib
use std::collections::{HashMap, VecDeque};
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::Path;

// Crates.io
use log::{debug, warn};
use serde::{Deserialize, Serialize};

// Local imports
use crate::data::{
    CellKey, CifElement, CifInstance, CifLibrary, CifMode, CifReadOptions, DatabaseSink,
    EntityHandle, LayerDescriptor, MergePolicy, NameStyle,
};
use crate::error::{CifError, CifResult, CifWarning};
use crate::geom::{CifBox, CifShape, Label, Point, Polygon, Wire};
use crate::props::{CifProperty, PropertyRegistry};
use crate::scale::ScaleContext;
use crate::symbols::{ArraySpec, SymbolKey, SymbolTable};
use crate::xform::{CifPlacement, TicketId, TicketTable};
use crate::{Int, PROGRESS_CADENCE};

/// Bytes of trailing source kept for error context
const CONTEXT_BYTES: usize = 30;

/// Cooperative progress/cancel callback: receives the current byte offset,
/// returns `false` to cancel the operation.
pub type ProgressHook = Box<dyn FnMut(u64) -> bool>;
/// Merge-policy callback for [MergePolicy::Ask]: receives the colliding
/// cell name, returns `true` to overwrite.
pub type MergeHook = Box<dyn FnMut(&str) -> bool>;

/// Read and materialize the file at `fname` into a new [CifLibrary]
pub fn import_file(
    fname: impl AsRef<Path>,
    opts: CifReadOptions,
) -> CifResult<(CifLibrary, ReadStats)> {
    let name = fname
        .as_ref()
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "cif".to_string());
    let file = std::fs::File::open(fname)?;
    import_reader(std::io::BufReader::new(file), name, opts)
}
/// Read and materialize source text `src` into a new [CifLibrary]
pub fn import_str(src: &str, opts: CifReadOptions) -> CifResult<(CifLibrary, ReadStats)> {
    import_reader(Cursor::new(src.as_bytes().to_vec()), "cif", opts)
}
fn import_reader(
    src: impl Read + Seek,
    name: impl Into<String>,
    opts: CifReadOptions,
) -> CifResult<(CifLibrary, ReadStats)> {
    let mut parser = CifParser::new(src, opts.clone())?;
    let mut lib = CifLibrary::new(name);
    let stats = CifImporter::new(&mut lib, opts).import(&mut parser)?;
    lib.finalize_bboxes();
    Ok((lib, stats))
}

/// # Whitespace Policy
///
/// What the lexer strips before handing back a token byte; varies per call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhitespacePolicy {
    /// Strip blanks, tabs, commas, and newlines
    Separators,
    /// Strip everything except alphanumerics, parens, semicolons, and signs
    NonSemantic,
    /// Strip nothing
    Nothing,
}
/// # End-of-File Policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EofPolicy {
    /// End-of-file is a syntax error
    Hard,
    /// End-of-file yields `None`; used to allow an absent second mode section
    Soft,
}

/// # CifReader
///
/// Character-level lexer over a seekable byte source. Tracks the byte
/// offset and line counter, keeps the trailing source bytes for error
/// context, and runs the cooperative cancellation check every
/// [PROGRESS_CADENCE] bytes.
pub struct CifReader<R: Read + Seek> {
    /// Source being read
    src: R,
    /// Peeked next byte
    peeked: Option<u8>,
    /// Byte offset: count of bytes pulled from `src`
    pos: u64,
    /// Line counter, one-based
    line: usize,
    /// Trailing source bytes for error context
    trail: VecDeque<u8>,
    /// Progress/cancel callback
    progress: Option<ProgressHook>,
    /// Next byte offset at which to run the progress check
    next_check: u64,
    /// Latched once cancellation is observed
    interrupted: bool,
    /// Count of raw byte reads issued to `src`
    read_calls: u64,
}
impl<R: Read + Seek> CifReader<R> {
    /// Create a new [CifReader] over `src`
    pub fn new(src: R) -> Self {
        Self {
            src,
            peeked: None,
            pos: 0,
            line: 1,
            trail: VecDeque::with_capacity(CONTEXT_BYTES),
            progress: None,
            next_check: PROGRESS_CADENCE,
            interrupted: false,
            read_calls: 0,
        }
    }
    /// Install the progress/cancel callback
    pub fn set_progress(&mut self, hook: ProgressHook) {
        self.progress = Some(hook);
    }
    /// Count of raw reads issued to the source, e.g. for override-substitution checks
    pub fn read_calls(&self) -> u64 {
        self.read_calls
    }
    /// Current line number
    pub fn line(&self) -> usize {
        self.line
    }
    /// Byte offset of the next unconsumed byte
    pub fn tell(&self) -> u64 {
        self.pos - self.peeked.is_some() as u64
    }
    /// Seek to absolute `offset`, discarding lookahead and context.
    /// The line counter restarts; positions reached by seeking report
    /// offset-relative lines.
    pub fn seek(&mut self, offset: u64) -> CifResult<()> {
        self.src.seek(SeekFrom::Start(offset))?;
        self.peeked = None;
        self.pos = offset;
        self.line = 1;
        self.trail.clear();
        self.next_check = offset + PROGRESS_CADENCE;
        Ok(())
    }
    /// Pull the next raw byte, or `None` at end-of-file
    fn next_raw(&mut self) -> CifResult<Option<u8>> {
        if self.interrupted {
            return Err(CifError::Interrupted { bytepos: self.pos });
        }
        if let Some(b) = self.peeked.take() {
            return Ok(Some(b));
        }
        let mut buf = [0u8; 1];
        self.read_calls += 1;
        let n = self.src.read(&mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        let b = buf[0];
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
        }
        if self.trail.len() == CONTEXT_BYTES {
            self.trail.pop_front();
        }
        self.trail.push_back(b);
        if self.pos >= self.next_check {
            self.next_check = self.pos + PROGRESS_CADENCE;
            if let Some(hook) = self.progress.as_mut() {
                if !hook(self.pos) {
                    self.interrupted = true;
                    return Err(CifError::Interrupted { bytepos: self.pos });
                }
            }
        }
        Ok(Some(b))
    }
    /// Peek the next raw byte without consuming it
    fn peek_raw(&mut self) -> CifResult<Option<u8>> {
        if self.peeked.is_none() {
            self.peeked = self.next_raw()?;
        }
        Ok(self.peeked)
    }
    /// Whether `b` is stripped under `policy`
    fn stripped(policy: WhitespacePolicy, b: u8) -> bool {
        match policy {
            WhitespacePolicy::Separators => {
                matches!(b, b' ' | b'\t' | b',' | b'\r' | b'\n')
            }
            WhitespacePolicy::NonSemantic => {
                !(b.is_ascii_alphanumeric() || matches!(b, b'(' | b')' | b';' | b'-'))
            }
            WhitespacePolicy::Nothing => false,
        }
    }
    /// Get the next token byte under `ws`, honoring `eof`
    pub fn next_token(&mut self, ws: WhitespacePolicy, eof: EofPolicy) -> CifResult<Option<u8>> {
        loop {
            match self.next_raw()? {
                None => {
                    return match eof {
                        EofPolicy::Soft => Ok(None),
                        EofPolicy::Hard => self.fail("unexpected end of file"),
                    }
                }
                Some(b) if Self::stripped(ws, b) => continue,
                Some(b) => return Ok(Some(b)),
            }
        }
    }
    /// Peek the next token byte under `ws` without consuming it
    pub fn peek_token(&mut self, ws: WhitespacePolicy) -> CifResult<Option<u8>> {
        loop {
            match self.peek_raw()? {
                None => return Ok(None),
                Some(b) if Self::stripped(ws, b) => {
                    self.next_raw()?;
                }
                Some(b) => return Ok(Some(b)),
            }
        }
    }
    /// Read a signed decimal integer, skipping leading separators
    pub fn read_integer(&mut self) -> CifResult<Int> {
        match self.read_integer_opt()? {
            Some(v) => Ok(v),
            None => self.fail("expected an integer"),
        }
    }
    /// Read a signed decimal integer if one is next, else `None`
    pub fn read_integer_opt(&mut self) -> CifResult<Option<Int>> {
        let first = match self.peek_token(WhitespacePolicy::Separators)? {
            Some(b) if b == b'-' || b.is_ascii_digit() => b,
            _ => return Ok(None),
        };
        self.next_raw()?;
        let negative = first == b'-';
        let mut value: Int = if negative { 0 } else { (first - b'0') as Int };
        let mut digits = !negative;
        while let Some(b) = self.peek_raw()? {
            if !b.is_ascii_digit() {
                break;
            }
            self.next_raw()?;
            value = value * 10 + (b - b'0') as Int;
            digits = true;
        }
        if !digits {
            return self.fail("sign without digits");
        }
        Ok(Some(if negative { -value } else { value }))
    }
    /// Read an (x, y) coordinate pair
    pub fn read_point(&mut self) -> CifResult<(Int, Int)> {
        let x = self.read_integer()?;
        let y = self.read_integer()?;
        Ok((x, y))
    }
    /// Read a comma/blank-delimited integer run, stopping at the first non-integer
    pub fn read_array(&mut self) -> CifResult<Vec<Int>> {
        let mut values = Vec::new();
        while let Some(v) = self.read_integer_opt()? {
            values.push(v);
        }
        Ok(values)
    }
    /// Read extension text up to an unescaped `;`, consuming the terminator.
    /// A backslash-escaped `;` is a literal semicolon, not a terminator.
    pub fn read_extension_text(&mut self) -> CifResult<String> {
        // Strip leading separators
        self.peek_token(WhitespacePolicy::Separators)?;
        let mut bytes = Vec::new();
        loop {
            match self.next_raw()? {
                None => return self.fail("unterminated extension text"),
                Some(b';') => break,
                Some(b'\\') => match self.next_raw()? {
                    Some(b';') => bytes.push(b';'),
                    Some(b'\\') => bytes.push(b'\\'),
                    Some(other) => {
                        bytes.push(b'\\');
                        bytes.push(other);
                    }
                    None => return self.fail("unterminated extension text"),
                },
                Some(b) => bytes.push(b),
            }
        }
        let text = std::str::from_utf8(&bytes)?.trim_end().to_string();
        Ok(text)
    }
    /// Read a name token: a run of non-separator, non-semicolon bytes.
    /// The terminator is left unconsumed.
    pub fn read_name_token(&mut self) -> CifResult<String> {
        match self.peek_token(WhitespacePolicy::Separators)? {
            None => return self.fail("expected a name"),
            Some(b';') => return self.fail("expected a name before `;`"),
            Some(_) => (),
        }
        let mut bytes = Vec::new();
        while let Some(b) = self.peek_raw()? {
            if matches!(b, b' ' | b'\t' | b',' | b'\r' | b'\n' | b';' | b'(' | b')') {
                break;
            }
            self.next_raw()?;
            bytes.push(b);
        }
        Ok(std::str::from_utf8(&bytes)?.to_string())
    }
    /// Read a double-quoted string, the opening quote already consumed
    fn read_quoted(&mut self) -> CifResult<String> {
        let mut bytes = Vec::new();
        loop {
            match self.next_raw()? {
                None => return self.fail("unterminated quoted string"),
                Some(b'"') => break,
                Some(b) => bytes.push(b),
            }
        }
        Ok(std::str::from_utf8(&bytes)?.to_string())
    }
    /// Consume a comment body after its opening paren, honoring nesting.
    /// Returns the inner text.
    pub fn read_comment(&mut self) -> CifResult<String> {
        let mut depth = 1usize;
        let mut bytes = Vec::new();
        loop {
            match self.next_raw()? {
                None => return self.fail("unterminated comment"),
                Some(b'(') => {
                    depth += 1;
                    bytes.push(b'(');
                }
                Some(b')') => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    bytes.push(b')');
                }
                Some(b) => bytes.push(b),
            }
        }
        Ok(String::from_utf8_lossy(&bytes).trim().to_string())
    }
    /// Require the next token to be the record terminator `;`
    pub fn expect_semi(&mut self) -> CifResult<()> {
        match self.next_token(WhitespacePolicy::Separators, EofPolicy::Hard)? {
            Some(b';') => Ok(()),
            Some(b) => self.fail(format!("expected `;`, found `{}`", b as char)),
            None => self.fail("expected `;`"),
        }
    }
    /// Error-generation helper: capture the line number and trailing context
    pub fn err(&self, msg: impl Into<String>) -> CifError {
        CifError::Syntax {
            msg: msg.into(),
            line: self.line,
            context: String::from_utf8_lossy(&self.trail.iter().copied().collect::<Vec<u8>>())
                .to_string(),
        }
    }
    /// Return failure
    pub fn fail<T>(&self, msg: impl Into<String>) -> CifResult<T> {
        Err(self.err(msg))
    }
}

/// # Parser Event
///
/// The abstract event stream both backends consume. Coordinates carried
/// by events are already scaled.
#[derive(Debug, Clone, PartialEq)]
pub enum CifEvent {
    /// A symbol definition opened
    SymbolBegin {
        key: SymbolKey,
        mode: CifMode,
        number: u32,
        offset: u64,
    },
    /// The open symbol was bound to a name
    SymbolNamed { key: SymbolKey, name: String },
    /// The current layer changed
    Layer(LayerDescriptor),
    /// A geometric primitive inside the open symbol
    Shape(CifShape),
    /// An instance reference inside the open symbol
    Instance {
        target: SymbolKey,
        ticket: TicketId,
        placement: CifPlacement,
        array: Option<ArraySpec>,
    },
    /// An out-of-band property record
    Property(CifProperty),
    /// The open symbol definition closed
    SymbolEnd { key: SymbolKey },
    /// A mode section ended
    SectionEnd(CifMode),
    /// The file ended
    End,
}

/// # CifParser
///
/// Pulls records from a [CifReader] and yields [CifEvent]s, maintaining
/// the per-mode symbol tables and scale contexts and the shared ticket
/// table along the way. Drives both the discovery pass and the content
/// pass; [CifParser::restart] rewinds between them without discarding the
/// symbol tables.
pub struct CifParser<R: Read + Seek> {
    rdr: CifReader<R>,
    opts: CifReadOptions,
    /// Shared placement-interning table
    pub tickets: TicketTable,
    /// Symbol tables, indexed by mode
    tables: [SymbolTable; 2],
    /// Scale contexts, indexed by mode
    scales: [ScaleContext; 2],
    mode: CifMode,
    /// True between sections and outside symbol definitions
    in_root: bool,
    done: bool,
    ended: bool,
    warnings: Vec<CifWarning>,
}
impl<R: Read + Seek> CifParser<R> {
    /// Create a new [CifParser] over `src`
    pub fn new(src: R, opts: CifReadOptions) -> CifResult<Self> {
        let mut scales = [
            ScaleContext::new(CifMode::Phys),
            ScaleContext::new(CifMode::Elec),
        ];
        for scale in scales.iter_mut() {
            scale.set_external_scale(opts.external_scale);
            scale.set_library_exempt(opts.library_mode);
        }
        Ok(Self {
            rdr: CifReader::new(src),
            opts,
            tickets: TicketTable::new(),
            tables: [
                SymbolTable::new(CifMode::Phys),
                SymbolTable::new(CifMode::Elec),
            ],
            scales,
            mode: CifMode::Phys,
            in_root: true,
            done: false,
            ended: false,
            warnings: Vec::new(),
        })
    }
    /// Install the progress/cancel callback
    pub fn set_progress(&mut self, hook: ProgressHook) {
        self.rdr.set_progress(hook);
    }
    /// The symbol table for `mode`
    pub fn table(&self, mode: CifMode) -> &SymbolTable {
        &self.tables[mode as usize]
    }
    /// The mutable symbol table for `mode`
    pub fn table_mut(&mut self, mode: CifMode) -> &mut SymbolTable {
        &mut self.tables[mode as usize]
    }
    /// The scale context for `mode`
    pub fn scale(&self, mode: CifMode) -> &ScaleContext {
        &self.scales[mode as usize]
    }
    /// The current mode
    pub fn mode(&self) -> CifMode {
        self.mode
    }
    /// Count of raw reads issued to the source
    pub fn read_calls(&self) -> u64 {
        self.rdr.read_calls()
    }
    /// Take the warnings accumulated so far
    pub fn take_warnings(&mut self) -> Vec<CifWarning> {
        std::mem::take(&mut self.warnings)
    }
    /// Rewind for another pass over the same file. Symbol tables survive
    /// (offsets, names, numbers); per-pass state resets.
    pub fn restart(&mut self) -> CifResult<()> {
        self.rdr.seek(0)?;
        self.mode = CifMode::Phys;
        self.in_root = true;
        self.done = false;
        self.ended = false;
        for table in self.tables.iter_mut() {
            table.begin_pass();
        }
        let mut scales = [
            ScaleContext::new(CifMode::Phys),
            ScaleContext::new(CifMode::Elec),
        ];
        for scale in scales.iter_mut() {
            scale.set_external_scale(self.opts.external_scale);
            scale.set_library_exempt(self.opts.library_mode);
        }
        self.scales = scales;
        Ok(())
    }
    /// Run a full discovery pass: consume every event, populating the
    /// symbol tables with names, numbers, offsets, and cref lists.
    pub fn scan(&mut self) -> CifResult<()> {
        while let Some(event) = self.next_event()? {
            if event == CifEvent::End {
                break;
            }
        }
        Ok(())
    }
    /// Pull the next [CifEvent], or `None` once the stream is exhausted.
    pub fn next_event(&mut self) -> CifResult<Option<CifEvent>> {
        if self.done {
            if self.ended {
                return Ok(None);
            }
            self.ended = true;
            let mut warnings = Vec::new();
            for table in self.tables.iter_mut() {
                warnings.extend(table.resolve_placeholders());
            }
            for w in warnings.iter() {
                warn!("{}", w);
            }
            self.warnings.extend(warnings);
            return Ok(Some(CifEvent::End));
        }
        loop {
            // Between sections and records, end-of-file is soft only at the
            // root: an absent second mode section is legal, a truncated
            // symbol body is not.
            let eof = if self.in_root {
                EofPolicy::Soft
            } else {
                EofPolicy::Hard
            };
            let tok = match self.rdr.next_token(WhitespacePolicy::NonSemantic, eof)? {
                Some(tok) => tok,
                None => {
                    self.done = true;
                    return self.next_event();
                }
            };
            match tok {
                b'(' => {
                    if let Some(event) = self.handle_comment()? {
                        return Ok(Some(event));
                    }
                }
                b'D' => return self.handle_definition().map(Some),
                b'C' => {
                    if let Some(event) = self.handle_call()? {
                        return Ok(Some(event));
                    }
                }
                b'B' => {
                    if let Some(event) = self.handle_box()? {
                        return Ok(Some(event));
                    }
                }
                b'P' => {
                    if let Some(event) = self.handle_polygon()? {
                        return Ok(Some(event));
                    }
                }
                b'W' => {
                    if let Some(event) = self.handle_wire()? {
                        return Ok(Some(event));
                    }
                }
                b'L' => {
                    if let Some(event) = self.handle_layer()? {
                        return Ok(Some(event));
                    }
                }
                b'9' => {
                    if let Some(event) = self.handle_nine()? {
                        return Ok(Some(event));
                    }
                }
                b'5' => {
                    let id = self.rdr.read_integer()?;
                    let payload = self.rdr.read_extension_text()?;
                    if id < 0 {
                        return self.rdr.fail("negative property id");
                    }
                    return Ok(Some(CifEvent::Property(CifProperty::new(
                        id as u32, payload,
                    ))));
                }
                // Remaining single-digit user extensions: skipped, tolerated
                b'0'..=b'8' => {
                    let body = self.rdr.read_extension_text()?;
                    debug!("skipping user extension {}: `{}`", tok as char, body);
                }
                b'E' => {
                    if !self.in_root {
                        return Err(CifError::Structural {
                            msg: "section end inside a symbol definition".to_string(),
                        });
                    }
                    let ending = self.mode;
                    match self.mode {
                        CifMode::Phys => self.mode = CifMode::Elec,
                        CifMode::Elec => self.done = true,
                    }
                    return Ok(Some(CifEvent::SectionEnd(ending)));
                }
                other => {
                    return self
                        .rdr
                        .fail(format!("unrecognized record key `{}`", other as char))
                }
            }
        }
    }
    /// Handle a comment body: resolution directives and the comment-wrapped
    /// name dialects; everything else is discarded.
    fn handle_comment(&mut self) -> CifResult<Option<CifEvent>> {
        let body = self.rdr.read_comment()?;
        // Comments are commands in their own right; eat a trailing `;` if present
        if self.rdr.peek_token(WhitespacePolicy::Separators)? == Some(b';') {
            self.rdr.next_token(WhitespacePolicy::Separators, EofPolicy::Soft)?;
        }
        if let Some(rest) = body.strip_prefix("RESOLUTION") {
            let value: Int = match rest.trim().parse() {
                Ok(v) => v,
                Err(_) => {
                    let warning = CifWarning::Resolution {
                        msg: format!("unparseable resolution directive `{}`", body),
                    };
                    warn!("{}", warning);
                    self.warnings.push(warning);
                    return Ok(None);
                }
            };
            if let Some(warning) = self.scales[self.mode as usize].set_resolution(value) {
                warn!("{}", warning);
                self.warnings.push(warning);
            }
            return Ok(None);
        }
        // Comment-wrapped name dialects bind the open symbol's name
        let open = self.tables[self.mode as usize].open_symbol();
        let name = match self.opts.name_style {
            NameStyle::Icarus => body.strip_prefix('9').map(|s| s.trim().to_string()),
            NameStyle::Sif if !body.contains(char::is_whitespace) && !body.is_empty() => {
                Some(body.clone())
            }
            _ => None,
        };
        if let (Some(key), Some(name)) = (open, name) {
            let name = self.alias_cell(&name);
            self.tables[self.mode as usize].bind_name(key, &name)?;
            return Ok(Some(CifEvent::SymbolNamed { key, name }));
        }
        Ok(None)
    }
    /// Handle `DS`/`DF` definition delimiters
    fn handle_definition(&mut self) -> CifResult<CifEvent> {
        let offset = self.rdr.tell() - 1; // offset of the `D` byte itself
        match self.rdr.next_token(WhitespacePolicy::Separators, EofPolicy::Hard)? {
            Some(b'S') => {
                let number = self.rdr.read_integer()?;
                if number < 0 {
                    return self.rdr.fail("negative symbol number");
                }
                let a = self.rdr.read_integer_opt()?.unwrap_or(1);
                let b = self.rdr.read_integer_opt()?.unwrap_or(1);
                self.rdr.expect_semi()?;
                self.scales[self.mode as usize].set_symbol_ratio(a, b);
                let table = &mut self.tables[self.mode as usize];
                let key = table.get_or_create(None, Some(number as u32))?;
                table.mark_defined(key, offset)?;
                self.in_root = false;
                Ok(CifEvent::SymbolBegin {
                    key,
                    mode: self.mode,
                    number: number as u32,
                    offset,
                })
            }
            Some(b'F') => {
                self.rdr.expect_semi()?;
                let key = self.tables[self.mode as usize].close_definition()?;
                self.scales[self.mode as usize].reset_symbol_ratio();
                self.in_root = true;
                Ok(CifEvent::SymbolEnd { key })
            }
            Some(other) => self
                .rdr
                .fail(format!("expected DS or DF, found D{}", other as char)),
            None => self.rdr.fail("expected DS or DF"),
        }
    }
    /// Handle a `C` call record: target number plus a transform token list
    fn handle_call(&mut self) -> CifResult<Option<CifEvent>> {
        let number = self.rdr.read_integer()?;
        if number < 0 {
            return self.rdr.fail("negative symbol number in call");
        }
        let scale = self.scales[self.mode as usize].clone();
        let mut placement = CifPlacement::default();
        let mut array: Option<ArraySpec> = None;
        loop {
            match self.rdr.next_token(WhitespacePolicy::Separators, EofPolicy::Hard)? {
                Some(b';') => break,
                Some(b'T') => {
                    let (x, y) = self.rdr.read_point()?;
                    apply_translate(
                        &mut placement,
                        scale.scale_placement(x),
                        scale.scale_placement(y),
                    );
                }
                Some(b'R') => {
                    let (dx, dy) = self.rdr.read_point()?;
                    if dx == 0 && dy == 0 {
                        return self.rdr.fail("zero rotation direction");
                    }
                    apply_rotate(&mut placement, Point::new(dx, dy));
                }
                Some(b'M') => match self
                    .rdr
                    .next_token(WhitespacePolicy::Separators, EofPolicy::Hard)?
                {
                    Some(b'X') => apply_mirror_x(&mut placement),
                    Some(b'Y') => apply_mirror_y(&mut placement),
                    _ => return self.rdr.fail("expected MX or MY"),
                },
                Some(b'S') => {
                    let (a, b) = self.rdr.read_point()?;
                    if a <= 0 || b <= 0 {
                        return self.rdr.fail("non-positive magnification ratio");
                    }
                    apply_magnify(&mut placement, a, b);
                }
                Some(b'A') => {
                    let nx = self.rdr.read_integer()?;
                    let ny = self.rdr.read_integer()?;
                    let (px, py) = self.rdr.read_point()?;
                    if nx <= 0 || ny <= 0 {
                        return self.rdr.fail("non-positive array count");
                    }
                    array = Some(ArraySpec {
                        nx,
                        ny,
                        px: scale.scale_placement(px),
                        py: scale.scale_placement(py),
                    });
                }
                Some(other) => {
                    return self
                        .rdr
                        .fail(format!("unrecognized transform token `{}`", other as char))
                }
                None => return self.rdr.fail("unterminated call record"),
            }
        }
        let table = &mut self.tables[self.mode as usize];
        let target = table.get_or_create(None, Some(number as u32))?;
        let owner = table.open_symbol();
        match owner {
            Some(owner) => {
                let ticket = self.tickets.intern(&placement);
                table.append_cref(owner, target, ticket, placement.origin, array)?;
                Ok(Some(CifEvent::Instance {
                    target,
                    ticket,
                    placement,
                    array,
                }))
            }
            None => {
                // Root-level objects are ignored beyond offset bookkeeping
                debug!("ignoring root-level call of symbol {}", number);
                Ok(None)
            }
        }
    }
    /// Handle a `B` box record
    fn handle_box(&mut self) -> CifResult<Option<CifEvent>> {
        let line = self.rdr.line();
        let width = self.rdr.read_integer()?;
        let height = self.rdr.read_integer()?;
        let (x, y) = self.rdr.read_point()?;
        let dx = self.rdr.read_integer_opt()?;
        let direction = match dx {
            Some(dx) => Some(Point::new(dx, self.rdr.read_integer()?)),
            None => None,
        };
        self.rdr.expect_semi()?;
        if self.in_root {
            return Ok(None);
        }
        if width <= 0 || height <= 0 {
            self.push_geometry_warning(format!("box with non-positive size {}x{}", width, height), line);
            return Ok(None);
        }
        let scale = &self.scales[self.mode as usize];
        let b = CifBox::from_center(
            scale.scale(width),
            scale.scale(height),
            Point::new(scale.scale(x), scale.scale(y)),
        );
        let shape = match direction {
            None => CifShape::CifBox(b),
            Some(dir) if dir.x == 0 && dir.y == 0 => {
                self.push_geometry_warning("box with zero direction vector".to_string(), line);
                return Ok(None);
            }
            // Manhattan directions stay boxes: a y-axis direction swaps the extents
            Some(dir) if dir.y == 0 => CifShape::CifBox(b),
            Some(dir) if dir.x == 0 => {
                let (w, h) = b.size();
                CifShape::CifBox(CifBox::from_center(h, w, b.center()))
            }
            Some(dir) => CifShape::Polygon(b.to_rotated_polygon(&dir)),
        };
        Ok(Some(CifEvent::Shape(shape)))
    }
    /// Handle a `P` polygon record
    fn handle_polygon(&mut self) -> CifResult<Option<CifEvent>> {
        let line = self.rdr.line();
        let coords = self.rdr.read_array()?;
        self.rdr.expect_semi()?;
        if self.in_root {
            return Ok(None);
        }
        if coords.len() % 2 != 0 {
            return self.rdr.fail("polygon with a dangling coordinate");
        }
        let scale = &self.scales[self.mode as usize];
        let points: Vec<Point> = coords
            .chunks(2)
            .map(|c| Point::new(scale.scale(c[0]), scale.scale(c[1])))
            .collect();
        if points.len() < 3 {
            self.push_geometry_warning(
                format!("polygon with only {} points", points.len()),
                line,
            );
            return Ok(None);
        }
        let poly = Polygon::new(points);
        if poly.is_degenerate() {
            self.push_geometry_warning("zero-area polygon".to_string(), line);
            return Ok(None);
        }
        if poly.is_self_intersecting() {
            self.push_geometry_warning("self-intersecting polygon".to_string(), line);
            return Ok(None);
        }
        Ok(Some(CifEvent::Shape(CifShape::Polygon(poly))))
    }
    /// Handle a `W` wire record, with its optional end-style digit
    fn handle_wire(&mut self) -> CifResult<Option<CifEvent>> {
        let line = self.rdr.line();
        // The style digit abuts the W directly: `W0`, `W1`, `W2`
        let style = match self.rdr.peek_raw()? {
            Some(b @ b'0'..=b'2') => {
                self.rdr.next_raw()?;
                num_traits::FromPrimitive::from_u8(b - b'0')
                    .unwrap_or_else(crate::geom::EndStyle::default)
            }
            _ => crate::geom::EndStyle::default(),
        };
        let width = self.rdr.read_integer()?;
        let coords = self.rdr.read_array()?;
        self.rdr.expect_semi()?;
        if self.in_root {
            return Ok(None);
        }
        if coords.len() % 2 != 0 {
            return self.rdr.fail("wire with a dangling coordinate");
        }
        let scale = &self.scales[self.mode as usize];
        let points: Vec<Point> = coords
            .chunks(2)
            .map(|c| Point::new(scale.scale(c[0]), scale.scale(c[1])))
            .collect();
        if width <= 0 {
            self.push_geometry_warning(format!("wire with width {}", width), line);
            return Ok(None);
        }
        if points.len() < 2 {
            self.push_geometry_warning("wire with fewer than two points".to_string(), line);
            return Ok(None);
        }
        let wire = Wire::new(scale.scale(width), style, points);
        Ok(Some(CifEvent::Shape(CifShape::Wire(wire))))
    }
    /// Handle an `L` layer record
    fn handle_layer(&mut self) -> CifResult<Option<CifEvent>> {
        let desc = match self.rdr.peek_token(WhitespacePolicy::Separators)? {
            Some(b) if b.is_ascii_digit() => {
                let index = self.rdr.read_integer()?;
                if index < 0 || index > u16::MAX as Int {
                    return self.rdr.fail("layer index out of range");
                }
                LayerDescriptor::indexed(index as u16, self.mode)
            }
            _ => {
                let name = self.rdr.read_name_token()?;
                let name = self.alias_layer(&name);
                LayerDescriptor::named(name, self.mode)
            }
        };
        self.rdr.expect_semi()?;
        Ok(Some(CifEvent::Layer(desc)))
    }
    /// Handle the `9`-family extension records: symbol names and labels
    fn handle_nine(&mut self) -> CifResult<Option<CifEvent>> {
        match self.rdr.peek_raw()? {
            // Two-digit extension: 91 instance name, 94 label, rest skipped
            Some(b'4') => {
                self.rdr.next_raw()?;
                self.handle_label()
            }
            Some(b'1') => {
                self.rdr.next_raw()?;
                let name = self.rdr.read_extension_text()?;
                // Instance names ride the property channel to the next entity
                Ok(Some(CifEvent::Property(CifProperty::new(91, name))))
            }
            Some(b) if b.is_ascii_digit() => {
                self.rdr.next_raw()?;
                let body = self.rdr.read_extension_text()?;
                debug!("skipping extension 9{}: `{}`", b as char, body);
                Ok(None)
            }
            // Bare `9 name;` symbol-name record
            _ => {
                let name = self.rdr.read_extension_text()?;
                if name.is_empty() {
                    return self.rdr.fail("empty symbol name record");
                }
                let name = self.alias_cell(&name);
                let table = &mut self.tables[self.mode as usize];
                match table.open_symbol() {
                    Some(key) => {
                        table.bind_name(key, &name)?;
                        Ok(Some(CifEvent::SymbolNamed { key, name }))
                    }
                    None => {
                        debug!("ignoring root-level name record `{}`", name);
                        Ok(None)
                    }
                }
            }
        }
    }
    /// Handle a `94` label record per the configured label dialect
    fn handle_label(&mut self) -> CifResult<Option<CifEvent>> {
        let line = self.rdr.line();
        let text = match self.rdr.peek_token(WhitespacePolicy::Separators)? {
            Some(b'"') => {
                self.rdr.next_raw()?;
                self.rdr.read_quoted()?
            }
            _ => self.rdr.read_name_token()?,
        };
        let x = self.rdr.read_integer()?;
        let y = self.rdr.read_integer()?;
        let orient = self.rdr.read_integer_opt()?;
        let width = match orient {
            Some(_) => self.rdr.read_integer_opt()?,
            None => None,
        };
        let height = match width {
            Some(_) => Some(self.rdr.read_integer()?),
            None => None,
        };
        self.rdr.expect_semi()?;
        if self.in_root {
            return Ok(None);
        }
        let orient = match orient.unwrap_or(0) {
            code @ 0..=7 => code as u8,
            code => {
                self.push_geometry_warning(
                    format!("label orientation code {} out of range", code),
                    line,
                );
                0
            }
        };
        let scale = &self.scales[self.mode as usize];
        let label = Label {
            text,
            loc: Point::new(scale.scale(x), scale.scale(y)),
            orient,
            width: width.map(|w| scale.scale(w)),
            height: height.map(|h| scale.scale(h)),
        };
        Ok(Some(CifEvent::Shape(CifShape::Label(label))))
    }
    /// Re-enter the parser at one symbol's recorded definition offset,
    /// collecting that body's events. The digest layer's entry point.
    pub fn parse_symbol_at(&mut self, key: SymbolKey, mode: CifMode) -> CifResult<Vec<CifEvent>> {
        let (offset, number) = match self.tables[mode as usize].get(key) {
            Some(sym) if sym.offset != 0 && sym.defined => (sym.offset, sym.number),
            Some(sym) => {
                return Err(CifError::Structural {
                    msg: format!(
                        "symbol `{}` has no recorded definition offset; run a discovery pass first",
                        sym.display_name()
                    ),
                })
            }
            None => {
                return Err(CifError::Structural {
                    msg: "digest re-parse of a dangling symbol handle".to_string(),
                })
            }
        };
        self.rdr.seek(offset)?;
        self.mode = mode;
        self.in_root = true;
        self.done = false;
        self.ended = false;
        self.tables[mode as usize].begin_pass();
        let mut events = Vec::new();
        let first = match self.next_event()? {
            Some(event @ CifEvent::SymbolBegin { .. }) => event,
            _ => {
                return Err(CifError::Structural {
                    msg: "recorded offset does not point at a symbol definition".to_string(),
                })
            }
        };
        let matches_target =
            matches!(&first, CifEvent::SymbolBegin { number: n, .. } if Some(*n) == number);
        if !matches_target {
            return Err(CifError::Structural {
                msg: "recorded offset points at a different symbol".to_string(),
            });
        }
        events.push(first);
        loop {
            match self.next_event()? {
                Some(event @ CifEvent::SymbolEnd { .. }) => {
                    events.push(event);
                    break;
                }
                Some(CifEvent::SectionEnd(_)) | Some(CifEvent::End) | None => {
                    return Err(CifError::Structural {
                        msg: "symbol body ran past the end of its section".to_string(),
                    })
                }
                Some(event) => events.push(event),
            }
        }
        self.tables[mode as usize].verify_cref_tail(key)?;
        Ok(events)
    }
    /// Apply the cell alias table
    fn alias_cell(&self, name: &str) -> String {
        self.opts
            .cell_aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }
    /// Apply the layer alias table, when enabled
    fn alias_layer(&self, name: &str) -> String {
        if !self.opts.allow_layer_mapping {
            return name.to_string();
        }
        self.opts
            .layer_aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }
    /// Log and record a recoverable geometry warning
    fn push_geometry_warning(&mut self, msg: String, line: usize) {
        let warning = CifWarning::Geometry { msg, line };
        warn!("{}", warning);
        self.warnings.push(warning);
    }
}

// Placement-composition helpers. Each applies one transform token *after*
// the placement accumulated so far, maintaining the canonical
// mirror-rotate-magnify-translate decomposition.
fn apply_translate(p: &mut CifPlacement, x: Int, y: Int) {
    p.origin.x += x;
    p.origin.y += y;
}
fn apply_mirror_y(p: &mut CifPlacement) {
    p.origin.y = -p.origin.y;
    p.axis.y = -p.axis.y;
    p.mirror_y = !p.mirror_y;
}
fn apply_mirror_x(p: &mut CifPlacement) {
    // MX is MY composed with a half-turn
    apply_rotate(p, Point::new(-1, 0));
    apply_mirror_y(p);
}
fn apply_rotate(p: &mut CifPlacement, r: Point) {
    // Axis vectors stay small: reduce common factors. Origins do not.
    let axis = rotate_vec(&p.axis, &r);
    let (ax, ay) = reduce(axis.x, axis.y);
    p.axis = if axis.x != 0 || axis.y != 0 {
        Point::new(ax, ay)
    } else {
        axis
    };
    p.origin = rotate_vec(&p.origin, &r);
}
fn apply_magnify(p: &mut CifPlacement, a: Int, b: Int) {
    let (num, den) = reduce(p.mag.0 * a, p.mag.1 * b);
    p.mag = (num, den);
    p.origin.x = (p.origin.x as f64 * a as f64 / b as f64).round() as Int;
    p.origin.y = (p.origin.y as f64 * a as f64 / b as f64).round() as Int;
}
/// Rotate `v` by the direction of `r`, in floating point, rounded
fn rotate_vec(v: &Point, r: &Point) -> Point {
    let len = ((r.x * r.x + r.y * r.y) as f64).sqrt();
    if len == 0.0 {
        return *v;
    }
    let (cos, sin) = (r.x as f64 / len, r.y as f64 / len);
    Point::new(
        (v.x as f64 * cos - v.y as f64 * sin).round() as Int,
        (v.x as f64 * sin + v.y as f64 * cos).round() as Int,
    )
}
/// Reduce a pair by its greatest common divisor
fn reduce(a: Int, b: Int) -> (Int, Int) {
    fn gcd(mut a: Int, mut b: Int) -> Int {
        while b != 0 {
            let t = b;
            b = a % b;
            a = t;
        }
        a.abs()
    }
    let g = gcd(a, b);
    if g <= 1 {
        (a, b)
    } else {
        (a / g, b / g)
    }
}

/// # Read Statistics
///
/// Counts accumulated over one materialization, returned alongside the library.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadStats {
    /// Symbol definitions materialized
    pub symbols: usize,
    /// Geometric primitives kept
    pub shapes: usize,
    /// Instance references kept
    pub instances: usize,
    /// Property records attached
    pub properties: usize,
    /// Recoverable warnings observed
    pub warnings: usize,
}

/// Working state for one open symbol's content
struct OpenCell {
    key: SymbolKey,
    mode: CifMode,
    elements: Vec<CifElement>,
    instances: Vec<(SymbolKey, CifPlacement, Option<ArraySpec>, Vec<CifProperty>)>,
    properties: Vec<CifProperty>,
}

/// # CifImporter
///
/// The materialization backend: consumes the parser's event stream and
/// builds cells through an abstract [DatabaseSink], handling the
/// duplicate-definition policy, deferred instance-target resolution, and
/// the post-pass fix-ups.
pub struct CifImporter<'a, S: DatabaseSink> {
    sink: &'a mut S,
    opts: CifReadOptions,
    registry: PropertyRegistry,
    /// Current layer: ambient state persisting across symbol boundaries
    current_layer: Option<LayerDescriptor>,
    /// Bodies finished this section, materialized at section end
    finished: Vec<OpenCell>,
    open: Option<OpenCell>,
    /// Per-cell-name overwrite decisions, remembered for the companion mode
    merge_memory: HashMap<String, bool>,
    merge_hook: Option<MergeHook>,
    warnings: Vec<CifWarning>,
    stats: ReadStats,
}
impl<'a, S: DatabaseSink> CifImporter<'a, S> {
    /// Create a new importer targeting `sink`
    pub fn new(sink: &'a mut S, opts: CifReadOptions) -> Self {
        Self {
            sink,
            opts,
            registry: PropertyRegistry::new(),
            current_layer: None,
            finished: Vec::new(),
            open: None,
            merge_memory: HashMap::new(),
            merge_hook: None,
            warnings: Vec::new(),
            stats: ReadStats::default(),
        }
    }
    /// Install the [MergePolicy::Ask] callback
    pub fn set_merge_hook(&mut self, hook: MergeHook) {
        self.merge_hook = Some(hook);
    }
    /// The warnings accumulated by this import
    pub fn warnings(&self) -> &[CifWarning] {
        &self.warnings
    }
    /// Drive `parser` to completion, materializing everything through the sink
    pub fn import<R: Read + Seek>(&mut self, parser: &mut CifParser<R>) -> CifResult<ReadStats> {
        loop {
            let event = match parser.next_event()? {
                Some(event) => event,
                None => break,
            };
            match event {
                CifEvent::SymbolBegin { key, mode, .. } => {
                    self.open = Some(OpenCell {
                        key,
                        mode,
                        elements: Vec::new(),
                        instances: Vec::new(),
                        properties: Vec::new(),
                    });
                }
                CifEvent::SymbolNamed { .. } => (),
                CifEvent::Layer(desc) => {
                    self.sink.ensure_layer(&desc)?;
                    self.current_layer = Some(desc);
                }
                CifEvent::Shape(shape) => {
                    let props = self.registry.take_pending();
                    let layer = match self.current_layer.clone() {
                        Some(layer) => layer,
                        None => {
                            let warning = CifWarning::Geometry {
                                msg: "geometry before any layer selection; dropped".to_string(),
                                line: 0,
                            };
                            warn!("{}", warning);
                            self.warnings.push(warning);
                            continue;
                        }
                    };
                    if let Some(open) = self.open.as_mut() {
                        open.elements.push(CifElement {
                            layer,
                            shape,
                            properties: props,
                        });
                        self.stats.shapes += 1;
                        self.stats.properties += open
                            .elements
                            .last()
                            .map(|e| e.properties.len())
                            .unwrap_or(0);
                    }
                }
                CifEvent::Instance {
                    target,
                    placement,
                    array,
                    ..
                } => {
                    let props = self.registry.take_pending();
                    if let Some(open) = self.open.as_mut() {
                        self.stats.properties += props.len();
                        open.instances.push((target, placement, array, props));
                        self.stats.instances += 1;
                    }
                }
                CifEvent::Property(prop) => {
                    self.registry.queue(prop.id, prop.payload);
                }
                CifEvent::SymbolEnd { .. } => {
                    if let Some(mut open) = self.open.take() {
                        open.properties = self.registry.take_pending();
                        self.stats.properties += open.properties.len();
                        self.finished.push(open);
                    }
                }
                CifEvent::SectionEnd(_) => {
                    // Root-level property records have no owner; a take here
                    // is the leak check.
                    if !self.registry.is_empty() {
                        let leaked = self.registry.take_pending();
                        let warning = CifWarning::Property {
                            msg: format!("{} property records with no owning object", leaked.len()),
                        };
                        warn!("{}", warning);
                        self.warnings.push(warning);
                    }
                    self.materialize_finished(parser)?;
                }
                CifEvent::End => {
                    // Files missing their section terminator still
                    // materialize what they finished
                    self.materialize_finished(parser)?;
                    self.warnings.extend(parser.take_warnings());
                    break;
                }
            }
        }
        self.stats.warnings = self.warnings.len();
        Ok(self.stats)
    }
    /// Materialize every finished symbol body, each against its own mode's table
    fn materialize_finished<R: Read + Seek>(
        &mut self,
        parser: &CifParser<R>,
    ) -> CifResult<()> {
        let bodies = std::mem::take(&mut self.finished);
        for body in bodies {
            let mode = body.mode;
            let name = match parser.table(mode).get(body.key) {
                Some(sym) => sym.display_name(),
                None => continue,
            };
            if !self.should_materialize(&name, mode)? {
                continue;
            }
            let cell = self.sink.create_cell(&name, mode)?;
            self.stats.symbols += 1;
            for mut element in body.elements {
                let props = std::mem::take(&mut element.properties);
                let handle = self.sink.add_element(cell, element)?;
                self.sink.attach_properties(handle, props)?;
            }
            for (target, placement, array, props) in body.instances {
                let target_name = match parser.table(mode).get(target) {
                    Some(sym) => sym.display_name(),
                    None => continue,
                };
                // Deferred-target resolution: unseen targets become unread
                // placeholder cells, overwritten if their definition arrives.
                if self.sink.find_cell(&target_name, mode).is_none() {
                    self.sink.create_placeholder(&target_name, mode)?;
                }
                let handle = self.sink.add_instance(
                    cell,
                    CifInstance {
                        cell_name: target_name,
                        placement,
                        array,
                        properties: Vec::new(),
                    },
                )?;
                self.sink.attach_properties(handle, props)?;
            }
            self.sink
                .attach_properties(EntityHandle::Cell(cell), body.properties)?;
            self.sink.finalize_cell(cell, None)?;
            self.post_check_cell(cell, &name)?;
        }
        Ok(())
    }
    /// Empty-cell detection at finalization
    fn post_check_cell(&mut self, key: CellKey, name: &str) -> CifResult<()> {
        if !self.sink.cell_is_empty(key) {
            return Ok(());
        }
        if self.opts.prune_empty {
            debug!("pruning empty cell `{}`", name);
            self.sink.remove_cell(key)?;
        } else {
            debug!("cell `{}` is empty", name);
        }
        Ok(())
    }
    /// The duplicate-definition policy, in priority order: unread
    /// placeholders always overwrite, sub-masters never do, everything
    /// else consults the merge policy with its per-name memory.
    fn should_materialize(&mut self, name: &str, mode: CifMode) -> CifResult<bool> {
        let existing = match self.sink.find_cell(name, mode) {
            Some(key) => key,
            None => return Ok(true),
        };
        let status = self.sink.cell_status(existing);
        if status.unread {
            return Ok(true);
        }
        if status.submaster {
            let warning = CifWarning::StructuralConflict {
                msg: format!(
                    "incoming definition of sub-master `{}` discarded",
                    name
                ),
            };
            warn!("{}", warning);
            self.warnings.push(warning);
            return Ok(false);
        }
        if let Some(decision) = self.merge_memory.get(name) {
            return Ok(*decision);
        }
        let overwrite = match self.opts.merge {
            MergePolicy::Overwrite => true,
            MergePolicy::Skip => false,
            MergePolicy::Ask => match self.merge_hook.as_mut() {
                Some(hook) => hook(name),
                None => true,
            },
        };
        // Remember per name, so the companion mode is not asked again
        self.merge_memory.insert(name.to_string(), overwrite);
        if !overwrite {
            let warning = CifWarning::StructuralConflict {
                msg: format!("duplicate definition of `{}` skipped", name),
            };
            warn!("{}", warning);
            self.warnings.push(warning);
        }
        Ok(overwrite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(src: &str) -> CifReader<Cursor<Vec<u8>>> {
        CifReader::new(Cursor::new(src.as_bytes().to_vec()))
    }
    #[test]
    fn it_lexes_integers() {
        let mut rdr = reader("  12, -34\n 56;");
        assert_eq!(rdr.read_integer().unwrap(), 12);
        assert_eq!(rdr.read_integer().unwrap(), -34);
        assert_eq!(rdr.read_integer().unwrap(), 56);
        assert!(rdr.read_integer_opt().unwrap().is_none());
        rdr.expect_semi().unwrap();
    }
    #[test]
    fn it_lexes_arrays() {
        let mut rdr = reader("1 2, 3 4 ;");
        assert_eq!(rdr.read_array().unwrap(), vec![1, 2, 3, 4]);
        rdr.expect_semi().unwrap();
    }
    #[test]
    fn extension_text_honors_escapes() {
        let mut rdr = reader(r"  label with \; inside;");
        assert_eq!(rdr.read_extension_text().unwrap(), "label with ; inside");
    }
    #[test]
    fn bad_integer_carries_context() {
        let mut rdr = reader("B ten;");
        rdr.next_token(WhitespacePolicy::Separators, EofPolicy::Hard)
            .unwrap();
        match rdr.read_integer() {
            Err(CifError::Syntax { line, context, .. }) => {
                assert_eq!(line, 1);
                assert!(context.contains('B'));
            }
            other => panic!("expected a syntax error, got {:?}", other),
        }
    }
    #[test]
    fn comments_nest() {
        let mut rdr = reader("( outer ( inner ) rest );X");
        assert_eq!(
            rdr.next_token(WhitespacePolicy::Separators, EofPolicy::Hard)
                .unwrap(),
            Some(b'(')
        );
        assert_eq!(rdr.read_comment().unwrap(), "outer ( inner ) rest");
        rdr.expect_semi().unwrap();
        assert_eq!(
            rdr.next_token(WhitespacePolicy::Separators, EofPolicy::Hard)
                .unwrap(),
            Some(b'X')
        );
    }
    #[test]
    fn soft_and_hard_eof() {
        let mut rdr = reader("  ");
        assert_eq!(
            rdr.next_token(WhitespacePolicy::Separators, EofPolicy::Soft)
                .unwrap(),
            None
        );
        let mut rdr = reader("  ");
        assert!(rdr
            .next_token(WhitespacePolicy::Separators, EofPolicy::Hard)
            .is_err());
    }
    #[test]
    fn placement_tokens_compose() {
        // `T 10 0` then `R 0 1`: the rotation also rotates the earlier translation
        let mut p = CifPlacement::default();
        apply_translate(&mut p, 10, 0);
        apply_rotate(&mut p, Point::new(0, 1));
        assert_eq!(p.origin, Point::new(0, 10));
        assert_eq!(p.axis, Point::new(0, 1));
        // while `R 0 1` then `T 10 0` leaves the translation untouched
        let mut q = CifPlacement::default();
        apply_rotate(&mut q, Point::new(0, 1));
        apply_translate(&mut q, 10, 0);
        assert_eq!(q.origin, Point::new(10, 0));
    }
    #[test]
    fn mirror_x_is_half_turn_mirror_y() {
        let mut p = CifPlacement::default();
        apply_mirror_x(&mut p);
        let t = p.to_transform();
        assert_eq!(Point::new(3, 4).transform(&t), Point::new(-3, 4));
    }
}
