//! The terminal state machine: decodes UTF-8 input incrementally and
//! interprets C0 controls, ESC sequences, CSI sequences, and OSC strings
//! against two screen buffers (primary + alternate).
//!
//! Ported from the original emulator's `Terminal`, whose state machine was
//! a chain of `stateFn` function values threading themselves through
//! closures (`csi()`, `osc()`, `captureString()` each returned a closure
//! capturing local accumulator variables). Here each state is a variant of
//! [`ParserState`] carrying its own accumulator, and `Terminal::put`
//! matches on it instead of calling through a function pointer — the same
//! machine, expressed as data instead of closures.

use std::collections::VecDeque;

use crate::cell::Cell;
use crate::errors::TerminalError;
use crate::grid::Grid;
use crate::sgr::SgrState;

const MAX_RECORDED_ERRORS: usize = 16;

/// Which screen buffer is live: 0 = primary (scrollback, reflow-on-resize),
/// 1 = alternate (no scrollback, chomp-on-resize).
const PRIMARY: usize = 0;
const ALTERNATE: usize = 1;

#[derive(Debug, Clone)]
enum ParserState {
    Normal,
    Esc,
    Csi {
        params: Vec<u32>,
        next_param: bool,
    },
    CsiGt,
    Osc {
        title: String,
        esc: bool,
    },
    /// Swallow the next `n` runes then resume in `Normal` — used for
    /// charset-designation sequences like `ESC ( B` that this emulator
    /// doesn't otherwise act on.
    Ignore {
        remaining: u32,
    },
    /// Capture runes until the String Terminator (`ESC \`), then discard
    /// them and resume in `Normal` — used for DCS (`ESC k`) strings this
    /// emulator doesn't interpret.
    CaptureUntilSt {
        esc: bool,
    },
}

/// An in-memory ANSI/xterm-subset terminal emulator.
#[derive(Debug)]
pub struct Terminal {
    screens: [Grid; 2],
    screen_target: usize,
    cstate: SgrState,
    state: ParserState,

    title: String,
    tab_size: usize,
    cell_update: u64,

    save_cursor: (usize, usize),
    /// (top, bottom) rows of the active scroll region, `bottom` exclusive.
    scroll_region: (usize, usize),

    /// Bytes of a UTF-8 sequence seen so far but not yet decodable.
    partial: Vec<u8>,

    last_errors: VecDeque<TerminalError>,
}

impl Terminal {
    pub fn new(rows: usize, cols: usize) -> Self {
        Terminal {
            screens: [Grid::new(rows, cols), Grid::new(rows, cols)],
            screen_target: PRIMARY,
            cstate: SgrState::default(),
            state: ParserState::Normal,
            title: String::new(),
            tab_size: 8,
            cell_update: 0,
            save_cursor: (0, 0),
            scroll_region: (0, rows),
            partial: Vec::new(),
            last_errors: VecDeque::new(),
        }
    }

    pub fn with_tab_size(mut self, tab_size: usize) -> Self {
        self.tab_size = tab_size;
        self
    }

    pub fn size(&self) -> (usize, usize) {
        self.screens[self.screen_target].size()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn updates(&self) -> u64 {
        self.cell_update
    }

    pub fn cursor_pos(&self) -> (usize, usize) {
        self.screens[self.screen_target].cursor()
    }

    pub fn is_alternate_screen(&self) -> bool {
        self.screen_target == ALTERNATE
    }

    /// Parser errors recorded so far, oldest first, capped at 16. Never
    /// interrupts processing; purely for diagnostics.
    pub fn last_errors(&self) -> impl Iterator<Item = &TerminalError> {
        self.last_errors.iter()
    }

    fn record_error(&mut self, err: TerminalError) {
        if self.last_errors.len() == MAX_RECORDED_ERRORS {
            self.last_errors.pop_front();
        }
        self.last_errors.push_back(err);
    }

    /// Feed raw bytes, incrementally decoding UTF-8. Unlike the original,
    /// an invalid byte sequence does not stop processing: the offending
    /// byte is dropped and decoding resumes at the next one, so one bad
    /// byte from a misbehaving program never wedges the whole session.
    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.partial.push(b);
            let need = utf8_sequence_len(self.partial[0]);
            if self.partial.len() < need {
                continue;
            }
            match std::str::from_utf8(&self.partial) {
                Ok(s) => {
                    if let Some(ch) = s.chars().next() {
                        self.partial.clear();
                        self.put(ch);
                    }
                }
                Err(_) => {
                    self.partial.clear();
                }
            }
        }
    }

    pub fn put(&mut self, r: char) {
        // Vim and other full-screen programs occasionally send this
        // unprompted; harmless to swallow in any state.
        if r == '\u{1}' {
            return;
        }
        let state = std::mem::replace(&mut self.state, ParserState::Normal);
        self.state = self.step(state, r);
    }

    fn step(&mut self, state: ParserState, r: char) -> ParserState {
        match state {
            ParserState::Normal => self.handle_normal(r),
            ParserState::Esc => self.handle_esc(r),
            ParserState::Csi { params, next_param } => self.handle_csi(params, next_param, r),
            ParserState::CsiGt => self.handle_csi_gt(r),
            ParserState::Osc { title, esc } => self.handle_osc(title, esc, r),
            ParserState::Ignore { remaining } => {
                if remaining <= 1 {
                    ParserState::Normal
                } else {
                    ParserState::Ignore {
                        remaining: remaining - 1,
                    }
                }
            }
            ParserState::CaptureUntilSt { esc } => self.handle_capture(esc, r),
        }
    }

    pub fn resize(&mut self, rows: usize, cols: usize) {
        if rows == 0 || cols == 0 {
            return;
        }
        match self.screen_target {
            PRIMARY => self.screens[PRIMARY].resize_and_reflow(rows, cols),
            _ => self.screens[ALTERNATE].resize(rows, cols),
        }
        self.save_cursor = (0, 0);
        self.scroll_region = (0, rows);
    }

    /// Reset the active screen to blank and home the cursor (`ESC c`).
    pub fn clear(&mut self) {
        let (rows, cols) = self.screens[self.screen_target].size();
        self.screens[self.screen_target].set_cursor(0, 0);
        self.screens[PRIMARY] = Grid::new(rows, cols);
    }

    /// Render the active screen as an ANSI byte stream: SGR-prefixed runs
    /// of text with `\r\n` at each row boundary, suitable for replaying to
    /// a freshly-attached viewer.
    pub fn screen_as_ansi(&self) -> Vec<u8> {
        self.render(false)
    }

    /// Same as [`Terminal::screen_as_ansi`] but additionally wraps the
    /// cursor cell in an inverse-video escape, for debugging/inspection.
    pub fn screen_as_ansi_with_cursor(&self) -> Vec<u8> {
        self.render(true)
    }

    fn render(&self, with_cursor: bool) -> Vec<u8> {
        let grid = &self.screens[self.screen_target];
        let cols = grid.cols();
        let (cursor_row, cursor_col) = grid.cursor();
        let mut out = Vec::new();
        let mut x = 0usize;
        let mut y = 0usize;
        let mut last = SgrState::default();
        for cell in grid.viewport() {
            if x >= cols {
                y += 1;
                x = 0;
                out.extend_from_slice(b"\r\n");
                last = SgrState::default();
            }
            if cell.sgr != last {
                last = cell.sgr;
                write_sgr_prefix(&mut out, &cell.sgr);
            }
            let ch = if (cell.ch as u32) < (' ' as u32) {
                ' '
            } else {
                cell.ch
            };
            if with_cursor && x == cursor_col && y == cursor_row {
                out.extend_from_slice(b"\x1b[7m");
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                out.extend_from_slice(b"\x1b[27m");
                last = SgrState::default();
            } else {
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
            x += 1;
        }
        out
    }

    // -- state handlers -----------------------------------------------

    fn handle_normal(&mut self, r: char) -> ParserState {
        let target = self.screen_target;
        let cols = self.screens[target].cols();
        match r {
            '\x1b' => return ParserState::Esc,
            '\n' => {
                self.next_line();
                let row = self.screens[target].cursor().0;
                self.screens[target].set_cursor(row, 0);
                self.mark_line_end(row);
            }
            '\r' => {
                let row = self.screens[target].cursor().0;
                self.screens[target].set_cursor(row, 0);
            }
            '\u{8}' => {
                let (row, col) = self.screens[target].cursor();
                self.screens[target].set_cursor(row, col.saturating_sub(1));
            }
            '\t' => {
                let (row, col) = self.screens[target].cursor();
                let next = (col + self.tab_size) / self.tab_size * self.tab_size;
                self.screens[target].set_cursor(row, next.min(cols.saturating_sub(1)));
            }
            c if (c as u32) < (' ' as u32) => {}
            c => {
                let (row, col) = self.screens[target].cursor();
                if col >= cols {
                    self.next_line();
                    let row = self.screens[target].cursor().0;
                    self.screens[target].set_cursor(row, 0);
                }
                let (row, col) = self.screens[target].cursor();
                let cell = Cell::new(c, self.cstate);
                match self.screens[target].cell_mut(row, col) {
                    Some(slot) => {
                        *slot = cell;
                        self.screens[target].set_cursor(row, col + 1);
                        self.cell_update += 1;
                    }
                    None => self.record_error(TerminalError::OffsetOutOfBounds {
                        offset: row * cols + col,
                        len: self.screens[target].total_rows() * cols,
                    }),
                }
            }
        }
        ParserState::Normal
    }

    /// Mark the end of a just-completed line so reflow knows where a
    /// logical line boundary falls: clear any stale marks on the row, then
    /// mark the last non-blank cell (or column 0 if the row is blank).
    fn mark_line_end(&mut self, prev_row: usize) {
        let target = self.screen_target;
        let cols = self.screens[target].cols();
        let row = prev_row.saturating_sub(1);
        let rows = self.screens[target].rows();
        let clamped = row.min(rows.saturating_sub(1));
        let mut mark = 0usize;
        for col in 0..cols {
            if let Some(cell) = self.screens[target].cell_mut(clamped, col) {
                cell.nl = false;
                if (cell.ch as u32) > (' ' as u32) {
                    mark = col;
                }
            }
        }
        if let Some(cell) = self.screens[target].cell_mut(clamped, mark) {
            cell.nl = true;
        }
    }

    fn next_line(&mut self) {
        let target = self.screen_target;
        let (rows, _cols) = self.screens[target].size();
        let backlog = self.screens[target].backlog_size();
        let (row, _col) = self.screens[target].cursor();
        let new_row = row + 1;
        let (region_top, region_bottom) = self.scroll_region;

        // Cursor already sits below the scroll region (xterm quirk): clamp
        // to the screen's bottom, don't scroll the (smaller) region, don't
        // wrap it back inside.
        if row >= region_bottom {
            self.screens[target].set_cursor(rows.saturating_sub(1), self.screens[target].cursor().1);
            return;
        }

        if new_row < region_bottom {
            self.screens[target].set_cursor(new_row, self.screens[target].cursor().1);
            return;
        }

        let bottom_row = region_bottom.saturating_sub(1);
        if target == PRIMARY && region_top == 0 && region_bottom >= rows {
            let total = self.screens[PRIMARY].total_rows();
            if total < rows + backlog {
                self.screens[PRIMARY].push_row();
                self.screens[PRIMARY].set_cursor(bottom_row, self.screens[PRIMARY].cursor().1);
                return;
            }
        }
        self.scroll_region_up(target, 1);
        self.screens[target].set_cursor(bottom_row, self.screens[target].cursor().1);
    }

    fn scroll_region_up(&mut self, target: usize, n: usize) {
        let cols = self.screens[target].cols();
        let (top, bottom) = self.scroll_region;
        let view = self.screens[target].viewport_mut();
        let len = view.len();
        let start = (top * cols).min(len);
        let end = (bottom * cols).min(len);
        let region = &mut view[start..end];
        let shift = (n * cols).min(region.len());
        let region_len = region.len();
        region.copy_within(shift.., 0);
        for c in &mut region[region_len - shift..] {
            *c = Cell::default();
        }
        self.cell_update += 1;
    }

    fn scroll_region_down(&mut self, target: usize, n: usize) {
        let cols = self.screens[target].cols();
        let (top, bottom) = self.scroll_region;
        let view = self.screens[target].viewport_mut();
        let len = view.len();
        let start = (top * cols).min(len);
        let end = (bottom * cols).min(len);
        let region = &mut view[start..end];
        let shift = (n * cols).min(region.len());
        let region_len = region.len();
        region.copy_within(..region_len - shift, shift);
        for c in &mut region[..shift] {
            *c = Cell::default();
        }
        self.cell_update += 1;
    }

    fn handle_esc(&mut self, r: char) -> ParserState {
        match r {
            '[' => ParserState::Csi {
                params: Vec::new(),
                next_param: true,
            },
            ']' => ParserState::Osc {
                title: String::new(),
                esc: false,
            },
            '>' | '=' => ParserState::Normal, // DEC private mode set/reset, not modeled
            '(' => ParserState::Ignore { remaining: 1 }, // charset designation
            'c' => {
                self.clear();
                ParserState::Normal
            }
            'M' => {
                // Reverse index: move cursor up, no scroll.
                let target = self.screen_target;
                let (row, col) = self.screens[target].cursor();
                self.screens[target].set_cursor(row.saturating_sub(1), col);
                ParserState::Normal
            }
            'k' => ParserState::CaptureUntilSt { esc: false },
            '\\' => ParserState::Normal, // string terminator with nothing pending
            other => {
                self.record_error(TerminalError::UnknownEsc(other as u8));
                ParserState::Normal
            }
        }
    }

    fn handle_capture(&mut self, esc: bool, r: char) -> ParserState {
        match r {
            '\x1b' => ParserState::CaptureUntilSt { esc: true },
            '\\' if esc => ParserState::Normal, // captured string discarded, matches original
            _ => ParserState::CaptureUntilSt { esc: false },
        }
    }

    fn handle_osc(&mut self, mut title: String, mut esc: bool, r: char) -> ParserState {
        if r == ';' || r.is_numeric() {
            // Only OSC 0/1/2 ("set title") are recognized; the numeric
            // prefix is consumed here but not otherwise interpreted, and a
            // non-title OSC's body is still captured and discarded below
            // once this parses as anything other than digits/`;`.
            esc = false;
            title.push(r);
            return ParserState::Osc { title, esc };
        }
        match r {
            '\u{7}' => {
                self.apply_osc_title(&title);
                ParserState::Normal
            }
            '\\' if esc => {
                self.apply_osc_title(&title);
                ParserState::Normal
            }
            '\x1b' => ParserState::Osc { title, esc: true },
            other => {
                title.push(other);
                ParserState::Osc { title, esc: false }
            }
        }
    }

    /// OSC bodies look like `<number>;<text>`. Only set the title for
    /// 0 ("icon name and title"), 1 ("icon name"), and 2 ("title") — other
    /// numeric OSC commands (clipboard, hyperlinks, ...) are parsed far
    /// enough to be discarded cleanly but must not clobber the title.
    fn apply_osc_title(&mut self, body: &str) {
        let mut parts = body.splitn(2, ';');
        let number = parts.next().unwrap_or("");
        let text = parts.next().unwrap_or("");
        if matches!(number, "0" | "1" | "2") {
            self.title = text.to_string();
        }
    }

    fn handle_csi_gt(&mut self, r: char) -> ParserState {
        if r == ';' || r.is_numeric() {
            return ParserState::CsiGt;
        }
        match r {
            'm' | 'c' | 'q' => ParserState::Normal,
            other => {
                self.record_error(TerminalError::UnknownCsi(other as u8));
                ParserState::Normal
            }
        }
    }

    fn handle_csi(&mut self, mut params: Vec<u32>, mut next_param: bool, r: char) -> ParserState {
        if r == ':' || r == ';' {
            return ParserState::Csi {
                params,
                next_param: true,
            };
        }
        if let Some(d) = r.to_digit(10) {
            if next_param {
                params.push(0);
                next_param = false;
            }
            let last = params.len() - 1;
            params[last] = params[last].saturating_mul(10).saturating_add(d);
            return ParserState::Csi { params, next_param };
        }
        if r == '?' {
            return ParserState::Csi { params, next_param };
        }
        if r == '>' {
            return ParserState::CsiGt;
        }
        self.run_csi(r, &params)
    }

    fn run_csi(&mut self, final_byte: char, p: &[u32]) -> ParserState {
        let target = self.screen_target;
        let (rows, cols) = self.screens[target].size();
        match final_byte {
            'A' => {
                let n = param(p, 0, 1) as usize;
                let (row, col) = self.screens[target].cursor();
                self.screens[target].set_cursor(row.saturating_sub(n), col);
            }
            'B' => {
                let n = param(p, 0, 1) as usize;
                let (row, col) = self.screens[target].cursor();
                self.screens[target].set_cursor((row + n).min(rows.saturating_sub(1)), col);
            }
            'C' => {
                let n = param(p, 0, 1) as usize;
                let (row, col) = self.screens[target].cursor();
                self.screens[target].set_cursor(row, (col + n).min(cols.saturating_sub(1)));
            }
            'D' => {
                let n = param(p, 0, 1) as usize;
                let (row, col) = self.screens[target].cursor();
                self.screens[target].set_cursor(row, col.saturating_sub(n));
            }
            'E' => {
                let n = param(p, 0, 1) as usize;
                let (row, _col) = self.screens[target].cursor();
                self.screens[target].set_cursor((row + n).min(rows.saturating_sub(1)), 0);
            }
            'F' => {
                let n = param(p, 0, 1) as usize;
                let (row, _col) = self.screens[target].cursor();
                self.screens[target].set_cursor(row.saturating_sub(n), 0);
            }
            'G' => {
                let n = param(p, 0, 1) as usize;
                let (row, _col) = self.screens[target].cursor();
                self.screens[target].set_cursor(row, n.saturating_sub(1).min(cols.saturating_sub(1)));
            }
            'H' => {
                let line = param(p, 0, 1) as usize;
                let col = param(p, 1, 1) as usize;
                self.screens[target].set_cursor(
                    line.saturating_sub(1).min(rows.saturating_sub(1)),
                    col.saturating_sub(1).min(cols.saturating_sub(1)),
                );
            }
            'd' => {
                let n = param(p, 0, 0) as usize;
                let (_row, col) = self.screens[target].cursor();
                self.screens[target].set_cursor(n.saturating_sub(1).min(rows.saturating_sub(1)), col);
            }
            'J' => self.erase_in_display(param(p, 0, 0)),
            'K' => self.erase_in_line(param(p, 0, 0)),
            'M' => self.delete_lines(param(p, 0, 1) as usize),
            'P' => self.delete_chars(param(p, 0, 1) as usize),
            'X' => self.erase_chars(param(p, 0, 0) as usize),
            'L' => self.insert_lines(param(p, 0, 1) as usize),
            '@' => {} // insert blank characters: not modeled
            'm' => {
                if let Err(e) = self.cstate.apply(p) {
                    self.record_error(TerminalError::from(e));
                }
            }
            'u' => {
                let saved = self.save_cursor;
                self.screens[target].set_cursor(saved.0, saved.1);
            }
            's' => self.save_cursor = self.screens[target].cursor(),
            'c' => {} // device attributes query: not modeled
            'h' => self.enter_private_mode(p.first().copied()),
            'l' => self.exit_private_mode(p.first().copied()),
            't' => {} // window manipulation: not modeled
            'r' => self.set_scroll_region(p),
            'S' => self.scroll_region_up(target, param(p, 0, 1) as usize),
            'T' => self.scroll_region_down(target, param(p, 0, 1) as usize),
            other => self.record_error(TerminalError::UnknownCsi(other as u8)),
        }
        ParserState::Normal
    }

    fn erase_in_display(&mut self, mode: u32) {
        let target = self.screen_target;
        let cols = self.screens[target].cols();
        let (row, col) = self.screens[target].cursor();
        let fill = Cell {
            sgr: self.cstate,
            ..Cell::default()
        };
        let view = self.screens[target].viewport_mut();
        let len = view.len();
        match mode {
            0 => {
                let off = (col + row * cols).min(len);
                for c in &mut view[off..] {
                    *c = fill;
                }
            }
            1 => {
                let off = (col + row * cols).min(len);
                for c in &mut view[..off] {
                    *c = fill;
                }
            }
            2 => {
                for c in view.iter_mut() {
                    *c = fill;
                }
            }
            3 => {
                if target == ALTERNATE {
                    return;
                }
                let total_cells = self.screens[PRIMARY].raw_cells().len();
                if total_cells <= len {
                    return;
                }
                let viewport: Vec<Cell> = self.screens[PRIMARY].viewport().to_vec();
                let raw = self.screens[PRIMARY].raw_cells_mut();
                raw.clear();
                raw.extend(viewport);
            }
            _ => return,
        }
        self.cell_update += 1;
    }

    fn erase_in_line(&mut self, mode: u32) {
        let target = self.screen_target;
        let cols = self.screens[target].cols();
        let (row, col) = self.screens[target].cursor();
        let fill = Cell {
            sgr: self.cstate,
            ..Cell::default()
        };
        let rows = self.screens[target].rows();
        let clamped = row.min(rows.saturating_sub(1));
        let view = self.screens[target].viewport_mut();
        let start = clamped * cols;
        let line = &mut view[start..start + cols];
        match mode {
            0 => {
                for c in &mut line[col.min(cols)..] {
                    *c = fill;
                }
            }
            1 => {
                for c in &mut line[..col.min(cols)] {
                    *c = fill;
                }
            }
            2 => {
                for c in line.iter_mut() {
                    *c = fill;
                }
            }
            _ => return,
        }
        self.cell_update += 1;
    }

    fn delete_lines(&mut self, n: usize) {
        let target = self.screen_target;
        let cols = self.screens[target].cols();
        let (top, bottom) = self.scroll_region;
        let row = self.screens[target].cursor().0;
        let view = self.screens[target].viewport_mut();
        let len = view.len();
        let region_start = (top * cols).min(len);
        let region_end = (bottom * cols).min(len);
        let region = &mut view[region_start..region_end];
        let region_len = region.len();
        let local_row = row.saturating_sub(top);
        let loff = (local_row * cols).min(region_len);
        let eoff = (loff + n * cols).min(region_len);
        region.copy_within(eoff.., loff);
        let tail = region_len.saturating_sub(n * cols);
        for c in &mut region[tail..] {
            *c = Cell::default();
        }
        self.cell_update += 1;
    }

    fn insert_lines(&mut self, n: usize) {
        let target = self.screen_target;
        let cols = self.screens[target].cols();
        let (top, bottom) = self.scroll_region;
        let row = self.screens[target].cursor().0;
        let fill = Cell {
            sgr: self.cstate,
            ..Cell::default()
        };
        let view = self.screens[target].viewport_mut();
        let len = view.len();
        let region_start = (top * cols).min(len);
        let region_end = (bottom * cols).min(len);
        let region = &mut view[region_start..region_end];
        let region_len = region.len();
        let local_row = row.saturating_sub(top);
        let loff = (local_row * cols).min(region_len);
        let eoff = (loff + n * cols).min(region_len);
        region.copy_within(loff..region_len - (eoff - loff), eoff);
        for c in &mut region[loff..eoff] {
            *c = fill;
        }
        self.cell_update += 1;
    }

    fn delete_chars(&mut self, n: usize) {
        let target = self.screen_target;
        let cols = self.screens[target].cols();
        let row = self.screens[target].cursor().0;
        let col = self.screens[target].cursor().1;
        let rows = self.screens[target].rows();
        let clamped = row.min(rows.saturating_sub(1));
        let view = self.screens[target].viewport_mut();
        let start = clamped * cols;
        let line = &mut view[start..start + cols];
        let keep = cols.saturating_sub(col + n);
        line.copy_within(col + n..col + n + keep, col);
        for c in &mut line[col + keep..] {
            *c = Cell::default();
        }
    }

    fn erase_chars(&mut self, n: usize) {
        let target = self.screen_target;
        let cols = self.screens[target].cols();
        let (row, col) = self.screens[target].cursor();
        let fill = Cell {
            sgr: self.cstate,
            ..Cell::default()
        };
        let view = self.screens[target].viewport_mut();
        let len = view.len();
        let off = (col + row * cols).min(len);
        let end = (off + n).min(len);
        for c in &mut view[off..end] {
            *c = fill;
        }
        self.cell_update += 1;
    }

    fn enter_private_mode(&mut self, code: Option<u32>) {
        match code {
            Some(1049) => {
                let (rows, cols) = self.screens[PRIMARY].size();
                let cursor = self.screens[PRIMARY].cursor();
                let mut alt = Grid::new(rows, cols);
                alt.set_cursor(cursor.0, cursor.1);
                self.screens[ALTERNATE] = alt;
                self.screen_target = ALTERNATE;
            }
            Some(1004) => {} // focus reporting: not modeled
            _ => {}
        }
    }

    fn exit_private_mode(&mut self, code: Option<u32>) {
        match code {
            Some(1049) => {
                let (rows, cols) = self.screens[PRIMARY].size();
                self.screens[PRIMARY].resize_and_reflow(rows, cols);
                self.screen_target = PRIMARY;
            }
            Some(25) => {} // cursor visibility: not modeled
            Some(1) => {}  // application cursor keys: not modeled
            _ => {}
        }
    }

    fn set_scroll_region(&mut self, p: &[u32]) {
        let rows = self.screens[self.screen_target].rows();
        let mut top = param(p, 0, 1);
        let mut bottom = param(p, 1, rows as u32);
        if top > bottom {
            std::mem::swap(&mut top, &mut bottom);
        } else if top == bottom {
            top = 1;
            bottom = rows as u32;
        }
        self.scroll_region = (
            (top.saturating_sub(1) as usize).min(rows),
            (bottom as usize).min(rows),
        );
        if p.len() <= 1 {
            self.screens[self.screen_target].set_cursor(0, 0);
        }
    }
}

fn param(p: &[u32], index: usize, default: u32) -> u32 {
    p.get(index).copied().unwrap_or(default)
}

fn utf8_sequence_len(lead: u8) -> usize {
    if lead & 0x80 == 0 {
        1
    } else if lead & 0xE0 == 0xC0 {
        2
    } else if lead & 0xF0 == 0xE0 {
        3
    } else if lead & 0xF8 == 0xF0 {
        4
    } else {
        1
    }
}

fn write_sgr_prefix(out: &mut Vec<u8>, sgr: &SgrState) {
    out.extend_from_slice(b"\x1b[0");
    if let Some(code) = sgr.fg_code() {
        out.extend_from_slice(format!(";{code}").as_bytes());
    } else if let Some(params) = sgr.fg_extended_params() {
        let joined: Vec<String> = params.iter().map(|n| n.to_string()).collect();
        out.extend_from_slice(format!(";{}", joined.join(";")).as_bytes());
    }
    if let Some(code) = sgr.bg_code() {
        out.extend_from_slice(format!(";{code}").as_bytes());
    } else if let Some(params) = sgr.bg_extended_params() {
        let joined: Vec<String> = params.iter().map(|n| n.to_string()).collect();
        out.extend_from_slice(format!(";{}", joined.join(";")).as_bytes());
    }
    match sgr.ul_mode() {
        crate::sgr::COLOR_256 => out.extend_from_slice(format!(";58;5;{}", sgr.ul[0]).as_bytes()),
        crate::sgr::COLOR_16M => out.extend_from_slice(
            format!(";58;2;{};{};{}", sgr.ul[0], sgr.ul[1], sgr.ul[2]).as_bytes(),
        ),
        _ => {}
    }
    if sgr.flags & crate::sgr::FLAG_BOLD != 0 {
        out.extend_from_slice(b";1");
    }
    if sgr.flags & crate::sgr::FLAG_DIM != 0 {
        out.extend_from_slice(b";2");
    }
    if sgr.flags & crate::sgr::FLAG_ITALIC != 0 {
        out.extend_from_slice(b";3");
    }
    if sgr.flags & crate::sgr::FLAG_UNDERLINE != 0 {
        out.extend_from_slice(b";4");
    }
    if sgr.flags & crate::sgr::FLAG_BLINK != 0 {
        out.extend_from_slice(b";5");
    }
    if sgr.flags & crate::sgr::FLAG_INVERSE != 0 {
        out.extend_from_slice(b";7");
    }
    if sgr.flags & crate::sgr::FLAG_INVISIBLE != 0 {
        out.extend_from_slice(b";8");
    }
    if sgr.flags & crate::sgr::FLAG_STRIKE != 0 {
        out.extend_from_slice(b";9");
    }
    out.push(b'm');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prints_plain_text_and_advances_cursor() {
        let mut t = Terminal::new(4, 10);
        t.write(b"hi");
        assert_eq!(t.cursor_pos(), (0, 2));
    }

    #[test]
    fn carriage_return_and_newline() {
        let mut t = Terminal::new(4, 10);
        t.write(b"hi\r\nyo");
        assert_eq!(t.cursor_pos(), (1, 2));
    }

    #[test]
    fn backspace_moves_left_not_past_zero() {
        let mut t = Terminal::new(4, 10);
        t.write(b"\x08\x08");
        assert_eq!(t.cursor_pos(), (0, 0));
    }

    #[test]
    fn tab_advances_to_next_stop() {
        let mut t = Terminal::new(4, 20).with_tab_size(8);
        t.write(b"\t");
        assert_eq!(t.cursor_pos().1, 8);
    }

    #[test]
    fn csi_cursor_position() {
        let mut t = Terminal::new(24, 80);
        t.write(b"\x1b[5;10H");
        assert_eq!(t.cursor_pos(), (4, 9));
    }

    #[test]
    fn sgr_bold_then_reset() {
        let mut t = Terminal::new(4, 10);
        t.write(b"\x1b[1mhi\x1b[0m");
        let out = t.screen_as_ansi();
        assert!(!out.is_empty());
    }

    #[test]
    fn unknown_csi_is_recorded_but_not_fatal() {
        let mut t = Terminal::new(4, 10);
        t.write(b"\x1b[5zhi");
        assert!(t.last_errors().next().is_some());
        assert_eq!(t.cursor_pos(), (0, 2));
    }

    #[test]
    fn osc_title_sets_only_for_0_1_2() {
        let mut t = Terminal::new(4, 10);
        t.write(b"\x1b]2;my title\x07");
        assert_eq!(t.title(), "my title");
        t.write(b"\x1b]52;c;deadbeef\x07");
        assert_eq!(t.title(), "my title"); // unaffected
    }

    #[test]
    fn alternate_screen_switch_and_restore() {
        let mut t = Terminal::new(4, 10);
        t.write(b"hello");
        t.write(b"\x1b[?1049h");
        assert!(t.is_alternate_screen());
        t.write(b"\x1b[?1049l");
        assert!(!t.is_alternate_screen());
        // primary content survived the trip through the alternate screen
        let out = t.screen_as_ansi();
        assert!(String::from_utf8_lossy(&out).contains('h'));
    }

    #[test]
    fn erase_in_display_mode_2_clears_viewport() {
        let mut t = Terminal::new(2, 4);
        t.write(b"abcd");
        t.write(b"\x1b[2J");
        let out = t.screen_as_ansi();
        assert!(!String::from_utf8_lossy(&out).contains('a'));
    }

    #[test]
    fn invalid_utf8_byte_does_not_stall_the_parser() {
        let mut t = Terminal::new(4, 10);
        t.write(&[0xFF]);
        t.write(b"ok");
        assert_eq!(t.cursor_pos(), (0, 2));
    }

    #[test]
    fn scrolling_past_bottom_advances_backlog() {
        let mut t = Terminal::new(2, 4);
        t.write(b"line1\r\nline2\r\nline3\r\n");
        assert!(t.screens_total_rows_for_test() > 2);
    }

    #[test]
    fn scroll_region_confines_scrolling_to_its_rows() {
        let mut t = Terminal::new(5, 10);
        t.write(b"\x1b[2;4r");
        t.write(b"L1\nL2\nL3\nL4\nL5");
        let screen = t.screen_as_ansi();
        let rows: Vec<&str> = std::str::from_utf8(&screen).unwrap().split("\r\n").collect();
        assert_eq!(rows[0].trim_end(), "L1");
        assert_eq!(rows[1].trim_end(), "L3");
        assert_eq!(rows[2].trim_end(), "L4");
        assert_eq!(rows[3].trim_end(), "L5");
        assert_eq!(rows[4].trim_end(), "");
    }

    impl Terminal {
        fn screens_total_rows_for_test(&self) -> usize {
            self.screens[PRIMARY].total_rows()
        }
    }
}
