//! A double-buffered, cell-grid terminal UI library for POSIX terminals.
//!
//! The application draws styled characters into a back buffer; [`present`]
//! diffs it against what the terminal already shows and emits the minimum
//! escape traffic to make the two match. Bytes arriving from the tty are
//! decoded into [`KeyEvent`]s, including function keys, arrows, and an
//! optional ALT-prefix input mode.
//!
//! Recognized terminals: xterm, rxvt-256color, rxvt-unicode, Eterm,
//! screen, linux. Capability selection happens once, at [`Terminal::init`],
//! from `$TERM`.
//!
//! [`present`]: Terminal::present

mod cellbuf;
mod input;
mod ringbuf;
mod term;
mod utf8;


use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::mem;
use std::os::unix::io::{AsRawFd, RawFd};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, error};
use nix::errno::Errno;

pub use cellbuf::{Cell, CellBuf};
pub use input::{InputMode, KeyEvent};

use ringbuf::RingBuf;
use term::{Func, Term};

// Colors, packed into the low 4 bits of a cell attribute.
pub const BLACK: u16 = 0x00;
pub const RED: u16 = 0x01;
pub const GREEN: u16 = 0x02;
pub const YELLOW: u16 = 0x03;
pub const BLUE: u16 = 0x04;
pub const MAGENTA: u16 = 0x05;
pub const CYAN: u16 = 0x06;
pub const WHITE: u16 = 0x07;

// Attribute flags, above the color bits. BLINK is honored on the bg
// attribute: setting the bg byte's 0x10 bit requests blink (a field-reuse
// convention inherited from the wire format; see `send_attr`).
pub const BOLD: u16 = 0x10;
pub const UNDERLINE: u16 = 0x20;
pub const BLINK: u16 = 0x40;

// Modifier bits in `KeyEvent::mods`.
pub const MOD_ALT: u16 = 0x01;

// Symbolic key codes, counting down from the top of the u16 range in the
// order of the capability key tables.
pub const KEY_F1: u16 = 0xFFFF;
pub const KEY_F2: u16 = 0xFFFE;
pub const KEY_F3: u16 = 0xFFFD;
pub const KEY_F4: u16 = 0xFFFC;
pub const KEY_F5: u16 = 0xFFFB;
pub const KEY_F6: u16 = 0xFFFA;
pub const KEY_F7: u16 = 0xFFF9;
pub const KEY_F8: u16 = 0xFFF8;
pub const KEY_F9: u16 = 0xFFF7;
pub const KEY_F10: u16 = 0xFFF6;
pub const KEY_F11: u16 = 0xFFF5;
pub const KEY_F12: u16 = 0xFFF4;
pub const KEY_INSERT: u16 = 0xFFF3;
pub const KEY_DELETE: u16 = 0xFFF2;
pub const KEY_HOME: u16 = 0xFFF1;
pub const KEY_END: u16 = 0xFFF0;
pub const KEY_PGUP: u16 = 0xFFEF;
pub const KEY_PGDN: u16 = 0xFFEE;
pub const KEY_ARROW_UP: u16 = 0xFFED;
pub const KEY_ARROW_DOWN: u16 = 0xFFEC;
pub const KEY_ARROW_LEFT: u16 = 0xFFEB;
pub const KEY_ARROW_RIGHT: u16 = 0xFFEA;

// Control bytes are reported with their wire value as the key code; these
// are the useful names for them.
pub const KEY_CTRL_TILDE: u16 = 0x00;
pub const KEY_CTRL_A: u16 = 0x01;
pub const KEY_CTRL_B: u16 = 0x02;
pub const KEY_CTRL_C: u16 = 0x03;
pub const KEY_CTRL_D: u16 = 0x04;
pub const KEY_CTRL_E: u16 = 0x05;
pub const KEY_CTRL_F: u16 = 0x06;
pub const KEY_CTRL_G: u16 = 0x07;
pub const KEY_BACKSPACE: u16 = 0x08;
pub const KEY_TAB: u16 = 0x09;
pub const KEY_CTRL_J: u16 = 0x0A;
pub const KEY_CTRL_K: u16 = 0x0B;
pub const KEY_CTRL_L: u16 = 0x0C;
pub const KEY_ENTER: u16 = 0x0D;
pub const KEY_CTRL_N: u16 = 0x0E;
pub const KEY_CTRL_O: u16 = 0x0F;
pub const KEY_CTRL_P: u16 = 0x10;
pub const KEY_CTRL_Q: u16 = 0x11;
pub const KEY_CTRL_R: u16 = 0x12;
pub const KEY_CTRL_S: u16 = 0x13;
pub const KEY_CTRL_T: u16 = 0x14;
pub const KEY_CTRL_U: u16 = 0x15;
pub const KEY_CTRL_V: u16 = 0x16;
pub const KEY_CTRL_W: u16 = 0x17;
pub const KEY_CTRL_X: u16 = 0x18;
pub const KEY_CTRL_Y: u16 = 0x19;
pub const KEY_CTRL_Z: u16 = 0x1A;
pub const KEY_ESC: u16 = 0x1B;
pub const KEY_CTRL_BACKSLASH: u16 = 0x1C;
pub const KEY_CTRL_RSQ_BRACKET: u16 = 0x1D;
pub const KEY_CTRL_6: u16 = 0x1E;
pub const KEY_CTRL_SLASH: u16 = 0x1F;
pub const KEY_SPACE: u16 = 0x20;
pub const KEY_BACKSPACE2: u16 = 0x7F;

const INPUT_RING_CAPACITY: usize = 4096;
const READ_CHUNK: usize = 32;
const ATTR_INVALID: u16 = 0xFFFF;

/// Set to true when there is an open tty-backed session. At most one per
/// process.
static SESSION_OPEN: AtomicBool = AtomicBool::new(false);

/// Set by the SIGWINCH handler, drained on the next `clear` or `present`.
static WINCH_PENDING: AtomicBool = AtomicBool::new(false);

extern "C" fn sigwinch_handler(_signum: libc::c_int) {
    // Async-signal context: a flag store and nothing else.
    WINCH_PENDING.store(true, Ordering::Relaxed);
}

#[derive(Debug)]
pub enum Error {
    /// `$TERM` is unset or names a terminal without a capability set.
    UnsupportedTerminal,
    FailedToOpenTty(io::Error),
    /// A tty-backed session already exists in this process.
    AlreadyOpen,
    /// A tty read did not fit in the input ring; the bytes just read were
    /// discarded. Previously buffered input is intact and can be drained
    /// by calling the event functions again.
    InputOverflow,
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::UnsupportedTerminal => write!(f, "unsupported terminal (check $TERM)"),
            Error::FailedToOpenTty(err) => write!(f, "failed to open /dev/tty: {}", err),
            Error::AlreadyOpen => write!(f, "a terminal session is already open"),
            Error::InputOverflow => write!(f, "input buffer overflow, input discarded"),
            Error::Io(err) => write!(f, "terminal i/o error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::FailedToOpenTty(err) | Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

/// An open terminal session: raw mode, alternate screen, the two cell
/// buffers, and the input ring. Restores the terminal on drop.
pub struct Terminal {
    // None in test instances, which capture output instead of writing it
    tty: Option<File>,
    captured: Vec<u8>,
    orig_tios: libc::termios,
    term: &'static Term,
    width: u16,
    height: u16,
    back_buffer: CellBuf,
    front_buffer: CellBuf,
    inbuf: RingBuf,
    input_mode: InputMode,
    // User-visible cursor position; None when hidden (the default).
    cursor: Option<(u16, u16)>,
    resize_pending: bool,
    // Size the next reconciliation reports in test instances.
    test_size: Option<(u16, u16)>,
    last_fg: u16,
    last_bg: u16,
    // Where the next written character lands, 1-based. (0, 0) when unknown.
    terminal_cursor: (u16, u16),
    output_buffer: Vec<u8>,
}

impl Terminal {
    /// Opens the process's terminal session: resolves `$TERM`, opens
    /// `/dev/tty`, installs the SIGWINCH flag handler, enters raw mode and
    /// the alternate screen, and allocates the cell buffers at the current
    /// window size.
    pub fn init() -> Result<Terminal, Error> {
        let term = term::from_env().ok_or(Error::UnsupportedTerminal)?;

        if SESSION_OPEN
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::AlreadyOpen);
        }

        match Terminal::init_with_term(term) {
            Ok(terminal) => Ok(terminal),
            Err(err) => {
                SESSION_OPEN.store(false, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    fn init_with_term(term: &'static Term) -> Result<Terminal, Error> {
        let tty = OpenOptions::new()
            .read(true)
            .write(true)
            .open("/dev/tty")
            .map_err(Error::FailedToOpenTty)?;
        let fd = tty.as_raw_fd();

        debug!("TERM={}, entering raw mode", term.name);

        WINCH_PENDING.store(false, Ordering::Relaxed);
        let handler = sigwinch_handler as extern "C" fn(libc::c_int);
        unsafe {
            libc::signal(libc::SIGWINCH, handler as libc::sighandler_t);
        }

        let mut orig_tios: libc::termios = unsafe { mem::zeroed() };
        unsafe {
            libc::tcgetattr(fd, &mut orig_tios);
        }

        let mut tios = orig_tios;
        tios.c_iflag &= !(libc::IGNBRK
            | libc::BRKINT
            | libc::PARMRK
            | libc::ISTRIP
            | libc::INLCR
            | libc::IGNCR
            | libc::ICRNL
            | libc::IXON);
        tios.c_oflag &= !libc::OPOST;
        tios.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);
        tios.c_cflag &= !(libc::CSIZE | libc::PARENB);
        tios.c_cflag |= libc::CS8;
        // VMIN = VTIME = 0: reads return immediately with whatever is there
        tios.c_cc[libc::VMIN] = 0;
        tios.c_cc[libc::VTIME] = 0;
        unsafe {
            libc::tcsetattr(fd, libc::TCSAFLUSH, &tios);
        }

        let (width, height) = query_window_size(fd);

        let mut terminal = Terminal {
            tty: Some(tty),
            captured: Vec::new(),
            orig_tios,
            term,
            width,
            height,
            back_buffer: CellBuf::new(width, height),
            front_buffer: CellBuf::new(width, height),
            inbuf: RingBuf::with_capacity(INPUT_RING_CAPACITY),
            input_mode: InputMode::Esc,
            cursor: None,
            resize_pending: false,
            test_size: None,
            last_fg: ATTR_INVALID,
            last_bg: ATTR_INVALID,
            terminal_cursor: (0, 0),
            output_buffer: Vec::with_capacity(32 * 1024),
        };

        terminal.push_func(Func::EnterCa);
        terminal.push_func(Func::EnterKeypad);
        terminal.push_func(Func::HideCursor);
        terminal.push_func(Func::ClearScreen);
        terminal.flush();

        Ok(terminal)
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// Clears the back buffer to blank white-on-black cells. The terminal
    /// itself is untouched until the next `present`.
    pub fn clear(&mut self) {
        self.reconcile_resize();
        self.back_buffer.clear();
    }

    /// Commits the back buffer: walks the grid in row-major order, emits
    /// attribute changes, cursor moves and characters for every cell that
    /// differs from the front buffer, and flushes. Cells equal to what the
    /// terminal already shows cost nothing.
    pub fn present(&mut self) {
        self.reconcile_resize();

        for y in 0..self.height {
            for x in 0..self.width {
                let back = self.back_buffer.get(x, y);
                if self.front_buffer.get(x, y) == back {
                    continue;
                }
                self.front_buffer.set(x, y, back);
                self.send_attr(back.fg, back.bg);
                self.send_char(x, y, back.ch);
            }
        }

        if let Some((x, y)) = self.cursor {
            term::write_move(&mut self.output_buffer, y + 1, x + 1);
            self.terminal_cursor = (0, 0);
        }

        self.flush();
    }

    /// Writes one cell into the back buffer. Out-of-bounds writes are
    /// silently dropped.
    pub fn put_cell(&mut self, x: u16, y: u16, cell: Cell) {
        self.back_buffer.put(x, y, cell);
    }

    pub fn change_cell(&mut self, x: u16, y: u16, ch: char, fg: u16, bg: u16) {
        self.put_cell(x, y, Cell { ch, fg, bg });
    }

    /// Copies a `w`×`h` rectangle of cells (row-major) into the back buffer
    /// with its top-left corner at `(x, y)`. The whole call is dropped when
    /// the rectangle does not fit or `cells` has the wrong length; an
    /// exactly edge-fitting rectangle is accepted.
    pub fn blit(&mut self, x: u16, y: u16, w: u16, h: u16, cells: &[Cell]) {
        if u32::from(x) + u32::from(w) > u32::from(self.width)
            || u32::from(y) + u32::from(h) > u32::from(self.height)
        {
            return;
        }
        if cells.len() != usize::from(w) * usize::from(h) {
            return;
        }
        for row in 0..h {
            let src = &cells[usize::from(row) * usize::from(w)..][..usize::from(w)];
            self.back_buffer.row_mut(y + row)[usize::from(x)..][..usize::from(w)]
                .copy_from_slice(src);
        }
    }

    /// Shows the cursor at `(x, y)`, or hides it with `None`. Takes effect
    /// with the surrounding output, at the latest on the next `present`.
    pub fn set_cursor(&mut self, xy: Option<(u16, u16)>) {
        match (self.cursor, xy) {
            (Some(_), None) => {
                self.cursor = None;
                self.push_func(Func::HideCursor);
            }
            (None, Some((x, y))) => {
                self.cursor = Some((x, y));
                term::write_move(&mut self.output_buffer, y + 1, x + 1);
                self.push_func(Func::ShowCursor);
                self.terminal_cursor = (0, 0);
            }
            (Some(old), Some((x, y))) if old != (x, y) => {
                self.cursor = Some((x, y));
                term::write_move(&mut self.output_buffer, y + 1, x + 1);
                self.terminal_cursor = (0, 0);
            }
            _ => {}
        }
    }

    /// Waits for the next key event. Blocks until input arrives; resize
    /// signals wake the wait but are reconciled by `clear`/`present`, not
    /// reported as events.
    pub fn poll_event(&mut self) -> Result<KeyEvent, Error> {
        match self.wait_fill_event(None)? {
            Some(event) => Ok(event),
            // only reachable without a tty to wait on (test instances)
            None => Err(Error::Io(io::Error::from(io::ErrorKind::WouldBlock))),
        }
    }

    /// Like `poll_event` but gives up after `timeout_ms` milliseconds,
    /// returning `Ok(None)`. A zero timeout polls.
    pub fn peek_event(&mut self, timeout_ms: u32) -> Result<Option<KeyEvent>, Error> {
        let timeout = libc::timeval {
            tv_sec: (timeout_ms / 1000) as libc::time_t,
            tv_usec: ((timeout_ms % 1000) * 1000) as libc::suseconds_t,
        };
        self.wait_fill_event(Some(timeout))
    }

    pub fn input_mode(&self) -> InputMode {
        self.input_mode
    }

    pub fn set_input_mode(&mut self, mode: InputMode) {
        self.input_mode = mode;
    }

    /// Marks the session as needing a size reconciliation, exactly as the
    /// SIGWINCH handler does. For environments that learn about window
    /// changes through some other channel.
    pub fn notify_resize(&mut self) {
        self.resize_pending = true;
    }

    fn wait_fill_event(&mut self, timeout: Option<libc::timeval>) -> Result<Option<KeyEvent>, Error> {
        if let Some(event) = self.try_extract() {
            return Ok(Some(event));
        }

        let fd = match &self.tty {
            Some(tty) => tty.as_raw_fd(),
            None => return Ok(None),
        };

        let mut tv = timeout;
        loop {
            let ready = unsafe {
                let mut fds: libc::fd_set = mem::zeroed();
                libc::FD_ZERO(&mut fds);
                libc::FD_SET(fd, &mut fds);
                let tv_ptr = match tv {
                    Some(ref mut tv) => tv as *mut libc::timeval,
                    None => ptr::null_mut(),
                };
                libc::select(fd + 1, &mut fds, ptr::null_mut(), ptr::null_mut(), tv_ptr)
            };

            if ready < 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EINTR) {
                    continue;
                }
                return Err(Error::Io(err));
            }
            if ready == 0 {
                return Ok(None);
            }

            let mut buf = [0u8; READ_CHUNK];
            let n = match nix::unistd::read(fd, &mut buf) {
                Ok(n) => n,
                Err(Errno::EINTR) | Err(Errno::EAGAIN) => continue,
                Err(err) => return Err(Error::Io(io::Error::from_raw_os_error(err as i32))),
            };
            // A zero-byte read is how an interrupting resize surfaces here.
            if n == 0 {
                continue;
            }
            if self.inbuf.free_space() < n {
                debug!(
                    "input ring full ({} buffered), discarding {} bytes",
                    self.inbuf.len(),
                    n
                );
                return Err(Error::InputOverflow);
            }
            self.inbuf.push(&buf[..n]);

            if let Some(event) = self.try_extract() {
                return Ok(Some(event));
            }
        }
    }

    fn try_extract(&mut self) -> Option<KeyEvent> {
        let term = self.term;
        input::extract_event(&mut self.inbuf, &term.keys, self.input_mode)
    }

    fn reconcile_resize(&mut self) {
        if self.tty.is_some() && WINCH_PENDING.swap(false, Ordering::Relaxed) {
            self.resize_pending = true;
        }
        if !self.resize_pending {
            return;
        }
        self.resize_pending = false;

        let (width, height) = match &self.tty {
            Some(tty) => query_window_size(tty.as_raw_fd()),
            None => self.test_size.take().unwrap_or((self.width, self.height)),
        };
        debug!("resized to {}x{}", width, height);

        self.width = width;
        self.height = height;
        self.back_buffer.resize(width, height);
        self.front_buffer.resize(width, height);
        // A cleared front buffer forces the next present to repaint
        // everything the back buffer holds beyond blank cells.
        self.front_buffer.clear();
        self.last_fg = ATTR_INVALID;
        self.last_bg = ATTR_INVALID;
        self.terminal_cursor = (0, 0);
        self.send_clear();
    }

    fn send_clear(&mut self) {
        self.send_attr(WHITE, BLACK);
        self.push_func(Func::ClearScreen);
        self.flush();
    }

    fn send_attr(&mut self, fg: u16, bg: u16) {
        if fg == self.last_fg && bg == self.last_bg {
            return;
        }
        self.last_fg = fg;
        self.last_bg = bg;

        self.push_func(Func::Sgr0);
        term::write_sgr(&mut self.output_buffer, fg & 0x0F, bg & 0x0F);
        if fg & BOLD != 0 {
            self.push_func(Func::Bold);
        }
        if fg & UNDERLINE != 0 {
            self.push_func(Func::Underline);
        }
        // Blink rides on the bg attribute's BOLD bit.
        if bg & BOLD != 0 {
            self.push_func(Func::Blink);
        }
    }

    // Input coordinates are 0-based; the cursor move is skipped when the
    // target cell directly follows the previous write.
    fn send_char(&mut self, x: u16, y: u16, ch: char) {
        let to = (x + 1, y + 1);
        if self.terminal_cursor != to {
            term::write_move(&mut self.output_buffer, to.1, to.0);
        }
        let mut encoded = [0u8; 4];
        self.output_buffer
            .extend_from_slice(ch.encode_utf8(&mut encoded).as_bytes());
        self.terminal_cursor = (to.0 + 1, to.1);
    }

    fn push_func(&mut self, func: Func) {
        self.output_buffer
            .extend_from_slice(self.term[func].as_bytes());
    }

    fn flush(&mut self) {
        match self.tty {
            Some(ref mut tty) => {
                if let Err(err) = tty.write_all(&self.output_buffer) {
                    error!("tty write failed: {}", err);
                }
            }
            None => self.captured.extend_from_slice(&self.output_buffer),
        }
        self.output_buffer.clear();
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        let fd = match &self.tty {
            Some(tty) => tty.as_raw_fd(),
            None => return,
        };

        self.push_func(Func::ShowCursor);
        self.push_func(Func::Sgr0);
        self.push_func(Func::ClearScreen);
        self.push_func(Func::ExitCa);
        self.push_func(Func::ExitKeypad);
        self.flush();

        unsafe {
            if libc::tcsetattr(fd, libc::TCSAFLUSH, &self.orig_tios) != 0 {
                error!(
                    "failed to restore terminal attributes: {}",
                    io::Error::last_os_error()
                );
            }
        }

        SESSION_OPEN.store(false, Ordering::SeqCst);
    }
}

fn query_window_size(fd: RawFd) -> (u16, u16) {
    let mut size: libc::winsize = unsafe { mem::zeroed() };
    unsafe {
        libc::ioctl(fd, libc::TIOCGWINSZ, &mut size);
    }
    (size.ws_col, size.ws_row)
}

//
// Testing API
//

impl Terminal {
    /// A session without a tty: same buffers and decoding, with output
    /// bytes captured for inspection instead of written. Speaks xterm.
    pub fn new_test(width: u16, height: u16) -> Terminal {
        Terminal {
            tty: None,
            captured: Vec::new(),
            orig_tios: unsafe { mem::zeroed() },
            term: term::lookup("xterm").unwrap(),
            width,
            height,
            back_buffer: CellBuf::new(width, height),
            front_buffer: CellBuf::new(width, height),
            inbuf: RingBuf::with_capacity(INPUT_RING_CAPACITY),
            input_mode: InputMode::Esc,
            cursor: None,
            resize_pending: false,
            test_size: None,
            last_fg: ATTR_INVALID,
            last_bg: ATTR_INVALID,
            terminal_cursor: (0, 0),
            output_buffer: Vec::with_capacity(32 * 1024),
        }
    }

    /// Bytes a real session would have written since the last call.
    pub fn take_output(&mut self) -> Vec<u8> {
        mem::take(&mut self.captured)
    }

    pub fn front_buffer(&self) -> &CellBuf {
        &self.front_buffer
    }

    /// Queues a window-size change, as if SIGWINCH had been delivered and
    /// the size ioctl reported `width`×`height`. Reconciled on the next
    /// `clear` or `present`.
    pub fn set_buffer_size(&mut self, width: u16, height: u16) {
        self.test_size = Some((width, height));
        self.resize_pending = true;
    }

    /// One non-blocking decode attempt against the buffered input.
    pub fn try_event(&mut self) -> Option<KeyEvent> {
        self.try_extract()
    }

    /// Appends bytes to the input ring, as a tty read would.
    pub fn feed_input(&mut self, bytes: &[u8]) {
        self.inbuf.push(bytes);
    }
}
