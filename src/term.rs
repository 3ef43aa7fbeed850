//! Escape-sequence vocabularies for the recognized terminals. Pure data:
//! a fixed-index table of output strings and an ordered table of input
//! key sequences per terminal, selected by the `TERM` environment variable.

use std::env;
use std::ops::Index;

/// Output capability index. Every recognized terminal provides all of
/// these (some as empty strings, e.g. the Linux console has no alternate
/// screen).
#[derive(Clone, Copy)]
pub(crate) enum Func {
    EnterCa,
    ExitCa,
    ShowCursor,
    HideCursor,
    ClearScreen,
    Sgr0,
    Underline,
    Bold,
    Blink,
    EnterKeypad,
    ExitKeypad,
}

const FUNC_COUNT: usize = 11;

/// Number of entries in every key-sequence table: F1–F12, INSERT, DELETE,
/// HOME, END, PGUP, PGDN, and the four arrows.
pub(crate) const KEY_SEQ_COUNT: usize = 22;

/// One terminal's capability set. `keys[i]` produces key code
/// `KEY_F1 - i`; table order is authoritative and no entry is a prefix of
/// another.
pub(crate) struct Term {
    pub(crate) name: &'static str,
    funcs: [&'static str; FUNC_COUNT],
    pub(crate) keys: [&'static str; KEY_SEQ_COUNT],
}

impl Index<Func> for Term {
    type Output = str;

    fn index(&self, func: Func) -> &str {
        self.funcs[func as usize]
    }
}

static TERMS: [Term; 6] = [
    Term {
        name: "xterm",
        funcs: [
            "\x1b[?1049h",
            "\x1b[?1049l",
            "\x1b[?12l\x1b[?25h",
            "\x1b[?25l",
            "\x1b[H\x1b[2J",
            "\x1b[m",
            "\x1b[4m",
            "\x1b[1m",
            "\x1b[5m",
            "\x1b[?1h\x1b=",
            "\x1b[?1l\x1b>",
        ],
        keys: [
            "\x1bOP", "\x1bOQ", "\x1bOR", "\x1bOS", "\x1b[15~", "\x1b[17~", "\x1b[18~",
            "\x1b[19~", "\x1b[20~", "\x1b[21~", "\x1b[23~", "\x1b[24~", "\x1b[2~", "\x1b[3~",
            "\x1bOH", "\x1bOF", "\x1b[5~", "\x1b[6~", "\x1bOA", "\x1bOB", "\x1bOD", "\x1bOC",
        ],
    },
    Term {
        name: "rxvt-256color",
        funcs: [
            "\x1b7\x1b[?47h",
            "\x1b[2J\x1b[?47l\x1b8",
            "\x1b[?25h",
            "\x1b[?25l",
            "\x1b[H\x1b[2J",
            "\x1b[m",
            "\x1b[4m",
            "\x1b[1m",
            "\x1b[5m",
            "\x1b=",
            "\x1b>",
        ],
        keys: [
            "\x1b[11~", "\x1b[12~", "\x1b[13~", "\x1b[14~", "\x1b[15~", "\x1b[17~", "\x1b[18~",
            "\x1b[19~", "\x1b[20~", "\x1b[21~", "\x1b[23~", "\x1b[24~", "\x1b[2~", "\x1b[3~",
            "\x1b[7~", "\x1b[8~", "\x1b[5~", "\x1b[6~", "\x1b[A", "\x1b[B", "\x1b[D", "\x1b[C",
        ],
    },
    Term {
        name: "rxvt-unicode",
        funcs: [
            "\x1b[?1049h",
            "\x1b[r\x1b[?1049l",
            "\x1b[?25h",
            "\x1b[?25l",
            "\x1b[H\x1b[2J",
            "\x1b[m\x1b(B",
            "\x1b[4m",
            "\x1b[1m",
            "\x1b[5m",
            "\x1b=",
            "\x1b>",
        ],
        keys: [
            "\x1b[11~", "\x1b[12~", "\x1b[13~", "\x1b[14~", "\x1b[15~", "\x1b[17~", "\x1b[18~",
            "\x1b[19~", "\x1b[20~", "\x1b[21~", "\x1b[23~", "\x1b[24~", "\x1b[2~", "\x1b[3~",
            "\x1b[7~", "\x1b[8~", "\x1b[5~", "\x1b[6~", "\x1b[A", "\x1b[B", "\x1b[D", "\x1b[C",
        ],
    },
    Term {
        name: "Eterm",
        funcs: [
            "\x1b7\x1b[?47h",
            "\x1b[2J\x1b[?47l\x1b8",
            "\x1b[?25h",
            "\x1b[?25l",
            "\x1b[H\x1b[2J",
            "\x1b[m",
            "\x1b[4m",
            "\x1b[1m",
            "\x1b[5m",
            "",
            "",
        ],
        keys: [
            "\x1b[11~", "\x1b[12~", "\x1b[13~", "\x1b[14~", "\x1b[15~", "\x1b[17~", "\x1b[18~",
            "\x1b[19~", "\x1b[20~", "\x1b[21~", "\x1b[23~", "\x1b[24~", "\x1b[2~", "\x1b[3~",
            "\x1b[7~", "\x1b[8~", "\x1b[5~", "\x1b[6~", "\x1b[A", "\x1b[B", "\x1b[D", "\x1b[C",
        ],
    },
    Term {
        name: "screen",
        funcs: [
            "\x1b[?1049h",
            "\x1b[?1049l",
            "\x1b[34h\x1b[?25h",
            "\x1b[?25l",
            "\x1b[H\x1b[2J",
            "\x1b[m",
            "\x1b[4m",
            "\x1b[1m",
            "\x1b[5m",
            "\x1b[?1h\x1b=",
            "\x1b[?1l\x1b>",
        ],
        keys: [
            "\x1bOP", "\x1bOQ", "\x1bOR", "\x1bOS", "\x1b[15~", "\x1b[17~", "\x1b[18~",
            "\x1b[19~", "\x1b[20~", "\x1b[21~", "\x1b[23~", "\x1b[24~", "\x1b[2~", "\x1b[3~",
            "\x1b[1~", "\x1b[4~", "\x1b[5~", "\x1b[6~", "\x1bOA", "\x1bOB", "\x1bOD", "\x1bOC",
        ],
    },
    Term {
        name: "linux",
        funcs: [
            "",
            "",
            "\x1b[?25h\x1b[?0c",
            "\x1b[?25l\x1b[?1c",
            "\x1b[H\x1b[J",
            "\x1b[0;10m",
            "\x1b[4m",
            "\x1b[1m",
            "\x1b[5m",
            "",
            "",
        ],
        keys: [
            "\x1b[[A", "\x1b[[B", "\x1b[[C", "\x1b[[D", "\x1b[[E", "\x1b[17~", "\x1b[18~",
            "\x1b[19~", "\x1b[20~", "\x1b[21~", "\x1b[23~", "\x1b[24~", "\x1b[2~", "\x1b[3~",
            "\x1b[1~", "\x1b[4~", "\x1b[5~", "\x1b[6~", "\x1b[A", "\x1b[B", "\x1b[D", "\x1b[C",
        ],
    },
];

pub(crate) fn lookup(name: &str) -> Option<&'static Term> {
    TERMS.iter().find(|term| term.name == name)
}

/// Selects the capability set named by `$TERM`. Exact match only; an unset
/// or unrecognized name is unsupported.
pub(crate) fn from_env() -> Option<&'static Term> {
    let name = env::var("TERM").ok()?;
    lookup(&name)
}

/// Appends `ESC [ 3<fg> ; 4<bg> m`. Every recognized terminal takes the
/// ANSI form.
pub(crate) fn write_sgr(buf: &mut Vec<u8>, fg: u16, bg: u16) {
    buf.extend_from_slice(b"\x1b[3");
    push_num(buf, fg);
    buf.extend_from_slice(b";4");
    push_num(buf, bg);
    buf.push(b'm');
}

/// Appends `ESC [ <row> ; <col> H`. Inputs are 1-based.
pub(crate) fn write_move(buf: &mut Vec<u8>, row: u16, col: u16) {
    debug_assert!(row > 0 && col > 0);
    buf.extend_from_slice(b"\x1b[");
    push_num(buf, row);
    buf.push(b';');
    push_num(buf, col);
    buf.push(b'H');
}

fn push_num(buf: &mut Vec<u8>, mut n: u16) {
    let mut digits = [0u8; 5];
    let mut i = digits.len();
    loop {
        i -= 1;
        digits[i] = b'0' + (n % 10) as u8;
        n /= 10;
        if n == 0 {
            break;
        }
    }
    buf.extend_from_slice(&digits[i..]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{KEY_ARROW_RIGHT, KEY_F1};

    #[test]
    fn recognized_names_resolve() {
        for name in ["xterm", "rxvt-256color", "rxvt-unicode", "Eterm", "screen", "linux"] {
            assert!(lookup(name).is_some(), "{} missing", name);
        }
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert!(lookup("vt100").is_none());
        assert!(lookup("xterm-256color").is_none());
        assert!(lookup("").is_none());
    }

    #[test]
    fn key_table_indices_cover_the_key_code_range() {
        // keys[0] -> KEY_F1, keys[21] -> KEY_ARROW_RIGHT
        assert_eq!(KEY_F1 - (KEY_SEQ_COUNT as u16 - 1), KEY_ARROW_RIGHT);
        let xterm = lookup("xterm").unwrap();
        assert_eq!(xterm.keys[0], "\x1bOP");
        assert_eq!(xterm.keys[KEY_SEQ_COUNT - 1], "\x1bOC");
    }

    #[test]
    fn no_key_sequence_shadows_another() {
        for term in &TERMS {
            for (i, a) in term.keys.iter().enumerate() {
                for (j, b) in term.keys.iter().enumerate() {
                    if i != j {
                        assert!(
                            !b.starts_with(a),
                            "{}: {:?} shadows {:?}",
                            term.name,
                            a,
                            b
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn parameterized_sequences_format_in_place() {
        let mut buf = Vec::new();
        write_sgr(&mut buf, 7, 0);
        assert_eq!(buf, b"\x1b[37;40m");

        buf.clear();
        write_move(&mut buf, 1, 2);
        assert_eq!(buf, b"\x1b[1;2H");

        buf.clear();
        write_move(&mut buf, 124, 9);
        assert_eq!(buf, b"\x1b[124;9H");
    }
}
