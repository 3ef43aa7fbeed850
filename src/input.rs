//! Turns buffered tty bytes into key events: escape-sequence matching
//! against the selected terminal's key table, the ESC/ALT mode policy, and
//! UTF-8 rune decoding.

use crate::ringbuf::RingBuf;
use crate::term::KEY_SEQ_COUNT;
use crate::utf8;
use crate::{KEY_ESC, KEY_F1, MOD_ALT};

/// A single decoded key press. Exactly one of `ch` and `key` carries the
/// event: `ch` is a printable rune (`'\0'` otherwise), `key` a `KEY_*`
/// code. `mods` is a `MOD_*` bitmask.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyEvent {
    pub ch: char,
    pub key: u16,
    pub mods: u16,
}

/// What an unmatched ESC byte means.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InputMode {
    /// Report ESC itself as a key press.
    #[default]
    Esc = 1,
    /// Treat ESC as an ALT prefix for the event decoded from the bytes
    /// that follow.
    Alt = 2,
}

/// Longest prefix the decoder ever needs to look at: the key-sequence
/// tables max out at 5 bytes and a rune at 6, plus an ALT prefix.
const PEEK_MAX: usize = 64;

/// Decodes and consumes one event from the front of `inbuf`. `None` means
/// the buffered bytes are an incomplete sequence; nothing is consumed and
/// the caller should read more input.
pub(crate) fn extract_event(
    inbuf: &mut RingBuf,
    keys: &[&'static str; KEY_SEQ_COUNT],
    mode: InputMode,
) -> Option<KeyEvent> {
    let mut prefix = [0u8; PEEK_MAX];
    let n = inbuf.peek(&mut prefix);
    if n == 0 {
        return None;
    }
    let (event, used) = decode_prefix(&prefix[..n], keys, mode)?;
    inbuf.consume(used);
    Some(event)
}

/// Decodes one event from the start of `buf`, returning it with the number
/// of bytes it spans. `buf` is non-empty.
fn decode_prefix(
    buf: &[u8],
    keys: &[&'static str; KEY_SEQ_COUNT],
    mode: InputMode,
) -> Option<(KeyEvent, usize)> {
    let b0 = buf[0];

    if b0 == 0x1B {
        // Table entries first; the one-per-table-index key codes count down
        // from KEY_F1.
        for (i, seq) in keys.iter().enumerate() {
            let seq = seq.as_bytes();
            if buf.len() >= seq.len() && &buf[..seq.len()] == seq {
                let event = KeyEvent {
                    ch: '\0',
                    key: KEY_F1 - i as u16,
                    mods: 0,
                };
                return Some((event, seq.len()));
            }
        }

        return match mode {
            InputMode::Esc => {
                let event = KeyEvent {
                    ch: '\0',
                    key: KEY_ESC,
                    mods: 0,
                };
                Some((event, 1))
            }
            InputMode::Alt => {
                if buf.len() < 2 {
                    return None;
                }
                // One level only: the inner decode runs in Esc mode, so a
                // run of ESC bytes cannot stack ALT modifiers.
                let (mut event, used) = decode_prefix(&buf[1..], keys, InputMode::Esc)?;
                event.mods |= MOD_ALT;
                Some((event, used + 1))
            }
        };
    }

    if b0 < 0x20 || b0 == 0x7F {
        // Control bytes report their wire value as the key code.
        let event = KeyEvent {
            ch: '\0',
            key: u16::from(b0),
            mods: 0,
        };
        return Some((event, 1));
    }

    match utf8::char_len(b0) {
        None => {
            // A byte that cannot start a sequence still has to move the
            // stream forward.
            let event = KeyEvent {
                ch: char::REPLACEMENT_CHARACTER,
                key: 0,
                mods: 0,
            };
            Some((event, 1))
        }
        Some(len) => {
            if buf.len() < len {
                return None;
            }
            let ch = utf8::decode(&buf[..len]).unwrap_or(char::REPLACEMENT_CHARACTER);
            let event = KeyEvent { ch, key: 0, mods: 0 };
            Some((event, len))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term;
    use crate::{KEY_ARROW_UP, KEY_BACKSPACE2, KEY_DELETE, KEY_ENTER};

    fn xterm_keys() -> &'static [&'static str; KEY_SEQ_COUNT] {
        &term::lookup("xterm").unwrap().keys
    }

    fn ring_of(bytes: &[u8]) -> RingBuf {
        let mut ring = RingBuf::with_capacity(64);
        ring.push(bytes);
        ring
    }

    fn ch_event(ch: char) -> KeyEvent {
        KeyEvent { ch, key: 0, mods: 0 }
    }

    fn key_event(key: u16) -> KeyEvent {
        KeyEvent { ch: '\0', key, mods: 0 }
    }

    #[test]
    fn esc_alone_in_esc_mode_is_an_esc_key() {
        let mut ring = ring_of(b"\x1b");
        let ev = extract_event(&mut ring, xterm_keys(), InputMode::Esc);
        assert_eq!(ev, Some(key_event(KEY_ESC)));
        assert_eq!(ring.len(), 0);
    }

    #[test]
    fn esc_alone_in_alt_mode_needs_more_bytes() {
        let mut ring = ring_of(b"\x1b");
        assert_eq!(extract_event(&mut ring, xterm_keys(), InputMode::Alt), None);
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn alt_mode_prefixes_the_following_rune() {
        let mut ring = ring_of(b"\x1ba");
        let ev = extract_event(&mut ring, xterm_keys(), InputMode::Alt);
        assert_eq!(
            ev,
            Some(KeyEvent {
                ch: 'a',
                key: 0,
                mods: MOD_ALT
            })
        );
        assert_eq!(ring.len(), 0);
    }

    #[test]
    fn alt_never_nests() {
        // Three ESCs: the first pair resolves to ALT+ESC, the leftover ESC
        // pends for a follow-up byte.
        let mut ring = ring_of(b"\x1b\x1b\x1b");
        let ev = extract_event(&mut ring, xterm_keys(), InputMode::Alt);
        assert_eq!(
            ev,
            Some(KeyEvent {
                ch: '\0',
                key: KEY_ESC,
                mods: MOD_ALT
            })
        );
        assert_eq!(ring.len(), 1);
        assert_eq!(extract_event(&mut ring, xterm_keys(), InputMode::Alt), None);
    }

    #[test]
    fn f1_on_xterm() {
        let mut ring = ring_of(b"\x1bOP");
        let ev = extract_event(&mut ring, xterm_keys(), InputMode::Esc);
        assert_eq!(ev, Some(key_event(KEY_F1)));
        assert_eq!(ring.len(), 0);
    }

    #[test]
    fn table_match_wins_over_the_alt_policy() {
        let mut ring = ring_of(b"\x1b[3~");
        let ev = extract_event(&mut ring, xterm_keys(), InputMode::Alt);
        assert_eq!(ev, Some(key_event(KEY_DELETE)));
    }

    #[test]
    fn truncated_function_key_in_esc_mode_degrades_to_esc() {
        // Esc mode never waits; the dangling 'O' comes through as a rune.
        let mut ring = ring_of(b"\x1bO");
        assert_eq!(
            extract_event(&mut ring, xterm_keys(), InputMode::Esc),
            Some(key_event(KEY_ESC))
        );
        assert_eq!(
            extract_event(&mut ring, xterm_keys(), InputMode::Esc),
            Some(ch_event('O'))
        );
    }

    #[test]
    fn control_bytes_report_wire_values() {
        let mut ring = ring_of(&[0x0D, 0x7F, 0x01]);
        let keys = xterm_keys();
        assert_eq!(
            extract_event(&mut ring, keys, InputMode::Esc),
            Some(key_event(KEY_ENTER))
        );
        assert_eq!(
            extract_event(&mut ring, keys, InputMode::Esc),
            Some(key_event(KEY_BACKSPACE2))
        );
        assert_eq!(
            extract_event(&mut ring, keys, InputMode::Esc),
            Some(key_event(0x01))
        );
    }

    #[test]
    fn space_is_a_rune_not_a_key() {
        let mut ring = ring_of(b" ");
        assert_eq!(
            extract_event(&mut ring, xterm_keys(), InputMode::Esc),
            Some(ch_event(' '))
        );
    }

    #[test]
    fn utf8_rune_decodes_once_complete() {
        let mut ring = ring_of(&[0xE2, 0x98]);
        let keys = xterm_keys();
        assert_eq!(extract_event(&mut ring, keys, InputMode::Esc), None);
        assert_eq!(ring.len(), 2);

        ring.push(&[0x83]);
        assert_eq!(
            extract_event(&mut ring, keys, InputMode::Esc),
            Some(ch_event('☃'))
        );
        assert_eq!(ring.len(), 0);
    }

    #[test]
    fn stray_continuation_byte_becomes_replacement() {
        let mut ring = ring_of(&[0x80, b'x']);
        let keys = xterm_keys();
        assert_eq!(
            extract_event(&mut ring, keys, InputMode::Esc),
            Some(ch_event(char::REPLACEMENT_CHARACTER))
        );
        assert_eq!(
            extract_event(&mut ring, keys, InputMode::Esc),
            Some(ch_event('x'))
        );
    }

    #[test]
    fn mixed_stream_is_consumed_exactly() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"\x1bOP"); // F1
        bytes.extend_from_slice(b"hi");
        bytes.extend_from_slice(b"\x1b[A"); // not an xterm sequence, degrades
        bytes.extend_from_slice(&[0xE2, 0x98, 0x83]); // snowman
        bytes.push(0x0D);

        let keys = xterm_keys();
        let mut ring = ring_of(&bytes);

        let mut events = Vec::new();
        while let Some(ev) = extract_event(&mut ring, keys, InputMode::Esc) {
            events.push(ev);
        }

        assert_eq!(ring.len(), 0);
        assert_eq!(
            events,
            vec![
                key_event(KEY_F1),
                ch_event('h'),
                ch_event('i'),
                key_event(KEY_ESC), // "\x1b[A" is not in the xterm table
                ch_event('['),
                ch_event('A'),
                ch_event('☃'),
                key_event(KEY_ENTER),
            ]
        );
    }

    #[test]
    fn arrow_up_on_rxvt() {
        let keys = &term::lookup("rxvt-256color").unwrap().keys;
        let mut ring = ring_of(b"\x1b[A");
        assert_eq!(
            extract_event(&mut ring, keys, InputMode::Esc),
            Some(key_event(KEY_ARROW_UP))
        );
    }
}
