//! Draws the eight base colors with each attribute; Tab swaps the palette
//! between foreground and background, q or ESC quits.

use termcell::{Error, Terminal, BLACK, BOLD, KEY_ESC, KEY_TAB, UNDERLINE, WHITE};

const COLOR_NAMES: [&str; 8] = [
    "black", "red", "green", "yellow", "blue", "magenta", "cyan", "white",
];

fn main() {
    let mut term = match Terminal::init() {
        Ok(term) => term,
        Err(err) => {
            eprintln!("termcell: {}", err);
            std::process::exit(1);
        }
    };

    let mut on_fg = true;
    draw(&mut term, on_fg);

    loop {
        match term.poll_event() {
            Ok(ev) => {
                if ev.key == KEY_ESC || ev.ch == 'q' {
                    break;
                }
                if ev.key == KEY_TAB {
                    on_fg = !on_fg;
                }
                draw(&mut term, on_fg);
            }
            Err(Error::InputOverflow) => continue,
            Err(_) => break,
        }
    }
}

fn draw(term: &mut Terminal, on_fg: bool) {
    term.clear();

    print_str(term, 0, 0, WHITE | BOLD, BLACK, "tab: fg/bg   q: quit");

    for color in 0..8u16 {
        let y = color + 2;
        let (fg, bg) = if on_fg {
            (color, BLACK)
        } else {
            (WHITE, color)
        };
        print_str(term, 0, y, WHITE, BLACK, COLOR_NAMES[usize::from(color)]);
        print_str(term, 9, y, fg, bg, "plain");
        print_str(term, 16, y, fg | BOLD, bg, "bold");
        print_str(term, 22, y, fg | UNDERLINE, bg, "underline");
        print_str(term, 33, y, fg, bg | BOLD, "blink");
    }

    term.present();
}

fn print_str(term: &mut Terminal, x: u16, y: u16, fg: u16, bg: u16, s: &str) {
    for (i, ch) in s.chars().enumerate() {
        term.change_cell(x + i as u16, y, ch, fg, bg);
    }
}
