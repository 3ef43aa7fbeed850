//! Echoes decoded key events in ALT input mode; Ctrl-C quits.

use termcell::{Error, InputMode, KeyEvent, Terminal, BLACK, BOLD, KEY_CTRL_C, WHITE};

fn main() {
    let mut term = match Terminal::init() {
        Ok(term) => term,
        Err(err) => {
            eprintln!("termcell: {}", err);
            std::process::exit(1);
        }
    };
    term.set_input_mode(InputMode::Alt);

    let mut history: Vec<KeyEvent> = Vec::new();
    draw(&mut term, &history);

    loop {
        match term.poll_event() {
            Ok(ev) => {
                if ev.key == KEY_CTRL_C {
                    break;
                }
                history.push(ev);
                let visible = usize::from(term.height()).saturating_sub(2);
                if history.len() > visible {
                    let excess = history.len() - visible;
                    history.drain(..excess);
                }
                draw(&mut term, &history);
            }
            Err(Error::InputOverflow) => continue,
            Err(err) => {
                drop(term);
                eprintln!("termcell: {}", err);
                std::process::exit(1);
            }
        }
    }
}

fn draw(term: &mut Terminal, history: &[KeyEvent]) {
    term.clear();
    print_str(term, 0, 0, WHITE | BOLD, BLACK, "press keys; ctrl-c quits");
    for (i, ev) in history.iter().enumerate() {
        print_str(term, 0, i as u16 + 2, WHITE, BLACK, &format!("{:?}", ev));
    }
    term.present();
}

fn print_str(term: &mut Terminal, x: u16, y: u16, fg: u16, bg: u16, s: &str) {
    for (i, ch) in s.chars().enumerate() {
        term.change_cell(x + i as u16, y, ch, fg, bg);
    }
}
