//! Terminal rendering of console events.
//!
//! Echo lines carry the sender's colour name; it is mapped to a crossterm
//! colour and keyword highlights are drawn in bold. In plain mode the
//! inline `<colour="..">` markup is printed as is.

use crossterm::queue;
use crossterm::style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor};
use std::io::{self, Write};
use troop_core::{ConsoleEvent, EchoLine};

/// Map a colour name or `#rrggbb` value to a terminal colour.
pub fn parse_colour(name: &str) -> Option<Color> {
    let name = name.trim();
    if let Some(hex) = name.strip_prefix('#') {
        return parse_hex(hex);
    }

    let colour = match name.to_ascii_lowercase().as_str() {
        "white" => Color::White,
        "black" => Color::Black,
        "red" => Color::Red,
        "green" => Color::Green,
        "blue" => Color::Blue,
        "yellow" => Color::Yellow,
        "cyan" => Color::Cyan,
        "magenta" | "purple" => Color::Magenta,
        "grey" | "gray" => Color::Grey,
        "darkgrey" | "darkgray" => Color::DarkGrey,
        "orange" => Color::Rgb {
            r: 255,
            g: 165,
            b: 0,
        },
        "pink" => Color::Rgb {
            r: 255,
            g: 105,
            b: 180,
        },
        _ => return None,
    };
    Some(colour)
}

fn parse_hex(hex: &str) -> Option<Color> {
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some(Color::Rgb {
        r: channel(0)?,
        g: channel(2)?,
        b: channel(4)?,
    })
}

/// Writes console events to a terminal.
#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    plain: bool,
}

impl Renderer {
    pub fn new(plain: bool) -> Self {
        Self { plain }
    }

    pub fn render<W: Write>(&self, out: &mut W, event: &ConsoleEvent) -> io::Result<()> {
        match event {
            ConsoleEvent::Echo(line) if self.plain => writeln!(out, "{}", line.to_markup())?,
            ConsoleEvent::Echo(line) => self.render_echo(out, line)?,
            ConsoleEvent::Output(text) => {
                write!(out, "{}", text)?;
                if !text.ends_with('\n') {
                    writeln!(out)?;
                }
            }
            ConsoleEvent::Diagnostic(text) if self.plain => writeln!(out, "error: {}", text)?,
            ConsoleEvent::Diagnostic(text) => {
                queue!(
                    out,
                    SetForegroundColor(Color::Red),
                    Print("error: "),
                    Print(text),
                    ResetColor,
                    Print("\n")
                )?;
            }
        }
        out.flush()
    }

    fn render_echo<W: Write>(&self, out: &mut W, line: &EchoLine) -> io::Result<()> {
        match parse_colour(&line.colour) {
            Some(colour) => queue!(
                out,
                SetForegroundColor(colour),
                Print(&line.prefix),
                ResetColor
            )?,
            None => {
                log::debug!("Unknown colour {:?}, printing uncoloured", line.colour);
                queue!(out, Print(&line.prefix))?;
            }
        }
        queue!(out, Print(troop_core::echo::SEPARATOR))?;

        let mut pos = 0;
        for range in &line.highlights {
            let (Some(before), Some(keyword)) = (
                line.code.get(pos..range.start),
                line.code.get(range.clone()),
            ) else {
                continue;
            };
            queue!(
                out,
                Print(before),
                SetAttribute(Attribute::Bold),
                Print(keyword),
                SetAttribute(Attribute::Reset)
            )?;
            pos = range.end;
        }
        queue!(out, Print(line.code.get(pos..).unwrap_or_default()), Print("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_line(colour: &str) -> EchoLine {
        EchoLine {
            prefix: "Ann".into(),
            colour: colour.into(),
            code: "d1 $ s \"bd\"".into(),
            highlights: vec![0..2, 3..4],
        }
    }

    fn render(renderer: Renderer, event: &ConsoleEvent) -> String {
        let mut out = Vec::new();
        renderer.render(&mut out, event).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_parse_colour() {
        assert_eq!(parse_colour("White"), Some(Color::White));
        assert_eq!(parse_colour("GREY"), Some(Color::Grey));
        assert_eq!(
            parse_colour("#ff8000"),
            Some(Color::Rgb { r: 255, g: 128, b: 0 })
        );
        assert_eq!(parse_colour("#ff80"), None);
        assert_eq!(parse_colour("#zzzzzz"), None);
        assert_eq!(parse_colour("chartreuse"), None);
    }

    #[test]
    fn test_plain_echo_is_markup() {
        let text = render(Renderer::new(true), &ConsoleEvent::Echo(echo_line("White")));
        assert_eq!(text, "<colour=\"White\">Ann</colour> : d1 $ s \"bd\"\n");
    }

    #[test]
    fn test_coloured_echo_keeps_text() {
        let text = render(Renderer::new(false), &ConsoleEvent::Echo(echo_line("Red")));
        assert!(text.contains("Ann"));
        assert!(text.contains(" : "));
        assert!(text.contains("d1"));
        assert!(text.contains(" s \"bd\"\n"));
        assert!(!text.contains("<colour"));
        assert!(text.contains('\x1b'));
    }

    #[test]
    fn test_unknown_colour_still_renders() {
        let text = render(Renderer::new(false), &ConsoleEvent::Echo(echo_line("Mauve")));
        assert!(text.starts_with("Ann : "));
    }

    #[test]
    fn test_output_gets_trailing_newline() {
        let renderer = Renderer::new(true);
        assert_eq!(render(renderer, &ConsoleEvent::Output("Prelude>".into())), "Prelude>\n");
        assert_eq!(render(renderer, &ConsoleEvent::Output("ok\n".into())), "ok\n");
    }

    #[test]
    fn test_diagnostic() {
        let text = render(Renderer::new(true), &ConsoleEvent::Diagnostic("boom".into()));
        assert_eq!(text, "error: boom\n");
        let text = render(Renderer::new(false), &ConsoleEvent::Diagnostic("boom".into()));
        assert!(text.contains("error: boom"));
    }
}
