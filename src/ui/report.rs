//! Plain-text rendering of one traced run

use super::theme::{Theme, DEFAULT_THEME};
use crate::explain::AnnotatedEvent;
use crate::sandbox::orchestrator::RunResult;
use crate::trace::event::TraceEvent;
use crossterm::queue;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use std::io::{self, Write};

/// Writes text, colored only when the output is a terminal that wants it
struct Painter<'w, W: Write> {
    out: &'w mut W,
    color: bool,
}

impl<W: Write> Painter<'_, W> {
    fn paint(&mut self, color: Color, text: &str) -> io::Result<()> {
        if self.color {
            queue!(self.out, SetForegroundColor(color), Print(text), ResetColor)
        } else {
            self.out.write_all(text.as_bytes())
        }
    }

    fn plain(&mut self, text: &str) -> io::Result<()> {
        self.out.write_all(text.as_bytes())
    }
}

fn write_event<W: Write>(
    painter: &mut Painter<'_, W>,
    theme: &Theme,
    annotated: &AnnotatedEvent<'_>,
) -> io::Result<()> {
    let event = annotated.event;
    let indent = "  ".repeat(event.depth());
    painter.plain(&indent)?;
    painter.paint(theme.comment, &format!("{:>4} ", event.line()))?;
    painter.paint(theme.event_color(event.tag()), &format!("{:<9}", event.tag()))?;
    painter.paint(theme.fg, &format!(" {}", event.source_text()))?;

    match event {
        TraceEvent::Call { function_name, .. } => {
            painter.paint(theme.function, &format!("  -> {}", function_name))?;
        }
        TraceEvent::Return {
            function_name,
            return_value,
            ..
        } => {
            painter.paint(theme.function, &format!("  <- {} ", function_name))?;
            painter.paint(theme.return_value, return_value)?;
        }
        TraceEvent::Line {
            added,
            updated,
            removed,
            ..
        } => {
            for (name, value) in added {
                painter.paint(theme.added, &format!("  +{}={}", name, value))?;
            }
            for (name, (old, new)) in updated {
                painter.paint(theme.secondary, &format!("  ~{}: {} -> {}", name, old, new))?;
            }
            for name in removed {
                painter.paint(theme.removed, &format!("  -{}", name))?;
            }
        }
        TraceEvent::Exception { error_summary, .. } => {
            painter.paint(theme.error, &format!("  {}", error_summary))?;
        }
        TraceEvent::BudgetExceeded { reason, .. } => {
            painter.paint(theme.secondary, &format!("  {}", reason))?;
        }
    }
    painter.plain("\n")?;

    if let Some(explanation) = &annotated.explanation {
        painter.plain(&indent)?;
        painter.paint(theme.comment, &format!("     # {}\n", explanation))?;
    }
    Ok(())
}

fn write_block<W: Write>(
    painter: &mut Painter<'_, W>,
    title: &str,
    title_color: Color,
    body: &str,
) -> io::Result<()> {
    if body.is_empty() {
        return Ok(());
    }
    painter.paint(title_color, &format!("--- {} ---\n", title))?;
    painter.plain(body)?;
    if !body.ends_with('\n') {
        painter.plain("\n")?;
    }
    Ok(())
}

/// Print every event, the captured output, and a one-line summary
pub fn print_run<W: Write>(
    out: &mut W,
    events: &[AnnotatedEvent<'_>],
    result: &RunResult,
    color: bool,
) -> io::Result<()> {
    let theme = &DEFAULT_THEME;
    let mut painter = Painter { out, color };

    for annotated in events {
        write_event(&mut painter, theme, annotated)?;
    }
    write_block(&mut painter, "stdout", theme.primary, &result.stdout)?;
    write_block(&mut painter, "stderr", theme.error, &result.stderr)?;

    let (status_color, status) = if result.crashed {
        (theme.error, "crashed")
    } else if result.timed_out {
        (theme.secondary, "budget exceeded")
    } else if result.exit_status == Some(0) {
        (theme.success, "finished")
    } else {
        (theme.error, "failed")
    };
    painter.paint(status_color, status)?;
    let exit = result
        .exit_status
        .map_or_else(|| "none".to_string(), |code| code.to_string());
    painter.paint(
        theme.comment,
        &format!(
            " ({} events, {} steps, exit {}, {} ms)\n",
            result.events.len(),
            result.steps,
            exit,
            result.duration_ms
        ),
    )?;
    painter.out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explain::annotate;
    use indexmap::IndexMap;

    fn sample() -> RunResult {
        RunResult {
            events: vec![
                TraceEvent::Call {
                    line: 1,
                    source_text: "x = 1".to_string(),
                    function_name: "<module>".to_string(),
                    depth: 0,
                },
                TraceEvent::Line {
                    line: 2,
                    source_text: "x = 2".to_string(),
                    depth: 0,
                    locals: IndexMap::from([("x".to_string(), "1".to_string())]),
                    added: IndexMap::from([("x".to_string(), "1".to_string())]),
                    updated: IndexMap::new(),
                    removed: Vec::new(),
                },
            ],
            stdout: "2\n".to_string(),
            exit_status: Some(0),
            completed: true,
            steps: 2,
            ..RunResult::default()
        }
    }

    #[test]
    fn test_plain_report() {
        let result = sample();
        let events = annotate(&result.events, None, Default::default());
        let mut out = Vec::new();
        print_run(&mut out, &events, &result, false).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "   1 call      x = 1  -> <module>");
        assert_eq!(lines[1], "   2 line      x = 2  +x=1");
        assert_eq!(lines[2], "--- stdout ---");
        assert_eq!(lines[3], "2");
        assert!(lines[4].starts_with("finished (2 events, 2 steps, exit 0"));
        assert!(!text.contains('\u{1b}'));
    }

    #[test]
    fn test_colored_report() {
        let mut result = sample();
        result.crashed = true;
        result.exit_status = Some(-11);
        let events = annotate(&result.events, None, Default::default());
        let mut out = Vec::new();
        print_run(&mut out, &events, &result, true).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains('\u{1b}'));
        assert!(text.contains("crashed"));
        assert!(text.contains("exit -11"));
    }
}
