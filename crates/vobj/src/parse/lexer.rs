//! Logical-line extraction: undoes the RFC 5545 folding convention (a line
//! break followed by a space or tab) and, when asked to, the vCard 2.1
//! quoted-printable soft line break convention.

/// Splits folded input into logical lines paired with the 1-based physical
/// line number each one starts on.
///
/// With `allow_qp`, a line whose accumulated text ends in `=` and mentions
/// `quoted-printable` pulls the next physical line in with a `\n` joint, so
/// the soft break survives for the value decoder.
#[must_use]
pub fn logical_lines(input: &str, allow_qp: bool) -> Vec<(usize, String)> {
    if allow_qp {
        quoted_printable_scan(input)
    } else {
        unfold_scan(input)
    }
}

/// Single-pass scan for input with no quoted-printable concerns.
fn unfold_scan(input: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut start = 0;
    for (number, line) in physical_lines(input) {
        if let Some(rest) = strip_fold_prefix(line) {
            current.push_str(rest);
        } else {
            flush(&mut out, &mut current, start);
            start = number;
            current.push_str(line);
        }
    }
    flush(&mut out, &mut current, start);
    out
}

/// Line-at-a-time scan that tracks the quoted-printable state machine.
fn quoted_printable_scan(input: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut start = 0;
    let mut quoted_printable = false;
    for (number, line) in physical_lines(input) {
        if line.trim().is_empty() {
            flush(&mut out, &mut current, start);
            start = number;
            quoted_printable = false;
            continue;
        }
        if quoted_printable {
            current.push('\n');
            current.push_str(line);
        } else if let Some(rest) = strip_fold_prefix(line) {
            current.push_str(rest);
        } else {
            flush(&mut out, &mut current, start);
            start = number;
            current.push_str(line);
        }
        // vCard 2.1 soft line break. False positives are unlikely here
        // since the marker parameter must already be on the line.
        quoted_printable =
            current.ends_with('=') && current.to_lowercase().contains("quoted-printable");
    }
    flush(&mut out, &mut current, start);
    out
}

fn flush(out: &mut Vec<(usize, String)>, current: &mut String, start: usize) {
    if !current.trim().is_empty() {
        out.push((start, std::mem::take(current)));
    } else {
        current.clear();
    }
}

fn strip_fold_prefix(line: &str) -> Option<&str> {
    line.strip_prefix(' ').or_else(|| line.strip_prefix('\t'))
}

/// Iterates physical lines, accepting `\r\n`, `\n`, and bare `\r` endings,
/// yielding 1-based line numbers.
fn physical_lines(input: &str) -> impl Iterator<Item = (usize, &str)> {
    let mut rest = input;
    let mut number = 0;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        number += 1;
        let (line, remainder) = match rest.find(['\r', '\n']) {
            Some(at) => {
                let line = &rest[..at];
                let skip = if rest[at..].starts_with("\r\n") { 2 } else { 1 };
                (line, &rest[at + skip..])
            }
            None => (rest, ""),
        };
        rest = remainder;
        Some((number, line))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfolds_continuation_lines() {
        let lines = logical_lines("DESCRIPTION:Hello\r\n  world\r\nSUMMARY:x\r\n", false);
        assert_eq!(
            lines,
            vec![
                (1, "DESCRIPTION:Hello world".to_owned()),
                (3, "SUMMARY:x".to_owned()),
            ]
        );
    }

    #[test]
    fn tab_continuation_and_bare_newlines() {
        let lines = logical_lines("A:1\n\tcont\nB:2", false);
        assert_eq!(
            lines,
            vec![(1, "A:1cont".to_owned()), (3, "B:2".to_owned())]
        );
    }

    #[test]
    fn blank_lines_are_dropped() {
        let lines = logical_lines("A:1\r\n\r\nB:2\r\n", false);
        assert_eq!(lines, vec![(1, "A:1".to_owned()), (3, "B:2".to_owned())]);
    }

    #[test]
    fn quoted_printable_soft_break_joins_with_newline() {
        let input = "LABEL;ENCODING=QUOTED-PRINTABLE:Silicon Alley 90210=\r\nNew York, New York\r\nFN:x\r\n";
        let lines = logical_lines(input, true);
        assert_eq!(
            lines[0].1,
            "LABEL;ENCODING=QUOTED-PRINTABLE:Silicon Alley 90210=\nNew York, New York"
        );
        assert_eq!(lines[1].1, "FN:x");
    }

    #[test]
    fn quoted_printable_multiple_continuations() {
        let input = "NOTE;ENCODING=QUOTED-PRINTABLE:this is an evil=\r\n evil=\r\n format.\r\n";
        let lines = logical_lines(input, true);
        assert_eq!(
            lines[0].1,
            "NOTE;ENCODING=QUOTED-PRINTABLE:this is an evil=\n evil=\n format."
        );
    }

    #[test]
    fn qp_flag_resets_on_blank_line() {
        let input = "NOTE;ENCODING=QUOTED-PRINTABLE:evil=\r\n\r\nFN:x\r\n";
        let lines = logical_lines(input, true);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].1, "FN:x");
    }
}
