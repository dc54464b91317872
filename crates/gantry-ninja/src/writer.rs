//! Low-level manifest writer.
//!
//! Pure serialization: every value arriving here is already rendered and
//! escaped. The writer's own responsibilities are statement syntax,
//! stable formatting, and wrapping long lines at 80 columns with `$`
//! continuations on unescaped spaces.

use std::io::{self, Write};

const LINE_WIDTH: usize = 80;
const INDENT: &str = "    ";

/// Serializes manifest statements to an output stream.
pub struct Writer<W: Write> {
    w: W,
}

impl<W: Write> Writer<W> {
    pub fn new(w: W) -> Self {
        Self { w }
    }

    pub fn into_inner(self) -> W {
        self.w
    }

    /// Write a `# ...` comment, wrapped at the line width on word breaks.
    pub fn comment(&mut self, text: &str) -> io::Result<()> {
        let mut line = String::from("#");
        for word in text.split_whitespace() {
            if line.len() + 1 + word.len() > LINE_WIDTH && line.len() > 1 {
                writeln!(self.w, "{}", line)?;
                line = String::from("#");
            }
            line.push(' ');
            line.push_str(word);
        }
        writeln!(self.w, "{}", line)
    }

    pub fn blank_line(&mut self) -> io::Result<()> {
        writeln!(self.w)
    }

    /// Write a global `name = value` assignment.
    pub fn variable(&mut self, name: &str, value: &str) -> io::Result<()> {
        self.wrapped(format!("{} = {}", name, value), INDENT)
    }

    /// Write an indented `    name = value` under a rule, pool, or edge.
    pub fn scoped_variable(&mut self, name: &str, value: &str) -> io::Result<()> {
        self.wrapped(
            format!("{}{} = {}", INDENT, name, value),
            "        ",
        )
    }

    /// Write a `pool` declaration with its depth.
    pub fn pool(&mut self, name: &str, depth: i32) -> io::Result<()> {
        writeln!(self.w, "pool {}", name)?;
        self.scoped_variable("depth", &depth.to_string())
    }

    /// Write a `rule` declaration; the caller follows with
    /// `scoped_variable` for each parameter.
    pub fn rule(&mut self, name: &str) -> io::Result<()> {
        writeln!(self.w, "rule {}", name)
    }

    /// Write a build line. All paths must already be path-escaped.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        &mut self,
        outputs: &[String],
        implicit_outputs: &[String],
        rule: &str,
        inputs: &[String],
        implicits: &[String],
        order_only: &[String],
        validations: &[String],
    ) -> io::Result<()> {
        let mut line = String::from("build");
        for out in outputs {
            line.push(' ');
            line.push_str(out);
        }
        if !implicit_outputs.is_empty() {
            line.push_str(" |");
            for out in implicit_outputs {
                line.push(' ');
                line.push_str(out);
            }
        }
        line.push_str(": ");
        line.push_str(rule);
        for input in inputs {
            line.push(' ');
            line.push_str(input);
        }
        if !implicits.is_empty() {
            line.push_str(" |");
            for path in implicits {
                line.push(' ');
                line.push_str(path);
            }
        }
        if !order_only.is_empty() {
            line.push_str(" ||");
            for path in order_only {
                line.push(' ');
                line.push_str(path);
            }
        }
        if !validations.is_empty() {
            line.push_str(" |@");
            for path in validations {
                line.push(' ');
                line.push_str(path);
            }
        }
        self.wrapped(line, INDENT)
    }

    pub fn default(&mut self, targets: &[String]) -> io::Result<()> {
        let mut line = String::from("default");
        for t in targets {
            line.push(' ');
            line.push_str(t);
        }
        self.wrapped(line, INDENT)
    }

    pub fn subninja(&mut self, path: &str) -> io::Result<()> {
        writeln!(self.w, "subninja {}", path)
    }

    /// Write a line, breaking at unescaped spaces past the line width with
    /// ` $` continuations.
    fn wrapped(&mut self, line: String, cont_indent: &str) -> io::Result<()> {
        let mut line = line;
        loop {
            if line.len() <= LINE_WIDTH {
                return writeln!(self.w, "{}", line);
            }
            let leading = line.len() - line.trim_start_matches(' ').len();
            let limit = LINE_WIDTH - 2;
            let breaks = breakable_spaces(&line);
            let pick = breaks
                .iter()
                .copied()
                .filter(|&i| i > leading && i <= limit)
                .max()
                .or_else(|| breaks.into_iter().find(|&i| i > leading));
            match pick {
                Some(i) if i > cont_indent.len() => {
                    writeln!(self.w, "{} $", &line[..i])?;
                    line = format!("{}{}", cont_indent, &line[i + 1..]);
                }
                _ => return writeln!(self.w, "{}", line),
            }
        }
    }
}

/// Byte offsets of spaces that are legal break points: not escaped by an
/// odd run of `$`.
fn breakable_spaces(line: &str) -> Vec<usize> {
    let bytes = line.as_bytes();
    let mut out = Vec::new();
    for (i, &b) in bytes.iter().enumerate() {
        if b != b' ' {
            continue;
        }
        let mut dollars = 0;
        let mut j = i;
        while j > 0 && bytes[j - 1] == b'$' {
            dollars += 1;
            j -= 1;
        }
        if dollars % 2 == 0 {
            out.push(i);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn render<F: FnOnce(&mut Writer<&mut Vec<u8>>)>(f: F) -> String {
        let mut buf = Vec::new();
        let mut w = Writer::new(&mut buf);
        f(&mut w);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn variable_line() {
        let out = render(|w| w.variable("g.tools.cc", "gcc").unwrap());
        assert_eq!(out, "g.tools.cc = gcc\n");
    }

    #[test]
    fn build_line_sections() {
        let out = render(|w| {
            w.build(
                &["out/a.o".into()],
                &["out/a.d".into()],
                "g.tools.compile",
                &["a.c".into()],
                &["hdr.h".into()],
                &["gen".into()],
                &["check".into()],
            )
            .unwrap()
        });
        assert_eq!(
            out,
            "build out/a.o | out/a.d: g.tools.compile a.c | hdr.h || gen |@ check\n"
        );
    }

    #[test]
    fn long_lines_wrap_at_80_with_continuation() {
        let inputs: Vec<String> = (0..12).map(|i| format!("dir/source_file_{}.c", i)).collect();
        let out = render(|w| {
            w.build(&["out".into()], &[], "cc", &inputs, &[], &[], &[])
                .unwrap()
        });
        for line in out.lines() {
            assert!(line.len() <= 80, "line too long: {:?}", line);
        }
        assert!(out.contains(" $\n"));
        // Reassembling the wrapped line restores every input.
        let unwrapped = out.replace(" $\n    ", " ");
        for input in &inputs {
            assert!(unwrapped.contains(input.as_str()));
        }
    }

    #[test]
    fn escaped_spaces_are_not_break_points() {
        let breaks = breakable_spaces("a$ b c$$ d");
        // "$ " is escaped (1 dollar); "$$ " is a literal dollar then space.
        assert_eq!(breaks, vec![4, 8]);
    }

    #[test]
    fn comment_wraps() {
        let text = "word ".repeat(30);
        let out = render(|w| w.comment(&text).unwrap());
        for line in out.lines() {
            assert!(line.starts_with('#'));
            assert!(line.len() <= 80);
        }
    }

    #[test]
    fn pool_and_rule_shapes() {
        let out = render(|w| {
            w.pool("g.tools.io", 4).unwrap();
            w.rule("g.tools.compile").unwrap();
            w.scoped_variable("command", "$cc -c $in -o $out").unwrap();
        });
        assert_eq!(
            out,
            "pool g.tools.io\n    depth = 4\nrule g.tools.compile\n    command = $cc -c $in -o $out\n"
        );
    }
}
