use std::fmt::Write as _;

/// Parsed diff of one file.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DiffResult {
    pub path: String,
    /// Binary files carry no hunks.
    pub binary: bool,
    pub hunks: Vec<Hunk>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Hunk {
    pub old_start: u32,
    pub old_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
    /// Text after the closing `@@`, usually the enclosing function.
    pub section: String,
    pub lines: Vec<DiffLine>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DiffLine {
    pub kind: LineKind,
    /// Line text without the leading marker and without the newline.
    pub text: String,
    pub old_line: Option<u32>,
    pub new_line: Option<u32>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum LineKind {
    Context,
    Addition,
    Deletion,
    ContextNoNewline,
    AdditionNoNewline,
    DeletionNoNewline,
}

impl LineKind {
    fn marker(self) -> char {
        match self {
            LineKind::Context | LineKind::ContextNoNewline => ' ',
            LineKind::Addition | LineKind::AdditionNoNewline => '+',
            LineKind::Deletion | LineKind::DeletionNoNewline => '-',
        }
    }

    fn without_trailing_newline(self) -> Self {
        match self {
            LineKind::Context | LineKind::ContextNoNewline => LineKind::ContextNoNewline,
            LineKind::Addition | LineKind::AdditionNoNewline => LineKind::AdditionNoNewline,
            LineKind::Deletion | LineKind::DeletionNoNewline => LineKind::DeletionNoNewline,
        }
    }

    pub fn missing_newline(self) -> bool {
        matches!(
            self,
            LineKind::ContextNoNewline | LineKind::AdditionNoNewline | LineKind::DeletionNoNewline
        )
    }
}

impl DiffResult {
    /// Parses `git diff` output for a single file.
    ///
    /// Header lines are skipped, hunks are read by their declared line counts so a
    /// removed line starting with `--` is never mistaken for a file header.
    pub fn parse_unified(path: impl Into<String>, text: &str) -> Self {
        let mut result = DiffResult {
            path: path.into(),
            binary: false,
            hunks: Vec::new(),
        };

        let mut old_remaining = 0u32;
        let mut new_remaining = 0u32;
        let mut old_line = 0u32;
        let mut new_line = 0u32;

        for raw in text.lines() {
            if raw.starts_with('\\') {
                if let Some(last) = result.hunks.last_mut().and_then(|h| h.lines.last_mut()) {
                    last.kind = last.kind.without_trailing_newline();
                }
                continue;
            }

            if old_remaining == 0 && new_remaining == 0 {
                if raw.starts_with("Binary files ") || raw.starts_with("GIT binary patch") {
                    result.binary = true;
                    result.hunks.clear();
                    break;
                }
                if let Some(header) = parse_unified_hunk_header(raw) {
                    old_remaining = header.old_lines;
                    new_remaining = header.new_lines;
                    old_line = header.old_start;
                    new_line = header.new_start;
                    result.hunks.push(Hunk {
                        old_start: header.old_start,
                        old_lines: header.old_lines,
                        new_start: header.new_start,
                        new_lines: header.new_lines,
                        section: header.section.to_string(),
                        lines: Vec::new(),
                    });
                }
                continue;
            }

            let Some(hunk) = result.hunks.last_mut() else {
                continue;
            };
            let (marker, body) = match raw.chars().next() {
                Some(c) => (c, &raw[c.len_utf8()..]),
                // Some tools strip the space from empty context lines.
                None => (' ', ""),
            };
            let line = match marker {
                '+' => {
                    new_remaining = new_remaining.saturating_sub(1);
                    new_line += 1;
                    DiffLine {
                        kind: LineKind::Addition,
                        text: body.to_string(),
                        old_line: None,
                        new_line: Some(new_line - 1),
                    }
                }
                '-' => {
                    old_remaining = old_remaining.saturating_sub(1);
                    old_line += 1;
                    DiffLine {
                        kind: LineKind::Deletion,
                        text: body.to_string(),
                        old_line: Some(old_line - 1),
                        new_line: None,
                    }
                }
                _ => {
                    old_remaining = old_remaining.saturating_sub(1);
                    new_remaining = new_remaining.saturating_sub(1);
                    old_line += 1;
                    new_line += 1;
                    DiffLine {
                        kind: LineKind::Context,
                        text: body.to_string(),
                        old_line: Some(old_line - 1),
                        new_line: Some(new_line - 1),
                    }
                }
            };
            hunk.lines.push(line);
        }

        result
    }

    pub fn additions(&self) -> usize {
        self.count(|kind| matches!(kind, LineKind::Addition | LineKind::AdditionNoNewline))
    }

    pub fn deletions(&self) -> usize {
        self.count(|kind| matches!(kind, LineKind::Deletion | LineKind::DeletionNoNewline))
    }

    fn count(&self, pred: impl Fn(LineKind) -> bool) -> usize {
        self.hunks
            .iter()
            .flat_map(|h| h.lines.iter())
            .filter(|l| pred(l.kind))
            .count()
    }
}

/// A single-hunk patch suitable for `git apply`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Patch {
    pub path: String,
    pub text: String,
}

impl Patch {
    pub fn from_hunk(path: &str, hunk: &Hunk) -> Self {
        let mut text = String::new();
        let _ = writeln!(text, "diff --git a/{path} b/{path}");
        if hunk.old_start == 0 && hunk.old_lines == 0 {
            let _ = writeln!(text, "new file mode 100644");
            let _ = writeln!(text, "--- /dev/null");
        } else {
            let _ = writeln!(text, "--- a/{path}");
        }
        if hunk.new_start == 0 && hunk.new_lines == 0 {
            let _ = writeln!(text, "+++ /dev/null");
        } else {
            let _ = writeln!(text, "+++ b/{path}");
        }
        let _ = writeln!(
            text,
            "@@ -{},{} +{},{} @@",
            hunk.old_start, hunk.old_lines, hunk.new_start, hunk.new_lines
        );
        for line in &hunk.lines {
            text.push(line.kind.marker());
            text.push_str(&line.text);
            text.push('\n');
            if line.kind.missing_newline() {
                text.push_str("\\ No newline at end of file\n");
            }
        }
        Self {
            path: path.to_string(),
            text,
        }
    }
}

struct HunkHeader<'a> {
    old_start: u32,
    old_lines: u32,
    new_start: u32,
    new_lines: u32,
    section: &'a str,
}

fn parse_unified_hunk_header(text: &str) -> Option<HunkHeader<'_>> {
    // Formats:
    // @@ -l,s +l,s @@ section
    // @@ -l +l @@
    let rest = text.strip_prefix("@@ ")?;
    let (ranges, section) = rest.split_once(" @@")?;

    let mut it = ranges.split_whitespace();
    let (old_start, old_lines) = parse_range(it.next()?.strip_prefix('-')?)?;
    let (new_start, new_lines) = parse_range(it.next()?.strip_prefix('+')?)?;
    Some(HunkHeader {
        old_start,
        old_lines,
        new_start,
        new_lines,
        section: section.trim(),
    })
}

fn parse_range(s: &str) -> Option<(u32, u32)> {
    match s.split_once(',') {
        Some((start, len)) => Some((start.parse().ok()?, len.parse().ok()?)),
        None => Some((s.parse().ok()?, 1)),
    }
}
