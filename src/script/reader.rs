//! Recursive-descent primitives for the line-oriented formats.
//!
//! A [`SourceReader`] owns a comment-stripped copy of the source and a
//! cursor with line/column bookkeeping for error positions. Each primitive
//! either consumes input and returns `Ok`, or leaves the cursor where it
//! failed and returns a positioned parse error; callers checkpoint and
//! restore to express optional syntax.

use crate::errors::QuestError;

/// Case class of a name's first letter. The formats use case to separate
/// namespaces: relations/types/actions/quests are upper-first, objects and
/// groups lower-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Case {
    Both,
    Upper,
    Lower,
}

/// Cursor position, for checkpoint/restore backtracking.
#[derive(Debug, Clone, Copy)]
pub struct Checkpoint {
    pos: usize,
    line: usize,
    col: usize,
}

/// Character cursor over one source file.
pub struct SourceReader {
    file: String,
    src: Vec<u8>,
    pos: usize,
    line: usize,
    col: usize,
}

impl SourceReader {
    /// Strip `#` comments (to end of line), keep line structure, and
    /// guarantee a trailing newline.
    pub fn new(file: impl Into<String>, source: &str) -> Self {
        let mut text = String::with_capacity(source.len() + 1);
        let mut in_comment = false;
        for ch in source.chars() {
            if ch == '#' {
                in_comment = true;
            }
            if ch == '\r' || ch == '\n' {
                in_comment = false;
            }
            if !in_comment {
                text.push(ch);
            }
        }
        text.push('\n');
        Self {
            file: file.into(),
            src: text.into_bytes(),
            pos: 0,
            line: 0,
            col: 0,
        }
    }

    pub fn error(&self, message: impl Into<String>) -> QuestError {
        QuestError::Parse {
            file: self.file.clone(),
            line: self.line + 1,
            col: self.col + 1,
            message: message.into(),
        }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            pos: self.pos,
            line: self.line,
            col: self.col,
        }
    }

    pub fn restore(&mut self, cp: Checkpoint) {
        self.pos = cp.pos;
        self.line = cp.line;
        self.col = cp.col;
    }

    fn peek(&self) -> u8 {
        self.src.get(self.pos).copied().unwrap_or(0)
    }

    fn bump(&mut self) {
        self.pos += 1;
        self.col += 1;
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    /// Consume at least `min` spaces or tabs.
    pub fn space(&mut self, min: usize) -> Result<(), QuestError> {
        let mut count = 0;
        while self.peek() == b' ' || self.peek() == b'\t' {
            self.bump();
            count += 1;
        }
        if count < min {
            return Err(self.error("expecting whitespace"));
        }
        Ok(())
    }

    /// Consume one line ending (LF, CRLF, or CR).
    pub fn next_line(&mut self) -> Result<(), QuestError> {
        match self.peek() {
            b'\n' => {
                self.pos += 1;
            }
            b'\r' => {
                self.pos += 1;
                if self.peek() == b'\n' {
                    self.pos += 1;
                }
            }
            _ => return Err(self.error("expecting a new line")),
        }
        self.line += 1;
        self.col = 0;
        Ok(())
    }

    /// Skip whitespace-only lines. When the cursor sits mid-line before
    /// content, nothing moves.
    pub fn empty_lines(&mut self) {
        loop {
            let cp = self.checkpoint();
            let _ = self.space(0);
            if self.next_line().is_err() {
                self.restore(cp);
                return;
            }
        }
    }

    /// Match a literal keyword, requiring a word boundary after it.
    pub fn keyword(&mut self, word: &str) -> Result<(), QuestError> {
        let bytes = word.as_bytes();
        for (i, &b) in bytes.iter().enumerate() {
            if self.src.get(self.pos + i).copied() != Some(b) {
                return Err(self.error(format!("expecting keyword `{word}`")));
            }
        }
        let after = self.src.get(self.pos + bytes.len()).copied().unwrap_or(0);
        if after == b'_' || after.is_ascii_alphanumeric() {
            return Err(self.error(format!("expecting keyword `{word}`")));
        }
        self.pos += bytes.len();
        self.col += bytes.len();
        Ok(())
    }

    /// Parse a non-negative integer.
    pub fn pos_int(&mut self) -> Result<usize, QuestError> {
        let start = self.pos;
        while self.peek().is_ascii_digit() {
            self.bump();
        }
        if start == self.pos {
            return Err(self.error("expecting a number"));
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).expect("digits are ASCII");
        text.parse()
            .map_err(|_| self.error("number is out of range"))
    }

    /// Parse a name: a letter (of the given case class) followed by
    /// letters, digits, and underscores.
    pub fn name(&mut self, case: Case) -> Result<String, QuestError> {
        let first = self.peek();
        let ok = match case {
            Case::Both => first.is_ascii_alphabetic(),
            Case::Upper => first.is_ascii_uppercase(),
            Case::Lower => first.is_ascii_lowercase(),
        };
        if !ok {
            let what = match case {
                Case::Both => "a letter",
                Case::Upper => "an uppercase letter",
                Case::Lower => "a lowercase letter",
            };
            return Err(self.error(format!("expecting a name starting with {what}")));
        }
        let start = self.pos;
        while self.peek() == b'_' || self.peek().is_ascii_alphanumeric() {
            self.bump();
        }
        Ok(std::str::from_utf8(&self.src[start..self.pos])
            .expect("names are ASCII")
            .to_string())
    }

    fn punct(&mut self, ch: u8, what: &str) -> Result<(), QuestError> {
        if self.peek() != ch {
            return Err(self.error(format!("expecting `{what}`")));
        }
        self.bump();
        Ok(())
    }

    pub fn colon(&mut self) -> Result<(), QuestError> {
        self.punct(b':', ":")
    }

    /// A colon, optionally surrounded by spaces.
    pub fn colon_with_spaces(&mut self) -> Result<(), QuestError> {
        self.space(0)?;
        self.colon()?;
        self.space(0)
    }

    pub fn comma(&mut self) -> Result<(), QuestError> {
        self.punct(b',', ",")
    }

    pub fn par_open(&mut self) -> Result<(), QuestError> {
        self.punct(b'(', "(")
    }

    pub fn par_close(&mut self) -> Result<(), QuestError> {
        self.punct(b')', ")")
    }

    pub fn bracket_open(&mut self) -> Result<(), QuestError> {
        self.punct(b'[', "[")
    }

    pub fn bracket_close(&mut self) -> Result<(), QuestError> {
        self.punct(b']', "]")
    }

    pub fn curly_open(&mut self) -> Result<(), QuestError> {
        self.punct(b'{', "{")
    }

    pub fn curly_close(&mut self) -> Result<(), QuestError> {
        self.punct(b'}', "}")
    }

    /// Parse a vertical list: one name per line, each with at least one
    /// leading space. Stops (without error) at the first line that does
    /// not match.
    pub fn name_list(&mut self, case: Case) -> Vec<String> {
        let mut out = Vec::new();
        loop {
            let cp = self.checkpoint();
            self.empty_lines();
            let ok = (|| -> Result<String, QuestError> {
                self.space(1)?;
                let name = self.name(case)?;
                self.space(0)?;
                self.next_line()?;
                Ok(name)
            })();
            match ok {
                Ok(name) => out.push(name),
                Err(_) => {
                    self.restore(cp);
                    break;
                }
            }
        }
        out
    }

    /// The rest of the current line, trimmed on the right. Used for file
    /// paths, which are not names.
    pub fn rest_of_line(&mut self) -> String {
        let start = self.pos;
        while self.peek() != 0 && self.peek() != b'\n' && self.peek() != b'\r' {
            self.bump();
        }
        std::str::from_utf8(&self.src[start..self.pos])
            .unwrap_or("")
            .trim_end()
            .to_string()
    }
}
