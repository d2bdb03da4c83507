//! Source wrapping
//!
//! User code is the body of an implicit `main(data)` function. The wrapper
//! adds lines around it, so every location the interpreter reports has to be
//! shifted back into the user's coordinates. All of that bookkeeping lives in
//! this module; changing the template only requires updating the constants
//! below.

/// Chunk name reported in interpreter messages and tracebacks
pub const CHUNK_NAME: &str = "main";

const PREFIX: &str = "return function(data)\n";
const SUFFIX: &str = "\nend";

/// Number of lines `PREFIX` places before the first user line
const PREFIX_LINES: u32 = 1;

/// User code together with its wrapped form
#[derive(Debug)]
pub struct WrappedSource<'a> {
    user: &'a str,
    text: String,
}

/// Wraps user code into a chunk that evaluates to the `main(data)` function
pub fn wrap(code: &str) -> WrappedSource<'_> {
    WrappedSource {
        user: code,
        text: format!("{}{}{}", PREFIX, code, SUFFIX),
    }
}

impl<'a> WrappedSource<'a> {
    /// The chunk handed to the interpreter
    pub fn text(&self) -> &str {
        &self.text
    }

    fn user_lines(&self) -> Vec<&'a str> {
        let lines: Vec<&str> = self.user.lines().collect();
        if lines.is_empty() { vec![""] } else { lines }
    }

    /// Whether a chunk line belongs to the wrapper's function header
    pub fn is_header_line(&self, chunk_line: u32) -> bool {
        chunk_line <= PREFIX_LINES
    }

    /// Maps a chunk line to a 1-based user line
    ///
    /// Lines inside the suffix are reported on the last user line.
    pub fn user_line(&self, chunk_line: u32) -> u32 {
        let last = self.user_lines().len() as u32;
        chunk_line.saturating_sub(PREFIX_LINES).clamp(1, last)
    }

    /// Maps a chunk line to `(line, position)` in user coordinates
    ///
    /// `token` is the offending token named by the interpreter, if any. The
    /// position is the 1-based column of its first occurrence on the line,
    /// or 0 when it cannot be found. Errors located past the user code point
    /// just after the last user character.
    pub fn locate(&self, chunk_line: u32, token: Option<&str>) -> (u32, u32) {
        let lines = self.user_lines();
        let line = self.user_line(chunk_line);
        let text = lines[(line - 1) as usize];
        let end_of_input = (text.chars().count() + 1) as u32;

        if chunk_line.saturating_sub(PREFIX_LINES) > lines.len() as u32 {
            return (line, end_of_input);
        }

        let position = match token {
            Some("<eof>") => end_of_input,
            Some(token) => find_token(text, token)
                .map(|idx| (text[..idx].chars().count() + 1) as u32)
                .unwrap_or(0),
            None => 0,
        };
        (line, position)
    }

    /// Rewrites `at line N` references inside an interpreter message
    pub fn rewrite_line_refs(&self, message: &str) -> String {
        const MARKER: &str = "at line ";
        let mut out = String::with_capacity(message.len());
        let mut rest = message;
        while let Some(idx) = rest.find(MARKER) {
            let (head, tail) = rest.split_at(idx + MARKER.len());
            out.push_str(head);
            let digits: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
            match digits.parse::<u32>() {
                Ok(chunk_line) => out.push_str(&self.user_line(chunk_line).to_string()),
                Err(_) => out.push_str(&digits),
            }
            rest = &tail[digits.len()..];
        }
        out.push_str(rest);
        out
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Finds `token` in `line`; identifiers only match on word boundaries
fn find_token(line: &str, token: &str) -> Option<usize> {
    if token.is_empty() {
        return None;
    }
    if !token.chars().all(is_identifier_char) {
        return line.find(token);
    }

    let mut start = 0;
    while let Some(found) = line[start..].find(token) {
        let idx = start + found;
        let end = idx + token.len();
        let before = line[..idx].chars().next_back();
        let after = line[end..].chars().next();
        if !before.is_some_and(is_identifier_char) && !after.is_some_and(is_identifier_char) {
            return Some(idx);
        }
        start = end;
    }
    None
}
