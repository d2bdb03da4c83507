//! Translation of interpreter errors into [`JobError`]s
//!
//! Interpreter messages look like `main:3: attempt to index a nil value
//! (field 'd')` followed by a `stack traceback:` section. They are split into
//! location, detail and frames, classified into a stable error kind, and
//! shifted back into the user's coordinates via [`WrappedSource`].

use sluice_core::domain::job::{JobError, JobErrorKind};

use crate::wrap::{CHUNK_NAME, WrappedSource};

const TRACEBACK_MARKER: &str = "\nstack traceback:";
const REFERENCE_PREFIX: &str = "ReferenceError: ";
const REFERENCE_SUFFIX: &str = " is not defined";

/// Converts an interpreter error raised while compiling or running user code
pub fn translate(error: &mlua::Error, source: &WrappedSource<'_>) -> JobError {
    match error {
        mlua::Error::SyntaxError { message, .. } => from_syntax_error(message, source),
        mlua::Error::RuntimeError(message) => from_runtime_error(message, source),
        mlua::Error::MemoryError(_) => {
            JobError::new(JobErrorKind::RuntimeError, "memory limit exceeded")
        }
        mlua::Error::BadArgument { .. } => JobError::new(JobErrorKind::TypeError, error),
        mlua::Error::CallbackError { traceback, cause } => {
            let translated = translate(cause, source);
            if translated.stacktrace.is_empty() {
                translated.with_stacktrace(rewrite_stacktrace(traceback, source))
            } else {
                translated
            }
        }
        other => JobError::new(JobErrorKind::RuntimeError, other),
    }
}

fn from_syntax_error(message: &str, source: &WrappedSource<'_>) -> JobError {
    let (header, _) = split_traceback(message);
    match split_location(header) {
        Some((chunk_line, detail)) => {
            let (line, position) = source.locate(chunk_line, near_token(detail));
            JobError::new(JobErrorKind::SyntaxError, source.rewrite_line_refs(detail))
                .at(line, position)
        }
        None => JobError::new(JobErrorKind::SyntaxError, header),
    }
}

fn from_runtime_error(message: &str, source: &WrappedSource<'_>) -> JobError {
    let (header, traceback) = split_traceback(message);
    let stacktrace = rewrite_stacktrace(traceback, source);

    let Some((chunk_line, detail)) = split_location(header) else {
        let (kind, detail, _) = classify(header);
        return JobError::new(kind, detail).with_stacktrace(stacktrace);
    };

    let (kind, detail, token) = classify(detail);
    let (line, position) = source.locate(chunk_line, token);
    JobError::new(kind, detail)
        .at(line, position)
        .with_stacktrace(stacktrace)
}

/// Picks the error kind and the token worth pointing at
fn classify(detail: &str) -> (JobErrorKind, &str, Option<&str>) {
    if let Some(rest) = detail.strip_prefix(REFERENCE_PREFIX) {
        let name = rest.strip_suffix(REFERENCE_SUFFIX);
        return (JobErrorKind::ReferenceError, rest, name);
    }
    if detail.starts_with("attempt to ") || detail.starts_with("bad argument") {
        return (JobErrorKind::TypeError, detail, quoted_name(detail));
    }
    (JobErrorKind::RuntimeError, detail, None)
}

fn split_traceback(message: &str) -> (&str, &str) {
    match message.find(TRACEBACK_MARKER) {
        Some(idx) => (&message[..idx], &message[idx + TRACEBACK_MARKER.len()..]),
        None => (message, ""),
    }
}

/// Splits `main:<line>: <detail>` into its line and detail
fn split_location(message: &str) -> Option<(u32, &str)> {
    let rest = message.strip_prefix(CHUNK_NAME)?.strip_prefix(':')?;
    let (line, detail) = rest.split_once(':')?;
    let line = line.parse().ok()?;
    Some((line, detail.strip_prefix(' ').unwrap_or(detail)))
}

/// Token after `near` in a syntax error, e.g. `near 'end'` or `near <eof>`
fn near_token(detail: &str) -> Option<&str> {
    let (_, token) = detail.rsplit_once(" near ")?;
    if token == "<eof>" {
        return Some(token);
    }
    token.strip_prefix('\'')?.strip_suffix('\'')
}

/// Name in `(global 'x')`, `(field 'x')` and similar interpreter hints
fn quoted_name(detail: &str) -> Option<&str> {
    let start = detail.find(" '")? + 2;
    let len = detail[start..].find('\'')?;
    Some(&detail[start..start + len])
}

/// Keeps only frames inside user code, rewritten to user coordinates
///
/// Frames come out as `    at <function> (main:<line>)`.
fn rewrite_stacktrace(traceback: &str, source: &WrappedSource<'_>) -> Vec<String> {
    traceback
        .lines()
        .map(str::trim)
        .filter_map(|frame| {
            let (chunk_line, description) = split_location(frame)?;
            let function = frame_function(description, source)?;
            Some(format!(
                "    at {} ({}:{})",
                function,
                CHUNK_NAME,
                source.user_line(chunk_line)
            ))
        })
        .collect()
}

/// Function name of a traceback frame; `None` for the chunk itself
fn frame_function<'s>(description: &'s str, source: &WrappedSource<'_>) -> Option<&'s str> {
    let description = description.strip_prefix("in ").unwrap_or(description);
    if description == "main chunk" {
        return None;
    }
    if let Some(name) = quoted_name(description) {
        return Some(name);
    }
    let defined_at = description
        .rsplit_once(':')
        .and_then(|(_, line)| line.strip_suffix('>'))
        .and_then(|line| line.parse::<u32>().ok());
    match defined_at {
        Some(line) if source.is_header_line(line) => Some(CHUNK_NAME),
        _ => Some("anonymous"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wrap::wrap;

    #[test]
    fn test_syntax_error_points_at_token() {
        let source = wrap("syntax error");
        let error = from_syntax_error("main:2: syntax error near 'error'", &source);

        assert_eq!(error.name, JobErrorKind::SyntaxError);
        assert_eq!(error.message, "SyntaxError: syntax error near 'error'");
        assert_eq!((error.line_number, error.position), (1, 8));
        assert!(error.stacktrace.is_empty());
    }

    #[test]
    fn test_reference_error_strips_location() {
        let source = wrap("local x = 1\nreturn somethingThatIsntThere");
        let message = "main:3: ReferenceError: somethingThatIsntThere is not defined\n\
                       stack traceback:\n\
                       \t[C]: in function 'error'\n\
                       \tsandbox:3: in metamethod 'index'\n\
                       \tmain:3: in function <main:1>";
        let error = from_runtime_error(message, &source);

        assert_eq!(error.name, JobErrorKind::ReferenceError);
        assert_eq!(
            error.message,
            "ReferenceError: somethingThatIsntThere is not defined"
        );
        assert_eq!((error.line_number, error.position), (2, 8));
        assert_eq!(error.stacktrace, vec!["    at main (main:2)".to_string()]);
    }

    #[test]
    fn test_type_error_frames_are_rewritten() {
        let source = wrap("\nlocal function test(data)\n  data.d.e = 0\nend\nlocal r = test(data)\nreturn r");
        let message = "main:4: attempt to index a nil value (field 'd')\n\
                       stack traceback:\n\
                       \tmain:4: in local 'test'\n\
                       \tmain:6: in function <main:1>";
        let error = from_runtime_error(message, &source);

        assert_eq!(error.name, JobErrorKind::TypeError);
        assert_eq!((error.line_number, error.position), (3, 8));
        assert_eq!(
            error.stacktrace,
            vec![
                "    at test (main:3)".to_string(),
                "    at main (main:5)".to_string(),
            ]
        );
    }

    #[test]
    fn test_explicit_error_without_traceback() {
        let source = wrap("error('boom')");
        let error = from_runtime_error("main:2: boom", &source);

        assert_eq!(error.name, JobErrorKind::RuntimeError);
        assert_eq!(error.message, "RuntimeError: boom");
        assert_eq!(error.line_number, 1);
    }

    #[test]
    fn test_unlocated_runtime_error() {
        let source = wrap("error({})");
        let error = from_runtime_error("table: 0x5581", &source);

        assert_eq!(error.name, JobErrorKind::RuntimeError);
        assert_eq!((error.line_number, error.position), (0, 0));
    }

    #[test]
    fn test_anonymous_frames() {
        let source = wrap("local f = function() error('x') end\nf()");
        assert_eq!(frame_function("in function <main:2>", &source), Some("anonymous"));
        assert_eq!(frame_function("in function <main:1>", &source), Some("main"));
        assert_eq!(frame_function("in upvalue 'f'", &source), Some("f"));
        assert_eq!(frame_function("in main chunk", &source), None);
    }
}
