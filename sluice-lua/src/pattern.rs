//! Lua string patterns under the run's deadline
//!
//! The interpreter's own `find`, `match`, `gmatch` and `gsub` run in C, where
//! the instruction hook never fires, so a backtracking pattern could keep
//! running long after the timeout. These replacements follow the same
//! matching rules but spend from a work budget that checks the deadline while
//! they backtrack. `string.rep` is capped at the memory limit.

use mlua::{Function, Integer, Lua, MultiValue, Table, Value};

use crate::sandbox::Deadline;

const MAX_CAPTURES: usize = 32;
const MAX_MATCH_DEPTH: usize = 200;
/// Steps spent between two deadline checks
const CHECK_INTERVAL: u64 = 1 << 14;
const ESC: u8 = b'%';
const SPECIALS: &[u8] = b"^$*+?.([%-";

type SearchArgs = (mlua::String, mlua::String, Option<Integer>, Option<bool>);
type GsubArgs = (mlua::String, mlua::String, Value, Option<Integer>);

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MatchError {
    Pattern(String),
    TimedOut,
}

impl MatchError {
    fn pattern(message: impl Into<String>) -> Self {
        MatchError::Pattern(message.into())
    }
}

impl From<MatchError> for mlua::Error {
    fn from(err: MatchError) -> Self {
        match err {
            MatchError::Pattern(message) => mlua::Error::runtime(message),
            MatchError::TimedOut => mlua::Error::runtime("execution timed out"),
        }
    }
}

/// Work counter checking the deadline every [`CHECK_INTERVAL`] steps
struct Budget<'d> {
    deadline: Option<&'d Deadline>,
    spent: u64,
}

impl<'d> Budget<'d> {
    fn new(deadline: Option<&'d Deadline>) -> Self {
        Self { deadline, spent: 0 }
    }

    fn spend(&mut self, steps: u64) -> Result<(), MatchError> {
        self.spent += steps;
        if self.spent < CHECK_INTERVAL {
            return Ok(());
        }
        self.spent = 0;
        match self.deadline {
            Some(deadline) if deadline.expired() => Err(MatchError::TimedOut),
            _ => Ok(()),
        }
    }
}

/// A captured substring, or the 1-based position of a `()` capture
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Captured<'a> {
    Text(&'a [u8]),
    Position(usize),
}

#[derive(Debug, Clone, Copy)]
enum CaptureLen {
    Unfinished,
    Position,
    Closed(usize),
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    init: usize,
    len: CaptureLen,
}

/// Byte range of a match plus its explicit captures
#[derive(Debug, PartialEq)]
pub(crate) struct Match<'a> {
    pub start: usize,
    pub end: usize,
    pub captures: Vec<Captured<'a>>,
}

struct MatchState<'a> {
    src: &'a [u8],
    pat: &'a [u8],
    slots: Vec<Slot>,
    depth: usize,
    budget: Budget<'a>,
}

impl<'a> MatchState<'a> {
    fn new(src: &'a [u8], pat: &'a [u8], deadline: Option<&'a Deadline>) -> Self {
        Self {
            src,
            pat,
            slots: Vec::new(),
            depth: MAX_MATCH_DEPTH,
            budget: Budget::new(deadline),
        }
    }

    fn reset(&mut self) {
        self.slots.clear();
        self.depth = MAX_MATCH_DEPTH;
    }

    /// Pattern byte at `p`, `0` past the end
    fn pat_at(&self, p: usize) -> u8 {
        self.pat.get(p).copied().unwrap_or(0)
    }

    fn src_at(&self, s: usize) -> u8 {
        self.src.get(s).copied().unwrap_or(0)
    }

    /// Matches the pattern from `p` against the subject from `s`
    ///
    /// Returns the end of the match.
    fn do_match(&mut self, s: usize, p: usize) -> Result<Option<usize>, MatchError> {
        if self.depth == 0 {
            return Err(MatchError::pattern("pattern too complex"));
        }
        self.depth -= 1;
        let result = self.match_here(s, p);
        self.depth += 1;
        result
    }

    fn match_here(&mut self, mut s: usize, mut p: usize) -> Result<Option<usize>, MatchError> {
        loop {
            self.budget.spend(1)?;
            if p == self.pat.len() {
                return Ok(Some(s));
            }
            match self.pat[p] {
                b'(' if self.pat_at(p + 1) == b')' => {
                    return self.start_capture(s, p + 2, CaptureLen::Position);
                }
                b'(' => return self.start_capture(s, p + 1, CaptureLen::Unfinished),
                b')' => return self.end_capture(s, p + 1),
                b'$' if p + 1 == self.pat.len() => {
                    return Ok((s == self.src.len()).then_some(s));
                }
                ESC if self.pat_at(p + 1) == b'b' => match self.match_balance(s, p + 2)? {
                    Some(end) => {
                        s = end;
                        p += 4;
                    }
                    None => return Ok(None),
                },
                ESC if self.pat_at(p + 1) == b'f' => {
                    p += 2;
                    if self.pat_at(p) != b'[' {
                        return Err(MatchError::pattern("missing '[' after '%f' in pattern"));
                    }
                    let ep = self.class_end(p)?;
                    let previous = if s == 0 { 0 } else { self.src[s - 1] };
                    let current = self.src_at(s);
                    if match_bracket_class(previous, self.pat, p, ep - 1)
                        || !match_bracket_class(current, self.pat, p, ep - 1)
                    {
                        return Ok(None);
                    }
                    p = ep;
                }
                ESC if self.pat_at(p + 1).is_ascii_digit() => {
                    match self.match_capture(s, self.pat[p + 1])? {
                        Some(end) => {
                            s = end;
                            p += 2;
                        }
                        None => return Ok(None),
                    }
                }
                _ => {
                    let ep = self.class_end(p)?;
                    let suffix = self.pat_at(ep);
                    if !self.single_match(s, p, ep) {
                        if matches!(suffix, b'*' | b'?' | b'-') {
                            p = ep + 1;
                            continue;
                        }
                        return Ok(None);
                    }
                    match suffix {
                        b'?' => {
                            if let Some(end) = self.do_match(s + 1, ep + 1)? {
                                return Ok(Some(end));
                            }
                            p = ep + 1;
                        }
                        b'+' => return self.max_expand(s + 1, p, ep),
                        b'*' => return self.max_expand(s, p, ep),
                        b'-' => return self.min_expand(s, p, ep),
                        _ => {
                            s += 1;
                            p = ep;
                        }
                    }
                }
            }
        }
    }

    /// End of the single-character class starting at `p`
    fn class_end(&self, p: usize) -> Result<usize, MatchError> {
        let mut p = p;
        let c = self.pat[p];
        p += 1;
        match c {
            ESC if p >= self.pat.len() => Err(MatchError::pattern(
                "malformed pattern (ends with '%')",
            )),
            ESC => Ok(p + 1),
            b'[' => {
                if self.pat_at(p) == b'^' {
                    p += 1;
                }
                loop {
                    if p >= self.pat.len() {
                        return Err(MatchError::pattern("malformed pattern (missing ']')"));
                    }
                    let c = self.pat[p];
                    p += 1;
                    if c == ESC && p < self.pat.len() {
                        p += 1;
                    }
                    if self.pat_at(p) == b']' {
                        return Ok(p + 1);
                    }
                }
            }
            _ => Ok(p),
        }
    }

    fn single_match(&self, s: usize, p: usize, ep: usize) -> bool {
        let Some(&c) = self.src.get(s) else {
            return false;
        };
        match self.pat[p] {
            b'.' => true,
            ESC => match_class(c, self.pat[p + 1]),
            b'[' => match_bracket_class(c, self.pat, p, ep - 1),
            literal => literal == c,
        }
    }

    fn max_expand(&mut self, s: usize, p: usize, ep: usize) -> Result<Option<usize>, MatchError> {
        let mut i = 0;
        while self.single_match(s + i, p, ep) {
            i += 1;
        }
        self.budget.spend(i as u64)?;
        loop {
            if let Some(end) = self.do_match(s + i, ep + 1)? {
                return Ok(Some(end));
            }
            if i == 0 {
                return Ok(None);
            }
            i -= 1;
        }
    }

    fn min_expand(&mut self, s: usize, p: usize, ep: usize) -> Result<Option<usize>, MatchError> {
        let mut s = s;
        loop {
            if let Some(end) = self.do_match(s, ep + 1)? {
                return Ok(Some(end));
            }
            if !self.single_match(s, p, ep) {
                return Ok(None);
            }
            s += 1;
        }
    }

    fn start_capture(
        &mut self,
        s: usize,
        p: usize,
        len: CaptureLen,
    ) -> Result<Option<usize>, MatchError> {
        if self.slots.len() >= MAX_CAPTURES {
            return Err(MatchError::pattern("too many captures"));
        }
        self.slots.push(Slot { init: s, len });
        let result = self.do_match(s, p)?;
        if result.is_none() {
            self.slots.pop();
        }
        Ok(result)
    }

    fn end_capture(&mut self, s: usize, p: usize) -> Result<Option<usize>, MatchError> {
        let open = self
            .slots
            .iter()
            .rposition(|slot| matches!(slot.len, CaptureLen::Unfinished))
            .ok_or_else(|| MatchError::pattern("invalid pattern capture"))?;
        self.slots[open].len = CaptureLen::Closed(s - self.slots[open].init);
        let result = self.do_match(s, p)?;
        if result.is_none() {
            self.slots[open].len = CaptureLen::Unfinished;
        }
        Ok(result)
    }

    fn match_balance(&mut self, s: usize, p: usize) -> Result<Option<usize>, MatchError> {
        if p + 1 >= self.pat.len() {
            return Err(MatchError::pattern(
                "malformed pattern (missing arguments to '%b')",
            ));
        }
        let (open, close) = (self.pat[p], self.pat[p + 1]);
        if self.src.get(s) != Some(&open) {
            return Ok(None);
        }

        let mut depth = 1;
        for (offset, &c) in self.src[s + 1..].iter().enumerate() {
            if c == close {
                depth -= 1;
                if depth == 0 {
                    self.budget.spend(offset as u64)?;
                    return Ok(Some(s + offset + 2));
                }
            } else if c == open {
                depth += 1;
            }
        }
        self.budget.spend((self.src.len() - s) as u64)?;
        Ok(None)
    }

    /// Back reference `%1`..`%9`
    fn match_capture(&mut self, s: usize, digit: u8) -> Result<Option<usize>, MatchError> {
        let index = (digit as usize).checked_sub(b'1' as usize);
        let slot = match index.and_then(|i| self.slots.get(i)) {
            Some(slot) if !matches!(slot.len, CaptureLen::Unfinished) => *slot,
            _ => {
                return Err(MatchError::Pattern(format!(
                    "invalid capture index %{} in pattern",
                    digit - b'0'
                )));
            }
        };
        let CaptureLen::Closed(len) = slot.len else {
            return Ok(None);
        };
        self.budget.spend(len as u64)?;
        let matches = self.src.len() - s >= len
            && self.src[slot.init..slot.init + len] == self.src[s..s + len];
        Ok(matches.then_some(s + len))
    }

    /// Capture `i`; with no explicit captures, index 0 is the whole match
    fn capture(&self, i: usize, s: usize, e: usize) -> Result<Captured<'a>, MatchError> {
        let src: &'a [u8] = self.src;
        let Some(slot) = self.slots.get(i) else {
            if i != 0 {
                return Err(MatchError::Pattern(format!("invalid capture index %{}", i + 1)));
            }
            return Ok(Captured::Text(&src[s..e]));
        };
        match slot.len {
            CaptureLen::Unfinished => Err(MatchError::pattern("unfinished capture")),
            CaptureLen::Position => Ok(Captured::Position(slot.init + 1)),
            CaptureLen::Closed(len) => Ok(Captured::Text(&src[slot.init..slot.init + len])),
        }
    }

    /// Explicit captures, or the whole match when `whole` is given and there
    /// are none
    fn captures(&self, whole: Option<(usize, usize)>) -> Result<Vec<Captured<'a>>, MatchError> {
        let (s, e) = whole.unwrap_or((0, 0));
        let count = if self.slots.is_empty() && whole.is_some() {
            1
        } else {
            self.slots.len()
        };
        (0..count).map(|i| self.capture(i, s, e)).collect()
    }
}

fn match_class(c: u8, class: u8) -> bool {
    let res = match class.to_ascii_lowercase() {
        b'a' => c.is_ascii_alphabetic(),
        b'c' => c.is_ascii_control(),
        b'd' => c.is_ascii_digit(),
        b'g' => c.is_ascii_graphic(),
        b'l' => c.is_ascii_lowercase(),
        b'p' => c.is_ascii_punctuation(),
        b's' => matches!(c, b' ' | b'\t'..=b'\r'),
        b'u' => c.is_ascii_uppercase(),
        b'w' => c.is_ascii_alphanumeric(),
        b'x' => c.is_ascii_hexdigit(),
        _ => return class == c,
    };
    if class.is_ascii_uppercase() { !res } else { res }
}

/// `pat[p]` is the opening `[` and `pat[ec]` the closing `]`
fn match_bracket_class(c: u8, pat: &[u8], p: usize, ec: usize) -> bool {
    let mut p = p;
    let mut found = true;
    if pat.get(p + 1) == Some(&b'^') {
        found = false;
        p += 1;
    }
    p += 1;
    while p < ec {
        if pat[p] == ESC {
            p += 1;
            if match_class(c, pat[p]) {
                return found;
            }
        } else if pat.get(p + 1) == Some(&b'-') && p + 2 < ec {
            if pat[p] <= c && c <= pat[p + 2] {
                return found;
            }
            p += 2;
        } else if pat[p] == c {
            return found;
        }
        p += 1;
    }
    !found
}

/// First match of `pat` in `src` starting at byte `init` or later
pub(crate) fn find_first<'a>(
    src: &'a [u8],
    pat: &'a [u8],
    init: usize,
    deadline: Option<&'a Deadline>,
) -> Result<Option<Match<'a>>, MatchError> {
    let (anchored, pat) = match pat.strip_prefix(b"^") {
        Some(rest) => (true, rest),
        None => (false, pat),
    };
    let mut ms = MatchState::new(src, pat, deadline);
    let mut s = init;
    loop {
        ms.reset();
        if let Some(end) = ms.do_match(s, 0)? {
            return Ok(Some(Match {
                start: s,
                end,
                captures: ms.captures(None)?,
            }));
        }
        s += 1;
        if anchored || s > src.len() {
            return Ok(None);
        }
    }
}

/// Offset of `needle` in `haystack`, matched literally
pub(crate) fn find_plain(
    haystack: &[u8],
    needle: &[u8],
    deadline: Option<&Deadline>,
) -> Result<Option<usize>, MatchError> {
    if needle.is_empty() {
        return Ok(Some(0));
    }
    let mut budget = Budget::new(deadline);
    for (offset, window) in haystack.windows(needle.len()).enumerate() {
        budget.spend(needle.len() as u64)?;
        if window == needle {
            return Ok(Some(offset));
        }
    }
    Ok(None)
}

/// Replaces the interpreter's pattern functions and `string.rep`
///
/// # Arguments
///
/// * `lua` - State whose `string` table is patched
/// * `max_string_len` - Longest string `rep` and `gsub` may build
pub(crate) fn register_string_functions(lua: &Lua, max_string_len: usize) -> mlua::Result<()> {
    let string: Table = lua.globals().raw_get("string")?;

    let find = lua.create_function(|lua, args: SearchArgs| search(lua, args, true))?;
    let matcher = lua.create_function(|lua, args: SearchArgs| search(lua, args, false))?;
    let gmatch = lua.create_function(gmatch)?;
    let gsub = lua.create_function(move |lua, args: GsubArgs| gsub(lua, args, max_string_len))?;
    let rep = capped_rep(lua, string.raw_get("rep")?, max_string_len)?;

    string.raw_set("find", find)?;
    string.raw_set("match", matcher)?;
    string.raw_set("gmatch", gmatch)?;
    string.raw_set("gsub", gsub)?;
    string.raw_set("rep", rep)?;
    Ok(())
}

fn current_deadline(lua: &Lua) -> Option<Deadline> {
    lua.app_data_ref::<Deadline>().map(|deadline| (*deadline).clone())
}

/// 0-based start for a 1-based, possibly negative, `init` argument
fn start_index(init: Option<Integer>, len: usize) -> usize {
    let len = len as Integer;
    let pos = match init.unwrap_or(1) {
        pos if pos > 0 => pos,
        pos if pos == 0 || pos < -len => 1,
        pos => len + pos + 1,
    };
    (pos - 1) as usize
}

fn fail() -> MultiValue {
    MultiValue::from_vec(vec![Value::Nil])
}

fn capture_value(lua: &Lua, captured: Captured<'_>) -> mlua::Result<Value> {
    Ok(match captured {
        Captured::Text(text) => Value::String(lua.create_string(text)?),
        Captured::Position(pos) => Value::Integer(pos as Integer),
    })
}

fn capture_values(lua: &Lua, captures: Vec<Captured<'_>>) -> mlua::Result<MultiValue> {
    captures
        .into_iter()
        .map(|captured| capture_value(lua, captured))
        .collect()
}

/// `string.find` and `string.match`
fn search(lua: &Lua, (s, p, init, plain): SearchArgs, find: bool) -> mlua::Result<MultiValue> {
    let src = s.as_bytes().to_vec();
    let pat = p.as_bytes().to_vec();
    let init = start_index(init, src.len());
    if init > src.len() {
        return Ok(fail());
    }

    let deadline = current_deadline(lua);
    let literal = plain.unwrap_or(false) || !pat.iter().any(|c| SPECIALS.contains(c));
    if find && literal {
        return Ok(match find_plain(&src[init..], &pat, deadline.as_ref())? {
            Some(offset) => MultiValue::from_vec(vec![
                Value::Integer((init + offset + 1) as Integer),
                Value::Integer((init + offset + pat.len()) as Integer),
            ]),
            None => fail(),
        });
    }

    let Some(found) = find_first(&src, &pat, init, deadline.as_ref())? else {
        return Ok(fail());
    };
    if find {
        let mut values = vec![
            Value::Integer((found.start + 1) as Integer),
            Value::Integer(found.end as Integer),
        ];
        for captured in found.captures {
            values.push(capture_value(lua, captured)?);
        }
        return Ok(MultiValue::from_vec(values));
    }

    if found.captures.is_empty() {
        return capture_values(lua, vec![Captured::Text(&src[found.start..found.end])]);
    }
    capture_values(lua, found.captures)
}

/// `string.gmatch`; `^` is not an anchor here
fn gmatch(
    lua: &Lua,
    (s, p, init): (mlua::String, mlua::String, Option<Integer>),
) -> mlua::Result<Function> {
    let src = s.as_bytes().to_vec();
    let pat = p.as_bytes().to_vec();
    let mut pos = start_index(init, src.len()).min(src.len() + 1);
    let mut last_match = None;

    lua.create_function_mut(move |lua, ()| {
        let deadline = current_deadline(lua);
        let mut ms = MatchState::new(&src, &pat, deadline.as_ref());
        while pos <= src.len() {
            ms.reset();
            if let Some(end) = ms.do_match(pos, 0)? {
                if Some(end) != last_match {
                    let captures = ms.captures(Some((pos, end)))?;
                    pos = end;
                    last_match = Some(end);
                    return capture_values(lua, captures);
                }
            }
            pos += 1;
        }
        Ok(MultiValue::new())
    })
}

/// `string.gsub`
fn gsub(
    lua: &Lua,
    (s, p, repl, max): GsubArgs,
    max_string_len: usize,
) -> mlua::Result<(Value, Integer)> {
    if !matches!(
        repl,
        Value::String(_) | Value::Integer(_) | Value::Number(_) | Value::Table(_) | Value::Function(_)
    ) {
        return Err(mlua::Error::runtime(format!(
            "bad argument #3 to 'gsub' (string/function/table expected, got {})",
            repl.type_name()
        )));
    }

    let src = s.as_bytes().to_vec();
    let pattern = p.as_bytes().to_vec();
    let (anchored, pat) = match pattern.strip_prefix(b"^") {
        Some(rest) => (true, rest),
        None => (false, &pattern[..]),
    };
    let max = max.unwrap_or(src.len() as Integer + 1);

    let deadline = current_deadline(lua);
    let mut ms = MatchState::new(&src, pat, deadline.as_ref());
    let mut out = Vec::new();
    let mut pos = 0;
    let mut last_match = None;
    let mut count: Integer = 0;
    let mut changed = false;

    while count < max {
        ms.reset();
        match ms.do_match(pos, 0)? {
            Some(end) if Some(end) != last_match => {
                count += 1;
                changed |= add_value(lua, &ms, &repl, pos, end, &mut out)?;
                pos = end;
                last_match = Some(end);
            }
            _ if pos < src.len() => {
                out.push(src[pos]);
                pos += 1;
            }
            _ => break,
        }
        if out.len() > max_string_len {
            return Err(mlua::Error::runtime("resulting string too large"));
        }
        if anchored {
            break;
        }
    }

    if !changed {
        return Ok((Value::String(s), count));
    }
    out.extend_from_slice(&src[pos..]);
    Ok((Value::String(lua.create_string(&out)?), count))
}

/// Appends the replacement for `src[s..e]`; `false` when the match is kept
fn add_value(
    lua: &Lua,
    ms: &MatchState<'_>,
    repl: &Value,
    s: usize,
    e: usize,
    out: &mut Vec<u8>,
) -> mlua::Result<bool> {
    let replacement = match repl {
        Value::Function(f) => f.call::<Value>(capture_values(lua, ms.captures(Some((s, e)))?)?)?,
        Value::Table(t) => t.get::<Value>(capture_value(lua, ms.capture(0, s, e)?)?)?,
        _ => {
            let template = lua.coerce_string(repl.clone())?.ok_or_else(|| {
                mlua::Error::runtime("bad argument #3 to 'gsub' (string expected)")
            })?;
            expand_template(ms, &template.as_bytes(), s, e, out)?;
            return Ok(true);
        }
    };

    match replacement {
        Value::Nil | Value::Boolean(false) => {
            out.extend_from_slice(&ms.src[s..e]);
            Ok(false)
        }
        Value::String(text) => {
            out.extend_from_slice(&text.as_bytes());
            Ok(true)
        }
        number @ (Value::Integer(_) | Value::Number(_)) => {
            if let Some(text) = lua.coerce_string(number)? {
                out.extend_from_slice(&text.as_bytes());
            }
            Ok(true)
        }
        other => Err(mlua::Error::runtime(format!(
            "invalid replacement value (a {})",
            other.type_name()
        ))),
    }
}

/// Expands `%0`..`%9` and `%%` in a replacement string
fn expand_template(
    ms: &MatchState<'_>,
    template: &[u8],
    s: usize,
    e: usize,
    out: &mut Vec<u8>,
) -> Result<(), MatchError> {
    let mut chars = template.iter().copied();
    while let Some(c) = chars.next() {
        if c != ESC {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(ESC) => out.push(ESC),
            Some(b'0') => out.extend_from_slice(&ms.src[s..e]),
            Some(d) if d.is_ascii_digit() => match ms.capture((d - b'1') as usize, s, e)? {
                Captured::Text(text) => out.extend_from_slice(text),
                Captured::Position(pos) => out.extend_from_slice(pos.to_string().as_bytes()),
            },
            _ => {
                return Err(MatchError::pattern(
                    "invalid use of '%' in replacement string",
                ));
            }
        }
    }
    Ok(())
}

/// `string.rep` refusing results longer than `max_len`
fn capped_rep(lua: &Lua, original: Function, max_len: usize) -> mlua::Result<Function> {
    lua.create_function(
        move |_, (s, n, sep): (mlua::String, Integer, Option<mlua::String>)| {
            if n > 0 {
                let count = n as u64;
                let sep_len = sep.as_ref().map_or(0, |sep| sep.as_bytes().len()) as u64;
                let total = (s.as_bytes().len() as u64)
                    .checked_mul(count)
                    .and_then(|len| len.checked_add(sep_len.checked_mul(count - 1)?));
                match total {
                    Some(total) if total <= max_len as u64 => {}
                    _ => return Err(mlua::Error::runtime("resulting string too large")),
                }
            }
            original.call::<Value>((s, n, sep))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn first<'a>(src: &'a str, pat: &'a str) -> Option<Match<'a>> {
        find_first(src.as_bytes(), pat.as_bytes(), 0, None).unwrap()
    }

    fn span(src: &str, pat: &str) -> Option<(usize, usize)> {
        first(src, pat).map(|m| (m.start, m.end))
    }

    fn texts<'a>(m: &Match<'a>) -> Vec<&'a str> {
        m.captures
            .iter()
            .map(|c| match c {
                Captured::Text(text) => std::str::from_utf8(text).unwrap(),
                Captured::Position(_) => "<pos>",
            })
            .collect()
    }

    fn lua() -> Lua {
        let lua = Lua::new();
        register_string_functions(&lua, 1024).unwrap();
        lua
    }

    #[test]
    fn test_literals_and_classes() {
        assert_eq!(span("hello world", "o w"), Some((4, 7)));
        assert_eq!(span("abc123", "%d+"), Some((3, 6)));
        assert_eq!(span("  key", "%a+"), Some((2, 5)));
        assert_eq!(span("x = 1", "[=]"), Some((2, 3)));
        assert_eq!(span("abc", "[^ab]"), Some((2, 3)));
        assert_eq!(span("a-b", "[%-]"), Some((1, 2)));
        assert_eq!(span("abc", "%d"), None);
    }

    #[test]
    fn test_anchors_and_quantifiers() {
        assert_eq!(span("abc", "^b"), None);
        assert_eq!(span("abc", "c$"), Some((2, 3)));
        assert_eq!(span("aaab", "a-b"), Some((0, 4)));
        assert_eq!(span("<a><b>", "<.->"), Some((0, 3)));
        assert_eq!(span("<a><b>", "<.*>"), Some((0, 6)));
        assert_eq!(span("color colour", "colou?r"), Some((0, 5)));
        assert_eq!(span("", "a*"), Some((0, 0)));
    }

    #[test]
    fn test_captures() {
        let m = first("key = value", "(%w+)%s*=%s*(%w+)").unwrap();
        assert_eq!(texts(&m), vec!["key", "value"]);

        let m = first("hello", "()ll()").unwrap();
        assert_eq!(m.captures, vec![Captured::Position(3), Captured::Position(5)]);
    }

    #[test]
    fn test_balance_frontier_and_back_reference() {
        assert_eq!(span("f(a(b)c) d", "%b()"), Some((1, 8)));
        assert_eq!(span("THE (quick) fox", "%f[%a]%a+"), Some((0, 3)));
        assert_eq!(span("say 'hi' now", "(['\"]).-%1"), Some((4, 8)));
    }

    #[test]
    fn test_malformed_patterns() {
        let err = |pat: &str| find_first(b"abc", pat.as_bytes(), 0, None).unwrap_err();

        assert_eq!(err("%"), MatchError::pattern("malformed pattern (ends with '%')"));
        assert_eq!(err("[a"), MatchError::pattern("malformed pattern (missing ']')"));
        assert_eq!(err("(a"), MatchError::pattern("unfinished capture"));
        assert_eq!(err("a)"), MatchError::pattern("invalid pattern capture"));
        assert_eq!(err("%1"), MatchError::pattern("invalid capture index %1 in pattern"));
    }

    #[test]
    fn test_backtracking_stops_at_deadline() {
        let subject = "a".repeat(20_000);
        let deadline = Deadline::after(Duration::from_millis(100));

        let started = Instant::now();
        let result = find_first(subject.as_bytes(), b".-.-.-b", 0, Some(&deadline));

        assert_eq!(result, Err(MatchError::TimedOut));
        assert!(deadline.timed_out());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_find_and_match_from_lua() {
        let lua = lua();
        let (start, end, key): (Integer, Integer, String) =
            lua.load("return string.find('a=1', '(%a)=')").eval().unwrap();
        assert_eq!((start, end, key.as_str()), (1, 2, "a"));

        let plain: (Integer, Integer) = lua.load("return ('a.b'):find('.', 1, true)").eval().unwrap();
        assert_eq!(plain, (2, 2));

        let whole: String = lua.load("return ('2024-01-05'):match('%d+')").eval().unwrap();
        assert_eq!(whole, "2024");

        let missing: Value = lua.load("return ('abc'):match('%d')").eval().unwrap();
        assert!(missing.is_nil());

        let from_end: String = lua.load("return ('a1b2'):match('%a', -2)").eval().unwrap();
        assert_eq!(from_end, "b");
    }

    #[test]
    fn test_gmatch_from_lua() {
        let lua = lua();
        let joined: String = lua
            .load(
                r#"
                local parts = {}
                for k, v in string.gmatch("a=1, b=2", "(%w+)=(%w+)") do
                  parts[#parts + 1] = k .. v
                end
                return table.concat(parts, ";")
                "#,
            )
            .eval()
            .unwrap();
        assert_eq!(joined, "a1;b2");
    }

    #[test]
    fn test_gsub_from_lua() {
        let lua = lua();
        let (text, n): (String, Integer) = lua
            .load(r#"return string.gsub("hello world", "(%w+)", "<%1>")"#)
            .eval()
            .unwrap();
        assert_eq!((text.as_str(), n), ("<hello> <world>", 2));

        let (text, _): (String, Integer) = lua
            .load(r#"return ("$name is $age"):gsub("%$(%w+)", {name = "Ada", age = 36})"#)
            .eval()
            .unwrap();
        assert_eq!(text, "Ada is 36");

        let (text, _): (String, Integer) = lua
            .load(r#"return ("abc"):gsub("%w", function(c) if c ~= "b" then return c:upper() end end)"#)
            .eval()
            .unwrap();
        assert_eq!(text, "AbC");

        let (text, n): (String, Integer) = lua.load(r#"return ("abc"):gsub("", "-")"#).eval().unwrap();
        assert_eq!((text.as_str(), n), ("-a-b-c-", 4));

        let (text, n): (String, Integer) = lua.load(r#"return ("aaa"):gsub("a", "b", 2)"#).eval().unwrap();
        assert_eq!((text.as_str(), n), ("bba", 2));
    }

    #[test]
    fn test_rep_is_capped() {
        let lua = lua();
        let short: String = lua.load("return string.rep('ab', 3, ',')").eval().unwrap();
        assert_eq!(short, "ab,ab,ab");

        let err = lua.load("return string.rep('x', 2048)").exec().unwrap_err();
        assert!(err.to_string().contains("resulting string too large"));
    }
}
