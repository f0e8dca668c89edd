use crate::atom::{sym, AtomTable};
use crate::error::{LispError, LispResult, ParseErrorKind};
use crate::heap::Heap;
use crate::value::Value;

/// Parses source text into parse trees in the transient arena.
pub struct Reader<'a> {
    input: &'a [u8],
    pos: usize,
    depth: usize,
    max_depth: usize,
    heap: &'a mut Heap,
    atoms: &'a mut AtomTable,
}

impl<'a> Reader<'a> {
    pub fn new(
        input: &'a str,
        heap: &'a mut Heap,
        atoms: &'a mut AtomTable,
        max_depth: usize,
    ) -> Self {
        Reader {
            input: input.as_bytes(),
            pos: 0,
            depth: 0,
            max_depth,
            heap,
            atoms,
        }
    }

    /// Read one expression. Returns None at EOF.
    pub fn read(&mut self) -> LispResult<Option<Value>> {
        self.skip_whitespace_and_comments();
        if self.pos >= self.input.len() {
            return Ok(None);
        }
        let val = self.read_expr()?;
        Ok(Some(val))
    }

    /// Return current position in input.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn error(&self, kind: ParseErrorKind) -> LispError {
        LispError::parse(kind, self.pos)
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    fn skip_whitespace_and_comments(&mut self) {
        self.pos = skip_blank(self.input, self.pos);
    }

    fn read_expr(&mut self) -> LispResult<Value> {
        self.skip_whitespace_and_comments();

        let ch = self
            .peek()
            .ok_or_else(|| self.error(ParseErrorKind::UnexpectedEndOfInput))?;

        match ch {
            b'(' => self.read_list(),
            b')' => Err(self.error(ParseErrorKind::UnmatchedParenthesis)),
            b'\'' => self.read_quote(),
            _ => self.read_word(),
        }
    }

    /// Read a list: (a b c) or (a . b) or (a b . c)
    fn read_list(&mut self) -> LispResult<Value> {
        if self.depth >= self.max_depth {
            return Err(self.error(ParseErrorKind::TooDeeplyNested));
        }
        self.depth += 1;
        let result = self.read_list_body();
        self.depth -= 1;
        result
    }

    fn read_list_body(&mut self) -> LispResult<Value> {
        self.advance(); // consume '('

        let mut elements = Vec::new();
        let mut dot_tail = None;

        loop {
            self.skip_whitespace_and_comments();

            match self.peek() {
                None => return Err(self.error(ParseErrorKind::UnexpectedEndOfInput)),
                Some(b')') => {
                    self.advance();
                    break;
                }
                Some(b'.') if self.is_dot_separator() => {
                    if elements.is_empty() {
                        return Err(self.error(ParseErrorKind::MalformedDottedList));
                    }
                    self.advance(); // consume '.'
                    self.skip_whitespace_and_comments();
                    if self.peek() == Some(b')') {
                        return Err(self.error(ParseErrorKind::MalformedDottedList));
                    }
                    dot_tail = Some(self.read_expr()?);
                    self.skip_whitespace_and_comments();
                    match self.peek() {
                        Some(b')') => {
                            self.advance();
                            break;
                        }
                        None => return Err(self.error(ParseErrorKind::UnexpectedEndOfInput)),
                        Some(_) => return Err(self.error(ParseErrorKind::MalformedDottedList)),
                    }
                }
                Some(_) => elements.push(self.read_expr()?),
            }
        }

        let mut result = dot_tail.unwrap_or(Value::Nil);
        for val in elements.into_iter().rev() {
            result = Value::Pair(self.heap.alloc_transient(val, result)?);
        }
        Ok(result)
    }

    /// Check if a '.' is a dot separator (not part of a word).
    fn is_dot_separator(&self) -> bool {
        match self.input.get(self.pos + 1) {
            None => true,
            Some(&next) => is_delimiter(next),
        }
    }

    /// Read quote: 'expr -> (quote expr)
    fn read_quote(&mut self) -> LispResult<Value> {
        self.advance(); // consume '\''
        self.skip_whitespace_and_comments();
        if self.peek().is_none() {
            return Err(self.error(ParseErrorKind::UnexpectedEndOfInput));
        }
        let expr = self.read_expr()?;
        let inner = self.heap.alloc_transient(expr, Value::Nil)?;
        let outer = self
            .heap
            .alloc_transient(Value::Atom(sym::QUOTE), Value::Pair(inner))?;
        Ok(Value::Pair(outer))
    }

    /// Read a word. Every word is an atom; numbers are atoms too.
    fn read_word(&mut self) -> LispResult<Value> {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if is_delimiter(ch) {
                break;
            }
            self.pos += 1;
        }

        // Delimiters are ASCII, so the slice boundaries fall on char boundaries.
        let word = String::from_utf8_lossy(&self.input[start..self.pos]);
        let id = self.atoms.intern(&word)?;
        Ok(Value::Atom(id))
    }
}

fn is_delimiter(ch: u8) -> bool {
    ch.is_ascii_whitespace() || matches!(ch, b'(' | b')' | b'\'' | b';')
}

/// Read one expression starting at byte offset `pos`.
/// Returns `Ok(Some((value, new_pos)))` or `Ok(None)` if only whitespace/comments remain.
/// Position of the first byte at or after `pos` that is not whitespace
/// or part of a `;` comment.
fn skip_blank(input: &[u8], mut pos: usize) -> usize {
    loop {
        while input.get(pos).is_some_and(|ch| ch.is_ascii_whitespace()) {
            pos += 1;
        }
        if input.get(pos) != Some(&b';') {
            return pos;
        }
        while input.get(pos).is_some_and(|&ch| ch != b'\n') {
            pos += 1;
        }
    }
}

/// True if anything other than whitespace and comments follows byte `pos`.
pub fn has_form_at(input: &str, pos: usize) -> bool {
    skip_blank(input.as_bytes(), pos) < input.len()
}

pub fn read_one_at(
    input: &str,
    pos: usize,
    heap: &mut Heap,
    atoms: &mut AtomTable,
    max_depth: usize,
) -> LispResult<Option<(Value, usize)>> {
    let mut reader = Reader::new(&input[pos..], heap, atoms, max_depth);
    match reader.read() {
        Ok(Some(val)) => Ok(Some((val, pos + reader.position()))),
        Ok(None) => Ok(None),
        Err(LispError::Parse { kind, position }) => Err(LispError::Parse {
            kind,
            position: pos + position,
        }),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printer::print_val;

    fn read_text(input: &str) -> LispResult<String> {
        let mut heap = Heap::new(256, 16);
        let mut atoms = AtomTable::new(1024);
        let (val, _) = read_one_at(input, 0, &mut heap, &mut atoms, 8)?
            .ok_or_else(|| LispError::Internal("no form".into()))?;
        Ok(print_val(val, &heap, &atoms))
    }

    fn parse_kind(input: &str) -> Option<ParseErrorKind> {
        match read_text(input) {
            Err(LispError::Parse { kind, .. }) => Some(kind),
            _ => None,
        }
    }

    #[test]
    fn test_reads_forms() {
        let cases = [
            ("x", "x"),
            ("42", "42"),
            ("()", "()"),
            ("( )", "()"),
            ("(a b c)", "(a b c)"),
            ("(a . b)", "(a . b)"),
            ("(a b . c)", "(a b . c)"),
            ("(a b (c . d))", "(a b (c . d))"),
            ("'x", "(quote x)"),
            ("'(1 2)", "(quote (1 2))"),
            ("(a'b)", "(a (quote b))"),
            ("(set! x #t) ; trailing", "(set! x #t)"),
            ("; lead\n(f\n  ; inner\n  .5)", "(f .5)"),
        ];
        for (input, expected) in cases {
            assert_eq!(read_text(input).unwrap(), expected, "{input:?}");
        }
    }

    #[test]
    fn test_parse_errors() {
        let cases = [
            ("(a b", ParseErrorKind::UnexpectedEndOfInput),
            ("'", ParseErrorKind::UnexpectedEndOfInput),
            (")", ParseErrorKind::UnmatchedParenthesis),
            ("(. a)", ParseErrorKind::MalformedDottedList),
            ("(a . b c)", ParseErrorKind::MalformedDottedList),
            ("(a .)", ParseErrorKind::MalformedDottedList),
            ("((((((((((x))))))))))", ParseErrorKind::TooDeeplyNested),
        ];
        for (input, expected) in cases {
            assert_eq!(parse_kind(input), Some(expected), "{input:?}");
        }
    }

    #[test]
    fn test_more_input_signal() {
        let mut heap = Heap::new(64, 16);
        let mut atoms = AtomTable::new(1024);
        let src = "(a) b  ; done\n";
        let (first, pos) = read_one_at(src, 0, &mut heap, &mut atoms, 8).unwrap().unwrap();
        assert!(first.is_pair());
        let (second, pos) = read_one_at(src, pos, &mut heap, &mut atoms, 8).unwrap().unwrap();
        assert_eq!(atoms.text(second.as_atom().unwrap()), "b");
        assert!(read_one_at(src, pos, &mut heap, &mut atoms, 8).unwrap().is_none());
    }

    #[test]
    fn test_error_position_is_absolute() {
        let mut heap = Heap::new(64, 16);
        let mut atoms = AtomTable::new(1024);
        let src = "(a) )";
        let (_, pos) = read_one_at(src, 0, &mut heap, &mut atoms, 8).unwrap().unwrap();
        assert_eq!(
            read_one_at(src, pos, &mut heap, &mut atoms, 8),
            Err(LispError::parse(ParseErrorKind::UnmatchedParenthesis, 4))
        );
    }

    #[test]
    fn test_parse_tree_is_transient() {
        let mut heap = Heap::new(64, 16);
        let mut atoms = AtomTable::new(1024);
        let (val, _) = read_one_at("(a (b))", 0, &mut heap, &mut atoms, 8)
            .unwrap()
            .unwrap();
        assert!(val.is_transient());
        assert_eq!(heap.transient_used(), 3);
        assert_eq!(heap.durable_used(), 0);
    }

    #[test]
    fn test_has_form_at() {
        let cases = [
            ("", 0, false),
            ("   \n\t", 0, false),
            ("; only a comment", 0, false),
            ("(a) ; trailing\n", 3, false),
            ("(a) b", 3, true),
            ("  ; note\n  x", 0, true),
            (")", 0, true),
        ];
        for (src, pos, expected) in cases {
            assert_eq!(has_form_at(src, pos), expected, "{src:?} at {pos}");
        }
    }
}
