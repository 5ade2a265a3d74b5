//! Parser for the textual graph format.

use crate::core::{CompileError, CompileResult};
use crate::ir::{AttrValue, Attributes, ComputeGraph, NodeId, OperatorRegistry};

pub fn parse_graph(text: &str, registry: &OperatorRegistry) -> CompileResult<ComputeGraph> {
    Parser::new(text, registry).parse()
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
    registry: &'a OperatorRegistry,
    // Operands are connected once the whole body is read.
    pending: Vec<Operand<'a>>,
}

#[derive(Debug)]
struct Operand<'a> {
    producer: &'a str,
    out_slot: u32,
    consumer: &'a str,
    in_slot: u32,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str, registry: &'a OperatorRegistry) -> Self {
        Self {
            text,
            pos: 0,
            registry,
            pending: Vec::new(),
        }
    }

    fn parse(mut self) -> CompileResult<ComputeGraph> {
        self.keyword("graph")?;
        let name = self.read_name()?;
        let mut graph = ComputeGraph::new(name);
        self.expect('{')?;

        while !self.try_read('}') {
            if self.is_eof() {
                return Err(self.error("unexpected end of input, expected '}'"));
            }
            self.parse_statement(&mut graph)?;
        }

        self.skip_whitespace(true);
        if !self.is_eof() {
            return Err(self.error("unexpected text after graph body"));
        }

        for operand in std::mem::take(&mut self.pending) {
            let producer = NodeId::from(operand.producer);
            if !graph.contains(&producer) {
                return Err(self.error_at(operand.pos, format!("undefined value %{}", operand.producer)));
            }
            graph.connect(&producer, operand.out_slot, &NodeId::from(operand.consumer), operand.in_slot)?;
        }
        log::debug!(
            "Parsed graph {}: {} nodes, {} edges",
            graph.name(),
            graph.node_count(),
            graph.edge_count()
        );
        Ok(graph)
    }

    /// `%id = Kind {attrs} %a, %b:1`
    fn parse_statement(&mut self, graph: &mut ComputeGraph) -> CompileResult<()> {
        self.expect('%')?;
        let start = self.pos;
        let id = self.read_name()?;
        if graph.contains(&NodeId::from(id)) {
            return Err(self.error_at(start, format!("value %{id} defined twice")));
        }
        self.expect('=')?;
        let kind = self.read_name()?;

        let attrs = if self.peek_same_line() == Some('{') {
            self.parse_attributes()?
        } else {
            Attributes::new()
        };

        let mut in_slot = 0;
        while self.peek_same_line() == Some('%') {
            let pos = self.pos;
            self.advance();
            let producer = self.read_name()?;
            let out_slot = if self.current_char() == Some(':') {
                self.advance();
                self.read_u32()?
            } else {
                0
            };
            self.pending.push(Operand { producer, out_slot, consumer: id, in_slot, pos });
            in_slot += 1;
            if self.peek_same_line() == Some(',') {
                self.advance();
            }
        }

        let node = self.registry.create(kind, attrs)?;
        graph.add_node(id, node)
    }

    fn parse_attributes(&mut self) -> CompileResult<Attributes> {
        self.expect('{')?;
        let mut attrs = Attributes::new();
        if self.try_read('}') {
            return Ok(attrs);
        }
        loop {
            let start = self.pos;
            let name = self.read_name()?;
            if attrs.contains(name) {
                return Err(self.error_at(start, format!("attribute '{name}' given twice")));
            }
            self.expect('=')?;
            let value = self.parse_value()?;
            attrs.set(name, value);
            if self.try_read('}') {
                return Ok(attrs);
            }
            self.expect(',')?;
        }
    }

    fn parse_value(&mut self) -> CompileResult<AttrValue> {
        self.skip_whitespace(true);
        match self.current_char() {
            Some('"') => self.read_string().map(AttrValue::Str),
            Some('[') => self.parse_list(),
            Some(_) => match self.read_number()? {
                Number::Int(v) => Ok(AttrValue::Int(v)),
                Number::Float(v) => Ok(AttrValue::Float(v)),
            },
            None => Err(self.error("expected attribute value but found end of input")),
        }
    }

    fn parse_list(&mut self) -> CompileResult<AttrValue> {
        self.expect('[')?;
        let mut items = Vec::new();
        if !self.try_read(']') {
            loop {
                items.push(self.read_number()?);
                if self.try_read(']') {
                    break;
                }
                self.expect(',')?;
            }
        }

        if items.iter().all(|item| matches!(item, Number::Int(_))) {
            let ints = items
                .into_iter()
                .filter_map(|item| match item {
                    Number::Int(v) => Some(v),
                    Number::Float(_) => None,
                })
                .collect();
            return Ok(AttrValue::Ints(ints));
        }
        let floats = items
            .into_iter()
            .map(|item| match item {
                Number::Int(v) => v as f32,
                Number::Float(v) => v as f32,
            })
            .collect();
        Ok(AttrValue::Floats(floats))
    }

    fn read_number(&mut self) -> CompileResult<Number> {
        self.skip_whitespace(true);
        let start = self.pos;
        if matches!(self.current_char(), Some('-' | '+')) {
            self.advance();
        }
        let mut is_float = false;
        while let Some(ch) = self.current_char() {
            match ch {
                '0'..='9' => {}
                '.' => is_float = true,
                'e' | 'E' => {
                    is_float = true;
                    let next = self.text[self.pos + 1..].chars().next();
                    if matches!(next, Some('-' | '+')) {
                        self.advance();
                    }
                }
                _ => break,
            }
            self.advance();
        }

        let literal = &self.text[start..self.pos];
        if is_float {
            literal
                .parse::<f64>()
                .map(Number::Float)
                .map_err(|_| self.error_at(start, format!("invalid number '{literal}'")))
        } else {
            literal
                .parse::<i64>()
                .map(Number::Int)
                .map_err(|_| self.error_at(start, format!("invalid number '{literal}'")))
        }
    }

    fn read_u32(&mut self) -> CompileResult<u32> {
        let start = self.pos;
        while matches!(self.current_char(), Some('0'..='9')) {
            self.advance();
        }
        let literal = &self.text[start..self.pos];
        literal
            .parse()
            .map_err(|_| self.error_at(start, format!("expected slot index but found '{literal}'")))
    }

    fn read_string(&mut self) -> CompileResult<String> {
        let start = self.pos;
        self.expect('"')?;
        let mut out = String::new();
        loop {
            match self.current_char() {
                None | Some('\n') => return Err(self.error_at(start, "unterminated string")),
                Some('"') => {
                    self.advance();
                    return Ok(out);
                }
                Some('\\') => {
                    self.advance();
                    let escaped = match self.current_char() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some(ch @ ('"' | '\\')) => ch,
                        other => return Err(self.error(format!("invalid escape {other:?}"))),
                    };
                    out.push(escaped);
                    self.advance();
                }
                Some(ch) => {
                    out.push(ch);
                    self.advance();
                }
            }
        }
    }

    fn read_name(&mut self) -> CompileResult<&'a str> {
        self.skip_whitespace(true);
        let start = self.pos;
        while let Some(ch) = self.current_char() {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' {
                self.advance();
            } else {
                break;
            }
        }
        if start == self.pos {
            return Err(self.error(format!(
                "expected identifier but found {}",
                self.describe_current()
            )));
        }
        Ok(&self.text[start..self.pos])
    }

    fn keyword(&mut self, word: &str) -> CompileResult<()> {
        let start = self.pos;
        match self.read_name() {
            Ok(found) if found == word => Ok(()),
            _ => Err(self.error_at(start, format!("expected '{word}'"))),
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn current_char(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.pos += ch.len_utf8();
        }
    }

    fn describe_current(&self) -> String {
        match self.current_char() {
            Some(ch) => format!("'{ch}'"),
            None => "end of input".to_string(),
        }
    }

    fn skip_whitespace(&mut self, skip_newlines: bool) {
        while let Some(ch) = self.current_char() {
            if ch == ';' {
                // Comment runs to end of line; the newline itself is kept.
                while !matches!(self.current_char(), None | Some('\n')) {
                    self.advance();
                }
            } else if ch.is_whitespace() {
                if ch == '\n' && !skip_newlines {
                    break;
                }
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Next character on the current line, if any.
    fn peek_same_line(&mut self) -> Option<char> {
        self.skip_whitespace(false);
        self.current_char().filter(|&ch| ch != '\n')
    }

    fn try_read(&mut self, ch: char) -> bool {
        self.skip_whitespace(true);
        if self.current_char() == Some(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> CompileResult<()> {
        if !self.try_read(ch) {
            return Err(self.error(format!(
                "expected '{}' but found {}",
                ch,
                self.describe_current()
            )));
        }
        Ok(())
    }

    fn line_at(&self, pos: usize) -> usize {
        self.text[..pos.min(self.text.len())].matches('\n').count() + 1
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        self.error_at(self.pos, message)
    }

    fn error_at(&self, pos: usize, message: impl Into<String>) -> CompileError {
        CompileError::Parse {
            line: self.line_at(pos),
            message: message.into(),
        }
    }
}

enum Number {
    Int(i64),
    Float(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> OperatorRegistry {
        OperatorRegistry::with_builtins().unwrap()
    }

    #[test]
    fn test_parse_acos_net() {
        let text = r#"
; acos over a 2x2 input
graph acos_net {
  %x   = Input {shape = [2, 2], data = [0.0, 0.5, 1.0, -1.0]}
  %y   = Acos %x
  %out = Output %y
}
"#;
        let graph = parse_graph(text, &registry()).unwrap();
        assert_eq!(graph.name(), "acos_net");
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        graph.validate().unwrap();

        let x = graph.node(&"x".into()).unwrap();
        assert_eq!(x.attrs().ints("shape"), Some(&[2, 2][..]));
        assert_eq!(
            x.attrs().get("data"),
            Some(&AttrValue::Floats(vec![0.0, 0.5, 1.0, -1.0]))
        );
    }

    #[test]
    fn test_forward_references_and_slots() {
        let text = "graph g {\n  %out = Output %s\n  %s = Add %a, %b\n  %a = Input {shape=[1]}\n  %b = Input {shape=[1]}\n}\n";
        let graph = parse_graph(text, &registry()).unwrap();
        assert_eq!(graph.producer_of(&"s".into(), 1).map(|(p, _)| p.as_str()), Some("b"));
        graph.validate().unwrap();
    }

    #[test]
    fn test_attribute_values() {
        let text = "graph g {\n %x = Input {shape = [2]}\n %c = Concat {axis = -1, note = \"a \\\"b\\\"\", scale = 1e-3} %x\n}";
        let graph = parse_graph(text, &registry()).unwrap();
        let attrs = graph.node(&"c".into()).unwrap().attrs();
        assert_eq!(attrs.int("axis"), Some(-1));
        assert_eq!(attrs.str("note"), Some("a \"b\""));
        assert_eq!(attrs.float("scale"), Some(1e-3));
    }

    #[test]
    fn test_errors_carry_lines() {
        let err = parse_graph("graph g {\n  %y = Acos %x\n}", &registry()).unwrap_err();
        assert_eq!(
            err,
            CompileError::Parse { line: 2, message: "undefined value %x".to_string() }
        );

        let err = parse_graph("graph g {\n  %y = Nope\n}", &registry()).unwrap_err();
        assert_eq!(err, CompileError::UnknownKind { kind: "Nope".to_string() });

        let err = parse_graph("graph g {\n  %y Acos\n}", &registry()).unwrap_err();
        assert!(matches!(err, CompileError::Parse { line: 2, .. }));

        let err = parse_graph("graph g {\n %a = Input {shape=[1]}\n %a = Output %a\n}", &registry()).unwrap_err();
        assert!(matches!(err, CompileError::Parse { line: 3, .. }));
    }
}
