//! A small CSS selector engine: enough to look up grid containers, filter
//! items and resolve element lists passed in by callers.

use std::fmt;
use std::str::FromStr;

use crate::dom::{Document, NodeId};
use crate::error::SelectorError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttributeMatch {
    Exists,
    Equals(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<(String, AttributeMatch)>,
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none() && self.id.is_none() && self.classes.is_empty() && self.attributes.is_empty()
    }

    fn matches(&self, doc: &Document, id: NodeId) -> bool {
        let Some(node) = doc.get(id) else {
            return false;
        };
        let Some(tag) = node.tag() else {
            return false;
        };
        if self.tag.as_deref().is_some_and(|wanted| wanted != "*" && wanted != tag) {
            return false;
        }
        if self.id.as_deref().is_some_and(|wanted| node.attribute("id") != Some(wanted)) {
            return false;
        }
        if !self.classes.iter().all(|class| node.classes().any(|c| c == class)) {
            return false;
        }
        self.attributes.iter().all(|(name, rule)| match (rule, node.attribute(name)) {
            (_, None) => false,
            (AttributeMatch::Exists, Some(_)) => true,
            (AttributeMatch::Equals(expected), Some(actual)) => expected == actual,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    compounds: Vec<Compound>,
    // combinators[i] sits between compounds[i] and compounds[i + 1]
    combinators: Vec<Combinator>,
}

impl Complex {
    fn matches(&self, doc: &Document, id: NodeId) -> bool {
        self.matches_at(doc, id, self.compounds.len() - 1)
    }

    fn matches_at(&self, doc: &Document, id: NodeId, index: usize) -> bool {
        if !self.compounds[index].matches(doc, id) {
            return false;
        }
        if index == 0 {
            return true;
        }
        match self.combinators[index - 1] {
            Combinator::Child => doc
                .parent(id)
                .is_some_and(|parent| self.matches_at(doc, parent, index - 1)),
            Combinator::Descendant => {
                let mut ancestor = doc.parent(id);
                while let Some(current) = ancestor {
                    if self.matches_at(doc, current, index - 1) {
                        return true;
                    }
                    ancestor = doc.parent(current);
                }
                false
            }
        }
    }
}

/// A parsed, comma-separated selector list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    alternatives: Vec<Complex>,
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self, SelectorError> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Err(SelectorError::Empty);
        }
        let mut parser = Parser {
            source: trimmed,
            chars: trimmed.char_indices().peekable(),
        };
        let mut alternatives = vec![parser.complex()?];
        while parser.eat(',') {
            alternatives.push(parser.complex()?);
        }
        parser.skip_whitespace();
        if let Some((offset, found)) = parser.chars.next() {
            return Err(parser.unexpected(offset, found));
        }

        Ok(Self {
            source: trimmed.to_string(),
            alternatives,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, doc: &Document, id: NodeId) -> bool {
        self.alternatives.iter().any(|complex| complex.matches(doc, id))
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

struct Parser<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl Parser<'_> {
    fn unexpected(&self, offset: usize, found: char) -> SelectorError {
        SelectorError::Unexpected {
            selector: self.source.to_string(),
            offset,
            found,
        }
    }

    fn skip_whitespace(&mut self) -> bool {
        let mut skipped = false;
        while self.chars.next_if(|(_, c)| c.is_whitespace()).is_some() {
            skipped = true;
        }
        skipped
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_whitespace();
        self.chars.next_if(|&(_, c)| c == expected).is_some()
    }

    fn ident(&mut self) -> String {
        let mut ident = String::new();
        while let Some((_, c)) = self
            .chars
            .next_if(|&(_, c)| c.is_alphanumeric() || c == '-' || c == '_')
        {
            ident.push(c);
        }
        ident
    }

    fn complex(&mut self) -> Result<Complex, SelectorError> {
        self.skip_whitespace();
        let mut compounds = vec![self.compound()?];
        let mut combinators = Vec::new();

        loop {
            let spaced = self.skip_whitespace();
            let combinator = match self.chars.peek() {
                Some((_, '>')) => {
                    self.chars.next();
                    self.skip_whitespace();
                    Combinator::Child
                }
                Some((_, ',')) | None => break,
                Some(_) if spaced => Combinator::Descendant,
                Some(&(offset, found)) => return Err(self.unexpected(offset, found)),
            };
            if matches!(self.chars.peek(), Some((_, ',')) | None) {
                return Err(SelectorError::DanglingCombinator(self.source.to_string()));
            }
            combinators.push(combinator);
            compounds.push(self.compound()?);
        }

        Ok(Complex {
            compounds,
            combinators,
        })
    }

    fn compound(&mut self) -> Result<Compound, SelectorError> {
        let mut compound = Compound::default();

        if self.chars.next_if(|&(_, c)| c == '*').is_some() {
            compound.tag = Some("*".to_string());
        } else {
            let tag = self.ident();
            if !tag.is_empty() {
                compound.tag = Some(tag.to_ascii_lowercase());
            }
        }

        while let Some(&(offset, c)) = self.chars.peek() {
            match c {
                '#' | '.' => {
                    self.chars.next();
                    let name = self.ident();
                    if name.is_empty() {
                        return Err(self.unexpected(offset, c));
                    }
                    if c == '#' {
                        compound.id = Some(name);
                    } else {
                        compound.classes.push(name);
                    }
                }
                '[' => {
                    self.chars.next();
                    compound.attributes.push(self.attribute()?);
                }
                _ => break,
            }
        }

        if compound.is_empty() {
            return Err(match self.chars.peek() {
                Some(&(offset, found)) => self.unexpected(offset, found),
                None => SelectorError::DanglingCombinator(self.source.to_string()),
            });
        }
        Ok(compound)
    }

    fn attribute(&mut self) -> Result<(String, AttributeMatch), SelectorError> {
        self.skip_whitespace();
        let name = self.ident().to_ascii_lowercase();
        if name.is_empty() {
            return Err(SelectorError::UnterminatedAttribute(self.source.to_string()));
        }
        self.skip_whitespace();

        let rule = if self.chars.next_if(|&(_, c)| c == '=').is_some() {
            self.skip_whitespace();
            let value = match self.chars.peek() {
                Some(&(_, quote @ ('"' | '\''))) => {
                    self.chars.next();
                    let mut value = String::new();
                    loop {
                        match self.chars.next() {
                            Some((_, c)) if c == quote => break,
                            Some((_, c)) => value.push(c),
                            None => {
                                return Err(SelectorError::UnterminatedAttribute(
                                    self.source.to_string(),
                                ))
                            }
                        }
                    }
                    value
                }
                _ => self.ident(),
            };
            self.skip_whitespace();
            AttributeMatch::Equals(value)
        } else {
            AttributeMatch::Exists
        };

        match self.chars.next() {
            Some((_, ']')) => Ok((name, rule)),
            Some((offset, found)) => Err(self.unexpected(offset, found)),
            None => Err(SelectorError::UnterminatedAttribute(self.source.to_string())),
        }
    }
}

impl Document {
    /// All elements under the root matching `selector`, in document order.
    pub fn query_selector_all(&self, selector: &Selector) -> Vec<NodeId> {
        self.select_within(self.root(), selector)
    }

    /// Descendants of `scope` (excluding `scope`) matching `selector`, in document order.
    pub fn select_within(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = self.children(scope).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if selector.matches(self, id) {
                found.push(id);
            }
            stack.extend(self.children(id).iter().rev());
        }
        found
    }
}
