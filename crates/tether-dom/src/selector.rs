//! Selectors
//!
//! Compound simple selectors (`tag#id.class[attr*="v"]`) and comma lists.
//! Combinators are not supported.

use crate::ElementData;

/// Attribute comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOperator {
    /// `[a=v]`
    Equals,
    /// `[a~=v]`, whitespace-separated word
    Includes,
    /// `[a*=v]`, substring
    Contains,
    /// `[a^=v]`
    Prefix,
    /// `[a$=v]`
    Suffix,
}

/// Simple selector for matching
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimpleSelector {
    Universal,
    Tag(String),
    Id(String),
    Class(String),
    Attribute {
        name: String,
        condition: Option<(AttrOperator, String)>,
    },
}

impl SimpleSelector {
    /// Check a single element
    pub fn matches(&self, element: &ElementData) -> bool {
        match self {
            Self::Universal => true,
            Self::Tag(tag) => element.tag.eq_ignore_ascii_case(tag),
            Self::Id(id) => element.id() == Some(id.as_str()),
            Self::Class(class) => element.classes().any(|c| c == class),
            Self::Attribute { name, condition } => {
                let Some(value) = element.get_attr(name) else {
                    return false;
                };
                match condition {
                    None => true,
                    Some((op, expected)) => match op {
                        AttrOperator::Equals => value == expected,
                        AttrOperator::Includes => value.split_whitespace().any(|w| w == expected),
                        AttrOperator::Contains => !expected.is_empty() && value.contains(expected.as_str()),
                        AttrOperator::Prefix => !expected.is_empty() && value.starts_with(expected.as_str()),
                        AttrOperator::Suffix => !expected.is_empty() && value.ends_with(expected.as_str()),
                    },
                }
            }
        }
    }
}

/// Selector parse error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("unsupported selector syntax: {0}")]
    Unsupported(String),
    #[error("unterminated attribute selector")]
    Unterminated,
}

/// Comma-separated list of compound selectors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    alternatives: Vec<Vec<SimpleSelector>>,
}

impl Selector {
    /// Parse a selector list
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let alternatives = split_top_level(input, ',')
            .into_iter()
            .map(|part| parse_compound(part.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        if alternatives.is_empty() {
            return Err(SelectorError::Empty);
        }
        Ok(Self { alternatives })
    }

    /// Selector matching elements carrying `name` whose value contains `needle`
    pub fn attribute_contains(name: &str, needle: &str) -> Self {
        Self {
            alternatives: vec![vec![SimpleSelector::Attribute {
                name: name.to_string(),
                condition: Some((AttrOperator::Contains, needle.to_string())),
            }]],
        }
    }

    /// Check if element matches any alternative
    pub fn matches(&self, element: &ElementData) -> bool {
        self.alternatives
            .iter()
            .any(|compound| compound.iter().all(|simple| simple.matches(element)))
    }
}

impl std::str::FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn split_top_level(input: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, c) if c == separator && depth == 0 => {
                parts.push(&input[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

fn is_ident_char(c: char) -> bool {
    !matches!(c, '#' | '.' | '[' | ']' | '*' | ',' | '"' | '\'') && !c.is_whitespace()
}

fn read_ident(chars: &[char], pos: &mut usize) -> String {
    let start = *pos;
    while *pos < chars.len() && is_ident_char(chars[*pos]) {
        *pos += 1;
    }
    chars[start..*pos].iter().collect()
}

fn parse_compound(input: &str) -> Result<Vec<SimpleSelector>, SelectorError> {
    if input.is_empty() {
        return Err(SelectorError::Empty);
    }
    let chars: Vec<char> = input.chars().collect();
    let mut pos = 0;
    let mut out = Vec::new();

    while pos < chars.len() {
        match chars[pos] {
            '*' => {
                pos += 1;
                out.push(SimpleSelector::Universal);
            }
            '#' | '.' => {
                let kind = chars[pos];
                pos += 1;
                let ident = read_ident(&chars, &mut pos);
                if ident.is_empty() {
                    return Err(SelectorError::Unsupported(input.to_string()));
                }
                out.push(if kind == '#' {
                    SimpleSelector::Id(ident)
                } else {
                    SimpleSelector::Class(ident)
                });
            }
            '[' => {
                pos += 1;
                out.push(parse_attribute(&chars, &mut pos)?);
            }
            c if c.is_whitespace() => {
                return Err(SelectorError::Unsupported(input.to_string()));
            }
            _ => {
                let ident = read_ident(&chars, &mut pos);
                if ident.is_empty() {
                    return Err(SelectorError::Unsupported(input.to_string()));
                }
                out.push(SimpleSelector::Tag(ident.to_ascii_lowercase()));
            }
        }
    }
    Ok(out)
}

fn parse_attribute(chars: &[char], pos: &mut usize) -> Result<SimpleSelector, SelectorError> {
    let start = *pos;
    while *pos < chars.len() && !matches!(chars[*pos], '=' | '~' | '*' | '^' | '$' | ']') {
        *pos += 1;
    }
    let name: String = chars[start..*pos].iter().collect::<String>().trim().to_string();
    if name.is_empty() || *pos >= chars.len() {
        return Err(SelectorError::Unterminated);
    }

    if chars[*pos] == ']' {
        *pos += 1;
        return Ok(SimpleSelector::Attribute { name, condition: None });
    }

    let op = match chars[*pos] {
        '=' => AttrOperator::Equals,
        '~' => AttrOperator::Includes,
        '*' => AttrOperator::Contains,
        '^' => AttrOperator::Prefix,
        '$' => AttrOperator::Suffix,
        _ => return Err(SelectorError::Unterminated),
    };
    *pos += if op == AttrOperator::Equals { 1 } else { 2 };
    if op != AttrOperator::Equals && chars.get(*pos - 1) != Some(&'=') {
        return Err(SelectorError::Unsupported(chars.iter().collect()));
    }

    let value = match chars.get(*pos) {
        Some(&q @ ('"' | '\'')) => {
            *pos += 1;
            let value_start = *pos;
            while *pos < chars.len() && chars[*pos] != q {
                *pos += 1;
            }
            if *pos >= chars.len() {
                return Err(SelectorError::Unterminated);
            }
            let value: String = chars[value_start..*pos].iter().collect();
            *pos += 1;
            value
        }
        _ => {
            let value_start = *pos;
            while *pos < chars.len() && chars[*pos] != ']' {
                *pos += 1;
            }
            chars[value_start..*pos].iter().collect::<String>().trim().to_string()
        }
    };

    if chars.get(*pos) != Some(&']') {
        return Err(SelectorError::Unterminated);
    }
    *pos += 1;
    Ok(SimpleSelector::Attribute {
        name,
        condition: Some((op, value)),
    })
}
