//! Enum array decoding.
//!
//! PostgreSQL sends enum array columns either in text form (`{happy,"so so",NULL}`)
//! or in the binary array layout where every element is the label's UTF-8 bytes.
//! Both decode into the same [`EnumArray`].

use fallible_iterator::FallibleIterator;
use nom::{
    branch::alt,
    bytes::complete::{is_not, take_till1},
    character::complete::{anychar, char, digit1, multispace0},
    combinator::{map, map_res, opt, recognize},
    multi::{fold_many0, many1, separated_list0},
    sequence::{delimited, pair, preceded, separated_pair, terminated, tuple},
    IResult,
};
use postgres_protocol::types;

use crate::error::DecodeError;

/// Wire format of a column value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Binary,
}

impl From<sqlx::postgres::PgValueFormat> for Format {
    fn from(f: sqlx::postgres::PgValueFormat) -> Self {
        match f {
            sqlx::postgres::PgValueFormat::Text => Format::Text,
            sqlx::postgres::PgValueFormat::Binary => Format::Binary,
        }
    }
}

/// Decoding strategy attached to a registered type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Array of enum labels.
    EnumArray,
}

impl Codec {
    pub fn decode(&self, format: Format, buf: &[u8]) -> Result<EnumArray, DecodeError> {
        match self {
            Codec::EnumArray => EnumArray::decode(format, buf),
        }
    }
}

/// Length and lower bound of one array dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayDimension {
    pub len: i32,
    pub lower_bound: i32,
}

/// A decoded enum array.
///
/// Elements are stored flat in row-major order. An empty array has no dimensions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumArray {
    pub dimensions: Vec<ArrayDimension>,
    pub elements: Vec<Option<String>>,
}

impl EnumArray {
    /// One-dimensional array with lower bound 1.
    pub fn new(elements: Vec<Option<String>>) -> Self {
        let dimensions = if elements.is_empty() {
            Vec::new()
        } else {
            vec![ArrayDimension {
                len: elements.len() as i32,
                lower_bound: 1,
            }]
        };
        Self {
            dimensions,
            elements,
        }
    }

    pub fn decode(format: Format, buf: &[u8]) -> Result<Self, DecodeError> {
        match format {
            Format::Text => {
                let s = std::str::from_utf8(buf).map_err(|_| DecodeError::Utf8)?;
                Self::decode_text(s)
            }
            Format::Binary => Self::decode_binary(buf),
        }
    }

    pub fn decode_binary(buf: &[u8]) -> Result<Self, DecodeError> {
        let array = types::array_from_sql(buf).map_err(binary)?;

        let dimensions = array
            .dimensions()
            .map(|d| {
                Ok(ArrayDimension {
                    len: d.len,
                    lower_bound: d.lower_bound,
                })
            })
            .collect::<Vec<_>>()
            .map_err(binary)?;

        let raw: Vec<Option<&[u8]>> = array.values().collect().map_err(binary)?;
        let elements = raw
            .into_iter()
            .map(|v| match v {
                Some(bytes) => std::str::from_utf8(bytes)
                    .map(|s| Some(s.to_owned()))
                    .map_err(|_| DecodeError::Utf8),
                None => Ok(None),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            dimensions,
            elements,
        })
    }

    pub fn decode_text(s: &str) -> Result<Self, DecodeError> {
        check_nesting(s)?;
        let (rest, (bounds, nodes)) = parse_literal(s).map_err(|e| match e {
            nom::Err::Error(e) | nom::Err::Failure(e) => DecodeError::Syntax(snippet(e.input)),
            nom::Err::Incomplete(_) => DecodeError::Syntax(snippet(s)),
        })?;
        if !rest.trim().is_empty() {
            return Err(DecodeError::Trailing(snippet(rest)));
        }

        let lens = shape(&nodes);
        let mut elements = Vec::new();
        flatten(nodes, &lens, 0, &mut elements)?;

        let dimensions = match bounds {
            Some(bounds) => {
                if bounds.len() != lens.len() {
                    return Err(DecodeError::Bounds);
                }
                bounds
                    .iter()
                    .zip(&lens)
                    .map(|(&(lower, upper), &len)| {
                        let span = upper.checked_sub(lower).and_then(|d| d.checked_add(1));
                        if span != Some(len) {
                            return Err(DecodeError::Bounds);
                        }
                        Ok(ArrayDimension {
                            len,
                            lower_bound: lower,
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?
            }
            None => lens
                .iter()
                .map(|&len| ArrayDimension {
                    len,
                    lower_bound: 1,
                })
                .collect(),
        };

        if elements.is_empty() {
            return Ok(Self::default());
        }
        Ok(Self {
            dimensions,
            elements,
        })
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Labels in row-major order; `None` for NULL elements.
    pub fn labels(&self) -> impl Iterator<Item = Option<&str>> {
        self.elements.iter().map(|e| e.as_deref())
    }

    pub fn into_vec(self) -> Vec<Option<String>> {
        self.elements
    }
}

fn binary(e: Box<dyn std::error::Error + Sync + Send>) -> DecodeError {
    DecodeError::Binary(e.to_string())
}

/// PostgreSQL's MAXDIM.
const MAX_DIMENSIONS: usize = 6;

/// Reject literals nested deeper than [`MAX_DIMENSIONS`] before the recursive parser sees them.
fn check_nesting(s: &str) -> Result<(), DecodeError> {
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut escaped = false;
    for (idx, c) in s.char_indices() {
        if in_quotes {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_quotes = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            '{' => {
                depth += 1;
                if depth > MAX_DIMENSIONS {
                    return Err(DecodeError::Syntax(snippet(&s[idx..])));
                }
            }
            '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

fn snippet(s: &str) -> String {
    s.chars().take(32).collect()
}

// Text literal parsing

#[derive(Debug)]
enum Node {
    Array(Vec<Node>),
    Item(Option<String>),
}

enum Fragment<'a> {
    Literal(&'a str),
    Escaped(char),
}

type Bounds = Vec<(i32, i32)>;

fn parse_literal(input: &str) -> IResult<&str, (Option<Bounds>, Vec<Node>)> {
    tuple((
        opt(preceded(
            multispace0,
            terminated(parse_bounds, preceded(multispace0, char('='))),
        )),
        preceded(multispace0, parse_array),
    ))(input)
}

/// `[1:3][0:1]`
fn parse_bounds(input: &str) -> IResult<&str, Bounds> {
    many1(delimited(
        char('['),
        separated_pair(parse_int, char(':'), parse_int),
        char(']'),
    ))(input)
}

fn parse_int(input: &str) -> IResult<&str, i32> {
    map_res(recognize(pair(opt(char('-')), digit1)), |s: &str| {
        s.parse::<i32>()
    })(input)
}

fn parse_array(input: &str) -> IResult<&str, Vec<Node>> {
    delimited(
        char('{'),
        separated_list0(char(','), terminated(parse_element, multispace0)),
        preceded(multispace0, char('}')),
    )(input)
}

fn parse_element(input: &str) -> IResult<&str, Node> {
    preceded(
        multispace0,
        alt((
            map(parse_array, Node::Array),
            map(parse_quoted, |s| Node::Item(Some(s))),
            map(parse_unquoted, |s| {
                if s.eq_ignore_ascii_case("NULL") {
                    Node::Item(None)
                } else {
                    Node::Item(Some(s.to_string()))
                }
            }),
        )),
    )(input)
}

fn parse_quoted(input: &str) -> IResult<&str, String> {
    delimited(
        char('"'),
        fold_many0(
            alt((
                map(is_not("\\\""), Fragment::Literal),
                map(preceded(char('\\'), anychar), Fragment::Escaped),
            )),
            String::new,
            |mut acc, fragment| {
                match fragment {
                    Fragment::Literal(s) => acc.push_str(s),
                    Fragment::Escaped(c) => acc.push(c),
                }
                acc
            },
        ),
        char('"'),
    )(input)
}

fn parse_unquoted(input: &str) -> IResult<&str, &str> {
    map(
        take_till1(|c: char| matches!(c, ',' | '{' | '}' | '"' | '\\')),
        str::trim_end,
    )(input)
}

/// Dimension lengths along the first path through the tree.
fn shape(nodes: &[Node]) -> Vec<i32> {
    let mut lens = Vec::new();
    let mut level = nodes;
    loop {
        lens.push(level.len() as i32);
        match level.first() {
            Some(Node::Array(children)) => level = children,
            _ => return lens,
        }
    }
}

fn flatten(
    nodes: Vec<Node>,
    lens: &[i32],
    depth: usize,
    out: &mut Vec<Option<String>>,
) -> Result<(), DecodeError> {
    if nodes.len() as i32 != lens[depth] {
        return Err(DecodeError::Ragged);
    }
    let leaf = depth + 1 == lens.len();
    for node in nodes {
        match (node, leaf) {
            (Node::Item(v), true) => out.push(v),
            (Node::Array(children), false) => flatten(children, lens, depth + 1, out)?,
            _ => return Err(DecodeError::Ragged),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn labels(items: &[Option<&str>]) -> Vec<Option<String>> {
        items.iter().map(|s| s.map(str::to_string)).collect()
    }

    /// Binary array payload as PostgreSQL sends it for a 1-D enum array.
    fn binary_payload(elem_oid: u32, items: &[Option<&str>]) -> Vec<u8> {
        let mut buf = Vec::new();
        let has_null = items.iter().any(Option::is_none) as i32;
        buf.extend_from_slice(&1i32.to_be_bytes());
        buf.extend_from_slice(&has_null.to_be_bytes());
        buf.extend_from_slice(&elem_oid.to_be_bytes());
        buf.extend_from_slice(&(items.len() as i32).to_be_bytes());
        buf.extend_from_slice(&1i32.to_be_bytes());
        for item in items {
            match item {
                Some(s) => {
                    buf.extend_from_slice(&(s.len() as i32).to_be_bytes());
                    buf.extend_from_slice(s.as_bytes());
                }
                None => buf.extend_from_slice(&(-1i32).to_be_bytes()),
            }
        }
        buf
    }

    #[test]
    fn test_text_simple() {
        let arr = EnumArray::decode_text("{happy,sad,ok}").unwrap();
        assert_eq!(arr, EnumArray::new(labels(&[Some("happy"), Some("sad"), Some("ok")])));
    }

    #[test]
    fn test_text_quoted_and_null() {
        let arr = EnumArray::decode_text(r#"{"so so",NULL,"NULL","a \"b\" \\c"}"#).unwrap();
        assert_eq!(
            arr.into_vec(),
            labels(&[Some("so so"), None, Some("NULL"), Some(r#"a "b" \c"#)])
        );
    }

    #[test]
    fn test_text_empty() {
        let arr = EnumArray::decode_text("{}").unwrap();
        assert!(arr.is_empty());
        assert!(arr.dimensions.is_empty());
        assert!(EnumArray::decode_text("{ }").unwrap().is_empty());
    }

    #[test]
    fn test_text_whitespace_around_items() {
        let arr = EnumArray::decode_text("{ happy , sad }").unwrap();
        assert_eq!(arr.labels().collect::<Vec<_>>(), vec![Some("happy"), Some("sad")]);
    }

    #[test]
    fn test_text_multidimensional() {
        let arr = EnumArray::decode_text("{{a,b},{c,NULL}}").unwrap();
        assert_eq!(
            arr.dimensions,
            vec![
                ArrayDimension { len: 2, lower_bound: 1 },
                ArrayDimension { len: 2, lower_bound: 1 },
            ]
        );
        assert_eq!(arr.elements, labels(&[Some("a"), Some("b"), Some("c"), None]));
    }

    #[test]
    fn test_text_explicit_bounds() {
        let arr = EnumArray::decode_text("[0:1]={a,b}").unwrap();
        assert_eq!(arr.dimensions, vec![ArrayDimension { len: 2, lower_bound: 0 }]);

        assert_eq!(
            EnumArray::decode_text("[0:5]={a,b}").unwrap_err(),
            DecodeError::Bounds
        );
    }

    #[test]
    fn test_text_ragged() {
        assert_eq!(
            EnumArray::decode_text("{{a,b},{c}}").unwrap_err(),
            DecodeError::Ragged
        );
        assert_eq!(
            EnumArray::decode_text("{{a},b}").unwrap_err(),
            DecodeError::Ragged
        );
    }

    #[test]
    fn test_text_malformed() {
        assert!(matches!(
            EnumArray::decode_text("happy,sad"),
            Err(DecodeError::Syntax(_))
        ));
        assert!(matches!(
            EnumArray::decode_text("{happy"),
            Err(DecodeError::Syntax(_))
        ));
        assert!(matches!(
            EnumArray::decode_text("{happy} x"),
            Err(DecodeError::Trailing(_))
        ));
    }

    #[test]
    fn test_binary_matches_text() {
        let items = [Some("happy"), None, Some("so so")];
        let from_binary = EnumArray::decode(Format::Binary, &binary_payload(16401, &items)).unwrap();
        let from_text = EnumArray::decode(Format::Text, br#"{happy,NULL,"so so"}"#).unwrap();
        assert_eq!(from_binary, from_text);
    }

    #[test]
    fn test_binary_empty() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0i32.to_be_bytes());
        buf.extend_from_slice(&0i32.to_be_bytes());
        buf.extend_from_slice(&16401u32.to_be_bytes());
        let arr = EnumArray::decode_binary(&buf).unwrap();
        assert_eq!(arr, EnumArray::default());
    }

    #[test]
    fn test_binary_truncated() {
        let buf = binary_payload(16401, &[Some("happy")]);
        assert!(matches!(
            EnumArray::decode_binary(&buf[..buf.len() - 2]),
            Err(DecodeError::Binary(_))
        ));
    }

    #[test]
    fn test_text_bounds_overflow() {
        assert_eq!(
            EnumArray::decode_text("[-2147483648:2147483647]={a}").unwrap_err(),
            DecodeError::Bounds
        );
        assert_eq!(
            EnumArray::decode_text("[2147483647:-2147483648]={a}").unwrap_err(),
            DecodeError::Bounds
        );
    }

    #[test]
    fn test_text_nesting_limit() {
        let six = format!("{}a{}", "{".repeat(6), "}".repeat(6));
        let arr = EnumArray::decode_text(&six).unwrap();
        assert_eq!(arr.dimensions.len(), 6);

        let seven = format!("{}a{}", "{".repeat(7), "}".repeat(7));
        assert!(matches!(
            EnumArray::decode_text(&seven),
            Err(DecodeError::Syntax(_))
        ));

        let deep = "{".repeat(200_000) + &"}".repeat(200_000);
        assert!(matches!(
            EnumArray::decode_text(&deep),
            Err(DecodeError::Syntax(_))
        ));
    }

    #[test]
    fn test_text_braces_inside_quotes_do_not_nest() {
        let arr = EnumArray::decode_text(r#"{"{{{{{{{{","a \"{{{{{{{"}"#).unwrap();
        assert_eq!(arr.into_vec(), labels(&[Some("{{{{{{{{"), Some(r#"a "{{{{{{{"#)]));
    }

    #[test]
    fn test_codec_dispatch() {
        let arr = Codec::EnumArray.decode(Format::Text, b"{ok}").unwrap();
        assert_eq!(arr.labels().collect::<Vec<_>>(), vec![Some("ok")]);
    }
}
