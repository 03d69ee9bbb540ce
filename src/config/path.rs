//! Member paths: dotted navigation chains such as `Manager.Address.City`.

use nom::{
    bytes::complete::take_while1,
    character::complete::{char, multispace0},
    combinator::{all_consuming, verify},
    multi::separated_list1,
    sequence::delimited,
    IResult,
};
use serde::{Deserialize, Serialize};

use crate::error::{MapError, MapResult};

/// An ordered, duplicate-free chain of member names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct MemberPath(Vec<String>);

impl TryFrom<Vec<String>> for MemberPath {
    type Error = MapError;

    fn try_from(segments: Vec<String>) -> MapResult<Self> {
        Self::new(segments)
    }
}

impl From<MemberPath> for Vec<String> {
    fn from(path: MemberPath) -> Self {
        path.0
    }
}

impl MemberPath {
    /// Build a path from segments, rejecting empty paths and repeated members.
    pub fn new<I, S>(segments: I) -> MapResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(MapError::parse(0, "empty member path"));
        }
        for (i, seg) in segments.iter().enumerate() {
            if segments[..i].contains(seg) {
                return Err(MapError::parse(
                    i,
                    format!("member '{}' appears twice in path", seg),
                ));
            }
        }
        Ok(Self(segments))
    }

    /// A single-member path.
    pub fn single(name: &str) -> Self {
        Self(vec![name.to_string()])
    }

    /// Parse dotted text.
    pub fn parse(input: &str) -> MapResult<Self> {
        let input = input.trim();
        match all_consuming(parse_segments)(input) {
            Ok((_, segments)) => Self::new(segments),
            Err(nom::Err::Error(e) | nom::Err::Failure(e)) => Err(MapError::parse(
                input.len() - e.input.len(),
                format!("invalid member path '{}'", input),
            )),
            Err(nom::Err::Incomplete(_)) => Err(MapError::parse(input.len(), "incomplete member path")),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn first(&self) -> &str {
        &self.0[0]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The path with its first member removed, if anything remains.
    pub fn tail(&self) -> Option<MemberPath> {
        (self.0.len() > 1).then(|| Self(self.0[1..].to_vec()))
    }
}

impl std::fmt::Display for MemberPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl std::str::FromStr for MemberPath {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parse an identifier (letters, digits, underscore; not starting with a digit).
fn parse_identifier(input: &str) -> IResult<&str, &str> {
    verify(
        take_while1(|c: char| c.is_alphanumeric() || c == '_'),
        |s: &str| !s.starts_with(|c: char| c.is_ascii_digit()),
    )(input)
}

fn parse_segments(input: &str) -> IResult<&str, Vec<&str>> {
    separated_list1(delimited(multispace0, char('.'), multispace0), parse_identifier)(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_validates_segments() {
        let path: MemberPath = serde_json::from_str(r#"["Manager", "FullName"]"#).unwrap();
        assert_eq!(path.to_string(), "Manager.FullName");
        assert_eq!(serde_json::to_string(&path).unwrap(), r#"["Manager","FullName"]"#);

        let empty = serde_json::from_str::<MemberPath>("[]").unwrap_err();
        assert!(empty.to_string().contains("empty member path"));
        assert!(serde_json::from_str::<MemberPath>(r#"["Manager", "Manager"]"#).is_err());
    }

    #[test]
    fn test_parse_dotted() {
        let path = MemberPath::parse("Manager.Address.City").unwrap();
        assert_eq!(path.segments(), &["Manager", "Address", "City"]);
        assert_eq!(path.first(), "Manager");
        assert_eq!(path.tail().unwrap().to_string(), "Address.City");
    }

    #[test]
    fn test_parse_single() {
        let path: MemberPath = "FullName".parse().unwrap();
        assert_eq!(path, MemberPath::single("FullName"));
        assert!(path.tail().is_none());
    }

    #[test]
    fn test_rejects_duplicates() {
        let err = MemberPath::parse("Manager.Manager").unwrap_err();
        assert!(err.to_string().contains("appears twice"));
    }

    #[test]
    fn test_rejects_bad_syntax() {
        assert!(MemberPath::parse("Manager..City").is_err());
        assert!(MemberPath::parse("1st").is_err());
        assert!(MemberPath::parse("").is_err());
    }
}
