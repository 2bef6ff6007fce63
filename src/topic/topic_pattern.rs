use std::convert::TryFrom;
use std::fmt;

use arcstr::{ArcStr, Substr};
use smallvec::SmallVec;
use thiserror::Error;

/// One segment of a wildcard topic filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TopicPatternItem {
	/// Literal segment, compared byte for byte.
	Str(Substr),
	/// `+`, exactly one segment.
	Plus,
	/// `#`, one or more trailing segments.
	Hash,
}

/// Error types for topic filter compilation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopicPatternError {
	/// Hash wildcard (#) used not at the end of the pattern
	#[error(
		"Invalid topic pattern '{pattern}': # wildcard can only be the last \
		 segment"
	)]
	HashPosition { pattern: String },

	/// Wildcard characters (+ or #) mixed with other characters in a segment
	#[error("Invalid wildcard usage: {usage}")]
	WildcardUsage { usage: String },

	/// Empty topic is not valid
	#[error("Topic pattern cannot be empty")]
	EmptyTopic,
}

impl TopicPatternError {
	/// Creates a new HashPosition error
	pub fn hash_position(pattern: impl Into<String>) -> Self {
		Self::HashPosition {
			pattern: pattern.into(),
		}
	}

	/// Creates a new WildcardUsage error
	pub fn wildcard_usage(usage: impl Into<String>) -> Self {
		Self::WildcardUsage {
			usage: usage.into(),
		}
	}

	/// Returns the error type for categorization
	pub fn error_type(&self) -> &'static str {
		match self {
			| TopicPatternError::HashPosition { .. } => "hash_position",
			| TopicPatternError::WildcardUsage { .. } => "wildcard_usage",
			| TopicPatternError::EmptyTopic => "empty_topic",
		}
	}
}

impl TopicPatternItem {
	pub fn as_str(&self) -> &str {
		match self {
			| TopicPatternItem::Str(s) => s,
			| TopicPatternItem::Plus => "+",
			| TopicPatternItem::Hash => "#",
		}
	}

	pub fn is_wildcard(&self) -> bool {
		!matches!(self, TopicPatternItem::Str(_))
	}
}

impl fmt::Display for TopicPatternItem {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

impl TryFrom<Substr> for TopicPatternItem {
	type Error = TopicPatternError;
	fn try_from(item: Substr) -> Result<Self, Self::Error> {
		let res = match item.as_str() {
			| "+" => TopicPatternItem::Plus,
			| "#" => TopicPatternItem::Hash,
			| _ if item.contains(['+', '#']) => {
				return Err(TopicPatternError::wildcard_usage(item.as_str()));
			}
			| _ => TopicPatternItem::Str(item),
		};
		Ok(res)
	}
}

/// Segments of a wildcard filter. Fleet topics rarely go deeper than six.
pub type PatternSegments = SmallVec<[TopicPatternItem; 6]>;

/// A compiled topic filter.
///
/// Filters without wildcard characters stay literal and match by plain
/// string equality. Either way the registry key of a pattern is the filter
/// string itself, so `sensors/1/data` and `sensors/+/data` are distinct keys
/// even though both match the topic `sensors/1/data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicPattern {
	/// Filter with no `+` or `#`.
	Literal(ArcStr),
	/// Filter with at least one wildcard segment.
	Wildcard {
		filter: ArcStr,
		segments: PatternSegments,
	},
}

impl TopicPattern {
	/// Compiles a broker-style topic filter.
	///
	/// Fails when the filter is empty, when `#` is anywhere but the last
	/// segment, or when a wildcard shares a segment with other characters.
	pub fn compile(
		filter: impl Into<ArcStr>,
	) -> Result<Self, TopicPatternError> {
		let filter = filter.into();
		if filter.is_empty() {
			return Err(TopicPatternError::EmptyTopic);
		}
		if !filter.contains(['+', '#']) {
			return Ok(TopicPattern::Literal(filter));
		}

		let segments = filter
			.split('/')
			.map(|s| filter.substr_from(s))
			.map(TopicPatternItem::try_from)
			.collect::<Result<PatternSegments, _>>()?;

		if let Some(hash_pos) = segments
			.iter()
			.position(|s| matches!(*s, TopicPatternItem::Hash))
		{
			if hash_pos != segments.len() - 1 {
				return Err(TopicPatternError::hash_position(filter.as_str()));
			}
		}

		Ok(TopicPattern::Wildcard { filter, segments })
	}

	/// The registry key: the filter string exactly as given.
	pub fn key(&self) -> &ArcStr {
		match self {
			| TopicPattern::Literal(filter) => filter,
			| TopicPattern::Wildcard { filter, .. } => filter,
		}
	}

	pub fn is_literal(&self) -> bool {
		matches!(self, TopicPattern::Literal(_))
	}

	/// Wildcard segments, or `None` for a literal filter.
	pub fn segments(&self) -> Option<&[TopicPatternItem]> {
		match self {
			| TopicPattern::Literal(_) => None,
			| TopicPattern::Wildcard { segments, .. } => Some(segments),
		}
	}

	/// Tests a concrete topic against this pattern.
	///
	/// `+` consumes exactly one segment (an empty one included). A trailing
	/// `#` consumes every remaining segment but needs at least one, so
	/// `a/#` does not match `a`. The empty segment of `a/` is enough.
	pub fn matches(&self, topic: &str) -> bool {
		match self {
			| TopicPattern::Literal(filter) => filter.as_str() == topic,
			| TopicPattern::Wildcard { segments, .. } => {
				matches_segments(segments, topic)
			}
		}
	}
}

fn matches_segments(segments: &[TopicPatternItem], topic: &str) -> bool {
	let mut topic_segments = topic.split('/');
	for pattern_segment in segments {
		match pattern_segment {
			| TopicPatternItem::Str(expected) => {
				match topic_segments.next() {
					| Some(found) if found == expected.as_str() => {}
					| _ => return false,
				}
			}
			| TopicPatternItem::Plus => {
				if topic_segments.next().is_none() {
					return false;
				}
			}
			| TopicPatternItem::Hash => {
				return topic_segments.next().is_some();
			}
		}
	}
	topic_segments.next().is_none()
}

impl TryFrom<&str> for TopicPattern {
	type Error = TopicPatternError;

	fn try_from(filter: &str) -> Result<Self, Self::Error> {
		TopicPattern::compile(filter)
	}
}

impl fmt::Display for TopicPattern {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.key())
	}
}
