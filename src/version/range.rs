//! npm dependency ranges.
//!
//! Supports the range forms found in `package.json` dependency maps:
//! - `1.2.3`, `=1.2.3`, `v1.2.3` - exact
//! - `^1.2.3`, `~1.2.3` - caret and tilde
//! - `>=1.2.3`, `>1.2`, `<2`, `<=1.2.3` - comparators, optionally partial
//! - `1.2.x`, `1.x`, `*`, empty - wildcards
//! - `1.2.3 - 2.3` - hyphen ranges
//! - `>=1.0.0 <2.0.0` - intersections, `^1 || ^2` - unions
//!
//! Every form is lowered to a set of comparators, the way npm does it.
//! A prerelease version only matches when a comparator in the same
//! intersection names the same `major.minor.patch` with a prerelease.

use semver::{Prerelease, Version};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Comparator {
    op: Op,
    version: Version,
}

impl Comparator {
    fn new(op: Op, version: Version) -> Self {
        Self { op, version }
    }

    fn matches(&self, candidate: &Version) -> bool {
        let ord = cmp_precedence(candidate, &self.version);
        match self.op {
            Op::Eq => ord.is_eq(),
            Op::Gt => ord.is_gt(),
            Op::Gte => ord.is_ge(),
            Op::Lt => ord.is_lt(),
            Op::Lte => ord.is_le(),
        }
    }
}

/// A parsed npm range: a union of comparator intersections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    alternatives: Vec<Vec<Comparator>>,
}

impl VersionRange {
    /// Parses `input`, returning `None` for forms that are not version
    /// ranges (dist tags, URLs, git references, `file:` paths).
    pub fn parse(input: &str) -> Option<Self> {
        let alternatives = input
            .split("||")
            .map(parse_intersection)
            .collect::<Option<Vec<_>>>()?;
        Some(Self { alternatives })
    }

    /// Whether `version` satisfies the range.
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|set| {
            set.iter().all(|c| c.matches(version))
                && (version.pre.is_empty()
                    || set.iter().any(|c| {
                        !c.version.pre.is_empty()
                            && (c.version.major, c.version.minor, c.version.patch)
                                == (version.major, version.minor, version.patch)
                    }))
        })
    }
}

fn cmp_precedence(a: &Version, b: &Version) -> std::cmp::Ordering {
    (a.major, a.minor, a.patch)
        .cmp(&(b.major, b.minor, b.patch))
        .then_with(|| a.pre.cmp(&b.pre))
}

/// A version with any of its trailing parts missing or wildcarded.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Partial {
    major: Option<u64>,
    minor: Option<u64>,
    patch: Option<u64>,
    pre: Prerelease,
}

impl Partial {
    fn parse(s: &str) -> Option<Self> {
        let s = s.trim_start_matches('=').trim_start_matches('v');
        // Build metadata never affects matching.
        let s = s.split('+').next().unwrap_or(s);
        let (core, pre) = match s.split_once('-') {
            Some((core, pre)) => (core, Prerelease::new(pre).ok()?),
            None => (s, Prerelease::EMPTY),
        };

        let mut parts = core.split('.');
        let major = parse_part(parts.next())?;
        let minor = parse_part(parts.next())?;
        let patch = parse_part(parts.next())?;
        if parts.next().is_some() {
            return None;
        }

        // `1.x.3` is not a valid range.
        if (major.is_none() && (minor.is_some() || patch.is_some()))
            || (minor.is_none() && patch.is_some())
        {
            return None;
        }

        Some(Self {
            major,
            minor,
            patch,
            pre,
        })
    }

    fn is_full(&self) -> bool {
        self.patch.is_some()
    }

    /// Lowest version the partial covers.
    fn floor(&self) -> Version {
        let mut v = Version::new(
            self.major.unwrap_or(0),
            self.minor.unwrap_or(0),
            self.patch.unwrap_or(0),
        );
        v.pre = self.pre.clone();
        v
    }

    /// First version past everything the partial covers, `Some(None)` for
    /// `*`. `None` when the bump overflows.
    fn ceiling(&self) -> Option<Option<Version>> {
        let ceiling = match (self.major, self.minor, self.patch) {
            (None, _, _) => None,
            (Some(major), None, _) => Some(Version::new(bump(major)?, 0, 0)),
            (Some(major), Some(minor), None) => Some(Version::new(major, bump(minor)?, 0)),
            (Some(major), Some(minor), Some(patch)) => Some(Version::new(major, minor, bump(patch)?)),
        };
        Some(ceiling)
    }
}

fn bump(part: u64) -> Option<u64> {
    part.checked_add(1)
}

/// `None` when the part is present but neither a number nor a wildcard.
/// A missing part is returned as `Some(None)`.
fn parse_part(part: Option<&str>) -> Option<Option<u64>> {
    match part {
        None | Some("x" | "X" | "*") => Some(None),
        Some(n) if !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) => n.parse().ok().map(Some),
        Some(_) => None,
    }
}

fn parse_intersection(input: &str) -> Option<Vec<Comparator>> {
    let tokens = tokenize(input);

    if let [low, dash, high] = tokens.as_slice()
        && dash == "-"
    {
        return hyphen(low, high);
    }

    if tokens.is_empty() {
        return Some(vec![Comparator::new(Op::Gte, Version::new(0, 0, 0))]);
    }

    let mut comparators = Vec::new();
    for token in &tokens {
        comparators.extend(lower(token)?);
    }
    Some(comparators)
}

/// Splits on whitespace, gluing a bare operator to the version after it
/// (`>= 1.2.3` is the same as `>=1.2.3`).
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut pending: Option<&str> = None;
    for word in input.split_whitespace() {
        if matches!(word, ">" | ">=" | "<" | "<=" | "=" | "^" | "~" | "~>") {
            pending = Some(word);
            continue;
        }
        match pending.take() {
            Some(op) => tokens.push(format!("{op}{word}")),
            None => tokens.push(word.to_string()),
        }
    }
    tokens
}

fn hyphen(low: &str, high: &str) -> Option<Vec<Comparator>> {
    let low = Partial::parse(low)?;
    let high = Partial::parse(high)?;

    let mut comparators = vec![Comparator::new(Op::Gte, low.floor())];
    if high.is_full() {
        comparators.push(Comparator::new(Op::Lte, high.floor()));
    } else if let Some(ceiling) = high.ceiling()? {
        comparators.push(Comparator::new(Op::Lt, ceiling));
    }
    Some(comparators)
}

fn lower(token: &str) -> Option<Vec<Comparator>> {
    if let Some(rest) = token.strip_prefix('^') {
        return caret(&Partial::parse(rest)?);
    }
    if let Some(rest) = token.strip_prefix("~>").or_else(|| token.strip_prefix('~')) {
        return tilde(&Partial::parse(rest)?);
    }

    for (prefix, op) in [(">=", Op::Gte), ("<=", Op::Lte), (">", Op::Gt), ("<", Op::Lt)] {
        if let Some(rest) = token.strip_prefix(prefix) {
            return comparison(op, &Partial::parse(rest)?);
        }
    }

    let partial = Partial::parse(token)?;
    if partial.is_full() {
        return Some(vec![Comparator::new(Op::Eq, partial.floor())]);
    }
    Some(bounded(partial.floor(), partial.ceiling()?))
}

fn bounded(floor: Version, ceiling: Option<Version>) -> Vec<Comparator> {
    let mut comparators = vec![Comparator::new(Op::Gte, floor)];
    comparators.extend(ceiling.map(|c| Comparator::new(Op::Lt, c)));
    comparators
}

fn caret(p: &Partial) -> Option<Vec<Comparator>> {
    let ceiling = match (p.major, p.minor, p.patch) {
        (None, _, _) => None,
        (Some(0), Some(0), Some(patch)) => Some(Version::new(0, 0, bump(patch)?)),
        (Some(0), Some(minor), _) => Some(Version::new(0, bump(minor)?, 0)),
        (Some(major), _, _) => Some(Version::new(bump(major)?, 0, 0)),
    };
    Some(bounded(p.floor(), ceiling))
}

fn tilde(p: &Partial) -> Option<Vec<Comparator>> {
    let ceiling = match (p.major, p.minor) {
        (None, _) => None,
        (Some(major), None) => Some(Version::new(bump(major)?, 0, 0)),
        (Some(major), Some(minor)) => Some(Version::new(major, bump(minor)?, 0)),
    };
    Some(bounded(p.floor(), ceiling))
}

fn comparison(op: Op, p: &Partial) -> Option<Vec<Comparator>> {
    if p.is_full() {
        return Some(vec![Comparator::new(op, p.floor())]);
    }
    let comparator = match op {
        // `>1.2` means past every 1.2.x, `<=1.2` means up to every 1.2.x.
        Op::Gt => match p.ceiling()? {
            Some(ceiling) => Comparator::new(Op::Gte, ceiling),
            None => Comparator::new(Op::Lt, Version::new(0, 0, 0)),
        },
        Op::Lte => match p.ceiling()? {
            Some(ceiling) => Comparator::new(Op::Lt, ceiling),
            None => Comparator::new(Op::Gte, Version::new(0, 0, 0)),
        },
        Op::Lt => Comparator::new(Op::Lt, p.floor()),
        Op::Gte | Op::Eq => Comparator::new(Op::Gte, p.floor()),
    };
    Some(vec![comparator])
}
