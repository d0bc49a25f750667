//! Tokenizing of raw protocol lines.

/// One protocol line split into its positional parts.
///
/// A line has the form `[@tags] [:prefix] CODE [params...] [:content]`. The
/// trailing free text begins at the first ` :` delimiter; everything before
/// it is whitespace separated metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ParsedLine<'a> {
    pub(crate) prefix: Option<&'a str>,
    pub(crate) code: &'a str,
    pub(crate) params: Vec<&'a str>,
    pub(crate) content: Option<&'a str>,
}

impl<'a> ParsedLine<'a> {
    /// Split a trimmed line. Returns `None` when no command code is present.
    pub(crate) fn parse(line: &'a str) -> Option<Self> {
        let line = strip_tags(line.trim());
        let (metadata, content) = match line.find(" :") {
            Some(index) => (&line[..index], Some(&line[index + 2..])),
            None => (line, None),
        };
        let mut parts = metadata.split_whitespace();
        let first = parts.next()?;
        let (prefix, code) = match first.strip_prefix(':') {
            Some(prefix) => (Some(prefix), parts.next()?),
            None => (None, first),
        };
        Some(Self {
            prefix,
            code,
            params: parts.collect(),
            content,
        })
    }

    /// Positional parameter `index`, counted from zero after the code.
    pub(crate) fn param(&self, index: usize) -> Option<&'a str> { self.params.get(index).copied() }

    /// Nick portion of the prefix (`nick!user@host`).
    pub(crate) fn sender_nick(&self) -> Option<&'a str> {
        self.prefix
            .map(|prefix| prefix.split_once('!').map_or(prefix, |(nick, _)| nick))
    }

    /// Whether the prefix names a user rather than a server.
    pub(crate) fn from_user(&self) -> bool { self.prefix.is_some_and(|prefix| prefix.contains('!')) }

    /// Trailing content, falling back to the last positional parameter.
    ///
    /// Some servers omit the `:` delimiter when the final parameter has no
    /// spaces, for example `JOIN #room` versus `JOIN :#room`.
    pub(crate) fn content_or_last(&self) -> Option<&'a str> {
        self.content.or_else(|| self.params.last().copied())
    }
}

fn strip_tags(line: &str) -> &str {
    if line.starts_with('@') {
        line.split_once(' ').map_or("", |(_, rest)| rest.trim_start())
    } else {
        line
    }
}
