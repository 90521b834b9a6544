//! Plate domain library: plain-text wiki outlines distilled into an
//! in-memory "plate" of actionable items, filtered by time and context.
//!
//! The flow is deliberately simple and single-threaded: the readers in
//! [`parser`] rebuild a [`plate::Plate`] snapshot from the wiki sources, the
//! snapshot caches the context rules, and [`view`] renders the filtered
//! sections on demand. A snapshot is never patched in place; once a source
//! file is newer than the snapshot, the whole plate is rebuilt.

pub use crate::core::{DomainError, Result};
pub use crate::plate::{Plate, PlateCache};

pub mod core {
    use std::fmt;
    use std::path::PathBuf;

    use chrono::NaiveDateTime;
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    /* ------------------------------- IDs ------------------------------- */

    /// Identity of one plate snapshot.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct PlateId(pub Uuid);

    impl PlateId {
        pub fn new() -> Self {
            Self(Uuid::new_v4())
        }
    }

    /// Synthetic per-collection key; fresh keys are handed out sequentially.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ItemKey(pub u64);

    /* ---------------------------- Value Objects ---------------------------- */

    /// Which wiki source a line came from.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub enum SourceFile {
        Inboxes,
        Projects,
    }

    impl SourceFile {
        /// One-letter tag used in rendered locators.
        pub fn tag(self) -> char {
            match self {
                SourceFile::Inboxes => 'i',
                SourceFile::Projects => 'p',
            }
        }
    }

    /// Jump-to-origin locator: source file plus 1-based line number.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Locator {
        pub file: SourceFile,
        pub line: u32,
    }

    impl fmt::Display for Locator {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}{}", self.file.tag(), self.line)
        }
    }

    /// The list flavour denoted by a marker character.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub enum ListKind {
        /// `-`: every element is processed independently.
        Unordered,
        /// `#`: elements are sequential; the first open one blocks the rest.
        Ordered,
        /// `*`: support material, skipped whole.
        Comment,
        /// `@`: free-text prose inside a list.
        Text,
    }

    impl ListKind {
        pub fn from_marker(marker: char) -> Option<Self> {
            match marker {
                '-' => Some(ListKind::Unordered),
                '#' => Some(ListKind::Ordered),
                '*' => Some(ListKind::Comment),
                '@' => Some(ListKind::Text),
                _ => None,
            }
        }
    }

    /// How many more elements of the current list may be processed.
    ///
    /// `Skip` never admits an element, `Unlimited` always does, and
    /// `Remaining(n)` counts down as open elements are consumed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Quota {
        Unlimited,
        Skip,
        Remaining(u32),
    }

    impl Quota {
        pub fn for_list(kind: ListKind) -> Self {
            match kind {
                ListKind::Unordered | ListKind::Text => Quota::Unlimited,
                ListKind::Ordered => Quota::Remaining(1),
                ListKind::Comment => Quota::Skip,
            }
        }

        pub fn exhausted(self) -> bool {
            matches!(self, Quota::Skip | Quota::Remaining(0))
        }

        pub fn consume(&mut self) {
            if let Quota::Remaining(n) = self {
                *n = n.saturating_sub(1);
            }
        }
    }

    /* ------------------------------- Items ------------------------------- */

    /// A collection point that must be emptied on a schedule.
    ///
    /// Both timestamps derive from the last time the inbox was emptied:
    /// the item stays hidden for the configured break, then stays visible
    /// for the configured window before counting as overdue.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct InboxItem {
        pub name: String,
        pub last_emptied: NaiveDateTime,
        pub visible_at: NaiveDateTime,
        pub due_at: NaiveDateTime,
        pub contexts: Vec<String>,
        pub locator: Locator,
    }

    /// A concrete next physical action extracted from a project outline.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct NextAction {
        pub name: String,
        pub visible_at: Option<NaiveDateTime>,
        pub due_at: Option<NaiveDateTime>,
        pub contexts: Vec<String>,
        /// Title of the enclosing project block, when one was in effect.
        pub project: Option<String>,
        pub locator: Locator,
    }

    /// A dated nudge; the single timestamp doubles as visible and due time.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Reminder {
        pub name: String,
        pub at: Option<NaiveDateTime>,
        pub contexts: Vec<String>,
        pub locator: Locator,
    }

    /* ---------------------------- Errors (domain) ---------------------------- */

    #[derive(Debug, thiserror::Error)]
    pub enum DomainError {
        #[error("cannot read source file {path:?}")]
        Source {
            path: PathBuf,
            #[source]
            source: std::io::Error,
        },
        #[error("invalid pattern `{pattern}`")]
        Pattern {
            pattern: String,
            #[source]
            source: regex::Error,
        },
        #[error("outline nesting exceeds {max} levels at line {line}")]
        OutlineTooDeep { line: u32, max: usize },
        #[error("configuration error: {message}")]
        Config { message: String },
    }

    pub type Result<T> = std::result::Result<T, DomainError>;

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn locator_renders_tag_and_line() {
            let inbox = Locator {
                file: SourceFile::Inboxes,
                line: 12,
            };
            let project = Locator {
                file: SourceFile::Projects,
                line: 340,
            };
            assert_eq!(inbox.to_string(), "i12");
            assert_eq!(project.to_string(), "p340");
        }

        #[test]
        fn quota_for_each_list_kind() {
            assert_eq!(Quota::for_list(ListKind::Unordered), Quota::Unlimited);
            assert_eq!(Quota::for_list(ListKind::Text), Quota::Unlimited);
            assert_eq!(Quota::for_list(ListKind::Ordered), Quota::Remaining(1));
            assert_eq!(Quota::for_list(ListKind::Comment), Quota::Skip);
        }

        #[test]
        fn quota_transitions() {
            let mut unlimited = Quota::Unlimited;
            unlimited.consume();
            assert_eq!(unlimited, Quota::Unlimited);
            assert!(!unlimited.exhausted());

            assert!(Quota::Skip.exhausted());

            let mut counted = Quota::Remaining(1);
            assert!(!counted.exhausted());
            counted.consume();
            assert_eq!(counted, Quota::Remaining(0));
            assert!(counted.exhausted());
            counted.consume();
            assert_eq!(counted, Quota::Remaining(0));
        }

        #[test]
        fn list_kind_from_marker() {
            assert_eq!(ListKind::from_marker('-'), Some(ListKind::Unordered));
            assert_eq!(ListKind::from_marker('#'), Some(ListKind::Ordered));
            assert_eq!(ListKind::from_marker('*'), Some(ListKind::Comment));
            assert_eq!(ListKind::from_marker('@'), Some(ListKind::Text));
            assert_eq!(ListKind::from_marker('='), None);
        }
    }
}

pub mod config {
    //! Injected configuration: wiki paths, the user-tunable patterns, and the
    //! per-section summarize switches. Patterns are compiled once up front so
    //! an invalid one fails the whole operation instead of silently matching
    //! nothing.

    use std::fs;
    use std::path::{Path, PathBuf};

    use regex::Regex;
    use serde::{Deserialize, Serialize};

    use crate::core::{DomainError, Result};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(default)]
    pub struct Config {
        /// Directory holding the wiki sources; a leading `~` expands to $HOME.
        pub wiki_dir: String,
        pub inboxes_file: String,
        pub projects_file: String,
        /// Watched for staleness when present, but not parsed.
        pub someday_file: Option<String>,
        /// Watched for staleness when present, but not parsed.
        pub checklists_file: Option<String>,
        /// Context rules file; `-name` tokens are avoided, the rest used.
        pub contexts_file: String,
        /// Must capture a `datetime` group holding the date stamp.
        pub datetime_pattern: String,
        pub inbox_header_pattern: String,
        pub thoughts_header_pattern: String,
        pub reminders_header_pattern: String,
        pub summarize: Summarize,
    }

    /// Per-section choice between a one-line count and the full listing.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct Summarize {
        pub inboxes: bool,
        pub next_actions: bool,
        pub reminders: bool,
    }

    impl Default for Summarize {
        fn default() -> Self {
            Self {
                inboxes: true,
                next_actions: true,
                reminders: true,
            }
        }
    }

    impl Default for Config {
        fn default() -> Self {
            Self {
                wiki_dir: "~/wiki".to_string(),
                inboxes_file: "inboxes.wiki".to_string(),
                projects_file: "projects.wiki".to_string(),
                someday_file: None,
                checklists_file: None,
                contexts_file: "~/.plate-contexts".to_string(),
                datetime_pattern: r"(?P<datetime>\d{4}-\d{2}-\d{2}(?: \d{2}:\d{2})?)".to_string(),
                inbox_header_pattern: r"^=+\s+Inboxes".to_string(),
                thoughts_header_pattern: r"^=+\s+Thoughts".to_string(),
                reminders_header_pattern: r"^=+\s+Reminders".to_string(),
                summarize: Summarize::default(),
            }
        }
    }

    impl Config {
        /// Load a configuration from a JSON file; absent keys keep defaults.
        pub fn load(path: &Path) -> Result<Self> {
            let text = fs::read_to_string(path).map_err(|source| DomainError::Source {
                path: path.to_path_buf(),
                source,
            })?;
            serde_json::from_str(&text).map_err(|err| DomainError::Config {
                message: format!("cannot parse {}: {err}", path.display()),
            })
        }

        pub fn wiki_dir(&self) -> Result<PathBuf> {
            expand_home(&self.wiki_dir)
        }

        pub fn inboxes_path(&self) -> Result<PathBuf> {
            Ok(self.wiki_dir()?.join(&self.inboxes_file))
        }

        pub fn projects_path(&self) -> Result<PathBuf> {
            Ok(self.wiki_dir()?.join(&self.projects_file))
        }

        pub fn contexts_path(&self) -> Result<PathBuf> {
            expand_home(&self.contexts_file)
        }

        /// Every file whose modification time invalidates a snapshot.
        pub fn watched_paths(&self) -> Result<Vec<PathBuf>> {
            let dir = self.wiki_dir()?;
            let mut paths = vec![dir.join(&self.inboxes_file), dir.join(&self.projects_file)];
            if let Some(name) = &self.someday_file {
                paths.push(dir.join(name));
            }
            if let Some(name) = &self.checklists_file {
                paths.push(dir.join(name));
            }
            Ok(paths)
        }
    }

    /// Expand a leading `~` to the caller's home directory.
    pub fn expand_home(path: &str) -> Result<PathBuf> {
        match path.strip_prefix('~') {
            Some(rest) => {
                let home = std::env::var("HOME").map_err(|_| DomainError::Config {
                    message: "HOME is not set; cannot expand `~`".to_string(),
                })?;
                Ok(PathBuf::from(format!("{home}{rest}")))
            }
            None => Ok(PathBuf::from(path)),
        }
    }

    /* ---------------------------- Compiled set ---------------------------- */

    /// The compiled regexes used across one refresh.
    #[derive(Debug, Clone)]
    pub struct Patterns {
        /// `>`/`<` marker plus the injected datetime grammar.
        pub date_token: Regex,
        /// Datetime stamp followed by the `+break,window` offsets.
        pub inbox_stamp: Regex,
        /// `REMIND` keyword followed by a datetime stamp.
        pub remind: Regex,
        pub inbox_header: Regex,
        pub thoughts_header: Regex,
        pub reminders_header: Regex,
    }

    impl Patterns {
        pub fn compile(cfg: &Config) -> Result<Self> {
            let datetime = compile_pattern(&cfg.datetime_pattern)?;
            if !datetime.capture_names().flatten().any(|name| name == "datetime") {
                return Err(DomainError::Config {
                    message: format!(
                        "datetime pattern `{}` must define a (?P<datetime>...) group",
                        cfg.datetime_pattern
                    ),
                });
            }
            Ok(Self {
                date_token: compile_pattern(&format!(
                    r"\s+(?P<kind>[<>]){}",
                    cfg.datetime_pattern
                ))?,
                inbox_stamp: compile_pattern(&format!(
                    r"{}\s+\+(?P<break>\d+),(?P<window>\d+)",
                    cfg.datetime_pattern
                ))?,
                remind: compile_pattern(&format!(r"\s*REMIND\s*{}", cfg.datetime_pattern))?,
                inbox_header: compile_pattern(&cfg.inbox_header_pattern)?,
                thoughts_header: compile_pattern(&cfg.thoughts_header_pattern)?,
                reminders_header: compile_pattern(&cfg.reminders_header_pattern)?,
            })
        }

        pub fn is_inbox_header(&self, line: &str) -> bool {
            match_start(&self.inbox_header, line)
        }

        pub fn is_thoughts_header(&self, line: &str) -> bool {
            match_start(&self.thoughts_header, line)
        }

        pub fn is_reminders_header(&self, line: &str) -> bool {
            match_start(&self.reminders_header, line)
        }
    }

    fn compile_pattern(pattern: &str) -> Result<Regex> {
        Regex::new(pattern).map_err(|source| DomainError::Pattern {
            pattern: pattern.to_string(),
            source,
        })
    }

    /// Header patterns are anchored: they must match from column zero.
    fn match_start(re: &Regex, line: &str) -> bool {
        re.find(line).is_some_and(|m| m.start() == 0)
    }

}

pub mod annotate {
    //! Inline annotation extraction: embedded date tokens (`>visible`,
    //! `<due`) and context tags (`@name`, `@@name`).
    //!
    //! Everything here is pure and total: a line with no annotations, or
    //! with malformed ones, simply yields empty results.

    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
    use nom::bytes::complete::take_while_m_n;
    use nom::character::complete::char;
    use nom::combinator::map_res;
    use nom::sequence::tuple;
    use once_cell::sync::Lazy;
    use regex::Regex;

    type PResult<'a, T> = nom::IResult<&'a str, T>;

    /// Which side of the scheduling window a date token describes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum DateKind {
        Visible,
        Due,
    }

    impl DateKind {
        /// Wall-clock time implied by a date-only stamp.
        fn implied_time(self) -> NaiveTime {
            let (hour, minute) = match self {
                DateKind::Visible => (0, 1),
                DateKind::Due => (23, 59),
            };
            NaiveTime::from_hms_opt(hour, minute, 0).expect("valid implied time")
        }
    }

    /// Parse a date stamp, with optional trailing time, into a timestamp.
    ///
    /// A 10-character stamp is a bare date and takes the time implied by
    /// `kind`; a 16-character stamp must read `YYYY-MM-DD HH:MM`. Any other
    /// shape is rejected by returning `None`.
    pub fn parse_datetime(token: &str, kind: DateKind) -> Option<NaiveDateTime> {
        match token.len() {
            10 => {
                let (rest, date) = parse_date(token).ok()?;
                rest.is_empty()
                    .then(|| NaiveDateTime::new(date, kind.implied_time()))
            }
            16 => {
                let (rest, (date, _, time)) =
                    tuple((parse_date, char(' '), parse_time))(token).ok()?;
                rest.is_empty().then(|| NaiveDateTime::new(date, time))
            }
            _ => None,
        }
    }

    /// Pull `>visible` and `<due` tokens out of a line.
    ///
    /// The last token of each kind wins, and every matched token is
    /// stripped from the returned text.
    pub fn extract_dates(
        text: &str,
        date_token: &Regex,
    ) -> (String, Option<NaiveDateTime>, Option<NaiveDateTime>) {
        let mut visible = None;
        let mut due = None;
        for caps in date_token.captures_iter(text) {
            let token = match caps.name("datetime") {
                Some(m) => m.as_str(),
                None => continue,
            };
            match &caps["kind"] {
                ">" => visible = parse_datetime(token, DateKind::Visible),
                "<" => due = parse_datetime(token, DateKind::Due),
                _ => {}
            }
        }
        let stripped = date_token.replace_all(text, "").into_owned();
        (stripped, visible, due)
    }

    static CONTEXT_TOKEN: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\s+@{1,2}(?P<context>\w+)").expect("context token pattern"));
    static SINGLE_CONTEXT: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\s+@\w+").expect("single context pattern"));
    static LIST_MARKER_LEAD: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^\s*[-*#@]\s*").expect("list marker pattern"));
    static ACTION_LEAD: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^\s*@\s+").expect("action lead pattern"));

    /// Collect `@name` / `@@name` tags in order of appearance.
    ///
    /// Single-`@` tags are removed from the text; double-`@` tags keep their
    /// word visible. The leading list marker is stripped as well.
    pub fn extract_contexts(text: &str) -> (String, Vec<String>) {
        let contexts = CONTEXT_TOKEN
            .captures_iter(text)
            .map(|caps| caps["context"].to_string())
            .collect();
        let stripped = SINGLE_CONTEXT.replace_all(text, "");
        let stripped = stripped.replace("@@", "");
        let stripped = LIST_MARKER_LEAD.replace(&stripped, "").into_owned();
        (stripped, contexts)
    }

    /// Remove the isolated `@ ` that introduces action text.
    pub fn strip_action_lead(text: &str) -> String {
        ACTION_LEAD.replace(text, "").into_owned()
    }

    fn parse_date(i: &str) -> PResult<'_, NaiveDate> {
        map_res(
            tuple((
                map_res(take_while_m_n(4, 4, ascii_digit), |s: &str| s.parse::<i32>()),
                char('-'),
                map_res(take_while_m_n(2, 2, ascii_digit), |s: &str| s.parse::<u32>()),
                char('-'),
                map_res(take_while_m_n(2, 2, ascii_digit), |s: &str| s.parse::<u32>()),
            )),
            |(y, _, m, _, d)| NaiveDate::from_ymd_opt(y, m, d).ok_or("invalid calendar date"),
        )(i)
    }

    fn parse_time(i: &str) -> PResult<'_, NaiveTime> {
        map_res(
            tuple((
                map_res(take_while_m_n(2, 2, ascii_digit), |s: &str| s.parse::<u32>()),
                char(':'),
                map_res(take_while_m_n(2, 2, ascii_digit), |s: &str| s.parse::<u32>()),
            )),
            |(h, _, m)| NaiveTime::from_hms_opt(h, m, 0).ok_or("invalid wall-clock time"),
        )(i)
    }

    fn ascii_digit(c: char) -> bool {
        c.is_ascii_digit()
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::config::{Config, Patterns};

        fn dt(s: &str) -> NaiveDateTime {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").expect("test timestamp")
        }

        fn date_token() -> Regex {
            Patterns::compile(&Config::default())
                .expect("default patterns")
                .date_token
        }

        #[test]
        fn full_stamp_parses_exactly() {
            assert_eq!(
                parse_datetime("2020-03-04 12:30", DateKind::Due),
                Some(dt("2020-03-04 12:30"))
            );
        }

        #[test]
        fn date_only_stamp_takes_implied_time() {
            assert_eq!(
                parse_datetime("2020-03-04", DateKind::Visible),
                Some(dt("2020-03-04 00:01"))
            );
            assert_eq!(
                parse_datetime("2020-03-04", DateKind::Due),
                Some(dt("2020-03-04 23:59"))
            );
        }

        #[test]
        fn malformed_stamps_are_rejected() {
            assert_eq!(parse_datetime("2020-3-4", DateKind::Due), None);
            assert_eq!(parse_datetime("2020-13-04", DateKind::Due), None);
            assert_eq!(parse_datetime("2020-03-04 25:00", DateKind::Due), None);
            assert_eq!(parse_datetime("2020-03-04T12:30", DateKind::Due), None);
            assert_eq!(parse_datetime("next tuesday", DateKind::Due), None);
        }

        #[test]
        fn extract_dates_strips_and_returns_both_kinds() {
            let (text, visible, due) =
                extract_dates("Call Bob >2020-01-02 <2020-01-05", &date_token());
            assert_eq!(text, "Call Bob");
            assert_eq!(visible, Some(dt("2020-01-02 00:01")));
            assert_eq!(due, Some(dt("2020-01-05 23:59")));
        }

        #[test]
        fn extract_dates_last_match_wins() {
            let (text, _, due) =
                extract_dates("Pay bill <2020-01-05 <2020-02-01 09:00", &date_token());
            assert_eq!(text, "Pay bill");
            assert_eq!(due, Some(dt("2020-02-01 09:00")));
        }

        #[test]
        fn extract_dates_without_tokens_is_identity() {
            let (text, visible, due) = extract_dates("nothing here", &date_token());
            assert_eq!(text, "nothing here");
            assert_eq!(visible, None);
            assert_eq!(due, None);
        }

        #[test]
        fn extract_contexts_in_order_of_appearance() {
            let (text, contexts) = extract_contexts("- @ Call Bob @home @@errands");
            assert_eq!(contexts, vec!["home", "errands"]);
            assert_eq!(text, "@ Call Bob errands");
            assert_eq!(strip_action_lead(&text), "Call Bob errands");
        }

        #[test]
        fn extract_contexts_without_tags_only_drops_marker() {
            let (text, contexts) = extract_contexts("  - plain entry");
            assert!(contexts.is_empty());
            assert_eq!(text, "plain entry");
        }
    }
}

pub mod parser {
    //! Line-oriented readers for the two wiki sources.
    //!
    //! The projects reader walks nested, indentation-delimited lists with a
    //! recursive scanner. Unordered lists admit every element; in an ordered
    //! list the first element that is still open blocks all later siblings;
    //! comment lists are skipped whole; and a finished parent prunes its
    //! entire subtree. The scanner keeps no tree: each recursion level holds
    //! only its master indent, a [`Quota`] and two flags, and the shared
    //! cursor strictly advances, so the walk always terminates.

    use chrono::Duration;
    use log::debug;
    use nom::bytes::complete::take_while1;
    use nom::character::complete::{char, one_of, satisfy, space0, space1};
    use nom::sequence::{preceded, terminated, tuple};

    use crate::annotate::{self, DateKind};
    use crate::config::Patterns;
    use crate::core::{DomainError, InboxItem, ListKind, Locator, Quota, Reminder, Result, SourceFile};
    use crate::plate::Plate;

    /// Deepest list nesting the scanner will follow.
    pub const MAX_OUTLINE_DEPTH: usize = 32;

    type PResult<'a, T> = nom::IResult<&'a str, T>;

    /* ------------------------------- Cursor ------------------------------- */

    /// Scan position over the lines of one source file.
    ///
    /// The cursor is shared across recursion levels: when a nested list
    /// ends, the cursor is left on the first line the caller still has to
    /// look at.
    pub struct LineCursor<'a> {
        lines: std::str::Lines<'a>,
        current: Option<&'a str>,
        line: u32,
    }

    impl<'a> LineCursor<'a> {
        pub fn new(text: &'a str) -> Self {
            let mut cursor = Self {
                lines: text.lines(),
                current: None,
                line: 0,
            };
            cursor.advance();
            cursor
        }

        pub fn advance(&mut self) {
            self.current = self.lines.next();
            if self.current.is_some() {
                self.line += 1;
            }
        }

        pub fn current(&self) -> Option<&'a str> {
            self.current
        }

        /// 1-based number of the current line.
        pub fn line(&self) -> u32 {
            self.line
        }
    }

    /* --------------------------- Line classifiers --------------------------- */

    /// The list kind when this line opens a list element.
    pub fn list_start(line: &str) -> Option<ListKind> {
        let result: PResult<'_, char> = preceded(space0, terminated(one_of("-#*@"), space1))(line);
        match result {
            Ok((_, marker)) => ListKind::from_marker(marker),
            Err(_) => None,
        }
    }

    /// Width of the leading whitespace run; a blank line counts as zero.
    pub fn opening_indent(line: &str) -> usize {
        if line.trim().is_empty() {
            return 0;
        }
        line.chars().take_while(|c| c.is_whitespace()).count()
    }

    pub fn is_blank(line: &str) -> bool {
        line.trim().is_empty()
    }

    /// A `=... word` heading that separates wiki sections.
    pub fn is_section_header(line: &str) -> bool {
        let result: PResult<'_, _> = tuple((
            take_while1(|c| c == '='),
            space1,
            satisfy(|c: char| c.is_alphanumeric() || c == '_'),
        ))(line);
        result.is_ok()
    }

    /// A finished or abandoned entry.
    pub fn is_done(line: &str) -> bool {
        line.contains("DONE") || line.contains("WONTDO")
    }

    /// A list element whose marker is followed by an isolated `@`.
    pub fn is_next_action(line: &str) -> bool {
        let result: PResult<'_, _> =
            tuple((space0, one_of("-#*@"), space1, char('@'), space1))(line);
        result.is_ok()
    }

    pub fn is_recur(line: &str) -> bool {
        line.contains("RECUR")
    }

    /* ------------------------------- Inboxes ------------------------------- */

    /// Read the inboxes source: an Inboxes section of scheduled collection
    /// points, then (after the Thoughts section) a Reminders section.
    pub fn read_inboxes(text: &str, patterns: &Patterns, plate: &mut Plate) {
        let mut cursor = LineCursor::new(text);

        while let Some(line) = cursor.current() {
            if patterns.is_inbox_header(line) {
                break;
            }
            cursor.advance();
        }
        cursor.advance(); // past the Inboxes header

        while let Some(line) = cursor.current() {
            if patterns.is_thoughts_header(line) {
                break;
            }
            add_inbox_entry(line, cursor.line(), patterns, plate);
            cursor.advance();
        }

        while let Some(line) = cursor.current() {
            if patterns.is_reminders_header(line) {
                break;
            }
            cursor.advance();
        }
        cursor.advance(); // past the Reminders header

        while let Some(line) = cursor.current() {
            add_reminder_entry(line, cursor.line(), patterns, plate);
            cursor.advance();
        }
    }

    fn add_inbox_entry(line: &str, linenum: u32, patterns: &Patterns, plate: &mut Plate) {
        let Some(caps) = patterns.inbox_stamp.captures(line) else {
            return;
        };
        let Some(token) = caps.name("datetime") else {
            return;
        };
        let Some(last_emptied) = annotate::parse_datetime(token.as_str(), DateKind::Visible) else {
            return;
        };
        let (Ok(break_days), Ok(window_days)) =
            (caps["break"].parse::<i64>(), caps["window"].parse::<i64>())
        else {
            return;
        };
        let Some(visible_at) =
            Duration::try_days(break_days).and_then(|d| last_emptied.checked_add_signed(d))
        else {
            return;
        };
        let Some(due_at) =
            Duration::try_days(window_days).and_then(|d| visible_at.checked_add_signed(d))
        else {
            return;
        };

        let (text, contexts) = annotate::extract_contexts(line);
        let name = patterns.inbox_stamp.replace_all(&text, "").trim().to_string();
        plate.add_inbox(InboxItem {
            name,
            last_emptied,
            visible_at,
            due_at,
            contexts,
            locator: Locator {
                file: SourceFile::Inboxes,
                line: linenum,
            },
        });
    }

    fn add_reminder_entry(line: &str, linenum: u32, patterns: &Patterns, plate: &mut Plate) {
        let Some(caps) = patterns.remind.captures(line) else {
            return;
        };
        let Some(token) = caps.name("datetime") else {
            return;
        };
        let at = annotate::parse_datetime(token.as_str(), DateKind::Visible);
        let (text, contexts) = annotate::extract_contexts(line);
        let name = patterns.remind.replace_all(&text, "").trim().to_string();
        plate.add_reminder(Reminder {
            name,
            at,
            contexts,
            locator: Locator {
                file: SourceFile::Inboxes,
                line: linenum,
            },
        });
    }

    /* ------------------------------- Projects ------------------------------- */

    /// Read the projects source: free-text project titles followed by their
    /// nested outline blocks.
    pub fn read_projects(text: &str, patterns: &Patterns, plate: &mut Plate) -> Result<()> {
        let mut cursor = LineCursor::new(text);
        let mut project: Option<String> = None;
        while let Some(line) = cursor.current() {
            if list_start(line).is_some() {
                process_outline(&mut cursor, 0, project.as_deref(), patterns, plate)?;
            } else {
                if is_blank(line) || is_section_header(line) {
                    project = None;
                } else {
                    project = Some(line.trim().to_string());
                }
                cursor.advance();
            }
        }
        Ok(())
    }

    fn process_outline(
        cursor: &mut LineCursor<'_>,
        depth: usize,
        project: Option<&str>,
        patterns: &Patterns,
        plate: &mut Plate,
    ) -> Result<()> {
        let Some(first) = cursor.current() else {
            return Ok(());
        };
        if depth >= MAX_OUTLINE_DEPTH {
            return Err(DomainError::OutlineTooDeep {
                line: cursor.line(),
                max: MAX_OUTLINE_DEPTH,
            });
        }
        let master_indent = opening_indent(first);
        let kind = list_start(first).unwrap_or(ListKind::Text);
        let mut quota = Quota::for_list(kind);
        let mut blocked = false;
        let mut parent_done = false;

        while let Some(line) = cursor.current() {
            let indent = opening_indent(line);
            if indent < master_indent {
                // This list is over; the caller resumes at this line.
                return Ok(());
            }
            if blocked {
                cursor.advance();
                continue;
            }
            if indent > master_indent {
                if parent_done {
                    cursor.advance();
                    continue;
                }
                if list_start(line).is_some() {
                    process_outline(cursor, depth + 1, project, patterns, plate)?;
                } else {
                    debug!(
                        "continuation text at line {}: {:?}",
                        cursor.line(),
                        line.trim()
                    );
                    cursor.advance();
                }
                continue;
            }

            // A sibling at the master indent.
            if quota.exhausted() {
                blocked = true;
                continue;
            }
            if is_done(line) {
                parent_done = true;
            } else {
                parent_done = false;
                quota.consume();
            }
            if is_next_action(line) {
                plate.add_next_action(line, cursor.line(), project, patterns);
            } else if is_recur(line) {
                debug!("recurring entry at line {} is not handled yet", cursor.line());
            }
            cursor.advance();
        }
        Ok(())
    }

}

pub mod plate {
    //! The aggregate snapshot of everything currently on the user's plate,
    //! plus the cache that owns the rebuild-and-swap sequence.

    use std::fs;
    use std::path::Path;

    use chrono::{DateTime, Local, NaiveDateTime};
    use indexmap::IndexMap;
    use log::{debug, info};
    use serde::{Deserialize, Serialize};

    use crate::config::{Config, Patterns};
    use crate::core::{
        DomainError, InboxItem, ItemKey, Locator, NextAction, PlateId, Reminder, Result,
        SourceFile,
    };
    use crate::{annotate, parser};

    /* ----------------------------- Context rules ----------------------------- */

    /// Whitelist/blacklist of context tags, cached against the rules file's
    /// modification time.
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct ContextRules {
        pub use_contexts: Vec<String>,
        pub avoid_contexts: Vec<String>,
        /// When the rules file was last read; `None` before the first load.
        pub checked_at: Option<NaiveDateTime>,
    }

    impl ContextRules {
        /// Parse a rules file: `#` comments stripped, blank lines ignored,
        /// remaining tokens are context names, `-` prefix meaning avoid.
        pub fn parse(text: &str) -> Self {
            let mut rules = ContextRules::default();
            for line in text.lines() {
                let line = match line.find('#') {
                    Some(idx) => &line[..idx],
                    None => line,
                };
                for token in line.split_whitespace() {
                    if let Some(avoided) = token.strip_prefix('-') {
                        rules.avoid_contexts.push(avoided.to_string());
                    } else {
                        rules.use_contexts.push(token.to_string());
                    }
                }
            }
            rules
        }
    }

    /* ------------------------------- Aggregate ------------------------------- */

    /// Aggregate root: one snapshot of all parsed items.
    ///
    /// A plate is populated once by a full parse and never patched; when any
    /// watched source file is newer than `created`, the whole snapshot is
    /// rebuilt. `now` is refreshed on every display request.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Plate {
        pub id: PlateId,
        pub created: NaiveDateTime,
        pub now: NaiveDateTime,
        pub inboxes: IndexMap<ItemKey, InboxItem>,
        pub next_actions: IndexMap<ItemKey, NextAction>,
        pub reminders: IndexMap<ItemKey, Reminder>,
        pub rules: ContextRules,
    }

    impl Plate {
        pub fn new() -> Self {
            let created = Local::now().naive_local();
            Self {
                id: PlateId::new(),
                created,
                now: created,
                inboxes: IndexMap::new(),
                next_actions: IndexMap::new(),
                reminders: IndexMap::new(),
                rules: ContextRules::default(),
            }
        }

        /// Rebuild a snapshot from the configured wiki sources.
        pub fn build(cfg: &Config, patterns: &Patterns) -> Result<Self> {
            let mut plate = Plate::new();
            let inbox_text = read_source(&cfg.inboxes_path()?)?;
            parser::read_inboxes(&inbox_text, patterns, &mut plate);
            let projects_text = read_source(&cfg.projects_path()?)?;
            parser::read_projects(&projects_text, patterns, &mut plate)?;
            info!(
                "plate rebuilt: {} inboxes, {} next actions, {} reminders",
                plate.inboxes.len(),
                plate.next_actions.len(),
                plate.reminders.len()
            );
            Ok(plate)
        }

        /// Whether any watched source file changed after this snapshot was
        /// created.
        pub fn stale(&self, cfg: &Config) -> Result<bool> {
            for path in cfg.watched_paths()? {
                if file_mtime(&path)? > self.created {
                    return Ok(true);
                }
            }
            Ok(false)
        }

        /// Advance `now` and reload the context rules when their file has
        /// changed since the last load.
        pub fn refresh(&mut self, cfg: &Config) -> Result<()> {
            self.now = Local::now().naive_local();
            let path = cfg.contexts_path()?;
            let changed = match self.rules.checked_at {
                None => true,
                Some(checked) => file_mtime(&path)? > checked,
            };
            if changed {
                let text = fs::read_to_string(&path).map_err(|source| DomainError::Source {
                    path: path.clone(),
                    source,
                })?;
                let mut rules = ContextRules::parse(&text);
                rules.checked_at = Some(self.now);
                debug!(
                    "context rules reloaded: {} used, {} avoided",
                    rules.use_contexts.len(),
                    rules.avoid_contexts.len()
                );
                self.rules = rules;
            }
            Ok(())
        }

        /// An item visible after `vis` can be seen now; no timestamp means
        /// always visible.
        pub fn visible(&self, vis: Option<NaiveDateTime>) -> bool {
            match vis {
                None => true,
                Some(vis) => vis < self.now,
            }
        }

        /// An item due at `due` is overdue once `now` passes it; no
        /// timestamp means never overdue.
        pub fn overdue(&self, due: Option<NaiveDateTime>) -> bool {
            match due {
                None => false,
                Some(due) => due < self.now,
            }
        }

        /// Context gate: any avoided context hides the item outright;
        /// otherwise at least one used context is required, except that
        /// `include_anon` admits items carrying no contexts at all.
        pub fn contexts_ok(&self, contexts: &[String], include_anon: bool) -> bool {
            let mut matches = false;
            for context in contexts {
                if self.rules.avoid_contexts.iter().any(|a| a == context) {
                    return false;
                }
                if self.rules.use_contexts.iter().any(|u| u == context) {
                    matches = true;
                }
            }
            matches || (include_anon && contexts.is_empty())
        }

        pub fn add_inbox(&mut self, item: InboxItem) -> ItemKey {
            let key = ItemKey(self.inboxes.len() as u64);
            self.inboxes.insert(key, item);
            key
        }

        /// Parse a raw outline line into a next action. Finished entries are
        /// refused.
        pub fn add_next_action(
            &mut self,
            line: &str,
            linenum: u32,
            project: Option<&str>,
            patterns: &Patterns,
        ) -> bool {
            if parser::is_done(line) {
                return false;
            }
            let (text, contexts) = annotate::extract_contexts(line);
            let (text, visible_at, due_at) = annotate::extract_dates(&text, &patterns.date_token);
            let name = annotate::strip_action_lead(&text).trim().to_string();
            let key = ItemKey(self.next_actions.len() as u64);
            self.next_actions.insert(
                key,
                NextAction {
                    name,
                    visible_at,
                    due_at,
                    contexts,
                    project: project.map(str::to_string),
                    locator: Locator {
                        file: SourceFile::Projects,
                        line: linenum,
                    },
                },
            );
            true
        }

        pub fn add_reminder(&mut self, item: Reminder) -> ItemKey {
            let key = ItemKey(self.reminders.len() as u64);
            self.reminders.insert(key, item);
            key
        }
    }

    impl Default for Plate {
        fn default() -> Self {
            Self::new()
        }
    }

    /* -------------------------------- Cache -------------------------------- */

    /// Owns the current snapshot and the check-staleness/rebuild/install
    /// sequence. A failed rebuild leaves the previous snapshot in place and
    /// surfaces the error.
    #[derive(Debug, Default)]
    pub struct PlateCache {
        current: Option<Plate>,
    }

    impl PlateCache {
        pub fn get_or_rebuild(&mut self, cfg: &Config, patterns: &Patterns) -> Result<&mut Plate> {
            let rebuild = match &self.current {
                None => true,
                Some(plate) => plate.stale(cfg)?,
            };
            if rebuild {
                let plate = Plate::build(cfg, patterns)?;
                self.current = Some(plate);
            }
            Ok(self
                .current
                .as_mut()
                .expect("a plate is installed after a successful rebuild"))
        }

        pub fn current(&self) -> Option<&Plate> {
            self.current.as_ref()
        }
    }

    /* ------------------------------ Filesystem ------------------------------ */

    pub fn file_mtime(path: &Path) -> Result<NaiveDateTime> {
        let meta = fs::metadata(path).map_err(|source| DomainError::Source {
            path: path.to_path_buf(),
            source,
        })?;
        let modified = meta.modified().map_err(|source| DomainError::Source {
            path: path.to_path_buf(),
            source,
        })?;
        let local: DateTime<Local> = modified.into();
        Ok(local.naive_local())
    }

    fn read_source(path: &Path) -> Result<String> {
        fs::read_to_string(path).map_err(|source| DomainError::Source {
            path: path.to_path_buf(),
            source,
        })
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use chrono::Duration;
        use std::fs;

        fn write_sources(dir: &Path) {
            fs::write(
                dir.join("inboxes.wiki"),
                "= Inboxes =\n\
                 - Email inbox 2020-01-01 00:01 +2,3\n\
                 = Thoughts =\n\
                 = Reminders =\n\
                 - Pay rent REMIND 2020-02-01\n",
            )
            .expect("write inboxes");
            fs::write(
                dir.join("projects.wiki"),
                "Taxes\n\
                 # @ gather receipts\n\
                 # @ fill the forms\n",
            )
            .expect("write projects");
        }

        fn test_config(dir: &Path) -> Config {
            Config {
                wiki_dir: dir.display().to_string(),
                ..Config::default()
            }
        }

        #[test]
        fn build_populates_all_three_collections() {
            let dir = tempfile::tempdir().expect("tempdir");
            write_sources(dir.path());
            let cfg = test_config(dir.path());
            let patterns = Patterns::compile(&cfg).expect("patterns");

            let plate = Plate::build(&cfg, &patterns).expect("build");
            assert_eq!(plate.inboxes.len(), 1);
            assert_eq!(plate.reminders.len(), 1);
            // Ordered list: only the first open step surfaces.
            assert_eq!(plate.next_actions.len(), 1);

            let inbox = &plate.inboxes[&ItemKey(0)];
            assert_eq!(
                inbox.visible_at,
                NaiveDateTime::parse_from_str("2020-01-03 00:01", "%Y-%m-%d %H:%M")
                    .expect("timestamp")
            );
            assert_eq!(
                inbox.due_at,
                NaiveDateTime::parse_from_str("2020-01-06 00:01", "%Y-%m-%d %H:%M")
                    .expect("timestamp")
            );
        }

        #[test]
        fn missing_source_file_is_fatal() {
            let dir = tempfile::tempdir().expect("tempdir");
            let cfg = test_config(dir.path());
            let patterns = Patterns::compile(&cfg).expect("patterns");

            let err = Plate::build(&cfg, &patterns).expect_err("missing sources");
            assert!(matches!(err, DomainError::Source { .. }));
        }

        #[test]
        fn staleness_tracks_the_snapshot_creation_time() {
            let dir = tempfile::tempdir().expect("tempdir");
            write_sources(dir.path());
            let cfg = test_config(dir.path());
            let patterns = Patterns::compile(&cfg).expect("patterns");

            let mut plate = Plate::build(&cfg, &patterns).expect("build");
            plate.created = plate.created + Duration::hours(1);
            assert!(!plate.stale(&cfg).expect("stale check"));

            plate.created = plate.created - Duration::hours(2);
            assert!(plate.stale(&cfg).expect("stale check"));
        }

        #[test]
        fn failed_rebuild_keeps_the_previous_snapshot() {
            let dir = tempfile::tempdir().expect("tempdir");
            write_sources(dir.path());
            let cfg = test_config(dir.path());
            let patterns = Patterns::compile(&cfg).expect("patterns");

            let mut cache = PlateCache::default();
            cache.get_or_rebuild(&cfg, &patterns).expect("first build");

            // Force a stale check against a now-unreadable source.
            fs::remove_file(dir.path().join("projects.wiki")).expect("remove projects");
            if let Some(plate) = cache.current.as_mut() {
                plate.created = plate.created - Duration::hours(1);
            }
            let err = cache.get_or_rebuild(&cfg, &patterns).expect_err("rebuild fails");
            assert!(matches!(err, DomainError::Source { .. }));
            assert!(cache.current().is_some());
        }

        #[test]
        fn context_rules_parse_comments_and_prefixes() {
            let rules = ContextRules::parse(
                "# my contexts\n\
                 home work   # active\n\
                 \n\
                 -phone\n",
            );
            assert_eq!(rules.use_contexts, vec!["home", "work"]);
            assert_eq!(rules.avoid_contexts, vec!["phone"]);
        }

        #[test]
        fn context_gate_prefers_avoid_over_use() {
            let mut plate = Plate::new();
            plate.rules = ContextRules {
                use_contexts: vec!["home".to_string()],
                avoid_contexts: vec!["phone".to_string()],
                checked_at: None,
            };

            let home = vec!["home".to_string()];
            let both = vec!["home".to_string(), "phone".to_string()];
            let other = vec!["office".to_string()];
            let none: Vec<String> = vec![];

            assert!(plate.contexts_ok(&home, false));
            assert!(!plate.contexts_ok(&both, false));
            assert!(!plate.contexts_ok(&other, false));
            assert!(!plate.contexts_ok(&none, false));
            // Anonymous items are admitted only where the caller opts in.
            assert!(plate.contexts_ok(&none, true));
            assert!(!plate.contexts_ok(&other, true));
        }

        #[test]
        fn visibility_and_overdue_windows() {
            let mut plate = Plate::new();
            plate.now = NaiveDateTime::parse_from_str("2020-06-15 12:00", "%Y-%m-%d %H:%M")
                .expect("timestamp");
            let earlier = plate.now - Duration::days(1);
            let later = plate.now + Duration::days(1);

            assert!(plate.visible(None));
            assert!(plate.visible(Some(earlier)));
            assert!(!plate.visible(Some(later)));

            assert!(!plate.overdue(None));
            assert!(plate.overdue(Some(earlier)));
            assert!(!plate.overdue(Some(later)));
        }
    }
}

pub mod view {
    //! Filtering and rendering: turns the current snapshot into the section
    //! strings shown to the user, either summarized to a count or expanded
    //! to a due-sorted listing.

    use chrono::NaiveDateTime;
    use indexmap::IndexMap;

    use crate::config::Config;
    use crate::core::{ItemKey, Result};
    use crate::plate::Plate;

    /// Collapse/expand glyph prefixed to a section.
    pub fn section_marker(summarize: bool) -> char {
        if summarize { '▸' } else { '▾' }
    }

    /// `count unit` with a default plural of `unit` + "s".
    pub fn pluralize(count: i64, unit: &str, plural: Option<&str>) -> String {
        if count == 1 {
            format!("1 {unit}")
        } else {
            match plural {
                Some(plural) => format!("{count} {plural}"),
                None => format!("{count} {unit}s"),
            }
        }
    }

    /// Humanize an elapsed number of seconds: "just now", then seconds,
    /// minutes and hours within the first day, then day/week/month/year
    /// buckets by integer division. Negative input renders as empty.
    pub fn pretty_date(total_secs: i64) -> String {
        const SECS_PER_DAY: i64 = 24 * 3600;
        let days = total_secs.div_euclid(SECS_PER_DAY);
        let secs = total_secs - days * SECS_PER_DAY;

        if days < 0 {
            return String::new();
        }
        if days == 0 {
            if secs < 10 {
                return "just now".to_string();
            }
            if secs < 60 {
                return pluralize(secs, "second", None);
            }
            if secs < 3600 {
                return pluralize(secs / 60, "minute", None);
            }
            return pluralize(secs / 3600, "hour", None);
        }
        if days < 7 {
            return pluralize(days, "day", None);
        }
        if days < 31 {
            return pluralize(days / 7, "week", None);
        }
        if days < 365 {
            return pluralize(days / 30, "month", None);
        }
        pluralize(days / 365, "year", None)
    }

    /// `a, b or c` — a context list in plain prose.
    pub fn context_list_string(contexts: &[String]) -> String {
        match contexts {
            [] => String::new(),
            [only] => only.clone(),
            [init @ .., last] => format!(
                "{} or {}",
                init.iter().map(String::as_str).collect::<Vec<_>>().join(", "),
                last
            ),
        }
    }

    /// Cut a field down to `max_len` characters, ending in `..`.
    pub fn trunc_string(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            return s.to_string();
        }
        let keep: String = s.chars().take(max_len.saturating_sub(2)).collect();
        format!("{keep}..")
    }

    fn sorted_by_due<T, F>(map: &IndexMap<ItemKey, T>, mut keys: Vec<ItemKey>, due: F) -> Vec<ItemKey>
    where
        F: Fn(&T) -> Option<NaiveDateTime>,
    {
        keys.sort_by_key(|key| {
            let due_at = map.get(key).and_then(|item| due(item));
            (due_at.is_none(), due_at)
        });
        keys
    }

    fn elapsed_since(now: NaiveDateTime, then: NaiveDateTime) -> i64 {
        (then - now).num_seconds().abs()
    }

    /* ------------------------------- Sections ------------------------------- */

    /// The inboxes section: overdue first, then currently visible.
    pub fn display_inboxes(plate: &mut Plate, cfg: &Config) -> Result<String> {
        plate.refresh(cfg)?;
        let summarize = cfg.summarize.inboxes;
        let plate = &*plate;

        let overdue: Vec<ItemKey> = plate
            .inboxes
            .iter()
            .filter(|(_, item)| {
                plate.overdue(Some(item.due_at)) && plate.contexts_ok(&item.contexts, false)
            })
            .map(|(key, _)| *key)
            .collect();
        let visible: Vec<ItemKey> = plate
            .inboxes
            .iter()
            .filter(|(_, item)| {
                plate.visible(Some(item.visible_at))
                    && !plate.overdue(Some(item.due_at))
                    && plate.contexts_ok(&item.contexts, false)
            })
            .map(|(key, _)| *key)
            .collect();

        let overdue_part = inbox_subset(plate, overdue, "Overdue", summarize);
        let visible_part = inbox_subset(plate, visible, "Due", summarize);
        Ok(format!(
            "{} Inboxes: {}{}\n",
            section_marker(summarize),
            overdue_part,
            visible_part
        ))
    }

    fn inbox_subset(plate: &Plate, keys: Vec<ItemKey>, status: &str, summarize: bool) -> String {
        if keys.is_empty() {
            return String::new();
        }
        if summarize {
            return format!("{status} ({})  ", pluralize(keys.len() as i64, "item", None));
        }
        let mut out = String::new();
        for key in sorted_by_due(&plate.inboxes, keys, |item| Some(item.due_at)) {
            let item = &plate.inboxes[&key];
            out.push_str(&format!(
                "\n  - {} ({} {}) <<{}>>",
                item.name,
                status,
                pretty_date(elapsed_since(plate.now, item.due_at)),
                item.locator
            ));
        }
        out
    }

    /// The next-actions section: overdue first, then currently visible.
    pub fn display_next_actions(plate: &mut Plate, cfg: &Config) -> Result<String> {
        plate.refresh(cfg)?;
        let summarize = cfg.summarize.next_actions;
        let plate = &*plate;

        let overdue: Vec<ItemKey> = plate
            .next_actions
            .iter()
            .filter(|(_, item)| {
                plate.overdue(item.due_at) && plate.contexts_ok(&item.contexts, false)
            })
            .map(|(key, _)| *key)
            .collect();
        let visible: Vec<ItemKey> = plate
            .next_actions
            .iter()
            .filter(|(_, item)| {
                plate.visible(item.visible_at)
                    && !plate.overdue(item.due_at)
                    && plate.contexts_ok(&item.contexts, false)
            })
            .map(|(key, _)| *key)
            .collect();

        let overdue_part = action_subset(plate, overdue, "Overdue", summarize);
        let visible_part = action_subset(plate, visible, "Due", summarize);
        Ok(format!(
            "{} Next Actions: {}{}\n",
            section_marker(summarize),
            overdue_part,
            visible_part
        ))
    }

    fn action_subset(plate: &Plate, keys: Vec<ItemKey>, status: &str, summarize: bool) -> String {
        if keys.is_empty() {
            return String::new();
        }
        if summarize {
            return format!("{status} ({})  ", pluralize(keys.len() as i64, "item", None));
        }
        let mut out = String::new();
        for key in sorted_by_due(&plate.next_actions, keys, |item| item.due_at) {
            let item = &plate.next_actions[&key];
            let due_tag = match item.due_at {
                Some(due) => format!(" ({} {})", status, pretty_date(elapsed_since(plate.now, due))),
                None => String::new(),
            };
            out.push_str(&format!("\n  - {}{} <<{}>>", item.name, due_tag, item.locator));
        }
        out
    }

    /// The reminders section: everything whose time has arrived. Reminders
    /// without contexts are always admitted.
    pub fn display_reminders(plate: &mut Plate, cfg: &Config) -> Result<String> {
        plate.refresh(cfg)?;
        let summarize = cfg.summarize.reminders;
        let plate = &*plate;

        let visible: Vec<ItemKey> = plate
            .reminders
            .iter()
            .filter(|(_, item)| plate.visible(item.at) && plate.contexts_ok(&item.contexts, true))
            .map(|(key, _)| *key)
            .collect();

        let part = reminder_subset(plate, visible, "Visible", summarize);
        Ok(format!(
            "{} Reminders: {}\n",
            section_marker(summarize),
            part
        ))
    }

    fn reminder_subset(plate: &Plate, keys: Vec<ItemKey>, status: &str, summarize: bool) -> String {
        if keys.is_empty() {
            return String::new();
        }
        if summarize {
            return format!("({} {})  ", pluralize(keys.len() as i64, "item", None), status);
        }
        let mut out = String::new();
        for key in sorted_by_due(&plate.reminders, keys, |item| item.at) {
            let item = &plate.reminders[&key];
            let due_tag = match item.at {
                Some(at) => format!(" ({} {})", status, pretty_date(elapsed_since(plate.now, at))),
                None => String::new(),
            };
            out.push_str(&format!("\n  - {}{} <<{}>>", item.name, due_tag, item.locator));
        }
        out
    }

    /// One line of prose describing the active context rules.
    pub fn display_contexts(plate: &mut Plate, cfg: &Config) -> Result<String> {
        plate.refresh(cfg)?;
        let use_part = context_list_string(&plate.rules.use_contexts);
        let avoid_part = if plate.rules.avoid_contexts.is_empty() {
            String::new()
        } else {
            format!("NOT {}", context_list_string(&plate.rules.avoid_contexts))
        };
        let joiner = if !use_part.is_empty() && !avoid_part.is_empty() {
            " but "
        } else {
            ""
        };
        Ok(format!(
            "{} Contexts: {}{}{}\n",
            section_marker(true),
            use_part,
            joiner,
            avoid_part
        ))
    }

    /* ------------------------------ Extracts ------------------------------ */

    /// Raw capture lines: every line of the inboxes source mentioning INBOX.
    pub fn inbox_raw(text: &str) -> String {
        text.lines()
            .filter(|line| line.contains("INBOX"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Condensed checklist of all next actions, one `[] name (project)`
    /// per line with both fields truncated.
    pub fn condensed_actions(plate: &Plate) -> String {
        plate
            .next_actions
            .values()
            .map(|action| {
                format!(
                    "[] {} ({})",
                    trunc_string(&action.name, 60),
                    trunc_string(action.project.as_deref().unwrap_or(""), 60)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

}
