//! Classification of submitted text into commands.
//!
//! Routing walks an ordered table of prefix matchers and falls through to
//! plain chat. Adding a command means adding a row; the orchestration code does
//! not change.

use std::sync::LazyLock;

use regex::Regex;

/// Guidance shown for `/cari` without a query.
pub const SEARCH_USAGE: &str = "Mohon masukkan kata kunci pencarian setelah /cari";
/// Guidance shown for `/web` without a URL.
pub const WEB_URL_USAGE: &str =
    "Mohon masukkan URL yang valid. Contoh: /web ambil fungsi yang ada di web https://example.com";
/// Guidance shown for `/web` with a URL but no question.
pub const WEB_QUESTION_USAGE: &str = "Mohon masukkan pertanyaan sebelum URL. Contoh: /web ambil fungsi yang ada di web https://example.com";
/// Guidance shown for `/kalkulator` without an expression.
pub const CALCULATOR_USAGE: &str =
    "Mohon masukkan ekspresi matematika setelah /kalkulator (contoh: /kalkulator 2 + 2 * 5)";

static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)https?://\S+").expect("valid url regex"));

/// What a piece of submitted text asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Reset the backend conversation context.
    Clear,
    /// Search the web and answer from the results.
    Search {
        /// The search query.
        query: String,
    },
    /// Answer a question about one web page.
    Web {
        /// The question, with the URL removed.
        question: String,
        /// The page to read.
        url: String,
    },
    /// Evaluate an arithmetic expression.
    Calculate {
        /// The expression as typed.
        expression: String,
    },
    /// A command was recognized but its argument is missing; show the guidance.
    Usage(&'static str),
    /// Free-form chat.
    Chat,
}

impl Command {
    /// A short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Clear => "clear",
            Command::Search { .. } => "cari",
            Command::Web { .. } => "web",
            Command::Calculate { .. } => "kalkulator",
            Command::Usage(_) => "usage",
            Command::Chat => "chat",
        }
    }
}

/// How a route's keyword must be followed.
#[derive(Debug, Clone, Copy)]
enum Boundary {
    /// Anything may follow the keyword.
    Prefix,
    /// The keyword must be followed by whitespace or the end of input.
    Word,
}

struct Route {
    keyword: &'static str,
    boundary: Boundary,
    parse: fn(&str) -> Command,
}

static ROUTES: &[Route] = &[
    Route {
        keyword: "/clear",
        boundary: Boundary::Prefix,
        parse: parse_clear,
    },
    Route {
        keyword: "/cari",
        boundary: Boundary::Word,
        parse: parse_search,
    },
    Route {
        keyword: "/web",
        boundary: Boundary::Word,
        parse: parse_web,
    },
    Route {
        keyword: "/kalkulator",
        boundary: Boundary::Word,
        parse: parse_calculate,
    },
];

impl Route {
    /// Returns the text after the keyword if `input` matches this route.
    fn matches<'a>(&self, input: &'a str) -> Option<&'a str> {
        let head = input.get(..self.keyword.len())?;
        if !head.eq_ignore_ascii_case(self.keyword) {
            return None;
        }
        let rest = &input[self.keyword.len()..];
        match self.boundary {
            Boundary::Prefix => Some(rest),
            Boundary::Word if rest.is_empty() || rest.starts_with(char::is_whitespace) => {
                Some(rest)
            }
            Boundary::Word => None,
        }
    }
}

/// Classify submitted text.
///
/// # Examples
///
/// ```
/// # use fireflies::chat::{route, Command};
/// assert_eq!(route("/CARI rust async"), Command::Search { query: "rust async".into() });
/// assert_eq!(route("apa kabar?"), Command::Chat);
/// ```
pub fn route(input: &str) -> Command {
    let input = input.trim();
    ROUTES
        .iter()
        .find_map(|route| route.matches(input).map(|rest| (route.parse)(rest.trim())))
        .unwrap_or(Command::Chat)
}

fn parse_clear(_: &str) -> Command {
    Command::Clear
}

fn parse_search(rest: &str) -> Command {
    if rest.is_empty() {
        Command::Usage(SEARCH_USAGE)
    } else {
        Command::Search {
            query: rest.to_string(),
        }
    }
}

fn parse_web(rest: &str) -> Command {
    let Some(found) = URL.find(rest) else {
        return Command::Usage(WEB_URL_USAGE);
    };
    let url = found.as_str().to_string();
    let question = rest.replacen(&url, "", 1).trim().to_string();
    if question.is_empty() {
        return Command::Usage(WEB_QUESTION_USAGE);
    }
    Command::Web { question, url }
}

fn parse_calculate(rest: &str) -> Command {
    if rest.is_empty() {
        Command::Usage(CALCULATOR_USAGE)
    } else {
        Command::Calculate {
            expression: rest.to_string(),
        }
    }
}
