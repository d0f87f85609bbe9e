//! Statement classification for the write gate.
//!
//! A small lexer walks the SQL text, dropping comments, string literals,
//! quoted identifiers and dollar-quoted bodies, and yields bare keywords.
//! Classification looks at those keywords only, so `'DELETE'` inside a
//! literal or `/* drop */` inside a comment never changes the verdict.
//!
//! The classifier fails closed: anything it does not positively recognise as
//! a read is a write.
//!
//! Known limitation: a read statement that calls a function with side effects
//! (`SELECT my_func()`) is classified as a read.

/// Verdict of [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Read,
    Write,
    /// Only whitespace and comments.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub kind: StatementKind,
    /// Leading keyword, uppercased. Empty for [`StatementKind::Empty`].
    pub keyword: String,
    /// Why a statement led by a read keyword was still treated as a write.
    pub reason: Option<String>,
}

impl Statement {
    pub fn is_write(&self) -> bool {
        self.kind == StatementKind::Write
    }

    /// Short label used in log lines and the `WritesDisabled` message.
    pub fn describe(&self) -> String {
        match &self.reason {
            Some(reason) => format!("{} ({})", self.keyword, reason),
            None => self.keyword.clone(),
        }
    }
}

const READ_KEYWORDS: &[&str] = &["SELECT", "WITH", "VALUES", "TABLE", "SHOW", "EXPLAIN"];
const DML_KEYWORDS: &[&str] = &["INSERT", "UPDATE", "DELETE", "MERGE"];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// Unquoted word, uppercased.
    Word(String),
    /// `"quoted"` identifier; never a keyword.
    Ident,
    /// String or dollar-quoted literal.
    Literal,
    Semicolon,
    OpenParen,
    CloseParen,
    Other,
}

/// Classify one SQL text.
pub fn classify(sql: &str) -> Statement {
    let tokens = tokenize(sql);
    let statements: Vec<&[Token]> = tokens
        .split(|t| *t == Token::Semicolon)
        .filter(|s| !s.is_empty())
        .collect();

    match statements.as_slice() {
        [] => Statement {
            kind: StatementKind::Empty,
            keyword: String::new(),
            reason: None,
        },
        [single] => classify_tokens(single),
        [first, ..] => Statement {
            kind: StatementKind::Write,
            keyword: classify_tokens(first).keyword,
            reason: Some("multiple statements".to_string()),
        },
    }
}

fn classify_tokens(tokens: &[Token]) -> Statement {
    // `(SELECT ...) UNION (SELECT ...)` starts with a parenthesis.
    let body: &[Token] = match tokens.iter().position(|t| *t != Token::OpenParen) {
        Some(i) => &tokens[i..],
        None => &[],
    };

    let keyword = match body.first() {
        Some(Token::Word(w)) => w.clone(),
        _ => {
            return Statement {
                kind: StatementKind::Write,
                keyword: "?".to_string(),
                reason: Some("unrecognised statement".to_string()),
            };
        }
    };

    let write = |reason: Option<String>| Statement {
        kind: StatementKind::Write,
        keyword: keyword.clone(),
        reason,
    };

    if !READ_KEYWORDS.iter().any(|k| *k == keyword) {
        return write(None);
    }

    match keyword.as_str() {
        "EXPLAIN" => return classify_explain(&body[1..]),
        "WITH" => {
            if let Some(dml) = first_word_of(body, DML_KEYWORDS) {
                return write(Some(format!("data-modifying {}", dml)));
            }
        }
        _ => {}
    }

    if has_word(body, "INTO") {
        return write(Some("SELECT ... INTO".to_string()));
    }
    if let Some(lock) = row_lock(body) {
        return write(Some(lock));
    }

    Statement {
        kind: StatementKind::Read,
        keyword,
        reason: None,
    }
}

/// `EXPLAIN` only runs the statement when `ANALYZE` is given.
fn classify_explain(rest: &[Token]) -> Statement {
    let mut analyze = false;
    let mut i = 0;

    if rest.first() == Some(&Token::OpenParen) {
        let mut depth = 0usize;
        while i < rest.len() {
            match &rest[i] {
                Token::OpenParen => depth += 1,
                Token::CloseParen => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        i += 1;
                        break;
                    }
                }
                Token::Word(w) if w == "ANALYZE" || w == "ANALYSE" => analyze = true,
                _ => {}
            }
            i += 1;
        }
    } else {
        while let Some(Token::Word(w)) = rest.get(i) {
            match w.as_str() {
                "ANALYZE" | "ANALYSE" => analyze = true,
                "VERBOSE" => {}
                _ => break,
            }
            i += 1;
        }
    }

    let inner = classify_tokens(&rest[i..]);
    if analyze && inner.kind != StatementKind::Read {
        return Statement {
            kind: StatementKind::Write,
            keyword: "EXPLAIN".to_string(),
            reason: Some(format!("ANALYZE executes {}", inner.describe())),
        };
    }
    Statement {
        kind: StatementKind::Read,
        keyword: "EXPLAIN".to_string(),
        reason: None,
    }
}

fn has_word(tokens: &[Token], word: &str) -> bool {
    tokens.iter().any(|t| matches!(t, Token::Word(w) if w == word))
}

fn first_word_of<'a>(tokens: &[Token], words: &[&'a str]) -> Option<&'a str> {
    tokens.iter().find_map(|t| match t {
        Token::Word(w) => words.iter().copied().find(|k| *k == w.as_str()),
        _ => None,
    })
}

/// `FOR UPDATE`, `FOR NO KEY UPDATE`, `FOR SHARE`, `FOR KEY SHARE`.
fn row_lock(tokens: &[Token]) -> Option<String> {
    tokens.windows(2).find_map(|pair| match pair {
        [Token::Word(f), Token::Word(next)] if f == "FOR" => match next.as_str() {
            "UPDATE" | "SHARE" | "NO" | "KEY" => Some(format!("FOR {} row lock", next)),
            _ => None,
        },
        _ => None,
    })
}

fn tokenize(sql: &str) -> Vec<Token> {
    let chars: Vec<char> = sql.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c.is_whitespace() {
            i += 1;
        } else if c == '-' && next == Some('-') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if c == '/' && next == Some('*') {
            i = skip_block_comment(&chars, i);
        } else if c == '\'' {
            i = skip_quoted(&chars, i, '\'', false);
            tokens.push(Token::Literal);
        } else if c == '"' {
            i = skip_quoted(&chars, i, '"', false);
            tokens.push(Token::Ident);
        } else if c == '$' {
            match dollar_tag(&chars, i) {
                Some(tag) => {
                    i = skip_dollar_body(&chars, i + tag.chars().count(), &tag);
                    tokens.push(Token::Literal);
                }
                None => {
                    // Positional parameter such as `$1`.
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                    tokens.push(Token::Other);
                }
            }
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
            {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect::<String>().to_uppercase();
            // Prefixed literals: E'..', B'..', X'..', N'..'.
            if chars.get(i) == Some(&'\'') && matches!(word.as_str(), "E" | "B" | "X" | "N") {
                i = skip_quoted(&chars, i, '\'', word == "E");
                tokens.push(Token::Literal);
            } else {
                tokens.push(Token::Word(word));
            }
        } else if c.is_ascii_digit() {
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '.') {
                i += 1;
            }
            tokens.push(Token::Other);
        } else {
            tokens.push(match c {
                ';' => Token::Semicolon,
                '(' => Token::OpenParen,
                ')' => Token::CloseParen,
                _ => Token::Other,
            });
            i += 1;
        }
    }

    tokens
}

/// Block comments nest in PostgreSQL. Unterminated comments run to the end.
fn skip_block_comment(chars: &[char], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while i < chars.len() {
        match (chars[i], chars.get(i + 1).copied()) {
            ('/', Some('*')) => {
                depth += 1;
                i += 2;
            }
            ('*', Some('/')) => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return i;
                }
            }
            _ => i += 1,
        }
    }
    chars.len()
}

/// Skip a quoted run starting at `start` (the opening quote). A doubled quote
/// is an escaped quote; with `backslash` set, `\x` escapes too.
fn skip_quoted(chars: &[char], start: usize, quote: char, backslash: bool) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        if backslash && c == '\\' {
            i += 2;
        } else if c == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
            } else {
                return i + 1;
            }
        } else {
            i += 1;
        }
    }
    chars.len()
}

/// `$$` or `$tag$` at `start`, returned including both dollars.
fn dollar_tag(chars: &[char], start: usize) -> Option<String> {
    let mut i = start + 1;
    if let Some(&c) = chars.get(i) {
        if !(c == '$' || c.is_alphabetic() || c == '_') {
            return None;
        }
    }
    while i < chars.len() {
        let c = chars[i];
        if c == '$' {
            return Some(chars[start..=i].iter().collect());
        }
        if !(c.is_alphanumeric() || c == '_') {
            return None;
        }
        i += 1;
    }
    None
}

fn skip_dollar_body(chars: &[char], body_start: usize, tag: &str) -> usize {
    let tag: Vec<char> = tag.chars().collect();
    let mut i = body_start;
    while i + tag.len() <= chars.len() {
        if chars[i..i + tag.len()] == tag[..] {
            return i + tag.len();
        }
        i += 1;
    }
    chars.len()
}
