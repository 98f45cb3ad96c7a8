use thiserror::Error;

pub const MAXARGS: usize = 128;

/// Represents a parsed command line.
#[derive(Debug, PartialEq, Eq)]
pub struct Command {
    /// Command and its arguments.
    pub argv: Vec<String>,
    /// Whether the line ended with `&`.
    pub background: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unterminated quote")]
    UnterminatedQuote,
    #[error("syntax error near unexpected token `&'")]
    MisplacedAmpersand,
    #[error("too many arguments")]
    TooManyArgs,
}

/// Parses the input command line into an argument vector and a background
/// flag. Words are separated by whitespace; single or double quotes group a
/// word; a trailing `&` requests background execution.
///
/// A blank line yields an empty `argv`.
pub fn parse_command_line(cmdline: &str) -> Result<Command, ParseError> {
    let mut tokens = tokenize(cmdline)?;

    let background = tokens.last() == Some(&Token::Ampersand);
    if background {
        tokens.pop();
    }

    let mut argv = Vec::with_capacity(tokens.len());
    for token in tokens {
        match token {
            Token::Word(word) => argv.push(word),
            Token::Ampersand => return Err(ParseError::MisplacedAmpersand),
        }
    }
    if argv.len() > MAXARGS - 1 {
        return Err(ParseError::TooManyArgs);
    }
    Ok(Command { argv, background })
}

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Word(String),
    Ampersand,
}

/// Splits the input command line into tokens. This function handles:
///
/// - Quoted strings (using single or double quotes)
/// - The background marker `&`, which needs no surrounding whitespace
fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&ch) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }
        if ch == '"' || ch == '\'' {
            let quote = ch;
            chars.next(); // Consume opening quote.
            let mut token = String::new();
            loop {
                match chars.next() {
                    Some(c) if c == quote => break,
                    Some(c) => token.push(c),
                    None => return Err(ParseError::UnterminatedQuote),
                }
            }
            tokens.push(Token::Word(token));
        } else if ch == '&' {
            chars.next();
            tokens.push(Token::Ampersand);
        } else {
            let mut token = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || c == '&' || c == '"' || c == '\'' {
                    break;
                }
                token.push(c);
                chars.next();
            }
            tokens.push(Token::Word(token));
        }
    }
    Ok(tokens)
}
