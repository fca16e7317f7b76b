use crate::frontend::lexer::Spanned;
use crate::frontend::token::Token;

/// Pretty-printer behind the `--tokens` CLI mode.
pub struct TokenDumper {
    pub color: bool,
    pub show_debug_repr: bool, // if false, prints surface text instead
}

impl Default for TokenDumper {
    fn default() -> Self {
        Self {
            color: true,
            show_debug_repr: true,
        }
    }
}

impl TokenDumper {
    // ANSI colors
    const RESET: &'static str = "\x1b[0m";
    const DIM: &'static str = "\x1b[2m";
    const GRN: &'static str = "\x1b[32m";
    const YEL: &'static str = "\x1b[33m";
    const CYN: &'static str = "\x1b[36m";
    const MAG: &'static str = "\x1b[35m";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_color(mut self) -> Self {
        self.color = false;
        self
    }

    pub fn pretty(mut self) -> Self {
        self.show_debug_repr = false;
        self
    }

    pub fn dump(&self, tokens: &[Spanned]) {
        for spanned in tokens {
            self.print_one(spanned);
        }
    }

    fn print_one(&self, spanned: &Spanned) {
        let line = spanned.span.line;
        let col = spanned.span.col;

        let kind = self.kind(&spanned.token);
        let color = if self.color {
            self.color(&spanned.token)
        } else {
            ""
        };
        let reset = if self.color { Self::RESET } else { "" };

        if self.show_debug_repr {
            println!(
                "[{:02}:{:02}] {}{:<8} {:?}{}",
                line, col, color, kind, spanned.token, reset
            );
        } else {
            println!(
                "[{:02}:{:02}] {}{:<8} {}{}",
                line, col, color, kind, spanned.token, reset
            );
        }
    }

    fn kind(&self, token: &Token) -> &'static str {
        use Token::*;
        match token {
            Eof => "EOF",
            Illegal(_) => "ILLEGAL",

            // literals
            Integer(_) => "INT",
            String(_) => "STRING",

            // names
            Identifier(_) => "IDENT",

            // structure
            LeftParen | RightParen => "PAREN",
            LeftBrace | RightBrace => "BRACE",
            LeftBracket | RightBracket => "BRACKET",
            Comma | Semicolon => "DELIM",

            // ops / comparisons
            Assign => "ASSIGN",
            Plus | Minus | Asterisk | Slash | Bang => "OP",
            Equal | NotEqual | LessThan | GreaterThan | LessThanEqual => "CMP",

            // everything else = keyword
            _ => "KEYWORD",
        }
    }

    fn color(&self, token: &Token) -> &'static str {
        use Token::*;
        match token {
            Eof | Illegal(_) => Self::DIM,
            String(_) => Self::GRN,
            Integer(_) => Self::CYN,
            Identifier(_) => Self::YEL,
            Plus | Minus | Asterisk | Slash | Bang | Assign => Self::MAG,
            Equal | NotEqual | LessThan | GreaterThan | LessThanEqual => Self::MAG,
            _ => Self::RESET,
        }
    }
}
